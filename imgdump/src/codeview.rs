//! CodeView debug information, as pointed at by a debug directory entry or a minidump module.
//!
//! A CodeView blob starts with a four-byte signature. `NB10` and `RSDS` blobs are small records
//! that name an external PDB; they are decoded completely and nothing else is read. The `NB05`,
//! `NB08`, `NB09` and `NB11` blobs carry the debug information inline, organized as a directory
//! of OMF subsections. The directory is read eagerly; each subsection is decoded on request by
//! [`Omf::decode_subsection`], so that one damaged subsection never hides the others.
//!
//! # References
//! * "Microsoft Symbol and Type Information", CodeView 4 and 5 formats
//! * `cvinfo.h`

pub mod kinds;
pub mod lines;
pub mod number;
pub mod primitive;
pub mod syms;
pub mod types;

#[cfg(test)]
mod tests;

pub use kinds::{Leaf, SstKind, SymKind};
pub use number::Number;
pub use primitive::type_index_name;
pub use syms::{Sym, SymData, SymbolBlock};
pub use types::{Field, TypeBlock, TypeData, TypeRecord};

use crate::error::{LocalError, LocalResult, isolate};
use crate::view::{Cursor, ImageView};
use crate::{Base, DirectoryEntry};
use bstr::BStr;
use std::collections::HashSet;
use uuid::Uuid;
use zerocopy::{FromBytes, Immutable, KnownLayout, LE, U16, U32, Unaligned};

/// A decoded CodeView blob.
pub enum CodeView<'a> {
    #[allow(missing_docs)]
    Nb10(Nb10<'a>),
    #[allow(missing_docs)]
    Rsds(Rsds<'a>),
    /// Inline debug information organized as OMF subsections.
    Omf(Omf<'a>),
}

/// `NB10`: a reference to a PDB, identified by time stamp and age.
#[derive(Clone, Debug)]
pub struct Nb10<'a> {
    /// Offset of the debug information within the PDB; always zero in practice.
    pub offset: u32,
    #[allow(missing_docs)]
    pub timestamp: u32,
    #[allow(missing_docs)]
    pub age: u32,
    #[allow(missing_docs)]
    pub path: &'a BStr,
}

/// `RSDS`: a reference to a PDB, identified by GUID and age.
#[derive(Clone, Debug)]
pub struct Rsds<'a> {
    #[allow(missing_docs)]
    pub guid: Uuid,
    #[allow(missing_docs)]
    pub age: u32,
    #[allow(missing_docs)]
    pub path: &'a BStr,
}

/// The header of a subsection directory. See `OMFDirHeader`.
#[derive(FromBytes, Immutable, KnownLayout, Unaligned, Debug)]
#[repr(C)]
#[allow(missing_docs)]
pub struct OMFDirHeader {
    pub cb_dir_header: U16<LE>,
    pub cb_dir_entry: U16<LE>,
    pub c_dir: U32<LE>,
    pub lfo_next_dir: U32<LE>,
    pub flags: U32<LE>,
}

/// An entry of a subsection directory. See `OMFDirEntry`.
#[derive(FromBytes, Immutable, KnownLayout, Unaligned, Debug)]
#[repr(C)]
#[allow(missing_docs)]
pub struct OMFDirEntry {
    pub subsection: U16<LE>,
    pub imod: U16<LE>,
    pub lfo: U32<LE>,
    pub cb: U32<LE>,
}

static_assertions::const_assert_eq!(std::mem::size_of::<OMFDirHeader>(), 16);
static_assertions::const_assert_eq!(std::mem::size_of::<OMFDirEntry>(), 12);

/// Inline CodeView information: the signature and the subsection directory.
pub struct Omf<'a> {
    /// `NB05`, `NB08`, `NB09` or `NB11`
    pub signature: [u8; 4],
    /// File offset of the signature. Subsection offsets are relative to this.
    pub base: usize,
    /// Offset of the first subsection directory, relative to `base`.
    pub directory_offset: u32,
    /// All subsections listed by the directory chain, in directory order.
    pub subsections: Vec<Subsection>,
    /// Set if the directory chain could not be read to its end.
    pub error: Option<LocalError>,
    window: Cursor<'a>,
}

/// One entry of the subsection directory.
#[derive(Copy, Clone, Debug)]
pub struct Subsection {
    #[allow(missing_docs)]
    pub kind: SstKind,
    /// The 1-based index of the module this subsection belongs to, or `0xffff` for global ones.
    pub module_index: u16,
    /// Offset is relative to the start of the CodeView blob.
    pub entry: DirectoryEntry,
}

/// Decodes the CodeView blob of `size` bytes at file offset `offset`.
pub fn decode(view: &ImageView, offset: usize, size: usize) -> LocalResult<CodeView<'_>> {
    let mut c = view
        .cursor_at(offset, size)
        .ok_or(LocalError::overrun("CodeView data"))?;
    let window = c.clone();
    let signature: [u8; 4] = c.array()?;

    tracing::debug!(
        signature = %BStr::new(&signature),
        offset,
        size,
        "CodeView blob"
    );

    match &signature {
        b"NB10" => Ok(CodeView::Nb10(Nb10 {
            offset: c.u32()?,
            timestamp: c.u32()?,
            age: c.u32()?,
            path: c.strz()?,
        })),
        b"RSDS" => Ok(CodeView::Rsds(Rsds {
            guid: c.guid()?,
            age: c.u32()?,
            path: c.strz()?,
        })),
        b"NB05" | b"NB08" | b"NB09" | b"NB11" => {
            let directory_offset = c.u32()?;
            let mut omf = Omf {
                signature,
                base: offset,
                directory_offset,
                subsections: Vec::new(),
                error: None,
                window,
            };
            if let Err(e) = isolate("subsection directory", || {
                read_directories(&omf.window, directory_offset, &mut omf.subsections)
            }) {
                omf.error = Some(e);
            }
            Ok(CodeView::Omf(omf))
        }
        _ => Err(LocalError::bad_signature("NB10, RSDS or NBxx")),
    }
}

/// Reads the chain of subsection directories. Subsections read before a failure are kept.
fn read_directories(
    window: &Cursor<'_>,
    first: u32,
    out: &mut Vec<Subsection>,
) -> LocalResult<()> {
    let mut visited = HashSet::new();
    let mut next = first;

    loop {
        if !visited.insert(next) {
            return Err(LocalError::invalid("subsection directory chain revisits a directory"));
        }

        let mut c = window.at(next as usize)?;
        let header: &OMFDirHeader = c.get()?;
        let cb_header = header.cb_dir_header.get() as usize;
        let cb_entry = header.cb_dir_entry.get() as usize;
        let count = header.c_dir.get() as usize;

        if cb_header < size_of::<OMFDirHeader>() || cb_entry < size_of::<OMFDirEntry>() {
            return Err(LocalError::invalid("subsection directory header"));
        }
        c.skip(cb_header - size_of::<OMFDirHeader>())?;
        if count.saturating_mul(cb_entry) > c.len() {
            return Err(LocalError::overrun("subsection directory"));
        }

        for _ in 0..count {
            let e: &OMFDirEntry = c.get()?;
            c.skip(cb_entry - size_of::<OMFDirEntry>())?;
            let kind = SstKind(e.subsection.get());
            tracing::trace!(?kind, imod = e.imod.get(), lfo = e.lfo.get(), cb = e.cb.get(), "subsection");
            out.push(Subsection {
                kind,
                module_index: e.imod.get(),
                entry: DirectoryEntry::new(
                    Base::SubsectionRelative,
                    kind.0 as u32,
                    e.lfo.get(),
                    e.cb.get(),
                ),
            });
        }

        next = header.lfo_next_dir.get();
        if next == 0 {
            return Ok(());
        }
    }
}

/// The decoded body of a subsection.
pub enum SubsectionData<'a> {
    /// `sstModule`
    Module(ModuleInfo<'a>),
    /// `sstGlobalSym`, `sstGlobalPub`, `sstStaticSym`
    HashedSymbols {
        #[allow(missing_docs)]
        header: &'a OMFSymHash,
        #[allow(missing_docs)]
        symbols: SymbolBlock<'a>,
    },
    /// `sstAlignSym`, `sstPublicSym`, `sstSymbols`
    Symbols {
        #[allow(missing_docs)]
        signature: u32,
        #[allow(missing_docs)]
        symbols: SymbolBlock<'a>,
    },
    /// `sstGlobalTypes`
    GlobalTypes {
        #[allow(missing_docs)]
        flags: u32,
        /// Offset of each type record, relative to the first one.
        offsets: &'a [U32<LE>],
        #[allow(missing_docs)]
        types: TypeBlock<'a>,
    },
    /// `sstSegMap`
    SegMap {
        /// Number of logical segments.
        logical: u16,
        #[allow(missing_docs)]
        segments: &'a [OMFSegDesc],
    },
    /// `sstSegName`
    SegNames(Vec<&'a BStr>),
    /// `sstSrcModule`
    SrcModule(lines::SrcModule<'a>),
    /// `sstLibraries`
    Libraries(Vec<&'a BStr>),
    /// `sstFileIndex`
    FileIndex(Vec<LocalResult<Vec<&'a BStr>>>),
    /// Any other kind, shown as bytes.
    Other(&'a [u8]),
}

/// `sstModule`: where a module's code lives and what it is called.
pub struct ModuleInfo<'a> {
    #[allow(missing_docs)]
    pub overlay: u16,
    /// Index into `sstLibraries`, or 0.
    pub library: u16,
    /// Debugging style; `CV` for CodeView.
    pub style: [u8; 2],
    #[allow(missing_docs)]
    pub segments: &'a [OMFSegInfo],
    #[allow(missing_docs)]
    pub name: &'a BStr,
}

#[derive(FromBytes, Immutable, KnownLayout, Unaligned, Debug)]
#[repr(C)]
#[allow(missing_docs)]
pub struct OMFSegInfo {
    pub segment: U16<LE>,
    pub pad: U16<LE>,
    pub offset: U32<LE>,
    pub size: U32<LE>,
}

/// The hash header that starts the global symbol subsections.
#[derive(FromBytes, Immutable, KnownLayout, Unaligned, Debug)]
#[repr(C)]
#[allow(missing_docs)]
pub struct OMFSymHash {
    pub sym_hash: U16<LE>,
    pub addr_hash: U16<LE>,
    pub cb_symbol: U32<LE>,
    pub cb_hsym: U32<LE>,
    pub cb_haddr: U32<LE>,
}

#[derive(FromBytes, Immutable, KnownLayout, Unaligned, Debug)]
#[repr(C)]
#[allow(missing_docs)]
pub struct OMFSegDesc {
    pub flags: U16<LE>,
    pub overlay: U16<LE>,
    pub group: U16<LE>,
    pub frame: U16<LE>,
    pub seg_name: U16<LE>,
    pub class_name: U16<LE>,
    pub offset: U32<LE>,
    pub size: U32<LE>,
}

static_assertions::const_assert_eq!(std::mem::size_of::<OMFSegInfo>(), 12);
static_assertions::const_assert_eq!(std::mem::size_of::<OMFSymHash>(), 16);
static_assertions::const_assert_eq!(std::mem::size_of::<OMFSegDesc>(), 20);

impl<'a> Omf<'a> {
    /// The signature as text.
    pub fn signature_str(&self) -> &BStr {
        BStr::new(&self.signature)
    }

    /// Finds the `sstModule` subsection for a 1-based module index.
    pub fn module(&self, module_index: u16) -> Option<&Subsection> {
        self.subsections
            .iter()
            .find(|s| s.kind == SstKind::sstModule && s.module_index == module_index)
    }

    /// Decodes the body of subsection `index`. Failures are local to that subsection.
    pub fn decode_subsection(&self, index: usize) -> LocalResult<SubsectionData<'a>> {
        let s = self
            .subsections
            .get(index)
            .ok_or(LocalError::invalid("no such subsection"))?;
        isolate("subsection", || self.decode_body(s))
    }

    fn decode_body(&self, s: &Subsection) -> LocalResult<SubsectionData<'a>> {
        let mut c = self.window.at(s.entry.offset as usize)?;
        if s.entry.length as usize > c.len() {
            return Err(LocalError::overrun("subsection"));
        }
        let mut c = c.sub(s.entry.length as usize)?;

        Ok(match s.kind {
            SstKind::sstModule => {
                let overlay = c.u16()?;
                let library = c.u16()?;
                let count = c.u16()? as usize;
                let style = c.array()?;
                if count * size_of::<OMFSegInfo>() > c.len() {
                    return Err(LocalError::overrun("module segments"));
                }
                SubsectionData::Module(ModuleInfo {
                    overlay,
                    library,
                    style,
                    segments: c.slice(count)?,
                    name: c.strt()?,
                })
            }

            SstKind::sstGlobalSym | SstKind::sstGlobalPub | SstKind::sstStaticSym => {
                let header: &OMFSymHash = c.get()?;
                let cb = header.cb_symbol.get() as usize;
                if cb > c.len() {
                    return Err(LocalError::overrun("symbol table"));
                }
                let symbols = syms::decode_symbols(c.sub(cb)?);
                SubsectionData::HashedSymbols { header, symbols }
            }

            SstKind::sstAlignSym | SstKind::sstPublicSym | SstKind::sstSymbols => {
                let signature = c.u32()?;
                // Symbol offsets count from the start of the subsection, signature included.
                let symbols = syms::decode_symbols(c);
                SubsectionData::Symbols { signature, symbols }
            }

            SstKind::sstGlobalTypes => {
                let flags = c.u32()?;
                let count = c.u32()? as usize;
                if count.saturating_mul(4) > c.len() {
                    return Err(LocalError::overrun("type offsets"));
                }
                let offsets = c.slice(count)?;
                let types = types::decode_types(c, 0x1000);
                SubsectionData::GlobalTypes {
                    flags,
                    offsets,
                    types,
                }
            }

            SstKind::sstSegMap => {
                let count = c.u16()? as usize;
                let logical = c.u16()?;
                if count * size_of::<OMFSegDesc>() > c.len() {
                    return Err(LocalError::overrun("segment map"));
                }
                SubsectionData::SegMap {
                    logical,
                    segments: c.slice(count)?,
                }
            }

            SstKind::sstSegName => {
                let mut names = Vec::new();
                while !c.is_empty() {
                    names.push(c.strz()?);
                }
                SubsectionData::SegNames(names)
            }

            SstKind::sstSrcModule => SubsectionData::SrcModule(lines::decode_src_module(c)?),

            SstKind::sstLibraries => {
                let mut names = Vec::new();
                while !c.is_empty() {
                    names.push(c.strt()?);
                }
                SubsectionData::Libraries(names)
            }

            SstKind::sstFileIndex => SubsectionData::FileIndex(decode_file_index(c)?),

            _ => SubsectionData::Other(c.take_rest()),
        })
    }
}

/// `sstFileIndex`: for each module, the names of its source files.
fn decode_file_index<'a>(mut c: Cursor<'a>) -> LocalResult<Vec<LocalResult<Vec<&'a BStr>>>> {
    let modules = c.u16()? as usize;
    let refs = c.u16()? as usize;
    if modules * 4 + refs * 4 > c.len() {
        return Err(LocalError::overrun("file index"));
    }
    let starts: &[U16<LE>] = c.slice(modules)?;
    let counts: &[U16<LE>] = c.slice(modules)?;
    let name_refs: &[U32<LE>] = c.slice(refs)?;
    let names = c.rest();

    Ok(starts
        .iter()
        .zip(counts)
        .map(|(start, count)| -> LocalResult<Vec<&'a BStr>> {
            let start = start.get() as usize;
            let end = start + count.get() as usize;
            let refs = name_refs
                .get(start..end)
                .ok_or(LocalError::overrun("file index references"))?;
            refs.iter()
                .map(|r| -> LocalResult<&'a BStr> { Ok(names.at(r.get() as usize)?.strt()?) })
                .collect()
        })
        .collect())
}
