//! Portable Executable (PE32 and PE32+) images.
//!
//! The file header, optional header and section table are mandatory. Each data directory is then
//! decoded by its own walker; a walker that fails records a [`LocalError`] in its slot and the
//! others still run.

#[cfg(test)]
mod tests;

pub mod clr;
pub mod debug;
pub mod exceptions;
pub mod exports;
pub mod imports;
pub mod load_config;
pub mod payloads;
pub mod relocs;
pub mod resources;
pub mod symbols;
pub mod tls;

use crate::error::{LocalError, LocalResult, isolate};
use crate::view::{Cursor, ImageView};
use crate::{Base, DirectoryEntry, dos};
use anyhow::{Context, bail};
use bstr::BStr;
use imgdump_coff::*;
use std::mem::size_of;

pub use self::clr::Clr;
pub use self::debug::{DebugEntry, DebugInfo};
pub use self::exceptions::Exceptions;
pub use self::exports::{Export, Exports};
pub use self::imports::{ImportThunk, ImportedDll};
pub use self::load_config::LoadConfig;
pub use self::payloads::ResourcePayload;
pub use self::relocs::RelocBlock;
pub use self::resources::{ResourceData, ResourceDirectory, ResourceEntry, ResourceId, ResourceNode};
pub use self::symbols::CoffSymbol;
pub use self::tls::Tls;

/// Which builder left its mark after the DOS header.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum WineSignature {
    /// `Wine builtin DLL`
    Builtin,
    /// `Wine placeholder DLL`
    FakeDll,
}

/// The fixed part of the optional header.
#[derive(Clone)]
pub enum OptionalHeader<'a> {
    #[allow(missing_docs)]
    Pe32(&'a IMAGE_OPTIONAL_HEADER32),
    #[allow(missing_docs)]
    Pe64(&'a IMAGE_OPTIONAL_HEADER64),
    /// The magic number is neither PE32 nor PE32+, or the header is too short.
    Other {
        #[allow(missing_docs)]
        magic: u16,
    },
}

impl<'a> OptionalHeader<'a> {
    /// The preferred load address.
    pub fn image_base(&self) -> u64 {
        match self {
            Self::Pe32(h) => h.image_base.get() as u64,
            Self::Pe64(h) => h.image_base.get(),
            Self::Other { .. } => 0,
        }
    }

    /// True for PE32+.
    pub fn is_64bit(&self) -> bool {
        matches!(self, Self::Pe64(_))
    }

    fn fixed_size(&self) -> usize {
        match self {
            Self::Pe32(_) => size_of::<IMAGE_OPTIONAL_HEADER32>(),
            Self::Pe64(_) => size_of::<IMAGE_OPTIONAL_HEADER64>(),
            Self::Other { .. } => 0,
        }
    }

    fn number_of_rva_and_sizes(&self) -> u32 {
        match self {
            Self::Pe32(h) => h.number_of_rva_and_sizes.get(),
            Self::Pe64(h) => h.number_of_rva_and_sizes.get(),
            Self::Other { .. } => 0,
        }
    }
}

/// A decoded PE image.
pub struct PeImage<'a> {
    #[allow(missing_docs)]
    pub dos: &'a IMAGE_DOS_HEADER,
    /// File offset of the `PE\0\0` signature.
    pub nt_offset: usize,
    #[allow(missing_docs)]
    pub wine: Option<WineSignature>,
    #[allow(missing_docs)]
    pub file_header: &'a IMAGE_FILE_HEADER,
    #[allow(missing_docs)]
    pub optional: OptionalHeader<'a>,
    /// The data directories, in slot order. `tag` is the slot number; offsets are RVAs.
    pub data_directories: Vec<DirectoryEntry>,
    #[allow(missing_docs)]
    pub sections: &'a [IMAGE_SECTION_HEADER],

    // Each of these is `None` when the image has no such directory.
    #[allow(missing_docs)]
    pub exports: Option<LocalResult<Exports<'a>>>,
    #[allow(missing_docs)]
    pub imports: Option<LocalResult<Vec<ImportedDll<'a>>>>,
    #[allow(missing_docs)]
    pub delay_imports: Option<LocalResult<Vec<ImportedDll<'a>>>>,
    #[allow(missing_docs)]
    pub debug: Option<LocalResult<Vec<DebugEntry<'a>>>>,
    #[allow(missing_docs)]
    pub resources: Option<LocalResult<ResourceDirectory>>,
    #[allow(missing_docs)]
    pub tls: Option<LocalResult<Tls>>,
    #[allow(missing_docs)]
    pub relocs: Option<LocalResult<Vec<RelocBlock>>>,
    #[allow(missing_docs)]
    pub load_config: Option<LocalResult<LoadConfig>>,
    #[allow(missing_docs)]
    pub exceptions: Option<LocalResult<Exceptions>>,
    #[allow(missing_docs)]
    pub clr: Option<LocalResult<Clr<'a>>>,
    /// The COFF symbol table the file header points at.
    pub symbols: Option<LocalResult<Vec<CoffSymbol<'a>>>>,
}

impl<'a> PeImage<'a> {
    /// Gets a data directory by slot, if it is present and non-empty.
    pub fn directory(&self, slot: usize) -> Option<DirectoryEntry> {
        self.data_directories
            .get(slot)
            .copied()
            .filter(|d| d.offset != 0 && d.length != 0)
    }

    /// The machine this image was built for.
    pub fn machine(&self) -> IMAGE_FILE_MACHINE {
        IMAGE_FILE_MACHINE(self.file_header.machine.get())
    }
}

/// RVA-domain access to an image, shared by the directory walkers.
#[derive(Clone, Copy)]
pub struct RvaMap<'a> {
    #[allow(missing_docs)]
    pub view: &'a ImageView,
    #[allow(missing_docs)]
    pub sections: &'a [IMAGE_SECTION_HEADER],
    /// True if pointer-sized values (thunks, TLS callbacks) are 64-bit.
    pub is_64bit: bool,
    #[allow(missing_docs)]
    pub image_base: u64,
}

impl<'a> RvaMap<'a> {
    /// Returns a cursor over `[rva, rva + size)`.
    pub fn cursor(&self, rva: u32, size: u32, what: &'static str) -> LocalResult<Cursor<'a>> {
        let offset = self
            .view
            .translate_rva(self.sections, rva, size)
            .ok_or(LocalError::overrun(what))?;
        self.view
            .cursor_at(offset, size as usize)
            .ok_or(LocalError::OutOfBounds)
    }

    /// Reads a `u32` at an RVA.
    pub fn u32(&self, rva: u32) -> LocalResult<u32> {
        Ok(self.cursor(rva, 4, "u32")?.u32()?)
    }

    /// Reads a pointer-sized value at an RVA.
    pub fn pointer(&self, rva: u32) -> LocalResult<u64> {
        if self.is_64bit {
            Ok(self.cursor(rva, 8, "pointer")?.u64()?)
        } else {
            Ok(self.u32(rva)? as u64)
        }
    }

    /// The size of a pointer in this image.
    pub fn pointer_size(&self) -> u32 {
        if self.is_64bit { 8 } else { 4 }
    }

    /// Reads a NUL-terminated string at an RVA.
    pub fn strz(&self, rva: u32) -> LocalResult<&'a BStr> {
        self.view
            .strz_at_rva(self.sections, rva)
            .ok_or(LocalError::OutOfBounds)
    }
}

/// Decodes a PE image. The DOS header, NT signature, file header and section table are mandatory.
pub fn decode(view: &ImageView) -> anyhow::Result<PeImage<'_>> {
    let dos = dos::read_header(view)?;
    let nt_offset = dos.e_lfanew.get() as usize;

    if view.u32_at(nt_offset) != Some(IMAGE_NT_SIGNATURE) {
        bail!("missing PE signature at 0x{nt_offset:x}");
    }

    let wine = wine_signature(view);

    let file_header_offset = nt_offset + 4;
    let file_header: &IMAGE_FILE_HEADER = view
        .get(file_header_offset)
        .context("the PE file header is truncated")?;

    let optional_offset = file_header_offset + size_of::<IMAGE_FILE_HEADER>();
    let optional_size = file_header.size_of_optional_header.get() as usize;
    let optional = read_optional_header(view, optional_offset, optional_size);

    let data_directories = read_data_directories(view, &optional, optional_offset, optional_size);

    let sections_offset = optional_offset + optional_size;
    let num_sections = file_header.number_of_sections.get() as usize;
    let sections: &[IMAGE_SECTION_HEADER] = view
        .cursor_from(sections_offset)
        .and_then(|mut c| c.slice(num_sections).ok())
        .context("the section table is truncated")?;

    tracing::debug!(
        num_sections,
        num_directories = data_directories.len(),
        "PE headers at 0x{nt_offset:x}"
    );

    let map = RvaMap {
        view,
        sections,
        is_64bit: optional.is_64bit(),
        image_base: optional.image_base(),
    };

    let mut pe = PeImage {
        dos,
        nt_offset,
        wine,
        file_header,
        optional,
        data_directories,
        sections,
        exports: None,
        imports: None,
        delay_imports: None,
        debug: None,
        resources: None,
        tls: None,
        relocs: None,
        load_config: None,
        exceptions: None,
        clr: None,
        symbols: None,
    };

    if let Some(d) = pe.directory(IMAGE_DIRECTORY_ENTRY_EXPORT) {
        pe.exports = Some(isolate("exports", || exports::decode(&map, d)));
    }
    if let Some(d) = pe.directory(IMAGE_DIRECTORY_ENTRY_IMPORT) {
        pe.imports = Some(isolate("imports", || imports::decode_imports(&map, d)));
    }
    if let Some(d) = pe.directory(IMAGE_DIRECTORY_ENTRY_DELAY_IMPORT) {
        pe.delay_imports = Some(isolate("delay imports", || {
            imports::decode_delay_imports(&map, d)
        }));
    }
    if let Some(d) = pe.directory(IMAGE_DIRECTORY_ENTRY_DEBUG) {
        pe.debug = Some(isolate("debug directory", || debug::decode_pe(&map, d)));
    }
    if let Some(d) = pe.directory(IMAGE_DIRECTORY_ENTRY_RESOURCE) {
        pe.resources = Some(isolate("resources", || resources::decode(&map, d)));
    }
    if let Some(d) = pe.directory(IMAGE_DIRECTORY_ENTRY_TLS) {
        pe.tls = Some(isolate("TLS", || tls::decode(&map, d)));
    }
    if let Some(d) = pe.directory(IMAGE_DIRECTORY_ENTRY_BASERELOC) {
        pe.relocs = Some(isolate("relocations", || relocs::decode(&map, d)));
    }
    if let Some(d) = pe.directory(IMAGE_DIRECTORY_ENTRY_LOAD_CONFIG) {
        pe.load_config = Some(isolate("load configuration", || load_config::decode(&map, d)));
    }
    if let Some(d) = pe.directory(IMAGE_DIRECTORY_ENTRY_EXCEPTION) {
        let machine = pe.machine();
        pe.exceptions = Some(isolate("exceptions", || exceptions::decode(&map, d, machine)));
    }
    if let Some(d) = pe.directory(IMAGE_DIRECTORY_ENTRY_COM_DESCRIPTOR) {
        pe.clr = Some(isolate("CLR header", || clr::decode(&map, d)));
    }

    let symbol_table = file_header.pointer_to_symbol_table.get();
    let num_symbols = file_header.number_of_symbols.get();
    if symbol_table != 0 && num_symbols != 0 {
        pe.symbols = Some(isolate("COFF symbols", || {
            symbols::decode_file_table(view, symbol_table, num_symbols)
        }));
    }

    Ok(pe)
}

/// Wine places its signature right after the 64-byte DOS header.
fn wine_signature(view: &ImageView) -> Option<WineSignature> {
    let at = size_of::<IMAGE_DOS_HEADER>();
    if view.read(at, WINE_BUILTIN_SIGNATURE.len()) == Some(WINE_BUILTIN_SIGNATURE) {
        Some(WineSignature::Builtin)
    } else if view.read(at, WINE_FAKEDLL_SIGNATURE.len()) == Some(WINE_FAKEDLL_SIGNATURE) {
        Some(WineSignature::FakeDll)
    } else {
        None
    }
}

fn read_optional_header(view: &ImageView, offset: usize, size: usize) -> OptionalHeader<'_> {
    let Some(magic) = view.u16_at(offset) else {
        return OptionalHeader::Other { magic: 0 };
    };

    match magic {
        IMAGE_NT_OPTIONAL_HDR32_MAGIC if size >= size_of::<IMAGE_OPTIONAL_HEADER32>() => {
            match view.get(offset) {
                Some(h) => OptionalHeader::Pe32(h),
                None => OptionalHeader::Other { magic },
            }
        }
        IMAGE_NT_OPTIONAL_HDR64_MAGIC if size >= size_of::<IMAGE_OPTIONAL_HEADER64>() => {
            match view.get(offset) {
                Some(h) => OptionalHeader::Pe64(h),
                None => OptionalHeader::Other { magic },
            }
        }
        _ => OptionalHeader::Other { magic },
    }
}

/// Reads as many data directories as the header declares and the optional header has room for.
fn read_data_directories(
    view: &ImageView,
    optional: &OptionalHeader,
    offset: usize,
    size: usize,
) -> Vec<DirectoryEntry> {
    let fixed = optional.fixed_size();
    if fixed == 0 {
        return Vec::new();
    }

    let room = size.saturating_sub(fixed) / size_of::<IMAGE_DATA_DIRECTORY>();
    let declared = optional.number_of_rva_and_sizes() as usize;
    let count = declared.min(room).min(IMAGE_NUMBEROF_DIRECTORY_ENTRIES);
    if count < declared {
        tracing::warn!(declared, count, "data directory count clipped");
    }

    let Some(dirs) = view
        .cursor_at(offset + fixed, count * size_of::<IMAGE_DATA_DIRECTORY>())
        .and_then(|mut c| c.slice::<IMAGE_DATA_DIRECTORY>(count).ok())
    else {
        return Vec::new();
    };

    dirs.iter()
        .enumerate()
        .map(|(slot, d)| {
            DirectoryEntry::new(
                Base::Rva,
                slot as u32,
                d.virtual_address.get(),
                d.size.get(),
            )
        })
        .collect()
}
