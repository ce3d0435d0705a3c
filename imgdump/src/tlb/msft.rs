//! The MSFT type library encoding.
//!
//! ```text
//! MSFT_Header
//! help DLL string offset   (if varflags & HELPDLLFLAG)
//! typeinfo offsets         i32[nrtypeinfos]
//! segment directory        MSFT_Segment[15]
//! ```
//!
//! Every segment is a flat table. Typeinfos are fixed-size records in the typeinfo segment; the
//! other tables are addressed by byte offsets relative to the start of their segment. Member
//! data (functions and variables) lives outside the segments, at the file offset given by each
//! typeinfo's `memoffset`.

#[cfg(test)]
mod tests;

use super::{
    Function, ImplType, Members, Param, TypeDesc, TypeKind, TypeinfoRecord, VT_TYPEMASK, VarKind,
    Variable, vt,
};
use crate::error::{LocalError, LocalResult, isolate};
use crate::view::{Cursor, ImageView};
use crate::{Base, DirectoryEntry};
use anyhow::{Context, bail};
use bstr::ByteSlice;
use std::collections::HashSet;
use std::mem::size_of;
use uuid::Uuid;
use zerocopy::{I32, LE, U16, U32};
use zerocopy_derive::*;

/// `varflags` bit: a help DLL string offset follows the header.
pub const HELPDLLFLAG: u32 = 0x100;

/// Every segment descriptor of a well-formed directory has this in `res0c`.
const SEGMENT_MARKER: i32 = 0x0f;

/// Nesting limit for type descriptors that point at other type descriptors.
const MAX_TYPE_DEPTH: u32 = 16;

#[allow(missing_docs)]
#[repr(C)]
#[derive(Clone, Debug, FromBytes, Immutable, KnownLayout, Unaligned)]
pub struct MSFT_Header {
    pub magic1: U32<LE>,
    pub magic2: U32<LE>,
    pub posguid: I32<LE>,
    pub lcid: U32<LE>,
    pub lcid2: U32<LE>,
    /// Low nibble is the `SYSKIND`.
    pub varflags: U32<LE>,
    pub version: U32<LE>,
    pub flags: U32<LE>,
    pub nrtypeinfos: U32<LE>,
    pub helpstring: I32<LE>,
    pub helpstringcontext: U32<LE>,
    pub helpcontext: U32<LE>,
    pub nametablecount: U32<LE>,
    pub nametablechars: U32<LE>,
    pub name_offset: I32<LE>,
    pub helpfile: I32<LE>,
    pub custom_data_offset: I32<LE>,
    pub res44: U32<LE>,
    pub res48: U32<LE>,
    pub dispatchpos: I32<LE>,
    pub nimpinfos: U32<LE>,
}

#[allow(missing_docs)]
#[repr(C)]
#[derive(Clone, Debug, FromBytes, Immutable, KnownLayout, Unaligned)]
pub struct MSFT_Segment {
    pub offset: I32<LE>,
    pub length: I32<LE>,
    pub res08: I32<LE>,
    pub res0c: I32<LE>,
}

#[allow(missing_docs)]
#[repr(C)]
#[derive(Clone, Debug, FromBytes, Immutable, KnownLayout, Unaligned)]
pub struct MSFT_TypeInfoBase {
    /// Low nibble is the `TYPEKIND`; bits 11..16 are the alignment.
    pub typekind: U32<LE>,
    pub memoffset: I32<LE>,
    pub res2: U32<LE>,
    pub res3: U32<LE>,
    pub res4: U32<LE>,
    pub res5: U32<LE>,
    /// Low word: function count. High word: variable count.
    pub c_element: U32<LE>,
    pub res7: U32<LE>,
    pub res8: U32<LE>,
    pub res9: U32<LE>,
    pub res_a: U32<LE>,
    pub posguid: I32<LE>,
    pub flags: U32<LE>,
    pub name_offset: I32<LE>,
    pub version: U32<LE>,
    pub docstringoffs: I32<LE>,
    pub helpstringcontext: U32<LE>,
    pub helpcontext: U32<LE>,
    pub o_cust_data: I32<LE>,
    pub c_impl_types: U16<LE>,
    pub cb_size_vft: U16<LE>,
    pub size: U32<LE>,
    /// Coclass: first reference record. Alias: the aliased type. Module: DLL name string.
    /// Interface: the base interface.
    pub datatype1: I32<LE>,
    pub datatype2: I32<LE>,
    pub res18: U32<LE>,
    pub res19: U32<LE>,
}

static_assertions::const_assert_eq!(size_of::<MSFT_Header>(), 0x54);
static_assertions::const_assert_eq!(size_of::<MSFT_Segment>(), 16);
static_assertions::const_assert_eq!(size_of::<MSFT_TypeInfoBase>(), 0x64);

/// Size of the fixed part of a function record.
const FUNC_RECORD_FIXED: usize = 24;
/// Size of the fixed part of a variable record.
const VAR_RECORD_FIXED: usize = 20;
/// Size of a parameter info at the end of a function record.
const PARAM_INFO_SIZE: usize = 12;
/// Size of an import info.
const IMPINFO_SIZE: usize = 12;

/// `MSFT_ImpInfo.flags`: `o_guid` is an offset in the GUID table rather than a typeinfo index.
pub const IMPINFO_OFFSET_IS_GUID: u32 = 0x0001_0000;

macro_rules! segments {
    ($($index:expr, $name:ident;)*) => {
        $(
            #[allow(missing_docs)]
            pub const $name: usize = $index;
        )*

        /// Names of the segments, in directory order.
        pub static SEGMENT_NAMES: [&str; SEGMENT_COUNT] = [
            $(stringify!($name),)*
        ];
    }
}

/// Number of entries in the segment directory.
pub const SEGMENT_COUNT: usize = 15;

segments! {
    0, SEG_TYPEINFO;
    1, SEG_IMPORTINFO;
    2, SEG_IMPORTFILES;
    3, SEG_REFERENCES;
    4, SEG_GUIDHASH;
    5, SEG_GUID;
    6, SEG_NAMEHASH;
    7, SEG_NAME;
    8, SEG_STRING;
    9, SEG_TYPEDESC;
    10, SEG_ARRAYDESC;
    11, SEG_CUSTDATA;
    12, SEG_CUSTDATAGUID;
    13, SEG_UNKNOWN;
    14, SEG_UNKNOWN2;
}

/// A decoded MSFT type library.
pub struct MsftLibrary {
    #[allow(missing_docs)]
    pub header: MSFT_Header,
    #[allow(missing_docs)]
    pub help_dll: Option<LocalResult<String>>,
    /// The typeinfo offset array that precedes the segment directory.
    pub typeinfo_offsets: Vec<u32>,
    /// One entry per segment. `tag` is the segment number; offsets are file offsets.
    pub segments: Vec<DirectoryEntry>,
    #[allow(missing_docs)]
    pub guid: Option<Uuid>,
    #[allow(missing_docs)]
    pub name: LocalResult<String>,
    #[allow(missing_docs)]
    pub doc: Option<LocalResult<String>>,
    #[allow(missing_docs)]
    pub help_file: Option<LocalResult<String>>,
    #[allow(missing_docs)]
    pub import_files: LocalResult<Vec<ImportFile>>,
    #[allow(missing_docs)]
    pub import_infos: LocalResult<Vec<ImportInfo>>,
    #[allow(missing_docs)]
    pub typeinfos: Vec<LocalResult<TypeinfoRecord>>,
}

impl MsftLibrary {
    /// `major.minor`
    pub fn version(&self) -> (u16, u16) {
        split_version(self.header.version.get())
    }

    /// The `SYSKIND`: 0 win16, 1 win32, 2 mac, 3 win64.
    pub fn syskind(&self) -> u32 {
        self.header.varflags.get() & 0xf
    }
}

/// A type library this one imports types from.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ImportFile {
    /// Offset of the entry within the import file segment.
    pub offset: u32,
    #[allow(missing_docs)]
    pub guid: Option<Uuid>,
    #[allow(missing_docs)]
    pub lcid: u32,
    /// `major.minor`
    pub version: (u16, u16),
    #[allow(missing_docs)]
    pub name: String,
}

/// One imported type.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ImportInfo {
    /// Offset of the entry within the import info segment. Imported hreftypes point here.
    pub offset: u32,
    #[allow(missing_docs)]
    pub flags: u32,
    /// Offset of the import file entry that holds the type.
    pub file_offset: i32,
    #[allow(missing_docs)]
    pub target: ImportTarget,
}

/// How an imported type is identified within its library.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ImportTarget {
    #[allow(missing_docs)]
    Guid(Uuid),
    #[allow(missing_docs)]
    Index(u32),
}

fn split_version(v: u32) -> (u16, u16) {
    (v as u16, (v >> 16) as u16)
}

fn lossy(bytes: &[u8]) -> String {
    bytes.to_str_lossy().into_owned()
}

#[allow(missing_docs)]
pub fn decode(view: &ImageView) -> anyhow::Result<MsftLibrary> {
    let header: MSFT_Header = view.copy(0).context("the MSFT header is truncated")?;
    if header.magic1.get() != crate::sig::MSFT_SIGNATURE {
        bail!("not an MSFT type library");
    }

    let ntypeinfos = header.nrtypeinfos.get() as usize;
    let has_help_dll = header.varflags.get() & HELPDLLFLAG != 0;

    let mut c = view
        .cursor_from(size_of::<MSFT_Header>())
        .context("the MSFT header is truncated")?;
    let help_dll_offset = if has_help_dll {
        Some(c.i32().context("the help DLL offset is truncated")?)
    } else {
        None
    };
    if ntypeinfos > c.len() / 4 {
        bail!("the typeinfo count ({ntypeinfos}) exceeds the file size");
    }
    let typeinfo_offsets: &[U32<LE>] = c
        .slice(ntypeinfos)
        .context("the typeinfo offsets are truncated")?;
    let segdir_offset = c.file_offset();
    let segdir: &[MSFT_Segment] = c
        .slice(SEGMENT_COUNT)
        .context("the segment directory is truncated")?;

    if segdir[SEG_TYPEINFO].res0c.get() != SEGMENT_MARKER
        || segdir[SEG_IMPORTINFO].res0c.get() != SEGMENT_MARKER
    {
        bail!("cannot find the segment directory at 0x{segdir_offset:x}");
    }

    let segments: Vec<DirectoryEntry> = segdir
        .iter()
        .enumerate()
        .map(|(i, s)| {
            DirectoryEntry::new(
                Base::FileOffset,
                i as u32,
                s.offset.get() as u32,
                s.length.get() as u32,
            )
        })
        .collect();
    for (s, name) in segments.iter().zip(SEGMENT_NAMES.iter()) {
        tracing::trace!(offset = s.offset, length = s.length, "{name}");
    }

    let mut tables = Tables {
        view,
        segments: &segments,
        typeinfo_names: Vec::new(),
        import_infos: Vec::new(),
        import_files: Vec::new(),
    };

    let import_files = isolate("import files", || tables.read_import_files());
    let import_infos = isolate("import infos", || tables.read_import_infos());
    if let Ok(files) = &import_files {
        tables.import_files = files.clone();
    }
    if let Ok(infos) = &import_infos {
        tables.import_infos = infos.clone();
    }

    // The names come first so that references between typeinfos can be resolved.
    let bases: Vec<LocalResult<MSFT_TypeInfoBase>> =
        (0..ntypeinfos).map(|i| tables.typeinfo_base(i)).collect();
    tables.typeinfo_names = bases
        .iter()
        .map(|b| {
            b.as_ref()
                .ok()
                .and_then(|b| tables.name(b.name_offset.get()).ok())
        })
        .collect();

    let typeinfos = bases
        .into_iter()
        .map(|b| isolate("typeinfo", || Ok(tables.typeinfo(&b?))))
        .collect();

    Ok(MsftLibrary {
        help_dll: help_dll_offset.and_then(|o| tables.string(o)),
        typeinfo_offsets: typeinfo_offsets.iter().map(|o| o.get()).collect(),
        guid: tables.guid(header.posguid.get()),
        name: tables.name(header.name_offset.get()),
        doc: tables.string(header.helpstring.get()),
        help_file: tables.string(header.helpfile.get()),
        import_files,
        import_infos,
        typeinfos,
        segments,
        header,
    })
}

/// Access to the segment tables of one library.
struct Tables<'a> {
    view: &'a ImageView,
    segments: &'a [DirectoryEntry],
    typeinfo_names: Vec<Option<String>>,
    import_infos: Vec<ImportInfo>,
    import_files: Vec<ImportFile>,
}

impl<'a> Tables<'a> {
    fn segment(&self, seg: usize) -> LocalResult<Cursor<'a>> {
        let e = self.segments[seg];
        if (e.offset as i32) < 0 || (e.length as i32) < 0 {
            return Err(LocalError::invalid("the segment is absent"));
        }
        self.view
            .cursor_at(e.offset as usize, e.length as usize)
            .ok_or(LocalError::overrun("segment"))
    }

    /// A cursor at `offset` within a segment, running to the end of the segment.
    fn table_at(&self, seg: usize, offset: i32) -> LocalResult<Cursor<'a>> {
        if offset < 0 {
            return Err(LocalError::OutOfBounds);
        }
        Ok(self.segment(seg)?.at(offset as usize)?)
    }

    /// Names are `{ hreftype, next_hash, namelen }` followed by the characters. Only the low byte
    /// of `namelen` is the length.
    fn name(&self, offset: i32) -> LocalResult<String> {
        let mut c = self.table_at(SEG_NAME, offset)?;
        c.skip(8)?;
        let len = c.u32()? & 0xff;
        Ok(lossy(c.bytes(len as usize)?))
    }

    /// Strings are a `u16` length followed by the characters. Negative offsets mean "none".
    fn string(&self, offset: i32) -> Option<LocalResult<String>> {
        if offset < 0 {
            return None;
        }
        Some((|| {
            let mut c = self.table_at(SEG_STRING, offset)?;
            let len = c.u16()?;
            Ok(lossy(c.bytes(len as usize)?))
        })())
    }

    fn guid(&self, offset: i32) -> Option<Uuid> {
        if offset < 0 {
            return None;
        }
        match self.table_at(SEG_GUID, offset).and_then(|mut c| Ok(c.guid()?)) {
            Ok(g) => Some(g),
            Err(e) => {
                tracing::warn!("GUID at 0x{offset:x}: {e}");
                None
            }
        }
    }

    fn is_absent(&self, seg: usize) -> bool {
        self.segments[seg].offset as i32 == -1
    }

    fn read_import_files(&self) -> LocalResult<Vec<ImportFile>> {
        if self.is_absent(SEG_IMPORTFILES) {
            return Ok(Vec::new());
        }
        let seg = self.segment(SEG_IMPORTFILES)?;
        let mut files = Vec::new();
        let mut pos = 0;
        while pos < seg.len() {
            let mut c = seg.at(pos)?;
            let guid = self.guid(c.i32()?);
            let lcid = c.u32()?;
            let version = split_version(c.u32()?);
            let len = (c.u16()? >> 2) as usize;
            let name = lossy(c.bytes(len)?);
            files.push(ImportFile {
                offset: pos as u32,
                guid,
                lcid,
                version,
                name,
            });
            pos = (pos + 14 + len + 3) & !3;
        }
        Ok(files)
    }

    fn read_import_infos(&self) -> LocalResult<Vec<ImportInfo>> {
        if self.is_absent(SEG_IMPORTINFO) {
            return Ok(Vec::new());
        }
        let mut seg = self.segment(SEG_IMPORTINFO)?;
        let mut infos = Vec::new();
        while seg.len() >= IMPINFO_SIZE {
            let offset = seg.position() as u32;
            let flags = seg.u32()?;
            let file_offset = seg.i32()?;
            let o_guid = seg.i32()?;
            let target = if flags & IMPINFO_OFFSET_IS_GUID != 0 {
                match self.guid(o_guid) {
                    Some(g) => ImportTarget::Guid(g),
                    None => ImportTarget::Index(o_guid as u32),
                }
            } else {
                ImportTarget::Index(o_guid as u32)
            };
            infos.push(ImportInfo {
                offset,
                flags,
                file_offset,
                target,
            });
        }
        Ok(infos)
    }

    fn typeinfo_base(&self, index: usize) -> LocalResult<MSFT_TypeInfoBase> {
        let mut c = self.table_at(SEG_TYPEINFO, (index * size_of::<MSFT_TypeInfoBase>()) as i32)?;
        Ok(c.copy()?)
    }

    fn typeinfo(&self, base: &MSFT_TypeInfoBase) -> TypeinfoRecord {
        let kind = TypeKind((base.typekind.get() & 0xf) as u8);
        let c_element = base.c_element.get();
        let name = self.name(base.name_offset.get());
        tracing::debug!("typeinfo {:?} {kind}", name.as_deref().unwrap_or("?"));

        let alias = (kind == TypeKind::TKIND_ALIAS).then(|| self.type_desc(base.datatype1.get()));
        let dll_name = if kind == TypeKind::TKIND_MODULE {
            self.string(base.datatype1.get())
        } else {
            None
        };

        TypeinfoRecord {
            kind,
            name,
            guid: self.guid(base.posguid.get()),
            version: split_version(base.version.get()),
            flags: base.flags.get(),
            doc: self.string(base.docstringoffs.get()),
            help_context: base.helpcontext.get(),
            function_count: c_element as u16,
            variable_count: (c_element >> 16) as u16,
            impl_count: base.c_impl_types.get(),
            element_offset: base.memoffset.get() as u32,
            alias,
            dll_name,
            members: self.members(base, kind),
        }
    }

    fn members(&self, base: &MSFT_TypeInfoBase, kind: TypeKind) -> LocalResult<Members> {
        let nfuncs = (base.c_element.get() & 0xffff) as usize;
        let nvars = (base.c_element.get() >> 16) as usize;
        let mut members = Members::default();

        if nfuncs + nvars != 0 {
            let memoffset = base.memoffset.get();
            if memoffset < 0 {
                return Err(LocalError::invalid("member data is absent"));
            }
            let mut c = self
                .view
                .cursor_from(memoffset as usize)
                .ok_or(LocalError::OutOfBounds)?;
            let infolen = c.u32()? as usize;
            if infolen > c.len() {
                return Err(LocalError::overrun("member records"));
            }
            let records = c.sub(infolen)?;
            let n = nfuncs + nvars;
            if n * 12 > c.len() {
                return Err(LocalError::overrun("member arrays"));
            }
            let memids: &[U32<LE>] = c.slice(n)?;
            let names: &[I32<LE>] = c.slice(n)?;
            let recoffsets: &[U32<LE>] = c.slice(n)?;

            let mut pos = 0;
            for i in 0..nfuncs {
                let memid = memids[i].get();
                let name = self.name(names[i].get());
                match isolate("function record", || self.function(&records, pos, memid, name)) {
                    Ok((len, f)) => {
                        members.functions.push(Ok(f));
                        pos += len;
                    }
                    Err(e) => {
                        // The next record cannot be found without this one's size.
                        members.functions.push(Err(e));
                        break;
                    }
                }
            }

            if nvars != 0 {
                let mut pos = recoffsets[nfuncs].get() as usize;
                for i in nfuncs..n {
                    let memid = memids[i].get();
                    let name = self.name(names[i].get());
                    match isolate("variable record", || self.variable(&records, pos, memid, name)) {
                        Ok((len, v)) => {
                            members.variables.push(Ok(v));
                            pos += len;
                        }
                        Err(e) => {
                            members.variables.push(Err(e));
                            break;
                        }
                    }
                }
            }
        }

        let count = base.c_impl_types.get() as usize;
        let first = base.datatype1.get();
        if count != 0 && first != -1 {
            if kind == TypeKind::TKIND_COCLASS {
                members.impls = self.impl_chain(first, count)?;
            } else {
                members.impls.push(ImplType {
                    type_: self.user_defined(first as u32),
                    flags: 0,
                });
            }
        }

        Ok(members)
    }

    /// Decodes the function record at `pos`. Returns its size, for finding the next one.
    fn function(
        &self,
        records: &Cursor<'a>,
        pos: usize,
        memid: u32,
        name: LocalResult<String>,
    ) -> LocalResult<(usize, Function)> {
        let mut c = records.at(pos)?;
        let len = (c.u32()? & 0xffff) as usize;
        if len < FUNC_RECORD_FIXED || len > records.len() - pos {
            return Err(LocalError::overrun("function record"));
        }
        let data_type = c.i32()?;
        let flags = c.u32()?;
        let vtable_offset = c.i16()?;
        let _funcdescsize = c.u16()?;
        let fkccic = c.u32()?;
        let nargs = c.u16()? as usize;
        let nopt = c.u16()?;
        if FUNC_RECORD_FIXED + nargs * PARAM_INFO_SIZE > len {
            return Err(LocalError::overrun("function parameters"));
        }

        let mut p = records.at(pos + len - nargs * PARAM_INFO_SIZE)?;
        let mut params = Vec::with_capacity(nargs);
        for _ in 0..nargs {
            let dt = p.i32()?;
            let o_name = p.i32()?;
            let pflags = p.u32()?;
            params.push(Param {
                name: (o_name >= 0).then(|| self.name(o_name)),
                type_: self.type_desc(dt),
                flags: pflags as u16,
            });
        }

        Ok((
            len,
            Function {
                memid,
                name,
                return_type: self.type_desc(data_type),
                invoke_kind: ((fkccic >> 3) & 0xf) as u8,
                call_conv: ((fkccic >> 8) & 0xf) as u8,
                flags: flags as u16,
                vtable_offset,
                optional_params: nopt,
                params,
            },
        ))
    }

    fn variable(
        &self,
        records: &Cursor<'a>,
        pos: usize,
        memid: u32,
        name: LocalResult<String>,
    ) -> LocalResult<(usize, Variable)> {
        let mut c = records.at(pos)?;
        let len = (c.u32()? & 0xff) as usize;
        if len < VAR_RECORD_FIXED || len > records.len() - pos {
            return Err(LocalError::overrun("variable record"));
        }
        let data_type = c.i32()?;
        let flags = c.u32()?;
        let var_kind = c.u16()?;
        let _vardescsize = c.u16()?;
        let offs_value = c.i32()?;

        let kind = match var_kind {
            0 => VarKind::PerInstance(offs_value as u32),
            1 => VarKind::Static,
            2 => self.constant(offs_value),
            3 => VarKind::Dispatch,
            _ => return Err(LocalError::invalid("unknown variable kind")),
        };

        Ok((
            len,
            Variable {
                memid,
                name,
                type_: self.type_desc(data_type),
                flags: flags as u16,
                kind,
            },
        ))
    }

    /// Small constants are packed into the offset itself: `0x80000000 | vt << 26 | value`.
    /// Others live in the custom data segment as a `u16` variant type and the value.
    fn constant(&self, offs_value: i32) -> VarKind {
        if offs_value < 0 {
            return VarKind::Const((offs_value & 0x03ff_ffff) as i64);
        }
        let r = (|| -> LocalResult<VarKind> {
            let mut c = self.table_at(SEG_CUSTDATA, offs_value)?;
            Ok(match c.u16()? {
                vt::VT_I2 => VarKind::Const(c.i16()? as i64),
                vt::VT_I1 | vt::VT_I4 | vt::VT_INT | vt::VT_ERROR | vt::VT_HRESULT => {
                    VarKind::Const(c.i32()? as i64)
                }
                vt::VT_UI1 | vt::VT_UI2 | vt::VT_UI4 | vt::VT_UINT | vt::VT_BOOL => {
                    VarKind::Const(c.u32()? as i64)
                }
                vt::VT_I8 | vt::VT_UI8 => VarKind::Const(c.i64()?),
                _ => VarKind::ConstUnknown,
            })
        })();
        r.unwrap_or(VarKind::ConstUnknown)
    }

    /// Follows the reference records of a coclass, at most `count` of them.
    fn impl_chain(&self, first: i32, count: usize) -> LocalResult<Vec<ImplType>> {
        let mut impls = Vec::new();
        let mut seen = HashSet::new();
        let mut offset = first;
        while offset >= 0 && impls.len() < count {
            if !seen.insert(offset) {
                return Err(LocalError::invalid("implemented interface chain revisits a record"));
            }
            let mut c = self.table_at(SEG_REFERENCES, offset)?;
            let reftype = c.u32()?;
            let flags = c.u32()?;
            let _o_cust_data = c.i32()?;
            offset = c.i32()?;
            impls.push(ImplType {
                type_: self.user_defined(reftype),
                flags,
            });
        }
        Ok(impls)
    }

    /// A data type is either an inline variant type (high bit set) or an offset in the type
    /// descriptor segment.
    fn type_desc(&self, data_type: i32) -> TypeDesc {
        if data_type < 0 {
            return TypeDesc::Base(data_type as u16 & VT_TYPEMASK);
        }
        self.type_desc_at(data_type, 0)
            .unwrap_or(TypeDesc::Invalid(data_type as u32))
    }

    fn type_desc_at(&self, offset: i32, depth: u32) -> LocalResult<TypeDesc> {
        if depth > MAX_TYPE_DEPTH {
            return Err(LocalError::invalid("type descriptors nest too deeply"));
        }
        let mut c = self.table_at(SEG_TYPEDESC, offset)?;
        let vt = c.u16()? & VT_TYPEMASK;
        let _flags = c.u16()?;
        let r = c.i32()?;

        let inner = |r: i32| -> LocalResult<Box<TypeDesc>> {
            Ok(Box::new(if r < 0 {
                TypeDesc::Base(r as u16 & VT_TYPEMASK)
            } else {
                self.type_desc_at(r, depth + 1)?
            }))
        };

        Ok(match vt {
            vt::VT_PTR => TypeDesc::Ptr(inner(r)?),
            vt::VT_SAFEARRAY => TypeDesc::SafeArray(inner(r)?),
            vt::VT_CARRAY => {
                let mut a = self.table_at(SEG_ARRAYDESC, r)?;
                let element = inner(a.i32()?)?;
                let dims = a.u16()? as usize;
                let _size = a.u16()?;
                if dims * 8 > a.len() {
                    return Err(LocalError::overrun("array bounds"));
                }
                let mut bounds = Vec::with_capacity(dims);
                for _ in 0..dims {
                    bounds.push((a.u32()?, a.i32()?));
                }
                TypeDesc::CArray { element, bounds }
            }
            vt::VT_USERDEFINED => self.user_defined(r as u32),
            vt => TypeDesc::Base(vt),
        })
    }

    /// Local hreftypes are offsets of typeinfos in the typeinfo segment. Imported ones have bit 0
    /// set and point at an import info.
    fn user_defined(&self, href: u32) -> TypeDesc {
        let name = if href & 1 == 0 {
            let index = href as usize / size_of::<MSFT_TypeInfoBase>();
            self.typeinfo_names.get(index).cloned().flatten()
        } else {
            self.import_infos
                .iter()
                .find(|i| i.offset == href & !3)
                .map(|info| {
                    let file = self
                        .import_files
                        .iter()
                        .find(|f| f.offset as i32 == info.file_offset)
                        .map(|f| f.name.as_str())
                        .unwrap_or("?");
                    match &info.target {
                        ImportTarget::Guid(g) => format!("{file}:{}", crate::guid::braced(g)),
                        ImportTarget::Index(i) => format!("{file}:#{i}"),
                    }
                })
        };
        TypeDesc::UserDefined { href, name }
    }
}
