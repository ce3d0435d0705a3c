//! The SLTG type library encoding.
//!
//! ```text
//! SLTG_Header
//! SLTG_BlkEntry[n_file_blocks - 1]
//! SLTG_Magic                        "\x01CompObj\0dir\0"
//! index strings                     char[11] per typeinfo block
//! pad                               9 bytes
//! blocks                            in chain order, each SLTG_BlkEntry.len bytes long
//! ```
//!
//! The block entries form a singly linked list: `first_blk` and each `next` are 1-based entry
//! indexes and `next == 0` ends the list. The last block in the chain is the library block; the
//! blocks before it are typeinfos, in the same order as the `OtherTypeInfo` records that follow
//! the library block.
//!
//! Inside a typeinfo block, members are chained by `next` offsets relative to the start of the
//! member area, with `0xffff` ending the chain. Names are offsets into a table of NUL-terminated
//! strings whose location is given after the `OtherTypeInfo` records.

#[cfg(test)]
mod tests;

use super::bitstream::CompressionTable;
use super::{
    Function, ImplType, Members, Param, TypeDesc, TypeKind, TypeinfoRecord, VarKind, Variable, vt,
};
use crate::error::{LocalError, LocalResult, isolate};
use crate::guid::GuidLe;
use crate::view::{Cursor, ImageView};
use anyhow::{Context, bail};
use bstr::ByteSlice;
use std::collections::HashSet;
use std::mem::size_of;
use uuid::Uuid;
use zerocopy::{LE, U16, U32};
use zerocopy_derive::*;

/// `SLTG_LibBlk.magic`
pub const SLTG_LIBBLK_MAGIC: u16 = 0x51cc;
/// `SLTG_TypeInfoHeader.magic`
pub const SLTG_TIHEADER_MAGIC: u16 = 0x0501;
/// The first word of the member area of an interface that lists its base interfaces.
pub const SLTG_IMPL_MAGIC: u16 = 0x004a;

const COMPOBJ_MAGIC: &[u8; 8] = b"CompObj\0";
const DIR_MAGIC: &[u8; 4] = b"dir\0";
const INDEX_STRING_LEN: usize = 11;
const INDEX_PAD_LEN: usize = 9;
/// Filler between the library block's fixed fields and the `OtherTypeInfo` records.
const LIBBLK_FILLER: usize = 0x40;
/// Distance from the name table locator to the first name.
const NAME_TABLE_SKIP: usize = 0x218;

/// Ends a member chain.
const NO_NEXT: u16 = 0xffff;

const TYPEFLAG_FDUAL: u32 = 0x40;
const MAX_TYPE_DEPTH: usize = 16;

#[allow(missing_docs)]
#[repr(C)]
#[derive(Clone, Debug, FromBytes, Immutable, KnownLayout, Unaligned)]
pub struct SLTG_Header {
    pub magic: U32<LE>,
    /// One more than the number of block entries.
    pub n_file_blocks: U16<LE>,
    pub res06: U16<LE>,
    pub size_of_index: U16<LE>,
    /// 1-based index of the block entry that starts the chain.
    pub first_blk: U16<LE>,
    pub guid: GuidLe,
    pub res1c: U32<LE>,
    pub res20: U32<LE>,
}

#[allow(missing_docs)]
#[repr(C)]
#[derive(Clone, Debug, FromBytes, Immutable, KnownLayout, Unaligned)]
pub struct SLTG_BlkEntry {
    pub len: U32<LE>,
    /// Offset of the block's index string, from the start of the magic block.
    pub index_string: U16<LE>,
    /// 1-based index of the next entry, or 0.
    pub next: U16<LE>,
}

#[allow(missing_docs)]
#[repr(C)]
#[derive(Clone, Debug, FromBytes, Immutable, KnownLayout, Unaligned)]
pub struct SLTG_Magic {
    pub res00: u8,
    pub compobj_magic: [u8; 8],
    pub dir_magic: [u8; 4],
}

#[allow(missing_docs)]
#[repr(C)]
#[derive(Clone, Debug, FromBytes, Immutable, KnownLayout, Unaligned)]
pub struct SLTG_TypeInfoHeader {
    pub magic: U16<LE>,
    pub href_table: U32<LE>,
    pub res06: U32<LE>,
    /// Offset of the member header, from the start of the block.
    pub elem_table: U32<LE>,
    pub res0e: U32<LE>,
    pub major_version: U16<LE>,
    pub minor_version: U16<LE>,
    pub res16: U32<LE>,
    /// Low 3 bits are 2; the rest hold the low 5 bits of `TYPEFLAGS`.
    pub typeflags1: u8,
    /// `TYPEFLAGS >> 5`
    pub typeflags2: u8,
    pub typeflags3: u8,
    pub typekind: u8,
    pub res1e: U32<LE>,
}

#[allow(missing_docs)]
#[repr(C)]
#[derive(Clone, Debug, FromBytes, Immutable, KnownLayout, Unaligned)]
pub struct SLTG_MemberHeader {
    pub res00: U16<LE>,
    pub res02: U16<LE>,
    pub res04: u8,
    /// Size of the member area that follows.
    pub cb_extra: U32<LE>,
}

#[allow(missing_docs)]
#[repr(C)]
#[derive(Clone, Debug, FromBytes, Immutable, KnownLayout, Unaligned)]
pub struct SLTG_TypeInfoTail {
    pub c_funcs: U16<LE>,
    pub c_vars: U16<LE>,
    pub c_impl_types: U16<LE>,
    pub res06: U16<LE>,
    /// Offset of the first function in the member area, or 0xffff.
    pub funcs_off: U16<LE>,
    /// Offset of the first variable in the member area, or 0xffff.
    pub vars_off: U16<LE>,
    pub res0c: U16<LE>,
    pub res0e: U16<LE>,
    pub res10: U16<LE>,
    pub res12: U16<LE>,
    /// For aliases: a variant type if `simple_alias` is set, else an offset in the member area.
    pub tdescalias_vt: U16<LE>,
    pub res16: U16<LE>,
    pub res18: U16<LE>,
    pub res1a: U16<LE>,
    pub simple_alias: U16<LE>,
    pub res1e: U16<LE>,
    pub cb_size_instance: U16<LE>,
    pub cb_alignment: U16<LE>,
    pub res24: U16<LE>,
    pub res26: U16<LE>,
    pub cb_size_vft: U16<LE>,
    pub res2a: U16<LE>,
    pub res2c: U16<LE>,
    pub res2e: U16<LE>,
    pub res30: U16<LE>,
    pub res32: U16<LE>,
    pub res34: U16<LE>,
}

static_assertions::const_assert_eq!(size_of::<SLTG_Header>(), 0x24);
static_assertions::const_assert_eq!(size_of::<SLTG_BlkEntry>(), 8);
static_assertions::const_assert_eq!(size_of::<SLTG_Magic>(), 13);
static_assertions::const_assert_eq!(size_of::<SLTG_TypeInfoHeader>(), 0x22);
static_assertions::const_assert_eq!(size_of::<SLTG_MemberHeader>(), 9);
static_assertions::const_assert_eq!(size_of::<SLTG_TypeInfoTail>(), 0x36);

/// A decoded SLTG type library.
pub struct SltgLibrary {
    #[allow(missing_docs)]
    pub header: SLTG_Header,
    /// The block entries, in table order.
    pub entries: Vec<BlockEntry>,
    /// The blocks in chain order. The last one is the library block.
    pub chain: LocalResult<Vec<Block>>,
    #[allow(missing_docs)]
    pub library: LocalResult<LibraryBlock>,
    /// One per typeinfo block, in chain order.
    pub typeinfos: Vec<LocalResult<TypeinfoRecord>>,
}

#[allow(missing_docs)]
#[derive(Clone, Debug)]
pub struct BlockEntry {
    pub len: u32,
    pub index_string: u16,
    pub next: u16,
    pub index_name: LocalResult<String>,
}

/// A block, located by walking the chain.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Block {
    /// 0-based index into [`SltgLibrary::entries`].
    pub entry: usize,
    /// File offset of the block.
    pub offset: u32,
    #[allow(missing_docs)]
    pub len: u32,
}

/// The library block and the records that follow it.
#[derive(Clone, Debug)]
pub struct LibraryBlock {
    #[allow(missing_docs)]
    pub name: LocalResult<String>,
    #[allow(missing_docs)]
    pub doc: Option<String>,
    #[allow(missing_docs)]
    pub help_file: Option<String>,
    #[allow(missing_docs)]
    pub help_context: u32,
    /// 0 win16, 1 win32
    pub syskind: u16,
    #[allow(missing_docs)]
    pub lcid: u16,
    /// `LIBFLAGS`
    pub flags: u16,
    /// `major.minor`
    pub version: (u16, u16),
    #[allow(missing_docs)]
    pub guid: Uuid,
    #[allow(missing_docs)]
    pub other_infos: LocalResult<Vec<OtherTypeInfo>>,
    /// The help string compressor.
    pub help_table: LocalResult<CompressionTable>,
    /// File offset of the name table.
    pub name_table: LocalResult<u32>,
}

/// The library's directory entry for one typeinfo.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OtherTypeInfo {
    #[allow(missing_docs)]
    pub small_no: u16,
    /// Matches the index string of the typeinfo's block.
    pub index_name: Option<String>,
    #[allow(missing_docs)]
    pub other_name: Option<String>,
    /// Offset of the typeinfo's name in the name table.
    pub name_offset: u16,
    /// The compressed help string.
    pub help: Vec<u8>,
    #[allow(missing_docs)]
    pub help_context: u32,
    #[allow(missing_docs)]
    pub guid: Uuid,
    #[allow(missing_docs)]
    pub typekind: u16,
}

fn lossy(bytes: &[u8]) -> String {
    bytes.to_str_lossy().into_owned()
}

/// Reads a `u16` length followed by that many bytes. A length of 0xffff means "no string".
fn read_name(c: &mut Cursor<'_>) -> LocalResult<Option<String>> {
    let len = c.u16()?;
    if len == 0xffff {
        return Ok(None);
    }
    Ok(Some(lossy(c.bytes(len as usize)?)))
}

#[allow(missing_docs)]
pub fn decode(view: &ImageView) -> anyhow::Result<SltgLibrary> {
    let header: SLTG_Header = view.copy(0).context("the SLTG header is truncated")?;
    if header.magic.get() != crate::sig::SLTG_SIGNATURE {
        bail!("not an SLTG type library");
    }

    let n_blocks = header.n_file_blocks.get() as usize;
    if n_blocks < 2 {
        bail!("the SLTG header declares {n_blocks} file blocks");
    }

    let mut c = view
        .cursor_from(size_of::<SLTG_Header>())
        .context("the SLTG header is truncated")?;
    let raw_entries: &[SLTG_BlkEntry] = c
        .slice(n_blocks - 1)
        .context("the block entries are truncated")?;
    let magic_offset = c.file_offset();
    let magic: &SLTG_Magic = c.get().context("the CompObj block is truncated")?;
    if &magic.compobj_magic != COMPOBJ_MAGIC || &magic.dir_magic != DIR_MAGIC {
        bail!("the CompObj block does not match");
    }

    let index_len = (n_blocks - 2) * INDEX_STRING_LEN + INDEX_PAD_LEN;
    let first_block = c.file_offset() + index_len;

    let entries: Vec<BlockEntry> = raw_entries
        .iter()
        .map(|e| {
            let index_string = e.index_string.get();
            BlockEntry {
                len: e.len.get(),
                index_string,
                next: e.next.get(),
                index_name: view
                    .strz_at(magic_offset + index_string as usize)
                    .map(|s| lossy(s))
                    .ok_or(LocalError::OutOfBounds),
            }
        })
        .collect();

    let chain = isolate("block chain", || {
        walk_chain(&entries, header.first_blk.get(), first_block)
    });

    let mut typeinfos = Vec::new();
    let library = match &chain {
        Err(e) => Err(e.clone()),
        Ok(blocks) => {
            // The chain always has at least one block.
            let (lib_block, ti_blocks) = blocks
                .split_last()
                .ok_or(LocalError::invalid("empty block chain"))?;
            let library = isolate("library block", || decode_library(view, lib_block, n_blocks - 2));
            if let Ok(lib) = &library {
                typeinfos = ti_blocks
                    .iter()
                    .enumerate()
                    .map(|(i, block)| {
                        isolate("typeinfo block", || {
                            decode_typeinfo(view, &entries[block.entry], block, lib, i)
                        })
                    })
                    .collect();
            }
            library
        }
    };

    Ok(SltgLibrary {
        header,
        entries,
        chain,
        library,
        typeinfos,
    })
}

/// Follows the block chain from `first` (1-based) until an entry whose `next` is 0. Blocks are
/// laid out contiguously from `start`, in chain order.
pub fn walk_chain(entries: &[BlockEntry], first: u16, start: usize) -> LocalResult<Vec<Block>> {
    let mut visited = vec![false; entries.len()];
    let mut blocks = Vec::new();
    let mut offset = u32::try_from(start).map_err(|_| LocalError::overrun("block chain"))?;
    let mut index = first as usize;

    loop {
        if index == 0 || index > entries.len() {
            return Err(LocalError::invalid("block index out of range"));
        }
        let entry = index - 1;
        if std::mem::replace(&mut visited[entry], true) {
            return Err(LocalError::invalid("block chain has no end"));
        }
        let e = &entries[entry];
        blocks.push(Block {
            entry,
            offset,
            len: e.len,
        });
        if e.next == 0 {
            return Ok(blocks);
        }
        offset = offset
            .checked_add(e.len)
            .ok_or(LocalError::overrun("block chain"))?;
        index = e.next as usize;
    }
}

fn decode_library(view: &ImageView, block: &Block, ntypeinfos: usize) -> LocalResult<LibraryBlock> {
    let mut c = view
        .cursor_from(block.offset as usize)
        .ok_or(LocalError::OutOfBounds)?;
    let lib_start = c.file_offset();

    if c.u16()? != SLTG_LIBBLK_MAGIC {
        return Err(LocalError::bad_signature("SLTG library block"));
    }
    let _res02 = c.u16()?;
    let name_offset = c.u16()?;
    let res06 = c.u16()?;
    if res06 != 0xffff {
        c.skip(res06 as usize)?;
    }
    let doc = read_name(&mut c)?;
    let help_file = read_name(&mut c)?;
    let help_context = c.u32()?;
    let syskind = c.u16()?;
    let lcid = c.u16()?;
    let _res12 = c.u32()?;
    let flags = c.u16()?;
    let major = c.u16()?;
    let minor = c.u16()?;
    let guid = c.guid()?;

    let mut rest = c.clone();
    let other_infos = isolate("OtherTypeInfo records", || {
        rest.skip(LIBBLK_FILLER)?;
        (0..ntypeinfos).map(|_| read_other_info(&mut rest)).collect()
    });

    let (name_table, help_table) = match &other_infos {
        Ok(_) => {
            let name_table = read_name_table_location(view, &mut rest, lib_start);
            let help_table = isolate("help string table", || CompressionTable::read(&mut rest));
            (name_table, help_table)
        }
        Err(e) => (Err(e.clone()), Err(e.clone())),
    };

    let name = match &name_table {
        Ok(nt) => name_at(view, *nt, name_offset),
        Err(e) => Err(e.clone()),
    };

    Ok(LibraryBlock {
        name,
        doc,
        help_file,
        help_context,
        syskind,
        lcid,
        flags,
        version: (major, minor),
        guid,
        other_infos,
        help_table,
        name_table,
    })
}

fn read_other_info(c: &mut Cursor<'_>) -> LocalResult<OtherTypeInfo> {
    let small_no = c.u16()?;
    let index_name = read_name(c)?;
    let other_name = read_name(c)?;
    let _res1a = c.u16()?;
    let name_offset = c.u16()?;
    let help_len = c.u16()? as usize;
    let help = c.bytes(help_len)?.to_vec();
    let _res20 = c.u16()?;
    let help_context = c.u32()?;
    let _res26 = c.u16()?;
    let guid = c.guid()?;
    let typekind = c.u16()?;
    Ok(OtherTypeInfo {
        small_no,
        index_name,
        other_name,
        name_offset,
        help,
        help_context,
        guid,
        typekind,
    })
}

/// A `u16` then a `u32` offset from the start of the library block. The word found at that
/// offset says whether 0x20 more bytes precede the fixed-size gap before the names.
fn read_name_table_location(
    view: &ImageView,
    c: &mut Cursor<'_>,
    lib_start: usize,
) -> LocalResult<u32> {
    let _marker = c.u16()?;
    let offset = lib_start + c.u32()? as usize;
    let extra = match view.u16_at(offset).ok_or(LocalError::OutOfBounds)? {
        0x0200 => 0x20,
        0xffff => 0,
        w => {
            tracing::warn!("unexpected word 0x{w:04x} at the name table locator");
            0
        }
    };
    Ok((offset + extra + NAME_TABLE_SKIP) as u32)
}

fn name_at(view: &ImageView, name_table: u32, offset: u16) -> LocalResult<String> {
    view.strz_at(name_table as usize + offset as usize)
        .map(|s| lossy(s))
        .ok_or(LocalError::OutOfBounds)
}

/// State for decoding the members of one typeinfo block.
struct MemberArea<'a> {
    view: &'a ImageView,
    /// The member area, from just after the member header.
    area: Cursor<'a>,
    name_table: u32,
}

fn decode_typeinfo(
    view: &ImageView,
    entry: &BlockEntry,
    block: &Block,
    lib: &LibraryBlock,
    index: usize,
) -> LocalResult<TypeinfoRecord> {
    let others = lib.other_infos.as_ref().map_err(|e| e.clone())?;
    let other = others
        .get(index)
        .ok_or(LocalError::invalid("typeinfo block has no OtherTypeInfo record"))?;
    if let (Ok(block_name), Some(other_name)) = (&entry.index_name, &other.index_name) {
        if block_name != other_name {
            return Err(LocalError::invalid("index strings do not match"));
        }
    }

    let c = view
        .cursor_at(block.offset as usize, block.len as usize)
        .ok_or(LocalError::overrun("block"))?;
    let header: &SLTG_TypeInfoHeader = c.clone().get()?;
    if header.magic.get() != SLTG_TIHEADER_MAGIC {
        return Err(LocalError::bad_signature("SLTG typeinfo header"));
    }

    let mut m = c.at(header.elem_table.get() as usize)?;
    let member_header: &SLTG_MemberHeader = m.get()?;
    let area_len = member_header.cb_extra.get() as usize;
    if area_len > m.len() {
        return Err(LocalError::overrun("member area"));
    }
    let area = m.sub(area_len)?;
    let tail: &SLTG_TypeInfoTail = m.get()?;

    let flags = (header.typeflags1 as u32 >> 3) | ((header.typeflags2 as u32) << 5);
    let mut kind = TypeKind(header.typekind);
    if flags & TYPEFLAG_FDUAL != 0 {
        kind = TypeKind::TKIND_DISPATCH;
    }

    let name_table = lib.name_table.clone()?;
    let members = MemberArea {
        view,
        area,
        name_table,
    };

    let doc = if other.help.is_empty() {
        None
    } else {
        Some(match &lib.help_table {
            Ok(t) => isolate("help string", || t.decode(&other.help)),
            Err(e) => Err(e.clone()),
        })
    };

    let alias = (kind == TypeKind::TKIND_ALIAS).then(|| {
        let a = tail.tdescalias_vt.get();
        if tail.simple_alias.get() != 0 {
            TypeDesc::Base(a)
        } else {
            members
                .area
                .at(a as usize)
                .map_err(LocalError::from)
                .and_then(|mut c| members.type_desc(&mut c))
                .unwrap_or(TypeDesc::Invalid(a as u32))
        }
    });

    Ok(TypeinfoRecord {
        kind,
        name: name_at(view, name_table, other.name_offset),
        guid: Some(other.guid),
        version: (
            header.major_version.get(),
            header.minor_version.get(),
        ),
        flags,
        doc,
        help_context: other.help_context,
        function_count: tail.c_funcs.get(),
        variable_count: tail.c_vars.get(),
        impl_count: tail.c_impl_types.get(),
        element_offset: header.elem_table.get(),
        alias,
        dll_name: None,
        members: isolate("members", || members.members(kind, tail)),
    })
}

impl<'a> MemberArea<'a> {
    fn name(&self, offset: u16) -> LocalResult<String> {
        name_at(self.view, self.name_table, offset)
    }

    fn members(&self, kind: TypeKind, tail: &SLTG_TypeInfoTail) -> LocalResult<Members> {
        let mut members = Members::default();
        let funcs_off = tail.funcs_off.get();
        let vars_off = match tail.vars_off.get() {
            NO_NEXT => 0,
            off => off,
        };

        match kind {
            TypeKind::TKIND_ENUM | TypeKind::TKIND_RECORD | TypeKind::TKIND_UNION => {
                members.variables = self.variables(vars_off, tail.c_vars.get())?;
            }
            TypeKind::TKIND_MODULE => {
                if funcs_off != NO_NEXT {
                    members.functions = self.functions(funcs_off, tail.c_funcs.get())?;
                }
                members.variables = self.variables(vars_off, tail.c_vars.get())?;
            }
            TypeKind::TKIND_INTERFACE | TypeKind::TKIND_DISPATCH => {
                if self.area.clone().u16().ok() == Some(SLTG_IMPL_MAGIC) {
                    members.impls = self.impls()?;
                }
                if funcs_off != NO_NEXT {
                    members.functions = self.functions(funcs_off, tail.c_funcs.get())?;
                }
            }
            TypeKind::TKIND_COCLASS => {
                if tail.c_impl_types.get() != 0 {
                    members.impls = self.impls()?;
                }
            }
            _ => {}
        }
        Ok(members)
    }

    /// Walks a `next` chain from `first`, at most `count` items.
    fn walk<T>(
        &self,
        first: u16,
        count: usize,
        what: &'static str,
        mut item: impl FnMut(&mut Cursor<'a>) -> LocalResult<(u16, T)>,
    ) -> LocalResult<Vec<LocalResult<T>>> {
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        let mut pos = first;
        while pos != NO_NEXT && out.len() < count {
            if !seen.insert(pos) {
                return Err(LocalError::invalid("member chain revisits an item"));
            }
            let mut c = self.area.at(pos as usize)?;
            match isolate(what, || item(&mut c)) {
                Ok((next, value)) => {
                    out.push(Ok(value));
                    pos = next;
                }
                Err(e) => {
                    out.push(Err(e));
                    break;
                }
            }
        }
        Ok(out)
    }

    fn functions(&self, first: u16, count: u16) -> LocalResult<Vec<LocalResult<Function>>> {
        self.walk(first, count as usize, "function", |c| self.function(c))
    }

    fn variables(&self, first: u16, count: u16) -> LocalResult<Vec<LocalResult<Variable>>> {
        self.walk(first, count as usize, "variable", |c| self.variable(c))
    }

    fn impls(&self) -> LocalResult<Vec<ImplType>> {
        let items = self.walk(0, usize::MAX, "implemented interface", |c| {
            let _magic = c.u8()?;
            let _res01 = c.u8()?;
            let next = c.u16()?;
            let _res04 = c.u16()?;
            let flags = c.u8()?;
            let _res07 = c.u8()?;
            let _res08 = c.u16()?;
            let href = c.u16()? as u32;
            Ok((
                next,
                ImplType {
                    type_: TypeDesc::UserDefined { href, name: None },
                    flags: flags as u32,
                },
            ))
        })?;
        items.into_iter().collect()
    }

    /// ```text
    /// magic u8, inv u8, next u16, name u16, dispid u32, helpcontext u16, helpstring u16,
    /// arg_off u16, nacc u8, retnextopt u8, rettype u16, vtblpos u16, [funcflags u16]
    /// ```
    fn function(&self, c: &mut Cursor<'a>) -> LocalResult<(u16, Function)> {
        let magic = c.u8()?;
        if !matches!(magic & !0x21, 0x44 | 0x4c) {
            return Err(LocalError::bad_signature("SLTG function"));
        }
        let inv = c.u8()?;
        let next = c.u16()?;
        let name = self.name(c.u16()?);
        let memid = c.u32()?;
        let _help_context = c.u16()?;
        let _help_string = c.u16()?;
        let arg_off = c.u16()?;
        let nacc = c.u8()?;
        let retnextopt = c.u8()?;
        let ret_pos = c.position();
        let rettype = c.u16()?;
        let vtblpos = c.u16()?;
        let flags = if magic & 0x20 != 0 { c.u16()? } else { 0 };

        let return_type = if retnextopt & 0x80 != 0 {
            self.type_desc(&mut c.at(ret_pos)?)?
        } else {
            self.type_desc(&mut self.area.at(rettype as usize)?)?
        };

        let nparams = (nacc >> 3) as usize;
        let mut args = self.area.at(arg_off as usize)?;
        let mut params = Vec::with_capacity(nparams);
        for _ in 0..nparams {
            params.push(self.param(&mut args)?);
        }

        Ok((
            next,
            Function {
                memid,
                name,
                return_type,
                invoke_kind: inv >> 4,
                call_conv: nacc & 7,
                flags,
                vtable_offset: (vtblpos & !1) as i16,
                optional_params: ((retnextopt & 0x7e) >> 1) as u16,
                params,
            },
        ))
    }

    /// A parameter is a name word then either the type (inline) or an offset to it. 0xffff and
    /// 0xfffe mean "no name", with an inline type or an offset respectively. Otherwise an inline
    /// type is signalled by the name word pointing at the second character of the name.
    fn param(&self, c: &mut Cursor<'a>) -> LocalResult<Param> {
        let w = c.u16()?;
        let (name, has_offset) = match w {
            0xffff => (None, false),
            0xfffe => (None, true),
            _ => {
                let before = if w == 0 {
                    0
                } else {
                    self.view
                        .u8_at(self.name_table as usize + w as usize - 1)
                        .ok_or(LocalError::OutOfBounds)?
                };
                if before != 0 && !before.is_ascii_alphanumeric() {
                    (Some(self.name(w)), true)
                } else {
                    (Some(self.name(w.saturating_sub(1))), false)
                }
            }
        };

        let type_ = if has_offset {
            let off = c.u16()?;
            self.type_desc(&mut self.area.at(off as usize)?)?
        } else {
            self.type_desc(c)?
        };

        Ok(Param {
            name,
            type_,
            flags: 0,
        })
    }

    /// ```text
    /// magic u8, flags u8, next u16, name u16, byte_offs u16, type u16, memid u32,
    /// helpcontext u16, helpstring u16, [varflags u16]
    /// ```
    fn variable(&self, c: &mut Cursor<'a>) -> LocalResult<(u16, Variable)> {
        let magic = c.u8()?;
        if magic != 0x0a && magic != 0x2a {
            return Err(LocalError::bad_signature("SLTG variable"));
        }
        let item_flags = c.u8()?;
        let next = c.u16()?;
        let name = self.name(c.u16()?);
        let byte_offs = c.u16()?;
        let type_pos = c.position();
        let type_word = c.u16()?;
        let memid = c.u32()?;
        let _help_context = c.u16()?;
        let _help_string = c.u16()?;
        let flags = if magic & 0x20 != 0 { c.u16()? } else { 0 };

        let type_ = if item_flags & 0x02 != 0 {
            self.type_desc(&mut c.at(type_pos)?)?
        } else {
            self.type_desc(&mut self.area.at(type_word as usize)?)?
        };

        let kind = if item_flags & 0x40 != 0 {
            VarKind::Dispatch
        } else if item_flags & 0x10 != 0 {
            if item_flags & 0x08 != 0 {
                VarKind::Const(byte_offs as i64)
            } else {
                self.constant(&type_, byte_offs)
            }
        } else {
            VarKind::PerInstance(byte_offs as u32)
        };

        Ok((
            next,
            Variable {
                memid,
                name,
                type_,
                flags,
                kind,
            },
        ))
    }

    fn constant(&self, type_: &TypeDesc, offset: u16) -> VarKind {
        let value = self.area.at(offset as usize).ok().and_then(|mut c| match type_ {
            TypeDesc::Base(vt::VT_I2) => c.i16().ok().map(|v| v as i64),
            TypeDesc::Base(vt::VT_UI2) => c.u16().ok().map(|v| v as i64),
            TypeDesc::Base(vt::VT_I4 | vt::VT_INT) => c.i32().ok().map(|v| v as i64),
            TypeDesc::Base(vt::VT_UI4 | vt::VT_UINT) => c.u32().ok().map(|v| v as i64),
            _ => None,
        });
        value.map(VarKind::Const).unwrap_or(VarKind::ConstUnknown)
    }

    /// Decodes a type from a sequence of words. Each word is a variant type in its low 6 bits;
    /// `0xe00` set in a word adds a level of pointer. `VT_PTR` and `VT_SAFEARRAY` wrap the type
    /// that follows, `VT_CARRAY` is followed by an offset to a `SAFEARRAY` descriptor and then
    /// the element type, and `VT_USERDEFINED` is followed by a reference number times 4.
    fn type_desc(&self, c: &mut Cursor<'a>) -> LocalResult<TypeDesc> {
        enum Wrap {
            Ptr,
            SafeArray,
            CArray(Vec<(u32, i32)>),
        }

        let mut wraps = Vec::new();
        let base = loop {
            if wraps.len() > MAX_TYPE_DEPTH {
                return Err(LocalError::invalid("type descriptors nest too deeply"));
            }
            let w = c.u16()?;
            if w & 0xe00 == 0xe00 {
                wraps.push(Wrap::Ptr);
            }
            match w & 0x3f {
                vt::VT_PTR => wraps.push(Wrap::Ptr),
                vt::VT_SAFEARRAY => wraps.push(Wrap::SafeArray),
                vt::VT_CARRAY => {
                    let mut sa = self.area.at(c.u16()? as usize)?;
                    let dims = sa.u16()? as usize;
                    // fFeatures, cbElements, cLocks, pvData
                    sa.skip(14)?;
                    if dims * 8 > sa.len() {
                        return Err(LocalError::overrun("array bounds"));
                    }
                    let mut bounds = Vec::with_capacity(dims);
                    for _ in 0..dims {
                        bounds.push((sa.u32()?, sa.i32()?));
                    }
                    wraps.push(Wrap::CArray(bounds));
                }
                vt::VT_USERDEFINED => {
                    let href = (c.u16()? / 4) as u32;
                    break TypeDesc::UserDefined { href, name: None };
                }
                v => break TypeDesc::Base(v),
            }
        };

        Ok(wraps.into_iter().rev().fold(base, |t, w| match w {
            Wrap::Ptr => TypeDesc::Ptr(Box::new(t)),
            Wrap::SafeArray => TypeDesc::SafeArray(Box::new(t)),
            Wrap::CArray(bounds) => TypeDesc::CArray {
                element: Box::new(t),
                bounds,
            },
        }))
    }
}
