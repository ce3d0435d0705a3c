//! Registry hives (`regf`).
//!
//! The file starts with a 4K base block. The hive bins follow it; every cell offset in the hive
//! is relative to the first bin, at file offset 0x1000. A cell is an `i32` size (negative when
//! allocated) followed by its payload.
//!
//! Keys are collected into a flat arena. Subkey lists refer to arena indexes, so a key that is
//! reached twice (a cycle, or a shared subkey list) is detected by a visited set instead of being
//! walked again.

use crate::error::{LocalError, LocalResult, isolate};
use crate::view::{Cursor, ImageView};
use anyhow::{Context, bail};
use std::borrow::Cow;
use std::collections::HashSet;
use std::mem::size_of;
use zerocopy::{LE, U16, U32, U64};
use zerocopy_derive::*;

/// `regf`
pub const REGF_SIGNATURE: u32 = 0x6667_6572;

/// File offset of the first hive bin.
pub const HBIN_START: usize = 0x1000;

/// Keys deeper than this are not walked.
pub const MAX_DEPTH: usize = 512;

/// The start of the base block.
#[allow(missing_docs)]
#[repr(C)]
#[derive(Clone, Debug, FromBytes, Immutable, KnownLayout, Unaligned)]
pub struct REGF_BASE_BLOCK {
    pub signature: U32<LE>,
    pub primary_sequence: U32<LE>,
    pub secondary_sequence: U32<LE>,
    pub last_written: U64<LE>,
    pub major_version: U32<LE>,
    pub minor_version: U32<LE>,
    pub file_type: U32<LE>,
    pub file_format: U32<LE>,
    pub root_cell: U32<LE>,
    pub hive_bins_size: U32<LE>,
    pub clustering_factor: U32<LE>,
    pub file_name: [U16<LE>; 32],
}

/// `nk`: a key node.
#[allow(missing_docs)]
#[repr(C)]
#[derive(Clone, Debug, FromBytes, Immutable, KnownLayout, Unaligned)]
pub struct CM_KEY_NODE {
    pub signature: U16<LE>,
    pub flags: U16<LE>,
    pub last_written: U64<LE>,
    pub access_bits: U32<LE>,
    pub parent: U32<LE>,
    pub subkey_count: U32<LE>,
    pub volatile_subkey_count: U32<LE>,
    pub subkey_list: U32<LE>,
    pub volatile_subkey_list: U32<LE>,
    pub value_count: U32<LE>,
    pub value_list: U32<LE>,
    pub security: U32<LE>,
    pub class: U32<LE>,
    pub max_name_length: U32<LE>,
    pub max_class_length: U32<LE>,
    pub max_value_name_length: U32<LE>,
    pub max_value_data_length: U32<LE>,
    pub workvar: U32<LE>,
    pub name_length: U16<LE>,
    pub class_length: U16<LE>,
}

/// `vk`: a value.
#[allow(missing_docs)]
#[repr(C)]
#[derive(Clone, Debug, FromBytes, Immutable, KnownLayout, Unaligned)]
pub struct CM_KEY_VALUE {
    pub signature: U16<LE>,
    pub name_length: U16<LE>,
    pub data_length: U32<LE>,
    pub data: U32<LE>,
    pub data_type: U32<LE>,
    pub flags: U16<LE>,
    pub spare: U16<LE>,
}

static_assertions::const_assert_eq!(size_of::<REGF_BASE_BLOCK>(), 0x70);
static_assertions::const_assert_eq!(size_of::<CM_KEY_NODE>(), 76);
static_assertions::const_assert_eq!(size_of::<CM_KEY_VALUE>(), 20);

const NK: u16 = u16::from_le_bytes(*b"nk");
const VK: u16 = u16::from_le_bytes(*b"vk");
const LF: u16 = u16::from_le_bytes(*b"lf");
const LH: u16 = u16::from_le_bytes(*b"lh");
const LI: u16 = u16::from_le_bytes(*b"li");
const RI: u16 = u16::from_le_bytes(*b"ri");
const DB: u16 = u16::from_le_bytes(*b"db");

/// Key and value names stored as 8-bit characters rather than UTF-16.
const KEY_COMP_NAME: u16 = 0x0020;
const VALUE_COMP_NAME: u16 = 0x0001;

/// Set in `data_length` when the data is stored in the `data` field itself.
const DATA_INLINE: u32 = 0x8000_0000;
/// Values larger than this are split into `db` segments.
const BIG_DATA_THRESHOLD: usize = 16344;

const NO_CELL: u32 = 0xffff_ffff;

#[allow(missing_docs)]
pub const REG_NONE: u32 = 0;
#[allow(missing_docs)]
pub const REG_SZ: u32 = 1;
#[allow(missing_docs)]
pub const REG_EXPAND_SZ: u32 = 2;
#[allow(missing_docs)]
pub const REG_BINARY: u32 = 3;
#[allow(missing_docs)]
pub const REG_DWORD: u32 = 4;
#[allow(missing_docs)]
pub const REG_DWORD_BIG_ENDIAN: u32 = 5;
#[allow(missing_docs)]
pub const REG_LINK: u32 = 6;
#[allow(missing_docs)]
pub const REG_MULTI_SZ: u32 = 7;
#[allow(missing_docs)]
pub const REG_QWORD: u32 = 11;

/// Name of a `REG_*` value type.
pub fn value_type_name(ty: u32) -> &'static str {
    match ty {
        REG_NONE => "REG_NONE",
        REG_SZ => "REG_SZ",
        REG_EXPAND_SZ => "REG_EXPAND_SZ",
        REG_BINARY => "REG_BINARY",
        REG_DWORD => "REG_DWORD",
        REG_DWORD_BIG_ENDIAN => "REG_DWORD_BIG_ENDIAN",
        REG_LINK => "REG_LINK",
        REG_MULTI_SZ => "REG_MULTI_SZ",
        8 => "REG_RESOURCE_LIST",
        9 => "REG_FULL_RESOURCE_DESCRIPTOR",
        10 => "REG_RESOURCE_REQUIREMENTS_LIST",
        REG_QWORD => "REG_QWORD",
        _ => "REG_???",
    }
}

/// A decoded hive.
pub struct Hive<'a> {
    #[allow(missing_docs)]
    pub base: &'a REGF_BASE_BLOCK,
    /// The file name stored in the base block (often only its tail).
    pub file_name: String,
    /// Every key reached from the root, in visiting order. The root is `keys[0]`.
    pub keys: Vec<Key<'a>>,
    /// The result of reading the root key.
    pub root: LocalResult<usize>,
}

/// One key of the hive.
pub struct Key<'a> {
    /// Cell offset of the `nk` cell.
    pub cell: u32,
    #[allow(missing_docs)]
    pub node: &'a CM_KEY_NODE,
    #[allow(missing_docs)]
    pub name: String,
    /// Nesting level; the root is 0.
    pub depth: usize,
    /// Arena indexes of the subkeys.
    pub subkeys: LocalResult<Vec<LocalResult<usize>>>,
    #[allow(missing_docs)]
    pub values: LocalResult<Vec<Value<'a>>>,
}

/// One value of a key.
pub struct Value<'a> {
    /// Empty for the default value.
    pub name: String,
    #[allow(missing_docs)]
    pub data_type: u32,
    #[allow(missing_docs)]
    pub data: LocalResult<ValueData<'a>>,
}

/// The data of a value, interpreted according to its type.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ValueData<'a> {
    #[allow(missing_docs)]
    String(String),
    #[allow(missing_docs)]
    ExpandString(String),
    #[allow(missing_docs)]
    Link(String),
    #[allow(missing_docs)]
    MultiString(Vec<String>),
    #[allow(missing_docs)]
    Dword(u32),
    #[allow(missing_docs)]
    DwordBigEndian(u32),
    #[allow(missing_docs)]
    Qword(u64),
    /// `REG_BINARY` and all other types.
    Binary(Cow<'a, [u8]>),
}

#[allow(missing_docs)]
pub fn decode(view: &ImageView) -> anyhow::Result<Hive<'_>> {
    let base: &REGF_BASE_BLOCK = view.get(0).context("the hive base block is truncated")?;
    if base.signature.get() != REGF_SIGNATURE {
        bail!("not a registry hive");
    }

    let file_name = {
        let units: Vec<u16> = base.file_name.iter().map(|u| u.get()).collect();
        let end = units.iter().position(|&u| u == 0).unwrap_or(units.len());
        String::from_utf16_lossy(&units[..end])
    };

    let mut walker = Walker {
        view,
        visited: HashSet::new(),
        keys: Vec::new(),
    };
    let root = walker.walk(base.root_cell.get(), 0);
    if let Err(e) = &root {
        tracing::warn!("root key: {e}");
    }

    Ok(Hive {
        base,
        file_name,
        keys: walker.keys,
        root,
    })
}

/// Returns the payload of the cell at `offset`.
fn cell<'a>(view: &'a ImageView, offset: u32) -> LocalResult<Cursor<'a>> {
    if offset == NO_CELL {
        return Err(LocalError::invalid("null cell"));
    }
    let at = HBIN_START
        .checked_add(offset as usize)
        .ok_or(LocalError::OutOfBounds)?;
    let size = view.u32_at(at).ok_or(LocalError::OutOfBounds)? as i32;
    let len = (size.unsigned_abs() as usize)
        .checked_sub(4)
        .ok_or(LocalError::invalid("cell size"))?;
    view.cursor_at(at + 4, len).ok_or(LocalError::overrun("cell"))
}

fn decode_name(bytes: &[u8], compressed: bool) -> String {
    if compressed {
        bytes.iter().map(|&b| b as char).collect()
    } else {
        let units: Vec<u16> = bytes
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
            .collect();
        String::from_utf16_lossy(&units)
    }
}

struct Walker<'a> {
    view: &'a ImageView,
    visited: HashSet<u32>,
    keys: Vec<Key<'a>>,
}

impl<'a> Walker<'a> {
    fn walk(&mut self, offset: u32, depth: usize) -> LocalResult<usize> {
        if depth > MAX_DEPTH {
            return Err(LocalError::invalid("keys nested too deeply"));
        }
        if !self.visited.insert(offset) {
            return Err(LocalError::invalid("key reached twice"));
        }

        let mut c = cell(self.view, offset)?;
        let node: &CM_KEY_NODE = c.get()?;
        if node.signature.get() != NK {
            return Err(LocalError::bad_signature("nk"));
        }
        let name_bytes = c.bytes(node.name_length.get() as usize)?;
        let name = decode_name(name_bytes, node.flags.get() & KEY_COMP_NAME != 0);
        tracing::trace!(offset, depth, "key {name}");

        let values = isolate("key values", || self.read_values(node));

        let index = self.keys.len();
        self.keys.push(Key {
            cell: offset,
            node,
            name,
            depth,
            subkeys: Ok(Vec::new()),
            values,
        });

        let subkeys = isolate("subkey list", || {
            let mut offsets = Vec::new();
            if node.subkey_count.get() != 0 {
                self.read_subkey_list(node.subkey_list.get(), &mut offsets, true)?;
            }
            Ok(offsets
                .into_iter()
                .map(|child| {
                    let r = self.walk(child, depth + 1);
                    if let Err(e) = &r {
                        tracing::warn!(cell = child, "subkey: {e}");
                    }
                    r
                })
                .collect())
        });
        self.keys[index].subkeys = subkeys;

        Ok(index)
    }

    /// Collects the `nk` offsets of a subkey list. `ri` lists may only appear at the top.
    fn read_subkey_list(&self, offset: u32, out: &mut Vec<u32>, allow_ri: bool) -> LocalResult<()> {
        let mut c = cell(self.view, offset)?;
        let sig = c.u16()?;
        let count = c.u16()? as usize;
        match sig {
            LF | LH => {
                if count.saturating_mul(8) > c.len() {
                    return Err(LocalError::overrun("subkey list"));
                }
                for _ in 0..count {
                    out.push(c.u32()?);
                    let _hash = c.u32()?;
                }
            }
            LI | RI => {
                if count.saturating_mul(4) > c.len() {
                    return Err(LocalError::overrun("subkey list"));
                }
                for _ in 0..count {
                    let item = c.u32()?;
                    if sig == LI {
                        out.push(item);
                    } else if allow_ri {
                        self.read_subkey_list(item, out, false)?;
                    } else {
                        return Err(LocalError::invalid("nested index root"));
                    }
                }
            }
            _ => return Err(LocalError::bad_signature("lf, lh, li or ri")),
        }
        Ok(())
    }

    fn read_values(&self, node: &CM_KEY_NODE) -> LocalResult<Vec<Value<'a>>> {
        let count = node.value_count.get() as usize;
        if count == 0 {
            return Ok(Vec::new());
        }
        let mut list = cell(self.view, node.value_list.get())?;
        if count.saturating_mul(4) > list.len() {
            return Err(LocalError::overrun("value list"));
        }
        let mut values = Vec::with_capacity(count);
        for _ in 0..count {
            let offset = list.u32()?;
            match self.read_value(offset) {
                Ok(v) => values.push(v),
                Err(e) => {
                    tracing::warn!(cell = offset, "value: {e}");
                    values.push(Value {
                        name: String::new(),
                        data_type: REG_NONE,
                        data: Err(e),
                    });
                }
            }
        }
        Ok(values)
    }

    fn read_value(&self, offset: u32) -> LocalResult<Value<'a>> {
        let mut c = cell(self.view, offset)?;
        let vk: &CM_KEY_VALUE = c.get()?;
        if vk.signature.get() != VK {
            return Err(LocalError::bad_signature("vk"));
        }
        let name_bytes = c.bytes(vk.name_length.get() as usize)?;
        let name = decode_name(name_bytes, vk.flags.get() & VALUE_COMP_NAME != 0);
        let data_type = vk.data_type.get();
        let data = isolate("value data", || {
            let raw = self.read_data(vk)?;
            Ok(interpret(data_type, raw))
        });
        Ok(Value {
            name,
            data_type,
            data,
        })
    }

    fn read_data(&self, vk: &'a CM_KEY_VALUE) -> LocalResult<Cow<'a, [u8]>> {
        let length = vk.data_length.get();
        if length & DATA_INLINE != 0 {
            let n = ((length & !DATA_INLINE) as usize).min(4);
            return Ok(Cow::Owned(vk.data.get().to_le_bytes()[..n].to_vec()));
        }

        let length = length as usize;
        let mut c = cell(self.view, vk.data.get())?;
        if length > BIG_DATA_THRESHOLD && c.clone().u16() == Ok(DB) {
            return self.read_big_data(c, length).map(Cow::Owned);
        }
        Ok(Cow::Borrowed(
            c.bytes(length).map_err(|_| LocalError::overrun("value data"))?,
        ))
    }

    fn read_big_data(&self, mut c: Cursor<'a>, length: usize) -> LocalResult<Vec<u8>> {
        let _sig = c.u16()?;
        let segments = c.u16()? as usize;
        if length > segments.saturating_mul(BIG_DATA_THRESHOLD) {
            return Err(LocalError::overrun("big data segments"));
        }
        let mut list = cell(self.view, c.u32()?)?;
        let mut data = Vec::with_capacity(length.min(self.view.len()));
        for _ in 0..segments {
            let mut seg = cell(self.view, list.u32()?)?;
            let n = (length - data.len()).min(BIG_DATA_THRESHOLD).min(seg.len());
            data.extend_from_slice(seg.bytes(n)?);
        }
        if data.len() < length {
            return Err(LocalError::overrun("big data segments"));
        }
        Ok(data)
    }
}

fn utf16_string(bytes: &[u8]) -> String {
    let s = decode_name(bytes, false);
    s.trim_end_matches('\0').to_string()
}

fn interpret(data_type: u32, raw: Cow<'_, [u8]>) -> ValueData<'_> {
    match data_type {
        REG_SZ => ValueData::String(utf16_string(&raw)),
        REG_EXPAND_SZ => ValueData::ExpandString(utf16_string(&raw)),
        REG_LINK => ValueData::Link(utf16_string(&raw)),
        REG_MULTI_SZ => {
            let s = decode_name(&raw, false);
            ValueData::MultiString(
                s.split('\0')
                    .take_while(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect(),
            )
        }
        REG_DWORD if raw.len() == 4 => {
            ValueData::Dword(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
        }
        REG_DWORD_BIG_ENDIAN if raw.len() == 4 => {
            ValueData::DwordBigEndian(u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]))
        }
        REG_QWORD if raw.len() == 8 => {
            let mut b = [0u8; 8];
            b.copy_from_slice(&raw);
            ValueData::Qword(u64::from_le_bytes(b))
        }
        _ => ValueData::Binary(raw),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn put(f: &mut [u8], cell_offset: usize, bytes: &[u8]) {
        let at = HBIN_START + cell_offset;
        f[at..at + bytes.len()].copy_from_slice(bytes);
    }

    fn put32(f: &mut [u8], cell_offset: usize, value: u32) {
        put(f, cell_offset, &value.to_le_bytes());
    }

    fn nk(f: &mut [u8], at: usize, name: &str, parent: u32, subkeys: (u32, u32), values: (u32, u32)) {
        let size = (4 + 76 + name.len() + 7) & !7;
        put32(f, at, (size as i32).wrapping_neg() as u32);
        let d = at + 4;
        put(f, d, b"nk");
        put(f, d + 2, &KEY_COMP_NAME.to_le_bytes());
        put32(f, d + 16, parent);
        put32(f, d + 20, subkeys.0);
        put32(f, d + 28, subkeys.1);
        put32(f, d + 32, NO_CELL);
        put32(f, d + 36, values.0);
        put32(f, d + 40, values.1);
        put32(f, d + 48, NO_CELL);
        put(f, d + 72, &(name.len() as u16).to_le_bytes());
        put(f, d + 76, name.as_bytes());
    }

    fn vk(f: &mut [u8], at: usize, name: &str, length: u32, data: u32, ty: u32) {
        let size = (4 + 20 + name.len() + 7) & !7;
        put32(f, at, (size as i32).wrapping_neg() as u32);
        let d = at + 4;
        put(f, d, b"vk");
        put(f, d + 2, &(name.len() as u16).to_le_bytes());
        put32(f, d + 4, length);
        put32(f, d + 8, data);
        put32(f, d + 12, ty);
        put(f, d + 16, &VALUE_COMP_NAME.to_le_bytes());
        put(f, d + 20, name.as_bytes());
    }

    /// ROOT has two values (`Ver` = 42 inline, `Path` = "ab") and one subkey, `Child`.
    fn sample() -> Vec<u8> {
        let mut f = vec![0u8; 0x2000];
        f[0..4].copy_from_slice(b"regf");
        f[0x24..0x28].copy_from_slice(&0x20u32.to_le_bytes());
        for (i, u) in "SYSTEM".encode_utf16().enumerate() {
            f[0x30 + i * 2..0x32 + i * 2].copy_from_slice(&u.to_le_bytes());
        }
        put(&mut f, 0, b"hbin");

        nk(&mut f, 0x20, "ROOT", NO_CELL, (1, 0x78), (2, 0x88));
        // lf list
        put32(&mut f, 0x78, (-16i32) as u32);
        put(&mut f, 0x7c, b"lf\x01\x00");
        put32(&mut f, 0x80, 0xe8);
        put(&mut f, 0x84, b"Chil");
        // value list
        put32(&mut f, 0x88, (-16i32) as u32);
        put32(&mut f, 0x8c, 0x98);
        put32(&mut f, 0x90, 0xb8);
        vk(&mut f, 0x98, "Ver", DATA_INLINE | 4, 42, REG_DWORD);
        vk(&mut f, 0xb8, "Path", 6, 0xd8, REG_SZ);
        put32(&mut f, 0xd8, (-16i32) as u32);
        put(&mut f, 0xdc, b"a\0b\0\0\0");
        nk(&mut f, 0xe8, "Child", 0x20, (0, NO_CELL), (0, NO_CELL));
        f
    }

    #[test]
    fn key_tree() {
        let view = ImageView::from_bytes(sample());
        let hive = decode(&view).unwrap();
        assert_eq!(hive.file_name, "SYSTEM");
        assert_eq!(hive.root, Ok(0));
        assert_eq!(hive.keys.len(), 2);

        let root = &hive.keys[0];
        assert_eq!(root.name, "ROOT");
        assert_eq!(root.subkeys, Ok(vec![Ok(1)]));

        let values = root.values.as_ref().unwrap();
        assert_eq!(values.len(), 2);
        assert_eq!(values[0].name, "Ver");
        assert_eq!(values[0].data, Ok(ValueData::Dword(42)));
        assert_eq!(values[1].name, "Path");
        assert_eq!(values[1].data, Ok(ValueData::String("ab".to_string())));

        let child = &hive.keys[1];
        assert_eq!(child.name, "Child");
        assert_eq!(child.depth, 1);
        assert_eq!(child.node.parent.get(), 0x20);
    }

    #[test]
    fn cycle_is_local() {
        let mut f = sample();
        // Make ROOT its own subkey.
        put32(&mut f, 0x80, 0x20);
        let view = ImageView::from_bytes(f);
        let hive = decode(&view).unwrap();
        assert_eq!(hive.keys.len(), 1);
        let subkeys = hive.keys[0].subkeys.as_ref().unwrap();
        assert!(matches!(subkeys[0], Err(LocalError::Invalid { .. })));
        assert!(hive.keys[0].values.is_ok());
    }

    #[test]
    fn bad_value_cell() {
        let mut f = sample();
        put32(&mut f, 0x90, 0x0fff_0000);
        let view = ImageView::from_bytes(f);
        let hive = decode(&view).unwrap();
        let values = hive.keys[0].values.as_ref().unwrap();
        assert!(values[0].data.is_ok());
        assert!(values[1].data.is_err());
    }

    #[test]
    fn big_data_length_checked_against_segments() {
        let mut f = sample();
        // `Path` claims 2 GiB spread over a single `db` segment.
        put32(&mut f, 0xb8 + 8, 0x7fff_0000);
        put(&mut f, 0xdc, b"db\x01\x00");
        put32(&mut f, 0xe0, 0x0fff_0000);
        let view = ImageView::from_bytes(f);
        let hive = decode(&view).unwrap();
        let values = hive.keys[0].values.as_ref().unwrap();
        assert!(values[0].data.is_ok());
        assert!(matches!(values[1].data, Err(LocalError::Overrun { .. })));
    }

    #[test]
    fn multi_string() {
        let raw: Vec<u8> = "x\0yz\0\0".encode_utf16().flat_map(|u| u.to_le_bytes()).collect();
        assert_eq!(
            interpret(REG_MULTI_SZ, Cow::Owned(raw)),
            ValueData::MultiString(vec!["x".to_string(), "yz".to_string()])
        );
    }
}
