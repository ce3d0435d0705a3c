//! Decoders for the contents of well-known resource types: version information, string tables
//! and message tables. Other resource types are left as bytes.

use super::RvaMap;
use crate::error::{LocalError, LocalResult};
use crate::view::Cursor;
use bstr::BStr;
use imgdump_coff::{MESSAGE_RESOURCE_BLOCK, MESSAGE_RESOURCE_UNICODE, VS_FIXEDFILEINFO};
use std::mem::size_of;

const RT_STRING: u16 = 6;
const RT_MESSAGETABLE: u16 = 11;
const RT_VERSION: u16 = 16;

/// Version blocks nest as `StringFileInfo` / language / value; allow some slack beyond that.
const MAX_VERSION_DEPTH: u32 = 8;

/// The decoded contents of a resource.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ResourcePayload {
    #[allow(missing_docs)]
    Version(VersionInfo),
    /// The non-empty strings of a string table block, with their string ids.
    Strings(Vec<(u32, String)>),
    #[allow(missing_docs)]
    Messages(Vec<Message>),
}

/// A `VS_VERSIONINFO` resource.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct VersionInfo {
    /// The fixed file information, if the root value holds one.
    pub fixed: Option<FixedFileInfo>,
    #[allow(missing_docs)]
    pub children: Vec<VersionNode>,
}

/// `VS_FIXEDFILEINFO`, with the versions split into their four parts.
#[derive(Clone, Debug, Eq, PartialEq)]
#[allow(missing_docs)]
pub struct FixedFileInfo {
    pub signature: u32,
    pub struc_version: (u16, u16),
    pub file_version: [u16; 4],
    pub product_version: [u16; 4],
    pub file_flags_mask: u32,
    pub file_flags: u32,
    pub file_os: u32,
    pub file_type: u32,
    pub file_subtype: u32,
    pub file_date: (u32, u32),
}

/// A `BLOCK` or `VALUE` of a version resource.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct VersionNode {
    #[allow(missing_docs)]
    pub key: String,
    #[allow(missing_docs)]
    pub value: VersionValue,
    #[allow(missing_docs)]
    pub children: Vec<VersionNode>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
#[allow(missing_docs)]
pub enum VersionValue {
    /// A block, which only has children.
    Block,
    Text(String),
    /// Binary values are shown as 16-bit words, e.g. the `Translation` pairs.
    Words(Vec<u16>),
}

/// One message of a message table.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Message {
    #[allow(missing_docs)]
    pub id: u32,
    #[allow(missing_docs)]
    pub unicode: bool,
    #[allow(missing_docs)]
    pub text: String,
}

/// Decodes a resource of a known type. `ty` and `name` are the integer ids of the first two
/// levels of the resource tree. Returns `None` for types that are not decoded.
pub(crate) fn decode(
    map: &RvaMap<'_>,
    rva: u32,
    size: u32,
    ty: Option<u16>,
    name: Option<u16>,
) -> Option<LocalResult<ResourcePayload>> {
    match ty? {
        ty @ (RT_STRING | RT_MESSAGETABLE | RT_VERSION) => {
            Some(decode_payload(map, rva, size, ty, name))
        }
        _ => None,
    }
}

fn decode_payload(
    map: &RvaMap<'_>,
    rva: u32,
    size: u32,
    ty: u16,
    name: Option<u16>,
) -> LocalResult<ResourcePayload> {
    let c = map.cursor(rva, size, "resource data")?;
    Ok(match ty {
        RT_STRING => {
            let block = name.ok_or(LocalError::invalid("string table is not numbered"))?;
            ResourcePayload::Strings(decode_strings(c, block)?)
        }
        RT_MESSAGETABLE => ResourcePayload::Messages(decode_messages(&c)?),
        _ => ResourcePayload::Version(decode_version(&c)?),
    })
}

/// A string table block holds 16 counted UTF-16 strings. Block `n` holds ids `(n - 1) * 16` on.
fn decode_strings(mut c: Cursor<'_>, block: u16) -> LocalResult<Vec<(u32, String)>> {
    let first = (block as u32).saturating_sub(1) * 16;
    let mut strings = Vec::new();
    for i in 0..16 {
        if c.len() < 2 {
            break;
        }
        let len = c.u16()? as usize;
        // A length that runs past the end takes what is left.
        let len = len.min(c.len() / 2);
        if len != 0 {
            strings.push((first + i, c.utf16(len)?.to_string_lossy()));
        }
    }
    Ok(strings)
}

fn decode_messages(data: &Cursor<'_>) -> LocalResult<Vec<Message>> {
    let mut c = data.clone();
    let count = c.u32()? as usize;
    if count > c.len() / size_of::<MESSAGE_RESOURCE_BLOCK>() {
        return Err(LocalError::overrun("message table blocks"));
    }
    let blocks: &[MESSAGE_RESOURCE_BLOCK] = c.slice(count)?;

    let mut messages = Vec::new();
    for block in blocks.iter() {
        let (low, high) = (block.low_id.get(), block.high_id.get());
        if high < low {
            return Err(LocalError::invalid("message block ids"));
        }
        let mut e = data.at(block.offset_to_entries.get() as usize)?;
        // Every entry takes at least 4 bytes, so running out of data ends a bad block.
        for id in low..=high {
            let length = e.u16()? as usize;
            let flags = e.u16()?;
            let text_len = length
                .checked_sub(4)
                .ok_or(LocalError::invalid("message entry length"))?;
            let mut text = e
                .sub(text_len)
                .map_err(|_| LocalError::overrun("message text"))?;
            let unicode = flags & MESSAGE_RESOURCE_UNICODE != 0;
            let text = if unicode {
                let units = utf16_until_nul(&mut text)?;
                String::from_utf16_lossy(&units)
            } else {
                let bytes = text.take_rest();
                let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
                BStr::new(&bytes[..end]).to_string()
            };
            messages.push(Message { id, unicode, text });
        }
    }
    Ok(messages)
}

/// UTF-16 units up to the first NUL or the end of the window.
fn utf16_until_nul(c: &mut Cursor<'_>) -> LocalResult<Vec<u16>> {
    let mut units = Vec::with_capacity(c.len() / 2);
    while c.len() >= 2 {
        match c.u16()? {
            0 => break,
            u => units.push(u),
        }
    }
    Ok(units)
}

fn align4(n: usize) -> usize {
    (n + 3) & !3
}

/// The header of a version node. Positions are relative to the start of the resource.
struct RawNode {
    at: usize,
    len: usize,
    val_len: usize,
    text: bool,
    key: String,
    value_at: usize,
    child_at: usize,
}

impl RawNode {
    fn read(data: &Cursor<'_>, at: usize) -> LocalResult<Self> {
        let mut c = data.at(at)?;
        let len = c.u16()? as usize;
        let val_len = c.u16()? as usize;
        let text = c.u16()? != 0;
        let key = c.utf16z()?.to_string_lossy();
        if len < 6 {
            return Err(LocalError::invalid("version node length"));
        }
        let value_at = align4(c.position());
        let value_size = if text { val_len * 2 } else { val_len };
        Ok(Self {
            at,
            len,
            val_len,
            text,
            key,
            value_at,
            child_at: align4(value_at + value_size),
        })
    }

    fn end(&self) -> usize {
        self.at + self.len
    }
}

fn decode_version(data: &Cursor<'_>) -> LocalResult<VersionInfo> {
    let root = RawNode::read(data, 0)?;

    let fixed = if root.val_len >= size_of::<VS_FIXEDFILEINFO>() {
        let f: &VS_FIXEDFILEINFO = data.at(root.value_at)?.get()?;
        let split = |ms: u32, ls: u32| {
            [(ms >> 16) as u16, ms as u16, (ls >> 16) as u16, ls as u16]
        };
        Some(FixedFileInfo {
            signature: f.signature.get(),
            struc_version: ((f.struc_version.get() >> 16) as u16, f.struc_version.get() as u16),
            file_version: split(f.file_version_ms.get(), f.file_version_ls.get()),
            product_version: split(f.product_version_ms.get(), f.product_version_ls.get()),
            file_flags_mask: f.file_flags_mask.get(),
            file_flags: f.file_flags.get(),
            file_os: f.file_os.get(),
            file_type: f.file_type.get(),
            file_subtype: f.file_subtype.get(),
            file_date: (f.file_date_ms.get(), f.file_date_ls.get()),
        })
    } else {
        None
    };

    let children = version_children(data, &root, 0)?;
    Ok(VersionInfo { fixed, children })
}

fn version_children(data: &Cursor<'_>, parent: &RawNode, depth: u32) -> LocalResult<Vec<VersionNode>> {
    if depth >= MAX_VERSION_DEPTH {
        return Err(LocalError::invalid("version resource is too deep"));
    }

    let mut nodes = Vec::new();
    let mut at = parent.child_at;
    while at < parent.end() {
        let raw = RawNode::read(data, at)?;
        let next = align4(raw.end());

        let value = if raw.val_len != 0 || raw.value_at == next {
            let mut c = data.at(raw.value_at)?;
            if raw.text {
                let text = c.utf16(raw.val_len)?.to_string_lossy();
                VersionValue::Text(text.trim_end_matches('\0').to_string())
            } else {
                let mut words = Vec::with_capacity(raw.val_len / 2);
                for _ in 0..raw.val_len / 2 {
                    words.push(c.u16()?);
                }
                VersionValue::Words(words)
            }
        } else {
            VersionValue::Block
        };

        let children = version_children(data, &raw, depth + 1)?;
        nodes.push(VersionNode {
            key: raw.key,
            value,
            children,
        });
        at = next;
    }
    Ok(nodes)
}
