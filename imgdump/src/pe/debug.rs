//! Debug directories, as found in PE images and in separate debug files.
//!
//! The directory itself is reached differently by the two containers, but each entry points at
//! its data by file offset (`PointerToRawData`), so decoding an entry only needs the view.

use super::RvaMap;
use super::symbols::{self, CoffDebug};
use crate::codeview::{self, CodeView};
use crate::error::{LocalError, LocalResult, isolate};
use crate::view::{Cursor, ImageView};
use crate::{Base, DirectoryEntry};
use bstr::BStr;
use imgdump_coff::*;
use std::mem::size_of;
use uuid::Uuid;

/// One debug directory entry and what it points at.
pub struct DebugEntry<'a> {
    #[allow(missing_docs)]
    pub dir: &'a IMAGE_DEBUG_DIRECTORY,
    /// The data described by this entry. `tag` is the debug type; `offset` is a file offset.
    pub entry: DirectoryEntry,
    #[allow(missing_docs)]
    pub info: LocalResult<DebugInfo<'a>>,
}

/// The decoded data of a debug directory entry.
pub enum DebugInfo<'a> {
    /// The entry has no data.
    Empty,
    /// A COFF symbol table.
    Coff(CoffDebug<'a>),
    #[allow(missing_docs)]
    CodeView(CodeView<'a>),
    #[allow(missing_docs)]
    Misc(Misc<'a>),
    /// Frame pointer omission records.
    Fpo(&'a [FPO_DATA]),
    /// An address map, either to or from the original image.
    Omap(&'a [OMAP_DATA]),
    #[allow(missing_docs)]
    Pogo(Pogo<'a>),
    #[allow(missing_docs)]
    Repro(Repro),
    /// Any other type, shown as bytes.
    Raw(&'a [u8]),
}

/// `IMAGE_DEBUG_TYPE_MISC`: usually the name of the image the debug data belongs to.
pub struct Misc<'a> {
    #[allow(missing_docs)]
    pub data_type: u32,
    #[allow(missing_docs)]
    pub length: u32,
    #[allow(missing_docs)]
    pub unicode: bool,
    #[allow(missing_docs)]
    pub data: MiscData<'a>,
}

#[allow(missing_docs)]
pub enum MiscData<'a> {
    Ansi(&'a BStr),
    Unicode(String),
}

/// `IMAGE_DEBUG_TYPE_POGO`: the profile-guided optimization section map.
pub struct Pogo<'a> {
    /// The signature word, e.g. `PGU\0` or `LTCG`.
    pub header: u32,
    #[allow(missing_docs)]
    pub entries: Vec<PogoEntry<'a>>,
}

#[allow(missing_docs)]
pub struct PogoEntry<'a> {
    pub rva: u32,
    pub size: u32,
    pub name: &'a BStr,
}

/// `IMAGE_DEBUG_TYPE_REPRO`: the hash that replaces the time stamp in deterministic builds.
pub struct Repro {
    #[allow(missing_docs)]
    pub flags: u32,
    #[allow(missing_docs)]
    pub guid: Uuid,
    #[allow(missing_docs)]
    pub unknown: [u32; 3],
    #[allow(missing_docs)]
    pub debug_timestamp: u32,
}

const REPRO_SIZE: usize = 36;

pub(crate) fn decode_pe<'a>(map: &RvaMap<'a>, d: DirectoryEntry) -> LocalResult<Vec<DebugEntry<'a>>> {
    let count = d.length as usize / size_of::<IMAGE_DEBUG_DIRECTORY>();
    let dirs: &[IMAGE_DEBUG_DIRECTORY] = map
        .cursor(
            d.offset,
            (count * size_of::<IMAGE_DEBUG_DIRECTORY>()) as u32,
            "debug directory",
        )?
        .slice(count)?;
    Ok(decode_entries(map.view, dirs))
}

/// Decodes every entry of a debug directory. Entries fail independently.
pub fn decode_entries<'a>(view: &'a ImageView, dirs: &'a [IMAGE_DEBUG_DIRECTORY]) -> Vec<DebugEntry<'a>> {
    dirs.iter()
        .map(|dir| {
            let entry = DirectoryEntry::new(
                Base::FileOffset,
                dir.type_.get(),
                dir.pointer_to_raw_data.get(),
                dir.size_of_data.get(),
            );
            tracing::debug!(
                ty = debug_type_name(entry.tag),
                offset = entry.offset,
                size = entry.length,
                "debug directory entry"
            );
            let info = isolate(debug_type_name(entry.tag), || decode_info(view, entry));
            DebugEntry { dir, entry, info }
        })
        .collect()
}

fn decode_info(view: &ImageView, entry: DirectoryEntry) -> LocalResult<DebugInfo<'_>> {
    if entry.length == 0 {
        return Ok(DebugInfo::Empty);
    }

    let mut c = view
        .cursor_at(entry.offset as usize, entry.length as usize)
        .ok_or(LocalError::overrun("debug data"))?;

    Ok(match entry.tag {
        IMAGE_DEBUG_TYPE_UNKNOWN => DebugInfo::Empty,
        IMAGE_DEBUG_TYPE_COFF => DebugInfo::Coff(symbols::decode_debug(&c)?),
        IMAGE_DEBUG_TYPE_CODEVIEW => {
            DebugInfo::CodeView(codeview::decode(view, entry.offset as usize, entry.length as usize)?)
        }
        IMAGE_DEBUG_TYPE_MISC => DebugInfo::Misc(decode_misc(&mut c)?),
        IMAGE_DEBUG_TYPE_FPO => {
            let n = c.len() / size_of::<FPO_DATA>();
            DebugInfo::Fpo(c.slice(n)?)
        }
        IMAGE_DEBUG_TYPE_OMAP_TO_SRC | IMAGE_DEBUG_TYPE_OMAP_FROM_SRC => {
            let n = c.len() / size_of::<OMAP_DATA>();
            DebugInfo::Omap(c.slice(n)?)
        }
        IMAGE_DEBUG_TYPE_POGO => DebugInfo::Pogo(decode_pogo(&mut c)?),
        IMAGE_DEBUG_TYPE_REPRO if c.len() >= REPRO_SIZE => DebugInfo::Repro(Repro {
            flags: c.u32()?,
            guid: c.guid()?,
            unknown: [c.u32()?, c.u32()?, c.u32()?],
            debug_timestamp: c.u32()?,
        }),
        _ => DebugInfo::Raw(c.take_rest()),
    })
}

fn decode_misc<'a>(c: &mut Cursor<'a>) -> LocalResult<Misc<'a>> {
    let misc: &IMAGE_DEBUG_MISC = c.get()?;
    let unicode = misc.unicode != 0;

    // The data runs to the end of the record; `length` includes the fixed part.
    let data_len = (misc.length.get() as usize)
        .saturating_sub(size_of::<IMAGE_DEBUG_MISC>())
        .min(c.len());
    let mut data = c.sub(data_len)?;

    let data = if unicode {
        let n = data.len() / 2;
        let s = data.utf16(n)?;
        let s = s.to_string_lossy();
        MiscData::Unicode(s.trim_end_matches('\0').to_string())
    } else {
        let bytes = data.take_rest();
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        MiscData::Ansi(BStr::new(&bytes[..end]))
    };

    Ok(Misc {
        data_type: misc.data_type.get(),
        length: misc.length.get(),
        unicode,
        data,
    })
}

fn decode_pogo<'a>(c: &mut Cursor<'a>) -> LocalResult<Pogo<'a>> {
    let header = c.u32()?;
    let mut entries = Vec::new();

    // Each entry is `rva, size, name`, with the name padded to a multiple of 4 bytes.
    while c.len() > 8 {
        let rva = c.u32()?;
        let size = c.u32()?;
        let Ok(name) = c.strz() else {
            break;
        };
        c.align(4).or_else(|_| c.seek(c.window().len()))?;
        entries.push(PogoEntry { rva, size, name });
    }

    Ok(Pogo { header, entries })
}
