//! Linear (`LE`) executables, in practice Windows virtual device drivers.

use crate::dos;
use crate::error::{LocalError, LocalResult, isolate};
use crate::ne::{NeName, read_names};
use crate::view::{Cursor, ImageView};
use anyhow::Context;
use bstr::BStr;
use imgdump_coff::*;

/// A decoded LE image.
pub struct LeImage<'a> {
    #[allow(missing_docs)]
    pub header: &'a IMAGE_VXD_HEADER,
    /// File offset of the LE header.
    pub header_offset: usize,
    #[allow(missing_docs)]
    pub objects: LocalResult<&'a [LE_OBJECT]>,
    #[allow(missing_docs)]
    pub resident_names: LocalResult<Vec<NeName<'a>>>,
    #[allow(missing_docs)]
    pub nonresident_names: LocalResult<Vec<NeName<'a>>>,
    #[allow(missing_docs)]
    pub entries: LocalResult<Vec<LeEntry>>,
    /// The device description block, which a VxD exports as ordinal 1.
    pub ddb: Option<LocalResult<&'a VXD_DESCRIPTION_BLOCK>>,
}

impl<'a> LeImage<'a> {
    /// The device name from the description block, without padding.
    pub fn device_name(&self) -> Option<&'a BStr> {
        let ddb = self.ddb.as_ref()?.as_ref().ok()?;
        let name = &ddb.name[..];
        let end = name.iter().rposition(|&b| b != b' ' && b != 0).map_or(0, |i| i + 1);
        Some(BStr::new(&name[..end]))
    }
}

/// An entry point from the entry table.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LeEntry {
    #[allow(missing_docs)]
    pub ordinal: u16,
    /// 1-based object number.
    pub object: u16,
    /// The bundle type: 1 = 16-bit, 2 = 286 call gate, 3 = 32-bit, 4 = forwarder.
    pub kind: u8,
    #[allow(missing_docs)]
    pub flags: u8,
    #[allow(missing_docs)]
    pub offset: u32,
}

#[allow(missing_docs)]
pub fn decode(view: &ImageView) -> anyhow::Result<LeImage<'_>> {
    let dos = dos::read_header(view)?;
    let header_offset = dos.e_lfanew.get() as usize;
    let header: &IMAGE_VXD_HEADER = view
        .get(header_offset)
        .context("the LE header is truncated")?;

    let rel = |off: u32| header_offset.saturating_add(off as usize);

    let objects = isolate("LE objects", || {
        let n = header.e32_objcnt.get() as usize;
        let mut c = view
            .cursor_from(rel(header.e32_objtab.get()))
            .ok_or(LocalError::OutOfBounds)?;
        c.slice(n).map_err(|_| LocalError::overrun("object table"))
    });

    let resident_names = isolate("LE resident names", || {
        let mut c = view
            .cursor_from(rel(header.e32_restab.get()))
            .ok_or(LocalError::OutOfBounds)?;
        read_names(&mut c)
    });

    let nonresident_names = isolate("LE non-resident names", || {
        if header.e32_nrestab.get() == 0 {
            return Ok(Vec::new());
        }
        let mut c = view
            .cursor_at(
                header.e32_nrestab.get() as usize,
                header.e32_cbnrestab.get() as usize,
            )
            .ok_or(LocalError::overrun("non-resident name table"))?;
        read_names(&mut c)
    });

    let entries = isolate("LE entry table", || {
        let mut c = view
            .cursor_from(rel(header.e32_enttab.get()))
            .ok_or(LocalError::OutOfBounds)?;
        read_entries(&mut c)
    });

    let ddb = match (&objects, &entries) {
        (Ok(objects), Ok(entries)) => entries
            .iter()
            .find(|e| e.ordinal == 1 && e.kind == LE_BUNDLE_32BIT)
            .map(|e| isolate("VxD description block", || read_ddb(view, header, objects, e))),
        _ => None,
    };

    Ok(LeImage {
        header,
        header_offset,
        objects,
        resident_names,
        nonresident_names,
        entries,
        ddb,
    })
}

fn read_entries(c: &mut Cursor<'_>) -> LocalResult<Vec<LeEntry>> {
    let mut entries = Vec::new();
    let mut ordinal: u16 = 1;

    while !c.is_empty() {
        let count = c.u8()?;
        if count == 0 {
            break;
        }
        let kind = c.u8()?;
        if kind == 0 {
            ordinal = ordinal.wrapping_add(count as u16);
            continue;
        }

        let object = c.u16()?;
        for i in 0..count as u16 {
            let flags = c.u8()?;
            let offset = match kind {
                1 => c.u16()? as u32,
                2 => {
                    let offset = c.u16()? as u32;
                    let _callgate = c.u16()?;
                    offset
                }
                3 => c.u32()?,
                4 => {
                    let _module = c.u16()?;
                    c.u32()?
                }
                _ => return Err(LocalError::invalid("unknown entry bundle type")),
            };
            entries.push(LeEntry {
                ordinal: ordinal.wrapping_add(i),
                object,
                kind,
                flags,
                offset,
            });
        }
        ordinal = ordinal.wrapping_add(count as u16);
    }

    Ok(entries)
}

/// Maps object + offset to a file offset through the object's first page.
fn read_ddb<'a>(
    view: &'a ImageView,
    header: &IMAGE_VXD_HEADER,
    objects: &[LE_OBJECT],
    entry: &LeEntry,
) -> LocalResult<&'a VXD_DESCRIPTION_BLOCK> {
    let object = objects
        .get((entry.object as usize).wrapping_sub(1))
        .ok_or(LocalError::invalid("entry refers to a missing object"))?;

    let page = (object.pagemap.get() as u64).saturating_sub(1);
    let offset = header.e32_datapage.get() as u64
        + page * header.e32_pagesize.get() as u64
        + entry.offset as u64;

    view.get(offset as usize).ok_or(LocalError::OutOfBounds)
}

#[test]
fn entry_bundles() {
    #[rustfmt::skip]
    let data = [
        /* 0x0000 */ 1, 3, 1, 0,                    // one 32-bit entry in object 1
        /* 0x0004 */ 0x03, 0x00, 0x10, 0x00, 0x00,  // flags, offset
        /* 0x0009 */ 2, 0,                          // two unused
        /* 0x000b */ 1, 1, 2, 0,                    // one 16-bit entry in object 2
        /* 0x000f */ 0x00, 0x34, 0x12,
        /* 0x0012 */ 0,
    ];
    let entries = read_entries(&mut Cursor::new(&data)).unwrap();
    assert_eq!(
        entries,
        vec![
            LeEntry { ordinal: 1, object: 1, kind: 3, flags: 3, offset: 0x1000 },
            LeEntry { ordinal: 4, object: 2, kind: 1, flags: 0, offset: 0x1234 },
        ]
    );
}

#[test]
fn bad_bundle_type() {
    let data = [1, 9, 1, 0, 0, 0, 0];
    assert!(read_entries(&mut Cursor::new(&data)).is_err());
}
