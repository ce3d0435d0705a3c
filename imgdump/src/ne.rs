//! Segmented (`NE`) executables.
//!
//! Most table offsets in the NE header are relative to the header itself; the non-resident name
//! table is the exception and uses a file offset.

use crate::error::{LocalError, LocalResult, isolate};
use crate::view::{Cursor, ImageView};
use crate::dos;
use anyhow::Context;
use bstr::BStr;
use imgdump_coff::*;

/// A decoded NE image.
pub struct NeImage<'a> {
    #[allow(missing_docs)]
    pub header: &'a IMAGE_OS2_HEADER,
    /// File offset of the NE header.
    pub header_offset: usize,
    #[allow(missing_docs)]
    pub segments: LocalResult<&'a [NE_SEGMENT]>,
    #[allow(missing_docs)]
    pub resources: LocalResult<NeResources<'a>>,
    /// The first resident name is the module name.
    pub resident_names: LocalResult<Vec<NeName<'a>>>,
    /// The first non-resident name is the module description.
    pub nonresident_names: LocalResult<Vec<NeName<'a>>>,
    /// Names of the modules this one imports from.
    pub modules: LocalResult<Vec<LocalResult<&'a BStr>>>,
    #[allow(missing_docs)]
    pub entries: LocalResult<Vec<NeEntry>>,
}

impl<'a> NeImage<'a> {
    /// File offset of a segment's data. `0` means the segment has no data in the file.
    pub fn segment_file_offset(&self, seg: &NE_SEGMENT) -> u64 {
        (seg.offset.get() as u64) << (self.header.ne_align.get() & 0x1f)
    }
}

/// An entry of the resident or non-resident name table.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NeName<'a> {
    #[allow(missing_docs)]
    pub name: &'a BStr,
    #[allow(missing_docs)]
    pub ordinal: u16,
}

/// The resource table.
pub struct NeResources<'a> {
    /// Resource data offsets are in units of `1 << align_shift`.
    pub align_shift: u16,
    #[allow(missing_docs)]
    pub types: Vec<NeResourceType<'a>>,
}

/// A group of resources that share a type.
pub struct NeResourceType<'a> {
    #[allow(missing_docs)]
    pub id: NeResourceId<'a>,
    #[allow(missing_docs)]
    pub resources: Vec<NeResource<'a>>,
}

/// Resource types and names are either integers (high bit set) or strings in the resource table.
pub enum NeResourceId<'a> {
    #[allow(missing_docs)]
    Id(u16),
    #[allow(missing_docs)]
    Name(LocalResult<&'a BStr>),
}

impl<'a> NeResourceId<'a> {
    fn new(table: &Cursor<'a>, raw: u16) -> Self {
        if raw & 0x8000 != 0 {
            Self::Id(raw & 0x7fff)
        } else {
            Self::Name(
                table
                    .at(raw as usize)
                    .and_then(|mut c| c.strt())
                    .map_err(LocalError::from),
            )
        }
    }
}

/// One resource.
pub struct NeResource<'a> {
    #[allow(missing_docs)]
    pub id: NeResourceId<'a>,
    /// File offset of the data.
    pub offset: u64,
    /// Length of the data, in bytes.
    pub length: u64,
    #[allow(missing_docs)]
    pub flags: u16,
}

/// An entry point from the entry table.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NeEntry {
    #[allow(missing_docs)]
    pub ordinal: u16,
    /// 1-based segment number.
    pub segment: u8,
    #[allow(missing_docs)]
    pub offset: u16,
    #[allow(missing_docs)]
    pub flags: u8,
    /// The entry was in a movable bundle, reached through an `INT 3Fh` thunk.
    pub movable: bool,
}

#[allow(missing_docs)]
pub fn decode(view: &ImageView) -> anyhow::Result<NeImage<'_>> {
    let dos = dos::read_header(view)?;
    let header_offset = dos.e_lfanew.get() as usize;
    let header: &IMAGE_OS2_HEADER = view
        .get(header_offset)
        .context("the NE header is truncated")?;

    let rel = |off: u16| header_offset + off as usize;

    let segments = isolate("NE segments", || {
        let n = header.ne_cseg.get() as usize;
        let mut c = view
            .cursor_from(rel(header.ne_segtab.get()))
            .ok_or(LocalError::OutOfBounds)?;
        c.slice(n).map_err(|_| LocalError::overrun("segment table"))
    });

    let resources = isolate("NE resources", || {
        // The resident name table follows the resource table.
        let start = rel(header.ne_rsrctab.get());
        let end = rel(header.ne_restab.get());
        let len = if end > start { end - start } else { view.len().saturating_sub(start) };
        let table = view.cursor_at(start, len).ok_or(LocalError::overrun("resource table"))?;
        read_resources(&table)
    });

    let resident_names = isolate("NE resident names", || {
        let mut c = view
            .cursor_from(rel(header.ne_restab.get()))
            .ok_or(LocalError::OutOfBounds)?;
        read_names(&mut c)
    });

    let nonresident_names = isolate("NE non-resident names", || {
        if header.ne_nrestab.get() == 0 {
            return Ok(Vec::new());
        }
        let mut c = view
            .cursor_at(
                header.ne_nrestab.get() as usize,
                header.ne_cbnrestab.get() as usize,
            )
            .ok_or(LocalError::overrun("non-resident name table"))?;
        read_names(&mut c)
    });

    let modules = isolate("NE module references", || {
        let n = header.ne_cmod.get() as usize;
        let mut c = view
            .cursor_from(rel(header.ne_modtab.get()))
            .ok_or(LocalError::OutOfBounds)?;
        let imported = view
            .cursor_from(rel(header.ne_imptab.get()))
            .ok_or(LocalError::OutOfBounds)?;
        let mut modules = Vec::with_capacity(n);
        for _ in 0..n {
            let off = c.u16()? as usize;
            modules.push(
                imported
                    .at(off)
                    .and_then(|mut c| c.strt())
                    .map_err(LocalError::from),
            );
        }
        Ok(modules)
    });

    let entries = isolate("NE entry table", || {
        let mut c = view
            .cursor_at(rel(header.ne_enttab.get()), header.ne_cbenttab.get() as usize)
            .ok_or(LocalError::overrun("entry table"))?;
        read_entries(&mut c)
    });

    Ok(NeImage {
        header,
        header_offset,
        segments,
        resources,
        resident_names,
        nonresident_names,
        modules,
        entries,
    })
}

fn read_resources<'a>(table: &Cursor<'a>) -> LocalResult<NeResources<'a>> {
    let mut c = table.clone();
    let align_shift = c.u16()?;
    let shift = (align_shift & 0x1f) as u32;
    let mut types = Vec::new();

    loop {
        let type_id = c.u16()?;
        if type_id == 0 {
            break;
        }
        let count = c.u16()?;
        let _resloader = c.u32()?;

        let infos: &[NE_NAMEINFO] = c
            .slice(count as usize)
            .map_err(|_| LocalError::overrun("resource name infos"))?;

        let resources = infos
            .iter()
            .map(|info| NeResource {
                id: NeResourceId::new(table, info.id.get()),
                offset: (info.offset.get() as u64) << shift,
                length: (info.length.get() as u64) << shift,
                flags: info.flags.get(),
            })
            .collect();

        types.push(NeResourceType {
            id: NeResourceId::new(table, type_id),
            resources,
        });
    }

    Ok(NeResources { align_shift, types })
}

/// Reads `(length-prefixed name, ordinal)` pairs until a zero length.
pub(crate) fn read_names<'a>(c: &mut Cursor<'a>) -> LocalResult<Vec<NeName<'a>>> {
    let mut names = Vec::new();
    while !c.is_empty() {
        let name = c.strt()?;
        if name.is_empty() {
            break;
        }
        let ordinal = c.u16()?;
        names.push(NeName { name, ordinal });
    }
    Ok(names)
}

fn read_entries(c: &mut Cursor<'_>) -> LocalResult<Vec<NeEntry>> {
    let mut entries = Vec::new();
    let mut ordinal: u16 = 1;

    while !c.is_empty() {
        let count = c.u8()?;
        if count == 0 {
            break;
        }
        let kind = c.u8()?;

        match kind {
            NE_BUNDLE_UNUSED => {}
            NE_BUNDLE_MOVABLE => {
                for i in 0..count as u16 {
                    let flags = c.u8()?;
                    let _int3f = c.u16()?;
                    let segment = c.u8()?;
                    let offset = c.u16()?;
                    entries.push(NeEntry {
                        ordinal: ordinal.wrapping_add(i),
                        segment,
                        offset,
                        flags,
                        movable: true,
                    });
                }
            }
            segment => {
                for i in 0..count as u16 {
                    let flags = c.u8()?;
                    let offset = c.u16()?;
                    entries.push(NeEntry {
                        ordinal: ordinal.wrapping_add(i),
                        segment,
                        offset,
                        flags,
                        movable: false,
                    });
                }
            }
        }

        ordinal = ordinal.wrapping_add(count as u16);
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_bundles() {
        #[rustfmt::skip]
        let data = [
            /* 0x0000 */ 2, 0,                      // two unused ordinals
            /* 0x0002 */ 1, 0xff,                   // one movable entry
            /* 0x0004 */ 0x03, 0xcd, 0x3f, 2,       // flags, INT 3Fh, segment 2
            /* 0x0008 */ 0x34, 0x12,                // offset
            /* 0x000a */ 2, 1,                      // two fixed entries in segment 1
            /* 0x000c */ 0x01, 0x10, 0x00,
            /* 0x000f */ 0x00, 0x20, 0x00,
            /* 0x0012 */ 0,                         // end
        ];
        let entries = read_entries(&mut Cursor::new(&data)).unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(
            entries[0],
            NeEntry { ordinal: 3, segment: 2, offset: 0x1234, flags: 3, movable: true }
        );
        assert_eq!(entries[1].ordinal, 4);
        assert_eq!(entries[1].segment, 1);
        assert_eq!(entries[2].offset, 0x20);
    }

    #[test]
    fn names() {
        let data = b"\x04TEST\x00\x00\x03FOO\x05\x00\x00";
        let names = read_names(&mut Cursor::new(data)).unwrap();
        assert_eq!(names.len(), 2);
        assert_eq!(names[0].name, "TEST");
        assert_eq!(names[1], NeName { name: BStr::new("FOO"), ordinal: 5 });
    }

    #[test]
    fn resources() {
        #[rustfmt::skip]
        let data = [
            /* 0x0000 */ 4, 0,                          // align shift
            /* 0x0002 */ 0x02, 0x80, 1, 0, 0, 0, 0, 0,  // RT_BITMAP, one resource
            /* 0x000a */ 0x10, 0, 0x02, 0,              // offset, length
            /* 0x000e */ 0x30, 0x0c, 0x1a, 0,           // flags, id (a name at 0x1a)
            /* 0x0012 */ 0, 0, 0, 0,                    // handle, usage
            /* 0x0016 */ 0, 0,                          // end of types
            /* 0x0018 */ 0, 0,
            /* 0x001a */ 4, b'L', b'O', b'G', b'O',
        ];
        let r = read_resources(&Cursor::new(&data)).unwrap();
        assert_eq!(r.align_shift, 4);
        assert_eq!(r.types.len(), 1);
        assert!(matches!(r.types[0].id, NeResourceId::Id(2)));
        let res = &r.types[0].resources[0];
        assert_eq!(res.offset, 0x100);
        assert_eq!(res.length, 0x20);
        match &res.id {
            NeResourceId::Name(Ok(name)) => assert_eq!(*name, "LOGO"),
            _ => panic!("expected a named resource"),
        }
    }
}
