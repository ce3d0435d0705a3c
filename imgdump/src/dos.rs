//! DOS (`MZ`) executables that have no recognized new-style header.

use crate::error::{LocalError, LocalResult, isolate};
use crate::view::ImageView;
use anyhow::Context;
use imgdump_coff::IMAGE_DOS_HEADER;
use zerocopy::{LE, U16};

/// A decoded DOS executable.
pub struct DosImage<'a> {
    #[allow(missing_docs)]
    pub header: &'a IMAGE_DOS_HEADER,
    /// Entries of the relocation table, as `(offset, segment)` pairs.
    pub relocations: LocalResult<Vec<(u16, u16)>>,
}

/// Reads the DOS header. The header itself is mandatory.
pub fn read_header(view: &ImageView) -> anyhow::Result<&IMAGE_DOS_HEADER> {
    view.get::<IMAGE_DOS_HEADER>(0)
        .context("the DOS header is truncated")
}

#[allow(missing_docs)]
pub fn decode(view: &ImageView) -> anyhow::Result<DosImage<'_>> {
    let header = read_header(view)?;
    let relocations = isolate("DOS relocations", || read_relocations(view, header));
    Ok(DosImage {
        header,
        relocations,
    })
}

fn read_relocations(view: &ImageView, header: &IMAGE_DOS_HEADER) -> LocalResult<Vec<(u16, u16)>> {
    let count = header.e_crlc.get() as usize;
    let mut c = view
        .cursor_at(header.e_lfarlc.get() as usize, count * 4)
        .ok_or(LocalError::overrun("relocation table"))?;
    let pairs: &[[U16<LE>; 2]] = c.slice(count)?;
    Ok(pairs.iter().map(|p| (p[0].get(), p[1].get())).collect())
}

#[test]
fn dos_relocations() {
    let mut bytes = vec![0u8; 0x48];
    bytes[0..2].copy_from_slice(b"MZ");
    bytes[6] = 2; // e_crlc
    bytes[0x18] = 0x40; // e_lfarlc
    bytes[0x40..0x48].copy_from_slice(&[0x10, 0, 0x20, 0, 0x30, 0, 0x40, 0]);
    let view = ImageView::from_bytes(bytes);
    let dos = decode(&view).unwrap();
    assert_eq!(dos.relocations.unwrap(), vec![(0x10, 0x20), (0x30, 0x40)]);
}

#[test]
fn dos_truncated() {
    let view = ImageView::from_bytes(b"MZ\0\0".to_vec());
    assert!(decode(&view).is_err());

    let mut bytes = vec![0u8; 0x40];
    bytes[0..2].copy_from_slice(b"MZ");
    bytes[6] = 9;
    bytes[0x18] = 0x40;
    let view = ImageView::from_bytes(bytes);
    let dos = decode(&view).unwrap();
    assert!(dos.relocations.is_err());
}
