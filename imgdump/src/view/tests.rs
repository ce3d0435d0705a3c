use super::*;
use zerocopy::U32;

fn section(va: u32, raw_size: u32, raw_ptr: u32) -> IMAGE_SECTION_HEADER {
    IMAGE_SECTION_HEADER {
        virtual_address: U32::new(va),
        size_of_raw_data: U32::new(raw_size),
        pointer_to_raw_data: U32::new(raw_ptr),
        ..IMAGE_SECTION_HEADER::default()
    }
}

#[test]
fn read_bounds() {
    let view = ImageView::from_bytes(vec![0u8; 16]);
    assert_eq!(view.read(0, 16).map(|b| b.len()), Some(16));
    assert_eq!(view.read(16, 0).map(|b| b.len()), Some(0));
    assert!(view.read(15, 2).is_none());
    assert!(view.read(17, 0).is_none());
    assert!(view.read(usize::MAX, 2).is_none());
    assert!(view.read(1, usize::MAX).is_none());
}

#[test]
fn read_never_escapes() {
    let view = ImageView::from_bytes((0..32u8).collect());
    for offset in 0..40 {
        for size in 0..40 {
            match view.read(offset, size) {
                Some(b) => {
                    assert!(offset + size <= view.len());
                    assert_eq!(b.len(), size);
                }
                None => assert!(offset + size > view.len()),
            }
        }
    }
}

#[test]
fn typed_reads() {
    let view = ImageView::from_bytes(vec![0x4d, 0x5a, 0x90, 0x00, 0x03, 0x00, 0x00, 0x00]);
    assert_eq!(view.u16_at(0), Some(0x5a4d));
    assert_eq!(view.u32_at(4), Some(3));
    assert_eq!(view.u32_at(5), None);
    assert_eq!(view.u8_at(8), None);
}

#[test]
fn strz_needs_terminator() {
    let view = ImageView::from_bytes(b"abc\0def".to_vec());
    assert_eq!(view.strz_at(0).unwrap(), "abc");
    assert_eq!(view.strz_at(3).unwrap(), "");
    assert!(view.strz_at(4).is_none());
    assert!(view.strz_at(100).is_none());
}

#[test]
fn rva_zero_never_maps() {
    let sections = [section(0, 0x1000, 0x400)];
    assert_eq!(rva_to_file_offset(&sections, 0, 4), None);
    assert_eq!(rva_to_file_offset(&sections, 4, 4), Some(0x404));
}

#[test]
fn rva_must_fit_entirely() {
    let sections = [section(0x1000, 0x200, 0x400)];
    assert_eq!(rva_to_file_offset(&sections, 0x1000, 0x200), Some(0x400));
    assert_eq!(rva_to_file_offset(&sections, 0x11fc, 4), Some(0x5fc));
    assert_eq!(rva_to_file_offset(&sections, 0x11fd, 4), None);
    assert_eq!(rva_to_file_offset(&sections, 0xfff, 4), None);
    assert_eq!(rva_to_file_offset(&sections, 0xffff_fffe, 4), None);
}

#[test]
fn rva_last_section_wins() {
    // Overlapping sections: the later declaration is tried first.
    let sections = [section(0x1000, 0x1000, 0x400), section(0x1800, 0x100, 0x2000)];
    assert_eq!(rva_to_file_offset(&sections, 0x1810, 4), Some(0x2010));
    assert_eq!(rva_to_file_offset(&sections, 0x1000, 4), Some(0x400));
}

#[test]
fn rva_result_is_in_file() {
    let sections = [section(0x1000, 0x200, 0x400)];
    let view = ImageView::from_bytes(vec![0u8; 0x500]);
    assert_eq!(view.translate_rva(&sections, 0x1010, 4), Some(0x410));
    // Mapped by the section table, but the raw data is truncated.
    assert_eq!(view.translate_rva(&sections, 0x1100, 4), None);
}

#[test]
fn cursor_ints() {
    let bytes = &[
        0x12, 0x34, // u16
        0x56, 0x78, 0xaa, 0xee, // u32
        0x55, 0x33, // u8, i8
    ];

    let mut c = Cursor::with_base(bytes, 0x100);
    assert_eq!(c.len(), 8);
    assert_eq!(c.u16().unwrap(), 0x3412);
    assert_eq!(c.file_offset(), 0x102);
    assert_eq!(c.u32().unwrap(), 0xeeaa_7856);
    assert_eq!(c.u8().unwrap(), 0x55);
    assert_eq!(c.i8().unwrap(), 0x33);
    assert!(c.is_empty());
    assert!(c.u8().is_err());
}

#[test]
fn cursor_failed_read_does_not_advance() {
    let mut c = Cursor::new(&[1, 2, 3]);
    assert!(c.u32().is_err());
    assert_eq!(c.position(), 0);
    assert!(Cursor::new(&[5, b'a']).strt().is_err());
    let mut c = Cursor::new(&[5, b'a']);
    let _ = c.strt();
    assert_eq!(c.position(), 0);
}

#[test]
fn cursor_seek_and_align() {
    let bytes = [0u8; 10];
    let mut c = Cursor::new(&bytes);
    c.skip(1).unwrap();
    c.align(4).unwrap();
    assert_eq!(c.position(), 4);
    c.align(4).unwrap();
    assert_eq!(c.position(), 4);
    c.seek(10).unwrap();
    assert!(c.is_empty());
    assert!(c.seek(11).is_err());
    assert_eq!(c.position(), 10);
}

#[test]
fn cursor_sub_keeps_offsets() {
    let bytes = [0u8; 10];
    let mut c = Cursor::with_base(&bytes, 0x40);
    c.skip(2).unwrap();
    let sub = c.sub(4).unwrap();
    assert_eq!(sub.base(), 0x42);
    assert_eq!(sub.len(), 4);
    assert_eq!(c.position(), 6);
    assert!(c.sub(5).is_err());
}

#[test]
fn cursor_rest_starts_at_current_offset() {
    let bytes = [1u8, 2, 3, 4, 5, 6];
    let mut c = Cursor::with_base(&bytes, 0x100);
    c.skip(4).unwrap();
    let rest = c.rest();
    assert_eq!(rest.base(), 0x104);
    assert_eq!(rest.file_offset(), 0x104);
    assert_eq!(rest.len(), 2);
    assert!(c.is_empty());
}

#[test]
fn cursor_strings() {
    let mut c = Cursor::new(b"\x03abcxyz\0\x41\x00\x42\x00\x00\x00");
    assert_eq!(c.strt().unwrap(), "abc");
    assert_eq!(c.strz().unwrap(), "xyz");
    assert_eq!(c.utf16z().unwrap().to_string_lossy(), "AB");
    assert!(c.is_empty());
}

#[test]
fn cursor_guid() {
    #[rustfmt::skip]
    let bytes = [
        0x33, 0x22, 0x11, 0x00,     // data1
        0x55, 0x44,                 // data2
        0x77, 0x66,                 // data3
        0x88, 0x99, 0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff,
    ];
    let guid = Cursor::new(&bytes).guid().unwrap();
    assert_eq!(
        guid.to_string(),
        "00112233-4455-6677-8899-aabbccddeeff"
    );
    assert_eq!(
        crate::guid::braced(&guid),
        "{00112233-4455-6677-8899-AABBCCDDEEFF}"
    );
}
