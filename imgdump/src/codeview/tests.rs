use super::lines::SegmentRange;
use super::*;

fn put(f: &mut [u8], offset: usize, bytes: &[u8]) {
    f[offset..offset + bytes.len()].copy_from_slice(bytes);
}

fn put16(f: &mut [u8], offset: usize, value: u16) {
    put(f, offset, &value.to_le_bytes());
}

fn put32(f: &mut [u8], offset: usize, value: u32) {
    put(f, offset, &value.to_le_bytes());
}

const BASE: usize = 0x10;

fn entry(f: &mut [u8], i: usize, sst: u16, imod: u16, lfo: u32, cb: u32) {
    let at = BASE + 0x18 + i * 12;
    put16(f, at, sst);
    put16(f, at + 2, imod);
    put32(f, at + 4, lfo);
    put32(f, at + 8, cb);
}

/// An NB09 blob at file offset 0x10, with a module, a library list, global symbols, line numbers
/// and a subsection of an unknown kind.
fn nb09() -> Vec<u8> {
    let mut f = vec![0u8; BASE + 0x160];
    let b = BASE;

    put(&mut f, b, b"NB09");
    put32(&mut f, b + 4, 0x08);

    #[rustfmt::skip]
    let dir_header = [
        /* 0x0008 */ 16, 0, 12, 0,          // cbDirHeader, cbDirEntry
        /* 0x000c */ 5, 0, 0, 0,            // cDir
        /* 0x0010 */ 0, 0, 0, 0,            // lfoNextDir
        /* 0x0014 */ 0, 0, 0, 0,            // flags
    ];
    put(&mut f, b + 0x08, &dir_header);
    entry(&mut f, 0, 0x120, 1, 0x60, 26);
    entry(&mut f, 1, 0x128, 0xffff, 0x80, 10);
    entry(&mut f, 2, 0x129, 0xffff, 0x90, 30);
    entry(&mut f, 3, 0x127, 1, 0xc0, 0x40);
    entry(&mut f, 4, 0x1ff, 0xffff, 0x150, 4);

    #[rustfmt::skip]
    let module = [
        /* 0x0060 */ 0, 0, 1, 0, 1, 0, b'C', b'V', // overlay, library, cSeg, style
        /* 0x0068 */ 1, 0, 0, 0, 0x10, 0, 0, 0, 0x20, 0, 0, 0,
        /* 0x0074 */ 5, b'm', b'.', b'o', b'b', b'j',
    ];
    put(&mut f, b + 0x60, &module);

    put(&mut f, b + 0x80, b"\x00\x08libc.lib");

    #[rustfmt::skip]
    let globals = [
        /* 0x0090 */ 0, 0, 0, 0, 14, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
        // S_GDATA32_16t
        /* 0x00a0 */ 12, 0, 0x02, 0x02, 0x10, 0, 0, 0, 2, 0, 0x74, 0, 1, b'g',
    ];
    put(&mut f, b + 0x90, &globals);

    #[rustfmt::skip]
    let src_module = [
        /* 0x0000 */ 1, 0, 1, 0,                    // cFile, cSeg
        /* 0x0004 */ 0x14, 0, 0, 0,                 // baseSrcFile
        /* 0x0008 */ 0x10, 0, 0, 0, 0x30, 0, 0, 0,  // start, end
        /* 0x0010 */ 1, 0, 0, 0,                    // seg, pad
        /* 0x0014 */ 1, 0, 0, 0,                    // file: cSeg, pad
        /* 0x0018 */ 0x30, 0, 0, 0,                 // baseSrcLn
        /* 0x001c */ 0x10, 0, 0, 0, 0x30, 0, 0, 0,
        /* 0x0024 */ 3, b'a', b'.', b'c', 0, 0, 0, 0,
        /* 0x002c */ 0, 0, 0, 0,
        /* 0x0030 */ 1, 0, 2, 0,                    // seg, cPair
        /* 0x0034 */ 0x10, 0, 0, 0, 0x18, 0, 0, 0,
        /* 0x003c */ 3, 0, 4, 0,
    ];
    put(&mut f, b + 0xc0, &src_module);

    put(&mut f, b + 0x150, b"\xde\xad\xbe\xef");
    f
}

fn omf(view: &ImageView) -> Omf<'_> {
    match decode(view, BASE, 0x160).unwrap() {
        CodeView::Omf(omf) => omf,
        _ => panic!("expected OMF"),
    }
}

#[test]
fn subsection_directory() {
    let view = ImageView::from_bytes(nb09());
    let omf = omf(&view);
    assert_eq!(omf.signature_str(), "NB09");
    assert!(omf.error.is_none());
    assert_eq!(omf.subsections.len(), 5);
    assert_eq!(omf.subsections[3].kind, SstKind::sstSrcModule);
    assert_eq!(omf.subsections[3].entry.base, Base::SubsectionRelative);
    assert_eq!(omf.module(1).map(|s| s.entry.offset), Some(0x60));
    assert!(omf.module(2).is_none());
}

#[test]
fn subsections() {
    let view = ImageView::from_bytes(nb09());
    let omf = omf(&view);

    match omf.decode_subsection(0).unwrap() {
        SubsectionData::Module(m) => {
            assert_eq!(m.library, 1);
            assert_eq!(&m.style, b"CV");
            assert_eq!(m.segments.len(), 1);
            assert_eq!(m.segments[0].offset.get(), 0x10);
            assert_eq!(m.name, "m.obj");
        }
        _ => panic!("expected sstModule"),
    }

    match omf.decode_subsection(1).unwrap() {
        SubsectionData::Libraries(libs) => assert_eq!(libs, ["", "libc.lib"]),
        _ => panic!("expected sstLibraries"),
    }

    match omf.decode_subsection(2).unwrap() {
        SubsectionData::HashedSymbols { header, symbols } => {
            assert_eq!(header.cb_symbol.get(), 14);
            assert_eq!(symbols.symbols.len(), 1);
            match symbols.symbols[0].parse().unwrap() {
                SymData::Data(d) => assert_eq!(d.name, "g"),
                _ => panic!("expected data"),
            }
        }
        _ => panic!("expected sstGlobalSym"),
    }

    match omf.decode_subsection(3).unwrap() {
        SubsectionData::SrcModule(src) => {
            assert_eq!(
                src.segments,
                [SegmentRange {
                    segment: 1,
                    start: 0x10,
                    end: 0x30
                }]
            );
            let file = src.files[0].as_ref().unwrap();
            assert_eq!(file.name, "a.c");
            let block = file.blocks[0].as_ref().unwrap();
            assert_eq!(block.range.segment, 1);
            assert_eq!(block.lines, [(0x10, 3), (0x18, 4)]);
        }
        _ => panic!("expected sstSrcModule"),
    }

    assert!(matches!(omf.decode_subsection(4), Ok(SubsectionData::Other(b)) if b.len() == 4));
}

#[test]
fn bad_subsection_is_local() {
    let mut f = nb09();
    entry(&mut f, 2, 0x129, 0xffff, 0x90, 0x1000);
    let view = ImageView::from_bytes(f);
    let omf = omf(&view);

    assert!(omf.decode_subsection(0).is_ok());
    assert!(matches!(
        omf.decode_subsection(2),
        Err(LocalError::Overrun { what: "subsection" })
    ));
    assert!(omf.decode_subsection(3).is_ok());
}

#[test]
fn directory_cycle() {
    let mut f = nb09();
    put32(&mut f, BASE + 0x10, 0x08);
    let view = ImageView::from_bytes(f);
    let omf = omf(&view);
    assert_eq!(omf.subsections.len(), 5);
    assert!(matches!(omf.error, Some(LocalError::Invalid { .. })));
}

#[test]
fn nb10_does_not_read_a_directory() {
    let mut f = nb09();
    // Same bytes after the signature, so a directory would be found if one were looked for.
    put(&mut f, BASE, b"NB10");
    put32(&mut f, BASE + 4, 0);
    put32(&mut f, BASE + 8, 0x3000_0000);
    put32(&mut f, BASE + 12, 2);
    put(&mut f, BASE + 16, b"x.pdb\0");
    let view = ImageView::from_bytes(f);

    match decode(&view, BASE, 0x160).unwrap() {
        CodeView::Nb10(nb10) => {
            assert_eq!(nb10.timestamp, 0x3000_0000);
            assert_eq!(nb10.age, 2);
            assert_eq!(nb10.path, "x.pdb");
        }
        _ => panic!("expected NB10"),
    }
}

#[test]
fn rsds() {
    let mut f = vec![0u8; 0x30];
    put(&mut f, 0, b"RSDS");
    put(&mut f, 4, &[0x22; 16]);
    put32(&mut f, 20, 9);
    put(&mut f, 24, b"b.pdb\0");
    let view = ImageView::from_bytes(f);

    match decode(&view, 0, 0x30).unwrap() {
        CodeView::Rsds(r) => {
            assert_eq!(r.age, 9);
            assert_eq!(r.path, "b.pdb");
        }
        _ => panic!("expected RSDS"),
    }
}

#[test]
fn unknown_signature() {
    let view = ImageView::from_bytes(b"XXXXabcd".to_vec());
    assert!(matches!(
        decode(&view, 0, 8),
        Err(LocalError::BadSignature { .. })
    ));
    assert!(matches!(
        decode(&view, 4, 8),
        Err(LocalError::Overrun { .. })
    ));
}
