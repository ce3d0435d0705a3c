use super::*;

fn put(f: &mut [u8], offset: usize, bytes: &[u8]) {
    f[offset..offset + bytes.len()].copy_from_slice(bytes);
}

fn put32(f: &mut [u8], offset: usize, value: u32) {
    put(f, offset, &value.to_le_bytes());
}

fn puti(f: &mut [u8], offset: usize, value: i32) {
    put(f, offset, &value.to_le_bytes());
}

const SEGDIR: usize = 0x60;
const TYPEINFOS: usize = 0x200;
const REFERENCES: usize = 0x2d0;
const GUIDS: usize = 0x2e0;
const NAMES: usize = 0x310;
const STRINGS: usize = 0x370;
const TYPEDESCS: usize = 0x390;
const MEMBERS: usize = 0x400;

fn segment(f: &mut [u8], seg: usize, offset: i32, length: i32) {
    let at = SEGDIR + seg * 16;
    puti(f, at, offset);
    puti(f, at + 4, length);
    puti(f, at + 8, 0);
    puti(f, at + 12, 0x0f);
}

fn name(f: &mut [u8], offset: usize, s: &str) {
    let at = NAMES + offset;
    puti(f, at, -1);
    puti(f, at + 4, -1);
    put32(f, at + 8, 0x3800 | s.len() as u32);
    put(f, at + 12, s.as_bytes());
}

fn string(f: &mut [u8], offset: usize, s: &str) {
    let at = STRINGS + offset;
    put(f, at, &(s.len() as u16).to_le_bytes());
    put(f, at + 2, s.as_bytes());
}

/// Two typeinfos: interface `IFoo` with `HRESULT Bar([in] int* x)`, and coclass `Foo` which
/// implements it.
fn library() -> Vec<u8> {
    let mut f = vec![0u8; 0x440];

    #[rustfmt::skip]
    let header: [i32; 21] = [
        /* 0x0000 */ 0x5446_534d, 0x0001_0002, 0, 0x409,    // magic1, magic2, posguid, lcid
        /* 0x0010 */ 0, 0x101, 0x0002_0001, 0,              // lcid2, varflags, version, flags
        /* 0x0020 */ 2, 0, 0, 0,                            // nrtypeinfos, helpstring, contexts
        /* 0x0030 */ 0, 0, 0, -1,                           // name counts, name, helpfile
        /* 0x0040 */ -1, 0, 0, -1,                          // custom data, res, dispatchpos
        /* 0x0050 */ 0,                                     // nimpinfos
    ];
    for (i, v) in header.iter().enumerate() {
        puti(&mut f, i * 4, *v);
    }
    puti(&mut f, 0x54, 0x0c); // help DLL
    put32(&mut f, 0x58, 0);
    put32(&mut f, 0x5c, 0x64);

    for seg in 0..SEGMENT_COUNT {
        segment(&mut f, seg, -1, 0);
    }
    segment(&mut f, SEG_TYPEINFO, TYPEINFOS as i32, 0xc8);
    segment(&mut f, SEG_REFERENCES, REFERENCES as i32, 0x10);
    segment(&mut f, SEG_GUID, GUIDS as i32, 0x30);
    segment(&mut f, SEG_NAME, NAMES as i32, 0x54);
    segment(&mut f, SEG_STRING, STRINGS as i32, 0x20);
    segment(&mut f, SEG_TYPEDESC, TYPEDESCS as i32, 8);

    #[rustfmt::skip]
    let ti0: [i32; 11] = [
        /* 0x0000 */ 3, MEMBERS as i32, 0, 0, 0, 0,        // typekind, memoffset
        /* 0x0018 */ 1, 0, 0, 0, 0,                         // cElement
    ];
    for (i, v) in ti0.iter().enumerate() {
        puti(&mut f, TYPEINFOS + i * 4, *v);
    }
    #[rustfmt::skip]
    let ti0_tail: [i32; 8] = [
        /* 0x002c */ 0x18, 0, 0x14, 0, -1, 0, 0, -1,        // posguid, flags, name, version, doc
    ];
    for (i, v) in ti0_tail.iter().enumerate() {
        puti(&mut f, TYPEINFOS + 0x2c + i * 4, *v);
    }
    put(&mut f, TYPEINFOS + 0x4c, &[0, 0, 0x20, 0]); // cImplTypes, cbSizeVft
    puti(&mut f, TYPEINFOS + 0x54, -1); // datatype1

    let ti1 = TYPEINFOS + 0x64;
    puti(&mut f, ti1, 5);
    puti(&mut f, ti1 + 4, -1);
    puti(&mut f, ti1 + 0x2c, -1); // posguid
    puti(&mut f, ti1 + 0x34, 0x44); // name
    puti(&mut f, ti1 + 0x3c, 0); // doc
    puti(&mut f, ti1 + 0x48, -1);
    put(&mut f, ti1 + 0x4c, &[1, 0, 0, 0]);
    puti(&mut f, ti1 + 0x54, 0); // first reference record

    #[rustfmt::skip]
    let reference: [i32; 4] = [
        /* 0x0000 */ 0, 1, -1, -1,                          // reftype, flags, custdata, next
    ];
    for (i, v) in reference.iter().enumerate() {
        puti(&mut f, REFERENCES + i * 4, *v);
    }

    put(&mut f, GUIDS, &[0x11; 16]);
    puti(&mut f, GUIDS + 16, -1);
    puti(&mut f, GUIDS + 20, -1);
    put(&mut f, GUIDS + 0x18, &[0x22; 16]);

    name(&mut f, 0x00, "TestLib");
    name(&mut f, 0x14, "IFoo");
    name(&mut f, 0x24, "Bar");
    name(&mut f, 0x34, "x");
    name(&mut f, 0x44, "Foo");

    string(&mut f, 0x00, "Test docs");
    string(&mut f, 0x0c, "h.dll");

    // VT_PTR to an inline VT_I4
    put(&mut f, TYPEDESCS, &[26, 0, 0, 0, 3, 0, 3, 0x80]);

    #[rustfmt::skip]
    let members: [u32; 13] = [
        /* 0x0000 */ 0x24,                                  // infolen
        /* 0x0004 */ 0x24, 0x8019_0019, 0,                  // Info, DataType (HRESULT), Flags
        /* 0x0010 */ 0x0000_001c,                           // VtableOffset, funcdescsize
        /* 0x0014 */ 0x408,                                 // FKCCIC: method, stdcall
        /* 0x0018 */ 1,                                     // nrargs, nroargs
        /* 0x001c */ 0, 0x34, 1,                            // param: DataType, oName, Flags
        /* 0x0028 */ 0x6000_0000, 0x24, 0,                  // memids, names, offsets
    ];
    for (i, v) in members.iter().enumerate() {
        put32(&mut f, MEMBERS + i * 4, *v);
    }

    f
}

#[test]
fn library_attributes() {
    let view = ImageView::from_bytes(library());
    let lib = decode(&view).unwrap();

    assert_eq!(lib.name.as_deref(), Ok("TestLib"));
    assert_eq!(lib.doc.as_ref().unwrap().as_deref(), Ok("Test docs"));
    assert_eq!(lib.help_dll.as_ref().unwrap().as_deref(), Ok("h.dll"));
    assert!(lib.help_file.is_none());
    assert_eq!(lib.version(), (1, 2));
    assert_eq!(lib.syskind(), 1);
    assert_eq!(lib.typeinfo_offsets, [0, 0x64]);
    assert_eq!(lib.segments.len(), SEGMENT_COUNT);
    assert_eq!(lib.segments[SEG_NAME].offset, NAMES as u32);
    assert!(lib.guid.is_some());
    assert_eq!(lib.import_files, Ok(vec![]));
    assert_eq!(lib.typeinfos.len(), 2);
}

#[test]
fn interface_functions() {
    let view = ImageView::from_bytes(library());
    let lib = decode(&view).unwrap();
    let ti = lib.typeinfos[0].as_ref().unwrap();

    assert_eq!(ti.kind, TypeKind::TKIND_INTERFACE);
    assert_eq!(ti.name.as_deref(), Ok("IFoo"));
    assert!(ti.guid.is_some());
    assert_ne!(ti.guid, lib.guid);
    assert_eq!(ti.function_count, 1);
    assert_eq!(ti.element_offset, MEMBERS as u32);

    let members = ti.members.as_ref().unwrap();
    let f = members.functions[0].as_ref().unwrap();
    assert_eq!(f.name.as_deref(), Ok("Bar"));
    assert_eq!(f.memid, 0x6000_0000);
    assert_eq!(f.return_type, TypeDesc::Base(vt::VT_HRESULT));
    assert_eq!(f.invoke_kind, 1);
    assert_eq!(f.call_conv, 4);
    assert_eq!(f.vtable_offset, 0x1c);
    assert_eq!(f.params.len(), 1);
    assert_eq!(f.params[0].name.as_ref().unwrap().as_deref(), Ok("x"));
    assert_eq!(f.params[0].type_.to_string(), "VT_I4*");
    assert_eq!(f.params[0].flags, 1);
}

#[test]
fn coclass_implements_interface() {
    let view = ImageView::from_bytes(library());
    let lib = decode(&view).unwrap();
    let ti = lib.typeinfos[1].as_ref().unwrap();

    assert_eq!(ti.kind, TypeKind::TKIND_COCLASS);
    assert_eq!(ti.name.as_deref(), Ok("Foo"));
    assert!(ti.guid.is_none());
    let impls = &ti.members.as_ref().unwrap().impls;
    assert_eq!(impls.len(), 1);
    assert_eq!(impls[0].type_.to_string(), "IFoo");
    assert_eq!(impls[0].flags, 1);
}

#[test]
fn implemented_interface_cycle() {
    let mut f = library();
    put(&mut f, TYPEINFOS + 0x64 + 0x4c, &[2, 0]);
    puti(&mut f, REFERENCES + 12, 0);
    let view = ImageView::from_bytes(f);
    let lib = decode(&view).unwrap();

    let ti = lib.typeinfos[1].as_ref().unwrap();
    assert!(matches!(ti.members, Err(LocalError::Invalid { .. })));
    assert!(lib.typeinfos[0].as_ref().unwrap().members.is_ok());
}

#[test]
fn oversized_function_record() {
    let mut f = library();
    put32(&mut f, MEMBERS + 4, 0x100);
    let view = ImageView::from_bytes(f);
    let lib = decode(&view).unwrap();

    let ti = lib.typeinfos[0].as_ref().unwrap();
    let members = ti.members.as_ref().unwrap();
    assert!(matches!(
        members.functions[0],
        Err(LocalError::Overrun { .. })
    ));
    assert_eq!(ti.name.as_deref(), Ok("IFoo"));
}

#[test]
fn bad_segment_directory() {
    let mut f = library();
    puti(&mut f, SEGDIR + 12, 0);
    let view = ImageView::from_bytes(f);
    assert!(decode(&view).is_err());
}

#[test]
fn truncated_header() {
    let view = ImageView::from_bytes(library()[..0x40].to_vec());
    assert!(decode(&view).is_err());
}
