use super::*;
use crate::codeview::CodeView;
use crate::view::ImageView;

// Layout of the synthetic image:
//
//  0x0000  DOS header, e_lfanew = 0x80
//  0x0040  Wine builtin signature
//  0x0080  PE signature, file header, optional header (PE32), data directories
//  0x0178  section table: one section, RVA 0x1000..0x1400 at file offset 0x200
//  0x0200  section data
const SECTION_RVA: u32 = 0x1000;
const SECTION_FILE: u32 = 0x200;
const FILE_SIZE: usize = 0x600;

fn put(bytes: &mut [u8], offset: usize, data: &[u8]) {
    bytes[offset..offset + data.len()].copy_from_slice(data);
}

fn put_u16(bytes: &mut [u8], offset: usize, value: u16) {
    put(bytes, offset, &value.to_le_bytes());
}

fn put_u32(bytes: &mut [u8], offset: usize, value: u32) {
    put(bytes, offset, &value.to_le_bytes());
}

fn at_rva(rva: u32) -> usize {
    (rva - SECTION_RVA + SECTION_FILE) as usize
}

fn set_directory(bytes: &mut [u8], slot: usize, rva: u32, size: u32) {
    let at = 0x98 + 96 + slot * 8;
    put_u32(bytes, at, rva);
    put_u32(bytes, at + 4, size);
}

fn headers() -> Vec<u8> {
    let mut b = vec![0u8; FILE_SIZE];
    put(&mut b, 0, b"MZ");
    put_u32(&mut b, 0x3c, 0x80);
    put(&mut b, 0x40, b"Wine builtin DLL\0");
    put(&mut b, 0x80, b"PE\0\0");

    // file header
    put_u16(&mut b, 0x84, 0x14c);
    put_u16(&mut b, 0x86, 1);
    put_u32(&mut b, 0x88, 0x1234_5678);
    put_u16(&mut b, 0x94, 0xe0);
    put_u16(&mut b, 0x96, 0x2102);

    // optional header
    put_u16(&mut b, 0x98, IMAGE_NT_OPTIONAL_HDR32_MAGIC);
    put_u32(&mut b, 0x98 + 28, 0x0040_0000);
    put_u32(&mut b, 0x98 + 92, 16);

    // section table
    put(&mut b, 0x178, b".rdata\0\0");
    put_u32(&mut b, 0x178 + 8, 0x400);
    put_u32(&mut b, 0x178 + 12, SECTION_RVA);
    put_u32(&mut b, 0x178 + 16, 0x400);
    put_u32(&mut b, 0x178 + 20, SECTION_FILE);
    b
}

fn image_with_directories() -> Vec<u8> {
    let mut b = headers();

    // Exports at 0x1000
    set_directory(&mut b, IMAGE_DIRECTORY_ENTRY_EXPORT, 0x1000, 0x100);
    let e = at_rva(0x1000);
    put_u32(&mut b, e + 12, 0x1080); // name
    put_u32(&mut b, e + 16, 1); // base
    put_u32(&mut b, e + 20, 3); // number_of_functions
    put_u32(&mut b, e + 24, 2); // number_of_names
    put_u32(&mut b, e + 28, 0x1028);
    put_u32(&mut b, e + 32, 0x1034);
    put_u32(&mut b, e + 36, 0x103c);
    put_u32(&mut b, at_rva(0x1028), 0x2000);
    put_u32(&mut b, at_rva(0x102c), 0);
    put_u32(&mut b, at_rva(0x1030), 0x1090);
    put_u32(&mut b, at_rva(0x1034), 0x10a0);
    put_u32(&mut b, at_rva(0x1038), 0x10b0);
    put_u16(&mut b, at_rva(0x103c), 0);
    put_u16(&mut b, at_rva(0x103e), 2);
    put(&mut b, at_rva(0x1080), b"test.dll\0");
    put(&mut b, at_rva(0x1090), b"other.Func\0");
    put(&mut b, at_rva(0x10a0), b"Alpha\0");
    put(&mut b, at_rva(0x10b0), b"Fwd\0");

    // Imports at 0x1100
    set_directory(&mut b, IMAGE_DIRECTORY_ENTRY_IMPORT, 0x1100, 40);
    let i = at_rva(0x1100);
    put_u32(&mut b, i, 0x1140);
    put_u32(&mut b, i + 12, 0x1160);
    put_u32(&mut b, i + 16, 0x1150);
    put_u32(&mut b, at_rva(0x1140), 0x1170);
    put_u32(&mut b, at_rva(0x1144), 0x8000_0005);
    put(&mut b, at_rva(0x1160), b"user32.dll\0");
    put_u16(&mut b, at_rva(0x1170), 7);
    put(&mut b, at_rva(0x1172), b"MessageBoxA\0");

    // TLS at 0x1200, callbacks at VA 0x401220
    set_directory(&mut b, IMAGE_DIRECTORY_ENTRY_TLS, 0x1200, 24);
    put_u32(&mut b, at_rva(0x1200) + 12, 0x0040_1220);
    put_u32(&mut b, at_rva(0x1220), 0x0040_1000);

    // Relocations at 0x1240
    set_directory(&mut b, IMAGE_DIRECTORY_ENTRY_BASERELOC, 0x1240, 12);
    put_u32(&mut b, at_rva(0x1240), 0x1000);
    put_u32(&mut b, at_rva(0x1244), 12);
    put_u16(&mut b, at_rva(0x1248), 0x3010);

    // Debug directory at 0x1260, pointing at an NB10 record at file offset 0x580
    set_directory(&mut b, IMAGE_DIRECTORY_ENTRY_DEBUG, 0x1260, 28);
    let d = at_rva(0x1260);
    put_u32(&mut b, d + 12, IMAGE_DEBUG_TYPE_CODEVIEW);
    put_u32(&mut b, d + 16, 0x20);
    put_u32(&mut b, d + 24, 0x580);
    put(&mut b, 0x580, b"NB10");
    put_u32(&mut b, 0x588, 0x3f00_0001);
    put_u32(&mut b, 0x58c, 2);
    put(&mut b, 0x590, b"a.pdb\0");

    // Resources at 0x1300: ICON / "AB" / 0x409
    set_directory(&mut b, IMAGE_DIRECTORY_ENTRY_RESOURCE, 0x1300, 0x100);
    let r = at_rva(0x1300);
    put_u16(&mut b, r + 14, 1);
    put_u32(&mut b, r + 16, 3);
    put_u32(&mut b, r + 20, 0x8000_0018);
    put_u16(&mut b, r + 0x18 + 12, 1);
    put_u32(&mut b, r + 0x18 + 16, 0x8000_0060);
    put_u32(&mut b, r + 0x18 + 20, 0x8000_0030);
    put_u16(&mut b, r + 0x30 + 14, 1);
    put_u32(&mut b, r + 0x30 + 16, 0x409);
    put_u32(&mut b, r + 0x30 + 20, 0x48);
    put_u32(&mut b, r + 0x48, 0x2000);
    put_u32(&mut b, r + 0x48 + 4, 0x10);
    put(&mut b, r + 0x60, &[2, 0, b'A', 0, b'B', 0]);

    b
}

#[test]
fn headers_only() {
    let view = ImageView::from_bytes(headers());
    let pe = decode(&view).unwrap();
    assert_eq!(pe.nt_offset, 0x80);
    assert_eq!(pe.wine, Some(WineSignature::Builtin));
    assert_eq!(pe.machine(), IMAGE_FILE_MACHINE::IMAGE_FILE_MACHINE_I386);
    assert_eq!(pe.optional.image_base(), 0x40_0000);
    assert!(!pe.optional.is_64bit());
    assert_eq!(pe.data_directories.len(), 16);
    assert_eq!(pe.sections.len(), 1);
    assert_eq!(pe.sections[0].name(), ".rdata");
    assert!(pe.exports.is_none());
    assert!(pe.imports.is_none());
}

#[test]
fn missing_pe_signature_is_structural() {
    let mut b = headers();
    put(&mut b, 0x80, b"PX\0\0");
    assert!(decode(&ImageView::from_bytes(b)).is_err());
}

#[test]
fn truncated_section_table_is_structural() {
    let mut b = headers();
    put_u16(&mut b, 0x86, 200);
    assert!(decode(&ImageView::from_bytes(b)).is_err());
}

#[test]
fn exports() {
    let view = ImageView::from_bytes(image_with_directories());
    let pe = decode(&view).unwrap();
    let exports = pe.exports.unwrap().unwrap();
    assert_eq!(exports.dll_name.unwrap(), "test.dll");
    assert_eq!(exports.entries.len(), 2);

    let e0 = &exports.entries[0];
    assert_eq!(e0.ordinal, 1);
    assert_eq!(e0.rva, 0x2000);
    assert_eq!(*e0.name.as_ref().unwrap().as_ref().unwrap(), "Alpha");
    assert!(e0.forwarder.is_none());

    let e1 = &exports.entries[1];
    assert_eq!(e1.ordinal, 3);
    assert_eq!(*e1.name.as_ref().unwrap().as_ref().unwrap(), "Fwd");
    assert_eq!(*e1.forwarder.as_ref().unwrap().as_ref().unwrap(), "other.Func");
}

#[test]
fn imports() {
    let view = ImageView::from_bytes(image_with_directories());
    let pe = decode(&view).unwrap();
    let dlls = pe.imports.unwrap().unwrap();
    assert_eq!(dlls.len(), 1);
    assert_eq!(*dlls[0].name.as_ref().unwrap(), "user32.dll");
    let thunks = dlls[0].thunks.as_ref().unwrap();
    assert_eq!(thunks.len(), 2);
    match &thunks[0] {
        ImportThunk::Name { hint, name } => {
            assert_eq!(*hint, 7);
            assert_eq!(*name.as_ref().unwrap(), "MessageBoxA");
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(thunks[1], ImportThunk::Ordinal(5));
}

#[test]
fn tls_and_relocs() {
    let view = ImageView::from_bytes(image_with_directories());
    let pe = decode(&view).unwrap();

    let tls = pe.tls.unwrap().unwrap();
    assert_eq!(tls.address_of_callbacks, 0x40_1220);
    assert_eq!(tls.callbacks.unwrap(), vec![0x40_1000]);

    let relocs = pe.relocs.unwrap().unwrap();
    assert_eq!(relocs.len(), 1);
    assert_eq!(relocs[0].page, 0x1000);
    assert_eq!(relocs[0].entries, vec![(3, 0x10), (0, 0)]);
}

#[test]
fn debug_directory_nb10() {
    let view = ImageView::from_bytes(image_with_directories());
    let pe = decode(&view).unwrap();
    let debug = pe.debug.unwrap().unwrap();
    assert_eq!(debug.len(), 1);
    assert_eq!(debug[0].entry.base, Base::FileOffset);
    assert_eq!(debug[0].entry.offset, 0x580);
    match debug[0].info.as_ref().unwrap() {
        DebugInfo::CodeView(CodeView::Nb10(nb10)) => {
            assert_eq!(nb10.timestamp, 0x3f00_0001);
            assert_eq!(nb10.age, 2);
            assert_eq!(nb10.path, "a.pdb");
        }
        _ => panic!("expected NB10"),
    }
}

#[test]
fn resources() {
    let view = ImageView::from_bytes(image_with_directories());
    let pe = decode(&view).unwrap();
    let root = pe.resources.unwrap().unwrap();
    assert_eq!(root.entries.len(), 1);
    let ty = &root.entries[0];
    assert_eq!(ty.id.as_ref().unwrap().type_name(), "ICON");

    let ResourceNode::Directory(names) = ty.node.as_ref().unwrap() else {
        panic!("expected a directory");
    };
    assert_eq!(
        names.entries[0].id.as_ref().unwrap(),
        &ResourceId::Name("AB".to_string())
    );

    let ResourceNode::Directory(langs) = names.entries[0].node.as_ref().unwrap() else {
        panic!("expected a directory");
    };
    assert_eq!(langs.entries[0].id.as_ref().unwrap(), &ResourceId::Id(0x409));
    let ResourceNode::Data(data) = langs.entries[0].node.as_ref().unwrap() else {
        panic!("expected data");
    };
    assert_eq!(data.rva, 0x2000);
    assert_eq!(data.size, 0x10);
}

#[test]
fn broken_directory_is_isolated() {
    let mut b = image_with_directories();
    // Point the export directory outside every section.
    set_directory(&mut b, IMAGE_DIRECTORY_ENTRY_EXPORT, 0x9000, 0x100);
    let view = ImageView::from_bytes(b);
    let pe = decode(&view).unwrap();
    assert!(pe.exports.unwrap().is_err());
    assert_eq!(pe.imports.unwrap().unwrap().len(), 1);
}

#[test]
fn decode_is_idempotent() {
    let view = ImageView::from_bytes(image_with_directories());
    let a = decode(&view).unwrap();
    let b = decode(&view).unwrap();
    assert_eq!(a.data_directories, b.data_directories);
    assert_eq!(
        a.relocs.unwrap().unwrap(),
        b.relocs.unwrap().unwrap()
    );
}

fn set_machine(bytes: &mut [u8], machine: u16) {
    put_u16(bytes, 0x84, machine);
}

#[test]
fn load_config_with_safe_seh() {
    let mut b = headers();
    set_directory(&mut b, IMAGE_DIRECTORY_ENTRY_LOAD_CONFIG, 0x1000, 0x48);
    let lc = at_rva(0x1000);
    put_u32(&mut b, lc, 0x48);
    put_u32(&mut b, lc + 60, 0x0040_3000); // SecurityCookie
    put_u32(&mut b, lc + 64, 0x0040_1100); // SEHandlerTable
    put_u32(&mut b, lc + 68, 2); // SEHandlerCount
    put_u32(&mut b, at_rva(0x1100), 0x1010);
    put_u32(&mut b, at_rva(0x1104), 0x1020);

    let view = ImageView::from_bytes(b);
    let pe = decode(&view).unwrap();
    let config = pe.load_config.unwrap().unwrap();
    assert_eq!(config.fields.len(), 20);
    assert_eq!(config.fields[12].name, "ProcessHeapFlags");
    assert_eq!(config.get("Size"), Some(0x48));
    assert_eq!(config.get("SecurityCookie"), Some(0x40_3000));
    assert_eq!(config.get("GuardFlags"), None);
    assert_eq!(config.se_handlers.unwrap().unwrap(), vec![0x1010, 0x1020]);
}

#[test]
fn load_config_stops_at_declared_size() {
    let mut b = headers();
    set_directory(&mut b, IMAGE_DIRECTORY_ENTRY_LOAD_CONFIG, 0x1000, 0x48);
    let lc = at_rva(0x1000);
    put_u32(&mut b, lc, 0x40);
    put_u32(&mut b, lc + 64, 0x0040_1100);
    put_u32(&mut b, lc + 68, 2);

    let view = ImageView::from_bytes(b);
    let config = decode(&view).unwrap().load_config.unwrap().unwrap();
    assert_eq!(config.fields.len(), 18);
    assert_eq!(config.fields.last().unwrap().name, "SecurityCookie");
    assert!(config.se_handlers.is_none());
}

#[test]
fn load_config_handler_count_too_large() {
    let mut b = headers();
    set_directory(&mut b, IMAGE_DIRECTORY_ENTRY_LOAD_CONFIG, 0x1000, 0x48);
    let lc = at_rva(0x1000);
    put_u32(&mut b, lc, 0x48);
    put_u32(&mut b, lc + 64, 0x0040_1100);
    put_u32(&mut b, lc + 68, 0x4000_0000);

    let view = ImageView::from_bytes(b);
    let config = decode(&view).unwrap().load_config.unwrap().unwrap();
    assert_eq!(config.get("SEHandlerCount"), Some(0x4000_0000));
    assert!(config.se_handlers.unwrap().is_err());
}

#[test]
fn x64_unwind_info() {
    use exceptions::{UnwindOp, X64Unwind};

    let mut b = headers();
    // Only the machine selects the layout of the exception directory.
    set_machine(&mut b, 0x8664);
    set_directory(&mut b, IMAGE_DIRECTORY_ENTRY_EXCEPTION, 0x1000, 48);
    let pdata = at_rva(0x1000);
    for (i, (begin, end, unwind)) in [
        (0x1100, 0x1180, 0x1200),
        (0x1180, 0x11a0, 0x1001),
        (0x11a0, 0x11c0, 0x1240),
        (0x11c0, 0x11d0, 0x1260),
    ]
    .into_iter()
    .enumerate()
    {
        put_u32(&mut b, pdata + i * 12, begin);
        put_u32(&mut b, pdata + i * 12 + 4, end);
        put_u32(&mut b, pdata + i * 12 + 8, unwind);
    }

    // Version 1 with an exception handler and rbp as the frame register.
    let u = at_rva(0x1200);
    put(&mut b, u, &[0x09, 0x0a, 4, 0x35]);
    put_u16(&mut b, u + 4, 0x030a);
    put_u16(&mut b, u + 6, 0x4206);
    put_u16(&mut b, u + 8, 0x3002);
    put_u16(&mut b, u + 10, 0x5001);
    put_u32(&mut b, u + 12, 0x1300);

    // Chained, with a large allocation.
    let u = at_rva(0x1240);
    put(&mut b, u, &[0x21, 0x08, 2, 0]);
    put_u16(&mut b, u + 4, 0x0108);
    put_u16(&mut b, u + 6, 0x0200);
    put_u32(&mut b, u + 8, 0x1100);
    put_u32(&mut b, u + 12, 0x1180);
    put_u32(&mut b, u + 16, 0x1200);

    // Unknown version.
    put(&mut b, at_rva(0x1260), &[0x03, 0, 0, 0]);

    let view = ImageView::from_bytes(b);
    let pe = decode(&view).unwrap();
    let Exceptions::X64(functions) = pe.exceptions.unwrap().unwrap() else {
        panic!("expected x64 functions");
    };
    assert_eq!(functions.len(), 4);

    let X64Unwind::Info(info) = functions[0].unwind.as_ref().unwrap() else {
        panic!("expected unwind info");
    };
    assert_eq!(info.version, 1);
    assert_eq!(info.flags, UNW_FLAG_EHANDLER);
    assert_eq!(info.prolog_size, 0x0a);
    assert_eq!(info.frame_register, 5);
    assert_eq!(info.frame_offset, 0x30);
    assert_eq!(
        info.ops,
        vec![
            UnwindOp::SetFpReg { offset: 0x0a, reg: 5, frame_offset: 0x30 },
            UnwindOp::Alloc { offset: 6, size: 0x28 },
            UnwindOp::PushNonVol { offset: 2, reg: 3 },
            UnwindOp::PushNonVol { offset: 1, reg: 5 },
        ]
    );
    assert_eq!(info.ops[0].to_string(), "lea 0x30(%rsp),%rbp");
    assert_eq!(info.ops[1].to_string(), "sub $0x28,%rsp");
    assert_eq!(info.ops[2].to_string(), "push %rbx");
    let handler = info.handler.unwrap();
    assert_eq!((handler.rva, handler.data_rva), (0x1300, 0x1210));

    match functions[1].unwind.as_ref().unwrap() {
        X64Unwind::Indirect { begin, end } => assert_eq!((*begin, *end), (0x1100, 0x1180)),
        X64Unwind::Info(_) => panic!("expected an indirect entry"),
    }

    let X64Unwind::Info(chained) = functions[2].unwind.as_ref().unwrap() else {
        panic!("expected unwind info");
    };
    assert_eq!(chained.ops, vec![UnwindOp::Alloc { offset: 8, size: 0x1000 }]);
    assert_eq!(chained.chained, Some((0x1100, 0x1180)));
    assert!(chained.handler.is_none());

    assert!(functions[3].unwind.is_err());
}

#[test]
fn x64_version_2_epilogs() {
    use exceptions::X64Unwind;

    let mut b = headers();
    set_machine(&mut b, 0x8664);
    set_directory(&mut b, IMAGE_DIRECTORY_ENTRY_EXCEPTION, 0x1000, 12);
    put_u32(&mut b, at_rva(0x1000), 0x1100);
    put_u32(&mut b, at_rva(0x1004), 0x1180);
    put_u32(&mut b, at_rva(0x1008), 0x1200);

    // Two epilogs of 5 bytes: one at the end of the function, one 0x20 bytes before it.
    let u = at_rva(0x1200);
    put(&mut b, u, &[0x02, 0x04, 3, 0]);
    put_u16(&mut b, u + 4, 0x1605);
    put_u16(&mut b, u + 6, 0x0620);
    put_u16(&mut b, u + 8, 0x3004);

    let view = ImageView::from_bytes(b);
    let Exceptions::X64(functions) = decode(&view).unwrap().exceptions.unwrap().unwrap() else {
        panic!("expected x64 functions");
    };
    let X64Unwind::Info(info) = functions[0].unwind.as_ref().unwrap() else {
        panic!("expected unwind info");
    };
    let epilogs = info.epilogs.as_ref().unwrap();
    assert_eq!(epilogs.size, 5);
    assert_eq!(epilogs.ranges, vec![(0x117b, 0x1180), (0x1160, 0x1165)]);
    // Epilog descriptors are not operations.
    assert_eq!(info.ops.len(), 1);
    assert_eq!(info.ops[0].to_string(), "push %rbx");
}

#[test]
fn arm64_unwind_data() {
    use exceptions::ArmUnwind;

    let mut b = headers();
    set_machine(&mut b, 0xaa64);
    set_directory(&mut b, IMAGE_DIRECTORY_ENTRY_EXCEPTION, 0x1000, 24);
    let pdata = at_rva(0x1000);
    put_u32(&mut b, pdata, 0x1100);
    put_u32(&mut b, pdata + 4, 0x0162_0041);
    put_u32(&mut b, pdata + 8, 0x1200);
    put_u32(&mut b, pdata + 12, 0x1300);
    put_u32(&mut b, pdata + 16, 0x1280);
    put_u32(&mut b, pdata + 20, 0x1343);

    let x = at_rva(0x1300);
    put_u32(&mut b, x, 0x0850_0020);
    put_u32(&mut b, x + 4, 0x0040_001c);
    put(&mut b, x + 8, &[0xe1, 0xc8, 0x01, 0xe4]);
    put_u32(&mut b, x + 12, 0x1380);
    put_u32(&mut b, at_rva(0x1340), 0x1100);

    let view = ImageView::from_bytes(b);
    let Exceptions::Arm64(functions) = decode(&view).unwrap().exceptions.unwrap().unwrap() else {
        panic!("expected ARM64 functions");
    };
    assert_eq!(functions.len(), 3);

    match functions[0].unwind.as_ref().unwrap() {
        ArmUnwind::PackedArm64 {
            flag,
            function_length,
            reg_i,
            cr,
            frame_size,
            ..
        } => {
            assert_eq!(*flag, 1);
            assert_eq!(*function_length, 0x40);
            assert_eq!(*reg_i, 2);
            assert_eq!(*cr, 3);
            assert_eq!(*frame_size, 32);
        }
        _ => panic!("expected packed unwind data"),
    }

    let ArmUnwind::XData(xdata) = functions[1].unwind.as_ref().unwrap() else {
        panic!("expected xdata");
    };
    assert_eq!(xdata.rva, 0x1300);
    assert_eq!(xdata.function_length, 0x80);
    assert!(xdata.x);
    assert!(!xdata.e);
    assert_eq!(xdata.epilogs.len(), 1);
    assert_eq!(xdata.epilogs[0].start, 0x1270);
    assert_eq!(xdata.epilogs[0].index, 1);
    assert_eq!(
        xdata.codes,
        vec![(0, vec![0xe1]), (1, vec![0xc8, 0x01]), (3, vec![0xe4])]
    );
    let handler = xdata.handler.unwrap();
    assert_eq!((handler.rva, handler.data_rva), (0x1380, 0x1310));

    match functions[2].unwind.as_ref().unwrap() {
        ArmUnwind::Forwarded { parent } => assert_eq!(*parent.as_ref().unwrap(), 0x1100),
        _ => panic!("expected a forwarded entry"),
    }
}

#[test]
fn other_machines_are_not_decoded() {
    let mut b = headers();
    set_directory(&mut b, IMAGE_DIRECTORY_ENTRY_EXCEPTION, 0x1000, 12);
    let view = ImageView::from_bytes(b);
    match decode(&view).unwrap().exceptions.unwrap().unwrap() {
        Exceptions::Unsupported(machine) => {
            assert_eq!(machine, IMAGE_FILE_MACHINE::IMAGE_FILE_MACHINE_I386)
        }
        _ => panic!("expected an unsupported machine"),
    }
}

fn clr_image() -> Vec<u8> {
    let mut b = headers();
    set_directory(&mut b, IMAGE_DIRECTORY_ENTRY_COM_DESCRIPTOR, 0x1000, 72);
    let h = at_rva(0x1000);
    put_u32(&mut b, h, 72);
    put_u16(&mut b, h + 4, 2);
    put_u16(&mut b, h + 6, 5);
    put_u32(&mut b, h + 8, 0x1100);
    put_u32(&mut b, h + 12, 0x40);
    put_u32(&mut b, h + 16, 0x9);
    put_u32(&mut b, h + 20, 0x0600_0001);

    let m = at_rva(0x1100);
    put(&mut b, m, b"BSJB");
    put_u16(&mut b, m + 4, 1);
    put_u16(&mut b, m + 6, 1);
    put_u32(&mut b, m + 12, 12);
    put(&mut b, m + 16, b"v4.0.30319\0\0");
    put_u16(&mut b, m + 30, 2);
    put_u32(&mut b, m + 32, 0x6c);
    put_u32(&mut b, m + 36, 0x100);
    put(&mut b, m + 40, b"#~\0\0");
    put_u32(&mut b, m + 44, 0x16c);
    put_u32(&mut b, m + 48, 0x20);
    put(&mut b, m + 52, b"#Strings\0");
    b
}

#[test]
fn clr_header_and_metadata_root() {
    let view = ImageView::from_bytes(clr_image());
    let pe = decode(&view).unwrap();
    let clr = pe.clr.unwrap().unwrap();
    assert_eq!(clr.header.cb.get(), 72);
    let flags = ComImageFlags::from_bits_retain(clr.header.flags.get());
    let names: Vec<&str> = flags.iter_names().map(|(name, _)| name).collect();
    assert_eq!(names, ["ILONLY", "STRONGNAMESIGNED"]);
    assert_eq!(clr.header.entry_point_token.get(), 0x0600_0001);

    let root = clr.metadata.unwrap().unwrap();
    assert_eq!(root.version, (1, 1));
    assert_eq!(root.runtime, "v4.0.30319");
    let names: Vec<String> = root.streams.iter().map(|s| s.name.to_string()).collect();
    assert_eq!(names, ["#~", "#Strings"]);
    assert_eq!((root.streams[1].offset, root.streams[1].size), (0x16c, 0x20));
}

#[test]
fn clr_metadata_signature_is_checked() {
    let mut b = clr_image();
    put(&mut b, at_rva(0x1100), b"BSJX");
    let view = ImageView::from_bytes(b);
    let clr = decode(&view).unwrap().clr.unwrap().unwrap();
    assert_eq!(clr.header.major_runtime_version.get(), 2);
    assert_eq!(
        clr.metadata.unwrap().err(),
        Some(LocalError::bad_signature("BSJB"))
    );
}

/// Builds a resource tree at RVA 0x1000 with one `type / name / 0x409` path per leaf.
fn put_resources(b: &mut [u8], leaves: &[(u16, u16, u32, u32)]) {
    set_directory(b, IMAGE_DIRECTORY_ENTRY_RESOURCE, 0x1000, 0x100);
    let base = at_rva(0x1000);
    put_u16(b, base + 14, leaves.len() as u16);
    let mut next = 16 + 8 * leaves.len();
    for (i, &(ty, name, rva, size)) in leaves.iter().enumerate() {
        let names = next;
        let langs = names + 24;
        let data = langs + 24;
        next = data + 16;
        put_u32(b, base + 16 + i * 8, ty as u32);
        put_u32(b, base + 20 + i * 8, 0x8000_0000 | names as u32);
        put_u16(b, base + names + 14, 1);
        put_u32(b, base + names + 16, name as u32);
        put_u32(b, base + names + 20, 0x8000_0000 | langs as u32);
        put_u16(b, base + langs + 14, 1);
        put_u32(b, base + langs + 16, 0x409);
        put_u32(b, base + langs + 20, data as u32);
        put_u32(b, base + data, rva);
        put_u32(b, base + data + 4, size);
    }
}

fn utf16(s: &str) -> Vec<u8> {
    s.encode_utf16().flat_map(|u| u.to_le_bytes()).collect()
}

fn pad4(v: &mut Vec<u8>) {
    while v.len() % 4 != 0 {
        v.push(0);
    }
}

/// A `VS_VERSIONINFO` node. Text values are given with their terminating NUL.
fn version_node(key: &str, value: &[u8], text: bool, children: &[Vec<u8>]) -> Vec<u8> {
    let mut n = vec![0u8; 6];
    n.extend(utf16(key));
    n.extend([0, 0]);
    pad4(&mut n);
    n.extend_from_slice(value);
    for child in children.iter() {
        pad4(&mut n);
        n.extend_from_slice(child);
    }
    let val_len = if text { value.len() / 2 } else { value.len() };
    let len = n.len();
    put_u16(&mut n, 0, len as u16);
    put_u16(&mut n, 2, val_len as u16);
    put_u16(&mut n, 4, text as u16);
    n
}

fn version_resource() -> Vec<u8> {
    let mut fixed = vec![0u8; 52];
    for (i, v) in [
        VS_FFI_SIGNATURE,
        0x0001_0000,
        0x0001_0002,
        0x0003_0004,
        0x0001_0002,
        0x0003_0004,
        0x3f,
        0,
        0x0004_0004,
        1,
    ]
    .into_iter()
    .enumerate()
    {
        put_u32(&mut fixed, i * 4, v);
    }

    let company = version_node("CompanyName", &utf16("Wine\0"), true, &[]);
    let lang = version_node("040904b0", &[], true, &[company]);
    let strings = version_node("StringFileInfo", &[], true, &[lang]);
    let translation = version_node("Translation", &[0x09, 0x04, 0xb0, 0x04], false, &[]);
    let vars = version_node("VarFileInfo", &[], true, &[translation]);
    version_node("VS_VERSION_INFO", &fixed, false, &[strings, vars])
}

#[test]
fn resource_payloads() {
    use payloads::{Message, VersionNode, VersionValue};

    let mut b = headers();
    let version = version_resource();
    put_resources(
        &mut b,
        &[
            (6, 2, 0x1100, 42),
            (11, 1, 0x1140, 40),
            (16, 1, 0x1200, version.len() as u32),
        ],
    );

    let s = at_rva(0x1100);
    put_u16(&mut b, s, 2);
    put(&mut b, s + 2, &utf16("Hi"));
    put_u16(&mut b, s + 8, 3);
    put(&mut b, s + 10, &utf16("abc"));

    let m = at_rva(0x1140);
    put_u32(&mut b, m, 1);
    put_u32(&mut b, m + 4, 1);
    put_u32(&mut b, m + 8, 2);
    put_u32(&mut b, m + 12, 16);
    put_u16(&mut b, m + 16, 12);
    put(&mut b, m + 20, b"Hello\r\n\0");
    put_u16(&mut b, m + 28, 12);
    put_u16(&mut b, m + 30, 1);
    put(&mut b, m + 32, &utf16("Ok\0\0"));

    put(&mut b, at_rva(0x1200), &version);

    let view = ImageView::from_bytes(b);
    let root = decode(&view).unwrap().resources.unwrap().unwrap();
    let leaf = |i: usize| -> ResourcePayload {
        let ResourceNode::Directory(names) = root.entries[i].node.as_ref().unwrap() else {
            panic!("expected a directory");
        };
        let ResourceNode::Directory(langs) = names.entries[0].node.as_ref().unwrap() else {
            panic!("expected a directory");
        };
        let ResourceNode::Data(data) = langs.entries[0].node.as_ref().unwrap() else {
            panic!("expected data");
        };
        data.payload.clone().unwrap().unwrap()
    };

    assert_eq!(
        leaf(0),
        ResourcePayload::Strings(vec![(16, "Hi".to_string()), (18, "abc".to_string())])
    );
    assert_eq!(
        leaf(1),
        ResourcePayload::Messages(vec![
            Message {
                id: 1,
                unicode: false,
                text: "Hello\r\n".to_string()
            },
            Message {
                id: 2,
                unicode: true,
                text: "Ok".to_string()
            },
        ])
    );

    let ResourcePayload::Version(info) = leaf(2) else {
        panic!("expected version information");
    };
    let fixed = info.fixed.unwrap();
    assert_eq!(fixed.signature, VS_FFI_SIGNATURE);
    assert_eq!(fixed.file_version, [1, 2, 3, 4]);
    assert_eq!(fixed.file_os, 0x0004_0004);
    assert_eq!(
        info.children,
        vec![
            VersionNode {
                key: "StringFileInfo".to_string(),
                value: VersionValue::Block,
                children: vec![VersionNode {
                    key: "040904b0".to_string(),
                    value: VersionValue::Block,
                    children: vec![VersionNode {
                        key: "CompanyName".to_string(),
                        value: VersionValue::Text("Wine".to_string()),
                        children: vec![],
                    }],
                }],
            },
            VersionNode {
                key: "VarFileInfo".to_string(),
                value: VersionValue::Block,
                children: vec![VersionNode {
                    key: "Translation".to_string(),
                    value: VersionValue::Words(vec![0x409, 0x4b0]),
                    children: vec![],
                }],
            },
        ]
    );
}

#[test]
fn bad_message_block_is_local_to_the_resource() {
    let mut b = headers();
    put_resources(&mut b, &[(3, 1, 0x1100, 4), (11, 1, 0x1140, 16)]);
    let m = at_rva(0x1140);
    put_u32(&mut b, m, 1);
    put_u32(&mut b, m + 4, 5);
    put_u32(&mut b, m + 8, 2);

    let view = ImageView::from_bytes(b);
    let root = decode(&view).unwrap().resources.unwrap().unwrap();
    assert_eq!(root.entries.len(), 2);
    let ResourceNode::Directory(names) = root.entries[1].node.as_ref().unwrap() else {
        panic!("expected a directory");
    };
    let ResourceNode::Directory(langs) = names.entries[0].node.as_ref().unwrap() else {
        panic!("expected a directory");
    };
    let ResourceNode::Data(data) = langs.entries[0].node.as_ref().unwrap() else {
        panic!("expected data");
    };
    assert_eq!(
        data.payload,
        Some(Err(LocalError::invalid("message block ids")))
    );
}

#[test]
fn coff_symbols_from_file_header() {
    let mut b = headers();
    put_u32(&mut b, 0x8c, 0x500);
    put_u32(&mut b, 0x90, 3);

    put(&mut b, 0x500, b".file\0\0\0");
    put_u16(&mut b, 0x500 + 12, 0xfffe);
    b[0x500 + 16] = 103;
    b[0x500 + 17] = 1;
    put(&mut b, 0x512, b"a.c");

    put_u32(&mut b, 0x524 + 4, 4);
    put_u32(&mut b, 0x524 + 8, 0x10);
    put_u16(&mut b, 0x524 + 12, 1);
    put_u16(&mut b, 0x524 + 14, 0x20);
    b[0x524 + 16] = 2;

    put_u32(&mut b, 0x536, 20);
    put(&mut b, 0x53a, b"_main_long_name\0");

    let view = ImageView::from_bytes(b);
    let symbols = decode(&view).unwrap().symbols.unwrap().unwrap();
    assert_eq!(symbols.len(), 2);

    assert_eq!(symbols[0].index, 0);
    assert_eq!(*symbols[0].name.as_ref().unwrap(), ".file");
    assert_eq!(symbols[0].section, IMAGE_SYM_DEBUG);
    assert_eq!(storage_class_name(symbols[0].storage_class), Some("FILE"));
    assert_eq!(symbols[0].aux.len(), 1);

    assert_eq!(symbols[1].index, 2);
    assert_eq!(*symbols[1].name.as_ref().unwrap(), "_main_long_name");
    assert_eq!(symbols[1].value, 0x10);
    assert_eq!(symbols[1].section, 1);
    assert_eq!(symbols[1].ty, 0x20);
}

#[test]
fn coff_symbol_count_is_checked() {
    let mut b = headers();
    put_u32(&mut b, 0x8c, 0x500);
    put_u32(&mut b, 0x90, 0x1000_0000);
    let view = ImageView::from_bytes(b);
    let pe = decode(&view).unwrap();
    assert!(pe.symbols.unwrap().is_err());
    assert_eq!(pe.sections.len(), 1);
}

#[test]
fn debug_directory_coff() {
    let mut b = headers();
    set_directory(&mut b, IMAGE_DIRECTORY_ENTRY_DEBUG, 0x1000, 28);
    let d = at_rva(0x1000);
    put_u32(&mut b, d + 12, IMAGE_DEBUG_TYPE_COFF);
    put_u32(&mut b, d + 16, 0x60);
    put_u32(&mut b, d + 24, 0x400);

    put_u32(&mut b, 0x400, 1);
    put_u32(&mut b, 0x404, 32);
    put_u32(&mut b, 0x410, 0x1000);
    put_u32(&mut b, 0x414, 0x1fff);
    put(&mut b, 0x420, b"_start\0\0");
    put_u32(&mut b, 0x428, 0x1000);
    put_u16(&mut b, 0x42c, 1);
    b[0x430] = 2;
    put_u32(&mut b, 0x432, 4);

    let view = ImageView::from_bytes(b);
    let debug = decode(&view).unwrap().debug.unwrap().unwrap();
    let DebugInfo::Coff(coff) = debug[0].info.as_ref().unwrap() else {
        panic!("expected COFF debug information");
    };
    assert_eq!(coff.header.rva_to_first_byte_of_code.get(), 0x1000);
    let symbols = coff.symbols.as_ref().unwrap();
    assert_eq!(symbols.len(), 1);
    assert_eq!(*symbols[0].name.as_ref().unwrap(), "_start");
    assert_eq!(symbols[0].value, 0x1000);
}
