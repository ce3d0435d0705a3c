use std::path::{Path, PathBuf};
use std::process::{Command, Output};

const TMP_DIR: &str = env!("CARGO_TARGET_TMPDIR");
const IMGDUMPTOOL: &str = env!("CARGO_BIN_EXE_imgdumptool");

fn write_input(test: &str, name: &str, bytes: &[u8]) -> PathBuf {
    let dir = Path::new(TMP_DIR).join(test);
    _ = std::fs::create_dir_all(&dir);
    let path = dir.join(name);
    std::fs::write(&path, bytes).unwrap();
    path
}

fn run(args: &[&str], file: Option<&Path>) -> Output {
    let mut cmd = Command::new(IMGDUMPTOOL);
    cmd.arg("--quiet");
    cmd.args(args);
    if let Some(file) = file {
        cmd.arg(file);
    }
    cmd.output().unwrap()
}

fn dos_program() -> Vec<u8> {
    let mut bytes = vec![0u8; 0x48];
    bytes[0..2].copy_from_slice(b"MZ");
    bytes[6] = 2; // e_crlc
    bytes[0x18] = 0x40; // e_lfarlc
    bytes[0x40..0x48].copy_from_slice(&[0x10, 0, 0x20, 0, 0x30, 0, 0x40, 0]);
    bytes
}

fn metafile() -> Vec<u8> {
    let mut bytes = vec![0u8; 88 + 20];
    bytes[0..4].copy_from_slice(&1u32.to_le_bytes()); // EMR_HEADER
    bytes[4..8].copy_from_slice(&88u32.to_le_bytes());
    bytes[40..44].copy_from_slice(b" EMF");
    bytes[48..52].copy_from_slice(&108u32.to_le_bytes());
    bytes[52..56].copy_from_slice(&2u32.to_le_bytes());
    bytes[88..92].copy_from_slice(&14u32.to_le_bytes()); // EMR_EOF
    bytes[92..96].copy_from_slice(&20u32.to_le_bytes());
    bytes
}

fn put(bytes: &mut [u8], offset: usize, data: &[u8]) {
    bytes[offset..offset + data.len()].copy_from_slice(data);
}

fn put_u16(bytes: &mut [u8], offset: usize, value: u16) {
    put(bytes, offset, &value.to_le_bytes());
}

fn put_u32(bytes: &mut [u8], offset: usize, value: u32) {
    put(bytes, offset, &value.to_le_bytes());
}

/// File offset of an RVA in the one section of `pe_image`.
fn at_rva(rva: u32) -> usize {
    (rva - 0x1000 + 0x200) as usize
}

fn set_directory(bytes: &mut [u8], slot: usize, rva: u32, size: u32) {
    put_u32(bytes, 0x98 + 96 + slot * 8, rva);
    put_u32(bytes, 0x98 + 96 + slot * 8 + 4, size);
}

/// A PE32 image with one section (RVA 0x1000, file offset 0x200), a decorated export, a debug
/// directory with an NB10 record and an undecoded entry, and a TLS directory outside the image.
fn pe_image() -> Vec<u8> {
    let mut b = vec![0u8; 0x600];
    put(&mut b, 0, b"MZ");
    put_u32(&mut b, 0x3c, 0x80);
    put(&mut b, 0x80, b"PE\0\0");
    put_u16(&mut b, 0x84, 0x14c);
    put_u16(&mut b, 0x86, 1);
    put_u16(&mut b, 0x94, 0xe0);
    put_u16(&mut b, 0x98, 0x10b);
    put_u32(&mut b, 0x98 + 28, 0x0040_0000);
    put_u32(&mut b, 0x98 + 92, 16);
    put(&mut b, 0x178, b".rdata\0\0");
    put_u32(&mut b, 0x178 + 8, 0x400);
    put_u32(&mut b, 0x178 + 12, 0x1000);
    put_u32(&mut b, 0x178 + 16, 0x400);
    put_u32(&mut b, 0x178 + 20, 0x200);

    set_directory(&mut b, 0, 0x1000, 0x80);
    let e = at_rva(0x1000);
    put_u32(&mut b, e + 12, 0x1040);
    put_u32(&mut b, e + 16, 1);
    put_u32(&mut b, e + 20, 1);
    put_u32(&mut b, e + 24, 1);
    put_u32(&mut b, e + 28, 0x1028);
    put_u32(&mut b, e + 32, 0x102c);
    put_u32(&mut b, e + 36, 0x1030);
    put_u32(&mut b, at_rva(0x1028), 0x2000);
    put_u32(&mut b, at_rva(0x102c), 0x1050);
    put(&mut b, at_rva(0x1040), b"test.dll\0");
    put(&mut b, at_rva(0x1050), b"?Foo@Bar@@QAEXXZ\0");

    set_directory(&mut b, 6, 0x1100, 56);
    let d = at_rva(0x1100);
    put_u32(&mut b, d + 12, 2);
    put_u32(&mut b, d + 16, 0x20);
    put_u32(&mut b, d + 24, 0x580);
    put_u32(&mut b, d + 28 + 12, 20);
    put_u32(&mut b, d + 28 + 16, 4);
    put_u32(&mut b, d + 28 + 24, 0x5a0);
    put(&mut b, 0x580, b"NB10");
    put_u32(&mut b, 0x588, 0x3f00_0001);
    put_u32(&mut b, 0x58c, 2);
    put(&mut b, 0x590, b"a.pdb\0");
    put(&mut b, 0x5a0, b"ABCD");

    set_directory(&mut b, 9, 0x9000, 24);
    b
}

fn msft_segment(f: &mut [u8], seg: usize, offset: i32, length: i32) {
    let at = 0x60 + seg * 16;
    put(f, at, &offset.to_le_bytes());
    put(f, at + 4, &length.to_le_bytes());
    put_u32(f, at + 12, 0x0f);
}

fn msft_name(f: &mut [u8], offset: usize, s: &str) {
    let at = 0x310 + offset;
    put(f, at, &(-1i32).to_le_bytes());
    put(f, at + 4, &(-1i32).to_le_bytes());
    put_u32(f, at + 8, 0x3800 | s.len() as u32);
    put(f, at + 12, s.as_bytes());
}

/// An MSFT type library: interface `IFoo` with `HRESULT Bar([in] int* x)`, and coclass `Foo`
/// which implements it.
fn msft_library() -> Vec<u8> {
    let mut f = vec![0u8; 0x440];
    for (i, v) in [
        0x5446_534d_i32, 0x0001_0002, 0, 0x409, 0, 0x101, 0x0002_0001, 0, 2, 0, 0, 0, 0, 0, 0,
        -1, -1, 0, 0, -1, 0,
    ]
    .iter()
    .enumerate()
    {
        put(&mut f, i * 4, &v.to_le_bytes());
    }
    put_u32(&mut f, 0x54, 0x0c);
    put_u32(&mut f, 0x5c, 0x64);

    for seg in 0..15 {
        msft_segment(&mut f, seg, -1, 0);
    }
    msft_segment(&mut f, 0, 0x200, 0xc8); // typeinfos
    msft_segment(&mut f, 3, 0x2d0, 0x10); // references
    msft_segment(&mut f, 5, 0x2e0, 0x30); // guids
    msft_segment(&mut f, 7, 0x310, 0x54); // names
    msft_segment(&mut f, 8, 0x370, 0x20); // strings
    msft_segment(&mut f, 9, 0x390, 8); // type descriptors

    let ti0 = 0x200;
    put_u32(&mut f, ti0, 3);
    put_u32(&mut f, ti0 + 4, 0x400);
    put_u32(&mut f, ti0 + 0x18, 1);
    put_u32(&mut f, ti0 + 0x2c, 0x18);
    put_u32(&mut f, ti0 + 0x34, 0x14);
    put(&mut f, ti0 + 0x3c, &(-1i32).to_le_bytes());
    put(&mut f, ti0 + 0x48, &(-1i32).to_le_bytes());
    put(&mut f, ti0 + 0x4c, &[0, 0, 0x20, 0]);
    put(&mut f, ti0 + 0x54, &(-1i32).to_le_bytes());

    let ti1 = 0x264;
    put_u32(&mut f, ti1, 5);
    put(&mut f, ti1 + 4, &(-1i32).to_le_bytes());
    put(&mut f, ti1 + 0x2c, &(-1i32).to_le_bytes());
    put_u32(&mut f, ti1 + 0x34, 0x44);
    put(&mut f, ti1 + 0x48, &(-1i32).to_le_bytes());
    put(&mut f, ti1 + 0x4c, &[1, 0, 0, 0]);

    put_u32(&mut f, 0x2d4, 1);
    put(&mut f, 0x2d8, &[0xff; 8]);

    put(&mut f, 0x2e0, &[0x11; 16]);
    put(&mut f, 0x2f0, &[0xff; 8]);
    put(&mut f, 0x2f8, &[0x22; 16]);

    msft_name(&mut f, 0x00, "TestLib");
    msft_name(&mut f, 0x14, "IFoo");
    msft_name(&mut f, 0x24, "Bar");
    msft_name(&mut f, 0x34, "x");
    msft_name(&mut f, 0x44, "Foo");

    put_u16(&mut f, 0x370, 9);
    put(&mut f, 0x372, b"Test docs");
    put_u16(&mut f, 0x37c, 5);
    put(&mut f, 0x37e, b"h.dll");

    put(&mut f, 0x390, &[26, 0, 0, 0, 3, 0, 3, 0x80]);

    for (i, v) in [
        0x24_u32, 0x24, 0x8019_0019, 0, 0x1c, 0x408, 1, 0, 0x34, 1, 0x6000_0000, 0x24, 0,
    ]
    .iter()
    .enumerate()
    {
        put_u32(&mut f, 0x400 + i * 4, *v);
    }
    f
}

#[derive(Default)]
struct Writer(Vec<u8>);

impl Writer {
    fn u8(&mut self, v: u8) -> &mut Self {
        self.0.push(v);
        self
    }
    fn u16(&mut self, v: u16) -> &mut Self {
        self.0.extend_from_slice(&v.to_le_bytes());
        self
    }
    fn u32(&mut self, v: u32) -> &mut Self {
        self.0.extend_from_slice(&v.to_le_bytes());
        self
    }
    fn bytes(&mut self, b: &[u8]) -> &mut Self {
        self.0.extend_from_slice(b);
        self
    }
    fn zeros(&mut self, n: usize) -> &mut Self {
        self.0.resize(self.0.len() + n, 0);
        self
    }
}

/// An SLTG type library with interface `IFoo` and its `HRESULT Bar(int* x)` method. The help
/// string trie decodes `11` as "hi" and `10` as "yo".
fn sltg_library() -> Vec<u8> {
    const INDEX: &[u8] = b"AAAAAAAAAA";
    #[rustfmt::skip]
    const TRIE: &[u8] = &[
        0x80, 0x00, 0x0a, 0x80, 0x00, 0x0e, 0x01, b'h', b'i', 0x00, 0x01, 0x00, 0x00, 0x00,
        0x01, b'y', b'o', 0x00,
    ];

    let mut ti = Writer::default();
    ti.u16(0x0501)
        .u32(0xffff_ffff)
        .u32(0xffff_ffff)
        .u32(0x22)
        .u32(0xffff_ffff)
        .u16(1)
        .u16(0)
        .u32(0)
        .u8(0x02)
        .u8(0)
        .u8(0x02)
        .u8(3)
        .u32(0);
    ti.u16(0).u16(0xffff).u8(1).u32(0x1a);
    ti.u8(0x4c)
        .u8(0x12)
        .u16(0xffff)
        .u16(0x0d)
        .u32(0x6001_0000)
        .u16(0xfffe)
        .u16(0xffff)
        .u16(0x16)
        .u8(1 << 3 | 4)
        .u8(0x80)
        .u16(25)
        .u16(0x1c);
    ti.u16(0x12).u16(0x0e00 | 3);
    ti.u16(1).u16(0).u16(0).u16(0).u16(0).u16(0xffff).zeros(0x36 - 12);

    let mut lib = Writer::default();
    lib.u16(0x51cc).u16(3).u16(0).u16(0xffff);
    lib.u16(4).bytes(b"docs").u16(0xffff);
    lib.u32(0).u16(1).u16(0x409).u32(0).u16(0).u16(1).u16(2);
    lib.bytes(&[0x44; 16]);
    lib.zeros(0x40);
    lib.u16(0).u16(INDEX.len() as u16).bytes(INDEX).u16(0xffff).u16(0xffff);
    lib.u16(8).u16(1).u8(0b1110_0000);
    lib.u16(0xffff).u32(7).u16(0xffff).bytes(&[0x55; 16]).u16(3);
    let locator = lib.0.len() + 2;
    lib.u16(3).u32(0);
    lib.u16(0x40).u32(TRIE.len() as u32).bytes(TRIE);
    let name_table = lib.0.len() as u32;
    lib.0[locator..locator + 4].copy_from_slice(&name_table.to_le_bytes());
    lib.u16(0xffff).zeros(0x218 - 2).bytes(b"TestLib\0IFoo\0Bar\0x\0");

    let mut w = Writer::default();
    w.u32(0x4754_4c53)
        .u16(3)
        .u16(0)
        .u16(0)
        .u16(1)
        .bytes(&[0x33; 16])
        .u32(0)
        .u32(0);
    w.u32(ti.0.len() as u32).u16(0x0d).u16(2);
    w.u32(lib.0.len() as u32).u16(0x18).u16(0);
    w.u8(1).bytes(b"CompObj\0").bytes(b"dir\0");
    w.bytes(INDEX).u8(0).zeros(9);
    w.bytes(&ti.0).bytes(&lib.0);
    w.0
}

fn stdout_of(out: &Output) -> String {
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    String::from_utf8_lossy(&out.stdout).into_owned()
}

#[test]
fn identify_dos() {
    let file = write_input("identify_dos", "prog.exe", &dos_program());
    let out = run(&["identify"], Some(&file));
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.trim_end().ends_with(": DOS"), "{stdout}");
}

#[test]
fn identify_unknown_fails() {
    let file = write_input("identify_unknown_fails", "notes.txt", b"hello, world");
    let out = run(&["identify"], Some(&file));
    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("unrecognized format"), "{stderr}");
}

#[test]
fn dump_dos_relocations() {
    let file = write_input("dump_dos_relocations", "prog.exe", &dos_program());
    let out = run(&["dump"], Some(&file));
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("DOS (72 bytes)"), "{stdout}");
    assert!(stdout.contains("Relocations: 2"), "{stdout}");
    assert!(stdout.contains("  0020:0010\n"), "{stdout}");
    assert!(stdout.contains("  0040:0030\n"), "{stdout}");
}

#[test]
fn dump_truncated_relocations_keeps_going() {
    let mut bytes = dos_program();
    bytes[6] = 9;
    let file = write_input("dump_truncated_relocations_keeps_going", "prog.exe", &bytes);
    let out = run(&["dump"], Some(&file));
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("DOS header:"), "{stdout}");
    assert!(stdout.contains("Relocations: <"), "{stdout}");
}

#[test]
fn dump_metafile_records() {
    let file = write_input("dump_metafile_records", "pic.emf", &metafile());
    let out = run(&["dump"], Some(&file));
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("EMF (108 bytes)"), "{stdout}");
    assert!(stdout.contains("Records (2):"), "{stdout}");
    assert!(stdout.contains("00000000 EMR_HEADER (1), 0x58 bytes"), "{stdout}");
    assert!(stdout.contains("00000058 EMR_EOF (14), 0x14 bytes"), "{stdout}");
}

#[test]
fn dump_unknown_fails() {
    let file = write_input("dump_unknown_fails", "notes.txt", b"hello, world");
    let out = run(&["dump"], Some(&file));
    assert!(!out.status.success());
    assert!(out.stdout.is_empty());
}

#[test]
fn dump_missing_file_fails() {
    let file = Path::new(TMP_DIR).join("dump_missing_file_fails").join("nothing.exe");
    let out = run(&["dump"], Some(&file));
    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("cannot read"), "{stderr}");
}

#[test]
fn demangle_names() {
    let out = run(&["demangle", "?Foo@Bar@@QAEXXZ", "CreateFileW"], None);
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(
        lines,
        ["public: void __thiscall Bar::Foo(void)", "CreateFileW"]
    );
}

#[test]
fn dump_pe_directories() {
    let file = write_input("dump_pe_directories", "test.dll", &pe_image());
    let stdout = stdout_of(&run(&["dump"], Some(&file)));
    assert!(stdout.contains("PE (1536 bytes)"), "{stdout}");
    assert!(stdout.contains("Exports:\n"), "{stdout}");
    assert!(stdout.contains("  1        00002000  ?Foo@Bar@@QAEXXZ\n"), "{stdout}");
    assert!(stdout.contains("    CodeView NB10\n"), "{stdout}");
    assert!(stdout.contains("    age:        2\n"), "{stdout}");
    assert!(stdout.contains("    PDB:        a.pdb\n"), "{stdout}");
    assert!(stdout.contains("    (4 bytes)\n"), "{stdout}");

    // The broken directory is reported in place and the report goes on.
    let tls = stdout.lines().find(|l| l.starts_with("TLS")).unwrap();
    assert!(tls.starts_with("TLS: <"), "{tls}");
    assert!(stdout.find("Exports:").unwrap() < stdout.find("TLS: <").unwrap());
}

#[test]
fn dump_pe_hex_payloads() {
    let file = write_input("dump_pe_hex_payloads", "test.dll", &pe_image());
    let stdout = stdout_of(&run(&["dump", "--hex"], Some(&file)));
    assert!(!stdout.contains("(4 bytes)"), "{stdout}");
    let row = stdout.lines().find(|l| l.contains("000005a0 :")).unwrap();
    assert_eq!(
        row,
        format!("      000005a0 :  41 42 43 44{} : ABCD", " ".repeat(36))
    );
}

#[test]
fn dump_pe_demangled_exports() {
    let file = write_input("dump_pe_demangled_exports", "test.dll", &pe_image());
    let stdout = stdout_of(&run(&["dump", "--demangle"], Some(&file)));
    assert!(
        stdout.contains("  1        00002000  public: void __thiscall Bar::Foo(void)\n"),
        "{stdout}"
    );
    assert!(!stdout.contains("?Foo@Bar@@QAEXXZ"), "{stdout}");
}

#[test]
fn dump_is_repeatable() {
    let file = write_input("dump_is_repeatable", "test.dll", &pe_image());
    let first = stdout_of(&run(&["dump", "--hex"], Some(&file)));
    let second = stdout_of(&run(&["dump", "--hex"], Some(&file)));
    assert_eq!(first, second);
}

#[test]
fn dump_msft_library() {
    let file = write_input("dump_msft_library", "test.tlb", &msft_library());
    let stdout = stdout_of(&run(&["dump"], Some(&file)));
    assert!(stdout.contains("MSFT (1088 bytes)"), "{stdout}");
    assert!(stdout.contains("Library TestLib\n"), "{stdout}");
    assert!(stdout.contains("  helpstring: Test docs\n"), "{stdout}");
    assert!(stdout.contains("  helpdll:    h.dll\n"), "{stdout}");
    assert!(stdout.contains("Typeinfo 0: interface IFoo\n"), "{stdout}");
    assert!(
        stdout.contains(
            "  [id(0x60000000)] VT_HRESULT __stdcall Bar([in] VT_I4* x) vtable 0x1c\n"
        ),
        "{stdout}"
    );
    assert!(stdout.contains("Typeinfo 1: coclass Foo\n"), "{stdout}");
    assert!(stdout.contains("  implements IFoo (flags 0x1)\n"), "{stdout}");
}

#[test]
fn dump_sltg_library() {
    let file = write_input("dump_sltg_library", "test.tlb", &sltg_library());
    let stdout = stdout_of(&run(&["dump"], Some(&file)));
    assert!(stdout.contains(": SLTG ("), "{stdout}");
    assert!(stdout.contains("Library TestLib\n"), "{stdout}");
    assert!(stdout.contains("  helpstring:  docs\n"), "{stdout}");
    assert!(stdout.contains("  lcid:        0x409\n"), "{stdout}");
    assert!(stdout.contains("Typeinfo 0: interface IFoo\n"), "{stdout}");
    assert!(stdout.contains("  helpstring:  hi yo\n"), "{stdout}");
    assert!(stdout.contains("  helpcontext: 0x7\n"), "{stdout}");
    let bar = stdout.lines().find(|l| l.contains("Bar(")).unwrap();
    assert!(bar.starts_with("  [id(0x60010000)] VT_HRESULT __stdcall Bar("), "{bar}");
    assert!(bar.ends_with("VT_I4* x) vtable 0x1c"), "{bar}");
}
