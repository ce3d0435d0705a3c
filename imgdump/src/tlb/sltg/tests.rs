use super::*;
use pretty_hex::PrettyHex;

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

/// Codes: `11` = "hi", `10` = "yo", `0` = end.
#[rustfmt::skip]
static TRIE: &[u8] = &[
    /* 0x0000 */ 0x80, 0x00, 0x0a,
    /* 0x0003 */ 0x80, 0x00, 0x0e,
    /* 0x0006 */ 0x01, b'h', b'i', 0x00,
    /* 0x000a */ 0x01, 0x00,
    /* 0x000c */ 0x00, 0x00,
    /* 0x000e */ 0x01, b'y', b'o', 0x00,
];

const INDEX: &[u8] = b"AAAAAAAAAA";
const FIRST_BLOCK: usize = 0x55;
const TI_LEN: usize = 0x7b;
const LIB_BLOCK: usize = FIRST_BLOCK + TI_LEN;

/// Name table: "TestLib" @ 0, "IFoo" @ 8, "Bar" @ 0xd, "x" @ 0x11.
const NAMES: &[u8] = b"TestLib\0IFoo\0Bar\0x\0";

/// Interface `IFoo` with `HRESULT Bar(int* x)`.
fn typeinfo_block() -> Vec<u8> {
    let mut w = Writer::default();
    // SLTG_TypeInfoHeader
    w.u16(SLTG_TIHEADER_MAGIC)
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
    // SLTG_MemberHeader
    w.u16(0).u16(0xffff).u8(1).u32(0x1a);
    // function @ 0
    w.u8(0x4c)
        .u8(0x12)
        .u16(0xffff)
        .u16(0x0d)
        .u32(0x6001_0000)
        .u16(0xfffe)
        .u16(0xffff)
        .u16(0x16)
        .u8(1 << 3 | 4)
        .u8(0x80)
        .u16(vt::VT_HRESULT)
        .u16(0x1c);
    // args @ 0x16: the name word points at the second letter, then an inline VT_I4 pointer
    w.u16(0x12).u16(0x0e00 | vt::VT_I4);
    // SLTG_TypeInfoTail
    w.u16(1).u16(0).u16(0).u16(0).u16(0).u16(0xffff).zeros(0x36 - 12);
    assert_eq!(w.0.len(), TI_LEN);
    w.0
}

fn library_block() -> Vec<u8> {
    let mut w = Writer::default();
    w.u16(SLTG_LIBBLK_MAGIC).u16(3).u16(0).u16(0xffff);
    w.u16(4).bytes(b"docs").u16(0xffff);
    w.u32(0).u16(1).u16(0x409).u32(0).u16(0).u16(1).u16(2);
    w.bytes(&[0x44; 16]);
    w.zeros(0x40);

    // OtherTypeInfo
    w.u16(0).u16(INDEX.len() as u16).bytes(INDEX).u16(0xffff).u16(0xffff);
    w.u16(8).u16(1).u8(0b1110_0000);
    w.u16(0xffff).u32(7).u16(0xffff).bytes(&[0x55; 16]).u16(3);

    // name table locator, patched below
    let locator = w.0.len() + 2;
    w.u16(3).u32(0);
    w.u16(0x40).u32(TRIE.len() as u32).bytes(TRIE);

    let name_table = w.0.len();
    w.0[locator..locator + 4].copy_from_slice(&(name_table as u32).to_le_bytes());
    w.u16(0xffff).zeros(0x218 - 2).bytes(NAMES);
    w.0
}

fn library() -> Vec<u8> {
    let ti = typeinfo_block();
    let lib = library_block();

    let mut w = Writer::default();
    w.u32(crate::sig::SLTG_SIGNATURE)
        .u16(3)
        .u16(0)
        .u16(0)
        .u16(1)
        .bytes(&[0x33; 16])
        .u32(0)
        .u32(0);
    w.u32(ti.len() as u32).u16(0x0d).u16(2);
    w.u32(lib.len() as u32).u16(0x18).u16(0);
    w.u8(1).bytes(b"CompObj\0").bytes(b"dir\0");
    w.bytes(INDEX).u8(0).zeros(9);
    assert_eq!(w.0.len(), FIRST_BLOCK);
    w.bytes(&ti).bytes(&lib);
    w.0
}

/// File offset of `SLTG_BlkEntry::next` for entry `i`.
fn next_field(i: usize) -> usize {
    0x24 + i * 8 + 6
}

#[test]
fn library_attributes() {
    let bytes = library();
    println!("{:?}", bytes.hex_dump());
    let view = ImageView::from_bytes(bytes);
    let sltg = decode(&view).unwrap();

    assert_eq!(sltg.entries.len(), 2);
    assert_eq!(sltg.entries[0].index_name.as_deref(), Ok("AAAAAAAAAA"));
    assert_eq!(
        sltg.chain,
        Ok(vec![
            Block {
                entry: 0,
                offset: FIRST_BLOCK as u32,
                len: TI_LEN as u32,
            },
            Block {
                entry: 1,
                offset: LIB_BLOCK as u32,
                len: sltg.entries[1].len,
            },
        ])
    );

    let lib = sltg.library.as_ref().unwrap();
    assert_eq!(lib.name.as_deref(), Ok("TestLib"));
    assert_eq!(lib.doc.as_deref(), Some("docs"));
    assert!(lib.help_file.is_none());
    assert_eq!(lib.version, (1, 2));
    assert_eq!(lib.syskind, 1);
    assert_eq!(lib.lcid, 0x409);
    assert_eq!(lib.guid, Uuid::from_bytes([0x44; 16]));

    let others = lib.other_infos.as_ref().unwrap();
    assert_eq!(others.len(), 1);
    assert_eq!(others[0].index_name.as_deref(), Some("AAAAAAAAAA"));
    assert_eq!(others[0].help_context, 7);
    assert_eq!(lib.help_table.as_ref().unwrap().max_len, 0x40);
}

#[test]
fn interface_typeinfo() {
    let view = ImageView::from_bytes(library());
    let sltg = decode(&view).unwrap();
    assert_eq!(sltg.typeinfos.len(), 1);

    let ti = sltg.typeinfos[0].as_ref().unwrap();
    assert_eq!(ti.kind, TypeKind::TKIND_INTERFACE);
    assert_eq!(ti.name.as_deref(), Ok("IFoo"));
    assert_eq!(ti.guid, Some(Uuid::from_bytes([0x55; 16])));
    assert_eq!(ti.version, (1, 0));
    assert_eq!(ti.help_context, 7);
    assert_eq!(ti.doc.as_ref().unwrap().as_deref(), Ok("hi yo"));
    assert_eq!(ti.function_count, 1);

    let members = ti.members.as_ref().unwrap();
    assert!(members.impls.is_empty());
    let f = members.functions[0].as_ref().unwrap();
    assert_eq!(f.name.as_deref(), Ok("Bar"));
    assert_eq!(f.memid, 0x6001_0000);
    assert_eq!(f.return_type, TypeDesc::Base(vt::VT_HRESULT));
    assert_eq!(f.invoke_kind, 1);
    assert_eq!(f.call_conv, 4);
    assert_eq!(f.vtable_offset, 0x1c);
    assert_eq!(f.params.len(), 1);
    assert_eq!(f.params[0].name.as_ref().unwrap().as_deref(), Ok("x"));
    assert_eq!(f.params[0].type_.to_string(), "VT_I4*");
}

#[test]
fn chain_visits_each_block_once() {
    let entry = |len, next| BlockEntry {
        len,
        index_string: 0,
        next,
        index_name: Ok(String::new()),
    };
    // 2 -> 3 -> 1
    let entries = [entry(0x10, 0), entry(0x20, 3), entry(0x30, 1)];
    let blocks = walk_chain(&entries, 2, 0x100).unwrap();

    let order: Vec<usize> = blocks.iter().map(|b| b.entry).collect();
    assert_eq!(order, [1, 2, 0]);
    let offsets: Vec<u32> = blocks.iter().map(|b| b.offset).collect();
    assert_eq!(offsets, [0x100, 0x120, 0x150]);
}

#[test]
fn chain_offsets_must_fit_in_32_bits() {
    let entry = |len, next| BlockEntry {
        len,
        index_string: 0,
        next,
        index_name: Ok(String::new()),
    };
    let entries = [entry(0xffff_ff00, 2), entry(0x200, 3), entry(0x10, 0)];
    assert!(matches!(
        walk_chain(&entries, 1, 0x100),
        Err(LocalError::Overrun { .. })
    ));

    // The last block may end anywhere; only the start of each block is an offset.
    let entries = [entry(0x10, 2), entry(0xffff_ffff, 0)];
    let blocks = walk_chain(&entries, 1, 0x100).unwrap();
    assert_eq!(blocks[1].offset, 0x110);
}

#[test]
fn chain_without_end() {
    let mut f = library();
    f[next_field(0)] = 1;
    let view = ImageView::from_bytes(f);
    let sltg = decode(&view).unwrap();

    assert!(matches!(sltg.chain, Err(LocalError::Invalid { .. })));
    assert!(sltg.library.is_err());
    assert!(sltg.typeinfos.is_empty());
    assert_eq!(sltg.entries.len(), 2);
}

#[test]
fn chain_index_out_of_range() {
    let mut f = library();
    f[0x0a] = 7;
    let view = ImageView::from_bytes(f.clone());
    assert!(matches!(
        decode(&view).unwrap().chain,
        Err(LocalError::Invalid { .. })
    ));

    f[0x0a] = 1;
    f[next_field(0)] = 9;
    let view = ImageView::from_bytes(f);
    assert!(decode(&view).unwrap().chain.is_err());
}

#[test]
fn damaged_typeinfo_block() {
    let mut f = library();
    f[FIRST_BLOCK] = 0;
    let view = ImageView::from_bytes(f);
    let sltg = decode(&view).unwrap();

    assert!(matches!(
        sltg.typeinfos[0],
        Err(LocalError::BadSignature { .. })
    ));
    assert_eq!(
        sltg.library.as_ref().unwrap().name.as_deref(),
        Ok("TestLib")
    );
}

#[test]
fn structural_errors() {
    let mut f = library();
    f[0x34 + 1] = b'X';
    assert!(decode(&ImageView::from_bytes(f)).is_err());

    let mut f = library();
    f[0] = b'X';
    assert!(decode(&ImageView::from_bytes(f)).is_err());

    assert!(decode(&ImageView::from_bytes(library()[..0x30].to_vec())).is_err());
}
