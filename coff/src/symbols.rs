//! COFF symbol tables, as pointed at by the file header or by an `IMAGE_DEBUG_TYPE_COFF` entry.

use static_assertions::const_assert_eq;
use zerocopy::{I16, LE, U16, U32};
use zerocopy_derive::*;

#[repr(C)]
#[derive(Clone, Default, Eq, PartialEq, Hash, FromBytes, Immutable, KnownLayout, Unaligned)]
pub struct IMAGE_SYMBOL {
    /// A short name padded with NULs, or four zero bytes and a string table offset.
    pub name: [u8; 8],
    pub value: U32<LE>,
    /// One-based section number, or one of the `IMAGE_SYM_*` special values.
    pub section_number: I16<LE>,
    pub type_: U16<LE>,
    pub storage_class: u8,
    pub number_of_aux_symbols: u8,
}

pub const IMAGE_SIZEOF_SYMBOL: usize = 18;
const_assert_eq!(core::mem::size_of::<IMAGE_SYMBOL>(), IMAGE_SIZEOF_SYMBOL);

impl IMAGE_SYMBOL {
    /// The string table offset of a long name.
    pub fn long_name_offset(&self) -> Option<u32> {
        if self.name[..4] == [0; 4] {
            Some(u32::from_le_bytes([
                self.name[4],
                self.name[5],
                self.name[6],
                self.name[7],
            ]))
        } else {
            None
        }
    }

    /// The inline name, up to its first NUL.
    pub fn short_name(&self) -> &[u8] {
        let end = self.name.iter().position(|&b| b == 0).unwrap_or(8);
        &self.name[..end]
    }
}

pub const IMAGE_SYM_UNDEFINED: i16 = 0;
pub const IMAGE_SYM_ABSOLUTE: i16 = -1;
pub const IMAGE_SYM_DEBUG: i16 = -2;

pub fn storage_class_name(class: u8) -> Option<&'static str> {
    Some(match class {
        0xff => "END_OF_FUNCTION",
        0 => "NULL",
        1 => "AUTOMATIC",
        2 => "EXTERNAL",
        3 => "STATIC",
        4 => "REGISTER",
        5 => "EXTERNAL_DEF",
        6 => "LABEL",
        7 => "UNDEFINED_LABEL",
        8 => "MEMBER_OF_STRUCT",
        9 => "ARGUMENT",
        10 => "STRUCT_TAG",
        11 => "MEMBER_OF_UNION",
        12 => "UNION_TAG",
        13 => "TYPE_DEFINITION",
        14 => "UNDEFINED_STATIC",
        15 => "ENUM_TAG",
        16 => "MEMBER_OF_ENUM",
        17 => "REGISTER_PARAM",
        18 => "BIT_FIELD",
        100 => "BLOCK",
        101 => "FUNCTION",
        102 => "END_OF_STRUCT",
        103 => "FILE",
        104 => "SECTION",
        105 => "WEAK_EXTERNAL",
        107 => "CLR_TOKEN",
        _ => return None,
    })
}

/// The header of an `IMAGE_DEBUG_TYPE_COFF` debug entry. Offsets are relative to the header.
#[repr(C)]
#[derive(Clone, Default, Eq, PartialEq, Hash, FromBytes, Immutable, KnownLayout, Unaligned)]
pub struct IMAGE_COFF_SYMBOLS_HEADER {
    pub number_of_symbols: U32<LE>,
    pub lva_to_first_symbol: U32<LE>,
    pub number_of_linenumbers: U32<LE>,
    pub lva_to_first_linenumber: U32<LE>,
    pub rva_to_first_byte_of_code: U32<LE>,
    pub rva_to_last_byte_of_code: U32<LE>,
    pub rva_to_first_byte_of_data: U32<LE>,
    pub rva_to_last_byte_of_data: U32<LE>,
}

const_assert_eq!(core::mem::size_of::<IMAGE_COFF_SYMBOLS_HEADER>(), 32);

#[test]
fn symbol_names() {
    let mut sym = IMAGE_SYMBOL::default();
    sym.name = *b"_main\0\0\0";
    assert_eq!(sym.short_name(), b"_main");
    assert_eq!(sym.long_name_offset(), None);

    sym.name = [0, 0, 0, 0, 0x24, 0, 0, 0];
    assert_eq!(sym.long_name_offset(), Some(0x24));
    assert_eq!(storage_class_name(103), Some("FILE"));
}
