//! Base relocations (`.reloc`)
//!
//! The base relocation directory is a sequence of blocks. Each block starts with an
//! `IMAGE_BASE_RELOCATION` header and is followed by 16-bit entries, whose high 4 bits give the
//! relocation type and whose low 12 bits give the offset within the block's page.

use static_assertions::const_assert_eq;
use zerocopy::{LE, U32};
use zerocopy_derive::*;

#[repr(C)]
#[derive(Clone, Default, Eq, PartialEq, Hash, FromBytes, Immutable, KnownLayout, Unaligned)]
pub struct IMAGE_BASE_RELOCATION {
    pub virtual_address: U32<LE>,
    /// Size of the block in bytes, including this header.
    pub size_of_block: U32<LE>,
}

const_assert_eq!(core::mem::size_of::<IMAGE_BASE_RELOCATION>(), 8);

pub const IMAGE_REL_BASED_ABSOLUTE: u16 = 0;
pub const IMAGE_REL_BASED_HIGH: u16 = 1;
pub const IMAGE_REL_BASED_LOW: u16 = 2;
pub const IMAGE_REL_BASED_HIGHLOW: u16 = 3;
pub const IMAGE_REL_BASED_HIGHADJ: u16 = 4;
pub const IMAGE_REL_BASED_MIPS_JMPADDR: u16 = 5;
pub const IMAGE_REL_BASED_SECTION: u16 = 6;
pub const IMAGE_REL_BASED_REL32: u16 = 7;
pub const IMAGE_REL_BASED_MIPS_JMPADDR16: u16 = 9;
pub const IMAGE_REL_BASED_DIR64: u16 = 10;

/// Splits a base relocation entry into `(type, page offset)`.
pub fn split_base_reloc(entry: u16) -> (u16, u16) {
    (entry >> 12, entry & 0xfff)
}

pub fn base_reloc_type_str(ty: u16) -> Option<&'static str> {
    Some(match ty {
        IMAGE_REL_BASED_ABSOLUTE => "BASED_ABSOLUTE",
        IMAGE_REL_BASED_HIGH => "BASED_HIGH",
        IMAGE_REL_BASED_LOW => "BASED_LOW",
        IMAGE_REL_BASED_HIGHLOW => "BASED_HIGHLOW",
        IMAGE_REL_BASED_HIGHADJ => "BASED_HIGHADJ",
        IMAGE_REL_BASED_MIPS_JMPADDR => "BASED_MIPS_JMPADDR",
        IMAGE_REL_BASED_SECTION => "BASED_SECTION",
        IMAGE_REL_BASED_REL32 => "BASED_REL32",
        IMAGE_REL_BASED_MIPS_JMPADDR16 => "BASED_MIPS_JMPADDR16",
        IMAGE_REL_BASED_DIR64 => "BASED_DIR64",
        _ => return None,
    })
}

#[test]
fn split_entries() {
    assert_eq!(split_base_reloc(0x3123), (IMAGE_REL_BASED_HIGHLOW, 0x123));
    assert_eq!(split_base_reloc(0xa008), (IMAGE_REL_BASED_DIR64, 8));
    assert_eq!(base_reloc_type_str(3), Some("BASED_HIGHLOW"));
    assert_eq!(base_reloc_type_str(15), None);
}
