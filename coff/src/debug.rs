//! Debug directories and separate debug (`.dbg`) files.

use static_assertions::const_assert_eq;
use zerocopy::{LE, U16, U32};
use zerocopy_derive::*;

#[repr(C)]
#[derive(Clone, Default, Eq, PartialEq, Hash, FromBytes, Immutable, KnownLayout, Unaligned)]
pub struct IMAGE_DEBUG_DIRECTORY {
    pub characteristics: U32<LE>,
    pub time_date_stamp: U32<LE>,
    pub major_version: U16<LE>,
    pub minor_version: U16<LE>,
    pub type_: U32<LE>,
    pub size_of_data: U32<LE>,
    pub address_of_raw_data: U32<LE>,
    pub pointer_to_raw_data: U32<LE>,
}

const_assert_eq!(core::mem::size_of::<IMAGE_DEBUG_DIRECTORY>(), 28);

pub const IMAGE_DEBUG_TYPE_UNKNOWN: u32 = 0;
pub const IMAGE_DEBUG_TYPE_COFF: u32 = 1;
pub const IMAGE_DEBUG_TYPE_CODEVIEW: u32 = 2;
pub const IMAGE_DEBUG_TYPE_FPO: u32 = 3;
pub const IMAGE_DEBUG_TYPE_MISC: u32 = 4;
pub const IMAGE_DEBUG_TYPE_EXCEPTION: u32 = 5;
pub const IMAGE_DEBUG_TYPE_FIXUP: u32 = 6;
pub const IMAGE_DEBUG_TYPE_OMAP_TO_SRC: u32 = 7;
pub const IMAGE_DEBUG_TYPE_OMAP_FROM_SRC: u32 = 8;
pub const IMAGE_DEBUG_TYPE_BORLAND: u32 = 9;
pub const IMAGE_DEBUG_TYPE_RESERVED10: u32 = 10;
pub const IMAGE_DEBUG_TYPE_CLSID: u32 = 11;
pub const IMAGE_DEBUG_TYPE_VC_FEATURE: u32 = 12;
pub const IMAGE_DEBUG_TYPE_POGO: u32 = 13;
pub const IMAGE_DEBUG_TYPE_ILTCG: u32 = 14;
pub const IMAGE_DEBUG_TYPE_MPX: u32 = 15;
pub const IMAGE_DEBUG_TYPE_REPRO: u32 = 16;

pub fn debug_type_name(ty: u32) -> &'static str {
    match ty {
        IMAGE_DEBUG_TYPE_UNKNOWN => "UNKNOWN",
        IMAGE_DEBUG_TYPE_COFF => "COFF",
        IMAGE_DEBUG_TYPE_CODEVIEW => "CODEVIEW",
        IMAGE_DEBUG_TYPE_FPO => "FPO",
        IMAGE_DEBUG_TYPE_MISC => "MISC",
        IMAGE_DEBUG_TYPE_EXCEPTION => "EXCEPTION",
        IMAGE_DEBUG_TYPE_FIXUP => "FIXUP",
        IMAGE_DEBUG_TYPE_OMAP_TO_SRC => "OMAP_TO_SRC",
        IMAGE_DEBUG_TYPE_OMAP_FROM_SRC => "OMAP_FROM_SRC",
        IMAGE_DEBUG_TYPE_BORLAND => "BORLAND",
        IMAGE_DEBUG_TYPE_RESERVED10 => "RESERVED10",
        IMAGE_DEBUG_TYPE_CLSID => "CLSID",
        IMAGE_DEBUG_TYPE_VC_FEATURE => "VC_FEATURE",
        IMAGE_DEBUG_TYPE_POGO => "POGO",
        IMAGE_DEBUG_TYPE_ILTCG => "ILTCG",
        IMAGE_DEBUG_TYPE_MPX => "MPX",
        IMAGE_DEBUG_TYPE_REPRO => "REPRO",
        _ => "(unknown)",
    }
}

/// Fixed part of an `IMAGE_DEBUG_TYPE_MISC` record. The data follows.
#[repr(C)]
#[derive(Clone, Default, Eq, PartialEq, Hash, FromBytes, Immutable, KnownLayout, Unaligned)]
pub struct IMAGE_DEBUG_MISC {
    pub data_type: U32<LE>,
    /// Total length of the record, including this header
    pub length: U32<LE>,
    pub unicode: u8,
    pub reserved: [u8; 3],
}

const_assert_eq!(core::mem::size_of::<IMAGE_DEBUG_MISC>(), 12);

pub const IMAGE_DEBUG_MISC_EXENAME: u32 = 1;

#[repr(C)]
#[derive(Clone, Default, Eq, PartialEq, Hash, FromBytes, Immutable, KnownLayout, Unaligned)]
pub struct FPO_DATA {
    pub ul_off_start: U32<LE>,
    pub cb_proc_size: U32<LE>,
    pub cdw_locals: U32<LE>,
    pub cdw_params: U16<LE>,
    /// `cbProlog:8 cbRegs:3 fHasSEH:1 fUseBP:1 reserved:1 cbFrame:2`
    pub bits: U16<LE>,
}

const_assert_eq!(core::mem::size_of::<FPO_DATA>(), 16);

impl FPO_DATA {
    pub fn cb_prolog(&self) -> u16 {
        self.bits.get() & 0xff
    }
    pub fn cb_regs(&self) -> u16 {
        (self.bits.get() >> 8) & 7
    }
    pub fn has_seh(&self) -> bool {
        self.bits.get() & 0x800 != 0
    }
    pub fn use_bp(&self) -> bool {
        self.bits.get() & 0x1000 != 0
    }
    pub fn cb_frame(&self) -> u16 {
        self.bits.get() >> 14
    }
}

#[repr(C)]
#[derive(Clone, Default, Eq, PartialEq, Hash, FromBytes, Immutable, KnownLayout, Unaligned)]
pub struct OMAP_DATA {
    pub rva: U32<LE>,
    pub rva_to: U32<LE>,
}

/// `DI`
pub const IMAGE_SEPARATE_DEBUG_SIGNATURE: u16 = 0x4944;

#[repr(C)]
#[derive(Clone, Default, Eq, PartialEq, Hash, FromBytes, Immutable, KnownLayout, Unaligned)]
pub struct IMAGE_SEPARATE_DEBUG_HEADER {
    pub signature: U16<LE>,
    pub flags: U16<LE>,
    pub machine: U16<LE>,
    pub characteristics: U16<LE>,
    pub time_date_stamp: U32<LE>,
    pub check_sum: U32<LE>,
    pub image_base: U32<LE>,
    pub size_of_image: U32<LE>,
    pub number_of_sections: U32<LE>,
    pub exported_names_size: U32<LE>,
    pub debug_directory_size: U32<LE>,
    pub section_alignment: U32<LE>,
    pub reserved: [U32<LE>; 2],
}

const_assert_eq!(core::mem::size_of::<IMAGE_SEPARATE_DEBUG_HEADER>(), 48);

#[test]
fn fpo_bits() {
    let fpo = FPO_DATA {
        bits: U16::new(0x5310),
        ..FPO_DATA::default()
    };
    assert_eq!(fpo.cb_prolog(), 0x10);
    assert_eq!(fpo.cb_regs(), 3);
    assert!(!fpo.has_seh());
    assert!(fpo.use_bp());
    assert_eq!(fpo.cb_frame(), 1);
}
