//! Segmented executables (`NE`), as used by 16-bit Windows and OS/2.

use static_assertions::const_assert_eq;
use zerocopy::{LE, U16, U32};
use zerocopy_derive::*;

#[repr(C)]
#[derive(Clone, Default, Eq, PartialEq, Hash, FromBytes, Immutable, KnownLayout, Unaligned)]
pub struct IMAGE_OS2_HEADER {
    pub ne_magic: U16<LE>,
    pub ne_ver: u8,
    pub ne_rev: u8,
    /// Offset of the entry table, relative to this header
    pub ne_enttab: U16<LE>,
    pub ne_cbenttab: U16<LE>,
    pub ne_crc: U32<LE>,
    pub ne_flags: U16<LE>,
    /// Automatic data segment number
    pub ne_autodata: U16<LE>,
    pub ne_heap: U16<LE>,
    pub ne_stack: U16<LE>,
    pub ne_csip: U32<LE>,
    pub ne_sssp: U32<LE>,
    /// Count of file segments
    pub ne_cseg: U16<LE>,
    /// Entries in the module reference table
    pub ne_cmod: U16<LE>,
    pub ne_cbnrestab: U16<LE>,
    pub ne_segtab: U16<LE>,
    pub ne_rsrctab: U16<LE>,
    pub ne_restab: U16<LE>,
    pub ne_modtab: U16<LE>,
    pub ne_imptab: U16<LE>,
    /// File offset of the non-resident name table
    pub ne_nrestab: U32<LE>,
    pub ne_cmovent: U16<LE>,
    /// Segment alignment shift count
    pub ne_align: U16<LE>,
    pub ne_cres: U16<LE>,
    pub ne_exetyp: u8,
    pub ne_flagsothers: u8,
    pub ne_pretthunks: U16<LE>,
    pub ne_psegrefbytes: U16<LE>,
    pub ne_swaparea: U16<LE>,
    pub ne_expver: U16<LE>,
}

const_assert_eq!(core::mem::size_of::<IMAGE_OS2_HEADER>(), 64);

pub const NE_FFLAGS_SINGLEDATA: u16 = 0x0001;
pub const NE_FFLAGS_MULTIPLEDATA: u16 = 0x0002;
pub const NE_FFLAGS_WIN32: u16 = 0x0010;
pub const NE_FFLAGS_BUILTIN: u16 = 0x0020;
pub const NE_FFLAGS_FRAMEBUF: u16 = 0x0100;
pub const NE_FFLAGS_CONSOLE: u16 = 0x0200;
pub const NE_FFLAGS_GUI: u16 = 0x0300;
pub const NE_FFLAGS_SELFLOAD: u16 = 0x0800;
pub const NE_FFLAGS_LINKERROR: u16 = 0x2000;
pub const NE_FFLAGS_CALLWEP: u16 = 0x4000;
pub const NE_FFLAGS_LIBMODULE: u16 = 0x8000;

/// One entry of the segment table.
#[repr(C)]
#[derive(Clone, Default, Eq, PartialEq, Hash, FromBytes, Immutable, KnownLayout, Unaligned)]
pub struct NE_SEGMENT {
    /// File offset in units of `1 << ne_align`
    pub offset: U16<LE>,
    pub length: U16<LE>,
    pub flags: U16<LE>,
    pub min_alloc: U16<LE>,
}

const_assert_eq!(core::mem::size_of::<NE_SEGMENT>(), 8);

pub const NE_SEGFLAGS_DATA: u16 = 0x0001;
pub const NE_SEGFLAGS_ALLOCATED: u16 = 0x0002;
pub const NE_SEGFLAGS_LOADED: u16 = 0x0004;
pub const NE_SEGFLAGS_ITERATED: u16 = 0x0008;
pub const NE_SEGFLAGS_MOVEABLE: u16 = 0x0010;
pub const NE_SEGFLAGS_SHAREABLE: u16 = 0x0020;
pub const NE_SEGFLAGS_PRELOAD: u16 = 0x0040;
pub const NE_SEGFLAGS_EXECUTEONLY: u16 = 0x0080;
pub const NE_SEGFLAGS_READONLY: u16 = 0x0080;
pub const NE_SEGFLAGS_RELOC_DATA: u16 = 0x0100;
pub const NE_SEGFLAGS_SELFLOAD: u16 = 0x0800;
pub const NE_SEGFLAGS_DISCARDABLE: u16 = 0x1000;
pub const NE_SEGFLAGS_32BIT: u16 = 0x2000;

/// Header of one resource type group in the resource table.
#[repr(C)]
#[derive(Clone, Default, Eq, PartialEq, Hash, FromBytes, Immutable, KnownLayout, Unaligned)]
pub struct NE_TYPEINFO {
    /// High bit set for integer ids; otherwise an offset of a name within the resource table.
    /// Zero terminates the table.
    pub type_id: U16<LE>,
    pub count: U16<LE>,
    pub resloader: U32<LE>,
}

const_assert_eq!(core::mem::size_of::<NE_TYPEINFO>(), 8);

#[repr(C)]
#[derive(Clone, Default, Eq, PartialEq, Hash, FromBytes, Immutable, KnownLayout, Unaligned)]
pub struct NE_NAMEINFO {
    pub offset: U16<LE>,
    pub length: U16<LE>,
    pub flags: U16<LE>,
    pub id: U16<LE>,
    pub handle: U16<LE>,
    pub usage: U16<LE>,
}

const_assert_eq!(core::mem::size_of::<NE_NAMEINFO>(), 12);

/// Bundle type for movable entries in the entry table.
pub const NE_BUNDLE_MOVABLE: u8 = 0xff;
/// Bundle type for a run of unused ordinals.
pub const NE_BUNDLE_UNUSED: u8 = 0;

/// Returns the name of a predefined resource type (`RT_*`), given its integer id.
pub fn resource_type_name(id: u16) -> Option<&'static str> {
    Some(match id {
        1 => "CURSOR",
        2 => "BITMAP",
        3 => "ICON",
        4 => "MENU",
        5 => "DIALOG",
        6 => "STRING",
        7 => "FONTDIR",
        8 => "FONT",
        9 => "ACCELERATOR",
        10 => "RCDATA",
        11 => "MESSAGETABLE",
        12 => "GROUP_CURSOR",
        14 => "GROUP_ICON",
        16 => "VERSION",
        17 => "DLGINCLUDE",
        19 => "PLUGPLAY",
        20 => "VXD",
        21 => "ANICURSOR",
        22 => "ANIICON",
        23 => "HTML",
        24 => "MANIFEST",
        _ => return None,
    })
}
