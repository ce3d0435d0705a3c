//! The DOS (`MZ`) header that starts every Windows executable.

use static_assertions::const_assert_eq;
use zerocopy::{LE, U16, U32};
use zerocopy_derive::*;

/// `MZ`
pub const IMAGE_DOS_SIGNATURE: u16 = 0x5a4d;
/// `NE`
pub const IMAGE_OS2_SIGNATURE: u16 = 0x454e;
/// `LE`
pub const IMAGE_VXD_SIGNATURE: u16 = 0x454c;

#[repr(C)]
#[derive(Clone, Default, Eq, PartialEq, Hash, FromBytes, Immutable, KnownLayout, Unaligned)]
pub struct IMAGE_DOS_HEADER {
    /// Magic number, `MZ`
    pub e_magic: U16<LE>,
    /// Bytes on last page of file
    pub e_cblp: U16<LE>,
    /// Pages in file
    pub e_cp: U16<LE>,
    /// Relocations
    pub e_crlc: U16<LE>,
    /// Size of header in paragraphs
    pub e_cparhdr: U16<LE>,
    pub e_minalloc: U16<LE>,
    pub e_maxalloc: U16<LE>,
    pub e_ss: U16<LE>,
    pub e_sp: U16<LE>,
    pub e_csum: U16<LE>,
    pub e_ip: U16<LE>,
    pub e_cs: U16<LE>,
    /// File address of relocation table
    pub e_lfarlc: U16<LE>,
    pub e_ovno: U16<LE>,
    pub e_res: [U16<LE>; 4],
    pub e_oemid: U16<LE>,
    pub e_oeminfo: U16<LE>,
    pub e_res2: [U16<LE>; 10],
    /// File address of the new exe header
    pub e_lfanew: U32<LE>,
}

const_assert_eq!(core::mem::size_of::<IMAGE_DOS_HEADER>(), 64);
