//! Linear executables (`LE`), as used by Windows 3.x/9x virtual device drivers.

use static_assertions::const_assert_eq;
use zerocopy::{LE, U16, U32};
use zerocopy_derive::*;

#[repr(C)]
#[derive(Clone, Default, Eq, PartialEq, Hash, FromBytes, Immutable, KnownLayout, Unaligned)]
pub struct IMAGE_VXD_HEADER {
    pub e32_magic: U16<LE>,
    pub e32_border: u8,
    pub e32_worder: u8,
    pub e32_level: U32<LE>,
    pub e32_cpu: U16<LE>,
    pub e32_os: U16<LE>,
    pub e32_ver: U32<LE>,
    pub e32_mflags: U32<LE>,
    pub e32_mpages: U32<LE>,
    pub e32_startobj: U32<LE>,
    pub e32_eip: U32<LE>,
    pub e32_stackobj: U32<LE>,
    pub e32_esp: U32<LE>,
    pub e32_pagesize: U32<LE>,
    pub e32_lastpagesize: U32<LE>,
    pub e32_fixupsize: U32<LE>,
    pub e32_fixupsum: U32<LE>,
    pub e32_ldrsize: U32<LE>,
    pub e32_ldrsum: U32<LE>,
    /// Object table offset, relative to this header
    pub e32_objtab: U32<LE>,
    pub e32_objcnt: U32<LE>,
    pub e32_objmap: U32<LE>,
    pub e32_itermap: U32<LE>,
    pub e32_rsrctab: U32<LE>,
    pub e32_rsrccnt: U32<LE>,
    /// Resident name table offset, relative to this header
    pub e32_restab: U32<LE>,
    /// Entry table offset, relative to this header
    pub e32_enttab: U32<LE>,
    pub e32_dirtab: U32<LE>,
    pub e32_dircnt: U32<LE>,
    pub e32_fpagetab: U32<LE>,
    pub e32_frectab: U32<LE>,
    pub e32_impmod: U32<LE>,
    pub e32_impmodcnt: U32<LE>,
    pub e32_impproc: U32<LE>,
    pub e32_pagesum: U32<LE>,
    /// File offset of the first data page
    pub e32_datapage: U32<LE>,
    pub e32_preload: U32<LE>,
    /// File offset of the non-resident name table
    pub e32_nrestab: U32<LE>,
    pub e32_cbnrestab: U32<LE>,
    pub e32_nressum: U32<LE>,
    pub e32_autodata: U32<LE>,
    pub e32_debuginfo: U32<LE>,
    pub e32_debuglen: U32<LE>,
    pub e32_instpreload: U32<LE>,
    pub e32_instdemand: U32<LE>,
    pub e32_heapsize: U32<LE>,
    pub e32_res3: [u8; 12],
    pub e32_winresoff: U32<LE>,
    pub e32_winreslen: U32<LE>,
    pub e32_devid: U16<LE>,
    pub e32_ddkver: U16<LE>,
}

const_assert_eq!(core::mem::size_of::<IMAGE_VXD_HEADER>(), 196);

/// One entry of the object table.
#[repr(C)]
#[derive(Clone, Default, Eq, PartialEq, Hash, FromBytes, Immutable, KnownLayout, Unaligned)]
pub struct LE_OBJECT {
    pub size: U32<LE>,
    pub base: U32<LE>,
    pub flags: U32<LE>,
    /// 1-based index of the object's first page
    pub pagemap: U32<LE>,
    pub mapsize: U32<LE>,
    pub reserved: U32<LE>,
}

const_assert_eq!(core::mem::size_of::<LE_OBJECT>(), 24);

pub const LE_OBJ_READABLE: u32 = 0x0001;
pub const LE_OBJ_WRITABLE: u32 = 0x0002;
pub const LE_OBJ_EXECUTABLE: u32 = 0x0004;
pub const LE_OBJ_RESOURCE: u32 = 0x0008;
pub const LE_OBJ_DISCARDABLE: u32 = 0x0010;
pub const LE_OBJ_SHARED: u32 = 0x0020;
pub const LE_OBJ_PRELOAD: u32 = 0x0040;
pub const LE_OBJ_INVALID: u32 = 0x0080;
pub const LE_OBJ_ZEROFILL: u32 = 0x0100;
pub const LE_OBJ_RESIDENT: u32 = 0x0200;
pub const LE_OBJ_BIG: u32 = 0x2000;

/// Entry table bundle type for 32-bit entries.
pub const LE_BUNDLE_32BIT: u8 = 3;

/// The start of the VxD device description block (`DDB`) exported as ordinal 1 by a VxD.
#[repr(C)]
#[derive(Clone, Default, Eq, PartialEq, Hash, FromBytes, Immutable, KnownLayout, Unaligned)]
pub struct VXD_DESCRIPTION_BLOCK {
    pub next: U32<LE>,
    pub sdk_version: U16<LE>,
    pub req_device_number: U16<LE>,
    pub dev_major_version: u8,
    pub dev_minor_version: u8,
    pub flags: U16<LE>,
    pub name: [u8; 8],
    pub init_order: U32<LE>,
    pub control_proc: U32<LE>,
    pub v86_api_proc: U32<LE>,
    pub pm_api_proc: U32<LE>,
}

const_assert_eq!(core::mem::size_of::<VXD_DESCRIPTION_BLOCK>(), 36);
