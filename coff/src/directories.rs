//! Structures that the optional header's data directories point at.

use static_assertions::const_assert_eq;
use zerocopy::{LE, U16, U32, U64};
use zerocopy_derive::*;

#[repr(C)]
#[derive(Clone, Default, Eq, PartialEq, Hash, FromBytes, Immutable, KnownLayout, Unaligned)]
pub struct IMAGE_EXPORT_DIRECTORY {
    pub characteristics: U32<LE>,
    pub time_date_stamp: U32<LE>,
    pub major_version: U16<LE>,
    pub minor_version: U16<LE>,
    pub name: U32<LE>,
    pub base: U32<LE>,
    pub number_of_functions: U32<LE>,
    pub number_of_names: U32<LE>,
    pub address_of_functions: U32<LE>,
    pub address_of_names: U32<LE>,
    pub address_of_name_ordinals: U32<LE>,
}

const_assert_eq!(core::mem::size_of::<IMAGE_EXPORT_DIRECTORY>(), 40);

#[repr(C)]
#[derive(Clone, Default, Eq, PartialEq, Hash, FromBytes, Immutable, KnownLayout, Unaligned)]
pub struct IMAGE_IMPORT_DESCRIPTOR {
    /// RVA of the import lookup table, or 0 for old binders
    pub original_first_thunk: U32<LE>,
    pub time_date_stamp: U32<LE>,
    pub forwarder_chain: U32<LE>,
    pub name: U32<LE>,
    /// RVA of the import address table
    pub first_thunk: U32<LE>,
}

const_assert_eq!(core::mem::size_of::<IMAGE_IMPORT_DESCRIPTOR>(), 20);

pub const IMAGE_ORDINAL_FLAG32: u32 = 0x8000_0000;
pub const IMAGE_ORDINAL_FLAG64: u64 = 0x8000_0000_0000_0000;

#[repr(C)]
#[derive(Clone, Default, Eq, PartialEq, Hash, FromBytes, Immutable, KnownLayout, Unaligned)]
pub struct IMAGE_DELAYLOAD_DESCRIPTOR {
    pub attributes: U32<LE>,
    pub dll_name_rva: U32<LE>,
    pub module_handle_rva: U32<LE>,
    pub import_address_table_rva: U32<LE>,
    pub import_name_table_rva: U32<LE>,
    pub bound_import_address_table_rva: U32<LE>,
    pub unload_information_table_rva: U32<LE>,
    pub time_date_stamp: U32<LE>,
}

const_assert_eq!(core::mem::size_of::<IMAGE_DELAYLOAD_DESCRIPTOR>(), 32);

/// Bit 0 of `attributes`: the RVA fields are RVAs rather than virtual addresses.
pub const DELAYLOAD_RVA_BASED: u32 = 1;

#[repr(C)]
#[derive(Clone, Default, Eq, PartialEq, Hash, FromBytes, Immutable, KnownLayout, Unaligned)]
pub struct IMAGE_RESOURCE_DIRECTORY {
    pub characteristics: U32<LE>,
    pub time_date_stamp: U32<LE>,
    pub major_version: U16<LE>,
    pub minor_version: U16<LE>,
    pub number_of_named_entries: U16<LE>,
    pub number_of_id_entries: U16<LE>,
}

const_assert_eq!(core::mem::size_of::<IMAGE_RESOURCE_DIRECTORY>(), 16);

#[repr(C)]
#[derive(Clone, Default, Eq, PartialEq, Hash, FromBytes, Immutable, KnownLayout, Unaligned)]
pub struct IMAGE_RESOURCE_DIRECTORY_ENTRY {
    /// High bit set: offset of an `IMAGE_RESOURCE_DIR_STRING_U`. Otherwise an integer id.
    pub name: U32<LE>,
    /// High bit set: offset of a subdirectory. Otherwise offset of an `IMAGE_RESOURCE_DATA_ENTRY`.
    pub offset_to_data: U32<LE>,
}

const_assert_eq!(core::mem::size_of::<IMAGE_RESOURCE_DIRECTORY_ENTRY>(), 8);

pub const IMAGE_RESOURCE_NAME_IS_STRING: u32 = 0x8000_0000;
pub const IMAGE_RESOURCE_DATA_IS_DIRECTORY: u32 = 0x8000_0000;

impl IMAGE_RESOURCE_DIRECTORY_ENTRY {
    pub fn name_is_string(&self) -> bool {
        self.name.get() & IMAGE_RESOURCE_NAME_IS_STRING != 0
    }

    /// Offset of the name string or the integer id, depending on `name_is_string`.
    pub fn name_offset_or_id(&self) -> u32 {
        self.name.get() & !IMAGE_RESOURCE_NAME_IS_STRING
    }

    pub fn data_is_directory(&self) -> bool {
        self.offset_to_data.get() & IMAGE_RESOURCE_DATA_IS_DIRECTORY != 0
    }

    /// Offset relative to the start of the resource section.
    pub fn offset(&self) -> u32 {
        self.offset_to_data.get() & !IMAGE_RESOURCE_DATA_IS_DIRECTORY
    }
}

#[repr(C)]
#[derive(Clone, Default, Eq, PartialEq, Hash, FromBytes, Immutable, KnownLayout, Unaligned)]
pub struct IMAGE_RESOURCE_DATA_ENTRY {
    pub offset_to_data: U32<LE>,
    pub size: U32<LE>,
    pub code_page: U32<LE>,
    pub reserved: U32<LE>,
}

const_assert_eq!(core::mem::size_of::<IMAGE_RESOURCE_DATA_ENTRY>(), 16);

#[repr(C)]
#[derive(Clone, Default, Eq, PartialEq, Hash, FromBytes, Immutable, KnownLayout, Unaligned)]
pub struct IMAGE_TLS_DIRECTORY32 {
    pub start_address_of_raw_data: U32<LE>,
    pub end_address_of_raw_data: U32<LE>,
    pub address_of_index: U32<LE>,
    pub address_of_call_backs: U32<LE>,
    pub size_of_zero_fill: U32<LE>,
    pub characteristics: U32<LE>,
}

const_assert_eq!(core::mem::size_of::<IMAGE_TLS_DIRECTORY32>(), 24);

#[repr(C)]
#[derive(Clone, Default, Eq, PartialEq, Hash, FromBytes, Immutable, KnownLayout, Unaligned)]
pub struct IMAGE_TLS_DIRECTORY64 {
    pub start_address_of_raw_data: U64<LE>,
    pub end_address_of_raw_data: U64<LE>,
    pub address_of_index: U64<LE>,
    pub address_of_call_backs: U64<LE>,
    pub size_of_zero_fill: U32<LE>,
    pub characteristics: U32<LE>,
}

const_assert_eq!(core::mem::size_of::<IMAGE_TLS_DIRECTORY64>(), 40);

/// An x64 `.pdata` entry.
#[repr(C)]
#[derive(Clone, Default, Eq, PartialEq, Hash, FromBytes, Immutable, KnownLayout, Unaligned)]
pub struct IMAGE_RUNTIME_FUNCTION_ENTRY {
    pub begin_address: U32<LE>,
    pub end_address: U32<LE>,
    /// RVA of the `UNWIND_INFO`. Bit 0 set: RVA of another runtime function entry.
    pub unwind_data: U32<LE>,
}

const_assert_eq!(core::mem::size_of::<IMAGE_RUNTIME_FUNCTION_ENTRY>(), 12);

/// An ARM or ARM64 `.pdata` entry. The low two bits of `unwind_data` select between packed
/// unwind data and an `.xdata` RVA.
#[repr(C)]
#[derive(Clone, Default, Eq, PartialEq, Hash, FromBytes, Immutable, KnownLayout, Unaligned)]
pub struct IMAGE_ARM_RUNTIME_FUNCTION_ENTRY {
    pub begin_address: U32<LE>,
    pub unwind_data: U32<LE>,
}

const_assert_eq!(core::mem::size_of::<IMAGE_ARM_RUNTIME_FUNCTION_ENTRY>(), 8);

pub const UNW_FLAG_EHANDLER: u8 = 1;
pub const UNW_FLAG_UHANDLER: u8 = 2;
pub const UNW_FLAG_CHAININFO: u8 = 4;

pub const UWOP_PUSH_NONVOL: u8 = 0;
pub const UWOP_ALLOC_LARGE: u8 = 1;
pub const UWOP_ALLOC_SMALL: u8 = 2;
pub const UWOP_SET_FPREG: u8 = 3;
pub const UWOP_SAVE_NONVOL: u8 = 4;
pub const UWOP_SAVE_NONVOL_FAR: u8 = 5;
pub const UWOP_EPILOG: u8 = 6;
pub const UWOP_SAVE_XMM128: u8 = 8;
pub const UWOP_SAVE_XMM128_FAR: u8 = 9;
pub const UWOP_PUSH_MACHFRAME: u8 = 10;

/// The CLR (COM descriptor) header of a managed image.
#[repr(C)]
#[derive(Clone, Default, Eq, PartialEq, Hash, FromBytes, Immutable, KnownLayout, Unaligned)]
pub struct IMAGE_COR20_HEADER {
    pub cb: U32<LE>,
    pub major_runtime_version: U16<LE>,
    pub minor_runtime_version: U16<LE>,
    pub metadata: crate::IMAGE_DATA_DIRECTORY,
    pub flags: U32<LE>,
    /// A metadata token, or an RVA if `COMIMAGE_FLAGS_NATIVE_ENTRYPOINT` is set.
    pub entry_point_token: U32<LE>,
    pub resources: crate::IMAGE_DATA_DIRECTORY,
    pub strong_name_signature: crate::IMAGE_DATA_DIRECTORY,
    pub code_manager_table: crate::IMAGE_DATA_DIRECTORY,
    pub vtable_fixups: crate::IMAGE_DATA_DIRECTORY,
    pub export_address_table_jumps: crate::IMAGE_DATA_DIRECTORY,
    pub managed_native_header: crate::IMAGE_DATA_DIRECTORY,
}

const_assert_eq!(core::mem::size_of::<IMAGE_COR20_HEADER>(), 72);

#[derive(Copy, Clone, Eq, PartialEq, Default, Hash)]
#[repr(transparent)]
pub struct ComImageFlags(pub u32);

bitflags::bitflags! {
    impl ComImageFlags: u32 {
        const ILONLY = 0x0000_0001;
        const REQUIRED_32BIT = 0x0000_0002;
        const IL_LIBRARY = 0x0000_0004;
        const STRONGNAMESIGNED = 0x0000_0008;
        const NATIVE_ENTRYPOINT = 0x0000_0010;
        const TRACKDEBUGDATA = 0x0001_0000;
        const PREFERRED_32BIT = 0x0002_0000;
    }
}

/// `BSJB`, at the start of the CLR metadata root.
pub const CLR_METADATA_SIGNATURE: u32 = 0x424a_5342;

/// The fixed part of a `VS_VERSIONINFO` resource.
#[repr(C)]
#[derive(Clone, Default, Eq, PartialEq, Hash, FromBytes, Immutable, KnownLayout, Unaligned)]
pub struct VS_FIXEDFILEINFO {
    pub signature: U32<LE>,
    pub struc_version: U32<LE>,
    pub file_version_ms: U32<LE>,
    pub file_version_ls: U32<LE>,
    pub product_version_ms: U32<LE>,
    pub product_version_ls: U32<LE>,
    pub file_flags_mask: U32<LE>,
    pub file_flags: U32<LE>,
    pub file_os: U32<LE>,
    pub file_type: U32<LE>,
    pub file_subtype: U32<LE>,
    pub file_date_ms: U32<LE>,
    pub file_date_ls: U32<LE>,
}

const_assert_eq!(core::mem::size_of::<VS_FIXEDFILEINFO>(), 52);

pub const VS_FFI_SIGNATURE: u32 = 0xfeef_04bd;

pub fn file_os_name(os: u32) -> Option<&'static str> {
    Some(match os {
        0x0000_0000 => "VOS_UNKNOWN",
        0x0001_0001 => "VOS_DOS_WINDOWS16",
        0x0001_0004 => "VOS_DOS_WINDOWS32",
        0x0002_0002 => "VOS_OS216_PM16",
        0x0003_0003 => "VOS_OS232_PM32",
        0x0004_0004 => "VOS_NT_WINDOWS32",
        _ => return None,
    })
}

pub fn file_type_name(ty: u32) -> Option<&'static str> {
    Some(match ty {
        0 => "VFT_UNKNOWN",
        1 => "VFT_APP",
        2 => "VFT_DLL",
        3 => "VFT_DRV",
        4 => "VFT_FONT",
        5 => "VFT_VXD",
        7 => "VFT_STATIC_LIB",
        _ => return None,
    })
}

#[repr(C)]
#[derive(Clone, Default, Eq, PartialEq, Hash, FromBytes, Immutable, KnownLayout, Unaligned)]
pub struct MESSAGE_RESOURCE_BLOCK {
    pub low_id: U32<LE>,
    pub high_id: U32<LE>,
    /// Offset of the first entry, from the start of the resource.
    pub offset_to_entries: U32<LE>,
}

const_assert_eq!(core::mem::size_of::<MESSAGE_RESOURCE_BLOCK>(), 12);

/// `flags` of a message table entry: the text is UTF-16.
pub const MESSAGE_RESOURCE_UNICODE: u16 = 1;

#[test]
fn resource_entry_bits() {
    let e = IMAGE_RESOURCE_DIRECTORY_ENTRY {
        name: U32::new(0x8000_0010),
        offset_to_data: U32::new(0x8000_0040),
    };
    assert!(e.name_is_string());
    assert_eq!(e.name_offset_or_id(), 0x10);
    assert!(e.data_is_directory());
    assert_eq!(e.offset(), 0x40);
}
