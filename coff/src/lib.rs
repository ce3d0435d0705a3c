//! Definitions for the executable image formats produced by Windows toolchains: DOS (`MZ`),
//! segmented (`NE`), linear (`LE`) and Portable Executable (`PE`) images, plus the separate
//! debug (`.dbg`) files that accompany them.
//!
//! Every structure is declared with unaligned little-endian fields so that it can be viewed
//! directly at any byte offset of a file image. This crate does not provide any I/O.
//!
//! # References
//! * <https://learn.microsoft.com/en-us/windows/win32/debug/pe-format>
//! * `winnt.h`

#![allow(non_camel_case_types)]
#![forbid(unsafe_code)]

mod debug;
mod directories;
mod dll_characteristics;
mod dos;
mod le;
mod machine;
mod ne;
mod reloc;
mod section;
mod symbols;

pub use debug::*;
pub use directories::*;
pub use dll_characteristics::*;
pub use dos::*;
pub use le::*;
pub use machine::*;
pub use ne::*;
pub use reloc::*;
pub use section::*;
pub use symbols::*;

use static_assertions::const_assert_eq;
use zerocopy::{LE, U16, U32, U64};
use zerocopy_derive::*;

/// `PE\0\0`
pub const IMAGE_NT_SIGNATURE: u32 = 0x0000_4550;

#[repr(C)]
#[derive(Clone, Default, Eq, PartialEq, Hash, FromBytes, Immutable, KnownLayout, Unaligned)]
pub struct IMAGE_FILE_HEADER {
    pub machine: U16<LE>,
    pub number_of_sections: U16<LE>,
    pub time_date_stamp: U32<LE>,
    pub pointer_to_symbol_table: U32<LE>,
    pub number_of_symbols: U32<LE>,
    pub size_of_optional_header: U16<LE>,
    pub characteristics: U16<LE>,
}

const_assert_eq!(core::mem::size_of::<IMAGE_FILE_HEADER>(), 20);

pub const IMAGE_FILE_RELOCS_STRIPPED: u16 = 0x0001;
pub const IMAGE_FILE_EXECUTABLE_IMAGE: u16 = 0x0002;
pub const IMAGE_FILE_LINE_NUMS_STRIPPED: u16 = 0x0004;
pub const IMAGE_FILE_LOCAL_SYMS_STRIPPED: u16 = 0x0008;
pub const IMAGE_FILE_AGGRESIVE_WS_TRIM: u16 = 0x0010;
pub const IMAGE_FILE_LARGE_ADDRESS_AWARE: u16 = 0x0020;
pub const IMAGE_FILE_16BIT_MACHINE: u16 = 0x0040;
pub const IMAGE_FILE_BYTES_REVERSED_LO: u16 = 0x0080;
pub const IMAGE_FILE_32BIT_MACHINE: u16 = 0x0100;
pub const IMAGE_FILE_DEBUG_STRIPPED: u16 = 0x0200;
pub const IMAGE_FILE_REMOVABLE_RUN_FROM_SWAP: u16 = 0x0400;
pub const IMAGE_FILE_NET_RUN_FROM_SWAP: u16 = 0x0800;
pub const IMAGE_FILE_SYSTEM: u16 = 0x1000;
pub const IMAGE_FILE_DLL: u16 = 0x2000;
pub const IMAGE_FILE_UP_SYSTEM_ONLY: u16 = 0x4000;
pub const IMAGE_FILE_BYTES_REVERSED_HI: u16 = 0x8000;

/// Names of the `IMAGE_FILE_*` characteristics bits, in bit order.
pub static FILE_CHARACTERISTICS_NAMES: &[(u16, &str)] = &[
    (IMAGE_FILE_RELOCS_STRIPPED, "RELOCS_STRIPPED"),
    (IMAGE_FILE_EXECUTABLE_IMAGE, "EXECUTABLE_IMAGE"),
    (IMAGE_FILE_LINE_NUMS_STRIPPED, "LINE_NUMS_STRIPPED"),
    (IMAGE_FILE_LOCAL_SYMS_STRIPPED, "LOCAL_SYMS_STRIPPED"),
    (IMAGE_FILE_AGGRESIVE_WS_TRIM, "AGGRESIVE_WS_TRIM"),
    (IMAGE_FILE_LARGE_ADDRESS_AWARE, "LARGE_ADDRESS_AWARE"),
    (IMAGE_FILE_16BIT_MACHINE, "16BIT_MACHINE"),
    (IMAGE_FILE_BYTES_REVERSED_LO, "BYTES_REVERSED_LO"),
    (IMAGE_FILE_32BIT_MACHINE, "32BIT_MACHINE"),
    (IMAGE_FILE_DEBUG_STRIPPED, "DEBUG_STRIPPED"),
    (IMAGE_FILE_REMOVABLE_RUN_FROM_SWAP, "REMOVABLE_RUN_FROM_SWAP"),
    (IMAGE_FILE_NET_RUN_FROM_SWAP, "NET_RUN_FROM_SWAP"),
    (IMAGE_FILE_SYSTEM, "SYSTEM"),
    (IMAGE_FILE_DLL, "DLL"),
    (IMAGE_FILE_UP_SYSTEM_ONLY, "UP_SYSTEM_ONLY"),
    (IMAGE_FILE_BYTES_REVERSED_HI, "BYTES_REVERSED_HI"),
];

#[repr(C)]
#[derive(Clone, Default, Eq, PartialEq, Hash, FromBytes, Immutable, KnownLayout, Unaligned)]
pub struct IMAGE_DATA_DIRECTORY {
    pub virtual_address: U32<LE>,
    pub size: U32<LE>,
}

pub const IMAGE_NUMBEROF_DIRECTORY_ENTRIES: usize = 16;

pub const IMAGE_DIRECTORY_ENTRY_EXPORT: usize = 0;
pub const IMAGE_DIRECTORY_ENTRY_IMPORT: usize = 1;
pub const IMAGE_DIRECTORY_ENTRY_RESOURCE: usize = 2;
pub const IMAGE_DIRECTORY_ENTRY_EXCEPTION: usize = 3;
pub const IMAGE_DIRECTORY_ENTRY_SECURITY: usize = 4;
pub const IMAGE_DIRECTORY_ENTRY_BASERELOC: usize = 5;
pub const IMAGE_DIRECTORY_ENTRY_DEBUG: usize = 6;
pub const IMAGE_DIRECTORY_ENTRY_ARCHITECTURE: usize = 7;
pub const IMAGE_DIRECTORY_ENTRY_GLOBALPTR: usize = 8;
pub const IMAGE_DIRECTORY_ENTRY_TLS: usize = 9;
pub const IMAGE_DIRECTORY_ENTRY_LOAD_CONFIG: usize = 10;
pub const IMAGE_DIRECTORY_ENTRY_BOUND_IMPORT: usize = 11;
pub const IMAGE_DIRECTORY_ENTRY_IAT: usize = 12;
pub const IMAGE_DIRECTORY_ENTRY_DELAY_IMPORT: usize = 13;
pub const IMAGE_DIRECTORY_ENTRY_COM_DESCRIPTOR: usize = 14;

/// Display names of the data directory slots, indexed by `IMAGE_DIRECTORY_ENTRY_*`.
pub static DATA_DIRECTORY_NAMES: [&str; IMAGE_NUMBEROF_DIRECTORY_ENTRIES] = [
    "EXPORT",
    "IMPORT",
    "RESOURCE",
    "EXCEPTION",
    "SECURITY",
    "BASERELOC",
    "DEBUG",
    "ARCHITECTURE",
    "GLOBALPTR",
    "TLS",
    "LOAD_CONFIG",
    "Bound IAT",
    "IAT",
    "Delay IAT",
    "CLR Header",
    "",
];

/// The fixed part of the PE32 optional header. The data directories follow it; their count is
/// given by `number_of_rva_and_sizes`.
#[repr(C)]
#[derive(Clone, Default, Eq, PartialEq, Hash, FromBytes, Immutable, KnownLayout, Unaligned)]
pub struct IMAGE_OPTIONAL_HEADER32 {
    pub magic: U16<LE>,
    pub major_linker_version: u8,
    pub minor_linker_version: u8,
    pub size_of_code: U32<LE>,
    pub size_of_initialized_data: U32<LE>,
    pub size_of_uninitialized_data: U32<LE>,
    pub address_of_entry_point: U32<LE>,
    pub base_of_code: U32<LE>,
    pub base_of_data: U32<LE>,
    pub image_base: U32<LE>,
    pub section_alignment: U32<LE>,
    pub file_alignment: U32<LE>,
    pub major_operating_system_version: U16<LE>,
    pub minor_operating_system_version: U16<LE>,
    pub major_image_version: U16<LE>,
    pub minor_image_version: U16<LE>,
    pub major_subsystem_version: U16<LE>,
    pub minor_subsystem_version: U16<LE>,
    pub win32_version_value: U32<LE>,
    pub size_of_image: U32<LE>,
    pub size_of_headers: U32<LE>,
    pub check_sum: U32<LE>,
    pub subsystem: U16<LE>,
    pub dll_characteristics: U16<LE>,
    pub size_of_stack_reserve: U32<LE>,
    pub size_of_stack_commit: U32<LE>,
    pub size_of_heap_reserve: U32<LE>,
    pub size_of_heap_commit: U32<LE>,
    pub loader_flags: U32<LE>,
    pub number_of_rva_and_sizes: U32<LE>,
}

const_assert_eq!(core::mem::size_of::<IMAGE_OPTIONAL_HEADER32>(), 96);

/// The fixed part of the PE32+ optional header.
#[repr(C)]
#[derive(Clone, Default, Eq, PartialEq, Hash, FromBytes, Immutable, KnownLayout, Unaligned)]
pub struct IMAGE_OPTIONAL_HEADER64 {
    pub magic: U16<LE>,
    pub major_linker_version: u8,
    pub minor_linker_version: u8,
    pub size_of_code: U32<LE>,
    pub size_of_initialized_data: U32<LE>,
    pub size_of_uninitialized_data: U32<LE>,
    pub address_of_entry_point: U32<LE>,
    pub base_of_code: U32<LE>,
    pub image_base: U64<LE>,
    pub section_alignment: U32<LE>,
    pub file_alignment: U32<LE>,
    pub major_operating_system_version: U16<LE>,
    pub minor_operating_system_version: U16<LE>,
    pub major_image_version: U16<LE>,
    pub minor_image_version: U16<LE>,
    pub major_subsystem_version: U16<LE>,
    pub minor_subsystem_version: U16<LE>,
    pub win32_version_value: U32<LE>,
    pub size_of_image: U32<LE>,
    pub size_of_headers: U32<LE>,
    pub check_sum: U32<LE>,
    pub subsystem: U16<LE>,
    pub dll_characteristics: U16<LE>,
    pub size_of_stack_reserve: U64<LE>,
    pub size_of_stack_commit: U64<LE>,
    pub size_of_heap_reserve: U64<LE>,
    pub size_of_heap_commit: U64<LE>,
    pub loader_flags: U32<LE>,
    pub number_of_rva_and_sizes: U32<LE>,
}

const_assert_eq!(core::mem::size_of::<IMAGE_OPTIONAL_HEADER64>(), 112);

pub const IMAGE_NT_OPTIONAL_HDR32_MAGIC: u16 = 0x10b;
pub const IMAGE_NT_OPTIONAL_HDR64_MAGIC: u16 = 0x20b;
pub const IMAGE_ROM_OPTIONAL_HDR_MAGIC: u16 = 0x107;

pub const IMAGE_SUBSYSTEM_UNKNOWN: u16 = 0;
pub const IMAGE_SUBSYSTEM_NATIVE: u16 = 1;
pub const IMAGE_SUBSYSTEM_WINDOWS_GUI: u16 = 2;
pub const IMAGE_SUBSYSTEM_WINDOWS_CUI: u16 = 3;
pub const IMAGE_SUBSYSTEM_OS2_CUI: u16 = 5;
pub const IMAGE_SUBSYSTEM_POSIX_CUI: u16 = 7;
pub const IMAGE_SUBSYSTEM_NATIVE_WINDOWS: u16 = 8;
pub const IMAGE_SUBSYSTEM_WINDOWS_CE_GUI: u16 = 9;
pub const IMAGE_SUBSYSTEM_EFI_APPLICATION: u16 = 10;
pub const IMAGE_SUBSYSTEM_EFI_BOOT_SERVICE_DRIVER: u16 = 11;
pub const IMAGE_SUBSYSTEM_EFI_RUNTIME_DRIVER: u16 = 12;
pub const IMAGE_SUBSYSTEM_EFI_ROM: u16 = 13;
pub const IMAGE_SUBSYSTEM_XBOX: u16 = 14;
pub const IMAGE_SUBSYSTEM_WINDOWS_BOOT_APPLICATION: u16 = 16;

/// Returns a short description of an `IMAGE_SUBSYSTEM_*` value.
pub fn subsystem_name(subsystem: u16) -> &'static str {
    match subsystem {
        IMAGE_SUBSYSTEM_UNKNOWN => "Unknown",
        IMAGE_SUBSYSTEM_NATIVE => "Native",
        IMAGE_SUBSYSTEM_WINDOWS_GUI => "Windows GUI",
        IMAGE_SUBSYSTEM_WINDOWS_CUI => "Windows CUI",
        IMAGE_SUBSYSTEM_OS2_CUI => "OS/2 CUI",
        IMAGE_SUBSYSTEM_POSIX_CUI => "Posix CUI",
        IMAGE_SUBSYSTEM_NATIVE_WINDOWS => "native Win9x driver",
        IMAGE_SUBSYSTEM_WINDOWS_CE_GUI => "Windows CE GUI",
        IMAGE_SUBSYSTEM_EFI_APPLICATION => "EFI application",
        IMAGE_SUBSYSTEM_EFI_BOOT_SERVICE_DRIVER => "EFI driver with boot services",
        IMAGE_SUBSYSTEM_EFI_RUNTIME_DRIVER => "EFI driver with run-time services",
        IMAGE_SUBSYSTEM_EFI_ROM => "EFI ROM image",
        IMAGE_SUBSYSTEM_XBOX => "Xbox",
        IMAGE_SUBSYSTEM_WINDOWS_BOOT_APPLICATION => "Boot application",
        _ => "Unknown",
    }
}

/// Wine writes one of these right after the DOS header of the DLLs it builds.
pub const WINE_BUILTIN_SIGNATURE: &[u8] = b"Wine builtin DLL";
/// Signature of the placeholder DLLs Wine installs into a prefix.
pub const WINE_FAKEDLL_SIGNATURE: &[u8] = b"Wine placeholder DLL";
