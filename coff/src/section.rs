//! Image section headers
//!
//! # References
//! * <https://learn.microsoft.com/en-us/windows/win32/api/winnt/ns-winnt-image_section_header>

use bstr::BStr;
use core::fmt::Debug;
use core::mem::size_of;
use static_assertions::const_assert_eq;
use zerocopy::{LE, U16, U32};
use zerocopy_derive::*;

#[derive(Copy, Clone, Eq, PartialEq, Default, Hash, Ord, PartialOrd)]
#[repr(transparent)]
pub struct SectionCharacteristics(pub u32);

bitflags::bitflags! {
    impl SectionCharacteristics: u32 {
        const IMAGE_SCN_TYPE_NO_PAD                = 0x00000008;
        const IMAGE_SCN_CNT_CODE                   = 0x00000020;
        const IMAGE_SCN_CNT_INITIALIZED_DATA       = 0x00000040;
        const IMAGE_SCN_CNT_UNINITIALIZED_DATA     = 0x00000080;
        const IMAGE_SCN_LNK_OTHER                  = 0x00000100;
        const IMAGE_SCN_LNK_INFO                   = 0x00000200;
        const IMAGE_SCN_LNK_REMOVE                 = 0x00000800;
        const IMAGE_SCN_LNK_COMDAT                 = 0x00001000;
        const IMAGE_SCN_NO_DEFER_SPEC_EXC          = 0x00004000;
        const IMAGE_SCN_GPREL                      = 0x00008000;
        const IMAGE_SCN_MEM_PURGEABLE              = 0x00020000;
        const IMAGE_SCN_MEM_LOCKED                 = 0x00040000;
        const IMAGE_SCN_MEM_PRELOAD                = 0x00080000;

        // The alignment is a 4-bit field, not a set of flags.
        const IMAGE_SCN_ALIGN_MASK                 = 0x00F00000;

        const IMAGE_SCN_LNK_NRELOC_OVFL            = 0x01000000;
        const IMAGE_SCN_MEM_DISCARDABLE            = 0x02000000;
        const IMAGE_SCN_MEM_NOT_CACHED             = 0x04000000;
        const IMAGE_SCN_MEM_NOT_PAGED              = 0x08000000;
        const IMAGE_SCN_MEM_SHARED                 = 0x10000000;
        const IMAGE_SCN_MEM_EXECUTE                = 0x20000000;
        const IMAGE_SCN_MEM_READ                   = 0x40000000;
        const IMAGE_SCN_MEM_WRITE                  = 0x80000000;
    }
}

impl SectionCharacteristics {
    /// Returns true if this contains `IMAGE_SCN_MEM_READ`
    pub fn is_read(self) -> bool {
        self.intersects(Self::IMAGE_SCN_MEM_READ)
    }

    /// Returns true if this contains `IMAGE_SCN_MEM_WRITE`
    pub fn is_write(self) -> bool {
        self.intersects(Self::IMAGE_SCN_MEM_WRITE)
    }

    /// Returns true if this contains `IMAGE_SCN_MEM_EXECUTE`
    pub fn is_exec(self) -> bool {
        self.intersects(Self::IMAGE_SCN_MEM_EXECUTE)
    }

    /// Section alignment in bytes, decoded from `IMAGE_SCN_ALIGN_MASK`. Zero if unspecified.
    pub fn alignment(self) -> u32 {
        match (self.0 & Self::IMAGE_SCN_ALIGN_MASK.bits()) >> 20 {
            0 => 0,
            n => 1 << (n - 1),
        }
    }

    /// Short names for the flags that are set, in the order used by the dump output.
    pub fn names(self) -> Vec<&'static str> {
        let mut names = Vec::new();
        for (flag, name) in [
            (Self::IMAGE_SCN_TYPE_NO_PAD, "NO_PAD"),
            (Self::IMAGE_SCN_CNT_CODE, "CODE"),
            (Self::IMAGE_SCN_CNT_INITIALIZED_DATA, "INITIALIZED_DATA"),
            (Self::IMAGE_SCN_CNT_UNINITIALIZED_DATA, "UNINITIALIZED_DATA"),
            (Self::IMAGE_SCN_LNK_OTHER, "LNK_OTHER"),
            (Self::IMAGE_SCN_LNK_INFO, "LNK_INFO"),
            (Self::IMAGE_SCN_LNK_REMOVE, "LNK_REMOVE"),
            (Self::IMAGE_SCN_LNK_COMDAT, "LNK_COMDAT"),
            (Self::IMAGE_SCN_GPREL, "GPREL"),
            (Self::IMAGE_SCN_MEM_PURGEABLE, "MEM_PURGEABLE"),
            (Self::IMAGE_SCN_MEM_LOCKED, "MEM_LOCKED"),
            (Self::IMAGE_SCN_MEM_PRELOAD, "MEM_PRELOAD"),
            (Self::IMAGE_SCN_LNK_NRELOC_OVFL, "LNK_NRELOC_OVFL"),
            (Self::IMAGE_SCN_MEM_DISCARDABLE, "MEM_DISCARDABLE"),
            (Self::IMAGE_SCN_MEM_NOT_CACHED, "MEM_NOT_CACHED"),
            (Self::IMAGE_SCN_MEM_NOT_PAGED, "MEM_NOT_PAGED"),
            (Self::IMAGE_SCN_MEM_SHARED, "MEM_SHARED"),
            (Self::IMAGE_SCN_MEM_EXECUTE, "MEM_EXECUTE"),
            (Self::IMAGE_SCN_MEM_READ, "MEM_READ"),
            (Self::IMAGE_SCN_MEM_WRITE, "MEM_WRITE"),
        ] {
            if self.contains(flag) {
                names.push(name);
            }
        }
        names
    }
}

impl Debug for SectionCharacteristics {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:08x}", self.0)?;
        for name in self.names() {
            write!(f, " {name}")?;
        }
        Ok(())
    }
}

pub const IMAGE_SIZEOF_SHORT_NAME: usize = 8;

#[repr(C)]
#[derive(Clone, Default, Eq, PartialEq, Hash, FromBytes, Immutable, KnownLayout, Unaligned)]
pub struct IMAGE_SECTION_HEADER {
    pub name: [u8; IMAGE_SIZEOF_SHORT_NAME],
    pub physical_address_or_virtual_size: U32<LE>,
    pub virtual_address: U32<LE>,
    pub size_of_raw_data: U32<LE>,
    pub pointer_to_raw_data: U32<LE>,
    pub pointer_to_relocations: U32<LE>,
    pub pointer_to_linenumbers: U32<LE>,
    pub number_of_relocations: U16<LE>,
    pub number_of_linenumbers: U16<LE>,
    pub characteristics: U32<LE>,
}

impl IMAGE_SECTION_HEADER {
    pub fn name(&self) -> &BStr {
        BStr::new(if let Some(i) = self.name.iter().position(|&b| b == 0) {
            &self.name[..i]
        } else {
            &self.name
        })
    }

    pub fn characteristics(&self) -> SectionCharacteristics {
        SectionCharacteristics(self.characteristics.get())
    }

    /// If the name has the form `/nnn`, returns the decimal offset into the COFF string table
    /// that holds the real (long) name.
    pub fn long_name_offset(&self) -> Option<u32> {
        let digits = self.name().strip_prefix(b"/")?;
        core::str::from_utf8(digits).ok()?.parse().ok()
    }
}

pub const IMAGE_SIZEOF_SECTION_HEADER: usize = 40;

const_assert_eq!(
    size_of::<IMAGE_SECTION_HEADER>(),
    IMAGE_SIZEOF_SECTION_HEADER
);

#[test]
fn section_alignment() {
    assert_eq!(SectionCharacteristics(0x0030_0020).alignment(), 4);
    assert_eq!(SectionCharacteristics(0x0050_0000).alignment(), 16);
    assert_eq!(SectionCharacteristics(0x0000_0020).alignment(), 0);
}

#[test]
fn section_long_name() {
    let mut h = IMAGE_SECTION_HEADER::default();
    h.name[..4].copy_from_slice(b"/123");
    assert_eq!(h.long_name_offset(), Some(123));
    h.name = *b".text\0\0\0";
    assert_eq!(h.name(), ".text");
    assert_eq!(h.long_name_offset(), None);
}
