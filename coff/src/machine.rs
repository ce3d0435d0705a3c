/// The `machine` field of `IMAGE_FILE_HEADER`.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct IMAGE_FILE_MACHINE(pub u16);

macro_rules! machines {
    ($($name:ident = $value:literal, $display:literal;)*) => {
        impl IMAGE_FILE_MACHINE {
            $(
                pub const $name: Self = Self($value);
            )*

            /// Returns the short architecture name used in dumps, e.g. `i386` or `AMD64`.
            pub fn to_str_opt(self) -> Option<&'static str> {
                match self.0 {
                    $(
                        $value => Some($display),
                    )*
                    _ => None,
                }
            }
        }
    }
}

machines! {
    IMAGE_FILE_MACHINE_UNKNOWN = 0x0000, "Unknown";
    IMAGE_FILE_MACHINE_I386 = 0x014c, "i386";
    IMAGE_FILE_MACHINE_R3000 = 0x0162, "R3000";
    IMAGE_FILE_MACHINE_R4000 = 0x0166, "R4000";
    IMAGE_FILE_MACHINE_R10000 = 0x0168, "R10000";
    IMAGE_FILE_MACHINE_ALPHA = 0x0184, "Alpha";
    IMAGE_FILE_MACHINE_SH3 = 0x01a2, "SH3";
    IMAGE_FILE_MACHINE_SH4 = 0x01a6, "SH4";
    IMAGE_FILE_MACHINE_ARM = 0x01c0, "ARM";
    IMAGE_FILE_MACHINE_THUMB = 0x01c2, "ARM Thumb";
    IMAGE_FILE_MACHINE_ARMNT = 0x01c4, "ARM Thumb2";
    IMAGE_FILE_MACHINE_POWERPC = 0x01f0, "PowerPC";
    IMAGE_FILE_MACHINE_IA64 = 0x0200, "IA64";
    IMAGE_FILE_MACHINE_ALPHA64 = 0x0284, "Alpha64";
    IMAGE_FILE_MACHINE_EBC = 0x0ebc, "EFI Byte Code";
    IMAGE_FILE_MACHINE_AMD64 = 0x8664, "AMD64";
    IMAGE_FILE_MACHINE_ARM64 = 0xaa64, "ARM64";
}

impl IMAGE_FILE_MACHINE {
    pub fn to_str(self) -> &'static str {
        self.to_str_opt().unwrap_or("???")
    }

    /// True for machines whose images normally use the PE32+ optional header.
    pub fn is_64bit(self) -> bool {
        matches!(
            self,
            Self::IMAGE_FILE_MACHINE_AMD64
                | Self::IMAGE_FILE_MACHINE_ARM64
                | Self::IMAGE_FILE_MACHINE_IA64
                | Self::IMAGE_FILE_MACHINE_ALPHA64
        )
    }
}

impl core::fmt::Debug for IMAGE_FILE_MACHINE {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        if let Some(s) = self.to_str_opt() {
            f.write_str(s)
        } else {
            write!(f, "??0x{:x}", self.0)
        }
    }
}

#[test]
fn machine_names() {
    assert_eq!(IMAGE_FILE_MACHINE(0x14c).to_str(), "i386");
    assert_eq!(format!("{:?}", IMAGE_FILE_MACHINE(0x8664)), "AMD64");
    assert_eq!(format!("{:?}", IMAGE_FILE_MACHINE(0x1234)), "??0x1234");
    assert!(IMAGE_FILE_MACHINE::IMAGE_FILE_MACHINE_ARM64.is_64bit());
}
