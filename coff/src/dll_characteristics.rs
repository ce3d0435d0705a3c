/// The `dll_characteristics` field of the optional header.
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[repr(transparent)]
pub struct IMAGE_DLLCHARACTERISTICS(pub u16);

/// Image can handle a high entropy 64-bit virtual address space.
pub const IMAGE_DLLCHARACTERISTICS_HIGH_ENTROPY_VA: u16 = 0x0020;
/// DLL can move.
pub const IMAGE_DLLCHARACTERISTICS_DYNAMIC_BASE: u16 = 0x0040;
/// Code Integrity Image
pub const IMAGE_DLLCHARACTERISTICS_FORCE_INTEGRITY: u16 = 0x0080;
/// Image is NX compatible
pub const IMAGE_DLLCHARACTERISTICS_NX_COMPAT: u16 = 0x0100;
pub const IMAGE_DLLCHARACTERISTICS_NO_ISOLATION: u16 = 0x0200;
/// Image does not use SEH.  No SE handler may reside in this image
pub const IMAGE_DLLCHARACTERISTICS_NO_SEH: u16 = 0x0400;
pub const IMAGE_DLLCHARACTERISTICS_NO_BIND: u16 = 0x0800;
pub const IMAGE_DLLCHARACTERISTICS_APPCONTAINER: u16 = 0x1000;
pub const IMAGE_DLLCHARACTERISTICS_WDM_DRIVER: u16 = 0x2000;
/// Image supports Control Flow Guard.
pub const IMAGE_DLLCHARACTERISTICS_GUARD_CF: u16 = 0x4000;
pub const IMAGE_DLLCHARACTERISTICS_TERMINAL_SERVER_AWARE: u16 = 0x8000;

static DLL_CHARACTERISTICS_NAMES: &[(u16, &str)] = &[
    (IMAGE_DLLCHARACTERISTICS_HIGH_ENTROPY_VA, "HIGH_ENTROPY_VA"),
    (IMAGE_DLLCHARACTERISTICS_DYNAMIC_BASE, "DYNAMIC_BASE"),
    (IMAGE_DLLCHARACTERISTICS_FORCE_INTEGRITY, "FORCE_INTEGRITY"),
    (IMAGE_DLLCHARACTERISTICS_NX_COMPAT, "NX_COMPAT"),
    (IMAGE_DLLCHARACTERISTICS_NO_ISOLATION, "NO_ISOLATION"),
    (IMAGE_DLLCHARACTERISTICS_NO_SEH, "NO_SEH"),
    (IMAGE_DLLCHARACTERISTICS_NO_BIND, "NO_BIND"),
    (IMAGE_DLLCHARACTERISTICS_APPCONTAINER, "APPCONTAINER"),
    (IMAGE_DLLCHARACTERISTICS_WDM_DRIVER, "WDM_DRIVER"),
    (IMAGE_DLLCHARACTERISTICS_GUARD_CF, "GUARD_CF"),
    (
        IMAGE_DLLCHARACTERISTICS_TERMINAL_SERVER_AWARE,
        "TERMINAL_SERVER_AWARE",
    ),
];

impl IMAGE_DLLCHARACTERISTICS {
    /// Names of the bits that are set.
    pub fn names(self) -> impl Iterator<Item = &'static str> {
        DLL_CHARACTERISTICS_NAMES
            .iter()
            .filter(move |(bit, _)| self.0 & bit != 0)
            .map(|(_, name)| *name)
    }
}

impl core::fmt::Debug for IMAGE_DLLCHARACTERISTICS {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(f, "0x{:04x}", self.0)?;
        for name in self.names() {
            write!(f, " {name}")?;
        }
        Ok(())
    }
}

#[test]
fn dll_characteristics_debug() {
    let c = IMAGE_DLLCHARACTERISTICS(0x0140);
    assert_eq!(format!("{c:?}"), "0x0140 DYNAMIC_BASE NX_COMPAT");
}
