use uuid::Uuid;
use zerocopy::{LE, U16, U32};
use zerocopy_derive::*;

/// A GUID as it is stored on disk: the first three fields are little-endian.
#[repr(C)]
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash, FromBytes, Immutable, KnownLayout, Unaligned)]
pub struct GuidLe {
    #[allow(missing_docs)]
    pub data1: U32<LE>,
    #[allow(missing_docs)]
    pub data2: U16<LE>,
    #[allow(missing_docs)]
    pub data3: U16<LE>,
    #[allow(missing_docs)]
    pub data4: [u8; 8],
}

impl GuidLe {
    /// Convert the on-disk format to in-memory format.
    pub fn get(&self) -> Uuid {
        Uuid::from_fields(
            self.data1.get(),
            self.data2.get(),
            self.data3.get(),
            &self.data4,
        )
    }
}

/// Formats a GUID the way registry and typelib tools show them, in braces and upper case.
pub fn braced(guid: &Uuid) -> String {
    format!("{{{}}}", guid.hyphenated().to_string().to_uppercase())
}
