//! The CLR header of managed images, and the root of the metadata it points at.

use super::RvaMap;
use crate::DirectoryEntry;
use crate::error::{LocalError, LocalResult, isolate};
use bstr::BStr;
use imgdump_coff::{CLR_METADATA_SIGNATURE, IMAGE_COR20_HEADER};
use std::mem::size_of;

/// The decoded CLR header.
pub struct Clr<'a> {
    #[allow(missing_docs)]
    pub header: &'a IMAGE_COR20_HEADER,
    /// The metadata root, if the metadata directory is present.
    pub metadata: Option<LocalResult<MetadataRoot<'a>>>,
}

/// The metadata root (`BSJB` header) and its stream headers.
pub struct MetadataRoot<'a> {
    #[allow(missing_docs)]
    pub version: (u16, u16),
    /// The runtime version string, e.g. `v4.0.30319`.
    pub runtime: &'a BStr,
    #[allow(missing_docs)]
    pub flags: u16,
    #[allow(missing_docs)]
    pub streams: Vec<MetadataStream<'a>>,
}

/// A metadata stream header. The offset is relative to the metadata root.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MetadataStream<'a> {
    #[allow(missing_docs)]
    pub offset: u32,
    #[allow(missing_docs)]
    pub size: u32,
    /// E.g. `#~`, `#Strings`, `#Blob`.
    pub name: &'a BStr,
}

pub(crate) fn decode<'a>(map: &RvaMap<'a>, d: DirectoryEntry) -> LocalResult<Clr<'a>> {
    let header: &IMAGE_COR20_HEADER = map
        .cursor(d.offset, size_of::<IMAGE_COR20_HEADER>() as u32, "CLR header")?
        .get()?;

    let md = &header.metadata;
    let metadata = if md.virtual_address.get() != 0 && md.size.get() != 0 {
        Some(isolate("CLR metadata", || {
            decode_metadata(map, md.virtual_address.get(), md.size.get())
        }))
    } else {
        None
    };

    Ok(Clr { header, metadata })
}

fn decode_metadata<'a>(map: &RvaMap<'a>, rva: u32, size: u32) -> LocalResult<MetadataRoot<'a>> {
    let mut c = map.cursor(rva, size, "CLR metadata")?;
    if c.u32()? != CLR_METADATA_SIGNATURE {
        return Err(LocalError::bad_signature("BSJB"));
    }
    let major = c.u16()?;
    let minor = c.u16()?;
    let _reserved = c.u32()?;

    // The version string is padded to a multiple of 4 bytes.
    let len = c.u32()? as usize;
    let padded = c.bytes(len).map_err(|_| LocalError::overrun("CLR version string"))?;
    let end = padded.iter().position(|&b| b == 0).unwrap_or(padded.len());
    let runtime = BStr::new(&padded[..end]);

    let flags = c.u16()?;
    let count = c.u16()?;
    let mut streams = Vec::new();
    for _ in 0..count {
        let offset = c.u32()?;
        let size = c.u32()?;
        let name = c.strz()?;
        c.align(4).or_else(|_| c.seek(c.window().len()))?;
        streams.push(MetadataStream { offset, size, name });
    }
    tracing::debug!(%runtime, streams = streams.len(), "CLR metadata root");

    Ok(MetadataRoot {
        version: (major, minor),
        runtime,
        flags,
        streams,
    })
}
