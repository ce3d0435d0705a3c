//! The thread-local storage directory.

use super::RvaMap;
use crate::DirectoryEntry;
use crate::error::{LocalError, LocalResult};
use imgdump_coff::{IMAGE_TLS_DIRECTORY32, IMAGE_TLS_DIRECTORY64};
use std::mem::size_of;

/// The TLS directory, widened to 64 bits. Addresses are virtual addresses, not RVAs.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Tls {
    #[allow(missing_docs)]
    pub start_address_of_raw_data: u64,
    #[allow(missing_docs)]
    pub end_address_of_raw_data: u64,
    #[allow(missing_docs)]
    pub address_of_index: u64,
    #[allow(missing_docs)]
    pub address_of_callbacks: u64,
    #[allow(missing_docs)]
    pub size_of_zero_fill: u32,
    #[allow(missing_docs)]
    pub characteristics: u32,
    /// The callback addresses, up to the null terminator.
    pub callbacks: LocalResult<Vec<u64>>,
}

pub(crate) fn decode(map: &RvaMap<'_>, d: DirectoryEntry) -> LocalResult<Tls> {
    let mut tls = if map.is_64bit {
        let dir: &IMAGE_TLS_DIRECTORY64 = map
            .cursor(d.offset, size_of::<IMAGE_TLS_DIRECTORY64>() as u32, "TLS directory")?
            .get()?;
        Tls {
            start_address_of_raw_data: dir.start_address_of_raw_data.get(),
            end_address_of_raw_data: dir.end_address_of_raw_data.get(),
            address_of_index: dir.address_of_index.get(),
            address_of_callbacks: dir.address_of_call_backs.get(),
            size_of_zero_fill: dir.size_of_zero_fill.get(),
            characteristics: dir.characteristics.get(),
            callbacks: Ok(Vec::new()),
        }
    } else {
        let dir: &IMAGE_TLS_DIRECTORY32 = map
            .cursor(d.offset, size_of::<IMAGE_TLS_DIRECTORY32>() as u32, "TLS directory")?
            .get()?;
        Tls {
            start_address_of_raw_data: dir.start_address_of_raw_data.get() as u64,
            end_address_of_raw_data: dir.end_address_of_raw_data.get() as u64,
            address_of_index: dir.address_of_index.get() as u64,
            address_of_callbacks: dir.address_of_call_backs.get() as u64,
            size_of_zero_fill: dir.size_of_zero_fill.get(),
            characteristics: dir.characteristics.get(),
            callbacks: Ok(Vec::new()),
        }
    };

    if tls.address_of_callbacks != 0 {
        tls.callbacks = read_callbacks(map, tls.address_of_callbacks);
    }

    Ok(tls)
}

fn read_callbacks(map: &RvaMap<'_>, va: u64) -> LocalResult<Vec<u64>> {
    let mut rva = va
        .checked_sub(map.image_base)
        .and_then(|rva| u32::try_from(rva).ok())
        .ok_or(LocalError::invalid("TLS callback array is outside the image"))?;

    let mut callbacks = Vec::new();
    loop {
        let callback = map.pointer(rva)?;
        if callback == 0 {
            break;
        }
        callbacks.push(callback);
        rva = rva
            .checked_add(map.pointer_size())
            .ok_or(LocalError::overrun("TLS callbacks"))?;
    }
    Ok(callbacks)
}
