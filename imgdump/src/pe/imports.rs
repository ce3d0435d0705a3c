//! Import and delay-load import directories.

use super::RvaMap;
use crate::DirectoryEntry;
use crate::error::{LocalError, LocalResult};
use bstr::BStr;
use imgdump_coff::{
    DELAYLOAD_RVA_BASED, IMAGE_DELAYLOAD_DESCRIPTOR, IMAGE_IMPORT_DESCRIPTOR, IMAGE_ORDINAL_FLAG32,
    IMAGE_ORDINAL_FLAG64,
};
use std::mem::size_of;

/// One DLL named by an import or delay-import descriptor.
pub struct ImportedDll<'a> {
    #[allow(missing_docs)]
    pub name: LocalResult<&'a BStr>,
    /// Time stamp from the descriptor; for bound imports, the time stamp of the bound DLL.
    pub time_date_stamp: u32,
    /// Forwarder chain (regular imports) or attributes (delay imports).
    pub flags: u32,
    /// RVA of the name/ordinal table that was walked.
    pub lookup_table: u32,
    /// RVA of the import address table.
    pub address_table: u32,
    #[allow(missing_docs)]
    pub thunks: LocalResult<Vec<ImportThunk<'a>>>,
}

/// One entry of an import lookup table.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ImportThunk<'a> {
    #[allow(missing_docs)]
    Ordinal(u16),
    #[allow(missing_docs)]
    Name {
        hint: u16,
        name: LocalResult<&'a BStr>,
    },
}

pub(crate) fn decode_imports<'a>(
    map: &RvaMap<'a>,
    d: DirectoryEntry,
) -> LocalResult<Vec<ImportedDll<'a>>> {
    const DESC_SIZE: u32 = size_of::<IMAGE_IMPORT_DESCRIPTOR>() as u32;

    let mut dlls = Vec::new();
    let mut rva = d.offset;

    loop {
        let desc: &IMAGE_IMPORT_DESCRIPTOR =
            map.cursor(rva, DESC_SIZE, "import descriptor")?.get()?;
        if desc.name.get() == 0 || desc.first_thunk.get() == 0 {
            break;
        }

        // Old binders leave the lookup table empty; the address table still has the names.
        let lookup = match desc.original_first_thunk.get() {
            0 => desc.first_thunk.get(),
            t => t,
        };

        dlls.push(ImportedDll {
            name: map.strz(desc.name.get()),
            time_date_stamp: desc.time_date_stamp.get(),
            flags: desc.forwarder_chain.get(),
            lookup_table: lookup,
            address_table: desc.first_thunk.get(),
            thunks: read_thunks(map, lookup, 0),
        });

        rva = rva
            .checked_add(DESC_SIZE)
            .ok_or(LocalError::overrun("import descriptors"))?;
    }

    Ok(dlls)
}

pub(crate) fn decode_delay_imports<'a>(
    map: &RvaMap<'a>,
    d: DirectoryEntry,
) -> LocalResult<Vec<ImportedDll<'a>>> {
    const DESC_SIZE: u32 = size_of::<IMAGE_DELAYLOAD_DESCRIPTOR>() as u32;

    let mut dlls = Vec::new();
    let mut rva = d.offset;

    loop {
        let desc: &IMAGE_DELAYLOAD_DESCRIPTOR =
            map.cursor(rva, DESC_SIZE, "delay import descriptor")?.get()?;
        if desc.dll_name_rva.get() == 0 {
            break;
        }

        let attributes = desc.attributes.get();

        // Version 1 descriptors hold virtual addresses; version 2 hold RVAs.
        let bias = if attributes & DELAYLOAD_RVA_BASED != 0 {
            0
        } else {
            map.image_base as u32
        };

        let lookup = desc.import_name_table_rva.get().wrapping_sub(bias);

        dlls.push(ImportedDll {
            name: map.strz(desc.dll_name_rva.get().wrapping_sub(bias)),
            time_date_stamp: desc.time_date_stamp.get(),
            flags: attributes,
            lookup_table: lookup,
            address_table: desc.import_address_table_rva.get().wrapping_sub(bias),
            thunks: read_thunks(map, lookup, bias),
        });

        rva = rva
            .checked_add(DESC_SIZE)
            .ok_or(LocalError::overrun("delay import descriptors"))?;
    }

    Ok(dlls)
}

/// Walks a lookup table until its zero terminator. `bias` is subtracted from hint/name pointers.
fn read_thunks<'a>(map: &RvaMap<'a>, table: u32, bias: u32) -> LocalResult<Vec<ImportThunk<'a>>> {
    let step = map.pointer_size();
    let mut thunks = Vec::new();
    let mut rva = table;

    loop {
        let value = map.pointer(rva)?;
        if value == 0 {
            break;
        }

        let by_ordinal = if map.is_64bit {
            value & IMAGE_ORDINAL_FLAG64 != 0
        } else {
            value & IMAGE_ORDINAL_FLAG32 as u64 != 0
        };

        if by_ordinal {
            thunks.push(ImportThunk::Ordinal(value as u16));
        } else {
            let hint_rva = (value as u32).wrapping_sub(bias);
            let hint = map.cursor(hint_rva, 2, "import hint")?.u16()?;
            thunks.push(ImportThunk::Name {
                hint,
                name: map.strz(hint_rva.wrapping_add(2)),
            });
        }

        rva = rva
            .checked_add(step)
            .ok_or(LocalError::overrun("import lookup table"))?;
    }

    Ok(thunks)
}
