//! Base relocations.

use super::RvaMap;
use crate::DirectoryEntry;
use crate::error::LocalResult;
use imgdump_coff::{IMAGE_BASE_RELOCATION, split_base_reloc};
use std::mem::size_of;
use zerocopy::{LE, U16};

/// The relocations for one 4K page.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RelocBlock {
    /// RVA of the page.
    pub page: u32,
    /// `(type, offset within the page)` pairs.
    pub entries: Vec<(u16, u16)>,
}

pub(crate) fn decode(map: &RvaMap<'_>, d: DirectoryEntry) -> LocalResult<Vec<RelocBlock>> {
    let mut c = map.cursor(d.offset, d.length, "relocation directory")?;
    let mut blocks = Vec::new();

    while c.len() >= size_of::<IMAGE_BASE_RELOCATION>() {
        let block: &IMAGE_BASE_RELOCATION = c.get()?;
        let size = block.size_of_block.get() as usize;
        if size == 0 {
            break;
        }

        let count = size.saturating_sub(size_of::<IMAGE_BASE_RELOCATION>()) / 2;
        let raw: &[U16<LE>] = match c.slice(count) {
            Ok(raw) => raw,
            Err(_) => {
                tracing::warn!(page = block.virtual_address.get(), "relocation block overruns the directory");
                return Err(crate::LocalError::overrun("relocation block"));
            }
        };

        blocks.push(RelocBlock {
            page: block.virtual_address.get(),
            entries: raw.iter().map(|e| split_base_reloc(e.get())).collect(),
        });
    }

    Ok(blocks)
}
