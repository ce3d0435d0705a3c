//! The export directory.

use super::RvaMap;
use crate::DirectoryEntry;
use crate::error::{LocalError, LocalResult};
use bstr::BStr;
use imgdump_coff::IMAGE_EXPORT_DIRECTORY;
use std::mem::size_of;
use zerocopy::{LE, U16, U32};

/// The decoded export directory.
pub struct Exports<'a> {
    #[allow(missing_docs)]
    pub dir: &'a IMAGE_EXPORT_DIRECTORY,
    /// The name of the module, as recorded by the linker.
    pub dll_name: LocalResult<&'a BStr>,
    /// Exported functions in ordinal order. Unused slots of the address table are skipped.
    pub entries: Vec<Export<'a>>,
}

/// One exported function.
pub struct Export<'a> {
    #[allow(missing_docs)]
    pub ordinal: u32,
    /// RVA of the function, or of the forwarder string.
    pub rva: u32,
    /// `None` for exports by ordinal only.
    pub name: Option<LocalResult<&'a BStr>>,
    /// Set when `rva` points back into the export directory: `"OTHERDLL.Function"`.
    pub forwarder: Option<LocalResult<&'a BStr>>,
}

pub(crate) fn decode<'a>(map: &RvaMap<'a>, d: DirectoryEntry) -> LocalResult<Exports<'a>> {
    let dir: &IMAGE_EXPORT_DIRECTORY = map
        .cursor(d.offset, size_of::<IMAGE_EXPORT_DIRECTORY>() as u32, "export directory")?
        .get()?;

    let dll_name = map.strz(dir.name.get());

    let num_functions = dir.number_of_functions.get();
    let num_names = dir.number_of_names.get();

    let functions: &[U32<LE>] = map
        .cursor(
            dir.address_of_functions.get(),
            num_functions.checked_mul(4).ok_or(LocalError::overrun("export address table"))?,
            "export address table",
        )?
        .slice(num_functions as usize)?;

    // Both name arrays are optional; a module can export by ordinal only.
    let (names, ordinals): (&[U32<LE>], &[U16<LE>]) = if num_names != 0 {
        let names = map
            .cursor(
                dir.address_of_names.get(),
                num_names.checked_mul(4).ok_or(LocalError::overrun("export name table"))?,
                "export name table",
            )?
            .slice(num_names as usize)?;
        let ordinals = map
            .cursor(
                dir.address_of_name_ordinals.get(),
                num_names * 2,
                "export ordinal table",
            )?
            .slice(num_names as usize)?;
        (names, ordinals)
    } else {
        (&[], &[])
    };

    let mut func_names: Vec<Option<u32>> = vec![None; functions.len()];
    for (name_rva, ordinal) in names.iter().zip(ordinals.iter()) {
        if let Some(slot) = func_names.get_mut(ordinal.get() as usize) {
            *slot = Some(name_rva.get());
        } else {
            tracing::warn!(ordinal = ordinal.get(), "export name refers to a missing function");
        }
    }

    let dir_end = d.offset.saturating_add(d.length);
    let mut entries = Vec::new();

    for (i, function) in functions.iter().enumerate() {
        let rva = function.get();
        if rva == 0 {
            continue;
        }

        let forwarder = if rva >= d.offset && rva < dir_end {
            Some(map.strz(rva))
        } else {
            None
        };

        entries.push(Export {
            ordinal: dir.base.get().wrapping_add(i as u32),
            rva,
            name: func_names[i].map(|name_rva| map.strz(name_rva)),
            forwarder,
        });
    }

    tracing::trace!(num_functions, num_names, "exports");

    Ok(Exports {
        dir,
        dll_name,
        entries,
    })
}
