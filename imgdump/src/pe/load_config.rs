//! The load configuration directory.
//!
//! The structure has grown with almost every Windows release. Its first field gives the size
//! the linker wrote, and only the fields that fit inside both that size and the data directory
//! are decoded.

use super::RvaMap;
use crate::DirectoryEntry;
use crate::error::{LocalError, LocalResult, isolate};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Width {
    U16,
    U32,
    /// 4 bytes in PE32 images, 8 in PE32+.
    Pointer,
}

use Width::*;

const HEAD: &[(&str, Width)] = &[
    ("Size", U32),
    ("TimeDateStamp", U32),
    ("MajorVersion", U16),
    ("MinorVersion", U16),
    ("GlobalFlagsClear", U32),
    ("GlobalFlagsSet", U32),
    ("CriticalSectionDefaultTimeout", U32),
    ("DeCommitFreeBlockThreshold", Pointer),
    ("DeCommitTotalFreeThreshold", Pointer),
    ("LockPrefixTable", Pointer),
    ("MaximumAllocationSize", Pointer),
    ("VirtualMemoryThreshold", Pointer),
];

// These two swap places between the 32-bit and 64-bit layouts.
const MIDDLE_32: &[(&str, Width)] = &[("ProcessHeapFlags", U32), ("ProcessAffinityMask", Pointer)];
const MIDDLE_64: &[(&str, Width)] = &[("ProcessAffinityMask", Pointer), ("ProcessHeapFlags", U32)];

const TAIL: &[(&str, Width)] = &[
    ("CSDVersion", U16),
    ("DependentLoadFlags", U16),
    ("EditList", Pointer),
    ("SecurityCookie", Pointer),
    ("SEHandlerTable", Pointer),
    ("SEHandlerCount", Pointer),
    ("GuardCFCheckFunctionPointer", Pointer),
    ("GuardCFDispatchFunctionPointer", Pointer),
    ("GuardCFFunctionTable", Pointer),
    ("GuardCFFunctionCount", Pointer),
    ("GuardFlags", U32),
    ("CodeIntegrity.Flags", U16),
    ("CodeIntegrity.Catalog", U16),
    ("CodeIntegrity.CatalogOffset", U32),
    ("CodeIntegrity.Reserved", U32),
    ("GuardAddressTakenIatEntryTable", Pointer),
    ("GuardAddressTakenIatEntryCount", Pointer),
    ("GuardLongJumpTargetTable", Pointer),
    ("GuardLongJumpTargetCount", Pointer),
    ("DynamicValueRelocTable", Pointer),
    ("CHPEMetadataPointer", Pointer),
    ("GuardRFFailureRoutine", Pointer),
    ("GuardRFFailureRoutineFunctionPointer", Pointer),
    ("DynamicValueRelocTableOffset", U32),
    ("DynamicValueRelocTableSection", U16),
    ("Reserved2", U16),
    ("GuardRFVerifyStackPointerFunctionPointer", Pointer),
    ("HotPatchTableOffset", U32),
    ("Reserved3", U32),
    ("EnclaveConfigurationPointer", Pointer),
    ("VolatileMetadataPointer", Pointer),
    ("GuardEHContinuationTable", Pointer),
    ("GuardEHContinuationCount", Pointer),
    ("GuardXFGCheckFunctionPointer", Pointer),
    ("GuardXFGDispatchFunctionPointer", Pointer),
    ("GuardXFGTableDispatchFunctionPointer", Pointer),
    ("CastGuardOsDeterminedFailureMode", Pointer),
    ("GuardMemcpyFunctionPointer", Pointer),
];

/// One decoded field of the load configuration.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LoadConfigField {
    /// The field name as declared in `winnt.h`.
    pub name: &'static str,
    /// Size of the field in bytes.
    pub size: u8,
    #[allow(missing_docs)]
    pub value: u64,
}

/// The load configuration directory.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LoadConfig {
    /// The fields present, in declaration order.
    pub fields: Vec<LoadConfigField>,
    /// The safe exception handler table of a 32-bit image, as RVAs.
    pub se_handlers: Option<LocalResult<Vec<u32>>>,
}

impl LoadConfig {
    /// Looks up a field by name.
    pub fn get(&self, name: &str) -> Option<u64> {
        self.fields.iter().find(|f| f.name == name).map(|f| f.value)
    }
}

pub(crate) fn decode(map: &RvaMap<'_>, d: DirectoryEntry) -> LocalResult<LoadConfig> {
    let declared = map.u32(d.offset)?;
    let limit = declared.min(d.length);
    let mut c = map.cursor(d.offset, limit, "load configuration")?;

    let middle = if map.is_64bit { MIDDLE_64 } else { MIDDLE_32 };
    let mut fields = Vec::new();
    for &(name, width) in HEAD.iter().chain(middle).chain(TAIL) {
        let (size, value) = match width {
            U16 if c.len() >= 2 => (2, c.u16()? as u64),
            U32 if c.len() >= 4 => (4, c.u32()? as u64),
            Pointer if map.is_64bit && c.len() >= 8 => (8, c.u64()?),
            Pointer if !map.is_64bit && c.len() >= 4 => (4, c.u32()? as u64),
            _ => break,
        };
        fields.push(LoadConfigField { name, size, value });
    }
    tracing::debug!(declared, fields = fields.len(), "load configuration");

    let mut config = LoadConfig {
        fields,
        se_handlers: None,
    };

    // Only x86 images register their handlers in a table.
    if !map.is_64bit {
        if let (Some(table), Some(count)) =
            (config.get("SEHandlerTable"), config.get("SEHandlerCount"))
        {
            if table != 0 && count != 0 {
                config.se_handlers =
                    Some(isolate("SafeSEH handlers", || read_handlers(map, table, count)));
            }
        }
    }

    Ok(config)
}

fn read_handlers(map: &RvaMap<'_>, va: u64, count: u64) -> LocalResult<Vec<u32>> {
    let rva = va
        .checked_sub(map.image_base)
        .and_then(|rva| u32::try_from(rva).ok())
        .ok_or(LocalError::invalid("handler table is outside the image"))?;
    let size = count
        .checked_mul(4)
        .and_then(|n| u32::try_from(n).ok())
        .ok_or(LocalError::overrun("SafeSEH handlers"))?;

    let mut c = map.cursor(rva, size, "SafeSEH handlers")?;
    let mut handlers = Vec::with_capacity(count as usize);
    while !c.is_empty() {
        handlers.push(c.u32()?);
    }
    Ok(handlers)
}
