//! Minidump process snapshots.
//!
//! A minidump starts with `MINIDUMP_HEADER`, which points at a directory of streams. All
//! "RVAs" in a minidump are plain file offsets.

#[cfg(test)]
mod tests;

use crate::codeview::{self, CodeView};
use crate::error::{LocalError, LocalResult, isolate};
use crate::view::{Cursor, ImageView};
use crate::{Base, DirectoryEntry};
use anyhow::{Context, bail};
use bstr::BStr;
use std::mem::size_of;
use zerocopy::{LE, U16, U32, U64};
use zerocopy_derive::*;

/// `MDMP`
pub const MINIDUMP_SIGNATURE: u32 = 0x504d444d;

#[allow(missing_docs)]
#[repr(C)]
#[derive(Clone, Debug, FromBytes, Immutable, KnownLayout, Unaligned)]
pub struct MINIDUMP_HEADER {
    pub signature: U32<LE>,
    pub version: U32<LE>,
    pub number_of_streams: U32<LE>,
    pub stream_directory_rva: U32<LE>,
    pub check_sum: U32<LE>,
    pub time_date_stamp: U32<LE>,
    pub flags: U64<LE>,
}

#[allow(missing_docs)]
#[repr(C)]
#[derive(Clone, Debug, FromBytes, Immutable, KnownLayout, Unaligned)]
pub struct MINIDUMP_DIRECTORY {
    pub stream_type: U32<LE>,
    pub location: MINIDUMP_LOCATION_DESCRIPTOR,
}

#[allow(missing_docs)]
#[repr(C)]
#[derive(Clone, Debug, FromBytes, Immutable, KnownLayout, Unaligned)]
pub struct MINIDUMP_LOCATION_DESCRIPTOR {
    pub data_size: U32<LE>,
    pub rva: U32<LE>,
}

#[allow(missing_docs)]
#[repr(C)]
#[derive(Clone, Debug, FromBytes, Immutable, KnownLayout, Unaligned)]
pub struct MINIDUMP_MEMORY_DESCRIPTOR {
    pub start_of_memory_range: U64<LE>,
    pub memory: MINIDUMP_LOCATION_DESCRIPTOR,
}

#[allow(missing_docs)]
#[repr(C)]
#[derive(Clone, Debug, FromBytes, Immutable, KnownLayout, Unaligned)]
pub struct MINIDUMP_MEMORY_DESCRIPTOR64 {
    pub start_of_memory_range: U64<LE>,
    pub data_size: U64<LE>,
}

#[allow(missing_docs)]
#[repr(C)]
#[derive(Clone, Debug, FromBytes, Immutable, KnownLayout, Unaligned)]
pub struct MINIDUMP_THREAD {
    pub thread_id: U32<LE>,
    pub suspend_count: U32<LE>,
    pub priority_class: U32<LE>,
    pub priority: U32<LE>,
    pub teb: U64<LE>,
    pub stack: MINIDUMP_MEMORY_DESCRIPTOR,
    pub thread_context: MINIDUMP_LOCATION_DESCRIPTOR,
}

#[allow(missing_docs)]
#[repr(C)]
#[derive(Clone, Debug, FromBytes, Immutable, KnownLayout, Unaligned)]
pub struct VS_FIXEDFILEINFO {
    pub signature: U32<LE>,
    pub struc_version: U32<LE>,
    pub file_version_ms: U32<LE>,
    pub file_version_ls: U32<LE>,
    pub product_version_ms: U32<LE>,
    pub product_version_ls: U32<LE>,
    pub file_flags_mask: U32<LE>,
    pub file_flags: U32<LE>,
    pub file_os: U32<LE>,
    pub file_type: U32<LE>,
    pub file_subtype: U32<LE>,
    pub file_date_ms: U32<LE>,
    pub file_date_ls: U32<LE>,
}

impl VS_FIXEDFILEINFO {
    /// The file version as `a.b.c.d`.
    pub fn file_version(&self) -> String {
        let ms = self.file_version_ms.get();
        let ls = self.file_version_ls.get();
        format!("{}.{}.{}.{}", ms >> 16, ms & 0xffff, ls >> 16, ls & 0xffff)
    }
}

#[allow(missing_docs)]
#[repr(C)]
#[derive(Clone, Debug, FromBytes, Immutable, KnownLayout, Unaligned)]
pub struct MINIDUMP_MODULE {
    pub base_of_image: U64<LE>,
    pub size_of_image: U32<LE>,
    pub check_sum: U32<LE>,
    pub time_date_stamp: U32<LE>,
    pub module_name_rva: U32<LE>,
    pub version_info: VS_FIXEDFILEINFO,
    pub cv_record: MINIDUMP_LOCATION_DESCRIPTOR,
    pub misc_record: MINIDUMP_LOCATION_DESCRIPTOR,
    pub reserved0: U64<LE>,
    pub reserved1: U64<LE>,
}

#[allow(missing_docs)]
#[repr(C)]
#[derive(Clone, Debug, FromBytes, Immutable, KnownLayout, Unaligned)]
pub struct MINIDUMP_EXCEPTION {
    pub exception_code: U32<LE>,
    pub exception_flags: U32<LE>,
    pub exception_record: U64<LE>,
    pub exception_address: U64<LE>,
    pub number_parameters: U32<LE>,
    pub unused_alignment: U32<LE>,
    pub exception_information: [U64<LE>; 15],
}

#[allow(missing_docs)]
#[repr(C)]
#[derive(Clone, Debug, FromBytes, Immutable, KnownLayout, Unaligned)]
pub struct MINIDUMP_EXCEPTION_STREAM {
    pub thread_id: U32<LE>,
    pub alignment: U32<LE>,
    pub exception_record: MINIDUMP_EXCEPTION,
    pub thread_context: MINIDUMP_LOCATION_DESCRIPTOR,
}

#[allow(missing_docs)]
#[repr(C)]
#[derive(Clone, Debug, FromBytes, Immutable, KnownLayout, Unaligned)]
pub struct MINIDUMP_SYSTEM_INFO {
    pub processor_architecture: U16<LE>,
    pub processor_level: U16<LE>,
    pub processor_revision: U16<LE>,
    pub number_of_processors: u8,
    pub product_type: u8,
    pub major_version: U32<LE>,
    pub minor_version: U32<LE>,
    pub build_number: U32<LE>,
    pub platform_id: U32<LE>,
    pub csd_version_rva: U32<LE>,
    pub suite_mask: U16<LE>,
    pub reserved2: U16<LE>,
    /// For x86, the CPUID vendor id (12 bytes) then version, feature and AMD extended words.
    pub cpu: [u8; 24],
}

#[allow(missing_docs)]
#[repr(C)]
#[derive(Clone, Debug, FromBytes, Immutable, KnownLayout, Unaligned)]
pub struct MINIDUMP_UNLOADED_MODULE {
    pub base_of_image: U64<LE>,
    pub size_of_image: U32<LE>,
    pub check_sum: U32<LE>,
    pub time_date_stamp: U32<LE>,
    pub module_name_rva: U32<LE>,
}

#[allow(missing_docs)]
#[repr(C)]
#[derive(Clone, Debug, FromBytes, Immutable, KnownLayout, Unaligned)]
pub struct MINIDUMP_HANDLE_DESCRIPTOR {
    pub handle: U64<LE>,
    pub type_name_rva: U32<LE>,
    pub object_name_rva: U32<LE>,
    pub attributes: U32<LE>,
    pub granted_access: U32<LE>,
    pub handle_count: U32<LE>,
    pub pointer_count: U32<LE>,
}

static_assertions::const_assert_eq!(size_of::<MINIDUMP_HEADER>(), 32);
static_assertions::const_assert_eq!(size_of::<MINIDUMP_THREAD>(), 48);
static_assertions::const_assert_eq!(size_of::<MINIDUMP_MODULE>(), 108);
static_assertions::const_assert_eq!(size_of::<MINIDUMP_EXCEPTION_STREAM>(), 168);
static_assertions::const_assert_eq!(size_of::<MINIDUMP_SYSTEM_INFO>(), 56);
static_assertions::const_assert_eq!(size_of::<MINIDUMP_HANDLE_DESCRIPTOR>(), 32);

macro_rules! stream_types {
    ($($code:expr, $name:ident;)*) => {
        $(
            #[allow(missing_docs, non_upper_case_globals)]
            pub const $name: u32 = $code;
        )*

        static STREAM_TYPE_NAMES: &[(u32, &str)] = &[
            $(($code, stringify!($name)),)*
        ];
    }
}

stream_types! {
    0, UnusedStream;
    3, ThreadListStream;
    4, ModuleListStream;
    5, MemoryListStream;
    6, ExceptionStream;
    7, SystemInfoStream;
    8, ThreadExListStream;
    9, Memory64ListStream;
    10, CommentStreamA;
    11, CommentStreamW;
    12, HandleDataStream;
    13, FunctionTableStream;
    14, UnloadedModuleListStream;
    15, MiscInfoStream;
    16, MemoryInfoListStream;
    17, ThreadInfoListStream;
    18, HandleOperationListStream;
    19, TokenStream;
    20, JavaScriptDataStream;
    21, SystemMemoryInfoStream;
    22, ProcessVmCountersStream;
    23, IptTraceStream;
    24, ThreadNamesStream;
}

/// The name of a stream type, if it is one of the documented ones.
pub fn stream_type_name(ty: u32) -> Option<&'static str> {
    STREAM_TYPE_NAMES
        .binary_search_by_key(&ty, |&(k, _)| k)
        .ok()
        .map(|i| STREAM_TYPE_NAMES[i].1)
}

/// Name of a `PROCESSOR_ARCHITECTURE_*` value.
pub fn processor_architecture_name(arch: u16) -> &'static str {
    match arch {
        0 => "Intel",
        1 => "MIPS",
        2 => "Alpha",
        3 => "PowerPC",
        5 => "ARM",
        6 => "IA64",
        9 => "AMD64",
        12 => "ARM64",
        0xffff => "Unknown",
        _ => "???",
    }
}

/// A decoded minidump.
pub struct Minidump<'a> {
    #[allow(missing_docs)]
    pub header: &'a MINIDUMP_HEADER,
    #[allow(missing_docs)]
    pub streams: LocalResult<Vec<Stream<'a>>>,
}

/// One entry of the stream directory.
pub struct Stream<'a> {
    /// `tag` is the stream type; `offset` is a file offset.
    pub entry: DirectoryEntry,
    #[allow(missing_docs)]
    pub data: LocalResult<StreamData<'a>>,
}

#[allow(missing_docs)]
pub enum StreamData<'a> {
    Unused,
    Threads(&'a [MINIDUMP_THREAD]),
    Modules(Vec<Module<'a>>),
    Memory(&'a [MINIDUMP_MEMORY_DESCRIPTOR]),
    Memory64 {
        base_rva: u64,
        ranges: &'a [MINIDUMP_MEMORY_DESCRIPTOR64],
    },
    Exception(&'a MINIDUMP_EXCEPTION_STREAM),
    SystemInfo {
        info: &'a MINIDUMP_SYSTEM_INFO,
        csd_version: LocalResult<String>,
    },
    MiscInfo(MiscInfo),
    UnloadedModules(Vec<UnloadedModule<'a>>),
    Handles(Vec<Handle<'a>>),
    ThreadNames(Vec<ThreadName>),
    CommentA(&'a BStr),
    CommentW(String),
    /// A stream type this decoder does not know; reported by type and size.
    Other(&'a [u8]),
}

/// An entry of the module list.
pub struct Module<'a> {
    #[allow(missing_docs)]
    pub raw: &'a MINIDUMP_MODULE,
    #[allow(missing_docs)]
    pub name: LocalResult<String>,
    /// The CodeView record of the module, if it has one.
    pub codeview: Option<LocalResult<CodeView<'a>>>,
}

#[allow(missing_docs)]
pub struct UnloadedModule<'a> {
    pub raw: &'a MINIDUMP_UNLOADED_MODULE,
    pub name: LocalResult<String>,
}

#[allow(missing_docs)]
pub struct Handle<'a> {
    pub raw: &'a MINIDUMP_HANDLE_DESCRIPTOR,
    pub type_name: Option<LocalResult<String>>,
    pub object_name: Option<LocalResult<String>>,
}

#[allow(missing_docs)]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ThreadName {
    pub thread_id: u32,
    pub name: LocalResult<String>,
}

/// `MINIDUMP_MISC_INFO`, and the processor fields of `MINIDUMP_MISC_INFO_2` when present.
#[allow(missing_docs)]
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct MiscInfo {
    pub size_of_info: u32,
    pub flags1: u32,
    pub process_id: u32,
    pub process_create_time: u32,
    pub process_user_time: u32,
    pub process_kernel_time: u32,
    pub processor: Option<[u32; 5]>,
}

#[allow(missing_docs)]
pub fn decode(view: &ImageView) -> anyhow::Result<Minidump<'_>> {
    let header: &MINIDUMP_HEADER = view.get(0).context("the minidump header is truncated")?;
    if header.signature.get() != MINIDUMP_SIGNATURE {
        bail!("not a minidump");
    }

    let streams = isolate("minidump stream directory", || {
        let n = header.number_of_streams.get() as usize;
        let dirs: &[MINIDUMP_DIRECTORY] = view
            .cursor_from(header.stream_directory_rva.get() as usize)
            .ok_or(LocalError::OutOfBounds)?
            .slice(n)
            .map_err(|_| LocalError::overrun("stream directory"))?;

        Ok(dirs
            .iter()
            .map(|dir| {
                let entry = DirectoryEntry::new(
                    Base::FileOffset,
                    dir.stream_type.get(),
                    dir.location.rva.get(),
                    dir.location.data_size.get(),
                );
                let what = stream_type_name(entry.tag).unwrap_or("stream");
                tracing::debug!(ty = entry.tag, offset = entry.offset, size = entry.length, "{what}");
                let data = isolate(what, || decode_stream(view, entry));
                Stream { entry, data }
            })
            .collect())
    });

    Ok(Minidump { header, streams })
}

fn decode_stream(view: &ImageView, entry: DirectoryEntry) -> LocalResult<StreamData<'_>> {
    let mut c = view
        .cursor_at(entry.offset as usize, entry.length as usize)
        .ok_or(LocalError::overrun("stream"))?;

    Ok(match entry.tag {
        UnusedStream => StreamData::Unused,
        ThreadListStream => {
            let n = c.u32()? as usize;
            StreamData::Threads(counted(&mut c, n, "thread list")?)
        }
        ModuleListStream => {
            let n = c.u32()? as usize;
            let modules: &[MINIDUMP_MODULE] = counted(&mut c, n, "module list")?;
            StreamData::Modules(modules.iter().map(|m| decode_module(view, m)).collect())
        }
        MemoryListStream => {
            let n = c.u32()? as usize;
            StreamData::Memory(counted(&mut c, n, "memory list")?)
        }
        Memory64ListStream => {
            let n = c.u64()?;
            let base_rva = c.u64()?;
            let n = usize::try_from(n).map_err(|_| LocalError::overrun("memory64 list"))?;
            StreamData::Memory64 {
                base_rva,
                ranges: counted(&mut c, n, "memory64 list")?,
            }
        }
        ExceptionStream => StreamData::Exception(c.get()?),
        SystemInfoStream => {
            let info: &MINIDUMP_SYSTEM_INFO = c.get()?;
            let csd_version = read_string(view, info.csd_version_rva.get());
            StreamData::SystemInfo { info, csd_version }
        }
        MiscInfoStream => StreamData::MiscInfo(decode_misc_info(&mut c)?),
        UnloadedModuleListStream => {
            let size_of_header = c.u32()? as usize;
            let size_of_entry = c.u32()? as usize;
            let n = c.u32()? as usize;
            if size_of_entry < size_of::<MINIDUMP_UNLOADED_MODULE>() {
                return Err(LocalError::invalid("unloaded module entry size"));
            }
            let mut modules = Vec::new();
            for i in 0..n {
                let pos = size_of_header + i * size_of_entry;
                let raw: &MINIDUMP_UNLOADED_MODULE = c
                    .at(pos)
                    .and_then(|mut c| c.get())
                    .map_err(|_| LocalError::overrun("unloaded module list"))?;
                let name = read_string(view, raw.module_name_rva.get());
                modules.push(UnloadedModule { raw, name });
            }
            StreamData::UnloadedModules(modules)
        }
        HandleDataStream => {
            let size_of_header = c.u32()? as usize;
            let size_of_descriptor = c.u32()? as usize;
            let n = c.u32()? as usize;
            if size_of_descriptor < size_of::<MINIDUMP_HANDLE_DESCRIPTOR>() {
                return Err(LocalError::invalid("handle descriptor size"));
            }
            let mut handles = Vec::new();
            for i in 0..n {
                let pos = size_of_header + i * size_of_descriptor;
                let raw: &MINIDUMP_HANDLE_DESCRIPTOR = c
                    .at(pos)
                    .and_then(|mut c| c.get())
                    .map_err(|_| LocalError::overrun("handle data"))?;
                let opt = |rva: u32| (rva != 0).then(|| read_string(view, rva));
                handles.push(Handle {
                    raw,
                    type_name: opt(raw.type_name_rva.get()),
                    object_name: opt(raw.object_name_rva.get()),
                });
            }
            StreamData::Handles(handles)
        }
        ThreadNamesStream => {
            let n = c.u32()? as usize;
            if n.saturating_mul(12) > c.len() {
                return Err(LocalError::overrun("thread names"));
            }
            let mut names = Vec::with_capacity(n);
            for _ in 0..n {
                let thread_id = c.u32()?;
                let rva = c.u64()?;
                let name = u32::try_from(rva)
                    .map_err(|_| LocalError::OutOfBounds)
                    .and_then(|rva| read_string(view, rva));
                names.push(ThreadName { thread_id, name });
            }
            StreamData::ThreadNames(names)
        }
        CommentStreamA => {
            let bytes = c.take_rest();
            let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
            StreamData::CommentA(BStr::new(&bytes[..end]))
        }
        CommentStreamW => {
            let n = c.len() / 2;
            let s = c.utf16(n)?.to_string_lossy();
            StreamData::CommentW(s.trim_end_matches('\0').to_string())
        }
        _ => StreamData::Other(c.take_rest()),
    })
}

/// Reads `n` fixed-size items, failing if they do not fit in the stream.
fn counted<'a, T>(c: &mut Cursor<'a>, n: usize, what: &'static str) -> LocalResult<&'a [T]>
where
    T: zerocopy::FromBytes + zerocopy::Unaligned + zerocopy::Immutable,
{
    c.slice(n).map_err(|_| LocalError::overrun(what))
}

fn decode_module<'a>(view: &'a ImageView, raw: &'a MINIDUMP_MODULE) -> Module<'a> {
    let name = read_string(view, raw.module_name_rva.get());
    let cv = &raw.cv_record;
    let codeview = (cv.data_size.get() != 0).then(|| {
        isolate("module CodeView record", || {
            codeview::decode(view, cv.rva.get() as usize, cv.data_size.get() as usize)
        })
    });
    Module { raw, name, codeview }
}

fn decode_misc_info(c: &mut Cursor<'_>) -> LocalResult<MiscInfo> {
    let mut info = MiscInfo {
        size_of_info: c.u32()?,
        flags1: c.u32()?,
        process_id: c.u32()?,
        process_create_time: c.u32()?,
        process_user_time: c.u32()?,
        process_kernel_time: c.u32()?,
        processor: None,
    };
    if info.size_of_info >= 44 && c.len() >= 20 {
        info.processor = Some([c.u32()?, c.u32()?, c.u32()?, c.u32()?, c.u32()?]);
    }
    Ok(info)
}

/// Reads a `MINIDUMP_STRING`: a byte length, then UTF-16 text.
pub fn read_string(view: &ImageView, rva: u32) -> LocalResult<String> {
    let len = view.u32_at(rva as usize).ok_or(LocalError::OutOfBounds)? as usize;
    let mut c = view
        .cursor_at(rva as usize + 4, len)
        .ok_or(LocalError::overrun("string"))?;
    Ok(c.utf16(len / 2)?.to_string_lossy())
}
