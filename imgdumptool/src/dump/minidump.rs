use super::codeview::dump_codeview;
use super::{DumpFlags, local, payload};
use dump_utils::Report;
use imgdump::minidump::{Minidump, StreamData, processor_architecture_name, stream_type_name};
use std::fmt::Write;

pub fn dump_minidump(out: &mut Report, dump: &Minidump<'_>, flags: DumpFlags) -> anyhow::Result<()> {
    let h = dump.header;
    writeln!(out, "Minidump header:")?;
    out.fields(10, |out| {
        out.field("version", format_args!("{:#010x}", h.version.get()))?;
        out.field("streams", h.number_of_streams.get())?;
        out.field("directory", format_args!("{:#x}", h.stream_directory_rva.get()))?;
        out.field("checksum", format_args!("{:#010x}", h.check_sum.get()))?;
        out.field("time stamp", format_args!("{:#010x}", h.time_date_stamp.get()))?;
        out.field("flags", format_args!("{:#x}", h.flags.get()))?;
        std::fmt::Result::Ok(())
    })?;
    writeln!(out)?;

    let streams = match &dump.streams {
        Ok(streams) => streams,
        Err(e) => {
            writeln!(out, "Stream directory: {e}")?;
            return Ok(());
        }
    };

    for (i, stream) in streams.iter().enumerate() {
        let e = stream.entry;
        writeln!(
            out,
            "Stream {i}: {} ({}), {:#x} bytes at {:#x}",
            stream_type_name(e.tag).unwrap_or("unknown"),
            e.tag,
            e.length,
            e.offset
        )?;
        out.nest(|out| match &stream.data {
            Ok(data) => dump_stream(out, data, e.offset as usize, flags),
            Err(err) => {
                writeln!(out, "{err}")?;
                Ok(())
            }
        })?;
        writeln!(out)?;
    }
    Ok(())
}

fn dump_stream(
    out: &mut Report,
    data: &StreamData<'_>,
    file_offset: usize,
    flags: DumpFlags,
) -> anyhow::Result<()> {
    match data {
        StreamData::Unused => {}
        StreamData::Threads(threads) => {
            for t in threads.iter() {
                writeln!(
                    out,
                    "thread {:#x}: suspend {}, priority {}/{}, teb {:#x}, stack {:#x} ({:#x} bytes)",
                    t.thread_id.get(),
                    t.suspend_count.get(),
                    t.priority_class.get(),
                    t.priority.get(),
                    t.teb.get(),
                    t.stack.start_of_memory_range.get(),
                    t.stack.memory.data_size.get()
                )?;
            }
        }
        StreamData::Modules(modules) => {
            for m in modules.iter() {
                let raw = m.raw;
                writeln!(out, "{}", local(&m.name))?;
                out.nest(|out| {
                    writeln!(
                        out,
                        "base {:#x}, size {:#x}, checksum {:#x}, time stamp {:#010x}",
                        raw.base_of_image.get(),
                        raw.size_of_image.get(),
                        raw.check_sum.get(),
                        raw.time_date_stamp.get()
                    )?;
                    if raw.version_info.signature.get() != 0 {
                        writeln!(out, "file version {}", raw.version_info.file_version())?;
                    }
                    match &m.codeview {
                        Some(Ok(cv)) => dump_codeview(out, cv, flags)?,
                        Some(Err(e)) => writeln!(out, "CodeView: {e}")?,
                        None => {}
                    }
                    anyhow::Ok(())
                })?;
            }
        }
        StreamData::Memory(ranges) => {
            for r in ranges.iter() {
                writeln!(
                    out,
                    "{:#018x}: {:#x} bytes at {:#x}",
                    r.start_of_memory_range.get(),
                    r.memory.data_size.get(),
                    r.memory.rva.get()
                )?;
            }
        }
        StreamData::Memory64 { base_rva, ranges } => {
            let mut rva = *base_rva;
            for r in ranges.iter() {
                writeln!(
                    out,
                    "{:#018x}: {:#x} bytes at {:#x}",
                    r.start_of_memory_range.get(),
                    r.data_size.get(),
                    rva
                )?;
                rva = rva.wrapping_add(r.data_size.get());
            }
        }
        StreamData::Exception(x) => {
            let rec = &x.exception_record;
            let n = (rec.number_parameters.get() as usize).min(rec.exception_information.len());
            out.aligned(8, |out| {
                out.field("thread", format_args!("{:#x}", x.thread_id.get()))?;
                out.field("code", format_args!("{:#010x}", rec.exception_code.get()))?;
                out.field("flags", format_args!("{:#x}", rec.exception_flags.get()))?;
                out.field("address", format_args!("{:#x}", rec.exception_address.get()))?;
                for (i, p) in rec.exception_information[..n].iter().enumerate() {
                    out.field(&format!("param {i}"), format_args!("{:#x}", p.get()))?;
                }
                std::fmt::Result::Ok(())
            })?;
        }
        StreamData::SystemInfo { info, csd_version } => {
            let arch = info.processor_architecture.get();
            out.aligned(12, |out| {
                out.field(
                    "architecture",
                    format_args!("{} ({arch})", processor_architecture_name(arch)),
                )?;
                out.field(
                    "processor",
                    format_args!(
                        "level {}, revision {:#x}, count {}",
                        info.processor_level.get(),
                        info.processor_revision.get(),
                        info.number_of_processors
                    ),
                )?;
                out.field(
                    "OS",
                    format_args!(
                        "{}.{}.{}, platform {}, product type {}",
                        info.major_version.get(),
                        info.minor_version.get(),
                        info.build_number.get(),
                        info.platform_id.get(),
                        info.product_type
                    ),
                )?;
                out.field("CSD version", local(csd_version))
            })?;
        }
        StreamData::MiscInfo(misc) => {
            out.aligned(13, |out| {
                out.field("flags", format_args!("{:#x}", misc.flags1))?;
                out.field("process id", misc.process_id)?;
                out.field(
                    "process times",
                    format_args!(
                        "create {:#x}, user {}, kernel {}",
                        misc.process_create_time, misc.process_user_time, misc.process_kernel_time
                    ),
                )?;
                if let Some(p) = &misc.processor {
                    out.field(
                        "processor",
                        format_args!(
                            "max mhz {}, current mhz {}, mhz limit {}, max idle {}, current idle {}",
                            p[0], p[1], p[2], p[3], p[4]
                        ),
                    )?;
                }
                std::fmt::Result::Ok(())
            })?;
        }
        StreamData::UnloadedModules(modules) => {
            for m in modules.iter() {
                writeln!(
                    out,
                    "{:#x} {:#x} {}",
                    m.raw.base_of_image.get(),
                    m.raw.size_of_image.get(),
                    local(&m.name)
                )?;
            }
        }
        StreamData::Handles(handles) => {
            for h in handles.iter() {
                write!(
                    out,
                    "handle {:#x}: access {:#x}, {} handles, {} pointers",
                    h.raw.handle.get(),
                    h.raw.granted_access.get(),
                    h.raw.handle_count.get(),
                    h.raw.pointer_count.get()
                )?;
                if let Some(t) = &h.type_name {
                    write!(out, ", type {}", local(t))?;
                }
                if let Some(o) = &h.object_name {
                    write!(out, ", object {}", local(o))?;
                }
                writeln!(out)?;
            }
        }
        StreamData::ThreadNames(names) => {
            for n in names.iter() {
                writeln!(out, "thread {:#x}: {}", n.thread_id, local(&n.name))?;
            }
        }
        StreamData::CommentA(s) => writeln!(out, "{s}")?,
        StreamData::CommentW(s) => writeln!(out, "{s}")?,
        StreamData::Other(bytes) => payload(out, bytes, file_offset, flags)?,
    }
    Ok(())
}
