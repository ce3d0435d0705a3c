use super::ne::dump_names;
use super::{DumpFlags, table};
use dump_utils::Report;
use imgdump::le::LeImage;
use imgdump_coff::{LE_OBJ_EXECUTABLE, LE_OBJ_READABLE, LE_OBJ_WRITABLE};
use std::fmt::Write;

pub fn dump_le(out: &mut Report, image: &LeImage<'_>, flags: DumpFlags) -> anyhow::Result<()> {
    let h = image.header;

    writeln!(out, "LE header (at {:#x}):", image.header_offset)?;
    out.fields(15, |out| {
        out.field("byte/word order", format_args!("{}/{}", h.e32_border, h.e32_worder))?;
        out.field("cpu", format_args!("{:#x}", h.e32_cpu.get()))?;
        out.field("os", format_args!("{:#x}", h.e32_os.get()))?;
        out.field("module version", format_args!("{:#x}", h.e32_ver.get()))?;
        out.field("module flags", format_args!("{:#010x}", h.e32_mflags.get()))?;
        out.field("pages", h.e32_mpages.get())?;
        out.field("cs:eip", format_args!("{}:{:08x}", h.e32_startobj.get(), h.e32_eip.get()))?;
        out.field("ss:esp", format_args!("{}:{:08x}", h.e32_stackobj.get(), h.e32_esp.get()))?;
        out.field("page size", format_args!("{:#x}", h.e32_pagesize.get()))?;
        out.field("objects", h.e32_objcnt.get())?;
        out.field("device id", format_args!("{:#06x}", h.e32_devid.get()))?;
        out.field("DDK version", format_args!("{:#06x}", h.e32_ddkver.get()))?;
        std::fmt::Result::Ok(())
    })?;
    writeln!(out)?;

    table(out, "Objects", Some(&image.objects), |out, objects| {
        writeln!(out, "#   size      base      flags     pages")?;
        for (i, o) in objects.iter().enumerate() {
            let f = o.flags.get();
            writeln!(
                out,
                "{:<3} {:08x}  {:08x}  {:08x}  {} at {}  {}{}{}",
                i + 1,
                o.size.get(),
                o.base.get(),
                f,
                o.mapsize.get(),
                o.pagemap.get(),
                if f & LE_OBJ_READABLE != 0 { "R" } else { "-" },
                if f & LE_OBJ_WRITABLE != 0 { "W" } else { "-" },
                if f & LE_OBJ_EXECUTABLE != 0 { "X" } else { "-" },
            )?;
        }
        Ok(())
    })?;

    table(out, "Resident names", Some(&image.resident_names), |out, names| {
        dump_names(out, names, flags)
    })?;
    table(out, "Non-resident names", Some(&image.nonresident_names), |out, names| {
        dump_names(out, names, flags)
    })?;

    table(out, "Entry points", Some(&image.entries), |out, entries| {
        for e in entries.iter() {
            writeln!(
                out,
                "{:<5} object {} offset {:08x} type {} flags {:02x}",
                e.ordinal, e.object, e.offset, e.kind, e.flags
            )?;
        }
        Ok(())
    })?;

    table(out, "Device description block", image.ddb.as_ref(), |out, ddb| {
        out.aligned(13, |out| {
            out.opt_field("name", image.device_name())?;
            out.field("SDK version", format_args!("{:#06x}", ddb.sdk_version.get()))?;
            out.field("device number", format_args!("{:#06x}", ddb.req_device_number.get()))?;
            out.field(
                "version",
                format_args!("{}.{}", ddb.dev_major_version, ddb.dev_minor_version),
            )?;
            out.field("init order", format_args!("{:#010x}", ddb.init_order.get()))?;
            out.field("control proc", format_args!("{:#010x}", ddb.control_proc.get()))?;
            out.field("V86 API proc", format_args!("{:#010x}", ddb.v86_api_proc.get()))?;
            out.field("PM API proc", format_args!("{:#010x}", ddb.pm_api_proc.get()))
        })?;
        Ok(())
    })?;
    Ok(())
}
