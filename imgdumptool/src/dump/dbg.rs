use super::pe::{dump_debug_entries, dump_sections};
use super::{DumpFlags, symbol_name, table};
use dump_utils::Report;
use imgdump::dbg::DbgFile;
use std::fmt::Write;

pub fn dump_dbg(out: &mut Report, file: &DbgFile<'_>, flags: DumpFlags) -> anyhow::Result<()> {
    let h = file.header;
    let machine = file.machine();

    writeln!(out, "Separate debug header:")?;
    out.fields(15, |out| {
        out.field("flags", format_args!("{:#06x}", h.flags.get()))?;
        out.field("machine", format_args!("{:#06x} ({})", machine.0, machine.to_str()))?;
        out.field("characteristics", format_args!("{:#06x}", h.characteristics.get()))?;
        out.field("time stamp", format_args!("{:#010x}", h.time_date_stamp.get()))?;
        out.field("checksum", format_args!("{:#010x}", h.check_sum.get()))?;
        out.field("image base", format_args!("{:#x}", h.image_base.get()))?;
        out.field("size of image", format_args!("{:#x}", h.size_of_image.get()))?;
        out.field("sections", h.number_of_sections.get())?;
        out.field("exported names", format_args!("{:#x} bytes", h.exported_names_size.get()))?;
        out.field("debug directory", format_args!("{:#x} bytes", h.debug_directory_size.get()))?;
        out.field("alignment", format_args!("{:#x}", h.section_alignment.get()))?;
        std::fmt::Result::Ok(())
    })?;
    writeln!(out)?;

    table(out, "Sections", Some(&file.sections), |out, sections| {
        dump_sections(out, sections)?;
        Ok(())
    })?;
    table(out, "Exported names", Some(&file.exported_names), |out, names| {
        for name in names.iter() {
            writeln!(out, "{}", symbol_name(name, flags))?;
        }
        Ok(())
    })?;
    table(out, "Debug directory", Some(&file.debug), |out, entries| {
        dump_debug_entries(out, entries, flags)
    })?;
    Ok(())
}
