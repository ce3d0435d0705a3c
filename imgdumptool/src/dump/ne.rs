use super::{DumpFlags, local, symbol_name, table};
use dump_utils::Report;
use imgdump::ne::{NeImage, NeName, NeResourceId};
use imgdump_coff::{NE_SEGFLAGS_DATA, NE_SEGFLAGS_MOVEABLE, NE_SEGFLAGS_PRELOAD, resource_type_name};
use std::fmt::Write;

pub fn dump_ne(out: &mut Report, image: &NeImage<'_>, flags: DumpFlags) -> anyhow::Result<()> {
    let h = image.header;

    writeln!(out, "NE header (at {:#x}):", image.header_offset)?;
    out.fields(15, |out| {
        out.field("linker version", format_args!("{}.{}", h.ne_ver, h.ne_rev))?;
        out.field("flags", format_args!("{:#06x}", h.ne_flags.get()))?;
        out.field("auto data", h.ne_autodata.get())?;
        out.field("heap", format_args!("{:#x}", h.ne_heap.get()))?;
        out.field("stack", format_args!("{:#x}", h.ne_stack.get()))?;
        let csip = h.ne_csip.get();
        out.field("cs:ip", format_args!("{:04x}:{:04x}", csip >> 16, csip & 0xffff))?;
        let sssp = h.ne_sssp.get();
        out.field("ss:sp", format_args!("{:04x}:{:04x}", sssp >> 16, sssp & 0xffff))?;
        out.field("segments", h.ne_cseg.get())?;
        out.field("modules", h.ne_cmod.get())?;
        out.field("alignment shift", h.ne_align.get())?;
        out.field("target OS", h.ne_exetyp)?;
        let expver = h.ne_expver.get();
        out.field("expected Windows version", format_args!("{}.{}", expver >> 8, expver & 0xff))?;
        std::fmt::Result::Ok(())
    })?;
    writeln!(out)?;

    table(out, "Segments", Some(&image.segments), |out, segments| {
        writeln!(out, "#   offset    length  flags  min alloc")?;
        for (i, seg) in segments.iter().enumerate() {
            let f = seg.flags.get();
            writeln!(
                out,
                "{:<3} {:08x}  {:06x}  {:04x}   {:06x}  {}{}{}",
                i + 1,
                image.segment_file_offset(seg),
                seg.length.get(),
                f,
                seg.min_alloc.get(),
                if f & NE_SEGFLAGS_DATA != 0 { "DATA" } else { "CODE" },
                if f & NE_SEGFLAGS_MOVEABLE != 0 { " MOVEABLE" } else { "" },
                if f & NE_SEGFLAGS_PRELOAD != 0 { " PRELOAD" } else { "" },
            )?;
        }
        Ok(())
    })?;

    table(out, "Resources", Some(&image.resources), |out, resources| {
        writeln!(out, "alignment shift {}", resources.align_shift)?;
        for ty in resources.types.iter() {
            writeln!(out, "{}:", type_name(&ty.id))?;
            out.nest(|out| {
                for r in ty.resources.iter() {
                    writeln!(
                        out,
                        "{}: offset {:#x} length {:#x} flags {:#06x}",
                        id_name(&r.id),
                        r.offset,
                        r.length,
                        r.flags
                    )?;
                }
                std::fmt::Result::Ok(())
            })?;
        }
        Ok(())
    })?;

    table(out, "Resident names", Some(&image.resident_names), |out, names| {
        dump_names(out, names, flags)
    })?;
    table(out, "Non-resident names", Some(&image.nonresident_names), |out, names| {
        dump_names(out, names, flags)
    })?;

    table(out, "Imported modules", Some(&image.modules), |out, modules| {
        for (i, m) in modules.iter().enumerate() {
            writeln!(out, "{:<3} {}", i + 1, local(m))?;
        }
        Ok(())
    })?;

    table(out, "Entry points", Some(&image.entries), |out, entries| {
        for e in entries.iter() {
            writeln!(
                out,
                "{:<5} {:02x}:{:04x} flags {:02x}{}",
                e.ordinal,
                e.segment,
                e.offset,
                e.flags,
                if e.movable { " movable" } else { "" }
            )?;
        }
        Ok(())
    })?;
    Ok(())
}

/// Shows a resident or non-resident name table. The first entry names the module itself.
pub fn dump_names(out: &mut Report, names: &[NeName<'_>], flags: DumpFlags) -> anyhow::Result<()> {
    for n in names.iter() {
        writeln!(out, "{:<5} {}", n.ordinal, symbol_name(n.name, flags))?;
    }
    Ok(())
}

fn type_name(id: &NeResourceId<'_>) -> String {
    match id {
        NeResourceId::Id(n) => match resource_type_name(*n) {
            Some(name) => name.to_string(),
            None => n.to_string(),
        },
        NeResourceId::Name(name) => local(name),
    }
}

fn id_name(id: &NeResourceId<'_>) -> String {
    match id {
        NeResourceId::Id(n) => n.to_string(),
        NeResourceId::Name(name) => local(name),
    }
}
