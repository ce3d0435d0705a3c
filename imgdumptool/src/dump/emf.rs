use dump_utils::Report;
use imgdump::emf::{Metafile, RectL};
use std::fmt::Write;

fn rect(r: &RectL) -> String {
    let (left, top, right, bottom) = r.signed();
    format!("({left}, {top}) - ({right}, {bottom})")
}

pub fn dump_emf(out: &mut Report, emf: &Metafile<'_>) -> anyhow::Result<()> {
    let h = emf.header;
    writeln!(out, "Metafile header:")?;
    out.fields(11, |out| {
        out.field("bounds", rect(&h.bounds))?;
        out.field("frame", format_args!("{} (0.01 mm)", rect(&h.frame)))?;
        out.field("version", format_args!("{:#x}", h.version.get()))?;
        out.field("size", format_args!("{:#x}", h.nbytes.get()))?;
        out.field("records", h.nrecords.get())?;
        out.field("handles", h.nhandles.get())?;
        out.field("palette", format_args!("{} entries", h.npalentries.get()))?;
        out.field(
            "device",
            format_args!(
                "{} x {} pixels, {} x {} mm",
                h.device_width.get(),
                h.device_height.get(),
                h.millimeters_width.get(),
                h.millimeters_height.get()
            ),
        )?;
        match &emf.description {
            Some(Ok(parts)) => {
                for part in parts.iter() {
                    out.field("description", part)?;
                }
            }
            Some(Err(e)) => out.field("description", e)?,
            None => {}
        }
        std::fmt::Result::Ok(())
    })?;
    writeln!(out)?;

    writeln!(out, "Records ({}):", emf.records.len())?;
    out.nest(|out| {
        for r in emf.records.iter() {
            match r.name() {
                Some(name) => writeln!(out, "{:08x} {name} ({}), {:#x} bytes", r.offset, r.kind, r.size)?,
                None => writeln!(out, "{:08x} record type {}, {:#x} bytes", r.offset, r.kind, r.size)?,
            }
        }
        if let Some(e) = &emf.error {
            writeln!(out, "{e}")?;
        }
        std::fmt::Result::Ok(())
    })?;

    if emf.records.len() != h.nrecords.get() as usize {
        writeln!(out)?;
        writeln!(
            out,
            "note: header counts {} records, found {}",
            h.nrecords.get(),
            emf.records.len()
        )?;
    }
    Ok(())
}
