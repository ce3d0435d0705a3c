use dump_utils::Report;
use imgdump::dos::DosImage;
use imgdump_coff::IMAGE_DOS_HEADER;
use std::fmt::Write;

pub fn dump_dos(out: &mut Report, image: &DosImage<'_>) -> anyhow::Result<()> {
    writeln!(out, "DOS header:")?;
    dump_dos_header(out, image.header)?;
    writeln!(out)?;

    match &image.relocations {
        Ok(relocs) => {
            writeln!(out, "Relocations: {}", relocs.len())?;
            out.nest(|out| {
                for (offset, segment) in relocs.iter() {
                    writeln!(out, "{segment:04x}:{offset:04x}")?;
                }
                anyhow::Ok(())
            })?;
        }
        Err(e) => writeln!(out, "Relocations: {e}")?,
    }
    Ok(())
}

/// Shows the fields of the `MZ` header, one level deeper. Shared by every format that starts with
/// one.
pub fn dump_dos_header(out: &mut Report, h: &IMAGE_DOS_HEADER) -> std::fmt::Result {
    out.fields(18, |out| {
        out.field("bytes on last page", format_args!("{:#x}", h.e_cblp.get()))?;
        out.field("pages in file", format_args!("{:#x}", h.e_cp.get()))?;
        out.field("relocations", format_args!("{:#x}", h.e_crlc.get()))?;
        out.field("header paragraphs", format_args!("{:#x}", h.e_cparhdr.get()))?;
        out.field(
            "extra paragraphs",
            format_args!("{:#x} min, {:#x} max", h.e_minalloc.get(), h.e_maxalloc.get()),
        )?;
        out.field("initial ss:sp", format_args!("{:04x}:{:04x}", h.e_ss.get(), h.e_sp.get()))?;
        out.field("checksum", format_args!("{:#x}", h.e_csum.get()))?;
        out.field("initial cs:ip", format_args!("{:04x}:{:04x}", h.e_cs.get(), h.e_ip.get()))?;
        out.field("relocation table", format_args!("{:#x}", h.e_lfarlc.get()))?;
        out.field("overlay", format_args!("{:#x}", h.e_ovno.get()))?;
        out.field("new header", format_args!("{:#x}", h.e_lfanew.get()))
    })
}
