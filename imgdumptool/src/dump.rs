use anyhow::Context;
use bstr::BStr;
use dump_utils::Report;
use imgdump::{Decoded, ImageView, LocalResult};
use std::fmt::{Display, Write};
use std::path::Path;

mod codeview;
mod dbg;
mod dos;
mod emf;
mod hive;
mod le;
mod minidump;
mod ne;
mod pe;
mod tlb;

#[derive(clap::Parser)]
pub struct DumpOptions {
    /// The file to dump
    pub file: String,

    #[command(flatten)]
    pub flags: DumpFlags,
}

/// Options that change how records are shown, passed down to every renderer.
#[derive(clap::Args, Copy, Clone, Default, Debug)]
pub struct DumpFlags {
    /// Show decorated names (exports, imports, publics) as demangled prototypes.
    #[arg(long)]
    pub demangle: bool,

    /// Show undecoded payloads as hex dumps instead of just their size.
    #[arg(long)]
    pub hex: bool,
}

pub fn dump_main(options: DumpOptions) -> anyhow::Result<()> {
    let view = ImageView::open(Path::new(&options.file))?;
    let kind = imgdump::identify(&view);
    let decoded = imgdump::decode(&view, kind)
        .with_context(|| format!("Failed to decode {}", options.file))?;

    let mut out = Report::new();
    writeln!(out, "{}: {} ({} bytes)", options.file, kind, view.len())?;
    writeln!(out)?;
    render(&mut out, &decoded, options.flags)?;

    print!("{}", out.finish());
    Ok(())
}

/// Renders a decoded input. Local failures inside the records are shown in place and never
/// stop the report.
pub fn render(
    out: &mut Report,
    decoded: &Decoded<'_>,
    flags: DumpFlags,
) -> anyhow::Result<()> {
    match decoded {
        Decoded::Dos(image) => dos::dump_dos(out, image),
        Decoded::Pe(image) => pe::dump_pe(out, image, flags),
        Decoded::Ne(image) => ne::dump_ne(out, image, flags),
        Decoded::Le(image) => le::dump_le(out, image, flags),
        Decoded::Dbg(file) => dbg::dump_dbg(out, file, flags),
        Decoded::Minidump(dump) => minidump::dump_minidump(out, dump, flags),
        Decoded::Msft(lib) => tlb::dump_msft(out, lib),
        Decoded::Sltg(lib) => tlb::dump_sltg(out, lib),
        Decoded::Hive(hive) => hive::dump_hive(out, hive, flags),
        Decoded::Emf(emf) => emf::dump_emf(out, emf),
    }
}

/// Shows a value that may have failed to decode. The error marker stands in for the value.
pub fn local<T: Display>(r: &LocalResult<T>) -> String {
    match r {
        Ok(v) => v.to_string(),
        Err(e) => e.to_string(),
    }
}

/// Shows a decorated name, demangled if the flags ask for it.
pub fn symbol_name(name: &BStr, flags: DumpFlags) -> String {
    if flags.demangle {
        imgdump::demangle::demangle_or_raw(&name.to_string())
    } else {
        name.to_string()
    }
}

/// Shows an undecoded payload: either a hex dump or just its length.
pub fn payload(out: &mut Report, bytes: &[u8], at: usize, flags: DumpFlags) -> anyhow::Result<()> {
    if flags.hex {
        out.nest(|out| out.hex(bytes, at))?;
    } else {
        writeln!(out, "({} bytes)", bytes.len())?;
    }
    Ok(())
}

/// Renders an optional table that may have failed to decode as a whole.
pub fn table<T>(
    out: &mut Report,
    title: &str,
    table: Option<&LocalResult<T>>,
    f: impl FnOnce(&mut Report, &T) -> anyhow::Result<()>,
) -> anyhow::Result<()> {
    match table {
        None => Ok(()),
        Some(Err(e)) => {
            writeln!(out, "{title}: {e}")?;
            writeln!(out)?;
            Ok(())
        }
        Some(Ok(t)) => {
            writeln!(out, "{title}:")?;
            out.nest(|out| f(out, t))?;
            writeln!(out)?;
            Ok(())
        }
    }
}
