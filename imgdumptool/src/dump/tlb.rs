use super::local;
use dump_utils::Report;
use imgdump::guid::braced;
use imgdump::tlb::msft::{ImportTarget, MsftLibrary, SEGMENT_NAMES};
use imgdump::tlb::sltg::SltgLibrary;
use imgdump::tlb::{Function, Members, TypeKind, TypeinfoRecord, VarKind, Variable};
use std::fmt::Write;

pub fn dump_msft(out: &mut Report, lib: &MsftLibrary) -> anyhow::Result<()> {
    let (major, minor) = lib.version();

    writeln!(out, "Library {}", local(&lib.name))?;
    out.fields(10, |out| {
        out.opt_field("uuid", lib.guid.as_ref().map(braced))?;
        out.field("version", format_args!("{major}.{minor}"))?;
        out.field("lcid", format_args!("{:#x}", lib.header.lcid.get()))?;
        out.field("syskind", lib.syskind())?;
        out.field("flags", format_args!("{:#x}", lib.header.flags.get()))?;
        out.opt_field("helpstring", lib.doc.as_ref().map(local))?;
        out.opt_field("helpfile", lib.help_file.as_ref().map(local))?;
        out.opt_field("helpdll", lib.help_dll.as_ref().map(local))?;
        out.field("typeinfos", lib.typeinfos.len())
    })?;
    writeln!(out)?;

    writeln!(out, "Segments:")?;
    out.nest(|out| {
        for (seg, name) in lib.segments.iter().zip(SEGMENT_NAMES.iter()) {
            if seg.is_empty() {
                continue;
            }
            writeln!(out, "{name:<16} offset {:#08x} length {:#x}", seg.offset, seg.length)?;
        }
        std::fmt::Result::Ok(())
    })?;
    writeln!(out)?;

    match &lib.import_files {
        Ok(files) if files.is_empty() => {}
        Ok(files) => {
            writeln!(out, "Imported libraries:")?;
            out.nest(|out| {
                for f in files.iter() {
                    write!(out, "{:#06x} {} version {}.{}", f.offset, f.name, f.version.0, f.version.1)?;
                    if let Some(guid) = &f.guid {
                        write!(out, " {}", braced(guid))?;
                    }
                    writeln!(out)?;
                }
                std::fmt::Result::Ok(())
            })?;
            writeln!(out)?;
        }
        Err(e) => writeln!(out, "Imported libraries: {e}")?,
    }

    match &lib.import_infos {
        Ok(infos) if infos.is_empty() => {}
        Ok(infos) => {
            writeln!(out, "Imported types:")?;
            out.nest(|out| {
                for info in infos.iter() {
                    write!(out, "{:#06x} from {:#06x}: ", info.offset, info.file_offset)?;
                    match &info.target {
                        ImportTarget::Guid(guid) => writeln!(out, "{}", braced(guid))?,
                        ImportTarget::Index(i) => writeln!(out, "typeinfo {i}")?,
                    }
                }
                std::fmt::Result::Ok(())
            })?;
            writeln!(out)?;
        }
        Err(e) => writeln!(out, "Imported types: {e}")?,
    }

    for (i, ti) in lib.typeinfos.iter().enumerate() {
        dump_typeinfo(out, i, ti.as_ref())?;
    }
    Ok(())
}

pub fn dump_sltg(out: &mut Report, sltg: &SltgLibrary) -> anyhow::Result<()> {
    writeln!(out, "SLTG header:")?;
    out.fields(11, |out| {
        out.field("blocks", sltg.entries.len())?;
        out.field("first block", sltg.header.first_blk.get())?;
        out.field("guid", braced(&sltg.header.guid.get()))
    })?;
    writeln!(out)?;

    writeln!(out, "Block entries:")?;
    out.nest(|out| {
        for (i, e) in sltg.entries.iter().enumerate() {
            writeln!(
                out,
                "{:<3} length {:#06x} next {:<5} index {}",
                i + 1,
                e.len,
                e.next,
                local(&e.index_name)
            )?;
        }
        std::fmt::Result::Ok(())
    })?;
    writeln!(out)?;

    match &sltg.chain {
        Ok(chain) => {
            writeln!(out, "Block chain:")?;
            out.nest(|out| {
                for b in chain.iter() {
                    writeln!(out, "entry {:<3} offset {:#08x} length {:#x}", b.entry + 1, b.offset, b.len)?;
                }
                std::fmt::Result::Ok(())
            })?;
        }
        Err(e) => writeln!(out, "Block chain: {e}")?,
    }
    writeln!(out)?;

    match &sltg.library {
        Ok(lib) => {
            writeln!(out, "Library {}", local(&lib.name))?;
            out.fields(11, |out| {
                out.field("uuid", braced(&lib.guid))?;
                out.field("version", format_args!("{}.{}", lib.version.0, lib.version.1))?;
                out.field("lcid", format_args!("{:#x}", lib.lcid))?;
                out.field("syskind", lib.syskind)?;
                out.field("flags", format_args!("{:#x}", lib.flags))?;
                out.opt_field("helpstring", lib.doc.as_ref())?;
                out.opt_field("helpfile", lib.help_file.as_ref())?;
                out.field("helpcontext", format_args!("{:#x}", lib.help_context))?;
                match &lib.help_table {
                    Ok(table) => writeln!(out, "help string table: max length {:#x}", table.max_len)?,
                    Err(e) => writeln!(out, "help string table: {e}")?,
                }
                match &lib.name_table {
                    Ok(offset) => writeln!(out, "name table: {offset:#x}")?,
                    Err(e) => writeln!(out, "name table: {e}")?,
                }
                match &lib.other_infos {
                    Ok(others) => {
                        for o in others.iter() {
                            writeln!(
                                out,
                                "typeinfo {}: index {}, {}, helpcontext {:#x}",
                                o.small_no,
                                o.index_name.as_deref().unwrap_or("-"),
                                TypeKind(o.typekind as u8),
                                o.help_context
                            )?;
                        }
                    }
                    Err(e) => writeln!(out, "typeinfo table: {e}")?,
                }
                std::fmt::Result::Ok(())
            })?;
        }
        Err(e) => writeln!(out, "Library block: {e}")?,
    }
    writeln!(out)?;

    for (i, ti) in sltg.typeinfos.iter().enumerate() {
        dump_typeinfo(out, i, ti.as_ref())?;
    }
    Ok(())
}

/// Shows one typeinfo in an IDL-like form. Shared by both encodings.
fn dump_typeinfo(
    out: &mut Report,
    index: usize,
    ti: Result<&TypeinfoRecord, &imgdump::LocalError>,
) -> anyhow::Result<()> {
    let ti = match ti {
        Ok(ti) => ti,
        Err(e) => {
            writeln!(out, "Typeinfo {index}: {e}")?;
            writeln!(out)?;
            return Ok(());
        }
    };

    writeln!(out, "Typeinfo {index}: {} {}", ti.kind, local(&ti.name))?;
    out.fields(11, |out| {
        out.opt_field("uuid", ti.guid.as_ref().map(braced))?;
        out.field("version", format_args!("{}.{}", ti.version.0, ti.version.1))?;
        out.field("flags", format_args!("{:#x}", ti.flags))?;
        out.opt_field("helpstring", ti.doc.as_ref().map(local))?;
        if ti.help_context != 0 {
            out.field("helpcontext", format_args!("{:#x}", ti.help_context))?;
        }
        out.opt_field("dllname", ti.dll_name.as_ref().map(local))?;
        if let Some(alias) = &ti.alias {
            writeln!(out, "typedef {alias}")?;
        }
        writeln!(
            out,
            "{} functions, {} variables, {} implemented",
            ti.function_count, ti.variable_count, ti.impl_count
        )?;

        match &ti.members {
            Ok(members) => dump_members(out, ti.kind, members)?,
            Err(e) => writeln!(out, "members: {e}")?,
        }
        anyhow::Ok(())
    })?;
    writeln!(out)?;
    Ok(())
}

fn dump_members(out: &mut Report, kind: TypeKind, members: &Members) -> anyhow::Result<()> {
    for imp in members.impls.iter() {
        let label = if kind == TypeKind::TKIND_COCLASS {
            "implements"
        } else {
            "inherits"
        };
        writeln!(out, "{label} {} (flags {:#x})", imp.type_, imp.flags)?;
    }

    for v in members.variables.iter() {
        match v {
            Ok(v) => dump_variable(out, v)?,
            Err(e) => writeln!(out, "variable: {e}")?,
        }
    }

    for f in members.functions.iter() {
        match f {
            Ok(f) => dump_function(out, f)?,
            Err(e) => writeln!(out, "function: {e}")?,
        }
    }
    Ok(())
}

fn dump_variable(out: &mut Report, v: &Variable) -> std::fmt::Result {
    write!(out, "[id({:#x})] {} {}", v.memid, v.type_, local(&v.name))?;
    match &v.kind {
        VarKind::PerInstance(offset) => write!(out, " @ {offset:#x}")?,
        VarKind::Const(value) => write!(out, " = {value}")?,
        VarKind::ConstUnknown => write!(out, " = <?>")?,
        VarKind::Static => write!(out, " (static)")?,
        VarKind::Dispatch => write!(out, " (dispatch)")?,
    }
    writeln!(out)
}

fn dump_function(out: &mut Report, f: &Function) -> std::fmt::Result {
    let invoke = match f.invoke_kind {
        1 => "",
        2 => "propget, ",
        4 => "propput, ",
        8 => "propputref, ",
        _ => "?, ",
    };
    write!(
        out,
        "[{invoke}id({:#x})] {} {}{}(",
        f.memid,
        f.return_type,
        call_conv_prefix(f.call_conv),
        local(&f.name)
    )?;
    for (i, p) in f.params.iter().enumerate() {
        if i != 0 {
            write!(out, ", ")?;
        }
        let dir = match p.flags & 3 {
            1 => "[in] ",
            2 => "[out] ",
            3 => "[in, out] ",
            _ => "",
        };
        write!(out, "{dir}{}", p.type_)?;
        if let Some(name) = &p.name {
            write!(out, " {}", local(name))?;
        }
    }
    writeln!(out, ") vtable {:#x}", f.vtable_offset)
}

fn call_conv_prefix(cc: u8) -> &'static str {
    match cc {
        1 => "__cdecl ",
        2 => "__pascal ",
        4 => "__stdcall ",
        _ => "",
    }
}
