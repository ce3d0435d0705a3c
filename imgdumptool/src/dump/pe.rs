use super::codeview::dump_codeview;
use super::dos::dump_dos_header;
use super::{DumpFlags, local, payload, symbol_name, table};
use dump_utils::Report;
use imgdump::guid::braced;
use imgdump::pe::clr::MetadataRoot;
use imgdump::pe::debug::MiscData;
use imgdump::pe::exceptions::{ArmFunction, ArmUnwind, Handler, X64Function, X64Unwind, XData};
use imgdump::pe::payloads::{FixedFileInfo, VersionInfo, VersionNode, VersionValue};
use imgdump::pe::symbols::CoffDebug;
use imgdump::pe::{
    Clr, CoffSymbol, DebugEntry, DebugInfo, Exceptions, Exports, ImportThunk, ImportedDll,
    LoadConfig, OptionalHeader, PeImage, RelocBlock, ResourceData, ResourceDirectory,
    ResourceNode, ResourcePayload, Tls,
};
use imgdump_coff::{
    ComImageFlags, DATA_DIRECTORY_NAMES, IMAGE_DATA_DIRECTORY, IMAGE_DLLCHARACTERISTICS,
    IMAGE_FILE_HEADER, IMAGE_SECTION_HEADER, UNW_FLAG_CHAININFO, UNW_FLAG_EHANDLER,
    UNW_FLAG_UHANDLER, base_reloc_type_str, debug_type_name, file_os_name, file_type_name,
    storage_class_name, subsystem_name,
};
use std::fmt::Write;

pub fn dump_pe(out: &mut Report, pe: &PeImage<'_>, flags: DumpFlags) -> anyhow::Result<()> {
    writeln!(out, "DOS header:")?;
    dump_dos_header(out, pe.dos)?;
    writeln!(out)?;

    if let Some(wine) = pe.wine {
        writeln!(out, "Wine signature: {wine:?}")?;
        writeln!(out)?;
    }

    writeln!(out, "File header (at {:#x}):", pe.nt_offset)?;
    dump_file_header(out, pe.file_header)?;
    writeln!(out)?;

    writeln!(out, "Optional header:")?;
    dump_optional_header(out, &pe.optional)?;
    writeln!(out)?;

    writeln!(out, "Data directories:")?;
    out.nest(|out| {
        for d in pe.data_directories.iter() {
            if d.is_empty() {
                continue;
            }
            let name = DATA_DIRECTORY_NAMES.get(d.tag as usize).copied().unwrap_or("");
            writeln!(out, "{:2} {:<12} rva {:08x} size {:08x}", d.tag, name, d.offset, d.length)?;
        }
        std::fmt::Result::Ok(())
    })?;
    writeln!(out)?;

    writeln!(out, "Sections: {}", pe.sections.len())?;
    out.nest(|out| dump_sections(out, pe.sections))?;
    writeln!(out)?;

    table(out, "Exports", pe.exports.as_ref(), |out, e| dump_exports(out, e, flags))?;
    table(out, "Imports", pe.imports.as_ref(), |out, dlls| dump_imports(out, dlls, flags))?;
    table(out, "Delay imports", pe.delay_imports.as_ref(), |out, dlls| {
        dump_imports(out, dlls, flags)
    })?;
    table(out, "Debug directory", pe.debug.as_ref(), |out, entries| {
        dump_debug_entries(out, entries, flags)
    })?;
    table(out, "Resources", pe.resources.as_ref(), dump_resources)?;
    table(out, "TLS", pe.tls.as_ref(), dump_tls)?;
    table(out, "Base relocations", pe.relocs.as_ref(), |out, blocks| dump_relocs(out, blocks))?;
    table(out, "Load configuration", pe.load_config.as_ref(), dump_load_config)?;
    table(out, "Exception data", pe.exceptions.as_ref(), dump_exceptions)?;
    table(out, "CLR header", pe.clr.as_ref(), dump_clr)?;
    table(out, "COFF symbols", pe.symbols.as_ref(), |out, symbols| {
        dump_symbols(out, symbols, flags)
    })?;
    Ok(())
}

/// Shows the COFF file header, one level deeper.
fn dump_file_header(out: &mut Report, h: &IMAGE_FILE_HEADER) -> std::fmt::Result {
    let machine = imgdump_coff::IMAGE_FILE_MACHINE(h.machine.get());
    out.fields(18, |out| {
        out.field("machine", format_args!("{:#06x} ({})", machine.0, machine.to_str()))?;
        out.field("sections", h.number_of_sections.get())?;
        out.field("time stamp", format_args!("{:#010x}", h.time_date_stamp.get()))?;
        out.field("symbol table", format_args!("{:#x}", h.pointer_to_symbol_table.get()))?;
        out.field("symbols", h.number_of_symbols.get())?;
        out.field(
            "optional header",
            format_args!("{:#x} bytes", h.size_of_optional_header.get()),
        )?;
        out.field("characteristics", format_args!("{:#06x}", h.characteristics.get()))
    })
}

fn dump_optional_header(out: &mut Report, optional: &OptionalHeader<'_>) -> std::fmt::Result {
    macro_rules! common {
        ($out:expr, $h:expr, $magic:literal) => {{
            let (out, h) = ($out, $h);
            out.field("magic", format_args!("{:#x} ({})", h.magic.get(), $magic))?;
            out.field(
                "linker version",
                format_args!("{}.{}", h.major_linker_version, h.minor_linker_version),
            )?;
            out.field("size of code", format_args!("{:#x}", h.size_of_code.get()))?;
            out.field("entry point", format_args!("{:#x}", h.address_of_entry_point.get()))?;
            out.field("base of code", format_args!("{:#x}", h.base_of_code.get()))?;
            out.field("image base", format_args!("{:#x}", optional.image_base()))?;
            out.field("section alignment", format_args!("{:#x}", h.section_alignment.get()))?;
            out.field("file alignment", format_args!("{:#x}", h.file_alignment.get()))?;
            out.field(
                "OS version",
                format_args!(
                    "{}.{}",
                    h.major_operating_system_version.get(),
                    h.minor_operating_system_version.get()
                ),
            )?;
            out.field(
                "image version",
                format_args!("{}.{}", h.major_image_version.get(), h.minor_image_version.get()),
            )?;
            out.field(
                "subsystem version",
                format_args!(
                    "{}.{}",
                    h.major_subsystem_version.get(),
                    h.minor_subsystem_version.get()
                ),
            )?;
            out.field("size of image", format_args!("{:#x}", h.size_of_image.get()))?;
            out.field("size of headers", format_args!("{:#x}", h.size_of_headers.get()))?;
            out.field("checksum", format_args!("{:#x}", h.check_sum.get()))?;
            out.field(
                "subsystem",
                format_args!("{} ({})", h.subsystem.get(), subsystem_name(h.subsystem.get())),
            )?;
            out.field(
                "DLL flags",
                format_args!("{:?}", IMAGE_DLLCHARACTERISTICS(h.dll_characteristics.get())),
            )?;
            out.field(
                "stack",
                format_args!(
                    "{:#x} reserve, {:#x} commit",
                    h.size_of_stack_reserve.get(),
                    h.size_of_stack_commit.get()
                ),
            )?;
            out.field(
                "heap",
                format_args!(
                    "{:#x} reserve, {:#x} commit",
                    h.size_of_heap_reserve.get(),
                    h.size_of_heap_commit.get()
                ),
            )?;
            out.field("directories", h.number_of_rva_and_sizes.get())
        }};
    }

    out.fields(18, |out| match optional {
        OptionalHeader::Pe32(h) => common!(out, h, "PE32"),
        OptionalHeader::Pe64(h) => common!(out, h, "PE32+"),
        OptionalHeader::Other { magic } => {
            out.field("magic", format_args!("{magic:#x} (not decoded)"))
        }
    })
}

pub fn dump_sections(out: &mut Report, sections: &[IMAGE_SECTION_HEADER]) -> std::fmt::Result {
    writeln!(
        out,
        "#  name     vsize    rva      rawsize  rawptr   characteristics"
    )?;
    for (i, s) in sections.iter().enumerate() {
        writeln!(
            out,
            "{:<2} {:<8} {:08x} {:08x} {:08x} {:08x} {:?}",
            i + 1,
            s.name(),
            s.physical_address_or_virtual_size.get(),
            s.virtual_address.get(),
            s.size_of_raw_data.get(),
            s.pointer_to_raw_data.get(),
            s.characteristics()
        )?;
    }
    Ok(())
}

fn dump_exports(out: &mut Report, e: &Exports<'_>, flags: DumpFlags) -> anyhow::Result<()> {
    writeln!(out, "Directory:")?;
    out.fields(10, |out| {
        out.field("module", local(&e.dll_name))?;
        out.field("time stamp", format_args!("{:#010x}", e.dir.time_date_stamp.get()))?;
        out.field("base", e.dir.base.get())
    })?;
    writeln!(out)?;
    writeln!(out, "ordinal  rva       name")?;
    for export in e.entries.iter() {
        write!(out, "{:<8} {:08x}  ", export.ordinal, export.rva)?;
        match &export.name {
            Some(Ok(name)) => write!(out, "{}", symbol_name(name, flags))?,
            Some(Err(err)) => write!(out, "{err}")?,
            None => write!(out, "<by ordinal>")?,
        }
        if let Some(forwarder) = &export.forwarder {
            write!(out, " -> {}", local(forwarder))?;
        }
        writeln!(out)?;
    }
    Ok(())
}

fn dump_imports(
    out: &mut Report,
    dlls: &[ImportedDll<'_>],
    flags: DumpFlags,
) -> anyhow::Result<()> {
    for dll in dlls.iter() {
        writeln!(out, "{}", local(&dll.name))?;
        out.nest(|out| {
            writeln!(
                out,
                "lookup table {:08x}, address table {:08x}, time stamp {:#010x}, flags {:#x}",
                dll.lookup_table, dll.address_table, dll.time_date_stamp, dll.flags
            )?;
            match &dll.thunks {
                Ok(thunks) => {
                    for thunk in thunks.iter() {
                        match thunk {
                            ImportThunk::Ordinal(ordinal) => {
                                writeln!(out, "ordinal {ordinal}")?;
                            }
                            ImportThunk::Name { hint, name } => {
                                let name = match name {
                                    Ok(name) => symbol_name(name, flags),
                                    Err(e) => e.to_string(),
                                };
                                writeln!(out, "{hint:5}  {name}")?;
                            }
                        }
                    }
                }
                Err(e) => writeln!(out, "{e}")?,
            }
            anyhow::Ok(())
        })?;
    }
    Ok(())
}

/// Shows the entries of a debug directory, from an image or a `.dbg` file.
pub fn dump_debug_entries(
    out: &mut Report,
    entries: &[DebugEntry<'_>],
    flags: DumpFlags,
) -> anyhow::Result<()> {
    for (i, entry) in entries.iter().enumerate() {
        let dir = entry.dir;
        writeln!(
            out,
            "[{i}] {} ({}), {:#x} bytes at file offset {:#x}, rva {:#x}, time stamp {:#010x}",
            debug_type_name(dir.type_.get()),
            dir.type_.get(),
            dir.size_of_data.get(),
            dir.pointer_to_raw_data.get(),
            dir.address_of_raw_data.get(),
            dir.time_date_stamp.get()
        )?;
        out.nest(|out| match &entry.info {
            Ok(info) => dump_debug_info(out, entry, info, flags),
            Err(e) => {
                writeln!(out, "{e}")?;
                Ok(())
            }
        })?;
    }
    Ok(())
}

fn dump_debug_info(
    out: &mut Report,
    entry: &DebugEntry<'_>,
    info: &DebugInfo<'_>,
    flags: DumpFlags,
) -> anyhow::Result<()> {
    match info {
        DebugInfo::Empty => {}
        DebugInfo::Coff(coff) => dump_coff_debug(out, coff, flags)?,
        DebugInfo::CodeView(cv) => dump_codeview(out, cv, flags)?,
        DebugInfo::Misc(misc) => {
            let data = match &misc.data {
                MiscData::Ansi(s) => s.to_string(),
                MiscData::Unicode(s) => s.clone(),
            };
            writeln!(
                out,
                "type {}, length {:#x}, {}: {data}",
                misc.data_type,
                misc.length,
                if misc.unicode { "unicode" } else { "ansi" }
            )?;
        }
        DebugInfo::Fpo(records) => {
            writeln!(out, "start     size      locals  params  prolog  regs  seh  bp  frame")?;
            for r in records.iter() {
                writeln!(
                    out,
                    "{:08x}  {:08x}  {:<6}  {:<6}  {:<6}  {:<4}  {:<3}  {:<2}  {}",
                    r.ul_off_start.get(),
                    r.cb_proc_size.get(),
                    r.cdw_locals.get(),
                    r.cdw_params.get(),
                    r.cb_prolog(),
                    r.cb_regs(),
                    r.has_seh() as u8,
                    r.use_bp() as u8,
                    r.cb_frame()
                )?;
            }
        }
        DebugInfo::Omap(records) => {
            for r in records.iter() {
                writeln!(out, "{:08x} -> {:08x}", r.rva.get(), r.rva_to.get())?;
            }
        }
        DebugInfo::Pogo(pogo) => {
            writeln!(
                out,
                "signature {:?}",
                bstr::BStr::new(&pogo.header.to_le_bytes())
            )?;
            for e in pogo.entries.iter() {
                writeln!(out, "{:08x} {:08x} {}", e.rva, e.size, e.name)?;
            }
        }
        DebugInfo::Repro(repro) => {
            writeln!(out, "Repro:")?;
            out.fields(10, |out| {
                out.field("flags", format_args!("{:#x}", repro.flags))?;
                out.field("hash guid", braced(&repro.guid))?;
                out.field("time stamp", format_args!("{:#010x}", repro.debug_timestamp))
            })?;
        }
        DebugInfo::Raw(bytes) => payload(out, bytes, entry.entry.offset as usize, flags)?,
    }
    Ok(())
}

fn dump_resources(out: &mut Report, root: &ResourceDirectory) -> anyhow::Result<()> {
    writeln!(
        out,
        "version {}.{}, time stamp {:#010x}",
        root.version.0, root.version.1, root.time_date_stamp
    )?;
    dump_resource_level(out, root, 0)
}

fn dump_resource_level(
    out: &mut Report,
    dir: &ResourceDirectory,
    level: u32,
) -> anyhow::Result<()> {
    for entry in dir.entries.iter() {
        let id = match &entry.id {
            // The first level names the resource type.
            Ok(id) if level == 0 => id.type_name(),
            Ok(id) => id.to_string(),
            Err(e) => e.to_string(),
        };
        match &entry.node {
            Ok(ResourceNode::Directory(sub)) => {
                writeln!(out, "{id}:")?;
                out.nest(|out| dump_resource_level(out, sub, level + 1))?;
            }
            Ok(ResourceNode::Data(data)) => {
                writeln!(
                    out,
                    "{id}: rva {:08x} size {:#x} code page {}",
                    data.rva, data.size, data.code_page
                )?;
                out.nest(|out| dump_resource_data(out, data))?;
            }
            Err(e) => writeln!(out, "{id}: {e}")?,
        }
    }
    Ok(())
}

fn dump_resource_data(out: &mut Report, data: &ResourceData) -> anyhow::Result<()> {
    match &data.payload {
        None => {}
        Some(Err(e)) => writeln!(out, "{e}")?,
        Some(Ok(ResourcePayload::Version(info))) => dump_version(out, info)?,
        Some(Ok(ResourcePayload::Strings(strings))) => {
            for (id, text) in strings.iter() {
                writeln!(out, "{id:04x} {text:?}")?;
            }
        }
        Some(Ok(ResourcePayload::Messages(messages))) => {
            for m in messages.iter() {
                let wide = if m.unicode { "L" } else { "" };
                writeln!(out, "{:08x} {wide}{:?}", m.id, m.text)?;
            }
        }
    }
    Ok(())
}

fn dump_version(out: &mut Report, info: &VersionInfo) -> std::fmt::Result {
    if let Some(fixed) = &info.fixed {
        dump_fixed_file_info(out, fixed)?;
    }
    dump_version_nodes(out, &info.children)
}

fn dump_fixed_file_info(out: &mut Report, f: &FixedFileInfo) -> std::fmt::Result {
    let version = |v: &[u16; 4]| format!("{}.{}.{}.{}", v[0], v[1], v[2], v[3]);
    writeln!(out, "VS_FIXEDFILEINFO:")?;
    out.fields(15, |out| {
        out.field("signature", format_args!("{:08x}", f.signature))?;
        out.field(
            "struct version",
            format_args!("{}.{}", f.struc_version.0, f.struc_version.1),
        )?;
        out.field("file version", version(&f.file_version))?;
        out.field("product version", version(&f.product_version))?;
        out.field("flags mask", format_args!("{:08x}", f.file_flags_mask))?;
        out.field("flags", format_args!("{:08x}", f.file_flags))?;
        match file_os_name(f.file_os) {
            Some(name) => out.field("OS", name)?,
            None => out.field("OS", format_args!("{:08x}", f.file_os))?,
        }
        match file_type_name(f.file_type) {
            Some(name) => out.field("type", name)?,
            None => out.field("type", format_args!("{:08x}", f.file_type))?,
        }
        out.field("subtype", format_args!("{:08x}", f.file_subtype))?;
        out.field("date", format_args!("{:08x}.{:08x}", f.file_date.0, f.file_date.1))
    })
}

fn dump_version_nodes(out: &mut Report, nodes: &[VersionNode]) -> std::fmt::Result {
    for node in nodes.iter() {
        match &node.value {
            VersionValue::Block => writeln!(out, "BLOCK {:?}", node.key)?,
            VersionValue::Text(text) => writeln!(out, "VALUE {:?}, {text:?}", node.key)?,
            VersionValue::Words(words) => {
                write!(out, "VALUE {:?},", node.key)?;
                for w in words.iter() {
                    write!(out, " {w:#x}")?;
                }
                writeln!(out)?;
            }
        }
        if !node.children.is_empty() {
            out.nest(|out| dump_version_nodes(out, &node.children))?;
        }
    }
    Ok(())
}

fn dump_tls(out: &mut Report, tls: &Tls) -> anyhow::Result<()> {
    writeln!(out, "Directory:")?;
    out.fields(12, |out| {
        out.field(
            "raw data",
            format_args!(
                "{:#x} - {:#x}",
                tls.start_address_of_raw_data, tls.end_address_of_raw_data
            ),
        )?;
        out.field("index", format_args!("{:#x}", tls.address_of_index))?;
        out.field("callbacks at", format_args!("{:#x}", tls.address_of_callbacks))?;
        out.field("zero fill", format_args!("{:#x}", tls.size_of_zero_fill))?;
        out.field("flags", format_args!("{:#x}", tls.characteristics))
    })?;
    match &tls.callbacks {
        Ok(callbacks) => {
            for cb in callbacks.iter() {
                writeln!(out, "callback {cb:#x}")?;
            }
        }
        Err(e) => writeln!(out, "callbacks: {e}")?,
    }
    Ok(())
}

fn dump_relocs(out: &mut Report, blocks: &[RelocBlock]) -> anyhow::Result<()> {
    for block in blocks.iter() {
        writeln!(out, "page {:08x}, {} entries", block.page, block.entries.len())?;
        out.nest(|out| {
            for &(ty, offset) in block.entries.iter() {
                let name = base_reloc_type_str(ty).unwrap_or("?");
                writeln!(out, "{:08x} {name} ({ty})", block.page + offset as u32)?;
            }
            std::fmt::Result::Ok(())
        })?;
    }
    Ok(())
}

fn dump_load_config(out: &mut Report, config: &LoadConfig) -> anyhow::Result<()> {
    let width = config.fields.iter().map(|f| f.name.len()).max().unwrap_or(0);
    writeln!(out, "Directory ({} fields):", config.fields.len())?;
    out.fields(width, |out| {
        for f in config.fields.iter() {
            out.field(f.name, format_args!("{:#x}", f.value))?;
        }
        std::fmt::Result::Ok(())
    })?;
    match &config.se_handlers {
        None => {}
        Some(Err(e)) => writeln!(out, "SafeSEH handlers: {e}")?,
        Some(Ok(handlers)) => {
            writeln!(out, "SafeSEH handlers: {}", handlers.len())?;
            out.nest(|out| {
                for h in handlers.iter() {
                    writeln!(out, "{h:08x}")?;
                }
                std::fmt::Result::Ok(())
            })?;
        }
    }
    Ok(())
}

fn dump_exceptions(out: &mut Report, exceptions: &Exceptions) -> anyhow::Result<()> {
    match exceptions {
        Exceptions::X64(functions) => {
            writeln!(out, "x64, {} functions", functions.len())?;
            for f in functions.iter() {
                dump_x64_function(out, f)?;
            }
        }
        Exceptions::Arm64(functions) | Exceptions::ArmNt(functions) => {
            let arch = if matches!(exceptions, Exceptions::Arm64(_)) { "ARM64" } else { "ARM" };
            writeln!(out, "{arch}, {} functions", functions.len())?;
            for f in functions.iter() {
                dump_arm_function(out, f)?;
            }
        }
        Exceptions::Unsupported(machine) => {
            writeln!(out, "not decoded for machine {}", machine.to_str())?;
        }
    }
    Ok(())
}

fn unw_flag_names(flags: u8) -> String {
    let mut names = Vec::new();
    if flags & UNW_FLAG_EHANDLER != 0 {
        names.push("EHANDLER");
    }
    if flags & UNW_FLAG_UHANDLER != 0 {
        names.push("UHANDLER");
    }
    if flags & UNW_FLAG_CHAININFO != 0 {
        names.push("CHAININFO");
    }
    names.join(" ")
}

fn dump_handler(out: &mut Report, handler: &Option<Handler>) -> std::fmt::Result {
    if let Some(h) = handler {
        writeln!(out, "handler {:08x}, data at {:08x}", h.rva, h.data_rva)?;
    }
    Ok(())
}

fn dump_x64_function(out: &mut Report, f: &X64Function) -> std::fmt::Result {
    write!(out, "{:08x}-{:08x} ", f.begin, f.end)?;
    let info = match &f.unwind {
        Err(e) => return writeln!(out, "unwind info at {:08x}: {e}", f.unwind_rva),
        Ok(X64Unwind::Indirect { begin, end }) => {
            return writeln!(out, "shares unwind info of {begin:08x}-{end:08x}");
        }
        Ok(X64Unwind::Info(info)) => info,
    };
    writeln!(out, "unwind info at {:08x}", f.unwind_rva)?;
    out.nest(|out| {
        writeln!(
            out,
            "version {}, flags {:#x} {}, prolog {:#x} bytes",
            info.version,
            info.flags,
            unw_flag_names(info.flags),
            info.prolog_size
        )?;
        if info.frame_register != 0 {
            writeln!(
                out,
                "frame register {}, offset {:#x}",
                imgdump::pe::exceptions::X64_REGISTERS[info.frame_register as usize & 0xf],
                info.frame_offset
            )?;
        }
        for op in info.ops.iter() {
            writeln!(out, "{:#04x}: {op}", op.offset())?;
        }
        if let Some(epilogs) = &info.epilogs {
            writeln!(out, "epilog size {:#x}", epilogs.size)?;
            for (start, end) in epilogs.ranges.iter() {
                writeln!(out, "  at {start:08x}-{end:08x}")?;
            }
        }
        if let Some((begin, end)) = info.chained {
            writeln!(out, "chained to {begin:08x}-{end:08x}")?;
        }
        dump_handler(out, &info.handler)
    })
}

fn dump_arm_function(out: &mut Report, f: &ArmFunction) -> std::fmt::Result {
    write!(out, "{:08x} ", f.begin)?;
    match &f.unwind {
        Err(e) => writeln!(out, "unwind data {:08x}: {e}", f.unwind_data),
        Ok(ArmUnwind::PackedArm64 {
            flag,
            function_length,
            reg_f,
            reg_i,
            homes_params,
            cr,
            frame_size,
        }) => writeln!(
            out,
            "packed: flag {flag}, length {function_length:#x}, RegF {reg_f}, RegI {reg_i}, \
             H {}, CR {cr}, frame {frame_size:#x}",
            *homes_params as u8
        ),
        Ok(ArmUnwind::PackedArmNt {
            flag,
            function_length,
            ret,
            homes_params,
            reg,
            r,
            l,
            c,
            stack_adjust,
        }) => writeln!(
            out,
            "packed: flag {flag}, length {function_length:#x}, Ret {ret}, H {}, Reg {reg}, \
             R {}, L {}, C {}, StackAdjust {stack_adjust:#x}",
            *homes_params as u8, *r as u8, *l as u8, *c as u8
        ),
        Ok(ArmUnwind::Forwarded { parent }) => {
            writeln!(out, "forwards to {:08x}: parent {}", f.unwind_data & !3, local_hex(parent))
        }
        Ok(ArmUnwind::XData(x)) => {
            writeln!(out, "xdata at {:08x}", x.rva)?;
            out.nest(|out| dump_xdata(out, x))
        }
    }
}

fn local_hex(r: &imgdump::LocalResult<u32>) -> String {
    match r {
        Ok(v) => format!("{v:08x}"),
        Err(e) => e.to_string(),
    }
}

fn dump_xdata(out: &mut Report, x: &XData) -> std::fmt::Result {
    writeln!(
        out,
        "length {:#x}, version {}, X {}, E {}, F {}",
        x.function_length, x.version, x.x as u8, x.e as u8, x.f as u8
    )?;
    if let Some(index) = x.single_epilog {
        writeln!(out, "single epilog at code {index}")?;
    }
    for e in x.epilogs.iter() {
        match e.condition {
            Some(cond) => writeln!(
                out,
                "epilog at {:08x}, code {}, condition {cond:#x}",
                e.start, e.index
            )?,
            None => writeln!(out, "epilog at {:08x}, code {}", e.start, e.index)?,
        }
    }
    for (pos, bytes) in x.codes.iter() {
        write!(out, "{pos:04x}:")?;
        for b in bytes.iter() {
            write!(out, " {b:02x}")?;
        }
        writeln!(out)?;
    }
    dump_handler(out, &x.handler)
}

fn dump_clr(out: &mut Report, clr: &Clr<'_>) -> anyhow::Result<()> {
    let h = clr.header;
    let flags = ComImageFlags::from_bits_retain(h.flags.get());
    let names: Vec<&str> = flags.iter_names().map(|(name, _)| name).collect();
    let dir = |d: &IMAGE_DATA_DIRECTORY| {
        format!("rva {:08x} size {:#x}", d.virtual_address.get(), d.size.get())
    };
    out.fields(20, |out| {
        out.field("header size", format_args!("{:#x}", h.cb.get()))?;
        out.field(
            "runtime version",
            format_args!("{}.{}", h.major_runtime_version.get(), h.minor_runtime_version.get()),
        )?;
        out.field("flags", format_args!("{:#x} {}", flags.0, names.join(" ")))?;
        out.field("entry point", format_args!("{:#x}", h.entry_point_token.get()))?;
        out.field("metadata", dir(&h.metadata))?;
        out.field("resources", dir(&h.resources))?;
        out.field("strong name", dir(&h.strong_name_signature))?;
        out.field("code manager table", dir(&h.code_manager_table))?;
        out.field("vtable fixups", dir(&h.vtable_fixups))?;
        out.field("export jumps", dir(&h.export_address_table_jumps))?;
        out.field("native header", dir(&h.managed_native_header))
    })?;
    match &clr.metadata {
        None => {}
        Some(Err(e)) => writeln!(out, "Metadata: {e}")?,
        Some(Ok(root)) => dump_metadata_root(out, root)?,
    }
    Ok(())
}

fn dump_metadata_root(out: &mut Report, root: &MetadataRoot<'_>) -> std::fmt::Result {
    writeln!(
        out,
        "Metadata: version {}.{} {:?}, flags {:#x}, {} streams",
        root.version.0,
        root.version.1,
        root.runtime,
        root.flags,
        root.streams.len()
    )?;
    out.nest(|out| {
        for s in root.streams.iter() {
            writeln!(out, "{:<12} offset {:#x} size {:#x}", s.name, s.offset, s.size)?;
        }
        Ok(())
    })
}

fn dump_coff_debug(out: &mut Report, coff: &CoffDebug<'_>, flags: DumpFlags) -> anyhow::Result<()> {
    let h = coff.header;
    writeln!(
        out,
        "{} symbols at {:#x}, {} line numbers at {:#x}",
        h.number_of_symbols.get(),
        h.lva_to_first_symbol.get(),
        h.number_of_linenumbers.get(),
        h.lva_to_first_linenumber.get()
    )?;
    writeln!(
        out,
        "code {:08x}-{:08x}, data {:08x}-{:08x}",
        h.rva_to_first_byte_of_code.get(),
        h.rva_to_last_byte_of_code.get(),
        h.rva_to_first_byte_of_data.get(),
        h.rva_to_last_byte_of_data.get()
    )?;
    match &coff.symbols {
        Ok(symbols) => dump_symbols(out, symbols, flags),
        Err(e) => {
            writeln!(out, "symbols: {e}")?;
            Ok(())
        }
    }
}

/// Shows a COFF symbol table, one line per symbol. Auxiliary records are only counted.
pub fn dump_symbols(
    out: &mut Report,
    symbols: &[CoffSymbol<'_>],
    flags: DumpFlags,
) -> anyhow::Result<()> {
    for sym in symbols.iter() {
        let section = match sym.section {
            imgdump_coff::IMAGE_SYM_UNDEFINED => "UNDEF".to_string(),
            imgdump_coff::IMAGE_SYM_ABSOLUTE => "ABS".to_string(),
            imgdump_coff::IMAGE_SYM_DEBUG => "DEBUG".to_string(),
            n => n.to_string(),
        };
        let class = storage_class_name(sym.storage_class)
            .map(str::to_string)
            .unwrap_or_else(|| format!("{:#x}", sym.storage_class));
        let name = match &sym.name {
            Ok(name) => symbol_name(name, flags),
            Err(e) => e.to_string(),
        };
        write!(
            out,
            "[{:3}] {:08x} {section:>5} {:#06x} {class:<10} {name}",
            sym.index, sym.value, sym.ty
        )?;
        if !sym.aux.is_empty() {
            write!(out, " (+{} aux)", sym.aux.len())?;
        }
        writeln!(out)?;
    }
    Ok(())
}
