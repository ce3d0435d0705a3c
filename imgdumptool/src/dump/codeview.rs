use super::{DumpFlags, payload, symbol_name};
use dump_utils::Report;
use imgdump::codeview::lines::SrcModule;
use imgdump::codeview::types::FieldList;
use imgdump::codeview::{
    CodeView, Field, Omf, SubsectionData, SymData, SymKind, SymbolBlock, TypeBlock, TypeData,
    type_index_name as ty,
};
use imgdump::guid::braced;
use std::fmt::Write;

pub fn dump_codeview(out: &mut Report, cv: &CodeView<'_>, flags: DumpFlags) -> anyhow::Result<()> {
    match cv {
        CodeView::Nb10(nb10) => {
            writeln!(out, "CodeView NB10")?;
            out.aligned(10, |out| {
                out.field("time stamp", format_args!("{:#010x}", nb10.timestamp))?;
                out.field("age", nb10.age)?;
                out.field("PDB", nb10.path)
            })?;
        }
        CodeView::Rsds(rsds) => {
            writeln!(out, "CodeView RSDS")?;
            out.aligned(10, |out| {
                out.field("guid", braced(&rsds.guid))?;
                out.field("age", rsds.age)?;
                out.field("PDB", rsds.path)
            })?;
        }
        CodeView::Omf(omf) => dump_omf(out, omf, flags)?,
    }
    Ok(())
}

fn dump_omf(out: &mut Report, omf: &Omf<'_>, flags: DumpFlags) -> anyhow::Result<()> {
    writeln!(
        out,
        "CodeView {} at file offset {:#x}, directory at {:#x}",
        omf.signature_str(),
        omf.base,
        omf.directory_offset
    )?;
    if let Some(e) = &omf.error {
        writeln!(out, "subsection directory: {e}")?;
    }

    for (i, s) in omf.subsections.iter().enumerate() {
        writeln!(out)?;
        writeln!(
            out,
            "{} module {:#x}, offset {:#x}, size {:#x}",
            s.kind, s.module_index, s.entry.offset, s.entry.length
        )?;
        out.nest(|out| match omf.decode_subsection(i) {
            Ok(data) => dump_subsection(out, &data, omf.base + s.entry.offset as usize, flags),
            Err(e) => {
                writeln!(out, "{e}")?;
                Ok(())
            }
        })?;
    }
    Ok(())
}

fn dump_subsection(
    out: &mut Report,
    data: &SubsectionData<'_>,
    file_offset: usize,
    flags: DumpFlags,
) -> anyhow::Result<()> {
    match data {
        SubsectionData::Module(m) => {
            writeln!(
                out,
                "{} (overlay {}, library {}, style {:?})",
                m.name,
                m.overlay,
                m.library,
                bstr::BStr::new(&m.style)
            )?;
            for seg in m.segments.iter() {
                writeln!(
                    out,
                    "segment {:04x}:{:08x}, size {:#x}",
                    seg.segment.get(),
                    seg.offset.get(),
                    seg.size.get()
                )?;
            }
        }
        SubsectionData::HashedSymbols { header, symbols } => {
            writeln!(
                out,
                "symbol hash {}, address hash {}, {:#x} bytes of symbols",
                header.sym_hash.get(),
                header.addr_hash.get(),
                header.cb_symbol.get()
            )?;
            dump_symbols(out, symbols, flags)?;
        }
        SubsectionData::Symbols { signature, symbols } => {
            writeln!(out, "signature {signature}")?;
            dump_symbols(out, symbols, flags)?;
        }
        SubsectionData::GlobalTypes { flags: tflags, offsets, types } => {
            writeln!(out, "flags {tflags:#x}, {} types", offsets.len())?;
            dump_types(out, types)?;
        }
        SubsectionData::SegMap { logical, segments } => {
            writeln!(out, "{} segments, {logical} logical", segments.len())?;
            for (i, seg) in segments.iter().enumerate() {
                writeln!(
                    out,
                    "{:<3} flags {:04x} frame {:04x} offset {:08x} size {:08x} name {} class {}",
                    i + 1,
                    seg.flags.get(),
                    seg.frame.get(),
                    seg.offset.get(),
                    seg.size.get(),
                    seg.seg_name.get(),
                    seg.class_name.get()
                )?;
            }
        }
        SubsectionData::SegNames(names) | SubsectionData::Libraries(names) => {
            for (i, name) in names.iter().enumerate() {
                writeln!(out, "{i:<3} {name}")?;
            }
        }
        SubsectionData::SrcModule(src) => dump_src_module(out, src)?,
        SubsectionData::FileIndex(modules) => {
            for (i, files) in modules.iter().enumerate() {
                match files {
                    Ok(files) => {
                        writeln!(out, "module {}:", i + 1)?;
                        out.nest(|out| {
                            for f in files.iter() {
                                writeln!(out, "{f}")?;
                            }
                            std::fmt::Result::Ok(())
                        })?;
                    }
                    Err(e) => writeln!(out, "module {}: {e}", i + 1)?,
                }
            }
        }
        SubsectionData::Other(bytes) => payload(out, bytes, file_offset, flags)?,
    }
    Ok(())
}

fn dump_symbols(out: &mut Report, block: &SymbolBlock<'_>, flags: DumpFlags) -> anyhow::Result<()> {
    let mut depth: u32 = 0;

    for sym in block.symbols.iter() {
        if sym.kind == SymKind::S_END && depth > 0 {
            depth -= 1;
        }

        write!(out, "{:08x} : {}", sym.offset, dump_utils::indent(depth * 2))?;
        write!(out, "{}: ", sym.kind)?;

        match sym.parse() {
            Ok(data) => {
                if dump_sym(out, &data, flags)? {
                    depth += 1;
                }
            }
            Err(e) => write!(out, "{e}")?,
        }
        writeln!(out)?;
    }

    if let Some(e) = &block.error {
        writeln!(out, "{e}")?;
    }
    Ok(())
}

/// Writes the payload of one symbol. Returns true if the symbol opens a scope.
fn dump_sym(out: &mut Report, data: &SymData<'_>, flags: DumpFlags) -> anyhow::Result<bool> {
    let mut opens_scope = false;

    match data {
        SymData::Compile(c) => {
            write!(out, "machine {:#x}, language {}, {}", c.machine, c.language(), c.version)?;
        }
        SymData::Register(r) => {
            write!(out, "{} {}, register {}", ty(r.type_), r.name, r.register)?;
        }
        SymData::Constant(c) => {
            write!(out, "{} {} = {}", ty(c.type_), c.name, c.value)?;
        }
        SymData::Udt(u) => write!(out, "{} {}", ty(u.type_), u.name)?,
        SymData::SSearch { offset, segment } => {
            write!(out, "[{segment:04x}:{offset:08x}]")?;
        }
        SymData::End => {}
        SymData::ObjName { signature, name } => {
            write!(out, "{name}, signature {signature:#x}")?;
        }
        SymData::BpRel(b) => {
            write!(out, "[bp{:+}] {} {}", b.offset, ty(b.type_), b.name)?;
        }
        SymData::Data(d) => {
            write!(
                out,
                "[{:04x}:{:08x}] {} {}",
                d.segment,
                d.offset,
                ty(d.type_),
                symbol_name(d.name, flags)
            )?;
        }
        SymData::Proc(p) => {
            write!(
                out,
                "[{:04x}:{:08x}] len {:#x}, type {}, {}",
                p.segment,
                p.offset,
                p.len,
                ty(p.type_),
                symbol_name(p.name, flags)
            )?;
            opens_scope = true;
        }
        SymData::Thunk(t) => {
            write!(
                out,
                "[{:04x}:{:08x}] len {:#x}, ordinal {}, {}",
                t.segment, t.offset, t.len, t.ordinal, t.name
            )?;
            opens_scope = true;
        }
        SymData::Block(b) => {
            write!(out, "[{:04x}:{:08x}] len {:#x}, {}", b.segment, b.offset, b.len, b.name)?;
            opens_scope = true;
        }
        SymData::Label(l) => {
            write!(out, "[{:04x}:{:08x}] {}", l.segment, l.offset, l.name)?;
        }
        SymData::RegRel(r) => {
            write!(
                out,
                "[reg {}{:+}] {} {}",
                r.register,
                r.offset,
                ty(r.type_),
                r.name
            )?;
        }
        SymData::Ref(r) => {
            write!(out, "module {}, offset {:#x}, {}", r.module, r.sym_offset, r.name)?;
        }
        SymData::Align => {}
        SymData::Raw(bytes) => write!(out, "({} bytes)", bytes.len())?,
    }

    Ok(opens_scope)
}

fn dump_types(out: &mut Report, block: &TypeBlock<'_>) -> anyhow::Result<()> {
    for t in block.types.iter() {
        write!(out, "{:#06x} {}: ", t.index, t.leaf)?;
        match t.parse() {
            Ok(data) => dump_type(out, &data)?,
            Err(e) => writeln!(out, "{e}")?,
        }
    }
    if let Some(e) = &block.error {
        writeln!(out, "{e}")?;
    }
    Ok(())
}

fn dump_type(out: &mut Report, data: &TypeData<'_>) -> anyhow::Result<()> {
    match data {
        TypeData::Modifier { type_, attributes } => {
            writeln!(out, "{} attributes {attributes:#x}", ty(*type_))?;
        }
        TypeData::Pointer { type_, attributes } => {
            writeln!(out, "{} attributes {attributes:#x}", ty(*type_))?;
        }
        TypeData::Array {
            element_type,
            index_type,
            size,
            name,
        } => {
            writeln!(
                out,
                "{} indexed by {}, size {size} {name}",
                ty(*element_type),
                ty(*index_type)
            )?;
        }
        TypeData::Struct(s) => {
            writeln!(
                out,
                "{} members {}, fields {}, property {:#x}, size {}",
                s.name,
                s.count,
                ty(s.field_list),
                s.property,
                s.size
            )?;
        }
        TypeData::Union {
            count,
            property,
            field_list,
            size,
            name,
        } => {
            writeln!(
                out,
                "{name} members {count}, fields {}, property {property:#x}, size {size}",
                ty(*field_list)
            )?;
        }
        TypeData::Enum {
            count,
            property,
            underlying_type,
            field_list,
            name,
        } => {
            writeln!(
                out,
                "{name} : {} members {count}, fields {}, property {property:#x}",
                ty(*underlying_type),
                ty(*field_list)
            )?;
        }
        TypeData::Procedure {
            return_type,
            call,
            params,
            arg_list,
            ..
        } => {
            writeln!(
                out,
                "returns {}, call {call}, {params} params {}",
                ty(*return_type),
                ty(*arg_list)
            )?;
        }
        TypeData::MemberFunction {
            return_type,
            class,
            this,
            call,
            params,
            arg_list,
            this_adjust,
            ..
        } => {
            writeln!(
                out,
                "returns {}, class {}, this {}, call {call}, {params} params {}, this adjust {this_adjust}",
                ty(*return_type),
                ty(*class),
                ty(*this),
                ty(*arg_list)
            )?;
        }
        TypeData::ArgList(args) => {
            let args: Vec<String> = args.iter().map(|&a| ty(a)).collect();
            writeln!(out, "({})", args.join(", "))?;
        }
        TypeData::FieldList(list) => {
            writeln!(out)?;
            out.nest(|out| dump_field_list(out, list))?;
        }
        TypeData::Bitfield {
            type_,
            length,
            position,
        } => {
            let end = *position as u32 + *length as u32;
            writeln!(out, "{} bits {position}..{end}", ty(*type_))?;
        }
        TypeData::Raw(bytes) => writeln!(out, "({} bytes)", bytes.len())?,
    }
    Ok(())
}

fn dump_field_list(out: &mut Report, list: &FieldList<'_>) -> anyhow::Result<()> {
    for field in list.fields.iter() {
        match field {
            Field::Member {
                type_,
                offset,
                name,
                ..
            } => writeln!(out, "member +{offset} {} {name}", ty(*type_))?,
            Field::Enumerate { value, name, .. } => writeln!(out, "enumerate {name} = {value}")?,
            Field::BaseClass { type_, offset, .. } => {
                writeln!(out, "base class {} at +{offset}", ty(*type_))?;
            }
            Field::VirtualBaseClass {
                indirect,
                base_type,
                vbptr_offset,
                vbtable_index,
                ..
            } => {
                writeln!(
                    out,
                    "{}virtual base class {}, vbptr +{vbptr_offset}, index {vbtable_index}",
                    if *indirect { "indirect " } else { "" },
                    ty(*base_type)
                )?;
            }
            Field::StaticMember { type_, name, .. } => {
                writeln!(out, "static member {} {name}", ty(*type_))?;
            }
            Field::Method {
                count,
                method_list,
                name,
            } => {
                writeln!(out, "method {name}, {count} overloads {}", ty(*method_list))?;
            }
            Field::NestedType { type_, name } => {
                writeln!(out, "nested type {} {name}", ty(*type_))?;
            }
            Field::VFuncTab { type_ } => writeln!(out, "vfunctab {}", ty(*type_))?,
            Field::OneMethod {
                type_,
                vbase_offset,
                name,
                ..
            } => {
                write!(out, "one method {} {name}", ty(*type_))?;
                if let Some(vbase) = vbase_offset {
                    write!(out, ", vtable offset {vbase:#x}")?;
                }
                writeln!(out)?;
            }
            Field::Index { type_ } => writeln!(out, "continued in {}", ty(*type_))?,
        }
    }
    if let Some(e) = &list.error {
        writeln!(out, "{e}")?;
    }
    Ok(())
}

fn dump_src_module(out: &mut Report, src: &SrcModule<'_>) -> anyhow::Result<()> {
    for seg in src.segments.iter() {
        writeln!(out, "segment {:04x}: {:08x} - {:08x}", seg.segment, seg.start, seg.end)?;
    }
    for file in src.files.iter() {
        let file = match file {
            Ok(file) => file,
            Err(e) => {
                writeln!(out, "{e}")?;
                continue;
            }
        };
        writeln!(out, "{}", file.name)?;
        out.nest(|out| {
            for block in file.blocks.iter() {
                match block {
                    Ok(block) => {
                        writeln!(
                            out,
                            "segment {:04x}, {} lines",
                            block.range.segment,
                            block.lines.len()
                        )?;
                        out.nest(|out| {
                            for &(offset, line) in block.lines.iter() {
                                writeln!(out, "{offset:08x} line {line}")?;
                            }
                            std::fmt::Result::Ok(())
                        })?;
                    }
                    Err(e) => writeln!(out, "{e}")?,
                }
            }
            anyhow::Ok(())
        })?;
    }
    Ok(())
}
