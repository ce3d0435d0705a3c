use super::{DumpFlags, payload};
use dump_utils::Report;
use imgdump::hive::{HBIN_START, Hive, ValueData, value_type_name};
use std::fmt::Write;

pub fn dump_hive(out: &mut Report, hive: &Hive<'_>, flags: DumpFlags) -> anyhow::Result<()> {
    let b = hive.base;
    writeln!(out, "Base block:")?;
    out.fields(12, |out| {
        let dirty = if b.primary_sequence.get() != b.secondary_sequence.get() {
            " (dirty)"
        } else {
            ""
        };
        out.field(
            "sequence",
            format_args!("{} / {}{dirty}", b.primary_sequence.get(), b.secondary_sequence.get()),
        )?;
        out.field("last written", format_args!("{:#018x}", b.last_written.get()))?;
        out.field(
            "version",
            format_args!("{}.{}", b.major_version.get(), b.minor_version.get()),
        )?;
        out.field("type", b.file_type.get())?;
        out.field("format", b.file_format.get())?;
        out.field(
            "root cell",
            format_args!(
                "{:#x} (file offset {:#x})",
                b.root_cell.get(),
                b.root_cell.get() as usize + HBIN_START
            ),
        )?;
        out.field("bins size", format_args!("{:#x}", b.hive_bins_size.get()))?;
        out.field("file name", &hive.file_name)
    })?;
    writeln!(out)?;

    match &hive.root {
        Ok(root) => {
            writeln!(out, "Keys ({}):", hive.keys.len())?;
            out.nest(|out| dump_key(out, hive, *root, flags))?;
        }
        Err(e) => writeln!(out, "Root key: {e}")?,
    }
    Ok(())
}

fn dump_key(out: &mut Report, hive: &Hive<'_>, index: usize, flags: DumpFlags) -> anyhow::Result<()> {
    let Some(key) = hive.keys.get(index) else {
        writeln!(out, "key {index}: {}", imgdump::LocalError::OutOfBounds)?;
        return Ok(());
    };

    let name = if key.depth == 0 && key.name.is_empty() {
        "\\"
    } else {
        key.name.as_str()
    };
    writeln!(
        out,
        "[{name}] cell {:#x}, {} subkeys, {} values",
        key.cell,
        key.node.subkey_count.get(),
        key.node.value_count.get()
    )?;

    out.nest(|out| {
        match &key.values {
            Ok(values) => {
                for v in values.iter() {
                    let name = if v.name.is_empty() { "@" } else { v.name.as_str() };
                    write!(out, "{name} = {}: ", value_type_name(v.data_type))?;
                    match &v.data {
                        Ok(data) => dump_value(out, data, flags)?,
                        Err(e) => writeln!(out, "{e}")?,
                    }
                }
            }
            Err(e) => writeln!(out, "values: {e}")?,
        }

        match &key.subkeys {
            Ok(subkeys) => {
                for child in subkeys.iter() {
                    match child {
                        Ok(child) => dump_key(out, hive, *child, flags)?,
                        Err(e) => writeln!(out, "subkey: {e}")?,
                    }
                }
            }
            Err(e) => writeln!(out, "subkeys: {e}")?,
        }
        anyhow::Ok(())
    })
}

fn dump_value(out: &mut Report, data: &ValueData<'_>, flags: DumpFlags) -> anyhow::Result<()> {
    match data {
        ValueData::String(s) | ValueData::ExpandString(s) | ValueData::Link(s) => {
            writeln!(out, "{s:?}")?
        }
        ValueData::MultiString(items) => {
            writeln!(out, "{} strings", items.len())?;
            out.nest(|out| {
                for s in items.iter() {
                    writeln!(out, "{s:?}")?;
                }
                std::fmt::Result::Ok(())
            })?;
        }
        ValueData::Dword(v) | ValueData::DwordBigEndian(v) => writeln!(out, "{v:#010x} ({v})")?,
        ValueData::Qword(v) => writeln!(out, "{v:#018x} ({v})")?,
        ValueData::Binary(bytes) => {
            if flags.hex {
                writeln!(out)?;
            }
            payload(out, bytes, 0, flags)?;
        }
    }
    Ok(())
}

