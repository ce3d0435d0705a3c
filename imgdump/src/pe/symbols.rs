//! COFF symbol tables.
//!
//! A table is an array of 18-byte records followed by a string table: a `u32` byte length
//! (which counts itself) and the NUL-terminated long names. Auxiliary records follow the
//! symbol that owns them and are skipped.

use crate::error::{LocalError, LocalResult};
use crate::view::{Cursor, ImageView};
use bstr::BStr;
use imgdump_coff::{IMAGE_COFF_SYMBOLS_HEADER, IMAGE_SIZEOF_SYMBOL, IMAGE_SYMBOL};

/// One symbol record.
pub struct CoffSymbol<'a> {
    /// Index of the record, counting auxiliary records.
    pub index: u32,
    #[allow(missing_docs)]
    pub name: LocalResult<&'a BStr>,
    #[allow(missing_docs)]
    pub value: u32,
    /// One-based section number, or 0, -1 or -2 for undefined, absolute and debug symbols.
    pub section: i16,
    #[allow(missing_docs)]
    pub ty: u16,
    #[allow(missing_docs)]
    pub storage_class: u8,
    /// The auxiliary records that follow.
    pub aux: &'a [IMAGE_SYMBOL],
}

/// The contents of an `IMAGE_DEBUG_TYPE_COFF` debug entry.
pub struct CoffDebug<'a> {
    #[allow(missing_docs)]
    pub header: &'a IMAGE_COFF_SYMBOLS_HEADER,
    #[allow(missing_docs)]
    pub symbols: LocalResult<Vec<CoffSymbol<'a>>>,
}

/// Decodes the symbol table that the file header points at.
pub(crate) fn decode_file_table(
    view: &ImageView,
    offset: u32,
    count: u32,
) -> LocalResult<Vec<CoffSymbol<'_>>> {
    let c = view
        .cursor_from(offset as usize)
        .ok_or(LocalError::OutOfBounds)?;
    decode_table(c, count)
}

/// Decodes a COFF debug entry. The symbol offset in its header is relative to the header.
pub(crate) fn decode_debug<'a>(c: &Cursor<'a>) -> LocalResult<CoffDebug<'a>> {
    let header: &IMAGE_COFF_SYMBOLS_HEADER = c.clone().get()?;
    let symbols = c
        .at(header.lva_to_first_symbol.get() as usize)
        .map_err(LocalError::from)
        .and_then(|table| decode_table(table, header.number_of_symbols.get()));
    Ok(CoffDebug { header, symbols })
}

fn decode_table(mut c: Cursor<'_>, count: u32) -> LocalResult<Vec<CoffSymbol<'_>>> {
    let count = count as usize;
    if count > c.len() / IMAGE_SIZEOF_SYMBOL {
        return Err(LocalError::overrun("COFF symbols"));
    }
    let records: &[IMAGE_SYMBOL] = c.slice(count)?;

    // The string table is optional in images that only have short names.
    let strings = match c.clone().u32() {
        Ok(len) if len >= 4 => c.bytes(len as usize).ok(),
        _ => None,
    };
    tracing::debug!(count, has_strings = strings.is_some(), "COFF symbol table");

    let mut symbols = Vec::new();
    let mut i = 0;
    while i < records.len() {
        let sym = &records[i];
        let aux_end = (i + 1 + sym.number_of_aux_symbols as usize).min(records.len());
        symbols.push(CoffSymbol {
            index: i as u32,
            name: symbol_name(sym, strings),
            value: sym.value.get(),
            section: sym.section_number.get(),
            ty: sym.type_.get(),
            storage_class: sym.storage_class,
            aux: &records[i + 1..aux_end],
        });
        i = aux_end;
    }
    Ok(symbols)
}

fn symbol_name<'a>(sym: &'a IMAGE_SYMBOL, strings: Option<&'a [u8]>) -> LocalResult<&'a BStr> {
    let Some(offset) = sym.long_name_offset() else {
        return Ok(BStr::new(sym.short_name()));
    };
    let strings = strings.ok_or(LocalError::overrun("COFF string table"))?;
    let rest = strings
        .get(offset as usize..)
        .ok_or(LocalError::OutOfBounds)?;
    let end = rest
        .iter()
        .position(|&b| b == 0)
        .ok_or(LocalError::overrun("COFF symbol name"))?;
    Ok(BStr::new(&rest[..end]))
}
