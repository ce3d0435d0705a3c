//! Bounds-checked access to the bytes of an input file.
//!
//! [`ImageView`] owns the whole file. Every read goes through [`ImageView::read`], which either
//! returns bytes entirely inside the file or nothing. [`Cursor`] is a sequential reader over a
//! window of the view that still knows where that window lives in the file, so that decoders can
//! report file offsets and follow file-relative pointers.

#[cfg(test)]
mod tests;

use crate::error::ParserError;
use crate::guid::GuidLe;
use anyhow::Context;
use bstr::BStr;
use imgdump_coff::IMAGE_SECTION_HEADER;
use std::mem::size_of;
use std::path::Path;
use uuid::Uuid;
use widestring::U16String;
use zerocopy::byteorder::{I16, I32, I64, LE, U16, U32, U64};
use zerocopy::{FromBytes, Immutable, KnownLayout, Unaligned};

/// The complete contents of one input file. Created once, never modified.
pub struct ImageView {
    bytes: Vec<u8>,
}

impl ImageView {
    /// Reads an entire file into memory.
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let bytes =
            std::fs::read(path).with_context(|| format!("cannot read {}", path.display()))?;
        tracing::debug!(len = bytes.len(), "opened {}", path.display());
        Ok(Self { bytes })
    }

    /// Wraps bytes that are already in memory.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// The size of the file.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// True if the file is empty.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// All of the bytes of the file.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Returns `size` bytes at `offset`, or `None` if any part of that range is outside the file.
    pub fn read(&self, offset: usize, size: usize) -> Option<&[u8]> {
        let end = offset.checked_add(size)?;
        self.bytes.get(offset..end)
    }

    /// Returns a reference to a structure at `offset`.
    pub fn get<T: FromBytes + Unaligned + KnownLayout + Immutable>(
        &self,
        offset: usize,
    ) -> Option<&T> {
        T::ref_from_bytes(self.read(offset, size_of::<T>())?).ok()
    }

    /// Returns a copy of a structure at `offset`.
    pub fn copy<T: FromBytes + Unaligned>(&self, offset: usize) -> Option<T> {
        T::read_from_bytes(self.read(offset, size_of::<T>())?).ok()
    }

    #[allow(missing_docs)]
    pub fn u8_at(&self, offset: usize) -> Option<u8> {
        self.bytes.get(offset).copied()
    }

    #[allow(missing_docs)]
    pub fn u16_at(&self, offset: usize) -> Option<u16> {
        Some(self.copy::<U16<LE>>(offset)?.get())
    }

    #[allow(missing_docs)]
    pub fn u32_at(&self, offset: usize) -> Option<u32> {
        Some(self.copy::<U32<LE>>(offset)?.get())
    }

    /// Reads a NUL-terminated string starting at `offset`. The terminator must be inside the file.
    pub fn strz_at(&self, offset: usize) -> Option<&BStr> {
        let rest = self.bytes.get(offset..)?;
        let len = rest.iter().position(|&b| b == 0)?;
        Some(BStr::new(&rest[..len]))
    }

    /// Creates a cursor over `size` bytes at `offset`.
    pub fn cursor_at(&self, offset: usize, size: usize) -> Option<Cursor<'_>> {
        let data = self.read(offset, size)?;
        Some(Cursor::with_base(data, offset))
    }

    /// Creates a cursor from `offset` to the end of the file.
    pub fn cursor_from(&self, offset: usize) -> Option<Cursor<'_>> {
        let data = self.bytes.get(offset..)?;
        Some(Cursor::with_base(data, offset))
    }

    /// Maps `[rva, rva + size)` to a file offset using the section table, then checks that the
    /// resulting file range is inside the file.
    pub fn translate_rva(
        &self,
        sections: &[IMAGE_SECTION_HEADER],
        rva: u32,
        size: u32,
    ) -> Option<usize> {
        let offset = rva_to_file_offset(sections, rva, size)?;
        self.read(offset, size as usize)?;
        Some(offset)
    }

    /// Returns the bytes of `[rva, rva + size)`, if the range maps into the file.
    pub fn read_rva(&self, sections: &[IMAGE_SECTION_HEADER], rva: u32, size: u32) -> Option<&[u8]> {
        let offset = self.translate_rva(sections, rva, size)?;
        self.read(offset, size as usize)
    }

    /// Reads a NUL-terminated string at an RVA. Only the first byte needs to map; the string may
    /// run on within the file.
    pub fn strz_at_rva(&self, sections: &[IMAGE_SECTION_HEADER], rva: u32) -> Option<&BStr> {
        let offset = self.translate_rva(sections, rva, 1)?;
        self.strz_at(offset)
    }
}

/// Maps an RVA range to a file offset without consulting the file size.
///
/// Sections are scanned last to first; the first section whose raw data fully contains
/// `[rva, rva + size)` wins. RVA 0 is treated as a null pointer and never maps.
pub fn rva_to_file_offset(sections: &[IMAGE_SECTION_HEADER], rva: u32, size: u32) -> Option<usize> {
    if rva == 0 {
        return None;
    }

    let end = rva.checked_add(size)?;

    for section in sections.iter().rev() {
        let va = section.virtual_address.get();
        let Some(section_end) = va.checked_add(section.size_of_raw_data.get()) else {
            continue;
        };
        if va <= rva && end <= section_end {
            let offset = section.pointer_to_raw_data.get() as usize + (rva - va) as usize;
            return Some(offset);
        }
    }

    None
}

/// A sequential reader over a window of an [`ImageView`].
///
/// Reads advance the position; a read that does not fit leaves the position unchanged and
/// returns [`ParserError`].
#[derive(Clone)]
pub struct Cursor<'a> {
    data: &'a [u8],
    base: usize,
    pos: usize,
}

impl<'a> Cursor<'a> {
    /// Starts a cursor over bytes that do not come from a file. File offsets start at zero.
    pub fn new(data: &'a [u8]) -> Self {
        Self::with_base(data, 0)
    }

    /// Starts a cursor over bytes that begin at file offset `base`.
    pub fn with_base(data: &'a [u8], base: usize) -> Self {
        Self { data, base, pos: 0 }
    }

    /// Number of bytes that have not been read yet.
    pub fn len(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Indicates whether there are any bytes left to read.
    pub fn is_empty(&self) -> bool {
        self.pos == self.data.len()
    }

    /// The whole window, including bytes already read.
    pub fn window(&self) -> &'a [u8] {
        self.data
    }

    /// Bytes that have not been read yet. The cursor does not advance.
    pub fn peek_rest(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }

    /// Takes all remaining bytes.
    pub fn take_rest(&mut self) -> &'a [u8] {
        let rest = &self.data[self.pos..];
        self.pos = self.data.len();
        rest
    }

    /// Position relative to the start of the window.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Position as an offset within the file.
    pub fn file_offset(&self) -> usize {
        self.base + self.pos
    }

    /// File offset of the start of the window.
    pub fn base(&self) -> usize {
        self.base
    }

    /// Moves to `pos`, relative to the start of the window. Moving to the very end is allowed.
    pub fn seek(&mut self, pos: usize) -> Result<(), ParserError> {
        if pos <= self.data.len() {
            self.pos = pos;
            Ok(())
        } else {
            Err(ParserError::new())
        }
    }

    /// Returns a cursor over the same window positioned at `pos`.
    pub fn at(&self, pos: usize) -> Result<Self, ParserError> {
        let mut c = self.clone();
        c.seek(pos)?;
        Ok(c)
    }

    /// Advances to the next multiple of `n` (relative to the start of the window).
    pub fn align(&mut self, n: usize) -> Result<(), ParserError> {
        let rem = self.pos % n;
        if rem != 0 {
            self.skip(n - rem)?;
        }
        Ok(())
    }

    /// Takes the next `n` bytes of input and returns a slice to it.
    #[inline(always)]
    pub fn bytes(&mut self, n: usize) -> Result<&'a [u8], ParserError> {
        if self.len() < n {
            return Err(ParserError::new());
        }
        let lo = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(lo)
    }

    /// Takes the next `n` bytes as a cursor of their own, which keeps the right file offsets.
    pub fn sub(&mut self, n: usize) -> Result<Cursor<'a>, ParserError> {
        let base = self.file_offset();
        let bytes = self.bytes(n)?;
        Ok(Cursor::with_base(bytes, base))
    }

    /// Takes everything that is left as a cursor of its own, starting at the current file offset.
    pub fn rest(&mut self) -> Cursor<'a> {
        let base = self.file_offset();
        Cursor::with_base(self.take_rest(), base)
    }

    /// Skips `n` bytes.
    pub fn skip(&mut self, n: usize) -> Result<(), ParserError> {
        self.bytes(n).map(|_| ())
    }

    /// Parses a reference to a structure.
    #[inline(always)]
    pub fn get<T: FromBytes + Unaligned + KnownLayout + Immutable>(
        &mut self,
    ) -> Result<&'a T, ParserError> {
        match T::ref_from_prefix(self.peek_rest()) {
            Ok((value, _)) => {
                self.pos += size_of::<T>();
                Ok(value)
            }
            Err(_) => Err(ParserError::new()),
        }
    }

    /// Parses a copy of a structure.
    #[inline(always)]
    pub fn copy<T: FromBytes + Unaligned>(&mut self) -> Result<T, ParserError> {
        let item = self.bytes(size_of::<T>())?;
        T::read_from_bytes(item).map_err(|_| ParserError::new())
    }

    /// Parses a slice of `n` items.
    pub fn slice<T: FromBytes + Unaligned + Immutable>(
        &mut self,
        n: usize,
    ) -> Result<&'a [T], ParserError> {
        match <[T]>::ref_from_prefix_with_elems(self.peek_rest(), n) {
            Ok((lo, _)) => {
                self.pos += size_of::<T>() * n;
                Ok(lo)
            }
            Err(_) => Err(ParserError::new()),
        }
    }

    /// Copies an array of bytes with a constant size.
    pub fn array<const N: usize>(&mut self) -> Result<[u8; N], ParserError> {
        self.copy()
    }

    /// Parses a `T` from the input, if `T` knows how to read from a `Cursor`.
    #[inline(always)]
    pub fn parse<T: Parse<'a>>(&mut self) -> Result<T, ParserError> {
        T::from_cursor(self)
    }

    /// Reads one byte and advances.
    pub fn u8(&mut self) -> Result<u8, ParserError> {
        let b = self.bytes(1)?;
        Ok(b[0])
    }

    /// Reads one signed byte and advances.
    pub fn i8(&mut self) -> Result<i8, ParserError> {
        Ok(self.u8()? as i8)
    }

    /// Reads an `i16` (in little-endian order) and advances.
    pub fn i16(&mut self) -> Result<i16, ParserError> {
        Ok(self.copy::<I16<LE>>()?.get())
    }

    /// Reads an `i32` (in little-endian order) and advances.
    pub fn i32(&mut self) -> Result<i32, ParserError> {
        Ok(self.copy::<I32<LE>>()?.get())
    }

    /// Reads an `i64` (in little-endian order) and advances.
    pub fn i64(&mut self) -> Result<i64, ParserError> {
        Ok(self.copy::<I64<LE>>()?.get())
    }

    /// Reads an `u16` (in little-endian order) and advances.
    pub fn u16(&mut self) -> Result<u16, ParserError> {
        Ok(self.copy::<U16<LE>>()?.get())
    }

    /// Reads an `u32` (in little-endian order) and advances.
    pub fn u32(&mut self) -> Result<u32, ParserError> {
        Ok(self.copy::<U32<LE>>()?.get())
    }

    /// Reads an `u64` (in little-endian order) and advances.
    pub fn u64(&mut self) -> Result<u64, ParserError> {
        Ok(self.copy::<U64<LE>>()?.get())
    }

    /// Reads an `f32` (in little-endian order) and advances.
    pub fn f32(&mut self) -> Result<f32, ParserError> {
        Ok(f32::from_le_bytes(self.array()?))
    }

    /// Reads an `f64` (in little-endian order) and advances.
    pub fn f64(&mut self) -> Result<f64, ParserError> {
        Ok(f64::from_le_bytes(self.array()?))
    }

    /// Reads a NUL-terminated string, without checking that it is UTF-8 encoded.
    pub fn strz(&mut self) -> Result<&'a BStr, ParserError> {
        let rest = self.peek_rest();
        match rest.iter().position(|&b| b == 0) {
            Some(i) => {
                self.pos += i + 1;
                Ok(BStr::new(&rest[..i]))
            }
            None => Err(ParserError::new()),
        }
    }

    /// Reads a string with a one-byte length prefix.
    pub fn strt(&mut self) -> Result<&'a BStr, ParserError> {
        let start = self.pos;
        let len = self.u8()?;
        match self.bytes(len as usize) {
            Ok(bytes) => Ok(BStr::new(bytes)),
            Err(e) => {
                self.pos = start;
                Err(e)
            }
        }
    }

    /// Reads `n` UTF-16 code units.
    pub fn utf16(&mut self, n: usize) -> Result<U16String, ParserError> {
        let units: &[U16<LE>] = self.slice(n)?;
        Ok(U16String::from_vec(
            units.iter().map(|u| u.get()).collect::<Vec<u16>>(),
        ))
    }

    /// Reads a NUL-terminated UTF-16 string.
    pub fn utf16z(&mut self) -> Result<U16String, ParserError> {
        let start = self.pos;
        let mut units = Vec::new();
        loop {
            match self.u16() {
                Ok(0) => return Ok(U16String::from_vec(units)),
                Ok(u) => units.push(u),
                Err(e) => {
                    self.pos = start;
                    return Err(e);
                }
            }
        }
    }

    /// Reads a GUID in its on-disk layout.
    pub fn guid(&mut self) -> Result<Uuid, ParserError> {
        Ok(self.get::<GuidLe>()?.get())
    }
}

/// Defines types that can parse from a [`Cursor`].
pub trait Parse<'a>
where
    Self: Sized,
{
    /// Parses an instance of `Self` from a `Cursor`.
    fn from_cursor(c: &mut Cursor<'a>) -> Result<Self, ParserError>;

    /// Parses an instance of `Self` from a byte slice.
    fn parse(bytes: &'a [u8]) -> Result<Self, ParserError> {
        Self::from_cursor(&mut Cursor::new(bytes))
    }
}
