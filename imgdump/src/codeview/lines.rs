//! `sstSrcModule`: line numbers of one module, by source file and code segment.
//!
//! ```text
//! header:     cFile u16, cSeg u16, baseSrcFile u32[cFile], (start, end) u32[cSeg], seg u16[cSeg]
//! file:       cSeg u16, pad u16, baseSrcLn u32[cSeg], (start, end) u32[cSeg], name
//! line block: seg u16, cPair u16, offset u32[cPair], line u16[cPair]
//! ```
//!
//! All `base*` offsets are relative to the start of the subsection.

use crate::error::{LocalError, LocalResult, isolate};
use crate::view::Cursor;
use bstr::BStr;
use zerocopy::{LE, U16, U32};

/// The decoded `sstSrcModule` subsection.
pub struct SrcModule<'a> {
    /// The code ranges of the module, one per segment.
    pub segments: Vec<SegmentRange>,
    /// The source files. Each decodes independently.
    pub files: Vec<LocalResult<SourceFile<'a>>>,
}

/// A range of code in one segment.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SegmentRange {
    #[allow(missing_docs)]
    pub segment: u16,
    #[allow(missing_docs)]
    pub start: u32,
    #[allow(missing_docs)]
    pub end: u32,
}

/// One source file and its line blocks.
pub struct SourceFile<'a> {
    #[allow(missing_docs)]
    pub name: &'a BStr,
    /// One block per segment the file contributes code to.
    pub blocks: Vec<LocalResult<LineBlock>>,
}

/// The line numbers of one source file within one segment.
pub struct LineBlock {
    /// The code range covered, taken from the file entry.
    pub range: SegmentRange,
    /// `(offset, line)` pairs.
    pub lines: Vec<(u32, u16)>,
}

/// Decodes an `sstSrcModule` subsection. `c` covers exactly the subsection.
pub fn decode_src_module<'a>(mut c: Cursor<'a>) -> LocalResult<SrcModule<'a>> {
    let whole = c.clone();
    let file_count = c.u16()? as usize;
    let seg_count = c.u16()? as usize;
    if file_count * 4 + seg_count * 10 > c.len() {
        return Err(LocalError::overrun("source module header"));
    }

    let file_offsets: &[U32<LE>] = c.slice(file_count)?;
    let ranges: &[U32<LE>] = c.slice(seg_count * 2)?;
    let segs: &[U16<LE>] = c.slice(seg_count)?;

    let segments = segs
        .iter()
        .zip(ranges.chunks_exact(2))
        .map(|(seg, r)| SegmentRange {
            segment: seg.get(),
            start: r[0].get(),
            end: r[1].get(),
        })
        .collect();

    let files = file_offsets
        .iter()
        .map(|off| isolate("source file", || decode_file(&whole, off.get() as usize)))
        .collect();

    Ok(SrcModule { segments, files })
}

fn decode_file<'a>(whole: &Cursor<'a>, offset: usize) -> LocalResult<SourceFile<'a>> {
    let mut c = whole.at(offset)?;
    let seg_count = c.u16()? as usize;
    c.skip(2)?;
    if seg_count * 12 > c.len() {
        return Err(LocalError::overrun("source file segments"));
    }

    let line_offsets: &[U32<LE>] = c.slice(seg_count)?;
    let ranges: &[U32<LE>] = c.slice(seg_count * 2)?;
    let name = c.strt()?;

    let blocks = line_offsets
        .iter()
        .zip(ranges.chunks_exact(2))
        .map(|(off, r)| decode_block(whole, off.get() as usize, r[0].get(), r[1].get()))
        .collect();

    Ok(SourceFile { name, blocks })
}

fn decode_block(whole: &Cursor<'_>, offset: usize, start: u32, end: u32) -> LocalResult<LineBlock> {
    let mut c = whole.at(offset)?;
    let segment = c.u16()?;
    let count = c.u16()? as usize;
    if count * 6 > c.len() {
        return Err(LocalError::overrun("line numbers"));
    }

    let offsets: &[U32<LE>] = c.slice(count)?;
    let lines: &[U16<LE>] = c.slice(count)?;

    Ok(LineBlock {
        range: SegmentRange {
            segment,
            start,
            end,
        },
        lines: offsets
            .iter()
            .zip(lines)
            .map(|(o, l)| (o.get(), l.get()))
            .collect(),
    })
}
