//! Decoders for the binary container formats produced by Windows toolchains.
//!
//! The input file is loaded once into an [`ImageView`]. [`identify`] looks at its leading magic
//! numbers and picks a [`FormatKind`]; [`decode`] then runs the decoder for that kind and returns
//! a tree of typed records. Nothing in this crate writes text; rendering is left to the caller.
//!
//! Decoding failures come in three severities, described in [`error`].
//!
//! # References
//! * <https://learn.microsoft.com/en-us/windows/win32/debug/pe-format>
//! * `cvinfo.h`, `oaidl.h`, `minidumpapiset.h`

#![allow(non_camel_case_types)]
#![forbid(unsafe_code)]
#![forbid(unused_must_use)]
#![warn(missing_docs)]
#![allow(clippy::collapsible_else_if)]
#![allow(clippy::needless_lifetimes)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::upper_case_acronyms)]

pub mod codeview;
pub mod dbg;
pub mod demangle;
pub mod dos;
pub mod emf;
pub mod error;
pub mod guid;
pub mod hive;
pub mod le;
pub mod minidump;
pub mod ne;
pub mod pe;
pub mod sig;
pub mod tlb;
pub mod view;

pub use error::{LocalError, LocalResult, ParserError};
pub use sig::{Decoded, FormatKind, decode, identify};
pub use view::{Cursor, ImageView, Parse};

/// Says what an offset in a [`DirectoryEntry`] is relative to.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Base {
    /// An offset from the start of the file.
    FileOffset,
    /// A relative virtual address, mapped through the section table.
    Rva,
    /// An offset from the start of an enclosing subsection or debug blob.
    SubsectionRelative,
    /// An offset from the start of a segment in the containing table.
    SegmentRelative,
}

/// A `{ offset, length, tag }` descriptor pointing at a variable-length structure elsewhere in the
/// same file.
///
/// This is the shape shared by PE data directories, debug directory entries, OMF subsection
/// directory entries and MSFT segment descriptors. Only the decoder that produced the entry knows
/// what `offset` is relative to; it records that in `base`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct DirectoryEntry {
    /// Where the described data starts, relative to `base`.
    pub offset: u32,
    /// Size in bytes of the described data.
    pub length: u32,
    /// The kind-specific tag: directory slot, debug type, subsection kind or segment number.
    pub tag: u32,
    #[allow(missing_docs)]
    pub base: Base,
}

impl DirectoryEntry {
    /// Creates an entry.
    pub fn new(base: Base, tag: u32, offset: u32, length: u32) -> Self {
        Self {
            offset,
            length,
            tag,
            base,
        }
    }

    /// True if the entry does not describe anything.
    pub fn is_empty(&self) -> bool {
        self.offset == 0 && self.length == 0
    }
}

#[cfg(test)]
#[static_init::dynamic]
static INIT_LOGGER: () = {
    tracing_subscriber::fmt()
        .with_ansi(false)
        .with_test_writer()
        .with_file(true)
        .with_line_number(true)
        .with_max_level(tracing::Level::DEBUG)
        .compact()
        .without_time()
        .init();
};
