//! Utilities for rendering decoded records as indented text, and byte slices as hex.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![allow(clippy::collapsible_else_if)]

use std::fmt::{Debug, Formatter, Write};

/// Dumps a byte slice. The bytes are formatted into rows, with a byte offset displayed on the
/// left, the byte values in hex in the center, and ASCII characters on the right. Runs of
/// identical rows are collapsed into one line.
pub struct HexDump<'a> {
    bytes: &'a [u8],
    start: usize,
}

const ROW_LEN: usize = 16;

impl<'a> HexDump<'a> {
    /// Creates a `HexDump` over a byte slice, with offsets starting at 0.
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, start: 0 }
    }

    /// Sets the displayed byte offset to a value.
    pub fn at(self, start: usize) -> Self {
        Self { start, ..self }
    }
}

impl<'a> Debug for HexDump<'a> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        let mut pos = self.start;

        let mut repeat_start: usize = 0;
        let mut repeat_len: usize = 0;
        let mut repeat_byte: u8 = 0;

        for row in self.bytes.chunks(ROW_LEN) {
            if row.len() == ROW_LEN {
                if repeat_len != 0 {
                    // Are we extending a repeated set of rows?
                    if row.iter().all(|&b| b == repeat_byte) {
                        repeat_len += ROW_LEN;
                        pos += ROW_LEN;
                        continue;
                    }
                } else {
                    // Did we find the beginning of a new repeated row?
                    let row0 = row[0];
                    if row.iter().all(|&b| b == row0) {
                        repeat_byte = row0;
                        repeat_start = pos;
                        repeat_len = ROW_LEN;
                        pos += ROW_LEN;
                        continue;
                    }
                }
            }

            if repeat_len != 0 {
                writeln!(f, "{repeat_start:08x} : ... {repeat_byte:02x} repeated ...")?;
                repeat_len = 0;
            }

            write!(f, "{pos:08x} : ")?;
            for &b in row.iter() {
                write!(f, " {:02x}", b)?;
            }
            for _ in 0..(ROW_LEN - row.len()) * 3 {
                f.write_char(' ')?;
            }

            f.write_str(" : ")?;
            for &b in row.iter() {
                let c = if matches!(b, 0x20..=0x7e) {
                    char::from(b)
                } else {
                    '.'
                };
                f.write_char(c)?;
            }
            f.write_char('\n')?;

            pos += ROW_LEN;
        }

        if repeat_len != 0 {
            writeln!(f, "{repeat_start:08x} : ... {repeat_byte:02x} repeated ...")?;
            writeln!(f, "{pos:08x} : (end)")?;
        }

        Ok(())
    }
}

/// Helps display indentation in debug output
#[derive(Copy, Clone)]
pub struct Indent(pub u32);

impl std::fmt::Display for Indent {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        for _ in 0..self.0 {
            fmt.write_char(' ')?;
        }
        Ok(())
    }
}

/// Creates an `Indent`.
pub fn indent(n: u32) -> Indent {
    Indent(n)
}

/// Spaces per nesting level of a [`Report`].
const STEP: u32 = 2;

/// Accumulates an indented text report.
///
/// `Report` implements [`std::fmt::Write`], so the usual `write!` and `writeln!` macros work on
/// it. Every non-empty line is prefixed with the current indentation, including the rows of a
/// [`HexDump`] written through it. Nesting is scoped by [`Report::nest`].
pub struct Report {
    out: String,
    depth: u32,
    width: usize,
    line_start: bool,
}

impl Default for Report {
    fn default() -> Self {
        Self::new()
    }
}

impl Report {
    /// Creates an empty report.
    pub fn new() -> Self {
        Self {
            out: String::new(),
            depth: 0,
            width: 0,
            line_start: true,
        }
    }

    /// Writes one `name: value` line. Inside [`Report::fields`] the values line up in a column.
    pub fn field(&mut self, name: &str, value: impl std::fmt::Display) -> std::fmt::Result {
        let pad = self.width.saturating_sub(name.len());
        writeln!(self, "{name}:{} {value}", indent(pad as u32))
    }

    /// Writes a `name: value` line if `value` is present.
    pub fn opt_field<T: std::fmt::Display>(
        &mut self,
        name: &str,
        value: Option<T>,
    ) -> std::fmt::Result {
        match value {
            Some(v) => self.field(name, v),
            None => Ok(()),
        }
    }

    /// Runs `f` one level deeper. The level is restored even if `f` fails.
    pub fn nest<T, E>(&mut self, f: impl FnOnce(&mut Self) -> Result<T, E>) -> Result<T, E> {
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    /// Runs `f` one level deeper, padding the names written by [`Report::field`] to `width`.
    pub fn fields<T, E>(
        &mut self,
        width: usize,
        f: impl FnOnce(&mut Self) -> Result<T, E>,
    ) -> Result<T, E> {
        self.nest(|r| r.aligned(width, f))
    }

    /// Like [`Report::fields`], but at the current level.
    pub fn aligned<T, E>(
        &mut self,
        width: usize,
        f: impl FnOnce(&mut Self) -> Result<T, E>,
    ) -> Result<T, E> {
        let outer = std::mem::replace(&mut self.width, width);
        let result = f(self);
        self.width = outer;
        result
    }

    /// Writes a hex dump of `bytes` at the current level, labelling rows from offset `at`.
    pub fn hex(&mut self, bytes: &[u8], at: usize) -> std::fmt::Result {
        write!(self, "{:?}", HexDump::new(bytes).at(at))
    }

    /// The text written so far.
    pub fn as_str(&self) -> &str {
        &self.out
    }

    /// Consumes the report, returning its text.
    pub fn finish(self) -> String {
        self.out
    }
}

impl Write for Report {
    fn write_str(&mut self, s: &str) -> std::fmt::Result {
        for piece in s.split_inclusive('\n') {
            if self.line_start && piece != "\n" {
                write!(self.out, "{}", indent(self.depth * STEP))?;
            }
            self.out.push_str(piece);
            self.line_start = piece.ends_with('\n');
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_fields() {
        let mut r = Report::new();
        writeln!(r, "header").unwrap();
        r.nest(|r| {
            r.field("machine", "x86")?;
            writeln!(r)?;
            r.nest(|r| r.field("count", 3))
        })
        .unwrap();
        r.field("end", true).unwrap();

        assert_eq!(
            r.finish(),
            "header\n  machine: x86\n\n    count: 3\nend: true\n"
        );
    }

    #[test]
    fn aligned_fields() {
        let mut r = Report::new();
        writeln!(r, "Header:").unwrap();
        r.fields(8, |r| {
            r.field("a", 1)?;
            r.field("longer", 2)?;
            r.opt_field("absent", None::<u32>)?;
            r.opt_field("present", Some("x"))
        })
        .unwrap();
        r.field("after", 3).unwrap();
        assert_eq!(
            r.as_str(),
            "Header:\n  a:        1\n  longer:   2\n  present:  x\nafter: 3\n"
        );
    }

    #[test]
    fn aligned_keeps_level() {
        let mut r = Report::new();
        r.nest(|r| {
            writeln!(r, "title")?;
            r.aligned(5, |r| r.field("id", 7))
        })
        .unwrap();
        r.field("id", 8).unwrap();
        assert_eq!(r.as_str(), "  title\n  id:    7\nid: 8\n");
    }

    #[test]
    fn nest_restores_depth_on_error() {
        let mut r = Report::new();
        let result: Result<(), &str> = r.fields(10, |_| Err("damaged"));
        assert!(result.is_err());
        r.field("x", 1).unwrap();
        assert_eq!(r.as_str(), "x: 1\n");
    }

    #[test]
    fn partial_lines_are_indented_once() {
        let mut r = Report::new();
        r.nest(|r| {
            write!(r, "a")?;
            write!(r, "b")?;
            writeln!(r, "c")
        })
        .unwrap();
        assert_eq!(r.as_str(), "  abc\n");
    }

    #[test]
    fn repeated_rows_collapse() {
        let mut bytes = vec![0u8; 48];
        bytes.push(0x41);
        let dump = format!("{:?}", HexDump::new(&bytes).at(0x100));
        assert_eq!(
            dump,
            format!(
                "00000100 : ... 00 repeated ...\n00000130 :  41{} : A\n",
                " ".repeat(45)
            )
        );
    }

    #[test]
    fn hex_rows_are_indented() {
        let mut r = Report::new();
        r.nest(|r| r.hex(b"MZ", 0x40)).unwrap();
        assert_eq!(
            r.as_str(),
            format!("  00000040 :  4d 5a{} : MZ\n", " ".repeat(42))
        );
    }
}
