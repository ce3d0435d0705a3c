//! The help-string compressor used by SLTG type libraries.
//!
//! Strings are stored as a sequence of tokens (usually words), each encoded as a path through a
//! binary trie. The trie is a byte table of nodes:
//!
//! ```text
//! interior: 0x80 hi lo          1-bit: go to the next node (+3), 0-bit: go to table[hi << 8 | lo]
//! terminal: xx token... 0x00    xx != 0x80; an empty token ends the string
//! ```
//!
//! Bits are consumed most significant first.

use crate::error::{LocalError, LocalResult};
use crate::view::Cursor;
use bstr::ByteSlice;

const INTERIOR: u8 = 0x80;

/// Reads bits from a compressed string, left to right. Never rewinds.
pub struct Bitstream<'a> {
    input: &'a [u8],
    /// The current byte in bits 8..16, with a marker bit below it. When the marker has been
    /// shifted out of the low byte, the next input byte is loaded.
    current: u32,
}

impl<'a> Bitstream<'a> {
    #[allow(missing_docs)]
    pub fn new(input: &'a [u8]) -> Self {
        Self { input, current: 0 }
    }

    /// Returns the next bit, or `None` once the input is exhausted.
    pub fn next_bit(&mut self) -> Option<bool> {
        if self.current & 0xff == 0 {
            let (&b, rest) = self.input.split_first()?;
            self.input = rest;
            self.current = (b as u32) << 8 | 1;
        }
        let bit = self.current & 0x8000 != 0;
        self.current <<= 1;
        Some(bit)
    }
}

/// The trie and length limit shared by all help strings of one library.
#[derive(Clone, Debug, Default)]
pub struct CompressionTable {
    /// The longest string the table can produce, in bytes.
    pub max_len: u16,
    #[allow(missing_docs)]
    pub table: Vec<u8>,
}

impl CompressionTable {
    /// Reads `max_len: u16, size: u32, table: [u8; size]`.
    pub fn read(c: &mut Cursor<'_>) -> LocalResult<Self> {
        let max_len = c.u16()?;
        let size = c.u32()? as usize;
        if size > c.len() {
            return Err(LocalError::overrun("help string table"));
        }
        Ok(Self {
            max_len,
            table: c.bytes(size)?.to_vec(),
        })
    }

    /// Decompresses one string.
    pub fn decode(&self, stream: &[u8]) -> LocalResult<String> {
        let mut bits = Bitstream::new(stream);
        let mut out = String::new();
        let max = self.max_len as usize;

        while let Some(token) = self.next_token(&mut bits)? {
            let sep = usize::from(!out.is_empty());
            // A token that would not fit, with its terminator, ends the string.
            if out.len() + sep + token.len() + 1 > max {
                break;
            }
            if sep != 0 {
                out.push(' ');
            }
            out.push_str(&token.to_str_lossy());
        }
        Ok(out)
    }

    /// Walks the trie from the root. `None` means the string has ended, either through an empty
    /// token or because the stream ran out.
    fn next_token<'t>(&'t self, bits: &mut Bitstream<'_>) -> LocalResult<Option<&'t [u8]>> {
        let t = &self.table[..];
        let mut p = 0usize;

        while t.get(p) == Some(&INTERIOR) {
            if p + 2 >= t.len() {
                return Err(LocalError::invalid("truncated help string table node"));
            }
            let Some(bit) = bits.next_bit() else {
                return Ok(None);
            };
            p = if bit {
                p + 3
            } else {
                (t[p + 1] as usize) << 8 | t[p + 2] as usize
            };
            if p >= t.len() {
                return Err(LocalError::invalid("help string table offset out of range"));
            }
        }

        let Some(rest) = t.get(p + 1..) else {
            return Ok(None);
        };
        match rest.iter().position(|&b| b == 0) {
            Some(0) => Ok(None),
            Some(n) => Ok(Some(&rest[..n])),
            None if rest.is_empty() => Ok(None),
            None => Err(LocalError::invalid("unterminated help string token")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Codes: `11` = "hi", `10` = "yo", `0` = end.
    #[rustfmt::skip]
    static TRIE: &[u8] = &[
        /* 0x0000 */ 0x80, 0x00, 0x0a,         // root
        /* 0x0003 */ 0x80, 0x00, 0x0e,
        /* 0x0006 */ 0x01, b'h', b'i', 0x00,
        /* 0x000a */ 0x01, 0x00,               // end of string
        /* 0x000c */ 0x00, 0x00,
        /* 0x000e */ 0x01, b'y', b'o', 0x00,
    ];

    fn table(max_len: u16) -> CompressionTable {
        CompressionTable {
            max_len,
            table: TRIE.to_vec(),
        }
    }

    #[test]
    fn bits_msb_first() {
        let mut bits = Bitstream::new(&[0xa0, 0x01]);
        let v: Vec<bool> = std::iter::from_fn(|| bits.next_bit()).collect();
        assert_eq!(v.len(), 16);
        assert_eq!(&v[..3], &[true, false, true]);
        assert!(v[15]);
        assert!(!v[14]);
    }

    #[test]
    fn tokens_joined_by_spaces() {
        // 11 10 0
        assert_eq!(table(100).decode(&[0b1110_0000]).unwrap(), "hi yo");
    }

    #[test]
    fn exhausted_stream_ends_string() {
        assert_eq!(table(100).decode(&[0xff]).unwrap(), "hi hi hi hi");
        assert_eq!(table(100).decode(&[]).unwrap(), "");
    }

    #[test]
    fn capped_at_max_len() {
        assert_eq!(table(6).decode(&[0xff]).unwrap(), "hi hi");
        assert_eq!(table(5).decode(&[0xff]).unwrap(), "hi");
        assert_eq!(table(4).decode(&[0xff]).unwrap(), "hi");
        assert_eq!(table(2).decode(&[0xff]).unwrap(), "");
    }

    #[test]
    fn damaged_table_fails_one_string() {
        let mut t = table(100);
        t.table[2] = 0x40;
        assert!(matches!(t.decode(&[0x00]), Err(LocalError::Invalid { .. })));
        // Strings that never take the damaged branch still decode.
        assert_eq!(t.decode(&[0xff]).unwrap(), "hi hi hi hi");

        let unterminated = CompressionTable {
            max_len: 10,
            table: vec![0x01, b'a', b'b'],
        };
        assert!(unterminated.decode(&[0x00]).is_err());
    }

    #[test]
    fn read_table_header() {
        let mut bytes = vec![0x20, 0x00, 0x12, 0x00, 0x00, 0x00];
        bytes.extend_from_slice(TRIE);
        let t = CompressionTable::read(&mut Cursor::new(&bytes)).unwrap();
        assert_eq!(t.max_len, 0x20);
        assert_eq!(t.table.len(), TRIE.len());

        bytes[2] = 0x40;
        assert!(matches!(
            CompressionTable::read(&mut Cursor::new(&bytes)),
            Err(LocalError::Overrun { .. })
        ));
    }
}
