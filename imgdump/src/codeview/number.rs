//! Numeric leaves: the variable-length integers (and occasionally reals or strings) embedded in
//! type and symbol records.

use super::kinds::Leaf;
use crate::error::ParserError;
use crate::view::{Cursor, Parse};
use bstr::BStr;
use std::fmt;

/// A decoded numeric leaf.
#[derive(Clone, Debug, PartialEq)]
pub enum Number<'a> {
    /// Values below `LF_NUMERIC` are stored directly in the leaf.
    Immediate(u16),
    /// `LF_CHAR`, `LF_SHORT`, `LF_LONG`, `LF_QUADWORD`
    Signed(i64),
    /// `LF_USHORT`, `LF_ULONG`, `LF_UQUADWORD`
    Unsigned(u64),
    #[allow(missing_docs)]
    Real32(f32),
    #[allow(missing_docs)]
    Real64(f64),
    /// `LF_VARSTRING`
    String(&'a BStr),
    /// A leaf with a known size whose value is not interpreted.
    Other {
        #[allow(missing_docs)]
        leaf: Leaf,
        #[allow(missing_docs)]
        bytes: &'a [u8],
    },
}

impl<'a> Number<'a> {
    /// The value as an integer, if it is one.
    pub fn as_u64(&self) -> Option<u64> {
        match *self {
            Self::Immediate(n) => Some(n as u64),
            Self::Signed(n) => Some(n as u64),
            Self::Unsigned(n) => Some(n),
            _ => None,
        }
    }
}

impl<'a> Parse<'a> for Number<'a> {
    fn from_cursor(c: &mut Cursor<'a>) -> Result<Self, ParserError> {
        let start = c.position();
        let leaf = c.u16()?;
        if leaf < Leaf::LF_NUMERIC {
            return Ok(Self::Immediate(leaf));
        }

        let r = match Leaf(leaf) {
            Leaf::LF_CHAR => c.i8().map(|n| Self::Signed(n as i64)),
            Leaf::LF_SHORT => c.i16().map(|n| Self::Signed(n as i64)),
            Leaf::LF_USHORT => c.u16().map(|n| Self::Unsigned(n as u64)),
            Leaf::LF_LONG => c.i32().map(|n| Self::Signed(n as i64)),
            Leaf::LF_ULONG => c.u32().map(|n| Self::Unsigned(n as u64)),
            Leaf::LF_QUADWORD => c.i64().map(Self::Signed),
            Leaf::LF_UQUADWORD => c.u64().map(Self::Unsigned),
            Leaf::LF_REAL32 => c.f32().map(Self::Real32),
            Leaf::LF_REAL64 => c.f64().map(Self::Real64),
            Leaf::LF_VARSTRING => c
                .u16()
                .and_then(|n| c.bytes(n as usize))
                .map(|b| Self::String(BStr::new(b))),
            other => match fixed_size(other) {
                Some(n) => c.bytes(n).map(|bytes| Self::Other { leaf: other, bytes }),
                None => Err(ParserError::new()),
            },
        };

        if r.is_err() {
            // Leave the cursor where it was, so the caller can report the whole field as raw.
            c.seek(start)?;
        }
        r
    }
}

fn fixed_size(leaf: Leaf) -> Option<usize> {
    Some(match leaf {
        Leaf::LF_REAL16 => 2,
        Leaf::LF_REAL48 => 6,
        Leaf::LF_REAL80 | Leaf::LF_COMPLEX80 => 10,
        Leaf::LF_REAL128 | Leaf::LF_COMPLEX128 | Leaf::LF_OCTWORD | Leaf::LF_UOCTWORD => 16,
        Leaf::LF_COMPLEX32 => 8,
        Leaf::LF_COMPLEX64 => 16,
        Leaf::LF_DECIMAL => 16,
        Leaf::LF_DATE => 8,
        _ => return None,
    })
}

impl fmt::Display for Number<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Immediate(n) => write!(f, "0x{n:x}"),
            Self::Signed(n) if *n < 0 => write!(f, "{n}"),
            Self::Signed(n) => write!(f, "0x{n:x}"),
            Self::Unsigned(n) => write!(f, "0x{n:x}"),
            Self::Real32(x) => write!(f, "{x}"),
            Self::Real64(x) => write!(f, "{x}"),
            Self::String(s) => write!(f, "{s:?}"),
            Self::Other { leaf, bytes } => write!(f, "{leaf:?}({} bytes)", bytes.len()),
        }
    }
}

#[test]
fn numeric_leaves() {
    let parse = |b: &'static [u8]| Number::parse(b).unwrap();
    assert_eq!(parse(&[0x34, 0x12]), Number::Immediate(0x1234));
    assert_eq!(parse(&[0x00, 0x80, 0xff]), Number::Signed(-1));
    assert_eq!(parse(&[0x02, 0x80, 0xff, 0xff]), Number::Unsigned(0xffff));
    assert_eq!(parse(&[0x03, 0x80, 0xfe, 0xff, 0xff, 0xff]), Number::Signed(-2));
    assert_eq!(parse(&[0x10, 0x80, 2, 0, b'h', b'i']), Number::String(BStr::new("hi")));
    assert_eq!(parse(&[0x04, 0x80, 0, 0, 1, 0]).as_u64(), Some(0x10000));
}

#[test]
fn bad_numeric_leaf() {
    let mut c = Cursor::new(&[0x03, 0x80, 0xfe]);
    assert!(c.parse::<Number>().is_err());
    assert_eq!(c.position(), 0);

    assert!(Number::parse(&[0x7f, 0x80]).is_err());
}
