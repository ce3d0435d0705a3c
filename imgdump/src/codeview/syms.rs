//! Symbol records.
//!
//! Each record is `{ len u16, kind u16, payload }`, where `len` counts the kind and the payload.
//! The same logical symbol exists in up to four forms: 16:16 (`S_*16`), 32-bit with 16-bit type
//! indexes (`*_16t`), 32-bit with length-prefixed names (`*_ST`) and the current form with
//! NUL-terminated names. All forms of a symbol decode to the same [`SymData`] variant.

use super::kinds::SymKind;
use super::number::Number;
use crate::error::{LocalError, ParserError};
use crate::view::Cursor;
use bstr::BStr;

/// One symbol record.
#[derive(Clone)]
pub struct Sym<'a> {
    /// Offset of the record within its symbol block.
    pub offset: u32,
    #[allow(missing_docs)]
    pub kind: SymKind,
    /// The payload, not including `len` and `kind`.
    pub data: &'a [u8],
}

impl<'a> Sym<'a> {
    /// Decodes the payload.
    pub fn parse(&self) -> Result<SymData<'a>, ParserError> {
        SymData::parse(self.kind, &mut Cursor::new(self.data))
    }
}

impl std::fmt::Debug for Sym<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:04x} {:?}", self.offset, self.kind)
    }
}

/// A run of symbol records, and the reason decoding stopped early, if it did.
pub struct SymbolBlock<'a> {
    #[allow(missing_docs)]
    pub symbols: Vec<Sym<'a>>,
    #[allow(missing_docs)]
    pub error: Option<LocalError>,
}

/// Splits a symbol block into records. A record with kind 0 or a length too short to hold its
/// kind ends the block, as does running out of data. A record whose length overruns the block
/// is a local error; the records before it are kept.
pub fn decode_symbols(mut c: Cursor<'_>) -> SymbolBlock<'_> {
    let mut symbols = Vec::new();
    let mut error = None;

    while c.len() >= 4 {
        let offset = c.position() as u32;
        let mut r = c.clone();
        let (Ok(len), Ok(kind)) = (r.u16(), r.u16()) else {
            break;
        };
        if kind == 0 || len < 2 {
            break;
        }
        let kind = SymKind(kind);

        let Ok(mut data) = r.bytes(len as usize - 2) else {
            tracing::warn!(offset, ?kind, len, "symbol record overruns its block");
            error = Some(LocalError::overrun("symbol record"));
            break;
        };

        // The old reference symbols carry their name after the end of the record, padded so
        // that the next record is 4-byte aligned.
        if matches!(
            kind,
            SymKind::S_PROCREF_ST | SymKind::S_DATAREF_ST | SymKind::S_LPROCREF_ST
        ) {
            let name_len = r.peek_rest().first().map(|&n| n as usize + 1).unwrap_or(0);
            let start = offset as usize + 4;
            match c.window().get(start..start + data.len() + name_len) {
                Some(with_name) => {
                    data = with_name;
                    let padded = (name_len + 3) & !3;
                    if r.skip(padded.min(r.len())).is_err() {
                        break;
                    }
                }
                None => {
                    error = Some(LocalError::overrun("reference symbol name"));
                    break;
                }
            }
        }

        tracing::trace!(offset, ?kind, "symbol");
        symbols.push(Sym { offset, kind, data });
        c = r;
    }

    SymbolBlock { symbols, error }
}

/// The decoded payload of a symbol record.
#[allow(missing_docs)]
#[derive(Clone, Debug)]
pub enum SymData<'a> {
    Compile(Compile<'a>),
    Register(Register<'a>),
    Constant(Constant<'a>),
    Udt(Udt<'a>),
    /// Start search: where the first procedure of a segment is.
    SSearch {
        offset: u32,
        segment: u16,
    },
    End,
    ObjName {
        signature: u32,
        name: &'a BStr,
    },
    BpRel(BpRel<'a>),
    /// Global and local data, thread storage, and publics.
    Data(Data<'a>),
    Proc(Proc<'a>),
    Thunk(Thunk<'a>),
    Block(Block<'a>),
    Label(Label<'a>),
    RegRel(RegRel<'a>),
    /// A reference from a global symbol table into a module's symbols.
    Ref(RefSym<'a>),
    /// Padding at the end of a page.
    Align,
    /// A kind that is not decoded.
    Raw(&'a [u8]),
}

/// `S_COMPILE`
#[allow(missing_docs)]
#[derive(Clone, Debug)]
pub struct Compile<'a> {
    pub machine: u8,
    pub flags: [u8; 3],
    pub version: &'a BStr,
}

impl Compile<'_> {
    /// The source language, from the low byte of the flags.
    pub fn language(&self) -> u8 {
        self.flags[0]
    }
}

/// `S_REGISTER`: a variable held in a register.
#[allow(missing_docs)]
#[derive(Clone, Debug)]
pub struct Register<'a> {
    pub type_: u32,
    pub register: u16,
    pub name: &'a BStr,
}

/// `S_CONSTANT`
#[allow(missing_docs)]
#[derive(Clone, Debug)]
pub struct Constant<'a> {
    pub type_: u32,
    pub value: Number<'a>,
    pub name: &'a BStr,
}

/// `S_UDT`: a user-defined type name.
#[allow(missing_docs)]
#[derive(Clone, Debug)]
pub struct Udt<'a> {
    pub type_: u32,
    pub name: &'a BStr,
}

/// `S_BPREL16`, `S_BPREL32`: a variable relative to the frame pointer.
#[allow(missing_docs)]
#[derive(Clone, Debug)]
pub struct BpRel<'a> {
    pub offset: i32,
    pub type_: u32,
    pub name: &'a BStr,
}

/// `S_LDATA*`, `S_GDATA*`, `S_PUB*`, `S_LTHREAD32*`, `S_GTHREAD32*`
#[allow(missing_docs)]
#[derive(Clone, Debug)]
pub struct Data<'a> {
    /// For `S_PUB32` this holds the public symbol flags instead of a type.
    pub type_: u32,
    pub offset: u32,
    pub segment: u16,
    pub name: &'a BStr,
}

/// `S_LPROC*`, `S_GPROC*`
#[allow(missing_docs)]
#[derive(Clone, Debug)]
pub struct Proc<'a> {
    pub parent: u32,
    pub end: u32,
    pub next: u32,
    pub len: u32,
    pub debug_start: u32,
    pub debug_end: u32,
    pub type_: u32,
    pub offset: u32,
    pub segment: u16,
    pub flags: u8,
    pub name: &'a BStr,
}

#[allow(missing_docs)]
#[derive(Clone, Debug)]
pub struct Thunk<'a> {
    pub parent: u32,
    pub end: u32,
    pub next: u32,
    pub offset: u32,
    pub segment: u16,
    pub len: u16,
    pub ordinal: u8,
    pub name: &'a BStr,
}

#[allow(missing_docs)]
#[derive(Clone, Debug)]
pub struct Block<'a> {
    pub parent: u32,
    pub end: u32,
    pub len: u32,
    pub offset: u32,
    pub segment: u16,
    pub name: &'a BStr,
}

#[allow(missing_docs)]
#[derive(Clone, Debug)]
pub struct Label<'a> {
    pub offset: u32,
    pub segment: u16,
    pub flags: u8,
    pub name: &'a BStr,
}

/// `S_REGREL32`: a variable relative to a register.
#[allow(missing_docs)]
#[derive(Clone, Debug)]
pub struct RegRel<'a> {
    pub offset: i32,
    pub type_: u32,
    pub register: u16,
    pub name: &'a BStr,
}

/// `S_PROCREF`, `S_DATAREF`, `S_LPROCREF`
#[allow(missing_docs)]
#[derive(Clone, Debug)]
pub struct RefSym<'a> {
    pub sum_name: u32,
    /// Offset of the referenced symbol in its module's symbols.
    pub sym_offset: u32,
    pub module: u16,
    pub name: &'a BStr,
}

fn name<'a>(kind: SymKind, c: &mut Cursor<'a>) -> Result<&'a BStr, ParserError> {
    if kind.has_strz_name() { c.strz() } else { c.strt() }
}

/// Reads a 16-bit or a 32-bit type index.
fn type_index(wide: bool, c: &mut Cursor<'_>) -> Result<u32, ParserError> {
    if wide { c.u32() } else { Ok(c.u16()? as u32) }
}

impl<'a> SymData<'a> {
    /// Decodes the payload of a record of kind `kind`.
    pub fn parse(kind: SymKind, c: &mut Cursor<'a>) -> Result<Self, ParserError> {
        use SymKind as K;

        // Forms other than `_16t` and the 16:16 ones have 32-bit type indexes.
        let wide = kind.0 >= 0x1000;

        Ok(match kind {
            K::S_COMPILE => Self::Compile(Compile {
                machine: c.u8()?,
                flags: c.array()?,
                version: c.strt()?,
            }),

            K::S_REGISTER_16t | K::S_REGISTER_ST | K::S_REGISTER => Self::Register(Register {
                type_: type_index(wide, c)?,
                register: c.u16()?,
                name: name(kind, c)?,
            }),

            K::S_CONSTANT_16t | K::S_CONSTANT_ST | K::S_CONSTANT => Self::Constant(Constant {
                type_: type_index(wide, c)?,
                value: c.parse()?,
                name: name(kind, c)?,
            }),

            K::S_UDT_16t | K::S_UDT_ST | K::S_UDT => Self::Udt(Udt {
                type_: type_index(wide, c)?,
                name: name(kind, c)?,
            }),

            K::S_SSEARCH => Self::SSearch {
                offset: c.u32()?,
                segment: c.u16()?,
            },

            K::S_END => Self::End,

            K::S_OBJNAME_ST | K::S_OBJNAME => Self::ObjName {
                signature: c.u32()?,
                name: name(kind, c)?,
            },

            K::S_BPREL16 => Self::BpRel(BpRel {
                offset: c.i16()? as i32,
                type_: c.u16()? as u32,
                name: c.strt()?,
            }),

            K::S_BPREL32_16t | K::S_BPREL32_ST | K::S_BPREL32 => Self::BpRel(BpRel {
                offset: c.i32()?,
                type_: type_index(wide, c)?,
                name: name(kind, c)?,
            }),

            K::S_LDATA16 | K::S_GDATA16 | K::S_PUB16 => {
                let offset = c.u16()? as u32;
                let segment = c.u16()?;
                Self::Data(Data {
                    type_: c.u16()? as u32,
                    offset,
                    segment,
                    name: c.strt()?,
                })
            }

            K::S_LDATA32_16t
            | K::S_GDATA32_16t
            | K::S_PUB32_16t
            | K::S_LTHREAD32_16t
            | K::S_GTHREAD32_16t => {
                let offset = c.u32()?;
                let segment = c.u16()?;
                Self::Data(Data {
                    type_: c.u16()? as u32,
                    offset,
                    segment,
                    name: c.strt()?,
                })
            }

            K::S_LDATA32_ST
            | K::S_GDATA32_ST
            | K::S_PUB32_ST
            | K::S_LTHREAD32_ST
            | K::S_GTHREAD32_ST
            | K::S_LDATA32
            | K::S_GDATA32
            | K::S_PUB32
            | K::S_LTHREAD32
            | K::S_GTHREAD32 => Self::Data(Data {
                type_: c.u32()?,
                offset: c.u32()?,
                segment: c.u16()?,
                name: name(kind, c)?,
            }),

            K::S_LPROC16 | K::S_GPROC16 => {
                let parent = c.u32()?;
                let end = c.u32()?;
                let next = c.u32()?;
                let len = c.u16()? as u32;
                let debug_start = c.u16()? as u32;
                let debug_end = c.u16()? as u32;
                let offset = c.u16()? as u32;
                let segment = c.u16()?;
                Self::Proc(Proc {
                    parent,
                    end,
                    next,
                    len,
                    debug_start,
                    debug_end,
                    type_: c.u16()? as u32,
                    offset,
                    segment,
                    flags: c.u8()?,
                    name: c.strt()?,
                })
            }

            K::S_LPROC32_16t | K::S_GPROC32_16t => {
                let parent = c.u32()?;
                let end = c.u32()?;
                let next = c.u32()?;
                let len = c.u32()?;
                let debug_start = c.u32()?;
                let debug_end = c.u32()?;
                let offset = c.u32()?;
                let segment = c.u16()?;
                Self::Proc(Proc {
                    parent,
                    end,
                    next,
                    len,
                    debug_start,
                    debug_end,
                    type_: c.u16()? as u32,
                    offset,
                    segment,
                    flags: c.u8()?,
                    name: c.strt()?,
                })
            }

            K::S_LPROC32_ST | K::S_GPROC32_ST | K::S_LPROC32 | K::S_GPROC32 => Self::Proc(Proc {
                parent: c.u32()?,
                end: c.u32()?,
                next: c.u32()?,
                len: c.u32()?,
                debug_start: c.u32()?,
                debug_end: c.u32()?,
                type_: c.u32()?,
                offset: c.u32()?,
                segment: c.u16()?,
                flags: c.u8()?,
                name: name(kind, c)?,
            }),

            K::S_THUNK32_ST | K::S_THUNK32 => Self::Thunk(Thunk {
                parent: c.u32()?,
                end: c.u32()?,
                next: c.u32()?,
                offset: c.u32()?,
                segment: c.u16()?,
                len: c.u16()?,
                ordinal: c.u8()?,
                name: name(kind, c)?,
            }),

            K::S_BLOCK32_ST | K::S_BLOCK32 => Self::Block(Block {
                parent: c.u32()?,
                end: c.u32()?,
                len: c.u32()?,
                offset: c.u32()?,
                segment: c.u16()?,
                name: name(kind, c)?,
            }),

            K::S_LABEL32_ST | K::S_LABEL32 => Self::Label(Label {
                offset: c.u32()?,
                segment: c.u16()?,
                flags: c.u8()?,
                name: name(kind, c)?,
            }),

            K::S_REGREL32_16t => {
                let offset = c.i32()?;
                let register = c.u16()?;
                Self::RegRel(RegRel {
                    offset,
                    type_: c.u16()? as u32,
                    register,
                    name: c.strt()?,
                })
            }

            K::S_REGREL32_ST | K::S_REGREL32 => Self::RegRel(RegRel {
                offset: c.i32()?,
                type_: c.u32()?,
                register: c.u16()?,
                name: name(kind, c)?,
            }),

            K::S_PROCREF_ST | K::S_DATAREF_ST | K::S_LPROCREF_ST => {
                let sum_name = c.u32()?;
                let sym_offset = c.u32()?;
                let module = c.u16()?;
                c.skip(2)?;
                Self::Ref(RefSym {
                    sum_name,
                    sym_offset,
                    module,
                    name: c.strt()?,
                })
            }

            K::S_PROCREF | K::S_DATAREF | K::S_LPROCREF => Self::Ref(RefSym {
                sum_name: c.u32()?,
                sym_offset: c.u32()?,
                module: c.u16()?,
                name: c.strz()?,
            }),

            K::S_ALIGN => Self::Align,

            _ => Self::Raw(c.take_rest()),
        })
    }
}
