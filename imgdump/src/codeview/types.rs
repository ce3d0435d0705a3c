//! Type records.
//!
//! Each record is `{ len u16, leaf u16, payload }`. Leaves below 0x1000 are the CodeView 4 forms,
//! with 16-bit type indexes; the rest use 32-bit indexes. Both decode to the same [`TypeData`].

use super::kinds::Leaf;
use super::number::Number;
use crate::error::{LocalError, ParserError};
use crate::view::Cursor;
use bstr::BStr;

/// One type record.
#[derive(Clone)]
pub struct TypeRecord<'a> {
    /// The type index this record defines.
    pub index: u32,
    /// Offset of the record from the start of the type records.
    pub offset: u32,
    #[allow(missing_docs)]
    pub leaf: Leaf,
    /// The payload, not including `len` and `leaf`.
    pub data: &'a [u8],
}

impl<'a> TypeRecord<'a> {
    /// Decodes the payload.
    pub fn parse(&self) -> Result<TypeData<'a>, ParserError> {
        TypeData::parse(self.leaf, &mut Cursor::new(self.data))
    }
}

/// A run of type records, and the reason decoding stopped early, if it did.
pub struct TypeBlock<'a> {
    #[allow(missing_docs)]
    pub types: Vec<TypeRecord<'a>>,
    #[allow(missing_docs)]
    pub error: Option<LocalError>,
}

/// Splits type records, assigning type indexes from `first_index`.
pub fn decode_types(mut c: Cursor<'_>, first_index: u32) -> TypeBlock<'_> {
    let start = c.position();
    let mut types = Vec::new();
    let mut error = None;
    let mut index = first_index;

    while !c.is_empty() {
        let offset = (c.position() - start) as u32;
        let mut r = c.clone();
        let (Ok(len), Ok(leaf)) = (r.u16(), r.u16()) else {
            error = Some(LocalError::overrun("type record header"));
            break;
        };
        if len < 2 {
            error = Some(LocalError::invalid("type record length"));
            break;
        }
        let Ok(data) = r.bytes(len as usize - 2) else {
            tracing::warn!(index, offset, len, "type record overruns its block");
            error = Some(LocalError::overrun("type record"));
            break;
        };

        types.push(TypeRecord {
            index,
            offset,
            leaf: Leaf(leaf),
            data,
        });
        index += 1;
        c = r;
    }

    TypeBlock { types, error }
}

/// The decoded payload of a type record.
#[allow(missing_docs)]
#[derive(Clone, Debug)]
pub enum TypeData<'a> {
    Modifier {
        type_: u32,
        attributes: u16,
    },
    Pointer {
        type_: u32,
        attributes: u32,
    },
    Array {
        element_type: u32,
        index_type: u32,
        size: Number<'a>,
        name: &'a BStr,
    },
    /// `LF_CLASS`, `LF_STRUCTURE`
    Struct(Struct<'a>),
    Union {
        count: u16,
        property: u16,
        field_list: u32,
        size: Number<'a>,
        name: &'a BStr,
    },
    Enum {
        count: u16,
        property: u16,
        underlying_type: u32,
        field_list: u32,
        name: &'a BStr,
    },
    Procedure {
        return_type: u32,
        call: u8,
        attributes: u8,
        params: u16,
        arg_list: u32,
    },
    MemberFunction {
        return_type: u32,
        class: u32,
        this: u32,
        call: u8,
        attributes: u8,
        params: u16,
        arg_list: u32,
        this_adjust: i32,
    },
    ArgList(Vec<u32>),
    FieldList(FieldList<'a>),
    Bitfield {
        type_: u32,
        length: u8,
        position: u8,
    },
    /// A leaf that is not decoded.
    Raw(&'a [u8]),
}

/// `LF_CLASS`, `LF_STRUCTURE`
#[allow(missing_docs)]
#[derive(Clone, Debug)]
pub struct Struct<'a> {
    pub count: u16,
    pub property: u16,
    pub field_list: u32,
    pub derived: u32,
    pub vshape: u32,
    pub size: Number<'a>,
    pub name: &'a BStr,
}

/// The members of an `LF_FIELDLIST`, and the reason decoding stopped early, if it did.
#[derive(Clone, Debug)]
pub struct FieldList<'a> {
    #[allow(missing_docs)]
    pub fields: Vec<Field<'a>>,
    #[allow(missing_docs)]
    pub error: Option<LocalError>,
}

/// One member of a field list.
#[allow(missing_docs)]
#[derive(Clone, Debug)]
pub enum Field<'a> {
    Member {
        attributes: u16,
        type_: u32,
        offset: Number<'a>,
        name: &'a BStr,
    },
    Enumerate {
        attributes: u16,
        value: Number<'a>,
        name: &'a BStr,
    },
    BaseClass {
        attributes: u16,
        type_: u32,
        offset: Number<'a>,
    },
    /// `LF_VBCLASS`, `LF_IVBCLASS`
    VirtualBaseClass {
        indirect: bool,
        attributes: u16,
        base_type: u32,
        vbptr_type: u32,
        vbptr_offset: Number<'a>,
        vbtable_index: Number<'a>,
    },
    StaticMember {
        attributes: u16,
        type_: u32,
        name: &'a BStr,
    },
    Method {
        count: u16,
        method_list: u32,
        name: &'a BStr,
    },
    NestedType {
        type_: u32,
        name: &'a BStr,
    },
    VFuncTab {
        type_: u32,
    },
    OneMethod {
        attributes: u16,
        type_: u32,
        vbase_offset: Option<u32>,
        name: &'a BStr,
    },
    /// Continuation in another field list.
    Index {
        type_: u32,
    },
}

/// Method property values that introduce a virtual function and so carry a vtable offset.
const MPROP_INTRO: u16 = 4;
const MPROP_PURE_INTRO: u16 = 6;

fn introduces_virtual(attributes: u16) -> bool {
    matches!((attributes >> 2) & 7, MPROP_INTRO | MPROP_PURE_INTRO)
}

fn name<'a>(leaf: Leaf, c: &mut Cursor<'a>) -> Result<&'a BStr, ParserError> {
    if leaf.has_strz_name() { c.strz() } else { c.strt() }
}

fn type_index(leaf: Leaf, c: &mut Cursor<'_>) -> Result<u32, ParserError> {
    if leaf.is_16t() { Ok(c.u16()? as u32) } else { c.u32() }
}

impl<'a> TypeData<'a> {
    /// Decodes the payload of a record with leaf `leaf`.
    pub fn parse(leaf: Leaf, c: &mut Cursor<'a>) -> Result<Self, ParserError> {
        use Leaf as L;

        Ok(match leaf {
            L::LF_MODIFIER_16t => {
                let attributes = c.u16()?;
                Self::Modifier {
                    type_: c.u16()? as u32,
                    attributes,
                }
            }
            L::LF_MODIFIER => Self::Modifier {
                type_: c.u32()?,
                attributes: c.u16()?,
            },

            L::LF_POINTER_16t => {
                let attributes = c.u16()? as u32;
                Self::Pointer {
                    type_: c.u16()? as u32,
                    attributes,
                }
            }
            L::LF_POINTER => Self::Pointer {
                type_: c.u32()?,
                attributes: c.u32()?,
            },

            L::LF_ARRAY_16t | L::LF_ARRAY_ST | L::LF_ARRAY => Self::Array {
                element_type: type_index(leaf, c)?,
                index_type: type_index(leaf, c)?,
                size: c.parse()?,
                name: name(leaf, c)?,
            },

            L::LF_CLASS_16t | L::LF_STRUCTURE_16t => {
                let count = c.u16()?;
                let field_list = c.u16()? as u32;
                let property = c.u16()?;
                Self::Struct(Struct {
                    count,
                    property,
                    field_list,
                    derived: c.u16()? as u32,
                    vshape: c.u16()? as u32,
                    size: c.parse()?,
                    name: c.strt()?,
                })
            }
            L::LF_CLASS_ST | L::LF_STRUCTURE_ST | L::LF_CLASS | L::LF_STRUCTURE => {
                Self::Struct(Struct {
                    count: c.u16()?,
                    property: c.u16()?,
                    field_list: c.u32()?,
                    derived: c.u32()?,
                    vshape: c.u32()?,
                    size: c.parse()?,
                    name: name(leaf, c)?,
                })
            }

            L::LF_UNION_16t => {
                let count = c.u16()?;
                let field_list = c.u16()? as u32;
                Self::Union {
                    count,
                    property: c.u16()?,
                    field_list,
                    size: c.parse()?,
                    name: c.strt()?,
                }
            }
            L::LF_UNION_ST | L::LF_UNION => Self::Union {
                count: c.u16()?,
                property: c.u16()?,
                field_list: c.u32()?,
                size: c.parse()?,
                name: name(leaf, c)?,
            },

            L::LF_ENUM_16t => {
                let count = c.u16()?;
                let underlying_type = c.u16()? as u32;
                let field_list = c.u16()? as u32;
                Self::Enum {
                    count,
                    property: c.u16()?,
                    underlying_type,
                    field_list,
                    name: c.strt()?,
                }
            }
            L::LF_ENUM_ST | L::LF_ENUM => Self::Enum {
                count: c.u16()?,
                property: c.u16()?,
                underlying_type: c.u32()?,
                field_list: c.u32()?,
                name: name(leaf, c)?,
            },

            L::LF_PROCEDURE_16t | L::LF_PROCEDURE => Self::Procedure {
                return_type: type_index(leaf, c)?,
                call: c.u8()?,
                attributes: c.u8()?,
                params: c.u16()?,
                arg_list: type_index(leaf, c)?,
            },

            L::LF_MFUNCTION_16t | L::LF_MFUNCTION => Self::MemberFunction {
                return_type: type_index(leaf, c)?,
                class: type_index(leaf, c)?,
                this: type_index(leaf, c)?,
                call: c.u8()?,
                attributes: c.u8()?,
                params: c.u16()?,
                arg_list: type_index(leaf, c)?,
                this_adjust: c.i32()?,
            },

            L::LF_ARGLIST_16t | L::LF_ARGLIST => {
                let count = if leaf.is_16t() { c.u16()? as usize } else { c.u32()? as usize };
                let width = if leaf.is_16t() { 2 } else { 4 };
                if count.saturating_mul(width) > c.len() {
                    return Err(ParserError::new());
                }
                let mut args = Vec::with_capacity(count);
                for _ in 0..count {
                    args.push(type_index(leaf, c)?);
                }
                Self::ArgList(args)
            }

            L::LF_FIELDLIST_16t | L::LF_FIELDLIST => Self::FieldList(decode_fields(c)),

            L::LF_BITFIELD_16t => {
                let length = c.u8()?;
                let position = c.u8()?;
                Self::Bitfield {
                    type_: c.u16()? as u32,
                    length,
                    position,
                }
            }
            L::LF_BITFIELD => Self::Bitfield {
                type_: c.u32()?,
                length: c.u8()?,
                position: c.u8()?,
            },

            _ => Self::Raw(c.take_rest()),
        })
    }
}

/// Decodes the members of a field list. Each member may be followed by `LF_PAD` bytes
/// (0xf0 to 0xff), whose low nibble says how many bytes to skip. A member that cannot be decoded
/// ends the list, since its length is unknown.
fn decode_fields<'a>(c: &mut Cursor<'a>) -> FieldList<'a> {
    let mut fields = Vec::new();
    let mut error = None;

    while let Some(&b) = c.peek_rest().first() {
        if b >= 0xf0 {
            let n = (b & 0xf).max(1) as usize;
            if c.skip(n.min(c.len())).is_err() {
                break;
            }
            continue;
        }

        let start = c.position();
        match decode_field(c) {
            Ok(f) => fields.push(f),
            Err(e) => {
                // Report the member where it started.
                let _ = c.seek(start);
                tracing::debug!(offset = start, "field list member not decoded");
                error = Some(e);
                break;
            }
        }
    }

    FieldList { fields, error }
}

fn decode_field<'a>(c: &mut Cursor<'a>) -> Result<Field<'a>, LocalError> {
    use Leaf as L;

    let leaf = Leaf(c.u16()?);
    Ok(match leaf {
        L::LF_MEMBER_16t => {
            let type_ = c.u16()? as u32;
            Field::Member {
                attributes: c.u16()?,
                type_,
                offset: c.parse()?,
                name: c.strt()?,
            }
        }
        L::LF_MEMBER_ST | L::LF_MEMBER => Field::Member {
            attributes: c.u16()?,
            type_: c.u32()?,
            offset: c.parse()?,
            name: name(leaf, c)?,
        },

        L::LF_ENUMERATE_ST | L::LF_ENUMERATE => Field::Enumerate {
            attributes: c.u16()?,
            value: c.parse()?,
            name: name(leaf, c)?,
        },

        L::LF_BCLASS_16t => {
            let type_ = c.u16()? as u32;
            Field::BaseClass {
                attributes: c.u16()?,
                type_,
                offset: c.parse()?,
            }
        }
        L::LF_BCLASS => Field::BaseClass {
            attributes: c.u16()?,
            type_: c.u32()?,
            offset: c.parse()?,
        },

        L::LF_VBCLASS_16t | L::LF_IVBCLASS_16t => {
            let base_type = c.u16()? as u32;
            let vbptr_type = c.u16()? as u32;
            Field::VirtualBaseClass {
                indirect: leaf == L::LF_IVBCLASS_16t,
                attributes: c.u16()?,
                base_type,
                vbptr_type,
                vbptr_offset: c.parse()?,
                vbtable_index: c.parse()?,
            }
        }
        L::LF_VBCLASS | L::LF_IVBCLASS => Field::VirtualBaseClass {
            indirect: leaf == L::LF_IVBCLASS,
            attributes: c.u16()?,
            base_type: c.u32()?,
            vbptr_type: c.u32()?,
            vbptr_offset: c.parse()?,
            vbtable_index: c.parse()?,
        },

        L::LF_STMEMBER_16t => {
            let type_ = c.u16()? as u32;
            Field::StaticMember {
                attributes: c.u16()?,
                type_,
                name: c.strt()?,
            }
        }
        L::LF_STMEMBER_ST | L::LF_STMEMBER => Field::StaticMember {
            attributes: c.u16()?,
            type_: c.u32()?,
            name: name(leaf, c)?,
        },

        L::LF_METHOD_16t | L::LF_METHOD_ST | L::LF_METHOD => Field::Method {
            count: c.u16()?,
            method_list: type_index(leaf, c)?,
            name: name(leaf, c)?,
        },

        L::LF_NESTTYPE_16t => Field::NestedType {
            type_: c.u16()? as u32,
            name: c.strt()?,
        },
        L::LF_NESTTYPE_ST | L::LF_NESTTYPE => {
            c.skip(2)?;
            Field::NestedType {
                type_: c.u32()?,
                name: name(leaf, c)?,
            }
        }

        L::LF_VFUNCTAB_16t => Field::VFuncTab {
            type_: c.u16()? as u32,
        },
        L::LF_VFUNCTAB => {
            c.skip(2)?;
            Field::VFuncTab { type_: c.u32()? }
        }

        L::LF_ONEMETHOD_16t | L::LF_ONEMETHOD_ST | L::LF_ONEMETHOD => {
            let attributes = c.u16()?;
            let type_ = type_index(leaf, c)?;
            let vbase_offset = if introduces_virtual(attributes) {
                Some(c.u32()?)
            } else {
                None
            };
            Field::OneMethod {
                attributes,
                type_,
                vbase_offset,
                name: name(leaf, c)?,
            }
        }

        L::LF_INDEX_16t => Field::Index {
            type_: c.u16()? as u32,
        },
        L::LF_INDEX => {
            c.skip(2)?;
            Field::Index { type_: c.u32()? }
        }

        _ => return Err(LocalError::invalid("unknown field list member")),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn struct_16t() {
        #[rustfmt::skip]
        let data = [
            // LF_STRUCTURE_16t: count, field list, property, derived, vshape, size, "S"
            /* 0x0000 */ 16, 0, 0x05, 0x00,
            /* 0x0004 */ 2, 0, 0x01, 0x10, 0, 0, 0, 0, 0, 0, 8, 0, 1, b'S',
            // LF_POINTER (32-bit index): type, attributes
            /* 0x0012 */ 10, 0, 0x02, 0x10,
            /* 0x0016 */ 0x00, 0x10, 0, 0, 0x0a, 0, 0, 0,
        ];

        let block = decode_types(Cursor::new(&data), 0x1000);
        assert!(block.error.is_none());
        assert_eq!(block.types.len(), 2);
        assert_eq!(block.types[1].index, 0x1001);
        assert_eq!(block.types[1].offset, 0x12);

        match block.types[0].parse().unwrap() {
            TypeData::Struct(s) => {
                assert_eq!(s.count, 2);
                assert_eq!(s.field_list, 0x1001);
                assert_eq!(s.size, Number::Immediate(8));
                assert_eq!(s.name, "S");
            }
            _ => panic!("expected a structure"),
        }
        assert!(matches!(
            block.types[1].parse(),
            Ok(TypeData::Pointer { type_: 0x1000, attributes: 0x0a })
        ));
    }

    #[test]
    fn field_list_with_padding() {
        #[rustfmt::skip]
        let data = [
            // LF_MEMBER: attributes, type, offset, "a"
            /* 0x0000 */ 0x0d, 0x15, 3, 0, 0x74, 0, 0, 0, 0, 0, b'a', 0,
            /* 0x000c */ 0xf2, 0xf1,
            // LF_ONEMETHOD, introducing virtual: attributes, type, vtable offset, "f"
            /* 0x000e */ 0x11, 0x15, 0x13, 0, 0x02, 0x10, 0, 0, 8, 0, 0, 0, b'f', 0,
            // LF_ENUMERATE_ST: attributes, value, "E"
            /* 0x001c */ 0x03, 0x04, 3, 0, 0x00, 0x80, 0xff, 1, b'E',
        ];

        let mut c = Cursor::new(&data);
        let list = match TypeData::parse(Leaf::LF_FIELDLIST, &mut c).unwrap() {
            TypeData::FieldList(list) => list,
            _ => panic!("expected a field list"),
        };
        assert!(list.error.is_none());
        assert_eq!(list.fields.len(), 3);
        assert!(matches!(
            &list.fields[0],
            Field::Member { type_: 0x74, name, .. } if *name == "a"
        ));
        assert!(matches!(
            &list.fields[1],
            Field::OneMethod { vbase_offset: Some(8), name, .. } if *name == "f"
        ));
        assert!(matches!(
            &list.fields[2],
            Field::Enumerate { value: Number::Signed(-1), name, .. } if *name == "E"
        ));
    }

    #[test]
    fn unknown_member_stops_list() {
        #[rustfmt::skip]
        let data = [
            /* 0x0000 */ 0x09, 0x14, 0, 0, 0x00, 0x10, 0, 0,
            /* 0x0008 */ 0x77, 0x77, 1, 2, 3,
        ];

        let mut c = Cursor::new(&data);
        let list = match TypeData::parse(Leaf::LF_FIELDLIST, &mut c).unwrap() {
            TypeData::FieldList(list) => list,
            _ => panic!("expected a field list"),
        };
        assert_eq!(list.fields.len(), 1);
        assert!(matches!(list.fields[0], Field::VFuncTab { type_: 0x1000 }));
        assert_eq!(list.error, Some(LocalError::invalid("unknown field list member")));
    }
}
