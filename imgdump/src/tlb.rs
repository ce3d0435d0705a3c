//! Compiled type libraries.
//!
//! Type libraries come in two unrelated encodings. MSFT (the `.tlb` produced by MIDL for 32-bit
//! targets) keeps everything in fixed tables reached through a segment directory. SLTG (the
//! older 16-bit encoding, still found in some resources) stores a chain of variable-length
//! blocks and compresses its help strings. Both decoders produce the same [`TypeinfoRecord`].

pub mod bitstream;
pub mod msft;
pub mod sltg;

use crate::error::LocalResult;
use std::fmt;
use uuid::Uuid;

macro_rules! vartypes {
    (
        $($value:expr, $name:ident;)*
    ) => {
        /// Variant type codes, as found in type descriptors.
        #[allow(missing_docs)]
        pub mod vt {
            $(
                pub const $name: u16 = $value;
            )*
        }

        static VARTYPE_NAMES: &[(u16, &str)] = &[
            $(($value, stringify!($name)),)*
        ];
    }
}

vartypes! {
    0, VT_EMPTY;
    1, VT_NULL;
    2, VT_I2;
    3, VT_I4;
    4, VT_R4;
    5, VT_R8;
    6, VT_CY;
    7, VT_DATE;
    8, VT_BSTR;
    9, VT_DISPATCH;
    10, VT_ERROR;
    11, VT_BOOL;
    12, VT_VARIANT;
    13, VT_UNKNOWN;
    14, VT_DECIMAL;
    16, VT_I1;
    17, VT_UI1;
    18, VT_UI2;
    19, VT_UI4;
    20, VT_I8;
    21, VT_UI8;
    22, VT_INT;
    23, VT_UINT;
    24, VT_VOID;
    25, VT_HRESULT;
    26, VT_PTR;
    27, VT_SAFEARRAY;
    28, VT_CARRAY;
    29, VT_USERDEFINED;
    30, VT_LPSTR;
    31, VT_LPWSTR;
    36, VT_RECORD;
    37, VT_INT_PTR;
    38, VT_UINT_PTR;
    64, VT_FILETIME;
    65, VT_BLOB;
    66, VT_STREAM;
    67, VT_STORAGE;
    68, VT_STREAMED_OBJECT;
    69, VT_STORED_OBJECT;
    70, VT_BLOB_OBJECT;
    71, VT_CF;
    72, VT_CLSID;
}

/// Masks the type part of a variant type code.
pub const VT_TYPEMASK: u16 = 0x0fff;

/// Returns the name of a variant type code, e.g. `VT_BSTR`. Flag bits are ignored.
pub fn vartype_name(vt: u16) -> Option<&'static str> {
    let vt = vt & VT_TYPEMASK;
    VARTYPE_NAMES
        .binary_search_by_key(&vt, |&(k, _)| k)
        .ok()
        .map(|i| VARTYPE_NAMES[i].1)
}

/// The kind of a type described by a typeinfo.
#[derive(Copy, Clone, Eq, PartialEq)]
pub struct TypeKind(pub u8);

#[allow(missing_docs)]
impl TypeKind {
    pub const TKIND_ENUM: TypeKind = TypeKind(0);
    pub const TKIND_RECORD: TypeKind = TypeKind(1);
    pub const TKIND_MODULE: TypeKind = TypeKind(2);
    pub const TKIND_INTERFACE: TypeKind = TypeKind(3);
    pub const TKIND_DISPATCH: TypeKind = TypeKind(4);
    pub const TKIND_COCLASS: TypeKind = TypeKind(5);
    pub const TKIND_ALIAS: TypeKind = TypeKind(6);
    pub const TKIND_UNION: TypeKind = TypeKind(7);
}

impl fmt::Debug for TypeKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match *self {
            Self::TKIND_ENUM => "enum",
            Self::TKIND_RECORD => "record",
            Self::TKIND_MODULE => "module",
            Self::TKIND_INTERFACE => "interface",
            Self::TKIND_DISPATCH => "dispatch",
            Self::TKIND_COCLASS => "coclass",
            Self::TKIND_ALIAS => "alias",
            Self::TKIND_UNION => "union",
            _ => return write!(f, "??TypeKind({})", self.0),
        };
        f.write_str(s)
    }
}

impl fmt::Display for TypeKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A decoded type descriptor.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TypeDesc {
    /// A variant type with no further description, e.g. `VT_I4`.
    Base(u16),
    #[allow(missing_docs)]
    Ptr(Box<TypeDesc>),
    #[allow(missing_docs)]
    SafeArray(Box<TypeDesc>),
    /// A C array with `(count, lower bound)` per dimension.
    CArray {
        #[allow(missing_docs)]
        element: Box<TypeDesc>,
        #[allow(missing_docs)]
        bounds: Vec<(u32, i32)>,
    },
    /// A reference to another type, by its encoding-specific reference number.
    UserDefined {
        #[allow(missing_docs)]
        href: u32,
        /// The name of the referenced type, if it could be found.
        name: Option<String>,
    },
    /// A descriptor that could not be decoded.
    Invalid(u32),
}

impl fmt::Display for TypeDesc {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Base(vt) => match vartype_name(*vt) {
                Some(s) => f.write_str(s),
                None => write!(f, "VT_0x{vt:x}"),
            },
            Self::Ptr(inner) => write!(f, "{inner}*"),
            Self::SafeArray(inner) => write!(f, "SAFEARRAY({inner})"),
            Self::CArray { element, bounds } => {
                write!(f, "{element}")?;
                for (count, lower) in bounds {
                    if *lower == 0 {
                        write!(f, "[{count}]")?;
                    } else {
                        write!(f, "[{lower}..{count}]")?;
                    }
                }
                Ok(())
            }
            Self::UserDefined { name: Some(name), .. } => f.write_str(name),
            Self::UserDefined { href, name: None } => write!(f, "<href 0x{href:x}>"),
            Self::Invalid(raw) => write!(f, "<bad type 0x{raw:x}>"),
        }
    }
}

/// One typeinfo: a named type with its members. Shared by both encodings.
#[derive(Clone, Debug)]
pub struct TypeinfoRecord {
    #[allow(missing_docs)]
    pub kind: TypeKind,
    #[allow(missing_docs)]
    pub name: LocalResult<String>,
    #[allow(missing_docs)]
    pub guid: Option<Uuid>,
    /// `major.minor`
    pub version: (u16, u16),
    /// `TYPEFLAGS`
    pub flags: u32,
    #[allow(missing_docs)]
    pub doc: Option<LocalResult<String>>,
    #[allow(missing_docs)]
    pub help_context: u32,
    #[allow(missing_docs)]
    pub function_count: u16,
    #[allow(missing_docs)]
    pub variable_count: u16,
    /// Number of implemented interfaces (coclasses) or base interfaces.
    pub impl_count: u16,
    /// Where the members are stored: the member offset (MSFT) or the member table offset within
    /// the block (SLTG).
    pub element_offset: u32,
    /// The aliased type, for `TKIND_ALIAS`.
    pub alias: Option<TypeDesc>,
    /// The DLL name, for `TKIND_MODULE`.
    pub dll_name: Option<LocalResult<String>>,
    #[allow(missing_docs)]
    pub members: LocalResult<Members>,
}

impl TypeinfoRecord {
    /// Functions plus variables.
    pub fn element_count(&self) -> u32 {
        self.function_count as u32 + self.variable_count as u32
    }
}

/// The functions, variables and implemented interfaces of a typeinfo.
#[derive(Clone, Debug, Default)]
pub struct Members {
    #[allow(missing_docs)]
    pub functions: Vec<LocalResult<Function>>,
    #[allow(missing_docs)]
    pub variables: Vec<LocalResult<Variable>>,
    #[allow(missing_docs)]
    pub impls: Vec<ImplType>,
}

/// A method or property accessor.
#[derive(Clone, Debug)]
pub struct Function {
    #[allow(missing_docs)]
    pub memid: u32,
    #[allow(missing_docs)]
    pub name: LocalResult<String>,
    #[allow(missing_docs)]
    pub return_type: TypeDesc,
    /// `INVOKEKIND`: 1 method, 2 property get, 4 property put, 8 property put by reference.
    pub invoke_kind: u8,
    /// `CALLCONV`
    pub call_conv: u8,
    /// `FUNCFLAGS`
    pub flags: u16,
    /// Offset of the function in the virtual function table.
    pub vtable_offset: i16,
    /// Number of optional parameters.
    pub optional_params: u16,
    #[allow(missing_docs)]
    pub params: Vec<Param>,
}

#[allow(missing_docs)]
#[derive(Clone, Debug)]
pub struct Param {
    pub name: Option<LocalResult<String>>,
    pub type_: TypeDesc,
    /// `PARAMFLAGS`
    pub flags: u16,
}

/// A data member, enum value or constant.
#[derive(Clone, Debug)]
pub struct Variable {
    #[allow(missing_docs)]
    pub memid: u32,
    #[allow(missing_docs)]
    pub name: LocalResult<String>,
    #[allow(missing_docs)]
    pub type_: TypeDesc,
    /// `VARFLAGS`
    pub flags: u16,
    #[allow(missing_docs)]
    pub kind: VarKind,
}

/// Where a variable lives.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum VarKind {
    /// A field, at this offset in the instance.
    PerInstance(u32),
    /// A constant with this value.
    Const(i64),
    /// A constant whose value could not be decoded.
    ConstUnknown,
    /// A static member.
    Static,
    /// A dispatch property.
    Dispatch,
}

/// An implemented or inherited interface.
#[derive(Clone, Debug)]
pub struct ImplType {
    /// The referenced type.
    pub type_: TypeDesc,
    /// `IMPLTYPEFLAGS`
    pub flags: u32,
}

#[test]
fn vartype_names() {
    assert!(VARTYPE_NAMES.windows(2).all(|w| w[0].0 < w[1].0));
    assert_eq!(vartype_name(vt::VT_BSTR), Some("VT_BSTR"));
    assert_eq!(vartype_name(0x4000 | vt::VT_I4), Some("VT_I4"));
    assert_eq!(vartype_name(0x99), None);
}

#[test]
fn type_desc_display() {
    let t = TypeDesc::Ptr(Box::new(TypeDesc::UserDefined {
        href: 0x64,
        name: Some("IFoo".into()),
    }));
    assert_eq!(t.to_string(), "IFoo*");

    let a = TypeDesc::CArray {
        element: Box::new(TypeDesc::Base(vt::VT_UI1)),
        bounds: vec![(16, 0)],
    };
    assert_eq!(a.to_string(), "VT_UI1[16]");
}
