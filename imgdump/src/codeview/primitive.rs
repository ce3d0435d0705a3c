//! Primitive types
//!
//! Type indexes below 0x1000 do not refer to type records. Their bits encode a basic type and
//! an addressing mode:
//!
//! ```text
//! 11 10 9 8 | 7 6 5 4 | 3 2 1 0
//!   mode    |  kind   |  size
//! ```

/// The first type index that refers to a type record.
pub const FIRST_NONPRIMITIVE: u32 = 0x1000;

fn base_name(kind: u32, size: u32) -> Option<&'static str> {
    Some(match (kind, size) {
        (0, 0) => "notype",
        (0, 1) => "abs",
        (0, 2) => "segment",
        (0, 3) => "void",
        (0, 4) => "currency",
        (0, 5) => "near basic string",
        (0, 6) => "far basic string",
        (0, 7) => "not translated",
        (0, 8) => "HRESULT",

        (1, 0) => "signed char",
        (1, 1) => "short",
        (1, 2) => "long",
        (1, 3) => "long long",
        (1, 4) => "__int128",

        (2, 0) => "unsigned char",
        (2, 1) => "unsigned short",
        (2, 2) => "unsigned long",
        (2, 3) => "unsigned long long",
        (2, 4) => "unsigned __int128",

        (3, 0) => "bool",
        (3, 1) => "bool16",
        (3, 2) => "bool32",
        (3, 3) => "bool64",

        (4, 0) => "float",
        (4, 1) => "double",
        (4, 2) => "long double",
        (4, 3) => "real128",
        (4, 4) => "real48",
        (4, 5) => "real32pp",
        (4, 6) => "real16",

        (5, 0) => "complex32",
        (5, 1) => "complex64",
        (5, 2) => "complex80",
        (5, 3) => "complex128",

        (6, 0) => "bit",
        (6, 1) => "pascal char",
        (6, 8) => "__int8",
        (6, 9) => "unsigned __int8",

        (7, 0) => "char",
        (7, 1) => "wchar_t",
        (7, 2) => "__int16",
        (7, 3) => "unsigned __int16",
        (7, 4) => "int",
        (7, 5) => "unsigned int",
        (7, 6) => "__int64",
        (7, 7) => "unsigned __int64",
        (7, 8) => "__int128",
        (7, 9) => "unsigned __int128",
        (7, 10) => "char16_t",
        (7, 11) => "char32_t",
        (7, 12) => "char8_t",

        _ => return None,
    })
}

fn mode_suffix(mode: u32) -> Option<&'static str> {
    Some(match mode {
        0 => "",
        1 => " near*",
        2 => " far*",
        3 => " huge*",
        4 => "*",
        5 => " far32*",
        6 => "*64",
        7 => "*128",
        _ => return None,
    })
}

/// Returns the name of a primitive type, e.g. `int` for 0x74 or `char far*` for 0x270.
pub fn primitive_name(index: u32) -> Option<String> {
    if index >= FIRST_NONPRIMITIVE {
        return None;
    }
    let base = base_name((index >> 4) & 0xf, index & 0xf)?;
    let suffix = mode_suffix((index >> 8) & 0xf)?;
    Some(format!("{base}{suffix}"))
}

/// Names a type index: primitive types by name, others as `0x1234`.
pub fn type_index_name(index: u32) -> String {
    primitive_name(index).unwrap_or_else(|| format!("0x{index:04x}"))
}

#[test]
fn names() {
    assert_eq!(type_index_name(0x0074), "int");
    assert_eq!(type_index_name(0x0003), "void");
    assert_eq!(type_index_name(0x0403), "void*");
    assert_eq!(type_index_name(0x0270), "char far*");
    assert_eq!(type_index_name(0x0640), "float*64");
    assert_eq!(type_index_name(0x1003), "0x1003");
    assert_eq!(primitive_name(0x00ff), None);
}
