//! Decodes `?`-decorated linker symbols back into prototypes.
//!
//! ```text
//! symbol    := '?' name scope kind
//! name      := '?' operator | ident '@'
//! scope     := '@' | ident '@' ... '@'              innermost component first
//! kind      := access [this-cv] callconv return args 'Z'     functions
//!            | ('0'..'4') type cv                            data
//!            | ('6' | '7') cv ['@' | scope]                  virtual tables
//! return    := '@' | type
//! args      := 'X' | type... ('@' | 'Z')            'Z' here means a trailing `...`
//! ```
//!
//! Argument types whose encoding is longer than one character are remembered, in order, and the
//! digits `0` to `9` in a later type position refer back to them.

use bitflags::bitflags;
use std::fmt;

/// Why a name could not be demangled. Callers print the raw name instead.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum NotDemangled {
    /// The name does not start with `?`.
    NotMangled,
    /// The name starts with `?` but does not follow the grammar.
    Grammar,
}

impl fmt::Display for NotDemangled {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::NotMangled => f.write_str("not a decorated name"),
            Self::Grammar => f.write_str("malformed decorated name"),
        }
    }
}

impl std::error::Error for NotDemangled {}

bitflags! {
    /// Qualifiers applied to a type or to `this`.
    #[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
    pub struct Qualifiers: u8 {
        #[allow(missing_docs)]
        const CONST = 0x01;
        #[allow(missing_docs)]
        const VOLATILE = 0x02;
        /// Passed by reference.
        const BY_REFERENCE = 0x04;
        /// Uses the extended `_` primitive table.
        const EXTENDED = 0x08;
    }
}

/// A coarse classification of a decoded type.
#[allow(missing_docs)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TypeTag {
    Void,
    Integer,
    Bool,
    Char,
    WideChar,
    Float,
    Double,
    LongDouble,
    /// Pointer to `char`.
    String,
    /// Pointer to `wchar_t`.
    WideString,
    Pointer,
    FunctionPointer,
    Struct,
    Enum,
    /// `...`
    Varargs,
}

/// One decoded type: the return type, an argument, or a data symbol's type.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Argument {
    /// The type as C++ source text, e.g. `const char *`.
    pub text: String,
    #[allow(missing_docs)]
    pub tag: TypeTag,
    #[allow(missing_docs)]
    pub qualifiers: Qualifiers,
}

impl Argument {
    fn new(text: String, tag: TypeTag, qualifiers: Qualifiers) -> Self {
        Self {
            text,
            tag,
            qualifiers,
        }
    }
}

impl fmt::Display for Argument {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.text)
    }
}

#[allow(missing_docs)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Access {
    Private,
    Protected,
    Public,
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Self::Private => "private",
            Self::Protected => "protected",
            Self::Public => "public",
        })
    }
}

#[allow(missing_docs)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CallingConvention {
    Cdecl,
    Pascal,
    Thiscall,
    Stdcall,
    Fastcall,
    /// `K`: no convention given.
    Unspecified,
}

impl CallingConvention {
    fn from_code(c: u8) -> Option<Self> {
        Some(match c {
            b'A' | b'B' => Self::Cdecl,
            b'C' | b'D' => Self::Pascal,
            b'E' | b'F' => Self::Thiscall,
            b'G' | b'H' => Self::Stdcall,
            b'I' | b'J' => Self::Fastcall,
            b'K' => Self::Unspecified,
            _ => return None,
        })
    }

    fn keyword(self) -> &'static str {
        match self {
            Self::Cdecl => "__cdecl",
            Self::Pascal => "__pascal",
            Self::Thiscall => "__thiscall",
            Self::Stdcall => "__stdcall",
            Self::Fastcall => "__fastcall",
            Self::Unspecified => "",
        }
    }
}

impl fmt::Display for CallingConvention {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// What a decorated name refers to.
#[allow(missing_docs)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SymbolKind {
    Function,
    Data,
    /// `` `vftable' `` or `` `vbtable' ``
    VirtualTable,
}

/// A successfully demangled symbol.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DemangledSymbol {
    /// The decorated name, including the leading `?`.
    pub raw: String,
    #[allow(missing_docs)]
    pub kind: SymbolKind,
    /// The enclosing scope, outermost first and joined with `::`.
    pub class_name: Option<String>,
    /// The function, operator or variable name.
    pub function_name: String,
    /// For functions, the return type. For data, the variable's type.
    pub return_type: Option<Argument>,
    #[allow(missing_docs)]
    pub calling_convention: Option<CallingConvention>,
    /// `None` for free functions and global data.
    pub access: Option<Access>,
    #[allow(missing_docs)]
    pub is_static: bool,
    #[allow(missing_docs)]
    pub is_virtual: bool,
    /// True if `args[0]` is the implicit `this` pointer.
    pub has_this: bool,
    /// Qualifiers of `*this`.
    pub this_qualifiers: Qualifiers,
    /// Arguments in order, starting with `this` for instance methods.
    pub args: Vec<Argument>,
}

impl DemangledSymbol {
    /// The arguments, not counting `this`.
    pub fn explicit_args(&self) -> &[Argument] {
        if self.has_this {
            &self.args[1..]
        } else {
            &self.args
        }
    }

    /// The name with its scope, e.g. `Foo::Bar`.
    pub fn qualified_name(&self) -> String {
        match &self.class_name {
            Some(class) => format!("{class}::{}", self.function_name),
            None => self.function_name.clone(),
        }
    }
}

impl fmt::Display for DemangledSymbol {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if let Some(access) = self.access {
            write!(f, "{access}: ")?;
        }
        if self.is_static {
            f.write_str("static ")?;
        }
        if self.is_virtual {
            f.write_str("virtual ")?;
        }

        match self.kind {
            SymbolKind::Function => {
                if let Some(ret) = &self.return_type {
                    write!(f, "{ret} ")?;
                }
                if let Some(cc) = self.calling_convention {
                    if cc != CallingConvention::Unspecified {
                        write!(f, "{cc} ")?;
                    }
                }
                write!(f, "{}(", self.qualified_name())?;
                let args = self.explicit_args();
                if args.is_empty() {
                    f.write_str("void")?;
                }
                for (i, arg) in args.iter().enumerate() {
                    if i != 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                f.write_str(")")?;
                write!(f, "{}", CvSuffix(self.this_qualifiers))
            }
            SymbolKind::Data => match &self.return_type {
                Some(t) => write!(f, "{t} {}", self.qualified_name()),
                None => f.write_str(&self.qualified_name()),
            },
            SymbolKind::VirtualTable => {
                write!(f, "{}{}", CvPrefix(self.this_qualifiers), self.qualified_name())
            }
        }
    }
}

struct CvPrefix(Qualifiers);

impl fmt::Display for CvPrefix {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.0.contains(Qualifiers::CONST) {
            f.write_str("const ")?;
        }
        if self.0.contains(Qualifiers::VOLATILE) {
            f.write_str("volatile ")?;
        }
        Ok(())
    }
}

struct CvSuffix(Qualifiers);

impl fmt::Display for CvSuffix {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.0.contains(Qualifiers::CONST) {
            f.write_str(" const")?;
        }
        if self.0.contains(Qualifiers::VOLATILE) {
            f.write_str(" volatile")?;
        }
        Ok(())
    }
}

/// `?0` and `?1` are the constructor and destructor and take their name from the class.
static OPERATORS: &[(u8, &str)] = &[
    (b'2', "operator new"),
    (b'3', "operator delete"),
    (b'4', "operator="),
    (b'5', "operator>>"),
    (b'6', "operator<<"),
    (b'7', "operator!"),
    (b'8', "operator=="),
    (b'9', "operator!="),
    (b'A', "operator[]"),
    (b'B', "operator "),
    (b'C', "operator->"),
    (b'D', "operator*"),
    (b'E', "operator++"),
    (b'F', "operator--"),
    (b'G', "operator-"),
    (b'H', "operator+"),
    (b'I', "operator&"),
    (b'J', "operator->*"),
    (b'K', "operator/"),
    (b'L', "operator%"),
    (b'M', "operator<"),
    (b'N', "operator<="),
    (b'O', "operator>"),
    (b'P', "operator>="),
    (b'Q', "operator,"),
    (b'R', "operator()"),
    (b'S', "operator~"),
    (b'T', "operator^"),
    (b'U', "operator|"),
    (b'V', "operator&&"),
    (b'W', "operator||"),
    (b'X', "operator*="),
    (b'Y', "operator+="),
    (b'Z', "operator-="),
];

/// The `?_` escapes.
static OPERATORS_EXT: &[(u8, &str)] = &[
    (b'0', "operator/="),
    (b'1', "operator%="),
    (b'2', "operator>>="),
    (b'3', "operator<<="),
    (b'4', "operator&="),
    (b'5', "operator|="),
    (b'6', "operator^="),
    (b'7', "`vftable'"),
    (b'8', "`vbtable'"),
    (b'9', "`vcall'"),
    (b'A', "`typeof'"),
    (b'B', "`local static guard'"),
    (b'C', "`string'"),
    (b'D', "`vbase destructor'"),
    (b'E', "`vector deleting destructor'"),
    (b'F', "`default constructor closure'"),
    (b'G', "`scalar deleting destructor'"),
    (b'H', "`vector constructor iterator'"),
    (b'I', "`vector destructor iterator'"),
    (b'J', "`vector vbase constructor iterator'"),
    (b'K', "`virtual displacement map'"),
    (b'L', "`eh vector constructor iterator'"),
    (b'M', "`eh vector destructor iterator'"),
    (b'N', "`eh vector vbase constructor iterator'"),
    (b'O', "`copy constructor closure'"),
    (b'S', "`local vftable'"),
    (b'T', "`local vftable constructor closure'"),
    (b'U', "operator new[]"),
    (b'V', "operator delete[]"),
    (b'X', "`placement delete closure'"),
    (b'Y', "`placement delete[] closure'"),
];

fn lookup(table: &[(u8, &'static str)], code: u8) -> Option<&'static str> {
    table
        .binary_search_by_key(&code, |&(k, _)| k)
        .ok()
        .map(|i| table[i].1)
}

enum Name {
    Plain(String),
    Operator(&'static str),
    Constructor,
    Destructor,
}

type Result<T> = std::result::Result<T, NotDemangled>;

/// Demangles one decorated name.
pub fn demangle(name: &str) -> Result<DemangledSymbol> {
    let Some(rest) = name.strip_prefix('?') else {
        return Err(NotDemangled::NotMangled);
    };

    let mut p = Demangler {
        s: rest.as_bytes(),
        pos: 0,
        class: None,
        backrefs: Vec::new(),
    };
    match p.symbol(name) {
        Ok(sym) => Ok(sym),
        Err(e) => {
            tracing::trace!("cannot demangle {name} at offset {}", p.pos + 1);
            Err(e)
        }
    }
}

/// Demangles `name` if possible, else returns it unchanged.
pub fn demangle_or_raw(name: &str) -> String {
    match demangle(name) {
        Ok(sym) => sym.to_string(),
        Err(_) => name.to_string(),
    }
}

struct Demangler<'a> {
    s: &'a [u8],
    pos: usize,
    /// The enclosing class, once the scope has been read.
    class: Option<String>,
    /// Remembered argument types for `0`..`9`.
    backrefs: Vec<Argument>,
}

impl<'a> Demangler<'a> {
    fn peek(&self) -> Option<u8> {
        self.s.get(self.pos).copied()
    }

    fn next(&mut self) -> Result<u8> {
        let c = self.peek().ok_or(NotDemangled::Grammar)?;
        self.pos += 1;
        Ok(c)
    }

    fn eat(&mut self, c: u8) -> bool {
        if self.peek() == Some(c) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, c: u8) -> Result<()> {
        if self.eat(c) {
            Ok(())
        } else {
            Err(NotDemangled::Grammar)
        }
    }

    fn symbol(&mut self, raw: &str) -> Result<DemangledSymbol> {
        let name = self.name()?;
        let scope = self.scope()?;
        self.class = (!scope.is_empty()).then(|| scope.join("::"));
        let innermost = scope.last().cloned();

        let function_name = match name {
            Name::Plain(s) => s,
            Name::Operator(s) => s.to_string(),
            Name::Constructor => innermost.ok_or(NotDemangled::Grammar)?,
            Name::Destructor => format!("~{}", innermost.ok_or(NotDemangled::Grammar)?),
        };

        let mut sym = DemangledSymbol {
            raw: raw.to_string(),
            kind: SymbolKind::Function,
            class_name: self.class.clone(),
            function_name,
            return_type: None,
            calling_convention: None,
            access: None,
            is_static: false,
            is_virtual: false,
            has_this: false,
            this_qualifiers: Qualifiers::empty(),
            args: Vec::new(),
        };

        match self.next()? {
            c @ b'0'..=b'4' => {
                sym.kind = SymbolKind::Data;
                sym.access = match c {
                    b'0' => Some(Access::Private),
                    b'1' => Some(Access::Protected),
                    b'2' => Some(Access::Public),
                    _ => None,
                };
                sym.is_static = c <= b'2';
                let mut t = self.type_()?;
                t.qualifiers |= self.storage_cv()?;
                sym.return_type = Some(t);
            }
            b'6' | b'7' => {
                sym.kind = SymbolKind::VirtualTable;
                sym.this_qualifiers = self.storage_cv()?;
                // The optional "for" scope names the base class the table belongs to.
                if !self.eat(b'@') {
                    self.scope()?;
                }
            }
            c @ b'A'..=b'V' => {
                let index = c - b'A';
                sym.access = Some(match index / 8 {
                    0 => Access::Private,
                    1 => Access::Protected,
                    _ => Access::Public,
                });
                match (index % 8) / 2 {
                    0 => {}
                    1 => sym.is_static = true,
                    2 => sym.is_virtual = true,
                    // adjustor thunks
                    _ => return Err(NotDemangled::Grammar),
                }
                if !sym.is_static {
                    let class = self.class.as_ref().ok_or(NotDemangled::Grammar)?;
                    sym.has_this = true;
                    sym.args.push(Argument::new(
                        format!("{class} *"),
                        TypeTag::Pointer,
                        Qualifiers::empty(),
                    ));
                    sym.this_qualifiers = self.storage_cv()?;
                }
                self.function(&mut sym)?;
            }
            b'Y' | b'Z' => self.function(&mut sym)?,
            _ => return Err(NotDemangled::Grammar),
        }

        if self.pos != self.s.len() {
            return Err(NotDemangled::Grammar);
        }
        Ok(sym)
    }

    fn name(&mut self) -> Result<Name> {
        if !self.eat(b'?') {
            return Ok(Name::Plain(self.ident()?));
        }
        let code = self.next()?;
        Ok(match code {
            b'0' => Name::Constructor,
            b'1' => Name::Destructor,
            b'_' => Name::Operator(lookup(OPERATORS_EXT, self.next()?).ok_or(NotDemangled::Grammar)?),
            c => Name::Operator(lookup(OPERATORS, c).ok_or(NotDemangled::Grammar)?),
        })
    }

    /// An identifier terminated by `@`.
    fn ident(&mut self) -> Result<String> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c == b'@' {
                break;
            }
            if !(c.is_ascii_alphanumeric() || c == b'_' || c == b'$') {
                return Err(NotDemangled::Grammar);
            }
            self.pos += 1;
        }
        let ident = &self.s[start..self.pos];
        if ident.is_empty() || ident[0].is_ascii_digit() {
            return Err(NotDemangled::Grammar);
        }
        self.expect(b'@')?;
        Ok(String::from_utf8_lossy(ident).into_owned())
    }

    /// Identifiers up to an empty one, returned outermost first.
    fn scope(&mut self) -> Result<Vec<String>> {
        let mut parts = Vec::new();
        while !self.eat(b'@') {
            parts.push(self.ident()?);
        }
        parts.reverse();
        Ok(parts)
    }

    /// An optional `E` (64-bit pointer) followed by `A`..`D`.
    fn storage_cv(&mut self) -> Result<Qualifiers> {
        self.eat(b'E');
        Ok(match self.next()? {
            b'A' => Qualifiers::empty(),
            b'B' => Qualifiers::CONST,
            b'C' => Qualifiers::VOLATILE,
            b'D' => Qualifiers::CONST | Qualifiers::VOLATILE,
            _ => return Err(NotDemangled::Grammar),
        })
    }

    /// Everything after the access code: calling convention, return type, arguments, `Z`.
    fn function(&mut self, sym: &mut DemangledSymbol) -> Result<()> {
        sym.calling_convention =
            Some(CallingConvention::from_code(self.next()?).ok_or(NotDemangled::Grammar)?);
        sym.return_type = Some(self.return_type()?);
        let args = self.arg_list()?;
        sym.args.extend(args);
        self.expect(b'Z')
    }

    fn return_type(&mut self) -> Result<Argument> {
        if self.eat(b'@') {
            return Ok(Argument::new("void".into(), TypeTag::Void, Qualifiers::empty()));
        }
        self.type_()
    }

    fn arg_list(&mut self) -> Result<Vec<Argument>> {
        let mut args = Vec::new();
        if self.eat(b'X') {
            return Ok(args);
        }
        loop {
            match self.peek() {
                None => return Err(NotDemangled::Grammar),
                Some(b'@') => {
                    self.pos += 1;
                    return Ok(args);
                }
                Some(b'Z') => {
                    self.pos += 1;
                    args.push(Argument::new("...".into(), TypeTag::Varargs, Qualifiers::empty()));
                    return Ok(args);
                }
                Some(c) => {
                    let start = self.pos;
                    let arg = self.type_()?;
                    if arg.tag == TypeTag::Void {
                        return Err(NotDemangled::Grammar);
                    }
                    if !c.is_ascii_digit() && self.pos - start > 1 && self.backrefs.len() < 10 {
                        self.backrefs.push(arg.clone());
                    }
                    args.push(arg);
                }
            }
        }
    }

    /// Decodes one type.
    fn type_(&mut self) -> Result<Argument> {
        let mut q = Qualifiers::empty();
        match self.peek() {
            // qualified value
            Some(b'?') => {
                self.pos += 1;
                q |= self.storage_cv()?;
            }
            // reference
            Some(b'A') => {
                self.pos += 1;
                q |= Qualifiers::BY_REFERENCE | self.storage_cv()?;
            }
            _ => {}
        }

        if self.eat(b'_') {
            q |= Qualifiers::EXTENDED;
            let (text, tag) = extended_primitive(self.next()?).ok_or(NotDemangled::Grammar)?;
            return Ok(qualified(text, tag, q));
        }

        let c = self.next()?;
        if let Some((text, tag)) = primitive(c) {
            return Ok(qualified(text, tag, q));
        }

        match c {
            b'P' | b'Q' => {
                let mut t = self.pointer()?;
                if c == b'Q' {
                    t.text.push_str(" const");
                    t.qualifiers |= Qualifiers::CONST;
                }
                t.qualifiers |= q;
                if q.contains(Qualifiers::BY_REFERENCE) {
                    t.text.push_str(" &");
                }
                Ok(t)
            }
            b'T' | b'U' | b'V' => {
                let text = if matches!(self.peek(), Some(b'0' | b'1')) {
                    self.pos += 1;
                    self.expect(b'@')?;
                    self.class.clone().ok_or(NotDemangled::Grammar)?
                } else {
                    let keyword = match c {
                        b'T' => "union",
                        b'U' => "struct",
                        _ => "class",
                    };
                    format!("{keyword} {}", self.scope()?.join("::"))
                };
                Ok(qualified(&text, TypeTag::Struct, q))
            }
            b'W' => {
                // underlying type
                if !self.next()?.is_ascii_digit() {
                    return Err(NotDemangled::Grammar);
                }
                let text = format!("enum {}", self.scope()?.join("::"));
                Ok(qualified(&text, TypeTag::Enum, q))
            }
            b'0'..=b'9' => {
                let slot = (c - b'0') as usize;
                self.backrefs.get(slot).cloned().ok_or(NotDemangled::Grammar)
            }
            _ => Err(NotDemangled::Grammar),
        }
    }

    /// After `P` or `Q`: either `6` and a function type, or pointee qualifiers and a type.
    fn pointer(&mut self) -> Result<Argument> {
        self.eat(b'E');
        if self.eat(b'6') {
            let cc = CallingConvention::from_code(self.next()?).ok_or(NotDemangled::Grammar)?;
            let ret = self.return_type()?;
            let args = self.arg_list()?;
            self.expect(b'Z')?;
            let args: Vec<String> = args.into_iter().map(|a| a.text).collect();
            let args = if args.is_empty() {
                "void".to_string()
            } else {
                args.join(", ")
            };
            let star = match cc {
                CallingConvention::Unspecified => "*".to_string(),
                cc => format!("{cc} *"),
            };
            return Ok(Argument::new(
                format!("{ret} ({star})({args})"),
                TypeTag::FunctionPointer,
                Qualifiers::empty(),
            ));
        }

        let cv = self.storage_cv()?;
        let pointee = self.type_()?;
        let tag = match pointee.tag {
            TypeTag::Char => TypeTag::String,
            TypeTag::WideChar => TypeTag::WideString,
            _ => TypeTag::Pointer,
        };
        Ok(Argument::new(
            format!("{}{} *", CvPrefix(cv), pointee.text),
            tag,
            Qualifiers::empty(),
        ))
    }
}

fn qualified(base: &str, tag: TypeTag, q: Qualifiers) -> Argument {
    let mut text = format!("{}{base}", CvPrefix(q));
    if q.contains(Qualifiers::BY_REFERENCE) {
        text.push_str(" &");
    }
    Argument::new(text, tag, q)
}

fn primitive(c: u8) -> Option<(&'static str, TypeTag)> {
    Some(match c {
        b'C' => ("signed char", TypeTag::Integer),
        b'D' => ("char", TypeTag::Char),
        b'E' => ("unsigned char", TypeTag::Integer),
        b'F' => ("short", TypeTag::Integer),
        b'G' => ("unsigned short", TypeTag::Integer),
        b'H' => ("int", TypeTag::Integer),
        b'I' => ("unsigned int", TypeTag::Integer),
        b'J' => ("long", TypeTag::Integer),
        b'K' => ("unsigned long", TypeTag::Integer),
        b'M' => ("float", TypeTag::Float),
        b'N' => ("double", TypeTag::Double),
        b'O' => ("long double", TypeTag::LongDouble),
        b'X' => ("void", TypeTag::Void),
        b'Z' => ("...", TypeTag::Varargs),
        _ => return None,
    })
}

fn extended_primitive(c: u8) -> Option<(&'static str, TypeTag)> {
    Some(match c {
        b'D' => ("__int8", TypeTag::Integer),
        b'E' => ("unsigned __int8", TypeTag::Integer),
        b'F' => ("__int16", TypeTag::Integer),
        b'G' => ("unsigned __int16", TypeTag::Integer),
        b'H' => ("__int32", TypeTag::Integer),
        b'I' => ("unsigned __int32", TypeTag::Integer),
        b'J' => ("__int64", TypeTag::Integer),
        b'K' => ("unsigned __int64", TypeTag::Integer),
        b'L' => ("__int128", TypeTag::Integer),
        b'M' => ("unsigned __int128", TypeTag::Integer),
        b'N' => ("bool", TypeTag::Bool),
        b'W' => ("wchar_t", TypeTag::WideChar),
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_mangled() {
        assert_eq!(demangle("CreateFileW"), Err(NotDemangled::NotMangled));
        assert_eq!(demangle(""), Err(NotDemangled::NotMangled));
        assert_eq!(demangle_or_raw("_main"), "_main");
    }

    #[test]
    fn public_instance_method() {
        let sym = demangle("?Foo@Bar@@QAEXXZ").unwrap();
        assert_eq!(sym.kind, SymbolKind::Function);
        assert_eq!(sym.access, Some(Access::Public));
        assert!(!sym.is_static);
        assert!(!sym.is_virtual);
        assert!(sym.has_this);
        assert_eq!(sym.args.len(), 1);
        assert_eq!(sym.args[0].text, "Bar *");
        assert_eq!(sym.args[0].tag, TypeTag::Pointer);
        assert!(sym.explicit_args().is_empty());
        assert_eq!(sym.return_type.as_ref().unwrap().tag, TypeTag::Void);
        assert_eq!(sym.calling_convention, Some(CallingConvention::Thiscall));
        assert_eq!(sym.class_name.as_deref(), Some("Bar"));
        assert_eq!(sym.function_name, "Foo");
        assert_eq!(sym.to_string(), "public: void __thiscall Bar::Foo(void)");
    }

    #[test]
    fn free_function() {
        let sym = demangle("?Func@@YGHPBDH@Z").unwrap();
        assert_eq!(sym.access, None);
        assert!(!sym.has_this);
        assert_eq!(sym.class_name, None);
        assert_eq!(sym.calling_convention, Some(CallingConvention::Stdcall));
        assert_eq!(sym.args.len(), 2);
        assert_eq!(sym.args[0].text, "const char *");
        assert_eq!(sym.args[0].tag, TypeTag::String);
        assert_eq!(sym.args[1].tag, TypeTag::Integer);
        assert_eq!(sym.to_string(), "int __stdcall Func(const char *, int)");
    }

    #[test]
    fn back_reference_repeats_argument() {
        let sym = demangle("?f@@YAXPAH0@Z").unwrap();
        assert_eq!(sym.args.len(), 2);
        assert_eq!(sym.args[0].text, "int *");
        assert_eq!(sym.args[1], sym.args[0]);
    }

    #[test]
    fn back_reference_to_empty_slot() {
        // single-character types are not remembered
        assert_eq!(demangle("?f@@YAXH0@Z"), Err(NotDemangled::Grammar));
        assert_eq!(demangle("?f@@YAX0@Z"), Err(NotDemangled::Grammar));
        assert_eq!(demangle("?f@@YAXPAH1@Z"), Err(NotDemangled::Grammar));
    }

    #[test]
    fn constructors_and_operators() {
        let ctor = demangle("??0Foo@@QAE@XZ").unwrap();
        assert_eq!(ctor.function_name, "Foo");
        assert_eq!(ctor.qualified_name(), "Foo::Foo");

        let dtor = demangle("??1Foo@@UAE@XZ").unwrap();
        assert_eq!(dtor.function_name, "~Foo");
        assert!(dtor.is_virtual);

        let assign = demangle("??4Foo@@QAEAAV0@ABV0@@Z").unwrap();
        assert_eq!(assign.function_name, "operator=");
        assert_eq!(assign.return_type.as_ref().unwrap().text, "Foo &");
        assert_eq!(assign.explicit_args()[0].text, "const Foo &");
        assert!(
            assign.explicit_args()[0]
                .qualifiers
                .contains(Qualifiers::CONST | Qualifiers::BY_REFERENCE)
        );

        let del = demangle("??_V@YAXPAX@Z").unwrap();
        assert_eq!(del.function_name, "operator delete[]");
        assert_eq!(del.explicit_args()[0].text, "void *");
    }

    #[test]
    fn varargs_and_function_pointers() {
        let sym = demangle("?log@@YAHPBDZZ").unwrap();
        assert_eq!(sym.to_string(), "int __cdecl log(const char *, ...)");

        let sym = demangle("?set@@YAXP6AHH@Z@Z").unwrap();
        assert_eq!(sym.args[0].text, "int (__cdecl *)(int)");
        assert_eq!(sym.args[0].tag, TypeTag::FunctionPointer);
    }

    #[test]
    fn extended_types() {
        let sym = demangle("?f@@YA_NPA_W_J@Z").unwrap();
        assert_eq!(sym.return_type.unwrap().text, "bool");
        assert_eq!(sym.args[0].text, "wchar_t *");
        assert_eq!(sym.args[0].tag, TypeTag::WideString);
        assert_eq!(sym.args[1].text, "__int64");
    }

    #[test]
    fn static_methods_and_nested_scopes() {
        let sym = demangle("?Create@Inner@Outer@@SAPAV12@H@Z");
        // `12` is a name back-reference pair, which is not supported
        assert_eq!(sym, Err(NotDemangled::Grammar));

        let sym = demangle("?Create@Inner@Outer@@SAPAVWidget@@H@Z").unwrap();
        assert!(sym.is_static);
        assert!(!sym.has_this);
        assert_eq!(sym.class_name.as_deref(), Some("Outer::Inner"));
        assert_eq!(sym.return_type.unwrap().text, "class Widget *");
    }

    #[test]
    fn data_and_vtables() {
        let sym = demangle("?count@Foo@@2HA").unwrap();
        assert_eq!(sym.kind, SymbolKind::Data);
        assert!(sym.is_static);
        assert_eq!(sym.to_string(), "public: static int Foo::count");

        let sym = demangle("?name@@3PBDB").unwrap();
        assert_eq!(sym.return_type.as_ref().unwrap().text, "const char *");
        assert!(sym.return_type.unwrap().qualifiers.contains(Qualifiers::CONST));

        let sym = demangle("??_7Foo@@6B@").unwrap();
        assert_eq!(sym.kind, SymbolKind::VirtualTable);
        assert_eq!(sym.to_string(), "const Foo::`vftable'");
    }

    #[test]
    fn malformed() {
        for name in [
            "?",
            "?Foo",
            "?Foo@Bar@@Q",
            "?Foo@Bar@@QAEXXZjunk",
            "?Foo@Bar@@QAEXH",
            "?Foo@@QAEXXZ",
            "?f@@YAXXX",
            "??$tmpl@H@@YAXXZ",
            "?f@@GAEXXZ",
        ] {
            assert_eq!(demangle(name), Err(NotDemangled::Grammar), "{name}");
        }
    }

    #[test]
    fn idempotent() {
        let a = demangle("?Func@@YGHPBDH@Z").unwrap().to_string();
        let b = demangle("?Func@@YGHPBDH@Z").unwrap().to_string();
        assert_eq!(a, b);
    }
}
