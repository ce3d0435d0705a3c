//! Symbol kinds, type leaves and subsection kinds.
//!
//! Each table is generated by a macro that defines one constant per kind plus a sorted
//! `(value, name)` array, which the `Debug` impls search.

macro_rules! kinds {
    (
        $(#[$meta:meta])*
        $ty:ident($repr:ty), $names:ident;
        $($code:expr, $name:ident;)*
    ) => {
        $(#[$meta])*
        #[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
        pub struct $ty(pub $repr);

        #[allow(missing_docs, non_upper_case_globals)]
        impl $ty {
            $(
                pub const $name: $ty = $ty($code);
            )*
        }

        static $names: &[($repr, &str)] = &[
            $(($code, stringify!($name)),)*
        ];

        impl $ty {
            /// The name of this kind, if it is a known one.
            pub fn name(self) -> Option<&'static str> {
                $names
                    .binary_search_by_key(&self.0, |&(k, _)| k)
                    .ok()
                    .map(|i| $names[i].1)
            }
        }

        impl std::fmt::Debug for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                match self.name() {
                    Some(s) => f.write_str(s),
                    None => write!(f, "??{}(0x{:04x})", stringify!($ty), self.0),
                }
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                std::fmt::Debug::fmt(self, f)
            }
        }
    }
}

kinds! {
    /// The kind of a symbol record.
    SymKind(u16), SYM_NAMES;

    0x0001, S_COMPILE;
    0x0002, S_REGISTER_16t;
    0x0003, S_CONSTANT_16t;
    0x0004, S_UDT_16t;
    0x0005, S_SSEARCH;
    0x0006, S_END;
    0x0007, S_SKIP;
    0x0008, S_CVRESERVE;
    0x0009, S_OBJNAME_ST;
    0x000a, S_ENDARG;
    0x000b, S_COBOLUDT_16t;
    0x000c, S_MANYREG_16t;
    0x000d, S_RETURN;
    0x000e, S_ENTRYTHIS;

    0x0100, S_BPREL16;
    0x0101, S_LDATA16;
    0x0102, S_GDATA16;
    0x0103, S_PUB16;
    0x0104, S_LPROC16;
    0x0105, S_GPROC16;
    0x0106, S_THUNK16;
    0x0107, S_BLOCK16;
    0x0108, S_WITH16;
    0x0109, S_LABEL16;
    0x010a, S_CEXMODEL16;
    0x010b, S_VFTABLE16;
    0x010c, S_REGREL16;

    0x0200, S_BPREL32_16t;
    0x0201, S_LDATA32_16t;
    0x0202, S_GDATA32_16t;
    0x0203, S_PUB32_16t;
    0x0204, S_LPROC32_16t;
    0x0205, S_GPROC32_16t;
    0x0206, S_THUNK32_ST;
    0x0207, S_BLOCK32_ST;
    0x0208, S_WITH32_ST;
    0x0209, S_LABEL32_ST;
    0x020a, S_CEXMODEL32;
    0x020b, S_VFTABLE32_16t;
    0x020c, S_REGREL32_16t;
    0x020d, S_LTHREAD32_16t;
    0x020e, S_GTHREAD32_16t;

    0x0400, S_PROCREF_ST;
    0x0401, S_DATAREF_ST;
    0x0402, S_ALIGN;
    0x0403, S_LPROCREF_ST;

    0x1001, S_REGISTER_ST;
    0x1002, S_CONSTANT_ST;
    0x1003, S_UDT_ST;
    0x1004, S_COBOLUDT_ST;
    0x1005, S_MANYREG_ST;
    0x1006, S_BPREL32_ST;
    0x1007, S_LDATA32_ST;
    0x1008, S_GDATA32_ST;
    0x1009, S_PUB32_ST;
    0x100a, S_LPROC32_ST;
    0x100b, S_GPROC32_ST;
    0x100c, S_VFTABLE32;
    0x100d, S_REGREL32_ST;
    0x100e, S_LTHREAD32_ST;
    0x100f, S_GTHREAD32_ST;
    0x1012, S_FRAMEPROC;

    0x1101, S_OBJNAME;
    0x1102, S_THUNK32;
    0x1103, S_BLOCK32;
    0x1104, S_WITH32;
    0x1105, S_LABEL32;
    0x1106, S_REGISTER;
    0x1107, S_CONSTANT;
    0x1108, S_UDT;
    0x1109, S_COBOLUDT;
    0x110a, S_MANYREG;
    0x110b, S_BPREL32;
    0x110c, S_LDATA32;
    0x110d, S_GDATA32;
    0x110e, S_PUB32;
    0x110f, S_LPROC32;
    0x1110, S_GPROC32;
    0x1111, S_REGREL32;
    0x1112, S_LTHREAD32;
    0x1113, S_GTHREAD32;
    0x1116, S_COMPILE2;
    0x1124, S_UNAMESPACE;
    0x1125, S_PROCREF;
    0x1126, S_DATAREF;
    0x1127, S_LPROCREF;
    0x112c, S_TRAMPOLINE;
    0x1136, S_SECTION;
    0x1137, S_COFFGROUP;
    0x1138, S_EXPORT;
    0x1139, S_CALLSITEINFO;
    0x113a, S_FRAMECOOKIE;
    0x113c, S_COMPILE3;
    0x113d, S_ENVBLOCK;
    0x113e, S_LOCAL;
    0x1146, S_LPROC32_ID;
    0x1147, S_GPROC32_ID;
    0x114c, S_BUILDINFO;
    0x114d, S_INLINESITE;
    0x114e, S_INLINESITE_END;
    0x114f, S_PROC_ID_END;
}

kinds! {
    /// The kind of a type record, or of a field within a field list.
    Leaf(u16), LEAF_NAMES;

    0x0001, LF_MODIFIER_16t;
    0x0002, LF_POINTER_16t;
    0x0003, LF_ARRAY_16t;
    0x0004, LF_CLASS_16t;
    0x0005, LF_STRUCTURE_16t;
    0x0006, LF_UNION_16t;
    0x0007, LF_ENUM_16t;
    0x0008, LF_PROCEDURE_16t;
    0x0009, LF_MFUNCTION_16t;
    0x000a, LF_VTSHAPE;
    0x000b, LF_COBOL0_16t;
    0x000c, LF_COBOL1;
    0x000d, LF_BARRAY_16t;
    0x000e, LF_LABEL;
    0x000f, LF_NULL;
    0x0010, LF_NOTTRAN;
    0x0011, LF_DIMARRAY_16t;
    0x0012, LF_VFTPATH_16t;
    0x0013, LF_PRECOMP_16t;
    0x0014, LF_ENDPRECOMP;
    0x0015, LF_OEM_16t;
    0x0016, LF_TYPESERVER_ST;

    0x0200, LF_SKIP_16t;
    0x0201, LF_ARGLIST_16t;
    0x0202, LF_DEFARG_16t;
    0x0203, LF_LIST;
    0x0204, LF_FIELDLIST_16t;
    0x0205, LF_DERIVED_16t;
    0x0206, LF_BITFIELD_16t;
    0x0207, LF_METHODLIST_16t;
    0x0208, LF_DIMCONU_16t;
    0x0209, LF_DIMCONLU_16t;
    0x020a, LF_DIMVARU_16t;
    0x020b, LF_DIMVARLU_16t;
    0x020c, LF_REFSYM;

    0x0400, LF_BCLASS_16t;
    0x0401, LF_VBCLASS_16t;
    0x0402, LF_IVBCLASS_16t;
    0x0403, LF_ENUMERATE_ST;
    0x0404, LF_FRIENDFCN_16t;
    0x0405, LF_INDEX_16t;
    0x0406, LF_MEMBER_16t;
    0x0407, LF_STMEMBER_16t;
    0x0408, LF_METHOD_16t;
    0x0409, LF_NESTTYPE_16t;
    0x040a, LF_VFUNCTAB_16t;
    0x040b, LF_FRIENDCLS_16t;
    0x040c, LF_ONEMETHOD_16t;
    0x040d, LF_VFUNCOFF_16t;

    0x1001, LF_MODIFIER;
    0x1002, LF_POINTER;
    0x1003, LF_ARRAY_ST;
    0x1004, LF_CLASS_ST;
    0x1005, LF_STRUCTURE_ST;
    0x1006, LF_UNION_ST;
    0x1007, LF_ENUM_ST;
    0x1008, LF_PROCEDURE;
    0x1009, LF_MFUNCTION;
    0x100a, LF_COBOL0;
    0x100b, LF_BARRAY;
    0x100c, LF_DIMARRAY_ST;
    0x100d, LF_VFTPATH;
    0x100e, LF_PRECOMP_ST;
    0x100f, LF_OEM;
    0x1010, LF_ALIAS_ST;
    0x1011, LF_OEM2;

    0x1200, LF_SKIP;
    0x1201, LF_ARGLIST;
    0x1202, LF_DEFARG_ST;
    0x1203, LF_FIELDLIST;
    0x1204, LF_DERIVED;
    0x1205, LF_BITFIELD;
    0x1206, LF_METHODLIST;
    0x1207, LF_DIMCONU;
    0x1208, LF_DIMCONLU;
    0x1209, LF_DIMVARU;
    0x120a, LF_DIMVARLU;

    0x1400, LF_BCLASS;
    0x1401, LF_VBCLASS;
    0x1402, LF_IVBCLASS;
    0x1403, LF_FRIENDFCN_ST;
    0x1404, LF_INDEX;
    0x1405, LF_MEMBER_ST;
    0x1406, LF_STMEMBER_ST;
    0x1407, LF_METHOD_ST;
    0x1408, LF_NESTTYPE_ST;
    0x1409, LF_VFUNCTAB;
    0x140a, LF_FRIENDCLS;
    0x140b, LF_ONEMETHOD_ST;
    0x140c, LF_VFUNCOFF;
    0x140d, LF_NESTTYPEEX_ST;
    0x140e, LF_MEMBERMODIFY_ST;
    0x140f, LF_MANAGED_ST;

    0x1501, LF_TYPESERVER;
    0x1502, LF_ENUMERATE;
    0x1503, LF_ARRAY;
    0x1504, LF_CLASS;
    0x1505, LF_STRUCTURE;
    0x1506, LF_UNION;
    0x1507, LF_ENUM;
    0x1508, LF_DIMARRAY;
    0x1509, LF_PRECOMP;
    0x150a, LF_ALIAS;
    0x150b, LF_DEFARG;
    0x150c, LF_FRIENDFCN;
    0x150d, LF_MEMBER;
    0x150e, LF_STMEMBER;
    0x150f, LF_METHOD;
    0x1510, LF_NESTTYPE;
    0x1511, LF_ONEMETHOD;
    0x1512, LF_NESTTYPEEX;
    0x1513, LF_MEMBERMODIFY;
    0x1514, LF_MANAGED;
    0x1515, LF_TYPESERVER2;

    0x8000, LF_CHAR;
    0x8001, LF_SHORT;
    0x8002, LF_USHORT;
    0x8003, LF_LONG;
    0x8004, LF_ULONG;
    0x8005, LF_REAL32;
    0x8006, LF_REAL64;
    0x8007, LF_REAL80;
    0x8008, LF_REAL128;
    0x8009, LF_QUADWORD;
    0x800a, LF_UQUADWORD;
    0x800b, LF_REAL48;
    0x800c, LF_COMPLEX32;
    0x800d, LF_COMPLEX64;
    0x800e, LF_COMPLEX80;
    0x800f, LF_COMPLEX128;
    0x8010, LF_VARSTRING;
    0x8017, LF_OCTWORD;
    0x8018, LF_UOCTWORD;
    0x8019, LF_DECIMAL;
    0x801a, LF_DATE;
    0x801b, LF_UTF8STRING;
    0x801c, LF_REAL16;
}

impl Leaf {
    /// Values below this are immediate numeric leaves.
    pub const LF_NUMERIC: u16 = 0x8000;

    /// True for leaves whose type indexes are 16 bits wide.
    pub fn is_16t(self) -> bool {
        self.0 < 0x1000
    }

    /// True for the forms whose names are NUL-terminated rather than length-prefixed.
    pub fn has_strz_name(self) -> bool {
        self.0 >= 0x1500 && self.0 < 0x1600
    }
}

impl SymKind {
    /// True for the forms whose names are NUL-terminated rather than length-prefixed.
    pub fn has_strz_name(self) -> bool {
        self.0 >= 0x1100
    }
}

kinds! {
    /// The kind of an OMF subsection, from the subsection directory.
    SstKind(u16), SST_NAMES;

    0x0120, sstModule;
    0x0121, sstTypes;
    0x0122, sstPublic;
    0x0123, sstPublicSym;
    0x0124, sstSymbols;
    0x0125, sstAlignSym;
    0x0126, sstSrcLnSeg;
    0x0127, sstSrcModule;
    0x0128, sstLibraries;
    0x0129, sstGlobalSym;
    0x012a, sstGlobalPub;
    0x012b, sstGlobalTypes;
    0x012c, sstMPC;
    0x012d, sstSegMap;
    0x012e, sstSegName;
    0x012f, sstPreComp;
    0x0130, sstPreCompMap;
    0x0131, sstOffsetMap16;
    0x0132, sstOffsetMap32;
    0x0133, sstFileIndex;
    0x0134, sstStaticSym;
}

#[test]
fn tables_are_sorted() {
    assert!(SYM_NAMES.windows(2).all(|w| w[0].0 < w[1].0));
    assert!(LEAF_NAMES.windows(2).all(|w| w[0].0 < w[1].0));
    assert!(SST_NAMES.windows(2).all(|w| w[0].0 < w[1].0));
}

#[test]
fn debug_names() {
    assert_eq!(format!("{:?}", SymKind::S_GPROC32), "S_GPROC32");
    assert_eq!(format!("{:?}", SymKind(0x7777)), "??SymKind(0x7777)");
    assert_eq!(format!("{:?}", SstKind::sstSrcModule), "sstSrcModule");
    assert_eq!(Leaf::LF_STRUCTURE.name(), Some("LF_STRUCTURE"));
}
