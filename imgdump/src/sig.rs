//! Identifies the kind of an input file from its magic numbers and dispatches to its decoder.

use crate::view::ImageView;
use crate::{dbg, dos, emf, hive, le, minidump, ne, pe, tlb};
use imgdump_coff::{
    IMAGE_DOS_SIGNATURE, IMAGE_NT_SIGNATURE, IMAGE_OS2_SIGNATURE, IMAGE_SEPARATE_DEBUG_SIGNATURE,
    IMAGE_VXD_SIGNATURE,
};
use std::fmt;

pub use crate::minidump::MINIDUMP_SIGNATURE;
/// `MSFT`
pub const MSFT_SIGNATURE: u32 = 0x5446_534d;
/// `SLTG`
pub const SLTG_SIGNATURE: u32 = 0x4754_4c53;
pub use crate::hive::REGF_SIGNATURE;
/// `" EMF"`, found at offset 40 of the header record.
pub const ENHMETA_SIGNATURE: u32 = 0x464d_4520;

/// Offset of `e_lfanew` within the DOS header.
const E_LFANEW_OFFSET: usize = 0x3c;

/// The kinds of input this crate can decode. Exactly one is assigned to each input.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum FormatKind {
    /// A DOS executable with no recognized new-style header.
    Dos,
    /// A Portable Executable (PE32 or PE32+).
    Pe,
    /// A segmented 16-bit executable.
    Ne,
    /// A linear executable, usually a VxD.
    Le,
    /// A separate debug file (`.dbg`).
    DebugBlob,
    #[allow(missing_docs)]
    Minidump,
    /// A type library in the `MSFT` encoding.
    TypelibMsft,
    /// A type library in the `SLTG` encoding.
    TypelibSltg,
    /// A persisted registry hive.
    RegistryHive,
    /// An enhanced metafile.
    Metafile,
    #[allow(missing_docs)]
    Unknown,
}

impl FormatKind {
    /// A short name for the kind.
    pub fn name(self) -> &'static str {
        match self {
            Self::Dos => "DOS",
            Self::Pe => "PE",
            Self::Ne => "NE",
            Self::Le => "LE",
            Self::DebugBlob => "DBG",
            Self::Minidump => "MDMP",
            Self::TypelibMsft => "MSFT",
            Self::TypelibSltg => "SLTG",
            Self::RegistryHive => "REGF",
            Self::Metafile => "EMF",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for FormatKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Classifies an input by its signatures. Never decodes anything beyond the signature checks.
pub fn identify(view: &ImageView) -> FormatKind {
    match view.u16_at(0) {
        Some(IMAGE_DOS_SIGNATURE) => return classify_new_header(view),
        Some(IMAGE_SEPARATE_DEBUG_SIGNATURE) => return FormatKind::DebugBlob,
        _ => {}
    }

    match view.u32_at(0) {
        Some(MINIDUMP_SIGNATURE) => return FormatKind::Minidump,
        Some(MSFT_SIGNATURE) => return FormatKind::TypelibMsft,
        Some(SLTG_SIGNATURE) => return FormatKind::TypelibSltg,
        Some(REGF_SIGNATURE) => return FormatKind::RegistryHive,
        _ => {}
    }

    if view.u32_at(0) == Some(emf::EMR_HEADER) && view.u32_at(40) == Some(ENHMETA_SIGNATURE) {
        return FormatKind::Metafile;
    }

    FormatKind::Unknown
}

/// Follows `e_lfanew` to tell a PE, NE or LE image from a plain DOS program.
fn classify_new_header(view: &ImageView) -> FormatKind {
    let Some(lfanew) = view.u32_at(E_LFANEW_OFFSET) else {
        return FormatKind::Dos;
    };
    let lfanew = lfanew as usize;

    if view.u32_at(lfanew) == Some(IMAGE_NT_SIGNATURE) {
        return FormatKind::Pe;
    }

    match view.u16_at(lfanew) {
        Some(IMAGE_OS2_SIGNATURE) => FormatKind::Ne,
        Some(IMAGE_VXD_SIGNATURE) => FormatKind::Le,
        _ => FormatKind::Dos,
    }
}

/// The decoded contents of one input.
pub enum Decoded<'a> {
    #[allow(missing_docs)]
    Dos(dos::DosImage<'a>),
    #[allow(missing_docs)]
    Pe(Box<pe::PeImage<'a>>),
    #[allow(missing_docs)]
    Ne(ne::NeImage<'a>),
    #[allow(missing_docs)]
    Le(le::LeImage<'a>),
    #[allow(missing_docs)]
    Dbg(dbg::DbgFile<'a>),
    #[allow(missing_docs)]
    Minidump(minidump::Minidump<'a>),
    #[allow(missing_docs)]
    Msft(tlb::msft::MsftLibrary),
    #[allow(missing_docs)]
    Sltg(tlb::sltg::SltgLibrary),
    #[allow(missing_docs)]
    Hive(hive::Hive<'a>),
    #[allow(missing_docs)]
    Emf(emf::Metafile<'a>),
}

impl<'a> Decoded<'a> {
    /// The kind of input this came from.
    pub fn kind(&self) -> FormatKind {
        match self {
            Self::Dos(_) => FormatKind::Dos,
            Self::Pe(_) => FormatKind::Pe,
            Self::Ne(_) => FormatKind::Ne,
            Self::Le(_) => FormatKind::Le,
            Self::Dbg(_) => FormatKind::DebugBlob,
            Self::Minidump(_) => FormatKind::Minidump,
            Self::Msft(_) => FormatKind::TypelibMsft,
            Self::Sltg(_) => FormatKind::TypelibSltg,
            Self::Hive(_) => FormatKind::RegistryHive,
            Self::Emf(_) => FormatKind::Metafile,
        }
    }
}

/// Runs the decoder for `kind`.
///
/// Fails if `kind` is [`FormatKind::Unknown`] or if the mandatory header of the format cannot be
/// read. Problems below the mandatory header are recorded inside the returned records.
pub fn decode(view: &ImageView, kind: FormatKind) -> anyhow::Result<Decoded<'_>> {
    tracing::debug!("decoding as {kind}");
    Ok(match kind {
        FormatKind::Dos => Decoded::Dos(dos::decode(view)?),
        FormatKind::Pe => Decoded::Pe(Box::new(pe::decode(view)?)),
        FormatKind::Ne => Decoded::Ne(ne::decode(view)?),
        FormatKind::Le => Decoded::Le(le::decode(view)?),
        FormatKind::DebugBlob => Decoded::Dbg(dbg::decode(view)?),
        FormatKind::Minidump => Decoded::Minidump(minidump::decode(view)?),
        FormatKind::TypelibMsft => Decoded::Msft(tlb::msft::decode(view)?),
        FormatKind::TypelibSltg => Decoded::Sltg(tlb::sltg::decode(view)?),
        FormatKind::RegistryHive => Decoded::Hive(hive::decode(view)?),
        FormatKind::Metafile => Decoded::Emf(emf::decode(view)?),
        FormatKind::Unknown => anyhow::bail!("unrecognized format"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mz_with_new_header(lfanew: u32, tag: &[u8]) -> ImageView {
        let mut bytes = vec![0u8; lfanew as usize + tag.len()];
        bytes[0..2].copy_from_slice(b"MZ");
        bytes[0x3c..0x40].copy_from_slice(&lfanew.to_le_bytes());
        bytes[lfanew as usize..].copy_from_slice(tag);
        ImageView::from_bytes(bytes)
    }

    #[test]
    fn mz_with_pe_header_is_pe() {
        let view = mz_with_new_header(0x80, &[0x50, 0x45, 0x00, 0x00]);
        assert_eq!(identify(&view), FormatKind::Pe);
    }

    #[test]
    fn mz_secondary_signature() {
        assert_eq!(identify(&mz_with_new_header(0x40, b"NE")), FormatKind::Ne);
        assert_eq!(identify(&mz_with_new_header(0x40, b"LE")), FormatKind::Le);
        assert_eq!(identify(&mz_with_new_header(0x40, b"PE\0\x01")), FormatKind::Dos);
        // e_lfanew points outside the file
        assert_eq!(identify(&mz_with_new_header(0x40, b"")), FormatKind::Dos);
        assert_eq!(identify(&ImageView::from_bytes(b"MZ".to_vec())), FormatKind::Dos);
    }

    #[test]
    fn four_byte_magics() {
        let kind = |b: &[u8]| identify(&ImageView::from_bytes(b.to_vec()));
        assert_eq!(kind(b"MSFT\x02\x00\x01\x00"), FormatKind::TypelibMsft);
        assert_eq!(kind(b"SLTG\x01\x00"), FormatKind::TypelibSltg);
        assert_eq!(kind(b"MDMP\x93\xa7"), FormatKind::Minidump);
        assert_eq!(kind(b"regf"), FormatKind::RegistryHive);
        assert_eq!(kind(b"DI\x00\x00"), FormatKind::DebugBlob);
        assert_eq!(kind(b"XXXXXXXX"), FormatKind::Unknown);
        assert_eq!(kind(b"MS"), FormatKind::Unknown);
        assert_eq!(kind(b""), FormatKind::Unknown);
    }

    #[test]
    fn metafile_needs_both_signatures() {
        let mut bytes = vec![0u8; 0x58];
        bytes[0..4].copy_from_slice(&1u32.to_le_bytes());
        assert_eq!(identify(&ImageView::from_bytes(bytes.clone())), FormatKind::Unknown);
        bytes[40..44].copy_from_slice(b" EMF");
        assert_eq!(identify(&ImageView::from_bytes(bytes)), FormatKind::Metafile);
    }

    #[test]
    fn unknown_does_not_decode() {
        let view = ImageView::from_bytes(b"garbage!".to_vec());
        assert!(decode(&view, identify(&view)).is_err());
    }
}
