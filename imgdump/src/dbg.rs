//! Separate debug files (`.dbg`).
//!
//! Layout: `IMAGE_SEPARATE_DEBUG_HEADER`, the section table, the exported-names block (a run of
//! NUL-terminated strings), then the debug directory. The debug entries point at their data by
//! file offset, just as they do in a PE image.

use crate::error::{LocalError, LocalResult, isolate};
use crate::pe::{DebugEntry, debug::decode_entries};
use crate::view::ImageView;
use anyhow::{Context, bail};
use bstr::BStr;
use imgdump_coff::*;
use std::mem::size_of;

/// A decoded `.dbg` file.
pub struct DbgFile<'a> {
    #[allow(missing_docs)]
    pub header: &'a IMAGE_SEPARATE_DEBUG_HEADER,
    #[allow(missing_docs)]
    pub sections: LocalResult<&'a [IMAGE_SECTION_HEADER]>,
    #[allow(missing_docs)]
    pub exported_names: LocalResult<Vec<&'a BStr>>,
    #[allow(missing_docs)]
    pub debug: LocalResult<Vec<DebugEntry<'a>>>,
}

impl DbgFile<'_> {
    #[allow(missing_docs)]
    pub fn machine(&self) -> IMAGE_FILE_MACHINE {
        IMAGE_FILE_MACHINE(self.header.machine.get())
    }
}

#[allow(missing_docs)]
pub fn decode(view: &ImageView) -> anyhow::Result<DbgFile<'_>> {
    let header: &IMAGE_SEPARATE_DEBUG_HEADER =
        view.get(0).context("the debug file header is truncated")?;
    if header.signature.get() != IMAGE_SEPARATE_DEBUG_SIGNATURE {
        bail!("not a separate debug file");
    }

    let nsections = header.number_of_sections.get() as usize;
    let sections_offset = size_of::<IMAGE_SEPARATE_DEBUG_HEADER>();
    let names_offset =
        sections_offset.saturating_add(nsections.saturating_mul(size_of::<IMAGE_SECTION_HEADER>()));
    let names_size = header.exported_names_size.get() as usize;
    let debug_offset = names_offset.saturating_add(names_size);

    let sections = isolate("debug file sections", || {
        let mut c = view
            .cursor_from(sections_offset)
            .ok_or(LocalError::OutOfBounds)?;
        c.slice(nsections).map_err(|_| LocalError::overrun("section table"))
    });

    let exported_names = isolate("exported names", || {
        let mut c = view
            .cursor_at(names_offset, names_size)
            .ok_or(LocalError::overrun("exported names"))?;
        let mut names = Vec::new();
        while !c.is_empty() {
            let name = c.strz()?;
            if name.is_empty() {
                break;
            }
            names.push(name);
        }
        Ok(names)
    });

    let debug = isolate("debug directory", || {
        let count = header.debug_directory_size.get() as usize / size_of::<IMAGE_DEBUG_DIRECTORY>();
        let dirs: &[IMAGE_DEBUG_DIRECTORY] = view
            .cursor_from(debug_offset)
            .ok_or(LocalError::OutOfBounds)?
            .slice(count)
            .map_err(|_| LocalError::overrun("debug directory"))?;
        Ok(decode_entries(view, dirs))
    });

    Ok(DbgFile {
        header,
        sections,
        exported_names,
        debug,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pe::DebugInfo;

    fn put(buf: &mut [u8], offset: usize, bytes: &[u8]) {
        buf[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    fn sample() -> Vec<u8> {
        let mut f = vec![0u8; 0x100];
        #[rustfmt::skip]
        let header = [
            /* 0x0000 */ b'D', b'I', 0, 0, 0x4c, 0x01, 0, 0,  // signature, flags, machine, characteristics
            /* 0x0008 */ 0x11, 0x22, 0x33, 0x44,             // time stamp
            /* 0x000c */ 0, 0, 0, 0,                         // checksum
            /* 0x0010 */ 0, 0, 0x40, 0,                      // image base
            /* 0x0014 */ 0, 0x30, 0, 0,                      // size of image
            /* 0x0018 */ 1, 0, 0, 0,                         // one section
            /* 0x001c */ 8, 0, 0, 0,                         // exported names size
            /* 0x0020 */ 28, 0, 0, 0,                        // one debug directory
            /* 0x0024 */ 0, 0x10, 0, 0,                      // section alignment
        ];
        put(&mut f, 0, &header);
        put(&mut f, 0x30, b".text\0\0\0");
        // exported names at 0x30 + 40
        put(&mut f, 0x58, b"_main\0\0\0");
        // debug directory at 0x60: MISC, 0x18 bytes at 0xa0
        #[rustfmt::skip]
        let dir = [
            /* 0x0060 */ 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
            /* 0x006c */ 4, 0, 0, 0,                         // IMAGE_DEBUG_TYPE_MISC
            /* 0x0070 */ 0x18, 0, 0, 0,                      // size of data
            /* 0x0074 */ 0, 0, 0, 0,                         // address of raw data
            /* 0x0078 */ 0xa0, 0, 0, 0,                      // pointer to raw data
        ];
        put(&mut f, 0x60, &dir);
        #[rustfmt::skip]
        let misc = [
            /* 0x00a0 */ 1, 0, 0, 0,                         // exe name
            /* 0x00a4 */ 0x18, 0, 0, 0,                      // length
            /* 0x00a8 */ 0, 0, 0, 0,                         // ANSI
        ];
        put(&mut f, 0xa0, &misc);
        put(&mut f, 0xac, b"hello.exe\0");
        f
    }

    #[test]
    fn dbg_file() {
        let view = ImageView::from_bytes(sample());
        let dbg = decode(&view).unwrap();
        assert_eq!(dbg.header.time_date_stamp.get(), 0x44332211);
        assert_eq!(dbg.machine(), IMAGE_FILE_MACHINE::IMAGE_FILE_MACHINE_I386);

        let sections = dbg.sections.as_ref().unwrap();
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].name(), ".text");

        assert_eq!(dbg.exported_names.as_ref().unwrap(), &vec![BStr::new("_main")]);

        let debug = dbg.debug.as_ref().unwrap();
        assert_eq!(debug.len(), 1);
        match &debug[0].info {
            Ok(DebugInfo::Misc(misc)) => {
                assert_eq!(misc.data_type, IMAGE_DEBUG_MISC_EXENAME);
                assert!(!misc.unicode);
                assert!(matches!(misc.data, crate::pe::debug::MiscData::Ansi(s) if s == "hello.exe"));
            }
            _ => panic!("expected a MISC record"),
        }
    }

    #[test]
    fn bad_debug_pointer_is_local() {
        let mut f = sample();
        // Point the MISC record past the end of the file.
        put(&mut f, 0x78, &[0, 0x10, 0, 0]);
        let view = ImageView::from_bytes(f);
        let dbg = decode(&view).unwrap();
        let debug = dbg.debug.as_ref().unwrap();
        assert!(debug[0].info.is_err());
        assert!(dbg.exported_names.is_ok());
    }

    #[test]
    fn wrong_signature() {
        let mut f = sample();
        f[0] = b'X';
        assert!(decode(&ImageView::from_bytes(f)).is_err());
    }
}
