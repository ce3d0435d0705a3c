//! Enhanced metafiles.
//!
//! An EMF file is a sequence of `{ type u32, size u32, payload }` records. The first is always
//! `EMR_HEADER`, which carries the picture bounds and the record count.

use crate::error::{LocalError, LocalResult, isolate};
use crate::view::ImageView;
use anyhow::{Context, bail};
use widestring::U16String;
use zerocopy::{LE, U16, U32};
use zerocopy_derive::*;

/// Record type of the first record.
pub const EMR_HEADER: u32 = 1;
/// Record type of the last record.
pub const EMR_EOF: u32 = 14;

#[allow(missing_docs)]
#[repr(C)]
#[derive(Clone, Debug, Eq, PartialEq, FromBytes, Immutable, KnownLayout, Unaligned)]
pub struct RectL {
    pub left: U32<LE>,
    pub top: U32<LE>,
    pub right: U32<LE>,
    pub bottom: U32<LE>,
}

impl RectL {
    /// The fields as signed values `(left, top, right, bottom)`.
    pub fn signed(&self) -> (i32, i32, i32, i32) {
        (
            self.left.get() as i32,
            self.top.get() as i32,
            self.right.get() as i32,
            self.bottom.get() as i32,
        )
    }
}

/// `ENHMETAHEADER`, up to the pixel-format fields.
#[allow(missing_docs)]
#[repr(C)]
#[derive(Clone, Debug, Eq, PartialEq, FromBytes, Immutable, KnownLayout, Unaligned)]
pub struct ENHMETAHEADER {
    pub itype: U32<LE>,
    pub nsize: U32<LE>,
    pub bounds: RectL,
    pub frame: RectL,
    pub signature: U32<LE>,
    pub version: U32<LE>,
    pub nbytes: U32<LE>,
    pub nrecords: U32<LE>,
    pub nhandles: U16<LE>,
    pub reserved: U16<LE>,
    pub ndescription: U32<LE>,
    pub offdescription: U32<LE>,
    pub npalentries: U32<LE>,
    pub device_width: U32<LE>,
    pub device_height: U32<LE>,
    pub millimeters_width: U32<LE>,
    pub millimeters_height: U32<LE>,
}

static_assertions::const_assert_eq!(core::mem::size_of::<ENHMETAHEADER>(), 88);

/// A decoded metafile.
pub struct Metafile<'a> {
    #[allow(missing_docs)]
    pub header: &'a ENHMETAHEADER,
    /// The description string: application name, then picture name, NUL-separated.
    pub description: Option<LocalResult<Vec<String>>>,
    #[allow(missing_docs)]
    pub records: Vec<EmfRecord>,
    /// Set if the record walk stopped early.
    pub error: Option<LocalError>,
}

/// One record of the metafile.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EmfRecord {
    /// File offset of the record.
    pub offset: usize,
    #[allow(missing_docs)]
    pub kind: u32,
    #[allow(missing_docs)]
    pub size: u32,
}

impl EmfRecord {
    #[allow(missing_docs)]
    pub fn name(&self) -> Option<&'static str> {
        record_name(self.kind)
    }
}

#[allow(missing_docs)]
pub fn decode(view: &ImageView) -> anyhow::Result<Metafile<'_>> {
    let header: &ENHMETAHEADER = view.get(0).context("the metafile header is truncated")?;
    if header.itype.get() != EMR_HEADER {
        bail!("the first record is not a metafile header");
    }

    let description = (header.ndescription.get() != 0).then(|| {
        isolate("metafile description", || {
            let mut c = view
                .cursor_at(
                    header.offdescription.get() as usize,
                    (header.ndescription.get() as usize).saturating_mul(2),
                )
                .ok_or(LocalError::overrun("description"))?;
            let s: U16String = c.utf16(header.ndescription.get() as usize)?;
            Ok(s.to_string_lossy()
                .split('\0')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect())
        })
    });

    let mut records = Vec::new();
    let mut error = None;
    let mut offset = 0usize;
    loop {
        let (Some(kind), Some(size)) = (view.u32_at(offset), view.u32_at(offset + 4)) else {
            error = Some(LocalError::OutOfBounds);
            break;
        };
        if size < 8 || size % 4 != 0 {
            tracing::warn!(offset, size, "bad metafile record size");
            error = Some(LocalError::invalid("record size"));
            break;
        }
        if view.read(offset, size as usize).is_none() {
            error = Some(LocalError::overrun("metafile record"));
            break;
        }
        tracing::trace!(offset, kind, size, "metafile record");
        records.push(EmfRecord { offset, kind, size });
        if kind == EMR_EOF {
            break;
        }
        offset += size as usize;
    }

    if let Some(e) = &error {
        tracing::warn!("metafile records: {e}");
    }

    Ok(Metafile {
        header,
        description,
        records,
        error,
    })
}

macro_rules! emr_names {
    ($($code:expr, $name:ident;)*) => {
        static EMR_NAMES: &[(u32, &str)] = &[
            $(($code, stringify!($name)),)*
        ];
    }
}

emr_names! {
    1, EMR_HEADER;
    2, EMR_POLYBEZIER;
    3, EMR_POLYGON;
    4, EMR_POLYLINE;
    5, EMR_POLYBEZIERTO;
    6, EMR_POLYLINETO;
    7, EMR_POLYPOLYLINE;
    8, EMR_POLYPOLYGON;
    9, EMR_SETWINDOWEXTEX;
    10, EMR_SETWINDOWORGEX;
    11, EMR_SETVIEWPORTEXTEX;
    12, EMR_SETVIEWPORTORGEX;
    13, EMR_SETBRUSHORGEX;
    14, EMR_EOF;
    15, EMR_SETPIXELV;
    16, EMR_SETMAPPERFLAGS;
    17, EMR_SETMAPMODE;
    18, EMR_SETBKMODE;
    19, EMR_SETPOLYFILLMODE;
    20, EMR_SETROP2;
    21, EMR_SETSTRETCHBLTMODE;
    22, EMR_SETTEXTALIGN;
    23, EMR_SETCOLORADJUSTMENT;
    24, EMR_SETTEXTCOLOR;
    25, EMR_SETBKCOLOR;
    26, EMR_OFFSETCLIPRGN;
    27, EMR_MOVETOEX;
    28, EMR_SETMETARGN;
    29, EMR_EXCLUDECLIPRECT;
    30, EMR_INTERSECTCLIPRECT;
    31, EMR_SCALEVIEWPORTEXTEX;
    32, EMR_SCALEWINDOWEXTEX;
    33, EMR_SAVEDC;
    34, EMR_RESTOREDC;
    35, EMR_SETWORLDTRANSFORM;
    36, EMR_MODIFYWORLDTRANSFORM;
    37, EMR_SELECTOBJECT;
    38, EMR_CREATEPEN;
    39, EMR_CREATEBRUSHINDIRECT;
    40, EMR_DELETEOBJECT;
    41, EMR_ANGLEARC;
    42, EMR_ELLIPSE;
    43, EMR_RECTANGLE;
    44, EMR_ROUNDRECT;
    45, EMR_ARC;
    46, EMR_CHORD;
    47, EMR_PIE;
    48, EMR_SELECTPALETTE;
    49, EMR_CREATEPALETTE;
    50, EMR_SETPALETTEENTRIES;
    51, EMR_RESIZEPALETTE;
    52, EMR_REALIZEPALETTE;
    53, EMR_EXTFLOODFILL;
    54, EMR_LINETO;
    55, EMR_ARCTO;
    56, EMR_POLYDRAW;
    57, EMR_SETARCDIRECTION;
    58, EMR_SETMITERLIMIT;
    59, EMR_BEGINPATH;
    60, EMR_ENDPATH;
    61, EMR_CLOSEFIGURE;
    62, EMR_FILLPATH;
    63, EMR_STROKEANDFILLPATH;
    64, EMR_STROKEPATH;
    65, EMR_FLATTENPATH;
    66, EMR_WIDENPATH;
    67, EMR_SELECTCLIPPATH;
    68, EMR_ABORTPATH;
    70, EMR_GDICOMMENT;
    71, EMR_FILLRGN;
    72, EMR_FRAMERGN;
    73, EMR_INVERTRGN;
    74, EMR_PAINTRGN;
    75, EMR_EXTSELECTCLIPRGN;
    76, EMR_BITBLT;
    77, EMR_STRETCHBLT;
    78, EMR_MASKBLT;
    79, EMR_PLGBLT;
    80, EMR_SETDIBITSTODEVICE;
    81, EMR_STRETCHDIBITS;
    82, EMR_EXTCREATEFONTINDIRECTW;
    83, EMR_EXTTEXTOUTA;
    84, EMR_EXTTEXTOUTW;
    85, EMR_POLYBEZIER16;
    86, EMR_POLYGON16;
    87, EMR_POLYLINE16;
    88, EMR_POLYBEZIERTO16;
    89, EMR_POLYLINETO16;
    90, EMR_POLYPOLYLINE16;
    91, EMR_POLYPOLYGON16;
    92, EMR_POLYDRAW16;
    93, EMR_CREATEMONOBRUSH;
    94, EMR_CREATEDIBPATTERNBRUSHPT;
    95, EMR_EXTCREATEPEN;
    96, EMR_POLYTEXTOUTA;
    97, EMR_POLYTEXTOUTW;
    98, EMR_SETICMMODE;
    99, EMR_CREATECOLORSPACE;
    100, EMR_SETCOLORSPACE;
    101, EMR_DELETECOLORSPACE;
    102, EMR_GLSRECORD;
    103, EMR_GLSBOUNDEDRECORD;
    104, EMR_PIXELFORMAT;
    105, EMR_DRAWESCAPE;
    106, EMR_EXTESCAPE;
    108, EMR_SMALLTEXTOUT;
    109, EMR_FORCEUFIMAPPING;
    110, EMR_NAMEDESCAPE;
    111, EMR_COLORCORRECTPALETTE;
    112, EMR_SETICMPROFILEA;
    113, EMR_SETICMPROFILEW;
    114, EMR_ALPHABLEND;
    115, EMR_SETLAYOUT;
    116, EMR_TRANSPARENTBLT;
    118, EMR_GRADIENTFILL;
    119, EMR_SETLINKEDUFIS;
    120, EMR_SETTEXTJUSTIFICATION;
    121, EMR_COLORMATCHTOTARGETW;
    122, EMR_CREATECOLORSPACEW;
}

/// The `EMR_*` name of a record type.
pub fn record_name(kind: u32) -> Option<&'static str> {
    EMR_NAMES
        .binary_search_by_key(&kind, |&(k, _)| k)
        .ok()
        .map(|i| EMR_NAMES[i].1)
}
