//! The exception directory (`.pdata`) and the unwind data (`.xdata`) it points at.
//!
//! The layout of both depends on the machine. x64 unwind codes are decoded into operations;
//! ARM and ARM64 unwind codes are split into instructions but left as bytes.

use super::RvaMap;
use crate::DirectoryEntry;
use crate::error::{LocalError, LocalResult, isolate};
use imgdump_coff::*;
use std::fmt;
use std::mem::size_of;

/// Names of the x64 integer registers, by unwind register number.
pub const X64_REGISTERS: [&str; 16] = [
    "rax", "rcx", "rdx", "rbx", "rsp", "rbp", "rsi", "rdi", "r8", "r9", "r10", "r11", "r12",
    "r13", "r14", "r15",
];

/// The function table, by machine.
pub enum Exceptions {
    #[allow(missing_docs)]
    X64(Vec<X64Function>),
    #[allow(missing_docs)]
    Arm64(Vec<ArmFunction>),
    /// 32-bit ARM (Thumb-2).
    ArmNt(Vec<ArmFunction>),
    /// The directory is present but its layout for this machine is not known.
    Unsupported(IMAGE_FILE_MACHINE),
}

/// An x64 runtime function entry.
pub struct X64Function {
    #[allow(missing_docs)]
    pub begin: u32,
    #[allow(missing_docs)]
    pub end: u32,
    /// RVA of the unwind data, with bit 0 still in place.
    pub unwind_rva: u32,
    #[allow(missing_docs)]
    pub unwind: LocalResult<X64Unwind>,
}

#[allow(missing_docs)]
pub enum X64Unwind {
    Info(UnwindInfo),
    /// The entry shares the unwind data of another function entry.
    Indirect { begin: u32, end: u32 },
}

/// `UNWIND_INFO`.
pub struct UnwindInfo {
    #[allow(missing_docs)]
    pub version: u8,
    /// `UNW_FLAG_*`
    pub flags: u8,
    #[allow(missing_docs)]
    pub prolog_size: u8,
    /// Zero if no frame register is used.
    pub frame_register: u8,
    /// Scaled by 16.
    pub frame_offset: u32,
    #[allow(missing_docs)]
    pub ops: Vec<UnwindOp>,
    /// Version 2 epilogs: the size of each epilog and the ranges they occupy.
    pub epilogs: Option<Epilogs>,
    #[allow(missing_docs)]
    pub chained: Option<(u32, u32)>,
    #[allow(missing_docs)]
    pub handler: Option<Handler>,
}

#[allow(missing_docs)]
pub struct Epilogs {
    pub size: u8,
    pub ranges: Vec<(u32, u32)>,
}

/// A language-specific handler and the RVA of the data that follows it.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Handler {
    #[allow(missing_docs)]
    pub rva: u32,
    #[allow(missing_docs)]
    pub data_rva: u32,
}

/// One x64 unwind operation. `offset` is the prolog offset it applies at.
#[derive(Clone, Debug, Eq, PartialEq)]
#[allow(missing_docs)]
pub enum UnwindOp {
    PushNonVol { offset: u8, reg: u8 },
    Alloc { offset: u8, size: u32 },
    SetFpReg { offset: u8, reg: u8, frame_offset: u32 },
    SaveNonVol { offset: u8, reg: u8, at: u32 },
    SaveXmm128 { offset: u8, reg: u8, at: u32 },
    PushMachFrame { offset: u8, error_code: bool },
    Unknown { offset: u8, code: u8 },
}

impl UnwindOp {
    /// The prolog offset of the operation.
    pub fn offset(&self) -> u8 {
        match *self {
            Self::PushNonVol { offset, .. }
            | Self::Alloc { offset, .. }
            | Self::SetFpReg { offset, .. }
            | Self::SaveNonVol { offset, .. }
            | Self::SaveXmm128 { offset, .. }
            | Self::PushMachFrame { offset, .. }
            | Self::Unknown { offset, .. } => offset,
        }
    }
}

fn reg(r: u8) -> &'static str {
    X64_REGISTERS[(r & 0xf) as usize]
}

impl fmt::Display for UnwindOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Self::PushNonVol { reg: r, .. } => write!(f, "push %{}", reg(r)),
            Self::Alloc { size, .. } => write!(f, "sub $0x{size:x},%rsp"),
            Self::SetFpReg {
                reg: r,
                frame_offset,
                ..
            } => write!(f, "lea 0x{frame_offset:x}(%rsp),%{}", reg(r)),
            Self::SaveNonVol { reg: r, at, .. } => write!(f, "mov %{},0x{at:x}(%rsp)", reg(r)),
            Self::SaveXmm128 { reg: r, at, .. } => write!(f, "movaps %xmm{r},0x{at:x}(%rsp)"),
            Self::PushMachFrame { error_code, .. } => {
                write!(f, "push machine frame{}", if error_code { " with error code" } else { "" })
            }
            Self::Unknown { code, .. } => write!(f, "unknown code {code}"),
        }
    }
}

/// An ARM or ARM64 runtime function entry.
pub struct ArmFunction {
    /// For ARM, bit 0 is the Thumb bit and is cleared here.
    pub begin: u32,
    /// The raw second word: packed unwind data or an `.xdata` RVA.
    pub unwind_data: u32,
    #[allow(missing_docs)]
    pub unwind: LocalResult<ArmUnwind>,
}

#[allow(missing_docs)]
pub enum ArmUnwind {
    /// ARM64 packed unwind data. Lengths are in bytes.
    PackedArm64 {
        flag: u8,
        function_length: u32,
        reg_f: u8,
        reg_i: u8,
        homes_params: bool,
        cr: u8,
        frame_size: u32,
    },
    /// ARM packed unwind data. Lengths are in bytes.
    PackedArmNt {
        flag: u8,
        function_length: u32,
        ret: u8,
        homes_params: bool,
        reg: u8,
        r: bool,
        l: bool,
        c: bool,
        stack_adjust: u16,
    },
    /// The entry forwards to the entry of a parent function.
    Forwarded { parent: LocalResult<u32> },
    XData(XData),
}

/// An `.xdata` record.
pub struct XData {
    #[allow(missing_docs)]
    pub rva: u32,
    /// In bytes.
    pub function_length: u32,
    #[allow(missing_docs)]
    pub version: u8,
    /// An exception handler follows the unwind codes.
    pub x: bool,
    /// A single epilog shares the prolog's codes; `single_epilog` is its code index.
    pub e: bool,
    /// ARM only: the function is a fragment with no prolog.
    pub f: bool,
    #[allow(missing_docs)]
    pub single_epilog: Option<u32>,
    #[allow(missing_docs)]
    pub epilogs: Vec<EpilogScope>,
    /// The unwind codes, one instruction per entry. The position is the byte index.
    pub codes: Vec<(u32, Vec<u8>)>,
    #[allow(missing_docs)]
    pub handler: Option<Handler>,
}

/// An epilog scope of an `.xdata` record.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct EpilogScope {
    /// RVA of the first instruction.
    pub start: u32,
    /// Index of the first unwind code.
    pub index: u32,
    /// ARM only: the condition the epilog runs under.
    pub condition: Option<u8>,
}

pub(crate) fn decode(
    map: &RvaMap<'_>,
    d: DirectoryEntry,
    machine: IMAGE_FILE_MACHINE,
) -> LocalResult<Exceptions> {
    let c = map.cursor(d.offset, d.length, "exception directory")?;
    Ok(match machine {
        IMAGE_FILE_MACHINE::IMAGE_FILE_MACHINE_AMD64 => {
            let n = c.len() / size_of::<IMAGE_RUNTIME_FUNCTION_ENTRY>();
            let entries: &[IMAGE_RUNTIME_FUNCTION_ENTRY] = c.clone().slice(n)?;
            tracing::debug!(functions = n, "x64 exception directory");
            Exceptions::X64(entries.iter().map(|e| decode_x64_function(map, e)).collect())
        }
        IMAGE_FILE_MACHINE::IMAGE_FILE_MACHINE_ARM64 | IMAGE_FILE_MACHINE::IMAGE_FILE_MACHINE_ARMNT => {
            let arm64 = machine == IMAGE_FILE_MACHINE::IMAGE_FILE_MACHINE_ARM64;
            let n = c.len() / size_of::<IMAGE_ARM_RUNTIME_FUNCTION_ENTRY>();
            let entries: &[IMAGE_ARM_RUNTIME_FUNCTION_ENTRY] = c.clone().slice(n)?;
            tracing::debug!(functions = n, arm64, "ARM exception directory");
            let functions = entries
                .iter()
                .map(|e| decode_arm_function(map, e, arm64))
                .collect();
            if arm64 {
                Exceptions::Arm64(functions)
            } else {
                Exceptions::ArmNt(functions)
            }
        }
        _ => Exceptions::Unsupported(machine),
    })
}

fn decode_x64_function(map: &RvaMap<'_>, e: &IMAGE_RUNTIME_FUNCTION_ENTRY) -> X64Function {
    let unwind_rva = e.unwind_data.get();
    let unwind = isolate("unwind info", || {
        if unwind_rva & 1 != 0 {
            let mut c = map.cursor(unwind_rva & !1, 12, "runtime function")?;
            let next: &IMAGE_RUNTIME_FUNCTION_ENTRY = c.get()?;
            Ok(X64Unwind::Indirect {
                begin: next.begin_address.get(),
                end: next.end_address.get(),
            })
        } else {
            decode_unwind_info(map, unwind_rva, e.end_address.get()).map(X64Unwind::Info)
        }
    });
    X64Function {
        begin: e.begin_address.get(),
        end: e.end_address.get(),
        unwind_rva,
        unwind,
    }
}

fn decode_unwind_info(map: &RvaMap<'_>, rva: u32, function_end: u32) -> LocalResult<UnwindInfo> {
    let mut c = map.cursor(rva, 4, "unwind info")?;
    let b0 = c.u8()?;
    let version = b0 & 7;
    let flags = b0 >> 3;
    let prolog_size = c.u8()?;
    let count = c.u8()?;
    let frame = c.u8()?;
    if version > 2 {
        return Err(LocalError::invalid("unwind info version"));
    }

    // The code slots are padded to an even count.
    let slots_len = ((count as u32 + 1) & !1) * 2;
    let mut c = map.cursor(rva + 4, slots_len, "unwind codes")?;
    let mut slots = Vec::with_capacity(count as usize);
    for _ in 0..count {
        slots.push(c.u16()?);
    }

    let frame_register = frame & 0xf;
    let frame_offset = (frame >> 4) as u32 * 16;
    let ops = decode_unwind_ops(&slots, version, frame_register, frame_offset)?;

    let epilogs = if version == 2 {
        decode_epilogs(&slots, function_end)
    } else {
        None
    };

    let tail = rva + 4 + slots_len;
    let mut chained = None;
    let mut handler = None;
    if flags & UNW_FLAG_CHAININFO != 0 {
        let mut c = map.cursor(tail, 12, "chained function")?;
        let chain: &IMAGE_RUNTIME_FUNCTION_ENTRY = c.get()?;
        chained = Some((chain.begin_address.get(), chain.end_address.get()));
    } else if flags & (UNW_FLAG_EHANDLER | UNW_FLAG_UHANDLER) != 0 {
        handler = Some(Handler {
            rva: map.u32(tail)?,
            data_rva: tail + 4,
        });
    }

    Ok(UnwindInfo {
        version,
        flags,
        prolog_size,
        frame_register,
        frame_offset,
        ops,
        epilogs,
        chained,
        handler,
    })
}

fn decode_unwind_ops(
    slots: &[u16],
    version: u8,
    frame_register: u8,
    frame_offset: u32,
) -> LocalResult<Vec<UnwindOp>> {
    let operand = |i: usize| -> LocalResult<u32> {
        slots
            .get(i)
            .map(|&s| s as u32)
            .ok_or(LocalError::overrun("unwind code operands"))
    };
    let operand32 = |i: usize| -> LocalResult<u32> { Ok(operand(i)? | (operand(i + 1)? << 16)) };

    let mut ops = Vec::new();
    let mut i = 0;
    while i < slots.len() {
        let offset = slots[i] as u8;
        let code = (slots[i] >> 8) as u8 & 0xf;
        let info = (slots[i] >> 12) as u8;
        i += 1;
        let op = match code {
            UWOP_PUSH_NONVOL => UnwindOp::PushNonVol { offset, reg: info },
            UWOP_ALLOC_LARGE if info == 0 => {
                i += 1;
                UnwindOp::Alloc { offset, size: operand(i - 1)? * 8 }
            }
            UWOP_ALLOC_LARGE => {
                i += 2;
                UnwindOp::Alloc { offset, size: operand32(i - 2)? }
            }
            UWOP_ALLOC_SMALL => UnwindOp::Alloc { offset, size: (info as u32 + 1) * 8 },
            UWOP_SET_FPREG => UnwindOp::SetFpReg {
                offset,
                reg: frame_register,
                frame_offset,
            },
            UWOP_SAVE_NONVOL => {
                i += 1;
                UnwindOp::SaveNonVol { offset, reg: info, at: operand(i - 1)? * 8 }
            }
            UWOP_SAVE_NONVOL_FAR => {
                i += 2;
                UnwindOp::SaveNonVol { offset, reg: info, at: operand32(i - 2)? }
            }
            // Epilog descriptors are decoded separately.
            UWOP_EPILOG if version == 2 => continue,
            UWOP_SAVE_XMM128 => {
                i += 1;
                UnwindOp::SaveXmm128 { offset, reg: info, at: operand(i - 1)? * 16 }
            }
            UWOP_SAVE_XMM128_FAR => {
                i += 2;
                UnwindOp::SaveXmm128 { offset, reg: info, at: operand32(i - 2)? }
            }
            UWOP_PUSH_MACHFRAME => UnwindOp::PushMachFrame {
                offset,
                error_code: info != 0,
            },
            _ => UnwindOp::Unknown { offset, code },
        };
        ops.push(op);
    }
    Ok(ops)
}

/// Version 2 unwind info starts with epilog descriptors. The first gives the epilog size and,
/// if its low info bit is set, says that an epilog ends the function. The rest give offsets
/// back from the end of the function.
fn decode_epilogs(slots: &[u16], function_end: u32) -> Option<Epilogs> {
    let first = *slots.first()?;
    if (first >> 8) as u8 & 0xf != UWOP_EPILOG {
        return None;
    }
    let size = first as u8;
    let mut ranges = Vec::new();
    if (first >> 12) & 1 != 0 {
        ranges.push((function_end.wrapping_sub(size as u32), function_end));
    }
    for &slot in slots[1..].iter() {
        if (slot >> 8) as u8 & 0xf != UWOP_EPILOG {
            break;
        }
        let back = (((slot >> 12) as u32) << 8) | (slot & 0xff) as u32;
        if back == 0 {
            break;
        }
        let start = function_end.wrapping_sub(back);
        ranges.push((start, start.wrapping_add(size as u32)));
    }
    Some(Epilogs { size, ranges })
}

fn bits(value: u32, shift: u32, width: u32) -> u32 {
    (value >> shift) & ((1 << width) - 1)
}

fn decode_arm_function(
    map: &RvaMap<'_>,
    e: &IMAGE_ARM_RUNTIME_FUNCTION_ENTRY,
    arm64: bool,
) -> ArmFunction {
    let begin = if arm64 {
        e.begin_address.get()
    } else {
        e.begin_address.get() & !1
    };
    let w = e.unwind_data.get();
    let flag = bits(w, 0, 2) as u8;

    let unwind = isolate("unwind data", || match flag {
        0 => decode_xdata(map, w, begin, arm64).map(ArmUnwind::XData),
        3 if arm64 => Ok(ArmUnwind::Forwarded {
            parent: map.u32(w & !3),
        }),
        3 => Err(LocalError::invalid("reserved unwind flag")),
        _ if arm64 => Ok(ArmUnwind::PackedArm64 {
            flag,
            function_length: bits(w, 2, 11) * 4,
            reg_f: bits(w, 13, 3) as u8,
            reg_i: bits(w, 16, 4) as u8,
            homes_params: bits(w, 20, 1) != 0,
            cr: bits(w, 21, 2) as u8,
            frame_size: bits(w, 23, 9) * 16,
        }),
        _ => Ok(ArmUnwind::PackedArmNt {
            flag,
            function_length: bits(w, 2, 11) * 2,
            ret: bits(w, 13, 2) as u8,
            homes_params: bits(w, 15, 1) != 0,
            reg: bits(w, 16, 3) as u8,
            r: bits(w, 19, 1) != 0,
            l: bits(w, 20, 1) != 0,
            c: bits(w, 21, 1) != 0,
            stack_adjust: bits(w, 22, 10) as u16,
        }),
    });

    ArmFunction {
        begin,
        unwind_data: w,
        unwind,
    }
}

fn decode_xdata(map: &RvaMap<'_>, rva: u32, begin: u32, arm64: bool) -> LocalResult<XData> {
    let header = map.u32(rva)?;
    let mut next = rva + 4;

    let scale = if arm64 { 4 } else { 2 };
    let function_length = bits(header, 0, 18) * scale;
    let version = bits(header, 18, 2) as u8;
    let x = bits(header, 20, 1) != 0;
    let e = bits(header, 21, 1) != 0;
    let (f, mut epilog_count, mut code_words) = if arm64 {
        (false, bits(header, 22, 5), bits(header, 27, 5))
    } else {
        (bits(header, 22, 1) != 0, bits(header, 23, 5), bits(header, 28, 4))
    };

    if epilog_count == 0 && code_words == 0 {
        let ext = map.u32(next)?;
        next += 4;
        epilog_count = bits(ext, 0, 16);
        code_words = bits(ext, 16, 8);
    }

    let mut single_epilog = None;
    let mut epilogs = Vec::new();
    if e {
        single_epilog = Some(epilog_count);
    } else {
        let mut c = map.cursor(next, epilog_count * 4, "epilog scopes")?;
        next += epilog_count * 4;
        for _ in 0..epilog_count {
            let s = c.u32()?;
            epilogs.push(if arm64 {
                EpilogScope {
                    start: begin.wrapping_add(bits(s, 0, 18) * 4),
                    index: bits(s, 22, 10),
                    condition: None,
                }
            } else {
                EpilogScope {
                    start: begin.wrapping_add(bits(s, 0, 18) * 2),
                    index: bits(s, 24, 8),
                    condition: Some(bits(s, 20, 4) as u8),
                }
            });
        }
    }

    let mut c = map.cursor(next, code_words * 4, "unwind codes")?;
    next += code_words * 4;
    let codes = split_codes(c.take_rest(), arm64);

    let handler = if x {
        Some(Handler {
            rva: map.u32(next)?,
            data_rva: next + 4,
        })
    } else {
        None
    };

    Ok(XData {
        rva,
        function_length,
        version,
        x,
        e,
        f,
        single_epilog,
        epilogs,
        codes,
        handler,
    })
}

/// Length in bytes of the unwind code that starts with `b`.
fn code_length(b: u8, arm64: bool) -> usize {
    if arm64 {
        match b {
            0xc0..=0xdf | 0xe2 => 2,
            0xe0 => 4,
            0xe7 => 3,
            _ => 1,
        }
    } else {
        match b {
            0x80..=0xbf | 0xe8..=0xf6 => 2,
            0xf7 | 0xf9 => 3,
            0xf8 | 0xfa => 4,
            _ => 1,
        }
    }
}

/// Splits unwind code bytes into instructions. A truncated last instruction keeps the bytes
/// that are there.
fn split_codes(bytes: &[u8], arm64: bool) -> Vec<(u32, Vec<u8>)> {
    let mut codes = Vec::new();
    let mut pos = 0;
    while pos < bytes.len() {
        let len = code_length(bytes[pos], arm64).min(bytes.len() - pos);
        codes.push((pos as u32, bytes[pos..pos + len].to_vec()));
        pos += len;
    }
    codes
}
