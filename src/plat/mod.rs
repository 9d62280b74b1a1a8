//! Common platform code: architectural constants and the instruction set.

use std::fmt;

use thiserror::Error;

/// An error for the core platform.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformError {
    #[error("invalid register bank: {0}")]
    InvalidBank(u32),
    #[error("invalid general register: {0}")]
    InvalidRegister(u32),
    #[error("invalid special register: {0}")]
    InvalidSpecialRegister(u32),
}

/// Type alias for Result<T, [PlatformError]>.
pub type PResult<T> = Result<T, PlatformError>;

/// Number of general register banks.
pub const BANK_COUNT: usize = 4;
/// General registers per bank.
pub const GR_COUNT: usize = 32;
/// Special registers.
pub const SR_COUNT: usize = 16;
/// Registers per page; ranged instructions wrap inside one page.
pub const PAGE_SIZE: u8 = 8;
/// Depth of the hardware return stack.
pub const STACK_DEPTH: usize = 3;

pub const NIBBLE_MASK: u8 = 0xF;
pub const PC_MASK: u16 = 0xFFF;
pub const SA_MASK: u16 = 0x7FF;
pub const BSA_MASK: u16 = 0xFFF;

/// Size of the internal (program) region in bytes.
pub const INTERNAL_SIZE: usize = 6 * 1024;
/// Size of the external (data) region in bytes.
pub const EXTERNAL_SIZE: usize = 2 * 1024;

/// Checks a `(bank, index)` pair against the register file dimensions.
pub fn check_gr(bank: u32, index: u32) -> PResult<(usize, usize)> {
    if bank as usize >= BANK_COUNT {
        return Err(PlatformError::InvalidBank(bank));
    }
    if index as usize >= GR_COUNT {
        return Err(PlatformError::InvalidRegister(index));
    }
    Ok((bank as usize, index as usize))
}

/// Checks a special register index.
pub fn check_sr(index: u32) -> PResult<usize> {
    if index as usize >= SR_COUNT {
        return Err(PlatformError::InvalidSpecialRegister(index));
    }
    Ok(index as usize)
}

/// Assembly name of a general register (`RA0`..`RD7`, one letter per page).
pub fn gr_name(index: u8) -> String {
    let page = b'A' + ((index >> 3) & 0x3);
    format!("R{}{}", page as char, index & 0x7)
}

/// Length of a ranged window from register `first` to `last` inside one page (1-8).
pub fn range_len(first: u8, last: u8) -> u8 {
    (last.wrapping_sub(first) & (PAGE_SIZE - 1)) + 1
}

/// A decoded 16-bit instruction word.
///
/// The primary class is `word >> 10`. Register fields are five bits wide (`(word >> 5) & 0x1F`
/// for the destination/first register, `word & 0x1F` for the source/last register), immediates
/// are four bits at `(word >> 1) & 0xF`.
///
/// Ranged forms (`first`, `last`) operate on the circular window `first..=last` inside the
/// 8-register page of `first`; the source page of two-operand ranged forms is the page of `last`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Instruction {
    /* Arithmetic */
    /// `dst <- dst + src`, CF on overflow past 15.
    Add { dst: u8, src: u8 },
    /// `dst <- dst + src` with decimal adjust.
    Adb { dst: u8, src: u8 },
    /// `dst <- dst - src`, ZF and CF (borrow).
    Sub { dst: u8, src: u8 },
    /// `dst <- dst - src` with decimal adjust.
    Sbb { dst: u8, src: u8 },
    Adi { dst: u8, imm: u8 },
    Adbi { dst: u8, imm: u8 },
    Sbi { dst: u8, imm: u8 },
    Sbbi { dst: u8, imm: u8 },
    /// Multi-digit add with carry chained through the window.
    Adm { first: u8, last: u8 },
    Adbm { first: u8, last: u8 },
    Sbm { first: u8, last: u8 },
    Sbbm { first: u8, last: u8 },

    /* Compare */
    Cmp { dst: u8, src: u8 },
    Cpm { first: u8, last: u8 },
    Cpi { dst: u8, imm: u8 },

    /* Banks */
    /// `CB <- bank`
    Lcrb { bank: u8 },
    /// `AB <- bank`
    Larb { bank: u8 },

    /* Logic */
    Andi { dst: u8, imm: u8 },
    Ori { dst: u8, imm: u8 },
    Xori { dst: u8, imm: u8 },

    /* Ranged increment/decrement, `last` is a 3-bit position in the page */
    Inc { first: u8, last: u8 },
    Incb { first: u8, last: u8 },
    Dec { first: u8, last: u8 },
    Decb { first: u8, last: u8 },

    /* Ranged shifts */
    Rshm { first: u8, last: u8 },
    Lshm { first: u8, last: u8 },

    /* I/O */
    /// `dst <- SR[sr]`
    In { dst: u8, sr: u8 },
    /// `SR[sr] <- src`
    Out { sr: u8, src: u8 },
    /// `SR[sr] <- imm`
    Outi { sr: u8, imm: u8 },

    /* Address pointers */
    /// Push the window through the bus latch into SA.
    Psam { first: u8, last: u8 },
    /// Push the window into LA.
    Plam { first: u8, last: u8 },
    /// `SA <- addr`
    Psai { addr: u16 },
    /// `LA <- addr`
    Plai { addr: u8 },

    /* External memory */
    Stsm { first: u8, last: u8 },
    Ldsm { first: u8, last: u8 },

    /* Display */
    Stlm { first: u8, last: u8 },
    /// Display write of `src | 0x30` at LA.
    Stl { src: u8 },
    /// Display write of the next external byte at LA.
    Stls,
    /// Display write of the next external byte at `addr`.
    Stlsa { addr: u8 },
    /// Display write of `value` at LA.
    Stli { value: u8 },
    /// Display write of `value` at address `value`.
    Stlia { value: u8 },

    /* Moves */
    Mov { dst: u8, src: u8 },
    Movm { first: u8, last: u8 },
    Ldi { dst: u8, imm: u8 },
    Clrm { first: u8, last: u8 },
    /// `GR[AB][dst] <- GR[CB][src]`
    Mvac { dst: u8, src: u8 },
    Mvacm { first: u8, last: u8 },
    /// `GR[CB][dst] <- GR[AB][src]`
    Mvca { dst: u8, src: u8 },
    Mvcam { first: u8, last: u8 },

    /* Control flow */
    Call { target: u16 },
    Ret,
    /// Skip `offset` words if `reg == 4`.
    Cpfjr { reg: u8, offset: u8 },
    /// `PC <- PC + reg + 1`
    Ijmr { reg: u8 },
    /// Wait for event.
    Wfe,
    Jmp { target: u16 },
    /// Jumps inside the current 1K block (`target` is 10 bits).
    Jz { target: u16 },
    Jnz { target: u16 },
    Jc { target: u16 },
    Jnc { target: u16 },
    /// Skip `offset` words if bit `bit` of `reg` is set.
    Btjr { reg: u8, bit: u8, offset: u8 },
    /// Skip `offset` words if `reg == value`.
    Cpjr { reg: u8, value: u8, offset: u8 },
}

impl Instruction {
    /// Decodes an instruction word. Every word decodes to some instruction.
    pub fn decode(word: u16) -> Self {
        let d = ((word >> 5) & 0x1F) as u8;
        let s = (word & 0x1F) as u8;
        let imm = ((word >> 1) & 0xF) as u8;
        let l3 = (word & 0x7) as u8;
        let a8 = (((word >> 2) & 0xF8) | (word & 0x7)) as u8;
        let offset = (word & 0x1F) as u8;
        let slot = (word >> 10) as u8;

        match slot {
            0 => Self::Add { dst: d, src: s },
            1 => Self::Adb { dst: d, src: s },
            2 => Self::Sub { dst: d, src: s },
            3 => Self::Sbb { dst: d, src: s },
            4 => Self::Adi { dst: d, imm },
            5 => Self::Adbi { dst: d, imm },
            6 => Self::Sbi { dst: d, imm },
            7 => Self::Sbbi { dst: d, imm },
            8 => Self::Adm { first: d, last: s },
            9 => Self::Adbm { first: d, last: s },
            10 => Self::Sbm { first: d, last: s },
            11 => Self::Sbbm { first: d, last: s },
            12 => Self::Cmp { dst: d, src: s },
            13 => Self::Cpm { first: d, last: s },
            14 => Self::Cpi { dst: d, imm },
            15 => {
                let bank = ((word >> 3) & 0x3) as u8;
                if (word >> 9) & 0x1 == 0 {
                    Self::Lcrb { bank }
                } else {
                    Self::Larb { bank }
                }
            }
            16 => Self::Andi { dst: d, imm },
            17 => Self::Ori { dst: d, imm },
            18 => Self::Xori { dst: d, imm },
            19 => match (word >> 3) & 0x3 {
                0 => Self::Inc { first: d, last: l3 },
                1 => Self::Incb { first: d, last: l3 },
                2 => Self::Dec { first: d, last: l3 },
                _ => Self::Decb { first: d, last: l3 },
            },
            20 => {
                if (word >> 3) & 0x1 == 0 {
                    Self::Rshm { first: d, last: l3 }
                } else {
                    Self::Lshm { first: d, last: l3 }
                }
            }
            21 => Self::In {
                dst: d,
                sr: (word & 0xF) as u8,
            },
            22 => Self::Out {
                sr: (word & 0xF) as u8,
                src: d,
            },
            23 => Self::Outi {
                sr: (word & 0xF) as u8,
                imm: ((word >> 6) & 0xF) as u8,
            },
            24 => {
                if (word >> 4) & 0x1 == 0 {
                    Self::Psam { first: d, last: l3 }
                } else {
                    Self::Plam { first: d, last: l3 }
                }
            }
            25 => {
                if (word >> 3) & 0x1 == 0 {
                    Self::Stsm { first: d, last: l3 }
                } else {
                    Self::Ldsm { first: d, last: l3 }
                }
            }
            26 => Self::Stlm { first: d, last: l3 },
            27 => Self::Stl { src: d },
            28 | 29 => Self::Psai {
                addr: word & 0x7FF,
            },
            30 => Self::Plai { addr: a8 },
            31 => match (word >> 3) & 0x3 {
                0 => Self::Stls,
                1 => Self::Stlsa { addr: a8 },
                2 => Self::Stli { value: a8 },
                _ => Self::Stlia { value: a8 },
            },
            32 => Self::Mov { dst: d, src: s },
            33 => Self::Movm { first: d, last: s },
            34 => Self::Ldi { dst: d, imm },
            35 => Self::Clrm { first: d, last: s },
            36 => Self::Mvac { dst: d, src: s },
            37 => Self::Mvacm { first: d, last: s },
            38 => Self::Mvca { dst: d, src: s },
            39 => Self::Mvcam { first: d, last: s },
            40..=43 => Self::Call {
                target: word & 0xFFF,
            },
            44 => Self::Ret,
            45 => Self::Cpfjr { reg: d, offset },
            46 => Self::Ijmr { reg: d },
            47 => Self::Wfe,
            48..=51 => Self::Jmp {
                target: word & 0xFFF,
            },
            52 => Self::Jz {
                target: word & 0x3FF,
            },
            53 => Self::Jnz {
                target: word & 0x3FF,
            },
            54 => Self::Jc {
                target: word & 0x3FF,
            },
            55 => Self::Jnc {
                target: word & 0x3FF,
            },
            56..=59 => Self::Btjr {
                reg: d,
                bit: slot & 0x3,
                offset,
            },
            _ => Self::Cpjr {
                reg: d,
                value: slot & 0x3,
                offset,
            },
        }
    }

    /// Generates the canonical instruction word for this instruction. Unused bits are zero.
    pub fn encode(self) -> u16 {
        #[doc(hidden)]
        fn rr(slot: u16, d: u8, s: u8) -> u16 {
            (slot << 10) | ((d as u16 & 0x1F) << 5) | (s as u16 & 0x1F)
        }
        #[doc(hidden)]
        fn ri(slot: u16, d: u8, imm: u8) -> u16 {
            (slot << 10) | ((d as u16 & 0x1F) << 5) | ((imm as u16 & 0xF) << 1)
        }
        #[doc(hidden)]
        fn a8(slot: u16, sub: u16, addr: u8) -> u16 {
            (slot << 10) | ((addr as u16 & 0xF8) << 2) | (sub << 3) | (addr as u16 & 0x7)
        }

        match self {
            Self::Add { dst, src } => rr(0, dst, src),
            Self::Adb { dst, src } => rr(1, dst, src),
            Self::Sub { dst, src } => rr(2, dst, src),
            Self::Sbb { dst, src } => rr(3, dst, src),
            Self::Adi { dst, imm } => ri(4, dst, imm),
            Self::Adbi { dst, imm } => ri(5, dst, imm),
            Self::Sbi { dst, imm } => ri(6, dst, imm),
            Self::Sbbi { dst, imm } => ri(7, dst, imm),
            Self::Adm { first, last } => rr(8, first, last),
            Self::Adbm { first, last } => rr(9, first, last),
            Self::Sbm { first, last } => rr(10, first, last),
            Self::Sbbm { first, last } => rr(11, first, last),
            Self::Cmp { dst, src } => rr(12, dst, src),
            Self::Cpm { first, last } => rr(13, first, last),
            Self::Cpi { dst, imm } => ri(14, dst, imm),
            Self::Lcrb { bank } => (15 << 10) | ((bank as u16 & 0x3) << 3),
            Self::Larb { bank } => (15 << 10) | (1 << 9) | ((bank as u16 & 0x3) << 3),
            Self::Andi { dst, imm } => ri(16, dst, imm),
            Self::Ori { dst, imm } => ri(17, dst, imm),
            Self::Xori { dst, imm } => ri(18, dst, imm),
            Self::Inc { first, last } => rr(19, first, last & 0x7),
            Self::Incb { first, last } => rr(19, first, last & 0x7) | (1 << 3),
            Self::Dec { first, last } => rr(19, first, last & 0x7) | (2 << 3),
            Self::Decb { first, last } => rr(19, first, last & 0x7) | (3 << 3),
            Self::Rshm { first, last } => rr(20, first, last & 0x7),
            Self::Lshm { first, last } => rr(20, first, last & 0x7) | (1 << 3),
            Self::In { dst, sr } => rr(21, dst, sr & 0xF),
            Self::Out { sr, src } => rr(22, src, sr & 0xF),
            Self::Outi { sr, imm } => (23 << 10) | ((imm as u16 & 0xF) << 6) | (sr as u16 & 0xF),
            Self::Psam { first, last } => rr(24, first, last & 0x7),
            Self::Plam { first, last } => rr(24, first, last & 0x7) | (1 << 4),
            Self::Stsm { first, last } => rr(25, first, last & 0x7),
            Self::Ldsm { first, last } => rr(25, first, last & 0x7) | (1 << 3),
            Self::Stlm { first, last } => rr(26, first, last & 0x7),
            Self::Stl { src } => rr(27, src, 0),
            Self::Psai { addr } => (28 << 10) | (addr & 0x7FF),
            Self::Plai { addr } => a8(30, 0, addr),
            Self::Stls => 31 << 10,
            Self::Stlsa { addr } => a8(31, 1, addr),
            Self::Stli { value } => a8(31, 2, value),
            Self::Stlia { value } => a8(31, 3, value),
            Self::Mov { dst, src } => rr(32, dst, src),
            Self::Movm { first, last } => rr(33, first, last),
            Self::Ldi { dst, imm } => ri(34, dst, imm),
            Self::Clrm { first, last } => rr(35, first, last),
            Self::Mvac { dst, src } => rr(36, dst, src),
            Self::Mvacm { first, last } => rr(37, first, last),
            Self::Mvca { dst, src } => rr(38, dst, src),
            Self::Mvcam { first, last } => rr(39, first, last),
            Self::Call { target } => (40 << 10) | (target & 0xFFF),
            Self::Ret => 44 << 10,
            Self::Cpfjr { reg, offset } => rr(45, reg, offset),
            Self::Ijmr { reg } => rr(46, reg, 0),
            Self::Wfe => 47 << 10,
            Self::Jmp { target } => (48 << 10) | (target & 0xFFF),
            Self::Jz { target } => (52 << 10) | (target & 0x3FF),
            Self::Jnz { target } => (53 << 10) | (target & 0x3FF),
            Self::Jc { target } => (54 << 10) | (target & 0x3FF),
            Self::Jnc { target } => (55 << 10) | (target & 0x3FF),
            Self::Btjr { reg, bit, offset } => rr(56 + (bit as u16 & 0x3), reg, offset),
            Self::Cpjr { reg, value, offset } => rr(60 + (value as u16 & 0x3), reg, offset),
        }
    }

    /// Whether this is a ranged form, whose cost is the window length rather than one cycle.
    ///
    /// Ranged forms feed the bus latch per touched register; all other forms latch the
    /// register selected by bits 9..5 of the word before executing.
    pub fn is_ranged(self) -> bool {
        matches!(
            self,
            Self::Adm { .. }
                | Self::Adbm { .. }
                | Self::Sbm { .. }
                | Self::Sbbm { .. }
                | Self::Cpm { .. }
                | Self::Inc { .. }
                | Self::Incb { .. }
                | Self::Dec { .. }
                | Self::Decb { .. }
                | Self::Rshm { .. }
                | Self::Lshm { .. }
                | Self::Psam { .. }
                | Self::Plam { .. }
                | Self::Stsm { .. }
                | Self::Ldsm { .. }
                | Self::Stlm { .. }
                | Self::Movm { .. }
                | Self::Clrm { .. }
                | Self::Mvacm { .. }
                | Self::Mvcam { .. }
        )
    }

    /// Lower-case assembly mnemonic.
    pub fn mnemonic(self) -> &'static str {
        match self {
            Self::Add { .. } => "add",
            Self::Adb { .. } => "adb",
            Self::Sub { .. } => "sub",
            Self::Sbb { .. } => "sbb",
            Self::Adi { .. } => "adi",
            Self::Adbi { .. } => "adbi",
            Self::Sbi { .. } => "sbi",
            Self::Sbbi { .. } => "sbbi",
            Self::Adm { .. } => "adm",
            Self::Adbm { .. } => "adbm",
            Self::Sbm { .. } => "sbm",
            Self::Sbbm { .. } => "sbbm",
            Self::Cmp { .. } => "cmp",
            Self::Cpm { .. } => "cpm",
            Self::Cpi { .. } => "cpi",
            Self::Lcrb { .. } => "lcrb",
            Self::Larb { .. } => "larb",
            Self::Andi { .. } => "andi",
            Self::Ori { .. } => "ori",
            Self::Xori { .. } => "xori",
            Self::Inc { .. } => "inc",
            Self::Incb { .. } => "incb",
            Self::Dec { .. } => "dec",
            Self::Decb { .. } => "decb",
            Self::Rshm { .. } => "rshm",
            Self::Lshm { .. } => "lshm",
            Self::In { .. } => "in",
            Self::Out { .. } => "out",
            Self::Outi { .. } => "outi",
            Self::Psam { .. } => "psam",
            Self::Plam { .. } => "plam",
            Self::Psai { .. } => "psai",
            Self::Plai { .. } => "plai",
            Self::Stsm { .. } => "stsm",
            Self::Ldsm { .. } => "ldsm",
            Self::Stlm { .. } => "stlm",
            Self::Stl { .. } => "stl",
            Self::Stls => "stls",
            Self::Stlsa { .. } => "stlsa",
            Self::Stli { .. } => "stli",
            Self::Stlia { .. } => "stlia",
            Self::Mov { .. } => "mov",
            Self::Movm { .. } => "movm",
            Self::Ldi { .. } => "ldi",
            Self::Clrm { .. } => "clrm",
            Self::Mvac { .. } => "mvac",
            Self::Mvacm { .. } => "mvacm",
            Self::Mvca { .. } => "mvca",
            Self::Mvcam { .. } => "mvcam",
            Self::Call { .. } => "call",
            Self::Ret => "ret",
            Self::Cpfjr { .. } => "cpfjr",
            Self::Ijmr { .. } => "ijmr",
            Self::Wfe => "wfe",
            Self::Jmp { .. } => "jmp",
            Self::Jz { .. } => "jz",
            Self::Jnz { .. } => "jnz",
            Self::Jc { .. } => "jc",
            Self::Jnc { .. } => "jnc",
            Self::Btjr { .. } => "btjr",
            Self::Cpjr { .. } => "cpjr",
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let m = self.mnemonic();
        match *self {
            Self::Add { dst, src }
            | Self::Adb { dst, src }
            | Self::Sub { dst, src }
            | Self::Sbb { dst, src }
            | Self::Cmp { dst, src }
            | Self::Mov { dst, src }
            | Self::Mvac { dst, src }
            | Self::Mvca { dst, src } => write!(f, "{m} {}, {}", gr_name(dst), gr_name(src)),
            Self::Adi { dst, imm }
            | Self::Adbi { dst, imm }
            | Self::Sbi { dst, imm }
            | Self::Sbbi { dst, imm }
            | Self::Cpi { dst, imm }
            | Self::Andi { dst, imm }
            | Self::Ori { dst, imm }
            | Self::Xori { dst, imm }
            | Self::Ldi { dst, imm } => write!(f, "{m} {}, {imm:#X}", gr_name(dst)),
            Self::Adm { first, last }
            | Self::Adbm { first, last }
            | Self::Sbm { first, last }
            | Self::Sbbm { first, last }
            | Self::Cpm { first, last }
            | Self::Movm { first, last }
            | Self::Clrm { first, last }
            | Self::Mvacm { first, last }
            | Self::Mvcam { first, last } => {
                write!(f, "{m} {}, {}", gr_name(first), gr_name(last))
            }
            Self::Inc { first, last }
            | Self::Incb { first, last }
            | Self::Dec { first, last }
            | Self::Decb { first, last }
            | Self::Rshm { first, last }
            | Self::Lshm { first, last }
            | Self::Psam { first, last }
            | Self::Plam { first, last }
            | Self::Stsm { first, last }
            | Self::Ldsm { first, last }
            | Self::Stlm { first, last } => write!(f, "{m} {}, {last}", gr_name(first)),
            Self::Lcrb { bank } | Self::Larb { bank } => write!(f, "{m} {bank}"),
            Self::In { dst, sr } => write!(f, "{m} {}, SR{sr}", gr_name(dst)),
            Self::Out { sr, src } => write!(f, "{m} SR{sr}, {}", gr_name(src)),
            Self::Outi { sr, imm } => write!(f, "{m} SR{sr}, {imm:#X}"),
            Self::Psai { addr } => write!(f, "{m} {addr:#X}"),
            Self::Plai { addr } | Self::Stlsa { addr } => write!(f, "{m} {addr:#X}"),
            Self::Stli { value } | Self::Stlia { value } => write!(f, "{m} {value:#X}"),
            Self::Stl { src } => write!(f, "{m} {}", gr_name(src)),
            Self::Ijmr { reg } => write!(f, "{m} {}", gr_name(reg)),
            Self::Call { target }
            | Self::Jmp { target }
            | Self::Jz { target }
            | Self::Jnz { target }
            | Self::Jc { target }
            | Self::Jnc { target } => write!(f, "{m} 0x{target:03X}"),
            Self::Cpfjr { reg, offset } => write!(f, "{m} {}, +{offset}", gr_name(reg)),
            Self::Btjr { reg, bit, offset } => {
                write!(f, "{m} {}, {bit}, +{offset}", gr_name(reg))
            }
            Self::Cpjr { reg, value, offset } => {
                write!(f, "{m} {}, {value}, +{offset}", gr_name(reg))
            }
            Self::Stls | Self::Ret | Self::Wfe => write!(f, "{m}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instruction_encode() {
        let instr = Instruction::Ldi { dst: 3, imm: 0xA };
        assert_eq!(instr.encode(), 0x8800 | (3 << 5) | (0xA << 1));
        assert_eq!(Instruction::Wfe.encode(), 0xBC00);
        assert_eq!(Instruction::Call { target: 0x123 }.encode(), 0xA123);
    }

    #[test]
    fn test_instruction_decode() {
        assert_eq!(
            Instruction::decode(0x8800 | (3 << 5) | (0xA << 1)),
            Instruction::Ldi { dst: 3, imm: 0xA }
        );
        // call folds the two low slot bits into a 12-bit target
        assert_eq!(Instruction::decode(0xAFFF), Instruction::Call { target: 0xFFF });
        assert_eq!(Instruction::decode(0xA400), Instruction::Call { target: 0x400 });
        // psai spans two primary slots
        assert_eq!(Instruction::decode(0x7400), Instruction::Psai { addr: 0x400 });
        assert_eq!(
            Instruction::decode(0xE400 | (2 << 5) | 7),
            Instruction::Btjr {
                reg: 2,
                bit: 1,
                offset: 7
            }
        );
    }

    #[test]
    fn test_sub_dispatch() {
        assert_eq!(Instruction::decode(0x3C08), Instruction::Lcrb { bank: 1 });
        assert_eq!(Instruction::decode(0x3E18), Instruction::Larb { bank: 3 });
        assert_eq!(
            Instruction::decode(0x4C00 | (2 << 3) | 5),
            Instruction::Dec { first: 0, last: 5 }
        );
        assert_eq!(
            Instruction::decode(0x6000 | (1 << 4) | 2),
            Instruction::Plam { first: 0, last: 2 }
        );
        assert_eq!(
            Instruction::decode(0x7C00 | (3 << 3) | 0x3E0 | 0x7),
            Instruction::Stlia { value: 0xFF }
        );
    }

    #[test]
    fn test_every_word_reencodes_to_itself_after_decode() {
        for word in 0..=u16::MAX {
            let instr = Instruction::decode(word);
            assert_eq!(Instruction::decode(instr.encode()), instr, "{word:#06X}");
        }
    }

    #[test]
    fn test_range_len() {
        assert_eq!(range_len(5, 2), 6);
        assert_eq!(range_len(3, 3), 1);
        assert_eq!(range_len(0, 7), 8);
        assert_eq!(range_len(9, 8), 8);
    }

    #[test]
    fn test_display() {
        assert_eq!(Instruction::Add { dst: 0, src: 9 }.to_string(), "add RA0, RB1");
        assert_eq!(Instruction::Jz { target: 0x12 }.to_string(), "jz 0x012");
        assert_eq!(Instruction::Out { sr: 15, src: 31 }.to_string(), "out SR15, RD7");
    }

    #[test]
    fn test_check_indices() {
        assert_eq!(check_gr(3, 31), Ok((3, 31)));
        assert_eq!(check_gr(4, 0), Err(PlatformError::InvalidBank(4)));
        assert_eq!(check_gr(0, 32), Err(PlatformError::InvalidRegister(32)));
        assert_eq!(check_sr(16), Err(PlatformError::InvalidSpecialRegister(16)));
    }
}
