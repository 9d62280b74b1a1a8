use std::fmt;

use crate::plat::{gr_name, BANK_COUNT, GR_COUNT, SR_COUNT};

use super::{
    cpu::Cpu,
    display::{Lcd, CELL_COUNT, DCTRL_COUNT},
    ram::MemoryBus,
};

/// A copy of the whole visible machine state, taken between ticks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub pc: u16,
    pub sa: u16,
    pub la: u8,
    pub cb: u8,
    pub ab: u8,
    pub cf: bool,
    pub zf: bool,
    pub sr: [u8; SR_COUNT],
    pub gr: [[u8; GR_COUNT]; BANK_COUNT],
    pub ddram: [u8; CELL_COUNT],
    pub daram: [u8; CELL_COUNT],
    pub dctrl: [u8; DCTRL_COUNT],
    /// Machine cycles spent by retired instructions.
    pub cycles: u64,
}

impl Snapshot {
    pub fn capture(cpu: &Cpu, mem: &MemoryBus, lcd: &Lcd) -> Self {
        let regs = &cpu.regs;
        let mut gr = [[0; GR_COUNT]; BANK_COUNT];
        for (bank, out) in gr.iter_mut().enumerate() {
            *out = *regs.bank(bank as u8);
        }
        Self {
            pc: regs.pc(),
            sa: mem.sa(),
            la: lcd.la(),
            cb: regs.cb(),
            ab: regs.ab(),
            cf: regs.cf(),
            zf: regs.zf(),
            sr: regs.sr,
            gr,
            ddram: lcd.ddram,
            daram: lcd.daram,
            dctrl: lcd.dctrl,
            cycles: cpu.cycles(),
        }
    }
}

impl Default for Snapshot {
    fn default() -> Self {
        Self::capture(&Cpu::new(), &MemoryBus::new(), &Lcd::new())
    }
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "PC={:03X} SA={:03X} LA={:02X} CB={} AB={} CF={} ZF={} cycles={}",
            self.pc, self.sa, self.la, self.cb, self.ab, self.cf as u8, self.zf as u8, self.cycles
        )?;
        write!(f, "SR ")?;
        for v in self.sr {
            write!(f, "{v:X}")?;
        }
        writeln!(f)?;
        for (bank, regs) in self.gr.iter().enumerate() {
            write!(f, "GR{bank}")?;
            for (page, chunk) in regs.chunks(8).enumerate() {
                write!(f, " {}:", &gr_name(page as u8 * 8)[..2])?;
                for v in chunk {
                    write!(f, "{v:X}")?;
                }
            }
            writeln!(f)?;
        }
        write!(f, "DDRAM")?;
        for v in &self.ddram[..] {
            write!(f, " {v:02X}")?;
        }
        writeln!(f)?;
        write!(f, "DARAM ")?;
        for v in &self.daram[..] {
            write!(f, "{v}")?;
        }
        writeln!(f)?;
        write!(f, "DCTRL ")?;
        for v in self.dctrl {
            write!(f, "{v:X}")?;
        }
        Ok(())
    }
}
