//! Instruction semantics.

use crate::plat::{range_len, Instruction, PAGE_SIZE};

use super::{
    alu::{self, AluMode},
    cpu::{Bus, Cpu},
};

const PAGE_MASK: u8 = !(PAGE_SIZE - 1);
const OFFSET_MASK: u8 = PAGE_SIZE - 1;

/// Registers `first`, `first + 1`, ... wrapping inside the page of `first`.
fn window(first: u8, len: u8) -> impl Iterator<Item = u8> {
    let page = first & PAGE_MASK;
    (first..first + len).map(move |gr| page + (gr & OFFSET_MASK))
}

/// `(destination, source)` pairs of a two-operand ranged form. The source walks the page of
/// `last` at the same offsets as the destination.
fn pairs(first: u8, last: u8) -> impl Iterator<Item = (u8, u8)> {
    let len = range_len(first, last);
    let src_page = last & PAGE_MASK;
    window(first, len).map(move |dst| (dst, src_page + (dst & OFFSET_MASK)))
}

impl Cpu {
    /// Executes one decoded instruction and returns its cost in machine cycles.
    pub(super) fn execute(&mut self, instr: Instruction, word: u16, bus: &mut Bus<'_>) -> u8 {
        use Instruction as I;

        if !instr.is_ranged() {
            let v = self.regs.cur(((word >> 5) & 0x1F) as u8);
            self.regs.latch(v);
        }

        let cost = match instr {
            I::Add { dst, src } => self.add_digit(dst, self.regs.cur(src), AluMode::Binary),
            I::Adb { dst, src } => self.add_digit(dst, self.regs.cur(src), AluMode::Decimal),
            I::Sub { dst, src } => self.sub_digit(dst, self.regs.cur(src), AluMode::Binary),
            I::Sbb { dst, src } => self.sub_digit(dst, self.regs.cur(src), AluMode::Decimal),
            I::Adi { dst, imm } => self.add_digit(dst, imm, AluMode::Binary),
            I::Adbi { dst, imm } => self.add_digit(dst, imm, AluMode::Decimal),
            I::Sbi { dst, imm } => self.sub_digit(dst, imm, AluMode::Binary),
            I::Sbbi { dst, imm } => self.sub_digit(dst, imm, AluMode::Decimal),
            I::Adm { first, last } => self.add_multi(first, last, AluMode::Binary),
            I::Adbm { first, last } => self.add_multi(first, last, AluMode::Decimal),
            I::Sbm { first, last } => self.sub_multi(first, last, AluMode::Binary),
            I::Sbbm { first, last } => self.sub_multi(first, last, AluMode::Decimal),

            I::Cmp { dst, src } => self.compare(dst, self.regs.cur(src)),
            I::Cpi { dst, imm } => self.compare(dst, imm),
            I::Cpm { first, last } => {
                let (mut zero, mut carry) = (true, false);
                for (d, s) in pairs(first, last) {
                    let a = self.regs.cur(d);
                    self.regs.latch(a);
                    let (z, c) = alu::compare(a, self.regs.cur(s), carry);
                    zero &= z;
                    carry = c;
                }
                self.regs.set_zf(zero);
                self.regs.set_cf(carry);
                range_len(first, last)
            }

            I::Lcrb { bank } => {
                self.regs.set_cb(bank);
                1
            }
            I::Larb { bank } => {
                self.regs.set_ab(bank);
                1
            }

            I::Andi { dst, imm } => {
                let v = self.regs.cur(dst) & imm;
                self.regs.set_cur(dst, v);
                self.regs.set_zf(v == 0);
                1
            }
            I::Ori { dst, imm } => {
                self.regs.set_cur(dst, self.regs.cur(dst) | imm);
                1
            }
            I::Xori { dst, imm } => {
                self.regs.set_cur(dst, self.regs.cur(dst) ^ imm);
                1
            }

            I::Inc { first, last } => self.ripple_add(first, last, AluMode::Binary),
            I::Incb { first, last } => self.ripple_add(first, last, AluMode::Decimal),
            I::Dec { first, last } => self.ripple_sub(first, last, AluMode::Binary),
            I::Decb { first, last } => self.ripple_sub(first, last, AluMode::Decimal),

            I::Rshm { first, last } => {
                let page = first & PAGE_MASK;
                let len = last.wrapping_sub(first) & OFFSET_MASK;
                for gr in (first + 1..=first + len).rev() {
                    let d = page + (gr & OFFSET_MASK);
                    let s = page + ((gr - 1) & OFFSET_MASK);
                    self.regs.latch(self.regs.cur(d));
                    self.regs.set_cur(d, self.regs.cur(s));
                }
                self.regs.set_cur(first, 0);
                len
            }
            I::Lshm { first, last } => {
                // `last` is an unpaged start offset; the shift runs up towards `first`
                let page = first & PAGE_MASK;
                let len = first.wrapping_sub(last) & OFFSET_MASK;
                for gr in last..last + len {
                    let d = page + (gr & OFFSET_MASK);
                    let s = page + ((gr + 1) & OFFSET_MASK);
                    self.regs.latch(self.regs.cur(d));
                    self.regs.set_cur(d, self.regs.cur(s));
                }
                self.regs.set_cur(first, 0);
                len
            }

            I::In { dst, sr } => {
                let v = self.read_sr(sr);
                self.regs.set_cur(dst, v);
                1
            }
            I::Out { sr, src } => {
                self.write_sr(sr, self.regs.cur(src), &mut *bus.audio);
                1
            }
            I::Outi { sr, imm } => {
                self.write_sr(sr, imm, &mut *bus.audio);
                1
            }

            I::Psam { first, last } => {
                let len = range_len(first, last);
                for s in window(first, len) {
                    self.regs.latch(self.regs.cur(s));
                }
                bus.mem.set_sa(self.regs.bsa());
                len
            }
            I::Plam { first, last } => {
                let len = range_len(first, last);
                let mut la = 0u8;
                for s in window(first, len) {
                    let v = self.regs.cur(s);
                    self.regs.latch(v);
                    la = (la >> 4) | (v << 4);
                }
                if len > 1 {
                    bus.lcd.set_la(la);
                }
                len
            }
            I::Psai { addr } => {
                bus.mem.set_sa(addr);
                1
            }
            I::Plai { addr } => {
                bus.lcd.set_la(addr);
                1
            }

            I::Ldsm { first, last } => {
                let len = range_len(first, last);
                self.regs.set_cur(first, bus.mem.read_external_nibble());
                for d in window(first, len).skip(1) {
                    self.regs.latch(self.regs.cur(d));
                    self.regs.set_cur(d, bus.mem.read_external() >> 4);
                }
                len
            }
            I::Stsm { first, last } => {
                let len = range_len(first, last);
                for byte in self.nibble_pairs(first, len) {
                    bus.mem.write_external(byte);
                }
                len
            }
            I::Stlm { first, last } => {
                let len = range_len(first, last);
                for byte in self.nibble_pairs(first, len) {
                    bus.lcd.write(byte);
                }
                len
            }
            I::Stl { src } => {
                bus.lcd.write(self.regs.cur(src) | 0x30);
                1
            }
            I::Stls => {
                let v = bus.mem.read_external();
                bus.lcd.write(v);
                1
            }
            I::Stlsa { addr } => {
                let v = bus.mem.read_external();
                bus.lcd.write_addr(addr, v);
                1
            }
            I::Stli { value } => {
                bus.lcd.write(value);
                1
            }
            I::Stlia { value } => {
                bus.lcd.write_addr(value, value);
                1
            }

            I::Mov { dst, src } => {
                self.regs.set_cur(dst, self.regs.cur(src));
                1
            }
            I::Movm { first, last } => {
                for (d, s) in pairs(first, last) {
                    self.regs.latch(self.regs.cur(d));
                    self.regs.set_cur(d, self.regs.cur(s));
                }
                range_len(first, last)
            }
            I::Ldi { dst, imm } => {
                self.regs.set_cur(dst, imm);
                1
            }
            I::Clrm { first, last } => {
                let len = range_len(first, last);
                for d in window(first, len) {
                    self.regs.latch(self.regs.cur(d));
                    self.regs.set_cur(d, 0);
                }
                len
            }
            I::Mvac { dst, src } => {
                self.regs.set_alt(dst, self.regs.cur(src));
                1
            }
            I::Mvacm { first, last } => {
                for (d, s) in pairs(first, last) {
                    self.regs.latch(self.regs.cur(d));
                    self.regs.set_alt(d, self.regs.cur(s));
                }
                range_len(first, last)
            }
            I::Mvca { dst, src } => {
                self.regs.set_cur(dst, self.regs.alt(src));
                1
            }
            I::Mvcam { first, last } => {
                for (d, s) in pairs(first, last) {
                    self.regs.latch(self.regs.cur(d));
                    self.regs.set_cur(d, self.regs.alt(s));
                }
                range_len(first, last)
            }

            /* control flow sets PC itself */
            I::Call { target } => {
                self.regs.push(self.regs.pc());
                self.regs.set_pc(target);
                return 1;
            }
            I::Ret => {
                if let Some(ret) = self.regs.pop() {
                    self.regs.set_pc(ret);
                }
                self.regs.advance(1);
                return 1;
            }
            I::Cpfjr { reg, offset } => {
                self.skip_if(self.regs.cur(reg) == 4, offset);
                return 1;
            }
            I::Ijmr { reg } => {
                self.regs.advance(self.regs.cur(reg) as u16 + 1);
                return 1;
            }
            I::Wfe => {
                if self.regs.sr[0] != 0 {
                    self.regs.advance(1);
                }
                return 1;
            }
            I::Jmp { target } => {
                self.regs.set_pc(target);
                return 1;
            }
            I::Jz { target } => {
                self.branch(self.regs.zf(), target);
                return 1;
            }
            I::Jnz { target } => {
                self.branch(!self.regs.zf(), target);
                return 1;
            }
            I::Jc { target } => {
                self.branch(self.regs.cf(), target);
                return 1;
            }
            I::Jnc { target } => {
                self.branch(!self.regs.cf(), target);
                return 1;
            }
            I::Btjr { reg, bit, offset } => {
                self.skip_if(self.regs.cur(reg) & (1 << bit) != 0, offset);
                return 1;
            }
            I::Cpjr { reg, value, offset } => {
                self.skip_if(self.regs.cur(reg) == value, offset);
                return 1;
            }
        };

        self.regs.advance(1);
        cost
    }

    fn add_digit(&mut self, dst: u8, b: u8, mode: AluMode) -> u8 {
        let out = alu::add(self.regs.cur(dst), b, false, mode);
        self.regs.set_cur(dst, out.value);
        self.regs.set_cf(out.carry);
        1
    }

    fn sub_digit(&mut self, dst: u8, b: u8, mode: AluMode) -> u8 {
        let out = alu::sub(self.regs.cur(dst), b, false, mode);
        self.regs.set_cur(dst, out.value);
        self.regs.set_zf(out.zero);
        self.regs.set_cf(out.carry);
        1
    }

    fn compare(&mut self, dst: u8, b: u8) -> u8 {
        let (zero, carry) = alu::compare(self.regs.cur(dst), b, false);
        self.regs.set_zf(zero);
        self.regs.set_cf(carry);
        1
    }

    fn add_multi(&mut self, first: u8, last: u8, mode: AluMode) -> u8 {
        let mut carry = false;
        for (d, s) in pairs(first, last) {
            let a = self.regs.cur(d);
            self.regs.latch(a);
            let out = alu::add(a, self.regs.cur(s), carry, mode);
            self.regs.set_cur(d, out.value);
            carry = out.carry;
        }
        self.regs.set_cf(carry);
        range_len(first, last)
    }

    fn sub_multi(&mut self, first: u8, last: u8, mode: AluMode) -> u8 {
        let (mut zero, mut carry) = (true, false);
        for (d, s) in pairs(first, last) {
            let a = self.regs.cur(d);
            self.regs.latch(a);
            let out = alu::sub(a, self.regs.cur(s), carry, mode);
            self.regs.set_cur(d, out.value);
            zero &= out.zero;
            carry = out.carry;
        }
        self.regs.set_zf(zero);
        self.regs.set_cf(carry);
        range_len(first, last)
    }

    /// Increments a multi-digit number, least significant digit at `first`.
    fn ripple_add(&mut self, first: u8, last: u8, mode: AluMode) -> u8 {
        let len = range_len(first, last);
        let mut carry = true;
        for d in window(first, len) {
            let a = self.regs.cur(d);
            self.regs.latch(a);
            let out = alu::add(a, 0, carry, mode);
            self.regs.set_cur(d, out.value);
            carry = out.carry;
        }
        self.regs.set_cf(carry);
        len
    }

    fn ripple_sub(&mut self, first: u8, last: u8, mode: AluMode) -> u8 {
        let len = range_len(first, last);
        let (mut zero, mut carry) = (true, true);
        for d in window(first, len) {
            let a = self.regs.cur(d);
            self.regs.latch(a);
            let out = alu::sub(a, 0, carry, mode);
            self.regs.set_cur(d, out.value);
            zero &= out.zero;
            carry = out.carry;
        }
        self.regs.set_zf(zero);
        self.regs.set_cf(carry);
        len
    }

    /// Packs `(GR[n] << 4) | GR[n - 1]` for each register after `first` in the window.
    fn nibble_pairs(&mut self, first: u8, len: u8) -> Vec<u8> {
        let page = first & PAGE_MASK;
        (first + 1..first + len)
            .map(|gr| {
                let s = page + (gr & OFFSET_MASK);
                let p = page + ((gr - 1) & OFFSET_MASK);
                let hi = self.regs.cur(s);
                self.regs.latch(hi);
                (hi << 4) | self.regs.cur(p)
            })
            .collect()
    }

    fn skip_if(&mut self, cond: bool, offset: u8) {
        if cond {
            self.regs.advance(offset as u16);
        }
        self.regs.advance(1);
    }

    /// Conditional jump inside the current 1K block.
    fn branch(&mut self, taken: bool, target: u16) {
        if taken {
            self.regs.set_pc(target | (self.regs.pc() & 0xC00));
        } else {
            self.regs.advance(1);
        }
    }
}
