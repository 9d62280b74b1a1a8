use std::collections::VecDeque;

use crate::plat::{
    BANK_COUNT, BSA_MASK, GR_COUNT, NIBBLE_MASK, PC_MASK, SR_COUNT, STACK_DEPTH,
};

bitflags::bitflags! {
    /// The CPU status flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Flags: u8 {
        /// Set if the result of the last compare/subtract was zero.
        const ZERO = 1 << 0;
        /// Carry out of an add, borrow out of a subtract.
        const CARRY = 1 << 1;
    }
}

/// The full set of architectural registers.
///
/// Every store is masked to the register's width, so no operation can leave an
/// out-of-range value behind.
#[derive(Debug, Clone)]
pub struct RegisterFile {
    gr: [[u8; GR_COUNT]; BANK_COUNT],
    pub sr: [u8; SR_COUNT],
    pub flags: Flags,
    cb: u8,
    ab: u8,
    pc: u16,
    stack: VecDeque<u16>,
    bsa: u16,
}

impl RegisterFile {
    pub fn new() -> Self {
        Self {
            gr: [[0; GR_COUNT]; BANK_COUNT],
            sr: [0; SR_COUNT],
            flags: Flags::empty(),
            cb: 0,
            ab: 0,
            pc: 0,
            stack: VecDeque::with_capacity(STACK_DEPTH + 1),
            bsa: 0,
        }
    }

    pub fn gr(&self, bank: u8, index: u8) -> u8 {
        self.gr[(bank & 0x3) as usize][(index & 0x1F) as usize]
    }

    pub fn set_gr(&mut self, bank: u8, index: u8, v: u8) {
        self.gr[(bank & 0x3) as usize][(index & 0x1F) as usize] = v & NIBBLE_MASK;
    }

    /// Register `index` in the current bank.
    pub fn cur(&self, index: u8) -> u8 {
        self.gr(self.cb, index)
    }

    pub fn set_cur(&mut self, index: u8, v: u8) {
        self.set_gr(self.cb, index, v)
    }

    /// Register `index` in the alternate bank.
    pub fn alt(&self, index: u8) -> u8 {
        self.gr(self.ab, index)
    }

    pub fn set_alt(&mut self, index: u8, v: u8) {
        self.set_gr(self.ab, index, v)
    }

    /// All registers of one bank.
    pub fn bank(&self, bank: u8) -> &[u8; GR_COUNT] {
        &self.gr[(bank & 0x3) as usize]
    }

    pub fn sr(&self, index: u8) -> u8 {
        self.sr[(index & 0xF) as usize]
    }

    pub fn set_sr(&mut self, index: u8, v: u8) {
        self.sr[(index & 0xF) as usize] = v & NIBBLE_MASK;
    }

    pub fn cb(&self) -> u8 {
        self.cb
    }

    pub fn set_cb(&mut self, cb: u8) {
        self.cb = cb & 0x3;
    }

    pub fn ab(&self) -> u8 {
        self.ab
    }

    pub fn set_ab(&mut self, ab: u8) {
        self.ab = ab & 0x3;
    }

    pub fn pc(&self) -> u16 {
        self.pc
    }

    pub fn set_pc(&mut self, pc: u16) {
        self.pc = pc & PC_MASK;
    }

    /// Advances `PC` by `n` words, wrapping at 4096.
    pub fn advance(&mut self, n: u16) {
        self.set_pc(self.pc.wrapping_add(n));
    }

    pub fn cf(&self) -> bool {
        self.flags.contains(Flags::CARRY)
    }

    pub fn set_cf(&mut self, v: bool) {
        self.flags.set(Flags::CARRY, v);
    }

    pub fn zf(&self) -> bool {
        self.flags.contains(Flags::ZERO)
    }

    pub fn set_zf(&mut self, v: bool) {
        self.flags.set(Flags::ZERO, v);
    }

    /// Pushes a return address, dropping the oldest entry once the stack is full.
    pub fn push(&mut self, ret: u16) {
        self.stack.push_back(ret & PC_MASK);
        if self.stack.len() > STACK_DEPTH {
            let lost = self.stack.pop_front();
            log::trace!("call stack overflow, dropped {lost:03X?}");
        }
    }

    /// Pops the most recent return address, if any.
    pub fn pop(&mut self) -> Option<u16> {
        self.stack.pop_back()
    }

    pub fn stack(&self) -> impl Iterator<Item = u16> + '_ {
        self.stack.iter().copied()
    }

    pub fn bsa(&self) -> u16 {
        self.bsa
    }

    /// Shifts a register value into the top nibble of the bus latch.
    pub fn latch(&mut self, v: u8) {
        self.bsa = ((self.bsa >> 4) | (((v & NIBBLE_MASK) as u16) << 8)) & BSA_MASK;
    }
}

impl Default for RegisterFile {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gr_masking() {
        let mut regs = RegisterFile::new();
        for v in 0..=255u8 {
            regs.set_gr(2, 7, v);
            assert_eq!(regs.gr(2, 7), v & 0xF);
        }
        regs.set_cb(2);
        assert_eq!(regs.cur(7), 0xF);
        assert_eq!(regs.alt(7), 0);
    }

    #[test]
    fn test_pc_masking() {
        let mut regs = RegisterFile::new();
        regs.set_pc(0x1234);
        assert_eq!(regs.pc(), 0x234);
        regs.set_pc(0xFFF);
        regs.advance(1);
        assert_eq!(regs.pc(), 0);
    }

    #[test]
    fn test_stack_evicts_oldest() {
        let mut regs = RegisterFile::new();
        for ret in [0xA, 0xB, 0xC, 0xD] {
            regs.push(ret);
        }
        assert_eq!(regs.stack().collect::<Vec<_>>(), vec![0xB, 0xC, 0xD]);
        assert_eq!(regs.pop(), Some(0xD));
        assert_eq!(regs.pop(), Some(0xC));
        assert_eq!(regs.pop(), Some(0xB));
        assert_eq!(regs.pop(), None);
    }

    #[test]
    fn test_latch() {
        let mut regs = RegisterFile::new();
        regs.latch(0x1);
        regs.latch(0x2);
        regs.latch(0x3);
        assert_eq!(regs.bsa(), 0x321);
        regs.latch(0x1F);
        assert_eq!(regs.bsa(), 0xF32);
    }
}
