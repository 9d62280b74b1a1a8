//! The CPU core: the per-tick driver for timers, the serial port, and instruction retirement.

use crate::plat::Instruction;

use super::{
    display::Lcd,
    peripherals::{AudioSink, SerialSink},
    ram::MemoryBus,
    registers::RegisterFile,
    special::{Pending, SerialStatus, Stopwatch, TimerEvents},
    EmuError,
};

/// Crystal frequency.
pub const OSC_HZ: u32 = 32768;
/// Oscillator periods per machine cycle.
pub const OSC_PER_TICK: u32 = 8;
/// Base ticks per emulated second.
pub const TICK_HZ: u32 = OSC_HZ / OSC_PER_TICK;

const TIMER_32HZ: u64 = 128;
const TIMER_16HZ: u64 = 256;
const TIMER_4HZ: u64 = 1024;
/// Timer1 counts per stopwatch digit.
const STOPWATCH_DIV: u64 = 38;
/// Base ticks per serial byte.
const ISP_DIV: u64 = 24;

/// Number of key input lines.
pub const KEY_LINES: u8 = 8;

/// The watch's physical buttons and the key line each drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Button {
    Left = 0,
    Right = 1,
    Transmit = 2,
    Mode = 3,
}

impl TryFrom<&str> for Button {
    type Error = ();

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.to_ascii_lowercase().as_str() {
            "left" | "l" => Ok(Self::Left),
            "right" | "r" => Ok(Self::Right),
            "transmit" | "tx" | "t" => Ok(Self::Transmit),
            "mode" | "m" => Ok(Self::Mode),
            _ => Err(()),
        }
    }
}

/// The stopwatch state machine driven by SR10 writes and the first two key lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StopwatchMode {
    Disabled,
    Enabled,
    Stopped,
    Running,
}

/// Serial transfer source/destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IspMode {
    /// Bytes go through SR5/SR6.
    Registers,
    /// Bytes stream through external memory at `SA`.
    Dma,
}

/// The serial shift port.
#[derive(Debug, Clone)]
pub struct Isp {
    counter: u64,
    pub mode: IspMode,
    pub tx_enable: bool,
    pub rx_enable: bool,
    /// A transmit is armed.
    pub transmit: bool,
    pub buffer: u8,
}

impl Isp {
    fn new() -> Self {
        Self {
            counter: 0,
            mode: IspMode::Registers,
            tx_enable: false,
            rx_enable: false,
            transmit: false,
            buffer: 0,
        }
    }
}

/// Everything the CPU talks to outside its own registers, borrowed for one tick.
pub struct Bus<'a> {
    pub mem: &'a mut MemoryBus,
    pub lcd: &'a mut Lcd,
    pub audio: &'a mut dyn AudioSink,
    pub serial: &'a mut dyn SerialSink,
}

/// The CPU.
pub struct Cpu {
    pub regs: RegisterFile,
    counter0: u64,
    pub(super) counter1: u64,
    pub(super) stopwatch: StopwatchMode,
    pub isp: Isp,
    /// Ticks left before the next fetch.
    busy: i32,
    cycles: u64,
}

impl Cpu {
    pub fn new() -> Self {
        Self {
            regs: RegisterFile::new(),
            counter0: 0,
            counter1: 0,
            stopwatch: StopwatchMode::Disabled,
            isp: Isp::new(),
            busy: 0,
            cycles: 0,
        }
    }

    /// Machine cycles spent by retired instructions.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn stopwatch(&self) -> StopwatchMode {
        self.stopwatch
    }

    /// Advances one base tick. Returns the ticks left before the next fetch;
    /// a value of 1 or less means the instruction retired this tick has finished.
    pub fn tick(&mut self, bus: &mut Bus<'_>) -> i32 {
        self.timer0();
        self.timer1();
        self.isp_tick(bus);

        self.busy -= 1;
        if self.busy <= 0 {
            let pc = self.regs.pc();
            let word = bus.mem.fetch(pc);
            let instr = Instruction::decode(word);
            log::trace!("{pc:03X}: {word:04X}  {instr}");
            let cost = self.execute(instr, word, bus);
            self.busy = cost as i32;
            self.cycles += cost as u64;
        }
        self.busy
    }

    fn timer0(&mut self) {
        self.counter0 += 1;
        let mask = TimerEvents::from_bits_truncate(self.regs.sr[13]);
        let mut events = TimerEvents::from_bits_truncate(self.regs.sr[12]);

        if self.counter0 % TIMER_32HZ == 0 && !mask.contains(TimerEvents::HZ32) {
            events |= TimerEvents::HZ32;
        }
        if self.counter0 % TIMER_16HZ == 0 {
            if !mask.contains(TimerEvents::HZ16) {
                events |= TimerEvents::HZ16;
            }
            self.regs.sr[14] += 1;
            if self.regs.sr[14] > 15 {
                self.regs.sr[14] = 0;
                if !mask.contains(TimerEvents::HZ1) {
                    events |= TimerEvents::HZ1;
                    self.regs.sr[4] = (self.regs.sr[4] + 1) & 0x3;
                }
            }
        }
        if self.counter0 % TIMER_4HZ == 0 && !mask.contains(TimerEvents::HZ4) {
            events |= TimerEvents::HZ4;
        }

        self.regs.sr[12] = events.bits();
        if !events.is_empty() {
            self.regs.sr[0] |= Pending::TIMER.bits();
        }
    }

    fn timer1(&mut self) {
        if !Stopwatch::from_bits_truncate(self.regs.sr[9]).contains(Stopwatch::RUN) {
            return;
        }
        self.counter1 += 1;
        if self.counter1 % STOPWATCH_DIV == 0 {
            self.regs.sr[10] += 1;
            if self.regs.sr[10] > 9 {
                self.regs.sr[10] = 0;
                self.regs.sr[9] |= Stopwatch::OVERFLOW.bits();
                self.regs.sr[3] = (self.regs.sr[3] + 1) & 0x3;
            }
        }
    }

    fn isp_tick(&mut self, bus: &mut Bus<'_>) {
        self.isp.counter += 1;
        if self.isp.counter % ISP_DIV != 0 || !(self.isp.transmit && self.isp.tx_enable) {
            return;
        }

        match self.isp.mode {
            IspMode::Dma => {
                self.isp.buffer = bus.mem.read_external();
                if bus.mem.sa() & 0xFF == 0 {
                    self.regs.sr[1] |= SerialStatus::DMA_TX_DONE.bits();
                    self.regs.sr[0] |= Pending::SERIAL.bits();
                    self.isp.transmit = false;
                }
            }
            IspMode::Registers => {
                self.regs.sr[1] |= SerialStatus::TX_DONE.bits();
                self.regs.sr[0] |= Pending::SERIAL.bits();
                self.isp.transmit = false;
            }
        }

        bus.serial.transmit(self.isp.buffer);
        if self.isp.rx_enable {
            self.regs.sr[5] = self.isp.buffer >> 4;
            self.regs.sr[6] = self.isp.buffer & 0xF;
        }
    }

    /// Delivers a byte arriving on the serial input.
    pub fn receive(&mut self, mem: &mut MemoryBus, byte: u8) {
        if !self.isp.rx_enable {
            log::debug!("serial rx {byte:#04X} dropped, receiver disabled");
            return;
        }
        log::debug!("serial rx {byte:#04X}");
        self.regs.sr[5] = byte >> 4;
        self.regs.sr[6] = byte & 0xF;

        match self.isp.mode {
            IspMode::Dma => {
                if !self.isp.tx_enable {
                    mem.write_external(byte);
                    if mem.sa() & 0xFF == 0 {
                        self.regs.sr[1] |= SerialStatus::DMA_RX_DONE.bits();
                        self.regs.sr[0] |= Pending::SERIAL.bits();
                    }
                }
            }
            IspMode::Registers => {
                let status = if self.isp.tx_enable {
                    SerialStatus::RX_DATA | SerialStatus::TX_DONE
                } else {
                    SerialStatus::RX_DATA
                };
                self.regs.sr[1] |= status.bits();
                self.regs.sr[0] |= Pending::SERIAL.bits();
            }
        }
    }

    /// Presses the button on key line `line`.
    pub fn press(&mut self, line: u8) -> Result<(), EmuError> {
        if line >= KEY_LINES {
            return Err(EmuError::InvalidButton(line));
        }
        let bit = ((1u16 << line) & 0xF) as u8;
        self.regs.sr[7] |= bit;
        self.regs.sr[8] |= bit;
        self.regs.sr[0] |= Pending::KEY.bits();
        if self.stopwatch != StopwatchMode::Disabled {
            self.stopwatch_key(line);
        }
        Ok(())
    }

    /// Releases the button on key line `line`.
    pub fn release(&mut self, line: u8) -> Result<(), EmuError> {
        if line >= KEY_LINES {
            return Err(EmuError::InvalidButton(line));
        }
        self.regs.sr[8] &= !(((1u16 << line) & 0xF) as u8);
        Ok(())
    }

    fn stopwatch_key(&mut self, line: u8) {
        match (line, self.stopwatch) {
            (0, StopwatchMode::Running) => {
                self.regs.sr[9] |= Stopwatch::SPLIT.bits();
                self.regs.sr[11] = self.regs.sr[10];
            }
            (0, StopwatchMode::Stopped) => {
                self.regs.sr[9] |= Stopwatch::CLEAR.bits();
                self.regs.sr[10] = 0;
                self.counter1 = 0;
            }
            (1, StopwatchMode::Running) => {
                self.stopwatch = StopwatchMode::Stopped;
                self.regs.sr[9] &= !Stopwatch::RUN.bits();
            }
            (1, _) => {
                self.stopwatch = StopwatchMode::Running;
                self.regs.sr[9] |= Stopwatch::RUN.bits();
            }
            _ => {}
        }
        log::debug!("stopwatch {:?}", self.stopwatch);
    }
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emu::peripherals::Mute;

    /// A CPU running an endless `jmp 0` loop.
    fn fixture() -> (Cpu, MemoryBus, Lcd) {
        let mut mem = MemoryBus::new();
        mem.write_raw_word(0, Instruction::Jmp { target: 0 }.encode());
        (Cpu::new(), mem, Lcd::new())
    }

    fn run(cpu: &mut Cpu, mem: &mut MemoryBus, lcd: &mut Lcd, ticks: usize) -> Vec<u8> {
        let mut audio = Mute;
        let mut tx: Vec<u8> = Vec::new();
        let mut bus = Bus {
            mem,
            lcd,
            audio: &mut audio,
            serial: &mut tx,
        };
        for _ in 0..ticks {
            cpu.tick(&mut bus);
        }
        tx
    }

    #[test]
    fn test_timer0_seconds() {
        let (mut cpu, mut mem, mut lcd) = fixture();
        run(&mut cpu, &mut mem, &mut lcd, 255);
        assert_eq!(cpu.regs.sr[14], 0);
        run(&mut cpu, &mut mem, &mut lcd, 1);
        assert_eq!(cpu.regs.sr[14], 1);
        assert_ne!(cpu.regs.sr[0] & Pending::TIMER.bits(), 0);

        run(&mut cpu, &mut mem, &mut lcd, 4096 - 256);
        assert_eq!(cpu.regs.sr[14], 0);
        assert_eq!(cpu.regs.sr[4], 1);
        let events = TimerEvents::from_bits_truncate(cpu.regs.sr[12]);
        assert!(events.contains(TimerEvents::HZ1 | TimerEvents::HZ4));
    }

    #[test]
    fn test_timer0_masked() {
        let (mut cpu, mut mem, mut lcd) = fixture();
        cpu.regs.sr[13] = 0xF;
        run(&mut cpu, &mut mem, &mut lcd, 4096);
        assert_eq!(cpu.regs.sr[12], 0);
        assert_eq!(cpu.regs.sr[0], 0);
        assert_eq!(cpu.regs.sr[14], 0);
        assert_eq!(cpu.regs.sr[4], 0);
    }

    #[test]
    fn test_timer1_stopwatch_digit() {
        let (mut cpu, mut mem, mut lcd) = fixture();
        run(&mut cpu, &mut mem, &mut lcd, 100);
        assert_eq!(cpu.regs.sr[10], 0);

        cpu.regs.sr[9] = Stopwatch::RUN.bits();
        run(&mut cpu, &mut mem, &mut lcd, 38 * 9);
        assert_eq!(cpu.regs.sr[10], 9);
        run(&mut cpu, &mut mem, &mut lcd, 38);
        assert_eq!(cpu.regs.sr[10], 0);
        assert_eq!(cpu.regs.sr[3], 1);
        assert_ne!(cpu.regs.sr[9] & Stopwatch::OVERFLOW.bits(), 0);
    }

    #[test]
    fn test_buttons() {
        let (mut cpu, _, _) = fixture();
        cpu.press(Button::Right as u8).unwrap();
        assert_eq!(cpu.regs.sr[7], 0b10);
        assert_eq!(cpu.regs.sr[8], 0b10);
        assert_eq!(cpu.regs.sr[0], Pending::KEY.bits());
        cpu.release(Button::Right as u8).unwrap();
        assert_eq!(cpu.regs.sr[7], 0b10);
        assert_eq!(cpu.regs.sr[8], 0);

        // lines 4..8 exist but do not fit the nibble registers
        cpu.press(6).unwrap();
        assert_eq!(cpu.regs.sr[7], 0b10);
        assert!(matches!(cpu.press(8), Err(EmuError::InvalidButton(8))));
    }

    #[test]
    fn test_stopwatch_buttons() {
        let (mut cpu, _, _) = fixture();
        cpu.press(1).unwrap();
        assert_eq!(cpu.stopwatch(), StopwatchMode::Disabled);

        cpu.stopwatch = StopwatchMode::Enabled;
        cpu.press(1).unwrap();
        assert_eq!(cpu.stopwatch(), StopwatchMode::Running);
        assert_ne!(cpu.regs.sr[9] & Stopwatch::RUN.bits(), 0);

        cpu.regs.sr[10] = 7;
        cpu.press(0).unwrap();
        assert_eq!(cpu.regs.sr[11], 7);
        assert_ne!(cpu.regs.sr[9] & Stopwatch::SPLIT.bits(), 0);

        cpu.press(1).unwrap();
        assert_eq!(cpu.stopwatch(), StopwatchMode::Stopped);
        cpu.press(0).unwrap();
        assert_eq!(cpu.regs.sr[10], 0);
        assert_ne!(cpu.regs.sr[9] & Stopwatch::CLEAR.bits(), 0);
    }

    #[test]
    fn test_isp_register_transmit() {
        let (mut cpu, mut mem, mut lcd) = fixture();
        cpu.isp.tx_enable = true;
        cpu.isp.rx_enable = true;
        cpu.isp.transmit = true;
        cpu.isp.buffer = 0xA5;
        let tx = run(&mut cpu, &mut mem, &mut lcd, 23);
        assert!(tx.is_empty());
        let tx = run(&mut cpu, &mut mem, &mut lcd, 1);
        assert_eq!(tx, vec![0xA5]);
        assert!(!cpu.isp.transmit);
        assert_eq!((cpu.regs.sr[5], cpu.regs.sr[6]), (0xA, 0x5));
        assert_eq!(cpu.regs.sr[1], SerialStatus::TX_DONE.bits());
        assert_ne!(cpu.regs.sr[0] & Pending::SERIAL.bits(), 0);
    }

    #[test]
    fn test_isp_dma_transmit() {
        let (mut cpu, mut mem, mut lcd) = fixture();
        mem.set_sa(0xFE);
        mem.external[0xFE] = 0x12;
        mem.external[0xFF] = 0x34;
        cpu.isp.mode = IspMode::Dma;
        cpu.isp.tx_enable = true;
        cpu.isp.transmit = true;
        let tx = run(&mut cpu, &mut mem, &mut lcd, 24 * 3);
        // the page boundary stops the transfer
        assert_eq!(tx, vec![0x12, 0x34]);
        assert_eq!(mem.sa(), 0x100);
        assert_eq!(cpu.regs.sr[1], SerialStatus::DMA_TX_DONE.bits());
    }

    #[test]
    fn test_isp_receive() {
        let (mut cpu, mut mem, _) = fixture();
        cpu.receive(&mut mem, 0x42);
        assert_eq!(cpu.regs.sr[5], 0);

        cpu.isp.rx_enable = true;
        cpu.receive(&mut mem, 0x42);
        assert_eq!((cpu.regs.sr[5], cpu.regs.sr[6]), (0x4, 0x2));
        assert_eq!(cpu.regs.sr[1], SerialStatus::RX_DATA.bits());

        cpu.isp.mode = IspMode::Dma;
        mem.set_sa(0x1FF);
        cpu.receive(&mut mem, 0x99);
        assert_eq!(mem.external[0x1FF], 0x99);
        assert_ne!(cpu.regs.sr[1] & SerialStatus::DMA_RX_DONE.bits(), 0);
    }
}
