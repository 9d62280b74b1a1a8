//! Special register access and its side effects.

use super::{
    cpu::{Cpu, IspMode, StopwatchMode},
    peripherals::AudioSink,
};

bitflags::bitflags! {
    /// SR0: pending event sources. `wfe` waits for any of these.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Pending: u8 {
        /// SR12 has a timer event.
        const TIMER = 1 << 0;
        /// SR9 has a stopwatch event.
        const STOPWATCH = 1 << 1;
        /// SR7 has a new key press.
        const KEY = 1 << 2;
        /// SR1 has a serial event.
        const SERIAL = 1 << 3;
    }
}

bitflags::bitflags! {
    /// SR1: serial port status.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SerialStatus: u8 {
        const RX_DATA = 1 << 0;
        const DMA_RX_DONE = 1 << 1;
        const TX_DONE = 1 << 2;
        const DMA_TX_DONE = 1 << 3;
    }
}

bitflags::bitflags! {
    /// SR9: stopwatch status.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Stopwatch: u8 {
        const CLEAR = 1 << 0;
        const SPLIT = 1 << 1;
        /// The tenths digit rolled over.
        const OVERFLOW = 1 << 2;
        /// Gates timer1.
        const RUN = 1 << 3;
    }
}

bitflags::bitflags! {
    /// SR12 timer events, and the matching SR13 mask bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TimerEvents: u8 {
        const HZ1 = 1 << 0;
        const HZ4 = 1 << 1;
        const HZ16 = 1 << 2;
        const HZ32 = 1 << 3;
    }
}

bitflags::bitflags! {
    /// SR15 buzzer commands.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Buzzer: u8 {
        const TONE = 1 << 0;
        const TREMOLO_OFF = 1 << 1;
        const TREMOLO_ON = 1 << 2;
    }
}

impl Cpu {
    /// Reads a special register. SR3 and SR4 clear on read, SR15 drops bit 0.
    pub fn read_sr(&mut self, index: u8) -> u8 {
        let index = (index & 0xF) as usize;
        let v = self.regs.sr[index];
        match index {
            3 | 4 => self.regs.sr[index] = 0,
            15 => self.regs.sr[15] &= !Buzzer::TONE.bits(),
            _ => {}
        }
        v
    }

    /// Writes a special register through its side-effect handler.
    pub fn write_sr(&mut self, index: u8, v: u8, audio: &mut dyn AudioSink) {
        let v = v & 0xF;
        let sr = &mut self.regs.sr;
        match index & 0xF {
            1 => {
                sr[1] = 0;
                sr[0] &= !Pending::SERIAL.bits();
            }
            2 => sr[2] = 0,
            3 => {
                self.isp.mode = if v & 0x1 != 0 {
                    IspMode::Dma
                } else {
                    IspMode::Registers
                };
                self.isp.tx_enable = v & 0x2 != 0;
            }
            4 => {
                self.isp.rx_enable = v & 0x2 != 0;
                self.isp.transmit = v & 0x1 != 0;
            }
            5 => self.isp.buffer = (self.isp.buffer & 0x0F) | (v << 4),
            6 => self.isp.buffer = (self.isp.buffer & 0xF0) | v,
            7 => {
                sr[7] = 0;
                sr[0] &= !Pending::KEY.bits();
            }
            9 => {
                sr[9] &= !(v & !Stopwatch::RUN.bits());
                if sr[9] == 0 {
                    sr[0] &= !Pending::STOPWATCH.bits();
                }
            }
            10 => {
                let cmd = Stopwatch::from_bits_truncate(v);
                if cmd.contains(Stopwatch::RUN) {
                    sr[9] |= Stopwatch::RUN.bits();
                }
                if cmd.contains(Stopwatch::OVERFLOW) {
                    sr[9] &= !Stopwatch::RUN.bits();
                }
                if cmd.contains(Stopwatch::SPLIT) {
                    sr[10] = 0;
                    self.counter1 = 0;
                }
                if cmd.contains(Stopwatch::CLEAR) {
                    if self.stopwatch == StopwatchMode::Disabled {
                        self.stopwatch = StopwatchMode::Enabled;
                    }
                } else {
                    self.stopwatch = StopwatchMode::Disabled;
                }
            }
            12 => {
                sr[12] &= !v;
                if sr[12] == 0 {
                    sr[0] &= !Pending::TIMER.bits();
                }
            }
            13 => sr[13] = v,
            14 => sr[14] = 0,
            15 => {
                let cmd = Buzzer::from_bits_truncate(v);
                if cmd.contains(Buzzer::TONE) {
                    audio.play_tone();
                }
                if cmd.contains(Buzzer::TREMOLO_ON) {
                    audio.start_tremolo();
                }
                if cmd.contains(Buzzer::TREMOLO_OFF) {
                    audio.stop_tremolo();
                }
            }
            // SR0, SR8 and SR11 are read-only
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emu::peripherals::Mute;

    #[derive(Default)]
    struct Recorder(Vec<&'static str>);

    impl AudioSink for Recorder {
        fn play_tone(&mut self) {
            self.0.push("tone");
        }
        fn start_tremolo(&mut self) {
            self.0.push("tremolo on");
        }
        fn stop_tremolo(&mut self) {
            self.0.push("tremolo off");
        }
    }

    #[test]
    fn test_read_clears() {
        let mut cpu = Cpu::new();
        cpu.regs.sr[3] = 2;
        cpu.regs.sr[4] = 3;
        cpu.regs.sr[15] = 0b0111;
        cpu.regs.sr[5] = 9;
        assert_eq!(cpu.read_sr(3), 2);
        assert_eq!(cpu.read_sr(3), 0);
        assert_eq!(cpu.read_sr(4), 3);
        assert_eq!(cpu.regs.sr[4], 0);
        assert_eq!(cpu.read_sr(15), 0b0111);
        assert_eq!(cpu.regs.sr[15], 0b0110);
        assert_eq!(cpu.read_sr(5), 9);
        assert_eq!(cpu.read_sr(5), 9);
    }

    #[test]
    fn test_acknowledge_clears_pending() {
        let mut cpu = Cpu::new();
        cpu.regs.sr[0] = 0xF;
        cpu.regs.sr[7] = 0x3;
        cpu.regs.sr[12] = 0b0101;
        cpu.write_sr(7, 0, &mut Mute);
        assert_eq!(cpu.regs.sr[7], 0);
        assert_eq!(cpu.regs.sr[0], 0xB);

        cpu.write_sr(12, 0b0001, &mut Mute);
        assert_eq!(cpu.regs.sr[12], 0b0100);
        assert_eq!(cpu.regs.sr[0], 0xB);
        cpu.write_sr(12, 0b0100, &mut Mute);
        assert_eq!(cpu.regs.sr[0], 0xA);

        cpu.write_sr(1, 0, &mut Mute);
        assert_eq!(cpu.regs.sr[0], 0x2);
    }

    #[test]
    fn test_sr9_clear_keeps_run() {
        let mut cpu = Cpu::new();
        cpu.regs.sr[0] = Pending::STOPWATCH.bits();
        cpu.regs.sr[9] = 0xF;
        cpu.write_sr(9, 0xF, &mut Mute);
        assert_eq!(cpu.regs.sr[9], Stopwatch::RUN.bits());
        assert_eq!(cpu.regs.sr[0], Pending::STOPWATCH.bits());

        cpu.regs.sr[9] = Stopwatch::SPLIT.bits();
        cpu.write_sr(9, 0x2, &mut Mute);
        assert_eq!(cpu.regs.sr[0], 0);
    }

    #[test]
    fn test_sr10_stopwatch_control() {
        let mut cpu = Cpu::new();
        cpu.write_sr(10, 0b1001, &mut Mute);
        assert_eq!(cpu.stopwatch(), StopwatchMode::Enabled);
        assert_eq!(cpu.regs.sr[9], Stopwatch::RUN.bits());

        cpu.regs.sr[10] = 5;
        cpu.write_sr(10, 0b0111, &mut Mute);
        assert_eq!(cpu.regs.sr[9], 0);
        assert_eq!(cpu.regs.sr[10], 0);
        assert_eq!(cpu.stopwatch(), StopwatchMode::Enabled);

        cpu.write_sr(10, 0, &mut Mute);
        assert_eq!(cpu.stopwatch(), StopwatchMode::Disabled);
    }

    #[test]
    fn test_isp_configuration() {
        let mut cpu = Cpu::new();
        cpu.write_sr(3, 0b11, &mut Mute);
        assert_eq!(cpu.isp.mode, IspMode::Dma);
        assert!(cpu.isp.tx_enable);
        cpu.write_sr(4, 0b11, &mut Mute);
        assert!(cpu.isp.rx_enable);
        assert!(cpu.isp.transmit);
        cpu.write_sr(5, 0xC, &mut Mute);
        cpu.write_sr(6, 0x3, &mut Mute);
        assert_eq!(cpu.isp.buffer, 0xC3);
    }

    #[test]
    fn test_buzzer_commands() {
        let mut cpu = Cpu::new();
        let mut rec = Recorder::default();
        cpu.write_sr(15, 0b0101, &mut rec);
        cpu.write_sr(15, 0b0010, &mut rec);
        assert_eq!(rec.0, vec!["tone", "tremolo on", "tremolo off"]);
    }

    #[test]
    fn test_misc_writes() {
        let mut cpu = Cpu::new();
        cpu.regs.sr[14] = 9;
        cpu.write_sr(14, 0xF, &mut Mute);
        assert_eq!(cpu.regs.sr[14], 0);
        cpu.write_sr(13, 0x1A, &mut Mute);
        assert_eq!(cpu.regs.sr[13], 0xA);
        cpu.regs.sr[8] = 3;
        cpu.write_sr(8, 0, &mut Mute);
        assert_eq!(cpu.regs.sr[8], 3);
    }
}
