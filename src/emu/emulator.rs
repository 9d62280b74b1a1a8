use std::{path::Path, time::Duration};

use anyhow::Result;
use rustc_hash::FxHashSet;
use tokio::{
    runtime::{Builder, Runtime},
    sync::watch,
    time::{interval, Interval},
};

use crate::plat::PC_MASK;

use super::{
    cpu::{Bus, Cpu, TICK_HZ},
    debugger::Debugger,
    display::Lcd,
    patch::StatePatch,
    peripherals::{AudioSink, LogAudio, LogSerial, SerialSink},
    ram::MemoryBus,
    snapshot::Snapshot,
    EmuError, Region,
};

/// Pixel frames published per emulated second.
pub const FRAME_HZ: u32 = 60;
/// Snapshots published per emulated second.
pub const INSPECT_HZ: u32 = 30;

const FRAME_TICKS: u64 = (TICK_HZ / FRAME_HZ) as u64;
const INSPECT_TICKS: u64 = (TICK_HZ / INSPECT_HZ) as u64;
/// Base ticks run between two waits on the pacing clock.
const PACE_BATCH: u64 = 64;

/// The emulator's current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmuState {
    /// Ticks keep running.
    Continue,
    /// Stopped at a tick boundary; the debugger takes over.
    Pause,
    /// Execution is over.
    Halt,
}

/// The whole watch: CPU, memory, LCD and the collaborators behind the buzzer and serial pins.
///
/// All mutation happens through `&mut self` between ticks, so a patch, reset or breakpoint
/// change can never land in the middle of one.
pub struct Emulator {
    pub cpu: Cpu,
    pub mem: MemoryBus,
    pub lcd: Lcd,
    pub state: EmuState,
    /// Halts after this many base ticks.
    pub tick_limit: Option<u64>,
    audio: Box<dyn AudioSink>,
    serial: Box<dyn SerialSink>,
    breakpoints: FxHashSet<u16>,
    ticks: u64,
    frames: watch::Sender<Vec<f32>>,
    snapshots: watch::Sender<Snapshot>,
    clock: Option<Interval>,
    rt: Runtime,
}

impl Emulator {
    /// Creates a new [Emulator] paced at `speed` times real time. A speed of 0 runs unpaced.
    ///
    /// # Errors
    ///
    /// This function will return an error if the Tokio runtime fails to initialize, or if `speed`
    /// is so small that the pacing period does not fit in a [Duration].
    pub fn new(speed: f64) -> Result<Self> {
        let rt = Builder::new_current_thread()
            .enable_time()
            .global_queue_interval(1)
            .build()?;
        let clock = if speed.is_finite() && speed > 0.0 {
            let period = Duration::try_from_secs_f64(PACE_BATCH as f64 / (TICK_HZ as f64 * speed))?
                .max(Duration::from_nanos(1));
            Some(rt.block_on(async { interval(period) }))
        } else {
            None
        };

        let cpu = Cpu::new();
        let mem = MemoryBus::new();
        let lcd = Lcd::new();
        let (frames, _) = watch::channel(lcd.pixels().collect());
        let (snapshots, _) = watch::channel(Snapshot::capture(&cpu, &mem, &lcd));
        Ok(Self {
            cpu,
            mem,
            lcd,
            state: EmuState::Continue,
            tick_limit: None,
            audio: Box::new(LogAudio::new()),
            serial: Box::new(LogSerial),
            breakpoints: FxHashSet::default(),
            ticks: 0,
            frames,
            snapshots,
            clock,
            rt,
        })
    }

    pub fn set_audio(&mut self, audio: Box<dyn AudioSink>) {
        self.audio = audio;
    }

    pub fn set_serial(&mut self, serial: Box<dyn SerialSink>) {
        self.serial = serial;
    }

    /// Loads an image file into a memory region. On error the region is left zero-filled.
    pub fn load(&mut self, region: Region, path: &Path) -> Result<(), EmuError> {
        self.mem.load_file(region, path)
    }

    /// Base ticks run so far.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Runs the emulator until it halts, handing control to the debugger whenever it pauses.
    pub fn run_while_continue(&mut self) -> Result<()> {
        loop {
            match self.state {
                EmuState::Continue => {}
                EmuState::Halt => break,
                EmuState::Pause => {
                    self.debug()?;
                    continue;
                }
            }
            self.run_batch();
        }
        self.publish();
        Ok(())
    }

    fn run_batch(&mut self) {
        for _ in 0..PACE_BATCH {
            if self.tick_limit.is_some_and(|limit| self.ticks >= limit) {
                log::info!("tick limit reached after {} ticks", self.ticks);
                self.state = EmuState::Halt;
                return;
            }
            self.tick();
            if self.state != EmuState::Continue {
                return;
            }
        }
        if let Some(clock) = self.clock.as_mut() {
            self.rt.block_on(clock.tick());
        }
    }

    /// Advances one base tick: the CPU (timers, serial port, instruction retirement),
    /// then the LCD. Returns the CPU's remaining busy count.
    ///
    /// Pauses when the tick moves `PC` onto a breakpoint.
    pub fn tick(&mut self) -> i32 {
        let (busy, hit) = self.advance();
        if hit {
            self.state = EmuState::Pause;
        }
        busy
    }

    fn advance(&mut self) -> (i32, bool) {
        let before = self.cpu.regs.pc();
        let mut bus = Bus {
            mem: &mut self.mem,
            lcd: &mut self.lcd,
            audio: self.audio.as_mut(),
            serial: self.serial.as_mut(),
        };
        let busy = self.cpu.tick(&mut bus);
        self.lcd.clock();
        self.ticks += 1;

        if self.ticks % FRAME_TICKS == 0 {
            self.publish_frame();
        }
        if self.ticks % INSPECT_TICKS == 0 {
            self.publish_snapshot();
        }

        let pc = self.cpu.regs.pc();
        let hit = pc != before && self.breakpoints.contains(&pc);
        if hit {
            log::info!("breakpoint hit at {pc:03X}");
        }
        (busy, hit)
    }

    /// Runs ticks until the current instruction has finished, so exactly one instruction retires.
    pub fn step_instr(&mut self) {
        while self.tick() > 1 {}
    }

    /// Runs up to `n` ticks regardless of state, stopping early on a breakpoint.
    /// Returns the number of ticks run.
    pub fn run_ticks(&mut self, n: u64) -> u64 {
        for done in 1..=n {
            if self.advance().1 {
                return done;
            }
        }
        n
    }

    /// Rebuilds the CPU and LCD. Memory contents and `SA` survive.
    pub fn reset(&mut self) {
        log::info!("reset after {} ticks", self.ticks);
        self.cpu = Cpu::new();
        self.lcd = Lcd::new();
        self.publish();
    }

    /// Applies a debugger patch in one step.
    pub fn apply_patch(&mut self, patch: &StatePatch) {
        let regs = &mut self.cpu.regs;
        if let Some(pc) = patch.pc {
            regs.set_pc(pc);
        }
        if let Some(la) = patch.la {
            self.lcd.set_la(la);
        }
        if let Some(sa) = patch.sa {
            self.mem.set_sa(sa);
        }
        if let Some(cb) = patch.cb {
            regs.set_cb(cb);
        }
        if let Some(ab) = patch.ab {
            regs.set_ab(ab);
        }
        if let Some(cf) = patch.cf {
            regs.set_cf(cf);
        }
        if let Some(zf) = patch.zf {
            regs.set_zf(zf);
        }
        for &(index, v) in &patch.sr {
            self.cpu.write_sr(index, v, self.audio.as_mut());
        }
        for &(bank, index, v) in &patch.gr {
            self.cpu.regs.set_gr(bank, index, v);
        }
        for &(addr, v) in &patch.ddram {
            self.lcd.set_ddram(addr, v);
        }
        for &(addr, v) in &patch.daram {
            self.lcd.set_daram(addr, v);
        }
        for &(addr, v) in &patch.dctrl {
            self.lcd.set_dctrl(addr, v);
        }
        for &(addr, v) in &patch.memory {
            self.mem.write_raw_word(addr, v);
        }
        self.publish();
    }

    /// Parses and applies a textual patch. Returns the entries that were skipped.
    pub fn poke(&mut self, text: &str) -> Vec<EmuError> {
        let (patch, rejected) = StatePatch::parse(text);
        self.apply_patch(&patch);
        rejected
    }

    pub fn press(&mut self, line: u8) -> Result<(), EmuError> {
        self.cpu.press(line)
    }

    pub fn release(&mut self, line: u8) -> Result<(), EmuError> {
        self.cpu.release(line)
    }

    /// Delivers a byte on the serial input.
    pub fn receive(&mut self, byte: u8) {
        self.cpu.receive(&mut self.mem, byte);
    }

    pub fn add_breakpoint(&mut self, addr: u32) -> Result<(), EmuError> {
        if addr > PC_MASK as u32 {
            return Err(EmuError::InvalidBreakpoint(addr));
        }
        self.breakpoints.insert(addr as u16);
        Ok(())
    }

    /// Returns whether a breakpoint was set at `addr`.
    pub fn remove_breakpoint(&mut self, addr: u32) -> bool {
        u16::try_from(addr).is_ok_and(|addr| self.breakpoints.remove(&addr))
    }

    pub fn breakpoints(&self) -> impl Iterator<Item = u16> + '_ {
        self.breakpoints.iter().copied()
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot::capture(&self.cpu, &self.mem, &self.lcd)
    }

    /// Pixel opacities, row-major, refreshed at [FRAME_HZ] of emulated time.
    pub fn frames(&self) -> watch::Receiver<Vec<f32>> {
        self.frames.subscribe()
    }

    /// Machine state, refreshed at [INSPECT_HZ] of emulated time.
    pub fn snapshots(&self) -> watch::Receiver<Snapshot> {
        self.snapshots.subscribe()
    }

    fn publish_frame(&self) {
        self.frames.send_replace(self.lcd.pixels().collect());
    }

    fn publish_snapshot(&self) {
        self.snapshots.send_replace(self.snapshot());
    }

    /// Publishes a frame and a snapshot right away.
    pub fn publish(&self) {
        self.publish_frame();
        self.publish_snapshot();
    }

    pub fn debug(&mut self) -> Result<()> {
        Debugger::new(self).repl()
    }
}
