use std::cell::RefCell;

use anyhow::Result;
use easy_repl::{command, repl::LoopStatus, CommandStatus, Repl};

use crate::plat::Instruction;

use super::{
    cpu::Button,
    emulator::{EmuState, Emulator},
    patch::parse_number,
};

fn key_line(key: &str) -> Option<u8> {
    match Button::try_from(key) {
        Ok(button) => Some(button as u8),
        Err(()) => parse_number(key).and_then(|n| u8::try_from(n).ok()),
    }
}

pub struct Debugger<'a> {
    pub emu: RefCell<&'a mut Emulator>,
}

impl<'a> Debugger<'a> {
    pub fn new(emu: &'a mut Emulator) -> Self {
        Self {
            emu: RefCell::new(emu),
        }
    }

    fn current(&self) {
        let emu = self.emu.borrow();
        let pc = emu.cpu.regs.pc();
        let word = emu.mem.fetch(pc);
        eprintln!(
            "[pc={pc:03X}] {word:04X} --> {}",
            Instruction::decode(word)
        );
    }

    pub fn repl(&self) -> Result<()> {
        let mut repl = Repl::builder()
            .description("watch4 debugger")
            .add(
                "c",
                command! {
                    "Continue execution",
                    () => || {
                        self.emu.borrow_mut().state = EmuState::Continue;
                        Ok(CommandStatus::Quit)
                    }
                },
            )
            .add(
                "s",
                command! {
                    "Step one instruction",
                    () => || {
                        self.emu.borrow_mut().step_instr();
                        self.current();
                        Ok(CommandStatus::Done)
                    }
                },
            )
            .add(
                "t",
                command! {
                    "Run N base ticks (stops early on a breakpoint)",
                    (n:u64) => |n| {
                        let done = self.emu.borrow_mut().run_ticks(n);
                        eprintln!("ran {done} ticks");
                        self.current();
                        Ok(CommandStatus::Done)
                    }
                },
            )
            .add(
                "pr",
                command! {
                    "Print the machine state",
                    () => || {
                        let emu = self.emu.borrow();
                        eprintln!("{}", emu.snapshot());
                        let stack: Vec<String> =
                            emu.cpu.regs.stack().map(|ret| format!("{ret:03X}")).collect();
                        eprintln!("stack [{}] bSA={:03X}", stack.join(", "), emu.cpu.regs.bsa());
                        Ok(CommandStatus::Done)
                    }
                },
            )
            .add(
                "peek",
                command! {
                    "Peek the instruction word at a PC address",
                    (addr:String) => |addr: String| {
                        let Some(addr) = parse_number(&addr) else {
                            eprintln!("bad address {addr:?}");
                            return Ok(CommandStatus::Done);
                        };
                        let word = self.emu.borrow().mem.fetch(addr as u16);
                        eprintln!("{:03X}={word:04X}  {}", addr & 0xFFF, Instruction::decode(word));
                        Ok(CommandStatus::Done)
                    }
                },
            )
            .add(
                "xpeek",
                command! {
                    "Peek a byte from data memory",
                    (addr:String) => |addr: String| {
                        let emu = self.emu.borrow();
                        match parse_number(&addr).and_then(|a| emu.mem.external.get(a as usize)) {
                            Some(v) => eprintln!("{addr}={v:02X}"),
                            None => eprintln!("bad address {addr:?}"),
                        }
                        Ok(CommandStatus::Done)
                    }
                },
            )
            .add(
                "poke",
                command! {
                    "Apply a state patch, e.g. PC=0x10;SR{3:5};GR{0:{4:7}};MEMORY[0x20,0xABCD]",
                    (patch:String) => |patch: String| {
                        let rejected = self.emu.borrow_mut().poke(&patch);
                        for err in rejected {
                            eprintln!("skipped: {err}");
                        }
                        Ok(CommandStatus::Done)
                    }
                },
            )
            .add(
                "b",
                command! {
                    "Set a breakpoint",
                    (addr:String) => |addr: String| {
                        let res = match parse_number(&addr) {
                            Some(addr) => self.emu.borrow_mut().add_breakpoint(addr),
                            None => {
                                eprintln!("bad address {addr:?}");
                                return Ok(CommandStatus::Done);
                            }
                        };
                        if let Err(e) = res {
                            eprintln!("{e}");
                        }
                        Ok(CommandStatus::Done)
                    }
                },
            )
            .add(
                "d",
                command! {
                    "Clear a breakpoint",
                    (addr:String) => |addr: String| {
                        let removed = parse_number(&addr)
                            .is_some_and(|addr| self.emu.borrow_mut().remove_breakpoint(addr));
                        if !removed {
                            eprintln!("no breakpoint at {addr}");
                        }
                        Ok(CommandStatus::Done)
                    }
                },
            )
            .add(
                "bl",
                command! {
                    "List breakpoints",
                    () => || {
                        let emu = self.emu.borrow();
                        let mut points: Vec<u16> = emu.breakpoints().collect();
                        points.sort_unstable();
                        for addr in points {
                            eprintln!("{addr:03X}");
                        }
                        Ok(CommandStatus::Done)
                    }
                },
            )
            .add(
                "press",
                command! {
                    "Press a button by name (left, right, mode, transmit) or key line (0-7)",
                    (key:String) => |key: String| {
                        let Some(line) = key_line(&key) else {
                            eprintln!("unknown key {key:?}");
                            return Ok(CommandStatus::Done);
                        };
                        if let Err(e) = self.emu.borrow_mut().press(line) {
                            eprintln!("{e}");
                        }
                        Ok(CommandStatus::Done)
                    }
                },
            )
            .add(
                "release",
                command! {
                    "Release a button by name or key line",
                    (key:String) => |key: String| {
                        let Some(line) = key_line(&key) else {
                            eprintln!("unknown key {key:?}");
                            return Ok(CommandStatus::Done);
                        };
                        if let Err(e) = self.emu.borrow_mut().release(line) {
                            eprintln!("{e}");
                        }
                        Ok(CommandStatus::Done)
                    }
                },
            )
            .add(
                "rx",
                command! {
                    "Deliver a byte on the serial input",
                    (byte:String) => |byte: String| {
                        match parse_number(&byte).and_then(|b| u8::try_from(b).ok()) {
                            Some(b) => self.emu.borrow_mut().receive(b),
                            None => eprintln!("bad byte {byte:?}"),
                        }
                        Ok(CommandStatus::Done)
                    }
                },
            )
            .add(
                "lcd",
                command! {
                    "Print the LCD",
                    () => || {
                        eprint!("{}", self.emu.borrow().lcd.render_text());
                        Ok(CommandStatus::Done)
                    }
                },
            )
            .add(
                "reset",
                command! {
                    "Reset the CPU and LCD, keeping memory",
                    () => || {
                        self.emu.borrow_mut().reset();
                        Ok(CommandStatus::Done)
                    }
                },
            )
            .add(
                "halt",
                command! {
                    "Halt execution",
                    () => || {
                        self.emu.borrow_mut().state = EmuState::Halt;
                        Ok(CommandStatus::Quit)
                    }
                },
            )
            .build()?;
        eprintln!("watch4 debugger");
        'repl: loop {
            eprintln!();
            self.current();

            let status = repl.next()?;
            if let LoopStatus::Break = status {
                break 'repl;
            }
            {
                let emu = self.emu.borrow();
                if let EmuState::Halt = emu.state {
                    break 'repl;
                }
            }
        }
        // leaving the prompt any other way (eof, ^D) resumes execution
        let mut emu = self.emu.borrow_mut();
        if emu.state == EmuState::Pause {
            emu.state = EmuState::Continue;
        }
        Ok(())
    }
}
