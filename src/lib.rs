//! Emulator for a 4-bit watch/calculator microcontroller with a character LCD.

pub mod emu;
pub mod plat;
