//! Collaborators on the far side of the chip's audio and serial pins.

/// Receives buzzer commands issued by writes to SR15.
pub trait AudioSink {
    fn play_tone(&mut self);
    fn start_tremolo(&mut self);
    fn stop_tremolo(&mut self);
}

/// Receives bytes shifted out by the serial port.
pub trait SerialSink {
    fn transmit(&mut self, byte: u8);
}

/// Logs buzzer commands.
#[derive(Debug, Default)]
pub struct LogAudio {
    tremolo: bool,
}

impl LogAudio {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AudioSink for LogAudio {
    fn play_tone(&mut self) {
        log::debug!("beep (tremolo: {})", self.tremolo);
    }

    fn start_tremolo(&mut self) {
        self.tremolo = true;
        log::debug!("tremolo on");
    }

    fn stop_tremolo(&mut self) {
        self.tremolo = false;
        log::debug!("tremolo off");
    }
}

/// Discards buzzer commands.
#[derive(Debug, Default)]
pub struct Mute;

impl AudioSink for Mute {
    fn play_tone(&mut self) {}
    fn start_tremolo(&mut self) {}
    fn stop_tremolo(&mut self) {}
}

/// Logs transmitted bytes.
#[derive(Debug, Default)]
pub struct LogSerial;

impl SerialSink for LogSerial {
    fn transmit(&mut self, byte: u8) {
        log::debug!("serial tx {byte:#04X}");
    }
}

/// Discards transmitted bytes.
#[derive(Debug, Default)]
pub struct NullSerial;

impl SerialSink for NullSerial {
    fn transmit(&mut self, _byte: u8) {}
}

/// Collects transmitted bytes.
impl SerialSink for Vec<u8> {
    fn transmit(&mut self, byte: u8) {
        self.push(byte);
    }
}
