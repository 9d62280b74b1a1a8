//! The character LCD controller and its rasterizer.

use super::charset::{self, GLYPH_HEIGHT, GLYPH_WIDTH};

pub const CHAR_COLS: usize = 10;
pub const CHAR_ROWS: usize = 4;
/// Cells addressable in DDRAM/DARAM.
pub const CELL_COUNT: usize = 64;
pub const DCTRL_COUNT: usize = 16;

pub const SCREEN_WIDTH: usize = CHAR_COLS * GLYPH_WIDTH;
pub const SCREEN_HEIGHT: usize = CHAR_ROWS * GLYPH_HEIGHT;

pub const DDRAM_BASE: u8 = 0;
pub const DARAM_BASE: u8 = 64;
pub const DCTRL_BASE: u8 = 112;

/// A write of an odd value here draws one direct-draw column even with direct-draw mode off.
pub const DIRECT_DRAW_TRIGGER: u8 = 127;

/// One past the last scan position.
pub const SCAN_END: u16 = 512;
/// Display ticks per blink toggle.
const BLINK_MASK: u64 = 0x3FF;

const MAX_CONTRAST: u8 = 32;
const INITIAL_CONTRAST: u8 = 16;

const BLINK_SOLID: u8 = 0xFF;
const BLINK_BLANK: u8 = 0x20;

/// The display control registers, addressed at `DCTRL_BASE + index`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Ctrl {
    TopHalf = 0,
    BottomHalf,
    Reserved2,
    Reserved3,
    ScanStop,
    BlinkEnable,
    TestFill,
    DirectDraw,
    AutoRedraw,
    ContrastUp,
    ContrastDown,
    ClearCtrl,
    ForceRedraw,
    ClearDdram,
    ClearDaram,
    ResetScan,
}

impl From<u8> for Ctrl {
    fn from(value: u8) -> Self {
        match value & 0xF {
            0 => Self::TopHalf,
            1 => Self::BottomHalf,
            2 => Self::Reserved2,
            3 => Self::Reserved3,
            4 => Self::ScanStop,
            5 => Self::BlinkEnable,
            6 => Self::TestFill,
            7 => Self::DirectDraw,
            8 => Self::AutoRedraw,
            9 => Self::ContrastUp,
            10 => Self::ContrastDown,
            11 => Self::ClearCtrl,
            12 => Self::ForceRedraw,
            13 => Self::ClearDdram,
            14 => Self::ClearDaram,
            _ => Self::ResetScan,
        }
    }
}

/// The LCD controller.
///
/// The pixel buffer is derived state: it is rebuilt incrementally from DDRAM/DARAM
/// by the scan cursor, or painted directly in direct-draw mode.
pub struct Lcd {
    pub ddram: [u8; CELL_COUNT],
    pub daram: [u8; CELL_COUNT],
    pub dctrl: [u8; DCTRL_COUNT],
    pixels: Box<[u8]>,
    la: u8,
    contrast: u8,
    /// Opacity of an off and an on pixel.
    opacity: [f32; 2],
    blink_char: u8,
    frame: u64,
    scan: u16,
    /// `[dot x, dot y]` mirror offsets for the top and bottom half.
    reflects: [[u8; 2]; 2],
}

impl Lcd {
    pub fn new() -> Self {
        let mut lcd = Self {
            ddram: [0; CELL_COUNT],
            daram: [0; CELL_COUNT],
            dctrl: [0; DCTRL_COUNT],
            pixels: vec![0u8; SCREEN_WIDTH * SCREEN_HEIGHT].into_boxed_slice(),
            la: 0,
            contrast: INITIAL_CONTRAST,
            opacity: [0.0; 2],
            blink_char: 0,
            frame: 0,
            scan: 0,
            reflects: [[0, 0], [0, 0]],
        };
        lcd.update_opacity();
        lcd
    }

    pub fn la(&self) -> u8 {
        self.la
    }

    pub fn set_la(&mut self, la: u8) {
        self.la = la;
    }

    pub fn contrast(&self) -> u8 {
        self.contrast
    }

    pub fn scan(&self) -> u16 {
        self.scan
    }

    /// `(off, on)` pixel opacity.
    pub fn opacity(&self) -> (f32, f32) {
        (self.opacity[0], self.opacity[1])
    }

    fn ctrl(&self, reg: Ctrl) -> bool {
        self.dctrl[reg as usize] != 0
    }

    /// Writes at `LA`, then advances `LA`.
    pub fn write(&mut self, v: u8) {
        self.write_addr(self.la, v);
        self.la = self.la.wrapping_add(1);
    }

    /// Writes at an explicit address without touching `LA`.
    pub fn write_addr(&mut self, addr: u8, v: u8) {
        if self.ctrl(Ctrl::DirectDraw) || (addr == DIRECT_DRAW_TRIGGER && v & 1 != 0) {
            if !self.ctrl(Ctrl::TestFill) && self.scan < SCAN_END {
                self.direct_draw(self.scan, v);
            }
            self.scan = (self.scan + 1).min(SCAN_END);
        }

        match addr {
            a if a < DARAM_BASE => self.ddram[(a - DDRAM_BASE) as usize] = v,
            a if a < DCTRL_BASE => self.daram[(a - DARAM_BASE) as usize] = v & 1,
            a if (a as usize) < DCTRL_BASE as usize + DCTRL_COUNT => {
                self.write_ctrl(Ctrl::from(a - DCTRL_BASE), v)
            }
            _ => {}
        }
    }

    fn write_ctrl(&mut self, reg: Ctrl, v: u8) {
        log::debug!("lcd control {reg:?} <- {v:#X}");
        let idx = reg as usize;
        match reg {
            Ctrl::TopHalf => {
                self.dctrl[idx] = v & 0x3;
                self.reflects[0] = match v & 0x3 {
                    0 => [0, 0],
                    1 => [4, 0],
                    _ => [4, 6],
                };
            }
            Ctrl::BottomHalf => {
                self.dctrl[idx] = v & 0x3;
                self.reflects[1] = match v & 0x3 {
                    0 => [4, 6],
                    1 => [0, 6],
                    _ => [0, 0],
                };
            }
            Ctrl::Reserved2 | Ctrl::Reserved3 => self.dctrl[idx] = v & 0xF,
            Ctrl::ScanStop | Ctrl::BlinkEnable | Ctrl::DirectDraw | Ctrl::AutoRedraw => {
                self.dctrl[idx] = v & 1
            }
            Ctrl::TestFill => {
                self.dctrl[idx] = v & 1;
                if v & 1 != 0 {
                    self.pixels.fill(1);
                    self.opacity[1] = 1.0;
                } else {
                    self.update_opacity();
                }
            }
            Ctrl::ContrastUp => {
                if self.contrast < MAX_CONTRAST {
                    self.contrast += 1;
                    self.update_opacity();
                }
            }
            Ctrl::ContrastDown => {
                if self.contrast > 0 {
                    self.contrast -= 1;
                    self.update_opacity();
                }
            }
            Ctrl::ClearCtrl => self.dctrl = [0; DCTRL_COUNT],
            Ctrl::ForceRedraw => self.dctrl[idx] = 1,
            Ctrl::ClearDdram => self.ddram = [0; CELL_COUNT],
            Ctrl::ClearDaram => self.daram = [0; CELL_COUNT],
            Ctrl::ResetScan => self.scan = 0,
        }
    }

    fn update_opacity(&mut self) {
        let c = self.contrast as i32;
        self.opacity[0] = ((c - 15) * 6).max(0) as f32 / 255.0;
        self.opacity[1] = (15 * c).min(255) as f32 / 255.0;
    }

    /// Advances the controller by one base tick.
    pub fn clock(&mut self) {
        if self.frame & BLINK_MASK == 0 {
            if self.ctrl(Ctrl::AutoRedraw) {
                self.scan = 0;
            }
            self.blink_char = if self.blink_char != 0 {
                0
            } else if self.ctrl(Ctrl::BlinkEnable) {
                BLINK_SOLID
            } else {
                BLINK_BLANK
            };
        }

        if !self.ctrl(Ctrl::DirectDraw) {
            if !self.ctrl(Ctrl::ScanStop) && !self.ctrl(Ctrl::TestFill) && self.scan < SCAN_END {
                self.draw_scanline(self.scan);
            }
            self.scan = (self.scan + 4).min(SCAN_END);
        }

        if self.ctrl(Ctrl::ForceRedraw) && self.scan >= SCAN_END {
            self.scan = 0;
            self.dctrl[Ctrl::ForceRedraw as usize] = 0;
        }

        self.frame += 1;
    }

    /// Renders one dot row of up to four cells from glyph data.
    fn draw_scanline(&mut self, c: u16) {
        let mut dot_y = ((c >> 4) & 0x7) as usize;
        let col = (c & 0xF) as usize;
        let mut start = col.saturating_sub(1);
        let mut stop = (col + 3).min(CHAR_COLS);
        if start >= CHAR_COLS || dot_y >= GLYPH_HEIGHT {
            return;
        }

        let mut char_y = ((c >> 7) & 0x3) as usize;
        if char_y > 1 {
            char_y ^= 1;
            dot_y = GLYPH_HEIGHT - 1 - dot_y;
            (start, stop) = (CHAR_COLS - stop, CHAR_COLS - start);
        }
        let [rx, ry] = self.reflects[char_y >> 1];
        let row = (ry as usize).abs_diff(dot_y);
        let offset_y = (char_y * GLYPH_HEIGHT + dot_y) * SCREEN_WIDTH;

        for char_x in start..stop {
            let pos = char_y * CHAR_COLS + char_x;
            let code = if self.daram[pos] != 0 && self.blink_char != 0 {
                self.blink_char
            } else {
                self.ddram[pos]
            };
            for dot_x in 0..GLYPH_WIDTH {
                self.pixels[offset_y + char_x * GLYPH_WIDTH + dot_x] =
                    charset::dot(code, (rx as usize).abs_diff(dot_x), row);
            }
        }
    }

    /// Paints five raw bits at scan position `c`. The top half puts bit 0 in the leftmost dot;
    /// the bottom half is reflected, so bit 4 lands leftmost there.
    fn direct_draw(&mut self, c: u16, mut v: u8) {
        let mut dot_y = ((c >> 4) & 0x7) as usize;
        let mut char_x = (c & 0xF) as usize;
        if char_x >= CHAR_COLS || dot_y >= GLYPH_HEIGHT {
            return;
        }

        let mut char_y = ((c >> 7) & 0x3) as usize;
        let mut reflect = 0;
        if char_y > 1 {
            char_y ^= 1;
            dot_y = GLYPH_HEIGHT - 1 - dot_y;
            char_x = CHAR_COLS - 1 - char_x;
            reflect = GLYPH_WIDTH - 1;
        }
        let offset_y = (char_y * GLYPH_HEIGHT + dot_y) * SCREEN_WIDTH;
        for dot_x in 0..GLYPH_WIDTH {
            self.pixels[offset_y + char_x * GLYPH_WIDTH + reflect.abs_diff(dot_x)] = v & 1;
            v >>= 1;
        }
    }

    /// Raw on/off state of every pixel, row-major.
    pub fn pixel_bits(&self) -> &[u8] {
        &self.pixels
    }

    /// Opacity of every pixel, row-major.
    pub fn pixels(&self) -> impl Iterator<Item = f32> + '_ {
        let opacity = self.opacity;
        self.pixels.iter().map(move |&p| opacity[(p & 1) as usize])
    }

    pub fn set_ddram(&mut self, addr: u8, v: u8) {
        self.write_addr(addr.wrapping_add(DDRAM_BASE), v);
    }

    pub fn set_daram(&mut self, addr: u8, v: u8) {
        self.write_addr(addr.wrapping_add(DARAM_BASE), v);
    }

    pub fn set_dctrl(&mut self, addr: u8, v: u8) {
        self.write_addr(addr.wrapping_add(DCTRL_BASE), v);
    }

    /// The pixel buffer as text, one line per dot row.
    pub fn render_text(&self) -> String {
        let mut out = String::with_capacity((SCREEN_WIDTH + 1) * SCREEN_HEIGHT);
        for row in self.pixels.chunks(SCREEN_WIDTH) {
            out.extend(row.iter().map(|&p| if p != 0 { '#' } else { '.' }));
            out.push('\n');
        }
        out
    }
}

impl Default for Lcd {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Enough ticks for the scan cursor to sweep the whole screen once.
    const FULL_SCAN: usize = SCAN_END as usize / 4;

    #[test]
    fn test_fill_forces_max_opacity() {
        let mut lcd = Lcd::new();
        lcd.set_dctrl(Ctrl::TestFill as u8, 1);
        assert!(lcd.pixels().all(|p| p == 1.0));

        lcd.set_dctrl(Ctrl::TestFill as u8, 0);
        let (off, on) = lcd.opacity();
        assert_eq!(off, 6.0 / 255.0);
        assert_eq!(on, 240.0 / 255.0);
        assert!(lcd.pixels().all(|p| p == on));
    }

    #[test]
    fn test_contrast_clamps() {
        let mut lcd = Lcd::new();
        for _ in 0..40 {
            lcd.write_addr(DCTRL_BASE + Ctrl::ContrastUp as u8, 0);
        }
        assert_eq!(lcd.contrast(), 32);
        assert_eq!(lcd.opacity(), ((17.0 * 6.0) / 255.0, 1.0));
        for _ in 0..40 {
            lcd.write_addr(DCTRL_BASE + Ctrl::ContrastDown as u8, 0);
        }
        assert_eq!(lcd.contrast(), 0);
        assert_eq!(lcd.opacity(), (0.0, 0.0));
    }

    #[test]
    fn test_write_advances_la() {
        let mut lcd = Lcd::new();
        lcd.set_la(0xFF);
        lcd.write(0x41);
        assert_eq!(lcd.la(), 0);
        lcd.write(0x42);
        assert_eq!(lcd.ddram[0], 0x42);
        assert_eq!(lcd.la(), 1);
    }

    #[test]
    fn test_address_map() {
        let mut lcd = Lcd::new();
        lcd.write_addr(63, 0x33);
        lcd.write_addr(DARAM_BASE + 3, 0xFF);
        lcd.write_addr(DCTRL_BASE + Ctrl::BlinkEnable as u8, 0xF);
        assert_eq!(lcd.ddram[63], 0x33);
        assert_eq!(lcd.daram[3], 1);
        assert_eq!(lcd.dctrl[5], 1);
        lcd.write_addr(DCTRL_BASE + Ctrl::ClearCtrl as u8, 0);
        assert_eq!(lcd.dctrl, [0; DCTRL_COUNT]);
        lcd.write_addr(DCTRL_BASE + Ctrl::ClearDdram as u8, 0);
        lcd.write_addr(DCTRL_BASE + Ctrl::ClearDaram as u8, 0);
        assert_eq!(lcd.ddram, [0; CELL_COUNT]);
        assert_eq!(lcd.daram, [0; CELL_COUNT]);
        // past the control block nothing is stored
        lcd.write_addr(200, 7);
        assert_eq!(lcd.ddram, [0; CELL_COUNT]);
    }

    #[test]
    fn test_scanline_draws_glyph() {
        let mut lcd = Lcd::new();
        lcd.ddram[0] = b'L';
        for _ in 0..FULL_SCAN {
            lcd.clock();
        }
        let px = lcd.pixel_bits();
        assert_eq!(px[0], 1);
        assert_eq!(px[4], 0);
        assert_eq!(px[6 * SCREEN_WIDTH + 4], 1);
        assert_eq!(lcd.scan(), SCAN_END);
    }

    #[test]
    fn test_top_half_mirroring() {
        let mut lcd = Lcd::new();
        lcd.ddram[0] = b'L';
        lcd.set_dctrl(Ctrl::TopHalf as u8, 1);
        for _ in 0..FULL_SCAN {
            lcd.clock();
        }
        // horizontally mirrored 'L' has its stem on the right
        let px = lcd.pixel_bits();
        assert_eq!(px[0], 0);
        assert_eq!(px[4], 1);
    }

    #[test]
    fn test_direct_draw() {
        let mut lcd = Lcd::new();
        lcd.set_dctrl(Ctrl::DirectDraw as u8, 1);
        assert_eq!(lcd.scan(), 0);
        lcd.write(0b10101);
        assert_eq!(&lcd.pixel_bits()[..5], &[1, 0, 1, 0, 1]);
        assert_eq!(lcd.scan(), 1);
        lcd.write(0b00011);
        assert_eq!(&lcd.pixel_bits()[5..10], &[1, 1, 0, 0, 0]);

        // the scan cursor does not move on its own in direct-draw mode
        lcd.clock();
        assert_eq!(lcd.scan(), 2);
    }

    #[test]
    fn test_force_redraw_wraps_scan() {
        let mut lcd = Lcd::new();
        for _ in 0..FULL_SCAN {
            lcd.clock();
        }
        assert_eq!(lcd.scan(), SCAN_END);
        lcd.set_dctrl(Ctrl::ForceRedraw as u8, 1);
        lcd.clock();
        assert_eq!(lcd.scan(), 0);
        assert_eq!(lcd.dctrl[Ctrl::ForceRedraw as usize], 0);
    }

    #[test]
    fn test_blink_shows_blink_glyph() {
        let mut lcd = Lcd::new();
        lcd.ddram[0] = b' ';
        lcd.set_daram(0, 1);
        lcd.set_dctrl(Ctrl::BlinkEnable as u8, 1);
        lcd.set_dctrl(Ctrl::AutoRedraw as u8, 1);
        // first tick toggles the blink glyph on
        for _ in 0..FULL_SCAN {
            lcd.clock();
        }
        assert!(lcd.pixel_bits()[..5].iter().all(|&p| p == 1));
    }

    #[test]
    fn test_bottom_half_mirror_modes() {
        let mut lcd = Lcd::new();
        // row 2, column 0 draws at dot rows 14..21 and dot columns 0..5
        lcd.ddram[20] = b'L';
        let at = |lcd: &Lcd, x: usize, y: usize| lcd.pixel_bits()[(14 + y) * SCREEN_WIDTH + x];
        for _ in 0..FULL_SCAN {
            lcd.clock();
        }
        assert_eq!((at(&lcd, 0, 0), at(&lcd, 4, 0), at(&lcd, 4, 6)), (1, 0, 1));

        // mode 0 turns the glyph half a turn
        lcd.set_dctrl(Ctrl::BottomHalf as u8, 0);
        lcd.set_dctrl(Ctrl::ResetScan as u8, 1);
        for _ in 0..FULL_SCAN {
            lcd.clock();
        }
        assert_eq!((at(&lcd, 0, 0), at(&lcd, 0, 6), at(&lcd, 4, 6)), (1, 0, 1));
        assert_eq!((at(&lcd, 0, 3), at(&lcd, 4, 3)), (0, 1));

        // mode 1 flips it vertically
        lcd.set_dctrl(Ctrl::BottomHalf as u8, 1);
        lcd.set_dctrl(Ctrl::ResetScan as u8, 1);
        for _ in 0..FULL_SCAN {
            lcd.clock();
        }
        assert_eq!((at(&lcd, 0, 0), at(&lcd, 4, 0)), (1, 1));
        assert_eq!((at(&lcd, 0, 6), at(&lcd, 4, 6)), (1, 0));

        // mode 2 draws it upright
        lcd.set_dctrl(Ctrl::BottomHalf as u8, 2);
        lcd.set_dctrl(Ctrl::ResetScan as u8, 1);
        for _ in 0..FULL_SCAN {
            lcd.clock();
        }
        assert_eq!((at(&lcd, 0, 0), at(&lcd, 4, 0), at(&lcd, 4, 6)), (1, 0, 1));
        // the top half is untouched
        assert!(lcd.pixel_bits()[..14 * SCREEN_WIDTH].iter().all(|&p| p == 0));
    }

    #[test]
    fn test_bottom_half_direct_draw() {
        let mut lcd = Lcd::new();
        for _ in 0..64 {
            lcd.clock();
        }
        assert_eq!(lcd.scan(), 256);
        lcd.set_dctrl(Ctrl::DirectDraw as u8, 1);
        assert_eq!(lcd.scan(), 256);

        // scan 256 is the first column of the bottom half, reflected to the last dot row
        // and the last cell, with bit 0 rightmost
        lcd.write(0b00011);
        let row = 27 * SCREEN_WIDTH;
        assert_eq!(&lcd.pixel_bits()[row + 45..row + 50], &[0, 0, 0, 1, 1]);
        lcd.write(0b10000);
        assert_eq!(&lcd.pixel_bits()[row + 40..row + 45], &[1, 0, 0, 0, 0]);
        assert_eq!(lcd.scan(), 258);
    }

    #[test]
    fn test_scan_stop_and_reset() {
        let mut lcd = Lcd::new();
        lcd.ddram[0] = b'L';
        lcd.set_dctrl(Ctrl::ScanStop as u8, 1);
        for _ in 0..FULL_SCAN {
            lcd.clock();
        }
        // the cursor still sweeps but nothing is drawn
        assert_eq!(lcd.scan(), SCAN_END);
        assert!(lcd.pixel_bits().iter().all(|&p| p == 0));

        lcd.set_dctrl(Ctrl::ScanStop as u8, 0);
        lcd.write_addr(DCTRL_BASE + Ctrl::ResetScan as u8, 0);
        assert_eq!(lcd.scan(), 0);
        assert_eq!(lcd.dctrl[Ctrl::ResetScan as usize], 0);
        for _ in 0..FULL_SCAN {
            lcd.clock();
        }
        assert_eq!(lcd.pixel_bits()[0], 1);
    }

    #[test]
    fn test_auto_redraw_every_1024_ticks() {
        let mut lcd = Lcd::new();
        lcd.set_dctrl(Ctrl::AutoRedraw as u8, 1);
        for _ in 0..1024 {
            lcd.clock();
        }
        assert_eq!(lcd.scan(), SCAN_END);
        lcd.clock();
        assert_eq!(lcd.scan(), 4);

        let mut lcd = Lcd::new();
        for _ in 0..1025 {
            lcd.clock();
        }
        assert_eq!(lcd.scan(), SCAN_END);
    }
}
