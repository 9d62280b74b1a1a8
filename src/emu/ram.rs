use std::path::Path;

use rustc_hash::FxHashSet;

use crate::plat::{EXTERNAL_SIZE, INTERNAL_SIZE, PC_MASK, SA_MASK};

use super::{EmuError, Region};

/// The memory bus: program memory, data memory behind the auto-incrementing `SA` pointer,
/// and a set of word indices touched since the last [`MemoryBus::drain`].
///
/// Word indices cover one combined map with the external region placed after the internal one.
pub struct MemoryBus {
    pub internal: Box<[u8]>,
    pub external: Box<[u8]>,
    sa: u16,
    dirty: FxHashSet<usize>,
}

impl MemoryBus {
    /// Creates a new [`MemoryBus`] with both regions zeroed.
    pub fn new() -> Self {
        Self {
            internal: vec![0u8; INTERNAL_SIZE].into_boxed_slice(),
            external: vec![0u8; EXTERNAL_SIZE].into_boxed_slice(),
            sa: 0,
            dirty: FxHashSet::default(),
        }
    }

    /// Resolves a byte address in the combined map to its region and offset.
    fn locate(addr: usize) -> Option<(Region, usize)> {
        match addr {
            a if a < INTERNAL_SIZE => Some((Region::Internal, a)),
            a if a < INTERNAL_SIZE + EXTERNAL_SIZE => Some((Region::External, a - INTERNAL_SIZE)),
            _ => None,
        }
    }

    fn byte(&self, addr: usize) -> u8 {
        match Self::locate(addr) {
            Some((Region::Internal, a)) => self.internal[a],
            Some((Region::External, a)) => self.external[a],
            None => 0,
        }
    }

    /// Fetches the big-endian instruction word for `pc`. Words 3072 and up come from
    /// the data region.
    pub fn fetch(&self, pc: u16) -> u16 {
        let addr = (pc & PC_MASK) as usize * 2;
        u16::from_be_bytes([self.byte(addr), self.byte(addr + 1)])
    }

    pub fn sa(&self) -> u16 {
        self.sa
    }

    pub fn set_sa(&mut self, sa: u16) {
        self.sa = sa & SA_MASK;
    }

    /// Reads the byte at `SA`, then increments `SA`.
    pub fn read_external(&mut self) -> u8 {
        let v = self.external[self.sa as usize];
        self.sa = (self.sa + 1) & SA_MASK;
        v
    }

    /// Reads the low nibble of the byte at `SA` without moving `SA`.
    pub fn read_external_nibble(&self) -> u8 {
        self.external[self.sa as usize] & 0xF
    }

    /// Writes a byte at `SA`, then increments `SA`.
    pub fn write_external(&mut self, v: u8) {
        let addr = self.sa as usize;
        self.external[addr] = v;
        self.dirty.insert((INTERNAL_SIZE + addr) >> 1);
        self.sa = (self.sa + 1) & SA_MASK;
    }

    /// Writes one byte into a region at an explicit address. Out-of-range addresses are ignored.
    pub fn write_raw(&mut self, region: Region, addr: usize, v: u8) {
        let (mem, base) = match region {
            Region::Internal => (&mut self.internal, 0),
            Region::External => (&mut self.external, INTERNAL_SIZE),
        };
        if let Some(b) = mem.get_mut(addr) {
            *b = v;
            self.dirty.insert((base + addr) >> 1);
        }
    }

    /// Writes a big-endian word at byte address `addr` of the combined map.
    pub fn write_raw_word(&mut self, addr: usize, v: u16) {
        for (i, b) in v.to_be_bytes().into_iter().enumerate() {
            if let Some((region, a)) = Self::locate(addr + i) {
                self.write_raw(region, a, b);
            }
        }
    }

    /// Fills a region from `data`, zero-padding or truncating to the region size,
    /// and marks the whole region dirty.
    pub fn load(&mut self, region: Region, data: &[u8]) {
        let (mem, base) = match region {
            Region::Internal => (&mut self.internal, 0),
            Region::External => (&mut self.external, INTERNAL_SIZE),
        };
        let n = data.len().min(mem.len());
        mem[..n].copy_from_slice(&data[..n]);
        mem[n..].fill(0);
        let words = base / 2..(base + mem.len()) / 2;
        self.dirty.extend(words);
    }

    /// Loads a region from a file. A missing or unreadable file zero-fills the region
    /// and is reported back as [`EmuError::MissingImage`]; the bus stays usable either way.
    pub fn load_file(&mut self, region: Region, path: &Path) -> Result<(), EmuError> {
        match std::fs::read(path) {
            Ok(data) => {
                log::info!("loaded {} bytes into {region} memory from {path:?}", data.len());
                self.load(region, &data);
                Ok(())
            }
            Err(source) => {
                self.load(region, &[]);
                Err(EmuError::MissingImage {
                    region,
                    path: path.to_path_buf(),
                    source,
                })
            }
        }
    }

    /// Returns the word indices written since the previous drain, sorted, and clears the set.
    pub fn drain(&mut self) -> Vec<usize> {
        let mut words: Vec<usize> = self.dirty.drain().collect();
        words.sort_unstable();
        words
    }
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rom_round_trip() {
        let mut mem = MemoryBus::new();
        let mut rom = vec![0u8; INTERNAL_SIZE];
        rom[0] = 0xAB;
        rom[1] = 0xCD;
        rom[INTERNAL_SIZE - 1] = 0x42;
        mem.load(Region::Internal, &rom);
        assert_eq!(mem.fetch(0), 0xABCD);
        assert_eq!(mem.fetch(0x17FF & PC_MASK) & 0xFF, 0);
        assert_eq!(mem.fetch(3071), 0x0042);
    }

    #[test]
    fn test_load_pads_and_truncates() {
        let mut mem = MemoryBus::new();
        mem.external.fill(0xFF);
        mem.load(Region::External, &[1, 2, 3]);
        assert_eq!(&mem.external[..4], &[1, 2, 3, 0]);
        let words = mem.drain();
        assert_eq!(words.len(), EXTERNAL_SIZE / 2);
        assert_eq!(words[0], INTERNAL_SIZE / 2);

        mem.load(Region::External, &vec![7u8; EXTERNAL_SIZE + 100]);
        assert_eq!(mem.external.len(), EXTERNAL_SIZE);
        assert!(mem.external.iter().all(|&b| b == 7));
    }

    #[test]
    fn test_dirty_drain() {
        let mut mem = MemoryBus::new();
        mem.write_raw(Region::Internal, 10, 1);
        mem.write_raw(Region::Internal, 20, 2);
        assert_eq!(mem.drain(), vec![5, 10]);
        assert!(mem.drain().is_empty());
    }

    #[test]
    fn test_external_auto_increment() {
        let mut mem = MemoryBus::new();
        mem.set_sa(0x7FF);
        mem.write_external(0x5A);
        assert_eq!(mem.sa(), 0);
        mem.set_sa(0xFFFF);
        assert_eq!(mem.sa(), 0x7FF);
        assert_eq!(mem.read_external_nibble(), 0xA);
        assert_eq!(mem.sa(), 0x7FF);
        assert_eq!(mem.read_external(), 0x5A);
        assert_eq!(mem.sa(), 0);
    }

    #[test]
    fn test_write_raw_word() {
        let mut mem = MemoryBus::new();
        mem.write_raw_word(0x20, 0xBEEF);
        assert_eq!(mem.fetch(0x10), 0xBEEF);
        assert_eq!(mem.drain(), vec![0x10]);
        mem.set_sa(2);
        mem.write_external(1);
        assert_eq!(mem.drain(), vec![INTERNAL_SIZE / 2 + 1]);
    }

    #[test]
    fn test_combined_map() {
        let mut mem = MemoryBus::new();
        mem.external[0] = 0xAB;
        mem.external[1] = 0xCD;
        assert_eq!(mem.fetch(0xC00), 0xABCD);
        assert_eq!(mem.fetch(0xFFF), 0);

        mem.write_raw_word(INTERNAL_SIZE + 2, 0x1234);
        assert_eq!(&mem.external[2..4], &[0x12, 0x34]);
        assert_eq!(mem.fetch(0xC01), 0x1234);
        assert_eq!(mem.drain(), vec![3073]);

        // straddles the two regions
        mem.write_raw_word(INTERNAL_SIZE - 1, 0x5678);
        assert_eq!(mem.internal[INTERNAL_SIZE - 1], 0x56);
        assert_eq!(mem.external[0], 0x78);

        // the last byte falls off the end of the map
        mem.write_raw_word(INTERNAL_SIZE + EXTERNAL_SIZE - 1, 0x9ABC);
        assert_eq!(mem.external[EXTERNAL_SIZE - 1], 0x9A);
    }

    #[test]
    fn test_load_file() {
        let path = std::env::temp_dir().join(format!("watch4-{}.rom", std::process::id()));
        let mut rom = vec![0u8; INTERNAL_SIZE];
        rom[0x20] = 0xBE;
        rom[0x21] = 0xEF;
        rom[INTERNAL_SIZE - 2] = 0x12;
        rom[INTERNAL_SIZE - 1] = 0x34;
        std::fs::write(&path, &rom).unwrap();

        let mut mem = MemoryBus::new();
        let res = mem.load_file(Region::Internal, &path);
        std::fs::remove_file(&path).unwrap();
        assert!(res.is_ok());
        assert_eq!(mem.fetch(0x10), 0xBEEF);
        assert_eq!(mem.fetch(0xBFF), 0x1234);
        assert_eq!(&mem.internal[..], &rom[..]);
        assert_eq!(mem.drain().len(), INTERNAL_SIZE / 2);
    }

    #[test]
    fn test_missing_file_zero_fills() {
        let mut mem = MemoryBus::new();
        mem.internal[0] = 9;
        let err = mem.load_file(Region::Internal, Path::new("/nonexistent/watch4.rom"));
        assert!(matches!(err, Err(EmuError::MissingImage { .. })));
        assert_eq!(mem.internal[0], 0);
    }
}
