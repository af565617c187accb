//! Atari 2600 cartridge handling and banking
//!
//! The 6507 sees 4KB of cartridge space ($1000-$1FFF). Larger ROMs expose one
//! 4KB bank at a time and switch banks when the program touches a "hotspot"
//! address inside the window; the data read or written is irrelevant, the
//! access itself toggles the bank. Hotspots sit in ROM, so the access that
//! switches is usually an ordinary read — which is why the hotspot must be
//! observed *before* the byte is returned.
//!
//! Supported schemes, auto-detected from ROM size (there is no header):
//!
//! - **2K / 4K**: no banking; a 2K image is mirrored to fill the window.
//! - **F8 (8K)**: $1FF8 -> bank 0, $1FF9 -> bank 1. Powers on in bank 1,
//!   whose vectors sit at the top of the image.
//! - **F6 (16K)**: $1FF6-$1FF9 -> banks 0-3. Powers on in bank 0.
//!
//! Any other size degrades to a flat 4K image built from the first 4096 bytes
//! (zero-padded when shorter). Only an empty image is rejected.

use log::info;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CartridgeError {
    #[error("empty ROM image")]
    EmptyRom,
}

/// Banking scheme types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BankingScheme {
    /// 2K or 4K ROM, no banking
    Flat,
    /// 8K F8 banking (2x 4K banks)
    F8,
    /// 16K F6 banking (4x 4K banks)
    F6,
}

/// Atari 2600 cartridge
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cartridge {
    /// ROM data (not serialized; re-married to the state on load)
    #[serde(skip)]
    rom: Vec<u8>,
    /// Current bank number
    current_bank: usize,
    /// Banking scheme
    scheme: BankingScheme,
}

impl Cartridge {
    /// Create a new cartridge from ROM data
    pub fn new(rom: Vec<u8>) -> Result<Self, CartridgeError> {
        if rom.is_empty() {
            return Err(CartridgeError::EmptyRom);
        }

        let (scheme, rom, bank) = match rom.len() {
            2048 | 4096 => (BankingScheme::Flat, rom, 0),
            8192 => (BankingScheme::F8, rom, 1),
            16384 => (BankingScheme::F6, rom, 0),
            n => {
                info!("unusual ROM size {n}, treating as flat 4K");
                let mut flat = rom;
                flat.resize(4096, 0);
                (BankingScheme::Flat, flat, 0)
            }
        };
        info!("cartridge: {} bytes, scheme {:?}", rom.len(), scheme);

        Ok(Self {
            rom,
            current_bank: bank,
            scheme,
        })
    }

    /// Read the byte visible in the ROM window at `addr`.
    ///
    /// The access is observed first: some kernels read the hotspot address
    /// itself to switch, and the byte returned must come from the new bank.
    pub fn read_rom(&mut self, addr: u16) -> u8 {
        self.observe_access(addr);
        let offset = match self.scheme {
            BankingScheme::Flat if self.rom.len() == 2048 => (addr & 0x07FF) as usize,
            BankingScheme::Flat => (addr & 0x0FFF) as usize,
            _ => self.current_bank * 4096 + (addr & 0x0FFF) as usize,
        };
        self.rom[offset]
    }

    /// A write landing in the ROM window: nothing is stored, but the access
    /// may hit a hotspot.
    pub fn write_hotspot(&mut self, addr: u16) {
        self.observe_access(addr);
    }

    /// Switch banks if `addr` matches a hotspot of the current scheme.
    fn observe_access(&mut self, addr: u16) {
        match self.scheme {
            BankingScheme::Flat => {}
            BankingScheme::F8 => match addr & 0x0FFF {
                0xFF8 => self.current_bank = 0,
                0xFF9 => self.current_bank = 1,
                _ => {}
            },
            BankingScheme::F6 => match addr & 0x0FFF {
                0xFF6 => self.current_bank = 0,
                0xFF7 => self.current_bank = 1,
                0xFF8 => self.current_bank = 2,
                0xFF9 => self.current_bank = 3,
                _ => {}
            },
        }
    }

    /// Get the current banking scheme
    pub fn scheme(&self) -> BankingScheme {
        self.scheme
    }

    /// Get the current bank number
    pub fn current_bank(&self) -> usize {
        self.current_bank
    }

    /// Restore a bank index from a save state. Out-of-range values are
    /// clamped to the last bank.
    pub fn restore_bank(&mut self, bank: usize) {
        let banks = match self.scheme {
            BankingScheme::Flat => 1,
            BankingScheme::F8 => 2,
            BankingScheme::F6 => 4,
        };
        self.current_bank = bank.min(banks - 1);
    }

    /// Get ROM size
    pub fn size(&self) -> usize {
        self.rom.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_2k_cartridge_mirrors() {
        let mut rom = vec![0x00; 2048];
        rom[0] = 0x42;
        rom[2047] = 0x99;
        let mut cart = Cartridge::new(rom).unwrap();

        assert_eq!(cart.scheme(), BankingScheme::Flat);
        assert_eq!(cart.read_rom(0x1000), 0x42);
        // Second kilobyte window mirrors the first
        assert_eq!(cart.read_rom(0x1800), 0x42);
        assert_eq!(cart.read_rom(0x1FFF), 0x99);
    }

    #[test]
    fn test_4k_cartridge() {
        let mut rom = vec![0x00; 4096];
        rom[0] = 0x12;
        rom[4095] = 0x34;
        let mut cart = Cartridge::new(rom).unwrap();

        assert_eq!(cart.scheme(), BankingScheme::Flat);
        assert_eq!(cart.read_rom(0x1000), 0x12);
        assert_eq!(cart.read_rom(0x1FFF), 0x34);
    }

    #[test]
    fn test_f8_powers_on_in_bank_1() {
        let mut rom = vec![0x00; 8192];
        rom[0x0000] = 0x11;
        rom[0x1000] = 0x22;
        let mut cart = Cartridge::new(rom).unwrap();

        assert_eq!(cart.scheme(), BankingScheme::F8);
        assert_eq!(cart.current_bank(), 1);
        assert_eq!(cart.read_rom(0x1000), 0x22);

        // Reading the hotspot itself switches before the byte comes back
        cart.read_rom(0x1FF8);
        assert_eq!(cart.current_bank(), 0);
        assert_eq!(cart.read_rom(0x1000), 0x11);

        cart.read_rom(0x1FF9);
        assert_eq!(cart.read_rom(0x1000), 0x22);
    }

    #[test]
    fn test_f8_write_hotspot_switches() {
        let mut cart = Cartridge::new(vec![0x00; 8192]).unwrap();
        assert_eq!(cart.current_bank(), 1);
        cart.write_hotspot(0x1FF8);
        assert_eq!(cart.current_bank(), 0);
    }

    #[test]
    fn test_f6_banking() {
        let mut rom = vec![0x00; 16384];
        for i in 0..4 {
            rom[i * 4096] = (0x10 + i) as u8;
        }
        let mut cart = Cartridge::new(rom).unwrap();

        assert_eq!(cart.scheme(), BankingScheme::F6);
        assert_eq!(cart.current_bank(), 0);

        for bank in 0..4 {
            cart.read_rom(0x1FF6 + bank as u16);
            assert_eq!(cart.current_bank(), bank);
            assert_eq!(cart.read_rom(0x1000), (0x10 + bank) as u8);
        }
    }

    #[test]
    fn test_unusual_size_degrades_to_flat_4k() {
        let mut rom = vec![0xAB; 6000];
        rom[0] = 0x01;
        let mut cart = Cartridge::new(rom).unwrap();

        assert_eq!(cart.scheme(), BankingScheme::Flat);
        assert_eq!(cart.size(), 4096);
        assert_eq!(cart.read_rom(0x1000), 0x01);

        // Short images are zero-padded up to 4K
        let mut cart = Cartridge::new(vec![0xCD; 100]).unwrap();
        assert_eq!(cart.read_rom(0x1000), 0xCD);
        assert_eq!(cart.read_rom(0x1FFF), 0x00);
    }

    #[test]
    fn test_empty_rom_rejected() {
        assert!(Cartridge::new(vec![]).is_err());
    }

    #[test]
    fn test_restore_bank_clamps() {
        let mut cart = Cartridge::new(vec![0x00; 8192]).unwrap();
        cart.restore_bank(7);
        assert_eq!(cart.current_bank(), 1);
        cart.restore_bank(0);
        assert_eq!(cart.current_bank(), 0);
    }
}
