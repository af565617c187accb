//! Atari 2600 memory bus implementation
//!
//! The 6507 exposes only 13 address bits, so everything decodes after masking
//! to $0000-$1FFF:
//!
//! ```text
//! $1000-$1FFF: cartridge ROM window (reads return ROM, writes only strobe
//!              bank-switch hotspots)
//! low byte >= $80, below $0200: RIOT RAM, mirrored into the upper halves of
//!              pages 0 and 1 so the stack at $01xx lands in real RAM
//! low byte <= $7F: TIA registers (low 6 bits select)
//! $0280-$0297: RIOT I/O and timer
//! anything else: open bus (reads 0, writes dropped)
//! ```

use serde::{Deserialize, Serialize};
use vcs_core::cpu_6502::Memory6502;

use crate::cartridge::Cartridge;
use crate::input::InputState;
use crate::riot::Riot;
use crate::tia::Tia;

/// Atari 2600 memory bus
#[derive(Debug, Serialize, Deserialize)]
pub struct Bus {
    pub tia: Tia,
    pub riot: Riot,
    #[serde(skip)]
    pub cartridge: Option<Cartridge>,
    pub input: InputState,
}

impl Default for Bus {
    fn default() -> Self {
        Self::new()
    }
}

impl Bus {
    /// Create a new bus
    pub fn new() -> Self {
        Self {
            tia: Tia::new(),
            riot: Riot::new(),
            cartridge: None,
            input: InputState::new(),
        }
    }

    /// Load a cartridge
    pub fn load_cartridge(&mut self, cartridge: Cartridge) {
        self.cartridge = Some(cartridge);
    }

    /// Reset the bus (keeps the cartridge mounted and the input state)
    pub fn reset(&mut self) {
        self.tia.reset();
        self.riot.reset();
    }

    /// Advance the chips by one CPU cycle: the RIOT timer ticks once, the
    /// TIA three color clocks.
    pub fn clock(&mut self) {
        self.riot.tick();
        self.tia.tick();
        self.tia.tick();
        self.tia.tick();
    }
}

impl Memory6502 for Bus {
    fn read(&mut self, addr: u16) -> u8 {
        let addr = addr & 0x1FFF;

        if addr >= 0x1000 {
            return match &mut self.cartridge {
                Some(cart) => cart.read_rom(addr),
                None => 0,
            };
        }
        if addr < 0x0200 && (addr & 0xFF) >= 0x80 {
            return self.riot.read(addr, &self.input);
        }
        if (addr & 0xFF) <= 0x7F {
            return self.tia.read((addr & 0x3F) as u8, &self.input);
        }
        if (0x0280..=0x0297).contains(&addr) {
            return self.riot.read(addr, &self.input);
        }
        0
    }

    fn write(&mut self, addr: u16, val: u8) {
        let addr = addr & 0x1FFF;

        if addr >= 0x1000 {
            if let Some(cart) = &mut self.cartridge {
                cart.write_hotspot(addr);
            }
            return;
        }
        if addr < 0x0200 && (addr & 0xFF) >= 0x80 {
            self.riot.write(addr, val);
            return;
        }
        if (addr & 0xFF) <= 0x7F {
            self.tia.write((addr & 0x3F) as u8, val);
            return;
        }
        if (0x0280..=0x0297).contains(&addr) {
            self.riot.write(addr, val);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_bus_is_13_bits() {
        let mut bus = Bus::new();
        bus.write(0x0080, 0x12);
        // $2080 masks down to $0080
        assert_eq!(bus.read(0x2080), 0x12);
    }

    #[test]
    fn stack_page_lands_in_riot_ram() {
        let mut bus = Bus::new();
        bus.write(0x01FF, 0x42);
        assert_eq!(bus.read(0x01FF), 0x42);
        // Page 0 upper half aliases the same 128 bytes
        assert_eq!(bus.read(0x00FF), 0x42);
    }

    #[test]
    fn tia_registers_select_on_low_six_bits() {
        let mut bus = Bus::new();
        // COLUBK is $09; $0109 aliases it
        bus.write(0x0109, 0x42);
        bus.clock();
        bus.clock();
        assert_eq!(bus.tia.debug_state().colubk, 0x42);
        // Collision reads decode low bits too
        assert_eq!(bus.read(0x0030), 0x00);
    }

    #[test]
    fn riot_timer_reachable_through_io_window() {
        let mut bus = Bus::new();
        bus.write(0x0294, 10);
        bus.clock();
        assert_eq!(bus.read(0x0284), 9);
    }

    #[test]
    fn riot_timer_ticks_once_per_cpu_cycle() {
        let mut bus = Bus::new();
        bus.write(0x0295, 1); // prescale 8
        for _ in 0..8 {
            bus.clock();
        }
        assert_eq!(bus.read(0x0284), 0);
    }

    #[test]
    fn open_bus_reads_zero() {
        let mut bus = Bus::new();
        assert_eq!(bus.read(0x0298), 0);
        bus.write(0x0298, 0xFF); // dropped
        assert_eq!(bus.read(0x0298), 0);
    }

    #[test]
    fn rom_window_without_cartridge_reads_zero() {
        let mut bus = Bus::new();
        assert_eq!(bus.read(0x1000), 0);
        assert_eq!(bus.read(0xFFFC), 0);
    }

    #[test]
    fn rom_window_reads_cartridge() {
        let mut bus = Bus::new();
        let mut rom = vec![0x00; 4096];
        rom[0] = 0xAB;
        bus.load_cartridge(Cartridge::new(rom).unwrap());
        assert_eq!(bus.read(0xF000), 0xAB);
        // Writes in the window only strobe hotspots
        bus.write(0xF000, 0x99);
        assert_eq!(bus.read(0xF000), 0xAB);
    }

    #[test]
    fn wsync_write_reaches_tia_immediately() {
        let mut bus = Bus::new();
        bus.write(0x0002, 0);
        assert!(bus.tia.cpu_halted());
    }
}
