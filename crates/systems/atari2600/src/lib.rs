//! Atari 2600 system implementation
//!
//! Wires the generic 6502 core to the TIA, RIOT and cartridge through the
//! 13-bit bus, and drives them at the hardware ratio: one CPU cycle to one
//! RIOT timer tick to three TIA color clocks. The TIA is the clock master in
//! the sense that WSYNC stalls the CPU and VSYNC edges delimit frames.

#![allow(clippy::upper_case_acronyms)]

mod audio;
mod bus;
mod cartridge;
mod input;
mod palette;
mod riot;
mod tia;

pub use audio::{AudioChannel, TiaAudio, SAMPLE_RATE};
pub use cartridge::{BankingScheme, Cartridge, CartridgeError};
pub use input::InputState;
pub use tia::{DebugOptions, FrameSync, Tia, TiaDebug, FRAME_HEIGHT, FRAME_WIDTH};

use bus::Bus;
use serde_json::Value;
use thiserror::Error;
use vcs_core::cpu_6502::Cpu6502;
use vcs_core::{types::Frame, MountPointInfo, System};

#[derive(Debug, Error)]
pub enum ConsoleError {
    #[error("Cartridge error: {0}")]
    Cartridge(#[from] CartridgeError),
    #[error("No cartridge loaded")]
    NoCartridge,
    #[error("Invalid mount point: {0}")]
    InvalidMountPoint(String),
}

/// CPU cycles per NTSC frame (262 scanlines at 76 cycles, minus the sliver
/// the frame-sync logic reclaims).
pub const CPU_CYCLES_PER_FRAME: u32 = 19_876;

/// The assembled console: CPU, bus-mounted chips, and the frame runner.
pub struct Console {
    cpu: Cpu6502<Bus>,
    cycles: u64,
}

impl Console {
    /// Power on a console with the given ROM image.
    pub fn new(rom_bytes: &[u8]) -> Result<Self, ConsoleError> {
        let cartridge = Cartridge::new(rom_bytes.to_vec())?;
        let mut bus = Bus::new();
        bus.load_cartridge(cartridge);
        let mut cpu = Cpu6502::new(bus);
        cpu.reset();
        Ok(Self { cpu, cycles: 0 })
    }

    /// Advance the emulation by one NTSC frame.
    pub fn run_frame(&mut self) {
        for _ in 0..CPU_CYCLES_PER_FRAME {
            self.clock_cycle();
        }
    }

    /// One CPU cycle of the whole machine: CPU (unless WSYNC holds it),
    /// RIOT timer, three TIA color clocks.
    fn clock_cycle(&mut self) {
        if !self.cpu.memory.tia.cpu_halted() {
            self.cpu.clock();
        }
        self.cpu.memory.clock();
        self.cycles += 1;
    }

    /// The 160x240 BGRA framebuffer owned by the TIA.
    pub fn framebuffer(&self) -> &[u32] {
        self.cpu.memory.tia.framebuffer()
    }

    /// Take the PCM samples accumulated since the last drain (44.1 kHz mono).
    pub fn drain_audio(&mut self) -> Vec<i16> {
        self.cpu.memory.tia.drain_audio()
    }

    /// Controller and console-switch state, written by the host.
    pub fn input(&mut self) -> &mut InputState {
        &mut self.cpu.memory.input
    }

    /// Snapshot of TIA beam state and register shadows.
    pub fn tia_debug(&self) -> TiaDebug {
        self.cpu.memory.tia.debug_state()
    }

    /// TIA debug knobs: IgnoreVBlank, IgnoreVisibleWindow, frame-sync mode.
    pub fn tia_debug_options(&mut self) -> &mut DebugOptions {
        self.cpu.memory.tia.debug_options_mut()
    }

    /// Step the RESP strobe offset through 0, +1, +2, -1.
    pub fn cycle_resp_offset(&mut self) {
        self.cpu.memory.tia.cycle_resp_offset();
    }

    /// Get debug information
    pub fn debug_info(&self) -> Option<DebugInfo> {
        self.cpu.memory.cartridge.as_ref().map(|cart| DebugInfo {
            rom_size: cart.size(),
            banking_scheme: format!("{:?}", cart.scheme()),
            current_bank: cart.current_bank(),
            scanline: self.cpu.memory.tia.scanline(),
            unknown_opcodes: self.cpu.unknown_opcodes,
            reset_vector_was_patched: self.cpu.reset_vector_was_patched,
        })
    }
}

#[derive(Debug, Clone)]
pub struct DebugInfo {
    pub rom_size: usize,
    pub banking_scheme: String,
    pub current_bank: usize,
    pub scanline: u32,
    pub unknown_opcodes: u64,
    pub reset_vector_was_patched: bool,
}

impl System for Console {
    type Error = ConsoleError;

    fn reset(&mut self) {
        self.cpu.memory.reset();
        self.cpu.reset();
        self.cycles = 0;
    }

    fn step_frame(&mut self) -> Result<Frame, Self::Error> {
        if self.cpu.memory.cartridge.is_none() {
            return Err(ConsoleError::NoCartridge);
        }
        self.run_frame();

        let mut frame = Frame::new(FRAME_WIDTH, FRAME_HEIGHT);
        frame.pixels.copy_from_slice(self.framebuffer());
        Ok(frame)
    }

    fn save_state(&self) -> Value {
        serde_json::json!({
            "version": 1,
            "system": "atari2600",
            "cycles": self.cycles,
            "cpu": {
                "a": self.cpu.a,
                "x": self.cpu.x,
                "y": self.cpu.y,
                "sp": self.cpu.sp,
                "pc": self.cpu.pc,
                "status": self.cpu.status,
                "cycles_remaining": self.cpu.cycles_remaining,
            },
            "bank": self.cpu.memory.cartridge.as_ref().map(|c| c.current_bank()),
            "bus": &self.cpu.memory,
        })
    }

    fn load_state(&mut self, v: &Value) -> Result<(), serde_json::Error> {
        let version = v["version"].as_u64().unwrap_or(0);
        if version != 1 {
            return Err(serde_json::from_str::<()>("invalid").unwrap_err());
        }
        if v["system"].as_str().unwrap_or("") != "atari2600" {
            return Err(serde_json::from_str::<()>("invalid").unwrap_err());
        }

        let mut bus: Bus = serde_json::from_value(v["bus"].clone())?;
        // ROM bytes are not part of the state; re-marry the mounted
        // cartridge and restore its bank.
        bus.cartridge = self.cpu.memory.cartridge.take();
        if let (Some(cart), Some(bank)) = (bus.cartridge.as_mut(), v["bank"].as_u64()) {
            cart.restore_bank(bank as usize);
        }
        self.cpu.memory = bus;

        self.cycles = v["cycles"].as_u64().unwrap_or(0);
        let c = &v["cpu"];
        self.cpu.a = c["a"].as_u64().unwrap_or(0) as u8;
        self.cpu.x = c["x"].as_u64().unwrap_or(0) as u8;
        self.cpu.y = c["y"].as_u64().unwrap_or(0) as u8;
        self.cpu.sp = c["sp"].as_u64().unwrap_or(0xFD) as u8;
        self.cpu.pc = c["pc"].as_u64().unwrap_or(0) as u16;
        self.cpu.status = c["status"].as_u64().unwrap_or(0x24) as u8;
        self.cpu.cycles_remaining = c["cycles_remaining"].as_u64().unwrap_or(0) as u32;
        Ok(())
    }

    fn supports_save_states(&self) -> bool {
        true
    }

    fn mount_points(&self) -> Vec<MountPointInfo> {
        vec![MountPointInfo {
            id: "Cartridge".to_string(),
            name: "Cartridge Slot".to_string(),
            extensions: vec!["a26".to_string(), "bin".to_string()],
            required: true,
        }]
    }

    fn mount(&mut self, mount_point_id: &str, data: &[u8]) -> Result<(), Self::Error> {
        if mount_point_id != "Cartridge" {
            return Err(ConsoleError::InvalidMountPoint(mount_point_id.to_string()));
        }
        let cartridge = Cartridge::new(data.to_vec())?;
        self.cpu.memory.load_cartridge(cartridge);
        System::reset(self);
        Ok(())
    }

    fn unmount(&mut self, mount_point_id: &str) -> Result<(), Self::Error> {
        if mount_point_id != "Cartridge" {
            return Err(ConsoleError::InvalidMountPoint(mount_point_id.to_string()));
        }
        self.cpu.memory.cartridge = None;
        Ok(())
    }

    fn is_mounted(&self, mount_point_id: &str) -> bool {
        mount_point_id == "Cartridge" && self.cpu.memory.cartridge.is_some()
    }
}
