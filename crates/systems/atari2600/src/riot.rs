//! RIOT (6532) - RAM, I/O, and Timer chip for Atari 2600
//!
//! Provides the system's entire 128 bytes of RAM, the two I/O ports the
//! joysticks and console switches hang off, and the programmable interval
//! timer games use for frame pacing.
//!
//! # Registers (at `addr & $FF`)
//!
//! ```text
//! $80: SWCHA   (R)  joystick directions, active low
//! $81: SWACNT  (R/W) port A data direction
//! $82: SWCHB   (R)  console switches, active low
//! $83: SWBCNT  (R/W) port B data direction
//! $84: INTIM   (R)  current timer value
//! $85: INSTAT  (R)  bit 7 = timer underflow flag
//! $94: TIM1T   (W)  start timer, prescale 1
//! $95: TIM8T   (W)  start timer, prescale 8
//! $96: TIM64T  (W)  start timer, prescale 64
//! $97: T1024T  (W)  start timer, prescale 1024
//! ```
//!
//! # Timer protocol
//!
//! A timer write loads INTIM, arms the chosen prescale, and clears the
//! underflow flag. Every CPU cycle the prescale counter counts down; when it
//! expires it reloads and INTIM decrements. Decrementing past $00 wraps to
//! $FF, raises the underflow flag, and counting simply continues. The flag is
//! cleared only by the next timer write.

use serde::{Deserialize, Serialize};

use crate::input::InputState;

mod serde_ram {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(arr: &[u8; 128], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        arr.as_slice().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<[u8; 128], D::Error>
    where
        D: Deserializer<'de>,
    {
        let vec = Vec::<u8>::deserialize(deserializer)?;
        if vec.len() != 128 {
            return Err(serde::de::Error::invalid_length(vec.len(), &"128 bytes"));
        }
        let mut arr = [0u8; 128];
        arr.copy_from_slice(&vec);
        Ok(arr)
    }
}

/// RIOT chip state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Riot {
    /// 128 bytes of RAM
    #[serde(with = "serde_ram")]
    ram: [u8; 128],

    /// Port A data direction register (0 = input, 1 = output)
    swacnt: u8,
    /// Port B data direction register
    swbcnt: u8,
    /// Last value written to SWCHA (output latch; nothing is wired to it)
    swcha_out: u8,
    /// Last value written to SWCHB
    swchb_out: u8,

    /// Current timer value
    intim: u8,
    /// Timer armed by a write to $94-$97
    running: bool,
    /// Sticky underflow flag surfaced on INSTAT bit 7
    underflow: bool,
    /// Prescale: 1, 8, 64, or 1024 CPU cycles per INTIM decrement
    prescale: u16,
    /// Cycles left until the next INTIM decrement
    prescale_counter: u16,
}

impl Default for Riot {
    fn default() -> Self {
        Self::new()
    }
}

impl Riot {
    /// Create a new RIOT chip
    pub fn new() -> Self {
        Self {
            ram: [0; 128],
            swacnt: 0,
            swbcnt: 0,
            swcha_out: 0,
            swchb_out: 0,
            intim: 0,
            running: false,
            underflow: false,
            prescale: 1,
            prescale_counter: 1,
        }
    }

    /// Reset RIOT to power-on state
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Read from RIOT address space. RAM lands below $0200; I/O and timer
    /// registers decode through the low five address bits.
    pub fn read(&self, addr: u16, input: &InputState) -> u8 {
        if addr < 0x0200 {
            return self.ram[(addr & 0x7F) as usize];
        }
        match addr & 0x1F {
            0x00 => input.swcha(),
            0x01 => self.swacnt,
            0x02 => input.swchb(),
            0x03 => self.swbcnt,
            0x04 | 0x06 | 0x14 | 0x16 => self.intim,
            0x05 | 0x07 | 0x15 | 0x17 => {
                if self.underflow {
                    0x80
                } else {
                    0x00
                }
            }
            _ => 0,
        }
    }

    /// Write to RIOT address space.
    pub fn write(&mut self, addr: u16, val: u8) {
        if addr < 0x0200 {
            self.ram[(addr & 0x7F) as usize] = val;
            return;
        }
        match addr & 0x1F {
            0x00 => self.swcha_out = val,
            0x01 => self.swacnt = val,
            0x02 => self.swchb_out = val,
            0x03 => self.swbcnt = val,
            0x14 => self.start_timer(val, 1),
            0x15 => self.start_timer(val, 8),
            0x16 => self.start_timer(val, 64),
            0x17 => self.start_timer(val, 1024),
            _ => {}
        }
    }

    fn start_timer(&mut self, val: u8, prescale: u16) {
        self.intim = val;
        self.prescale = prescale;
        self.prescale_counter = prescale;
        self.underflow = false;
        self.running = true;
    }

    /// Advance the timer by one CPU cycle.
    pub fn tick(&mut self) {
        if !self.running {
            return;
        }
        self.prescale_counter -= 1;
        if self.prescale_counter == 0 {
            self.prescale_counter = self.prescale;
            if self.intim == 0 {
                self.intim = 0xFF;
                self.underflow = true;
            } else {
                self.intim -= 1;
            }
        }
    }
}
