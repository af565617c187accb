//! Shared controller and console-switch state.
//!
//! The host writes this struct between frames; RIOT and TIA read it when the
//! running program polls SWCHA/SWCHB/INPT4/INPT5. Every bit is latched into a
//! port read independently, so no synchronization is needed beyond ownership
//! by the `Console`.

use serde::{Deserialize, Serialize};

/// Player 0 joystick, fire buttons, and console switches.
///
/// All `bool` fields mean "currently pressed/engaged"; the active-low encoding
/// of the hardware ports happens in the readback helpers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputState {
    pub joystick_up: bool,
    pub joystick_down: bool,
    pub joystick_left: bool,
    pub joystick_right: bool,
    pub fire_p0: bool,
    pub fire_p1: bool,
    /// Console Reset switch
    pub switch_reset: bool,
    /// Console Select switch
    pub switch_select: bool,
    /// Color (true) vs. black & white (false)
    pub color_mode: bool,
    /// Player 0 difficulty: true = A/Pro, false = B/Amateur
    pub difficulty_p0: bool,
    /// Player 1 difficulty: true = A/Pro, false = B/Amateur
    pub difficulty_p1: bool,
}

impl Default for InputState {
    fn default() -> Self {
        Self::new()
    }
}

impl InputState {
    pub fn new() -> Self {
        Self {
            joystick_up: false,
            joystick_down: false,
            joystick_left: false,
            joystick_right: false,
            fire_p0: false,
            fire_p1: false,
            switch_reset: false,
            switch_select: false,
            color_mode: true,
            difficulty_p0: false,
            difficulty_p1: false,
        }
    }

    /// SWCHA readback: P0 Right/Left/Down/Up in bits 7..4, active low.
    /// The P1 nibble is not wired and reads as released.
    pub fn swcha(&self) -> u8 {
        let mut v = 0xFFu8;
        if self.joystick_right {
            v &= !0x80;
        }
        if self.joystick_left {
            v &= !0x40;
        }
        if self.joystick_down {
            v &= !0x20;
        }
        if self.joystick_up {
            v &= !0x10;
        }
        v
    }

    /// SWCHB readback: bit0 Reset, bit1 Select (both active low),
    /// bit3 Color/BW (0 = BW), bits 6/7 difficulty (0 = B).
    pub fn swchb(&self) -> u8 {
        let mut v = 0u8;
        if !self.switch_reset {
            v |= 0x01;
        }
        if !self.switch_select {
            v |= 0x02;
        }
        if self.color_mode {
            v |= 0x08;
        }
        if self.difficulty_p0 {
            v |= 0x40;
        }
        if self.difficulty_p1 {
            v |= 0x80;
        }
        v
    }

    /// INPT4 readback: player 0 fire button on bit 7, active low.
    pub fn inpt4(&self) -> u8 {
        if self.fire_p0 {
            0x00
        } else {
            0x80
        }
    }

    /// INPT5 readback: player 1 fire button on bit 7, active low.
    pub fn inpt5(&self) -> u8 {
        if self.fire_p1 {
            0x00
        } else {
            0x80
        }
    }
}
