//! TIA audio: two channels of polynomial-counter noise and square waves,
//! resampled to 44.1 kHz mono PCM.
//!
//! Each channel runs a small divider chain off the color clock: a base
//! divider (114 color clocks, or 342 for the "CPU clock" AUDC modes), the
//! AUDF frequency divider, an optional clock modifier (a /31 counter or a
//! 5-bit polynomial gate), and finally the source that actually flips the
//! output bit (constant, square toggle, or a 4/5/9-bit polynomial counter).
//!
//! The polynomial counters are Fibonacci LFSRs: shift right, new top bit is
//! the XOR of bit 0 and the tap. A counter that decays to zero is reseeded to
//! all ones.

use serde::{Deserialize, Serialize};

/// Host-facing sample rate of the resampled PCM stream.
pub const SAMPLE_RATE: u32 = 44_100;

/// NTSC color clock frequency in Hz.
pub const COLOR_CLOCK_HZ: f64 = 3_579_545.0;

/// Color clocks per output sample (~81.18).
const CLOCKS_PER_SAMPLE: f64 = COLOR_CLOCK_HZ / SAMPLE_RATE as f64;

/// Mixer gain: two channels at full volume stay inside i16 range.
const MIX_GAIN: i32 = 900;

fn shift_lfsr4(state: &mut u8) -> bool {
    let out = *state & 1;
    let top = out ^ ((*state >> 1) & 1);
    *state = (*state >> 1) | (top << 3);
    if *state == 0 {
        *state = 0x0F;
    }
    out == 1
}

fn shift_lfsr5(state: &mut u8) -> bool {
    let out = *state & 1;
    let top = out ^ ((*state >> 2) & 1);
    *state = (*state >> 1) | (top << 4);
    if *state == 0 {
        *state = 0x1F;
    }
    out == 1
}

fn shift_lfsr9(state: &mut u16) -> bool {
    let out = (*state & 1) as u16;
    let top = out ^ ((*state >> 5) & 1);
    *state = (*state >> 1) | (top << 8);
    if *state == 0 {
        *state = 0x1FF;
    }
    out == 1
}

/// One TIA audio channel: AUDC/AUDF/AUDV shadows plus the divider and
/// polynomial state they drive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioChannel {
    pub audc: u8,
    pub audf: u8,
    pub audv: u8,
    lfsr4: u8,
    lfsr5: u8,
    lfsr9: u16,
    /// Separate 5-bit polynomial used only as a clock gate (AUDC low bits 11)
    lfsr5_clock: u8,
    base_counter: u32,
    freq_counter: u32,
    /// Counter approximating the hardware's /31 clock-modifier pattern
    div31: u32,
    output: bool,
}

impl Default for AudioChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioChannel {
    pub fn new() -> Self {
        Self {
            audc: 0,
            audf: 0,
            audv: 0,
            lfsr4: 0x0F,
            lfsr5: 0x1F,
            lfsr9: 0x1FF,
            lfsr5_clock: 0x1F,
            base_counter: 0,
            freq_counter: 0,
            div31: 0,
            output: false,
        }
    }

    /// AUDC 12-15 clock from the CPU rate (pixel clock / 342) instead of the
    /// usual pixel clock / 114.
    fn base_period(&self) -> u32 {
        if (12..=15).contains(&self.audc) {
            342
        } else {
            114
        }
    }

    /// Advance the channel by one color clock.
    pub fn tick(&mut self) {
        self.base_counter += 1;
        if self.base_counter >= self.base_period() {
            self.base_counter = 0;
            self.base_tick();
        }
    }

    fn base_tick(&mut self) {
        self.freq_counter += 1;
        if self.freq_counter >= (self.audf & 0x1F) as u32 + 1 {
            self.freq_counter = 0;
            if self.clock_gate_open() {
                self.advance_source();
            }
        }
    }

    /// The clock modifier selected by AUDC bits 1..0.
    fn clock_gate_open(&mut self) -> bool {
        match self.audc & 0x03 {
            0 | 1 => true,
            2 => {
                self.div31 += 1;
                if self.div31 >= 31 {
                    self.div31 = 0;
                    true
                } else {
                    false
                }
            }
            _ => shift_lfsr5(&mut self.lfsr5_clock),
        }
    }

    /// The source selected by AUDC bits 3..2, with the special cases the
    /// register encoding carves out.
    fn advance_source(&mut self) {
        self.output = match self.audc {
            0 | 11 => true,
            8 => shift_lfsr9(&mut self.lfsr9),
            c => match (c >> 2) & 0x03 {
                0 => shift_lfsr4(&mut self.lfsr4),
                1 | 3 => !self.output,
                _ => shift_lfsr5(&mut self.lfsr5),
            },
        };
    }

    /// Volume-weighted output level (0 or AUDV).
    fn level(&self) -> i32 {
        if self.output {
            (self.audv & 0x0F) as i32
        } else {
            0
        }
    }

    fn volume(&self) -> i32 {
        (self.audv & 0x0F) as i32
    }
}

/// The two channels plus the resampling accumulator and the pending PCM queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TiaAudio {
    pub channels: [AudioChannel; 2],
    clock_accum: f64,
    #[serde(skip)]
    samples: Vec<i16>,
}

impl Default for TiaAudio {
    fn default() -> Self {
        Self::new()
    }
}

impl TiaAudio {
    pub fn new() -> Self {
        Self {
            channels: [AudioChannel::new(), AudioChannel::new()],
            clock_accum: 0.0,
            samples: Vec::new(),
        }
    }

    /// Advance both channels one color clock and emit any due samples.
    pub fn tick(&mut self) {
        self.channels[0].tick();
        self.channels[1].tick();

        self.clock_accum += 1.0;
        while self.clock_accum >= CLOCKS_PER_SAMPLE {
            self.clock_accum -= CLOCKS_PER_SAMPLE;
            let sample = self.mix();
            self.samples.push(sample);
        }
    }

    /// Mix both channels around the midpoint of their summed volumes, so a
    /// silent program produces exact zeroes rather than a DC offset.
    fn mix(&self) -> i16 {
        let v0 = self.channels[0].volume();
        let v1 = self.channels[1].volume();
        if v0 == 0 && v1 == 0 {
            return 0;
        }
        let s = (2 * (self.channels[0].level() + self.channels[1].level()) - (v0 + v1)) * MIX_GAIN;
        s.clamp(i16::MIN as i32, i16::MAX as i32) as i16
    }

    /// Hand the accumulated PCM to the host.
    pub fn drain(&mut self) -> Vec<i16> {
        std::mem::take(&mut self.samples)
    }

    pub fn pending_samples(&self) -> usize {
        self.samples.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_clocks(audio: &mut TiaAudio, clocks: u32) {
        for _ in 0..clocks {
            audio.tick();
        }
    }

    #[test]
    fn silent_channels_emit_exact_zero() {
        let mut audio = TiaAudio::new();
        run_clocks(&mut audio, 10_000);
        assert!(audio.pending_samples() > 0);
        let samples = audio.drain();
        assert!(!samples.is_empty());
        assert!(samples.iter().all(|&s| s == 0));
        assert_eq!(audio.pending_samples(), 0);
    }

    #[test]
    fn sample_rate_tracks_color_clock() {
        let mut audio = TiaAudio::new();
        // One NTSC frame worth of color clocks
        run_clocks(&mut audio, 19_876 * 3);
        let n = audio.drain().len() as i64;
        let expected = (19_876.0 * 3.0 / CLOCKS_PER_SAMPLE) as i64;
        assert!((n - expected).abs() <= 1, "{n} vs {expected}");
    }

    #[test]
    fn square_wave_swings_full_scale() {
        let mut audio = TiaAudio::new();
        audio.channels[0].audc = 4; // pure toggle
        audio.channels[0].audf = 0;
        audio.channels[0].audv = 15;
        run_clocks(&mut audio, 50_000);
        let samples = audio.drain();
        // Output toggles every 114 clocks; both phases must appear
        assert!(samples.contains(&(15 * MIX_GAIN as i16)));
        assert!(samples.contains(&(-15 * MIX_GAIN as i16)));
    }

    #[test]
    fn noise_channel_produces_output() {
        let mut audio = TiaAudio::new();
        audio.channels[1].audc = 8; // 9-bit polynomial
        audio.channels[1].audf = 2;
        audio.channels[1].audv = 10;
        run_clocks(&mut audio, 200_000);
        let samples = audio.drain();
        assert!(samples.iter().any(|&s| s > 0));
        assert!(samples.iter().any(|&s| s < 0));
    }

    #[test]
    fn div31_mode_stays_alive() {
        let mut audio = TiaAudio::new();
        audio.channels[0].audc = 6; // square toggle behind the /31 gate
        audio.channels[0].audv = 8;
        run_clocks(&mut audio, 500_000);
        let samples = audio.drain();
        assert!(samples.iter().any(|&s| s != 0));
    }

    #[test]
    fn lfsr_reseeds_from_zero() {
        let mut s4 = 0u8;
        shift_lfsr4(&mut s4);
        assert_eq!(s4, 0x0F);

        let mut s9 = 0u16;
        shift_lfsr9(&mut s9);
        assert_eq!(s9, 0x1FF);
    }

    #[test]
    fn lfsr4_cycles_through_fifteen_states() {
        let mut s = 0x0Fu8;
        let start = s;
        let mut period = 0;
        loop {
            shift_lfsr4(&mut s);
            period += 1;
            if s == start || period > 16 {
                break;
            }
        }
        assert_eq!(period, 15);
    }

    #[test]
    fn constant_mode_holds_high() {
        let mut ch = AudioChannel::new();
        ch.audc = 0;
        ch.audv = 5;
        for _ in 0..1000 {
            ch.tick();
        }
        assert_eq!(ch.level(), 5);
    }
}
