//! MOS 6502 CPU core implementation
//!
//! This module provides a reusable, cycle-level 6502 CPU implementation that can
//! be used by any system (Atari 2600, NES, Apple II, etc.) by implementing the
//! `Memory6502` trait.
//!
//! The CPU is driven one cycle at a time through [`Cpu6502::clock`]: an
//! instruction is fetched and executed in full on its first cycle and the
//! remaining cycles of its official timing are burned as no-ops. This keeps the
//! instruction-level semantics simple while letting the surrounding machine
//! interleave other chips at cycle granularity.

use log::{trace, warn};

/// Memory interface trait for the 6502 CPU
///
/// Systems using the 6502 must implement this trait to provide memory access.
pub trait Memory6502 {
    /// Read a byte from memory at the given address
    fn read(&mut self, addr: u16) -> u8;

    /// Write a byte to memory at the given address
    fn write(&mut self, addr: u16, val: u8);
}

// Status register bits (NV-BDIZC)
pub const FLAG_C: u8 = 0x01;
pub const FLAG_Z: u8 = 0x02;
pub const FLAG_I: u8 = 0x04;
pub const FLAG_D: u8 = 0x08;
pub const FLAG_B: u8 = 0x10;
pub const FLAG_U: u8 = 0x20;
pub const FLAG_V: u8 = 0x40;
pub const FLAG_N: u8 = 0x80;

/// Addressing modes of the documented instruction set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddrMode {
    Implied,
    Accumulator,
    Immediate,
    ZeroPage,
    ZeroPageX,
    ZeroPageY,
    Absolute,
    AbsoluteX,
    AbsoluteY,
    IndirectX,
    IndirectY,
    Indirect,
    Relative,
}

/// Instruction tags for the dispatch table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mnemonic {
    Adc, And, Asl, Bcc, Bcs, Beq, Bit, Bmi, Bne, Bpl, Brk, Bvc, Bvs,
    Clc, Cld, Cli, Clv, Cmp, Cpx, Cpy, Dec, Dex, Dey, Eor, Inc, Inx,
    Iny, Jmp, Jsr, Lda, Ldx, Ldy, Lsr, Nop, Ora, Pha, Php, Pla, Plp,
    Rol, Ror, Rti, Rts, Sbc, Sec, Sed, Sei, Sta, Stx, Sty, Tax, Tay,
    Tsx, Txa, Txs, Tya,
    /// Undocumented opcode; executes as a 2-cycle NOP and bumps a counter.
    Unknown,
}

/// One entry of the 256-slot opcode table: a tagged descriptor rather than a
/// closure, so the handler is always a plain method taking `&mut self`.
#[derive(Debug, Clone, Copy)]
pub struct Opcode {
    pub mnemonic: Mnemonic,
    pub mode: AddrMode,
    /// Base cycle count from the official timing tables.
    pub cycles: u8,
    /// Read-style instruction that pays one extra cycle on a page crossing.
    pub page_penalty: bool,
}

const UNKNOWN_OPCODE: Opcode = Opcode {
    mnemonic: Mnemonic::Unknown,
    mode: AddrMode::Implied,
    cycles: 2,
    page_penalty: false,
};

const fn op(mnemonic: Mnemonic, mode: AddrMode, cycles: u8, page_penalty: bool) -> Opcode {
    Opcode {
        mnemonic,
        mode,
        cycles,
        page_penalty,
    }
}

const fn build_opcode_table() -> [Opcode; 256] {
    use AddrMode::*;
    use Mnemonic::*;

    let mut t = [UNKNOWN_OPCODE; 256];

    t[0x69] = op(Adc, Immediate, 2, false);
    t[0x65] = op(Adc, ZeroPage, 3, false);
    t[0x75] = op(Adc, ZeroPageX, 4, false);
    t[0x6D] = op(Adc, Absolute, 4, false);
    t[0x7D] = op(Adc, AbsoluteX, 4, true);
    t[0x79] = op(Adc, AbsoluteY, 4, true);
    t[0x61] = op(Adc, IndirectX, 6, false);
    t[0x71] = op(Adc, IndirectY, 5, true);

    t[0x29] = op(And, Immediate, 2, false);
    t[0x25] = op(And, ZeroPage, 3, false);
    t[0x35] = op(And, ZeroPageX, 4, false);
    t[0x2D] = op(And, Absolute, 4, false);
    t[0x3D] = op(And, AbsoluteX, 4, true);
    t[0x39] = op(And, AbsoluteY, 4, true);
    t[0x21] = op(And, IndirectX, 6, false);
    t[0x31] = op(And, IndirectY, 5, true);

    t[0x0A] = op(Asl, Accumulator, 2, false);
    t[0x06] = op(Asl, ZeroPage, 5, false);
    t[0x16] = op(Asl, ZeroPageX, 6, false);
    t[0x0E] = op(Asl, Absolute, 6, false);
    t[0x1E] = op(Asl, AbsoluteX, 7, false);

    t[0x90] = op(Bcc, Relative, 2, false);
    t[0xB0] = op(Bcs, Relative, 2, false);
    t[0xF0] = op(Beq, Relative, 2, false);
    t[0x30] = op(Bmi, Relative, 2, false);
    t[0xD0] = op(Bne, Relative, 2, false);
    t[0x10] = op(Bpl, Relative, 2, false);
    t[0x50] = op(Bvc, Relative, 2, false);
    t[0x70] = op(Bvs, Relative, 2, false);

    t[0x24] = op(Bit, ZeroPage, 3, false);
    t[0x2C] = op(Bit, Absolute, 4, false);

    t[0x00] = op(Brk, Implied, 7, false);

    t[0x18] = op(Clc, Implied, 2, false);
    t[0xD8] = op(Cld, Implied, 2, false);
    t[0x58] = op(Cli, Implied, 2, false);
    t[0xB8] = op(Clv, Implied, 2, false);

    t[0xC9] = op(Cmp, Immediate, 2, false);
    t[0xC5] = op(Cmp, ZeroPage, 3, false);
    t[0xD5] = op(Cmp, ZeroPageX, 4, false);
    t[0xCD] = op(Cmp, Absolute, 4, false);
    t[0xDD] = op(Cmp, AbsoluteX, 4, true);
    t[0xD9] = op(Cmp, AbsoluteY, 4, true);
    t[0xC1] = op(Cmp, IndirectX, 6, false);
    t[0xD1] = op(Cmp, IndirectY, 5, true);

    t[0xE0] = op(Cpx, Immediate, 2, false);
    t[0xE4] = op(Cpx, ZeroPage, 3, false);
    t[0xEC] = op(Cpx, Absolute, 4, false);

    t[0xC0] = op(Cpy, Immediate, 2, false);
    t[0xC4] = op(Cpy, ZeroPage, 3, false);
    t[0xCC] = op(Cpy, Absolute, 4, false);

    t[0xC6] = op(Dec, ZeroPage, 5, false);
    t[0xD6] = op(Dec, ZeroPageX, 6, false);
    t[0xCE] = op(Dec, Absolute, 6, false);
    t[0xDE] = op(Dec, AbsoluteX, 7, false);

    t[0xCA] = op(Dex, Implied, 2, false);
    t[0x88] = op(Dey, Implied, 2, false);

    t[0x49] = op(Eor, Immediate, 2, false);
    t[0x45] = op(Eor, ZeroPage, 3, false);
    t[0x55] = op(Eor, ZeroPageX, 4, false);
    t[0x4D] = op(Eor, Absolute, 4, false);
    t[0x5D] = op(Eor, AbsoluteX, 4, true);
    t[0x59] = op(Eor, AbsoluteY, 4, true);
    t[0x41] = op(Eor, IndirectX, 6, false);
    t[0x51] = op(Eor, IndirectY, 5, true);

    t[0xE6] = op(Inc, ZeroPage, 5, false);
    t[0xF6] = op(Inc, ZeroPageX, 6, false);
    t[0xEE] = op(Inc, Absolute, 6, false);
    t[0xFE] = op(Inc, AbsoluteX, 7, false);

    t[0xE8] = op(Inx, Implied, 2, false);
    t[0xC8] = op(Iny, Implied, 2, false);

    t[0x4C] = op(Jmp, Absolute, 3, false);
    t[0x6C] = op(Jmp, Indirect, 5, false);
    t[0x20] = op(Jsr, Absolute, 6, false);

    t[0xA9] = op(Lda, Immediate, 2, false);
    t[0xA5] = op(Lda, ZeroPage, 3, false);
    t[0xB5] = op(Lda, ZeroPageX, 4, false);
    t[0xAD] = op(Lda, Absolute, 4, false);
    t[0xBD] = op(Lda, AbsoluteX, 4, true);
    t[0xB9] = op(Lda, AbsoluteY, 4, true);
    t[0xA1] = op(Lda, IndirectX, 6, false);
    t[0xB1] = op(Lda, IndirectY, 5, true);

    t[0xA2] = op(Ldx, Immediate, 2, false);
    t[0xA6] = op(Ldx, ZeroPage, 3, false);
    t[0xB6] = op(Ldx, ZeroPageY, 4, false);
    t[0xAE] = op(Ldx, Absolute, 4, false);
    t[0xBE] = op(Ldx, AbsoluteY, 4, true);

    t[0xA0] = op(Ldy, Immediate, 2, false);
    t[0xA4] = op(Ldy, ZeroPage, 3, false);
    t[0xB4] = op(Ldy, ZeroPageX, 4, false);
    t[0xAC] = op(Ldy, Absolute, 4, false);
    t[0xBC] = op(Ldy, AbsoluteX, 4, true);

    t[0x4A] = op(Lsr, Accumulator, 2, false);
    t[0x46] = op(Lsr, ZeroPage, 5, false);
    t[0x56] = op(Lsr, ZeroPageX, 6, false);
    t[0x4E] = op(Lsr, Absolute, 6, false);
    t[0x5E] = op(Lsr, AbsoluteX, 7, false);

    t[0xEA] = op(Nop, Implied, 2, false);

    t[0x09] = op(Ora, Immediate, 2, false);
    t[0x05] = op(Ora, ZeroPage, 3, false);
    t[0x15] = op(Ora, ZeroPageX, 4, false);
    t[0x0D] = op(Ora, Absolute, 4, false);
    t[0x1D] = op(Ora, AbsoluteX, 4, true);
    t[0x19] = op(Ora, AbsoluteY, 4, true);
    t[0x01] = op(Ora, IndirectX, 6, false);
    t[0x11] = op(Ora, IndirectY, 5, true);

    t[0x48] = op(Pha, Implied, 3, false);
    t[0x08] = op(Php, Implied, 3, false);
    t[0x68] = op(Pla, Implied, 4, false);
    t[0x28] = op(Plp, Implied, 4, false);

    t[0x2A] = op(Rol, Accumulator, 2, false);
    t[0x26] = op(Rol, ZeroPage, 5, false);
    t[0x36] = op(Rol, ZeroPageX, 6, false);
    t[0x2E] = op(Rol, Absolute, 6, false);
    t[0x3E] = op(Rol, AbsoluteX, 7, false);

    t[0x6A] = op(Ror, Accumulator, 2, false);
    t[0x66] = op(Ror, ZeroPage, 5, false);
    t[0x76] = op(Ror, ZeroPageX, 6, false);
    t[0x6E] = op(Ror, Absolute, 6, false);
    t[0x7E] = op(Ror, AbsoluteX, 7, false);

    t[0x40] = op(Rti, Implied, 6, false);
    t[0x60] = op(Rts, Implied, 6, false);

    t[0xE9] = op(Sbc, Immediate, 2, false);
    t[0xE5] = op(Sbc, ZeroPage, 3, false);
    t[0xF5] = op(Sbc, ZeroPageX, 4, false);
    t[0xED] = op(Sbc, Absolute, 4, false);
    t[0xFD] = op(Sbc, AbsoluteX, 4, true);
    t[0xF9] = op(Sbc, AbsoluteY, 4, true);
    t[0xE1] = op(Sbc, IndirectX, 6, false);
    t[0xF1] = op(Sbc, IndirectY, 5, true);

    t[0x38] = op(Sec, Implied, 2, false);
    t[0xF8] = op(Sed, Implied, 2, false);
    t[0x78] = op(Sei, Implied, 2, false);

    t[0x85] = op(Sta, ZeroPage, 3, false);
    t[0x95] = op(Sta, ZeroPageX, 4, false);
    t[0x8D] = op(Sta, Absolute, 4, false);
    t[0x9D] = op(Sta, AbsoluteX, 5, false);
    t[0x99] = op(Sta, AbsoluteY, 5, false);
    t[0x81] = op(Sta, IndirectX, 6, false);
    t[0x91] = op(Sta, IndirectY, 6, false);

    t[0x86] = op(Stx, ZeroPage, 3, false);
    t[0x96] = op(Stx, ZeroPageY, 4, false);
    t[0x8E] = op(Stx, Absolute, 4, false);

    t[0x84] = op(Sty, ZeroPage, 3, false);
    t[0x94] = op(Sty, ZeroPageX, 4, false);
    t[0x8C] = op(Sty, Absolute, 4, false);

    t[0xAA] = op(Tax, Implied, 2, false);
    t[0xA8] = op(Tay, Implied, 2, false);
    t[0xBA] = op(Tsx, Implied, 2, false);
    t[0x8A] = op(Txa, Implied, 2, false);
    t[0x9A] = op(Txs, Implied, 2, false);
    t[0x98] = op(Tya, Implied, 2, false);

    t
}

/// The full 256-entry dispatch table. Undocumented slots keep `UNKNOWN_OPCODE`.
pub static OPCODES: [Opcode; 256] = build_opcode_table();

/// MOS 6502 CPU state and execution engine
///
/// This is a generic, reusable 6502 CPU implementation that works with any
/// system through the `Memory6502` trait.
#[derive(Debug)]
pub struct Cpu6502<M: Memory6502> {
    /// Accumulator register
    pub a: u8,
    /// X index register
    pub x: u8,
    /// Y index register
    pub y: u8,
    /// Stack pointer (points to 0x0100 + sp)
    pub sp: u8,
    /// Status register (NV-BDIZC)
    pub status: u8,
    /// Program counter
    pub pc: u16,
    /// Cycles left before the next instruction is fetched
    pub cycles_remaining: u32,
    /// Total cycles elapsed through `clock`
    pub cycles: u64,
    /// Total instructions executed
    pub instructions: u64,
    /// Undocumented opcodes encountered (each executed as a NOP)
    pub unknown_opcodes: u64,
    /// Reset vector as read from $FFFC/$FFFD at the last reset
    pub reset_vector: u16,
    /// Set when the reset vector read zero and PC was patched to $F000
    pub reset_vector_was_patched: bool,
    /// Memory interface
    pub memory: M,
    /// NMI in progress flag
    in_nmi: bool,
}

impl<M: Memory6502> Cpu6502<M> {
    /// Create a new 6502 CPU with the given memory interface
    pub fn new(memory: M) -> Self {
        Self {
            a: 0,
            x: 0,
            y: 0,
            sp: 0xFD,
            status: FLAG_U | FLAG_I,
            pc: 0,
            cycles_remaining: 0,
            cycles: 0,
            instructions: 0,
            unknown_opcodes: 0,
            reset_vector: 0,
            reset_vector_was_patched: false,
            memory,
            in_nmi: false,
        }
    }

    /// Reset the CPU to initial state (preserves memory)
    ///
    /// Loads PC from the reset vector at $FFFC/$FFFD. A zeroed vector (blank
    /// ROM image) is patched to $F000 so execution lands in the cartridge
    /// window instead of looping on open bus.
    pub fn reset(&mut self) {
        self.a = 0;
        self.x = 0;
        self.y = 0;
        self.sp = 0xFD;
        self.status = FLAG_U | FLAG_I;
        self.cycles = 0;
        self.instructions = 0;
        self.unknown_opcodes = 0;
        self.in_nmi = false;
        self.cycles_remaining = 7;

        self.reset_vector = self.read_u16(0xFFFC);
        if self.reset_vector == 0 {
            warn!("reset vector is $0000, patching PC to $F000");
            self.pc = 0xF000;
            self.reset_vector_was_patched = true;
        } else {
            self.pc = self.reset_vector;
            self.reset_vector_was_patched = false;
        }
    }

    /// Advance the CPU by one clock cycle.
    ///
    /// An instruction executes in full on the cycle it is fetched and the
    /// remainder of its timing is consumed one `clock` call at a time.
    pub fn clock(&mut self) {
        if self.cycles_remaining == 0 {
            self.cycles_remaining = self.execute();
        }
        self.cycles_remaining -= 1;
        self.cycles = self.cycles.wrapping_add(1);
    }

    /// Execute one full instruction immediately and return cycles used.
    ///
    /// Instruction-granular driver for tests and tools; `clock` is the
    /// cycle-granular driver used by a running machine.
    pub fn step(&mut self) -> u32 {
        let used = self.execute();
        self.cycles = self.cycles.wrapping_add(used as u64);
        used
    }

    /// Check if currently executing an NMI handler
    pub fn is_in_nmi(&self) -> bool {
        self.in_nmi
    }

    #[inline]
    fn read(&mut self, addr: u16) -> u8 {
        self.memory.read(addr)
    }

    #[inline]
    fn write(&mut self, addr: u16, val: u8) {
        self.memory.write(addr, val);
    }

    fn read_u16(&mut self, addr: u16) -> u16 {
        let lo = self.read(addr) as u16;
        let hi = self.read(addr.wrapping_add(1)) as u16;
        (hi << 8) | lo
    }

    #[inline]
    fn fetch_u8(&mut self) -> u8 {
        let v = self.read(self.pc);
        self.pc = self.pc.wrapping_add(1);
        v
    }

    #[inline]
    fn fetch_u16(&mut self) -> u16 {
        let lo = self.fetch_u8() as u16;
        let hi = self.fetch_u8() as u16;
        (hi << 8) | lo
    }

    /// Read a 16-bit pointer for JMP (indirect) with the 6502 page-wrapping bug:
    /// the high byte comes from `(ptr & $FF00) | ((ptr + 1) & $FF)`.
    #[inline]
    fn read_indirect_u16_bug(&mut self, addr: u16) -> u16 {
        let lo = self.read(addr) as u16;
        let hi_addr = (addr & 0xFF00) | (addr.wrapping_add(1) & 0x00FF);
        let hi = self.read(hi_addr) as u16;
        (hi << 8) | lo
    }

    /// Resolve the effective address for a memory-operand addressing mode.
    /// Returns the address and whether an indexed mode crossed a page.
    fn operand_addr(&mut self, mode: AddrMode) -> (u16, bool) {
        match mode {
            AddrMode::Immediate => {
                let addr = self.pc;
                self.pc = self.pc.wrapping_add(1);
                (addr, false)
            }
            AddrMode::ZeroPage => (self.fetch_u8() as u16, false),
            AddrMode::ZeroPageX => (self.fetch_u8().wrapping_add(self.x) as u16, false),
            AddrMode::ZeroPageY => (self.fetch_u8().wrapping_add(self.y) as u16, false),
            AddrMode::Absolute => (self.fetch_u16(), false),
            AddrMode::AbsoluteX => {
                let base = self.fetch_u16();
                let addr = base.wrapping_add(self.x as u16);
                (addr, (base & 0xFF00) != (addr & 0xFF00))
            }
            AddrMode::AbsoluteY => {
                let base = self.fetch_u16();
                let addr = base.wrapping_add(self.y as u16);
                (addr, (base & 0xFF00) != (addr & 0xFF00))
            }
            AddrMode::IndirectX => {
                let zp = self.fetch_u8().wrapping_add(self.x);
                let lo = self.read(zp as u16) as u16;
                let hi = self.read(zp.wrapping_add(1) as u16) as u16;
                ((hi << 8) | lo, false)
            }
            AddrMode::IndirectY => {
                let zp = self.fetch_u8();
                let lo = self.read(zp as u16) as u16;
                let hi = self.read(zp.wrapping_add(1) as u16) as u16;
                let base = (hi << 8) | lo;
                let addr = base.wrapping_add(self.y as u16);
                (addr, (base & 0xFF00) != (addr & 0xFF00))
            }
            AddrMode::Indirect => {
                let ptr = self.fetch_u16();
                (self.read_indirect_u16_bug(ptr), false)
            }
            AddrMode::Implied | AddrMode::Accumulator | AddrMode::Relative => (0, false),
        }
    }

    /// Fetch the operand value for a read-style instruction.
    fn fetch_operand(&mut self, mode: AddrMode) -> (u8, bool) {
        let (addr, crossed) = self.operand_addr(mode);
        (self.read(addr), crossed)
    }

    #[inline]
    fn set_flag(&mut self, flag: u8, on: bool) {
        if on {
            self.status |= flag;
        } else {
            self.status &= !flag;
        }
    }

    fn set_zero_and_negative(&mut self, v: u8) {
        self.set_flag(FLAG_Z, v == 0);
        self.set_flag(FLAG_N, (v & 0x80) != 0);
    }

    #[inline]
    fn push_u8(&mut self, v: u8) {
        let addr = 0x0100u16 | self.sp as u16;
        self.write(addr, v);
        self.sp = self.sp.wrapping_sub(1);
    }

    #[inline]
    fn pop_u8(&mut self) -> u8 {
        self.sp = self.sp.wrapping_add(1);
        let addr = 0x0100u16 | self.sp as u16;
        self.read(addr)
    }

    #[inline]
    fn push_u16(&mut self, v: u16) {
        self.push_u8((v >> 8) as u8);
        self.push_u8((v & 0xFF) as u8);
    }

    #[inline]
    fn pop_u16(&mut self) -> u16 {
        let lo = self.pop_u8() as u16;
        let hi = self.pop_u8() as u16;
        (hi << 8) | lo
    }

    /// Trigger a Non-Maskable Interrupt (NMI)
    pub fn trigger_nmi(&mut self) {
        // Avoid nested NMIs in this simplified model.
        if self.in_nmi {
            return;
        }
        self.in_nmi = true;
        self.push_u16(self.pc);
        let s = (self.status & !FLAG_B) | FLAG_U;
        self.push_u8(s);
        self.status |= FLAG_I;
        self.pc = self.read_u16(0xFFFA);
        self.cycles_remaining += 7;
    }

    /// Trigger a maskable IRQ (interrupt request)
    pub fn trigger_irq(&mut self) {
        // Respect the I flag: if set, ignore maskable IRQs.
        if (self.status & FLAG_I) != 0 {
            return;
        }
        self.push_u16(self.pc);
        let s = (self.status & !FLAG_B) | FLAG_U;
        self.push_u8(s);
        self.status |= FLAG_I;
        self.pc = self.read_u16(0xFFFE);
        self.cycles_remaining += 7;
    }

    /// ADC core shared by ADC and SBC. Binary mode sets C on a carry out of
    /// bit 7 and V from the signed overflow rule. Decimal mode propagates BCD
    /// half-carries but computes V from the binary sum (NMOS behavior).
    fn adc(&mut self, v: u8) {
        let carry_in = (self.status & FLAG_C != 0) as u16;
        if self.status & FLAG_D != 0 {
            let bin = self.a as u16 + v as u16 + carry_in;
            self.set_flag(FLAG_V, (!(self.a ^ v) & (self.a ^ bin as u8) & 0x80) != 0);

            let mut lo = (self.a & 0x0F) as u16 + (v & 0x0F) as u16 + carry_in;
            let mut hi = (self.a >> 4) as u16 + (v >> 4) as u16;
            if lo > 9 {
                lo += 6;
                hi += 1;
            }
            if hi > 9 {
                hi += 6;
            }
            self.set_flag(FLAG_C, hi > 0x0F);
            self.a = (((hi & 0x0F) << 4) | (lo & 0x0F)) as u8;
        } else {
            let sum = self.a as u16 + v as u16 + carry_in;
            let result = sum as u8;
            self.set_flag(FLAG_C, sum > 0xFF);
            self.set_flag(FLAG_V, (!(self.a ^ v) & (self.a ^ result) & 0x80) != 0);
            self.a = result;
        }
        self.set_zero_and_negative(self.a);
    }

    fn compare(&mut self, reg: u8, v: u8) {
        self.set_flag(FLAG_C, reg >= v);
        self.set_zero_and_negative(reg.wrapping_sub(v));
    }

    fn asl_value(&mut self, v: u8) -> u8 {
        self.set_flag(FLAG_C, (v & 0x80) != 0);
        let r = v << 1;
        self.set_zero_and_negative(r);
        r
    }

    fn lsr_value(&mut self, v: u8) -> u8 {
        self.set_flag(FLAG_C, (v & 0x01) != 0);
        let r = v >> 1;
        self.set_zero_and_negative(r);
        r
    }

    fn rol_value(&mut self, v: u8) -> u8 {
        let carry_in = (self.status & FLAG_C != 0) as u8;
        self.set_flag(FLAG_C, (v & 0x80) != 0);
        let r = (v << 1) | carry_in;
        self.set_zero_and_negative(r);
        r
    }

    fn ror_value(&mut self, v: u8) -> u8 {
        let carry_in = if self.status & FLAG_C != 0 { 0x80 } else { 0 };
        self.set_flag(FLAG_C, (v & 0x01) != 0);
        let r = (v >> 1) | carry_in;
        self.set_zero_and_negative(r);
        r
    }

    /// Apply a read-modify-write shift through the descriptor's addressing mode.
    fn rmw(&mut self, mode: AddrMode, f: fn(&mut Self, u8) -> u8) {
        if mode == AddrMode::Accumulator {
            self.a = f(self, self.a);
        } else {
            let (addr, _) = self.operand_addr(mode);
            let v = self.read(addr);
            let r = f(self, v);
            self.write(addr, r);
        }
    }

    /// Conditional relative branch. A taken branch costs one extra cycle,
    /// two when the destination is on a different page.
    fn branch(&mut self, base: u8, cond: bool) -> u32 {
        let offset = self.fetch_u8() as i8;
        if cond {
            let old = self.pc;
            self.pc = old.wrapping_add(offset as i16 as u16);
            let mut extra = 1;
            if (old & 0xFF00) != (self.pc & 0xFF00) {
                extra += 1;
            }
            base as u32 + extra
        } else {
            base as u32
        }
    }

    fn penalty(desc: &Opcode, crossed: bool) -> u32 {
        (desc.page_penalty && crossed) as u32
    }

    /// Fetch, decode through the opcode table, and execute one instruction.
    /// Returns the total cycle count including page-cross and branch extras.
    fn execute(&mut self) -> u32 {
        let op = self.fetch_u8();
        let desc = OPCODES[op as usize];
        self.instructions = self.instructions.wrapping_add(1);
        let base = desc.cycles as u32;

        let used = match desc.mnemonic {
            Mnemonic::Lda => {
                let (v, crossed) = self.fetch_operand(desc.mode);
                self.a = v;
                self.set_zero_and_negative(v);
                base + Self::penalty(&desc, crossed)
            }
            Mnemonic::Ldx => {
                let (v, crossed) = self.fetch_operand(desc.mode);
                self.x = v;
                self.set_zero_and_negative(v);
                base + Self::penalty(&desc, crossed)
            }
            Mnemonic::Ldy => {
                let (v, crossed) = self.fetch_operand(desc.mode);
                self.y = v;
                self.set_zero_and_negative(v);
                base + Self::penalty(&desc, crossed)
            }
            Mnemonic::Sta => {
                let (addr, _) = self.operand_addr(desc.mode);
                self.write(addr, self.a);
                base
            }
            Mnemonic::Stx => {
                let (addr, _) = self.operand_addr(desc.mode);
                self.write(addr, self.x);
                base
            }
            Mnemonic::Sty => {
                let (addr, _) = self.operand_addr(desc.mode);
                self.write(addr, self.y);
                base
            }
            Mnemonic::Adc => {
                let (v, crossed) = self.fetch_operand(desc.mode);
                self.adc(v);
                base + Self::penalty(&desc, crossed)
            }
            Mnemonic::Sbc => {
                // SBC(v) is ADC(v XOR $FF), in both binary and decimal mode.
                let (v, crossed) = self.fetch_operand(desc.mode);
                self.adc(v ^ 0xFF);
                base + Self::penalty(&desc, crossed)
            }
            Mnemonic::And => {
                let (v, crossed) = self.fetch_operand(desc.mode);
                self.a &= v;
                self.set_zero_and_negative(self.a);
                base + Self::penalty(&desc, crossed)
            }
            Mnemonic::Ora => {
                let (v, crossed) = self.fetch_operand(desc.mode);
                self.a |= v;
                self.set_zero_and_negative(self.a);
                base + Self::penalty(&desc, crossed)
            }
            Mnemonic::Eor => {
                let (v, crossed) = self.fetch_operand(desc.mode);
                self.a ^= v;
                self.set_zero_and_negative(self.a);
                base + Self::penalty(&desc, crossed)
            }
            Mnemonic::Bit => {
                let (v, _) = self.fetch_operand(desc.mode);
                self.set_flag(FLAG_Z, (self.a & v) == 0);
                self.set_flag(FLAG_V, (v & 0x40) != 0);
                self.set_flag(FLAG_N, (v & 0x80) != 0);
                base
            }
            Mnemonic::Cmp => {
                let (v, crossed) = self.fetch_operand(desc.mode);
                self.compare(self.a, v);
                base + Self::penalty(&desc, crossed)
            }
            Mnemonic::Cpx => {
                let (v, _) = self.fetch_operand(desc.mode);
                self.compare(self.x, v);
                base
            }
            Mnemonic::Cpy => {
                let (v, _) = self.fetch_operand(desc.mode);
                self.compare(self.y, v);
                base
            }
            Mnemonic::Asl => {
                self.rmw(desc.mode, Self::asl_value);
                base
            }
            Mnemonic::Lsr => {
                self.rmw(desc.mode, Self::lsr_value);
                base
            }
            Mnemonic::Rol => {
                self.rmw(desc.mode, Self::rol_value);
                base
            }
            Mnemonic::Ror => {
                self.rmw(desc.mode, Self::ror_value);
                base
            }
            Mnemonic::Inc => {
                let (addr, _) = self.operand_addr(desc.mode);
                let v = self.read(addr).wrapping_add(1);
                self.write(addr, v);
                self.set_zero_and_negative(v);
                base
            }
            Mnemonic::Dec => {
                let (addr, _) = self.operand_addr(desc.mode);
                let v = self.read(addr).wrapping_sub(1);
                self.write(addr, v);
                self.set_zero_and_negative(v);
                base
            }
            Mnemonic::Inx => {
                self.x = self.x.wrapping_add(1);
                self.set_zero_and_negative(self.x);
                base
            }
            Mnemonic::Iny => {
                self.y = self.y.wrapping_add(1);
                self.set_zero_and_negative(self.y);
                base
            }
            Mnemonic::Dex => {
                self.x = self.x.wrapping_sub(1);
                self.set_zero_and_negative(self.x);
                base
            }
            Mnemonic::Dey => {
                self.y = self.y.wrapping_sub(1);
                self.set_zero_and_negative(self.y);
                base
            }
            Mnemonic::Tax => {
                self.x = self.a;
                self.set_zero_and_negative(self.x);
                base
            }
            Mnemonic::Tay => {
                self.y = self.a;
                self.set_zero_and_negative(self.y);
                base
            }
            Mnemonic::Txa => {
                self.a = self.x;
                self.set_zero_and_negative(self.a);
                base
            }
            Mnemonic::Tya => {
                self.a = self.y;
                self.set_zero_and_negative(self.a);
                base
            }
            Mnemonic::Tsx => {
                self.x = self.sp;
                self.set_zero_and_negative(self.x);
                base
            }
            Mnemonic::Txs => {
                // TXS does not touch flags
                self.sp = self.x;
                base
            }
            Mnemonic::Pha => {
                self.push_u8(self.a);
                base
            }
            Mnemonic::Php => {
                // B and bit 5 read as set in the pushed copy
                let s = self.status | FLAG_B | FLAG_U;
                self.push_u8(s);
                base
            }
            Mnemonic::Pla => {
                self.a = self.pop_u8();
                self.set_zero_and_negative(self.a);
                base
            }
            Mnemonic::Plp => {
                let s = self.pop_u8();
                self.status = (s | FLAG_U) & !FLAG_B;
                base
            }
            Mnemonic::Jmp => {
                let (addr, _) = self.operand_addr(desc.mode);
                self.pc = addr;
                base
            }
            Mnemonic::Jsr => {
                let addr = self.fetch_u16();
                let ret = self.pc.wrapping_sub(1);
                self.push_u16(ret);
                self.pc = addr;
                base
            }
            Mnemonic::Rts => {
                let ret = self.pop_u16();
                self.pc = ret.wrapping_add(1);
                base
            }
            Mnemonic::Rti => {
                let s = self.pop_u8();
                self.status = (s | FLAG_U) & !FLAG_B;
                self.pc = self.pop_u16();
                self.in_nmi = false;
                base
            }
            Mnemonic::Brk => {
                // BRK is a 2-byte instruction; the return PC skips the
                // signature byte.
                let pc_to_push = self.pc.wrapping_add(1);
                self.push_u16(pc_to_push);
                let s = self.status | FLAG_B | FLAG_U;
                self.push_u8(s);
                self.status |= FLAG_I;
                self.pc = self.read_u16(0xFFFE);
                base
            }
            Mnemonic::Bcc => self.branch(desc.cycles, (self.status & FLAG_C) == 0),
            Mnemonic::Bcs => self.branch(desc.cycles, (self.status & FLAG_C) != 0),
            Mnemonic::Beq => self.branch(desc.cycles, (self.status & FLAG_Z) != 0),
            Mnemonic::Bne => self.branch(desc.cycles, (self.status & FLAG_Z) == 0),
            Mnemonic::Bmi => self.branch(desc.cycles, (self.status & FLAG_N) != 0),
            Mnemonic::Bpl => self.branch(desc.cycles, (self.status & FLAG_N) == 0),
            Mnemonic::Bvs => self.branch(desc.cycles, (self.status & FLAG_V) != 0),
            Mnemonic::Bvc => self.branch(desc.cycles, (self.status & FLAG_V) == 0),
            Mnemonic::Clc => {
                self.status &= !FLAG_C;
                base
            }
            Mnemonic::Sec => {
                self.status |= FLAG_C;
                base
            }
            Mnemonic::Cli => {
                self.status &= !FLAG_I;
                base
            }
            Mnemonic::Sei => {
                self.status |= FLAG_I;
                base
            }
            Mnemonic::Cld => {
                self.status &= !FLAG_D;
                base
            }
            Mnemonic::Sed => {
                self.status |= FLAG_D;
                base
            }
            Mnemonic::Clv => {
                self.status &= !FLAG_V;
                base
            }
            Mnemonic::Nop => base,
            Mnemonic::Unknown => {
                self.unknown_opcodes = self.unknown_opcodes.wrapping_add(1);
                trace!(
                    "unknown opcode ${:02X} at ${:04X}, executing as NOP",
                    op,
                    self.pc.wrapping_sub(1)
                );
                base
            }
        };

        // Bit 5 reads back as 1 no matter what an instruction did to P.
        self.status |= FLAG_U;
        used
    }
}

impl<M: Memory6502> crate::Cpu for Cpu6502<M> {
    fn reset(&mut self) {
        Cpu6502::reset(self);
    }

    fn clock(&mut self) {
        Cpu6502::clock(self);
    }
}

/// Simple array-based memory implementation for testing
#[derive(Debug)]
pub struct ArrayMemory {
    pub data: [u8; 0x10000],
}

impl ArrayMemory {
    pub fn new() -> Self {
        Self { data: [0; 0x10000] }
    }

    /// Load a program into memory and set reset vector
    pub fn load_program(&mut self, offset: u16, data: &[u8]) {
        let off = offset as usize;
        self.data[off..off + data.len()].copy_from_slice(data);
        self.data[0xFFFC] = (offset & 0xFF) as u8;
        self.data[0xFFFD] = (offset >> 8) as u8;
    }
}

impl Default for ArrayMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl Memory6502 for ArrayMemory {
    fn read(&mut self, addr: u16) -> u8 {
        self.data[addr as usize]
    }

    fn write(&mut self, addr: u16, val: u8) {
        self.data[addr as usize] = val;
    }
}
