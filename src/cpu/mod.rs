//! ARM7TDMI register file, mode engine, and instruction dispatch loop.
//!
//! The interpreter proper lives in [`arm`] and [`thumb`]; this module owns
//! the 16 visible registers, the banked copies swapped in on a mode change,
//! CPSR/SPSR, and the one-entry prefetch queue described in the ARM7TDMI
//! data sheet.
//!
//! # References
//! - ARM7TDMI Data Sheet (ARM DDI 0029)

pub mod alu;
pub mod arm;
pub mod barrel;
pub mod flags;
pub mod thumb;

use crate::bus::Bus;

/// Registers banked away from the live `r[8..16]` view while not current.
#[derive(Debug, Clone)]
struct Banks {
    /// r8..r14 while CPU is in FIQ mode.
    fiq: [u32; 7],
    /// r8..r12 shared by every non-FIQ mode, plus USR/SYS's own r13,r14.
    usr: [u32; 7],
    svc: [u32; 2],
    abt: [u32; 2],
    irq: [u32; 2],
    und: [u32; 2],
}

impl Default for Banks {
    fn default() -> Self {
        Self {
            fiq: [0; 7],
            usr: [0; 7],
            svc: [0; 2],
            abt: [0; 2],
            irq: [0; 2],
            und: [0; 2],
        }
    }
}

/// ARM7TDMI CPU state: the banked register file plus the dual-mode prefetch
/// queue and halt latch.
pub struct Cpu {
    /// Live view of R0..R15, valid for the currently selected mode.
    pub r: [u32; 16],
    pub cpsr: u32,
    spsr_fiq: u32,
    spsr_irq: u32,
    spsr_svc: u32,
    spsr_abt: u32,
    spsr_und: u32,
    banks: Banks,
    /// Set by HALTCNT or the Thumb/ARM HALT-equivalent; cleared when an
    /// enabled interrupt becomes pending.
    pub halted: bool,
    arm_prefetch: u32,
    thumb_prefetch: u16,
}

impl Cpu {
    pub fn new() -> Self {
        Self {
            r: [0; 16],
            cpsr: flags::mode::SYS,
            spsr_fiq: 0,
            spsr_irq: 0,
            spsr_svc: 0,
            spsr_abt: 0,
            spsr_und: 0,
            banks: Banks::default(),
            halted: false,
            arm_prefetch: 0,
            thumb_prefetch: 0,
        }
    }

    /// `reset(skip_bios)`: clear general registers, seed the SVC/IRQ stack
    /// pointers to their fixed boot values, select SYS mode, and point PC at
    /// either the BIOS entry point or the cartridge entry point.
    pub fn reset(&mut self, skip_bios: bool, bus: &mut Bus) {
        self.r = [0; 16];
        self.cpsr = flags::mode::SYS;
        self.spsr_fiq = 0;
        self.spsr_irq = 0;
        self.spsr_svc = 0;
        self.spsr_abt = 0;
        self.spsr_und = 0;
        self.banks = Banks::default();
        self.banks.svc[0] = 0x0300_7FE0;
        self.banks.irq[0] = 0x0300_7FA0;
        self.halted = false;
        self.r[15] = if skip_bios { 0x0800_0000 } else { 0x0000_0000 };
        self.reload_pipeline(bus);
    }

    #[inline]
    pub fn mode(&self) -> u32 {
        self.cpsr & flags::MODE_MASK
    }

    #[inline]
    pub fn thumb_state(&self) -> bool {
        self.cpsr & flags::T != 0
    }

    /// Write CPSR, performing the outgoing/incoming bank swap implied by a
    /// mode change. Idempotent for mode-unchanged writes.
    pub fn write_cpsr(&mut self, new: u32) {
        let old_mode = self.mode();
        let new_mode = new & flags::MODE_MASK;
        if old_mode != new_mode {
            self.swap_bank(old_mode, new_mode);
        }
        self.cpsr = new;
    }

    fn swap_bank(&mut self, old: u32, new: u32) {
        if old == flags::mode::FIQ {
            self.banks.fiq.copy_from_slice(&self.r[8..15]);
        } else {
            self.banks.usr[0..5].copy_from_slice(&self.r[8..13]);
            self.save_r13_r14(old, self.r[13], self.r[14]);
        }
        if new == flags::mode::FIQ {
            self.r[8..15].copy_from_slice(&self.banks.fiq);
        } else {
            self.r[8..13].copy_from_slice(&self.banks.usr[0..5]);
            let (r13, r14) = self.load_r13_r14(new);
            self.r[13] = r13;
            self.r[14] = r14;
        }
    }

    fn save_r13_r14(&mut self, mode: u32, r13: u32, r14: u32) {
        match mode {
            flags::mode::USR | flags::mode::SYS => {
                self.banks.usr[5] = r13;
                self.banks.usr[6] = r14;
            }
            flags::mode::SVC => self.banks.svc = [r13, r14],
            flags::mode::ABT => self.banks.abt = [r13, r14],
            flags::mode::IRQ => self.banks.irq = [r13, r14],
            flags::mode::UND => self.banks.und = [r13, r14],
            _ => {}
        }
    }

    fn load_r13_r14(&self, mode: u32) -> (u32, u32) {
        match mode {
            flags::mode::USR | flags::mode::SYS => (self.banks.usr[5], self.banks.usr[6]),
            flags::mode::SVC => (self.banks.svc[0], self.banks.svc[1]),
            flags::mode::ABT => (self.banks.abt[0], self.banks.abt[1]),
            flags::mode::IRQ => (self.banks.irq[0], self.banks.irq[1]),
            flags::mode::UND => (self.banks.und[0], self.banks.und[1]),
            _ => (0, 0),
        }
    }

    /// SPSR of the current mode, or a sentinel (0) in USR/SYS where there is
    /// none.
    pub fn read_spsr(&self) -> u32 {
        match self.mode() {
            flags::mode::FIQ => self.spsr_fiq,
            flags::mode::IRQ => self.spsr_irq,
            flags::mode::SVC => self.spsr_svc,
            flags::mode::ABT => self.spsr_abt,
            flags::mode::UND => self.spsr_und,
            _ => 0,
        }
    }

    /// Writes are discarded outside an exception mode.
    pub fn write_spsr(&mut self, val: u32) {
        match self.mode() {
            flags::mode::FIQ => self.spsr_fiq = val,
            flags::mode::IRQ => self.spsr_irq = val,
            flags::mode::SVC => self.spsr_svc = val,
            flags::mode::ABT => self.spsr_abt = val,
            flags::mode::UND => self.spsr_und = val,
            _ => {}
        }
    }

    /// Reload the one-entry prefetch queue from the current value of `r[15]`
    /// (the next fetch address), in whichever state CPSR.T selects. Leaves
    /// `r[15]` pointing 8 (ARM) or 4 (Thumb) bytes past the refetched
    /// instruction, matching what that instruction will read as its own PC.
    pub fn reload_pipeline(&mut self, bus: &mut Bus) {
        if !self.thumb_state() {
            let target = self.r[15] & !3;
            self.arm_prefetch = bus.read32_exec(target);
            self.r[15] = target.wrapping_add(4);
        } else {
            let target = self.r[15] & !1;
            self.thumb_prefetch = bus.read16_exec(target);
            self.r[15] = target.wrapping_add(2);
        }
    }

    /// Branch to `target`: set the new PC and flush+refill the pipeline.
    pub fn branch_to(&mut self, target: u32, bus: &mut Bus) {
        self.r[15] = target;
        self.reload_pipeline(bus);
    }

    /// Enter an exception: snapshot CPSR into `SPSR_<mode>`, save the return
    /// address in `R14_<mode>`, switch to ARM state in `mode`, and vector to
    /// `vector`.
    pub fn enter_exception(&mut self, mode: u32, vector: u32, set_i: bool, set_f: bool, bus: &mut Bus) {
        let old_cpsr = self.cpsr;
        let thumb = old_cpsr & flags::T != 0;
        let return_pc = if thumb {
            self.r[15].wrapping_add(2)
        } else {
            self.r[15]
        };
        let mut new_cpsr = (old_cpsr & !(flags::T | flags::MODE_MASK)) | mode;
        if set_i {
            new_cpsr |= flags::I;
        }
        if set_f {
            new_cpsr |= flags::F;
        }
        self.write_cpsr(new_cpsr);
        self.write_spsr(old_cpsr);
        self.r[14] = return_pc;
        self.r[15] = vector;
        self.reload_pipeline(bus);
    }

    /// Execute one instruction; returns the number of cycles it cost
    /// (excluding memory wait-cycles, which the bus accumulates separately).
    pub fn step(&mut self, bus: &mut Bus) -> u32 {
        if !self.thumb_state() {
            self.step_arm(bus)
        } else {
            self.step_thumb(bus)
        }
    }

    fn fetch_arm(&mut self, bus: &mut Bus) -> u32 {
        let instr = self.arm_prefetch;
        self.arm_prefetch = bus.read32_exec(self.r[15]);
        self.r[15] = self.r[15].wrapping_add(4);
        instr
    }

    fn fetch_thumb(&mut self, bus: &mut Bus) -> u16 {
        let instr = self.thumb_prefetch;
        self.thumb_prefetch = bus.read16_exec(self.r[15]);
        self.r[15] = self.r[15].wrapping_add(2);
        instr
    }
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::Bus;
    use crate::cart::NullCartridge;
    use crate::memory::BackingRam;

    fn test_bus() -> Bus {
        Bus::new(vec![0u8; 16 * 1024], BackingRam::new(), Box::new(NullCartridge)).unwrap()
    }

    #[test]
    fn test_reset_skip_bios() {
        let mut bus = test_bus();
        let mut cpu = Cpu::new();
        cpu.reset(true, &mut bus);
        assert_eq!(cpu.mode(), flags::mode::SYS);
        for i in 0..15 {
            assert_eq!(cpu.r[i], 0);
        }
    }

    #[test]
    fn test_mode_swap_round_trip() {
        let mut bus = test_bus();
        let mut cpu = Cpu::new();
        cpu.reset(true, &mut bus);
        let before = cpu.r;
        cpu.write_cpsr((cpu.cpsr & !flags::MODE_MASK) | flags::mode::IRQ);
        cpu.r[13] = 0xDEAD_0000;
        cpu.write_cpsr((cpu.cpsr & !flags::MODE_MASK) | flags::mode::SYS);
        for i in 0..15 {
            assert_eq!(cpu.r[i], before[i]);
        }
    }

    #[test]
    fn test_fiq_banks_r8_through_r14() {
        let mut bus = test_bus();
        let mut cpu = Cpu::new();
        cpu.reset(true, &mut bus);
        cpu.r[8] = 0x1111;
        cpu.r[13] = 0x2222;
        cpu.write_cpsr((cpu.cpsr & !flags::MODE_MASK) | flags::mode::FIQ);
        assert_eq!(cpu.r[8], 0); // fresh FIQ bank
        cpu.r[8] = 0x3333;
        cpu.write_cpsr((cpu.cpsr & !flags::MODE_MASK) | flags::mode::SYS);
        assert_eq!(cpu.r[8], 0x1111);
        assert_eq!(cpu.r[13], 0x2222);
    }

    #[test]
    fn test_spsr_sentinel_in_usr_mode() {
        let mut bus = test_bus();
        let mut cpu = Cpu::new();
        cpu.reset(true, &mut bus);
        cpu.write_spsr(0xDEAD_BEEF);
        assert_eq!(cpu.read_spsr(), 0);
    }

    #[test]
    fn test_enter_irq_exception_sets_banked_state() {
        let mut bus = test_bus();
        let mut cpu = Cpu::new();
        cpu.reset(true, &mut bus);
        let old_cpsr = cpu.cpsr;
        let return_site = cpu.r[15];
        cpu.enter_exception(flags::mode::IRQ, 0x18, true, false, &mut bus);
        assert_eq!(cpu.mode(), flags::mode::IRQ);
        assert_eq!(cpu.r[15], 0x18);
        assert!(cpu.cpsr & flags::I != 0);
        assert!(cpu.cpsr & flags::T == 0);
        assert_eq!(cpu.read_spsr(), old_cpsr);
        assert_eq!(cpu.r[14], return_site);
    }
}
