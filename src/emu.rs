//! Emulator orchestrator.
//!
//! Coordinates the CPU, the memory bus, and the IO/DMA/timer subsystem:
//! the per-instruction dispatch loop, halt handling, and the two IRQ entry
//! points (`fire_irq`, `request_irq`) external code drives from a scanline
//! timer or from key/DMA events.

use crate::bus::Bus;
use crate::cart::{CartridgeProvider, NullCartridge};
use crate::cpu::flags;
use crate::cpu::Cpu;
use crate::error::CoreError;
use crate::memory::BackingRam;

/// Reason the last `execute` call returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Completed the requested cycle budget.
    CyclesComplete,
    /// CPU halted (HALTCNT) and no enabled interrupt is pending.
    Halted,
}

/// Top-level emulator state: the CPU, the bus, and the bookkeeping the host
/// needs (cycle totals, whether a cartridge is mapped).
pub struct Emu {
    cpu: Cpu,
    bus: Bus,
    cart_loaded: bool,
    last_stop: StopReason,
    total_cycles: u64,
}

impl Emu {
    /// Construct a core with the given BIOS image and no cartridge mapped.
    /// `execute` is a no-op until [`Emu::load_cart`] succeeds.
    pub fn new(bios: Vec<u8>) -> Result<Self, CoreError> {
        let bus = Bus::new(bios, BackingRam::new(), Box::new(NullCartridge))?;
        Ok(Self {
            cpu: Cpu::new(),
            bus,
            cart_loaded: false,
            last_stop: StopReason::CyclesComplete,
            total_cycles: 0,
        })
    }

    /// Map a cartridge and reset to run it.
    pub fn load_cart(&mut self, cart: Box<dyn CartridgeProvider>, skip_bios: bool) -> Result<(), CoreError> {
        self.bus.load_cart(cart)?;
        self.cart_loaded = true;
        self.reset(skip_bios);
        Ok(())
    }

    /// Reset CPU and IO state. Backing RAM (EWRAM/IWRAM/VRAM/SRAM/EEPROM) is
    /// left untouched so save data survives a reset.
    pub fn reset(&mut self, skip_bios: bool) {
        self.bus.reset();
        self.cpu.reset(skip_bios, &mut self.bus);
        self.total_cycles = 0;
        self.last_stop = StopReason::CyclesComplete;
    }

    /// Run until `added_cycles` worth of work has been performed or the CPU
    /// halts with nothing pending to wake it. Returns cycles actually spent.
    ///
    /// Per instruction: dispatch to the active interpreter, drain the wait
    /// cycles the bus accumulated, tick timers and sound by the combined
    /// cost, then check for a newly pending, enabled interrupt.
    pub fn execute(&mut self, added_cycles: u32) -> u32 {
        if !self.cart_loaded {
            return 0;
        }

        let start = self.total_cycles;
        let mut remaining = added_cycles;

        while remaining > 0 {
            if self.cpu.halted {
                if self.bus.io.interrupt.enabled_and_pending() {
                    self.cpu.halted = false;
                } else {
                    self.bus.tick(remaining);
                    self.total_cycles += remaining as u64;
                    self.last_stop = StopReason::Halted;
                    return (self.total_cycles - start) as u32;
                }
            }

            let cycles_used = self.cpu.step(&mut self.bus);
            let wait = self.bus.take_wait_cycles();
            let total = cycles_used + wait;

            if self.bus.halt_requested {
                self.cpu.halted = true;
                self.bus.halt_requested = false;
            }

            self.bus.tick(total);
            self.fire_irq();

            self.total_cycles += total as u64;
            remaining = remaining.saturating_sub(total);
        }

        self.last_stop = StopReason::CyclesComplete;
        (self.total_cycles - start) as u32
    }

    /// Enter the IRQ exception at vector 0x18 if IME is set, IE & IF is
    /// non-zero, and CPSR.I is clear. Called after every instruction, and
    /// may also be called by the host on scanline boundaries or after
    /// changing IE/IF directly.
    pub fn fire_irq(&mut self) {
        if self.bus.io.interrupt.enabled_and_pending() && self.cpu.cpsr & flags::I == 0 {
            self.cpu.enter_exception(flags::mode::IRQ, 0x18, true, false, &mut self.bus);
        }
    }

    /// Set a bit in IF (interrupt pending). No ack, no auto-clear; the guest
    /// clears it by writing 1 to the bit.
    pub fn request_irq(&mut self, bit: u16) {
        self.bus.io.interrupt.request(bit);
    }

    /// Host-facing key state: replace the full active-high button mask.
    pub fn set_keys(&mut self, pressed: u16) {
        self.bus.io.keypad.set_pressed(pressed);
    }

    /// Run the DMA channels that trigger on HBlank. Called by the external
    /// renderer at the start of each scanline's HBlank period.
    pub fn hblank_dma(&mut self) {
        self.bus.hblank_dma();
    }

    /// Run the DMA channels that trigger on VBlank. Called by the external
    /// renderer once per frame.
    pub fn vblank_dma(&mut self) {
        self.bus.vblank_dma();
    }

    /// Latched FIFO A sample, read by the external mixer at its own sample
    /// rate. Dequeues are driven by the clock timer configured in
    /// SOUNDCNT_H, not by the mixer.
    pub fn sample_a(&self) -> i8 {
        self.bus.io.fifo_a.latched
    }

    /// Latched FIFO B sample; see [`Emu::sample_a`].
    pub fn sample_b(&self) -> i8 {
        self.bus.io.fifo_b.latched
    }

    /// Read a memory byte through the debug surface (no wait-cycle or
    /// open-bus side effects). Used by the renderer and by save-state code.
    pub fn peek_byte(&mut self, addr: u32) -> u8 {
        self.bus.peek8(addr)
    }

    /// SRAM backing store, for host-side persistence between sessions.
    pub fn sram(&self) -> &[u8] {
        self.bus.ram.sram()
    }

    pub fn sram_mut(&mut self) -> &mut [u8] {
        self.bus.ram.sram_mut()
    }

    /// EEPROM backing store, for host-side persistence between sessions.
    pub fn eeprom(&self) -> &[u8] {
        self.bus.ram.eeprom()
    }

    pub fn eeprom_mut(&mut self) -> &mut [u8] {
        self.bus.ram.eeprom_mut()
    }

    pub fn last_stop_reason(&self) -> StopReason {
        self.last_stop
    }

    pub fn total_cycles(&self) -> u64 {
        self.total_cycles
    }

    pub fn pc(&self) -> u32 {
        self.cpu.r[15]
    }

    pub fn cart_loaded(&self) -> bool {
        self.cart_loaded
    }

    /// CPU register dump for debugging.
    pub fn dump_registers(&self) -> String {
        let mut out = String::new();
        for i in 0..16 {
            out.push_str(&format!("R{:<2}={:08X} ", i, self.cpu.r[i]));
            if i % 4 == 3 {
                out.push('\n');
            }
        }
        out.push_str(&format!(
            "CPSR={:08X} mode={:02X} T={} I={} F={}\n",
            self.cpu.cpsr,
            self.cpu.mode(),
            self.cpu.thumb_state() as u8,
            (self.cpu.cpsr & flags::I != 0) as u8,
            (self.cpu.cpsr & flags::F != 0) as u8,
        ));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cart::SliceCartridge;
    use crate::peripherals::interrupt::irq;

    fn bios() -> Vec<u8> {
        vec![0u8; 16 * 1024]
    }

    #[test]
    fn test_execute_without_cart_is_noop() {
        let mut emu = Emu::new(bios()).unwrap();
        assert_eq!(emu.execute(1000), 0);
    }

    #[test]
    fn test_load_cart_resets_and_marks_loaded() {
        let mut emu = Emu::new(bios()).unwrap();
        let cart = SliceCartridge::new(vec![0u8; 0x10000]);
        emu.load_cart(Box::new(cart), true).unwrap();
        assert!(emu.cart_loaded());
        assert_eq!(emu.pc(), 0x0800_0008); // reload_pipeline advances PC by 8 in ARM mode
    }

    #[test]
    fn test_execute_runs_mov_instruction() {
        let mut emu = Emu::new(bios()).unwrap();
        let mut rom = vec![0u8; 0x10000];
        // MOV R0, #0x12 at the cartridge entry point.
        rom[0..4].copy_from_slice(&0xE3A0_0012u32.to_le_bytes());
        emu.load_cart(Box::new(SliceCartridge::new(rom)), true).unwrap();
        let spent = emu.execute(100);
        assert!(spent > 0);
    }

    #[test]
    fn test_halt_consumes_remaining_budget() {
        let mut emu = Emu::new(bios()).unwrap();
        let cart = SliceCartridge::new(vec![0u8; 0x10000]);
        emu.load_cart(Box::new(cart), true).unwrap();
        emu.bus.io.interrupt.ime = 0; // keep the pending check false
        emu.cpu.halted = true;
        let spent = emu.execute(500);
        assert_eq!(spent, 500);
        assert_eq!(emu.last_stop_reason(), StopReason::Halted);
    }

    #[test]
    fn test_halt_clears_when_interrupt_becomes_pending() {
        let mut emu = Emu::new(bios()).unwrap();
        let cart = SliceCartridge::new(vec![0u8; 0x10000]);
        emu.load_cart(Box::new(cart), true).unwrap();
        emu.cpu.halted = true;
        emu.bus.io.interrupt.ime = 1;
        emu.bus.io.interrupt.ie = irq::VBLANK;
        emu.request_irq(irq::VBLANK);
        emu.execute(100);
        assert!(!emu.cpu.halted);
    }

    #[test]
    fn test_reset_preserves_sram() {
        let mut emu = Emu::new(bios()).unwrap();
        let cart = SliceCartridge::new(vec![0u8; 0x10000]);
        emu.load_cart(Box::new(cart), true).unwrap();
        emu.sram_mut()[0] = 0x7A;
        emu.reset(true);
        assert_eq!(emu.sram()[0], 0x7A);
    }

    #[test]
    fn test_fire_irq_enters_exception() {
        let mut emu = Emu::new(bios()).unwrap();
        let cart = SliceCartridge::new(vec![0u8; 0x10000]);
        emu.load_cart(Box::new(cart), true).unwrap();
        emu.bus.io.interrupt.ime = 1;
        emu.bus.io.interrupt.ie = irq::VBLANK;
        emu.request_irq(irq::VBLANK);
        emu.fire_irq();
        assert_eq!(emu.cpu.mode(), flags::mode::IRQ);
        assert_eq!(emu.cpu.cpsr & flags::I, flags::I);
    }
}
