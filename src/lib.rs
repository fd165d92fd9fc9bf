//! ARM7TDMI handheld console core
//!
//! A platform-agnostic emulator core with a stable C ABI. No OS APIs are
//! used here — all I/O is byte buffers in and out; the cartridge reader,
//! SRAM backing store, host key-input source, LCD renderer, and audio DSP
//! are external collaborators the host wires up around this core.
//!
//! # Architecture
//!
//! - `memory`: the sparse backing RAM (EWRAM/IWRAM/VRAM/palette/OAM/SRAM/EEPROM)
//! - `cart`: the read-only cartridge ROM interface
//! - `bus`: bank-nibble address decode, wait-cycle accounting, DMA bursts
//! - `cpu`: the ARM7TDMI register file, mode engine, and ARM/Thumb interpreters
//! - `peripherals`: IO registers, DMA channel state, timers, interrupts, EEPROM
//! - `emu`: the scheduler tying it all together
//!
//! # Address space (32-bit)
//!
//! | Bank | Region                         |
//! |------|--------------------------------|
//! | 0x0  | BIOS (16 KiB)                  |
//! | 0x2  | EWRAM (256 KiB)                |
//! | 0x3  | IWRAM (32 KiB)                 |
//! | 0x4  | IO registers                   |
//! | 0x5  | Palette RAM                    |
//! | 0x6  | VRAM                           |
//! | 0x7  | OAM                            |
//! | 0x8-0xD | Cartridge ROM (banks 1/2)   |
//! | 0xE  | Cartridge SRAM or EEPROM       |

pub mod bus;
pub mod cart;
pub mod cpu;
mod emu;
pub mod error;
pub mod memory;
pub mod peripherals;

#[cfg(feature = "wasm")]
mod wasm;

use std::ptr;
use std::slice;

pub use emu::{Emu, StopReason};
pub use error::CoreError;

use cart::SliceCartridge;

/// Create a new core from a 16 KiB BIOS image. Returns null if the BIOS is
/// missing or the wrong size.
#[no_mangle]
pub extern "C" fn core_create(bios: *const u8, bios_len: usize) -> *mut Emu {
    if bios.is_null() {
        return ptr::null_mut();
    }
    let bios = unsafe { slice::from_raw_parts(bios, bios_len) }.to_vec();
    match Emu::new(bios) {
        Ok(emu) => Box::into_raw(Box::new(emu)),
        Err(_) => ptr::null_mut(),
    }
}

/// Destroy a core instance. Safe to call with a null pointer.
#[no_mangle]
pub extern "C" fn core_destroy(core: *mut Emu) {
    if !core.is_null() {
        unsafe {
            drop(Box::from_raw(core));
        }
    }
}

/// Map a cartridge image and reset. Returns 0 on success, negative on a
/// cartridge whose size is not a power of two.
#[no_mangle]
pub extern "C" fn core_load_cart(core: *mut Emu, data: *const u8, len: usize, skip_bios: i32) -> i32 {
    if core.is_null() || data.is_null() {
        return -1;
    }
    let core = unsafe { &mut *core };
    let cart = SliceCartridge::new(unsafe { slice::from_raw_parts(data, len) }.to_vec());
    match core.load_cart(Box::new(cart), skip_bios != 0) {
        Ok(()) => 0,
        Err(_) => -2,
    }
}

/// Reset to initial state, keeping SRAM/EEPROM contents.
#[no_mangle]
pub extern "C" fn core_reset(core: *mut Emu, skip_bios: i32) {
    if core.is_null() {
        return;
    }
    unsafe { &mut *core }.reset(skip_bios != 0);
}

/// Run for up to `cycles` worth of work. Returns cycles actually spent.
#[no_mangle]
pub extern "C" fn core_execute(core: *mut Emu, cycles: u32) -> u32 {
    if core.is_null() {
        return 0;
    }
    unsafe { &mut *core }.execute(cycles)
}

/// Request an interrupt: set `bit` in IF.
#[no_mangle]
pub extern "C" fn core_request_irq(core: *mut Emu, bit: u16) {
    if core.is_null() {
        return;
    }
    unsafe { &mut *core }.request_irq(bit);
}

/// Enter the IRQ exception now if IME/IE/IF/CPSR.I allow it. Call on
/// scanline boundaries or after changing IE/IF outside `core_execute`.
#[no_mangle]
pub extern "C" fn core_fire_irq(core: *mut Emu) {
    if core.is_null() {
        return;
    }
    unsafe { &mut *core }.fire_irq();
}

/// Replace the full 10-bit active-high key state.
#[no_mangle]
pub extern "C" fn core_set_keys(core: *mut Emu, pressed: u16) {
    if core.is_null() {
        return;
    }
    unsafe { &mut *core }.set_keys(pressed);
}

/// Run HBlank-triggered DMA channels. Called by the host renderer at the
/// start of each scanline's HBlank period.
#[no_mangle]
pub extern "C" fn core_hblank_dma(core: *mut Emu) {
    if core.is_null() {
        return;
    }
    unsafe { &mut *core }.hblank_dma();
}

/// Run VBlank-triggered DMA channels. Called by the host renderer once per
/// frame.
#[no_mangle]
pub extern "C" fn core_vblank_dma(core: *mut Emu) {
    if core.is_null() {
        return;
    }
    unsafe { &mut *core }.vblank_dma();
}

/// Latched direct-sound samples, for the host mixer.
#[no_mangle]
pub extern "C" fn core_sample_a(core: *const Emu) -> i8 {
    if core.is_null() {
        return 0;
    }
    unsafe { &*core }.sample_a()
}

#[no_mangle]
pub extern "C" fn core_sample_b(core: *const Emu) -> i8 {
    if core.is_null() {
        return 0;
    }
    unsafe { &*core }.sample_b()
}

/// Read a memory byte through the debug surface (no wait-cycle side
/// effects). Used by the host renderer to fetch tiles/sprites/palette.
#[no_mangle]
pub extern "C" fn core_peek_byte(core: *mut Emu, addr: u32) -> u8 {
    if core.is_null() {
        return 0;
    }
    unsafe { &mut *core }.peek_byte(addr)
}

/// Pointer + length of the SRAM backing store, for host-side persistence.
#[no_mangle]
pub extern "C" fn core_sram_ptr(core: *mut Emu, len: *mut usize) -> *mut u8 {
    if core.is_null() {
        return ptr::null_mut();
    }
    let core = unsafe { &mut *core };
    let sram = core.sram_mut();
    if !len.is_null() {
        unsafe { *len = sram.len() };
    }
    sram.as_mut_ptr()
}

/// Pointer + length of the EEPROM backing store, for host-side persistence.
#[no_mangle]
pub extern "C" fn core_eeprom_ptr(core: *mut Emu, len: *mut usize) -> *mut u8 {
    if core.is_null() {
        return ptr::null_mut();
    }
    let core = unsafe { &mut *core };
    let eeprom = core.eeprom_mut();
    if !len.is_null() {
        unsafe { *len = eeprom.len() };
    }
    eeprom.as_mut_ptr()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bios() -> Vec<u8> {
        vec![0u8; 16 * 1024]
    }

    #[test]
    fn test_create_destroy() {
        let core = core_create(bios().as_ptr(), bios().len());
        assert!(!core.is_null());
        core_destroy(core);
    }

    #[test]
    fn test_null_bios_is_rejected() {
        assert!(core_create(ptr::null(), 0).is_null());
    }

    #[test]
    fn test_execute_without_cart_is_noop() {
        let core = core_create(bios().as_ptr(), bios().len());
        assert_eq!(core_execute(core, 1000), 0);
        core_destroy(core);
    }

    #[test]
    fn test_load_cart_and_execute() {
        let core = core_create(bios().as_ptr(), bios().len());
        let rom = vec![0u8; 0x10000];
        assert_eq!(core_load_cart(core, rom.as_ptr(), rom.len(), 1), 0);
        assert!(core_execute(core, 100) > 0);
        core_destroy(core);
    }

    #[test]
    fn test_null_core_is_safe() {
        core_destroy(ptr::null_mut());
        core_reset(ptr::null_mut(), 1);
        assert_eq!(core_execute(ptr::null_mut(), 100), 0);
        assert_eq!(core_sample_a(ptr::null()), 0);
        assert!(core_sram_ptr(ptr::null_mut(), ptr::null_mut()).is_null());
    }

    #[test]
    fn test_sram_roundtrip_through_raw_pointer() {
        let core = core_create(bios().as_ptr(), bios().len());
        let rom = vec![0u8; 0x10000];
        core_load_cart(core, rom.as_ptr(), rom.len(), 1);
        let mut len = 0usize;
        let ptr = core_sram_ptr(core, &mut len);
        assert!(!ptr.is_null());
        unsafe { *ptr = 0x55 };
        assert_eq!(unsafe { &*core }.sram()[0], 0x55);
        core_destroy(core);
    }
}
