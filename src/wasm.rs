//! WebAssembly bindings.
//!
//! JavaScript-friendly surface over [`Emu`] using wasm-bindgen. Unlike the
//! C FFI, this owns the core directly (no raw pointers) since WASM is
//! single-threaded.

use wasm_bindgen::prelude::*;

use crate::cart::SliceCartridge;
use crate::emu::Emu;

#[wasm_bindgen]
pub struct WasmCore {
    inner: Emu,
}

#[wasm_bindgen]
impl WasmCore {
    /// Construct a core from a 16 KiB BIOS image.
    #[wasm_bindgen(constructor)]
    pub fn new(bios: &[u8]) -> Result<WasmCore, JsValue> {
        console_error_panic_hook::set_once();
        let inner = Emu::new(bios.to_vec()).map_err(|e| JsValue::from_str(&e.to_string()))?;
        Ok(WasmCore { inner })
    }

    /// Map a cartridge image and reset.
    #[wasm_bindgen]
    pub fn load_cart(&mut self, data: &[u8], skip_bios: bool) -> Result<(), JsValue> {
        let cart = SliceCartridge::new(data.to_vec());
        self.inner
            .load_cart(Box::new(cart), skip_bios)
            .map_err(|e| JsValue::from_str(&e.to_string()))
    }

    /// Reset to initial state, keeping SRAM/EEPROM contents.
    #[wasm_bindgen]
    pub fn reset(&mut self, skip_bios: bool) {
        self.inner.reset(skip_bios);
    }

    /// Run for up to `cycles` worth of work. Returns cycles actually spent.
    #[wasm_bindgen]
    pub fn execute(&mut self, cycles: u32) -> u32 {
        self.inner.execute(cycles)
    }

    /// Set a bit in IF.
    #[wasm_bindgen]
    pub fn request_irq(&mut self, bit: u16) {
        self.inner.request_irq(bit);
    }

    /// Enter the IRQ exception now if IME/IE/IF/CPSR.I allow it.
    #[wasm_bindgen]
    pub fn fire_irq(&mut self) {
        self.inner.fire_irq();
    }

    /// Replace the full 10-bit active-high key state.
    #[wasm_bindgen]
    pub fn set_keys(&mut self, pressed: u16) {
        self.inner.set_keys(pressed);
    }

    #[wasm_bindgen]
    pub fn hblank_dma(&mut self) {
        self.inner.hblank_dma();
    }

    #[wasm_bindgen]
    pub fn vblank_dma(&mut self) {
        self.inner.vblank_dma();
    }

    /// Latched direct-sound samples, for the host mixer.
    #[wasm_bindgen]
    pub fn sample_a(&self) -> i8 {
        self.inner.sample_a()
    }

    #[wasm_bindgen]
    pub fn sample_b(&self) -> i8 {
        self.inner.sample_b()
    }

    /// Read a memory byte through the debug surface, for the host renderer.
    #[wasm_bindgen]
    pub fn peek_byte(&mut self, addr: u32) -> u8 {
        self.inner.peek_byte(addr)
    }

    /// Copy of the SRAM backing store, for host-side persistence.
    #[wasm_bindgen]
    pub fn sram(&self) -> Vec<u8> {
        self.inner.sram().to_vec()
    }

    /// Restore SRAM from a previously saved buffer.
    #[wasm_bindgen]
    pub fn load_sram(&mut self, data: &[u8]) {
        let sram = self.inner.sram_mut();
        let n = sram.len().min(data.len());
        sram[..n].copy_from_slice(&data[..n]);
    }

    /// Copy of the EEPROM backing store, for host-side persistence.
    #[wasm_bindgen]
    pub fn eeprom(&self) -> Vec<u8> {
        self.inner.eeprom().to_vec()
    }

    /// Restore EEPROM from a previously saved buffer.
    #[wasm_bindgen]
    pub fn load_eeprom(&mut self, data: &[u8]) {
        let eeprom = self.inner.eeprom_mut();
        let n = eeprom.len().min(data.len());
        eeprom[..n].copy_from_slice(&data[..n]);
    }

    #[wasm_bindgen]
    pub fn pc(&self) -> u32 {
        self.inner.pc()
    }

    #[wasm_bindgen]
    pub fn total_cycles(&self) -> f64 {
        self.inner.total_cycles() as f64
    }
}
