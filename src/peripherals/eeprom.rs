//! The EEPROM bit-serial save protocol. Both directions are driven by DMA3
//! bursts; since a DMA burst is atomic with respect to the guest CPU (see
//! the core's concurrency model), a whole command is decoded from the full
//! bit sequence of one burst rather than bit-by-bit across separate calls.

use crate::memory::BackingRam;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Idle,
    Reading,
}

#[derive(Debug, Clone)]
pub struct Eeprom {
    mode: Mode,
    pending_read_addr: Option<u32>,
}

impl Eeprom {
    pub fn new() -> Self {
        Self {
            mode: Mode::Idle,
            pending_read_addr: None,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    fn bits_to_value(bits: &[bool]) -> u32 {
        bits.iter().fold(0u32, |acc, &b| (acc << 1) | (b as u32))
    }

    /// A DMA3 write whose destination is the EEPROM bank: `bits` is the
    /// full MSB-first bit sequence of the burst (opcode + address [+ data]).
    pub fn handle_write_burst(&mut self, bits: &[bool], ram: &mut BackingRam) {
        if bits.len() < 2 {
            return;
        }
        let read_op = bits[0];
        let write_op = bits[0] && !bits[1];
        let is_read = read_op && bits[1];
        if is_read {
            let addr_bits = if bits.len() >= 17 { 14 } else { 6 };
            let addr = Self::bits_to_value(&bits[2..2 + addr_bits]);
            self.pending_read_addr = Some(addr);
            self.mode = Mode::Reading;
        } else if write_op {
            let addr_bits = if bits.len() >= 81 { 14 } else { 6 };
            let addr = Self::bits_to_value(&bits[2..2 + addr_bits]);
            let data_start = 2 + addr_bits;
            let data_bits = &bits[data_start..(data_start + 64).min(bits.len())];
            let mut word = [0u8; 8];
            for (i, byte) in word.iter_mut().enumerate() {
                let chunk = &data_bits[i * 8..((i + 1) * 8).min(data_bits.len())];
                *byte = Self::bits_to_value(chunk) as u8;
            }
            let base = (addr as usize) * 8;
            if base + 8 <= ram.eeprom().len() {
                ram.eeprom_mut()[base..base + 8].copy_from_slice(&word);
            }
        }
    }

    /// A DMA3 read whose source is the EEPROM bank: produce `count` bits,
    /// MSB-first — 4 dummy zero bits followed by the 64-bit stored word.
    pub fn handle_read_burst(&mut self, count: usize, ram: &BackingRam) -> Vec<bool> {
        let mut out = Vec::with_capacity(count);
        let word = self.pending_read_addr.map(|addr| {
            let base = (addr as usize) * 8;
            let mut bytes = [0u8; 8];
            if base + 8 <= ram.eeprom().len() {
                bytes.copy_from_slice(&ram.eeprom()[base..base + 8]);
            }
            bytes
        });
        for i in 0..count {
            if i < 4 {
                out.push(false);
            } else {
                let bit_index = i - 4;
                let bit = word
                    .map(|bytes| {
                        let byte = bytes[bit_index / 8];
                        (byte >> (7 - (bit_index % 8))) & 1 != 0
                    })
                    .unwrap_or(false);
                out.push(bit);
            }
        }
        self.mode = Mode::Idle;
        self.pending_read_addr = None;
        out
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }
}

impl Default for Eeprom {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bits_from_str(s: &str) -> Vec<bool> {
        s.chars().map(|c| c == '1').collect()
    }

    #[test]
    fn test_write_then_read_round_trip_6bit_address() {
        let mut ram = BackingRam::new();
        let mut ee = Eeprom::new();
        let mut bits = bits_from_str("10"); // write opcode
        bits.extend(bits_from_str("000101")); // address 5, 6 bits
        let data: u64 = 0x0102_0304_0506_0708;
        for i in (0..64).rev() {
            bits.push((data >> i) & 1 != 0);
        }
        bits.push(true); // stop bit, total len = 2+6+64+1 = 73
        ee.handle_write_burst(&bits, &mut ram);

        let mut read_bits = bits_from_str("11");
        read_bits.extend(bits_from_str("000101"));
        read_bits.push(true);
        ee.handle_write_burst(&read_bits, &mut ram);
        assert_eq!(ee.mode(), Mode::Reading);

        let out = ee.handle_read_burst(68, &ram);
        assert_eq!(out.len(), 68);
        assert!(out[0..4].iter().all(|&b| !b));
        let mut reconstructed = 0u64;
        for &b in &out[4..68] {
            reconstructed = (reconstructed << 1) | (b as u64);
        }
        assert_eq!(reconstructed, data);
    }

    #[test]
    fn test_read_with_no_prior_address_returns_zero() {
        let ram = BackingRam::new();
        let mut ee = Eeprom::new();
        let out = ee.handle_read_burst(8, &ram);
        assert!(out.iter().all(|&b| !b));
    }
}
