//! The ARMv4T barrel shifter, shared by the ARM and Thumb interpreters.
//!
//! Shift kind encoding matches the instruction bit pattern used by data
//! processing operand2 and Thumb's shifted-register group: 0=LSL, 1=LSR,
//! 2=ASR, 3=ROR.

/// Shift by an immediate amount (bits 11..7 of a data-processing instruction,
/// or a Thumb shift immediate). `amount` is 0..=31 exactly as encoded; the
/// special meanings of an encoded zero (LSR/ASR #32, ROR #0 == RRX) are
/// applied here, not by the caller.
pub fn shift_by_immediate(kind: u32, amount: u32, value: u32, carry_in: bool) -> (u32, bool) {
    match kind & 3 {
        0 => {
            // LSL
            if amount == 0 {
                (value, carry_in)
            } else if amount < 32 {
                (value << amount, (value >> (32 - amount)) & 1 != 0)
            } else {
                (0, amount == 32 && value & 1 != 0)
            }
        }
        1 => {
            // LSR, #0 means LSR #32
            let amt = if amount == 0 { 32 } else { amount };
            if amt < 32 {
                (value >> amt, (value >> (amt - 1)) & 1 != 0)
            } else {
                (0, value & 0x8000_0000 != 0)
            }
        }
        2 => {
            // ASR, #0 means ASR #32
            let amt = if amount == 0 { 32 } else { amount };
            if amt < 32 {
                (((value as i32) >> amt) as u32, (value >> (amt - 1)) & 1 != 0)
            } else {
                let carry = value & 0x8000_0000 != 0;
                (if carry { 0xFFFF_FFFF } else { 0 }, carry)
            }
        }
        3 => {
            if amount == 0 {
                // RRX: rotate right through carry by one
                let new_carry = value & 1 != 0;
                (((carry_in as u32) << 31) | (value >> 1), new_carry)
            } else {
                (value.rotate_right(amount), (value >> (amount - 1)) & 1 != 0)
            }
        }
        _ => unreachable!(),
    }
}

/// Shift by a register-held amount (low byte of Rs). A shift amount of zero
/// leaves both the value and carry untouched, regardless of shift kind.
pub fn shift_by_register(kind: u32, amount: u32, value: u32, carry_in: bool) -> (u32, bool) {
    if amount == 0 {
        return (value, carry_in);
    }
    match kind & 3 {
        0 => {
            // LSL
            if amount < 32 {
                (value << amount, (value >> (32 - amount)) & 1 != 0)
            } else if amount == 32 {
                (0, value & 1 != 0)
            } else {
                (0, false)
            }
        }
        1 => {
            // LSR
            if amount < 32 {
                (value >> amount, (value >> (amount - 1)) & 1 != 0)
            } else if amount == 32 {
                (0, value & 0x8000_0000 != 0)
            } else {
                (0, false)
            }
        }
        2 => {
            // ASR
            if amount < 32 {
                (((value as i32) >> amount) as u32, (value >> (amount - 1)) & 1 != 0)
            } else {
                let carry = value & 0x8000_0000 != 0;
                (if carry { 0xFFFF_FFFF } else { 0 }, carry)
            }
        }
        3 => {
            // ROR
            let amt = amount & 31;
            if amt == 0 {
                (value, value & 0x8000_0000 != 0)
            } else {
                (value.rotate_right(amt), (value >> (amt - 1)) & 1 != 0)
            }
        }
        _ => unreachable!(),
    }
}
