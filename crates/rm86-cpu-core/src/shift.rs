//! Shift and rotate primitives.
//!
//! The count is either the literal 1 or the unmasked low byte of CX (8086
//! behavior). A zero count leaves the operand and every flag untouched. CF
//! takes the last bit moved across the operand boundary; OF is defined only
//! for a count of exactly 1. Shifts recompute SZP; rotates touch only CF/OF.

use crate::alu::Width;
use rm86_cpu::Flags;

pub fn shl(flags: &mut Flags, value: u32, count: u32, width: Width) -> u16 {
    let mask = width.mask();
    let bits = width.bits();
    let value = value & mask;
    if count == 0 {
        return value as u16;
    }
    let result = value.checked_shl(count).map(|v| v & mask).unwrap_or(0);
    let cf = count <= bits && (value >> (bits - count)) & 1 != 0;
    flags.set(Flags::CF, cf);
    if count == 1 {
        flags.set(Flags::OF, ((result & width.sign_bit()) != 0) != cf);
    }
    flags.set_szp(result as u16, width.sign_bit() as u16);
    result as u16
}

pub fn shr(flags: &mut Flags, value: u32, count: u32, width: Width) -> u16 {
    let mask = width.mask();
    let bits = width.bits();
    let value = value & mask;
    if count == 0 {
        return value as u16;
    }
    let result = value.checked_shr(count).unwrap_or(0) & mask;
    let cf = count <= bits && (value >> (count - 1)) & 1 != 0;
    flags.set(Flags::CF, cf);
    if count == 1 {
        // The shifted-out sign changes the top bit iff it was set.
        flags.set(Flags::OF, value & width.sign_bit() != 0);
    }
    flags.set_szp(result as u16, width.sign_bit() as u16);
    result as u16
}

pub fn sar(flags: &mut Flags, value: u32, count: u32, width: Width) -> u16 {
    let mask = width.mask();
    let bits = width.bits();
    let sb = width.sign_bit();
    let value = value & mask;
    if count == 0 {
        return value as u16;
    }
    let negative = value & sb != 0;
    let (result, cf) = if count >= bits {
        // Every value bit has been shifted out; only the sign remains.
        (if negative { mask } else { 0 }, negative)
    } else {
        let sext = if negative { value | !mask } else { value } as i32;
        (
            ((sext >> count) as u32) & mask,
            (sext >> (count - 1)) & 1 != 0,
        )
    };
    flags.set(Flags::CF, cf);
    if count == 1 {
        flags.set(Flags::OF, false);
    }
    flags.set_szp(result as u16, sb as u16);
    result as u16
}

pub fn rol(flags: &mut Flags, value: u32, count: u32, width: Width) -> u16 {
    let mask = width.mask();
    let bits = width.bits();
    let value = value & mask;
    if count == 0 {
        return value as u16;
    }
    let n = count % bits;
    let result = if n == 0 {
        value
    } else {
        ((value << n) | (value >> (bits - n))) & mask
    };
    let cf = result & 1 != 0;
    flags.set(Flags::CF, cf);
    if count == 1 {
        flags.set(Flags::OF, ((result & width.sign_bit()) != 0) != cf);
    }
    result as u16
}

pub fn ror(flags: &mut Flags, value: u32, count: u32, width: Width) -> u16 {
    let mask = width.mask();
    let bits = width.bits();
    let sb = width.sign_bit();
    let value = value & mask;
    if count == 0 {
        return value as u16;
    }
    let n = count % bits;
    let result = if n == 0 {
        value
    } else {
        ((value >> n) | (value << (bits - n))) & mask
    };
    flags.set(Flags::CF, result & sb != 0);
    if count == 1 {
        // XOR of the two top bits of the result.
        flags.set(Flags::OF, ((result & sb) != 0) != ((result & (sb >> 1)) != 0));
    }
    result as u16
}

/// Rotate left through CF: a width+1 bit rotation with CF as the extra bit.
pub fn rcl(flags: &mut Flags, value: u32, count: u32, width: Width) -> u16 {
    let mask = width.mask();
    let bits = width.bits();
    let value = value & mask;
    if count == 0 {
        return value as u16;
    }
    let m = bits + 1;
    let n = count % m;
    let wide = ((flags.cf() as u32) << bits) | value;
    let rotated = if n == 0 {
        wide
    } else {
        ((wide << n) | (wide >> (m - n))) & ((1 << m) - 1)
    };
    let cf = (rotated >> bits) & 1 != 0;
    let result = rotated & mask;
    flags.set(Flags::CF, cf);
    if count == 1 {
        flags.set(Flags::OF, ((result & width.sign_bit()) != 0) != cf);
    }
    result as u16
}

pub fn rcr(flags: &mut Flags, value: u32, count: u32, width: Width) -> u16 {
    let mask = width.mask();
    let bits = width.bits();
    let value = value & mask;
    if count == 0 {
        return value as u16;
    }
    if count == 1 {
        // Defined from the state before the rotate: old sign vs incoming CF.
        flags.set(
            Flags::OF,
            ((value & width.sign_bit()) != 0) != flags.cf(),
        );
    }
    let m = bits + 1;
    let n = count % m;
    let wide = ((flags.cf() as u32) << bits) | value;
    let rotated = if n == 0 {
        wide
    } else {
        ((wide >> n) | (wide << (m - n))) & ((1 << m) - 1)
    };
    flags.set(Flags::CF, (rotated >> bits) & 1 != 0);
    (rotated & mask) as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_count_touches_nothing() {
        let mut f = Flags::CF | Flags::OF | Flags::ZF;
        assert_eq!(shl(&mut f, 0x12, 0, Width::Byte), 0x12);
        assert_eq!(rcr(&mut f, 0x12, 0, Width::Byte), 0x12);
        assert_eq!(f, Flags::CF | Flags::OF | Flags::ZF);
    }

    #[test]
    fn shl_carry_and_overflow_at_count_one() {
        let mut f = Flags::default();
        assert_eq!(shl(&mut f, 0x80, 1, Width::Byte), 0x00);
        assert!(f.cf());
        // Top bit went 1 -> 0 while CF caught it: signed change.
        assert!(f.of());
        assert!(f.zf());

        let mut f = Flags::default();
        assert_eq!(shl(&mut f, 0x40, 1, Width::Byte), 0x80);
        assert!(!f.cf() && f.of() && f.sf());
    }

    #[test]
    fn shl_by_more_than_width_clears_everything_out() {
        let mut f = Flags::default();
        assert_eq!(shl(&mut f, 0xFF, 9, Width::Byte), 0x00);
        assert!(!f.cf() && f.zf());
        // Count == width still catches the last real bit.
        let mut f = Flags::default();
        assert_eq!(shl(&mut f, 0x01, 8, Width::Byte), 0x00);
        assert!(f.cf());
    }

    #[test]
    fn shr_last_bit_out_lands_in_carry() {
        let mut f = Flags::default();
        assert_eq!(shr(&mut f, 0x05, 1, Width::Byte), 0x02);
        assert!(f.cf());
        assert!(!f.of());

        let mut f = Flags::default();
        assert_eq!(shr(&mut f, 0x80, 1, Width::Byte), 0x40);
        assert!(f.of());
    }

    #[test]
    fn sar_preserves_sign() {
        let mut f = Flags::default();
        assert_eq!(sar(&mut f, 0xF0, 2, Width::Byte), 0xFC);
        assert!(!f.cf() && f.sf());

        let mut f = Flags::default();
        assert_eq!(sar(&mut f, 0x81, 20, Width::Byte), 0xFF);
        assert!(f.cf());
    }

    #[test]
    fn rol_and_ror_move_the_boundary_bit_into_carry() {
        let mut f = Flags::default();
        assert_eq!(rol(&mut f, 0x81, 1, Width::Byte), 0x03);
        assert!(f.cf());

        let mut f = Flags::default();
        assert_eq!(ror(&mut f, 0x01, 1, Width::Byte), 0x80);
        assert!(f.cf());
        assert!(f.of());
    }

    #[test]
    fn rotates_leave_szp_alone() {
        let mut f = Flags::ZF;
        rol(&mut f, 0x01, 3, Width::Byte);
        assert!(f.zf());
    }

    #[test]
    fn rcl_rotates_through_the_carry_bit() {
        let mut f = Flags::CF;
        // 9-bit rotate: CF enters at bit 0, bit 7 leaves into CF.
        assert_eq!(rcl(&mut f, 0x80, 1, Width::Byte), 0x01);
        assert!(f.cf());

        // A full width+1 rotation restores value and carry.
        let mut f = Flags::CF;
        assert_eq!(rcl(&mut f, 0x5A, 9, Width::Byte), 0x5A);
        assert!(f.cf());
    }

    #[test]
    fn rcr_overflow_uses_incoming_carry() {
        let mut f = Flags::CF;
        assert_eq!(rcr(&mut f, 0x00, 1, Width::Byte), 0x80);
        assert!(!f.cf());
        // Old sign 0 vs incoming CF 1.
        assert!(f.of());
    }
}
