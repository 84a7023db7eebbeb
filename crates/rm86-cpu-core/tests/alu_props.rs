use proptest::prelude::*;
use rm86_cpu::Flags;
use rm86_cpu_core::alu::{add_with_flags, sub_with_flags, Width};

proptest! {
    #[test]
    fn add_matches_wrapping_arithmetic(a: u16, b: u16) {
        let mut f = Flags::default();
        let r = add_with_flags(&mut f, a as u32, b as u32, false, Width::Word);
        prop_assert_eq!(r, a.wrapping_add(b));
        prop_assert_eq!(f.cf(), a as u32 + b as u32 > 0xFFFF);
        prop_assert_eq!(f.zf(), r == 0);
        prop_assert_eq!(f.sf(), r & 0x8000 != 0);
    }

    #[test]
    fn subtract_then_add_round_trips(a: u16, b: u16) {
        let mut f = Flags::default();
        let d = sub_with_flags(&mut f, a as u32, b as u32, false, Width::Word);
        let r = add_with_flags(&mut f, d as u32, b as u32, false, Width::Word);
        prop_assert_eq!(r, a);
    }

    #[test]
    fn compare_orders_unsigned_by_carry(a: u16, b: u16) {
        let mut f = Flags::default();
        sub_with_flags(&mut f, a as u32, b as u32, false, Width::Word);
        prop_assert_eq!(f.zf(), a == b);
        prop_assert_eq!(f.cf(), a < b);
    }

    #[test]
    fn compare_orders_signed_by_sign_xor_overflow(a: u16, b: u16) {
        let mut f = Flags::default();
        sub_with_flags(&mut f, a as u32, b as u32, false, Width::Word);
        prop_assert_eq!(f.sf() != f.of(), (a as i16) < (b as i16));
    }

    #[test]
    fn byte_ops_ignore_upper_bits(a: u16, b: u16) {
        let mut fw = Flags::default();
        let mut fb = Flags::default();
        let wide = add_with_flags(&mut fw, a as u32, b as u32, false, Width::Byte);
        let narrow = add_with_flags(&mut fb, (a & 0xFF) as u32, (b & 0xFF) as u32, false, Width::Byte);
        prop_assert_eq!(wide, narrow);
        prop_assert_eq!(fw, fb);
    }

    #[test]
    fn carry_chain_extends_addition(a: u16, b: u16, c: bool) {
        let mut f = Flags::default();
        let r = add_with_flags(&mut f, a as u32, b as u32, c, Width::Word);
        prop_assert_eq!(r, a.wrapping_add(b).wrapping_add(c as u16));
    }
}
