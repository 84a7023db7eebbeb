//! Arithmetic/logic primitives with their exact flag side effects.
//!
//! Each helper takes the operands as plain values, recomputes every flag the
//! operation defines, and returns the masked result; the caller decides where
//! the result goes (or discards it, for cmp/test).

use rm86_cpu::Flags;

/// Operand width of one instruction form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Width {
    Byte,
    Word,
}

impl Width {
    pub fn bits(self) -> u32 {
        match self {
            Width::Byte => 8,
            Width::Word => 16,
        }
    }

    pub fn mask(self) -> u32 {
        match self {
            Width::Byte => 0xFF,
            Width::Word => 0xFFFF,
        }
    }

    pub fn sign_bit(self) -> u32 {
        match self {
            Width::Byte => 0x80,
            Width::Word => 0x8000,
        }
    }
}

pub fn add_with_flags(
    flags: &mut Flags,
    dest: u32,
    src: u32,
    carry_in: bool,
    width: Width,
) -> u16 {
    let mask = width.mask();
    let dest = dest & mask;
    let src = src & mask;
    let full = dest + src + carry_in as u32;
    let result = full & mask;

    let sb = width.sign_bit();
    flags.set(Flags::CF, full > mask);
    flags.set(Flags::OF, ((dest ^ result) & (src ^ result) & sb) != 0);
    flags.set(Flags::AF, ((dest ^ src ^ result) & 0x10) != 0);
    flags.set_szp(result as u16, sb as u16);

    result as u16
}

pub fn sub_with_flags(
    flags: &mut Flags,
    dest: u32,
    src: u32,
    borrow_in: bool,
    width: Width,
) -> u16 {
    let mask = width.mask();
    let dest = dest & mask;
    let src = src & mask;
    let subtrahend = src + borrow_in as u32;
    let result = dest.wrapping_sub(subtrahend) & mask;

    let sb = width.sign_bit();
    flags.set(Flags::CF, dest < subtrahend);
    flags.set(Flags::OF, ((dest ^ src) & (dest ^ result) & sb) != 0);
    flags.set(Flags::AF, ((dest ^ src ^ result) & 0x10) != 0);
    flags.set_szp(result as u16, sb as u16);

    result as u16
}

/// Flag update shared by and/or/xor/test: CF and OF are forced clear, SZP
/// derive from the result, AF is left as it was.
pub fn logic_with_flags(flags: &mut Flags, result: u32, width: Width) -> u16 {
    let result = result & width.mask();
    flags.set(Flags::CF, false);
    flags.set(Flags::OF, false);
    flags.set_szp(result as u16, width.sign_bit() as u16);
    result as u16
}
