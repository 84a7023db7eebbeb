#![forbid(unsafe_code)]

//! Flat real-mode guest memory.
//!
//! One fixed 1 MiB buffer covers the entire physical address space. Linear
//! addresses are `(segment << 4) + offset`, wrapped to 20 bits; there is no
//! out-of-range failure mode, matching the target hardware's lack of memory
//! protection. Every access goes through the same live buffer, so
//! self-modifying code takes effect on the very next fetch.

/// Physical memory size: 1 MiB.
pub const MEM_SIZE: usize = 1 << 20;

const ADDR_MASK: u32 = (MEM_SIZE as u32) - 1;

/// Fill pattern for memory no program has written yet (the breakpoint opcode,
/// so runaway execution traps instead of running zeroes).
pub const FILL_BYTE: u8 = 0xCC;

/// Computes the wrapped linear address for a real-mode `segment:offset` pair.
pub fn linear(segment: u16, offset: u16) -> u32 {
    (((segment as u32) << 4).wrapping_add(offset as u32)) & ADDR_MASK
}

pub struct AddressSpace {
    bytes: Box<[u8]>,
}

impl AddressSpace {
    pub fn new() -> Self {
        Self {
            bytes: vec![FILL_BYTE; MEM_SIZE].into_boxed_slice(),
        }
    }

    pub fn read_u8(&self, segment: u16, offset: u16) -> u8 {
        self.read_u8_linear(linear(segment, offset))
    }

    pub fn write_u8(&mut self, segment: u16, offset: u16, value: u8) {
        self.write_u8_linear(linear(segment, offset), value);
    }

    /// Little-endian word read. The second byte wraps independently, so a word
    /// at the top of the address space reads its high byte from linear 0.
    pub fn read_u16(&self, segment: u16, offset: u16) -> u16 {
        self.read_u16_linear(linear(segment, offset))
    }

    pub fn write_u16(&mut self, segment: u16, offset: u16, value: u16) {
        self.write_u16_linear(linear(segment, offset), value);
    }

    pub fn read_u8_linear(&self, addr: u32) -> u8 {
        self.bytes[(addr & ADDR_MASK) as usize]
    }

    pub fn write_u8_linear(&mut self, addr: u32, value: u8) {
        self.bytes[(addr & ADDR_MASK) as usize] = value;
    }

    pub fn read_u16_linear(&self, addr: u32) -> u16 {
        let lo = self.read_u8_linear(addr);
        let hi = self.read_u8_linear(addr.wrapping_add(1));
        u16::from_le_bytes([lo, hi])
    }

    pub fn write_u16_linear(&mut self, addr: u32, value: u16) {
        let [lo, hi] = value.to_le_bytes();
        self.write_u8_linear(addr, lo);
        self.write_u8_linear(addr.wrapping_add(1), hi);
    }

    /// Bulk write used by the image loader; wraps like every other access.
    pub fn write_bytes(&mut self, addr: u32, data: &[u8]) {
        for (i, &b) in data.iter().enumerate() {
            self.write_u8_linear(addr.wrapping_add(i as u32), b);
        }
    }
}

impl Default for AddressSpace {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_memory_is_filled_with_breakpoint_bytes() {
        let mem = AddressSpace::new();
        assert_eq!(mem.read_u8(0x0000, 0x0000), FILL_BYTE);
        assert_eq!(mem.read_u8(0xF000, 0xFFFF), FILL_BYTE);
    }

    #[test]
    fn segment_offset_translation_is_paragraph_aligned() {
        assert_eq!(linear(0x0000, 0x0100), 0x00100);
        assert_eq!(linear(0x1234, 0x0010), 0x12350);
        // Past the 1 MiB boundary the address wraps silently.
        assert_eq!(linear(0xFFFF, 0x0010), 0x00000);
        assert_eq!(linear(0xFFFF, 0xFFFF), 0x0FFEF);
    }

    #[test]
    fn overlapping_segment_pairs_alias_the_same_byte() {
        let mut mem = AddressSpace::new();
        mem.write_u8(0x1000, 0x0010, 0xAB);
        assert_eq!(mem.read_u8(0x1001, 0x0000), 0xAB);
    }

    #[test]
    fn words_are_little_endian() {
        let mut mem = AddressSpace::new();
        mem.write_u16(0x0000, 0x0200, 0xBEEF);
        assert_eq!(mem.read_u8(0x0000, 0x0200), 0xEF);
        assert_eq!(mem.read_u8(0x0000, 0x0201), 0xBE);
        assert_eq!(mem.read_u16(0x0000, 0x0200), 0xBEEF);
    }

    #[test]
    fn word_at_top_of_memory_wraps_to_zero() {
        let mut mem = AddressSpace::new();
        mem.write_u16_linear(0xF_FFFF, 0x1234);
        assert_eq!(mem.read_u8_linear(0xF_FFFF), 0x34);
        assert_eq!(mem.read_u8_linear(0x0_0000), 0x12);
        assert_eq!(mem.read_u16_linear(0xF_FFFF), 0x1234);
    }

    #[test]
    fn bulk_write_wraps() {
        let mut mem = AddressSpace::new();
        mem.write_bytes(0xF_FFFE, &[1, 2, 3, 4]);
        assert_eq!(mem.read_u8_linear(0xF_FFFE), 1);
        assert_eq!(mem.read_u8_linear(0xF_FFFF), 2);
        assert_eq!(mem.read_u8_linear(0x0_0000), 3);
        assert_eq!(mem.read_u8_linear(0x0_0001), 4);
    }
}
