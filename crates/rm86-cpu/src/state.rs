use crate::flags::Flags;
use std::fmt::Write as _;

/// General-purpose registers in instruction-encoding order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gpr {
    Ax = 0,
    Cx = 1,
    Dx = 2,
    Bx = 3,
    Sp = 4,
    Bp = 5,
    Si = 6,
    Di = 7,
}

impl Gpr {
    /// Maps a 3-bit register field to its register.
    pub fn from_index(index: u8) -> Self {
        match index & 7 {
            0 => Gpr::Ax,
            1 => Gpr::Cx,
            2 => Gpr::Dx,
            3 => Gpr::Bx,
            4 => Gpr::Sp,
            5 => Gpr::Bp,
            6 => Gpr::Si,
            _ => Gpr::Di,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegReg {
    Es = 0,
    Cs = 1,
    Ss = 2,
    Ds = 3,
    Fs = 4,
    Gs = 5,
}

impl SegReg {
    /// Maps the 3-bit segment-register field of a ModRM byte. Encodings 6 and
    /// 7 name no segment register.
    pub fn from_index(index: u8) -> Option<Self> {
        match index & 7 {
            0 => Some(SegReg::Es),
            1 => Some(SegReg::Cs),
            2 => Some(SegReg::Ss),
            3 => Some(SegReg::Ds),
            4 => Some(SegReg::Fs),
            5 => Some(SegReg::Gs),
            _ => None,
        }
    }
}

/// Sticky single-instruction prefix flags. Accumulated across prefix bytes,
/// consumed by the following opcode, cleared unconditionally at the
/// instruction boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Prefixes {
    pub repe: bool,
    pub repne: bool,
    pub lock: bool,
}

/// Architectural register state of the real-mode CPU.
///
/// The four general registers are stored as full words; 8-bit halves are
/// computed views over them, so a half write is immediately visible through
/// the word and vice versa.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CpuState {
    gpr: [u16; 8],
    pub ip: u16,
    segs: [u16; 6],
    seg_override: Option<SegReg>,
    pub flags: Flags,
    pub prefixes: Prefixes,
}

impl Default for CpuState {
    fn default() -> Self {
        Self::new()
    }
}

impl CpuState {
    pub fn new() -> Self {
        Self {
            gpr: [0; 8],
            ip: 0,
            segs: [0; 6],
            seg_override: None,
            flags: Flags::default(),
            prefixes: Prefixes::default(),
        }
    }

    pub fn gpr16(&self, reg: Gpr) -> u16 {
        self.gpr[reg as usize]
    }

    pub fn set_gpr16(&mut self, reg: Gpr, value: u16) {
        self.gpr[reg as usize] = value;
    }

    /// Reads an 8-bit register by its 3-bit encoding
    /// (AL CL DL BL AH CH DH BH). The low two bits select the word, bit 2
    /// selects the high half.
    pub fn gpr8(&self, index: u8) -> u8 {
        let word = self.gpr[(index & 3) as usize];
        if index & 4 != 0 {
            (word >> 8) as u8
        } else {
            word as u8
        }
    }

    pub fn set_gpr8(&mut self, index: u8, value: u8) {
        let word = &mut self.gpr[(index & 3) as usize];
        if index & 4 != 0 {
            *word = (*word & 0x00FF) | ((value as u16) << 8);
        } else {
            *word = (*word & 0xFF00) | value as u16;
        }
    }

    pub fn ax(&self) -> u16 {
        self.gpr[Gpr::Ax as usize]
    }

    pub fn set_ax(&mut self, value: u16) {
        self.gpr[Gpr::Ax as usize] = value;
    }

    pub fn al(&self) -> u8 {
        self.ax() as u8
    }

    pub fn set_al(&mut self, value: u8) {
        self.set_ax((self.ax() & 0xFF00) | value as u16);
    }

    pub fn ah(&self) -> u8 {
        (self.ax() >> 8) as u8
    }

    pub fn set_ah(&mut self, value: u8) {
        self.set_ax((self.ax() & 0x00FF) | ((value as u16) << 8));
    }

    pub fn cx(&self) -> u16 {
        self.gpr[Gpr::Cx as usize]
    }

    pub fn set_cx(&mut self, value: u16) {
        self.gpr[Gpr::Cx as usize] = value;
    }

    pub fn cl(&self) -> u8 {
        self.cx() as u8
    }

    pub fn dx(&self) -> u16 {
        self.gpr[Gpr::Dx as usize]
    }

    pub fn set_dx(&mut self, value: u16) {
        self.gpr[Gpr::Dx as usize] = value;
    }

    pub fn dl(&self) -> u8 {
        self.dx() as u8
    }

    pub fn sp(&self) -> u16 {
        self.gpr[Gpr::Sp as usize]
    }

    pub fn set_sp(&mut self, value: u16) {
        self.gpr[Gpr::Sp as usize] = value;
    }

    pub fn seg(&self, seg: SegReg) -> u16 {
        self.segs[seg as usize]
    }

    pub fn set_seg(&mut self, seg: SegReg, value: u16) {
        self.segs[seg as usize] = value;
    }

    pub fn seg_override(&self) -> Option<SegReg> {
        self.seg_override
    }

    pub fn set_seg_override(&mut self, seg: SegReg) {
        self.seg_override = Some(seg);
    }

    /// Selects the segment for a memory reference: an active override wins
    /// over the instruction's default. Consulting the override does not clear
    /// it; clearing happens once, at the instruction boundary.
    pub fn effective_seg(&self, default: SegReg) -> u16 {
        self.seg(self.seg_override.unwrap_or(default))
    }

    /// Resets all transient per-instruction state. Runs after every completed
    /// instruction, whether or not it referenced memory.
    pub fn clear_prefixes(&mut self) {
        self.seg_override = None;
        self.prefixes = Prefixes::default();
    }

    /// Full register/flag dump in the layout the terminal error paths print.
    pub fn dump(&self) -> String {
        let mut s = String::new();
        let _ = writeln!(
            s,
            "AX = {:04X} CX = {:04X} DX = {:04X} BX = {:04X}",
            self.gpr16(Gpr::Ax),
            self.gpr16(Gpr::Cx),
            self.gpr16(Gpr::Dx),
            self.gpr16(Gpr::Bx),
        );
        let _ = writeln!(
            s,
            "SP = {:04X} BP = {:04X} SI = {:04X} DI = {:04X} IP = {:04X}",
            self.gpr16(Gpr::Sp),
            self.gpr16(Gpr::Bp),
            self.gpr16(Gpr::Si),
            self.gpr16(Gpr::Di),
            self.ip,
        );
        let _ = writeln!(
            s,
            "CS = {:04X} SS = {:04X} DS = {:04X} ES = {:04X} FS = {:04X} GS = {:04X}",
            self.seg(SegReg::Cs),
            self.seg(SegReg::Ss),
            self.seg(SegReg::Ds),
            self.seg(SegReg::Es),
            self.seg(SegReg::Fs),
            self.seg(SegReg::Gs),
        );
        let _ = write!(
            s,
            "OF = {} SF = {} ZF = {} AF = {} PF = {} CF = {}",
            self.flags.of() as u8,
            self.flags.sf() as u8,
            self.flags.zf() as u8,
            self.flags.af() as u8,
            self.flags.pf() as u8,
            self.flags.cf() as u8,
        );
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_halves_alias_the_word() {
        let mut cpu = CpuState::new();
        cpu.set_gpr16(Gpr::Bx, 0x1234);
        // BL = encoding 3, BH = encoding 7.
        assert_eq!(cpu.gpr8(3), 0x34);
        assert_eq!(cpu.gpr8(7), 0x12);

        cpu.set_gpr8(7, 0xAB);
        assert_eq!(cpu.gpr16(Gpr::Bx), 0xAB34);
        cpu.set_gpr8(3, 0xCD);
        assert_eq!(cpu.gpr16(Gpr::Bx), 0xABCD);
    }

    #[test]
    fn accumulator_views_stay_in_sync() {
        let mut cpu = CpuState::new();
        cpu.set_al(0x55);
        cpu.set_ah(0xAA);
        assert_eq!(cpu.ax(), 0xAA55);
        cpu.set_ax(0x1122);
        assert_eq!(cpu.al(), 0x22);
        assert_eq!(cpu.ah(), 0x11);
    }

    #[test]
    fn override_takes_priority_but_is_not_consumed_by_lookup() {
        let mut cpu = CpuState::new();
        cpu.set_seg(SegReg::Ds, 0x1000);
        cpu.set_seg(SegReg::Es, 0x2000);
        assert_eq!(cpu.effective_seg(SegReg::Ds), 0x1000);

        cpu.set_seg_override(SegReg::Es);
        assert_eq!(cpu.effective_seg(SegReg::Ds), 0x2000);
        // Still active until the instruction boundary clears it.
        assert_eq!(cpu.effective_seg(SegReg::Ds), 0x2000);

        cpu.clear_prefixes();
        assert_eq!(cpu.effective_seg(SegReg::Ds), 0x1000);
    }

    #[test]
    fn clear_prefixes_resets_rep_and_lock() {
        let mut cpu = CpuState::new();
        cpu.prefixes.repe = true;
        cpu.prefixes.lock = true;
        cpu.clear_prefixes();
        assert_eq!(cpu.prefixes, Prefixes::default());
    }

    #[test]
    fn dump_contains_every_register_group() {
        let mut cpu = CpuState::new();
        cpu.set_ax(0xBEEF);
        cpu.flags.insert(Flags::ZF);
        let dump = cpu.dump();
        assert!(dump.contains("AX = BEEF"));
        assert!(dump.contains("IP = 0000"));
        assert!(dump.contains("GS = 0000"));
        assert!(dump.contains("ZF = 1"));
    }
}
