//! The fetch-decode-execute loop.

use crate::alu::{self, Width};
use crate::console::Console;
use crate::exception::{CpuException, DivideKind, RunExit};
use crate::shift;
use rm86_cpu::{CpuState, Flags, Gpr, SegReg};
use rm86_mem::AddressSpace;

/// Outcome of executing a single instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepExit {
    Continue,
    Halted,
    DebugTrap,
}

/// A decoded operand: either a register (by its 3-bit encoding) or a memory
/// cell whose segment and offset were resolved at decode time. Reads and
/// writes go through one accessor per variant and width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rm {
    Reg(u8),
    Mem { seg: u16, off: u16 },
}

#[derive(Debug, Clone, Copy)]
struct ModRm {
    reg: u8,
    rm: Rm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AluOp {
    Add,
    Or,
    Adc,
    Sbb,
    And,
    Sub,
    Xor,
    Cmp,
    Mov,
}

const GROUP1_OPS: [AluOp; 8] = [
    AluOp::Add,
    AluOp::Or,
    AluOp::Adc,
    AluOp::Sbb,
    AluOp::And,
    AluOp::Sub,
    AluOp::Xor,
    AluOp::Cmp,
];

/// Execution context: the interpreter borrows every piece of machine state
/// from the caller and mutates it in place. No state lives anywhere else.
pub struct Interp<'a, C: Console> {
    pub cpu: &'a mut CpuState,
    pub mem: &'a mut AddressSpace,
    console: &'a mut C,
}

impl<'a, C: Console> Interp<'a, C> {
    pub fn new(cpu: &'a mut CpuState, mem: &'a mut AddressSpace, console: &'a mut C) -> Self {
        Self { cpu, mem, console }
    }

    pub(crate) fn console(&mut self) -> &mut C {
        self.console
    }

    /// Runs until a terminal condition. The invalid paths dump the full
    /// register/flag state before returning.
    pub fn run(&mut self) -> RunExit {
        loop {
            match self.step() {
                Ok(StepExit::Continue) => self.cpu.clear_prefixes(),
                Ok(StepExit::Halted) => return RunExit::Halted,
                Ok(StepExit::DebugTrap) => return RunExit::DebugTrap,
                Err(e) => {
                    tracing::error!("{e}");
                    if !matches!(e, CpuException::Divide { .. }) {
                        for line in self.cpu.dump().lines() {
                            tracing::error!("{line}");
                        }
                    }
                    return e.into();
                }
            }
        }
    }

    /// Executes one instruction, prefixes included. The caller clears the
    /// transient prefix state once the instruction has completed.
    pub fn step(&mut self) -> Result<StepExit, CpuException> {
        let opcode = loop {
            let b = self.fetch_u8();
            match b {
                0xF0 => self.cpu.prefixes.lock = true,
                0xF2 => self.cpu.prefixes.repne = true,
                0xF3 => self.cpu.prefixes.repe = true,
                0x26 => self.cpu.set_seg_override(SegReg::Es),
                0x2E => self.cpu.set_seg_override(SegReg::Cs),
                0x36 => self.cpu.set_seg_override(SegReg::Ss),
                0x3E => self.cpu.set_seg_override(SegReg::Ds),
                other => break other,
            }
        };

        match opcode {
            // The eight ALU blocks plus the register/memory mov forms, six
            // operand shapes each.
            0x00..=0x05 | 0x08..=0x0D | 0x10..=0x15 | 0x18..=0x1D | 0x20..=0x25 | 0x28..=0x2D
            | 0x30..=0x35 | 0x38..=0x3D | 0x88..=0x8B => self.exec_alu_block(opcode),

            0x06 => {
                let v = self.cpu.seg(SegReg::Es);
                self.push16(v);
            }
            0x07 => {
                let v = self.pop16();
                self.cpu.set_seg(SegReg::Es, v);
            }
            0x1E => {
                let v = self.cpu.seg(SegReg::Ds);
                self.push16(v);
            }
            0x1F => {
                let v = self.pop16();
                self.cpu.set_seg(SegReg::Ds, v);
            }

            0x40..=0x47 => {
                let reg = Gpr::from_index(opcode & 7);
                let v = self.cpu.gpr16(reg) as u32;
                let r = alu::add_with_flags(&mut self.cpu.flags, v, 1, false, Width::Word);
                self.cpu.set_gpr16(reg, r);
            }
            0x48..=0x4F => {
                let reg = Gpr::from_index(opcode & 7);
                let v = self.cpu.gpr16(reg) as u32;
                let r = alu::sub_with_flags(&mut self.cpu.flags, v, 1, false, Width::Word);
                self.cpu.set_gpr16(reg, r);
            }
            0x50..=0x57 => {
                let v = self.cpu.gpr16(Gpr::from_index(opcode & 7));
                self.push16(v);
            }
            0x58..=0x5F => {
                let v = self.pop16();
                self.cpu.set_gpr16(Gpr::from_index(opcode & 7), v);
            }

            // Conditional short jumps. The displacement is consumed before
            // the condition is tested, taken or not.
            0x70..=0x7F => {
                let disp = self.fetch_u8() as i8;
                let f = self.cpu.flags;
                let taken = match opcode & 0xF {
                    0x0 => f.of(),
                    0x1 => !f.of(),
                    0x2 => f.cf(),
                    0x3 => !f.cf(),
                    0x4 => f.zf(),
                    0x5 => !f.zf(),
                    0x6 => f.cf() || f.zf(),
                    0x7 => !(f.cf() || f.zf()),
                    0x8 => f.sf(),
                    0x9 => !f.sf(),
                    0xA => f.pf(),
                    0xB => !f.pf(),
                    0xC => f.sf() != f.of(),
                    0xD => f.sf() == f.of(),
                    0xE => f.sf() != f.of() || f.zf(),
                    _ => f.sf() == f.of() && !f.zf(),
                };
                if taken {
                    self.jump_rel8(disp);
                }
            }

            0x80..=0x83 => self.exec_group1(opcode),

            0x8C => {
                let m = self.decode_modrm();
                let sreg = SegReg::from_index(m.reg).ok_or(CpuException::InvalidInstruction {
                    opcode,
                    selector: m.reg,
                })?;
                let v = self.cpu.seg(sreg);
                self.write_rm16(m.rm, v);
            }
            0x8D => {
                let m = self.decode_modrm();
                match m.rm {
                    Rm::Mem { off, .. } => self.cpu.set_gpr16(Gpr::from_index(m.reg), off),
                    Rm::Reg(_) => {
                        return Err(CpuException::InvalidInstruction {
                            opcode,
                            selector: m.reg,
                        })
                    }
                }
            }
            0x8E => {
                let m = self.decode_modrm();
                let sreg = SegReg::from_index(m.reg).ok_or(CpuException::InvalidInstruction {
                    opcode,
                    selector: m.reg,
                })?;
                let v = self.read_rm16(m.rm);
                self.cpu.set_seg(sreg, v);
            }

            0x90 => {}
            0x91..=0x97 => {
                let reg = Gpr::from_index(opcode & 7);
                let a = self.cpu.ax();
                let r = self.cpu.gpr16(reg);
                self.cpu.set_ax(r);
                self.cpu.set_gpr16(reg, a);
            }

            0x9A => {
                let off = self.fetch_u16();
                let seg = self.fetch_u16();
                let cs = self.cpu.seg(SegReg::Cs);
                self.push16(cs);
                let ip = self.cpu.ip;
                self.push16(ip);
                self.cpu.set_seg(SegReg::Cs, seg);
                self.cpu.ip = off;
            }

            // Accumulator moves to/from a fixed absolute address.
            0xA0 => {
                let off = self.fetch_u16();
                let seg = self.cpu.effective_seg(SegReg::Ds);
                let v = self.mem.read_u8(seg, off);
                self.cpu.set_al(v);
            }
            0xA1 => {
                let off = self.fetch_u16();
                let seg = self.cpu.effective_seg(SegReg::Ds);
                let v = self.mem.read_u16(seg, off);
                self.cpu.set_ax(v);
            }
            0xA2 => {
                let off = self.fetch_u16();
                let seg = self.cpu.effective_seg(SegReg::Ds);
                let v = self.cpu.al();
                self.mem.write_u8(seg, off, v);
            }
            0xA3 => {
                let off = self.fetch_u16();
                let seg = self.cpu.effective_seg(SegReg::Ds);
                let v = self.cpu.ax();
                self.mem.write_u16(seg, off, v);
            }

            0xB0..=0xB7 => {
                let imm = self.fetch_u8();
                self.cpu.set_gpr8(opcode & 7, imm);
            }
            0xB8..=0xBF => {
                let imm = self.fetch_u16();
                self.cpu.set_gpr16(Gpr::from_index(opcode & 7), imm);
            }

            0xC2 => {
                let imm = self.fetch_u16();
                self.cpu.ip = self.pop16();
                let sp = self.cpu.sp().wrapping_add(imm);
                self.cpu.set_sp(sp);
            }
            0xC3 => {
                self.cpu.ip = self.pop16();
            }
            0xCA => {
                let imm = self.fetch_u16();
                self.cpu.ip = self.pop16();
                let cs = self.pop16();
                self.cpu.set_seg(SegReg::Cs, cs);
                let sp = self.cpu.sp().wrapping_add(imm);
                self.cpu.set_sp(sp);
            }
            0xCB => {
                self.cpu.ip = self.pop16();
                let cs = self.pop16();
                self.cpu.set_seg(SegReg::Cs, cs);
            }

            0xC6 => {
                let m = self.decode_modrm();
                if m.reg != 0 {
                    return Err(CpuException::InvalidInstruction {
                        opcode,
                        selector: m.reg,
                    });
                }
                let imm = self.fetch_u8();
                self.write_rm8(m.rm, imm);
            }
            0xC7 => {
                let m = self.decode_modrm();
                if m.reg != 0 {
                    return Err(CpuException::InvalidInstruction {
                        opcode,
                        selector: m.reg,
                    });
                }
                let imm = self.fetch_u16();
                self.write_rm16(m.rm, imm);
            }

            0xCC => return Ok(self.dispatch_interrupt(3)),
            0xCD => {
                let vector = self.fetch_u8();
                return Ok(self.dispatch_interrupt(vector));
            }

            0xD0..=0xD3 => self.exec_group2(opcode)?,

            // Loop forms decrement CX first; the displacement is always
            // consumed.
            0xE0..=0xE2 => {
                let disp = self.fetch_u8() as i8;
                let cx = self.cpu.cx().wrapping_sub(1);
                self.cpu.set_cx(cx);
                let zf = self.cpu.flags.zf();
                let taken = cx != 0
                    && match opcode {
                        0xE0 => !zf,
                        0xE1 => zf,
                        _ => true,
                    };
                if taken {
                    self.jump_rel8(disp);
                }
            }

            // Port I/O is not wired to any device: reads produce zero,
            // writes are discarded.
            0xE4 => {
                let port = self.fetch_u8();
                tracing::debug!(port, "in AL: no device, reading 0");
                self.cpu.set_al(0);
            }
            0xE5 => {
                let port = self.fetch_u8();
                tracing::debug!(port, "in AX: no device, reading 0");
                self.cpu.set_ax(0);
            }
            0xE6 => {
                let port = self.fetch_u8();
                let value = self.cpu.al();
                tracing::debug!(port, value, "out AL: no device, discarding");
            }
            0xE7 => {
                let port = self.fetch_u8();
                let value = self.cpu.ax();
                tracing::debug!(port, value, "out AX: no device, discarding");
            }
            0xEC => {
                let port = self.cpu.dx();
                tracing::debug!(port, "in AL, DX: no device, reading 0");
                self.cpu.set_al(0);
            }
            0xED => {
                let port = self.cpu.dx();
                tracing::debug!(port, "in AX, DX: no device, reading 0");
                self.cpu.set_ax(0);
            }
            0xEE => {
                let port = self.cpu.dx();
                let value = self.cpu.al();
                tracing::debug!(port, value, "out DX, AL: no device, discarding");
            }
            0xEF => {
                let port = self.cpu.dx();
                let value = self.cpu.ax();
                tracing::debug!(port, value, "out DX, AX: no device, discarding");
            }

            0xE8 => {
                let disp = self.fetch_u16();
                let ip = self.cpu.ip;
                self.push16(ip);
                self.cpu.ip = ip.wrapping_add(disp);
            }
            0xE9 => {
                let disp = self.fetch_u16();
                self.cpu.ip = self.cpu.ip.wrapping_add(disp);
            }
            0xEA => {
                let off = self.fetch_u16();
                let seg = self.fetch_u16();
                self.cpu.set_seg(SegReg::Cs, seg);
                self.cpu.ip = off;
            }
            0xEB => {
                let disp = self.fetch_u8() as i8;
                self.jump_rel8(disp);
            }

            0xF4 => return Ok(StepExit::Halted),

            0xF6 | 0xF7 => self.exec_group3(opcode)?,

            0xFE => {
                let m = self.decode_modrm();
                let v = self.read_rm8(m.rm) as u32;
                let r = match m.reg {
                    0 => alu::add_with_flags(&mut self.cpu.flags, v, 1, false, Width::Byte),
                    1 => alu::sub_with_flags(&mut self.cpu.flags, v, 1, false, Width::Byte),
                    selector => {
                        return Err(CpuException::InvalidInstruction { opcode, selector })
                    }
                };
                self.write_rm8(m.rm, r as u8);
            }

            other => return Err(CpuException::InvalidOpcode { opcode: other }),
        }

        Ok(StepExit::Continue)
    }

    fn fetch_u8(&mut self) -> u8 {
        let b = self.mem.read_u8(self.cpu.seg(SegReg::Cs), self.cpu.ip);
        self.cpu.ip = self.cpu.ip.wrapping_add(1);
        b
    }

    fn fetch_u16(&mut self) -> u16 {
        let w = self.mem.read_u16(self.cpu.seg(SegReg::Cs), self.cpu.ip);
        self.cpu.ip = self.cpu.ip.wrapping_add(2);
        w
    }

    fn jump_rel8(&mut self, disp: i8) {
        self.cpu.ip = self.cpu.ip.wrapping_add(disp as u16);
    }

    /// Decodes a mode/register/memory byte, consuming any displacement.
    ///
    /// The segment is resolved here: an active override wins, otherwise
    /// BP-based forms default to the stack segment and everything else to
    /// the data segment. mod=00 rm=110 is repurposed as a bare 16-bit
    /// displacement with no base register.
    fn decode_modrm(&mut self) -> ModRm {
        let b = self.fetch_u8();
        let mode = b >> 6;
        let reg = (b >> 3) & 7;
        let rm_bits = b & 7;

        if mode == 3 {
            return ModRm {
                reg,
                rm: Rm::Reg(rm_bits),
            };
        }

        let bx = self.cpu.gpr16(Gpr::Bx);
        let bp = self.cpu.gpr16(Gpr::Bp);
        let si = self.cpu.gpr16(Gpr::Si);
        let di = self.cpu.gpr16(Gpr::Di);
        let (base, default_seg) = match rm_bits {
            0 => (bx.wrapping_add(si), SegReg::Ds),
            1 => (bx.wrapping_add(di), SegReg::Ds),
            2 => (bp.wrapping_add(si), SegReg::Ss),
            3 => (bp.wrapping_add(di), SegReg::Ss),
            4 => (si, SegReg::Ds),
            5 => (di, SegReg::Ds),
            6 if mode == 0 => (0, SegReg::Ds),
            6 => (bp, SegReg::Ss),
            _ => (bx, SegReg::Ds),
        };
        let disp = match mode {
            0 if rm_bits == 6 => self.fetch_u16(),
            0 => 0,
            1 => self.fetch_u8() as i8 as u16,
            _ => self.fetch_u16(),
        };

        ModRm {
            reg,
            rm: Rm::Mem {
                seg: self.cpu.effective_seg(default_seg),
                off: base.wrapping_add(disp),
            },
        }
    }

    fn read_rm8(&self, rm: Rm) -> u8 {
        match rm {
            Rm::Reg(i) => self.cpu.gpr8(i),
            Rm::Mem { seg, off } => self.mem.read_u8(seg, off),
        }
    }

    fn write_rm8(&mut self, rm: Rm, value: u8) {
        match rm {
            Rm::Reg(i) => self.cpu.set_gpr8(i, value),
            Rm::Mem { seg, off } => self.mem.write_u8(seg, off, value),
        }
    }

    fn read_rm16(&self, rm: Rm) -> u16 {
        match rm {
            Rm::Reg(i) => self.cpu.gpr16(Gpr::from_index(i)),
            Rm::Mem { seg, off } => self.mem.read_u16(seg, off),
        }
    }

    fn write_rm16(&mut self, rm: Rm, value: u16) {
        match rm {
            Rm::Reg(i) => self.cpu.set_gpr16(Gpr::from_index(i), value),
            Rm::Mem { seg, off } => self.mem.write_u16(seg, off, value),
        }
    }

    fn push16(&mut self, value: u16) {
        let sp = self.cpu.sp().wrapping_sub(2);
        self.cpu.set_sp(sp);
        self.mem.write_u16(self.cpu.seg(SegReg::Ss), sp, value);
    }

    fn pop16(&mut self) -> u16 {
        let sp = self.cpu.sp();
        let v = self.mem.read_u16(self.cpu.seg(SegReg::Ss), sp);
        self.cpu.set_sp(sp.wrapping_add(2));
        v
    }

    fn exec_alu_block(&mut self, opcode: u8) {
        let op = match opcode & 0xF8 {
            0x00 => AluOp::Add,
            0x08 => AluOp::Or,
            0x10 => AluOp::Adc,
            0x18 => AluOp::Sbb,
            0x20 => AluOp::And,
            0x28 => AluOp::Sub,
            0x30 => AluOp::Xor,
            0x38 => AluOp::Cmp,
            _ => AluOp::Mov,
        };
        match opcode & 7 {
            0 => {
                let m = self.decode_modrm();
                let src = self.cpu.gpr8(m.reg);
                self.alu8(op, m.rm, src);
            }
            1 => {
                let m = self.decode_modrm();
                let src = self.cpu.gpr16(Gpr::from_index(m.reg));
                self.alu16(op, m.rm, src);
            }
            2 => {
                let m = self.decode_modrm();
                let src = self.read_rm8(m.rm);
                self.alu8(op, Rm::Reg(m.reg), src);
            }
            3 => {
                let m = self.decode_modrm();
                let src = self.read_rm16(m.rm);
                self.alu16(op, Rm::Reg(m.reg), src);
            }
            4 => {
                let imm = self.fetch_u8();
                self.alu8(op, Rm::Reg(0), imm);
            }
            _ => {
                let imm = self.fetch_u16();
                self.alu16(op, Rm::Reg(0), imm);
            }
        }
    }

    fn exec_group1(&mut self, opcode: u8) {
        let m = self.decode_modrm();
        let op = GROUP1_OPS[m.reg as usize];
        match opcode {
            // Eb, Ib
            0x80 | 0x82 => {
                let imm = self.fetch_u8();
                self.alu8(op, m.rm, imm);
            }
            // Ev, Iv
            0x81 => {
                let imm = self.fetch_u16();
                self.alu16(op, m.rm, imm);
            }
            // Ev, Ib sign-extended
            _ => {
                let imm = self.fetch_u8() as i8 as u16;
                self.alu16(op, m.rm, imm);
            }
        }
    }

    fn alu8(&mut self, op: AluOp, dst: Rm, src: u8) {
        if op == AluOp::Mov {
            self.write_rm8(dst, src);
            return;
        }
        let d = self.read_rm8(dst) as u32;
        let s = src as u32;
        let carry = self.cpu.flags.cf();
        let f = &mut self.cpu.flags;
        let result = match op {
            AluOp::Add => alu::add_with_flags(f, d, s, false, Width::Byte),
            AluOp::Adc => alu::add_with_flags(f, d, s, carry, Width::Byte),
            AluOp::Sub => alu::sub_with_flags(f, d, s, false, Width::Byte),
            AluOp::Sbb => alu::sub_with_flags(f, d, s, carry, Width::Byte),
            AluOp::Cmp => {
                alu::sub_with_flags(f, d, s, false, Width::Byte);
                return;
            }
            AluOp::And => alu::logic_with_flags(f, d & s, Width::Byte),
            AluOp::Or => alu::logic_with_flags(f, d | s, Width::Byte),
            AluOp::Xor => alu::logic_with_flags(f, d ^ s, Width::Byte),
            AluOp::Mov => unreachable!(),
        };
        self.write_rm8(dst, result as u8);
    }

    fn alu16(&mut self, op: AluOp, dst: Rm, src: u16) {
        if op == AluOp::Mov {
            self.write_rm16(dst, src);
            return;
        }
        let d = self.read_rm16(dst) as u32;
        let s = src as u32;
        let carry = self.cpu.flags.cf();
        let f = &mut self.cpu.flags;
        let result = match op {
            AluOp::Add => alu::add_with_flags(f, d, s, false, Width::Word),
            AluOp::Adc => alu::add_with_flags(f, d, s, carry, Width::Word),
            AluOp::Sub => alu::sub_with_flags(f, d, s, false, Width::Word),
            AluOp::Sbb => alu::sub_with_flags(f, d, s, carry, Width::Word),
            AluOp::Cmp => {
                alu::sub_with_flags(f, d, s, false, Width::Word);
                return;
            }
            AluOp::And => alu::logic_with_flags(f, d & s, Width::Word),
            AluOp::Or => alu::logic_with_flags(f, d | s, Width::Word),
            AluOp::Xor => alu::logic_with_flags(f, d ^ s, Width::Word),
            AluOp::Mov => unreachable!(),
        };
        self.write_rm16(dst, result);
    }

    fn exec_group2(&mut self, opcode: u8) -> Result<(), CpuException> {
        let m = self.decode_modrm();
        let count = if opcode & 2 != 0 {
            self.cpu.cl() as u32
        } else {
            1
        };
        let byte_sized = opcode & 1 == 0;
        let w = if byte_sized { Width::Byte } else { Width::Word };
        let value = if byte_sized {
            self.read_rm8(m.rm) as u32
        } else {
            self.read_rm16(m.rm) as u32
        };
        let f = &mut self.cpu.flags;
        let result = match m.reg {
            0 => shift::rol(f, value, count, w),
            1 => shift::ror(f, value, count, w),
            2 => shift::rcl(f, value, count, w),
            3 => shift::rcr(f, value, count, w),
            4 => shift::shl(f, value, count, w),
            5 => shift::shr(f, value, count, w),
            7 => shift::sar(f, value, count, w),
            selector => return Err(CpuException::InvalidInstruction { opcode, selector }),
        };
        if byte_sized {
            self.write_rm8(m.rm, result as u8);
        } else {
            self.write_rm16(m.rm, result);
        }
        Ok(())
    }

    fn exec_group3(&mut self, opcode: u8) -> Result<(), CpuException> {
        let byte_sized = opcode == 0xF6;
        let m = self.decode_modrm();
        match m.reg {
            0 => {
                // test r/m, imm: compute and discard.
                if byte_sized {
                    let v = self.read_rm8(m.rm);
                    let imm = self.fetch_u8();
                    alu::logic_with_flags(&mut self.cpu.flags, (v & imm) as u32, Width::Byte);
                } else {
                    let v = self.read_rm16(m.rm);
                    let imm = self.fetch_u16();
                    alu::logic_with_flags(&mut self.cpu.flags, (v & imm) as u32, Width::Word);
                }
            }
            2 => {
                // not: flags unaffected.
                if byte_sized {
                    let v = self.read_rm8(m.rm);
                    self.write_rm8(m.rm, !v);
                } else {
                    let v = self.read_rm16(m.rm);
                    self.write_rm16(m.rm, !v);
                }
            }
            3 => {
                // neg: flags as for "0 minus operand".
                let w = if byte_sized { Width::Byte } else { Width::Word };
                let v = if byte_sized {
                    self.read_rm8(m.rm) as u32
                } else {
                    self.read_rm16(m.rm) as u32
                };
                let r = alu::sub_with_flags(&mut self.cpu.flags, 0, v, false, w);
                if byte_sized {
                    self.write_rm8(m.rm, r as u8);
                } else {
                    self.write_rm16(m.rm, r);
                }
            }
            4 => self.exec_mul(byte_sized, m.rm),
            5 => self.exec_imul(byte_sized, m.rm),
            6 => self.exec_div(byte_sized, m.rm)?,
            7 => self.exec_idiv(byte_sized, m.rm)?,
            // Selector 1 is reserved.
            selector => return Err(CpuException::InvalidInstruction { opcode, selector }),
        }
        Ok(())
    }

    fn exec_mul(&mut self, byte_sized: bool, rm: Rm) {
        let upper_nonzero;
        if byte_sized {
            let product = self.cpu.al() as u16 * self.read_rm8(rm) as u16;
            self.cpu.set_ax(product);
            upper_nonzero = product & 0xFF00 != 0;
        } else {
            let product = self.cpu.ax() as u32 * self.read_rm16(rm) as u32;
            self.cpu.set_ax(product as u16);
            self.cpu.set_dx((product >> 16) as u16);
            upper_nonzero = product >> 16 != 0;
        }
        self.cpu.flags.set(Flags::CF, upper_nonzero);
        self.cpu.flags.set(Flags::OF, upper_nonzero);
    }

    fn exec_imul(&mut self, byte_sized: bool, rm: Rm) {
        let fits;
        if byte_sized {
            let product = (self.cpu.al() as i8 as i16) * (self.read_rm8(rm) as i8 as i16);
            self.cpu.set_ax(product as u16);
            fits = product == product as i8 as i16;
        } else {
            let product = (self.cpu.ax() as i16 as i32) * (self.read_rm16(rm) as i16 as i32);
            self.cpu.set_ax(product as u16);
            self.cpu.set_dx((product >> 16) as u16);
            fits = product == product as i16 as i32;
        }
        self.cpu.flags.set(Flags::CF, !fits);
        self.cpu.flags.set(Flags::OF, !fits);
    }

    fn exec_div(&mut self, byte_sized: bool, rm: Rm) -> Result<(), CpuException> {
        if byte_sized {
            let divisor = self.read_rm8(rm) as u16;
            if divisor == 0 {
                return Err(CpuException::Divide {
                    kind: DivideKind::Zero,
                });
            }
            let dividend = self.cpu.ax();
            let quotient = dividend / divisor;
            if quotient > 0xFF {
                return Err(CpuException::Divide {
                    kind: DivideKind::Overflow,
                });
            }
            self.cpu.set_al(quotient as u8);
            self.cpu.set_ah((dividend % divisor) as u8);
        } else {
            let divisor = self.read_rm16(rm) as u32;
            if divisor == 0 {
                return Err(CpuException::Divide {
                    kind: DivideKind::Zero,
                });
            }
            let dividend = ((self.cpu.dx() as u32) << 16) | self.cpu.ax() as u32;
            let quotient = dividend / divisor;
            if quotient > 0xFFFF {
                return Err(CpuException::Divide {
                    kind: DivideKind::Overflow,
                });
            }
            self.cpu.set_ax(quotient as u16);
            self.cpu.set_dx((dividend % divisor) as u16);
        }
        Ok(())
    }

    fn exec_idiv(&mut self, byte_sized: bool, rm: Rm) -> Result<(), CpuException> {
        if byte_sized {
            let divisor = self.read_rm8(rm) as i8 as i32;
            if divisor == 0 {
                return Err(CpuException::Divide {
                    kind: DivideKind::Zero,
                });
            }
            let dividend = self.cpu.ax() as i16 as i32;
            let quotient = dividend / divisor;
            if !(-0x80..=0x7F).contains(&quotient) {
                return Err(CpuException::Divide {
                    kind: DivideKind::Overflow,
                });
            }
            self.cpu.set_al(quotient as u8);
            self.cpu.set_ah((dividend % divisor) as u8);
        } else {
            let divisor = self.read_rm16(rm) as i16 as i64;
            if divisor == 0 {
                return Err(CpuException::Divide {
                    kind: DivideKind::Zero,
                });
            }
            let dividend = ((((self.cpu.dx() as u32) << 16) | self.cpu.ax() as u32) as i32) as i64;
            let quotient = dividend / divisor;
            if !(-0x8000..=0x7FFF).contains(&quotient) {
                return Err(CpuException::Divide {
                    kind: DivideKind::Overflow,
                });
            }
            self.cpu.set_ax(quotient as u16);
            self.cpu.set_dx((dividend % divisor) as u16);
        }
        Ok(())
    }
}
