//! Software interrupt dispatch and the DOS-style console services behind
//! vector 0x21.

use crate::console::Console;
use crate::exec::{Interp, StepExit};
use rm86_cpu::SegReg;

impl<C: Console> Interp<'_, C> {
    pub(crate) fn dispatch_interrupt(&mut self, vector: u8) -> StepExit {
        match vector {
            3 => StepExit::DebugTrap,
            0x21 => self.console_services(),
            other => {
                tracing::warn!(vector = other, "unhandled interrupt vector, ignoring");
                StepExit::Continue
            }
        }
    }

    /// Vector 0x21, selected by AH. Unknown services are logged and skipped
    /// so programs probing for richer environments keep running.
    fn console_services(&mut self) -> StepExit {
        match self.cpu.ah() {
            0x01 => {
                let c = self.console().read_char(true);
                self.cpu.set_al(c);
            }
            0x02 => {
                let c = self.cpu.dl();
                self.console().write_char(c);
                self.cpu.set_al(c);
            }
            0x08 => {
                let c = self.console().read_char(false);
                self.cpu.set_al(c);
            }
            0x09 => self.write_string(),
            0x4C => return StepExit::Halted,
            service => tracing::warn!(service, "unhandled console service, ignoring"),
        }
        StepExit::Continue
    }

    /// Writes bytes from DS:DX (segment override honored) until a '$'
    /// terminator. A missing terminator stops after one full sweep of the
    /// offset space instead of spinning forever.
    fn write_string(&mut self) {
        let seg = self.cpu.effective_seg(SegReg::Ds);
        let mut off = self.cpu.dx();
        for _ in 0..=u16::MAX as u32 {
            let b = self.mem.read_u8(seg, off);
            if b == b'$' {
                return;
            }
            self.console().write_char(b);
            off = off.wrapping_add(1);
        }
        tracing::warn!("string output missing '$' terminator");
    }
}
