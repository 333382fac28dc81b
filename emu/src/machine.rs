use std::collections::BTreeMap;

use arch::image::MemoryImage;
use arch::inst::Inst;
use arch::reg::{Csr, Reg};

use crate::error::EmuError;

/// Where execution of a loaded image begins.
pub const START_PC: u32 = 0x4000_0000;
/// Memory-mapped terminal output: a byte stored here goes to stdout.
pub const TERM_OUT: u32 = 0xFFFF_FF00;
/// Global interrupt enable bit of `status`, masked by `int`.
pub const STATUS_INTR_ENABLE: u32 = 0x1;
/// `cause` value for a software interrupt.
pub const CAUSE_SOFT: u32 = 4;

/// One executed instruction, as reported to hooks.
#[derive(Debug, Clone, Copy)]
pub struct Step {
    pub addr: u32,
    pub word: u32,
    pub inst: Inst,
}

/// The SX32 register machine: 16 GPRs (r0 wired to zero, r14 = sp,
/// r15 = pc), three CSRs and sparse byte-addressable memory.
#[derive(Debug, Clone, Default)]
pub struct Machine {
    pub gpr: [u32; 16],
    pub csr: [u32; 3],
    pub mem: BTreeMap<u32, u8>,
    pub halted: bool,
}

impl Machine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(image: MemoryImage) -> Self {
        let mut machine = Machine { mem: image.bytes, ..Default::default() };
        machine.set_pc(START_PC);
        machine
    }

    pub fn pc(&self) -> u32 {
        self.gpr[Reg::Pc.idx()]
    }

    pub fn set_pc(&mut self, addr: u32) {
        self.gpr[Reg::Pc.idx()] = addr;
    }

    pub fn read_u8(&self, addr: u32) -> u8 {
        self.mem.get(&addr).copied().unwrap_or(0)
    }

    pub fn read_u32(&self, addr: u32) -> u32 {
        u32::from_le_bytes([
            self.read_u8(addr),
            self.read_u8(addr.wrapping_add(1)),
            self.read_u8(addr.wrapping_add(2)),
            self.read_u8(addr.wrapping_add(3)),
        ])
    }

    pub fn write_u8(&mut self, addr: u32, val: u8) {
        if addr == TERM_OUT {
            print!("{}", val as char);
        }
        self.mem.insert(addr, val);
    }

    pub fn write_u32(&mut self, addr: u32, val: u32) {
        for (i, b) in val.to_le_bytes().into_iter().enumerate() {
            self.write_u8(addr.wrapping_add(i as u32), b);
        }
    }

    fn push(&mut self, val: u32) {
        let sp = self.gpr[Reg::Sp.idx()].wrapping_sub(4);
        self.gpr[Reg::Sp.idx()] = sp;
        self.write_u32(sp, val);
    }

    fn gpr(&self, r: Reg) -> u32 {
        self.gpr[r.idx()]
    }

    fn set_gpr(&mut self, r: Reg, val: u32) {
        self.gpr[r.idx()] = val;
    }

    fn csr(&self, c: Csr) -> u32 {
        self.csr[c.idx()]
    }

    fn set_csr(&mut self, c: Csr, val: u32) {
        self.csr[c.idx()] = val;
    }

    /// Fetch, decode and execute one instruction.
    pub fn step(&mut self) -> Result<Step, EmuError> {
        let addr = self.pc();
        let word = self.read_u32(addr);
        self.set_pc(addr.wrapping_add(4));
        let inst = Inst::decode(word).map_err(|source| EmuError::Decode { pc: addr, source })?;
        self.exec(inst);
        // r0 is hard-wired to zero
        self.gpr[Reg::R0.idx()] = 0;
        Ok(Step { addr, word, inst })
    }

    fn exec(&mut self, inst: Inst) {
        let ofs = |base: u32, disp: i16| base.wrapping_add(disp as i32 as u32);
        match inst {
            Inst::Halt => self.halted = true,
            Inst::Int => {
                self.push(self.csr(Csr::Status));
                self.push(self.pc());
                self.set_csr(Csr::Cause, CAUSE_SOFT);
                self.csr[Csr::Status.idx()] &= !STATUS_INTR_ENABLE;
                self.set_pc(self.csr(Csr::Handler));
            }
            Inst::Call { base, index, disp } => {
                let target = self.read_u32(ofs(self.gpr(base).wrapping_add(self.gpr(index)), disp));
                self.push(self.pc());
                self.set_pc(target);
            }
            Inst::Jmp { base, disp } => {
                let target = self.read_u32(ofs(self.gpr(base), disp));
                self.set_pc(target);
            }
            Inst::Beq { base, lhs, rhs, disp } => {
                if self.gpr(lhs) == self.gpr(rhs) {
                    let target = self.read_u32(ofs(self.gpr(base), disp));
                    self.set_pc(target);
                }
            }
            Inst::Bne { base, lhs, rhs, disp } => {
                if self.gpr(lhs) != self.gpr(rhs) {
                    let target = self.read_u32(ofs(self.gpr(base), disp));
                    self.set_pc(target);
                }
            }
            Inst::Bgt { base, lhs, rhs, disp } => {
                if (self.gpr(lhs) as i32) > (self.gpr(rhs) as i32) {
                    let target = self.read_u32(ofs(self.gpr(base), disp));
                    self.set_pc(target);
                }
            }
            Inst::Xchg { lhs, rhs } => {
                self.gpr.swap(lhs.idx(), rhs.idx());
            }
            Inst::Add { dst, lhs, rhs } => {
                self.set_gpr(dst, self.gpr(lhs).wrapping_add(self.gpr(rhs)));
            }
            Inst::Sub { dst, lhs, rhs } => {
                self.set_gpr(dst, self.gpr(lhs).wrapping_sub(self.gpr(rhs)));
            }
            Inst::Mul { dst, lhs, rhs } => {
                self.set_gpr(dst, self.gpr(lhs).wrapping_mul(self.gpr(rhs)));
            }
            Inst::Div { dst, lhs, rhs } => {
                let d = self.gpr(rhs);
                self.set_gpr(dst, if d == 0 { 0 } else { self.gpr(lhs).wrapping_div(d) });
            }
            Inst::Not { dst, src } => self.set_gpr(dst, !self.gpr(src)),
            Inst::And { dst, lhs, rhs } => self.set_gpr(dst, self.gpr(lhs) & self.gpr(rhs)),
            Inst::Or { dst, lhs, rhs } => self.set_gpr(dst, self.gpr(lhs) | self.gpr(rhs)),
            Inst::Xor { dst, lhs, rhs } => self.set_gpr(dst, self.gpr(lhs) ^ self.gpr(rhs)),
            Inst::Shl { dst, lhs, rhs } => {
                self.set_gpr(dst, self.gpr(lhs).wrapping_shl(self.gpr(rhs)));
            }
            Inst::Shr { dst, lhs, rhs } => {
                self.set_gpr(dst, self.gpr(lhs).wrapping_shr(self.gpr(rhs)));
            }
            Inst::St { base, index, src, disp } => {
                let addr = ofs(self.gpr(base).wrapping_add(self.gpr(index)), disp);
                self.write_u32(addr, self.gpr(src));
            }
            Inst::Push { base, src, disp } => {
                let addr = ofs(self.gpr(base), disp);
                self.set_gpr(base, addr);
                self.write_u32(addr, self.gpr(src));
            }
            Inst::StInd { base, index, src, disp } => {
                let slot = ofs(self.gpr(base).wrapping_add(self.gpr(index)), disp);
                let addr = self.read_u32(slot);
                self.write_u32(addr, self.gpr(src));
            }
            Inst::CsrWr { dst, src } => self.set_csr(dst, self.gpr(src)),
            Inst::CsrLd { dst, base, disp } => {
                let val = self.read_u32(ofs(self.gpr(base), disp));
                self.set_csr(dst, val);
            }
            Inst::Ld { dst, base, index, disp } => {
                let addr = ofs(self.gpr(base).wrapping_add(self.gpr(index)), disp);
                let val = self.read_u32(addr);
                self.set_gpr(dst, val);
            }
            Inst::Pop { dst, base, disp } => {
                let val = self.read_u32(self.gpr(base));
                self.set_gpr(base, ofs(self.gpr(base), disp));
                self.set_gpr(dst, val);
            }
            Inst::CsrRd { dst, src } => self.set_gpr(dst, self.csr(src)),
            Inst::CsrPop { dst, base, disp } => {
                let val = self.read_u32(self.gpr(base));
                self.set_gpr(base, ofs(self.gpr(base), disp));
                self.set_csr(dst, val);
            }
        }
    }

    /// Run to `halt` with no hooks attached.
    pub fn run(&mut self) -> Result<(), EmuError> {
        while !self.halted {
            self.step()?;
        }
        Ok(())
    }
}

// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn load_words(words: &[u32]) -> Machine {
        let mut m = Machine::new();
        for (i, w) in words.iter().enumerate() {
            m.write_u32(4 * i as u32, *w);
        }
        m
    }

    #[test]
    fn add_writes_the_second_register() {
        let mut m = load_words(&[
            Inst::Add { dst: Reg::R2, lhs: Reg::R1, rhs: Reg::R2 }.encode(),
            Inst::Halt.encode(),
        ]);
        m.gpr[1] = 3;
        m.gpr[2] = 4;
        m.run().unwrap();
        assert_eq!(m.gpr[2], 7);
        assert_eq!(m.gpr[1], 3);
    }

    #[test]
    fn push_then_pop_restores_sp() {
        let mut m = load_words(&[
            Inst::Push { base: Reg::Sp, src: Reg::R3, disp: -4 }.encode(),
            Inst::Pop { dst: Reg::R4, base: Reg::Sp, disp: 4 }.encode(),
            Inst::Halt.encode(),
        ]);
        m.gpr[Reg::Sp.idx()] = 0x1000;
        m.gpr[3] = 0xDEAD_BEEF;
        m.run().unwrap();
        assert_eq!(m.gpr[4], 0xDEAD_BEEF);
        assert_eq!(m.gpr[Reg::Sp.idx()], 0x1000);
    }

    #[test]
    fn r0_stays_zero() {
        let mut m = load_words(&[
            Inst::Add { dst: Reg::R0, lhs: Reg::R1, rhs: Reg::R1 }.encode(),
            Inst::Halt.encode(),
        ]);
        m.gpr[1] = 41;
        m.run().unwrap();
        assert_eq!(m.gpr[0], 0);
    }

    #[test]
    fn branch_reads_target_from_pool() {
        // 0x00: beq r1, r2, [pc + 4]   (slot at 0x08)
        // 0x04: halt                    (fall-through)
        // 0x08: .word 0x10              (target)
        // 0x10: add r2, r1, r2 ; halt
        let mut m = load_words(&[
            Inst::Beq { base: Reg::Pc, lhs: Reg::R1, rhs: Reg::R2, disp: 4 }.encode(),
            Inst::Halt.encode(),
            0x10,
            0,
            Inst::Add { dst: Reg::R2, lhs: Reg::R1, rhs: Reg::R2 }.encode(),
            Inst::Halt.encode(),
        ]);
        m.gpr[1] = 5;
        m.gpr[2] = 5;
        m.run().unwrap();
        assert_eq!(m.gpr[2], 10, "branch taken lands on the add");

        // not taken: falls through to the first halt
        let mut m2 = load_words(&[
            Inst::Beq { base: Reg::Pc, lhs: Reg::R1, rhs: Reg::R2, disp: 4 }.encode(),
            Inst::Halt.encode(),
            0x10,
            0,
            Inst::Add { dst: Reg::R2, lhs: Reg::R1, rhs: Reg::R2 }.encode(),
            Inst::Halt.encode(),
        ]);
        m2.gpr[1] = 5;
        m2.gpr[2] = 6;
        m2.run().unwrap();
        assert_eq!(m2.gpr[2], 6);
    }

    #[test]
    fn bgt_compares_signed() {
        let prog = [
            Inst::Bgt { base: Reg::Pc, lhs: Reg::R1, rhs: Reg::R2, disp: 4 }.encode(),
            Inst::Halt.encode(),
            0x10,
            0,
            Inst::Not { dst: Reg::R3, src: Reg::R0 }.encode(),
            Inst::Halt.encode(),
        ];
        let mut m = load_words(&prog);
        m.gpr[1] = 1;
        m.gpr[2] = (-1i32) as u32;
        m.run().unwrap();
        assert_eq!(m.gpr[3], u32::MAX, "1 > -1 signed, branch taken");

        let mut m2 = load_words(&prog);
        m2.gpr[1] = (-1i32) as u32;
        m2.gpr[2] = 1;
        m2.run().unwrap();
        assert_eq!(m2.gpr[3], 0);
    }

    #[test]
    fn call_pushes_the_return_address() {
        // 0x00: call [pc + 4]  (slot at 0x08 -> 0x10)
        // 0x10: ret
        let mut m = load_words(&[
            Inst::Call { base: Reg::Pc, index: Reg::R0, disp: 4 }.encode(),
            Inst::Halt.encode(),
            0x10,
            0,
            Inst::Pop { dst: Reg::Pc, base: Reg::Sp, disp: 4 }.encode(),
        ]);
        m.gpr[Reg::Sp.idx()] = 0x1000;
        let step = m.step().unwrap();
        assert!(matches!(step.inst, Inst::Call { .. }));
        assert_eq!(m.pc(), 0x10);
        assert_eq!(m.read_u32(0xFFC), 4, "return address under sp");
        m.run().unwrap();
        assert_eq!(m.gpr[Reg::Sp.idx()], 0x1000);
    }

    #[test]
    fn int_and_iret_round_trip() {
        // handler at 0x20 runs iret; main then halts
        let mut m = load_words(&[
            Inst::Int.encode(),
            Inst::Halt.encode(),
        ]);
        m.write_u32(0x20, Inst::CsrLd { dst: Csr::Status, base: Reg::Sp, disp: 4 }.encode());
        m.write_u32(0x24, Inst::Pop { dst: Reg::Pc, base: Reg::Sp, disp: 8 }.encode());
        m.gpr[Reg::Sp.idx()] = 0x1000;
        m.csr[Csr::Handler.idx()] = 0x20;
        m.csr[Csr::Status.idx()] = STATUS_INTR_ENABLE;

        m.step().unwrap(); // int
        assert_eq!(m.pc(), 0x20);
        assert_eq!(m.csr[Csr::Cause.idx()], CAUSE_SOFT);
        assert_eq!(m.csr[Csr::Status.idx()] & STATUS_INTR_ENABLE, 0);

        m.run().unwrap();
        assert!(m.halted);
        assert_eq!(m.gpr[Reg::Sp.idx()], 0x1000, "iret drops both stack slots");
        assert_eq!(m.csr[Csr::Status.idx()], STATUS_INTR_ENABLE, "status restored");
    }

    #[test]
    fn div_by_zero_yields_zero() {
        let mut m = load_words(&[
            Inst::Div { dst: Reg::R2, lhs: Reg::R1, rhs: Reg::R2 }.encode(),
            Inst::Halt.encode(),
        ]);
        m.gpr[1] = 100;
        m.gpr[2] = 0;
        m.run().unwrap();
        assert_eq!(m.gpr[2], 0);
    }

    #[test]
    fn xchg_swaps() {
        let mut m = load_words(&[
            Inst::Xchg { lhs: Reg::R1, rhs: Reg::R2 }.encode(),
            Inst::Halt.encode(),
        ]);
        m.gpr[1] = 1;
        m.gpr[2] = 2;
        m.run().unwrap();
        assert_eq!((m.gpr[1], m.gpr[2]), (2, 1));
    }

    #[test]
    fn store_indirect_writes_through_the_pool() {
        // 0x00: st r1, [[pc + 4]]   (slot at 0x08 holds 0x40)
        let mut m = load_words(&[
            Inst::StInd { base: Reg::Pc, index: Reg::R0, src: Reg::R1, disp: 4 }.encode(),
            Inst::Halt.encode(),
            0x40,
        ]);
        m.gpr[1] = 0xABCD;
        m.run().unwrap();
        assert_eq!(m.read_u32(0x40), 0xABCD);
    }

    #[test]
    fn invalid_opcode_is_fatal() {
        let mut m = load_words(&[0xA000_0000]);
        let err = m.step().unwrap_err();
        assert!(matches!(err, EmuError::Decode { pc: 0, .. }));
    }
}
