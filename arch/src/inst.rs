use crate::reg::{Csr, Reg};

use color_print::cformat;
use thiserror::Error;

// ----------------------------------------------------------------------------
// Word format
//
// opcode(4) | mod(4) | regA(4) | regB(4) | regC(4) | disp(12)
//
// Words are stored little-endian: the low byte of the u32 is emitted first.

pub const DISP_MIN: i32 = -2048;
pub const DISP_MAX: i32 = 2047;

pub struct OpCode;

impl OpCode {
    pub const HALT: u8 = 0x0;
    pub const INT: u8 = 0x1;
    pub const CALL: u8 = 0x2;
    pub const BRANCH: u8 = 0x3;
    pub const XCHG: u8 = 0x4;
    pub const ARITH: u8 = 0x5;
    pub const LOGIC: u8 = 0x6;
    pub const SHIFT: u8 = 0x7;
    pub const STORE: u8 = 0x8;
    pub const LOAD: u8 = 0x9;
}

fn enc_format(opcode: u8, modif: u8, a: u8, b: u8, c: u8, disp: i16) -> u32 {
    ((opcode as u32 & 0xF) << 28)
        | ((modif as u32 & 0xF) << 24)
        | ((a as u32 & 0xF) << 20)
        | ((b as u32 & 0xF) << 16)
        | ((c as u32 & 0xF) << 12)
        | (disp as u32 & 0xFFF)
}

fn dec_format(word: u32) -> (u8, u8, u8, u8, u8, i16) {
    let opcode = ((word >> 28) & 0xF) as u8;
    let modif = ((word >> 24) & 0xF) as u8;
    let a = ((word >> 20) & 0xF) as u8;
    let b = ((word >> 16) & 0xF) as u8;
    let c = ((word >> 12) & 0xF) as u8;
    // sign-extend the 12-bit displacement through bit 11
    let disp = (((word & 0xFFF) as i16) << 4) >> 4;
    (opcode, modif, a, b, c, disp)
}

// ----------------------------------------------------------------------------

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    #[error("invalid opcode/modifier combination {0:X}.{1:X} (word {2:08x})")]
    BadOpcode(u8, u8, u32),

    #[error("invalid control register index {0} (word {1:08x})")]
    BadCsr(u8, u32),
}

// ----------------------------------------------------------------------------
// Instructions
//
// One variant per defined opcode.mod row. The assembler's surface mnemonics
// (ret, push, pop, iret, ...) are fixed-operand uses of these.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inst {
    Halt,
    /// push status, push pc, cause := 4, mask interrupts, pc := handler
    Int,
    /// push pc; pc := mem[base + index + disp]
    Call { base: Reg, index: Reg, disp: i16 },
    /// pc := mem[base + disp]
    Jmp { base: Reg, disp: i16 },
    /// if lhs == rhs { pc := mem[base + disp] }
    Beq { base: Reg, lhs: Reg, rhs: Reg, disp: i16 },
    Bne { base: Reg, lhs: Reg, rhs: Reg, disp: i16 },
    /// signed comparison
    Bgt { base: Reg, lhs: Reg, rhs: Reg, disp: i16 },
    Xchg { lhs: Reg, rhs: Reg },
    /// dst := lhs + rhs
    Add { dst: Reg, lhs: Reg, rhs: Reg },
    Sub { dst: Reg, lhs: Reg, rhs: Reg },
    Mul { dst: Reg, lhs: Reg, rhs: Reg },
    Div { dst: Reg, lhs: Reg, rhs: Reg },
    Not { dst: Reg, src: Reg },
    And { dst: Reg, lhs: Reg, rhs: Reg },
    Or { dst: Reg, lhs: Reg, rhs: Reg },
    Xor { dst: Reg, lhs: Reg, rhs: Reg },
    Shl { dst: Reg, lhs: Reg, rhs: Reg },
    Shr { dst: Reg, lhs: Reg, rhs: Reg },
    /// mem[base + index + disp] := src
    St { base: Reg, index: Reg, src: Reg, disp: i16 },
    /// base += disp; mem[base] := src
    Push { base: Reg, src: Reg, disp: i16 },
    /// mem[mem[base + index + disp]] := src
    StInd { base: Reg, index: Reg, src: Reg, disp: i16 },
    /// csr dst := src
    CsrWr { dst: Csr, src: Reg },
    /// csr dst := mem[base + disp]
    CsrLd { dst: Csr, base: Reg, disp: i16 },
    /// dst := mem[base + index + disp]
    Ld { dst: Reg, base: Reg, index: Reg, disp: i16 },
    /// dst := mem[base]; base += disp
    Pop { dst: Reg, base: Reg, disp: i16 },
    /// dst := csr src
    CsrRd { dst: Reg, src: Csr },
    /// csr dst := mem[base]; base += disp
    CsrPop { dst: Csr, base: Reg, disp: i16 },
}

impl Inst {
    pub fn encode(&self) -> u32 {
        let r = |r: Reg| u8::from(r);
        let s = |s: Csr| u8::from(s);
        match *self {
            Inst::Halt => enc_format(OpCode::HALT, 0, 0, 0, 0, 0),
            Inst::Int => enc_format(OpCode::INT, 0, 0, 0, 0, 0),
            Inst::Call { base, index, disp } => {
                enc_format(OpCode::CALL, 1, r(base), r(index), 0, disp)
            }
            Inst::Jmp { base, disp } => enc_format(OpCode::BRANCH, 8, r(base), 0, 0, disp),
            Inst::Beq { base, lhs, rhs, disp } => {
                enc_format(OpCode::BRANCH, 9, r(base), r(lhs), r(rhs), disp)
            }
            Inst::Bne { base, lhs, rhs, disp } => {
                enc_format(OpCode::BRANCH, 10, r(base), r(lhs), r(rhs), disp)
            }
            Inst::Bgt { base, lhs, rhs, disp } => {
                enc_format(OpCode::BRANCH, 11, r(base), r(lhs), r(rhs), disp)
            }
            Inst::Xchg { lhs, rhs } => enc_format(OpCode::XCHG, 0, 0, r(lhs), r(rhs), 0),
            // ALU family: the left operand travels in regC so that the
            // two-operand surface forms keep regA == regC
            Inst::Add { dst, lhs, rhs } => enc_format(OpCode::ARITH, 0, r(dst), r(rhs), r(lhs), 0),
            Inst::Sub { dst, lhs, rhs } => enc_format(OpCode::ARITH, 1, r(dst), r(rhs), r(lhs), 0),
            Inst::Mul { dst, lhs, rhs } => enc_format(OpCode::ARITH, 2, r(dst), r(rhs), r(lhs), 0),
            Inst::Div { dst, lhs, rhs } => enc_format(OpCode::ARITH, 3, r(dst), r(rhs), r(lhs), 0),
            Inst::Not { dst, src } => enc_format(OpCode::LOGIC, 0, r(dst), r(src), 0, 0),
            Inst::And { dst, lhs, rhs } => enc_format(OpCode::LOGIC, 1, r(dst), r(rhs), r(lhs), 0),
            Inst::Or { dst, lhs, rhs } => enc_format(OpCode::LOGIC, 2, r(dst), r(rhs), r(lhs), 0),
            Inst::Xor { dst, lhs, rhs } => enc_format(OpCode::LOGIC, 3, r(dst), r(rhs), r(lhs), 0),
            Inst::Shl { dst, lhs, rhs } => enc_format(OpCode::SHIFT, 0, r(dst), r(rhs), r(lhs), 0),
            Inst::Shr { dst, lhs, rhs } => enc_format(OpCode::SHIFT, 1, r(dst), r(rhs), r(lhs), 0),
            Inst::St { base, index, src, disp } => {
                enc_format(OpCode::STORE, 0, r(base), r(index), r(src), disp)
            }
            Inst::Push { base, src, disp } => {
                enc_format(OpCode::STORE, 1, r(base), 0, r(src), disp)
            }
            Inst::StInd { base, index, src, disp } => {
                enc_format(OpCode::STORE, 2, r(base), r(index), r(src), disp)
            }
            Inst::CsrWr { dst, src } => enc_format(OpCode::LOAD, 0, s(dst), r(src), 0, 0),
            Inst::CsrLd { dst, base, disp } => {
                enc_format(OpCode::LOAD, 1, s(dst), r(base), 0, disp)
            }
            Inst::Ld { dst, base, index, disp } => {
                enc_format(OpCode::LOAD, 2, r(dst), r(base), r(index), disp)
            }
            Inst::Pop { dst, base, disp } => enc_format(OpCode::LOAD, 3, r(dst), r(base), 0, disp),
            Inst::CsrRd { dst, src } => enc_format(OpCode::LOAD, 4, r(dst), s(src), 0, 0),
            Inst::CsrPop { dst, base, disp } => {
                enc_format(OpCode::LOAD, 7, s(dst), r(base), 0, disp)
            }
        }
    }

    pub fn decode(word: u32) -> Result<Inst, DecodeError> {
        let (opcode, modif, a, b, c, disp) = dec_format(word);
        let reg = |n: u8| Reg::try_from(n).expect("nibble is always a valid register");
        let csr = |n: u8| Csr::try_from(n).map_err(|_| DecodeError::BadCsr(n, word));
        let bad = DecodeError::BadOpcode(opcode, modif, word);
        match (opcode, modif) {
            (OpCode::HALT, 0) => Ok(Inst::Halt),
            (OpCode::INT, 0) => Ok(Inst::Int),
            (OpCode::CALL, 1) => Ok(Inst::Call { base: reg(a), index: reg(b), disp }),
            (OpCode::BRANCH, 8) => Ok(Inst::Jmp { base: reg(a), disp }),
            (OpCode::BRANCH, 9) => {
                Ok(Inst::Beq { base: reg(a), lhs: reg(b), rhs: reg(c), disp })
            }
            (OpCode::BRANCH, 10) => {
                Ok(Inst::Bne { base: reg(a), lhs: reg(b), rhs: reg(c), disp })
            }
            (OpCode::BRANCH, 11) => {
                Ok(Inst::Bgt { base: reg(a), lhs: reg(b), rhs: reg(c), disp })
            }
            (OpCode::XCHG, 0) => Ok(Inst::Xchg { lhs: reg(b), rhs: reg(c) }),
            (OpCode::ARITH, 0) => Ok(Inst::Add { dst: reg(a), lhs: reg(c), rhs: reg(b) }),
            (OpCode::ARITH, 1) => Ok(Inst::Sub { dst: reg(a), lhs: reg(c), rhs: reg(b) }),
            (OpCode::ARITH, 2) => Ok(Inst::Mul { dst: reg(a), lhs: reg(c), rhs: reg(b) }),
            (OpCode::ARITH, 3) => Ok(Inst::Div { dst: reg(a), lhs: reg(c), rhs: reg(b) }),
            (OpCode::LOGIC, 0) => Ok(Inst::Not { dst: reg(a), src: reg(b) }),
            (OpCode::LOGIC, 1) => Ok(Inst::And { dst: reg(a), lhs: reg(c), rhs: reg(b) }),
            (OpCode::LOGIC, 2) => Ok(Inst::Or { dst: reg(a), lhs: reg(c), rhs: reg(b) }),
            (OpCode::LOGIC, 3) => Ok(Inst::Xor { dst: reg(a), lhs: reg(c), rhs: reg(b) }),
            (OpCode::SHIFT, 0) => Ok(Inst::Shl { dst: reg(a), lhs: reg(c), rhs: reg(b) }),
            (OpCode::SHIFT, 1) => Ok(Inst::Shr { dst: reg(a), lhs: reg(c), rhs: reg(b) }),
            (OpCode::STORE, 0) => {
                Ok(Inst::St { base: reg(a), index: reg(b), src: reg(c), disp })
            }
            (OpCode::STORE, 1) => Ok(Inst::Push { base: reg(a), src: reg(c), disp }),
            (OpCode::STORE, 2) => {
                Ok(Inst::StInd { base: reg(a), index: reg(b), src: reg(c), disp })
            }
            (OpCode::LOAD, 0) => Ok(Inst::CsrWr { dst: csr(a)?, src: reg(b) }),
            (OpCode::LOAD, 1) => Ok(Inst::CsrLd { dst: csr(a)?, base: reg(b), disp }),
            (OpCode::LOAD, 2) => {
                Ok(Inst::Ld { dst: reg(a), base: reg(b), index: reg(c), disp })
            }
            (OpCode::LOAD, 3) => Ok(Inst::Pop { dst: reg(a), base: reg(b), disp }),
            (OpCode::LOAD, 4) => Ok(Inst::CsrRd { dst: reg(a), src: csr(b)? }),
            (OpCode::LOAD, 7) => Ok(Inst::CsrPop { dst: csr(a)?, base: reg(b), disp }),
            _ => Err(bad),
        }
    }
}

// ----------------------------------------------------------------------------
// Disassembly display

impl Inst {
    pub fn cformat(&self) -> String {
        macro_rules! op0 {
            ($name:expr) => {
                cformat!("<r>{:<6}</>", $name)
            };
        }
        macro_rules! regs {
            ($name:expr, $($reg:expr),+) => {
                cformat!("<r>{:<6}</><b>{}</>",
                    $name,
                    [$(format!("%{}", $reg)),+].join(", "))
            };
        }
        macro_rules! mem {
            ($name:expr, $base:expr, $disp:expr) => {
                cformat!("<r>{:<6}</><b>[%{}<y>{:+#x}</>]</>", $name, $base, $disp)
            };
        }

        match *self {
            Inst::Halt => op0!("halt"),
            Inst::Int => op0!("int"),
            Inst::Call { base, index, disp } => {
                cformat!("<r>{:<6}</><b>[%{} + %{}<y>{:+#x}</>]</>", "call", base, index, disp)
            }
            Inst::Jmp { base, disp } => mem!("jmp", base, disp),
            Inst::Beq { base, lhs, rhs, disp } => {
                cformat!("<r>{:<6}</><b>%{}, %{}, [%{}<y>{:+#x}</>]</>", "beq", lhs, rhs, base, disp)
            }
            Inst::Bne { base, lhs, rhs, disp } => {
                cformat!("<r>{:<6}</><b>%{}, %{}, [%{}<y>{:+#x}</>]</>", "bne", lhs, rhs, base, disp)
            }
            Inst::Bgt { base, lhs, rhs, disp } => {
                cformat!("<r>{:<6}</><b>%{}, %{}, [%{}<y>{:+#x}</>]</>", "bgt", lhs, rhs, base, disp)
            }
            Inst::Xchg { lhs, rhs } => regs!("xchg", lhs, rhs),
            Inst::Add { dst, lhs, rhs } => regs!("add", dst, lhs, rhs),
            Inst::Sub { dst, lhs, rhs } => regs!("sub", dst, lhs, rhs),
            Inst::Mul { dst, lhs, rhs } => regs!("mul", dst, lhs, rhs),
            Inst::Div { dst, lhs, rhs } => regs!("div", dst, lhs, rhs),
            Inst::Not { dst, src } => regs!("not", dst, src),
            Inst::And { dst, lhs, rhs } => regs!("and", dst, lhs, rhs),
            Inst::Or { dst, lhs, rhs } => regs!("or", dst, lhs, rhs),
            Inst::Xor { dst, lhs, rhs } => regs!("xor", dst, lhs, rhs),
            Inst::Shl { dst, lhs, rhs } => regs!("shl", dst, lhs, rhs),
            Inst::Shr { dst, lhs, rhs } => regs!("shr", dst, lhs, rhs),
            Inst::St { base, index, src, disp } => {
                cformat!("<r>{:<6}</><b>%{}, [%{} + %{}<y>{:+#x}</>]</>", "st", src, base, index, disp)
            }
            Inst::Push { base, src, disp } => {
                cformat!("<r>{:<6}</><b>%{}, [%{} += <y>{}</>]</>", "push", src, base, disp)
            }
            Inst::StInd { base, index, src, disp } => {
                cformat!("<r>{:<6}</><b>%{}, [[%{} + %{}<y>{:+#x}</>]]</>", "st", src, base, index, disp)
            }
            Inst::CsrWr { dst, src } => regs!("csrwr", src, dst),
            Inst::CsrLd { dst, base, disp } => {
                cformat!("<r>{:<6}</><b>%{}, [%{}<y>{:+#x}</>]</>", "ld", dst, base, disp)
            }
            Inst::Ld { dst, base, index, disp } => {
                cformat!("<r>{:<6}</><b>%{}, [%{} + %{}<y>{:+#x}</>]</>", "ld", dst, base, index, disp)
            }
            Inst::Pop { dst, base, disp } => {
                cformat!("<r>{:<6}</><b>%{}, [%{} += <y>{}</>]</>", "pop", dst, base, disp)
            }
            Inst::CsrRd { dst, src } => regs!("csrrd", src, dst),
            Inst::CsrPop { dst, base, disp } => {
                cformat!("<r>{:<6}</><b>%{}, [%{} += <y>{}</>]</>", "pop", dst, base, disp)
            }
        }
    }
}

// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    macro_rules! test_inst {
        ($($name:ident: $inst:expr,)*) => {
            $(
                #[test]
                fn $name() {
                    let inst = $inst;
                    let word = inst.encode();
                    let back = Inst::decode(word).unwrap();
                    assert_eq!(inst, back, "word: {:08x}", word);
                }
            )*
        }
    }

    test_inst! {
        rt_halt: Inst::Halt,
        rt_int: Inst::Int,
        rt_call: Inst::Call { base: Reg::Pc, index: Reg::R0, disp: 0x10 },
        rt_jmp: Inst::Jmp { base: Reg::Pc, disp: -4 },
        rt_beq: Inst::Beq { base: Reg::Pc, lhs: Reg::R1, rhs: Reg::R2, disp: 20 },
        rt_bne: Inst::Bne { base: Reg::Pc, lhs: Reg::R3, rhs: Reg::R4, disp: -2048 },
        rt_bgt: Inst::Bgt { base: Reg::Pc, lhs: Reg::R5, rhs: Reg::R6, disp: 2047 },
        rt_xchg: Inst::Xchg { lhs: Reg::R1, rhs: Reg::R2 },
        rt_add: Inst::Add { dst: Reg::R2, lhs: Reg::R1, rhs: Reg::R2 },
        rt_sub: Inst::Sub { dst: Reg::R2, lhs: Reg::R1, rhs: Reg::R2 },
        rt_mul: Inst::Mul { dst: Reg::R9, lhs: Reg::R8, rhs: Reg::R9 },
        rt_div: Inst::Div { dst: Reg::R9, lhs: Reg::R8, rhs: Reg::R9 },
        rt_not: Inst::Not { dst: Reg::R1, src: Reg::R1 },
        rt_and: Inst::And { dst: Reg::R2, lhs: Reg::R1, rhs: Reg::R2 },
        rt_or: Inst::Or { dst: Reg::R2, lhs: Reg::R1, rhs: Reg::R2 },
        rt_xor: Inst::Xor { dst: Reg::R2, lhs: Reg::R1, rhs: Reg::R2 },
        rt_shl: Inst::Shl { dst: Reg::R2, lhs: Reg::R2, rhs: Reg::R1 },
        rt_shr: Inst::Shr { dst: Reg::R2, lhs: Reg::R2, rhs: Reg::R1 },
        rt_st: Inst::St { base: Reg::R4, index: Reg::R0, src: Reg::R7, disp: 12 },
        rt_push: Inst::Push { base: Reg::Sp, src: Reg::R3, disp: -4 },
        rt_st_ind: Inst::StInd { base: Reg::Pc, index: Reg::R0, src: Reg::R1, disp: 0x40 },
        rt_csrwr: Inst::CsrWr { dst: Csr::Handler, src: Reg::R1 },
        rt_csrld: Inst::CsrLd { dst: Csr::Status, base: Reg::Sp, disp: 4 },
        rt_ld: Inst::Ld { dst: Reg::R1, base: Reg::Pc, index: Reg::R0, disp: 8 },
        rt_pop: Inst::Pop { dst: Reg::R4, base: Reg::Sp, disp: 4 },
        rt_csrrd: Inst::CsrRd { dst: Reg::R2, src: Csr::Cause },
        rt_csrpop: Inst::CsrPop { dst: Csr::Status, base: Reg::Sp, disp: 8 },
    }

    #[test]
    fn ret_is_pop_pc() {
        // ret = ld 9.3 pc, sp, +4
        let ret = Inst::Pop { dst: Reg::Pc, base: Reg::Sp, disp: 4 };
        assert_eq!(ret.encode(), 0x93FE_0004);
        assert_eq!(ret.encode().to_le_bytes(), [0x04, 0x00, 0xFE, 0x93]);
    }

    #[test]
    fn alu_two_operand_form_keeps_dst_in_a_and_c() {
        // `add %r1, %r2`: destination and left operand are r2
        let word = Inst::Add { dst: Reg::R2, lhs: Reg::R2, rhs: Reg::R1 }.encode();
        assert_eq!((word >> 20) & 0xF, 2); // regA
        assert_eq!((word >> 16) & 0xF, 1); // regB
        assert_eq!((word >> 12) & 0xF, 2); // regC
    }

    #[test]
    fn displacement_sign_extends() {
        let inst = Inst::Jmp { base: Reg::Pc, disp: -4 };
        let word = inst.encode();
        assert_eq!(word & 0xFFF, 0xFFC);
        match Inst::decode(word).unwrap() {
            Inst::Jmp { disp, .. } => assert_eq!(disp, -4),
            other => panic!("decoded {other:?}"),
        }
    }

    #[test]
    fn csr_fields_are_pinned() {
        // csrrd: gpr destination in regA, csr index in regB
        let rd = Inst::CsrRd { dst: Reg::R1, src: Csr::Cause };
        assert_eq!(rd.encode(), 0x9412_0000);
        // csrwr: csr destination in regA, gpr source in regB
        let wr = Inst::CsrWr { dst: Csr::Cause, src: Reg::R1 };
        assert_eq!(wr.encode(), 0x9021_0000);
    }

    #[test]
    fn undefined_combinations_fail() {
        assert!(Inst::decode(0x0100_0000).is_err()); // halt with mod 1
        assert!(Inst::decode(0x3000_0000).is_err()); // branch with mod 0
        assert!(Inst::decode(0x9500_0000).is_err()); // load with mod 5
        assert!(Inst::decode(0xA000_0000).is_err()); // opcode 10
        assert!(Inst::decode(0x9030_0000).is_err()); // csrwr with csr index 3
    }
}
