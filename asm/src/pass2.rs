use arch::inst::{Inst, DISP_MAX, DISP_MIN};
use arch::obj::{ObjectModule, Rela, Scope, ABS, UND};
use arch::op::Mnemonic;
use arch::reg::{Csr, Reg};

use crate::assembler::Assembler;
use crate::error::AsmError;
use crate::parser::{Arg, DirKind, Instruction, Line, Operand, Stmt};

// Second pass: re-walk the same lines, emit concrete bytes per section and
// record relocations for forward and external references.

impl Assembler {
    pub fn second_pass(&mut self, lines: &[Line]) -> Result<ObjectModule, AsmError> {
        self.lc = 0;
        self.current = ABS.to_string();
        for line in lines {
            if line.label.is_some() {
                self.require_section(line.no)?;
            }
            match &line.stmt {
                None => {}
                Some(Stmt::Directive(dir)) => match dir.kind {
                    DirKind::Global | DirKind::Extern => {}
                    DirKind::End => break,
                    DirKind::Section => {
                        let Arg::Sym(name) = &dir.args[0] else {
                            unreachable!("validated in the first pass");
                        };
                        self.switch_section(name);
                    }
                    DirKind::Word => {
                        self.require_section(line.no)?;
                        for arg in &dir.args {
                            match arg {
                                Arg::Num(n) => self.emit(&n.to_le_bytes()),
                                Arg::Sym(name) => self.emit_symbol_word(name),
                                Arg::Str(_) => unreachable!("validated in the first pass"),
                            }
                        }
                    }
                    DirKind::Skip => {
                        self.require_section(line.no)?;
                        let Arg::Num(n) = dir.args[0] else {
                            unreachable!("validated in the first pass");
                        };
                        self.emit(&vec![0; n as usize]);
                    }
                    DirKind::Ascii => {
                        self.require_section(line.no)?;
                        let Arg::Str(s) = &dir.args[0] else {
                            unreachable!("validated in the first pass");
                        };
                        self.emit(s.as_bytes());
                    }
                },
                Some(Stmt::Instruction(inst)) => {
                    self.require_section(line.no)?;
                    self.emit_instruction(inst, line.no)?;
                }
            }
        }
        self.flush_pool();
        Ok(ObjectModule {
            symbols: std::mem::take(&mut self.symbols),
            sections: std::mem::take(&mut self.sections),
            relas: std::mem::take(&mut self.relas),
        })
    }

    fn require_section(&self, line: usize) -> Result<(), AsmError> {
        if self.in_section() {
            Ok(())
        } else {
            Err(AsmError::OutOfSection { line })
        }
    }

    fn emit(&mut self, bytes: &[u8]) {
        let sec = self
            .sections
            .get_mut(&self.current)
            .expect("sections were registered in the first pass");
        sec.data.extend_from_slice(bytes);
        self.lc += bytes.len() as u32;
    }

    fn word(&mut self, inst: Inst) {
        self.emit(&inst.encode().to_le_bytes());
    }

    /// Emit a zero placeholder word and the relocation that will fill it:
    /// local symbols relocate through their owning section with the value as
    /// addend, globals by name with addend zero.
    fn emit_symbol_word(&mut self, name: &str) {
        let offset = self.cur_off();
        let sym = self.symbols.get(name).expect("symbols were registered in the first pass");
        let (symbol, addend) = if sym.scope == Scope::Local && sym.section != UND {
            (sym.section.clone(), sym.value)
        } else {
            (name.to_string(), 0)
        };
        self.relas
            .entry(self.current.clone())
            .or_default()
            .push(Rela { offset, symbol, addend });
        self.emit(&0u32.to_le_bytes());
    }

    fn switch_section(&mut self, name: &str) {
        if self.in_section() {
            self.flush_pool();
            while self.cur_off() % 8 != 0 {
                self.emit(&[0]);
            }
        }
        self.current = name.to_string();
        self.lc = self.cur_base();
    }

    /// Emit the open section's literal pool: numerics verbatim, symbols as
    /// zero words with relocations.
    fn flush_pool(&mut self) {
        if !self.in_section() {
            return;
        }
        let Some(pool) = self.pools.get(&self.current) else {
            return;
        };
        let nums: Vec<u32> = pool.nums().collect();
        let syms: Vec<String> = pool.syms().map(str::to_string).collect();
        for v in nums {
            self.emit(&v.to_le_bytes());
        }
        for s in syms {
            self.emit_symbol_word(&s);
        }
    }

    // ------------------------------------------------------------------------
    // Instruction encoding

    fn emit_instruction(&mut self, inst: &Instruction, no: usize) -> Result<(), AsmError> {
        let gpr = |i: usize| inst.gprs[i];
        let operand =
            || inst.operand.as_ref().expect("operand presence was checked by the parser");
        match inst.mnemonic {
            Mnemonic::Halt => self.word(Inst::Halt),
            Mnemonic::Int => self.word(Inst::Int),
            Mnemonic::Iret => {
                // restore status from under the saved pc, then pop pc and
                // drop both stack slots
                self.word(Inst::CsrLd { dst: Csr::Status, base: Reg::Sp, disp: 4 });
                self.word(Inst::Pop { dst: Reg::Pc, base: Reg::Sp, disp: 8 });
            }
            Mnemonic::Ret => self.word(Inst::Pop { dst: Reg::Pc, base: Reg::Sp, disp: 4 }),
            Mnemonic::Call => {
                let disp = self.pool_disp(operand(), no)?;
                self.word(Inst::Call { base: Reg::Pc, index: Reg::R0, disp });
            }
            Mnemonic::Jmp => {
                let disp = self.pool_disp(operand(), no)?;
                self.word(Inst::Jmp { base: Reg::Pc, disp });
            }
            Mnemonic::Beq | Mnemonic::Bne | Mnemonic::Bgt => {
                let disp = self.pool_disp(operand(), no)?;
                let (base, lhs, rhs) = (Reg::Pc, gpr(0), gpr(1));
                self.word(match inst.mnemonic {
                    Mnemonic::Beq => Inst::Beq { base, lhs, rhs, disp },
                    Mnemonic::Bne => Inst::Bne { base, lhs, rhs, disp },
                    _ => Inst::Bgt { base, lhs, rhs, disp },
                });
            }
            Mnemonic::Push => self.word(Inst::Push { base: Reg::Sp, src: gpr(0), disp: -4 }),
            Mnemonic::Pop => self.word(Inst::Pop { dst: gpr(0), base: Reg::Sp, disp: 4 }),
            Mnemonic::Xchg => self.word(Inst::Xchg { lhs: gpr(0), rhs: gpr(1) }),
            Mnemonic::Add | Mnemonic::Sub | Mnemonic::Mul | Mnemonic::Div
            | Mnemonic::And | Mnemonic::Or | Mnemonic::Xor
            | Mnemonic::Shl | Mnemonic::Shr => {
                // `op %rS, %rD` computes rD := rD op rS
                let (dst, lhs, rhs) = (gpr(1), gpr(1), gpr(0));
                self.word(match inst.mnemonic {
                    Mnemonic::Add => Inst::Add { dst, lhs, rhs },
                    Mnemonic::Sub => Inst::Sub { dst, lhs, rhs },
                    Mnemonic::Mul => Inst::Mul { dst, lhs, rhs },
                    Mnemonic::Div => Inst::Div { dst, lhs, rhs },
                    Mnemonic::And => Inst::And { dst, lhs, rhs },
                    Mnemonic::Or => Inst::Or { dst, lhs, rhs },
                    Mnemonic::Xor => Inst::Xor { dst, lhs, rhs },
                    Mnemonic::Shl => Inst::Shl { dst, lhs, rhs },
                    _ => Inst::Shr { dst, lhs, rhs },
                });
            }
            Mnemonic::Not => self.word(Inst::Not { dst: gpr(0), src: gpr(0) }),
            Mnemonic::Csrrd => self.word(Inst::CsrRd {
                dst: gpr(0),
                src: inst.csr.expect("csr presence was checked by the parser"),
            }),
            Mnemonic::Csrwr => self.word(Inst::CsrWr {
                dst: inst.csr.expect("csr presence was checked by the parser"),
                src: gpr(0),
            }),
            Mnemonic::Ld => {
                let dst = gpr(0);
                match operand() {
                    op @ (Operand::Num(_) | Operand::Sym(_)) => {
                        let disp = self.pool_disp(op, no)?;
                        self.word(Inst::Ld { dst, base: Reg::Pc, index: Reg::R0, disp });
                    }
                    op @ (Operand::MemNum(_) | Operand::MemSym(_)) => {
                        // fetch the address from the pool, then dereference
                        let disp = self.pool_disp(op, no)?;
                        self.word(Inst::Ld { dst, base: Reg::Pc, index: Reg::R0, disp });
                        self.word(Inst::Ld { dst, base: dst, index: Reg::R0, disp: 0 });
                    }
                    Operand::MemReg(base) => {
                        self.word(Inst::Ld { dst, base: *base, index: Reg::R0, disp: 0 });
                    }
                    Operand::MemRegOff(base, off) => {
                        let disp = check_range(*off as i64, no)?;
                        self.word(Inst::Ld { dst, base: *base, index: Reg::R0, disp });
                    }
                }
            }
            Mnemonic::St => {
                let src = gpr(0);
                match operand() {
                    Operand::Num(_) | Operand::Sym(_) => {
                        return Err(AsmError::Syntax {
                            line: no,
                            msg: "cannot store to an immediate operand".to_string(),
                        });
                    }
                    op @ (Operand::MemNum(_) | Operand::MemSym(_)) => {
                        let disp = self.pool_disp(op, no)?;
                        self.word(Inst::StInd { base: Reg::Pc, index: Reg::R0, src, disp });
                    }
                    Operand::MemReg(base) => {
                        self.word(Inst::St { base: *base, index: Reg::R0, src, disp: 0 });
                    }
                    Operand::MemRegOff(base, off) => {
                        let disp = check_range(*off as i64, no)?;
                        self.word(Inst::St { base: *base, index: Reg::R0, src, disp });
                    }
                }
            }
        }
        Ok(())
    }

    /// The displacement from the word being emitted to its literal-pool slot.
    /// The program counter has already advanced past the word when the
    /// displacement is applied, hence the `- 4`.
    fn pool_disp(&self, op: &Operand, no: usize) -> Result<i16, AsmError> {
        let pool = self.pools.get(&self.current).ok_or(AsmError::MissingLiteral { line: no })?;
        let slot = match op {
            Operand::Num(v) | Operand::MemNum(v) => pool.num_slot(*v),
            Operand::Sym(s) | Operand::MemSym(s) => pool.sym_slot(s),
            _ => None,
        }
        .ok_or(AsmError::MissingLiteral { line: no })?;
        check_range(slot as i64 - self.cur_off() as i64 - 4, no)
    }
}

fn check_range(value: i64, line: usize) -> Result<i16, AsmError> {
    if value < DISP_MIN as i64 || value > DISP_MAX as i64 {
        return Err(AsmError::OffsetRange { line, value });
    }
    Ok(value as i16)
}

// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_source;

    fn assemble(src: &str) -> Result<ObjectModule, AsmError> {
        let lines = parse_source(src)?;
        let mut asm = Assembler::new();
        asm.first_pass(&lines)?;
        asm.second_pass(&lines)
    }

    fn words(module: &ObjectModule, section: &str) -> Vec<u32> {
        module.sections[section]
            .data
            .chunks(4)
            .map(|c| u32::from_le_bytes(c.try_into().unwrap()))
            .collect()
    }

    #[test]
    fn content_outside_section_is_fatal() {
        let err = assemble("halt\n").unwrap_err();
        assert!(matches!(err, AsmError::OutOfSection { line: 1 }));
        let err = assemble("orphan: .section code\nhalt\n").unwrap_err();
        assert!(matches!(err, AsmError::OutOfSection { line: 1 }));
    }

    #[test]
    fn word_directive_emits_values_and_relocations() {
        let m = assemble(
            ".section data\n\
             local: .word 0x11223344\n\
             .word local, ext\n\
             .extern ext\n",
        )
        .unwrap_err();
        // .extern after the reference already created the symbol
        assert!(matches!(m, AsmError::Redefinition { .. }));

        let m = assemble(
            ".extern ext\n\
             .section data\n\
             local: .word 0x11223344\n\
             .word local, ext\n",
        )
        .unwrap();
        assert_eq!(&m.sections["data"].data[0..4], &[0x44, 0x33, 0x22, 0x11]);
        assert_eq!(&m.sections["data"].data[4..12], &[0; 8]);
        let relas = &m.relas["data"];
        // local relocates through its section, global by name
        assert_eq!(relas[0].offset, 4);
        assert_eq!(relas[0].symbol, "data");
        assert_eq!(relas[0].addend, 0);
        assert_eq!(relas[1].offset, 8);
        assert_eq!(relas[1].symbol, "ext");
        assert_eq!(relas[1].addend, 0);
    }

    #[test]
    fn skip_and_ascii_emit_bytes() {
        let m = assemble(".section data\n.skip 3\n.ascii \"ab\"\n").unwrap();
        assert_eq!(m.sections["data"].data, vec![0, 0, 0, b'a', b'b']);
    }

    #[test]
    fn pool_displacement_matches_contract() {
        let m = assemble(
            ".section code\n\
             ld $0x12345678, %r1\n\
             halt\n",
        )
        .unwrap();
        let ws = words(&m, "code");
        // slot sits at offset 8; the load at 0 encodes 8 - 0 - 4 = 4
        let ld = Inst::decode(ws[0]).unwrap();
        assert_eq!(
            ld,
            Inst::Ld { dst: Reg::R1, base: Reg::Pc, index: Reg::R0, disp: 4 }
        );
        assert_eq!(ws[2], 0x12345678);
    }

    #[test]
    fn forward_branch_displacement_decodes_to_target_slot() {
        let m = assemble(
            ".section code\n\
             jmp end\n\
             halt\n\
             end: halt\n",
        )
        .unwrap();
        let ws = words(&m, "code");
        let Inst::Jmp { disp, .. } = Inst::decode(ws[0]).unwrap() else { panic!() };
        // pc after the jmp word is 4; the slot holding `end` is at 12
        assert_eq!(4 + disp as i64, 12);
        // forward references were promoted to Global placeholders in the
        // first pass, so the slot relocates by name
        let relas = &m.relas["code"];
        assert_eq!(relas[0], Rela { offset: 12, symbol: "end".into(), addend: 0 });
    }

    #[test]
    fn backward_branch_relocates_through_the_section() {
        let m = assemble(
            ".section code\n\
             halt\n\
             mid: halt\n\
             jmp mid\n",
        )
        .unwrap();
        let ws = words(&m, "code");
        let Inst::Jmp { disp, .. } = Inst::decode(ws[2]).unwrap() else { panic!() };
        // jmp word at 8, slot at 12
        assert_eq!(disp, 0);
        assert_eq!(
            m.relas["code"][0],
            Rela { offset: 12, symbol: "code".into(), addend: 4 }
        );
    }

    #[test]
    fn memory_direct_ld_expands_to_fetch_and_deref() {
        let m = assemble(
            ".section code\n\
             ld value, %r1\n\
             halt\n\
             .section data\n\
             value: .word 5\n",
        )
        .unwrap();
        let ws = words(&m, "code");
        assert_eq!(
            Inst::decode(ws[0]).unwrap(),
            Inst::Ld { dst: Reg::R1, base: Reg::Pc, index: Reg::R0, disp: 8 }
        );
        assert_eq!(
            Inst::decode(ws[1]).unwrap(),
            Inst::Ld { dst: Reg::R1, base: Reg::R1, index: Reg::R0, disp: 0 }
        );
    }

    #[test]
    fn register_offset_out_of_range_is_fatal() {
        let err = assemble(".section code\nld [%r1 + 0x800], %r2\n").unwrap_err();
        assert!(matches!(err, AsmError::OffsetRange { value: 0x800, .. }));
        assemble(".section code\nld [%r1 + 0x7ff], %r2\n").unwrap();
        assemble(".section code\nld [%r1 - 2048], %r2\n").unwrap();
    }

    #[test]
    fn add_destination_is_second_register() {
        let m = assemble(".section code\nadd %r1, %r2\nhalt\n").unwrap();
        let ws = words(&m, "code");
        assert_eq!(
            Inst::decode(ws[0]).unwrap(),
            Inst::Add { dst: Reg::R2, lhs: Reg::R2, rhs: Reg::R1 }
        );
    }

    #[test]
    fn sub_subtracts_the_source_from_the_destination() {
        let m = assemble(".section code\nsub %r1, %r2\nhalt\n").unwrap();
        let ws = words(&m, "code");
        assert_eq!(
            Inst::decode(ws[0]).unwrap(),
            Inst::Sub { dst: Reg::R2, lhs: Reg::R2, rhs: Reg::R1 }
        );
    }

    #[test]
    fn sections_are_padded_to_eight_bytes() {
        let m = assemble(
            ".section a\n\
             halt\n\
             .section b\n\
             halt\n",
        )
        .unwrap();
        assert_eq!(m.sections["a"].data.len(), 8);
        // the final section is closed without padding
        assert_eq!(m.sections["b"].data.len(), 4);
    }

    #[test]
    fn global_main_halt_renders_cleanly() {
        let m = assemble(".global main\n.section my_code\nmain: halt\n").unwrap();
        let text = m.render();
        let back = ObjectModule::parse(&text).unwrap();
        assert_eq!(back, m);
        assert_eq!(back.symbols["main"].scope, Scope::Global);
    }
}
