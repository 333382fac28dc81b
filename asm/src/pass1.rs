use arch::obj::{Scope, Section, Symbol, SymbolKind};

use crate::assembler::Assembler;
use crate::error::AsmError;
use crate::parser::{Arg, DirKind, Directive, Instruction, Line, Stmt};

// First pass: walk the lines once, assign every symbol its
// (section, offset) and grow the section sizes. Nothing is emitted.

impl Assembler {
    pub fn first_pass(&mut self, lines: &[Line]) -> Result<(), AsmError> {
        for line in lines {
            if let Some(label) = &line.label {
                self.define_label(label, line.no)?;
            }
            match &line.stmt {
                None => {}
                Some(Stmt::Directive(dir)) => {
                    if dir.kind == DirKind::End {
                        break;
                    }
                    self.first_pass_directive(dir, line.no)?;
                }
                Some(Stmt::Instruction(inst)) => {
                    self.lc += Self::encoded_size(inst);
                    self.register_literals(inst);
                }
            }
        }
        self.close_pool();
        Ok(())
    }

    fn first_pass_directive(&mut self, dir: &Directive, no: usize) -> Result<(), AsmError> {
        let bad_arg = |arg: &Arg| AsmError::Syntax {
            line: no,
            msg: format!("invalid directive argument {arg:?}"),
        };
        match dir.kind {
            DirKind::Global | DirKind::Extern => {
                for arg in &dir.args {
                    match arg {
                        Arg::Sym(name) => self.declare_global(name, no)?,
                        other => return Err(bad_arg(other)),
                    }
                }
            }
            DirKind::Section => match &dir.args[0] {
                Arg::Sym(name) => self.open_section(name, no)?,
                other => return Err(bad_arg(other)),
            },
            DirKind::Word => {
                for arg in &dir.args {
                    match arg {
                        Arg::Num(_) => {}
                        Arg::Sym(name) => self.touch_symbol(name),
                        other => return Err(bad_arg(other)),
                    }
                }
                self.lc += 4 * dir.args.len() as u32;
            }
            DirKind::Skip => match dir.args[0] {
                Arg::Num(n) => self.lc += n,
                ref other => return Err(bad_arg(other)),
            },
            DirKind::Ascii => match &dir.args[0] {
                Arg::Str(s) => self.lc += s.len() as u32,
                other => return Err(bad_arg(other)),
            },
            DirKind::End => unreachable!("handled by the caller"),
        }
        Ok(())
    }

    fn open_section(&mut self, name: &str, no: usize) -> Result<(), AsmError> {
        if self.in_section() {
            self.close_pool();
            // keep section starts 8-aligned
            self.lc = (self.lc + 7) & !7;
        }
        if self.symbols.contains_key(name) {
            return Err(AsmError::Redefinition { line: no, name: name.to_string() });
        }
        self.symbols.insert(
            name.to_string(),
            Symbol {
                value: 0,
                size: 0,
                kind: SymbolKind::Section,
                scope: Scope::Local,
                section: name.to_string(),
            },
        );
        self.sections
            .insert(name.to_string(), Section { base: self.lc, address: 0, data: vec![] });
        self.current = name.to_string();
        Ok(())
    }

    /// Append the open section's pending literal slots to the location
    /// counter and fix their offsets.
    fn close_pool(&mut self) {
        if !self.in_section() {
            return;
        }
        let content = self.lc - self.cur_base();
        if let Some(pool) = self.pools.get_mut(&self.current) {
            pool.close(content);
            self.lc += 4 * pool.slot_count();
        }
    }

    fn register_literals(&mut self, inst: &Instruction) {
        use crate::parser::Operand;
        match &inst.operand {
            Some(Operand::Num(v)) | Some(Operand::MemNum(v)) => {
                self.pool_mut().add_num(*v);
            }
            Some(Operand::Sym(s)) | Some(Operand::MemSym(s)) => {
                self.touch_symbol(s);
                self.pool_mut().add_sym(s);
            }
            _ => {}
        }
    }
}

// ----------------------------------------------------------------------------
