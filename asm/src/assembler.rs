use arch::obj::{Rela, Scope, Section, Symbol, SymbolKind, ABS, UND};
use indexmap::IndexMap;

use crate::error::AsmError;
use crate::parser::{Instruction, Operand};
use crate::pool::LiteralPool;

/// Two-pass assembler session. All tables are owned here so repeated
/// invocations never share state.
#[derive(Debug, Default)]
pub struct Assembler {
    pub symbols: IndexMap<String, Symbol>,
    pub sections: IndexMap<String, Section>,
    pub relas: IndexMap<String, Vec<Rela>>,
    pub(crate) pools: IndexMap<String, LiteralPool>,
    pub(crate) current: String,
    pub(crate) lc: u32,
}

impl Assembler {
    pub fn new() -> Self {
        Assembler { current: ABS.to_string(), ..Default::default() }
    }

    pub(crate) fn in_section(&self) -> bool {
        self.current != ABS
    }

    pub(crate) fn cur_base(&self) -> u32 {
        self.sections.get(&self.current).map(|s| s.base).unwrap_or(0)
    }

    /// Section-relative offset of the next byte to be emitted (pass two).
    pub(crate) fn cur_off(&self) -> u32 {
        self.sections.get(&self.current).map(|s| s.size()).unwrap_or(0)
    }

    pub(crate) fn pool_mut(&mut self) -> &mut LiteralPool {
        self.pools.entry(self.current.clone()).or_default()
    }

    /// `.global` / `.extern`: register as Global + UND, reject existing names.
    pub(crate) fn declare_global(&mut self, name: &str, line: usize) -> Result<(), AsmError> {
        if self.symbols.contains_key(name) {
            return Err(AsmError::Redefinition { line, name: name.to_string() });
        }
        self.symbols.insert(
            name.to_string(),
            Symbol {
                value: 0,
                size: 0,
                kind: SymbolKind::NoType,
                scope: Scope::Global,
                section: UND.to_string(),
            },
        );
        Ok(())
    }

    /// Forward-reference placeholder for a symbol used before it is defined.
    pub(crate) fn touch_symbol(&mut self, name: &str) {
        if !self.symbols.contains_key(name) {
            self.symbols.insert(
                name.to_string(),
                Symbol {
                    value: 0,
                    size: 0,
                    kind: SymbolKind::NoType,
                    scope: Scope::Global,
                    section: UND.to_string(),
                },
            );
        }
    }

    /// Bind a label to the current location. An existing UND entry (from
    /// `.global`, `.extern` or a forward reference) is filled in; an existing
    /// definition is a redefinition error.
    pub(crate) fn define_label(&mut self, name: &str, line: usize) -> Result<(), AsmError> {
        let value = self.lc - self.cur_base();
        let section = self.current.clone();
        match self.symbols.get_mut(name) {
            Some(sym) if sym.section != UND => {
                Err(AsmError::Redefinition { line, name: name.to_string() })
            }
            Some(sym) => {
                sym.value = value;
                sym.section = section;
                Ok(())
            }
            None => {
                self.symbols.insert(
                    name.to_string(),
                    Symbol {
                        value,
                        size: 0,
                        kind: SymbolKind::NoType,
                        scope: Scope::Local,
                        section,
                    },
                );
                Ok(())
            }
        }
    }

    /// Bytes the instruction occupies: one word, except `iret` and the
    /// memory-direct `ld` forms which expand to two.
    pub(crate) fn encoded_size(inst: &Instruction) -> u32 {
        use arch::op::Mnemonic;
        match inst.mnemonic {
            Mnemonic::Iret => 8,
            Mnemonic::Ld => match inst.operand {
                Some(Operand::MemNum(_)) | Some(Operand::MemSym(_)) => 8,
                _ => 4,
            },
            _ => 4,
        }
    }
}
