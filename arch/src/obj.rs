use indexmap::IndexMap;
use std::fmt::Write as _;
use strum::{Display, EnumString};
use thiserror::Error;

/// Sentinel section of symbols that are declared but not yet defined.
pub const UND: &str = "UND";
/// Synthetic section active before the first `.section` directive.
pub const ABS: &str = "ABS";

// ----------------------------------------------------------------------------
// Tables

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display)]
pub enum SymbolKind {
    #[strum(serialize = "NOTYPE")]
    NoType,
    #[strum(serialize = "SECTION")]
    Section,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display)]
pub enum Scope {
    #[strum(serialize = "LOCAL")]
    Local,
    #[strum(serialize = "GLOBAL")]
    Global,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    /// Section-relative until the linker assigns section addresses.
    pub value: u32,
    pub size: u16,
    pub kind: SymbolKind,
    pub scope: Scope,
    pub section: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Section {
    /// Offset of the section within the module's assembly-time layout.
    pub base: u32,
    /// Absolute address, assigned by the linker.
    pub address: u32,
    pub data: Vec<u8>,
}

impl Section {
    pub fn size(&self) -> u32 {
        self.data.len() as u32
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rela {
    /// Byte offset within the owning section.
    pub offset: u32,
    pub symbol: String,
    pub addend: u32,
}

/// One relocatable object module: what the assembler writes and the linker
/// reads back. Table iteration order is first-insertion order throughout.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectModule {
    pub symbols: IndexMap<String, Symbol>,
    pub sections: IndexMap<String, Section>,
    pub relas: IndexMap<String, Vec<Rela>>,
}

// ----------------------------------------------------------------------------
// Text format
//
// #.symtab
// <value:08x> <size> <NOTYPE|SECTION> <LOCAL|GLOBAL> <section> <name>
// #.<section>
// <hex byte pairs, 16 per row>
// #.rela.<section>
// <offset:08x> <symbol> <addend>

#[derive(Debug, Error)]
pub enum ObjError {
    #[error("line {0}: malformed symbol table entry")]
    BadSymbol(usize),

    #[error("line {0}: malformed relocation entry")]
    BadRela(usize),

    #[error("line {0}: malformed byte `{1}`")]
    BadByte(usize, String),

    #[error("line {0}: content before a `#.` region header")]
    NoRegion(usize),
}

enum Region {
    Symtab,
    Section(String),
    Rela(String),
}

impl ObjectModule {
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str("#.symtab\n");
        for (name, sym) in &self.symbols {
            let _ = writeln!(
                out,
                "{:08x} {:<5} {:<7} {:<6} {:<12} {}",
                sym.value, sym.size, sym.kind, sym.scope, sym.section, name
            );
        }
        for (name, sec) in &self.sections {
            let _ = writeln!(out, "#.{}", name);
            for row in sec.data.chunks(16) {
                let row: Vec<String> = row.iter().map(|b| format!("{:02x}", b)).collect();
                let _ = writeln!(out, "{}", row.join(" "));
            }
            match self.relas.get(name) {
                None => {}
                Some(relas) if relas.is_empty() => {}
                Some(relas) => {
                    let _ = writeln!(out, "#.rela.{}", name);
                    for r in relas {
                        let _ = writeln!(out, "{:08x} {:<12} {}", r.offset, r.symbol, r.addend);
                    }
                }
            }
        }
        out
    }

    pub fn parse(text: &str) -> Result<Self, ObjError> {
        let mut module = ObjectModule::default();
        let mut region: Option<Region> = None;
        for (idx, line) in text.lines().enumerate() {
            let no = idx + 1;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if let Some(name) = line.strip_prefix("#.") {
                region = Some(if name == "symtab" {
                    Region::Symtab
                } else if let Some(sect) = name.strip_prefix("rela.") {
                    module.relas.entry(sect.to_string()).or_default();
                    Region::Rela(sect.to_string())
                } else {
                    module.sections.entry(name.to_string()).or_default();
                    Region::Section(name.to_string())
                });
                continue;
            }
            match region.as_ref().ok_or(ObjError::NoRegion(no))? {
                Region::Symtab => {
                    let cols: Vec<&str> = line.split_whitespace().collect();
                    let [value, size, kind, scope, section, name] = cols[..] else {
                        return Err(ObjError::BadSymbol(no));
                    };
                    let sym = Symbol {
                        value: u32::from_str_radix(value, 16)
                            .map_err(|_| ObjError::BadSymbol(no))?,
                        size: size.parse().map_err(|_| ObjError::BadSymbol(no))?,
                        kind: kind.parse().map_err(|_| ObjError::BadSymbol(no))?,
                        scope: scope.parse().map_err(|_| ObjError::BadSymbol(no))?,
                        section: section.to_string(),
                    };
                    module.symbols.insert(name.to_string(), sym);
                }
                Region::Section(name) => {
                    let sec = module.sections.get_mut(name).expect("region was inserted");
                    for tok in line.split_whitespace() {
                        let byte = u8::from_str_radix(tok, 16)
                            .map_err(|_| ObjError::BadByte(no, tok.to_string()))?;
                        sec.data.push(byte);
                    }
                }
                Region::Rela(name) => {
                    let cols: Vec<&str> = line.split_whitespace().collect();
                    let [offset, symbol, addend] = cols[..] else {
                        return Err(ObjError::BadRela(no));
                    };
                    let rela = Rela {
                        offset: u32::from_str_radix(offset, 16)
                            .map_err(|_| ObjError::BadRela(no))?,
                        symbol: symbol.to_string(),
                        addend: addend.parse().map_err(|_| ObjError::BadRela(no))?,
                    };
                    module.relas.get_mut(name).expect("region was inserted").push(rela);
                }
            }
        }
        Ok(module)
    }
}

// ----------------------------------------------------------------------------
