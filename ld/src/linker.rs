use arch::image::MemoryImage;
use arch::obj::{ObjectModule, Scope, Symbol, SymbolKind, UND};
use indexmap::IndexMap;

use crate::error::LinkError;

/// First address of the memory-mapped I/O region; no section may reach it.
pub const MMIO_BASE: u32 = 0xFFFF_FF00;

/// Linker session: modules are merged in the order they are added, then the
/// sections are placed, symbol values made absolute and relocations patched.
#[derive(Debug, Default)]
pub struct Linker {
    pub symbols: IndexMap<String, Symbol>,
    pub sections: IndexMap<String, arch::obj::Section>,
    pub relas: IndexMap<String, Vec<arch::obj::Rela>>,
    places: IndexMap<String, u32>,
}

impl Linker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pin a section to an absolute address.
    pub fn place(&mut self, section: &str, address: u32) {
        self.places.insert(section.to_string(), address);
    }

    pub fn has_section(&self, name: &str) -> bool {
        self.sections.contains_key(name)
    }

    /// Merge one module: same-named sections are concatenated in link order,
    /// with the module's symbol values, relocation offsets and
    /// section-relative addends shifted by the bytes accumulated so far.
    pub fn add_module(&mut self, module: ObjectModule) -> Result<(), LinkError> {
        let mut shift: IndexMap<&str, u32> = IndexMap::new();
        for (name, sec) in &module.sections {
            let prior = self.sections.get(name).map(|s| s.size()).unwrap_or(0);
            shift.insert(name, prior);
            self.sections.entry(name.clone()).or_default().data.extend_from_slice(&sec.data);
        }

        for (name, mut sym) in module.symbols {
            if sym.section != UND {
                sym.value += shift.get(sym.section.as_str()).copied().unwrap_or(0);
            }
            self.add_symbol(name, sym)?;
        }

        for (name, relas) in module.relas {
            let base = shift.get(name.as_str()).copied().unwrap_or(0);
            let merged = self.relas.entry(name).or_default();
            for mut rela in relas {
                rela.offset += base;
                // a relocation through a section symbol addresses that
                // section's coordinates, which just moved as well
                if let Some(s) = shift.get(rela.symbol.as_str()) {
                    rela.addend += s;
                }
                merged.push(rela);
            }
        }
        Ok(())
    }

    /// First definition wins; section entries never override; two definitions
    /// or any cross-module collision on a local symbol are fatal.
    fn add_symbol(&mut self, name: String, sym: Symbol) -> Result<(), LinkError> {
        let Some(existing) = self.symbols.get_mut(&name) else {
            self.symbols.insert(name, sym);
            return Ok(());
        };
        if sym.kind == SymbolKind::Section && existing.kind == SymbolKind::Section {
            return Ok(());
        }
        if sym.kind == SymbolKind::Section || existing.kind == SymbolKind::Section {
            return Err(LinkError::Redefinition(name));
        }
        if sym.scope == Scope::Local || existing.scope == Scope::Local {
            return Err(LinkError::LocalCollision(name));
        }
        match (existing.section != UND, sym.section != UND) {
            (true, true) => Err(LinkError::Redefinition(name)),
            (false, true) => {
                *existing = sym;
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Every symbol must have found a definition by the end of the parse.
    pub fn check_resolved(&self) -> Result<(), LinkError> {
        for (name, sym) in &self.symbols {
            if sym.section == UND {
                return Err(LinkError::Unresolved(name.clone()));
            }
        }
        Ok(())
    }

    /// Assign absolute addresses: pinned sections first (their ranges must
    /// not overlap), then the rest packed after the highest pinned end, in
    /// first-encountered order.
    pub fn map_sections(&mut self) -> Result<(), LinkError> {
        let mut ranges: Vec<(String, u64, u64)> = Vec::new();
        for (name, &addr) in &self.places {
            let Some(sec) = self.sections.get_mut(name) else {
                continue;
            };
            sec.address = addr;
            let start = addr as u64;
            let end = start + sec.size() as u64;
            for (other, ostart, oend) in &ranges {
                if start < *oend && *ostart < end {
                    return Err(LinkError::PlacementCollision(
                        other.clone(),
                        name.clone(),
                        start.max(*ostart) as u32,
                    ));
                }
            }
            ranges.push((name.clone(), start, end));
        }

        let mut next = ranges.iter().map(|(_, _, end)| *end).max().unwrap_or(0);
        for (name, sec) in self.sections.iter_mut() {
            if self.places.contains_key(name) {
                continue;
            }
            sec.address = next as u32;
            next += sec.size() as u64;
        }

        for (name, sec) in &self.sections {
            let end = sec.address as u64 + sec.size() as u64;
            if end > MMIO_BASE as u64 {
                return Err(LinkError::ReservedRegion(name.clone(), end as u32, MMIO_BASE));
            }
        }
        Ok(())
    }

    /// Rewrite symbol values from section-relative to absolute.
    pub fn finalize_symbols(&mut self) {
        for sym in self.symbols.values_mut() {
            if let Some(sec) = self.sections.get(&sym.section) {
                sym.value += sec.address;
            }
        }
    }

    /// Patch every relocation: 4 little-endian bytes of symbol value + addend.
    pub fn relocate(&mut self) -> Result<(), LinkError> {
        for (name, relas) in &self.relas {
            let Some(sec) = self.sections.get_mut(name) else {
                continue;
            };
            for rela in relas {
                let sym = self
                    .symbols
                    .get(&rela.symbol)
                    .ok_or_else(|| LinkError::Unresolved(rela.symbol.clone()))?;
                let end = rela.offset as usize + 4;
                if end > sec.data.len() {
                    return Err(LinkError::RelocationRange(name.clone(), rela.offset));
                }
                let value = sym.value.wrapping_add(rela.addend);
                sec.data[rela.offset as usize..end].copy_from_slice(&value.to_le_bytes());
            }
        }
        Ok(())
    }

    pub fn into_image(self) -> MemoryImage {
        let mut image = MemoryImage::default();
        for sec in self.sections.values() {
            image.insert(sec.address, &sec.data);
        }
        image
    }

    pub fn into_module(self) -> ObjectModule {
        ObjectModule { symbols: self.symbols, sections: self.sections, relas: self.relas }
    }
}

/// Merge, place, resolve and patch into a memory image.
pub fn link_hex(
    modules: Vec<ObjectModule>,
    places: &[(String, u32)],
) -> Result<MemoryImage, LinkError> {
    let mut linker = Linker::new();
    for (name, addr) in places {
        linker.place(name, *addr);
    }
    for module in modules {
        linker.add_module(module)?;
    }
    linker.check_resolved()?;
    linker.map_sections()?;
    linker.finalize_symbols();
    linker.relocate()?;
    Ok(linker.into_image())
}

/// Merge only: a partial link producing another relocatable module.
/// Undefined symbols may survive for a later link step.
pub fn link_relocatable(modules: Vec<ObjectModule>) -> Result<ObjectModule, LinkError> {
    let mut linker = Linker::new();
    for module in modules {
        linker.add_module(module)?;
    }
    Ok(linker.into_module())
}

// ----------------------------------------------------------------------------
