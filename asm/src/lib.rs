pub mod assembler;
pub mod error;
pub mod parser;
mod pass1;
mod pass2;
pub mod pool;

pub use assembler::Assembler;
pub use error::AsmError;

use arch::obj::ObjectModule;

/// Assemble one source file into a relocatable object module.
pub fn assemble(source: &str) -> Result<ObjectModule, AsmError> {
    let lines = parser::parse_source(source)?;
    let mut asm = Assembler::new();
    asm.first_pass(&lines)?;
    asm.second_pass(&lines)
}
