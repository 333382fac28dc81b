use color_print::cprintln;

use super::Hook;
use crate::machine::{Machine, Step};

/// Disassembly trace of every executed instruction.
pub struct Trace;

impl Hook for Trace {
    fn init(&mut self) {
        println!(" * Trace");
    }

    fn exec(&mut self, _time: u64, step: &Step, _machine: &Machine) {
        cprintln!(
            "<green>{:08X}</> | {:02x} {:02x} {:02x} {:02x} | {}",
            step.addr,
            step.word & 0xFF,
            (step.word >> 8) & 0xFF,
            (step.word >> 16) & 0xFF,
            (step.word >> 24) & 0xFF,
            step.inst.cformat()
        );
    }
}
