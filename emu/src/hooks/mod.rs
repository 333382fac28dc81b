pub mod dump;
pub mod trace;

use crate::machine::{Machine, Step};

/// Side effects attached to the main loop: each hook sees every executed
/// instruction and the machine state after it.
pub trait Hook {
    fn init(&mut self) {}
    fn exec(&mut self, time: u64, step: &Step, machine: &Machine);
}
