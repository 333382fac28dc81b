use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;

use serde::{Deserialize, Serialize};

use super::Hook;
use crate::error::EmuError;
use crate::machine::{Machine, Step};

/// Register/memory dumps at configured program counter values.
#[derive(Debug)]
pub struct Dump {
    file: Option<String>,
    all: bool,
    list: List,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct List(HashMap<u32, Config>);

#[derive(Debug, Serialize, Deserialize)]
struct Config {
    #[serde(default)]
    csr: bool,
    #[serde(default)]
    mem: Vec<u32>,
}

impl Dump {
    pub fn arg(file: Option<String>, all: bool) -> Result<Self, EmuError> {
        let list = match &file {
            Some(fname) => {
                let file = File::open(fname)
                    .map_err(|e| EmuError::FileOpen(fname.clone(), e))?;
                serde_yaml::from_reader(BufReader::new(file))
                    .map_err(|e| EmuError::DumpConfig(e.to_string()))?
            }
            None => List::default(),
        };
        Ok(Self { file, all, list })
    }
}

impl Hook for Dump {
    fn init(&mut self) {
        if self.all {
            println!(" * Dump all");
        }
        if let Some(fname) = &self.file {
            println!(" * Dump[{}] {:?}", self.list.0.len(), fname);
        }
    }

    fn exec(&mut self, _time: u64, step: &Step, machine: &Machine) {
        if let Some(cfg) = self.list.0.get(&step.addr) {
            print_registers(machine);
            if cfg.csr {
                print_csr(machine);
            }
            print_mem(machine, &cfg.mem);
        } else if self.all {
            print_registers(machine);
        }
    }
}

pub fn print_registers(machine: &Machine) {
    println!(" +---------------+---------------+---------------+---------------+");
    for row in 0..4 {
        let cell = |i: usize| {
            let name = if i == 14 {
                "sp".to_string()
            } else if i == 15 {
                "pc".to_string()
            } else {
                format!("r{}", i)
            };
            format!("{:>4}: {:08X}", name, machine.gpr[i])
        };
        println!(
            " | {} | {} | {} | {} |",
            cell(row),
            cell(row + 4),
            cell(row + 8),
            cell(row + 12)
        );
    }
    println!(" +---------------+---------------+---------------+---------------+");
}

pub fn print_csr(machine: &Machine) {
    println!(
        " | status: {:08X} | handler: {:08X} | cause: {:08X} |",
        machine.csr[0], machine.csr[1], machine.csr[2]
    );
    println!(" +---------------------------------------------------------------+");
}

fn print_mem(machine: &Machine, addrs: &[u32]) {
    for addr in addrs {
        println!(" | {:08X} : {:08X} |", addr, machine.read_u32(*addr));
    }
    if !addrs.is_empty() {
        println!(" +---------------------------------+");
    }
}
