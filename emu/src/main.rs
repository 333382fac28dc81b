use arch::image::MemoryImage;
use clap::Parser;
use color_print::cprintln;
use sxemu::hooks::dump::{print_registers, Dump};
use sxemu::hooks::trace::Trace;
use sxemu::hooks::Hook;
use sxemu::{EmuError, Machine};

const HELP_TEMPLATE: &str = "\
{before-help}{bin} {version}
  {about}

{usage-heading}
{tab}{usage}

{all-args}{after-help}";

#[derive(Debug, clap::Parser)]
#[clap(version, about = "Emulator for the SX32 ISA", help_template = HELP_TEMPLATE)]
struct Args {
    /// Input memory image
    input: String,

    /// Trace executed instructions
    #[clap(short, long)]
    trace: bool,

    /// Dump registers at configured pc values (YAML)
    #[clap(short, long)]
    dump_cfg: Option<String>,

    /// Dump registers after every instruction
    #[clap(short = 'a', long)]
    dump_all: bool,

    /// Stop after this many instructions
    #[clap(long)]
    tmax: Option<u64>,
}

fn run(args: &Args) -> Result<Machine, EmuError> {
    let text = std::fs::read_to_string(&args.input)
        .map_err(|e| EmuError::FileOpen(args.input.clone(), e))?;
    let image = MemoryImage::parse(&text)?;
    let mut machine = Machine::load(image);

    let mut hooks: Vec<Box<dyn Hook>> = Vec::new();
    if args.trace {
        hooks.push(Box::new(Trace));
    }
    if args.dump_cfg.is_some() || args.dump_all {
        hooks.push(Box::new(Dump::arg(args.dump_cfg.clone(), args.dump_all)?));
    }
    for hook in &mut hooks {
        hook.init();
    }

    for time in 0..args.tmax.unwrap_or(u64::MAX) {
        let step = machine.step()?;
        for hook in &mut hooks {
            hook.exec(time, &step, &machine);
        }
        if machine.halted {
            break;
        }
    }
    Ok(machine)
}

fn main() {
    let args = Args::parse();
    println!("+-----------------------------------------------+");
    println!("| {:<45} |", args.input);
    println!("+-----------------------------------------------+");

    match run(&args) {
        Ok(machine) => {
            if machine.halted {
                println!("Emulated processor executed halt instruction");
            } else {
                println!("Emulated processor stopped at the step limit");
            }
            println!("Emulated processor state:");
            print_registers(&machine);
        }
        Err(e) => {
            cprintln!("<red,bold>error</>: {}", e);
            std::process::exit(1);
        }
    }
}
