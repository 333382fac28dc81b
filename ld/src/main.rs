use arch::obj::ObjectModule;
use clap::Parser;
use color_print::cprintln;
use sxld::linker::Linker;
use sxld::LinkError;

const HELP_TEMPLATE: &str = "\
{before-help}{bin} {version}
  {about}

{usage-heading}
{tab}{usage}

{all-args}{after-help}";

#[derive(Debug, clap::Parser)]
#[clap(version, about = "Linker for the SX32 ISA", help_template = HELP_TEMPLATE)]
struct Args {
    /// Input object modules, merged in argument order
    #[clap(required = true)]
    inputs: Vec<String>,

    /// Output file
    #[clap(short, long)]
    output: String,

    /// Pin a section to an address, e.g. --place=my_code@0x40000000
    #[clap(long = "place", value_name = "SECTION@HEXADDR")]
    places: Vec<String>,

    /// Produce an addressed memory image
    #[clap(long, conflicts_with = "relocatable")]
    hex: bool,

    /// Produce a merged relocatable module
    #[clap(long)]
    relocatable: bool,
}

fn parse_place(arg: &str) -> Result<(String, u32), String> {
    let (name, addr) = arg
        .split_once('@')
        .ok_or_else(|| format!("expected SECTION@HEXADDR, got `{arg}`"))?;
    let digits = addr.strip_prefix("0x").unwrap_or(addr);
    let addr = u32::from_str_radix(digits, 16)
        .map_err(|_| format!("invalid address `{addr}` in `{arg}`"))?;
    Ok((name.to_string(), addr))
}

fn run(args: &Args, places: &[(String, u32)]) -> Result<(), LinkError> {
    let mut linker = Linker::new();
    for (name, addr) in places {
        linker.place(name, *addr);
    }

    for path in &args.inputs {
        let text = std::fs::read_to_string(path)
            .map_err(|e| LinkError::FileOpen(path.clone(), e))?;
        let module =
            ObjectModule::parse(&text).map_err(|e| LinkError::Object(path.clone(), e))?;
        linker.add_module(module)?;
    }

    for (name, _) in places {
        if !linker.has_section(name) {
            cprintln!("<yellow,bold>warning</>: placed section `{}` does not exist", name);
        }
    }

    let output = if args.relocatable {
        linker.into_module().render()
    } else {
        linker.check_resolved()?;
        linker.map_sections()?;
        linker.finalize_symbols();
        linker.relocate()?;
        linker.into_image().render()
    };
    std::fs::write(&args.output, output).map_err(|e| LinkError::FileWrite(args.output.clone(), e))
}

fn main() {
    let args = Args::parse();
    if !args.hex && !args.relocatable {
        cprintln!("<red,bold>error</>: one of --hex and --relocatable is required");
        std::process::exit(1);
    }

    let mut places = Vec::new();
    for arg in &args.places {
        match parse_place(arg) {
            Ok(place) => places.push(place),
            Err(msg) => {
                cprintln!("<red,bold>error</>: {}", msg);
                std::process::exit(1);
            }
        }
    }

    if let Err(e) = run(&args, &places) {
        cprintln!("<red,bold>error</>: {}", e);
        std::process::exit(1);
    }
}
