use clap::Parser;
use color_print::cprintln;

const HELP_TEMPLATE: &str = "\
{before-help}{bin} {version}
  {about}

{usage-heading}
{tab}{usage}

{all-args}{after-help}";

#[derive(Debug, clap::Parser)]
#[clap(version, about = "Assembler for the SX32 ISA", help_template = HELP_TEMPLATE)]
struct Args {
    /// Input source file
    input: String,

    /// Output object module
    #[clap(short, long, default_value = "out.o")]
    output: String,

    /// Dump the symbol and section tables
    #[clap(short, long)]
    dump: bool,
}

fn main() {
    let args = Args::parse();

    let source = match std::fs::read_to_string(&args.input) {
        Ok(s) => s,
        Err(e) => {
            cprintln!("<red,bold>error</>: failed to open file: {} ({})", args.input, e);
            std::process::exit(1);
        }
    };

    let module = match sxasm::assemble(&source) {
        Ok(m) => m,
        Err(e) => {
            e.diag(&args.input, &source);
            std::process::exit(1);
        }
    };

    if args.dump {
        println!("#.symtab");
        for (name, sym) in &module.symbols {
            cprintln!(
                "<green>{:08x}</> {:<7} {:<6} {:<12} <bold>{}</>",
                sym.value,
                sym.kind,
                sym.scope,
                sym.section,
                name
            );
        }
        for (name, sec) in &module.sections {
            cprintln!("<blue>#.{}</> {} bytes", name, sec.size());
        }
    }

    if let Err(e) = std::fs::write(&args.output, module.render()) {
        cprintln!("<red,bold>error</>: failed to write file: {} ({})", args.output, e);
        std::process::exit(1);
    }
}
