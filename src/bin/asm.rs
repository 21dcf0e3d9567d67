//! Assembler front-end
//!
//! Reads a mnemonic source file and writes the raw binary image, with
//! an optional listing of labels and symbols.

use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;

use acc8::asm::{AsmError, Assembler};

#[derive(Parser)]
#[command(name = "acc8-asm", about = "Assembler for the acc8 machine", version)]
struct Args {
    /// Assembly source file
    input: PathBuf,

    /// Output binary file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output listing file (labels and symbols)
    #[arg(short, long)]
    listing: Option<PathBuf>,

    /// Pre-define a symbol, e.g. --define UART=0x8000
    #[arg(short = 'D', long = "define", value_name = "NAME=VALUE")]
    defines: Vec<String>,

    /// Print the listing to stdout as well
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let source = fs::read_to_string(&args.input)
        .with_context(|| format!("cannot open {}", args.input.display()))?;

    let mut assembler = Assembler::new();
    for define in &args.defines {
        let (name, value) = parse_define(define)?;
        if !assembler.define_symbol(&name, value) {
            bail!("symbol table full at {}", name);
        }
    }

    let filename = args.input.display().to_string();
    let output = match assembler.assemble(&source, &filename) {
        Ok(output) => output,
        Err(AsmError::Failed { errors }) => {
            // Individual errors were already reported as they occurred
            bail!("assembly failed with {} error(s)", errors.len());
        }
    };

    println!(
        "assembled {} bytes at 0x{:04X}",
        output.image.len(),
        output.origin
    );

    if let Some(path) = &args.output {
        fs::write(path, &output.image)
            .with_context(|| format!("cannot write {}", path.display()))?;
        println!("binary written to {}", path.display());
    }
    if let Some(path) = &args.listing {
        fs::write(path, output.listing())
            .with_context(|| format!("cannot write {}", path.display()))?;
        println!("listing written to {}", path.display());
    }
    if args.verbose {
        print!("{}", output.listing());
    }

    Ok(())
}

/// Parse `NAME=VALUE` where VALUE accepts decimal, `0x` hex or `$` hex
fn parse_define(define: &str) -> Result<(String, u16)> {
    let Some((name, value)) = define.split_once('=') else {
        bail!("bad --define '{}': expected NAME=VALUE", define);
    };
    let value = parse_number(value)
        .with_context(|| format!("bad --define value in '{}'", define))?;
    Ok((name.to_string(), value))
}

fn parse_number(text: &str) -> Result<u16> {
    let text = text.trim();
    let parsed = if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        u16::from_str_radix(hex, 16)
    } else if let Some(hex) = text.strip_prefix('$') {
        u16::from_str_radix(hex, 16)
    } else {
        text.parse()
    };
    parsed.with_context(|| format!("invalid number '{}'", text))
}
