//! Simulator front-end
//!
//! Loads a binary image and either runs it to completion (batch mode)
//! or drops into the interactive monitor.

use std::fs;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use acc8::disasm;
use acc8::Machine;

/// Default cycle cap for batch runs
const DEFAULT_BATCH_CYCLES: u64 = 1_000_000;

#[derive(Parser)]
#[command(name = "acc8-sim", about = "Simulator for the acc8 machine", version)]
struct Args {
    /// Binary program image to load
    program: Option<PathBuf>,

    /// Load address
    #[arg(short, long, value_parser = parse_number, default_value = "0x0200")]
    addr: u16,

    /// Run the program immediately instead of entering the monitor
    #[arg(short, long)]
    run: bool,

    /// Nominal clock frequency in Hz (0 = unthrottled)
    #[arg(short, long, value_parser = parse_number_u32, default_value = "0")]
    freq: u32,

    /// Enable instruction tracing
    #[arg(short, long)]
    trace: bool,

    /// Set a breakpoint
    #[arg(short, long, value_parser = parse_number)]
    breakpoint: Option<u16>,

    /// Set a watchpoint
    #[arg(short, long, value_parser = parse_number)]
    watchpoint: Option<u16>,

    /// Cycle cap for batch runs
    #[arg(short, long, value_parser = parse_number_u64)]
    cycles: Option<u64>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut machine = Machine::new();
    machine.set_frequency(args.freq);

    if let Some(program) = &args.program {
        let image =
            fs::read(program).with_context(|| format!("cannot open {}", program.display()))?;
        machine
            .load(&image, args.addr)
            .with_context(|| format!("cannot load {}", program.display()))?;
        println!(
            "loaded {} ({} bytes) at 0x{:04X}",
            program.display(),
            image.len(),
            args.addr
        );
    }

    if args.run {
        machine.warm_reset(args.addr);
        // Debug options apply after the reset so they survive it
        machine.set_trace(args.trace);
        if let Some(bp) = args.breakpoint {
            machine.set_breakpoint(bp);
        }
        if let Some(wp) = args.watchpoint {
            machine.set_watchpoint(wp);
        }

        let reason = machine.run(args.cycles.unwrap_or(DEFAULT_BATCH_CYCLES));
        println!("stopped: {}", reason);
        print_status(&machine);
    } else {
        machine.set_trace(args.trace);
        if let Some(bp) = args.breakpoint {
            machine.set_breakpoint(bp);
        }
        if let Some(wp) = args.watchpoint {
            machine.set_watchpoint(wp);
        }
        monitor(&mut machine)?;
    }

    Ok(())
}

// ========== Interactive monitor ==========

fn monitor(machine: &mut Machine) -> Result<()> {
    println!("acc8 monitor; type 'help' for commands");
    let stdin = io::stdin();
    loop {
        print!("cpu> ");
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            return Ok(());
        }
        let words: Vec<&str> = line.split_whitespace().collect();
        let Some(&command) = words.first() else {
            continue;
        };

        match command {
            "quit" | "q" => return Ok(()),
            "help" => print_help(),
            "step" | "s" => {
                match machine.step() {
                    Some(reason) => println!("stopped: {}", reason),
                    None => {}
                }
                print_status(machine);
            }
            "run" | "r" => {
                let cycles = words.get(1).map(|w| number_or_zero(w)).unwrap_or(0);
                let reason = machine.run(cycles);
                println!("stopped: {}", reason);
                print_status(machine);
            }
            "stop" => {
                machine.stop();
                println!("execution stopped");
            }
            "reset" => {
                machine.reset();
                println!("machine reset");
            }
            "regs" => print_registers(machine),
            "flags" => print_flags(machine),
            "status" => print_status(machine),
            "mem" => match parse_addr_size(&words, 16) {
                Some((addr, size)) => dump_memory(machine, addr, size),
                None => println!("usage: mem ADDRESS [SIZE]"),
            },
            "disasm" => match parse_addr_size(&words, 16) {
                Some((addr, size)) => dump_disasm(machine, addr, size),
                None => println!("usage: disasm ADDRESS [SIZE]"),
            },
            "break" => match words.get(1).and_then(|w| parse_number(w).ok()) {
                Some(addr) => {
                    machine.set_breakpoint(addr);
                    println!("breakpoint set at 0x{:04X}", addr);
                }
                None => println!("usage: break ADDRESS"),
            },
            "watch" => match words.get(1).and_then(|w| parse_number(w).ok()) {
                Some(addr) => {
                    machine.set_watchpoint(addr);
                    println!("watchpoint set at 0x{:04X}", addr);
                }
                None => println!("usage: watch ADDRESS"),
            },
            "trace" => match words.get(1) {
                Some(&"on") => {
                    machine.set_trace(true);
                    println!("tracing enabled");
                }
                Some(&"off") => {
                    machine.set_trace(false);
                    println!("tracing disabled");
                }
                _ => println!("usage: trace on|off"),
            },
            "freq" => match words.get(1).and_then(|w| parse_number_u32(w).ok()) {
                Some(hz) => {
                    machine.set_frequency(hz);
                    println!("frequency set to {} Hz", hz);
                }
                None => println!("usage: freq HZ"),
            },
            "load" => match words.get(1) {
                Some(file) => {
                    let addr = words
                        .get(2)
                        .and_then(|w| parse_number(w).ok())
                        .unwrap_or(0x0200);
                    match fs::read(file) {
                        Ok(image) => match machine.load(&image, addr) {
                            Ok(()) => println!("loaded {} at 0x{:04X}", file, addr),
                            Err(err) => println!("load failed: {}", err),
                        },
                        Err(err) => println!("cannot open {}: {}", file, err),
                    }
                }
                None => println!("usage: load FILE [ADDRESS]"),
            },
            "save" => match (
                words.get(1),
                words.get(2).and_then(|w| parse_number(w).ok()),
                words.get(3).and_then(|w| parse_number(w).ok()),
            ) {
                (Some(file), Some(addr), Some(size)) => {
                    let bytes: Vec<u8> = (0..size)
                        .map(|i| machine.peek(addr.wrapping_add(i)))
                        .collect();
                    match fs::write(file, &bytes) {
                        Ok(()) => println!("saved {} bytes from 0x{:04X} to {}", size, addr, file),
                        Err(err) => println!("cannot write {}: {}", file, err),
                    }
                }
                _ => println!("usage: save FILE ADDRESS SIZE"),
            },
            "irq" => {
                machine.irq();
                println!("IRQ asserted");
            }
            "nmi" => {
                machine.nmi();
                println!("NMI asserted");
            }
            other => println!("unknown command: {} (type 'help')", other),
        }
    }
}

fn print_help() {
    println!("commands:");
    println!("  step, s                execute a single instruction");
    println!("  run, r [cycles]        run until halt or the cycle cap");
    println!("  stop                   clear the running flag");
    println!("  reset                  full machine reset");
    println!("  regs                   show registers");
    println!("  flags                  show status flags");
    println!("  status                 show registers, flags and counters");
    println!("  mem ADDR [SIZE]        hex dump of memory");
    println!("  disasm ADDR [SIZE]     disassemble memory");
    println!("  break ADDR             set a breakpoint");
    println!("  watch ADDR             set a watchpoint");
    println!("  trace on|off           toggle instruction tracing");
    println!("  freq HZ                set the nominal clock frequency");
    println!("  load FILE [ADDR]       load a binary image");
    println!("  save FILE ADDR SIZE    save memory to a file");
    println!("  irq / nmi              assert an interrupt line");
    println!("  quit, q                leave the monitor");
}

fn print_registers(machine: &Machine) {
    let cpu = machine.cpu();
    println!(
        "  A = 0x{:02X} ({:3})   B = 0x{:02X} ({:3})",
        cpu.a, cpu.a, cpu.b, cpu.b
    );
    println!(
        "  C = 0x{:02X} ({:3})   D = 0x{:02X} ({:3})",
        cpu.c, cpu.c, cpu.d, cpu.d
    );
    println!(
        "  X = 0x{:04X} ({:5})  Y = 0x{:04X} ({:5})",
        cpu.x, cpu.x, cpu.y, cpu.y
    );
    println!(
        "  SP= 0x{:04X} ({:5})  PC= 0x{:04X} ({:5})",
        cpu.sp, cpu.sp, cpu.pc, cpu.pc
    );
}

fn print_flags(machine: &Machine) {
    let flags = machine.cpu().flags;
    println!("flags: {} (0x{:02X})", flags.summary(), flags.bits());
}

fn print_status(machine: &Machine) {
    let cpu = machine.cpu();
    println!("{}", cpu.status_line());
    println!(
        "cycles: {}, instructions: {}, {}",
        cpu.cycles,
        cpu.instructions,
        if cpu.running { "RUNNING" } else { "STOPPED" }
    );
}

fn dump_memory(machine: &Machine, start: u16, size: u16) {
    let mut addr = start;
    let mut remaining = size;
    while remaining > 0 {
        print!("0x{:04X}:", addr);
        for i in 0..16u16.min(remaining) {
            print!(" {:02X}", machine.peek(addr.wrapping_add(i)));
        }
        println!();
        let row = 16u16.min(remaining);
        addr = addr.wrapping_add(row);
        remaining -= row;
    }
}

fn dump_disasm(machine: &Machine, start: u16, size: u16) {
    let end = start.wrapping_add(size);
    let mut addr = start;
    while addr < end {
        let code = [
            machine.peek(addr),
            machine.peek(addr.wrapping_add(1)),
            machine.peek(addr.wrapping_add(2)),
        ];
        let dis = disasm::disassemble(&code, addr);
        println!("0x{:04X}: {:<9} {}", addr, dis.bytes, dis.mnemonic);
        addr = addr.wrapping_add(dis.length.max(1) as u16);
    }
}

fn parse_addr_size(words: &[&str], default_size: u16) -> Option<(u16, u16)> {
    let addr = parse_number(words.get(1)?).ok()?;
    let size = words
        .get(2)
        .and_then(|w| parse_number(w).ok())
        .unwrap_or(default_size);
    Some((addr, size))
}

fn number_or_zero(text: &str) -> u64 {
    parse_number_u64(text).unwrap_or(0)
}

/// Accepts decimal, `0x` hex or `$` hex
fn parse_number(text: &str) -> Result<u16, String> {
    parse_number_u64(text).and_then(|v| {
        u16::try_from(v).map_err(|_| format!("'{}' does not fit in 16 bits", text))
    })
}

fn parse_number_u32(text: &str) -> Result<u32, String> {
    parse_number_u64(text).and_then(|v| {
        u32::try_from(v).map_err(|_| format!("'{}' does not fit in 32 bits", text))
    })
}

fn parse_number_u64(text: &str) -> Result<u64, String> {
    let text = text.trim();
    let parsed = if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16)
    } else if let Some(hex) = text.strip_prefix('$') {
        u64::from_str_radix(hex, 16)
    } else {
        text.parse()
    };
    parsed.map_err(|_| format!("invalid number '{}'", text))
}
