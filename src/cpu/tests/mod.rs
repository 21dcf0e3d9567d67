//! CPU tests
//!
//! Test suite for the CPU core, organized into:
//! - instructions.rs: per-family instruction semantics and flags
//! - interrupts.rs: IRQ/NMI delivery, masking and priority

use super::*;
use crate::bus::Bus;
use crate::isa::opcode;

mod interrupts;

/// Load a program at the default entry point and position the CPU on it
fn setup(program: &[u8]) -> (Cpu, Bus) {
    let mut bus = Bus::new();
    bus.load(program, map::DEFAULT_ENTRY).unwrap();
    let mut cpu = Cpu::new();
    cpu.warm_reset(map::DEFAULT_ENTRY);
    (cpu, bus)
}

/// Step until HLT clears the running flag, with a safety bound
fn run_to_halt(cpu: &mut Cpu, bus: &mut Bus) {
    cpu.running = true;
    for _ in 0..10_000 {
        if !cpu.running {
            return;
        }
        cpu.step(bus);
    }
    panic!("program did not halt");
}
