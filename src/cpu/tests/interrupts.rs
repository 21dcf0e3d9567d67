//! Interrupt delivery tests
//!
//! Stack layout, vector dispatch, I-flag masking and NMI-over-IRQ
//! priority.

use super::*;
use crate::bus::map;

#[test]
fn test_irq_delivery_stack_and_vector() {
    let (mut cpu, mut bus) = setup(&[opcode::NOP]);
    bus.write_word(map::IRQ_VECTOR, 0x0400);
    cpu.irq();

    let sp0 = cpu.sp;
    let step = cpu.step(&mut bus);
    assert_eq!(step, Step::Interrupt);

    // From the top down: PC high, PC low, flags
    assert_eq!(bus.peek(sp0), 0x02);
    assert_eq!(bus.peek(sp0.wrapping_sub(1)), 0x00);
    assert_eq!(bus.peek(sp0.wrapping_sub(2)), 0x00);
    assert_eq!(cpu.pc, 0x0400);
    assert!(cpu.flags.contains(Flags::I));
    assert!(!cpu.irq_pending);
}

#[test]
fn test_irq_masked_by_i_flag() {
    let (mut cpu, mut bus) = setup(&[opcode::NOP]);
    cpu.flags.insert(Flags::I);
    cpu.irq();

    let step = cpu.step(&mut bus);
    assert_eq!(step, Step::Executed { cycles: 1 });
    // Still pending, waiting for CLI
    assert!(cpu.irq_pending);
    assert_eq!(cpu.pc, 0x0201);
}

#[test]
fn test_nmi_ignores_i_flag() {
    let (mut cpu, mut bus) = setup(&[opcode::NOP]);
    bus.write_word(map::NMI_VECTOR, 0x0500);
    cpu.flags.insert(Flags::I);
    cpu.nmi();

    assert_eq!(cpu.step(&mut bus), Step::Interrupt);
    assert_eq!(cpu.pc, 0x0500);
}

#[test]
fn test_nmi_preempts_irq() {
    let (mut cpu, mut bus) = setup(&[opcode::NOP]);
    bus.write_word(map::NMI_VECTOR, 0x0500);
    bus.write_word(map::IRQ_VECTOR, 0x0400);
    cpu.irq();
    cpu.nmi();

    assert_eq!(cpu.step(&mut bus), Step::Interrupt);
    assert_eq!(cpu.pc, 0x0500, "NMI vector wins");
    // The IRQ stays pending but I is now set, so it waits
    assert!(cpu.irq_pending);
    assert_eq!(cpu.step(&mut bus), Step::Executed { cycles: 1 });
}

#[test]
fn test_delivery_precedes_execution() {
    let (mut cpu, mut bus) = setup(&[opcode::LDI, 0x42]);
    bus.write_word(map::IRQ_VECTOR, 0x0400);
    bus.load(&[opcode::LDI, 0x24], 0x0400).unwrap();
    cpu.irq();

    // First step delivers only; the handler's first instruction runs on
    // the next step
    assert_eq!(cpu.step(&mut bus), Step::Interrupt);
    assert_eq!(cpu.a, 0);
    cpu.step(&mut bus);
    assert_eq!(cpu.a, 0x24);
}

#[test]
fn test_handler_returns_via_plp_rts() {
    // Main: SEI-free loop would re-enter; handler restores flags and PC
    let (mut cpu, mut bus) = setup(&[opcode::LDI, 0x11, opcode::HLT]);
    bus.write_word(map::IRQ_VECTOR, 0x0400);
    // Handler: PLP to restore flags, RTS back to the interrupted PC
    bus.load(&[opcode::PLP, opcode::RTS], 0x0400).unwrap();
    cpu.irq();

    assert_eq!(cpu.step(&mut bus), Step::Interrupt);
    cpu.step(&mut bus); // PLP
    cpu.step(&mut bus); // RTS
    assert_eq!(cpu.pc, 0x0200);
    assert!(!cpu.flags.contains(Flags::I), "PLP restored the pre-IRQ flags");

    cpu.step(&mut bus);
    assert_eq!(cpu.a, 0x11);
}

#[test]
fn test_interrupt_charges_cycles() {
    let (mut cpu, mut bus) = setup(&[opcode::NOP]);
    cpu.irq();
    cpu.step(&mut bus);
    assert!(cpu.cycles > 0);
    assert_eq!(cpu.instructions, 0, "delivery retires no instruction");
}

#[test]
fn test_breakpoint_fires_before_interrupt() {
    let (mut cpu, mut bus) = setup(&[opcode::NOP]);
    cpu.breakpoint = Some(map::DEFAULT_ENTRY);
    cpu.irq();

    assert_eq!(cpu.step(&mut bus), Step::BreakpointHit);
    assert!(cpu.irq_pending, "interrupt not yet delivered");
}
