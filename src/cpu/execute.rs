//! Instruction execution
//!
//! One function per step: a single match over the opcode byte. Operand
//! resolution and flag updates go through the helpers so every opcode
//! family shares the same semantics.

use super::{Cpu, Flags};
use crate::bus::Bus;
use crate::isa::{opcode, Instruction};

impl Cpu {
    /// Execute a decoded instruction. Operand bytes have already been
    /// fetched and PC points at the next instruction.
    pub(super) fn execute(
        &mut self,
        bus: &mut Bus,
        inst: &Instruction,
        operand1: u8,
        operand2: u8,
    ) {
        match inst.opcode {
            // ===== Load/store =====
            opcode::LDI => {
                self.a = operand1;
            }
            opcode::LDA | opcode::LDA_X | opcode::LDA_Y | opcode::LDA_SP => {
                let addr = self.effective_addr(inst.mode, operand1, operand2);
                self.a = bus.read(addr);
            }
            opcode::STA | opcode::STA_X | opcode::STA_Y | opcode::STA_SP => {
                let addr = self.effective_addr(inst.mode, operand1, operand2);
                bus.write(addr, self.a);
            }
            opcode::MOV => {
                self.a = self.get_reg8(operand1);
            }

            // ===== Arithmetic =====
            opcode::ADD => {
                let value = self.operand_value(bus, inst.mode, operand1, operand2);
                self.add(value, false);
            }
            opcode::ADC => {
                let value = self.operand_value(bus, inst.mode, operand1, operand2);
                self.add(value, self.flags.contains(Flags::C));
            }
            opcode::SUB => {
                let value = self.operand_value(bus, inst.mode, operand1, operand2);
                self.a = self.subtract(value, false);
            }
            opcode::SBC => {
                let value = self.operand_value(bus, inst.mode, operand1, operand2);
                self.a = self.subtract(value, self.flags.contains(Flags::C));
            }
            opcode::CMP => {
                let value = self.operand_value(bus, inst.mode, operand1, operand2);
                // Same flag computation as SUB, result discarded
                self.subtract(value, false);
            }
            opcode::INC => {
                let value = self.get_reg8(operand1).wrapping_add(1);
                self.set_reg8(operand1, value);
                self.update_zn(value);
            }
            opcode::DEC => {
                let value = self.get_reg8(operand1).wrapping_sub(1);
                self.set_reg8(operand1, value);
                self.update_zn(value);
            }

            // ===== Logical =====
            opcode::AND => {
                let value = self.operand_value(bus, inst.mode, operand1, operand2);
                self.a &= value;
                self.update_zn(self.a);
            }
            opcode::OR => {
                let value = self.operand_value(bus, inst.mode, operand1, operand2);
                self.a |= value;
                self.update_zn(self.a);
            }
            opcode::XOR => {
                let value = self.operand_value(bus, inst.mode, operand1, operand2);
                self.a ^= value;
                self.update_zn(self.a);
            }

            // ===== Shift/rotate (target register in place) =====
            opcode::SHL => {
                let value = self.get_reg8(operand1);
                let result = value << 1;
                self.set_reg8(operand1, result);
                self.update_zn(result);
                self.flags.set(Flags::C, value & 0x80 != 0);
            }
            opcode::SHR => {
                let value = self.get_reg8(operand1);
                let result = value >> 1;
                self.set_reg8(operand1, result);
                self.update_zn(result);
                self.flags.set(Flags::C, value & 0x01 != 0);
            }
            opcode::ROL => {
                let value = self.get_reg8(operand1);
                let carry_in = self.flags.contains(Flags::C) as u8;
                let result = (value << 1) | carry_in;
                self.set_reg8(operand1, result);
                self.update_zn(result);
                self.flags.set(Flags::C, value & 0x80 != 0);
            }
            opcode::ROR => {
                let value = self.get_reg8(operand1);
                let carry_in = self.flags.contains(Flags::C) as u8;
                let result = (value >> 1) | (carry_in << 7);
                self.set_reg8(operand1, result);
                self.update_zn(result);
                self.flags.set(Flags::C, value & 0x01 != 0);
            }

            // ===== Jump/call =====
            opcode::JMP => {
                self.pc = self.effective_addr(inst.mode, operand1, operand2);
            }
            opcode::JSR => {
                let target = self.effective_addr(inst.mode, operand1, operand2);
                // Return address is the instruction after the operand
                self.push_word(bus, self.pc);
                self.pc = target;
            }
            opcode::RTS => {
                self.pc = self.pop_word(bus);
            }

            // ===== Branches =====
            opcode::BEQ => self.branch(inst, operand1, self.flags.contains(Flags::Z)),
            opcode::BNE => self.branch(inst, operand1, !self.flags.contains(Flags::Z)),
            opcode::BCS => self.branch(inst, operand1, self.flags.contains(Flags::C)),
            opcode::BCC => self.branch(inst, operand1, !self.flags.contains(Flags::C)),
            opcode::BMI => self.branch(inst, operand1, self.flags.contains(Flags::N)),
            opcode::BPL => self.branch(inst, operand1, !self.flags.contains(Flags::N)),
            opcode::BVS => self.branch(inst, operand1, self.flags.contains(Flags::V)),
            opcode::BVC => self.branch(inst, operand1, !self.flags.contains(Flags::V)),

            // ===== Stack =====
            opcode::PHA => {
                let a = self.a;
                self.push_byte(bus, a);
            }
            opcode::PLA => {
                self.a = self.pop_byte(bus);
            }
            opcode::PHP => {
                let bits = self.flags.bits();
                self.push_byte(bus, bits);
            }
            opcode::PLP => {
                let bits = self.pop_byte(bus);
                self.flags = Flags::from_bits_retain(bits);
            }
            opcode::PUSH => {
                let value = self.get_reg8(operand1);
                self.push_byte(bus, value);
            }
            opcode::POP => {
                let value = self.pop_byte(bus);
                self.set_reg8(operand1, value);
            }

            // ===== System =====
            opcode::SEI => {
                self.flags.insert(Flags::I);
            }
            opcode::CLI => {
                self.flags.remove(Flags::I);
            }
            opcode::NOP => {}
            opcode::HLT => {
                self.running = false;
            }

            // The catalog lookup guarantees a known opcode
            _ => unreachable!("opcode 0x{:02X} in catalog but not executed", inst.opcode),
        }
    }

    /// Addition into the accumulator with optional carry-in
    fn add(&mut self, value: u8, carry_in: bool) {
        let a = self.a;
        let sum = a as u16 + value as u16 + carry_in as u16;
        let result = sum as u8;
        let carry = sum > 0xFF;
        let overflow = Self::overflowed(a, value, result);
        self.a = result;
        self.update_arith_flags(result, carry, overflow);
    }

    /// Subtraction flag computation shared by SUB, SBC and CMP; returns
    /// the 8-bit difference. C is set when a borrow occurred.
    fn subtract(&mut self, value: u8, borrow_in: bool) -> u8 {
        let a = self.a;
        let result = a.wrapping_sub(value).wrapping_sub(borrow_in as u8);
        let borrow = (a as u16) < value as u16 + borrow_in as u16;
        let overflow = Self::overflowed(a, value, result);
        self.update_arith_flags(result, borrow, overflow);
        result
    }

    /// Conditional branch: when taken, PC moves to the relative target
    /// computed against the already-advanced PC.
    fn branch(&mut self, inst: &Instruction, displacement: u8, taken: bool) {
        if taken {
            self.pc = self.effective_addr(inst.mode, displacement, 0);
        }
    }
}
