//! Machine orchestrator
//!
//! Owns the CPU and the address space and wires them together: program
//! loading, reset and warm reset, single-step and bounded run, the
//! peripheral tick → IRQ line, optional throttling to a nominal clock
//! frequency, and trace emission.

use std::fmt;
use std::io::Write;
use std::thread;
use std::time::{Duration, Instant};

use crate::bus::{map, Bus, LoadError};
use crate::cpu::{Cpu, Step};
use crate::disasm;

/// Reason a stepped or running machine came to rest
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// `run` consumed its cycle budget
    CycleBudget,
    /// HLT executed
    Halted,
    /// The armed breakpoint matched PC
    Breakpoint,
    /// The armed watchpoint observed an access
    Watchpoint,
    /// A byte outside the instruction catalog was fetched
    InvalidOpcode { pc: u16, opcode: u8 },
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::CycleBudget => write!(f, "cycle budget exhausted"),
            StopReason::Halted => write!(f, "halted"),
            StopReason::Breakpoint => write!(f, "breakpoint"),
            StopReason::Watchpoint => write!(f, "watchpoint"),
            StopReason::InvalidOpcode { pc, opcode } => {
                write!(f, "invalid opcode 0x{:02X} at 0x{:04X}", opcode, pc)
            }
        }
    }
}

/// One emulated machine: CPU, address space, peripherals and clock
pub struct Machine {
    cpu: Cpu,
    bus: Bus,
    /// Nominal clock rate for throttling; 0 disables the throttle
    frequency_hz: u32,
}

impl Machine {
    /// Create a machine in the full-reset state: memory zeroed, vectors
    /// seeded, PC at the default entry point.
    pub fn new() -> Self {
        let bus = Bus::new();
        let mut cpu = Cpu::new();
        cpu.pc = bus.peek_word(map::RESET_VECTOR);
        Self {
            cpu,
            bus,
            frequency_hz: 0,
        }
    }

    /// Copy a program image into memory at `address`
    pub fn load(&mut self, image: &[u8], address: u16) -> Result<(), LoadError> {
        self.bus.load(image, address)
    }

    /// Full reset: registers, flags, counters, debug state, memory and
    /// peripherals; PC reloads from the (re-seeded) reset vector.
    pub fn reset(&mut self) {
        self.cpu.reset();
        self.bus.reset();
        self.cpu.pc = self.bus.peek_word(map::RESET_VECTOR);
    }

    /// Warm reset to an explicit entry point: registers and flags are
    /// re-initialised while memory, peripherals and debug settings are
    /// preserved.
    pub fn warm_reset(&mut self, entry: u16) {
        self.cpu.warm_reset(entry);
    }

    /// Execute one instruction (or deliver one interrupt), tick the
    /// peripherals, and emit a trace line if enabled.
    ///
    /// Returns `None` when the machine made normal progress and
    /// `Some(reason)` when it came to rest.
    pub fn step(&mut self) -> Option<StopReason> {
        let pc_before = self.cpu.pc;
        let cycles_before = self.cpu.cycles;
        let watch_before = self.bus.watch_hit();

        let step = self.cpu.step(&mut self.bus);

        // Peripherals advance by however many cycles the step consumed;
        // a timer expiry raises the IRQ line for the next boundary.
        let delta = self.cpu.cycles - cycles_before;
        if delta > 0 && self.bus.ports.tick(delta) {
            self.cpu.irq_pending = true;
        }

        match step {
            Step::BreakpointHit => Some(StopReason::Breakpoint),
            Step::InvalidOpcode { pc, opcode } => Some(StopReason::InvalidOpcode { pc, opcode }),
            Step::Interrupt => None,
            Step::Executed { .. } => {
                if self.cpu.trace {
                    self.emit_trace(pc_before);
                }
                if self.bus.watch_hit() && !watch_before {
                    // Stop at the instruction boundary; the hit flag
                    // stays set for the host to inspect.
                    self.cpu.running = false;
                    return Some(StopReason::Watchpoint);
                }
                if !self.cpu.running {
                    return Some(StopReason::Halted);
                }
                None
            }
        }
    }

    /// Set the running flag and step until the machine stops or the
    /// cycle delta reaches `max_cycles` (0 means no budget). Sleeps
    /// between instructions when a nominal frequency is configured.
    pub fn run(&mut self, max_cycles: u64) -> StopReason {
        self.cpu.running = true;
        let start_cycles = self.cpu.cycles;
        let wall_start = Instant::now();

        loop {
            if max_cycles > 0 && self.cpu.cycles - start_cycles >= max_cycles {
                return StopReason::CycleBudget;
            }
            if !self.cpu.running {
                return StopReason::Halted;
            }
            if let Some(reason) = self.step() {
                return reason;
            }
            if self.frequency_hz > 0 {
                self.throttle(self.cpu.cycles - start_cycles, wall_start);
            }
        }
    }

    /// Clear the running flag from outside the loop
    pub fn stop(&mut self) {
        self.cpu.running = false;
    }

    /// Sleep long enough that `delta_cycles` of simulated time does not
    /// outpace the nominal clock.
    fn throttle(&self, delta_cycles: u64, wall_start: Instant) {
        let expected = Duration::from_secs_f64(delta_cycles as f64 / self.frequency_hz as f64);
        let elapsed = wall_start.elapsed();
        if expected > elapsed {
            thread::sleep(expected - elapsed);
        }
    }

    fn emit_trace(&self, pc: u16) {
        let mut code = [0u8; 3];
        for (i, byte) in code.iter_mut().enumerate() {
            *byte = self.bus.peek(pc.wrapping_add(i as u16));
        }
        let dis = disasm::disassemble(&code, pc);
        println!("{:04X}  {:<16} {}", pc, dis.mnemonic, self.cpu.status_line());
    }

    // ========== Interrupt lines ==========

    /// Assert the maskable interrupt request line
    pub fn irq(&mut self) {
        self.cpu.irq();
    }

    /// Assert the non-maskable interrupt request line
    pub fn nmi(&mut self) {
        self.cpu.nmi();
    }

    // ========== Debug hooks ==========

    pub fn set_breakpoint(&mut self, addr: u16) {
        self.cpu.breakpoint = Some(addr);
        self.cpu.breakpoint_hit = false;
    }

    pub fn clear_breakpoint(&mut self) {
        self.cpu.breakpoint = None;
        self.cpu.breakpoint_hit = false;
    }

    pub fn set_watchpoint(&mut self, addr: u16) {
        self.bus.set_watchpoint(addr);
    }

    pub fn clear_watchpoint(&mut self) {
        self.bus.clear_watchpoint();
    }

    pub fn set_trace(&mut self, enabled: bool) {
        self.cpu.trace = enabled;
    }

    // ========== Clock ==========

    pub fn set_frequency(&mut self, hz: u32) {
        self.frequency_hz = hz;
    }

    pub fn frequency(&self) -> u32 {
        self.frequency_hz
    }

    // ========== State access ==========

    pub fn cpu(&self) -> &Cpu {
        &self.cpu
    }

    pub fn cpu_mut(&mut self) -> &mut Cpu {
        &mut self.cpu
    }

    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut Bus {
        &mut self.bus
    }

    /// Side-effect-free memory read
    pub fn peek(&self, addr: u16) -> u8 {
        self.bus.peek(addr)
    }

    /// Bus read with MMIO side effects
    pub fn read(&mut self, addr: u16) -> u8 {
        self.bus.read(addr)
    }

    /// Bus write with MMIO side effects
    pub fn write(&mut self, addr: u16, value: u8) {
        self.bus.write(addr, value)
    }

    /// Inject a byte into the serial receiver
    pub fn serial_receive(&mut self, value: u8) {
        self.bus.ports.serial.receive(value);
    }

    /// Redirect serial output to a host sink
    pub fn serial_set_sink(&mut self, sink: Box<dyn Write + Send>) {
        self.bus.ports.serial.set_sink(sink);
    }
}

impl Default for Machine {
    fn default() -> Self {
        Self::new()
    }
}
