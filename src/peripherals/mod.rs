//! Memory-mapped peripherals
//!
//! This module contains the peripheral bank that backs the MMIO window:
//! - Serial port (0x8000-0x8002)
//! - Parallel port (0x8003)
//! - Programmable timer (0x8004-0x8009)
//!
//! All other MMIO addresses read 0 and ignore writes.

pub mod parallel;
pub mod serial;
pub mod timer;

pub use parallel::ParallelPort;
pub use serial::SerialPort;
pub use timer::Timer;

/// Peripheral register addresses in the MMIO window
pub mod regs {
    /// Serial TX data (write-only)
    pub const SERIAL_TX: u16 = 0x8000;
    /// Serial RX data (read-only, consuming)
    pub const SERIAL_RX: u16 = 0x8001;
    /// Serial status (read-only)
    pub const SERIAL_STATUS: u16 = 0x8002;
    /// Parallel port data (read/write)
    pub const PARALLEL_PORT: u16 = 0x8003;
    /// Timer reload latch low byte
    pub const TIMER_LATCH_LO: u16 = 0x8004;
    /// Timer reload latch high byte
    pub const TIMER_LATCH_HI: u16 = 0x8005;
    /// Timer control
    pub const TIMER_CTRL: u16 = 0x8006;
    /// Timer current count low byte
    pub const TIMER_COUNT_LO: u16 = 0x8007;
    /// Timer current count high byte
    pub const TIMER_COUNT_HI: u16 = 0x8008;
    /// Timer IRQ status (write bit 0 to acknowledge)
    pub const TIMER_IRQ: u16 = 0x8009;
}

/// Peripheral bank owned by one machine instance
pub struct Peripherals {
    pub serial: SerialPort,
    pub parallel: ParallelPort,
    pub timer: Timer,
}

impl Peripherals {
    pub fn new() -> Self {
        Self {
            serial: SerialPort::new(),
            parallel: ParallelPort::new(),
            timer: Timer::new(),
        }
    }

    /// Reset all peripherals to power-on state
    pub fn reset(&mut self) {
        self.serial.reset();
        self.parallel.reset();
        self.timer.reset();
    }

    /// Read from an MMIO address. Unassigned addresses read 0.
    pub fn read(&mut self, addr: u16) -> u8 {
        match addr {
            regs::SERIAL_TX..=regs::SERIAL_STATUS => self.serial.read(addr - regs::SERIAL_TX),
            regs::PARALLEL_PORT => self.parallel.read(),
            regs::TIMER_LATCH_LO..=regs::TIMER_IRQ => self.timer.read(addr - regs::TIMER_LATCH_LO),
            _ => 0,
        }
    }

    /// Side-effect-free read for debuggers and memory dumps
    pub fn peek(&self, addr: u16) -> u8 {
        match addr {
            regs::SERIAL_TX..=regs::SERIAL_STATUS => self.serial.peek(addr - regs::SERIAL_TX),
            regs::PARALLEL_PORT => self.parallel.read(),
            regs::TIMER_LATCH_LO..=regs::TIMER_IRQ => self.timer.read(addr - regs::TIMER_LATCH_LO),
            _ => 0,
        }
    }

    /// Write to an MMIO address. Unassigned and read-only addresses
    /// drop the write.
    pub fn write(&mut self, addr: u16, value: u8) {
        match addr {
            regs::SERIAL_TX..=regs::SERIAL_STATUS => {
                self.serial.write(addr - regs::SERIAL_TX, value)
            }
            regs::PARALLEL_PORT => self.parallel.write(value),
            regs::TIMER_LATCH_LO..=regs::TIMER_IRQ => {
                self.timer.write(addr - regs::TIMER_LATCH_LO, value)
            }
            _ => {}
        }
    }

    /// Tick all peripherals by `cycles` CPU cycles.
    /// Returns true if any peripheral has an IRQ pending.
    pub fn tick(&mut self, cycles: u64) -> bool {
        self.timer.tick(cycles);
        self.irq_pending()
    }

    /// Whether any peripheral holds an unacknowledged IRQ
    pub fn irq_pending(&self) -> bool {
        self.timer.irq_pending()
    }
}

impl Default for Peripherals {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parallel_routing() {
        let mut p = Peripherals::new();
        p.write(regs::PARALLEL_PORT, 0xA5);
        assert_eq!(p.read(regs::PARALLEL_PORT), 0xA5);
        assert_eq!(p.parallel.read(), 0xA5);
    }

    #[test]
    fn test_timer_routing() {
        let mut p = Peripherals::new();
        p.write(regs::TIMER_LATCH_LO, 0x34);
        p.write(regs::TIMER_LATCH_HI, 0x12);
        assert_eq!(p.read(regs::TIMER_LATCH_LO), 0x34);
        assert_eq!(p.read(regs::TIMER_LATCH_HI), 0x12);

        p.write(regs::TIMER_CTRL, timer::ctrl::RUN);
        assert!(p.timer.is_running());
        assert_eq!(p.read(regs::TIMER_COUNT_LO), 0x34);
        assert_eq!(p.read(regs::TIMER_COUNT_HI), 0x12);
    }

    #[test]
    fn test_serial_routing() {
        let mut p = Peripherals::new();
        p.serial.receive(0x7E);
        assert_eq!(p.read(regs::SERIAL_RX), 0x7E);
        // Consumed by the read
        assert_eq!(p.read(regs::SERIAL_STATUS) & serial::status::RX_READY, 0);
    }

    #[test]
    fn test_unassigned_addresses() {
        let mut p = Peripherals::new();
        assert_eq!(p.read(0x8100), 0);
        p.write(0x8100, 0xFF);
        assert_eq!(p.read(0x8100), 0);
        assert_eq!(p.read(0xFE00), 0);
    }

    #[test]
    fn test_tick_raises_timer_irq() {
        let mut p = Peripherals::new();
        p.write(regs::TIMER_LATCH_LO, 0x02);
        p.write(regs::TIMER_CTRL, timer::ctrl::RUN | timer::ctrl::IRQ_ENABLE);

        assert!(!p.tick(1));
        assert!(p.tick(1));
        assert!(p.irq_pending());

        // Acknowledge through the register interface
        p.write(regs::TIMER_IRQ, 0x01);
        assert!(!p.irq_pending());
    }

    #[test]
    fn test_reset() {
        let mut p = Peripherals::new();
        p.write(regs::PARALLEL_PORT, 0xFF);
        p.write(regs::TIMER_LATCH_LO, 0x10);
        p.write(regs::TIMER_CTRL, timer::ctrl::RUN);
        p.serial.receive(0x55);

        p.reset();
        assert_eq!(p.read(regs::PARALLEL_PORT), 0);
        assert!(!p.timer.is_running());
        assert_eq!(p.read(regs::SERIAL_STATUS) & serial::status::RX_READY, 0);
    }
}
