//! Serial port
//!
//! Memory-mapped at 0x8000-0x8002. Transmission is synchronous: a write
//! to the TX data register sends the byte straight to the host sink and
//! the port is immediately ready again, so there is no output queue to
//! drain. Reception is host-driven: the embedder injects bytes with
//! [`SerialPort::receive`] and the program consumes them through the RX
//! data register.

use std::io::{self, Write};

/// Register offsets within the serial port (relative to its base)
mod regs {
    /// TX data (write-only)
    pub const TX: u16 = 0x00;
    /// RX data (read-only, consuming)
    pub const RX: u16 = 0x01;
    /// Status (read-only)
    pub const STATUS: u16 = 0x02;
}

/// Status register bits
pub mod status {
    /// Transmitter ready for a byte
    pub const TX_READY: u8 = 1 << 0;
    /// A received byte is waiting
    pub const RX_READY: u8 = 1 << 1;
    /// Transmit path empty
    pub const TX_EMPTY: u8 = 1 << 2;
    /// Receive buffer full
    pub const RX_FULL: u8 = 1 << 3;
}

/// Serial port state
pub struct SerialPort {
    rx_data: u8,
    tx_ready: bool,
    rx_ready: bool,
    tx_empty: bool,
    rx_full: bool,
    /// Host-side sink for transmitted bytes
    sink: Box<dyn Write + Send>,
}

impl SerialPort {
    /// Create a serial port transmitting to standard output
    pub fn new() -> Self {
        Self::with_sink(Box::new(io::stdout()))
    }

    /// Create a serial port transmitting to the given sink
    pub fn with_sink(sink: Box<dyn Write + Send>) -> Self {
        Self {
            rx_data: 0,
            tx_ready: true,
            rx_ready: false,
            tx_empty: true,
            rx_full: false,
            sink,
        }
    }

    /// Replace the host sink
    pub fn set_sink(&mut self, sink: Box<dyn Write + Send>) {
        self.sink = sink;
    }

    /// Reset to power-on state (the sink is kept)
    pub fn reset(&mut self) {
        self.rx_data = 0;
        self.tx_ready = true;
        self.rx_ready = false;
        self.tx_empty = true;
        self.rx_full = false;
    }

    /// Read a register byte. `addr` is the offset from the port base.
    /// Reading RX consumes the pending byte; reading TX yields 0
    /// (write-only cell).
    pub fn read(&mut self, addr: u16) -> u8 {
        match addr {
            regs::RX => {
                self.rx_ready = false;
                self.rx_full = false;
                self.rx_data
            }
            regs::STATUS => self.status(),
            _ => 0,
        }
    }

    /// Side-effect-free register read for debuggers and memory dumps
    pub fn peek(&self, addr: u16) -> u8 {
        match addr {
            regs::RX => self.rx_data,
            regs::STATUS => self.status(),
            _ => 0,
        }
    }

    /// Write a register byte. Writes to read-only cells are dropped.
    pub fn write(&mut self, addr: u16, value: u8) {
        if addr == regs::TX {
            self.transmit(value);
        }
    }

    /// Inject a received byte from the host side
    pub fn receive(&mut self, value: u8) {
        self.rx_data = value;
        self.rx_ready = true;
        self.rx_full = true;
    }

    /// Whether the transmitter accepts a byte
    pub fn tx_ready(&self) -> bool {
        self.tx_ready
    }

    /// Whether a received byte is waiting
    pub fn rx_ready(&self) -> bool {
        self.rx_ready
    }

    /// Compute the status byte from the four state booleans
    fn status(&self) -> u8 {
        let mut st = 0;
        if self.tx_ready {
            st |= status::TX_READY;
        }
        if self.rx_ready {
            st |= status::RX_READY;
        }
        if self.tx_empty {
            st |= status::TX_EMPTY;
        }
        if self.rx_full {
            st |= status::RX_FULL;
        }
        st
    }

    fn transmit(&mut self, value: u8) {
        self.tx_ready = false;
        self.tx_empty = false;

        // Synchronous model: the byte leaves immediately. A failing sink
        // only logs; the machine does not observe host I/O errors.
        if let Err(err) = self.sink.write_all(&[value]).and_then(|_| self.sink.flush()) {
            log::warn!("serial sink write failed: {}", err);
        }

        self.tx_ready = true;
        self.tx_empty = true;
    }
}

impl Default for SerialPort {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Write sink that tests can read back
    #[derive(Clone, Default)]
    struct SharedSink(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedSink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn capture_port() -> (SerialPort, Arc<Mutex<Vec<u8>>>) {
        let sink = SharedSink::default();
        let buf = sink.0.clone();
        (SerialPort::with_sink(Box::new(sink)), buf)
    }

    #[test]
    fn test_initial_status() {
        let port = SerialPort::new();
        assert_eq!(port.peek(regs::STATUS), status::TX_READY | status::TX_EMPTY);
    }

    #[test]
    fn test_transmit_reaches_sink() {
        let (mut port, buf) = capture_port();
        port.write(regs::TX, b'H');
        port.write(regs::TX, b'i');
        assert_eq!(buf.lock().unwrap().as_slice(), b"Hi");
        // Synchronous model: still ready after each byte
        assert!(port.tx_ready());
    }

    #[test]
    fn test_receive_and_consume() {
        let (mut port, _buf) = capture_port();
        port.receive(0x5A);
        assert!(port.rx_ready());
        assert_eq!(
            port.read(regs::STATUS) & (status::RX_READY | status::RX_FULL),
            status::RX_READY | status::RX_FULL
        );

        // Reading RX consumes the byte
        assert_eq!(port.read(regs::RX), 0x5A);
        assert!(!port.rx_ready());
        assert_eq!(port.read(regs::STATUS) & status::RX_READY, 0);
    }

    #[test]
    fn test_tx_is_write_only() {
        let (mut port, _buf) = capture_port();
        port.write(regs::TX, 0x41);
        assert_eq!(port.read(regs::TX), 0);
    }

    #[test]
    fn test_status_is_read_only() {
        let (mut port, _buf) = capture_port();
        port.write(regs::STATUS, 0xFF);
        assert_eq!(port.peek(regs::STATUS), status::TX_READY | status::TX_EMPTY);
    }

    #[test]
    fn test_reset_clears_rx() {
        let (mut port, _buf) = capture_port();
        port.receive(0x12);
        port.reset();
        assert!(!port.rx_ready());
        assert_eq!(port.read(regs::RX), 0);
    }
}
