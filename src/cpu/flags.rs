//! CPU status flag definitions
//!
//! Bit positions in the flag byte. Bits 5-7 are reserved: arithmetic
//! updates write only the defined bits and leave the rest untouched, so
//! a value restored with PLP round-trips exactly.

use bitflags::bitflags;

bitflags! {
    /// The status flag byte
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Flags: u8 {
        /// Zero (bit 0)
        const Z = 1 << 0;
        /// Negative (bit 1)
        const N = 1 << 1;
        /// Carry / borrow (bit 2)
        const C = 1 << 2;
        /// Signed overflow (bit 3)
        const V = 1 << 3;
        /// Interrupt disable (bit 4)
        const I = 1 << 4;
    }
}

impl Flags {
    /// Compact render used by trace lines and the monitor, e.g. `Z-C--`
    pub fn summary(self) -> String {
        let mut s = String::with_capacity(5);
        s.push(if self.contains(Flags::Z) { 'Z' } else { '-' });
        s.push(if self.contains(Flags::N) { 'N' } else { '-' });
        s.push(if self.contains(Flags::C) { 'C' } else { '-' });
        s.push(if self.contains(Flags::V) { 'V' } else { '-' });
        s.push(if self.contains(Flags::I) { 'I' } else { '-' });
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bit_positions() {
        assert_eq!(Flags::Z.bits(), 0x01);
        assert_eq!(Flags::N.bits(), 0x02);
        assert_eq!(Flags::C.bits(), 0x04);
        assert_eq!(Flags::V.bits(), 0x08);
        assert_eq!(Flags::I.bits(), 0x10);
    }

    #[test]
    fn test_reserved_bits_retained() {
        let flags = Flags::from_bits_retain(0xE0 | Flags::Z.bits());
        assert!(flags.contains(Flags::Z));
        assert_eq!(flags.bits() & 0xE0, 0xE0);
    }

    #[test]
    fn test_summary() {
        assert_eq!(Flags::empty().summary(), "-----");
        assert_eq!((Flags::Z | Flags::C).summary(), "Z-C--");
        assert_eq!(Flags::all().summary(), "ZNCVI");
    }
}
