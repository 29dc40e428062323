//! Single-byte additive checksum shared by both protocols.

/// Running 8-bit additive checksum.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Checksum(u8);

impl Checksum {
    /// Start an empty checksum.
    pub const fn new() -> Self {
        Self(0)
    }

    /// Start from an initial value (v2 seeds with the envelope fields).
    pub const fn seeded(seed: u8) -> Self {
        Self(seed)
    }

    /// Fold one byte in.
    pub fn add(&mut self, byte: u8) {
        self.0 = self.0.wrapping_add(byte);
    }

    /// Fold a run of bytes in.
    pub fn add_slice(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.add(byte);
        }
    }

    /// Current sum modulo 256.
    pub const fn value(self) -> u8 {
        self.0
    }

    /// The byte that brings the running sum to zero.
    pub const fn complement(self) -> u8 {
        self.0.wrapping_neg()
    }

    /// True when the running sum is zero modulo 256.
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }
}

/// Sum of all bytes truncated to 8 bits.
pub fn compute(bytes: &[u8]) -> u8 {
    let mut sum = Checksum::new();
    sum.add_slice(bytes);
    sum.value()
}

/// `compute(bytes) == expected`.
pub fn validate(bytes: &[u8], expected: u8) -> bool {
    compute(bytes) == expected
}

/// Checksum byte that makes `bytes` plus itself sum to zero.
pub fn complement(bytes: &[u8]) -> u8 {
    compute(bytes).wrapping_neg()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compute_truncates_to_eight_bits() {
        assert_eq!(compute(&[]), 0);
        assert_eq!(compute(&[0x01, 0x02, 0x03]), 0x06);
        assert_eq!(compute(&[0xFF, 0x02]), 0x01);
        assert_eq!(compute(&[0x80; 4]), 0x00);
    }

    #[test]
    fn validate_compares_against_expected() {
        assert!(validate(&[0x10, 0x20], 0x30));
        assert!(!validate(&[0x10, 0x20], 0x31));
    }

    #[test]
    fn complement_zeroes_the_total() {
        let bytes = [0x03, 0x00, 0x01, 0x00, 0x00, 0x00, 0x04, 0x00, 0xDE, 0xAD];
        let csum = complement(&bytes);
        let mut total = Checksum::new();
        total.add_slice(&bytes);
        total.add(csum);
        assert!(total.is_zero());
    }

    #[test]
    fn complement_of_zero_sum_is_zero() {
        assert_eq!(complement(&[0x80, 0x80]), 0);
        assert_eq!(Checksum::new().complement(), 0);
    }

    #[test]
    fn seeded_sum_continues_from_seed() {
        let mut sum = Checksum::seeded(0xFE);
        sum.add(0x03);
        assert_eq!(sum.value(), 0x01);
    }
}
