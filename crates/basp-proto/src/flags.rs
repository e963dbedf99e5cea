//! Header flags for BASP frames.

use bitflags::bitflags;

bitflags! {
    /// Frame feature flags (8 bits)
    ///
    /// Bits outside the defined set are reserved and must be zero; a
    /// header with an undefined bit set fails decoding. This keeps the
    /// bits available for future protocol versions without risking
    /// silent misinterpretation by old peers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct HeaderFlags: u8 {
        /// The dispatch payload starts with a receiver name instead of
        /// addressing `dest_actor`
        const NAMED_RECEIVER = 0b0000_0001;
    }
}

impl HeaderFlags {
    /// Create flags from the raw byte value, preserving unknown bits.
    ///
    /// Validity of the byte (no unknown bits) is checked separately by
    /// the header decoder; this accessor never fails so that a raw
    /// header can always be inspected.
    #[must_use]
    pub const fn from_byte(byte: u8) -> Self {
        Self::from_bits_retain(byte)
    }

    /// Convert to the raw byte value.
    #[must_use]
    pub const fn to_byte(self) -> u8 {
        self.bits()
    }
}

impl Default for HeaderFlags {
    fn default() -> Self {
        Self::empty()
    }
}
