//! Ring sizing and index arithmetic.
//!
//! Every mailbox is backed by a power-of-two ring so that a sequence number
//! can be mapped to a slot with a bitmask:
//! - Requested sizes are validated (0 is rejected) and rounded up
//! - Sequence-to-index mapping uses `seq & mask`

use crate::error::RingError;

/// Sizing of a ring buffer.
///
/// The capacity is always a power of 2. Callers ask for any positive size and
/// get the next power of two back; the requested value is kept for reporting.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RingConfig {
    /// Number of slots in the ring. Always a power of 2.
    pub capacity: usize,
    /// Size the caller asked for before rounding.
    pub requested: usize,
}

impl RingConfig {
    /// Creates a ring configuration, rounding `requested` up to a power of 2.
    ///
    /// # Errors
    /// - [`RingError::ZeroSize`] if `requested` is 0
    /// - [`RingError::TooLarge`] if rounding would overflow `usize`
    ///
    /// # Example
    /// ```
    /// use basalt_ring::RingConfig;
    /// let cfg = RingConfig::new(2000).unwrap();
    /// assert_eq!(cfg.capacity, 2048);
    /// assert!(RingConfig::new(0).is_err());
    /// ```
    pub fn new(requested: usize) -> Result<Self, RingError> {
        if requested == 0 {
            return Err(RingError::ZeroSize);
        }
        let capacity = requested
            .checked_next_power_of_two()
            .ok_or(RingError::TooLarge { requested })?;
        Ok(Self {
            capacity,
            requested,
        })
    }

    /// Returns the bitmask for index calculation.
    ///
    /// The mask is `capacity - 1`, which has all lower bits set to 1, so
    /// `seq & mask` is equivalent to `seq % capacity`.
    ///
    /// # Example
    /// ```
    /// use basalt_ring::RingConfig;
    /// let cfg = RingConfig::new(8).unwrap();
    /// assert_eq!(cfg.mask(), 7);  // 0b111 in binary
    /// ```
    #[inline(always)]
    pub fn mask(&self) -> u64 {
        (self.capacity as u64) - 1
    }

    /// True when the requested size had to be rounded up.
    pub fn was_rounded(&self) -> bool {
        self.capacity != self.requested
    }
}

/// Converts a sequence number to a slot index.
///
/// With `capacity = 8` (mask = 7 = `0b111`):
/// ```text
/// seq =  0 → 0 & 7 = 0
/// seq =  5 → 5 & 7 = 5
/// seq =  8 → 8 & 7 = 0  (wraps around)
/// seq = 15 → 15 & 7 = 7
/// ```
#[inline(always)]
pub fn seq_to_index(seq: u64, mask: u64) -> usize {
    (seq & mask) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_size_is_rejected_with_descriptive_message() {
        let err = RingConfig::new(0).unwrap_err();
        assert_eq!(err, RingError::ZeroSize);
        assert_eq!(err.to_string(), "size found to be 0, must be greater than 0");
    }

    #[test]
    fn sizes_round_up_to_power_of_two() {
        assert_eq!(RingConfig::new(1).unwrap().capacity, 1);
        assert_eq!(RingConfig::new(8).unwrap().capacity, 8);
        assert_eq!(RingConfig::new(9).unwrap().capacity, 16);
        assert_eq!(RingConfig::new(1000).unwrap().capacity, 1024);

        let cfg = RingConfig::new(2000).unwrap();
        assert_eq!(cfg.capacity, 2048);
        assert_eq!(cfg.requested, 2000);
        assert!(cfg.was_rounded());
        assert!(!RingConfig::new(1024).unwrap().was_rounded());
    }

    #[test]
    fn oversized_request_is_rejected() {
        let requested = usize::MAX;
        assert_eq!(
            RingConfig::new(requested),
            Err(RingError::TooLarge { requested })
        );
    }

    #[test]
    fn index_wraps_with_mask() {
        let mask = RingConfig::new(8).unwrap().mask();
        assert_eq!(seq_to_index(0, mask), 0);
        assert_eq!(seq_to_index(5, mask), 5);
        assert_eq!(seq_to_index(8, mask), 0);
        assert_eq!(seq_to_index(15, mask), 7);
        assert_eq!(seq_to_index(16, mask), 0);
    }
}
