use cdp_session_core::MessageIds;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Hop-by-hop and end-to-end identifiers for locally originated requests.
///
/// Hop-by-hop starts at a random value; end-to-end starts at the current
/// unix time in the high 12 bits and a random value in the low 20, as RFC
/// 6733 section 3 suggests. Both then increment.
pub struct IdGenerator {
    hop_by_hop: AtomicU32,
    end_to_end: AtomicU32,
}

impl IdGenerator {
    pub fn new() -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as u32)
            .unwrap_or_default();
        Self::with_seed(rand::random::<u32>(), now, rand::random::<u32>())
    }

    fn with_seed(hop_by_hop: u32, unix_secs: u32, random: u32) -> Self {
        Self {
            hop_by_hop: AtomicU32::new(hop_by_hop),
            end_to_end: AtomicU32::new((unix_secs << 20) | (random & 0x000F_FFFF)),
        }
    }

    pub fn next_hop_by_hop(&self) -> u32 {
        self.hop_by_hop.fetch_add(1, Ordering::Relaxed)
    }

    pub fn next_end_to_end(&self) -> u32 {
        self.end_to_end.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageIds for IdGenerator {
    fn next_ids(&self) -> (u32, u32) {
        (self.next_hop_by_hop(), self.next_end_to_end())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_end_to_end_layout() {
        let ids = IdGenerator::with_seed(7, 0x123, 0xFFAB_CDEF);
        assert_eq!(ids.next_end_to_end(), 0x123B_CDEF);
        assert_eq!(ids.next_end_to_end(), 0x123B_CDF0);
    }

    #[test]
    fn test_ids_increment_and_wrap() {
        let ids = IdGenerator::with_seed(u32::MAX, 0, 0);
        assert_eq!(ids.next_ids(), (u32::MAX, 0));
        assert_eq!(ids.next_ids(), (0, 1));
    }
}
