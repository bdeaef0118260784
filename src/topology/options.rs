//! Site link option bits

use std::fmt;

bitflags::bitflags! {
    /// Site link `options` bitmask. Unknown bits are preserved.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct LinkOptions: u32 {
        /// Replicate on change notification instead of on schedule only
        const USE_NOTIFICATION = 0x1;
        /// Replicate in both directions when either side initiates
        const TWO_WAY_SYNC = 0x2;
        /// Send replication traffic uncompressed
        const COMPRESSION_DISABLED = 0x4;
    }
}

impl fmt::Display for LinkOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self
            .iter_names()
            .map(|(name, _)| match name {
                "USE_NOTIFICATION" => "use_notification",
                "TWO_WAY_SYNC" => "two_way_sync",
                _ => "compression_disabled",
            })
            .collect();
        if names.is_empty() {
            write!(f, "none")
        } else {
            write!(f, "{}", names.join("|"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_remove() {
        let mut options = LinkOptions::empty();
        options.set(LinkOptions::TWO_WAY_SYNC, true);
        options |= LinkOptions::USE_NOTIFICATION;
        assert_eq!(options.bits(), 0x3);
        options.set(LinkOptions::TWO_WAY_SYNC, false);
        assert_eq!(options, LinkOptions::USE_NOTIFICATION);
    }

    #[test]
    fn test_unknown_bits_survive() {
        let mut options = LinkOptions::from_bits_retain(0x10 | 0x4);
        options.remove(LinkOptions::COMPRESSION_DISABLED);
        assert_eq!(options.bits(), 0x10);
        options.insert(LinkOptions::TWO_WAY_SYNC);
        assert_eq!(options.bits(), 0x12);
    }

    #[test]
    fn test_display() {
        assert_eq!(LinkOptions::empty().to_string(), "none");
        assert_eq!(LinkOptions::from_bits_retain(0x40).to_string(), "none");
        assert_eq!(
            (LinkOptions::USE_NOTIFICATION | LinkOptions::COMPRESSION_DISABLED).to_string(),
            "use_notification|compression_disabled"
        );
    }
}
