//! Peer identity
//!
//! Peer identifiers are handed to us by the overlay stack as opaque strings
//! (base58 multihashes on libp2p). We never parse them, only compare and
//! display them.

use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

/// Number of characters kept by [`PeerId::short`]
pub const SHORT_ID_LEN: usize = 6;

/// Opaque peer identifier, cheap to clone
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(Arc<str>);

impl PeerId {
    #[inline]
    pub fn new(id: impl Into<Arc<str>>) -> Self {
        PeerId(id.into())
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Truncated form used when no handle is known for a peer
    pub fn short(&self) -> &str {
        match self.0.char_indices().nth(SHORT_ID_LEN) {
            Some((idx, _)) => &self.0[..idx],
            None => &self.0,
        }
    }
}

impl fmt::Debug for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Peer({})", self.0)
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerId {
    fn from(id: &str) -> Self {
        PeerId::new(id)
    }
}

impl From<String> for PeerId {
    fn from(id: String) -> Self {
        PeerId::new(id)
    }
}

impl Borrow<str> for PeerId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for PeerId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_short_truncates() {
        let id = PeerId::new("QmNnooDu7bfjPFoTZYxMNLWUQJyrVwtbZg5gBMjTezGAJN");
        assert_eq!(id.short(), "QmNnoo");
    }

    #[test]
    fn test_short_keeps_small_ids() {
        let id = PeerId::new("abc");
        assert_eq!(id.short(), "abc");
    }

    #[test]
    fn test_short_respects_char_boundaries() {
        let id = PeerId::new("ééééééééé");
        assert_eq!(id.short(), "éééééé");
    }

    #[test]
    fn test_lookup_by_str() {
        let mut set = HashSet::new();
        set.insert(PeerId::new("peer-a"));
        assert!(set.contains("peer-a"));
        assert!(!set.contains("peer-b"));
    }
}
