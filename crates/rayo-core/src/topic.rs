//! Pubsub topics

use std::fmt;
use std::sync::Arc;

/// Topic shared by every Rayo peer. Changing it partitions the network.
pub const RAYO_TOPIC: &str = "/libp2p/rayo/1.0.0";

/// Named pubsub channel
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Topic(Arc<str>);

impl Topic {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Topic(name.into())
    }

    /// The fixed Rayo topic
    pub fn rayo() -> Self {
        Topic::new(RAYO_TOPIC)
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Topic {
    fn default() -> Self {
        Topic::rayo()
    }
}

impl fmt::Debug for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Topic({})", self.0)
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_topic() {
        assert_eq!(Topic::default().as_str(), "/libp2p/rayo/1.0.0");
        assert_eq!(Topic::default(), Topic::rayo());
    }
}
