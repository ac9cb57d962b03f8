//! Peer handle directory

use std::collections::HashMap;

use rayo_core::{PeerId, RayoError, RayoResult};

/// Maps peer identifiers to display names.
///
/// Entries are only ever added; a handle, once known, stays for the
/// lifetime of the session.
#[derive(Clone, Debug)]
pub struct HandleDirectory {
    local: PeerId,
    handles: HashMap<PeerId, String>,
}

impl HandleDirectory {
    /// Create a directory seeded with the local peer's handle
    pub fn new(local: PeerId, local_handle: impl Into<String>) -> Self {
        let mut handles = HashMap::new();
        handles.insert(local.clone(), local_handle.into());
        HandleDirectory { local, handles }
    }

    pub fn local_peer(&self) -> &PeerId {
        &self.local
    }

    pub fn get(&self, peer: &PeerId) -> Option<&str> {
        self.handles.get(peer).map(String::as_str)
    }

    /// Add a handle for a peer that has none yet
    pub fn insert(&mut self, peer: PeerId, handle: impl Into<String>) -> RayoResult<()> {
        if self.handles.contains_key(&peer) {
            return Err(RayoError::HandleExists(peer.to_string()));
        }
        self.handles.insert(peer, handle.into());
        Ok(())
    }

    /// Handle for `peer`, or its truncated identifier when unknown
    pub fn display_name<'a>(&'a self, peer: &'a PeerId) -> &'a str {
        self.get(peer).unwrap_or_else(|| peer.short())
    }

    pub fn is_local(&self, peer: &PeerId) -> bool {
        *peer == self.local
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PeerId, &str)> {
        self.handles.iter().map(|(peer, handle)| (peer, handle.as_str()))
    }
}
