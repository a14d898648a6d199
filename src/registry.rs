//! Bidirectional map between peer signatures and compact peer ids.

use crate::error::TablesError;
use crate::models::*;
use std::collections::HashMap;

/// Allocates and resolves [PeerId]s for [PeerSignature]s.
///
/// Ids are handed out sequentially starting at 1 and are never reused; a
/// signature seen once keeps its id for the life of the process. The registry
/// is owned by the engine and mutated only from the fold thread.
#[derive(Debug, Default)]
pub struct PeerRegistry {
    by_signature: HashMap<PeerSignature, PeerId>,
    by_id: HashMap<PeerId, PeerSignature>,
    next_id: u32,
}

impl PeerRegistry {
    pub fn new() -> Self {
        PeerRegistry {
            by_signature: HashMap::new(),
            by_id: HashMap::new(),
            next_id: 1,
        }
    }

    /// Returns the id for `sig`, allocating a new one on first sighting.
    pub fn get_or_create(&mut self, sig: &PeerSignature) -> Result<PeerId, TablesError> {
        if let Some(id) = self.by_signature.get(sig) {
            return Ok(*id);
        }
        if self.next_id == u32::MAX {
            return Err(TablesError::ResourceExhausted(
                "peer id space exhausted".to_string(),
            ));
        }
        let id = PeerId(self.next_id);
        self.next_id += 1;
        self.by_signature.insert(sig.clone(), id);
        self.by_id.insert(id, sig.clone());
        Ok(id)
    }

    pub fn get_id(&self, sig: &PeerSignature) -> Option<PeerId> {
        self.by_signature.get(sig).copied()
    }

    pub fn get_signature(&self, id: PeerId) -> Option<&PeerSignature> {
        self.by_id.get(&id)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::IpAddr;
    use std::str::FromStr;

    #[test]
    fn test_get_or_create_idempotent() {
        let mut registry = PeerRegistry::new();
        let sig = PeerSignature::new(
            "rrc00",
            IpAddr::from_str("192.0.2.1").unwrap(),
            Asn::new(65001),
        );
        let a = registry.get_or_create(&sig).unwrap();
        let b = registry.get_or_create(&sig).unwrap();
        assert_eq!(a, b);
        assert_eq!(a, PeerId(1));
        assert_eq!(registry.get_signature(a), Some(&sig));
    }

    #[test]
    fn test_ids_sequential_and_distinct() {
        let mut registry = PeerRegistry::new();
        let ip = IpAddr::from_str("192.0.2.1").unwrap();
        let a = registry
            .get_or_create(&PeerSignature::new("rrc00", ip, Asn::new(65001)))
            .unwrap();
        // same ip+asn at a different collector is a different session
        let b = registry
            .get_or_create(&PeerSignature::new("rrc01", ip, Asn::new(65001)))
            .unwrap();
        assert_eq!(a, PeerId(1));
        assert_eq!(b, PeerId(2));
        assert_eq!(registry.len(), 2);
    }
}
