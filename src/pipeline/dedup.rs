//! Filename claims that keep each logical file from being uploaded twice.

use std::collections::HashSet;
use std::sync::Mutex;

/// Process-local set of filenames already claimed for upload.
///
/// Entries are never evicted; a long-lived process grows this set by one
/// filename per distinct media file.
#[derive(Debug, Default)]
pub struct DedupRegistry {
    claimed: Mutex<HashSet<String>>,
}

impl DedupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `filename`. Returns `true` only for the first caller.
    pub fn try_claim(&self, filename: &str) -> bool {
        let mut claimed = self
            .claimed
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        claimed.insert(filename.to_string())
    }

    /// Drop a claim so a later message may upload the file again.
    pub fn release(&self, filename: &str) -> bool {
        let mut claimed = self
            .claimed
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        claimed.remove(filename)
    }

    pub fn is_claimed(&self, filename: &str) -> bool {
        self.claimed
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains(filename)
    }

    pub fn len(&self) -> usize {
        self.claimed
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn second_claim_is_refused() {
        let registry = DedupRegistry::new();
        assert!(registry.try_claim("3EB0C4.jpeg"));
        assert!(!registry.try_claim("3EB0C4.jpeg"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn distinct_filenames_are_independent() {
        let registry = DedupRegistry::new();
        assert!(registry.try_claim("a.jpeg"));
        assert!(registry.try_claim("b.jpeg"));
        assert!(registry.is_claimed("a.jpeg"));
        assert!(!registry.is_claimed("c.jpeg"));
    }

    #[test]
    fn release_allows_reclaim() {
        let registry = DedupRegistry::new();
        assert!(registry.try_claim("a.jpeg"));
        assert!(registry.release("a.jpeg"));
        assert!(registry.is_empty());
        assert!(registry.try_claim("a.jpeg"));
    }

    #[test]
    fn concurrent_claims_grant_exactly_one() {
        let registry = Arc::new(DedupRegistry::new());
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || registry.try_claim("shared.ogg"))
            })
            .collect();
        let granted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|granted| *granted)
            .count();
        assert_eq!(granted, 1);
    }
}
