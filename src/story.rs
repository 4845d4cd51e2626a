//! Story state shared across the calls of one activation session.
//!
//! The mock decision source interprets a sequence of calls that carry the
//! same accumulated hashes as one continuous scripted interaction. Order is
//! first-writer-wins and is never silently reordered.

/// Ordered, deduplicated collection of story hashes.
#[derive(Debug, Default)]
pub struct StoryState {
    hashes: Vec<String>,
}

impl StoryState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates story state seeded from prior hashes, dropping duplicates
    /// while keeping the first occurrence of each.
    pub fn seeded<I>(hashes: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let mut state = StoryState::new();
        for hash in hashes {
            state.append(&hash.into());
        }
        state
    }

    /// Appends a hash. No-op when already present; returns whether the hash
    /// was newly added.
    pub fn append(&mut self, hash: &str) -> bool {
        if self.contains(hash) {
            return false;
        }
        self.hashes.push(hash.to_string());
        true
    }

    pub fn contains(&self, hash: &str) -> bool {
        self.hashes.iter().any(|h| h == hash)
    }

    /// Hashes in insertion order.
    pub fn snapshot(&self) -> Vec<String> {
        self.hashes.clone()
    }

    pub fn clear(&mut self) {
        self.hashes.clear();
    }

    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }
}
