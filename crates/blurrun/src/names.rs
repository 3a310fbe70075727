//! # Variable Name Minting
//!
//! Names handed to the backend are never reclaimed, only minted, so every
//! name a mint produces is unique for the life of the mint.

use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use rand::Rng;

#[derive(Debug)]
pub struct NameMint {
    tag: String,
    counter: AtomicU64,
}

impl NameMint {
    /// A mint with a random tag, so two clients sharing one backend do not
    /// collide.
    pub fn new() -> Self {
        let tag: u32 = rand::thread_rng().r#gen();
        Self::with_tag(format!("{:08x}", tag))
    }

    /// A mint with a fixed tag. The tag must be valid inside a Python
    /// identifier.
    pub fn with_tag(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            counter: AtomicU64::new(1),
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Mints `<prefix>_<tag>_<n>`.
    pub fn mint(&self, prefix: &str) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        format!("{}_{}_{}", prefix, self.tag, n)
    }
}

impl Default for NameMint {
    fn default() -> Self {
        Self::new()
    }
}
