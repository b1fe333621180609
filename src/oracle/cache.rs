//! ═══════════════════════════════════════════════════════════════════════════════
//! RESPONSE CACHE — Content-Addressed Oracle Decisions
//! ═══════════════════════════════════════════════════════════════════════════════
//!
//! Key: hex SHA-256 of the canonical request JSON. Identical requests (same
//! phase, snapshot and signal) get the same decision without another
//! network call or rate-limit slot.
//! ═══════════════════════════════════════════════════════════════════════════════

use std::collections::HashMap;

use sha2::{Digest, Sha256};

use super::{Decision, OracleRequest};

#[derive(Debug, Default, Clone)]
pub struct ResponseCache {
    entries: HashMap<String, Decision>,
    hits: u64,
    misses: u64,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hex SHA-256 of the serialized request
    pub fn key_for(request: &OracleRequest) -> Result<String, serde_json::Error> {
        let canonical = serde_json::to_vec(request)?;
        Ok(hex::encode(Sha256::digest(&canonical)))
    }

    pub fn get(&mut self, key: &str) -> Option<Decision> {
        match self.entries.get(key) {
            Some(decision) => {
                self.hits += 1;
                Some(decision.clone())
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    pub fn insert(&mut self, key: String, decision: Decision) {
        self.entries.insert(key, decision);
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }
}
