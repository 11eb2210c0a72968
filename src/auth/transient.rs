// Copyright (C) 2026 Core Services Team This program is free software: you
// can redistribute it and/or modify it under the terms of the GNU General
// Public License as published by the Free Software Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or
// FITNESS FOR A PARTICULAR PURPOSE. See the GNU General Public License for
// more details.
//
// You should have received a copy of the GNU General Public License along
// with this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Short-lived {public-key -> (identity, expiry)} grants.
//!
//! Entries are inserted by [`crate::core::Core::authorize_transient`] under
//! the shared data mutex, and expired by the maintenance loop's first tick
//! that observes them past their TTL. The ZAP handler reads this table
//! *without* taking the mutex — a deliberate, documented race: a stale read
//! at worst causes one spurious admit or deny.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Grants live for this long after insertion.
pub const GRANT_TTL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
struct Grant {
    identity: String,
    expiry: Instant,
}

#[derive(Debug, Default)]
pub struct TransientGrantTable {
    grants: HashMap<String, Grant>,
}

impl TransientGrantTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a grant for `public_key`, valid for [`GRANT_TTL`] from now.
    pub fn insert(&mut self, public_key: String, identity: String) {
        self.grants.insert(
            public_key,
            Grant {
                identity,
                expiry: Instant::now() + GRANT_TTL,
            },
        );
    }

    /// Look up the identity for `public_key`, regardless of whether the
    /// grant has technically expired — staleness is tolerated by design.
    pub fn identity_for(&self, public_key: &str) -> Option<&str> {
        self.grants.get(public_key).map(|g| g.identity.as_str())
    }

    /// Remove every grant whose expiry is at or before `now`. Called once
    /// per maintenance tick.
    pub fn expire(&mut self, now: Instant) -> usize {
        let before = self.grants.len();
        self.grants.retain(|_, grant| grant.expiry > now);
        before - self.grants.len()
    }

    pub fn len(&self) -> usize {
        self.grants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grants.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inserted_grant_is_visible_immediately() {
        let mut table = TransientGrantTable::new();
        table.insert("K".to_string(), "u/alice".to_string());
        assert_eq!(table.identity_for("K"), Some("u/alice"));
    }

    #[test]
    fn expire_removes_only_past_due_grants() {
        let mut table = TransientGrantTable::new();
        table.insert("K1".to_string(), "u/alice".to_string());
        table.insert("K2".to_string(), "u/bob".to_string());

        // Nothing is due yet.
        let removed = table.expire(Instant::now());
        assert_eq!(removed, 0);
        assert_eq!(table.len(), 2);

        // Simulate the TTL having elapsed by checking against a future instant.
        let future = Instant::now() + GRANT_TTL + Duration::from_secs(1);
        let removed = table.expire(future);
        assert_eq!(removed, 2);
        assert!(table.is_empty());
    }

    #[test]
    fn unknown_key_resolves_to_none() {
        let table = TransientGrantTable::new();
        assert_eq!(table.identity_for("nope"), None);
    }
}
