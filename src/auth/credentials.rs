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

//! Persistent auth table: `public-key -> identity` for pre-authorized
//! repositories. Populated once at startup; insertion-only thereafter, so it
//! needs no lock once the frontends are up.

use std::collections::HashMap;

use crate::repo::RepoDescriptor;

#[derive(Debug, Default, Clone)]
pub struct CredentialStore {
    by_public_key: HashMap<String, String>,
}

impl CredentialStore {
    /// Build the table from a validated repository fleet. One entry per
    /// repo, keyed by its Z85 public key, identity is the repo id.
    pub fn from_repositories(repos: &[RepoDescriptor]) -> Self {
        let by_public_key = repos
            .iter()
            .map(|repo| (repo.public_key.clone(), repo.id.clone()))
            .collect();
        Self { by_public_key }
    }

    pub fn identity_for(&self, public_key: &str) -> Option<&str> {
        self.by_public_key.get(public_key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.by_public_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_public_key.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo(id: &str, public_key: &str) -> RepoDescriptor {
        RepoDescriptor {
            id: id.to_string(),
            address: "tcp://repo.example:9000".to_string(),
            public_key: public_key.to_string(),
            endpoint: "01234567-0123-0123-0123-0123456789ab".to_string(),
            path: "/mnt/a/".to_string(),
        }
    }

    #[test]
    fn lookup_by_public_key_resolves_identity() {
        let store = CredentialStore::from_repositories(&[repo("repo/a", &"a".repeat(40))]);
        assert_eq!(store.identity_for(&"a".repeat(40)), Some("repo/a"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn unknown_key_has_no_identity() {
        let store = CredentialStore::from_repositories(&[repo("repo/a", &"a".repeat(40))]);
        assert_eq!(store.identity_for(&"b".repeat(40)), None);
    }

    #[test]
    fn empty_fleet_yields_empty_store() {
        let store = CredentialStore::from_repositories(&[]);
        assert!(store.is_empty());
    }
}
