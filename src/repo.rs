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

//! Repository descriptors and the validation pass that turns a raw directory
//! listing into the set of repos this process actually trusts.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::error;

/// Immutable per-process-run record of one registered storage repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoDescriptor {
    pub id: String,
    pub address: String,
    pub public_key: String,
    pub endpoint: String,
    pub path: String,
}

/// Source of raw repository records, e.g. a database client. Treated as an
/// external collaborator; this crate only validates what it returns.
pub trait RepositorySource {
    fn list_repositories(&self) -> Vec<RepoDescriptor>;
}

/// An in-memory source useful for tests and for composing a static fleet.
#[derive(Debug, Default, Clone)]
pub struct StaticRepositorySource {
    repos: Vec<RepoDescriptor>,
}

impl StaticRepositorySource {
    pub fn new(repos: Vec<RepoDescriptor>) -> Self {
        Self { repos }
    }
}

impl RepositorySource for StaticRepositorySource {
    fn list_repositories(&self) -> Vec<RepoDescriptor> {
        self.repos.clone()
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RepoValidationError {
    #[error("public key must be a 40-character Z85 string, got {0} characters")]
    BadPublicKeyLength(usize),
    #[error("server address must start with tcp://")]
    BadAddress,
    #[error("endpoint is not a valid UUID")]
    BadEndpoint,
    #[error("path must be non-empty and absolute")]
    BadPath,
}

/// Validate and load repository descriptors from `source`, dropping and
/// logging any that fail a structural check. Never fails the
/// caller — an empty or partially-invalid fleet still lets the server start.
pub fn load_repositories(source: &dyn RepositorySource) -> Vec<RepoDescriptor> {
    source
        .list_repositories()
        .into_iter()
        .filter(|repo| match validate(repo) {
            Ok(()) => true,
            Err(reason) => {
                error!(repo_id = %repo.id, %reason, "Ignoring repository with invalid descriptor");
                false
            }
        })
        .collect()
}

/// Check the descriptor's structural invariants. Returns the first
/// violation found, if any.
fn validate(repo: &RepoDescriptor) -> Result<(), RepoValidationError> {
    if repo.public_key.len() != 40 {
        return Err(RepoValidationError::BadPublicKeyLength(repo.public_key.len()));
    }
    if !repo.address.starts_with("tcp://") {
        return Err(RepoValidationError::BadAddress);
    }
    if uuid::Uuid::parse_str(&repo.endpoint).is_err() {
        return Err(RepoValidationError::BadEndpoint);
    }
    if repo.path.is_empty() || !repo.path.starts_with('/') {
        return Err(RepoValidationError::BadPath);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_reports_the_specific_violation() {
        let mut repo = valid_repo("repo/a");
        repo.public_key = "a".repeat(10);
        assert_eq!(validate(&repo), Err(RepoValidationError::BadPublicKeyLength(10)));
    }

    fn valid_repo(id: &str) -> RepoDescriptor {
        RepoDescriptor {
            id: id.to_string(),
            address: "tcp://repo.example:9000".to_string(),
            public_key: "a".repeat(40),
            endpoint: "01234567-0123-0123-0123-0123456789ab".to_string(),
            path: "/mnt/a/".to_string(),
        }
    }

    #[test]
    fn valid_descriptor_is_kept() {
        let source = StaticRepositorySource::new(vec![valid_repo("repo/a")]);
        let repos = load_repositories(&source);
        assert_eq!(repos.len(), 1);
        assert_eq!(repos[0].id, "repo/a");
    }

    #[test]
    fn bad_public_key_length_is_dropped() {
        let mut repo = valid_repo("repo/b");
        repo.public_key = "a".repeat(39);
        let source = StaticRepositorySource::new(vec![repo]);
        assert!(load_repositories(&source).is_empty());

        let mut repo = valid_repo("repo/c");
        repo.public_key = "a".repeat(41);
        let source = StaticRepositorySource::new(vec![repo]);
        assert!(load_repositories(&source).is_empty());
    }

    #[test]
    fn bad_address_is_dropped() {
        let mut repo = valid_repo("repo/d");
        repo.address = "udp://repo.example:9000".to_string();
        let source = StaticRepositorySource::new(vec![repo]);
        assert!(load_repositories(&source).is_empty());
    }

    #[test]
    fn bad_endpoint_is_dropped() {
        let mut repo = valid_repo("repo/e");
        repo.endpoint = "not-a-uuid".to_string();
        let source = StaticRepositorySource::new(vec![repo]);
        assert!(load_repositories(&source).is_empty());
    }

    #[test]
    fn bad_path_is_dropped() {
        let mut repo = valid_repo("repo/f");
        repo.path = "mnt/a".to_string();
        let source = StaticRepositorySource::new(vec![repo]);
        assert!(load_repositories(&source).is_empty());

        let mut repo = valid_repo("repo/g");
        repo.path = String::new();
        let source = StaticRepositorySource::new(vec![repo]);
        assert!(load_repositories(&source).is_empty());
    }

    #[test]
    fn mixed_fleet_keeps_only_valid_entries() {
        let mut bad = valid_repo("repo/bad");
        bad.public_key = "x".repeat(39);
        let source = StaticRepositorySource::new(vec![valid_repo("repo/good"), bad]);
        let repos = load_repositories(&source);
        assert_eq!(repos.len(), 1);
        assert_eq!(repos[0].id, "repo/good");
    }
}
