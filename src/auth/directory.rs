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

//! The third ZAP identity tier: a blocking database lookup. This crate
//! only defines the interface; a real deployment supplies an implementation
//! backed by its directory/database client.

/// A blocking oracle mapping a public key to a user identity. Implementations
/// may take seconds to answer; the ZAP handler is explicitly allowed to move
/// this call off its own thread as long as per-peer ordering is preserved.
pub trait DirectoryOracle: Send + Sync {
    fn lookup(&self, public_key: &str) -> Option<String>;
}

/// An oracle that never resolves anything, useful where no directory service
/// is configured and only pre-authorized/transient identities matter.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullDirectoryOracle;

impl DirectoryOracle for NullDirectoryOracle {
    fn lookup(&self, _public_key: &str) -> Option<String> {
        None
    }
}

/// An in-memory oracle for tests and small deployments.
#[derive(Debug, Default, Clone)]
pub struct StaticDirectoryOracle {
    entries: std::collections::HashMap<String, String>,
}

impl StaticDirectoryOracle {
    pub fn new(entries: std::collections::HashMap<String, String>) -> Self {
        Self { entries }
    }
}

impl DirectoryOracle for StaticDirectoryOracle {
    fn lookup(&self, public_key: &str) -> Option<String> {
        self.entries.get(public_key).cloned()
    }
}
