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

//! Identity resolution: the persistent auth table, the transient grant
//! table, the external directory oracle, and the ZAP handler that ties them
//! together.

pub mod credentials;
pub mod directory;
pub mod transient;
pub mod zap;

pub use credentials::CredentialStore;
pub use directory::DirectoryOracle;
pub use transient::TransientGrantTable;
pub use zap::ZapHandler;
