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

//! CURVE keypair loading and the shared [`SecurityContext`].
//!
//! Key *provisioning* (rotation, re-keying, multiple algorithms) is out of
//! scope; this module only knows how to read and write the two fixed-format
//! files the server itself needs at startup.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;

const PUBLIC_KEY_FILE: &str = "sdms-core-key.pub";
const PRIVATE_KEY_FILE: &str = "sdms-core-key.priv";

/// Z85-encoded CURVE keys are always exactly this many printable characters.
pub const Z85_KEY_LEN: usize = 40;

#[derive(Debug, Error)]
pub enum KeyLoadError {
    #[error("could not open key file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("key file {path:?} does not contain a {expected}-character Z85 key (got {got})")]
    BadLength {
        path: PathBuf,
        expected: usize,
        got: usize,
    },
    #[error("failed to generate CURVE keypair: {0}")]
    Generation(String),
}

/// A CURVE keypair in Z85-encoded form, plus the flag marking this side of
/// the handshake as the server.
#[derive(Debug, Clone)]
pub struct SecurityContext {
    pub is_server: bool,
    pub public_key: String,
    pub private_key: String,
}

impl SecurityContext {
    pub fn server(public_key: String, private_key: String) -> Self {
        Self {
            is_server: true,
            public_key,
            private_key,
        }
    }
}

/// Load the daemon's own keypair from `<cred_dir>/sdms-core-key.{pub,priv}`.
///
/// Each file is a single line containing the 40-character Z85 encoding of
/// the key. Missing or unreadable files are fatal at startup.
pub fn load_keypair(cred_dir: &Path) -> Result<(String, String), KeyLoadError> {
    let public_key = read_single_line_key(&cred_dir.join(PUBLIC_KEY_FILE))?;
    let private_key = read_single_line_key(&cred_dir.join(PRIVATE_KEY_FILE))?;
    Ok((public_key, private_key))
}

fn read_single_line_key(path: &Path) -> Result<String, KeyLoadError> {
    let content = fs::read_to_string(path).map_err(|source| KeyLoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let key = content.trim().to_string();
    if key.len() != Z85_KEY_LEN {
        return Err(KeyLoadError::BadLength {
            path: path.to_path_buf(),
            expected: Z85_KEY_LEN,
            got: key.len(),
        });
    }
    Ok(key)
}

/// Generate a fresh CURVE keypair and write it to `<cred_dir>/sdms-core-key.{pub,priv}`,
/// refusing to overwrite an existing pair.
pub fn generate_and_save_keypair(cred_dir: &Path) -> Result<(String, String), KeyLoadError> {
    fs::create_dir_all(cred_dir).map_err(|source| KeyLoadError::Io {
        path: cred_dir.to_path_buf(),
        source,
    })?;

    let public_path = cred_dir.join(PUBLIC_KEY_FILE);
    let private_path = cred_dir.join(PRIVATE_KEY_FILE);

    let keypair =
        zmq::CurveKeyPair::new().map_err(|e| KeyLoadError::Generation(e.to_string()))?;
    let public_key = zmq::z85_encode(&keypair.public_key)
        .map_err(|e| KeyLoadError::Generation(e.to_string()))?;
    let private_key = zmq::z85_encode(&keypair.secret_key)
        .map_err(|e| KeyLoadError::Generation(e.to_string()))?;

    fs::write(&public_path, format!("{public_key}\n")).map_err(|source| KeyLoadError::Io {
        path: public_path.clone(),
        source,
    })?;
    fs::write(&private_path, format!("{private_key}\n")).map_err(|source| KeyLoadError::Io {
        path: private_path.clone(),
        source,
    })?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = fs::metadata(&private_path)
            .map_err(|source| KeyLoadError::Io {
                path: private_path.clone(),
                source,
            })?
            .permissions();
        perms.set_mode(0o600);
        fs::set_permissions(&private_path, perms).map_err(|source| KeyLoadError::Io {
            path: private_path.clone(),
            source,
        })?;
    }

    info!(?cred_dir, "Generated new CURVE keypair");
    Ok((public_key, private_key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn generate_then_load_round_trips() {
        let dir = TempDir::new().unwrap();
        let (pub1, priv1) = generate_and_save_keypair(dir.path()).unwrap();
        assert_eq!(pub1.len(), Z85_KEY_LEN);
        assert_eq!(priv1.len(), Z85_KEY_LEN);

        let (pub2, priv2) = load_keypair(dir.path()).unwrap();
        assert_eq!(pub1, pub2);
        assert_eq!(priv1, priv2);
    }

    #[test]
    fn missing_key_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let err = load_keypair(dir.path()).unwrap_err();
        assert!(matches!(err, KeyLoadError::Io { .. }));
    }

    #[test]
    fn wrong_length_key_is_rejected() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(PUBLIC_KEY_FILE), "too-short\n").unwrap();
        fs::write(dir.path().join(PRIVATE_KEY_FILE), "a".repeat(40)).unwrap();
        let err = load_keypair(dir.path()).unwrap_err();
        assert!(matches!(err, KeyLoadError::BadLength { .. }));
    }
}
