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

//! Outbound repo-control wire messages.
//!
//! The real message catalog is an external protobuf schema; this crate only
//! needs to produce an opaque, framed payload tagged with a message type and
//! consume a one-frame, content-opaque reply. `bincode` stands in for the
//! real schema's wire encoding.

use bincode::{Decode, Encode};

#[derive(Debug, Clone, Encode, Decode, PartialEq, Eq)]
pub struct RepoDataDeleteRequest {
    pub path: String,
}

#[derive(Debug, Clone, Encode, Decode, PartialEq, Eq)]
pub struct RepoPathCreateRequest {
    pub path: String,
}

#[derive(Debug, Clone, Encode, Decode, PartialEq, Eq)]
pub struct RepoPathDeleteRequest {
    pub path: String,
}

/// Discriminator carried alongside the encoded body so a repo server can
/// dispatch without understanding the full schema.
#[derive(Debug, Clone, Copy, Encode, Decode, PartialEq, Eq)]
pub enum RepoControlMessageType {
    DataDelete,
    PathCreate,
    PathDelete,
}

/// One outbound repo-control request, already tagged and ready to frame.
pub enum RepoControlRequest {
    DataDelete(RepoDataDeleteRequest),
    PathCreate(RepoPathCreateRequest),
    PathDelete(RepoPathDeleteRequest),
}

impl RepoControlRequest {
    pub fn message_type(&self) -> RepoControlMessageType {
        match self {
            RepoControlRequest::DataDelete(_) => RepoControlMessageType::DataDelete,
            RepoControlRequest::PathCreate(_) => RepoControlMessageType::PathCreate,
            RepoControlRequest::PathDelete(_) => RepoControlMessageType::PathDelete,
        }
    }

    /// Encode as a two-frame multipart message: [type tag, body].
    pub fn encode(&self) -> Result<Vec<Vec<u8>>, WireError> {
        let tag = bincode::encode_to_vec(self.message_type(), bincode::config::standard())
            .map_err(WireError::Encode)?;
        let body = match self {
            RepoControlRequest::DataDelete(req) => {
                bincode::encode_to_vec(req, bincode::config::standard())
            }
            RepoControlRequest::PathCreate(req) => {
                bincode::encode_to_vec(req, bincode::config::standard())
            }
            RepoControlRequest::PathDelete(req) => {
                bincode::encode_to_vec(req, bincode::config::standard())
            }
        }
        .map_err(WireError::Encode)?;
        Ok(vec![tag, body])
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("failed to encode wire message: {0}")]
    Encode(bincode::error::EncodeError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_delete_encodes_two_frames() {
        let req = RepoControlRequest::DataDelete(RepoDataDeleteRequest {
            path: "/mnt/a/user/bob".to_string(),
        });
        let frames = req.encode().unwrap();
        assert_eq!(frames.len(), 2);
    }

    #[test]
    fn path_create_and_delete_use_distinct_tags() {
        let create = RepoControlRequest::PathCreate(RepoPathCreateRequest {
            path: "/mnt/a/user/bob".to_string(),
        })
        .encode()
        .unwrap();
        let delete = RepoControlRequest::PathDelete(RepoPathDeleteRequest {
            path: "/mnt/a/user/bob".to_string(),
        })
        .encode()
        .unwrap();
        assert_ne!(create[0], delete[0]);
        assert_eq!(create[1], delete[1]); // same path, different operation
    }
}
