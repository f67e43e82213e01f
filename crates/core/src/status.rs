//! Serialized status snapshots.
//!
//! These are the JSON bodies an HTTP layer renders for upload status
//! requests. Their shape is part of the wire protocol.

use crate::fsm::file::FileUploadState;
use crate::fsm::session::UploadSessionState;
use crate::mechanism::MechanismDetails;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Status of one file upload session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FileUploadStatus {
    /// Seconds until expiration, clamped at zero.
    #[serde(rename = "valid-for")]
    pub valid_for: i64,
    /// Mechanism name → mechanism instructions.
    pub mechanism: BTreeMap<String, MechanismDetails>,
    pub status: FileUploadState,
}

/// Status of an upload session and all of its files.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UploadSessionStatus {
    /// Every registered mechanism name.
    pub mechanisms: Vec<String>,
    /// Hex session token.
    #[serde(rename = "session-token")]
    pub session_token: String,
    /// Seconds until expiration, clamped at zero.
    #[serde(rename = "valid-for")]
    pub valid_for: i64,
    /// Filename → file status.
    pub files: BTreeMap<String, FileUploadStatus>,
    pub notices: Vec<String>,
    pub status: UploadSessionState,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_upload_session_status_wire_names() {
        let mut mechanism = BTreeMap::new();
        mechanism.insert("m".to_string(), MechanismDetails::new());
        let mut files = BTreeMap::new();
        files.insert(
            "a.whl".to_string(),
            FileUploadStatus {
                valid_for: 10,
                mechanism,
                status: FileUploadState::Processing,
            },
        );
        let status = UploadSessionStatus {
            mechanisms: vec!["m".to_string()],
            session_token: "ab".to_string(),
            valid_for: 0,
            files,
            notices: vec!["n".to_string()],
            status: UploadSessionState::Error,
        };

        assert_eq!(
            serde_json::to_value(&status).unwrap(),
            json!({
                "mechanisms": ["m"],
                "session-token": "ab",
                "valid-for": 0,
                "files": {
                    "a.whl": {"valid-for": 10, "mechanism": {"m": {}}, "status": "processing"}
                },
                "notices": ["n"],
                "status": "error"
            })
        );
    }
}
