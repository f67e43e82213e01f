//! Upload mechanisms and the mechanism registry.
//!
//! A mechanism describes how a client transfers a file's bytes and whether
//! the file needs post-processing before it can be published. Mechanisms are
//! process-wide constants: file upload sessions share them by name and never
//! mutate them.

use crate::config::MechanismConfig;
use crate::upload::FileUploadSessionId;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Wire name of the direct HTTP POST mechanism.
pub const HTTP_POST_APPLICATION_OCTET_STREAM: &str = "http-post-application-octet-stream";

/// Names of mechanisms that can be enabled from configuration.
pub const BUILTIN_MECHANISMS: &[&str] = &[HTTP_POST_APPLICATION_OCTET_STREAM];

/// Mechanism-specific instructions handed to the client.
pub type MechanismDetails = Map<String, Value>;

/// A strategy for accepting a file's bytes.
pub trait UploadMechanism: Send + Sync {
    /// Stable identifier used on the wire.
    fn name(&self) -> &str;

    /// Whether a ready file must pass through `processing` before completion.
    fn requires_processing(&self) -> bool;

    /// Produce client instructions for a file upload session.
    ///
    /// Must be a pure function of the session identity: it runs inside a
    /// state transition and may not block or touch shared state.
    fn prepare(&self, file_upload_session_id: FileUploadSessionId) -> MechanismDetails;
}

impl fmt::Debug for dyn UploadMechanism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadMechanism")
            .field("name", &self.name())
            .field("requires_processing", &self.requires_processing())
            .finish()
    }
}

/// Direct `application/octet-stream` HTTP POST of the file body.
///
/// Bytes are usable as soon as they land, so no post-processing is needed.
#[derive(Clone, Debug)]
pub struct HttpPostApplicationOctetStream {
    upload_url_base: String,
}

impl HttpPostApplicationOctetStream {
    /// Create the mechanism with the base URL clients POST to.
    pub fn new(upload_url_base: impl Into<String>) -> Self {
        Self {
            upload_url_base: upload_url_base.into(),
        }
    }

    /// Upload URL for a file session.
    pub fn upload_url(&self, file_upload_session_id: FileUploadSessionId) -> String {
        format!(
            "{}/{}",
            self.upload_url_base.trim_end_matches('/'),
            file_upload_session_id
        )
    }
}

impl Default for HttpPostApplicationOctetStream {
    fn default() -> Self {
        Self::new(MechanismConfig::default().upload_url_base)
    }
}

impl UploadMechanism for HttpPostApplicationOctetStream {
    fn name(&self) -> &str {
        HTTP_POST_APPLICATION_OCTET_STREAM
    }

    fn requires_processing(&self) -> bool {
        false
    }

    fn prepare(&self, file_upload_session_id: FileUploadSessionId) -> MechanismDetails {
        let mut details = Map::new();
        details.insert(
            "upload-url".to_string(),
            Value::String(self.upload_url(file_upload_session_id)),
        );
        details
    }
}

/// Immutable name → mechanism lookup, built once at startup.
#[derive(Clone, Default, Debug)]
pub struct MechanismRegistry {
    mechanisms: BTreeMap<String, Arc<dyn UploadMechanism>>,
}

impl MechanismRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in mechanisms with default settings.
    pub fn with_defaults() -> Self {
        Self::new().with(HttpPostApplicationOctetStream::default())
    }

    /// Build a registry from configuration.
    pub fn from_config(config: &MechanismConfig) -> crate::Result<Self> {
        config.validate().map_err(crate::Error::Config)?;
        let mut registry = Self::new();
        for name in &config.enabled {
            match name.as_str() {
                HTTP_POST_APPLICATION_OCTET_STREAM => {
                    registry = registry.with(HttpPostApplicationOctetStream::new(
                        config.upload_url_base.clone(),
                    ));
                }
                other => {
                    return Err(crate::Error::Config(format!(
                        "unknown mechanism '{other}'"
                    )));
                }
            }
        }
        Ok(registry)
    }

    /// Add a mechanism, replacing any mechanism with the same name.
    pub fn with(mut self, mechanism: impl UploadMechanism + 'static) -> Self {
        self.mechanisms
            .insert(mechanism.name().to_string(), Arc::new(mechanism));
        self
    }

    /// Look up a mechanism by wire name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn UploadMechanism>> {
        self.mechanisms.get(name).cloned()
    }

    /// Registered mechanism names, sorted.
    pub fn names(&self) -> Vec<String> {
        self.mechanisms.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.mechanisms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mechanisms.is_empty()
    }
}
