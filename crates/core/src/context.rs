//! Process-wide upload configuration handed to the controllers.

use crate::config::{ForkliftConfig, UploadConfig};
use crate::fsm::session::UploadSessionController;
use crate::mechanism::MechanismRegistry;
use crate::upload::UploadSession;

/// Mechanism registry and upload settings, built once at startup and shared
/// by every session.
#[derive(Clone, Debug)]
pub struct UploadContext {
    mechanisms: MechanismRegistry,
    config: UploadConfig,
}

impl UploadContext {
    pub fn new(mechanisms: MechanismRegistry, config: UploadConfig) -> Self {
        Self { mechanisms, config }
    }

    /// Build the context from loaded configuration.
    pub fn from_config(config: &ForkliftConfig) -> crate::Result<Self> {
        config.uploads.validate().map_err(crate::Error::Config)?;
        let mechanisms = MechanismRegistry::from_config(&config.mechanisms)?;
        Ok(Self::new(mechanisms, config.uploads.clone()))
    }

    pub fn mechanisms(&self) -> &MechanismRegistry {
        &self.mechanisms
    }

    pub fn config(&self) -> &UploadConfig {
        &self.config
    }

    /// Start a new upload session with the configured lifetime.
    pub fn new_upload_session(
        &self,
        project: impl Into<String>,
        version: impl Into<String>,
        nonce: impl Into<String>,
    ) -> UploadSession {
        UploadSession::new(
            project,
            version,
            nonce,
            self.config.upload_session_lifetime(),
        )
    }

    /// Controller for a session under this context.
    pub fn controller<'a>(&'a self, session: &'a mut UploadSession) -> UploadSessionController<'a> {
        UploadSessionController::new(session, self)
    }
}

impl Default for UploadContext {
    fn default() -> Self {
        Self::new(MechanismRegistry::with_defaults(), UploadConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MechanismConfig;

    #[test]
    fn test_from_config() {
        let config = ForkliftConfig {
            uploads: UploadConfig {
                upload_session_lifetime_secs: 600,
                ..UploadConfig::default()
            },
            mechanisms: MechanismConfig::default(),
            ..ForkliftConfig::default()
        };
        let context = UploadContext::from_config(&config).unwrap();
        assert_eq!(context.mechanisms().len(), 1);

        let session = context.new_upload_session("demo", "1.0.0", "");
        assert_eq!(session.valid_for_at(session.created_at), 600);
    }

    #[test]
    fn test_from_config_rejects_unrepresentable_lifetime() {
        let config = ForkliftConfig {
            uploads: UploadConfig {
                upload_session_lifetime_secs: 1_000_000_000_000,
                ..UploadConfig::default()
            },
            ..ForkliftConfig::default()
        };
        assert!(matches!(
            UploadContext::from_config(&config),
            Err(crate::Error::Config(_))
        ));
    }
}
