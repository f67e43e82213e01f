use forklift_core::{
    FileDeclaration, FileUploadSessionId, MechanismDetails, MechanismRegistry, UploadContext,
    UploadMechanism, UploadSession,
};
use forklift_core::config::UploadConfig;

/// Wire name of the post-processing test mechanism.
pub const PROCESSED_MECHANISM: &str = "test-processed";

/// A mechanism whose files go through `processing`.
pub struct ProcessedMechanism;

impl UploadMechanism for ProcessedMechanism {
    fn name(&self) -> &str {
        PROCESSED_MECHANISM
    }

    fn requires_processing(&self) -> bool {
        true
    }

    fn prepare(&self, file_upload_session_id: FileUploadSessionId) -> MechanismDetails {
        let mut details = MechanismDetails::new();
        details.insert(
            "staging-key".to_string(),
            format!("staging/{file_upload_session_id}").into(),
        );
        details
    }
}

/// Context with the built-in mechanisms plus [`ProcessedMechanism`].
pub fn test_context() -> UploadContext {
    UploadContext::new(
        MechanismRegistry::with_defaults().with(ProcessedMechanism),
        UploadConfig::default(),
    )
}

/// A fresh `demo==1.0.0` upload session.
pub fn demo_session(context: &UploadContext) -> UploadSession {
    context.new_upload_session("demo", "1.0.0", "")
}

pub fn sdist() -> FileDeclaration {
    FileDeclaration::new("demo-1.0.0.tar.gz", 1000)
}

pub fn wheel() -> FileDeclaration {
    FileDeclaration::new("demo-1.0.0-py3-none-any.whl", 800)
        .with_hash("sha256", "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08")
        .with_metadata("Metadata-Version: 2.1\nName: demo\nVersion: 1.0.0\n")
}
