use forklift_core::config::ReaperConfig;
use forklift_core::{
    FileDeclaration, FileUploadSessionId, HTTP_POST_APPLICATION_OCTET_STREAM, UploadContext,
    UploadSession,
};
use forklift_store::{MemorySessionStore, Reaper, SessionStore, SharedSession};
use std::sync::Arc;
use time::{Duration, OffsetDateTime};

/// Store, context and reaper wired together the way a service would.
pub struct TestReaper {
    pub store: Arc<MemorySessionStore>,
    pub context: Arc<UploadContext>,
    pub reaper: Reaper,
}

impl TestReaper {
    pub fn new(config: ReaperConfig) -> Self {
        let store = Arc::new(MemorySessionStore::new());
        let context = Arc::new(UploadContext::default());
        let reaper = Reaper::new(
            Arc::clone(&store) as Arc<dyn SessionStore>,
            Arc::clone(&context),
            config,
        );
        Self {
            store,
            context,
            reaper,
        }
    }

    /// Store a `demo` session for `version` with one declared sdist.
    pub async fn insert_with_file(&self, version: &str) -> (SharedSession, FileUploadSessionId) {
        let mut session = self.context.new_upload_session("demo", version, "");
        let file_id = self
            .context
            .controller(&mut session)
            .create_file_upload_session(
                FileDeclaration::new(format!("demo-{version}.tar.gz"), 1000),
                HTTP_POST_APPLICATION_OCTET_STREAM,
            )
            .unwrap()
            .unwrap()
            .session()
            .id;
        (self.store.insert(session).await.unwrap(), file_id)
    }
}

/// A time past every default session and file lifetime.
pub fn after_expiry() -> OffsetDateTime {
    OffsetDateTime::now_utc() + Duration::days(2)
}

/// Move a session's expiration into the past.
pub fn expire(session: &mut UploadSession) {
    session.expiration = OffsetDateTime::now_utc() - Duration::seconds(1);
}
