use std::sync::Arc;

use crate::{
    auth::jwt::JwtService,
    config::AppConfig,
    db::RequestStore,
    error::AppResult,
    requests::{DocumentRoots, RequestContext},
    storage::DocumentStorage,
};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn RequestStore>,
    pub files: Arc<dyn DocumentStorage>,
    pub config: Arc<AppConfig>,
    pub jwt: JwtService,
}

impl AppState {
    pub fn new(
        store: Arc<dyn RequestStore>,
        files: Arc<dyn DocumentStorage>,
        config: AppConfig,
        jwt: JwtService,
    ) -> Self {
        Self {
            store,
            files,
            config: Arc::new(config),
            jwt,
        }
    }

    pub fn roots(&self) -> &DocumentRoots {
        &self.config.document_roots
    }

    /// Runs a blocking request operation off the async executor.
    pub async fn run<T, F>(&self, op: F) -> AppResult<T>
    where
        T: Send + 'static,
        F: FnOnce(RequestContext<'_>) -> AppResult<T> + Send + 'static,
    {
        let state = self.clone();
        tokio::task::spawn_blocking(move || {
            let ctx = RequestContext::new(
                state.store.as_ref(),
                state.files.as_ref(),
                state.roots(),
            );
            op(ctx)
        })
        .await?
    }
}
