use std::env;
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use axum::body::Body;
use axum::http::{Method, Request};
use axum::Router;
use diesel::connection::SimpleConnection;
use diesel::PgConnection;
use diesel_migrations::MigrationHarness;
use exam_requests::auth::jwt::JwtService;
use exam_requests::auth::Role;
use exam_requests::config::AppConfig;
use exam_requests::db::{self, MemoryRequestStore, PgPool};
use exam_requests::requests::DocumentRoots;
use exam_requests::routes;
use exam_requests::state::AppState;
use exam_requests::storage::LocalDocumentStorage;
use exam_requests::MIGRATIONS;
use http_body_util::BodyExt;
use once_cell::sync::Lazy;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tempfile::TempDir;
use tokio::sync::Mutex;
use tower::util::ServiceExt;

static DB_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

const MULTIPART_BOUNDARY: &str = "exam-requests-test-boundary";

pub struct TestApp {
    pub state: AppState,
    router: Router,
    store: Arc<MemoryRequestStore>,
    _documents: TempDir,
}

impl TestApp {
    pub fn new() -> Result<Self> {
        let documents = tempfile::tempdir().context("failed to create document root")?;
        let roots = DocumentRoots::under(
            documents.path().join("uploads"),
            documents.path().join("database"),
        );

        let config = AppConfig {
            database_url: "postgres://unused@localhost/unused".to_string(),
            database_max_pool_size: db::DEFAULT_MAX_POOL_SIZE,
            server_host: "127.0.0.1".to_string(),
            server_port: 0,
            jwt_secret: "test-secret".to_string(),
            jwt_issuer: "test-issuer".to_string(),
            jwt_audience: "test-audience".to_string(),
            jwt_expiry_minutes: 60,
            cors_allowed_origin: None,
            document_roots: roots,
        };

        let store = Arc::new(MemoryRequestStore::new());
        let files = Arc::new(LocalDocumentStorage::new());
        let jwt = JwtService::from_config(&config)?;
        let state = AppState::new(store.clone(), files, config, jwt);
        let router = routes::create_router(state.clone());

        Ok(Self {
            state,
            router,
            store,
            _documents: documents,
        })
    }

    pub fn store(&self) -> &MemoryRequestStore {
        &self.store
    }

    pub fn roots(&self) -> &DocumentRoots {
        self.state.roots()
    }

    pub fn token(&self, login: &str, role: Role, cpf: Option<&str>) -> Result<String> {
        self.state.jwt.generate_token(login, role, cpf)
    }

    pub fn consultant_token(&self) -> Result<String> {
        self.token("consultor1", Role::Consultant, None)
    }

    #[allow(dead_code)]
    pub fn put_file(&self, root: &Path, protocol: &str, name: &str, bytes: &[u8]) -> Result<()> {
        let dir = root.join(protocol);
        std::fs::create_dir_all(&dir)?;
        std::fs::write(dir.join(name), bytes)?;
        Ok(())
    }

    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        let body = serde_json::to_vec(payload)?;
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri(path)
            .header("content-type", "application/json");
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let request = builder.body(Body::from(body))?;
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }

    pub async fn get(&self, path: &str, token: Option<&str>) -> Result<hyper::Response<Body>> {
        let mut builder = Request::builder().method(Method::GET).uri(path);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let request = builder.body(Body::empty())?;
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }

    #[allow(dead_code)]
    pub async fn post_multipart(
        &self,
        path: &str,
        fields: &[(&str, &str)],
        file: Option<(&str, &[u8])>,
        token: &str,
    ) -> Result<hyper::Response<Body>> {
        let boundary = MULTIPART_BOUNDARY;
        let mut body = Vec::new();
        for (name, value) in fields {
            body.extend(format!("--{boundary}\r\n").as_bytes());
            body.extend(
                format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
            );
            body.extend(value.as_bytes());
            body.extend(b"\r\n");
        }

        if let Some((filename, data)) = file {
            body.extend(format!("--{boundary}\r\n").as_bytes());
            body.extend(
                format!(
                    "Content-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\n",
                    filename
                )
                .as_bytes(),
            );
            body.extend(b"Content-Type: application/pdf\r\n\r\n");
            body.extend(data);
            body.extend(b"\r\n");
        }

        body.extend(format!("--{boundary}--\r\n").as_bytes());

        let request = Request::builder()
            .method(Method::POST)
            .uri(path)
            .header(
                "content-type",
                format!("multipart/form-data; boundary={boundary}"),
            )
            .header("authorization", format!("Bearer {token}"))
            .body(Body::from(body))?;
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }
}

pub async fn body_to_vec(body: Body) -> Result<Vec<u8>> {
    let collected = body
        .collect()
        .await
        .map_err(|err| anyhow!("failed to read response body: {err}"))?;
    Ok(collected.to_bytes().to_vec())
}

#[allow(dead_code)]
pub async fn body_json<T: DeserializeOwned>(body: Body) -> Result<T> {
    let bytes = body_to_vec(body).await?;
    serde_json::from_slice(&bytes).context("response body is not the expected JSON")
}

#[allow(dead_code)]
pub async fn acquire_db_lock() -> tokio::sync::MutexGuard<'static, ()> {
    DB_LOCK.lock().await
}

/// Pool over `TEST_DATABASE_URL` with migrations applied and request tables emptied, or
/// `None` when no test database is configured.
#[allow(dead_code)]
pub async fn test_pool() -> Result<Option<PgPool>> {
    let Ok(database_url) = env::var("TEST_DATABASE_URL") else {
        return Ok(None);
    };
    let pool = db::init_pool(&database_url)?;
    let prepared = pool.clone();
    tokio::task::spawn_blocking(move || -> Result<()> {
        let mut conn = prepared
            .get()
            .map_err(|err| anyhow!("failed to acquire connection: {err}"))?;
        conn.run_pending_migrations(MIGRATIONS)
            .map_err(|err| anyhow!("failed to run migrations: {err}"))?;
        truncate_all(&mut conn)?;
        Ok(())
    })
    .await
    .context("migration task panicked")??;
    Ok(Some(pool))
}

fn truncate_all(conn: &mut PgConnection) -> Result<()> {
    conn.batch_execute(
        "TRUNCATE TABLE request_documents, requests_admissional, requests_periodic, \
         requests_dismissal, requests_return_to_work, requests_medical_evaluation, \
         requests_risk_change RESTART IDENTITY CASCADE;",
    )
    .context("failed to truncate tables")?;
    Ok(())
}
