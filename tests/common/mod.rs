use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, ensure, Context, Result};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use correction_orders::auth::jwt::JwtService;
use correction_orders::auth::password::hash_password;
use correction_orders::config::{AppConfig, DEFAULT_MAX_UPLOAD_BYTES};
use correction_orders::db::{self, PgPool};
use correction_orders::models::{CorrectionOrder, NewUser};
use correction_orders::notifications::{Delivery, Notifier, OutboundMessage};
use correction_orders::routes;
use correction_orders::state::AppState;
use correction_orders::storage::{reference_for, FileStorage};
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::PgConnection;
use http_body_util::BodyExt;
use once_cell::sync::Lazy;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::Mutex;
use tower::util::ServiceExt;
use uuid::Uuid;

pub const BOT_SECRET: &str = "test-bot-secret";

static DB_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

#[derive(Default)]
pub struct FakeStorage {
    files: Mutex<HashMap<String, Vec<u8>>>,
}

#[async_trait]
impl FileStorage for FakeStorage {
    async fn store(&self, prefix: &str, extension: &str, bytes: Vec<u8>) -> Result<String> {
        let reference = reference_for(&format!("{prefix}{}.{extension}", Uuid::new_v4()));
        let mut guard = self.files.lock().await;
        guard.insert(reference.clone(), bytes);
        Ok(reference)
    }

    async fn read(&self, reference: &str) -> Result<Option<Vec<u8>>> {
        let guard = self.files.lock().await;
        Ok(guard.get(reference).cloned())
    }

    async fn remove(&self, reference: &str) -> Result<()> {
        let mut guard = self.files.lock().await;
        guard.remove(reference);
        Ok(())
    }

    async fn exists(&self, reference: &str) -> Result<bool> {
        let guard = self.files.lock().await;
        Ok(guard.contains_key(reference))
    }

    async fn list(&self) -> Result<Vec<String>> {
        let guard = self.files.lock().await;
        let mut references: Vec<String> = guard.keys().cloned().collect();
        references.sort();
        Ok(references)
    }
}

impl FakeStorage {
    #[allow(dead_code)]
    pub async fn contains(&self, reference: &str) -> bool {
        let guard = self.files.lock().await;
        guard.contains_key(reference)
    }

    #[allow(dead_code)]
    pub async fn file_count(&self) -> usize {
        let guard = self.files.lock().await;
        guard.len()
    }
}

#[allow(dead_code)]
#[derive(Debug, Clone, PartialEq)]
pub enum Sent {
    Text(OutboundMessage),
    WithPhotos(OutboundMessage, Vec<String>),
    Deleted { chat_id: i64, message_id: i64 },
}

/// Notifier that records every call and hands out increasing message ids.
pub struct RecordingNotifier {
    calls: Mutex<Vec<Sent>>,
    next_message_id: Mutex<i64>,
}

impl Default for RecordingNotifier {
    fn default() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            next_message_id: Mutex::new(500),
        }
    }
}

impl RecordingNotifier {
    #[allow(dead_code)]
    pub async fn calls(&self) -> Vec<Sent> {
        self.calls.lock().await.clone()
    }

    async fn issue_id(&self) -> i64 {
        let mut guard = self.next_message_id.lock().await;
        *guard += 1;
        *guard
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, message: OutboundMessage) -> Delivery {
        self.calls.lock().await.push(Sent::Text(message));
        Delivery::Delivered {
            message_id: self.issue_id().await,
            companion_ids: Vec::new(),
        }
    }

    async fn send_with_photos(&self, message: OutboundMessage, photos: &[String]) -> Delivery {
        self.calls
            .lock()
            .await
            .push(Sent::WithPhotos(message, photos.to_vec()));
        let mut companion_ids = Vec::new();
        if photos.len() > 1 {
            for _ in photos {
                companion_ids.push(self.issue_id().await);
            }
        }
        Delivery::Delivered {
            message_id: self.issue_id().await,
            companion_ids,
        }
    }

    async fn delete_message(&self, chat_id: i64, message_id: i64) {
        self.calls.lock().await.push(Sent::Deleted {
            chat_id,
            message_id,
        });
    }
}

/// A multipart form part: plain text or a file.
#[allow(dead_code)]
pub enum Part<'a> {
    Text(&'a str, String),
    File(&'a str, &'a str, &'a [u8]),
}

#[allow(dead_code)]
pub enum Caller<'a> {
    Anonymous,
    Bot,
    Staff(&'a str),
}

pub struct TestApp {
    pub state: AppState,
    router: Router,
    storage: Arc<FakeStorage>,
    notifier: Arc<RecordingNotifier>,
}

impl TestApp {
    pub async fn new() -> Result<Self> {
        let database_url = env::var("TEST_DATABASE_URL")
            .context("TEST_DATABASE_URL must be set for integration tests")?;

        let config = AppConfig {
            database_url: database_url.clone(),
            database_max_pool_size: db::DEFAULT_MAX_POOL_SIZE,
            server_host: "127.0.0.1".to_string(),
            server_port: 0,
            jwt_secret: "test-secret".to_string(),
            jwt_issuer: "test-issuer".to_string(),
            jwt_audience: "test-audience".to_string(),
            jwt_expiry_minutes: 60,
            refresh_token_expiry_days: 30,
            refresh_cookie_secure: false,
            refresh_cookie_domain: None,
            cors_allowed_origin: None,
            upload_dir: PathBuf::from("uploads"),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            bot_secret_key: BOT_SECRET.to_string(),
            telegram: None,
        };

        let pool = db::init_pool_with_size(&config.database_url, config.database_max_pool_size)?;
        prepare_database(&pool).await?;

        let storage = Arc::new(FakeStorage::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let storage_for_state: Arc<dyn FileStorage> = storage.clone();
        let notifier_for_state: Arc<dyn Notifier> = notifier.clone();
        let jwt = JwtService::from_config(&config)?;
        let state = AppState::new(
            pool.clone(),
            config,
            storage_for_state,
            notifier_for_state,
            jwt,
        );
        let router = routes::create_router(state.clone());

        Ok(Self {
            state,
            router,
            storage,
            notifier,
        })
    }

    pub async fn cleanup(&self) -> Result<()> {
        let pool = self.state.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let mut conn = pool
                .get()
                .map_err(|err| anyhow!("failed to get cleanup connection: {err}"))?;
            truncate_all(&mut conn)?;
            Ok(())
        })
        .await
        .context("cleanup task panicked")?
    }

    #[allow(dead_code)]
    pub fn storage(&self) -> Arc<FakeStorage> {
        self.storage.clone()
    }

    #[allow(dead_code)]
    pub fn notifier(&self) -> Arc<RecordingNotifier> {
        self.notifier.clone()
    }

    pub async fn insert_user(&self, username: &str, password: &str, role: &str) -> Result<Uuid> {
        let username = username.to_string();
        let password = password.to_string();
        let role = role.to_string();
        self.with_conn(move |conn| {
            let password_hash = hash_password(&password)?;
            let user = NewUser {
                id: Uuid::new_v4(),
                username,
                password_hash,
                role,
            };
            diesel::insert_into(correction_orders::schema::users::table)
                .values(&user)
                .execute(conn)
                .context("failed to insert user")?;
            Ok(user.id)
        })
        .await
    }

    #[allow(dead_code)]
    pub async fn load_order(&self, order_id: i64) -> Result<CorrectionOrder> {
        self.with_conn(move |conn| {
            use correction_orders::schema::correction_orders::dsl;
            dsl::correction_orders
                .find(order_id)
                .first::<CorrectionOrder>(conn)
                .context("failed to load order")
        })
        .await
    }

    pub async fn login_token(&self, username: &str, password: &str) -> Result<String> {
        #[derive(Serialize)]
        struct LoginPayload<'a> {
            username: &'a str,
            password: &'a str,
        }

        let response = self
            .post_json(
                "/api/auth/login",
                &LoginPayload { username, password },
                None,
            )
            .await?;

        ensure!(
            response.status() == StatusCode::OK,
            "login failed with status {}",
            response.status()
        );

        let body = body_to_vec(response.into_body()).await?;
        #[derive(serde::Deserialize)]
        struct LoginResponse {
            access_token: String,
        }
        let parsed: LoginResponse = serde_json::from_slice(&body)?;
        Ok(parsed.access_token)
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
        self.send(request).await
    }

    #[allow(dead_code)]
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        caller: Caller<'_>,
    ) -> Result<hyper::Response<Body>> {
        let builder = authorize(Request::builder().method(method).uri(path), caller);
        let request = builder.body(Body::empty())?;
        self.send(request).await
    }

    pub async fn get(&self, path: &str, token: Option<&str>) -> Result<hyper::Response<Body>> {
        let caller = match token {
            Some(token) => Caller::Staff(token),
            None => Caller::Anonymous,
        };
        self.request(Method::GET, path, caller).await
    }

    #[allow(dead_code)]
    pub async fn multipart(
        &self,
        method: Method,
        path: &str,
        caller: Caller<'_>,
        parts: &[Part<'_>],
    ) -> Result<hyper::Response<Body>> {
        let boundary = format!("boundary-{}", Uuid::new_v4());
        let mut body = Vec::new();
        for part in parts {
            body.extend(format!("--{boundary}\r\n").as_bytes());
            match part {
                Part::Text(name, value) => {
                    body.extend(
                        format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n")
                            .as_bytes(),
                    );
                    body.extend(value.as_bytes());
                }
                Part::File(name, filename, data) => {
                    body.extend(
                        format!(
                            "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\n"
                        )
                        .as_bytes(),
                    );
                    body.extend(b"Content-Type: image/jpeg\r\n\r\n");
                    body.extend(*data);
                }
            }
            body.extend(b"\r\n");
        }
        body.extend(format!("--{boundary}--\r\n").as_bytes());

        let builder = Request::builder().method(method).uri(path).header(
            "content-type",
            format!("multipart/form-data; boundary={boundary}"),
        );
        let request = authorize(builder, caller).body(Body::from(body))?;
        self.send(request).await
    }

    async fn send(&self, request: Request<Body>) -> Result<hyper::Response<Body>> {
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }

    async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut PgConnection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.state.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool
                .get()
                .map_err(|err| anyhow!("failed to get database connection: {err}"))?;
            f(&mut conn)
        })
        .await
        .context("connection task panicked")?
    }
}

fn authorize(builder: axum::http::request::Builder, caller: Caller<'_>) -> axum::http::request::Builder {
    match caller {
        Caller::Anonymous => builder,
        Caller::Bot => builder.header("x-bot-secret", BOT_SECRET),
        Caller::Staff(token) => builder.header("authorization", format!("Bearer {token}")),
    }
}

pub async fn acquire_db_lock() -> tokio::sync::MutexGuard<'static, ()> {
    DB_LOCK.lock().await
}

pub async fn body_to_vec(body: Body) -> Result<Vec<u8>> {
    let collected = body
        .collect()
        .await
        .map_err(|err| anyhow!("failed to read response body: {err}"))?;
    Ok(collected.to_bytes().to_vec())
}

#[allow(dead_code)]
pub async fn body_json<T: DeserializeOwned>(response: hyper::Response<Body>) -> Result<T> {
    let body = body_to_vec(response.into_body()).await?;
    Ok(serde_json::from_slice(&body)?)
}

async fn prepare_database(pool: &PgPool) -> Result<()> {
    let pool = pool.clone();
    tokio::task::spawn_blocking(move || -> Result<()> {
        db::run_migrations(&pool)?;
        let mut conn = pool
            .get()
            .map_err(|err| anyhow!("failed to acquire connection: {err}"))?;
        truncate_all(&mut conn)?;
        Ok(())
    })
    .await
    .context("migration task panicked")?
}

fn truncate_all(conn: &mut PgConnection) -> Result<()> {
    conn.batch_execute(
        "TRUNCATE TABLE correction_orders, refresh_tokens, users RESTART IDENTITY CASCADE;",
    )
    .context("failed to truncate tables")?;
    Ok(())
}
