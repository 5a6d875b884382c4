//! Helpers for driving the router in tests.

use axum::{
    body::Body,
    extract::FromRef,
    http::{header, Request, StatusCode},
    Router,
};
use serde_json::Value;
use sqlx::{
    postgres::{PgConnectOptions, PgPoolOptions},
    Connection, Executor, PgConnection, PgPool,
};
use tower::ServiceExt;
use uuid::Uuid;

use crate::{
    app::build_app,
    auth::{jwt::JwtKeys, services::create_user},
    state::{AppState, FakeParts},
};

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub parts: FakeParts,
}

/// A signed-in client: user id plus access token.
pub struct Client {
    pub user_id: Uuid,
    pub token: String,
}

impl TestApp {
    pub fn new() -> Self {
        let (state, parts) = AppState::fake_with_parts();
        Self {
            router: build_app(state.clone()),
            state,
            parts,
        }
    }

    pub async fn client(&self, email: &str) -> Client {
        let user = create_user(self.state.users.as_ref(), email, "sample123", "")
            .await
            .expect("create user");
        let token = JwtKeys::from_ref(&self.state)
            .sign_access(user.id)
            .expect("sign access");
        Client {
            user_id: user.id,
            token,
        }
    }

    pub async fn send(&self, req: Request<Body>) -> (StatusCode, Value) {
        let res = self.router.clone().oneshot(req).await.expect("router is infallible");
        let status = res.status();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
            .await
            .expect("read body");
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }
}

pub fn json_request(method: &str, uri: &str, token: Option<&str>, body: &Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::from(body.to_string())).expect("request")
}

pub fn empty_request(method: &str, uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::empty()).expect("request")
}

/// A throwaway, migrated database on the server named by `TEST_DATABASE_URL`
/// (or `DATABASE_URL`). Each test gets its own, so they can run in parallel.
///
/// With neither variable set, [`TestDb::provision`] prints a
/// `SKIP-TEST-DATABASE` marker and returns `None`; the caller returns early.
pub struct TestDb {
    pub pool: PgPool,
    server_url: String,
    name: String,
}

impl TestDb {
    pub async fn provision() -> Option<Self> {
        let Some(server_url) = std::env::var("TEST_DATABASE_URL")
            .or_else(|_| std::env::var("DATABASE_URL"))
            .ok()
        else {
            eprintln!("SKIP-TEST-DATABASE: TEST_DATABASE_URL is not set");
            return None;
        };

        let name = format!("recipebox_test_{}", Uuid::new_v4().simple());
        let mut admin = PgConnection::connect(&server_url)
            .await
            .expect("connect to test server");
        admin
            .execute(format!(r#"CREATE DATABASE "{}""#, name).as_str())
            .await
            .expect("create test database");
        admin.close().await.ok();

        let options = server_url
            .parse::<PgConnectOptions>()
            .expect("test database url")
            .database(&name);
        let pool = PgPoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await
            .expect("connect to test database");
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .expect("migrate test database");

        Some(Self {
            pool,
            server_url,
            name,
        })
    }

    /// Closes the pool and drops the database. A failing test skips this and
    /// leaves its database behind for inspection.
    pub async fn teardown(self) {
        self.pool.close().await;
        if let Ok(mut admin) = PgConnection::connect(&self.server_url).await {
            let sql = format!(r#"DROP DATABASE IF EXISTS "{}" WITH (FORCE)"#, self.name);
            admin.execute(sql.as_str()).await.ok();
            admin.close().await.ok();
        }
    }
}
