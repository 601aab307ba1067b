//! Shared fixtures for the store and route tests.

use std::path::PathBuf;

use actix_web_httpauth::headers::authorization::{Authorization, Basic};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};

use crate::{
    auth::{create_identity, Session},
    db,
    models::{Role, Service},
    stores::catalog::{self, NewService},
};

pub const PASSWORD: &str = "hunter22";

/// A fresh in-memory database with the real migrations applied. A single
/// connection keeps every query on the same in-memory database.
pub async fn test_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory database");
    db::run_migrations(&pool).await.expect("migrations");
    pool
}

/// A database file with several connections, built like the server's pool,
/// so concurrent writes really contend for the lock. The files go away on drop.
pub struct FileDb {
    pub pool: SqlitePool,
    path: PathBuf,
}

impl Drop for FileDb {
    fn drop(&mut self) {
        for suffix in ["", "-journal", "-wal", "-shm"] {
            let _ = std::fs::remove_file(format!("{}{suffix}", self.path.display()));
        }
    }
}

pub async fn file_db() -> FileDb {
    let path = std::env::temp_dir().join(format!("fixit-test-{}.db", uuid::Uuid::new_v4()));
    let options = SqliteConnectOptions::new()
        .filename(&path)
        .create_if_missing(true)
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .expect("file database");
    db::run_migrations(&pool).await.expect("migrations");
    FileDb { pool, path }
}

pub async fn client(pool: &SqlitePool, email: &str) -> Session {
    let name = email.split('@').next().unwrap_or(email).to_string();
    create_identity(pool, email, PASSWORD, &name, Role::Client, None)
        .await
        .expect("client account")
}

pub async fn provider(pool: &SqlitePool, email: &str, business: &str) -> Session {
    let name = email.split('@').next().unwrap_or(email).to_string();
    create_identity(pool, email, PASSWORD, &name, Role::Provider, Some(business.to_string()))
        .await
        .expect("provider account")
}

pub async fn admin(pool: &SqlitePool) -> Session {
    create_identity(pool, "admin@example.com", PASSWORD, "Admin", Role::Admin, None)
        .await
        .expect("admin account")
}

pub async fn listing(pool: &SqlitePool, provider: &Session, price: f64) -> Service {
    listing_named(pool, provider, "Deep clean", price).await
}

pub async fn listing_named(pool: &SqlitePool, provider: &Session, name: &str, price: f64) -> Service {
    let input = NewService {
        name: name.to_string(),
        description: format!("{name} by a pro"),
        price,
        duration: 90,
        category: "cleaning".to_string(),
        status: None,
    };
    catalog::create_service(pool, provider, input)
        .await
        .expect("service listing")
}

/// `Authorization` header for a fixture account.
pub fn basic_auth(email: &str) -> Authorization<Basic> {
    Authorization::from(Basic::new(email.to_string(), Some(PASSWORD)))
}
