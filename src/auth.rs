use actix_web::{
    body::BoxBody,
    cookie::{time::Duration, Cookie, SameSite},
    dev::{ServiceRequest, ServiceResponse},
    error::ErrorUnauthorized,
    http::header,
    middleware::Next,
    web, Error, HttpMessage, HttpRequest, HttpResponse,
};
use actix_web_httpauth::extractors::basic::BasicAuth;
use argon2::{
    password_hash::{self, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::Utc;
use rand_core::OsRng;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::Role,
    state::AppState,
    stores::is_unique_violation,
};

pub const AUTH_REALM: &str = "Fix-it";
const LOGOUT_COOKIE: &str = "fixit_logged_out";
const MIN_PASSWORD_LEN: usize = 6;

/// The signed-in caller. Every store operation that acts on behalf of a user
/// takes one of these instead of reading ambient state.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub user_id: String,
    pub email: String,
    pub display_name: String,
    pub role: Role,
    pub business_name: Option<String>,
}

impl Session {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn require(&self, role: Role) -> AppResult<()> {
        if self.role == role {
            Ok(())
        } else {
            Err(AppError::Forbidden)
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignUp {
    pub email: String,
    pub password: String,
    pub confirm_password: String,
    pub display_name: String,
    pub role: Role,
    pub business_name: Option<String>,
}

#[derive(sqlx::FromRow)]
struct IdentityRow {
    id: String,
    email: String,
    password_hash: String,
    display_name: String,
    role: Role,
    business_name: Option<String>,
}

impl From<IdentityRow> for Session {
    fn from(row: IdentityRow) -> Self {
        Session {
            user_id: row.id,
            email: row.email,
            display_name: row.display_name,
            role: row.role,
            business_name: row.business_name,
        }
    }
}

const IDENTITY_SELECT: &str = r#"SELECT i.id, i.email, i.password_hash,
                  u.display_name, u.role, u.business_name
           FROM identities i
           JOIN users u ON u.id = i.id"#;

pub fn hash_password(password: &str) -> Result<String, password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default().hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

fn verify_password(password: &str, password_hash: &str) -> bool {
    let parsed_hash = PasswordHash::new(password_hash);
    match parsed_hash {
        Ok(hash) => Argon2::default()
            .verify_password(password.as_bytes(), &hash)
            .is_ok(),
        Err(_) => false,
    }
}

pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn validate_password(password: &str, confirm: &str) -> AppResult<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::validation(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters."
        )));
    }
    if password != confirm {
        return Err(AppError::validation("Passwords do not match."));
    }
    Ok(())
}

pub async fn sign_up(pool: &SqlitePool, form: SignUp) -> AppResult<Session> {
    let email = normalize_email(&form.email);
    let display_name = form.display_name.trim().to_string();
    if display_name.is_empty() {
        return Err(AppError::validation("Full name is required."));
    }
    if !email.contains('@') {
        return Err(AppError::validation("A valid email is required."));
    }
    validate_password(&form.password, &form.confirm_password)?;

    let business_name = match form.role {
        Role::Client => None,
        Role::Provider => {
            let name = form.business_name.unwrap_or_default().trim().to_string();
            if name.is_empty() {
                return Err(AppError::validation("Business name is required for providers."));
            }
            Some(name)
        }
        Role::Admin => return Err(AppError::validation("Admin accounts cannot sign up.")),
    };

    create_identity(pool, &email, &form.password, &display_name, form.role, business_name).await
}

/// Writes the identity and its profile row together. Also used to seed the admin.
pub async fn create_identity(
    pool: &SqlitePool,
    email: &str,
    password: &str,
    display_name: &str,
    role: Role,
    business_name: Option<String>,
) -> AppResult<Session> {
    let taken = sqlx::query_scalar::<_, String>("SELECT id FROM identities WHERE email = ?")
        .bind(email)
        .fetch_optional(pool)
        .await?;
    if taken.is_some() {
        return Err(AppError::conflict("An account with this email already exists."));
    }

    let password_hash = hash_password(password).map_err(|_| AppError::PasswordHash)?;
    let id = new_id();
    let now = Utc::now();

    let mut tx = pool.begin().await?;
    let inserted = sqlx::query(
        r#"INSERT INTO identities (id, email, password_hash, created_at)
           VALUES (?, ?, ?, ?)"#,
    )
    .bind(&id)
    .bind(email)
    .bind(password_hash)
    .bind(now)
    .execute(&mut *tx)
    .await;
    match inserted {
        // Lost a race with another sign-up for the same address.
        Err(err) if is_unique_violation(&err) => {
            return Err(AppError::conflict("An account with this email already exists."));
        }
        other => {
            other?;
        }
    }

    sqlx::query(
        r#"INSERT INTO users (id, email, display_name, role, business_name, created_at, updated_at)
           VALUES (?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&id)
    .bind(email)
    .bind(display_name)
    .bind(role)
    .bind(&business_name)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;

    log::info!("New {} account {email}", role.as_str());

    Ok(Session {
        user_id: id,
        email: email.to_string(),
        display_name: display_name.to_string(),
        role,
        business_name,
    })
}

pub async fn sign_in(pool: &SqlitePool, email: &str, password: &str) -> Option<Session> {
    let row = sqlx::query_as::<_, IdentityRow>(&format!("{IDENTITY_SELECT} WHERE i.email = ? LIMIT 1"))
        .bind(normalize_email(email))
        .fetch_optional(pool)
        .await
        .map_err(|err| log::error!("Sign-in lookup failed: {err}"))
        .ok()??;

    if !verify_password(password, &row.password_hash) {
        return None;
    }

    Some(row.into())
}

pub async fn current_user(pool: &SqlitePool, user_id: &str) -> AppResult<Option<Session>> {
    let row = sqlx::query_as::<_, IdentityRow>(&format!("{IDENTITY_SELECT} WHERE i.id = ? LIMIT 1"))
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(Session::from))
}

pub async fn change_password(
    pool: &SqlitePool,
    session: &Session,
    current: &str,
    new_password: &str,
    confirm: &str,
) -> AppResult<()> {
    let stored = sqlx::query_scalar::<_, String>("SELECT password_hash FROM identities WHERE id = ?")
        .bind(&session.user_id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("account"))?;

    if !verify_password(current, &stored) {
        return Err(AppError::validation("Current password is incorrect."));
    }
    validate_password(new_password, confirm)?;

    let password_hash = hash_password(new_password).map_err(|_| AppError::PasswordHash)?;
    sqlx::query("UPDATE identities SET password_hash = ? WHERE id = ?")
        .bind(password_hash)
        .bind(&session.user_id)
        .execute(pool)
        .await?;
    Ok(())
}

async fn authenticate(req: &ServiceRequest, credentials: &BasicAuth) -> Result<Session, Error> {
    let state = req
        .app_data::<web::Data<AppState>>()
        .ok_or_else(|| ErrorUnauthorized("Unauthorized"))?;
    let email = credentials.user_id();
    let password = credentials.password().unwrap_or_default();
    sign_in(&state.db, email, password)
        .await
        .ok_or_else(|| ErrorUnauthorized("Unauthorized"))
}

async fn validate_role(
    req: ServiceRequest,
    credentials: BasicAuth,
    role: Option<Role>,
) -> Result<ServiceRequest, (Error, ServiceRequest)> {
    match authenticate(&req, &credentials).await {
        Ok(session) => {
            if let Some(role) = role {
                if session.role != role {
                    let message = format!("{} access required", role.as_str());
                    return Err((ErrorUnauthorized(message), req));
                }
            }
            req.extensions_mut().insert(session);
            Ok(req)
        }
        Err(err) => Err((err, req)),
    }
}

pub async fn basic_validator(
    req: ServiceRequest,
    credentials: BasicAuth,
) -> Result<ServiceRequest, (Error, ServiceRequest)> {
    validate_role(req, credentials, None).await
}

pub async fn client_validator(
    req: ServiceRequest,
    credentials: BasicAuth,
) -> Result<ServiceRequest, (Error, ServiceRequest)> {
    validate_role(req, credentials, Some(Role::Client)).await
}

pub async fn provider_validator(
    req: ServiceRequest,
    credentials: BasicAuth,
) -> Result<ServiceRequest, (Error, ServiceRequest)> {
    validate_role(req, credentials, Some(Role::Provider)).await
}

pub async fn admin_validator(
    req: ServiceRequest,
    credentials: BasicAuth,
) -> Result<ServiceRequest, (Error, ServiceRequest)> {
    validate_role(req, credentials, Some(Role::Admin)).await
}

pub fn logout_cookie(req: &HttpRequest) -> Cookie<'static> {
    let mut builder = Cookie::build(LOGOUT_COOKIE, "1")
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(Duration::days(365));
    if req.connection_info().scheme() == "https" {
        builder = builder.secure(true);
    }
    builder.finish()
}

pub fn clear_logout_cookie(req: &HttpRequest) -> Cookie<'static> {
    let mut builder = Cookie::build(LOGOUT_COOKIE, "")
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(Duration::seconds(0));
    if req.connection_info().scheme() == "https" {
        builder = builder.secure(true);
    }
    builder.finish()
}

pub fn is_logged_out(req: &HttpRequest) -> bool {
    req.cookie(LOGOUT_COOKIE).is_some()
}

/// Rejects requests carrying the sign-out marker even if the browser still
/// replays cached Basic credentials.
pub async fn logout_guard<B>(
    req: ServiceRequest,
    next: Next<B>,
) -> Result<ServiceResponse<BoxBody>, Error>
where
    B: actix_web::body::MessageBody + 'static,
{
    if is_logged_out(req.request()) {
        let response = HttpResponse::Unauthorized()
            .insert_header((header::CACHE_CONTROL, "no-store"))
            .json(json!({ "error": "signed out", "login": "/login" }));
        return Ok(req.into_response(response));
    }

    let res = next.call(req).await?;
    Ok(res.map_into_boxed_body())
}
