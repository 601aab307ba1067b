use chrono::Utc;
use serde::Deserialize;
use sqlx::SqlitePool;

use crate::{
    auth::Session,
    error::{AppError, AppResult},
    models::{Role, User},
};

const USER_COLUMNS: &str =
    "id, email, display_name, role, business_name, phone, address, bio, created_at, updated_at";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    pub display_name: Option<String>,
    pub business_name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub bio: Option<String>,
}

pub async fn get_profile(pool: &SqlitePool, user_id: &str) -> AppResult<Option<User>> {
    let user = sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"))
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
    Ok(user)
}

/// Public provider page. Other roles are not exposed.
pub async fn provider_profile(pool: &SqlitePool, provider_id: &str) -> AppResult<User> {
    get_profile(pool, provider_id)
        .await?
        .filter(|user| user.role == Role::Provider)
        .ok_or(AppError::NotFound("provider"))
}

fn optional(value: String) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

pub async fn update_profile(pool: &SqlitePool, session: &Session, update: ProfileUpdate) -> AppResult<User> {
    let mut user = get_profile(pool, &session.user_id)
        .await?
        .ok_or(AppError::NotFound("profile"))?;

    if let Some(name) = update.display_name {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(AppError::validation("Full name is required."));
        }
        user.display_name = name;
    }
    if let Some(business) = update.business_name {
        if user.role != Role::Provider {
            return Err(AppError::validation("Only providers have a business name."));
        }
        user.business_name = optional(business);
    }
    if let Some(phone) = update.phone {
        user.phone = optional(phone);
    }
    if let Some(address) = update.address {
        user.address = optional(address);
    }
    if let Some(bio) = update.bio {
        user.bio = optional(bio);
    }
    user.updated_at = Utc::now();

    sqlx::query(
        r#"UPDATE users
           SET display_name = ?, business_name = ?, phone = ?, address = ?, bio = ?, updated_at = ?
           WHERE id = ?"#,
    )
    .bind(&user.display_name)
    .bind(&user.business_name)
    .bind(&user.phone)
    .bind(&user.address)
    .bind(&user.bio)
    .bind(user.updated_at)
    .bind(&user.id)
    .execute(pool)
    .await?;

    log::info!("{} updated their profile", user.email);
    Ok(user)
}

pub async fn list_users(pool: &SqlitePool, session: &Session) -> AppResult<Vec<User>> {
    session.require(Role::Admin)?;
    let users = sqlx::query_as::<_, User>(&format!(
        "SELECT {USER_COLUMNS} FROM users ORDER BY created_at DESC"
    ))
    .fetch_all(pool)
    .await?;
    Ok(users)
}
