use chrono::Utc;
use sqlx::SqlitePool;

use crate::{
    auth::{new_id, Session},
    error::{AppError, AppResult},
    models::{Favorite, FavoriteKind, Role, Service, User},
    stores::{catalog, profiles},
};

const FAVORITE_COLUMNS: &str = "id, user_id, kind, item_id, item_name, created_at";

async fn item_name(pool: &SqlitePool, kind: FavoriteKind, item_id: &str) -> AppResult<String> {
    match kind {
        FavoriteKind::Service => catalog::get_service(pool, item_id)
            .await?
            .map(|service| service.name)
            .ok_or(AppError::NotFound("service")),
        FavoriteKind::Provider => {
            let provider = profiles::provider_profile(pool, item_id).await?;
            Ok(provider.business_name.unwrap_or(provider.display_name))
        }
    }
}

async fn find(
    pool: &SqlitePool,
    user_id: &str,
    kind: FavoriteKind,
    item_id: &str,
) -> AppResult<Option<Favorite>> {
    let favorite = sqlx::query_as::<_, Favorite>(&format!(
        "SELECT {FAVORITE_COLUMNS} FROM favorites WHERE user_id = ? AND kind = ? AND item_id = ?"
    ))
    .bind(user_id)
    .bind(kind)
    .bind(item_id)
    .fetch_optional(pool)
    .await?;
    Ok(favorite)
}

/// Saves an item for the client. Returns the stored favorite and whether it
/// was already there.
pub async fn add_favorite(
    pool: &SqlitePool,
    session: &Session,
    kind: FavoriteKind,
    item_id: &str,
) -> AppResult<(Favorite, bool)> {
    session.require(Role::Client)?;
    let item_name = item_name(pool, kind, item_id).await?;

    let favorite = Favorite {
        id: new_id(),
        user_id: session.user_id.clone(),
        kind,
        item_id: item_id.to_string(),
        item_name,
        created_at: Utc::now(),
    };
    let inserted = sqlx::query(&format!(
        "INSERT INTO favorites ({FAVORITE_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?) \
         ON CONFLICT (user_id, kind, item_id) DO NOTHING"
    ))
    .bind(&favorite.id)
    .bind(&favorite.user_id)
    .bind(favorite.kind)
    .bind(&favorite.item_id)
    .bind(&favorite.item_name)
    .bind(favorite.created_at)
    .execute(pool)
    .await?;

    if inserted.rows_affected() == 1 {
        return Ok((favorite, false));
    }
    let existing = find(pool, &session.user_id, kind, item_id)
        .await?
        .ok_or(AppError::NotFound("favorite"))?;
    Ok((existing, true))
}

pub async fn remove_favorite(pool: &SqlitePool, session: &Session, favorite_id: &str) -> AppResult<()> {
    let owner = sqlx::query_scalar::<_, String>("SELECT user_id FROM favorites WHERE id = ?")
        .bind(favorite_id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("favorite"))?;
    if owner != session.user_id {
        return Err(AppError::Forbidden);
    }

    sqlx::query("DELETE FROM favorites WHERE id = ?")
        .bind(favorite_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn favorites_for(
    pool: &SqlitePool,
    session: &Session,
    kind: Option<FavoriteKind>,
) -> AppResult<Vec<Favorite>> {
    let favorites = sqlx::query_as::<_, Favorite>(&format!(
        "SELECT {FAVORITE_COLUMNS} FROM favorites WHERE user_id = ? ORDER BY created_at DESC"
    ))
    .bind(&session.user_id)
    .fetch_all(pool)
    .await?;
    Ok(favorites
        .into_iter()
        .filter(|favorite| kind.map_or(true, |kind| favorite.kind == kind))
        .collect())
}

/// Saved services that still exist.
pub async fn favorite_services(pool: &SqlitePool, session: &Session) -> AppResult<Vec<Service>> {
    let mut services = Vec::new();
    for favorite in favorites_for(pool, session, Some(FavoriteKind::Service)).await? {
        match catalog::get_service(pool, &favorite.item_id).await? {
            Some(service) => services.push(service),
            None => log::debug!("Skipping dangling favorite {}", favorite.id),
        }
    }
    Ok(services)
}

/// Saved providers that still exist.
pub async fn favorite_providers(pool: &SqlitePool, session: &Session) -> AppResult<Vec<User>> {
    let mut providers = Vec::new();
    for favorite in favorites_for(pool, session, Some(FavoriteKind::Provider)).await? {
        match profiles::provider_profile(pool, &favorite.item_id).await {
            Ok(provider) => providers.push(provider),
            Err(AppError::NotFound(_)) => log::debug!("Skipping dangling favorite {}", favorite.id),
            Err(err) => return Err(err),
        }
    }
    Ok(providers)
}
