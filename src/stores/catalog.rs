use chrono::Utc;
use serde::Deserialize;
use sqlx::SqlitePool;

use crate::{
    auth::{new_id, Session},
    error::{AppError, AppResult},
    models::{Role, Service, ServiceStatus},
};

pub const PAGE_SIZE: usize = 12;
pub const DEFAULT_MAX_PRICE: f64 = 5000.0;

pub const CATEGORIES: &[&str] = &[
    "cleaning",
    "plumbing",
    "electrical",
    "gardening",
    "fitness",
    "beauty",
    "other",
];

pub(crate) const SERVICE_COLUMNS: &str = "id, name, description, price, duration, category, \
     provider_id, provider_name, business_name, status, rating, review_count, created_at, updated_at";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewService {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price: f64,
    pub duration: i64,
    pub category: String,
    pub status: Option<ServiceStatus>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServicePatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<f64>,
    pub duration: Option<i64>,
    pub category: Option<String>,
    pub status: Option<ServiceStatus>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceSort {
    #[default]
    Relevance,
    Newest,
    PriceAsc,
    PriceDesc,
    RatingDesc,
}

impl ServiceSort {
    fn order_by(self) -> &'static str {
        match self {
            ServiceSort::Relevance | ServiceSort::Newest => "created_at DESC",
            ServiceSort::PriceAsc => "price ASC, created_at DESC",
            ServiceSort::PriceDesc => "price DESC, created_at DESC",
            ServiceSort::RatingDesc => "COALESCE(rating, 0) DESC, created_at DESC",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurationBucket {
    Short,
    Medium,
    Long,
}

impl DurationBucket {
    fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "short" => Some(DurationBucket::Short),
            "medium" => Some(DurationBucket::Medium),
            "long" => Some(DurationBucket::Long),
            _ => None,
        }
    }

    fn contains(self, minutes: i64) -> bool {
        match self {
            DurationBucket::Short => minutes <= 60,
            DurationBucket::Medium => minutes > 60 && minutes <= 120,
            DurationBucket::Long => minutes > 120,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceQuery {
    pub category: Option<String>,
    pub search: Option<String>,
    #[serde(default)]
    pub sort: ServiceSort,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub min_rating: Option<f64>,
    /// Comma separated `short`, `medium`, `long`.
    pub duration: Option<String>,
    #[serde(default)]
    pub offset: usize,
}

impl ServiceQuery {
    fn category_filter(&self) -> Option<&str> {
        self.category
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty() && *value != "all")
    }

    fn durations(&self) -> Vec<DurationBucket> {
        self.duration
            .as_deref()
            .map(|raw| raw.split(',').filter_map(DurationBucket::parse).collect())
            .unwrap_or_default()
    }

    pub fn matches(&self, service: &Service) -> bool {
        if let Some(term) = self
            .search
            .as_deref()
            .map(|term| term.trim().to_lowercase())
            .filter(|term| !term.is_empty())
        {
            let hit = service.name.to_lowercase().contains(&term)
                || service.description.to_lowercase().contains(&term)
                || service
                    .business_name
                    .as_deref()
                    .is_some_and(|name| name.to_lowercase().contains(&term));
            if !hit {
                return false;
            }
        }

        let min_price = self.min_price.unwrap_or(0.0);
        let max_price = self.max_price.unwrap_or(DEFAULT_MAX_PRICE);
        if service.price < min_price || service.price > max_price {
            return false;
        }

        if let Some(min_rating) = self.min_rating.filter(|value| *value > 0.0) {
            if service.rating.unwrap_or(0.0) < min_rating {
                return false;
            }
        }

        let durations = self.durations();
        durations.is_empty() || durations.iter().any(|bucket| bucket.contains(service.duration))
    }
}

fn validate(name: &str, category: &str, price: f64, duration: i64) -> AppResult<()> {
    if name.trim().is_empty() {
        return Err(AppError::validation("Service name is required."));
    }
    if category.trim().is_empty() {
        return Err(AppError::validation("Category is required."));
    }
    if !CATEGORIES.contains(&category) {
        return Err(AppError::validation(format!(
            "Category must be one of: {}.",
            CATEGORIES.join(", ")
        )));
    }
    if !price.is_finite() || price < 0.0 {
        return Err(AppError::validation("Price must be zero or more."));
    }
    if duration <= 0 {
        return Err(AppError::validation("Duration must be at least one minute."));
    }
    Ok(())
}

pub async fn create_service(
    pool: &SqlitePool,
    session: &Session,
    input: NewService,
) -> AppResult<Service> {
    session.require(Role::Provider)?;
    validate(&input.name, &input.category, input.price, input.duration)?;

    let now = Utc::now();
    let service = Service {
        id: new_id(),
        name: input.name.trim().to_string(),
        description: input.description.trim().to_string(),
        price: input.price,
        duration: input.duration,
        category: input.category,
        provider_id: session.user_id.clone(),
        provider_name: session.display_name.clone(),
        business_name: session.business_name.clone(),
        status: input.status.unwrap_or(ServiceStatus::Active),
        rating: None,
        review_count: 0,
        created_at: now,
        updated_at: now,
    };

    sqlx::query(&format!(
        "INSERT INTO services ({SERVICE_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
    ))
    .bind(&service.id)
    .bind(&service.name)
    .bind(&service.description)
    .bind(service.price)
    .bind(service.duration)
    .bind(&service.category)
    .bind(&service.provider_id)
    .bind(&service.provider_name)
    .bind(&service.business_name)
    .bind(service.status)
    .bind(service.rating)
    .bind(service.review_count)
    .bind(service.created_at)
    .bind(service.updated_at)
    .execute(pool)
    .await?;

    log::info!("{} listed service {}", session.display_name, service.id);
    Ok(service)
}

pub async fn get_service(pool: &SqlitePool, service_id: &str) -> AppResult<Option<Service>> {
    let service = sqlx::query_as::<_, Service>(&format!(
        "SELECT {SERVICE_COLUMNS} FROM services WHERE id = ?"
    ))
    .bind(service_id)
    .fetch_optional(pool)
    .await?;
    Ok(service)
}

async fn owned_service(pool: &SqlitePool, session: &Session, service_id: &str) -> AppResult<Service> {
    let service = get_service(pool, service_id)
        .await?
        .ok_or(AppError::NotFound("service"))?;
    if service.provider_id != session.user_id {
        log::warn!("{} tried to modify service {service_id} they do not own", session.user_id);
        return Err(AppError::Forbidden);
    }
    Ok(service)
}

pub async fn update_service(
    pool: &SqlitePool,
    session: &Session,
    service_id: &str,
    patch: ServicePatch,
) -> AppResult<Service> {
    let mut service = owned_service(pool, session, service_id).await?;

    if let Some(name) = patch.name {
        service.name = name.trim().to_string();
    }
    if let Some(description) = patch.description {
        service.description = description.trim().to_string();
    }
    if let Some(price) = patch.price {
        service.price = price;
    }
    if let Some(duration) = patch.duration {
        service.duration = duration;
    }
    if let Some(category) = patch.category {
        service.category = category;
    }
    if let Some(status) = patch.status {
        service.status = status;
    }
    validate(&service.name, &service.category, service.price, service.duration)?;
    service.updated_at = Utc::now();

    sqlx::query(
        r#"UPDATE services
           SET name = ?, description = ?, price = ?, duration = ?, category = ?, status = ?, updated_at = ?
           WHERE id = ?"#,
    )
    .bind(&service.name)
    .bind(&service.description)
    .bind(service.price)
    .bind(service.duration)
    .bind(&service.category)
    .bind(service.status)
    .bind(service.updated_at)
    .bind(&service.id)
    .execute(pool)
    .await?;

    Ok(service)
}

pub async fn delete_service(pool: &SqlitePool, session: &Session, service_id: &str) -> AppResult<()> {
    owned_service(pool, session, service_id).await?;
    sqlx::query("DELETE FROM services WHERE id = ?")
        .bind(service_id)
        .execute(pool)
        .await?;
    log::info!("{} removed service {service_id}", session.display_name);
    Ok(())
}

pub async fn services_by_provider(pool: &SqlitePool, provider_id: &str) -> AppResult<Vec<Service>> {
    let services = sqlx::query_as::<_, Service>(&format!(
        "SELECT {SERVICE_COLUMNS} FROM services WHERE provider_id = ? ORDER BY created_at DESC"
    ))
    .bind(provider_id)
    .fetch_all(pool)
    .await?;
    Ok(services)
}

/// Active services matching `query`, one page of [`PAGE_SIZE`] starting at
/// `query.offset`.
pub async fn browse(pool: &SqlitePool, query: &ServiceQuery) -> AppResult<Vec<Service>> {
    let order_by = query.sort.order_by();
    let rows = match query.category_filter() {
        Some(category) => {
            sqlx::query_as::<_, Service>(&format!(
                "SELECT {SERVICE_COLUMNS} FROM services WHERE status = ? AND category = ? ORDER BY {order_by}"
            ))
            .bind(ServiceStatus::Active)
            .bind(category.to_lowercase())
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query_as::<_, Service>(&format!(
                "SELECT {SERVICE_COLUMNS} FROM services WHERE status = ? ORDER BY {order_by}"
            ))
            .bind(ServiceStatus::Active)
            .fetch_all(pool)
            .await?
        }
    };

    Ok(rows
        .into_iter()
        .filter(|service| query.matches(service))
        .skip(query.offset)
        .take(PAGE_SIZE)
        .collect())
}
