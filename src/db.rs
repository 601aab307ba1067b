use std::{fs, path::Path};

use chrono::{Duration, Utc};
use sqlx::SqlitePool;
use tokio::sync::broadcast;

use crate::{
    auth::{create_identity, Session},
    config::AppConfig,
    error::{AppError, AppResult},
    models::Role,
    state::ServerEvent,
    stores::{
        bookings::{self, NewBooking},
        catalog::{self, NewService},
        reviews::{self, NewReview},
    },
};

const DEMO_PASSWORD: &str = "password123";

pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

pub fn ensure_sqlite_dir(db_url: &str) -> std::io::Result<()> {
    let path = if let Some(path) = db_url.strip_prefix("sqlite://") {
        Some(path)
    } else if let Some(path) = db_url.strip_prefix("sqlite:") {
        Some(path)
    } else {
        None
    };

    let Some(path) = path else {
        return Ok(());
    };

    let path = path.split('?').next().unwrap_or(path);
    if path == ":memory:" || path.is_empty() {
        return Ok(());
    }

    let path = path.strip_prefix("file:").unwrap_or(path);
    let db_path = Path::new(path);
    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

pub async fn seed_defaults(
    pool: &SqlitePool,
    events: &broadcast::Sender<ServerEvent>,
    config: &AppConfig,
) -> AppResult<()> {
    seed_admin(pool, config).await?;
    if config.seed_demo {
        seed_demo(pool, events).await?;
    }
    Ok(())
}

async fn seed_admin(pool: &SqlitePool, config: &AppConfig) -> AppResult<()> {
    let existing = sqlx::query_scalar::<_, String>("SELECT id FROM users WHERE role = ? LIMIT 1")
        .bind(Role::Admin)
        .fetch_optional(pool)
        .await?;
    if existing.is_some() {
        return Ok(());
    }

    if config.admin_password == "admin" {
        log::warn!("ADMIN_PASSWORD not set. Using default password 'admin'. Set ADMIN_PASSWORD in production.");
    }

    create_identity(
        pool,
        &config.admin_email.trim().to_lowercase(),
        &config.admin_password,
        "Super Admin",
        Role::Admin,
        None,
    )
    .await?;
    Ok(())
}

struct DemoProvider {
    email: &'static str,
    name: &'static str,
    business: &'static str,
    services: &'static [(&'static str, &'static str, f64, i64, &'static str)],
}

const DEMO_PROVIDERS: &[DemoProvider] = &[
    DemoProvider {
        email: "john.smith@example.com",
        name: "John Smith",
        business: "Smith's Professional Services",
        services: &[
            ("Basic Home Cleaning", "Dusting, vacuuming, mopping and bathroom cleaning.", 120.0, 120, "cleaning"),
            ("Deep Home Cleaning", "Top-to-bottom clean including appliances and baseboards.", 200.0, 240, "cleaning"),
        ],
    },
    DemoProvider {
        email: "maria.garcia@example.com",
        name: "Maria Garcia",
        business: "Garcia Home Services",
        services: &[
            ("Drain Cleaning", "Clearing clogged sinks, showers and floor drains.", 120.0, 60, "plumbing"),
            ("Faucet Installation", "Remove the old faucet and fit a new one.", 150.0, 90, "plumbing"),
        ],
    },
    DemoProvider {
        email: "david.johnson@example.com",
        name: "David Johnson",
        business: "Johnson's Electrical Solutions",
        services: &[
            ("Outlet Installation", "New outlets, GFCI upgrades and USB outlets.", 90.0, 60, "electrical"),
            ("Lighting Installation", "Ceiling fixtures, pendants and recessed lights.", 160.0, 120, "electrical"),
        ],
    },
    DemoProvider {
        email: "sarah.williams@example.com",
        name: "Sarah Williams",
        business: "Green Thumb Gardening",
        services: &[
            ("Lawn Mowing", "Mowing, edging and clipping cleanup.", 60.0, 60, "gardening"),
        ],
    },
];

const DEMO_CLIENTS: &[(&str, &str)] = &[
    ("emma.thompson@example.com", "Emma Thompson"),
    ("robert.chen@example.com", "Robert Chen"),
];

/// Sample marketplace data, written through the stores so every invariant
/// holds. Skipped when the first demo provider already exists.
async fn seed_demo(pool: &SqlitePool, events: &broadcast::Sender<ServerEvent>) -> AppResult<()> {
    let seeded = sqlx::query_scalar::<_, String>("SELECT id FROM identities WHERE email = ?")
        .bind(DEMO_PROVIDERS[0].email)
        .fetch_optional(pool)
        .await?;
    if seeded.is_some() {
        return Ok(());
    }

    let mut providers: Vec<(Session, Vec<String>)> = Vec::new();
    for demo in DEMO_PROVIDERS {
        let session = create_identity(
            pool,
            demo.email,
            DEMO_PASSWORD,
            demo.name,
            Role::Provider,
            Some(demo.business.to_string()),
        )
        .await?;
        let mut service_ids = Vec::new();
        for (name, description, price, duration, category) in demo.services {
            let input = NewService {
                name: name.to_string(),
                description: description.to_string(),
                price: *price,
                duration: *duration,
                category: category.to_string(),
                status: None,
            };
            service_ids.push(catalog::create_service(pool, &session, input).await?.id);
        }
        providers.push((session, service_ids));
    }

    let mut clients = Vec::new();
    for (email, name) in DEMO_CLIENTS {
        clients.push(create_identity(pool, email, DEMO_PASSWORD, name, Role::Client, None).await?);
    }

    let now = Utc::now();
    for (index, (provider, service_ids)) in providers.iter().enumerate() {
        let client = &clients[index % clients.len()];
        let service_id = service_ids
            .first()
            .ok_or_else(|| AppError::validation("demo provider without services"))?;

        let mut past = NewBooking::for_service(service_id);
        past.date = Some(now - Duration::days(7 + index as i64));
        let done = bookings::create_booking(pool, events, client, past).await?;
        bookings::start_service(pool, events, provider, &done.id).await?;
        bookings::complete_service(pool, events, provider, &done.id).await?;
        reviews::create_review(
            pool,
            client,
            NewReview {
                booking_id: done.id,
                rating: 5 - (index as i64 % 2),
                comment: "On time and did a careful job.".to_string(),
            },
        )
        .await?;

        let mut upcoming = NewBooking::for_service(service_id);
        upcoming.date = Some(now + Duration::days(2 + index as i64));
        upcoming.notes = Some("Please call when you arrive.".to_string());
        let open = bookings::create_booking(pool, events, client, upcoming).await?;
        if index % 2 == 0 {
            bookings::confirm_booking(pool, events, provider, &open.id).await?;
        }
    }

    log::info!(
        "Seeded demo data: {} providers, {} clients (password {DEMO_PASSWORD})",
        providers.len(),
        clients.len()
    );
    Ok(())
}
