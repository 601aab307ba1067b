use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::{SqliteConnection, SqlitePool};

use crate::{
    auth::{new_id, Session},
    error::{AppError, AppResult},
    lifecycle::round1,
    models::{Booking, BookingStatus, Review, Role},
    stores::{bookings::BOOKING_COLUMNS, is_unique_violation},
};

const REVIEW_COLUMNS: &str = "id, booking_id, service_id, service_name, provider_id, provider_name, \
     client_id, client_name, rating, comment, created_at, updated_at";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewReview {
    pub booking_id: String,
    pub rating: i64,
    #[serde(default)]
    pub comment: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReviewPatch {
    pub rating: Option<i64>,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RatingSummary {
    pub average: f64,
    pub count: i64,
}

fn check_rating(rating: i64) -> AppResult<()> {
    if (1..=5).contains(&rating) {
        Ok(())
    } else {
        Err(AppError::validation("Rating must be between 1 and 5."))
    }
}

async fn fetch_review(pool: &SqlitePool, review_id: &str) -> Result<Option<Review>, sqlx::Error> {
    sqlx::query_as::<_, Review>(&format!("SELECT {REVIEW_COLUMNS} FROM reviews WHERE id = ?"))
        .bind(review_id)
        .fetch_optional(pool)
        .await
}

/// Recomputes the service's average rating and review count from its reviews.
async fn refresh_service_rating(conn: &mut SqliteConnection, service_id: &str) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"UPDATE services
           SET rating = (SELECT ROUND(AVG(rating), 1) FROM reviews WHERE service_id = ?1),
               review_count = (SELECT COUNT(*) FROM reviews WHERE service_id = ?1)
           WHERE id = ?1"#,
    )
    .bind(service_id)
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn create_review(pool: &SqlitePool, session: &Session, input: NewReview) -> AppResult<Review> {
    session.require(Role::Client)?;
    check_rating(input.rating)?;

    let booking = sqlx::query_as::<_, Booking>(&format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = ?"
    ))
    .bind(&input.booking_id)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::NotFound("booking"))?;

    if booking.client_id != session.user_id {
        return Err(AppError::Forbidden);
    }
    if booking.status != BookingStatus::Completed {
        return Err(AppError::validation("Only completed bookings can be reviewed."));
    }

    let review = Review {
        id: new_id(),
        booking_id: Some(booking.id),
        service_id: booking.service_id,
        service_name: booking.service_name,
        provider_id: booking.provider_id,
        provider_name: booking.provider_name,
        client_id: session.user_id.clone(),
        client_name: session.display_name.clone(),
        rating: input.rating,
        comment: input.comment.trim().to_string(),
        created_at: Utc::now(),
        updated_at: None,
    };

    // Completed is terminal, so the checks above hold for the transaction.
    let mut tx = pool.begin().await?;
    let inserted = sqlx::query(&format!(
        "INSERT INTO reviews ({REVIEW_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
    ))
    .bind(&review.id)
    .bind(&review.booking_id)
    .bind(&review.service_id)
    .bind(&review.service_name)
    .bind(&review.provider_id)
    .bind(&review.provider_name)
    .bind(&review.client_id)
    .bind(&review.client_name)
    .bind(review.rating)
    .bind(&review.comment)
    .bind(review.created_at)
    .bind(review.updated_at)
    .execute(&mut *tx)
    .await;
    match inserted {
        Err(err) if is_unique_violation(&err) => {
            return Err(AppError::conflict("You have already reviewed this service."));
        }
        other => {
            other?;
        }
    }

    refresh_service_rating(&mut *tx, &review.service_id).await?;
    tx.commit().await?;

    log::info!(
        "{} rated {} {}/5",
        session.display_name,
        review.service_name,
        review.rating
    );
    Ok(review)
}

pub async fn update_review(
    pool: &SqlitePool,
    session: &Session,
    review_id: &str,
    patch: ReviewPatch,
) -> AppResult<Review> {
    if let Some(rating) = patch.rating {
        check_rating(rating)?;
    }

    let mut review = fetch_review(pool, review_id)
        .await?
        .ok_or(AppError::NotFound("review"))?;
    if review.client_id != session.user_id {
        return Err(AppError::Forbidden);
    }

    if let Some(rating) = patch.rating {
        review.rating = rating;
    }
    if let Some(comment) = patch.comment {
        review.comment = comment.trim().to_string();
    }
    review.updated_at = Some(Utc::now());

    let mut tx = pool.begin().await?;
    let updated = sqlx::query(
        "UPDATE reviews SET rating = ?, comment = ?, updated_at = ? WHERE id = ? AND client_id = ?",
    )
    .bind(review.rating)
    .bind(&review.comment)
    .bind(review.updated_at)
    .bind(&review.id)
    .bind(&session.user_id)
    .execute(&mut *tx)
    .await?;
    if updated.rows_affected() == 0 {
        return Err(AppError::NotFound("review"));
    }
    refresh_service_rating(&mut *tx, &review.service_id).await?;
    tx.commit().await?;
    Ok(review)
}

pub async fn delete_review(pool: &SqlitePool, session: &Session, review_id: &str) -> AppResult<()> {
    let review = fetch_review(pool, review_id)
        .await?
        .ok_or(AppError::NotFound("review"))?;
    if review.client_id != session.user_id {
        return Err(AppError::Forbidden);
    }

    let mut tx = pool.begin().await?;
    let deleted = sqlx::query("DELETE FROM reviews WHERE id = ? AND client_id = ?")
        .bind(review_id)
        .bind(&session.user_id)
        .execute(&mut *tx)
        .await?;
    if deleted.rows_affected() == 0 {
        return Err(AppError::NotFound("review"));
    }
    refresh_service_rating(&mut *tx, &review.service_id).await?;
    tx.commit().await?;

    log::info!("{} deleted review {review_id}", session.display_name);
    Ok(())
}

pub async fn reviews_for_service(
    pool: &SqlitePool,
    service_id: &str,
    limit: Option<usize>,
) -> AppResult<Vec<Review>> {
    let mut reviews = sqlx::query_as::<_, Review>(&format!(
        "SELECT {REVIEW_COLUMNS} FROM reviews WHERE service_id = ? ORDER BY created_at DESC"
    ))
    .bind(service_id)
    .fetch_all(pool)
    .await?;
    if let Some(limit) = limit {
        reviews.truncate(limit);
    }
    Ok(reviews)
}

pub async fn reviews_for_provider(pool: &SqlitePool, provider_id: &str) -> AppResult<Vec<Review>> {
    let reviews = sqlx::query_as::<_, Review>(&format!(
        "SELECT {REVIEW_COLUMNS} FROM reviews WHERE provider_id = ? ORDER BY created_at DESC"
    ))
    .bind(provider_id)
    .fetch_all(pool)
    .await?;
    Ok(reviews)
}

pub async fn reviews_by_client(pool: &SqlitePool, client_id: &str) -> AppResult<Vec<Review>> {
    let reviews = sqlx::query_as::<_, Review>(&format!(
        "SELECT {REVIEW_COLUMNS} FROM reviews WHERE client_id = ? ORDER BY created_at DESC"
    ))
    .bind(client_id)
    .fetch_all(pool)
    .await?;
    Ok(reviews)
}

/// Completed bookings whose service the client has not reviewed yet.
pub async fn pending_reviews(pool: &SqlitePool, session: &Session) -> AppResult<Vec<Booking>> {
    session.require(Role::Client)?;
    let bookings = sqlx::query_as::<_, Booking>(&format!(
        r#"SELECT {BOOKING_COLUMNS} FROM bookings b
           WHERE b.client_id = ? AND b.status = ?
             AND NOT EXISTS (
                 SELECT 1 FROM reviews r
                 WHERE r.client_id = b.client_id AND r.service_id = b.service_id
             )
           ORDER BY b.date DESC"#
    ))
    .bind(&session.user_id)
    .bind(BookingStatus::Completed)
    .fetch_all(pool)
    .await?;
    Ok(bookings)
}

pub async fn provider_rating(pool: &SqlitePool, provider_id: &str) -> AppResult<RatingSummary> {
    let (average, count) = sqlx::query_as::<_, (Option<f64>, i64)>(
        "SELECT AVG(rating), COUNT(*) FROM reviews WHERE provider_id = ?",
    )
    .bind(provider_id)
    .fetch_one(pool)
    .await?;
    Ok(RatingSummary {
        average: average.map(round1).unwrap_or(0.0),
        count,
    })
}
