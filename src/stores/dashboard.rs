use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;

use crate::{
    auth::Session,
    error::AppResult,
    lifecycle::round1,
    models::{Booking, BookingStatus, FavoriteKind, Payment, PaymentStatus, Review, Role},
    stores::{bookings, favorites, payments, reviews},
};

const RECENT_BOOKINGS: usize = 5;
const RECENT_REVIEWS: usize = 3;
const PROVIDER_UPCOMING: usize = 4;
const PROVIDER_RECENT_PAYMENTS: usize = 4;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientStats {
    pub active_bookings: usize,
    pub upcoming_bookings: usize,
    pub favorite_services: usize,
    pub favorite_providers: usize,
    pub total_favorites: usize,
    pub total_spent: f64,
    pub reviews_given: usize,
    pub average_rating_given: f64,
    pub recent_bookings: Vec<Booking>,
    pub recent_reviews: Vec<Review>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderStats {
    pub total_revenue: f64,
    pub total_bookings: usize,
    pub active_clients: usize,
    pub average_rating: f64,
    pub review_count: i64,
    pub upcoming_bookings: Vec<Booking>,
    pub recent_payments: Vec<Payment>,
}

pub async fn client_stats(pool: &SqlitePool, session: &Session, now: DateTime<Utc>) -> AppResult<ClientStats> {
    session.require(Role::Client)?;
    let mut booked = bookings::bookings_for_client(pool, &session.user_id).await?;
    let saved = favorites::favorites_for(pool, session, None).await?;
    let paid = payments::payments_for_client(pool, session).await?;
    let mut given = reviews::reviews_by_client(pool, &session.user_id).await?;

    let open = |booking: &&Booking| {
        matches!(booking.status, BookingStatus::Pending | BookingStatus::Confirmed)
    };
    let active_bookings = booked.iter().filter(open).count();
    let upcoming_bookings = booked
        .iter()
        .filter(open)
        .filter(|booking| booking.date > now)
        .count();
    let favorite_services = saved
        .iter()
        .filter(|favorite| favorite.kind == FavoriteKind::Service)
        .count();
    let average_rating_given = if given.is_empty() {
        0.0
    } else {
        round1(given.iter().map(|review| review.rating as f64).sum::<f64>() / given.len() as f64)
    };

    booked.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    booked.truncate(RECENT_BOOKINGS);
    let reviews_given = given.len();
    given.truncate(RECENT_REVIEWS);

    Ok(ClientStats {
        active_bookings,
        upcoming_bookings,
        favorite_services,
        favorite_providers: saved.len() - favorite_services,
        total_favorites: saved.len(),
        total_spent: payments::total_paid(&paid),
        reviews_given,
        average_rating_given,
        recent_bookings: booked,
        recent_reviews: given,
    })
}

pub async fn provider_stats(
    pool: &SqlitePool,
    session: &Session,
    now: DateTime<Utc>,
) -> AppResult<ProviderStats> {
    session.require(Role::Provider)?;
    let booked = bookings::bookings_for_provider(pool, &session.user_id).await?;
    let paid = payments::payments_for_provider(pool, session, Some(PaymentStatus::Paid), None).await?;
    let rating = reviews::provider_rating(pool, &session.user_id).await?;

    let active_clients = booked
        .iter()
        .filter(|booking| booking.status.is_active())
        .map(|booking| booking.client_id.as_str())
        .collect::<HashSet<_>>()
        .len();

    let mut upcoming: Vec<Booking> = booked
        .iter()
        .filter(|booking| {
            matches!(booking.status, BookingStatus::Pending | BookingStatus::Confirmed)
                && booking.date >= now
        })
        .cloned()
        .collect();
    upcoming.sort_by_key(|booking| booking.date);
    upcoming.truncate(PROVIDER_UPCOMING);

    Ok(ProviderStats {
        total_revenue: payments::total_paid(&paid),
        total_bookings: booked.len(),
        active_clients,
        average_rating: rating.average,
        review_count: rating.count,
        upcoming_bookings: upcoming,
        recent_payments: paid.into_iter().take(PROVIDER_RECENT_PAYMENTS).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        state::AppState,
        stores::{
            bookings::NewBooking,
            favorites,
            reviews::{self, NewReview},
        },
        test_support::{client, listing, provider, test_pool},
    };
    use chrono::Duration;

    #[actix_web::test]
    async fn stats_summarise_both_sides() {
        let pool = test_pool().await;
        let state = AppState::new(pool.clone());
        let pat = provider(&pool, "pat@example.com", "Sparkle Co").await;
        let cam = client(&pool, "cam@example.com").await;
        let sam = client(&pool, "sam@example.com").await;
        let service = listing(&pool, &pat, 100.0).await;

        let done = bookings::create_booking(&pool, &state.events, &cam, NewBooking::for_service(&service.id))
            .await
            .unwrap();
        bookings::start_service(&pool, &state.events, &pat, &done.id).await.unwrap();
        bookings::complete_service(&pool, &state.events, &pat, &done.id).await.unwrap();
        reviews::create_review(
            &pool,
            &cam,
            NewReview {
                booking_id: done.id.clone(),
                rating: 4,
                comment: "Tidy work".into(),
            },
        )
        .await
        .unwrap();

        let mut later = NewBooking::for_service(&service.id);
        later.date = Some(Utc::now() + Duration::days(3));
        bookings::create_booking(&pool, &state.events, &cam, later.clone()).await.unwrap();
        bookings::create_booking(&pool, &state.events, &sam, later).await.unwrap();
        favorites::add_favorite(&pool, &cam, FavoriteKind::Service, &service.id).await.unwrap();
        favorites::add_favorite(&pool, &cam, FavoriteKind::Provider, &pat.user_id).await.unwrap();

        let now = Utc::now();
        let mine = client_stats(&pool, &cam, now).await.unwrap();
        assert_eq!(mine.active_bookings, 1);
        assert_eq!(mine.upcoming_bookings, 1);
        assert_eq!(mine.total_favorites, 2);
        assert_eq!(mine.favorite_services, 1);
        assert_eq!(mine.favorite_providers, 1);
        assert_eq!(mine.total_spent, 105.0);
        assert_eq!(mine.reviews_given, 1);
        assert_eq!(mine.average_rating_given, 4.0);
        assert_eq!(mine.recent_bookings.len(), 2);

        let theirs = provider_stats(&pool, &pat, now).await.unwrap();
        assert_eq!(theirs.total_revenue, 105.0);
        assert_eq!(theirs.total_bookings, 3);
        assert_eq!(theirs.active_clients, 2);
        assert_eq!(theirs.average_rating, 4.0);
        assert_eq!(theirs.upcoming_bookings.len(), 2);
        assert_eq!(theirs.recent_payments.len(), 1);

        assert!(provider_stats(&pool, &cam, now).await.is_err());
    }
}
