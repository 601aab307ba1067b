use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};

use crate::{
    auth::Session,
    error::{AppError, AppResult},
    lifecycle::{round2, BookingAction},
    models::{Payment, PaymentStatus, Role},
};

pub(crate) const PAYMENT_COLUMNS: &str = "id, booking_id, service_id, service_name, provider_id, \
     provider_name, client_id, amount, status, method, date, created_at, updated_at";

/// Written in the same transaction as its booking.
pub(crate) async fn insert(conn: &mut SqliteConnection, payment: &Payment) -> Result<(), sqlx::Error> {
    sqlx::query(&format!(
        "INSERT INTO payments ({PAYMENT_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
    ))
    .bind(&payment.id)
    .bind(&payment.booking_id)
    .bind(&payment.service_id)
    .bind(&payment.service_name)
    .bind(&payment.provider_id)
    .bind(&payment.provider_name)
    .bind(&payment.client_id)
    .bind(payment.amount)
    .bind(payment.status)
    .bind(payment.method)
    .bind(payment.date)
    .bind(payment.created_at)
    .bind(payment.updated_at)
    .execute(conn)
    .await?;
    Ok(())
}

/// Keeps the payment in step with its booking. Runs inside the booking
/// transition's transaction.
pub(crate) async fn follow_booking(
    conn: &mut SqliteConnection,
    booking_id: &str,
    action: BookingAction,
    now: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    let moves: &[(PaymentStatus, PaymentStatus)] = match action {
        BookingAction::Complete => &[(PaymentStatus::Pending, PaymentStatus::Paid)],
        // Cancelling is only possible before completion, so nothing is paid yet.
        BookingAction::Cancel => &[(PaymentStatus::Pending, PaymentStatus::Failed)],
        BookingAction::Confirm | BookingAction::Start => &[],
    };

    for (from, to) in moves {
        sqlx::query("UPDATE payments SET status = ?, updated_at = ? WHERE booking_id = ? AND status = ?")
            .bind(to)
            .bind(now)
            .bind(booking_id)
            .bind(from)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

pub async fn payment_for_booking(pool: &SqlitePool, booking_id: &str) -> AppResult<Option<Payment>> {
    let payment = sqlx::query_as::<_, Payment>(&format!(
        "SELECT {PAYMENT_COLUMNS} FROM payments WHERE booking_id = ?"
    ))
    .bind(booking_id)
    .fetch_optional(pool)
    .await?;
    Ok(payment)
}

pub async fn payments_for_client(pool: &SqlitePool, session: &Session) -> AppResult<Vec<Payment>> {
    session.require(Role::Client)?;
    let payments = sqlx::query_as::<_, Payment>(&format!(
        "SELECT {PAYMENT_COLUMNS} FROM payments WHERE client_id = ? ORDER BY date DESC"
    ))
    .bind(&session.user_id)
    .fetch_all(pool)
    .await?;
    Ok(payments)
}

pub async fn payments_for_provider(
    pool: &SqlitePool,
    session: &Session,
    status: Option<PaymentStatus>,
    limit: Option<usize>,
) -> AppResult<Vec<Payment>> {
    session.require(Role::Provider)?;
    let payments = sqlx::query_as::<_, Payment>(&format!(
        "SELECT {PAYMENT_COLUMNS} FROM payments WHERE provider_id = ? ORDER BY date DESC"
    ))
    .bind(&session.user_id)
    .fetch_all(pool)
    .await?;

    Ok(payments
        .into_iter()
        .filter(|payment| status.map_or(true, |status| payment.status == status))
        .take(limit.unwrap_or(usize::MAX))
        .collect())
}

pub fn total_paid(payments: &[Payment]) -> f64 {
    round2(
        payments
            .iter()
            .filter(|payment| payment.status == PaymentStatus::Paid)
            .map(|payment| payment.amount)
            .sum(),
    )
}

pub(crate) fn ensure_visible(session: &Session, payment: &Payment) -> AppResult<()> {
    if session.is_admin() || payment.client_id == session.user_id || payment.provider_id == session.user_id {
        Ok(())
    } else {
        Err(AppError::Forbidden)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::{BookingStatus, PaymentMethod},
        stores::bookings::{self, NewBooking},
        test_support::{client, provider, test_pool},
        state::AppState,
    };

    fn payment(amount: f64, status: PaymentStatus) -> Payment {
        let now = Utc::now();
        Payment {
            id: "p".into(),
            booking_id: "b".into(),
            service_id: "s".into(),
            service_name: "Svc".into(),
            provider_id: "pr".into(),
            provider_name: "Pro".into(),
            client_id: "c".into(),
            amount,
            status,
            method: PaymentMethod::Cash,
            date: now,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn total_paid_ignores_other_statuses() {
        let payments = [
            payment(105.0, PaymentStatus::Paid),
            payment(52.5, PaymentStatus::Paid),
            payment(999.0, PaymentStatus::Pending),
            payment(40.0, PaymentStatus::Refunded),
        ];
        assert_eq!(total_paid(&payments), 157.5);
        assert_eq!(total_paid(&[]), 0.0);
    }

    #[actix_web::test]
    async fn payment_follows_booking_lifecycle() {
        let pool = test_pool().await;
        let state = AppState::new(pool.clone());
        let pat = provider(&pool, "pat@example.com", "Sparkle Co").await;
        let cam = client(&pool, "cam@example.com").await;
        let service = crate::test_support::listing(&pool, &pat, 200.0).await;

        let booking = bookings::create_booking(
            &pool,
            &state.events,
            &cam,
            NewBooking::for_service(&service.id),
        )
        .await
        .unwrap();

        let pending = payment_for_booking(&pool, &booking.id).await.unwrap().unwrap();
        assert_eq!(pending.status, PaymentStatus::Pending);
        assert_eq!(pending.amount, 210.0);
        assert_eq!(pending.method, PaymentMethod::CreditCard);

        bookings::start_service(&pool, &state.events, &pat, &booking.id).await.unwrap();
        let done = bookings::complete_service(&pool, &state.events, &pat, &booking.id)
            .await
            .unwrap();
        assert_eq!(done.status, BookingStatus::Completed);

        let paid = payment_for_booking(&pool, &booking.id).await.unwrap().unwrap();
        assert_eq!(paid.status, PaymentStatus::Paid);

        let mine = payments_for_client(&pool, &cam).await.unwrap();
        assert_eq!(mine.len(), 1);
        let theirs = payments_for_provider(&pool, &pat, Some(PaymentStatus::Paid), Some(4))
            .await
            .unwrap();
        assert_eq!(theirs.len(), 1);
        assert_eq!(total_paid(&theirs), 210.0);
        assert!(matches!(
            payments_for_client(&pool, &pat).await,
            Err(AppError::Forbidden)
        ));
    }

    #[actix_web::test]
    async fn cancelling_fails_a_pending_payment() {
        let pool = test_pool().await;
        let state = AppState::new(pool.clone());
        let pat = provider(&pool, "pat@example.com", "Sparkle Co").await;
        let cam = client(&pool, "cam@example.com").await;
        let service = crate::test_support::listing(&pool, &pat, 80.0).await;

        let booking = bookings::create_booking(
            &pool,
            &state.events,
            &cam,
            NewBooking::for_service(&service.id),
        )
        .await
        .unwrap();
        bookings::cancel_booking(&pool, &state.events, &cam, &booking.id, "changed plans")
            .await
            .unwrap();

        let payment = payment_for_booking(&pool, &booking.id).await.unwrap().unwrap();
        assert_eq!(payment.status, PaymentStatus::Failed);
    }

    #[actix_web::test]
    async fn completed_bookings_keep_their_payment() {
        let pool = test_pool().await;
        let state = AppState::new(pool.clone());
        let pat = provider(&pool, "pat@example.com", "Sparkle Co").await;
        let cam = client(&pool, "cam@example.com").await;
        let service = crate::test_support::listing(&pool, &pat, 80.0).await;

        let booking = bookings::create_booking(
            &pool,
            &state.events,
            &cam,
            NewBooking::for_service(&service.id),
        )
        .await
        .unwrap();
        bookings::start_service(&pool, &state.events, &pat, &booking.id).await.unwrap();
        bookings::complete_service(&pool, &state.events, &cam, &booking.id)
            .await
            .unwrap();

        assert!(matches!(
            bookings::cancel_booking(&pool, &state.events, &cam, &booking.id, "too late").await,
            Err(AppError::InvalidTransition { .. })
        ));
        let payment = payment_for_booking(&pool, &booking.id).await.unwrap().unwrap();
        assert_eq!(payment.status, PaymentStatus::Paid);
    }
}
