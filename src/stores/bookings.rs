use chrono::{DateTime, Utc};
use serde::Deserialize;
use sqlx::{Sqlite, SqlitePool};
use tokio::sync::broadcast;

use crate::{
    auth::{new_id, Session},
    error::{AppError, AppResult},
    lifecycle::{in_tab, transition, BookingAction, BookingTab, Pricing},
    models::{Booking, BookingStatus, Payment, PaymentMethod, PaymentStatus, Role, ServiceStatus},
    state::{publish, ServerEvent},
    stores::{catalog, payments},
};

pub(crate) const BOOKING_COLUMNS: &str = "id, service_id, service_name, provider_id, provider_name, \
     business_name, client_id, client_name, client_email, price, fee, total, duration, date, status, \
     address, notes, reason, created_at, updated_at, started_at, completed_at";

pub const CLIENT_UPCOMING_LIMIT: usize = 5;
pub const CLIENT_PAST_LIMIT: usize = 10;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBooking {
    pub service_id: String,
    pub date: Option<DateTime<Utc>>,
    pub address: Option<String>,
    pub notes: Option<String>,
    #[serde(default = "default_method")]
    pub payment_method: PaymentMethod,
}

fn default_method() -> PaymentMethod {
    PaymentMethod::CreditCard
}

impl NewBooking {
    /// Tomorrow, paid by card, no address or notes.
    pub fn for_service(service_id: &str) -> Self {
        NewBooking {
            service_id: service_id.to_string(),
            date: Some(Utc::now() + chrono::Duration::days(1)),
            address: None,
            notes: None,
            payment_method: default_method(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reschedule {
    pub date: Option<DateTime<Utc>>,
    pub address: Option<String>,
    pub notes: Option<String>,
}

fn clean(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

async fn fetch_booking<'e, E>(executor: E, booking_id: &str) -> Result<Option<Booking>, sqlx::Error>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query_as::<_, Booking>(&format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = ?"))
        .bind(booking_id)
        .fetch_optional(executor)
        .await
}

fn is_party(session: &Session, booking: &Booking) -> bool {
    booking.client_id == session.user_id || booking.provider_id == session.user_id
}

fn authorize(session: &Session, booking: &Booking, action: BookingAction) -> AppResult<()> {
    let allowed = match action {
        BookingAction::Confirm | BookingAction::Start => booking.provider_id == session.user_id,
        BookingAction::Complete | BookingAction::Cancel => is_party(session, booking),
    };
    if allowed {
        Ok(())
    } else {
        log::warn!(
            "{} may not {action} booking {}",
            session.user_id,
            booking.id
        );
        Err(AppError::Forbidden)
    }
}

pub async fn create_booking(
    pool: &SqlitePool,
    events: &broadcast::Sender<ServerEvent>,
    session: &Session,
    input: NewBooking,
) -> AppResult<Booking> {
    session.require(Role::Client)?;
    let date = input
        .date
        .ok_or_else(|| AppError::validation("Please pick a date and time."))?;
    let service = catalog::get_service(pool, &input.service_id)
        .await?
        .ok_or(AppError::NotFound("service"))?;
    if service.status != ServiceStatus::Active {
        return Err(AppError::validation("This service is not available for booking."));
    }

    let pricing = Pricing::for_price(service.price);
    let now = Utc::now();
    let booking = Booking {
        id: new_id(),
        service_id: service.id.clone(),
        service_name: service.name.clone(),
        provider_id: service.provider_id.clone(),
        provider_name: service.provider_name.clone(),
        business_name: service.business_name.clone(),
        client_id: session.user_id.clone(),
        client_name: session.display_name.clone(),
        client_email: session.email.clone(),
        price: pricing.price,
        fee: pricing.fee,
        total: pricing.total,
        duration: service.duration,
        date,
        status: BookingStatus::Pending,
        address: clean(input.address),
        notes: clean(input.notes),
        reason: None,
        created_at: now,
        updated_at: now,
        started_at: None,
        completed_at: None,
    };
    let payment = Payment {
        id: new_id(),
        booking_id: booking.id.clone(),
        service_id: service.id,
        service_name: service.name,
        provider_id: service.provider_id,
        provider_name: service.provider_name,
        client_id: session.user_id.clone(),
        amount: pricing.total,
        status: PaymentStatus::Pending,
        method: input.payment_method,
        date: now,
        created_at: now,
        updated_at: now,
    };

    let mut tx = pool.begin().await?;
    sqlx::query(&format!(
        "INSERT INTO bookings ({BOOKING_COLUMNS}) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
    ))
    .bind(&booking.id)
    .bind(&booking.service_id)
    .bind(&booking.service_name)
    .bind(&booking.provider_id)
    .bind(&booking.provider_name)
    .bind(&booking.business_name)
    .bind(&booking.client_id)
    .bind(&booking.client_name)
    .bind(&booking.client_email)
    .bind(booking.price)
    .bind(booking.fee)
    .bind(booking.total)
    .bind(booking.duration)
    .bind(booking.date)
    .bind(booking.status)
    .bind(&booking.address)
    .bind(&booking.notes)
    .bind(&booking.reason)
    .bind(booking.created_at)
    .bind(booking.updated_at)
    .bind(booking.started_at)
    .bind(booking.completed_at)
    .execute(&mut *tx)
    .await?;
    payments::insert(&mut *tx, &payment).await?;
    tx.commit().await?;

    log::info!(
        "{} booked {} for {}",
        session.display_name,
        booking.service_name,
        booking.date.to_rfc3339()
    );
    publish(events, ServerEvent::from_booking("booking_created", &booking));
    Ok(booking)
}

/// Loads a booking the caller takes part in. Admins see every booking.
pub async fn get_booking(pool: &SqlitePool, session: &Session, booking_id: &str) -> AppResult<Booking> {
    let booking = fetch_booking(pool, booking_id)
        .await?
        .ok_or(AppError::NotFound("booking"))?;
    if !session.is_admin() && !is_party(session, &booking) {
        return Err(AppError::Forbidden);
    }
    Ok(booking)
}

async fn apply(
    pool: &SqlitePool,
    events: &broadcast::Sender<ServerEvent>,
    session: &Session,
    booking_id: &str,
    action: BookingAction,
    reason: Option<String>,
) -> AppResult<Booking> {
    let mut booking = fetch_booking(pool, booking_id)
        .await?
        .ok_or(AppError::NotFound("booking"))?;
    authorize(session, &booking, action)?;

    let from = booking.status;
    let next = transition(from, action).map_err(|err| {
        log::warn!("Rejected {} on booking {booking_id} ({})", err.action, err.from);
        AppError::InvalidTransition {
            from: err.from,
            action: err.action,
        }
    })?;

    let now = Utc::now();
    booking.status = next;
    booking.updated_at = now;
    match action {
        BookingAction::Start => booking.started_at = Some(now),
        BookingAction::Complete => booking.completed_at = Some(now),
        BookingAction::Cancel => booking.reason = reason,
        BookingAction::Confirm => {}
    }

    // The read above is unlocked. The transaction opens with the
    // compare-and-set, so a concurrent writer queues on the lock and then
    // matches no row.
    let mut tx = pool.begin().await?;
    let result = sqlx::query(
        r#"UPDATE bookings
           SET status = ?, updated_at = ?, started_at = ?, completed_at = ?, reason = ?
           WHERE id = ? AND status = ?"#,
    )
    .bind(booking.status)
    .bind(booking.updated_at)
    .bind(booking.started_at)
    .bind(booking.completed_at)
    .bind(&booking.reason)
    .bind(&booking.id)
    .bind(from)
    .execute(&mut *tx)
    .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::conflict("The booking was changed by someone else."));
    }

    payments::follow_booking(&mut *tx, &booking.id, action, now).await?;
    tx.commit().await?;

    log::info!("Booking {booking_id}: {from} -> {next} by {}", session.user_id);
    publish(events, ServerEvent::from_booking("booking_updated", &booking));
    Ok(booking)
}

pub async fn confirm_booking(
    pool: &SqlitePool,
    events: &broadcast::Sender<ServerEvent>,
    session: &Session,
    booking_id: &str,
) -> AppResult<Booking> {
    apply(pool, events, session, booking_id, BookingAction::Confirm, None).await
}

pub async fn start_service(
    pool: &SqlitePool,
    events: &broadcast::Sender<ServerEvent>,
    session: &Session,
    booking_id: &str,
) -> AppResult<Booking> {
    apply(pool, events, session, booking_id, BookingAction::Start, None).await
}

/// Completed bookings become eligible for review; nothing is written for that,
/// see `reviews::pending_reviews`.
pub async fn complete_service(
    pool: &SqlitePool,
    events: &broadcast::Sender<ServerEvent>,
    session: &Session,
    booking_id: &str,
) -> AppResult<Booking> {
    apply(pool, events, session, booking_id, BookingAction::Complete, None).await
}

pub async fn cancel_booking(
    pool: &SqlitePool,
    events: &broadcast::Sender<ServerEvent>,
    session: &Session,
    booking_id: &str,
    reason: &str,
) -> AppResult<Booking> {
    let reason = Some(reason.trim().to_string()).filter(|reason| !reason.is_empty());
    apply(pool, events, session, booking_id, BookingAction::Cancel, reason).await
}

pub async fn reschedule_booking(
    pool: &SqlitePool,
    events: &broadcast::Sender<ServerEvent>,
    session: &Session,
    booking_id: &str,
    input: Reschedule,
) -> AppResult<Booking> {
    let date = input
        .date
        .ok_or_else(|| AppError::validation("Please pick a date and time."))?;

    let mut booking = fetch_booking(pool, booking_id)
        .await?
        .ok_or(AppError::NotFound("booking"))?;
    if booking.client_id != session.user_id {
        return Err(AppError::Forbidden);
    }
    if !matches!(booking.status, BookingStatus::Pending | BookingStatus::Confirmed) {
        return Err(AppError::conflict(format!(
            "A {} booking cannot be rescheduled.",
            booking.status
        )));
    }

    booking.date = date;
    if input.address.is_some() {
        booking.address = clean(input.address);
    }
    if input.notes.is_some() {
        booking.notes = clean(input.notes);
    }
    booking.updated_at = Utc::now();

    let result = sqlx::query(
        r#"UPDATE bookings SET date = ?, address = ?, notes = ?, updated_at = ?
           WHERE id = ? AND status = ?"#,
    )
    .bind(booking.date)
    .bind(&booking.address)
    .bind(&booking.notes)
    .bind(booking.updated_at)
    .bind(&booking.id)
    .bind(booking.status)
    .execute(pool)
    .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::conflict("The booking was changed by someone else."));
    }

    publish(events, ServerEvent::from_booking("booking_updated", &booking));
    Ok(booking)
}

pub async fn bookings_for_client(pool: &SqlitePool, client_id: &str) -> AppResult<Vec<Booking>> {
    let bookings = sqlx::query_as::<_, Booking>(&format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings WHERE client_id = ? ORDER BY date DESC"
    ))
    .bind(client_id)
    .fetch_all(pool)
    .await?;
    Ok(bookings)
}

pub async fn bookings_for_provider(pool: &SqlitePool, provider_id: &str) -> AppResult<Vec<Booking>> {
    let bookings = sqlx::query_as::<_, Booking>(&format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings WHERE provider_id = ? ORDER BY date DESC"
    ))
    .bind(provider_id)
    .fetch_all(pool)
    .await?;
    Ok(bookings)
}

async fn all_bookings(pool: &SqlitePool) -> AppResult<Vec<Booking>> {
    let bookings = sqlx::query_as::<_, Booking>(&format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings ORDER BY date DESC"
    ))
    .fetch_all(pool)
    .await?;
    Ok(bookings)
}

fn matches_search(booking: &Booking, term: &str) -> bool {
    booking.service_name.to_lowercase().contains(term)
        || booking.client_name.to_lowercase().contains(term)
        || booking.client_email.to_lowercase().contains(term)
}

fn page_limit(role: Role, tab: BookingTab) -> Option<usize> {
    match (role, tab) {
        (Role::Client, BookingTab::Upcoming) => Some(CLIENT_UPCOMING_LIMIT),
        (Role::Client, BookingTab::Past) => Some(CLIENT_PAST_LIMIT),
        _ => None,
    }
}

/// The caller's bookings in one dashboard tab. Re-reads everything on each call;
/// the tabs are predicates over `(status, date, now)`.
pub async fn list_bookings(
    pool: &SqlitePool,
    session: &Session,
    tab: BookingTab,
    search: Option<&str>,
    now: DateTime<Utc>,
) -> AppResult<Vec<Booking>> {
    let bookings = match session.role {
        Role::Client => bookings_for_client(pool, &session.user_id).await?,
        Role::Provider => bookings_for_provider(pool, &session.user_id).await?,
        Role::Admin => all_bookings(pool).await?,
    };

    let term = search
        .map(|term| term.trim().to_lowercase())
        .filter(|term| !term.is_empty());
    let mut listed: Vec<Booking> = bookings
        .into_iter()
        .filter(|booking| in_tab(booking, tab, now))
        .filter(|booking| term.as_deref().map_or(true, |term| matches_search(booking, term)))
        .collect();

    if tab == BookingTab::Upcoming {
        listed.sort_by_key(|booking| booking.date);
    }
    if let Some(limit) = page_limit(session.role, tab) {
        listed.truncate(limit);
    }
    Ok(listed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{admin, client, file_db, listing, listing_named, provider, test_pool};
    use crate::state::AppState;
    use chrono::Duration;

    struct World {
        pool: SqlitePool,
        state: AppState,
        pat: Session,
        cam: Session,
        service_id: String,
    }

    async fn world() -> World {
        let pool = test_pool().await;
        let state = AppState::new(pool.clone());
        let pat = provider(&pool, "pat@example.com", "Sparkle Co").await;
        let cam = client(&pool, "cam@example.com").await;
        let service = listing(&pool, &pat, 200.0).await;
        World {
            pool,
            state,
            pat,
            cam,
            service_id: service.id,
        }
    }

    async fn book(w: &World, date: DateTime<Utc>) -> Booking {
        let mut input = NewBooking::for_service(&w.service_id);
        input.date = Some(date);
        create_booking(&w.pool, &w.state.events, &w.cam, input)
            .await
            .unwrap()
    }

    #[actix_web::test]
    async fn create_booking_prices_and_records() {
        let w = world().await;
        let mut events = w.state.events.subscribe();
        let mut input = NewBooking::for_service(&w.service_id);
        input.address = Some(" 12 Elm St ".into());
        input.notes = Some("   ".into());

        let booking = create_booking(&w.pool, &w.state.events, &w.cam, input).await.unwrap();
        assert_eq!(booking.status, BookingStatus::Pending);
        assert_eq!(booking.price, 200.0);
        assert_eq!(booking.fee, 10.0);
        assert_eq!(booking.total, 210.0);
        assert_eq!(booking.address.as_deref(), Some("12 Elm St"));
        assert_eq!(booking.notes, None);
        assert_eq!(booking.client_email, "cam@example.com");
        assert_eq!(booking.business_name.as_deref(), Some("Sparkle Co"));

        let stored = get_booking(&w.pool, &w.pat, &booking.id).await.unwrap();
        assert_eq!(stored, booking);

        let event = events.recv().await.unwrap();
        assert_eq!(event.kind, "booking_created");
        assert_eq!(event.booking_id.as_deref(), Some(booking.id.as_str()));
    }

    #[actix_web::test]
    async fn create_booking_needs_client_service_and_date() {
        let w = world().await;

        let as_provider = create_booking(
            &w.pool,
            &w.state.events,
            &w.pat,
            NewBooking::for_service(&w.service_id),
        )
        .await;
        assert!(matches!(as_provider, Err(AppError::Forbidden)));

        let missing = create_booking(
            &w.pool,
            &w.state.events,
            &w.cam,
            NewBooking::for_service("no-such-service"),
        )
        .await;
        assert!(matches!(missing, Err(AppError::NotFound("service"))));

        let mut undated = NewBooking::for_service(&w.service_id);
        undated.date = None;
        let undated = create_booking(&w.pool, &w.state.events, &w.cam, undated).await;
        assert!(matches!(undated, Err(AppError::Validation(_))));

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM bookings")
            .fetch_one(&w.pool)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[actix_web::test]
    async fn provider_drives_the_lifecycle() {
        let w = world().await;
        let booking = book(&w, Utc::now() + Duration::days(2)).await;

        let confirmed = confirm_booking(&w.pool, &w.state.events, &w.pat, &booking.id)
            .await
            .unwrap();
        assert_eq!(confirmed.status, BookingStatus::Confirmed);

        let started = start_service(&w.pool, &w.state.events, &w.pat, &booking.id)
            .await
            .unwrap();
        assert_eq!(started.status, BookingStatus::InProgress);
        assert!(started.started_at.is_some());

        let done = complete_service(&w.pool, &w.state.events, &w.pat, &booking.id)
            .await
            .unwrap();
        assert_eq!(done.status, BookingStatus::Completed);
        assert!(done.completed_at.is_some());
        assert_eq!(done.started_at, started.started_at);

        let again = cancel_booking(&w.pool, &w.state.events, &w.cam, &booking.id, "too late").await;
        assert!(matches!(
            again,
            Err(AppError::InvalidTransition {
                from: BookingStatus::Completed,
                action: BookingAction::Cancel
            })
        ));
    }

    #[actix_web::test]
    async fn clients_cannot_confirm_or_start() {
        let w = world().await;
        let booking = book(&w, Utc::now() + Duration::days(2)).await;
        let stranger = client(&w.pool, "sam@example.com").await;

        assert!(matches!(
            confirm_booking(&w.pool, &w.state.events, &w.cam, &booking.id).await,
            Err(AppError::Forbidden)
        ));
        assert!(matches!(
            start_service(&w.pool, &w.state.events, &w.cam, &booking.id).await,
            Err(AppError::Forbidden)
        ));
        assert!(matches!(
            cancel_booking(&w.pool, &w.state.events, &stranger, &booking.id, "mine now").await,
            Err(AppError::Forbidden)
        ));
        assert!(matches!(
            get_booking(&w.pool, &stranger, &booking.id).await,
            Err(AppError::Forbidden)
        ));
        let boss = admin(&w.pool).await;
        assert!(get_booking(&w.pool, &boss, &booking.id).await.is_ok());
    }

    #[actix_web::test]
    async fn cancel_changes_only_status_reason_and_updated_at() {
        let w = world().await;
        let mut input = NewBooking::for_service(&w.service_id);
        input.address = Some("12 Elm St".into());
        input.notes = Some("Ring twice".into());
        let before = create_booking(&w.pool, &w.state.events, &w.cam, input).await.unwrap();

        let after = cancel_booking(&w.pool, &w.state.events, &w.cam, &before.id, "Found someone closer")
            .await
            .unwrap();
        let stored = get_booking(&w.pool, &w.cam, &before.id).await.unwrap();
        assert_eq!(stored, after);

        assert_eq!(stored.status, BookingStatus::Cancelled);
        assert_eq!(stored.reason.as_deref(), Some("Found someone closer"));
        assert!(stored.updated_at >= before.updated_at);

        let expected = Booking {
            status: BookingStatus::Cancelled,
            reason: Some("Found someone closer".into()),
            updated_at: stored.updated_at,
            ..before
        };
        assert_eq!(stored, expected);
    }

    #[actix_web::test]
    async fn concurrent_cancels_have_one_winner() {
        let w = world().await;
        let booking = book(&w, Utc::now() + Duration::days(2)).await;

        let (first, second) = tokio::join!(
            cancel_booking(&w.pool, &w.state.events, &w.cam, &booking.id, "client says no"),
            cancel_booking(&w.pool, &w.state.events, &w.pat, &booking.id, "provider says no"),
        );
        let wins = [first.is_ok(), second.is_ok()].iter().filter(|ok| **ok).count();
        assert_eq!(wins, 1);
        let loser = if first.is_ok() { second } else { first };
        assert!(matches!(
            loser,
            Err(AppError::InvalidTransition { .. }) | Err(AppError::Conflict(_))
        ));

        let stored = get_booking(&w.pool, &w.cam, &booking.id).await.unwrap();
        assert_eq!(stored.status, BookingStatus::Cancelled);
    }

    #[actix_web::test]
    async fn racing_cancels_on_a_shared_database_never_fail_in_storage() {
        let db = file_db().await;
        let pool = &db.pool;
        let state = AppState::new(pool.clone());
        let pat = provider(pool, "pat@example.com", "Sparkle Co").await;
        let cam = client(pool, "cam@example.com").await;
        let service = listing(pool, &pat, 100.0).await;

        for round in 0..10 {
            let booking = create_booking(pool, &state.events, &cam, NewBooking::for_service(&service.id))
                .await
                .unwrap();
            let (first, second) = tokio::join!(
                cancel_booking(pool, &state.events, &cam, &booking.id, "client says no"),
                cancel_booking(pool, &state.events, &pat, &booking.id, "provider says no"),
            );
            assert_eq!(first.is_ok() as u8 + second.is_ok() as u8, 1, "round {round}");
            let loser = if first.is_ok() { second } else { first };
            assert!(
                matches!(
                    loser,
                    Err(AppError::InvalidTransition { .. }) | Err(AppError::Conflict(_))
                ),
                "round {round}: {loser:?}"
            );

            let stored = get_booking(pool, &cam, &booking.id).await.unwrap();
            assert_eq!(stored.status, BookingStatus::Cancelled);
            let payment = payments::payment_for_booking(pool, &booking.id).await.unwrap().unwrap();
            assert_eq!(payment.status, PaymentStatus::Failed);
        }
    }

    #[actix_web::test]
    async fn reschedule_only_while_open() {
        let w = world().await;
        let booking = book(&w, Utc::now() + Duration::days(2)).await;
        let new_date = Utc::now() + Duration::days(9);

        let moved = reschedule_booking(
            &w.pool,
            &w.state.events,
            &w.cam,
            &booking.id,
            Reschedule {
                date: Some(new_date),
                address: Some("1 New Rd".into()),
                notes: None,
            },
        )
        .await
        .unwrap();
        assert_eq!(moved.date, new_date);
        assert_eq!(moved.address.as_deref(), Some("1 New Rd"));
        assert_eq!(moved.status, BookingStatus::Pending);

        start_service(&w.pool, &w.state.events, &w.pat, &booking.id).await.unwrap();
        let late = reschedule_booking(
            &w.pool,
            &w.state.events,
            &w.cam,
            &booking.id,
            Reschedule {
                date: Some(new_date),
                address: None,
                notes: None,
            },
        )
        .await;
        assert!(matches!(late, Err(AppError::Conflict(_))));
    }

    #[actix_web::test]
    async fn tabs_split_bookings_by_status_and_date() {
        let w = world().await;
        let now = Utc::now();
        let future = book(&w, now + Duration::days(3)).await;
        let old_done = book(&w, now - Duration::days(10)).await;
        let old_cancelled = book(&w, now - Duration::days(5)).await;
        let ongoing = book(&w, now + Duration::days(1)).await;

        start_service(&w.pool, &w.state.events, &w.pat, &old_done.id).await.unwrap();
        complete_service(&w.pool, &w.state.events, &w.cam, &old_done.id).await.unwrap();
        cancel_booking(&w.pool, &w.state.events, &w.pat, &old_cancelled.id, "sick")
            .await
            .unwrap();
        start_service(&w.pool, &w.state.events, &w.pat, &ongoing.id).await.unwrap();

        let ids = |bookings: Vec<Booking>| bookings.into_iter().map(|b| b.id).collect::<Vec<_>>();

        let upcoming = list_bookings(&w.pool, &w.cam, BookingTab::Upcoming, None, now).await.unwrap();
        assert_eq!(ids(upcoming), [future.id.clone()]);

        let past = list_bookings(&w.pool, &w.cam, BookingTab::Past, None, now).await.unwrap();
        assert_eq!(ids(past), [old_done.id.clone()]);

        let cancelled = list_bookings(&w.pool, &w.cam, BookingTab::Cancelled, None, now).await.unwrap();
        assert_eq!(ids(cancelled), [old_cancelled.id.clone()]);

        let ongoing_tab = list_bookings(&w.pool, &w.pat, BookingTab::Ongoing, None, now).await.unwrap();
        assert_eq!(ids(ongoing_tab), [ongoing.id.clone()]);

        let all = list_bookings(&w.pool, &w.pat, BookingTab::All, None, now).await.unwrap();
        assert_eq!(all.len(), 4);
    }

    #[actix_web::test]
    async fn client_upcoming_is_capped_and_sorted() {
        let w = world().await;
        let now = Utc::now();
        for days in (1..=7).rev() {
            book(&w, now + Duration::days(days)).await;
        }
        let upcoming = list_bookings(&w.pool, &w.cam, BookingTab::Upcoming, None, now).await.unwrap();
        assert_eq!(upcoming.len(), CLIENT_UPCOMING_LIMIT);
        assert!(upcoming.windows(2).all(|pair| pair[0].date <= pair[1].date));

        let provider_view = list_bookings(&w.pool, &w.pat, BookingTab::Upcoming, None, now).await.unwrap();
        assert_eq!(provider_view.len(), 7);
    }

    #[actix_web::test]
    async fn provider_search_matches_service_and_client() {
        let w = world().await;
        let other = listing_named(&w.pool, &w.pat, "Gutter sweep", 60.0).await;
        book(&w, Utc::now() + Duration::days(1)).await;
        let mut input = NewBooking::for_service(&other.id);
        input.date = Some(Utc::now() + Duration::days(2));
        create_booking(&w.pool, &w.state.events, &w.cam, input).await.unwrap();

        let gutters = list_bookings(&w.pool, &w.pat, BookingTab::All, Some("gutter"), Utc::now())
            .await
            .unwrap();
        assert_eq!(gutters.len(), 1);
        let by_email = list_bookings(&w.pool, &w.pat, BookingTab::All, Some("CAM@"), Utc::now())
            .await
            .unwrap();
        assert_eq!(by_email.len(), 2);
    }
}
