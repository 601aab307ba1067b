//! Persistence and authorization for every record the marketplace keeps.
//! Each operation takes the caller's [`Session`](crate::auth::Session) and
//! decides for itself whether the caller may act.

pub mod bookings;
pub mod catalog;
pub mod contact;
pub mod dashboard;
pub mod favorites;
pub mod messaging;
pub mod payments;
pub mod profiles;
pub mod reviews;

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}
