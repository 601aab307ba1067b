//! Booking status machine, pricing and listing predicates.
//!
//! Nothing in here touches the database; `stores::bookings` loads the current
//! status, asks [`transition`] for the next one and writes it back with a
//! compare-and-set on the status it started from.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::models::{Booking, BookingStatus};

pub const SERVICE_FEE_RATE: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookingAction {
    Confirm,
    Start,
    Complete,
    Cancel,
}

impl BookingAction {
    pub fn as_str(self) -> &'static str {
        match self {
            BookingAction::Confirm => "confirm",
            BookingAction::Start => "start",
            BookingAction::Complete => "complete",
            BookingAction::Cancel => "cancel",
        }
    }
}

impl std::fmt::Display for BookingAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionError {
    pub from: BookingStatus,
    pub action: BookingAction,
}

pub fn transition(
    current: BookingStatus,
    action: BookingAction,
) -> Result<BookingStatus, TransitionError> {
    use BookingAction::*;
    use BookingStatus::*;

    match (current, action) {
        (Pending, Confirm) => Ok(Confirmed),
        (Pending | Confirmed, Start) => Ok(InProgress),
        (InProgress, Complete) => Ok(Completed),
        (Pending | Confirmed, Cancel) => Ok(Cancelled),
        (from, action) => Err(TransitionError { from, action }),
    }
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pricing {
    pub price: f64,
    pub fee: f64,
    pub total: f64,
}

impl Pricing {
    pub fn for_price(price: f64) -> Self {
        Pricing {
            price,
            fee: round2(price * SERVICE_FEE_RATE),
            total: round2(price * (1.0 + SERVICE_FEE_RATE)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingTab {
    #[default]
    All,
    Upcoming,
    Ongoing,
    Past,
    Completed,
    Cancelled,
}

fn same_day(a: DateTime<Utc>, b: DateTime<Utc>) -> bool {
    a.date_naive() == b.date_naive()
}

pub fn is_upcoming(booking: &Booking, now: DateTime<Utc>) -> bool {
    matches!(
        booking.status,
        BookingStatus::Pending | BookingStatus::Confirmed
    ) && (booking.date >= now || same_day(booking.date, now))
}

pub fn is_past(booking: &Booking, now: DateTime<Utc>) -> bool {
    if booking.status == BookingStatus::Cancelled || is_upcoming(booking, now) {
        return false;
    }
    booking.status == BookingStatus::Completed || booking.date < now
}

pub fn in_tab(booking: &Booking, tab: BookingTab, now: DateTime<Utc>) -> bool {
    match tab {
        BookingTab::All => true,
        BookingTab::Upcoming => is_upcoming(booking, now),
        BookingTab::Ongoing => booking.status == BookingStatus::InProgress,
        BookingTab::Past => is_past(booking, now),
        BookingTab::Completed => booking.status == BookingStatus::Completed,
        BookingTab::Cancelled => booking.status == BookingStatus::Cancelled,
    }
}
