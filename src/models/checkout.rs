//! Checkout record and its lifecycle transitions
//!
//! The status machine is `ACTIVE -> RETURNED` and
//! `ACTIVE -> OVERDUE -> RETURNED`; `RETURNED` is terminal. Transitions are
//! pure value mutations validated against the current status; persistence is
//! the caller's concern.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{AppError, AppResult};

/// Lifecycle status of a checkout record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "checkout_status", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum CheckoutStatus {
    Active,
    Returned,
    Overdue,
}

/// A single borrow of one copy of a book by one user
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Checkout {
    pub id: Uuid,
    pub user_id: Uuid,
    pub book_id: Uuid,
    pub status: CheckoutStatus,
    pub checked_out_at: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub returned_at: Option<DateTime<Utc>>,
    pub renewal_count: i32,
    pub max_renewals: i32,
    pub overdue_email_sent: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Checkout {
    /// Open a new checkout in `ACTIVE` with no renewals used.
    pub fn open(
        user_id: Uuid,
        book_id: Uuid,
        now: DateTime<Utc>,
        loan_period: Duration,
        max_renewals: i32,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            book_id,
            status: CheckoutStatus::Active,
            checked_out_at: now,
            due_date: now + loan_period,
            returned_at: None,
            renewal_count: 0,
            max_renewals,
            overdue_email_sent: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the record still holds a copy (counts against availability).
    pub fn is_open(&self) -> bool {
        matches!(self.status, CheckoutStatus::Active | CheckoutStatus::Overdue)
    }

    /// Extend the due date by `extension`, consuming one renewal.
    ///
    /// Legal from `ACTIVE` and `OVERDUE`; a renewal past `max_renewals` is
    /// rejected, never clamped. An overdue checkout whose new due date lands
    /// in the future goes back to `ACTIVE`.
    pub fn renew(&mut self, now: DateTime<Utc>, extension: Duration) -> AppResult<()> {
        if self.status == CheckoutStatus::Returned {
            return Err(AppError::AlreadyReturned(format!(
                "checkout {} is already returned",
                self.id
            )));
        }
        if self.renewal_count >= self.max_renewals {
            return Err(AppError::RenewalLimitExceeded(format!(
                "checkout {} has used {}/{} renewals",
                self.id, self.renewal_count, self.max_renewals
            )));
        }

        self.due_date = self.due_date + extension;
        self.renewal_count += 1;
        if self.status == CheckoutStatus::Overdue && self.due_date > now {
            self.status = CheckoutStatus::Active;
        }
        self.updated_at = now;
        Ok(())
    }

    /// Close the checkout: `RETURNED` with `returned_at = now`.
    pub fn close(&mut self, now: DateTime<Utc>) -> AppResult<()> {
        if self.status == CheckoutStatus::Returned {
            return Err(AppError::AlreadyReturned(format!(
                "checkout {} is already returned",
                self.id
            )));
        }
        self.status = CheckoutStatus::Returned;
        self.returned_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// Flag an active checkout past its due date as `OVERDUE`.
    ///
    /// Returns `Ok(true)` when the transition happened, `Ok(false)` when
    /// there was nothing to do (already overdue, or renewed past `now`
    /// between the sweep's listing and this call).
    pub fn mark_overdue(&mut self, now: DateTime<Utc>) -> AppResult<bool> {
        match self.status {
            CheckoutStatus::Returned => Err(AppError::AlreadyReturned(format!(
                "checkout {} is already returned",
                self.id
            ))),
            CheckoutStatus::Overdue => Ok(false),
            CheckoutStatus::Active => {
                if self.due_date >= now {
                    return Ok(false);
                }
                self.status = CheckoutStatus::Overdue;
                self.updated_at = now;
                Ok(true)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_checkout(now: DateTime<Utc>) -> Checkout {
        Checkout::open(Uuid::new_v4(), Uuid::new_v4(), now, Duration::days(14), 2)
    }

    #[test]
    fn open_starts_active_with_no_renewals() {
        let now = Utc::now();
        let checkout = open_checkout(now);
        assert_eq!(checkout.status, CheckoutStatus::Active);
        assert_eq!(checkout.renewal_count, 0);
        assert_eq!(checkout.due_date, now + Duration::days(14));
        assert!(!checkout.overdue_email_sent);
        assert!(checkout.is_open());
    }

    #[test]
    fn renew_extends_due_date_until_the_cap() {
        let now = Utc::now();
        let mut checkout = open_checkout(now);
        let original_due = checkout.due_date;

        checkout.renew(now, Duration::days(14)).unwrap();
        checkout.renew(now, Duration::days(14)).unwrap();
        assert_eq!(checkout.renewal_count, 2);
        assert_eq!(checkout.due_date, original_due + Duration::days(28));

        let err = checkout.renew(now, Duration::days(14)).unwrap_err();
        assert!(matches!(err, AppError::RenewalLimitExceeded(_)));
        // Rejected, not clamped: nothing moved.
        assert_eq!(checkout.renewal_count, 2);
        assert_eq!(checkout.due_date, original_due + Duration::days(28));
    }

    #[test]
    fn renew_recovers_an_overdue_checkout() {
        let now = Utc::now();
        let mut checkout = open_checkout(now - Duration::days(20));
        assert!(checkout.mark_overdue(now).unwrap());
        assert_eq!(checkout.status, CheckoutStatus::Overdue);

        checkout.renew(now, Duration::days(14)).unwrap();
        assert_eq!(checkout.status, CheckoutStatus::Active);
        assert!(checkout.due_date > now);
    }

    #[test]
    fn renew_from_overdue_can_stay_overdue() {
        let now = Utc::now();
        // 40 days late: one 14-day extension still leaves the due date in the past.
        let mut checkout = open_checkout(now - Duration::days(54));
        assert!(checkout.mark_overdue(now).unwrap());

        checkout.renew(now, Duration::days(14)).unwrap();
        assert_eq!(checkout.status, CheckoutStatus::Overdue);
    }

    #[test]
    fn close_is_terminal() {
        let now = Utc::now();
        let mut checkout = open_checkout(now);
        checkout.close(now).unwrap();
        assert_eq!(checkout.status, CheckoutStatus::Returned);
        assert_eq!(checkout.returned_at, Some(now));
        assert!(!checkout.is_open());

        assert!(matches!(checkout.close(now), Err(AppError::AlreadyReturned(_))));
        assert!(matches!(
            checkout.renew(now, Duration::days(14)),
            Err(AppError::AlreadyReturned(_))
        ));
        assert!(matches!(checkout.mark_overdue(now), Err(AppError::AlreadyReturned(_))));
        assert_eq!(checkout.status, CheckoutStatus::Returned);
    }

    #[test]
    fn mark_overdue_is_idempotent() {
        let now = Utc::now();
        let mut checkout = open_checkout(now - Duration::days(20));
        assert!(checkout.mark_overdue(now).unwrap());
        assert!(!checkout.mark_overdue(now).unwrap());
        assert_eq!(checkout.status, CheckoutStatus::Overdue);
    }

    #[test]
    fn mark_overdue_skips_checkouts_not_yet_due() {
        let now = Utc::now();
        let mut checkout = open_checkout(now);
        assert!(!checkout.mark_overdue(now).unwrap());
        assert_eq!(checkout.status, CheckoutStatus::Active);
    }
}
