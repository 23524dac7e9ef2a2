//! Circulation coordinator: checkout, return, renewal, overdue transitions
//!
//! The only component allowed to touch the inventory ledger and a checkout
//! record in the same operation. Every mutation runs inside the owning
//! book's lock, so operations on one book are totally ordered while
//! unrelated books proceed independently. The lock is held across the whole
//! reserve/insert/compensate sequence: no code path can leave the ledger and
//! the checkout records disagreeing about who holds a copy.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::{
    config::CirculationConfig,
    error::{AppError, AppResult},
    models::{Book, BookAvailability, Checkout},
    repository::{BookRepository, CheckoutRepository},
    services::{
        events::{ChangeEvent, ChangePropagator},
        ledger::InventoryLedger,
    },
};

/// Result of a return: the close always commits, but the copy release can
/// fail independently, in which case the inventory needs operator attention.
#[derive(Debug, Clone)]
pub struct ReturnOutcome {
    pub checkout: Checkout,
    pub reconciliation_required: bool,
}

pub struct CirculationService {
    books: Arc<dyn BookRepository>,
    checkouts: Arc<dyn CheckoutRepository>,
    ledger: Arc<InventoryLedger>,
    events: Arc<ChangePropagator>,
    policy: CirculationConfig,
    locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl CirculationService {
    pub fn new(
        books: Arc<dyn BookRepository>,
        checkouts: Arc<dyn CheckoutRepository>,
        ledger: Arc<InventoryLedger>,
        events: Arc<ChangePropagator>,
        policy: CirculationConfig,
    ) -> Self {
        Self {
            books,
            checkouts,
            ledger,
            events,
            policy,
            locks: Mutex::new(HashMap::new()),
        }
    }

    async fn book_lock(&self, book_id: Uuid) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(book_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Acquire the book's lock, waiting at most `lock_wait_ms` per attempt.
    /// A timed-out wait is retried once before surfacing `Busy`.
    async fn acquire(&self, book_id: Uuid) -> AppResult<OwnedMutexGuard<()>> {
        let lock = self.book_lock(book_id).await;
        let wait = StdDuration::from_millis(self.policy.lock_wait_ms);
        for attempt in 0..2 {
            match tokio::time::timeout(wait, Arc::clone(&lock).lock_owned()).await {
                Ok(guard) => return Ok(guard),
                Err(_) if attempt == 0 => {
                    tracing::debug!(%book_id, "lock wait timed out, retrying once");
                }
                Err(_) => {}
            }
        }
        Err(AppError::Busy(format!(
            "timed out waiting for book {} lock",
            book_id
        )))
    }

    /// Check a copy of the book with this ISBN out to the user.
    pub async fn checkout_book(&self, isbn: &str, user_id: Uuid) -> AppResult<Checkout> {
        let book = self.books.fetch_by_isbn(isbn).await?;
        let _guard = self.acquire(book.id).await?;

        self.ledger.ensure_unquarantined(book.id).await?;

        if self.policy.enforce_single_copy_per_user {
            if let Some(existing) = self
                .checkouts
                .find_open_by_user_and_book(user_id, book.id)
                .await?
            {
                return Err(AppError::AlreadyCheckedOut(format!(
                    "user {} already holds checkout {} for book {}",
                    user_id, existing.id, book.id
                )));
            }
        }

        let open = self
            .checkouts
            .count_open_by_user(user_id, self.policy.count_overdue_toward_limit)
            .await?;
        if open >= self.policy.max_checkouts_per_user {
            return Err(AppError::CheckoutLimitReached(format!(
                "user {} already has {}/{} open checkouts",
                user_id, open, self.policy.max_checkouts_per_user
            )));
        }

        let available = self.ledger.reserve_copy(book.id).await?;

        let now = Utc::now();
        let checkout = Checkout::open(
            user_id,
            book.id,
            now,
            Duration::days(self.policy.loan_period_days),
            self.policy.max_renewals,
        );

        if let Err(err) = self.checkouts.insert(&checkout).await {
            // Compensate: the reservation must not outlive the failed open.
            match self.ledger.release_copy(book.id).await {
                Ok(_) => {
                    tracing::warn!(
                        book_id = %book.id,
                        error = %err,
                        "checkout insert failed, reservation rolled back"
                    );
                }
                Err(release_err) => {
                    tracing::error!(
                        book_id = %book.id,
                        error = %release_err,
                        "compensating release failed after checkout insert failure"
                    );
                    self.ledger.quarantine(book.id).await;
                }
            }
            return Err(err);
        }

        self.events
            .publish(ChangeEvent::BookAvailability(BookAvailability {
                book_id: book.id,
                available_copies: available,
            }))
            .await;
        self.events
            .publish(ChangeEvent::CheckoutStatus((&checkout).into()))
            .await;

        tracing::info!(
            checkout_id = %checkout.id,
            book_id = %book.id,
            user_id = %user_id,
            available_copies = available,
            "book checked out"
        );

        Ok(checkout)
    }

    /// Return the checkout's copy. The close always commits; a failed copy
    /// release quarantines the book and flags the outcome for operator
    /// reconciliation instead of blocking the return.
    pub async fn return_book(&self, checkout_id: Uuid) -> AppResult<ReturnOutcome> {
        let current = self.checkouts.fetch(checkout_id).await?;
        let _guard = self.acquire(current.book_id).await?;

        let mut checkout = self.checkouts.fetch(checkout_id).await?;
        checkout.close(Utc::now())?;
        self.checkouts.update(&checkout).await?;

        let reconciliation_required = match self.ledger.release_copy(checkout.book_id).await {
            Ok(available) => {
                self.events
                    .publish(ChangeEvent::BookAvailability(BookAvailability {
                        book_id: checkout.book_id,
                        available_copies: available,
                    }))
                    .await;
                false
            }
            Err(err) => {
                tracing::error!(
                    checkout_id = %checkout.id,
                    book_id = %checkout.book_id,
                    error = %err,
                    "copy release failed after return; inventory needs reconciliation"
                );
                self.ledger.quarantine(checkout.book_id).await;
                true
            }
        };

        self.events
            .publish(ChangeEvent::CheckoutStatus((&checkout).into()))
            .await;

        tracing::info!(
            checkout_id = %checkout.id,
            book_id = %checkout.book_id,
            reconciliation_required,
            "book returned"
        );

        Ok(ReturnOutcome {
            checkout,
            reconciliation_required,
        })
    }

    /// Renew the checkout. The ledger is untouched: a renewal never changes
    /// copy counts.
    pub async fn renew_checkout(&self, checkout_id: Uuid) -> AppResult<Checkout> {
        let current = self.checkouts.fetch(checkout_id).await?;
        let _guard = self.acquire(current.book_id).await?;

        let mut checkout = self.checkouts.fetch(checkout_id).await?;
        checkout.renew(
            Utc::now(),
            Duration::days(self.policy.renewal_period_days),
        )?;
        self.checkouts.update(&checkout).await?;

        self.events
            .publish(ChangeEvent::CheckoutStatus((&checkout).into()))
            .await;

        tracing::info!(
            checkout_id = %checkout.id,
            renewal_count = checkout.renewal_count,
            due_date = %checkout.due_date,
            "checkout renewed"
        );

        Ok(checkout)
    }

    /// Sweep entry point: flag an active, past-due checkout as overdue.
    /// Returns the updated record when a transition happened.
    pub async fn mark_overdue(
        &self,
        checkout_id: Uuid,
        now: DateTime<Utc>,
    ) -> AppResult<Option<Checkout>> {
        let current = self.checkouts.fetch(checkout_id).await?;
        let _guard = self.acquire(current.book_id).await?;

        let mut checkout = self.checkouts.fetch(checkout_id).await?;
        if !checkout.mark_overdue(now)? {
            return Ok(None);
        }
        self.checkouts.update(&checkout).await?;

        self.events
            .publish(ChangeEvent::CheckoutStatus((&checkout).into()))
            .await;

        tracing::debug!(checkout_id = %checkout.id, "checkout marked overdue");

        Ok(Some(checkout))
    }

    pub async fn get_checkout(&self, checkout_id: Uuid) -> AppResult<Checkout> {
        self.checkouts.fetch(checkout_id).await
    }

    pub async fn list_user_checkouts(&self, user_id: Uuid) -> AppResult<Vec<Checkout>> {
        self.checkouts.list_by_user(user_id).await
    }

    /// Read-only overdue snapshot, independent of sweeper timing.
    pub async fn list_overdue(&self, now: DateTime<Utc>) -> AppResult<Vec<Checkout>> {
        self.checkouts.list_overdue(now).await
    }

    /// Operator action after manual stock correction: lift the book's
    /// quarantine so circulation can resume.
    pub async fn reconcile_book(&self, book_id: Uuid) -> AppResult<Book> {
        let book = self.books.fetch(book_id).await?;
        if self.ledger.clear_quarantine(book_id).await {
            tracing::info!(%book_id, "inventory quarantine cleared by operator");
        }
        Ok(book)
    }

    #[cfg(test)]
    pub(crate) async fn grab_book_lock(&self, book_id: Uuid) -> OwnedMutexGuard<()> {
        self.book_lock(book_id).await.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CheckoutStatus;
    use crate::repository::{memory::InMemoryStore, MockCheckoutRepository};

    fn policy() -> CirculationConfig {
        CirculationConfig {
            lock_wait_ms: 20,
            ..CirculationConfig::default()
        }
    }

    async fn store_with_book(total: i32) -> (Arc<InMemoryStore>, Book) {
        let store = Arc::new(InMemoryStore::new());
        let book = Book::register("9780316769488".into(), "Title".into(), "Author".into(), total);
        BookRepository::insert(store.as_ref(), &book).await.unwrap();
        (store, book)
    }

    fn service(
        books: Arc<dyn BookRepository>,
        checkouts: Arc<dyn CheckoutRepository>,
    ) -> CirculationService {
        let ledger = Arc::new(InventoryLedger::new(books.clone()));
        let events = Arc::new(ChangePropagator::new());
        events.start();
        CirculationService::new(books, checkouts, ledger, events, policy())
    }

    #[tokio::test]
    async fn failed_insert_rolls_back_the_reservation() {
        let (store, book) = store_with_book(2).await;

        let mut checkouts = MockCheckoutRepository::new();
        checkouts
            .expect_find_open_by_user_and_book()
            .returning(|_, _| Ok(None));
        checkouts.expect_count_open_by_user().returning(|_, _| Ok(0));
        checkouts
            .expect_insert()
            .returning(|_| Err(AppError::Internal("injected insert failure".into())));

        let service = service(store.clone(), Arc::new(checkouts));

        let err = service
            .checkout_book(&book.isbn, Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));

        // No leaked reservation: the count is back where it started.
        let after = BookRepository::fetch(store.as_ref(), book.id).await.unwrap();
        assert_eq!(after.available_copies, 2);
    }

    #[tokio::test]
    async fn lock_contention_surfaces_busy_without_touching_state() {
        let (store, book) = store_with_book(1).await;
        let service = service(store.clone(), store.clone());

        let _held = service.grab_book_lock(book.id).await;

        let err = service
            .checkout_book(&book.isbn, Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Busy(_)));

        let after = BookRepository::fetch(store.as_ref(), book.id).await.unwrap();
        assert_eq!(after.available_copies, 1);
    }

    #[tokio::test]
    async fn duplicate_checkout_by_same_user_is_rejected() {
        let (store, book) = store_with_book(3).await;
        let service = service(store.clone(), store.clone());
        let user = Uuid::new_v4();

        service.checkout_book(&book.isbn, user).await.unwrap();
        let err = service.checkout_book(&book.isbn, user).await.unwrap_err();
        assert!(matches!(err, AppError::AlreadyCheckedOut(_)));

        let after = BookRepository::fetch(store.as_ref(), book.id).await.unwrap();
        assert_eq!(after.available_copies, 2);
    }

    #[tokio::test]
    async fn checkout_limit_is_enforced() {
        let store = Arc::new(InMemoryStore::new());
        let user = Uuid::new_v4();
        let mut isbns = Vec::new();
        for i in 0..6 {
            let isbn = format!("978000000000{}", i);
            let book = Book::register(isbn.clone(), format!("Title {}", i), "Author".into(), 1);
            BookRepository::insert(store.as_ref(), &book).await.unwrap();
            isbns.push(isbn);
        }

        let service = service(store.clone(), store.clone());
        for isbn in &isbns[..5] {
            service.checkout_book(isbn, user).await.unwrap();
        }

        let err = service.checkout_book(&isbns[5], user).await.unwrap_err();
        assert!(matches!(err, AppError::CheckoutLimitReached(_)));
    }

    #[tokio::test]
    async fn return_commits_even_when_the_release_fails() {
        let (store, book) = store_with_book(1).await;
        let service = service(store.clone(), store.clone());
        let user = Uuid::new_v4();

        let checkout = service.checkout_book(&book.isbn, user).await.unwrap();

        // Simulate the anomaly the compensation path guards against: the
        // copy found its way back to the shelf outside the ledger.
        BookRepository::increment_available(store.as_ref(), book.id)
            .await
            .unwrap();

        let outcome = service.return_book(checkout.id).await.unwrap();
        assert!(outcome.reconciliation_required);
        assert_eq!(outcome.checkout.status, CheckoutStatus::Returned);

        // The book is quarantined until an operator reconciles it.
        let err = service
            .checkout_book(&book.isbn, Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ReconciliationRequired(_)));

        service.reconcile_book(book.id).await.unwrap();
        service
            .checkout_book(&book.isbn, Uuid::new_v4())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn unknown_isbn_is_not_found() {
        let (store, _book) = store_with_book(1).await;
        let service = service(store.clone(), store.clone());

        let err = service
            .checkout_book("9999999999999", Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
