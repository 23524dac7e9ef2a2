//! Business logic services

pub mod catalog;
pub mod circulation;
pub mod email;
pub mod events;
pub mod ledger;
pub mod sweeper;

use std::sync::Arc;

use crate::{config::AppConfig, repository::Repository};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub catalog: catalog::CatalogService,
    pub circulation: Arc<circulation::CirculationService>,
    pub ledger: Arc<ledger::InventoryLedger>,
    pub events: Arc<events::ChangePropagator>,
    pub sweeper: Arc<sweeper::OverdueSweeper>,
}

impl Services {
    /// Wire all services over the given repository and notifier
    pub fn new(
        repository: Repository,
        notifier: Arc<dyn email::OverdueNotifier>,
        config: &AppConfig,
    ) -> Self {
        let events = Arc::new(events::ChangePropagator::new());
        let ledger = Arc::new(ledger::InventoryLedger::new(repository.books.clone()));
        let circulation = Arc::new(circulation::CirculationService::new(
            repository.books.clone(),
            repository.checkouts.clone(),
            ledger.clone(),
            events.clone(),
            config.circulation.clone(),
        ));
        let sweeper = Arc::new(sweeper::OverdueSweeper::new(
            circulation.clone(),
            repository.checkouts.clone(),
            notifier,
            config.sweeper.clone(),
        ));

        Self {
            catalog: catalog::CatalogService::new(repository.books),
            circulation,
            ledger,
            events,
            sweeper,
        }
    }
}
