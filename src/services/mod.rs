//! Business logic services

pub mod accounts;
pub mod cart;
pub mod circulation;
pub mod fines;
pub mod inventory;
pub mod stats;

use crate::{config::AppConfig, repository::Repository};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub accounts: accounts::AccountsService,
    pub inventory: inventory::InventoryService,
    pub circulation: circulation::CirculationService,
    pub cart: cart::CartService,
    pub fines: fines::FinesService,
    pub stats: stats::StatsService,
    /// Store handle, kept for readiness checks and shutdown
    pub repository: Repository,
}

impl Services {
    /// Create all services over one store handle
    pub fn new(repository: Repository, config: &AppConfig) -> Self {
        Self {
            accounts: accounts::AccountsService::new(repository.clone(), config.auth.clone()),
            inventory: inventory::InventoryService::new(repository.clone()),
            circulation: circulation::CirculationService::new(
                repository.clone(),
                config.circulation.clone(),
            ),
            cart: cart::CartService::new(repository.clone(), config.circulation.cart_capacity),
            fines: fines::FinesService::new(repository.clone()),
            stats: stats::StatsService::new(repository.clone()),
            repository,
        }
    }
}
