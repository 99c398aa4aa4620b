//! Household sync engine
//!
//! Keeps a household's tasks, bills, cleaning routines and grocery list in
//! memory, writes changes optimistically to a Supabase project, and
//! maintains the tasks that bills, routines and the grocery list generate
//! on their own.
//!
//! ```no_run
//! use hogar_sync::prelude::*;
//!
//! # async fn run() -> hogar_sync::error::Result<()> {
//! let hogar = Hogar::new(HogarConfig::from_env()?);
//! hogar.auth().sign_in_with_password("camila@example.com", "secreto").await?;
//!
//! let household = hogar.household();
//! household.load().await?;
//! household.complete_task("task-id").await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod coordinator;
pub mod error;
pub mod household;
pub mod identity;
pub mod model;
pub mod repository;
pub mod rules;
pub mod seed;
pub mod state;
pub mod store;
pub mod sync;
pub mod views;

use reqwest::Client;
use std::sync::Arc;

use hogar_auth::{Auth, AuthOptions};

use crate::config::{HogarConfig, SyncOptions};
use crate::household::{Household, HouseholdBuilder};
use crate::store::PostgrestStore;

/// Entry point wiring the auth client and the REST table store of one
/// Supabase project
pub struct Hogar {
    config: HogarConfig,
    http_client: Client,
    auth: Auth,
}

impl Hogar {
    pub fn new(config: HogarConfig) -> Self {
        let http_client = Client::new();
        let auth = Auth::new(
            config.url.as_str(),
            &config.anon_key,
            http_client.clone(),
            AuthOptions::default(),
        );

        Self {
            config,
            http_client,
            auth,
        }
    }

    pub fn auth(&self) -> &Auth {
        &self.auth
    }

    /// Table store that sends the current session's token
    pub fn store(&self) -> PostgrestStore {
        PostgrestStore::new(
            self.config.url.as_str(),
            &self.config.anon_key,
            self.http_client.clone(),
        )
        .with_auth(self.auth.clone())
    }

    /// Household builder over this project, identified by the auth session
    pub fn household_builder(&self) -> HouseholdBuilder {
        Household::builder(Arc::new(self.store()), Arc::new(self.auth.clone()))
    }

    pub fn household(&self) -> Household {
        self.household_with(SyncOptions::default())
    }

    pub fn household_with(&self, options: SyncOptions) -> Household {
        self.household_builder().options(options).build()
    }
}

/// A convenience module for common imports
pub mod prelude {
    pub use crate::config::{Clock, GroceryTaskPolicy, HogarConfig, SyncOptions};
    pub use crate::error::{Error, Result};
    pub use crate::household::Household;
    pub use crate::identity::{CurrentUser, IdentityProvider, StaticIdentity};
    pub use crate::model::{
        Assignee, Bill, BillDraft, BillPayment, Category, GroceryItem, GroceryStatus, Priority,
        Routine, RoutineDraft, Task, TaskDraft, TaskStatus,
    };
    pub use crate::store::{MemoryStore, PostgrestStore, TableStore};
    pub use crate::sync::{PollingScheduler, Refresher, SchedulerHandle};
    pub use crate::views::Dashboard;
    pub use crate::Hogar;
}
