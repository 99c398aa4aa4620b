//! Pulling the household from the store
//!
//! A full fetch reads every collection in parallel, opens missing payment
//! rows for the current month, seeds an empty household and then runs the
//! auto-task rules. Each full fetch takes a generation number when it
//! starts; a result that arrives after a newer one has been applied is
//! dropped.

mod scheduler;

pub use self::scheduler::{PollingScheduler, Refresher, SchedulerHandle};

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use std::collections::HashSet;
use std::sync::atomic::Ordering;

use crate::error::Result;
use crate::household::Household;
use crate::identity::CurrentUser;
use crate::model::{
    Bill, BillPayment, Category, GroceryItem, NewBillPayment, Routine, Task, TaskStatus,
};
use crate::state::HouseholdState;
use crate::store::Query;

/// One consistent read of every collection
#[derive(Debug, Default)]
struct Fetched {
    categories: Vec<Category>,
    tasks: Vec<Task>,
    completed_tasks: Vec<Task>,
    completed_this_week: usize,
    bills: Vec<Bill>,
    payments: Vec<BillPayment>,
    routines: Vec<Routine>,
    grocery_items: Vec<GroceryItem>,
}

impl Fetched {
    fn is_empty_household(&self) -> bool {
        self.tasks.is_empty()
            && self.completed_tasks.is_empty()
            && self.bills.is_empty()
            && self.routines.is_empty()
    }
}

fn pending_tasks() -> Query {
    Query::new()
        .eq("status", TaskStatus::Pending.as_str())
        .order_by("created_at", false)
}

fn completed_tasks() -> Query {
    Query::new()
        .eq("status", TaskStatus::Completed.as_str())
        .order_by("completed_at", false)
}

fn bills_by_due_day() -> Query {
    Query::new().order_by("due_day", true)
}

fn payments_for(month: u32, year: i32) -> Query {
    Query::new().eq("month", month).eq("year", year)
}

fn routines_by_age() -> Query {
    Query::new().order_by("created_at", true)
}

fn grocery_by_category() -> Query {
    Query::new()
        .order_by("category", true)
        .order_by("name", true)
}

impl Household {
    /// First fetch: seeds the household when it is empty
    pub async fn load(&self) -> Result<()> {
        self.fetch_all(true).await
    }

    /// Full re-fetch of every collection
    pub async fn refresh(&self) -> Result<()> {
        self.fetch_all(false).await
    }

    async fn fetch_all(&self, initial: bool) -> Result<()> {
        let generation = self.fetch_generation.fetch_add(1, Ordering::SeqCst) + 1;

        let Some(user) = self.identity.current_user().await? else {
            debug!("No signed-in user, leaving household empty");
            if self.claim_generation(generation) {
                self.state.write(|s| {
                    *s = HouseholdState {
                        loading: false,
                        ..HouseholdState::default()
                    }
                });
            }
            return Ok(());
        };

        let now = self.now();
        let mut fetched = self.fetch_collections(now).await?;

        if initial && fetched.is_empty_household() {
            match self.seeder.seed(&self.repos, &user.id).await {
                Ok(true) => {
                    tokio::time::sleep(self.options.seed_retry_delay).await;
                    fetched = self.fetch_collections(now).await?;
                }
                Ok(false) => {}
                Err(e) => warn!("Seeding failed, continuing with an empty household: {}", e),
            }
        }

        if !self.claim_generation(generation) {
            debug!("Discarding fetch {}, a newer one was applied", generation);
            return Ok(());
        }
        self.apply(user.clone(), fetched);

        self.run_rules(&user.id).await;
        Ok(())
    }

    /// Record `generation` as applied unless a newer fetch already was
    fn claim_generation(&self, generation: u64) -> bool {
        self.applied_generation
            .fetch_max(generation, Ordering::SeqCst)
            < generation
    }

    async fn fetch_collections(&self, now: DateTime<Utc>) -> Result<Fetched> {
        let (month, year) = self.options.month_year(now);
        let week_start = self.options.week_start(now).to_rfc3339();
        let completed_since = Query::new()
            .eq("status", TaskStatus::Completed.as_str())
            .gte("completed_at", week_start)
            .filters;

        let categories_query = Query::new().order_by("created_at", true);
        let (pending_query, completed_query) = (pending_tasks(), completed_tasks());
        let (bills_query, payments_query) = (bills_by_due_day(), payments_for(month, year));
        let (routines_query, grocery_query) = (routines_by_age(), grocery_by_category());

        let (
            categories,
            tasks,
            completed_tasks,
            completed_this_week,
            bills,
            payments,
            routines,
            grocery_items,
        ) = tokio::try_join!(
            self.repos.categories.list(&categories_query),
            self.repos.tasks.list(&pending_query),
            self.repos.tasks.list(&completed_query),
            self.repos.tasks.count(&completed_since),
            self.repos.bills.list(&bills_query),
            self.repos.payments.list(&payments_query),
            self.repos.routines.list(&routines_query),
            self.repos.groceries.list(&grocery_query),
        )?;

        let payments = self.open_missing_payments(&bills, payments, month, year).await?;

        Ok(Fetched {
            categories,
            tasks,
            completed_tasks,
            completed_this_week,
            bills,
            payments,
            routines,
            grocery_items,
        })
    }

    /// Insert this month's payment row for every bill that lacks one
    async fn open_missing_payments(
        &self,
        bills: &[Bill],
        payments: Vec<BillPayment>,
        month: u32,
        year: i32,
    ) -> Result<Vec<BillPayment>> {
        let covered: HashSet<&str> = payments.iter().map(|p| p.bill_id.as_str()).collect();
        let missing: Vec<NewBillPayment> = bills
            .iter()
            .filter(|b| !covered.contains(b.id.as_str()))
            .map(|b| NewBillPayment {
                bill_id: b.id.clone(),
                month,
                year,
                paid: false,
            })
            .collect();
        if missing.is_empty() {
            return Ok(payments);
        }

        info!("Opening {} payment rows for {}/{}", missing.len(), month, year);
        self.repos.payments.insert_many(&missing).await?;
        self.repos.payments.list(&payments_for(month, year)).await
    }

    fn apply(&self, user: CurrentUser, fetched: Fetched) {
        self.state.write(|s| {
            s.user_name = user.display_name();
            s.user = Some(user);
            s.categories = fetched.categories;
            s.tasks = fetched.tasks;
            s.completed_tasks = fetched.completed_tasks;
            s.completed_this_week = fetched.completed_this_week;
            s.bills = fetched.bills;
            s.payments = fetched.payments;
            s.routines = fetched.routines;
            s.grocery_items = fetched.grocery_items;
            s.rebuild_user_map();
            s.loading = false;
        });
    }

    /// Re-evaluate every auto-task rule against the state just applied
    async fn run_rules(&self, user_id: &str) {
        let (bills, payments, routines, items) = self.state.read(|s| {
            (
                s.bills.clone(),
                s.payments.clone(),
                s.routines.clone(),
                s.grocery_items.clone(),
            )
        });
        let mut changed = false;

        match self.rules.sync_bill_tasks(&bills, &payments, user_id).await {
            Ok(links) if !links.is_empty() => {
                self.link_payments(&links);
                changed = true;
            }
            Ok(_) => {}
            Err(e) => warn!("bill task sync failed: {}", e),
        }

        match self.rules.sync_routine_tasks(&routines, user_id).await {
            Ok(created) => changed |= !created.is_empty(),
            Err(e) => warn!("routine task sync failed: {}", e),
        }

        match self.rules.sync_grocery_task(&items, user_id).await {
            Ok(plan) => changed |= plan != crate::rules::GroceryPlan::Nothing,
            Err(e) => warn!("supermarket task sync failed: {}", e),
        }

        if changed {
            if let Err(e) = self.refresh_tasks().await {
                warn!("task refresh failed: {}", e);
            }
        }
    }

    /// Re-read pending and completed tasks
    pub async fn refresh_tasks(&self) -> Result<()> {
        let (pending_query, completed_query) = (pending_tasks(), completed_tasks());
        let (tasks, completed) = tokio::try_join!(
            self.repos.tasks.list(&pending_query),
            self.repos.tasks.list(&completed_query),
        )?;
        self.state.write(|s| {
            s.tasks = tasks;
            s.completed_tasks = completed;
            s.rebuild_user_map();
        });
        Ok(())
    }

    pub async fn refresh_grocery(&self) -> Result<()> {
        let items = self.repos.groceries.list(&grocery_by_category()).await?;
        self.state.write(|s| s.grocery_items = items);
        Ok(())
    }

    /// Re-read bills and this month's payments
    pub async fn refresh_bills(&self) -> Result<()> {
        let (month, year) = self.options.month_year(self.now());
        let (bills_query, payments_query) = (bills_by_due_day(), payments_for(month, year));
        let (bills, payments) = tokio::try_join!(
            self.repos.bills.list(&bills_query),
            self.repos.payments.list(&payments_query),
        )?;
        self.state.write(|s| {
            s.bills = bills;
            s.payments = payments;
        });
        Ok(())
    }

    pub async fn refresh_routines(&self) -> Result<()> {
        let routines = self.repos.routines.list(&routines_by_age()).await?;
        self.state.write(|s| s.routines = routines);
        Ok(())
    }
}
