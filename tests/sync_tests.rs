use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use hogar_sync::config::FixedClock;
use hogar_sync::error::{Error, Result};
use hogar_sync::prelude::*;
use hogar_sync::seed::{DefaultSeeder, Seeder};
use hogar_sync::store::{Filter, Query};

fn clock() -> Arc<FixedClock> {
    Arc::new(FixedClock::new(
        Utc.with_ymd_and_hms(2024, 3, 13, 9, 30, 0).unwrap(),
    ))
}

fn camila() -> Arc<StaticIdentity> {
    Arc::new(StaticIdentity::new(CurrentUser::new(
        "u1",
        "camila@example.com",
    )))
}

fn quick() -> SyncOptions {
    SyncOptions::default().with_seed_retry_delay(Duration::ZERO)
}

#[tokio::test]
async fn test_load_seeds_empty_household_once() {
    let store = Arc::new(MemoryStore::new());
    let household = Household::builder(store.clone(), camila())
        .options(quick())
        .clock(clock())
        .build();
    assert!(household.state().loading());

    household.load().await.unwrap();

    let state = household.state().snapshot();
    assert!(!state.loading);
    assert_eq!(state.user_name, "Camila");
    assert_eq!(state.bills.len(), 2);
    assert_eq!(state.bills[0].due_day, 5);
    assert_eq!(state.payments.len(), 2);
    assert_eq!(state.routines.len(), 6);
    assert_eq!(state.grocery_items.len(), 13);
    assert_eq!(state.grocery_needed(), 0);

    // A second client loading the same household does not seed again
    let other = Household::builder(store.clone(), camila())
        .options(quick())
        .clock(clock())
        .build();
    other.load().await.unwrap();
    let rent: Vec<Value> = store
        .rows("bills")
        .into_iter()
        .filter(|b| b["amount"] == 710000.0)
        .collect();
    assert_eq!(rent.len(), 1);
    assert_eq!(rent[0]["due_day"], 5);
    assert_eq!(store.rows("bill_payments").len(), 2);

    let repos = household.repositories();
    assert!(!DefaultSeeder::default().seed(repos, "u1").await.unwrap());
    assert_eq!(store.rows("routines").len(), 6);
}

#[tokio::test]
async fn test_refresh_never_seeds() {
    let store = Arc::new(MemoryStore::new());
    let household = Household::builder(store.clone(), camila())
        .clock(clock())
        .build();

    household.refresh().await.unwrap();

    assert!(!household.state().loading());
    assert!(store.rows("bills").is_empty());
}

struct FailingSeeder;

#[async_trait]
impl Seeder for FailingSeeder {
    async fn seed(&self, _: &hogar_sync::repository::Repositories, _: &str) -> Result<bool> {
        Err(Error::store("insert", "bills", "boom"))
    }
}

#[tokio::test]
async fn test_failed_seed_leaves_empty_household() {
    let store = Arc::new(MemoryStore::new());
    let household = Household::builder(store.clone(), camila())
        .seeder(Arc::new(FailingSeeder))
        .clock(clock())
        .build();

    household.load().await.unwrap();

    assert!(!household.state().loading());
    assert!(household.state().bills().is_empty());
}

#[tokio::test]
async fn test_refresh_without_user() {
    let store = Arc::new(MemoryStore::new());
    let household = Household::builder(store.clone(), Arc::new(StaticIdentity::anonymous()))
        .clock(clock())
        .build();

    household.load().await.unwrap();

    let state = household.state().snapshot();
    assert!(!state.loading);
    assert!(state.user.is_none());
    assert!(state.tasks.is_empty());
    assert!(store.rows("bills").is_empty());
    assert!(matches!(
        household.complete_task("t1").await,
        Err(Error::NotAuthenticated)
    ));
}

#[tokio::test]
async fn test_missing_payments_are_opened() {
    let store = Arc::new(MemoryStore::new());
    let bills = TableStore::insert(
        store.as_ref(),
        "bills",
        vec![
            json!({"name": "Luz", "due_day": 28, "category": "Servicios",
                   "auto_create_task_days": 3, "created_by": "u2"}),
            json!({"name": "Agua", "due_day": 27, "category": "Servicios",
                   "auto_create_task_days": 3, "created_by": "u2"}),
        ],
    )
    .await
    .unwrap();
    // Last month's payment does not count for this month
    TableStore::insert(
        store.as_ref(),
        "bill_payments",
        vec![
            json!({"bill_id": bills[0]["id"], "month": 2, "year": 2024, "paid": true}),
            json!({"bill_id": bills[1]["id"], "month": 3, "year": 2024, "paid": false}),
        ],
    )
    .await
    .unwrap();

    let household = Household::builder(store.clone(), camila())
        .clock(clock())
        .build();
    household.refresh().await.unwrap();

    let payments = household.state().payments();
    assert_eq!(payments.len(), 2);
    assert!(payments.iter().all(|p| p.month == 3 && p.year == 2024));
    assert_eq!(store.rows("bill_payments").len(), 3);
    let bills = household.state().bills();
    assert_eq!(bills[0].name, "Agua");

    household.refresh().await.unwrap();
    assert_eq!(store.rows("bill_payments").len(), 3);
}

#[tokio::test]
async fn test_counts_and_user_map() {
    let store = Arc::new(MemoryStore::new());
    TableStore::insert(
        store.as_ref(),
        "tasks",
        vec![
            // Sunday 10 March is the start of this week
            json!({"title": "Lavar auto", "assigned_to": "both", "priority": "media",
                   "status": "completed", "created_by": "u1", "completed_by": "u2",
                   "completed_at": "2024-03-11T08:00:00Z"}),
            json!({"title": "Ordenar bodega", "assigned_to": "both", "priority": "baja",
                   "status": "completed", "created_by": "u2", "completed_by": "u1",
                   "completed_at": "2024-03-09T20:00:00Z"}),
            json!({"title": "Pintar reja", "assigned_to": "u1", "priority": "alta",
                   "status": "pending", "created_by": "u1"}),
        ],
    )
    .await
    .unwrap();
    TableStore::insert(
        store.as_ref(),
        "grocery_items",
        vec![
            json!({"name": "Pan", "category": "despensa", "status": "needed", "created_by": "u1"}),
            json!({"name": "Leche", "category": "lacteos", "status": "in_cart",
                   "created_by": "u1"}),
        ],
    )
    .await
    .unwrap();

    let household = Household::builder(store.clone(), camila())
        .clock(clock())
        .build();
    household.refresh().await.unwrap();

    let state = household.state().snapshot();
    assert_eq!(state.completed_this_week, 1);
    assert_eq!(state.completed_tasks[0].title, "Lavar auto");
    assert_eq!(state.grocery_needed(), 1);
    assert_eq!(state.grocery_items[0].name, "Pan");
    assert_eq!(state.display_name("u1"), "Camila");
    assert_eq!(state.display_name("u2"), "Otro");
    assert_eq!(state.users()[0].id, "u1");

    // needed and in-cart items both count toward the supermarket task
    let grocery = store
        .rows("tasks")
        .into_iter()
        .find(|t| t["source_kind"] == "grocery")
        .unwrap();
    assert_eq!(grocery["title"], "🛒 Ir al supermercado (2 items)");
    assert!(state.tasks.iter().any(|t| t.title == "Pintar reja"));
}

/// Holds the first read of `routines` until released
struct StallingStore {
    inner: MemoryStore,
    stall: AtomicBool,
}

#[async_trait]
impl TableStore for StallingStore {
    async fn select(&self, table: &'static str, query: &Query) -> Result<Vec<Value>> {
        let rows = self.inner.select(table, query).await?;
        if table == "routines" && self.stall.swap(false, Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_secs(5)).await;
        }
        Ok(rows)
    }

    async fn insert(&self, table: &'static str, rows: Vec<Value>) -> Result<Vec<Value>> {
        self.inner.insert(table, rows).await
    }

    async fn update(&self, table: &'static str, filters: &[Filter], patch: Value) -> Result<()> {
        self.inner.update(table, filters, patch).await
    }

    async fn delete(&self, table: &'static str, filters: &[Filter]) -> Result<()> {
        self.inner.delete(table, filters).await
    }

    async fn count(&self, table: &'static str, filters: &[Filter]) -> Result<usize> {
        self.inner.count(table, filters).await
    }
}

#[tokio::test(start_paused = true)]
async fn test_stale_fetch_is_discarded() {
    let store = Arc::new(StallingStore {
        inner: MemoryStore::new(),
        stall: AtomicBool::new(true),
    });
    let household = Arc::new(
        Household::builder(store.clone(), camila())
            .clock(clock())
            .build(),
    );

    let slow = tokio::spawn({
        let household = household.clone();
        async move { household.refresh().await }
    });
    tokio::time::sleep(Duration::from_millis(100)).await;

    store
        .insert(
            "routines",
            vec![json!({"name": "Regar plantas", "frequency_days": 2,
                        "category": "Hogar", "created_by": "u1"})],
        )
        .await
        .unwrap();
    household.refresh().await.unwrap();
    assert_eq!(household.state().routines().len(), 1);

    slow.await.unwrap().unwrap();
    assert_eq!(household.state().routines().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_scheduler_refreshes_household() {
    let store = Arc::new(MemoryStore::new());
    let household = Arc::new(
        Household::builder(store.clone(), camila())
            .clock(clock())
            .build(),
    );
    household.refresh().await.unwrap();

    let mut handle = PollingScheduler::new(Duration::from_secs(60)).start(household.clone());
    TableStore::insert(
        store.as_ref(),
        "categories",
        vec![json!({"name": "Hogar", "emoji": "🏠", "color": "#F59E0B", "user_id": null})],
    )
    .await
    .unwrap();

    handle.notify_visible();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(household.state().categories().len(), 1);

    handle.stop();
    assert!(!handle.is_running());
}

#[tokio::test]
async fn test_collection_refreshes_pick_up_remote_edits() {
    let store = Arc::new(MemoryStore::new());
    let household = Household::builder(store.clone(), camila())
        .clock(clock())
        .build();
    household.refresh().await.unwrap();

    let items = TableStore::insert(
        store.as_ref(),
        "grocery_items",
        vec![json!({"name": "Pan", "category": "despensa", "status": "stocked",
                    "created_by": "u2"})],
    )
    .await
    .unwrap();
    household.refresh_grocery().await.unwrap();
    assert_eq!(household.state().grocery_items()[0].status, GroceryStatus::Stocked);

    TableStore::update(
        store.as_ref(),
        "grocery_items",
        &[Filter::Eq("id".to_string(), items[0]["id"].clone())],
        json!({"status": "low"}),
    )
    .await
    .unwrap();
    household.refresh_grocery().await.unwrap();
    assert_eq!(household.state().grocery_items()[0].status, GroceryStatus::Low);

    TableStore::insert(
        store.as_ref(),
        "routines",
        vec![json!({"name": "Regar plantas", "frequency_days": 2,
                    "category": "Hogar", "created_by": "u2"})],
    )
    .await
    .unwrap();
    household.refresh_routines().await.unwrap();
    assert_eq!(household.state().routines()[0].name, "Regar plantas");
    // a collection refresh does not run the auto-task rules
    assert!(store.rows("tasks").is_empty());
}

#[tokio::test]
async fn test_refresh_bills_reads_current_month_only() {
    let store = Arc::new(MemoryStore::new());
    let household = Household::builder(store.clone(), camila())
        .clock(clock())
        .build();
    household.refresh().await.unwrap();

    let bills = TableStore::insert(
        store.as_ref(),
        "bills",
        vec![json!({"name": "Gas", "due_day": 20, "category": "Servicios",
                    "auto_create_task_days": 3, "created_by": "u2"})],
    )
    .await
    .unwrap();
    TableStore::insert(
        store.as_ref(),
        "bill_payments",
        vec![
            json!({"bill_id": bills[0]["id"], "month": 2, "year": 2024, "paid": true}),
            json!({"bill_id": bills[0]["id"], "month": 3, "year": 2023, "paid": true}),
            json!({"bill_id": bills[0]["id"], "month": 3, "year": 2024, "paid": false}),
        ],
    )
    .await
    .unwrap();

    household.refresh_bills().await.unwrap();

    assert_eq!(household.state().bills()[0].name, "Gas");
    let payments = household.state().payments();
    assert_eq!(payments.len(), 1);
    assert_eq!((payments[0].month, payments[0].year), (3, 2024));
    assert!(!payments[0].paid);
}
