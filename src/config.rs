//! Configuration for the household sync engine

use chrono::{
    DateTime, Datelike, Duration as ChronoDuration, FixedOffset, NaiveDate, NaiveTime, Offset,
    TimeZone, Utc,
};
use std::sync::Mutex;
use std::time::Duration;
use url::Url;

use crate::error::{Error, Result};

/// Connection settings for the Supabase project backing the household
#[derive(Debug, Clone)]
pub struct HogarConfig {
    pub url: Url,
    pub anon_key: String,
}

impl HogarConfig {
    /// Creates a new configuration, validating the URL.
    pub fn new(url_str: &str, anon_key: String) -> Result<Self> {
        let url = Url::parse(url_str).map_err(|e| Error::config(format!("invalid url: {}", e)))?;
        if anon_key.is_empty() {
            return Err(Error::config("anon_key cannot be empty"));
        }
        Ok(Self { url, anon_key })
    }

    /// Attempts to create configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let url_str = std::env::var("SUPABASE_URL")
            .map_err(|_| Error::config("SUPABASE_URL environment variable not found"))?;
        let anon_key = std::env::var("SUPABASE_ANON_KEY")
            .map_err(|_| Error::config("SUPABASE_ANON_KEY environment variable not found"))?;
        Self::new(&url_str, anon_key)
    }
}

/// Which grocery statuses keep the supermarket task open
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroceryTaskPolicy {
    /// Only items marked `needed`
    NeededOnly,
    /// Items marked `needed` or already `in_cart`
    NeededOrInCart,
}

/// Tunables for synchronization and the auto-task rules
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Period of the background full refresh
    pub refresh_interval: Duration,

    /// Pause between seeding an empty household and fetching again
    pub seed_retry_delay: Duration,

    /// Currency stamped on tasks that do not name one
    pub default_currency: String,

    /// Lead time for bill tasks when a new bill does not set it
    pub default_auto_create_task_days: i32,

    /// How many days past the due day a bill task is still created
    pub bill_overdue_grace_days: i32,

    /// Offset of the household's wall clock; decides "today", the
    /// current month and the start of the week
    pub utc_offset: FixedOffset,

    /// Grocery statuses counted by the supermarket task
    pub grocery_policy: GroceryTaskPolicy,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(60),
            seed_retry_delay: Duration::from_millis(500),
            default_currency: "CLP".to_string(),
            default_auto_create_task_days: 3,
            bill_overdue_grace_days: 5,
            utc_offset: Utc.fix(),
            grocery_policy: GroceryTaskPolicy::NeededOrInCart,
        }
    }
}

impl SyncOptions {
    /// Set the background refresh period
    pub fn with_refresh_interval(mut self, value: Duration) -> Self {
        self.refresh_interval = value;
        self
    }

    /// Set the delay before refetching after seeding
    pub fn with_seed_retry_delay(mut self, value: Duration) -> Self {
        self.seed_retry_delay = value;
        self
    }

    /// Set the default currency
    pub fn with_default_currency(mut self, value: &str) -> Self {
        self.default_currency = value.to_string();
        self
    }

    /// Set the default bill task lead time
    pub fn with_default_auto_create_task_days(mut self, value: i32) -> Self {
        self.default_auto_create_task_days = value;
        self
    }

    /// Set how long after the due day bill tasks are still created
    pub fn with_bill_overdue_grace_days(mut self, value: i32) -> Self {
        self.bill_overdue_grace_days = value;
        self
    }

    /// Set the household's UTC offset
    pub fn with_utc_offset(mut self, value: FixedOffset) -> Self {
        self.utc_offset = value;
        self
    }

    /// Set the grocery task policy
    pub fn with_grocery_policy(mut self, value: GroceryTaskPolicy) -> Self {
        self.grocery_policy = value;
        self
    }

    /// Calendar date of `now` on the household's clock
    pub fn local_date(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.utc_offset).date_naive()
    }

    /// `(month, year)` of `now` on the household's clock
    pub fn month_year(&self, now: DateTime<Utc>) -> (u32, i32) {
        let today = self.local_date(now);
        (today.month(), today.year())
    }

    /// Sunday 00:00 of the current week, household time
    pub fn week_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let today = self.local_date(now);
        let sunday = today - ChronoDuration::days(today.weekday().num_days_from_sunday() as i64);
        let local_midnight = sunday.and_time(NaiveTime::MIN);
        let shift = ChronoDuration::seconds(self.utc_offset.local_minus_utc() as i64);
        Utc.from_utc_datetime(&(local_midnight - shift))
    }
}

/// Source of the current time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock pinned to an instant, movable by hand
#[derive(Debug)]
pub struct FixedClock {
    at: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self { at: Mutex::new(at) }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.at.lock().unwrap_or_else(|e| e.into_inner()) = at;
    }

    pub fn advance(&self, by: ChronoDuration) {
        let mut guard = self.at.lock().unwrap_or_else(|e| e.into_inner());
        *guard = *guard + by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.at.lock().unwrap_or_else(|e| e.into_inner())
    }
}
