//! Typed access to the household tables
//!
//! Each repository maps one table to its entity type. Every method is a
//! single store call; none of them knows about other tables.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::model::{Bill, BillPayment, Category, GroceryItem, Routine, Task};
use crate::store::{Filter, Query, TableStore};

/// A row type with its table
pub trait Entity: DeserializeOwned + Clone + Send + Sync + 'static {
    const TABLE: &'static str;

    fn id(&self) -> &str;
}

macro_rules! entity {
    ($ty:ty, $table:literal) => {
        impl Entity for $ty {
            const TABLE: &'static str = $table;

            fn id(&self) -> &str {
                &self.id
            }
        }
    };
}

entity!(Task, "tasks");
entity!(Category, "categories");
entity!(Bill, "bills");
entity!(BillPayment, "bill_payments");
entity!(Routine, "routines");
entity!(GroceryItem, "grocery_items");

fn id_filter(id: &str) -> Vec<Filter> {
    vec![Filter::Eq("id".to_string(), Value::String(id.to_string()))]
}

/// Store access for one entity type
pub struct Repository<E> {
    store: Arc<dyn TableStore>,
    _entity: PhantomData<fn() -> E>,
}

impl<E> Clone for Repository<E> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            _entity: PhantomData,
        }
    }
}

impl<E: Entity> Repository<E> {
    pub fn new(store: Arc<dyn TableStore>) -> Self {
        Self {
            store,
            _entity: PhantomData,
        }
    }

    /// Rows matching `query`, in its order
    pub async fn list(&self, query: &Query) -> Result<Vec<E>> {
        let rows = self.store.select(E::TABLE, query).await?;
        decode_rows("select", rows)
    }

    /// First row matching `query`; an empty result is not an error
    pub async fn first(&self, query: Query) -> Result<Option<E>> {
        let mut rows = self.list(&query.limit(1)).await?;
        Ok(if rows.is_empty() {
            None
        } else {
            Some(rows.swap_remove(0))
        })
    }

    /// Insert one row and return it as stored
    pub async fn insert<T: Serialize + Sync>(&self, fields: &T) -> Result<E> {
        let row = serde_json::to_value(fields)?;
        let stored = self.store.insert(E::TABLE, vec![row]).await?;
        decode_rows::<E>("insert", stored)?
            .into_iter()
            .next()
            .ok_or_else(|| Error::store("insert", E::TABLE, "no row returned"))
    }

    /// Insert several rows in one call
    pub async fn insert_many<T: Serialize + Sync>(&self, rows: &[T]) -> Result<Vec<E>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let rows = rows
            .iter()
            .map(serde_json::to_value)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let stored = self.store.insert(E::TABLE, rows).await?;
        decode_rows("insert", stored)
    }

    pub async fn update<T: Serialize + Sync>(&self, id: &str, patch: &T) -> Result<()> {
        self.update_where(&id_filter(id), patch).await
    }

    pub async fn update_where<T: Serialize + Sync>(
        &self,
        filters: &[Filter],
        patch: &T,
    ) -> Result<()> {
        let patch = serde_json::to_value(patch)?;
        self.store.update(E::TABLE, filters, patch).await
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        self.store.delete(E::TABLE, &id_filter(id)).await
    }

    pub async fn delete_where(&self, filters: &[Filter]) -> Result<()> {
        self.store.delete(E::TABLE, filters).await
    }

    pub async fn count(&self, filters: &[Filter]) -> Result<usize> {
        self.store.count(E::TABLE, filters).await
    }
}

fn decode_rows<E: Entity>(operation: &'static str, rows: Vec<Value>) -> Result<Vec<E>> {
    rows.into_iter()
        .map(|row| {
            serde_json::from_value(row)
                .map_err(|e| Error::store(operation, E::TABLE, format!("bad row: {}", e)))
        })
        .collect()
}

/// One repository per household table
#[derive(Clone)]
pub struct Repositories {
    pub tasks: Repository<Task>,
    pub categories: Repository<Category>,
    pub bills: Repository<Bill>,
    pub payments: Repository<BillPayment>,
    pub routines: Repository<Routine>,
    pub groceries: Repository<GroceryItem>,
}

impl Repositories {
    pub fn new(store: Arc<dyn TableStore>) -> Self {
        Self {
            tasks: Repository::new(Arc::clone(&store)),
            categories: Repository::new(Arc::clone(&store)),
            bills: Repository::new(Arc::clone(&store)),
            payments: Repository::new(Arc::clone(&store)),
            routines: Repository::new(Arc::clone(&store)),
            groceries: Repository::new(store),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{GroceryStatus, NewGroceryItem};
    use crate::store::MemoryStore;
    use serde_json::json;

    fn repos() -> (Arc<MemoryStore>, Repositories) {
        let store = Arc::new(MemoryStore::new());
        let repos = Repositories::new(store.clone());
        (store, repos)
    }

    #[tokio::test]
    async fn test_insert_returns_stored_entity() {
        let (_, repos) = repos();
        let item = repos
            .groceries
            .insert(&NewGroceryItem {
                name: "Leche".to_string(),
                category: "lacteos".to_string(),
                status: GroceryStatus::Needed,
                quantity: None,
                created_by: "u1".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(item.name, "Leche");
        assert!(!item.id.is_empty());
        assert!(item.created_at.is_some());
        assert_eq!(repos.groceries.count(&[]).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_first_tolerates_empty_result() {
        let (_, repos) = repos();
        let found = repos
            .tasks
            .first(Query::new().eq("status", "pending"))
            .await
            .unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_store_errors_propagate() {
        let (store, repos) = repos();
        store.fail_next("delete", "routines");

        let result = repos.routines.delete("r1").await;
        assert!(matches!(
            result,
            Err(Error::Store { operation: "delete", entity: "routines", .. })
        ));
    }

    #[tokio::test]
    async fn test_malformed_row_is_a_store_error() {
        let (store, repos) = repos();
        store
            .insert("bills", vec![json!({"name": "Internet"})])
            .await
            .unwrap();

        let result = repos.bills.list(&Query::new()).await;
        assert!(matches!(result, Err(Error::Store { operation: "select", .. })));
    }
}
