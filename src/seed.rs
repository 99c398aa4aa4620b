//! Starter data for an empty household

use async_trait::async_trait;
use log::info;

use crate::error::Result;
use crate::model::{
    Assignee, GroceryStatus, NewBill, NewCategory, NewGroceryItem, NewRoutine, NewTask, Priority,
    TaskStatus,
};
use crate::repository::Repositories;
use crate::store::{Filter, Query};

/// Fills an empty household with defaults
#[async_trait]
pub trait Seeder: Send + Sync {
    /// Returns whether anything was written
    async fn seed(&self, repos: &Repositories, user_id: &str) -> Result<bool>;
}

/// Spanish-language defaults: rent and internet bills, weekly to monthly
/// cleaning routines, a stocked pantry and two sample tasks
#[derive(Debug, Clone)]
pub struct DefaultSeeder {
    pub currency: String,
}

impl Default for DefaultSeeder {
    fn default() -> Self {
        Self {
            currency: "CLP".to_string(),
        }
    }
}

const BILLS: [(&str, f64, u32, &str); 2] = [
    ("Arriendo + Gastos Comunes + Cuentas", 710000.0, 5, "Arriendo"),
    ("Internet", 35000.0, 15, "Servicios"),
];

const ROUTINES: [(&str, i64, &str); 6] = [
    ("Limpiar baño", 7, "Limpieza"),
    ("Aspirar/Barrer", 7, "Limpieza"),
    ("Lavar sábanas", 14, "Limpieza"),
    ("Limpiar cocina profundo", 14, "Cocina"),
    ("Sacar basura", 3, "Limpieza"),
    ("Revisar filtro campana", 30, "Mantención"),
];

const GROCERIES: [(&str, &str); 13] = [
    ("Leche", "lacteos"),
    ("Huevos", "lacteos"),
    ("Pan", "despensa"),
    ("Arroz", "despensa"),
    ("Fideos", "despensa"),
    ("Aceite", "despensa"),
    ("Papel higiénico", "higiene"),
    ("Jabón", "higiene"),
    ("Detergente", "limpieza"),
    ("Frutas", "frutas"),
    ("Verduras", "verduras"),
    ("Pollo", "carnes"),
    ("Carne", "carnes"),
];

const CATEGORIES: [(&str, &str, &str); 2] = [
    ("Bebé", "👶", "#F472B6"),
    ("Mantención", "🔧", "#94A3B8"),
];

impl DefaultSeeder {
    async fn category_id(&self, repos: &Repositories, name: &str) -> Result<Option<String>> {
        Ok(repos
            .categories
            .first(Query::new().eq("name", name))
            .await?
            .map(|c| c.id))
    }
}

#[async_trait]
impl Seeder for DefaultSeeder {
    async fn seed(&self, repos: &Repositories, user_id: &str) -> Result<bool> {
        let all: Vec<Filter> = Vec::new();
        let (tasks, bills, routines) = tokio::try_join!(
            repos.tasks.count(&all),
            repos.bills.count(&all),
            repos.routines.count(&all),
        )?;
        if tasks > 0 || bills > 0 || routines > 0 {
            info!("Household already has data, not seeding");
            return Ok(false);
        }

        let bills: Vec<NewBill> = BILLS
            .iter()
            .map(|(name, amount, due_day, category)| NewBill {
                name: name.to_string(),
                amount: Some(*amount),
                due_day: *due_day,
                category: category.to_string(),
                auto_create_task_days: 3,
                created_by: user_id.to_string(),
            })
            .collect();
        repos.bills.insert_many(&bills).await?;

        let routines: Vec<NewRoutine> = ROUTINES
            .iter()
            .map(|(name, frequency_days, category)| NewRoutine {
                name: name.to_string(),
                frequency_days: *frequency_days,
                category: category.to_string(),
                assigned_to: None,
                created_by: user_id.to_string(),
            })
            .collect();
        repos.routines.insert_many(&routines).await?;

        let groceries: Vec<NewGroceryItem> = GROCERIES
            .iter()
            .map(|(name, category)| NewGroceryItem {
                name: name.to_string(),
                category: category.to_string(),
                status: GroceryStatus::Stocked,
                quantity: None,
                created_by: user_id.to_string(),
            })
            .collect();
        repos.groceries.insert_many(&groceries).await?;

        // Shared categories, only those not there yet
        let existing = repos.categories.list(&Query::new()).await?;
        let missing: Vec<NewCategory> = CATEGORIES
            .iter()
            .filter(|(name, _, _)| !existing.iter().any(|c| c.name == *name))
            .map(|(name, emoji, color)| NewCategory {
                name: name.to_string(),
                emoji: emoji.to_string(),
                color: color.to_string(),
                user_id: None,
            })
            .collect();
        repos.categories.insert_many(&missing).await?;

        let bebe = self.category_id(repos, "Bebé").await?;
        let mantencion = self.category_id(repos, "Mantención").await?;
        let sample = |title: &str,
                      category_id: Option<String>,
                      assigned_to: Assignee,
                      priority: Priority,
                      budget: Option<f64>| NewTask {
            title: title.to_string(),
            category_id,
            assigned_to,
            priority,
            due_date: None,
            status: TaskStatus::Pending,
            created_by: user_id.to_string(),
            budget,
            currency: self.currency.clone(),
            source_kind: None,
            source_id: None,
        };
        repos
            .tasks
            .insert_many(&[
                sample("Organizar closet bebé", bebe, Assignee::Both, Priority::Media, None),
                sample(
                    "Revisar goteras baño",
                    mantencion,
                    Assignee::User(user_id.to_string()),
                    Priority::Alta,
                    Some(50000.0),
                ),
            ])
            .await?;

        info!("Seeded household for {}", user_id);
        Ok(true)
    }
}
