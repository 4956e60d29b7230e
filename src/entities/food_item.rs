use serde::{Deserialize, Serialize};
use std::ops::Deref;

use crate::entity::{new_id, Entity};
use crate::error::Result;
use crate::repository::Repository;
use crate::validation::{FieldSchema, Schema};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FoodCategory {
    Dry,
    Wet,
    Raw,
    Treat,
    Supplement,
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FoodItem {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    pub category: FoodCategory,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calories_per_unit: Option<f64>,
    pub unit: String,
}

impl FoodItem {
    pub fn new(name: impl Into<String>, category: FoodCategory, unit: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            name: name.into(),
            brand: None,
            category,
            calories_per_unit: None,
            unit: unit.into(),
        }
    }
}

impl Entity for FoodItem {
    const COLLECTION: &'static str = "food_items";
    const ENTITY_TYPE: &'static str = "food_item";

    fn id(&self) -> &str {
        &self.id
    }
}

pub(crate) fn schema() -> Schema {
    Schema::new()
        .field(FieldSchema::string("id").required().uuid())
        .field(FieldSchema::string("name").required().not_blank().max_length(100))
        .field(FieldSchema::string("brand").max_length(100))
        .field(FieldSchema::string("category").required().one_of(&[
            "dry", "wet", "raw", "treat", "supplement", "other",
        ]))
        .field(FieldSchema::number("caloriesPerUnit").min(0.0))
        .field(FieldSchema::string("unit").required().not_blank().max_length(20))
}

pub struct FoodItemRepository {
    inner: Repository<FoodItem>,
}

impl FoodItemRepository {
    pub fn new(inner: Repository<FoodItem>) -> Self {
        Self { inner }
    }

    pub async fn by_category(&self, category: FoodCategory) -> Result<Vec<FoodItem>> {
        self.inner.find(|f| f.category == category).await
    }

    pub async fn by_brand(&self, brand: &str) -> Result<Vec<FoodItem>> {
        self.inner
            .find(|f| f.brand.as_deref().is_some_and(|b| b.eq_ignore_ascii_case(brand)))
            .await
    }

    /// Case-insensitive substring match on name or brand.
    pub async fn search(&self, query: &str) -> Result<Vec<FoodItem>> {
        let needle = query.trim().to_lowercase();
        self.inner
            .find(|f| {
                f.name.to_lowercase().contains(&needle)
                    || f
                        .brand
                        .as_deref()
                        .is_some_and(|b| b.to_lowercase().contains(&needle))
            })
            .await
    }
}

impl Deref for FoodItemRepository {
    type Target = Repository<FoodItem>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}
