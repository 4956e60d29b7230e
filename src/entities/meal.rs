use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::ops::Deref;

use crate::entity::{new_id, Entity};
use crate::error::Result;
use crate::repository::Repository;
use crate::validation::{FieldSchema, Schema};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MealType {
    Breakfast,
    Lunch,
    Dinner,
    Snack,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Meal {
    pub id: String,
    pub pet_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub food_item_id: Option<String>,
    pub meal_type: MealType,
    pub amount: f64,
    /// e.g. `g`, `cup`, `can`.
    pub unit: String,
    pub fed_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl Meal {
    pub fn new(
        pet_id: impl Into<String>,
        meal_type: MealType,
        amount: f64,
        unit: impl Into<String>,
        fed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: new_id(),
            pet_id: pet_id.into(),
            food_item_id: None,
            meal_type,
            amount,
            unit: unit.into(),
            fed_at,
            notes: None,
        }
    }
}

impl Entity for Meal {
    const COLLECTION: &'static str = "meals";
    const ENTITY_TYPE: &'static str = "meal";

    fn id(&self) -> &str {
        &self.id
    }
}

pub(crate) fn schema() -> Schema {
    Schema::new()
        .field(FieldSchema::string("id").required().uuid())
        .field(FieldSchema::string("petId").required().uuid())
        .field(FieldSchema::string("foodItemId").uuid())
        .field(
            FieldSchema::string("mealType")
                .required()
                .one_of(&["breakfast", "lunch", "dinner", "snack"]),
        )
        .field(FieldSchema::number("amount").required().min(0.0))
        .field(FieldSchema::string("unit").required().not_blank().max_length(20))
        .field(FieldSchema::string("fedAt").required().date_time())
        .field(FieldSchema::string("notes").max_length(500))
}

pub struct MealRepository {
    inner: Repository<Meal>,
}

impl MealRepository {
    pub fn new(inner: Repository<Meal>) -> Self {
        Self { inner }
    }

    pub async fn by_pet_id(&self, pet_id: &str) -> Result<Vec<Meal>> {
        self.inner.find(|m| m.pet_id == pet_id).await
    }

    /// Meals fed within `[start, end]`, earliest first.
    pub async fn by_date_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Meal>> {
        let mut meals = self
            .inner
            .find(|m| m.fed_at >= start && m.fed_at <= end)
            .await?;
        meals.sort_by_key(|m| m.fed_at);
        Ok(meals)
    }

    /// A pet's meals on one UTC calendar day, earliest first.
    pub async fn on_day(&self, pet_id: &str, day: NaiveDate) -> Result<Vec<Meal>> {
        let mut meals = self
            .inner
            .find(|m| m.pet_id == pet_id && m.fed_at.date_naive() == day)
            .await?;
        meals.sort_by_key(|m| m.fed_at);
        Ok(meals)
    }

    pub async fn by_food_item(&self, food_item_id: &str) -> Result<Vec<Meal>> {
        self.inner
            .find(|m| m.food_item_id.as_deref() == Some(food_item_id))
            .await
    }
}

impl Deref for MealRepository {
    type Target = Repository<Meal>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}
