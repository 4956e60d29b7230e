//! Domain entities and their repositories.
//!
//! Each entity repository wraps a generic [`Repository`](crate::Repository)
//! and dereferences to it, adding domain queries. All queries are in-memory
//! filters over `get_all()`.

pub mod food_item;
pub mod health_record;
pub mod meal;
pub mod medication;
pub mod pet;
pub mod task;
pub mod user;

pub use food_item::{FoodCategory, FoodItem, FoodItemRepository};
pub use health_record::{HealthRecord, HealthRecordRepository, RecordType};
pub use meal::{Meal, MealRepository, MealType};
pub use medication::{Dosage, Frequency, FrequencyPeriod, Medication, MedicationRepository};
pub use pet::{Gender, Pet, PetRepository, Species};
pub use task::{Recurrence, Task, TaskCategory, TaskPriority, TaskRepository};
pub use user::{User, UserRepository};

use crate::entity::Entity;
use crate::validation::Schema;

/// Schemas of every built-in entity, keyed by entity-type tag.
pub fn default_schemas() -> Vec<(&'static str, Schema)> {
    vec![
        (Pet::ENTITY_TYPE, pet::schema()),
        (Task::ENTITY_TYPE, task::schema()),
        (HealthRecord::ENTITY_TYPE, health_record::schema()),
        (Medication::ENTITY_TYPE, medication::schema()),
        (User::ENTITY_TYPE, user::schema()),
        (Meal::ENTITY_TYPE, meal::schema()),
        (FoodItem::ENTITY_TYPE, food_item::schema()),
    ]
}

/// Collection keys of every built-in entity.
pub const COLLECTIONS: &[&str] = &[
    Pet::COLLECTION,
    Task::COLLECTION,
    HealthRecord::COLLECTION,
    Medication::COLLECTION,
    User::COLLECTION,
    Meal::COLLECTION,
    FoodItem::COLLECTION,
];

#[cfg(test)]
pub(crate) fn test_repository<E: Entity>() -> crate::Repository<E> {
    use std::sync::Arc;

    crate::Repository::new(
        Arc::new(crate::MemoryStore::new()),
        Arc::new(crate::SchemaRegistry::with_defaults()),
        Arc::new(crate::CollectionLocks::new()),
    )
}
