use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::ops::Deref;

use crate::entity::{new_id, Entity};
use crate::error::Result;
use crate::repository::Repository;
use crate::validation::{FieldSchema, Schema};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Species {
    Dog,
    Cat,
    Bird,
    Rabbit,
    Fish,
    Reptile,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pet {
    pub id: String,
    pub name: String,
    pub species: Species,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub breed: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub birth_date: Option<NaiveDate>,
    /// Kilograms.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<Gender>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Pet {
    pub fn new(name: impl Into<String>, species: Species) -> Self {
        let now = Utc::now();
        Self {
            id: new_id(),
            name: name.into(),
            species,
            breed: None,
            birth_date: None,
            weight: None,
            gender: None,
            photo_url: None,
            owner_id: None,
            created_at: Some(now),
            updated_at: Some(now),
        }
    }
}

impl Entity for Pet {
    const COLLECTION: &'static str = "pets";
    const ENTITY_TYPE: &'static str = "pet";

    fn id(&self) -> &str {
        &self.id
    }
}

pub(crate) fn schema() -> Schema {
    Schema::new()
        .field(FieldSchema::string("id").required().uuid())
        .field(FieldSchema::string("name").required().not_blank().max_length(50))
        .field(FieldSchema::string("species").required().one_of(&[
            "dog", "cat", "bird", "rabbit", "fish", "reptile", "other",
        ]))
        .field(FieldSchema::string("breed").max_length(100))
        .field(FieldSchema::string("birthDate").date())
        .field(FieldSchema::number("weight").min(0.0).max(500.0))
        .field(FieldSchema::string("gender").one_of(&["male", "female", "unknown"]))
        .field(FieldSchema::string("ownerId").uuid())
        .field(FieldSchema::string("createdAt").date_time())
        .field(FieldSchema::string("updatedAt").date_time())
}

pub struct PetRepository {
    inner: Repository<Pet>,
}

impl PetRepository {
    pub fn new(inner: Repository<Pet>) -> Self {
        Self { inner }
    }

    pub async fn by_species(&self, species: Species) -> Result<Vec<Pet>> {
        self.inner.find(|p| p.species == species).await
    }

    pub async fn by_owner(&self, owner_id: &str) -> Result<Vec<Pet>> {
        self.inner
            .find(|p| p.owner_id.as_deref() == Some(owner_id))
            .await
    }

    /// Case-insensitive substring match on the name.
    pub async fn search_by_name(&self, query: &str) -> Result<Vec<Pet>> {
        let needle = query.trim().to_lowercase();
        self.inner
            .find(|p| p.name.to_lowercase().contains(&needle))
            .await
    }
}

impl Deref for PetRepository {
    type Target = Repository<Pet>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::test_repository;
    use serde_json::json;

    #[tokio::test]
    async fn test_pet_queries() {
        let pets = PetRepository::new(test_repository());
        let owner = new_id();

        let mut rex = Pet::new("Rex", Species::Dog);
        rex.owner_id = Some(owner.clone());
        pets.create(rex.clone()).await.unwrap();
        pets.create(Pet::new("Whiskers", Species::Cat)).await.unwrap();
        pets.create(Pet::new("Rexy", Species::Cat)).await.unwrap();

        assert_eq!(pets.by_species(Species::Cat).await.unwrap().len(), 2);
        assert_eq!(pets.by_owner(&owner).await.unwrap(), vec![rex]);
        assert_eq!(pets.search_by_name(" rex").await.unwrap().len(), 2);
        assert!(pets.search_by_name("tom").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_pet_schema_rejects_bad_values() {
        let pets = PetRepository::new(test_repository());
        let mut pet = Pet::new("Rex", Species::Dog);
        pet.weight = Some(-2.0);

        let err = pets.create(pet).await.unwrap_err();
        assert!(err.validation_errors().unwrap().has_path("weight"));

        let pet = pets.create(Pet::new("Rex", Species::Dog)).await.unwrap();
        let err = pets
            .update(&pet.id, json!({"species": "dragon"}))
            .await
            .unwrap_err();
        assert!(err.validation_errors().unwrap().has_path("species"));
    }

    #[test]
    fn test_pet_serializes_camel_case() {
        let mut pet = Pet::new("Rex", Species::Dog);
        pet.birth_date = NaiveDate::from_ymd_opt(2020, 4, 1);
        let value = serde_json::to_value(&pet).unwrap();
        assert_eq!(value["birthDate"], "2020-04-01");
        assert_eq!(value["species"], "dog");
        assert!(value.get("breed").is_none());
    }
}
