use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::ops::Deref;

use crate::entity::{new_id, Entity};
use crate::error::Result;
use crate::repository::Repository;
use crate::validation::{FieldSchema, Schema};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dosage {
    pub amount: f64,
    /// e.g. `mg`, `ml`, `tablet`.
    pub unit: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrequencyPeriod {
    Day,
    Week,
    Month,
}

/// `times` doses per `period`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frequency {
    pub times: u32,
    pub period: FrequencyPeriod,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Medication {
    pub id: String,
    pub pet_id: String,
    pub name: String,
    pub dosage: Dosage,
    pub frequency: Frequency,
    pub start_date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prescribed_by: Option<String>,
}

impl Medication {
    pub fn new(
        pet_id: impl Into<String>,
        name: impl Into<String>,
        dosage: Dosage,
        frequency: Frequency,
        start_date: NaiveDate,
    ) -> Self {
        Self {
            id: new_id(),
            pet_id: pet_id.into(),
            name: name.into(),
            dosage,
            frequency,
            start_date,
            end_date: None,
            active: true,
            instructions: None,
            prescribed_by: None,
        }
    }
}

impl Entity for Medication {
    const COLLECTION: &'static str = "medications";
    const ENTITY_TYPE: &'static str = "medication";

    fn id(&self) -> &str {
        &self.id
    }
}

pub(crate) fn schema() -> Schema {
    Schema::new()
        .field(FieldSchema::string("id").required().uuid())
        .field(FieldSchema::string("petId").required().uuid())
        .field(FieldSchema::string("name").required().not_blank().max_length(100))
        .field(
            FieldSchema::object(
                "dosage",
                Schema::new()
                    .field(FieldSchema::number("amount").required().min(0.0))
                    .field(FieldSchema::string("unit").required().not_blank()),
            )
            .required(),
        )
        .field(
            FieldSchema::object(
                "frequency",
                Schema::new()
                    .field(FieldSchema::integer("times").required().min(1.0).max(24.0))
                    .field(
                        FieldSchema::string("period")
                            .required()
                            .one_of(&["day", "week", "month"]),
                    ),
            )
            .required(),
        )
        .field(FieldSchema::string("startDate").required().date())
        .field(FieldSchema::string("endDate").date())
        .field(FieldSchema::boolean("active"))
        .field(FieldSchema::string("instructions").max_length(500))
}

pub struct MedicationRepository {
    inner: Repository<Medication>,
}

impl MedicationRepository {
    pub fn new(inner: Repository<Medication>) -> Self {
        Self { inner }
    }

    pub async fn by_pet_id(&self, pet_id: &str) -> Result<Vec<Medication>> {
        self.inner.find(|m| m.pet_id == pet_id).await
    }

    pub async fn active(&self) -> Result<Vec<Medication>> {
        self.inner.find(|m| m.active).await
    }

    pub async fn active_for_pet(&self, pet_id: &str) -> Result<Vec<Medication>> {
        self.inner.find(|m| m.active && m.pet_id == pet_id).await
    }

    /// Active medications whose course ends between `today` and `today + days`.
    pub async fn ending_within(&self, today: NaiveDate, days: u64) -> Result<Vec<Medication>> {
        let until = today.checked_add_days(Days::new(days)).unwrap_or(NaiveDate::MAX);
        self.inner
            .find(|m| m.active && m.end_date.is_some_and(|d| d >= today && d <= until))
            .await
    }

    pub async fn deactivate(&self, id: &str) -> Result<Option<Medication>> {
        self.inner.update(id, json!({"active": false})).await
    }
}

impl Deref for MedicationRepository {
    type Target = Repository<Medication>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::test_repository;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
    }

    fn daily(amount: f64) -> (Dosage, Frequency) {
        (
            Dosage {
                amount,
                unit: "mg".to_string(),
            },
            Frequency {
                times: 2,
                period: FrequencyPeriod::Day,
            },
        )
    }

    #[tokio::test]
    async fn test_medication_queries() {
        let meds = MedicationRepository::new(test_repository());
        let pet = new_id();

        let (dosage, frequency) = daily(5.0);
        let mut antibiotic = Medication::new(&pet, "Amoxicillin", dosage, frequency, day(1));
        antibiotic.end_date = Some(day(10));
        let antibiotic = meds.create(antibiotic).await.unwrap();

        let (dosage, frequency) = daily(1.0);
        let joint = meds
            .create(Medication::new(&pet, "Glucosamine", dosage, frequency, day(1)))
            .await
            .unwrap();

        let (dosage, frequency) = daily(2.0);
        meds.create(Medication::new(new_id(), "Other", dosage, frequency, day(1)))
            .await
            .unwrap();

        assert_eq!(meds.by_pet_id(&pet).await.unwrap().len(), 2);
        assert_eq!(meds.active().await.unwrap().len(), 3);
        assert_eq!(
            meds.ending_within(day(5), 7).await.unwrap(),
            vec![antibiotic.clone()]
        );

        let stopped = meds.deactivate(&antibiotic.id).await.unwrap().unwrap();
        assert!(!stopped.active);
        assert_eq!(stopped.dosage.amount, 5.0);
        assert_eq!(meds.active_for_pet(&pet).await.unwrap(), vec![joint]);
        assert!(meds.ending_within(day(5), 7).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_nested_dosage_validation() {
        let meds = MedicationRepository::new(test_repository());
        let (dosage, mut frequency) = daily(-1.0);
        frequency.times = 0;

        let err = meds
            .create(Medication::new(new_id(), "Bad", dosage, frequency, day(1)))
            .await
            .unwrap_err();
        let errors = err.validation_errors().unwrap();
        assert!(errors.has_path("dosage.amount"));
        assert!(errors.has_path("frequency.times"));
    }

    #[test]
    fn test_active_defaults_to_true() {
        let raw = json!({
            "id": new_id(),
            "petId": new_id(),
            "name": "Legacy",
            "dosage": {"amount": 1, "unit": "tablet"},
            "frequency": {"times": 1, "period": "day"},
            "startDate": "2024-06-01"
        });
        let med: Medication = serde_json::from_value(raw).unwrap();
        assert!(med.active);
    }
}
