use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use std::ops::Deref;

use crate::entity::{new_id, Entity};
use crate::error::Result;
use crate::repository::Repository;
use crate::validation::{FieldSchema, Schema};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordType {
    Vaccination,
    Checkup,
    Illness,
    Injury,
    Surgery,
    Dental,
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthRecord {
    pub id: String,
    pub pet_id: String,
    #[serde(rename = "type")]
    pub record_type: RecordType,
    pub title: String,
    pub date: NaiveDate,
    /// Clinic or practice.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub veterinarian: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub follow_up_date: Option<NaiveDate>,
}

impl HealthRecord {
    pub fn new(
        pet_id: impl Into<String>,
        record_type: RecordType,
        title: impl Into<String>,
        date: NaiveDate,
    ) -> Self {
        Self {
            id: new_id(),
            pet_id: pet_id.into(),
            record_type,
            title: title.into(),
            date,
            provider: None,
            veterinarian: None,
            notes: None,
            follow_up_date: None,
        }
    }
}

impl Entity for HealthRecord {
    const COLLECTION: &'static str = "health_records";
    const ENTITY_TYPE: &'static str = "health_record";

    fn id(&self) -> &str {
        &self.id
    }
}

pub(crate) fn schema() -> Schema {
    Schema::new()
        .field(FieldSchema::string("id").required().uuid())
        .field(FieldSchema::string("petId").required().uuid())
        .field(FieldSchema::string("type").required().one_of(&[
            "vaccination", "checkup", "illness", "injury", "surgery", "dental", "other",
        ]))
        .field(FieldSchema::string("title").required().not_blank().max_length(100))
        .field(FieldSchema::string("date").required().date())
        .field(FieldSchema::string("provider").max_length(100))
        .field(FieldSchema::string("veterinarian").max_length(100))
        .field(FieldSchema::string("notes").max_length(2000))
        .field(FieldSchema::string("followUpDate").date())
}

pub struct HealthRecordRepository {
    inner: Repository<HealthRecord>,
}

impl HealthRecordRepository {
    pub fn new(inner: Repository<HealthRecord>) -> Self {
        Self { inner }
    }

    pub async fn by_pet_id(&self, pet_id: &str) -> Result<Vec<HealthRecord>> {
        self.inner.find(|r| r.pet_id == pet_id).await
    }

    pub async fn by_type(&self, record_type: RecordType) -> Result<Vec<HealthRecord>> {
        self.inner.find(|r| r.record_type == record_type).await
    }

    /// Records dated within `[start, end]`, most recent first.
    pub async fn by_date_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<HealthRecord>> {
        let mut records = self
            .inner
            .find(|r| r.date >= start && r.date <= end)
            .await?;
        records.sort_by(|a, b| b.date.cmp(&a.date));
        Ok(records)
    }

    /// Case-insensitive match on the provider or the veterinarian.
    pub async fn by_provider(&self, provider: &str) -> Result<Vec<HealthRecord>> {
        let needle = provider.trim().to_lowercase();
        self.inner
            .find(|r| {
                [r.provider.as_deref(), r.veterinarian.as_deref()]
                    .into_iter()
                    .flatten()
                    .any(|name| name.to_lowercase().contains(&needle))
            })
            .await
    }

    /// Follow-ups due between `today` and `today + days`, soonest first.
    pub async fn upcoming_follow_ups(
        &self,
        today: NaiveDate,
        days: u64,
    ) -> Result<Vec<HealthRecord>> {
        let until = today.checked_add_days(Days::new(days)).unwrap_or(NaiveDate::MAX);
        let mut records = self
            .inner
            .find(|r| r.follow_up_date.is_some_and(|d| d >= today && d <= until))
            .await?;
        records.sort_by_key(|r| r.follow_up_date);
        Ok(records)
    }
}

impl Deref for HealthRecordRepository {
    type Target = Repository<HealthRecord>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::test_repository;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    #[tokio::test]
    async fn test_health_record_queries() {
        let records = HealthRecordRepository::new(test_repository());
        let pet = new_id();

        let mut rabies = HealthRecord::new(&pet, RecordType::Vaccination, "Rabies", day(1));
        rabies.provider = Some("Happy Paws Clinic".to_string());
        rabies.follow_up_date = Some(day(20));
        let rabies = records.create(rabies).await.unwrap();

        let mut checkup = HealthRecord::new(&pet, RecordType::Checkup, "Annual", day(10));
        checkup.veterinarian = Some("Dr. Happy".to_string());
        checkup.follow_up_date = Some(day(12));
        let checkup = records.create(checkup).await.unwrap();

        let mut old = HealthRecord::new(new_id(), RecordType::Dental, "Cleaning", day(2));
        old.follow_up_date = Some(day(1));
        records.create(old).await.unwrap();

        assert_eq!(records.by_pet_id(&pet).await.unwrap().len(), 2);
        assert_eq!(
            records.by_type(RecordType::Vaccination).await.unwrap(),
            vec![rabies.clone()]
        );
        assert_eq!(
            records.by_date_range(day(1), day(10)).await.unwrap()[0],
            checkup
        );
        assert_eq!(records.by_provider("happy").await.unwrap().len(), 2);
        assert!(records.by_provider("elsewhere").await.unwrap().is_empty());

        let upcoming = records.upcoming_follow_ups(day(11), 30).await.unwrap();
        assert_eq!(upcoming, vec![checkup, rabies]);
        assert!(records.upcoming_follow_ups(day(13), 3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_timestamp_date_rejected_on_update() {
        let records = HealthRecordRepository::new(test_repository());
        let record = records
            .create(HealthRecord::new(new_id(), RecordType::Checkup, "Annual", day(1)))
            .await
            .unwrap();

        let err = records
            .update(&record.id, serde_json::json!({"date": "2024-02-01T10:00:00Z"}))
            .await
            .unwrap_err();
        assert!(err.validation_errors().unwrap().has_path("date"));
        assert_eq!(records.get_by_id(&record.id).await.unwrap(), Some(record));
    }

    #[test]
    fn test_record_type_field_name() {
        let record = HealthRecord::new(new_id(), RecordType::Surgery, "Spay", day(5));
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["type"], "surgery");
        assert_eq!(value["date"], "2024-03-05");
    }
}
