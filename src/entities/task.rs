use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::ops::Deref;

use crate::entity::{new_id, Entity};
use crate::error::Result;
use crate::repository::Repository;
use crate::validation::{FieldSchema, Schema};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskCategory {
    Feeding,
    Walk,
    Grooming,
    Medication,
    Vet,
    Training,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Recurrence {
    Daily,
    Weekly,
    Monthly,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub pet_id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub category: TaskCategory,
    pub priority: TaskPriority,
    pub due_date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recurrence: Option<Recurrence>,
    #[serde(default)]
    pub completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn new(
        pet_id: impl Into<String>,
        title: impl Into<String>,
        category: TaskCategory,
        due_date: DateTime<Utc>,
    ) -> Self {
        Self {
            id: new_id(),
            pet_id: pet_id.into(),
            title: title.into(),
            description: None,
            category,
            priority: TaskPriority::Medium,
            due_date,
            recurrence: None,
            completed: false,
            completed_at: None,
        }
    }
}

impl Entity for Task {
    const COLLECTION: &'static str = "tasks";
    const ENTITY_TYPE: &'static str = "task";

    fn id(&self) -> &str {
        &self.id
    }
}

pub(crate) fn schema() -> Schema {
    Schema::new()
        .field(FieldSchema::string("id").required().uuid())
        .field(FieldSchema::string("petId").required().uuid())
        .field(FieldSchema::string("title").required().not_blank().max_length(100))
        .field(FieldSchema::string("description").max_length(1000))
        .field(FieldSchema::string("category").required().one_of(&[
            "feeding", "walk", "grooming", "medication", "vet", "training", "other",
        ]))
        .field(FieldSchema::string("priority").required().one_of(&["low", "medium", "high"]))
        .field(FieldSchema::string("dueDate").required().date_time())
        .field(FieldSchema::string("recurrence").one_of(&["daily", "weekly", "monthly"]))
        .field(FieldSchema::boolean("completed"))
        .field(FieldSchema::string("completedAt").date_time())
}

pub struct TaskRepository {
    inner: Repository<Task>,
}

impl TaskRepository {
    pub fn new(inner: Repository<Task>) -> Self {
        Self { inner }
    }

    pub async fn by_pet_id(&self, pet_id: &str) -> Result<Vec<Task>> {
        self.inner.find(|t| t.pet_id == pet_id).await
    }

    /// Tasks due within `[start, end]`, earliest first.
    pub async fn by_date_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Task>> {
        let mut tasks = self
            .inner
            .find(|t| t.due_date >= start && t.due_date <= end)
            .await?;
        tasks.sort_by_key(|t| t.due_date);
        Ok(tasks)
    }

    pub async fn pending(&self) -> Result<Vec<Task>> {
        self.inner.find(|t| !t.completed).await
    }

    /// Incomplete tasks whose due date is before `now`.
    pub async fn overdue(&self, now: DateTime<Utc>) -> Result<Vec<Task>> {
        self.inner
            .find(|t| !t.completed && t.due_date < now)
            .await
    }

    /// Mark a task done. Returns `None` if it does not exist.
    pub async fn complete(&self, id: &str, at: DateTime<Utc>) -> Result<Option<Task>> {
        self.inner
            .update(id, json!({"completed": true, "completedAt": at}))
            .await
    }
}

impl Deref for TaskRepository {
    type Target = Repository<Task>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::test_repository;
    use chrono::{Duration, TimeZone};

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, day, hour, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_task_queries() {
        let tasks = TaskRepository::new(test_repository());
        let pet = new_id();
        let other_pet = new_id();

        let walk = tasks
            .create(Task::new(&pet, "Morning walk", TaskCategory::Walk, at(2, 8)))
            .await
            .unwrap();
        let groom = tasks
            .create(Task::new(&pet, "Brush coat", TaskCategory::Grooming, at(1, 18)))
            .await
            .unwrap();
        tasks
            .create(Task::new(&other_pet, "Vet", TaskCategory::Vet, at(10, 9)))
            .await
            .unwrap();

        assert_eq!(tasks.by_pet_id(&pet).await.unwrap().len(), 2);

        let in_range = tasks.by_date_range(at(1, 0), at(3, 0)).await.unwrap();
        assert_eq!(in_range, vec![groom.clone(), walk.clone()]);

        let overdue = tasks.overdue(at(2, 12)).await.unwrap();
        assert_eq!(overdue.len(), 2);

        let done = tasks.complete(&groom.id, at(1, 19)).await.unwrap().unwrap();
        assert!(done.completed);
        assert_eq!(done.completed_at, Some(at(1, 19)));
        assert_eq!(done.title, "Brush coat");

        assert_eq!(tasks.pending().await.unwrap().len(), 2);
        assert_eq!(tasks.overdue(at(2, 12)).await.unwrap(), vec![walk]);
        assert!(tasks.complete("missing", at(1, 1)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_task_requires_pet() {
        let tasks = TaskRepository::new(test_repository());
        let task = Task::new("", "Walk", TaskCategory::Walk, Utc::now() + Duration::hours(1));

        let err = tasks.create(task).await.unwrap_err();
        assert!(err.validation_errors().unwrap().has_path("petId"));
    }
}
