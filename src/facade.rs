//! Typed per-entity access over whichever [`Backend`] was selected at startup.

use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use uuid::Uuid;

use crate::backend::{Backend, BackendMode};
use crate::error::Result;
use crate::models::{
    BehaviorSummary, BehaviorSummaryPatch, ContactLog, DailyEvaluation, DailyEvaluationPatch,
    Dashboard, Entity, Filter, IncidentReport, NewBehaviorSummary, NewDailyEvaluation, NewSetting,
    Setting, SettingPatch, SortSpec, Student, StudentPatch,
};

pub struct EntityFacade<T: Entity> {
    backend: Arc<dyn Backend>,
    _entity: PhantomData<fn() -> T>,
}

impl<T: Entity> Clone for EntityFacade<T> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            _entity: PhantomData,
        }
    }
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T> {
    Ok(serde_json::from_value(value)?)
}

fn decode_all<T: DeserializeOwned>(values: Vec<Value>) -> Result<Vec<T>> {
    values.into_iter().map(decode).collect()
}

impl<T: Entity> EntityFacade<T> {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            _entity: PhantomData,
        }
    }

    pub async fn list(&self, sort: Option<&SortSpec>) -> Result<Vec<T>> {
        decode_all(self.backend.list(T::COLLECTION, sort).await?)
    }

    /// Records whose fields equal every entry of `filter`, in stored order.
    pub async fn filter(&self, filter: &Filter) -> Result<Vec<T>> {
        decode_all(self.backend.filter(T::COLLECTION, filter).await?)
    }

    pub async fn find(&self, id: Uuid) -> Result<Option<T>> {
        let filter = Filter::new().eq("id", id.to_string());
        Ok(self.filter(&filter).await?.into_iter().next())
    }

    pub async fn create(&self, draft: &T::Draft) -> Result<T> {
        T::validate_draft(draft)?;
        let record = serde_json::to_value(draft)?;
        let created: T = decode(self.backend.insert(T::COLLECTION, record).await?)?;
        tracing::debug!(collection = %T::COLLECTION, id = %created.id(), "Created record");
        Ok(created)
    }

    pub async fn update(&self, id: Uuid, patch: &T::Patch) -> Result<T> {
        T::validate_patch(patch)?;
        let patch = serde_json::to_value(patch)?;
        decode(self.backend.update(T::COLLECTION, id, patch).await?)
    }

    pub async fn delete(&self, id: Uuid) -> Result<()> {
        self.backend.delete(T::COLLECTION, id).await?;
        tracing::debug!(collection = %T::COLLECTION, %id, "Deleted record");
        Ok(())
    }
}

impl EntityFacade<Student> {
    pub async fn deactivate(&self, id: Uuid) -> Result<Student> {
        self.set_active(id, false).await
    }

    pub async fn reactivate(&self, id: Uuid) -> Result<Student> {
        self.set_active(id, true).await
    }

    async fn set_active(&self, id: Uuid, active: bool) -> Result<Student> {
        let patch = StudentPatch {
            active: Some(active),
            ..Default::default()
        };
        self.update(id, &patch).await
    }
}

impl EntityFacade<DailyEvaluation> {
    /// Saves the scores for one student, day and slot, replacing any earlier entry.
    pub async fn record(&self, draft: &NewDailyEvaluation) -> Result<DailyEvaluation> {
        let key = Filter::new()
            .eq("student_id", draft.student_id.to_string())
            .eq("date", draft.date.to_string())
            .eq("time_slot", draft.time_slot.clone());

        match self.filter(&key).await?.into_iter().next() {
            Some(existing) => {
                let patch = DailyEvaluationPatch {
                    scores: Some(draft.scores.clone()),
                    general_comments: Some(draft.general_comments.clone()),
                };
                self.update(existing.id, &patch).await
            }
            None => self.create(draft).await,
        }
    }
}

impl EntityFacade<BehaviorSummary> {
    /// Writes the summary for `(student, date_range_end)`, keeping at most one row per key.
    pub async fn upsert(&self, draft: &NewBehaviorSummary) -> Result<BehaviorSummary> {
        let key = Filter::new()
            .eq("student_id", draft.student_id.to_string())
            .eq("date_range_end", draft.date_range_end.to_string());

        match self.filter(&key).await?.into_iter().next() {
            Some(existing) => {
                let patch = BehaviorSummaryPatch {
                    date_range_start: Some(draft.date_range_start),
                    summary: Some(draft.summary.clone()),
                };
                self.update(existing.id, &patch).await
            }
            None => self.create(draft).await,
        }
    }
}

impl EntityFacade<Setting> {
    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        let rows = self.filter(&Filter::new().eq("key", key)).await?;
        Ok(rows.into_iter().next().map(|row| row.value))
    }

    pub async fn put(&self, key: &str, value: &str) -> Result<Setting> {
        match self.filter(&Filter::new().eq("key", key)).await?.into_iter().next() {
            Some(existing) => {
                let patch = SettingPatch {
                    value: Some(value.to_string()),
                };
                self.update(existing.id, &patch).await
            }
            None => {
                self.create(&NewSetting {
                    key: key.to_string(),
                    value: value.to_string(),
                })
                .await
            }
        }
    }
}

/// The selected backend plus one facade per collection. Built once at startup.
#[derive(Clone)]
pub struct Services {
    backend: Arc<dyn Backend>,
    pub students: EntityFacade<Student>,
    pub evaluations: EntityFacade<DailyEvaluation>,
    pub incidents: EntityFacade<IncidentReport>,
    pub contacts: EntityFacade<ContactLog>,
    pub summaries: EntityFacade<BehaviorSummary>,
    pub dashboards: EntityFacade<Dashboard>,
    pub settings: EntityFacade<Setting>,
}

impl Services {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            students: EntityFacade::new(Arc::clone(&backend)),
            evaluations: EntityFacade::new(Arc::clone(&backend)),
            incidents: EntityFacade::new(Arc::clone(&backend)),
            contacts: EntityFacade::new(Arc::clone(&backend)),
            summaries: EntityFacade::new(Arc::clone(&backend)),
            dashboards: EntityFacade::new(Arc::clone(&backend)),
            settings: EntityFacade::new(Arc::clone(&backend)),
            backend,
        }
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    pub fn mode(&self) -> BackendMode {
        self.backend.mode()
    }
}

#[cfg(test)]
pub(crate) fn local_services() -> Services {
    use crate::local::LocalBackend;
    use crate::store::MemoryKeyValueStore;

    Services::new(Arc::new(LocalBackend::new(MemoryKeyValueStore::new())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TrackError;
    use crate::models::{CategoryScore, NewStudent};
    use chrono::NaiveDate;
    use std::collections::BTreeMap;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
    }

    fn evaluation(student_id: Uuid, slot: &str, rating: u8) -> NewDailyEvaluation {
        let mut scores = BTreeMap::new();
        scores.insert(
            "peer_interaction".to_string(),
            CategoryScore {
                rating: Some(rating),
                notes: String::new(),
            },
        );
        NewDailyEvaluation {
            student_id,
            date: day(2),
            time_slot: slot.to_string(),
            scores,
            general_comments: String::new(),
        }
    }

    #[tokio::test]
    async fn create_returns_record_with_identity() {
        let services = local_services();
        let student = services
            .students
            .create(&NewStudent::new("Maya Chen"))
            .await
            .unwrap();
        assert_eq!(student.name, "Maya Chen");
        assert!(student.active);
        assert_eq!(student.dashboard_id, crate::models::DEFAULT_DASHBOARD_ID);
        assert_eq!(services.students.find(student.id).await.unwrap(), Some(student));
    }

    #[tokio::test]
    async fn filter_active_returns_only_active_students_in_order() {
        let services = local_services();
        for (name, active) in [
            ("Ana", true),
            ("Ben", false),
            ("Cam", true),
            ("Dee", false),
            ("Eli", true),
        ] {
            let mut draft = NewStudent::new(name);
            draft.active = active;
            services.students.create(&draft).await.unwrap();
        }

        let active = services
            .students
            .filter(&Filter::new().eq("active", true))
            .await
            .unwrap();
        let names: Vec<_> = active.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Ana", "Cam", "Eli"]);
    }

    #[tokio::test]
    async fn deactivate_keeps_the_record() {
        let services = local_services();
        let student = services.students.create(&NewStudent::new("Ana")).await.unwrap();

        let inactive = services.students.deactivate(student.id).await.unwrap();
        assert!(!inactive.active);
        assert_eq!(services.students.list(None).await.unwrap().len(), 1);

        let active = services.students.reactivate(student.id).await.unwrap();
        assert!(active.active);
    }

    #[tokio::test]
    async fn deleting_student_removes_its_evaluations() {
        let services = local_services();
        let student = services.students.create(&NewStudent::new("Ana")).await.unwrap();
        services
            .evaluations
            .create(&evaluation(student.id, "morning", 3))
            .await
            .unwrap();
        services
            .evaluations
            .create(&evaluation(student.id, "afternoon", 2))
            .await
            .unwrap();

        services.students.delete(student.id).await.unwrap();

        assert!(services.students.list(None).await.unwrap().is_empty());
        assert!(services.evaluations.list(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn duplicate_evaluation_slot_conflicts_but_record_upserts() {
        let services = local_services();
        let student = services.students.create(&NewStudent::new("Ana")).await.unwrap();
        services
            .evaluations
            .create(&evaluation(student.id, "morning", 3))
            .await
            .unwrap();

        let err = services
            .evaluations
            .create(&evaluation(student.id, "morning", 1))
            .await
            .unwrap_err();
        assert!(matches!(err, TrackError::Conflict(_)));

        let updated = services
            .evaluations
            .record(&evaluation(student.id, "morning", 1))
            .await
            .unwrap();
        assert_eq!(updated.ratings().collect::<Vec<_>>(), vec![1]);
        assert_eq!(services.evaluations.list(None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn invalid_rating_never_reaches_storage() {
        let services = local_services();
        let student = services.students.create(&NewStudent::new("Ana")).await.unwrap();
        let err = services
            .evaluations
            .create(&evaluation(student.id, "morning", 0))
            .await
            .unwrap_err();
        assert!(matches!(err, TrackError::Validation(_)));
        assert!(services.evaluations.list(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn summary_upsert_keeps_one_row_per_period_end() {
        let services = local_services();
        let student = services.students.create(&NewStudent::new("Ana")).await.unwrap();
        let draft = NewBehaviorSummary {
            student_id: student.id,
            date_range_start: day(1),
            date_range_end: day(7),
            summary: "Settling in".to_string(),
        };
        services.summaries.upsert(&draft).await.unwrap();

        let revised = NewBehaviorSummary {
            summary: "Steady week".to_string(),
            ..draft
        };
        let saved = services.summaries.upsert(&revised).await.unwrap();

        let all = services.summaries.list(None).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(saved.summary, "Steady week");
    }

    #[tokio::test]
    async fn settings_put_overwrites_existing_key() {
        let services = local_services();
        assert_eq!(services.settings.get("default_dashboard_name").await.unwrap(), None);
        services
            .settings
            .put("default_dashboard_name", "Main Campus")
            .await
            .unwrap();
        services
            .settings
            .put("default_dashboard_name", "Riverside")
            .await
            .unwrap();
        assert_eq!(
            services.settings.get("default_dashboard_name").await.unwrap(),
            Some("Riverside".to_string())
        );
        assert_eq!(services.settings.list(None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn updating_missing_record_is_not_found() {
        let services = local_services();
        let err = services
            .students
            .deactivate(Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, TrackError::NotFound { entity: "student", .. }));
    }
}
