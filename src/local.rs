use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::backend::{Backend, BackendMode, HealthProbe};
use crate::error::{Result, TrackError};
use crate::models::{Collection, DateRange, Filter, SortSpec};
use crate::store::{KeyValueStore, PersistedStore};

/// Backend over the persisted entity store, used when no hosted database is configured.
pub struct LocalBackend {
    store: PersistedStore<dyn KeyValueStore>,
    // Serializes read-modify-write cycles on the store.
    write_lock: Mutex<()>,
}

impl LocalBackend {
    pub fn new(kv: impl KeyValueStore + 'static) -> Self {
        let kv: Box<dyn KeyValueStore> = Box::new(kv);
        Self {
            store: PersistedStore::new(kv),
            write_lock: Mutex::new(()),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, ()>> {
        self.write_lock
            .lock()
            .map_err(|_| TrackError::Storage("local write lock poisoned".to_string()))
    }
}

fn record_id(record: &Value) -> Option<&str> {
    record.get("id").and_then(Value::as_str)
}

fn find_index(records: &[Value], id: Uuid) -> Option<usize> {
    let id = id.to_string();
    records
        .iter()
        .position(|record| record_id(record) == Some(id.as_str()))
}

fn into_object(collection: Collection, value: Value) -> Result<Map<String, Value>> {
    match value {
        Value::Object(map) => {
            collection.check_fields(map.keys())?;
            Ok(map)
        }
        other => Err(TrackError::Validation(format!(
            "{collection} records must be objects, got {other}"
        ))),
    }
}

fn fresh_id(records: &[Value]) -> Uuid {
    let taken: HashSet<&str> = records.iter().filter_map(record_id).collect();
    loop {
        let id = Uuid::new_v4();
        if !taken.contains(id.to_string().as_str()) {
            return id;
        }
    }
}

/// Fails when another record already holds the same unique key.
fn check_unique(
    collection: Collection,
    records: &[Value],
    candidate: &Value,
    skip: Option<usize>,
) -> Result<()> {
    let Some(key) = collection.unique_key() else {
        return Ok(());
    };

    let clash = records.iter().enumerate().any(|(idx, existing)| {
        Some(idx) != skip
            && key
                .iter()
                .all(|field| existing.get(*field) == candidate.get(*field))
    });

    if clash {
        return Err(TrackError::Conflict(format!(
            "{} already exists for ({})",
            collection.entity_name(),
            key.join(", ")
        )));
    }
    Ok(())
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let a = a.unwrap_or(&Value::Null);
    let b = b.unwrap_or(&Value::Null);
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(0.0);
            let y = y.as_f64().unwrap_or(0.0);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

#[async_trait]
impl HealthProbe for LocalBackend {
    async fn count_rows(&self, collection: Collection) -> Result<u64> {
        Ok(self.store.get_all(collection).len() as u64)
    }

    async fn date_range(&self, collection: Collection, column: &str) -> Result<Option<DateRange>> {
        collection.check_fields([&column.to_string()])?;
        let dates: Vec<NaiveDate> = self
            .store
            .get_all(collection)
            .iter()
            .filter_map(|record| record.get(column))
            .filter_map(|value| serde_json::from_value(value.clone()).ok())
            .collect();

        match (dates.iter().min(), dates.iter().max()) {
            (Some(min), Some(max)) => Ok(Some(DateRange {
                min: *min,
                max: *max,
            })),
            _ => Ok(None),
        }
    }
}

#[async_trait]
impl Backend for LocalBackend {
    fn mode(&self) -> BackendMode {
        BackendMode::Local
    }

    async fn list(&self, collection: Collection, sort: Option<&SortSpec>) -> Result<Vec<Value>> {
        let mut records = self.store.get_all(collection);
        if let Some(sort) = sort {
            collection.check_fields([&sort.column])?;
            records.sort_by(|a, b| {
                let ordering = compare_values(a.get(&sort.column), b.get(&sort.column));
                if sort.ascending {
                    ordering
                } else {
                    ordering.reverse()
                }
            });
        }
        Ok(records)
    }

    async fn filter(&self, collection: Collection, filter: &Filter) -> Result<Vec<Value>> {
        let filter = filter.normalized(collection)?;
        let mut records = self.store.get_all(collection);
        records.retain(|record| filter.matches(record));
        Ok(records)
    }

    async fn insert(&self, collection: Collection, record: Value) -> Result<Value> {
        let mut fields = into_object(collection, record)?;
        let _guard = self.lock()?;
        let mut records = self.store.load(collection)?;

        fields.insert("id".to_string(), Value::String(fresh_id(&records).to_string()));
        fields.insert("created_at".to_string(), serde_json::to_value(Utc::now())?);
        let record = Value::Object(fields);

        check_unique(collection, &records, &record, None)?;
        records.push(record.clone());
        self.store.save_all(collection, &records)?;
        Ok(record)
    }

    async fn update(&self, collection: Collection, id: Uuid, patch: Value) -> Result<Value> {
        let patch = into_object(collection, patch)?;
        if patch.contains_key("id") {
            return Err(TrackError::Validation("id cannot be changed".to_string()));
        }

        let _guard = self.lock()?;
        let mut records = self.store.load(collection)?;
        let idx = find_index(&records, id).ok_or(TrackError::NotFound {
            entity: collection.entity_name(),
            id,
        })?;

        let mut updated = records[idx].clone();
        if let Value::Object(fields) = &mut updated {
            for (key, value) in patch {
                fields.insert(key, value);
            }
        }

        check_unique(collection, &records, &updated, Some(idx))?;
        records[idx] = updated.clone();
        self.store.save_all(collection, &records)?;
        Ok(updated)
    }

    async fn delete(&self, collection: Collection, id: Uuid) -> Result<()> {
        let _guard = self.lock()?;
        let mut records = self.store.load(collection)?;
        let idx = find_index(&records, id).ok_or(TrackError::NotFound {
            entity: collection.entity_name(),
            id,
        })?;

        // Every dependent collection must read cleanly before anything is rewritten.
        let owner = Value::String(id.to_string());
        let mut pruned = Vec::new();
        for &dependent in collection.dependents() {
            let mut children = self.store.load(dependent)?;
            let before = children.len();
            children.retain(|child| child.get("student_id") != Some(&owner));
            if children.len() != before {
                pruned.push((dependent, before - children.len(), children));
            }
        }

        for (dependent, removed, children) in pruned {
            self.store.save_all(dependent, &children)?;
            tracing::debug!(collection = %dependent, removed, "Removed dependent records");
        }

        records.remove(idx);
        self.store.save_all(collection, &records)
    }

    async fn supports_dashboards(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{FileKeyValueStore, MemoryKeyValueStore};
    use serde_json::json;
    use std::sync::Arc;

    fn backend() -> LocalBackend {
        LocalBackend::new(MemoryKeyValueStore::new())
    }

    #[tokio::test]
    async fn insert_assigns_distinct_ids_and_timestamps() {
        let backend = backend();
        let a = backend
            .insert(Collection::Dashboards, json!({"name": "North"}))
            .await
            .unwrap();
        let b = backend
            .insert(Collection::Dashboards, json!({"name": "South"}))
            .await
            .unwrap();

        assert_ne!(a["id"], b["id"]);
        assert!(Uuid::parse_str(a["id"].as_str().unwrap()).is_ok());
        assert!(a["created_at"].is_string());
        assert_eq!(backend.count_rows(Collection::Dashboards).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn filter_keeps_matching_records_in_order() {
        let backend = backend();
        for (name, active) in [
            ("A", true),
            ("B", false),
            ("C", true),
            ("D", false),
            ("E", true),
        ] {
            backend
                .insert(Collection::Students, json!({"name": name, "active": active}))
                .await
                .unwrap();
        }

        let active = backend
            .filter(Collection::Students, &Filter::new().eq("active", true))
            .await
            .unwrap();
        let names: Vec<&str> = active.iter().map(|r| r["name"].as_str().unwrap()).collect();
        assert_eq!(names, vec!["A", "C", "E"]);
    }

    #[tokio::test]
    async fn filter_values_match_in_stored_form() {
        let backend = backend();
        let ana = backend
            .insert(Collection::Students, json!({"name": "Ana", "active": true, "grade": "3"}))
            .await
            .unwrap();
        backend
            .insert(Collection::Students, json!({"name": "Ben", "active": false, "grade": "4"}))
            .await
            .unwrap();

        let by_text = backend
            .filter(Collection::Students, &Filter::new().eq("active", "true"))
            .await
            .unwrap();
        assert_eq!(by_text, vec![ana.clone()]);

        let by_number = backend
            .filter(Collection::Students, &Filter::new().eq("grade", 3))
            .await
            .unwrap();
        assert_eq!(by_number, vec![ana.clone()]);

        let upper_id = ana["id"].as_str().unwrap().to_uppercase();
        let by_id = backend
            .filter(Collection::Students, &Filter::new().eq("id", upper_id))
            .await
            .unwrap();
        assert_eq!(by_id, vec![ana]);
    }

    #[tokio::test]
    async fn unknown_filter_field_is_rejected() {
        let backend = backend();
        let err = backend
            .filter(Collection::Students, &Filter::new().eq("shoe_size", 9))
            .await
            .unwrap_err();
        assert!(matches!(err, TrackError::UnknownField { .. }));
    }

    #[tokio::test]
    async fn list_sorts_descending_and_keeps_ties_stable() {
        let backend = backend();
        for (name, grade) in [("A", "3"), ("B", "5"), ("C", "3")] {
            backend
                .insert(Collection::Students, json!({"name": name, "grade": grade}))
                .await
                .unwrap();
        }
        let sorted = backend
            .list(Collection::Students, Some(&SortSpec::desc("grade")))
            .await
            .unwrap();
        let names: Vec<&str> = sorted.iter().map(|r| r["name"].as_str().unwrap()).collect();
        assert_eq!(names, vec!["B", "A", "C"]);
    }

    #[tokio::test]
    async fn unique_key_violation_is_a_conflict() {
        let backend = backend();
        let row = json!({"student_id": "s1", "date": "2026-03-02", "time_slot": "morning"});
        backend
            .insert(Collection::DailyEvaluations, row.clone())
            .await
            .unwrap();
        let err = backend
            .insert(Collection::DailyEvaluations, row)
            .await
            .unwrap_err();
        assert!(matches!(err, TrackError::Conflict(_)));
        assert_eq!(backend.count_rows(Collection::DailyEvaluations).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn update_merges_fields_and_reports_missing_ids() {
        let backend = backend();
        let created = backend
            .insert(Collection::Students, json!({"name": "Ana", "active": true}))
            .await
            .unwrap();
        let id = Uuid::parse_str(created["id"].as_str().unwrap()).unwrap();

        let updated = backend
            .update(Collection::Students, id, json!({"active": false}))
            .await
            .unwrap();
        assert_eq!(updated["name"], "Ana");
        assert_eq!(updated["active"], false);

        let err = backend
            .update(Collection::Students, Uuid::new_v4(), json!({"active": true}))
            .await
            .unwrap_err();
        assert!(matches!(err, TrackError::NotFound { .. }));
    }

    #[tokio::test]
    async fn deleting_a_student_removes_its_dependents() {
        let backend = backend();
        let student = backend
            .insert(Collection::Students, json!({"name": "Ana"}))
            .await
            .unwrap();
        let other = backend
            .insert(Collection::Students, json!({"name": "Ben"}))
            .await
            .unwrap();
        let id = Uuid::parse_str(student["id"].as_str().unwrap()).unwrap();

        for (owner, slot) in [(&student, "morning"), (&student, "afternoon"), (&other, "morning")] {
            backend
                .insert(
                    Collection::DailyEvaluations,
                    json!({"student_id": owner["id"], "date": "2026-03-02", "time_slot": slot}),
                )
                .await
                .unwrap();
        }

        backend.delete(Collection::Students, id).await.unwrap();

        assert_eq!(backend.count_rows(Collection::Students).await.unwrap(), 1);
        let remaining = backend.list(Collection::DailyEvaluations, None).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0]["student_id"], other["id"]);
    }

    #[tokio::test]
    async fn date_range_spans_min_and_max() {
        let backend = backend();
        assert_eq!(
            backend
                .date_range(Collection::ContactLogs, "contact_date")
                .await
                .unwrap(),
            None
        );
        for date in ["2026-02-10", "2026-01-05", "2026-03-01"] {
            backend
                .insert(Collection::ContactLogs, json!({"contact_date": date}))
                .await
                .unwrap();
        }
        let range = backend
            .date_range(Collection::ContactLogs, "contact_date")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(range.min, NaiveDate::from_ymd_opt(2026, 1, 5).unwrap());
        assert_eq!(range.max, NaiveDate::from_ymd_opt(2026, 3, 1).unwrap());
    }

    #[tokio::test]
    async fn unreadable_collection_file_is_never_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let backend = LocalBackend::new(FileKeyValueStore::open(dir.path()).unwrap());
        for name in ["Ana", "Ben", "Cam"] {
            backend
                .insert(Collection::Students, json!({"name": name}))
                .await
                .unwrap();
        }

        let path = dir
            .path()
            .join(format!("{}.json", Collection::Students.storage_key()));
        let mut bytes = std::fs::read(&path).unwrap();
        bytes[1] = 0xFF;
        std::fs::write(&path, &bytes).unwrap();

        assert!(backend.list(Collection::Students, None).await.unwrap().is_empty());
        let err = backend
            .insert(Collection::Students, json!({"name": "Dee"}))
            .await
            .unwrap_err();
        assert!(matches!(err, TrackError::Storage(_)));
        assert_eq!(std::fs::read(&path).unwrap(), bytes);
    }

    #[tokio::test]
    async fn corrupt_dependents_block_student_delete() {
        let kv = Arc::new(MemoryKeyValueStore::new());
        let backend = LocalBackend::new(kv.clone());
        let student = backend
            .insert(Collection::Students, json!({"name": "Ana"}))
            .await
            .unwrap();
        let id = Uuid::parse_str(student["id"].as_str().unwrap()).unwrap();
        kv.set(&Collection::ContactLogs.storage_key(), "[{\"id\": ")
            .unwrap();

        let err = backend.delete(Collection::Students, id).await.unwrap_err();
        assert!(matches!(err, TrackError::Serialization(_)));
        assert_eq!(backend.count_rows(Collection::Students).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn unavailable_storage_behaves_as_empty_but_rejects_writes() {
        let kv = Arc::new(MemoryKeyValueStore::new());
        let backend = LocalBackend::new(kv.clone());
        backend
            .insert(Collection::Students, json!({"name": "Ana"}))
            .await
            .unwrap();

        kv.set_unavailable(true);
        assert!(backend.list(Collection::Students, None).await.unwrap().is_empty());
        assert!(matches!(
            backend.insert(Collection::Students, json!({"name": "Ben"})).await,
            Err(TrackError::Storage(_))
        ));
    }
}
