use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{Result, TrackError};

/// Id of the implicit dashboard every student belongs to unless assigned elsewhere.
/// Never stored as a row in `dashboards`.
pub const DEFAULT_DASHBOARD_ID: &str = "default";

pub const MIN_RATING: u8 = 1;
pub const MAX_RATING: u8 = 4;

/// Behavior categories scored on every evaluation.
pub const BEHAVIOR_CATEGORIES: [&str; 3] = [
    "adult_interaction",
    "peer_interaction",
    "classroom_expectations",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Students,
    DailyEvaluations,
    IncidentReports,
    ContactLogs,
    BehaviorSummaries,
    Dashboards,
    Settings,
}

/// A column the hosted schema exposes, with the Postgres type values are cast to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub sql_type: &'static str,
}

impl Column {
    /// `value` in the form stored records hold for this column. Mirrors the
    /// text cast the hosted backend applies to filter parameters, so both
    /// backends agree on what a filter matches.
    pub fn normalize(&self, value: &Value) -> Value {
        match (self.sql_type, value) {
            ("boolean", Value::String(raw)) => match raw.trim().to_ascii_lowercase().as_str() {
                "true" | "t" => Value::Bool(true),
                "false" | "f" => Value::Bool(false),
                _ => value.clone(),
            },
            ("text", Value::Bool(_) | Value::Number(_)) => Value::String(value.to_string()),
            ("uuid", Value::String(raw)) => Uuid::parse_str(raw.trim())
                .map(|id| Value::String(id.to_string()))
                .unwrap_or_else(|_| value.clone()),
            ("date", Value::String(raw)) => raw
                .trim()
                .parse::<NaiveDate>()
                .map(|date| Value::String(date.to_string()))
                .unwrap_or_else(|_| value.clone()),
            _ => value.clone(),
        }
    }
}

const fn col(name: &'static str, sql_type: &'static str) -> Column {
    Column { name, sql_type }
}

const STUDENT_COLUMNS: &[Column] = &[
    col("id", "uuid"),
    col("name", "text"),
    col("grade", "text"),
    col("teacher", "text"),
    col("active", "boolean"),
    col("dashboard_id", "text"),
    col("created_at", "timestamptz"),
];

const EVALUATION_COLUMNS: &[Column] = &[
    col("id", "uuid"),
    col("student_id", "uuid"),
    col("date", "date"),
    col("time_slot", "text"),
    col("scores", "jsonb"),
    col("general_comments", "text"),
    col("created_at", "timestamptz"),
];

const INCIDENT_COLUMNS: &[Column] = &[
    col("id", "uuid"),
    col("student_id", "uuid"),
    col("incident_date", "date"),
    col("incident_type", "text"),
    col("description", "text"),
    col("reported_by", "text"),
    col("created_at", "timestamptz"),
];

const CONTACT_COLUMNS: &[Column] = &[
    col("id", "uuid"),
    col("student_id", "uuid"),
    col("contact_date", "date"),
    col("contact_person", "text"),
    col("contact_method", "text"),
    col("notes", "text"),
    col("created_at", "timestamptz"),
];

const SUMMARY_COLUMNS: &[Column] = &[
    col("id", "uuid"),
    col("student_id", "uuid"),
    col("date_range_start", "date"),
    col("date_range_end", "date"),
    col("summary", "text"),
    col("created_at", "timestamptz"),
];

const DASHBOARD_COLUMNS: &[Column] = &[
    col("id", "uuid"),
    col("name", "text"),
    col("created_at", "timestamptz"),
];

const SETTING_COLUMNS: &[Column] = &[
    col("id", "uuid"),
    col("key", "text"),
    col("value", "text"),
    col("created_at", "timestamptz"),
];

impl Collection {
    pub const ALL: [Collection; 7] = [
        Collection::Students,
        Collection::DailyEvaluations,
        Collection::IncidentReports,
        Collection::ContactLogs,
        Collection::BehaviorSummaries,
        Collection::Dashboards,
        Collection::Settings,
    ];

    /// Table name in the hosted schema; also the local storage key suffix.
    pub fn name(self) -> &'static str {
        match self {
            Collection::Students => "students",
            Collection::DailyEvaluations => "daily_evaluations",
            Collection::IncidentReports => "incident_reports",
            Collection::ContactLogs => "contact_logs",
            Collection::BehaviorSummaries => "behavior_summaries",
            Collection::Dashboards => "dashboards",
            Collection::Settings => "settings",
        }
    }

    pub fn entity_name(self) -> &'static str {
        match self {
            Collection::Students => "student",
            Collection::DailyEvaluations => "daily evaluation",
            Collection::IncidentReports => "incident report",
            Collection::ContactLogs => "contact log",
            Collection::BehaviorSummaries => "behavior summary",
            Collection::Dashboards => "dashboard",
            Collection::Settings => "setting",
        }
    }

    pub fn storage_key(self) -> String {
        format!("bright_track.{}", self.name())
    }

    pub fn columns(self) -> &'static [Column] {
        match self {
            Collection::Students => STUDENT_COLUMNS,
            Collection::DailyEvaluations => EVALUATION_COLUMNS,
            Collection::IncidentReports => INCIDENT_COLUMNS,
            Collection::ContactLogs => CONTACT_COLUMNS,
            Collection::BehaviorSummaries => SUMMARY_COLUMNS,
            Collection::Dashboards => DASHBOARD_COLUMNS,
            Collection::Settings => SETTING_COLUMNS,
        }
    }

    pub fn column(self, name: &str) -> Option<Column> {
        self.columns().iter().copied().find(|c| c.name == name)
    }

    /// Collections whose rows reference this one through `student_id` and are
    /// removed along with it.
    pub fn dependents(self) -> &'static [Collection] {
        match self {
            Collection::Students => &[
                Collection::DailyEvaluations,
                Collection::IncidentReports,
                Collection::ContactLogs,
                Collection::BehaviorSummaries,
            ],
            _ => &[],
        }
    }

    pub fn date_column(self) -> Option<&'static str> {
        match self {
            Collection::DailyEvaluations => Some("date"),
            Collection::ContactLogs => Some("contact_date"),
            Collection::IncidentReports => Some("incident_date"),
            _ => None,
        }
    }

    /// Fields that together identify at most one row.
    pub fn unique_key(self) -> Option<&'static [&'static str]> {
        match self {
            Collection::DailyEvaluations => Some(&["student_id", "date", "time_slot"]),
            Collection::BehaviorSummaries => Some(&["student_id", "date_range_end"]),
            Collection::Settings => Some(&["key"]),
            _ => None,
        }
    }

    /// Rejects any key that is not a column of this collection.
    pub fn check_fields<'a>(self, fields: impl IntoIterator<Item = &'a String>) -> Result<()> {
        for field in fields {
            if self.column(field).is_none() {
                return Err(TrackError::UnknownField {
                    collection: self,
                    field: field.clone(),
                });
            }
        }
        Ok(())
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Equality predicate: a record matches when every field equals the given value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Filter(Map<String, Value>);

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of this filter with `field = value` added.
    pub fn and(&self, field: &str, value: impl Into<Value>) -> Self {
        let mut next = self.clone();
        next.0.insert(field.to_string(), value.into());
        next
    }

    /// Adds `field = value`. Values are compared in the column's stored form,
    /// so `"true"` matches a boolean column and `3` matches a text column the
    /// same way in both backends.
    pub fn eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.0.insert(field.to_string(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// This filter with every value coerced by [`Column::normalize`].
    /// Fails on fields that are not columns of `collection`.
    pub fn normalized(&self, collection: Collection) -> Result<Filter> {
        let mut values = Map::new();
        for (field, value) in &self.0 {
            let column = collection.column(field).ok_or_else(|| TrackError::UnknownField {
                collection,
                field: field.clone(),
            })?;
            values.insert(field.clone(), column.normalize(value));
        }
        Ok(Filter(values))
    }

    pub fn matches(&self, record: &Value) -> bool {
        self.0
            .iter()
            .all(|(field, expected)| record.get(field).unwrap_or(&Value::Null) == expected)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortSpec {
    pub column: String,
    pub ascending: bool,
}

impl SortSpec {
    pub fn asc(column: &str) -> Self {
        Self {
            column: column.to_string(),
            ascending: true,
        }
    }

    pub fn desc(column: &str) -> Self {
        Self {
            column: column.to_string(),
            ascending: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub min: NaiveDate,
    pub max: NaiveDate,
}

/// A record type stored in one collection.
pub trait Entity: Serialize + DeserializeOwned + Send + Sync + 'static {
    const COLLECTION: Collection;
    type Draft: Serialize + Send + Sync;
    type Patch: Serialize + Send + Sync;

    fn id(&self) -> Uuid;

    fn validate_draft(_draft: &Self::Draft) -> Result<()> {
        Ok(())
    }

    fn validate_patch(_patch: &Self::Patch) -> Result<()> {
        Ok(())
    }
}

fn require_text(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(TrackError::Validation(format!("{field} is required")));
    }
    Ok(())
}

fn require_some_text(field: &str, value: &Option<String>) -> Result<()> {
    match value {
        Some(value) => require_text(field, value),
        None => Ok(()),
    }
}

fn default_true() -> bool {
    true
}

fn default_dashboard_id() -> String {
    DEFAULT_DASHBOARD_ID.to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Student {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub grade: Option<String>,
    #[serde(default)]
    pub teacher: Option<String>,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default = "default_dashboard_id")]
    pub dashboard_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewStudent {
    pub name: String,
    pub grade: Option<String>,
    pub teacher: Option<String>,
    pub active: bool,
    pub dashboard_id: String,
}

impl NewStudent {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            grade: None,
            teacher: None,
            active: true,
            dashboard_id: default_dashboard_id(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StudentPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grade: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub teacher: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dashboard_id: Option<String>,
}

impl Entity for Student {
    const COLLECTION: Collection = Collection::Students;
    type Draft = NewStudent;
    type Patch = StudentPatch;

    fn id(&self) -> Uuid {
        self.id
    }

    fn validate_draft(draft: &NewStudent) -> Result<()> {
        require_text("name", &draft.name)?;
        require_text("dashboard_id", &draft.dashboard_id)
    }

    fn validate_patch(patch: &StudentPatch) -> Result<()> {
        require_some_text("name", &patch.name)?;
        require_some_text("dashboard_id", &patch.dashboard_id)
    }
}

/// Rating and notes for one behavior category within an evaluation slot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryScore {
    #[serde(default)]
    pub rating: Option<u8>,
    #[serde(default)]
    pub notes: String,
}

fn validate_scores(scores: &BTreeMap<String, CategoryScore>) -> Result<()> {
    for (category, score) in scores {
        if let Some(rating) = score.rating {
            if !(MIN_RATING..=MAX_RATING).contains(&rating) {
                return Err(TrackError::Validation(format!(
                    "rating for {category} must be between {MIN_RATING} and {MAX_RATING}, got {rating}"
                )));
            }
        }
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyEvaluation {
    pub id: Uuid,
    pub student_id: Uuid,
    pub date: NaiveDate,
    pub time_slot: String,
    #[serde(default)]
    pub scores: BTreeMap<String, CategoryScore>,
    #[serde(default)]
    pub general_comments: String,
    pub created_at: DateTime<Utc>,
}

impl DailyEvaluation {
    pub fn ratings(&self) -> impl Iterator<Item = u8> + '_ {
        self.scores.values().filter_map(|score| score.rating)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDailyEvaluation {
    pub student_id: Uuid,
    pub date: NaiveDate,
    pub time_slot: String,
    pub scores: BTreeMap<String, CategoryScore>,
    pub general_comments: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DailyEvaluationPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scores: Option<BTreeMap<String, CategoryScore>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub general_comments: Option<String>,
}

impl Entity for DailyEvaluation {
    const COLLECTION: Collection = Collection::DailyEvaluations;
    type Draft = NewDailyEvaluation;
    type Patch = DailyEvaluationPatch;

    fn id(&self) -> Uuid {
        self.id
    }

    fn validate_draft(draft: &NewDailyEvaluation) -> Result<()> {
        require_text("time_slot", &draft.time_slot)?;
        validate_scores(&draft.scores)
    }

    fn validate_patch(patch: &DailyEvaluationPatch) -> Result<()> {
        match &patch.scores {
            Some(scores) => validate_scores(scores),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncidentReport {
    pub id: Uuid,
    pub student_id: Uuid,
    pub incident_date: NaiveDate,
    pub incident_type: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub reported_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewIncidentReport {
    pub student_id: Uuid,
    pub incident_date: NaiveDate,
    pub incident_type: String,
    pub description: String,
    pub reported_by: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IncidentReportPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub incident_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Entity for IncidentReport {
    const COLLECTION: Collection = Collection::IncidentReports;
    type Draft = NewIncidentReport;
    type Patch = IncidentReportPatch;

    fn id(&self) -> Uuid {
        self.id
    }

    fn validate_draft(draft: &NewIncidentReport) -> Result<()> {
        require_text("incident_type", &draft.incident_type)
    }

    fn validate_patch(patch: &IncidentReportPatch) -> Result<()> {
        require_some_text("incident_type", &patch.incident_type)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContactLog {
    pub id: Uuid,
    pub student_id: Uuid,
    pub contact_date: NaiveDate,
    pub contact_person: String,
    pub contact_method: String,
    #[serde(default)]
    pub notes: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewContactLog {
    pub student_id: Uuid,
    pub contact_date: NaiveDate,
    pub contact_person: String,
    pub contact_method: String,
    pub notes: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ContactLogPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl Entity for ContactLog {
    const COLLECTION: Collection = Collection::ContactLogs;
    type Draft = NewContactLog;
    type Patch = ContactLogPatch;

    fn id(&self) -> Uuid {
        self.id
    }

    fn validate_draft(draft: &NewContactLog) -> Result<()> {
        require_text("contact_person", &draft.contact_person)?;
        require_text("contact_method", &draft.contact_method)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehaviorSummary {
    pub id: Uuid,
    pub student_id: Uuid,
    pub date_range_start: NaiveDate,
    pub date_range_end: NaiveDate,
    #[serde(default)]
    pub summary: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewBehaviorSummary {
    pub student_id: Uuid,
    pub date_range_start: NaiveDate,
    pub date_range_end: NaiveDate,
    pub summary: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BehaviorSummaryPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_range_start: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl Entity for BehaviorSummary {
    const COLLECTION: Collection = Collection::BehaviorSummaries;
    type Draft = NewBehaviorSummary;
    type Patch = BehaviorSummaryPatch;

    fn id(&self) -> Uuid {
        self.id
    }

    fn validate_draft(draft: &NewBehaviorSummary) -> Result<()> {
        if draft.date_range_start > draft.date_range_end {
            return Err(TrackError::Validation(
                "date_range_start must not be after date_range_end".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dashboard {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDashboard {
    pub name: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DashboardPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Entity for Dashboard {
    const COLLECTION: Collection = Collection::Dashboards;
    type Draft = NewDashboard;
    type Patch = DashboardPatch;

    fn id(&self) -> Uuid {
        self.id
    }

    fn validate_draft(draft: &NewDashboard) -> Result<()> {
        require_text("name", &draft.name)
    }

    fn validate_patch(patch: &DashboardPatch) -> Result<()> {
        require_some_text("name", &patch.name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Setting {
    pub id: Uuid,
    pub key: String,
    pub value: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSetting {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SettingPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl Entity for Setting {
    const COLLECTION: Collection = Collection::Settings;
    type Draft = NewSetting;
    type Patch = SettingPatch;

    fn id(&self) -> Uuid {
        self.id
    }

    fn validate_draft(draft: &NewSetting) -> Result<()> {
        require_text("key", &draft.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn filter_requires_every_field_to_match() {
        let filter = Filter::new().eq("active", true).eq("grade", "5");
        assert!(filter.matches(&json!({"active": true, "grade": "5", "name": "Ana"})));
        assert!(!filter.matches(&json!({"active": true, "grade": "4"})));
        assert!(!filter.matches(&json!({"grade": "5"})));
    }

    #[test]
    fn empty_filter_matches_everything() {
        assert!(Filter::new().matches(&json!({"anything": 1})));
    }

    #[test]
    fn normalize_coerces_values_to_stored_form() {
        let active = Collection::Students.column("active").unwrap();
        assert_eq!(active.normalize(&json!("true")), json!(true));
        assert_eq!(active.normalize(&json!(" F ")), json!(false));
        assert_eq!(active.normalize(&json!("maybe")), json!("maybe"));

        let grade = Collection::Students.column("grade").unwrap();
        assert_eq!(grade.normalize(&json!(3)), json!("3"));

        let id = Collection::Students.column("id").unwrap();
        assert_eq!(
            id.normalize(&json!("6F7B3C4E-8D1A-4A57-9A0E-2A3F1C9E4B10")),
            json!("6f7b3c4e-8d1a-4a57-9a0e-2a3f1c9e4b10")
        );
    }

    #[test]
    fn normalized_rejects_unknown_fields() {
        let filter = Filter::new().eq("active", "true").eq("shoe_size", 9);
        assert!(matches!(
            filter.normalized(Collection::Students),
            Err(TrackError::UnknownField { .. })
        ));
        let ok = Filter::new().eq("active", "true").normalized(Collection::Students).unwrap();
        assert_eq!(ok, Filter::new().eq("active", true));
    }

    #[test]
    fn and_leaves_original_untouched() {
        let base = Filter::new().eq("active", true);
        let scoped = base.and("dashboard_id", "north");
        assert_eq!(base.len(), 1);
        assert_eq!(scoped.len(), 2);
        assert_eq!(scoped, Filter::new().eq("active", true).eq("dashboard_id", "north"));
    }

    #[test]
    fn check_fields_rejects_unknown_columns() {
        let ok = vec!["active".to_string(), "dashboard_id".to_string()];
        assert!(Collection::Students.check_fields(&ok).is_ok());

        let bad = vec!["favorite_color".to_string()];
        assert!(matches!(
            Collection::Students.check_fields(&bad),
            Err(TrackError::UnknownField { .. })
        ));
    }

    #[test]
    fn only_students_cascade() {
        assert_eq!(Collection::Students.dependents().len(), 4);
        for collection in Collection::ALL.iter().skip(1) {
            assert!(collection.dependents().is_empty());
        }
    }

    #[test]
    fn ratings_outside_scale_are_rejected() {
        let mut scores = BTreeMap::new();
        scores.insert(
            "peer_interaction".to_string(),
            CategoryScore {
                rating: Some(5),
                notes: String::new(),
            },
        );
        let draft = NewDailyEvaluation {
            student_id: Uuid::new_v4(),
            date: NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
            time_slot: "morning".to_string(),
            scores,
            general_comments: String::new(),
        };
        assert!(matches!(
            DailyEvaluation::validate_draft(&draft),
            Err(TrackError::Validation(_))
        ));
    }

    #[test]
    fn blank_student_name_is_rejected() {
        assert!(Student::validate_draft(&NewStudent::new("  ")).is_err());
        assert!(Student::validate_draft(&NewStudent::new("Maya Chen")).is_ok());
    }

    #[test]
    fn patches_skip_absent_fields() {
        let patch = StudentPatch {
            active: Some(false),
            ..Default::default()
        };
        assert_eq!(serde_json::to_value(&patch).unwrap(), json!({"active": false}));
    }
}
