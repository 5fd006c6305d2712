use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use anyhow::Context;
use chrono::{Duration, Utc};

use crate::facade::Services;
use crate::models::{
    CategoryScore, Filter, NewContactLog, NewDailyEvaluation, NewDashboard, NewIncidentReport,
    NewStudent, Student, BEHAVIOR_CATEGORIES, DEFAULT_DASHBOARD_ID,
};

/// Must differ from the implicit default dashboard's display name.
const DEMO_DASHBOARD_NAME: &str = "Demo Classroom";

const SEED_STUDENTS: [(&str, &str, &str); 3] = [
    ("Maya Chen", "3", "Ms. Rivera"),
    ("Jordan Ellis", "4", "Mr. Okafor"),
    ("Priya Patel", "3", "Ms. Rivera"),
];

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SeedOutcome {
    pub students_created: usize,
    pub evaluations_recorded: usize,
}

/// Loads a small demo roster. Students are matched by name, so running it
/// twice adds nothing new.
pub async fn seed(services: &Services) -> anyhow::Result<SeedOutcome> {
    let dashboards = services
        .dashboards
        .filter(&Filter::new().eq("name", DEMO_DASHBOARD_NAME))
        .await?;
    if dashboards.is_empty() {
        services
            .dashboards
            .create(&NewDashboard {
                name: DEMO_DASHBOARD_NAME.to_string(),
            })
            .await?;
    }

    let today = Utc::now().date_naive();
    let mut outcome = SeedOutcome::default();

    for (offset, (name, grade, teacher)) in SEED_STUDENTS.iter().enumerate() {
        let existing = services.students.filter(&Filter::new().eq("name", *name)).await?;
        if !existing.is_empty() {
            continue;
        }

        let student = services
            .students
            .create(&NewStudent {
                grade: Some(grade.to_string()),
                teacher: Some(teacher.to_string()),
                ..NewStudent::new(*name)
            })
            .await?;
        outcome.students_created += 1;

        for days_back in 0..5i64 {
            let base = 1 + ((days_back as usize + offset) % 4) as u8;
            let scores: BTreeMap<String, CategoryScore> = BEHAVIOR_CATEGORIES
                .iter()
                .enumerate()
                .map(|(idx, category)| {
                    let rating = (base + idx as u8 % 2).min(4);
                    (
                        category.to_string(),
                        CategoryScore {
                            rating: Some(rating),
                            notes: String::new(),
                        },
                    )
                })
                .collect();

            services
                .evaluations
                .record(&NewDailyEvaluation {
                    student_id: student.id,
                    date: today - Duration::days(days_back),
                    time_slot: "morning".to_string(),
                    scores,
                    general_comments: String::new(),
                })
                .await?;
            outcome.evaluations_recorded += 1;
        }

        if offset == 1 {
            services
                .incidents
                .create(&NewIncidentReport {
                    student_id: student.id,
                    incident_date: today - Duration::days(2),
                    incident_type: "disruption".to_string(),
                    description: "Left seat repeatedly during reading block".to_string(),
                    reported_by: Some(teacher.to_string()),
                })
                .await?;
            services
                .contacts
                .create(&NewContactLog {
                    student_id: student.id,
                    contact_date: today - Duration::days(1),
                    contact_person: "Parent".to_string(),
                    contact_method: "phone".to_string(),
                    notes: "Discussed reading block plan".to_string(),
                })
                .await?;
        }
    }

    tracing::info!(
        students = outcome.students_created,
        evaluations = outcome.evaluations_recorded,
        "Seed complete"
    );
    Ok(outcome)
}

#[derive(Debug, serde::Deserialize)]
struct CsvRow {
    name: String,
    grade: Option<String>,
    teacher: Option<String>,
    dashboard_id: Option<String>,
}

/// Adds students from a CSV with `name,grade,teacher[,dashboard_id]` columns.
/// Names already on the roster and blank names are skipped.
pub async fn import_students_csv(services: &Services, csv_path: &Path) -> anyhow::Result<usize> {
    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;

    let existing: Vec<Student> = services.students.list(None).await?;
    let mut known: HashSet<String> = existing.into_iter().map(|s| s.name).collect();
    let mut inserted = 0usize;

    for (line, result) in reader.deserialize::<CsvRow>().enumerate() {
        let row = result.with_context(|| format!("invalid CSV row {}", line + 1))?;
        let name = row.name.trim().to_string();
        if name.is_empty() || known.contains(&name) {
            continue;
        }

        let draft = NewStudent {
            grade: row.grade.filter(|g| !g.trim().is_empty()),
            teacher: row.teacher.filter(|t| !t.trim().is_empty()),
            dashboard_id: row
                .dashboard_id
                .filter(|d| !d.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_DASHBOARD_ID.to_string()),
            ..NewStudent::new(name.clone())
        };
        services.students.create(&draft).await?;
        known.insert(name);
        inserted += 1;
    }

    Ok(inserted)
}
