use std::collections::HashMap;
use std::fmt::Write;

use chrono::NaiveDate;
use uuid::Uuid;

use crate::kpi::{self, DailyAverage, IncidentTypeCount, StudentKpi};
use crate::models::{ContactLog, IncidentReport};

pub fn build_report(
    scope_name: &str,
    since: NaiveDate,
    student_kpis: &[StudentKpi],
    trend: &[DailyAverage],
    incidents: &[IncidentReport],
    contacts: &[ContactLog],
) -> String {
    let smoothed = kpi::moving_average(
        &trend.iter().map(|day| day.average).collect::<Vec<_>>(),
        kpi::TREND_WINDOW,
    );
    let mix: Vec<IncidentTypeCount> = kpi::incident_counts(incidents);
    let names: HashMap<Uuid, &str> = student_kpis
        .iter()
        .map(|k| (k.student_id, k.student_name.as_str()))
        .collect();

    let mut output = String::new();

    let _ = writeln!(output, "# Bright Track Behavior Report");
    let _ = writeln!(output, "Dashboard: {} (records since {})", scope_name, since);
    let _ = writeln!(output);
    let _ = writeln!(output, "## Rating Trend");

    if trend.is_empty() {
        let _ = writeln!(output, "No ratings recorded for this window.");
    } else {
        for (day, average) in trend.iter().zip(smoothed.iter()) {
            let _ = writeln!(
                output,
                "- {}: {:.2} across {} ratings ({}-day avg {:.2})",
                day.date,
                day.average,
                day.samples,
                kpi::TREND_WINDOW,
                average
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Incident Mix");

    if mix.is_empty() {
        let _ = writeln!(output, "No incidents reported for this window.");
    } else {
        for entry in &mix {
            let _ = writeln!(output, "- {}: {} incidents", entry.incident_type, entry.count);
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Students");

    if student_kpis.is_empty() {
        let _ = writeln!(output, "No students on this dashboard.");
    } else {
        for student in student_kpis {
            let rating = match (student.average_rating, student.grade) {
                (Some(avg), Some(grade)) => format!("avg {:.2} ({})", avg, grade),
                _ => "no ratings".to_string(),
            };
            let _ = writeln!(
                output,
                "- {}: {} from {} evaluations, {} incidents, {} contacts",
                student.student_name,
                rating,
                student.evaluation_count,
                student.incident_count,
                student.contact_count
            );
        }
    }

    let mut recent = contacts.to_vec();
    recent.sort_by(|a, b| b.contact_date.cmp(&a.contact_date));
    let _ = writeln!(output);
    let _ = writeln!(output, "## Recent Contact Notes");

    if recent.is_empty() {
        let _ = writeln!(output, "No contacts logged for this window.");
    } else {
        for contact in recent.iter().take(5) {
            let name = names.get(&contact.student_id).copied().unwrap_or("Unknown student");
            let _ = writeln!(
                output,
                "- {} ({} via {}) on {}: {}",
                name, contact.contact_person, contact.contact_method, contact.contact_date, contact.notes
            );
        }
    }

    output
}
