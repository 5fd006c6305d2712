use std::collections::{BTreeMap, HashMap};

use chrono::{Duration, NaiveDate, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::models::{ContactLog, DailyEvaluation, IncidentReport, Student};

/// Points averaged by the rating trend line.
pub const TREND_WINDOW: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyAverage {
    pub date: NaiveDate,
    pub average: f64,
    pub samples: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IncidentTypeCount {
    pub incident_type: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentKpi {
    pub student_id: Uuid,
    pub student_name: String,
    pub average_rating: Option<f64>,
    pub grade: Option<char>,
    pub evaluation_count: usize,
    pub incident_count: usize,
    pub contact_count: usize,
}

pub fn letter_grade(average: f64) -> char {
    match average {
        a if a >= 3.5 => 'A',
        a if a >= 3.0 => 'B',
        a if a >= 2.5 => 'C',
        a if a >= 2.0 => 'D',
        _ => 'F',
    }
}

/// Trailing average over `window` points; leading points average what is available.
pub fn moving_average(values: &[f64], window: usize) -> Vec<f64> {
    let window = window.max(1);
    (0..values.len())
        .map(|idx| {
            let start = (idx + 1).saturating_sub(window);
            let slice = &values[start..=idx];
            slice.iter().sum::<f64>() / slice.len() as f64
        })
        .collect()
}

pub fn average_rating<'a>(evaluations: impl IntoIterator<Item = &'a DailyEvaluation>) -> Option<f64> {
    let (total, count) = evaluations
        .into_iter()
        .flat_map(DailyEvaluation::ratings)
        .fold((0u32, 0u32), |(total, count), rating| {
            (total + u32::from(rating), count + 1)
        });

    if count == 0 {
        None
    } else {
        Some(f64::from(total) / f64::from(count))
    }
}

/// Mean of every rating given on each date, oldest first. Dates without ratings are skipped.
pub fn daily_averages(evaluations: &[DailyEvaluation]) -> Vec<DailyAverage> {
    let mut by_date: BTreeMap<NaiveDate, (u32, usize)> = BTreeMap::new();

    for evaluation in evaluations {
        for rating in evaluation.ratings() {
            let entry = by_date.entry(evaluation.date).or_insert((0, 0));
            entry.0 += u32::from(rating);
            entry.1 += 1;
        }
    }

    by_date
        .into_iter()
        .map(|(date, (total, samples))| DailyAverage {
            date,
            average: f64::from(total) / samples as f64,
            samples,
        })
        .collect()
}

pub fn incident_counts(incidents: &[IncidentReport]) -> Vec<IncidentTypeCount> {
    let mut map: HashMap<&str, usize> = HashMap::new();
    for incident in incidents {
        *map.entry(incident.incident_type.as_str()).or_insert(0) += 1;
    }

    let mut counts: Vec<IncidentTypeCount> = map
        .into_iter()
        .map(|(incident_type, count)| IncidentTypeCount {
            incident_type: incident_type.to_string(),
            count,
        })
        .collect();

    counts.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| a.incident_type.cmp(&b.incident_type))
    });
    counts
}

/// Per-student figures, lowest average first so students needing support lead.
/// Students with no ratings come last.
pub fn student_kpis(
    students: &[Student],
    evaluations: &[DailyEvaluation],
    incidents: &[IncidentReport],
    contacts: &[ContactLog],
) -> Vec<StudentKpi> {
    let mut values: Vec<StudentKpi> = students
        .iter()
        .map(|student| {
            let own: Vec<&DailyEvaluation> = evaluations
                .iter()
                .filter(|e| e.student_id == student.id)
                .collect();
            let average_rating = average_rating(own.iter().copied());

            StudentKpi {
                student_id: student.id,
                student_name: student.name.clone(),
                average_rating,
                grade: average_rating.map(letter_grade),
                evaluation_count: own.len(),
                incident_count: incidents.iter().filter(|i| i.student_id == student.id).count(),
                contact_count: contacts.iter().filter(|c| c.student_id == student.id).count(),
            }
        })
        .collect();

    values.sort_by(|a, b| match (a.average_rating, b.average_rating) {
        (Some(x), Some(y)) => x
            .partial_cmp(&y)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.student_name.cmp(&b.student_name)),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => a.student_name.cmp(&b.student_name),
    });
    values
}

/// First day of a trailing window of `since_days` (at least one) ending today.
/// Windows reaching past the calendar's start begin at [`NaiveDate::MIN`].
pub fn cutoff_date(since_days: i64) -> NaiveDate {
    cutoff_from(Utc::now().date_naive(), since_days)
}

fn cutoff_from(today: NaiveDate, since_days: i64) -> NaiveDate {
    Duration::try_days(since_days.max(1))
        .and_then(|span| today.checked_sub_signed(span))
        .unwrap_or(NaiveDate::MIN)
}
