use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

mod backend;
mod config;
mod dashboard;
mod db;
mod error;
mod facade;
mod kpi;
mod local;
mod models;
mod monitor;
mod report;
mod roster;
mod store;

use config::AppConfig;
use dashboard::{DashboardContext, DashboardScope, SharedDashboardContext, SELECTED_DASHBOARD_KEY};
use facade::Services;
use models::{
    CategoryScore, Collection, Filter, NewBehaviorSummary, NewContactLog, NewDailyEvaluation, NewDashboard,
    NewIncidentReport, NewStudent, SortSpec, BEHAVIOR_CATEGORIES, DEFAULT_DASHBOARD_ID,
};
use monitor::{ConnectivityMonitor, ConnectivitySnapshot, MonitorConfig};
use store::{FileKeyValueStore, PersistedStore};

#[derive(Parser)]
#[command(name = "bright-track")]
#[command(about = "Daily behavior tracking for classroom support teams", long_about = None)]
struct Cli {
    /// Dashboard to scope students to for this run
    #[arg(long, global = true)]
    dashboard: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the hosted database schema
    InitDb,
    /// Load a small demo roster
    Seed,
    /// Import students from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// List students on the current dashboard
    Students {
        /// Include inactive students
        #[arg(long)]
        all: bool,
    },
    /// Add a student to the current dashboard
    AddStudent {
        #[arg(long)]
        name: String,
        #[arg(long)]
        grade: Option<String>,
        #[arg(long)]
        teacher: Option<String>,
    },
    Deactivate {
        id: Uuid,
    },
    Reactivate {
        id: Uuid,
    },
    /// Delete a student and all of their records
    DeleteStudent {
        id: Uuid,
    },
    /// Record or replace a daily evaluation
    Score {
        #[arg(long)]
        student: Uuid,
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long, default_value = "morning")]
        slot: String,
        #[arg(long)]
        adult: Option<u8>,
        #[arg(long)]
        peer: Option<u8>,
        #[arg(long)]
        classroom: Option<u8>,
        #[arg(long, default_value = "")]
        comments: String,
    },
    /// Log an incident report
    Incident {
        #[arg(long)]
        student: Uuid,
        #[arg(long = "type")]
        incident_type: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long)]
        reported_by: Option<String>,
    },
    /// Log a contact with a family member or provider
    Contact {
        #[arg(long)]
        student: Uuid,
        #[arg(long)]
        person: String,
        #[arg(long, default_value = "phone")]
        method: String,
        #[arg(long, default_value = "")]
        notes: String,
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Write a behavior summary for the trailing window
    Summarize {
        #[arg(long)]
        student: Uuid,
        #[arg(long, default_value_t = 7)]
        since_days: i64,
    },
    /// List dashboards
    Dashboards,
    AddDashboard {
        #[arg(long)]
        name: String,
    },
    /// Remember a dashboard as the default selection
    SelectDashboard {
        id: String,
    },
    /// Generate a markdown report for the current dashboard
    Report {
        #[arg(long, default_value_t = 30)]
        since_days: i64,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// Delete every record held in local storage
    Reset {
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },
    /// Check backend connectivity
    Status {
        /// Keep polling until interrupted
        #[arg(long)]
        watch: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bright_track=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = AppConfig::from_env();

    if let Commands::InitDb = cli.command {
        let url = config
            .hosted_url()
            .context("SUPABASE_DB_URL or DATABASE_URL must point at a Postgres instance")?;
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .connect(url)
            .await
            .context("failed to connect to Postgres")?;
        db::init_db(&pool).await?;
        println!("Schema ready.");
        return Ok(());
    }

    if let Commands::Reset { yes } = cli.command {
        if config.hosted_url().is_some() {
            anyhow::bail!("reset only clears local storage; hosted data is left alone");
        }
        if !yes {
            anyhow::bail!("pass --yes to delete every record in {}", config.data_dir.display());
        }

        let store = PersistedStore::new(Box::new(FileKeyValueStore::open(&config.data_dir)?));
        for collection in Collection::ALL {
            store.clear(collection)?;
        }
        tracing::info!(data_dir = %config.data_dir.display(), "Local storage cleared");
        println!("Cleared local storage in {}.", config.data_dir.display());
        return Ok(());
    }

    let services = Services::new(backend::select(&config)?);
    tracing::debug!(mode = %services.mode(), "Backend selected");

    let shared = Arc::new(SharedDashboardContext::new());
    match DashboardContext::load(&services, cli.dashboard.as_deref(), config.disable_dashboards).await {
        Ok(context) => shared.set(context)?,
        Err(e) => tracing::warn!(error = %e, "Could not load dashboards"),
    }
    let scope = DashboardScope::new(shared.clone());

    match cli.command {
        Commands::InitDb | Commands::Reset { .. } => {}
        Commands::Seed => {
            let outcome = roster::seed(&services).await?;
            println!(
                "Seeded {} students and {} evaluations.",
                outcome.students_created, outcome.evaluations_recorded
            );
        }
        Commands::Import { csv } => {
            let inserted = roster::import_students_csv(&services, &csv).await?;
            println!("Inserted {inserted} students from {}.", csv.display());
        }
        Commands::Students { all } => {
            let base = if all {
                Filter::new()
            } else {
                Filter::new().eq("active", true)
            };
            let filter = scope.build_student_filter(&base).into_inner();
            let students = services.students.filter(&filter).await?;

            if students.is_empty() {
                println!("No students on {}.", scope.current_dashboard_name().into_inner());
                return Ok(());
            }

            for student in students {
                println!(
                    "- {} {}{} (grade {}, {})",
                    student.id,
                    student.name,
                    if student.active { "" } else { " [inactive]" },
                    student.grade.as_deref().unwrap_or("-"),
                    student.teacher.as_deref().unwrap_or("no teacher")
                );
            }
        }
        Commands::AddStudent {
            name,
            grade,
            teacher,
        } => {
            let student = services
                .students
                .create(&NewStudent {
                    grade,
                    teacher,
                    dashboard_id: scope.selected_dashboard_id().into_inner(),
                    ..NewStudent::new(name)
                })
                .await?;
            println!("Added {} ({}).", student.name, student.id);
        }
        Commands::Deactivate { id } => {
            let student = services.students.deactivate(id).await?;
            println!("{} is now inactive.", student.name);
        }
        Commands::Reactivate { id } => {
            let student = services.students.reactivate(id).await?;
            println!("{} is active again.", student.name);
        }
        Commands::DeleteStudent { id } => {
            services.students.delete(id).await?;
            println!("Deleted student {id} and their records.");
        }
        Commands::Score {
            student,
            date,
            slot,
            adult,
            peer,
            classroom,
            comments,
        } => {
            let scores: BTreeMap<String, CategoryScore> = BEHAVIOR_CATEGORIES
                .iter()
                .zip([adult, peer, classroom])
                .map(|(category, rating)| {
                    (
                        category.to_string(),
                        CategoryScore {
                            rating,
                            notes: String::new(),
                        },
                    )
                })
                .collect();

            let evaluation = services
                .evaluations
                .record(&NewDailyEvaluation {
                    student_id: student,
                    date: date.unwrap_or_else(|| Utc::now().date_naive()),
                    time_slot: slot,
                    scores,
                    general_comments: comments,
                })
                .await?;
            println!(
                "Recorded {} evaluation for {}.",
                evaluation.time_slot, evaluation.date
            );
        }
        Commands::Incident {
            student,
            incident_type,
            description,
            date,
            reported_by,
        } => {
            let incident = services
                .incidents
                .create(&NewIncidentReport {
                    student_id: student,
                    incident_date: date.unwrap_or_else(|| Utc::now().date_naive()),
                    incident_type,
                    description,
                    reported_by,
                })
                .await?;
            println!("Logged incident {}.", incident.id);
        }
        Commands::Contact {
            student,
            person,
            method,
            notes,
            date,
        } => {
            let contact = services
                .contacts
                .create(&NewContactLog {
                    student_id: student,
                    contact_date: date.unwrap_or_else(|| Utc::now().date_naive()),
                    contact_person: person,
                    contact_method: method,
                    notes,
                })
                .await?;
            println!("Logged contact {}.", contact.id);
        }
        Commands::Summarize {
            student,
            since_days,
        } => {
            let record = services
                .students
                .find(student)
                .await?
                .with_context(|| format!("student {student} not found"))?;
            let start = kpi::cutoff_date(since_days);
            let today = Utc::now().date_naive();
            let by_student = Filter::new().eq("student_id", student.to_string());

            let evaluations: Vec<_> = services
                .evaluations
                .filter(&by_student)
                .await?
                .into_iter()
                .filter(|e| e.date >= start)
                .collect();
            let incidents = services
                .incidents
                .filter(&by_student)
                .await?
                .into_iter()
                .filter(|i| i.incident_date >= start)
                .count();

            let summary = match kpi::average_rating(&evaluations) {
                Some(avg) => format!(
                    "{} averaged {:.2} ({}) across {} evaluations with {} incidents.",
                    record.name,
                    avg,
                    kpi::letter_grade(avg),
                    evaluations.len(),
                    incidents
                ),
                None => format!(
                    "{} has no ratings in this period and {} incidents.",
                    record.name, incidents
                ),
            };

            services
                .summaries
                .upsert(&NewBehaviorSummary {
                    student_id: student,
                    date_range_start: start,
                    date_range_end: today,
                    summary: summary.clone(),
                })
                .await?;
            println!("{summary}");
        }
        Commands::Dashboards => {
            let selected = scope.selected_dashboard_id().into_inner();
            let dashboards = scope.dashboards();
            if dashboards.is_fallback() {
                println!("Dashboards are unavailable on this backend.");
            }

            println!(
                "{} {} ({})",
                if selected == DEFAULT_DASHBOARD_ID { "*" } else { " " },
                DEFAULT_DASHBOARD_ID,
                scope.current_dashboard_name().into_inner()
            );
            for dashboard in dashboards.value() {
                let id = dashboard.id.to_string();
                println!(
                    "{} {} {}",
                    if id == selected { "*" } else { " " },
                    id,
                    dashboard.name
                );
            }
        }
        Commands::AddDashboard { name } => {
            let dashboard = services.dashboards.create(&NewDashboard { name }).await?;
            println!("Created dashboard {} ({}).", dashboard.name, dashboard.id);
        }
        Commands::SelectDashboard { id } => {
            let known = id == DEFAULT_DASHBOARD_ID
                || scope
                    .dashboards()
                    .value()
                    .iter()
                    .any(|dashboard| dashboard.id.to_string() == id);
            if !known {
                anyhow::bail!("no dashboard with id {id}");
            }

            services.settings.put(SELECTED_DASHBOARD_KEY, &id).await?;
            shared.select(&id)?;
            println!("Selected {}.", scope.current_dashboard_name().into_inner());
        }
        Commands::Report { since_days, out } => {
            let since = kpi::cutoff_date(since_days);
            let filter = scope
                .build_student_filter(&Filter::new().eq("active", true))
                .into_inner();
            let students = services.students.filter(&filter).await?;
            let ids: HashSet<Uuid> = students.iter().map(|s| s.id).collect();

            let evaluations: Vec<_> = services
                .evaluations
                .list(None)
                .await?
                .into_iter()
                .filter(|e| ids.contains(&e.student_id) && e.date >= since)
                .collect();
            let incidents: Vec<_> = services
                .incidents
                .list(None)
                .await?
                .into_iter()
                .filter(|i| ids.contains(&i.student_id) && i.incident_date >= since)
                .collect();
            let contacts: Vec<_> = services
                .contacts
                .list(Some(&SortSpec::desc("contact_date")))
                .await?
                .into_iter()
                .filter(|c| ids.contains(&c.student_id) && c.contact_date >= since)
                .collect();

            let student_kpis = kpi::student_kpis(&students, &evaluations, &incidents, &contacts);
            let trend = kpi::daily_averages(&evaluations);
            let report = report::build_report(
                &scope.current_dashboard_name().into_inner(),
                since,
                &student_kpis,
                &trend,
                &incidents,
                &contacts,
            );

            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
        Commands::Status { watch } => {
            let monitor_config = MonitorConfig {
                interval: config.poll_interval,
                ..MonitorConfig::default()
            };
            println!("Backend: {}", services.mode());
            match &config.auth {
                Some(auth) => println!("Sign-in: {} ({})", auth.project_id, auth.auth_domain),
                None => println!("Sign-in: not configured"),
            }

            if !watch {
                let snapshot = monitor::check_once(
                    services.backend().as_ref(),
                    &monitor_config.collections,
                    &ConnectivitySnapshot::checking(),
                )
                .await;
                print_snapshot(&snapshot);
                return Ok(());
            }

            let handle = ConnectivityMonitor::spawn(Arc::clone(services.backend()), monitor_config);
            let mut updates = handle.subscribe();
            print_snapshot(&handle.snapshot());
            loop {
                tokio::select! {
                    changed = updates.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let snapshot = updates.borrow_and_update().clone();
                        print_snapshot(&snapshot);
                    }
                    _ = tokio::signal::ctrl_c() => break,
                }
            }
            handle.stop().await;
        }
    }

    Ok(())
}

fn print_snapshot(snapshot: &ConnectivitySnapshot) {
    let checked = snapshot
        .last_checked
        .map(|at| at.format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "never".to_string());
    println!("Status: {:?} (checked {})", snapshot.status, checked);

    if let Some(counts) = &snapshot.counts {
        for (collection, count) in counts {
            let span = snapshot
                .date_ranges
                .as_ref()
                .and_then(|ranges| ranges.get(collection))
                .map(|range| format!(" {} to {}", range.min, range.max))
                .unwrap_or_default();
            println!("  {collection}: {count}{span}");
        }
    }
    if let Some(error) = &snapshot.last_error {
        println!("  last error: {error}");
    }
}
