use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chrono::{Datelike, Local, NaiveDate};
use clap::{ArgGroup, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::EnvFilter;

use tatib_tracker::auth::{RoleDirectory, SessionContext};
use tatib_tracker::catalog::Catalog;
use tatib_tracker::config::AppConfig;
use tatib_tracker::db::{self, PgStore};
use tatib_tracker::error::AppError;
use tatib_tracker::export::{self, ExportFormat};
use tatib_tracker::identity::PgIdentity;
use tatib_tracker::models::{NewViolation, ViolationPatch};
use tatib_tracker::report;
use tatib_tracker::routing::{self, Navigation, Page, Route, Screen};
use tatib_tracker::scoring::MonitoringFilter;
use tatib_tracker::service::TrackerService;
use tatib_tracker::status::classify;
use tatib_tracker::store::ViolationStore;

#[derive(Parser)]
#[command(name = "tatib")]
#[command(about = "Student violation tracker for school discipline staff", long_about = None)]
struct Cli {
    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load sample students, staff accounts and violations
    Seed,
    /// Sign in with email and password
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "TATIB_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Sign out and forget the stored session
    Logout,
    /// Show the signed-in account
    Whoami,
    /// Resolve what a route shows for the current session
    Open { path: String },
    /// Show the dashboard for the signed-in role
    Dashboard,
    /// Per-student totals and statuses
    Monitoring {
        #[arg(long)]
        search: Option<String>,
        #[arg(long)]
        grade: Option<i16>,
        #[arg(long)]
        section: Option<String>,
        #[arg(long)]
        category: Option<String>,
    },
    /// Students with violations, by grade and section
    Students {
        #[arg(long)]
        grade: Option<i16>,
        #[arg(long)]
        section: Option<String>,
    },
    /// Record a new violation
    Add {
        #[arg(long)]
        nis: String,
        #[arg(long)]
        category: String,
        #[arg(long)]
        description: String,
        /// Override the catalog points
        #[arg(long)]
        points: Option<u32>,
        /// Defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long)]
        note: Option<String>,
        #[arg(long)]
        attachment: Option<String>,
    },
    /// Change fields of an existing violation
    #[command(group(
        ArgGroup::new("changes")
            .args([
                "category",
                "description",
                "points",
                "date",
                "note",
                "attachment",
                "clear_note",
                "clear_attachment",
            ])
            .multiple(true)
            .required(true)
    ))]
    Edit {
        id: i64,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        points: Option<u32>,
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long, conflicts_with = "clear_note")]
        note: Option<String>,
        #[arg(long, conflicts_with = "clear_attachment")]
        attachment: Option<String>,
        /// Remove the stored note
        #[arg(long)]
        clear_note: bool,
        /// Remove the stored attachment reference
        #[arg(long)]
        clear_attachment: bool,
    },
    /// Delete a violation
    Delete { id: i64 },
    /// Monthly report, printed or exported
    Report {
        /// Indonesian month name or 1-12; defaults to the current month
        #[arg(long)]
        month: Option<String>,
        #[arg(long)]
        year: Option<i32>,
        #[arg(long, value_enum, default_value_t = ReportFormat::Markdown)]
        format: ReportFormat,
        /// Defaults to Laporan_Pelanggaran_<Bulan>_<Tahun>.<ext>
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Import violations from a CSV or spreadsheet file
    Import { file: PathBuf },
    /// List the violation catalog
    Catalog,
    /// Show the status for a point total
    Classify { points: u32 },
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ReportFormat {
    Markdown,
    Pdf,
    Xlsx,
    Html,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load().context("failed to load configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let catalog = match &config.catalog.path {
        Some(path) => Catalog::load(path)
            .with_context(|| format!("failed to load catalog from {}", path.display()))?,
        None => Catalog::builtin(),
    };

    match &cli.command {
        Commands::Catalog => {
            print_catalog(&catalog, cli.json)?;
            return Ok(());
        }
        Commands::Classify { points } => {
            let status = classify(*points);
            if cli.json {
                println!(
                    "{}",
                    serde_json::json!({ "points": points, "code": status.code(), "label": status.label() })
                );
            } else {
                println!("{points} points: {}", status.label());
            }
            return Ok(());
        }
        _ => {}
    }

    if config.database.url.is_empty() {
        anyhow::bail!("DATABASE_URL must be set to a production Postgres instance");
    }
    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(&config.database.url)
        .await
        .context("failed to connect to Postgres")?;

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
            return Ok(());
        }
        Commands::Seed => {
            db::seed(&pool).await?;
            println!("Seed data inserted.");
            for (email, password, role) in db::SEED_ACCOUNTS {
                println!("- {email} / {password} ({role})");
            }
            return Ok(());
        }
        _ => {}
    }

    let store = Arc::new(PgStore::new(pool.clone()));
    let roles: Arc<dyn RoleDirectory> = store.clone();
    let identity = Arc::new(PgIdentity::new(
        pool,
        config.session_file(),
        config.auth.session_ttl_minutes,
    ));
    let session = Arc::new(SessionContext::new(identity, roles, config.request_timeout()));
    let listener = session.spawn_listener();
    session.initialize().await;

    let records: Arc<dyn ViolationStore> = store;
    let service = TrackerService::new(records, Arc::new(catalog), session.clone());
    let outcome = run(cli.command, &service, cli.json).await;

    session.shutdown();
    let _ = listener.await;

    if let Err(err) = &outcome {
        if let Some(app) = err.downcast_ref::<AppError>() {
            tracing::debug!(code = app.code(), "command failed");
        }
    }
    outcome
}

async fn run(command: Commands, service: &TrackerService, json: bool) -> anyhow::Result<()> {
    let session = service.session();
    match command {
        Commands::Login { email, password } => {
            let state = session.sign_in(&email, &password).await?;
            match routing::redirect(&state) {
                routing::RedirectDecision::Navigate(route) => {
                    println!("Signed in as {email}. Landing page: {route}");
                }
                routing::RedirectDecision::Wait => println!("Signed in as {email}."),
            }
        }
        Commands::Logout => {
            session.sign_out().await?;
            println!("Signed out.");
        }
        Commands::Whoami => {
            let profile = service.profile().await?;
            if json {
                return print_json(&profile);
            }
            println!("{}", profile.email);
            if let Some(name) = &profile.display_name {
                println!("Name: {name}");
            }
            println!("Role: {}", profile.role.as_deref().unwrap_or("(none)"));
            if let Some(class) = &profile.homeroom {
                println!("Homeroom: {class}");
            }
        }
        Commands::Open { path } => {
            let route = Route::parse(&path);
            let outcome = routing::navigate(&session.settled().await?, &route);
            match outcome {
                Navigation::Render(screen) => render_screen(service, screen, &route, json).await?,
                other => print_navigation(&other),
            }
        }
        Commands::Dashboard => {
            let state = session.settled().await?;
            let role = state.principal().and_then(|p| p.role.clone());
            let route = match routing::landing_route(role.as_ref()) {
                Route::Area(area, _) => Route::Area(area, Page::Dashboard),
                other => other,
            };
            match routing::navigate(&state, &route) {
                Navigation::Render(screen) => render_screen(service, screen, &route, json).await?,
                other => print_navigation(&other),
            }
        }
        Commands::Monitoring {
            search,
            grade,
            section,
            category,
        } => {
            let filter = MonitoringFilter {
                search,
                section,
                grade,
                category,
            };
            print_monitoring(service, &filter, json).await?;
        }
        Commands::Students { grade, section } => {
            print_students(service, grade, section, json).await?;
        }
        Commands::Add {
            nis,
            category,
            description,
            points,
            date,
            note,
            attachment,
        } => {
            let record = service
                .add_violation(NewViolation {
                    nis,
                    category,
                    description,
                    points,
                    occurred_on: date.unwrap_or_else(|| Local::now().date_naive()),
                    note,
                    attachment,
                })
                .await?;
            if json {
                return print_json(&record);
            }
            println!(
                "Recorded violation #{} for {} ({} points).",
                record.id,
                record.nis,
                record.points.unwrap_or_default()
            );
        }
        Commands::Edit {
            id,
            category,
            description,
            points,
            date,
            note,
            attachment,
            clear_note,
            clear_attachment,
        } => {
            let patch = ViolationPatch {
                category,
                description,
                points,
                occurred_on: date,
                note: if clear_note { Some(None) } else { note.map(Some) },
                attachment: if clear_attachment {
                    Some(None)
                } else {
                    attachment.map(Some)
                },
            };
            let record = service.edit_violation(id, patch).await?;
            if json {
                return print_json(&record);
            }
            println!(
                "Updated violation #{}: {} / {} ({} points).",
                record.id,
                record.category,
                record.description,
                record.points.unwrap_or_default()
            );
        }
        Commands::Delete { id } => {
            service.delete_violation(id).await?;
            println!("Deleted violation #{id}.");
        }
        Commands::Report {
            month,
            year,
            format,
            out,
        } => {
            let today = Local::now().date_naive();
            let month = match month {
                Some(input) => report::parse_month(&input)
                    .with_context(|| format!("unknown month {input:?}"))?,
                None => today.month(),
            };
            let year = year.unwrap_or(today.year());
            let monthly = service.monthly_report(year, month).await?;

            let export_format = match format {
                ReportFormat::Markdown => None,
                ReportFormat::Pdf => Some(ExportFormat::Pdf),
                ReportFormat::Xlsx => Some(ExportFormat::Xlsx),
                ReportFormat::Html => Some(ExportFormat::Html),
            };
            match export_format {
                None if json => return print_json(&monthly),
                None => print!("{}", report::render_markdown(&monthly)),
                Some(export_format) => {
                    let out = out.unwrap_or_else(|| {
                        PathBuf::from(monthly.default_file_name(export_format.extension()))
                    });
                    export::export(&monthly, export_format, &out).map_err(AppError::from)?;
                    println!("Report written to {}.", out.display());
                }
            }
        }
        Commands::Import { file } => {
            let summary = service.import_file(&file).await?;
            if json {
                return print_json(&summary);
            }
            println!("Inserted {} violations from {}.", summary.inserted, file.display());
            if summary.unrecognised_categories > 0 {
                println!(
                    "{} rows use categories outside the catalog.",
                    summary.unrecognised_categories
                );
            }
        }
        Commands::InitDb | Commands::Seed | Commands::Catalog | Commands::Classify { .. } => {}
    }
    Ok(())
}

async fn render_screen(
    service: &TrackerService,
    screen: Screen,
    route: &Route,
    json: bool,
) -> anyhow::Result<()> {
    match screen {
        Screen::GenericDashboard => {
            let profile = service.profile().await?;
            println!("Welcome, {}.", profile.email);
            println!("Your account has no recognised role yet; ask an administrator for access.");
        }
        Screen::DashboardStats => {
            let stats = service.dashboard(Local::now().date_naive()).await?;
            if json {
                return print_json(&stats);
            }
            println!("Total violations: {}", stats.total_violations);
            println!("Students involved: {}", stats.students_involved);
            println!("This month: {}", stats.this_month);
            println!();
            println!("Most recent:");
            for recent in &stats.recent {
                println!(
                    "- #{} {} {} ({}, {}): {} / {} [{} points]",
                    recent.id,
                    recent.occurred_on,
                    recent.student_name.as_deref().unwrap_or("N/A"),
                    recent.nis,
                    recent.class.as_deref().unwrap_or("N/A"),
                    recent.category,
                    recent.description,
                    recent.points
                );
            }
        }
        Screen::HomeroomDashboard => {
            let homeroom = service.homeroom_dashboard().await?;
            if json {
                return print_json(&homeroom);
            }
            println!("Homeroom {}", homeroom.class);
            println!(
                "{} students, {} with violations, {} points in total",
                homeroom.overview.students_in_filter,
                homeroom.overview.rows.len(),
                homeroom.overview.total_points
            );
        }
        Screen::Monitoring => print_monitoring(service, &MonitoringFilter::default(), json).await?,
        Screen::Students => print_students(service, None, None, json).await?,
        Screen::Reports => {
            let today = Local::now().date_naive();
            let monthly = service.monthly_report(today.year(), today.month()).await?;
            if json {
                return print_json(&monthly);
            }
            print!("{}", report::render_markdown(&monthly));
        }
        Screen::EditViolation => {
            let Route::Area(_, Page::EditViolation(id)) = route else {
                anyhow::bail!("edit page opened without a record id");
            };
            let record = service.violation(*id).await?;
            if json {
                return print_json(&record);
            }
            println!("#{} {} {}", record.id, record.nis, record.occurred_on);
            println!("{} / {}", record.category, record.description);
            match record.points {
                Some(points) => println!("{points} points"),
                None => println!("points from catalog"),
            }
        }
        Screen::AddViolation => {
            println!("Use `tatib add --nis <NIS> --category <Tipe> --description <Deskripsi>`.");
        }
        Screen::Profile => {
            let profile = service.profile().await?;
            if json {
                return print_json(&profile);
            }
            println!("{} ({})", profile.email, profile.role.as_deref().unwrap_or("no role"));
        }
    }
    Ok(())
}

fn print_navigation(outcome: &Navigation) {
    match outcome {
        Navigation::Wait => println!("Loading..."),
        Navigation::ShowLogin => println!("Not signed in. Run `tatib login`."),
        Navigation::RedirectToLogin => println!("Redirect to /login: sign in first."),
        Navigation::Redirect(route) => println!("Redirect to {route}"),
        Navigation::Render(screen) => println!("Showing {screen}"),
        Navigation::Denied(screen) => println!("Access denied: your role cannot open {screen}."),
        Navigation::NotFound => println!("404: page not found."),
    }
}

async fn print_monitoring(
    service: &TrackerService,
    filter: &MonitoringFilter,
    json: bool,
) -> anyhow::Result<()> {
    let scores = service.monitoring(filter).await?;
    if json {
        return print_json(&scores);
    }
    if scores.is_empty() {
        println!("No violations match this filter.");
        return Ok(());
    }
    for score in &scores {
        let class = match (score.grade, &score.section) {
            (Some(grade), Some(section)) => format!("{grade}{section}"),
            _ => "N/A".to_string(),
        };
        println!(
            "- {} ({}, {}) {} points: {}",
            score.name,
            score.nis,
            class,
            score.total_points,
            score.status().label()
        );
        for violation in &score.violations {
            println!(
                "    #{} {} {} / {} [{} points]",
                violation.id,
                violation.occurred_on,
                violation.category,
                violation.description,
                violation.resolved_points
            );
        }
    }
    Ok(())
}

async fn print_students(
    service: &TrackerService,
    grade: Option<i16>,
    section: Option<String>,
    json: bool,
) -> anyhow::Result<()> {
    let overview = service.student_overview(grade, section).await?;
    if json {
        return print_json(&overview);
    }
    println!("Students in filter: {}", overview.students_in_filter);
    println!("Total points in filter: {}", overview.total_points);
    for row in &overview.rows {
        println!(
            "- {} ({}, {}{}) {} violations, {} points: {}",
            row.name,
            row.nis,
            row.grade,
            row.section,
            row.violation_count,
            row.total_points,
            row.status
        );
    }
    Ok(())
}

fn print_catalog(catalog: &Catalog, json: bool) -> anyhow::Result<()> {
    if json {
        let listing: Vec<_> = catalog
            .categories()
            .map(|category| {
                let entries: Vec<_> = catalog
                    .descriptions(category)
                    .map(|(description, points)| {
                        serde_json::json!({ "description": description, "points": points })
                    })
                    .collect();
                serde_json::json!({ "category": category.label(), "violations": entries })
            })
            .collect();
        return print_json(&listing);
    }
    for category in catalog.categories() {
        println!("{}", category.label());
        for (description, points) in catalog.descriptions(category) {
            println!("  {points:>3}  {description}");
        }
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("failed to encode output")?
    );
    Ok(())
}
