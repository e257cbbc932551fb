use std::{error::Error, path::PathBuf};

use clap::{Args, Parser, Subcommand};
use engine::{
    CancellationToken, Engine, ExportFormat, ExportRequest, FilterValues, ReportAccess, RunOptions,
};
use migration::{Migrator, MigratorTrait};

mod settings;

#[derive(Parser, Debug)]
#[command(name = "rendiconto")]
#[command(about = "Run and export the reports stored in the metadata database")]
struct Cli {
    /// Settings file. Optional unless passed explicitly.
    #[arg(long, short)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the active reports.
    List(ListArgs),
    /// Show the selectable values of a report's filters.
    Options { code: String },
    /// Run a report and print its rows and totals.
    Run(RunArgs),
    /// Run a report and write the export document.
    Export(ExportArgs),
}

#[derive(Args, Debug)]
struct ListArgs {
    /// Only public reports needing none or one of these permissions.
    #[arg(long = "permission")]
    permissions: Vec<String>,
}

#[derive(Args, Debug)]
struct FilterArgs {
    /// Filter value as `field=value`; repeatable.
    #[arg(long = "filter", short, value_parser = parse_filter)]
    filters: Vec<(String, String)>,
}

impl FilterArgs {
    fn values(&self) -> FilterValues {
        self.filters.iter().cloned().collect()
    }
}

#[derive(Args, Debug)]
struct RunArgs {
    code: String,
    #[command(flatten)]
    filters: FilterArgs,
    /// Print rows and totals as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct ExportArgs {
    code: String,
    #[command(flatten)]
    filters: FilterArgs,
    #[arg(long, default_value_t = ExportFormat::Xlsx)]
    format: ExportFormat,
    /// Output path, defaults to `<code>.<extension>`.
    #[arg(long)]
    out: Option<PathBuf>,
    /// Write the generation time under the title.
    #[arg(long)]
    stamp: bool,
}

fn parse_filter(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected field=value, got {raw:?}")),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let settings = match &cli.config {
        Some(path) => settings::Settings::new(path, true),
        None => settings::Settings::new(&PathBuf::from("settings.toml"), false),
    };
    let settings = match settings {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("invalid settings: {err}");
            std::process::exit(2);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(format!(
            "rendiconto={level},engine={level}",
            level = settings.app.level
        ))
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run(cli.command, settings).await {
        tracing::error!("{err}");
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

async fn run(
    command: Command,
    settings: settings::Settings,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let engine = build_engine(&settings).await?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupted, cancelling the running query");
            on_interrupt.cancel();
        }
    });

    let mut options = RunOptions::default().with_cancel(cancel);
    if let Some(timeout) = settings.database.query_timeout() {
        options = options.with_timeout(timeout);
    }

    match command {
        Command::List(args) => {
            let access = if args.permissions.is_empty() {
                ReportAccess::all()
            } else {
                ReportAccess::with_permissions(args.permissions)
            };
            for report in engine.list_reports(&access).await? {
                println!(
                    "{}\t{}\t{}",
                    report.code,
                    report.category.as_deref().unwrap_or("-"),
                    report.name
                );
            }
        }
        Command::Options { code } => {
            let resolved = engine.filter_options(&code, &options).await?;
            println!("{}", serde_json::to_string_pretty(&resolved)?);
        }
        Command::Run(args) => {
            let run = engine
                .run_report(&args.code, &args.filters.values(), &options)
                .await?;
            if args.json {
                let output = serde_json::json!({
                    "report": run.definition.code,
                    "filters": run.query.applied(),
                    "rows": run.rows,
                    "totals": run.totals,
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            } else {
                print_rows(&run);
            }
        }
        Command::Export(args) => {
            let mut request = ExportRequest::new(args.format).with_run_options(options);
            if args.stamp {
                request = request.with_generated_at(chrono::Utc::now());
            }
            let document = engine
                .export_report(&args.code, &args.filters.values(), &request)
                .await?;
            let out = args.out.unwrap_or_else(|| {
                PathBuf::from(format!("{}.{}", args.code, document.format.extension()))
            });
            tokio::fs::write(&out, &document.bytes).await?;
            println!(
                "{} rows written to {} ({} bytes)",
                document.row_count,
                out.display(),
                document.bytes.len()
            );
        }
    }

    Ok(())
}

async fn build_engine(
    settings: &settings::Settings,
) -> Result<Engine, Box<dyn Error + Send + Sync>> {
    let database = sea_orm::Database::connect(settings.database.url.as_str()).await?;
    if settings.database.migrate {
        Migrator::up(&database, None).await?;
    }

    let engine = Engine::builder()
        .database(database)
        .settings(settings.export_settings()?)
        .build()
        .await?;
    Ok(engine)
}

/// Tab-separated rows in column order, then the totals.
fn print_rows(run: &engine::ReportRun) {
    let columns = &run.definition.columns;
    println!(
        "{}",
        columns
            .iter()
            .map(|column| column.display_name.as_str())
            .collect::<Vec<_>>()
            .join("\t")
    );
    for row in &run.rows {
        let cells = columns
            .iter()
            .map(|column| match row.get(&column.field_name) {
                None | Some(serde_json::Value::Null) => "-".to_string(),
                Some(serde_json::Value::String(text)) => text.clone(),
                Some(other) => other.to_string(),
            })
            .collect::<Vec<_>>();
        println!("{}", cells.join("\t"));
    }
    for (name, value) in &run.totals {
        println!("{name}: {value}");
    }
}
