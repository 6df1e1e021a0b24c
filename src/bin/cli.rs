use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tabled::{Table, settings::Style};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use bqv::{
    BigQueryRepository, Config, ConfigOverrides, DiffReport, FileRepository, ManifestScheduleDirectory,
    MemoryScheduleDirectory, QueryRunner, ViewReader, ViewService,
};
use bqv::error::{BigQueryError, BqvError, ReconciliationError};
use bqv::executor::{expand_patterns, BqClient};
use bqv::template::TemplateRenderer;
use bqv::tester::ViewTester;
use bqv::view::ViewTableRow;

#[derive(Parser)]
#[command(name = "bqv")]
#[command(about = "Manage BigQuery views as files")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// GCP project ID
    #[arg(short, long, env = "GCP_PROJECT_ID")]
    project: Option<String>,

    /// Path to views directory
    #[arg(short, long)]
    dir: Option<PathBuf>,

    /// Config file (defaults to ./bqv.yaml, then the user config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Prefix for every BigQuery dataset, e.g. test_
    #[arg(long)]
    dataset_prefix: Option<String>,

    /// Views reconciled at once
    #[arg(long)]
    concurrency: Option<usize>,

    /// Cancel the run after this many seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage views
    View {
        #[command(subcommand)]
        action: ViewAction,
    },

    /// Run SQL files
    Query {
        #[command(subcommand)]
        action: QueryAction,
    },

    /// Generate view files from SQL templates
    Template {
        #[command(subcommand)]
        action: TemplateAction,
    },

    /// Run assertions against a view
    Test {
        /// View SQL file
        view: PathBuf,

        /// Assertion SQL file. Without it, the view's [bqv:TEST] annotations run
        #[arg(long)]
        assert: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum TemplateAction {
    /// Run templates and write one view file per result row
    Render {
        /// Views directory to write into
        views_dir: PathBuf,

        /// Template files, laid out as <dir>/<dataset>/<template>.sql
        #[arg(required = true)]
        templates: Vec<PathBuf>,
    },
}

#[derive(Subcommand)]
enum ViewAction {
    /// Show views whose files differ from BigQuery
    Diff {
        /// Compare BigQuery against files instead
        #[arg(long)]
        reverse: bool,

        /// Disable colored output
        #[arg(long)]
        no_color: bool,
    },

    /// Apply view files to BigQuery
    Apply {
        /// Also delete BigQuery views that have no file
        #[arg(long)]
        prune: bool,

        /// Show what would change without writing
        #[arg(long)]
        dry_run: bool,
    },

    /// Write BigQuery views to files
    Dump {
        /// Also delete files for views BigQuery no longer has
        #[arg(long)]
        prune: bool,
    },

    /// Delete BigQuery views that have no file
    Prune {
        #[arg(long)]
        dry_run: bool,
    },

    /// List views
    List {
        /// List BigQuery views instead of files
        #[arg(long)]
        remote: bool,
    },
}

#[derive(Subcommand)]
enum QueryAction {
    /// Execute SQL files (glob patterns accepted) concurrently
    Exec {
        #[arg(required = true)]
        files: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("bqv=debug,info")
    } else {
        EnvFilter::new("bqv=info,warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    match run(cli).await {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            print_error(e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load(cli.config.as_deref())?.apply(ConfigOverrides {
        project_id: cli.project,
        dir: cli.dir,
        dataset_prefix: cli.dataset_prefix,
        timeout_secs: cli.timeout,
        concurrency: cli.concurrency,
    })?;

    let cancel = CancellationToken::new();
    spawn_canceller(&config, cancel.clone());

    match cli.command {
        Commands::View { action } => match action {
            ViewAction::Diff { reverse, no_color } => {
                cmd_diff(&config, cancel, reverse, no_color).await?;
            }
            ViewAction::Apply { prune, dry_run } => {
                cmd_apply(&config, cancel, prune, dry_run).await?;
            }
            ViewAction::Dump { prune } => {
                cmd_dump(&config, cancel, prune).await?;
            }
            ViewAction::Prune { dry_run } => {
                cmd_prune(&config, cancel, dry_run).await?;
            }
            ViewAction::List { remote } => {
                cmd_list(&config, remote).await?;
            }
        },
        Commands::Query { action } => match action {
            QueryAction::Exec { files } => {
                cmd_exec(&config, cancel, &files).await?;
            }
        },
        Commands::Template { action } => match action {
            TemplateAction::Render { views_dir, templates } => {
                cmd_render(&config, cancel, &views_dir, &templates).await?;
            }
        },
        Commands::Test { view, assert } => {
            cmd_test(&config, &view, assert.as_deref()).await?;
        }
    }

    Ok(())
}

/// Fire `cancel` on Ctrl-C or when the configured timeout elapses.
fn spawn_canceller(config: &Config, cancel: CancellationToken) {
    let timeout = config.timeout();
    tokio::spawn(async move {
        let deadline = async {
            match timeout {
                Some(d) => tokio::time::sleep(d).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => warn!("Interrupted, finishing in-flight views"),
            _ = deadline => warn!("Timed out, finishing in-flight views"),
            _ = cancel.cancelled() => return,
        }
        cancel.cancel();
    });
}

fn file_repository(config: &Config) -> FileRepository {
    FileRepository::new(&config.dir)
}

async fn bigquery_repository(config: &Config) -> Result<BigQueryRepository, Box<dyn std::error::Error>> {
    let client = BqClient::new(config.project_id()?).await?;
    Ok(BigQueryRepository::new(client, &config.location).with_dataset_prefix(config.dataset_prefix()))
}

fn service(config: &Config, cancel: CancellationToken) -> ViewService {
    let scheduler = ManifestScheduleDirectory::new(config.schedule_manifest_path());
    ViewService::new(Arc::new(scheduler)).with_options(config.sync_options(cancel))
}

async fn cmd_diff(
    config: &Config,
    cancel: CancellationToken,
    reverse: bool,
    no_color: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let files = file_repository(config);
    let bigquery = bigquery_repository(config).await?;
    let service = service(config, cancel);

    let entries = if reverse {
        service.diff(&bigquery, &files).await?
    } else {
        service.diff(&files, &bigquery).await?
    };

    let report = DiffReport::new(entries);
    if report.is_empty() {
        println!("✓ No differences");
        return Ok(());
    }

    let colored = !no_color && atty::is(atty::Stream::Stdout);
    colored::control::set_override(colored);
    print!("{}", report.render(colored));
    println!("\n{} new, {} changed", report.added(), report.changed());
    Ok(())
}

async fn cmd_apply(
    config: &Config,
    cancel: CancellationToken,
    prune: bool,
    dry_run: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let files = file_repository(config);
    let bigquery = bigquery_repository(config).await?;

    if dry_run {
        let service = service(config, cancel);
        let report = DiffReport::new(service.diff(&files, &bigquery).await?);
        print!("{}", report.render(false));
        println!("\nDry run: {} to create, {} to update", report.added(), report.changed());
        if prune {
            let pruned = ViewService::new(Arc::new(MemoryScheduleDirectory::new()))
                .with_options(service.options().clone().with_dry_run(true))
                .delete_old(&files, &bigquery)
                .await?;
            for id in &pruned.deleted {
                println!("- {}", id);
            }
            println!("Dry run: {} to delete", pruned.len());
        }
        return Ok(());
    }

    let service = service(config, cancel);
    let report = service.copy(&files, &bigquery).await?;
    println!(
        "✓ Applied {} view(s): {} created, {} updated, {} cached, {} uncached",
        report.len(),
        report.created(),
        report.updated(),
        report.cached(),
        report.uncached()
    );

    if prune {
        let pruned = service.delete_old(&files, &bigquery).await?;
        println!("✓ Deleted {} view(s)", pruned.len());
    }
    Ok(())
}

async fn cmd_dump(
    config: &Config,
    cancel: CancellationToken,
    prune: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let files = file_repository(config);
    let bigquery = bigquery_repository(config).await?;

    // dump never touches schedules
    let service = ViewService::new(Arc::new(MemoryScheduleDirectory::new()))
        .with_options(config.sync_options(cancel));

    let report = service.dump(&bigquery, &files).await?;
    info!("Dumped views into {}", config.dir.display());
    println!("✓ Dumped {} view(s): {} created, {} updated", report.len(), report.created(), report.updated());

    if prune {
        let pruned = service.delete_old(&bigquery, &files).await?;
        println!("✓ Deleted {} file(s)", pruned.len());
    }
    Ok(())
}

async fn cmd_prune(
    config: &Config,
    cancel: CancellationToken,
    dry_run: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let files = file_repository(config);
    let bigquery = bigquery_repository(config).await?;
    let service = ViewService::new(Arc::new(MemoryScheduleDirectory::new()))
        .with_options(config.sync_options(cancel).with_dry_run(dry_run));

    let report = service.delete_old(&files, &bigquery).await?;
    if report.is_empty() {
        println!("✓ Nothing to delete");
        return Ok(());
    }
    for id in &report.deleted {
        println!("- {}", id);
    }
    if report.dry_run {
        println!("Dry run: {} to delete", report.len());
    } else {
        println!("✓ Deleted {} view(s)", report.len());
    }
    Ok(())
}

async fn cmd_list(config: &Config, remote: bool) -> Result<(), Box<dyn std::error::Error>> {
    let views = if remote {
        bigquery_repository(config).await?.list().await?
    } else {
        file_repository(config).list().await?
    };

    if views.is_empty() {
        println!("No views found");
        return Ok(());
    }

    let rows: Vec<ViewTableRow> = views.iter().map(ViewTableRow::from).collect();
    let mut table = Table::new(rows);
    table.with(Style::markdown());
    println!("{}", table);
    println!("\n{} view(s)", views.len());
    Ok(())
}

async fn cmd_exec(
    config: &Config,
    cancel: CancellationToken,
    patterns: &[String],
) -> Result<(), Box<dyn std::error::Error>> {
    let files = expand_patterns(patterns)?;
    let client = BqClient::new(config.project_id()?).await?;
    let runner = QueryRunner::new(Arc::new(client))
        .with_concurrency(config.concurrency)
        .with_cancel(cancel);

    let report = runner.run(&files).await?;
    for path in &report.succeeded {
        println!("✓ {}", path.display());
    }
    for failure in &report.failures {
        println!("✗ {}: {}", failure.path.display(), failure.error);
    }

    if !report.is_success() {
        return Err(format!("{} of {} file(s) failed", report.failures.len(), files.len()).into());
    }
    Ok(())
}

async fn cmd_render(
    config: &Config,
    cancel: CancellationToken,
    views_dir: &Path,
    templates: &[PathBuf],
) -> Result<(), Box<dyn std::error::Error>> {
    let client = BqClient::new(config.project_id()?).await?;
    let renderer = TemplateRenderer::new(Arc::new(client))
        .with_concurrency(config.concurrency)
        .with_cancel(cancel);
    let files = FileRepository::new(views_dir);

    let rendered = renderer.render(templates, &files).await?;
    for template in &rendered {
        println!("✓ {}: {} view(s)", template.template.display(), template.views.len());
        for id in &template.views {
            println!("  + {}", id);
        }
    }
    Ok(())
}

async fn cmd_test(
    config: &Config,
    view: &Path,
    assert: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let client = BqClient::new(config.project_id()?).await?;
    let tester = ViewTester::new(Arc::new(client));

    if let Some(assert) = assert {
        let view_sql = tokio::fs::read_to_string(view).await?;
        let assert_sql = tokio::fs::read_to_string(assert).await?;
        tester.test(&view_sql, &assert_sql).await?;
        println!("✓ {}", view.display());
        return Ok(());
    }

    let outcomes = tester.test_annotated(view).await?;
    let failed = outcomes.iter().filter(|o| !o.passed()).count();
    for outcome in &outcomes {
        match &outcome.error {
            None => println!("✓ {}", outcome.name),
            Some(error) => println!("✗ {}: {}", outcome.name, error),
        }
    }
    if failed > 0 {
        return Err(format!("{} of {} test(s) failed", failed, outcomes.len()).into());
    }
    Ok(())
}

fn print_error(err: Box<dyn std::error::Error>) {
    if let Some(bqv_err) = err.downcast_ref::<BqvError>() {
        match bqv_err {
            BqvError::BigQuery(bq) => {
                print_bq_error(bq);
                return;
            }
            BqvError::Item { dataset, name, source } => {
                if let BqvError::BigQuery(bq) = &**source {
                    eprintln!("\x1b[31m✗ {}.{}\x1b[0m", dataset, name);
                    print_bq_error(bq);
                    return;
                }
            }
            BqvError::Reconciliation(rec) => {
                eprintln!("\x1b[31m✗ {} view operation(s) failed\x1b[0m", rec.len());
                print_failures(rec);
                return;
            }
            BqvError::Cancelled { partial } => {
                eprintln!("\x1b[33m✗ Cancelled\x1b[0m");
                if !partial.is_empty() {
                    eprintln!("  {} view operation(s) failed before cancellation", partial.len());
                    print_failures(partial);
                }
                return;
            }
            _ => {}
        }
    }

    eprintln!("\x1b[31m✗ Error:\x1b[0m {}", err);
}

fn print_failures(rec: &ReconciliationError) {
    for failure in rec.failures() {
        eprintln!("  {}.{} [{}]", failure.dataset, failure.name, failure.step);
        eprintln!("    {}", failure.message);
    }
}

fn print_bq_error(err: &BigQueryError) {
    eprintln!("\n\x1b[31m✗ BigQuery Error [{}]\x1b[0m", err.error_code());
    eprintln!("  {}", err);
    eprintln!("\n\x1b[33mSuggestion:\x1b[0m");
    for line in err.suggestion().lines() {
        eprintln!("  {}", line);
    }
    eprintln!();
}
