use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Args, CommandFactory, Parser, Subcommand};
use osrs_simplified_core::catalog::SKILL_CATALOG;
use osrs_simplified_core::config::{DEFAULT_CONFIG_FILENAME, Settings, load_config};
use osrs_simplified_core::export::{
    DEFAULT_CONTENT_DIR, DEFAULT_SUMMARY_DIR, ExportReport, export_skills, export_summaries,
};
use osrs_simplified_core::jobs::JobCommand;
use osrs_simplified_core::llm::{CompletionApi, OpenAiClient, OpenAiConfig};
use osrs_simplified_core::pipeline::{FetchReport, store_skills};
use osrs_simplified_core::query;
use osrs_simplified_core::server::{AppState, serve};
use osrs_simplified_core::store::SkillStore;
use osrs_simplified_core::summarize::{SummaryScope, summarize_skills};
use osrs_simplified_core::wiki::{MediaWikiClient, MediaWikiClientConfig, WikiApi};
use serde::Serialize;

mod logging;

#[derive(Debug, Parser)]
#[command(
    name = "osrs_simplified",
    version,
    about = "Fetch, store, and summarize OSRS wiki skill training guides"
)]
struct Cli {
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    #[arg(long, global = true, value_name = "PATH", help = "SQLite database (overrides DATABASE_URL)")]
    database: Option<PathBuf>,
    #[arg(long, global = true, default_value = "info", help = "Log level when RUST_LOG is unset")]
    log_level: String,
    #[arg(long, global = true, help = "Print command reports as JSON")]
    json: bool,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Clone)]
struct RuntimeOptions {
    config: Option<PathBuf>,
    database: Option<PathBuf>,
    json: bool,
}

impl RuntimeOptions {
    fn from_cli(cli: &Cli) -> Self {
        Self {
            config: cli.config.clone(),
            database: cli.database.clone(),
            json: cli.json,
        }
    }

    /// Global flags forwarded to child processes started by the job runner.
    fn forwarded_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(config) = &self.config {
            args.push("--config".to_string());
            args.push(config.to_string_lossy().into_owned());
        }
        if let Some(database) = &self.database {
            args.push("--database".to_string());
            args.push(database.to_string_lossy().into_owned());
        }
        args
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Run the HTTP API")]
    Serve(ServeArgs),
    #[command(about = "Fetch every catalog guide and upsert it into the database")]
    Fetch,
    #[command(about = "Write LLM summaries onto stored guides")]
    Summarize(SummarizeArgs),
    #[command(about = "Write stored guide content to text files")]
    Export(ExportArgs),
    #[command(name = "export-summaries", about = "Write stored summaries to text files")]
    ExportSummaries(ExportArgs),
    #[command(about = "Check database connectivity")]
    Ping,
    #[command(about = "List the skill catalog")]
    Catalog,
}

#[derive(Debug, Args)]
struct ServeArgs {
    #[arg(long, help = "Bind host (overrides OSRS_HOST)")]
    host: Option<String>,
    #[arg(long, help = "Bind port (overrides OSRS_PORT)")]
    port: Option<u16>,
}

#[derive(Debug, Args)]
struct SummarizeArgs {
    #[arg(long, help = "Re-summarize records that already have a summary")]
    all: bool,
}

#[derive(Debug, Args)]
struct ExportArgs {
    #[arg(long, value_name = "PATH")]
    output_dir: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let runtime = RuntimeOptions::from_cli(&cli);
    dotenvy::dotenv().ok();
    logging::init_logging(&cli.log_level)?;

    match cli.command {
        Some(Commands::Serve(args)) => run_serve(&runtime, args),
        Some(Commands::Fetch) => run_fetch(&runtime),
        Some(Commands::Summarize(args)) => run_summarize(&runtime, args),
        Some(Commands::Export(args)) => run_export(&runtime, args),
        Some(Commands::ExportSummaries(args)) => run_export_summaries(&runtime, args),
        Some(Commands::Ping) => run_ping(&runtime),
        Some(Commands::Catalog) => run_catalog(&runtime),
        None => {
            let mut command = Cli::command();
            command.print_help()?;
            println!();
            Ok(())
        }
    }
}

fn run_serve(runtime: &RuntimeOptions, args: ServeArgs) -> Result<()> {
    let settings = resolve_settings(runtime)?;
    let wiki: Arc<dyn WikiApi> = Arc::new(build_wiki_client(&settings)?);
    let llm = build_llm_client(&settings)?.map(|client| Arc::new(client) as Arc<dyn CompletionApi>);
    if llm.is_none() {
        tracing::warn!("OPENAI_API_KEY is not set; /training summaries are disabled");
    }
    let state = AppState::new(
        SkillStore::new(&settings.database_path),
        wiki,
        llm,
        settings.markup_format,
        JobCommand::current_exe(runtime.forwarded_args())?,
    );
    let host = args.host.unwrap_or_else(|| settings.host.clone());
    let port = args.port.unwrap_or(settings.port);

    // Blocking HTTP clients must not be dropped on a runtime thread; `state`
    // keeps the last reference here until the runtime has shut down.
    let tokio_runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;
    let result = tokio_runtime.block_on(serve(
        state.clone(),
        &host,
        port,
        &settings.cors_allow_origin,
    ));
    drop(tokio_runtime);
    drop(state);
    result
}

fn run_fetch(runtime: &RuntimeOptions) -> Result<()> {
    let settings = resolve_settings(runtime)?;
    let store = SkillStore::new(&settings.database_path);
    let client = build_wiki_client(&settings)?;
    let report = store_skills(&client, &store, SKILL_CATALOG, settings.markup_format);
    if runtime.json {
        return print_json(&report);
    }

    println!("fetch");
    println!("db_path: {}", normalize_path(store.db_path()));
    println!("markup_format: {}", settings.markup_format.as_str());
    print_fetch_report(&report);
    Ok(())
}

fn print_fetch_report(report: &FetchReport) {
    println!("requested: {}", report.requested);
    println!("added: {}", report.added);
    println!("updated: {}", report.updated);
    println!("unchanged: {}", report.unchanged);
    println!("failed: {}", report.failed);
    println!("success: {}", format_flag(report.success));
    for item in &report.items {
        match &item.detail {
            Some(detail) => println!(
                "item: {} ({}) {} [{}] {detail}",
                item.skill,
                item.mode,
                item.action.as_str(),
                item.page
            ),
            None => println!(
                "item: {} ({}) {} [{}]",
                item.skill,
                item.mode,
                item.action.as_str(),
                item.page
            ),
        }
    }
}

fn run_summarize(runtime: &RuntimeOptions, args: SummarizeArgs) -> Result<()> {
    let settings = resolve_settings(runtime)?;
    let Some(client) = build_llm_client(&settings)? else {
        bail!("OPENAI_API_KEY is not configured; cannot summarize");
    };
    let store = SkillStore::new(&settings.database_path);
    let scope = if args.all {
        SummaryScope::All
    } else {
        SummaryScope::Missing
    };
    let report = summarize_skills(&store, &client, scope)?;
    if runtime.json {
        return print_json(&report);
    }

    println!("summarize");
    println!("db_path: {}", normalize_path(store.db_path()));
    println!("model: {}", client.model());
    println!("scope: {}", if args.all { "all" } else { "missing" });
    println!("considered: {}", report.considered);
    println!("summarized: {}", report.summarized);
    println!("skipped: {}", report.skipped);
    println!("failed: {}", report.failed);
    println!("success: {}", format_flag(report.success));
    for item in report.items.iter().filter(|item| item.detail.is_some()) {
        println!(
            "error: {} ({}) {}",
            item.skill,
            item.mode,
            item.detail.as_deref().unwrap_or_default()
        );
    }
    Ok(())
}

fn run_export(runtime: &RuntimeOptions, args: ExportArgs) -> Result<()> {
    let settings = resolve_settings(runtime)?;
    let store = SkillStore::new(&settings.database_path);
    let output_dir = args
        .output_dir
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONTENT_DIR));
    let report = export_skills(&store, &output_dir)?;
    print_export_report(runtime, "export", &report)
}

fn run_export_summaries(runtime: &RuntimeOptions, args: ExportArgs) -> Result<()> {
    let settings = resolve_settings(runtime)?;
    let store = SkillStore::new(&settings.database_path);
    let output_dir = args
        .output_dir
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SUMMARY_DIR));
    let report = export_summaries(&store, &output_dir)?;
    print_export_report(runtime, "export-summaries", &report)
}

fn print_export_report(runtime: &RuntimeOptions, label: &str, report: &ExportReport) -> Result<()> {
    if runtime.json {
        return print_json(report);
    }
    println!("{label}");
    println!("output_dir: {}", normalize_path(&report.output_dir));
    println!("written.count: {}", report.written.len());
    for path in &report.written {
        println!("written: {}", normalize_path(path));
    }
    if !report.skipped.is_empty() {
        println!("skipped:");
        for skipped in &report.skipped {
            println!("  - {skipped}");
        }
    }
    Ok(())
}

fn run_ping(runtime: &RuntimeOptions) -> Result<()> {
    let settings = resolve_settings(runtime)?;
    let store = SkillStore::new(&settings.database_path);
    let status = query::ping(&store).context("Database error")?;
    if runtime.json {
        return print_json(&status);
    }
    println!("db_path: {}", normalize_path(store.db_path()));
    println!("status: {}", status.status);
    println!("message: {}", status.message);
    println!("records: {}", store.count()?);
    Ok(())
}

fn run_catalog(runtime: &RuntimeOptions) -> Result<()> {
    if runtime.json {
        let entries = SKILL_CATALOG
            .iter()
            .map(|entry| {
                serde_json::json!({
                    "skill": entry.skill,
                    "mode": entry.mode,
                    "page": entry.page,
                })
            })
            .collect::<Vec<_>>();
        return print_json(&entries);
    }
    println!("catalog.count: {}", SKILL_CATALOG.len());
    for entry in SKILL_CATALOG {
        println!("catalog.entry: {} {} {}", entry.skill, entry.mode, entry.page);
    }
    Ok(())
}

fn resolve_settings(runtime: &RuntimeOptions) -> Result<Settings> {
    let config_path = runtime
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILENAME));
    let mut settings = load_config(&config_path)?.resolve()?;
    if let Some(database) = &runtime.database {
        settings.database_path = database.clone();
    }
    Ok(settings)
}

fn build_wiki_client(settings: &Settings) -> Result<MediaWikiClient> {
    MediaWikiClient::new(MediaWikiClientConfig::from_settings(settings))
}

fn build_llm_client(settings: &Settings) -> Result<Option<OpenAiClient>> {
    OpenAiConfig::from_settings(settings)
        .map(OpenAiClient::new)
        .transpose()
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn normalize_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn format_flag(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}
