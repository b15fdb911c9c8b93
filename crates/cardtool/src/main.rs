use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use cardtool_core::audit::{audit_pages, render_report};
use cardtool_core::catalog::Catalog;
use cardtool_core::config::{CardConfig, load_config};
use cardtool_core::extract::extract_cards;
use cardtool_core::filesystem::{ScanOptions, ScanStats, locate_page, scan_pages_with_stats};
use cardtool_core::resolve::{deep_link_href, resolve_in_catalog, resolve_match};
use cardtool_core::runtime::{
    InitOptions, PathOverrides, ResolutionContext, ResolvedPaths, init_layout, inspect_runtime,
    open_catalog_store, resolve_paths,
};
use cardtool_core::score::search_catalog;
use cardtool_core::seed::{SeedFormat, build_seed, render_seed_js, render_seed_json};
use cardtool_core::sync::sync_catalog;
use clap::{Args, CommandFactory, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "CARDTOOL_LOG";

#[derive(Debug, Parser)]
#[command(
    name = "cardtool",
    version,
    about = "Card extraction, deep-link resolution, catalog and audit tooling for static guide pages"
)]
struct Cli {
    #[arg(long, global = true, value_name = "PATH")]
    project_root: Option<PathBuf>,
    #[arg(long, global = true, value_name = "PATH")]
    data_dir: Option<PathBuf>,
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    #[arg(long, global = true, help = "Print resolved runtime diagnostics")]
    diagnostics: bool,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Clone)]
struct RuntimeOptions {
    project_root: Option<PathBuf>,
    data_dir: Option<PathBuf>,
    config: Option<PathBuf>,
    diagnostics: bool,
}

impl RuntimeOptions {
    fn from_cli(cli: &Cli) -> Self {
        Self {
            project_root: cli.project_root.clone(),
            data_dir: cli.data_dir.clone(),
            config: cli.config.clone(),
            diagnostics: cli.diagnostics,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Create the .cardtool/ runtime layout and config")]
    Init(InitArgs),
    #[command(about = "Show resolved paths, runtime state and page scan stats")]
    Status,
    #[command(about = "List the cards extracted from one page")]
    Cards(CardsArgs),
    #[command(about = "Check card markup and script order across all pages")]
    Audit(AuditArgs),
    Catalog(CatalogArgs),
    #[command(about = "Resolve a deep-link query against a page")]
    Resolve(ResolveArgs),
    #[command(about = "Rank catalog cards against a query")]
    Search(SearchArgs),
}

#[derive(Debug, Args)]
struct InitArgs {
    #[arg(long, help = "Overwrite an existing config file")]
    force: bool,
    #[arg(long, help = "Skip writing .cardtool/config.toml")]
    no_config: bool,
}

#[derive(Debug, Args)]
struct CardsArgs {
    page: String,
    #[arg(long, help = "Print cards as JSON")]
    json: bool,
}

#[derive(Debug, Args)]
struct AuditArgs {
    #[arg(long, help = "Print the report as JSON")]
    json: bool,
}

#[derive(Debug, Args)]
struct CatalogArgs {
    #[command(subcommand)]
    command: CatalogSubcommand,
}

#[derive(Debug, Subcommand)]
enum CatalogSubcommand {
    #[command(about = "Extract pages and merge them into the stored catalog")]
    Sync { pages: Vec<String> },
    #[command(about = "Print the stored catalog")]
    Show {
        #[arg(long)]
        json: bool,
    },
    #[command(about = "Summarize the stored catalog")]
    Stats,
    #[command(about = "Build a catalog seed from the configured seed pages")]
    Seed(SeedArgs),
}

#[derive(Debug, Args)]
struct SeedArgs {
    #[arg(long, value_name = "PATH", help = "Write to PATH instead of stdout")]
    out: Option<PathBuf>,
    #[arg(long, default_value = "js", value_name = "json|js")]
    format: String,
}

#[derive(Debug, Args)]
struct ResolveArgs {
    page: String,
    query: String,
    #[arg(long, help = "Resolve against the stored catalog entry instead of the page markup")]
    catalog: bool,
}

#[derive(Debug, Args)]
struct SearchArgs {
    query: String,
    #[arg(long, value_name = "N")]
    limit: Option<usize>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing();
    let runtime = RuntimeOptions::from_cli(&cli);

    let result = match cli.command {
        Some(Commands::Init(args)) => run_init(&runtime, args).map(|()| ExitCode::SUCCESS),
        Some(Commands::Status) => run_status(&runtime).map(|()| ExitCode::SUCCESS),
        Some(Commands::Cards(args)) => run_cards(&runtime, args).map(|()| ExitCode::SUCCESS),
        Some(Commands::Audit(args)) => run_audit(&runtime, args),
        Some(Commands::Catalog(CatalogArgs { command })) => match command {
            CatalogSubcommand::Sync { pages } => run_catalog_sync(&runtime, &pages),
            CatalogSubcommand::Show { json } => run_catalog_show(&runtime, json),
            CatalogSubcommand::Stats => run_catalog_stats(&runtime),
            CatalogSubcommand::Seed(args) => run_catalog_seed(&runtime, args),
        }
        .map(|()| ExitCode::SUCCESS),
        Some(Commands::Resolve(args)) => run_resolve(&runtime, args),
        Some(Commands::Search(args)) => run_search(&runtime, args).map(|()| ExitCode::SUCCESS),
        None => {
            let mut command = Cli::command();
            command
                .print_help()
                .map(|()| {
                    println!();
                    ExitCode::SUCCESS
                })
                .map_err(anyhow::Error::from)
        }
    };

    match result {
        Ok(code) => code,
        Err(error) => {
            eprintln!("error: {error:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run_init(runtime: &RuntimeOptions, args: InitArgs) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let report = init_layout(
        &paths,
        &InitOptions {
            materialize_config: !args.no_config,
            force: args.force,
        },
    )?;

    println!("Initialized cardtool runtime layout");
    println!("project_root: {}", normalize_path(&paths.project_root));
    println!("state_dir: {}", normalize_path(&paths.state_dir));
    println!("data_dir: {}", normalize_path(&paths.data_dir));
    println!("db_path: {}", normalize_path(&paths.db_path));
    println!("storage_dir: {}", normalize_path(&paths.storage_dir));
    println!("config_path: {}", normalize_path(&paths.config_path));
    println!("created_dirs: {}", report.created_dirs.len());
    println!("wrote_config: {}", report.wrote_config);
    print_diagnostics(runtime, &paths);
    Ok(())
}

fn run_status(runtime: &RuntimeOptions) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let config = load_config(&paths.config_path)?;
    let status = inspect_runtime(&paths)?;
    let (_, scan) = scan_pages_with_stats(&paths, &audit_scan_options(&config))?;

    println!("runtime status");
    println!("project_root: {}", normalize_path(&paths.project_root));
    println!(
        "project_root_exists: {}",
        format_flag(status.project_root_exists)
    );
    println!("state_dir_exists: {}", format_flag(status.state_dir_exists));
    println!("data_dir_exists: {}", format_flag(status.data_dir_exists));
    println!("db_exists: {}", format_flag(status.db_exists));
    println!(
        "db_size_bytes: {}",
        status
            .db_size_bytes
            .map(|size| size.to_string())
            .unwrap_or_else(|| "n/a".to_string())
    );
    println!("config_exists: {}", format_flag(status.config_exists));
    println!("catalog.backend: {}", config.catalog_backend()?.as_str());
    println!("catalog.storage_key: {}", config.storage_key());
    print_scan_stats("scan", &scan);
    if !status.warnings.is_empty() {
        println!("warnings:");
        for warning in &status.warnings {
            println!("  - {warning}");
        }
    }
    print_diagnostics(runtime, &paths);
    Ok(())
}

fn run_cards(runtime: &RuntimeOptions, args: CardsArgs) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let config = load_config(&paths.config_path)?;
    let page = locate_page(&paths, &args.page)?;
    let cards = extract_cards(&page.page_key, &page.read()?, &config.cards);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&cards)?);
        return Ok(());
    }

    println!("page: {}", page.page_key);
    println!("cards.count: {}", cards.len());
    for card in &cards {
        println!(
            "card.{}: key={} id={} title={}",
            card.ordinal_index,
            or_none(&card.card_key),
            card.explicit_id.as_deref().unwrap_or("<none>"),
            card.title.as_deref().unwrap_or("<none>")
        );
    }
    print_diagnostics(runtime, &paths);
    Ok(())
}

fn run_audit(runtime: &RuntimeOptions, args: AuditArgs) -> Result<ExitCode> {
    let paths = resolve_runtime_paths(runtime)?;
    let config = load_config(&paths.config_path)?;
    let report = audit_pages(&paths, &config)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", render_report(&report));
    }
    print_diagnostics(runtime, &paths);
    Ok(ExitCode::from(report.exit_code()))
}

fn run_catalog_sync(runtime: &RuntimeOptions, pages: &[String]) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let config = load_config(&paths.config_path)?;
    let mut store = open_catalog_store(&paths, &config)?;
    let report = sync_catalog(&paths, &config, &mut store, pages)?;

    println!("catalog sync");
    println!("storage_key: {}", store.key());
    for page in &report.pages {
        println!(
            "page.{}: extracted={} added={}",
            page.page_key, page.extracted, page.added
        );
    }
    println!("catalog.pages: {}", report.total_pages);
    println!("catalog.cards: {}", report.total_cards);
    println!(
        "catalog.updated_at: {}",
        report.updated_at.as_deref().unwrap_or("<none>")
    );
    print_diagnostics(runtime, &paths);
    Ok(())
}

fn run_catalog_show(runtime: &RuntimeOptions, json: bool) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let catalog = load_catalog(&paths)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&catalog)?);
        return Ok(());
    }
    if catalog.is_empty() {
        println!("catalog: <empty> (run `cardtool catalog sync`)");
    }
    for (page_key, entry) in &catalog.pages {
        println!("=== {page_key} ===");
        println!("category: {}", or_none(&entry.category));
        println!("href: {}", or_none(&entry.href));
        for card in &entry.cards {
            println!("  {} | {}", card.card_key, card.title);
        }
    }
    print_diagnostics(runtime, &paths);
    Ok(())
}

fn run_catalog_stats(runtime: &RuntimeOptions) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let stats = load_catalog(&paths)?.stats();

    println!("catalog stats");
    println!("catalog.pages: {}", stats.pages);
    println!("catalog.cards: {}", stats.cards);
    println!(
        "catalog.updated_at: {}",
        stats.updated_at.as_deref().unwrap_or("<none>")
    );
    for (page, count) in &stats.by_page {
        println!("catalog.page.{page}: {count}");
    }
    print_diagnostics(runtime, &paths);
    Ok(())
}

fn run_catalog_seed(runtime: &RuntimeOptions, args: SeedArgs) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let config = load_config(&paths.config_path)?;
    let format = SeedFormat::parse(&args.format)?;
    let seed = build_seed(&paths, &config.seed.pages, &config.cards)?;
    let rendered = match format {
        SeedFormat::Json => render_seed_json(&seed)?,
        SeedFormat::Js => render_seed_js(&seed, &config.storage_key())?,
    };

    let Some(out) = args.out else {
        print!("{rendered}");
        return Ok(());
    };
    let out_path = if out.is_absolute() {
        out
    } else {
        paths.project_root.join(out)
    };
    if let Some(parent) = out_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(&out_path, rendered)
        .with_context(|| format!("failed to write {}", out_path.display()))?;

    println!("catalog seed");
    println!("format: {}", format.as_str());
    println!("pages: {} | cards: {}", seed.pages.len(), seed.card_count());
    println!("wrote: {}", normalize_path(&out_path));
    print_diagnostics(runtime, &paths);
    Ok(())
}

fn run_resolve(runtime: &RuntimeOptions, args: ResolveArgs) -> Result<ExitCode> {
    let paths = resolve_runtime_paths(runtime)?;
    let config = load_config(&paths.config_path)?;
    if args.query.is_empty() {
        bail!("resolve requires a non-empty query");
    }

    println!("query: {}", args.query);
    if args.catalog {
        let catalog = load_catalog(&paths)?;
        let page_key = args.page.trim_start_matches("./");
        let Some(hit) = resolve_in_catalog(&args.query, &catalog, Some(page_key)) else {
            println!("match: <none>");
            return Ok(ExitCode::FAILURE);
        };
        println!("page: {}", hit.page_key);
        println!("match.rule: {}", hit.rule.as_str());
        println!("match.card_key: {}", hit.card.card_key);
        println!("match.title: {}", or_none(&hit.card.title));
        println!("href: {}", hit.href());
    } else {
        let page = locate_page(&paths, &args.page)?;
        let cards = extract_cards(&page.page_key, &page.read()?, &config.cards);
        println!("page: {}", page.page_key);
        let Some(resolved) = resolve_match(&args.query, &cards, &config.cards.id_prefix) else {
            println!("match: <none>");
            return Ok(ExitCode::FAILURE);
        };
        let card = resolved.card;
        println!("match.rule: {}", resolved.rule.as_str());
        println!("match.ordinal: {}", card.ordinal_index);
        println!("match.card_key: {}", or_none(&card.card_key));
        println!(
            "match.id: {}",
            card.explicit_id.as_deref().unwrap_or("<none>")
        );
        println!("match.title: {}", card.title.as_deref().unwrap_or("<none>"));
        println!("href: {}", deep_link_href(&page.page_key, &card.card_key));
    }
    print_diagnostics(runtime, &paths);
    Ok(ExitCode::SUCCESS)
}

fn run_search(runtime: &RuntimeOptions, args: SearchArgs) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let config = load_config(&paths.config_path)?;
    let catalog = load_catalog_with(&paths, &config)?;
    let hits = search_catalog(&args.query, &catalog, &config.search, args.limit);

    println!("query: {}", args.query);
    println!("hits.count: {}", hits.len());
    if catalog.is_empty() {
        println!("catalog: <empty> (run `cardtool catalog sync`)");
    }
    for hit in &hits {
        println!(
            "{:>3}  {}  [{}]  {}",
            hit.score,
            hit.title,
            or_none(hit.category),
            hit.href
        );
    }
    print_diagnostics(runtime, &paths);
    Ok(())
}

fn load_catalog(paths: &ResolvedPaths) -> Result<Catalog> {
    let config = load_config(&paths.config_path)?;
    load_catalog_with(paths, &config)
}

fn load_catalog_with(paths: &ResolvedPaths, config: &CardConfig) -> Result<Catalog> {
    Ok(open_catalog_store(paths, config)?.load())
}

fn audit_scan_options(config: &CardConfig) -> ScanOptions {
    ScanOptions {
        recursive: config.audit.recursive,
        exclude: config.audit.exclude.clone(),
    }
}

fn print_scan_stats(prefix: &str, stats: &ScanStats) {
    println!("{prefix}.total_pages: {}", stats.total_pages);
    println!("{prefix}.excluded_pages: {}", stats.excluded_pages);
    println!("{prefix}.total_bytes: {}", stats.total_bytes);
}

fn print_diagnostics(runtime: &RuntimeOptions, paths: &ResolvedPaths) {
    if runtime.diagnostics {
        println!("\n[diagnostics]\n{}", paths.diagnostics());
    }
}

fn resolve_runtime_paths(runtime: &RuntimeOptions) -> Result<ResolvedPaths> {
    dotenvy::dotenv().ok();

    let context = ResolutionContext::from_process()?;
    let overrides = PathOverrides {
        project_root: runtime.project_root.clone(),
        data_dir: runtime.data_dir.clone(),
        config: runtime.config.clone(),
    };

    let initial = resolve_paths(&context, &overrides)?;
    let project_env = initial.project_root.join(".env");
    if project_env.exists() {
        let _ = dotenvy::from_path_override(&project_env);
    }

    let paths = resolve_paths(&context, &overrides)?;
    debug!(
        project_root = %normalize_path(&paths.project_root),
        source = paths.root_source.as_str(),
        "resolved runtime paths"
    );
    Ok(paths)
}

fn normalize_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn format_flag(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}

fn or_none(value: &str) -> &str {
    if value.is_empty() { "<none>" } else { value }
}
