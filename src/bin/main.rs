//! Tabula CLI - relationship-aware exports from the entity backend
//!
//! Usage:
//!   tabula export --entity <type> --field <path[=Column]>... [--format csv|json]
//!   tabula export-multi <request.json>
//!   tabula template <list|show|run|save|delete|duplicate|search>
//!   tabula gather <project|task|asset> ...
//!   tabula summary <defects|workspace>
//!   tabula media <download|overlays> <id> [--output <dir>]
//!   tabula fields <type>
//!
//! Examples:
//!   tabula export --entity Project --field Name --field Asset.Name=Asset
//!   tabula --fixture data.json export-multi sheets.json --output out/
//!   tabula gather project 42 43 --no-asset
//!   tabula media download 42 --output media/

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use tabula::aggregate::{Aggregator, CancelSignal, GatherError, ProjectAssembler, TaskAssembler};
use tabula::config::Settings;
use tabula::export::{
    ExportPlanner, ExportRequest, FieldMapping, MultiSheetExportRequest, SheetConfiguration, Workbook,
};
use tabula::fetch::{EntityFetcher, Filters, HttpEntityFetcher, InMemoryFetcher};
use tabula::media::{DownloadReport, HttpMediaSource, MediaDownloader, MediaResult};
use tabula::templates::{ExportTemplateType, SaveTemplateRequest, TemplateConfig, TemplateStore};
use tabula::writer::{default_stem, write_sheet_csv, CsvWriter, JsonWriter, WorkbookWriter};
use tabula::{EntityType, RelationshipCatalog};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tabula")]
#[command(about = "Tabula - relationship-aware tabular exports from the inspection data API")]
#[command(version)]
struct Cli {
    /// Serve entities from a JSON fixture instead of the API
    #[arg(long, global = true)]
    fixture: Option<PathBuf>,

    /// Path to a config file (defaults to TABULA_CONFIG, ./tabula.toml, then the user config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Export one entity type as a single sheet
    Export {
        /// Entity type to export (e.g. Project, Defect)
        #[arg(short, long)]
        entity: String,

        /// Field path, optionally renamed: `Asset.Name=Asset`
        #[arg(short, long = "field", required = true)]
        fields: Vec<String>,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Export several sheets described by a JSON request
    ExportMulti {
        /// Path to a multi-sheet request
        request: PathBuf,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Manage and run saved export templates
    Template {
        #[command(subcommand)]
        command: TemplateCommand,
    },

    /// Gather entity snapshots as JSON
    Gather {
        #[command(subcommand)]
        command: GatherCommand,
    },

    /// Print aggregate counts as JSON
    Summary {
        #[command(subcommand)]
        command: SummaryCommand,
    },

    /// Download media files to disk
    Media {
        #[command(subcommand)]
        command: MediaCommand,
    },

    /// List selectable fields for an entity type
    Fields {
        entity: String,
    },
}

#[derive(clap::Args)]
struct OutputArgs {
    /// Output directory (defaults to the configured export directory)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// File stem (defaults to `<Entity>_<timestamp>`)
    #[arg(short, long)]
    name: Option<String>,

    #[arg(long, default_value = "csv")]
    format: OutputFormat,

    /// Print CSV to stdout instead of writing files
    #[arg(long)]
    stdout: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Csv,
    Json,
}

#[derive(Subcommand)]
enum TemplateCommand {
    /// List saved templates
    List {
        /// Only templates of this kind
        #[arg(long = "type", value_enum)]
        kind: Option<TemplateKind>,
    },
    /// Print a template as JSON
    Show { id: String },
    /// Run a saved template
    Run {
        id: String,

        #[command(flatten)]
        output: OutputArgs,
    },
    /// Save a template from a JSON file (`name`, `description`, `export`)
    Save { file: PathBuf },
    /// Delete a template
    Delete { id: String },
    /// Copy a template under a new id
    Duplicate { id: String },
    /// Search names and descriptions
    Search { term: String },
}

#[derive(Clone, Copy, ValueEnum)]
enum TemplateKind {
    Single,
    Multi,
}

impl From<TemplateKind> for ExportTemplateType {
    fn from(kind: TemplateKind) -> Self {
        match kind {
            TemplateKind::Single => ExportTemplateType::SingleSheet,
            TemplateKind::Multi => ExportTemplateType::MultiSheet,
        }
    }
}

#[derive(Subcommand)]
enum GatherCommand {
    /// Project snapshots, by id or by filter
    Project {
        ids: Vec<String>,

        /// Skip the asset lookup
        #[arg(long)]
        no_asset: bool,

        /// Backend filter `key=value`, used when no ids are given
        #[arg(long = "filter")]
        filters: Vec<String>,

        /// Maximum number of projects matched by filter
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Task snapshots with their project data
    Task {
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// An asset with every project that references it
    Asset { id: String },
}

#[derive(Subcommand)]
enum SummaryCommand {
    /// Defect counts by severity, status and type
    Defects {
        #[arg(long = "filter")]
        filters: Vec<String>,
    },
    /// Workspace, user, project and asset counts
    Workspace,
}

#[derive(Subcommand)]
enum MediaCommand {
    /// Every inspection media file of a project
    Download {
        project_id: String,

        /// Target directory (defaults to `<export dir>/media_<project>`)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Overlay, media and thumbnail images of a defect
    Overlays {
        defect_id: String,

        /// Target directory (defaults to `<export dir>/defect_<id>_images`)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings = match load_settings(cli.config.as_deref()) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            return ExitCode::FAILURE;
        }
    };
    init_tracing(cli.verbose, &settings);

    let catalog = match settings.catalog() {
        Ok(c) => Arc::new(c),
        Err(e) => {
            eprintln!("Error in relationship config: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Commands::Fields { entity } = &cli.command {
        return cmd_fields(&catalog, entity);
    }

    let fetcher = match build_fetcher(cli.fixture.as_deref(), &settings) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let cancel = CancelSignal::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Interrupted, cancelling...");
            on_interrupt.cancel();
        }
    });

    let app = App {
        settings,
        catalog,
        fetcher,
        cancel,
    };

    match cli.command {
        Commands::Export {
            entity,
            fields,
            output,
        } => app.cmd_export(&entity, &fields, &output).await,
        Commands::ExportMulti { request, output } => app.cmd_export_multi(&request, &output).await,
        Commands::Template { command } => app.cmd_template(command).await,
        Commands::Gather { command } => app.cmd_gather(command).await,
        Commands::Summary { command } => app.cmd_summary(command).await,
        Commands::Media { command } => app.cmd_media(command).await,
        Commands::Fields { .. } => ExitCode::SUCCESS,
    }
}

fn load_settings(path: Option<&Path>) -> Result<Settings, tabula::config::SettingsError> {
    match path {
        Some(path) => Settings::from_file(path),
        None => Settings::load(),
    }
}

/// `-v` wins, then `RUST_LOG`, then the configured filter, then `warn`.
fn init_tracing(verbose: bool, settings: &Settings) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(settings.logging.filter.as_deref().unwrap_or("warn"))
        })
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn build_fetcher(fixture: Option<&Path>, settings: &Settings) -> Result<Arc<dyn EntityFetcher>, String> {
    if let Some(path) = fixture {
        let content = fs::read_to_string(path)
            .map_err(|e| format!("reading fixture '{}': {}", path.display(), e))?;
        let json: serde_json::Value = serde_json::from_str(&content)
            .map_err(|e| format!("parsing fixture '{}': {}", path.display(), e))?;
        let fetcher = InMemoryFetcher::from_json(json)
            .map_err(|e| format!("loading fixture '{}': {}", path.display(), e))?;
        return Ok(Arc::new(fetcher));
    }

    let fetcher = HttpEntityFetcher::new(&settings.api).map_err(|e| e.to_string())?;
    Ok(Arc::new(fetcher))
}

fn cmd_fields(catalog: &RelationshipCatalog, entity: &str) -> ExitCode {
    let entity_type = EntityType::new(entity);
    if !catalog.is_entity_type(entity_type.as_str()) {
        eprintln!("Unknown entity type: {}", entity);
        return ExitCode::FAILURE;
    }

    println!("Fields for {}:", entity_type);
    for field in catalog.available_fields(entity_type.as_str()) {
        match &field.description {
            Some(description) => println!("  {:<32} {}", field.field_path, description),
            None => println!("  {}", field.field_path),
        }
    }
    ExitCode::SUCCESS
}

/// Parse `path[=Column]` into a mapping.
fn parse_field(spec: &str) -> FieldMapping {
    match spec.split_once('=') {
        Some((path, column)) if !column.trim().is_empty() => {
            FieldMapping::new(path.trim()).with_column(column.trim())
        }
        Some((path, _)) => FieldMapping::new(path.trim()),
        None => FieldMapping::new(spec.trim()),
    }
}

fn parse_filters(specs: &[String]) -> Result<Filters, String> {
    let mut filters = Filters::new();
    for spec in specs {
        let (key, value) = spec
            .split_once('=')
            .ok_or_else(|| format!("filter '{}' must be key=value", spec))?;
        filters.insert(key.trim().to_string(), value.trim().to_string());
    }
    Ok(filters)
}

fn print_json<T: serde::Serialize>(value: &T) -> ExitCode {
    match serde_json::to_string_pretty(value) {
        Ok(json) => {
            println!("{}", json);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error encoding output: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn report_gather_error(e: &GatherError) -> ExitCode {
    eprintln!("Gather error: {}", e);
    for failure in e.failures() {
        eprintln!("  [{}] {}: {}", failure.index, failure.root_id, failure.error);
    }
    ExitCode::FAILURE
}

struct App {
    settings: Settings,
    catalog: Arc<RelationshipCatalog>,
    fetcher: Arc<dyn EntityFetcher>,
    cancel: CancelSignal,
}

impl App {
    fn planner(&self) -> ExportPlanner {
        ExportPlanner::new(self.fetcher.clone(), self.catalog.clone()).with_cancel(self.cancel.clone())
    }

    fn aggregator(&self) -> Aggregator {
        Aggregator::new(self.fetcher.clone())
            .with_max_concurrency(self.settings.aggregation.max_concurrency)
            .with_cancel(self.cancel.clone())
    }

    fn media_downloader(&self) -> Result<MediaDownloader, String> {
        let source = HttpMediaSource::new(self.settings.media.timeout()).map_err(|e| e.to_string())?;
        Ok(MediaDownloader::new(self.fetcher.clone(), Arc::new(source))
            .with_max_concurrency(self.settings.media.max_concurrency)
            .with_cancel(self.cancel.clone()))
    }

    fn open_templates(&self) -> Result<TemplateStore, String> {
        let path = self.settings.templates.resolved_path().map_err(|e| e.to_string())?;
        TemplateStore::open(path).map_err(|e| e.to_string())
    }

    async fn cmd_export(&self, entity: &str, fields: &[String], output: &OutputArgs) -> ExitCode {
        let request = ExportRequest::new(entity, fields.iter().map(|f| parse_field(f)).collect());
        self.run_single(request, output).await
    }

    async fn run_single(&self, request: ExportRequest, output: &OutputArgs) -> ExitCode {
        let config = SheetConfiguration::from(request);
        match self.planner().plan_single_sheet(&config).await {
            Ok(sheet) => {
                let stem = default_stem(sheet.entity_type.as_str());
                self.emit(&Workbook::from(sheet), &stem, output)
            }
            Err(e) => {
                eprintln!("Export error: {}", e);
                ExitCode::FAILURE
            }
        }
    }

    async fn cmd_export_multi(&self, path: &Path, output: &OutputArgs) -> ExitCode {
        let content = match fs::read_to_string(path) {
            Ok(s) => s,
            Err(e) => {
                eprintln!("Error reading file '{}': {}", path.display(), e);
                return ExitCode::FAILURE;
            }
        };

        let mut json: serde_json::Value = match serde_json::from_str(&content) {
            Ok(v) => v,
            Err(e) => {
                eprintln!("Error parsing request '{}': {}", path.display(), e);
                return ExitCode::FAILURE;
            }
        };

        // An absent flag takes the configured default
        if let Some(object) = json.as_object_mut() {
            if !object.contains_key("link_related_data") && !object.contains_key("linkRelatedData") {
                object.insert(
                    "link_related_data".to_string(),
                    serde_json::Value::Bool(self.settings.export.link_related_data),
                );
            }
        }

        match serde_json::from_value::<MultiSheetExportRequest>(json) {
            Ok(request) => self.run_multi(request, output).await,
            Err(e) => {
                eprintln!("Error parsing request '{}': {}", path.display(), e);
                ExitCode::FAILURE
            }
        }
    }

    async fn run_multi(&self, request: MultiSheetExportRequest, output: &OutputArgs) -> ExitCode {
        match self.planner().plan_multi_sheet(&request).await {
            Ok(workbook) => self.emit(&workbook, &default_stem("Export"), output),
            Err(e) => {
                eprintln!("Export error: {}", e);
                ExitCode::FAILURE
            }
        }
    }

    fn emit(&self, workbook: &Workbook, default: &str, output: &OutputArgs) -> ExitCode {
        if output.stdout {
            for sheet in &workbook.sheets {
                if workbook.len() > 1 {
                    println!("# {}", sheet.name);
                }
                if let Err(e) = write_sheet_csv(sheet, std::io::stdout().lock()) {
                    eprintln!("Error writing output: {}", e);
                    return ExitCode::FAILURE;
                }
            }
            return ExitCode::SUCCESS;
        }

        let dir = output
            .output
            .clone()
            .unwrap_or_else(|| self.settings.export.output_dir.clone());
        let stem = output.name.as_deref().unwrap_or(default);

        let written = match output.format {
            OutputFormat::Csv => CsvWriter.write(workbook, &dir, stem),
            OutputFormat::Json => JsonWriter.write(workbook, &dir, stem),
        };

        match written {
            Ok(paths) => {
                for path in paths {
                    println!("{}", path.display());
                }
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("Error writing output: {}", e);
                ExitCode::FAILURE
            }
        }
    }

    async fn cmd_template(&self, command: TemplateCommand) -> ExitCode {
        let mut store = match self.open_templates() {
            Ok(store) => store,
            Err(e) => {
                eprintln!("Error opening templates: {}", e);
                return ExitCode::FAILURE;
            }
        };

        match command {
            TemplateCommand::List { kind } => {
                let summaries: Vec<_> = match kind {
                    Some(kind) => store.by_type(kind.into()).into_iter().map(|t| t.summary()).collect(),
                    None => store.summaries(),
                };
                if summaries.is_empty() {
                    println!("No templates in {}", store.path().display());
                }
                for summary in summaries {
                    println!(
                        "{}  {:<24} {:<12} {} ({} fields)",
                        summary.id, summary.name, summary.template_type, summary.entity_types, summary.field_count
                    );
                }
                ExitCode::SUCCESS
            }
            TemplateCommand::Show { id } => match store.get(&id) {
                Some(template) => print_json(template),
                None => {
                    eprintln!("Template not found: {}", id);
                    ExitCode::FAILURE
                }
            },
            TemplateCommand::Run { id, output } => {
                let Some(template) = store.get(&id) else {
                    eprintln!("Template not found: {}", id);
                    return ExitCode::FAILURE;
                };
                tracing::info!(template = %template.name, "running template");
                match template.export.clone() {
                    TemplateConfig::SingleSheet(request) => self.run_single(request, &output).await,
                    TemplateConfig::MultiSheet(request) => self.run_multi(request, &output).await,
                }
            }
            TemplateCommand::Save { file } => {
                let request: SaveTemplateRequest = match fs::read_to_string(&file)
                    .map_err(|e| e.to_string())
                    .and_then(|s| serde_json::from_str(&s).map_err(|e| e.to_string()))
                {
                    Ok(r) => r,
                    Err(e) => {
                        eprintln!("Error reading template '{}': {}", file.display(), e);
                        return ExitCode::FAILURE;
                    }
                };
                match store.save(request, &current_user()) {
                    Ok(template) => {
                        println!("{}", template.id);
                        ExitCode::SUCCESS
                    }
                    Err(e) => {
                        eprintln!("Error saving template: {}", e);
                        ExitCode::FAILURE
                    }
                }
            }
            TemplateCommand::Delete { id } => match store.delete(&id) {
                Ok(true) => ExitCode::SUCCESS,
                Ok(false) => {
                    eprintln!("Template not found: {}", id);
                    ExitCode::FAILURE
                }
                Err(e) => {
                    eprintln!("Error deleting template: {}", e);
                    ExitCode::FAILURE
                }
            },
            TemplateCommand::Duplicate { id } => match store.duplicate(&id, &current_user()) {
                Ok(template) => {
                    println!("{}", template.id);
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    eprintln!("Error duplicating template: {}", e);
                    ExitCode::FAILURE
                }
            },
            TemplateCommand::Search { term } => {
                for template in store.search(&term) {
                    println!("{}  {}", template.id, template.name);
                }
                ExitCode::SUCCESS
            }
        }
    }

    async fn cmd_gather(&self, command: GatherCommand) -> ExitCode {
        let aggregator = self.aggregator();

        match command {
            GatherCommand::Project {
                ids,
                no_asset,
                filters,
                limit,
            } => {
                let assembler = if no_asset {
                    ProjectAssembler::without_asset()
                } else {
                    ProjectAssembler::new()
                };

                let result = if ids.is_empty() {
                    let filters = match parse_filters(&filters) {
                        Ok(f) => f,
                        Err(e) => {
                            eprintln!("Error: {}", e);
                            return ExitCode::FAILURE;
                        }
                    };
                    aggregator.gather_by_filter(&filters, &assembler, limit).await
                } else {
                    aggregator.gather_many(&ids, &assembler).await
                };

                match result {
                    Ok(snapshots) => print_json(&snapshots),
                    Err(e) => report_gather_error(&e),
                }
            }
            GatherCommand::Task { ids } => match aggregator.gather_many(&ids, &TaskAssembler).await {
                Ok(snapshots) => print_json(&snapshots),
                Err(e) => report_gather_error(&e),
            },
            GatherCommand::Asset { id } => match aggregator.gather_asset(&id).await {
                Ok(snapshot) => print_json(&snapshot),
                Err(e) => report_gather_error(&e),
            },
        }
    }

    async fn cmd_summary(&self, command: SummaryCommand) -> ExitCode {
        let aggregator = self.aggregator();

        match command {
            SummaryCommand::Defects { filters } => {
                let filters = match parse_filters(&filters) {
                    Ok(f) => f,
                    Err(e) => {
                        eprintln!("Error: {}", e);
                        return ExitCode::FAILURE;
                    }
                };
                match aggregator.defects_summary(&filters).await {
                    Ok(summary) => print_json(&summary),
                    Err(e) => report_gather_error(&e),
                }
            }
            SummaryCommand::Workspace => match aggregator.workspace_summary().await {
                Ok(summary) => print_json(&summary),
                Err(e) => report_gather_error(&e),
            },
        }
    }

    async fn cmd_media(&self, command: MediaCommand) -> ExitCode {
        let downloader = match self.media_downloader() {
            Ok(d) => d,
            Err(e) => {
                eprintln!("Error: {}", e);
                return ExitCode::FAILURE;
            }
        };
        let export_dir = &self.settings.export.output_dir;

        match command {
            MediaCommand::Download { project_id, output } => {
                let dir = output.unwrap_or_else(|| export_dir.join(format!("media_{}", project_id)));
                report_media(downloader.download_project_media(&project_id, &dir).await)
            }
            MediaCommand::Overlays { defect_id, output } => {
                let dir = output.unwrap_or_else(|| export_dir.join(format!("defect_{}_images", defect_id)));
                report_media(downloader.download_defect_overlays(&defect_id, &dir).await)
            }
        }
    }
}

/// Print written paths; failures go to stderr without failing the command.
fn report_media(result: MediaResult<DownloadReport>) -> ExitCode {
    match result {
        Ok(report) => {
            for path in &report.downloaded {
                println!("{}", path.display());
            }
            for failure in &report.failed {
                eprintln!("  skipped {}: {}", failure.url, failure.error);
            }
            if report.skipped > 0 {
                eprintln!("  {} media records had no download url", report.skipped);
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Media error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn current_user() -> String {
    std::env::var("USER").unwrap_or_else(|_| "cli".to_string())
}
