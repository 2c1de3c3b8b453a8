//! The `load` command-line surface.
//!
//! Flags override configuration-file values; the password falls back to the
//! `NEO_PASSWORD` environment variable. Destructive runs ask for
//! confirmation unless `--yes` is given.

use std::io::{self, Write as _};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::str::FromStr;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};

use crate::backup::Neo4jAdminBackup;
use crate::config::{self, LoadMode, LoaderConfig};
use crate::graph::{BoltGraph, MemoryGraph};
use crate::loader::DataLoader;
use crate::plugin::PluginRegistry;
use crate::schema::SchemaModel;
use crate::validation::ValidationReporter;

fn parse_mode(s: &str) -> Result<LoadMode, String> {
    LoadMode::from_str(s)
}

/// Load tab-separated dataset files into a property graph.
#[derive(Parser, Debug)]
#[command(name = "graph-loader", version)]
pub struct LoadArgs {
    /// Database URI like bolt://12.34.56.78:7687
    #[arg(short = 'i', long)]
    pub uri: Option<String>,

    /// Database user
    #[arg(short, long)]
    pub user: Option<String>,

    /// Database password (falls back to the NEO_PASSWORD env var)
    #[arg(short, long)]
    pub password: Option<String>,

    /// Schema model files, repeatable, fed as a sequence
    #[arg(short = 's', long = "schema")]
    pub schema: Vec<PathBuf>,

    /// Properties file with id fields, indexes and loader settings
    #[arg(long)]
    pub prop_file: Option<PathBuf>,

    /// Version recorded in the validation log banner
    #[arg(long)]
    pub data_model_version: Option<String>,

    /// Directory holding the dataset's .txt/.tsv files
    #[arg(long)]
    pub dataset: Option<PathBuf>,

    /// Loading mode: upsert, new or delete
    #[arg(short, long, value_parser = parse_mode)]
    pub mode: Option<LoadMode>,

    /// Skip all validations
    #[arg(short = 'c', long)]
    pub cheat_mode: bool,

    /// Validations only, skip loading
    #[arg(short = 'd', long)]
    pub dry_run: bool,

    /// Wipe out the database before loading; you'll lose all data
    #[arg(long)]
    pub wipe_db: bool,

    /// Skip the backup step
    #[arg(long)]
    pub no_backup: bool,

    /// Where to store the database backup
    #[arg(long)]
    pub backup_folder: Option<PathBuf>,

    /// Commit every 1000 rows instead of once per pass
    #[arg(long)]
    pub split_transactions: bool,

    /// Maximum validation errors reported per file
    #[arg(short = 'M', long)]
    pub max_violations: Option<usize>,

    /// Automatically confirm deletion and database wiping
    #[arg(short, long)]
    pub yes: bool,

    /// Configuration file
    pub config_file: Option<PathBuf>,
}

/// Entry point for the binary.
pub fn run() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
    let args = LoadArgs::parse();
    match execute(args) {
        Ok(code) => code,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn apply_overrides(config: &mut LoaderConfig, args: &LoadArgs) {
    if let Some(uri) = &args.uri {
        config.neo4j.uri = Some(uri.clone());
    }
    if let Some(user) = &args.user {
        config.neo4j.user = Some(user.clone());
    }
    if let Some(password) = &args.password {
        config.neo4j.password = Some(password.clone());
    }
    if !args.schema.is_empty() {
        config.schema = args.schema.clone();
    }
    if let Some(prop_file) = &args.prop_file {
        config.prop_file = Some(prop_file.clone());
    }
    if let Some(version) = &args.data_model_version {
        config.data_model_version = Some(version.clone());
    }
    if let Some(dataset) = &args.dataset {
        config.dataset = Some(dataset.clone());
    }
    if let Some(mode) = args.mode {
        config.options.mode = mode;
    }
    if args.cheat_mode {
        config.options.cheat_mode = true;
    }
    if args.dry_run {
        config.options.dry_run = true;
    }
    if args.wipe_db {
        config.options.wipe_db = true;
    }
    if args.no_backup {
        config.options.no_backup = true;
    }
    if let Some(folder) = &args.backup_folder {
        config.options.backup_folder = Some(folder.clone());
    }
    if args.split_transactions {
        config.options.split_transactions = true;
    }
    if let Some(max) = args.max_violations {
        config.options.max_violations = max;
    }
    if args.yes {
        config.options.yes = true;
    }
}

/// All .txt/.tsv files of the dataset directory, sorted by name.
fn dataset_files(dataset: &Path) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dataset)? {
        let path = entry?.path();
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();
        if path.is_file() && matches!(extension.as_str(), "txt" | "tsv") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn confirm(message: &str) -> io::Result<bool> {
    println!("{message}");
    print!("Type \"yes\" and press enter to proceed (you'll LOSE DATA!), press enter to cancel: ");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(line.trim().eq_ignore_ascii_case("yes"))
}

fn execute(args: LoadArgs) -> anyhow::Result<ExitCode> {
    let mut config = match &args.config_file {
        Some(path) => LoaderConfig::from_file(path)?,
        None => LoaderConfig::default(),
    };
    apply_overrides(&mut config, &args);

    let dataset = config
        .dataset
        .clone()
        .context("no dataset directory specified, use --dataset or the config file")?;
    anyhow::ensure!(dataset.is_dir(), "{} is not a directory", dataset.display());
    let prop_file = config
        .prop_file
        .clone()
        .context("no properties file specified, use --prop-file or the config file")?;
    anyhow::ensure!(
        !config.schema.is_empty(),
        "no schema file specified, use --schema or the config file"
    );

    if config.neo4j.password.is_none() {
        if let Ok(password) = std::env::var(config::PASSWORD_ENV) {
            config.neo4j.password = Some(password);
        }
    }
    config.options.validate()?;

    let files = dataset_files(&dataset)?;
    if files.is_empty() {
        info!("no files to load");
        return Ok(ExitCode::SUCCESS);
    }

    if config.options.wipe_db
        && !config.options.yes
        && !confirm("Wipe out the entire database before loading?")?
    {
        return Ok(ExitCode::FAILURE);
    }
    if config.options.mode == LoadMode::Delete
        && !config.options.yes
        && !confirm("Delete all nodes and child nodes named by the data files?")?
    {
        return Ok(ExitCode::FAILURE);
    }

    let mut schema_files = config.schema.clone();
    schema_files.push(prop_file);
    let schema = SchemaModel::from_files(&schema_files)?;

    let log_path = PathBuf::from("tmp_validation").join(format!(
        "validation_{}.log",
        chrono::Utc::now().format("%Y%m%d_%H%M%S")
    ));
    let mut reporter = ValidationReporter::to_path(&log_path)?;
    let version = config
        .data_model_version
        .clone()
        .unwrap_or_else(|| "unspecified".to_string());
    reporter.write_banner(&version, &files)?;

    let registry = PluginRegistry::new();
    let plugins = registry.build(&config.plugins)?;

    let uri = config
        .neo4j
        .uri
        .clone()
        .unwrap_or_else(|| "bolt://localhost:7687".to_string());
    let user = config
        .neo4j
        .user
        .clone()
        .unwrap_or_else(|| "neo4j".to_string());

    let mut loader = DataLoader::new(&schema)
        .with_plugins(plugins)
        .with_backup(Box::new(Neo4jAdminBackup::new(&uri)));

    let report = if config.options.dry_run {
        let mut store = MemoryGraph::new();
        loader.load(&mut store, &files, &config.options, &mut reporter)?
    } else {
        info!(uri = %uri, "loading into graph database");
        let password = config.neo4j.password.clone().with_context(|| {
            format!(
                "password not specified, use --password or set {}",
                config::PASSWORD_ENV
            )
        })?;
        let mut store = BoltGraph::connect(&uri, &user, &password)?;
        loader.load(&mut store, &files, &config.options, &mut reporter)?
    };
    reporter.done()?;

    println!();
    println!("Load complete in {:.2}s", report.duration.as_secs_f64());
    println!("  nodes created:         {}", report.counters.nodes_created);
    println!(
        "  relationships created: {}",
        report.counters.relationships_created
    );
    println!("  nodes deleted:         {}", report.counters.nodes_deleted);
    println!("  indexes created:       {}", report.indexes_created);
    println!("  validation log:        {}", log_path.display());
    if let Some(restore) = &report.restore_command {
        println!();
        println!("{restore}");
    }
    Ok(ExitCode::SUCCESS)
}
