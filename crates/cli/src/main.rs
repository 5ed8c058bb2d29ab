//! WcMerge command-line tool.
//!
//! Merges incoming changes into versioned working files, registers and
//! inspects entries in the SQLite entry store, manages directory locks, and
//! generates / validates configuration files.

mod style;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};
use tracing_subscriber::EnvFilter;

use wcmerge_core::models::Entry;
use wcmerge_core::store::{conflict_files_present, entry_dir, DirLock};
use wcmerge_core::{
    EntryDb, EntryStore, MergeConfig, MergeOrchestrator, MergeOutcome, MergeRequest, OsFs,
    WcAccess,
};

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// Three-way merge of versioned working files.
#[derive(Parser, Debug)]
#[command(name = "wcmerge", version, about = "Merge incoming changes into working files")]
struct Cli {
    /// Path to the TOML configuration file
    /// (default: the user config directory's wcmerge/config.toml, if present).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Entry database, overriding `[store] path`.
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Merge the changes between LEFT and RIGHT into TARGET.
    Merge(MergeArgs),

    /// Register or inspect versioned entries.
    Entry {
        #[command(subcommand)]
        action: EntryAction,
    },

    /// Acquire the advisory lock of a directory and print its token.
    Lock {
        dir: PathBuf,
    },

    /// Release a directory lock.
    Unlock {
        dir: PathBuf,

        /// Token printed by `wcmerge lock`.
        #[arg(long)]
        token: String,
    },

    /// Generate a default configuration file.
    Init {
        /// Output path for the generated config file.
        #[arg(short, long, default_value = "./wcmerge.toml")]
        output: PathBuf,
    },

    /// Validate a configuration file.
    Validate,
}

#[derive(Args, Debug)]
struct MergeArgs {
    /// Base revision of the file.
    left: PathBuf,
    /// Incoming revision of the file.
    right: PathBuf,
    /// Locally modified working file.
    target: PathBuf,

    #[arg(long)]
    left_label: Option<String>,
    #[arg(long)]
    right_label: Option<String>,
    #[arg(long)]
    target_label: Option<String>,

    /// Report the outcome without touching any file or metadata.
    #[arg(long)]
    dry_run: bool,

    /// External diff3 program (overrides `[merge] diff3_cmd`).
    #[arg(long)]
    diff3_cmd: Option<PathBuf>,

    /// Option passed to the diff engine; repeatable.
    #[arg(short = 'x', long = "option", allow_hyphen_values = true)]
    options: Vec<String>,
}

#[derive(Subcommand, Debug)]
enum EntryAction {
    /// Register (or overwrite) the entry of a file.
    Add {
        path: PathBuf,

        /// Last-changed revision.
        #[arg(short, long)]
        rev: i64,

        #[arg(long)]
        author: Option<String>,

        /// Last-changed date as it should appear in keywords.
        #[arg(long)]
        date: Option<String>,

        #[arg(long)]
        url: Option<String>,

        /// Repository lock token held for the file.
        #[arg(long)]
        lock_token: Option<String>,

        /// Versioned property as NAME=VALUE; repeatable.
        #[arg(short, long = "prop", value_parser = parse_prop)]
        props: Vec<(String, String)>,
    },

    /// Show the entry of a file.
    Show {
        path: PathBuf,

        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
}

fn parse_prop(s: &str) -> Result<(String, String), String> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got '{s}'"))?;
    if name.is_empty() {
        return Err("property name must not be empty".into());
    }
    Ok((name.to_string(), value.to_string()))
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return ExitCode::from(2);
        }
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log.level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();

    match run(cli, config) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(2)
        }
    }
}

fn run(cli: Cli, mut config: MergeConfig) -> Result<ExitCode> {
    if let Some(db) = &cli.db {
        config.store.path = db.clone();
    }

    match cli.command {
        Commands::Init { output } => cmd_init(&output).map(|()| ExitCode::SUCCESS),
        Commands::Validate => cmd_validate(cli.config.as_deref(), &config).map(|()| ExitCode::SUCCESS),
        command => {
            let db = open_database(&config)?;
            match command {
                Commands::Merge(args) => cmd_merge(&db, &config, args),
                Commands::Entry { action } => cmd_entry(&db, action).map(|()| ExitCode::SUCCESS),
                Commands::Lock { dir } => cmd_lock(&db, &dir).map(|()| ExitCode::SUCCESS),
                Commands::Unlock { dir, token } => {
                    cmd_unlock(&db, &dir, &token).map(|()| ExitCode::SUCCESS)
                }
                Commands::Init { .. } | Commands::Validate => Ok(ExitCode::SUCCESS),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Config helpers
// ---------------------------------------------------------------------------

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("wcmerge").join("config.toml"))
}

/// Load the explicit config, else the default one if it exists, else
/// built-in defaults.
fn load_config(explicit: Option<&Path>) -> Result<MergeConfig> {
    if let Some(path) = explicit {
        return MergeConfig::load_and_validate(path).context("failed to load configuration file");
    }
    match default_config_path().filter(|p| p.exists()) {
        Some(path) => MergeConfig::load_and_validate(&path)
            .with_context(|| format!("failed to load {}", path.display())),
        None => Ok(MergeConfig::default()),
    }
}

fn open_database(config: &MergeConfig) -> Result<EntryDb> {
    let path = &config.store.path;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let db = EntryDb::new(path).context("failed to open entry store")?;
    db.initialize().context("failed to initialize entry store")?;
    Ok(db)
}

/// Absolute form of `path` with `.` components removed, so the same file
/// maps to the same entry regardless of the current directory.
fn wc_path(path: &Path) -> Result<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .context("failed to read current directory")?
            .join(path)
    };
    Ok(absolute.components().collect())
}

// ---------------------------------------------------------------------------
// Subcommand implementations
// ---------------------------------------------------------------------------

fn cmd_merge(db: &EntryDb, config: &MergeConfig, args: MergeArgs) -> Result<ExitCode> {
    let target = wc_path(&args.target)?;
    let dir = entry_dir(&target);

    let mut request = MergeRequest::new(&args.left, &args.right, &target)
        .with_labels(
            args.left_label.as_deref(),
            args.right_label.as_deref(),
            args.target_label.as_deref(),
        )
        .dry_run(args.dry_run)
        .with_options(args.options);
    if let Some(cmd) = args.diff3_cmd {
        request = request.with_diff3_cmd(cmd);
    }

    let access = WcAccess::open(db, &dir)
        .with_context(|| format!("failed to lock {}", dir.display()))?;
    let result = MergeOrchestrator::from_config(&OsFs, config).merge(&request, &access);
    access
        .close()
        .with_context(|| format!("failed to unlock {}", dir.display()))?;
    let outcome = result.context("merge failed")?;

    let shown = args.target.display().to_string();
    println!("{}", style::outcome(outcome, &shown));
    if args.dry_run {
        println!("{}", style::dim("(dry run, nothing written)"));
    }

    Ok(match outcome {
        MergeOutcome::Conflicted => ExitCode::from(1),
        _ => ExitCode::SUCCESS,
    })
}

fn cmd_entry(db: &EntryDb, action: EntryAction) -> Result<()> {
    match action {
        EntryAction::Add {
            path,
            rev,
            author,
            date,
            url,
            lock_token,
            props,
        } => {
            let path = wc_path(&path)?;
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .context("path has no file name")?;
            let mut entry = Entry::new(name, rev);
            entry.last_author = author;
            entry.changed_date = date;
            entry.url = url;
            entry.lock_token = lock_token;
            entry.props = props.into_iter().collect();

            db.put_entry(&path, &entry).context("failed to store entry")?;
            println!(
                "{}",
                style::success(&format!("registered {} at r{}", path.display(), rev))
            );
            Ok(())
        }
        EntryAction::Show { path, json } => {
            let path = wc_path(&path)?;
            let entry = db
                .entry(&path)
                .context("failed to read entry")?
                .with_context(|| format!("{} is not under version control", path.display()))?;

            if json {
                println!("{}", serde_json::to_string_pretty(&entry)?);
                return Ok(());
            }

            let conflicted = conflict_files_present(&path, &entry);

            println!();
            println!("{}", style::header(&path.display().to_string()));
            println!();
            print_entry(&entry, conflicted);
            Ok(())
        }
    }
}

fn print_entry(entry: &Entry, conflicted: bool) {
    let dash = || "—".to_string();

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Field", "Value"]);

    let rows = [
        ("Name", entry.name.clone()),
        ("Revision", format!("r{}", entry.revision)),
        ("Last author", entry.last_author.clone().unwrap_or_else(dash)),
        ("Changed", entry.changed_date.clone().unwrap_or_else(dash)),
        ("URL", entry.url.clone().unwrap_or_else(dash)),
        ("Lock token", entry.lock_token.clone().unwrap_or_else(dash)),
        ("conflict_old", entry.conflict.conflict_old.clone().unwrap_or_else(dash)),
        ("conflict_new", entry.conflict.conflict_new.clone().unwrap_or_else(dash)),
        ("conflict_wrk", entry.conflict.conflict_wrk.clone().unwrap_or_else(dash)),
    ];
    for (field, value) in rows {
        table.add_row(vec![Cell::new(field), Cell::new(value)]);
    }
    for (prop, value) in &entry.props {
        table.add_row(vec![Cell::new(prop), Cell::new(value)]);
    }
    println!("{}", table);
    println!();

    if conflicted {
        println!("{}", style::warn("text conflict: backup files present"));
        println!();
    }
}

fn cmd_lock(db: &EntryDb, dir: &Path) -> Result<()> {
    let dir = wc_path(dir)?;
    let lock = db
        .lock_dir(&dir)
        .with_context(|| format!("failed to lock {}", dir.display()))?;
    println!("{}", style::success(&format!("locked {}", dir.display())));
    println!("{}", lock.token);
    Ok(())
}

fn cmd_unlock(db: &EntryDb, dir: &Path, token: &str) -> Result<()> {
    let dir = wc_path(dir)?;
    let token = token.parse().context("invalid lock token")?;
    db.unlock_dir(&DirLock {
        dir: dir.clone(),
        token,
    })
    .with_context(|| format!("failed to unlock {}", dir.display()))?;
    println!("{}", style::success(&format!("unlocked {}", dir.display())));
    Ok(())
}

fn cmd_init(output: &Path) -> Result<()> {
    if output.exists() {
        anyhow::bail!(
            "file already exists: {}. Use a different path or remove the existing file.",
            output.display()
        );
    }

    let body = MergeConfig::default()
        .to_toml_string()
        .context("failed to render default configuration")?;
    let contents = format!(
        "# WcMerge configuration\n\
         #\n\
         # [merge] diff3_cmd = \"/usr/bin/diff3\" selects an external diff3;\n\
         # without it the internal engine is used.\n\n{body}"
    );
    std::fs::write(output, contents).context("failed to write config file")?;

    println!(
        "{}",
        style::success(&format!("Default configuration written to {}", output.display()))
    );
    println!(
        "{}",
        style::dim(&format!("Validate with: wcmerge validate --config {}", output.display()))
    );
    Ok(())
}

fn cmd_validate(path: Option<&Path>, config: &MergeConfig) -> Result<()> {
    // The config was already loaded and validated on startup.
    match path {
        Some(path) => println!("{}", style::success(&format!("{} is valid", path.display()))),
        None => println!("{}", style::success("no config file given; defaults are valid")),
    }
    let diff3 = config
        .merge
        .diff3_cmd
        .as_ref()
        .map_or_else(|| "internal".to_string(), |c| c.display().to_string());

    println!();
    println!("  diff3 command   : {}", diff3);
    println!("  diff3 options   : {}", config.merge.diff3_options.join(" "));
    println!("  show original   : {}", config.merge.display_original);
    println!("  scratch dir     : {}", config.merge.scratch_dir().display());
    println!("  entry store     : {}", config.store.path.display());
    println!("  log level       : {}", config.log.level);
    Ok(())
}
