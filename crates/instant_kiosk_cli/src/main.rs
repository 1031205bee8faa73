//! Command line front end of the Instant kiosk client.
//!
//! # Responsibility
//! - Store the connection preferences (`login`/`logout`).
//! - Show the cached catalog and refresh it from the server.
//! - Fetch a fresh sync token for one document.

use clap::{Parser, Subcommand};
use instant_kiosk_core::config::preferences::ConnectionPreferences;
use instant_kiosk_core::{
    default_log_level, init_logging, CatalogApi, CatalogRefresher, CatalogView,
    DescriptorStore, DocumentDescriptor, LocalSyncStorage, Notice, PreferencesStore,
    WebCatalogClient,
};
use log::{info, warn};
use std::error::Error;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

type CliResult<T> = Result<T, Box<dyn Error>>;

#[derive(Parser)]
#[command(name = "instant-kiosk", about = "Instant kiosk catalog client", version)]
struct Cli {
    /// Directory holding preferences, the catalog cache and logs
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Log level (trace|debug|info|warn|error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Output format for document listings
    #[arg(long, global = true, default_value = "plain")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
enum OutputFormat {
    Plain,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Remember the example server and user name
    Login {
        /// Example server URL, e.g. http://10.0.2.2:3000
        server_url: String,
        /// User name sent as Basic credentials
        username: String,
    },

    /// Forget the connection and delete the catalog cache
    Logout,

    /// Show connection settings and cache state
    Status,

    /// List documents from the local cache
    List,

    /// Show the cached catalog, then fetch and store the live one
    Refresh,

    /// Fetch a fresh sync token for a document
    Token {
        /// Document id
        document_id: String,
    },
}

struct Paths {
    preferences: PreferencesStore,
    descriptors: DescriptorStore,
}

impl Paths {
    fn new(data_dir: &Path) -> Self {
        Self {
            preferences: PreferencesStore::in_dir(data_dir),
            descriptors: DescriptorStore::in_dir(data_dir),
        }
    }
}

/// Prints each catalog snapshot as it arrives.
struct StdoutCatalogView {
    snapshots: AtomicUsize,
    format: OutputFormat,
}

impl CatalogView for StdoutCatalogView {
    fn show_documents(&self, documents: &[DocumentDescriptor]) {
        let label = match self.snapshots.fetch_add(1, Ordering::SeqCst) {
            0 => "cached",
            _ => "live",
        };
        if let OutputFormat::Plain = self.format {
            println!("[{label}] {} document(s)", documents.len());
        }
        if let Err(err) = print_documents(documents, self.format) {
            eprintln!("cannot print {label} snapshot: {err}");
        }
    }

    fn show_notice(&self, notice: Notice) {
        eprintln!("{notice}");
    }
}

/// The CLI never opens sync sessions, so there is no local sync state.
struct NoSyncStorage;

impl LocalSyncStorage for NoSyncStorage {
    fn remove_local_storage_for_document(&self, document_id: &str) {
        info!(
            "event=sync_storage_release module=cli status=skipped document_id={}",
            document_id
        );
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let data_dir = match cli.data_dir.clone().or_else(default_data_dir) {
        Some(dir) => dir,
        None => {
            eprintln!("cannot determine a data directory; pass --data-dir");
            return ExitCode::FAILURE;
        }
    };

    let level = cli.log_level.as_deref().unwrap_or(default_log_level());
    let log_dir = absolute(&data_dir).join("logs");
    if let Err(err) = init_logging(level, &log_dir.to_string_lossy()) {
        eprintln!("logging disabled: {err}");
    }

    match run(cli.command, &Paths::new(&data_dir), cli.format).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Command, paths: &Paths, format: OutputFormat) -> CliResult<()> {
    match command {
        Command::Login {
            server_url,
            username,
        } => {
            // Validate before persisting so a typo never logs the user in.
            WebCatalogClient::new(&server_url, &username)?;
            let preferences = paths.preferences.set_connection(&server_url, &username)?;
            println!(
                "logged in as `{}` at {}",
                preferences.username, preferences.server_url
            );
        }
        Command::Logout => {
            paths.preferences.clear()?;
            paths.descriptors.delete_database()?;
            println!("logged out");
        }
        Command::Status => {
            let preferences = paths.preferences.load()?;
            print_status(&preferences, paths);
        }
        Command::List => {
            let documents = paths.descriptors.try_read_all()?;
            if documents.is_empty() {
                if let OutputFormat::Plain = format {
                    println!("no cached documents");
                }
            }
            print_documents(&documents, format)?;
        }
        Command::Refresh => {
            let client = connect(paths)?;
            let view = Arc::new(StdoutCatalogView {
                snapshots: AtomicUsize::new(0),
                format,
            });
            let mut refresher = CatalogRefresher::new(
                paths.descriptors.clone(),
                client,
                Arc::new(NoSyncStorage),
                view,
            );
            refresher.refresh(true).await?;
        }
        Command::Token { document_id } => {
            let client = connect(paths)?;
            let token = client.fetch_token(&document_id).await?;
            println!("{token}");
        }
    }
    Ok(())
}

fn connect(paths: &Paths) -> CliResult<Arc<dyn CatalogApi>> {
    let preferences = paths.preferences.load()?;
    if !preferences.logged_in {
        return Err("not logged in; run `instant-kiosk login <server-url> <username>`".into());
    }
    let client = WebCatalogClient::new(&preferences.server_url, &preferences.username)?;
    Ok(Arc::new(client))
}

fn print_status(preferences: &ConnectionPreferences, paths: &Paths) {
    if !preferences.logged_in {
        println!("logged in: no");
    } else {
        println!("logged in: yes");
        println!("user: {}", preferences.username);
        println!("catalog server: {}", preferences.server_url);
        if let Some(url) = preferences.instant_server_url() {
            println!("sync server: {url}");
        }
    }

    let cached = paths.descriptors.read_all();
    println!(
        "cache: {} ({} document(s))",
        paths.descriptors.db_path().display(),
        cached.len()
    );
}

fn print_documents(documents: &[DocumentDescriptor], format: OutputFormat) -> CliResult<()> {
    if let OutputFormat::Json = format {
        println!("{}", serde_json::to_string_pretty(documents)?);
        return Ok(());
    }

    for document in documents {
        let named: Vec<&str> = document
            .layers()
            .iter()
            .filter_map(|layer| layer.layer_name.as_deref())
            .collect();
        if named.is_empty() {
            println!("  {}  {}", document.document_id, document.title);
        } else {
            println!(
                "  {}  {}  [layers: {}]",
                document.document_id,
                document.title,
                named.join(", ")
            );
        }
    }
    Ok(())
}

fn default_data_dir() -> Option<PathBuf> {
    dirs::data_local_dir().map(|dir| dir.join("instant-kiosk"))
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    match std::env::current_dir() {
        Ok(cwd) => cwd.join(path),
        Err(err) => {
            warn!("event=cwd_lookup module=cli status=error error={}", err);
            path.to_path_buf()
        }
    }
}
