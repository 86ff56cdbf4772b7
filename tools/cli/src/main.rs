//! multifs CLI - Mount URL-addressed backends and operate on them by drive.
//!
//! Every content command mounts the configured resources first, then
//! dispatches one operation through a logical path (`drive:path`). A
//! resource name may be used in place of its drive key.

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use multifs_common::{split_logical, ApiPath};
use multifs_router::{
    open_backend, ContentFormat, ContentModel, ContentType, ContentsManager, GetOptions,
    ReconcileRequest, ResourceRecord, ResourceService, RouterConfig, TerminalPrompt,
};
use multifs_storage::BackendKind;

#[derive(Parser)]
#[command(name = "multifs")]
#[command(about = "multifs - One namespace over many filesystems")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Router configuration file (JSON).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile resources and print their status records.
    Resources {
        /// Client reconcile request (JSON) to submit after the server resources.
        #[arg(long)]
        client: Option<PathBuf>,

        /// Open fresh connections instead of reusing live ones.
        #[arg(long)]
        no_cache: bool,
    },

    /// List a directory.
    Ls {
        /// Logical path (default: root of the default drive).
        #[arg(default_value = "")]
        path: String,
    },

    /// Print a file.
    Cat {
        /// Logical path.
        path: String,
    },

    /// Upload a local file.
    Put {
        /// Local source file.
        source: PathBuf,

        /// Logical destination path.
        dest: String,
    },

    /// Rename within one drive.
    Mv {
        /// Logical source path.
        old: String,

        /// Logical destination path.
        new: String,
    },

    /// Copy a file, next to itself or into another directory.
    Cp {
        /// Logical source path.
        source: String,

        /// Logical destination path or directory.
        dest: Option<String>,
    },

    /// Remove a file or empty directory.
    Rm {
        /// Logical path.
        path: String,
    },

    /// Create a directory.
    Mkdir {
        /// Logical path.
        path: String,
    },

    /// Open a backend URL directly, prompting for credentials.
    Open {
        /// Connection URL, may contain {{token}} placeholders.
        url: String,

        /// Backend kind: "pyfs" or "fsspec".
        #[arg(short = 't', long = "type", default_value = "pyfs")]
        kind: String,

        /// Directory to list on the opened backend.
        #[arg(default_value = "")]
        path: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(log_filter(cli.verbose))
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Resources { client, no_cache } => {
            cmd_resources(config_path, client.as_deref(), no_cache).await
        }

        Commands::Ls { path } => cmd_ls(config_path, &path).await,

        Commands::Cat { path } => cmd_cat(config_path, &path).await,

        Commands::Put { source, dest } => cmd_put(config_path, &source, &dest).await,

        Commands::Mv { old, new } => cmd_mv(config_path, &old, &new).await,

        Commands::Cp { source, dest } => cmd_cp(config_path, &source, dest.as_deref()).await,

        Commands::Rm { path } => cmd_rm(config_path, &path).await,

        Commands::Mkdir { path } => cmd_mkdir(config_path, &path).await,

        Commands::Open { url, kind, path } => cmd_open(&url, &kind, &path).await,
    }
}

/// `--verbose` forces debug output; otherwise `RUST_LOG` applies, defaulting to info.
fn log_filter(verbose: bool) -> EnvFilter {
    if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

/// Load configuration and build the resource service.
async fn load_service(config_path: Option<&Path>) -> Result<ResourceService> {
    let config = match config_path {
        Some(path) => RouterConfig::load(path)
            .await
            .context("Failed to load configuration")?,
        None => RouterConfig::default(),
    };

    let manager = config
        .build_manager()
        .await
        .context("Failed to open root directory")?;
    ResourceService::new(config, Arc::new(manager)).context("Invalid resource validators")
}

/// Build the service and mount the server resources.
async fn mounted(config_path: Option<&Path>) -> Result<(ResourceService, Vec<ResourceRecord>)> {
    mounted_with_cache(config_path, true).await
}

async fn mounted_with_cache(
    config_path: Option<&Path>,
    cache: bool,
) -> Result<(ResourceService, Vec<ResourceRecord>)> {
    let service = load_service(config_path).await?;
    let records = service
        .init_server_resources(cache)
        .await
        .context("Failed to mount resources")?;
    Ok((service, records))
}

/// Replace a resource-name prefix with the resource's drive key.
fn expand_drive(path: &str, records: &[ResourceRecord]) -> String {
    if let Some((prefix, rest)) = split_logical(path) {
        if let Some(record) = records.iter().find(|r| r.init && r.name == prefix) {
            return format!("{}:{}", record.drive, rest);
        }
    }
    path.to_string()
}

/// Reconcile and print resource records.
async fn cmd_resources(
    config_path: Option<&Path>,
    client: Option<&Path>,
    no_cache: bool,
) -> Result<()> {
    let (service, mut records) = mounted_with_cache(config_path, !no_cache).await?;

    if let Some(client) = client {
        let json = tokio::fs::read_to_string(client)
            .await
            .context("Failed to read client request")?;
        let mut request: ReconcileRequest =
            serde_json::from_str(&json).context("Invalid client request")?;
        request.options.cache &= !no_cache;

        records = service
            .reconcile(request)
            .await
            .context("Failed to reconcile resources")?;
    }

    println!("{}", serde_json::to_string_pretty(&records)?);
    Ok(())
}

/// List directory contents.
async fn cmd_ls(config_path: Option<&Path>, path: &str) -> Result<()> {
    let (service, records) = mounted(config_path).await?;
    let path = expand_drive(path, &records);

    let model = service
        .manager()
        .get(&path, &GetOptions::default())
        .await
        .context("Failed to list directory")?;

    if model.kind != ContentType::Directory {
        println!("[FILE] {} ({} bytes)", model.name, model.size.unwrap_or(0));
        return Ok(());
    }

    let entries = model
        .content
        .as_ref()
        .and_then(|c| c.as_array())
        .cloned()
        .unwrap_or_default();
    if entries.is_empty() {
        println!("Directory is empty.");
        return Ok(());
    }

    for entry in entries {
        let entry: ContentModel = serde_json::from_value(entry)?;
        match entry.kind {
            ContentType::Directory => println!("  [DIR]  {}/", entry.name),
            ContentType::Notebook => println!("  [NB]   {}", entry.name),
            ContentType::File => {
                let size = entry.size.map(|s| format!("{} bytes", s)).unwrap_or_default();
                println!("  [FILE] {} ({})", entry.name, size);
            }
        }
    }
    Ok(())
}

/// Print file content to stdout.
async fn cmd_cat(config_path: Option<&Path>, path: &str) -> Result<()> {
    let (service, records) = mounted(config_path).await?;
    let path = expand_drive(path, &records);

    let model = service
        .manager()
        .get(&path, &GetOptions::default())
        .await
        .context("Failed to read file")?;

    let bytes = match (model.kind, model.format) {
        (ContentType::Directory, _) => anyhow::bail!("{} is a directory", path),
        (_, Some(ContentFormat::Base64)) => STANDARD
            .decode(model.content_str().unwrap_or_default())
            .context("Corrupt base64 content")?,
        (ContentType::Notebook, _) => {
            let document = model.content.unwrap_or_default();
            serde_json::to_vec_pretty(&document)?
        }
        _ => model.content_str().unwrap_or_default().as_bytes().to_vec(),
    };

    let mut stdout = std::io::stdout().lock();
    stdout.write_all(&bytes)?;
    stdout.flush()?;
    Ok(())
}

/// Upload a local file.
async fn cmd_put(config_path: Option<&Path>, source: &Path, dest: &str) -> Result<()> {
    info!("Uploading {} to {}", source.display(), dest);

    let content = tokio::fs::read(source)
        .await
        .context("Failed to read source file")?;
    let size = content.len();

    let (service, records) = mounted(config_path).await?;
    let dest = expand_drive(dest, &records);

    let model = if dest.ends_with(".ipynb") {
        let document = serde_json::from_slice(&content).context("Source is not a notebook")?;
        ContentModel::notebook(document)
    } else {
        match String::from_utf8(content) {
            Ok(text) => ContentModel::text(text),
            Err(e) => ContentModel::base64(STANDARD.encode(e.into_bytes())),
        }
    };

    let saved = service
        .manager()
        .save(model, &dest)
        .await
        .context("Failed to upload file")?;

    println!("File uploaded: {} ({} bytes)", saved.path, size);
    Ok(())
}

/// Rename a file or directory.
async fn cmd_mv(config_path: Option<&Path>, old: &str, new: &str) -> Result<()> {
    let (service, records) = mounted(config_path).await?;
    let old = expand_drive(old, &records);
    let new = expand_drive(new, &records);

    service
        .manager()
        .rename(&old, &new)
        .await
        .context("Failed to rename")?;

    println!("Renamed: {} -> {}", old, new);
    Ok(())
}

/// Copy a file.
async fn cmd_cp(config_path: Option<&Path>, source: &str, dest: Option<&str>) -> Result<()> {
    let (service, records) = mounted(config_path).await?;
    let source = expand_drive(source, &records);
    let dest = dest.map(|d| expand_drive(d, &records));

    let copied = service
        .manager()
        .copy(&source, dest.as_deref())
        .await
        .context("Failed to copy")?;

    println!("Copied: {} -> {}", source, copied.path);
    Ok(())
}

/// Remove a file or empty directory.
async fn cmd_rm(config_path: Option<&Path>, path: &str) -> Result<()> {
    let (service, records) = mounted(config_path).await?;
    let path = expand_drive(path, &records);

    service
        .manager()
        .delete(&path)
        .await
        .context("Failed to remove")?;

    println!("Removed: {}", path);
    Ok(())
}

/// Create a directory.
async fn cmd_mkdir(config_path: Option<&Path>, path: &str) -> Result<()> {
    let (service, records) = mounted(config_path).await?;
    let path = expand_drive(path, &records);

    service
        .manager()
        .save(ContentModel::directory(), &path)
        .await
        .context("Failed to create directory")?;

    println!("Directory created: {}", path);
    Ok(())
}

/// Open a backend directly and list a directory on it.
async fn cmd_open(url: &str, kind: &str, path: &str) -> Result<()> {
    let kind: BackendKind = kind.parse().context("Invalid backend type")?;

    let provider = open_backend(url, kind, &TerminalPrompt)
        .await
        .context("Failed to open backend")?;
    let dir = ApiPath::parse(path).context("Invalid path")?;

    let entries = provider
        .list(&dir)
        .await
        .context("Failed to list directory")?;

    println!("Opened {} backend at {}", provider.name(), provider.root());
    if entries.is_empty() {
        println!("Directory is empty.");
    }
    for entry in entries {
        if entry.is_directory {
            println!("  [DIR]  {}/", entry.name);
        } else {
            let size = entry.size.map(|s| format!("{} bytes", s)).unwrap_or_default();
            println!("  [FILE] {} ({})", entry.name, size);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use multifs_common::DriveKey;
    use multifs_router::{AuthMode, ResourceSpec};

    fn record(name: &str, url: &str, init: bool) -> ResourceRecord {
        let spec = ResourceSpec::new(name, url).with_auth(AuthMode::None);
        let drive = if init {
            DriveKey::from_url(url)
        } else {
            DriveKey::not_init()
        };
        ResourceRecord::from_spec(spec, drive, init).unwrap()
    }

    #[test]
    fn test_expand_drive_by_name() {
        let records = vec![record("scratch", "mem://", true), record("broken", "mem://x", false)];
        let key = DriveKey::from_url("mem://");

        assert_eq!(expand_drive("scratch:a/b.txt", &records), format!("{}:a/b.txt", key));
        assert_eq!(expand_drive("broken:a", &records), "broken:a");
        assert_eq!(expand_drive("plain/path", &records), "plain/path");
    }

    #[test]
    fn test_cli_parses() {
        let cli = Cli::try_parse_from(["multifs", "--verbose", "cp", "a:x.txt"]).unwrap();
        assert!(cli.verbose);
        assert!(matches!(cli.command, Commands::Cp { dest: None, .. }));

        let cli = Cli::try_parse_from(["multifs", "open", "mem://", "--type", "pyfs"]).unwrap();
        assert!(matches!(cli.command, Commands::Open { ref kind, .. } if kind == "pyfs"));
    }

    #[test]
    fn test_verbose_forces_debug_filter() {
        assert_eq!(log_filter(true).to_string(), "debug");
    }

    #[test]
    fn test_no_cache_parses_without_client() {
        let cli = Cli::try_parse_from(["multifs", "resources", "--no-cache"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Resources {
                client: None,
                no_cache: true
            }
        ));
    }
}
