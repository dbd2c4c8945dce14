//! CLI Tooling
//!
//! Command-line access to a local dhtfs peer backed by a sled key store.
//! Every command bootstraps the tree from the store, runs, and drains
//! pending writes before returning.

use crate::config::{ConfigLoader, DhtFsConfig};
use crate::error::{ApiError, FsError, StoreError};
use crate::fs::DhtFs;
use crate::logging::init_logging;
use crate::store::{KeyStore, SledKeyStore};
use crate::tree::path::{components, join, normalize};
use crate::tree::NodeType;
use crate::types::ROOT_PATH;
use clap::{Parser, Subcommand};
use serde_json::json;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// dhtfs - path-addressable files over a distributed hash table
#[derive(Parser)]
#[command(name = "dhtfs")]
#[command(about = "Path-addressable file hierarchy stored in a distributed hash table")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Key store directory (overrides storage.store_path)
    #[arg(long)]
    pub store: Option<PathBuf>,

    /// Configuration file path (layered over the global config)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file, file+stderr, both)
    #[arg(long)]
    pub log_output: Option<String>,

    /// Log file path (if output includes "file")
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List a directory
    Ls {
        #[arg(default_value = "/")]
        path: String,
    },
    /// Print a file
    Cat { path: String },
    /// Replace a file's contents, creating it if needed
    Put {
        path: String,
        /// Contents; read from stdin when omitted
        content: Option<String>,
        /// Read contents from a local file instead
        #[arg(long, conflicts_with = "content")]
        from: Option<PathBuf>,
    },
    /// Create a directory
    Mkdir {
        path: String,
        /// Create missing parents
        #[arg(short, long)]
        parents: bool,
    },
    /// Remove a file, symlink, or directory
    Rm {
        path: String,
        /// Remove directories and their contents
        #[arg(short, long)]
        recursive: bool,
    },
    /// Move or rename a path
    Mv { from: String, to: String },
    /// Create a symlink at `path` pointing to `target`
    Ln { target: String, path: String },
    /// Reconcile the local tree with the Path Index
    Sync,
    /// List archived versions of a file
    Versions { path: String },
    /// Show filesystem statistics
    Statfs {
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
}

/// Loaded peer state shared by every command
pub struct CliContext {
    fs: DhtFs,
    keys: Arc<SledKeyStore>,
}

impl CliContext {
    pub fn new(cli: &Cli) -> Result<Self, ApiError> {
        let mut config = match &cli.config {
            Some(path) => ConfigLoader::load_from_file(path)?,
            None => ConfigLoader::load()?,
        };
        apply_log_overrides(&mut config, cli);
        init_logging(Some(&config.logging))?;

        let store_path = match &cli.store {
            Some(path) => path.clone(),
            None => config.storage.resolve_store_path()?,
        };
        let keys = Arc::new(SledKeyStore::open(&store_path)?);
        info!(store = %store_path.display(), "Opened key store");

        // One-shot commands never run the background loops.
        config.reconcile.enabled = false;
        let fs = DhtFs::new(keys.clone() as Arc<dyn KeyStore>, config);
        fs.bootstrap()?;
        Ok(Self { fs, keys })
    }

    pub fn fs(&self) -> &DhtFs {
        &self.fs
    }

    /// Run a command and return its printable output
    pub fn execute(&self, command: &Commands) -> Result<String, ApiError> {
        let output = self.dispatch(command);
        let drained = self.fs.shutdown();
        self.keys.flush()?;
        let output = output?;
        if drained.failed > 0 {
            return Err(StoreError::Unavailable(format!(
                "{} writes could not be flushed",
                drained.failed
            ))
            .into());
        }
        Ok(output)
    }

    fn dispatch(&self, command: &Commands) -> Result<String, ApiError> {
        match command {
            Commands::Ls { path } => self.ls(path),
            Commands::Cat { path } => {
                let size = self.fs.getattr(path)?.size as usize;
                let bytes = self.fs.read(path, 0, size)?;
                Ok(String::from_utf8_lossy(&bytes).into_owned())
            }
            Commands::Put { path, content, from } => {
                let bytes = match (content, from) {
                    (Some(text), _) => text.clone().into_bytes(),
                    (None, Some(file)) => std::fs::read(file).map_err(|e| {
                        ApiError::Input(format!("cannot read {}: {}", file.display(), e))
                    })?,
                    (None, None) => {
                        let mut buf = Vec::new();
                        std::io::stdin().read_to_end(&mut buf).map_err(|e| {
                            ApiError::Input(format!("cannot read stdin: {}", e))
                        })?;
                        buf
                    }
                };
                self.put(path, &bytes)?;
                Ok(format!("wrote {} bytes to {}", bytes.len(), normalize(path)?))
            }
            Commands::Mkdir { path, parents } => {
                if *parents {
                    self.mkdir_parents(path)?;
                } else {
                    self.fs.mkdir(path)?;
                }
                Ok(String::new())
            }
            Commands::Rm { path, recursive } => {
                self.remove(&normalize(path)?, *recursive)?;
                Ok(String::new())
            }
            Commands::Mv { from, to } => {
                self.fs.rename(from, to)?;
                Ok(String::new())
            }
            Commands::Ln { target, path } => {
                self.fs.symlink(path, target)?;
                Ok(String::new())
            }
            Commands::Sync => {
                let report = self.fs.bootstrap()?;
                Ok(format!(
                    "created {}, removed {}, failed {}",
                    report.created.len(),
                    report.removed.len(),
                    report.failed
                ))
            }
            Commands::Versions { path } => Ok(self.fs.versions(path)?.join("\n")),
            Commands::Statfs { format } => {
                let st = self.fs.statfs();
                if format == "json" {
                    let value = json!({
                        "bsize": st.bsize,
                        "blocks": st.blocks,
                        "bfree": st.bfree,
                        "bavail": st.bavail,
                        "files": st.files,
                        "ffree": st.ffree,
                        "namelen": st.namelen,
                    });
                    serde_json::to_string_pretty(&value)
                        .map_err(|e| ApiError::Input(e.to_string()))
                } else {
                    Ok(format!(
                        "block size: {}\nblocks: {} ({} free)\nfiles: {} ({} free)\nname max: {}",
                        st.bsize, st.blocks, st.bfree, st.files, st.ffree, st.namelen
                    ))
                }
            }
        }
    }

    fn ls(&self, path: &str) -> Result<String, ApiError> {
        let dir = normalize(path)?;
        let mut lines = Vec::new();
        for name in self.fs.readdir(&dir)? {
            let child = join(&dir, &name);
            let line = match self.fs.getattr(&child)?.node_type {
                NodeType::Directory => format!("{}/", name),
                NodeType::Symlink => format!("{} -> {}", name, self.fs.readlink(&child)?),
                NodeType::File => name,
            };
            lines.push(line);
        }
        Ok(lines.join("\n"))
    }

    fn put(&self, path: &str, bytes: &[u8]) -> Result<(), FsError> {
        match self.fs.create(path) {
            Ok(_) | Err(FsError::AlreadyExists(_)) => {}
            Err(e) => return Err(e),
        }
        self.fs.truncate(path, 0)?;
        self.fs.write(path, 0, bytes)?;
        Ok(())
    }

    fn mkdir_parents(&self, path: &str) -> Result<(), FsError> {
        let normalized = normalize(path)?;
        let mut current = String::from(ROOT_PATH);
        for name in components(&normalized) {
            current = join(&current, name);
            match self.fs.mkdir(&current) {
                Ok(_) => {}
                Err(FsError::AlreadyExists(_)) => {
                    if self.fs.getattr(&current)?.node_type != NodeType::Directory {
                        return Err(FsError::NotADirectory(current));
                    }
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    fn remove(&self, path: &str, recursive: bool) -> Result<(), FsError> {
        if self.fs.getattr(path)?.node_type != NodeType::Directory {
            return self.fs.unlink(path);
        }
        if recursive {
            for name in self.fs.readdir(path)? {
                self.remove(&join(path, &name), true)?;
            }
        }
        self.fs.rmdir(path)
    }
}

fn apply_log_overrides(config: &mut DhtFsConfig, cli: &Cli) {
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    if let Some(format) = &cli.log_format {
        config.logging.format = format.clone();
    }
    if let Some(output) = &cli.log_output {
        config.logging.output = output.clone();
    }
    if let Some(file) = &cli.log_file {
        config.logging.file = Some(file.clone());
    }
}
