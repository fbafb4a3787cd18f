//
// cli.rs
// Dicom-Worklist-rs
//
// Defines the CLI surface with Clap and dispatches user-selected commands to the corresponding modules.
//
// Thales Matheus Mendonça Santos - November 2025

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::info;

use crate::batch::{self, BatchKind, BatchOutcome};
use crate::config::AppConfig;
use crate::file::{encode_instance, encode_worklist, Encoded};
use crate::format::PersonNameInput;
use crate::models::FindResponse;
use crate::records::{InstanceInput, WorklistInput};
use crate::scu::FindQuery;
use crate::storage::FileStore;
use crate::{dump, scu, validate, web};

/// Command-line interface glue code: defines the available verbs and dispatches to modules.
#[derive(Parser)]
#[command(name = "dicom-worklist")]
#[command(about = "DICOM Modality Worklist and instance encoder", long_about = None)]
pub struct Cli {
    /// Configuration file used instead of ./worklist.toml
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Encode and store a worklist from JSON and/or flags
    CreateWorklist {
        #[command(flatten)]
        source: JsonSource,
        #[command(flatten)]
        fields: WorklistFields,
    },
    /// Encode and store a composite instance from JSON
    CreateInstance {
        #[command(flatten)]
        source: JsonSource,
    },
    /// Encode every record of a JSON array file
    Batch {
        #[arg(short, long, value_enum, default_value_t = BatchKind::Worklist)]
        kind: BatchKind,
        file: PathBuf,
    },
    /// List stored files, newest first
    List {
        #[arg(short, long, value_enum, default_value_t = Store::Worklists)]
        store: Store,
    },
    /// Delete a stored file
    Delete {
        filename: String,
        #[arg(short, long, value_enum, default_value_t = Store::Worklists)]
        store: Store,
    },
    /// Delete files older than the given number of days
    Cleanup {
        #[arg(short, long)]
        days: Option<u32>,
        #[arg(short, long, value_enum, default_value_t = Store::Worklists)]
        store: Store,
    },
    /// Show storage statistics
    Stats {
        #[arg(short, long, value_enum, default_value_t = Store::Worklists)]
        store: Store,
    },
    /// Print sample worklist data, optionally storing it
    Sample {
        #[arg(long)]
        create: bool,
    },
    /// Dump the whole data set of an encoded file
    Dump {
        file: PathBuf,
        #[arg(long, default_value_t = 4)]
        max_depth: usize,
        #[arg(long, default_value_t = 64)]
        max_value_len: usize,
    },
    /// Validate an encoded file
    Validate { file: PathBuf },
    /// Perform a DICOM C-ECHO against the configured PACS
    Echo,
    /// Send a stored instance (file name or path) with C-STORE
    Send { file: String },
    /// Query the configured PACS with C-FIND
    Find {
        #[command(subcommand)]
        target: FindTarget,
    },
    /// Start the web server
    Web {
        #[arg(long)]
        host: Option<String>,
        #[arg(short, long)]
        port: Option<u16>,
    },
}

#[derive(Subcommand, Debug)]
pub enum FindTarget {
    /// Scheduled procedure steps on the Modality Worklist
    Worklists,
    /// Patients matching a name (`*` and `?` wildcards allowed)
    Patients {
        #[arg(long, default_value = "*")]
        name: String,
    },
    /// Studies of one patient
    Studies { patient_id: String },
}

impl From<FindTarget> for FindQuery {
    fn from(target: FindTarget) -> Self {
        match target {
            FindTarget::Worklists => FindQuery::Worklists,
            FindTarget::Patients { name } => FindQuery::Patients { patient_name: name },
            FindTarget::Studies { patient_id } => FindQuery::Studies { patient_id },
        }
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum Store {
    Worklists,
    Instances,
}

/// Where the JSON record comes from.
#[derive(Args, Debug)]
pub struct JsonSource {
    /// Inline JSON object
    #[arg(long, conflicts_with = "input")]
    pub json: Option<String>,
    /// JSON file
    #[arg(short, long)]
    pub input: Option<PathBuf>,
}

impl JsonSource {
    fn load<T: DeserializeOwned + Default>(&self) -> anyhow::Result<T> {
        let text = match (&self.json, &self.input) {
            (Some(json), _) => json.clone(),
            (None, Some(path)) => {
                fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?
            }
            (None, None) => return Ok(T::default()),
        };
        serde_json::from_str(&text).context("Invalid JSON record")
    }
}

/// Flags that override fields of the JSON record.
#[derive(Args, Debug, Default)]
pub struct WorklistFields {
    #[arg(long)]
    pub patient_id: Option<String>,
    #[arg(long)]
    pub patient_name: Option<String>,
    #[arg(long)]
    pub birth_date: Option<String>,
    #[arg(long)]
    pub sex: Option<String>,
    #[arg(long)]
    pub accession: Option<String>,
    #[arg(long)]
    pub date: Option<String>,
    #[arg(long)]
    pub time: Option<String>,
    #[arg(long)]
    pub modality: Option<String>,
    #[arg(long)]
    pub station: Option<String>,
    #[arg(long)]
    pub description: Option<String>,
}

impl WorklistFields {
    fn apply(self, input: &mut WorklistInput) {
        let overrides = [
            (&mut input.patient_id, self.patient_id),
            (&mut input.patient_birth_date, self.birth_date),
            (&mut input.patient_sex, self.sex),
            (&mut input.accession_number, self.accession),
            (&mut input.scheduled_date, self.date),
            (&mut input.scheduled_time, self.time),
            (&mut input.modality, self.modality),
            (&mut input.scheduled_station_ae_title, self.station),
            (&mut input.study_description, self.description),
        ];
        for (slot, value) in overrides {
            if value.is_some() {
                *slot = value;
            }
        }
        if let Some(name) = self.patient_name {
            input.patient_name = Some(PersonNameInput::Formatted(name));
        }
    }
}

fn store_for(store: Store, config: &AppConfig) -> anyhow::Result<FileStore> {
    match store {
        Store::Worklists => FileStore::worklists(&config.storage),
        Store::Instances => FileStore::instances(&config.storage),
    }
}

fn save_and_report(encoded: &Encoded, store: &FileStore) -> anyhow::Result<()> {
    let stored = store.save(encoded.template.accession_number(), &encoded.bytes)?;
    println!("Created {} ({} bytes)", stored.path.display(), stored.size);
    println!("  Study Instance UID: {}", encoded.template.study_instance_uid());
    if let Some(sop) = encoded.template.sop_instance_uid() {
        println!("  SOP Instance UID: {sop}");
    }
    Ok(())
}

pub async fn run(cli: Cli, config: AppConfig) -> anyhow::Result<()> {
    match cli.command {
        Commands::CreateWorklist { source, fields } => {
            let mut input: WorklistInput = source.load()?;
            fields.apply(&mut input);
            let encoded = encode_worklist(&input, &config.encoder)?;
            save_and_report(&encoded, &FileStore::worklists(&config.storage)?)?;
        }
        Commands::CreateInstance { source } => {
            let input: InstanceInput = source.load()?;
            let encoded = encode_instance(&input, &config.encoder)?;
            save_and_report(&encoded, &FileStore::instances(&config.storage)?)?;
        }
        Commands::Batch { kind, file } => {
            let text = fs::read_to_string(&file).with_context(|| format!("Failed to read {}", file.display()))?;
            let items: Vec<Value> = serde_json::from_str(&text).context("Batch file must hold a JSON array")?;
            let store = match kind {
                BatchKind::Worklist => FileStore::worklists(&config.storage)?,
                BatchKind::Instance => FileStore::instances(&config.storage)?,
            };
            let report = batch::run_batch(kind, &items, &config.encoder, &store);
            for outcome in &report.results {
                match outcome {
                    BatchOutcome::Success { index, filename, .. } => println!("  [{index}] ok {filename}"),
                    BatchOutcome::Failure { index, message } => println!("  [{index}] failed: {message}"),
                }
            }
            println!(
                "Total: {} | succeeded: {} | failed: {}",
                report.total, report.succeeded, report.failed
            );
        }
        Commands::List { store } => {
            let files = store_for(store, &config)?.list()?;
            for file in &files {
                println!("{}  {:>10} bytes  {}", file.modified.format("%Y-%m-%d %H:%M:%S"), file.size, file.filename);
            }
            println!("{} file(s)", files.len());
        }
        Commands::Delete { filename, store } => {
            store_for(store, &config)?.delete(&filename)?;
            println!("Deleted {filename}");
        }
        Commands::Cleanup { days, store } => {
            let days = days.unwrap_or(config.storage.cleanup_days);
            let deleted = store_for(store, &config)?.cleanup(days)?;
            println!("Deleted {} file(s) older than {} day(s)", deleted.len(), days);
        }
        Commands::Stats { store } => {
            let stats = store_for(store, &config)?.stats()?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Commands::Sample { create } => {
            let sample = WorklistInput::sample();
            println!("{}", serde_json::to_string_pretty(&sample)?);
            if create {
                let encoded = encode_worklist(&sample, &config.encoder)?;
                save_and_report(&encoded, &FileStore::worklists(&config.storage)?)?;
            }
        }
        Commands::Dump {
            file,
            max_depth,
            max_value_len,
        } => dump::dump_file(&file, max_depth, max_value_len)?,
        Commands::Validate { file } => {
            if !validate::check_file(&file)?.valid {
                bail!("{} is not a conformant file", file.display());
            }
        }
        Commands::Echo => {
            let outcome = scu::echo(&config.pacs)?;
            println!("C-ECHO to {} succeeded (status 0x{:04X})", config.pacs.called_ae_title, outcome.status);
        }
        Commands::Send { file } => {
            let path = resolve_instance(&file, &config)?;
            let outcome = scu::push(&config.pacs, &path)?;
            println!("C-STORE of {} succeeded (status 0x{:04X})", path.display(), outcome.status);
        }
        Commands::Find { target } => {
            let matches = scu::find(&config.pacs, &target.into())?;
            println!("{}", serde_json::to_string_pretty(&FindResponse::new(matches))?);
        }
        Commands::Web { host, port } => {
            let mut config = config;
            if let Some(host) = host {
                config.http.host = host;
            }
            if let Some(port) = port {
                config.http.port = port;
            }
            info!(host = %config.http.host, port = config.http.port, "starting web server");
            web::start_server(config).await?
        }
    }

    Ok(())
}

/// A bare file name refers to the instance store; anything else is a path.
fn resolve_instance(file: &str, config: &AppConfig) -> anyhow::Result<PathBuf> {
    let path = Path::new(file);
    if path.components().count() == 1 && !path.exists() {
        return FileStore::instances(&config.storage)?.resolve(file);
    }
    Ok(path.to_path_buf())
}
