//
// config.rs
// Dicom-Worklist-rs
//
// Layered application configuration: embedded defaults, an optional worklist.toml, then WORKLIST_<SECTION>__<KEY> env vars.
//
// Thales Matheus Mendonça Santos - November 2025

use std::path::PathBuf;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::format::is_valid_uid;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub encoder: EncoderConfig,
    pub storage: StorageConfig,
    pub http: HttpConfig,
    pub pacs: PacsConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration, optionally from an explicit file instead of `worklist.toml`.
    pub fn load(file: Option<PathBuf>) -> Result<Self, config::ConfigError> {
        use config::Config;

        let mut builder = Config::builder().add_source(config::File::from_str(
            include_str!("defaults.toml"),
            config::FileFormat::Toml,
        ));
        builder = match file {
            Some(path) => builder.add_source(config::File::from(path)),
            None => builder.add_source(config::File::with_name("worklist.toml").required(false)),
        };
        let s = builder
            .add_source(
                config::Environment::with_prefix("WORKLIST")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        s.try_deserialize()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        config::Config::builder()
            .add_source(config::File::from_str(
                include_str!("defaults.toml"),
                config::FileFormat::Toml,
            ))
            .build()
            .and_then(|c| c.try_deserialize())
            .unwrap_or_else(|e| panic!("Embedded defaults.toml is invalid: {e:?}"))
    }
}

/// Values the encoder needs that do not come from the record itself.
#[derive(Debug, Clone, Deserialize)]
pub struct EncoderConfig {
    /// UID root under which study, series and SOP instance UIDs are generated.
    pub org_root: String,
    pub implementation_class_uid: String,
    pub implementation_version_name: String,
    pub institution_name: String,
    pub department_name: String,
    pub default_modality: String,
    pub default_station_ae_title: String,
}

impl EncoderConfig {
    /// Reject settings that would make every encoded file non-conformant.
    pub fn validate(&self) -> Result<()> {
        for (field, uid) in [
            ("org_root", &self.org_root),
            ("implementation_class_uid", &self.implementation_class_uid),
        ] {
            // Leave room for the timestamp and random components.
            if !is_valid_uid(uid) || (field == "org_root" && uid.len() > 40) {
                return Err(Error::InvalidValue {
                    field,
                    value: uid.clone(),
                    reason: "not a usable UID root",
                });
            }
        }
        if self.implementation_version_name.is_empty() || self.implementation_version_name.len() > 16 {
            return Err(Error::InvalidValue {
                field: "implementation_version_name",
                value: self.implementation_version_name.clone(),
                reason: "must be 1 to 16 characters",
            });
        }
        Ok(())
    }
}

impl Default for EncoderConfig {
    fn default() -> Self {
        AppConfig::default().encoder
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub worklist_dir: PathBuf,
    pub instance_dir: PathBuf,
    pub filename_prefix: String,
    pub filename_suffix: String,
    /// Age in days after which `cleanup` removes files when no explicit age is given.
    pub cleanup_days: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PacsConfig {
    /// host:port of the PACS DICOM listener
    pub address: String,
    pub calling_ae_title: String,
    pub called_ae_title: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    // Also overridable through RUST_LOG
    pub level: String,
}
