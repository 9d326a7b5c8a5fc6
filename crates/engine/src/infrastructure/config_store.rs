//! JSON configuration file storage.
//!
//! Loading never blocks startup: a missing file is created from defaults and
//! an unreadable or malformed file is replaced in memory by defaults. The one
//! loud failure is a migration that cannot complete, since the file then
//! describes a structure the running code does not understand.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use aethelon_domain::{AethelonSettings, CURRENT_CONFIG_VERSION};
use directories::ProjectDirs;
use serde_json::Value;

use crate::infrastructure::backup::BackupStore;
use crate::infrastructure::error::ConfigError;
use crate::infrastructure::ports::ClockPort;
use crate::migration::{utils, MigrationEngine, MigrationError, MigrationResult};

pub const CONFIG_FILE_NAME: &str = "aethelon.json";
pub const BACKUP_DIR_NAME: &str = "backups";
pub const CONFIG_DIR_ENV: &str = "AETHELON_CONFIG_DIR";

/// Config directory: `$AETHELON_CONFIG_DIR`, else the platform config dir,
/// else `./config`.
pub fn resolve_config_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os(CONFIG_DIR_ENV).filter(|d| !d.is_empty()) {
        return PathBuf::from(dir);
    }
    match ProjectDirs::from("io", "aethelon", "aethelon") {
        Some(dirs) => dirs.config_dir().to_path_buf(),
        None => PathBuf::from("config"),
    }
}

/// Where the settings in a [`LoadedConfig`] came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSource {
    /// Read from the file (possibly after migration)
    File,
    /// No file existed; defaults were written
    CreatedDefault,
    /// The file could not be used; in-memory defaults
    FallbackDefault,
}

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub settings: AethelonSettings,
    pub source: ConfigSource,
    pub migration: Option<MigrationResult>,
}

impl LoadedConfig {
    pub fn defaults(source: ConfigSource) -> Self {
        Self {
            settings: AethelonSettings::default(),
            source,
            migration: None,
        }
    }
}

pub struct ConfigStore {
    path: PathBuf,
    backups: BackupStore,
    migrations: MigrationEngine,
}

impl ConfigStore {
    /// Store for `<config_dir>/aethelon.json` with the shipped migrations.
    pub fn open(config_dir: &Path, clock: Arc<dyn ClockPort>) -> Result<Self, MigrationError> {
        let path = config_dir.join(CONFIG_FILE_NAME);
        let backups = BackupStore::new(&path, config_dir.join(BACKUP_DIR_NAME), clock.clone());
        let migrations = MigrationEngine::with_builtin(CURRENT_CONFIG_VERSION, clock)?;
        Ok(Self::new(path, backups, migrations))
    }

    pub fn new(path: PathBuf, backups: BackupStore, migrations: MigrationEngine) -> Self {
        Self {
            path,
            backups,
            migrations,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn backups(&self) -> &BackupStore {
        &self.backups
    }

    pub fn migrations(&self) -> &MigrationEngine {
        &self.migrations
    }

    /// Raw document, or `None` if the file does not exist.
    pub fn read_document(&self) -> Result<Option<Value>, ConfigError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|source| ConfigError::Parse {
                path: self.path.clone(),
                source,
            })
    }

    /// Write a document pretty-printed, creating the directory if needed.
    pub fn write_document(&self, doc: &Value) -> Result<(), ConfigError> {
        let mut json = serde_json::to_string_pretty(doc)?;
        json.push('\n');
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
                path: self.path.clone(),
                source,
            })?;
        }
        fs::write(&self.path, json).map_err(|source| ConfigError::Write {
            path: self.path.clone(),
            source,
        })
    }

    pub fn save(&self, settings: &AethelonSettings) -> Result<(), ConfigError> {
        self.write_document(&serde_json::to_value(settings)?)
    }

    /// Load settings, migrating the file first when it is out of date.
    ///
    /// Only a failed migration is returned as an error; in that case the file
    /// on disk is left untouched.
    pub fn load_or_default(&self) -> Result<LoadedConfig, ConfigError> {
        let mut doc = match self.read_document() {
            Ok(Some(doc)) => doc,
            Ok(None) => {
                tracing::info!(path = %self.path.display(), "No config file found, writing defaults");
                let loaded = LoadedConfig::defaults(ConfigSource::CreatedDefault);
                if let Err(e) = self.save(&loaded.settings) {
                    tracing::warn!(error = %e, "Failed to write default config");
                }
                return Ok(loaded);
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to load config, using defaults");
                return Ok(LoadedConfig::defaults(ConfigSource::FallbackDefault));
            }
        };

        tracing::debug!(
            path = %self.path.display(),
            version = utils::get_version(&doc).unwrap_or("unversioned"),
            "Config file read"
        );

        let mut migration = None;
        if self.migrations.needs_migration(&doc)? {
            if self.backups.create_backup("pre-migration").is_none() {
                tracing::warn!("Pre-migration backup failed, migrating anyway");
            }
            let result = self.migrations.migrate(&mut doc)?;
            if let Err(e) = self.write_document(&doc) {
                tracing::warn!(error = %e, "Failed to save migrated config");
            }
            migration = Some(result);
        } else if let Ok(version) = utils::document_version(&doc) {
            if version > *self.migrations.target_version() {
                tracing::warn!(
                    found = %version,
                    supported = %self.migrations.target_version(),
                    "Config file is newer than this build understands"
                );
            }
        }

        match serde_json::from_value::<AethelonSettings>(doc) {
            Ok(settings) => Ok(LoadedConfig {
                settings,
                source: ConfigSource::File,
                migration,
            }),
            Err(e) => {
                tracing::error!(error = %e, path = %self.path.display(), "Config file has invalid settings, using defaults");
                Ok(LoadedConfig {
                    migration,
                    ..LoadedConfig::defaults(ConfigSource::FallbackDefault)
                })
            }
        }
    }
}
