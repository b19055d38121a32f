use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::sync::decision::DEFAULT_TOLERANCE;
use crate::sync::engine::EngineOptions;
use crate::sync::transfer::DEFAULT_CHUNK_SIZE;

const DEFAULT_BASE_DIR_NAME: &str = "DriveMirror";
const DEFAULT_DOWNLOAD_CONCURRENCY: usize = 4;
const DEFAULT_PAGE_SIZE: u32 = 1000;
const MAX_PAGE_SIZE: u32 = 1000;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("home directory is unavailable")]
    NoHome,
    #[error("base directory must be absolute: {0:?}")]
    RelativeBaseDir(PathBuf),
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
    #[error("page size must be between 1 and 1000, got {0}")]
    PageSize(u32),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MirrorConfig {
    /// Directory that receives one subdirectory per mirrored root folder.
    pub base_dir: PathBuf,
    pub tolerance_bytes: u64,
    pub chunk_size: usize,
    pub download_concurrency: usize,
    pub list_page_size: u32,
    pub log_json: bool,
}

impl MirrorConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok(), dirs::home_dir().as_deref())
    }

    /// `home` is only required when the base directory is left at its
    /// default or starts with `~`.
    pub fn from_lookup<F>(lookup: F, home: Option<&Path>) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let base_dir = match lookup("DRIVEMIRROR_BASE_DIR").filter(|value| !value.trim().is_empty()) {
            Some(value) if needs_home(value.trim()) => {
                expand_with_home(value.trim(), home.ok_or(ConfigError::NoHome)?)
            }
            Some(value) => PathBuf::from(value.trim()),
            None => home.ok_or(ConfigError::NoHome)?.join(DEFAULT_BASE_DIR_NAME),
        };
        let read_u64 = |name: &str, default: u64| {
            lookup(name)
                .and_then(|value| value.trim().parse::<u64>().ok())
                .filter(|value| *value > 0)
                .unwrap_or(default)
        };

        Ok(Self {
            base_dir,
            tolerance_bytes: read_u64("DRIVEMIRROR_TOLERANCE_BYTES", DEFAULT_TOLERANCE),
            chunk_size: read_u64("DRIVEMIRROR_CHUNK_BYTES", DEFAULT_CHUNK_SIZE as u64) as usize,
            download_concurrency: read_u64(
                "DRIVEMIRROR_DOWNLOAD_CONCURRENCY",
                DEFAULT_DOWNLOAD_CONCURRENCY as u64,
            ) as usize,
            list_page_size: u32::try_from(read_u64(
                "DRIVEMIRROR_PAGE_SIZE",
                u64::from(DEFAULT_PAGE_SIZE),
            ))
            .unwrap_or(DEFAULT_PAGE_SIZE),
            log_json: lookup("DRIVEMIRROR_LOG_JSON")
                .map(|value| {
                    matches!(
                        value.trim().to_ascii_lowercase().as_str(),
                        "1" | "true" | "yes" | "on"
                    )
                })
                .unwrap_or(false),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.base_dir.is_absolute() {
            return Err(ConfigError::RelativeBaseDir(self.base_dir.clone()));
        }
        if self.tolerance_bytes == 0 {
            return Err(ConfigError::Zero("tolerance"));
        }
        if self.chunk_size == 0 {
            return Err(ConfigError::Zero("chunk size"));
        }
        if self.download_concurrency == 0 {
            return Err(ConfigError::Zero("download concurrency"));
        }
        if !(1..=MAX_PAGE_SIZE).contains(&self.list_page_size) {
            return Err(ConfigError::PageSize(self.list_page_size));
        }
        Ok(())
    }

    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            tolerance: self.tolerance_bytes,
            chunk_size: self.chunk_size,
            download_concurrency: self.download_concurrency,
        }
    }
}

pub fn needs_home(value: &str) -> bool {
    value == "~" || value.starts_with("~/")
}

pub fn expand_with_home(value: &str, home: &Path) -> PathBuf {
    if value == "~" {
        return home.to_path_buf();
    }
    if let Some(rest) = value.strip_prefix("~/") {
        return home.join(rest);
    }
    PathBuf::from(value)
}
