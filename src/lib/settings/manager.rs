use std::{
    io::prelude::*,
    path::{Path, PathBuf},
    sync::{Arc, PoisonError, RwLock},
};

use directories::ProjectDirs;
use tracing::*;
use url::Url;
use validator::Validate;

use super::types::SettingsStruct;

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("failed to find user settings path")]
    NoConfigDir,

    #[error("failed to access settings file {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to serialize settings: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("invalid settings in {path:?}: {source}")]
    Invalid {
        path: PathBuf,
        source: validator::ValidationErrors,
    },
}

#[derive(Debug)]
struct ManagerStruct {
    pub file_name: PathBuf,
    pub config: SettingsStruct,
}

#[derive(Default)]
struct Manager {
    pub content: Option<ManagerStruct>,
}

lazy_static! {
    static ref MANAGER: Arc<RwLock<Manager>> = Default::default();
}

/// Command line values that take precedence over the settings file. They are
/// applied in memory only and never written back.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub api_url: Option<Url>,
    pub stream_url: Option<Url>,
    pub anomaly_url: Option<Url>,
    pub disable_anomaly: bool,
}

impl Overrides {
    pub fn apply(&self, settings: &mut SettingsStruct) {
        if let Some(url) = &self.api_url {
            settings.api.base_url = url.clone();
        }
        if let Some(url) = &self.stream_url {
            settings.streams.base_url = url.clone();
        }
        if let Some(url) = &self.anomaly_url {
            settings.anomaly.url = url.clone();
        }
        if self.disable_anomaly {
            settings.anomaly.enabled = false;
        }
    }
}

// Init settings manager with the desired settings file,
// will be created if does not exist
#[instrument(level = "debug")]
pub fn init(file_name: &str, reset: bool, overrides: &Overrides) -> Result<(), SettingsError> {
    let file_name = settings_path(file_name)?;
    debug!("Using settings file: {file_name:?}");

    let mut config = load_settings_from_file(&file_name, reset)?;
    overrides.apply(&mut config);

    let mut manager = MANAGER.write().unwrap_or_else(PoisonError::into_inner);
    manager.content = Some(ManagerStruct { file_name, config });

    Ok(())
}

/// Resolves a relative file name inside the user configuration folder.
fn settings_path(file_name: &str) -> Result<PathBuf, SettingsError> {
    let path = Path::new(file_name);
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }

    let project = ProjectDirs::from("com", "LB Observatory", env!("CARGO_PKG_NAME"))
        .ok_or(SettingsError::NoConfigDir)?;
    let folder_path = project.config_dir();
    std::fs::create_dir_all(folder_path).map_err(|source| SettingsError::Io {
        path: folder_path.to_path_buf(),
        source,
    })?;

    Ok(folder_path.join(file_name))
}

/// Reads and validates the settings file. A missing or unparsable file, or
/// `reset`, yields the defaults, which are then written back.
pub fn load_settings_from_file(
    file_name: &Path,
    reset: bool,
) -> Result<SettingsStruct, SettingsError> {
    let settings = match std::fs::read_to_string(file_name) {
        _ if reset => {
            info!("Resetting settings file {file_name:?}");
            None
        }
        Ok(content) => match serde_json::from_str::<SettingsStruct>(&content) {
            Ok(settings) => Some(settings),
            Err(error) => {
                warn!("Failed to parse settings file {file_name:?}, using defaults: {error}");
                None
            }
        },
        Err(error) => {
            debug!("Settings file {file_name:?} not readable ({error}), using defaults");
            None
        }
    };

    let settings = match settings {
        Some(settings) => settings,
        None => {
            let settings = SettingsStruct::default();
            save_settings_to_file(file_name, &settings)?;
            settings
        }
    };

    settings
        .validate()
        .map_err(|source| SettingsError::Invalid {
            path: file_name.to_path_buf(),
            source,
        })?;

    Ok(settings)
}

pub fn save_settings_to_file(
    file_name: &Path,
    content: &SettingsStruct,
) -> Result<(), SettingsError> {
    let value = serde_json::to_string_pretty(content)?;

    let io_error = |source| SettingsError::Io {
        path: file_name.to_path_buf(),
        source,
    };
    let mut file = std::fs::File::create(file_name).map_err(io_error)?;
    file.write_all(value.as_bytes()).map_err(io_error)?;

    trace!("Settings saved to {file_name:?}");
    Ok(())
}

/// Current settings, with command line overrides applied. Defaults before
/// [`init`].
pub fn settings() -> SettingsStruct {
    let manager = MANAGER.read().unwrap_or_else(PoisonError::into_inner);
    manager
        .content
        .as_ref()
        .map(|content| content.config.clone())
        .unwrap_or_default()
}

pub fn file_name() -> Option<PathBuf> {
    let manager = MANAGER.read().unwrap_or_else(PoisonError::into_inner);
    manager
        .content
        .as_ref()
        .map(|content| content.file_name.clone())
}
