//! Connection preferences persisted as JSON.
//!
//! # Responsibility
//! - Store the example server URL, the user name and the logged-in flag.
//! - Derive the catalog (web example) and sync (Instant) server URLs.
//!
//! # Invariants
//! - A missing preferences file reads as logged-out defaults.
//! - Writes replace the whole file through a temporary file + rename.

use log::{info, warn};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::fs;
use std::path::{Path, PathBuf};

/// Port of the example web server that serves the catalog.
pub const WEB_EXAMPLE_SERVER_PORT: u16 = 3000;
/// Port of the collaborative sync server next to the web server.
pub const INSTANT_SERVER_PORT: u16 = 5000;

const PREFERENCES_FILE_NAME: &str = "connection.json";

pub type PreferencesResult<T> = Result<T, PreferencesError>;

#[derive(Debug)]
pub enum PreferencesError {
    Io(std::io::Error),
    Json(serde_json::Error),
    InvalidServerUrl(String),
}

impl Display for PreferencesError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "preferences i/o failed: {err}"),
            Self::Json(err) => write!(f, "preferences file is malformed: {err}"),
            Self::InvalidServerUrl(value) => write!(f, "invalid server url `{value}`"),
        }
    }
}

impl Error for PreferencesError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Json(err) => Some(err),
            Self::InvalidServerUrl(_) => None,
        }
    }
}

impl From<std::io::Error> for PreferencesError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for PreferencesError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

/// Persisted connection settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionPreferences {
    #[serde(default)]
    pub server_url: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub logged_in: bool,
}

impl ConnectionPreferences {
    /// Catalog server URL as configured, or `None` when unset/malformed.
    pub fn web_example_server_url(&self) -> Option<Url> {
        Url::parse(self.server_url.trim()).ok()
    }

    /// Sync server URL: the configured URL with `INSTANT_SERVER_PORT`.
    pub fn instant_server_url(&self) -> Option<Url> {
        instant_server_url_from(&self.server_url)
    }
}

/// Replaces the port of `server_url` with `INSTANT_SERVER_PORT`.
pub fn instant_server_url_from(server_url: &str) -> Option<Url> {
    let mut url = Url::parse(server_url.trim()).ok()?;
    url.set_port(Some(INSTANT_SERVER_PORT)).ok()?;
    Some(url)
}

/// JSON file holding `ConnectionPreferences`.
#[derive(Debug, Clone)]
pub struct PreferencesStore {
    path: PathBuf,
}

impl PreferencesStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Uses the default file name inside `config_dir`.
    pub fn in_dir(config_dir: impl AsRef<Path>) -> Self {
        Self::new(config_dir.as_ref().join(PREFERENCES_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads preferences; a missing file yields defaults.
    pub fn load(&self) -> PreferencesResult<ConnectionPreferences> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Ok(ConnectionPreferences::default())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Stores server URL and user name and marks the user as logged in.
    ///
    /// # Errors
    /// - `InvalidServerUrl` when `server_url` does not parse as a URL.
    pub fn set_connection(
        &self,
        server_url: &str,
        username: &str,
    ) -> PreferencesResult<ConnectionPreferences> {
        if Url::parse(server_url.trim()).is_err() {
            return Err(PreferencesError::InvalidServerUrl(server_url.to_string()));
        }

        let preferences = ConnectionPreferences {
            server_url: server_url.trim().to_string(),
            username: username.trim().to_string(),
            logged_in: true,
        };
        self.save(&preferences)?;
        info!("event=preferences_set module=config status=ok logged_in=true");
        Ok(preferences)
    }

    /// Forgets the connection; the next `load` returns defaults.
    pub fn clear(&self) -> PreferencesResult<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => {
                warn!(
                    "event=preferences_clear module=config status=error error={}",
                    err
                );
                return Err(err.into());
            }
        }
        info!("event=preferences_clear module=config status=ok");
        Ok(())
    }

    fn save(&self, preferences: &ConnectionPreferences) -> PreferencesResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(preferences)?;
        let temp_path = self.path.with_extension("json.tmp");
        fs::write(&temp_path, json)?;
        fs::rename(&temp_path, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{instant_server_url_from, PreferencesError, PreferencesStore};

    #[test]
    fn missing_file_reads_as_logged_out() {
        let dir = tempfile::tempdir().unwrap();
        let store = PreferencesStore::in_dir(dir.path());
        let preferences = store.load().unwrap();
        assert!(!preferences.logged_in);
        assert!(preferences.server_url.is_empty());
    }

    #[test]
    fn set_connection_persists_and_clear_forgets() {
        let dir = tempfile::tempdir().unwrap();
        let store = PreferencesStore::in_dir(dir.path());

        store
            .set_connection(" http://10.0.2.2:3000/ ", "alice")
            .unwrap();
        let loaded = store.load().unwrap();
        assert!(loaded.logged_in);
        assert_eq!(loaded.username, "alice");
        assert_eq!(
            loaded.web_example_server_url().unwrap().as_str(),
            "http://10.0.2.2:3000/"
        );

        store.clear().unwrap();
        assert!(!store.load().unwrap().logged_in);
        store.clear().unwrap();
    }

    #[test]
    fn set_connection_rejects_malformed_url() {
        let dir = tempfile::tempdir().unwrap();
        let store = PreferencesStore::in_dir(dir.path());
        let err = store.set_connection("no scheme here", "alice").unwrap_err();
        assert!(matches!(err, PreferencesError::InvalidServerUrl(_)));
    }

    #[test]
    fn instant_url_swaps_port() {
        let url = instant_server_url_from("http://example.com:3000/").unwrap();
        assert_eq!(url.as_str(), "http://example.com:5000/");
        assert!(instant_server_url_from("").is_none());
    }
}
