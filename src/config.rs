// config.rs
// settings.json loading: backend selection, call deadline, log filter

use crate::backend::BackendKind;
use crate::errors::{op, ErrorKind, Result, ZfsError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const SETTINGS_FILE: &str = "settings.json";
pub const CONFIG_DIR_NAME: &str = "zfs-driver";
/// Overrides `driver.backend` when set
pub const BACKEND_ENV: &str = "ZFS_DRIVER_BACKEND";

/// Settings loaded from settings.json
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub driver: DriverSettings,
    pub logging: LoggingSettings,
}

/// Driver construction settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverSettings {
    pub backend: BackendKind,
    /// Advisory deadline for the async facade, checked before each call
    pub call_timeout_ms: Option<u64>,
}

impl Default for DriverSettings {
    fn default() -> Self {
        DriverSettings {
            backend: BackendKind::Libzfs,
            call_timeout_ms: None,
        }
    }
}

impl DriverSettings {
    pub fn call_timeout(&self) -> Option<Duration> {
        self.call_timeout_ms.map(Duration::from_millis)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// tracing-subscriber EnvFilter directive, used when RUST_LOG is unset
    pub filter: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        LoggingSettings {
            filter: "info".to_string(),
        }
    }
}

/// Candidate settings files, in lookup order
pub fn settings_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    let exe_dir = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf));
    if let Some(dir) = exe_dir {
        paths.push(dir.join(SETTINGS_FILE));
    }
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join(CONFIG_DIR_NAME).join(SETTINGS_FILE));
    }
    paths
}

/// Parse one settings file
pub fn load_settings_from(path: &Path) -> Result<Settings> {
    let content = fs::read_to_string(path).map_err(|e| {
        let kind = match e.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::NotFound,
            std::io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied,
            _ => ErrorKind::IoError,
        };
        ZfsError::new(op::LOAD_SETTINGS, kind, e.to_string())
            .with_resource(path.display().to_string())
            .with_errno(e.raw_os_error().unwrap_or(-1))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        ZfsError::invalid(
            op::LOAD_SETTINGS,
            &path.display().to_string(),
            format!("failed to parse settings: {}", e),
        )
    })
}

/// Load settings from the first readable settings.json, or use defaults.
///
/// Looks next to the executable, then in the user config directory. A file
/// that exists but does not parse is skipped. Fallbacks are returned as notes
/// so they can be logged once a subscriber is installed.
pub fn load_settings_with_notes() -> (Settings, Vec<String>) {
    let mut notes = Vec::new();
    let mut settings = None;
    for path in settings_paths() {
        if !path.exists() {
            continue;
        }
        match load_settings_from(&path) {
            Ok(loaded) => {
                settings = Some(loaded);
                break;
            }
            Err(e) => notes.push(format!("{}; skipping", e)),
        }
    }
    let mut settings = settings.unwrap_or_else(|| {
        notes.push(format!("no usable {} found, using default values", SETTINGS_FILE));
        Settings::default()
    });
    if let Some(note) = apply_env(&mut settings, std::env::var(BACKEND_ENV).ok().as_deref()) {
        notes.push(note);
    }
    (settings, notes)
}

/// Load settings and log every fallback at warn level
pub fn load_settings() -> Settings {
    let (settings, notes) = load_settings_with_notes();
    report_notes(&notes);
    settings
}

pub fn report_notes(notes: &[String]) {
    for note in notes {
        tracing::warn!("{}", note);
    }
}

/// Apply the backend override. An unknown value is ignored and described in
/// the returned note.
pub fn apply_env(settings: &mut Settings, backend: Option<&str>) -> Option<String> {
    let value = backend?;
    match value.parse::<BackendKind>() {
        Ok(kind) => {
            settings.driver.backend = kind;
            None
        }
        Err(e) => Some(format!("{}: {}; keeping {}", BACKEND_ENV, e, settings.driver.backend)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{is_invalid_argument, is_not_found};
    use std::io::Write;
    use std::sync::{Arc, Mutex};

    /// Test: missing fields take their defaults
    #[test]
    fn test_partial_settings_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE);
        let mut f = fs::File::create(&path).unwrap();
        write!(f, r#"{{"driver": {{"backend": "mock"}}}}"#).unwrap();

        let settings = load_settings_from(&path).unwrap();
        assert_eq!(settings.driver.backend, BackendKind::Mock);
        assert_eq!(settings.driver.call_timeout_ms, None);
        assert_eq!(settings.logging.filter, "info");
    }

    /// Test: the deadline is read in milliseconds
    #[test]
    fn test_call_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE);
        fs::write(&path, r#"{"driver": {"backend": "ioctl", "call_timeout_ms": 1500}}"#).unwrap();

        let settings = load_settings_from(&path).unwrap();
        assert_eq!(settings.driver.backend, BackendKind::Ioctl);
        assert_eq!(settings.driver.call_timeout(), Some(Duration::from_millis(1500)));
    }

    /// Test: malformed JSON is an InvalidArgument from load_settings
    #[test]
    fn test_malformed_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE);
        fs::write(&path, "{ not json").unwrap();

        let err = load_settings_from(&path).unwrap_err();
        assert!(is_invalid_argument(&err));
        assert_eq!(err.op, op::LOAD_SETTINGS);
    }

    /// Test: a missing file is NotFound
    #[test]
    fn test_missing_settings() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_settings_from(&dir.path().join("absent.json")).unwrap_err();
        assert!(is_not_found(&err));
    }

    /// Test: the environment override wins, bad values are ignored
    #[test]
    fn test_backend_override() {
        let mut settings = Settings::default();
        assert_eq!(apply_env(&mut settings, Some("mock")), None);
        assert_eq!(settings.driver.backend, BackendKind::Mock);
        assert!(apply_env(&mut settings, Some("zfs-fuse")).is_some());
        assert_eq!(settings.driver.backend, BackendKind::Mock);
        assert_eq!(apply_env(&mut settings, None), None);
        assert_eq!(settings.driver.backend, BackendKind::Mock);
    }

    /// Test: a bad override is described with the value and the kept backend
    #[test]
    fn test_bad_backend_note() {
        let mut settings = Settings::default();
        settings.driver.backend = BackendKind::Ioctl;
        let note = apply_env(&mut settings, Some("zfs-fuse")).unwrap();
        assert!(note.contains(BACKEND_ENV));
        assert!(note.contains("unknown backend 'zfs-fuse'"));
        assert!(note.ends_with("keeping ioctl"));
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    /// Test: notes reach the installed subscriber as warnings
    #[test]
    fn test_notes_logged_as_warnings() {
        let mut settings = Settings::default();
        let note = apply_env(&mut settings, Some("zfs-fuse")).unwrap();

        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();
        tracing::subscriber::with_default(subscriber, || report_notes(&[note]));

        let output = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("WARN"));
        assert!(output.contains("unknown backend 'zfs-fuse'"));
    }

    /// Test: backend kinds display as their settings names
    #[test]
    fn test_backend_display() {
        assert_eq!(BackendKind::Libzfs.to_string(), "libzfs");
        assert_eq!(BackendKind::Mock.as_str(), "mock");
        assert_eq!("IOCTL".parse::<BackendKind>().unwrap().to_string(), "ioctl");
    }
}
