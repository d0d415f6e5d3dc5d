use lmc_distribution::AllocationMode;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const PREFERENCES_FILE: &str = "preferences.json";

/// Remembered between runs so the distribution dialog opens where the user
/// left it. Losing this file costs nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preferences {
    #[serde(default)]
    pub last_mode: Option<AllocationMode>,
    #[serde(default)]
    pub agents: Vec<String>,
}

pub fn preferences_path(state_dir: &Path) -> PathBuf {
    state_dir.join(PREFERENCES_FILE)
}

/// Missing or unreadable preferences fall back to defaults.
pub fn load(state_dir: &Path) -> Preferences {
    let path = preferences_path(state_dir);
    let content = match fs::read_to_string(&path) {
        Ok(content) => content,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Preferences::default(),
        Err(err) => {
            warn!(event = "prefs_read_failed", path = %path.display(), error = %err);
            return Preferences::default();
        }
    };
    match serde_json::from_str(&content) {
        Ok(prefs) => prefs,
        Err(err) => {
            warn!(event = "prefs_parse_failed", path = %path.display(), error = %err);
            Preferences::default()
        }
    }
}

/// Best effort: failures are logged and otherwise ignored.
pub fn save(state_dir: &Path, prefs: &Preferences) {
    match write(state_dir, prefs) {
        Ok(path) => debug!(event = "prefs_saved", path = %path.display()),
        Err(err) => warn!(event = "prefs_write_failed", dir = %state_dir.display(), error = %err),
    }
}

fn write(state_dir: &Path, prefs: &Preferences) -> io::Result<PathBuf> {
    fs::create_dir_all(state_dir)?;
    let path = preferences_path(state_dir);
    let payload = serde_json::to_string_pretty(prefs).map_err(io::Error::other)?;
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, payload)?;
    fs::rename(&tmp_path, &path)?;
    Ok(path)
}
