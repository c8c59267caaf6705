use std::env;
use std::path::PathBuf;

const APP_DIR_NAME: &str = "appshell";

/// Return the user's home directory path.
///
/// Uses HOME on Unix-like systems and USERPROFILE on Windows.
pub fn get_home_dir() -> Option<PathBuf> {
    ["HOME", "USERPROFILE"]
        .iter()
        .filter_map(|key| env::var(key).ok())
        .find(|value| !value.is_empty())
        .map(PathBuf::from)
}

/// Default location for config and credentials: `~/.config/appshell`.
pub fn default_config_dir() -> Option<PathBuf> {
    get_home_dir().map(|home| home.join(".config").join(APP_DIR_NAME))
}
