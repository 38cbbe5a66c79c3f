use directories::ProjectDirs;
use std::path::PathBuf;

/// Centralized application directory resolution
pub struct AppDirs;

impl AppDirs {
    fn project() -> Option<ProjectDirs> {
        ProjectDirs::from("", "", "keyerdrill")
    }

    /// Session history, next to the config file.
    pub fn history_path() -> Option<PathBuf> {
        Self::project().map(|dirs| dirs.config_dir().join("history.csv"))
    }

    pub fn log_path() -> Option<PathBuf> {
        if let Ok(home) = std::env::var("HOME") {
            let state_dir = PathBuf::from(home)
                .join(".local")
                .join("state")
                .join("keyerdrill");
            Some(state_dir.join("keyerdrill.log"))
        } else {
            Self::project().map(|dirs| dirs.data_local_dir().join("keyerdrill.log"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_are_named_for_the_app() {
        if let Some(path) = AppDirs::log_path() {
            assert!(path.ends_with("keyerdrill/keyerdrill.log"));
        }
        if let Some(path) = AppDirs::history_path() {
            assert_eq!(path.file_name().unwrap(), "history.csv");
        }
    }
}
