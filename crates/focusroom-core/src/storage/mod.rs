mod config;
pub mod database;

pub use config::{Config, NotificationsConfig, ScheduleConfig};
pub use database::{Database, Stats, TimeLog, TimeLogKind};

use std::path::PathBuf;

/// Returns `~/.config/focusroom[-dev]/` based on FOCUSROOM_ENV.
///
/// Set FOCUSROOM_ENV=dev to use development data directory.
/// Set FOCUSROOM_DATA_DIR to use an explicit directory instead.
///
/// # Errors
/// Returns an error if creating the config directory fails.
pub fn data_dir() -> Result<PathBuf, std::io::Error> {
    let dir = match std::env::var_os("FOCUSROOM_DATA_DIR") {
        Some(explicit) => PathBuf::from(explicit),
        None => {
            let base_dir = dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".config");
            let env =
                std::env::var("FOCUSROOM_ENV").unwrap_or_else(|_| "production".to_string());
            if env == "dev" {
                base_dir.join("focusroom-dev")
            } else {
                base_dir.join("focusroom")
            }
        }
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}
