pub mod completions;
pub mod count;
pub mod delete;
pub mod doctor;
pub mod init;
pub mod list;
pub mod man_pages;
pub mod owners;
pub mod rename;
pub mod show;

use indicatif::{ProgressBar, ProgressStyle};
use loadouts_schema::{parse_config_file, DatabaseBackend, LoadoutsConfig, OwnerId, SlotNumber};
use loadouts_store::{open_repository, LoadoutRepository, StoreError};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_CONFIG_ERROR: u8 = 2;
pub const EXIT_STORE_ERROR: u8 = 3;

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialization failed: {e}"))
}

pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    pb.set_message(msg.to_owned());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

fn finish_style() -> ProgressStyle {
    ProgressStyle::with_template("{msg}").unwrap_or_else(|_| ProgressStyle::default_spinner())
}

pub fn spin_ok(pb: &ProgressBar, msg: &str) {
    pb.set_style(finish_style());
    pb.finish_with_message(format!("✓ {msg}"));
}

pub fn spin_fail(pb: &ProgressBar, msg: &str) {
    pb.set_style(finish_style());
    pb.finish_with_message(format!("✗ {msg}"));
}

/// Owner column padded to `width`; the shared loadouts stand out.
pub fn colorize_owner(owner: OwnerId, width: usize) -> String {
    use console::Style;
    let label = format!("{:<width$}", owner.label());
    if owner.is_global() {
        Style::new().magenta().bold().apply_to(label).to_string()
    } else {
        label
    }
}

pub fn colorize_items(count: usize, width: usize) -> String {
    use console::Style;
    if count == 0 {
        Style::new().dim().apply_to(format!("{:<width$}", "empty")).to_string()
    } else {
        Style::new().green().apply_to(format!("{count:<width$}")).to_string()
    }
}

pub fn store_error(e: &StoreError) -> String {
    format!("store error: {e}")
}

pub fn parse_owner(input: &str) -> Result<OwnerId, String> {
    input.parse().map_err(|e| format!("{e}"))
}

pub fn parse_slot(input: &str) -> Result<SlotNumber, String> {
    input.parse().map_err(|e| format!("{e}"))
}

/// Directory relative paths in the config are resolved against.
pub fn base_dir(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

pub fn load_config(config_path: &Path) -> Result<LoadoutsConfig, String> {
    parse_config_file(config_path).map_err(|e| e.to_string())
}

/// Parse the config and connect to its repository.
pub fn open(
    config_path: &Path,
    json: bool,
) -> Result<(LoadoutsConfig, Arc<dyn LoadoutRepository>), String> {
    let config = load_config(config_path)?;
    let base = base_dir(config_path);
    let repo = if config.database.backend == DatabaseBackend::Mysql && !json {
        let pb = spinner(&format!(
            "connecting to mysql at {}:{}...",
            config.database.mysql.host, config.database.mysql.port
        ));
        match open_repository(&config.database, &base) {
            Ok(repo) => {
                spin_ok(&pb, "connected");
                repo
            }
            Err(e) => {
                spin_fail(&pb, "connection failed");
                return Err(store_error(&e));
            }
        }
    } else {
        open_repository(&config.database, &base).map_err(|e| store_error(&e))?
    };
    Ok((config, repo))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_pretty_serializes_object() {
        let val = serde_json::json!({"slot": 1});
        let result = json_pretty(&val).unwrap();
        assert!(result.contains("\"slot\""));
    }

    #[test]
    fn colorize_owner_keeps_label() {
        assert!(colorize_owner(OwnerId::GLOBAL, 10).contains("global    "));
    }

    #[test]
    fn colorize_items_empty() {
        assert!(colorize_items(0, 8).contains("empty"));
        assert!(colorize_items(7, 8).contains('7'));
    }

    #[test]
    fn parse_owner_accepts_global_and_uuid() {
        assert!(parse_owner("global").unwrap().is_global());
        assert!(!parse_owner("67e55044-10b1-426f-9247-bb680e5fe0c8")
            .unwrap()
            .is_global());
        assert!(parse_owner("steve").is_err());
    }

    #[test]
    fn parse_slot_range() {
        assert_eq!(parse_slot("3").unwrap().get(), 3);
        assert!(parse_slot("0").is_err());
        assert!(parse_slot("6").is_err());
        assert!(parse_slot("x").is_err());
    }

    #[test]
    fn base_dir_of_bare_file_is_cwd() {
        assert_eq!(base_dir(Path::new("loadouts.toml")), PathBuf::from("."));
        assert_eq!(
            base_dir(Path::new("/srv/game/loadouts.toml")),
            PathBuf::from("/srv/game")
        );
    }

    #[test]
    fn missing_config_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = open(&dir.path().join("absent.toml"), true).err().unwrap();
        assert!(err.starts_with("failed to read config"));
    }

    #[test]
    fn exit_codes_are_distinct() {
        assert_ne!(EXIT_SUCCESS, EXIT_FAILURE);
        assert_ne!(EXIT_FAILURE, EXIT_CONFIG_ERROR);
        assert_ne!(EXIT_CONFIG_ERROR, EXIT_STORE_ERROR);
    }

    #[test]
    fn spinner_finishes() {
        let pb = spinner("testing...");
        spin_ok(&pb, "done");
        let pb = spinner("testing...");
        spin_fail(&pb, "failed");
    }
}
