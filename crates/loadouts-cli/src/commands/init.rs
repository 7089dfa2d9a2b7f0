use super::{json_pretty, EXIT_SUCCESS};
use dialoguer::Confirm;
use loadouts_schema::{parse_config_str, STARTER_CONFIG};
use std::io::{stderr, stdin, IsTerminal, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

fn write_atomic(dest: &Path, content: &str) -> Result<(), String> {
    let dir = match dest.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir)
        .map_err(|e| format!("failed to create {}: {e}", dir.display()))?;
    let mut tmp = NamedTempFile::new_in(&dir).map_err(|e| format!("write temp file: {e}"))?;
    tmp.write_all(content.as_bytes())
        .map_err(|e| format!("write temp file: {e}"))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| format!("fsync temp file: {e}"))?;
    tmp.persist(dest)
        .map_err(|e| format!("persist config: {}", e.error))?;
    Ok(())
}

fn ensure_can_write(dest: &Path, force: bool, is_tty: bool) -> Result<(), String> {
    if !dest.exists() || force {
        return Ok(());
    }
    let refusal = || {
        format!(
            "refusing to overwrite existing {} (pass --force)",
            dest.display()
        )
    };
    if !is_tty {
        return Err(refusal());
    }
    let overwrite = Confirm::new()
        .with_prompt(format!("overwrite {}?", dest.display()))
        .default(false)
        .interact()
        .map_err(|e| format!("prompt failed: {e}"))?;
    if overwrite {
        Ok(())
    } else {
        Err(refusal())
    }
}

pub fn run(dest: &Path, force: bool, json: bool) -> Result<u8, String> {
    let is_tty = stdin().is_terminal() && stderr().is_terminal();
    ensure_can_write(dest, force, is_tty)?;
    // Never write a file the service would then reject.
    let config = parse_config_str(STARTER_CONFIG).map_err(|e| e.to_string())?;
    write_atomic(dest, STARTER_CONFIG)?;

    if json {
        let payload = serde_json::json!({
            "status": "written",
            "path": dest.display().to_string(),
            "backend": config.database.backend.to_string(),
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        println!("wrote {}", dest.display());
        println!("backend: {}", config.database.backend);
    }
    Ok(EXIT_SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_starter_config() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("loadouts.toml");
        assert_eq!(run(&dest, false, true).unwrap(), EXIT_SUCCESS);
        let written = std::fs::read_to_string(&dest).unwrap();
        assert_eq!(written, STARTER_CONFIG);
    }

    #[test]
    fn refuses_overwrite_without_tty_or_force() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("loadouts.toml");
        std::fs::write(&dest, "max_loadouts = 3\n").unwrap();
        let err = ensure_can_write(&dest, false, false).unwrap_err();
        assert!(err.contains("--force"));
        assert!(ensure_can_write(&dest, true, false).is_ok());
    }

    #[test]
    fn force_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("loadouts.toml");
        std::fs::write(&dest, "max_loadouts = 3\n").unwrap();
        run(&dest, true, true).unwrap();
        assert_eq!(std::fs::read_to_string(&dest).unwrap(), STARTER_CONFIG);
    }
}
