use super::EXIT_SUCCESS;
use clap::CommandFactory;
use std::path::{Path, PathBuf};

fn render_page(cmd: clap::Command, path: &Path) -> Result<(), String> {
    let mut buf = Vec::new();
    clap_mangen::Man::new(cmd)
        .render(&mut buf)
        .map_err(|e| format!("man page render failed: {e}"))?;
    std::fs::write(path, &buf).map_err(|e| format!("failed to write {}: {e}", path.display()))
}

/// `loadouts.1` plus one `loadouts-<sub>.1` per subcommand.
fn write_pages(cmd: &clap::Command, dir: &Path) -> Result<Vec<PathBuf>, String> {
    std::fs::create_dir_all(dir).map_err(|e| format!("failed to create dir: {e}"))?;
    let name = cmd.get_name().to_owned();
    let mut written = Vec::new();

    let path = dir.join(format!("{name}.1"));
    render_page(cmd.clone(), &path)?;
    written.push(path);

    for sub in cmd.get_subcommands() {
        let sub_name = format!("{name}-{}", sub.get_name());
        let path = dir.join(format!("{sub_name}.1"));
        render_page(sub.clone(), &path)?;
        written.push(path);
    }
    Ok(written)
}

pub fn run<C: CommandFactory>(dir: &Path) -> Result<u8, String> {
    let written = write_pages(&C::command(), dir)?;
    println!("{} man pages written to {}", written.len(), dir.display());
    Ok(EXIT_SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_page_per_subcommand() {
        let cmd = clap::Command::new("loadouts")
            .subcommand(clap::Command::new("list"))
            .subcommand(clap::Command::new("doctor"));
        let dir = tempfile::tempdir().unwrap();
        let written = write_pages(&cmd, dir.path()).unwrap();
        assert_eq!(written.len(), 3);
        assert!(dir.path().join("loadouts.1").exists());
        assert!(dir.path().join("loadouts-list.1").exists());
        assert!(dir.path().join("loadouts-doctor.1").exists());
    }
}
