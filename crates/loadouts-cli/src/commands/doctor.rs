use super::{base_dir, load_config, EXIT_FAILURE, EXIT_SUCCESS};
use loadouts_core::journal::LOCK_FILE;
use loadouts_core::{BackupJournal, JournalLock};
use loadouts_schema::LoadoutsConfig;
use loadouts_store::{open_repository, LoadoutRepository};
use serde::Serialize;
use std::path::Path;

pub fn run(config_path: &Path, json_output: bool) -> Result<u8, String> {
    let mut checks: Vec<Check> = Vec::new();
    let mut all_pass = true;

    match load_config(config_path) {
        Ok(config) => {
            checks.push(Check::pass(
                "config",
                &format!("Config {} is valid", config_path.display()),
            ));
            let base = base_dir(config_path);
            check_repository(&config, &base, &mut checks, &mut all_pass);
            check_journal(&config, &base, &mut checks, &mut all_pass);
        }
        Err(e) => {
            all_pass = false;
            checks.push(Check::fail("config", &e));
        }
    }

    print_results(&checks, all_pass, json_output)
}

fn check_repository(
    config: &LoadoutsConfig,
    base: &Path,
    checks: &mut Vec<Check>,
    all_pass: &mut bool,
) {
    let repo = match open_repository(&config.database, base) {
        Ok(repo) => {
            checks.push(Check::pass(
                "database",
                &format!("{} database is reachable", repo.backend_name()),
            ));
            repo
        }
        Err(e) => {
            *all_pass = false;
            checks.push(Check::fail(
                "database",
                &format!("Cannot open {} database: {e}", config.database.backend),
            ));
            return;
        }
    };
    report_owners(repo.as_ref(), config.max_loadouts, checks);
}

fn report_owners(repo: &dyn LoadoutRepository, max_loadouts: u8, checks: &mut Vec<Check>) {
    let owners = match repo.list_owners() {
        Ok(owners) => owners,
        Err(e) => {
            checks.push(Check::warn("owners", &format!("Cannot list owners: {e}")));
            return;
        }
    };
    let mut stored = 0usize;
    let mut hidden = 0usize;
    for owner in &owners {
        match repo.list_for_owner(*owner) {
            Ok(loadouts) => {
                stored += loadouts.len();
                hidden += loadouts
                    .iter()
                    .filter(|l| l.slot.get() > max_loadouts)
                    .count();
            }
            Err(e) => {
                checks.push(Check::warn(
                    "owners",
                    &format!("Cannot read loadouts of {}: {e}", owner.label()),
                ));
                return;
            }
        }
    }
    checks.push(Check::info(
        "owners",
        &format!("{stored} loadouts stored for {} owners", owners.len()),
    ));
    if hidden > 0 {
        checks.push(Check::warn(
            "max_loadouts",
            &format!("{hidden} loadouts sit above max_loadouts = {max_loadouts} and are hidden"),
        ));
    }
}

fn check_journal(
    config: &LoadoutsConfig,
    base: &Path,
    checks: &mut Vec<Check>,
    all_pass: &mut bool,
) {
    let Some(dir) = &config.journal.dir else {
        checks.push(Check::info(
            "journal",
            "Crash journal disabled (edit-mode backups live in memory only)",
        ));
        return;
    };
    let dir = if dir.is_absolute() {
        dir.clone()
    } else {
        base.join(dir)
    };
    if !dir.exists() {
        checks.push(Check::info(
            "journal",
            &format!("Journal {} not created yet", dir.display()),
        ));
        return;
    }

    match BackupJournal::inspect(&dir) {
        Ok(report) => {
            if report.entries.is_empty() {
                checks.push(Check::pass("journal", "No inventory backups pending"));
            } else {
                checks.push(Check::warn(
                    "journal",
                    &format!(
                        "{} inventory backups pending (restored when their users join)",
                        report.entries.len()
                    ),
                ));
            }
            if !report.corrupt.is_empty() {
                *all_pass = false;
                checks.push(Check::fail(
                    "journal_entries",
                    &format!(
                        "{} unreadable journal entries, first: {}",
                        report.corrupt.len(),
                        report.corrupt[0].display()
                    ),
                ));
            }
        }
        Err(e) => {
            *all_pass = false;
            checks.push(Check::fail("journal", &format!("Cannot read journal: {e}")));
        }
    }

    match JournalLock::try_acquire(&dir.join(LOCK_FILE)) {
        Ok(Some(_)) => checks.push(Check::pass("journal_lock", "Journal lock is free")),
        Ok(None) => checks.push(Check::info(
            "journal_lock",
            "Journal is held by a running service",
        )),
        Err(e) => {
            *all_pass = false;
            checks.push(Check::fail(
                "journal_lock",
                &format!("Cannot check journal lock: {e}"),
            ));
        }
    }
}

fn print_results(checks: &[Check], all_pass: bool, json_output: bool) -> Result<u8, String> {
    if json_output {
        let json = serde_json::json!({
            "healthy": all_pass,
            "checks": checks,
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&json).map_err(|e| e.to_string())?
        );
    } else {
        println!("Loadouts Doctor\n");
        for check in checks {
            let icon = match check.status {
                Status::Pass => "✓",
                Status::Fail => "✗",
                Status::Warn => "⚠",
                Status::Info => "ℹ",
            };
            println!("  {icon} {}", check.message);
        }
        println!();
        if all_pass {
            println!("All checks passed.");
        } else {
            println!("Some checks failed. See above for details.");
        }
    }
    Ok(if all_pass { EXIT_SUCCESS } else { EXIT_FAILURE })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
enum Status {
    Pass,
    Fail,
    Warn,
    Info,
}

#[derive(Debug, Serialize)]
struct Check {
    name: String,
    status: Status,
    message: String,
}

impl Check {
    fn new(name: &str, status: Status, message: &str) -> Self {
        Self {
            name: name.to_owned(),
            status,
            message: message.to_owned(),
        }
    }

    fn pass(name: &str, message: &str) -> Self {
        Self::new(name, Status::Pass, message)
    }

    fn fail(name: &str, message: &str) -> Self {
        Self::new(name, Status::Fail, message)
    }

    fn warn(name: &str, message: &str) -> Self {
        Self::new(name, Status::Warn, message)
    }

    fn info(name: &str, message: &str) -> Self {
        Self::new(name, Status::Info, message)
    }
}
