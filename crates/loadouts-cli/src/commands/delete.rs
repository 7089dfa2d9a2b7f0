use super::{json_pretty, open, parse_owner, parse_slot, store_error, EXIT_SUCCESS};
use dialoguer::Confirm;
use std::io::{stderr, stdin, IsTerminal};
use std::path::Path;
use tracing::info;

pub fn run(config_path: &Path, owner: &str, slot: &str, yes: bool, json: bool) -> Result<u8, String> {
    let owner = parse_owner(owner)?;
    let slot = parse_slot(slot)?;
    let (_, repo) = open(config_path, json)?;

    let existing = repo
        .get(owner, slot)
        .map_err(|e| store_error(&e))?
        .ok_or_else(|| format!("no loadout at slot {slot} for {}", owner.label()))?;

    if !yes {
        if !(stdin().is_terminal() && stderr().is_terminal()) {
            return Err("refusing to delete without --yes when not on a terminal".to_owned());
        }
        let confirmed = Confirm::new()
            .with_prompt(format!(
                "delete '{}' (slot {slot}) of {}?",
                existing.label(),
                owner.label()
            ))
            .default(false)
            .interact()
            .map_err(|e| format!("prompt failed: {e}"))?;
        if !confirmed {
            return Err("delete cancelled".to_owned());
        }
    }

    let removed = repo.delete(owner, slot).map_err(|e| store_error(&e))?;
    info!("deleted loadout {} slot {slot}: {removed}", owner.label());

    if json {
        let payload = serde_json::json!({
            "owner": owner.label(),
            "slot": slot.get(),
            "deleted": removed,
        });
        println!("{}", json_pretty(&payload)?);
    } else if removed {
        println!("deleted '{}' (slot {slot}) of {}", existing.label(), owner.label());
    } else {
        println!("slot {slot} of {} was already empty", owner.label());
    }
    Ok(EXIT_SUCCESS)
}
