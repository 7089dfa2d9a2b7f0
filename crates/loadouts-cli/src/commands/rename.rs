use super::{json_pretty, open, parse_owner, parse_slot, store_error, EXIT_SUCCESS};
use loadouts_schema::{normalize_name, MAX_NAME_CHARS};
use std::path::Path;

pub fn run(
    config_path: &Path,
    owner: &str,
    slot: &str,
    name: &str,
    json: bool,
) -> Result<u8, String> {
    let owner = parse_owner(owner)?;
    let slot = parse_slot(slot)?;
    let name = normalize_name(name)
        .ok_or_else(|| format!("name must be 1 to {MAX_NAME_CHARS} characters"))?;
    let (_, repo) = open(config_path, json)?;

    let mut loadout = repo
        .get(owner, slot)
        .map_err(|e| store_error(&e))?
        .ok_or_else(|| format!("no loadout at slot {slot} for {}", owner.label()))?;
    let previous = loadout.label();
    loadout.display_name = Some(name.to_owned());
    loadout.touch();
    repo.save(&loadout).map_err(|e| store_error(&e))?;

    if json {
        let payload = serde_json::json!({
            "owner": owner.label(),
            "slot": slot.get(),
            "name": name,
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        println!("renamed slot {slot} of {}: '{previous}' → '{name}'", owner.label());
    }
    Ok(EXIT_SUCCESS)
}
