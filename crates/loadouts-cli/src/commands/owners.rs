use super::{colorize_owner, json_pretty, open, store_error, EXIT_SUCCESS};
use std::path::Path;

pub fn run(config_path: &Path, json: bool) -> Result<u8, String> {
    let (_, repo) = open(config_path, json)?;
    let owners = repo.list_owners().map_err(|e| store_error(&e))?;
    let mut rows = Vec::with_capacity(owners.len());
    for owner in owners {
        let stored = repo.list_for_owner(owner).map_err(|e| store_error(&e))?.len();
        let applicable = repo.count_for_owner(owner).map_err(|e| store_error(&e))?;
        rows.push((owner, stored, applicable));
    }

    if json {
        let payload: Vec<_> = rows
            .iter()
            .map(|(owner, stored, applicable)| {
                serde_json::json!({
                    "owner": owner.label(),
                    "stored": stored,
                    "applicable": applicable,
                })
            })
            .collect();
        println!("{}", json_pretty(&payload)?);
    } else if rows.is_empty() {
        println!("no loadouts stored");
    } else {
        println!("{:<38} {:<8} APPLICABLE", "OWNER", "STORED");
        for (owner, stored, applicable) in &rows {
            println!("{} {stored:<8} {applicable}", colorize_owner(*owner, 38));
        }
    }
    Ok(EXIT_SUCCESS)
}
