use super::{json_pretty, open, parse_owner, store_error, EXIT_SUCCESS};
use std::path::Path;

pub fn run(config_path: &Path, owner: &str, json: bool) -> Result<u8, String> {
    let owner = parse_owner(owner)?;
    let (config, repo) = open(config_path, json)?;
    let count = repo.count_for_owner(owner).map_err(|e| store_error(&e))?;

    if json {
        let payload = serde_json::json!({
            "owner": owner.label(),
            "count": count,
            "max_loadouts": config.max_loadouts,
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        println!("{count}");
    }
    Ok(EXIT_SUCCESS)
}
