use super::{colorize_items, json_pretty, open, parse_owner, store_error, EXIT_SUCCESS};
use loadouts_core::LoadoutSummary;
use std::path::Path;

pub fn run(config_path: &Path, owner: &str, json: bool) -> Result<u8, String> {
    let owner = parse_owner(owner)?;
    let (_, repo) = open(config_path, json)?;
    let loadouts = repo.list_for_owner(owner).map_err(|e| store_error(&e))?;
    let summaries: Vec<LoadoutSummary> = loadouts.iter().map(LoadoutSummary::from).collect();

    if json {
        let payload = serde_json::json!({
            "owner": owner.label(),
            "loadouts": summaries,
        });
        println!("{}", json_pretty(&payload)?);
    } else if summaries.is_empty() {
        println!("no loadouts stored for {}", owner.label());
    } else {
        println!("{:<6} {:<34} {:<8} UPDATED", "SLOT", "NAME", "ITEMS");
        for summary in &summaries {
            println!(
                "{:<6} {:<34} {} {}",
                summary.slot,
                summary.label,
                colorize_items(summary.item_count, 8),
                summary.updated_at.format("%Y-%m-%d %H:%M:%S")
            );
        }
    }
    Ok(EXIT_SUCCESS)
}
