use super::{json_pretty, open, parse_owner, parse_slot, store_error, EXIT_SUCCESS};
use loadouts_schema::Loadout;
use std::path::Path;

fn print_loadout(loadout: &Loadout) {
    println!("owner:    {}", loadout.owner.label());
    println!("slot:     {}", loadout.slot);
    println!("name:     {}", loadout.label());
    println!(
        "created:  {}",
        loadout.created_at.format("%Y-%m-%d %H:%M:%S")
    );
    println!(
        "updated:  {}",
        loadout.updated_at.format("%Y-%m-%d %H:%M:%S")
    );

    if !loadout.assignments.is_empty() {
        println!("\nassignments:");
        for assignment in loadout.assignments.values() {
            let source = if assignment.is_catalog_item {
                "catalog"
            } else {
                "custom"
            };
            let category = assignment
                .category
                .as_ref()
                .map_or_else(String::new, |c| format!(" [{c}]"));
            let ammo = if assignment.ammo_amount > 0 {
                format!(", ammo {}", assignment.ammo_amount)
            } else {
                String::new()
            };
            println!(
                "  {:<12} {}{category} ({source}{ammo})",
                assignment.slot_type, assignment.item_ref
            );
        }
    }

    if !loadout.attachments.is_empty() {
        println!("\nattachments:");
        for (key, id) in &loadout.attachments {
            println!("  {key:<20} {id}");
        }
    }

    println!("\nitems: {}", loadout.item_count());
    for (index, item) in loadout.final_items.iter().enumerate() {
        if let Some(item) = item {
            let name = item
                .display_name()
                .map_or_else(String::new, |n| format!(" \"{n}\""));
            println!("  [{index:>2}] {} x{}{name}", item.kind(), item.amount());
        }
    }
}

pub fn run(config_path: &Path, owner: &str, slot: &str, json: bool) -> Result<u8, String> {
    let owner = parse_owner(owner)?;
    let slot = parse_slot(slot)?;
    let (_, repo) = open(config_path, json)?;
    let loadout = repo
        .get(owner, slot)
        .map_err(|e| store_error(&e))?
        .ok_or_else(|| format!("no loadout at slot {slot} for {}", owner.label()))?;

    if json {
        println!("{}", json_pretty(&loadout)?);
    } else {
        print_loadout(&loadout);
    }
    Ok(EXIT_SUCCESS)
}
