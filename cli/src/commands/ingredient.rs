use anyhow::Result;
use tabled::{
    Table, Tabled,
    settings::Style,
};

use bakeplan_core::models::Ingredient;
use bakeplan_core::service::PlannerService;

use super::helpers::{exit_not_found, truncate};

pub(crate) fn cmd_ingredient_add(
    svc: &PlannerService,
    name: &str,
    unit: &str,
    json: bool,
) -> Result<()> {
    let ingredient = svc.add_ingredient(name, unit)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&ingredient)?);
    } else {
        let id = ingredient.id;
        let name = &ingredient.name;
        let unit = &ingredient.canonical_unit;
        println!("Added ingredient: {name} (id: {id}, canonical unit: {unit})");
    }
    Ok(())
}

pub(crate) fn cmd_ingredient_list(
    svc: &PlannerService,
    search: Option<&str>,
    json: bool,
) -> Result<()> {
    let mut listing = svc.list_ingredients()?;
    if let Some(query) = search {
        let query = query.to_lowercase();
        listing.mine.retain(|i| i.name.to_lowercase().contains(&query));
        listing.shared.retain(|i| i.name.to_lowercase().contains(&query));
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&listing)?);
        return Ok(());
    }

    if listing.mine.is_empty() && listing.shared.is_empty() {
        exit_not_found(
            "No ingredients found. Seed the shared library with: bakeplan ingredient seed-defaults",
            false,
        );
    }

    println!("MY INGREDIENTS");
    if listing.mine.is_empty() {
        println!("  (none)");
    } else {
        print_ingredient_table(&listing.mine);
    }
    println!("\nSHARED LIBRARY");
    if listing.shared.is_empty() {
        println!("  (none)");
    } else {
        print_ingredient_table(&listing.shared);
    }
    Ok(())
}

fn print_ingredient_table(ingredients: &[Ingredient]) {
    #[derive(Tabled)]
    struct IngredientRow {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "Unit")]
        unit: String,
    }

    let rows: Vec<IngredientRow> = ingredients
        .iter()
        .map(|i| IngredientRow {
            id: i.id,
            name: truncate(&i.name, 35),
            unit: i.canonical_unit.clone(),
        })
        .collect();

    let table = Table::new(&rows).with(Style::rounded()).to_string();
    println!("{table}");
}

pub(crate) fn cmd_ingredient_delete(svc: &PlannerService, id: i64, json: bool) -> Result<()> {
    if svc.delete_ingredient(id)? {
        if json {
            println!("{}", serde_json::json!({ "deleted": id }));
        } else {
            println!("Deleted ingredient {id} (and its recipe lines and conversions)");
        }
        Ok(())
    } else {
        exit_not_found(
            &format!("Ingredient {id} not found among your ingredients"),
            json,
        );
    }
}

pub(crate) fn cmd_ingredient_seed(svc: &PlannerService, json: bool) -> Result<()> {
    let added = svc.seed_library_ingredients()?;
    if json {
        println!("{}", serde_json::json!({ "added": added }));
    } else if added == 0 {
        println!("Shared library already up to date");
    } else {
        println!("Added {added} shared ingredient(s)");
    }
    Ok(())
}
