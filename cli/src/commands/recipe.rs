use anyhow::Result;
use clap::Args;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use bakeplan_core::models::{NewRecipe, ProcessTimings, Recipe, RecipeFilter};
use bakeplan_core::service::PlannerService;

use super::helpers::{exit_not_found, format_qty, parse_list, print_totals_table, tag_filter, truncate};
use super::{resolve_ingredient, resolve_recipe};

/// Optional recipe fields shared by `recipe create` and `recipe update`.
#[derive(Args, Debug, Default)]
pub(crate) struct RecipeArgs {
    /// Category: bread, pastry, cookies, bagels, cakes, muffins, sourdough, other
    #[arg(short, long)]
    pub category: Option<String>,
    /// How many units one batch yields
    #[arg(long)]
    pub yield_qty: Option<f64>,
    /// What the yield counts, e.g. loaf or dozen (default: batch)
    #[arg(long)]
    pub yield_unit: Option<String>,
    /// Short description
    #[arg(long)]
    pub description: Option<String>,
    /// Method / instructions
    #[arg(long)]
    pub instructions: Option<String>,
    /// Bulk fermentation time in minutes
    #[arg(long)]
    pub fermentation_minutes: Option<i64>,
    /// Final proof time in minutes
    #[arg(long)]
    pub proof_minutes: Option<i64>,
    /// Oven temperature in Fahrenheit
    #[arg(long)]
    pub bake_temp_f: Option<i64>,
    /// Bake time in minutes
    #[arg(long)]
    pub bake_minutes: Option<i64>,
    /// Comma-separated allergen tags: gluten, dairy, eggs, nuts, soy, sesame
    #[arg(long)]
    pub allergens: Option<String>,
    /// Comma-separated dietary tags: vegetarian, vegan, `nut_free`, `dairy_free`, `egg_free`
    #[arg(long)]
    pub dietary: Option<String>,
}

impl RecipeArgs {
    /// Overwrite the fields of `recipe` that were given on the command line.
    fn apply(self, recipe: &mut NewRecipe) {
        if let Some(category) = self.category {
            recipe.category = category;
        }
        if let Some(yield_qty) = self.yield_qty {
            recipe.yield_qty = yield_qty;
        }
        if let Some(yield_unit) = self.yield_unit {
            recipe.yield_unit = yield_unit;
        }
        if self.description.is_some() {
            recipe.description = self.description;
        }
        if self.instructions.is_some() {
            recipe.instructions = self.instructions;
        }
        let timings = &mut recipe.timings;
        timings.fermentation_minutes = self.fermentation_minutes.or(timings.fermentation_minutes);
        timings.proof_minutes = self.proof_minutes.or(timings.proof_minutes);
        timings.bake_temp_f = self.bake_temp_f.or(timings.bake_temp_f);
        timings.bake_minutes = self.bake_minutes.or(timings.bake_minutes);
        if let Some(allergens) = self.allergens.as_deref() {
            recipe.allergen_tags = parse_list(Some(allergens));
        }
        if let Some(dietary) = self.dietary.as_deref() {
            recipe.dietary_tags = parse_list(Some(dietary));
        }
    }
}

fn editable(recipe: &Recipe) -> NewRecipe {
    NewRecipe {
        title: recipe.title.clone(),
        category: recipe.category.clone(),
        yield_qty: recipe.yield_qty,
        yield_unit: recipe.yield_unit.clone(),
        description: recipe.description.clone(),
        instructions: recipe.instructions.clone(),
        timings: recipe.timings.clone(),
        allergen_tags: recipe.allergen_tags.clone(),
        dietary_tags: recipe.dietary_tags.clone(),
    }
}

pub(crate) fn cmd_recipe_create(
    svc: &PlannerService,
    title: &str,
    args: RecipeArgs,
    json: bool,
) -> Result<()> {
    let mut new_recipe = NewRecipe::titled(title, "other", 1.0);
    args.apply(&mut new_recipe);
    let recipe = svc.create_recipe(&new_recipe)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&recipe)?);
    } else {
        let id = recipe.id;
        let title = &recipe.title;
        let yield_qty = format_qty(recipe.yield_qty);
        let yield_unit = &recipe.yield_unit;
        println!("Created recipe: {title} (id: {id}, yields {yield_qty} {yield_unit})");
        println!("Add ingredients with: bakeplan recipe add-line \"{title}\" <ingredient> <qty>");
    }
    Ok(())
}

pub(crate) fn cmd_recipe_update(
    svc: &PlannerService,
    reference: &str,
    title: Option<String>,
    args: RecipeArgs,
    json: bool,
) -> Result<()> {
    let existing = resolve_recipe(svc, reference)?;
    let mut changes = editable(&existing);
    if let Some(title) = title {
        changes.title = title;
    }
    args.apply(&mut changes);
    let recipe = svc.update_recipe(existing.id, &changes)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&recipe)?);
    } else {
        let title = &recipe.title;
        let id = recipe.id;
        println!("Updated recipe: {title} (id: {id})");
    }
    Ok(())
}

pub(crate) fn cmd_recipe_show(svc: &PlannerService, reference: &str, json: bool) -> Result<()> {
    let recipe = resolve_recipe(svc, reference)?;
    let detail = svc.get_recipe_detail(recipe.id)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&detail)?);
        return Ok(());
    }

    let r = &detail.recipe;
    let title = &r.title;
    let archived = if r.is_archived() { " [archived]" } else { "" };
    println!("=== {title}{archived} ===");
    let category = &r.category;
    let yield_qty = format_qty(r.yield_qty);
    let yield_unit = &r.yield_unit;
    println!("  Category: {category}  |  Yields: {yield_qty} {yield_unit}");
    if let Some(timing) = describe_timings(&r.timings) {
        println!("  {timing}");
    }
    if !r.allergen_tags.is_empty() {
        println!("  Allergens: {}", r.allergen_tags.join(", "));
    }
    if !r.dietary_tags.is_empty() {
        println!("  Dietary: {}", r.dietary_tags.join(", "));
    }
    if let Some(description) = &r.description {
        println!("\n  {description}");
    }

    println!("\n  INGREDIENTS:");
    if detail.lines.is_empty() {
        println!("    (none)");
    }
    for line in &detail.lines {
        let id = line.id;
        let name = line.ingredient_name.as_deref().unwrap_or("?");
        let qty = format_qty(line.qty);
        let unit = line
            .unit
            .as_deref()
            .or(line.canonical_unit.as_deref())
            .unwrap_or("");
        println!("    [{id}] {name}: {qty} {unit}");
    }

    if let Some(instructions) = &r.instructions {
        println!("\n  METHOD:\n    {instructions}");
    }
    Ok(())
}

fn describe_timings(t: &ProcessTimings) -> Option<String> {
    let mut parts = Vec::new();
    if let Some(m) = t.fermentation_minutes {
        parts.push(format!("Ferment: {m} min"));
    }
    if let Some(m) = t.proof_minutes {
        parts.push(format!("Proof: {m} min"));
    }
    match (t.bake_temp_f, t.bake_minutes) {
        (Some(temp), Some(m)) => parts.push(format!("Bake: {m} min at {temp}°F")),
        (Some(temp), None) => parts.push(format!("Bake at {temp}°F")),
        (None, Some(m)) => parts.push(format!("Bake: {m} min")),
        (None, None) => {}
    }
    (!parts.is_empty()).then(|| parts.join("  |  "))
}

pub(crate) fn cmd_recipe_list(
    svc: &PlannerService,
    category: Option<String>,
    allergens: Option<&str>,
    dietary: Option<&str>,
    include_archived: bool,
    json: bool,
) -> Result<()> {
    #[derive(Tabled)]
    struct RecipeRow {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "Title")]
        title: String,
        #[tabled(rename = "Category")]
        category: String,
        #[tabled(rename = "Yield")]
        yield_: String,
        #[tabled(rename = "Tags")]
        tags: String,
        #[tabled(rename = "Status")]
        status: &'static str,
    }

    let filter = RecipeFilter {
        include_archived,
        category,
        tags: tag_filter(allergens, dietary),
    };
    let recipes = svc.list_recipes(&filter)?;
    if recipes.is_empty() {
        if json {
            println!("[]");
        } else {
            eprintln!("No recipes found");
        }
        std::process::exit(2);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&recipes)?);
        return Ok(());
    }

    let rows: Vec<RecipeRow> = recipes
        .iter()
        .map(|r| RecipeRow {
            id: r.id,
            title: truncate(&r.title, 30),
            category: r.category.clone(),
            yield_: format!("{} {}", format_qty(r.yield_qty), r.yield_unit),
            tags: truncate(
                &r.allergen_tags
                    .iter()
                    .chain(&r.dietary_tags)
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(", "),
                30,
            ),
            status: if r.is_archived() { "archived" } else { "active" },
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::single(3)).with(Alignment::right()))
        .to_string();
    println!("{table}");
    Ok(())
}

pub(crate) fn cmd_recipe_archive(
    svc: &PlannerService,
    reference: &str,
    archived: bool,
    json: bool,
) -> Result<()> {
    let recipe = resolve_recipe(svc, reference)?;
    let changed = if archived {
        svc.archive_recipe(recipe.id)?
    } else {
        svc.restore_recipe(recipe.id)?
    };
    if !changed {
        exit_not_found(&format!("Recipe {} not found", recipe.id), json);
    }
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&svc.get_recipe(recipe.id)?)?
        );
    } else {
        let title = &recipe.title;
        let action = if archived { "Archived" } else { "Restored" };
        println!("{action} recipe: {title}");
    }
    Ok(())
}

pub(crate) fn cmd_recipe_delete(svc: &PlannerService, reference: &str, json: bool) -> Result<()> {
    let recipe = resolve_recipe(svc, reference)?;
    svc.delete_recipe(recipe.id)?;
    if json {
        println!("{}", serde_json::json!({ "deleted": recipe.id }));
    } else {
        let title = &recipe.title;
        println!("Deleted recipe: {title} (removed from any weekly plans)");
    }
    Ok(())
}

/// Add a line to a recipe. An ingredient given by a name that does not exist
/// yet is created, with `canonical_unit` (or the line's unit) as its unit.
pub(crate) fn cmd_recipe_add_line(
    svc: &PlannerService,
    recipe_ref: &str,
    ingredient_ref: &str,
    qty: f64,
    unit: Option<&str>,
    canonical_unit: Option<&str>,
    json: bool,
) -> Result<()> {
    let recipe = resolve_recipe(svc, recipe_ref)?;
    let line = match resolve_ingredient(svc, ingredient_ref) {
        Ok(ingredient) => svc.add_recipe_line(recipe.id, ingredient.id, qty, unit)?,
        Err(_) if ingredient_ref.trim().parse::<i64>().is_err() => {
            let canonical = canonical_unit.or(unit).unwrap_or("g");
            let (ingredient, line) = svc.add_recipe_line_with_new_ingredient(
                recipe.id,
                ingredient_ref,
                canonical,
                qty,
                unit,
            )?;
            if !json {
                let name = &ingredient.name;
                let unit = &ingredient.canonical_unit;
                println!("Created ingredient: {name} (canonical unit: {unit})");
            }
            line
        }
        Err(e) => return Err(e),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&line)?);
    } else {
        let name = line.ingredient_name.as_deref().unwrap_or("?");
        let qty = format_qty(line.qty);
        let unit = line
            .unit
            .as_deref()
            .or(line.canonical_unit.as_deref())
            .unwrap_or("");
        let title = &recipe.title;
        println!("Added {qty} {unit} {name} to {title}");
    }
    Ok(())
}

pub(crate) fn cmd_recipe_remove_line(
    svc: &PlannerService,
    recipe_ref: &str,
    line_id: i64,
    json: bool,
) -> Result<()> {
    let recipe = resolve_recipe(svc, recipe_ref)?;
    if svc.remove_recipe_line(recipe.id, line_id)? {
        if json {
            println!("{}", serde_json::json!({ "removed": line_id }));
        } else {
            let title = &recipe.title;
            println!("Removed line {line_id} from {title}");
        }
        Ok(())
    } else {
        exit_not_found(&format!("Line {line_id} not found in recipe"), json);
    }
}

pub(crate) fn cmd_recipe_scale(
    svc: &PlannerService,
    reference: &str,
    target: f64,
    json: bool,
) -> Result<()> {
    let recipe = resolve_recipe(svc, reference)?;
    let scaled = svc.scaled_recipe(recipe.id, target)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&scaled)?);
        return Ok(());
    }

    let title = &scaled.title;
    let from = format_qty(scaled.yield_qty);
    let to = format_qty(scaled.target_qty);
    let unit = &scaled.yield_unit;
    let factor = format_qty(scaled.factor);
    println!("=== {title}: {from} -> {to} {unit} (x{factor}) ===\n");
    for line in &scaled.lines {
        let name = line.ingredient_name.as_deref().unwrap_or("?");
        let qty = format_qty(line.qty);
        let unit = line
            .unit
            .as_deref()
            .or(line.canonical_unit.as_deref())
            .unwrap_or("");
        println!("  {name}: {qty} {unit}");
    }
    if !scaled.totals.is_empty() {
        println!("\n  TOTALS (canonical units):");
        print_totals_table(&scaled.totals);
    }
    Ok(())
}
