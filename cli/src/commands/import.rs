use anyhow::{Context, Result, bail};
use std::path::Path;

use bakeplan_core::models::{NewRecipe, RecipeDetail, normalize_unit, validate_name};
use bakeplan_core::service::PlannerService;

use super::helpers::format_qty;

/// One ingredient pulled out of a Cooklang recipe.
#[derive(Debug, Clone, PartialEq)]
struct ImportedLine {
    name: String,
    qty: f64,
    /// Normalized unit, or `None` when the file gave no unit we recognize.
    unit: Option<String>,
    raw_unit: Option<String>,
}

pub(crate) fn cmd_recipe_import(
    svc: &PlannerService,
    file: &Path,
    title_override: Option<String>,
    category: &str,
    yield_override: Option<f64>,
    json: bool,
) -> Result<()> {
    let input = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read file: {}", file.display()))?;
    let detail = import_cooklang(svc, &input, file, title_override, category, yield_override)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&detail)?);
    } else {
        let title = &detail.recipe.title;
        let line_count = detail.lines.len();
        let yield_qty = format_qty(detail.recipe.yield_qty);
        let yield_unit = &detail.recipe.yield_unit;
        println!("Imported recipe: {title} ({line_count} lines, yields {yield_qty} {yield_unit})");
    }
    Ok(())
}

fn import_cooklang(
    svc: &PlannerService,
    input: &str,
    file: &Path,
    title_override: Option<String>,
    category: &str,
    yield_override: Option<f64>,
) -> Result<RecipeDetail> {
    let (recipe_data, _report) = cooklang::parse(input)
        .into_result()
        .map_err(|e| anyhow::anyhow!("Failed to parse Cooklang file: {e}"))?;

    let title = title_override
        .or_else(|| recipe_data.metadata.title().map(String::from))
        .or_else(|| file.file_stem().and_then(|s| s.to_str()).map(String::from))
        .context("Could not determine recipe title. Use --title to specify one")?;

    let yield_qty = yield_override
        .or_else(|| {
            recipe_data
                .metadata
                .servings()
                .and_then(|s| s.as_number().map(f64::from))
        })
        .unwrap_or(1.0);

    let converter = cooklang::Converter::default();
    let grouped = recipe_data.group_ingredients(&converter);
    let lines: Vec<ImportedLine> = grouped.iter().map(imported_line).collect();

    if lines.is_empty() {
        bail!("No ingredients found in recipe");
    }
    // Reject the whole file before anything is written
    for line in &lines {
        validate_name(&line.name)
            .with_context(|| format!("Invalid ingredient '{}'", line.name))?;
    }

    let recipe = svc.create_recipe(&NewRecipe::titled(&title, category, yield_qty))?;
    for line in &lines {
        if let (None, Some(raw)) = (&line.unit, &line.raw_unit) {
            let name = &line.name;
            eprintln!("Warning: Unknown unit '{raw}' for {name}, recording the quantity as units");
        }
        let unit = line.unit.as_deref().unwrap_or("unit");
        let ingredient = match svc.find_ingredient_by_name(&line.name)? {
            Some(existing) => existing,
            None => svc.add_ingredient(&line.name, unit)?,
        };
        svc.add_recipe_line(recipe.id, ingredient.id, line.qty, Some(unit))?;
    }
    tracing::info!(recipe_id = recipe.id, lines = lines.len(), "imported cooklang recipe");

    svc.get_recipe_detail(recipe.id)
}

fn imported_line(gi: &cooklang::ingredient_list::GroupedIngredient<'_>) -> ImportedLine {
    // Take the first quantity from the grouped quantities (if any)
    let (qty, raw_unit) =
        gi.quantity
            .iter()
            .next()
            .map_or((None, None), |qty: &cooklang::Quantity| {
                let value = match qty.value() {
                    cooklang::Value::Number(n) => Some(n.value()),
                    cooklang::Value::Range { start, .. } => Some(start.value()),
                    cooklang::Value::Text(t) => t.trim().parse::<f64>().ok(),
                };
                (value, qty.unit().map(String::from))
            });

    ImportedLine {
        name: gi.ingredient.display_name().to_string(),
        qty: qty.filter(|q| *q > 0.0).unwrap_or(1.0),
        unit: raw_unit.as_deref().and_then(|u| normalize_unit(u).ok()),
        raw_unit,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FOCACCIA: &str = "\
---
title: Weekend Focaccia
servings: 2
---

Mix @bread flour{500%g} with @water{400%ml} and @salt{2%tsp}.

Dimple with @olive oil{3%glugs} and top with @rosemary{}.
";

    fn line_for<'a>(detail: &'a RecipeDetail, name: &str) -> &'a bakeplan_core::models::RecipeLine {
        detail
            .lines
            .iter()
            .find(|l| l.ingredient_name.as_deref() == Some(name))
            .unwrap()
    }

    #[test]
    fn test_import_creates_recipe_and_lines() {
        let svc = PlannerService::new_in_memory().unwrap();
        let detail = import_cooklang(
            &svc,
            FOCACCIA,
            Path::new("focaccia.cook"),
            None,
            "bread",
            None,
        )
        .unwrap();

        assert_eq!(detail.recipe.title, "Weekend Focaccia");
        assert_eq!(detail.recipe.category, "bread");
        assert!((detail.recipe.yield_qty - 2.0).abs() < f64::EPSILON);
        assert_eq!(detail.lines.len(), 5);

        let flour = line_for(&detail, "bread flour");
        assert!((flour.qty - 500.0).abs() < f64::EPSILON);
        assert_eq!(flour.unit.as_deref(), Some("g"));
        assert_eq!(flour.canonical_unit.as_deref(), Some("g"));

        let salt = line_for(&detail, "salt");
        assert_eq!(salt.unit.as_deref(), Some("tsp"));

        // Unrecognized and missing units fall back to counting units
        let oil = line_for(&detail, "olive oil");
        assert_eq!(oil.unit.as_deref(), Some("unit"));
        assert!((oil.qty - 3.0).abs() < f64::EPSILON);
        let rosemary = line_for(&detail, "rosemary");
        assert!((rosemary.qty - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_import_reuses_existing_ingredients() {
        let svc = PlannerService::new_in_memory().unwrap();
        svc.seed_library_ingredients().unwrap();
        let shared_salt = svc.find_ingredient_by_name("Salt").unwrap().unwrap();

        let detail = import_cooklang(
            &svc,
            FOCACCIA,
            Path::new("focaccia.cook"),
            None,
            "bread",
            None,
        )
        .unwrap();

        let salt = line_for(&detail, "Salt");
        assert_eq!(salt.ingredient_id, shared_salt.id);
        // 2 tsp of a gram-based ingredient is a conversion gap, not a guess
        let gaps = svc
            .find_missing_conversions(&bakeplan_core::models::TagFilter::default())
            .unwrap();
        assert!(gaps.iter().any(|g| g.ingredient_id == shared_salt.id && g.from_unit == "tsp"));
    }

    #[test]
    fn test_import_overrides_and_file_stem_title() {
        let svc = PlannerService::new_in_memory().unwrap();
        let detail = import_cooklang(
            &svc,
            "Knead @rye flour{300%g}.\n",
            Path::new("recipes/dark-rye.cook"),
            None,
            "bread",
            Some(4.0),
        )
        .unwrap();
        assert_eq!(detail.recipe.title, "dark-rye");
        assert!((detail.recipe.yield_qty - 4.0).abs() < f64::EPSILON);

        let titled = import_cooklang(
            &svc,
            "Knead @rye flour{300%g}.\n",
            Path::new("dark-rye.cook"),
            Some("Dark Rye".to_string()),
            "bread",
            None,
        )
        .unwrap();
        assert_eq!(titled.recipe.title, "Dark Rye");
        assert!((titled.recipe.yield_qty - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_import_without_ingredients_fails() {
        let svc = PlannerService::new_in_memory().unwrap();
        let result = import_cooklang(
            &svc,
            "Preheat the oven.\n",
            Path::new("nothing.cook"),
            None,
            "other",
            None,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_import_with_invalid_ingredient_writes_nothing() {
        let svc = PlannerService::new_in_memory().unwrap();
        let result = import_cooklang(
            &svc,
            "Mix @bread flour{500%g} with @x{2%g}.\n",
            Path::new("loaf.cook"),
            None,
            "bread",
            None,
        );
        assert!(result.is_err());
        assert!(svc.get_recipe_by_title("loaf").is_err());
        assert!(
            svc.list_recipes(&bakeplan_core::models::RecipeFilter::all())
                .unwrap()
                .is_empty()
        );
        assert!(svc.find_ingredient_by_name("bread flour").unwrap().is_none());
    }

    #[test]
    fn test_import_file_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("focaccia.cook");
        std::fs::write(&path, FOCACCIA).unwrap();

        let svc = PlannerService::new_in_memory().unwrap();
        cmd_recipe_import(&svc, &path, None, "bread", None, true).unwrap();
        let recipe = svc.get_recipe_by_title("Weekend Focaccia").unwrap();
        assert_eq!(svc.get_recipe_detail(recipe.id).unwrap().lines.len(), 5);

        assert!(
            cmd_recipe_import(&svc, &dir.path().join("missing.cook"), None, "bread", None, true)
                .is_err()
        );
    }
}
