use anyhow::Result;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use bakeplan_core::service::PlannerService;

use super::helpers::{exit_not_found, format_qty, tag_filter, truncate};
use super::resolve_ingredient;

/// Register how many of the ingredient's `to_unit` one `from_unit` is.
/// `to_unit` defaults to the ingredient's canonical unit.
pub(crate) fn cmd_conversion_add(
    svc: &PlannerService,
    ingredient_ref: &str,
    from_unit: &str,
    factor: f64,
    to_unit: Option<&str>,
    json: bool,
) -> Result<()> {
    let ingredient = resolve_ingredient(svc, ingredient_ref)?;
    let to_unit = to_unit.unwrap_or(ingredient.canonical_unit.as_str());
    let conversion = svc.add_conversion(ingredient.id, from_unit, to_unit, factor)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&conversion)?);
    } else {
        let name = &ingredient.name;
        let from = &conversion.from_unit;
        let to = &conversion.to_unit;
        let factor = format_qty(conversion.factor);
        println!("Saved conversion: 1 {from} {name} = {factor} {to}");
        if conversion.to_unit != ingredient.canonical_unit {
            let canonical = &ingredient.canonical_unit;
            eprintln!(
                "Note: totals are kept in {canonical}; only conversions into {canonical} are used"
            );
        }
    }
    Ok(())
}

pub(crate) fn cmd_conversion_list(
    svc: &PlannerService,
    ingredient_ref: Option<&str>,
    json: bool,
) -> Result<()> {
    #[derive(Tabled)]
    struct ConversionRow {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "Ingredient")]
        ingredient: String,
        #[tabled(rename = "From")]
        from: String,
        #[tabled(rename = "To")]
        to: String,
        #[tabled(rename = "Factor")]
        factor: String,
    }

    let ingredient_id = match ingredient_ref {
        Some(reference) => Some(resolve_ingredient(svc, reference)?.id),
        None => None,
    };
    let conversions = svc.list_conversions(ingredient_id)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&conversions)?);
        return Ok(());
    }
    if conversions.is_empty() {
        exit_not_found("No conversions found", false);
    }

    let rows: Vec<ConversionRow> = conversions
        .iter()
        .map(|c| ConversionRow {
            id: c.id,
            ingredient: truncate(c.ingredient_name.as_deref().unwrap_or("?"), 35),
            from: c.from_unit.clone(),
            to: c.to_unit.clone(),
            factor: format_qty(c.factor),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(4..)).with(Alignment::right()))
        .to_string();
    println!("{table}");
    Ok(())
}

pub(crate) fn cmd_conversion_delete(svc: &PlannerService, id: i64, json: bool) -> Result<()> {
    if svc.delete_conversion(id)? {
        if json {
            println!("{}", serde_json::json!({ "deleted": id }));
        } else {
            println!("Deleted conversion {id}");
        }
        Ok(())
    } else {
        exit_not_found(&format!("Conversion {id} not found"), json);
    }
}

/// Report units used by recipe lines that have no conversion into the
/// ingredient's canonical unit.
pub(crate) fn cmd_conversion_missing(
    svc: &PlannerService,
    allergens: Option<&str>,
    dietary: Option<&str>,
    json: bool,
) -> Result<()> {
    #[derive(Tabled)]
    struct MissingRow {
        #[tabled(rename = "Ingredient ID")]
        id: i64,
        #[tabled(rename = "Ingredient")]
        ingredient: String,
        #[tabled(rename = "From")]
        from: String,
        #[tabled(rename = "To")]
        to: String,
        #[tabled(rename = "Lines")]
        lines: usize,
    }

    let rows = svc.find_missing_conversions(&tag_filter(allergens, dietary))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }
    if rows.is_empty() {
        println!("No missing conversions detected from your recipe lines.");
        return Ok(());
    }

    let table_rows: Vec<MissingRow> = rows
        .iter()
        .map(|r| MissingRow {
            id: r.ingredient_id,
            ingredient: truncate(&r.ingredient_name, 35),
            from: r.from_unit.clone(),
            to: r.to_unit.clone(),
            lines: r.line_count,
        })
        .collect();

    let table = Table::new(&table_rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(4..)).with(Alignment::right()))
        .to_string();
    println!("{table}");
    eprintln!("Fix with: bakeplan conversion add <ingredient> <from-unit> <factor>");
    Ok(())
}
