use anyhow::{Context, Result};
use std::io::Read;
use std::path::Path;

use bakeplan_core::models::IngredientLineInput;
use bakeplan_core::service::PlannerService;

use super::helpers::print_totals_table;

/// Aggregate an ad-hoc list of lines read from a JSON file (`-` for stdin).
///
/// The file holds an array of `{"ingredient_id", "qty", "unit"?, "multiplier"?}`.
pub(crate) fn cmd_totals(svc: &PlannerService, file: &Path, json: bool) -> Result<()> {
    let input = if file == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read lines from stdin")?;
        buf
    } else {
        std::fs::read_to_string(file)
            .with_context(|| format!("Failed to read file: {}", file.display()))?
    };
    let lines = parse_lines(&input)?;
    let totals = svc.aggregate(&lines)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&totals)?);
    } else if totals.is_empty() {
        println!("No lines to total");
    } else {
        print_totals_table(&totals);
    }
    Ok(())
}

fn parse_lines(input: &str) -> Result<Vec<IngredientLineInput>> {
    serde_json::from_str(input)
        .context("Expected a JSON array of {ingredient_id, qty, unit?, multiplier?} objects")
}
