//! Aggregation of ingredient usage lines into canonical-unit totals.

use std::collections::{BTreeMap, HashMap};

use crate::conversion::ConversionRegistry;
use crate::models::{AggregatedTotal, Ingredient, IngredientLineInput};

#[derive(Default)]
struct Accumulator {
    contributions: Vec<f64>,
    missing_line_count: usize,
}

impl Accumulator {
    // Summing in sorted order makes the total independent of input order.
    fn total(&mut self) -> f64 {
        self.contributions.sort_by(f64::total_cmp);
        self.contributions.iter().sum()
    }
}

/// Convert every line into its ingredient's canonical unit and total per ingredient.
///
/// A line whose unit has no registered conversion is never added with a
/// guessed factor: it is left out of `total_qty` and counted in
/// `missing_line_count` instead. Every ingredient that appears in `lines` gets
/// exactly one record, sorted by name (then id). Lines referencing an
/// ingredient missing from `ingredients` are dropped; callers validate ids
/// before aggregating.
#[must_use]
pub fn aggregate(
    lines: &[IngredientLineInput],
    ingredients: &HashMap<i64, Ingredient>,
    registry: &ConversionRegistry,
) -> Vec<AggregatedTotal> {
    let mut by_ingredient: BTreeMap<i64, Accumulator> = BTreeMap::new();

    for line in lines {
        let Some(ingredient) = ingredients.get(&line.ingredient_id) else {
            tracing::warn!(
                ingredient_id = line.ingredient_id,
                "dropping line for unknown ingredient"
            );
            continue;
        };
        let acc = by_ingredient.entry(ingredient.id).or_default();
        let unit = line.unit.as_deref().unwrap_or(&ingredient.canonical_unit);
        match registry.resolve_factor(ingredient.id, unit, &ingredient.canonical_unit) {
            Ok(factor) => acc.contributions.push(line.effective_qty() * factor),
            Err(missing) => {
                tracing::debug!(%missing, "line excluded from total");
                acc.missing_line_count += 1;
            }
        }
    }

    let mut totals: Vec<AggregatedTotal> = by_ingredient
        .into_iter()
        .map(|(id, mut acc)| {
            let ingredient = &ingredients[&id];
            AggregatedTotal {
                ingredient_id: id,
                ingredient_name: ingredient.name.clone(),
                canonical_unit: ingredient.canonical_unit.clone(),
                total_qty: acc.total(),
                missing_line_count: acc.missing_line_count,
            }
        })
        .collect();

    totals.sort_by(|a, b| {
        a.ingredient_name
            .cmp(&b.ingredient_name)
            .then_with(|| a.ingredient_id.cmp(&b.ingredient_id))
    });
    tracing::debug!(
        lines = lines.len(),
        ingredients = totals.len(),
        "aggregated ingredient lines"
    );
    totals
}
