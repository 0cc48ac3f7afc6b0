//! Recipe scaling and weekly-plan expansion.

use std::collections::HashMap;

use crate::models::{IngredientLineInput, PlanItem, RecipeLine};

/// Ratio from a recipe's declared yield to a target output quantity.
///
/// Falls back to 1 (no scaling) when either quantity is not a positive number.
#[must_use]
pub fn scale_factor(yield_qty: f64, target_qty: f64) -> f64 {
    if !(yield_qty > 0.0 && target_qty > 0.0) || !yield_qty.is_finite() || !target_qty.is_finite()
    {
        return 1.0;
    }
    target_qty / yield_qty
}

/// Multiply every line's quantity by [`scale_factor`]. Ingredient and unit are untouched.
#[must_use]
pub fn scale_lines(
    lines: &[IngredientLineInput],
    yield_qty: f64,
    target_qty: f64,
) -> Vec<IngredientLineInput> {
    let factor = scale_factor(yield_qty, target_qty);
    lines
        .iter()
        .map(|line| IngredientLineInput {
            qty: line.qty * factor,
            ..line.clone()
        })
        .collect()
}

/// Expand plan items into aggregation input.
///
/// A plan item's quantity is a batch count, so each of its recipe's lines is
/// emitted with `multiplier = batch_qty`. Items whose recipe has no lines
/// contribute nothing.
#[must_use]
pub fn expand_plan_items(items: &[PlanItem], lines: &[RecipeLine]) -> Vec<IngredientLineInput> {
    let mut lines_by_recipe: HashMap<i64, Vec<&RecipeLine>> = HashMap::new();
    for line in lines {
        lines_by_recipe.entry(line.recipe_id).or_default().push(line);
    }

    items
        .iter()
        .flat_map(|item| {
            lines_by_recipe
                .get(&item.recipe_id)
                .into_iter()
                .flatten()
                .map(move |line| line.to_line_input(Some(item.batch_qty)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::aggregate;
    use crate::conversion::ConversionRegistry;
    use crate::models::Ingredient;

    fn input(ingredient_id: i64, qty: f64, unit: &str) -> IngredientLineInput {
        IngredientLineInput {
            ingredient_id,
            qty,
            unit: Some(unit.to_string()),
            multiplier: None,
        }
    }

    fn recipe_line(id: i64, recipe_id: i64, ingredient_id: i64, qty: f64, unit: &str) -> RecipeLine {
        RecipeLine {
            id,
            recipe_id,
            ingredient_id,
            qty,
            unit: Some(unit.to_string()),
            ingredient_name: None,
            canonical_unit: None,
        }
    }

    fn plan_item(id: i64, recipe_id: i64, batch_qty: f64) -> PlanItem {
        PlanItem {
            id,
            plan_id: 1,
            recipe_id,
            batch_qty,
            recipe_title: None,
            yield_qty: None,
            yield_unit: None,
        }
    }

    #[test]
    fn test_scale_factor_fallbacks() {
        assert!((scale_factor(0.0, 5.0) - 1.0).abs() < f64::EPSILON);
        assert!((scale_factor(5.0, 0.0) - 1.0).abs() < f64::EPSILON);
        assert!((scale_factor(-2.0, 5.0) - 1.0).abs() < f64::EPSILON);
        assert!((scale_factor(f64::NAN, 5.0) - 1.0).abs() < f64::EPSILON);
        assert!((scale_factor(2.0, f64::INFINITY) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_scale_factor_ratio() {
        assert!((scale_factor(2.0, 6.0) - 3.0).abs() < f64::EPSILON);
        assert!((scale_factor(10.0, 25.0) - 2.5).abs() < f64::EPSILON);
        assert!((scale_factor(4.0, 1.0) - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn test_scale_lines_yield_ten_to_twenty_five() {
        let lines = vec![input(1, 40.0, "g"), input(2, 3.0, "cup")];
        let scaled = scale_lines(&lines, 10.0, 25.0);

        assert_eq!(scaled.len(), 2);
        assert!((scaled[0].qty - 100.0).abs() < 1e-9);
        assert!((scaled[1].qty - 7.5).abs() < 1e-9);
        for (before, after) in lines.iter().zip(&scaled) {
            assert_eq!(before.ingredient_id, after.ingredient_id);
            assert_eq!(before.unit, after.unit);
            assert_eq!(before.multiplier, after.multiplier);
        }
    }

    #[test]
    fn test_scale_lines_identity_on_bad_yield() {
        let lines = vec![input(1, 40.0, "g")];
        assert_eq!(scale_lines(&lines, 0.0, 25.0), lines);
    }

    #[test]
    fn test_expand_plan_items_uses_batch_count_as_multiplier() {
        let lines = vec![
            recipe_line(1, 100, 1, 500.0, "g"),
            recipe_line(2, 100, 2, 350.0, "ml"),
            recipe_line(3, 200, 1, 2.0, "cup"),
        ];
        let items = vec![plan_item(1, 100, 4.0), plan_item(2, 300, 1.0)];

        let expanded = expand_plan_items(&items, &lines);
        assert_eq!(expanded.len(), 2);
        assert!(expanded.iter().all(|l| l.multiplier == Some(4.0)));
        assert_eq!(expanded[0].ingredient_id, 1);
        assert_eq!(expanded[1].ingredient_id, 2);
    }

    #[test]
    fn test_split_batches_match_single_item() {
        let flour = Ingredient {
            id: 1,
            name: "Bread flour".to_string(),
            canonical_unit: "g".to_string(),
            owner_id: None,
            created_at: String::new(),
        };
        let ingredients = HashMap::from([(1, flour)]);
        let mut registry = ConversionRegistry::new();
        registry.insert(1, "cup", "g", 120.0);

        let lines = vec![
            recipe_line(1, 100, 1, 2.0, "cup"),
            recipe_line(2, 100, 1, 50.0, "g"),
            recipe_line(3, 100, 1, 1.0, "tbsp"),
        ];
        let split = expand_plan_items(&[plan_item(1, 100, 2.0), plan_item(2, 100, 3.0)], &lines);
        let single = expand_plan_items(&[plan_item(3, 100, 5.0)], &lines);

        let split_totals = aggregate(&split, &ingredients, &registry);
        let single_totals = aggregate(&single, &ingredients, &registry);

        assert!((split_totals[0].total_qty - single_totals[0].total_qty).abs() < 1e-9);
        assert!((single_totals[0].total_qty - 1450.0).abs() < 1e-9);
        // Missing lines are counted per expanded line, once for each plan item
        assert_eq!(split_totals[0].missing_line_count, 2);
        assert_eq!(single_totals[0].missing_line_count, 1);
    }
}
