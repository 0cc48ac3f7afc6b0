//! Per-ingredient unit conversion lookups and the missing-conversion report.
//!
//! Conversions are scoped to a single ingredient because volume-to-weight
//! factors (a cup of flour versus a cup of sugar) depend on density. Only a
//! direct `(ingredient, from, to)` mapping is ever used; factors are never
//! chained through an intermediate unit.

use std::collections::{BTreeMap, HashMap};

use crate::error::MissingConversion;
use crate::models::{Ingredient, MissingConversionRow, RecipeLine, UnitConversion};

#[derive(Debug, Clone, PartialEq)]
struct Factor {
    from_unit: String,
    to_unit: String,
    factor: f64,
}

/// Read-only snapshot of the conversion table.
#[derive(Debug, Clone, Default)]
pub struct ConversionRegistry {
    by_ingredient: HashMap<i64, Vec<Factor>>,
}

impl ConversionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_conversions<'a>(conversions: impl IntoIterator<Item = &'a UnitConversion>) -> Self {
        let mut registry = Self::new();
        for c in conversions {
            registry.insert(c.ingredient_id, &c.from_unit, &c.to_unit, c.factor);
        }
        registry
    }

    /// Register a factor, replacing any existing one for the same triple.
    pub fn insert(&mut self, ingredient_id: i64, from_unit: &str, to_unit: &str, factor: f64) {
        let factors = self.by_ingredient.entry(ingredient_id).or_default();
        if let Some(existing) = factors
            .iter_mut()
            .find(|f| f.from_unit == from_unit && f.to_unit == to_unit)
        {
            existing.factor = factor;
            return;
        }
        factors.push(Factor {
            from_unit: from_unit.to_string(),
            to_unit: to_unit.to_string(),
            factor,
        });
    }

    /// Factor converting `from_unit` into `canonical_unit` for one ingredient.
    ///
    /// Identical units always resolve to 1 without consulting the table.
    pub fn resolve_factor(
        &self,
        ingredient_id: i64,
        from_unit: &str,
        canonical_unit: &str,
    ) -> Result<f64, MissingConversion> {
        if from_unit == canonical_unit {
            return Ok(1.0);
        }
        self.by_ingredient
            .get(&ingredient_id)
            .and_then(|factors| {
                factors
                    .iter()
                    .find(|f| f.from_unit == from_unit && f.to_unit == canonical_unit)
            })
            .map(|f| f.factor)
            .ok_or_else(|| MissingConversion {
                ingredient_id,
                from_unit: from_unit.to_string(),
                to_unit: canonical_unit.to_string(),
            })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_ingredient.values().map(Vec::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Group recipe lines that cannot be converted into their ingredient's
/// canonical unit, counting the affected lines per `(ingredient, unit)` pair.
///
/// Lines already in the canonical unit (or with no unit) and lines with a
/// registered conversion are left out. Lines whose ingredient is not in
/// `ingredients` are skipped. Rows come back ordered by ingredient name, then
/// by the unit used.
#[must_use]
pub fn find_missing_conversions(
    lines: &[RecipeLine],
    ingredients: &HashMap<i64, Ingredient>,
    registry: &ConversionRegistry,
) -> Vec<MissingConversionRow> {
    let mut groups: BTreeMap<(i64, &str), usize> = BTreeMap::new();

    for line in lines {
        let Some(ingredient) = ingredients.get(&line.ingredient_id) else {
            tracing::warn!(
                ingredient_id = line.ingredient_id,
                recipe_id = line.recipe_id,
                "skipping recipe line with unknown ingredient"
            );
            continue;
        };
        let from_unit = line.unit.as_deref().unwrap_or(&ingredient.canonical_unit);
        if registry
            .resolve_factor(ingredient.id, from_unit, &ingredient.canonical_unit)
            .is_ok()
        {
            continue;
        }
        *groups.entry((ingredient.id, from_unit)).or_default() += 1;
    }

    let mut rows: Vec<MissingConversionRow> = groups
        .into_iter()
        .map(|((ingredient_id, from_unit), line_count)| {
            let ingredient = &ingredients[&ingredient_id];
            MissingConversionRow {
                ingredient_id,
                ingredient_name: ingredient.name.clone(),
                from_unit: from_unit.to_string(),
                to_unit: ingredient.canonical_unit.clone(),
                line_count,
            }
        })
        .collect();

    rows.sort_by(|a, b| {
        a.ingredient_name
            .cmp(&b.ingredient_name)
            .then_with(|| a.ingredient_id.cmp(&b.ingredient_id))
            .then_with(|| a.from_unit.cmp(&b.from_unit))
    });
    rows
}
