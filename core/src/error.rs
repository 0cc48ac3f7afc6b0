use chrono::NaiveDate;
use thiserror::Error;

use crate::models::{ALLERGEN_TAGS, DIETARY_TAGS, RECIPE_CATEGORIES, UNIT_OPTIONS};

/// No registered factor converts `from_unit` into the ingredient's canonical unit.
///
/// This is an expected outcome, not a failure: the aggregation engine counts it
/// per line and the gap report lists it so a mapping can be added.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("No conversion from '{from_unit}' to '{to_unit}' for ingredient {ingredient_id}")]
pub struct MissingConversion {
    pub ingredient_id: i64,
    pub from_unit: String,
    pub to_unit: String,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("{field} must be greater than 0 (got {value})")]
    NotPositive { field: &'static str, value: f64 },

    #[error("{field} must be at least {min} characters")]
    TooShort { field: &'static str, min: usize },

    #[error("Unknown unit '{0}'. Must be one of: {units}", units = UNIT_OPTIONS.join(", "))]
    UnknownUnit(String),

    #[error("Unknown category '{0}'. Must be one of: {categories}", categories = RECIPE_CATEGORIES.join(", "))]
    UnknownCategory(String),

    #[error("Unknown allergen tag '{0}'. Must be one of: {tags}", tags = ALLERGEN_TAGS.join(", "))]
    UnknownAllergenTag(String),

    #[error("Unknown dietary tag '{0}'. Must be one of: {tags}", tags = DIETARY_TAGS.join(", "))]
    UnknownDietaryTag(String),

    #[error("Week end {end} is before week start {start}")]
    InvalidWeek { start: NaiveDate, end: NaiveDate },

    #[error("Unknown ingredient {0}")]
    UnknownIngredient(i64),
}
