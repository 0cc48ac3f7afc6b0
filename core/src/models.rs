use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Units a recipe line or canonical unit may use.
pub const UNIT_OPTIONS: &[&str] = &[
    "g", "kg", "oz", "lb", "ml", "l", "tsp", "tbsp", "cup", "unit",
];

pub const RECIPE_CATEGORIES: &[&str] = &[
    "bread",
    "pastry",
    "cookies",
    "bagels",
    "cakes",
    "muffins",
    "sourdough",
    "other",
];

pub const ALLERGEN_TAGS: &[&str] = &["gluten", "dairy", "eggs", "nuts", "soy", "sesame"];

pub const DIETARY_TAGS: &[&str] = &[
    "vegetarian",
    "vegan",
    "nut_free",
    "dairy_free",
    "egg_free",
];

pub const DEFAULT_YIELD_UNIT: &str = "batch";

/// Decimal places kept when a quantity is shown to a user.
pub const DISPLAY_DECIMALS: i32 = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ingredient {
    pub id: i64,
    pub name: String,
    pub canonical_unit: String,
    /// `None` marks a shared library default.
    pub owner_id: Option<String>,
    pub created_at: String,
}

impl Ingredient {
    #[must_use]
    pub fn is_shared(&self) -> bool {
        self.owner_id.is_none()
    }

    #[must_use]
    pub fn is_owned_by(&self, owner_id: &str) -> bool {
        self.owner_id.as_deref() == Some(owner_id)
    }
}

#[derive(Debug, Clone)]
pub struct NewIngredient {
    pub name: String,
    pub canonical_unit: String,
    pub owner_id: Option<String>,
}

/// Ingredients visible to the local owner, split the way the ingredient list shows them.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngredientListing {
    pub mine: Vec<Ingredient>,
    pub shared: Vec<Ingredient>,
}

/// Process metadata carried on a recipe. Never used in computation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessTimings {
    pub fermentation_minutes: Option<i64>,
    pub proof_minutes: Option<i64>,
    pub bake_temp_f: Option<i64>,
    pub bake_minutes: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
    pub id: i64,
    pub title: String,
    pub category: String,
    pub yield_qty: f64,
    pub yield_unit: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    #[serde(flatten)]
    pub timings: ProcessTimings,
    pub allergen_tags: Vec<String>,
    pub dietary_tags: Vec<String>,
    pub archived_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Recipe {
    #[must_use]
    pub fn is_archived(&self) -> bool {
        self.archived_at.is_some()
    }
}

/// Fields a user supplies when creating or editing a recipe.
#[derive(Debug, Clone)]
pub struct NewRecipe {
    pub title: String,
    pub category: String,
    pub yield_qty: f64,
    pub yield_unit: String,
    pub description: Option<String>,
    pub instructions: Option<String>,
    pub timings: ProcessTimings,
    pub allergen_tags: Vec<String>,
    pub dietary_tags: Vec<String>,
}

impl NewRecipe {
    /// A recipe with only the required fields; everything else defaulted.
    #[must_use]
    pub fn titled(title: &str, category: &str, yield_qty: f64) -> Self {
        Self {
            title: title.to_string(),
            category: category.to_string(),
            yield_qty,
            yield_unit: DEFAULT_YIELD_UNIT.to_string(),
            description: None,
            instructions: None,
            timings: ProcessTimings::default(),
            allergen_tags: Vec::new(),
            dietary_tags: Vec::new(),
        }
    }

    /// Trim, normalize and check every field, returning the cleaned recipe.
    pub fn validated(&self) -> Result<Self, ValidationError> {
        let title = validate_title(&self.title)?;
        let category = validate_category(&self.category)?;
        let yield_qty = validate_positive("Yield quantity", self.yield_qty)?;
        let yield_unit = match self.yield_unit.trim() {
            "" => DEFAULT_YIELD_UNIT.to_string(),
            unit => unit.to_string(),
        };
        Ok(Self {
            title,
            category,
            yield_qty,
            yield_unit,
            description: non_empty(self.description.as_deref()),
            instructions: non_empty(self.instructions.as_deref()),
            timings: self.timings.clone(),
            allergen_tags: validate_allergen_tags(&self.allergen_tags)?,
            dietary_tags: validate_dietary_tags(&self.dietary_tags)?,
        })
    }
}

/// One ingredient usage within a recipe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeLine {
    pub id: i64,
    pub recipe_id: i64,
    pub ingredient_id: i64,
    pub qty: f64,
    /// `None` means the ingredient's canonical unit.
    pub unit: Option<String>,
    // Joined fields for display
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ingredient_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub canonical_unit: Option<String>,
}

impl RecipeLine {
    #[must_use]
    pub fn to_line_input(&self, multiplier: Option<f64>) -> IngredientLineInput {
        IngredientLineInput {
            ingredient_id: self.ingredient_id,
            qty: self.qty,
            unit: self.unit.clone(),
            multiplier,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewRecipeLine {
    pub recipe_id: i64,
    pub ingredient_id: i64,
    pub qty: f64,
    pub unit: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecipeDetail {
    #[serde(flatten)]
    pub recipe: Recipe,
    pub lines: Vec<RecipeLine>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitConversion {
    pub id: i64,
    pub ingredient_id: i64,
    pub from_unit: String,
    pub to_unit: String,
    pub factor: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ingredient_name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewUnitConversion {
    pub ingredient_id: i64,
    pub from_unit: String,
    pub to_unit: String,
    pub factor: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklyPlan {
    pub id: i64,
    pub title: String,
    pub week_start: NaiveDate,
    pub week_end: NaiveDate,
    pub archived_at: Option<String>,
    pub created_at: String,
}

impl WeeklyPlan {
    #[must_use]
    pub fn is_archived(&self) -> bool {
        self.archived_at.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct NewWeeklyPlan {
    pub title: String,
    pub week_start: NaiveDate,
    pub week_end: NaiveDate,
}

/// A recipe scheduled into a plan `batch_qty` times.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanItem {
    pub id: i64,
    pub plan_id: i64,
    pub recipe_id: i64,
    pub batch_qty: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipe_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub yield_qty: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub yield_unit: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlanDetail {
    #[serde(flatten)]
    pub plan: WeeklyPlan,
    pub items: Vec<PlanItem>,
}

/// Input line for aggregation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngredientLineInput {
    pub ingredient_id: i64,
    pub qty: f64,
    /// `None` means the ingredient's canonical unit.
    #[serde(default)]
    pub unit: Option<String>,
    /// Defaults to 1 when absent.
    #[serde(default)]
    pub multiplier: Option<f64>,
}

impl IngredientLineInput {
    #[must_use]
    pub fn effective_qty(&self) -> f64 {
        self.qty * self.multiplier.unwrap_or(1.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedTotal {
    pub ingredient_id: i64,
    pub ingredient_name: String,
    pub canonical_unit: String,
    /// Full precision; use [`AggregatedTotal::display_qty`] when presenting.
    pub total_qty: f64,
    pub missing_line_count: usize,
}

impl AggregatedTotal {
    #[must_use]
    pub fn display_qty(&self) -> f64 {
        round_for_display(self.total_qty)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingConversionRow {
    pub ingredient_id: i64,
    pub ingredient_name: String,
    pub from_unit: String,
    pub to_unit: String,
    pub line_count: usize,
}

/// Restricts recipes by tag. Tags within one dimension are OR'd, the two
/// dimensions are AND'd, and an empty dimension places no restriction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagFilter {
    pub allergen_tags: Vec<String>,
    pub dietary_tags: Vec<String>,
}

impl TagFilter {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.allergen_tags.is_empty() && self.dietary_tags.is_empty()
    }

    #[must_use]
    pub fn matches(&self, allergen_tags: &[String], dietary_tags: &[String]) -> bool {
        any_tag_matches(&self.allergen_tags, allergen_tags)
            && any_tag_matches(&self.dietary_tags, dietary_tags)
    }
}

fn any_tag_matches(wanted: &[String], present: &[String]) -> bool {
    wanted.is_empty() || wanted.iter().any(|tag| present.contains(tag))
}

#[derive(Debug, Clone, Default)]
pub struct RecipeFilter {
    pub include_archived: bool,
    pub category: Option<String>,
    pub tags: TagFilter,
}

impl RecipeFilter {
    /// Every recipe, archived ones included.
    #[must_use]
    pub fn all() -> Self {
        Self {
            include_archived: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn matches(&self, recipe: &Recipe) -> bool {
        if !self.include_archived && recipe.is_archived() {
            return false;
        }
        if let Some(category) = &self.category {
            if &recipe.category != category {
                return false;
            }
        }
        self.tags
            .matches(&recipe.allergen_tags, &recipe.dietary_tags)
    }
}

/// A recipe preview rescaled from its yield to a target output quantity.
#[derive(Debug, Clone, Serialize)]
pub struct ScaledRecipe {
    pub recipe_id: i64,
    pub title: String,
    pub yield_qty: f64,
    pub yield_unit: String,
    pub target_qty: f64,
    pub factor: f64,
    pub lines: Vec<RecipeLine>,
    pub totals: Vec<AggregatedTotal>,
}

// --- Validation ---

/// Round a quantity for presentation. Never apply before summing.
#[must_use]
pub fn round_for_display(value: f64) -> f64 {
    let scale = 10f64.powi(DISPLAY_DECIMALS);
    let rounded = (value * scale).round() / scale;
    if rounded == 0.0 { 0.0 } else { rounded }
}

pub fn validate_positive(field: &'static str, value: f64) -> Result<f64, ValidationError> {
    // `!(value > 0.0)` also rejects NaN
    if !(value > 0.0) || value.is_infinite() {
        return Err(ValidationError::NotPositive { field, value });
    }
    Ok(value)
}

pub fn validate_title(title: &str) -> Result<String, ValidationError> {
    let trimmed = title.trim();
    if trimmed.chars().count() < 2 {
        return Err(ValidationError::TooShort {
            field: "Title",
            min: 2,
        });
    }
    Ok(trimmed.to_string())
}

pub fn validate_name(name: &str) -> Result<String, ValidationError> {
    let trimmed = name.trim();
    if trimmed.chars().count() < 2 {
        return Err(ValidationError::TooShort {
            field: "Ingredient name",
            min: 2,
        });
    }
    Ok(trimmed.to_string())
}

/// Map a unit as typed (e.g. "Cups", "tablespoon", "grams") onto one of [`UNIT_OPTIONS`].
pub fn normalize_unit(unit: &str) -> Result<String, ValidationError> {
    let lower = unit.trim().to_lowercase();
    let canonical = match lower.as_str() {
        "g" | "gram" | "grams" => "g",
        "kg" | "kilogram" | "kilograms" => "kg",
        "oz" | "ounce" | "ounces" => "oz",
        "lb" | "lbs" | "pound" | "pounds" => "lb",
        "ml" | "milliliter" | "milliliters" | "millilitre" | "millilitres" => "ml",
        "l" | "liter" | "liters" | "litre" | "litres" => "l",
        "tsp" | "teaspoon" | "teaspoons" => "tsp",
        "tbsp" | "tablespoon" | "tablespoons" => "tbsp",
        "cup" | "cups" => "cup",
        "unit" | "units" | "each" | "pc" | "pcs" | "piece" | "pieces" => "unit",
        _ => return Err(ValidationError::UnknownUnit(unit.to_string())),
    };
    Ok(canonical.to_string())
}

pub fn validate_category(category: &str) -> Result<String, ValidationError> {
    let lower = category.trim().to_lowercase();
    if RECIPE_CATEGORIES.contains(&lower.as_str()) {
        Ok(lower)
    } else {
        Err(ValidationError::UnknownCategory(category.to_string()))
    }
}

pub fn validate_allergen_tags(tags: &[String]) -> Result<Vec<String>, ValidationError> {
    validate_tag_set(tags, ALLERGEN_TAGS, ValidationError::UnknownAllergenTag)
}

pub fn validate_dietary_tags(tags: &[String]) -> Result<Vec<String>, ValidationError> {
    validate_tag_set(tags, DIETARY_TAGS, ValidationError::UnknownDietaryTag)
}

fn validate_tag_set(
    tags: &[String],
    allowed: &[&str],
    unknown: fn(String) -> ValidationError,
) -> Result<Vec<String>, ValidationError> {
    let mut out: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let lower = tag.trim().to_lowercase();
        if !allowed.contains(&lower.as_str()) {
            return Err(unknown(tag.clone()));
        }
        if !out.contains(&lower) {
            out.push(lower);
        }
    }
    Ok(out)
}

pub fn validate_week(start: NaiveDate, end: NaiveDate) -> Result<(), ValidationError> {
    if end < start {
        return Err(ValidationError::InvalidWeek { start, end });
    }
    Ok(())
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}
