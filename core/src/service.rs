use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use anyhow::Result;

use crate::aggregate::aggregate;
use crate::conversion::{ConversionRegistry, find_missing_conversions};
use crate::db::Database;
use crate::error::ValidationError;
use crate::models::{
    AggregatedTotal, Ingredient, IngredientLineInput, IngredientListing, MissingConversionRow,
    NewIngredient, NewRecipe, NewRecipeLine, NewUnitConversion, NewWeeklyPlan, PlanDetail,
    PlanItem, Recipe, RecipeDetail, RecipeFilter, RecipeLine, ScaledRecipe, TagFilter,
    UnitConversion, WeeklyPlan, normalize_unit, validate_allergen_tags, validate_category,
    validate_dietary_tags, validate_name, validate_positive, validate_title, validate_week,
};
use crate::scale::{expand_plan_items, scale_factor, scale_lines};

/// Read access the planner computations need from persistence.
///
/// `Database` is the production implementation; tests substitute in-memory
/// fakes to exercise the computations without SQLite.
pub trait PlannerStore {
    fn get_ingredient(&self, id: i64) -> Result<Option<Ingredient>>;
    fn list_ingredient_lines_for_recipes(&self, recipe_ids: &[i64]) -> Result<Vec<RecipeLine>>;
    fn list_conversions(&self, ingredient_ids: &[i64]) -> Result<Vec<UnitConversion>>;
    fn list_recipes(&self, filter: &RecipeFilter) -> Result<Vec<Recipe>>;
    fn list_plan_items(&self, plan_id: i64) -> Result<Vec<PlanItem>>;
}

impl PlannerStore for Database {
    fn get_ingredient(&self, id: i64) -> Result<Option<Ingredient>> {
        self.find_ingredient(id)
    }

    fn list_ingredient_lines_for_recipes(&self, recipe_ids: &[i64]) -> Result<Vec<RecipeLine>> {
        self.list_lines_for_recipes(recipe_ids)
    }

    fn list_conversions(&self, ingredient_ids: &[i64]) -> Result<Vec<UnitConversion>> {
        Database::list_conversions(self, ingredient_ids)
    }

    fn list_recipes(&self, filter: &RecipeFilter) -> Result<Vec<Recipe>> {
        Database::list_recipes(self, filter)
    }

    fn list_plan_items(&self, plan_id: i64) -> Result<Vec<PlanItem>> {
        Database::list_plan_items(self, plan_id)
    }
}

// --- Computations ---

/// Ingredients and their conversions, loaded once per computation.
struct Snapshot {
    ingredients: HashMap<i64, Ingredient>,
    registry: ConversionRegistry,
}

fn load_snapshot(store: &dyn PlannerStore, ingredient_ids: &BTreeSet<i64>) -> Result<Snapshot> {
    let mut ingredients = HashMap::with_capacity(ingredient_ids.len());
    for &id in ingredient_ids {
        match store.get_ingredient(id)? {
            Some(ingredient) => {
                ingredients.insert(id, ingredient);
            }
            None => return Err(ValidationError::UnknownIngredient(id).into()),
        }
    }
    let ids: Vec<i64> = ingredient_ids.iter().copied().collect();
    let registry = ConversionRegistry::from_conversions(&store.list_conversions(&ids)?);
    tracing::debug!(
        ingredients = ingredients.len(),
        conversions = registry.len(),
        "loaded conversion snapshot"
    );
    Ok(Snapshot {
        ingredients,
        registry,
    })
}

/// Check and normalize caller-supplied lines before they reach the engine.
fn validate_lines(lines: &[IngredientLineInput]) -> Result<Vec<IngredientLineInput>> {
    lines
        .iter()
        .map(|line| -> Result<IngredientLineInput> {
            validate_positive("Quantity", line.qty)?;
            if let Some(multiplier) = line.multiplier {
                validate_positive("Multiplier", multiplier)?;
            }
            let unit = line.unit.as_deref().map(normalize_unit).transpose()?;
            Ok(IngredientLineInput {
                unit,
                ..line.clone()
            })
        })
        .collect()
}

/// Total ad-hoc ingredient lines in each ingredient's canonical unit.
///
/// Every line must have a positive quantity (and multiplier, when given) and
/// reference a known ingredient; otherwise nothing is aggregated.
pub fn aggregate_lines(
    store: &dyn PlannerStore,
    lines: &[IngredientLineInput],
) -> Result<Vec<AggregatedTotal>> {
    let lines = validate_lines(lines)?;
    let ids: BTreeSet<i64> = lines.iter().map(|l| l.ingredient_id).collect();
    let snapshot = load_snapshot(store, &ids)?;
    Ok(aggregate(&lines, &snapshot.ingredients, &snapshot.registry))
}

/// Shopping totals for a weekly plan: every item's recipe lines, multiplied by
/// the item's batch count.
pub fn plan_totals(store: &dyn PlannerStore, plan_id: i64) -> Result<Vec<AggregatedTotal>> {
    let items = store.list_plan_items(plan_id)?;
    let recipe_ids: Vec<i64> = items
        .iter()
        .map(|i| i.recipe_id)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let recipe_lines = store.list_ingredient_lines_for_recipes(&recipe_ids)?;
    let lines = expand_plan_items(&items, &recipe_lines);
    tracing::debug!(
        plan_id,
        items = items.len(),
        lines = lines.len(),
        "expanded plan items"
    );

    let ids: BTreeSet<i64> = lines.iter().map(|l| l.ingredient_id).collect();
    let snapshot = load_snapshot(store, &ids)?;
    Ok(aggregate(&lines, &snapshot.ingredients, &snapshot.registry))
}

/// Conversion gaps across recipe lines, optionally narrowed by recipe tags.
///
/// Archived recipes are scanned too, since restoring one should not surface
/// a gap nobody was told about.
pub fn missing_conversions(
    store: &dyn PlannerStore,
    tags: &TagFilter,
) -> Result<Vec<MissingConversionRow>> {
    let filter = RecipeFilter {
        tags: tags.clone(),
        ..RecipeFilter::all()
    };
    let recipe_ids: Vec<i64> = store.list_recipes(&filter)?.iter().map(|r| r.id).collect();
    let lines = store.list_ingredient_lines_for_recipes(&recipe_ids)?;
    let ids: BTreeSet<i64> = lines.iter().map(|l| l.ingredient_id).collect();
    let snapshot = load_snapshot(store, &ids)?;
    Ok(find_missing_conversions(
        &lines,
        &snapshot.ingredients,
        &snapshot.registry,
    ))
}

// --- Service facade ---

pub struct PlannerService {
    db: Database,
    owner_id: String,
}

impl PlannerService {
    pub fn new(db_path: &Path) -> Result<Self> {
        let db = Database::open(db_path)?;
        Self::with_database(db)
    }

    pub fn new_in_memory() -> Result<Self> {
        let db = Database::open_in_memory()?;
        Self::with_database(db)
    }

    fn with_database(db: Database) -> Result<Self> {
        let owner_id = db.get_or_create_owner_id()?;
        Ok(Self { db, owner_id })
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    // --- Ingredients ---

    /// Add an ingredient owned by the local user.
    pub fn add_ingredient(&self, name: &str, canonical_unit: &str) -> Result<Ingredient> {
        let ingredient = NewIngredient {
            name: validate_name(name)?,
            canonical_unit: normalize_unit(canonical_unit)?,
            owner_id: Some(self.owner_id.clone()),
        };
        let ingredient = self.db.insert_ingredient(&ingredient)?;
        tracing::info!(id = ingredient.id, name = %ingredient.name, "added ingredient");
        Ok(ingredient)
    }

    /// The local user's ingredients and the shared library, each sorted by
    /// name. Ingredients owned by anyone else are not listed.
    pub fn list_ingredients(&self) -> Result<IngredientListing> {
        let mut listing = IngredientListing::default();
        for ingredient in self.db.list_ingredients()? {
            if ingredient.is_shared() {
                listing.shared.push(ingredient);
            } else if ingredient.is_owned_by(&self.owner_id) {
                listing.mine.push(ingredient);
            }
        }
        Ok(listing)
    }

    pub fn get_ingredient(&self, id: i64) -> Result<Ingredient> {
        self.db.get_ingredient_by_id(id)
    }

    pub fn find_ingredient_by_name(&self, name: &str) -> Result<Option<Ingredient>> {
        self.db.find_ingredient_by_name(name)
    }

    /// Delete one of the local user's ingredients. Returns `false` for shared
    /// or foreign ingredients and unknown ids.
    pub fn delete_ingredient(&self, id: i64) -> Result<bool> {
        self.db.delete_owned_ingredient(id, &self.owner_id)
    }

    pub fn seed_library_ingredients(&self) -> Result<usize> {
        self.db.seed_library_ingredients()
    }

    // --- Recipes ---

    pub fn create_recipe(&self, recipe: &NewRecipe) -> Result<Recipe> {
        let recipe = self.db.create_recipe(&recipe.validated()?)?;
        tracing::info!(id = recipe.id, title = %recipe.title, "created recipe");
        Ok(recipe)
    }

    pub fn update_recipe(&self, id: i64, recipe: &NewRecipe) -> Result<Recipe> {
        self.db.update_recipe(id, &recipe.validated()?)
    }

    pub fn get_recipe(&self, id: i64) -> Result<Recipe> {
        self.db.get_recipe_by_id(id)
    }

    pub fn get_recipe_by_title(&self, title: &str) -> Result<Recipe> {
        self.db.get_recipe_by_title(title)
    }

    pub fn get_recipe_detail(&self, id: i64) -> Result<RecipeDetail> {
        let recipe = self.db.get_recipe_by_id(id)?;
        let lines = self.db.get_recipe_lines(id)?;
        Ok(RecipeDetail { recipe, lines })
    }

    pub fn list_recipes(&self, filter: &RecipeFilter) -> Result<Vec<Recipe>> {
        let filter = RecipeFilter {
            include_archived: filter.include_archived,
            category: filter
                .category
                .as_deref()
                .map(validate_category)
                .transpose()?,
            tags: validate_tag_filter(&filter.tags)?,
        };
        self.db.list_recipes(&filter)
    }

    pub fn archive_recipe(&self, id: i64) -> Result<bool> {
        self.db.set_recipe_archived(id, true)
    }

    pub fn restore_recipe(&self, id: i64) -> Result<bool> {
        self.db.set_recipe_archived(id, false)
    }

    /// Permanently delete a recipe along with its lines and any plan items
    /// that schedule it.
    pub fn delete_recipe(&self, id: i64) -> Result<()> {
        self.db.delete_recipe(id)?;
        tracing::info!(id, "deleted recipe");
        Ok(())
    }

    /// Add a line to a recipe. `unit` of `None` means the ingredient's
    /// canonical unit.
    pub fn add_recipe_line(
        &self,
        recipe_id: i64,
        ingredient_id: i64,
        qty: f64,
        unit: Option<&str>,
    ) -> Result<RecipeLine> {
        let qty = validate_positive("Quantity", qty)?;
        let unit = unit.map(normalize_unit).transpose()?;
        self.db.get_recipe_by_id(recipe_id)?;
        if self.db.find_ingredient(ingredient_id)?.is_none() {
            return Err(ValidationError::UnknownIngredient(ingredient_id).into());
        }
        self.db.add_recipe_line(&NewRecipeLine {
            recipe_id,
            ingredient_id,
            qty,
            unit,
        })
    }

    /// Add a line for an ingredient named inline. An existing ingredient with
    /// the same name (case-insensitive) is reused; otherwise a new one owned by
    /// the local user is created with `canonical_unit`.
    pub fn add_recipe_line_with_new_ingredient(
        &self,
        recipe_id: i64,
        ingredient_name: &str,
        canonical_unit: &str,
        qty: f64,
        unit: Option<&str>,
    ) -> Result<(Ingredient, RecipeLine)> {
        let name = validate_name(ingredient_name)?;
        // Validate the line before creating anything
        validate_positive("Quantity", qty)?;
        unit.map(normalize_unit).transpose()?;
        self.db.get_recipe_by_id(recipe_id)?;

        let ingredient = match self.db.find_ingredient_by_name(&name)? {
            Some(existing) => existing,
            None => self.add_ingredient(&name, canonical_unit)?,
        };
        let line = self.add_recipe_line(recipe_id, ingredient.id, qty, unit)?;
        Ok((ingredient, line))
    }

    pub fn remove_recipe_line(&self, recipe_id: i64, line_id: i64) -> Result<bool> {
        self.db.delete_recipe_line(recipe_id, line_id)
    }

    /// Preview a recipe rescaled from its yield to `target_qty`, with totals in
    /// canonical units.
    pub fn scaled_recipe(&self, recipe_id: i64, target_qty: f64) -> Result<ScaledRecipe> {
        let target_qty = validate_positive("Target quantity", target_qty)?;
        let detail = self.get_recipe_detail(recipe_id)?;
        let factor = scale_factor(detail.recipe.yield_qty, target_qty);

        let unscaled: Vec<IngredientLineInput> =
            detail.lines.iter().map(|l| l.to_line_input(None)).collect();
        let inputs = scale_lines(&unscaled, detail.recipe.yield_qty, target_qty);
        let lines: Vec<RecipeLine> = detail
            .lines
            .into_iter()
            .map(|line| RecipeLine {
                qty: line.qty * factor,
                ..line
            })
            .collect();
        let ids: BTreeSet<i64> = inputs.iter().map(|l| l.ingredient_id).collect();
        let snapshot = load_snapshot(&self.db, &ids)?;
        let totals = aggregate(&inputs, &snapshot.ingredients, &snapshot.registry);

        Ok(ScaledRecipe {
            recipe_id,
            title: detail.recipe.title,
            yield_qty: detail.recipe.yield_qty,
            yield_unit: detail.recipe.yield_unit,
            target_qty,
            factor,
            lines,
            totals,
        })
    }

    // --- Conversions ---

    /// Register (or replace) a conversion factor for one ingredient.
    pub fn add_conversion(
        &self,
        ingredient_id: i64,
        from_unit: &str,
        to_unit: &str,
        factor: f64,
    ) -> Result<UnitConversion> {
        let conversion = NewUnitConversion {
            ingredient_id,
            from_unit: normalize_unit(from_unit)?,
            to_unit: normalize_unit(to_unit)?,
            factor: validate_positive("Factor", factor)?,
        };
        if self.db.find_ingredient(ingredient_id)?.is_none() {
            return Err(ValidationError::UnknownIngredient(ingredient_id).into());
        }
        self.db.upsert_conversion(&conversion)
    }

    pub fn list_conversions(&self, ingredient_id: Option<i64>) -> Result<Vec<UnitConversion>> {
        match ingredient_id {
            Some(id) => self.db.list_conversions(&[id]),
            None => self.db.list_all_conversions(),
        }
    }

    pub fn delete_conversion(&self, id: i64) -> Result<bool> {
        self.db.delete_conversion(id)
    }

    // --- Weekly plans ---

    pub fn create_plan(&self, plan: &NewWeeklyPlan) -> Result<WeeklyPlan> {
        validate_week(plan.week_start, plan.week_end)?;
        let plan = NewWeeklyPlan {
            title: validate_title(&plan.title)?,
            ..plan.clone()
        };
        self.db.create_plan(&plan)
    }

    pub fn list_plans(&self) -> Result<Vec<WeeklyPlan>> {
        self.db.list_plans()
    }

    pub fn get_plan_detail(&self, id: i64) -> Result<PlanDetail> {
        let plan = self.db.get_plan(id)?;
        let items = self.db.list_plan_items(id)?;
        Ok(PlanDetail { plan, items })
    }

    /// Schedule `batch_qty` batches of a recipe. Archived recipes cannot be
    /// added to a plan.
    pub fn add_plan_item(&self, plan_id: i64, recipe_id: i64, batch_qty: f64) -> Result<PlanItem> {
        let batch_qty = validate_positive("Batch quantity", batch_qty)?;
        self.db.get_plan(plan_id)?;
        let recipe = self.db.get_recipe_by_id(recipe_id)?;
        if recipe.is_archived() {
            anyhow::bail!(
                "Recipe '{}' is archived; restore it before planning it",
                recipe.title
            );
        }
        self.db.add_plan_item(plan_id, recipe_id, batch_qty)
    }

    pub fn remove_plan_item(&self, plan_id: i64, item_id: i64) -> Result<bool> {
        self.db.remove_plan_item(plan_id, item_id)
    }

    pub fn archive_plan(&self, id: i64) -> Result<bool> {
        self.db.set_plan_archived(id, true)
    }

    pub fn restore_plan(&self, id: i64) -> Result<bool> {
        self.db.set_plan_archived(id, false)
    }

    // --- Computations ---

    pub fn aggregate(&self, lines: &[IngredientLineInput]) -> Result<Vec<AggregatedTotal>> {
        aggregate_lines(&self.db, lines)
    }

    pub fn plan_totals(&self, plan_id: i64) -> Result<Vec<AggregatedTotal>> {
        self.db.get_plan(plan_id)?;
        plan_totals(&self.db, plan_id)
    }

    pub fn find_missing_conversions(&self, tags: &TagFilter) -> Result<Vec<MissingConversionRow>> {
        missing_conversions(&self.db, &validate_tag_filter(tags)?)
    }
}

fn validate_tag_filter(tags: &TagFilter) -> Result<TagFilter, ValidationError> {
    Ok(TagFilter {
        allergen_tags: validate_allergen_tags(&tags.allergen_tags)?,
        dietary_tags: validate_dietary_tags(&tags.dietary_tags)?,
    })
}
