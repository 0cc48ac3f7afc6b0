mod conversion;
mod helpers;
mod import;
mod ingredient;
mod plan;
mod recipe;
mod totals;

use anyhow::{Result, bail};

use bakeplan_core::models::{Ingredient, Recipe};
use bakeplan_core::service::PlannerService;

pub(crate) use conversion::{
    cmd_conversion_add, cmd_conversion_delete, cmd_conversion_list, cmd_conversion_missing,
};
pub(crate) use import::cmd_recipe_import;
pub(crate) use ingredient::{
    cmd_ingredient_add, cmd_ingredient_delete, cmd_ingredient_list, cmd_ingredient_seed,
};
pub(crate) use plan::{
    cmd_plan_add_item, cmd_plan_archive, cmd_plan_create, cmd_plan_list, cmd_plan_remove_item,
    cmd_plan_show, cmd_plan_totals,
};
pub(crate) use recipe::{
    RecipeArgs, cmd_recipe_add_line, cmd_recipe_archive, cmd_recipe_create, cmd_recipe_delete,
    cmd_recipe_list, cmd_recipe_remove_line, cmd_recipe_scale, cmd_recipe_show,
    cmd_recipe_update,
};
pub(crate) use totals::cmd_totals;

/// Resolve a recipe given either its numeric id or its title.
pub(super) fn resolve_recipe(svc: &PlannerService, reference: &str) -> Result<Recipe> {
    match reference.trim().parse::<i64>() {
        Ok(id) => svc.get_recipe(id),
        Err(_) => svc.get_recipe_by_title(reference),
    }
}

/// Resolve an ingredient given either its numeric id or its name.
pub(super) fn resolve_ingredient(svc: &PlannerService, reference: &str) -> Result<Ingredient> {
    if let Ok(id) = reference.trim().parse::<i64>() {
        return svc.get_ingredient(id);
    }
    match svc.find_ingredient_by_name(reference)? {
        Some(ingredient) => Ok(ingredient),
        None => bail!("No ingredient named '{reference}'. Add it with: bakeplan ingredient add"),
    }
}
