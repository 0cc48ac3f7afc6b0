use std::path::Path;

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use rusqlite::types::Type;
use rusqlite::{Connection, params, params_from_iter};
use uuid::Uuid;

use crate::models::{
    Ingredient, NewIngredient, NewRecipe, NewRecipeLine, NewUnitConversion, NewWeeklyPlan,
    PlanItem, ProcessTimings, Recipe, RecipeFilter, RecipeLine, UnitConversion, WeeklyPlan,
};

const OWNER_ID_KEY: &str = "owner_id";

const RECIPE_COLUMNS: &str = "id, title, category, yield_qty, yield_unit, description, instructions,
    fermentation_minutes, proof_minutes, bake_temp_f, bake_minutes,
    allergen_tags, dietary_tags, archived_at, created_at, updated_at";

const LINE_COLUMNS: &str = "rl.id, rl.recipe_id, rl.ingredient_id, rl.qty, rl.unit,
    i.name, i.canonical_unit";

const CONVERSION_COLUMNS: &str = "c.id, c.ingredient_id, c.from_unit, c.to_unit, c.factor, i.name";

const PLAN_ITEM_COLUMNS: &str = "pi.id, pi.plan_id, pi.recipe_id, pi.qty,
    r.title, r.yield_qty, r.yield_unit";

/// Shared baking defaults offered to every user: `(name, canonical unit)`.
pub const LIBRARY_INGREDIENTS: &[(&str, &str)] = &[
    ("Bread flour", "g"),
    ("All-purpose flour", "g"),
    ("Whole wheat flour", "g"),
    ("Water", "g"),
    ("Salt", "g"),
    ("Instant yeast", "g"),
    ("Sourdough starter", "g"),
    ("Granulated sugar", "g"),
    ("Brown sugar", "g"),
    ("Butter", "g"),
    ("Whole milk", "ml"),
    ("Eggs", "unit"),
];

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        self.conn.pragma_update(None, "foreign_keys", true)?;

        let version: i64 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;
        tracing::debug!(version, "checking database schema");

        if version < 1 {
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS ingredients (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    canonical_unit TEXT NOT NULL,
                    owner_id TEXT,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS recipes (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    title TEXT NOT NULL,
                    category TEXT NOT NULL,
                    yield_qty REAL NOT NULL CHECK (yield_qty > 0),
                    yield_unit TEXT NOT NULL DEFAULT 'batch',
                    description TEXT,
                    instructions TEXT,
                    fermentation_minutes INTEGER,
                    proof_minutes INTEGER,
                    bake_temp_f INTEGER,
                    bake_minutes INTEGER,
                    allergen_tags TEXT NOT NULL DEFAULT '[]',
                    dietary_tags TEXT NOT NULL DEFAULT '[]',
                    archived_at TEXT,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS recipe_lines (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    recipe_id INTEGER NOT NULL REFERENCES recipes(id) ON DELETE CASCADE,
                    ingredient_id INTEGER NOT NULL REFERENCES ingredients(id),
                    qty REAL NOT NULL CHECK (qty > 0),
                    unit TEXT
                );

                CREATE TABLE IF NOT EXISTS ingredient_unit_conversions (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    ingredient_id INTEGER NOT NULL REFERENCES ingredients(id) ON DELETE CASCADE,
                    from_unit TEXT NOT NULL,
                    to_unit TEXT NOT NULL,
                    factor REAL NOT NULL CHECK (factor > 0),
                    UNIQUE (ingredient_id, from_unit, to_unit)
                );

                CREATE TABLE IF NOT EXISTS weekly_plans (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    title TEXT NOT NULL,
                    week_start TEXT NOT NULL,
                    week_end TEXT NOT NULL,
                    archived_at TEXT,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS plan_items (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    plan_id INTEGER NOT NULL REFERENCES weekly_plans(id) ON DELETE CASCADE,
                    recipe_id INTEGER NOT NULL REFERENCES recipes(id),
                    qty REAL NOT NULL CHECK (qty > 0)
                );

                CREATE INDEX IF NOT EXISTS idx_ingredients_name ON ingredients(name);
                CREATE INDEX IF NOT EXISTS idx_recipe_lines_recipe ON recipe_lines(recipe_id);
                CREATE INDEX IF NOT EXISTS idx_recipe_lines_ingredient ON recipe_lines(ingredient_id);
                CREATE INDEX IF NOT EXISTS idx_plan_items_plan ON plan_items(plan_id);

                PRAGMA user_version = 1;",
            )?;
        }

        if version < 2 {
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS user_settings (
                    key TEXT PRIMARY KEY NOT NULL,
                    value TEXT NOT NULL,
                    updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
                );

                PRAGMA user_version = 2;",
            )?;
        }

        Ok(())
    }

    // --- Row mapping helpers ---

    fn ingredient_from_row(row: &rusqlite::Row) -> rusqlite::Result<Ingredient> {
        Ok(Ingredient {
            id: row.get(0)?,
            name: row.get(1)?,
            canonical_unit: row.get(2)?,
            owner_id: row.get(3)?,
            created_at: row.get(4)?,
        })
    }

    // Expects RECIPE_COLUMNS order
    fn recipe_from_row(row: &rusqlite::Row) -> rusqlite::Result<Recipe> {
        Ok(Recipe {
            id: row.get(0)?,
            title: row.get(1)?,
            category: row.get(2)?,
            yield_qty: row.get(3)?,
            yield_unit: row.get(4)?,
            description: row.get(5)?,
            instructions: row.get(6)?,
            timings: ProcessTimings {
                fermentation_minutes: row.get(7)?,
                proof_minutes: row.get(8)?,
                bake_temp_f: row.get(9)?,
                bake_minutes: row.get(10)?,
            },
            allergen_tags: tags_from_column(row, 11)?,
            dietary_tags: tags_from_column(row, 12)?,
            archived_at: row.get(13)?,
            created_at: row.get(14)?,
            updated_at: row.get(15)?,
        })
    }

    // Expects LINE_COLUMNS order
    fn recipe_line_from_row(row: &rusqlite::Row) -> rusqlite::Result<RecipeLine> {
        Ok(RecipeLine {
            id: row.get(0)?,
            recipe_id: row.get(1)?,
            ingredient_id: row.get(2)?,
            qty: row.get(3)?,
            unit: row.get(4)?,
            ingredient_name: Some(row.get(5)?),
            canonical_unit: Some(row.get(6)?),
        })
    }

    // Expects CONVERSION_COLUMNS order
    fn conversion_from_row(row: &rusqlite::Row) -> rusqlite::Result<UnitConversion> {
        Ok(UnitConversion {
            id: row.get(0)?,
            ingredient_id: row.get(1)?,
            from_unit: row.get(2)?,
            to_unit: row.get(3)?,
            factor: row.get(4)?,
            ingredient_name: Some(row.get(5)?),
        })
    }

    fn plan_from_row(row: &rusqlite::Row) -> rusqlite::Result<WeeklyPlan> {
        Ok(WeeklyPlan {
            id: row.get(0)?,
            title: row.get(1)?,
            week_start: date_from_column(row, 2)?,
            week_end: date_from_column(row, 3)?,
            archived_at: row.get(4)?,
            created_at: row.get(5)?,
        })
    }

    // Expects PLAN_ITEM_COLUMNS order
    fn plan_item_from_row(row: &rusqlite::Row) -> rusqlite::Result<PlanItem> {
        Ok(PlanItem {
            id: row.get(0)?,
            plan_id: row.get(1)?,
            recipe_id: row.get(2)?,
            batch_qty: row.get(3)?,
            recipe_title: Some(row.get(4)?),
            yield_qty: Some(row.get(5)?),
            yield_unit: Some(row.get(6)?),
        })
    }

    // --- Ingredients ---

    pub fn insert_ingredient(&self, ingredient: &NewIngredient) -> Result<Ingredient> {
        let now = Local::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO ingredients (name, canonical_unit, owner_id, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                ingredient.name,
                ingredient.canonical_unit,
                ingredient.owner_id,
                now,
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_ingredient_by_id(id)
    }

    pub fn get_ingredient_by_id(&self, id: i64) -> Result<Ingredient> {
        self.find_ingredient(id)?
            .with_context(|| format!("Ingredient {id} not found"))
    }

    pub fn find_ingredient(&self, id: i64) -> Result<Option<Ingredient>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, canonical_unit, owner_id, created_at FROM ingredients WHERE id = ?1",
        )?;
        let mut rows = stmt.query(params![id])?;
        if let Some(row) = rows.next()? {
            Ok(Some(Self::ingredient_from_row(row)?))
        } else {
            Ok(None)
        }
    }

    /// Case-insensitive exact name match. Owned ingredients win over shared ones.
    pub fn find_ingredient_by_name(&self, name: &str) -> Result<Option<Ingredient>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, canonical_unit, owner_id, created_at FROM ingredients
             WHERE LOWER(name) = LOWER(?1)
             ORDER BY owner_id IS NULL, id
             LIMIT 1",
        )?;
        let mut rows = stmt.query(params![name.trim()])?;
        if let Some(row) = rows.next()? {
            Ok(Some(Self::ingredient_from_row(row)?))
        } else {
            Ok(None)
        }
    }

    pub fn list_ingredients(&self) -> Result<Vec<Ingredient>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, canonical_unit, owner_id, created_at FROM ingredients
             ORDER BY name COLLATE NOCASE, id",
        )?;
        let ingredients = stmt
            .query_map([], Self::ingredient_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ingredients)
    }

    /// Delete an ingredient owned by `owner_id`, along with its recipe lines and
    /// conversions. Shared ingredients and other owners' rows are left alone.
    pub fn delete_owned_ingredient(&self, id: i64, owner_id: &str) -> Result<bool> {
        let owned: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM ingredients WHERE id = ?1 AND owner_id = ?2)",
            params![id, owner_id],
            |row| row.get(0),
        )?;
        if !owned {
            return Ok(false);
        }
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "DELETE FROM recipe_lines WHERE ingredient_id = ?1",
            params![id],
        )?;
        tx.execute(
            "DELETE FROM ingredient_unit_conversions WHERE ingredient_id = ?1",
            params![id],
        )?;
        let rows = tx.execute("DELETE FROM ingredients WHERE id = ?1", params![id])?;
        tx.commit()?;
        Ok(rows > 0)
    }

    /// Insert any library default that is not already present as a shared
    /// ingredient. Returns how many were added.
    pub fn seed_library_ingredients(&self) -> Result<usize> {
        let mut added = 0;
        for (name, unit) in LIBRARY_INGREDIENTS {
            let exists: bool = self.conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM ingredients WHERE owner_id IS NULL AND LOWER(name) = LOWER(?1))",
                params![name],
                |row| row.get(0),
            )?;
            if !exists {
                self.insert_ingredient(&NewIngredient {
                    name: (*name).to_string(),
                    canonical_unit: (*unit).to_string(),
                    owner_id: None,
                })?;
                added += 1;
            }
        }
        Ok(added)
    }

    // --- Recipes ---

    pub fn create_recipe(&self, recipe: &NewRecipe) -> Result<Recipe> {
        let now = Local::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO recipes (title, category, yield_qty, yield_unit, description, instructions,
                fermentation_minutes, proof_minutes, bake_temp_f, bake_minutes,
                allergen_tags, dietary_tags, archived_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, NULL, ?13, ?14)",
            params![
                recipe.title,
                recipe.category,
                recipe.yield_qty,
                recipe.yield_unit,
                recipe.description,
                recipe.instructions,
                recipe.timings.fermentation_minutes,
                recipe.timings.proof_minutes,
                recipe.timings.bake_temp_f,
                recipe.timings.bake_minutes,
                serde_json::to_string(&recipe.allergen_tags)?,
                serde_json::to_string(&recipe.dietary_tags)?,
                now,
                now,
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_recipe_by_id(id)
    }

    pub fn update_recipe(&self, id: i64, recipe: &NewRecipe) -> Result<Recipe> {
        // Verify existence
        self.get_recipe_by_id(id)?;

        let now = Local::now().to_rfc3339();
        self.conn.execute(
            "UPDATE recipes SET title = ?1, category = ?2, yield_qty = ?3, yield_unit = ?4,
                description = ?5, instructions = ?6, fermentation_minutes = ?7,
                proof_minutes = ?8, bake_temp_f = ?9, bake_minutes = ?10,
                allergen_tags = ?11, dietary_tags = ?12, updated_at = ?13
             WHERE id = ?14",
            params![
                recipe.title,
                recipe.category,
                recipe.yield_qty,
                recipe.yield_unit,
                recipe.description,
                recipe.instructions,
                recipe.timings.fermentation_minutes,
                recipe.timings.proof_minutes,
                recipe.timings.bake_temp_f,
                recipe.timings.bake_minutes,
                serde_json::to_string(&recipe.allergen_tags)?,
                serde_json::to_string(&recipe.dietary_tags)?,
                now,
                id,
            ],
        )?;
        self.get_recipe_by_id(id)
    }

    pub fn get_recipe_by_id(&self, id: i64) -> Result<Recipe> {
        self.conn
            .query_row(
                &format!("SELECT {RECIPE_COLUMNS} FROM recipes WHERE id = ?1"),
                params![id],
                Self::recipe_from_row,
            )
            .with_context(|| format!("Recipe {id} not found"))
    }

    pub fn get_recipe_by_title(&self, title: &str) -> Result<Recipe> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {RECIPE_COLUMNS} FROM recipes WHERE LOWER(title) = LOWER(?1)
                     ORDER BY archived_at IS NOT NULL, id LIMIT 1"
                ),
                params![title.trim()],
                Self::recipe_from_row,
            )
            .context(format!("Recipe '{title}' not found"))
    }

    /// Recipes ordered by title. Tag and category filtering happens after the
    /// query since tags are stored as JSON arrays.
    pub fn list_recipes(&self, filter: &RecipeFilter) -> Result<Vec<Recipe>> {
        let sql = if filter.include_archived {
            format!("SELECT {RECIPE_COLUMNS} FROM recipes ORDER BY title COLLATE NOCASE, id")
        } else {
            format!(
                "SELECT {RECIPE_COLUMNS} FROM recipes WHERE archived_at IS NULL
                 ORDER BY title COLLATE NOCASE, id"
            )
        };
        let mut stmt = self.conn.prepare(&sql)?;
        let recipes = stmt
            .query_map([], Self::recipe_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(recipes.into_iter().filter(|r| filter.matches(r)).collect())
    }

    pub fn set_recipe_archived(&self, id: i64, archived: bool) -> Result<bool> {
        let now = Local::now().to_rfc3339();
        let archived_at = archived.then(|| now.clone());
        let rows = self.conn.execute(
            "UPDATE recipes SET archived_at = ?1, updated_at = ?2 WHERE id = ?3",
            params![archived_at, now, id],
        )?;
        Ok(rows > 0)
    }

    /// Permanently delete a recipe. Plan items referencing it go first.
    pub fn delete_recipe(&self, id: i64) -> Result<()> {
        self.get_recipe_by_id(id)?;
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM plan_items WHERE recipe_id = ?1", params![id])?;
        tx.execute("DELETE FROM recipe_lines WHERE recipe_id = ?1", params![id])?;
        tx.execute("DELETE FROM recipes WHERE id = ?1", params![id])?;
        tx.commit()?;
        Ok(())
    }

    // --- Recipe lines ---

    pub fn add_recipe_line(&self, line: &NewRecipeLine) -> Result<RecipeLine> {
        self.conn.execute(
            "INSERT INTO recipe_lines (recipe_id, ingredient_id, qty, unit) VALUES (?1, ?2, ?3, ?4)",
            params![line.recipe_id, line.ingredient_id, line.qty, line.unit],
        )?;
        let id = self.conn.last_insert_rowid();
        self.touch_recipe(line.recipe_id)?;
        self.get_recipe_line(id)
    }

    pub fn get_recipe_line(&self, id: i64) -> Result<RecipeLine> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {LINE_COLUMNS} FROM recipe_lines rl
                     JOIN ingredients i ON rl.ingredient_id = i.id
                     WHERE rl.id = ?1"
                ),
                params![id],
                Self::recipe_line_from_row,
            )
            .context("Recipe line not found")
    }

    pub fn get_recipe_lines(&self, recipe_id: i64) -> Result<Vec<RecipeLine>> {
        self.list_lines_for_recipes(&[recipe_id])
    }

    /// Lines for every recipe in `recipe_ids`, grouped by recipe in line order.
    pub fn list_lines_for_recipes(&self, recipe_ids: &[i64]) -> Result<Vec<RecipeLine>> {
        if recipe_ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT {LINE_COLUMNS} FROM recipe_lines rl
             JOIN ingredients i ON rl.ingredient_id = i.id
             WHERE rl.recipe_id IN ({})
             ORDER BY rl.recipe_id, rl.id",
            placeholders(recipe_ids.len())
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let lines = stmt
            .query_map(params_from_iter(recipe_ids), Self::recipe_line_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(lines)
    }

    pub fn delete_recipe_line(&self, recipe_id: i64, line_id: i64) -> Result<bool> {
        let rows = self.conn.execute(
            "DELETE FROM recipe_lines WHERE id = ?1 AND recipe_id = ?2",
            params![line_id, recipe_id],
        )?;
        if rows > 0 {
            self.touch_recipe(recipe_id)?;
        }
        Ok(rows > 0)
    }

    fn touch_recipe(&self, recipe_id: i64) -> Result<()> {
        let now = Local::now().to_rfc3339();
        self.conn.execute(
            "UPDATE recipes SET updated_at = ?1 WHERE id = ?2",
            params![now, recipe_id],
        )?;
        Ok(())
    }

    // --- Unit conversions ---

    /// Insert a conversion, replacing the factor if the triple already exists.
    pub fn upsert_conversion(&self, conversion: &NewUnitConversion) -> Result<UnitConversion> {
        self.conn.execute(
            "INSERT INTO ingredient_unit_conversions (ingredient_id, from_unit, to_unit, factor)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(ingredient_id, from_unit, to_unit) DO UPDATE SET factor = excluded.factor",
            params![
                conversion.ingredient_id,
                conversion.from_unit,
                conversion.to_unit,
                conversion.factor,
            ],
        )?;
        self.conn
            .query_row(
                &format!(
                    "SELECT {CONVERSION_COLUMNS} FROM ingredient_unit_conversions c
                     JOIN ingredients i ON c.ingredient_id = i.id
                     WHERE c.ingredient_id = ?1 AND c.from_unit = ?2 AND c.to_unit = ?3"
                ),
                params![
                    conversion.ingredient_id,
                    conversion.from_unit,
                    conversion.to_unit,
                ],
                Self::conversion_from_row,
            )
            .context("Conversion not found after insert")
    }

    pub fn list_conversions(&self, ingredient_ids: &[i64]) -> Result<Vec<UnitConversion>> {
        if ingredient_ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT {CONVERSION_COLUMNS} FROM ingredient_unit_conversions c
             JOIN ingredients i ON c.ingredient_id = i.id
             WHERE c.ingredient_id IN ({})
             ORDER BY i.name COLLATE NOCASE, c.from_unit, c.to_unit",
            placeholders(ingredient_ids.len())
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let conversions = stmt
            .query_map(params_from_iter(ingredient_ids), Self::conversion_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(conversions)
    }

    pub fn list_all_conversions(&self) -> Result<Vec<UnitConversion>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {CONVERSION_COLUMNS} FROM ingredient_unit_conversions c
             JOIN ingredients i ON c.ingredient_id = i.id
             ORDER BY i.name COLLATE NOCASE, c.from_unit, c.to_unit"
        ))?;
        let conversions = stmt
            .query_map([], Self::conversion_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(conversions)
    }

    pub fn delete_conversion(&self, id: i64) -> Result<bool> {
        let rows = self.conn.execute(
            "DELETE FROM ingredient_unit_conversions WHERE id = ?1",
            params![id],
        )?;
        Ok(rows > 0)
    }

    // --- Weekly plans ---

    pub fn create_plan(&self, plan: &NewWeeklyPlan) -> Result<WeeklyPlan> {
        let now = Local::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO weekly_plans (title, week_start, week_end, archived_at, created_at)
             VALUES (?1, ?2, ?3, NULL, ?4)",
            params![
                plan.title,
                plan.week_start.format("%Y-%m-%d").to_string(),
                plan.week_end.format("%Y-%m-%d").to_string(),
                now,
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_plan(id)
    }

    pub fn get_plan(&self, id: i64) -> Result<WeeklyPlan> {
        self.conn
            .query_row(
                "SELECT id, title, week_start, week_end, archived_at, created_at
                 FROM weekly_plans WHERE id = ?1",
                params![id],
                Self::plan_from_row,
            )
            .with_context(|| format!("Weekly plan {id} not found"))
    }

    /// All plans, newest week first.
    pub fn list_plans(&self) -> Result<Vec<WeeklyPlan>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, title, week_start, week_end, archived_at, created_at
             FROM weekly_plans ORDER BY week_start DESC, id DESC",
        )?;
        let plans = stmt
            .query_map([], Self::plan_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(plans)
    }

    pub fn set_plan_archived(&self, id: i64, archived: bool) -> Result<bool> {
        let archived_at = archived.then(|| Local::now().to_rfc3339());
        let rows = self.conn.execute(
            "UPDATE weekly_plans SET archived_at = ?1 WHERE id = ?2",
            params![archived_at, id],
        )?;
        Ok(rows > 0)
    }

    pub fn add_plan_item(&self, plan_id: i64, recipe_id: i64, batch_qty: f64) -> Result<PlanItem> {
        self.conn.execute(
            "INSERT INTO plan_items (plan_id, recipe_id, qty) VALUES (?1, ?2, ?3)",
            params![plan_id, recipe_id, batch_qty],
        )?;
        let id = self.conn.last_insert_rowid();
        self.conn
            .query_row(
                &format!(
                    "SELECT {PLAN_ITEM_COLUMNS} FROM plan_items pi
                     JOIN recipes r ON pi.recipe_id = r.id
                     WHERE pi.id = ?1"
                ),
                params![id],
                Self::plan_item_from_row,
            )
            .context("Plan item not found")
    }

    pub fn list_plan_items(&self, plan_id: i64) -> Result<Vec<PlanItem>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {PLAN_ITEM_COLUMNS} FROM plan_items pi
             JOIN recipes r ON pi.recipe_id = r.id
             WHERE pi.plan_id = ?1
             ORDER BY pi.id"
        ))?;
        let items = stmt
            .query_map(params![plan_id], Self::plan_item_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(items)
    }

    pub fn remove_plan_item(&self, plan_id: i64, item_id: i64) -> Result<bool> {
        let rows = self.conn.execute(
            "DELETE FROM plan_items WHERE id = ?1 AND plan_id = ?2",
            params![item_id, plan_id],
        )?;
        Ok(rows > 0)
    }

    // --- User Settings ---

    pub fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        let now = Local::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO user_settings (key, value, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, now],
        )?;
        Ok(())
    }

    pub fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT value FROM user_settings WHERE key = ?1")?;
        let mut rows = stmt.query(params![key])?;
        if let Some(row) = rows.next()? {
            Ok(Some(row.get(0)?))
        } else {
            Ok(None)
        }
    }

    /// Stable identity of the local user, created on first use.
    pub fn get_or_create_owner_id(&self) -> Result<String> {
        if let Some(owner_id) = self.get_setting(OWNER_ID_KEY)? {
            return Ok(owner_id);
        }
        let owner_id = Uuid::new_v4().to_string();
        self.set_setting(OWNER_ID_KEY, &owner_id)?;
        tracing::info!(%owner_id, "created local owner id");
        Ok(owner_id)
    }
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

fn tags_from_column(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<Vec<String>> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn date_from_column(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<NaiveDate> {
    let raw: String = row.get(idx)?;
    NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flour(owner: Option<&str>) -> NewIngredient {
        NewIngredient {
            name: "Bread flour".to_string(),
            canonical_unit: "g".to_string(),
            owner_id: owner.map(String::from),
        }
    }

    fn sample_recipe() -> NewRecipe {
        let mut recipe = NewRecipe::titled("Country Loaf", "sourdough", 2.0);
        recipe.yield_unit = "loaf".to_string();
        recipe.timings.bake_minutes = Some(45);
        recipe.allergen_tags = vec!["gluten".to_string()];
        recipe.dietary_tags = vec!["vegan".to_string(), "dairy_free".to_string()];
        recipe
    }

    fn week(start_day: u32) -> NewWeeklyPlan {
        NewWeeklyPlan {
            title: "Farmers market".to_string(),
            week_start: NaiveDate::from_ymd_opt(2024, 6, start_day).unwrap(),
            week_end: NaiveDate::from_ymd_opt(2024, 6, start_day + 6).unwrap(),
        }
    }

    #[test]
    fn test_insert_and_get_ingredient() {
        let db = Database::open_in_memory().unwrap();
        let ingredient = db.insert_ingredient(&flour(Some("owner-1"))).unwrap();

        assert_eq!(ingredient.name, "Bread flour");
        assert_eq!(ingredient.canonical_unit, "g");
        assert_eq!(ingredient.owner_id.as_deref(), Some("owner-1"));

        let fetched = db.get_ingredient_by_id(ingredient.id).unwrap();
        assert_eq!(fetched, ingredient);
        assert!(db.find_ingredient(9999).unwrap().is_none());
        assert!(db.get_ingredient_by_id(9999).is_err());
    }

    #[test]
    fn test_find_ingredient_by_name_prefers_owned() {
        let db = Database::open_in_memory().unwrap();
        let shared = db.insert_ingredient(&flour(None)).unwrap();
        assert_eq!(
            db.find_ingredient_by_name("bread FLOUR").unwrap().unwrap().id,
            shared.id
        );

        let mine = db.insert_ingredient(&flour(Some("owner-1"))).unwrap();
        assert_eq!(
            db.find_ingredient_by_name("Bread flour").unwrap().unwrap().id,
            mine.id
        );
        assert!(db.find_ingredient_by_name("rye").unwrap().is_none());
    }

    #[test]
    fn test_list_ingredients_sorted_by_name() {
        let db = Database::open_in_memory().unwrap();
        for name in ["salt", "Butter", "Water"] {
            db.insert_ingredient(&NewIngredient {
                name: name.to_string(),
                canonical_unit: "g".to_string(),
                owner_id: None,
            })
            .unwrap();
        }
        let names: Vec<String> = db
            .list_ingredients()
            .unwrap()
            .into_iter()
            .map(|i| i.name)
            .collect();
        assert_eq!(names, vec!["Butter", "salt", "Water"]);
    }

    #[test]
    fn test_delete_owned_ingredient_only() {
        let db = Database::open_in_memory().unwrap();
        let shared = db.insert_ingredient(&flour(None)).unwrap();
        let mine = db.insert_ingredient(&flour(Some("owner-1"))).unwrap();
        let recipe = db.create_recipe(&sample_recipe()).unwrap();
        db.add_recipe_line(&NewRecipeLine {
            recipe_id: recipe.id,
            ingredient_id: mine.id,
            qty: 2.0,
            unit: Some("cup".to_string()),
        })
        .unwrap();
        db.upsert_conversion(&NewUnitConversion {
            ingredient_id: mine.id,
            from_unit: "cup".to_string(),
            to_unit: "g".to_string(),
            factor: 120.0,
        })
        .unwrap();

        assert!(!db.delete_owned_ingredient(shared.id, "owner-1").unwrap());
        assert!(!db.delete_owned_ingredient(mine.id, "someone-else").unwrap());
        assert!(db.delete_owned_ingredient(mine.id, "owner-1").unwrap());

        assert!(db.find_ingredient(mine.id).unwrap().is_none());
        assert!(db.get_recipe_lines(recipe.id).unwrap().is_empty());
        assert!(db.list_all_conversions().unwrap().is_empty());
        assert!(db.find_ingredient(shared.id).unwrap().is_some());
    }

    #[test]
    fn test_seed_library_ingredients_idempotent() {
        let db = Database::open_in_memory().unwrap();
        let added = db.seed_library_ingredients().unwrap();
        assert_eq!(added, LIBRARY_INGREDIENTS.len());
        assert_eq!(db.seed_library_ingredients().unwrap(), 0);

        let all = db.list_ingredients().unwrap();
        assert_eq!(all.len(), LIBRARY_INGREDIENTS.len());
        assert!(all.iter().all(Ingredient::is_shared));
    }

    #[test]
    fn test_create_and_get_recipe() {
        let db = Database::open_in_memory().unwrap();
        let recipe = db.create_recipe(&sample_recipe()).unwrap();

        assert_eq!(recipe.title, "Country Loaf");
        assert_eq!(recipe.category, "sourdough");
        assert!((recipe.yield_qty - 2.0).abs() < f64::EPSILON);
        assert_eq!(recipe.yield_unit, "loaf");
        assert_eq!(recipe.timings.bake_minutes, Some(45));
        assert_eq!(recipe.allergen_tags, vec!["gluten"]);
        assert_eq!(recipe.dietary_tags, vec!["vegan", "dairy_free"]);
        assert!(!recipe.is_archived());

        let by_title = db.get_recipe_by_title("country loaf").unwrap();
        assert_eq!(by_title.id, recipe.id);
        assert!(db.get_recipe_by_title("Focaccia").is_err());
    }

    #[test]
    fn test_update_recipe() {
        let db = Database::open_in_memory().unwrap();
        let recipe = db.create_recipe(&sample_recipe()).unwrap();

        let mut changes = sample_recipe();
        changes.title = "Country Loaf (large)".to_string();
        changes.yield_qty = 4.0;
        changes.dietary_tags.clear();
        let updated = db.update_recipe(recipe.id, &changes).unwrap();

        assert_eq!(updated.title, "Country Loaf (large)");
        assert!((updated.yield_qty - 4.0).abs() < f64::EPSILON);
        assert!(updated.dietary_tags.is_empty());
        assert!(db.update_recipe(9999, &changes).is_err());
    }

    #[test]
    fn test_list_recipes_filters() {
        let db = Database::open_in_memory().unwrap();
        let loaf = db.create_recipe(&sample_recipe()).unwrap();
        let mut croissant = NewRecipe::titled("Croissant", "pastry", 12.0);
        croissant.allergen_tags = vec!["gluten".to_string(), "dairy".to_string()];
        let croissant = db.create_recipe(&croissant).unwrap();
        let bagel = db
            .create_recipe(&NewRecipe::titled("Bagel", "bagels", 8.0))
            .unwrap();

        let titles = |recipes: Vec<Recipe>| -> Vec<String> {
            recipes.into_iter().map(|r| r.title).collect()
        };

        assert_eq!(
            titles(db.list_recipes(&RecipeFilter::default()).unwrap()),
            vec!["Bagel", "Country Loaf", "Croissant"]
        );

        db.set_recipe_archived(bagel.id, true).unwrap();
        assert_eq!(db.list_recipes(&RecipeFilter::default()).unwrap().len(), 2);
        assert_eq!(db.list_recipes(&RecipeFilter::all()).unwrap().len(), 3);

        let dairy = RecipeFilter {
            tags: crate::models::TagFilter {
                allergen_tags: vec!["dairy".to_string()],
                dietary_tags: Vec::new(),
            },
            ..RecipeFilter::default()
        };
        let found = db.list_recipes(&dairy).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, croissant.id);

        let sourdough = RecipeFilter {
            category: Some("sourdough".to_string()),
            ..RecipeFilter::default()
        };
        assert_eq!(db.list_recipes(&sourdough).unwrap()[0].id, loaf.id);
    }

    #[test]
    fn test_archive_and_restore_recipe() {
        let db = Database::open_in_memory().unwrap();
        let recipe = db.create_recipe(&sample_recipe()).unwrap();

        assert!(db.set_recipe_archived(recipe.id, true).unwrap());
        assert!(db.get_recipe_by_id(recipe.id).unwrap().is_archived());
        assert!(db.set_recipe_archived(recipe.id, false).unwrap());
        assert!(!db.get_recipe_by_id(recipe.id).unwrap().is_archived());
        assert!(!db.set_recipe_archived(9999, true).unwrap());
    }

    #[test]
    fn test_recipe_lines_in_order() {
        let db = Database::open_in_memory().unwrap();
        let flour = db.insert_ingredient(&flour(None)).unwrap();
        let recipe = db.create_recipe(&sample_recipe()).unwrap();

        let first = db
            .add_recipe_line(&NewRecipeLine {
                recipe_id: recipe.id,
                ingredient_id: flour.id,
                qty: 2.0,
                unit: Some("cup".to_string()),
            })
            .unwrap();
        db.add_recipe_line(&NewRecipeLine {
            recipe_id: recipe.id,
            ingredient_id: flour.id,
            qty: 50.0,
            unit: None,
        })
        .unwrap();

        assert_eq!(first.ingredient_name.as_deref(), Some("Bread flour"));
        assert_eq!(first.canonical_unit.as_deref(), Some("g"));

        let lines = db.get_recipe_lines(recipe.id).unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].unit.as_deref(), Some("cup"));
        assert!(lines[1].unit.is_none());

        assert!(db.delete_recipe_line(recipe.id, first.id).unwrap());
        assert!(!db.delete_recipe_line(recipe.id, first.id).unwrap());
        assert_eq!(db.get_recipe_lines(recipe.id).unwrap().len(), 1);
    }

    #[test]
    fn test_recipe_line_rejects_non_positive_qty() {
        let db = Database::open_in_memory().unwrap();
        let flour = db.insert_ingredient(&flour(None)).unwrap();
        let recipe = db.create_recipe(&sample_recipe()).unwrap();
        let result = db.add_recipe_line(&NewRecipeLine {
            recipe_id: recipe.id,
            ingredient_id: flour.id,
            qty: 0.0,
            unit: None,
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_recipe_line_rejects_unknown_ingredient() {
        let db = Database::open_in_memory().unwrap();
        let recipe = db.create_recipe(&sample_recipe()).unwrap();
        let result = db.add_recipe_line(&NewRecipeLine {
            recipe_id: recipe.id,
            ingredient_id: 9999,
            qty: 1.0,
            unit: None,
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_list_lines_for_recipes() {
        let db = Database::open_in_memory().unwrap();
        let flour = db.insert_ingredient(&flour(None)).unwrap();
        let a = db.create_recipe(&sample_recipe()).unwrap();
        let b = db
            .create_recipe(&NewRecipe::titled("Bagel", "bagels", 8.0))
            .unwrap();
        for (recipe_id, qty) in [(a.id, 500.0), (b.id, 800.0), (a.id, 20.0)] {
            db.add_recipe_line(&NewRecipeLine {
                recipe_id,
                ingredient_id: flour.id,
                qty,
                unit: None,
            })
            .unwrap();
        }

        assert!(db.list_lines_for_recipes(&[]).unwrap().is_empty());
        assert_eq!(db.list_lines_for_recipes(&[a.id]).unwrap().len(), 2);
        let both = db.list_lines_for_recipes(&[b.id, a.id]).unwrap();
        assert_eq!(both.len(), 3);
        assert_eq!(both[0].recipe_id, a.id);
        assert_eq!(both[2].recipe_id, b.id);
    }

    #[test]
    fn test_delete_recipe_removes_plan_items() {
        let db = Database::open_in_memory().unwrap();
        let recipe = db.create_recipe(&sample_recipe()).unwrap();
        let plan = db.create_plan(&week(10)).unwrap();
        db.add_plan_item(plan.id, recipe.id, 3.0).unwrap();

        db.delete_recipe(recipe.id).unwrap();
        assert!(db.get_recipe_by_id(recipe.id).is_err());
        assert!(db.list_plan_items(plan.id).unwrap().is_empty());
        assert!(db.delete_recipe(recipe.id).is_err());
    }

    #[test]
    fn test_failed_recipe_delete_keeps_children() {
        let db = Database::open_in_memory().unwrap();
        let flour = db.insert_ingredient(&flour(None)).unwrap();
        let recipe = db.create_recipe(&sample_recipe()).unwrap();
        db.add_recipe_line(&NewRecipeLine {
            recipe_id: recipe.id,
            ingredient_id: flour.id,
            qty: 500.0,
            unit: Some("g".to_string()),
        })
        .unwrap();
        let plan = db.create_plan(&week(10)).unwrap();
        db.add_plan_item(plan.id, recipe.id, 2.0).unwrap();
        db.conn
            .execute_batch(
                "CREATE TRIGGER keep_recipes BEFORE DELETE ON recipes
                 BEGIN SELECT RAISE(ABORT, 'recipes are locked'); END;",
            )
            .unwrap();

        assert!(db.delete_recipe(recipe.id).is_err());
        assert!(db.get_recipe_by_id(recipe.id).is_ok());
        assert_eq!(db.get_recipe_lines(recipe.id).unwrap().len(), 1);
        assert_eq!(db.list_plan_items(plan.id).unwrap().len(), 1);
    }

    #[test]
    fn test_failed_ingredient_delete_keeps_lines_and_conversions() {
        let db = Database::open_in_memory().unwrap();
        let mine = db.insert_ingredient(&flour(Some("owner-1"))).unwrap();
        let recipe = db.create_recipe(&sample_recipe()).unwrap();
        db.add_recipe_line(&NewRecipeLine {
            recipe_id: recipe.id,
            ingredient_id: mine.id,
            qty: 2.0,
            unit: Some("cup".to_string()),
        })
        .unwrap();
        db.upsert_conversion(&NewUnitConversion {
            ingredient_id: mine.id,
            from_unit: "cup".to_string(),
            to_unit: "g".to_string(),
            factor: 120.0,
        })
        .unwrap();
        db.conn
            .execute_batch(
                "CREATE TRIGGER keep_ingredients BEFORE DELETE ON ingredients
                 BEGIN SELECT RAISE(ABORT, 'ingredients are locked'); END;",
            )
            .unwrap();

        assert!(db.delete_owned_ingredient(mine.id, "owner-1").is_err());
        assert!(db.find_ingredient(mine.id).unwrap().is_some());
        assert_eq!(db.get_recipe_lines(recipe.id).unwrap().len(), 1);
        assert_eq!(db.list_all_conversions().unwrap().len(), 1);
    }

    #[test]
    fn test_upsert_conversion_replaces_factor() {
        let db = Database::open_in_memory().unwrap();
        let flour = db.insert_ingredient(&flour(None)).unwrap();
        let conversion = NewUnitConversion {
            ingredient_id: flour.id,
            from_unit: "cup".to_string(),
            to_unit: "g".to_string(),
            factor: 120.0,
        };
        let first = db.upsert_conversion(&conversion).unwrap();
        assert_eq!(first.ingredient_name.as_deref(), Some("Bread flour"));

        let second = db
            .upsert_conversion(&NewUnitConversion {
                factor: 125.0,
                ..conversion
            })
            .unwrap();
        assert_eq!(first.id, second.id);
        assert!((second.factor - 125.0).abs() < f64::EPSILON);
        assert_eq!(db.list_all_conversions().unwrap().len(), 1);
    }

    #[test]
    fn test_conversion_rejects_non_positive_factor() {
        let db = Database::open_in_memory().unwrap();
        let flour = db.insert_ingredient(&flour(None)).unwrap();
        let result = db.upsert_conversion(&NewUnitConversion {
            ingredient_id: flour.id,
            from_unit: "cup".to_string(),
            to_unit: "g".to_string(),
            factor: 0.0,
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_list_and_delete_conversions() {
        let db = Database::open_in_memory().unwrap();
        let flour = db.insert_ingredient(&flour(None)).unwrap();
        let butter = db
            .insert_ingredient(&NewIngredient {
                name: "Butter".to_string(),
                canonical_unit: "g".to_string(),
                owner_id: None,
            })
            .unwrap();
        for (ingredient_id, from_unit) in [(flour.id, "cup"), (flour.id, "tbsp"), (butter.id, "tbsp")]
        {
            db.upsert_conversion(&NewUnitConversion {
                ingredient_id,
                from_unit: from_unit.to_string(),
                to_unit: "g".to_string(),
                factor: 10.0,
            })
            .unwrap();
        }

        assert!(db.list_conversions(&[]).unwrap().is_empty());
        assert_eq!(db.list_conversions(&[flour.id]).unwrap().len(), 2);
        let all = db.list_all_conversions().unwrap();
        assert_eq!(all.len(), 3);
        // Sorted by ingredient name
        assert_eq!(all[0].ingredient_name.as_deref(), Some("Bread flour"));
        assert_eq!(all[2].ingredient_name.as_deref(), Some("Butter"));

        assert!(db.delete_conversion(all[0].id).unwrap());
        assert!(!db.delete_conversion(all[0].id).unwrap());
    }

    #[test]
    fn test_plans_newest_first() {
        let db = Database::open_in_memory().unwrap();
        let older = db.create_plan(&week(3)).unwrap();
        let newer = db.create_plan(&week(10)).unwrap();

        assert_eq!(
            older.week_start,
            NaiveDate::from_ymd_opt(2024, 6, 3).unwrap()
        );
        let ids: Vec<i64> = db.list_plans().unwrap().iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![newer.id, older.id]);

        assert!(db.set_plan_archived(older.id, true).unwrap());
        assert!(db.get_plan(older.id).unwrap().is_archived());
        assert!(db.set_plan_archived(older.id, false).unwrap());
        assert!(!db.get_plan(older.id).unwrap().is_archived());
        assert!(db.get_plan(9999).is_err());
    }

    #[test]
    fn test_plan_items() {
        let db = Database::open_in_memory().unwrap();
        let recipe = db.create_recipe(&sample_recipe()).unwrap();
        let plan = db.create_plan(&week(10)).unwrap();

        let item = db.add_plan_item(plan.id, recipe.id, 2.0).unwrap();
        assert_eq!(item.recipe_title.as_deref(), Some("Country Loaf"));
        assert_eq!(item.yield_unit.as_deref(), Some("loaf"));
        db.add_plan_item(plan.id, recipe.id, 3.0).unwrap();

        let items = db.list_plan_items(plan.id).unwrap();
        assert_eq!(items.len(), 2);
        assert!((items[1].batch_qty - 3.0).abs() < f64::EPSILON);

        assert!(db.remove_plan_item(plan.id, item.id).unwrap());
        assert!(!db.remove_plan_item(plan.id, item.id).unwrap());
        assert_eq!(db.list_plan_items(plan.id).unwrap().len(), 1);
        assert!(db.add_plan_item(plan.id, recipe.id, 0.0).is_err());
    }

    #[test]
    fn test_owner_id_persistence() {
        let db = Database::open_in_memory().unwrap();
        let id1 = db.get_or_create_owner_id().unwrap();
        let id2 = db.get_or_create_owner_id().unwrap();
        assert_eq!(id1, id2);
        assert!(Uuid::parse_str(&id1).is_ok());
    }

    #[test]
    fn test_settings_roundtrip() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.get_setting("theme").unwrap().is_none());
        db.set_setting("theme", "dark").unwrap();
        db.set_setting("theme", "light").unwrap();
        assert_eq!(db.get_setting("theme").unwrap().as_deref(), Some("light"));
    }

    #[test]
    fn test_open_file_persists_across_connections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bakeplan.db");
        let ingredient_id = {
            let db = Database::open(&path).unwrap();
            db.insert_ingredient(&flour(None)).unwrap().id
        };

        let reopened = Database::open(&path).unwrap();
        let ingredient = reopened.get_ingredient_by_id(ingredient_id).unwrap();
        assert_eq!(ingredient.name, "Bread flour");
        let version: i64 = reopened
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap();
        assert_eq!(version, 2);
    }
}
