mod commands;
mod config;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

use crate::commands::{
    RecipeArgs, cmd_conversion_add, cmd_conversion_delete, cmd_conversion_list,
    cmd_conversion_missing, cmd_ingredient_add, cmd_ingredient_delete, cmd_ingredient_list,
    cmd_ingredient_seed, cmd_plan_add_item, cmd_plan_archive, cmd_plan_create, cmd_plan_list,
    cmd_plan_remove_item, cmd_plan_show, cmd_plan_totals, cmd_recipe_add_line,
    cmd_recipe_archive, cmd_recipe_create, cmd_recipe_delete, cmd_recipe_import, cmd_recipe_list,
    cmd_recipe_remove_line, cmd_recipe_scale, cmd_recipe_show, cmd_recipe_update, cmd_totals,
};
use crate::config::Config;
use bakeplan_core::service::PlannerService;

#[derive(Parser)]
#[command(
    name = "bakeplan",
    version,
    about = "Plan a bakery's week and total what it needs",
    long_about = "Plan a bakery's week and total what it needs.\n\n\
        Ingredient quantities are converted into each ingredient's canonical unit \
        using per-ingredient conversions. Lines without a conversion are never \
        guessed: they are counted and listed by `bakeplan conversion missing`.\n\n\
        Set BAKEPLAN_DB to use a specific database file and RUST_LOG for diagnostics."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage ingredients (yours and the shared library)
    Ingredient {
        #[command(subcommand)]
        command: IngredientCommands,
    },
    /// Manage recipes and their ingredient lines
    Recipe {
        #[command(subcommand)]
        command: RecipeCommands,
    },
    /// Manage per-ingredient unit conversions
    Conversion {
        #[command(subcommand)]
        command: ConversionCommands,
    },
    /// Manage weekly production plans
    Plan {
        #[command(subcommand)]
        command: PlanCommands,
    },
    /// Total an ad-hoc list of ingredient lines from a JSON file
    Totals {
        /// Path to a JSON array of {ingredient_id, qty, unit?, multiplier?} ("-" for stdin)
        file: PathBuf,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum IngredientCommands {
    /// Add one of your own ingredients
    Add {
        /// Ingredient name
        name: String,
        /// Canonical unit totals are kept in: g, kg, oz, lb, ml, l, tsp, tbsp, cup, unit
        #[arg(short, long, default_value = "g")]
        unit: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List your ingredients and the shared library
    List {
        /// Only show ingredients whose name contains this text
        #[arg(short, long)]
        search: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete one of your ingredients, with its recipe lines and conversions
    Delete {
        /// Ingredient ID
        id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Add the default shared baking ingredients
    SeedDefaults {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum RecipeCommands {
    /// Create a new recipe
    Create {
        /// Recipe title
        title: String,
        #[command(flatten)]
        fields: RecipeArgs,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Update recipe details
    Update {
        /// Recipe ID or title
        recipe: String,
        /// New title
        #[arg(long)]
        title: Option<String>,
        #[command(flatten)]
        fields: RecipeArgs,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show a recipe with its ingredient lines
    Show {
        /// Recipe ID or title
        recipe: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List recipes
    List {
        /// Only this category
        #[arg(short, long)]
        category: Option<String>,
        /// Comma-separated allergen tags (matches any)
        #[arg(long)]
        allergens: Option<String>,
        /// Comma-separated dietary tags (matches any)
        #[arg(long)]
        dietary: Option<String>,
        /// Include archived recipes
        #[arg(short, long)]
        all: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Archive a recipe (hidden from lists, cannot be planned)
    Archive {
        /// Recipe ID or title
        recipe: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Restore an archived recipe
    Restore {
        /// Recipe ID or title
        recipe: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Permanently delete a recipe and remove it from weekly plans
    Delete {
        /// Recipe ID or title
        recipe: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Add an ingredient line to a recipe
    AddLine {
        /// Recipe ID or title
        recipe: String,
        /// Ingredient ID or name (an unknown name creates the ingredient)
        ingredient: String,
        /// Quantity
        qty: f64,
        /// Unit of the quantity (default: the ingredient's canonical unit)
        #[arg(short, long)]
        unit: Option<String>,
        /// Canonical unit for a newly created ingredient (default: --unit, else g)
        #[arg(long)]
        canonical_unit: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove an ingredient line from a recipe
    RemoveLine {
        /// Recipe ID or title
        recipe: String,
        /// Line ID (shown by `recipe show`)
        line_id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Preview a recipe scaled from its yield to a target quantity
    Scale {
        /// Recipe ID or title
        recipe: String,
        /// Target output, in the recipe's yield unit
        target: f64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Import a recipe from a Cooklang (.cook) file
    Import {
        /// Path to the .cook file
        file: PathBuf,
        /// Title override (defaults to metadata title or filename)
        #[arg(long)]
        title: Option<String>,
        /// Recipe category
        #[arg(short, long, default_value = "other")]
        category: String,
        /// Yield override (defaults to metadata servings, else 1)
        #[arg(long)]
        yield_qty: Option<f64>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum ConversionCommands {
    /// Save a conversion, e.g. `conversion add "Bread flour" cup 120`
    Add {
        /// Ingredient ID or name
        ingredient: String,
        /// Unit being converted from
        from_unit: String,
        /// How many target units one `from_unit` is
        factor: f64,
        /// Unit being converted to (default: the ingredient's canonical unit)
        #[arg(long)]
        to: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List saved conversions
    List {
        /// Only conversions for this ingredient (ID or name)
        #[arg(short, long)]
        ingredient: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a conversion by ID
    Delete {
        /// Conversion ID
        id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show units used in recipes that have no conversion yet
    Missing {
        /// Only recipes with any of these comma-separated allergen tags
        #[arg(long)]
        allergens: Option<String>,
        /// Only recipes with any of these comma-separated dietary tags
        #[arg(long)]
        dietary: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum PlanCommands {
    /// Create a weekly plan
    Create {
        /// Plan title
        title: String,
        /// First day (YYYY-MM-DD or today/yesterday/tomorrow, default: today)
        #[arg(long)]
        start: Option<String>,
        /// Last day (default: six days after the start)
        #[arg(long)]
        end: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List weekly plans, newest first
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the recipes scheduled in a plan
    Show {
        /// Plan ID
        plan_id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Schedule batches of a recipe
    AddItem {
        /// Plan ID
        plan_id: i64,
        /// Recipe ID or title
        recipe: String,
        /// Number of batches
        batches: f64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove a scheduled recipe
    RemoveItem {
        /// Plan ID
        plan_id: i64,
        /// Item ID (shown by `plan show`)
        item_id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Archive a plan
    Archive {
        /// Plan ID
        plan_id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Restore an archived plan
    Restore {
        /// Plan ID
        plan_id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Total the ingredients a plan needs, in canonical units
    Totals {
        /// Plan ID
        plan_id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    init_tracing();
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

/// Diagnostics go to stderr so `--json` output on stdout stays parseable.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[allow(clippy::too_many_lines)]
fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let svc = PlannerService::new(&config.db_path)?;

    match cli.command {
        Commands::Ingredient { command } => match command {
            IngredientCommands::Add { name, unit, json } => {
                cmd_ingredient_add(&svc, &name, &unit, json)
            }
            IngredientCommands::List { search, json } => {
                cmd_ingredient_list(&svc, search.as_deref(), json)
            }
            IngredientCommands::Delete { id, json } => cmd_ingredient_delete(&svc, id, json),
            IngredientCommands::SeedDefaults { json } => cmd_ingredient_seed(&svc, json),
        },
        Commands::Recipe { command } => match command {
            RecipeCommands::Create {
                title,
                fields,
                json,
            } => cmd_recipe_create(&svc, &title, fields, json),
            RecipeCommands::Update {
                recipe,
                title,
                fields,
                json,
            } => cmd_recipe_update(&svc, &recipe, title, fields, json),
            RecipeCommands::Show { recipe, json } => cmd_recipe_show(&svc, &recipe, json),
            RecipeCommands::List {
                category,
                allergens,
                dietary,
                all,
                json,
            } => cmd_recipe_list(
                &svc,
                category,
                allergens.as_deref(),
                dietary.as_deref(),
                all,
                json,
            ),
            RecipeCommands::Archive { recipe, json } => {
                cmd_recipe_archive(&svc, &recipe, true, json)
            }
            RecipeCommands::Restore { recipe, json } => {
                cmd_recipe_archive(&svc, &recipe, false, json)
            }
            RecipeCommands::Delete { recipe, json } => cmd_recipe_delete(&svc, &recipe, json),
            RecipeCommands::AddLine {
                recipe,
                ingredient,
                qty,
                unit,
                canonical_unit,
                json,
            } => cmd_recipe_add_line(
                &svc,
                &recipe,
                &ingredient,
                qty,
                unit.as_deref(),
                canonical_unit.as_deref(),
                json,
            ),
            RecipeCommands::RemoveLine {
                recipe,
                line_id,
                json,
            } => cmd_recipe_remove_line(&svc, &recipe, line_id, json),
            RecipeCommands::Scale {
                recipe,
                target,
                json,
            } => cmd_recipe_scale(&svc, &recipe, target, json),
            RecipeCommands::Import {
                file,
                title,
                category,
                yield_qty,
                json,
            } => cmd_recipe_import(&svc, &file, title, &category, yield_qty, json),
        },
        Commands::Conversion { command } => match command {
            ConversionCommands::Add {
                ingredient,
                from_unit,
                factor,
                to,
                json,
            } => cmd_conversion_add(&svc, &ingredient, &from_unit, factor, to.as_deref(), json),
            ConversionCommands::List { ingredient, json } => {
                cmd_conversion_list(&svc, ingredient.as_deref(), json)
            }
            ConversionCommands::Delete { id, json } => cmd_conversion_delete(&svc, id, json),
            ConversionCommands::Missing {
                allergens,
                dietary,
                json,
            } => cmd_conversion_missing(&svc, allergens.as_deref(), dietary.as_deref(), json),
        },
        Commands::Plan { command } => match command {
            PlanCommands::Create {
                title,
                start,
                end,
                json,
            } => cmd_plan_create(&svc, &title, start, end, json),
            PlanCommands::List { json } => cmd_plan_list(&svc, json),
            PlanCommands::Show { plan_id, json } => cmd_plan_show(&svc, plan_id, json),
            PlanCommands::AddItem {
                plan_id,
                recipe,
                batches,
                json,
            } => cmd_plan_add_item(&svc, plan_id, &recipe, batches, json),
            PlanCommands::RemoveItem {
                plan_id,
                item_id,
                json,
            } => cmd_plan_remove_item(&svc, plan_id, item_id, json),
            PlanCommands::Archive { plan_id, json } => {
                cmd_plan_archive(&svc, plan_id, true, json)
            }
            PlanCommands::Restore { plan_id, json } => {
                cmd_plan_archive(&svc, plan_id, false, json)
            }
            PlanCommands::Totals { plan_id, json } => cmd_plan_totals(&svc, plan_id, json),
        },
        Commands::Totals { file, json } => cmd_totals(&svc, &file, json),
    }
}
