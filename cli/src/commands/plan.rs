use anyhow::Result;
use chrono::Duration;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use bakeplan_core::models::NewWeeklyPlan;
use bakeplan_core::service::PlannerService;

use super::helpers::{exit_not_found, format_qty, parse_date, print_totals_table, truncate};
use super::resolve_recipe;

/// Create a plan. The week runs seven days from `start` unless `end` is given.
pub(crate) fn cmd_plan_create(
    svc: &PlannerService,
    title: &str,
    start: Option<String>,
    end: Option<String>,
    json: bool,
) -> Result<()> {
    let week_start = parse_date(start)?;
    let week_end = match end {
        Some(end) => parse_date(Some(end))?,
        None => week_start + Duration::days(6),
    };
    let plan = svc.create_plan(&NewWeeklyPlan {
        title: title.to_string(),
        week_start,
        week_end,
    })?;
    if json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
    } else {
        let id = plan.id;
        let title = &plan.title;
        println!("Created plan: {title} (id: {id}, {week_start} to {week_end})");
        println!("Schedule bakes with: bakeplan plan add-item {id} <recipe> <batches>");
    }
    Ok(())
}

pub(crate) fn cmd_plan_list(svc: &PlannerService, json: bool) -> Result<()> {
    #[derive(Tabled)]
    struct PlanRow {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "Title")]
        title: String,
        #[tabled(rename = "Week")]
        week: String,
        #[tabled(rename = "Status")]
        status: &'static str,
    }

    let plans = svc.list_plans()?;
    if plans.is_empty() {
        if json {
            println!("[]");
        } else {
            eprintln!("No weekly plans found");
        }
        std::process::exit(2);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&plans)?);
        return Ok(());
    }

    let rows: Vec<PlanRow> = plans
        .iter()
        .map(|p| PlanRow {
            id: p.id,
            title: truncate(&p.title, 30),
            week: format!("{} to {}", p.week_start, p.week_end),
            status: if p.is_archived() { "archived" } else { "active" },
        })
        .collect();

    let table = Table::new(&rows).with(Style::rounded()).to_string();
    println!("{table}");
    Ok(())
}

pub(crate) fn cmd_plan_show(svc: &PlannerService, plan_id: i64, json: bool) -> Result<()> {
    #[derive(Tabled)]
    struct ItemRow {
        #[tabled(rename = "Item")]
        id: i64,
        #[tabled(rename = "Recipe")]
        recipe: String,
        #[tabled(rename = "Batches")]
        batches: String,
        #[tabled(rename = "Output")]
        output: String,
    }

    let detail = svc.get_plan_detail(plan_id)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&detail)?);
        return Ok(());
    }

    let plan = &detail.plan;
    let title = &plan.title;
    let archived = if plan.is_archived() { " [archived]" } else { "" };
    println!(
        "=== {title}{archived} ({} to {}) ===",
        plan.week_start, plan.week_end
    );
    if detail.items.is_empty() {
        println!("  No recipes scheduled yet");
        return Ok(());
    }

    let rows: Vec<ItemRow> = detail
        .items
        .iter()
        .map(|i| ItemRow {
            id: i.id,
            recipe: truncate(i.recipe_title.as_deref().unwrap_or("?"), 30),
            batches: format_qty(i.batch_qty),
            output: match (i.yield_qty, i.yield_unit.as_deref()) {
                (Some(y), Some(unit)) => format!("{} {unit}", format_qty(y * i.batch_qty)),
                _ => "-".to_string(),
            },
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(2..)).with(Alignment::right()))
        .to_string();
    println!("{table}");
    Ok(())
}

pub(crate) fn cmd_plan_add_item(
    svc: &PlannerService,
    plan_id: i64,
    recipe_ref: &str,
    batches: f64,
    json: bool,
) -> Result<()> {
    let recipe = resolve_recipe(svc, recipe_ref)?;
    let item = svc.add_plan_item(plan_id, recipe.id, batches)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&item)?);
    } else {
        let title = &recipe.title;
        let batches = format_qty(item.batch_qty);
        let id = item.id;
        println!("Scheduled {batches} batch(es) of {title} (item {id})");
    }
    Ok(())
}

pub(crate) fn cmd_plan_remove_item(
    svc: &PlannerService,
    plan_id: i64,
    item_id: i64,
    json: bool,
) -> Result<()> {
    if svc.remove_plan_item(plan_id, item_id)? {
        if json {
            println!("{}", serde_json::json!({ "removed": item_id }));
        } else {
            println!("Removed item {item_id} from plan {plan_id}");
        }
        Ok(())
    } else {
        exit_not_found(&format!("Item {item_id} not found in plan {plan_id}"), json);
    }
}

pub(crate) fn cmd_plan_archive(
    svc: &PlannerService,
    plan_id: i64,
    archived: bool,
    json: bool,
) -> Result<()> {
    let changed = if archived {
        svc.archive_plan(plan_id)?
    } else {
        svc.restore_plan(plan_id)?
    };
    if !changed {
        exit_not_found(&format!("Weekly plan {plan_id} not found"), json);
    }
    let plan = svc.get_plan_detail(plan_id)?.plan;
    if json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
    } else {
        let title = &plan.title;
        let action = if archived { "Archived" } else { "Restored" };
        println!("{action} plan: {title}");
    }
    Ok(())
}

pub(crate) fn cmd_plan_totals(svc: &PlannerService, plan_id: i64, json: bool) -> Result<()> {
    let totals = svc.plan_totals(plan_id)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&totals)?);
        return Ok(());
    }
    if totals.is_empty() {
        println!("Plan {plan_id} has no ingredient lines to total");
        return Ok(());
    }
    print_totals_table(&totals);
    Ok(())
}
