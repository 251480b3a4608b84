//! Export store housekeeping: listing, inspecting and deleting exports and naming new ones.

use chrono::Local;

use crate::cli::display::{Message, MessageType};
use crate::cli::routines::{RoutineFailure, RoutineSuccess};
use crate::framework::core::solution_plan::DeployConfig;
use crate::infrastructure::exports::git::GitExportStore;
use crate::infrastructure::exports::local::LocalExportStore;
use crate::utilities::json::{to_string_styled, JsonStyle};

fn failure(action: &str, error: impl Into<anyhow::Error>) -> RoutineFailure {
    let error = error.into();
    RoutineFailure::new(Message::new(action.to_string(), format!("{error:#}")), error)
}

/// `Product Sales, created 2024-05-01 10:00 UTC: first cut`
fn summarize(config: &DeployConfig) -> String {
    let mut summary = config.solution_name.clone();
    if let Some(created) = config.created {
        summary.push_str(&format!(", created {}", created.format("%Y-%m-%d %H:%M UTC")));
    }
    if let Some(comment) = &config.comment {
        summary.push_str(&format!(": {comment}"));
    }
    summary
}

pub fn list_exports(store: &LocalExportStore) -> Result<RoutineSuccess, RoutineFailure> {
    let exports = store
        .list_export_configs()
        .map_err(|e| failure("Exports", e))?;

    for (name, config) in &exports {
        show_message!(MessageType::Info, Message::new(name.clone(), summarize(config)));
    }

    Ok(RoutineSuccess::info(Message::new(
        "Exports".to_string(),
        format!("{} exports in {}", exports.len(), store.root().display()),
    )))
}

pub fn show_export(store: &LocalExportStore, name: &str) -> Result<RoutineSuccess, RoutineFailure> {
    let config = store
        .read_deploy_config(name)
        .map_err(|e| failure("Show", e))?;
    let rendered = to_string_styled(&config, JsonStyle::EXPORT).map_err(|e| failure("Show", e))?;
    println!("{rendered}");

    Ok(RoutineSuccess::info(Message::new(
        "Show".to_string(),
        summarize(&config),
    )))
}

pub fn delete_export(store: &LocalExportStore, name: &str) -> Result<RoutineSuccess, RoutineFailure> {
    store.delete_export(name).map_err(|e| failure("Delete", e))?;
    Ok(RoutineSuccess::success(Message::new(
        "Deleted".to_string(),
        format!("export {name}"),
    )))
}

pub fn list_branches(store: &GitExportStore, project: &str) -> Result<RoutineSuccess, RoutineFailure> {
    let branches = store
        .list_branches(project)
        .map_err(|e| failure("Branches", e))?;
    for branch in &branches {
        show_message!(MessageType::Info, Message::new("Branch".to_string(), branch.clone()));
    }
    Ok(RoutineSuccess::info(Message::new(
        "Branches".to_string(),
        format!("{} exports in project {}", branches.len(), project),
    )))
}

pub fn suggest_name(store: &GitExportStore, project: &str) -> Result<RoutineSuccess, RoutineFailure> {
    let name = store
        .suggest_export_name(project, Local::now().naive_local())
        .map_err(|e| failure("Suggest", e))?;
    Ok(RoutineSuccess::info(Message::new("Suggested".to_string(), name)))
}
