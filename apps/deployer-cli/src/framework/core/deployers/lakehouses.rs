//! Lakehouses and their shortcuts.
//!
//! Lakehouses carry no definition: an existing lakehouse is left as it is, and its tables are
//! filled by notebooks and pipelines later in the run. What matters here is waiting for each
//! lakehouse's SQL endpoint, since semantic models are redirected to it.

use std::collections::HashSet;

use tracing::{debug, info, warn};

use crate::framework::core::deployment_plan::AdlsOverride;
use crate::framework::core::execute::{
    DeploymentContext, DeploymentError, RunMode, RunState, TargetLakehouse,
};
use crate::framework::core::redirects::RedirectMap;
use crate::framework::core::remote_jobs::wait_for_sql_endpoint;
use crate::framework::core::solution_plan::SourceShortcut;
use crate::infrastructure::fabric::models::{CreateItemRequest, CreateShortcutRequest, ItemType};
use crate::utilities::constants::ADLS_GEN2_SHORTCUT_TYPE;

pub async fn deploy(
    ctx: &DeploymentContext<'_>,
    state: &mut RunState<'_>,
) -> Result<(), DeploymentError> {
    ctx.notifier.step("Lakehouses");
    let solution = state.solution;
    let workspace_id = state.workspace_id().to_string();

    for source in solution.items_of_type(&ItemType::Lakehouse) {
        let target = match state
            .find_target(&source.display_name, &ItemType::Lakehouse)
            .cloned()
        {
            Some(existing) => {
                ctx.notifier
                    .substep(format!("Lakehouse {} already exists", source.display_name));
                existing
            }
            None => {
                ctx.notifier
                    .substep(format!("Create lakehouse {}", source.display_name));
                let created = ctx
                    .store
                    .create_item(
                        &workspace_id,
                        CreateItemRequest::new(&source.display_name, ItemType::Lakehouse),
                    )
                    .await?;
                state.summary.created.push(created.qualified_name());
                created
            }
        };

        ctx.notifier.operation_start(format!(
            "Wait for the SQL endpoint of {}",
            source.display_name
        ));
        let endpoint = wait_for_sql_endpoint(
            ctx.store,
            &workspace_id,
            &target,
            ctx.settings.sql_endpoint_interval,
            ctx.notifier,
        )
        .await?;
        ctx.notifier
            .operation_complete(format!("SQL endpoint {} is ready", endpoint.id));

        let source_lakehouse = solution
            .config
            .source_lakehouses
            .iter()
            .find(|lakehouse| lakehouse.display_name == source.display_name);
        let source_id = solution
            .config
            .find_source_item(&source.display_name, &ItemType::Lakehouse)
            .map(|item| item.id.as_str())
            .or(source_lakehouse.map(|lakehouse| lakehouse.id.as_str()));

        match source_id {
            Some(source_id) => state.redirects.add_lakehouse(source_id, &target.id),
            None => warn!(
                "Lakehouse {} has no source id, references to it are left as they are",
                source.display_name
            ),
        }
        if let Some(source_lakehouse) = source_lakehouse {
            state.redirects.add_sql_endpoint(source_lakehouse, &endpoint);
        }

        info!("Lakehouse {} is {}", source.display_name, target.id);
        state.lakehouses.insert(
            source.display_name.clone(),
            TargetLakehouse {
                item: target,
                sql_endpoint: endpoint,
            },
        );
    }
    Ok(())
}

/// Creates the ADLS Gen2 shortcuts of the source lakehouses.
///
/// Shortcuts already present in the target are left alone. On update, missing shortcuts are
/// only reported.
pub async fn deploy_shortcuts(
    ctx: &DeploymentContext<'_>,
    state: &mut RunState<'_>,
) -> Result<(), DeploymentError> {
    ctx.notifier.step("Shortcuts");
    let solution = state.solution;
    let workspace_id = state.workspace_id().to_string();
    let adls = state.plan().adls_override();

    for source in &solution.config.source_lakehouses {
        let shortcuts = match &source.shortcuts {
            Some(shortcuts) if !shortcuts.is_empty() => shortcuts,
            _ => continue,
        };
        let target = match state.lakehouses.get(&source.display_name) {
            Some(target) => target,
            None => {
                warn!(
                    "Lakehouse {} is not part of the solution, skipping its shortcuts",
                    source.display_name
                );
                continue;
            }
        };

        let existing: HashSet<String> = ctx
            .store
            .list_shortcuts(&workspace_id, &target.item.id)
            .await?
            .iter()
            .map(|shortcut| shortcut.full_path())
            .collect();

        for shortcut in shortcuts {
            if !shortcut
                .shortcut_type
                .eq_ignore_ascii_case(ADLS_GEN2_SHORTCUT_TYPE)
            {
                debug!(
                    "Skipping {} shortcut {}",
                    shortcut.shortcut_type, shortcut.name
                );
                continue;
            }
            let full_path = format!("{}/{}", shortcut.path, shortcut.name);
            if existing.contains(&full_path) {
                debug!("Shortcut {} already exists", full_path);
                continue;
            }
            if state.mode == RunMode::Update {
                ctx.notifier.substep(format!("New shortcut {full_path}"));
                continue;
            }

            ctx.notifier.substep(format!("Create shortcut {full_path}"));
            let request = shortcut_request(shortcut, &state.redirects.shortcut, adls.as_ref())?;
            ctx.store
                .create_shortcut(&workspace_id, &target.item.id, request)
                .await?;
        }
    }
    Ok(())
}

/// Target shortcut for a source one: the ADLS override, when complete, decides where it points,
/// otherwise the source location is redirected.
fn shortcut_request(
    source: &SourceShortcut,
    redirects: &RedirectMap,
    adls: Option<&AdlsOverride<'_>>,
) -> Result<CreateShortcutRequest, DeploymentError> {
    let (location, subpath) = match adls {
        Some(adls) => (
            adls.server.trim_end_matches('/').to_string(),
            format!("/{}{}", adls.container_name, adls.container_path),
        ),
        None => (
            redirects.apply(source.location.as_deref().unwrap_or_default())?,
            redirects.apply(source.subpath.as_deref().unwrap_or_default())?,
        ),
    };
    let connection_id = source
        .connection_id
        .as_deref()
        .map(|id| redirects.get(id).unwrap_or(id).to_string())
        .unwrap_or_default();

    Ok(CreateShortcutRequest {
        name: source.name.clone(),
        path: source.path.clone(),
        location,
        subpath,
        connection_id,
    })
}
