//! Semantic models and the connections their data sources are bound to.

use std::collections::HashSet;

use tracing::{debug, warn};

use super::reconcile_item;
use crate::framework::core::execute::{DeploymentContext, DeploymentError, RunState};
use crate::framework::core::substitution;
use crate::infrastructure::fabric::models::{
    workspace_connection_name, CreateConnectionRequest, Item, ItemType,
};
use crate::infrastructure::powerbi::Datasource;
use crate::utilities::constants::SEMANTIC_MODEL_EXPRESSIONS_PART;

/// Deploys the solution's own semantic models.
///
/// Every lakehouse comes with a default model of the same name that the platform manages, so
/// models named like a lakehouse are skipped. Newly created models are bound to target
/// connections; updated models keep the binding they already have.
pub async fn deploy(
    ctx: &DeploymentContext<'_>,
    state: &mut RunState<'_>,
) -> Result<(), DeploymentError> {
    ctx.notifier.step("Semantic models");
    let solution = state.solution;

    let mut lakehouse_names: HashSet<&str> = solution.config.lakehouse_names();
    lakehouse_names.extend(
        solution
            .items_of_type(&ItemType::Lakehouse)
            .map(|item| item.display_name.as_str()),
    );

    for source in solution.items_of_type(&ItemType::SemanticModel) {
        if lakehouse_names.contains(source.display_name.as_str()) {
            debug!("Skipping default semantic model {}", source.display_name);
            continue;
        }

        let definition = substitution::apply(
            &source.definition,
            SEMANTIC_MODEL_EXPRESSIONS_PART,
            &state.redirects.semantic_model,
        )?;
        let reconciled = reconcile_item(ctx, state, source, definition).await?;
        let model = reconciled.item().clone();

        if let Some(source_item) = solution
            .config
            .find_source_item(&source.display_name, &ItemType::SemanticModel)
        {
            state.redirects.add_semantic_model(&source_item.id, &model.id);
        }
        state
            .semantic_models
            .insert(model.display_name.clone(), model.id.clone());

        if reconciled.was_created() {
            bind_datasources(ctx, state, &model).await?;
        }
    }
    Ok(())
}

/// Binds every detected data source of `model` to a connection owned by the target workspace.
async fn bind_datasources(
    ctx: &DeploymentContext<'_>,
    state: &RunState<'_>,
    model: &Item,
) -> Result<(), DeploymentError> {
    let workspace_id = state.workspace_id();
    let datasources = ctx.models.get_datasources(workspace_id, &model.id).await?;

    for datasource in &datasources {
        match datasource.datasource_type.as_str() {
            "sql" => {
                let request = sql_connection_request(state, datasource, ctx);
                ctx.notifier
                    .substep(format!("Bind {} to {}", model.display_name, request.display_name));
                let connection = ctx.store.create_connection(request).await?;
                ctx.models
                    .bind_to_connection(workspace_id, &model.id, &connection.id)
                    .await?;
            }
            "web" => {
                let url = datasource.url.as_deref().unwrap_or_default();
                let request = CreateConnectionRequest::anonymous_web(
                    workspace_connection_name(workspace_id, "Web"),
                    url,
                );
                ctx.notifier
                    .substep(format!("Bind {} to {}", model.display_name, url));
                let connection = ctx.store.create_connection(request).await?;
                ctx.models
                    .bind_to_connection(workspace_id, &model.id, &connection.id)
                    .await?;

                ctx.notifier
                    .operation_start(format!("Refresh {}", model.display_name));
                ctx.models.refresh(workspace_id, &model.id).await?;
                ctx.notifier
                    .operation_complete(format!("Refreshed {}", model.display_name));
            }
            other => warn!(
                "Semantic model {} has a {} data source that is left unbound",
                model.display_name, other
            ),
        }
    }
    Ok(())
}

/// SQL datasources point at a lakehouse SQL endpoint; the connection is named after that
/// lakehouse when it is one of the run's.
fn sql_connection_request(
    state: &RunState<'_>,
    datasource: &Datasource,
    ctx: &DeploymentContext<'_>,
) -> CreateConnectionRequest {
    let database = datasource.database.as_deref().unwrap_or_default();
    let suffix = state
        .lakehouses
        .values()
        .find(|lakehouse| lakehouse.sql_endpoint.id == database)
        .map(|lakehouse| format!("Lakehouse[{}]", lakehouse.item.display_name))
        .unwrap_or_else(|| "SQL".to_string());

    CreateConnectionRequest::sql(
        workspace_connection_name(state.workspace_id(), &suffix),
        datasource.server.as_deref().unwrap_or_default(),
        database,
        ctx.settings.secrets.service_principal(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framework::core::deployment_plan::DeploymentPlan;
    use crate::framework::core::execute::{EngineSettings, RunMode, TargetLakehouse};
    use crate::framework::core::item_definition::{DefinitionPart, ItemDefinition};
    use crate::framework::core::solution_plan::{DeployConfig, DeploymentItem, SolutionDeploymentPlan};
    use crate::framework::progress::ProgressNotifier;
    use crate::infrastructure::fabric::models::SqlEndpointInfo;
    use crate::test_utils::{MockGateway, MockItemStore};

    fn solution() -> SolutionDeploymentPlan {
        let model = |name: &str| {
            DeploymentItem::new(
                name,
                ItemType::SemanticModel,
                ItemDefinition::new(vec![DefinitionPart::from_text(
                    SEMANTIC_MODEL_EXPRESSIONS_PART,
                    "expression",
                )])
                .unwrap(),
            )
        };
        SolutionDeploymentPlan::new(
            DeploymentPlan::staged(),
            vec![
                DeploymentItem::new("sales", ItemType::Lakehouse, ItemDefinition::empty()),
                model("sales"),
                model("Sales Model"),
            ],
            DeployConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_new_models_are_bound_and_default_models_skipped() {
        let store = MockItemStore::new();
        let workspace = store.add_workspace("Target", None);
        let lakehouse = store.add_item(&workspace.id, "sales", ItemType::Lakehouse);
        let gateway = MockGateway::new();
        gateway.set_datasources(vec![
            Datasource {
                datasource_type: "sql".to_string(),
                server: Some("tgt.datawarehouse.example".to_string()),
                database: Some("tgt-sql".to_string()),
                url: None,
            },
            Datasource {
                datasource_type: "web".to_string(),
                url: Some("https://c/d/".to_string()),
                ..Datasource::default()
            },
        ]);
        let settings = EngineSettings::default();
        let notifier = ProgressNotifier::disabled();
        let ctx = DeploymentContext {
            store: &store,
            models: &gateway,
            notifier: &notifier,
            settings: &settings,
        };
        let solution = solution();
        let mut state = RunState::new(&solution, RunMode::Deploy, workspace.clone(), Vec::new());
        state.lakehouses.insert(
            "sales".to_string(),
            TargetLakehouse {
                item: lakehouse,
                sql_endpoint: SqlEndpointInfo {
                    id: "tgt-sql".to_string(),
                    connection_string: "tgt.datawarehouse.example".to_string(),
                    provisioning_status: "Success".to_string(),
                },
            },
        );

        deploy(&ctx, &mut state).await.unwrap();

        assert_eq!(state.summary.created, vec!["Sales Model.SemanticModel".to_string()]);
        let names: Vec<String> = store
            .connections()
            .into_iter()
            .map(|connection| connection.display_name)
            .collect();
        assert!(names.contains(&format!("Workspace[{}]-Lakehouse[sales]", workspace.id)));
        assert!(names.contains(&format!("Workspace[{}]-Web", workspace.id)));
        assert_eq!(gateway.bindings().len(), 2);
        assert_eq!(gateway.refreshes(), 1);
    }

    #[tokio::test]
    async fn test_updated_models_are_not_rebound() {
        let store = MockItemStore::new();
        let workspace = store.add_workspace("Target", None);
        let existing = store.add_item(&workspace.id, "Sales Model", ItemType::SemanticModel);
        let gateway = MockGateway::new();
        let settings = EngineSettings::default();
        let notifier = ProgressNotifier::disabled();
        let ctx = DeploymentContext {
            store: &store,
            models: &gateway,
            notifier: &notifier,
            settings: &settings,
        };
        let solution = solution();
        let mut state = RunState::new(
            &solution,
            RunMode::Update,
            workspace,
            vec![existing.clone()],
        );

        deploy(&ctx, &mut state).await.unwrap();

        assert_eq!(state.semantic_models.get("Sales Model"), Some(&existing.id));
        assert!(gateway.bindings().is_empty());
    }
}
