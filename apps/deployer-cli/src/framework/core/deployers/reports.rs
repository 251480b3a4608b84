use std::collections::HashSet;

use tracing::{debug, warn};

use super::reconcile_item;
use crate::framework::core::execute::{DeploymentContext, DeploymentError, RunState};
use crate::framework::core::substitution::{customize_report_title, redirect_report};
use crate::infrastructure::fabric::models::ItemType;

/// Deploys reports bound to the semantic models of the target workspace.
///
/// Customer tenant deployments also prefix each report title with the customer name.
pub async fn deploy(
    ctx: &DeploymentContext<'_>,
    state: &mut RunState<'_>,
) -> Result<(), DeploymentError> {
    ctx.notifier.step("Reports");
    let solution = state.solution;

    for source in solution.items_of_type(&ItemType::Report) {
        let mut definition = redirect_report(
            &source.definition,
            &state.redirects.report,
            &state.semantic_models,
        )?;
        if solution.plan.is_customer_tenant() {
            definition =
                customize_report_title(&definition, &source.display_name, &solution.plan.name)?;
        }
        reconcile_item(ctx, state, source, definition).await?;
    }
    Ok(())
}

/// Seeds the report redirects from semantic models that already exist in the target.
///
/// Used when only reports are updated, so the models are matched by name instead of being
/// deployed. Lakehouse default models are not part of the solution and are ignored.
pub fn bind_existing_models(state: &mut RunState<'_>) {
    let solution = state.solution;
    let config = &solution.config;
    let lakehouses: HashSet<&str> = config.lakehouse_names();

    for source in config
        .source_items
        .iter()
        .filter(|item| item.item_type == ItemType::SemanticModel)
        .filter(|item| !lakehouses.contains(item.display_name.as_str()))
    {
        let target = state
            .inventory
            .iter()
            .find(|item| item.is(&source.display_name, &ItemType::SemanticModel));
        match target {
            Some(target) => {
                debug!("Report redirect {} -> {}", source.id, target.id);
                state.redirects.report.insert(source.id.as_str(), target.id.as_str());
                state
                    .semantic_models
                    .insert(target.display_name.clone(), target.id.clone());
            }
            None => warn!(
                "Semantic model {} is missing from the target workspace",
                source.display_name
            ),
        }
    }
}
