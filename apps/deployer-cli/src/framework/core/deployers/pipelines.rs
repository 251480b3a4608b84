use tracing::{info, warn};

use super::{reconcile_item, run_if_requested};
use crate::framework::core::execute::{DeploymentContext, DeploymentError, RunState};
use crate::framework::core::substitution;
use crate::infrastructure::fabric::models::ItemType;
use crate::utilities::constants::{PIPELINE_CONTENT_PART, PIPELINE_JOB_TYPE};

/// Deploys pipelines, then refreshes the SQL endpoints so semantic models see the tables the
/// notebooks and pipelines just created.
pub async fn deploy(
    ctx: &DeploymentContext<'_>,
    state: &mut RunState<'_>,
) -> Result<(), DeploymentError> {
    ctx.notifier.step("Pipelines");
    let solution = state.solution;

    for source in solution.items_of_type(&ItemType::DataPipeline) {
        let definition =
            substitution::apply(&source.definition, PIPELINE_CONTENT_PART, &state.redirects.pipeline)?;
        let reconciled = reconcile_item(ctx, state, source, definition).await?;
        run_if_requested(
            ctx,
            state,
            source,
            &reconciled,
            PIPELINE_JOB_TYPE,
            ctx.settings.polling.pipeline_interval,
        )
        .await;
    }

    refresh_sql_endpoints(ctx, state).await;
    Ok(())
}

/// Refreshes each SQL endpoint of the run once. A failed refresh is logged only.
async fn refresh_sql_endpoints(ctx: &DeploymentContext<'_>, state: &RunState<'_>) {
    let mut refreshed: Vec<&str> = Vec::new();

    for lakehouse in state.lakehouses.values() {
        let endpoint_id = lakehouse.sql_endpoint.id.as_str();
        if refreshed.contains(&endpoint_id) {
            continue;
        }
        refreshed.push(endpoint_id);

        ctx.notifier.substep(format!(
            "Refresh SQL endpoint of {}",
            lakehouse.item.display_name
        ));
        match ctx.store.refresh_sql_endpoint_metadata(endpoint_id).await {
            Ok(()) => info!("Refreshed SQL endpoint {}", endpoint_id),
            Err(e) => warn!("Could not refresh SQL endpoint {}: {}", endpoint_id, e),
        }
    }
}
