use tracing::warn;

use super::{reconcile_item, run_if_requested};
use crate::framework::core::execute::{DeploymentContext, DeploymentError, RunState};
use crate::framework::core::substitution;
use crate::infrastructure::fabric::models::ItemType;
use crate::utilities::constants::{NOTEBOOK_CONTENT_PART, NOTEBOOK_JOB_TYPE};

/// Deploys notebooks with workspace, lakehouse and connection ids redirected.
pub async fn deploy(
    ctx: &DeploymentContext<'_>,
    state: &mut RunState<'_>,
) -> Result<(), DeploymentError> {
    ctx.notifier.step("Notebooks");
    let solution = state.solution;

    for source in solution.items_of_type(&ItemType::Notebook) {
        let definition =
            substitution::apply(&source.definition, NOTEBOOK_CONTENT_PART, &state.redirects.notebook)?;
        let reconciled = reconcile_item(ctx, state, source, definition).await?;

        // pipelines reference the notebooks they run
        match solution
            .config
            .find_source_item(&source.display_name, &ItemType::Notebook)
        {
            Some(source_item) => state
                .redirects
                .add_notebook(&source_item.id, &reconciled.item().id),
            None => warn!("Notebook {} has no source id", source.display_name),
        }

        run_if_requested(
            ctx,
            state,
            source,
            &reconciled,
            NOTEBOOK_JOB_TYPE,
            ctx.settings.polling.notebook_interval,
        )
        .await;
    }
    Ok(())
}
