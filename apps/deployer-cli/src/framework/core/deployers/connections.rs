use crate::framework::core::execute::{DeploymentContext, DeploymentError, RunState};
use crate::framework::core::redirects::{build_connection_redirects, StageRedirects};

/// Recreates the source connections and seeds every stage's redirect map.
///
/// Connections the target workspace already owns are reused, so a repeated update does not
/// create duplicates.
pub async fn deploy(
    ctx: &DeploymentContext<'_>,
    state: &mut RunState<'_>,
) -> Result<(), DeploymentError> {
    ctx.notifier.step("Connections");

    let existing = ctx
        .store
        .get_workspace_connections(state.workspace_id())
        .await?;
    let connections = build_connection_redirects(
        ctx.store,
        &state.solution.config.source_connections,
        state.workspace_id(),
        state.plan(),
        &ctx.settings.secrets,
        &existing,
        ctx.notifier,
    )
    .await?;

    state.redirects = StageRedirects::new(
        &connections,
        &state.solution.config.source_workspace_id,
        state.workspace_id(),
    );
    Ok(())
}
