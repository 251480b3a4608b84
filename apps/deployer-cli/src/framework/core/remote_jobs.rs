//! Waiting on work the platform runs on its own schedule: notebook and pipeline runs, and SQL
//! endpoint provisioning.
//!
//! All waits are `tokio::time::sleep` loops with no upper bound other than the platform's own
//! terminal states.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::framework::progress::ProgressNotifier;
use crate::infrastructure::fabric::models::{Item, JobStatus, SqlEndpointInfo};
use crate::infrastructure::fabric::{ItemStoreError, WorkspaceItemStore};
use crate::utilities::constants::{
    DEFAULT_NOTEBOOK_POLL_INTERVAL, DEFAULT_PIPELINE_POLL_INTERVAL, SQL_ENDPOINT_READY_STATUS,
};
use crate::utilities::duration;

fn default_notebook_interval() -> Duration {
    duration::parse_default(DEFAULT_NOTEBOOK_POLL_INTERVAL)
}

fn default_pipeline_interval() -> Duration {
    duration::parse_default(DEFAULT_PIPELINE_POLL_INTERVAL)
}

/// How often remote runs are polled
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingSettings {
    #[serde(default = "default_notebook_interval", with = "duration")]
    pub notebook_interval: Duration,
    #[serde(default = "default_pipeline_interval", with = "duration")]
    pub pipeline_interval: Duration,
}

impl Default for PollingSettings {
    fn default() -> Self {
        Self {
            notebook_interval: default_notebook_interval(),
            pipeline_interval: default_pipeline_interval(),
        }
    }
}

/// How a remote run ended. None of these abort a deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteRunOutcome {
    Completed,
    Failed(String),
    /// Cancelled, deduped or a status the platform added later
    Stopped(JobStatus),
    /// The run could not be started or its status could not be read
    Unavailable(String),
}

/// Starts a job on `item` and waits for it to reach a terminal state.
///
/// The first status check happens one `interval` after the start, then once per interval while
/// the run is not started or in progress. Every check emits an in-progress heartbeat.
pub async fn run_and_wait(
    store: &dyn WorkspaceItemStore,
    workspace_id: &str,
    item: &Item,
    job_type: &str,
    interval: Duration,
    notifier: &ProgressNotifier,
) -> RemoteRunOutcome {
    notifier.operation_start(format!("Run {}", item.display_name));

    let job = match store.run_item_job(workspace_id, &item.id, job_type).await {
        Ok(job) => job,
        Err(e) => {
            error!("Could not start {} for {}: {}", job_type, item.display_name, e);
            notifier.exception(format!("Could not run {}: {}", item.display_name, e));
            return RemoteRunOutcome::Unavailable(e.to_string());
        }
    };

    let instance = loop {
        tokio::time::sleep(interval).await;
        match store.get_job_instance(workspace_id, &item.id, &job.id).await {
            Ok(instance) if instance.status.is_active() => notifier.operation_in_progress(),
            Ok(instance) => break instance,
            Err(e) => {
                error!("Lost track of {} run {}: {}", item.display_name, job.id, e);
                return RemoteRunOutcome::Unavailable(e.to_string());
            }
        }
    };

    match instance.status {
        JobStatus::Completed => {
            notifier.operation_complete(format!("{} completed", item.display_name));
            RemoteRunOutcome::Completed
        }
        JobStatus::Failed => {
            let reason = instance
                .failure_reason
                .unwrap_or_else(|| "no reason given".to_string());
            error!("{} run failed: {}", item.display_name, reason);
            notifier.exception(format!("{} failed: {}", item.display_name, reason));
            RemoteRunOutcome::Failed(reason)
        }
        other => {
            warn!("{} run ended as {:?}", item.display_name, other);
            notifier.operation_complete(format!("{} ended as {:?}", item.display_name, other));
            RemoteRunOutcome::Stopped(other)
        }
    }
}

/// Polls until the lakehouse's SQL endpoint is provisioned.
pub async fn wait_for_sql_endpoint(
    store: &dyn WorkspaceItemStore,
    workspace_id: &str,
    lakehouse: &Item,
    interval: Duration,
    notifier: &ProgressNotifier,
) -> Result<SqlEndpointInfo, ItemStoreError> {
    loop {
        match store
            .get_lakehouse_sql_endpoint(workspace_id, &lakehouse.id)
            .await?
        {
            Some(endpoint) if endpoint.provisioning_status == SQL_ENDPOINT_READY_STATUS => {
                info!(
                    "SQL endpoint {} of {} is ready",
                    endpoint.id, lakehouse.display_name
                );
                return Ok(endpoint);
            }
            _ => notifier.operation_in_progress(),
        }
        tokio::time::sleep(interval).await;
    }
}
