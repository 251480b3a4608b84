//! Turns deployment requests into queued jobs.
//!
//! Submitting never talks to a remote platform; all remote work happens inside the jobs, on
//! the worker. Requests that target every customer fan out into one job per customer. Updating
//! every tenant needs the list of workspaces first, so it is queued as a discovery job that
//! queues the per-tenant updates itself.

use std::fmt;
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use thiserror::Error;
use tracing::{info, warn};

use super::core::deployment_plan::{CustomerCatalog, DeploymentPlan};
use super::core::execute::{self, DeploymentContext, EngineSettings, UpdateMode};
use super::core::export::export_workspace;
use super::core::sources::SolutionSource;
use super::jobs::{Job, JobQueue, JobTicket};
use super::progress::ProgressNotifier;
use crate::infrastructure::exports::ExportSink;
use crate::infrastructure::fabric::WorkspaceItemStore;
use crate::infrastructure::powerbi::SemanticModelGateway;

/// Workspace names containing this are solution workspaces, never tenants
const SOLUTION_WORKSPACE_MARKER: &str = "Solution";

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DispatchError {
    #[error("Unknown customer '{0}'")]
    UnknownCustomer(String),

    #[error("A target workspace name is required without a customer")]
    MissingTarget,
}

/// Which workspaces a deploy or update goes to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetSelection {
    /// A named workspace deployed with an ad hoc staged plan
    Workspace(String),
    /// The tenant workspace of one catalog customer
    Customer(String),
    AllCustomers,
}

#[derive(Clone)]
pub enum DeploymentRequest {
    Deploy {
        source: SolutionSource,
        target: TargetSelection,
    },
    Update {
        source: SolutionSource,
        target: TargetSelection,
        mode: UpdateMode,
    },
    /// Updates every tenant workspace whose description is the source's solution name
    UpdateAllTenants {
        source: SolutionSource,
        mode: UpdateMode,
    },
    Export {
        workspace: String,
        name: String,
        comment: Option<String>,
        sink: Arc<dyn ExportSink>,
    },
}

impl fmt::Debug for DeploymentRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeploymentRequest::Deploy { source, target } => f
                .debug_struct("Deploy")
                .field("source", source)
                .field("target", target)
                .finish(),
            DeploymentRequest::Update {
                source,
                target,
                mode,
            } => f
                .debug_struct("Update")
                .field("source", source)
                .field("target", target)
                .field("mode", mode)
                .finish(),
            DeploymentRequest::UpdateAllTenants { source, mode } => f
                .debug_struct("UpdateAllTenants")
                .field("source", source)
                .field("mode", mode)
                .finish(),
            DeploymentRequest::Export {
                workspace,
                name,
                comment,
                sink,
            } => f
                .debug_struct("Export")
                .field("workspace", workspace)
                .field("name", name)
                .field("comment", comment)
                .field("sink", &sink.describe())
                .finish(),
        }
    }
}

/// Everything a job needs, shared between all jobs of a process
pub struct DeploymentServices {
    pub store: Arc<dyn WorkspaceItemStore>,
    pub models: Arc<dyn SemanticModelGateway>,
    pub notifier: ProgressNotifier,
    pub settings: EngineSettings,
}

impl DeploymentServices {
    pub fn context(&self) -> DeploymentContext<'_> {
        DeploymentContext {
            store: self.store.as_ref(),
            models: self.models.as_ref(),
            notifier: &self.notifier,
            settings: &self.settings,
        }
    }
}

#[derive(Clone)]
pub struct Dispatcher {
    queue: Arc<JobQueue>,
    services: Arc<DeploymentServices>,
}

impl Dispatcher {
    pub fn new(queue: Arc<JobQueue>, services: Arc<DeploymentServices>) -> Self {
        Self { queue, services }
    }

    pub fn queue(&self) -> &Arc<JobQueue> {
        &self.queue
    }

    /// Queues the jobs for `request` and returns their tickets.
    pub fn submit(&self, request: DeploymentRequest) -> Result<Vec<JobTicket>, DispatchError> {
        let tickets = match request {
            DeploymentRequest::Deploy { source, target } => resolve_targets(&target)?
                .into_iter()
                .map(|(plan, target_name)| self.enqueue_deploy(source.clone(), plan, target_name))
                .collect(),
            DeploymentRequest::Update {
                source,
                target,
                mode,
            } => resolve_targets(&target)?
                .into_iter()
                .map(|(plan, target_name)| {
                    self.enqueue_update(source.clone(), plan, target_name, mode)
                })
                .collect(),
            DeploymentRequest::UpdateAllTenants { source, mode } => {
                vec![self.enqueue_tenant_discovery(source, mode)]
            }
            DeploymentRequest::Export {
                workspace,
                name,
                comment,
                sink,
            } => vec![self.enqueue_export(workspace, name, comment, sink)],
        };
        Ok(tickets)
    }

    fn enqueue_deploy(
        &self,
        source: SolutionSource,
        plan: DeploymentPlan,
        target_name: String,
    ) -> JobTicket {
        let services = self.services.clone();
        let name = format!("Deploy {} to {}", source.describe(), target_name);
        self.queue.enqueue(Job::new(name, async move {
            let ctx = services.context();
            let solution = source.load(ctx.store, plan, ctx.notifier).await?;
            execute::deploy(&ctx, &solution, &target_name)
                .await
                .with_context(|| format!("Failed to deploy to {target_name}"))?;
            Ok(())
        }))
    }

    fn enqueue_update(
        &self,
        source: SolutionSource,
        plan: DeploymentPlan,
        target_name: String,
        mode: UpdateMode,
    ) -> JobTicket {
        let services = self.services.clone();
        let name = format!("Update {} from {}", target_name, source.describe());
        self.queue.enqueue(Job::new(name, async move {
            let ctx = services.context();
            let solution = source.load(ctx.store, plan, ctx.notifier).await?;
            execute::update(&ctx, &solution, &target_name, mode)
                .await
                .with_context(|| format!("Failed to update {target_name}"))?;
            Ok(())
        }))
    }

    fn enqueue_tenant_discovery(&self, source: SolutionSource, mode: UpdateMode) -> JobTicket {
        let dispatcher = self.clone();
        let name = format!("Find tenants of {}", source.describe());
        self.queue.enqueue(Job::new(name, async move {
            let store = dispatcher.services.store.clone();
            let solution_name = source.solution_name(store.as_ref()).await?;
            let workspaces = store
                .list_workspaces()
                .await
                .context("Failed to list workspaces")?;

            let tenants = workspaces
                .iter()
                .filter(|workspace| workspace.description.as_deref() == Some(solution_name.as_str()))
                .filter(|workspace| !workspace.display_name.contains(SOLUTION_WORKSPACE_MARKER));

            let mut queued = 0;
            for workspace in tenants {
                match CustomerCatalog::find_by_workspace_name(&workspace.display_name) {
                    Some(plan) => {
                        dispatcher.enqueue_update(
                            source.clone(),
                            plan,
                            workspace.display_name.clone(),
                            mode,
                        );
                        queued += 1;
                    }
                    None => warn!(
                        "Workspace {} carries solution {} but matches no customer",
                        workspace.display_name, solution_name
                    ),
                }
            }
            info!("Queued updates for {} tenants of {}", queued, solution_name);
            Ok(())
        }))
    }

    fn enqueue_export(
        &self,
        workspace: String,
        name: String,
        comment: Option<String>,
        sink: Arc<dyn ExportSink>,
    ) -> JobTicket {
        let services = self.services.clone();
        let job_name = format!("Export {} as {}", workspace, name);
        self.queue.enqueue(Job::new(job_name, async move {
            export_workspace(
                services.store.as_ref(),
                &workspace,
                &name,
                comment,
                Utc::now(),
                sink.as_ref(),
                &services.notifier,
            )
            .await
            .with_context(|| format!("Failed to export {workspace}"))?;
            Ok(())
        }))
    }
}

/// Pairs each selected target with the plan it is deployed with.
fn resolve_targets(
    target: &TargetSelection,
) -> Result<Vec<(DeploymentPlan, String)>, DispatchError> {
    match target {
        TargetSelection::Workspace(name) if name.trim().is_empty() => {
            Err(DispatchError::MissingTarget)
        }
        TargetSelection::Workspace(name) => Ok(vec![(DeploymentPlan::staged(), name.clone())]),
        TargetSelection::Customer(id) => {
            let plan = CustomerCatalog::get(id)
                .ok_or_else(|| DispatchError::UnknownCustomer(id.clone()))?;
            let target_name = plan.target_workspace_name();
            Ok(vec![(plan, target_name)])
        }
        TargetSelection::AllCustomers => Ok(CustomerCatalog::all()
            .into_iter()
            .map(|plan| {
                let target_name = plan.target_workspace_name();
                (plan, target_name)
            })
            .collect()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framework::core::solution_plan::DeployConfig;
    use crate::framework::jobs::run_worker;
    use crate::infrastructure::exports::{ExportBundle, ExportFile, ExportSource, ExportStoreError};
    use crate::test_utils::{MockGateway, MockItemStore};
    use tokio_util::sync::CancellationToken;

    struct StaticExport(ExportBundle);

    impl ExportSource for StaticExport {
        fn read_bundle(&self) -> Result<ExportBundle, ExportStoreError> {
            Ok(self.0.clone())
        }

        fn describe(&self) -> String {
            "export product-sales".to_string()
        }
    }

    struct DiscardingSink;

    impl ExportSink for DiscardingSink {
        fn write_bundle(&self, _bundle: &ExportBundle) -> Result<(), ExportStoreError> {
            Ok(())
        }

        fn describe(&self) -> String {
            "nowhere".to_string()
        }
    }

    #[test]
    fn test_requests_debug_with_sink_location() {
        let request = DeploymentRequest::Export {
            workspace: "Product Sales Dev".to_string(),
            name: "v1".to_string(),
            comment: None,
            sink: Arc::new(DiscardingSink),
        };

        let rendered = format!("{request:?}");
        assert!(rendered.starts_with("Export"));
        assert!(rendered.contains("sink: \"nowhere\""));
    }

    fn export_source() -> SolutionSource {
        let config = DeployConfig {
            source_workspace_id: "src-ws".to_string(),
            solution_name: "Product Sales".to_string(),
            source_workspace_description: Some("Product Sales".to_string()),
            ..DeployConfig::default()
        };
        SolutionSource::Export(Arc::new(StaticExport(ExportBundle::new(vec![ExportFile::new(
            "deploy.config.json",
            serde_json::to_vec(&config).unwrap(),
        )]))))
    }

    fn dispatcher(store: Arc<MockItemStore>) -> Dispatcher {
        let services = DeploymentServices {
            store,
            models: Arc::new(MockGateway::new()),
            notifier: ProgressNotifier::disabled(),
            settings: EngineSettings::default(),
        };
        Dispatcher::new(Arc::new(JobQueue::new()), Arc::new(services))
    }

    #[test]
    fn test_targets_resolve_to_plans() {
        let all = resolve_targets(&TargetSelection::AllCustomers).unwrap();
        assert_eq!(all.len(), 6);
        assert!(all.iter().all(|(plan, name)| name == &plan.target_workspace_name()));

        let (plan, name) = resolve_targets(&TargetSelection::Customer("wingtip".to_string()))
            .unwrap()
            .remove(0);
        assert_eq!(plan.name, "Wingtip Toys");
        assert_eq!(name, "Tenant - Wingtip Toys");

        assert!(matches!(
            resolve_targets(&TargetSelection::Customer("Initech".to_string())),
            Err(DispatchError::UnknownCustomer(_))
        ));
        assert!(matches!(
            resolve_targets(&TargetSelection::Workspace(" ".to_string())),
            Err(DispatchError::MissingTarget)
        ));
    }

    #[tokio::test]
    async fn test_all_customers_fans_out_without_remote_calls() {
        let store = Arc::new(MockItemStore::new());
        let dispatcher = dispatcher(store.clone());

        let tickets = dispatcher
            .submit(DeploymentRequest::Deploy {
                source: export_source(),
                target: TargetSelection::AllCustomers,
            })
            .unwrap();

        assert_eq!(tickets.len(), 6);
        assert_eq!(dispatcher.queue().len(), 6);
        assert!(store.workspaces().is_empty());
    }

    #[tokio::test]
    async fn test_failed_job_does_not_block_the_next() {
        let store = Arc::new(MockItemStore::new());
        store.add_workspace("Existing", None);
        let dispatcher = dispatcher(store.clone());
        let token = CancellationToken::new();
        let worker = tokio::spawn(run_worker(dispatcher.queue().clone(), token.clone()));

        let failing = dispatcher
            .submit(DeploymentRequest::Update {
                source: export_source(),
                target: TargetSelection::Workspace("Missing".to_string()),
                mode: UpdateMode::FullUpdate,
            })
            .unwrap();
        let succeeding = dispatcher
            .submit(DeploymentRequest::Update {
                source: export_source(),
                target: TargetSelection::Workspace("Existing".to_string()),
                mode: UpdateMode::FullUpdate,
            })
            .unwrap();

        dispatcher.queue().wait_idle().await;
        token.cancel();
        worker.await.unwrap();

        let reports = dispatcher.queue().reports();
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].id, failing[0].id());
        assert!(!reports[0].outcome.is_success());
        assert_eq!(reports[1].id, succeeding[0].id());
        assert!(reports[1].outcome.is_success());
    }

    #[tokio::test]
    async fn test_all_tenants_queues_one_update_per_customer_workspace() {
        let store = Arc::new(MockItemStore::new());
        store.add_workspace("Tenant - Contoso", Some("Product Sales"));
        store.add_workspace("Tenant - Fabrikam", Some("Product Sales"));
        store.add_workspace("Tenant - Initech", Some("Product Sales"));
        store.add_workspace("Product Sales Solution", Some("Product Sales"));
        store.add_workspace("Tenant - Wingtip Toys", Some("Other Solution"));
        let dispatcher = dispatcher(store.clone());
        let token = CancellationToken::new();
        let worker = tokio::spawn(run_worker(dispatcher.queue().clone(), token.clone()));

        dispatcher
            .submit(DeploymentRequest::UpdateAllTenants {
                source: export_source(),
                mode: UpdateMode::ReportsOnly,
            })
            .unwrap();
        dispatcher.queue().wait_idle().await;
        token.cancel();
        worker.await.unwrap();

        let names: Vec<String> = dispatcher
            .queue()
            .reports()
            .into_iter()
            .map(|report| report.name)
            .collect();
        assert_eq!(
            names,
            vec![
                "Find tenants of export product-sales".to_string(),
                "Update Tenant - Contoso from export product-sales".to_string(),
                "Update Tenant - Fabrikam from export product-sales".to_string(),
            ]
        );
    }
}
