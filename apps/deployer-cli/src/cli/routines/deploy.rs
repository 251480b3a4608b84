//! Runs deployment requests on the background job queue.
//!
//! Every command that touches the platform goes through [`run_requests`]: the requests are
//! queued without blocking, the single worker executes them in order while progress is
//! rendered, and the command ends once every queued job, including jobs queued by other jobs,
//! has reported an outcome.

use std::io::Write;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::cli::commands::{SourceArgs, TargetArgs};
use crate::cli::display::progress::ProgressRenderer;
use crate::cli::display::status::{format_error, format_success};
use crate::cli::display::{self, Message, MessageType};
use crate::cli::routines::{RoutineFailure, RoutineSuccess};
use crate::cli::settings::Settings;
use crate::framework::core::execute::EngineSettings;
use crate::framework::core::sources::SolutionSource;
use crate::framework::dispatcher::{
    DeploymentRequest, DeploymentServices, Dispatcher, TargetSelection,
};
use crate::framework::jobs::{run_worker, JobOutcome, JobQueue, JobReport};
use crate::framework::progress::ProgressNotifier;
use crate::infrastructure::exports::git::GitExportStore;
use crate::infrastructure::exports::local::LocalExportStore;
use crate::infrastructure::fabric::rest_client::FabricRestClient;
use crate::infrastructure::fabric::WorkspaceItemStore;
use crate::infrastructure::powerbi::{PowerBiRestClient, SemanticModelGateway};

/// Where the solution comes from, as chosen on the command line.
pub fn solution_source(
    args: &SourceArgs,
    settings: &Settings,
) -> Result<SolutionSource, RoutineFailure> {
    match (&args.from_workspace, &args.from_export, &args.from_git, &args.branch) {
        (Some(workspace), _, _, _) => Ok(SolutionSource::Workspace(workspace.clone())),
        (None, Some(export), _, _) => Ok(SolutionSource::Export(Arc::new(
            LocalExportStore::new(&settings.exports.root).export(export),
        ))),
        (None, None, Some(project), Some(branch)) => Ok(SolutionSource::Export(Arc::new(
            GitExportStore::new(settings.git.clone()).export(project, branch),
        ))),
        _ => Err(RoutineFailure::error(Message::new(
            "Source".to_string(),
            "Pass --from-workspace, --from-export or --from-git with --branch".to_string(),
        ))),
    }
}

/// `None` when no target was given at all.
pub fn target_selection(args: &TargetArgs) -> Option<TargetSelection> {
    if args.all_customers {
        Some(TargetSelection::AllCustomers)
    } else if let Some(customer) = &args.customer {
        Some(TargetSelection::Customer(customer.clone()))
    } else {
        args.target.clone().map(TargetSelection::Workspace)
    }
}

/// Runs `requests` against the platform configured in `settings`.
pub async fn run_requests(
    settings: &Settings,
    requests: Vec<DeploymentRequest>,
) -> Result<RoutineSuccess, RoutineFailure> {
    let store: Arc<dyn WorkspaceItemStore> = Arc::new(FabricRestClient::new(
        settings.fabric.clone(),
        settings.power_bi.clone(),
    ));
    let models: Arc<dyn SemanticModelGateway> =
        Arc::new(PowerBiRestClient::new(settings.power_bi.clone()));

    run_with(
        store,
        models,
        settings.engine_settings(),
        requests,
        std::io::stdout(),
    )
    .await
}

async fn run_with<W>(
    store: Arc<dyn WorkspaceItemStore>,
    models: Arc<dyn SemanticModelGateway>,
    engine: EngineSettings,
    requests: Vec<DeploymentRequest>,
    output: W,
) -> Result<RoutineSuccess, RoutineFailure>
where
    W: Write + Send + 'static,
{
    let (notifier, rx) = ProgressNotifier::channel();
    let renderer = tokio::spawn(ProgressRenderer::new(output, display::no_ansi()).run(rx));

    let queue = Arc::new(JobQueue::new());
    let token = CancellationToken::new();
    let worker = tokio::spawn(run_worker(queue.clone(), token.clone()));

    let dispatcher = Dispatcher::new(
        queue.clone(),
        Arc::new(DeploymentServices {
            store,
            models,
            notifier,
            settings: engine,
        }),
    );

    let mut rejected = None;
    for request in requests {
        if let Err(e) = dispatcher.submit(request) {
            rejected = Some(e);
            break;
        }
    }

    queue.wait_idle().await;
    token.cancel();
    if let Err(e) = worker.await {
        error!("Job worker ended abnormally: {}", e);
    }
    // the last progress sender goes with the dispatcher, which ends the renderer
    drop(dispatcher);
    if let Err(e) = renderer.await {
        error!("Progress renderer ended abnormally: {}", e);
    }

    if let Some(e) = rejected {
        return Err(RoutineFailure::new(
            Message::new("Rejected".to_string(), e.to_string()),
            e,
        ));
    }

    summarize(&queue.reports())
}

fn summarize(reports: &[JobReport]) -> Result<RoutineSuccess, RoutineFailure> {
    let mut failed = 0;
    for report in reports {
        match &report.outcome {
            JobOutcome::Succeeded => show_message!(
                MessageType::Success,
                Message::new("Job".to_string(), format_success(&report.name, "succeeded"))
            ),
            JobOutcome::Failed(reason) | JobOutcome::Panicked(reason) => {
                failed += 1;
                show_message!(
                    MessageType::Error,
                    Message::new("Job".to_string(), format_error(&report.name, reason))
                );
            }
        }
    }
    info!("{} of {} jobs failed", failed, reports.len());

    if failed > 0 {
        return Err(RoutineFailure::error(Message::new(
            "Failed".to_string(),
            format!("{} of {} jobs failed", failed, reports.len()),
        )));
    }
    Ok(RoutineSuccess::success(Message::new(
        "Finished".to_string(),
        format!("{} jobs succeeded", reports.len()),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framework::core::execute::UpdateMode;
    use crate::framework::core::item_definition::{DefinitionPart, ItemDefinition};
    use crate::infrastructure::fabric::models::ItemType;
    use crate::test_utils::{MockGateway, MockItemStore};
    use crate::utilities::constants::NOTEBOOK_CONTENT_PART;

    fn source_args(export: &str) -> SourceArgs {
        SourceArgs {
            from_workspace: None,
            from_export: Some(export.to_string()),
            from_git: None,
            branch: None,
        }
    }

    #[test]
    fn test_target_selection_precedence() {
        let mut args = TargetArgs {
            target: Some("Sales Staging".to_string()),
            customer: None,
            all_customers: false,
        };
        assert_eq!(
            target_selection(&args),
            Some(TargetSelection::Workspace("Sales Staging".to_string()))
        );

        args.customer = Some("Contoso".to_string());
        assert_eq!(
            target_selection(&args),
            Some(TargetSelection::Customer("Contoso".to_string()))
        );

        args.all_customers = true;
        assert_eq!(target_selection(&args), Some(TargetSelection::AllCustomers));

        let none = TargetArgs {
            target: None,
            customer: None,
            all_customers: false,
        };
        assert_eq!(target_selection(&none), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_export_then_deploy_through_the_queue() {
        let store = Arc::new(MockItemStore::new());
        let source = store.add_workspace("Product Sales Dev", Some("Product Sales"));
        store.add_item(&source.id, "sales", ItemType::Lakehouse);
        let notebook = store.add_item(&source.id, "Load Sales", ItemType::Notebook);
        store.set_definition(
            &notebook.id,
            ItemDefinition::new(vec![DefinitionPart::from_text(
                NOTEBOOK_CONTENT_PART,
                "df = spark.read.table('sales')",
            )])
            .unwrap(),
        );

        let dir = tempfile::tempdir().unwrap();
        let settings = Settings {
            exports: crate::cli::settings::ExportsSettings {
                root: dir.path().to_path_buf(),
            },
            ..Settings::default()
        };
        let exports = LocalExportStore::new(&settings.exports.root);

        let requests = vec![
            DeploymentRequest::Export {
                workspace: "Product Sales Dev".to_string(),
                name: "v1".to_string(),
                comment: None,
                sink: Arc::new(exports.export("v1")),
            },
            DeploymentRequest::Deploy {
                source: solution_source(&source_args("v1"), &settings).unwrap(),
                target: TargetSelection::Workspace("Sales Staging".to_string()),
            },
        ];

        let result = run_with(
            store.clone(),
            Arc::new(MockGateway::new()),
            settings.engine_settings(),
            requests,
            Vec::new(),
        )
        .await;

        let success = result.unwrap();
        assert_eq!(success.message.details, "2 jobs succeeded");
        let target = store.workspace_by_name("Sales Staging").unwrap();
        assert_eq!(target.description.as_deref(), Some("Product Sales"));
        assert_eq!(store.items(&target.id).len(), 2);
    }

    #[tokio::test]
    async fn test_failed_job_fails_the_command() {
        let store = Arc::new(MockItemStore::new());
        let settings = Settings::default();
        let requests = vec![DeploymentRequest::Update {
            source: SolutionSource::Workspace("Missing Source".to_string()),
            target: TargetSelection::Workspace("Missing Target".to_string()),
            mode: UpdateMode::FullUpdate,
        }];

        let failure = run_with(
            store,
            Arc::new(MockGateway::new()),
            settings.engine_settings(),
            requests,
            Vec::new(),
        )
        .await
        .unwrap_err();

        assert_eq!(failure.message.details, "1 of 1 jobs failed");
    }

    #[tokio::test]
    async fn test_unknown_customer_is_rejected_before_running() {
        let failure = run_with(
            Arc::new(MockItemStore::new()),
            Arc::new(MockGateway::new()),
            EngineSettings::default(),
            vec![DeploymentRequest::Deploy {
                source: SolutionSource::Workspace("Product Sales Dev".to_string()),
                target: TargetSelection::Customer("Initech".to_string()),
            }],
            Vec::new(),
        )
        .await
        .unwrap_err();

        assert_eq!(failure.message.action, "Rejected");
    }
}
