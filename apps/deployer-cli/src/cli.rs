#[macro_use]
pub(crate) mod display;

mod commands;
pub mod logger;
pub mod routines;
pub mod settings;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use commands::{Commands, ExportsCommands, SourceArgs, TargetArgs};
use tracing::info;

use crate::cli::display::Message;
use crate::cli::routines::deploy::{run_requests, solution_source, target_selection};
use crate::cli::routines::{customers, exports, RoutineFailure, RoutineSuccess};
use crate::cli::settings::Settings;
use crate::framework::core::execute::UpdateMode;
use crate::framework::dispatcher::{DeploymentRequest, TargetSelection};
use crate::infrastructure::exports::git::GitExportStore;
use crate::infrastructure::exports::local::LocalExportStore;
use crate::infrastructure::exports::ExportSink;

#[derive(Parser)]
#[command(author, version, about, long_about = None, arg_required_else_help(true), next_display_order = None)]
pub struct Cli {
    /// Read settings from this file instead of ~/.deployer/config.toml
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

fn require_target(target: &TargetArgs) -> Result<TargetSelection, RoutineFailure> {
    target_selection(target).ok_or_else(|| {
        RoutineFailure::error(Message::new(
            "Target".to_string(),
            "Pass --target, --customer or --all-customers".to_string(),
        ))
    })
}

fn solution_request(
    settings: &Settings,
    source: &SourceArgs,
    target: &TargetArgs,
    update: Option<(bool, bool)>,
) -> Result<DeploymentRequest, RoutineFailure> {
    let source = solution_source(source, settings)?;
    let Some((all_tenants, reports_only)) = update else {
        return Ok(DeploymentRequest::Deploy {
            source,
            target: require_target(target)?,
        });
    };

    let mode = if reports_only {
        UpdateMode::ReportsOnly
    } else {
        UpdateMode::FullUpdate
    };
    if all_tenants {
        return Ok(DeploymentRequest::UpdateAllTenants { source, mode });
    }
    Ok(DeploymentRequest::Update {
        source,
        target: require_target(target)?,
        mode,
    })
}

pub async fn top_command_handler(
    settings: Settings,
    commands: &Commands,
) -> Result<RoutineSuccess, RoutineFailure> {
    match commands {
        Commands::Deploy { source, target } => {
            info!("Running deploy command");
            let request = solution_request(&settings, source, target, None)?;
            run_requests(&settings, vec![request]).await
        }
        Commands::Update {
            source,
            target,
            all_tenants,
            reports_only,
        } => {
            info!(
                "Running update command, all_tenants: {}, reports_only: {}",
                all_tenants, reports_only
            );
            let request = solution_request(
                &settings,
                source,
                target,
                Some((*all_tenants, *reports_only)),
            )?;
            run_requests(&settings, vec![request]).await
        }
        Commands::Export {
            workspace,
            name,
            comment,
            git,
        } => {
            info!("Running export command for workspace {}", workspace);
            let sink: Arc<dyn ExportSink> = match git {
                Some(project) => {
                    let export = GitExportStore::new(settings.git.clone()).export(project, name);
                    match comment {
                        Some(comment) => Arc::new(export.with_message(comment.clone())),
                        None => Arc::new(export),
                    }
                }
                None => Arc::new(LocalExportStore::new(&settings.exports.root).export(name)),
            };
            let request = DeploymentRequest::Export {
                workspace: workspace.clone(),
                name: name.clone(),
                comment: comment.clone(),
                sink,
            };
            run_requests(&settings, vec![request]).await
        }
        Commands::Exports(args) => {
            let local = LocalExportStore::new(&settings.exports.root);
            let git = GitExportStore::new(settings.git.clone());
            match &args.command {
                ExportsCommands::List => exports::list_exports(&local),
                ExportsCommands::Show { name } => exports::show_export(&local, name),
                ExportsCommands::Delete { name } => exports::delete_export(&local, name),
                ExportsCommands::Branches { project } => exports::list_branches(&git, project),
                ExportsCommands::SuggestName { project } => exports::suggest_name(&git, project),
            }
        }
        Commands::Customers => Ok(customers::list_customers()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("deployer").chain(args.iter().copied()))
    }

    #[test]
    fn test_source_is_required() {
        assert!(parse(&["deploy", "--target", "Sales Staging"]).is_err());
    }

    #[test]
    fn test_branch_requires_git_source() {
        assert!(parse(&["deploy", "--from-export", "v1", "--branch", "main", "--target", "x"]).is_err());
        assert!(parse(&["update", "--from-workspace", "Dev", "--branch", "main", "--target", "x"]).is_err());
        assert!(parse(&["deploy", "--from-git", "sales", "--target", "x"]).is_err());
        assert!(parse(&["deploy", "--from-git", "sales", "--branch", "main", "--target", "x"]).is_ok());
    }

    #[test]
    fn test_all_tenants_conflicts_with_targets() {
        assert!(parse(&["update", "--from-export", "v1", "--all-tenants", "--customer", "contoso"]).is_err());
        assert!(parse(&["update", "--from-export", "v1", "--all-tenants"]).is_ok());
    }

    #[test]
    fn test_update_requests() {
        let settings = Settings::default();
        let cli = parse(&["update", "--from-workspace", "Dev", "--all-tenants", "--reports-only"]).unwrap();
        let Commands::Update {
            source,
            target,
            all_tenants,
            reports_only,
        } = &cli.command
        else {
            panic!("expected update");
        };

        let request =
            solution_request(&settings, source, target, Some((*all_tenants, *reports_only))).unwrap();
        assert!(matches!(
            request,
            DeploymentRequest::UpdateAllTenants {
                mode: UpdateMode::ReportsOnly,
                ..
            }
        ));

        let failure = solution_request(&settings, source, target, Some((false, false))).unwrap_err();
        assert_eq!(failure.message.action, "Target");
    }

    #[test]
    fn test_deploy_to_customer() {
        let settings = Settings::default();
        let cli = parse(&["deploy", "--from-export", "v1", "--customer", "contoso"]).unwrap();
        let Commands::Deploy { source, target } = &cli.command else {
            panic!("expected deploy");
        };

        let request = solution_request(&settings, source, target, None).unwrap();
        assert!(matches!(
            request,
            DeploymentRequest::Deploy {
                target: TargetSelection::Customer(ref id),
                ..
            } if id == "contoso"
        ));
    }
}
