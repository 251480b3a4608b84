//! # CLI Commands
//! A module for all the commands that can be run from the CLI

use clap::{ArgGroup, Args, Subcommand};

#[derive(Subcommand)]
pub enum Commands {
    /// Recreates a workspace from a solution. An existing workspace of the same name is deleted first.
    Deploy {
        #[command(flatten)]
        source: SourceArgs,

        #[command(flatten)]
        target: TargetArgs,
    },
    /// Reconciles existing workspaces with a solution, deleting items the solution no longer has
    Update {
        #[command(flatten)]
        source: SourceArgs,

        #[command(flatten)]
        target: TargetArgs,

        /// Update every tenant workspace whose description is the solution name
        #[arg(long, conflicts_with_all = ["target", "customer", "all_customers"])]
        all_tenants: bool,

        /// Only create and update reports, bound to the semantic models already in the target
        #[arg(long)]
        reports_only: bool,
    },
    /// Exports a workspace to a local folder or a git branch
    Export {
        /// Workspace to export
        #[arg(long)]
        workspace: String,

        /// Export folder name, or branch name with --git
        #[arg(long)]
        name: String,

        /// Free text stored with the export
        #[arg(long)]
        comment: Option<String>,

        /// Commit the export to a branch of this git project instead of a local folder
        #[arg(long, value_name = "PROJECT")]
        git: Option<String>,
    },
    /// Inspects and manages exports
    Exports(ExportsArgs),
    /// Lists the built-in customer deployment plans
    Customers,
}

#[derive(Debug, Args)]
#[command(group(
    ArgGroup::new("solution_source")
        .required(true)
        .args(["from_workspace", "from_export", "from_git"])
))]
pub struct SourceArgs {
    /// Snapshot a live workspace and deploy that
    #[arg(long, value_name = "WORKSPACE")]
    pub from_workspace: Option<String>,

    /// Deploy a local export
    #[arg(long, value_name = "EXPORT")]
    pub from_export: Option<String>,

    /// Deploy an export committed to a git project; needs --branch
    #[arg(long, value_name = "PROJECT", requires = "branch")]
    pub from_git: Option<String>,

    /// Branch of the git project holding the export
    #[arg(long, requires = "from_git", conflicts_with_all = ["from_export", "from_workspace"])]
    pub branch: Option<String>,
}

#[derive(Debug, Args)]
pub struct TargetArgs {
    /// Target workspace, deployed with an ad hoc staged plan
    #[arg(long, conflicts_with_all = ["customer", "all_customers"])]
    pub target: Option<String>,

    /// Deploy to the tenant workspace of one catalog customer, with that customer's plan
    #[arg(long, value_name = "CUSTOMER_ID", conflicts_with = "all_customers")]
    pub customer: Option<String>,

    /// Deploy to the tenant workspaces of every catalog customer
    #[arg(long)]
    pub all_customers: bool,
}

#[derive(Debug, Args)]
#[command(arg_required_else_help = true)]
pub struct ExportsArgs {
    #[command(subcommand)]
    pub command: ExportsCommands,
}

#[derive(Debug, Subcommand)]
pub enum ExportsCommands {
    /// Lists local exports with their solution and creation time
    List,
    /// Shows the deploy configuration of a local export
    Show { name: String },
    /// Deletes a local export
    Delete { name: String },
    /// Lists the export branches of a git project
    Branches { project: String },
    /// Suggests a branch name for the next export of a git project
    SuggestName { project: String },
}
