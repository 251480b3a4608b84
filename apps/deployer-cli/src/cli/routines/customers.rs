use crate::cli::display::{Message, MessageType};
use crate::cli::routines::RoutineSuccess;
use crate::framework::core::deployment_plan::{CustomerCatalog, DeploymentPlan};

/// `Contoso -> Tenant - Contoso (4 parameters)`
fn describe(plan: &DeploymentPlan) -> String {
    format!(
        "{} -> {} ({} parameters)",
        plan.name,
        plan.target_workspace_name(),
        plan.parameters.len()
    )
}

pub fn list_customers() -> RoutineSuccess {
    let plans = CustomerCatalog::all();
    for plan in &plans {
        show_message!(
            MessageType::Info,
            Message::new(plan.id.clone(), describe(plan))
        );
    }
    RoutineSuccess::info(Message::new(
        "Customers".to_string(),
        format!("{} built-in deployment plans", plans.len()),
    ))
}
