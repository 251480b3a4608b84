//! Status markers for the job summary printed when a command ends.

pub const STATUS_SUCCESS: &str = "✓";

pub const STATUS_ERROR: &str = "✗";

/// `✓ Deploy export 'v1' to Sales Staging: succeeded`
pub fn format_success(item: &str, message: &str) -> String {
    format!("{} {}: {}", STATUS_SUCCESS, item, message)
}

/// `✗ Update Tenant - Contoso from export 'v1': Workspace not found`
pub fn format_error(item: &str, message: &str) -> String {
    format!("{} {}: {}", STATUS_ERROR, item, message)
}
