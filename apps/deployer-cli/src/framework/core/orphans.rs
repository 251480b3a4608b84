//! Removal of target items that no longer exist in the solution.

use std::collections::HashSet;

use tracing::{info, warn};

use crate::framework::progress::ProgressNotifier;
use crate::infrastructure::fabric::models::{Item, ItemType};
use crate::infrastructure::fabric::WorkspaceItemStore;

/// Outcome of an orphan cleanup
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrphanReport {
    /// Qualified names of deleted items
    pub deleted: Vec<String>,
    /// Qualified name and error of every failed deletion
    pub failed: Vec<(String, String)>,
}

/// Target items whose `{displayName}.{type}` is not in `source_names`.
///
/// SQL endpoints are never orphans, and neither is a semantic model named like a lakehouse of
/// the target: that is the lakehouse's own default model.
pub fn find_orphans(source_names: &HashSet<String>, inventory: &[Item]) -> Vec<Item> {
    let lakehouses: HashSet<&str> = inventory
        .iter()
        .filter(|item| item.item_type == ItemType::Lakehouse)
        .map(|item| item.display_name.as_str())
        .collect();

    inventory
        .iter()
        .filter(|item| item.item_type != ItemType::SqlEndpoint)
        .filter(|item| {
            !(item.item_type == ItemType::SemanticModel
                && lakehouses.contains(item.display_name.as_str()))
        })
        .filter(|item| !source_names.contains(&item.qualified_name()))
        .cloned()
        .collect()
}

/// Deletes every orphan independently; a failed deletion is reported and skipped.
pub async fn delete_orphans(
    store: &dyn WorkspaceItemStore,
    workspace_id: &str,
    orphans: &[Item],
    notifier: &ProgressNotifier,
) -> OrphanReport {
    let mut report = OrphanReport::default();

    for orphan in orphans {
        let name = orphan.qualified_name();
        match store.delete_item(workspace_id, orphan).await {
            Ok(()) => {
                notifier.substep(format!("Deleted {name}"));
                report.deleted.push(name);
            }
            Err(e) => {
                warn!("Could not delete {}: {}", name, e);
                notifier.substep(format!("Could not delete {name}"));
                report.failed.push((name, e.to_string()));
            }
        }
    }

    info!(
        "Orphan cleanup: {} deleted, {} failed",
        report.deleted.len(),
        report.failed.len()
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::MockItemStore;

    fn item(id: &str, name: &str, item_type: ItemType) -> Item {
        Item {
            id: id.to_string(),
            display_name: name.to_string(),
            item_type,
            description: None,
        }
    }

    #[test]
    fn test_default_models_and_endpoints_are_kept() {
        let inventory = vec![
            item("1", "sales", ItemType::Lakehouse),
            item("2", "sales", ItemType::SemanticModel),
            item("3", "sales", ItemType::SqlEndpoint),
            item("4", "Old Report", ItemType::Report),
            item("5", "Load", ItemType::Notebook),
        ];
        let source: HashSet<String> =
            ["sales.Lakehouse".to_string(), "Load.Notebook".to_string()].into();

        let orphans = find_orphans(&source, &inventory);

        assert_eq!(orphans, vec![item("4", "Old Report", ItemType::Report)]);
    }

    #[test]
    fn test_same_name_other_type_is_orphan() {
        let inventory = vec![item("1", "Sales", ItemType::Report)];
        let source: HashSet<String> = ["Sales.SemanticModel".to_string()].into();

        assert_eq!(find_orphans(&source, &inventory).len(), 1);
    }

    #[tokio::test]
    async fn test_failed_deletion_does_not_stop_the_batch() {
        let store = MockItemStore::new();
        let first = store.add_item("ws", "First", ItemType::Notebook);
        let second = store.add_item("ws", "Second", ItemType::Report);
        store.fail_deletion_of(&first.id);

        let report = delete_orphans(
            &store,
            "ws",
            &[first, second],
            &ProgressNotifier::disabled(),
        )
        .await;

        assert_eq!(report.deleted, vec!["Second.Report".to_string()]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "First.Notebook");
        assert_eq!(store.items("ws").len(), 1);
    }
}
