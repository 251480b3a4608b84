//! Applying redirect maps to item definition parts.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::json;

use crate::framework::core::item_definition::{DefinitionError, DefinitionPart, ItemDefinition};
use crate::framework::core::redirects::{RedirectError, RedirectMap};
use crate::utilities::constants::{REPORT_DEFINITION_PART, REPORT_LAYOUT_PART};
use crate::utilities::json::{to_string_styled, JsonStyle};

/// Rewrites the part at `part_path` with `redirects`, leaving every other part untouched.
///
/// A definition without that part is returned unchanged.
pub fn apply(
    definition: &ItemDefinition,
    part_path: &str,
    redirects: &RedirectMap,
) -> Result<ItemDefinition, RedirectError> {
    match definition.part_text(part_path)? {
        Some(text) => {
            let rewritten = redirects.apply(&text)?;
            Ok(definition.with_part(DefinitionPart::from_text(part_path, &rewritten)))
        }
        None => Ok(definition.clone()),
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReportDefinitionFile {
    #[serde(default)]
    dataset_reference: Option<DatasetReference>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DatasetReference {
    #[serde(default)]
    by_path: Option<ByPath>,
}

#[derive(Debug, Default, Deserialize)]
struct ByPath {
    #[serde(default)]
    path: Option<String>,
}

/// Name of the semantic model a report references by relative path, if it does.
///
/// `../Sales Model.SemanticModel` yields `Sales Model`.
pub fn report_model_path_reference(
    definition: &ItemDefinition,
) -> Result<Option<String>, RedirectError> {
    let text = match definition.part_text(REPORT_DEFINITION_PART)? {
        Some(text) => text,
        None => return Ok(None),
    };
    let file: ReportDefinitionFile =
        serde_json::from_str(&text).map_err(|source| DefinitionError::InvalidJson {
            path: REPORT_DEFINITION_PART.to_string(),
            source,
        })?;

    Ok(file
        .dataset_reference
        .and_then(|reference| reference.by_path)
        .and_then(|by_path| by_path.path)
        .filter(|path| !path.is_empty())
        .map(|path| path.replace("../", "").replace(".SemanticModel", "")))
}

/// `definition.pbir` content binding a report to a published semantic model.
pub fn connected_report_definition(model_id: &str) -> String {
    let pbir = json!({
        "version": "1.0",
        "datasetReference": {
            "byPath": null,
            "byConnection": {
                "connectionString": null,
                "pbiServiceModelId": null,
                "pbiModelVirtualServerName": "sobe_wowvirtualserver",
                "pbiModelDatabaseName": model_id,
                "name": "EntityDataSource",
                "connectionType": "pbiServiceXmlaStyleLive"
            }
        }
    });
    // serializing a json! literal cannot fail
    to_string_styled(&pbir, JsonStyle::EXPORT).unwrap_or_default()
}

/// Points a report at its target semantic model.
///
/// Reports that reference their model by relative path get a fresh connection-based
/// `definition.pbir` pointing at the model id found in `target_models` (name to id). All other
/// reports have `definition.pbir` rewritten with `redirects`.
pub fn redirect_report(
    definition: &ItemDefinition,
    redirects: &RedirectMap,
    target_models: &BTreeMap<String, String>,
) -> Result<ItemDefinition, RedirectError> {
    match report_model_path_reference(definition)? {
        Some(model_name) => {
            let model_id = target_models
                .get(&model_name)
                .ok_or(RedirectError::ModelNotFound(model_name))?;
            Ok(definition.with_part(DefinitionPart::from_text(
                REPORT_DEFINITION_PART,
                &connected_report_definition(model_id),
            )))
        }
        None => apply(definition, REPORT_DEFINITION_PART, redirects),
    }
}

/// Prefixes the report title in `report.json` with the customer name.
pub fn customize_report_title(
    definition: &ItemDefinition,
    display_name: &str,
    customer_name: &str,
) -> Result<ItemDefinition, RedirectError> {
    let mut title = RedirectMap::new();
    title.insert(display_name, format!("{customer_name} {display_name}"));
    apply(definition, REPORT_LAYOUT_PART, &title)
}
