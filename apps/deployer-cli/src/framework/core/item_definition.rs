//! Serialized item bodies.
//!
//! An [`ItemDefinition`] is the set of named payloads that make up one workspace item
//! (a notebook's `notebook-content.py`, a report's `definition.pbir` and `report.json`,
//! and so on). Payloads travel base64-encoded, exactly as the platform exchanges them.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DefinitionError {
    #[error("Definition already contains a part at path '{0}'")]
    DuplicatePart(String),

    #[error("Part '{path}' is not valid base64")]
    InvalidBase64 {
        path: String,
        #[source]
        source: base64::DecodeError,
    },

    #[error("Part '{path}' is not valid UTF-8 text")]
    InvalidText {
        path: String,
        #[source]
        source: std::string::FromUtf8Error,
    },

    #[error("Part '{path}' does not hold valid JSON")]
    InvalidJson {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum PayloadType {
    #[default]
    InlineBase64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefinitionPart {
    pub path: String,
    pub payload: String,
    #[serde(default)]
    pub payload_type: PayloadType,
}

impl DefinitionPart {
    pub fn from_bytes(path: impl Into<String>, content: &[u8]) -> Self {
        Self {
            path: path.into(),
            payload: STANDARD.encode(content),
            payload_type: PayloadType::InlineBase64,
        }
    }

    pub fn from_text(path: impl Into<String>, content: &str) -> Self {
        Self::from_bytes(path, content.as_bytes())
    }

    pub fn bytes(&self) -> Result<Vec<u8>, DefinitionError> {
        STANDARD
            .decode(&self.payload)
            .map_err(|source| DefinitionError::InvalidBase64 {
                path: self.path.clone(),
                source,
            })
    }

    pub fn text(&self) -> Result<String, DefinitionError> {
        String::from_utf8(self.bytes()?).map_err(|source| DefinitionError::InvalidText {
            path: self.path.clone(),
            source,
        })
    }
}

/// Ordered parts of one item, at most one part per path.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemDefinition {
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<String>,
    parts: Vec<DefinitionPart>,
}

impl ItemDefinition {
    pub fn new(parts: Vec<DefinitionPart>) -> Result<Self, DefinitionError> {
        let mut definition = Self::default();
        for part in parts {
            definition.push_part(part)?;
        }
        Ok(definition)
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    pub fn format(&self) -> Option<&str> {
        self.format.as_deref()
    }

    pub fn parts(&self) -> &[DefinitionPart] {
        &self.parts
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    pub fn part(&self, path: &str) -> Option<&DefinitionPart> {
        self.parts.iter().find(|part| part.path == path)
    }

    /// Appends a part, rejecting a second part for an existing path.
    pub fn push_part(&mut self, part: DefinitionPart) -> Result<(), DefinitionError> {
        if self.part(&part.path).is_some() {
            return Err(DefinitionError::DuplicatePart(part.path));
        }
        self.parts.push(part);
        Ok(())
    }

    /// Returns a copy with the part at `part.path` replaced, or appended when absent.
    pub fn with_part(&self, part: DefinitionPart) -> Self {
        let mut parts = self.parts.clone();
        match parts.iter_mut().find(|existing| existing.path == part.path) {
            Some(existing) => *existing = part,
            None => parts.push(part),
        }
        Self {
            format: self.format.clone(),
            parts,
        }
    }

    /// Returns a copy without the part at `path`.
    pub fn without_part(&self, path: &str) -> Self {
        Self {
            format: self.format.clone(),
            parts: self
                .parts
                .iter()
                .filter(|part| part.path != path)
                .cloned()
                .collect(),
        }
    }

    pub fn part_text(&self, path: &str) -> Result<Option<String>, DefinitionError> {
        self.part(path).map(DefinitionPart::text).transpose()
    }
}

impl<'de> Deserialize<'de> for ItemDefinition {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Raw {
            #[serde(default)]
            format: Option<String>,
            #[serde(default)]
            parts: Vec<DefinitionPart>,
        }

        let raw = Raw::deserialize(deserializer)?;
        let definition = ItemDefinition::new(raw.parts).map_err(serde::de::Error::custom)?;
        Ok(match raw.format {
            Some(format) => definition.with_format(format),
            None => definition,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_round_trips_through_base64() {
        let part = DefinitionPart::from_text("notebook-content.py", "print('hello')");
        assert_eq!(part.payload_type, PayloadType::InlineBase64);
        assert_eq!(part.text().unwrap(), "print('hello')");
    }

    #[test]
    fn test_duplicate_paths_are_rejected() {
        let result = ItemDefinition::new(vec![
            DefinitionPart::from_text("report.json", "{}"),
            DefinitionPart::from_text("report.json", "[]"),
        ]);

        assert!(matches!(result, Err(DefinitionError::DuplicatePart(path)) if path == "report.json"));
    }

    #[test]
    fn test_with_part_replaces_in_place() {
        let definition = ItemDefinition::new(vec![
            DefinitionPart::from_text("definition.pbir", "old"),
            DefinitionPart::from_text("report.json", "{}"),
        ])
        .unwrap();

        let updated = definition.with_part(DefinitionPart::from_text("definition.pbir", "new"));

        assert_eq!(updated.parts().len(), 2);
        assert_eq!(updated.parts()[0].path, "definition.pbir");
        assert_eq!(updated.part_text("definition.pbir").unwrap().unwrap(), "new");
        // the source definition is left untouched
        assert_eq!(definition.part_text("definition.pbir").unwrap().unwrap(), "old");
    }

    #[test]
    fn test_invalid_payload_is_reported_with_path() {
        let part = DefinitionPart {
            path: "model.bim".to_string(),
            payload: "***".to_string(),
            payload_type: PayloadType::InlineBase64,
        };

        match part.text() {
            Err(DefinitionError::InvalidBase64 { path, .. }) => assert_eq!(path, "model.bim"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_deserialize_enforces_unique_paths() {
        let json = r#"{"parts":[
            {"path":"a","payload":"YQ==","payloadType":"InlineBase64"},
            {"path":"a","payload":"Yg==","payloadType":"InlineBase64"}
        ]}"#;

        assert!(serde_json::from_str::<ItemDefinition>(json).is_err());
    }
}
