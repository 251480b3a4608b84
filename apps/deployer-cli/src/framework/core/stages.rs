use std::fmt;

/// One step of a deployment run.
///
/// Later stages substitute ids that earlier stages create: notebooks and pipelines reference
/// lakehouse ids, semantic models reference SQL endpoints, reports reference semantic models.
/// [`DeployStage::ORDER`] is the only order stages are ever run in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DeployStage {
    Connections,
    Lakehouses,
    Shortcuts,
    Notebooks,
    Pipelines,
    SemanticModels,
    Reports,
}

impl DeployStage {
    pub const ORDER: [DeployStage; 7] = [
        DeployStage::Connections,
        DeployStage::Lakehouses,
        DeployStage::Shortcuts,
        DeployStage::Notebooks,
        DeployStage::Pipelines,
        DeployStage::SemanticModels,
        DeployStage::Reports,
    ];

    /// Stages that must complete before this one may run
    pub fn depends_on(&self) -> &'static [DeployStage] {
        match self {
            DeployStage::Connections => &[],
            DeployStage::Lakehouses => &[],
            DeployStage::Shortcuts => &[DeployStage::Connections, DeployStage::Lakehouses],
            DeployStage::Notebooks => &[DeployStage::Connections, DeployStage::Lakehouses],
            DeployStage::Pipelines => &[DeployStage::Lakehouses, DeployStage::Notebooks],
            DeployStage::SemanticModels => &[DeployStage::Connections, DeployStage::Lakehouses],
            DeployStage::Reports => &[DeployStage::SemanticModels],
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DeployStage::Connections => "Connections",
            DeployStage::Lakehouses => "Lakehouses",
            DeployStage::Shortcuts => "Shortcuts",
            DeployStage::Notebooks => "Notebooks",
            DeployStage::Pipelines => "Pipelines",
            DeployStage::SemanticModels => "Semantic models",
            DeployStage::Reports => "Reports",
        }
    }
}

impl fmt::Display for DeployStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_respects_dependencies() {
        for (position, stage) in DeployStage::ORDER.iter().enumerate() {
            for dependency in stage.depends_on() {
                let dependency_position = DeployStage::ORDER
                    .iter()
                    .position(|candidate| candidate == dependency)
                    .unwrap();
                assert!(
                    dependency_position < position,
                    "{stage} runs before {dependency}"
                );
            }
        }
    }

    #[test]
    fn test_every_stage_listed_once() {
        let mut sorted = DeployStage::ORDER.to_vec();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted.len(), DeployStage::ORDER.len());
    }
}
