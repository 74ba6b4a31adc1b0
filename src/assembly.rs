use serde::Serialize;
use std::collections::BTreeMap;

use crate::stack::Stack;

pub const MANIFEST_VERSION: &str = "1.0.0";

#[derive(Debug, Clone, PartialEq)]
pub struct AssembledStack {
    pub stack: Stack,
    pub depth: usize,
}

/// Every stack of the app, in the order they were built.
#[derive(Debug, Clone, PartialEq)]
pub struct CloudAssembly {
    stacks: Vec<AssembledStack>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Manifest {
    pub version: String,
    pub artifacts: BTreeMap<String, Artifact>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    #[serde(rename = "type")]
    pub artifact_type: String,
    pub environment: String,
    pub properties: ArtifactProperties,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactProperties {
    pub template_file: String,
}

impl CloudAssembly {
    pub fn new(stacks: Vec<AssembledStack>) -> Self {
        Self { stacks }
    }

    pub fn stacks(&self) -> impl Iterator<Item = &Stack> {
        self.stacks.iter().map(|assembled| &assembled.stack)
    }

    pub fn stack(&self, name: &str) -> Option<&Stack> {
        self.stacks().find(|stack| stack.name == name)
    }

    /// Groups of stacks that only depend on earlier groups.
    pub fn waves(&self) -> Vec<Vec<&Stack>> {
        let mut waves: Vec<Vec<&Stack>> = vec![];
        for assembled in &self.stacks {
            while waves.len() <= assembled.depth {
                waves.push(vec![]);
            }
            waves[assembled.depth].push(&assembled.stack);
        }
        waves
    }

    pub fn manifest(&self) -> Manifest {
        let artifacts = self
            .stacks()
            .map(|stack| {
                let environment = stack.environment.clone().unwrap_or_default();
                let artifact = Artifact {
                    artifact_type: String::from("aws:cloudformation:stack"),
                    environment: environment.uri(),
                    properties: ArtifactProperties {
                        template_file: template_file_name(&stack.name),
                    },
                    dependencies: stack.dependencies().cloned().collect(),
                };
                (stack.name.clone(), artifact)
            })
            .collect();

        Manifest {
            version: String::from(MANIFEST_VERSION),
            artifacts,
        }
    }
}

pub fn template_file_name(stack_name: &str) -> String {
    format!("{}.template.json", stack_name)
}
