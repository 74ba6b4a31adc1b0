use std::collections::BTreeSet;

use crate::config::Environment;
use crate::template::{self, CfnResource, ExportName, Output, Parameter, Resource, Template, Token};

/// A value owned by one stack that other stacks may reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exported {
    pub stack: String,
    pub export_name: String,
    local: Token,
}

/// One deployable unit: a template plus the stacks it imports from.
#[derive(Debug, Clone, PartialEq)]
pub struct Stack {
    pub name: String,
    pub environment: Option<Environment>,
    pub template: Template,
    dependencies: BTreeSet<String>,
}

impl Stack {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            environment: None,
            template: Template::new(Some(description.into())),
            dependencies: BTreeSet::new(),
        }
    }

    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = Some(environment);
        self
    }

    pub fn add<R: CfnResource>(
        &mut self,
        logical_id: &str,
        resource: &R,
    ) -> Result<&mut Resource, template::Error> {
        self.template.add(logical_id, resource)
    }

    pub fn add_parameter(
        &mut self,
        logical_id: &str,
        parameter: Parameter,
    ) -> Result<Token, template::Error> {
        self.template.add_parameter(logical_id, parameter)
    }

    /// Publishes `value` as a stack output with a cross-stack export name.
    pub fn export(
        &mut self,
        output_id: &str,
        value: Token,
        description: &str,
    ) -> Result<Exported, template::Error> {
        let export_name = format!("{}:{}", self.name, output_id);
        self.template.add_output(
            output_id,
            Output {
                value: value.clone(),
                description: Some(description.to_string()),
                export: Some(ExportName {
                    name: export_name.clone(),
                }),
            },
        )?;

        return Ok(Exported {
            stack: self.name.clone(),
            export_name,
            local: value,
        });
    }

    pub fn output(
        &mut self,
        output_id: &str,
        value: Token,
        description: &str,
    ) -> Result<(), template::Error> {
        self.template.add_output(
            output_id,
            Output {
                value,
                description: Some(description.to_string()),
                export: None,
            },
        )
    }

    /// Resolves an exported value for use inside this stack, recording the
    /// dependency when it crosses a stack boundary.
    pub fn import(&mut self, exported: &Exported) -> Token {
        if exported.stack == self.name {
            return exported.local.clone();
        }

        self.dependencies.insert(exported.stack.clone());
        Token::ImportValue(exported.export_name.clone())
    }

    pub fn add_dependency(&mut self, stack: impl Into<String>) {
        let stack = stack.into();
        if stack != self.name {
            self.dependencies.insert(stack);
        }
    }

    pub fn dependencies(&self) -> impl Iterator<Item = &String> {
        self.dependencies.iter()
    }
}
