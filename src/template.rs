//! In-memory CloudFormation template and the intrinsic functions used to
//! reference values inside it.

use serde::{Serialize, Serializer};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum Error {
    #[error("Logical id {0} is used twice")]
    DuplicateLogicalId(String),

    #[error("Logical id {0} must be alphanumeric")]
    InvalidLogicalId(String),

    #[error("Output {0} is declared twice")]
    DuplicateOutput(String),

    #[error("Export name {0} is declared twice")]
    DuplicateExport(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// A value that is only known once CloudFormation evaluates the template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Literal(String),
    Ref(String),
    GetAtt(String, String),
    ImportValue(String),
    /// The n-th availability zone of the deployment region.
    SelectAz(usize),
    Join(Vec<Token>),
}

impl Token {
    pub fn literal(value: impl Into<String>) -> Self {
        Token::Literal(value.into())
    }

    pub fn reference(logical_id: impl Into<String>) -> Self {
        Token::Ref(logical_id.into())
    }

    pub fn get_att(logical_id: impl Into<String>, attribute: impl Into<String>) -> Self {
        Token::GetAtt(logical_id.into(), attribute.into())
    }

    pub fn partition() -> Self {
        Token::Ref(String::from("AWS::Partition"))
    }

    pub fn to_json(&self) -> Value {
        match self {
            Token::Literal(value) => Value::String(value.clone()),
            Token::Ref(id) => json!({ "Ref": id }),
            Token::GetAtt(id, attribute) => json!({ "Fn::GetAtt": [id, attribute] }),
            Token::ImportValue(name) => json!({ "Fn::ImportValue": name }),
            Token::SelectAz(index) => json!({ "Fn::Select": [index, { "Fn::GetAZs": "" }] }),
            Token::Join(parts) => {
                let parts: Vec<Value> = parts.iter().map(Token::to_json).collect();
                json!({ "Fn::Join": ["", parts] })
            }
        }
    }
}

impl Serialize for Token {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Tag {
    pub key: String,
    pub value: String,
}

impl Tag {
    pub fn name(value: impl Into<String>) -> Self {
        Self {
            key: String::from("Name"),
            value: value.into(),
        }
    }
}

/// What happens to the physical resource when it leaves the template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RemovalPolicy {
    #[serde(rename = "Delete")]
    Destroy,
}

/// Typed resource properties with their CloudFormation type name.
pub trait CfnResource: Serialize {
    const TYPE: &'static str;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Resource {
    #[serde(rename = "Type")]
    pub resource_type: String,

    pub properties: Map<String, Value>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub deletion_policy: Option<RemovalPolicy>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub update_replace_policy: Option<RemovalPolicy>,
}

impl Resource {
    pub fn depends_on(&mut self, logical_id: impl Into<String>) -> &mut Self {
        self.depends_on.push(logical_id.into());
        self
    }

    pub fn apply_removal_policy(&mut self, policy: RemovalPolicy) -> &mut Self {
        self.deletion_policy = Some(policy);
        self.update_replace_policy = Some(policy);
        self
    }

    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Parameter {
    #[serde(rename = "Type")]
    pub parameter_type: String,

    pub default: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Output {
    pub value: Token,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub export: Option<ExportName>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ExportName {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Template {
    #[serde(rename = "AWSTemplateFormatVersion")]
    pub format_version: &'static str,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, Parameter>,

    pub resources: BTreeMap<String, Resource>,

    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub outputs: BTreeMap<String, Output>,
}

impl Template {
    pub fn new(description: Option<String>) -> Self {
        Self {
            format_version: "2010-09-09",
            description,
            parameters: BTreeMap::new(),
            resources: BTreeMap::new(),
            outputs: BTreeMap::new(),
        }
    }

    pub fn add<R: CfnResource>(
        &mut self,
        logical_id: &str,
        resource: &R,
    ) -> Result<&mut Resource, Error> {
        check_logical_id(logical_id)?;
        if self.resources.contains_key(logical_id) {
            return Err(Error::DuplicateLogicalId(logical_id.to_string()));
        }

        let properties = match serde_json::to_value(resource) {
            Ok(Value::Object(properties)) => properties,
            Ok(other) => {
                return Err(Error::Serialization(format!(
                    "{} serialized to a non-object: {}",
                    logical_id, other
                )))
            }
            Err(error) => return Err(Error::Serialization(error.to_string())),
        };

        let entry = self
            .resources
            .entry(logical_id.to_string())
            .or_insert(Resource {
                resource_type: R::TYPE.to_string(),
                properties,
                depends_on: vec![],
                deletion_policy: None,
                update_replace_policy: None,
            });

        return Ok(entry);
    }

    pub fn add_parameter(
        &mut self,
        logical_id: &str,
        parameter: Parameter,
    ) -> Result<Token, Error> {
        check_logical_id(logical_id)?;
        if self.parameters.contains_key(logical_id) || self.resources.contains_key(logical_id) {
            return Err(Error::DuplicateLogicalId(logical_id.to_string()));
        }

        self.parameters.insert(logical_id.to_string(), parameter);
        return Ok(Token::reference(logical_id));
    }

    pub fn add_output(&mut self, output_id: &str, output: Output) -> Result<(), Error> {
        check_logical_id(output_id)?;
        if self.outputs.contains_key(output_id) {
            return Err(Error::DuplicateOutput(output_id.to_string()));
        }
        if let Some(export) = &output.export {
            let taken = self
                .outputs
                .values()
                .filter_map(|existing| existing.export.as_ref())
                .any(|existing| existing.name == export.name);
            if taken {
                return Err(Error::DuplicateExport(export.name.clone()));
            }
        }

        self.outputs.insert(output_id.to_string(), output);
        return Ok(());
    }

    pub fn resource(&self, logical_id: &str) -> Option<&Resource> {
        self.resources.get(logical_id)
    }

    pub fn resources_of_type<'a>(
        &'a self,
        resource_type: &'a str,
    ) -> impl Iterator<Item = (&'a String, &'a Resource)> + 'a {
        self.resources
            .iter()
            .filter(move |(_, resource)| resource.resource_type == resource_type)
    }

    pub fn to_json(&self) -> Result<String, Error> {
        serde_json::to_string_pretty(self).map_err(|error| Error::Serialization(error.to_string()))
    }
}

fn check_logical_id(logical_id: &str) -> Result<(), Error> {
    if logical_id.is_empty() || !logical_id.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(Error::InvalidLogicalId(logical_id.to_string()));
    }
    Ok(())
}
