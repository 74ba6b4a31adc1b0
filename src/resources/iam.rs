use serde::Serialize;

use crate::template::{CfnResource, Token};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServicePrincipal {
    pub service: String,
}

impl ServicePrincipal {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Statement {
    pub action: String,
    pub effect: String,
    pub principal: ServicePrincipal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyDocument {
    pub version: String,
    pub statement: Vec<Statement>,
}

impl PolicyDocument {
    pub fn assume_role(principal: ServicePrincipal) -> Self {
        Self {
            version: String::from("2012-10-17"),
            statement: vec![Statement {
                action: String::from("sts:AssumeRole"),
                effect: String::from("Allow"),
                principal,
            }],
        }
    }
}

/// ARN of an AWS managed policy in the deployment partition.
pub fn aws_managed_policy(name: &str) -> Token {
    Token::Join(vec![
        Token::literal("arn:"),
        Token::partition(),
        Token::literal(format!(":iam::aws:policy/{}", name)),
    ])
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Role {
    pub role_name: String,
    pub description: String,
    pub assume_role_policy_document: PolicyDocument,
    pub managed_policy_arns: Vec<Token>,
}

impl CfnResource for Role {
    const TYPE: &'static str = "AWS::IAM::Role";
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct InstanceProfile {
    pub roles: Vec<Token>,
}

impl CfnResource for InstanceProfile {
    const TYPE: &'static str = "AWS::IAM::InstanceProfile";
}
