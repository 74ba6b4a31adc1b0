use serde::Serialize;

use crate::resources::ec2::InstanceType;
use crate::template::{CfnResource, Tag, Token};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseEngine {
    Mysql { major: u8, minor: u8 },
}

impl DatabaseEngine {
    pub fn name(&self) -> &'static str {
        match self {
            DatabaseEngine::Mysql { .. } => "mysql",
        }
    }

    pub fn version(&self) -> String {
        match self {
            DatabaseEngine::Mysql { major, minor } => format!("{}.{}", major, minor),
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            DatabaseEngine::Mysql { .. } => 3306,
        }
    }
}

pub fn database_instance_class(instance_type: InstanceType) -> String {
    format!("db.{}", instance_type)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DbSubnetGroup {
    #[serde(rename = "DBSubnetGroupDescription")]
    pub description: String,
    pub subnet_ids: Vec<Token>,
}

impl CfnResource for DbSubnetGroup {
    const TYPE: &'static str = "AWS::RDS::DBSubnetGroup";
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct GenerateSecretString {
    pub secret_string_template: String,
    pub generate_string_key: String,
    pub password_length: u8,
    pub exclude_characters: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Secret {
    pub description: String,
    pub generate_secret_string: GenerateSecretString,
}

impl Secret {
    pub fn for_username(username: &str, description: &str) -> Self {
        Self {
            description: description.to_string(),
            generate_secret_string: GenerateSecretString {
                secret_string_template: format!("{{\"username\":\"{}\"}}", username),
                generate_string_key: String::from("password"),
                password_length: 30,
                exclude_characters: String::from(" %+~`#$&*()|[]{}:;<>?!'/@\"\\"),
            },
        }
    }
}

impl CfnResource for Secret {
    const TYPE: &'static str = "AWS::SecretsManager::Secret";
}

/// `{{resolve:secretsmanager:<secret>:SecretString:<key>::}}`
pub fn secret_field(secret: &str, key: &str) -> Token {
    Token::Join(vec![
        Token::literal("{{resolve:secretsmanager:"),
        Token::reference(secret),
        Token::literal(format!(":SecretString:{}::}}}}", key)),
    ])
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct SecretTargetAttachment {
    pub secret_id: Token,
    pub target_id: Token,
    pub target_type: String,
}

impl CfnResource for SecretTargetAttachment {
    const TYPE: &'static str = "AWS::SecretsManager::SecretTargetAttachment";
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DbInstance {
    pub engine: String,
    pub engine_version: String,
    #[serde(rename = "DBInstanceClass")]
    pub instance_class: String,
    #[serde(rename = "DBName")]
    pub database_name: String,
    #[serde(rename = "DBSubnetGroupName")]
    pub subnet_group_name: Token,
    #[serde(rename = "VPCSecurityGroups")]
    pub vpc_security_groups: Vec<Token>,
    pub master_username: Token,
    pub master_user_password: Token,
    pub allocated_storage: String,
    pub max_allocated_storage: u32,
    pub storage_type: String,
    #[serde(rename = "MultiAZ")]
    pub multi_az: bool,
    pub publicly_accessible: bool,
    pub deletion_protection: bool,
    pub copy_tags_to_snapshot: bool,
    pub tags: Vec<Tag>,
}

impl CfnResource for DbInstance {
    const TYPE: &'static str = "AWS::RDS::DBInstance";
}
