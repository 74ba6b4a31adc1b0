use crate::config::AppConfig;
use crate::graph::{self, Handle, HandleKind, Handles, Unit, UnitOutput};
use crate::handles::{NetworkHandle, RoleHandle};
use crate::resources::iam::{aws_managed_policy, PolicyDocument, Role, ServicePrincipal};
use crate::stack::Stack;
use crate::template::Token;

pub const STACK_NAME: &str = "IamStack";

const ROLE_ID: &str = "Ec2Role";
const EC2_SERVICE: &str = "ec2.amazonaws.com";
const SSM_POLICY: &str = "AmazonSSMManagedInstanceCore";

pub struct IdentityStack {
    pub stack: Stack,
    pub role: RoleHandle,
}

/// The network handle is accepted so every unit after the network has the
/// same shape; the role itself does not reference it.
pub fn build(config: &AppConfig, _network: &NetworkHandle) -> Result<IdentityStack, graph::Error> {
    let mut stack = Stack::new(STACK_NAME, format!("Roles for {}", config.app_name))
        .with_environment(config.environment());

    // Role names are account wide; a second deployment under the same app
    // name collides and CloudFormation reports it.
    let role_name = format!("{}EC2Role", config.app_name);
    let principal = ServicePrincipal::new(EC2_SERVICE);
    let managed_policies = vec![String::from(SSM_POLICY)];

    stack.add(
        ROLE_ID,
        &Role {
            role_name: role_name.clone(),
            description: String::from("Role for the EC2 instances to access AWS services"),
            assume_role_policy_document: PolicyDocument::assume_role(principal.clone()),
            managed_policy_arns: managed_policies
                .iter()
                .map(|policy| aws_managed_policy(policy))
                .collect(),
        },
    )?;

    let role_arn = stack.export("RoleArn", Token::get_att(ROLE_ID, "Arn"), "EC2 role ARN")?;
    let role_ref = stack.export("RoleName", Token::reference(ROLE_ID), "EC2 role name")?;

    tracing::info!(stack = STACK_NAME, role = %role_name, "role declared");

    return Ok(IdentityStack {
        stack,
        role: RoleHandle {
            role_name,
            role_arn,
            role_ref,
            principal,
            managed_policies,
        },
    });
}

pub struct IdentityUnit;

impl Unit for IdentityUnit {
    fn name(&self) -> &str {
        STACK_NAME
    }

    fn requires(&self) -> Vec<HandleKind> {
        vec![HandleKind::Network]
    }

    fn produces(&self) -> Option<HandleKind> {
        Some(HandleKind::Role)
    }

    fn build(&self, config: &AppConfig, handles: &Handles) -> Result<UnitOutput, graph::Error> {
        let IdentityStack { stack, role } = build(config, handles.network()?)?;
        Ok(UnitOutput {
            stack,
            handle: Some(Handle::Role(role)),
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::build;
    use crate::config::{AppConfig, Environment};
    use crate::stacks::network;

    #[test]
    fn role_is_trusted_by_ec2_with_one_policy() {
        let config = AppConfig::default();
        let network = network::build(&config).unwrap().network;
        let identity = build(&config, &network).unwrap();

        assert_eq!("ec2.amazonaws.com", identity.role.principal.service);
        assert_eq!(
            vec![String::from("AmazonSSMManagedInstanceCore")],
            identity.role.managed_policies
        );
        assert_eq!("PulseLogicEC2Role", identity.role.role_name);

        let role = identity.stack.template.resource("Ec2Role").unwrap();
        let statements = role.property("AssumeRolePolicyDocument").unwrap()["Statement"]
            .as_array()
            .unwrap();
        assert_eq!(1, statements.len());
        assert_eq!(
            json!({ "Service": "ec2.amazonaws.com" }),
            statements[0]["Principal"]
        );
        assert_eq!(
            1,
            role.property("ManagedPolicyArns")
                .unwrap()
                .as_array()
                .unwrap()
                .len()
        );
    }

    #[test]
    fn does_not_import_from_the_network() {
        let config = AppConfig::default();
        let network = network::build(&config).unwrap().network;
        let identity = build(&config, &network).unwrap();

        assert_eq!(0, identity.stack.dependencies().count());
    }

    #[test]
    fn carries_the_configured_environment() {
        let config = AppConfig::default().with_environment(
            Some(String::from("123456789012")),
            Some(String::from("eu-west-1")),
        );
        let network = network::build(&config).unwrap().network;
        let identity = build(&config, &network).unwrap();

        assert_eq!(
            Some(Environment {
                account: Some(String::from("123456789012")),
                region: Some(String::from("eu-west-1")),
            }),
            identity.stack.environment
        );
    }
}
