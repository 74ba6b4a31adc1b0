use crate::config::AppConfig;
use crate::graph::{self, Handle, HandleKind, Handles, Unit, UnitOutput};
use crate::handles::{NetworkHandle, RoleHandle, SecurityGroupHandle};
use crate::resources::ec2::{
    Instance, InstanceClass, InstanceSize, InstanceType, MachineImage, Peer, Port, SecurityGroup,
    SubnetType,
};
use crate::resources::iam::InstanceProfile;
use crate::stack::Stack;
use crate::template::{Tag, Token};

pub const STACK_NAME: &str = "EC2Stack";

const SECURITY_GROUP_ID: &str = "EC2SecurityGroup";

pub struct ComputeStack {
    pub stack: Stack,
    pub security_group: SecurityGroupHandle,
    /// Logical id and properties of each instance, in zone order.
    pub instances: Vec<(String, Instance)>,
}

pub fn build(
    config: &AppConfig,
    network: &NetworkHandle,
    role: &RoleHandle,
) -> Result<ComputeStack, graph::Error> {
    let mut stack = Stack::new(STACK_NAME, format!("Instances for {}", config.app_name));
    let vpc = stack.import(&network.vpc_id);

    let mut group = SecurityGroup::new("Security Group for EC2 Instance", vpc, true);
    group.add_ingress_rule(
        Peer::AnyIpv4,
        Port::tcp(22),
        "Allow SSH access from any IPv4 address",
    );
    group.add_ingress_rule(
        Peer::AnyIpv4,
        Port::tcp(80),
        "Allow HTTP access from any IPv4 address",
    );
    group.tag(Tag::name("Public-EC2-SG"));
    stack.add(SECURITY_GROUP_ID, &group)?;

    let image = MachineImage::AmazonLinux2;
    let image_id = stack.add_parameter(image.logical_id(), image.parameter())?;
    let instance_type = InstanceType::of(InstanceClass::T2, InstanceSize::Micro);

    // Only the second instance is bound to the group and the role. The first
    // one runs with the VPC default group and no instance profile.
    let mut instances = vec![];
    for zone in 0..2 {
        let name = format!("{}EC2-AZ{}", config.app_name, zone + 1);
        let logical_id = name.replace('-', "");
        let subnet = network
            .subnet_in(SubnetType::Public, zone)
            .ok_or(graph::Error::MissingSubnet {
                subnet_type: SubnetType::Public,
                zone,
            })?;

        let mut instance = Instance {
            availability_zone: subnet.availability_zone.token(),
            image_id: image_id.clone(),
            instance_type: instance_type.to_string(),
            subnet_id: stack.import(&subnet.subnet_id),
            security_group_ids: None,
            iam_instance_profile: None,
            tags: vec![Tag::name(&name)],
        };

        if zone == 1 {
            let profile_id = format!("{}InstanceProfile", logical_id);
            let role_name = stack.import(&role.role_ref);
            stack.add(
                &profile_id,
                &InstanceProfile {
                    roles: vec![role_name],
                },
            )?;

            instance.security_group_ids = Some(vec![Token::get_att(SECURITY_GROUP_ID, "GroupId")]);
            instance.iam_instance_profile = Some(Token::reference(&profile_id));
        } else {
            tracing::warn!(
                instance = %name,
                "instance has neither the compute security group nor the instance role"
            );
        }

        stack.add(&logical_id, &instance)?;
        instances.push((logical_id, instance));
    }

    let group_id = stack.export(
        "SecurityGroupId",
        Token::get_att(SECURITY_GROUP_ID, "GroupId"),
        "Compute security group id",
    )?;

    tracing::info!(stack = STACK_NAME, instances = instances.len(), "compute declared");

    return Ok(ComputeStack {
        stack,
        security_group: SecurityGroupHandle {
            group_id,
            ingress: group.security_group_ingress,
            allow_all_outbound: group.allow_all_outbound,
        },
        instances,
    });
}

pub struct ComputeUnit;

impl Unit for ComputeUnit {
    fn name(&self) -> &str {
        STACK_NAME
    }

    fn requires(&self) -> Vec<HandleKind> {
        vec![HandleKind::Network, HandleKind::Role]
    }

    fn produces(&self) -> Option<HandleKind> {
        Some(HandleKind::ComputeSecurityGroup)
    }

    fn build(&self, config: &AppConfig, handles: &Handles) -> Result<UnitOutput, graph::Error> {
        let ComputeStack {
            stack,
            security_group,
            ..
        } = build(config, handles.network()?, handles.role()?)?;

        Ok(UnitOutput {
            stack,
            handle: Some(Handle::ComputeSecurityGroup(security_group)),
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use std::collections::BTreeSet;

    use super::{build, ComputeStack};
    use crate::config::AppConfig;
    use crate::stacks::{identity, network};
    use crate::template::Token;

    fn compute() -> ComputeStack {
        let config = AppConfig::default();
        let network = network::build(&config).unwrap().network;
        let role = identity::build(&config, &network).unwrap().role;
        build(&config, &network, &role).unwrap()
    }

    #[test]
    fn security_group_opens_ssh_and_http_to_everyone() {
        let compute = compute();
        let group = &compute.security_group;

        let ports: BTreeSet<u16> = group.ingress.iter().map(|rule| rule.from_port).collect();
        assert_eq!(BTreeSet::from([22, 80]), ports);
        assert_eq!(true, group.ingress.iter().all(|rule| rule.is_from_anywhere()));
        assert_eq!(true, group.allow_all_outbound);

        let resource = compute.stack.template.resource("EC2SecurityGroup").unwrap();
        assert_eq!(
            json!([{
                "IpProtocol": "-1",
                "CidrIp": "0.0.0.0/0",
                "Description": "Allow all outbound traffic by default"
            }]),
            resource.property("SecurityGroupEgress").unwrap().clone()
        );
    }

    #[test]
    fn exactly_one_instance_is_bound() {
        let compute = compute();
        assert_eq!(2, compute.instances.len());

        let bound: Vec<&String> = compute
            .instances
            .iter()
            .filter(|(_, instance)| instance.security_group_bound() && instance.role_bound())
            .map(|(id, _)| id)
            .collect();
        assert_eq!(vec![&String::from("PulseLogicEC2AZ2")], bound);

        let (_, first) = &compute.instances[0];
        assert_eq!(false, first.security_group_bound());
        assert_eq!(false, first.role_bound());
    }

    #[test]
    fn instances_sit_in_distinct_public_subnets() {
        let compute = compute();
        let (_, first) = &compute.instances[0];
        let (_, second) = &compute.instances[1];

        assert_eq!(
            Token::ImportValue(String::from("VPCStack:PublicSubnet1Id")),
            first.subnet_id
        );
        assert_eq!(
            Token::ImportValue(String::from("VPCStack:PublicSubnet2Id")),
            second.subnet_id
        );
        assert_eq!(Token::SelectAz(1), second.availability_zone);
        assert_eq!("t2.micro", second.instance_type);
    }

    #[test]
    fn instance_profile_imports_the_role() {
        let compute = compute();
        let profile = compute
            .stack
            .template
            .resource("PulseLogicEC2AZ2InstanceProfile")
            .unwrap();
        assert_eq!(
            Some(&json!([{ "Fn::ImportValue": "IamStack:RoleName" }])),
            profile.property("Roles")
        );

        let dependencies: Vec<&String> = compute.stack.dependencies().collect();
        assert_eq!(
            vec![&String::from("IamStack"), &String::from("VPCStack")],
            dependencies
        );
    }

    #[test]
    fn image_comes_from_the_ssm_parameter() {
        let compute = compute();
        let parameter = compute
            .stack
            .template
            .parameters
            .get("SsmParameterValueAmazonLinux2ImageId")
            .unwrap();
        assert_eq!(
            "/aws/service/ami-amazon-linux-latest/amzn2-ami-hvm-x86_64-gp2",
            parameter.default
        );
    }
}
