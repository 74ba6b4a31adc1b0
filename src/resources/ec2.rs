use serde::Serialize;
use std::fmt;

use crate::template::{CfnResource, Parameter, Tag, Token};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Vpc {
    pub cidr_block: String,
    pub enable_dns_hostnames: bool,
    pub enable_dns_support: bool,
    pub instance_tenancy: String,
    pub tags: Vec<Tag>,
}

impl CfnResource for Vpc {
    const TYPE: &'static str = "AWS::EC2::VPC";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SubnetType {
    Public,
    PrivateIsolated,
}

impl SubnetType {
    pub fn label(&self) -> &'static str {
        match self {
            SubnetType::Public => "Public",
            SubnetType::PrivateIsolated => "Isolated",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Subnet {
    pub vpc_id: Token,
    pub cidr_block: String,
    pub availability_zone: Token,
    pub map_public_ip_on_launch: bool,
    pub tags: Vec<Tag>,
}

impl CfnResource for Subnet {
    const TYPE: &'static str = "AWS::EC2::Subnet";
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct InternetGateway {
    pub tags: Vec<Tag>,
}

impl CfnResource for InternetGateway {
    const TYPE: &'static str = "AWS::EC2::InternetGateway";
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct VpcGatewayAttachment {
    pub vpc_id: Token,
    pub internet_gateway_id: Token,
}

impl CfnResource for VpcGatewayAttachment {
    const TYPE: &'static str = "AWS::EC2::VPCGatewayAttachment";
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct RouteTable {
    pub vpc_id: Token,
    pub tags: Vec<Tag>,
}

impl CfnResource for RouteTable {
    const TYPE: &'static str = "AWS::EC2::RouteTable";
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Route {
    pub route_table_id: Token,
    pub destination_cidr_block: String,
    pub gateway_id: Token,
}

impl CfnResource for Route {
    const TYPE: &'static str = "AWS::EC2::Route";
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct SubnetRouteTableAssociation {
    pub route_table_id: Token,
    pub subnet_id: Token,
}

impl CfnResource for SubnetRouteTableAssociation {
    const TYPE: &'static str = "AWS::EC2::SubnetRouteTableAssociation";
}

/// Where traffic matched by a rule comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Peer {
    AnyIpv4,
    SecurityGroupId(Token),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Port {
    pub protocol: &'static str,
    pub from: u16,
    pub to: u16,
}

impl Port {
    pub fn tcp(port: u16) -> Self {
        Self {
            protocol: "tcp",
            from: port,
            to: port,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Ingress {
    pub ip_protocol: String,
    pub from_port: u16,
    pub to_port: u16,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub cidr_ip: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_security_group_id: Option<Token>,

    pub description: String,
}

impl Ingress {
    pub fn new(peer: Peer, port: Port, description: &str) -> Self {
        let (cidr_ip, source_security_group_id) = match peer {
            Peer::AnyIpv4 => (Some(String::from("0.0.0.0/0")), None),
            Peer::SecurityGroupId(group) => (None, Some(group)),
        };

        Self {
            ip_protocol: port.protocol.to_string(),
            from_port: port.from,
            to_port: port.to,
            cidr_ip,
            source_security_group_id,
            description: description.to_string(),
        }
    }

    pub fn is_from_anywhere(&self) -> bool {
        self.cidr_ip.as_deref() == Some("0.0.0.0/0")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Egress {
    pub ip_protocol: String,
    pub cidr_ip: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_port: Option<i32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_port: Option<i32>,

    pub description: String,
}

impl Egress {
    fn allow_all() -> Self {
        Self {
            ip_protocol: String::from("-1"),
            cidr_ip: String::from("0.0.0.0/0"),
            from_port: None,
            to_port: None,
            description: String::from("Allow all outbound traffic by default"),
        }
    }

    // An empty egress list means "allow everything" to EC2, so outbound is
    // closed with a rule that can never match.
    fn disallow_all() -> Self {
        Self {
            ip_protocol: String::from("icmp"),
            cidr_ip: String::from("255.255.255.255/32"),
            from_port: Some(252),
            to_port: Some(86),
            description: String::from("Disallow all traffic"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct SecurityGroup {
    pub group_description: String,
    pub vpc_id: Token,
    pub security_group_ingress: Vec<Ingress>,
    pub security_group_egress: Vec<Egress>,
    pub tags: Vec<Tag>,

    #[serde(skip)]
    pub allow_all_outbound: bool,
}

impl SecurityGroup {
    pub fn new(description: &str, vpc_id: Token, allow_all_outbound: bool) -> Self {
        let egress = match allow_all_outbound {
            true => Egress::allow_all(),
            false => Egress::disallow_all(),
        };

        Self {
            group_description: description.to_string(),
            vpc_id,
            security_group_ingress: vec![],
            security_group_egress: vec![egress],
            tags: vec![],
            allow_all_outbound,
        }
    }

    pub fn add_ingress_rule(&mut self, peer: Peer, port: Port, description: &str) {
        self.security_group_ingress
            .push(Ingress::new(peer, port, description));
    }

    pub fn tag(&mut self, tag: Tag) {
        self.tags.push(tag);
    }
}

impl CfnResource for SecurityGroup {
    const TYPE: &'static str = "AWS::EC2::SecurityGroup";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceClass {
    T2,
    T3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceSize {
    Micro,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstanceType {
    pub class: InstanceClass,
    pub size: InstanceSize,
}

impl InstanceType {
    pub fn of(class: InstanceClass, size: InstanceSize) -> Self {
        Self { class, size }
    }
}

impl fmt::Display for InstanceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let class = match self.class {
            InstanceClass::T2 => "t2",
            InstanceClass::T3 => "t3",
        };
        let size = match self.size {
            InstanceSize::Micro => "micro",
        };
        write!(f, "{}.{}", class, size)
    }
}

/// Image families resolved through the public SSM parameters at deploy time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MachineImage {
    AmazonLinux2,
}

impl MachineImage {
    pub fn logical_id(&self) -> &'static str {
        match self {
            MachineImage::AmazonLinux2 => "SsmParameterValueAmazonLinux2ImageId",
        }
    }

    pub fn parameter(&self) -> Parameter {
        let path = match self {
            MachineImage::AmazonLinux2 => {
                "/aws/service/ami-amazon-linux-latest/amzn2-ami-hvm-x86_64-gp2"
            }
        };

        Parameter {
            parameter_type: String::from("AWS::SSM::Parameter::Value<AWS::EC2::Image::Id>"),
            default: path.to_string(),
            description: Some(String::from("Latest Amazon Linux 2 image")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Instance {
    pub availability_zone: Token,
    pub image_id: Token,
    pub instance_type: String,
    pub subnet_id: Token,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub security_group_ids: Option<Vec<Token>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub iam_instance_profile: Option<Token>,

    pub tags: Vec<Tag>,
}

impl Instance {
    pub fn security_group_bound(&self) -> bool {
        self.security_group_ids
            .as_ref()
            .map_or(false, |groups| !groups.is_empty())
    }

    pub fn role_bound(&self) -> bool {
        self.iam_instance_profile.is_some()
    }
}

impl CfnResource for Instance {
    const TYPE: &'static str = "AWS::EC2::Instance";
}
