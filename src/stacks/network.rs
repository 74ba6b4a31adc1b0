//! The VPC every other stack is placed in: one public and one isolated
//! subnet per availability zone.

use crate::cidr::Ipv4Cidr;
use crate::config::AppConfig;
use crate::graph::{self, Handle, HandleKind, Handles, Unit, UnitOutput};
use crate::handles::{AvailabilityZone, NetworkHandle, SubnetHandle};
use crate::resources::ec2::{
    InternetGateway, Route, RouteTable, Subnet, SubnetRouteTableAssociation, SubnetType, Vpc,
    VpcGatewayAttachment,
};
use crate::stack::Stack;
use crate::template::{Tag, Token};

pub const STACK_NAME: &str = "VPCStack";

const GATEWAY_ATTACHMENT: &str = "VPCGatewayAttachment";

pub struct NetworkStack {
    pub stack: Stack,
    pub network: NetworkHandle,
}

pub fn build(config: &AppConfig) -> Result<NetworkStack, graph::Error> {
    let settings = &config.network;
    let cidr: Ipv4Cidr = settings.cidr.parse()?;
    let vpc_name = format!("{}VPC", config.app_name);

    let zones: Vec<AvailabilityZone> = match &settings.availability_zones {
        Some(names) => names
            .iter()
            .take(usize::from(settings.max_azs))
            .cloned()
            .map(AvailabilityZone::Named)
            .collect(),
        None => (0..usize::from(settings.max_azs))
            .map(AvailabilityZone::Indexed)
            .collect(),
    };

    for (position, zone) in zones.iter().enumerate() {
        if zones[..position].contains(zone) {
            return Err(graph::Error::DuplicateZone(format!("{:?}", zone)));
        }
    }

    let mut stack = Stack::new(STACK_NAME, format!("Network for {}", config.app_name));

    stack.add(
        "Vpc",
        &Vpc {
            cidr_block: cidr.to_string(),
            enable_dns_hostnames: true,
            enable_dns_support: true,
            instance_tenancy: String::from("default"),
            tags: vec![Tag::name(&vpc_name)],
        },
    )?;
    let vpc = Token::reference("Vpc");

    stack.add(
        "InternetGateway",
        &InternetGateway {
            tags: vec![Tag::name(&vpc_name)],
        },
    )?;
    stack.add(
        GATEWAY_ATTACHMENT,
        &VpcGatewayAttachment {
            vpc_id: vpc.clone(),
            internet_gateway_id: Token::reference("InternetGateway"),
        },
    )?;

    let mut subnets = vec![];
    // Public blocks come first, isolated ones follow.
    let layout = [SubnetType::Public, SubnetType::PrivateIsolated];
    for (group, subnet_type) in layout.iter().enumerate() {
        for (position, zone) in zones.iter().enumerate() {
            let index = group * zones.len() + position;
            let block = cidr.subnet(settings.subnet_prefix, index as u32)?;
            let subnet = add_subnet(
                &mut stack,
                &vpc,
                &vpc_name,
                *subnet_type,
                position + 1,
                zone,
                block,
            )?;
            subnets.push(subnet);
        }
    }

    let vpc_id = stack.export("VpcId", vpc, "VPC id")?;

    tracing::info!(
        stack = STACK_NAME,
        cidr = %cidr,
        zones = zones.len(),
        subnets = subnets.len(),
        "network declared"
    );

    return Ok(NetworkStack {
        stack,
        network: NetworkHandle {
            vpc_id,
            availability_zones: zones,
            subnets,
        },
    });
}

fn add_subnet(
    stack: &mut Stack,
    vpc: &Token,
    vpc_name: &str,
    subnet_type: SubnetType,
    number: usize,
    zone: &AvailabilityZone,
    block: Ipv4Cidr,
) -> Result<SubnetHandle, graph::Error> {
    let id = format!("{}Subnet{}", subnet_type.label(), number);
    let route_table_id = format!("{}RouteTable", id);
    let name = Tag::name(format!("{}/{}", vpc_name, id));

    stack.add(
        &id,
        &Subnet {
            vpc_id: vpc.clone(),
            cidr_block: block.to_string(),
            availability_zone: zone.token(),
            map_public_ip_on_launch: subnet_type == SubnetType::Public,
            tags: vec![name.clone()],
        },
    )?;
    stack.add(
        &route_table_id,
        &RouteTable {
            vpc_id: vpc.clone(),
            tags: vec![name],
        },
    )?;
    stack.add(
        &format!("{}RouteTableAssociation", id),
        &SubnetRouteTableAssociation {
            route_table_id: Token::reference(&route_table_id),
            subnet_id: Token::reference(&id),
        },
    )?;

    // Isolated subnets get no default route at all.
    if subnet_type == SubnetType::Public {
        stack
            .add(
                &format!("{}DefaultRoute", id),
                &Route {
                    route_table_id: Token::reference(&route_table_id),
                    destination_cidr_block: String::from("0.0.0.0/0"),
                    gateway_id: Token::reference("InternetGateway"),
                },
            )?
            .depends_on(GATEWAY_ATTACHMENT);
    }

    let subnet_id = stack.export(
        &format!("{}Id", id),
        Token::reference(&id),
        &format!("{} subnet id", subnet_type.label()),
    )?;

    return Ok(SubnetHandle {
        subnet_type,
        availability_zone: zone.clone(),
        cidr_block: block.to_string(),
        subnet_id,
    });
}

pub struct NetworkUnit;

impl Unit for NetworkUnit {
    fn name(&self) -> &str {
        STACK_NAME
    }

    fn requires(&self) -> Vec<HandleKind> {
        vec![]
    }

    fn produces(&self) -> Option<HandleKind> {
        Some(HandleKind::Network)
    }

    fn build(&self, config: &AppConfig, _handles: &Handles) -> Result<UnitOutput, graph::Error> {
        let NetworkStack { stack, network } = build(config)?;
        Ok(UnitOutput {
            stack,
            handle: Some(Handle::Network(network)),
        })
    }
}
