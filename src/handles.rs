//! Values one stack hands to the stacks built after it.
//!
//! Handles are created once by their owning unit and never mutated; consumers
//! resolve them through [`Stack::import`](crate::stack::Stack::import).

use crate::resources::ec2::{Ingress, SubnetType};
use crate::resources::iam::ServicePrincipal;
use crate::stack::Exported;
use crate::template::Token;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AvailabilityZone {
    Named(String),
    /// Position in the region's zone list, resolved by CloudFormation.
    Indexed(usize),
}

impl AvailabilityZone {
    pub fn token(&self) -> Token {
        match self {
            AvailabilityZone::Named(name) => Token::literal(name.clone()),
            AvailabilityZone::Indexed(index) => Token::SelectAz(*index),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubnetHandle {
    pub subnet_type: SubnetType,
    pub availability_zone: AvailabilityZone,
    pub cidr_block: String,
    pub subnet_id: Exported,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkHandle {
    pub vpc_id: Exported,
    pub availability_zones: Vec<AvailabilityZone>,
    pub subnets: Vec<SubnetHandle>,
}

impl NetworkHandle {
    pub fn subnets_of(&self, subnet_type: SubnetType) -> impl Iterator<Item = &SubnetHandle> {
        self.subnets
            .iter()
            .filter(move |subnet| subnet.subnet_type == subnet_type)
    }

    /// The subnet of `subnet_type` in the zone at `az_index`.
    pub fn subnet_in(&self, subnet_type: SubnetType, az_index: usize) -> Option<&SubnetHandle> {
        let zone = self.availability_zones.get(az_index)?;
        self.subnets_of(subnet_type)
            .find(|subnet| &subnet.availability_zone == zone)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleHandle {
    pub role_name: String,
    pub role_arn: Exported,
    pub role_ref: Exported,
    pub principal: ServicePrincipal,
    pub managed_policies: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SecurityGroupHandle {
    pub group_id: Exported,
    pub ingress: Vec<Ingress>,
    pub allow_all_outbound: bool,
}
