//! Stack units and the dependency graph that orders them.
//!
//! Each unit declares which handles it needs and which one it produces. The
//! graph derives the edges from those declarations, sorts the units with
//! Kahn's algorithm (registration order breaks ties) and builds them one
//! after another, feeding every produced handle to the units that follow.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::assembly::{AssembledStack, CloudAssembly};
use crate::cidr;
use crate::config::AppConfig;
use crate::handles::{NetworkHandle, RoleHandle, SecurityGroupHandle};
use crate::resources::ec2::SubnetType;
use crate::stack::Stack;
use crate::template;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum Error {
    #[error("Unit {unit} requires {kind} but no unit produces it")]
    MissingProducer { unit: String, kind: HandleKind },

    #[error("{kind} is produced by both {first} and {second}")]
    DuplicateProducer {
        kind: HandleKind,
        first: String,
        second: String,
    },

    #[error("Dependency cycle between units: {}", .0.join(", "))]
    Cycle(Vec<String>),

    #[error("Unit {0} is registered twice")]
    DuplicateUnit(String),

    #[error("{0} has not been produced yet")]
    MissingHandle(HandleKind),

    #[error("Unit {unit} produced {produced:?} but declared {declared:?}")]
    UnexpectedHandle {
        unit: String,
        declared: Option<HandleKind>,
        produced: Option<HandleKind>,
    },

    #[error("Network has no {subnet_type:?} subnet in zone {zone}")]
    MissingSubnet { subnet_type: SubnetType, zone: usize },

    #[error("Availability zone {0} is used twice")]
    DuplicateZone(String),

    #[error("Invalid network layout: {0}")]
    InvalidNetwork(#[from] cidr::Error),

    #[error(transparent)]
    Template(#[from] template::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HandleKind {
    Network,
    Role,
    ComputeSecurityGroup,
}

impl fmt::Display for HandleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HandleKind::Network => "network handle",
            HandleKind::Role => "role handle",
            HandleKind::ComputeSecurityGroup => "compute security group handle",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Handle {
    Network(NetworkHandle),
    Role(RoleHandle),
    ComputeSecurityGroup(SecurityGroupHandle),
}

impl Handle {
    pub fn kind(&self) -> HandleKind {
        match self {
            Handle::Network(_) => HandleKind::Network,
            Handle::Role(_) => HandleKind::Role,
            Handle::ComputeSecurityGroup(_) => HandleKind::ComputeSecurityGroup,
        }
    }
}

/// Handles produced so far, keyed by kind along with the producing unit.
/// Each kind can be set exactly once.
#[derive(Debug, Default)]
pub struct Handles {
    produced: BTreeMap<HandleKind, (String, Handle)>,
}

impl Handles {
    fn insert(&mut self, unit: &str, handle: Handle) -> Result<(), Error> {
        let kind = handle.kind();
        if let Some((first, _)) = self.produced.get(&kind) {
            return Err(Error::DuplicateProducer {
                kind,
                first: first.clone(),
                second: unit.to_string(),
            });
        }
        self.produced.insert(kind, (unit.to_string(), handle));
        Ok(())
    }

    pub fn network(&self) -> Result<&NetworkHandle, Error> {
        match self.produced.get(&HandleKind::Network) {
            Some((_, Handle::Network(network))) => Ok(network),
            _ => Err(Error::MissingHandle(HandleKind::Network)),
        }
    }

    pub fn role(&self) -> Result<&RoleHandle, Error> {
        match self.produced.get(&HandleKind::Role) {
            Some((_, Handle::Role(role))) => Ok(role),
            _ => Err(Error::MissingHandle(HandleKind::Role)),
        }
    }

    pub fn compute_security_group(&self) -> Result<&SecurityGroupHandle, Error> {
        match self.produced.get(&HandleKind::ComputeSecurityGroup) {
            Some((_, Handle::ComputeSecurityGroup(group))) => Ok(group),
            _ => Err(Error::MissingHandle(HandleKind::ComputeSecurityGroup)),
        }
    }
}

pub struct UnitOutput {
    pub stack: Stack,
    pub handle: Option<Handle>,
}

/// A named unit that builds exactly one stack.
pub trait Unit {
    fn name(&self) -> &str;

    fn requires(&self) -> Vec<HandleKind>;

    fn produces(&self) -> Option<HandleKind>;

    fn build(&self, config: &AppConfig, handles: &Handles) -> Result<UnitOutput, Error>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedUnit {
    pub name: String,
    pub depends_on: Vec<String>,
    /// Length of the longest dependency chain below this unit.
    pub depth: usize,
    index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    pub order: Vec<PlannedUnit>,
}

impl Plan {
    pub fn names(&self) -> Vec<&str> {
        self.order.iter().map(|unit| unit.name.as_str()).collect()
    }
}

#[derive(Default)]
pub struct UnitGraph {
    units: Vec<Box<dyn Unit>>,
}

impl UnitGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, unit: impl Unit + 'static) -> Self {
        self.units.push(Box::new(unit));
        self
    }

    pub fn plan(&self) -> Result<Plan, Error> {
        let mut names = BTreeSet::new();
        for unit in &self.units {
            if !names.insert(unit.name()) {
                return Err(Error::DuplicateUnit(unit.name().to_string()));
            }
        }

        let mut producers: BTreeMap<HandleKind, usize> = BTreeMap::new();
        for (index, unit) in self.units.iter().enumerate() {
            if let Some(kind) = unit.produces() {
                if let Some(first) = producers.insert(kind, index) {
                    return Err(Error::DuplicateProducer {
                        kind,
                        first: self.units[first].name().to_string(),
                        second: unit.name().to_string(),
                    });
                }
            }
        }

        let mut dependencies: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); self.units.len()];
        let mut dependents: Vec<Vec<usize>> = vec![vec![]; self.units.len()];
        for (index, unit) in self.units.iter().enumerate() {
            for kind in unit.requires() {
                let producer = match producers.get(&kind) {
                    Some(producer) => *producer,
                    None => {
                        return Err(Error::MissingProducer {
                            unit: unit.name().to_string(),
                            kind,
                        })
                    }
                };
                if producer == index {
                    return Err(Error::Cycle(vec![unit.name().to_string()]));
                }
                if dependencies[index].insert(producer) {
                    dependents[producer].push(index);
                }
            }
        }

        let mut in_degree: Vec<usize> = dependencies.iter().map(BTreeSet::len).collect();
        let mut ready: BTreeSet<usize> = (0..self.units.len())
            .filter(|index| in_degree[*index] == 0)
            .collect();
        let mut depth = vec![0usize; self.units.len()];
        let mut order = vec![];

        while let Some(index) = ready.pop_first() {
            depth[index] = dependencies[index]
                .iter()
                .map(|dependency| depth[*dependency] + 1)
                .max()
                .unwrap_or(0);

            for dependent in &dependents[index] {
                in_degree[*dependent] -= 1;
                if in_degree[*dependent] == 0 {
                    ready.insert(*dependent);
                }
            }

            order.push(PlannedUnit {
                name: self.units[index].name().to_string(),
                depends_on: dependencies[index]
                    .iter()
                    .map(|dependency| self.units[*dependency].name().to_string())
                    .collect(),
                depth: depth[index],
                index,
            });
        }

        if order.len() < self.units.len() {
            let stuck = (0..self.units.len())
                .filter(|index| in_degree[*index] > 0)
                .map(|index| self.units[index].name().to_string())
                .collect();
            return Err(Error::Cycle(stuck));
        }

        return Ok(Plan { order });
    }

    /// Builds every unit in dependency order.
    pub fn assemble(&self, config: &AppConfig) -> Result<CloudAssembly, Error> {
        let plan = self.plan()?;
        let mut handles = Handles::default();
        let mut stacks = vec![];

        for planned in &plan.order {
            let unit = &self.units[planned.index];
            tracing::debug!(unit = unit.name(), depth = planned.depth, "building unit");

            let UnitOutput { mut stack, handle } = unit.build(config, &handles)?;

            let produced = handle.as_ref().map(Handle::kind);
            if produced != unit.produces() {
                return Err(Error::UnexpectedHandle {
                    unit: unit.name().to_string(),
                    declared: unit.produces(),
                    produced,
                });
            }
            if let Some(handle) = handle {
                handles.insert(unit.name(), handle)?;
            }

            for dependency in &planned.depends_on {
                stack.add_dependency(dependency.clone());
            }

            tracing::info!(
                stack = %stack.name,
                resources = stack.template.resources.len(),
                "stack assembled"
            );
            stacks.push(AssembledStack {
                stack,
                depth: planned.depth,
            });
        }

        return Ok(CloudAssembly::new(stacks));
    }
}

#[cfg(test)]
mod tests {
    use super::{Error, Handle, HandleKind, Handles, Unit, UnitGraph, UnitOutput};
    use crate::config::AppConfig;
    use crate::handles::NetworkHandle;
    use crate::stack::Stack;
    use crate::template::Token;

    struct FakeUnit {
        name: &'static str,
        requires: Vec<HandleKind>,
        produces: Option<HandleKind>,
    }

    impl FakeUnit {
        fn new(
            name: &'static str,
            requires: Vec<HandleKind>,
            produces: Option<HandleKind>,
        ) -> Self {
            Self {
                name,
                requires,
                produces,
            }
        }
    }

    impl Unit for FakeUnit {
        fn name(&self) -> &str {
            self.name
        }

        fn requires(&self) -> Vec<HandleKind> {
            self.requires.clone()
        }

        fn produces(&self) -> Option<HandleKind> {
            self.produces
        }

        fn build(&self, _config: &AppConfig, handles: &Handles) -> Result<UnitOutput, Error> {
            for kind in &self.requires {
                if *kind == HandleKind::Network {
                    handles.network()?;
                }
            }

            let mut stack = Stack::new(self.name, "fake");
            let handle = match self.produces {
                Some(HandleKind::Network) => {
                    let vpc_id = stack.export("VpcId", Token::reference("Vpc"), "vpc")?;
                    Some(Handle::Network(NetworkHandle {
                        vpc_id,
                        availability_zones: vec![],
                        subnets: vec![],
                    }))
                }
                _ => None,
            };

            Ok(UnitOutput { stack, handle })
        }
    }

    #[test]
    fn orders_units_by_their_inputs() {
        let graph = UnitGraph::new()
            .with(FakeUnit::new("Database", vec![HandleKind::Role], None))
            .with(FakeUnit::new(
                "Identity",
                vec![HandleKind::Network],
                Some(HandleKind::Role),
            ))
            .with(FakeUnit::new("Network", vec![], Some(HandleKind::Network)));

        let plan = graph.plan().unwrap();
        assert_eq!(vec!["Network", "Identity", "Database"], plan.names());
        assert_eq!(
            vec![0, 1, 2],
            plan.order.iter().map(|unit| unit.depth).collect::<Vec<_>>()
        );
        assert_eq!(vec![String::from("Network")], plan.order[1].depends_on);
    }

    #[test]
    fn ties_keep_registration_order() {
        let graph = UnitGraph::new()
            .with(FakeUnit::new("Network", vec![], Some(HandleKind::Network)))
            .with(FakeUnit::new("B", vec![HandleKind::Network], None))
            .with(FakeUnit::new("A", vec![HandleKind::Network], None));

        let plan = graph.plan().unwrap();
        assert_eq!(vec!["Network", "B", "A"], plan.names());
        assert_eq!(1, plan.order[1].depth);
        assert_eq!(1, plan.order[2].depth);
    }

    #[test]
    fn detects_cycles() {
        let graph = UnitGraph::new()
            .with(FakeUnit::new(
                "Left",
                vec![HandleKind::Role],
                Some(HandleKind::Network),
            ))
            .with(FakeUnit::new(
                "Right",
                vec![HandleKind::Network],
                Some(HandleKind::Role),
            ));

        match graph.plan().err().unwrap() {
            Error::Cycle(units) => assert_eq!(2, units.len()),
            _ => panic!("Expected `Cycle` error"),
        }
    }

    #[test]
    fn detects_self_dependency() {
        let graph = UnitGraph::new().with(FakeUnit::new(
            "Loop",
            vec![HandleKind::Network],
            Some(HandleKind::Network),
        ));

        assert_eq!(
            Error::Cycle(vec![String::from("Loop")]),
            graph.plan().err().unwrap()
        );
    }

    #[test]
    fn detects_missing_producer() {
        let graph = UnitGraph::new().with(FakeUnit::new("Compute", vec![HandleKind::Role], None));

        assert_eq!(
            Error::MissingProducer {
                unit: String::from("Compute"),
                kind: HandleKind::Role,
            },
            graph.plan().err().unwrap()
        );
    }

    #[test]
    fn detects_duplicate_producer() {
        let graph = UnitGraph::new()
            .with(FakeUnit::new("One", vec![], Some(HandleKind::Network)))
            .with(FakeUnit::new("Two", vec![], Some(HandleKind::Network)));

        match graph.plan().err().unwrap() {
            Error::DuplicateProducer { first, second, .. } => {
                assert_eq!("One", first);
                assert_eq!("Two", second);
            }
            _ => panic!("Expected `DuplicateProducer` error"),
        }
    }

    #[test]
    fn second_handle_of_a_kind_names_both_units() {
        let mut stack = Stack::new("Network", "fake");
        let vpc_id = stack
            .export("VpcId", Token::reference("Vpc"), "vpc")
            .unwrap();
        let network = NetworkHandle {
            vpc_id,
            availability_zones: vec![],
            subnets: vec![],
        };

        let mut handles = Handles::default();
        handles
            .insert("Network", Handle::Network(network.clone()))
            .unwrap();

        assert_eq!(
            Error::DuplicateProducer {
                kind: HandleKind::Network,
                first: String::from("Network"),
                second: String::from("Shadow"),
            },
            handles
                .insert("Shadow", Handle::Network(network))
                .err()
                .unwrap()
        );
        assert_eq!(true, handles.network().is_ok());
    }

    #[test]
    fn assembly_rejects_undeclared_output() {
        struct Liar;
        impl Unit for Liar {
            fn name(&self) -> &str {
                "Liar"
            }
            fn requires(&self) -> Vec<HandleKind> {
                vec![]
            }
            fn produces(&self) -> Option<HandleKind> {
                Some(HandleKind::Role)
            }
            fn build(&self, _config: &AppConfig, _handles: &Handles) -> Result<UnitOutput, Error> {
                Ok(UnitOutput {
                    stack: Stack::new("Liar", "liar"),
                    handle: None,
                })
            }
        }

        match UnitGraph::new().with(Liar).assemble(&AppConfig::default()) {
            Err(Error::UnexpectedHandle { unit, .. }) => assert_eq!("Liar", unit),
            _ => panic!("Expected `UnexpectedHandle` error"),
        }
    }

    #[test]
    fn assembly_records_declared_dependencies() {
        let graph = UnitGraph::new()
            .with(FakeUnit::new("Network", vec![], Some(HandleKind::Network)))
            .with(FakeUnit::new("Identity", vec![HandleKind::Network], None));

        let assembly = graph.assemble(&AppConfig::default()).unwrap();
        let identity = assembly.stack("Identity").unwrap();
        assert_eq!(
            vec![&String::from("Network")],
            identity.dependencies().collect::<Vec<_>>()
        );
    }
}
