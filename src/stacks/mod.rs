pub mod compute;
pub mod database;
pub mod identity;
pub mod network;

use crate::graph::UnitGraph;

/// The PulseLogic application: network, role, instances and database.
pub fn app() -> UnitGraph {
    UnitGraph::new()
        .with(network::NetworkUnit)
        .with(identity::IdentityUnit)
        .with(compute::ComputeUnit)
        .with(database::DatabaseUnit)
}
