//! Dependency resolution: topological ordering and cycle detection.

use indexmap::{IndexMap, IndexSet};

use crate::config::ServiceSpec;
use crate::error::ProcessManagerError;

/// Returns services in an order consistent with their dependency graph:
/// every dependency appears before its dependents.
///
/// Implemented as a depth-first post-order traversal over `services` in
/// declaration order, so that among services with no ordering constraint
/// relative to each other, the output follows declaration order rather than
/// an incidental alphabetical or hash-map order.
pub fn topological_order(
    services: &IndexMap<String, ServiceSpec>,
) -> Result<Vec<String>, ProcessManagerError> {
    let mut order = Vec::with_capacity(services.len());
    let mut visited: IndexSet<String> = IndexSet::new();
    let mut in_progress: Vec<String> = Vec::new();

    for name in services.keys() {
        visit(name, services, &mut visited, &mut in_progress, &mut order)?;
    }

    Ok(order)
}

fn visit(
    name: &str,
    services: &IndexMap<String, ServiceSpec>,
    visited: &mut IndexSet<String>,
    in_progress: &mut Vec<String>,
    order: &mut Vec<String>,
) -> Result<(), ProcessManagerError> {
    if visited.contains(name) {
        return Ok(());
    }

    if let Some(pos) = in_progress.iter().position(|n| n == name) {
        let mut path: Vec<&str> = in_progress[pos..].iter().map(String::as_str).collect();
        path.push(name);
        return Err(ProcessManagerError::InvalidConfig(format!(
            "dependency cycle: {}",
            path.join(" -> ")
        )));
    }

    let spec = services
        .get(name)
        .ok_or_else(|| ProcessManagerError::UnknownService(name.to_string()))?;

    in_progress.push(name.to_string());
    for dep in spec.depends_on.keys() {
        visit(dep, services, visited, in_progress, order)?;
    }
    in_progress.pop();

    visited.insert(name.to_string());
    order.push(name.to_string());

    Ok(())
}

/// Returns the stop order: the reverse of the start order, so dependents are
/// stopped before the services they depend on.
pub fn stop_order(
    services: &IndexMap<String, ServiceSpec>,
) -> Result<Vec<String>, ProcessManagerError> {
    let mut order = topological_order(services)?;
    order.reverse();
    Ok(order)
}
