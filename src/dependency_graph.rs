//! Declared cross-category dependencies and their evaluation order.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::db::Category;
use crate::error::EngineError;

/// `consumer` reads `field` from the `upstream` snapshot of the same dam.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dependency {
    pub consumer: Category,
    pub upstream: Category,
    pub field: &'static str,
}

pub const DEPENDENCIES: &[Dependency] = &[
    Dependency {
        consumer: Category::BasinAggregated,
        upstream: Category::StructuralHealth,
        field: "damHealthScore",
    },
    Dependency {
        consumer: Category::GateSpillway,
        upstream: Category::PredictiveSimulation,
        field: "totalInflow",
    },
    Dependency {
        consumer: Category::DownstreamRisk,
        upstream: Category::PredictiveSimulation,
        field: "totalInflow",
    },
];

/// Upstream categories `category` reads from.
pub fn upstreams_of(category: Category) -> Vec<Category> {
    upstreams_in(DEPENDENCIES, category)
}

fn upstreams_in(edges: &[Dependency], category: Category) -> Vec<Category> {
    let set: BTreeSet<Category> = edges
        .iter()
        .filter(|d| d.consumer == category)
        .map(|d| d.upstream)
        .collect();
    set.into_iter().collect()
}

/// Kahn's algorithm over `categories`, restricted to edges between them.
/// Ties resolve in [`Category`] declaration order so the result is stable.
pub fn topological_order(categories: &[Category]) -> Result<Vec<Category>, EngineError> {
    topological_order_with(DEPENDENCIES, categories)
}

pub fn topological_order_with(
    edges: &[Dependency],
    categories: &[Category],
) -> Result<Vec<Category>, EngineError> {
    let nodes: BTreeSet<Category> = categories.iter().copied().collect();
    let mut in_degree: BTreeMap<Category, usize> = nodes.iter().map(|c| (*c, 0)).collect();
    let mut consumers: BTreeMap<Category, BTreeSet<Category>> = BTreeMap::new();

    for edge in edges {
        if nodes.contains(&edge.consumer) && nodes.contains(&edge.upstream) {
            // The same pair may be declared for several fields
            if consumers
                .entry(edge.upstream)
                .or_default()
                .insert(edge.consumer)
            {
                *in_degree.entry(edge.consumer).or_default() += 1;
            }
        }
    }

    let mut ready: VecDeque<Category> = in_degree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(c, _)| *c)
        .collect();
    let mut order = Vec::with_capacity(nodes.len());

    while let Some(category) = ready.pop_front() {
        order.push(category);
        if let Some(next) = consumers.get(&category) {
            for consumer in next {
                if let Some(degree) = in_degree.get_mut(consumer) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.push_back(*consumer);
                    }
                }
            }
        }
    }

    if order.len() != nodes.len() {
        let cyclic = in_degree
            .into_iter()
            .filter(|(_, degree)| *degree > 0)
            .map(|(c, _)| c)
            .collect();
        return Err(EngineError::DependencyCycle(cyclic));
    }

    Ok(order)
}

/// Every category that transitively consumes `category`, in evaluation order.
pub fn dependents_of(category: Category) -> Result<Vec<Category>, EngineError> {
    dependents_with(DEPENDENCIES, category)
}

pub fn dependents_with(
    edges: &[Dependency],
    category: Category,
) -> Result<Vec<Category>, EngineError> {
    let mut reached = BTreeSet::new();
    let mut queue = VecDeque::from([category]);
    while let Some(current) = queue.pop_front() {
        for edge in edges.iter().filter(|d| d.upstream == current) {
            if reached.insert(edge.consumer) {
                queue.push_back(edge.consumer);
            }
        }
    }
    reached.remove(&category);

    let reached: Vec<Category> = reached.into_iter().collect();
    topological_order_with(edges, &reached)
}
