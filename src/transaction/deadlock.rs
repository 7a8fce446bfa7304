// Deadlock detection over the wait-for graph.
//
// The graph is induced by the currently blocked transactions and their
// `wait_for` edges. Strongly connected components are computed with
// Kosaraju's two-pass DFS (the reverse graph is already materialized as the
// `waited_by` sets). Any component of size two or more is a deadlock; its
// youngest member is marked as a victim and the analysis repeats on the
// shrunken set until no such component remains.

use std::collections::HashSet;

use crate::common::TransactionId;
use crate::transaction::types::Transaction;

/// Selects the transactions to kill so the wait-for graph becomes acyclic.
///
/// Victims are returned in kill order: descending creation timestamp, ties
/// broken by descending name so runs are deterministic.
pub fn select_victims(txns: &[Transaction], blocked: &[TransactionId]) -> Vec<TransactionId> {
    let mut working: Vec<TransactionId> = blocked.to_vec();
    let mut victims = Vec::new();

    loop {
        let components = strongly_connected(txns, &working);
        let mut found = false;
        for component in &components {
            if component.len() >= 2 {
                found = true;
                let victim = youngest(txns, component);
                victims.push(victim);
                working.retain(|&t| t != victim);
            }
        }
        if !found {
            break;
        }
    }

    victims.sort_by(|&a, &b| {
        (txns[b].birth, txns[b].name.as_str()).cmp(&(txns[a].birth, txns[a].name.as_str()))
    });
    victims
}

fn youngest(txns: &[Transaction], component: &[TransactionId]) -> TransactionId {
    component
        .iter()
        .copied()
        .max_by(|&a, &b| {
            (txns[a].birth, txns[a].name.as_str()).cmp(&(txns[b].birth, txns[b].name.as_str()))
        })
        .expect("component is non-empty")
}

/// Kosaraju SCC restricted to `nodes`.
fn strongly_connected(txns: &[Transaction], nodes: &[TransactionId]) -> Vec<Vec<TransactionId>> {
    let node_set: HashSet<TransactionId> = nodes.iter().copied().collect();

    let mut visited = HashSet::new();
    let mut order = Vec::new();
    for &t in nodes {
        if !visited.contains(&t) {
            fill_order(txns, &node_set, t, &mut visited, &mut order);
        }
    }

    visited.clear();
    let mut components = Vec::new();
    for &t in order.iter().rev() {
        if !visited.contains(&t) {
            let mut component = Vec::new();
            collect_component(txns, &node_set, t, &mut visited, &mut component);
            components.push(component);
        }
    }
    components
}

/// First pass: post-order over the forward (`wait_for`) edges.
fn fill_order(
    txns: &[Transaction],
    nodes: &HashSet<TransactionId>,
    t: TransactionId,
    visited: &mut HashSet<TransactionId>,
    order: &mut Vec<TransactionId>,
) {
    visited.insert(t);
    for &next in &txns[t].wait_for {
        if nodes.contains(&next) && !visited.contains(&next) {
            fill_order(txns, nodes, next, visited, order);
        }
    }
    order.push(t);
}

/// Second pass: DFS over the reverse (`waited_by`) edges.
fn collect_component(
    txns: &[Transaction],
    nodes: &HashSet<TransactionId>,
    t: TransactionId,
    visited: &mut HashSet<TransactionId>,
    component: &mut Vec<TransactionId>,
) {
    visited.insert(t);
    component.push(t);
    for &next in &txns[t].waited_by {
        if nodes.contains(&next) && !visited.contains(&next) {
            collect_component(txns, nodes, next, visited, component);
        }
    }
}
