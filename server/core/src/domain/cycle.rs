// Copyright (c) 2026 aliasd contributors
// SPDX-License-Identifier: AGPL-3.0
//! Cycle detection over a successor map (alias path → target path).

use std::collections::{BTreeMap, HashMap, HashSet};

/// Return the first cycle found by following `links` from every node.
///
/// The cycle runs from the first occurrence of the repeated node through its
/// recurrence, so it has at least two elements and starts and ends with the
/// same node. Nodes that are not keys have no successor and end a chain.
/// Which cycle is reported when several exist is unspecified.
pub fn has_cycle(links: &BTreeMap<String, String>) -> Option<Vec<String>> {
    // Nodes already proven not to lead into a cycle.
    let mut cleared: HashSet<&str> = HashSet::new();

    for start in links.keys() {
        let mut chain: Vec<&str> = Vec::new();
        let mut positions: HashMap<&str, usize> = HashMap::new();
        let mut node = start.as_str();

        loop {
            if cleared.contains(node) {
                break;
            }
            if let Some(&first) = positions.get(node) {
                let mut cycle: Vec<String> = chain[first..].iter().map(|n| n.to_string()).collect();
                cycle.push(node.to_string());
                return Some(cycle);
            }
            positions.insert(node, chain.len());
            chain.push(node);

            match links.get(node) {
                Some(next) => node = next.as_str(),
                None => break,
            }
        }

        cleared.extend(chain);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn links(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(from, to)| (from.to_string(), to.to_string()))
            .collect()
    }

    fn strings(nodes: &[&str]) -> Vec<String> {
        nodes.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_has_cycle() {
        assert_eq!(has_cycle(&links(&[])), None);
        assert_eq!(has_cycle(&links(&[("a", "b")])), None);
        assert_eq!(has_cycle(&links(&[("a", "a")])), Some(strings(&["a", "a"])));
        assert_eq!(has_cycle(&links(&[("a", "b"), ("b", "c")])), None);

        let two = has_cycle(&links(&[("a", "b"), ("b", "a")])).unwrap();
        assert!(two == strings(&["a", "b", "a"]) || two == strings(&["b", "a", "b"]));

        let tail = has_cycle(&links(&[("a", "b"), ("b", "b")])).unwrap();
        assert_eq!(tail, strings(&["b", "b"]));
    }

    #[test]
    fn test_has_cycle_shared_tail_is_not_a_cycle() {
        // Several chains converging on the same target.
        let converging = links(&[("a", "c"), ("b", "c"), ("c", "d"), ("e", "a")]);
        assert_eq!(has_cycle(&converging), None);
    }

    #[test]
    fn test_has_cycle_long_loop() {
        let looped = links(&[("x", "a"), ("a", "b"), ("b", "c"), ("c", "a")]);
        let cycle = has_cycle(&looped).unwrap();
        assert_eq!(cycle.len(), 4);
        assert_eq!(cycle.first(), cycle.last());
        assert!(!cycle.contains(&"x".to_string()));
    }
}
