//! Behavior linearization.
//!
//! Orders a definition's composed behaviors so that every behavior's own
//! transitive dependencies come before it, stable with respect to the
//! current order otherwise. A true dependency cycle fails fast with
//! `UnresolvableDependency` instead of looping.

use smallvec::SmallVec;
use std::collections::HashSet;

use crate::error::{Error, Result};

use super::definition::{TraitDefinition, TraitId};

/// Transitive dependency set of `id`, depth-first with a visited set so
/// cyclic behavior graphs terminate.
fn transitive_deps(defs: &[TraitDefinition], id: TraitId) -> HashSet<TraitId> {
    let mut seen = HashSet::new();
    let mut stack: Vec<TraitId> = defs[id.0].behaves.to_vec();
    while let Some(cur) = stack.pop() {
        if seen.insert(cur) {
            stack.extend(defs[cur.0].behaves.iter().copied());
        }
    }
    seen
}

/// Reorder `list` so dependencies precede dependents.
///
/// `target_name` only feeds the error report.
pub(crate) fn linearize(
    defs: &[TraitDefinition],
    target_name: &str,
    list: &[TraitId],
) -> Result<SmallVec<[TraitId; 4]>> {
    let deps: Vec<HashSet<TraitId>> = list
        .iter()
        .map(|&id| transitive_deps(defs, id))
        .collect();

    // Pairwise cycle check first: mutual dependency can never be ordered.
    for (i, &a) in list.iter().enumerate() {
        for (j, &b) in list.iter().enumerate().skip(i + 1) {
            if deps[i].contains(&b) && deps[j].contains(&a) {
                return Err(Error::UnresolvableDependency {
                    target: target_name.to_string(),
                    through: defs[b.0].full_name.clone(),
                });
            }
        }
    }

    // Stable topological order: repeatedly take the first remaining entry
    // whose dependencies are all placed or absent from the list.
    let mut remaining: Vec<(TraitId, HashSet<TraitId>)> =
        list.iter().copied().zip(deps).collect();
    let mut placed: HashSet<TraitId> = HashSet::new();
    let mut out = SmallVec::new();

    while !remaining.is_empty() {
        let pos = remaining.iter().position(|(id, d)| {
            remaining
                .iter()
                .all(|(other, _)| other == id || !d.contains(other) || placed.contains(other))
        });
        match pos {
            Some(pos) => {
                let (id, _) = remaining.remove(pos);
                placed.insert(id);
                out.push(id);
            }
            None => {
                // Unreachable after the pairwise check; hard stop rather
                // than spinning on an unorderable list.
                let (id, _) = &remaining[0];
                return Err(Error::UnresolvableDependency {
                    target: target_name.to_string(),
                    through: defs[id.0].full_name.clone(),
                });
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::definition::TraitDefinition;

    fn def(name: &str, behaves: &[usize]) -> TraitDefinition {
        let mut d = TraitDefinition::new(name.to_string());
        d.behaves = behaves.iter().map(|&i| TraitId(i)).collect();
        d
    }

    #[test]
    fn test_dependency_precedes_dependent() {
        // b depends on a; list arrives dependent-first.
        let defs = vec![def("a", &[]), def("b", &[0])];
        let order = linearize(&defs, "t", &[TraitId(1), TraitId(0)]).unwrap();
        assert_eq!(order.as_slice(), &[TraitId(0), TraitId(1)]);
    }

    #[test]
    fn test_stable_when_unconstrained() {
        let defs = vec![def("a", &[]), def("b", &[]), def("c", &[])];
        let order = linearize(&defs, "t", &[TraitId(2), TraitId(0), TraitId(1)]).unwrap();
        assert_eq!(order.as_slice(), &[TraitId(2), TraitId(0), TraitId(1)]);
    }

    #[test]
    fn test_transitive_ordering() {
        // c -> b -> a, list arrives reversed.
        let defs = vec![def("a", &[]), def("b", &[0]), def("c", &[1])];
        let order =
            linearize(&defs, "t", &[TraitId(2), TraitId(1), TraitId(0)]).unwrap();
        assert_eq!(order.as_slice(), &[TraitId(0), TraitId(1), TraitId(2)]);
    }

    #[test]
    fn test_cycle_fails() {
        // x -> y -> z -> x
        let defs = vec![def("x", &[1]), def("y", &[2]), def("z", &[0])];
        let err = linearize(&defs, "t", &[TraitId(0), TraitId(1), TraitId(2)])
            .unwrap_err();
        assert!(matches!(err, Error::UnresolvableDependency { .. }));
    }
}
