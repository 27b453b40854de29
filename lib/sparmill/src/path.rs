//! Property-path matching.
//!
//! A path evaluates against the default graph to a set of `(start, end)`
//! term pairs; the engine then restricts the pairs by the pattern's ground
//! ends and binds its variable ends.

use crate::dataset::{default_graph_nodes, GraphSelector, PatternSource};
use crate::error::QueryEvaluationError;
use crate::table::BindingTable;
use oxrdf::Term;
use rustc_hash::FxHashSet;
use sparbuild::{PathPattern, PropertyPath, TermPattern};

type PairSet = FxHashSet<(Term, Term)>;

/// All `(start, end)` pairs related by `path` in the default graph.
pub(crate) fn eval_path(
    path: &PropertyPath,
    dataset: &dyn PatternSource,
) -> Result<PairSet, QueryEvaluationError> {
    Ok(match path {
        PropertyPath::Predicate(p) => dataset
            .quads_for_pattern(None, Some(p), None, GraphSelector::Default)
            .map(|quad| quad.map(|quad| (Term::from(quad.subject), quad.object)))
            .collect::<Result<_, _>>()?,
        PropertyPath::Reverse(inner) => eval_path(inner, dataset)?
            .into_iter()
            .map(|(start, end)| (end, start))
            .collect(),
        PropertyPath::Sequence(a, b) => {
            let left = eval_path(a, dataset)?;
            let right = eval_path(b, dataset)?;
            compose(&left, &right)
        }
        PropertyPath::Alternative(a, b) => {
            let mut pairs = eval_path(a, dataset)?;
            pairs.extend(eval_path(b, dataset)?);
            pairs
        }
        PropertyPath::ZeroOrOne(inner) => {
            let mut pairs = eval_path(inner, dataset)?;
            pairs.extend(identity_pairs(dataset)?);
            pairs
        }
        PropertyPath::ZeroOrMore(inner) => {
            let mut pairs = transitive_closure(eval_path(inner, dataset)?);
            pairs.extend(identity_pairs(dataset)?);
            pairs
        }
        PropertyPath::OneOrMore(inner) => transitive_closure(eval_path(inner, dataset)?),
    })
}

/// Joins two pair sets on the middle term.
fn compose(left: &PairSet, right: &PairSet) -> PairSet {
    let mut by_start: rustc_hash::FxHashMap<&Term, Vec<&Term>> = rustc_hash::FxHashMap::default();
    for (start, end) in right {
        by_start.entry(start).or_default().push(end);
    }
    let mut result = PairSet::default();
    for (start, middle) in left {
        if let Some(ends) = by_start.get(middle) {
            for &end in ends {
                result.insert((start.clone(), end.clone()));
            }
        }
    }
    result
}

/// The zero-length step: every subject or object of the default graph
/// related to itself.
fn identity_pairs(dataset: &dyn PatternSource) -> Result<PairSet, QueryEvaluationError> {
    Ok(default_graph_nodes(dataset)?
        .into_iter()
        .map(|node| (node.clone(), node))
        .collect())
}

/// Fixpoint closure: keeps composing with one more step until no new pair
/// appears. Cycles terminate because pairs are deduplicated by `(start, end)`.
fn transitive_closure(base: PairSet) -> PairSet {
    let mut closure = base.clone();
    loop {
        let extended = compose(&closure, &base);
        let before = closure.len();
        closure.extend(extended);
        if closure.len() == before {
            return closure;
        }
    }
}

/// Evaluates a path pattern to a binding table over its variable ends.
pub(crate) fn eval_path_pattern(
    pattern: &PathPattern,
    dataset: &dyn PatternSource,
) -> Result<BindingTable, QueryEvaluationError> {
    let pairs = eval_path(&pattern.path, dataset)?;
    let mut variables = Vec::new();
    if let TermPattern::Variable(s) = &pattern.subject {
        variables.push(s.clone());
    }
    if let TermPattern::Variable(o) = &pattern.object {
        if !variables.contains(o) {
            variables.push(o.clone());
        }
    }
    let mut table = BindingTable::with_variables(variables);
    for (start, end) in pairs {
        let mut row = Vec::with_capacity(table.variables().len());
        match &pattern.subject {
            TermPattern::Variable(_) => row.push(Some(start)),
            slot => {
                if slot.as_ground().as_ref() != Some(&start) {
                    continue;
                }
            }
        }
        match &pattern.object {
            TermPattern::Variable(o) => {
                if let TermPattern::Variable(s) = &pattern.subject {
                    if s == o {
                        // Same variable on both ends: only cycles match.
                        if row[0].as_ref() != Some(&end) {
                            continue;
                        }
                    } else {
                        row.push(Some(end));
                    }
                } else {
                    row.push(Some(end));
                }
            }
            slot => {
                if slot.as_ground().as_ref() != Some(&end) {
                    continue;
                }
            }
        }
        table.push_row(row);
    }
    // A ground-to-ground path leaves no columns: the table is the unit row
    // when the pair exists and empty otherwise, a plain existence test.
    Ok(table)
}
