//! GROUP BY execution state: a partition-keyed registry of running
//! accumulators, created fresh for every query execution and discarded at
//! finalisation.
//!
//! Partition keys are structured (the tuple of grouping-variable values), so
//! no reserved separator can ever collide with data.

use crate::expression::{cmp_terms, numeric_value};
use oxrdf::{Literal, Term, Variable};
use rustc_hash::{FxHashMap, FxHashSet};
use sparbuild::{AggregateExpression, AggregateFunction};
use std::cmp::Ordering;

/// The values of the grouping variables for one row.
pub(crate) type PartitionKey = Vec<Option<Term>>;

/// Per-query aggregation scratchpad.
///
/// Rows are fed in through [`update`](Self::update) (the partition phase);
/// [`finish`](Self::finish) emits one row per partition in first-seen order
/// (the projection phase).
pub(crate) struct AggregatorContext {
    templates: Vec<AggregateExpression>,
    registry: FxHashMap<PartitionKey, Vec<Accumulator>>,
    order: Vec<PartitionKey>,
}

impl AggregatorContext {
    pub fn new(aggregates: &[(Variable, AggregateExpression)]) -> Self {
        Self {
            templates: aggregates.iter().map(|(_, a)| a.clone()).collect(),
            registry: FxHashMap::default(),
            order: Vec::new(),
        }
    }

    /// Makes sure `key` has a partition even if no row feeds it. Grouping
    /// without grouping variables aggregates the whole (possibly empty)
    /// table into the single unit partition.
    pub fn ensure_partition(&mut self, key: PartitionKey) {
        if !self.registry.contains_key(&key) {
            self.order.push(key.clone());
            let accumulators = self
                .templates
                .iter()
                .map(Accumulator::for_aggregate)
                .collect();
            self.registry.insert(key, accumulators);
        }
    }

    /// Feeds one row into its partition. `values` holds the evaluated
    /// aggregate argument for each aggregate, in declaration order; the
    /// whole `row` backs `COUNT(*)` and its DISTINCT variant.
    pub fn update(&mut self, key: PartitionKey, row: &[Option<Term>], values: &[Option<Term>]) {
        self.ensure_partition(key.clone());
        let accumulators = self
            .registry
            .get_mut(&key)
            .unwrap_or_else(|| unreachable!("partition was just ensured"));
        for (accumulator, value) in accumulators.iter_mut().zip(values) {
            accumulator.add(row, value.as_ref());
        }
    }

    /// Emits the aggregate output row of every partition, in the order the
    /// partitions were first seen.
    pub fn finish(mut self) -> impl Iterator<Item = (PartitionKey, Vec<Option<Term>>)> {
        self.order.into_iter().map(move |key| {
            let accumulators = self
                .registry
                .remove(&key)
                .unwrap_or_else(|| unreachable!("every ordered key has a partition"));
            let values = accumulators
                .into_iter()
                .map(Accumulator::finish)
                .collect::<Vec<_>>();
            (key, values)
        })
    }
}

enum Accumulator {
    CountSolutions {
        count: i64,
        seen: Option<FxHashSet<Vec<Option<Term>>>>,
    },
    Count {
        count: i64,
        seen: Option<FxHashSet<Term>>,
    },
    Sum {
        sum: f64,
        seen: Option<FxHashSet<Term>>,
    },
    Avg {
        sum: f64,
        count: i64,
        seen: Option<FxHashSet<Term>>,
    },
    Min {
        current: Option<Term>,
    },
    Max {
        current: Option<Term>,
    },
    Sample {
        value: Option<Term>,
    },
    GroupConcat {
        parts: Vec<String>,
        separator: String,
        seen: Option<FxHashSet<Term>>,
    },
}

impl Accumulator {
    fn for_aggregate(aggregate: &AggregateExpression) -> Self {
        fn cache<T: std::hash::Hash + Eq>(distinct: bool) -> Option<FxHashSet<T>> {
            distinct.then(FxHashSet::default)
        }
        match aggregate {
            AggregateExpression::CountSolutions { distinct } => Self::CountSolutions {
                count: 0,
                seen: cache(*distinct),
            },
            AggregateExpression::FunctionCall {
                function,
                distinct,
                ..
            } => match function {
                AggregateFunction::Count => Self::Count {
                    count: 0,
                    seen: cache(*distinct),
                },
                AggregateFunction::Sum => Self::Sum {
                    sum: 0.,
                    seen: cache(*distinct),
                },
                AggregateFunction::Avg => Self::Avg {
                    sum: 0.,
                    count: 0,
                    seen: cache(*distinct),
                },
                AggregateFunction::Min => Self::Min { current: None },
                AggregateFunction::Max => Self::Max { current: None },
                AggregateFunction::Sample => Self::Sample { value: None },
                AggregateFunction::GroupConcat { separator } => Self::GroupConcat {
                    parts: Vec::new(),
                    separator: separator.clone().unwrap_or_else(|| " ".into()),
                    seen: cache(*distinct),
                },
            },
        }
    }

    fn add(&mut self, row: &[Option<Term>], value: Option<&Term>) {
        match self {
            Self::CountSolutions { count, seen } => {
                if seen
                    .as_mut()
                    .is_none_or(|seen| seen.insert(row.to_vec()))
                {
                    *count += 1;
                }
            }
            Self::Count { count, seen } => {
                let Some(value) = value else { return };
                if seen
                    .as_mut()
                    .is_none_or(|seen| seen.insert(value.clone()))
                {
                    *count += 1;
                }
            }
            Self::Sum { sum, seen } => {
                let Some(value) = value else { return };
                if seen
                    .as_mut()
                    .is_some_and(|seen| !seen.insert(value.clone()))
                {
                    return;
                }
                match numeric_value(value) {
                    Some(v) => *sum += v.as_f64(),
                    // A single non-numeric poisons the whole partition.
                    None => *sum = f64::NAN,
                }
            }
            Self::Avg { sum, count, seen } => {
                let Some(value) = value else { return };
                if seen
                    .as_mut()
                    .is_some_and(|seen| !seen.insert(value.clone()))
                {
                    return;
                }
                match numeric_value(value) {
                    Some(v) => {
                        *sum += v.as_f64();
                        *count += 1;
                    }
                    None => *sum = f64::NAN,
                }
            }
            Self::Min { current } => {
                let Some(value) = value else { return };
                if current.as_ref().is_none_or(|current| {
                    cmp_terms(Some(value), Some(current)) == Ordering::Less
                }) {
                    *current = Some(value.clone());
                }
            }
            Self::Max { current } => {
                let Some(value) = value else { return };
                if current.as_ref().is_none_or(|current| {
                    cmp_terms(Some(value), Some(current)) == Ordering::Greater
                }) {
                    *current = Some(value.clone());
                }
            }
            Self::Sample { value: sample } => {
                // First bound value wins.
                if sample.is_none() {
                    if let Some(value) = value {
                        *sample = Some(value.clone());
                    }
                }
            }
            Self::GroupConcat { parts, seen, .. } => {
                let Some(value) = value else { return };
                if seen
                    .as_mut()
                    .is_some_and(|seen| !seen.insert(value.clone()))
                {
                    return;
                }
                parts.push(lexical_form(value));
            }
        }
    }

    fn finish(self) -> Option<Term> {
        match self {
            Self::CountSolutions { count, .. } | Self::Count { count, .. } => Some(
                Literal::new_typed_literal(count.to_string(), oxrdf::vocab::xsd::INTEGER).into(),
            ),
            Self::Sum { sum, .. } => Some(double_or_empty(sum)),
            Self::Avg { sum, count, .. } => {
                if count == 0 && !sum.is_nan() {
                    Some(Literal::from(0.).into())
                } else {
                    Some(double_or_empty(sum / count as f64))
                }
            }
            Self::Min { current } | Self::Max { current } => current,
            Self::Sample { value } => value,
            Self::GroupConcat {
                parts, separator, ..
            } => Some(Literal::new_simple_literal(parts.join(&separator)).into()),
        }
    }
}

/// A poisoned partition projects the empty string instead of NaN.
fn double_or_empty(value: f64) -> Term {
    if value.is_nan() {
        Literal::new_simple_literal("").into()
    } else {
        Literal::from(value).into()
    }
}

fn lexical_form(term: &Term) -> String {
    match term {
        Term::NamedNode(node) => node.as_str().to_owned(),
        Term::BlankNode(node) => node.to_string(),
        Term::Literal(literal) => literal.value().to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxrdf::vocab::xsd;
    use oxrdf::NamedNode;

    fn int(value: i64) -> Term {
        Literal::new_typed_literal(value.to_string(), xsd::INTEGER).into()
    }

    fn agg(aggregate: AggregateExpression) -> Vec<(Variable, AggregateExpression)> {
        vec![(Variable::new_unchecked("a"), aggregate)]
    }

    fn run(
        aggregates: &[(Variable, AggregateExpression)],
        rows: &[(PartitionKey, Option<Term>)],
    ) -> Vec<(PartitionKey, Vec<Option<Term>>)> {
        let mut ctx = AggregatorContext::new(aggregates);
        for (key, value) in rows {
            ctx.update(key.clone(), std::slice::from_ref(value), &[value.clone()]);
        }
        ctx.finish().collect()
    }

    #[test]
    fn count_counts_bound_values_only() {
        let x = vec![Some(int(1))];
        let out = run(
            &agg(AggregateExpression::count(Variable::new_unchecked("v"))),
            &[(x.clone(), Some(int(1))), (x.clone(), None), (x.clone(), Some(int(2)))],
        );
        assert_eq!(out, vec![(x, vec![Some(int(2))])]);
    }

    #[test]
    fn count_distinct_uses_the_distinct_cache() {
        let x = vec![];
        let out = run(
            &agg(AggregateExpression::count(Variable::new_unchecked("v")).distinct()),
            &[
                (x.clone(), Some(int(1))),
                (x.clone(), Some(int(1))),
                (x.clone(), Some(int(2))),
            ],
        );
        assert_eq!(out[0].1, vec![Some(int(2))]);
    }

    #[test]
    fn sum_projects_a_double_and_poisons_on_non_numerics() {
        let x = vec![];
        let out = run(
            &agg(AggregateExpression::sum(Variable::new_unchecked("v"))),
            &[(x.clone(), Some(int(1))), (x.clone(), Some(int(5)))],
        );
        assert_eq!(out[0].1, vec![Some(Literal::from(6.).into())]);

        let poisoned = run(
            &agg(AggregateExpression::sum(Variable::new_unchecked("v"))),
            &[
                (x.clone(), Some(int(1))),
                (x, Some(Literal::from("nope").into())),
            ],
        );
        assert_eq!(
            poisoned[0].1,
            vec![Some(Literal::new_simple_literal("").into())]
        );
    }

    #[test]
    fn avg_divides_sum_by_count() {
        let x = vec![];
        let out = run(
            &agg(AggregateExpression::avg(Variable::new_unchecked("v"))),
            &[(x.clone(), Some(int(1))), (x, Some(int(3)))],
        );
        assert_eq!(out[0].1, vec![Some(Literal::from(2.).into())]);
    }

    #[test]
    fn min_and_max_follow_expression_comparison_with_lexical_fallback() {
        let x = vec![];
        // Numeric comparison, not lexical: 2 < 10.
        let out = run(
            &agg(AggregateExpression::min(Variable::new_unchecked("v"))),
            &[(x.clone(), Some(int(10))), (x.clone(), Some(int(2)))],
        );
        assert_eq!(out[0].1, vec![Some(int(2))]);
        // Mixed types stay comparable through the total term order.
        let iri: Term = NamedNode::new_unchecked("http://example.com/a").into();
        let out = run(
            &agg(AggregateExpression::max(Variable::new_unchecked("v"))),
            &[(x.clone(), Some(iri.clone())), (x, Some(int(1)))],
        );
        assert_eq!(out[0].1, vec![Some(int(1))]);
    }

    #[test]
    fn sample_keeps_the_first_bound_value() {
        let x = vec![];
        let out = run(
            &agg(AggregateExpression::sample(Variable::new_unchecked("v"))),
            &[(x.clone(), None), (x.clone(), Some(int(7))), (x, Some(int(9)))],
        );
        assert_eq!(out[0].1, vec![Some(int(7))]);
    }

    #[test]
    fn group_concat_joins_with_the_separator() {
        let x = vec![];
        let out = run(
            &agg(AggregateExpression::group_concat(
                Variable::new_unchecked("v"),
                Some(", ".into()),
            )),
            &[
                (x.clone(), Some(Literal::from("a").into())),
                (x, Some(Literal::from("b").into())),
            ],
        );
        assert_eq!(
            out[0].1,
            vec![Some(Literal::new_simple_literal("a, b").into())]
        );
    }

    #[test]
    fn aggregate_results_are_row_order_invariant() {
        let rows = [
            (vec![], Some(int(3))),
            (vec![], Some(int(1))),
            (vec![], Some(int(2))),
        ];
        let mut reversed = rows.clone();
        reversed.reverse();
        for aggregate in [
            AggregateExpression::count(Variable::new_unchecked("v")),
            AggregateExpression::sum(Variable::new_unchecked("v")),
            AggregateExpression::avg(Variable::new_unchecked("v")),
            AggregateExpression::min(Variable::new_unchecked("v")),
            AggregateExpression::max(Variable::new_unchecked("v")),
        ] {
            assert_eq!(
                run(&agg(aggregate.clone()), &rows),
                run(&agg(aggregate), &reversed)
            );
        }
    }

    #[test]
    fn partitions_project_in_first_seen_order() {
        let a = vec![Some(int(1))];
        let b = vec![Some(int(2))];
        let out = run(
            &agg(AggregateExpression::count(Variable::new_unchecked("v"))),
            &[(a.clone(), Some(int(1))), (b.clone(), Some(int(1))), (a.clone(), Some(int(2)))],
        );
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].0, a);
        assert_eq!(out[1].0, b);
    }

    #[test]
    fn empty_input_with_the_unit_partition_still_projects() {
        let mut ctx = AggregatorContext::new(&agg(AggregateExpression::CountSolutions {
            distinct: false,
        }));
        ctx.ensure_partition(vec![]);
        let out = ctx.finish().collect::<Vec<_>>();
        assert_eq!(out, vec![(vec![], vec![Some(int(0))])]);
    }

}
