//! Tabular bindings and the compatibility joins over them.
//!
//! A table is an ordered sequence of rows over an insertion-ordered column
//! set of variables. A cell is either a bound term or the unbound marker.
//! Two rows are *compatible* when every variable bound in both carries the
//! same term; merging compatible rows unions their columns with bound cells
//! winning over unbound ones.

use oxrdf::{Term, Variable};
use rustc_hash::{FxHashMap, FxHashSet};
use std::cmp::Ordering;

/// An ordered sequence of binding rows over an insertion-ordered variable set.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct BindingTable {
    variables: Vec<Variable>,
    rows: Vec<Vec<Option<Term>>>,
}

impl BindingTable {
    /// The empty table: no columns, no rows.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// The join identity: no columns and a single all-unbound row.
    pub fn unit() -> Self {
        Self {
            variables: Vec::new(),
            rows: vec![Vec::new()],
        }
    }

    /// An empty table with the given column set.
    pub fn with_variables(variables: impl IntoIterator<Item = Variable>) -> Self {
        let mut table = Self::new();
        for variable in variables {
            table.ensure_column(&variable);
        }
        table
    }

    #[inline]
    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    #[inline]
    pub fn rows(&self) -> &[Vec<Option<Term>>] {
        &self.rows
    }

    #[inline]
    pub fn into_rows(self) -> Vec<Vec<Option<Term>>> {
        self.rows
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, variable: &Variable) -> Option<usize> {
        self.variables.iter().position(|v| v == variable)
    }

    /// Index of `variable`, appending a new all-unbound column if absent.
    pub fn ensure_column(&mut self, variable: &Variable) -> usize {
        if let Some(i) = self.column_index(variable) {
            return i;
        }
        self.variables.push(variable.clone());
        for row in &mut self.rows {
            row.push(None);
        }
        self.variables.len() - 1
    }

    /// Appends a row given in this table's column order.
    ///
    /// Panics if the row width does not match the column set.
    pub fn push_row(&mut self, row: Vec<Option<Term>>) {
        assert_eq!(row.len(), self.variables.len(), "row width mismatch");
        self.rows.push(row);
    }

    /// Appends a row given as variable/term pairs; unmentioned columns stay
    /// unbound, new variables extend the column set.
    pub fn push_bindings(&mut self, bindings: impl IntoIterator<Item = (Variable, Term)>) {
        let mut row = vec![None; self.variables.len()];
        for (variable, term) in bindings {
            let i = self.ensure_column(&variable);
            if i == row.len() {
                row.push(Some(term));
            } else {
                row[i] = Some(term);
            }
        }
        self.rows.push(row);
    }

    pub fn value<'a>(&'a self, row: &'a [Option<Term>], variable: &Variable) -> Option<&'a Term> {
        self.column_index(variable)
            .and_then(|i| row.get(i))
            .and_then(Option::as_ref)
    }

    fn shared_columns(&self, other: &Self) -> Vec<(usize, usize)> {
        self.variables
            .iter()
            .enumerate()
            .filter_map(|(i, v)| Some((i, other.column_index(v)?)))
            .collect()
    }

    fn compatible(left: &[Option<Term>], right: &[Option<Term>], shared: &[(usize, usize)]) -> bool {
        shared.iter().all(|&(l, r)| match (&left[l], &right[r]) {
            (Some(a), Some(b)) => a == b,
            _ => true,
        })
    }

    /// Merges a compatible row pair into the join's column space:
    /// left columns first, then the right-only columns.
    fn merge(
        left: &[Option<Term>],
        right: &[Option<Term>],
        shared: &[(usize, usize)],
        right_extra: &[usize],
    ) -> Vec<Option<Term>> {
        let mut row = left.to_vec();
        for &(l, r) in shared {
            if row[l].is_none() {
                row[l].clone_from(&right[r]);
            }
        }
        for &r in right_extra {
            row.push(right[r].clone());
        }
        row
    }

    /// Groups the right rows by their bound values on the shared columns.
    /// Rows with an unbound shared cell are compatible with more than one
    /// key and go to the returned scan list instead.
    fn index_rows<'a>(
        rows: &'a [Vec<Option<Term>>],
        columns: impl Fn(&'a Vec<Option<Term>>) -> Option<Vec<&'a Term>>,
    ) -> (FxHashMap<Vec<&'a Term>, Vec<usize>>, Vec<usize>) {
        let mut index: FxHashMap<Vec<&'a Term>, Vec<usize>> = FxHashMap::default();
        let mut scan = Vec::new();
        for (i, row) in rows.iter().enumerate() {
            match columns(row) {
                Some(key) => index.entry(key).or_default().push(i),
                None => scan.push(i),
            }
        }
        (index, scan)
    }

    fn join_inner(
        &self,
        other: &Self,
        mut on_unmatched_left: impl FnMut(&mut Self, &[Option<Term>], &[usize]),
    ) -> Self {
        let shared = self.shared_columns(other);
        let right_extra = (0..other.variables.len())
            .filter(|r| !shared.iter().any(|&(_, sr)| sr == *r))
            .collect::<Vec<_>>();
        let mut result = Self {
            variables: self
                .variables
                .iter()
                .chain(right_extra.iter().map(|&r| &other.variables[r]))
                .cloned()
                .collect(),
            rows: Vec::new(),
        };
        if shared.is_empty() {
            // Disjoint columns: plain cross product.
            for left in &self.rows {
                if other.rows.is_empty() {
                    on_unmatched_left(&mut result, left, &right_extra);
                }
                for right in &other.rows {
                    result
                        .rows
                        .push(Self::merge(left, right, &shared, &right_extra));
                }
            }
            return result;
        }
        let (index, scan) = Self::index_rows(&other.rows, |row| {
            shared.iter().map(|&(_, r)| row[r].as_ref()).collect()
        });
        for left in &self.rows {
            let mut matched = false;
            let key = shared
                .iter()
                .map(|&(l, _)| left[l].as_ref())
                .collect::<Option<Vec<_>>>();
            let bucket = key.as_ref().and_then(|k| index.get(k));
            if let Some(bucket) = bucket {
                for &r in bucket {
                    result
                        .rows
                        .push(Self::merge(left, &other.rows[r], &shared, &right_extra));
                    matched = true;
                }
            } else if key.is_none() {
                // A left row with unbound shared cells can match any bucket.
                for (_, bucket) in index.iter() {
                    for &r in bucket {
                        if Self::compatible(left, &other.rows[r], &shared) {
                            result.rows.push(Self::merge(
                                left,
                                &other.rows[r],
                                &shared,
                                &right_extra,
                            ));
                            matched = true;
                        }
                    }
                }
            }
            for &r in &scan {
                if Self::compatible(left, &other.rows[r], &shared) {
                    result
                        .rows
                        .push(Self::merge(left, &other.rows[r], &shared, &right_extra));
                    matched = true;
                }
            }
            if !matched {
                on_unmatched_left(&mut result, left, &right_extra);
            }
        }
        result
    }

    /// Inner compatibility join.
    pub fn join(&self, other: &Self) -> Self {
        self.join_inner(other, |_, _, _| ())
    }

    /// Left compatibility join: left rows without a compatible partner are
    /// kept, extended with unbound cells for the right-only columns.
    pub fn left_join(&self, other: &Self) -> Self {
        self.join_inner(other, |result, left, right_extra| {
            let mut row = left.to_vec();
            row.extend(right_extra.iter().map(|_| None));
            result.rows.push(row);
        })
    }

    /// MINUS: keeps the left rows that have no compatible right row sharing
    /// at least one bound variable.
    pub fn minus(&self, other: &Self) -> Self {
        let shared = self.shared_columns(other);
        let mut result = Self {
            variables: self.variables.clone(),
            rows: Vec::new(),
        };
        if shared.is_empty() {
            result.rows = self.rows.clone();
            return result;
        }
        for left in &self.rows {
            let excluded = other.rows.iter().any(|right| {
                Self::compatible(left, right, &shared)
                    && shared
                        .iter()
                        .any(|&(l, r)| left[l].is_some() && right[r].is_some())
            });
            if !excluded {
                result.rows.push(left.clone());
            }
        }
        result
    }

    /// Column-union row-concatenation; cells of missing columns are unbound.
    pub fn union(&self, other: &Self) -> Self {
        let mut result = self.clone();
        let mapping = other
            .variables
            .iter()
            .map(|v| result.ensure_column(v))
            .collect::<Vec<_>>();
        for row in &other.rows {
            let mut merged = vec![None; result.variables.len()];
            for (cell, &target) in row.iter().zip(&mapping) {
                merged[target].clone_from(cell);
            }
            result.rows.push(merged);
        }
        result
    }

    /// Keeps the rows accepted by `keep`, preserving their order.
    pub fn retain_rows(&mut self, mut keep: impl FnMut(&[Option<Term>]) -> bool) {
        self.rows.retain(|row| keep(row));
    }

    /// Overwrites one column with per-row values.
    ///
    /// Panics if `values` does not have one cell per row.
    pub fn set_column(&mut self, column: usize, values: Vec<Option<Term>>) {
        assert_eq!(values.len(), self.rows.len(), "column height mismatch");
        for (row, value) in self.rows.iter_mut().zip(values) {
            row[column] = value;
        }
    }

    /// Keeps the first occurrence of every distinct row.
    pub fn distinct(&mut self) {
        let mut seen = FxHashSet::default();
        self.rows.retain(|row| seen.insert(row.clone()));
    }

    /// Keeps the row window `[offset, offset + limit)`.
    pub fn slice(&mut self, offset: Option<usize>, limit: Option<usize>) {
        if let Some(offset) = offset {
            if offset >= self.rows.len() {
                self.rows.clear();
            } else {
                self.rows.drain(..offset);
            }
        }
        if let Some(limit) = limit {
            self.rows.truncate(limit);
        }
    }

    /// Stable-sorts the rows by the given column comparators, most
    /// significant first.
    pub fn sort_by(
        &mut self,
        comparators: &[(usize, bool)],
        cmp: impl Fn(Option<&Term>, Option<&Term>) -> Ordering,
    ) {
        self.rows.sort_by(|a, b| {
            for &(column, ascending) in comparators {
                let ordering = cmp(a[column].as_ref(), b[column].as_ref());
                let ordering = if ascending {
                    ordering
                } else {
                    ordering.reverse()
                };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            Ordering::Equal
        });
    }

    /// Projects onto `variables`, in that order. Missing columns become
    /// all-unbound.
    pub fn project(&self, variables: &[Variable]) -> Self {
        let indexes = variables
            .iter()
            .map(|v| self.column_index(v))
            .collect::<Vec<_>>();
        Self {
            variables: variables.to_vec(),
            rows: self
                .rows
                .iter()
                .map(|row| {
                    indexes
                        .iter()
                        .map(|i| i.and_then(|i| row[i].clone()))
                        .collect()
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxrdf::{Literal, NamedNode};

    fn var(name: &str) -> Variable {
        Variable::new_unchecked(name)
    }

    fn iri(suffix: &str) -> Term {
        NamedNode::new_unchecked(format!("http://example.com/{suffix}")).into()
    }

    fn table(variables: &[&str], rows: &[&[Option<Term>]]) -> BindingTable {
        let mut table = BindingTable::with_variables(variables.iter().map(|v| var(v)));
        for row in rows {
            table.push_row(row.to_vec());
        }
        table
    }

    fn sorted_rows(table: &BindingTable) -> Vec<Vec<Option<String>>> {
        let mut rows = table
            .rows()
            .iter()
            .map(|row| {
                row.iter()
                    .map(|cell| cell.as_ref().map(ToString::to_string))
                    .collect::<Vec<_>>()
            })
            .collect::<Vec<_>>();
        rows.sort();
        rows
    }

    #[test]
    fn join_merges_on_shared_bound_columns() {
        let left = table(
            &["x", "y"],
            &[
                &[Some(iri("a")), Some(iri("b"))],
                &[Some(iri("c")), Some(iri("d"))],
            ],
        );
        let right = table(
            &["y", "z"],
            &[
                &[Some(iri("b")), Some(iri("e"))],
                &[Some(iri("x")), Some(iri("f"))],
            ],
        );
        let joined = left.join(&right);
        assert_eq!(joined.variables(), &[var("x"), var("y"), var("z")]);
        assert_eq!(joined.len(), 1);
        assert_eq!(
            joined.rows()[0],
            vec![Some(iri("a")), Some(iri("b")), Some(iri("e"))]
        );
    }

    #[test]
    fn join_treats_unbound_shared_cells_as_wildcards() {
        let left = table(&["x", "y"], &[&[Some(iri("a")), None]]);
        let right = table(
            &["y"],
            &[&[Some(iri("b"))], &[Some(iri("c"))]],
        );
        let joined = left.join(&right);
        // The unbound ?y matches both right rows and gets filled in.
        assert_eq!(joined.len(), 2);
        assert!(joined.rows().iter().all(|row| row[1].is_some()));
    }

    #[test]
    fn join_with_disjoint_columns_is_a_cross_product() {
        let left = table(&["x"], &[&[Some(iri("a"))], &[Some(iri("b"))]]);
        let right = table(&["y"], &[&[Some(iri("c"))], &[Some(iri("d"))]]);
        assert_eq!(left.join(&right).len(), 4);
    }

    #[test]
    fn join_is_associative_on_row_sets() {
        let a = table(
            &["x", "y"],
            &[
                &[Some(iri("1")), Some(iri("2"))],
                &[Some(iri("3")), Some(iri("4"))],
            ],
        );
        let b = table(
            &["y", "z"],
            &[
                &[Some(iri("2")), Some(iri("5"))],
                &[Some(iri("4")), Some(iri("6"))],
                &[Some(iri("4")), Some(iri("7"))],
            ],
        );
        let c = table(
            &["z", "w"],
            &[
                &[Some(iri("5")), Some(iri("8"))],
                &[Some(iri("7")), Some(iri("9"))],
            ],
        );
        let left_first = a.join(&b).join(&c);
        let right_first = a.join(&b.join(&c));
        assert_eq!(sorted_rows(&left_first), sorted_rows(&right_first));
    }

    #[test]
    fn left_join_preserves_every_left_row() {
        let left = table(
            &["x"],
            &[&[Some(iri("a"))], &[Some(iri("b"))], &[Some(iri("c"))]],
        );
        let right = table(
            &["x", "y"],
            &[&[Some(iri("a")), Some(iri("l"))]],
        );
        let joined = left.left_join(&right);
        assert_eq!(joined.len(), 3);
        for original in left.rows() {
            assert!(
                joined.rows().iter().any(|row| row[0] == original[0]),
                "left row lost by left join"
            );
        }
        // Unmatched rows carry the unbound marker in the right-only column.
        assert_eq!(
            joined
                .rows()
                .iter()
                .filter(|row| row[1].is_none())
                .count(),
            2
        );
    }

    #[test]
    fn minus_needs_a_shared_bound_variable() {
        let left = table(
            &["x", "v"],
            &[
                &[Some(iri("a")), Some(Literal::from(1).into())],
                &[Some(iri("b")), Some(Literal::from(2).into())],
            ],
        );
        let right = table(
            &["x", "v"],
            &[&[Some(iri("b")), Some(Literal::from(2).into())]],
        );
        let result = left.minus(&right);
        assert_eq!(result.len(), 1);
        assert_eq!(result.rows()[0][0], Some(iri("a")));

        // Disjoint-domain MINUS removes nothing.
        let disjoint = table(&["w"], &[&[Some(iri("b"))]]);
        assert_eq!(left.minus(&disjoint).len(), 2);
    }

    #[test]
    fn minus_is_anti_monotone() {
        let left = table(
            &["x"],
            &[&[Some(iri("a"))], &[Some(iri("b"))], &[Some(iri("c"))]],
        );
        let big = table(&["x"], &[&[Some(iri("a"))], &[Some(iri("b"))]]);
        let small = table(&["x"], &[&[Some(iri("a"))]]);
        let with_big = left.minus(&big);
        let with_small = left.minus(&small);
        assert!(with_big.len() <= left.len());
        assert!(with_small.len() >= with_big.len());
    }

    #[test]
    fn union_pads_missing_columns_with_unbound() {
        let left = table(&["x"], &[&[Some(iri("a"))]]);
        let right = table(&["y"], &[&[Some(iri("b"))]]);
        let unioned = left.union(&right);
        assert_eq!(unioned.variables(), &[var("x"), var("y")]);
        assert_eq!(
            unioned.rows(),
            &[
                vec![Some(iri("a")), None],
                vec![None, Some(iri("b"))],
            ]
        );
    }

    #[test]
    fn distinct_is_idempotent() {
        let mut table = table(
            &["x"],
            &[&[Some(iri("a"))], &[Some(iri("a"))], &[Some(iri("b"))]],
        );
        table.distinct();
        assert_eq!(table.len(), 2);
        let after_once = table.clone();
        table.distinct();
        assert_eq!(table, after_once);
    }

    #[test]
    fn slice_composes_offset_then_limit() {
        let rows = (0..10)
            .map(|i| vec![Some(Term::from(Literal::from(i)))])
            .collect::<Vec<_>>();
        let mut table = BindingTable::with_variables([var("i")]);
        for row in rows {
            table.push_row(row);
        }
        table.slice(Some(3), Some(4));
        assert_eq!(
            table
                .rows()
                .iter()
                .map(|row| row[0].clone().unwrap())
                .collect::<Vec<_>>(),
            (3..7)
                .map(|i| Term::from(Literal::from(i)))
                .collect::<Vec<_>>()
        );
        // Off-the-end offsets empty the table instead of panicking.
        let mut empty = BindingTable::with_variables([var("i")]);
        empty.push_row(vec![None]);
        empty.slice(Some(5), None);
        assert!(empty.is_empty());
    }

    #[test]
    fn project_reorders_and_drops_columns() {
        let table = table(
            &["x", "y"],
            &[&[Some(iri("a")), Some(iri("b"))]],
        );
        let projected = table.project(&[var("y"), var("z")]);
        assert_eq!(projected.variables(), &[var("y"), var("z")]);
        assert_eq!(projected.rows()[0], vec![Some(iri("b")), None]);
    }

    #[test]
    fn unit_is_the_join_identity() {
        let table = table(&["x"], &[&[Some(iri("a"))]]);
        assert_eq!(BindingTable::unit().join(&table).rows(), table.rows());
        assert_eq!(table.join(&BindingTable::unit()).rows(), table.rows());
    }
}
