//! The evaluation pipeline: normalisation, per-group binding tables, group
//! combination, solution modifiers and result materialisation.

use crate::aggregate::AggregatorContext;
use crate::dataset::{describe_into_graph, GraphSelector, PatternSource};
use crate::error::{MalformedQueryError, QueryEvaluationError};
use crate::expression::{self, cmp_terms, Bindings, EvalContext};
use crate::model::QuerySolutions;
use crate::path::eval_path_pattern;
use crate::table::BindingTable;
use oxrdf::{BlankNode, Graph, NamedNode, Subject, Term, Triple, Variable};
use rustc_hash::FxHashMap;
use sparbuild::{
    AggregateExpression, DescribeTarget, Expression, GroupBy, GroupCombinator, GroupPattern,
    NamedNodePattern, OrderComparator, PathPattern, PatternGroup, PatternRole, QuadPattern, Query,
    QueryModifiers, TermPattern, TriplePattern,
};
use std::sync::Arc;
use tracing::{debug, trace};

/// One query execution against one dataset. Owns the per-query scratch
/// state (NOW() instant, regex cache, aggregation registries) and drops it
/// at materialisation.
pub(crate) struct Evaluator<'a> {
    dataset: &'a dyn PatternSource,
    ctx: EvalContext<'a>,
}

impl<'a> Evaluator<'a> {
    pub fn new(dataset: &'a dyn PatternSource) -> Self {
        Self {
            dataset,
            ctx: EvalContext::new(dataset),
        }
    }

    pub fn select(&self, query: &Query) -> Result<QuerySolutions, QueryEvaluationError> {
        let query = normalise(query)?;
        let (groups, modifiers) = match &query {
            Query::Select {
                groups, modifiers, ..
            } => (groups, modifiers),
            _ => unreachable!("select() is only called on SELECT queries"),
        };
        debug!(groups = groups.len(), "evaluating SELECT query");
        let table = self.apply_modifiers(self.combined_table(groups)?, modifiers)?;
        let variables: Arc<[Variable]> = table.variables().into();
        Ok(QuerySolutions::from_tuples(
            variables,
            table.into_rows(),
        ))
    }

    pub fn ask(&self, query: &Query) -> Result<bool, QueryEvaluationError> {
        let query = normalise(query)?;
        debug!(groups = query.groups().len(), "evaluating ASK query");
        Ok(!self.combined_table(query.groups())?.is_empty())
    }

    pub fn construct(&self, query: &Query) -> Result<Graph, QueryEvaluationError> {
        let query = normalise(query)?;
        let Query::Construct {
            groups,
            modifiers,
            template,
            ..
        } = &query
        else {
            unreachable!("construct() is only called on CONSTRUCT queries")
        };
        debug!(
            groups = groups.len(),
            template = template.len(),
            "evaluating CONSTRUCT query"
        );
        let table = self.apply_modifiers(self.combined_table(groups)?, modifiers)?;
        let mut graph = Graph::new();
        let variables = table.variables().to_vec();
        for row in table.rows() {
            let bindings = Bindings {
                variables: &variables,
                row,
            };
            instantiate_template(template, bindings, &mut graph);
        }
        Ok(graph)
    }

    pub fn describe(&self, query: &Query) -> Result<Graph, QueryEvaluationError> {
        let query = normalise(query)?;
        let Query::Describe {
            groups,
            modifiers,
            targets,
            ..
        } = &query
        else {
            unreachable!("describe() is only called on DESCRIBE queries")
        };
        debug!(
            groups = groups.len(),
            targets = targets.len(),
            "evaluating DESCRIBE query"
        );
        let table = self.apply_modifiers(self.combined_table(groups)?, modifiers)?;
        let mut terms = Vec::new();
        for target in targets {
            match target {
                DescribeTarget::Term(node) => terms.push(Term::from(node.clone())),
                DescribeTarget::Variable(variable) => {
                    if let Some(column) = table.column_index(variable) {
                        for row in table.rows() {
                            if let Some(term) = &row[column] {
                                terms.push(term.clone());
                            }
                        }
                    }
                }
            }
        }
        let mut graph = Graph::new();
        describe_into_graph(self.dataset, terms, &mut graph)?;
        Ok(graph)
    }

    /// Combines the group tables in declaration order, each group entering
    /// through its combinator flag.
    fn combined_table(
        &self,
        groups: &[PatternGroup],
    ) -> Result<BindingTable, QueryEvaluationError> {
        let mut result = BindingTable::unit();
        for (i, group) in groups.iter().enumerate() {
            let table = self.group_table(group)?;
            result = if i == 0 {
                table
            } else {
                match group.combinator {
                    GroupCombinator::Join => result.join(&table),
                    GroupCombinator::Optional => result.left_join(&table),
                    GroupCombinator::Union => result.union(&table),
                    GroupCombinator::Minus => result.minus(&table),
                }
            };
        }
        Ok(result)
    }

    /// Evaluates one pattern group to its binding table: patterns joined
    /// most-selective-first, then paths, inline values and sub-selects,
    /// optional patterns left-joined, filters last.
    fn group_table(&self, group: &PatternGroup) -> Result<BindingTable, QueryEvaluationError> {
        let mut required = Vec::new();
        let mut optionals = Vec::new();
        let mut alternatives: Vec<&QuadPattern> = Vec::new();
        for GroupPattern { pattern, role } in &group.patterns {
            alternatives.push(pattern);
            if *role == PatternRole::UnionWithNext {
                continue;
            }
            let ground = alternatives
                .iter()
                .map(|p| p.ground_slot_count())
                .max()
                .unwrap_or(0);
            let table = self.union_of_patterns(&alternatives)?;
            if *role == PatternRole::Optional {
                optionals.push(table);
            } else {
                required.push((ground, table));
            }
            alternatives.clear();
        }
        if !alternatives.is_empty() {
            // A trailing union flag has no next pattern; the run stands alone.
            let ground = alternatives
                .iter()
                .map(|p| p.ground_slot_count())
                .max()
                .unwrap_or(0);
            required.push((ground, self.union_of_patterns(&alternatives)?));
        }

        let mut result = self.join_most_selective_first(required);
        for path in &group.paths {
            result = result.join(&eval_path_pattern(path, self.dataset)?);
        }
        for values in &group.values {
            let mut table = BindingTable::with_variables(values.variables.iter().cloned());
            for row in &values.bindings {
                table.push_row(row.clone());
            }
            result = result.join(&table);
        }
        for subselect in &group.subselects {
            let solutions = self.select(subselect)?;
            let mut table = BindingTable::with_variables(solutions.variables().to_vec());
            for solution in &solutions {
                table.push_row(solution.values().to_vec());
            }
            result = result.join(&table);
        }
        for optional in optionals {
            result = result.left_join(&optional);
        }
        if !group.filters.is_empty() {
            let variables = result.variables().to_vec();
            result.retain_rows(|row| {
                group.filters.iter().all(|filter| {
                    expression::ebv(
                        filter,
                        Bindings {
                            variables: &variables,
                            row,
                        },
                        &self.ctx,
                    ) == Some(true)
                })
            });
        }
        trace!(rows = result.len(), "pattern group evaluated");
        Ok(result)
    }

    /// Joins pattern tables most ground slots first, breaking ties by
    /// variable overlap with the columns already bound.
    fn join_most_selective_first(
        &self,
        mut tables: Vec<(usize, BindingTable)>,
    ) -> BindingTable {
        let mut result = BindingTable::unit();
        while !tables.is_empty() {
            let next = tables
                .iter()
                .enumerate()
                .max_by_key(|(_, (ground, table))| {
                    let overlap = table
                        .variables()
                        .iter()
                        .filter(|v| result.column_index(v).is_some())
                        .count();
                    (*ground, overlap)
                })
                .map(|(i, _)| i)
                .unwrap_or(0);
            let (_, table) = tables.remove(next);
            result = result.join(&table);
        }
        result
    }

    fn union_of_patterns(
        &self,
        patterns: &[&QuadPattern],
    ) -> Result<BindingTable, QueryEvaluationError> {
        let mut result: Option<BindingTable> = None;
        for pattern in patterns {
            let table = self.match_pattern(pattern)?;
            result = Some(match result {
                None => table,
                Some(previous) => previous.union(&table),
            });
        }
        Ok(result.unwrap_or_else(BindingTable::unit))
    }

    /// Matches one pattern against the dataset: one row per matching quad,
    /// with the pattern's variables bound.
    fn match_pattern(&self, pattern: &QuadPattern) -> Result<BindingTable, QueryEvaluationError> {
        let subject = pattern.subject.as_ground();
        let predicate = match &pattern.predicate {
            NamedNodePattern::NamedNode(p) => Some(p.clone()),
            NamedNodePattern::Variable(_) => None,
        };
        let object = pattern.object.as_ground();
        let graph = match &pattern.graph_name {
            None => GraphSelector::Default,
            Some(NamedNodePattern::NamedNode(g)) => GraphSelector::Named(g),
            Some(NamedNodePattern::Variable(_)) => GraphSelector::AnyNamed,
        };
        let variables = pattern.variables();
        let mut table = BindingTable::with_variables(variables.clone());
        'quads: for quad in
            self.dataset
                .quads_for_pattern(subject.as_ref(), predicate.as_ref(), object.as_ref(), graph)
        {
            let quad = quad?;
            let mut row: Vec<Option<Term>> = vec![None; variables.len()];
            // Binds a variable slot; a repeated variable must re-match its
            // earlier value.
            let bind = |row: &mut Vec<Option<Term>>, variable: &Variable, value: Term| {
                let i = variables
                    .iter()
                    .position(|v| v == variable)
                    .unwrap_or_else(|| unreachable!("pattern variables are pre-collected"));
                match &row[i] {
                    None => {
                        row[i] = Some(value);
                        true
                    }
                    Some(existing) => *existing == value,
                }
            };
            if let TermPattern::Variable(v) = &pattern.subject {
                if !bind(&mut row, v, Term::from(quad.subject)) {
                    continue 'quads;
                }
            }
            if let NamedNodePattern::Variable(v) = &pattern.predicate {
                if !bind(&mut row, v, Term::from(quad.predicate)) {
                    continue 'quads;
                }
            }
            if let TermPattern::Variable(v) = &pattern.object {
                if !bind(&mut row, v, quad.object) {
                    continue 'quads;
                }
            }
            if let Some(NamedNodePattern::Variable(v)) = &pattern.graph_name {
                let graph_term = match quad.graph_name {
                    oxrdf::GraphName::NamedNode(n) => Term::from(n),
                    oxrdf::GraphName::BlankNode(b) => Term::from(b),
                    oxrdf::GraphName::DefaultGraph => continue 'quads,
                };
                if !bind(&mut row, v, graph_term) {
                    continue 'quads;
                }
            }
            table.push_row(row);
        }
        Ok(table)
    }

    /// The fixed modifier pipeline: GROUP BY, HAVING, expression bindings,
    /// projection, ORDER BY, DISTINCT, OFFSET, LIMIT.
    fn apply_modifiers(
        &self,
        mut table: BindingTable,
        modifiers: &QueryModifiers,
    ) -> Result<BindingTable, QueryEvaluationError> {
        if let Some(group_by) = &modifiers.group_by {
            table = self.group_and_aggregate(table, group_by);
        }
        if let Some(having) = &modifiers.having {
            let variables = table.variables().to_vec();
            table.retain_rows(|row| {
                expression::ebv(
                    having,
                    Bindings {
                        variables: &variables,
                        row,
                    },
                    &self.ctx,
                ) == Some(true)
            });
        }
        for (variable, binding) in &modifiers.bindings {
            let variables = table.variables().to_vec();
            let values = table
                .rows()
                .iter()
                .map(|row| {
                    expression::eval(
                        binding,
                        Bindings {
                            variables: &variables,
                            row,
                        },
                        &self.ctx,
                    )
                })
                .collect::<Vec<_>>();
            let column = table.ensure_column(variable);
            table.set_column(column, values);
        }
        if !modifiers.projection.is_empty() {
            table = table.project(&modifiers.projection);
        }
        if !modifiers.order_by.is_empty() {
            let comparators = modifiers
                .order_by
                .iter()
                .filter_map(|comparator| {
                    Some((
                        table.column_index(comparator.variable())?,
                        matches!(comparator, OrderComparator::Asc(_)),
                    ))
                })
                .collect::<Vec<_>>();
            table.sort_by(&comparators, cmp_terms);
        }
        if modifiers.distinct {
            table.distinct();
        }
        table.slice(modifiers.offset, modifiers.limit);
        Ok(table)
    }

    fn group_and_aggregate(&self, table: BindingTable, group_by: &GroupBy) -> BindingTable {
        let mut aggregator = AggregatorContext::new(&group_by.aggregates);
        if group_by.variables.is_empty() {
            // Grouping without keys aggregates everything into one
            // partition, present even over an empty table.
            aggregator.ensure_partition(Vec::new());
        }
        let variables = table.variables().to_vec();
        for row in table.rows() {
            let key = group_by
                .variables
                .iter()
                .map(|v| table.value(row, v).cloned())
                .collect();
            let values = group_by
                .aggregates
                .iter()
                .map(|(_, aggregate)| match aggregate {
                    AggregateExpression::CountSolutions { .. } => None,
                    AggregateExpression::FunctionCall { expr, .. } => expression::eval(
                        expr,
                        Bindings {
                            variables: &variables,
                            row,
                        },
                        &self.ctx,
                    ),
                })
                .collect::<Vec<_>>();
            aggregator.update(key, row, &values);
        }
        let mut result = BindingTable::with_variables(
            group_by
                .variables
                .iter()
                .chain(group_by.aggregates.iter().map(|(v, _)| v))
                .cloned(),
        );
        for (key, values) in aggregator.finish() {
            let mut row = key;
            row.extend(values);
            result.push_row(row);
        }
        result
    }
}

fn instantiate_template(template: &[TriplePattern], bindings: Bindings<'_>, graph: &mut Graph) {
    // Template blank nodes are renamed per solution row.
    let mut bnodes: FxHashMap<BlankNode, BlankNode> = FxHashMap::default();
    for pattern in template {
        let subject: Subject = match &pattern.subject {
            TermPattern::NamedNode(node) => node.clone().into(),
            TermPattern::BlankNode(node) => bnodes
                .entry(node.clone())
                .or_insert_with(BlankNode::default)
                .clone()
                .into(),
            TermPattern::Literal(_) => continue,
            TermPattern::Variable(v) => match bindings.get(v) {
                Some(Term::NamedNode(node)) => node.clone().into(),
                Some(Term::BlankNode(node)) => node.clone().into(),
                // A literal subject or an unbound slot drops the triple.
                _ => continue,
            },
        };
        let predicate: NamedNode = match &pattern.predicate {
            NamedNodePattern::NamedNode(node) => node.clone(),
            NamedNodePattern::Variable(v) => match bindings.get(v) {
                Some(Term::NamedNode(node)) => node.clone(),
                _ => continue,
            },
        };
        let object: Term = match &pattern.object {
            TermPattern::NamedNode(node) => node.clone().into(),
            TermPattern::BlankNode(node) => bnodes
                .entry(node.clone())
                .or_insert_with(BlankNode::default)
                .clone()
                .into(),
            TermPattern::Literal(literal) => literal.clone().into(),
            TermPattern::Variable(v) => match bindings.get(v) {
                Some(term) => term.clone(),
                None => continue,
            },
        };
        graph.insert(&Triple::new(subject, predicate, object));
    }
}

/// Structural validation plus the blank-node-to-existential rewrite, run
/// before any data is touched.
pub(crate) fn normalise(query: &Query) -> Result<Query, QueryEvaluationError> {
    let mut query = query.clone();
    rewrite_blank_nodes(&mut query);

    let mut in_scope = Vec::new();
    for group in query.groups() {
        group.on_variables(&mut |v| {
            if !in_scope.contains(v) {
                in_scope.push(v.clone());
            }
        });
    }
    if let Some(modifiers) = query.modifiers() {
        for (v, _) in &modifiers.bindings {
            if !in_scope.contains(v) {
                in_scope.push(v.clone());
            }
        }
        if let Some(group_by) = &modifiers.group_by {
            for (v, _) in &group_by.aggregates {
                if !in_scope.contains(v) {
                    in_scope.push(v.clone());
                }
            }
        }
        for v in &modifiers.projection {
            if !in_scope.contains(v) {
                return Err(MalformedQueryError::ProjectionOutOfScope(v.clone()).into());
            }
        }
        if modifiers.having.is_some() && modifiers.group_by.is_none() {
            return Err(MalformedQueryError::HavingWithoutGroupBy.into());
        }
        if let Some(having) = &modifiers.having {
            check_no_negated_exists(having)?;
        }
        for (_, binding) in &modifiers.bindings {
            check_no_negated_exists(binding)?;
        }
    }
    if let Query::Describe { targets, .. } = &query {
        for target in targets {
            if let DescribeTarget::Variable(v) = target {
                if !in_scope.contains(v) {
                    return Err(MalformedQueryError::DescribeVariableOutOfScope(v.clone()).into());
                }
            }
        }
    }
    for group in query.groups() {
        for filter in &group.filters {
            check_no_negated_exists(filter)?;
        }
    }
    Ok(query)
}

/// Blank nodes in query position are existentials: each label becomes one
/// fresh variable for the whole query.
fn rewrite_blank_nodes(query: &mut Query) {
    let mut mapping: FxHashMap<BlankNode, Variable> = FxHashMap::default();
    let groups = match query {
        Query::Select { groups, .. }
        | Query::Describe { groups, .. }
        | Query::Construct { groups, .. }
        | Query::Ask { groups, .. } => groups,
    };
    for group in groups {
        for GroupPattern { pattern, .. } in &mut group.patterns {
            rewrite_slot(&mut pattern.subject, &mut mapping);
            rewrite_slot(&mut pattern.object, &mut mapping);
        }
        for PathPattern {
            subject, object, ..
        } in &mut group.paths
        {
            rewrite_slot(subject, &mut mapping);
            rewrite_slot(object, &mut mapping);
        }
    }
}

fn rewrite_slot(slot: &mut TermPattern, mapping: &mut FxHashMap<BlankNode, Variable>) {
    if let TermPattern::BlankNode(node) = slot {
        let next = mapping.len();
        let variable = mapping
            .entry(node.clone())
            .or_insert_with(|| Variable::new_unchecked(format!("__bnode{next}")))
            .clone();
        *slot = TermPattern::Variable(variable);
    }
}

fn check_no_negated_exists(expression: &Expression) -> Result<(), MalformedQueryError> {
    match expression {
        Expression::Not(inner) => {
            if matches!(inner.as_ref(), Expression::Exists(_)) {
                return Err(MalformedQueryError::NegatedExists);
            }
            check_no_negated_exists(inner)
        }
        Expression::NamedNode(_)
        | Expression::Literal(_)
        | Expression::Variable(_)
        | Expression::Bound(_)
        | Expression::Exists(_) => Ok(()),
        Expression::Or(a, b)
        | Expression::And(a, b)
        | Expression::Equal(a, b)
        | Expression::SameTerm(a, b)
        | Expression::Greater(a, b)
        | Expression::GreaterOrEqual(a, b)
        | Expression::Less(a, b)
        | Expression::LessOrEqual(a, b)
        | Expression::Add(a, b)
        | Expression::Subtract(a, b)
        | Expression::Multiply(a, b)
        | Expression::Divide(a, b) => {
            check_no_negated_exists(a)?;
            check_no_negated_exists(b)
        }
        Expression::UnaryPlus(e) | Expression::UnaryMinus(e) => check_no_negated_exists(e),
        Expression::In(e, list) => {
            check_no_negated_exists(e)?;
            list.iter().try_for_each(check_no_negated_exists)
        }
        Expression::If(a, b, c) => {
            check_no_negated_exists(a)?;
            check_no_negated_exists(b)?;
            check_no_negated_exists(c)
        }
        Expression::Coalesce(args) | Expression::FunctionCall(_, args) => {
            args.iter().try_for_each(check_no_negated_exists)
        }
    }
}
