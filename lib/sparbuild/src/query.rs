//! The query object and its programmatic builder API.

use crate::algebra::*;
use crate::term::*;
use std::fmt;

/// A prefix declaration, carried for printing only.
///
/// Terms inside the query are always stored fully expanded; declaring a
/// prefix never rewrites them.
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub struct Prefix {
    pub label: String,
    pub iri: NamedNode,
}

impl Prefix {
    pub fn new(label: impl Into<String>, iri: NamedNode) -> Self {
        Self {
            label: label.into(),
            iri,
        }
    }
}

impl fmt::Display for Prefix {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PREFIX {}: {}", self.label, self.iri)
    }
}

/// A DESCRIBE position: either a fixed resource or a variable whose bound
/// values are described.
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub enum DescribeTarget {
    Term(NamedNode),
    Variable(Variable),
}

impl fmt::Display for DescribeTarget {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Term(node) => node.fmt(f),
            Self::Variable(var) => var.fmt(f),
        }
    }
}

impl From<NamedNode> for DescribeTarget {
    #[inline]
    fn from(node: NamedNode) -> Self {
        Self::Term(node)
    }
}

impl From<Variable> for DescribeTarget {
    #[inline]
    fn from(var: Variable) -> Self {
        Self::Variable(var)
    }
}

/// A SPARQL query assembled through the builder API.
///
/// A query is immutable during evaluation and can be applied to several
/// datasets. The `Display` implementation prints canonical SPARQL 1.1 text,
/// used both for remote endpoint dispatch and for diagnostics.
///
/// ```
/// use oxrdf::{NamedNode, Variable};
/// use sparbuild::{PatternGroup, QuadPattern, Query};
///
/// let knows = NamedNode::new("http://xmlns.com/foaf/0.1/knows")?;
/// let query = Query::select()
///     .with_group(PatternGroup::new().with_pattern(QuadPattern::new(
///         Variable::new("x")?,
///         knows,
///         Variable::new("y")?,
///     )))
///     .with_projection([Variable::new("x")?]);
/// assert_eq!(
///     query.to_string(),
///     "SELECT ?x WHERE { { ?x <http://xmlns.com/foaf/0.1/knows> ?y . } }"
/// );
/// # Result::<_, Box<dyn std::error::Error>>::Ok(())
/// ```
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub enum Query {
    /// [SELECT](https://www.w3.org/TR/sparql11-query/#select): a binding table.
    Select {
        prefixes: Vec<Prefix>,
        groups: Vec<PatternGroup>,
        modifiers: QueryModifiers,
    },
    /// [DESCRIBE](https://www.w3.org/TR/sparql11-query/#describe): a graph of one-hop descriptions.
    Describe {
        prefixes: Vec<Prefix>,
        groups: Vec<PatternGroup>,
        modifiers: QueryModifiers,
        targets: Vec<DescribeTarget>,
    },
    /// [CONSTRUCT](https://www.w3.org/TR/sparql11-query/#construct): a graph built from a template.
    Construct {
        prefixes: Vec<Prefix>,
        groups: Vec<PatternGroup>,
        modifiers: QueryModifiers,
        template: Vec<TriplePattern>,
    },
    /// [ASK](https://www.w3.org/TR/sparql11-query/#ask): a boolean.
    Ask {
        prefixes: Vec<Prefix>,
        groups: Vec<PatternGroup>,
    },
}

impl Query {
    #[inline]
    pub fn select() -> Self {
        Self::Select {
            prefixes: Vec::new(),
            groups: Vec::new(),
            modifiers: QueryModifiers::default(),
        }
    }

    pub fn describe(targets: impl IntoIterator<Item = impl Into<DescribeTarget>>) -> Self {
        Self::Describe {
            prefixes: Vec::new(),
            groups: Vec::new(),
            modifiers: QueryModifiers::default(),
            targets: targets.into_iter().map(Into::into).collect(),
        }
    }

    pub fn construct(template: impl IntoIterator<Item = TriplePattern>) -> Self {
        Self::Construct {
            prefixes: Vec::new(),
            groups: Vec::new(),
            modifiers: QueryModifiers::default(),
            template: template.into_iter().collect(),
        }
    }

    #[inline]
    pub fn ask() -> Self {
        Self::Ask {
            prefixes: Vec::new(),
            groups: Vec::new(),
        }
    }

    pub fn prefixes(&self) -> &[Prefix] {
        match self {
            Self::Select { prefixes, .. }
            | Self::Describe { prefixes, .. }
            | Self::Construct { prefixes, .. }
            | Self::Ask { prefixes, .. } => prefixes,
        }
    }

    pub fn groups(&self) -> &[PatternGroup] {
        match self {
            Self::Select { groups, .. }
            | Self::Describe { groups, .. }
            | Self::Construct { groups, .. }
            | Self::Ask { groups, .. } => groups,
        }
    }

    /// The solution modifiers. ASK queries have none.
    pub fn modifiers(&self) -> Option<&QueryModifiers> {
        match self {
            Self::Select { modifiers, .. }
            | Self::Describe { modifiers, .. }
            | Self::Construct { modifiers, .. } => Some(modifiers),
            Self::Ask { .. } => None,
        }
    }

    #[inline]
    #[must_use]
    pub fn with_prefix(mut self, prefix: Prefix) -> Self {
        match &mut self {
            Self::Select { prefixes, .. }
            | Self::Describe { prefixes, .. }
            | Self::Construct { prefixes, .. }
            | Self::Ask { prefixes, .. } => prefixes.push(prefix),
        }
        self
    }

    /// Appends a pattern group. Groups combine in declaration order,
    /// each according to its [`GroupCombinator`] flag.
    #[inline]
    #[must_use]
    pub fn with_group(mut self, group: PatternGroup) -> Self {
        match &mut self {
            Self::Select { groups, .. }
            | Self::Describe { groups, .. }
            | Self::Construct { groups, .. }
            | Self::Ask { groups, .. } => groups.push(group),
        }
        self
    }

    fn modifiers_mut(&mut self) -> &mut QueryModifiers {
        match self {
            Self::Select { modifiers, .. }
            | Self::Describe { modifiers, .. }
            | Self::Construct { modifiers, .. } => modifiers,
            Self::Ask { .. } => panic!("ASK queries do not take solution modifiers"),
        }
    }

    /// Selects the projected variables. Empty means every in-scope variable.
    ///
    /// Panics on ASK queries, like all modifier setters.
    #[must_use]
    pub fn with_projection(mut self, variables: impl IntoIterator<Item = Variable>) -> Self {
        self.modifiers_mut().projection = variables.into_iter().collect();
        self
    }

    /// Binds `expression`'s per-row value to `variable` before projection.
    #[inline]
    #[must_use]
    pub fn with_binding(mut self, variable: Variable, expression: impl Into<Expression>) -> Self {
        self.modifiers_mut()
            .bindings
            .push((variable, expression.into()));
        self
    }

    #[inline]
    #[must_use]
    pub fn with_group_by(mut self, group_by: GroupBy) -> Self {
        self.modifiers_mut().group_by = Some(group_by);
        self
    }

    #[inline]
    #[must_use]
    pub fn with_having(mut self, expression: impl Into<Expression>) -> Self {
        self.modifiers_mut().having = Some(expression.into());
        self
    }

    #[inline]
    #[must_use]
    pub fn with_order_by(mut self, comparator: OrderComparator) -> Self {
        self.modifiers_mut().order_by.push(comparator);
        self
    }

    #[inline]
    #[must_use]
    pub fn distinct(mut self) -> Self {
        self.modifiers_mut().distinct = true;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_offset(mut self, offset: usize) -> Self {
        self.modifiers_mut().offset = Some(offset);
        self
    }

    #[inline]
    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.modifiers_mut().limit = Some(limit);
        self
    }

    /// Calls `callback` on each variable this query projects, either
    /// explicitly or (with an empty projection) every in-scope variable.
    pub fn on_projected_variables<'a>(&'a self, callback: &mut impl FnMut(&'a Variable)) {
        let Some(modifiers) = self.modifiers() else {
            return;
        };
        if !modifiers.projection.is_empty() {
            for v in &modifiers.projection {
                callback(v);
            }
            return;
        }
        if let Some(group_by) = &modifiers.group_by {
            for v in &group_by.variables {
                callback(v);
            }
            for (v, _) in &group_by.aggregates {
                callback(v);
            }
            return;
        }
        for group in self.groups() {
            group.on_variables(callback);
        }
        for (v, _) in &modifiers.bindings {
            callback(v);
        }
    }

    fn fmt_where(
        groups: &[PatternGroup],
        trailing_binds: &[(Variable, Expression)],
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        use fmt::Write as _;
        // Groups combine left to right, so a UNION branch applies to
        // everything before it; the accumulated body gets braced to keep the
        // printed text on those semantics.
        let mut body = String::new();
        for (i, group) in groups.iter().enumerate() {
            if i == 0 {
                write!(&mut body, "{{ {group} }}")?;
                continue;
            }
            match group.combinator {
                GroupCombinator::Join => write!(&mut body, " {{ {group} }}")?,
                GroupCombinator::Optional => write!(&mut body, " OPTIONAL {{ {group} }}")?,
                GroupCombinator::Minus => write!(&mut body, " MINUS {{ {group} }}")?,
                GroupCombinator::Union => body = format!("{{ {body} }} UNION {{ {group} }}"),
            }
        }
        f.write_str("WHERE {")?;
        if !body.is_empty() {
            write!(f, " {body}")?;
        }
        for (v, e) in trailing_binds {
            write!(f, " BIND({e} AS {v})")?;
        }
        f.write_str(" }")
    }

    fn fmt_select_clause(modifiers: &QueryModifiers, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SELECT")?;
        if modifiers.distinct {
            f.write_str(" DISTINCT")?;
        }
        let aggregates: &[(Variable, AggregateExpression)] = modifiers
            .group_by
            .as_ref()
            .map_or(&[], |g| g.aggregates.as_slice());
        if !modifiers.projection.is_empty() {
            for v in &modifiers.projection {
                if let Some((_, aggregate)) = aggregates.iter().find(|(a, _)| a == v) {
                    write!(f, " ({aggregate} AS {v})")?;
                } else if let Some((_, e)) = modifiers.bindings.iter().find(|(b, _)| b == v) {
                    write!(f, " ({e} AS {v})")?;
                } else {
                    write!(f, " {v}")?;
                }
            }
        } else if let Some(group_by) = &modifiers.group_by {
            for v in &group_by.variables {
                write!(f, " {v}")?;
            }
            for (v, aggregate) in aggregates {
                write!(f, " ({aggregate} AS {v})")?;
            }
        } else {
            f.write_str(" *")?;
        }
        Ok(())
    }

    fn fmt_modifier_tail(modifiers: &QueryModifiers, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(group_by) = &modifiers.group_by {
            if !group_by.variables.is_empty() {
                f.write_str(" GROUP BY")?;
                for v in &group_by.variables {
                    write!(f, " {v}")?;
                }
            }
        }
        if let Some(having) = &modifiers.having {
            write!(f, " HAVING({having})")?;
        }
        if !modifiers.order_by.is_empty() {
            f.write_str(" ORDER BY")?;
            for comparator in &modifiers.order_by {
                write!(f, " {comparator}")?;
            }
        }
        if let Some(offset) = modifiers.offset {
            write!(f, " OFFSET {offset}")?;
        }
        if let Some(limit) = modifiers.limit {
            write!(f, " LIMIT {limit}")?;
        }
        Ok(())
    }

    /// Prints the query without its prefix declarations, the form used for
    /// sub-selects embedded in a group.
    pub(crate) fn fmt_without_prefixes(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Select {
                groups, modifiers, ..
            } => {
                Self::fmt_select_clause(modifiers, f)?;
                f.write_str(" ")?;
                // Bindings not carried by the SELECT clause re-materialise
                // as trailing BINDs so the printed text stays equivalent.
                let trailing_binds = if modifiers.projection.is_empty() {
                    modifiers.bindings.clone()
                } else {
                    modifiers
                        .bindings
                        .iter()
                        .filter(|(v, _)| !modifiers.projection.contains(v))
                        .cloned()
                        .collect()
                };
                Self::fmt_where(groups, &trailing_binds, f)?;
                Self::fmt_modifier_tail(modifiers, f)
            }
            Self::Describe {
                groups,
                modifiers,
                targets,
                ..
            } => {
                f.write_str("DESCRIBE")?;
                for target in targets {
                    write!(f, " {target}")?;
                }
                if !groups.is_empty() {
                    f.write_str(" ")?;
                    Self::fmt_where(groups, &modifiers.bindings, f)?;
                }
                Self::fmt_modifier_tail(modifiers, f)
            }
            Self::Construct {
                groups,
                modifiers,
                template,
                ..
            } => {
                f.write_str("CONSTRUCT { ")?;
                for triple in template {
                    write!(f, "{triple} . ")?;
                }
                f.write_str("} ")?;
                Self::fmt_where(groups, &modifiers.bindings, f)?;
                Self::fmt_modifier_tail(modifiers, f)
            }
            Self::Ask { groups, .. } => {
                f.write_str("ASK ")?;
                Self::fmt_where(groups, &[], f)
            }
        }
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for prefix in self.prefixes() {
            writeln!(f, "{prefix}")?;
        }
        self.fmt_without_prefixes(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::QuadPattern;

    fn ex(suffix: &str) -> NamedNode {
        NamedNode::new_unchecked(format!("http://example.com/{suffix}"))
    }

    fn var(name: &str) -> Variable {
        Variable::new_unchecked(name)
    }

    #[test]
    fn select_star_over_one_group() {
        let query = Query::select().with_group(
            PatternGroup::new().with_pattern(QuadPattern::new(var("s"), var("p"), var("o"))),
        );
        assert_eq!(query.to_string(), "SELECT * WHERE { { ?s ?p ?o . } }");
    }

    #[test]
    fn prefixes_print_before_the_query_form() {
        let query = Query::ask()
            .with_prefix(Prefix::new("ex", ex("")))
            .with_group(
                PatternGroup::new().with_pattern(QuadPattern::new(var("s"), ex("p"), var("o"))),
            );
        assert_eq!(
            query.to_string(),
            "PREFIX ex: <http://example.com/>\nASK WHERE { { ?s <http://example.com/p> ?o . } }"
        );
    }

    #[test]
    fn aggregate_projection_prints_as_select_expression() {
        let query = Query::select()
            .with_group(
                PatternGroup::new().with_pattern(QuadPattern::new(var("x"), ex("p"), var("v"))),
            )
            .with_group_by(
                GroupBy::new([var("x")])
                    .with_aggregate(var("n"), AggregateExpression::count(var("v"))),
            )
            .with_projection([var("x"), var("n")]);
        assert_eq!(
            query.to_string(),
            "SELECT ?x (COUNT(?v) AS ?n) WHERE { { ?x <http://example.com/p> ?v . } } GROUP BY ?x"
        );
    }

    #[test]
    fn union_and_minus_groups_print_between_blocks() {
        let query = Query::select()
            .with_group(
                PatternGroup::new().with_pattern(QuadPattern::new(var("x"), ex("p"), var("y"))),
            )
            .with_group(
                PatternGroup::new()
                    .with_pattern(QuadPattern::new(var("x"), ex("q"), var("y")))
                    .union_with_previous(),
            )
            .with_group(
                PatternGroup::new()
                    .with_pattern(QuadPattern::new(var("x"), ex("r"), var("z")))
                    .minus(),
            );
        assert_eq!(
            query.to_string(),
            "SELECT * WHERE { { { ?x <http://example.com/p> ?y . } } UNION { ?x <http://example.com/q> ?y . } MINUS { ?x <http://example.com/r> ?z . } }"
        );
    }

    #[test]
    fn modifier_tail_order_is_canonical() {
        let query = Query::select()
            .with_group(
                PatternGroup::new().with_pattern(QuadPattern::new(var("x"), ex("p"), var("v"))),
            )
            .with_order_by(OrderComparator::Desc(var("v")))
            .with_offset(5)
            .with_limit(10);
        assert!(query.to_string().ends_with("ORDER BY DESC(?v) OFFSET 5 LIMIT 10"));
    }

    #[test]
    #[should_panic(expected = "ASK queries")]
    fn ask_rejects_modifiers() {
        let _ = Query::ask().with_limit(3);
    }

    #[test]
    fn describe_without_where_prints_targets_only() {
        let query = Query::describe([ex("a")]);
        assert_eq!(query.to_string(), "DESCRIBE <http://example.com/a>");
    }
}
