//! Pattern-position variants of the [RDF 1.1 Concepts](https://www.w3.org/TR/rdf11-concepts/) terms.

pub use oxrdf::{BlankNode, Literal, NamedNode, Term, Variable};
use std::fmt;

/// The union of [IRIs](https://www.w3.org/TR/rdf11-concepts/#dfn-iri) and [variables](https://www.w3.org/TR/sparql11-query/#sparqlQueryVariables).
///
/// It is the type of the predicate and graph-name slots of a pattern:
/// if those slots are ground they must be IRIs.
///
/// The default string formatter is returning a SPARQL compatible representation.
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub enum NamedNodePattern {
    NamedNode(NamedNode),
    Variable(Variable),
}

impl NamedNodePattern {
    #[inline]
    pub fn is_variable(&self) -> bool {
        matches!(self, Self::Variable(_))
    }
}

impl fmt::Display for NamedNodePattern {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NamedNode(node) => node.fmt(f),
            Self::Variable(var) => var.fmt(f),
        }
    }
}

impl From<NamedNode> for NamedNodePattern {
    #[inline]
    fn from(node: NamedNode) -> Self {
        Self::NamedNode(node)
    }
}

impl From<Variable> for NamedNodePattern {
    #[inline]
    fn from(var: Variable) -> Self {
        Self::Variable(var)
    }
}

impl TryFrom<NamedNodePattern> for NamedNode {
    type Error = ();

    #[inline]
    fn try_from(pattern: NamedNodePattern) -> Result<Self, Self::Error> {
        match pattern {
            NamedNodePattern::NamedNode(node) => Ok(node),
            NamedNodePattern::Variable(_) => Err(()),
        }
    }
}

/// The union of [terms](https://www.w3.org/TR/rdf11-concepts/#dfn-rdf-term) and [variables](https://www.w3.org/TR/sparql11-query/#sparqlQueryVariables).
///
/// Blank nodes are allowed in query position and act as existentials:
/// the engine rewrites them to fresh variables before matching.
///
/// The default string formatter is returning a SPARQL compatible representation.
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub enum TermPattern {
    NamedNode(NamedNode),
    BlankNode(BlankNode),
    Literal(Literal),
    Variable(Variable),
}

impl TermPattern {
    #[inline]
    pub fn is_variable(&self) -> bool {
        matches!(self, Self::Variable(_))
    }

    /// The ground term in this slot, if the slot is ground.
    #[inline]
    pub fn as_ground(&self) -> Option<Term> {
        match self {
            Self::NamedNode(node) => Some(node.clone().into()),
            Self::BlankNode(node) => Some(node.clone().into()),
            Self::Literal(literal) => Some(literal.clone().into()),
            Self::Variable(_) => None,
        }
    }
}

impl fmt::Display for TermPattern {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NamedNode(node) => node.fmt(f),
            Self::BlankNode(node) => node.fmt(f),
            Self::Literal(literal) => literal.fmt(f),
            Self::Variable(var) => var.fmt(f),
        }
    }
}

impl From<NamedNode> for TermPattern {
    #[inline]
    fn from(node: NamedNode) -> Self {
        Self::NamedNode(node)
    }
}

impl From<BlankNode> for TermPattern {
    #[inline]
    fn from(node: BlankNode) -> Self {
        Self::BlankNode(node)
    }
}

impl From<Literal> for TermPattern {
    #[inline]
    fn from(literal: Literal) -> Self {
        Self::Literal(literal)
    }
}

impl From<Variable> for TermPattern {
    #[inline]
    fn from(var: Variable) -> Self {
        Self::Variable(var)
    }
}

impl From<Term> for TermPattern {
    #[inline]
    fn from(term: Term) -> Self {
        match term {
            Term::NamedNode(node) => node.into(),
            Term::BlankNode(node) => node.into(),
            Term::Literal(literal) => literal.into(),
        }
    }
}

impl From<NamedNodePattern> for TermPattern {
    #[inline]
    fn from(element: NamedNodePattern) -> Self {
        match element {
            NamedNodePattern::NamedNode(node) => node.into(),
            NamedNodePattern::Variable(var) => var.into(),
        }
    }
}

impl TryFrom<TermPattern> for Term {
    type Error = ();

    #[inline]
    fn try_from(pattern: TermPattern) -> Result<Self, Self::Error> {
        match pattern {
            TermPattern::NamedNode(node) => Ok(node.into()),
            TermPattern::BlankNode(node) => Ok(node.into()),
            TermPattern::Literal(literal) => Ok(literal.into()),
            TermPattern::Variable(_) => Err(()),
        }
    }
}

/// A [triple pattern](https://www.w3.org/TR/sparql11-query/#defn_TriplePattern):
/// a triple with each slot either ground or a variable.
///
/// Also the element type of CONSTRUCT templates.
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub struct TriplePattern {
    pub subject: TermPattern,
    pub predicate: NamedNodePattern,
    pub object: TermPattern,
}

impl TriplePattern {
    pub fn new(
        subject: impl Into<TermPattern>,
        predicate: impl Into<NamedNodePattern>,
        object: impl Into<TermPattern>,
    ) -> Self {
        Self {
            subject: subject.into(),
            predicate: predicate.into(),
            object: object.into(),
        }
    }
}

impl fmt::Display for TriplePattern {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.subject, self.predicate, self.object)
    }
}

/// A triple pattern with an optional graph-name slot.
///
/// Without a graph name the pattern matches the default graph of the queried
/// dataset. The pattern's *variables* are its variable slots, in
/// subject/predicate/object/graph order.
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub struct QuadPattern {
    pub subject: TermPattern,
    pub predicate: NamedNodePattern,
    pub object: TermPattern,
    pub graph_name: Option<NamedNodePattern>,
}

impl QuadPattern {
    pub fn new(
        subject: impl Into<TermPattern>,
        predicate: impl Into<NamedNodePattern>,
        object: impl Into<TermPattern>,
    ) -> Self {
        Self {
            subject: subject.into(),
            predicate: predicate.into(),
            object: object.into(),
            graph_name: None,
        }
    }

    /// Restricts this pattern to a given graph of the queried dataset.
    #[inline]
    #[must_use]
    pub fn in_graph(mut self, graph_name: impl Into<NamedNodePattern>) -> Self {
        self.graph_name = Some(graph_name.into());
        self
    }

    /// The variable slots of this pattern, in slot order, without duplicates.
    pub fn variables(&self) -> Vec<Variable> {
        let mut variables = Vec::with_capacity(4);
        self.on_variables(|v| {
            if !variables.contains(v) {
                variables.push(v.clone());
            }
        });
        variables
    }

    pub(crate) fn on_variables<'a>(&'a self, mut callback: impl FnMut(&'a Variable)) {
        if let TermPattern::Variable(s) = &self.subject {
            callback(s);
        }
        if let NamedNodePattern::Variable(p) = &self.predicate {
            callback(p);
        }
        if let TermPattern::Variable(o) = &self.object {
            callback(o);
        }
        if let Some(NamedNodePattern::Variable(g)) = &self.graph_name {
            callback(g);
        }
    }

    /// The number of ground (non-variable, non-blank) slots.
    ///
    /// Used by the engine to order patterns most-selective-first.
    pub fn ground_slot_count(&self) -> usize {
        let mut count = 0;
        if matches!(
            self.subject,
            TermPattern::NamedNode(_) | TermPattern::Literal(_)
        ) {
            count += 1;
        }
        if matches!(self.predicate, NamedNodePattern::NamedNode(_)) {
            count += 1;
        }
        if matches!(
            self.object,
            TermPattern::NamedNode(_) | TermPattern::Literal(_)
        ) {
            count += 1;
        }
        if matches!(self.graph_name, Some(NamedNodePattern::NamedNode(_))) {
            count += 1;
        }
        count
    }
}

impl fmt::Display for QuadPattern {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(graph_name) = &self.graph_name {
            write!(
                f,
                "GRAPH {} {{ {} {} {} . }}",
                graph_name, self.subject, self.predicate, self.object
            )
        } else {
            write!(f, "{} {} {} .", self.subject, self.predicate, self.object)
        }
    }
}

impl From<TriplePattern> for QuadPattern {
    #[inline]
    fn from(pattern: TriplePattern) -> Self {
        Self {
            subject: pattern.subject,
            predicate: pattern.predicate,
            object: pattern.object,
            graph_name: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ex(suffix: &str) -> NamedNode {
        NamedNode::new_unchecked(format!("http://example.com/{suffix}"))
    }

    #[test]
    fn quad_pattern_variables_are_deduplicated_in_slot_order() {
        let v = Variable::new_unchecked("x");
        let pattern = QuadPattern::new(v.clone(), ex("p"), v.clone())
            .in_graph(Variable::new_unchecked("g"));
        assert_eq!(
            pattern.variables(),
            vec![v, Variable::new_unchecked("g")]
        );
    }

    #[test]
    fn ground_slot_count_ignores_blank_nodes() {
        let pattern = QuadPattern::new(BlankNode::default(), ex("p"), Literal::from(1));
        assert_eq!(pattern.ground_slot_count(), 2);
    }

    #[test]
    fn pattern_display_is_sparql_surface_syntax() {
        let pattern = QuadPattern::new(
            Variable::new_unchecked("s"),
            ex("p"),
            Literal::from("v"),
        );
        assert_eq!(
            pattern.to_string(),
            "?s <http://example.com/p> \"v\" ."
        );
        assert_eq!(
            pattern.in_graph(ex("g")).to_string(),
            "GRAPH <http://example.com/g> { ?s <http://example.com/p> \"v\" . }"
        );
    }
}
