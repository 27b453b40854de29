//! The capability surface the engine needs from a dataset: enumerating the
//! quads that match a pattern. Graphs, quad stores, federations and remote
//! endpoints all sit behind it.

use crate::error::QueryEvaluationError;
use oxrdf::{Dataset, Graph, GraphName, NamedNode, Quad, Term, TermRef};
use rustc_hash::FxHashSet;

/// Which graphs of the dataset a pattern is matched against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphSelector<'a> {
    /// The default graph only.
    Default,
    /// One named graph.
    Named(&'a NamedNode),
    /// Every named graph (a variable graph slot).
    AnyNamed,
}

/// A source of RDF quads queryable by pattern.
///
/// `None` slots are wildcards. Matching is advisory-read-only: evaluation
/// never writes. Implementations exist for [`oxrdf::Graph`],
/// [`oxrdf::Dataset`], [`Federation`] and
/// [`SparqlEndpoint`](crate::SparqlEndpoint).
pub trait PatternSource {
    fn quads_for_pattern<'a>(
        &'a self,
        subject: Option<&'a Term>,
        predicate: Option<&'a NamedNode>,
        object: Option<&'a Term>,
        graph: GraphSelector<'a>,
    ) -> Box<dyn Iterator<Item = Result<Quad, QueryEvaluationError>> + 'a>;
}

impl PatternSource for Graph {
    /// All triples live in the default graph; named-graph selectors match nothing.
    fn quads_for_pattern<'a>(
        &'a self,
        subject: Option<&'a Term>,
        predicate: Option<&'a NamedNode>,
        object: Option<&'a Term>,
        graph: GraphSelector<'a>,
    ) -> Box<dyn Iterator<Item = Result<Quad, QueryEvaluationError>> + 'a> {
        if graph != GraphSelector::Default {
            return Box::new(std::iter::empty());
        }
        Box::new(
            self.iter()
                .filter(move |t| {
                    subject.is_none_or(|s| TermRef::from(t.subject) == s.as_ref())
                        && predicate.is_none_or(|p| t.predicate == p.as_ref())
                        && object.is_none_or(|o| t.object == o.as_ref())
                })
                .map(|t| {
                    Ok(Quad::new(
                        t.subject.into_owned(),
                        t.predicate.into_owned(),
                        t.object.into_owned(),
                        GraphName::DefaultGraph,
                    ))
                }),
        )
    }
}

impl PatternSource for Dataset {
    fn quads_for_pattern<'a>(
        &'a self,
        subject: Option<&'a Term>,
        predicate: Option<&'a NamedNode>,
        object: Option<&'a Term>,
        graph: GraphSelector<'a>,
    ) -> Box<dyn Iterator<Item = Result<Quad, QueryEvaluationError>> + 'a> {
        Box::new(
            self.iter()
                .filter(move |q| {
                    (match graph {
                        GraphSelector::Default => q.graph_name.is_default_graph(),
                        GraphSelector::Named(g) => match q.graph_name {
                            oxrdf::GraphNameRef::NamedNode(n) => n == g.as_ref(),
                            _ => false,
                        },
                        GraphSelector::AnyNamed => !q.graph_name.is_default_graph(),
                    }) && subject.is_none_or(|s| TermRef::from(q.subject) == s.as_ref())
                        && predicate.is_none_or(|p| q.predicate == p.as_ref())
                        && object.is_none_or(|o| q.object == o.as_ref())
                })
                .map(|q| Ok(q.into_owned())),
        )
    }
}

/// An ordered set of datasets queried as one.
///
/// Members are matched sequentially and identical quads coming from several
/// members are reported once.
///
/// ```
/// use oxrdf::{Graph, NamedNode, Triple, Variable};
/// use sparbuild::{PatternGroup, QuadPattern, Query};
/// use sparmill::{Federation, QueryEngine};
///
/// let ex = NamedNode::new("http://example.com")?;
/// let a = Graph::from_iter([Triple::new(ex.clone(), ex.clone(), ex.clone())]);
/// let b = Graph::from_iter([Triple::new(ex.clone(), ex.clone(), ex.clone())]);
/// let federation = Federation::new().with_member(a).with_member(b);
/// let query = Query::select().with_group(PatternGroup::new().with_pattern(
///     QuadPattern::new(Variable::new("s")?, Variable::new("p")?, Variable::new("o")?),
/// ));
/// // The shared triple is reported once.
/// assert_eq!(QueryEngine::new().evaluate_select(&query, &federation)?.len(), 1);
/// # Result::<_, Box<dyn std::error::Error>>::Ok(())
/// ```
#[derive(Default)]
pub struct Federation {
    members: Vec<Box<dyn PatternSource>>,
}

impl Federation {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    #[must_use]
    pub fn with_member(mut self, member: impl PatternSource + 'static) -> Self {
        self.members.push(Box::new(member));
        self
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

impl PatternSource for Federation {
    fn quads_for_pattern<'a>(
        &'a self,
        subject: Option<&'a Term>,
        predicate: Option<&'a NamedNode>,
        object: Option<&'a Term>,
        graph: GraphSelector<'a>,
    ) -> Box<dyn Iterator<Item = Result<Quad, QueryEvaluationError>> + 'a> {
        let mut seen = FxHashSet::default();
        Box::new(
            self.members
                .iter()
                .flat_map(move |member| member.quads_for_pattern(subject, predicate, object, graph))
                .filter_map(move |quad| match quad {
                    Ok(quad) => seen.insert(quad.clone()).then_some(Ok(quad)),
                    Err(e) => Some(Err(e)),
                }),
        )
    }
}

/// Collects every term used in subject or object position of the default
/// graph. The node universe of zero-length property-path steps.
pub(crate) fn default_graph_nodes(
    dataset: &dyn PatternSource,
) -> Result<FxHashSet<Term>, QueryEvaluationError> {
    let mut nodes = FxHashSet::default();
    for quad in dataset.quads_for_pattern(None, None, None, GraphSelector::Default) {
        let quad = quad?;
        nodes.insert(Term::from(quad.subject));
        nodes.insert(quad.object);
    }
    Ok(nodes)
}

/// Expands the one-hop symmetric concise bounded description of each term
/// into `graph`: every default-graph triple having the term as subject or
/// object. Terms are described once each.
pub(crate) fn describe_into_graph(
    dataset: &dyn PatternSource,
    terms: impl IntoIterator<Item = Term>,
    graph: &mut oxrdf::Graph,
) -> Result<(), QueryEvaluationError> {
    let mut described = FxHashSet::default();
    for term in terms {
        if !described.insert(term.clone()) {
            continue;
        }
        let subject_side = dataset.quads_for_pattern(Some(&term), None, None, GraphSelector::Default);
        let object_side = match &term {
            // A literal cannot be a subject, skip the useless scan.
            Term::Literal(_) => None,
            _ => Some(dataset.quads_for_pattern(None, None, Some(&term), GraphSelector::Default)),
        };
        for quad in subject_side.chain(object_side.into_iter().flatten()) {
            let quad = quad?;
            graph.insert(&oxrdf::Triple::new(quad.subject, quad.predicate, quad.object));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxrdf::Triple;

    fn ex(suffix: &str) -> NamedNode {
        NamedNode::new_unchecked(format!("http://example.com/{suffix}"))
    }

    #[test]
    fn graph_matching_honours_every_slot() {
        let graph = Graph::from_iter([
            Triple::new(ex("a"), ex("p"), ex("b")),
            Triple::new(ex("a"), ex("q"), ex("c")),
            Triple::new(ex("d"), ex("p"), ex("b")),
        ]);
        let subject = Term::from(ex("a"));
        let found = graph
            .quads_for_pattern(Some(&subject), Some(&ex("p")), None, GraphSelector::Default)
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].object, Term::from(ex("b")));
    }

    #[test]
    fn graph_has_no_named_graphs() {
        let graph = Graph::from_iter([Triple::new(ex("a"), ex("p"), ex("b"))]);
        assert_eq!(
            graph
                .quads_for_pattern(None, None, None, GraphSelector::AnyNamed)
                .count(),
            0
        );
    }

    #[test]
    fn dataset_matching_filters_by_graph_name() {
        let mut dataset = Dataset::new();
        dataset.insert(&Quad::new(ex("a"), ex("p"), ex("b"), GraphName::DefaultGraph));
        dataset.insert(&Quad::new(ex("a"), ex("p"), ex("c"), ex("g")));
        assert_eq!(
            dataset
                .quads_for_pattern(None, None, None, GraphSelector::Default)
                .count(),
            1
        );
        assert_eq!(
            dataset
                .quads_for_pattern(None, None, None, GraphSelector::Named(&ex("g")))
                .count(),
            1
        );
        assert_eq!(
            dataset
                .quads_for_pattern(None, None, None, GraphSelector::AnyNamed)
                .count(),
            1
        );
    }

    #[test]
    fn federation_deduplicates_across_members() {
        let a = Graph::from_iter([
            Triple::new(ex("a"), ex("p"), ex("b")),
            Triple::new(ex("a"), ex("p"), ex("c")),
        ]);
        let b = Graph::from_iter([Triple::new(ex("a"), ex("p"), ex("b"))]);
        let federation = Federation::new().with_member(a).with_member(b);
        assert_eq!(
            federation
                .quads_for_pattern(None, None, None, GraphSelector::Default)
                .count(),
            2
        );
    }
}
