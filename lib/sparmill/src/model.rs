use oxrdf::{Graph, Term, Variable};
pub use sparesults::QuerySolution;
use std::sync::Arc;

/// Results of a [SPARQL query](https://www.w3.org/TR/sparql11-query/).
#[derive(Debug)]
pub enum QueryResults {
    /// Results of a [SELECT](https://www.w3.org/TR/sparql11-query/#select) query.
    Solutions(QuerySolutions),
    /// Result of an [ASK](https://www.w3.org/TR/sparql11-query/#ask) query.
    Boolean(bool),
    /// Results of a [CONSTRUCT](https://www.w3.org/TR/sparql11-query/#construct)
    /// or [DESCRIBE](https://www.w3.org/TR/sparql11-query/#describe) query.
    Graph(Graph),
}

impl QueryResults {
    /// The solutions, if this is a SELECT result.
    pub fn into_solutions(self) -> Option<QuerySolutions> {
        if let Self::Solutions(solutions) = self {
            Some(solutions)
        } else {
            None
        }
    }

    /// The graph, if this is a CONSTRUCT or DESCRIBE result.
    pub fn into_graph(self) -> Option<Graph> {
        if let Self::Graph(graph) = self {
            Some(graph)
        } else {
            None
        }
    }
}

impl From<QuerySolutions> for QueryResults {
    #[inline]
    fn from(value: QuerySolutions) -> Self {
        Self::Solutions(value)
    }
}

impl From<bool> for QueryResults {
    #[inline]
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<Graph> for QueryResults {
    #[inline]
    fn from(value: Graph) -> Self {
        Self::Graph(value)
    }
}

/// The materialised binding table of a SELECT query: the declared variable
/// order plus one [`QuerySolution`] per result row.
///
/// ```
/// use oxrdf::{Graph, NamedNode, Triple, Variable};
/// use sparbuild::{PatternGroup, QuadPattern, Query};
/// use sparmill::QueryEngine;
///
/// let ex = NamedNode::new("http://example.com")?;
/// let graph = Graph::from_iter([Triple::new(ex.clone(), ex.clone(), ex.clone())]);
/// let query = Query::select().with_group(PatternGroup::new().with_pattern(
///     QuadPattern::new(Variable::new("s")?, Variable::new("p")?, Variable::new("o")?),
/// ));
/// let solutions = QueryEngine::new().evaluate_select(&query, &graph)?;
/// assert_eq!(solutions.len(), 1);
/// assert_eq!(solutions.iter().next().unwrap().get("s"), Some(&ex.into()));
/// # Result::<_, Box<dyn std::error::Error>>::Ok(())
/// ```
#[derive(Debug, Default)]
pub struct QuerySolutions {
    variables: Arc<[Variable]>,
    solutions: Vec<QuerySolution>,
}

impl QuerySolutions {
    pub(crate) fn new(variables: Arc<[Variable]>, solutions: Vec<QuerySolution>) -> Self {
        Self {
            variables,
            solutions,
        }
    }

    /// Builds a result from rows of solution tuples, each tuple using the
    /// same ordering as the variable list.
    pub fn from_tuples(
        variables: impl Into<Arc<[Variable]>>,
        tuples: impl IntoIterator<Item = Vec<Option<Term>>>,
    ) -> Self {
        let variables = variables.into();
        Self {
            solutions: tuples
                .into_iter()
                .map(|values| (Arc::clone(&variables), values).into())
                .collect(),
            variables,
        }
    }

    /// The declared variable order of the result.
    #[inline]
    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.solutions.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.solutions.is_empty()
    }

    #[inline]
    pub fn iter(&self) -> std::slice::Iter<'_, QuerySolution> {
        self.solutions.iter()
    }
}

impl IntoIterator for QuerySolutions {
    type Item = QuerySolution;
    type IntoIter = std::vec::IntoIter<QuerySolution>;

    #[inline]
    fn into_iter(self) -> Self::IntoIter {
        self.solutions.into_iter()
    }
}

impl<'a> IntoIterator for &'a QuerySolutions {
    type Item = &'a QuerySolution;
    type IntoIter = std::slice::Iter<'a, QuerySolution>;

    #[inline]
    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
