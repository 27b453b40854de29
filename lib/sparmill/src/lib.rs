#![doc = include_str!("../README.md")]
#![doc(test(attr(deny(warnings))))]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

mod aggregate;
mod dataset;
mod error;
mod eval;
mod expression;
mod http;
mod model;
mod path;
mod service;
mod table;

pub use crate::dataset::{Federation, GraphSelector, PatternSource};
pub use crate::error::{MalformedQueryError, QueryEvaluationError};
pub use crate::model::{QueryResults, QuerySolution, QuerySolutions};
pub use crate::service::{EndpointErrorPolicy, SparqlEndpoint};
pub use crate::table::BindingTable;
use crate::eval::Evaluator;
use oxrdf::Graph;
use sparbuild::Query;

/// Evaluates [`sparbuild::Query`] objects against anything implementing
/// [`PatternSource`]: in-memory graphs, quad datasets, federations and
/// remote endpoints.
///
/// Evaluation is single-threaded per query and reads the dataset only;
/// several queries may run in parallel against the same dataset when it is
/// safe to read concurrently. The engine owns every intermediate binding
/// table and discards them once the result is materialised.
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
/// # Result::<_, Box<dyn std::error::Error>>::Ok(())
/// ```
#[derive(Clone, Default)]
pub struct QueryEngine {
    _private: (),
}

impl QueryEngine {
    #[must_use]
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluates any query, dispatching on its kind.
    pub fn evaluate(
        &self,
        query: &Query,
        dataset: &dyn PatternSource,
    ) -> Result<QueryResults, QueryEvaluationError> {
        Ok(match query {
            Query::Select { .. } => {
                QueryResults::Solutions(Evaluator::new(dataset).select(query)?)
            }
            Query::Ask { .. } => QueryResults::Boolean(Evaluator::new(dataset).ask(query)?),
            Query::Construct { .. } => {
                QueryResults::Graph(Evaluator::new(dataset).construct(query)?)
            }
            Query::Describe { .. } => {
                QueryResults::Graph(Evaluator::new(dataset).describe(query)?)
            }
        })
    }

    /// Evaluates a SELECT query to its binding table.
    ///
    /// Errors with [`MalformedQueryError`] wrapped in
    /// [`QueryEvaluationError::Malformed`] if the query is structurally
    /// invalid, and panics if the query is not a SELECT.
    pub fn evaluate_select(
        &self,
        query: &Query,
        dataset: &dyn PatternSource,
    ) -> Result<QuerySolutions, QueryEvaluationError> {
        assert!(
            matches!(query, Query::Select { .. }),
            "evaluate_select requires a SELECT query"
        );
        Evaluator::new(dataset).select(query)
    }

    /// Evaluates an ASK query: true iff the combined group table is non-empty.
    pub fn evaluate_ask(
        &self,
        query: &Query,
        dataset: &dyn PatternSource,
    ) -> Result<bool, QueryEvaluationError> {
        assert!(
            matches!(query, Query::Ask { .. }),
            "evaluate_ask requires an ASK query"
        );
        Evaluator::new(dataset).ask(query)
    }

    /// Evaluates a CONSTRUCT query: the template instantiated once per
    /// solution row, deduplicated into a graph.
    pub fn evaluate_construct(
        &self,
        query: &Query,
        dataset: &dyn PatternSource,
    ) -> Result<Graph, QueryEvaluationError> {
        assert!(
            matches!(query, Query::Construct { .. }),
            "evaluate_construct requires a CONSTRUCT query"
        );
        Evaluator::new(dataset).construct(query)
    }

    /// Evaluates a DESCRIBE query: the one-hop symmetric description of
    /// every listed term and every value bound to a describe variable.
    pub fn evaluate_describe(
        &self,
        query: &Query,
        dataset: &dyn PatternSource,
    ) -> Result<Graph, QueryEvaluationError> {
        assert!(
            matches!(query, Query::Describe { .. }),
            "evaluate_describe requires a DESCRIBE query"
        );
        Evaluator::new(dataset).describe(query)
    }
}

/// Asynchronous entry points.
///
/// Each wraps the synchronous evaluation on a blocking worker task; no
/// intra-query parallelism is introduced.
#[cfg(feature = "async-tokio")]
impl QueryEngine {
    pub async fn evaluate_async<D>(
        &self,
        query: Query,
        dataset: D,
    ) -> Result<QueryResults, QueryEvaluationError>
    where
        D: PatternSource + Send + 'static,
    {
        let engine = self.clone();
        spawn_evaluation(move || engine.evaluate(&query, &dataset)).await
    }

    pub async fn evaluate_select_async<D>(
        &self,
        query: Query,
        dataset: D,
    ) -> Result<QuerySolutions, QueryEvaluationError>
    where
        D: PatternSource + Send + 'static,
    {
        let engine = self.clone();
        spawn_evaluation(move || engine.evaluate_select(&query, &dataset)).await
    }

    pub async fn evaluate_ask_async<D>(
        &self,
        query: Query,
        dataset: D,
    ) -> Result<bool, QueryEvaluationError>
    where
        D: PatternSource + Send + 'static,
    {
        let engine = self.clone();
        spawn_evaluation(move || engine.evaluate_ask(&query, &dataset)).await
    }

    pub async fn evaluate_construct_async<D>(
        &self,
        query: Query,
        dataset: D,
    ) -> Result<Graph, QueryEvaluationError>
    where
        D: PatternSource + Send + 'static,
    {
        let engine = self.clone();
        spawn_evaluation(move || engine.evaluate_construct(&query, &dataset)).await
    }

    pub async fn evaluate_describe_async<D>(
        &self,
        query: Query,
        dataset: D,
    ) -> Result<Graph, QueryEvaluationError>
    where
        D: PatternSource + Send + 'static,
    {
        let engine = self.clone();
        spawn_evaluation(move || engine.evaluate_describe(&query, &dataset)).await
    }
}

#[cfg(feature = "async-tokio")]
async fn spawn_evaluation<T: Send + 'static>(
    evaluation: impl FnOnce() -> T + Send + 'static,
) -> T {
    match tokio::task::spawn_blocking(evaluation).await {
        Ok(result) => result,
        // spawn_blocking tasks are never aborted, so a join failure is a
        // propagated panic from the evaluation itself.
        Err(e) => std::panic::resume_unwind(e.into_panic()),
    }
}
