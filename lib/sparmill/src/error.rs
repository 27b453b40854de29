use oxrdf::Variable;
use std::convert::Infallible;
use std::error::Error;

/// A SPARQL evaluation error.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum QueryEvaluationError {
    /// The query is structurally invalid. Detected during normalisation,
    /// before any data is touched.
    #[error(transparent)]
    Malformed(#[from] MalformedQueryError),
    /// Error from the underlying RDF dataset.
    #[error(transparent)]
    Dataset(Box<dyn Error + Send + Sync>),
    /// Error while talking to a remote SPARQL endpoint.
    #[error("{0}")]
    Endpoint(#[source] Box<dyn Error + Send + Sync>),
    /// A remote endpoint answered with a media type this engine cannot read.
    #[error("The endpoint returned an unsupported content type: {0}")]
    UnsupportedContentType(String),
    /// A remote endpoint answered a SELECT/ASK dispatch with a graph or vice versa.
    #[error("The endpoint returned a result of the wrong kind for the query")]
    UnexpectedEndpointResult,
}

/// A structural violation of the query, reported before evaluation starts.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum MalformedQueryError {
    /// A projected variable is neither bound by any pattern group nor by an
    /// expression binding.
    #[error("The projected variable {0} is not bound by any pattern group or expression")]
    ProjectionOutOfScope(Variable),
    /// A DESCRIBE variable target does not appear in any pattern group.
    #[error("The DESCRIBE variable {0} does not appear in any pattern group")]
    DescribeVariableOutOfScope(Variable),
    /// Negation filters must not wrap EXISTS.
    #[error("A negation filter cannot wrap an EXISTS expression")]
    NegatedExists,
    /// HAVING without GROUP BY.
    #[error("HAVING requires a GROUP BY clause")]
    HavingWithoutGroupBy,
}

impl From<Infallible> for QueryEvaluationError {
    #[inline]
    fn from(error: Infallible) -> Self {
        match error {}
    }
}
