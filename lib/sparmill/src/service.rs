//! Remote SPARQL endpoint dispatch.
//!
//! A query is printed to canonical SPARQL text and shipped over HTTP; the
//! response is negotiated per query kind (SPARQL Results XML/JSON for
//! SELECT/ASK, Turtle for DESCRIBE/CONSTRUCT) and parsed back into the
//! engine's result types.

use crate::dataset::{GraphSelector, PatternSource};
use crate::error::QueryEvaluationError;
use crate::http::Client;
use crate::model::{QueryResults, QuerySolutions};
use oxrdf::{Graph, GraphName, NamedNode, Quad, Subject, Term, Variable};
use sparbuild::{PatternGroup, QuadPattern, Query, TermPattern};
use sparesults::{QueryResultsFormat, QueryResultsParser, ReaderQueryResultsParserOutput};
use std::io::Read;
use std::time::Duration;
use tracing::debug;

const SELECT_ACCEPT: &str =
    "application/sparql-results+xml, application/sparql-results+json";
const GRAPH_ACCEPT: &str = "text/turtle";
/// GETs longer than this are downgraded to form-encoded POSTs.
const MAX_GET_URL_LENGTH: usize = 2048;
const REDIRECTION_LIMIT: usize = 5;

/// What a failed endpoint call turns into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EndpointErrorPolicy {
    /// Surface the failure to the caller.
    #[default]
    ThrowException,
    /// Swallow the failure and pretend the endpoint had no data.
    ReturnEmptyResult,
}

/// A remote SPARQL 1.1 Protocol endpoint.
///
/// Queries are dispatched whole through [`evaluate`](Self::evaluate); the
/// endpoint also acts as a [`PatternSource`], which lets it take part in a
/// [`Federation`](crate::Federation) next to local datasets.
///
/// ```no_run
/// use sparbuild::Query;
/// use sparmill::SparqlEndpoint;
///
/// let endpoint = SparqlEndpoint::new("https://query.wikidata.org/sparql")
///     .with_timeout(std::time::Duration::from_secs(30));
/// let _results = endpoint.evaluate(&Query::ask())?;
/// # Result::<_, sparmill::QueryEvaluationError>::Ok(())
/// ```
#[derive(Debug, Clone)]
pub struct SparqlEndpoint {
    base_url: String,
    parameters: Vec<(String, String)>,
    authorization: Option<String>,
    timeout: Option<Duration>,
    error_policy: EndpointErrorPolicy,
}

impl SparqlEndpoint {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            parameters: Vec::new(),
            authorization: None,
            timeout: None,
            error_policy: EndpointErrorPolicy::default(),
        }
    }

    /// Appends an extra query-string parameter to every request.
    #[inline]
    #[must_use]
    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.push((key.into(), value.into()));
        self
    }

    /// Sends the given value as the `Authorization` header of every request.
    #[inline]
    #[must_use]
    pub fn with_authorization(mut self, header_value: impl Into<String>) -> Self {
        self.authorization = Some(header_value.into());
        self
    }

    /// Per-call HTTP timeout.
    #[inline]
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[inline]
    #[must_use]
    pub fn with_error_policy(mut self, error_policy: EndpointErrorPolicy) -> Self {
        self.error_policy = error_policy;
        self
    }

    /// Dispatches a query and parses the response into the result type of
    /// its kind, honouring the endpoint's [`EndpointErrorPolicy`].
    pub fn evaluate(&self, query: &Query) -> Result<QueryResults, QueryEvaluationError> {
        match self.try_evaluate(query) {
            Ok(results) => Ok(results),
            Err(e) => match self.error_policy {
                EndpointErrorPolicy::ThrowException => Err(e),
                EndpointErrorPolicy::ReturnEmptyResult => {
                    debug!(endpoint = %self.base_url, error = %e, "endpoint failure swallowed");
                    Ok(empty_results(query))
                }
            },
        }
    }

    /// Like [`evaluate`](Self::evaluate), for SELECT queries.
    pub fn evaluate_select(&self, query: &Query) -> Result<QuerySolutions, QueryEvaluationError> {
        match self.evaluate(query)? {
            QueryResults::Solutions(solutions) => Ok(solutions),
            _ => Err(QueryEvaluationError::UnexpectedEndpointResult),
        }
    }

    fn try_evaluate(&self, query: &Query) -> Result<QueryResults, QueryEvaluationError> {
        let accept = match query {
            Query::Select { .. } | Query::Ask { .. } => SELECT_ACCEPT,
            Query::Describe { .. } | Query::Construct { .. } => GRAPH_ACCEPT,
        };
        let (content_type, body) = self.dispatch(&query.to_string(), accept)?;
        match query {
            Query::Select { .. } | Query::Ask { .. } => {
                let format = QueryResultsFormat::from_media_type(&content_type)
                    .ok_or(QueryEvaluationError::UnsupportedContentType(content_type))?;
                match QueryResultsParser::from_format(format)
                    .for_reader(body)
                    .map_err(endpoint_error)?
                {
                    ReaderQueryResultsParserOutput::Solutions(reader) => {
                        let variables: Vec<Variable> = reader.variables().to_vec();
                        let solutions = reader
                            .collect::<Result<Vec<_>, _>>()
                            .map_err(endpoint_error)?;
                        Ok(QueryResults::Solutions(QuerySolutions::new(
                            variables.into(),
                            solutions,
                        )))
                    }
                    ReaderQueryResultsParserOutput::Boolean(value) => {
                        Ok(QueryResults::Boolean(value))
                    }
                }
            }
            Query::Describe { .. } | Query::Construct { .. } => {
                if !content_type.starts_with("text/turtle") {
                    return Err(QueryEvaluationError::UnsupportedContentType(content_type));
                }
                let mut graph = Graph::new();
                for triple in oxttl::TurtleParser::new().for_reader(body) {
                    graph.insert(&triple.map_err(endpoint_error)?);
                }
                Ok(QueryResults::Graph(graph))
            }
        }
    }

    fn dispatch(
        &self,
        query_text: &str,
        accept: &'static str,
    ) -> Result<(String, impl Read), QueryEvaluationError> {
        debug!(endpoint = %self.base_url, "dispatching query to endpoint");
        let client = Client::new(self.timeout, REDIRECTION_LIMIT);
        let mut encoded = String::from("query=");
        url_encode_into(query_text, &mut encoded);
        for (key, value) in &self.parameters {
            encoded.push('&');
            url_encode_into(key, &mut encoded);
            encoded.push('=');
            url_encode_into(value, &mut encoded);
        }
        let get_url = format!("{}?{}", self.base_url, encoded);
        if get_url.len() <= MAX_GET_URL_LENGTH {
            client
                .get(&get_url, accept, self.authorization.as_deref())
                .map_err(endpoint_error)
        } else {
            client
                .post(
                    &self.base_url,
                    encoded.into_bytes(),
                    "application/x-www-form-urlencoded",
                    accept,
                    self.authorization.as_deref(),
                )
                .map_err(endpoint_error)
        }
    }
}

impl PatternSource for SparqlEndpoint {
    /// Matches a pattern by dispatching a generated single-pattern SELECT
    /// and rebuilding the quads from the returned bindings.
    fn quads_for_pattern<'a>(
        &'a self,
        subject: Option<&'a Term>,
        predicate: Option<&'a NamedNode>,
        object: Option<&'a Term>,
        graph: GraphSelector<'a>,
    ) -> Box<dyn Iterator<Item = Result<Quad, QueryEvaluationError>> + 'a> {
        let s_var = Variable::new_unchecked("s");
        let p_var = Variable::new_unchecked("p");
        let o_var = Variable::new_unchecked("o");
        let g_var = Variable::new_unchecked("g");
        let mut pattern = QuadPattern::new(
            subject.map_or_else(|| TermPattern::from(s_var.clone()), |s| s.clone().into()),
            predicate.map_or_else(
                || sparbuild::NamedNodePattern::from(p_var.clone()),
                |p| p.clone().into(),
            ),
            object.map_or_else(|| TermPattern::from(o_var.clone()), |o| o.clone().into()),
        );
        pattern = match graph {
            GraphSelector::Default => pattern,
            GraphSelector::Named(g) => pattern.in_graph(g.clone()),
            GraphSelector::AnyNamed => pattern.in_graph(g_var.clone()),
        };
        let query = Query::select().with_group(PatternGroup::new().with_pattern(pattern));
        let solutions = match self.evaluate_select(&query) {
            Ok(solutions) => solutions,
            Err(e) => return Box::new(std::iter::once(Err(e))),
        };
        let graph_name = match graph {
            GraphSelector::Named(g) => Some(GraphName::from(g.clone())),
            _ => None,
        };
        Box::new(solutions.into_iter().filter_map(move |solution| {
            let subject: Subject = match subject {
                Some(Term::NamedNode(n)) => n.clone().into(),
                Some(Term::BlankNode(b)) => b.clone().into(),
                Some(Term::Literal(_)) => return None,
                None => match solution.get(&s_var)? {
                    Term::NamedNode(n) => n.clone().into(),
                    Term::BlankNode(b) => b.clone().into(),
                    Term::Literal(_) => return None,
                },
            };
            let predicate = match predicate {
                Some(p) => p.clone(),
                None => match solution.get(&p_var)? {
                    Term::NamedNode(p) => p.clone(),
                    _ => return None,
                },
            };
            let object = match object {
                Some(o) => o.clone(),
                None => solution.get(&o_var)?.clone(),
            };
            let graph_name = match &graph_name {
                Some(graph_name) => graph_name.clone(),
                None => match graph {
                    GraphSelector::Default => GraphName::DefaultGraph,
                    _ => match solution.get(&g_var)? {
                        Term::NamedNode(g) => g.clone().into(),
                        Term::BlankNode(g) => g.clone().into(),
                        Term::Literal(_) => return None,
                    },
                },
            };
            Some(Ok(Quad::new(subject, predicate, object, graph_name)))
        }))
    }
}

fn empty_results(query: &Query) -> QueryResults {
    match query {
        Query::Select { .. } => {
            let mut variables = Vec::new();
            query.on_projected_variables(&mut |v| {
                if !variables.contains(v) {
                    variables.push(v.clone());
                }
            });
            QueryResults::Solutions(QuerySolutions::from_tuples(variables, []))
        }
        Query::Ask { .. } => QueryResults::Boolean(false),
        Query::Describe { .. } | Query::Construct { .. } => QueryResults::Graph(Graph::new()),
    }
}

fn endpoint_error(error: impl std::error::Error + Send + Sync + 'static) -> QueryEvaluationError {
    QueryEvaluationError::Endpoint(Box::new(error))
}

fn url_encode_into(value: &str, target: &mut String) {
    for byte in value.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.' | b'~') {
            target.push(char::from(byte));
        } else {
            target.push('%');
            target.push(char::from_digit(u32::from(byte >> 4), 16).unwrap_or('0').to_ascii_uppercase());
            target.push(char::from_digit(u32::from(byte & 0xF), 16).unwrap_or('0').to_ascii_uppercase());
        }
    }
}
