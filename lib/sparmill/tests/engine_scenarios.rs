//! End-to-end evaluation over small in-memory graphs.

use oxrdf::vocab::xsd;
use oxrdf::{Dataset, Graph, GraphName, Literal, NamedNode, Quad, Term, Triple, Variable};
use sparbuild::{
    AggregateExpression, DescribeTarget, Expression, GroupBy, OrderComparator, PathPattern,
    PatternGroup, PropertyPath, QuadPattern, Query, TriplePattern, ValuesBlock,
};
use sparmill::{Federation, MalformedQueryError, QueryEngine, QueryEvaluationError};

fn ex(suffix: &str) -> NamedNode {
    NamedNode::new_unchecked(format!("http://example.com/{suffix}"))
}

fn var(name: &str) -> Variable {
    Variable::new_unchecked(name)
}

fn int(value: i64) -> Term {
    Literal::new_typed_literal(value.to_string(), xsd::INTEGER).into()
}

fn knows_graph() -> Graph {
    Graph::from_iter([
        Triple::new(ex("a"), ex("knows"), ex("b")),
        Triple::new(ex("b"), ex("knows"), ex("c")),
        Triple::new(ex("a"), ex("knows"), ex("c")),
    ])
}

/// Rows of a SELECT result as display strings, for compact assertions.
fn rows(query: &Query, dataset: &dyn sparmill::PatternSource) -> Vec<Vec<Option<String>>> {
    QueryEngine::new()
        .evaluate_select(query, dataset)
        .unwrap()
        .iter()
        .map(|solution| {
            solution
                .values()
                .iter()
                .map(|cell| cell.as_ref().map(ToString::to_string))
                .collect()
        })
        .collect()
}

fn iri_cell(suffix: &str) -> Option<String> {
    Some(format!("<http://example.com/{suffix}>"))
}

#[test]
fn select_with_order_by_enumerates_matches() {
    let query = Query::select()
        .with_group(
            PatternGroup::new().with_pattern(QuadPattern::new(var("x"), ex("knows"), var("y"))),
        )
        .with_projection([var("x"), var("y")])
        .with_order_by(OrderComparator::Asc(var("x")))
        .with_order_by(OrderComparator::Asc(var("y")));
    assert_eq!(
        rows(&query, &knows_graph()),
        vec![
            vec![iri_cell("a"), iri_cell("b")],
            vec![iri_cell("a"), iri_cell("c")],
            vec![iri_cell("b"), iri_cell("c")],
        ]
    );
}

#[test]
fn group_by_with_count() {
    let query = Query::select()
        .with_group(
            PatternGroup::new().with_pattern(QuadPattern::new(var("x"), ex("knows"), var("y"))),
        )
        .with_group_by(
            GroupBy::new([var("x")]).with_aggregate(var("n"), AggregateExpression::count(var("y"))),
        )
        .with_projection([var("x"), var("n")])
        .with_order_by(OrderComparator::Asc(var("x")));
    assert_eq!(
        rows(&query, &knows_graph()),
        vec![
            vec![
                iri_cell("a"),
                Some("\"2\"^^<http://www.w3.org/2001/XMLSchema#integer>".into())
            ],
            vec![
                iri_cell("b"),
                Some("\"1\"^^<http://www.w3.org/2001/XMLSchema#integer>".into())
            ],
        ]
    );
}

#[test]
fn ungrouped_sum_aggregates_the_whole_table_to_a_double() {
    let graph = Graph::from_iter([
        Triple::new(ex("a"), ex("p"), Literal::from(1)),
        Triple::new(ex("a"), ex("p"), Literal::from(2)),
        Triple::new(ex("b"), ex("p"), Literal::from(3)),
    ]);
    let query = Query::select()
        .with_group(PatternGroup::new().with_pattern(QuadPattern::new(var("x"), ex("p"), var("v"))))
        .with_group_by(GroupBy::new([]).with_aggregate(var("s"), AggregateExpression::sum(var("v"))))
        .with_projection([var("s")]);
    let solutions = QueryEngine::new().evaluate_select(&query, &graph).unwrap();
    assert_eq!(solutions.len(), 1);
    let Some(Term::Literal(sum)) = solutions.iter().next().unwrap().get("s") else {
        panic!("SUM must produce a literal")
    };
    assert_eq!(sum.datatype(), xsd::DOUBLE);
    assert_eq!(sum.value().parse::<f64>().unwrap(), 6.0);
}

#[test]
fn optional_group_preserves_rows_without_a_partner() {
    let graph = Graph::from_iter([Triple::new(ex("a"), ex("p"), ex("b"))]);
    let query = Query::select()
        .with_group(PatternGroup::new().with_pattern(QuadPattern::new(var("x"), ex("p"), var("z"))))
        .with_group(
            PatternGroup::new()
                .with_pattern(QuadPattern::new(var("z"), ex("q"), var("y")))
                .optional(),
        )
        .with_projection([var("x"), var("y")]);
    assert_eq!(rows(&query, &graph), vec![vec![iri_cell("a"), None]]);
}

#[test]
fn minus_group_removes_compatible_rows() {
    let graph = Graph::from_iter([
        Triple::new(ex("a"), ex("p"), Literal::from(1)),
        Triple::new(ex("b"), ex("p"), Literal::from(2)),
    ]);
    let query = Query::select()
        .with_group(PatternGroup::new().with_pattern(QuadPattern::new(var("x"), ex("p"), var("v"))))
        .with_group(
            PatternGroup::new()
                .with_pattern(QuadPattern::new(var("x"), ex("p"), Literal::from(2)))
                .minus(),
        )
        .with_projection([var("x")]);
    assert_eq!(rows(&query, &graph), vec![vec![iri_cell("a")]]);
}

#[test]
fn union_group_concatenates_branches() {
    let graph = Graph::from_iter([
        Triple::new(ex("a"), ex("p"), ex("x")),
        Triple::new(ex("b"), ex("q"), ex("x")),
    ]);
    let query = Query::select()
        .with_group(PatternGroup::new().with_pattern(QuadPattern::new(var("s"), ex("p"), var("o"))))
        .with_group(
            PatternGroup::new()
                .with_pattern(QuadPattern::new(var("s"), ex("q"), var("o")))
                .union_with_previous(),
        )
        .with_projection([var("s")])
        .with_order_by(OrderComparator::Asc(var("s")));
    assert_eq!(rows(&query, &graph), vec![vec![iri_cell("a")], vec![iri_cell("b")]]);
}

#[test]
fn describe_is_the_symmetric_one_hop_description() {
    let graph = Graph::from_iter([
        Triple::new(ex("a"), ex("p"), ex("b")),
        Triple::new(ex("c"), ex("q"), ex("a")),
        Triple::new(ex("b"), ex("r"), ex("c")),
    ]);
    let result = QueryEngine::new()
        .evaluate_describe(&Query::describe([ex("a")]), &graph)
        .unwrap();
    assert_eq!(result.len(), 2);
    assert!(result.contains(&Triple::new(ex("a"), ex("p"), ex("b"))));
    assert!(result.contains(&Triple::new(ex("c"), ex("q"), ex("a"))));

    // A term with no incident triple describes to the empty graph.
    let empty = QueryEngine::new()
        .evaluate_describe(&Query::describe([ex("unknown")]), &graph)
        .unwrap();
    assert!(empty.is_empty());
}

#[test]
fn describe_variable_targets_describe_their_bindings() {
    let graph = Graph::from_iter([
        Triple::new(ex("a"), ex("p"), ex("b")),
        Triple::new(ex("b"), ex("r"), ex("c")),
    ]);
    let query = Query::describe([DescribeTarget::Variable(var("y"))]).with_group(
        PatternGroup::new().with_pattern(QuadPattern::new(ex("a"), ex("p"), var("y"))),
    );
    let result = QueryEngine::new().evaluate_describe(&query, &graph).unwrap();
    assert_eq!(result.len(), 2);
    assert!(result.contains(&Triple::new(ex("b"), ex("r"), ex("c"))));
}

#[test]
fn ask_reports_match_existence() {
    let engine = QueryEngine::new();
    let graph = knows_graph();
    let hit = Query::ask().with_group(
        PatternGroup::new().with_pattern(QuadPattern::new(ex("a"), ex("knows"), var("o"))),
    );
    assert!(engine.evaluate_ask(&hit, &graph).unwrap());
    let miss = Query::ask().with_group(
        PatternGroup::new().with_pattern(QuadPattern::new(ex("c"), ex("knows"), var("o"))),
    );
    assert!(!engine.evaluate_ask(&miss, &graph).unwrap());
}

#[test]
fn construct_instantiates_and_deduplicates() {
    let query = Query::construct([TriplePattern::new(var("y"), ex("knownBy"), var("x"))])
        .with_group(
            PatternGroup::new().with_pattern(QuadPattern::new(var("x"), ex("knows"), var("y"))),
        );
    let graph = QueryEngine::new()
        .evaluate_construct(&query, &knows_graph())
        .unwrap();
    assert_eq!(graph.len(), 3);
    assert!(graph.contains(&Triple::new(ex("b"), ex("knownBy"), ex("a"))));
}

#[test]
fn construct_renames_template_blank_nodes_per_row() {
    let bnode = oxrdf::BlankNode::default();
    let query = Query::construct([
        TriplePattern::new(bnode.clone(), ex("about"), var("x")),
        TriplePattern::new(bnode, ex("seen"), var("y")),
    ])
    .with_group(PatternGroup::new().with_pattern(QuadPattern::new(var("x"), ex("knows"), var("y"))));
    let graph = QueryEngine::new()
        .evaluate_construct(&query, &knows_graph())
        .unwrap();
    // Three rows, two triples each, all subjects fresh per row.
    assert_eq!(graph.len(), 6);
    let subjects: std::collections::HashSet<_> = graph.iter().map(|t| t.subject).collect();
    assert_eq!(subjects.len(), 3);
}

#[test]
fn filters_swallow_expression_errors_as_false() {
    let graph = Graph::from_iter([
        Triple::new(ex("a"), ex("p"), Literal::from(10)),
        Triple::new(ex("b"), ex("p"), Literal::from("not a number")),
    ]);
    let query = Query::select()
        .with_group(
            PatternGroup::new()
                .with_pattern(QuadPattern::new(var("x"), ex("p"), var("v")))
                .with_filter(Expression::greater(var("v"), Literal::from(5))),
        )
        .with_projection([var("x")]);
    // The non-numeric row errors inside the filter and is dropped, not fatal.
    assert_eq!(rows(&query, &graph), vec![vec![iri_cell("a")]]);
}

#[test]
fn values_blocks_join_into_the_group() {
    let query = Query::select()
        .with_group(
            PatternGroup::new()
                .with_pattern(QuadPattern::new(var("x"), ex("knows"), var("y")))
                .with_values(
                    ValuesBlock::new([var("x")]).with_row([Some(ex("a").into())]),
                ),
        )
        .with_projection([var("x"), var("y")])
        .with_order_by(OrderComparator::Asc(var("y")));
    assert_eq!(
        rows(&query, &knows_graph()),
        vec![
            vec![iri_cell("a"), iri_cell("b")],
            vec![iri_cell("a"), iri_cell("c")],
        ]
    );
}

#[test]
fn property_path_one_or_more_reaches_transitively() {
    let graph = Graph::from_iter([
        Triple::new(ex("a"), ex("p"), ex("b")),
        Triple::new(ex("b"), ex("p"), ex("c")),
    ]);
    let query = Query::select()
        .with_group(PatternGroup::new().with_path(PathPattern::new(
            ex("a"),
            PropertyPath::from(ex("p")).one_or_more(),
            var("y"),
        )))
        .with_projection([var("y")])
        .with_order_by(OrderComparator::Asc(var("y")));
    assert_eq!(rows(&query, &graph), vec![vec![iri_cell("b")], vec![iri_cell("c")]]);
}

#[test]
fn subselects_evaluate_recursively() {
    let inner = Query::select()
        .with_group(
            PatternGroup::new().with_pattern(QuadPattern::new(var("x"), ex("knows"), var("y"))),
        )
        .with_group_by(
            GroupBy::new([var("x")]).with_aggregate(var("n"), AggregateExpression::count(var("y"))),
        )
        .with_projection([var("x"), var("n")]);
    let query = Query::select()
        .with_group(
            PatternGroup::new()
                .with_pattern(QuadPattern::new(var("x"), ex("knows"), var("z")))
                .with_subselect(inner)
                .with_filter(Expression::greater(var("n"), Literal::from(1))),
        )
        .with_projection([var("x")])
        .distinct();
    assert_eq!(rows(&query, &knows_graph()), vec![vec![iri_cell("a")]]);
}

#[test]
fn modifier_pipeline_orders_then_slices() {
    let graph = Graph::from_iter(
        (0..10).map(|i| Triple::new(ex("s"), ex("p"), Literal::from(i))),
    );
    let query = Query::select()
        .with_group(PatternGroup::new().with_pattern(QuadPattern::new(ex("s"), ex("p"), var("v"))))
        .with_projection([var("v")])
        .with_order_by(OrderComparator::Desc(var("v")))
        .with_offset(2)
        .with_limit(3);
    assert_eq!(
        rows(&query, &graph)
            .into_iter()
            .map(|row| row[0].clone().unwrap())
            .collect::<Vec<_>>(),
        vec![
            int(7).to_string(),
            int(6).to_string(),
            int(5).to_string()
        ]
    );
}

#[test]
fn expression_bindings_extend_the_projection() {
    let graph = Graph::from_iter([Triple::new(ex("s"), ex("p"), Literal::from(21))]);
    let query = Query::select()
        .with_group(PatternGroup::new().with_pattern(QuadPattern::new(ex("s"), ex("p"), var("v"))))
        .with_binding(var("w"), Expression::multiply(var("v"), Literal::from(2)))
        .with_projection([var("w")]);
    assert_eq!(rows(&query, &graph), vec![vec![Some(int(42).to_string())]]);
}

#[test]
fn projecting_an_unknown_variable_is_malformed() {
    let query = Query::select()
        .with_group(PatternGroup::new().with_pattern(QuadPattern::new(var("x"), ex("p"), var("v"))))
        .with_projection([var("nope")]);
    let error = QueryEngine::new()
        .evaluate_select(&query, &Graph::new())
        .unwrap_err();
    assert!(matches!(
        error,
        QueryEvaluationError::Malformed(MalformedQueryError::ProjectionOutOfScope(v)) if v == var("nope")
    ));
}

#[test]
fn negation_must_not_wrap_exists() {
    let query = Query::select().with_group(
        PatternGroup::new()
            .with_pattern(QuadPattern::new(var("x"), ex("p"), var("v")))
            .with_filter(Expression::not(Expression::exists(QuadPattern::new(
                var("x"),
                ex("q"),
                var("w"),
            )))),
    );
    let error = QueryEngine::new()
        .evaluate_select(&query, &Graph::new())
        .unwrap_err();
    assert!(matches!(
        error,
        QueryEvaluationError::Malformed(MalformedQueryError::NegatedExists)
    ));
}

#[test]
fn blank_nodes_in_patterns_are_existentials() {
    let graph = Graph::from_iter([Triple::new(ex("a"), ex("p"), ex("b"))]);
    // The blank node must match :a, not look for a blank node in the data.
    let query = Query::ask().with_group(PatternGroup::new().with_pattern(QuadPattern::new(
        oxrdf::BlankNode::default(),
        ex("p"),
        var("o"),
    )));
    assert!(QueryEngine::new().evaluate_ask(&query, &graph).unwrap());
}

#[test]
fn quad_patterns_match_named_graphs() {
    let mut dataset = Dataset::new();
    dataset.insert(&Quad::new(ex("a"), ex("p"), ex("b"), GraphName::DefaultGraph));
    dataset.insert(&Quad::new(ex("a"), ex("p"), ex("c"), ex("g1")));
    dataset.insert(&Quad::new(ex("a"), ex("p"), ex("d"), ex("g2")));

    // Patterns without a graph slot see the default graph only.
    let default_only = Query::select()
        .with_group(PatternGroup::new().with_pattern(QuadPattern::new(ex("a"), ex("p"), var("o"))))
        .with_projection([var("o")]);
    assert_eq!(rows(&default_only, &dataset), vec![vec![iri_cell("b")]]);

    // A variable graph slot enumerates the named graphs.
    let named = Query::select()
        .with_group(
            PatternGroup::new()
                .with_pattern(QuadPattern::new(ex("a"), ex("p"), var("o")).in_graph(var("g"))),
        )
        .with_projection([var("g"), var("o")])
        .with_order_by(OrderComparator::Asc(var("g")));
    assert_eq!(
        rows(&named, &dataset),
        vec![
            vec![iri_cell("g1"), iri_cell("c")],
            vec![iri_cell("g2"), iri_cell("d")],
        ]
    );
}

#[test]
fn federation_members_union_with_dedup() {
    let a = Graph::from_iter([
        Triple::new(ex("a"), ex("p"), ex("b")),
        Triple::new(ex("a"), ex("p"), ex("c")),
    ]);
    let b = Graph::from_iter([
        Triple::new(ex("a"), ex("p"), ex("b")),
        Triple::new(ex("a"), ex("p"), ex("d")),
    ]);
    let federation = Federation::new().with_member(a).with_member(b);
    let query = Query::select()
        .with_group(PatternGroup::new().with_pattern(QuadPattern::new(ex("a"), ex("p"), var("o"))))
        .with_projection([var("o")])
        .with_order_by(OrderComparator::Asc(var("o")));
    assert_eq!(
        rows(&query, &federation),
        vec![vec![iri_cell("b")], vec![iri_cell("c")], vec![iri_cell("d")]]
    );
}

#[test]
fn optional_patterns_within_a_group() {
    let graph = Graph::from_iter([
        Triple::new(ex("a"), ex("p"), ex("b")),
        Triple::new(ex("c"), ex("p"), ex("d")),
        Triple::new(ex("b"), ex("label"), Literal::from("B")),
    ]);
    let query = Query::select()
        .with_group(
            PatternGroup::new()
                .with_pattern(QuadPattern::new(var("x"), ex("p"), var("y")))
                .with_optional_pattern(QuadPattern::new(var("y"), ex("label"), var("l"))),
        )
        .with_projection([var("x"), var("l")])
        .with_order_by(OrderComparator::Asc(var("x")));
    assert_eq!(
        rows(&query, &graph),
        vec![
            vec![iri_cell("a"), Some("\"B\"".into())],
            vec![iri_cell("c"), None],
        ]
    );
}

#[test]
fn union_patterns_within_a_group() {
    let graph = Graph::from_iter([
        Triple::new(ex("a"), ex("p"), ex("x")),
        Triple::new(ex("b"), ex("q"), ex("y")),
    ]);
    let query = Query::select()
        .with_group(
            PatternGroup::new()
                .with_union_pattern(QuadPattern::new(var("s"), ex("p"), var("o")))
                .with_pattern(QuadPattern::new(var("s"), ex("q"), var("o"))),
        )
        .with_projection([var("s")])
        .with_order_by(OrderComparator::Asc(var("s")));
    assert_eq!(rows(&query, &graph), vec![vec![iri_cell("a")], vec![iri_cell("b")]]);
}

#[test]
fn having_filters_grouped_rows() {
    let query = Query::select()
        .with_group(
            PatternGroup::new().with_pattern(QuadPattern::new(var("x"), ex("knows"), var("y"))),
        )
        .with_group_by(
            GroupBy::new([var("x")]).with_aggregate(var("n"), AggregateExpression::count(var("y"))),
        )
        .with_having(Expression::greater(var("n"), Literal::from(1)))
        .with_projection([var("x")]);
    assert_eq!(rows(&query, &knows_graph()), vec![vec![iri_cell("a")]]);
}

#[test]
fn distinct_connects_to_the_pipeline_after_ordering() {
    let graph = Graph::from_iter([
        Triple::new(ex("a"), ex("p"), ex("x")),
        Triple::new(ex("a"), ex("q"), ex("x")),
        Triple::new(ex("b"), ex("p"), ex("x")),
    ]);
    let query = Query::select()
        .with_group(PatternGroup::new().with_pattern(QuadPattern::new(var("s"), var("p"), var("o"))))
        .with_projection([var("s")])
        .with_order_by(OrderComparator::Asc(var("s")))
        .distinct();
    assert_eq!(rows(&query, &graph), vec![vec![iri_cell("a")], vec![iri_cell("b")]]);
}

#[test]
fn queries_are_reusable_across_datasets() {
    let query = Query::ask().with_group(
        PatternGroup::new().with_pattern(QuadPattern::new(var("s"), ex("knows"), var("o"))),
    );
    let engine = QueryEngine::new();
    assert!(engine.evaluate_ask(&query, &knows_graph()).unwrap());
    assert!(!engine.evaluate_ask(&query, &Graph::new()).unwrap());
}
