//! The query algebra: property paths, expressions, pattern groups and
//! solution modifiers, with their canonical SPARQL 1.1 surface rendering.

use crate::query::Query;
use crate::term::*;
use std::fmt;

/// A [property path expression](https://www.w3.org/TR/sparql11-query/#defn_PropertyPathExpr):
/// a small regular algebra over predicate IRIs.
///
/// Evaluation yields a set of `(start, end)` term pairs.
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub enum PropertyPath {
    Predicate(NamedNode),
    Reverse(Box<Self>),
    Sequence(Box<Self>, Box<Self>),
    Alternative(Box<Self>, Box<Self>),
    ZeroOrOne(Box<Self>),
    ZeroOrMore(Box<Self>),
    OneOrMore(Box<Self>),
}

impl PropertyPath {
    #[inline]
    #[must_use]
    pub fn reverse(self) -> Self {
        Self::Reverse(Box::new(self))
    }

    #[inline]
    #[must_use]
    pub fn then(self, next: impl Into<Self>) -> Self {
        Self::Sequence(Box::new(self), Box::new(next.into()))
    }

    #[inline]
    #[must_use]
    pub fn or(self, alternative: impl Into<Self>) -> Self {
        Self::Alternative(Box::new(self), Box::new(alternative.into()))
    }

    #[inline]
    #[must_use]
    pub fn zero_or_one(self) -> Self {
        Self::ZeroOrOne(Box::new(self))
    }

    #[inline]
    #[must_use]
    pub fn zero_or_more(self) -> Self {
        Self::ZeroOrMore(Box::new(self))
    }

    #[inline]
    #[must_use]
    pub fn one_or_more(self) -> Self {
        Self::OneOrMore(Box::new(self))
    }
}

impl fmt::Display for PropertyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Predicate(p) => p.fmt(f),
            Self::Reverse(p) => write!(f, "^({p})"),
            Self::Sequence(a, b) => write!(f, "({a} / {b})"),
            Self::Alternative(a, b) => write!(f, "({a} | {b})"),
            Self::ZeroOrOne(p) => write!(f, "({p})?"),
            Self::ZeroOrMore(p) => write!(f, "({p})*"),
            Self::OneOrMore(p) => write!(f, "({p})+"),
        }
    }
}

impl From<NamedNode> for PropertyPath {
    #[inline]
    fn from(p: NamedNode) -> Self {
        Self::Predicate(p)
    }
}

/// A [path pattern](https://www.w3.org/TR/sparql11-query/#defn_evalPP_predicate):
/// a subject and object slot related by a [`PropertyPath`].
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub struct PathPattern {
    pub subject: TermPattern,
    pub path: PropertyPath,
    pub object: TermPattern,
}

impl PathPattern {
    pub fn new(
        subject: impl Into<TermPattern>,
        path: impl Into<PropertyPath>,
        object: impl Into<TermPattern>,
    ) -> Self {
        Self {
            subject: subject.into(),
            path: path.into(),
            object: object.into(),
        }
    }
}

impl fmt::Display for PathPattern {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {} .", self.subject, self.path, self.object)
    }
}

/// An [expression](https://www.w3.org/TR/sparql11-query/#expressions) tree.
///
/// A bare term or variable leaf is a valid expression and evaluates to
/// itself (respectively to its binding in the current row).
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub enum Expression {
    NamedNode(NamedNode),
    Literal(Literal),
    Variable(Variable),
    /// [Logical-or](https://www.w3.org/TR/sparql11-query/#func-logical-or).
    Or(Box<Self>, Box<Self>),
    /// [Logical-and](https://www.w3.org/TR/sparql11-query/#func-logical-and).
    And(Box<Self>, Box<Self>),
    /// [fn:not](https://www.w3.org/TR/xpath-functions-31/#func-not).
    Not(Box<Self>),
    /// [RDFterm-equal](https://www.w3.org/TR/sparql11-query/#func-RDFterm-equal) and the XSD equalities.
    Equal(Box<Self>, Box<Self>),
    /// [sameTerm](https://www.w3.org/TR/sparql11-query/#func-sameTerm).
    SameTerm(Box<Self>, Box<Self>),
    Greater(Box<Self>, Box<Self>),
    GreaterOrEqual(Box<Self>, Box<Self>),
    Less(Box<Self>, Box<Self>),
    LessOrEqual(Box<Self>, Box<Self>),
    /// [IN](https://www.w3.org/TR/sparql11-query/#func-in). `NOT IN` is `Not(In(..))`.
    In(Box<Self>, Vec<Self>),
    Add(Box<Self>, Box<Self>),
    Subtract(Box<Self>, Box<Self>),
    Multiply(Box<Self>, Box<Self>),
    Divide(Box<Self>, Box<Self>),
    UnaryPlus(Box<Self>),
    UnaryMinus(Box<Self>),
    /// [BOUND](https://www.w3.org/TR/sparql11-query/#func-bound).
    Bound(Variable),
    /// [IF](https://www.w3.org/TR/sparql11-query/#func-if).
    If(Box<Self>, Box<Self>, Box<Self>),
    /// [COALESCE](https://www.w3.org/TR/sparql11-query/#func-coalesce).
    Coalesce(Vec<Self>),
    /// [EXISTS](https://www.w3.org/TR/sparql11-query/#func-filter-exists) over a single pattern.
    Exists(Box<QuadPattern>),
    /// A builtin function call.
    FunctionCall(Function, Vec<Self>),
}

impl Expression {
    #[inline]
    pub fn or(a: impl Into<Self>, b: impl Into<Self>) -> Self {
        Self::Or(Box::new(a.into()), Box::new(b.into()))
    }

    #[inline]
    pub fn and(a: impl Into<Self>, b: impl Into<Self>) -> Self {
        Self::And(Box::new(a.into()), Box::new(b.into()))
    }

    #[inline]
    pub fn not(e: impl Into<Self>) -> Self {
        Self::Not(Box::new(e.into()))
    }

    #[inline]
    pub fn equal(a: impl Into<Self>, b: impl Into<Self>) -> Self {
        Self::Equal(Box::new(a.into()), Box::new(b.into()))
    }

    #[inline]
    pub fn same_term(a: impl Into<Self>, b: impl Into<Self>) -> Self {
        Self::SameTerm(Box::new(a.into()), Box::new(b.into()))
    }

    #[inline]
    pub fn greater(a: impl Into<Self>, b: impl Into<Self>) -> Self {
        Self::Greater(Box::new(a.into()), Box::new(b.into()))
    }

    #[inline]
    pub fn greater_or_equal(a: impl Into<Self>, b: impl Into<Self>) -> Self {
        Self::GreaterOrEqual(Box::new(a.into()), Box::new(b.into()))
    }

    #[inline]
    pub fn less(a: impl Into<Self>, b: impl Into<Self>) -> Self {
        Self::Less(Box::new(a.into()), Box::new(b.into()))
    }

    #[inline]
    pub fn less_or_equal(a: impl Into<Self>, b: impl Into<Self>) -> Self {
        Self::LessOrEqual(Box::new(a.into()), Box::new(b.into()))
    }

    #[inline]
    pub fn add(a: impl Into<Self>, b: impl Into<Self>) -> Self {
        Self::Add(Box::new(a.into()), Box::new(b.into()))
    }

    #[inline]
    pub fn subtract(a: impl Into<Self>, b: impl Into<Self>) -> Self {
        Self::Subtract(Box::new(a.into()), Box::new(b.into()))
    }

    #[inline]
    pub fn multiply(a: impl Into<Self>, b: impl Into<Self>) -> Self {
        Self::Multiply(Box::new(a.into()), Box::new(b.into()))
    }

    #[inline]
    pub fn divide(a: impl Into<Self>, b: impl Into<Self>) -> Self {
        Self::Divide(Box::new(a.into()), Box::new(b.into()))
    }

    #[inline]
    pub fn in_list(e: impl Into<Self>, list: impl IntoIterator<Item = Self>) -> Self {
        Self::In(Box::new(e.into()), list.into_iter().collect())
    }

    #[inline]
    pub fn exists(pattern: QuadPattern) -> Self {
        Self::Exists(Box::new(pattern))
    }

    #[inline]
    pub fn call(function: Function, args: impl IntoIterator<Item = Self>) -> Self {
        Self::FunctionCall(function, args.into_iter().collect())
    }

    /// Calls `callback` on each variable occurring in this expression.
    pub fn on_variables<'a>(&'a self, callback: &mut impl FnMut(&'a Variable)) {
        match self {
            Self::NamedNode(_) | Self::Literal(_) => (),
            Self::Variable(v) | Self::Bound(v) => callback(v),
            Self::Or(a, b)
            | Self::And(a, b)
            | Self::Equal(a, b)
            | Self::SameTerm(a, b)
            | Self::Greater(a, b)
            | Self::GreaterOrEqual(a, b)
            | Self::Less(a, b)
            | Self::LessOrEqual(a, b)
            | Self::Add(a, b)
            | Self::Subtract(a, b)
            | Self::Multiply(a, b)
            | Self::Divide(a, b) => {
                a.on_variables(callback);
                b.on_variables(callback);
            }
            Self::Not(e) | Self::UnaryPlus(e) | Self::UnaryMinus(e) => e.on_variables(callback),
            Self::In(e, list) => {
                e.on_variables(callback);
                for member in list {
                    member.on_variables(callback);
                }
            }
            Self::If(a, b, c) => {
                a.on_variables(callback);
                b.on_variables(callback);
                c.on_variables(callback);
            }
            Self::Coalesce(args) | Self::FunctionCall(_, args) => {
                for arg in args {
                    arg.on_variables(callback);
                }
            }
            Self::Exists(pattern) => pattern.on_variables(|v| callback(v)),
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NamedNode(node) => node.fmt(f),
            Self::Literal(literal) => literal.fmt(f),
            Self::Variable(var) => var.fmt(f),
            Self::Or(a, b) => write!(f, "({a} || {b})"),
            Self::And(a, b) => write!(f, "({a} && {b})"),
            Self::Not(e) => match e.as_ref() {
                Self::Exists(pattern) => write!(f, "NOT EXISTS {{ {pattern} }}"),
                e => write!(f, "!({e})"),
            },
            Self::Equal(a, b) => write!(f, "({a} = {b})"),
            Self::SameTerm(a, b) => write!(f, "sameTerm({a}, {b})"),
            Self::Greater(a, b) => write!(f, "({a} > {b})"),
            Self::GreaterOrEqual(a, b) => write!(f, "({a} >= {b})"),
            Self::Less(a, b) => write!(f, "({a} < {b})"),
            Self::LessOrEqual(a, b) => write!(f, "({a} <= {b})"),
            Self::In(a, list) => {
                write!(f, "({a} IN ")?;
                write_arg_list(list, f)?;
                f.write_str(")")
            }
            Self::Add(a, b) => write!(f, "({a} + {b})"),
            Self::Subtract(a, b) => write!(f, "({a} - {b})"),
            Self::Multiply(a, b) => write!(f, "({a} * {b})"),
            Self::Divide(a, b) => write!(f, "({a} / {b})"),
            Self::UnaryPlus(e) => write!(f, "(+({e}))"),
            Self::UnaryMinus(e) => write!(f, "(-({e}))"),
            Self::Bound(v) => write!(f, "BOUND({v})"),
            Self::If(a, b, c) => write!(f, "IF({a}, {b}, {c})"),
            Self::Coalesce(args) => {
                f.write_str("COALESCE")?;
                write_arg_list(args, f)
            }
            Self::Exists(pattern) => write!(f, "EXISTS {{ {pattern} }}"),
            Self::FunctionCall(function, args) => {
                write!(f, "{function}")?;
                write_arg_list(args, f)
            }
        }
    }
}

impl From<NamedNode> for Expression {
    #[inline]
    fn from(node: NamedNode) -> Self {
        Self::NamedNode(node)
    }
}

impl From<Literal> for Expression {
    #[inline]
    fn from(literal: Literal) -> Self {
        Self::Literal(literal)
    }
}

impl From<Variable> for Expression {
    #[inline]
    fn from(var: Variable) -> Self {
        Self::Variable(var)
    }
}

fn write_arg_list(
    args: impl IntoIterator<Item = impl fmt::Display>,
    f: &mut fmt::Formatter<'_>,
) -> fmt::Result {
    f.write_str("(")?;
    let mut cont = false;
    for arg in args {
        if cont {
            f.write_str(", ")?;
        }
        arg.fmt(f)?;
        cont = true;
    }
    f.write_str(")")
}

/// A builtin function name.
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub enum Function {
    Str,
    Lang,
    LangMatches,
    Datatype,
    Iri,
    BNode,
    StrLang,
    StrDt,
    IsIri,
    IsBlank,
    IsLiteral,
    IsNumeric,
    Rand,
    Abs,
    Ceil,
    Floor,
    Round,
    Concat,
    SubStr,
    StrLen,
    Replace,
    UCase,
    LCase,
    EncodeForUri,
    Contains,
    StrStarts,
    StrEnds,
    StrBefore,
    StrAfter,
    Year,
    Month,
    Day,
    Hours,
    Minutes,
    Seconds,
    Timezone,
    Tz,
    Now,
    Uuid,
    StrUuid,
    Md5,
    Sha1,
    Sha256,
    Sha384,
    Sha512,
    Regex,
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str => f.write_str("STR"),
            Self::Lang => f.write_str("LANG"),
            Self::LangMatches => f.write_str("LANGMATCHES"),
            Self::Datatype => f.write_str("DATATYPE"),
            Self::Iri => f.write_str("IRI"),
            Self::BNode => f.write_str("BNODE"),
            Self::StrLang => f.write_str("STRLANG"),
            Self::StrDt => f.write_str("STRDT"),
            Self::IsIri => f.write_str("isIRI"),
            Self::IsBlank => f.write_str("isBLANK"),
            Self::IsLiteral => f.write_str("isLITERAL"),
            Self::IsNumeric => f.write_str("isNUMERIC"),
            Self::Rand => f.write_str("RAND"),
            Self::Abs => f.write_str("ABS"),
            Self::Ceil => f.write_str("CEIL"),
            Self::Floor => f.write_str("FLOOR"),
            Self::Round => f.write_str("ROUND"),
            Self::Concat => f.write_str("CONCAT"),
            Self::SubStr => f.write_str("SUBSTR"),
            Self::StrLen => f.write_str("STRLEN"),
            Self::Replace => f.write_str("REPLACE"),
            Self::UCase => f.write_str("UCASE"),
            Self::LCase => f.write_str("LCASE"),
            Self::EncodeForUri => f.write_str("ENCODE_FOR_URI"),
            Self::Contains => f.write_str("CONTAINS"),
            Self::StrStarts => f.write_str("STRSTARTS"),
            Self::StrEnds => f.write_str("STRENDS"),
            Self::StrBefore => f.write_str("STRBEFORE"),
            Self::StrAfter => f.write_str("STRAFTER"),
            Self::Year => f.write_str("YEAR"),
            Self::Month => f.write_str("MONTH"),
            Self::Day => f.write_str("DAY"),
            Self::Hours => f.write_str("HOURS"),
            Self::Minutes => f.write_str("MINUTES"),
            Self::Seconds => f.write_str("SECONDS"),
            Self::Timezone => f.write_str("TIMEZONE"),
            Self::Tz => f.write_str("TZ"),
            Self::Now => f.write_str("NOW"),
            Self::Uuid => f.write_str("UUID"),
            Self::StrUuid => f.write_str("STRUUID"),
            Self::Md5 => f.write_str("MD5"),
            Self::Sha1 => f.write_str("SHA1"),
            Self::Sha256 => f.write_str("SHA256"),
            Self::Sha384 => f.write_str("SHA384"),
            Self::Sha512 => f.write_str("SHA512"),
            Self::Regex => f.write_str("REGEX"),
        }
    }
}

/// An aggregate over the rows of a partition (c.f. [`GroupBy`]).
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub enum AggregateExpression {
    /// [Count](https://www.w3.org/TR/sparql11-query/#defn_aggCount) with `*`.
    CountSolutions { distinct: bool },
    FunctionCall {
        function: AggregateFunction,
        expr: Expression,
        distinct: bool,
    },
}

impl AggregateExpression {
    #[inline]
    pub fn count(expr: impl Into<Expression>) -> Self {
        Self::FunctionCall {
            function: AggregateFunction::Count,
            expr: expr.into(),
            distinct: false,
        }
    }

    #[inline]
    pub fn sum(expr: impl Into<Expression>) -> Self {
        Self::FunctionCall {
            function: AggregateFunction::Sum,
            expr: expr.into(),
            distinct: false,
        }
    }

    #[inline]
    pub fn avg(expr: impl Into<Expression>) -> Self {
        Self::FunctionCall {
            function: AggregateFunction::Avg,
            expr: expr.into(),
            distinct: false,
        }
    }

    #[inline]
    pub fn min(expr: impl Into<Expression>) -> Self {
        Self::FunctionCall {
            function: AggregateFunction::Min,
            expr: expr.into(),
            distinct: false,
        }
    }

    #[inline]
    pub fn max(expr: impl Into<Expression>) -> Self {
        Self::FunctionCall {
            function: AggregateFunction::Max,
            expr: expr.into(),
            distinct: false,
        }
    }

    #[inline]
    pub fn sample(expr: impl Into<Expression>) -> Self {
        Self::FunctionCall {
            function: AggregateFunction::Sample,
            expr: expr.into(),
            distinct: false,
        }
    }

    #[inline]
    pub fn group_concat(expr: impl Into<Expression>, separator: Option<String>) -> Self {
        Self::FunctionCall {
            function: AggregateFunction::GroupConcat { separator },
            expr: expr.into(),
            distinct: false,
        }
    }

    /// Makes this aggregate only consider distinct values.
    #[inline]
    #[must_use]
    pub fn distinct(mut self) -> Self {
        match &mut self {
            Self::CountSolutions { distinct } | Self::FunctionCall { distinct, .. } => {
                *distinct = true;
            }
        }
        self
    }
}

impl fmt::Display for AggregateExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CountSolutions { distinct } => {
                if *distinct {
                    f.write_str("COUNT(DISTINCT *)")
                } else {
                    f.write_str("COUNT(*)")
                }
            }
            Self::FunctionCall {
                function:
                    AggregateFunction::GroupConcat {
                        separator: Some(separator),
                    },
                expr,
                distinct,
            } => {
                let separator = Literal::new_simple_literal(separator.as_str());
                if *distinct {
                    write!(f, "GROUP_CONCAT(DISTINCT {expr}; SEPARATOR = {separator})")
                } else {
                    write!(f, "GROUP_CONCAT({expr}; SEPARATOR = {separator})")
                }
            }
            Self::FunctionCall {
                function,
                expr,
                distinct,
            } => {
                if *distinct {
                    write!(f, "{function}(DISTINCT {expr})")
                } else {
                    write!(f, "{function}({expr})")
                }
            }
        }
    }
}

/// An aggregate function name.
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub enum AggregateFunction {
    Count,
    Sum,
    Avg,
    Min,
    Max,
    Sample,
    GroupConcat { separator: Option<String> },
}

impl fmt::Display for AggregateFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Count => f.write_str("COUNT"),
            Self::Sum => f.write_str("SUM"),
            Self::Avg => f.write_str("AVG"),
            Self::Min => f.write_str("MIN"),
            Self::Max => f.write_str("MAX"),
            Self::Sample => f.write_str("SAMPLE"),
            Self::GroupConcat { .. } => f.write_str("GROUP_CONCAT"),
        }
    }
}

/// An ORDER BY comparator: a variable with a direction.
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub enum OrderComparator {
    Asc(Variable),
    Desc(Variable),
}

impl OrderComparator {
    #[inline]
    pub fn variable(&self) -> &Variable {
        match self {
            Self::Asc(v) | Self::Desc(v) => v,
        }
    }
}

impl fmt::Display for OrderComparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Asc(v) => write!(f, "ASC({v})"),
            Self::Desc(v) => write!(f, "DESC({v})"),
        }
    }
}

/// An inline [VALUES](https://www.w3.org/TR/sparql11-query/#inline-data) data block.
#[derive(Eq, PartialEq, Debug, Clone, Hash, Default)]
pub struct ValuesBlock {
    pub variables: Vec<Variable>,
    pub bindings: Vec<Vec<Option<Term>>>,
}

impl ValuesBlock {
    pub fn new(variables: impl IntoIterator<Item = Variable>) -> Self {
        Self {
            variables: variables.into_iter().collect(),
            bindings: Vec::new(),
        }
    }

    /// Adds a data row.
    ///
    /// `None` cells are `UNDEF`.
    ///
    /// Panics if the row width does not match the variable list.
    #[must_use]
    pub fn with_row(mut self, row: impl IntoIterator<Item = Option<Term>>) -> Self {
        let row = row.into_iter().collect::<Vec<_>>();
        assert_eq!(
            row.len(),
            self.variables.len(),
            "VALUES row width must match the variable list"
        );
        self.bindings.push(row);
        self
    }
}

impl fmt::Display for ValuesBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("VALUES ( ")?;
        for var in &self.variables {
            write!(f, "{var} ")?;
        }
        f.write_str(") { ")?;
        for row in &self.bindings {
            f.write_str("( ")?;
            for cell in row {
                match cell {
                    Some(term) => write!(f, "{term} ")?,
                    None => f.write_str("UNDEF ")?,
                }
            }
            f.write_str(") ")?;
        }
        f.write_str("}")
    }
}

/// How a pattern group combines with the groups declared before it.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Default)]
pub enum GroupCombinator {
    /// Inner compatibility join (the default).
    #[default]
    Join,
    /// Left compatibility join: rows of the previous groups are preserved.
    Optional,
    /// Column-union row-concatenation with the previous groups.
    Union,
    /// Removes previous rows that have a compatible row here sharing a bound variable.
    Minus,
}

/// How a pattern participates in its group's conjunction.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Default)]
pub enum PatternRole {
    /// Joined into the group table (the default).
    #[default]
    Required,
    /// Left-joined: group rows without a match keep the pattern's variables unbound.
    Optional,
    /// Unioned with the next pattern of the group before joining.
    UnionWithNext,
}

/// A pattern of a group together with its [`PatternRole`].
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub struct GroupPattern {
    pub pattern: QuadPattern,
    pub role: PatternRole,
}

/// A conjunctive block of patterns: the unit the engine evaluates to one
/// binding table before tables are combined across groups.
///
/// ```
/// use oxrdf::{NamedNode, Variable};
/// use sparbuild::{PatternGroup, QuadPattern};
///
/// let knows = NamedNode::new("http://xmlns.com/foaf/0.1/knows")?;
/// let group = PatternGroup::new()
///     .with_pattern(QuadPattern::new(
///         Variable::new("x")?,
///         knows,
///         Variable::new("y")?,
///     ));
/// assert_eq!(
///     group.to_string(),
///     "?x <http://xmlns.com/foaf/0.1/knows> ?y ."
/// );
/// # Result::<_, Box<dyn std::error::Error>>::Ok(())
/// ```
#[derive(Eq, PartialEq, Debug, Clone, Hash, Default)]
pub struct PatternGroup {
    pub patterns: Vec<GroupPattern>,
    pub paths: Vec<PathPattern>,
    pub values: Vec<ValuesBlock>,
    pub subselects: Vec<Query>,
    pub filters: Vec<Expression>,
    pub combinator: GroupCombinator,
}

impl PatternGroup {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    #[must_use]
    pub fn with_pattern(mut self, pattern: QuadPattern) -> Self {
        self.patterns.push(GroupPattern {
            pattern,
            role: PatternRole::Required,
        });
        self
    }

    /// Adds a pattern whose absence does not discard group rows.
    #[inline]
    #[must_use]
    pub fn with_optional_pattern(mut self, pattern: QuadPattern) -> Self {
        self.patterns.push(GroupPattern {
            pattern,
            role: PatternRole::Optional,
        });
        self
    }

    /// Adds a pattern unioned with the pattern added right after it.
    #[inline]
    #[must_use]
    pub fn with_union_pattern(mut self, pattern: QuadPattern) -> Self {
        self.patterns.push(GroupPattern {
            pattern,
            role: PatternRole::UnionWithNext,
        });
        self
    }

    #[inline]
    #[must_use]
    pub fn with_path(mut self, path: PathPattern) -> Self {
        self.paths.push(path);
        self
    }

    #[inline]
    #[must_use]
    pub fn with_values(mut self, values: ValuesBlock) -> Self {
        self.values.push(values);
        self
    }

    /// Adds a sub-SELECT whose result table is joined into the group.
    #[inline]
    #[must_use]
    pub fn with_subselect(mut self, query: Query) -> Self {
        self.subselects.push(query);
        self
    }

    #[inline]
    #[must_use]
    pub fn with_filter(mut self, filter: impl Into<Expression>) -> Self {
        self.filters.push(filter.into());
        self
    }

    /// Flags this group as OPTIONAL relative to the groups before it.
    #[inline]
    #[must_use]
    pub fn optional(mut self) -> Self {
        self.combinator = GroupCombinator::Optional;
        self
    }

    /// Flags this group as a UNION branch relative to the groups before it.
    #[inline]
    #[must_use]
    pub fn union_with_previous(mut self) -> Self {
        self.combinator = GroupCombinator::Union;
        self
    }

    /// Flags this group as a MINUS block relative to the groups before it.
    #[inline]
    #[must_use]
    pub fn minus(mut self) -> Self {
        self.combinator = GroupCombinator::Minus;
        self
    }

    /// Calls `callback` on each variable this group can bind.
    pub fn on_variables<'a>(&'a self, callback: &mut impl FnMut(&'a Variable)) {
        for GroupPattern { pattern, .. } in &self.patterns {
            pattern.on_variables(|v| callback(v));
        }
        for path in &self.paths {
            if let TermPattern::Variable(s) = &path.subject {
                callback(s);
            }
            if let TermPattern::Variable(o) = &path.object {
                callback(o);
            }
        }
        for values in &self.values {
            for v in &values.variables {
                callback(v);
            }
        }
        for subselect in &self.subselects {
            subselect.on_projected_variables(callback);
        }
    }
}

impl fmt::Display for PatternGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut cont = false;
        let mut sep = |f: &mut fmt::Formatter<'_>| {
            if cont {
                f.write_str(" ")
            } else {
                cont = true;
                Ok(())
            }
        };
        let mut union_run = false;
        for GroupPattern { pattern, role } in &self.patterns {
            if union_run {
                // Closing half of a pending `{ a } UNION { b }` chain.
                write!(f, " UNION {{ {pattern} }}")?;
                union_run = *role == PatternRole::UnionWithNext;
                continue;
            }
            sep(f)?;
            match role {
                PatternRole::Required => write!(f, "{pattern}")?,
                PatternRole::Optional => write!(f, "OPTIONAL {{ {pattern} }}")?,
                PatternRole::UnionWithNext => {
                    write!(f, "{{ {pattern} }}")?;
                    union_run = true;
                }
            }
        }
        for path in &self.paths {
            sep(f)?;
            write!(f, "{path}")?;
        }
        for values in &self.values {
            sep(f)?;
            write!(f, "{values}")?;
        }
        for subselect in &self.subselects {
            sep(f)?;
            f.write_str("{ ")?;
            subselect.fmt_without_prefixes(f)?;
            f.write_str(" }")?;
        }
        for filter in &self.filters {
            sep(f)?;
            write!(f, "FILTER({filter})")?;
        }
        Ok(())
    }
}

/// GROUP BY: grouping variables plus the aggregates projected per partition.
#[derive(Eq, PartialEq, Debug, Clone, Hash, Default)]
pub struct GroupBy {
    pub variables: Vec<Variable>,
    pub aggregates: Vec<(Variable, AggregateExpression)>,
}

impl GroupBy {
    pub fn new(variables: impl IntoIterator<Item = Variable>) -> Self {
        Self {
            variables: variables.into_iter().collect(),
            aggregates: Vec::new(),
        }
    }

    /// Projects `aggregate` as `variable` for each partition.
    #[inline]
    #[must_use]
    pub fn with_aggregate(mut self, variable: Variable, aggregate: AggregateExpression) -> Self {
        self.aggregates.push((variable, aggregate));
        self
    }
}

/// The solution modifiers of a query, applied in the fixed order
/// GROUP BY, HAVING, expression bindings, projection, ORDER BY, DISTINCT,
/// OFFSET, LIMIT.
#[derive(Eq, PartialEq, Debug, Clone, Hash, Default)]
pub struct QueryModifiers {
    pub group_by: Option<GroupBy>,
    pub having: Option<Expression>,
    /// Projection expressions: `(expr AS ?var)`.
    pub bindings: Vec<(Variable, Expression)>,
    /// Projected variables; empty means `SELECT *`.
    pub projection: Vec<Variable>,
    pub order_by: Vec<OrderComparator>,
    pub distinct: bool,
    pub offset: Option<usize>,
    pub limit: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ex(suffix: &str) -> NamedNode {
        NamedNode::new_unchecked(format!("http://example.com/{suffix}"))
    }

    #[test]
    fn property_path_display_is_parenthesised() {
        let path = PropertyPath::from(ex("p"))
            .then(ex("q"))
            .or(PropertyPath::from(ex("r")).reverse())
            .one_or_more();
        assert_eq!(
            path.to_string(),
            "(((<http://example.com/p> / <http://example.com/q>) | ^(<http://example.com/r>)))+"
        );
    }

    #[test]
    fn expression_display_parenthesises_operators() {
        let x = Variable::new_unchecked("x");
        let e = Expression::and(
            Expression::greater(x.clone(), Literal::from(1)),
            Expression::not(Expression::equal(x.clone(), Literal::from(3))),
        );
        assert_eq!(
            e.to_string(),
            "((?x > \"1\"^^<http://www.w3.org/2001/XMLSchema#integer>) && !((?x = \"3\"^^<http://www.w3.org/2001/XMLSchema#integer>)))"
        );
    }

    #[test]
    fn group_display_chains_union_patterns() {
        let group = PatternGroup::new()
            .with_union_pattern(QuadPattern::new(
                Variable::new_unchecked("x"),
                ex("p"),
                Variable::new_unchecked("y"),
            ))
            .with_pattern(QuadPattern::new(
                Variable::new_unchecked("x"),
                ex("q"),
                Variable::new_unchecked("y"),
            ));
        assert_eq!(
            group.to_string(),
            "{ ?x <http://example.com/p> ?y . } UNION { ?x <http://example.com/q> ?y . }"
        );
    }

    #[test]
    fn values_display_uses_undef_for_unbound_cells() {
        let block = ValuesBlock::new([Variable::new_unchecked("v")])
            .with_row([Some(Literal::from(1).into())])
            .with_row([None]);
        assert_eq!(
            block.to_string(),
            "VALUES ( ?v ) { ( \"1\"^^<http://www.w3.org/2001/XMLSchema#integer> ) ( UNDEF ) }"
        );
    }

    #[test]
    #[should_panic(expected = "row width")]
    fn values_row_width_is_checked() {
        let _ = ValuesBlock::new([Variable::new_unchecked("v")]).with_row([None, None]);
    }

    #[test]
    fn aggregate_display() {
        let v = Variable::new_unchecked("v");
        assert_eq!(
            AggregateExpression::count(v.clone()).distinct().to_string(),
            "COUNT(DISTINCT ?v)"
        );
        assert_eq!(
            AggregateExpression::group_concat(v, Some(", ".into())).to_string(),
            "GROUP_CONCAT(?v; SEPARATOR = \", \")"
        );
        assert_eq!(
            AggregateExpression::CountSolutions { distinct: false }.to_string(),
            "COUNT(*)"
        );
    }
}
