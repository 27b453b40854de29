//! Row-wise expression evaluation.
//!
//! An expression evaluates against one binding row to a term or to the
//! unbound marker. Type errors are swallowed locally and surface as unbound,
//! per SPARQL semantics; only a filter head turns unbound into false.

use crate::dataset::{GraphSelector, PatternSource};
use md5::{Digest, Md5};
use oxiri::Iri;
use oxrdf::vocab::{rdf, xsd};
use oxrdf::{BlankNode, Literal, NamedNode, NamedNodeRef, Term, Variable};
use oxsdatatypes::{Boolean, DateTime, Decimal, Double, Float, Integer};
use rand::random;
use regex::{Regex, RegexBuilder};
use rustc_hash::FxHashMap;
use sha1::Sha1;
use sha2::{Sha256, Sha384, Sha512};
use sparbuild::{Expression, Function, NamedNodePattern, QuadPattern, TermPattern};
use std::cell::RefCell;
use std::cmp::Ordering;
use std::fmt::Write;

const REGEX_SIZE_LIMIT: usize = 1_000_000;

/// One row of a table, viewed through its variable list.
#[derive(Clone, Copy)]
pub(crate) struct Bindings<'a> {
    pub variables: &'a [Variable],
    pub row: &'a [Option<Term>],
}

impl<'a> Bindings<'a> {
    pub fn get(&self, variable: &Variable) -> Option<&'a Term> {
        self.variables
            .iter()
            .position(|v| v == variable)
            .and_then(|i| self.row[i].as_ref())
    }
}

/// Query-wide evaluation state shared by every expression of one execution:
/// the dataset handle for EXISTS, the single NOW() instant and the compiled
/// regex cache.
pub(crate) struct EvalContext<'a> {
    pub dataset: &'a dyn PatternSource,
    pub now: DateTime,
    regexes: RefCell<FxHashMap<(String, String), Option<Regex>>>,
}

impl<'a> EvalContext<'a> {
    pub fn new(dataset: &'a dyn PatternSource) -> Self {
        Self {
            dataset,
            now: DateTime::now(),
            regexes: RefCell::new(FxHashMap::default()),
        }
    }

    fn regex(&self, pattern: &str, flags: &str) -> Option<Regex> {
        self.regexes
            .borrow_mut()
            .entry((pattern.to_owned(), flags.to_owned()))
            .or_insert_with(|| compile_pattern(pattern, flags))
            .clone()
    }
}

/// Evaluates `expression` against one row. Errors are reported as `None`.
pub(crate) fn eval(
    expression: &Expression,
    bindings: Bindings<'_>,
    ctx: &EvalContext<'_>,
) -> Option<Term> {
    match expression {
        Expression::NamedNode(t) => Some(t.clone().into()),
        Expression::Literal(t) => Some(t.clone().into()),
        Expression::Variable(v) => bindings.get(v).cloned(),
        Expression::Or(a, b) => {
            // Three-valued: true short-circuits over an error on the other side.
            match (ebv(a, bindings, ctx), ebv(b, bindings, ctx)) {
                (Some(true), _) | (_, Some(true)) => Some(Literal::from(true).into()),
                (Some(false), Some(false)) => Some(Literal::from(false).into()),
                _ => None,
            }
        }
        Expression::And(a, b) => match (ebv(a, bindings, ctx), ebv(b, bindings, ctx)) {
            (Some(false), _) | (_, Some(false)) => Some(Literal::from(false).into()),
            (Some(true), Some(true)) => Some(Literal::from(true).into()),
            _ => None,
        },
        Expression::Not(e) => Some(Literal::from(!ebv(e, bindings, ctx)?).into()),
        Expression::Equal(a, b) => {
            let a = eval(a, bindings, ctx)?;
            let b = eval(b, bindings, ctx)?;
            Some(Literal::from(equals(&a, &b)?).into())
        }
        Expression::SameTerm(a, b) => {
            let a = eval(a, bindings, ctx)?;
            let b = eval(b, bindings, ctx)?;
            Some(Literal::from(a == b).into())
        }
        Expression::Greater(a, b) => compare(a, b, bindings, ctx, Ordering::is_gt),
        Expression::GreaterOrEqual(a, b) => compare(a, b, bindings, ctx, Ordering::is_ge),
        Expression::Less(a, b) => compare(a, b, bindings, ctx, Ordering::is_lt),
        Expression::LessOrEqual(a, b) => compare(a, b, bindings, ctx, Ordering::is_le),
        Expression::In(e, list) => {
            let needle = eval(e, bindings, ctx)?;
            let mut error = false;
            for member in list {
                match eval(member, bindings, ctx).map(|t| equals(&needle, &t)) {
                    Some(Some(true)) => return Some(Literal::from(true).into()),
                    Some(Some(false)) => (),
                    _ => error = true,
                }
            }
            if error {
                None
            } else {
                Some(Literal::from(false).into())
            }
        }
        Expression::Add(a, b) => arithmetic(a, b, bindings, ctx, |p| match p {
            NumericPair::Integer(a, b) => a.checked_add(b).map(Numeric::Integer),
            NumericPair::Decimal(a, b) => a.checked_add(b).map(Numeric::Decimal),
            NumericPair::Float(a, b) => Some(Numeric::Float(a + b)),
            NumericPair::Double(a, b) => Some(Numeric::Double(a + b)),
        }),
        Expression::Subtract(a, b) => arithmetic(a, b, bindings, ctx, |p| match p {
            NumericPair::Integer(a, b) => a.checked_sub(b).map(Numeric::Integer),
            NumericPair::Decimal(a, b) => a.checked_sub(b).map(Numeric::Decimal),
            NumericPair::Float(a, b) => Some(Numeric::Float(a - b)),
            NumericPair::Double(a, b) => Some(Numeric::Double(a - b)),
        }),
        Expression::Multiply(a, b) => arithmetic(a, b, bindings, ctx, |p| match p {
            NumericPair::Integer(a, b) => a.checked_mul(b).map(Numeric::Integer),
            NumericPair::Decimal(a, b) => a.checked_mul(b).map(Numeric::Decimal),
            NumericPair::Float(a, b) => Some(Numeric::Float(a * b)),
            NumericPair::Double(a, b) => Some(Numeric::Double(a * b)),
        }),
        Expression::Divide(a, b) => arithmetic(a, b, bindings, ctx, |p| match p {
            // Integer division yields a decimal.
            NumericPair::Integer(a, b) => Decimal::from(a)
                .checked_div(Decimal::from(b))
                .map(Numeric::Decimal),
            NumericPair::Decimal(a, b) => a.checked_div(b).map(Numeric::Decimal),
            NumericPair::Float(a, b) => Some(Numeric::Float(a / b)),
            NumericPair::Double(a, b) => Some(Numeric::Double(a / b)),
        }),
        Expression::UnaryPlus(e) => {
            let term = eval(e, bindings, ctx)?;
            numeric_value(&term).map(|_| term)
        }
        Expression::UnaryMinus(e) => {
            let term = eval(e, bindings, ctx)?;
            Some(
                match numeric_value(&term)? {
                    Numeric::Integer(v) => Numeric::Integer(v.checked_neg()?),
                    Numeric::Decimal(v) => Numeric::Decimal(v.checked_neg()?),
                    Numeric::Float(v) => Numeric::Float(-v),
                    Numeric::Double(v) => Numeric::Double(-v),
                }
                .into_term(),
            )
        }
        Expression::Bound(v) => Some(Literal::from(bindings.get(v).is_some()).into()),
        Expression::If(cond, then, otherwise) => {
            if ebv(cond, bindings, ctx)? {
                eval(then, bindings, ctx)
            } else {
                eval(otherwise, bindings, ctx)
            }
        }
        Expression::Coalesce(args) => args.iter().find_map(|arg| eval(arg, bindings, ctx)),
        Expression::Exists(pattern) => Some(Literal::from(exists(pattern, bindings, ctx)).into()),
        Expression::FunctionCall(function, args) => {
            eval_function(function, args, bindings, ctx)
        }
    }
}

/// Evaluates the [effective boolean value](https://www.w3.org/TR/sparql11-query/#ebv)
/// of `expression`. Used as the head of filters, where `None` counts as false.
pub(crate) fn ebv(
    expression: &Expression,
    bindings: Bindings<'_>,
    ctx: &EvalContext<'_>,
) -> Option<bool> {
    effective_boolean_value(&eval(expression, bindings, ctx)?)
}

fn compare(
    a: &Expression,
    b: &Expression,
    bindings: Bindings<'_>,
    ctx: &EvalContext<'_>,
    test: impl Fn(Ordering) -> bool,
) -> Option<Term> {
    let a = eval(a, bindings, ctx)?;
    let b = eval(b, bindings, ctx)?;
    Some(Literal::from(test(partial_cmp(&a, &b)?)).into())
}

fn arithmetic(
    a: &Expression,
    b: &Expression,
    bindings: Bindings<'_>,
    ctx: &EvalContext<'_>,
    op: impl Fn(NumericPair) -> Option<Numeric>,
) -> Option<Term> {
    let a = numeric_value(&eval(a, bindings, ctx)?)?;
    let b = numeric_value(&eval(b, bindings, ctx)?)?;
    Some(op(NumericPair::new(a, b)).map(Numeric::into_term)?)
}

fn exists(pattern: &QuadPattern, bindings: Bindings<'_>, ctx: &EvalContext<'_>) -> bool {
    let resolve_term = |slot: &TermPattern| match slot {
        TermPattern::Variable(v) => bindings.get(v).cloned(),
        // Blank nodes act as existentials, so they match anything.
        TermPattern::BlankNode(_) => None,
        slot => slot.as_ground(),
    };
    let subject = resolve_term(&pattern.subject);
    let predicate = match &pattern.predicate {
        NamedNodePattern::NamedNode(p) => Some(p.clone()),
        NamedNodePattern::Variable(v) => match bindings.get(v) {
            Some(Term::NamedNode(p)) => Some(p.clone()),
            Some(_) => return false,
            None => None,
        },
    };
    let object = resolve_term(&pattern.object);
    let named_graph;
    let graph = match &pattern.graph_name {
        None => GraphSelector::Default,
        Some(NamedNodePattern::NamedNode(g)) => GraphSelector::Named(g),
        Some(NamedNodePattern::Variable(v)) => match bindings.get(v) {
            Some(Term::NamedNode(g)) => {
                named_graph = g.clone();
                GraphSelector::Named(&named_graph)
            }
            Some(_) => return false,
            None => GraphSelector::AnyNamed,
        },
    };
    let found = ctx
        .dataset
        .quads_for_pattern(subject.as_ref(), predicate.as_ref(), object.as_ref(), graph)
        .next()
        .is_some_and(|r| r.is_ok());
    found
}

fn eval_function(
    function: &Function,
    args: &[Expression],
    bindings: Bindings<'_>,
    ctx: &EvalContext<'_>,
) -> Option<Term> {
    match function {
        Function::Str => Some(match eval(args.first()?, bindings, ctx)? {
            Term::NamedNode(node) => Literal::new_simple_literal(node.into_string()).into(),
            Term::Literal(literal) => Literal::new_simple_literal(literal.value()).into(),
            Term::BlankNode(_) => return None,
        }),
        Function::Lang => match eval(args.first()?, bindings, ctx)? {
            Term::Literal(literal) => Some(
                Literal::new_simple_literal(literal.language().unwrap_or_default()).into(),
            ),
            _ => None,
        },
        Function::LangMatches => {
            let tag = eval(args.first()?, bindings, ctx)?;
            let range = eval(args.get(1)?, bindings, ctx)?;
            let (tag, _) = string_value(&tag)?;
            let (range, _) = string_value(&range)?;
            Some(Literal::from(lang_matches(&tag, &range)).into())
        }
        Function::Datatype => match eval(args.first()?, bindings, ctx)? {
            Term::Literal(literal) => Some(
                if literal.language().is_some() {
                    NamedNode::from(rdf::LANG_STRING)
                } else {
                    literal.datatype().into_owned()
                }
                .into(),
            ),
            _ => None,
        },
        Function::Iri => match eval(args.first()?, bindings, ctx)? {
            Term::NamedNode(node) => Some(node.into()),
            Term::Literal(literal) => {
                let iri = Iri::parse(literal.value().to_owned()).ok()?;
                Some(NamedNode::new_unchecked(iri.into_inner()).into())
            }
            Term::BlankNode(_) => None,
        },
        Function::BNode => match args.first() {
            None => Some(BlankNode::default().into()),
            Some(arg) => {
                let term = eval(arg, bindings, ctx)?;
                let (label, _) = string_value(&term)?;
                Some(BlankNode::new(label.as_ref()).ok()?.into())
            }
        },
        Function::StrLang => {
            let value = simple_string_value(&eval(args.first()?, bindings, ctx)?)?;
            let language = simple_string_value(&eval(args.get(1)?, bindings, ctx)?)?;
            Some(
                Literal::new_language_tagged_literal(value, language.to_lowercase())
                    .ok()?
                    .into(),
            )
        }
        Function::StrDt => {
            let value = simple_string_value(&eval(args.first()?, bindings, ctx)?)?;
            let Term::NamedNode(datatype) = eval(args.get(1)?, bindings, ctx)? else {
                return None;
            };
            Some(Literal::new_typed_literal(value, datatype).into())
        }
        Function::IsIri => Some(
            Literal::from(matches!(
                eval(args.first()?, bindings, ctx)?,
                Term::NamedNode(_)
            ))
            .into(),
        ),
        Function::IsBlank => Some(
            Literal::from(matches!(
                eval(args.first()?, bindings, ctx)?,
                Term::BlankNode(_)
            ))
            .into(),
        ),
        Function::IsLiteral => Some(
            Literal::from(matches!(
                eval(args.first()?, bindings, ctx)?,
                Term::Literal(_)
            ))
            .into(),
        ),
        Function::IsNumeric => Some(
            Literal::from(numeric_value(&eval(args.first()?, bindings, ctx)?).is_some()).into(),
        ),
        Function::Rand => Some(Literal::from(random::<f64>()).into()),
        Function::Abs => Some(
            match numeric_value(&eval(args.first()?, bindings, ctx)?)? {
                Numeric::Integer(v) => Numeric::Integer(v.checked_abs()?),
                Numeric::Decimal(v) => Numeric::Decimal(v.checked_abs()?),
                Numeric::Float(v) => Numeric::Float(v.abs()),
                Numeric::Double(v) => Numeric::Double(v.abs()),
            }
            .into_term(),
        ),
        Function::Ceil => Some(
            match numeric_value(&eval(args.first()?, bindings, ctx)?)? {
                Numeric::Integer(v) => Numeric::Integer(v),
                Numeric::Decimal(v) => Numeric::Decimal(v.checked_ceil()?),
                Numeric::Float(v) => Numeric::Float(v.ceil()),
                Numeric::Double(v) => Numeric::Double(v.ceil()),
            }
            .into_term(),
        ),
        Function::Floor => Some(
            match numeric_value(&eval(args.first()?, bindings, ctx)?)? {
                Numeric::Integer(v) => Numeric::Integer(v),
                Numeric::Decimal(v) => Numeric::Decimal(v.checked_floor()?),
                Numeric::Float(v) => Numeric::Float(v.floor()),
                Numeric::Double(v) => Numeric::Double(v.floor()),
            }
            .into_term(),
        ),
        Function::Round => Some(
            match numeric_value(&eval(args.first()?, bindings, ctx)?)? {
                Numeric::Integer(v) => Numeric::Integer(v),
                Numeric::Decimal(v) => Numeric::Decimal(v.checked_round()?),
                Numeric::Float(v) => Numeric::Float(v.round()),
                Numeric::Double(v) => Numeric::Double(v.round()),
            }
            .into_term(),
        ),
        Function::Concat => {
            let mut result = String::new();
            let mut language: Option<Option<String>> = None;
            for arg in args {
                let term = eval(arg, bindings, ctx)?;
                let (value, lang) = string_value(&term)?;
                // The result keeps a language tag only if every part agrees.
                match &language {
                    None => language = Some(lang.map(ToOwned::to_owned)),
                    Some(l) if l.as_deref() == lang => (),
                    Some(_) => language = Some(None),
                }
                result.push_str(&value);
            }
            Some(plain_literal(result, language.flatten()).into())
        }
        Function::SubStr => {
            let term = eval(args.first()?, bindings, ctx)?;
            let (value, language) = string_value(&term)?;
            let start = round_to_i64(numeric_value(&eval(args.get(1)?, bindings, ctx)?)?)?;
            let length = match args.get(2) {
                Some(arg) => Some(round_to_i64(numeric_value(&eval(arg, bindings, ctx)?)?)?),
                None => None,
            };
            // XPath fn:substring: a character at 1-based position p is kept
            // when start <= p < start + length; out-of-range is clamped.
            let end = match length {
                Some(length) => start.checked_add(length)?,
                None => i64::MAX,
            };
            let first = start.max(1);
            let result = if end <= first {
                String::new()
            } else {
                value
                    .chars()
                    .skip((first - 1) as usize)
                    .take(u64::try_from(end - first).map_or(usize::MAX, |t| t as usize))
                    .collect::<String>()
            };
            Some(plain_literal(result, language.map(ToOwned::to_owned)).into())
        }
        Function::StrLen => {
            let term = eval(args.first()?, bindings, ctx)?;
            let (value, _) = string_value(&term)?;
            Some(
                Literal::new_typed_literal(value.chars().count().to_string(), xsd::INTEGER).into(),
            )
        }
        Function::Replace => {
            let term = eval(args.first()?, bindings, ctx)?;
            let (value, language) = string_value(&term)?;
            let pattern = simple_string_value(&eval(args.get(1)?, bindings, ctx)?)?;
            let replacement = simple_string_value(&eval(args.get(2)?, bindings, ctx)?)?;
            let flags = match args.get(3) {
                Some(arg) => string_value(&eval(arg, bindings, ctx)?)?.0.into_owned(),
                None => String::new(),
            };
            let regex = ctx.regex(&pattern, &flags)?;
            Some(
                plain_literal(
                    regex.replace_all(&value, replacement.as_str()).into_owned(),
                    language.map(ToOwned::to_owned),
                )
                .into(),
            )
        }
        Function::UCase => {
            let term = eval(args.first()?, bindings, ctx)?;
            let (value, language) = string_value(&term)?;
            Some(plain_literal(value.to_uppercase(), language.map(ToOwned::to_owned)).into())
        }
        Function::LCase => {
            let term = eval(args.first()?, bindings, ctx)?;
            let (value, language) = string_value(&term)?;
            Some(plain_literal(value.to_lowercase(), language.map(ToOwned::to_owned)).into())
        }
        Function::EncodeForUri => {
            let term = eval(args.first()?, bindings, ctx)?;
            let (value, _) = string_value(&term)?;
            let mut result = String::with_capacity(value.len());
            for byte in value.bytes() {
                if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.' | b'~') {
                    result.push(char::from(byte));
                } else {
                    write!(&mut result, "%{byte:02X}").ok()?;
                }
            }
            Some(Literal::new_simple_literal(result).into())
        }
        Function::Contains => binary_string_test(args, bindings, ctx, |a, b| a.contains(b)),
        Function::StrStarts => binary_string_test(args, bindings, ctx, |a, b| a.starts_with(b)),
        Function::StrEnds => binary_string_test(args, bindings, ctx, |a, b| a.ends_with(b)),
        Function::StrBefore => {
            let (a, b, language) = argument_compatible_strings(args, bindings, ctx)?;
            Some(match a.find(&*b) {
                Some(i) => plain_literal(a[..i].to_owned(), language).into(),
                None => Literal::new_simple_literal("").into(),
            })
        }
        Function::StrAfter => {
            let (a, b, language) = argument_compatible_strings(args, bindings, ctx)?;
            Some(match a.find(&*b) {
                Some(i) => plain_literal(a[i + b.len()..].to_owned(), language).into(),
                None => Literal::new_simple_literal("").into(),
            })
        }
        Function::Year => date_time_part(args, bindings, ctx, |dt| {
            Some(Literal::new_typed_literal(dt.year().to_string(), xsd::INTEGER))
        }),
        Function::Month => date_time_part(args, bindings, ctx, |dt| {
            Some(Literal::new_typed_literal(dt.month().to_string(), xsd::INTEGER))
        }),
        Function::Day => date_time_part(args, bindings, ctx, |dt| {
            Some(Literal::new_typed_literal(dt.day().to_string(), xsd::INTEGER))
        }),
        Function::Hours => date_time_part(args, bindings, ctx, |dt| {
            Some(Literal::new_typed_literal(dt.hour().to_string(), xsd::INTEGER))
        }),
        Function::Minutes => date_time_part(args, bindings, ctx, |dt| {
            Some(Literal::new_typed_literal(dt.minute().to_string(), xsd::INTEGER))
        }),
        Function::Seconds => date_time_part(args, bindings, ctx, |dt| {
            Some(Literal::new_typed_literal(dt.second().to_string(), xsd::DECIMAL))
        }),
        Function::Timezone => date_time_part(args, bindings, ctx, |dt| {
            Some(Literal::new_typed_literal(
                dt.timezone()?.to_string(),
                xsd::DAY_TIME_DURATION,
            ))
        }),
        Function::Tz => date_time_part(args, bindings, ctx, |dt| {
            Some(Literal::new_simple_literal(
                dt.timezone_offset().map_or_else(String::new, |o| o.to_string()),
            ))
        }),
        Function::Now => Some(
            Literal::new_typed_literal(ctx.now.to_string(), xsd::DATE_TIME).into(),
        ),
        Function::Uuid => {
            let mut buffer = String::with_capacity(44);
            buffer.push_str("urn:uuid:");
            generate_uuid(&mut buffer);
            Some(NamedNode::new_unchecked(buffer).into())
        }
        Function::StrUuid => {
            let mut buffer = String::with_capacity(36);
            generate_uuid(&mut buffer);
            Some(Literal::new_simple_literal(buffer).into())
        }
        Function::Md5 => hash::<Md5>(args, bindings, ctx),
        Function::Sha1 => hash::<Sha1>(args, bindings, ctx),
        Function::Sha256 => hash::<Sha256>(args, bindings, ctx),
        Function::Sha384 => hash::<Sha384>(args, bindings, ctx),
        Function::Sha512 => hash::<Sha512>(args, bindings, ctx),
        Function::Regex => {
            let term = eval(args.first()?, bindings, ctx)?;
            let (value, _) = string_value(&term)?;
            let pattern = simple_string_value(&eval(args.get(1)?, bindings, ctx)?)?;
            let flags = match args.get(2) {
                Some(arg) => string_value(&eval(arg, bindings, ctx)?)?.0.into_owned(),
                None => String::new(),
            };
            let regex = ctx.regex(&pattern, &flags)?;
            Some(Literal::from(regex.is_match(&value)).into())
        }
    }
}

fn binary_string_test(
    args: &[Expression],
    bindings: Bindings<'_>,
    ctx: &EvalContext<'_>,
    test: impl Fn(&str, &str) -> bool,
) -> Option<Term> {
    let (a, b, _) = argument_compatible_strings(args, bindings, ctx)?;
    Some(Literal::from(test(&a, &b)).into())
}

/// The [argument compatibility](https://www.w3.org/TR/sparql11-query/#func-arg-compatibility)
/// rules of the binary string builtins: the second argument must be a simple
/// string or carry the same language tag as the first.
fn argument_compatible_strings(
    args: &[Expression],
    bindings: Bindings<'_>,
    ctx: &EvalContext<'_>,
) -> Option<(String, String, Option<String>)> {
    let a = eval(args.first()?, bindings, ctx)?;
    let b = eval(args.get(1)?, bindings, ctx)?;
    let (a_value, a_language) = string_value(&a)?;
    let (b_value, b_language) = string_value(&b)?;
    if b_language.is_some() && b_language != a_language {
        return None;
    }
    Some((
        a_value.into_owned(),
        b_value.into_owned(),
        a_language.map(ToOwned::to_owned),
    ))
}

fn date_time_part(
    args: &[Expression],
    bindings: Bindings<'_>,
    ctx: &EvalContext<'_>,
    part: impl Fn(DateTime) -> Option<Literal>,
) -> Option<Term> {
    let dt = date_time_value(&eval(args.first()?, bindings, ctx)?)?;
    Some(part(dt)?.into())
}

fn hash<H: Digest>(
    args: &[Expression],
    bindings: Bindings<'_>,
    ctx: &EvalContext<'_>,
) -> Option<Term> {
    let term = eval(args.first()?, bindings, ctx)?;
    let input = simple_string_value(&term)?;
    let hash = hex::encode(H::new().chain_update(input.as_str()).finalize());
    Some(Literal::new_simple_literal(hash).into())
}

fn lang_matches(tag: &str, range: &str) -> bool {
    if range == "*" {
        return !tag.is_empty();
    }
    tag.len() >= range.len()
        && tag[..range.len()].eq_ignore_ascii_case(range)
        && (tag.len() == range.len() || tag.as_bytes()[range.len()] == b'-')
}

fn compile_pattern(pattern: &str, flags: &str) -> Option<Regex> {
    let mut builder = RegexBuilder::new(pattern);
    builder.size_limit(REGEX_SIZE_LIMIT);
    for flag in flags.chars() {
        match flag {
            'i' => builder.case_insensitive(true),
            's' => builder.dot_matches_new_line(true),
            'm' => builder.multi_line(true),
            'x' => builder.ignore_whitespace(true),
            _ => return None,
        };
    }
    builder.build().ok()
}

fn generate_uuid(buffer: &mut String) {
    let mut uuid = random::<u128>().to_le_bytes();
    uuid[6] = (uuid[6] & 0x0F) | 0x40;
    uuid[8] = (uuid[8] & 0x3F) | 0x80;

    write_hexa_bytes(&uuid[0..4], buffer);
    buffer.push('-');
    write_hexa_bytes(&uuid[4..6], buffer);
    buffer.push('-');
    write_hexa_bytes(&uuid[6..8], buffer);
    buffer.push('-');
    write_hexa_bytes(&uuid[8..10], buffer);
    buffer.push('-');
    write_hexa_bytes(&uuid[10..16], buffer);
}

fn write_hexa_bytes(bytes: &[u8], buffer: &mut String) {
    for b in bytes {
        buffer.push(char::from_digit(u32::from(b >> 4), 16).unwrap_or('0'));
        buffer.push(char::from_digit(u32::from(b & 0xF), 16).unwrap_or('0'));
    }
}

/// A decoded numeric literal value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Numeric {
    Integer(Integer),
    Decimal(Decimal),
    Float(Float),
    Double(Double),
}

impl Numeric {
    pub fn into_term(self) -> Term {
        match self {
            Self::Integer(v) => Literal::new_typed_literal(v.to_string(), xsd::INTEGER),
            Self::Decimal(v) => Literal::new_typed_literal(v.to_string(), xsd::DECIMAL),
            Self::Float(v) => Literal::from(f32::from(v)),
            Self::Double(v) => Literal::from(f64::from(v)),
        }
        .into()
    }

    pub fn as_f64(self) -> f64 {
        match self {
            Self::Integer(v) => f64::from(Double::from(v)),
            Self::Decimal(v) => f64::from(Double::from(v)),
            Self::Float(v) => f64::from(f32::from(v)),
            Self::Double(v) => f64::from(v),
        }
    }
}

/// A pair of numerics widened to their common datatype, the promotion ladder
/// being integer, decimal, float, double.
enum NumericPair {
    Integer(Integer, Integer),
    Decimal(Decimal, Decimal),
    Float(Float, Float),
    Double(Double, Double),
}

impl NumericPair {
    fn new(a: Numeric, b: Numeric) -> Self {
        match (a, b) {
            (Numeric::Integer(a), Numeric::Integer(b)) => Self::Integer(a, b),
            (Numeric::Integer(a), Numeric::Decimal(b)) => Self::Decimal(a.into(), b),
            (Numeric::Integer(a), Numeric::Float(b)) => Self::Float(a.into(), b),
            (Numeric::Integer(a), Numeric::Double(b)) => Self::Double(a.into(), b),
            (Numeric::Decimal(a), Numeric::Integer(b)) => Self::Decimal(a, b.into()),
            (Numeric::Decimal(a), Numeric::Decimal(b)) => Self::Decimal(a, b),
            (Numeric::Decimal(a), Numeric::Float(b)) => Self::Float(a.into(), b),
            (Numeric::Decimal(a), Numeric::Double(b)) => Self::Double(a.into(), b),
            (Numeric::Float(a), Numeric::Integer(b)) => Self::Float(a, b.into()),
            (Numeric::Float(a), Numeric::Decimal(b)) => Self::Float(a, b.into()),
            (Numeric::Float(a), Numeric::Float(b)) => Self::Float(a, b),
            (Numeric::Float(a), Numeric::Double(b)) => Self::Double(a.into(), b),
            (Numeric::Double(a), Numeric::Integer(b)) => Self::Double(a, b.into()),
            (Numeric::Double(a), Numeric::Decimal(b)) => Self::Double(a, b.into()),
            (Numeric::Double(a), Numeric::Float(b)) => Self::Double(a, b.into()),
            (Numeric::Double(a), Numeric::Double(b)) => Self::Double(a, b),
        }
    }
}

fn round_to_i64(value: Numeric) -> Option<i64> {
    let rounded = value.as_f64().round();
    (rounded.is_finite() && (i64::MIN as f64..=i64::MAX as f64).contains(&rounded))
        .then_some(rounded as i64)
}

/// Decodes the typed numeric value of a literal, if it has one.
pub(crate) fn numeric_value(term: &Term) -> Option<Numeric> {
    let Term::Literal(literal) = term else {
        return None;
    };
    if literal.language().is_some() {
        return None;
    }
    let datatype = literal.datatype();
    let value = literal.value();
    if datatype == xsd::DECIMAL {
        Some(Numeric::Decimal(value.parse().ok()?))
    } else if datatype == xsd::FLOAT {
        Some(Numeric::Float(value.parse().ok()?))
    } else if datatype == xsd::DOUBLE {
        Some(Numeric::Double(value.parse().ok()?))
    } else if is_integer_datatype(datatype) {
        Some(Numeric::Integer(value.parse().ok()?))
    } else {
        None
    }
}

fn is_integer_datatype(datatype: NamedNodeRef<'_>) -> bool {
    datatype == xsd::INTEGER
        || datatype == xsd::INT
        || datatype == xsd::LONG
        || datatype == xsd::SHORT
        || datatype == xsd::BYTE
        || datatype == xsd::UNSIGNED_LONG
        || datatype == xsd::UNSIGNED_INT
        || datatype == xsd::UNSIGNED_SHORT
        || datatype == xsd::UNSIGNED_BYTE
        || datatype == xsd::NON_NEGATIVE_INTEGER
        || datatype == xsd::NON_POSITIVE_INTEGER
        || datatype == xsd::POSITIVE_INTEGER
        || datatype == xsd::NEGATIVE_INTEGER
}

/// The string value and language tag of plain, language-tagged and
/// `xsd:string` literals.
fn string_value(term: &Term) -> Option<(std::borrow::Cow<'_, str>, Option<&str>)> {
    let Term::Literal(literal) = term else {
        return None;
    };
    if let Some(language) = literal.language() {
        Some((literal.value().into(), Some(language)))
    } else if literal.datatype() == xsd::STRING {
        Some((literal.value().into(), None))
    } else {
        None
    }
}

/// The value of a simple (non-language-tagged) string literal.
fn simple_string_value(term: &Term) -> Option<String> {
    match string_value(term)? {
        (value, None) => Some(value.into_owned()),
        _ => None,
    }
}

fn plain_literal(value: String, language: Option<String>) -> Literal {
    match language {
        Some(language) => Literal::new_language_tagged_literal_unchecked(value, language),
        None => Literal::new_simple_literal(value),
    }
}

fn boolean_value(term: &Term) -> Option<Boolean> {
    let Term::Literal(literal) = term else {
        return None;
    };
    (literal.datatype() == xsd::BOOLEAN)
        .then(|| literal.value().parse().ok())
        .flatten()
}

fn date_time_value(term: &Term) -> Option<DateTime> {
    let Term::Literal(literal) = term else {
        return None;
    };
    (literal.datatype() == xsd::DATE_TIME)
        .then(|| literal.value().parse().ok())
        .flatten()
}

/// The [effective boolean value](https://www.w3.org/TR/sparql11-query/#ebv) of a term.
pub(crate) fn effective_boolean_value(term: &Term) -> Option<bool> {
    let Term::Literal(literal) = term else {
        return None;
    };
    if literal.datatype() == xsd::BOOLEAN {
        return Some(literal.value().parse::<Boolean>().is_ok_and(bool::from));
    }
    if string_value(term).is_some() {
        return Some(!literal.value().is_empty());
    }
    if let Some(value) = numeric_value(term) {
        return Some(match value {
            Numeric::Integer(v) => v != Integer::from(0),
            Numeric::Decimal(v) => v != Decimal::from(0),
            Numeric::Float(v) => !(v.is_nan() || v == Float::from(0.)),
            Numeric::Double(v) => !(v.is_nan() || v == Double::from(0.)),
        });
    }
    None
}

/// [RDFterm-equal](https://www.w3.org/TR/sparql11-query/#func-RDFterm-equal):
/// value equality with an error (`None`) for incomparable literals.
pub(crate) fn equals(a: &Term, b: &Term) -> Option<bool> {
    if a == b {
        return Some(true);
    }
    let (Term::Literal(la), Term::Literal(lb)) = (a, b) else {
        // Distinct non-literal terms are plainly unequal.
        return Some(false);
    };
    if let (Some(a), Some(b)) = (numeric_value(a), numeric_value(b)) {
        return Some(match NumericPair::new(a, b) {
            NumericPair::Integer(a, b) => a == b,
            NumericPair::Decimal(a, b) => a == b,
            NumericPair::Float(a, b) => a == b,
            NumericPair::Double(a, b) => a == b,
        });
    }
    if let (Some((va, la)), Some((vb, lb))) = (string_value(a), string_value(b)) {
        return Some(la == lb && va == vb);
    }
    if let (Some(a), Some(b)) = (boolean_value(a), boolean_value(b)) {
        return Some(a == b);
    }
    if let (Some(a), Some(b)) = (date_time_value(a), date_time_value(b)) {
        return Some(a == b);
    }
    if la.language().is_some() || lb.language().is_some() {
        return Some(false);
    }
    // Both literals, at least one of a datatype this engine has no value
    // space for: term inequality proves nothing.
    None
}

/// Value comparison for the ordering operators: numerics, strings (same
/// language), booleans and dateTimes. Everything else is incomparable.
pub(crate) fn partial_cmp(a: &Term, b: &Term) -> Option<Ordering> {
    if let (Some(a), Some(b)) = (numeric_value(a), numeric_value(b)) {
        return match NumericPair::new(a, b) {
            NumericPair::Integer(a, b) => a.partial_cmp(&b),
            NumericPair::Decimal(a, b) => a.partial_cmp(&b),
            NumericPair::Float(a, b) => a.partial_cmp(&b),
            NumericPair::Double(a, b) => a.partial_cmp(&b),
        };
    }
    if let (Some((va, la)), Some((vb, lb))) = (string_value(a), string_value(b)) {
        return (la == lb).then(|| va.cmp(&vb));
    }
    if let (Some(a), Some(b)) = (boolean_value(a), boolean_value(b)) {
        return bool::from(a).partial_cmp(&bool::from(b));
    }
    if let (Some(a), Some(b)) = (date_time_value(a), date_time_value(b)) {
        return a.partial_cmp(&b);
    }
    None
}

/// The total row order used by ORDER BY: unbound first, then blank nodes,
/// IRIs and literals; literals by value when comparable, by lexical form and
/// datatype otherwise.
pub(crate) fn cmp_terms(a: Option<&Term>, b: Option<&Term>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => match (a, b) {
            (Term::BlankNode(a), Term::BlankNode(b)) => a.as_str().cmp(b.as_str()),
            (Term::BlankNode(_), _) => Ordering::Less,
            (_, Term::BlankNode(_)) => Ordering::Greater,
            (Term::NamedNode(a), Term::NamedNode(b)) => a.as_str().cmp(b.as_str()),
            (Term::NamedNode(_), _) => Ordering::Less,
            (_, Term::NamedNode(_)) => Ordering::Greater,
            (Term::Literal(la), Term::Literal(lb)) => {
                partial_cmp(a, b).unwrap_or_else(|| {
                    la.value()
                        .cmp(lb.value())
                        .then_with(|| la.datatype().as_str().cmp(lb.datatype().as_str()))
                })
            }
        },
    }
}
