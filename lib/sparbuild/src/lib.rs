#![doc = include_str!("../README.md")]
#![doc(test(attr(deny(warnings))))]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

mod algebra;
mod query;
mod term;

pub use crate::algebra::{
    AggregateExpression, AggregateFunction, Expression, Function, GroupBy, GroupCombinator,
    GroupPattern, OrderComparator, PathPattern, PatternGroup, PatternRole, PropertyPath,
    QueryModifiers, ValuesBlock,
};
pub use crate::query::{DescribeTarget, Prefix, Query};
pub use crate::term::{NamedNodePattern, QuadPattern, TermPattern, TriplePattern};
