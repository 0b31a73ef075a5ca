//! Query shaping shared by every controller: pagination windows,
//! predicate conjunction and case-insensitive pattern matching.

use sea_orm::sea_query::{Expr, Func, SimpleExpr};
use sea_orm::{ColumnTrait, Condition};

/// Largest offset or limit a backend accepts as a bound parameter.
pub const MAX_BOUND: u64 = i64::MAX as u64;

/// Offset/limit restriction of a result set.
///
/// The controller enforces no upper bound on `limit` beyond what the SQL
/// binders can represent; anything larger is saturated to [`MAX_BOUND`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub offset: u64,
    pub limit: u64,
}

impl Window {
    pub fn new(offset: u64, limit: u64) -> Self {
        Self {
            offset: offset.min(MAX_BOUND),
            limit: limit.min(MAX_BOUND),
        }
    }
}

/// Conjunction of all predicates; no predicates means a full scan.
pub fn all_of<I>(predicates: I) -> Condition
where
    I: IntoIterator<Item = SimpleExpr>,
{
    predicates
        .into_iter()
        .fold(Condition::all(), |condition, predicate| condition.add(predicate))
}

/// Single-column equality filter.
pub fn equals<C>(column: C, value: sea_orm::Value) -> Condition
where
    C: ColumnTrait,
{
    Condition::all().add(column.eq(value))
}

/// Wrap a search term for a case-insensitive substring match: `%TERM%`.
pub fn like_pattern(value: &str) -> String {
    format!("%{}%", value.to_uppercase())
}

/// `UPPER(column) LIKE '%VALUE%'`
pub fn upper_like<C>(column: C, value: &str) -> SimpleExpr
where
    C: ColumnTrait,
{
    Expr::expr(Func::upper(Expr::col((column.entity_name(), column)))).like(like_pattern(value))
}
