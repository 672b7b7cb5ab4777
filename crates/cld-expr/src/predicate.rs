//! Hook predicate evaluation
//!
//! Hook `when` clauses are small boolean expressions: a path (optionally
//! piped) on its own evaluates by truthiness, or two terms compared with
//! `==` / `!=`. Terms are paths or literals. The surrounding `${{ … }}`
//! wrapper is optional.
//!
//! Unlike input evaluation, a path that resolves to nothing is `null`
//! rather than an error: predicates routinely probe inputs that a given
//! declaration never set.

use crate::parser::{parse_expression, Expression};
use crate::{EvalContext, Error, Result};
use cld_schema::Value;
use nom::{
    branch::alt,
    bytes::complete::{is_not, tag, take_while1},
    character::complete::{char, multispace0},
    combinator::{all_consuming, map, opt, recognize},
    sequence::delimited,
    IResult, Parser,
};

#[derive(Debug, Clone, PartialEq)]
enum Term {
    Literal(Value),
    Path(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Comparison {
    Eq,
    Ne,
}

#[derive(Debug, Clone, PartialEq)]
struct Predicate {
    left: Term,
    comparison: Option<(Comparison, Term)>,
}

fn quoted_string(input: &str) -> IResult<&str, Term> {
    let double = delimited(char('"'), opt(is_not("\"")), char('"'));
    let single = delimited(char('\''), opt(is_not("'")), char('\''));
    map(alt((double, single)), |s: Option<&str>| {
        Term::Literal(Value::String(s.unwrap_or("").to_string()))
    })
    .parse(input)
}

fn number_or_bool(input: &str) -> IResult<&str, Term> {
    let (rest, raw) = recognize((
        opt(char('-')),
        take_while1(|c: char| c.is_ascii_alphanumeric() || c == '.'),
    ))
    .parse(input)?;

    let value = match raw {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => {
            if let Ok(i) = raw.parse::<i64>() {
                Value::Int(i)
            } else if let Ok(f) = raw.parse::<f64>() {
                Value::Float(f)
            } else {
                // Bare words fall through to path parsing
                return Err(nom::Err::Error(nom::error::Error::new(
                    input,
                    nom::error::ErrorKind::Tag,
                )));
            }
        }
    };
    Ok((rest, Term::Literal(value)))
}

fn path_term(input: &str) -> IResult<&str, Term> {
    map(
        take_while1(|c: char| {
            c.is_ascii_alphanumeric()
                || matches!(c, '_' | '-' | '.' | '[' | ']' | '|' | ':' | ',' | ' ')
        }),
        |s: &str| Term::Path(s.trim().to_string()),
    )
    .parse(input)
}

fn term(input: &str) -> IResult<&str, Term> {
    alt((quoted_string, number_or_bool, path_term)).parse(input)
}

fn comparison_op(input: &str) -> IResult<&str, Comparison> {
    alt((
        map(tag("=="), |_| Comparison::Eq),
        map(tag("!="), |_| Comparison::Ne),
    ))
    .parse(input)
}

fn predicate(input: &str) -> IResult<&str, Predicate> {
    let (input, _) = multispace0.parse(input)?;
    let (input, left) = term(input)?;
    let (input, _) = multispace0.parse(input)?;
    let (input, comparison) = opt((comparison_op, multispace0, term)).parse(input)?;
    let (input, _) = multispace0.parse(input)?;

    Ok((
        input,
        Predicate {
            left,
            comparison: comparison.map(|(op, _, right)| (op, right)),
        },
    ))
}

fn parse_predicate(input: &str) -> Result<Predicate> {
    // Strip an optional template wrapper
    let trimmed = input.trim();
    let inner = trimmed
        .strip_prefix("${{")
        .and_then(|s| s.strip_suffix("}}"))
        .unwrap_or(trimmed);

    all_consuming(predicate)
        .parse(inner)
        .map(|(_, p)| p)
        .map_err(|e| Error::Parse(input.trim().to_string(), e.to_string()))
}

/// The `path | pipes` part of a term reuses the expression grammar
fn term_expression(path: &str) -> Result<Expression> {
    parse_expression(path)
}

fn resolve_term(term: &Term, ctx: &EvalContext) -> Result<Value> {
    match term {
        Term::Literal(value) => Ok(value.clone()),
        Term::Path(path) => {
            let expr = term_expression(path)?;
            match ctx.resolve(&expr.path) {
                Some(value) => {
                    let mut value = value.clone();
                    for pipe in &expr.pipes {
                        value = crate::eval::apply_pipe(value, &pipe.name, &pipe.args)?;
                    }
                    Ok(value)
                }
                None => Ok(Value::Null),
            }
        }
    }
}

fn values_equal(left: &Value, right: &Value) -> bool {
    if left == right {
        return true;
    }
    match (left, right) {
        (Value::Null, _) | (_, Value::Null) => false,
        // Numeric widening, then string comparison as a last resort
        (Value::Int(i), Value::Float(f)) | (Value::Float(f), Value::Int(i)) => *i as f64 == *f,
        _ => left.to_display_string() == right.to_display_string(),
    }
}

/// Evaluate a hook `when` clause against a context
pub fn evaluate_predicate(input: &str, ctx: &EvalContext) -> Result<bool> {
    let parsed = parse_predicate(input)?;
    let left = resolve_term(&parsed.left, ctx)?;

    match parsed.comparison {
        None => Ok(left.is_truthy()),
        Some((op, right_term)) => {
            let right = resolve_term(&right_term, ctx)?;
            let equal = values_equal(&left, &right);
            Ok(match op {
                Comparison::Eq => equal,
                Comparison::Ne => !equal,
            })
        }
    }
}
