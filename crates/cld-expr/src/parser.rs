//! Template splitting and the expression grammar
//!
//! Templates are split into literal and expression segments with a regex,
//! the same way the config resolver locates `${...}` references. The inner
//! expression grammar (`PATH ('|' PIPE (':' ARG)*)*`) is parsed with nom.

use crate::{Error, Result};
use nom::{
    branch::alt,
    bytes::complete::take_while1,
    character::complete::{char, digit1, multispace0},
    combinator::{all_consuming, map, map_res},
    multi::many0,
    sequence::{delimited, preceded},
    IResult, Parser,
};
use regex::Regex;
use std::sync::OnceLock;

/// One step of an expression path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    /// Mapping key or scope name
    Key(String),
    /// List index from bracket syntax
    Index(usize),
}

/// A pipe application with its arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipe {
    /// Pipe name (`join`, `default`, …)
    pub name: String,
    /// Colon-separated arguments
    pub args: Vec<String>,
}

/// A parsed expression: a path plus a pipe chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expression {
    /// Path segments, first one names the scope
    pub path: Vec<PathSegment>,
    /// Pipes applied left to right
    pub pipes: Vec<Pipe>,
}

impl Expression {
    /// The scope (first key segment) of this expression
    pub fn scope(&self) -> Option<&str> {
        match self.path.first() {
            Some(PathSegment::Key(key)) => Some(key),
            _ => None,
        }
    }

    /// Key segments as plain strings, lossy over indices
    pub fn key_at(&self, index: usize) -> Option<&str> {
        match self.path.get(index) {
            Some(PathSegment::Key(key)) => Some(key),
            _ => None,
        }
    }

    /// Whether the pipe chain contains `default`
    pub fn has_default(&self) -> bool {
        self.pipes.iter().any(|p| p.name == "default")
    }

    /// Dotted rendering of the path, for error messages
    pub fn path_display(&self) -> String {
        let mut out = String::new();
        for segment in &self.path {
            match segment {
                PathSegment::Key(key) => {
                    if !out.is_empty() {
                        out.push('.');
                    }
                    out.push_str(key);
                }
                PathSegment::Index(i) => {
                    out.push('[');
                    out.push_str(&i.to_string());
                    out.push(']');
                }
            }
        }
        out
    }
}

/// One piece of a split template
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    /// Literal text between expressions
    Literal(String),
    /// A parsed `${{ … }}` expression
    Expr(Expression),
}

/// A template split into literal and expression segments
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    segments: Vec<Segment>,
}

fn expr_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$\{\{(.*?)\}\}").unwrap())
}

/// Quick check whether a string contains a template segment
pub fn contains_expr(input: &str) -> bool {
    expr_regex().is_match(input)
}

impl Template {
    /// Split and parse a template string
    pub fn parse(input: &str) -> Result<Self> {
        let mut segments = Vec::new();
        let mut cursor = 0;

        for caps in expr_regex().captures_iter(input) {
            let whole = caps.get(0).unwrap();
            let inner = caps.get(1).unwrap().as_str();

            if whole.start() > cursor {
                segments.push(Segment::Literal(input[cursor..whole.start()].to_string()));
            }
            segments.push(Segment::Expr(parse_expression(inner)?));
            cursor = whole.end();
        }

        if cursor < input.len() {
            segments.push(Segment::Literal(input[cursor..].to_string()));
        }

        Ok(Self { segments })
    }

    /// The parsed segments in order
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// If the template is exactly one expression with no surrounding
    /// literal, return it; this is the value-evaluation mode trigger
    pub fn as_single_expression(&self) -> Option<&Expression> {
        match self.segments.as_slice() {
            [Segment::Expr(expr)] => Some(expr),
            _ => None,
        }
    }

    /// All expressions in the template, in order
    pub fn expressions(&self) -> impl Iterator<Item = &Expression> {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Expr(expr) => Some(expr),
            Segment::Literal(_) => None,
        })
    }
}

fn ident(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_ascii_alphanumeric() || c == '_' || c == '-').parse(input)
}

fn key_segment(input: &str) -> IResult<&str, PathSegment> {
    map(ident, |s: &str| PathSegment::Key(s.to_string())).parse(input)
}

fn index_segment(input: &str) -> IResult<&str, PathSegment> {
    map_res(delimited(char('['), digit1, char(']')), |s: &str| {
        s.parse::<usize>().map(PathSegment::Index)
    })
    .parse(input)
}

fn path(input: &str) -> IResult<&str, Vec<PathSegment>> {
    let (input, first) = key_segment(input)?;
    let (input, rest) = many0(alt((preceded(char('.'), key_segment), index_segment))).parse(input)?;

    let mut segments = vec![first];
    segments.extend(rest);
    Ok((input, segments))
}

fn pipe_arg(input: &str) -> IResult<&str, String> {
    map(
        take_while1(|c: char| c != '|' && c != ':' && !c.is_whitespace()),
        |s: &str| s.to_string(),
    )
    .parse(input)
}

fn pipe(input: &str) -> IResult<&str, Pipe> {
    let (input, _) = delimited(multispace0, char('|'), multispace0).parse(input)?;
    let (input, name) = ident(input)?;
    let (input, args) = many0(preceded(char(':'), pipe_arg)).parse(input)?;

    Ok((
        input,
        Pipe {
            name: name.to_string(),
            args,
        },
    ))
}

fn expression(input: &str) -> IResult<&str, Expression> {
    let (input, _) = multispace0.parse(input)?;
    let (input, path) = path(input)?;
    let (input, pipes) = many0(pipe).parse(input)?;
    let (input, _) = multispace0.parse(input)?;

    Ok((input, Expression { path, pipes }))
}

/// Parse the inner text of a `${{ … }}` segment
pub fn parse_expression(input: &str) -> Result<Expression> {
    all_consuming(expression)
        .parse(input)
        .map(|(_, expr)| expr)
        .map_err(|e| Error::Parse(input.trim().to_string(), e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_path() {
        let expr = parse_expression(" databases.main.host ").unwrap();
        assert_eq!(expr.scope(), Some("databases"));
        assert_eq!(expr.path.len(), 3);
        assert!(expr.pipes.is_empty());
        assert_eq!(expr.path_display(), "databases.main.host");
    }

    #[test]
    fn test_parse_index_path() {
        let expr = parse_expression("node.inputs.command[0]").unwrap();
        assert_eq!(
            expr.path.last(),
            Some(&PathSegment::Index(0)),
        );
        assert_eq!(expr.path_display(), "node.inputs.command[0]");
    }

    #[test]
    fn test_parse_pipes() {
        let expr = parse_expression("node.inputs.tags | join:, | upper").unwrap();
        assert_eq!(expr.pipes.len(), 2);
        assert_eq!(expr.pipes[0].name, "join");
        assert_eq!(expr.pipes[0].args, vec![","]);
        assert_eq!(expr.pipes[1].name, "upper");
        assert!(!expr.has_default());
    }

    #[test]
    fn test_parse_default_pipe() {
        let expr = parse_expression("variables.region | default:us-east-1").unwrap();
        assert!(expr.has_default());
        assert_eq!(expr.pipes[0].args, vec!["us-east-1"]);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_expression("databases..host").is_err());
        assert!(parse_expression("databases.main |").is_err());
        assert!(parse_expression("").is_err());
    }

    #[test]
    fn test_template_split() {
        let template =
            Template::parse("postgres://${{ databases.main.host }}:${{ databases.main.port }}/db")
                .unwrap();
        assert_eq!(template.segments().len(), 5);
        assert!(template.as_single_expression().is_none());
        assert_eq!(template.expressions().count(), 2);
    }

    #[test]
    fn test_template_single_expression() {
        let template = Template::parse("${{ databases.main.host }}").unwrap();
        assert!(template.as_single_expression().is_some());
    }

    #[test]
    fn test_contains_expr() {
        assert!(contains_expr("x ${{ a.b }} y"));
        assert!(!contains_expr("${HOME}"));
        assert!(!contains_expr("plain"));
    }
}
