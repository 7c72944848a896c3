//! Recipe parsing.
//!
//! First phase of compilation: source text → [`Recipe`], a tree of
//! [`Declaration`]s. Nothing here knows which identifiers are blocks or
//! properties; the evaluator decides that against the registry.
//!
//! ```text
//! service {
//!     name "tomcat"                 // call form
//!     numInstances = 2              // assignment form
//!     lifecycle { start "run.sh" }  // nested block
//!     customCommands ["restart": "restart.sh"]
//! }
//! ```
//!
//! Properties and overrides files use the same grammar (dotted assignments
//! and nested groups), so they are parsed with [`parse_recipe`] too.

use nom::{
    branch::alt,
    bytes::complete::{tag, take_until},
    character::complete::{
        alpha1, alphanumeric1, char, digit1, multispace1, not_line_ending, one_of, space0,
    },
    combinator::{all_consuming, cut, map, opt, recognize},
    error::{context, ParseError as _, VerboseError, VerboseErrorKind},
    multi::{many0, many0_count},
    sequence::{delimited, pair, preceded, tuple},
    IResult,
};
use std::fmt;

type Res<'a, T> = IResult<&'a str, T, VerboseError<&'a str>>;

// ============================================================================
// AST
// ============================================================================

/// A parsed recipe (or properties file).
#[derive(Debug, Clone, PartialEq)]
pub struct Recipe {
    pub declarations: Vec<Declaration>,
}

/// `name { ... }`, `name value, ...` or `name = value`.
#[derive(Debug, Clone, PartialEq)]
pub struct Declaration {
    /// Identifier, possibly dotted (`lifecycle.init`)
    pub name: String,
    /// 1-based source line
    pub line: usize,
    pub body: Body,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Block(Vec<Declaration>),
    Args(Vec<Expr>),
    Assign(Expr),
}

/// A value expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    /// Double-quoted string containing `${...}`
    Interpolated(Vec<StrPart>),
    List(Vec<Expr>),
    Map(Vec<(String, Expr)>),
    /// Dotted name resolved against locals and the overlay environment
    Reference(String),
    /// Entity block used as a value, e.g. a template inside a map
    Block {
        name: String,
        body: Vec<Declaration>,
        line: usize,
    },
    /// `load("fragment")`
    Load(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum StrPart {
    Lit(String),
    Ref(String),
}

/// Malformed source text.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntaxError {
    pub line: Option<usize>,
    pub message: String,
}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "line {}: {}", line, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

impl SyntaxError {
    fn from_verbose(src: &str, e: VerboseError<&str>) -> Self {
        let Some((at, kind)) = e.errors.first() else {
            return Self {
                line: None,
                message: "invalid input".to_string(),
            };
        };
        let innermost = e.errors.iter().find_map(|(_, k)| match k {
            VerboseErrorKind::Context(c) => Some(*c),
            _ => None,
        });
        let what = match (innermost, kind) {
            (Some(c), _) => format!("expected {}", c),
            (None, VerboseErrorKind::Context(c)) => format!("expected {}", c),
            (None, VerboseErrorKind::Char(c)) => format!("expected '{}'", c),
            (None, VerboseErrorKind::Nom(k)) => format!("unexpected input ({:?})", k),
        };
        let snippet: String = at.chars().take_while(|c| *c != '\n').take(32).collect();
        let place = if at.trim().is_empty() {
            "at end of input".to_string()
        } else if snippet.trim().is_empty() {
            "at end of line".to_string()
        } else {
            format!("at '{}'", snippet.trim_end())
        };
        let message = format!("{} {}", what, place);
        Self {
            line: Some(line_at(src, at)),
            message,
        }
    }
}

// ============================================================================
// Public API
// ============================================================================

/// Parse a complete recipe.
pub fn parse_recipe(src: &str) -> Result<Recipe, SyntaxError> {
    let result = all_consuming(|i| recipe(i, src))(src);
    finish(src, result)
}

/// Parse text holding a single value expression (a `load`ed value fragment).
pub fn parse_expression(src: &str) -> Result<Expr, SyntaxError> {
    let result = all_consuming(delimited(ws, |i| expr(i, src), ws))(src);
    finish(src, result)
}

fn finish<T>(src: &str, result: Res<'_, T>) -> Result<T, SyntaxError> {
    match result {
        Ok((_, value)) => Ok(value),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => Err(SyntaxError::from_verbose(src, e)),
        Err(nom::Err::Incomplete(_)) => Err(SyntaxError {
            line: None,
            message: "incomplete input".to_string(),
        }),
    }
}

/// 1-based line of `rest` within `src`; `rest` must be a suffix of `src`.
fn line_at(src: &str, rest: &str) -> usize {
    let offset = src.len().saturating_sub(rest.len());
    src.as_bytes()[..offset].iter().filter(|b| **b == b'\n').count() + 1
}

// ============================================================================
// Whitespace and identifiers
// ============================================================================

/// Whitespace, `;`, and `//`, `/* */`, `#` comments.
fn ws(input: &str) -> Res<'_, &str> {
    recognize(many0_count(alt((
        multispace1,
        tag(";"),
        recognize(pair(tag("//"), not_line_ending)),
        recognize(tuple((tag("/*"), take_until("*/"), tag("*/")))),
        recognize(pair(char('#'), not_line_ending)),
    ))))(input)
}

fn identifier(input: &str) -> Res<'_, &str> {
    recognize(pair(
        alt((alpha1, tag("_"))),
        many0(alt((alphanumeric1, tag("_")))),
    ))(input)
}

fn dotted_identifier(input: &str) -> Res<'_, &str> {
    recognize(pair(identifier, many0(pair(char('.'), identifier))))(input)
}

// ============================================================================
// Declarations
// ============================================================================

fn recipe<'a>(input: &'a str, src: &'a str) -> Res<'a, Recipe> {
    let (input, declarations) = declarations(input, src)?;
    let (input, _) = ws(input)?;
    Ok((input, Recipe { declarations }))
}

fn declarations<'a>(mut input: &'a str, src: &'a str) -> Res<'a, Vec<Declaration>> {
    let mut out = Vec::new();
    loop {
        let (rest, _) = ws(input)?;
        input = rest;
        match declaration(input, src) {
            Ok((rest, decl)) => {
                out.push(decl);
                input = rest;
            }
            Err(nom::Err::Error(_)) => break,
            Err(e) => return Err(e),
        }
    }
    Ok((input, out))
}

fn declaration<'a>(input: &'a str, src: &'a str) -> Res<'a, Declaration> {
    let line = line_at(src, input);
    let (input, name) = dotted_identifier(input)?;
    let (input, _) = space0(input)?;
    let (input, body) = cut(context(
        "declaration",
        alt((
            map(|i| block(i, src), Body::Block),
            map(preceded(pair(char('='), ws), |i| expr(i, src)), Body::Assign),
            map(|i| args(i, src), Body::Args),
        )),
    ))(input)?;
    Ok((
        input,
        Declaration {
            name: name.to_string(),
            line,
            body,
        },
    ))
}

fn block<'a>(input: &'a str, src: &'a str) -> Res<'a, Vec<Declaration>> {
    let (input, _) = char('{')(input)?;
    let (input, body) = declarations(input, src)?;
    let (input, _) = ws(input)?;
    let (input, _) = cut(context("closing brace", char('}')))(input)?;
    Ok((input, body))
}

/// One or more comma separated values; the first must start on the same line.
fn args<'a>(input: &'a str, src: &'a str) -> Res<'a, Vec<Expr>> {
    let (mut input, first) = expr(input, src)?;
    let mut items = vec![first];
    loop {
        let (rest, _) = space0(input)?;
        match char::<_, VerboseError<&str>>(',')(rest) {
            Ok((rest, _)) => {
                let (rest, _) = ws(rest)?;
                let (rest, item) = cut(|i| expr(i, src))(rest)?;
                items.push(item);
                input = rest;
            }
            Err(_) => break,
        }
    }
    Ok((input, items))
}

// ============================================================================
// Expressions
// ============================================================================

fn expr<'a>(input: &'a str, src: &'a str) -> Res<'a, Expr> {
    context(
        "value",
        alt((
            quoted,
            number,
            |i| bracketed(i, src),
            |i| parenthesized(i, src),
            |i| word(i, src),
        )),
    )(input)
}

fn parenthesized<'a>(input: &'a str, src: &'a str) -> Res<'a, Expr> {
    let (input, _) = pair(char('('), ws)(input)?;
    let (input, inner) = expr(input, src)?;
    let (input, _) = ws(input)?;
    let (input, _) = cut(context("closing parenthesis", char(')')))(input)?;
    Ok((input, inner))
}

/// Keywords, `load(...)`, block expressions and references.
fn word<'a>(input: &'a str, src: &'a str) -> Res<'a, Expr> {
    let line = line_at(src, input);
    let (rest, name) = dotted_identifier(input)?;
    match name {
        "true" => return Ok((rest, Expr::Bool(true))),
        "false" => return Ok((rest, Expr::Bool(false))),
        "null" => return Ok((rest, Expr::Null)),
        _ => {}
    }
    if name == "load" {
        let loaded: Res<'a, Expr> =
            delimited(tuple((space0, char('('), ws)), quoted, pair(ws, char(')')))(rest);
        if let Ok((after, target)) = loaded {
            return match target {
                Expr::Str(path) => Ok((after, Expr::Load(path))),
                _ => Err(nom::Err::Failure(VerboseError {
                    errors: vec![(rest, VerboseErrorKind::Context("literal load path"))],
                })),
            };
        }
    }
    let (after_space, _) = space0(rest)?;
    if after_space.starts_with('{') {
        let (after, body) = block(after_space, src)?;
        return Ok((
            after,
            Expr::Block {
                name: name.to_string(),
                body,
                line,
            },
        ));
    }
    Ok((rest, Expr::Reference(name.to_string())))
}

fn number(input: &str) -> Res<'_, Expr> {
    let (rest, text) = recognize(tuple((
        opt(char('-')),
        digit1,
        opt(pair(char('.'), digit1)),
        opt(tuple((one_of("eE"), opt(one_of("+-")), digit1))),
    )))(input)?;
    let (rest, suffix) = opt(one_of("lLdDfFgG"))(rest)?;
    let is_float =
        text.contains(['.', 'e', 'E']) || matches!(suffix, Some('d' | 'D' | 'f' | 'F'));
    let parsed = if is_float {
        text.parse::<f64>().ok().map(Expr::Float)
    } else {
        text.parse::<i64>()
            .ok()
            .map(Expr::Int)
            .or_else(|| text.parse::<f64>().ok().map(Expr::Float))
    };
    match parsed {
        Some(e) => Ok((rest, e)),
        None => Err(nom::Err::Error(VerboseError::from_error_kind(
            input,
            nom::error::ErrorKind::Digit,
        ))),
    }
}

// ============================================================================
// Strings
// ============================================================================

fn quoted(input: &str) -> Res<'_, Expr> {
    alt((double_quoted, single_quoted))(input)
}

fn unterminated(at: &str) -> nom::Err<VerboseError<&str>> {
    nom::Err::Failure(VerboseError {
        errors: vec![(at, VerboseErrorKind::Context("closing quote"))],
    })
}

/// `"..."` with escapes and `${name}` interpolation.
fn double_quoted(input: &str) -> Res<'_, Expr> {
    let (mut rest, _) = char('"')(input)?;
    let mut parts = Vec::new();
    let mut lit = String::new();
    loop {
        let mut chars = rest.chars();
        match chars.next() {
            None => return Err(unterminated(input)),
            Some('"') => {
                rest = &rest[1..];
                break;
            }
            Some('\\') => {
                let escaped = chars.next().ok_or_else(|| unterminated(input))?;
                lit.push(match escaped {
                    'n' => '\n',
                    't' => '\t',
                    'r' => '\r',
                    other => other,
                });
                rest = &rest[1 + escaped.len_utf8()..];
            }
            Some('$') if rest[1..].starts_with('{') => {
                let close = rest.find('}').ok_or_else(|| {
                    nom::Err::Failure(VerboseError {
                        errors: vec![(rest, VerboseErrorKind::Context("closing '}' of interpolation"))],
                    })
                })?;
                let key = rest[2..close].trim();
                if key.is_empty() {
                    return Err(nom::Err::Failure(VerboseError {
                        errors: vec![(rest, VerboseErrorKind::Context("interpolated name"))],
                    }));
                }
                if !lit.is_empty() {
                    parts.push(StrPart::Lit(std::mem::take(&mut lit)));
                }
                parts.push(StrPart::Ref(key.to_string()));
                rest = &rest[close + 1..];
            }
            Some(c) => {
                lit.push(c);
                rest = &rest[c.len_utf8()..];
            }
        }
    }
    if parts.is_empty() {
        return Ok((rest, Expr::Str(lit)));
    }
    if !lit.is_empty() {
        parts.push(StrPart::Lit(lit));
    }
    Ok((rest, Expr::Interpolated(parts)))
}

/// `'...'`, literal apart from `\'` and `\\`.
fn single_quoted(input: &str) -> Res<'_, Expr> {
    let (mut rest, _) = char('\'')(input)?;
    let mut out = String::new();
    loop {
        let mut chars = rest.chars();
        match chars.next() {
            None => return Err(unterminated(input)),
            Some('\'') => {
                rest = &rest[1..];
                break;
            }
            Some('\\') => match chars.next() {
                Some(c @ ('\'' | '\\')) => {
                    out.push(c);
                    rest = &rest[2..];
                }
                _ => {
                    out.push('\\');
                    rest = &rest[1..];
                }
            },
            Some(c) => {
                out.push(c);
                rest = &rest[c.len_utf8()..];
            }
        }
    }
    Ok((rest, Expr::Str(out)))
}

// ============================================================================
// Lists and maps
// ============================================================================

/// `[]`, `[:]`, `[a, b]` or `[k: v, ...]`.
fn bracketed<'a>(input: &'a str, src: &'a str) -> Res<'a, Expr> {
    let (input, _) = pair(char('['), ws)(input)?;
    if let Ok((rest, _)) = char::<_, VerboseError<&str>>(']')(input) {
        return Ok((rest, Expr::List(Vec::new())));
    }
    let empty_map: Res<'a, _> = tuple((char(':'), ws, char(']')))(input);
    if let Ok((rest, _)) = empty_map {
        return Ok((rest, Expr::Map(Vec::new())));
    }
    let is_map = tuple((map_key, ws, char::<_, VerboseError<&str>>(':')))(input).is_ok();
    if is_map {
        let (rest, entries) = items(input, src, map_entry)?;
        Ok((rest, Expr::Map(entries)))
    } else {
        let (rest, values) = items(input, src, expr)?;
        Ok((rest, Expr::List(values)))
    }
}

fn items<'a, T>(
    mut input: &'a str,
    src: &'a str,
    item: fn(&'a str, &'a str) -> Res<'a, T>,
) -> Res<'a, Vec<T>> {
    let mut out = Vec::new();
    loop {
        let (rest, value) = cut(|i| item(i, src))(input)?;
        out.push(value);
        let (rest, _) = ws(rest)?;
        input = rest;
        match char::<_, VerboseError<&str>>(',')(rest) {
            Ok((rest, _)) => {
                let (rest, _) = ws(rest)?;
                input = rest;
                if rest.starts_with(']') {
                    break;
                }
            }
            Err(_) => break,
        }
    }
    let (input, _) = cut(context("closing bracket", char(']')))(input)?;
    Ok((input, out))
}

fn map_key(input: &str) -> Res<'_, String> {
    alt((
        map(identifier, str::to_string),
        map(digit1, str::to_string),
        |i| match quoted(i)? {
            (rest, Expr::Str(s)) => Ok((rest, s)),
            _ => Err(nom::Err::Error(VerboseError::from_error_kind(
                i,
                nom::error::ErrorKind::Verify,
            ))),
        },
    ))(input)
}

fn map_entry<'a>(input: &'a str, src: &'a str) -> Res<'a, (String, Expr)> {
    let (input, key) = map_key(input)?;
    let (input, _) = tuple((ws, char(':'), ws))(input)?;
    let (input, value) = expr(input, src)?;
    Ok((input, (key, value)))
}

// ============================================================================
// Tests
// ============================================================================
