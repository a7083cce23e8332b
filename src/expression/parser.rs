//! PEST-based parser for templates
//!
//! Produces a `Template` AST with span information for error reporting.

use pest::iterators::{Pair, Pairs};
use pest::Parser;
use pest_derive::Parser;

use super::ast::{BinaryOp, Expr, Segment, Span, Template, UnaryOp};

/* ===================== PEST Parser ===================== */

#[derive(Parser)]
#[grammar = "expression/template.pest"]
struct TemplateParser;

/* ===================== Error Types ===================== */

#[derive(Debug, Clone, PartialEq)]
pub enum ParseError {
    PestError(String, Option<Span>),
    BuildError(String, Option<Span>),
}

impl ParseError {
    pub fn span(&self) -> Option<Span> {
        match self {
            ParseError::PestError(_, span) => *span,
            ParseError::BuildError(_, span) => *span,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ParseError::PestError(msg, _) => msg,
            ParseError::BuildError(msg, _) => msg,
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ParseError {}

impl From<pest::error::Error<Rule>> for ParseError {
    fn from(err: pest::error::Error<Rule>) -> Self {
        let span = match err.line_col {
            pest::error::LineColLocation::Pos((line, col)) => Some(Span {
                start: 0,
                end: 0,
                start_line: line.saturating_sub(1),
                start_col: col.saturating_sub(1),
                end_line: line.saturating_sub(1),
                end_col: col,
            }),
            pest::error::LineColLocation::Span((start_line, start_col), (end_line, end_col)) => {
                Some(Span {
                    start: 0,
                    end: 0,
                    start_line: start_line.saturating_sub(1),
                    start_col: start_col.saturating_sub(1),
                    end_line: end_line.saturating_sub(1),
                    end_col: end_col.saturating_sub(1),
                })
            }
        };
        ParseError::PestError(err.to_string(), span)
    }
}

pub type ParseResult<T> = Result<T, ParseError>;

/* ===================== Span Helpers ===================== */

/// Convert a PEST pair's span to our Span type
fn pair_to_span(pair: &Pair<Rule>, source: &str) -> Span {
    let pest_span = pair.as_span();
    let start = pest_span.start();
    let end = pest_span.end();

    let (start_line, start_col) = offset_to_line_col(source, start);
    let (end_line, end_col) = offset_to_line_col(source, end);

    Span::new(start, end, start_line, start_col, end_line, end_col)
}

/// Convert byte offset to (line, column) - 0-indexed
fn offset_to_line_col(source: &str, offset: usize) -> (usize, usize) {
    let mut line = 0;
    let mut col = 0;
    let mut current_offset = 0;

    for ch in source.chars() {
        if current_offset >= offset {
            break;
        }
        if ch == '\n' {
            line += 1;
            col = 0;
        } else {
            col += 1;
        }
        current_offset += ch.len_utf8();
    }

    (line, col)
}

/// Pull the next inner pair, reporting a build error if the grammar produced none
fn next_pair<'i>(inner: &mut Pairs<'i, Rule>, span: Span, what: &str) -> ParseResult<Pair<'i, Rule>> {
    inner
        .next()
        .ok_or_else(|| ParseError::BuildError(format!("Missing {}", what), Some(span)))
}

/* ===================== Public API ===================== */

/// Parse a template source string into a `Template`
pub fn parse_template(source: &str) -> ParseResult<Template> {
    let mut pairs = TemplateParser::parse(Rule::template, source)?;
    let template = pairs
        .next()
        .ok_or_else(|| ParseError::BuildError("Empty parse result".to_string(), None))?;
    let span = pair_to_span(&template, source);

    let mut segments = Vec::new();
    for pair in template.into_inner() {
        let segment_span = pair_to_span(&pair, source);
        match pair.as_rule() {
            Rule::text => segments.push(Segment::Text {
                v: pair.as_str().to_string(),
                span: segment_span,
            }),
            Rule::placeholder => {
                let mut inner = pair.into_inner();
                let expr_pair = next_pair(&mut inner, segment_span, "placeholder expression")?;
                segments.push(Segment::Expr {
                    expr: build_expression(expr_pair, source)?,
                    span: segment_span,
                });
            }
            Rule::EOI => {}
            other => {
                return Err(ParseError::BuildError(
                    format!("Unexpected template content: {:?}", other),
                    Some(segment_span),
                ))
            }
        }
    }

    Ok(Template { segments, span })
}

/// Parse a bare expression (no surrounding braces)
pub fn parse_expression(source: &str) -> ParseResult<Expr> {
    let wrapped = format!("{{{{ {} }}}}", source);
    let template = parse_template(&wrapped)?;
    match template.segments.into_iter().next() {
        Some(Segment::Expr { expr, .. }) => Ok(expr),
        _ => Err(ParseError::BuildError(
            format!("Not an expression: {}", source),
            None,
        )),
    }
}

/* ===================== AST Builder ===================== */

fn build_binary_expr(pair: Pair<Rule>, source: &str) -> ParseResult<Expr> {
    let span = pair_to_span(&pair, source);
    let inner_pairs: Vec<_> = pair.into_inner().collect();

    if inner_pairs.is_empty() {
        return Err(ParseError::BuildError(
            "Empty binary expression".to_string(),
            Some(span),
        ));
    }

    let mut left = build_expression(inner_pairs[0].clone(), source)?;

    let mut i = 1;
    while i < inner_pairs.len() {
        let op_rule = inner_pairs[i].as_rule();

        i += 1;
        if i >= inner_pairs.len() {
            return Err(ParseError::BuildError(
                "Missing right operand after operator".to_string(),
                Some(span),
            ));
        }

        let right = build_expression(inner_pairs[i].clone(), source)?;
        let new_span = left.span().merge(&right.span());

        let op = match op_rule {
            Rule::op_or => BinaryOp::Or,
            Rule::op_and => BinaryOp::And,
            Rule::op_lt => BinaryOp::Lt,
            Rule::op_gt => BinaryOp::Gt,
            Rule::op_eq => BinaryOp::Eq,
            Rule::op_ne => BinaryOp::Ne,
            Rule::op_ge => BinaryOp::Ge,
            Rule::op_le => BinaryOp::Le,
            Rule::op_in => BinaryOp::In,
            Rule::op_not_in => BinaryOp::NotIn,
            Rule::op_is => BinaryOp::Is,
            Rule::op_is_not => BinaryOp::IsNot,
            Rule::op_add => BinaryOp::Add,
            Rule::op_sub => BinaryOp::Sub,
            Rule::op_mul => BinaryOp::Mul,
            Rule::op_div => BinaryOp::Div,
            Rule::op_floordiv => BinaryOp::FloorDiv,
            Rule::op_mod => BinaryOp::Mod,
            _ => {
                return Err(ParseError::BuildError(
                    format!(
                        "Expected operator rule at index {}, got {:?}",
                        i - 1,
                        op_rule
                    ),
                    Some(span),
                ))
            }
        };

        left = Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
            span: new_span,
        };

        i += 1;
    }

    Ok(left)
}

fn build_expression(pair: Pair<Rule>, source: &str) -> ParseResult<Expr> {
    let span = pair_to_span(&pair, source);

    match pair.as_rule() {
        Rule::expression => {
            let mut inner = pair.into_inner();
            build_expression(next_pair(&mut inner, span, "expression")?, source)
        }
        Rule::disjunction
        | Rule::conjunction
        | Rule::comparison
        | Rule::sum
        | Rule::product => build_binary_expr(pair, source),
        Rule::inversion => {
            let mut inner = pair.into_inner();
            let first = next_pair(&mut inner, span, "inversion operand")?;

            match first.as_rule() {
                Rule::op_not => {
                    let operand_pair = next_pair(&mut inner, span, "operand of 'not'")?;
                    Ok(Expr::Unary {
                        op: UnaryOp::Not,
                        operand: Box::new(build_expression(operand_pair, source)?),
                        span,
                    })
                }
                _ => build_expression(first, source),
            }
        }
        Rule::negation => {
            let mut inner = pair.into_inner();
            let operand_pair = next_pair(&mut inner, span, "operand of '-'")?;
            Ok(Expr::Unary {
                op: UnaryOp::Neg,
                operand: Box::new(build_expression(operand_pair, source)?),
                span,
            })
        }
        Rule::postfix => build_postfix(pair, source),
        Rule::identifier => Ok(Expr::Ident {
            name: pair.as_str().to_string(),
            span,
        }),
        Rule::integer => {
            let num_str = pair.as_str();
            match num_str.parse::<i64>() {
                Ok(v) => Ok(Expr::LitInt { v, span }),
                // Out of i64 range: keep the magnitude as a float
                Err(_) => num_str
                    .parse::<f64>()
                    .map(|v| Expr::LitFloat { v, span })
                    .map_err(|e| {
                        ParseError::BuildError(
                            format!("Failed to parse number '{}': {}", num_str, e),
                            Some(span),
                        )
                    }),
            }
        }
        Rule::float => {
            let num_str = pair.as_str();
            let v = num_str.parse::<f64>().map_err(|e| {
                ParseError::BuildError(
                    format!("Failed to parse number '{}': {}", num_str, e),
                    Some(span),
                )
            })?;
            Ok(Expr::LitFloat { v, span })
        }
        Rule::boolean => Ok(Expr::LitBool {
            v: pair.as_str() == "True",
            span,
        }),
        Rule::none => Ok(Expr::LitNull { span }),
        Rule::string => Ok(Expr::LitStr {
            v: build_string(pair, source)?,
            span,
        }),
        Rule::list => {
            let elements = pair
                .into_inner()
                .map(|element| build_expression(element, source))
                .collect::<ParseResult<Vec<_>>>()?;
            Ok(Expr::LitList { elements, span })
        }
        Rule::dict => {
            let entries = pair
                .into_inner()
                .map(|entry| build_dict_pair(entry, source))
                .collect::<ParseResult<Vec<_>>>()?;
            Ok(Expr::LitDict { entries, span })
        }
        _ => Err(ParseError::BuildError(
            format!("Unexpected expression rule: {:?}", pair.as_rule()),
            Some(span),
        )),
    }
}

fn build_postfix(pair: Pair<Rule>, source: &str) -> ParseResult<Expr> {
    let span = pair_to_span(&pair, source);
    let mut inner = pair.into_inner();
    let atom_pair = next_pair(&mut inner, span, "postfix operand")?;
    let mut expr = build_expression(atom_pair, source)?;

    for suffix in inner {
        let suffix_span = pair_to_span(&suffix, source);
        let new_span = expr.span().merge(&suffix_span);

        expr = match suffix.as_rule() {
            Rule::index_suffix => {
                let mut suffix_inner = suffix.into_inner();
                let index_pair = next_pair(&mut suffix_inner, suffix_span, "index")?;
                if index_pair.as_rule() == Rule::slice {
                    let mut lower = None;
                    let mut upper = None;
                    for bound in index_pair.into_inner() {
                        let bound_span = pair_to_span(&bound, source);
                        let rule = bound.as_rule();
                        let mut bound_inner = bound.into_inner();
                        let bound_expr = build_expression(
                            next_pair(&mut bound_inner, bound_span, "slice bound")?,
                            source,
                        )?;
                        match rule {
                            Rule::slice_lower => lower = Some(Box::new(bound_expr)),
                            _ => upper = Some(Box::new(bound_expr)),
                        }
                    }
                    Expr::Slice {
                        object: Box::new(expr),
                        lower,
                        upper,
                        span: new_span,
                    }
                } else {
                    Expr::Index {
                        object: Box::new(expr),
                        index: Box::new(build_expression(index_pair, source)?),
                        span: new_span,
                    }
                }
            }
            Rule::attr_suffix => {
                let mut suffix_inner = suffix.into_inner();
                let name_pair = next_pair(&mut suffix_inner, suffix_span, "attribute name")?;
                let name_span = pair_to_span(&name_pair, source);
                Expr::Index {
                    object: Box::new(expr),
                    index: Box::new(Expr::LitStr {
                        v: name_pair.as_str().to_string(),
                        span: name_span,
                    }),
                    span: new_span,
                }
            }
            Rule::filter_suffix => {
                let mut suffix_inner = suffix.into_inner();
                let name_pair = next_pair(&mut suffix_inner, suffix_span, "filter name")?;
                let args = match suffix_inner.next() {
                    Some(args_pair) => args_pair
                        .into_inner()
                        .map(|arg| build_expression(arg, source))
                        .collect::<ParseResult<Vec<_>>>()?,
                    None => vec![],
                };
                Expr::Filter {
                    value: Box::new(expr),
                    name: name_pair.as_str().to_string(),
                    args,
                    span: new_span,
                }
            }
            other => {
                return Err(ParseError::BuildError(
                    format!("Unexpected postfix rule: {:?}", other),
                    Some(suffix_span),
                ))
            }
        };
    }

    Ok(expr)
}

fn build_dict_pair(pair: Pair<Rule>, source: &str) -> ParseResult<(String, Expr)> {
    let span = pair_to_span(&pair, source);
    let mut inner = pair.into_inner();
    let key = build_string(next_pair(&mut inner, span, "dict key")?, source)?;
    let value = build_expression(next_pair(&mut inner, span, "dict value")?, source)?;
    Ok((key, value))
}

fn build_string(pair: Pair<Rule>, source: &str) -> ParseResult<String> {
    let span = pair_to_span(&pair, source);
    match pair.into_inner().next() {
        Some(content) => unescape(content.as_str()).map_err(|msg| ParseError::BuildError(msg, Some(span))),
        None => Ok(String::new()),
    }
}

/// Resolve backslash escapes inside a quoted string literal
fn unescape(raw: &str) -> Result<String, String> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();

    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some('\\') => out.push('\\'),
            Some('\'') => out.push('\''),
            Some('"') => out.push('"'),
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                let code = u32::from_str_radix(&hex, 16)
                    .ok()
                    .and_then(char::from_u32)
                    .ok_or_else(|| format!("Invalid unicode escape '\\u{}'", hex))?;
                out.push(code);
            }
            // Unknown escapes are kept verbatim
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }

    Ok(out)
}
