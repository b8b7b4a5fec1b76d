// Copyright 2025 The Strata Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![expect(missing_docs)]

//! Parser for the revset query language.
//!
//! The grammar lives in `revset.pest`. Parsing produces an
//! [`ExpressionKind`] tree; name/symbol resolution and evaluation happen in
//! [`crate::revset`].

use std::sync::LazyLock;

use pest::Parser as _;
use pest::iterators::Pair;
use pest::pratt_parser::Assoc;
use pest::pratt_parser::Op;
use pest::pratt_parser::PrattParser;
use pest_derive::Parser;
use thiserror::Error;

#[derive(Parser)]
#[grammar = "revset.pest"]
struct RevsetParser;

#[derive(Debug, Error)]
#[error("{message}")]
pub struct RevsetParseError {
    pub message: String,
}

impl RevsetParseError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<pest::error::Error<Rule>> for RevsetParseError {
    fn from(err: pest::error::Error<Rule>) -> Self {
        Self::new(err.variant.message())
    }
}

/// Top-level set operators. All three have equal precedence and associate to
/// the left.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BinaryOp {
    Union,
    Intersection,
    Difference,
}

/// Postfix neighbor operators: `x-` steps to parents, `x+` to children.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NeighborOp {
    Parents,
    Children,
}

/// Parsed revset expression.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ExpressionKind {
    /// `@`, the working copy.
    WorkingCopy,
    /// A bare symbol: change id (or prefix), bookmark/tag name, number,
    /// date, or time span, interpreted by the consuming function.
    Symbol(String),
    /// A quoted string.
    StringLiteral(String),
    /// `name(arg, ...)`.
    Function {
        name: String,
        args: Vec<ExpressionKind>,
    },
    /// `a..b` inside `range(...)`.
    Range { from: String, to: String },
    /// A primary with postfix `-`/`+` operators applied in order.
    Neighbors {
        base: Box<ExpressionKind>,
        ops: Vec<NeighborOp>,
    },
    /// `lhs op rhs`.
    Binary {
        op: BinaryOp,
        lhs: Box<ExpressionKind>,
        rhs: Box<ExpressionKind>,
    },
}

static PRATT_PARSER: LazyLock<PrattParser<Rule>> = LazyLock::new(|| {
    PrattParser::new().op(Op::infix(Rule::union_op, Assoc::Left)
        | Op::infix(Rule::intersection_op, Assoc::Left)
        | Op::infix(Rule::difference_op, Assoc::Left))
});

/// Parses `text` into an expression tree.
pub fn parse_program(text: &str) -> Result<ExpressionKind, RevsetParseError> {
    let mut pairs = RevsetParser::parse(Rule::program, text)?;
    let expression = pairs.next().expect("program contains an expression");
    parse_expression(expression)
}

fn parse_expression(pair: Pair<'_, Rule>) -> Result<ExpressionKind, RevsetParseError> {
    debug_assert_eq!(pair.as_rule(), Rule::expression);
    PRATT_PARSER
        .map_primary(parse_neighbors)
        .map_infix(|lhs, op, rhs| {
            let op = match op.as_rule() {
                Rule::union_op => BinaryOp::Union,
                Rule::intersection_op => BinaryOp::Intersection,
                Rule::difference_op => BinaryOp::Difference,
                rule => return Err(RevsetParseError::new(format!("unexpected operator {rule:?}"))),
            };
            Ok(ExpressionKind::Binary {
                op,
                lhs: Box::new(lhs?),
                rhs: Box::new(rhs?),
            })
        })
        .parse(pair.into_inner())
}

fn parse_neighbors(pair: Pair<'_, Rule>) -> Result<ExpressionKind, RevsetParseError> {
    debug_assert_eq!(pair.as_rule(), Rule::neighbors_expression);
    let mut inner = pair.into_inner();
    let base = parse_primary(inner.next().expect("neighbors expression has a primary"))?;
    let ops: Vec<NeighborOp> = inner
        .map(|op| match op.as_rule() {
            Rule::parents_op => NeighborOp::Parents,
            Rule::children_op => NeighborOp::Children,
            rule => unreachable!("unexpected neighbor op {rule:?}"),
        })
        .collect();
    if ops.is_empty() {
        Ok(base)
    } else {
        Ok(ExpressionKind::Neighbors {
            base: Box::new(base),
            ops,
        })
    }
}

fn parse_primary(pair: Pair<'_, Rule>) -> Result<ExpressionKind, RevsetParseError> {
    match pair.as_rule() {
        Rule::at_op => Ok(ExpressionKind::WorkingCopy),
        Rule::identifier | Rule::date_literal => {
            Ok(ExpressionKind::Symbol(pair.as_str().to_string()))
        }
        Rule::string_literal => {
            let content = pair
                .into_inner()
                .next()
                .expect("string literal has content");
            Ok(ExpressionKind::StringLiteral(unescape(content.as_str())))
        }
        Rule::function => {
            let mut inner = pair.into_inner();
            let name = inner.next().expect("function has a name").as_str().to_string();
            let mut args = vec![];
            if let Some(arguments) = inner.next() {
                for argument in arguments.into_inner() {
                    match argument.as_rule() {
                        Rule::expression => args.push(parse_expression(argument)?),
                        Rule::range_expression => {
                            let mut sides = argument.into_inner();
                            let from = sides.next().expect("range has a start").as_str();
                            let to = sides.next().expect("range has an end").as_str();
                            args.push(ExpressionKind::Range {
                                from: from.to_string(),
                                to: to.to_string(),
                            });
                        }
                        rule => {
                            return Err(RevsetParseError::new(format!(
                                "unexpected argument {rule:?}"
                            )));
                        }
                    }
                }
            }
            Ok(ExpressionKind::Function { name, args })
        }
        rule => Err(RevsetParseError::new(format!("unexpected token {rule:?}"))),
    }
}

fn unescape(content: &str) -> String {
    let mut result = String::with_capacity(content.len());
    let mut chars = content.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => result.push('\n'),
                Some('t') => result.push('\t'),
                Some(escaped) => result.push(escaped),
                None => result.push(c),
            }
        } else {
            result.push(c);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn symbol(text: &str) -> ExpressionKind {
        ExpressionKind::Symbol(text.to_string())
    }

    #[test]
    fn test_parse_primaries() {
        assert_eq!(parse_program("@").unwrap(), ExpressionKind::WorkingCopy);
        assert_eq!(parse_program("abc123").unwrap(), symbol("abc123"));
        assert_eq!(parse_program("2024-05-01").unwrap(), symbol("2024-05-01"));
        assert_eq!(
            parse_program("\"hello world\"").unwrap(),
            ExpressionKind::StringLiteral("hello world".to_string())
        );
    }

    #[test]
    fn test_parse_neighbors() {
        assert_eq!(
            parse_program("@--+").unwrap(),
            ExpressionKind::Neighbors {
                base: Box::new(ExpressionKind::WorkingCopy),
                ops: vec![
                    NeighborOp::Parents,
                    NeighborOp::Parents,
                    NeighborOp::Children
                ],
            }
        );
    }

    #[test]
    fn test_parse_functions() {
        assert_eq!(
            parse_program("all()").unwrap(),
            ExpressionKind::Function {
                name: "all".to_string(),
                args: vec![],
            }
        );
        assert_eq!(
            parse_program("author(Alice)").unwrap(),
            ExpressionKind::Function {
                name: "author".to_string(),
                args: vec![symbol("Alice")],
            }
        );
        assert_eq!(
            parse_program("latest(all(), 2)").unwrap(),
            ExpressionKind::Function {
                name: "latest".to_string(),
                args: vec![
                    ExpressionKind::Function {
                        name: "all".to_string(),
                        args: vec![],
                    },
                    symbol("2"),
                ],
            }
        );
        assert_eq!(
            parse_program("range(abc..def)").unwrap(),
            ExpressionKind::Function {
                name: "range".to_string(),
                args: vec![ExpressionKind::Range {
                    from: "abc".to_string(),
                    to: "def".to_string(),
                }],
            }
        );
    }

    #[test]
    fn test_parse_infix_left_associative() {
        let parsed = parse_program("all() ~ author(Alice) | mine()").unwrap();
        // ((all() ~ author(Alice)) | mine())
        let ExpressionKind::Binary { op, lhs, .. } = parsed else {
            panic!("expected binary expression");
        };
        assert_eq!(op, BinaryOp::Union);
        assert!(matches!(
            *lhs,
            ExpressionKind::Binary {
                op: BinaryOp::Difference,
                ..
            }
        ));
    }

    #[test]
    fn test_parse_glob_symbols() {
        assert_eq!(parse_program("bookmarks(feature/*)").unwrap(), {
            ExpressionKind::Function {
                name: "bookmarks".to_string(),
                args: vec![symbol("feature/*")],
            }
        });
        assert_eq!(parse_program("last(7d)").unwrap(), {
            ExpressionKind::Function {
                name: "last".to_string(),
                args: vec![symbol("7d")],
            }
        });
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_program("").is_err());
        assert!(parse_program("author(").is_err());
        assert!(parse_program("a &").is_err());
        assert!(parse_program("& a").is_err());
    }
}
