use std::collections::VecDeque;

use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{tag, take_till1, take_while},
    character::complete::{char, digit1, one_of},
    combinator::{all_consuming, opt, recognize},
    multi::many0,
    sequence::preceded,
};

use crate::ast::{Expr, NumberType};
use crate::{Error, MAX_PARSE_DEPTH, ParseError, ParseErrorKind};

fn is_delimiter(c: char) -> bool {
    c.is_whitespace() || c == '(' || c == ')'
}

/// A single token: one parenthesis, or a maximal run of anything else that
/// isn't whitespace
fn token(input: &str) -> IResult<&str, &str> {
    preceded(
        take_while(char::is_whitespace),
        alt((tag("("), tag(")"), take_till1(is_delimiter))),
    )
    .parse(input)
}

/// Split raw text into tokens. Parentheses are always tokens of their own and
/// whitespace runs of any length separate the rest. Never fails.
pub fn tokenize(input: &str) -> Vec<&str> {
    // `token` always consumes, so `many0` stops cleanly at trailing whitespace
    many0(token)
        .parse(input)
        .map(|(_, tokens)| tokens)
        .unwrap_or_default()
}

/// Base-10 integer: optional '-', digits, nothing else
fn integer_literal(input: &str) -> IResult<&str, &str> {
    recognize((opt(char('-')), digit1)).parse(input)
}

/// Float: optional '-', digits, optional fraction, optional exponent
fn float_literal(input: &str) -> IResult<&str, &str> {
    recognize((
        opt(char('-')),
        digit1,
        opt((char('.'), digit1)),
        opt((one_of("eE"), opt(one_of("+-")), digit1)),
    ))
    .parse(input)
}

fn parse_integer(token: &str) -> Option<NumberType> {
    let (_, literal) = all_consuming(integer_literal).parse(token).ok()?;
    literal.parse().ok()
}

fn parse_float(token: &str) -> Option<f64> {
    let (_, literal) = all_consuming(float_literal).parse(token).ok()?;
    literal.parse().ok()
}

/// Classify one token: integer, then float, then symbol. The order matters,
/// "10" is an integer. Integers too large for i64 fall through to float.
pub fn atom(token: &str) -> Expr {
    parse_integer(token)
        .map(Expr::Integer)
        .or_else(|| parse_float(token).map(Expr::Float))
        .unwrap_or_else(|| Expr::Symbol(token.to_owned()))
}

/// Read one expression from the front of `tokens`, consuming exactly the
/// tokens it uses. Anything after the first complete form is left in place.
pub fn read_tokens(tokens: &mut VecDeque<&str>) -> Result<Expr, Error> {
    read_with_depth(tokens, 0)
}

fn read_with_depth(tokens: &mut VecDeque<&str>, depth: usize) -> Result<Expr, Error> {
    if depth >= MAX_PARSE_DEPTH {
        return Err(ParseError::new(
            ParseErrorKind::TooDeeplyNested,
            format!("expression too deeply nested (max depth: {MAX_PARSE_DEPTH})"),
            None,
        )
        .into());
    }

    match tokens.pop_front() {
        None => Err(ParseError::unexpected_eof().into()),
        Some("(") => {
            let mut elements = Vec::new();
            loop {
                match tokens.front() {
                    None => return Err(ParseError::unexpected_eof().into()),
                    Some(&")") => {
                        tokens.pop_front();
                        return Ok(Expr::List(elements));
                    }
                    Some(_) => elements.push(read_with_depth(tokens, depth + 1)?),
                }
            }
        }
        Some(")") => Err(ParseError::unexpected_close().into()),
        Some(token) => Ok(atom(token)),
    }
}

/// Tokenize and read the first complete expression in `input`.
pub fn parse(input: &str) -> Result<Expr, Error> {
    let mut tokens: VecDeque<&str> = tokenize(input).into();
    read_tokens(&mut tokens)
}

/// Running parenthesis depth over `tokens`, starting at `initial_depth`.
///
/// Returns the final depth: 0 when balanced, more than 0 when further input is
/// needed to close the open lists. Fails as soon as a `)` appears with nothing
/// left to close.
pub fn paren_depth(tokens: &[&str], initial_depth: usize) -> Result<usize, Error> {
    tokens
        .iter()
        .try_fold(initial_depth, |depth, token| match *token {
            "(" => Ok(depth + 1),
            ")" => depth
                .checked_sub(1)
                .ok_or_else(|| Error::from(ParseError::unexpected_close())),
            _ => Ok(depth),
        })
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;

    fn int(n: NumberType) -> Expr {
        Expr::Integer(n)
    }

    fn float(x: f64) -> Expr {
        Expr::Float(x)
    }

    fn sym(name: &str) -> Expr {
        Expr::Symbol(name.to_owned())
    }

    fn list(elements: Vec<Expr>) -> Expr {
        Expr::List(elements)
    }

    /// Test result variants for reader tests
    #[derive(Debug)]
    enum ParseTestResult {
        Success(Expr),               // Reading should succeed with this expression
        SpecificError(&'static str), // Reading should fail with error containing this string
        Error,                       // Reading should fail (any error)
    }
    use ParseTestResult::*;

    fn run_read_tests(test_cases: Vec<(Vec<&str>, ParseTestResult)>) {
        for (i, (tokens, expected)) in test_cases.into_iter().enumerate() {
            let test_id = format!("Read test #{}", i + 1);
            let mut tokens: VecDeque<&str> = tokens.into();

            match (read_tokens(&mut tokens), expected) {
                (Ok(actual), Success(expected_expr)) => {
                    assert_eq!(actual, expected_expr, "{test_id}: expression mismatch");
                }
                (Err(_), Error) => {}
                (Err(e), SpecificError(text)) => {
                    let msg = format!("{e}");
                    assert!(
                        msg.contains(text),
                        "{test_id}: error should contain '{text}', got: {msg}"
                    );
                }
                (Ok(actual), expected) => {
                    panic!("{test_id}: expected {expected:?}, got {actual:?}")
                }
                (Err(e), Success(expected_expr)) => {
                    panic!("{test_id}: expected {expected_expr:?}, got error {e:?}")
                }
            }
        }
    }

    #[test]
    fn test_tokenize() {
        let test_cases: Vec<(&str, Vec<&str>)> = vec![
            ("(hoge)", vec!["(", "hoge", ")"]),
            ("( hoge )", vec!["(", "hoge", ")"]),
            (
                "( (haskell)((     (( () ruby",
                vec!["(", "(", "haskell", ")", "(", "(", "(", "(", "(", ")", "ruby"],
            ),
            (":^@$\"%^", vec![":^@$\"%^"]),
            ("(+ 10 12 (* -5.5 8))", vec!["(", "+", "10", "12", "(", "*", "-5.5", "8", ")", ")"]),
            ("a\t\tb\n\r\nc", vec!["a", "b", "c"]),
            ("  \x0b foo\x0c ", vec!["foo"]),
            ("x)(y", vec!["x", ")", "(", "y"]),
            ("", vec![]),
            ("   \n  ", vec![]),
        ];

        for (i, (input, expected)) in test_cases.into_iter().enumerate() {
            assert_eq!(tokenize(input), expected, "Tokenize test #{}: '{input}'", i + 1);
        }
    }

    #[test]
    fn test_tokenize_counts_parens_and_words() {
        let input = "(define (f x) (g  x ))\n(h)";
        let parens = input.chars().filter(|c| *c == '(' || *c == ')').count();
        let words = input
            .replace(['(', ')'], " ")
            .split_whitespace()
            .count();
        assert_eq!(tokenize(input).len(), parens + words);
    }

    #[test]
    fn test_atom_classification() {
        let test_cases = vec![
            // Integers win over floats
            ("10", int(10)),
            ("-65536", int(-65536)),
            ("0", int(0)),
            ("-0", int(0)),
            ("9223372036854775807", int(NumberType::MAX)),
            ("-9223372036854775808", int(NumberType::MIN)),
            // Floats
            ("10.37465", float(10.37465)),
            ("-172.367", float(-172.367)),
            ("2.5", float(2.5)),
            ("1e3", float(1000.0)),
            ("-2.5E-1", float(-0.25)),
            // Out of i64 range falls through to float
            ("9223372036854775808", float(9_223_372_036_854_775_808.0)),
            // Symbols
            ("hoge", sym("hoge")),
            ("$%@*$^", sym("$%@*$^")),
            ("+", sym("+")),
            ("-", sym("-")),
            ("+10", sym("+10")),
            ("1.", sym("1.")),
            (".5", sym(".5")),
            ("1.2.3", sym("1.2.3")),
            ("10abc", sym("10abc")),
            ("inf", sym("inf")),
            ("NaN", sym("NaN")),
            ("set!", sym("set!")),
        ];

        for (i, (token, expected)) in test_cases.into_iter().enumerate() {
            assert_eq!(atom(token), expected, "Atom test #{}: '{token}'", i + 1);
        }
    }

    #[test]
    fn test_read_tokens() {
        let test_cases = vec![
            (vec!["(", ")"], Success(list(vec![]))),
            (
                vec!["(", "100", "3.25", "hoge", "$%@&^", ")"],
                Success(list(vec![int(100), float(3.25), sym("hoge"), sym("$%@&^")])),
            ),
            (
                vec![
                    "(", "(", "100", ")", "(", "ruby", "(", "neko", ")", ")", "3.25", ")",
                    "ignored",
                ],
                Success(list(vec![
                    list(vec![int(100)]),
                    list(vec![sym("ruby"), list(vec![sym("neko")])]),
                    float(3.25),
                ])),
            ),
            (vec!["42"], Success(int(42))),
            (vec![], SpecificError("unexpected EOF while reading")),
            (vec![")"], SpecificError("unexpected \")\"")),
            (vec![")", "(", "hoge", ")", ")"], SpecificError("unexpected \")\"")),
            (vec!["(", "hoge", "fuga", "210"], SpecificError("unexpected EOF while reading")),
            (vec!["(", "(", ")"], Error),
        ];

        run_read_tests(test_cases);
    }

    #[test]
    fn test_read_leaves_trailing_tokens() {
        let mut tokens: VecDeque<&str> = tokenize("(a b) c (d)").into();
        assert_eq!(read_tokens(&mut tokens).unwrap(), list(vec![sym("a"), sym("b")]));
        assert_eq!(tokens, vec!["c", "(", "d", ")"]);
        assert_eq!(read_tokens(&mut tokens).unwrap(), sym("c"));
    }

    #[test]
    fn test_parse() {
        let test_cases = vec![
            ("(hoge)", list(vec![sym("hoge")])),
            ("(hoge (10))", list(vec![sym("hoge"), list(vec![int(10)])])),
            (
                "(hoge (10) 10.5)",
                list(vec![sym("hoge"), list(vec![int(10)]), float(10.5)]),
            ),
            (
                "(+ 10 12 (* -5.5 8))",
                list(vec![
                    sym("+"),
                    int(10),
                    int(12),
                    list(vec![sym("*"), float(-5.5), int(8)]),
                ]),
            ),
            (
                "(a (b c) 1 2.5)",
                list(vec![
                    sym("a"),
                    list(vec![sym("b"), sym("c")]),
                    int(1),
                    float(2.5),
                ]),
            ),
            ("()", list(vec![])),
            ("  7  8", int(7)),
        ];

        for (i, (input, expected)) in test_cases.into_iter().enumerate() {
            let actual = parse(input).unwrap();
            assert_eq!(actual, expected, "Parse test #{}: '{input}'", i + 1);

            // Display output reads back to the same tree
            let reparsed = parse(&format!("{actual}")).unwrap();
            assert_eq!(reparsed, actual, "Parse test #{}: round-trip", i + 1);
        }
    }

    #[test]
    fn test_parse_errors() {
        for (input, kind) in [
            ("(", ParseErrorKind::Incomplete),
            ("", ParseErrorKind::Incomplete),
            ("(+ 1 (* 2 3)", ParseErrorKind::Incomplete),
            (")", ParseErrorKind::InvalidSyntax),
            (") (a)", ParseErrorKind::InvalidSyntax),
        ] {
            match parse(input) {
                Err(crate::Error::SyntaxError(e)) => assert_eq!(e.kind, kind, "input '{input}'"),
                other => panic!("expected syntax error for '{input}', got {other:?}"),
            }
        }
    }

    #[test]
    fn test_parse_depth_limit() {
        let nested_ok = format!("{}{}", "(".repeat(MAX_PARSE_DEPTH - 1), ")".repeat(MAX_PARSE_DEPTH - 1));
        assert!(parse(&nested_ok).is_ok());

        let too_deep = format!("{}{}", "(".repeat(MAX_PARSE_DEPTH + 1), ")".repeat(MAX_PARSE_DEPTH + 1));
        match parse(&too_deep) {
            Err(crate::Error::SyntaxError(e)) => {
                assert_eq!(e.kind, ParseErrorKind::TooDeeplyNested)
            }
            other => panic!("expected nesting error, got {other:?}"),
        }
    }

    #[test]
    fn test_paren_depth() {
        let test_cases: Vec<(Vec<&str>, usize, Option<usize>)> = vec![
            (vec!["("], 0, Some(1)),
            (vec!["(", "2", ")"], 0, Some(0)),
            (vec!["(", "2", "(", ")"], 0, Some(1)),
            (vec!["(", "(", "2", ")", ")"], 0, Some(0)),
            (vec![], 0, Some(0)),
            (vec![], 3, Some(3)),
            // Continuing an open expression
            (vec!["15", ")"], 1, Some(0)),
            (vec![")", ")"], 1, None),
            (vec![")"], 0, None),
            (vec![")", "("], 0, None),
        ];

        for (i, (tokens, initial, expected)) in test_cases.into_iter().enumerate() {
            let result = paren_depth(&tokens, initial);
            match expected {
                Some(depth) => assert_eq!(result.unwrap(), depth, "Depth test #{}", i + 1),
                None => assert!(result.is_err(), "Depth test #{}: expected error", i + 1),
            }
        }
    }
}
