// Parser for attribute literal text.
//
// Parses a token stream (from the lexer) into `(key, AttrValue)` pairs:
//
//   assignments := assignment (',' assignment)* ','?
//   assignment  := IDENT '=' value
//   value       := scalar | '[' (scalar (',' scalar)* ','?)? ']'
//   scalar      := INT | FLOAT | STRING | 'true' | 'false' | IDENT
//
// A bare identifier on the right-hand side reads as a string, so
// `dtype=int32` and `dtype="int32"` are equivalent. Lists must be
// homogeneous, except that integers promote to floats in a float list.
//
// Preconditions: none.
// Postconditions: returns the assignments (if parsing succeeded) plus errors.
// Failure modes: syntax errors and mixed lists produce `Rich` diagnostics.
// Side effects: none.

use chumsky::input::{Stream, ValueInput};
use chumsky::prelude::*;
use chumsky::span::SimpleSpan;

use crate::attr::{AttrMap, AttrValue};
use crate::lexer::Token;

/// Result of parsing: assignments plus any errors.
#[derive(Debug)]
pub struct ParseResult {
    pub assignments: Option<Vec<(String, AttrValue)>>,
    pub errors: Vec<Rich<'static, Token, SimpleSpan>>,
}

impl ParseResult {
    /// Collect the assignments into an `AttrMap` when parsing was clean.
    /// Later assignments of the same key win.
    pub fn into_attrs(self) -> Result<AttrMap, Vec<Rich<'static, Token, SimpleSpan>>> {
        match self.assignments {
            Some(assignments) if self.errors.is_empty() => Ok(assignments.into_iter().collect()),
            _ => Err(self.errors),
        }
    }
}

/// Parse attribute literal text. Lexes then parses.
pub fn parse(source: &str) -> ParseResult {
    let lex_result = crate::lexer::lex(source);
    let len = source.len();

    let token_iter = lex_result.tokens.into_iter().map(|(tok, span)| {
        let cspan: SimpleSpan = (span.start..span.end).into();
        (tok, cspan)
    });
    let eoi: SimpleSpan = (len..len).into();
    let stream = Stream::from_iter(token_iter).map(eoi, |(t, s): (_, _)| (t, s));

    let parser = assignments_parser(source);
    let (assignments, parse_errors) = parser.parse(stream).into_output_errors();

    let mut all_errors: Vec<Rich<'static, Token, SimpleSpan>> = lex_result
        .errors
        .into_iter()
        .map(|e| {
            let span: SimpleSpan = (e.span.start..e.span.end).into();
            Rich::custom(span, e.message)
        })
        .collect();
    all_errors.extend(parse_errors.into_iter().map(|e| e.into_owned()));

    ParseResult {
        assignments,
        errors: all_errors,
    }
}

#[derive(Debug, Clone)]
enum Scalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl Scalar {
    fn into_value(self) -> AttrValue {
        match self {
            Scalar::Bool(b) => AttrValue::Bool(b),
            Scalar::Int(n) => AttrValue::Int(n),
            Scalar::Float(x) => AttrValue::Float(x),
            Scalar::Str(s) => AttrValue::Str(s),
        }
    }
}

/// Build a homogeneous list value, promoting ints when floats are present.
fn list_value(items: Vec<Scalar>) -> Result<AttrValue, String> {
    let mismatch = || "list elements must all have the same kind".to_string();

    if items.iter().any(|s| matches!(s, Scalar::Float(_))) {
        return items
            .into_iter()
            .map(|s| match s {
                Scalar::Int(n) => Ok(n as f64),
                Scalar::Float(x) => Ok(x),
                _ => Err(mismatch()),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(AttrValue::FloatList);
    }

    match items.first() {
        None | Some(Scalar::Int(_)) | Some(Scalar::Float(_)) => items
            .into_iter()
            .map(|s| match s {
                Scalar::Int(n) => Ok(n),
                _ => Err(mismatch()),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(AttrValue::IntList),
        Some(Scalar::Bool(_)) => items
            .into_iter()
            .map(|s| match s {
                Scalar::Bool(b) => Ok(b),
                _ => Err(mismatch()),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(AttrValue::BoolList),
        Some(Scalar::Str(_)) => items
            .into_iter()
            .map(|s| match s {
                Scalar::Str(v) => Ok(v),
                _ => Err(mismatch()),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(AttrValue::StrList),
    }
}

fn assignments_parser<'tokens, 'src: 'tokens, I>(
    source: &'src str,
) -> impl Parser<'tokens, I, Vec<(String, AttrValue)>, extra::Err<Rich<'tokens, Token, SimpleSpan>>>
       + 'src
where
    'tokens: 'src,
    I: ValueInput<'tokens, Token = Token, Span = SimpleSpan>,
{
    let ident = just(Token::Ident).map_with(move |_, e| {
        let span: SimpleSpan = e.span();
        source[span.start()..span.end()].to_string()
    });

    let scalar = select! {
        Token::Int(n) => Scalar::Int(n),
        Token::Float(x) => Scalar::Float(x),
        Token::StringLit(s) => Scalar::Str(s),
        Token::True => Scalar::Bool(true),
        Token::False => Scalar::Bool(false),
    }
    .or(ident.clone().map(Scalar::Str));

    let list = scalar
        .clone()
        .separated_by(just(Token::Comma))
        .allow_trailing()
        .collect::<Vec<_>>()
        .delimited_by(just(Token::LBracket), just(Token::RBracket))
        .try_map(|items, span| list_value(items).map_err(|msg| Rich::custom(span, msg)));

    let value = list.or(scalar.map(Scalar::into_value));

    let assignment = ident.then_ignore(just(Token::Equals)).then(value);

    assignment
        .separated_by(just(Token::Comma))
        .allow_trailing()
        .collect::<Vec<_>>()
        .then_ignore(end())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(source: &str) -> Vec<(String, AttrValue)> {
        let result = parse(source);
        assert!(result.errors.is_empty(), "parse errors: {:?}", result.errors);
        result.assignments.expect("no output")
    }

    #[test]
    fn shape_and_dtype() {
        let got = parse_ok(r#"shape=[4, 8], dtype="int32""#);
        assert_eq!(
            got,
            vec![
                ("shape".to_string(), AttrValue::IntList(vec![4, 8])),
                ("dtype".to_string(), AttrValue::Str("int32".to_string())),
            ]
        );
    }

    #[test]
    fn bare_identifier_is_string() {
        let got = parse_ok("dtype=int64");
        assert_eq!(got[0].1, AttrValue::Str("int64".to_string()));
    }

    #[test]
    fn scalars() {
        let got = parse_ok("low=-2, scale=0.5, flag=true");
        assert_eq!(got[0].1, AttrValue::Int(-2));
        assert_eq!(got[1].1, AttrValue::Float(0.5));
        assert_eq!(got[2].1, AttrValue::Bool(true));
    }

    #[test]
    fn empty_list_is_int_list() {
        let got = parse_ok("shape=[]");
        assert_eq!(got[0].1, AttrValue::IntList(vec![]));
    }

    #[test]
    fn int_promotes_in_float_list() {
        let got = parse_ok("w=[1, 2.5]");
        assert_eq!(got[0].1, AttrValue::FloatList(vec![1.0, 2.5]));
    }

    #[test]
    fn mixed_list_rejected() {
        let result = parse(r#"x=[1, "a"]"#);
        assert!(!result.errors.is_empty());
    }

    #[test]
    fn missing_value_rejected() {
        let result = parse("shape=");
        assert!(!result.errors.is_empty());
    }

    #[test]
    fn into_attrs_later_key_wins() {
        let attrs = parse("dtype=int32, dtype=int64").into_attrs().unwrap();
        assert_eq!(attrs.get_str("dtype").unwrap(), Some("int64"));
    }
}
