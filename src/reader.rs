use nom::{
    IResult, Parser,
    bytes::complete::{take_while, take_while1},
    character::complete::{char, multispace0},
    error::ErrorKind,
};

use crate::ast::{IntType, Value, list, sym};
use crate::{Error, MAX_PARSE_DEPTH, ParseError, ParseErrorKind};

/// Reader options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReaderConfig {
    /// Treat `;` as the start of a comment running to the end of the line
    pub handle_comments: bool,
}

impl ReaderConfig {
    /// Settings for source files and interactive input
    pub fn with_comments() -> Self {
        ReaderConfig {
            handle_comments: true,
        }
    }
}

fn failure(input: &str, code: ErrorKind) -> nom::Err<nom::error::Error<&str>> {
    nom::Err::Failure(nom::error::Error::new(input, code))
}

fn is_whitespace(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\r' | '\n')
}

fn is_delimiter(c: char, config: ReaderConfig) -> bool {
    is_whitespace(c) || c == '(' || c == ')' || (config.handle_comments && c == ';')
}

/// Convert nom parsing errors to structured reader errors
fn to_parse_error(input: &str, error: nom::Err<nom::error::Error<&str>>) -> ParseError {
    let (remaining, code) = match error {
        nom::Err::Error(e) | nom::Err::Failure(e) => (e.input, e.code),
        nom::Err::Incomplete(_) => {
            return ParseError::new(ParseErrorKind::Incomplete, "Incomplete input");
        }
    };

    let position = input.len().saturating_sub(remaining.len());
    let (kind, message) = match code {
        ErrorKind::TooLarge => (
            ParseErrorKind::TooDeeplyNested,
            format!("Expression too deeply nested (max depth: {MAX_PARSE_DEPTH})"),
        ),
        ErrorKind::Eof => (
            ParseErrorKind::Incomplete,
            "Unexpected end of input".to_owned(),
        ),
        ErrorKind::Char if remaining.starts_with(')') => (
            ParseErrorKind::UnexpectedClose,
            format!("Unexpected ')' at position {position}"),
        ),
        _ => (
            ParseErrorKind::InvalidSyntax,
            format!("Invalid syntax at position {position}"),
        ),
    };

    ParseError::with_context(kind, message, input, char_offset(input, remaining))
}

/// Character offset of `remaining`, a suffix of `input`
fn char_offset(input: &str, remaining: &str) -> usize {
    let position = input.len().saturating_sub(remaining.len());
    input.get(..position).map_or(0, |consumed| consumed.chars().count())
}

/// Skip whitespace and, if enabled, comments
fn skip_trivia(input: &str, config: ReaderConfig) -> IResult<&str, ()> {
    let (mut input, _) = multispace0.parse(input)?;
    while config.handle_comments && input.starts_with(';') {
        let (rest, _) = take_while(|c: char| c != '\n').parse(input)?;
        (input, _) = multispace0.parse(rest)?;
    }
    Ok((input, ()))
}

/// Integer if the token parses as a signed machine integer, symbol otherwise.
/// A run of digits too large for [`IntType`] is therefore a symbol.
fn atom_value(token: &str) -> Value {
    let digits = token.strip_prefix(['+', '-']).unwrap_or(token);
    if !digits.is_empty()
        && digits.bytes().all(|b| b.is_ascii_digit())
        && let Ok(n) = token.parse::<IntType>()
    {
        return Value::Int(n);
    }
    Value::Symbol(token.to_owned())
}

/// Parse an atom: everything up to the next delimiter
fn parse_atom(input: &str, config: ReaderConfig) -> IResult<&str, Value> {
    let (rest, token) = take_while1(|c: char| !is_delimiter(c, config)).parse(input)?;
    Ok((rest, atom_value(token)))
}

fn parse_list(input: &str, config: ReaderConfig, depth: usize) -> IResult<&str, Value> {
    let (mut input, _) = char('(').parse(input)?;
    let mut elements = Vec::new();

    loop {
        let (rest, ()) = skip_trivia(input, config)?;
        if let Some(rest) = rest.strip_prefix(')') {
            return Ok((rest, Value::list_from(elements)));
        }

        // End of input inside the list surfaces as an Eof failure here
        let (rest, element) = parse_sexpr(rest, config, depth + 1)?;
        elements.push(element);
        input = rest;
    }
}

/// Parse quoted expression ('expr -> (quote expr))
fn parse_quote(input: &str, config: ReaderConfig, depth: usize) -> IResult<&str, Value> {
    let (input, _) = char('\'').parse(input)?;
    let (input, expr) = parse_sexpr(input, config, depth + 1)?;
    Ok((input, list([sym("quote"), expr])))
}

/// Parse one S-expression, skipping leading trivia
fn parse_sexpr(input: &str, config: ReaderConfig, depth: usize) -> IResult<&str, Value> {
    if depth >= MAX_PARSE_DEPTH {
        return Err(failure(input, ErrorKind::TooLarge));
    }

    let (input, ()) = skip_trivia(input, config)?;
    match input.chars().next() {
        None => Err(failure(input, ErrorKind::Eof)),
        Some('(') => parse_list(input, config, depth),
        Some(')') => Err(failure(input, ErrorKind::Char)),
        Some('\'') => parse_quote(input, config, depth),
        Some(_) => parse_atom(input, config),
    }
}

/// Read exactly one expression from `input`.
pub fn read_one(input: &str) -> Result<Value, Error> {
    read_one_with_config(input, ReaderConfig::default())
}

pub fn read_one_with_config(input: &str, config: ReaderConfig) -> Result<Value, Error> {
    let (rest, value) = parse_sexpr(input, config, 0).map_err(|e| to_parse_error(input, e))?;
    let (rest, ()) = skip_trivia(rest, config).map_err(|e| to_parse_error(input, e))?;

    if rest.is_empty() {
        Ok(value)
    } else {
        let kind = if rest.starts_with(')') {
            ParseErrorKind::UnexpectedClose
        } else {
            ParseErrorKind::InvalidSyntax
        };
        Err(ParseError::with_context(
            kind,
            "Unexpected remaining input",
            input,
            char_offset(input, rest),
        )
        .into())
    }
}

/// Read every expression in `input`, in order.
///
/// Several forms may share a line and one form may span several lines. An
/// input holding only whitespace (or comments) yields no forms.
pub fn read_all(input: &str) -> Result<Vec<Value>, Error> {
    read_all_with_config(input, ReaderConfig::default())
}

pub fn read_all_with_config(input: &str, config: ReaderConfig) -> Result<Vec<Value>, Error> {
    let mut forms = Vec::new();
    let mut rest = input;

    while let Some((form, remaining)) = read_next(rest, config)? {
        forms.push(form);
        rest = remaining;
    }
    Ok(forms)
}

/// Read the next expression from `input` and return it with the unread rest.
///
/// Returns `Ok(None)` once only whitespace (or comments) remain. Forms are
/// read one at a time so a caller can act on each before a later form in the
/// same text turns out to be malformed. Error positions are relative to
/// `input`.
pub fn read_next(input: &str, config: ReaderConfig) -> Result<Option<(Value, &str)>, Error> {
    let (remaining, ()) = skip_trivia(input, config).map_err(|e| to_parse_error(input, e))?;
    if remaining.is_empty() {
        return Ok(None);
    }

    let (rest, form) = parse_sexpr(remaining, config, 0).map_err(|e| to_parse_error(input, e))?;
    Ok(Some((form, rest)))
}
