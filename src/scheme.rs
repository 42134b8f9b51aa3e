//! Reader: source text to cons cells.
//!
//! The source is wrapped as `(begin <source>\n)`, split into tokens with nom, and
//! parsed in a single forward pass over the token list. A token is `(`, `)`, or a
//! maximal run of characters that are neither parentheses nor whitespace (space, tab,
//! CR, LF). Atoms become numbers, text literals or interned symbols.
//!
//! Quoting is not interpreted while tokenizing, so a text literal cannot contain
//! whitespace or parentheses: `"hello"` is text, `"hello world"` is two symbols.

use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{take_while, take_while1},
    character::complete::{char, digit0, digit1, one_of},
    combinator::{all_consuming, map, opt, recognize, value},
    multi::many0,
    sequence::pair,
};

use crate::ast::{ListBuilder, NumberType, Value};
use crate::stack::ensure_sufficient_stack;
use crate::symbols::SymbolTable;
use crate::{Error, MAX_PARSE_DEPTH, ParseError, ParseErrorKind};

/// Text placed in front of every program
const PROGRAM_PREFIX: &str = "(begin ";
/// Text placed after every program; the newline ends a trailing comment
const PROGRAM_SUFFIX: &str = "\n)";

/// Reader configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReaderConfig {
    /// Maximum list nesting below the implicit top-level `begin`
    pub max_depth: usize,
    /// Treat `;` as the start of a comment running to the end of the line
    pub handle_comments: bool,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        ReaderConfig {
            max_depth: MAX_PARSE_DEPTH,
            handle_comments: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenKind<'a> {
    Open,
    Close,
    Atom(&'a str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Token<'a> {
    kind: TokenKind<'a>,
    /// Byte offset into the wrapped source
    offset: usize,
}

impl Token<'_> {
    fn text(&self) -> &str {
        match self.kind {
            TokenKind::Open => "(",
            TokenKind::Close => ")",
            TokenKind::Atom(text) => text,
        }
    }
}

fn is_whitespace(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\r' | '\n')
}

fn is_atom_char(c: char, handle_comments: bool) -> bool {
    !(is_whitespace(c) || c == '(' || c == ')' || (handle_comments && c == ';'))
}

/// `;` up to (not including) the next newline
fn comment(input: &str) -> IResult<&str, &str> {
    recognize(pair(char(';'), take_while(|c| c != '\n'))).parse(input)
}

/// Skip whitespace, and comments when enabled
fn trivia(input: &str, handle_comments: bool) -> IResult<&str, ()> {
    if handle_comments {
        value((), many0(alt((take_while1(is_whitespace), comment)))).parse(input)
    } else {
        value((), take_while(is_whitespace)).parse(input)
    }
}

fn token(input: &str, handle_comments: bool) -> IResult<&str, TokenKind<'_>> {
    alt((
        value(TokenKind::Open, char('(')),
        value(TokenKind::Close, char(')')),
        map(
            take_while1(move |c| is_atom_char(c, handle_comments)),
            TokenKind::Atom,
        ),
    ))
    .parse(input)
}

/// `[+-]? (digits ('.' digits*)? | '.' digits) ([eE] [+-]? digits)?`
fn number_literal(input: &str) -> IResult<&str, ()> {
    value(
        (),
        pair(
            pair(
                opt(one_of("+-")),
                alt((
                    recognize(pair(digit1, opt(pair(char('.'), digit0)))),
                    recognize(pair(char('.'), digit1)),
                )),
            ),
            opt(pair(one_of("eE"), pair(opt(one_of("+-")), digit1))),
        ),
    )
    .parse(input)
}

/// An atom that matches the numeric grammar in full, converted as a whole
fn parse_number(atom: &str) -> Option<NumberType> {
    all_consuming(number_literal)
        .parse(atom)
        .ok()
        .and_then(|_| atom.parse::<NumberType>().ok())
}

/// A token of at least two characters that starts and ends with `"`
fn parse_text(atom: &str) -> Option<&str> {
    if atom.len() >= 2 && atom.starts_with('"') && atom.ends_with('"') {
        Some(&atom[1..atom.len() - 1])
    } else {
        None
    }
}

fn syntax_error(
    kind: ParseErrorKind,
    message: impl Into<String>,
    source: &str,
    wrapped_offset: usize,
    found: Option<String>,
) -> Error {
    let offset = wrapped_offset.saturating_sub(PROGRAM_PREFIX.len());
    Error::SyntaxError(ParseError::with_context_and_found(
        kind, message, source, offset, found,
    ))
}

fn tokenize<'a>(
    source: &str,
    wrapped: &'a str,
    handle_comments: bool,
) -> Result<Vec<Token<'a>>, Error> {
    let mut tokens = Vec::new();
    let mut rest = wrapped;
    loop {
        let (after_trivia, ()) = trivia(rest, handle_comments).map_err(|_| {
            syntax_error(
                ParseErrorKind::InvalidSyntax,
                "Unreadable input",
                source,
                wrapped.len() - rest.len(),
                None,
            )
        })?;
        if after_trivia.is_empty() {
            return Ok(tokens);
        }

        let offset = wrapped.len() - after_trivia.len();
        let (after_token, kind) = token(after_trivia, handle_comments).map_err(|_| {
            syntax_error(
                ParseErrorKind::InvalidSyntax,
                "Unreadable input",
                source,
                offset,
                after_trivia.chars().next().map(String::from),
            )
        })?;
        tokens.push(Token { kind, offset });
        rest = after_token;
    }
}

struct Reader<'a, 's> {
    source: &'a str,
    wrapped_len: usize,
    tokens: Vec<Token<'a>>,
    pos: usize,
    symbols: &'s mut SymbolTable,
    max_depth: usize,
}

impl Reader<'_, '_> {
    fn parse_object(&mut self, depth: usize) -> Result<Value, Error> {
        let Some(token) = self.tokens.get(self.pos).copied() else {
            return Err(self.unexpected_end());
        };
        self.pos += 1;

        match token.kind {
            TokenKind::Open => ensure_sufficient_stack(|| self.parse_list(depth, token.offset)),
            TokenKind::Close => Err(syntax_error(
                ParseErrorKind::TrailingContent,
                "Unexpected ')'",
                self.source,
                token.offset,
                Some(")".to_owned()),
            )),
            TokenKind::Atom(atom) => Ok(self.parse_atom(atom)),
        }
    }

    fn parse_atom(&mut self, atom: &str) -> Value {
        if let Some(n) = parse_number(atom) {
            Value::Number(n)
        } else if let Some(text) = parse_text(atom) {
            Value::text(text)
        } else {
            Value::Symbol(self.symbols.intern(atom))
        }
    }

    /// Parse list elements after the opening parenthesis at `open_offset`
    fn parse_list(&mut self, depth: usize, open_offset: usize) -> Result<Value, Error> {
        if depth > self.max_depth {
            return Err(syntax_error(
                ParseErrorKind::TooDeeplyNested,
                format!("Expression too deeply nested (max depth: {})", self.max_depth),
                self.source,
                open_offset,
                None,
            ));
        }

        let mut builder = ListBuilder::new();
        loop {
            match self.tokens.get(self.pos) {
                None => return Err(self.unexpected_end()),
                Some(Token {
                    kind: TokenKind::Close,
                    ..
                }) => {
                    self.pos += 1;
                    return Ok(builder.finish());
                }
                Some(_) => builder.push(self.parse_object(depth + 1)?),
            }
        }
    }

    fn unexpected_end(&self) -> Error {
        syntax_error(
            ParseErrorKind::Incomplete,
            "Unexpected end of input: missing ')'",
            self.source,
            self.wrapped_len,
            None,
        )
    }
}

/// Read `source` as one implicit `(begin ...)` program, interning symbols in `symbols`
pub fn read(source: &str, symbols: &mut SymbolTable, config: &ReaderConfig) -> Result<Value, Error> {
    let wrapped = format!("{PROGRAM_PREFIX}{source}{PROGRAM_SUFFIX}");
    let tokens = tokenize(source, &wrapped, config.handle_comments)?;

    let mut reader = Reader {
        source,
        wrapped_len: wrapped.len(),
        tokens,
        pos: 0,
        symbols,
        max_depth: config.max_depth,
    };
    let program = reader.parse_object(0)?;

    // A stray `)` closed the implicit `begin` early
    if let Some(leftover) = reader.tokens.get(reader.pos) {
        let stray = reader
            .pos
            .checked_sub(1)
            .and_then(|i| reader.tokens.get(i))
            .map_or(leftover.offset, |closing| closing.offset);
        return Err(syntax_error(
            ParseErrorKind::TrailingContent,
            "Unbalanced ')': unexpected content after the end of the program",
            source,
            stray,
            Some(leftover.text().to_owned()),
        ));
    }

    Ok(program)
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;

    /// Test result variants for parse tests
    #[derive(Debug)]
    enum ParseTestResult {
        Printed(&'static str),            // Parse should succeed and print as this text
        Number(NumberType),               // Program should hold exactly this number
        Text(&'static str),               // Program should hold exactly this text
        SpecificError(ParseErrorKind),    // Parse should fail with this kind
    }
    use ParseTestResult::*;

    fn read_default(input: &str) -> Result<Value, Error> {
        read(input, &mut SymbolTable::new(), &ReaderConfig::default())
    }

    /// The single form inside the implicit `begin`
    fn only_form(program: &Value) -> Value {
        let forms: Vec<Value> = program.iter().skip(1).collect();
        assert_eq!(forms.len(), 1, "expected one form in {program}");
        forms[0].clone()
    }

    /// Run parse tests, checking that printed programs read back to the same text
    fn run_parse_tests(test_cases: Vec<(&str, ParseTestResult)>) {
        for (i, (input, expected)) in test_cases.iter().enumerate() {
            let test_id = format!("Parse test #{} '{input}'", i + 1);
            match (read_default(input), expected) {
                (Ok(actual), Printed(text)) => {
                    let displayed = format!("{actual}");
                    let expected = if text.is_empty() {
                        "(begin)".to_owned()
                    } else {
                        format!("(begin {text})")
                    };
                    assert_eq!(displayed, expected, "{test_id}");

                    // Round-trip: the body of the printed program reads back unchanged
                    let reparsed = read_default(text).unwrap_or_else(|e| {
                        panic!("{test_id}: round-trip parse failed for '{text}': {e}")
                    });
                    assert_eq!(format!("{reparsed}"), displayed, "{test_id}: round-trip");
                }
                (Ok(actual), Number(n)) => {
                    assert_eq!(only_form(&actual), Value::Number(*n), "{test_id}");
                }
                (Ok(actual), Text(text)) => {
                    assert_eq!(only_form(&actual), Value::text(text), "{test_id}");
                }
                (Err(Error::SyntaxError(err)), SpecificError(kind)) => {
                    assert_eq!(err.kind, *kind, "{test_id}: {err}");
                }
                (Err(err), _) => panic!("{test_id}: unexpected error {err:?}"),
                (Ok(actual), SpecificError(kind)) => {
                    panic!("{test_id}: expected {kind:?}, got {actual}")
                }
            }
        }
    }

    #[test]
    fn test_parser_comprehensive() {
        let test_cases = vec![
            // ===== NUMBERS =====
            ("42", Number(42.0)),
            ("-5", Number(-5.0)),
            ("+3", Number(3.0)),
            ("3.14", Number(3.14)),
            ("5.", Number(5.0)),
            (".5", Number(0.5)),
            ("-.25", Number(-0.25)),
            ("1e3", Number(1000.0)),
            ("2.5E-2", Number(0.025)),
            ("-1e+2", Number(-100.0)),
            // Not numbers: become symbols
            ("-", Printed("-")),
            ("+", Printed("+")),
            ("1+", Printed("1+")),
            ("1e", Printed("1e")),
            ("e5", Printed("e5")),
            ("1.2.3", Printed("1.2.3")),
            ("...", Printed("...")),
            ("#x1A", Printed("#x1A")),
            // ===== TEXT =====
            ("\"hello\"", Text("hello")),
            ("\"\"", Text("")),
            ("\"a\"b\"", Text("a\"b")),
            ("\"", Printed("\"")),
            ("\"abc", Printed("\"abc")),
            // ===== SYMBOLS =====
            ("foo", Printed("foo")),
            ("set!", Printed("set!")),
            ("#t #f", Printed("#t #f")),
            ("atom? eq?", Printed("atom? eq?")),
            // ===== LISTS =====
            ("()", Printed("()")),
            ("(1 2 3)", Printed("(1 2 3)")),
            ("(a (b (c)) ())", Printed("(a (b (c)) ())")),
            ("(+ 1 2) (* 3 4)", Printed("(+ 1 2) (* 3 4)")),
            ("(define (f x) (* x x))", Printed("(define (f x) (* x x))")),
            // Whitespace is space, tab, CR and LF
            ("  a\tb\r\nc  ", Printed("a b c")),
            ("(a(b)c)", Printed("(a (b) c)")),
            // `;` is an ordinary character unless comments are enabled
            ("; x", Printed("; x")),
            ("", Printed("")),
            // ===== ERRORS =====
            ("(", SpecificError(ParseErrorKind::Incomplete)),
            ("(+ 1", SpecificError(ParseErrorKind::Incomplete)),
            ("((a)", SpecificError(ParseErrorKind::Incomplete)),
            ("1)", SpecificError(ParseErrorKind::TrailingContent)),
            (")(", SpecificError(ParseErrorKind::TrailingContent)),
            ("(a)) (b", SpecificError(ParseErrorKind::TrailingContent)),
        ];

        run_parse_tests(test_cases);
    }

    #[test]
    fn test_number_literals_keep_every_digit() {
        let cases = [
            ("3.14", Some(3.14)),
            ("-2.5", Some(-2.5)),
            ("0.25", Some(0.25)),
            ("248258.7741491364", Some(248_258.774_149_136_4)),
            ("1.5e2", Some(150.0)),
            ("-.125e1", Some(-1.25)),
            ("1.", Some(1.0)),
            ("1.e", None),
            ("1.5.", None),
            ("nan", None),
            ("inf", None),
        ];
        for (atom, expected) in cases {
            assert_eq!(parse_number(atom), expected, "'{atom}'");
        }
    }

    #[test]
    fn test_program_is_wrapped_in_begin() {
        let mut symbols = SymbolTable::new();
        let program = read("1 2", &mut symbols, &ReaderConfig::default()).unwrap();
        let head = program.as_pair().unwrap().car().clone();
        assert_eq!(head, Value::Symbol(symbols.intern("begin")));
        assert_eq!(program.list_len(), 3);
        assert!(program.is_proper_list());
    }

    #[test]
    fn test_symbols_are_interned() {
        let mut symbols = SymbolTable::new();
        let program = read("(foo foo bar)", &mut symbols, &ReaderConfig::default()).unwrap();
        let items: Vec<Value> = only_form(&program).iter().collect();
        assert_eq!(items[0], items[1]);
        assert_ne!(items[0], items[2]);
        assert_eq!(items[0], Value::Symbol(symbols.intern("foo")));
    }

    #[test]
    fn test_comments_when_enabled() {
        let config = ReaderConfig {
            handle_comments: true,
            ..ReaderConfig::default()
        };
        let cases = [
            ("1 ; one\n2", "(begin 1 2)"),
            ("(+ 1 ; inline\n 2)", "(begin (+ 1 2))"),
            ("; only a comment", "(begin)"),
            ("x;y", "(begin x)"),
            ("3 ;trailing", "(begin 3)"),
        ];
        for (input, expected) in cases {
            let program = read(input, &mut SymbolTable::new(), &config).unwrap();
            assert_eq!(program.to_string(), expected, "'{input}'");
        }
    }

    #[test]
    fn test_nesting_limit() {
        let config = ReaderConfig {
            max_depth: 3,
            ..ReaderConfig::default()
        };
        assert!(read("(((1)))", &mut SymbolTable::new(), &config).is_ok());
        match read("((((1))))", &mut SymbolTable::new(), &config) {
            Err(Error::SyntaxError(err)) => {
                assert_eq!(err.kind, ParseErrorKind::TooDeeplyNested);
                assert!(err.message.contains("max depth: 3"), "{err}");
            }
            other => panic!("expected nesting error, got {other:?}"),
        }

        let deep = format!("{}1{}", "(".repeat(300), ")".repeat(300));
        let err = read_default(&deep).unwrap_err();
        assert!(matches!(
            err,
            Error::SyntaxError(ParseError {
                kind: ParseErrorKind::TooDeeplyNested,
                ..
            })
        ));
    }

    #[test]
    fn test_error_context_points_into_source() {
        let err = read_default("(define x 1))").unwrap_err();
        let Error::SyntaxError(err) = err else {
            panic!("expected syntax error, got {err:?}");
        };
        assert_eq!(err.kind, ParseErrorKind::TrailingContent);
        assert_eq!(err.found.as_deref(), Some(")"));
        let context = err.context.unwrap();
        assert!(context.starts_with("(define x 1))"), "{context}");
        assert!(!context.contains("begin"), "{context}");
    }

    #[test]
    fn test_tokenizer_offsets() {
        let wrapped = format!("{PROGRAM_PREFIX}(a  bc){PROGRAM_SUFFIX}");
        let tokens = tokenize("(a  bc)", &wrapped, false).unwrap();
        let texts: Vec<(&str, usize)> = tokens.iter().map(|t| (t.text(), t.offset)).collect();
        assert_eq!(
            texts,
            vec![
                ("(", 0),
                ("begin", 1),
                ("(", 7),
                ("a", 8),
                ("bc", 11),
                (")", 13),
                (")", 15),
            ]
        );
    }
}
