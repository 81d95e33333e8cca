// ── Wirefilter expression subset ──
//
// AST, renderer and recursive-descent parser for the slice of the
// Cloudflare rules language that unified conditions map onto:
//
//   expr    := or
//   or      := and ("or" and)*
//   and     := unary ("and" unary)*
//   unary   := "not" unary | primary
//   primary := "(" expr ")" | "true" | "any" "(" test ")" | test
//   test    := ("starts_with" | "ends_with") "(" field "," literal ")"
//            | field WORD (literal | set)
//   field   := WORD ("[" STRING "]" ("[" "*" "]")?)?
//
// `==`, `!=`, `&&`, `||`, `!` and `~` are accepted as aliases.

use std::fmt;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    True,
    Test(Test),
    Not(Box<Expr>),
    And(Vec<Expr>),
    Or(Vec<Expr>),
    /// Verbatim text outside the modeled subset. Never produced by
    /// [`parse`].
    Raw(String),
}

/// One comparison, e.g. `http.request.uri.path eq "/admin"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Test {
    pub field: FieldRef,
    /// Native operator: `eq`, `ne`, `contains`, `matches`, `in`,
    /// `starts_with`, `ends_with`, or whatever else the input used.
    pub op: String,
    pub value: Literal,
}

/// Field access. Keyed fields (`headers["x"][*]`) are always wildcarded
/// and rendered inside `any(...)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRef {
    pub name: String,
    pub key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Literal {
    /// Quoted string.
    Str(String),
    /// Bare token: numbers, IP addresses and CIDRs.
    Raw(String),
    Set(Vec<Literal>),
}

const FUNCTION_OPS: [&str; 2] = ["starts_with", "ends_with"];

// ── Rendering ────────────────────────────────────────────────────────

fn write_quoted(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    f.write_str("\"")?;
    for ch in s.chars() {
        if matches!(ch, '"' | '\\') {
            f.write_str("\\")?;
        }
        write!(f, "{ch}")?;
    }
    f.write_str("\"")
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => write_quoted(f, s),
            Self::Raw(s) => f.write_str(s),
            Self::Set(items) => {
                f.write_str("{")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("}")
            }
        }
    }
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if let Some(ref key) = self.key {
            f.write_str("[")?;
            write_quoted(f, key)?;
            f.write_str("][*]")?;
        }
        Ok(())
    }
}

impl fmt::Display for Test {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keyed = self.field.key.is_some();
        if keyed {
            f.write_str("any(")?;
        }
        if FUNCTION_OPS.contains(&self.op.as_str()) {
            write!(f, "{}({}, {})", self.op, self.field, self.value)?;
        } else {
            write!(f, "{} {} {}", self.field, self.op, self.value)?;
        }
        if keyed {
            f.write_str(")")?;
        }
        Ok(())
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn join(f: &mut fmt::Formatter<'_>, items: &[Expr], sep: &str) -> fmt::Result {
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    f.write_str(sep)?;
                }
                match item {
                    Expr::Not(_) | Expr::True => write!(f, "{item}")?,
                    _ => write!(f, "({item})")?,
                }
            }
            Ok(())
        }

        match self {
            Self::True => f.write_str("true"),
            Self::Test(t) => write!(f, "{t}"),
            Self::Not(inner) => write!(f, "not ({inner})"),
            Self::And(items) => join(f, items, " and "),
            Self::Or(items) => join(f, items, " or "),
            Self::Raw(text) => f.write_str(text),
        }
    }
}

// ── Lexer ────────────────────────────────────────────────────────────

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{message} at offset {offset}")]
pub struct ParseError {
    pub message: String,
    pub offset: usize,
}

impl ParseError {
    fn new(message: impl Into<String>, offset: usize) -> Self {
        Self {
            message: message.into(),
            offset,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Star,
    Str(String),
    Word(String),
}

fn is_word_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || matches!(ch, '_' | '.' | ':' | '/' | '-')
}

/// Whether `s` can be written unquoted and lexes back as one token.
pub fn is_bare_word(s: &str) -> bool {
    !s.is_empty() && s.chars().all(is_word_char)
}

fn tokenize(input: &str) -> Result<Vec<(usize, Token)>, ParseError> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some((at, ch)) = chars.next() {
        let token = match ch {
            c if c.is_whitespace() => continue,
            '(' => Token::LParen,
            ')' => Token::RParen,
            '{' => Token::LBrace,
            '}' => Token::RBrace,
            '[' => Token::LBracket,
            ']' => Token::RBracket,
            ',' => Token::Comma,
            '*' => Token::Star,
            '~' => Token::Word("matches".into()),
            '=' | '&' | '|' => {
                let word = match chars.next() {
                    Some((_, '=')) if ch == '=' => "eq",
                    Some((_, '&')) if ch == '&' => "and",
                    Some((_, '|')) if ch == '|' => "or",
                    _ => return Err(ParseError::new(format!("unexpected {ch:?}"), at)),
                };
                Token::Word(word.into())
            }
            '!' => {
                if chars.next_if(|&(_, c)| c == '=').is_some() {
                    Token::Word("ne".into())
                } else {
                    Token::Word("not".into())
                }
            }
            '"' => {
                let mut text = String::new();
                loop {
                    match chars.next() {
                        Some((_, '"')) => break,
                        Some((_, '\\')) => match chars.next() {
                            Some((_, escaped)) => text.push(escaped),
                            None => return Err(ParseError::new("unterminated escape", at)),
                        },
                        Some((_, c)) => text.push(c),
                        None => return Err(ParseError::new("unterminated string", at)),
                    }
                }
                Token::Str(text)
            }
            c if is_word_char(c) => {
                let mut word = String::from(c);
                while let Some((_, c)) = chars.next_if(|&(_, c)| is_word_char(c)) {
                    word.push(c);
                }
                Token::Word(word)
            }
            other => return Err(ParseError::new(format!("unexpected {other:?}"), at)),
        };
        tokens.push((at, token));
    }
    Ok(tokens)
}

// ── Parser ───────────────────────────────────────────────────────────

/// Parse an expression in the supported subset.
pub fn parse(input: &str) -> Result<Expr, ParseError> {
    let tokens = tokenize(input)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        end: input.len(),
    };
    let expr = parser.or()?;
    if parser.pos < parser.tokens.len() {
        return Err(parser.error("unexpected trailing input"));
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
    end: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, t)| t)
    }

    fn peek_at(&self, n: usize) -> Option<&Token> {
        self.tokens.get(self.pos + n).map(|(_, t)| t)
    }

    fn offset(&self) -> usize {
        self.tokens.get(self.pos).map_or(self.end, |(at, _)| *at)
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError::new(message, self.offset())
    }

    fn bump(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|(_, t)| t.clone());
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_word(&mut self, word: &str) -> bool {
        if matches!(self.peek(), Some(Token::Word(w)) if w == word) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &Token, what: &str) -> Result<(), ParseError> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(self.error(format!("expected {what}")))
        }
    }

    fn word(&mut self, what: &str) -> Result<String, ParseError> {
        match self.peek() {
            Some(Token::Word(_)) => match self.bump() {
                Some(Token::Word(w)) => Ok(w),
                _ => Err(self.error(format!("expected {what}"))),
            },
            _ => Err(self.error(format!("expected {what}"))),
        }
    }

    fn or(&mut self) -> Result<Expr, ParseError> {
        let mut items = vec![self.and()?];
        while self.eat_word("or") {
            items.push(self.and()?);
        }
        Ok(if items.len() == 1 {
            items.remove(0)
        } else {
            Expr::Or(items)
        })
    }

    fn and(&mut self) -> Result<Expr, ParseError> {
        let mut items = vec![self.unary()?];
        while self.eat_word("and") {
            items.push(self.unary()?);
        }
        Ok(if items.len() == 1 {
            items.remove(0)
        } else {
            Expr::And(items)
        })
    }

    fn unary(&mut self) -> Result<Expr, ParseError> {
        if self.eat_word("not") {
            return Ok(Expr::Not(Box::new(self.unary()?)));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Expr, ParseError> {
        if self.eat(&Token::LParen) {
            let inner = self.or()?;
            self.expect(&Token::RParen, "`)`")?;
            return Ok(inner);
        }
        if self.eat_word("true") {
            return Ok(Expr::True);
        }
        if matches!(self.peek(), Some(Token::Word(w)) if w == "any")
            && self.peek_at(1) == Some(&Token::LParen)
        {
            self.pos += 2;
            let test = self.test(true)?;
            self.expect(&Token::RParen, "`)` closing any(")?;
            return Ok(Expr::Test(test));
        }
        Ok(Expr::Test(self.test(false)?))
    }

    fn test(&mut self, in_any: bool) -> Result<Test, ParseError> {
        let is_function = matches!(self.peek(), Some(Token::Word(w)) if FUNCTION_OPS.contains(&w.as_str()))
            && self.peek_at(1) == Some(&Token::LParen);

        let (field, wildcard, op, value) = if is_function {
            let op = self.word("function")?;
            self.pos += 1;
            let (field, wildcard) = self.field()?;
            self.expect(&Token::Comma, "`,`")?;
            let value = self.literal()?;
            self.expect(&Token::RParen, "`)`")?;
            (field, wildcard, op, value)
        } else {
            let (field, wildcard) = self.field()?;
            let op = self.word("operator")?;
            let value = if op == "in" { self.set()? } else { self.literal()? };
            (field, wildcard, op, value)
        };

        if wildcard != in_any {
            return Err(self.error(if in_any {
                "any() requires a [*] field"
            } else {
                "[*] fields must be wrapped in any()"
            }));
        }
        Ok(Test { field, op, value })
    }

    fn field(&mut self) -> Result<(FieldRef, bool), ParseError> {
        let name = self.word("field")?;
        if !self.eat(&Token::LBracket) {
            return Ok((FieldRef { name, key: None }, false));
        }
        let key = match self.bump() {
            Some(Token::Str(key)) => key,
            _ => return Err(self.error("expected quoted key")),
        };
        self.expect(&Token::RBracket, "`]`")?;
        let wildcard = if self.eat(&Token::LBracket) {
            self.expect(&Token::Star, "`*`")?;
            self.expect(&Token::RBracket, "`]`")?;
            true
        } else {
            false
        };
        Ok((
            FieldRef {
                name,
                key: Some(key),
            },
            wildcard,
        ))
    }

    fn literal(&mut self) -> Result<Literal, ParseError> {
        match self.peek() {
            Some(Token::Str(_) | Token::Word(_)) => match self.bump() {
                Some(Token::Str(s)) => Ok(Literal::Str(s)),
                Some(Token::Word(w)) => Ok(Literal::Raw(w)),
                _ => Err(self.error("expected value")),
            },
            _ => Err(self.error("expected value")),
        }
    }

    fn set(&mut self) -> Result<Literal, ParseError> {
        self.expect(&Token::LBrace, "`{`")?;
        let mut items = Vec::new();
        while !self.eat(&Token::RBrace) {
            if self.peek().is_none() {
                return Err(self.error("unterminated set"));
            }
            items.push(self.literal()?);
        }
        Ok(Literal::Set(items))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn test(field: &str, op: &str, value: Literal) -> Expr {
        Expr::Test(Test {
            field: FieldRef {
                name: field.into(),
                key: None,
            },
            op: op.into(),
            value,
        })
    }

    #[test]
    fn parses_infix_and_function_forms() {
        assert_eq!(
            parse(r#"(http.request.uri.path eq "/admin") and not (starts_with(http.host, "dev."))"#)
                .unwrap(),
            Expr::And(vec![
                test("http.request.uri.path", "eq", Literal::Str("/admin".into())),
                Expr::Not(Box::new(test(
                    "http.host",
                    "starts_with",
                    Literal::Str("dev.".into())
                ))),
            ])
        );
    }

    #[test]
    fn parses_any_sets_and_aliases() {
        let expr = parse(
            r#"any(http.request.headers["x-api-key"][*] == "k") || ip.src in {10.0.0.0/8 192.168.0.1}"#,
        )
        .unwrap();
        assert_eq!(
            expr,
            Expr::Or(vec![
                Expr::Test(Test {
                    field: FieldRef {
                        name: "http.request.headers".into(),
                        key: Some("x-api-key".into()),
                    },
                    op: "eq".into(),
                    value: Literal::Str("k".into()),
                }),
                test(
                    "ip.src",
                    "in",
                    Literal::Set(vec![
                        Literal::Raw("10.0.0.0/8".into()),
                        Literal::Raw("192.168.0.1".into()),
                    ])
                ),
            ])
        );
    }

    #[test]
    fn string_escapes_round_trip() {
        let expr = test("http.user_agent", "contains", Literal::Str(r#"a "b" \c"#.into()));
        let text = expr.to_string();
        assert_eq!(text, r#"http.user_agent contains "a \"b\" \\c""#);
        assert_eq!(parse(&text).unwrap(), expr);
    }

    #[test]
    fn renders_each_operand_in_parens() {
        let expr = Expr::Or(vec![
            test("ip.src.asnum", "eq", Literal::Raw("13335".into())),
            Expr::Not(Box::new(test("http.host", "eq", Literal::Str("a".into())))),
        ]);
        assert_eq!(expr.to_string(), r#"(ip.src.asnum eq 13335) or not (http.host eq "a")"#);
        assert_eq!(parse(&expr.to_string()).unwrap(), expr);
    }

    #[test]
    fn rejects_input_outside_the_subset() {
        assert!(parse("").is_err());
        assert!(parse(r#"http.host eq "a" xor http.host eq "b""#).is_err());
        assert!(parse(r#"http.request.headers["x"][*] eq "v""#).is_err());
        assert!(parse(r#"any(http.host eq "v")"#).is_err());
        assert!(parse(r#"lower(http.host) eq "a""#).is_err());
        assert!(parse(r#"http.host eq "unterminated"#).is_err());
        assert!(parse("(http.host eq a").is_err());
    }

    #[test]
    fn error_reports_offset() {
        let err = parse(r#"http.host eq "a" )"#).unwrap_err();
        assert_eq!(err.offset, 17);
    }
}
