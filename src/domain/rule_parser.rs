//! Rule DSL parser.
//!
//! A tokenizer splits the input on whitespace and operator symbols, then a
//! recursive descent parser builds the AST. Precedence, loosest first:
//!
//! ```text
//! rule       := or_expr EOF
//! or_expr    := and_expr (OR and_expr)*
//! and_expr   := unary (AND unary)*
//! unary      := NOT unary | primary
//! primary    := '(' or_expr ')' | comparison
//! comparison := FIELD OP literal
//! literal    := NUMBER | 'SIGNAL' | "SIGNAL"
//! ```
//!
//! Keywords are case-insensitive; `&&` and `||` are accepted for AND and OR.
//! Chains associate to the left. Errors carry the offending token and its
//! byte offset. Nesting depth and the number of comparisons are bounded by
//! [`MAX_NESTING`] and [`MAX_COMPARISONS`].

use crate::domain::error::RuleSyntaxError;
use crate::domain::indicator::Signal;
use crate::domain::rule::{CompareOp, Literal, Rule};

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    Field(String),
    Number(f64),
    Quoted(String),
    Op(CompareOp),
    And,
    Or,
    Not,
    LParen,
    RParen,
    End,
}

#[derive(Debug, Clone, PartialEq)]
struct Token {
    kind: TokenKind,
    text: String,
    position: usize,
}

fn error(message: impl Into<String>, token: &str, position: usize) -> RuleSyntaxError {
    RuleSyntaxError {
        message: message.into(),
        token: token.to_string(),
        position,
    }
}

struct Tokenizer<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Tokenizer<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn remaining(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.remaining().chars().next()
    }

    fn peek_second(&self) -> Option<char> {
        self.remaining().chars().nth(1)
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.peek() {
            if ch.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> &'a str {
        let start = self.pos;
        while let Some(ch) = self.peek() {
            if pred(ch) {
                self.advance();
            } else {
                break;
            }
        }
        &self.input[start..self.pos]
    }

    fn tokenize(mut self) -> Result<Vec<Token>, RuleSyntaxError> {
        let mut tokens = Vec::new();
        loop {
            self.skip_whitespace();
            let start = self.pos;
            let Some(ch) = self.peek() else {
                tokens.push(Token {
                    kind: TokenKind::End,
                    text: "end of input".to_string(),
                    position: start,
                });
                return Ok(tokens);
            };

            let kind = match ch {
                '(' => {
                    self.advance();
                    TokenKind::LParen
                }
                ')' => {
                    self.advance();
                    TokenKind::RParen
                }
                '\'' | '"' => self.quoted(ch)?,
                '<' | '>' | '=' | '!' => self.operator()?,
                '&' | '|' => self.symbolic_keyword(ch)?,
                c if c.is_ascii_digit() || c == '.' => self.number()?,
                '-' | '+'
                    if self
                        .peek_second()
                        .is_some_and(|c| c.is_ascii_digit() || c == '.') =>
                {
                    self.number()?
                }
                c if c.is_alphabetic() || c == '_' => self.word()?,
                other => {
                    return Err(error(
                        format!("unexpected character '{other}'"),
                        &other.to_string(),
                        start,
                    ));
                }
            };

            tokens.push(Token {
                kind,
                text: self.input[start..self.pos].to_string(),
                position: start,
            });
        }
    }

    fn quoted(&mut self, quote: char) -> Result<TokenKind, RuleSyntaxError> {
        let start = self.pos;
        self.advance();
        let body = self.take_while(|c| c != quote);
        if self.advance() != Some(quote) {
            return Err(error(
                "unterminated quoted literal",
                &self.input[start..],
                start,
            ));
        }
        Ok(TokenKind::Quoted(body.to_string()))
    }

    fn operator(&mut self) -> Result<TokenKind, RuleSyntaxError> {
        let start = self.pos;
        let symbol = self.take_while(|c| matches!(c, '<' | '>' | '=' | '!'));
        CompareOp::from_symbol(symbol)
            .map(TokenKind::Op)
            .ok_or_else(|| error(format!("unknown operator '{symbol}'"), symbol, start))
    }

    fn symbolic_keyword(&mut self, ch: char) -> Result<TokenKind, RuleSyntaxError> {
        let start = self.pos;
        let symbol = self.take_while(|c| c == '&' || c == '|');
        match symbol {
            "&&" => Ok(TokenKind::And),
            "||" => Ok(TokenKind::Or),
            _ => {
                let hint = if ch == '&' { "&&" } else { "||" };
                Err(error(
                    format!("unknown operator '{symbol}', did you mean '{hint}'?"),
                    symbol,
                    start,
                ))
            }
        }
    }

    fn number(&mut self) -> Result<TokenKind, RuleSyntaxError> {
        let start = self.pos;
        if matches!(self.peek(), Some('-' | '+')) {
            self.advance();
        }
        self.take_while(|c| c.is_ascii_digit() || c == '.');
        if matches!(self.peek(), Some('e' | 'E')) {
            self.advance();
            if matches!(self.peek(), Some('-' | '+')) {
                self.advance();
            }
            self.take_while(|c| c.is_ascii_digit());
        }
        // trailing letters belong to the same bad token, e.g. `30abc`
        self.take_while(|c| c.is_alphanumeric() || c == '_');

        let text = &self.input[start..self.pos];
        match text.parse::<f64>() {
            Ok(n) if n.is_finite() => Ok(TokenKind::Number(n)),
            _ => Err(error(format!("invalid number '{text}'"), text, start)),
        }
    }

    fn word(&mut self) -> Result<TokenKind, RuleSyntaxError> {
        let start = self.pos;
        let ident = |c: char| c.is_alphanumeric() || c == '_';
        self.take_while(ident);

        if self.peek() == Some('.') {
            self.advance();
            let sub = self.take_while(ident);
            let text = &self.input[start..self.pos];
            if sub.is_empty() {
                return Err(error(
                    format!("expected attribute name after '.' in '{text}'"),
                    text,
                    start,
                ));
            }
            return Ok(TokenKind::Field(text.to_string()));
        }

        let text = &self.input[start..self.pos];
        Ok(match text.to_ascii_uppercase().as_str() {
            "AND" => TokenKind::And,
            "OR" => TokenKind::Or,
            "NOT" => TokenKind::Not,
            _ => TokenKind::Field(text.to_string()),
        })
    }
}

/// Deepest nesting of parentheses and NOT accepted in one rule.
pub const MAX_NESTING: usize = 256;

/// Most comparisons accepted in one rule.
pub const MAX_COMPARISONS: usize = 1024;

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
    comparisons: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            depth: 0,
            comparisons: 0,
        }
    }

    /// Step into a NOT or parenthesised group opened by `token`.
    fn enter(&mut self, token: &Token) -> Result<(), RuleSyntaxError> {
        if self.depth >= MAX_NESTING {
            return Err(error(
                format!("nesting deeper than {MAX_NESTING} levels"),
                &token.text,
                token.position,
            ));
        }
        self.depth += 1;
        Ok(())
    }

    fn peek(&self) -> &Token {
        // the tokenizer always terminates the stream with End
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn unexpected(&self, expected: &str) -> RuleSyntaxError {
        let token = self.peek();
        error(
            format!("expected {expected}, found '{}'", token.text),
            &token.text,
            token.position,
        )
    }

    fn parse(&mut self) -> Result<Rule, RuleSyntaxError> {
        if self.peek().kind == TokenKind::End {
            return Err(error("empty rule", &self.peek().text, self.peek().position));
        }
        let rule = self.parse_or()?;
        match self.peek().kind {
            TokenKind::End => Ok(rule),
            TokenKind::RParen => Err(error(
                "unmatched ')'",
                &self.peek().text,
                self.peek().position,
            )),
            _ => Err(self.unexpected("AND, OR or end of rule")),
        }
    }

    fn parse_or(&mut self) -> Result<Rule, RuleSyntaxError> {
        let mut rule = self.parse_and()?;
        while self.peek().kind == TokenKind::Or {
            self.advance();
            let right = self.parse_and()?;
            rule = Rule::or(rule, right);
        }
        Ok(rule)
    }

    fn parse_and(&mut self) -> Result<Rule, RuleSyntaxError> {
        let mut rule = self.parse_unary()?;
        while self.peek().kind == TokenKind::And {
            self.advance();
            let right = self.parse_unary()?;
            rule = Rule::and(rule, right);
        }
        Ok(rule)
    }

    fn parse_unary(&mut self) -> Result<Rule, RuleSyntaxError> {
        if self.peek().kind == TokenKind::Not {
            let not = self.advance();
            self.enter(&not)?;
            let inner = self.parse_unary()?;
            self.depth -= 1;
            return Ok(Rule::negate(inner));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Rule, RuleSyntaxError> {
        match self.peek().kind.clone() {
            TokenKind::LParen => {
                let open = self.advance();
                self.enter(&open)?;
                let rule = self.parse_or()?;
                match self.peek().kind.clone() {
                    TokenKind::RParen => {
                        self.advance();
                        self.depth -= 1;
                        Ok(rule)
                    }
                    TokenKind::End => Err(error("unmatched '('", &open.text, open.position)),
                    _ => Err(self.unexpected("')'")),
                }
            }
            TokenKind::Field(_) => self.parse_comparison(),
            _ => Err(self.unexpected("a field name or '('")),
        }
    }

    fn parse_comparison(&mut self) -> Result<Rule, RuleSyntaxError> {
        let start = self.advance();
        let field = match start.kind {
            TokenKind::Field(name) => name,
            _ => return Err(self.unexpected("a field name")),
        };
        self.comparisons += 1;
        if self.comparisons > MAX_COMPARISONS {
            return Err(error(
                format!("more than {MAX_COMPARISONS} comparisons in one rule"),
                &start.text,
                start.position,
            ));
        }

        let op = match self.peek().kind.clone() {
            TokenKind::Op(op) => {
                self.advance();
                op
            }
            TokenKind::End => {
                return Err(error(
                    format!("missing operator after '{field}'"),
                    &self.peek().text,
                    self.peek().position,
                ));
            }
            _ => return Err(self.unexpected("a comparison operator")),
        };

        let literal = self.parse_literal()?;
        Ok(Rule::Comparison { field, op, literal })
    }

    fn parse_literal(&mut self) -> Result<Literal, RuleSyntaxError> {
        let token = self.peek().clone();
        match &token.kind {
            TokenKind::Number(n) => {
                self.advance();
                Ok(Literal::Number(*n))
            }
            TokenKind::Quoted(name) => {
                self.advance();
                Signal::from_name(name).map(Literal::Signal).ok_or_else(|| {
                    error(
                        format!("unknown signal '{name}'"),
                        &token.text,
                        token.position,
                    )
                })
            }
            TokenKind::End => Err(error(
                "missing operand after operator",
                &token.text,
                token.position,
            )),
            _ => Err(self.unexpected("a number or quoted signal name")),
        }
    }
}

/// Parse one rule string into its AST.
pub fn parse(input: &str) -> Result<Rule, RuleSyntaxError> {
    let tokens = Tokenizer::new(input).tokenize()?;
    Parser::new(tokens).parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn num(field: &str, op: CompareOp, n: f64) -> Rule {
        Rule::compare(field, op, Literal::Number(n))
    }

    #[test]
    fn parse_simple_comparison() {
        assert_eq!(parse("rsi < 30").unwrap(), num("rsi", CompareOp::Lt, 30.0));
    }

    #[test]
    fn parse_all_operators() {
        for op in CompareOp::ALL {
            let rule = parse(&format!("rsi {} 50", op.symbol())).unwrap();
            assert_eq!(rule, num("rsi", op, 50.0));
        }
    }

    #[test]
    fn parse_without_spaces() {
        assert_eq!(
            parse("rsi<=30&&macd_histogram>0").unwrap(),
            Rule::and(
                num("rsi", CompareOp::Le, 30.0),
                num("macd_histogram", CompareOp::Gt, 0.0)
            )
        );
    }

    #[test]
    fn parse_and() {
        let rule = parse("rsi < 30 AND macd_histogram > 0").unwrap();
        assert_eq!(
            rule,
            Rule::and(
                num("rsi", CompareOp::Lt, 30.0),
                num("macd_histogram", CompareOp::Gt, 0.0)
            )
        );
    }

    #[test]
    fn and_binds_tighter_than_or() {
        let rule = parse("a < 1 OR b < 2 AND c < 3").unwrap();
        assert_eq!(
            rule,
            Rule::or(
                num("a", CompareOp::Lt, 1.0),
                Rule::and(num("b", CompareOp::Lt, 2.0), num("c", CompareOp::Lt, 3.0))
            )
        );
    }

    #[test]
    fn parentheses_override_precedence() {
        let rule = parse("(a < 1 OR b < 2) AND c < 3").unwrap();
        assert_eq!(
            rule,
            Rule::and(
                Rule::or(num("a", CompareOp::Lt, 1.0), num("b", CompareOp::Lt, 2.0)),
                num("c", CompareOp::Lt, 3.0)
            )
        );
    }

    #[test]
    fn chains_associate_left() {
        let rule = parse("a < 1 AND b < 2 AND c < 3").unwrap();
        assert_eq!(
            rule,
            Rule::and(
                Rule::and(num("a", CompareOp::Lt, 1.0), num("b", CompareOp::Lt, 2.0)),
                num("c", CompareOp::Lt, 3.0)
            )
        );
    }

    #[test]
    fn parse_deeply_nested() {
        let rule = parse("((((rsi < 30))))").unwrap();
        assert_eq!(rule, num("rsi", CompareOp::Lt, 30.0));
    }

    #[test]
    fn parse_not() {
        assert_eq!(
            parse("NOT rsi > 70 AND ema == 'BULLISH'").unwrap(),
            Rule::and(
                Rule::negate(num("rsi", CompareOp::Gt, 70.0)),
                Rule::compare("ema", CompareOp::Eq, Literal::Signal(Signal::Bullish))
            )
        );
        assert_eq!(
            parse("not (a < 1 or b < 2)").unwrap(),
            Rule::negate(Rule::or(
                num("a", CompareOp::Lt, 1.0),
                num("b", CompareOp::Lt, 2.0)
            ))
        );
    }

    #[test]
    fn keywords_are_case_insensitive() {
        assert_eq!(
            parse("a < 1 and b < 2").unwrap(),
            parse("a < 1 AND b < 2").unwrap()
        );
        assert_eq!(
            parse("a < 1 Or b < 2").unwrap(),
            parse("a < 1 || b < 2").unwrap()
        );
    }

    #[test]
    fn parse_signal_literals() {
        let expected = Rule::compare(
            "bollinger_bands",
            CompareOp::Eq,
            Literal::Signal(Signal::Oversold),
        );
        assert_eq!(parse("bollinger_bands == 'OVERSOLD'").unwrap(), expected);
        assert_eq!(parse("bollinger_bands == \"oversold\"").unwrap(), expected);
        assert_eq!(
            parse("macd.signal != 'NEUTRAL'").unwrap(),
            Rule::compare("macd.signal", CompareOp::Ne, Literal::Signal(Signal::Neutral))
        );
    }

    #[test]
    fn parse_numbers() {
        assert_eq!(parse("x > -1.5").unwrap(), num("x", CompareOp::Gt, -1.5));
        assert_eq!(parse("x > +2").unwrap(), num("x", CompareOp::Gt, 2.0));
        assert_eq!(parse("x > .25").unwrap(), num("x", CompareOp::Gt, 0.25));
        assert_eq!(parse("x > 1e-3").unwrap(), num("x", CompareOp::Gt, 0.001));
        assert_eq!(parse("x>-3").unwrap(), num("x", CompareOp::Gt, -3.0));
    }

    #[test]
    fn parse_dotted_field() {
        assert_eq!(
            parse("macd.histogram > 0").unwrap(),
            num("macd.histogram", CompareOp::Gt, 0.0)
        );
    }

    #[test]
    fn display_parses_back_to_same_tree() {
        for input in [
            "rsi < 30 AND macd_histogram > 0",
            "a < 1 OR b < 2 AND NOT c >= -3.5",
            "(a < 1 OR b < 2) AND bb == 'OVERBOUGHT'",
        ] {
            let rule = parse(input).unwrap();
            assert_eq!(parse(&rule.to_string()).unwrap(), rule);
        }
    }

    #[test]
    fn error_unknown_operator() {
        let err = parse("rsi => 30").unwrap_err();
        assert!(err.message.contains("unknown operator"));
        assert_eq!(err.token, "=>");
        assert_eq!(err.position, 4);

        let err = parse("rsi = 30").unwrap_err();
        assert_eq!(err.token, "=");
        let err = parse("rsi < 30 & ema > 1").unwrap_err();
        assert_eq!(err.token, "&");
    }

    #[test]
    fn error_unmatched_open_paren() {
        let err = parse("(rsi < 30 AND ema > 1").unwrap_err();
        assert!(err.message.contains("unmatched '('"));
        assert_eq!(err.position, 0);
    }

    #[test]
    fn error_unmatched_close_paren() {
        let err = parse("rsi < 30)").unwrap_err();
        assert!(err.message.contains("unmatched ')'"));
        assert_eq!(err.token, ")");
        assert_eq!(err.position, 8);
    }

    #[test]
    fn error_missing_operand() {
        let err = parse("rsi <").unwrap_err();
        assert!(err.message.contains("missing operand"));
        assert_eq!(err.position, 5);

        let err = parse("rsi < 30 AND").unwrap_err();
        assert_eq!(err.token, "end of input");
        assert_eq!(err.position, 12);
    }

    #[test]
    fn error_missing_operator() {
        let err = parse("rsi").unwrap_err();
        assert!(err.message.contains("missing operator"));

        let err = parse("rsi 30").unwrap_err();
        assert!(err.message.contains("comparison operator"));
        assert_eq!(err.token, "30");
    }

    #[test]
    fn error_field_as_literal() {
        let err = parse("rsi < oversold").unwrap_err();
        assert!(err.message.contains("number or quoted signal"));
        assert_eq!(err.token, "oversold");

        assert!(parse("rsi == true").is_err());
    }

    #[test]
    fn error_unknown_signal() {
        let err = parse("rsi == 'SIDEWAYS'").unwrap_err();
        assert!(err.message.contains("unknown signal"));
        assert_eq!(err.position, 7);
    }

    #[test]
    fn error_unterminated_quote() {
        let err = parse("rsi == 'OVERSOLD").unwrap_err();
        assert!(err.message.contains("unterminated"));
    }

    #[test]
    fn error_trailing_input() {
        let err = parse("rsi < 30 ema > 1").unwrap_err();
        assert_eq!(err.token, "ema");
        assert_eq!(err.position, 9);
    }

    #[test]
    fn error_invalid_number() {
        let err = parse("rsi < 30abc").unwrap_err();
        assert!(err.message.contains("invalid number"));
        assert_eq!(err.token, "30abc");
    }

    #[test]
    fn error_unexpected_character() {
        let err = parse("rsi < 30 # comment").unwrap_err();
        assert_eq!(err.token, "#");
        assert_eq!(err.position, 9);
    }

    #[test]
    fn error_empty_input() {
        assert!(parse("").unwrap_err().message.contains("empty rule"));
        assert!(parse("   ").unwrap_err().message.contains("empty rule"));
    }

    #[test]
    fn error_display_with_context() {
        let input = "rsi < 30 AND AND ema > 1";
        let err = parse(input).unwrap_err();
        let ctx = err.display_with_context(input);
        assert!(ctx.contains("^"));
        assert!(ctx.contains("position 13"));
    }

    #[test]
    fn deep_parentheses_are_a_syntax_error() {
        let input = format!("{}rsi < 1", "(".repeat(200_000));
        let err = parse(&input).unwrap_err();
        assert!(err.message.contains("nesting"), "{}", err.message);
        assert_eq!(err.token, "(");
        assert_eq!(err.position, MAX_NESTING);
    }

    #[test]
    fn deep_not_chain_is_a_syntax_error() {
        let input = format!("{}rsi < 1", "NOT ".repeat(MAX_NESTING + 1));
        let err = parse(&input).unwrap_err();
        assert_eq!(err.token, "NOT");
        assert_eq!(err.position, MAX_NESTING * 4);
    }

    #[test]
    fn nesting_up_to_the_limit_parses() {
        let input = format!(
            "{}rsi < 1{}",
            "(".repeat(MAX_NESTING),
            ")".repeat(MAX_NESTING)
        );
        assert_eq!(parse(&input).unwrap(), num("rsi", CompareOp::Lt, 1.0));
    }

    #[test]
    fn too_many_comparisons_is_a_syntax_error() {
        let input = vec!["rsi < 1"; MAX_COMPARISONS + 1].join(" OR ");
        let err = parse(&input).unwrap_err();
        assert!(err.message.contains("comparisons"), "{}", err.message);
        assert_eq!(err.token, "rsi");

        let input = vec!["rsi < 1"; MAX_COMPARISONS].join(" OR ");
        assert!(parse(&input).is_ok());
    }
}
