//! Parser for template strings.
//!
//! A template string is literal text interleaved with `${ <expression> }`
//! blocks. Parsing happens in two steps: the scanner produces a flat list of
//! parts (text literals, format strings and `if`/`else`/`endif` markers), then
//! [`fold_conditionals`] nests the markers into [`Expression::IfBlock`] nodes.

use crate::core::{GardenError, Result};

use super::ast::{BinaryOp, Expression, Location, LogicalOp, UnaryOp};
use super::value::TemplateValue;

/// Parse a raw template string into an expression tree.
///
/// A template made of exactly one `${...}` block (or one conditional block)
/// yields that node directly so its raw value survives evaluation. Anything
/// else becomes a [`Expression::StringConcat`].
pub fn parse(input: &str) -> Result<Expression> {
    let mut parser = Parser::new(input);
    let parts = parser.parse_parts()?;
    let mut folded = fold_conditionals(parts, input)?;

    if folded.len() == 1
        && matches!(folded[0], Expression::FormatString { .. } | Expression::IfBlock { .. })
    {
        return Ok(folded.remove(0));
    }

    Ok(concat(folded, parser.full_location()))
}

#[derive(Debug, Clone, Copy)]
struct Mark {
    pos: usize,
    line: usize,
    column: usize,
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
    /// Current line number (1-indexed)
    line: usize,
    /// Byte offset where the current line starts
    line_start_pos: usize,
}

impl<'a> Parser<'a> {
    const fn new(input: &'a str) -> Self {
        Parser {
            input,
            pos: 0,
            line: 1,
            line_start_pos: 0,
        }
    }

    const fn mark(&self) -> Mark {
        Mark {
            pos: self.pos,
            line: self.line,
            column: self.pos - self.line_start_pos + 1,
        }
    }

    const fn location_from(&self, mark: Mark) -> Location {
        Location {
            start: mark.pos,
            end: self.pos,
            line: mark.line,
            column: mark.column,
        }
    }

    const fn full_location(&self) -> Location {
        Location {
            start: 0,
            end: self.input.len(),
            line: 1,
            column: 1,
        }
    }

    fn error(&self, message: impl Into<String>) -> GardenError {
        let mark = self.mark();
        let end = self.current_char().map_or(self.pos, |c| self.pos + c.len_utf8());
        GardenError::template(
            message,
            Location {
                start: mark.pos,
                end,
                line: mark.line,
                column: mark.column,
            },
            self.input,
        )
    }

    fn eof(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn current_char(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn peek(&self, s: &str) -> bool {
        self.input[self.pos..].starts_with(s)
    }

    /// Advance past one character, keeping line tracking current.
    fn advance_char(&mut self) -> Option<char> {
        let c = self.current_char()?;
        if c == '\n' {
            self.line += 1;
            self.line_start_pos = self.pos + 1;
        }
        self.pos += c.len_utf8();
        Some(c)
    }

    /// Consume `s` if the remaining input starts with it. `s` must not contain newlines.
    fn consume(&mut self, s: &str) -> bool {
        if self.peek(s) {
            self.pos += s.len();
            true
        } else {
            false
        }
    }

    /// Consume a word-like keyword, only when it is not the prefix of a longer identifier.
    fn consume_keyword(&mut self, keyword: &str) -> bool {
        if !self.peek(keyword) {
            return false;
        }
        let next = self.input[self.pos + keyword.len()..].chars().next();
        if next.is_some_and(is_identifier_char) {
            return false;
        }
        self.pos += keyword.len();
        true
    }

    fn skip_whitespace(&mut self) {
        while self.current_char().is_some_and(char::is_whitespace) {
            self.advance_char();
        }
    }

    fn expect(&mut self, s: &str) -> Result<()> {
        self.skip_whitespace();
        if self.consume(s) {
            return Ok(());
        }
        if self.eof() {
            return Err(self.error(format!("Expected '{s}' but reached the end of the template string.")));
        }
        let found: String = self.input[self.pos..].chars().take(10).collect();
        Err(self.error(format!("Expected '{s}', found '{found}'.")))
    }

    /// Scan literal text and `${...}` blocks into a flat list of parts.
    fn parse_parts(&mut self) -> Result<Vec<Expression>> {
        let mut parts = Vec::new();
        let mut text = String::new();
        let mut text_start = self.mark();

        while !self.eof() {
            if self.peek("$${") {
                text.push_str("${");
                self.pos += 3;
                continue;
            }
            if self.peek("${") {
                if !text.is_empty() {
                    parts.push(Expression::Literal {
                        value: TemplateValue::String(std::mem::take(&mut text)),
                        loc: self.location_from(text_start),
                    });
                }
                parts.push(self.parse_block()?);
                text_start = self.mark();
                continue;
            }
            if let Some(c) = self.advance_char() {
                text.push(c);
            }
        }

        if !text.is_empty() {
            parts.push(Expression::Literal {
                value: TemplateValue::String(text),
                loc: self.location_from(text_start),
            });
        }
        Ok(parts)
    }

    fn parse_block(&mut self) -> Result<Expression> {
        let start = self.mark();
        self.pos += 2;
        self.skip_whitespace();

        if self.consume_keyword("if") {
            let condition = self.parse_expression()?;
            self.expect("}")?;
            return Ok(Expression::IfBlock {
                condition: Box::new(condition),
                if_true: None,
                if_false: None,
                loc: self.location_from(start),
            });
        }
        if self.consume_keyword("else") {
            self.expect("}")?;
            return Ok(Expression::ElseBlock {
                loc: self.location_from(start),
            });
        }
        if self.consume_keyword("endif") {
            self.expect("}")?;
            return Ok(Expression::EndIfBlock {
                loc: self.location_from(start),
            });
        }

        let inner = self.parse_expression()?;
        self.expect("}")?;
        let optional = self.consume("?");
        Ok(Expression::FormatString {
            inner: Box::new(inner),
            optional,
            loc: self.location_from(start),
        })
    }

    fn parse_expression(&mut self) -> Result<Expression> {
        self.parse_ternary()
    }

    fn parse_ternary(&mut self) -> Result<Expression> {
        let condition = self.parse_or()?;
        self.skip_whitespace();
        if !self.consume("?") {
            return Ok(condition);
        }
        let if_true = self.parse_expression()?;
        self.expect(":")?;
        let if_false = self.parse_expression()?;
        let loc = condition.location().to(if_false.location());
        Ok(Expression::Ternary {
            condition: Box::new(condition),
            if_true: Box::new(if_true),
            if_false: Box::new(if_false),
            loc,
        })
    }

    fn parse_or(&mut self) -> Result<Expression> {
        let mut left = self.parse_and()?;
        loop {
            self.skip_whitespace();
            if !self.consume("||") {
                return Ok(left);
            }
            let right = self.parse_and()?;
            left = logical(LogicalOp::Or, left, right);
        }
    }

    fn parse_and(&mut self) -> Result<Expression> {
        let mut left = self.parse_equality()?;
        loop {
            self.skip_whitespace();
            if !self.consume("&&") {
                return Ok(left);
            }
            let right = self.parse_equality()?;
            left = logical(LogicalOp::And, left, right);
        }
    }

    fn parse_equality(&mut self) -> Result<Expression> {
        self.parse_binary_level(&[("==", BinaryOp::Equal), ("!=", BinaryOp::NotEqual)], Self::parse_relational)
    }

    fn parse_relational(&mut self) -> Result<Expression> {
        self.parse_binary_level(
            &[
                ("<=", BinaryOp::LessThanOrEqual),
                (">=", BinaryOp::GreaterThanOrEqual),
                ("<", BinaryOp::LessThan),
                (">", BinaryOp::GreaterThan),
                ("contains", BinaryOp::Contains),
            ],
            Self::parse_additive,
        )
    }

    fn parse_additive(&mut self) -> Result<Expression> {
        self.parse_binary_level(&[("+", BinaryOp::Add), ("-", BinaryOp::Subtract)], Self::parse_multiplicative)
    }

    fn parse_multiplicative(&mut self) -> Result<Expression> {
        self.parse_binary_level(
            &[("*", BinaryOp::Multiply), ("/", BinaryOp::Divide), ("%", BinaryOp::Modulo)],
            Self::parse_unary,
        )
    }

    /// Parse a left-associative chain of the given operators.
    fn parse_binary_level(
        &mut self,
        operators: &[(&str, BinaryOp)],
        next: fn(&mut Self) -> Result<Expression>,
    ) -> Result<Expression> {
        let mut left = next(self)?;
        'chain: loop {
            self.skip_whitespace();
            for (symbol, op) in operators {
                let matched = if symbol.starts_with(char::is_alphabetic) {
                    self.consume_keyword(symbol)
                } else {
                    self.consume(symbol)
                };
                if matched {
                    let right = next(self)?;
                    let loc = left.location().to(right.location());
                    left = Expression::Binary {
                        op: *op,
                        left: Box::new(left),
                        right: Box::new(right),
                        loc,
                    };
                    continue 'chain;
                }
            }
            return Ok(left);
        }
    }

    fn parse_unary(&mut self) -> Result<Expression> {
        self.skip_whitespace();
        let start = self.mark();
        let op = if self.consume("!") {
            UnaryOp::Not
        } else if self.consume_keyword("typeof") {
            UnaryOp::Typeof
        } else {
            return self.parse_primary();
        };
        let operand = self.parse_unary()?;
        Ok(Expression::Unary {
            op,
            operand: Box::new(operand),
            loc: self.location_from(start),
        })
    }

    fn parse_primary(&mut self) -> Result<Expression> {
        self.skip_whitespace();
        let start = self.mark();

        let Some(c) = self.current_char() else {
            return Err(self.error("Expected an expression but reached the end of the template string."));
        };

        match c {
            '(' => {
                self.pos += 1;
                let inner = self.parse_expression()?;
                self.expect(")")?;
                Ok(inner)
            }
            '[' => {
                self.pos += 1;
                let mut items = Vec::new();
                self.skip_whitespace();
                if !self.consume("]") {
                    loop {
                        items.push(self.parse_expression()?);
                        self.skip_whitespace();
                        if self.consume(",") {
                            continue;
                        }
                        self.expect("]")?;
                        break;
                    }
                }
                Ok(Expression::ArrayLiteral {
                    items,
                    loc: self.location_from(start),
                })
            }
            '"' | '\'' => self.parse_string_literal(c),
            '-' | '0'..='9' => self.parse_number(),
            c if c.is_ascii_alphabetic() || c == '_' => {
                for (keyword, value) in [
                    ("true", TemplateValue::Bool(true)),
                    ("false", TemplateValue::Bool(false)),
                    ("null", TemplateValue::Null),
                ] {
                    if self.consume_keyword(keyword) {
                        return Ok(Expression::Literal {
                            value,
                            loc: self.location_from(start),
                        });
                    }
                }
                self.parse_lookup_or_call()
            }
            other => Err(self.error(format!("Unexpected character '{other}' in template expression."))),
        }
    }

    fn parse_identifier(&mut self) -> Result<Expression> {
        let start = self.mark();
        while self.current_char().is_some_and(is_identifier_char) {
            self.advance_char();
        }
        if self.pos == start.pos {
            return Err(self.error("Expected an identifier."));
        }
        Ok(Expression::Identifier {
            name: self.input[start.pos..self.pos].to_string(),
            loc: self.location_from(start),
        })
    }

    fn parse_lookup_or_call(&mut self) -> Result<Expression> {
        let start = self.mark();
        let first = self.parse_identifier()?;

        if self.consume("(") {
            let Expression::Identifier {
                name,
                ..
            } = first
            else {
                return Err(GardenError::internal("Identifier parsing returned a non-identifier node"));
            };
            let mut args = Vec::new();
            self.skip_whitespace();
            if !self.consume(")") {
                loop {
                    args.push(self.parse_expression()?);
                    self.skip_whitespace();
                    if self.consume(",") {
                        continue;
                    }
                    self.expect(")")?;
                    break;
                }
            }
            return Ok(Expression::FunctionCall {
                name,
                args,
                loc: self.location_from(start),
            });
        }

        let mut path = vec![first];
        loop {
            if self.consume(".") {
                path.push(self.parse_identifier()?);
            } else if self.peek("[") {
                let member_start = self.mark();
                self.pos += 1;
                let inner = self.parse_expression()?;
                self.expect("]")?;
                path.push(Expression::Member {
                    inner: Box::new(inner),
                    loc: self.location_from(member_start),
                });
            } else {
                break;
            }
        }

        Ok(Expression::ContextLookup {
            path,
            loc: self.location_from(start),
        })
    }

    fn parse_string_literal(&mut self, quote: char) -> Result<Expression> {
        let start = self.mark();
        self.pos += 1;
        let mut value = String::new();

        loop {
            let Some(c) = self.advance_char() else {
                return Err(self.error(format!("Unterminated string literal, expected closing {quote}.")));
            };
            match c {
                c if c == quote => break,
                '\\' => {
                    let Some(escaped) = self.advance_char() else {
                        return Err(self.error("Unterminated escape sequence in string literal."));
                    };
                    value.push(match escaped {
                        'n' => '\n',
                        't' => '\t',
                        other => other,
                    });
                }
                other => value.push(other),
            }
        }

        Ok(Expression::Literal {
            value: TemplateValue::String(value),
            loc: self.location_from(start),
        })
    }

    fn parse_number(&mut self) -> Result<Expression> {
        let start = self.mark();
        self.consume("-");
        let digits_start = self.pos;
        while self.current_char().is_some_and(|c| c.is_ascii_digit()) {
            self.pos += 1;
        }
        if self.pos == digits_start {
            return Err(self.error("Expected a number after '-'."));
        }
        if self.peek(".") && self.input[self.pos + 1..].starts_with(|c: char| c.is_ascii_digit()) {
            self.pos += 1;
            while self.current_char().is_some_and(|c| c.is_ascii_digit()) {
                self.pos += 1;
            }
        }

        let raw = &self.input[start.pos..self.pos];
        let value: f64 = raw
            .parse()
            .map_err(|_| self.error(format!("Invalid number literal '{raw}'.")))?;
        Ok(Expression::Literal {
            value: TemplateValue::Number(value),
            loc: self.location_from(start),
        })
    }
}

const fn is_identifier_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

fn logical(op: LogicalOp, left: Expression, right: Expression) -> Expression {
    let loc = left.location().to(right.location());
    Expression::Logical {
        op,
        left: Box::new(left),
        right: Box::new(right),
        loc,
    }
}

fn concat(parts: Vec<Expression>, loc: Location) -> Expression {
    Expression::StringConcat {
        parts,
        loc,
    }
}

/// An `${if}` block whose `${endif}` has not been seen yet.
struct OpenConditional {
    condition: Box<Expression>,
    loc: Location,
    if_true: Vec<Expression>,
    if_false: Option<Vec<Expression>>,
}

impl OpenConditional {
    fn push(&mut self, part: Expression) {
        match &mut self.if_false {
            Some(parts) => parts.push(part),
            None => self.if_true.push(part),
        }
    }

    fn close(self, end: Location) -> Expression {
        Expression::IfBlock {
            condition: self.condition,
            if_true: branch(self.if_true),
            if_false: self.if_false.and_then(branch),
            loc: self.loc.to(end),
        }
    }
}

fn branch(mut parts: Vec<Expression>) -> Option<Box<Expression>> {
    match parts.len() {
        0 => None,
        1 => Some(Box::new(parts.remove(0))),
        _ => {
            let loc = parts[0].location().to(parts[parts.len() - 1].location());
            Some(Box::new(concat(parts, loc)))
        }
    }
}

/// Nest flat `if`/`else`/`endif` markers into [`Expression::IfBlock`] nodes.
///
/// No else or endif marker survives in the returned parts.
pub(crate) fn fold_conditionals(parts: Vec<Expression>, template: &str) -> Result<Vec<Expression>> {
    let mut root = Vec::new();
    let mut open: Vec<OpenConditional> = Vec::new();

    for part in parts {
        match part {
            Expression::IfBlock {
                condition,
                if_true: None,
                if_false: None,
                loc,
            } => open.push(OpenConditional {
                condition,
                loc,
                if_true: Vec::new(),
                if_false: None,
            }),
            Expression::ElseBlock {
                loc,
            } => {
                let Some(current) = open.last_mut() else {
                    return Err(GardenError::template(
                        "Found ${else} block without a preceding ${if ...} block.",
                        loc,
                        template,
                    ));
                };
                if current.if_false.is_some() {
                    return Err(GardenError::template(
                        "Found multiple ${else} blocks in the same ${if ...} block.",
                        loc,
                        template,
                    ));
                }
                current.if_false = Some(Vec::new());
            }
            Expression::EndIfBlock {
                loc,
            } => {
                let Some(current) = open.pop() else {
                    return Err(GardenError::template(
                        "Found ${endif} block without a preceding ${if ...} block.",
                        loc,
                        template,
                    ));
                };
                let block = current.close(loc);
                match open.last_mut() {
                    Some(parent) => parent.push(block),
                    None => root.push(block),
                }
            }
            other => match open.last_mut() {
                Some(parent) => parent.push(other),
                None => root.push(other),
            },
        }
    }

    if let Some(unclosed) = open.pop() {
        return Err(GardenError::template(
            "Missing ${endif} after ${if ...} block.",
            unclosed.loc,
            template,
        ));
    }

    Ok(root)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inner(expr: &Expression) -> &Expression {
        match expr {
            Expression::FormatString {
                inner,
                ..
            } => inner,
            other => panic!("expected a format string, got {other:?}"),
        }
    }

    #[test]
    fn test_single_block_is_not_wrapped_in_concat() {
        let expr = parse("${var.foo}").unwrap();
        assert!(matches!(expr, Expression::FormatString { optional: false, .. }));
        assert!(matches!(inner(&expr), Expression::ContextLookup { path, .. } if path.len() == 2));
    }

    #[test]
    fn test_text_and_blocks_become_concat() {
        let expr = parse("prefix-${var.foo}-suffix").unwrap();
        let Expression::StringConcat {
            parts,
            ..
        } = expr
        else {
            panic!("expected concat");
        };
        assert_eq!(parts.len(), 3);
    }

    #[test]
    fn test_optional_suffix() {
        let expr = parse("${var.foo}?").unwrap();
        assert!(matches!(expr, Expression::FormatString { optional: true, .. }));
    }

    #[test]
    fn test_escaped_block_is_literal_text() {
        let expr = parse("$${var.foo}").unwrap();
        let Expression::StringConcat {
            parts,
            ..
        } = expr
        else {
            panic!("expected concat");
        };
        assert_eq!(
            parts,
            vec![Expression::Literal {
                value: "${var.foo}".into(),
                loc: Location {
                    start: 0,
                    end: 11,
                    line: 1,
                    column: 1,
                },
            }]
        );
    }

    #[test]
    fn test_precedence() {
        let expr = parse("${1 + 2 * 3 == 7 && !false}").unwrap();
        let Expression::Logical {
            op: LogicalOp::And,
            left,
            right,
            ..
        } = inner(&expr)
        else {
            panic!("expected && at the root");
        };
        assert!(matches!(left.as_ref(), Expression::Binary { op: BinaryOp::Equal, .. }));
        assert!(matches!(right.as_ref(), Expression::Unary { op: UnaryOp::Not, .. }));
    }

    #[test]
    fn test_hyphenated_identifiers_and_members() {
        let expr = parse("${var.my-key[\"other\"][0]}").unwrap();
        let Expression::ContextLookup {
            path,
            ..
        } = inner(&expr)
        else {
            panic!("expected lookup");
        };
        assert_eq!(path.len(), 4);
        assert!(matches!(&path[1], Expression::Identifier { name, .. } if name == "my-key"));
        assert!(matches!(&path[2], Expression::Member { .. }));
    }

    #[test]
    fn test_function_call_and_ternary() {
        let expr = parse("${var.a ? upper('x') : [1, -2]}").unwrap();
        let Expression::Ternary {
            if_true,
            if_false,
            ..
        } = inner(&expr)
        else {
            panic!("expected ternary");
        };
        assert!(matches!(if_true.as_ref(), Expression::FunctionCall { name, args, .. } if name == "upper" && args.len() == 1));
        assert!(matches!(if_false.as_ref(), Expression::ArrayLiteral { items, .. } if items.len() == 2));
    }

    #[test]
    fn test_conditional_blocks_are_folded() {
        let expr = parse("${if var.a}yes${else}no${endif}").unwrap();
        let Expression::IfBlock {
            if_true,
            if_false,
            ..
        } = &expr
        else {
            panic!("expected an if block, got {expr:?}");
        };
        assert!(if_true.is_some());
        assert!(if_false.is_some());

        let mut markers = 0;
        expr.visit(&mut |node| {
            if matches!(node, Expression::ElseBlock { .. } | Expression::EndIfBlock { .. }) {
                markers += 1;
            }
        });
        assert_eq!(markers, 0);
    }

    #[test]
    fn test_nested_conditionals() {
        let expr = parse("a${if x}b${if y}c${endif}${endif}").unwrap();
        let Expression::StringConcat {
            parts,
            ..
        } = expr
        else {
            panic!("expected concat");
        };
        let Expression::IfBlock {
            if_true: Some(outer),
            ..
        } = &parts[1]
        else {
            panic!("expected outer if");
        };
        assert!(matches!(outer.as_ref(), Expression::StringConcat { parts, .. } if parts.len() == 2));
    }

    #[test]
    fn test_unbalanced_conditionals_are_errors() {
        for template in ["${else}", "${endif}", "${if a}x", "${if a}${else}${else}${endif}"] {
            let err = parse(template).unwrap_err();
            assert!(err.as_template_error().is_some(), "{template}: {err}");
        }
    }

    #[test]
    fn test_syntax_error_reports_position() {
        let err = parse("line one\n${var.foo +}").unwrap_err();
        let details = err.as_template_error().unwrap();
        assert_eq!(details.location.line, 2);
        assert_eq!(details.template, "line one\n${var.foo +}");
    }

    #[test]
    fn test_unterminated_block() {
        let err = parse("${var.foo").unwrap_err();
        assert!(err.to_string().contains("Expected '}'"), "{err}");
    }
}
