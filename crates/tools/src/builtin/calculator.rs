//! Arithmetic expression evaluator.
//!
//! Pure: no side effects, so dry-run equals execute. Supports `+ - * /`,
//! unary minus, parentheses, and decimal literals.

use serde_json::Value;

use nexus_domain::approval::RiskLevel;
use nexus_domain::error::{Error, Result};

use crate::{ExecutableTool, ExecutionContext, ToolResult};

pub struct CalculatorTool;

#[async_trait::async_trait]
impl ExecutableTool for CalculatorTool {
    fn id(&self) -> &str {
        "calculator"
    }
    fn name(&self) -> &str {
        "calculator"
    }
    fn description(&self) -> &str {
        "Evaluate an arithmetic expression (+, -, *, /, parentheses)."
    }
    fn category(&self) -> &str {
        "utility"
    }
    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "required": ["expression"],
            "properties": {
                "expression": {
                    "type": "string",
                    "description": "The arithmetic expression to evaluate, e.g. \"2+2\""
                }
            }
        })
    }
    fn risk_level(&self) -> RiskLevel {
        RiskLevel::Low
    }
    fn side_effects(&self) -> bool {
        false
    }

    async fn execute(&self, input: Value, _ctx: &ExecutionContext) -> Result<ToolResult> {
        let expression = input["expression"]
            .as_str()
            .ok_or_else(|| Error::Validation("expression must be a string".into()))?;
        let value = evaluate(expression)?;
        // Integers render without a trailing ".0" so "2+2" yields "4".
        let rendered = if value.fract() == 0.0 && value.abs() < 1e15 {
            format!("{}", value as i64)
        } else {
            format!("{value}")
        };
        Ok(ToolResult::ok(Value::String(rendered), 0))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Recursive-descent parser
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct Parser<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
}

fn evaluate(expression: &str) -> Result<f64> {
    let mut parser = Parser {
        chars: expression.chars().peekable(),
    };
    let value = parser.expr()?;
    parser.skip_ws();
    if parser.chars.peek().is_some() {
        return Err(Error::Validation(format!(
            "unexpected trailing input in expression '{expression}'"
        )));
    }
    if !value.is_finite() {
        return Err(Error::Validation("expression result is not finite".into()));
    }
    Ok(value)
}

impl<'a> Parser<'a> {
    fn skip_ws(&mut self) {
        while matches!(self.chars.peek(), Some(c) if c.is_whitespace()) {
            self.chars.next();
        }
    }

    // expr := term (('+' | '-') term)*
    fn expr(&mut self) -> Result<f64> {
        let mut value = self.term()?;
        loop {
            self.skip_ws();
            match self.chars.peek() {
                Some('+') => {
                    self.chars.next();
                    value += self.term()?;
                }
                Some('-') => {
                    self.chars.next();
                    value -= self.term()?;
                }
                _ => return Ok(value),
            }
        }
    }

    // term := factor (('*' | '/') factor)*
    fn term(&mut self) -> Result<f64> {
        let mut value = self.factor()?;
        loop {
            self.skip_ws();
            match self.chars.peek() {
                Some('*') => {
                    self.chars.next();
                    value *= self.factor()?;
                }
                Some('/') => {
                    self.chars.next();
                    let divisor = self.factor()?;
                    if divisor == 0.0 {
                        return Err(Error::Validation("division by zero".into()));
                    }
                    value /= divisor;
                }
                _ => return Ok(value),
            }
        }
    }

    // factor := '-' factor | '(' expr ')' | number
    fn factor(&mut self) -> Result<f64> {
        self.skip_ws();
        match self.chars.peek() {
            Some('-') => {
                self.chars.next();
                Ok(-self.factor()?)
            }
            Some('(') => {
                self.chars.next();
                let value = self.expr()?;
                self.skip_ws();
                if self.chars.next() != Some(')') {
                    return Err(Error::Validation("missing closing parenthesis".into()));
                }
                Ok(value)
            }
            Some(c) if c.is_ascii_digit() || *c == '.' => self.number(),
            other => Err(Error::Validation(format!(
                "unexpected character in expression: {other:?}"
            ))),
        }
    }

    fn number(&mut self) -> Result<f64> {
        let mut buf = String::new();
        while matches!(self.chars.peek(), Some(c) if c.is_ascii_digit() || *c == '.') {
            buf.push(self.chars.next().unwrap());
        }
        buf.parse::<f64>()
            .map_err(|_| Error::Validation(format!("invalid number '{buf}'")))
    }
}
