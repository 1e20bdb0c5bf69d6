//! Environment markers: the boolean predicates attached to requirements
//! (`; python_version >= "3.6" and sys_platform == "win32"`).
//!
//! Markers are parsed into a small sum type and evaluated against an
//! [`EnvironmentMarkers`] record plus the current extras set. The
//! pseudo-variable `extra` uses membership semantics: `extra == "foo"` is
//! true when `"foo"` is among the extras being resolved, regardless of what
//! other extras are present.

use std::fmt;
use std::str::FromStr;

use crate::error::PackagingError;
use crate::version::Version;

/// The evaluation environment. Field names match the marker variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentMarkers {
    pub os_name: String,
    pub sys_platform: String,
    pub platform_machine: String,
    pub platform_python_implementation: String,
    pub platform_release: Option<String>,
    pub platform_system: String,
    pub platform_version: Option<String>,
    /// Two-component form, e.g. `3.7`.
    pub python_version: Option<String>,
    /// Three-component form, e.g. `3.7.5`.
    pub python_full_version: Option<String>,
    pub implementation_name: String,
}

impl Default for EnvironmentMarkers {
    fn default() -> Self {
        EnvironmentMarkers {
            os_name: "posix".to_string(),
            sys_platform: "linux".to_string(),
            platform_machine: "x86_64".to_string(),
            platform_python_implementation: "CPython".to_string(),
            platform_release: None,
            platform_system: "Linux".to_string(),
            platform_version: None,
            python_version: None,
            python_full_version: None,
            implementation_name: "cpython".to_string(),
        }
    }
}

impl EnvironmentMarkers {
    /// Build an environment for the given interpreter version and platform,
    /// applying the platform fixups: `win32` implies `os_name=nt` and
    /// `platform_system=Windows`, `darwin` implies `platform_system=Darwin`,
    /// and `linux` under a 2.x interpreter becomes `linux2`. Anything else
    /// is rejected.
    pub fn new(
        python_full_version: &str,
        sys_platform: Option<&str>,
    ) -> Result<Self, PackagingError> {
        let two_component = python_full_version
            .split('.')
            .take(2)
            .collect::<Vec<_>>()
            .join(".");
        let mut env = EnvironmentMarkers {
            python_version: Some(two_component),
            python_full_version: Some(python_full_version.to_string()),
            ..EnvironmentMarkers::default()
        };
        if let Some(platform) = sys_platform {
            env.sys_platform = platform.to_string();
        }
        env.apply_platform_fixups()?;
        Ok(env)
    }

    fn apply_platform_fixups(&mut self) -> Result<(), PackagingError> {
        match self.sys_platform.as_str() {
            "linux" => {
                if self
                    .python_version
                    .as_deref()
                    .is_some_and(|v| v.starts_with('2'))
                {
                    self.sys_platform = "linux2".to_string();
                }
            }
            "linux2" => {}
            "win32" => {
                self.platform_system = "Windows".to_string();
                self.os_name = "nt".to_string();
            }
            "darwin" => {
                self.platform_system = "Darwin".to_string();
            }
            other => return Err(PackagingError::UnknownPlatform(other.to_string())),
        }
        Ok(())
    }

    /// Look up a marker variable by name. Unset optional fields evaluate as
    /// the empty string.
    fn get(&self, var: &str) -> Option<&str> {
        let value = match var {
            "os_name" => &self.os_name,
            "sys_platform" => &self.sys_platform,
            "platform_machine" => &self.platform_machine,
            "platform_python_implementation" => &self.platform_python_implementation,
            "platform_release" => return Some(self.platform_release.as_deref().unwrap_or("")),
            "platform_system" => &self.platform_system,
            "platform_version" => return Some(self.platform_version.as_deref().unwrap_or("")),
            "python_version" => return Some(self.python_version.as_deref().unwrap_or("")),
            "python_full_version" => {
                return Some(self.python_full_version.as_deref().unwrap_or(""));
            }
            "implementation_name" => &self.implementation_name,
            _ => return None,
        };
        Some(value)
    }
}

/// Comparison operator inside a marker expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerOp {
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Compatible,
    Arbitrary,
    In,
    NotIn,
}

impl MarkerOp {
    fn as_str(self) -> &'static str {
        match self {
            MarkerOp::Equal => "==",
            MarkerOp::NotEqual => "!=",
            MarkerOp::Less => "<",
            MarkerOp::LessEqual => "<=",
            MarkerOp::Greater => ">",
            MarkerOp::GreaterEqual => ">=",
            MarkerOp::Compatible => "~=",
            MarkerOp::Arbitrary => "===",
            MarkerOp::In => "in",
            MarkerOp::NotIn => "not in",
        }
    }
}

/// One side of a comparison: a variable name or a quoted literal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkerOperand {
    Variable(String),
    Literal(String),
}

/// A parsed marker expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Marker {
    Compare {
        lhs: MarkerOperand,
        op: MarkerOp,
        rhs: MarkerOperand,
    },
    And(Vec<Marker>),
    Or(Vec<Marker>),
}

impl Marker {
    pub fn parse(input: &str) -> Result<Self, PackagingError> {
        let tokens = tokenize(input)?;
        let mut parser = Parser {
            tokens,
            pos: 0,
            input,
        };
        let marker = parser.parse_or()?;
        if parser.pos != parser.tokens.len() {
            return Err(PackagingError::InvalidMarker(input.to_string()));
        }
        Ok(marker)
    }

    /// Evaluate against an environment and the active extras set.
    pub fn evaluate(&self, env: &EnvironmentMarkers, extras: &[String]) -> bool {
        match self {
            Marker::And(parts) => parts.iter().all(|m| m.evaluate(env, extras)),
            Marker::Or(parts) => parts.iter().any(|m| m.evaluate(env, extras)),
            Marker::Compare { lhs, op, rhs } => evaluate_compare(lhs, *op, rhs, env, extras),
        }
    }

    /// The extra name this marker pins via `extra == '...'`, if any. Used by
    /// the walker to decide whether a conditional dependency applies to the
    /// extras requested on the parent edge.
    pub fn extra_equals(&self) -> Option<&str> {
        match self {
            Marker::Compare {
                lhs: MarkerOperand::Variable(var),
                op: MarkerOp::Equal,
                rhs: MarkerOperand::Literal(value),
            } if var == "extra" => Some(value),
            Marker::Compare {
                lhs: MarkerOperand::Literal(value),
                op: MarkerOp::Equal,
                rhs: MarkerOperand::Variable(var),
            } if var == "extra" => Some(value),
            Marker::And(parts) | Marker::Or(parts) => {
                parts.iter().find_map(Marker::extra_equals)
            }
            _ => None,
        }
    }
}

fn evaluate_compare(
    lhs: &MarkerOperand,
    op: MarkerOp,
    rhs: &MarkerOperand,
    env: &EnvironmentMarkers,
    extras: &[String],
) -> bool {
    // `extra` compares against the whole extras set, not a single string.
    if let MarkerOperand::Variable(var) = lhs {
        if var == "extra" {
            if let MarkerOperand::Literal(value) = rhs {
                return extra_membership(op, value, extras);
            }
        }
    }
    if let MarkerOperand::Variable(var) = rhs {
        if var == "extra" {
            if let MarkerOperand::Literal(value) = lhs {
                return extra_membership(op, value, extras);
            }
        }
    }

    let (Some(lhs), Some(rhs)) = (resolve(lhs, env), resolve(rhs, env)) else {
        // Unknown variable: the comparison is vacuously false rather than a
        // hard error, matching how unparseable markers are skipped.
        return false;
    };

    match op {
        MarkerOp::In => rhs.contains(&lhs),
        MarkerOp::NotIn => !rhs.contains(&lhs),
        MarkerOp::Arbitrary => lhs == rhs,
        MarkerOp::Equal | MarkerOp::NotEqual
            if Version::parse(&lhs).is_err() || Version::parse(&rhs).is_err() =>
        {
            let eq = lhs == rhs;
            if op == MarkerOp::Equal { eq } else { !eq }
        }
        _ => match (Version::parse(&lhs), Version::parse(&rhs)) {
            (Ok(a), Ok(b)) => match op {
                MarkerOp::Equal => a == b,
                MarkerOp::NotEqual => a != b,
                MarkerOp::Less => a < b,
                MarkerOp::LessEqual => a <= b,
                MarkerOp::Greater => a > b,
                MarkerOp::GreaterEqual => a >= b,
                MarkerOp::Compatible => {
                    crate::specifiers::Specifier::parse(&format!("~={rhs}"))
                        .map(|s| s.contains(&a))
                        .unwrap_or(false)
                }
                MarkerOp::In | MarkerOp::NotIn | MarkerOp::Arbitrary => unreachable!(),
            },
            // Fall back to string ordering when either side is not a
            // version (e.g. platform_release "5.15.0-generic").
            _ => match op {
                MarkerOp::Less => lhs < rhs,
                MarkerOp::LessEqual => lhs <= rhs,
                MarkerOp::Greater => lhs > rhs,
                MarkerOp::GreaterEqual => lhs >= rhs,
                _ => false,
            },
        },
    }
}

fn extra_membership(op: MarkerOp, value: &str, extras: &[String]) -> bool {
    let present = extras.iter().any(|e| e == value);
    match op {
        MarkerOp::Equal => present,
        MarkerOp::NotEqual => !present,
        _ => false,
    }
}

fn resolve(operand: &MarkerOperand, env: &EnvironmentMarkers) -> Option<String> {
    match operand {
        MarkerOperand::Literal(s) => Some(s.clone()),
        MarkerOperand::Variable(var) => env.get(var).map(str::to_string),
    }
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Marker::Compare { lhs, op, rhs } => {
                let side = |operand: &MarkerOperand| match operand {
                    MarkerOperand::Variable(v) => v.clone(),
                    MarkerOperand::Literal(s) => format!("\"{s}\""),
                };
                write!(f, "{} {} {}", side(lhs), op.as_str(), side(rhs))
            }
            Marker::And(parts) => {
                let rendered: Vec<String> = parts.iter().map(render_and_operand).collect();
                write!(f, "{}", rendered.join(" and "))
            }
            Marker::Or(parts) => {
                let rendered: Vec<String> = parts.iter().map(|m| m.to_string()).collect();
                write!(f, "{}", rendered.join(" or "))
            }
        }
    }
}

// `or` under `and` needs parentheses to round-trip.
fn render_and_operand(marker: &Marker) -> String {
    match marker {
        Marker::Or(_) => format!("({marker})"),
        _ => marker.to_string(),
    }
}

impl FromStr for Marker {
    type Err = PackagingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Marker::parse(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Ident(String),
    Literal(String),
    Op(MarkerOp),
    LParen,
    RParen,
    And,
    Or,
    Not,
    In,
}

fn tokenize(input: &str) -> Result<Vec<Token>, PackagingError> {
    let invalid = || PackagingError::InvalidMarker(input.to_string());
    let mut tokens = Vec::new();
    let bytes = input.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i] as char;
        match c {
            ' ' | '\t' => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '\'' | '"' => {
                let quote = c;
                let start = i + 1;
                let mut end = start;
                while end < bytes.len() && bytes[end] as char != quote {
                    end += 1;
                }
                if end == bytes.len() {
                    return Err(invalid());
                }
                tokens.push(Token::Literal(input[start..end].to_string()));
                i = end + 1;
            }
            '<' | '>' | '=' | '!' | '~' => {
                let rest = &input[i..];
                let (op, len) = if rest.starts_with("===") {
                    (MarkerOp::Arbitrary, 3)
                } else if rest.starts_with("==") {
                    (MarkerOp::Equal, 2)
                } else if rest.starts_with("!=") {
                    (MarkerOp::NotEqual, 2)
                } else if rest.starts_with("<=") {
                    (MarkerOp::LessEqual, 2)
                } else if rest.starts_with(">=") {
                    (MarkerOp::GreaterEqual, 2)
                } else if rest.starts_with("~=") {
                    (MarkerOp::Compatible, 2)
                } else if rest.starts_with('<') {
                    (MarkerOp::Less, 1)
                } else if rest.starts_with('>') {
                    (MarkerOp::Greater, 1)
                } else {
                    return Err(invalid());
                };
                tokens.push(Token::Op(op));
                i += len;
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < bytes.len()
                    && ((bytes[i] as char).is_ascii_alphanumeric()
                        || bytes[i] == b'_'
                        || bytes[i] == b'.')
                {
                    i += 1;
                }
                match &input[start..i] {
                    "and" => tokens.push(Token::And),
                    "or" => tokens.push(Token::Or),
                    "not" => tokens.push(Token::Not),
                    "in" => tokens.push(Token::In),
                    ident => tokens.push(Token::Ident(ident.to_string())),
                }
            }
            _ => return Err(invalid()),
        }
    }
    Ok(tokens)
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    input: &'a str,
}

impl Parser<'_> {
    fn invalid(&self) -> PackagingError {
        PackagingError::InvalidMarker(self.input.to_string())
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn parse_or(&mut self) -> Result<Marker, PackagingError> {
        let mut parts = vec![self.parse_and()?];
        while self.peek() == Some(&Token::Or) {
            self.next();
            parts.push(self.parse_and()?);
        }
        if parts.len() == 1 {
            Ok(parts.pop().expect("non-empty"))
        } else {
            Ok(Marker::Or(parts))
        }
    }

    fn parse_and(&mut self) -> Result<Marker, PackagingError> {
        let mut parts = vec![self.parse_expr()?];
        while self.peek() == Some(&Token::And) {
            self.next();
            parts.push(self.parse_expr()?);
        }
        if parts.len() == 1 {
            Ok(parts.pop().expect("non-empty"))
        } else {
            Ok(Marker::And(parts))
        }
    }

    fn parse_expr(&mut self) -> Result<Marker, PackagingError> {
        if self.peek() == Some(&Token::LParen) {
            self.next();
            let inner = self.parse_or()?;
            if self.next() != Some(Token::RParen) {
                return Err(self.invalid());
            }
            return Ok(inner);
        }

        let lhs = self.parse_operand()?;
        let op = match self.next() {
            Some(Token::Op(op)) => op,
            Some(Token::In) => MarkerOp::In,
            Some(Token::Not) => {
                if self.next() != Some(Token::In) {
                    return Err(self.invalid());
                }
                MarkerOp::NotIn
            }
            _ => return Err(self.invalid()),
        };
        let rhs = self.parse_operand()?;
        Ok(Marker::Compare { lhs, op, rhs })
    }

    fn parse_operand(&mut self) -> Result<MarkerOperand, PackagingError> {
        match self.next() {
            Some(Token::Ident(name)) => Ok(MarkerOperand::Variable(name)),
            Some(Token::Literal(value)) => Ok(MarkerOperand::Literal(value)),
            _ => Err(self.invalid()),
        }
    }
}
