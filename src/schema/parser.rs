use std::collections::HashMap;

use crate::schema::lexer::{Token, TokenKind};

/// Statically known shape of an expression. Anything the parser cannot model is `Unknown`.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Value {
    Str(String),
    Number(String),
    Bool(bool),
    NoneLit,
    List(Vec<Value>),
    Call { callee: Vec<String>, args: Vec<Arg> },
    Ref { name: String, path: Vec<Access> },
    Unknown,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Arg {
    pub(crate) name: Option<String>,
    pub(crate) value: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Access {
    Attr(String),
    Index(i64),
}

impl Value {
    /// Scalar rendered the way the renderer expects config values.
    pub(crate) fn as_scalar(&self) -> Option<String> {
        match self {
            Value::Str(s) | Value::Number(s) => Some(s.clone()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Keyword argument `name` of a call value.
    pub(crate) fn kwarg(&self, name: &str) -> Option<&Value> {
        let Value::Call { args, .. } = self else {
            return None;
        };
        args.iter()
            .find(|a| a.name.as_deref() == Some(name))
            .map(|a| &a.value)
    }
}

/// Recursive-descent reader over the lenient token stream.
///
/// Every entry point recovers instead of failing: malformed input yields [`Value::Unknown`] and
/// the cursor is left at the next plausible expression boundary.
pub(crate) struct Parser<'t> {
    tokens: &'t [Token],
    pos: usize,
    depth: usize,
}

/// Nesting deeper than this is skipped as [`Value::Unknown`] instead of recursed into.
pub(crate) const MAX_NESTING: usize = 64;

impl<'t> Parser<'t> {
    pub(crate) fn at(tokens: &'t [Token], pos: usize) -> Self {
        Self {
            tokens,
            pos,
            depth: 0,
        }
    }

    fn peek(&self) -> &'t TokenKind {
        self.peek_at(0)
    }

    fn peek_at(&self, ahead: usize) -> &'t TokenKind {
        let tokens = self.tokens;
        let last = tokens.len().saturating_sub(1);
        &tokens[(self.pos + ahead).min(last)].kind
    }

    /// Advance one token, never past the trailing `Eof`.
    fn bump(&mut self) -> &'t TokenKind {
        let tokens = self.tokens;
        let last = tokens.len().saturating_sub(1);
        let t = &tokens[self.pos.min(last)].kind;
        if self.pos < last {
            self.pos += 1;
        }
        t
    }

    fn consume(&mut self, kind: &TokenKind) -> bool {
        if self.peek() == kind {
            self.bump();
            true
        } else {
            false
        }
    }

    fn at_terminator(&self) -> bool {
        matches!(
            self.peek(),
            TokenKind::Comma
                | TokenKind::RParen
                | TokenKind::RBracket
                | TokenKind::RBrace
                | TokenKind::Newline
                | TokenKind::Colon
                | TokenKind::Eof
        )
    }

    /// Parse one expression; binary operators or conditionals make it `Unknown`.
    pub(crate) fn parse_expr(&mut self) -> Value {
        let v = self.parse_postfix();
        if self.at_terminator() {
            return v;
        }
        self.skip_expr_rest();
        Value::Unknown
    }

    /// Every nested construct passes through here, so this is where nesting is bounded.
    fn parse_postfix(&mut self) -> Value {
        if self.depth >= MAX_NESTING {
            self.skip_expr_rest();
            return Value::Unknown;
        }
        self.depth += 1;
        let v = self.parse_postfix_inner();
        self.depth -= 1;
        v
    }

    fn parse_postfix_inner(&mut self) -> Value {
        let TokenKind::Ident(first) = self.peek().clone() else {
            return self.parse_primary();
        };
        self.bump();
        match first.as_str() {
            "True" => return Value::Bool(true),
            "False" => return Value::Bool(false),
            "None" => return Value::NoneLit,
            _ => {}
        }

        let mut dotted = vec![first];
        let mut path = Vec::<Access>::new();
        loop {
            match self.peek() {
                TokenKind::Dot => {
                    let TokenKind::Ident(attr) = self.peek_at(1).clone() else {
                        return Value::Unknown;
                    };
                    self.bump();
                    self.bump();
                    if path.is_empty() {
                        dotted.push(attr);
                    } else {
                        path.push(Access::Attr(attr));
                    }
                }
                TokenKind::LParen if path.is_empty() => {
                    self.bump();
                    let args = self.parse_call_args();
                    let call = Value::Call {
                        callee: dotted,
                        args,
                    };
                    // Postfix access on a call result is not modeled.
                    if matches!(self.peek(), TokenKind::Dot | TokenKind::LBracket | TokenKind::LParen) {
                        self.skip_expr_rest();
                        return Value::Unknown;
                    }
                    return call;
                }
                TokenKind::LBracket => {
                    self.bump();
                    if path.is_empty() && dotted.len() > 1 {
                        // `a.b[0]`: fold the dotted tail into the access path.
                        for attr in dotted.drain(1..) {
                            path.push(Access::Attr(attr));
                        }
                    }
                    let idx = self.parse_expr();
                    if !self.consume(&TokenKind::RBracket) {
                        self.skip_expr_rest();
                        return Value::Unknown;
                    }
                    match idx {
                        Value::Number(n) => match n.parse::<i64>() {
                            Ok(i) => path.push(Access::Index(i)),
                            Err(_) => return self.unknown_rest(),
                        },
                        _ => return self.unknown_rest(),
                    }
                }
                _ => break,
            }
        }

        let mut dotted = dotted.into_iter();
        let name = dotted.next().unwrap_or_default();
        let mut full = dotted.map(Access::Attr).collect::<Vec<_>>();
        full.extend(path);
        Value::Ref { name, path: full }
    }

    fn unknown_rest(&mut self) -> Value {
        if !self.at_terminator() {
            self.skip_expr_rest();
        }
        Value::Unknown
    }

    fn parse_primary(&mut self) -> Value {
        match self.peek().clone() {
            TokenKind::Str(s) => {
                self.bump();
                let mut s = s;
                // Implicit concatenation of adjacent literals.
                while let TokenKind::Str(next) = self.peek().clone() {
                    self.bump();
                    s.push_str(&next);
                }
                Value::Str(s)
            }
            TokenKind::Number(n) => {
                self.bump();
                Value::Number(n)
            }
            TokenKind::Op(op) if op == "-" => {
                self.bump();
                match self.peek().clone() {
                    TokenKind::Number(n) => {
                        self.bump();
                        Value::Number(format!("-{n}"))
                    }
                    _ => self.unknown_rest(),
                }
            }
            TokenKind::LBracket => {
                self.bump();
                self.parse_list_tail()
            }
            TokenKind::LParen => {
                self.bump();
                let inner = self.parse_expr();
                if self.consume(&TokenKind::RParen) {
                    inner
                } else {
                    self.skip_until_close();
                    Value::Unknown
                }
            }
            TokenKind::LBrace => {
                self.bump();
                self.skip_until_close();
                Value::Unknown
            }
            _ => {
                if !self.at_terminator() {
                    self.bump();
                }
                Value::Unknown
            }
        }
    }

    /// After `[`: elements until the matching `]`. Comprehensions are `Unknown`.
    fn parse_list_tail(&mut self) -> Value {
        let mut items = Vec::new();
        loop {
            if self.consume(&TokenKind::RBracket) {
                return Value::List(items);
            }
            if *self.peek() == TokenKind::Eof {
                return Value::Unknown;
            }
            let item = self.parse_element();
            if matches!(self.peek(), TokenKind::Ident(kw) if kw == "for") {
                self.skip_until_close();
                return Value::Unknown;
            }
            items.push(item);
            if !self.consume(&TokenKind::Comma) && *self.peek() != TokenKind::RBracket {
                self.skip_until_close();
                return Value::Unknown;
            }
        }
    }

    /// Like [`Parser::parse_expr`] but stops before a comprehension `for`.
    fn parse_element(&mut self) -> Value {
        let v = self.parse_postfix();
        if self.at_terminator() || matches!(self.peek(), TokenKind::Ident(kw) if kw == "for") {
            return v;
        }
        self.skip_expr_rest();
        Value::Unknown
    }

    /// After `(`: arguments until the matching `)`.
    pub(crate) fn parse_call_args(&mut self) -> Vec<Arg> {
        let mut args = Vec::new();
        loop {
            match self.peek() {
                TokenKind::RParen => {
                    self.bump();
                    return args;
                }
                TokenKind::Eof => return args,
                TokenKind::Op(op) if op == "*" || op == "**" => {
                    self.bump();
                    let _ = self.parse_expr();
                }
                _ => {
                    let name = match (self.peek().clone(), self.peek_at(1)) {
                        (TokenKind::Ident(n), TokenKind::Assign) => {
                            self.bump();
                            self.bump();
                            Some(n)
                        }
                        _ => None,
                    };
                    let value = self.parse_expr();
                    args.push(Arg { name, value });
                }
            }
            if !self.consume(&TokenKind::Comma) && *self.peek() != TokenKind::RParen {
                // Something unparseable: resync at the next separator inside this call.
                if matches!(self.peek(), TokenKind::RBracket | TokenKind::RBrace | TokenKind::Newline | TokenKind::Colon) {
                    self.bump();
                } else if *self.peek() == TokenKind::Eof {
                    return args;
                } else {
                    self.skip_expr_rest();
                }
                self.consume(&TokenKind::Comma);
            }
        }
    }

    /// Skip to the end of the current expression without consuming its terminator.
    fn skip_expr_rest(&mut self) {
        let mut depth = 0usize;
        loop {
            match self.peek() {
                TokenKind::Eof => return,
                TokenKind::LParen | TokenKind::LBracket | TokenKind::LBrace => depth += 1,
                TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace => {
                    if depth == 0 {
                        return;
                    }
                    depth -= 1;
                }
                TokenKind::Comma | TokenKind::Newline if depth == 0 => return,
                _ => {}
            }
            self.bump();
        }
    }

    /// Skip past the closer matching an opener that was already consumed.
    fn skip_until_close(&mut self) {
        let mut depth = 1usize;
        loop {
            match self.bump() {
                TokenKind::Eof => return,
                TokenKind::LParen | TokenKind::LBracket | TokenKind::LBrace => depth += 1,
                TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace => {
                    depth -= 1;
                    if depth == 0 {
                        return;
                    }
                }
                _ => {}
            }
        }
    }
}

/// Statement-level `name = expr` bindings, in source order, keyed by name.
#[derive(Debug, Default)]
pub(crate) struct Bindings {
    by_name: HashMap<String, Vec<(usize, Value)>>,
}

impl Bindings {
    /// Collect simple assignments that start a logical line outside brackets.
    pub(crate) fn collect(tokens: &[Token]) -> Self {
        let mut out = Bindings::default();
        let mut depth = 0usize;
        for i in 0..tokens.len() {
            match tokens[i].kind {
                TokenKind::LParen | TokenKind::LBracket | TokenKind::LBrace => depth += 1,
                TokenKind::RParen | TokenKind::RBracket | TokenKind::RBrace => {
                    depth = depth.saturating_sub(1)
                }
                _ => {}
            }
            if depth != 0 {
                continue;
            }
            let TokenKind::Ident(name) = &tokens[i].kind else {
                continue;
            };
            let starts_line = i == 0
                || matches!(tokens[i - 1].kind, TokenKind::Newline | TokenKind::Colon);
            let is_assign = tokens.get(i + 1).is_some_and(|t| t.kind == TokenKind::Assign);
            if !starts_line || !is_assign {
                continue;
            }
            let mut p = Parser::at(tokens, i + 2);
            let value = p.parse_expr();
            out.by_name
                .entry(name.clone())
                .or_default()
                .push((i, value));
        }
        out
    }

    /// Binding of `name` visible at token index `at`: the latest one before it, otherwise the
    /// earliest one after it (module constants may be declared below the function using them).
    pub(crate) fn lookup(&self, name: &str, at: usize) -> Option<&Value> {
        let list = self.by_name.get(name)?;
        list.iter()
            .rev()
            .find(|(pos, _)| *pos < at)
            .or_else(|| list.iter().find(|(pos, _)| *pos >= at))
            .map(|(_, v)| v)
    }

    /// Resolve references and access paths in `value` as seen from token index `at`.
    pub(crate) fn resolve(&self, value: &Value, at: usize) -> Value {
        self.resolve_depth(value, at, 0)
    }

    fn resolve_depth(&self, value: &Value, at: usize, depth: usize) -> Value {
        const MAX_DEPTH: usize = 16;
        if depth > MAX_DEPTH {
            return Value::Unknown;
        }
        match value {
            Value::Ref { name, path } => {
                let Some(bound) = self.lookup(name, at) else {
                    return Value::Unknown;
                };
                let mut cur = self.resolve_depth(bound, at, depth + 1);
                for access in path {
                    cur = match (access, cur) {
                        (Access::Index(i), Value::List(items)) => {
                            let len = items.len() as i64;
                            let idx = if *i < 0 { len + i } else { *i };
                            match usize::try_from(idx).ok().and_then(|u| items.get(u)) {
                                Some(v) => self.resolve_depth(v, at, depth + 1),
                                None => Value::Unknown,
                            }
                        }
                        (Access::Attr(attr), call @ Value::Call { .. }) => match call.kwarg(attr) {
                            Some(v) => self.resolve_depth(v, at, depth + 1),
                            None => Value::Unknown,
                        },
                        _ => Value::Unknown,
                    };
                }
                cur
            }
            Value::List(items) => Value::List(
                items
                    .iter()
                    .map(|v| self.resolve_depth(v, at, depth + 1))
                    .collect(),
            ),
            other => other.clone(),
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/schema/parser.rs"]
mod tests;
