//! Sandboxed expression evaluation over channel arrays.
//!
//! User formulas for math channels and filters are parsed by a small
//! recursive-descent parser and evaluated directly over `f64` arrays. The
//! namespace is closed: only the bound input slots, the constants `pi` and
//! `e`, and the fixed function library resolve. There is no host callback
//! surface and no ambient state.
//!
//! Operators (loosest to tightest binding): `|`/`||`, `&`/`&&`, comparisons
//! (`<  <=  >  >=  ==  !=`), `+ -`, `* / %`, unary `- !`. Comparisons and
//! boolean operators produce 0.0/1.0 element masks; any non-zero value is
//! treated as true. Scalars broadcast against arrays.
//!
//! Rolling-window statistics take their window in **seconds**; the window is
//! converted to a sample count using the average sample interval of the
//! active timestamp array, which the evaluation context carries for exactly
//! this purpose.

use std::collections::HashMap;

use once_cell::sync::Lazy;

use crate::error::ExpressionError;

/// Result of evaluating an expression: a scalar or an array. Callers decide
/// whether a scalar result is acceptable or must be broadcast.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Scalar(f64),
    Array(Vec<f64>),
}

impl Value {
    /// Materialize as an array of length `n`, broadcasting scalars.
    /// Errors when an array result has a different length.
    pub fn into_array(self, n: usize) -> Result<Vec<f64>, ExpressionError> {
        match self {
            Value::Scalar(s) => Ok(vec![s; n]),
            Value::Array(a) if a.len() == n => Ok(a),
            Value::Array(a) => Err(ExpressionError(format!(
                "result length {} does not match time base length {}",
                a.len(),
                n
            ))),
        }
    }
}

/// Bound inputs plus the active timestamp array.
pub struct EvalContext<'a> {
    vars: Vec<(&'a str, &'a [f64])>,
    times: &'a [f64],
}

impl<'a> EvalContext<'a> {
    pub fn new(times: &'a [f64]) -> Self {
        Self { vars: Vec::new(), times }
    }

    /// Bind a slot name to an aligned array (same length as `times`).
    pub fn bind(mut self, name: &'a str, values: &'a [f64]) -> Self {
        self.vars.push((name, values));
        self
    }

    fn lookup(&self, name: &str) -> Option<&'a [f64]> {
        self.vars.iter().find(|(n, _)| *n == name).map(|(_, v)| *v)
    }
}

/// Parse and evaluate `src` against the bound inputs.
pub fn evaluate(src: &str, ctx: &EvalContext) -> Result<Value, ExpressionError> {
    let tokens = tokenize(src)?;
    let mut parser = Parser { tokens, pos: 0 };
    let ast = parser.parse_expr()?;
    parser.expect_end()?;
    eval(&ast, ctx)
}

// ---------- Tokens ----------

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Num(f64),
    Ident(String),
    Op(&'static str),
    LParen,
    RParen,
    Comma,
}

fn tokenize(src: &str) -> Result<Vec<Tok>, ExpressionError> {
    let bytes = src.as_bytes();
    let mut out = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i] as char;
        match c {
            ' ' | '\t' | '\n' | '\r' => i += 1,
            '(' => {
                out.push(Tok::LParen);
                i += 1;
            }
            ')' => {
                out.push(Tok::RParen);
                i += 1;
            }
            ',' => {
                out.push(Tok::Comma);
                i += 1;
            }
            '+' | '-' | '*' | '/' | '%' => {
                out.push(Tok::Op(match c {
                    '+' => "+",
                    '-' => "-",
                    '*' => "*",
                    '/' => "/",
                    _ => "%",
                }));
                i += 1;
            }
            '<' | '>' => {
                if i + 1 < bytes.len() && bytes[i + 1] == b'=' {
                    out.push(Tok::Op(if c == '<' { "<=" } else { ">=" }));
                    i += 2;
                } else {
                    out.push(Tok::Op(if c == '<' { "<" } else { ">" }));
                    i += 1;
                }
            }
            '=' | '!' => {
                if i + 1 < bytes.len() && bytes[i + 1] == b'=' {
                    out.push(Tok::Op(if c == '=' { "==" } else { "!=" }));
                    i += 2;
                } else if c == '!' {
                    out.push(Tok::Op("!"));
                    i += 1;
                } else {
                    return Err(ExpressionError(format!("unexpected '=' at position {i}")));
                }
            }
            '&' | '|' => {
                // '&' and '&&' (likewise '|') are the same elementwise operator
                let op = if c == '&' { "&" } else { "|" };
                i += if i + 1 < bytes.len() && bytes[i + 1] == bytes[i] { 2 } else { 1 };
                out.push(Tok::Op(op));
            }
            '0'..='9' | '.' => {
                let start = i;
                while i < bytes.len() && matches!(bytes[i] as char, '0'..='9' | '.') {
                    i += 1;
                }
                // scientific notation tail: 1e-3, 2.5E+4
                if i < bytes.len() && matches!(bytes[i] as char, 'e' | 'E') {
                    let mut j = i + 1;
                    if j < bytes.len() && matches!(bytes[j] as char, '+' | '-') {
                        j += 1;
                    }
                    if j < bytes.len() && (bytes[j] as char).is_ascii_digit() {
                        i = j;
                        while i < bytes.len() && (bytes[i] as char).is_ascii_digit() {
                            i += 1;
                        }
                    }
                }
                let text = &src[start..i];
                let num: f64 = text
                    .parse()
                    .map_err(|_| ExpressionError(format!("invalid number '{text}'")))?;
                out.push(Tok::Num(num));
            }
            'a'..='z' | 'A'..='Z' | '_' => {
                let start = i;
                while i < bytes.len()
                    && matches!(bytes[i] as char, 'a'..='z' | 'A'..='Z' | '0'..='9' | '_')
                {
                    i += 1;
                }
                out.push(Tok::Ident(src[start..i].to_string()));
            }
            _ => return Err(ExpressionError(format!("unexpected character '{c}' at position {i}"))),
        }
    }
    Ok(out)
}

// ---------- Grammar ----------

#[derive(Debug, Clone)]
enum Ast {
    Num(f64),
    Var(String),
    Unary(&'static str, Box<Ast>),
    Binary(&'static str, Box<Ast>, Box<Ast>),
    Call(String, Vec<Ast>),
}

struct Parser {
    tokens: Vec<Tok>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Tok> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<Tok> {
        let t = self.tokens.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn eat_op(&mut self, ops: &[&'static str]) -> Option<&'static str> {
        let current = match self.peek() {
            Some(Tok::Op(op)) => *op,
            _ => return None,
        };
        if let Some(found) = ops.iter().copied().find(|&o| o == current) {
            self.pos += 1;
            return Some(found);
        }
        None
    }

    fn expect_end(&self) -> Result<(), ExpressionError> {
        if self.pos == self.tokens.len() {
            Ok(())
        } else {
            Err(ExpressionError(format!("unexpected trailing input at token {}", self.pos)))
        }
    }

    fn parse_expr(&mut self) -> Result<Ast, ExpressionError> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Ast, ExpressionError> {
        let mut lhs = self.parse_and()?;
        while let Some(op) = self.eat_op(&["|"]) {
            let rhs = self.parse_and()?;
            lhs = Ast::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Ast, ExpressionError> {
        let mut lhs = self.parse_cmp()?;
        while let Some(op) = self.eat_op(&["&"]) {
            let rhs = self.parse_cmp()?;
            lhs = Ast::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_cmp(&mut self) -> Result<Ast, ExpressionError> {
        let mut lhs = self.parse_add()?;
        while let Some(op) = self.eat_op(&["<=", ">=", "==", "!=", "<", ">"]) {
            let rhs = self.parse_add()?;
            lhs = Ast::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_add(&mut self) -> Result<Ast, ExpressionError> {
        let mut lhs = self.parse_mul()?;
        while let Some(op) = self.eat_op(&["+", "-"]) {
            let rhs = self.parse_mul()?;
            lhs = Ast::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_mul(&mut self) -> Result<Ast, ExpressionError> {
        let mut lhs = self.parse_unary()?;
        while let Some(op) = self.eat_op(&["*", "/", "%"]) {
            let rhs = self.parse_unary()?;
            lhs = Ast::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Ast, ExpressionError> {
        if let Some(op) = self.eat_op(&["-", "!"]) {
            let inner = self.parse_unary()?;
            return Ok(Ast::Unary(op, Box::new(inner)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Ast, ExpressionError> {
        match self.bump() {
            Some(Tok::Num(n)) => Ok(Ast::Num(n)),
            Some(Tok::Ident(name)) => {
                if matches!(self.peek(), Some(Tok::LParen)) {
                    self.pos += 1;
                    let mut args = Vec::new();
                    if !matches!(self.peek(), Some(Tok::RParen)) {
                        loop {
                            args.push(self.parse_expr()?);
                            match self.bump() {
                                Some(Tok::Comma) => continue,
                                Some(Tok::RParen) => break,
                                _ => return Err(ExpressionError("expected ',' or ')'".into())),
                            }
                        }
                    } else {
                        self.pos += 1;
                    }
                    Ok(Ast::Call(name, args))
                } else {
                    Ok(Ast::Var(name))
                }
            }
            Some(Tok::LParen) => {
                let inner = self.parse_expr()?;
                match self.bump() {
                    Some(Tok::RParen) => Ok(inner),
                    _ => Err(ExpressionError("expected ')'".into())),
                }
            }
            Some(tok) => Err(ExpressionError(format!("unexpected token {tok:?}"))),
            None => Err(ExpressionError("unexpected end of expression".into())),
        }
    }
}

// ---------- Evaluation ----------

// Closed library: name → (min arity, max arity).
static FUNCTIONS: Lazy<HashMap<&'static str, (usize, usize)>> = Lazy::new(|| {
    let mut m = HashMap::new();
    for name in [
        "abs", "round", "sqrt", "log", "log10", "exp", "sin", "cos", "tan", "floor", "ceil",
        "delta", "cumsum", "np_min", "np_max", "np_mean", "np_std",
    ] {
        m.insert(name, (1, 1));
    }
    for name in ["min", "max", "pow", "rolling_avg", "rolling_min", "rolling_max"] {
        m.insert(name, (2, 2));
    }
    m.insert("clip", (3, 3));
    m.insert("if_else", (3, 3));
    m
});

fn eval(ast: &Ast, ctx: &EvalContext) -> Result<Value, ExpressionError> {
    match ast {
        Ast::Num(n) => Ok(Value::Scalar(*n)),
        Ast::Var(name) => {
            if let Some(values) = ctx.lookup(name) {
                Ok(Value::Array(values.to_vec()))
            } else {
                match name.as_str() {
                    "pi" => Ok(Value::Scalar(std::f64::consts::PI)),
                    "e" => Ok(Value::Scalar(std::f64::consts::E)),
                    _ => Err(ExpressionError(format!("unknown name '{name}'"))),
                }
            }
        }
        Ast::Unary(op, inner) => {
            let v = eval(inner, ctx)?;
            match *op {
                "-" => map_unary(v, |x| -x),
                _ => map_unary(v, |x| (x == 0.0) as u8 as f64),
            }
        }
        Ast::Binary(op, lhs, rhs) => {
            let a = eval(lhs, ctx)?;
            let b = eval(rhs, ctx)?;
            binary_op(op, a, b)
        }
        Ast::Call(name, args) => {
            let (lo, hi) = *FUNCTIONS
                .get(name.as_str())
                .ok_or_else(|| ExpressionError(format!("unknown function '{name}'")))?;
            if args.len() < lo || args.len() > hi {
                return Err(ExpressionError(format!(
                    "{name}() takes {lo} argument{}, got {}",
                    if lo == 1 { "" } else { "s" },
                    args.len()
                )));
            }
            let mut vals = Vec::with_capacity(args.len());
            for a in args {
                vals.push(eval(a, ctx)?);
            }
            call(name, vals, ctx)
        }
    }
}

fn map_unary(v: Value, f: impl Fn(f64) -> f64) -> Result<Value, ExpressionError> {
    Ok(match v {
        Value::Scalar(s) => Value::Scalar(f(s)),
        Value::Array(a) => Value::Array(a.into_iter().map(f).collect()),
    })
}

/// Apply an elementwise binary function with scalar broadcast.
fn zip_binary(
    a: Value,
    b: Value,
    f: impl Fn(f64, f64) -> Result<f64, ExpressionError>,
) -> Result<Value, ExpressionError> {
    match (a, b) {
        (Value::Scalar(x), Value::Scalar(y)) => Ok(Value::Scalar(f(x, y)?)),
        (Value::Array(xs), Value::Scalar(y)) => Ok(Value::Array(
            xs.into_iter().map(|x| f(x, y)).collect::<Result<_, _>>()?,
        )),
        (Value::Scalar(x), Value::Array(ys)) => Ok(Value::Array(
            ys.into_iter().map(|y| f(x, y)).collect::<Result<_, _>>()?,
        )),
        (Value::Array(xs), Value::Array(ys)) => {
            if xs.len() != ys.len() {
                return Err(ExpressionError(format!(
                    "length mismatch: {} vs {}",
                    xs.len(),
                    ys.len()
                )));
            }
            Ok(Value::Array(
                xs.into_iter()
                    .zip(ys)
                    .map(|(x, y)| f(x, y))
                    .collect::<Result<_, _>>()?,
            ))
        }
    }
}

fn binary_op(op: &str, a: Value, b: Value) -> Result<Value, ExpressionError> {
    let bool_of = |x: f64| x != 0.0;
    match op {
        "+" => zip_binary(a, b, |x, y| Ok(x + y)),
        "-" => zip_binary(a, b, |x, y| Ok(x - y)),
        "*" => zip_binary(a, b, |x, y| Ok(x * y)),
        "/" => zip_binary(a, b, |x, y| {
            if y == 0.0 {
                Err(ExpressionError("division by zero".into()))
            } else {
                Ok(x / y)
            }
        }),
        "%" => zip_binary(a, b, |x, y| {
            if y == 0.0 {
                Err(ExpressionError("modulo by zero".into()))
            } else {
                Ok(x % y)
            }
        }),
        "<" => zip_binary(a, b, |x, y| Ok((x < y) as u8 as f64)),
        "<=" => zip_binary(a, b, |x, y| Ok((x <= y) as u8 as f64)),
        ">" => zip_binary(a, b, |x, y| Ok((x > y) as u8 as f64)),
        ">=" => zip_binary(a, b, |x, y| Ok((x >= y) as u8 as f64)),
        "==" => zip_binary(a, b, |x, y| Ok((x == y) as u8 as f64)),
        "!=" => zip_binary(a, b, |x, y| Ok((x != y) as u8 as f64)),
        "&" => zip_binary(a, b, move |x, y| Ok((bool_of(x) && bool_of(y)) as u8 as f64)),
        "|" => zip_binary(a, b, move |x, y| Ok((bool_of(x) || bool_of(y)) as u8 as f64)),
        _ => Err(ExpressionError(format!("unknown operator '{op}'"))),
    }
}

fn two(args: Vec<Value>) -> Result<[Value; 2], ExpressionError> {
    args.try_into()
        .map_err(|_| ExpressionError("internal arity error".into()))
}

fn three(args: Vec<Value>) -> Result<[Value; 3], ExpressionError> {
    args.try_into()
        .map_err(|_| ExpressionError("internal arity error".into()))
}

/// Elementwise `cond ? a : b` with scalar broadcast across all three inputs.
fn ternary(cond: Value, a: Value, b: Value) -> Result<Value, ExpressionError> {
    let len = [&cond, &a, &b]
        .into_iter()
        .filter_map(|v| match v {
            Value::Array(x) => Some(x.len()),
            Value::Scalar(_) => None,
        })
        .max();
    let at = |v: &Value, i: usize| match v {
        Value::Scalar(s) => *s,
        Value::Array(x) => x[i],
    };
    match len {
        None => Ok(Value::Scalar(if at(&cond, 0) != 0.0 {
            at(&a, 0)
        } else {
            at(&b, 0)
        })),
        Some(n) => {
            for v in [&cond, &a, &b] {
                if let Value::Array(x) = v {
                    if x.len() != n {
                        return Err(ExpressionError(format!(
                            "length mismatch: {} vs {n}",
                            x.len()
                        )));
                    }
                }
            }
            Ok(Value::Array(
                (0..n)
                    .map(|i| if at(&cond, i) != 0.0 { at(&a, i) } else { at(&b, i) })
                    .collect(),
            ))
        }
    }
}

fn call(name: &str, mut args: Vec<Value>, ctx: &EvalContext) -> Result<Value, ExpressionError> {
    match name {
        "abs" => map_unary(args.remove(0), f64::abs),
        "round" => map_unary(args.remove(0), f64::round),
        "sqrt" => map_unary(args.remove(0), f64::sqrt),
        "log" => map_unary(args.remove(0), f64::ln),
        "log10" => map_unary(args.remove(0), f64::log10),
        "exp" => map_unary(args.remove(0), f64::exp),
        "sin" => map_unary(args.remove(0), f64::sin),
        "cos" => map_unary(args.remove(0), f64::cos),
        "tan" => map_unary(args.remove(0), f64::tan),
        "floor" => map_unary(args.remove(0), f64::floor),
        "ceil" => map_unary(args.remove(0), f64::ceil),
        "min" => {
            let [a, b] = two(args)?;
            zip_binary(a, b, |x, y| Ok(x.min(y)))
        }
        "max" => {
            let [a, b] = two(args)?;
            zip_binary(a, b, |x, y| Ok(x.max(y)))
        }
        "pow" => {
            let [a, b] = two(args)?;
            zip_binary(a, b, |x, y| Ok(x.powf(y)))
        }
        "clip" => {
            let [x, lo, hi] = three(args)?;
            let clipped = zip_binary(x, lo, |x, lo| Ok(x.max(lo)))?;
            zip_binary(clipped, hi, |x, hi| Ok(x.min(hi)))
        }
        "if_else" => {
            let [cond, a, b] = three(args)?;
            ternary(cond, a, b)
        }
        "delta" => {
            let x = to_series(args.remove(0), ctx);
            let mut out = vec![0.0; x.len()];
            for i in 1..x.len() {
                out[i] = x[i] - x[i - 1];
            }
            Ok(Value::Array(out))
        }
        "cumsum" => {
            let x = to_series(args.remove(0), ctx);
            let mut acc = 0.0;
            Ok(Value::Array(
                x.into_iter()
                    .map(|v| {
                        acc += v;
                        acc
                    })
                    .collect(),
            ))
        }
        "np_min" => reduce(args.remove(0), ctx, |a| {
            a.iter().copied().fold(f64::INFINITY, f64::min)
        }),
        "np_max" => reduce(args.remove(0), ctx, |a| {
            a.iter().copied().fold(f64::NEG_INFINITY, f64::max)
        }),
        "np_mean" => reduce(args.remove(0), ctx, mean),
        "np_std" => reduce(args.remove(0), ctx, |a| {
            let m = mean(a);
            (a.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / a.len() as f64).sqrt()
        }),
        "rolling_avg" | "rolling_min" | "rolling_max" => {
            let [x, win] = two(args)?;
            let seconds = scalar_arg(name, win)?;
            let x = to_series(x, ctx);
            let w = window_samples(ctx.times, seconds);
            Ok(Value::Array(match name {
                "rolling_avg" => rolling_avg(&x, w),
                "rolling_min" => rolling_extreme(&x, w, f64::min),
                _ => rolling_extreme(&x, w, f64::max),
            }))
        }
        _ => Err(ExpressionError(format!("unknown function '{name}'"))),
    }
}

/// Statistical operators act on the full time base; scalar inputs broadcast
/// to the length of the active timestamp array first.
fn to_series(v: Value, ctx: &EvalContext) -> Vec<f64> {
    match v {
        Value::Scalar(s) => vec![s; ctx.times.len()],
        Value::Array(a) => a,
    }
}

fn reduce(
    v: Value,
    ctx: &EvalContext,
    f: impl Fn(&[f64]) -> f64,
) -> Result<Value, ExpressionError> {
    let series = to_series(v, ctx);
    if series.is_empty() {
        return Err(ExpressionError("reduction over empty array".into()));
    }
    Ok(Value::Scalar(f(&series)))
}

fn mean(a: &[f64]) -> f64 {
    a.iter().sum::<f64>() / a.len() as f64
}

fn scalar_arg(func: &str, v: Value) -> Result<f64, ExpressionError> {
    let s = match v {
        Value::Scalar(s) => s,
        Value::Array(_) => {
            return Err(ExpressionError(format!("{func}() window must be a scalar")))
        }
    };
    if !s.is_finite() || s < 0.0 {
        return Err(ExpressionError(format!(
            "{func}() window must be a finite non-negative number of seconds"
        )));
    }
    Ok(s)
}

/// Convert a window given in seconds to a sample count using the mean sample
/// interval of `times`. Falls back to treating the value as a raw sample
/// count when fewer than two samples exist or the interval is non-positive.
/// Clamped to at least one sample.
fn window_samples(times: &[f64], seconds: f64) -> usize {
    let n = times.len();
    let w = if n >= 2 {
        let avg = (times[n - 1] - times[0]) / (n as f64 - 1.0);
        if avg > 0.0 {
            (seconds / avg).round()
        } else {
            seconds
        }
    } else {
        seconds
    };
    w.max(1.0) as usize
}

/// Inclusive bounds of a centered window of `w` samples at index `i`,
/// clipped to the array edges.
#[inline]
fn window_bounds(i: usize, w: usize, n: usize) -> (usize, usize) {
    let h_lo = w / 2;
    let h_hi = w - 1 - h_lo;
    let lo = i.saturating_sub(h_lo);
    let hi = (i + h_hi).min(n - 1);
    (lo, hi)
}

/// Centered moving average; edge windows shrink to the available samples.
fn rolling_avg(x: &[f64], w: usize) -> Vec<f64> {
    let n = x.len();
    if n == 0 {
        return Vec::new();
    }
    let mut prefix = vec![0.0; n + 1];
    for i in 0..n {
        prefix[i + 1] = prefix[i] + x[i];
    }
    (0..n)
        .map(|i| {
            let (lo, hi) = window_bounds(i, w, n);
            (prefix[hi + 1] - prefix[lo]) / (hi - lo + 1) as f64
        })
        .collect()
}

/// Centered sliding min/max with clipped inclusive bounds.
fn rolling_extreme(x: &[f64], w: usize, pick: impl Fn(f64, f64) -> f64) -> Vec<f64> {
    let n = x.len();
    if n == 0 {
        return Vec::new();
    }
    (0..n)
        .map(|i| {
            let (lo, hi) = window_bounds(i, w, n);
            x[lo..=hi].iter().copied().reduce(&pick).unwrap_or(x[i])
        })
        .collect()
}
