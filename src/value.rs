//! The runtime value: a tagged union over every type the calculator
//! knows, with the operator dispatch the VM's arithmetic opcodes call
//! into. Containers sit behind `Rc` and are copied on write, which
//! gives assignment value semantics while keeping the reference counts
//! explicit.
//!
//! Object operands never reach the dispatch here; the VM routes them
//! to their type's operator overrides first and only fails over to a
//! `NoOperator` error.

use std::fmt;
use std::rc::Rc;

use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::{One, Signed, ToPrimitive, Zero};

use crate::assoc::{Assoc, KeyTuple};
use crate::code::{BinOp, UnOp};
use crate::config::Config;
use crate::cplx::{self, Cplx, Demoted};
use crate::errors::{CalcError, CalcResult};
use crate::list::List;
use crate::matrix::Matrix;
use crate::object::Object;
use crate::qmath;
use crate::randstate::Randstate;

/// A first-class error value.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrValue {
    pub code: u32,
    pub msg: Option<Rc<String>>,
}

impl ErrValue {
    pub fn from_error(e: &CalcError) -> Self {
        ErrValue {
            code: e.code(),
            msg: Some(Rc::new(e.to_string())),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Value {
    Null,
    /// exact rational; integers have denominator 1
    Num(BigRational),
    /// nonzero imaginary part by construction
    Cplx(Cplx),
    /// NUL-safe byte string
    Str(Rc<Vec<u8>>),
    List(Rc<List>),
    Mat(Rc<Matrix>),
    Map(Rc<Assoc>),
    Obj(Rc<Object>),
    /// index into the engine's open-file table
    File(usize),
    /// raw byte buffer
    Block(Rc<Vec<u8>>),
    Rand(Rc<Randstate>),
    Err(ErrValue),
}

impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Num(a), Value::Num(b)) => a == b,
            (Value::Cplx(a), Value::Cplx(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Mat(a), Value::Mat(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Obj(a), Value::Obj(b)) => a == b,
            (Value::File(a), Value::File(b)) => a == b,
            (Value::Block(a), Value::Block(b)) => a == b,
            (Value::Rand(a), Value::Rand(b)) => Rc::ptr_eq(a, b),
            (Value::Err(a), Value::Err(b)) => a == b,
            _ => false,
        }
    }
}

impl Default for Value {
    fn default() -> Value {
        Value::Null
    }
}

impl Value {
    pub fn from_i64(i: i64) -> Value {
        Value::Num(BigRational::from_integer(BigInt::from(i)))
    }

    pub fn from_z(z: BigInt) -> Value {
        Value::Num(BigRational::from_integer(z))
    }

    pub fn from_q(q: BigRational) -> Value {
        Value::Num(q)
    }

    pub fn from_ratio(n: i64, d: i64) -> Value {
        Value::Num(BigRational::new(BigInt::from(n), BigInt::from(d)))
    }

    /// Complex constructor that keeps the zero-imaginary invariant.
    pub fn from_cplx(c: Cplx) -> Value {
        match cplx::demote(c) {
            Demoted::Real(q) => Value::Num(q),
            Demoted::Complex(c) => Value::Cplx(c),
        }
    }

    pub fn from_demoted(d: Demoted) -> Value {
        match d {
            Demoted::Real(q) => Value::Num(q),
            Demoted::Complex(c) => Value::Cplx(c),
        }
    }

    pub fn str_from(s: &str) -> Value {
        Value::Str(Rc::new(s.as_bytes().to_vec()))
    }

    pub fn str_from_bytes(b: Vec<u8>) -> Value {
        Value::Str(Rc::new(b))
    }

    pub fn bool_val(b: bool) -> Value {
        Value::from_i64(b as i64)
    }

    pub fn err_from(e: &CalcError) -> Value {
        Value::Err(ErrValue::from_error(e))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Num(..) => "number",
            Value::Cplx(..) => "complex",
            Value::Str(..) => "string",
            Value::List(..) => "list",
            Value::Mat(..) => "matrix",
            Value::Map(..) => "assoc",
            Value::Obj(..) => "object",
            Value::File(..) => "file",
            Value::Block(..) => "block",
            Value::Rand(..) => "randstate",
            Value::Err(..) => "error",
        }
    }

    pub fn is_zero(&self) -> bool {
        matches!(self, Value::Num(q) if q.is_zero())
    }

    /// Truth for branch conditions: null, zero and the empty string
    /// are false.
    pub fn is_true(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Num(q) => !q.is_zero(),
            Value::Str(s) => !s.is_empty(),
            _ => true,
        }
    }

    pub fn as_num(&self) -> Option<&BigRational> {
        match self {
            Value::Num(q) => Some(q),
            _ => None,
        }
    }

    pub fn expect_num(&self, what: &'static str) -> Result<&BigRational, CalcError> {
        match self {
            Value::Num(q) => Ok(q),
            _ => Err(CalcError::TypeMismatchOne(what, self.type_name())),
        }
    }

    /// The value as an integer; fails on anything with a fractional
    /// part or a different tag.
    pub fn expect_int(&self, what: &'static str) -> Result<BigInt, CalcError> {
        match self {
            Value::Num(q) if q.is_integer() => Ok(q.to_integer()),
            Value::Num(q) => Err(CalcError::NonInteger(what, q.to_string())),
            _ => Err(CalcError::TypeMismatchOne(what, self.type_name())),
        }
    }

    pub fn expect_usize(&self, what: &'static str) -> Result<usize, CalcError> {
        let i = self.expect_int(what)?;
        i.to_usize()
            .ok_or_else(|| CalcError::InvalidArg(what, i.to_string()))
    }

    pub fn expect_str(&self, what: &'static str) -> Result<String, CalcError> {
        match self {
            Value::Str(b) => Ok(String::from_utf8_lossy(b).into_owned()),
            _ => Err(CalcError::TypeMismatchOne(what, self.type_name())),
        }
    }

    pub fn str_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Str(b) | Value::Block(b) => Some(b),
            _ => None,
        }
    }

    /// Element count: containers count elements, strings and blocks
    /// bytes, null is empty, atoms count as one.
    pub fn size(&self) -> usize {
        match self {
            Value::Null => 0,
            Value::Str(s) | Value::Block(s) => s.len(),
            Value::List(l) => l.len(),
            Value::Mat(m) => m.size(),
            Value::Map(a) => a.len(),
            Value::Obj(o) => o.fields.len(),
            _ => 1,
        }
    }
}

fn to_cplx(v: &Value) -> Result<Cplx, CalcError> {
    match v {
        Value::Num(q) => Ok(Cplx::new(q.clone(), BigRational::zero())),
        Value::Cplx(c) => Ok(c.clone()),
        _ => Err(CalcError::TypeMismatchOne("complex", v.type_name())),
    }
}

fn cplx_div(a: &Cplx, b: &Cplx) -> Result<Cplx, CalcError> {
    let norm2 = &b.re * &b.re + &b.im * &b.im;
    if norm2.is_zero() {
        return Err(CalcError::DivByZero);
    }
    let re = (&a.re * &b.re + &a.im * &b.im) / &norm2;
    let im = (&a.im * &b.re - &a.re * &b.im) / &norm2;
    Ok(Cplx::new(re, im))
}

fn num_arith(op: BinOp, x: &BigRational, y: &BigRational) -> CalcResult {
    Ok(Value::Num(match op {
        BinOp::Add => x + y,
        BinOp::Sub => x - y,
        BinOp::Mul => x * y,
        BinOp::Div => {
            if y.is_zero() {
                return Err(CalcError::DivByZero);
            }
            x / y
        }
        _ => unreachable!(),
    }))
}

fn cplx_arith(op: BinOp, a: &Value, b: &Value) -> CalcResult {
    let x = to_cplx(a)?;
    let y = to_cplx(b)?;
    let r = match op {
        BinOp::Add => x + y,
        BinOp::Sub => x - y,
        BinOp::Mul => x * y,
        BinOp::Div => cplx_div(&x, &y)?,
        _ => unreachable!(),
    };
    Ok(Value::from_cplx(r))
}

fn arith(op: BinOp, a: Value, b: Value, cfg: &Config) -> CalcResult {
    match (&a, &b) {
        (Value::Num(x), Value::Num(y)) => num_arith(op, x, y),
        (Value::Cplx(..), Value::Num(..) | Value::Cplx(..))
        | (Value::Num(..), Value::Cplx(..)) => cplx_arith(op, &a, &b),
        (Value::Str(x), Value::Str(y)) if op == BinOp::Add => {
            let mut out = x.as_ref().clone();
            out.extend_from_slice(y);
            Ok(Value::Str(Rc::new(out)))
        }
        (Value::Mat(x), Value::Mat(y)) => match op {
            BinOp::Add | BinOp::Sub => Ok(Value::Mat(Rc::new(Matrix::zip(x, y, op, cfg)?))),
            BinOp::Mul => Ok(Value::Mat(Rc::new(Matrix::matmul(x, y, cfg)?))),
            _ => Err(CalcError::TypeMismatch(op.symbol(), "matrix", "matrix")),
        },
        (Value::Mat(m), Value::Num(..) | Value::Cplx(..))
            if op == BinOp::Mul || op == BinOp::Div =>
        {
            Ok(Value::Mat(Rc::new(m.scalar_op(&b, op, false, cfg)?)))
        }
        (Value::Num(..) | Value::Cplx(..), Value::Mat(m)) if op == BinOp::Mul => {
            Ok(Value::Mat(Rc::new(m.scalar_op(&a, op, true, cfg)?)))
        }
        _ => Err(CalcError::TypeMismatch(
            op.symbol(),
            a.type_name(),
            b.type_name(),
        )),
    }
}

fn compare(op: BinOp, a: &Value, b: &Value) -> CalcResult {
    use std::cmp::Ordering;
    let ord = match (a, b) {
        (Value::Num(x), Value::Num(y)) => x.cmp(y),
        (Value::Str(x), Value::Str(y)) => x.cmp(y),
        _ => {
            return Err(CalcError::TypeMismatch(
                op.symbol(),
                a.type_name(),
                b.type_name(),
            ))
        }
    };
    let res = match op {
        BinOp::Lt => ord == Ordering::Less,
        BinOp::Le => ord != Ordering::Greater,
        BinOp::Gt => ord == Ordering::Greater,
        BinOp::Ge => ord != Ordering::Less,
        _ => unreachable!(),
    };
    Ok(Value::bool_val(res))
}

fn bitwise(op: BinOp, a: &Value, b: &Value) -> CalcResult {
    let x = a.expect_int(op.symbol())?;
    let y = b.expect_int(op.symbol())?;
    let r = match op {
        BinOp::And => x & y,
        BinOp::Or => x | y,
        BinOp::Xor => x ^ y,
        _ => unreachable!(),
    };
    Ok(Value::from_z(r))
}

const MAX_SHIFT: i64 = 1 << 20;

fn shift(op: BinOp, a: &Value, b: &Value) -> CalcResult {
    let x = a.expect_int(op.symbol())?;
    let s = b.expect_int(op.symbol())?;
    let s = s
        .to_i64()
        .filter(|v| v.abs() <= MAX_SHIFT)
        .ok_or(CalcError::Overflow("shift"))?;
    // a negative amount shifts the other way
    let left = (op == BinOp::Shl) == (s >= 0);
    let amount = s.unsigned_abs() as usize;
    let r = if left { x << amount } else { x >> amount };
    Ok(Value::from_z(r))
}

fn pow_op(a: &Value, b: &Value, cfg: &Config) -> CalcResult {
    match (a, b) {
        (Value::Num(x), Value::Num(y)) => {
            Ok(Value::from_demoted(cplx::pow_qq(x, y, &cfg.epsilon)?))
        }
        (Value::Cplx(..) | Value::Num(..), Value::Cplx(..))
        | (Value::Cplx(..), Value::Num(..)) => {
            let z = to_cplx(a)?;
            let w = to_cplx(b)?;
            Ok(Value::from_demoted(cplx::pow_cc(&z, &w, &cfg.epsilon)?))
        }
        _ => Err(CalcError::TypeMismatch("**", a.type_name(), b.type_name())),
    }
}

/// Binary operator dispatch over the tag pair. Object operands are the
/// VM's business and must not arrive here.
pub fn binop(op: BinOp, a: Value, b: Value, cfg: &Config) -> CalcResult {
    match op {
        BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div => arith(op, a, b, cfg),
        BinOp::Quo => {
            let x = a.expect_num("//")?;
            let y = b.expect_num("//")?;
            Ok(Value::Num(qmath::quo(x, y, cfg.quo)?))
        }
        BinOp::Mod => {
            let x = a.expect_num("%")?;
            let y = b.expect_num("%")?;
            Ok(Value::Num(qmath::modulo(x, y, cfg.modulo)?))
        }
        BinOp::Pow => pow_op(&a, &b, cfg),
        BinOp::Eq => Ok(Value::bool_val(a == b)),
        BinOp::Ne => Ok(Value::bool_val(a != b)),
        BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => compare(op, &a, &b),
        BinOp::And | BinOp::Or | BinOp::Xor => bitwise(op, &a, &b),
        BinOp::Shl | BinOp::Shr => shift(op, &a, &b),
    }
}

/// Unary operator dispatch.
pub fn unop(op: UnOp, v: Value, cfg: &Config) -> CalcResult {
    match op {
        UnOp::Neg => match v {
            Value::Num(q) => Ok(Value::Num(-q)),
            Value::Cplx(c) => Ok(Value::Cplx(-c)),
            Value::Mat(m) => Ok(Value::Mat(Rc::new(m.negate(cfg)?))),
            _ => Err(CalcError::TypeMismatchOne("-", v.type_name())),
        },
        UnOp::LNot => Ok(Value::bool_val(!v.is_true())),
        UnOp::BitNot => {
            let i = v.expect_int("~")?;
            Ok(Value::from_z(!i))
        }
        UnOp::Plus => match v {
            Value::Num(..) | Value::Cplx(..) | Value::Mat(..) => Ok(v),
            _ => Err(CalcError::TypeMismatchOne("+", v.type_name())),
        },
    }
}

/// Absolute value; for complex numbers the modulus at `eps` precision.
pub fn abs_val(v: &Value, cfg: &Config) -> CalcResult {
    match v {
        Value::Num(q) => Ok(Value::Num(q.abs())),
        Value::Cplx(c) => {
            let norm2 = &c.re * &c.re + &c.im * &c.im;
            Ok(Value::Num(crate::transc::sqrt_q(&norm2, &cfg.epsilon)?))
        }
        _ => Err(CalcError::TypeMismatchOne("abs", v.type_name())),
    }
}

/// Multiplicative inverse.
pub fn inv_val(v: &Value) -> CalcResult {
    match v {
        Value::Num(q) => {
            if q.is_zero() {
                return Err(CalcError::DivByZero);
            }
            Ok(Value::Num(q.recip()))
        }
        Value::Cplx(c) => {
            let one = Cplx::new(BigRational::one(), BigRational::zero());
            Ok(Value::from_cplx(cplx_div(&one, c)?))
        }
        _ => Err(CalcError::TypeMismatchOne("inv", v.type_name())),
    }
}

/// Complex conjugate; real numbers pass through.
pub fn conj_val(v: &Value) -> CalcResult {
    match v {
        Value::Num(..) => Ok(v.clone()),
        Value::Cplx(c) => Ok(Value::Cplx(Cplx::new(c.re.clone(), -c.im.clone()))),
        _ => Err(CalcError::TypeMismatchOne("conj", v.type_name())),
    }
}

fn key_to_index(key: &Value, len: usize) -> Result<usize, CalcError> {
    let i = key.expect_int("index")?;
    let i = i.to_i64().ok_or(CalcError::IndexBounds)?;
    if i < 0 || (i as usize) >= len {
        return Err(CalcError::IndexBounds);
    }
    Ok(i as usize)
}

/// The container read protocol: `v[keys...]`.
pub fn index_get(cont: &Value, keys: &[Value]) -> CalcResult {
    match cont {
        Value::List(l) => {
            if keys.len() != 1 {
                return Err(CalcError::ShapeMismatch("list index takes one key".into()));
            }
            let i = key_to_index(&keys[0], l.len())?;
            Ok(l.get(i).cloned().unwrap_or(Value::Null))
        }
        Value::Mat(m) => {
            let idx = keys
                .iter()
                .map(|k| k.expect_int("index"))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(m.get(&idx)?.clone())
        }
        Value::Map(a) => {
            let k = KeyTuple::new(keys.to_vec())?;
            Ok(a.get(&k).cloned().unwrap_or(Value::Null))
        }
        Value::Str(b) | Value::Block(b) => {
            if keys.len() != 1 {
                return Err(CalcError::ShapeMismatch("byte index takes one key".into()));
            }
            let i = key_to_index(&keys[0], b.len())?;
            Ok(Value::from_i64(b[i] as i64))
        }
        _ => Err(CalcError::TypeMismatchOne("[]", cont.type_name())),
    }
}

/// The container write protocol: `v[keys...] = val`. Mutates through
/// copy-on-write; the caller stores the container back into its slot.
pub fn index_set(cont: &mut Value, keys: &[Value], val: Value) -> Result<(), CalcError> {
    match cont {
        Value::List(l) => {
            if keys.len() != 1 {
                return Err(CalcError::ShapeMismatch("list index takes one key".into()));
            }
            let i = key_to_index(&keys[0], l.len())?;
            Rc::make_mut(l).set(i, val)
        }
        Value::Mat(m) => {
            let idx = keys
                .iter()
                .map(|k| k.expect_int("index"))
                .collect::<Result<Vec<_>, _>>()?;
            Rc::make_mut(m).set(&idx, val)
        }
        Value::Map(a) => {
            let k = KeyTuple::new(keys.to_vec())?;
            Rc::make_mut(a).insert(k, val);
            Ok(())
        }
        Value::Str(b) | Value::Block(b) => {
            if keys.len() != 1 {
                return Err(CalcError::ShapeMismatch("byte index takes one key".into()));
            }
            let i = key_to_index(&keys[0], b.len())?;
            let byte = val.expect_int("byte")?;
            let byte = byte
                .to_u8()
                .ok_or_else(|| CalcError::InvalidArg("byte", byte.to_string()))?;
            Rc::make_mut(b)[i] = byte;
            Ok(())
        }
        _ => Err(CalcError::TypeMismatchOne("[]", cont.type_name())),
    }
}

impl fmt::Display for Value {
    /// Plain representation independent of the configuration; the
    /// display module renders the configured form.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Num(q) => {
                if q.is_integer() {
                    write!(f, "{}", q.numer())
                } else {
                    write!(f, "{}/{}", q.numer(), q.denom())
                }
            }
            Value::Cplx(c) => {
                let im = &c.im;
                if im.is_negative() {
                    write!(
                        f,
                        "{}-{}i",
                        Value::Num(c.re.clone()),
                        Value::Num(-im.clone())
                    )
                } else {
                    write!(f, "{}+{}i", Value::Num(c.re.clone()), Value::Num(im.clone()))
                }
            }
            Value::Str(s) => write!(f, "\"{}\"", String::from_utf8_lossy(s)),
            Value::List(l) => {
                write!(f, "list(")?;
                for (i, e) in l.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", e)?;
                }
                write!(f, ")")
            }
            Value::Mat(m) => write!(f, "mat[{}]", m.size()),
            Value::Map(a) => write!(f, "assoc({})", a.len()),
            Value::Obj(o) => write!(f, "obj#{}", o.type_id),
            Value::File(fid) => write!(f, "file({})", fid),
            Value::Block(b) => write!(f, "block({})", b.len()),
            Value::Rand(_) => write!(f, "randstate"),
            Value::Err(e) => write!(f, "error({})", e.code),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> Config {
        Config::default()
    }

    fn n(i: i64) -> Value {
        Value::from_i64(i)
    }

    fn r(a: i64, b: i64) -> Value {
        Value::from_ratio(a, b)
    }

    #[test]
    fn rational_arithmetic_stays_exact() {
        let c = cfg();
        assert_eq!(binop(BinOp::Add, r(1, 3), r(1, 6), &c).unwrap(), r(1, 2));
        assert_eq!(binop(BinOp::Sub, n(1), r(1, 3), &c).unwrap(), r(2, 3));
        assert_eq!(binop(BinOp::Mul, r(2, 3), r(3, 4), &c).unwrap(), r(1, 2));
        assert_eq!(binop(BinOp::Div, n(7), n(2), &c).unwrap(), r(7, 2));
    }

    #[test]
    fn division_by_zero_reports() {
        let c = cfg();
        assert_eq!(binop(BinOp::Div, n(1), n(0), &c), Err(CalcError::DivByZero));
    }

    #[test]
    fn quo_and_mod_satisfy_identity() {
        let c = cfg();
        for (a, b) in [(7i64, 3i64), (-7, 3), (7, -3), (-7, -3)] {
            let q = binop(BinOp::Quo, n(a), n(b), &c).unwrap();
            let m = binop(BinOp::Mod, n(a), n(b), &c).unwrap();
            let back = binop(BinOp::Add, binop(BinOp::Mul, q, n(b), &c).unwrap(), m, &c).unwrap();
            assert_eq!(back, n(a));
        }
    }

    #[test]
    fn complex_promotes_and_demotes() {
        let c = cfg();
        let i = Value::Cplx(Cplx::new(
            BigRational::zero(),
            BigRational::from_integer(BigInt::one()),
        ));
        // i * i == -1 demotes to a plain number
        let sq = binop(BinOp::Mul, i.clone(), i.clone(), &c).unwrap();
        assert_eq!(sq, n(-1));
        // 1 + i stays complex
        let s = binop(BinOp::Add, n(1), i, &c).unwrap();
        assert!(matches!(s, Value::Cplx(_)));
    }

    #[test]
    fn power_basics() {
        let c = cfg();
        assert_eq!(binop(BinOp::Pow, n(2), n(10), &c).unwrap(), n(1024));
        assert_eq!(binop(BinOp::Pow, n(2), n(-2), &c).unwrap(), r(1, 4));
        assert_eq!(binop(BinOp::Pow, n(0), n(0), &c).unwrap(), n(1));
        assert_eq!(
            binop(BinOp::Pow, n(0), n(-1), &c),
            Err(CalcError::PowZeroNeg)
        );
    }

    #[test]
    fn string_concat_and_compare() {
        let c = cfg();
        let ab = binop(
            BinOp::Add,
            Value::str_from("foo"),
            Value::str_from("bar"),
            &c,
        )
        .unwrap();
        assert_eq!(ab, Value::str_from("foobar"));
        assert_eq!(
            binop(BinOp::Lt, Value::str_from("abc"), Value::str_from("abd"), &c).unwrap(),
            n(1)
        );
        assert!(binop(BinOp::Mul, Value::str_from("a"), n(2), &c).is_err());
    }

    #[test]
    fn bitwise_needs_integers() {
        let c = cfg();
        assert_eq!(binop(BinOp::And, n(12), n(10), &c).unwrap(), n(8));
        assert_eq!(binop(BinOp::Or, n(12), n(10), &c).unwrap(), n(14));
        assert_eq!(binop(BinOp::Xor, n(12), n(10), &c).unwrap(), n(6));
        assert!(binop(BinOp::And, r(1, 2), n(1), &c).is_err());
    }

    #[test]
    fn shifts_and_negative_amounts() {
        let c = cfg();
        assert_eq!(binop(BinOp::Shl, n(3), n(4), &c).unwrap(), n(48));
        assert_eq!(binop(BinOp::Shr, n(48), n(4), &c).unwrap(), n(3));
        assert_eq!(binop(BinOp::Shl, n(48), n(-4), &c).unwrap(), n(3));
    }

    #[test]
    fn comparisons_on_mixed_tags_fail() {
        let c = cfg();
        assert!(binop(BinOp::Lt, n(1), Value::str_from("x"), &c).is_err());
        // equality never fails, it just answers no
        assert_eq!(
            binop(BinOp::Eq, n(1), Value::str_from("x"), &c).unwrap(),
            n(0)
        );
    }

    #[test]
    fn unary_ops() {
        let c = cfg();
        assert_eq!(unop(UnOp::Neg, r(1, 2), &c).unwrap(), r(-1, 2));
        assert_eq!(unop(UnOp::LNot, n(0), &c).unwrap(), n(1));
        assert_eq!(unop(UnOp::LNot, n(5), &c).unwrap(), n(0));
        assert_eq!(unop(UnOp::BitNot, n(5), &c).unwrap(), n(-6));
        assert!(unop(UnOp::Neg, Value::str_from("x"), &c).is_err());
    }

    #[test]
    fn value_semantics_on_containers() {
        let mut v = Value::List(Rc::new(List::from_vec(vec![n(1), n(2)])));
        let w = v.clone();
        index_set(&mut v, &[n(0)], n(99)).unwrap();
        // the copy is untouched
        assert_eq!(index_get(&w, &[n(0)]).unwrap(), n(1));
        assert_eq!(index_get(&v, &[n(0)]).unwrap(), n(99));
    }

    #[test]
    fn assoc_autovivifies_on_write_only() {
        let mut m = Value::Map(Rc::new(Assoc::new()));
        assert_eq!(index_get(&m, &[n(5)]).unwrap(), Value::Null);
        index_set(&mut m, &[n(5)], n(50)).unwrap();
        assert_eq!(index_get(&m, &[n(5)]).unwrap(), n(50));
        assert_eq!(m.size(), 1);
    }

    #[test]
    fn block_bytes() {
        let mut b = Value::Block(Rc::new(vec![0u8; 4]));
        index_set(&mut b, &[n(2)], n(200)).unwrap();
        assert_eq!(index_get(&b, &[n(2)]).unwrap(), n(200));
        assert!(index_set(&mut b, &[n(2)], n(300)).is_err());
        assert!(index_set(&mut b, &[n(9)], n(1)).is_err());
    }

    #[test]
    fn abs_inv_conj() {
        let c = cfg();
        assert_eq!(abs_val(&n(-5), &c).unwrap(), n(5));
        assert_eq!(inv_val(&r(2, 3)).unwrap(), r(3, 2));
        assert!(inv_val(&n(0)).is_err());
        let z = Value::Cplx(Cplx::new(
            BigRational::from_integer(BigInt::from(3)),
            BigRational::from_integer(BigInt::from(4)),
        ));
        assert_eq!(abs_val(&z, &c).unwrap(), n(5));
        let cj = conj_val(&z).unwrap();
        match cj {
            Value::Cplx(c) => assert_eq!(c.im, BigRational::from_integer(BigInt::from(-4))),
            _ => panic!(),
        }
    }
}
