//! The builtin function table. The compiler resolves builtin calls to
//! table ids at compile time (`CallBuiltin id argc`) after checking
//! the argument count against the registered arity.

use std::collections::HashMap;
use std::rc::Rc;

use lazy_static::lazy_static;
use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::{One, Signed, ToPrimitive, Zero};

use crate::assoc::{Assoc, KeyTuple};
use crate::cplx;
use crate::display;
use crate::engine::Engine;
use crate::errors::{describe_code, CalcError, CalcResult};
use crate::list::List;
use crate::qmath;
use crate::randstate::Randstate;
use crate::round::Round;
use crate::transc;
use crate::value::{self, Value};
use crate::zmath;

pub type BFn = fn(&mut Engine, Vec<Value>) -> CalcResult;

pub struct BuiltinDef {
    pub name: &'static str,
    pub min_args: usize,
    pub max_args: usize,
    pub func: BFn,
}

const MANY: usize = usize::MAX;

macro_rules! table {
    ($(($name:expr, $min:expr, $max:expr, $f:expr)),* $(,)?) => {
        vec![ $( BuiltinDef { name: $name, min_args: $min, max_args: $max, func: $f } ),* ]
    };
}

lazy_static! {
    pub static ref BUILTINS: Vec<BuiltinDef> = table![
        ("abs", 1, 2, b_abs),
        ("append", 2, MANY, b_append),
        ("appr", 1, 3, b_appr),
        ("assoc", 0, 0, b_assoc),
        ("atan", 1, 2, b_atan),
        ("atan2", 2, 3, b_atan2),
        ("bern", 1, 1, b_bern),
        ("bit", 2, 2, b_bit),
        ("blk", 1, 1, b_blk),
        ("ceil", 1, 1, b_ceil),
        ("cfappr", 1, 2, b_cfappr),
        ("char", 1, 1, b_char),
        ("cmp", 2, 2, b_cmp),
        ("config", 1, 2, b_config),
        ("conj", 1, 1, b_conj),
        ("cos", 1, 2, b_cos),
        ("delete", 2, MANY, b_delete),
        ("den", 1, 1, b_den),
        ("det", 1, 1, b_det),
        ("epsilon", 0, 1, b_epsilon),
        ("euler", 1, 1, b_euler),
        ("exp", 1, 2, b_exp),
        ("fact", 1, 1, b_fact),
        ("factor", 1, 1, b_factor),
        ("fclose", 1, 1, b_fclose),
        ("fflush", 1, 1, b_fflush),
        ("fgets", 1, 1, b_fgets),
        ("fib", 1, 1, b_fib),
        ("floor", 1, 1, b_floor),
        ("fopen", 2, 2, b_fopen),
        ("fputs", 2, MANY, b_fputs),
        ("frac", 1, 1, b_frac),
        ("gcd", 1, MANY, b_gcd),
        ("head", 1, 1, b_head),
        ("im", 1, 1, b_im),
        ("insert", 3, 3, b_insert),
        ("int", 1, 1, b_int),
        ("inv", 1, 1, b_inverse),
        ("inverse", 1, 1, b_inverse),
        ("isassoc", 1, 1, b_isassoc),
        ("isblk", 1, 1, b_isblk),
        ("isfile", 1, 1, b_isfile),
        ("isint", 1, 1, b_isint),
        ("islist", 1, 1, b_islist),
        ("ismat", 1, 1, b_ismat),
        ("isnull", 1, 1, b_isnull),
        ("isnum", 1, 1, b_isnum),
        ("isobj", 1, 1, b_isobj),
        ("isqrt", 1, 1, b_isqrt),
        ("isrand", 1, 1, b_isrand),
        ("isreal", 1, 1, b_isreal),
        ("issq", 1, 1, b_issq),
        ("isstr", 1, 1, b_isstr),
        ("jacobi", 2, 2, b_jacobi),
        ("keys", 1, 1, b_keys),
        ("lcm", 1, MANY, b_lcm),
        ("ln", 1, 2, b_ln),
        ("matdim", 1, 1, b_matdim),
        ("matfill", 2, 2, b_matfill),
        ("matmax", 2, 2, b_matmax),
        ("matmin", 2, 2, b_matmin),
        ("mattrans", 1, 1, b_mattrans),
        ("max", 1, MANY, b_max),
        ("min", 1, MANY, b_min),
        ("minv", 2, 2, b_minv),
        ("mod", 2, 3, b_mod),
        ("nextcand", 1, 2, b_nextcand),
        ("norm", 1, 1, b_norm),
        ("num", 1, 1, b_num),
        ("ord", 1, 1, b_ord),
        ("pi", 0, 1, b_pi),
        ("pmod", 3, 3, b_pmod),
        ("popcnt", 1, 1, b_popcnt),
        ("power", 2, 3, b_power),
        ("prevcand", 1, 2, b_prevcand),
        ("ptest", 1, 2, b_ptest),
        ("push", 2, MANY, b_push),
        ("quo", 2, 3, b_quo),
        ("quomod", 2, 3, b_quomod),
        ("rand", 0, 2, b_rand),
        ("re", 1, 1, b_re),
        ("root", 2, 3, b_root),
        ("round", 1, 2, b_round),
        ("rsearch", 2, 2, b_rsearch),
        ("search", 2, 2, b_search),
        ("sgn", 1, 1, b_sgn),
        ("sin", 1, 2, b_sin),
        ("size", 1, 1, b_size),
        ("sqr", 1, 1, b_sqr),
        ("sqrt", 1, 2, b_sqrt),
        ("srand", 0, 1, b_srand),
        ("str", 1, 1, b_str),
        ("strcat", 1, MANY, b_strcat),
        ("strerror", 1, 1, b_strerror),
        ("strlen", 1, 1, b_strlen),
        ("substr", 3, 3, b_substr),
        ("tail", 1, 1, b_tail),
        ("tan", 1, 2, b_tan),
        ("version", 0, 0, b_version),
    ];
    static ref INDEX: HashMap<&'static str, usize> = {
        let mut m = HashMap::new();
        for (i, b) in BUILTINS.iter().enumerate() {
            m.insert(b.name, i);
        }
        m
    };
}

pub fn lookup(name: &str) -> Option<(usize, &'static BuiltinDef)> {
    INDEX.get(name).map(|&i| (i, &BUILTINS[i]))
}

pub fn call(id: usize, eng: &mut Engine, args: Vec<Value>) -> CalcResult {
    (BUILTINS[id].func)(eng, args)
}

// ---- helpers --------------------------------------------------------

fn eps_arg(eng: &Engine, args: &[Value], idx: usize) -> Result<BigRational, CalcError> {
    match args.get(idx) {
        None => Ok(eng.config.epsilon.clone()),
        Some(v) => {
            let q = v.expect_num("epsilon")?;
            if !q.is_positive() {
                return Err(CalcError::InvalidArg("epsilon", q.to_string()));
            }
            Ok(q.clone())
        }
    }
}

fn round_arg(args: &[Value], idx: usize, default: Round) -> Result<Round, CalcError> {
    match args.get(idx) {
        None => Ok(default),
        Some(v) => {
            let i = v
                .expect_int("round mode")?
                .to_i64()
                .ok_or(CalcError::Overflow("round mode"))?;
            Round::from_index(i).ok_or(CalcError::InvalidArg("round mode", i.to_string()))
        }
    }
}

fn num_arg<'a>(args: &'a [Value], i: usize, what: &'static str) -> Result<&'a BigRational, CalcError> {
    args[i].expect_num(what)
}

fn int_arg(args: &[Value], i: usize, what: &'static str) -> Result<BigInt, CalcError> {
    args[i].expect_int(what)
}

fn usize_arg(args: &[Value], i: usize, what: &'static str) -> Result<usize, CalcError> {
    args[i].expect_usize(what)
}

fn list_arg<'a>(args: &'a [Value], i: usize, what: &'static str) -> Result<&'a Rc<List>, CalcError> {
    match &args[i] {
        Value::List(l) => Ok(l),
        other => Err(CalcError::TypeMismatchOne(what, other.type_name())),
    }
}

fn mat_arg<'a>(
    args: &'a [Value],
    i: usize,
    what: &'static str,
) -> Result<&'a crate::matrix::Matrix, CalcError> {
    match &args[i] {
        Value::Mat(m) => Ok(m),
        other => Err(CalcError::TypeMismatchOne(what, other.type_name())),
    }
}

fn fid_arg(args: &[Value], i: usize) -> Result<usize, CalcError> {
    match &args[i] {
        Value::File(fid) => Ok(*fid),
        other => Err(CalcError::TypeMismatchOne("file", other.type_name())),
    }
}

// ---- numeric --------------------------------------------------------

fn b_abs(eng: &mut Engine, args: Vec<Value>) -> CalcResult {
    let mut cfg = eng.config.clone();
    if args.len() > 1 {
        cfg.epsilon = eps_arg(eng, &args, 1)?;
    }
    value::abs_val(&args[0], &cfg)
}

fn b_sgn(_eng: &mut Engine, args: Vec<Value>) -> CalcResult {
    let q = num_arg(&args, 0, "sgn")?;
    Ok(Value::from_i64(match q.cmp(&BigRational::zero()) {
        std::cmp::Ordering::Less => -1,
        std::cmp::Ordering::Equal => 0,
        std::cmp::Ordering::Greater => 1,
    }))
}

fn b_int(_eng: &mut Engine, args: Vec<Value>) -> CalcResult {
    let q = num_arg(&args, 0, "int")?;
    Ok(Value::Num(qmath::int_part(q)))
}

fn b_frac(_eng: &mut Engine, args: Vec<Value>) -> CalcResult {
    let q = num_arg(&args, 0, "frac")?;
    Ok(Value::Num(qmath::frac_part(q)))
}

fn b_num(_eng: &mut Engine, args: Vec<Value>) -> CalcResult {
    let q = num_arg(&args, 0, "num")?;
    Ok(Value::from_z(q.numer().clone()))
}

fn b_den(_eng: &mut Engine, args: Vec<Value>) -> CalcResult {
    let q = num_arg(&args, 0, "den")?;
    Ok(Value::from_z(q.denom().clone()))
}

fn b_ceil(_eng: &mut Engine, args: Vec<Value>) -> CalcResult {
    let q = num_arg(&args, 0, "ceil")?;
    Ok(Value::Num(q.ceil()))
}

fn b_floor(_eng: &mut Engine, args: Vec<Value>) -> CalcResult {
    let q = num_arg(&args, 0, "floor")?;
    Ok(Value::Num(q.floor()))
}

fn b_round(eng: &mut Engine, args: Vec<Value>) -> CalcResult {
    let q = num_arg(&args, 0, "round")?;
    let places = match args.get(1) {
        None => 0u32,
        Some(v) => v
            .expect_int("round")?
            .to_u32()
            .ok_or(CalcError::Overflow("round"))?,
    };
    let grid = BigRational::new(BigInt::one(), qmath::pow10(places));
    Ok(Value::Num(qmath::appr(q, &grid, eng.config.outround)?))
}

fn b_cmp(_eng: &mut Engine, args: Vec<Value>) -> CalcResult {
    use std::cmp::Ordering;
    let ord = match (&args[0], &args[1]) {
        (Value::Num(a), Value::Num(b)) => a.cmp(b),
        (Value::Str(a), Value::Str(b)) => a.cmp(b),
        (a, b) => {
            return Err(CalcError::TypeMismatch("cmp", a.type_name(), b.type_name()))
        }
    };
    Ok(Value::from_i64(match ord {
        Ordering::Less => -1,
        Ordering::Equal => 0,
        Ordering::Greater => 1,
    }))
}

fn b_min(_eng: &mut Engine, args: Vec<Value>) -> CalcResult {
    fold_extreme(args, true)
}

fn b_max(_eng: &mut Engine, args: Vec<Value>) -> CalcResult {
    fold_extreme(args, false)
}

fn fold_extreme(args: Vec<Value>, want_min: bool) -> CalcResult {
    let mut best: Option<BigRational> = None;
    for a in &args {
        let q = a.expect_num(if want_min { "min" } else { "max" })?;
        best = Some(match best {
            None => q.clone(),
            Some(b) => {
                if (q < &b) == want_min {
                    q.clone()
                } else {
                    b
                }
            }
        });
    }
    Ok(Value::Num(best.unwrap()))
}

fn b_quo(eng: &mut Engine, args: Vec<Value>) -> CalcResult {
    let a = num_arg(&args, 0, "quo")?;
    let b = num_arg(&args, 1, "quo")?;
    let mode = round_arg(&args, 2, eng.config.quo)?;
    Ok(Value::Num(qmath::quo(a, b, mode)?))
}

fn b_mod(eng: &mut Engine, args: Vec<Value>) -> CalcResult {
    let a = num_arg(&args, 0, "mod")?;
    let b = num_arg(&args, 1, "mod")?;
    let mode = round_arg(&args, 2, eng.config.modulo)?;
    Ok(Value::Num(qmath::modulo(a, b, mode)?))
}

fn b_quomod(eng: &mut Engine, args: Vec<Value>) -> CalcResult {
    let a = num_arg(&args, 0, "quomod")?;
    let b = num_arg(&args, 1, "quomod")?;
    let mode = round_arg(&args, 2, eng.config.quomod)?;
    let (q, r) = qmath::quomod(a, b, mode)?;
    Ok(Value::List(Rc::new(List::from_vec(vec![
        Value::Num(q),
        Value::Num(r),
    ]))))
}

fn b_appr(eng: &mut Engine, args: Vec<Value>) -> CalcResult {
    let x = num_arg(&args, 0, "appr")?;
    let eps = eps_arg(eng, &args, 1)?;
    let mode = round_arg(&args, 2, eng.config.appr)?;
    Ok(Value::Num(qmath::appr(x, &eps, mode)?))
}

fn b_cfappr(eng: &mut Engine, args: Vec<Value>) -> CalcResult {
    let x = num_arg(&args, 0, "cfappr")?;
    let limit = match args.get(1) {
        Some(v) => v.expect_int("cfappr")?,
        // default: denominators up to 1/epsilon
        None => {
            let e = &eng.config.epsilon;
            e.denom() / e.numer()
        }
    };
    Ok(Value::Num(qmath::cfappr(x, &limit)?))
}

// ---- integer kernel -------------------------------------------------

fn b_gcd(_eng: &mut Engine, args: Vec<Value>) -> CalcResult {
    use num_integer::Integer;
    let mut acc = BigInt::zero();
    for a in &args {
        acc = acc.gcd(&a.expect_int("gcd")?);
    }
    Ok(Value::from_z(acc))
}

fn b_lcm(_eng: &mut Engine, args: Vec<Value>) -> CalcResult {
    use num_integer::Integer;
    let mut acc = BigInt::one();
    for a in &args {
        let v = a.expect_int("lcm")?;
        if v.is_zero() {
            return Ok(Value::from_i64(0));
        }
        acc = acc.lcm(&v);
    }
    Ok(Value::from_z(acc.abs()))
}

fn b_fact(_eng: &mut Engine, args: Vec<Value>) -> CalcResult {
    Ok(Value::from_z(zmath::fact(&int_arg(&args, 0, "fact")?)?))
}

fn b_fib(_eng: &mut Engine, args: Vec<Value>) -> CalcResult {
    Ok(Value::from_z(zmath::fib(&int_arg(&args, 0, "fib")?)?))
}

fn b_isqrt(_eng: &mut Engine, args: Vec<Value>) -> CalcResult {
    Ok(Value::from_z(zmath::isqrt(&int_arg(&args, 0, "isqrt")?)?))
}

fn b_issq(_eng: &mut Engine, args: Vec<Value>) -> CalcResult {
    let n = int_arg(&args, 0, "issq")?;
    Ok(Value::bool_val(zmath::is_square(&n).is_some()))
}

fn b_jacobi(_eng: &mut Engine, args: Vec<Value>) -> CalcResult {
    let a = int_arg(&args, 0, "jacobi")?;
    let b = int_arg(&args, 1, "jacobi")?;
    Ok(Value::from_i64(zmath::jacobi(&a, &b)? as i64))
}

fn b_pmod(_eng: &mut Engine, args: Vec<Value>) -> CalcResult {
    let a = int_arg(&args, 0, "pmod")?;
    let e = int_arg(&args, 1, "pmod")?;
    let m = int_arg(&args, 2, "pmod")?;
    Ok(Value::from_z(zmath::powmod(&a, &e, &m)?))
}

fn b_minv(_eng: &mut Engine, args: Vec<Value>) -> CalcResult {
    let a = int_arg(&args, 0, "minv")?;
    let m = int_arg(&args, 1, "minv")?;
    Ok(Value::from_z(zmath::modinverse(&a, &m)?))
}

const DEFAULT_WITNESSES: usize = 10;

fn witness_arg(args: &[Value], i: usize) -> Result<usize, CalcError> {
    match args.get(i) {
        None => Ok(DEFAULT_WITNESSES),
        Some(v) => v.expect_usize("witness count"),
    }
}

fn b_ptest(eng: &mut Engine, args: Vec<Value>) -> CalcResult {
    let n = int_arg(&args, 0, "ptest")?;
    let k = witness_arg(&args, 1)?;
    Ok(Value::bool_val(zmath::ptest(&n, k, &mut eng.rand)))
}

fn b_nextcand(eng: &mut Engine, args: Vec<Value>) -> CalcResult {
    let n = int_arg(&args, 0, "nextcand")?;
    let k = witness_arg(&args, 1)?;
    Ok(Value::from_z(zmath::nextcand(&n, k, &mut eng.rand)))
}

fn b_prevcand(eng: &mut Engine, args: Vec<Value>) -> CalcResult {
    let n = int_arg(&args, 0, "prevcand")?;
    let k = witness_arg(&args, 1)?;
    match zmath::prevcand(&n, k, &mut eng.rand) {
        Some(p) => Ok(Value::from_z(p)),
        None => Ok(Value::Null),
    }
}

fn b_factor(eng: &mut Engine, args: Vec<Value>) -> CalcResult {
    let n = int_arg(&args, 0, "factor")?;
    Ok(Value::from_z(zmath::factor(&n, &mut eng.rand)?))
}

fn b_popcnt(_eng: &mut Engine, args: Vec<Value>) -> CalcResult {
    let n = int_arg(&args, 0, "popcnt")?;
    Ok(Value::from_i64(zmath::popcount(&n) as i64))
}

fn b_bit(_eng: &mut Engine, args: Vec<Value>) -> CalcResult {
    let n = int_arg(&args, 0, "bit")?;
    let i = int_arg(&args, 1, "bit")?
        .to_u64()
        .ok_or(CalcError::Overflow("bit"))?;
    Ok(Value::bool_val(zmath::bit_test(&n, i)?))
}

// ---- transcendentals ------------------------------------------------

fn b_sqrt(eng: &mut Engine, args: Vec<Value>) -> CalcResult {
    let eps = eps_arg(eng, &args, 1)?;
    match &args[0] {
        Value::Num(q) if !q.is_negative() => {
            let quarter = &eps / BigRational::from_integer(BigInt::from(4));
            let r = transc::sqrt_q(q, &quarter)?;
            if &(&r * &r) == q {
                return Ok(Value::Num(r));
            }
            let grid = &eps / BigRational::from_integer(BigInt::from(2));
            Ok(Value::Num(qmath::appr(&r, &grid, eng.config.sqrt)?))
        }
        Value::Num(q) => {
            let z = cplx::Cplx::new(q.clone(), BigRational::zero());
            Ok(Value::from_cplx(cplx::sqrt_c(&z, &eps)?))
        }
        Value::Cplx(z) => Ok(Value::from_cplx(cplx::sqrt_c(z, &eps)?)),
        other => Err(CalcError::TypeMismatchOne("sqrt", other.type_name())),
    }
}

fn b_root(eng: &mut Engine, args: Vec<Value>) -> CalcResult {
    let x = num_arg(&args, 0, "root")?;
    let k = int_arg(&args, 1, "root")?;
    let eps = eps_arg(eng, &args, 2)?;
    Ok(Value::Num(transc::root_q(x, &k, &eps)?))
}

fn b_exp(eng: &mut Engine, args: Vec<Value>) -> CalcResult {
    let eps = eps_arg(eng, &args, 1)?;
    match &args[0] {
        Value::Num(q) => Ok(Value::Num(transc::exp_q(q, &eps)?)),
        Value::Cplx(z) => Ok(Value::from_cplx(cplx::exp_c(z, &eps)?)),
        other => Err(CalcError::TypeMismatchOne("exp", other.type_name())),
    }
}

fn b_ln(eng: &mut Engine, args: Vec<Value>) -> CalcResult {
    let eps = eps_arg(eng, &args, 1)?;
    match &args[0] {
        Value::Num(q) if q.is_positive() => Ok(Value::Num(transc::ln_q(q, &eps)?)),
        Value::Num(q) => {
            let z = cplx::Cplx::new(q.clone(), BigRational::zero());
            Ok(Value::from_cplx(cplx::ln_c(&z, &eps)?))
        }
        Value::Cplx(z) => Ok(Value::from_cplx(cplx::ln_c(z, &eps)?)),
        other => Err(CalcError::TypeMismatchOne("ln", other.type_name())),
    }
}

fn b_sin(eng: &mut Engine, args: Vec<Value>) -> CalcResult {
    let eps = eps_arg(eng, &args, 1)?;
    match &args[0] {
        Value::Num(q) => Ok(Value::Num(transc::sin_q(q, &eps)?)),
        Value::Cplx(z) => Ok(Value::from_cplx(cplx::sin_c(z, &eps)?)),
        other => Err(CalcError::TypeMismatchOne("sin", other.type_name())),
    }
}

fn b_cos(eng: &mut Engine, args: Vec<Value>) -> CalcResult {
    let eps = eps_arg(eng, &args, 1)?;
    match &args[0] {
        Value::Num(q) => Ok(Value::Num(transc::cos_q(q, &eps)?)),
        Value::Cplx(z) => Ok(Value::from_cplx(cplx::cos_c(z, &eps)?)),
        other => Err(CalcError::TypeMismatchOne("cos", other.type_name())),
    }
}

fn b_tan(eng: &mut Engine, args: Vec<Value>) -> CalcResult {
    let x = num_arg(&args, 0, "tan")?;
    let eps = eps_arg(eng, &args, 1)?;
    Ok(Value::Num(transc::tan_q(x, &eps)?))
}

fn b_atan(eng: &mut Engine, args: Vec<Value>) -> CalcResult {
    let x = num_arg(&args, 0, "atan")?;
    let eps = eps_arg(eng, &args, 1)?;
    Ok(Value::Num(transc::atan_q(x, &eps)?))
}

fn b_atan2(eng: &mut Engine, args: Vec<Value>) -> CalcResult {
    let y = num_arg(&args, 0, "atan2")?;
    let x = num_arg(&args, 1, "atan2")?;
    let eps = eps_arg(eng, &args, 2)?;
    Ok(Value::Num(transc::atan2_q(y, x, &eps)?))
}

fn b_pi(eng: &mut Engine, args: Vec<Value>) -> CalcResult {
    let eps = eps_arg(eng, &args, 0)?;
    Ok(Value::Num(eng.cache.pi(&eps)?))
}

fn b_power(eng: &mut Engine, args: Vec<Value>) -> CalcResult {
    let eps = eps_arg(eng, &args, 2)?;
    match (&args[0], &args[1]) {
        (Value::Num(x), Value::Num(y)) => Ok(Value::from_demoted(cplx::pow_qq(x, y, &eps)?)),
        (Value::Cplx(..) | Value::Num(..), Value::Cplx(..))
        | (Value::Cplx(..), Value::Num(..)) => {
            let z = as_cplx(&args[0]);
            let w = as_cplx(&args[1]);
            Ok(Value::from_demoted(cplx::pow_cc(&z, &w, &eps)?))
        }
        (a, b) => Err(CalcError::TypeMismatch("power", a.type_name(), b.type_name())),
    }
}

fn as_cplx(v: &Value) -> cplx::Cplx {
    match v {
        Value::Num(q) => cplx::Cplx::new(q.clone(), BigRational::zero()),
        Value::Cplx(c) => c.clone(),
        _ => cplx::Cplx::new(BigRational::zero(), BigRational::zero()),
    }
}

fn b_bern(eng: &mut Engine, args: Vec<Value>) -> CalcResult {
    let n = usize_arg(&args, 0, "bern")?;
    if n > 2000 {
        return Err(CalcError::Overflow("bern"));
    }
    Ok(Value::Num(eng.cache.bernoulli(n)))
}

fn b_euler(eng: &mut Engine, args: Vec<Value>) -> CalcResult {
    let n = usize_arg(&args, 0, "euler")?;
    if n > 2000 {
        return Err(CalcError::Overflow("euler"));
    }
    Ok(Value::Num(eng.cache.euler(n)))
}

// ---- complex parts --------------------------------------------------

fn b_re(_eng: &mut Engine, args: Vec<Value>) -> CalcResult {
    match &args[0] {
        Value::Num(..) => Ok(args[0].clone()),
        Value::Cplx(c) => Ok(Value::Num(c.re.clone())),
        other => Err(CalcError::TypeMismatchOne("re", other.type_name())),
    }
}

fn b_im(_eng: &mut Engine, args: Vec<Value>) -> CalcResult {
    match &args[0] {
        Value::Num(..) => Ok(Value::from_i64(0)),
        Value::Cplx(c) => Ok(Value::Num(c.im.clone())),
        other => Err(CalcError::TypeMismatchOne("im", other.type_name())),
    }
}

fn b_conj(_eng: &mut Engine, args: Vec<Value>) -> CalcResult {
    value::conj_val(&args[0])
}

fn b_norm(_eng: &mut Engine, args: Vec<Value>) -> CalcResult {
    match &args[0] {
        Value::Num(q) => Ok(Value::Num(q * q)),
        Value::Cplx(c) => Ok(Value::Num(&c.re * &c.re + &c.im * &c.im)),
        other => Err(CalcError::TypeMismatchOne("norm", other.type_name())),
    }
}

fn b_sqr(_eng: &mut Engine, args: Vec<Value>) -> CalcResult {
    match &args[0] {
        Value::Num(q) => Ok(Value::Num(q * q)),
        Value::Cplx(c) => Ok(Value::from_cplx(c * c)),
        other => Err(CalcError::TypeMismatchOne("sqr", other.type_name())),
    }
}

// ---- predicates -----------------------------------------------------

macro_rules! predicate {
    ($f:ident, $pat:pat) => {
        fn $f(_eng: &mut Engine, args: Vec<Value>) -> CalcResult {
            Ok(Value::bool_val(matches!(&args[0], $pat)))
        }
    };
}

predicate!(b_isnull, Value::Null);
predicate!(b_isnum, Value::Num(..) | Value::Cplx(..));
predicate!(b_isreal, Value::Num(..));
predicate!(b_isstr, Value::Str(..));
predicate!(b_islist, Value::List(..));
predicate!(b_ismat, Value::Mat(..));
predicate!(b_isassoc, Value::Map(..));
predicate!(b_isobj, Value::Obj(..));
predicate!(b_isfile, Value::File(..));
predicate!(b_isblk, Value::Block(..));
predicate!(b_isrand, Value::Rand(..));

fn b_isint(_eng: &mut Engine, args: Vec<Value>) -> CalcResult {
    Ok(Value::bool_val(matches!(
        &args[0],
        Value::Num(q) if q.is_integer()
    )))
}

// ---- containers -----------------------------------------------------

fn b_size(_eng: &mut Engine, args: Vec<Value>) -> CalcResult {
    Ok(Value::from_i64(args[0].size() as i64))
}

fn b_assoc(_eng: &mut Engine, _args: Vec<Value>) -> CalcResult {
    Ok(Value::Map(Rc::new(Assoc::new())))
}

const MAX_BLOCK: usize = 1 << 24;

fn b_blk(_eng: &mut Engine, args: Vec<Value>) -> CalcResult {
    let n = usize_arg(&args, 0, "blk")?;
    if n > MAX_BLOCK {
        return Err(CalcError::Overflow("blk"));
    }
    Ok(Value::Block(Rc::new(vec![0u8; n])))
}

fn b_push(_eng: &mut Engine, mut args: Vec<Value>) -> CalcResult {
    let rest = args.split_off(1);
    let mut l = match args.into_iter().next().unwrap() {
        Value::List(l) => l,
        other => return Err(CalcError::TypeMismatchOne("push", other.type_name())),
    };
    let lm = Rc::make_mut(&mut l);
    for v in rest {
        lm.push_front(v);
    }
    Ok(Value::List(l))
}

fn b_append(_eng: &mut Engine, mut args: Vec<Value>) -> CalcResult {
    let rest = args.split_off(1);
    let mut l = match args.into_iter().next().unwrap() {
        Value::List(l) => l,
        other => return Err(CalcError::TypeMismatchOne("append", other.type_name())),
    };
    let lm = Rc::make_mut(&mut l);
    for v in rest {
        lm.push_back(v);
    }
    Ok(Value::List(l))
}

fn b_insert(_eng: &mut Engine, mut args: Vec<Value>) -> CalcResult {
    let v = args.pop().unwrap();
    let i = usize_arg(&args, 1, "insert")?;
    let mut l = match args.into_iter().next().unwrap() {
        Value::List(l) => l,
        other => return Err(CalcError::TypeMismatchOne("insert", other.type_name())),
    };
    Rc::make_mut(&mut l).insert(i, v)?;
    Ok(Value::List(l))
}

fn b_delete(_eng: &mut Engine, mut args: Vec<Value>) -> CalcResult {
    let keys = args.split_off(1);
    match args.into_iter().next().unwrap() {
        Value::List(mut l) => {
            if keys.len() != 1 {
                return Err(CalcError::ShapeMismatch("delete takes one list index".into()));
            }
            let i = keys[0].expect_usize("delete")?;
            Rc::make_mut(&mut l).remove(i)?;
            Ok(Value::List(l))
        }
        Value::Map(mut m) => {
            let k = KeyTuple::new(keys)?;
            Rc::make_mut(&mut m).remove(&k);
            Ok(Value::Map(m))
        }
        other => Err(CalcError::TypeMismatchOne("delete", other.type_name())),
    }
}

fn b_head(_eng: &mut Engine, args: Vec<Value>) -> CalcResult {
    let l = list_arg(&args, 0, "head")?;
    Ok(l.get(0).cloned().unwrap_or(Value::Null))
}

fn b_tail(_eng: &mut Engine, args: Vec<Value>) -> CalcResult {
    let l = list_arg(&args, 0, "tail")?;
    if l.is_empty() {
        return Ok(Value::Null);
    }
    Ok(l.get(l.len() - 1).cloned().unwrap_or(Value::Null))
}

/// The keys of an association, one list entry per key tuple; order is
/// whatever the map yields this run.
fn b_keys(_eng: &mut Engine, args: Vec<Value>) -> CalcResult {
    match &args[0] {
        Value::Map(a) => {
            let mut out = Vec::with_capacity(a.len());
            for (k, _) in a.iter() {
                let parts = k.parts();
                if parts.len() == 1 {
                    out.push(parts[0].clone());
                } else {
                    out.push(Value::List(Rc::new(List::from_vec(parts.to_vec()))));
                }
            }
            Ok(Value::List(Rc::new(List::from_vec(out))))
        }
        other => Err(CalcError::TypeMismatchOne("keys", other.type_name())),
    }
}

fn b_search(_eng: &mut Engine, args: Vec<Value>) -> CalcResult {
    match &args[0] {
        Value::List(l) => Ok(match l.search(&args[1]) {
            Some(i) => Value::from_i64(i as i64),
            None => Value::Null,
        }),
        Value::Str(s) => {
            let needle = args[1].expect_str("search")?;
            let hay = String::from_utf8_lossy(s);
            Ok(match hay.find(&needle) {
                Some(i) => Value::from_i64(i as i64),
                None => Value::Null,
            })
        }
        other => Err(CalcError::TypeMismatchOne("search", other.type_name())),
    }
}

fn b_rsearch(_eng: &mut Engine, args: Vec<Value>) -> CalcResult {
    match &args[0] {
        Value::List(l) => Ok(match l.rsearch(&args[1]) {
            Some(i) => Value::from_i64(i as i64),
            None => Value::Null,
        }),
        other => Err(CalcError::TypeMismatchOne("rsearch", other.type_name())),
    }
}

// ---- matrices -------------------------------------------------------

fn b_det(eng: &mut Engine, args: Vec<Value>) -> CalcResult {
    let m = mat_arg(&args, 0, "det")?;
    let cfg = eng.config.clone();
    m.det(&cfg)
}

fn b_inverse(eng: &mut Engine, args: Vec<Value>) -> CalcResult {
    match &args[0] {
        Value::Mat(m) => {
            let cfg = eng.config.clone();
            Ok(Value::Mat(Rc::new(m.inverse(&cfg)?)))
        }
        Value::Num(..) | Value::Cplx(..) => value::inv_val(&args[0]),
        other => Err(CalcError::TypeMismatchOne("inverse", other.type_name())),
    }
}

fn b_mattrans(_eng: &mut Engine, args: Vec<Value>) -> CalcResult {
    let m = mat_arg(&args, 0, "mattrans")?;
    Ok(Value::Mat(Rc::new(m.transpose()?)))
}

fn b_matdim(_eng: &mut Engine, args: Vec<Value>) -> CalcResult {
    let m = mat_arg(&args, 0, "matdim")?;
    Ok(Value::from_i64(m.ndim() as i64))
}

fn dim_arg(args: &[Value], m: &crate::matrix::Matrix) -> Result<usize, CalcError> {
    let d = args[1].expect_usize("matdim")?;
    if d < 1 || d > m.ndim() {
        return Err(CalcError::InvalidArg("matdim", d.to_string()));
    }
    Ok(d - 1)
}

fn b_matmin(_eng: &mut Engine, args: Vec<Value>) -> CalcResult {
    let m = mat_arg(&args, 0, "matmin")?;
    let d = dim_arg(&args, m)?;
    Ok(Value::from_i64(m.bounds()[d].0))
}

fn b_matmax(_eng: &mut Engine, args: Vec<Value>) -> CalcResult {
    let m = mat_arg(&args, 0, "matmax")?;
    let d = dim_arg(&args, m)?;
    Ok(Value::from_i64(m.bounds()[d].1))
}

fn b_matfill(_eng: &mut Engine, mut args: Vec<Value>) -> CalcResult {
    let v = args.pop().unwrap();
    let mut m = match args.into_iter().next().unwrap() {
        Value::Mat(m) => m,
        other => return Err(CalcError::TypeMismatchOne("matfill", other.type_name())),
    };
    let mm = Rc::make_mut(&mut m);
    for i in 0..mm.size() {
        mm.set_linear(i, v.clone())?;
    }
    Ok(Value::Mat(m))
}

// ---- strings --------------------------------------------------------

fn b_strlen(_eng: &mut Engine, args: Vec<Value>) -> CalcResult {
    match &args[0] {
        Value::Str(s) => Ok(Value::from_i64(s.len() as i64)),
        other => Err(CalcError::TypeMismatchOne("strlen", other.type_name())),
    }
}

fn b_strcat(_eng: &mut Engine, args: Vec<Value>) -> CalcResult {
    let mut out = Vec::new();
    for a in &args {
        match a {
            Value::Str(s) => out.extend_from_slice(s),
            other => return Err(CalcError::TypeMismatchOne("strcat", other.type_name())),
        }
    }
    Ok(Value::str_from_bytes(out))
}

fn b_substr(_eng: &mut Engine, args: Vec<Value>) -> CalcResult {
    let s = match &args[0] {
        Value::Str(s) => s,
        other => return Err(CalcError::TypeMismatchOne("substr", other.type_name())),
    };
    let start = usize_arg(&args, 1, "substr")?;
    let len = usize_arg(&args, 2, "substr")?;
    let start = start.min(s.len());
    let end = start.saturating_add(len).min(s.len());
    Ok(Value::str_from_bytes(s[start..end].to_vec()))
}

fn b_ord(_eng: &mut Engine, args: Vec<Value>) -> CalcResult {
    match &args[0] {
        Value::Str(s) if !s.is_empty() => Ok(Value::from_i64(s[0] as i64)),
        Value::Str(_) => Err(CalcError::InvalidArg("ord", "empty string".to_string())),
        other => Err(CalcError::TypeMismatchOne("ord", other.type_name())),
    }
}

fn b_char(_eng: &mut Engine, args: Vec<Value>) -> CalcResult {
    let n = int_arg(&args, 0, "char")?;
    let b = n
        .to_u8()
        .ok_or_else(|| CalcError::InvalidArg("char", n.to_string()))?;
    Ok(Value::str_from_bytes(vec![b]))
}

fn b_str(eng: &mut Engine, args: Vec<Value>) -> CalcResult {
    let s = display::format_value(&args[0], &eng.config, eng.objtypes());
    Ok(Value::str_from(&s))
}

fn b_strerror(_eng: &mut Engine, args: Vec<Value>) -> CalcResult {
    match &args[0] {
        Value::Err(e) => match &e.msg {
            Some(m) => Ok(Value::str_from(m)),
            None => Ok(Value::str_from(describe_code(e.code))),
        },
        v => {
            let code = v.expect_int("strerror")?;
            let code = code
                .to_u32()
                .ok_or_else(|| CalcError::InvalidArg("strerror", code.to_string()))?;
            Ok(Value::str_from(describe_code(code)))
        }
    }
}

// ---- random ---------------------------------------------------------

fn b_rand(eng: &mut Engine, args: Vec<Value>) -> CalcResult {
    match args.len() {
        0 => Ok(Value::from_z(BigInt::from(eng.rand.bits64()))),
        1 => {
            let bound = int_arg(&args, 0, "rand")?;
            if !bound.is_positive() {
                return Err(CalcError::InvalidArg("rand", bound.to_string()));
            }
            Ok(Value::from_z(eng.rand.below(&bound)))
        }
        _ => {
            let lo = int_arg(&args, 0, "rand")?;
            let hi = int_arg(&args, 1, "rand")?;
            if hi <= lo {
                return Err(CalcError::InvalidArg("rand", hi.to_string()));
            }
            Ok(Value::from_z(eng.rand.between(&lo, &hi)))
        }
    }
}

fn b_srand(eng: &mut Engine, args: Vec<Value>) -> CalcResult {
    let prev = Value::Rand(Rc::new(eng.rand.clone()));
    match args.first() {
        None => {}
        Some(Value::Rand(r)) => {
            eng.rand = r.as_ref().clone();
        }
        Some(v) => {
            let seed = v.expect_int("srand")?;
            let seed = (&seed & BigInt::from(u64::MAX)).to_u64().unwrap_or(0);
            eng.rand = Randstate::from_seed(seed);
        }
    }
    Ok(prev)
}

// ---- files ----------------------------------------------------------

fn b_fopen(eng: &mut Engine, args: Vec<Value>) -> CalcResult {
    let path = args[0].expect_str("fopen")?;
    let mode = args[1].expect_str("fopen")?;
    let fid = eng.files.open(&path, &mode)?;
    Ok(Value::File(fid))
}

fn b_fclose(eng: &mut Engine, args: Vec<Value>) -> CalcResult {
    let fid = fid_arg(&args, 0)?;
    eng.files.close(fid)?;
    Ok(Value::Null)
}

fn b_fgets(eng: &mut Engine, args: Vec<Value>) -> CalcResult {
    let fid = fid_arg(&args, 0)?;
    match eng.files.read_line(fid)? {
        Some(line) => Ok(Value::str_from_bytes(line)),
        None => Ok(Value::Null),
    }
}

fn b_fputs(eng: &mut Engine, args: Vec<Value>) -> CalcResult {
    let fid = fid_arg(&args, 0)?;
    for a in &args[1..] {
        match a {
            Value::Str(s) => eng.files.write_bytes(fid, s)?,
            other => {
                let s = display::format_value(other, &eng.config, eng.objtypes());
                eng.files.write_bytes(fid, s.as_bytes())?;
            }
        }
    }
    Ok(Value::Null)
}

fn b_fflush(eng: &mut Engine, args: Vec<Value>) -> CalcResult {
    let fid = fid_arg(&args, 0)?;
    eng.files.flush(fid)?;
    Ok(Value::Null)
}

// ---- configuration --------------------------------------------------

fn b_config(eng: &mut Engine, args: Vec<Value>) -> CalcResult {
    let name = args[0].expect_str("config")?;
    match args.get(1) {
        None => eng.config.get(&name),
        Some(v) => eng.config.set(&name, v),
    }
}

fn b_epsilon(eng: &mut Engine, args: Vec<Value>) -> CalcResult {
    let old = Value::Num(eng.config.epsilon.clone());
    if let Some(v) = args.first() {
        let q = v.expect_num("epsilon")?;
        if !q.is_positive() {
            return Err(CalcError::InvalidArg("epsilon", q.to_string()));
        }
        eng.config.epsilon = q.clone();
    }
    Ok(old)
}

fn b_version(_eng: &mut Engine, _args: Vec<Value>) -> CalcResult {
    Ok(Value::str_from(crate::VERSION))
}
