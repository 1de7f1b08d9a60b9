//! Configuration-driven rendering of values.
//!
//! Numeric display consults the configuration on every call: output
//! mode, fractional digit count, print rounding, leading/trailing zero
//! handling, and the tilde prefix marking a decimal that is only an
//! approximation of the exact rational behind it. Containers honor
//! `maxprint`.

use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::{Signed, ToPrimitive, Zero};

use crate::config::{Config, OutMode};
use crate::errors::describe_code;
use crate::object::ObjType;
use crate::qmath;
use crate::round::div_round;
use crate::value::Value;

/// Render a value for output under the current configuration.
/// `types` resolves object type ids to names and field lists.
pub fn format_value(v: &Value, cfg: &Config, types: &[ObjType]) -> String {
    match v {
        Value::Null => "null".to_string(),
        Value::Num(q) => format_num(q, cfg),
        Value::Cplx(c) => {
            let re = format_num(&c.re, cfg);
            let im_abs = format_num(&c.im.abs(), cfg);
            if c.im.is_negative() {
                format!("{}-{}i", re, im_abs)
            } else {
                format!("{}+{}i", re, im_abs)
            }
        }
        Value::Str(s) => String::from_utf8_lossy(s).into_owned(),
        Value::List(l) => {
            let shown: Vec<String> = l
                .iter()
                .take(cfg.maxprint)
                .map(|e| format_value(e, cfg, types))
                .collect();
            let ellipsis = if l.len() > cfg.maxprint { ", ..." } else { "" };
            format!("list({}{})", shown.join(", "), ellipsis)
        }
        Value::Mat(m) => format_matrix(m, cfg, types),
        Value::Map(a) => {
            let mut parts = Vec::new();
            for (k, val) in a.iter().take(cfg.maxprint) {
                let keys: Vec<String> = k
                    .parts()
                    .iter()
                    .map(|kv| format_value(kv, cfg, types))
                    .collect();
                parts.push(format!(
                    "[{}] = {}",
                    keys.join(","),
                    format_value(val, cfg, types)
                ));
            }
            let ellipsis = if a.len() > cfg.maxprint { ", ..." } else { "" };
            format!("assoc({}{})", parts.join(", "), ellipsis)
        }
        Value::Obj(o) => {
            let ty = types.get(o.type_id);
            let name = ty.map(|t| t.name.as_str()).unwrap_or("?");
            let mut parts = Vec::new();
            for (i, f) in o.fields.iter().enumerate() {
                let fname = ty
                    .and_then(|t| t.fields.get(i))
                    .map(|s| s.as_str())
                    .unwrap_or("?");
                parts.push(format!("{} = {}", fname, format_value(f, cfg, types)));
            }
            format!("obj {} {{{}}}", name, parts.join(", "))
        }
        Value::File(fid) => format!("file({})", fid),
        Value::Block(b) => format!("block(len {})", b.len()),
        Value::Rand(_) => "randstate".to_string(),
        Value::Err(e) => match &e.msg {
            Some(m) => format!("error {}: {}", e.code, m),
            None => format!("error {}: {}", e.code, describe_code(e.code)),
        },
    }
}

fn format_matrix(m: &crate::matrix::Matrix, cfg: &Config, types: &[ObjType]) -> String {
    let dims: Vec<String> = m
        .bounds()
        .iter()
        .map(|&(lo, hi)| format!("{}:{}", lo, hi))
        .collect();
    let indent = " ".repeat(cfg.tab as usize);
    let mut elems = Vec::new();
    for i in 0..m.size().min(cfg.maxprint) {
        if let Some(e) = m.get_linear(i) {
            elems.push(format_value(e, cfg, types));
        }
    }
    let ellipsis = if m.size() > cfg.maxprint { ", ..." } else { "" };
    format!(
        "mat[{}]\n{}{{{}{}}}",
        dims.join(","),
        indent,
        elems.join(", "),
        ellipsis
    )
}

/// Format a rational per the configured output mode.
pub fn format_num(q: &BigRational, cfg: &Config) -> String {
    match cfg.mode {
        OutMode::Frac => format_frac(q),
        OutMode::Real => format_real(q, cfg),
        OutMode::Int => format_int(q, cfg),
        OutMode::Exp => format_exp(q, cfg),
        OutMode::Hex => format_radix(q, 16, "0x"),
        OutMode::Oct => format_radix(q, 8, "0o"),
        OutMode::Bin => format_radix(q, 2, "0b"),
        OutMode::Str => format_charcode(q, cfg),
    }
}

fn format_frac(q: &BigRational) -> String {
    if q.is_integer() {
        q.numer().to_string()
    } else {
        format!("{}/{}", q.numer(), q.denom())
    }
}

fn format_int(q: &BigRational, cfg: &Config) -> String {
    if q.is_integer() {
        return q.numer().to_string();
    }
    // rounding cannot fail: the denominator is positive
    let (i, rem) = div_round(q.numer(), q.denom(), cfg.outround).unwrap();
    let tilde = if cfg.tilde && !rem.is_zero() { "~" } else { "" };
    format!("{}{}", tilde, i)
}

fn format_real(q: &BigRational, cfg: &Config) -> String {
    if q.is_integer() && !cfg.fullzero {
        return q.numer().to_string();
    }
    let neg = q.is_negative();
    let a = q.abs();
    let k = cfg.display;
    let scaled = a.numer() * qmath::pow10(k);
    let (d, rem) = div_round(&scaled, a.denom(), cfg.outround).unwrap();
    let exact = rem.is_zero();
    let digits = d.to_string();
    let digits = if digits.len() <= k as usize {
        format!("{}{}", "0".repeat(k as usize + 1 - digits.len()), digits)
    } else {
        digits
    };
    let split = digits.len() - k as usize;
    let int_part = &digits[..split];
    let mut frac_part = digits[split..].to_string();
    if !cfg.fullzero {
        while frac_part.ends_with('0') {
            frac_part.pop();
        }
    }
    let tilde = if !exact && cfg.tilde { "~" } else { "" };
    let sign = if neg { "-" } else { "" };
    let int_shown = if int_part == "0" && !cfg.leadzero {
        ""
    } else {
        int_part
    };
    if frac_part.is_empty() {
        let int_fallback = if int_shown.is_empty() { "0" } else { int_shown };
        format!("{}{}{}", tilde, sign, int_fallback)
    } else {
        format!("{}{}{}.{}", tilde, sign, int_shown, frac_part)
    }
}

// largest e with 10^e <= a, for a > 0
fn dec_exp(a: &BigRational) -> i64 {
    let mut est = a.numer().to_string().len() as i64 - a.denom().to_string().len() as i64;
    let pow = |e: i64| -> BigRational {
        if e >= 0 {
            BigRational::from_integer(qmath::pow10(e as u32))
        } else {
            BigRational::new(BigInt::from(1), qmath::pow10((-e) as u32))
        }
    };
    while pow(est) > *a {
        est -= 1;
    }
    while pow(est + 1) <= *a {
        est += 1;
    }
    est
}

fn format_exp(q: &BigRational, cfg: &Config) -> String {
    if q.is_zero() {
        return "0e0".to_string();
    }
    let neg = q.is_negative();
    let a = q.abs();
    let e = dec_exp(&a);
    let mantissa = if e >= 0 {
        &a / BigRational::from_integer(qmath::pow10(e as u32))
    } else {
        &a * BigRational::from_integer(qmath::pow10((-e) as u32))
    };
    let k = cfg.display;
    let scaled = mantissa.numer() * qmath::pow10(k);
    let (d, rem) = div_round(&scaled, mantissa.denom(), cfg.outround).unwrap();
    let exact = rem.is_zero();
    let digits = d.to_string();
    // mantissa is in [1, 10), so digits has k+1 places
    let (int_part, frac_part) = digits.split_at(digits.len() - k as usize);
    let mut frac_part = frac_part.to_string();
    if !cfg.fullzero {
        while frac_part.ends_with('0') {
            frac_part.pop();
        }
    }
    let tilde = if !exact && cfg.tilde { "~" } else { "" };
    let sign = if neg { "-" } else { "" };
    if frac_part.is_empty() {
        format!("{}{}{}e{}", tilde, sign, int_part, e)
    } else {
        format!("{}{}{}.{}e{}", tilde, sign, int_part, frac_part, e)
    }
}

fn format_radix(q: &BigRational, radix: u32, prefix: &str) -> String {
    let fmt_int = |z: &BigInt| -> String {
        let sign = if z.is_negative() { "-" } else { "" };
        format!("{}{}{}", sign, prefix, z.magnitude().to_str_radix(radix))
    };
    if q.is_integer() {
        fmt_int(q.numer())
    } else {
        format!("{}/{}", fmt_int(q.numer()), fmt_int(q.denom()))
    }
}

fn format_charcode(q: &BigRational, cfg: &Config) -> String {
    if q.is_integer() {
        if let Some(code) = q.numer().to_u32() {
            if let Some(ch) = char::from_u32(code) {
                return ch.to_string();
            }
        }
    }
    format_real(q, cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(n: i64, d: i64) -> BigRational {
        BigRational::new(BigInt::from(n), BigInt::from(d))
    }

    fn qs(n: &str, d: &str) -> BigRational {
        BigRational::new(n.parse().unwrap(), d.parse().unwrap())
    }

    #[test]
    fn real_mode_defaults() {
        let cfg = Config::default();
        assert_eq!(format_num(&q(5, 1), &cfg), "5");
        assert_eq!(format_num(&q(1, 4), &cfg), ".25");
        assert_eq!(format_num(&q(-1, 4), &cfg), "-.25");
        assert_eq!(format_num(&q(5, 4), &cfg), "1.25");
    }

    #[test]
    fn leading_zero_option() {
        let mut cfg = Config::default();
        cfg.leadzero = true;
        assert_eq!(format_num(&q(1, 4), &cfg), "0.25");
        assert_eq!(format_num(&q(-1, 4), &cfg), "-0.25");
    }

    #[test]
    fn tilde_marks_inexact_display() {
        let mut cfg = Config::default();
        cfg.tilde = true;
        cfg.display = 5;
        // 1/3 cannot be shown exactly in 5 digits
        assert_eq!(format_num(&q(1, 3), &cfg), "~.33333");
        // 1/4 can
        assert_eq!(format_num(&q(1, 4), &cfg), ".25");
        cfg.tilde = false;
        assert_eq!(format_num(&q(1, 3), &cfg), ".33333");
    }

    #[test]
    fn display_digit_count_and_rounding() {
        let mut cfg = Config::default();
        cfg.display = 3;
        // 2/3 = 0.666... rounds to .667 under half-even
        assert_eq!(format_num(&q(2, 3), &cfg), ".667");
        cfg.display = 19;
        let cos1 = qs("54030230586813971740", "100000000000000000000");
        assert_eq!(format_num(&cos1, &cfg), ".5403023058681397174");
    }

    #[test]
    fn frac_mode() {
        let mut cfg = Config::default();
        cfg.mode = OutMode::Frac;
        assert_eq!(format_num(&q(22, 7), &cfg), "22/7");
        assert_eq!(format_num(&q(4, 2), &cfg), "2");
        assert_eq!(format_num(&q(-1, 2), &cfg), "-1/2");
    }

    #[test]
    fn int_mode_rounds() {
        let mut cfg = Config::default();
        cfg.mode = OutMode::Int;
        cfg.tilde = true;
        assert_eq!(format_num(&q(7, 2), &cfg), "~4");
        assert_eq!(format_num(&q(3, 1), &cfg), "3");
    }

    #[test]
    fn exp_mode() {
        let mut cfg = Config::default();
        cfg.mode = OutMode::Exp;
        cfg.display = 4;
        assert_eq!(format_num(&q(12345, 1), &cfg), "1.2345e4");
        assert_eq!(format_num(&q(0, 1), &cfg), "0e0");
        assert_eq!(format_num(&q(1, 800), &cfg), "1.25e-3");
        assert_eq!(format_num(&q(-12345, 1), &cfg), "-1.2345e4");
    }

    #[test]
    fn radix_modes() {
        let mut cfg = Config::default();
        cfg.mode = OutMode::Hex;
        assert_eq!(format_num(&q(255, 1), &cfg), "0xff");
        assert_eq!(format_num(&q(-255, 1), &cfg), "-0xff");
        assert_eq!(format_num(&q(1, 2), &cfg), "0x1/0x2");
        cfg.mode = OutMode::Bin;
        assert_eq!(format_num(&q(5, 1), &cfg), "0b101");
        cfg.mode = OutMode::Oct;
        assert_eq!(format_num(&q(8, 1), &cfg), "0o10");
    }

    #[test]
    fn containers_obey_maxprint() {
        let mut cfg = Config::default();
        cfg.maxprint = 2;
        let l = Value::List(std::rc::Rc::new(crate::list::List::from_vec(vec![
            Value::from_i64(1),
            Value::from_i64(2),
            Value::from_i64(3),
        ])));
        let s = format_value(&l, &cfg, &[]);
        assert_eq!(s, "list(1, 2, ...)");
    }

    #[test]
    fn strings_print_raw() {
        let cfg = Config::default();
        assert_eq!(
            format_value(&Value::str_from("hello"), &cfg, &[]),
            "hello"
        );
    }

    #[test]
    fn full_zero_pads() {
        let mut cfg = Config::default();
        cfg.fullzero = true;
        cfg.display = 4;
        assert_eq!(format_num(&q(1, 4), &cfg), ".2500");
    }
}
