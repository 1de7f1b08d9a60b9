//! The configuration record. A single instance lives in the engine and
//! is consulted by display and arithmetic on every operation; the
//! `config` builtin reads and writes fields by name, returning the old
//! value on writes.

use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::{Signed, ToPrimitive};

use crate::errors::{CalcError, CalcResult};
use crate::qmath;
use crate::round::Round;
use crate::value::Value;

/// Numeric output mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutMode {
    /// decimal fraction at `display` digits
    Real,
    /// numerator/denominator
    Frac,
    /// rounded to an integer
    Int,
    /// scientific notation
    Exp,
    Hex,
    Oct,
    Bin,
    /// integers print as character codes
    Str,
}

impl OutMode {
    pub fn from_name(s: &str) -> Option<OutMode> {
        match s {
            "real" => Some(OutMode::Real),
            "frac" | "fraction" => Some(OutMode::Frac),
            "int" | "integer" => Some(OutMode::Int),
            "exp" | "scientific" => Some(OutMode::Exp),
            "hex" | "hexadecimal" => Some(OutMode::Hex),
            "oct" | "octal" => Some(OutMode::Oct),
            "bin" | "binary" => Some(OutMode::Bin),
            "string" => Some(OutMode::Str),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            OutMode::Real => "real",
            OutMode::Frac => "frac",
            OutMode::Int => "int",
            OutMode::Exp => "exp",
            OutMode::Hex => "hex",
            OutMode::Oct => "oct",
            OutMode::Bin => "bin",
            OutMode::Str => "string",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub mode: OutMode,
    /// digits of fractional precision shown
    pub display: u32,
    /// default transcendental precision
    pub epsilon: BigRational,
    /// prefix inexact displays with `~`
    pub tilde: bool,
    /// indent for container display
    pub tab: u32,
    pub quomod: Round,
    pub quo: Round,
    pub modulo: Round,
    pub sqrt: Round,
    pub appr: Round,
    pub cfappr: Round,
    pub outround: Round,
    pub leadzero: bool,
    pub fullzero: bool,
    /// element cap on auto-printed containers
    pub maxprint: usize,
    pub prompt: String,
    pub more: String,
    pub calc_debug: u64,
    /// positive: the next error aborts the statement and decrements
    pub stoponerror: i64,
    pub lib_debug: u64,
    pub resource_debug: u64,
    pub user_debug: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            mode: OutMode::Real,
            display: 20,
            epsilon: BigRational::new(BigInt::from(1), qmath::pow10(20)),
            tilde: false,
            tab: 3,
            quomod: Round::Zero,
            quo: Round::Zero,
            modulo: Round::Zero,
            sqrt: Round::HalfEven,
            appr: Round::HalfEven,
            cfappr: Round::HalfEven,
            outround: Round::HalfEven,
            leadzero: false,
            fullzero: false,
            maxprint: 16,
            prompt: "; ".to_string(),
            more: ";; ".to_string(),
            calc_debug: 0,
            stoponerror: 0,
            lib_debug: 0,
            resource_debug: 0,
            user_debug: 0,
        }
    }
}

fn as_round(v: &Value) -> Result<Round, CalcError> {
    let i = v.expect_int("config")?;
    let i = i.to_i64().ok_or(CalcError::Overflow("config"))?;
    Round::from_index(i).ok_or(CalcError::InvalidArg("config", i.to_string()))
}

fn as_flag(v: &Value) -> Result<bool, CalcError> {
    Ok(v.is_true())
}

fn as_u64(v: &Value) -> Result<u64, CalcError> {
    let i = v.expect_int("config")?;
    i.to_u64().ok_or(CalcError::Overflow("config"))
}

impl Config {
    /// Read an option by name.
    pub fn get(&self, name: &str) -> CalcResult {
        let int = |i: i64| Value::from_i64(i);
        Ok(match name {
            "mode" => Value::str_from(self.mode.name()),
            "display" => int(self.display as i64),
            "epsilon" => Value::Num(self.epsilon.clone()),
            "tilde" => int(self.tilde as i64),
            "tab" => int(self.tab as i64),
            "quomod" => int(self.quomod.index()),
            "quo" => int(self.quo.index()),
            "mod" => int(self.modulo.index()),
            "sqrt" => int(self.sqrt.index()),
            "appr" => int(self.appr.index()),
            "cfappr" => int(self.cfappr.index()),
            "outround" => int(self.outround.index()),
            "leadzero" => int(self.leadzero as i64),
            "fullzero" => int(self.fullzero as i64),
            "maxprint" => int(self.maxprint as i64),
            "prompt" => Value::str_from(&self.prompt),
            "more" => Value::str_from(&self.more),
            "calc_debug" => int(self.calc_debug as i64),
            "stoponerror" => int(self.stoponerror),
            "lib_debug" => int(self.lib_debug as i64),
            "resource_debug" => int(self.resource_debug as i64),
            "user_debug" => int(self.user_debug as i64),
            _ => return Err(CalcError::InvalidArg("config", name.to_string())),
        })
    }

    /// Write an option by name; returns the previous value.
    pub fn set(&mut self, name: &str, v: &Value) -> CalcResult {
        let old = self.get(name)?;
        match name {
            "mode" => {
                let s = v.expect_str("config")?;
                self.mode = OutMode::from_name(&s)
                    .ok_or_else(|| CalcError::InvalidArg("config", s.clone()))?;
            }
            "display" => {
                self.display = as_u64(v)?.min(1_000_000) as u32;
            }
            "epsilon" => {
                let q = v.expect_num("config")?;
                if !q.is_positive() {
                    return Err(CalcError::InvalidArg("epsilon", q.to_string()));
                }
                self.epsilon = q.clone();
            }
            "tilde" => self.tilde = as_flag(v)?,
            "tab" => self.tab = as_u64(v)?.min(64) as u32,
            "quomod" => self.quomod = as_round(v)?,
            "quo" => self.quo = as_round(v)?,
            "mod" => self.modulo = as_round(v)?,
            "sqrt" => self.sqrt = as_round(v)?,
            "appr" => self.appr = as_round(v)?,
            "cfappr" => self.cfappr = as_round(v)?,
            "outround" => self.outround = as_round(v)?,
            "leadzero" => self.leadzero = as_flag(v)?,
            "fullzero" => self.fullzero = as_flag(v)?,
            "maxprint" => self.maxprint = as_u64(v)? as usize,
            "prompt" => self.prompt = v.expect_str("config")?,
            "more" => self.more = v.expect_str("config")?,
            "calc_debug" => self.calc_debug = as_u64(v)?,
            "stoponerror" => {
                let i = v.expect_int("config")?;
                self.stoponerror = i.to_i64().ok_or(CalcError::Overflow("config"))?;
            }
            "lib_debug" => self.lib_debug = as_u64(v)?,
            "resource_debug" => self.resource_debug = as_u64(v)?,
            "user_debug" => self.user_debug = as_u64(v)?,
            _ => return Err(CalcError::InvalidArg("config", name.to_string())),
        }
        Ok(old)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = Config::default();
        assert_eq!(c.mode, OutMode::Real);
        assert_eq!(c.display, 20);
        assert_eq!(c.stoponerror, 0);
        assert!(!c.tilde);
    }

    #[test]
    fn set_returns_old_value() {
        let mut c = Config::default();
        let old = c.set("display", &Value::from_i64(10)).unwrap();
        assert_eq!(old, Value::from_i64(20));
        assert_eq!(c.display, 10);
        let old = c.set("mode", &Value::str_from("frac")).unwrap();
        assert_eq!(old, Value::str_from("real"));
        assert_eq!(c.mode, OutMode::Frac);
    }

    #[test]
    fn epsilon_must_be_positive() {
        let mut c = Config::default();
        assert!(c.set("epsilon", &Value::from_i64(0)).is_err());
        assert!(c.set("epsilon", &Value::from_i64(-1)).is_err());
    }

    #[test]
    fn unknown_option_rejected() {
        let c = Config::default();
        assert!(c.get("no_such_option").is_err());
    }

    #[test]
    fn rounding_slots_take_indices() {
        let mut c = Config::default();
        c.set("quo", &Value::from_i64(2)).unwrap();
        assert_eq!(c.quo, Round::Floor);
        assert!(c.set("quo", &Value::from_i64(9)).is_err());
    }
}
