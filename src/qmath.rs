//! Rational-layer helpers: quotient/remainder under a rounding policy,
//! epsilon-multiple approximation and continued-fraction approximation.
//! All results come out of `BigRational::new`, which keeps values in
//! lowest terms with a positive denominator.

use num_bigint::BigInt;
use num_integer::Integer;
use num_rational::BigRational;
use num_traits::{One, Signed, Zero};

use crate::errors::CalcError;
use crate::round::{div_round, Round};

pub fn qint(i: i64) -> BigRational {
    BigRational::from_integer(BigInt::from(i))
}

pub fn q_from_z(z: BigInt) -> BigRational {
    BigRational::from_integer(z)
}

/// True when the rational is an integer (denominator 1).
pub fn is_int(q: &BigRational) -> bool {
    q.is_integer()
}

/// Integer quotient of `a / b` under a rounding policy.
pub fn quo(a: &BigRational, b: &BigRational, mode: Round) -> Result<BigRational, CalcError> {
    if b.is_zero() {
        return Err(CalcError::DivByZero);
    }
    // a/b = (an * bd) / (ad * bn)
    let n = a.numer() * b.denom();
    let d = a.denom() * b.numer();
    let (q, _) = div_round(&n, &d, mode)?;
    Ok(q_from_z(q))
}

/// Remainder `a - quo(a, b) * b`; exact by construction.
pub fn modulo(a: &BigRational, b: &BigRational, mode: Round) -> Result<BigRational, CalcError> {
    let q = quo(a, b, mode)?;
    Ok(a - q * b)
}

/// Quotient and remainder together, satisfying `q * b + r == a` exactly.
pub fn quomod(
    a: &BigRational,
    b: &BigRational,
    mode: Round,
) -> Result<(BigRational, BigRational), CalcError> {
    let q = quo(a, b, mode)?;
    let r = a - &q * b;
    Ok((q, r))
}

/// Nearest multiple of `eps` under a rounding policy. A zero `eps`
/// returns the value unchanged.
pub fn appr(x: &BigRational, eps: &BigRational, mode: Round) -> Result<BigRational, CalcError> {
    if eps.is_zero() {
        return Ok(x.clone());
    }
    let eps = eps.abs();
    let m = quo(x, &eps, mode)?;
    Ok(m * eps)
}

/// Best rational approximation of `x` with denominator not exceeding
/// `limit`, by walking the continued-fraction convergents.
pub fn cfappr(x: &BigRational, limit: &BigInt) -> Result<BigRational, CalcError> {
    if !limit.is_positive() {
        return Err(CalcError::InvalidArg("cfappr", limit.to_string()));
    }
    if x.denom() <= limit {
        return Ok(x.clone());
    }
    // convergents p/q of the continued fraction of x
    let mut p_prev = BigInt::one();
    let mut q_prev = BigInt::zero();
    let mut p = x.floor().to_integer();
    let mut q = BigInt::one();
    let mut num = x.numer().clone();
    let mut den = x.denom().clone();
    let mut r = &num - &p * &den; // remainder of first step
    loop {
        if r.is_zero() {
            break;
        }
        num = std::mem::replace(&mut den, r.clone());
        let a = num.div_floor(&den);
        r = &num - &a * &den;
        let p_next = &a * &p + &p_prev;
        let q_next = &a * &q + &q_prev;
        if &q_next > limit {
            // best semiconvergent still inside the limit
            let k = (limit - &q_prev).div_floor(&q);
            if &k * 2 >= a {
                let ps = &k * &p + &p_prev;
                let qs = &k * &q + &q_prev;
                let semi = BigRational::new(ps, qs);
                let conv = BigRational::new(p.clone(), q.clone());
                if (&semi - x).abs() < (&conv - x).abs() {
                    return Ok(semi);
                }
            }
            return Ok(BigRational::new(p, q));
        }
        p_prev = std::mem::replace(&mut p, p_next);
        q_prev = std::mem::replace(&mut q, q_next);
    }
    Ok(BigRational::new(p, q))
}

/// `x * 2^n`.
pub fn scale(x: &BigRational, n: i64) -> BigRational {
    if n >= 0 {
        let f = BigInt::one() << (n as usize);
        x * q_from_z(f)
    } else {
        let f = BigInt::one() << ((-n) as usize);
        x / q_from_z(f)
    }
}

/// Integer part, truncated toward zero.
pub fn int_part(x: &BigRational) -> BigRational {
    x.trunc()
}

/// Fractional part; `x == int_part(x) + frac_part(x)`.
pub fn frac_part(x: &BigRational) -> BigRational {
    x.fract()
}

/// Power of ten, for display scaling.
pub fn pow10(k: u32) -> BigInt {
    num_traits::pow(BigInt::from(10u32), k as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(n: i64, d: i64) -> BigRational {
        BigRational::new(BigInt::from(n), BigInt::from(d))
    }

    #[test]
    fn quomod_identity() {
        let modes = [
            Round::Zero,
            Round::Away,
            Round::Floor,
            Round::Ceil,
            Round::HalfEven,
            Round::HalfUp,
            Round::Trunc,
        ];
        let samples = [q(7, 2), q(-7, 2), q(22, 7), q(-22, 7), q(5, 1)];
        let divisors = [q(1, 3), q(-2, 5), q(3, 1)];
        for a in &samples {
            for b in &divisors {
                for &m in &modes {
                    let (qq, r) = quomod(a, b, m).unwrap();
                    assert!(qq.is_integer());
                    assert_eq!(&qq * b + &r, *a, "a={} b={} m={:?}", a, b, m);
                }
            }
        }
    }

    #[test]
    fn quo_floor_matches_schoolbook() {
        assert_eq!(quo(&q(7, 1), &q(2, 1), Round::Floor).unwrap(), q(3, 1));
        assert_eq!(quo(&q(-7, 1), &q(2, 1), Round::Floor).unwrap(), q(-4, 1));
        assert_eq!(quo(&q(7, 2), &q(1, 2), Round::Zero).unwrap(), q(7, 1));
        assert!(quo(&q(1, 1), &q(0, 1), Round::Zero).is_err());
    }

    #[test]
    fn appr_snaps_to_grid() {
        let x = q(1234567, 1000000); // 1.234567
        let eps = q(1, 100);
        assert_eq!(appr(&x, &eps, Round::Floor).unwrap(), q(123, 100));
        assert_eq!(appr(&x, &eps, Round::Ceil).unwrap(), q(124, 100));
        assert_eq!(appr(&x, &eps, Round::HalfEven).unwrap(), q(123, 100));
        // zero eps is the identity
        assert_eq!(appr(&x, &q(0, 1), Round::Floor).unwrap(), x);
    }

    #[test]
    fn appr_already_reduced_is_noop() {
        let x = q(355, 113);
        let r = appr(&x, &q(1, 113), Round::Zero).unwrap();
        assert_eq!(r, x);
    }

    #[test]
    fn cfappr_pi_convergents() {
        // 3.14159265... best approximations with small denominators
        let pi = q(314159265, 100000000);
        assert_eq!(cfappr(&pi, &BigInt::from(1)).unwrap(), q(3, 1));
        assert_eq!(cfappr(&pi, &BigInt::from(10)).unwrap(), q(22, 7));
        assert_eq!(cfappr(&pi, &BigInt::from(150)).unwrap(), q(355, 113));
        // a value already within the limit passes through
        assert_eq!(cfappr(&q(1, 2), &BigInt::from(10)).unwrap(), q(1, 2));
    }

    #[test]
    fn scale_shifts() {
        assert_eq!(scale(&q(3, 1), 4), q(48, 1));
        assert_eq!(scale(&q(3, 1), -2), q(3, 4));
    }

    #[test]
    fn int_frac_split() {
        let x = q(-22, 7);
        assert_eq!(int_part(&x) + frac_part(&x), x);
        assert_eq!(int_part(&x), q(-3, 1));
    }
}
