//! Complex arithmetic over exact rational parts.
//!
//! The derivations are mechanical: every complex transcendental is
//! assembled from the real ones (`cos(a+bi) = cos a cosh b - i sin a
//! sinh b` and friends). A complex result whose imaginary part comes
//! out exactly zero is demoted to a plain rational at the value layer,
//! so a `Cplx` seen at runtime always has a nonzero imaginary part.

use num_bigint::BigInt;
use num_complex::Complex;
use num_rational::BigRational;
use num_traits::{One, Signed, ToPrimitive, Zero};

use crate::errors::CalcError;
use crate::transc;

pub type Cplx = Complex<BigRational>;

/// Result of an operation that may come out real or complex.
pub enum Demoted {
    Real(BigRational),
    Complex(Cplx),
}

pub fn demote(c: Cplx) -> Demoted {
    if c.im.is_zero() {
        Demoted::Real(c.re)
    } else {
        Demoted::Complex(c)
    }
}

fn qz(z: i64) -> BigRational {
    BigRational::from_integer(BigInt::from(z))
}

/// 4^(floor(|b|)+1), an easy upper bound for e^|b|.
fn exp_bound(b: &BigRational) -> Result<BigRational, CalcError> {
    let f = b.abs().floor().to_integer();
    let fu = f.to_usize().ok_or(CalcError::Overflow("exp"))?;
    if fu > 1_000_000 {
        return Err(CalcError::Overflow("exp"));
    }
    Ok(num_traits::pow(qz(4), fu + 1))
}

fn cosh_q(b: &BigRational, eps: &BigRational) -> Result<BigRational, CalcError> {
    let half_eps = eps / qz(2);
    let ep = transc::exp_q(b, &half_eps)?;
    let en = transc::exp_q(&-b, &half_eps)?;
    Ok((ep + en) / qz(2))
}

fn sinh_q(b: &BigRational, eps: &BigRational) -> Result<BigRational, CalcError> {
    let half_eps = eps / qz(2);
    let ep = transc::exp_q(b, &half_eps)?;
    let en = transc::exp_q(&-b, &half_eps)?;
    Ok((ep - en) / qz(2))
}

/// Complex exponential: `e^(a+bi) = e^a (cos b + i sin b)`.
pub fn exp_c(z: &Cplx, eps: &BigRational) -> Result<Cplx, CalcError> {
    let m = exp_bound(&z.re)?;
    let ga = eps / (&m * qz(8));
    let ea = transc::exp_q(&z.re, &ga)?;
    let gt = eps / ((&ea + qz(1)) * qz(8));
    let cb = transc::cos_q(&z.im, &gt)?;
    let sb = transc::sin_q(&z.im, &gt)?;
    Ok(Cplx::new(&ea * cb, ea * sb))
}

/// Complex natural logarithm: `ln z = ln |z| + i atan2(im, re)`.
pub fn ln_c(z: &Cplx, eps: &BigRational) -> Result<Cplx, CalcError> {
    if z.re.is_zero() && z.im.is_zero() {
        return Err(CalcError::Domain("ln"));
    }
    let quarter = eps / qz(4);
    let norm2 = &z.re * &z.re + &z.im * &z.im;
    let r = transc::sqrt_q(&norm2, &quarter)?;
    let re = transc::ln_q(&r, &(eps / qz(2)))?;
    let im = transc::atan2_q(&z.im, &z.re, &quarter)?;
    Ok(Cplx::new(re, im))
}

/// Principal square root.
pub fn sqrt_c(z: &Cplx, eps: &BigRational) -> Result<Cplx, CalcError> {
    let quarter = eps / qz(4);
    let norm2 = &z.re * &z.re + &z.im * &z.im;
    let r = transc::sqrt_q(&norm2, &quarter)?;
    let re2 = (&r + &z.re) / qz(2);
    let im2 = (&r - &z.re) / qz(2);
    let re = transc::sqrt_q(&re2.max(BigRational::zero()), &quarter)?;
    let mut im = transc::sqrt_q(&im2.max(BigRational::zero()), &quarter)?;
    if z.im.is_negative() {
        im = -im;
    }
    Ok(Cplx::new(re, im))
}

/// Complex sine: `sin(a+bi) = sin a cosh b + i cos a sinh b`.
pub fn sin_c(z: &Cplx, eps: &BigRational) -> Result<Cplx, CalcError> {
    let m = exp_bound(&z.im)?;
    let gt = eps / (&m * qz(8));
    let sa = transc::sin_q(&z.re, &gt)?;
    let ca = transc::cos_q(&z.re, &gt)?;
    let ch = cosh_q(&z.im, &gt)?;
    let sh = sinh_q(&z.im, &gt)?;
    Ok(Cplx::new(sa * ch, ca * sh))
}

/// Complex cosine: `cos(a+bi) = cos a cosh b - i sin a sinh b`.
pub fn cos_c(z: &Cplx, eps: &BigRational) -> Result<Cplx, CalcError> {
    let m = exp_bound(&z.im)?;
    let gt = eps / (&m * qz(8));
    let sa = transc::sin_q(&z.re, &gt)?;
    let ca = transc::cos_q(&z.re, &gt)?;
    let ch = cosh_q(&z.im, &gt)?;
    let sh = sinh_q(&z.im, &gt)?;
    Ok(Cplx::new(ca * ch, -(sa * sh)))
}

/// Exact integer power of a complex number by binary exponentiation.
pub fn powi_c(z: &Cplx, e: &BigInt) -> Result<Cplx, CalcError> {
    if e.is_zero() {
        return Ok(Cplx::new(BigRational::one(), BigRational::zero()));
    }
    let neg = e.is_negative();
    let mut n = e.abs().to_u64().ok_or(CalcError::Overflow("power"))?;
    let mut base = z.clone();
    let mut acc = Cplx::new(BigRational::one(), BigRational::zero());
    while n > 0 {
        if n & 1 == 1 {
            acc = acc * &base;
        }
        base = &base * &base;
        n >>= 1;
    }
    if neg {
        let norm2 = &acc.re * &acc.re + &acc.im * &acc.im;
        if norm2.is_zero() {
            return Err(CalcError::DivByZero);
        }
        let inv = Cplx::new(&acc.re / &norm2, -(&acc.im / &norm2));
        return Ok(inv);
    }
    Ok(acc)
}

/// Rational-to-rational power; real when possible, complex for
/// negative bases with fractional exponents.
pub fn pow_qq(
    x: &BigRational,
    y: &BigRational,
    eps: &BigRational,
) -> Result<Demoted, CalcError> {
    if y.is_integer() {
        let e = y.to_integer();
        if x.is_zero() {
            if e.is_zero() {
                return Ok(Demoted::Real(BigRational::one()));
            }
            if e.is_negative() {
                return Err(CalcError::PowZeroNeg);
            }
            return Ok(Demoted::Real(BigRational::zero()));
        }
        let n = e.abs().to_usize().ok_or(CalcError::Overflow("power"))?;
        let p = num_traits::pow(x.clone(), n);
        return Ok(Demoted::Real(if e.is_negative() { p.recip() } else { p }));
    }
    if x.is_zero() {
        if y.is_negative() {
            return Err(CalcError::PowZeroNeg);
        }
        return Ok(Demoted::Real(BigRational::zero()));
    }
    if x.is_positive() {
        // x^y = exp(y ln x)
        let scale = y.abs().ceil().to_integer().to_usize().unwrap_or(usize::MAX);
        if scale > 1_000_000 {
            return Err(CalcError::Overflow("power"));
        }
        let lg = eps / (num_traits::pow(qz(4), scale + 1) * qz(8) * (y.abs() + qz(1)));
        let l = transc::ln_q(x, &lg)?;
        return Ok(Demoted::Real(transc::exp_q(&(l * y), &(eps / qz(2)))?));
    }
    // negative base: go through the complex logarithm
    let z = Cplx::new(x.clone(), BigRational::zero());
    pow_cc(&z, &Cplx::new(y.clone(), BigRational::zero()), eps)
}

/// General complex power `z^w = exp(w ln z)`.
pub fn pow_cc(z: &Cplx, w: &Cplx, eps: &BigRational) -> Result<Demoted, CalcError> {
    if w.im.is_zero() && w.re.is_integer() {
        return Ok(demote(powi_c(z, &w.re.to_integer())?));
    }
    if z.re.is_zero() && z.im.is_zero() {
        if w.re.is_positive() {
            return Ok(Demoted::Real(BigRational::zero()));
        }
        return Err(CalcError::PowZeroNeg);
    }
    let wmag = (w.re.abs() + w.im.abs()).ceil().to_integer();
    let wm = wmag.to_usize().ok_or(CalcError::Overflow("power"))?;
    if wm > 1_000 {
        return Err(CalcError::Overflow("power"));
    }
    let lg = eps / (num_traits::pow(qz(4), wm + 2) * qz(16));
    let l = ln_c(z, &lg)?;
    let prod = Cplx::new(
        &w.re * &l.re - &w.im * &l.im,
        &w.re * &l.im + &w.im * &l.re,
    );
    Ok(demote(exp_c(&prod, &(eps / qz(2)))?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(n: i64, d: i64) -> BigRational {
        BigRational::new(BigInt::from(n), BigInt::from(d))
    }

    fn c(re: BigRational, im: BigRational) -> Cplx {
        Cplx::new(re, im)
    }

    fn close(a: &BigRational, b: &BigRational, tol: &BigRational) -> bool {
        (a - b).abs() < *tol
    }

    #[test]
    fn demotion() {
        match demote(c(q(3, 1), q(0, 1))) {
            Demoted::Real(r) => assert_eq!(r, q(3, 1)),
            Demoted::Complex(_) => panic!("should demote"),
        }
        match demote(c(q(3, 1), q(1, 2))) {
            Demoted::Real(_) => panic!("should stay complex"),
            Demoted::Complex(_) => {}
        }
    }

    #[test]
    fn integer_powers_are_exact() {
        // (1+i)^4 == -4
        let z = c(q(1, 1), q(1, 1));
        let p = powi_c(&z, &BigInt::from(4)).unwrap();
        assert_eq!(p.re, q(-4, 1));
        assert_eq!(p.im, q(0, 1));
        // (1+i)^-2 == -i/2
        let p = powi_c(&z, &BigInt::from(-2)).unwrap();
        assert_eq!(p.re, q(0, 1));
        assert_eq!(p.im, q(-1, 2));
    }

    #[test]
    fn sqrt_of_minus_one() {
        let eps = q(1, 1_000_000_000);
        let r = sqrt_c(&c(q(-1, 1), q(0, 1)), &eps).unwrap();
        assert!(close(&r.re, &q(0, 1), &q(2, 1_000_000_000)));
        assert!(close(&r.im, &q(1, 1), &q(2, 1_000_000_000)));
    }

    #[test]
    fn sqrt_matches_square() {
        let eps = q(1, 1_000_000);
        let z = c(q(3, 1), q(4, 1));
        let r = sqrt_c(&z, &eps).unwrap();
        // sqrt(3+4i) = 2+i
        assert!(close(&r.re, &q(2, 1), &q(2, 1_000_000)));
        assert!(close(&r.im, &q(1, 1), &q(2, 1_000_000)));
    }

    #[test]
    fn euler_identity_numerically() {
        // e^(i pi) ~ -1
        let eps = q(1, 1_000_000);
        let p = transc::pi_q(&q(1, 100_000_000)).unwrap();
        let r = exp_c(&c(q(0, 1), p), &eps).unwrap();
        assert!(close(&r.re, &q(-1, 1), &q(1, 100_000)));
        assert!(close(&r.im, &q(0, 1), &q(1, 100_000)));
    }

    #[test]
    fn ln_of_negative_real() {
        let eps = q(1, 1_000_000);
        let l = ln_c(&c(q(-1, 1), q(0, 1)), &eps).unwrap();
        let p = transc::pi_q(&q(1, 100_000_000)).unwrap();
        assert!(close(&l.re, &q(0, 1), &q(1, 100_000)));
        assert!(close(&l.im, &p, &q(1, 100_000)));
    }

    #[test]
    fn pow_qq_integer_exact() {
        match pow_qq(&q(2, 3), &q(3, 1), &q(1, 1_000_000)).unwrap() {
            Demoted::Real(r) => assert_eq!(r, q(8, 27)),
            _ => panic!(),
        }
        match pow_qq(&q(2, 1), &q(-2, 1), &q(1, 1_000_000)).unwrap() {
            Demoted::Real(r) => assert_eq!(r, q(1, 4)),
            _ => panic!(),
        }
        // 0^0 == 1, 0^negative is an error
        match pow_qq(&q(0, 1), &q(0, 1), &q(1, 1_000_000)).unwrap() {
            Demoted::Real(r) => assert_eq!(r, q(1, 1)),
            _ => panic!(),
        }
        assert!(pow_qq(&q(0, 1), &q(-1, 1), &q(1, 1_000_000)).is_err());
        assert!(pow_qq(&q(0, 1), &q(-1, 2), &q(1, 1_000_000)).is_err());
    }

    #[test]
    fn pow_qq_fractional() {
        let eps = q(1, 1_000_000_000);
        match pow_qq(&q(2, 1), &q(1, 2), &eps).unwrap() {
            Demoted::Real(r) => {
                let known = q(1414213562, 1_000_000_000);
                assert!(close(&r, &known, &q(2, 1_000_000_000)));
            }
            _ => panic!("2^(1/2) is real"),
        }
    }

    #[test]
    fn pow_negative_base_fractional_is_complex() {
        let eps = q(1, 1_000_000);
        match pow_qq(&q(-1, 1), &q(1, 2), &eps).unwrap() {
            Demoted::Complex(z) => {
                assert!(close(&z.re, &q(0, 1), &q(1, 10_000)));
                assert!(close(&z.im, &q(1, 1), &q(1, 10_000)));
            }
            Demoted::Real(r) => panic!("(-1)^(1/2) should be complex, got {}", r),
        }
    }

    #[test]
    fn sin_cos_complex_identity() {
        // sin^2 + cos^2 == 1 holds in the complex plane too
        let eps = q(1, 1_000_000);
        let z = c(q(1, 2), q(1, 3));
        let s = sin_c(&z, &eps).unwrap();
        let cc = cos_c(&z, &eps).unwrap();
        let s2 = &s * &s;
        let c2 = &cc * &cc;
        let sum = s2 + c2;
        assert!(close(&sum.re, &q(1, 1), &q(1, 10_000)));
        assert!(close(&sum.im, &q(0, 1), &q(1, 10_000)));
    }
}
