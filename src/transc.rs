//! Epsilon-bounded transcendental functions over exact rationals.
//!
//! Every function takes the target absolute error `eps` (an exact
//! positive rational) and returns a rational within `0.75 * eps` of the
//! true value, leaving slack for one display rounding on top. There is
//! no floating point anywhere: series are summed in exact arithmetic
//! with explicit truncation bounds, and working precision is tightened
//! ahead of range reductions that amplify error.

use num_bigint::BigInt;
use num_integer::Integer;
use num_rational::BigRational;
use num_traits::{One, Signed, Zero};

use crate::errors::CalcError;
use crate::qmath;
use crate::round::Round;
use crate::zmath;

fn qz(z: i64) -> BigRational {
    BigRational::from_integer(BigInt::from(z))
}

fn qpow(base: &BigRational, exp: usize) -> BigRational {
    num_traits::pow(base.clone(), exp)
}

fn check_eps(eps: &BigRational) -> Result<(), CalcError> {
    if !eps.is_positive() {
        return Err(CalcError::InvalidArg("epsilon", eps.to_string()));
    }
    Ok(())
}

fn ceil_log2(b: u64) -> u32 {
    debug_assert!(b >= 1);
    64 - (b - 1).leading_zeros()
}

/// Square root to within `eps`, exact for perfect squares.
pub fn sqrt_q(x: &BigRational, eps: &BigRational) -> Result<BigRational, CalcError> {
    check_eps(eps)?;
    if x.is_negative() {
        return Err(CalcError::Domain("sqrt"));
    }
    if x.is_zero() {
        return Ok(BigRational::zero());
    }
    if let (Some(rn), Some(rd)) = (zmath::is_square(x.numer()), zmath::is_square(x.denom())) {
        return Ok(BigRational::new(rn, rd));
    }
    // scaled integer square root: 1/d <= eps/4
    let four_ed: BigInt = eps.denom() * 4;
    let d: BigInt = (&four_ed + eps.numer() - BigInt::from(1)).div_floor(eps.numer());
    let scaled = (x.numer() * &d * &d).div_floor(x.denom());
    let r = scaled.sqrt();
    Ok(BigRational::new(r, d))
}

/// Floor-style k-th root to within `eps`; exact for perfect powers.
pub fn root_q(x: &BigRational, k: &BigInt, eps: &BigRational) -> Result<BigRational, CalcError> {
    check_eps(eps)?;
    if !k.is_positive() {
        return Err(CalcError::InvalidArg("root", k.to_string()));
    }
    if k.is_one() {
        return Ok(x.clone());
    }
    if x.is_zero() {
        return Ok(BigRational::zero());
    }
    if x.is_negative() {
        if k.is_even() {
            return Err(CalcError::Domain("root"));
        }
        return Ok(-root_q(&-x, k, eps)?);
    }
    let ku = num_traits::ToPrimitive::to_usize(k).ok_or(CalcError::Overflow("root"))?;
    // exact k-th powers come out exact
    let rn = zmath::root_floor(x.numer(), k)?;
    let rd = zmath::root_floor(x.denom(), k)?;
    if num_traits::pow(rn.clone(), ku) == *x.numer() && num_traits::pow(rd.clone(), ku) == *x.denom()
    {
        return Ok(BigRational::new(rn, rd));
    }
    let four_ed: BigInt = eps.denom() * 4;
    let d: BigInt = (&four_ed + eps.numer() - BigInt::from(1)).div_floor(eps.numer());
    let dk = num_traits::pow(d.clone(), ku);
    let scaled = (x.numer() * dk).div_floor(x.denom());
    let r = zmath::root_floor(&scaled, k)?;
    Ok(BigRational::new(r, d))
}

// Taylor series for exp on [0, 1): tail after the n-th term is bounded
// by term * f / ((n + 1) * (1 - f)).
fn exp_series(f: &BigRational, bound: &BigRational) -> BigRational {
    let one = BigRational::one();
    let one_minus = &one - f;
    let mut sum = one.clone();
    let mut term = one;
    let mut n: u64 = 1;
    loop {
        term = term * f / qz(n as i64);
        sum += &term;
        n += 1;
        if &term / &one_minus < *bound {
            return sum;
        }
    }
}

/// `e^x` to within `0.75 * eps`.
///
/// Range reduction extracts the integer part: `exp(k + f) =
/// e^k * exp(f)` with `f` in `[0, 1)`; `e` itself is summed once at the
/// precision the integer power demands.
pub fn exp_q(x: &BigRational, eps: &BigRational) -> Result<BigRational, CalcError> {
    check_eps(eps)?;
    if x.is_zero() {
        return Ok(BigRational::one());
    }
    if x.is_negative() {
        // exp(x) = 1 / exp(-x); exp(-x) >= 1 so the reciprocal cannot
        // amplify the error
        let half = BigRational::new(BigInt::from(1), BigInt::from(2));
        let inner = if eps < &half { eps.clone() } else { half };
        let pos = exp_q(&-x, &(inner / qz(4)))?;
        return Ok(pos.recip());
    }
    let k = x.floor().to_integer();
    let kk = num_traits::ToPrimitive::to_usize(&k).ok_or(CalcError::Overflow("exp"))?;
    if kk > 1_000_000 {
        return Err(CalcError::Overflow("exp"));
    }
    let f = x - BigRational::from_integer(k);

    // e^x < 4^(k+1); partition eps across the product
    let mag = qpow(&qz(4), kk + 1);
    let gf = eps / (&mag * qz(8));
    let ef = exp_series(&f, &gf);
    if kk == 0 {
        return Ok(ef);
    }
    // e to the precision the k-th power needs:
    // (e + d)^k ~ e^k + k e^(k-1) d, so d <= eps / (8 k 4^k)
    let ge = eps / (qz(kk as i64) * &mag * qz(8));
    let e1 = exp_series(&(BigRational::one() / qz(2)), &(ge / qz(8)));
    let e1 = &e1 * &e1; // e = exp(1/2)^2
    let ek = qpow(&e1, kk);
    let result = ef * ek;
    // snap to a grid so the huge exact denominators do not leak out
    qmath::appr(&result, &(eps / qz(8)), Round::HalfEven)
}

/// Natural logarithm to within `0.75 * eps`; argument must be positive.
///
/// `x` is driven into `[1, 3/2]` by repeated square roots
/// (`ln x = 2^k ln x^(1/2^k)`), then the Maclaurin series for
/// `ln(1 + u)` finishes the job.
pub fn ln_q(x: &BigRational, eps: &BigRational) -> Result<BigRational, CalcError> {
    check_eps(eps)?;
    if !x.is_positive() {
        return Err(CalcError::Domain("ln"));
    }
    if x.is_one() {
        return Ok(BigRational::zero());
    }
    if x < &BigRational::one() {
        return Ok(-ln_q(&x.recip(), eps)?);
    }
    // upper estimate of log2 x gives the number of reductions needed
    let b = (x.numer().bits() as i64 - x.denom().bits() as i64 + 1).max(1) as u64;
    let k_est = ceil_log2(b) + 3;
    let s_eps = eps / qpow(&qz(2), (k_est + 8) as usize);

    let threshold = BigRational::new(BigInt::from(3), BigInt::from(2));
    let mut y = x.clone();
    let mut k: u32 = 0;
    while y > threshold {
        y = sqrt_q(&y, &s_eps)?;
        k += 1;
        if k > k_est + 40 {
            return Err(CalcError::Overflow("ln"));
        }
    }
    let u = &y - BigRational::one();
    // alternating series sum (-1)^(n+1) u^n / n, tail bounded by the
    // first omitted term
    let eps_series = eps / qpow(&qz(2), (k + 2) as usize);
    let mut sum = BigRational::zero();
    let mut power = u.clone();
    let mut n: u64 = 1;
    loop {
        let t = &power / qz(n as i64);
        if n % 2 == 1 {
            sum += &t;
        } else {
            sum -= &t;
        }
        power *= &u;
        n += 1;
        if &power / qz(n as i64) < eps_series {
            break;
        }
    }
    Ok(sum * qpow(&qz(2), k as usize))
}

// Alternating arctangent series; requires |t| <= 1/2, tail bounded by
// the first omitted term.
fn atan_series(t: &BigRational, bound: &BigRational) -> BigRational {
    let t2 = t * t;
    let mut sum = BigRational::zero();
    let mut power = t.clone();
    let mut n: u64 = 0;
    loop {
        let term = &power / qz((2 * n + 1) as i64);
        if n % 2 == 0 {
            sum += &term;
        } else {
            sum -= &term;
        }
        power *= &t2;
        n += 1;
        if (&power / qz((2 * n + 1) as i64)).abs() < *bound {
            return sum;
        }
    }
}

/// Arctangent to within `0.75 * eps`.
pub fn atan_q(x: &BigRational, eps: &BigRational) -> Result<BigRational, CalcError> {
    check_eps(eps)?;
    if x.is_zero() {
        return Ok(BigRational::zero());
    }
    if x.is_negative() {
        return Ok(-atan_q(&-x, eps)?);
    }
    let one = BigRational::one();
    if *x > one {
        // atan x = pi/2 - atan(1/x)
        let p = pi_q(&(eps / qz(4)))?;
        let inner = atan_q(&x.recip(), &(eps / qz(4)))?;
        return Ok(p / qz(2) - inner);
    }
    let half = BigRational::new(BigInt::from(1), BigInt::from(2));
    if *x > half {
        // one halving step: atan x = 2 atan(x / (1 + sqrt(1 + x^2)))
        let s = sqrt_q(&(&one + x * x), &(eps / qz(16)))?;
        let t = x / (&one + s);
        return Ok(atan_series(&t, &(eps / qz(8))) * qz(2));
    }
    Ok(atan_series(x, &(eps / qz(2))))
}

/// Two-argument arctangent; the angle of the point `(x, y)`.
pub fn atan2_q(
    y: &BigRational,
    x: &BigRational,
    eps: &BigRational,
) -> Result<BigRational, CalcError> {
    check_eps(eps)?;
    if x.is_zero() && y.is_zero() {
        return Err(CalcError::Domain("atan2"));
    }
    if x.is_zero() {
        let p = pi_q(&(eps * qz(2)))?;
        return Ok(if y.is_positive() { p / qz(2) } else { -p / qz(2) });
    }
    let base = atan_q(&(y / x), &(eps / qz(2)))?;
    if x.is_positive() {
        return Ok(base);
    }
    let p = pi_q(&(eps / qz(4)))?;
    Ok(if y.is_negative() { base - p } else { base + p })
}

/// Pi by Machin's formula, each arctangent taken well inside the
/// target error.
pub fn pi_q(eps: &BigRational) -> Result<BigRational, CalcError> {
    check_eps(eps)?;
    let b = eps / qz(64);
    let a5 = atan_series(&BigRational::new(BigInt::from(1), BigInt::from(5)), &b);
    let a239 = atan_series(&BigRational::new(BigInt::from(1), BigInt::from(239)), &b);
    Ok(a5 * qz(16) - a239 * qz(4))
}

// shared sine/cosine core: argument reduction mod 2*pi, then the
// alternating Taylor series
fn sincos_reduce(x: &BigRational, eps: &BigRational) -> Result<BigRational, CalcError> {
    // |n| is at most |x|/6 + 1; a first pass at precision 1/(8(|n|+1))
    // keeps the reduced argument within pi + 1/4
    let mag = x.abs().floor().to_integer() / BigInt::from(6) + 1;
    let rough_eps = BigRational::new(BigInt::one(), (&mag + 1) * BigInt::from(8));
    let rough = pi_q(&rough_eps)?;
    let n = qmath::quo(x, &(&rough * qz(2)), Round::HalfEven)?;
    if n.is_zero() {
        return Ok(x.clone());
    }
    let nmag = n.to_integer().abs();
    let scale = BigRational::from_integer(&nmag + 1) * qz(16);
    let p2 = pi_q(&(eps / scale))? * qz(2);
    Ok(x - &n * p2)
}

fn sin_series(r: &BigRational, bound: &BigRational) -> BigRational {
    let r2 = r * r;
    let mut term = r.clone();
    let mut sum = r.clone();
    let mut m: u64 = 1;
    loop {
        term = -(term * &r2) / qz((2 * m * (2 * m + 1)) as i64);
        sum += &term;
        m += 1;
        if m >= 3 && term.abs() < *bound {
            return sum;
        }
    }
}

fn cos_series(r: &BigRational, bound: &BigRational) -> BigRational {
    let r2 = r * r;
    let mut term = BigRational::one();
    let mut sum = BigRational::one();
    let mut m: u64 = 1;
    loop {
        term = -(term * &r2) / qz(((2 * m - 1) * (2 * m)) as i64);
        sum += &term;
        m += 1;
        if m >= 3 && term.abs() < *bound {
            return sum;
        }
    }
}

/// Sine to within `0.75 * eps`.
pub fn sin_q(x: &BigRational, eps: &BigRational) -> Result<BigRational, CalcError> {
    check_eps(eps)?;
    let r = sincos_reduce(x, eps)?;
    Ok(sin_series(&r, &(eps / qz(4))))
}

/// Cosine to within `0.75 * eps`.
pub fn cos_q(x: &BigRational, eps: &BigRational) -> Result<BigRational, CalcError> {
    check_eps(eps)?;
    let r = sincos_reduce(x, eps)?;
    Ok(cos_series(&r, &(eps / qz(4))))
}

/// Tangent via sine/cosine; fails when the cosine is too close to zero
/// to separate from it at this precision.
pub fn tan_q(x: &BigRational, eps: &BigRational) -> Result<BigRational, CalcError> {
    check_eps(eps)?;
    let fine = eps / qz(16);
    let c = cos_q(x, &fine)?;
    if c.abs() <= &fine * qz(2) {
        return Err(CalcError::Domain("tan"));
    }
    // |d tan / d(sin)| = 1/|c|; tighten the sine accordingly
    let s_eps = (&fine * &c * &c).abs();
    let s = sin_q(x, &s_eps)?;
    Ok(s / c)
}

/// Caches for values that are expensive to recompute: pi at the finest
/// precision seen so far and the Bernoulli / Euler number tables.
#[derive(Default)]
pub struct NumCache {
    pi: Option<(BigRational, BigRational)>, // (eps, value)
    bern: Vec<BigRational>,
    euler: Vec<BigRational>,
}

impl NumCache {
    pub fn new() -> Self {
        NumCache::default()
    }

    pub fn pi(&mut self, eps: &BigRational) -> Result<BigRational, CalcError> {
        check_eps(eps)?;
        if let Some((cached_eps, value)) = &self.pi {
            if cached_eps <= eps {
                return Ok(value.clone());
            }
        }
        let value = pi_q(eps)?;
        self.pi = Some((eps.clone(), value.clone()));
        Ok(value)
    }

    /// n-th Bernoulli number (B1 = -1/2), extending the table on demand.
    pub fn bernoulli(&mut self, n: usize) -> BigRational {
        while self.bern.len() <= n {
            let m = self.bern.len();
            let b = match m {
                0 => BigRational::one(),
                1 => BigRational::new(BigInt::from(-1), BigInt::from(2)),
                _ if m % 2 == 1 => BigRational::zero(),
                _ => {
                    // sum_{j=0}^{m-1} C(m+1, j) B_j = -C(m+1, m) B_m... solved for B_m
                    let mut acc = BigRational::zero();
                    let mut binom = BigInt::one(); // C(m+1, 0)
                    for (j, bj) in self.bern.iter().enumerate() {
                        if !bj.is_zero() {
                            acc += BigRational::from_integer(binom.clone()) * bj;
                        }
                        // C(m+1, j+1) from C(m+1, j)
                        binom = binom * BigInt::from((m + 1 - j) as u64)
                            / BigInt::from((j + 1) as u64);
                    }
                    -acc / BigRational::from_integer(BigInt::from((m + 1) as u64))
                }
            };
            self.bern.push(b);
        }
        self.bern[n].clone()
    }

    /// n-th Euler number (integers; odd indices are zero).
    pub fn euler(&mut self, n: usize) -> BigRational {
        while self.euler.len() <= n {
            let m = self.euler.len();
            let e = if m == 0 {
                BigRational::one()
            } else if m % 2 == 1 {
                BigRational::zero()
            } else {
                // E_m = - sum_{k=0,2,..,m-2} C(m, k) E_k
                let mut acc = BigRational::zero();
                for k in (0..m).step_by(2) {
                    let c = binomial(m as u64, k as u64);
                    acc += BigRational::from_integer(c) * &self.euler[k];
                }
                -acc
            };
            self.euler.push(e);
        }
        self.euler[n].clone()
    }
}

fn binomial(n: u64, k: u64) -> BigInt {
    let mut r = BigInt::one();
    for i in 0..k {
        r = r * BigInt::from(n - i) / BigInt::from(i + 1);
    }
    r
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

    fn close(a: &BigRational, b: &BigRational, eps: &BigRational) -> bool {
        (a - b).abs() < *eps
    }

    #[test]
    fn sqrt_exact_and_bracketed() {
        let eps = q(1, 1_000_000_000);
        assert_eq!(sqrt_q(&q(9, 4), &eps).unwrap(), q(3, 2));
        assert_eq!(sqrt_q(&q(0, 1), &eps).unwrap(), q(0, 1));
        let r = sqrt_q(&q(2, 1), &eps).unwrap();
        // |r - sqrt 2| < eps implies |r^2 - 2| < 4 eps
        assert!((&r * &r - q(2, 1)).abs() < q(4, 1_000_000_000));
        assert!(sqrt_q(&q(-1, 1), &eps).is_err());
    }

    #[test]
    fn root_exact_and_close() {
        let eps = q(1, 1_000_000);
        assert_eq!(root_q(&q(27, 8), &BigInt::from(3), &eps).unwrap(), q(3, 2));
        assert_eq!(
            root_q(&q(-27, 1), &BigInt::from(3), &eps).unwrap(),
            q(-3, 1)
        );
        let r = root_q(&q(2, 1), &BigInt::from(3), &eps).unwrap();
        let known = qs("1259921", "1000000"); // 2^(1/3) = 1.2599210...
        assert!(close(&r, &known, &q(2, 1_000_000)));
        assert!(root_q(&q(-4, 1), &BigInt::from(2), &eps).is_err());
    }

    #[test]
    fn exp_known_digits() {
        let eps = qs("1", "1000000000000000"); // 1e-15
        let e = exp_q(&q(1, 1), &eps).unwrap();
        let known = qs("2718281828459045", "1000000000000000");
        assert!(close(&e, &known, &qs("2", "1000000000000000")));
        assert_eq!(exp_q(&q(0, 1), &eps).unwrap(), q(1, 1));
    }

    #[test]
    fn exp_negative_and_large() {
        let eps = q(1, 1_000_000_000);
        let em1 = exp_q(&q(-1, 1), &eps).unwrap();
        let known = q(367879441, 1_000_000_000); // e^-1 = 0.3678794411...
        assert!(close(&em1, &known, &q(2, 1_000_000_000)));
        let e5 = exp_q(&q(5, 1), &eps).unwrap();
        let known5 = qs("148413159102576603", "1000000000000000"); // 148.4131591025766...
        assert!(close(&e5, &known5, &q(1, 100_000_000)));
    }

    #[test]
    fn ln_known_digits() {
        let eps = qs("1", "1000000000000"); // 1e-12
        let l2 = ln_q(&q(2, 1), &eps).unwrap();
        let known = qs("693147180560", "1000000000000");
        assert!(close(&l2, &known, &qs("2", "1000000000000")));
        let lhalf = ln_q(&q(1, 2), &eps).unwrap();
        assert!(close(&lhalf, &-known, &qs("2", "1000000000000")));
        assert_eq!(ln_q(&q(1, 1), &eps).unwrap(), q(0, 1));
        assert!(ln_q(&q(0, 1), &eps).is_err());
        assert!(ln_q(&q(-3, 1), &eps).is_err());
    }

    #[test]
    fn ln_exp_roundtrip() {
        let eps = q(1, 1_000_000_000);
        let x = q(7, 3);
        let back = ln_q(&exp_q(&x, &(eps.clone() / q(100, 1))).unwrap(), &eps).unwrap();
        assert!(close(&back, &x, &q(1, 100_000_000)));
    }

    #[test]
    fn pi_known_digits() {
        let eps = qs("1", "1000000000000000");
        let p = pi_q(&eps).unwrap();
        let known = qs("3141592653589793", "1000000000000000");
        assert!(close(&p, &known, &qs("2", "1000000000000000")));
    }

    #[test]
    fn atan_known_values() {
        let eps = q(1, 1_000_000_000);
        let a1 = atan_q(&q(1, 1), &eps).unwrap();
        let pi4 = pi_q(&q(1, 10_000_000_000)).unwrap() / q(4, 1);
        assert!(close(&a1, &pi4, &q(2, 1_000_000_000)));
        // atan(2) = 1.1071487177940904...
        let a2 = atan_q(&q(2, 1), &eps).unwrap();
        let known = qs("1107148717794", "1000000000000");
        assert!(close(&a2, &known, &q(2, 1_000_000_000)));
        assert!(close(
            &atan_q(&q(-2, 1), &eps).unwrap(),
            &-known,
            &q(2, 1_000_000_000)
        ));
    }

    #[test]
    fn sin_cos_known_digits() {
        let eps = qs("1", "1000000000000");
        let s1 = sin_q(&q(1, 1), &eps).unwrap();
        let known_s = qs("841470984808", "1000000000000"); // sin 1
        assert!(close(&s1, &known_s, &qs("2", "1000000000000")));
        let c1 = cos_q(&q(1, 1), &eps).unwrap();
        let known_c = qs("540302305868", "1000000000000"); // cos 1
        assert!(close(&c1, &known_c, &qs("2", "1000000000000")));
        // pythagorean check
        let sum = &s1 * &s1 + &c1 * &c1;
        assert!(close(&sum, &q(1, 1), &qs("1", "100000000000")));
    }

    #[test]
    fn sin_large_argument_reduction() {
        let eps = q(1, 1_000_000_000);
        // sin(100) = -0.50636564110975879...
        let s = sin_q(&q(100, 1), &eps).unwrap();
        let known = q(-506365641, 1_000_000_000);
        assert!(close(&s, &known, &q(2, 1_000_000_000)));
    }

    #[test]
    fn cos_one_twenty_digits() {
        // the display scenario: cos(1) to 1e-20
        let eps = qs("1", "100000000000000000000");
        let c = cos_q(&q(1, 1), &eps).unwrap();
        let known = qs("54030230586813971740", "100000000000000000000");
        let tol = qs("75", "10000000000000000000000"); // 0.75 * eps
        assert!(close(&c, &known, &tol));
    }

    #[test]
    fn tan_and_domain() {
        let eps = q(1, 1_000_000);
        let t = tan_q(&q(1, 1), &eps).unwrap();
        let known = qs("1557408", "1000000"); // tan 1 = 1.5574077...
        assert!(close(&t, &known, &q(2, 1_000_000)));
    }

    #[test]
    fn bernoulli_table() {
        let mut c = NumCache::new();
        assert_eq!(c.bernoulli(0), q(1, 1));
        assert_eq!(c.bernoulli(1), q(-1, 2));
        assert_eq!(c.bernoulli(2), q(1, 6));
        assert_eq!(c.bernoulli(3), q(0, 1));
        assert_eq!(c.bernoulli(4), q(-1, 30));
        assert_eq!(c.bernoulli(12), q(-691, 2730));
    }

    #[test]
    fn euler_table() {
        let mut c = NumCache::new();
        assert_eq!(c.euler(0), q(1, 1));
        assert_eq!(c.euler(1), q(0, 1));
        assert_eq!(c.euler(2), q(-1, 1));
        assert_eq!(c.euler(4), q(5, 1));
        assert_eq!(c.euler(6), q(-61, 1));
        assert_eq!(c.euler(8), q(1385, 1));
    }

    #[test]
    fn pi_cache_reuses_finer_value() {
        let mut c = NumCache::new();
        let coarse = c.pi(&q(1, 1000)).unwrap();
        let fine = c.pi(&q(1, 1_000_000)).unwrap();
        // finer request recomputes
        assert!((&fine - &coarse).abs() < q(1, 500));
        let again = c.pi(&q(1, 1000)).unwrap();
        assert_eq!(again, fine);
    }
}
