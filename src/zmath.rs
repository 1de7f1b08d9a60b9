//! Integer kernel: number-theoretic operations layered over `BigInt`.
//!
//! The magnitude arithmetic itself (schoolbook/Karatsuba multiplication,
//! Knuth division, shifts and bitwise ops) comes from `num_bigint`; this
//! module supplies everything the calculator needs on top of it: integer
//! roots, perfect-square detection, modular exponentiation and inverses,
//! the Jacobi symbol, Miller-Rabin probable-prime testing, prime-candidate
//! search and factoring.

use lazy_static::lazy_static;
use num_bigint::{BigInt, RandBigInt};
use num_integer::Integer;
use num_traits::{One, Pow, Signed, ToPrimitive, Zero};

use crate::errors::CalcError;
use crate::randstate::Randstate;

lazy_static! {
    /// Primes below 1000, used for trial division and as the leading
    /// Miller-Rabin witnesses.
    pub static ref SMALL_PRIMES: Vec<u64> = {
        let limit = 1000usize;
        let mut sieve = vec![true; limit];
        sieve[0] = false;
        sieve[1] = false;
        let mut p = 2;
        while p * p < limit {
            if sieve[p] {
                let mut m = p * p;
                while m < limit {
                    sieve[m] = false;
                    m += p;
                }
            }
            p += 1;
        }
        (0..limit).filter(|&i| sieve[i]).map(|i| i as u64).collect()
    };

    // quadratic residue tables for the is_square fast path
    static ref SQ_MOD_64: [bool; 64] = residue_table(64);
    static ref SQ_MOD_63: [bool; 63] = residue_table(63);
    static ref SQ_MOD_65: [bool; 65] = residue_table(65);
}

fn residue_table<const N: usize>(m: u64) -> [bool; N] {
    let mut t = [false; N];
    for i in 0..m {
        t[((i * i) % m) as usize] = true;
    }
    t
}

/// Floor of the square root. Fails on negative input.
pub fn isqrt(n: &BigInt) -> Result<BigInt, CalcError> {
    if n.is_negative() {
        return Err(CalcError::Domain("isqrt"));
    }
    Ok(n.sqrt())
}

/// If `n` is a perfect square, returns its root.
///
/// Cheap residue filters reject most non-squares before the full
/// integer square root is computed; this is the hot path of every
/// factoring routine.
pub fn is_square(n: &BigInt) -> Option<BigInt> {
    if n.is_negative() {
        return None;
    }
    if n.is_zero() {
        return Some(BigInt::zero());
    }
    let m64 = (n & BigInt::from(63u32)).to_u64().unwrap_or(0);
    if !SQ_MOD_64[m64 as usize] {
        return None;
    }
    let m63 = (n % BigInt::from(63u32)).to_u64().unwrap_or(0);
    if !SQ_MOD_63[m63 as usize] {
        return None;
    }
    let m65 = (n % BigInt::from(65u32)).to_u64().unwrap_or(0);
    if !SQ_MOD_65[m65 as usize] {
        return None;
    }
    let r = n.sqrt();
    if &(&r * &r) == n {
        Some(r)
    } else {
        None
    }
}

/// Floor of the k-th root. `k` must be positive; even roots of
/// negative numbers fail.
pub fn root_floor(n: &BigInt, k: &BigInt) -> Result<BigInt, CalcError> {
    if !k.is_positive() {
        return Err(CalcError::InvalidArg("root", k.to_string()));
    }
    let k32 = k
        .to_u32()
        .ok_or(CalcError::Overflow("root"))?;
    if n.is_negative() {
        if k32 % 2 == 0 {
            return Err(CalcError::Domain("root"));
        }
        // -floor(|n|^(1/k)) may overshoot by one for non-exact roots
        let r = (-n).nth_root(k32);
        let rk: BigInt = Pow::pow(&r, k32);
        return Ok(if rk == -n { -r } else { -r - 1 });
    }
    Ok(n.nth_root(k32))
}

/// Binary-exponentiation `a^e mod m`. Montgomery form is used for odd
/// moduli inside `modpow`. Negative exponents go through the modular
/// inverse and require `gcd(a, m) == 1`.
pub fn powmod(a: &BigInt, e: &BigInt, m: &BigInt) -> Result<BigInt, CalcError> {
    if m.is_zero() {
        return Err(CalcError::DivByZero);
    }
    let m = m.abs();
    let base = a.mod_floor(&m);
    if e.is_negative() {
        let inv = modinverse(&base, &m)?;
        return Ok(inv.modpow(&-e, &m));
    }
    Ok(base.modpow(e, &m))
}

/// Modular inverse by the classical extended-gcd sequence.
pub fn modinverse(a: &BigInt, m: &BigInt) -> Result<BigInt, CalcError> {
    if m.is_zero() {
        return Err(CalcError::DivByZero);
    }
    let m = m.abs();
    let eg = a.extended_gcd(&m);
    if !eg.gcd.is_one() {
        return Err(CalcError::InvalidArg("minv", a.to_string()));
    }
    Ok(eg.x.mod_floor(&m))
}

/// Jacobi symbol (a/b); `b` must be positive and odd.
pub fn jacobi(a: &BigInt, b: &BigInt) -> Result<i32, CalcError> {
    if !b.is_positive() || b.is_even() {
        return Err(CalcError::InvalidArg("jacobi", b.to_string()));
    }
    let mut a = a.mod_floor(b);
    let mut b = b.clone();
    let mut result = 1i32;
    let three = BigInt::from(3u32);
    let five = BigInt::from(5u32);
    let eight = BigInt::from(8u32);
    let four = BigInt::from(4u32);
    while !a.is_zero() {
        while a.is_even() {
            a /= 2;
            let r = b.mod_floor(&eight);
            if r == three || r == five {
                result = -result;
            }
        }
        std::mem::swap(&mut a, &mut b);
        if a.mod_floor(&four) == three && b.mod_floor(&four) == three {
            result = -result;
        }
        a = a.mod_floor(&b);
    }
    Ok(if b.is_one() { result } else { 0 })
}

fn miller_rabin_witness(n: &BigInt, d: &BigInt, s: u32, a: &BigInt) -> bool {
    // true when `a` proves n composite
    let n1 = n - 1;
    let mut x = a.modpow(d, n);
    if x.is_one() || x == n1 {
        return false;
    }
    for _ in 1..s {
        x = (&x * &x) % n;
        if x == n1 {
            return false;
        }
    }
    true
}

/// Miller-Rabin probable-prime test with `k` witnesses: small-prime
/// trial division first, then the first witnesses from the fixed prime
/// table (making seeded runs deterministic) and random witnesses for
/// the remainder. Returns `true` when no witness proves compositeness.
pub fn ptest(n: &BigInt, k: usize, rng: &mut Randstate) -> bool {
    let n = n.abs();
    let two = BigInt::from(2u32);
    if n < two {
        return false;
    }
    for &p in SMALL_PRIMES.iter() {
        let bp = BigInt::from(p);
        if &bp * &bp > n {
            return true; // fully trial-divided
        }
        if (&n % &bp).is_zero() {
            return n == bp;
        }
    }
    if k == 0 {
        return true;
    }

    let n1 = &n - 1u32;
    let s = n1.trailing_zeros().unwrap_or(0) as u32;
    let d = &n1 >> (s as usize);

    const FIXED_WITNESSES: usize = 13;
    for &p in SMALL_PRIMES.iter().take(k.min(FIXED_WITNESSES)) {
        let a = BigInt::from(p);
        if miller_rabin_witness(&n, &d, s, &a) {
            return false;
        }
    }
    let lo = BigInt::from(2u32);
    let hi = &n - 2u32;
    for _ in FIXED_WITNESSES..k {
        let a = rng.rng().gen_bigint_range(&lo, &hi);
        if miller_rabin_witness(&n, &d, s, &a) {
            return false;
        }
    }
    true
}

/// Next integer above `n` passing `ptest` with `count` witnesses.
pub fn nextcand(n: &BigInt, count: usize, rng: &mut Randstate) -> BigInt {
    let two = BigInt::from(2u32);
    let mut c = n + 1u32;
    if c <= two {
        return two;
    }
    if c.is_even() {
        c += 1u32;
    }
    loop {
        if ptest(&c, count, rng) {
            return c;
        }
        c += 2u32;
    }
}

/// Previous integer below `n` passing `ptest`; `None` when none exists.
pub fn prevcand(n: &BigInt, count: usize, rng: &mut Randstate) -> Option<BigInt> {
    let two = BigInt::from(2u32);
    let three = BigInt::from(3u32);
    if *n <= two {
        return None;
    }
    if *n == three {
        return Some(two);
    }
    let mut c = n - 1u32;
    if c.is_even() {
        if c == two {
            return Some(two);
        }
        c -= 1u32;
    }
    loop {
        if ptest(&c, count, rng) {
            return Some(c);
        }
        if c == three {
            return Some(two);
        }
        c -= 2u32;
    }
}

fn pollard_brent(n: &BigInt, rng: &mut Randstate) -> BigInt {
    // Brent's cycle variant of Pollard's rho; returns a nontrivial
    // factor of composite odd n (possibly after retrying with a new c).
    let one = BigInt::one();
    loop {
        let c = rng.rng().gen_bigint_range(&one, &(n - 1u32));
        let mut y = rng.rng().gen_bigint_range(&one, &(n - 1u32));
        let m = 128u32;
        let mut g = BigInt::one();
        let mut r = 1u64;
        let mut q = BigInt::one();
        let mut x = y.clone();
        let mut ys = y.clone();
        while g.is_one() {
            x = y.clone();
            for _ in 0..r {
                y = (&y * &y + &c) % n;
            }
            let mut k = 0u64;
            while k < r && g.is_one() {
                ys = y.clone();
                let steps = m.min((r - k) as u32);
                for _ in 0..steps {
                    y = (&y * &y + &c) % n;
                    q = (&q * (&x - &y).abs()) % n;
                }
                g = q.gcd(n);
                k += steps as u64;
            }
            r *= 2;
        }
        if g == *n {
            // backtrack one step at a time
            loop {
                ys = (&ys * &ys + &c) % n;
                g = (&x - &ys).abs().gcd(n);
                if !g.is_one() {
                    break;
                }
            }
        }
        if !g.is_one() && g != *n {
            return g;
        }
    }
}

/// Smallest prime factor of `|n|`; `n` itself when prime. Fails for
/// |n| < 2.
pub fn factor(n: &BigInt, rng: &mut Randstate) -> Result<BigInt, CalcError> {
    let n = n.abs();
    if n < BigInt::from(2u32) {
        return Err(CalcError::InvalidArg("factor", n.to_string()));
    }
    for &p in SMALL_PRIMES.iter() {
        let bp = BigInt::from(p);
        if &bp * &bp > n {
            return Ok(n);
        }
        if (&n % &bp).is_zero() {
            return Ok(bp);
        }
    }
    smallest_factor(&n, rng)
}

fn smallest_factor(n: &BigInt, rng: &mut Randstate) -> Result<BigInt, CalcError> {
    if ptest(n, 20, rng) {
        return Ok(n.clone());
    }
    if let Some(r) = is_square(n) {
        return smallest_factor(&r, rng);
    }
    let d = pollard_brent(n, rng);
    let cofactor = n / &d;
    let a = smallest_factor(&d, rng)?;
    let b = smallest_factor(&cofactor, rng)?;
    Ok(a.min(b))
}

/// n-th Fibonacci number, F(0) = 0. Fast-doubling.
pub fn fib(n: &BigInt) -> Result<BigInt, CalcError> {
    if n.is_negative() {
        return Err(CalcError::InvalidArg("fib", n.to_string()));
    }
    let bits = n.bits();
    let mut a = BigInt::zero(); // F(k)
    let mut b = BigInt::one(); // F(k+1)
    for i in (0..bits).rev() {
        let t1 = &a * ((&b << 1) - &a); // F(2k)
        let t2 = &a * &a + &b * &b; // F(2k+1)
        if n.bit(i) {
            a = t2.clone();
            b = t1 + t2;
        } else {
            a = t1;
            b = t2;
        }
    }
    Ok(a)
}

/// Factorial; fails on negative input.
pub fn fact(n: &BigInt) -> Result<BigInt, CalcError> {
    if n.is_negative() {
        return Err(CalcError::InvalidArg("fact", n.to_string()));
    }
    let limit = n.to_u64().ok_or(CalcError::Overflow("fact"))?;
    let mut res = BigInt::one();
    for i in 2..=limit {
        res *= i;
    }
    Ok(res)
}

/// Number of one bits in |n|.
pub fn popcount(n: &BigInt) -> u64 {
    n.magnitude().count_ones()
}

/// Test bit `i` of a non-negative integer.
pub fn bit_test(n: &BigInt, i: u64) -> Result<bool, CalcError> {
    if n.is_negative() {
        return Err(CalcError::InvalidArg("bit", n.to_string()));
    }
    Ok(n.bit(i))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bi(v: i64) -> BigInt {
        BigInt::from(v)
    }

    #[test]
    fn isqrt_bracket_invariant() {
        for v in [0i64, 1, 2, 3, 4, 15, 16, 17, 99, 100, 1_000_003] {
            let n = bi(v);
            let r = isqrt(&n).unwrap();
            assert!(&r * &r <= n, "isqrt({}) too big", v);
            assert!((&r + 1) * (&r + 1) > n, "isqrt({}) too small", v);
        }
        assert!(isqrt(&bi(-1)).is_err());
    }

    #[test]
    fn square_detection() {
        assert_eq!(is_square(&bi(0)), Some(bi(0)));
        assert_eq!(is_square(&bi(144)), Some(bi(12)));
        let big = BigInt::from(123456789u64);
        assert_eq!(is_square(&(&big * &big)), Some(big));
        assert_eq!(is_square(&bi(145)), None);
        assert_eq!(is_square(&bi(-4)), None);
    }

    #[test]
    fn roots() {
        assert_eq!(root_floor(&bi(27), &bi(3)).unwrap(), bi(3));
        assert_eq!(root_floor(&bi(26), &bi(3)).unwrap(), bi(2));
        assert_eq!(root_floor(&bi(-27), &bi(3)).unwrap(), bi(-3));
        assert_eq!(root_floor(&bi(-28), &bi(3)).unwrap(), bi(-4));
        assert!(root_floor(&bi(-4), &bi(2)).is_err());
        assert!(root_floor(&bi(4), &bi(0)).is_err());
    }

    #[test]
    fn powmod_matches_direct() {
        let a = bi(123);
        let e = bi(45);
        let m = bi(677);
        let direct = {
            let mut r = BigInt::one();
            for _ in 0..45 {
                r = (r * &a) % &m;
            }
            r
        };
        assert_eq!(powmod(&a, &e, &m).unwrap(), direct);
        assert!(powmod(&a, &e, &bi(0)).is_err());
    }

    #[test]
    fn powmod_negative_exponent() {
        // 3^-1 mod 7 == 5
        assert_eq!(powmod(&bi(3), &bi(-1), &bi(7)).unwrap(), bi(5));
        assert!(powmod(&bi(6), &bi(-1), &bi(8)).is_err());
    }

    #[test]
    fn jacobi_small_table() {
        // (1/3)=1 (2/3)=-1 (1/5)=1 (2/5)=-1 (3/5)=-1 (4/5)=1
        assert_eq!(jacobi(&bi(1), &bi(3)).unwrap(), 1);
        assert_eq!(jacobi(&bi(2), &bi(3)).unwrap(), -1);
        assert_eq!(jacobi(&bi(2), &bi(5)).unwrap(), -1);
        assert_eq!(jacobi(&bi(4), &bi(5)).unwrap(), 1);
        assert_eq!(jacobi(&bi(15), &bi(45)).unwrap(), 0);
        assert!(jacobi(&bi(3), &bi(4)).is_err());
    }

    #[test]
    fn ptest_known_values() {
        let mut rng = Randstate::default();
        assert!(ptest(&bi(2), 5, &mut rng));
        assert!(ptest(&bi(97), 5, &mut rng));
        assert!(ptest(&BigInt::from(193707721u64), 10, &mut rng));
        assert!(!ptest(&bi(1), 5, &mut rng));
        // 561 is Carmichael; base 2 already proves it composite
        assert!(!ptest(&bi(561), 5, &mut rng));
        assert!(!ptest(&bi(1_000_001), 5, &mut rng));
    }

    #[test]
    fn candidate_search() {
        let mut rng = Randstate::default();
        assert_eq!(nextcand(&bi(10), 5, &mut rng), bi(11));
        assert_eq!(nextcand(&bi(1), 5, &mut rng), bi(2));
        assert_eq!(prevcand(&bi(10), 5, &mut rng), Some(bi(7)));
        assert_eq!(prevcand(&bi(3), 5, &mut rng), Some(bi(2)));
        assert_eq!(prevcand(&bi(2), 5, &mut rng), None);
    }

    #[test]
    fn factor_small() {
        let mut rng = Randstate::default();
        assert_eq!(factor(&bi(91), &mut rng).unwrap(), bi(7));
        assert_eq!(factor(&bi(97), &mut rng).unwrap(), bi(97));
        assert_eq!(factor(&bi(-15), &mut rng).unwrap(), bi(3));
        assert!(factor(&bi(1), &mut rng).is_err());
    }

    #[test]
    fn factor_semiprime() {
        let mut rng = Randstate::default();
        // 1000003 * 1000033
        let n = BigInt::from(1000003u64) * BigInt::from(1000033u64);
        assert_eq!(factor(&n, &mut rng).unwrap(), BigInt::from(1000003u64));
    }

    #[test]
    fn fib_fact_popcount() {
        assert_eq!(fib(&bi(0)).unwrap(), bi(0));
        assert_eq!(fib(&bi(10)).unwrap(), bi(55));
        assert_eq!(fib(&bi(50)).unwrap(), BigInt::from(12586269025u64));
        assert_eq!(fact(&bi(5)).unwrap(), bi(120));
        assert_eq!(fact(&bi(0)).unwrap(), bi(1));
        assert_eq!(popcount(&bi(255)), 8);
        assert!(bit_test(&bi(5), 2).unwrap());
        assert!(!bit_test(&bi(5), 1).unwrap());
    }
}
