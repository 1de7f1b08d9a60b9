//! The seven rounding policies and the shared integer divider they all
//! go through. Every configuration slot that takes a rounding mode
//! (`quo`, `mod`, `quomod`, `sqrt`, `appr`, `cfappr`, `outround`)
//! stores one of these.

use num_bigint::BigInt;
use num_integer::Integer;
use num_traits::{Signed, Zero};

use crate::errors::CalcError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Round {
    /// toward zero
    Zero,
    /// away from zero
    Away,
    /// toward minus infinity
    Floor,
    /// toward plus infinity
    Ceil,
    /// to nearest, ties to the even quotient
    HalfEven,
    /// to nearest, ties up
    HalfUp,
    /// truncate (kept distinct from `Zero` in the option table; the
    /// arithmetic is the same)
    Trunc,
}

impl Round {
    pub fn from_index(i: i64) -> Option<Round> {
        match i {
            0 => Some(Round::Zero),
            1 => Some(Round::Away),
            2 => Some(Round::Floor),
            3 => Some(Round::Ceil),
            4 => Some(Round::HalfEven),
            5 => Some(Round::HalfUp),
            6 => Some(Round::Trunc),
            _ => None,
        }
    }

    pub fn index(self) -> i64 {
        match self {
            Round::Zero => 0,
            Round::Away => 1,
            Round::Floor => 2,
            Round::Ceil => 3,
            Round::HalfEven => 4,
            Round::HalfUp => 5,
            Round::Trunc => 6,
        }
    }
}

/// Integer division under a rounding policy. Returns `(q, r)` with
/// `q * d + r == n` exactly. Fails on zero divisor.
pub fn div_round(n: &BigInt, d: &BigInt, mode: Round) -> Result<(BigInt, BigInt), CalcError> {
    if d.is_zero() {
        return Err(CalcError::DivByZero);
    }
    let (qt, rt) = n.div_rem(d); // truncating pair
    if rt.is_zero() {
        return Ok((qt, rt));
    }
    let q = match mode {
        Round::Zero | Round::Trunc => qt,
        Round::Away => {
            if (n.is_negative()) == (d.is_negative()) {
                qt + 1
            } else {
                qt - 1
            }
        }
        Round::Floor => {
            if (n.is_negative()) != (d.is_negative()) {
                qt - 1
            } else {
                qt
            }
        }
        Round::Ceil => {
            if (n.is_negative()) == (d.is_negative()) {
                qt + 1
            } else {
                qt
            }
        }
        Round::HalfEven | Round::HalfUp => {
            // compare |2r| with |d|
            let two_r: BigInt = &rt * 2;
            let cmp = two_r.abs().cmp(&d.abs());
            let same_sign = (n.is_negative()) == (d.is_negative());
            let bump = match cmp {
                std::cmp::Ordering::Greater => true,
                std::cmp::Ordering::Less => false,
                std::cmp::Ordering::Equal => match mode {
                    Round::HalfEven => qt.is_odd(),
                    // ties go toward plus infinity
                    Round::HalfUp => same_sign,
                    _ => unreachable!(),
                },
            };
            if bump {
                if same_sign {
                    qt + 1
                } else {
                    qt - 1
                }
            } else {
                qt
            }
        }
    };
    let r = n - &q * d;
    Ok((q, r))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dr(n: i64, d: i64, m: Round) -> (i64, i64) {
        let (q, r) = div_round(&BigInt::from(n), &BigInt::from(d), m).unwrap();
        use num_traits::ToPrimitive;
        (q.to_i64().unwrap(), r.to_i64().unwrap())
    }

    #[test]
    fn identity_holds_for_all_modes() {
        let modes = [
            Round::Zero,
            Round::Away,
            Round::Floor,
            Round::Ceil,
            Round::HalfEven,
            Round::HalfUp,
            Round::Trunc,
        ];
        for &n in &[7i64, -7, 8, -8, 0, 13, -13] {
            for &d in &[3i64, -3, 2, -2, 5] {
                for &m in &modes {
                    let (q, r) = dr(n, d, m);
                    assert_eq!(q * d + r, n, "n={} d={} mode={:?}", n, d, m);
                }
            }
        }
    }

    #[test]
    fn directed_modes() {
        assert_eq!(dr(7, 2, Round::Zero), (3, 1));
        assert_eq!(dr(-7, 2, Round::Zero), (-3, -1));
        assert_eq!(dr(7, 2, Round::Away), (4, -1));
        assert_eq!(dr(-7, 2, Round::Away), (-4, 1));
        assert_eq!(dr(7, 2, Round::Floor), (3, 1));
        assert_eq!(dr(-7, 2, Round::Floor), (-4, 1));
        assert_eq!(dr(7, 2, Round::Ceil), (4, -1));
        assert_eq!(dr(-7, 2, Round::Ceil), (-3, -1));
    }

    #[test]
    fn nearest_modes() {
        // 7/2 = 3.5: even -> 4 is even, so 4; half-up -> 4
        assert_eq!(dr(7, 2, Round::HalfEven).0, 4);
        assert_eq!(dr(7, 2, Round::HalfUp).0, 4);
        // 5/2 = 2.5: even -> 2; half-up -> 3
        assert_eq!(dr(5, 2, Round::HalfEven).0, 2);
        assert_eq!(dr(5, 2, Round::HalfUp).0, 3);
        // -5/2 = -2.5: even -> -2; half-up (toward +inf) -> -2
        assert_eq!(dr(-5, 2, Round::HalfEven).0, -2);
        assert_eq!(dr(-5, 2, Round::HalfUp).0, -2);
        // 7/3 = 2.33 -> 2 in both
        assert_eq!(dr(7, 3, Round::HalfEven).0, 2);
        assert_eq!(dr(7, 3, Round::HalfUp).0, 2);
    }

    #[test]
    fn zero_divisor_fails() {
        assert!(div_round(&BigInt::from(1), &BigInt::from(0), Round::Zero).is_err());
    }
}
