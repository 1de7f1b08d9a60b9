//! Dense matrices of one to four dimensions with caller-chosen index
//! bounds (a lower bound of zero is common but not assumed, and never
//! normalized away). Storage is row-major and contiguous. Determinant
//! and inverse run fraction-free elimination over exact values, so a
//! rational matrix inverts exactly.

use num_bigint::BigInt;
use num_traits::ToPrimitive;

use crate::code::{BinOp, UnOp};
use crate::config::Config;
use crate::errors::{CalcError, CalcResult};
use crate::value::{self, Value};

pub const MAX_DIMS: usize = 4;
const MAX_ELEMS: usize = 1 << 22;

#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    bounds: Vec<(i64, i64)>,
    data: Vec<Value>,
}

impl Matrix {
    pub fn new(bounds: Vec<(i64, i64)>) -> Result<Matrix, CalcError> {
        if bounds.is_empty() || bounds.len() > MAX_DIMS {
            return Err(CalcError::MatrixDef(format!(
                "{} dimensions (1 to {} supported)",
                bounds.len(),
                MAX_DIMS
            )));
        }
        let mut total: usize = 1;
        for &(lo, hi) in &bounds {
            if hi < lo {
                return Err(CalcError::MatrixDef(format!("bad bounds [{}:{}]", lo, hi)));
            }
            let span = (hi - lo + 1) as usize;
            total = total
                .checked_mul(span)
                .filter(|&t| t <= MAX_ELEMS)
                .ok_or(CalcError::Overflow("mat"))?;
        }
        Ok(Matrix {
            bounds,
            data: vec![Value::from_i64(0); total],
        })
    }

    pub fn bounds(&self) -> &[(i64, i64)] {
        &self.bounds
    }

    pub fn ndim(&self) -> usize {
        self.bounds.len()
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn dim_len(&self, d: usize) -> usize {
        let (lo, hi) = self.bounds[d];
        (hi - lo + 1) as usize
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Value> {
        self.data.iter()
    }

    fn offset(&self, idx: &[BigInt]) -> Result<usize, CalcError> {
        if idx.len() != self.bounds.len() {
            return Err(CalcError::ShapeMismatch(format!(
                "{} indices for a {}-dimensional matrix",
                idx.len(),
                self.bounds.len()
            )));
        }
        let mut off: usize = 0;
        for (i, &(lo, hi)) in idx.iter().zip(self.bounds.iter()) {
            let i = i.to_i64().ok_or(CalcError::IndexBounds)?;
            if i < lo || i > hi {
                return Err(CalcError::IndexBounds);
            }
            off = off * ((hi - lo + 1) as usize) + (i - lo) as usize;
        }
        Ok(off)
    }

    pub fn get(&self, idx: &[BigInt]) -> Result<&Value, CalcError> {
        let off = self.offset(idx)?;
        Ok(&self.data[off])
    }

    pub fn set(&mut self, idx: &[BigInt], v: Value) -> Result<(), CalcError> {
        let off = self.offset(idx)?;
        self.data[off] = v;
        Ok(())
    }

    pub fn get_linear(&self, i: usize) -> Option<&Value> {
        self.data.get(i)
    }

    pub fn set_linear(&mut self, i: usize, v: Value) -> Result<(), CalcError> {
        match self.data.get_mut(i) {
            Some(slot) => {
                *slot = v;
                Ok(())
            }
            None => Err(CalcError::IndexBounds),
        }
    }

    fn same_shape(a: &Matrix, b: &Matrix) -> Result<(), CalcError> {
        if a.ndim() != b.ndim() {
            return Err(CalcError::ShapeMismatch(format!(
                "{} vs {} dimensions",
                a.ndim(),
                b.ndim()
            )));
        }
        for d in 0..a.ndim() {
            if a.dim_len(d) != b.dim_len(d) {
                return Err(CalcError::ShapeMismatch(format!(
                    "dimension {} is {} vs {}",
                    d,
                    a.dim_len(d),
                    b.dim_len(d)
                )));
            }
        }
        Ok(())
    }

    /// Element-wise add/sub; the left operand's bounds carry over.
    pub fn zip(a: &Matrix, b: &Matrix, op: BinOp, cfg: &Config) -> Result<Matrix, CalcError> {
        Matrix::same_shape(a, b)?;
        let mut out = a.clone();
        for (slot, rhs) in out.data.iter_mut().zip(b.data.iter()) {
            let lhs = std::mem::take(slot);
            *slot = value::binop(op, lhs, rhs.clone(), cfg)?;
        }
        Ok(out)
    }

    pub fn scalar_op(
        &self,
        s: &Value,
        op: BinOp,
        scalar_on_left: bool,
        cfg: &Config,
    ) -> Result<Matrix, CalcError> {
        let mut out = self.clone();
        for slot in out.data.iter_mut() {
            let e = std::mem::take(slot);
            *slot = if scalar_on_left {
                value::binop(op, s.clone(), e, cfg)?
            } else {
                value::binop(op, e, s.clone(), cfg)?
            };
        }
        Ok(out)
    }

    pub fn negate(&self, cfg: &Config) -> Result<Matrix, CalcError> {
        let mut out = self.clone();
        for slot in out.data.iter_mut() {
            let e = std::mem::take(slot);
            *slot = value::unop(UnOp::Neg, e, cfg)?;
        }
        Ok(out)
    }

    /// Linear-algebra product of two 2-dimensional matrices.
    pub fn matmul(a: &Matrix, b: &Matrix, cfg: &Config) -> Result<Matrix, CalcError> {
        if a.ndim() != 2 || b.ndim() != 2 {
            return Err(CalcError::ShapeMismatch(
                "matrix product needs two 2-dimensional matrices".into(),
            ));
        }
        let (n, k1) = (a.dim_len(0), a.dim_len(1));
        let (k2, m) = (b.dim_len(0), b.dim_len(1));
        if k1 != k2 {
            return Err(CalcError::ShapeMismatch(format!(
                "inner dimensions {} vs {}",
                k1, k2
            )));
        }
        let mut out = Matrix::new(vec![a.bounds[0], b.bounds[1]])?;
        for i in 0..n {
            for j in 0..m {
                let mut acc = Value::from_i64(0);
                for k in 0..k1 {
                    let prod = value::binop(
                        BinOp::Mul,
                        a.data[i * k1 + k].clone(),
                        b.data[k * m + j].clone(),
                        cfg,
                    )?;
                    acc = value::binop(BinOp::Add, acc, prod, cfg)?;
                }
                out.data[i * m + j] = acc;
            }
        }
        Ok(out)
    }

    /// Transpose of a 2-dimensional matrix.
    pub fn transpose(&self) -> Result<Matrix, CalcError> {
        if self.ndim() != 2 {
            return Err(CalcError::ShapeMismatch(
                "transpose needs a 2-dimensional matrix".into(),
            ));
        }
        let (r, c) = (self.dim_len(0), self.dim_len(1));
        let mut out = Matrix::new(vec![self.bounds[1], self.bounds[0]])?;
        for i in 0..r {
            for j in 0..c {
                out.data[j * r + i] = self.data[i * c + j].clone();
            }
        }
        Ok(out)
    }

    fn square_dim(&self) -> Result<usize, CalcError> {
        if self.ndim() != 2 || self.dim_len(0) != self.dim_len(1) {
            return Err(CalcError::ShapeMismatch("matrix is not square".into()));
        }
        Ok(self.dim_len(0))
    }

    /// Determinant by fraction-free Bareiss elimination.
    pub fn det(&self, cfg: &Config) -> CalcResult {
        let n = self.square_dim()?;
        if n == 0 {
            return Ok(Value::from_i64(1));
        }
        let mut m: Vec<Value> = self.data.clone();
        let at = |v: &Vec<Value>, i: usize, j: usize| v[i * n + j].clone();
        let mut sign = false;
        let mut prev = Value::from_i64(1);
        for k in 0..n - 1 {
            if at(&m, k, k).is_zero() {
                // pivot search below
                let swap = (k + 1..n).find(|&r| !at(&m, r, k).is_zero());
                match swap {
                    Some(r) => {
                        for j in 0..n {
                            m.swap(k * n + j, r * n + j);
                        }
                        sign = !sign;
                    }
                    None => return Ok(Value::from_i64(0)),
                }
            }
            for i in k + 1..n {
                for j in k + 1..n {
                    let a = value::binop(BinOp::Mul, at(&m, i, j), at(&m, k, k), cfg)?;
                    let b = value::binop(BinOp::Mul, at(&m, i, k), at(&m, k, j), cfg)?;
                    let num = value::binop(BinOp::Sub, a, b, cfg)?;
                    m[i * n + j] = value::binop(BinOp::Div, num, prev.clone(), cfg)?;
                }
            }
            prev = at(&m, k, k);
        }
        let d = at(&m, n - 1, n - 1);
        if sign {
            value::unop(UnOp::Neg, d, cfg)
        } else {
            Ok(d)
        }
    }

    /// Inverse by Gauss-Jordan elimination over exact values; bounds
    /// carry over from the original.
    pub fn inverse(&self, cfg: &Config) -> Result<Matrix, CalcError> {
        let n = self.square_dim()?;
        let mut a: Vec<Value> = self.data.clone();
        let mut inv = Matrix::new(self.bounds.clone())?;
        // identity
        for i in 0..n {
            inv.data[i * n + i] = Value::from_i64(1);
        }
        for col in 0..n {
            let pivot_row = (col..n)
                .find(|&r| !a[r * n + col].is_zero())
                .ok_or(CalcError::Singular)?;
            if pivot_row != col {
                for j in 0..n {
                    a.swap(col * n + j, pivot_row * n + j);
                    inv.data.swap(col * n + j, pivot_row * n + j);
                }
            }
            let pivot = a[col * n + col].clone();
            for j in 0..n {
                a[col * n + j] =
                    value::binop(BinOp::Div, a[col * n + j].clone(), pivot.clone(), cfg)?;
                inv.data[col * n + j] = value::binop(
                    BinOp::Div,
                    inv.data[col * n + j].clone(),
                    pivot.clone(),
                    cfg,
                )?;
            }
            for r in 0..n {
                if r == col || a[r * n + col].is_zero() {
                    continue;
                }
                let factor = a[r * n + col].clone();
                for j in 0..n {
                    let t = value::binop(
                        BinOp::Mul,
                        factor.clone(),
                        a[col * n + j].clone(),
                        cfg,
                    )?;
                    a[r * n + j] = value::binop(BinOp::Sub, a[r * n + j].clone(), t, cfg)?;
                    let t = value::binop(
                        BinOp::Mul,
                        factor.clone(),
                        inv.data[col * n + j].clone(),
                        cfg,
                    )?;
                    inv.data[r * n + j] =
                        value::binop(BinOp::Sub, inv.data[r * n + j].clone(), t, cfg)?;
                }
            }
        }
        Ok(inv)
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

    fn bi(i: i64) -> BigInt {
        BigInt::from(i)
    }

    fn from_rows(rows: &[&[i64]]) -> Matrix {
        let r = rows.len() as i64;
        let c = rows[0].len() as i64;
        let mut m = Matrix::new(vec![(0, r - 1), (0, c - 1)]).unwrap();
        let mut idx = 0;
        for row in rows {
            for &v in *row {
                m.set_linear(idx, n(v)).unwrap();
                idx += 1;
            }
        }
        m
    }

    #[test]
    fn bounds_are_preserved_not_normalized() {
        let mut m = Matrix::new(vec![(1, 3)]).unwrap();
        m.set(&[bi(1)], n(10)).unwrap();
        m.set(&[bi(3)], n(30)).unwrap();
        assert_eq!(m.get(&[bi(1)]).unwrap(), &n(10));
        assert_eq!(m.get(&[bi(3)]).unwrap(), &n(30));
        assert!(m.get(&[bi(0)]).is_err());
        assert!(m.get(&[bi(4)]).is_err());
        assert_eq!(m.bounds(), &[(1, 3)]);
    }

    #[test]
    fn dimension_limits() {
        assert!(Matrix::new(vec![]).is_err());
        assert!(Matrix::new(vec![(0, 1); 5]).is_err());
        assert!(Matrix::new(vec![(3, 2)]).is_err());
        assert!(Matrix::new(vec![(0, 0); 4]).is_ok());
    }

    #[test]
    fn elementwise_and_scalar() {
        let c = cfg();
        let a = from_rows(&[&[1, 2], &[3, 4]]);
        let b = from_rows(&[&[10, 20], &[30, 40]]);
        let s = Matrix::zip(&a, &b, BinOp::Add, &c).unwrap();
        assert_eq!(s.get(&[bi(1), bi(1)]).unwrap(), &n(44));
        let d = a.scalar_op(&n(2), BinOp::Mul, false, &c).unwrap();
        assert_eq!(d.get(&[bi(0), bi(1)]).unwrap(), &n(4));
        let neg = a.negate(&c).unwrap();
        assert_eq!(neg.get(&[bi(0), bi(0)]).unwrap(), &n(-1));
    }

    #[test]
    fn shape_mismatch_rejected() {
        let c = cfg();
        let a = from_rows(&[&[1, 2], &[3, 4]]);
        let b = from_rows(&[&[1, 2, 3], &[4, 5, 6]]);
        assert!(Matrix::zip(&a, &b, BinOp::Add, &c).is_err());
    }

    #[test]
    fn product_and_transpose() {
        let c = cfg();
        let a = from_rows(&[&[1, 2], &[3, 4]]);
        let b = from_rows(&[&[5, 6], &[7, 8]]);
        let p = Matrix::matmul(&a, &b, &c).unwrap();
        assert_eq!(p.get(&[bi(0), bi(0)]).unwrap(), &n(19));
        assert_eq!(p.get(&[bi(1), bi(1)]).unwrap(), &n(50));
        let t = a.transpose().unwrap();
        assert_eq!(t.get(&[bi(1), bi(0)]).unwrap(), &n(2));
    }

    #[test]
    fn determinant_known_values() {
        let c = cfg();
        let m = from_rows(&[&[1, 2], &[3, 4]]);
        assert_eq!(m.det(&c).unwrap(), n(-2));
        let m = from_rows(&[&[1, 2, 3], &[4, 5, 6], &[7, 8, 10]]);
        assert_eq!(m.det(&c).unwrap(), n(-3));
        let singular = from_rows(&[&[1, 2, 3], &[4, 5, 6], &[7, 8, 9]]);
        assert_eq!(singular.det(&c).unwrap(), n(0));
    }

    #[test]
    fn determinant_with_zero_pivot() {
        let c = cfg();
        let m = from_rows(&[&[0, 1], &[1, 0]]);
        assert_eq!(m.det(&c).unwrap(), n(-1));
    }

    #[test]
    fn inverse_times_original_is_identity() {
        let c = cfg();
        let m = from_rows(&[&[1, 2, 3], &[4, 5, 6], &[7, 8, 10]]);
        let inv = m.inverse(&c).unwrap();
        let prod = Matrix::matmul(&inv, &m, &c).unwrap();
        for i in 0..3 {
            for j in 0..3 {
                let expect = if i == j { n(1) } else { n(0) };
                assert_eq!(prod.get(&[bi(i), bi(j)]).unwrap(), &expect);
            }
        }
    }

    #[test]
    fn singular_inverse_fails() {
        let c = cfg();
        let m = from_rows(&[&[1, 2], &[2, 4]]);
        assert!(matches!(m.inverse(&c), Err(CalcError::Singular)));
    }
}
