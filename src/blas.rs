use crate::error::Result;
use crate::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trans {
    N,
    T,
    C,
}

impl Trans {
    pub fn from_char(c: char) -> Result<Self> {
        match c {
            'N' | 'n' => Ok(Trans::N),
            'T' | 't' => Ok(Trans::T),
            'C' | 'c' => Ok(Trans::C),
            _ => Err(RiError::InvalidArgument(format!("trans must be 'N', 'T' or 'C', got '{c}'"))),
        }
    }

    pub(crate) fn apply<'a>(&self, mat: TsrView<'a>) -> TsrView<'a> {
        match self {
            Trans::N => mat,
            Trans::T | Trans::C => mat.into_reverse_axes(),
        }
    }
}

pub(crate) fn gemm(
    trans_a: Trans,
    trans_b: Trans,
    alpha: f64,
    a: TsrView,
    b: TsrView,
    beta: f64,
    c: &mut Tsr,
) -> Result<()> {
    if a.ndim() != 2 || b.ndim() != 2 || c.ndim() != 2 {
        return Err(RiError::ShapeMismatch { op: "gemm", lhs: a.shape().clone(), rhs: b.shape().clone() });
    }
    let a_op = trans_a.apply(a);
    let b_op = trans_b.apply(b);
    let (m, k_a) = (a_op.shape()[0], a_op.shape()[1]);
    let (k_b, n) = (b_op.shape()[0], b_op.shape()[1]);
    if k_a != k_b || c.shape().as_slice() != [m, n] {
        return Err(RiError::ShapeMismatch { op: "gemm", lhs: vec![m, k_a], rhs: vec![k_b, n] });
    }
    c.matmul_from_f(&a_op, &b_op, alpha, beta)?;
    Ok(())
}
