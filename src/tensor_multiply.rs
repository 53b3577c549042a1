// Functions are named after their output axes followed by the contracted axis
// pairs: `x1x2y1_x0y0` takes `X[x0, x1, x2]` and `Y[y0, y1]`, contracts `x0`
// with `y0` and returns `Z[x1, x2, y1]`. An empty operand gives an empty result.

use crate::blas::{Trans, gemm};
use crate::error::Result;
use crate::prelude::*;

fn check_rank(op: &'static str, x: &Block, nx: usize, y: &Block, ny: usize) -> Result<()> {
    if x.ndim() != nx || y.ndim() != ny {
        return Err(RiError::ShapeMismatch { op, lhs: x.shape().to_vec(), rhs: y.shape().to_vec() });
    }
    Ok(())
}

fn check_pairs(op: &'static str, x: &Block, y: &Block, pairs: &[(usize, usize)]) -> Result<()> {
    if pairs.iter().any(|&(ix, iy)| x.shape()[ix] != y.shape()[iy]) {
        return Err(RiError::ShapeMismatch { op, lhs: x.shape().to_vec(), rhs: y.shape().to_vec() });
    }
    Ok(())
}

fn matrix_shape(shape: &[usize], split: usize) -> [usize; 2] {
    [shape[..split].iter().product(), shape[split..].iter().product()]
}

fn contract(
    x: &Block,
    sx: usize,
    trans_x: Trans,
    y: &Block,
    sy: usize,
    trans_y: Trans,
    shape: Vec<usize>,
) -> Result<Block> {
    let (Some(x_tsr), Some(y_tsr)) = (x.tsr(), y.tsr()) else { return Ok(Block::default()) };
    let x_mat = x_tsr.reshape_f(matrix_shape(x.shape(), sx))?;
    let y_mat = y_tsr.reshape_f(matrix_shape(y.shape(), sy))?;
    let m = if trans_x == Trans::N { x_mat.shape()[0] } else { x_mat.shape()[1] };
    let n = if trans_y == Trans::N { y_mat.shape()[1] } else { y_mat.shape()[0] };
    let mut z: Tsr = rt::zeros_f((vec![m, n], x_tsr.device()))?;
    gemm(trans_x, trans_y, 1.0, x_mat.view(), y_mat.view(), 0.0, &mut z)?;
    Ok(Block::from_tsr(z.into_shape_f(shape)?))
}

pub fn x1x2y1_x0y0(x: &Block, y: &Block) -> Result<Block> {
    const OP: &str = "x1x2y1_x0y0";
    if x.is_empty() || y.is_empty() {
        return Ok(Block::default());
    }
    check_rank(OP, x, 3, y, 2)?;
    check_pairs(OP, x, y, &[(0, 0)])?;
    let (xs, ys) = (x.shape(), y.shape());
    contract(x, 1, Trans::T, y, 1, Trans::N, vec![xs[1], xs[2], ys[1]])
}

pub fn x0y2_x1y0_x2y1(x: &Block, y: &Block) -> Result<Block> {
    const OP: &str = "x0y2_x1y0_x2y1";
    if x.is_empty() || y.is_empty() {
        return Ok(Block::default());
    }
    check_rank(OP, x, 3, y, 3)?;
    check_pairs(OP, x, y, &[(1, 0), (2, 1)])?;
    let (xs, ys) = (x.shape(), y.shape());
    contract(x, 1, Trans::N, y, 2, Trans::N, vec![xs[0], ys[2]])
}

pub fn x0x1y0_x2y1(x: &Block, y: &Block) -> Result<Block> {
    const OP: &str = "x0x1y0_x2y1";
    if x.is_empty() || y.is_empty() {
        return Ok(Block::default());
    }
    check_rank(OP, x, 3, y, 2)?;
    check_pairs(OP, x, y, &[(2, 1)])?;
    let (xs, ys) = (x.shape(), y.shape());
    contract(x, 2, Trans::N, y, 1, Trans::T, vec![xs[0], xs[1], ys[0]])
}

pub fn x1x2y0_x0y1(x: &Block, y: &Block) -> Result<Block> {
    const OP: &str = "x1x2y0_x0y1";
    if x.is_empty() || y.is_empty() {
        return Ok(Block::default());
    }
    check_rank(OP, x, 3, y, 2)?;
    check_pairs(OP, x, y, &[(0, 1)])?;
    let (xs, ys) = (x.shape(), y.shape());
    contract(x, 1, Trans::T, y, 1, Trans::T, vec![xs[1], xs[2], ys[0]])
}

pub fn x2y0_x0y1_x1y2(x: &Block, y: &Block) -> Result<Block> {
    const OP: &str = "x2y0_x0y1_x1y2";
    if x.is_empty() || y.is_empty() {
        return Ok(Block::default());
    }
    check_rank(OP, x, 3, y, 3)?;
    check_pairs(OP, x, y, &[(0, 1), (1, 2)])?;
    let (xs, ys) = (x.shape(), y.shape());
    contract(x, 2, Trans::T, y, 1, Trans::T, vec![xs[2], ys[0]])
}

pub fn x0x1y1_x2y0(x: &Block, y: &Block) -> Result<Block> {
    const OP: &str = "x0x1y1_x2y0";
    if x.is_empty() || y.is_empty() {
        return Ok(Block::default());
    }
    check_rank(OP, x, 3, y, 2)?;
    check_pairs(OP, x, y, &[(2, 0)])?;
    let (xs, ys) = (x.shape(), y.shape());
    contract(x, 2, Trans::N, y, 1, Trans::N, vec![xs[0], xs[1], ys[1]])
}

pub fn x1y0y1_x0y2(x: &Block, y: &Block) -> Result<Block> {
    const OP: &str = "x1y0y1_x0y2";
    if x.is_empty() || y.is_empty() {
        return Ok(Block::default());
    }
    check_rank(OP, x, 2, y, 3)?;
    check_pairs(OP, x, y, &[(0, 2)])?;
    let (xs, ys) = (x.shape(), y.shape());
    contract(x, 1, Trans::T, y, 2, Trans::T, vec![xs[1], ys[0], ys[1]])
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_relative_eq;
    use itertools::iproduct;

    fn init_block(shape: &[usize], seed: usize) -> Block {
        Block::from_fn(shape.to_vec(), |idx| {
            let h = idx.iter().fold(seed, |acc, &i| acc * 31 + i + 7);
            ((h % 97) as f64 - 48.0) / 17.0
        })
        .unwrap()
    }

    const X0: usize = 2;
    const X1: usize = 3;
    const X2: usize = 4;
    const Y: usize = 5;

    #[test]
    fn test_x1x2y1_x0y0() {
        let x = init_block(&[X0, X1, X2], 1);
        let y = init_block(&[X0, Y], 2);
        let z = x1x2y1_x0y0(&x, &y).unwrap();
        assert_eq!(z.shape(), &[X1, X2, Y]);
        for (x1, x2, y1) in iproduct!(0..X1, 0..X2, 0..Y) {
            let reference: f64 = (0..X0).map(|x0| x.get(&[x0, x1, x2]) * y.get(&[x0, y1])).sum();
            assert_relative_eq!(z.get(&[x1, x2, y1]), reference, max_relative = 1e-10, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_x0y2_x1y0_x2y1() {
        let x = init_block(&[X0, X1, X2], 3);
        let y = init_block(&[X1, X2, Y], 4);
        let z = x0y2_x1y0_x2y1(&x, &y).unwrap();
        assert_eq!(z.shape(), &[X0, Y]);
        for (x0, y2) in iproduct!(0..X0, 0..Y) {
            let reference: f64 =
                iproduct!(0..X1, 0..X2).map(|(x1, x2)| x.get(&[x0, x1, x2]) * y.get(&[x1, x2, y2])).sum();
            assert_relative_eq!(z.get(&[x0, y2]), reference, max_relative = 1e-10, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_x0x1y0_x2y1() {
        let x = init_block(&[X0, X1, X2], 5);
        let y = init_block(&[Y, X2], 6);
        let z = x0x1y0_x2y1(&x, &y).unwrap();
        assert_eq!(z.shape(), &[X0, X1, Y]);
        for (x0, x1, y0) in iproduct!(0..X0, 0..X1, 0..Y) {
            let reference: f64 = (0..X2).map(|x2| x.get(&[x0, x1, x2]) * y.get(&[y0, x2])).sum();
            assert_relative_eq!(z.get(&[x0, x1, y0]), reference, max_relative = 1e-10, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_x1x2y0_x0y1() {
        let x = init_block(&[X0, X1, X2], 7);
        let y = init_block(&[Y, X0], 8);
        let z = x1x2y0_x0y1(&x, &y).unwrap();
        assert_eq!(z.shape(), &[X1, X2, Y]);
        for (x1, x2, y0) in iproduct!(0..X1, 0..X2, 0..Y) {
            let reference: f64 = (0..X0).map(|x0| x.get(&[x0, x1, x2]) * y.get(&[y0, x0])).sum();
            assert_relative_eq!(z.get(&[x1, x2, y0]), reference, max_relative = 1e-10, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_x2y0_x0y1_x1y2() {
        let x = init_block(&[X0, X1, X2], 9);
        let y = init_block(&[Y, X0, X1], 10);
        let z = x2y0_x0y1_x1y2(&x, &y).unwrap();
        assert_eq!(z.shape(), &[X2, Y]);
        for (x2, y0) in iproduct!(0..X2, 0..Y) {
            let reference: f64 =
                iproduct!(0..X0, 0..X1).map(|(x0, x1)| x.get(&[x0, x1, x2]) * y.get(&[y0, x0, x1])).sum();
            assert_relative_eq!(z.get(&[x2, y0]), reference, max_relative = 1e-10, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_x0x1y1_x2y0() {
        let x = init_block(&[X0, X1, X2], 11);
        let y = init_block(&[X2, Y], 12);
        let z = x0x1y1_x2y0(&x, &y).unwrap();
        assert_eq!(z.shape(), &[X0, X1, Y]);
        for (x0, x1, y1) in iproduct!(0..X0, 0..X1, 0..Y) {
            let reference: f64 = (0..X2).map(|x2| x.get(&[x0, x1, x2]) * y.get(&[x2, y1])).sum();
            assert_relative_eq!(z.get(&[x0, x1, y1]), reference, max_relative = 1e-10, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_x1y0y1_x0y2() {
        let x = init_block(&[X0, X1], 13);
        let y = init_block(&[Y, X2, X0], 14);
        let z = x1y0y1_x0y2(&x, &y).unwrap();
        assert_eq!(z.shape(), &[X1, Y, X2]);
        for (x1, y0, y1) in iproduct!(0..X1, 0..Y, 0..X2) {
            let reference: f64 = (0..X0).map(|x0| x.get(&[x0, x1]) * y.get(&[y0, y1, x0])).sum();
            assert_relative_eq!(z.get(&[x1, y0, y1]), reference, max_relative = 1e-10, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_empty_short_circuit() {
        let x = init_block(&[X0, X1, X2], 1);
        let empty = Block::default();
        assert!(x1x2y1_x0y0(&x, &empty).unwrap().is_empty());
        assert!(x1x2y1_x0y0(&empty, &x).unwrap().is_empty());
        assert!(x0y2_x1y0_x2y1(&empty, &empty).unwrap().is_empty());
        assert!(x1y0y1_x0y2(&empty, &x).unwrap().is_empty());
    }

    #[test]
    fn test_shape_mismatch() {
        let x = init_block(&[X0, X1, X2], 1);
        let y = init_block(&[X0 + 1, Y], 2);
        assert!(matches!(x1x2y1_x0y0(&x, &y), Err(RiError::ShapeMismatch { .. })));
        let y = init_block(&[X1, X2 + 1, Y], 2);
        assert!(matches!(x0y2_x1y0_x2y1(&x, &y), Err(RiError::ShapeMismatch { .. })));
        // rank mismatch
        let y = init_block(&[X0, Y, 1], 2);
        assert!(matches!(x1x2y1_x0y0(&x, &y), Err(RiError::ShapeMismatch { .. })));
    }
}
