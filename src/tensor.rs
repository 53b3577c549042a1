use crate::error::Result;
use crate::prelude::*;
use itertools::Itertools;
use std::sync::OnceLock;

static BLOCK_DEVICE: OnceLock<DeviceTsr> = OnceLock::new();

pub(crate) fn block_device() -> &'static DeviceTsr {
    BLOCK_DEVICE.get_or_init(|| DeviceTsr::new(1))
}

/// Dense block of a sparse family, held as a row-major contiguous tensor.
#[derive(Debug, Clone, Default)]
pub struct Block {
    tsr: Option<Tsr>,
}

impl Block {
    pub fn new(shape: Vec<usize>, data: Vec<f64>) -> Result<Self> {
        if shape.iter().product::<usize>() != data.len() {
            return Err(RiError::ShapeMismatch { op: "Block::new", lhs: shape, rhs: vec![data.len()] });
        }
        let tsr: Tsr = rt::asarray_f((data, shape.c(), block_device()))?;
        Ok(Self::from_tsr(tsr))
    }

    pub(crate) fn from_tsr(tsr: Tsr) -> Self {
        Self { tsr: (tsr.size() > 0).then_some(tsr) }
    }

    pub fn zeros(shape: Vec<usize>) -> Result<Self> {
        let tsr: Tsr = rt::zeros_f((shape, block_device()))?;
        Ok(Self::from_tsr(tsr))
    }

    pub fn from_fn(shape: Vec<usize>, mut f: impl FnMut(&[usize]) -> f64) -> Result<Self> {
        let data = shape.iter().map(|&n| 0..n).multi_cartesian_product().map(|idx| f(&idx)).collect_vec();
        Self::new(shape, data)
    }

    pub(crate) fn tsr(&self) -> Option<&Tsr> {
        self.tsr.as_ref()
    }

    pub fn shape(&self) -> &[usize] {
        match &self.tsr {
            Some(tsr) => tsr.shape().as_slice(),
            None => &[],
        }
    }

    pub fn ndim(&self) -> usize {
        self.shape().len()
    }

    pub fn size(&self) -> usize {
        self.tsr.as_ref().map_or(0, |tsr| tsr.size())
    }

    pub fn is_empty(&self) -> bool {
        self.tsr.is_none()
    }

    pub fn raw(&self) -> &[f64] {
        match &self.tsr {
            Some(tsr) => tsr.raw().as_slice(),
            None => &[],
        }
    }

    pub fn get(&self, index: &[usize]) -> f64 {
        self.tsr.as_ref().map_or(0.0, |tsr| tsr[index])
    }

    pub fn get_mut(&mut self, index: &[usize]) -> Option<&mut f64> {
        self.tsr.as_mut().map(|tsr| &mut tsr[index])
    }

    pub fn scale(&mut self, fac: f64) -> Result<()> {
        match &mut self.tsr {
            Some(tsr) if fac != 1.0 => Ok(rt::mul_assign_f(tsr, fac)?),
            _ => Ok(()),
        }
    }

    pub fn add_scaled(&mut self, other: &Block, fac: f64) -> Result<()> {
        let Some(src) = &other.tsr else { return Ok(()) };
        let Some(dst) = &mut self.tsr else {
            self.tsr = Some(rt::mul_f(src, fac)?);
            return Ok(());
        };
        if dst.shape() != src.shape() {
            return Err(RiError::ShapeMismatch {
                op: "Block::add_scaled",
                lhs: dst.shape().clone(),
                rhs: src.shape().clone(),
            });
        }
        if fac == 1.0 {
            rt::add_assign_f(dst, src)?;
        } else {
            rt::add_assign_f(dst, &rt::mul_f(src, fac)?)?;
        }
        Ok(())
    }

    pub fn transpose_01(&self) -> Result<Self> {
        let Some(tsr) = &self.tsr else { return Ok(Self::default()) };
        if tsr.ndim() < 2 {
            return Err(RiError::ShapeMismatch { op: "Block::transpose_01", lhs: tsr.shape().clone(), rhs: vec![2] });
        }
        let tsr_t = tsr.swapaxes_f(0, 1)?.into_contig_f(RowMajor)?;
        Ok(Self::from_tsr(tsr_t))
    }

    pub fn max_abs(&self) -> Result<f64> {
        match &self.tsr {
            Some(tsr) => Ok(rt::abs_f(tsr)?.max_all_f()?),
            None => Ok(0.0),
        }
    }

    pub fn dot(&self, other: &Block) -> Result<f64> {
        if self.shape() != other.shape() {
            return Err(RiError::ShapeMismatch {
                op: "Block::dot",
                lhs: self.shape().to_vec(),
                rhs: other.shape().to_vec(),
            });
        }
        match (&self.tsr, &other.tsr) {
            (Some(lhs), Some(rhs)) => Ok(rt::mul_f(lhs, rhs)?.sum_all_f()?),
            _ => Ok(0.0),
        }
    }
}

impl PartialEq for Block {
    fn eq(&self, other: &Self) -> bool {
        self.shape() == other.shape() && self.raw() == other.raw()
    }
}
