#![allow(unused)]

/* #region for API callers */

pub use crate::cell_nearest::{CellNearest, MinimumImage};
pub use crate::error::RiError;
pub use crate::exx::Exx;
pub use crate::lri::{Distribute, Lri, SerialDistribute};
pub use crate::loop3::{Coefficient, coefficient};
pub use crate::structs::{Atom, AtomCell, Cell, Ds, DsLabel, DsMap, ExxConfig, Loop3Label, NDIM, NPOS, Pos};
pub use crate::structs::{cell_mod, cell_neg, cell_sub, check_period};
pub use crate::tensor::Block;

/* #endregion */

/* #region for developers */

// RSTSR backend selection
#[cfg(not(feature = "use_openblas"))]
pub(crate) type DeviceTsr = DeviceFaer;
#[cfg(feature = "use_openblas")]
pub(crate) type DeviceTsr = DeviceOpenBLAS;

pub(crate) use rayon::prelude::*;
pub(crate) use rstsr::prelude::*;

pub(crate) use crate::*;

pub(crate) type Tsr<D = IxD> = Tensor<f64, DeviceTsr, D>;
pub(crate) type TsrView<'a, D = IxD> = TensorView<'a, f64, DeviceTsr, D>;

/* #endregion */
