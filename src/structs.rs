use crate::error::Result;
use crate::prelude::*;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/* #region keys */

pub const NDIM: usize = 3;

pub const NPOS: usize = 3;

pub type Atom = usize;
pub type Cell = [i32; NDIM];
pub type AtomCell = (Atom, Cell);

pub type DsMap = BTreeMap<AtomCell, Block>;

pub type Ds = BTreeMap<Atom, DsMap>;

pub type Pos = [f64; NPOS];

pub fn check_period(period: &Cell) -> Result<()> {
    if period.iter().any(|&p| p < 1) {
        return Err(RiError::InvalidArgument(format!("period must be positive, got {period:?}")));
    }
    Ok(())
}

pub fn cell_sub(a: &Cell, b: &Cell, period: &Cell) -> Cell {
    std::array::from_fn(|d| (a[d] - b[d]).rem_euclid(period[d]))
}

pub fn cell_mod(a: &Cell, period: &Cell) -> Cell {
    std::array::from_fn(|d| a[d].rem_euclid(period[d]))
}

pub fn cell_neg(a: &Cell) -> Cell {
    std::array::from_fn(|d| -a[d])
}

/* #endregion */

/* #region labels */

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DsLabel {
    A,
    B,
    A0b0,
    A1b1,
    A1b2,
    A2b1,
    A2b2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Loop3Label {
    A0b0A1b1,
    A0b0A1b2,
    A0b0A2b1,
    A0b0A2b2,
}

impl Loop3Label {
    pub const ALL: [Loop3Label; 4] =
        [Loop3Label::A0b0A1b1, Loop3Label::A0b0A1b2, Loop3Label::A0b0A2b1, Loop3Label::A0b0A2b2];

    pub fn as_str(&self) -> &'static str {
        match self {
            Loop3Label::A0b0A1b1 => "a0b0_a1b1",
            Loop3Label::A0b0A1b2 => "a0b0_a1b2",
            Loop3Label::A0b0A2b1 => "a0b0_a2b1",
            Loop3Label::A0b0A2b2 => "a0b0_a2b2",
        }
    }

    pub fn needs_a_transpose(&self) -> bool {
        matches!(self, Loop3Label::A0b0A1b2 | Loop3Label::A0b0A2b2)
    }

    pub fn needs_b_transpose(&self) -> bool {
        matches!(self, Loop3Label::A0b0A2b1 | Loop3Label::A0b0A2b2)
    }
}

impl fmt::Display for Loop3Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Loop3Label {
    type Err = RiError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Loop3Label::ALL
            .into_iter()
            .find(|label| label.as_str() == s)
            .ok_or_else(|| RiError::InvalidArgument(format!("unknown contraction label `{s}`")))
    }
}

/* #endregion */

/* #region EXX */

pub struct ExxConfig {
    pub threshold_c: f64,
    pub threshold_v: f64,
    pub threshold_d: f64,
    pub threshold_dc: f64,
    pub threshold_dv: f64,
}

impl Default for ExxConfig {
    fn default() -> Self {
        Self { threshold_c: 0.0, threshold_v: 0.0, threshold_d: 0.0, threshold_dc: 0.0, threshold_dv: 0.0 }
    }
}

/* #endregion */
