//! Core routines of the invariant-subspace search, from the echelon form up to
//! the block splittings.

pub mod algebra;
pub mod echelon;
pub mod orbit;
pub mod spectral;
pub mod splitting;
