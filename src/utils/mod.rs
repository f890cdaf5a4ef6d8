//! Helpers shared by the experiment binary and the integration tests.
//!
//! - **`family_loader`**: reads JSON fixtures of matrix families with exact
//!   entries and encloses them in balls at a requested precision.
//! - **`scenarios`**: seeded synthetic families with a known answer (block
//!   diagonal, Jordan, generic), hidden behind a random change of basis.

pub mod family_loader;
pub mod scenarios;
