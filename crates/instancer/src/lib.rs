//! # varstance-instancer
//!
//! Evaluate OpenType variable fonts into static instances.
//!
//! Given a font with an fvar table and either TrueType (`gvar`) or
//! PostScript (`CFF2`) variation data, the evaluator produces the byte
//! tables of a static font for any point in the design space: outlines
//! with tuple deltas or blends applied, metrics with HVAR/VVAR/MVAR
//! deltas applied, variation tables removed.
//!
//! ## Example
//!
//! ```no_run
//! use varstance_instancer::{AxisLocation, Evaluator};
//!
//! let vf_data = std::fs::read("variable.ttf").unwrap();
//! let evaluator = Evaluator::new(&vf_data).unwrap();
//! let instance = evaluator
//!     .evaluate(&[AxisLocation::new("wght", 700.0)])
//!     .unwrap();
//! std::fs::write("static.ttf", instance.bundle.to_bytes().unwrap()).unwrap();
//! ```
//!
//! The one-shot [`instantiate`] function wraps the above; the
//! [`cache`] module provides the fingerprint cache shared by batch
//! evaluation, and [`introspect`] the serializable read model.

mod axis;
mod binding;
pub mod cache;
mod cff2;
mod error;
mod glyf;
mod gvar;
pub mod introspect;
mod instance;
mod iup;
mod ivs;
mod metrics;
mod reader;
mod region;

pub use axis::{Axis, AxisLocation, NormalizedLocation};
pub use binding::NamedInstance;
pub use error::{Diagnostic, Error, Result};
pub use instance::{Evaluator, Instance, InstanceBundle, instantiate};
pub use region::{AxisTent, Region};
