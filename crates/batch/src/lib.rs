//! # varstance-batch
//!
//! Parallel fan-out of static-instance builds.
//!
//! One task per design-space point, scheduled on a worker pool; every task
//! consults the shared fingerprint cache before invoking the evaluator.
//! Results come back in input order and a failing task never disturbs its
//! siblings.
//!
//! ## Example
//!
//! ```no_run
//! use varstance_batch::{BatchConfig, BatchEngine};
//! use varstance_instancer::AxisLocation;
//!
//! let vf_data = std::fs::read("variable.ttf").unwrap();
//! let engine = BatchEngine::new(BatchConfig::default()).unwrap();
//! let points: Vec<Vec<AxisLocation>> = (1..=9)
//!     .map(|w| vec![AxisLocation::new("wght", f64::from(w) * 100.0)])
//!     .collect();
//! for outcome in engine.run(&vf_data, &points).unwrap() {
//!     match &outcome.result {
//!         Ok(bytes) => println!("instance {}: {} bytes", outcome.index, bytes.len()),
//!         Err(error) => eprintln!("instance {}: {error}", outcome.index),
//!     }
//! }
//! ```

mod engine;

pub use engine::{BatchConfig, BatchEngine, BatchError, BatchOutcome, CancellationToken};
pub use varstance_instancer::cache::{CacheConfig, CacheStats};
