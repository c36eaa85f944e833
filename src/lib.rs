//! # backpressure-viz: flow control between two bounded stages
//!
//! A source generates fixed-size chunks into a bounded buffer; a sink pulls
//! them into its own bounded buffer and processes them one at a time. When
//! the sink cannot keep up, the source is suspended; when the sink drains,
//! the source resumes. Errors on either side sever the link and are reported
//! as events.
//!
//! ## Architecture
//!
//! - **Pipeline**: stages, buffers and the synchronous flow controller
//! - **Runner**: a tokio task that simulates latency and owns all mutation
//! - **Observer**: polls snapshots and renders them, read-only
//! - **Communication**: `watch` for snapshots, crossbeam for events
//!
//! ## Example
//!
//! ```no_run
//! use backpressure_viz::{PipeBuilder, PipeConfig};
//!
//! # async fn demo() -> backpressure_viz::Result<()> {
//! let report = PipeBuilder::new(PipeConfig::default()).run().await?;
//! println!("{:?} after {:?}", report.outcome, report.duration);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod observer;
pub mod pipeline;
pub mod types;

// Re-export commonly used types
pub use config::{FaultConfig, PipeConfig};
pub use error::{BackpressureError, Result, ResultExt};
pub use observer::{Observer, OutputMode};
pub use pipeline::{PipeBuilder, PipeEvent, PipeHandle, PipeSnapshot, RunReport};
pub use types::{Outcome, StageId, TransferResult};
