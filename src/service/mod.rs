//! Backend service role.
//!
//! # Data Flow
//! ```text
//! FrameServer (net) → handler.rs
//!     → sealed transit frame? send it straight back
//!     → classifier.rs on the blocking pool
//!     → JSON success / error frame
//! ```

pub mod classifier;
pub mod handler;

pub use classifier::{Classification, Classifier, ClassifyError, SignatureClassifier};
pub use handler::{ServiceHandler, ServiceResponse};
