//! gwtap-gateway: interception points between an event-stream client and its
//! transport.
//!
//! - [`pipeline::InterceptionPipeline`] rewrites outbound identify frames and
//!   inbound READY dispatches.
//! - [`normalizer::SchemaNormalizer`] folds capability-dependent READY shapes
//!   into one.
//! - [`observer::ConnectionStateObserver`] taps the transport's lifecycle.
//! - [`replay`] drives whole recorded sessions through the above.

pub mod config;
pub mod error;
pub mod normalizer;
pub mod observer;
pub mod pipeline;
pub mod replay;
