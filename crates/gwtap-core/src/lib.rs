//! gwtap-core: pure building blocks for gateway payload interception.
//!
//! Wire types, the negotiated capability bitmask, the call-trace tree and the
//! deep-copy engine. No I/O and no logging live here; the `gwtap-gateway`
//! crate wires these together around the transport's interception points.

pub mod call_trace;
pub mod capability;
pub mod deep_copy;
pub mod error;
pub mod types;

pub use capability::{CapabilityFlag, CapabilityNegotiator};
pub use deep_copy::{DeepCopy, Delegate};
pub use error::{CapabilityError, TraceError};
pub use types::{ConnectionState, DispatchKind, Opcode, OutboundPayload};
