//! Runtime Module - Mutator-Side Integration
//!
//! What happens around reference processing on the mutator side:
//! - Consuming the pending list ([`ReferenceHandler`])
//! - Pause requests that tell precleaning to yield ([`Safepoint`])

pub mod reference_handler;
pub mod safepoint;

pub use reference_handler::{FinalizerFn, HandlerStats, ReferenceHandler, ReferenceQueue};
pub use safepoint::Safepoint;
