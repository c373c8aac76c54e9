// sr-core: Shared runtime primitives for the pipeline services.
//
// Stop tokens, wall-clock helpers, stable content hashing, and consumer
// naming. Everything here is dependency-light so every other crate can
// pull it in without dragging transports along.

pub mod hash;
pub mod naming;
pub mod stop;
pub mod time;

pub use hash::stable_content_hash;
pub use naming::default_consumer_name;
pub use stop::{StopSource, StopToken};
pub use time::now_rfc3339;
