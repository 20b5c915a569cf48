//! Value Codec
//!
//! The serialization envelope shared by every tier (see [`ValueCodec`]) and the
//! registry that turns stored entity records back into typed values.

mod json;
mod registry;

pub use json::ValueCodec;
pub use registry::EntityRegistry;
