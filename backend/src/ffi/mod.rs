//! Python boundary
//!
//! Requests cross as plain strings and results come back as JSON text, so no
//! pipeline type needs a Python mirror.

pub mod pipeline;
pub mod types;
