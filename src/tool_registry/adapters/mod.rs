//! Adapter implementations for tool registry ports.

pub mod memory;
pub mod postgres;
