//! FireChat shared library: ids, wire records and the cross-crate error type.

pub mod api;
pub mod constants;
pub mod error;
pub mod ids;
