#![forbid(unsafe_code)]

pub mod logging;
pub mod observability;
