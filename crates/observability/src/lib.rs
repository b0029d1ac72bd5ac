//! Process-wide tracing/logging setup shared by anything that embeds the
//! dispatch core (workers, schedulers, test harnesses).

pub mod tracing;

pub use crate::tracing::{init, init_with_filter};
