//! Declarative fallback chains for finding UI targets in an unstable DOM.
//!
//! A `LocatorSpec` is data: an ordered list of `Strategy` candidates. One
//! generic algorithm in `resolver` evaluates any spec, so adding a fallback
//! never means adding control flow.

pub mod resolver;
pub mod strategy;

pub use resolver::{LocatorResolver, Resolved};
pub use strategy::{Candidate, LocatorSpec, Strategy, TextPattern, WaitState};
