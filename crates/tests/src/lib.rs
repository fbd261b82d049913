//! # Integration Tests
//!
//! End-to-end runs through the public crates:
//! - configuration loaded from disk
//! - file replay across midnight into memory and file sinks
//! - live UDP capture with future-record truncation

#[cfg(test)]
mod fixtures;
#[cfg(test)]
mod live;
#[cfg(test)]
mod replay;
