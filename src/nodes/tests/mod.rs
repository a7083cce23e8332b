//! Tests for the node contract and the built-in node types

pub(crate) mod helpers;
mod itemloop_tests;
