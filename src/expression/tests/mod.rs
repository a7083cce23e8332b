//! Tests for the expression engine
//!
//! Organized by feature area

mod helpers;
mod operator_tests;
