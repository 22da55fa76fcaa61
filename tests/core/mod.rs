//! Core module tests
//!
//! Tests for:
//! - Name normalization and denormalization
//! - Expression evaluation
//! - Formula recalculation and failure isolation
//! - Formula file persistence
//! - Trace transforms and autoscaling

pub mod autoscale_tests;
pub mod engine_tests;
pub mod expression_tests;
pub mod formula_tests;
pub mod transform_tests;
