//! Property-based tests for the ranking pipeline.

mod fusion;
mod pipeline;
