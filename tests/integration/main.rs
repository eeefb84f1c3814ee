//! Integration test suite entry point.

mod caching;
mod degradation;
mod fixture;
mod scenarios;
