//! End-to-end tests for publisher-verifier.
//!
//! Tests run against a local mockito HTTP server standing in for the
//! publisher service, using the real reqwest transport.

mod harness;
mod verification_tests;

pub use harness::TestHarness;
