//! Integration tests for tokbuk-http
//!
//! Starts a real `AdmissionServer` on an ephemeral port and drives it with
//! reqwest, using a `ManualClock` so that refill is deterministic.

mod common;

mod test_admission;
mod test_isolation;
