//! Integration tests for triad-model
//!
//! Wires a workspace subscriber, its sync set, a background event handler
//! and a recording presentation together, and checks what the presentation
//! is told.

mod common;

mod test_composite;
mod test_markers;
