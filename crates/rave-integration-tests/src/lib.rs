//! End-to-end tests for the controller live in `tests/`.
