//! End-to-end tests for the kiln optimizer live under `tests/`.
