//! End-to-end tests for cogniot. See `tests/`.
