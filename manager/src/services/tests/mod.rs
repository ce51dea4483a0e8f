//! Unit tests for the production service implementations
