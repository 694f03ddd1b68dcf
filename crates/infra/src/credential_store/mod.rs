//! Persistent `CredentialStore` implementations.
//!
//! The in-memory implementation lives next to the trait in `flowforge-identity`.

pub mod postgres;
