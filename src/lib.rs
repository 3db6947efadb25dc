//! Salted bcrypt hashing with tiered entropy sourcing. The Blowfish primitive
//! itself comes from the `bcrypt` crate; this crate owns salt generation,
//! setting-string encoding, and verification.

pub mod config;
pub mod crypto;
