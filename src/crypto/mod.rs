//! Hashing service plus the pieces it is assembled from. Entropy, salt
//! encoding, and the crypt primitive are kept apart so each can be tested and
//! swapped on its own.

pub mod entropy;
pub mod primitive;
pub mod salt;
pub mod service;
