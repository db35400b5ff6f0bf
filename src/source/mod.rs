//! Frame sources

pub mod dump;
