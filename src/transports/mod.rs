//! Transport implementations

pub mod ws;
