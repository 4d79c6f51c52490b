//! Route modules for the Chunkline server

pub mod files;
pub mod health;
pub mod objects;
