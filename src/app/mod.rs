//! Client facade composing the synchronization components

pub mod client;

pub use client::GameClient;
