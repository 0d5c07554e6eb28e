//! Integration test common infrastructure.
//!
//! Provides an in-process router with an inspectable store and outbound
//! queue, and listener clients that collect notifications.

pub mod client;
pub mod server;

#[allow(unused_imports)]
pub use client::TestClient;
#[allow(unused_imports)]
pub use server::{TestRouter, addr};
