//! tidechat
//!
//! Terminal client for a small real-time chat server: optimistic sends
//! over REST, live updates over a WebSocket push channel, and a
//! virtualized, banded timeline renderer.

pub mod channel;
pub mod config;
pub mod logging;
pub mod model;
pub mod repo;
pub mod rest;
pub mod state;
pub mod timeline;
pub mod usecase;
pub mod view;
pub mod view_state;
pub mod wire;

#[cfg(test)]
mod tests;
