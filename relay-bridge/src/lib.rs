//! Relay Bridge - connects a chat automation driver to a conversational API.
//!
//! The bridge watches chat sessions through an automation driver, forwards
//! user messages to a remote conversational backend, and delivers the
//! asynchronous replies while keeping only a bounded number of sessions
//! open at once.
//!
//! ## Architecture
//!
//! ```text
//! chat program → driver events → engine poll loop → coordinator
//!                                      ↓                ↓
//!                                  discovery      request dispatcher
//!                                                  (worker pool)
//!                                                       ↓
//! chat program ←── driver send ←── coordinator ←── result queue
//! ```
//!
//! The coordinator owns the session tracker (recency-based eviction), the
//! conversation cache (continuation ids per sender), and the dispatcher
//! (bounded worker pool with an unbounded delivery queue). One poll loop
//! drives discovery, inbound handling, and result delivery; nothing in the
//! per-message path is allowed to stall it.

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod backend;
pub mod cache;
pub mod console;
pub mod coordinator;
pub mod dispatch;
pub mod driver;
pub mod engine;
pub mod tracker;

pub use coordinator::SessionCoordinator;
pub use engine::Engine;
