//! # Parley
//!
//! A peer-assisted chat platform: a central server coordinates
//! registration, rooms, messages, and file offers, and introduces peers
//! to each other for direct voice and file channels, relaying through
//! its rendezvous service when a direct connection fails.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use parley::ParleyServer;
//!
//! # async fn run() -> Result<(), parley::ParleyError> {
//! let server = ParleyServer::builder()
//!     .bind("0.0.0.0:4080")
//!     .relay_bind("0.0.0.0:4081")
//!     .admin_secret("hunter2")
//!     .build()
//!     .await?;
//! server.run().await
//! # }
//! ```

mod admin;
mod commands;
mod error;
mod handler;
mod server;

pub use error::ParleyError;
pub use handler::HandlerCtx;
pub use server::{ParleyServer, ParleyServerBuilder};
