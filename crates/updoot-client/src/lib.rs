//! Client for the updoot API: a reqwest transport behind a normalized cache
//! that merges feed pages and applies votes optimistically.

pub mod cache;
pub mod client;
pub mod error;
pub mod optimistic;
pub mod pagination;

pub use client::{Feed, UpdootClient};
pub use error::ClientError;
