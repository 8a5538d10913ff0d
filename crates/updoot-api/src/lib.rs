pub mod auth;
pub mod context;
pub mod error;
pub mod loader;
pub mod loaders;
pub mod middleware;
pub mod posts;
pub mod routes;
pub mod state;
pub mod validation;
pub mod votes;
