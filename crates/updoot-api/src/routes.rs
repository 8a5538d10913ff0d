//! The operation table. Every API operation is listed here once, with its
//! method, path, access rule and body shapes; the router is built from this
//! table after it has been checked for collisions.

use std::collections::HashSet;

use anyhow::{Result, bail};
use axum::{
    Json, Router,
    handler::Handler,
    http::Method,
    middleware,
    routing::{MethodFilter, MethodRouter, on},
};
use tracing::debug;

use updoot_types::api::HealthResponse;

use crate::middleware::{require_auth, resolve_session};
use crate::state::AppState;
use crate::{auth, posts, votes};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Public,
    Authenticated,
}

pub struct Operation {
    pub name: &'static str,
    pub method: Method,
    pub path: &'static str,
    pub access: Access,
    pub input: &'static str,
    pub output: &'static str,
    endpoint: Option<MethodRouter<AppState>>,
}

impl Operation {
    fn new<H, T>(
        name: &'static str,
        method: Method,
        path: &'static str,
        access: Access,
        (input, output): (&'static str, &'static str),
        handler: H,
    ) -> Self
    where
        H: Handler<T, AppState>,
        T: 'static,
    {
        let endpoint = MethodFilter::try_from(method.clone())
            .ok()
            .map(|filter| on(filter, handler));

        Self {
            name,
            method,
            path,
            access,
            input,
            output,
            endpoint,
        }
    }
}

pub fn operations() -> Vec<Operation> {
    use Access::{Authenticated, Public};

    vec![
        Operation::new("health", Method::GET, "/health", Public, ("-", "HealthResponse"), health),
        Operation::new("register", Method::POST, "/auth/register", Public, ("RegisterRequest", "UserResponse"), auth::register),
        Operation::new("login", Method::POST, "/auth/login", Public, ("LoginRequest", "UserResponse"), auth::login),
        Operation::new("me", Method::GET, "/auth/me", Public, ("-", "User?"), auth::me),
        Operation::new("posts", Method::GET, "/posts", Public, ("PostsQuery", "PaginatedPosts"), posts::list_posts),
        Operation::new("post", Method::GET, "/posts/{id}", Public, ("-", "PostView?"), posts::get_post),
        Operation::new("createPost", Method::POST, "/posts", Authenticated, ("PostInput", "PostView"), posts::create_post),
        Operation::new("updatePost", Method::PUT, "/posts/{id}", Authenticated, ("PostInput", "PostView?"), posts::update_post),
        Operation::new("deletePost", Method::DELETE, "/posts/{id}", Authenticated, ("-", "Boolean"), posts::delete_post),
        Operation::new("vote", Method::POST, "/posts/{id}/vote", Authenticated, ("VoteRequest", "VoteResponse"), votes::vote),
    ]
}

/// Reject tables with duplicate names, duplicate method+path pairs,
/// malformed paths or methods the router cannot serve.
pub fn validate(ops: &[Operation]) -> Result<()> {
    let mut names = HashSet::new();
    let mut routes = HashSet::new();

    for op in ops {
        if !names.insert(op.name) {
            bail!("operation {:?} is defined more than once", op.name);
        }
        if !routes.insert((op.method.clone(), op.path)) {
            bail!("{} {} is claimed by more than one operation", op.method, op.path);
        }
        if !op.path.starts_with('/') {
            bail!("operation {:?} has a relative path {:?}", op.name, op.path);
        }
        if op.path.matches('{').count() != op.path.matches('}').count() {
            bail!("operation {:?} has unbalanced path parameters in {:?}", op.name, op.path);
        }
        if op.endpoint.is_none() {
            bail!("operation {:?} uses unsupported method {}", op.name, op.method);
        }
    }

    Ok(())
}

/// Build the application router from the operation table.
pub fn router(state: AppState) -> Result<Router> {
    let ops = operations();
    validate(&ops)?;

    let mut router = Router::new();
    for op in ops {
        let Some(mut endpoint) = op.endpoint else {
            bail!("operation {:?} has no endpoint", op.name);
        };
        if op.access == Access::Authenticated {
            endpoint = endpoint.route_layer(middleware::from_fn(require_auth));
        }

        debug!(
            "Route {} {} -> {} ({:?}, {} -> {})",
            op.method, op.path, op.name, op.access, op.input, op.output
        );
        router = router.route(op.path, endpoint);
    }

    Ok(router
        .layer(middleware::from_fn_with_state(state.clone(), resolve_session))
        .with_state(state))
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}
