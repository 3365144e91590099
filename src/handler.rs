//! Request handling: resolve, render through the cache, respond.
//!
//! [`RequestHandler::handle`] answers one request path with one of three
//! outcomes:
//!
//! - `Ok(Outcome::Handled(response))`: 200 with `Content-Type` and an exact
//!   `Content-Length`.
//! - `Ok(Outcome::Declined)`: no source file matches; the next handler in
//!   the pipeline gets the request.
//! - `Err(RenderError)`: a source matched but failed to render.
//!
//! [`Mount`] serves a handler under a URL prefix. Requests outside the
//! prefix are declined without touching the resolver.

use crate::cache::RenderCache;
use crate::render::RenderError;
use crate::resolve::PathResolver;
use http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use http::{Response, StatusCode};
use std::sync::Arc;

#[derive(Debug)]
pub enum Outcome {
    Handled(Response<Vec<u8>>),
    Declined,
}

impl Outcome {
    pub fn is_declined(&self) -> bool {
        matches!(self, Outcome::Declined)
    }
}

#[derive(Clone)]
pub struct RequestHandler {
    resolver: Arc<PathResolver>,
    cache: Arc<RenderCache>,
}

impl RequestHandler {
    pub fn new(resolver: Arc<PathResolver>, cache: Arc<RenderCache>) -> Self {
        Self { resolver, cache }
    }

    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    pub fn cache(&self) -> &Arc<RenderCache> {
        &self.cache
    }

    /// Answer `url` (path plus optional query). Blocks while rendering.
    pub fn handle(&self, url: &str) -> Result<Outcome, RenderError> {
        let Some(source) = self.resolver.resolve(url) else {
            return Ok(Outcome::Declined);
        };
        let page = self.cache.render(&source)?;

        let response = Response::builder()
            .status(StatusCode::OK)
            .header(CONTENT_TYPE, page.content_type.as_str())
            .header(CONTENT_LENGTH, page.body.len())
            .body(page.body.to_vec())
            .map_err(|e| RenderError::failed(&source, e.to_string()))?;
        Ok(Outcome::Handled(response))
    }
}

/// A handler served under a URL prefix such as `/docs`.
#[derive(Clone)]
pub struct Mount {
    prefix: Option<String>,
    handler: RequestHandler,
}

impl Mount {
    /// Mount `handler` at `prefix`. An empty prefix or `/` mounts at the root.
    pub fn new(prefix: Option<&str>, handler: RequestHandler) -> Self {
        let prefix = prefix
            .map(|p| format!("/{}", p.trim_matches('/')))
            .filter(|p| p != "/");
        Self { prefix, handler }
    }

    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    pub fn handler(&self) -> &RequestHandler {
        &self.handler
    }

    /// Handle `url` if it lies under the prefix. The caller's URL is left as
    /// it was for whoever handles a declined request.
    pub fn handle(&self, url: &str) -> Result<Outcome, RenderError> {
        match &self.prefix {
            None => self.handler.handle(url),
            Some(prefix) => match strip_mount_prefix(prefix, url) {
                Some(rest) => self.handler.handle(&rest),
                None => Ok(Outcome::Declined),
            },
        }
    }
}

/// `url` relative to `prefix`, or `None` when it lies outside. The prefix
/// must end at a segment boundary: `/docs` matches `/docs`, `/docs/a` and
/// `/docs?x`, but not `/docsx`.
pub fn strip_mount_prefix(prefix: &str, url: &str) -> Option<String> {
    let rest = url.strip_prefix(prefix)?;
    if rest.is_empty() {
        return Some("/".to_string());
    }
    match rest.as_bytes()[0] {
        b'/' => Some(rest.to_string()),
        b'?' | b'#' => Some(format!("/{rest}")),
        _ => None,
    }
}
