//! The development server.
//!
//! Every request runs through one [`Pipeline`], built once per server:
//!
//! ```text
//! request ─▶ 1. Mount → RequestHandler   render through the cache (blocking pool)
//!              │ declined
//!              ▼
//!            2. static files             ServeDir over the public directory,
//!              │ refused / missing       refusing private paths and raw sources
//!              ▼
//!            3. 404
//! ```
//!
//! Render errors end the pipeline with a 500 carrying the error text.
//!
//! [`serve`] wires the pipeline to a watcher: file changes flow from
//! [`SourceWatcher`] through a channel into [`RenderCache::listen`], so the
//! next request after an edit renders fresh.

use crate::cache::RenderCache;
use crate::config::{ConfigError, Project};
use crate::handler::{Mount, Outcome, RequestHandler, strip_mount_prefix};
use crate::render::{Registry, SiteRenderer};
use crate::resolve::{PathResolver, normalize_url};
use crate::watch::{SourceWatcher, WatchError};
use axum::Router;
use axum::body::Body;
use axum::extract::{Request, State};
use axum::response::{IntoResponse, Response};
use http::{StatusCode, Uri};
use std::future::Future;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::sync::{Arc, mpsc};
use thiserror::Error;
use tower::ServiceExt;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

pub const DEFAULT_IP: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);
pub const DEFAULT_PORT: u16 = 9966;

#[derive(Error, Debug)]
pub enum ServeError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
    #[error("Watch error: {0}")]
    Watch(#[from] WatchError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServeOptions {
    pub addr: SocketAddr,
    /// Serve the site under this URL prefix instead of `/`.
    pub mount: Option<String>,
}

impl Default for ServeOptions {
    fn default() -> Self {
        Self {
            addr: SocketAddr::new(DEFAULT_IP, DEFAULT_PORT),
            mount: None,
        }
    }
}

/// The ordered request pipeline.
pub struct Pipeline {
    mount: Mount,
    static_files: ServeDir,
}

impl Pipeline {
    pub fn new(mount: Mount) -> Self {
        let static_files = ServeDir::new(mount.handler().resolver().root());
        Self {
            mount,
            static_files,
        }
    }

    pub fn mount(&self) -> &Mount {
        &self.mount
    }

    pub async fn respond(self: Arc<Self>, request: Request) -> Response {
        let url = request
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| "/".to_string());

        let pipeline = Arc::clone(&self);
        let render_url = url.clone();
        let rendered =
            tokio::task::spawn_blocking(move || pipeline.mount.handle(&render_url)).await;

        match rendered {
            Ok(Ok(Outcome::Handled(response))) => return response.map(Body::from),
            Ok(Ok(Outcome::Declined)) => {}
            Ok(Err(err)) => {
                tracing::error!(url = %url, "render failed: {err}");
                return (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response();
            }
            Err(err) => {
                tracing::error!(url = %url, "render task failed: {err}");
                return StatusCode::INTERNAL_SERVER_ERROR.into_response();
            }
        }

        self.serve_static(request, &url).await
    }

    async fn serve_static(&self, mut request: Request, url: &str) -> Response {
        let local = match self.mount.prefix() {
            Some(prefix) => strip_mount_prefix(prefix, url),
            None => Some(url.to_string()),
        };
        let Some(local) = local else {
            return StatusCode::NOT_FOUND.into_response();
        };
        if self.refuses(&normalize_url(&local)) {
            return StatusCode::NOT_FOUND.into_response();
        }
        match local.parse::<Uri>() {
            Ok(uri) => *request.uri_mut() = uri,
            Err(_) => return StatusCode::NOT_FOUND.into_response(),
        }

        match self.static_files.clone().oneshot(request).await {
            Ok(response) => response.map(Body::new),
            Err(never) => match never {},
        }
    }

    /// Private paths are never published. Sources are only published
    /// rendered, unless ignored (vendor files are served as written).
    fn refuses(&self, normalized: &str) -> bool {
        let resolver = self.mount.handler().resolver();
        let rel = Path::new(normalized.trim_start_matches('/'));
        resolver.ignore().is_private(rel)
            || (resolver.registry().is_compilable(rel) && !resolver.ignore().is_ignored(rel))
    }
}

/// The axum router for a pipeline.
pub fn router(pipeline: Arc<Pipeline>) -> Router {
    Router::new()
        .fallback(respond)
        .layer(TraceLayer::new_for_http())
        .with_state(pipeline)
}

async fn respond(State(pipeline): State<Arc<Pipeline>>, request: Request) -> Response {
    pipeline.respond(request).await
}

/// Build the pipeline for `project` around `cache`.
pub fn pipeline_for(project: &Project, cache: Arc<RenderCache>, mount: Option<&str>) -> Pipeline {
    let resolver = PathResolver::new(
        &project.public_dir,
        Arc::new(Registry::standard()),
        project.ignore_rules(&[]),
    );
    let handler = RequestHandler::new(Arc::new(resolver), cache);
    Pipeline::new(Mount::new(mount, handler))
}

/// Serve `project` until `shutdown` resolves.
pub async fn serve(
    project: Project,
    options: ServeOptions,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), ServeError> {
    let renderer = SiteRenderer::new(
        &project.public_dir,
        Arc::new(Registry::standard()),
        project.config.globals.clone(),
    );
    let cache = Arc::new(RenderCache::new(Arc::new(renderer)));

    let (tx, rx) = mpsc::channel();
    let watcher = SourceWatcher::start(&project.public_dir, tx)?;
    cache.listen(rx)?;

    let pipeline = Arc::new(pipeline_for(&project, Arc::clone(&cache), options.mount.as_deref()));
    let listener = tokio::net::TcpListener::bind(options.addr).await?;
    tracing::info!(
        public = %project.public_dir.display(),
        "serving at http://{}{}",
        listener.local_addr()?,
        pipeline.mount().prefix().unwrap_or("/")
    );

    axum::serve(listener, router(pipeline).into_make_service())
        .with_graceful_shutdown(shutdown)
        .await?;

    drop(watcher);
    tracing::info!("render cache: {}", cache.stats());
    Ok(())
}
