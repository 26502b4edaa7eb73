//! Route lookup.
//!
//! # Responsibilities
//! - Store compiled routes
//! - Find the route owning a request path
//! - Return an explicit no-match
//!
//! # Design Decisions
//! - Immutable after construction (shared via `Arc` without locks)
//! - Routes are ordered longest mount first, so the most specific wins
//! - O(n) scan, acceptable for typical route counts

use crate::config::RouteConfig;
use crate::routing::matcher::MountMatcher;

/// A compiled route: requests below `matcher` are served from `bucket`.
#[derive(Debug, Clone)]
pub struct Route {
    pub name: String,
    pub matcher: MountMatcher,
    pub bucket: String,
}

#[derive(Debug, Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    pub fn from_config(configs: &[RouteConfig]) -> Self {
        let mut routes: Vec<Route> = configs
            .iter()
            .map(|c| Route {
                name: c.name.clone(),
                matcher: MountMatcher::new(c.mount.clone()),
                bucket: c.bucket.clone(),
            })
            .collect();
        // Stable sort keeps config order between equal-length mounts.
        routes.sort_by(|a, b| b.matcher.mount().len().cmp(&a.matcher.mount().len()));
        tracing::debug!(routes = routes.len(), "Router compiled");
        Self { routes }
    }

    /// The route whose mount owns `path`, if any.
    pub fn resolve(&self, path: &str) -> Option<&Route> {
        self.routes.iter().find(|r| r.matcher.matches(path))
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }
}
