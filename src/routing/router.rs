//! Route lookup and dispatch.
//!
//! # Responsibilities
//! - Hold the canned route table
//! - Resolve a request path to a behavior
//!
//! # Design Decisions
//! - Immutable after construction (shared via Arc, no locks)
//! - Exact match first, then longest subtree prefix, then default
//! - Unmatched paths fall back to the default behavior, never an error

use std::collections::HashMap;
use std::time::Duration;

use axum::http::StatusCode;

use crate::config::HandlerConfig;
use crate::routing::matcher::PathPattern;

/// Canned response behaviors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BehaviorKind {
    /// 200 after a short delay.
    Success,
    /// 500 immediately.
    ServerError,
    /// 500 after a delay long enough to trip client timeouts.
    Slow,
    /// 400 for anything unregistered.
    Default,
}

impl BehaviorKind {
    /// Fixed status code written by this behavior.
    pub fn status(self) -> StatusCode {
        match self {
            Self::Success => StatusCode::OK,
            Self::ServerError | Self::Slow => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Default => StatusCode::BAD_REQUEST,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::ServerError => "error",
            Self::Slow => "timeout",
            Self::Default => "default",
        }
    }
}

/// A behavior with its configured latency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Behavior {
    pub kind: BehaviorKind,
    pub delay: Duration,
}

impl Behavior {
    pub fn status(&self) -> StatusCode {
        self.kind.status()
    }
}

/// A registered route.
#[derive(Debug, Clone)]
pub struct Route {
    pub pattern: PathPattern,
    pub behavior: Behavior,
}

/// Outcome of resolving a path.
#[derive(Debug, Clone, Copy)]
pub struct Resolved<'a> {
    pub behavior: Behavior,
    /// The matched pattern, `None` when the default behavior applied.
    pub pattern: Option<&'a str>,
}

/// Immutable route table.
#[derive(Debug)]
pub struct RouteTable {
    routes: Vec<Route>,
    exact: HashMap<String, usize>,
    /// Indices of subtree routes, longest prefix first.
    subtrees: Vec<usize>,
    fallback: Behavior,
}

impl RouteTable {
    /// Build the canned route table with delays taken from `config`.
    pub fn new(config: &HandlerConfig) -> Self {
        let behavior = |kind: BehaviorKind, ms: u64| Behavior {
            kind,
            delay: Duration::from_millis(ms),
        };
        let success = behavior(BehaviorKind::Success, config.success_delay_ms);
        let error = behavior(BehaviorKind::ServerError, config.error_delay_ms);
        let slow = behavior(BehaviorKind::Slow, config.slow_delay_ms);
        let fallback = behavior(BehaviorKind::Default, config.default_delay_ms);

        Self::from_routes(
            [
                ("/url/error/", error),
                ("/url/error", error),
                ("/url/timeout/", slow),
                ("/url/timeout", slow),
                ("/url/example/path/", success),
                ("/url/example/path", success),
            ],
            fallback,
        )
    }

    fn from_routes<'p>(
        routes: impl IntoIterator<Item = (&'p str, Behavior)>,
        fallback: Behavior,
    ) -> Self {
        let routes: Vec<Route> = routes
            .into_iter()
            .map(|(pattern, behavior)| Route {
                pattern: PathPattern::parse(pattern),
                behavior,
            })
            .collect();

        let mut exact = HashMap::new();
        let mut subtrees = Vec::new();
        for (idx, route) in routes.iter().enumerate() {
            // Subtree patterns match their own path exactly too.
            exact.insert(route.pattern.as_str().to_string(), idx);
            if matches!(route.pattern, PathPattern::Subtree(_)) {
                subtrees.push(idx);
            }
        }
        subtrees.sort_by_key(|&idx| std::cmp::Reverse(routes[idx].pattern.specificity()));

        Self {
            routes,
            exact,
            subtrees,
            fallback,
        }
    }

    /// Resolve a request path to the most specific behavior.
    pub fn resolve(&self, path: &str) -> Resolved<'_> {
        let matched = self.exact.get(path).copied().or_else(|| {
            self.subtrees
                .iter()
                .copied()
                .find(|&idx| self.routes[idx].pattern.matches(path))
        });

        match matched {
            Some(idx) => {
                let route = &self.routes[idx];
                Resolved {
                    behavior: route.behavior,
                    pattern: Some(route.pattern.as_str()),
                }
            }
            None => Resolved {
                behavior: self.fallback,
                pattern: None,
            },
        }
    }

    /// Registered routes in registration order.
    pub fn routes(&self) -> impl Iterator<Item = &Route> {
        self.routes.iter()
    }

    /// Behavior applied to unregistered paths.
    pub fn fallback(&self) -> Behavior {
        self.fallback
    }
}
