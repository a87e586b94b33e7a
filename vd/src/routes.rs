//! Static route table for the valve endpoints

use tracing::debug;

/// The fixed set of handlers the device serves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Status,
    Open,
    Close,
}

/// One row of the dispatch table
#[derive(Debug, Clone, Copy)]
pub struct RouteEntry {
    pub method: &'static str,
    pub path: &'static str,
    pub route: Route,
}

pub const ROUTES: &[RouteEntry] = &[
    RouteEntry {
        method: "GET",
        path: "/valve/status",
        route: Route::Status,
    },
    RouteEntry {
        method: "POST",
        path: "/valve/open",
        route: Route::Open,
    },
    RouteEntry {
        method: "POST",
        path: "/valve/close",
        route: Route::Close,
    },
];

/// Outcome of looking up a request in the route table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Handler(Route),
    NotFound,
    MethodNotAllowed,
}

/// Resolve a request against [`ROUTES`]
///
/// The path is matched first (query strings are ignored); a registered path
/// requested with another method is answered 405.
pub fn resolve(method: &str, path: &str) -> Dispatch {
    let path = path.split('?').next().unwrap_or(path);
    let mut path_known = false;

    for entry in ROUTES.iter().filter(|e| e.path == path) {
        path_known = true;
        if entry.method == method {
            debug!(%method, %path, route = ?entry.route, "resolve: matched");
            return Dispatch::Handler(entry.route);
        }
    }

    if path_known {
        debug!(%method, %path, "resolve: method not allowed");
        Dispatch::MethodNotAllowed
    } else {
        debug!(%method, %path, "resolve: no such route");
        Dispatch::NotFound
    }
}
