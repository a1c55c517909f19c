//! Route table.
//!
//! `/health` answers any method. Everything else must be `/todos` or
//! `/todos/<digits>`; the `(method, shape)` pair is then looked up in
//! `ROUTES`. A query string, if any, is split off before matching and
//! handed to the handler as a map.

use crate::http::Method;
use std::collections::HashMap;

/// Which handler serves a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Health,
    List,
    Get,
    Create,
    Update,
    Delete,
}

/// Path shapes under `/todos`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    /// `/todos`
    Collection,
    /// `/todos/<id>`
    Resource,
}

const ROUTES: [(Method, Shape, Endpoint); 5] = [
    (Method::Get, Shape::Collection, Endpoint::List),
    (Method::Get, Shape::Resource, Endpoint::Get),
    (Method::Post, Shape::Collection, Endpoint::Create),
    (Method::Put, Shape::Resource, Endpoint::Update),
    (Method::Delete, Shape::Resource, Endpoint::Delete),
];

/// Result of routing a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch {
    pub endpoint: Endpoint,
    /// Present exactly when the path was `/todos/<id>`; always positive.
    pub id: Option<i64>,
    /// Query parameters, last value wins.
    pub query: HashMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteError {
    /// 404
    NotFound,
    /// 405
    MethodNotAllowed,
}

/// Route a request target.
pub fn route(method: Method, target: &str) -> Result<RouteMatch, RouteError> {
    let (path, query) = split_target(target);

    if path == "/health" {
        return Ok(RouteMatch {
            endpoint: Endpoint::Health,
            id: None,
            query,
        });
    }

    let (shape, id) = match_todos_path(path).ok_or(RouteError::NotFound)?;

    ROUTES
        .iter()
        .find(|(m, s, _)| *m == method && *s == shape)
        .map(|&(_, _, endpoint)| RouteMatch {
            endpoint,
            id,
            query,
        })
        .ok_or(RouteError::MethodNotAllowed)
}

/// `/todos` or `/todos/<digits>`. Identifier 0 and identifiers that do not
/// fit in an `i64` do not match.
fn match_todos_path(path: &str) -> Option<(Shape, Option<i64>)> {
    let rest = path.strip_prefix("/todos")?;
    if rest.is_empty() {
        return Some((Shape::Collection, None));
    }

    let digits = rest.strip_prefix('/')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    match digits.parse::<i64>() {
        Ok(id) if id > 0 => Some((Shape::Resource, Some(id))),
        _ => None,
    }
}

/// Split `path?k=v&k2=v2` into the path and its query parameters.
pub fn split_target(target: &str) -> (&str, HashMap<String, String>) {
    match target.split_once('?') {
        Some((path, query)) => (path, parse_query(query)),
        None => (target, HashMap::new()),
    }
}

/// `k=v&k2=v2`. A pair without `=` maps to an empty value; empty segments
/// are skipped; repeated keys keep the last value. No percent-decoding.
pub fn parse_query(query: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();
    for pair in query.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        params.insert(key.to_string(), value.to_string());
    }
    params
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint(method: Method, target: &str) -> Result<(Endpoint, Option<i64>), RouteError> {
        route(method, target).map(|m| (m.endpoint, m.id))
    }

    #[test]
    fn test_dispatch_table() {
        assert_eq!(endpoint(Method::Get, "/todos"), Ok((Endpoint::List, None)));
        assert_eq!(endpoint(Method::Get, "/todos/5"), Ok((Endpoint::Get, Some(5))));
        assert_eq!(endpoint(Method::Post, "/todos"), Ok((Endpoint::Create, None)));
        assert_eq!(endpoint(Method::Put, "/todos/12"), Ok((Endpoint::Update, Some(12))));
        assert_eq!(endpoint(Method::Delete, "/todos/3"), Ok((Endpoint::Delete, Some(3))));
    }

    #[test]
    fn test_method_not_allowed() {
        for (method, target) in [
            (Method::Post, "/todos/1"),
            (Method::Put, "/todos"),
            (Method::Delete, "/todos"),
            (Method::Options, "/todos"),
            (Method::Options, "/todos/1"),
            (Method::Unknown, "/todos"),
        ] {
            assert_eq!(
                endpoint(method, target),
                Err(RouteError::MethodNotAllowed),
                "{method:?} {target}"
            );
        }
    }

    #[test]
    fn test_health_any_method() {
        for method in [Method::Get, Method::Post, Method::Delete, Method::Unknown] {
            assert_eq!(endpoint(method, "/health"), Ok((Endpoint::Health, None)));
        }
        assert_eq!(endpoint(Method::Get, "/health?verbose=1"), Ok((Endpoint::Health, None)));
    }

    #[test]
    fn test_not_found_shapes() {
        for target in [
            "/",
            "/todo",
            "/todos/",
            "/todos/0",
            "/todos/-1",
            "/todos/abc",
            "/todos/1a",
            "/todos/+1",
            "/todos/1/",
            "/todos/1/extra",
            "/todosx",
            "/health/",
            "/todos/99999999999999999999",
        ] {
            assert_eq!(
                endpoint(Method::Get, target),
                Err(RouteError::NotFound),
                "{target}"
            );
        }
    }

    #[test]
    fn test_leading_zeros() {
        assert_eq!(endpoint(Method::Get, "/todos/007"), Ok((Endpoint::Get, Some(7))));
        assert_eq!(endpoint(Method::Get, "/todos/000"), Err(RouteError::NotFound));
    }

    #[test]
    fn test_query_extraction() {
        let m = route(Method::Get, "/todos?completed=true&priority=high").unwrap();
        assert_eq!(m.endpoint, Endpoint::List);
        assert_eq!(m.query.get("completed").map(String::as_str), Some("true"));
        assert_eq!(m.query.get("priority").map(String::as_str), Some("high"));
    }

    #[test]
    fn test_query_last_wins() {
        let params = parse_query("a=1&a=2&b&&c=x=y");
        assert_eq!(params.get("a").map(String::as_str), Some("2"));
        assert_eq!(params.get("b").map(String::as_str), Some(""));
        assert_eq!(params.get("c").map(String::as_str), Some("x=y"));
        assert_eq!(params.len(), 3);
    }

    #[test]
    fn test_split_on_first_question_mark() {
        let (path, params) = split_target("/todos?x=1?2");
        assert_eq!(path, "/todos");
        assert_eq!(params.get("x").map(String::as_str), Some("1?2"));

        let (path, params) = split_target("/todos/4?");
        assert_eq!(path, "/todos/4");
        assert!(params.is_empty());
    }
}
