//! Request handlers.
//!
//! Each handler turns a routed request into store calls and a `Response`.
//! Client mistakes become 4xx responses here; store failures are returned
//! as `Err` and answered with a generic 500 by the connection worker.

use crate::http::{Request, Response};
use crate::router::{Endpoint, RouteMatch};
use crate::store::{RecordStore, StoreError};
use crate::todo::{Priority, TodoItem};
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, warn};

const SERVICE_NAME: &str = "todo-api";

/// Run the handler selected by the router.
pub fn dispatch(
    route: &RouteMatch,
    request: &Request,
    store: &dyn RecordStore,
) -> Result<Response, StoreError> {
    match (route.endpoint, route.id) {
        (Endpoint::Health, _) => Ok(health(store)),
        (Endpoint::List, _) => list(&route.query, store),
        (Endpoint::Create, _) => create(&request.body, store),
        (Endpoint::Get, Some(id)) => get(id, store),
        (Endpoint::Update, Some(id)) => update(id, &request.body, store),
        (Endpoint::Delete, Some(id)) => delete(id, store),
        // Resource endpoints always carry an id; the router guarantees it.
        (Endpoint::Get | Endpoint::Update | Endpoint::Delete, None) => {
            Ok(Response::error(404, "Not Found"))
        }
    }
}

/// `GET /todos[?completed=..|?priority=..]`
pub fn list(query: &HashMap<String, String>, store: &dyn RecordStore) -> Result<Response, StoreError> {
    let todos = if let Some(completed) = query.get("completed") {
        store.list_by_status(completed == "true")?
    } else if let Some(priority) = query.get("priority") {
        match Priority::parse(priority) {
            Some(priority) => store.list_by_priority(priority)?,
            None => return Ok(Response::error(400, "Invalid priority value")),
        }
    } else {
        store.list()?
    };

    debug!(count = todos.len(), "Listed todos");
    Ok(Response::json(200, &todos))
}

/// `GET /todos/{id}`
pub fn get(id: i64, store: &dyn RecordStore) -> Result<Response, StoreError> {
    match store.get(id)? {
        Some(todo) => Ok(Response::json(200, &todo)),
        None => Ok(todo_not_found()),
    }
}

/// `POST /todos`
pub fn create(body: &[u8], store: &dyn RecordStore) -> Result<Response, StoreError> {
    let candidate = match decode(body) {
        Ok(item) => item,
        Err(response) => return Ok(response),
    };

    let created = store.create(&candidate)?;
    Ok(Response::json(201, &created))
}

/// `PUT /todos/{id}`. The body replaces the record; the URL's identifier
/// wins over any `id` in the body and `created_at` is kept.
pub fn update(id: i64, body: &[u8], store: &dyn RecordStore) -> Result<Response, StoreError> {
    let existing = match store.get(id)? {
        Some(todo) => todo,
        None => return Ok(todo_not_found()),
    };

    let mut candidate = match decode(body) {
        Ok(item) => item,
        Err(response) => return Ok(response),
    };
    candidate.id = id;
    candidate.created_at = existing.created_at;
    candidate.touch();

    if !store.update(&candidate)? {
        return Ok(todo_not_found());
    }

    // Answer with what was persisted.
    match store.get(id)? {
        Some(todo) => Ok(Response::json(200, &todo)),
        None => Ok(todo_not_found()),
    }
}

/// `DELETE /todos/{id}`
pub fn delete(id: i64, store: &dyn RecordStore) -> Result<Response, StoreError> {
    if store.get(id)?.is_none() {
        return Ok(todo_not_found());
    }

    if store.delete(id)? {
        Ok(Response::no_content())
    } else {
        Ok(todo_not_found())
    }
}

#[derive(Debug, Serialize)]
struct Health {
    status: &'static str,
    service: &'static str,
    database: &'static str,
    total_todos: u64,
    completed_todos: u64,
    incomplete_todos: u64,
}

/// `/health`. Always 200; counts are read live.
pub fn health(store: &dyn RecordStore) -> Response {
    let mut connected = store.is_connected();
    let mut count = |result: Result<u64, StoreError>| match result {
        Ok(n) => n,
        Err(e) => {
            warn!(error = %e, "Health count query failed");
            connected = false;
            0
        }
    };

    let total_todos = count(store.count_total());
    let completed_todos = count(store.count_completed());
    let incomplete_todos = count(store.count_incomplete());

    Response::json(
        200,
        &Health {
            status: "healthy",
            service: SERVICE_NAME,
            database: if connected { "connected" } else { "disconnected" },
            total_todos,
            completed_todos,
            incomplete_todos,
        },
    )
}

/// Decode and validate a record body, or produce the 400 to send back.
fn decode(body: &[u8]) -> Result<TodoItem, Response> {
    let item = TodoItem::from_json(body).map_err(|e| {
        debug!(error = %e, "Rejected request body");
        Response::error(400, "Invalid JSON")
    })?;

    item.validate().map_err(|e| {
        debug!(error = %e, "Rejected todo");
        Response::error(400, "Invalid todo data")
    })?;

    Ok(item)
}

fn todo_not_found() -> Response {
    Response::error(404, "Todo not found")
}
