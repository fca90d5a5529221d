//! Minimal chassis example: JSON endpoints behind a middleware chain.
//!
//! Run with:
//!   cargo run --example basic
//!
//! Try:
//!   curl http://localhost:3000/users/42
//!   curl -X POST http://localhost:3000/users -d '{"name":"alice"}'
//!   curl -H 'authorization: Bearer x' -X DELETE http://localhost:3000/users/42
//!   curl http://localhost:3000/slow

use std::time::Duration;

use chassis::middleware::{self, Next};
use chassis::{BoxFuture, Context, Router, Server, StatusCode, chain, handler_fn};
use serde::{Deserialize, Serialize};

#[derive(Deserialize, Serialize)]
struct User {
    id: String,
    name: String,
}

#[derive(Deserialize)]
struct NewUser {
    name: String,
}

#[tokio::main]
async fn main() -> Result<(), chassis::Error> {
    tracing_subscriber::fmt::init();

    let public = chain![middleware::trace()];
    let admin = public.append([middleware::boxed(middleware::from_fn(require_auth))]);

    let app = Router::new()
        .deadline(Duration::from_secs(2))
        .get("/users/{id}",    public.then(handler_fn(get_user)))
        .post("/users",        public.then(handler_fn(create_user)))
        .delete("/users/{id}", admin.then(handler_fn(delete_user)))
        .get("/slow",          public.then(handler_fn(slow)));

    Server::bind("0.0.0.0:3000")?.serve(app).await
}

// Rejects requests without an authorization header before they reach the
// handler.
fn require_auth<'a>(ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a> {
    Box::pin(async move {
        if ctx.request().header("authorization").is_none() {
            ctx.text(StatusCode::UNAUTHORIZED, "missing authorization");
            return;
        }
        next.run(ctx).await;
    })
}

// GET /users/{id}
fn get_user(ctx: &mut Context) -> BoxFuture<'_> {
    Box::pin(async move {
        let user = User {
            id: ctx.param("id").unwrap_or("unknown").to_owned(),
            name: "alice".to_owned(),
        };
        if let Err(e) = ctx.json(StatusCode::OK, &user) {
            tracing::error!("encode user: {e}");
            ctx.writer_mut().write_header(StatusCode::INTERNAL_SERVER_ERROR);
        }
    })
}

// POST /users
fn create_user(ctx: &mut Context) -> BoxFuture<'_> {
    Box::pin(async move {
        let input: NewUser = match serde_json::from_slice(ctx.request().body()) {
            Ok(input) => input,
            Err(e) => {
                ctx.text(StatusCode::BAD_REQUEST, format!("invalid body: {e}"));
                return;
            }
        };
        let user = User { id: "99".to_owned(), name: input.name };
        if let Err(e) = ctx.json(StatusCode::CREATED, &user) {
            tracing::error!("encode user: {e}");
            ctx.writer_mut().write_header(StatusCode::INTERNAL_SERVER_ERROR);
        }
    })
}

// DELETE /users/{id} → 204 No Content
fn delete_user(ctx: &mut Context) -> BoxFuture<'_> {
    Box::pin(async move { ctx.writer_mut().write_header(StatusCode::NO_CONTENT) })
}

// GET /slow, gives up when the router's deadline passes.
fn slow(ctx: &mut Context) -> BoxFuture<'_> {
    Box::pin(async move {
        tokio::select! {
            () = tokio::time::sleep(Duration::from_secs(5)) => {
                ctx.text(StatusCode::OK, "finished");
            }
            () = ctx.done() => {
                ctx.text(StatusCode::SERVICE_UNAVAILABLE, "deadline exceeded");
            }
        }
    })
}
