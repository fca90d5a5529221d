//! # chassis
//!
//! Thin HTTP handler plumbing on top of hyper and matchit. Nothing more.
//!
//! ## The pieces
//!
//! - [`Context`]: one per request, holding the cancellation token, an optional deadline,
//!   the [`ResponseWriter`] sink, the [`Request`], and the path [`Params`].
//! - [`Handler`]: anything that can process a `&mut Context`. Plain
//!   functions become handlers through [`handler_fn`].
//! - [`Chain`]: an immutable list of middleware, composed outside-in onto a
//!   terminal handler.
//! - [`Router`]: one matchit radix tree per HTTP method.
//! - [`Server`]: tokio accept loop with graceful shutdown.
//!
//! Not included: TLS, body-size limits, rate limiting,
//! timeouts that cut handlers off. The context carries a deadline and a
//! cancellation token; acting on them is the handler's job.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use chassis::{BoxFuture, Context, Router, Server, StatusCode, chain, handler_fn, middleware};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), chassis::Error> {
//!     let api = chain![middleware::trace()];
//!
//!     let app = Router::new()
//!         .get("/users/{id}", api.then(handler_fn(get_user)))
//!         .post("/users",     api.then(handler_fn(create_user)));
//!
//!     Server::bind("0.0.0.0:3000")?.serve(app).await
//! }
//!
//! fn get_user(ctx: &mut Context) -> BoxFuture<'_> {
//!     Box::pin(async move {
//!         let id = ctx.param("id").unwrap_or("unknown").to_owned();
//!         if let Err(e) = ctx.json(StatusCode::OK, &serde_json::json!({ "id": id })) {
//!             tracing::error!("encode user: {e}");
//!             ctx.writer_mut().write_header(StatusCode::INTERNAL_SERVER_ERROR);
//!         }
//!     })
//! }
//!
//! fn create_user(ctx: &mut Context) -> BoxFuture<'_> {
//!     Box::pin(async move {
//!         if ctx.request().body().is_empty() {
//!             ctx.writer_mut().write_header(StatusCode::BAD_REQUEST);
//!             return;
//!         }
//!         ctx.writer_mut().headers_mut().insert("location", "/users/99".parse().unwrap());
//!         ctx.text(StatusCode::CREATED, "created");
//!     })
//! }
//! ```

mod context;
mod error;
mod handler;
mod request;
mod router;
mod server;
mod writer;

pub mod middleware;

pub use context::{Context, Params};
pub use error::Error;
pub use handler::{BoxFuture, BoxedHandler, Handler, HandlerFunc, HttpHandler, from_http, handler_fn};
pub use middleware::{Chain, ChainConstructor};
pub use request::Request;
pub use router::Router;
pub use server::Server;
pub use writer::{ContentType, ResponseWriter};

pub use http::{Method, StatusCode};
pub use tokio_util::sync::CancellationToken;
