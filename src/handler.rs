//! Handler trait and type erasure.
//!
//! # How handlers are stored
//!
//! The router and the middleware chain need to hold handlers of *different*
//! types in one collection, and middleware needs to wrap "whatever comes
//! next" without knowing its type. Both go through [`BoxedHandler`], an
//! `Arc<dyn Handler>`:
//!
//! ```text
//! fn hello(ctx: &mut Context) -> BoxFuture<'_> { … }  ← user writes this
//!        ↓ handler_fn(hello)
//! HandlerFunc(hello)                                  ← adapter, implements Handler
//!        ↓ .into_boxed_handler()
//! Arc<dyn Handler>                                    ← shared across requests
//!        ↓ handler.call(&mut ctx) at request time      ← one vtable dispatch
//! ```
//!
//! The context is borrowed, not moved: every decorator in a chain sees the
//! same `&mut Context` and can inspect the response after the inner handler
//! returns.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;

use crate::context::Context;

/// A heap-allocated, type-erased future borrowing the request [`Context`].
///
/// `Send` lets hyper drive it on any worker thread; `'a` ties it to the
/// borrow of the context it was created from.
pub type BoxFuture<'a> = Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

/// A type-erased handler shared across concurrent requests.
pub type BoxedHandler = Arc<dyn Handler>;

/// Something that can process a request [`Context`].
///
/// Implement it on your own types, or adapt a function with [`handler_fn`].
pub trait Handler: Send + Sync + 'static {
    fn call<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a>;

    /// Moves the handler behind an `Arc`. Already-boxed handlers are returned
    /// as-is.
    fn into_boxed_handler(self) -> BoxedHandler
    where
        Self: Sized,
    {
        Arc::new(self)
    }
}

impl Handler for BoxedHandler {
    fn call<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a> {
        (**self).call(ctx)
    }

    fn into_boxed_handler(self) -> BoxedHandler {
        self
    }
}

// ── Function adapter ──────────────────────────────────────────────────────────

/// Adapter that lets a plain function act as a [`Handler`].
///
/// Obtain one through [`handler_fn`].
#[derive(Clone, Copy)]
pub struct HandlerFunc<F>(F);

/// Adapts a function or closure into a [`Handler`].
///
/// ```rust
/// use chassis::{BoxFuture, Context, StatusCode, handler_fn};
///
/// fn hello(ctx: &mut Context) -> BoxFuture<'_> {
///     Box::pin(async move {
///         ctx.text(StatusCode::OK, "hello");
///     })
/// }
///
/// let by_name = handler_fn(hello);
/// let inline = handler_fn(|ctx| Box::pin(async move {
///     ctx.text(StatusCode::OK, "hi");
/// }));
/// ```
pub fn handler_fn<F>(f: F) -> HandlerFunc<F>
where
    F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a> + Send + Sync + 'static,
{
    HandlerFunc(f)
}

impl<F> Handler for HandlerFunc<F>
where
    F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a> + Send + Sync + 'static,
{
    fn call<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a> {
        (self.0)(ctx)
    }
}

// ── Transport-native adapter ──────────────────────────────────────────────────

/// Adapts a handler written against plain `http` types.
///
/// The wrapped function receives a copy of the request (the body is shared,
/// not copied) and its response is written into the context's
/// [`ResponseWriter`](crate::ResponseWriter): headers first, then status, then
/// body.
pub fn from_http<F, Fut>(f: F) -> HttpHandler<F>
where
    F: Fn(http::Request<Bytes>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = http::Response<Bytes>> + Send + 'static,
{
    HttpHandler(f)
}

/// See [`from_http`].
#[derive(Clone, Copy)]
pub struct HttpHandler<F>(F);

impl<F, Fut> Handler for HttpHandler<F>
where
    F: Fn(http::Request<Bytes>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = http::Response<Bytes>> + Send + 'static,
{
    fn call<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a> {
        let fut = (self.0)(ctx.request().to_http());
        Box::pin(async move {
            let (parts, body) = fut.await.into_parts();
            let writer = ctx.writer_mut();
            writer.headers_mut().extend(parts.headers);
            writer.write_header(parts.status);
            writer.write_body(&body);
        })
    }
}
