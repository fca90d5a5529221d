//! Middleware composition.
//!
//! Middleware is a [`ChainConstructor`]: something that takes the handler
//! that comes next and returns a handler wrapping it. A [`Chain`] is an
//! ordered list of constructors, built once at startup and applied to a
//! terminal handler with [`Chain::then`].
//!
//! The first constructor in a chain is the outermost wrapper:
//!
//! ```text
//! Chain::new([a, b, c]).then(h)   ==   a(b(c(h)))
//!
//! request  ──▶ a ──▶ b ──▶ c ──▶ h
//! response ◀── a ◀── b ◀── c ◀──┘
//! ```
//!
//! Chains are values. [`Chain::append`] and [`Chain::extend`] return a new
//! chain and leave the receiver alone, so a shared base chain can be
//! specialised per route:
//!
//! ```rust
//! use chassis::{BoxFuture, Context, StatusCode, chain, handler_fn};
//! use chassis::middleware::{self, Next};
//!
//! fn require_token<'a>(ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a> {
//!     Box::pin(async move {
//!         if ctx.request().header("authorization").is_none() {
//!             ctx.text(StatusCode::UNAUTHORIZED, "missing token");
//!             return;
//!         }
//!         next.run(ctx).await;
//!     })
//! }
//!
//! fn me(ctx: &mut Context) -> BoxFuture<'_> {
//!     Box::pin(async move { ctx.text(StatusCode::OK, "me") })
//! }
//!
//! let base = chain![middleware::trace()];
//! let authed = base.append([middleware::boxed(middleware::from_fn(require_token))]);
//!
//! let public = base.then(handler_fn(me));
//! let private = authed.then(handler_fn(me));
//! assert_eq!(base.len(), 1);
//! ```

use std::sync::Arc;

use crate::context::Context;
use crate::handler::{BoxFuture, BoxedHandler, Handler};

mod trace;

pub use trace::trace;

// ── ChainConstructor ──────────────────────────────────────────────────────────

/// Wraps a handler in another handler.
///
/// Implemented for every `Fn(BoxedHandler) -> BoxedHandler`; see also
/// [`from_fn`] for middleware that only needs to run code around the next
/// handler.
pub trait ChainConstructor: Send + Sync + 'static {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler;
}

impl<F> ChainConstructor for F
where
    F: Fn(BoxedHandler) -> BoxedHandler + Send + Sync + 'static,
{
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        self(next)
    }
}

/// A type-erased constructor, as stored in a [`Chain`].
pub type BoxedConstructor = Arc<dyn ChainConstructor>;

/// Type-erases a constructor so constructors of different types can share
/// one list.
pub fn boxed(constructor: impl ChainConstructor) -> BoxedConstructor {
    Arc::new(constructor)
}

// ── Chain ─────────────────────────────────────────────────────────────────────

/// An immutable, ordered list of middleware.
#[derive(Clone, Default)]
pub struct Chain {
    constructors: Vec<BoxedConstructor>,
}

impl Chain {
    /// Captures `constructors` in the order given. See also [`chain!`](crate::chain).
    pub fn new(constructors: impl IntoIterator<Item = BoxedConstructor>) -> Self {
        Self { constructors: constructors.into_iter().collect() }
    }

    /// Wraps `handler` in every constructor of the chain, last one innermost.
    ///
    /// An empty chain hands `handler` back unwrapped.
    pub fn then(&self, handler: impl Handler) -> BoxedHandler {
        self.constructors
            .iter()
            .rev()
            .fold(handler.into_boxed_handler(), |next, constructor| constructor.wrap(next))
    }

    /// A new chain with `more` after this chain's constructors.
    pub fn append(&self, more: impl IntoIterator<Item = BoxedConstructor>) -> Self {
        let more = more.into_iter();
        let mut constructors = Vec::with_capacity(self.constructors.len() + more.size_hint().0);
        constructors.extend(self.constructors.iter().cloned());
        constructors.extend(more);
        Self { constructors }
    }

    /// A new chain with `other`'s constructors after this chain's.
    pub fn extend(&self, other: &Chain) -> Self {
        self.append(other.constructors.iter().cloned())
    }

    pub fn len(&self) -> usize { self.constructors.len() }
    pub fn is_empty(&self) -> bool { self.constructors.is_empty() }
}

/// Builds a [`Chain`] from constructors of any type, outermost first.
///
/// ```rust
/// use chassis::chain;
/// use chassis::middleware::trace;
///
/// let empty = chain![];
/// let traced = chain![trace()];
/// assert!(empty.is_empty());
/// assert_eq!(traced.len(), 1);
/// ```
#[macro_export]
macro_rules! chain {
    ($($constructor:expr),* $(,)?) => {
        $crate::middleware::Chain::new([$($crate::middleware::boxed($constructor)),*])
    };
}

// ── from_fn ───────────────────────────────────────────────────────────────────

/// The rest of the chain, as seen from inside a [`from_fn`] middleware.
#[derive(Clone, Copy)]
pub struct Next<'a>(&'a dyn Handler);

impl<'a> Next<'a> {
    /// Runs the wrapped handler, and everything inside it, on `ctx`.
    pub fn run<'b>(self, ctx: &'b mut Context) -> BoxFuture<'b>
    where
        'a: 'b,
    {
        self.0.call(ctx)
    }
}

/// Builds middleware from a function that receives the context and the
/// [`Next`] handler.
///
/// Code before `next.run(ctx).await` sees the request on the way in; code
/// after it sees the response the inner handlers produced. Not calling
/// `next` short-circuits the rest of the chain.
pub fn from_fn<F>(f: F) -> impl ChainConstructor
where
    F: for<'a> Fn(&'a mut Context, Next<'a>) -> BoxFuture<'a> + Send + Sync + 'static,
{
    let f = Arc::new(f);
    move |next: BoxedHandler| -> BoxedHandler {
        Arc::new(FromFn { f: Arc::clone(&f), next })
    }
}

struct FromFn<F> {
    f: Arc<F>,
    next: BoxedHandler,
}

impl<F> Handler for FromFn<F>
where
    F: for<'a> Fn(&'a mut Context, Next<'a>) -> BoxFuture<'a> + Send + Sync + 'static,
{
    fn call<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a> {
        (self.f)(ctx, Next(&*self.next))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use bytes::Bytes;
    use http::{HeaderValue, StatusCode};

    use super::*;
    use crate::context::Params;
    use crate::handler::handler_fn;
    use crate::writer::ResponseWriter;

    type Log = Arc<Mutex<Vec<String>>>;

    fn context() -> Context {
        let req = http::Request::builder().uri("/").body(Bytes::new()).unwrap();
        Context::new(ResponseWriter::new(), req.into(), Params::new())
    }

    /// Records `before:<name>` and `after:<name>` around the next handler.
    fn recorder(name: &'static str, log: &Log) -> BoxedConstructor {
        let log = Arc::clone(log);
        boxed(move |next: BoxedHandler| -> BoxedHandler {
            let log = Arc::clone(&log);
            handler_fn(move |ctx| {
                let log = Arc::clone(&log);
                let next = Arc::clone(&next);
                Box::pin(async move {
                    log.lock().unwrap().push(format!("before:{name}"));
                    next.call(ctx).await;
                    log.lock().unwrap().push(format!("after:{name}"));
                })
            })
            .into_boxed_handler()
        })
    }

    fn terminal(log: &Log) -> BoxedHandler {
        let log = Arc::clone(log);
        handler_fn(move |ctx| {
            let log = Arc::clone(&log);
            Box::pin(async move {
                log.lock().unwrap().push("handler".to_owned());
                ctx.text(StatusCode::OK, "ok");
            })
        })
        .into_boxed_handler()
    }

    async fn run(handler: &BoxedHandler) -> Context {
        let mut ctx = context();
        handler.call(&mut ctx).await;
        ctx
    }

    fn add_header(name: &'static str, log: &Log) -> impl ChainConstructor {
        let log = Arc::clone(log);
        from_fn(move |ctx, next| {
            let log = Arc::clone(&log);
            Box::pin(async move {
                log.lock().unwrap().push(name.to_owned());
                ctx.writer_mut().headers_mut().insert(name, HeaderValue::from_static("1"));
                next.run(ctx).await;
            })
        })
    }

    #[tokio::test]
    async fn empty_chain_is_identity() {
        let log = Log::default();
        let h = terminal(&log);

        let composed = Chain::default().then(Arc::clone(&h));

        assert!(Arc::ptr_eq(&h, &composed));
        let ctx = run(&composed).await;
        assert_eq!(ctx.writer().body(), b"ok");
        assert_eq!(*log.lock().unwrap(), ["handler"]);
    }

    #[tokio::test]
    async fn first_constructor_is_outermost() {
        let log = Log::default();
        let chain = Chain::new([recorder("a", &log), recorder("b", &log), recorder("c", &log)]);

        run(&chain.then(terminal(&log))).await;

        assert_eq!(
            *log.lock().unwrap(),
            ["before:a", "before:b", "before:c", "handler", "after:c", "after:b", "after:a"],
        );
    }

    #[tokio::test]
    async fn append_leaves_receiver_untouched() {
        let log = Log::default();
        let c1 = Chain::new([recorder("a", &log)]);
        let c2 = c1.append([recorder("x", &log)]);

        run(&c1.then(terminal(&log))).await;
        assert_eq!(*log.lock().unwrap(), ["before:a", "handler", "after:a"]);

        log.lock().unwrap().clear();
        run(&c2.then(terminal(&log))).await;
        assert_eq!(
            *log.lock().unwrap(),
            ["before:a", "before:x", "handler", "after:x", "after:a"],
        );
        assert_eq!((c1.len(), c2.len()), (1, 2));
    }

    #[tokio::test]
    async fn extend_matches_append() {
        let log = Log::default();
        let c1 = Chain::new([recorder("a", &log), recorder("b", &log)]);
        let c2 = Chain::new([recorder("c", &log), recorder("d", &log)]);

        run(&c1.extend(&c2).then(terminal(&log))).await;
        let extended = std::mem::take(&mut *log.lock().unwrap());

        run(&c1.append([recorder("c", &log), recorder("d", &log)]).then(terminal(&log))).await;
        let appended = std::mem::take(&mut *log.lock().unwrap());

        assert_eq!(extended, appended);
        assert_eq!(c2.len(), 2);
    }

    #[tokio::test]
    async fn chain_is_reusable_across_requests() {
        let log = Log::default();
        let handler = Chain::new([recorder("a", &log)]).then(terminal(&log));

        run(&handler).await;
        run(&handler).await;

        assert_eq!(log.lock().unwrap().len(), 6);
    }

    #[tokio::test]
    async fn headers_from_both_layers_in_wrap_order() {
        let log = Log::default();
        let handler = chain![add_header("x", &log), add_header("y", &log)].then(terminal(&log));

        let ctx = run(&handler).await;

        let w = ctx.writer();
        assert_eq!(w.status(), StatusCode::OK);
        assert_eq!(w.body(), b"ok");
        assert_eq!(w.sent_headers()["x"], "1");
        assert_eq!(w.sent_headers()["y"], "1");
        assert_eq!(*log.lock().unwrap(), ["x", "y", "handler"]);
    }

    #[tokio::test]
    async fn from_fn_can_short_circuit() {
        let log = Log::default();
        let deny = from_fn(|ctx, _next| {
            Box::pin(async move { ctx.text(StatusCode::FORBIDDEN, "no") })
        });

        let ctx = run(&chain![deny].then(terminal(&log))).await;

        assert_eq!(ctx.writer().status(), StatusCode::FORBIDDEN);
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn from_fn_sees_the_response_after_next() {
        let seen = Arc::new(Mutex::new(None));
        let observer = {
            let seen = Arc::clone(&seen);
            from_fn(move |ctx, next| {
                let seen = Arc::clone(&seen);
                Box::pin(async move {
                    next.run(ctx).await;
                    *seen.lock().unwrap() = Some(ctx.writer().status());
                })
            })
        };

        run(&chain![observer].then(terminal(&Log::default()))).await;

        assert_eq!(*seen.lock().unwrap(), Some(StatusCode::OK));
    }
}
