//! Radix-tree request router.
//!
//! One tree per HTTP method. O(path-length) lookup via [`matchit`]. The
//! router matches, builds a [`Context`] and calls the handler; ordering,
//! conflicts and path syntax all belong to matchit.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::header::ALLOW;
use http::{HeaderValue, Method, StatusCode};
use http_body_util::Full;
use matchit::Router as MatchitRouter;
use percent_encoding::percent_decode_str;
use tokio::time::Instant;
use tracing::debug;

use crate::context::{Context, Params};
use crate::error::Error;
use crate::handler::{BoxedHandler, Handler};
use crate::request::Request;
use crate::writer::ResponseWriter;

/// The application router.
///
/// Build it once at startup and pass it to [`Server::serve`](crate::Server::serve).
/// Every registration method returns `self` so calls chain naturally.
#[derive(Default)]
pub struct Router {
    routes: HashMap<Method, MatchitRouter<BoxedHandler>>,
    not_found: Option<BoxedHandler>,
    deadline: Option<Duration>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for a method + path pair.
    ///
    /// Path parameters use `{name}` syntax; `ctx.param("name")` retrieves them:
    ///
    /// ```rust
    /// # use chassis::{BoxFuture, Context, Method, Router, StatusCode, handler_fn};
    /// # fn get_user(ctx: &mut Context) -> BoxFuture<'_> { Box::pin(async move { ctx.text(StatusCode::OK, "") }) }
    /// # fn create_user(ctx: &mut Context) -> BoxFuture<'_> { Box::pin(async move { ctx.text(StatusCode::OK, "") }) }
    /// Router::new()
    ///     .handle(Method::GET,  "/users/{id}", handler_fn(get_user))
    ///     .handle(Method::POST, "/users",      handler_fn(create_user));
    /// ```
    ///
    /// # Panics
    ///
    /// Panics if matchit rejects `path` (malformed or conflicting with an
    /// existing route). Use [`try_handle`](Self::try_handle) to get an error
    /// instead.
    pub fn handle(self, method: Method, path: &str, handler: impl Handler) -> Self {
        self.try_handle(method, path, handler)
            .unwrap_or_else(|e| panic!("{e}"))
    }

    /// Like [`handle`](Self::handle), but reports a rejected path as
    /// [`Error::Route`].
    pub fn try_handle(mut self, method: Method, path: &str, handler: impl Handler) -> Result<Self, Error> {
        self.routes
            .entry(method)
            .or_default()
            .insert(path, handler.into_boxed_handler())
            .map_err(|source| Error::Route { path: path.to_owned(), source })?;
        Ok(self)
    }

    pub fn get(self, path: &str, handler: impl Handler) -> Self {
        self.handle(Method::GET, path, handler)
    }

    pub fn post(self, path: &str, handler: impl Handler) -> Self {
        self.handle(Method::POST, path, handler)
    }

    pub fn put(self, path: &str, handler: impl Handler) -> Self {
        self.handle(Method::PUT, path, handler)
    }

    pub fn patch(self, path: &str, handler: impl Handler) -> Self {
        self.handle(Method::PATCH, path, handler)
    }

    pub fn delete(self, path: &str, handler: impl Handler) -> Self {
        self.handle(Method::DELETE, path, handler)
    }

    /// Handler for requests no route matches. Without one the router answers
    /// with an empty `404`.
    pub fn not_found(mut self, handler: impl Handler) -> Self {
        self.not_found = Some(handler.into_boxed_handler());
        self
    }

    /// Gives every request context a deadline `timeout` after it is created.
    /// Handlers observe it through [`Context::done`]; the router does not
    /// enforce it.
    pub fn deadline(mut self, timeout: Duration) -> Self {
        self.deadline = Some(timeout);
        self
    }

    /// Transport entry point: route one buffered request and produce its
    /// response.
    ///
    /// The context's cancellation token is cancelled once the handler has
    /// returned, or earlier if this future is dropped before completing.
    pub async fn serve_http(&self, req: http::Request<Bytes>) -> http::Response<Full<Bytes>> {
        let (parts, body) = req.into_parts();

        // Routes and params see the decoded path; `Request::path` keeps it raw.
        let path = percent_decode_str(parts.uri.path()).decode_utf8_lossy().into_owned();

        let (handler, params) = match self.lookup(&parts.method, &path) {
            Some(found) => found,
            None => {
                let allowed = self.allowed(&parts.method, &path);
                if !allowed.is_empty() {
                    debug!(method = %parts.method, %path, "method not allowed");
                    return method_not_allowed(&allowed);
                }
                match &self.not_found {
                    Some(handler) => (Arc::clone(handler), Params::new()),
                    None => {
                        debug!(method = %parts.method, %path, "no route");
                        return empty(StatusCode::NOT_FOUND);
                    }
                }
            }
        };

        let mut ctx = Context::new(ResponseWriter::new(), Request::from_parts(parts, body), params);
        if let Some(timeout) = self.deadline {
            ctx = ctx.with_deadline(Instant::now() + timeout);
        }

        let _cancel_on_exit = ctx.cancellation().clone().drop_guard();
        handler.call(&mut ctx).await;

        ctx.into_writer().into_response()
    }

    pub(crate) fn lookup(&self, method: &Method, path: &str) -> Option<(BoxedHandler, Params)> {
        let tree = self.routes.get(method)?;
        let matched = tree.at(path).ok()?;
        let handler = Arc::clone(matched.value);
        let params = matched.params.iter().collect();
        Some((handler, params))
    }

    /// Methods, other than `method`, with a route matching `path`. Sorted so
    /// the `allow` header is stable.
    fn allowed(&self, method: &Method, path: &str) -> Vec<&Method> {
        let mut allowed: Vec<&Method> = self.routes
            .iter()
            .filter(|(m, tree)| *m != method && tree.at(path).is_ok())
            .map(|(m, _)| m)
            .collect();
        allowed.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        allowed
    }
}

fn empty(status: StatusCode) -> http::Response<Full<Bytes>> {
    let mut res = http::Response::new(Full::new(Bytes::new()));
    *res.status_mut() = status;
    res
}

fn method_not_allowed(allowed: &[&Method]) -> http::Response<Full<Bytes>> {
    let mut res = empty(StatusCode::METHOD_NOT_ALLOWED);
    let list = allowed.iter().map(|m| m.as_str()).collect::<Vec<_>>().join(", ");
    if let Ok(value) = HeaderValue::from_str(&list) {
        res.headers_mut().insert(ALLOW, value);
    }
    res
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use http_body_util::BodyExt;
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::handler::{BoxFuture, handler_fn};

    fn get_user(ctx: &mut Context) -> BoxFuture<'_> {
        Box::pin(async move {
            let id = ctx.param("id").unwrap_or("unknown").to_owned();
            ctx.json(StatusCode::OK, &serde_json::json!({ "id": id })).unwrap();
        })
    }

    fn request(method: Method, uri: &str) -> http::Request<Bytes> {
        http::Request::builder().method(method).uri(uri).body(Bytes::new()).unwrap()
    }

    async fn body(res: http::Response<Full<Bytes>>) -> Bytes {
        res.into_body().collect().await.unwrap().to_bytes()
    }

    #[tokio::test]
    async fn routes_with_params() {
        let router = Router::new().get("/users/{id}", handler_fn(get_user));

        let res = router.serve_http(request(Method::GET, "/users/42")).await;

        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers()["content-type"], "application/json");
        assert_eq!(body(res).await.as_ref(), br#"{"id":"42"}"#);
    }

    #[tokio::test]
    async fn params_are_percent_decoded() {
        let router = Router::new().get("/u/{name}", handler_fn(|ctx| {
            Box::pin(async move {
                let name = ctx.param("name").unwrap_or_default().to_owned();
                let raw = ctx.request().path().to_owned();
                ctx.text(StatusCode::OK, format!("{name}|{raw}"));
            })
        }));

        let res = router.serve_http(request(Method::GET, "/u/john%20doe")).await;

        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body(res).await.as_ref(), b"john doe|/u/john%20doe");
    }

    #[tokio::test]
    async fn encoded_static_segment_still_matches() {
        let router = Router::new().get("/caf\u{e9}", handler_fn(get_user));

        let res = router.serve_http(request(Method::GET, "/caf%C3%A9")).await;

        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_path_is_404() {
        let router = Router::new().get("/users/{id}", handler_fn(get_user));

        let res = router.serve_http(request(Method::GET, "/nope")).await;

        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        assert!(body(res).await.is_empty());
    }

    #[tokio::test]
    async fn other_method_is_405_with_allow() {
        let router = Router::new()
            .get("/users/{id}", handler_fn(get_user))
            .delete("/users/{id}", handler_fn(get_user));

        let res = router.serve_http(request(Method::POST, "/users/1")).await;

        assert_eq!(res.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(res.headers()[ALLOW], "DELETE, GET");
    }

    #[tokio::test]
    async fn custom_not_found() {
        let router = Router::new().not_found(handler_fn(|ctx| {
            Box::pin(async move {
                let path = ctx.request().path().to_owned();
                ctx.text(StatusCode::NOT_FOUND, format!("nothing at {path}"));
            })
        }));

        let res = router.serve_http(request(Method::GET, "/missing")).await;

        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        assert_eq!(body(res).await.as_ref(), b"nothing at /missing");
    }

    #[test]
    fn invalid_route_is_an_error() {
        let err = Router::new()
            .get("/users/{id}", handler_fn(get_user))
            .try_handle(Method::GET, "/users/{name}", handler_fn(get_user))
            .err()
            .unwrap();

        assert!(matches!(err, Error::Route { ref path, .. } if path == "/users/{name}"));
    }

    #[test]
    #[should_panic(expected = "invalid route")]
    fn handle_panics_on_conflict() {
        let _ = Router::new()
            .get("/a", handler_fn(get_user))
            .get("/a", handler_fn(get_user));
    }

    #[tokio::test]
    async fn deadline_is_carried_into_context() {
        let seen = Arc::new(Mutex::new(None));
        let router = {
            let seen = Arc::clone(&seen);
            Router::new()
                .deadline(Duration::from_secs(30))
                .get("/", handler_fn(move |ctx| {
                    let seen = Arc::clone(&seen);
                    Box::pin(async move { *seen.lock().unwrap() = ctx.deadline() })
                }))
        };

        let before = Instant::now();
        router.serve_http(request(Method::GET, "/")).await;

        let deadline = seen.lock().unwrap().expect("deadline set");
        assert!(deadline >= before + Duration::from_secs(30));
    }

    #[tokio::test]
    async fn dropping_the_dispatch_cancels_the_context() {
        let token = Arc::new(Mutex::new(None::<CancellationToken>));
        let router = {
            let token = Arc::clone(&token);
            Router::new().get("/slow", handler_fn(move |ctx| {
                *token.lock().unwrap() = Some(ctx.cancellation().clone());
                Box::pin(std::future::pending::<()>())
            }))
        };

        let dispatch = router.serve_http(request(Method::GET, "/slow"));
        let timed_out = tokio::time::timeout(Duration::from_millis(20), dispatch).await;

        assert!(timed_out.is_err());
        let token = token.lock().unwrap().take().expect("handler ran");
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn completed_dispatch_cancels_after_handler() {
        let token = Arc::new(Mutex::new(None::<CancellationToken>));
        let router = {
            let token = Arc::clone(&token);
            Router::new().get("/", handler_fn(move |ctx| {
                let token = Arc::clone(&token);
                Box::pin(async move {
                    let cancelled = ctx.cancellation().is_cancelled();
                    *token.lock().unwrap() = Some(ctx.cancellation().clone());
                    assert!(!cancelled);
                })
            }))
        };

        router.serve_http(request(Method::GET, "/")).await;

        let token = token.lock().unwrap().take().expect("handler ran");
        assert!(token.is_cancelled());
    }
}
