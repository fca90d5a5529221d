//! Per-request span with method, path, status and latency.

use std::time::Instant;

use tracing::{Instrument, info, info_span};

use super::{ChainConstructor, from_fn};

/// Opens an `http.request` span around the rest of the chain and logs one
/// line when the handler returns.
///
/// Put it first in a chain so the span covers every other middleware.
pub fn trace() -> impl ChainConstructor {
    from_fn(|ctx, next| {
        Box::pin(async move {
            let started = Instant::now();
            let span = info_span!(
                "http.request",
                method = %ctx.request().method(),
                path = %ctx.request().path(),
            );

            next.run(ctx).instrument(span.clone()).await;

            let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
            span.in_scope(|| {
                info!(status = ctx.writer().status().as_u16(), latency_ms, "request completed");
            });
        })
    })
}
