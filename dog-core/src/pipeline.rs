//! # Pipeline
//!
//! An operation is expressed as an ordered list of small stages running over one
//! shared, per-request context:
//!
//! ```text
//! request handlers (in order, first failure aborts)
//!        │
//!        ▼
//! response handlers (in order, write the output)
//! ```
//!
//! A request handler may also end the request phase early with
//! [`Flow::Respond`]. That is a success path: the remaining request handlers are
//! skipped and the response handlers still run.
//!
//! When any handler fails, nothing after it runs and the error is returned to
//! the caller untouched. Mapping it to a client-visible shape is the
//! transport's job.
//!
//! ```rust
//! use std::sync::Arc;
//! use dog_core::pipeline::{Flow, Pipeline, RequestHandler, ResponseHandler};
//!
//! struct Double;
//!
//! #[async_trait::async_trait]
//! impl RequestHandler<u32> for Double {
//!     async fn handle(&self, ctx: &mut u32) -> anyhow::Result<Flow> {
//!         *ctx *= 2;
//!         Ok(Flow::Continue)
//!     }
//! }
//!
//! struct Render;
//!
//! #[async_trait::async_trait]
//! impl ResponseHandler<u32, String> for Render {
//!     async fn respond(&self, ctx: &mut u32, out: &mut String) -> anyhow::Result<()> {
//!         *out = ctx.to_string();
//!         Ok(())
//!     }
//! }
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let mut p = Pipeline::new("double", 21u32);
//! p.add_request_handler(Arc::new(Double));
//! p.add_response_handler(Arc::new(Render));
//!
//! let mut out = String::new();
//! p.run(&mut out).await?;
//! assert_eq!(out, "42");
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::Instrument;

/// What a request handler wants to happen next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Run the next request handler.
    Continue,
    /// Skip the remaining request handlers and go straight to the response phase.
    Respond,
}

/// A pre-check or side-effecting stage over the request context.
#[async_trait]
pub trait RequestHandler<C>: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &'static str {
        short_type_name::<Self>()
    }

    async fn handle(&self, ctx: &mut C) -> Result<Flow>;
}

/// A stage that turns the accumulated context into output.
///
/// Response handlers get the context mutably so they can take ownership of
/// values (e.g. a body stream) out of it; they must not change what earlier
/// stages decided.
#[async_trait]
pub trait ResponseHandler<C, O>: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &'static str {
        short_type_name::<Self>()
    }

    async fn respond(&self, ctx: &mut C, out: &mut O) -> Result<()>;
}

/// One run of one operation. Never shared between requests.
pub struct Pipeline<C, O> {
    operation: &'static str,
    ctx: C,
    request_handlers: Vec<Arc<dyn RequestHandler<C>>>,
    response_handlers: Vec<Arc<dyn ResponseHandler<C, O>>>,
}

impl<C, O> Pipeline<C, O>
where
    C: Send,
    O: Send,
{
    pub fn new(operation: &'static str, ctx: C) -> Self {
        Self {
            operation,
            ctx,
            request_handlers: Vec::new(),
            response_handlers: Vec::new(),
        }
    }

    pub fn add_request_handler(&mut self, handler: Arc<dyn RequestHandler<C>>) -> &mut Self {
        self.request_handlers.push(handler);
        self
    }

    pub fn add_response_handler(&mut self, handler: Arc<dyn ResponseHandler<C, O>>) -> &mut Self {
        self.response_handlers.push(handler);
        self
    }

    pub fn operation(&self) -> &'static str {
        self.operation
    }

    pub fn context(&self) -> &C {
        &self.ctx
    }

    /// Execute the pipeline, writing into `out`.
    ///
    /// Returns the context so callers can inspect what the stages recorded.
    pub async fn run(self, out: &mut O) -> Result<C> {
        let span = tracing::debug_span!("pipeline", operation = self.operation);
        self.run_inner(out).instrument(span).await
    }

    async fn run_inner(self, out: &mut O) -> Result<C> {
        let Pipeline {
            mut ctx,
            request_handlers,
            response_handlers,
            ..
        } = self;

        for h in &request_handlers {
            tracing::debug!(handler = h.name(), "request handler");
            match h.handle(&mut ctx).await {
                Ok(Flow::Continue) => {}
                Ok(Flow::Respond) => {
                    tracing::debug!(handler = h.name(), "request phase ended early");
                    break;
                }
                Err(e) => {
                    tracing::debug!(handler = h.name(), error = %e, "pipeline aborted");
                    return Err(e);
                }
            }
        }

        for h in &response_handlers {
            tracing::debug!(handler = h.name(), "response handler");
            if let Err(e) = h.respond(&mut ctx, out).await {
                tracing::debug!(handler = h.name(), error = %e, "pipeline aborted");
                return Err(e);
            }
        }

        Ok(ctx)
    }
}

fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    full.rsplit("::").next().unwrap_or(full)
}
