//! Request pipeline.
//!
//! A [`Pipeline`] is an ordered list of [`Stage`]s wrapped around a terminal
//! endpoint. The first stage runs first on the way in and last on the way
//! out; any stage may answer without calling [`Next::run`], in which case
//! no inner stage and no endpoint executes.
//!
//! Pipelines are mounted on axum route groups through [`enter`], so routing
//! and extraction happen inside the endpoint.

pub mod logging;

pub use logging::{AccessLog, RequestLogging};

use async_trait::async_trait;
use axum::{
    extract::{Request, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures_util::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;
use tracing::error;

/// One cross-cutting concern: handle the call or delegate to `next`.
#[async_trait]
pub trait Stage: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    async fn handle(&self, req: Request, next: Next<'_>) -> Response;
}

/// The terminal handler a pipeline wraps.
pub type Endpoint = Box<dyn FnOnce(Request) -> BoxFuture<'static, Response> + Send>;

pub fn endpoint<F, Fut>(f: F) -> Endpoint
where
    F: FnOnce(Request) -> Fut + Send + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    Box::new(move |req| Box::pin(f(req)))
}

/// The remainder of the chain as seen by a stage.
pub struct Next<'a> {
    stages: &'a [Box<dyn Stage>],
    endpoint: Endpoint,
}

impl<'a> Next<'a> {
    pub async fn run(self, req: Request) -> Response {
        match self.stages.split_first() {
            Some((stage, rest)) => {
                let next = Next {
                    stages: rest,
                    endpoint: self.endpoint,
                };
                stage.handle(req, next).await
            }
            None => (self.endpoint)(req).await,
        }
    }
}

#[derive(Clone)]
pub struct Pipeline {
    stages: Arc<[Box<dyn Stage>]>,
}

impl Pipeline {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    pub async fn run(&self, req: Request, endpoint: Endpoint) -> Response {
        Next {
            stages: &self.stages,
            endpoint,
        }
        .run(req)
        .await
    }
}

#[derive(Default)]
pub struct PipelineBuilder {
    stages: Vec<Box<dyn Stage>>,
}

impl PipelineBuilder {
    /// Append a stage inside the ones already added.
    pub fn stage(mut self, stage: impl Stage) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    pub fn build(self) -> Pipeline {
        Pipeline {
            stages: self.stages.into(),
        }
    }
}

/// axum adapter: `middleware::from_fn_with_state(pipeline, enter)`.
///
/// The chain runs on its own task, so a caller that times out or
/// disconnects never cuts a handler short or skips the logging stage.
pub async fn enter(
    State(pipeline): State<Pipeline>,
    req: Request,
    next: axum::middleware::Next,
) -> Response {
    let chain = tokio::spawn(async move {
        pipeline
            .run(req, endpoint(move |req| next.run(req)))
            .await
    });

    match chain.await {
        Ok(response) => response,
        Err(err) => {
            error!("Request task failed: {}", err);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
