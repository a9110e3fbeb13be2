//! Helpers shared by the unit tests of this crate.

use std::sync::Arc;

use bytes::Bytes;
use http::Request;
use numbat_core::{BoxFuture, Context};
use parking_lot::Mutex;

use crate::{Middleware, Next};

pub(crate) fn ctx(uri: &str) -> Context {
    Context::new(Request::get(uri).body(Bytes::new()).unwrap())
}

pub(crate) fn request(builder: http::request::Builder, body: &'static [u8]) -> Context {
    Context::new(builder.body(Bytes::from_static(body)).unwrap())
}

/// Records before/after markers for every stage it hands out.
#[derive(Default, Clone)]
pub(crate) struct Recorder {
    pub(crate) log: Arc<Mutex<Vec<String>>>,
}

impl Recorder {
    pub(crate) fn stage(&self, label: &'static str) -> RecordingStage {
        RecordingStage {
            label,
            log: self.log.clone(),
        }
    }

    pub(crate) fn entries(&self) -> Vec<String> {
        self.log.lock().clone()
    }
}

pub(crate) struct RecordingStage {
    label: &'static str,
    log: Arc<Mutex<Vec<String>>>,
}

impl Middleware for RecordingStage {
    fn name(&self) -> &'static str {
        "recorder"
    }

    fn process<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            self.log.lock().push(format!("{}-before", self.label));
            next.run(ctx).await;
            self.log.lock().push(format!("{}-after", self.label));
        })
    }
}

/// Runs a single middleware in front of `handler`.
pub(crate) async fn run_one<M, H>(middleware: M, handler: H, ctx: &mut Context)
where
    M: Middleware,
    H: numbat_core::Handler,
{
    let stack: Vec<Arc<dyn Middleware>> = vec![Arc::new(middleware)];
    crate::run_chain(&stack, &handler, ctx).await;
}
