//! The context-side event loop: boots the program, dispatches requests to
//! the entry task and posts normalized responses.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::scope::{Invocation, Scope};
use crate::error::ErrorObject;
use crate::host::MessageListener;
use crate::program::{GeneratedProgram, Program};
use crate::registry::{registry, TaskFn};
use crate::types::{CorrelationId, Frame, OutputTransferSelector, Request, Response, TransferList};

/// A booted program: resolved entry task, installed scope and selector.
pub(crate) struct Runtime {
    entry: TaskFn,
    scope: Arc<Scope>,
    output_transfer: Option<OutputTransferSelector>,
}

impl Runtime {
    pub(crate) fn boot(program: &Program) -> Result<Self, ErrorObject> {
        let scope = Scope::install(program)?;

        let entry = registry().task(&program.entry).ok_or_else(|| {
            ErrorObject::named(
                "StartupError",
                format!("entry task `{}` is no longer registered", program.entry),
            )
        })?;

        let output_transfer = match &program.output_transfer {
            Some(name) => Some(registry().output_transfer(name).ok_or_else(|| {
                ErrorObject::named(
                    "StartupError",
                    format!("output-transfer selector `{name}` is no longer registered"),
                )
            })?),
            None => None,
        };

        Ok(Self {
            entry,
            scope: Arc::new(scope),
            output_transfer,
        })
    }

    /// Runs the entry task for one request. Synchronous failures, rejected
    /// futures and panics all become error responses.
    pub(crate) async fn invoke(
        &self,
        request: Request,
        transfer: TransferList,
    ) -> (Response, TransferList) {
        let id = request.id;
        let call = Invocation::new(request.args, transfer, self.scope.clone());

        let future = match std::panic::catch_unwind(AssertUnwindSafe(|| (self.entry)(call))) {
            Ok(future) => future,
            Err(panic) => {
                return (
                    Response::error(id, ErrorObject::from_panic(panic.as_ref())),
                    Vec::new(),
                )
            },
        };

        match AssertUnwindSafe(future).catch_unwind().await {
            Ok(Ok(value)) => {
                let transfer = self
                    .output_transfer
                    .as_ref()
                    .map(|select| select(&value))
                    .unwrap_or_default();
                (Response::ok(id, value), transfer)
            },
            Ok(Err(error)) => (Response::error(id, error), Vec::new()),
            Err(panic) => (
                Response::error(id, ErrorObject::from_panic(panic.as_ref())),
                Vec::new(),
            ),
        }
    }
}

/// Drives one execution context until it is terminated, its inbound link
/// closes, or (for self-terminating programs) its first response is posted.
pub(crate) async fn event_loop(
    context: u64,
    program: Option<Arc<GeneratedProgram>>,
    mut inbound: mpsc::UnboundedReceiver<Frame>,
    listener: Arc<dyn MessageListener>,
    shutdown: CancellationToken,
) {
    let self_terminate = program
        .as_ref()
        .is_some_and(|generated| generated.program().self_terminate);

    let runtime = match &program {
        Some(generated) => Runtime::boot(generated.program()).map(Arc::new),
        None => Err(ErrorObject::named(
            "StartupError",
            "program url has been revoked",
        )),
    };
    if let Err(error) = &runtime {
        tracing::warn!(context, error = %error, "execution context failed to start");
    }

    let (done_tx, mut done_rx) = mpsc::unbounded_channel::<Frame>();

    loop {
        tokio::select! {
            biased;

            () = shutdown.cancelled() => break,

            Some(frame) = done_rx.recv() => {
                listener.on_message(frame);
                if self_terminate {
                    tracing::debug!(context, "self-terminating after response");
                    break;
                }
            }

            frame = inbound.recv() => {
                let Some(frame) = frame else { break };
                let (request, transfer) = match frame.decode::<Request>() {
                    Ok(decoded) => decoded,
                    Err(error) => {
                        tracing::warn!(context, error = %error, "dropping undecodable request");
                        continue;
                    }
                };

                let runtime = runtime.clone();
                let done = done_tx.clone();
                tokio::spawn(async move {
                    let id = request.id;
                    let (response, transfer) = match runtime {
                        Ok(runtime) => runtime.invoke(request, transfer).await,
                        Err(error) => (Response::error(id, error), Vec::new()),
                    };
                    let _ = done.send(encode_response(id, &response, transfer));
                });
            }
        }
    }
}

fn encode_response(id: CorrelationId, response: &Response, transfer: TransferList) -> Frame {
    match Frame::encode(response, transfer) {
        Ok(frame) => frame,
        Err(error) => {
            let fallback = Response::error(
                id,
                ErrorObject::named("DataCloneError", error.to_string()),
            );
            Frame::encode(&fallback, Vec::new()).unwrap_or_default()
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ContextMap;
    use bytes::Bytes;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn program(entry: &str, output_transfer: Option<&str>) -> Program {
        crate::program::generate(entry, &ContextMap::new(), &[], None, output_transfer, false)
            .unwrap()
            .program()
            .clone()
    }

    fn request(args: Vec<serde_json::Value>) -> Request {
        Request {
            id: CorrelationId(9),
            args,
        }
    }

    #[tokio::test]
    async fn ok_results_pass_through_the_output_selector() {
        registry().register_task("dispatch-echo", |call| async move {
            Ok(call.arg(0).cloned().unwrap_or_default())
        });
        registry().register_output_transfer("dispatch-bytes", |value| {
            vec![Bytes::from(value.to_string())]
        });

        let runtime = Runtime::boot(&program("dispatch-echo", Some("dispatch-bytes"))).unwrap();
        let (response, transfer) = runtime.invoke(request(vec![json!(5)]), Vec::new()).await;

        assert_eq!(response, Response::ok(CorrelationId(9), json!(5)));
        assert_eq!(transfer, vec![Bytes::from_static(b"5")]);
    }

    #[tokio::test]
    async fn rejections_and_panics_become_error_responses() {
        registry().register_task("dispatch-reject", |_| async {
            Err(ErrorObject::new("Test error"))
        });
        registry().register_task("dispatch-panic", |call| async move {
            if call.args().is_empty() {
                panic!("exploded");
            }
            Ok(json!(null))
        });

        let runtime = Runtime::boot(&program("dispatch-reject", None)).unwrap();
        let (response, _) = runtime.invoke(request(Vec::new()), Vec::new()).await;
        assert!(response.is_error);
        assert_eq!(
            response.into_result().unwrap_err().message(),
            Some("Test error")
        );

        let runtime = Runtime::boot(&program("dispatch-panic", None)).unwrap();
        let (response, _) = runtime.invoke(request(Vec::new()), Vec::new()).await;
        let error = response.into_result().unwrap_err();
        assert_eq!(error.name(), Some("Panic"));
        assert_eq!(error.message(), Some("exploded"));
    }
}
