use std::pin::{Pin, pin};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::StreamExt as _;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::aggregate::aggregate;
use crate::availability::{CallerContext, ConnectorStatus, ensure_available};
use crate::catalog::{ToolSet, provision_tools};
use crate::engine::EngineInner;
use crate::errors::DelegateError;
use crate::prompt::build_system_prompt;
use crate::request::{DelegateInput, TaskRequest, normalize_toolkits, validate};
use crate::runtime::{EventStream, RuntimeHandle, RuntimeRequest};
use crate::snapshot::{ExecutionSnapshot, ExecutionStatus};
use crate::state::{ExecutionState, Transition};

/// Handle used to request cancellation of a running delegation.
#[derive(Clone)]
pub struct AbortHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl AbortHandle {
    pub(crate) fn new(tx: watch::Sender<bool>) -> Self {
        Self { tx: Arc::new(tx) }
    }

    /// Requests cancellation.
    ///
    /// Best-effort: the run observes it at its next suspension point and
    /// finishes with a failed "cancelled" result.
    pub fn abort(&self) {
        let _ = self.tx.send(true);
    }
}

/// Task and toolkits used to describe a run that died before emitting
/// anything.
pub(crate) struct Fallback {
    task: String,
    toolkits: Vec<String>,
}

/// Progress stream returned by [`DelegateEngine::delegate`](crate::DelegateEngine::delegate).
///
/// Yields in-progress snapshots (and, for a tool failure, the failed one)
/// as the run advances. The sequence is finite and cannot be restarted; call
/// [`finish`](Self::finish) to obtain the terminal result. Dropping the
/// stream tells the run the caller lost interest.
pub struct ExecutionStream {
    run_id: uuid::Uuid,
    rx: mpsc::Receiver<ExecutionSnapshot>,
    final_rx: oneshot::Receiver<ExecutionSnapshot>,
    abort_handle: AbortHandle,
    fallback: Fallback,
    last: Option<ExecutionSnapshot>,
}

impl ExecutionStream {
    pub(crate) fn new(
        run_id: uuid::Uuid,
        rx: mpsc::Receiver<ExecutionSnapshot>,
        final_rx: oneshot::Receiver<ExecutionSnapshot>,
        abort_handle: AbortHandle,
        fallback: Fallback,
    ) -> Self {
        Self {
            run_id,
            rx,
            final_rx,
            abort_handle,
            fallback,
            last: None,
        }
    }

    pub(crate) fn fallback_for(input: &DelegateInput) -> Fallback {
        Fallback {
            task: input.task.clone(),
            toolkits: normalize_toolkits(input.toolkits.iter()),
        }
    }

    /// Identifier shared with the run's log events.
    pub fn run_id(&self) -> uuid::Uuid {
        self.run_id
    }

    /// Returns a handle that can cancel the run.
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort_handle.clone()
    }

    /// Waits for the next snapshot. Returns `None` once the run has stopped
    /// producing progress.
    pub async fn next_snapshot(&mut self) -> Option<ExecutionSnapshot> {
        self.next().await
    }

    /// Drains any remaining progress and returns the terminal result.
    ///
    /// Safe to call after consuming snapshots manually. If the run task died
    /// without reporting, the result is a failed "Agent execution failed
    /// unexpectedly." carrying the last observed tool calls.
    pub async fn finish(mut self) -> ExecutionSnapshot {
        while let Some(snapshot) = self.rx.recv().await {
            self.last = Some(snapshot);
        }
        match self.final_rx.await {
            Ok(result) => result,
            Err(_) => {
                error!(run_id = %self.run_id, "run task ended without a terminal result");
                let (task, toolkits, tool_calls, text) = match self.last {
                    Some(last) => (
                        last.task,
                        last.requested_toolkits,
                        last.tool_calls,
                        last.final_text.unwrap_or_default(),
                    ),
                    None => (
                        self.fallback.task,
                        self.fallback.toolkits,
                        Vec::new(),
                        String::new(),
                    ),
                };
                ExecutionSnapshot::failed(
                    &task,
                    &toolkits,
                    tool_calls,
                    &text,
                    &DelegateError::Unexpected,
                )
            }
        }
    }
}

impl futures::Stream for ExecutionStream {
    type Item = ExecutionSnapshot;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        match this.rx.poll_recv(cx) {
            Poll::Ready(Some(snapshot)) => {
                this.last = Some(snapshot.clone());
                Poll::Ready(Some(snapshot))
            }
            other => other,
        }
    }
}

struct Prepared {
    request: TaskRequest,
    tools: ToolSet,
    status: ConnectorStatus,
}

enum LoopExit {
    Completed,
    ToolFailed(ExecutionSnapshot),
    Failed(DelegateError),
}

pub(crate) async fn run_task(
    inner: Arc<EngineInner>,
    run_id: uuid::Uuid,
    caller: CallerContext,
    input: DelegateInput,
    tx: mpsc::Sender<ExecutionSnapshot>,
    final_tx: oneshot::Sender<ExecutionSnapshot>,
    mut abort_rx: watch::Receiver<bool>,
) {
    let result = execute(&inner, run_id, &caller, &input, &tx, &mut abort_rx).await;
    match result.status {
        ExecutionStatus::Succeeded => info!(
            %run_id,
            tool_calls = result.tool_calls.len(),
            "delegated run succeeded"
        ),
        _ => warn!(
            %run_id,
            tool_calls = result.tool_calls.len(),
            error = result.error.as_deref().unwrap_or_default(),
            "delegated run failed"
        ),
    }
    drop(tx);
    if final_tx.send(result).is_err() {
        debug!(%run_id, "caller dropped before the terminal result");
    }
}

async fn execute(
    inner: &EngineInner,
    run_id: uuid::Uuid,
    caller: &CallerContext,
    input: &DelegateInput,
    tx: &mpsc::Sender<ExecutionSnapshot>,
    abort_rx: &mut watch::Receiver<bool>,
) -> ExecutionSnapshot {
    let mut guard = RunGuard::new(run_id, abort_rx, inner.config.timeout);

    let prepared = guard
        .race(prepare(inner, caller, input))
        .await
        .and_then(|prepared| prepared);
    let Prepared {
        request,
        tools,
        status,
    } = match prepared {
        Ok(prepared) => prepared,
        Err(err) => {
            warn!(%run_id, error = %err, "delegation rejected");
            return ExecutionSnapshot::failed(
                &input.task,
                &normalize_toolkits(input.toolkits.iter()),
                Vec::new(),
                "",
                &err,
            );
        }
    };

    let system_prompt = build_system_prompt(&request, &tools, &status);
    let mut state = ExecutionState::new(request, inner.config.max_steps);

    debug!(
        %run_id,
        runtime = inner.runtime.id(),
        model = %inner.config.model,
        tools = tools.len(),
        "starting sub-agent"
    );
    let runtime_request = RuntimeRequest {
        run_id,
        model: inner.config.model.clone(),
        system_prompt,
        prompt: state.request().task().to_string(),
        tools,
        max_steps: inner.config.max_steps,
    };
    let RuntimeHandle {
        mut events,
        steps,
        usage,
    } = match guard.race(inner.runtime.start(runtime_request)).await {
        Ok(Ok(handle)) => handle,
        Ok(Err(err)) => {
            warn!(%run_id, error = %err, "runtime failed to start");
            return state.failed(&DelegateError::stream(err.message()));
        }
        Err(err) => return state.failed(&err),
    };

    let exit = guard
        .race(drive(run_id, &mut state, &mut events, tx))
        .await
        .unwrap_or_else(LoopExit::Failed);
    drop(events);

    match exit {
        LoopExit::Completed => match guard.race(aggregate(&state, steps, usage)).await {
            Ok(Ok(result)) => result,
            Ok(Err(err)) | Err(err) => state.failed(&err),
        },
        LoopExit::ToolFailed(snapshot) => snapshot,
        LoopExit::Failed(err) => state.failed(&err),
    }
}

/// Races each phase of a run against caller cancellation and the run's
/// deadline. The deadline is fixed when the run starts, so every phase
/// shares one budget.
struct RunGuard<'a> {
    run_id: uuid::Uuid,
    abort_rx: &'a mut watch::Receiver<bool>,
    abort_open: bool,
    deadline: Option<Instant>,
}

impl<'a> RunGuard<'a> {
    fn new(
        run_id: uuid::Uuid,
        abort_rx: &'a mut watch::Receiver<bool>,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            run_id,
            abort_rx,
            abort_open: true,
            deadline: timeout.map(|limit| Instant::now() + limit),
        }
    }

    async fn race<F: Future>(&mut self, fut: F) -> Result<F::Output, DelegateError> {
        if *self.abort_rx.borrow() {
            return Err(DelegateError::Cancelled);
        }
        let deadline = self.deadline;
        let mut expired = pin!(async move {
            match deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => futures::future::pending::<()>().await,
            }
        });
        let mut fut = pin!(fut);
        loop {
            tokio::select! {
                biased;
                changed = self.abort_rx.changed(), if self.abort_open => {
                    match changed {
                        Ok(()) if *self.abort_rx.borrow() => {
                            info!(run_id = %self.run_id, "delegated run aborted by caller");
                            return Err(DelegateError::Cancelled);
                        }
                        Ok(()) => {}
                        Err(_) => self.abort_open = false,
                    }
                }
                () = &mut expired => {
                    warn!(run_id = %self.run_id, "delegated run timed out");
                    return Err(DelegateError::TimedOut);
                }
                out = &mut fut => return Ok(out),
            }
        }
    }
}

/// Validation, session and availability checks, then provisioning. Nothing
/// external is touched until the purely local checks have passed.
async fn prepare(
    inner: &EngineInner,
    caller: &CallerContext,
    input: &DelegateInput,
) -> Result<Prepared, DelegateError> {
    let request = validate(input)?;
    let caller_id = caller.session().ok_or(DelegateError::SessionRequired)?;
    ensure_available(request.toolkits(), &caller.permitted_toolkits)?;
    let tools = provision_tools(inner.catalog.as_ref(), caller_id, request.toolkits()).await?;
    let status = match &inner.connectors {
        Some(provider) => provider.status(caller_id).await.unwrap_or_else(|err| {
            warn!(error = %err, "connector status unavailable");
            ConnectorStatus::default()
        }),
        None => ConnectorStatus::default(),
    };
    Ok(Prepared {
        request,
        tools,
        status,
    })
}

/// Consumes runtime events one at a time until the stream ends, a tool
/// fails, the step bound is hit, or the caller goes away.
async fn drive(
    run_id: uuid::Uuid,
    state: &mut ExecutionState,
    events: &mut EventStream,
    tx: &mpsc::Sender<ExecutionSnapshot>,
) -> LoopExit {
    while let Some(next) = events.next().await {
        let event = match next {
            Ok(event) => event,
            Err(err) => {
                warn!(%run_id, error = %err, "runtime stream failed");
                return LoopExit::Failed(DelegateError::stream(err.message()));
            }
        };
        debug!(%run_id, kind = event.kind(), "runtime event");
        match state.apply(event) {
            Transition::Quiet => {}
            Transition::Progress(snapshot) => {
                if tx.send(snapshot).await.is_err() {
                    debug!(%run_id, "snapshot receiver dropped; stopping run");
                    return LoopExit::Failed(DelegateError::Cancelled);
                }
            }
            Transition::StepLimit => {
                info!(%run_id, "step limit reached");
                return LoopExit::Completed;
            }
            Transition::ToolFailed(snapshot) => {
                let _ = tx.send(snapshot.clone()).await;
                return LoopExit::ToolFailed(snapshot);
            }
        }
    }
    LoopExit::Completed
}
