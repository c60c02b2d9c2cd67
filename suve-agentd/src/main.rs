//! The per-`(account, region)` agent process.

mod dispatch;
mod lifecycle;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use suve_ipc::ErrorKind;
use suve_ipc::Hint;
use suve_ipc::Method;
use suve_ipc::Request;
use suve_ipc::Response;
use suve_state::AgentState;
use tokio::net::UnixListener;
use tokio::net::UnixStream;
use tokio::sync::Notify;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing_subscriber::EnvFilter;

/// Arm a 10-minute idle timer; expiry with empty state shuts the agent
/// down.
const IDLE_TIMEOUT: Duration = Duration::from_secs(10 * 60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut args = std::env::args().skip(1);
    let account = args.next().ok_or_else(|| anyhow::anyhow!("usage: suve-agentd <account> <region>"))?;
    let region = args.next().ok_or_else(|| anyhow::anyhow!("usage: suve-agentd <account> <region>"))?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("suve_agentd=info")))
        .init();

    let runtime_dir = suve_client::runtime_dir();
    lifecycle::ensure_runtime_dir(&runtime_dir)?;

    let socket_path = suve_client::socket_path(&account, &region);
    let pid_path = suve_client::pid_path(&account, &region);

    let listener = match lifecycle::bind_or_detect_running(&socket_path).await? {
        Ok(listener) => listener,
        Err(lifecycle::AlreadyRunning) => {
            tracing::info!(account, region, "agent already running, exiting");
            return Ok(());
        }
    };
    lifecycle::write_pid_file(&pid_path)?;
    tracing::info!(account, region, path = %socket_path.display(), "agent listening");

    run(listener).await;

    lifecycle::remove_runtime_files(&socket_path, &pid_path);
    tracing::info!("agent shut down");
    Ok(())
}

/// What a finished dispatch tells the main loop, so it can apply the
/// hint-aware idle-shutdown policy.
struct ActivityReport {
    hint: Hint,
    state_empty: bool,
    shutdown_requested: bool,
}

async fn run(listener: UnixListener) {
    let state = Arc::new(AgentState::new());
    let (activity_tx, mut activity_rx) = mpsc::unbounded_channel::<ActivityReport>();
    let sigint = notify_on_sigint();
    let mut idle_deadline = Instant::now() + IDLE_TIMEOUT;
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, _)) => {
                        let state = Arc::clone(&state);
                        let activity_tx = activity_tx.clone();
                        connections.spawn(async move {
                            handle_connection(stream, &state, activity_tx).await;
                        });
                    }
                    Err(e) => tracing::warn!(error = %e, "accept failed"),
                }
            }

            report = activity_rx.recv() => {
                let Some(report) = report else { continue };
                idle_deadline = Instant::now() + IDLE_TIMEOUT;

                if report.shutdown_requested {
                    tracing::info!("shutdown requested by client");
                    break;
                }
                if report.state_empty && matches!(report.hint, Hint::Reset | Hint::Apply | Hint::Stash) {
                    tracing::info!(?report.hint, "state emptied by hinted request, shutting down");
                    break;
                }
            }

            () = tokio::time::sleep_until(idle_deadline) => {
                if state.is_empty() {
                    tracing::info!("idle timeout with empty state, shutting down");
                    break;
                }
                idle_deadline = Instant::now() + IDLE_TIMEOUT;
            }

            () = sigint.notified() => {
                tracing::info!("received SIGINT, shutting down");
                break;
            }
        }
    }

    // Stop accepting, then let every in-flight dispatch finish its
    // response before the caller unlinks the socket and PID file.
    drop(listener);
    while connections.join_next().await.is_some() {}
}

/// Read one request, dispatch it, write one response, then report the
/// outcome for the idle-shutdown policy. A request naming a method this
/// build doesn't recognize is parsed as raw JSON first so it can still
/// get a `method_unknown` response instead of the connection just being
/// dropped.
async fn handle_connection(mut stream: UnixStream, state: &Arc<AgentState>, activity_tx: mpsc::UnboundedSender<ActivityReport>) {
    let raw: serde_json::Value = match suve_ipc::read_frame(&mut stream).await {
        Ok(v) => v,
        Err(e) => {
            tracing::debug!(error = %e, "failed to read request frame");
            return;
        }
    };

    let hint = raw
        .get("hint")
        .and_then(|h| serde_json::from_value::<Hint>(h.clone()).ok())
        .unwrap_or_default();

    let (response, shutdown_requested) = match serde_json::from_value::<Request>(raw) {
        Ok(request) => {
            let shutdown_requested = request.method == Method::Shutdown;
            let response = dispatch::dispatch(state, request.method, request.params);
            (response, shutdown_requested)
        }
        Err(e) => {
            tracing::debug!(error = %e, "unrecognized request");
            (Response::err(ErrorKind::MethodUnknown, e.to_string()), false)
        }
    };

    if let Err(e) = suve_ipc::write_frame(&mut stream, &response).await {
        tracing::debug!(error = %e, "failed to write response");
    }

    let _ = activity_tx.send(ActivityReport {
        hint,
        state_empty: state.is_empty(),
        shutdown_requested,
    });
}

/// Fulfilled when SIGINT arrives.
fn notify_on_sigint() -> Arc<Notify> {
    let notify = Arc::new(Notify::new());

    tokio::spawn({
        let notify = Arc::clone(&notify);
        async move {
            loop {
                tokio::signal::ctrl_c().await.ok();
                tracing::debug!("keyboard interrupt");
                notify.notify_waiters();
            }
        }
    });

    notify
}
