//! A local-looking API that transparently reaches the right per-account
//! agent, auto-spawning it when absent.

mod backoff;
mod error;

pub use error::ClientError;

use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use suve_ipc::ErrorBody;
use suve_ipc::Hint;
use suve_ipc::Method;
use suve_ipc::Request;
use suve_ipc::Response;
use suve_record::Entry;
use suve_record::Key;
use suve_record::Service;
use suve_record::State;
use suve_record::TagEntry;
use tokio::net::UnixStream;

/// The directory `suve` keeps its runtime artifacts (sockets, PID files)
/// under: the platform runtime directory, falling back to the cache
/// directory on platforms that don't populate `XDG_RUNTIME_DIR`.
pub fn runtime_dir() -> PathBuf {
    let base = dirs::runtime_dir()
        .or_else(dirs::cache_dir)
        .unwrap_or_else(std::env::temp_dir);
    base.join("suve")
}

/// `$RUNTIME_DIR/suve/<account-id>-<region>.sock`.
pub fn socket_path(account: &str, region: &str) -> PathBuf {
    runtime_dir().join(format!("{account}-{region}.sock"))
}

/// Sibling `.pid` file, written by the daemon after bind.
pub fn pid_path(account: &str, region: &str) -> PathBuf {
    runtime_dir().join(format!("{account}-{region}.pid"))
}

/// A handle to one per-`(account, region)` agent.
pub struct Client {
    account: String,
    region: String,
    socket_path: PathBuf,
    daemon_path: PathBuf,
    auto_start: bool,
}

impl Client {
    /// `daemon_path` is the `suve-agentd` binary to auto-spawn; callers
    /// typically pass `std::env::current_exe()`'s sibling or a fixed
    /// install path.
    pub fn new(account: impl Into<String>, region: impl Into<String>, daemon_path: impl Into<PathBuf>) -> Self {
        let account = account.into();
        let region = region.into();
        let socket_path = socket_path(&account, &region);
        Self { account, region, socket_path, daemon_path: daemon_path.into(), auto_start: true }
    }

    /// Disable auto-spawn, for callers that want an explicit opt-out.
    pub fn without_auto_start(mut self) -> Self {
        self.auto_start = false;
        self
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// `PING` the socket; if that fails and auto-start is enabled, spawn
    /// the daemon and poll `PING` with backoff up to the 5 s ceiling.
    pub async fn ensure_running(&self) -> Result<(), ClientError> {
        if self.ping().await.is_ok() {
            return Ok(());
        }
        if !self.auto_start {
            return Err(ClientError::AgentNotRunning);
        }
        self.spawn_daemon()?;
        self.poll_until_ready().await
    }

    /// A bare `PING`, bypassing `call`'s `ensure_running` wrapper — this
    /// method *is* the connectivity probe `ensure_running` uses.
    pub async fn ping(&self) -> Result<(), ClientError> {
        let request = Request::new(Method::Ping, serde_json::json!({})).with_hint(Hint::None);
        let response = self.send_request(&request).await?;
        Self::into_result(response)?;
        Ok(())
    }

    fn spawn_daemon(&self) -> Result<(), ClientError> {
        use std::os::unix::process::CommandExt as _;

        let mut command = tokio::process::Command::new(&self.daemon_path);
        command
            .arg(&self.account)
            .arg(&self.region)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .process_group(0)
            .kill_on_drop(false);

        // The child is intentionally left detached: a long-lived daemon
        // must outlive this client process.
        let _child = command.spawn()?;
        Ok(())
    }

    async fn poll_until_ready(&self) -> Result<(), ClientError> {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        let mut attempt = 0u32;
        loop {
            if self.ping().await.is_ok() {
                return Ok(());
            }
            attempt += 1;
            let delay = backoff::backoff(attempt);
            if tokio::time::Instant::now() + delay >= deadline {
                return Err(ClientError::AutoStartTimeout);
            }
            tokio::time::sleep(delay).await;
        }
    }

    async fn send_request(&self, request: &Request) -> Result<Response, ClientError> {
        let mut stream = UnixStream::connect(&self.socket_path).await?;
        suve_ipc::write_frame(&mut stream, request).await?;
        let response: Response = suve_ipc::read_frame(&mut stream).await?;
        Ok(response)
    }

    /// `ensure_running` then a single exchange; retried once after a
    /// fresh `ensure_running` on `connection_refused`/`broken_pipe`.
    pub async fn call(&self, method: Method, params: serde_json::Value, hint: Hint) -> Result<serde_json::Value, ClientError> {
        self.ensure_running().await?;
        let request = Request::new(method, params).with_hint(hint);

        match self.send_request(&request).await {
            Ok(response) => Self::into_result(response),
            Err(e) if e.is_retryable() => {
                self.ensure_running().await?;
                let response = self.send_request(&request).await?;
                Self::into_result(response)
            }
            Err(e) => Err(e),
        }
    }

    fn into_result(response: Response) -> Result<serde_json::Value, ClientError> {
        if response.ok {
            Ok(response.result.unwrap_or(serde_json::Value::Null))
        } else {
            let ErrorBody { kind, message } = response.error.unwrap_or(ErrorBody {
                kind: suve_ipc::ErrorKind::Internal,
                message: "agent reported failure without an error body".into(),
            });
            Err(ClientError::Remote { kind, message })
        }
    }

    pub async fn stage_entry(&self, key: &Key, entry: &Entry) -> Result<(), ClientError> {
        self.call(Method::StageEntry, entry_params(key, entry), Hint::None).await?;
        Ok(())
    }

    pub async fn get_entry(&self, key: &Key) -> Result<Option<Entry>, ClientError> {
        self.not_staged_is_none(self.call(Method::GetEntry, key_params(key), Hint::None).await)
    }

    pub async fn unstage_entry(&self, key: &Key) -> Result<(), ClientError> {
        self.not_staged_is_ok(self.call(Method::UnstageEntry, key_params(key), Hint::None).await)
    }

    pub async fn stage_tag(&self, key: &Key, tag: &TagEntry) -> Result<(), ClientError> {
        self.call(Method::StageTag, tag_params(key, tag), Hint::None).await?;
        Ok(())
    }

    pub async fn get_tag(&self, key: &Key) -> Result<Option<TagEntry>, ClientError> {
        self.not_staged_is_none(self.call(Method::GetTag, key_params(key), Hint::None).await)
    }

    pub async fn unstage_tag(&self, key: &Key) -> Result<(), ClientError> {
        self.not_staged_is_ok(self.call(Method::UnstageTag, key_params(key), Hint::None).await)
    }

    /// `LIST_ENTRIES` returns a flat `{service: {name: entry}}` map; fold
    /// it back into a `State` with an empty `tags` index for callers that
    /// want the same type `drain`/`write_state` traffic in.
    pub async fn list_entries(&self, filter: Option<Service>) -> Result<State, ClientError> {
        let value = self.call(Method::ListEntries, filter_params(filter), Hint::None).await?;
        let entries = serde_json::from_value(value)?;
        Ok(State { entries, tags: Default::default() })
    }

    pub async fn list_tags(&self, filter: Option<Service>) -> Result<State, ClientError> {
        let value = self.call(Method::ListTags, filter_params(filter), Hint::None).await?;
        let tags = serde_json::from_value(value)?;
        Ok(State { entries: Default::default(), tags })
    }

    /// The `reset` command: unstage everything, tagged with the `reset`
    /// hint so the agent can shut down immediately if that empties it.
    pub async fn unstage_all(&self, filter: Option<Service>) -> Result<(), ClientError> {
        self.call(Method::UnstageAll, filter_params(filter), Hint::Reset).await?;
        Ok(())
    }

    /// `stash push`: move staged state out to the caller, tagged with
    /// the `stash` hint.
    pub async fn drain(&self, filter: Option<Service>, keep: bool) -> Result<State, ClientError> {
        let mut params = filter_params(filter);
        params["keep"] = serde_json::Value::Bool(keep);
        let value = self.call(Method::Drain, params, Hint::Stash).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// `stash pop`: merge state into the agent, tagged with the `stash`
    /// hint.
    pub async fn write_state(&self, filter: Option<Service>, state: &State) -> Result<(), ClientError> {
        let mut params = filter_params(filter);
        params["state"] = serde_json::to_value(state)?;
        self.call(Method::WriteState, params, Hint::Stash).await?;
        Ok(())
    }

    pub async fn shutdown(&self) -> Result<(), ClientError> {
        self.call(Method::Shutdown, serde_json::json!({}), Hint::None).await?;
        Ok(())
    }

    fn not_staged_is_none<T: serde::de::DeserializeOwned>(&self, result: Result<serde_json::Value, ClientError>) -> Result<Option<T>, ClientError> {
        match result {
            Ok(value) => Ok(Some(serde_json::from_value(value)?)),
            Err(ClientError::Remote { kind: suve_ipc::ErrorKind::NotStaged, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn not_staged_is_ok(&self, result: Result<serde_json::Value, ClientError>) -> Result<(), ClientError> {
        match result {
            Ok(_) => Ok(()),
            Err(ClientError::Remote { kind: suve_ipc::ErrorKind::NotStaged, .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

fn key_params(key: &Key) -> serde_json::Value {
    serde_json::json!({ "service": key.0, "name": key.1 })
}

fn entry_params(key: &Key, entry: &Entry) -> serde_json::Value {
    serde_json::json!({ "service": key.0, "name": key.1, "entry": entry })
}

fn tag_params(key: &Key, tag: &TagEntry) -> serde_json::Value {
    serde_json::json!({ "service": key.0, "name": key.1, "tag_entry": tag })
}

fn filter_params(filter: Option<Service>) -> serde_json::Value {
    match filter {
        Some(service) => serde_json::json!({ "service": service }),
        None => serde_json::json!({ "service": "" }),
    }
}

/// Forwards post-apply unstage calls to the live agent with the `apply`
/// hint, so a successful apply that empties the agent's state can trigger
/// immediate idle-shutdown instead of waiting out the full timer.
#[async_trait::async_trait]
impl suve_apply::UnstageSink for Client {
    async fn unstage_entry(&self, key: &Key) {
        if let Err(e) = self.call(Method::UnstageEntry, key_params(key), Hint::Apply).await {
            tracing::warn!(name = %key.1, error = %e, "post-apply unstage_entry failed");
        }
    }

    async fn unstage_tag(&self, key: &Key) {
        if let Err(e) = self.call(Method::UnstageTag, key_params(key), Hint::Apply).await {
            tracing::warn!(name = %key.1, error = %e, "post-apply unstage_tag failed");
        }
    }
}

/// Forwards diff self-heal unstage calls to the live agent with no hint.
#[async_trait::async_trait]
impl suve_diff::DiffSink for Client {
    async fn unstage_entry(&self, key: &Key) {
        if let Err(e) = self.call(Method::UnstageEntry, key_params(key), Hint::None).await {
            tracing::warn!(name = %key.1, error = %e, "diff auto-unstage failed");
        }
    }
}

#[cfg(test)]
mod tests;
