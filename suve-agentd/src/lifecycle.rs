//! Bind/probe/retry and PID-file handling around the agent's socket.

use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt as _;
use std::path::Path;

use suve_ipc::Method;
use suve_ipc::Request;
use tokio::net::UnixListener;
use tokio::net::UnixStream;

/// The daemon found a live peer already bound to this socket; the caller
/// should exit cleanly rather than steal the path.
pub struct AlreadyRunning;

/// Create `dir` (and parents) with `0700` permissions if it doesn't
/// already exist.
pub fn ensure_runtime_dir(dir: &Path) -> io::Result<()> {
    fs::create_dir_all(dir)?;
    fs::set_permissions(dir, fs::Permissions::from_mode(0o700))
}

/// Bind the socket, handling the "something is already listening here"
/// and "stale socket file left behind by a crashed daemon" cases.
pub async fn bind_or_detect_running(socket_path: &Path) -> io::Result<Result<UnixListener, AlreadyRunning>> {
    match UnixListener::bind(socket_path) {
        Ok(listener) => {
            fs::set_permissions(socket_path, fs::Permissions::from_mode(0o600))?;
            Ok(Ok(listener))
        }
        Err(e) if e.kind() == io::ErrorKind::AddrInUse => {
            if probe(socket_path).await {
                return Ok(Err(AlreadyRunning));
            }
            tracing::info!(path = %socket_path.display(), "removing stale socket");
            fs::remove_file(socket_path)?;
            let listener = UnixListener::bind(socket_path)?;
            fs::set_permissions(socket_path, fs::Permissions::from_mode(0o600))?;
            Ok(Ok(listener))
        }
        Err(e) => Err(e),
    }
}

/// `PING` an existing socket to decide whether its owner is alive.
async fn probe(socket_path: &Path) -> bool {
    let Ok(mut stream) = UnixStream::connect(socket_path).await else {
        return false;
    };
    let request = Request::new(Method::Ping, serde_json::json!({}));
    suve_ipc::write_frame(&mut stream, &request).await.is_ok()
        && suve_ipc::read_frame::<suve_ipc::Response, _>(&mut stream).await.is_ok()
}

pub fn write_pid_file(pid_path: &Path) -> io::Result<()> {
    fs::write(pid_path, std::process::id().to_string())?;
    fs::set_permissions(pid_path, fs::Permissions::from_mode(0o600))
}

/// Best-effort cleanup; a crashed daemon leaves these behind for the
/// next `bind_or_detect_running` to reclaim, so failures here are logged
/// and swallowed rather than turned into a hard shutdown error.
pub fn remove_runtime_files(socket_path: &Path, pid_path: &Path) {
    for path in [socket_path, pid_path] {
        if let Err(e) = fs::remove_file(path) {
            if e.kind() != io::ErrorKind::NotFound {
                tracing::warn!(path = %path.display(), error = %e, "failed to remove runtime file");
            }
        }
    }
}
