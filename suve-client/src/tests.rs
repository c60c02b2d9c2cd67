use suve_ipc::ErrorKind;
use suve_ipc::Method;
use suve_ipc::Response;
use suve_record::Name;
use tempfile::TempDir;
use tokio::net::UnixListener;

use super::*;

fn fake_client(socket_path: PathBuf) -> Client {
    Client {
        account: "acct".into(),
        region: "us-east-1".into(),
        socket_path,
        daemon_path: PathBuf::from("/nonexistent/suve-agentd"),
        auto_start: false,
    }
}

/// Accepts exactly one connection, reads one frame, and replies with
/// whatever `respond` produces from the parsed request.
async fn serve_one(listener: UnixListener, respond: impl FnOnce(Request) -> Response + Send + 'static) {
    let (mut stream, _) = listener.accept().await.unwrap();
    let request: Request = suve_ipc::read_frame(&mut stream).await.unwrap();
    let response = respond(request);
    suve_ipc::write_frame(&mut stream, &response).await.unwrap();
}

#[tokio::test]
async fn ping_succeeds_against_a_running_fake_agent() {
    let dir = TempDir::new().unwrap();
    let socket_path = dir.path().join("acct-us-east-1.sock");
    let listener = UnixListener::bind(&socket_path).unwrap();

    let server = tokio::spawn(serve_one(listener, |_| Response::ok(serde_json::json!({}))));
    let client = fake_client(socket_path);

    client.ping().await.unwrap();
    server.await.unwrap();
}

#[tokio::test]
async fn get_entry_maps_not_staged_to_none() {
    let dir = TempDir::new().unwrap();
    let socket_path = dir.path().join("acct-us-east-1.sock");
    let listener = UnixListener::bind(&socket_path).unwrap();

    let server = tokio::spawn(serve_one(listener, |req| {
        assert_eq!(req.method, Method::GetEntry);
        Response::err(ErrorKind::NotStaged, "no such entry")
    }));
    let client = fake_client(socket_path);

    let key: Key = (Service::Param, Name::from("/a"));
    let result = client.get_entry(&key).await.unwrap();
    assert_eq!(result, None);
    server.await.unwrap();
}

#[tokio::test]
async fn stage_entry_sends_expected_wire_shape() {
    let dir = TempDir::new().unwrap();
    let socket_path = dir.path().join("acct-us-east-1.sock");
    let listener = UnixListener::bind(&socket_path).unwrap();

    let server = tokio::spawn(serve_one(listener, |req| {
        assert_eq!(req.method, Method::StageEntry);
        assert_eq!(req.params["service"], serde_json::json!("param"));
        assert_eq!(req.params["name"], serde_json::json!("/a"));
        Response::ok(serde_json::json!({ "cancelled": false }))
    }));
    let client = fake_client(socket_path);

    let key: Key = (Service::Param, Name::from("/a"));
    let entry = Entry {
        operation: suve_record::Operation::Update,
        value: Some("v".into()),
        description: None,
        type_hint: None,
        delete_options: None,
        staged_at: time::macros::datetime!(2026-01-01 00:00:00 UTC),
        base_modified_at: None,
    };

    client.stage_entry(&key, &entry).await.unwrap();
    server.await.unwrap();
}

#[tokio::test]
async fn ensure_running_fails_fast_when_auto_start_disabled_and_agent_absent() {
    let dir = TempDir::new().unwrap();
    let socket_path = dir.path().join("nobody-home.sock");
    let client = fake_client(socket_path);

    let err = client.ensure_running().await.unwrap_err();
    assert!(matches!(err, ClientError::AgentNotRunning));
}

#[tokio::test]
async fn remote_error_surfaces_with_its_kind_and_message() {
    let dir = TempDir::new().unwrap();
    let socket_path = dir.path().join("acct-us-east-1.sock");
    let listener = UnixListener::bind(&socket_path).unwrap();

    let server = tokio::spawn(serve_one(listener, |_| Response::err(ErrorKind::Conflict, "modified remotely")));
    let client = fake_client(socket_path);

    let key: Key = (Service::Param, Name::from("/a"));
    let err = client.unstage_tag(&key).await.unwrap_err();
    match err {
        ClientError::Remote { kind, message } => {
            assert_eq!(kind, ErrorKind::Conflict);
            assert_eq!(message, "modified remotely");
        }
        other => panic!("expected Remote, got {other:?}"),
    }
    server.await.unwrap();
}
