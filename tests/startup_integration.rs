//! Integration tests over real TCP: a scriptable launch service speaking the
//! real frame protocol exercises request round-trips, disconnect
//! notification, and the full startup sequence driven through the wire.

use hostwrap::launch::{
    EntryPointResolver, Invokable, LaunchStaging, PathEnvironmentPreparer, ProcessLauncher,
};
use hostwrap::modules::{ModuleLoader, StaticTrustVerifier, TrustPolicy, WrapperPhaseHook};
use hostwrap::transport::codec::{read_frame, write_frame, MAX_FRAME_BYTES, MSG_ERROR, MSG_RESPONSE};
use hostwrap::transport::{AuthRequest, LaunchService, TcpLaunchService};
use hostwrap::{Error, SavedCredential, Supervisor, WrapperConfig};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};

/// Scriptable launch service speaking the real wire protocol.
#[derive(Default)]
struct FakeServer {
    auth_ok: AtomicBool,
    restore_ok: AtomicBool,
    /// Close the connection right after the next reply, simulating a
    /// service-side drop.
    close_after_reply: AtomicBool,
    auth_calls: AtomicUsize,
    restore_calls: AtomicUsize,
    profile_calls: AtomicUsize,
    profiles: Mutex<serde_json::Value>,
}

impl FakeServer {
    fn new() -> Arc<Self> {
        let server = Self::default();
        server.auth_ok.store(true, Ordering::SeqCst);
        server.restore_ok.store(true, Ordering::SeqCst);
        *server.profiles.lock().unwrap() = serde_json::json!([]);
        Arc::new(server)
    }

    fn set_profiles(&self, profiles: serde_json::Value) {
        *self.profiles.lock().unwrap() = profiles;
    }

    fn reply_for(&self, method: &str) -> (u8, serde_json::Value) {
        match method {
            "auth" => {
                self.auth_calls.fetch_add(1, Ordering::SeqCst);
                if self.auth_ok.load(Ordering::SeqCst) {
                    (
                        MSG_RESPONSE,
                        serde_json::json!({
                            "permissions": {"roles": ["server"], "flags": []},
                            "display_profile": {
                                "id": uuid::Uuid::new_v4(),
                                "username": "wrapper",
                            },
                            "credential": {
                                "kind": "raw_session",
                                "token": uuid::Uuid::new_v4(),
                            },
                        }),
                    )
                } else {
                    (
                        MSG_ERROR,
                        serde_json::json!({
                            "error": {"code": "AUTH_FAILED", "message": "bad credentials"},
                        }),
                    )
                }
            }
            "restore" => {
                self.restore_calls.fetch_add(1, Ordering::SeqCst);
                if self.restore_ok.load(Ordering::SeqCst) {
                    (MSG_RESPONSE, serde_json::json!({}))
                } else {
                    (
                        MSG_ERROR,
                        serde_json::json!({
                            "error": {"code": "RESTORE_FAILED", "message": "session expired"},
                        }),
                    )
                }
            }
            "profiles" => {
                self.profile_calls.fetch_add(1, Ordering::SeqCst);
                (MSG_RESPONSE, self.profiles.lock().unwrap().clone())
            }
            other => (
                MSG_ERROR,
                serde_json::json!({
                    "error": {"code": "NOT_FOUND", "message": format!("unknown method {}", other)},
                }),
            ),
        }
    }

    async fn handle_connection(self: Arc<Self>, mut stream: TcpStream) {
        while let Ok(Some((_, payload))) = read_frame(&mut stream, MAX_FRAME_BYTES).await {
            let request: serde_json::Value = match serde_json::from_slice(&payload) {
                Ok(v) => v,
                Err(_) => break,
            };
            let id = request.get("id").cloned().unwrap_or(serde_json::Value::Null);
            let method = request
                .get("method")
                .and_then(|m| m.as_str())
                .unwrap_or("")
                .to_string();

            let (msg_type, mut reply) = self.reply_for(&method);
            let envelope = if msg_type == MSG_RESPONSE {
                serde_json::json!({"id": id, "body": reply})
            } else {
                reply
                    .as_object_mut()
                    .unwrap()
                    .insert("id".to_string(), id);
                reply
            };

            let bytes = serde_json::to_vec(&envelope).unwrap();
            if write_frame(&mut stream, msg_type, &bytes).await.is_err() {
                break;
            }
            if self.close_after_reply.load(Ordering::SeqCst) {
                break;
            }
        }
    }
}

/// Bind a listener on a random port and serve `server` on it.
async fn start_test_server(server: Arc<FakeServer>) -> std::net::SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    tokio::spawn(server.clone().handle_connection(stream));
                }
                Err(_) => break,
            }
        }
    });
    addr
}

fn auth_request() -> AuthRequest {
    AuthRequest {
        login: "server".to_string(),
        password: "secret".to_string(),
        auth_scope_id: "std".to_string(),
    }
}

#[tokio::test]
async fn test_authenticate_round_trip() {
    let server = FakeServer::new();
    let addr = start_test_server(server.clone()).await;
    let client = TcpLaunchService::new(addr.to_string());

    let response = client.authenticate(auth_request()).await.unwrap();

    assert_eq!(response.permissions.roles, vec!["server"]);
    assert!(matches!(
        response.credential.to_saved(),
        SavedCredential::RawSession { .. }
    ));
    assert_eq!(server.auth_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_wire_error_maps_to_phase_error() {
    let server = FakeServer::new();
    server.auth_ok.store(false, Ordering::SeqCst);
    let addr = start_test_server(server).await;
    let client = TcpLaunchService::new(addr.to_string());

    let err = client.authenticate(auth_request()).await.unwrap_err();
    assert!(matches!(err, Error::Auth(_)));

    // The connection survives an application-level error.
    let profiles = client.fetch_profiles().await.unwrap();
    assert!(profiles.is_empty());
}

#[tokio::test]
async fn test_restore_failure_is_a_restore_error() {
    let server = FakeServer::new();
    server.restore_ok.store(false, Ordering::SeqCst);
    let addr = start_test_server(server).await;
    let client = TcpLaunchService::new(addr.to_string());

    let credential = SavedCredential::RawSession {
        token: uuid::Uuid::new_v4(),
    };
    let err = client.restore(&credential).await.unwrap_err();
    assert!(matches!(err, Error::Restore(_)));
}

#[tokio::test]
async fn test_profiles_round_trip() {
    let server = FakeServer::new();
    server.set_profiles(serde_json::json!([
        {
            "name": "main",
            "version": "1.0",
            "servers": [null, {"name": "lobby", "address": "10.0.0.1", "port": 25565}],
        },
    ]));
    let addr = start_test_server(server).await;
    let client = TcpLaunchService::new(addr.to_string());

    let profiles = client.fetch_profiles().await.unwrap();
    assert_eq!(profiles.len(), 1);
    assert_eq!(profiles[0].name, "main");
    // Null holes in the catalogue survive decoding.
    assert_eq!(profiles[0].servers.len(), 2);
    assert!(profiles[0].servers[0].is_none());
    assert_eq!(
        profiles[0].servers[1].as_ref().unwrap().port,
        Some(25565)
    );
}

#[tokio::test]
async fn test_disconnect_notice_and_redial() {
    let server = FakeServer::new();
    server.close_after_reply.store(true, Ordering::SeqCst);
    let addr = start_test_server(server.clone()).await;
    let client = TcpLaunchService::new(addr.to_string());
    let mut notices = client.take_disconnects().unwrap();

    client.authenticate(auth_request()).await.unwrap();

    // The service-side drop surfaces as exactly one notice.
    let notice = tokio::time::timeout(Duration::from_secs(2), notices.recv())
        .await
        .expect("timed out waiting for disconnect notice")
        .expect("disconnect channel closed");
    assert!(!notice.reason.is_empty());

    // The next request dials a fresh connection.
    server.close_after_reply.store(false, Ordering::SeqCst);
    let profiles = client.fetch_profiles().await.unwrap();
    assert!(profiles.is_empty());
    assert_eq!(server.auth_calls.load(Ordering::SeqCst), 1);
    assert_eq!(server.profile_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_take_disconnects_is_single_handler() {
    let server = FakeServer::new();
    let addr = start_test_server(server).await;
    let client = TcpLaunchService::new(addr.to_string());

    assert!(client.take_disconnects().is_some());
    assert!(client.take_disconnects().is_none());
}

// =============================================================================
// Full startup over the wire
// =============================================================================

#[derive(Default)]
struct LaunchLog {
    calls: AtomicUsize,
    args: Mutex<Vec<String>>,
}

struct LoggingResolver {
    log: Arc<LaunchLog>,
}

struct LoggingInvokable {
    log: Arc<LaunchLog>,
}

impl EntryPointResolver for LoggingResolver {
    fn resolve(&self, _name: &str) -> hostwrap::Result<Box<dyn Invokable>> {
        Ok(Box::new(LoggingInvokable {
            log: self.log.clone(),
        }))
    }
}

impl Invokable for LoggingInvokable {
    fn call(
        self: Box<Self>,
        args: &[String],
        _env: &[(String, String)],
    ) -> hostwrap::Result<()> {
        self.log.calls.fetch_add(1, Ordering::SeqCst);
        *self.log.args.lock().unwrap() = args.to_vec();
        Ok(())
    }
}

struct ArgModule;

impl hostwrap::modules::WrapperModule for ArgModule {
    fn name(&self) -> &str {
        "arg-module"
    }

    fn as_wrapper_phase(&self) -> Option<&dyn WrapperPhaseHook> {
        Some(self)
    }
}

impl WrapperPhaseHook for ArgModule {
    fn wrapper_phase(&self, staging: &mut LaunchStaging) -> hostwrap::Result<()> {
        staging.args.push("--wired".to_string());
        Ok(())
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_full_startup_over_tcp() {
    let server = FakeServer::new();
    server.set_profiles(serde_json::json!([
        {"name": "main", "version": "1.0", "servers": [{"name": "lobby"}]},
    ]));
    let addr = start_test_server(server.clone()).await;

    let config_dir = tempfile::tempdir().unwrap();
    let config_path = config_dir.path().join("hostwrap.json");
    let store = Arc::new(hostwrap::config_store::JsonConfigStore::new(&config_path));

    let mut config = WrapperConfig::default();
    config.address = addr.to_string();
    config.server_name = "lobby".to_string();
    config.entry_point = "server".to_string();
    config.args = Some(vec!["--nogui".to_string()]);

    let service = TcpLaunchService::new(addr.to_string());
    let mut loader = ModuleLoader::new(
        TrustPolicy::AllowAll,
        Box::new(StaticTrustVerifier::default()),
    );
    loader.register(Arc::new(ArgModule)).unwrap();

    let log = Arc::new(LaunchLog::default());
    let launcher = ProcessLauncher::new(
        Box::new(LoggingResolver { log: log.clone() }),
        Box::new(PathEnvironmentPreparer),
    );

    let supervisor = Supervisor::new(config, store, service, loader, launcher);
    let session = supervisor.session();
    let profiles = supervisor.profiles();

    supervisor.run(Vec::new()).await.unwrap();

    assert_eq!(log.calls.load(Ordering::SeqCst), 1);
    assert_eq!(*log.args.lock().unwrap(), vec!["--nogui", "--wired"]);
    assert_eq!(server.auth_calls.load(Ordering::SeqCst), 1);
    assert_eq!(server.profile_calls.load(Ordering::SeqCst), 1);
    assert_eq!(profiles.selection().await.label(), "main");
    assert!(!session.permissions().await.is_empty());

    // A fresh credential was persisted for the next run.
    let written = tokio::fs::read_to_string(&config_path).await.unwrap();
    let saved: serde_json::Value = serde_json::from_str(&written).unwrap();
    assert_eq!(
        saved.get("saved").unwrap().get("kind").unwrap(),
        "raw_session"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_service_drop_after_startup_restores_over_wire() {
    let server = FakeServer::new();
    let addr = start_test_server(server.clone()).await;

    let config_dir = tempfile::tempdir().unwrap();
    let store = Arc::new(hostwrap::config_store::JsonConfigStore::new(
        config_dir.path().join("hostwrap.json"),
    ));

    let mut config = WrapperConfig::default();
    config.address = addr.to_string();
    config.entry_point = "server".to_string();
    config.args = Some(Vec::new());
    config.reconnect_sleep = Duration::from_millis(5);

    let service = TcpLaunchService::new(addr.to_string());
    let loader = ModuleLoader::new(
        TrustPolicy::AllowAll,
        Box::new(StaticTrustVerifier::default()),
    );
    let log = Arc::new(LaunchLog::default());
    let launcher = ProcessLauncher::new(
        Box::new(LoggingResolver { log }),
        Box::new(PathEnvironmentPreparer),
    );

    let supervisor = Supervisor::new(config, store, service.clone(), loader, launcher);
    supervisor.run(Vec::new()).await.unwrap();
    assert_eq!(server.auth_calls.load(Ordering::SeqCst), 1);

    // Drop the service side of the live connection; the reconnect supervisor
    // restores the persisted session over a fresh one.
    server.close_after_reply.store(true, Ordering::SeqCst);
    let _ = service.fetch_profiles().await;
    server.close_after_reply.store(false, Ordering::SeqCst);

    for _ in 0..400 {
        if server.restore_calls.load(Ordering::SeqCst) >= 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(server.restore_calls.load(Ordering::SeqCst), 1);
    // No fresh password authentication was needed.
    assert_eq!(server.auth_calls.load(Ordering::SeqCst), 1);
}
