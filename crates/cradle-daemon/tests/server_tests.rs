//! End-to-end tests against a live daemon on a scratch root.
//!
//! Uses the runtime-native provider over a directory store so no privileges
//! are needed; namespace pools run at zero capacity for the same reason.

use std::fs;
use std::path::{Path, PathBuf};

use cradle_core::client::Client;
use cradle_core::config::socket_path;
use cradle_core::protocol::{
    self, GetNamespaceRequest, GetNamespaceResponse, ServiceType, METHOD_GET_NAMESPACE,
};
use cradle_core::NsType;
use cradle_daemon::config::{CHECKPOINT_CONFIG, NAMESPACE_CONFIG};
use cradle_daemon::server::Server;
use tempfile::TempDir;
use tokio::net::UnixStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;

struct TestDaemon {
    root: TempDir,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<cradle_core::Result<()>>,
}

impl TestDaemon {
    async fn start() -> Self {
        let root = TempDir::new().unwrap();

        let store = root.path().join("store");
        for reference in ["img-a", "img-b"] {
            fs::create_dir_all(store.join(reference)).unwrap();
            fs::write(store.join(reference).join("inventory.img"), reference).unwrap();
        }

        fs::write(
            root.path().join(CHECKPOINT_CONFIG),
            format!(
                r#"{{"type": "runtime-native", "config": {{"store_path": "{}"}}}}"#,
                store.display()
            ),
        )
        .unwrap();
        fs::write(
            root.path().join(NAMESPACE_CONFIG),
            r#"{"capacity": {"uts": 0, "ipc": 0, "mnt": 0}}"#,
        )
        .unwrap();

        let server = Server::new(root.path()).unwrap();
        let (shutdown, rx) = watch::channel(false);
        let task = tokio::spawn(server.run(rx));

        Self {
            root,
            shutdown,
            task,
        }
    }

    fn socket(&self) -> PathBuf {
        socket_path(self.root.path())
    }

    async fn client(&self) -> Client {
        Client::connect(&self.socket()).await.unwrap()
    }

    async fn stop(self) {
        self.shutdown.send(true).unwrap();
        self.task.await.unwrap().unwrap();
    }
}

#[tokio::test]
async fn test_checkpoint_get_roundtrip() {
    let daemon = TestDaemon::start().await;
    let mut client = daemon.client().await;

    let first = client.get_checkpoint("img-a").await.unwrap();
    let second = client.get_checkpoint("img-a").await.unwrap();

    assert!(!first.path.is_empty());
    assert_eq!(first.path, second.path);

    let content = fs::read_to_string(Path::new(&first.path).join("inventory.img")).unwrap();
    assert_eq!(content, "img-a");

    daemon.stop().await;
}

#[tokio::test]
async fn test_concurrent_connections_share_one_target() {
    let daemon = TestDaemon::start().await;

    let mut a = daemon.client().await;
    let mut b = daemon.client().await;

    let (ra, rb) = tokio::join!(a.get_checkpoint("img-a"), b.get_checkpoint("img-a"));
    let (ra, rb) = (ra.unwrap(), rb.unwrap());

    assert!(!ra.path.is_empty());
    assert_eq!(ra.path, rb.path);

    daemon.stop().await;
}

#[tokio::test]
async fn test_empty_ref_yields_empty_path() {
    let daemon = TestDaemon::start().await;
    let mut client = daemon.client().await;

    let rsp = client.get_checkpoint("").await.unwrap();
    assert!(rsp.path.is_empty());

    // The connection survives a failed request.
    let rsp = client.get_checkpoint("img-b").await.unwrap();
    assert!(!rsp.path.is_empty());

    daemon.stop().await;
}

#[tokio::test]
async fn test_exhausted_pool_reported_in_band() {
    let daemon = TestDaemon::start().await;
    let mut client = daemon.client().await;

    let rsp = client.get_namespace(NsType::Uts, None).await.unwrap();
    assert_eq!(rsp.fd, -1);
    assert_eq!(rsp.info, "Exhausted");

    daemon.stop().await;
}

#[tokio::test]
async fn test_unknown_namespace_type_answered_in_band() {
    let daemon = TestDaemon::start().await;
    let mut stream = UnixStream::connect(daemon.socket()).await.unwrap();

    protocol::write_frame(&mut stream, &ServiceType::Namespace)
        .await
        .unwrap();
    protocol::write_frame(&mut stream, METHOD_GET_NAMESPACE)
        .await
        .unwrap();
    protocol::write_frame(
        &mut stream,
        &GetNamespaceRequest {
            t: "pid".into(),
            arg: None,
        },
    )
    .await
    .unwrap();

    let rsp: GetNamespaceResponse = protocol::expect_frame(&mut stream).await.unwrap();
    assert_eq!(rsp.fd, -1);
    assert_eq!(rsp.info, "No such namespace");

    daemon.stop().await;
}

#[tokio::test]
async fn test_put_with_unknown_id_rejected() {
    let daemon = TestDaemon::start().await;
    let mut client = daemon.client().await;

    let rsp = client.put_namespace(NsType::Ipc, 3).await.unwrap();
    assert_eq!(rsp.error, "unknown slot id 3");

    daemon.stop().await;
}

#[tokio::test]
async fn test_unknown_service_type_closes_only_that_connection() {
    let daemon = TestDaemon::start().await;

    let mut stream = UnixStream::connect(daemon.socket()).await.unwrap();
    protocol::write_frame(&mut stream, "warp-drive").await.unwrap();

    let eof: Option<GetNamespaceResponse> = protocol::read_frame(&mut stream).await.unwrap();
    assert!(eof.is_none(), "offending connection should be closed");

    // The server keeps accepting.
    let mut client = daemon.client().await;
    let rsp = client.get_checkpoint("img-a").await.unwrap();
    assert!(!rsp.path.is_empty());

    daemon.stop().await;
}

#[tokio::test]
async fn test_shutdown_removes_prepared_targets() {
    let daemon = TestDaemon::start().await;
    let mut client = daemon.client().await;

    let a = client.get_checkpoint("img-a").await.unwrap();
    let b = client.get_checkpoint("img-b").await.unwrap();
    assert!(Path::new(&a.path).is_dir());
    assert!(Path::new(&b.path).is_dir());

    let (a_path, b_path) = (PathBuf::from(a.path), PathBuf::from(b.path));
    drop(client);
    daemon.stop().await;

    assert!(!a_path.exists(), "shutdown removes each prepared target");
    assert!(!b_path.exists(), "shutdown removes each prepared target");
}
