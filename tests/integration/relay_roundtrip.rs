//! Integration tests for the relay in front of a real executor

use super::test_utils::{canonical, populate};
use reflect::client::send_command;
use reflect::config::DefaultsConfig;
use reflect::drive::StaticDriveResolver;
use reflect::executor::{Executor, Reply};
use reflect::registry::Registry;
use reflect::relay::Relay;
use reflect::store::{MemoryMetadataStore, MetadataStore};
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_commands_over_the_wire() {
    let temp_dir = TempDir::new().unwrap();
    let original = temp_dir.path().join("original");
    let reflection = temp_dir.path().join("reflection");
    populate(&original, &[("a.txt", "hello")]);
    let original = canonical(original);

    let store = Arc::new(MemoryMetadataStore::new());
    let executor = Executor::new(
        store.clone(),
        Arc::new(Registry::default()),
        Arc::new(StaticDriveResolver::new()),
        DefaultsConfig::default(),
    );
    let (handle, executor_thread) = executor.spawn(16).unwrap();

    let relay = Relay::bind("127.0.0.1:0", handle).await.unwrap();
    let addr = relay.local_addr().unwrap().to_string();
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let server = tokio::spawn(relay.run(async {
        let _ = stop_rx.await;
    }));

    let register = format!(
        "new-backup:{},{},diff,sha256",
        original.display(),
        reflection.display()
    );
    assert_eq!(send_command(&addr, &register).await.unwrap(), Reply::Success);
    assert_eq!(fs::read_to_string(reflection.join("a.txt")).unwrap(), "hello");

    // Detail stays on the server; the client only learns it failed
    assert_eq!(send_command(&addr, "recover:/not/registered").await.unwrap(), Reply::Fail);

    let remove = format!("unbackup:{}", original.display());
    assert_eq!(send_command(&addr, &remove).await.unwrap(), Reply::Success);
    assert!(store.keys().unwrap().is_empty());

    stop_tx.send(()).unwrap();
    server.await.unwrap().unwrap();
    tokio::task::spawn_blocking(move || executor_thread.join().unwrap())
        .await
        .unwrap();
}
