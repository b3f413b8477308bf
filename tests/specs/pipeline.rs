//! End-to-end landing/forwarding scenarios (S1, S2, S6 from spec §8), driven
//! against a real running daemon over TCP.
//!
//! `relative_path` doubles as the literal destination path on the "parallel
//! FS" once a file reaches `LUSTRE`/`TSM`/`LUSTRE_TSM` (§4.5 step 2 copies to
//! `file_info.fpath` directly) so, unlike the `LOCAL`-only S1 scenario,
//! these scenarios point it at a real path under the test's tempdir rather
//! than a literal `/lustre/...` string.

use crate::prelude::*;

fn landing_path_for(daemon: &TestDaemon, fs: &str, fpath: &str) -> PathBuf {
    let (high, low) = LandingStore::extract_hl_ll(fpath, fs).unwrap();
    daemon.landing_dir().join(high.trim_start_matches('/')).join(low.trim_start_matches('/'))
}

#[tokio::test]
async fn empty_file_lands_as_a_zero_byte_local_file() {
    let workdir = tempfile::tempdir().unwrap();
    let daemon = spawn_daemon(workdir.path(), DEFAULT_IDENTMAP).await;

    let mut client = Client::connect(("127.0.0.1", daemon.port), login("node-alpha")).await.unwrap();
    let session = client.open("/lustre", "/lustre/a/b/empty.bin", "", StorageDest::Local).await.unwrap();
    session.close().await.unwrap();
    client.disconnect().await.unwrap();

    let landed = daemon.landing_dir().join("a/b/empty.bin");
    assert!(landed.exists(), "empty CLOSE still creates a zero-byte landing file");
    assert_eq!(std::fs::metadata(&landed).unwrap().len(), 0);

    // LOCAL destinations are a terminal state as soon as they land, so the
    // worker just has to flip LOCAL_COPY_DONE -> FILE_KEEP.
    let reached_keep = wait_until(Duration::from_secs(2), || {
        ltsmd_storage::read_all(&landed).map(|t| t.state == ActionState::FileKeep).unwrap_or(false)
    })
    .await;
    assert!(reached_keep, "LOCAL file should reach FILE_KEEP");
    assert!(landed.exists(), "LOCAL destination never unlinks the landing copy");

    daemon.shutdown().await;
}

#[tokio::test]
async fn small_file_lustre_destination_travels_to_the_parallel_fs_with_identity_map_ownership() {
    let workdir = tempfile::tempdir().unwrap();
    let daemon = spawn_daemon(workdir.path(), DEFAULT_IDENTMAP).await;

    let target = workdir.path().join("parallel/a/b/hello.bin");
    let fpath = target.display().to_string();
    let landed = landing_path_for(&daemon, "/lustre", &fpath);

    let mut client = Client::connect(("127.0.0.1", daemon.port), login("node-alpha")).await.unwrap();
    let mut session = client.open("/lustre", &fpath, "", StorageDest::Lustre).await.unwrap();
    session.write(b"hello").await.unwrap();
    session.close().await.unwrap();
    client.disconnect().await.unwrap();

    assert!(landed.exists(), "landing copy exists right after CLOSE");

    let copied = wait_until(Duration::from_secs(2), || target.exists()).await;
    assert!(copied, "file should be copied to the parallel FS");
    assert_eq!(std::fs::read(&target).unwrap(), b"hello");

    let landing_gone = wait_until(Duration::from_secs(2), || !landed.exists()).await;
    assert!(landing_gone, "LUSTRE destination unlinks the landing copy once kept");

    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        let meta = std::fs::metadata(&target).unwrap();
        assert_eq!(meta.uid(), 2001, "parallel-FS copy is chowned to the identity-map uid");
        assert_eq!(meta.gid(), 2001, "parallel-FS copy is chowned to the identity-map gid");
    }

    daemon.shutdown().await;
}

#[tokio::test]
async fn backend_failures_within_tolerance_still_reach_file_keep() {
    let workdir = tempfile::tempdir().unwrap();
    let backend = ScriptedBackend::failing(2);
    let daemon =
        spawn_daemon_full(workdir.path(), DEFAULT_IDENTMAP, std::sync::Arc::new(backend.clone()), |cfg| {
            cfg.tolerr = 4;
        })
        .await;

    let target = workdir.path().join("parallel/c.bin");
    let fpath = target.display().to_string();
    let landed = landing_path_for(&daemon, "/lustre", &fpath);

    let mut client = Client::connect(("127.0.0.1", daemon.port), login("node-alpha")).await.unwrap();
    let mut session = client.open("/lustre", &fpath, "", StorageDest::LustreTsm).await.unwrap();
    session.write(b"x").await.unwrap();
    session.close().await.unwrap();
    client.disconnect().await.unwrap();

    let kept = wait_until(Duration::from_secs(3), || !landed.exists() && target.exists()).await;
    assert!(kept, "TSM_LUSTRE destination should reach FILE_KEEP despite two transient failures");
    assert_eq!(backend.attempts_for(&fpath), 3, "two failures then one success");

    daemon.shutdown().await;
}

#[tokio::test]
async fn backend_failures_beyond_tolerance_poison_the_file() {
    let workdir = tempfile::tempdir().unwrap();
    let backend = ScriptedBackend::failing(2);
    let daemon = spawn_daemon_full(workdir.path(), DEFAULT_IDENTMAP, std::sync::Arc::new(backend), |cfg| {
        cfg.tolerr = 1;
    })
    .await;

    let target = workdir.path().join("parallel/d.bin");
    let fpath = target.display().to_string();
    let landed = landing_path_for(&daemon, "/lustre", &fpath);

    let mut client = Client::connect(("127.0.0.1", daemon.port), login("node-alpha")).await.unwrap();
    let mut session = client.open("/lustre", &fpath, "", StorageDest::LustreTsm).await.unwrap();
    session.write(b"x").await.unwrap();
    session.close().await.unwrap();
    client.disconnect().await.unwrap();

    let poisoned = wait_until(Duration::from_secs(3), || {
        ltsmd_storage::read_all(&landed).map(|t| t.state == ActionState::FileOmitted).unwrap_or(false)
    })
    .await;
    assert!(poisoned, "error_count should exceed tolerance and persist FILE_OMITTED");
    assert!(landed.exists(), "a poisoned file's landing copy is left in place for operator investigation");

    daemon.shutdown().await;
}
