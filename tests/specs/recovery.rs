//! Crash recovery (S7 from spec §8): files left mid-pipeline by a daemon
//! that died are picked back up by the next startup's recovery scan,
//! exercised here through a real `Supervisor`, not just `scan()` in
//! isolation (see `ltsmd_storage`'s own unit tests for that).

use crate::prelude::*;
use ltsmd_storage::Tags;

#[tokio::test]
async fn a_fresh_startup_redrives_everything_a_prior_run_left_mid_pipeline() {
    let workdir = tempfile::tempdir().unwrap();
    let landing_dir = workdir.path().join("landing");
    std::fs::create_dir_all(&landing_dir).unwrap();

    let count = 10;
    let mut targets = Vec::new();
    for i in 0..count {
        let landed = landing_dir.join(format!("r{i}.bin"));
        let payload = format!("payload-{i}").into_bytes();
        std::fs::write(&landed, &payload).unwrap();

        let target = workdir.path().join(format!("parallel/r{i}.bin"));
        let fpath = target.display().to_string();
        ltsmd_storage::write_all(
            &landed,
            &Tags {
                state: ActionState::LustreCopyRun,
                archive_id: 1,
                fs: "/lustre".into(),
                fpath: fpath.clone(),
                desc: "".into(),
                storage_dest: StorageDest::Lustre,
            },
        )
        .unwrap();

        targets.push((landed, target));
    }

    // This spawns a `Supervisor` against the same landing root, which runs
    // the recovery scan before it ever accepts a connection -- standing in
    // for "the daemon restarted after a crash".
    let daemon = spawn_daemon(workdir.path(), DEFAULT_IDENTMAP).await;

    let all_recovered = wait_until(Duration::from_secs(5), || {
        targets.iter().all(|(landed, target)| !landed.exists() && target.exists())
    })
    .await;
    assert!(all_recovered, "every mid-pipeline file should be redriven to completion on restart");

    for (_, target) in &targets {
        assert!(std::fs::read(target).unwrap().starts_with(b"payload-"));
    }

    daemon.shutdown().await;
}

#[tokio::test]
async fn file_omitted_is_left_alone_across_a_restart_unless_reset_is_requested() {
    let workdir = tempfile::tempdir().unwrap();
    let landing_dir = workdir.path().join("landing");
    std::fs::create_dir_all(&landing_dir).unwrap();

    let landed = landing_dir.join("poisoned.bin");
    std::fs::write(&landed, b"x").unwrap();
    let target = workdir.path().join("parallel/poisoned.bin");
    ltsmd_storage::write_all(
        &landed,
        &Tags {
            state: ActionState::FileOmitted,
            archive_id: 1,
            fs: "/lustre".into(),
            fpath: target.display().to_string(),
            desc: "".into(),
            storage_dest: StorageDest::Lustre,
        },
    )
    .unwrap();

    let daemon = spawn_daemon(workdir.path(), DEFAULT_IDENTMAP).await;

    // Give the worker pool a beat in case it (incorrectly) picked this up.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(landed.exists(), "FILE_OMITTED is never redriven on a plain restart");
    assert!(!target.exists(), "an omitted file is never forwarded to the parallel FS");
    assert_eq!(
        ltsmd_storage::read_all(&landed).unwrap().state,
        ActionState::FileOmitted,
        "restart must not touch an omitted file's persisted state"
    );

    daemon.shutdown().await;
}
