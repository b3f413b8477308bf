//! Protocol-boundary scenarios (S3-S5, P2, P3, P8 from spec §8): malformed
//! or adversarial clients, driven against a real running daemon.

use crate::prelude::*;

#[tokio::test]
async fn duplicate_open_on_the_same_path_fails_the_open_but_keeps_the_session() {
    let workdir = tempfile::tempdir().unwrap();
    let daemon = spawn_daemon(workdir.path(), DEFAULT_IDENTMAP).await;

    let mut first = Client::connect(("127.0.0.1", daemon.port), login("node-alpha")).await.unwrap();
    let _first_session =
        first.open("/lustre", "/lustre/same.bin", "", StorageDest::Local).await.unwrap();

    let mut second = Client::connect(("127.0.0.1", daemon.port), login("node-alpha")).await.unwrap();
    let err = second
        .open("/lustre", "/lustre/same.bin", "", StorageDest::Local)
        .await
        .expect_err("a second OPEN on a path that is already landing must collide");
    match err {
        ClientError::Remote { code, .. } => assert_eq!(code, 21, "AlreadyExists is reported as code 21"),
        other => panic!("expected a Remote error, got {other:?}"),
    }

    // The OPEN failure is scoped to that file; the session itself survives
    // and can still open a different path.
    let retry = second.open("/lustre", "/lustre/other.bin", "", StorageDest::Local).await;
    assert!(retry.is_ok(), "session should still accept OPEN after an open-scoped error");
    retry.unwrap().close().await.unwrap();
    second.disconnect().await.unwrap();

    drop(_first_session);
    first.disconnect().await.unwrap();
    daemon.shutdown().await;
}

#[tokio::test]
async fn unknown_node_is_denied_at_connect() {
    let workdir = tempfile::tempdir().unwrap();
    let daemon = spawn_daemon(workdir.path(), DEFAULT_IDENTMAP).await;

    let err = Client::connect(("127.0.0.1", daemon.port), login("node-ghost"))
        .await
        .expect_err("a node absent from the identity map must be refused at CONNECT");
    match err {
        ClientError::Remote { code, .. } => assert_eq!(code, 30, "AuthAccessDenied is reported as code 30"),
        other => panic!("expected a Remote error, got {other:?}"),
    }

    daemon.shutdown().await;
}

#[tokio::test]
async fn a_peer_on_a_different_protocol_version_is_rejected_before_the_body_is_decoded() {
    let workdir = tempfile::tempdir().unwrap();
    let daemon = spawn_daemon(workdir.path(), DEFAULT_IDENTMAP).await;

    let mut stream = TcpStream::connect(("127.0.0.1", daemon.port)).await.unwrap();
    let packet = Packet::new(StateFlags::CONNECT, PacketBody::Login(login("node-alpha")));
    let mut frame = encode(&packet).unwrap();
    frame[0] = PROTOCOL_VERSION + 1;
    transport::write_message(&mut stream, &frame).await.unwrap();

    let (read_half, _write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let reply = recv(&mut reader, StateFlags::all()).await.unwrap();
    assert!(reply.is_error(), "version skew must be reported, not silently dropped");
    assert_eq!(reply.error.unwrap().code, 3, "VersionMismatch is reported as code 3");

    // The session is then torn down; a further read observes EOF rather
    // than the daemon waiting on more frames from a peer it can't speak to.
    let mut scratch = [0u8; 1];
    let n = tokio::io::AsyncReadExt::read(&mut reader, &mut scratch).await.unwrap();
    assert_eq!(n, 0, "connection is closed after a version-skew error, not kept open");

    daemon.shutdown().await;
}

#[tokio::test]
async fn connections_past_the_session_cap_are_dropped_without_reading_a_byte() {
    let workdir = tempfile::tempdir().unwrap();
    let daemon = spawn_daemon_with_cap(workdir.path(), DEFAULT_IDENTMAP, 1).await;

    // Occupy the only session slot and hold it open.
    let _first = Client::connect(("127.0.0.1", daemon.port), login("node-alpha")).await.unwrap();

    let mut second = TcpStream::connect(("127.0.0.1", daemon.port)).await.unwrap();
    let mut scratch = [0u8; 1];
    let n = tokio::time::timeout(Duration::from_secs(1), AsyncReadExt::read(&mut second, &mut scratch))
        .await
        .expect("daemon should close the rejected connection promptly")
        .unwrap();
    assert_eq!(n, 0, "a connection past the cap gets no CONNECT reply at all, just a close");

    daemon.shutdown().await;
}
