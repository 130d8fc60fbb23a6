//! End-to-end tests: real servers and clients over loopback TCP
// (c) 2026 rupd contributors
#![cfg(unix)]

mod common;

use std::{collections::BTreeMap, time::Duration};

use assertables::assert_contains;
use pretty_assertions::assert_eq;
use tokio::net::TcpStream;

use common::{
    capture, files_in, Robot, DECRYPT_NOTHING, DECRYPT_UNMARKED, DRIVER_FAILING, DRIVER_OK,
};
use rupd::{
    client::{Channel, Orchestrator},
    protocol::{Message, MessageStream, Tag, DEFAULT_MESSAGE_LIMIT},
    role::Role,
    server::reason,
    token,
};

async fn raw_connection(addr: std::net::SocketAddr) -> MessageStream<TcpStream> {
    MessageStream::new(TcpStream::connect(addr).await.unwrap(), DEFAULT_MESSAGE_LIMIT)
}

async fn request(stream: &mut MessageStream<TcpStream>, m: Message) -> Message {
    stream.send(&m).await.unwrap();
    stream.receive().await.unwrap().unwrap()
}

async fn authenticated_connection(addr: std::net::SocketAddr) -> MessageStream<TcpStream> {
    let mut s = raw_connection(addr).await;
    let token = token::encode_socket(s.get_ref().local_addr().unwrap());
    assert!(request(&mut s, Message::text(Tag::Auth, token)).await.is(Tag::Ack));
    s
}

async fn assert_silent(stream: &mut MessageStream<TcpStream>) {
    let waited = tokio::time::timeout(Duration::from_millis(200), stream.receive()).await;
    assert!(waited.is_err(), "unexpected reply {waited:?}");
}

fn channel_for(robot: &Robot, role: Role, addr: std::net::SocketAddr) -> Channel {
    Channel::with_port(role, "127.0.0.1", addr.port(), &robot.config(role))
}

#[tokio::test]
async fn nothing_happens_before_auth() {
    let robot = Robot::new(DRIVER_OK);
    let addr = robot.serve(Role::Mr).await;
    let mut s = raw_connection(addr).await;

    let reply = request(&mut s, Message::bare(Tag::Vers)).await;
    assert!(reply.is(Tag::Vers));
    assert!(reply.body_text().starts_with("rupd/"));

    for m in [
        Message::text(Tag::Info, "demo.enc.tar.gz,10"),
        Message::new(Tag::Data, &b"0123456789"[..]),
        Message::bare(Tag::Dchk),
        Message::bare(Tag::Bash),
        Message::bare(Tag::Logs),
        Message::text(Tag::Mlog, "robot"),
    ] {
        let reply = request(&mut s, m).await;
        assert!(reply.is(Tag::Fail));
        assert_eq!(reply.body_text(), reason::AUTH_REQUIRED);
    }
    assert!(files_in(&robot.path("staging")).is_empty());
    assert!(files_in(&robot.path("install")).is_empty());
}

#[tokio::test]
async fn token_for_another_connection_is_refused() {
    let robot = Robot::new(DRIVER_OK);
    let addr = robot.serve(Role::Mr).await;
    let mut s = raw_connection(addr).await;
    let local = s.get_ref().local_addr().unwrap();

    let wrong = token::encode(&local.ip().to_string(), local.port().wrapping_add(1));
    let reply = request(&mut s, Message::text(Tag::Auth, wrong)).await;
    assert!(reply.is(Tag::Fail));
    assert_eq!(reply.body_text(), reason::AUTH_FAILED);

    let right = token::encode_socket(local);
    let reply = request(&mut s, Message::text(Tag::Auth, right)).await;
    assert!(reply.is(Tag::Ack));
}

#[tokio::test]
async fn full_update() {
    let robot = Robot::new(DRIVER_OK);
    let addr = robot.serve(Role::Mr).await;
    let archive = robot.archive("demo.enc.tar.gz", "MR1.0.0", 150_000);

    let mut channel = Channel::with_port(Role::Mr, "127.0.0.1", addr.port(), &robot.config(Role::Mr));
    let (sink, lines) = capture();
    channel.set_sink(sink);
    channel.select_file(&archive).unwrap();
    channel.connect().await.unwrap();
    assert!(channel.server_version().unwrap().starts_with("rupd/"));
    channel.update(true).await.unwrap();
    channel.close().await.unwrap();

    let installed = robot.path("install");
    assert_eq!(
        std::fs::read_to_string(installed.join("demo/src/README")).unwrap(),
        "unpacked\n"
    );
    assert!(installed.join("mr_update.sh").is_file());

    assert_contains!(channel.log_details(), "software_version MR1.0.0");
    assert_contains!(channel.log_details(), "driver update demo build");

    let saved: Vec<_> = files_in(&robot.path("client"))
        .into_iter()
        .filter(|n| n.starts_with("logs_demo.enc.tar.gz_"))
        .collect();
    assert_eq!(saved.len(), 1);

    let lines = lines.lock().unwrap().clone();
    for expected in [
        "[MR] Connected successfully.",
        "[MR] Authentication successful.",
        "[MR] File information transmitted.",
        "[MR] File data check successful.",
        "[MR] Build completed.",
        "[MR] Logs request successful.",
    ] {
        assert!(lines.iter().any(|l| l == expected), "missing {expected:?} in {lines:#?}");
    }
    assert!(lines.iter().any(|l| l.starts_with("[MR] Processing... ")));
}

#[tokio::test]
async fn build_failure_still_fetches_log() {
    let robot = Robot::new(DRIVER_FAILING);
    let addr = robot.serve(Role::Mr).await;
    let archive = robot.archive("demo.enc.tar.gz", "MR1.0.0", 1000);

    let mut channel = Channel::with_port(Role::Mr, "127.0.0.1", addr.port(), &robot.config(Role::Mr));
    channel.select_file(&archive).unwrap();
    channel.connect().await.unwrap();
    let err = channel.update(false).await.unwrap_err();
    assert_contains!(err.to_string(), reason::BUILD_FAILED);
    assert_contains!(channel.log_details(), "2 packages failed");
}

#[tokio::test]
async fn wrong_role_archive_is_not_compatible() {
    let robot = Robot::new(DRIVER_OK);
    let addr = robot.serve(Role::Fs).await;
    let archive = robot.archive("demo.enc.tar.gz", "MR1.0.0", 1000);

    let mut channel = Channel::with_port(Role::Fs, "127.0.0.1", addr.port(), &robot.config(Role::Fs));
    channel.select_file(&archive).unwrap();
    channel.connect().await.unwrap();
    let err = channel.update(false).await.unwrap_err();
    assert_contains!(err.to_string(), reason::NOT_COMPATIBLE);
    assert!(!robot.path("install").join("demo").exists());
}

#[tokio::test]
async fn log_category_is_reconstructed() {
    let robot = Robot::new(DRIVER_OK);
    let category = robot.path("logs").join("robot");
    std::fs::create_dir_all(&category).unwrap();
    let big: Vec<u8> = (0..200_000u32).map(|i| (i % 253) as u8).collect();
    std::fs::write(category.join("a.log"), &big).unwrap();
    std::fs::write(category.join("b.log"), b"short\n").unwrap();
    std::fs::write(category.join("notes.txt"), b"not a log").unwrap();
    let addr = robot.serve(Role::Mr).await;

    let mut channel = Channel::with_port(Role::Mr, "127.0.0.1", addr.port(), &robot.config(Role::Mr));
    channel.connect().await.unwrap();
    let out = robot.path("client").join("fetched");
    let summary = channel.request_logs(&out, "robot").await.unwrap();
    assert!(summary.is_clean());
    assert_eq!(summary.files.len(), 2);
    assert_eq!(files_in(&out), vec!["a.log".to_string(), "b.log".to_string()]);
    assert_eq!(std::fs::read(out.join("a.log")).unwrap(), big);
    assert_eq!(std::fs::read(out.join("b.log")).unwrap(), b"short\n");
}

#[tokio::test]
async fn log_category_outside_root_is_refused() {
    let robot = Robot::new(DRIVER_OK);
    let addr = robot.serve(Role::Mr).await;
    let mut channel = Channel::with_port(Role::Mr, "127.0.0.1", addr.port(), &robot.config(Role::Mr));
    channel.connect().await.unwrap();
    let err = channel
        .request_logs(&robot.path("client"), "../scripts")
        .await
        .unwrap_err();
    assert_contains!(err.to_string(), reason::DIRECTORY_NOT_FOUND);
}

#[tokio::test]
async fn orchestrated_update_of_both_roles() {
    let robot = Robot::new(DRIVER_OK);
    let mr = robot.serve(Role::Mr).await;
    let fs = robot.serve(Role::Fs).await;
    let mut files = BTreeMap::new();
    let _ = files.insert(Role::Mr, robot.archive("mr_demo.enc.tar.gz", "MR2.0", 70_000));
    let _ = files.insert(Role::Fs, robot.archive("fs_demo.enc.tar.gz", "FS2.0", 500));

    let mut orchestrator = Orchestrator::from_channels(vec![
        Channel::with_port(Role::Mr, "127.0.0.1", mr.port(), &robot.config(Role::Mr)),
        Channel::with_port(Role::Fs, "127.0.0.1", fs.port(), &robot.config(Role::Fs)),
    ]);
    let report = orchestrator.update_all(&files, false).await;
    assert!(report.succeeded(), "{report}");
    assert!(robot.path("install").join("mr_demo").is_dir());
    assert!(robot.path("install").join("fs_demo").is_dir());

    let logs = orchestrator.log_details();
    assert_contains!(logs[&Role::Mr], "software_version MR2.0");
    assert_contains!(logs[&Role::Fs], "software_version FS2.0");
}

#[tokio::test]
async fn one_failing_role_fails_the_whole_update() {
    let robot = Robot::new(DRIVER_OK);
    let mr = robot.serve(Role::Mr).await;
    let fs = robot.serve(Role::Fs).await;
    let mut files = BTreeMap::new();
    let _ = files.insert(Role::Mr, robot.archive("mr_demo.enc.tar.gz", "MR2.0", 500));
    let _ = files.insert(Role::Fs, robot.archive("fs_demo.enc.tar.gz", "MR2.0", 500));

    let mut orchestrator = Orchestrator::from_channels(vec![
        Channel::with_port(Role::Mr, "127.0.0.1", mr.port(), &robot.config(Role::Mr)),
        Channel::with_port(Role::Fs, "127.0.0.1", fs.port(), &robot.config(Role::Fs)),
    ]);
    let report = orchestrator.update_all(&files, false).await;
    assert!(!report.succeeded());
    assert!(report.outcomes[0].succeeded());
    assert_contains!(
        report.outcomes[1].error.as_deref().unwrap(),
        reason::NOT_COMPATIBLE
    );
}

#[tokio::test]
async fn upload_in_chunks_then_verify() {
    let robot = Robot::new(DRIVER_OK);
    let addr = robot.serve(Role::Mr).await;
    let data = std::fs::read(robot.archive("demo.enc.tar.gz", "MR1.0.0", 100)).unwrap();
    let mut s = authenticated_connection(addr).await;

    let reply = request(&mut s, Message::text(Tag::Info, "demo.enc.tar.gz,100")).await;
    assert!(reply.is(Tag::Ack));
    for chunk in [&data[..40], &data[40..80]] {
        s.send(&Message::new(Tag::Data, chunk.to_vec())).await.unwrap();
    }
    assert_silent(&mut s).await;
    let reply = request(&mut s, Message::new(Tag::Data, data[80..].to_vec())).await;
    assert!(reply.is(Tag::Ack));

    let reply = request(&mut s, Message::bare(Tag::Dchk)).await;
    assert!(reply.is(Tag::Ack), "{}", reply.body_text());
    assert!(robot.decrypt_ran());
    assert!(robot.path("install").join("demo/src/README").is_file());
    assert!(files_in(&robot.path("staging")).is_empty());
}

#[tokio::test]
async fn short_upload_is_never_decrypted() {
    let robot = Robot::new(DRIVER_OK);
    let addr = robot.serve(Role::Mr).await;
    let mut s = authenticated_connection(addr).await;

    let _ = request(&mut s, Message::text(Tag::Info, "demo.enc.tar.gz,100")).await;
    s.send(&Message::new(Tag::Data, vec![b'x'; 40])).await.unwrap();
    let reply = request(&mut s, Message::bare(Tag::Dchk)).await;
    assert!(reply.is(Tag::Fail));
    assert_eq!(reply.body_text(), reason::SIZE_MISMATCH);
    assert!(!robot.decrypt_ran());
    assert!(files_in(&robot.path("staging")).is_empty());
    assert!(files_in(&robot.path("install")).is_empty());
}

#[tokio::test]
async fn decrypt_without_output_fails() {
    let robot = Robot::new(DRIVER_OK);
    robot.script("script.sh", DECRYPT_NOTHING);
    let addr = robot.serve(Role::Mr).await;
    let archive = robot.archive("demo.enc.tar.gz", "MR1.0.0", 1000);

    let mut channel = channel_for(&robot, Role::Mr, addr);
    channel.select_file(&archive).unwrap();
    channel.connect().await.unwrap();
    let err = channel.update(false).await.unwrap_err();
    assert_contains!(err.to_string(), reason::DECRYPT_FAILED);
    assert!(robot.decrypt_ran());
    assert_contains!(channel.log_details(), "corrupt archive");
    assert!(!robot.path("install").join("demo").exists());
}

#[tokio::test]
async fn missing_decrypt_script_fails_decryption() {
    let robot = Robot::new(DRIVER_OK);
    std::fs::remove_file(robot.path("scripts").join("script.sh")).unwrap();
    let addr = robot.serve(Role::Mr).await;
    let archive = robot.archive("demo.enc.tar.gz", "MR1.0.0", 1000);

    let mut channel = channel_for(&robot, Role::Mr, addr);
    channel.select_file(&archive).unwrap();
    channel.connect().await.unwrap();
    let err = channel.update(false).await.unwrap_err();
    assert_contains!(err.to_string(), reason::DECRYPT_FAILED);
    assert!(!err.to_string().contains("could not stage"));
    assert_contains!(channel.log_details(), "could not stage script.sh");
}

#[tokio::test]
async fn decryption_needs_a_key() {
    let robot = Robot::new(DRIVER_OK);
    let mut config = robot.config(Role::Mr);
    config.decrypt_key = String::new();
    let addr = robot.serve_with(Role::Mr, config).await;
    let archive = robot.archive("demo.enc.tar.gz", "MR1.0.0", 1000);

    let mut channel = channel_for(&robot, Role::Mr, addr);
    channel.select_file(&archive).unwrap();
    channel.connect().await.unwrap();
    let err = channel.update(false).await.unwrap_err();
    assert_contains!(err.to_string(), reason::NO_KEY);
    assert!(!robot.decrypt_ran());
    assert!(files_in(&robot.path("install")).is_empty());
}

#[tokio::test]
async fn bundled_driver_is_preferred() {
    let robot = Robot::new(DRIVER_OK);
    let addr = robot.serve(Role::Mr).await;
    let archive = robot.archive_with_driver("demo.enc.tar.gz", "MR1.0.0", 1000);

    let mut channel = channel_for(&robot, Role::Mr, addr);
    channel.select_file(&archive).unwrap();
    channel.connect().await.unwrap();
    channel.update(false).await.unwrap();

    let driver = std::fs::read_to_string(robot.path("install").join("mr_update.sh")).unwrap();
    assert_contains!(driver, "bundled driver");
    assert_contains!(channel.log_details(), "bundled driver update demo build");
    assert!(!channel.log_details().contains("demo/scripts/mr_update.sh"));
}

#[tokio::test]
async fn server_driver_is_the_fallback() {
    let robot = Robot::new(DRIVER_OK);
    let addr = robot.serve(Role::Mr).await;
    let archive = robot.archive("demo.enc.tar.gz", "MR1.0.0", 1000);

    let mut channel = channel_for(&robot, Role::Mr, addr);
    channel.select_file(&archive).unwrap();
    channel.connect().await.unwrap();
    channel.update(false).await.unwrap();

    let driver = std::fs::read_to_string(robot.path("install").join("mr_update.sh")).unwrap();
    assert_eq!(driver, DRIVER_OK);
    // The log records why the bundled copy was not used.
    assert_contains!(channel.log_details(), "demo/scripts/mr_update.sh");
    assert_contains!(channel.log_details(), "driver update demo build");
}

#[tokio::test]
async fn unwritable_install_root_abandons_transfer() {
    let robot = Robot::new(DRIVER_OK);
    let blocker = robot.path("not_a_directory");
    std::fs::write(&blocker, b"in the way").unwrap();
    let mut config = robot.config(Role::Mr);
    config.install_root = blocker;
    let addr = robot.serve_with(Role::Mr, config).await;
    let data = std::fs::read(robot.archive("demo.enc.tar.gz", "MR1.0.0", 100)).unwrap();
    let mut s = authenticated_connection(addr).await;

    let _ = request(&mut s, Message::text(Tag::Info, "demo.enc.tar.gz,100")).await;
    assert!(request(&mut s, Message::new(Tag::Data, data)).await.is(Tag::Ack));
    let reply = request(&mut s, Message::bare(Tag::Dchk)).await;
    assert!(reply.is(Tag::Fail));
    assert_eq!(reply.body_text(), reason::INSTALL_FAILED);
    assert!(files_in(&robot.path("staging")).is_empty());

    // The transfer is gone; the details are in the session log.
    let reply = request(&mut s, Message::bare(Tag::Dchk)).await;
    assert!(reply.is(Tag::Fail));
    assert_eq!(reply.body_text(), reason::INFO_FAILED);
    let reply = request(&mut s, Message::bare(Tag::Logs)).await;
    assert!(reply.is(Tag::Ack));
    assert_contains!(reply.body_text(), "os error");
}

#[tokio::test]
async fn version_marker_must_come_from_this_decrypt() {
    let robot = Robot::new(DRIVER_OK);
    let addr = robot.serve(Role::Mr).await;
    let data = std::fs::read(robot.archive("demo.enc.tar.gz", "MR1.0.0", 100)).unwrap();
    let mut s = authenticated_connection(addr).await;

    for (decrypt, expect_ack) in [(None, true), (Some(DECRYPT_UNMARKED), false)] {
        if let Some(script) = decrypt {
            robot.script("script.sh", script);
        }
        let _ = request(&mut s, Message::text(Tag::Info, "demo.enc.tar.gz,100")).await;
        assert!(request(&mut s, Message::new(Tag::Data, data.clone())).await.is(Tag::Ack));
        let reply = request(&mut s, Message::bare(Tag::Dchk)).await;
        assert_eq!(reply.is(Tag::Ack), expect_ack, "{}", reply.body_text());
        if !expect_ack {
            assert_eq!(reply.body_text(), reason::NOT_VALID);
        }
    }
}
