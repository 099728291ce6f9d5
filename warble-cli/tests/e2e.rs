use std::{net::SocketAddr, path::Path, process::Stdio, sync::Arc, time::Duration};

use anyhow::{Context, Result, anyhow};
use func::{Dispatcher, FuncServer};
use kvstore::ConcurrentStore;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    net::TcpListener,
    process::{ChildStdout, Command},
    sync::oneshot,
    time::timeout,
};
use warble::WarbleService;

const COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn cli_drives_warble_end_to_end() -> Result<()> {
    let binary = assert_cmd::cargo::cargo_bin!("warble");

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let dispatcher = Dispatcher::new(WarbleService::new(), Arc::new(ConcurrentStore::new()));
    let server = FuncServer::new(listener, Arc::new(dispatcher));
    let addr = server.local_addr()?;
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let server_task = tokio::spawn(async move {
        let shutdown = async move {
            let _ = shutdown_rx.await;
        };
        let _ = server.run_until(shutdown).await;
    });

    // Nothing is hooked yet, so the event is reported as unhandled.
    let unhooked = run_warble(&binary, addr, &["register", "alice"]).await?;
    assert_eq!(
        unhooked,
        vec!["Request not handled: no function is hooked to event 1."]
    );

    for (event, function) in [
        ("1", "register"),
        ("2", "warble"),
        ("3", "follow"),
        ("4", "read"),
        ("5", "profile"),
        ("6", "stream"),
    ] {
        let hooked = run_warble(&binary, addr, &["hook", event, function]).await?;
        assert_eq!(hooked, vec![format!("Hooked event {event} to {function}.")]);
    }

    let registered = run_warble(&binary, addr, &["register", "alice"]).await?;
    assert_eq!(registered, vec!["Registered user alice."]);
    let again = run_warble(&binary, addr, &["register", "alice"]).await?;
    assert_eq!(
        again,
        vec!["Registration failed. The username alice is already taken."]
    );
    run_warble(&binary, addr, &["register", "bob"]).await?;

    let bad_name = run_warble(&binary, addr, &["register", "a,b"]).await?;
    assert_eq!(
        bad_name,
        vec![r#"Registration failed. Username "a,b" cannot contain ','."#]
    );

    let followed = run_warble(&binary, addr, &["follow", "--user", "bob", "alice"]).await?;
    assert_eq!(followed, vec!["bob now follows alice."]);
    let ghost = run_warble(&binary, addr, &["follow", "--user", "bob", "ghost"]).await?;
    assert_eq!(
        ghost,
        vec!["Following failed. Either bob or ghost is not registered."]
    );

    let posted = run_warble(
        &binary,
        addr,
        &["warble", "--user", "alice", "hello #rust"],
    )
    .await?;
    assert_eq!(posted.first().map(String::as_str), Some("Warble stored."));
    let warble_id = field(&posted, "warble id: ")?;

    let replied = run_warble(
        &binary,
        addr,
        &["warble", "--user", "bob", "hi alice", "--reply", warble_id.as_str()],
    )
    .await?;
    let reply_id = field(&replied, "warble id: ")?;
    assert_eq!(field(&replied, "reply to: ")?, warble_id);

    let thread = run_warble(&binary, addr, &["read", warble_id.as_str()]).await?;
    assert_eq!(
        thread,
        vec![
            format!("Thread starting at warble {warble_id}:"),
            format!("Warble Id: {warble_id}; User: alice; Text: hello #rust"),
            format!("Warble Id: {reply_id}; User: bob; Text: hi alice; Reply To: {warble_id}"),
        ]
    );

    let missing = run_warble(&binary, addr, &["read", "no-such-warble"]).await?;
    assert_eq!(
        missing,
        vec!["Reading thread failed. Warble no-such-warble does not exist."]
    );

    let profile = run_warble(&binary, addr, &["profile", "--user", "alice"]).await?;
    assert_eq!(
        profile,
        vec![
            "User alice has 1 followers:",
            "  bob",
            "User alice follows 0 users:",
        ]
    );

    let server_arg = addr.to_string();
    let mut streamer = Command::new(&binary)
        .args(["--server", server_arg.as_str(), "stream", "rust", "--interval-secs", "1"])
        .env("RUST_LOG", "warn")
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .context("failed to spawn stream")?;
    let mut stream_out = BufReader::new(
        streamer
            .stdout
            .take()
            .context("stream stdout missing after spawn")?,
    );
    let banner = read_line(&mut stream_out).await?;
    assert_eq!(banner, "Streaming new warbles tagged #rust:");

    let fresh = run_warble(
        &binary,
        addr,
        &["warble", "--user", "bob", "more #rust please"],
    )
    .await?;
    let fresh_id = field(&fresh, "warble id: ")?;
    let streamed = read_line(&mut stream_out).await?;
    assert!(
        streamed.starts_with(&format!(
            "Warble Id: {fresh_id}; User: bob; Text: more #rust please; Time: "
        )),
        "unexpected stream line: {streamed}"
    );
    let _ = streamer.kill().await;
    let _ = streamer.wait().await;

    run_warble(&binary, addr, &["unhook", "1"]).await?;
    let after_unhook = run_warble(&binary, addr, &["register", "carol"]).await?;
    assert_eq!(
        after_unhook,
        vec!["Request not handled: no function is hooked to event 1."]
    );

    let _ = shutdown_tx.send(());
    let _ = server_task.await;
    Ok(())
}

#[tokio::test]
async fn unreachable_service_exits_with_error() -> Result<()> {
    let binary = assert_cmd::cargo::cargo_bin!("warble");
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    drop(listener);

    let server_arg = addr.to_string();
    let output = timeout(
        COMMAND_TIMEOUT,
        Command::new(&binary)
            .args(["--server", server_arg.as_str(), "register", "alice"])
            .env("RUST_LOG", "off")
            .output(),
    )
    .await??;
    assert!(!output.status.success());
    Ok(())
}

/// Runs one `warble` command to completion and returns its stdout lines.
async fn run_warble(binary: &Path, addr: SocketAddr, args: &[&str]) -> Result<Vec<String>> {
    let output = timeout(
        COMMAND_TIMEOUT,
        Command::new(binary)
            .arg("--server")
            .arg(addr.to_string())
            .args(args)
            .env("RUST_LOG", "warn")
            .stderr(Stdio::null())
            .output(),
    )
    .await
    .map_err(|_| anyhow!("warble {args:?} timed out"))??;

    if !output.status.success() {
        return Err(anyhow!("warble {args:?} exited with {}", output.status));
    }
    let stdout = String::from_utf8(output.stdout).context("stdout is not utf-8")?;
    Ok(stdout.lines().map(str::to_string).collect())
}

fn field(lines: &[String], prefix: &str) -> Result<String> {
    lines
        .iter()
        .find_map(|line| line.strip_prefix(prefix))
        .map(str::to_string)
        .with_context(|| format!("no line starting with {prefix:?} in {lines:?}"))
}

async fn read_line(reader: &mut BufReader<ChildStdout>) -> Result<String> {
    let mut line = String::new();
    let bytes = timeout(COMMAND_TIMEOUT, reader.read_line(&mut line))
        .await
        .map_err(|_| anyhow!("timed out waiting for line"))??;
    if bytes == 0 {
        return Err(anyhow!("stream closed"));
    }
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}
