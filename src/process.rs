//! Subprocess supervisor: spawns the CLI agent binary, waits for readiness,
//! forwards its stderr, and detects crashes (§4.C).

use crate::error::{Error, Result};
use crate::types::ClientOptions;
use regex::Regex;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::process::{Child, Command};

/// Environment variable names stripped from the child's environment before
/// spawn, plus any variable ending in one of the listed suffixes. Prevents a
/// debug session in the parent process from leaking into the CLI (§3).
const DEBUG_ENV_DENYLIST: &[&str] = &["DEBUG", "NODE_DEBUG", "NODE_OPTIONS"];
const DEBUG_ENV_SUFFIXES: &[&str] = &["_DEBUG", "_LOG_LEVEL"];

const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(10);

fn is_denied_env_var(key: &str) -> bool {
    DEBUG_ENV_DENYLIST.contains(&key) || DEBUG_ENV_SUFFIXES.iter().any(|suffix| key.ends_with(suffix))
}

/// A live transport: a readable half and a writable half, plus the child
/// process that owns them (if any — external connections have none).
pub struct Connection {
    pub reader: Box<dyn AsyncRead + Unpin + Send>,
    pub writer: Box<dyn tokio::io::AsyncWrite + Unpin + Send>,
    pub child: Option<Child>,
}

/// Builds the CLI's argument vector, resolving the JS/`node` and Windows
/// `cmd /C` indirections a bare executable name needs on those platforms (§3).
fn resolve_command(cli_path: &str) -> (String, Vec<String>) {
    if cli_path.ends_with(".js") {
        return ("node".to_string(), vec![cli_path.to_string()]);
    }
    if cfg!(windows) && !cli_path.contains('/') && !cli_path.contains('\\') && !cli_path.ends_with(".exe") {
        return ("cmd".to_string(), vec!["/C".to_string(), cli_path.to_string()]);
    }
    (cli_path.to_string(), Vec::new())
}

fn build_command(options: &ClientOptions, extra_args: &[String]) -> Command {
    let cli_path = options.cli_path.as_deref().unwrap_or("cli-agent");
    let (program, mut args) = resolve_command(cli_path);
    args.push("--server".to_string());
    args.push("--log-level".to_string());
    args.push(options.log_level.clone().unwrap_or_else(|| "info".to_string()));
    args.extend(extra_args.iter().cloned());

    let mut cmd = Command::new(program);
    cmd.args(&args);

    if let Some(ref cwd) = options.cwd {
        cmd.current_dir(cwd);
    }

    for (key, _) in std::env::vars() {
        if is_denied_env_var(&key) {
            cmd.env_remove(key);
        }
    }
    if let Some(ref env) = options.env {
        for (key, value) in env {
            cmd.env(key, value);
        }
    }

    cmd
}

/// Spawns the CLI over stdio. Readiness is immediate: the child is usable as
/// soon as its pipes are open (§4.C).
pub async fn spawn_stdio(options: &ClientOptions) -> Result<Connection> {
    let mut cmd = build_command(options, &["--stdio".to_string()]);
    cmd.stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = cmd
        .spawn()
        .map_err(|e| Error::Process(format!("failed to spawn CLI process: {e}")))?;

    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| Error::Process("child has no stdin".to_string()))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| Error::Process("child has no stdout".to_string()))?;
    if let Some(stderr) = child.stderr.take() {
        spawn_stderr_forwarder(stderr);
    }

    Ok(Connection {
        reader: Box::new(stdout),
        writer: Box::new(stdin),
        child: Some(child),
    })
}

/// Spawns the CLI in TCP mode, waits for it to print its listening port on
/// stdout, then connects to it (§4.C).
pub async fn spawn_tcp(options: &ClientOptions) -> Result<Connection> {
    let port_arg = options.port.unwrap_or(0).to_string();
    let mut cmd = build_command(options, &["--port".to_string(), port_arg]);
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

    let mut child = cmd
        .spawn()
        .map_err(|e| Error::Process(format!("failed to spawn CLI process: {e}")))?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| Error::Process("child has no stdout".to_string()))?;
    if let Some(stderr) = child.stderr.take() {
        spawn_stderr_forwarder(stderr);
    }

    let ready_timeout = options.ready_timeout.unwrap_or(DEFAULT_READY_TIMEOUT);
    let port = tokio::time::timeout(ready_timeout, read_listening_port(stdout))
        .await
        .map_err(|_| Error::Timeout("timed out waiting for CLI to report its listening port".to_string()))??;

    let stream = TcpStream::connect(("127.0.0.1", port))
        .await
        .map_err(|e| Error::Connection(format!("failed to connect to CLI on port {port}: {e}")))?;
    let (reader, writer) = stream.into_split();

    Ok(Connection {
        reader: Box::new(reader),
        writer: Box::new(writer),
        child: Some(child),
    })
}

/// Parses a `cliUrl` option into `(host, port, external)` (§4.C, §8 scenario 6).
///
/// - A bare port (`"8080"`) defaults to `localhost`.
/// - `http://`/`https://`/`tcp://` prefixes are stripped.
/// - Ports outside 1..=65535 and unparseable input are rejected before any
///   frame is sent (§7.4): callers must see `/Invalid port/` or
///   `/Invalid cliUrl format/` respectively.
pub fn parse_cli_url(cli_url: &str) -> Result<(String, u16, bool)> {
    let without_scheme = cli_url
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_start_matches("tcp://");

    let (host, port_str) = match without_scheme.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() => (host.to_string(), port),
        Some((_, port)) => ("localhost".to_string(), port),
        None => ("localhost".to_string(), without_scheme),
    };

    let port: u32 = port_str
        .parse()
        .map_err(|_| Error::InvalidConfig(format!("Invalid cliUrl format: {cli_url}")))?;
    if port == 0 || port > 65535 {
        return Err(Error::InvalidConfig(format!("Invalid port: {port}")));
    }

    Ok((host, port as u16, true))
}

/// Connects to an already-running CLI server without spawning one (§4.C, §4.D).
pub async fn connect_external(cli_url: &str) -> Result<Connection> {
    let (host, port, _external) = parse_cli_url(cli_url)?;
    let addr = format!("{host}:{port}");

    let stream = TcpStream::connect(&addr)
        .await
        .map_err(|e| Error::Connection(format!("failed to connect to {addr}: {e}")))?;
    let (reader, writer) = stream.into_split();

    Ok(Connection {
        reader: Box::new(reader),
        writer: Box::new(writer),
        child: None,
    })
}

/// Matches the CLI's `listening on port <N>` readiness line (§4.C).
fn listening_port_regex() -> Regex {
    Regex::new(r"listening on port (\d+)").expect("static regex is valid")
}

async fn read_listening_port<R>(reader: R) -> Result<u16>
where
    R: AsyncRead + Unpin,
{
    let regex = listening_port_regex();
    let mut lines = BufReader::new(reader).lines();
    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| Error::Process(format!("error reading CLI stdout: {e}")))?
    {
        tracing::debug!(target: "cli_agent_sdk::process", "{line}");
        if let Some(captures) = regex.captures(&line) {
            let port: u16 = captures[1]
                .parse()
                .map_err(|_| Error::Process(format!("malformed readiness line: {line}")))?;
            return Ok(port);
        }
    }
    Err(Error::Process("CLI exited before reporting a listening port".to_string()))
}

/// Forwards the child's stderr line-by-line into the tracing subsystem,
/// instead of letting it leak to our own stderr or silently disappear (§4.C).
fn spawn_stderr_forwarder<R>(stderr: R)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => tracing::warn!(target: "cli_agent_sdk::process", "{line}"),
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(target: "cli_agent_sdk::process", "error reading CLI stderr: {e}");
                    break;
                }
            }
        }
    });
}

/// Force-kills a child process, ignoring "already exited" errors.
pub async fn force_kill(child: &mut Child) {
    if let Err(e) = child.kill().await {
        tracing::debug!(target: "cli_agent_sdk::process", "kill failed (likely already exited): {e}");
    }
}

/// Flushes and closes a writer half, used when gracefully shutting down a
/// transport before waiting for the reader to observe EOF.
pub async fn close_writer<W>(mut writer: W) -> Result<()>
where
    W: tokio::io::AsyncWrite + Unpin,
{
    writer.shutdown().await.map_err(Error::Transport)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn denylist_matches_exact_names_and_suffixes() {
        assert!(is_denied_env_var("DEBUG"));
        assert!(is_denied_env_var("NODE_OPTIONS"));
        assert!(is_denied_env_var("APP_DEBUG"));
        assert!(is_denied_env_var("FOO_LOG_LEVEL"));
        assert!(!is_denied_env_var("PATH"));
        assert!(!is_denied_env_var("DEBUGGER"));
    }

    #[test]
    fn resolve_command_wraps_js_entrypoints_with_node() {
        let (program, args) = resolve_command("agent.js");
        assert_eq!(program, "node");
        assert_eq!(args, vec!["agent.js".to_string()]);
    }

    #[test]
    fn listening_port_regex_extracts_port() {
        let regex = listening_port_regex();
        let captures = regex.captures("server listening on port 54321").unwrap();
        assert_eq!(&captures[1], "54321");
    }

    #[test]
    fn parse_cli_url_defaults_bare_port_to_localhost() {
        let (host, port, external) = parse_cli_url("8080").unwrap();
        assert_eq!(host, "localhost");
        assert_eq!(port, 8080);
        assert!(external);
    }

    #[test]
    fn parse_cli_url_keeps_explicit_host() {
        let (host, port, _) = parse_cli_url("127.0.0.1:9000").unwrap();
        assert_eq!(host, "127.0.0.1");
        assert_eq!(port, 9000);
    }

    #[test]
    fn parse_cli_url_strips_https_scheme() {
        let (host, port, _) = parse_cli_url("https://example.com:443").unwrap();
        assert_eq!(host, "example.com");
        assert_eq!(port, 443);
    }

    #[test]
    fn parse_cli_url_rejects_out_of_range_port() {
        let err = parse_cli_url("localhost:99999").unwrap_err();
        assert!(err.to_string().contains("Invalid port"), "{err}");
    }

    #[test]
    fn parse_cli_url_rejects_unparseable_input() {
        let err = parse_cli_url("invalid-url").unwrap_err();
        assert!(err.to_string().contains("Invalid cliUrl format"), "{err}");
    }

    #[test]
    fn parse_cli_url_is_idempotent_for_host_port_pairs() {
        let (host, port, _) = parse_cli_url("example.com:8443").unwrap();
        let reparsed = parse_cli_url(&format!("{host}:{port}")).unwrap();
        assert_eq!((host, port), (reparsed.0, reparsed.1));
    }
}
