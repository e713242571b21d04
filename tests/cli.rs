use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;

use serde_json::json;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStderr, Command};
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn yt_auth(dir: &TempDir, args: &[&str]) -> Output {
    std::process::Command::new(env!("CARGO_BIN_EXE_yt-auth"))
        .arg("--token-path")
        .arg(dir.path().join("youtube-token.json"))
        .args(args)
        .env_remove("YT_AUTH_CREDENTIALS")
        .env("RUST_LOG", "warn")
        .stdin(Stdio::null())
        .output()
        .unwrap()
}

fn stderr_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

fn credentials_for(dir: &TempDir, server: &MockServer) -> PathBuf {
    let path = dir.path().join("client_credentials.json");
    let credentials = json!({
        "installed": {
            "client_id": "client.apps",
            "client_secret": "s3cret",
            "auth_uri": format!("{}/auth", server.uri()),
            "token_uri": format!("{}/token", server.uri()),
            "redirect_uris": ["http://localhost"]
        }
    });
    std::fs::write(&path, credentials.to_string()).unwrap();
    path
}

/// Starts `yt-auth login` and reads stderr up to the printed consent URL
async fn start_login(
    credentials: &Path,
    token_path: &Path,
    server: &MockServer,
) -> (Child, Lines<BufReader<ChildStderr>>, Url) {
    let mut child = Command::new(env!("CARGO_BIN_EXE_yt-auth"))
        .arg("--credentials")
        .arg(credentials)
        .arg("--token-path")
        .arg(token_path)
        .args(["login", "--no-browser", "--no-fallback", "--port", "0"])
        .env("RUST_LOG", "warn")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .unwrap();
    let mut stderr = BufReader::new(child.stderr.take().unwrap()).lines();

    let prefix = format!("{}/auth?", server.uri());
    let auth_url = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let line = stderr.next_line().await.unwrap().expect("consent URL on stderr");
            if line.trim().starts_with(&prefix) {
                return Url::parse(line.trim()).unwrap();
            }
        }
    })
    .await
    .unwrap();
    (child, stderr, auth_url)
}

/// Plays the browser: follows the consent URL's redirect back to the listener
async fn complete_consent(auth_url: &Url, code: &str) {
    let param = |name: &str| {
        auth_url
            .query_pairs()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
            .unwrap()
    };
    let target = format!("{}/?code={}&state={}", param("redirect_uri"), code, param("state"));
    let response = reqwest::get(target).await.unwrap();
    assert_eq!(response.status(), 200);
}

async fn rest_of(mut stderr: Lines<BufReader<ChildStderr>>) -> String {
    let mut rest = String::new();
    while let Some(line) = stderr.next_line().await.unwrap() {
        rest.push_str(&line);
        rest.push('\n');
    }
    rest
}

#[test]
fn missing_credentials_file_exits_with_bootstrap_error() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("missing.json");

    let output = yt_auth(
        &dir,
        &["--credentials", missing.to_str().unwrap(), "login", "--no-browser"],
    );

    assert!(!output.status.success());
    assert_eq!(output.status.code(), Some(1));
    let stderr = stderr_of(&output);
    assert!(stderr.contains("error: bootstrap:"), "stderr: {}", stderr);
    assert!(stderr.contains("missing.json"));
}

#[test]
fn status_without_cached_token() {
    let dir = TempDir::new().unwrap();

    let output = yt_auth(&dir, &["status"]);

    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("Not logged in"));
}

#[test]
fn corrupt_cache_is_reported_with_its_stage() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("youtube-token.json"), "{").unwrap();

    let output = yt_auth(&dir, &["status"]);

    assert_eq!(output.status.code(), Some(1));
    let stderr = stderr_of(&output);
    assert!(stderr.contains("error: checking cache:"), "stderr: {}", stderr);
}

#[test]
fn logout_removes_cached_token() {
    let dir = TempDir::new().unwrap();
    let token_path = dir.path().join("youtube-token.json");
    let token = json!({
        "access_token": "ya29.cached",
        "refresh_token": "1//cached",
        "token_type": "Bearer",
        "expires_at": 4_000_000_000u64
    });
    std::fs::write(&token_path, token.to_string()).unwrap();

    let output = yt_auth(&dir, &["logout"]);

    assert!(output.status.success());
    assert!(!token_path.exists());
    let again = yt_auth(&dir, &["logout"]);
    assert!(again.status.success());
    assert!(String::from_utf8_lossy(&again.stdout).contains("No cached token"));
}

#[tokio::test]
async fn login_reports_a_token_that_could_not_be_cached() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "ya29.fresh",
            "refresh_token": "1//fresh",
            "expires_in": 3599
        })))
        .expect(1)
        .mount(&server)
        .await;
    let dir = TempDir::new().unwrap();
    let credentials = credentials_for(&dir, &server);
    let blocker = dir.path().join("not-a-directory");
    std::fs::write(&blocker, "").unwrap();

    let (mut child, stderr, auth_url) =
        start_login(&credentials, &blocker.join("youtube-token.json"), &server).await;
    complete_consent(&auth_url, "abc123").await;

    let status = tokio::time::timeout(Duration::from_secs(10), child.wait())
        .await
        .unwrap()
        .unwrap();
    assert!(status.success());
    let rest = rest_of(stderr).await;
    assert!(rest.contains("could not be cached"), "stderr: {}", rest);
    assert!(!rest.contains("OAuth token cached at"));
}

#[cfg(unix)]
#[tokio::test]
async fn ctrl_c_during_token_exchange_ends_the_process() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"access_token": "ya29.late"}))
                .set_delay(Duration::from_secs(20)),
        )
        .mount(&server)
        .await;
    let dir = TempDir::new().unwrap();
    let credentials = credentials_for(&dir, &server);
    let token_path = dir.path().join("youtube-token.json");

    let (mut child, _stderr, auth_url) = start_login(&credentials, &token_path, &server).await;
    complete_consent(&auth_url, "abc123").await;

    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let requests = server.received_requests().await.unwrap_or_default();
            if requests.iter().any(|r| r.url.path() == "/token") {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("token request should be in flight");

    let pid = child.id().unwrap().to_string();
    let kill = std::process::Command::new("kill")
        .args(["-INT", &pid])
        .status()
        .unwrap();
    assert!(kill.success());

    let status = tokio::time::timeout(Duration::from_secs(5), child.wait())
        .await
        .expect("process should exit on SIGINT")
        .unwrap();
    assert_eq!(status.code(), Some(130));
    assert!(!token_path.exists());
}
