//! Common test utilities for debforge end-to-end tests

#![cfg(unix)]

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use debforge::{Config, DebForge, Event};
use tempfile::TempDir;

/// Write an executable fake worker script into `dir`
///
/// The script understands the real worker's CLI surface (`--github`,
/// `--download-url`, `--patch` / `--with-data-tar`, `--verbose`) and plays
/// back canned protocol lines for each operation.
#[allow(dead_code)]
pub fn install_fake_worker(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("fake-debmaster");
    let script = r#"#!/bin/sh
# Fake conversion worker: parses the orchestrator's CLI and replays
# protocol lines the way the real engine would.
mode=""
arg=""
patch_target=""
tweak=""
while [ $# -gt 0 ]; do
    case "$1" in
        --github) mode="github"; arg="$2"; shift 2 ;;
        --download-url) mode="download"; arg="$2"; shift 2 ;;
        --patch) mode="patch"; patch_target="$2"; shift 2 ;;
        --with-data-tar) tweak="$2"; shift 2 ;;
        --verbose) shift ;;
        *) shift ;;
    esac
done

case "$mode" in
    github)
        printf '%s\n' '{"type":"github_releases","status":"completed","releases":[{"name":"Stable","tag_name":"v2.1","deb_assets":[{"name":"app.deb","download_url":"https://host/app.deb"}]}]}'
        exit 0
        ;;
    download)
        printf '{"type":"download","status":"started","download_url":"%s"}\n' "$arg"
        printf '{"type":"download","status":"completed","download_url":"%s"}\n' "$arg"
        case "$arg" in
            *tweak*)
                printf '{"type":"tweak_detected","status":"awaiting_ipa","download_url":"%s","tweak_path":"/tmp/extracted/data.tar"}\n' "$arg"
                exit 0
                ;;
        esac
        printf '{"type":"conversion","status":"completed","download_url":"%s"}\n' "$arg"
        printf '%s\n' '{"type":"operation","status":"completed"}'
        exit 0
        ;;
    patch)
        if [ ! -f "$patch_target" ]; then
            printf '%s\n' '{"type":"operation","status":"failed","error":"staged input missing"}'
            exit 1
        fi
        printf '%s\n' '{"type":"patch","status":"started"}'
        printf '%s\n' '{"type":"patch","status":"injecting_libraries"}'
        printf '{"type":"operation","status":"completed","identifier":"%s"}\n' "$tweak"
        exit 0
        ;;
    *)
        printf 'unknown mode\n' >&2
        exit 2
        ;;
esac
"#;

    let mut file = std::fs::File::create(&path).expect("create fake worker");
    file.write_all(script.as_bytes()).expect("write fake worker");
    drop(file);

    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
        .expect("chmod fake worker");

    path
}

/// Build a DebForge wired to the fake worker, with scratch space in `dir`
#[allow(dead_code)]
pub async fn forge_with_fake_worker(dir: &TempDir) -> DebForge {
    let mut config = Config::default();
    config.worker.binary_path = Some(install_fake_worker(dir));
    config.staging.scratch_dir = dir.path().join("scratch");
    DebForge::new(config).await.expect("orchestrator init")
}

/// Receive the next event, failing after a generous timeout
#[allow(dead_code)]
pub async fn next_event(rx: &mut tokio::sync::broadcast::Receiver<Event>) -> Event {
    tokio::time::timeout(Duration::from_secs(10), rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

/// Receive events until the first `Finished`, returning everything seen
#[allow(dead_code)]
pub async fn events_until_finished(
    rx: &mut tokio::sync::broadcast::Receiver<Event>,
) -> Vec<Event> {
    let mut events = Vec::new();
    loop {
        let event = next_event(rx).await;
        let done = matches!(event, Event::Finished { .. });
        events.push(event);
        if done {
            return events;
        }
    }
}
