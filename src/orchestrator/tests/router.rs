use super::*;
use crate::types::{Event, JobKey, Outcome};

#[tokio::test]
async fn test_terminal_dispatched_exactly_once_for_result_plus_exit() {
    // Both terminal sources fire: an explicit completed result, then exit 0
    let script = r#"
printf '%s\n' '{"type":"operation","status":"completed"}'
exit 0
"#;
    let (forge, _tmp) = create_test_forge(script).await;
    let mut events = forge.subscribe();

    let key = forge
        .download_convert("https://host/app.deb")
        .await
        .unwrap();

    let seen = events_until_finished(&mut events).await;
    assert!(matches!(
        seen.last().unwrap(),
        Event::Finished { outcome: Outcome::Completed, .. }
    ));

    // No second (synthesized) terminal may follow
    expect_silence(&mut events, 300).await;
    wait_until_released(&forge, &key).await;
}

#[tokio::test]
async fn test_worker_crash_synthesizes_failed_terminal() {
    let (forge, _tmp) = create_test_forge("exit 1").await;
    let mut events = forge.subscribe();

    forge
        .download_convert("https://host/app.deb")
        .await
        .unwrap();

    let seen = events_until_finished(&mut events).await;
    match seen.last().unwrap() {
        Event::Finished {
            identifier,
            outcome,
            error,
        } => {
            assert_eq!(identifier, "https://host/app.deb");
            assert_eq!(*outcome, Outcome::Failed);
            assert_eq!(error.as_deref(), Some("worker exited with code 1"));
        }
        other => panic!("expected Finished, got {:?}", other),
    }
}

#[tokio::test]
async fn test_clean_exit_without_result_synthesizes_completed_terminal() {
    let (forge, _tmp) = create_test_forge("exit 0").await;
    let mut events = forge.subscribe();

    forge
        .download_convert("https://host/app.deb")
        .await
        .unwrap();

    let seen = events_until_finished(&mut events).await;
    assert!(matches!(
        seen.last().unwrap(),
        Event::Finished { outcome: Outcome::Completed, error: None, .. }
    ));
}

#[tokio::test]
async fn test_tweak_pause_releases_slot_without_terminal() {
    let script = r#"
printf '%s\n' '{"type":"tweak_detected","status":"awaiting_ipa","download_url":"https://host/tweak.deb","tweak_path":"/tmp/extracted/data.tar"}'
exit 0
"#;
    let (forge, _tmp) = create_test_forge(script).await;
    let mut events = forge.subscribe();

    let key = forge
        .download_convert("https://host/tweak.deb")
        .await
        .unwrap();

    // Skip the Admitted event, then expect the pause
    loop {
        match next_event(&mut events).await {
            Event::Admitted { .. } => continue,
            Event::AwaitingInput {
                identifier,
                download_url,
                tweak_path,
            } => {
                assert_eq!(identifier, "https://host/tweak.deb");
                assert_eq!(download_url, "https://host/tweak.deb");
                assert_eq!(tweak_path, std::path::PathBuf::from("/tmp/extracted/data.tar"));
                break;
            }
            other => panic!("expected AwaitingInput, got {:?}", other),
        }
    }

    // The pause is the job's final dispatch: no Finished event follows
    expect_silence(&mut events, 300).await;

    // The slot is free for the follow-up patch request
    wait_until_released(&forge, &key).await;
    forge
        .patch(
            "https://host/tweak.deb",
            b"decrypted ipa",
            "base.ipa",
            std::path::Path::new("/tmp/extracted/data.tar"),
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_malformed_lines_do_not_disrupt_the_stream() {
    let script = r#"
printf '%s\n' 'this is not json'
printf 'binary:\370\377\n'
printf '%s\n' '{"half":'
printf '%s\n' '{"type":"conversion","status":"completed","download_url":"https://host/app.deb"}'
printf '%s\n' '{"type":"operation","status":"completed"}'
exit 0
"#;
    let (forge, _tmp) = create_test_forge(script).await;
    let mut events = forge.subscribe();

    forge
        .download_convert("https://host/app.deb")
        .await
        .unwrap();

    let seen = events_until_finished(&mut events).await;
    let progress: Vec<_> = seen
        .iter()
        .filter(|e| matches!(e, Event::Progress { .. }))
        .collect();
    // Only the one valid progress line survives the garbage
    assert_eq!(progress.len(), 1);
    match progress[0] {
        Event::Progress { phase, status, .. } => {
            assert_eq!(phase, "conversion");
            assert_eq!(status, "completed");
        }
        other => panic!("expected Progress, got {:?}", other),
    }
    assert!(matches!(
        seen.last().unwrap(),
        Event::Finished { outcome: Outcome::Completed, .. }
    ));
}

#[tokio::test]
async fn test_progress_identifier_falls_back_to_job_key() {
    let script = r#"
printf '%s\n' '{"type":"download","status":"started"}'
printf '%s\n' '{"type":"download","status":"completed","download_url":"https://host/explicit.deb"}'
printf '%s\n' '{"type":"operation","status":"completed"}'
exit 0
"#;
    let (forge, _tmp) = create_test_forge(script).await;
    let mut events = forge.subscribe();

    let key = forge
        .download_convert("https://host/app.deb")
        .await
        .unwrap();

    let seen = events_until_finished(&mut events).await;
    let identifiers: Vec<_> = seen
        .iter()
        .filter_map(|e| match e {
            Event::Progress { identifier, .. } => Some(identifier.clone()),
            _ => None,
        })
        .collect();
    // First message carried no identifier: routed by the job key.
    // Second carried its own download_url: routed by that.
    assert_eq!(identifiers, vec![key.to_string(), "https://host/explicit.deb".to_string()]);
}

#[tokio::test]
async fn test_per_job_message_order_preserved() {
    let script = r#"
printf '%s\n' '{"type":"download","status":"started","progress":0}'
printf '%s\n' '{"type":"download","status":"completed","progress":100}'
printf '%s\n' '{"type":"conversion","status":"started"}'
printf '%s\n' '{"type":"conversion","status":"completed"}'
printf '%s\n' '{"type":"operation","status":"completed"}'
exit 0
"#;
    let (forge, _tmp) = create_test_forge(script).await;
    let mut events = forge.subscribe();

    forge
        .download_convert("https://host/app.deb")
        .await
        .unwrap();

    let seen = events_until_finished(&mut events).await;
    let stages: Vec<_> = seen
        .iter()
        .filter_map(|e| match e {
            Event::Progress { phase, status, .. } => Some(format!("{}:{}", phase, status)),
            _ => None,
        })
        .collect();
    assert_eq!(
        stages,
        vec![
            "download:started",
            "download:completed",
            "conversion:started",
            "conversion:completed",
        ]
    );
    // The terminal is the last dispatch
    assert!(matches!(seen.last().unwrap(), Event::Finished { .. }));
}

#[tokio::test]
async fn test_worker_failure_carries_error_text() {
    let script = r#"
printf '%s\n' '{"type":"operation","status":"failed","error":"No .app bundle found and not a recognized tweak structure."}'
exit 1
"#;
    let (forge, _tmp) = create_test_forge(script).await;
    let mut events = forge.subscribe();

    forge
        .download_convert("https://host/app.deb")
        .await
        .unwrap();

    let seen = events_until_finished(&mut events).await;
    match seen.last().unwrap() {
        Event::Finished { outcome, error, .. } => {
            assert_eq!(*outcome, Outcome::Failed);
            assert_eq!(
                error.as_deref(),
                Some("No .app bundle found and not a recognized tweak structure.")
            );
        }
        other => panic!("expected Finished, got {:?}", other),
    }
    // The non-zero exit afterwards must not produce a second terminal
    expect_silence(&mut events, 300).await;
}

#[tokio::test]
async fn test_stderr_noise_is_never_forwarded() {
    let script = r#"
printf 'random diagnostics\n' >&2
printf '\001\002\003binary noise\n' >&2
printf '%s\n' '{"type":"operation","status":"completed"}'
exit 0
"#;
    let (forge, _tmp) = create_test_forge(script).await;
    let mut events = forge.subscribe();

    forge
        .download_convert("https://host/app.deb")
        .await
        .unwrap();

    let seen = events_until_finished(&mut events).await;
    // Admitted + Finished only; nothing from stderr reaches consumers
    assert_eq!(seen.len(), 2);
    assert!(matches!(seen[0], Event::Admitted { .. }));
    assert!(matches!(seen[1], Event::Finished { .. }));
}

#[tokio::test]
async fn test_failed_release_fetch_reports_outcome_in_event() {
    let script = r#"
printf '%s\n' '{"type":"github","status":"failed","error":"GitHub API Error: 403"}'
exit 0
"#;
    let (forge, _tmp) = create_test_forge(script).await;
    let mut events = forge.subscribe();

    forge
        .fetch_releases("https://github.com/owner/repo")
        .await
        .unwrap();

    let seen = events_until_finished(&mut events).await;
    let fetched = seen
        .iter()
        .find(|e| matches!(e, Event::ReleasesFetched { .. }))
        .expect("no ReleasesFetched event seen");
    match fetched {
        Event::ReleasesFetched {
            outcome,
            releases,
            error,
            ..
        } => {
            assert_eq!(*outcome, Outcome::Failed);
            assert!(releases.is_empty());
            assert_eq!(error.as_deref(), Some("GitHub API Error: 403"));
        }
        _ => unreachable!(),
    }
}

#[tokio::test]
async fn test_unrecognized_messages_are_discarded() {
    let script = r#"
printf '%s\n' '{"type":"telemetry","payload":[1,2,3]}'
printf '%s\n' '{"no_type_at_all":true}'
printf '%s\n' '{"type":"operation","status":"completed"}'
exit 0
"#;
    let (forge, _tmp) = create_test_forge(script).await;
    let mut events = forge.subscribe();

    forge
        .download_convert("https://host/app.deb")
        .await
        .unwrap();

    let seen = events_until_finished(&mut events).await;
    assert_eq!(seen.len(), 2);
    assert!(matches!(seen[0], Event::Admitted { .. }));
    assert!(matches!(seen[1], Event::Finished { .. }));
}

#[tokio::test]
async fn test_large_output_split_across_many_chunks() {
    // A long preamble forces the line across multiple 4 KiB reads
    let script = r#"
pad=$(head -c 20000 /dev/zero | tr '\0' 'x')
printf '{"type":"download","status":"started","identifier":"%s"}\n' "$pad"
printf '%s\n' '{"type":"operation","status":"completed"}'
exit 0
"#;
    let (forge, _tmp) = create_test_forge(script).await;
    let mut events = forge.subscribe();

    forge
        .download_convert("https://host/app.deb")
        .await
        .unwrap();

    let seen = events_until_finished(&mut events).await;
    let progress = seen
        .iter()
        .find_map(|e| match e {
            Event::Progress { identifier, .. } => Some(identifier.clone()),
            _ => None,
        })
        .expect("no Progress event seen");
    assert_eq!(progress.len(), 20_000);
    assert!(progress.bytes().all(|b| b == b'x'));
}

#[tokio::test]
async fn test_key_with_unicode_survives_round_trip() {
    let script = r#"
printf '%s\n' '{"type":"operation","status":"completed"}'
exit 0
"#;
    let (forge, _tmp) = create_test_forge(script).await;
    let mut events = forge.subscribe();

    let key = forge
        .download_convert("https://host/p%C3%A4ckchen.deb")
        .await
        .unwrap();
    assert_eq!(key, JobKey::from("https://host/p%C3%A4ckchen.deb"));

    let seen = events_until_finished(&mut events).await;
    assert!(matches!(seen.last().unwrap(), Event::Finished { .. }));
}
