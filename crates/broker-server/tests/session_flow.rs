mod common;

use std::time::Duration;

use common::{producer_audio_message, spawn_broker, spawn_mock_soniox};
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

fn record_of(message: &Message) -> Value {
    match message {
        Message::Text(text) => serde_json::from_str(text).expect("viewer frame is valid JSON"),
        other => panic!("expected a text frame, got {other:?}"),
    }
}

#[tokio::test]
async fn viewer_receives_partial_then_final_for_a_producer_utterance() {
    let soniox_url = spawn_mock_soniox(vec![
        json!({ "tokens": [{"text": "hel", "is_final": false, "language": "en"}], "finished": false }),
        json!({
            "tokens": [
                {"text": "hello", "is_final": true, "language": "en"},
                {"text": "<end>", "is_final": true}
            ],
            "finished": false
        }),
    ])
    .await;
    let base = spawn_broker(&soniox_url).await;

    let (mut viewer, _) = connect_async(format!("{base}/sessions/s1/viewer?language=en"))
        .await
        .expect("viewer connect failed");

    let (mut producer, _) = connect_async(format!("{base}/sessions/s1/producer"))
        .await
        .expect("producer connect failed");
    producer
        .send(Message::Text(producer_audio_message("alice", b"fake-pcm").into()))
        .await
        .unwrap();

    let partial = record_of(&viewer.next().await.unwrap().unwrap());
    assert_eq!(partial["type"], "partial");
    assert_eq!(partial["transcription"], "hel");

    let finalized = record_of(&viewer.next().await.unwrap().unwrap());
    assert_eq!(finalized["type"], "final");
    assert_eq!(finalized["transcription"], "hello");
    assert_eq!(finalized["speaker"], "alice");
}

#[tokio::test]
async fn second_producer_on_the_same_session_is_rejected_with_policy_violation() {
    let soniox_url = spawn_mock_soniox(vec![]).await;
    let base = spawn_broker(&soniox_url).await;

    let (mut first, _) = connect_async(format!("{base}/sessions/s2/producer"))
        .await
        .expect("first producer connect failed");

    let (mut second, _) = connect_async(format!("{base}/sessions/s2/producer"))
        .await
        .expect("second producer connect failed");

    let close = loop {
        match second.next().await.unwrap().unwrap() {
            Message::Close(frame) => break frame,
            _ => continue,
        }
    };
    assert_eq!(close.expect("close frame present").code, 1008u16.into());

    let _ = first.close(None).await;
}

#[tokio::test]
async fn viewer_is_rejected_when_no_producer_is_active_for_the_session() {
    let soniox_url = spawn_mock_soniox(vec![]).await;
    let base = spawn_broker(&soniox_url).await;

    let (mut viewer, _) = connect_async(format!("{base}/sessions/nonexistent/viewer"))
        .await
        .expect("viewer connect failed");

    let close = loop {
        match viewer.next().await.unwrap().unwrap() {
            Message::Close(frame) => break frame,
            _ => continue,
        }
    };
    assert_eq!(close.expect("close frame present").code, 4004u16.into());
}

#[tokio::test]
async fn late_joining_viewer_replays_cached_history_before_any_live_record() {
    let soniox_url = spawn_mock_soniox(vec![
        json!({
            "tokens": [
                {"text": "first", "is_final": true, "language": "en"},
                {"text": "<end>", "is_final": true}
            ],
            "finished": false
        }),
        json!({
            "tokens": [
                {"text": "second", "is_final": true, "language": "en"},
                {"text": "<end>", "is_final": true}
            ],
            "finished": false
        }),
    ])
    .await;
    let base = spawn_broker(&soniox_url).await;

    let (mut producer, _) = connect_async(format!("{base}/sessions/s3/producer"))
        .await
        .expect("producer connect failed");
    producer
        .send(Message::Text(producer_audio_message("alice", b"fake-pcm").into()))
        .await
        .unwrap();

    // Give the orchestrator time to finalize and cache the first utterance
    // before the viewer joins, so it lands in replayed history rather than
    // the live broadcast.
    tokio::time::sleep(Duration::from_millis(150)).await;

    let (mut viewer, _) = connect_async(format!("{base}/sessions/s3/viewer"))
        .await
        .expect("viewer connect failed");

    let replayed = record_of(&viewer.next().await.unwrap().unwrap());
    assert_eq!(replayed["type"], "final");
    assert_eq!(replayed["transcription"], "first");

    producer
        .send(Message::Text(producer_audio_message("alice", b"fake-pcm-2").into()))
        .await
        .unwrap();

    let live = record_of(&viewer.next().await.unwrap().unwrap());
    assert_eq!(live["type"], "final");
    assert_eq!(live["transcription"], "second");
}
