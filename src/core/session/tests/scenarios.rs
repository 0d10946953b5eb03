//! End-to-end utterance scenarios through the session manager.

use std::time::Duration;

use bytes::Bytes;

use crate::core::speech::{ReqType, RecvOutcome, SpeechError};

use super::super::events::{SirenEvent, SirenEventKind, VoiceEvent};
use super::super::siren::SirenCommand;
use super::helpers::{CallbackRecord, connected_harness, final_resp, harness, interim};

fn wake(kind: SirenEventKind, sound_location: f64) -> SirenEvent {
    SirenEvent {
        sound_location,
        ..SirenEvent::new(kind)
    }
}

#[tokio::test]
async fn happy_path_voice_session() {
    let h = connected_harness().await;

    h.siren.emit(wake(SirenEventKind::WakePre, 30.0));
    h.siren.emit(wake(SirenEventKind::WakeCmd, 0.0));
    h.siren.emit(SirenEvent::new(SirenEventKind::VadStart));
    h.transport.wait_for_sent(1).await;
    h.siren.emit(SirenEvent::voice_data(Bytes::from(vec![1u8; 32])));
    h.siren.emit(SirenEvent::voice_data(Bytes::from(vec![2u8; 32])));
    h.siren.emit(SirenEvent::new(SirenEventKind::VadEnd));

    let sent = h.transport.wait_for_sent(4).await;
    let kinds: Vec<_> = sent.iter().map(|r| r.req_type()).collect();
    assert_eq!(
        kinds,
        vec![
            Some(ReqType::Start),
            Some(ReqType::Voice),
            Some(ReqType::Voice),
            Some(ReqType::End),
        ]
    );

    h.transport.push_response(interim(1, "hi", ""));
    h.transport.push_response(final_resp(
        1,
        "hello",
        "{\"a\":1}",
        "act",
        "{\"activation\":\"ok\"}",
    ));

    let records = h
        .callback
        .wait_until(|r| {
            r.iter()
                .any(|rec| matches!(rec, CallbackRecord::Command { .. }))
        })
        .await;
    assert_eq!(
        records,
        vec![
            CallbackRecord::Event(-1, VoiceEvent::Coming, 30.0),
            CallbackRecord::Event(-1, VoiceEvent::LocalWake, 0.0),
            CallbackRecord::Event(1, VoiceEvent::Start, 0.0),
            CallbackRecord::Intermediate(1, "hi".to_string()),
            CallbackRecord::Event(1, VoiceEvent::Activation("ok".to_string()), 0.0),
            CallbackRecord::Command {
                id: 1,
                asr: "hello".to_string(),
                nlp: "{\"a\":1}".to_string(),
                action: "act".to_string(),
            },
        ]
    );
}

#[tokio::test]
async fn fake_wake_is_arbitrated_away() {
    let h = connected_harness().await;

    h.siren.emit(SirenEvent::new(SirenEventKind::VadStart));
    h.siren.emit(SirenEvent::voice_data(Bytes::from(vec![0u8; 32])));
    h.siren.emit(SirenEvent::new(SirenEventKind::VadEnd));
    h.transport.wait_for_sent(3).await;

    h.transport
        .push_response(interim(1, "hey", "{\"activation\":\"fake\"}"));
    h.callback
        .wait_until(|r| {
            r.iter()
                .any(|rec| matches!(rec, CallbackRecord::Event(_, VoiceEvent::Fake, _)))
        })
        .await;

    // The terminal frame must not produce a voice command either.
    h.transport.push_response(final_resp(1, "hey there", "{}", "act", ""));
    tokio::time::sleep(Duration::from_millis(100)).await;

    let records = h.callback.records();
    assert!(
        records
            .iter()
            .all(|rec| !matches!(rec, CallbackRecord::Intermediate(..)))
    );
    assert!(
        records
            .iter()
            .all(|rec| !matches!(rec, CallbackRecord::Command { .. }))
    );
    assert!(h.siren.commands().contains(&SirenCommand::Sleep));
}

#[tokio::test]
async fn vad_cancel_closes_stream_and_reports_once() {
    let h = connected_harness().await;

    h.siren.emit(SirenEvent::new(SirenEventKind::VadStart));
    h.siren.emit(SirenEvent::voice_data(Bytes::from(vec![0u8; 16])));
    h.transport.wait_for_sent(2).await;

    h.siren.emit(SirenEvent::new(SirenEventKind::VadCancel));
    let sent = h.transport.wait_for_sent(3).await;
    assert_eq!(sent[2].req_type(), Some(ReqType::End));
    assert_eq!(sent[2].id, 1);

    let records = h
        .callback
        .wait_until(|r| {
            r.iter()
                .any(|rec| matches!(rec, CallbackRecord::Event(_, VoiceEvent::Cancel, _)))
        })
        .await;
    let cancels = records
        .iter()
        .filter(|rec| matches!(rec, CallbackRecord::Event(1, VoiceEvent::Cancel, _)))
        .count();
    assert_eq!(cancels, 1);
    assert!(
        records
            .iter()
            .all(|rec| !matches!(rec, CallbackRecord::Error(..)))
    );
}

#[tokio::test]
async fn voice_trigger_is_spliced_then_consumed() {
    let h = connected_harness().await;
    h.manager.update_stack("com.example.music");

    h.siren.emit(SirenEvent::voice_print(
        100,
        260,
        0.5,
        Bytes::from_static(&[0xab, 0xcd]),
    ));
    h.siren.emit(SirenEvent::new(SirenEventKind::VadStart));

    let sent = h.transport.wait_for_sent(1).await;
    let options: serde_json::Value = serde_json::from_str(&sent[0].framework_options).unwrap();
    assert_eq!(options["voice_trigger"], "abcd");
    assert_eq!(options["trigger_start"], "100");
    assert_eq!(options["trigger_length"], "160");
    assert_eq!(options["voice_power"], "0.500000");
    assert_eq!(options["stack"], "com.example.music");

    // Close the session and open another: the trigger window is spent.
    h.siren.emit(SirenEvent::new(SirenEventKind::VadEnd));
    h.transport.wait_for_sent(2).await;
    h.transport.push_response(final_resp(1, "", "", "", ""));
    h.siren.emit(SirenEvent::new(SirenEventKind::VadStart));

    let sent = h.transport.wait_for_sent(3).await;
    assert_eq!(sent[2].id, 2);
    let options: serde_json::Value = serde_json::from_str(&sent[2].framework_options).unwrap();
    assert!(options.get("voice_trigger").is_none());
    assert_eq!(options["stack"], "com.example.music");
}

#[tokio::test]
async fn cloud_vad_keeps_segmentation_server_side() {
    let h = connected_harness().await;
    h.config.set_cloud_vad(true);

    h.siren.emit(SirenEvent::new(SirenEventKind::VadStart));
    h.transport.wait_for_sent(1).await;
    h.siren.emit(SirenEvent::new(SirenEventKind::VadEnd));
    h.siren.emit(SirenEvent::new(SirenEventKind::Sleep));
    tokio::time::sleep(Duration::from_millis(100)).await;

    // No local end frame, no local sleep event.
    assert_eq!(h.transport.sent().len(), 1);
    assert!(
        h.callback
            .records()
            .iter()
            .all(|rec| !matches!(rec, CallbackRecord::Event(_, VoiceEvent::Sleep, _)))
    );
}

#[tokio::test]
async fn sleep_event_reaches_host_with_local_vad() {
    let h = connected_harness().await;
    h.siren.emit(SirenEvent::new(SirenEventKind::Sleep));
    h.callback
        .wait_until(|r| {
            r.iter()
                .any(|rec| matches!(rec, CallbackRecord::Event(0, VoiceEvent::Sleep, _)))
        })
        .await;
}

#[tokio::test]
async fn transport_failure_on_cloud_vad_session_sleeps_siren() {
    let h = connected_harness().await;
    h.config.set_cloud_vad(true);

    h.siren.emit(SirenEvent::new(SirenEventKind::VadStart));
    h.transport.wait_for_sent(1).await;
    h.transport.push_outcome(RecvOutcome::Broken);

    let records = h
        .callback
        .wait_until(|r| r.iter().any(|rec| matches!(rec, CallbackRecord::Error(..))))
        .await;
    assert!(records.contains(&CallbackRecord::Error(1, SpeechError::ServiceUnavailable)));
    assert!(h.siren.commands().contains(&SirenCommand::Sleep));
}

#[tokio::test]
async fn transport_failure_with_local_vad_leaves_siren_awake() {
    let h = connected_harness().await;

    h.siren.emit(SirenEvent::new(SirenEventKind::VadStart));
    h.transport.wait_for_sent(1).await;
    h.transport.push_outcome(RecvOutcome::Broken);

    h.callback
        .wait_until(|r| r.iter().any(|rec| matches!(rec, CallbackRecord::Error(..))))
        .await;
    assert!(h.siren.commands().is_empty());
}

#[tokio::test]
async fn vad_start_before_prepare_reports_failed_session() {
    let h = harness();
    assert!(h.manager.init());

    h.siren.emit(SirenEvent::new(SirenEventKind::VadStart));
    let records = h
        .callback
        .wait_until(|r| {
            r.iter()
                .any(|rec| matches!(rec, CallbackRecord::Event(_, VoiceEvent::Start, _)))
        })
        .await;
    assert!(records.contains(&CallbackRecord::Event(-1, VoiceEvent::Start, 0.0)));
}

#[tokio::test]
async fn stray_voice_data_without_session_is_dropped() {
    let h = connected_harness().await;
    h.siren.emit(SirenEvent::voice_data(Bytes::from(vec![0u8; 32])));
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(h.transport.sent().is_empty());
}
