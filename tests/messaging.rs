//! Outbound chunking, completion aggregation and the echo round trip.

mod common;

use common::{ready_feather, settle, MockPeripheral, Script, EVENT_TIMEOUT};
use feather_link::bluetooth::{chunk_message, frame_message};
use feather_link::{ErrorPolicy, EventKind, LinkConfig, LinkError, LinkEvent};
use std::time::Duration;
use tokio::sync::mpsc;

const MESSAGE_45: &str = "abcdefghijklmnopqrstuvwxyz0123456789ABCDEFGHI";
const CHUNKS_45: [&str; 3] = ["abcdefghijklmnopqrst", "uvwxyz0123456789ABCD", "EFGHI~"];

/// Collects every completion of a send, with the number of chunk writes
/// already finished when it fired.
fn completions(
    mock: &MockPeripheral,
) -> (
    impl FnOnce(Result<(), LinkError>) + Send + 'static,
    mpsc::UnboundedReceiver<(Result<(), LinkError>, usize)>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    let mock = mock.clone();
    let callback = move |result| {
        let _ = tx.send((result, mock.completed_writes().len()));
    };
    (callback, rx)
}

async fn only_completion(
    rx: &mut mpsc::UnboundedReceiver<(Result<(), LinkError>, usize)>,
) -> (Result<(), LinkError>, usize) {
    let completion = tokio::time::timeout(EVENT_TIMEOUT, rx.recv())
        .await
        .expect("send never completed")
        .expect("callback dropped");
    settle().await;
    assert!(rx.try_recv().is_err(), "completion fired more than once");
    completion
}

#[tokio::test]
async fn test_hello_is_one_write() {
    let mock = MockPeripheral::feather();
    let feather = ready_feather(&mock, LinkConfig::default()).await;
    let (callback, mut rx) = completions(&mock);

    assert!(feather.send_message("hello", callback));

    let (result, finished) = only_completion(&mut rx).await;
    assert_eq!(result, Ok(()));
    assert_eq!(finished, 1);
    assert_eq!(mock.issued_writes(), vec!["hello~"]);
    assert!(mock.writes_without_response());
}

#[tokio::test]
async fn test_terminated_message_is_not_terminated_twice() {
    let mock = MockPeripheral::feather();
    let feather = ready_feather(&mock, LinkConfig::default()).await;

    feather.send("hello~").await.unwrap();

    assert_eq!(mock.issued_writes(), vec!["hello~"]);
}

#[tokio::test(start_paused = true)]
async fn test_single_completion_after_reversed_writes() {
    let mock = MockPeripheral::new(Script {
        write_delays: [
            (CHUNKS_45[0].to_string(), Duration::from_millis(30)),
            (CHUNKS_45[1].to_string(), Duration::from_millis(20)),
            (CHUNKS_45[2].to_string(), Duration::from_millis(10)),
        ]
        .into_iter()
        .collect(),
        ..Script::default()
    });
    let feather = ready_feather(&mock, LinkConfig::default()).await;
    let (callback, mut rx) = completions(&mock);

    assert!(feather.send_message(MESSAGE_45, callback));
    settle().await;

    // All three writes are outstanding at once.
    let mut issued = mock.issued_writes();
    issued.sort();
    let mut expected = CHUNKS_45.to_vec();
    expected.sort();
    assert_eq!(issued, expected);
    assert!(mock.completed_writes().is_empty());

    let (result, finished) = only_completion(&mut rx).await;
    assert_eq!(result, Ok(()));
    assert_eq!(finished, 3);
    assert_eq!(mock.completed_writes(), vec![CHUNKS_45[2], CHUNKS_45[1], CHUNKS_45[0]]);
}

#[tokio::test]
async fn test_chunks_never_exceed_limit() {
    let mock = MockPeripheral::feather();
    let config = LinkConfig {
        chunk_size: 7,
        ..LinkConfig::default()
    };
    let feather = ready_feather(&mock, config).await;

    feather
        .send("the quick brown fox jumps over the lazy dog ✓")
        .await
        .unwrap();

    let writes = mock.issued_writes();
    assert!(writes.len() > 1);
    assert!(writes.iter().all(|chunk| chunk.len() <= 7));
}

#[tokio::test(start_paused = true)]
async fn test_first_write_error_wins_by_default() {
    let mock = MockPeripheral::new(Script {
        write_delays: [
            (CHUNKS_45[0].to_string(), Duration::from_millis(10)),
            (CHUNKS_45[2].to_string(), Duration::from_millis(20)),
        ]
        .into_iter()
        .collect(),
        write_errors: [
            (CHUNKS_45[0].to_string(), "first".to_string()),
            (CHUNKS_45[2].to_string(), "last".to_string()),
        ]
        .into_iter()
        .collect(),
        ..Script::default()
    });
    let feather = ready_feather(&mock, LinkConfig::default()).await;
    let (callback, mut rx) = completions(&mock);

    feather.send_message(MESSAGE_45, callback);

    let (result, finished) = only_completion(&mut rx).await;
    assert_eq!(
        result,
        Err(LinkError::Write {
            chunk: 0,
            reason: "first".to_string()
        })
    );
    assert_eq!(finished, 3);
}

#[tokio::test(start_paused = true)]
async fn test_last_write_error_policy() {
    let mock = MockPeripheral::new(Script {
        write_delays: [
            (CHUNKS_45[0].to_string(), Duration::from_millis(10)),
            (CHUNKS_45[2].to_string(), Duration::from_millis(20)),
        ]
        .into_iter()
        .collect(),
        write_errors: [
            (CHUNKS_45[0].to_string(), "first".to_string()),
            (CHUNKS_45[2].to_string(), "last".to_string()),
        ]
        .into_iter()
        .collect(),
        ..Script::default()
    });
    let config = LinkConfig {
        write_error_policy: ErrorPolicy::Last,
        ..LinkConfig::default()
    };
    let feather = ready_feather(&mock, config).await;

    let result = feather.send(MESSAGE_45).await;

    assert_eq!(
        result,
        Err(LinkError::Write {
            chunk: 2,
            reason: "last".to_string()
        })
    );
}

#[tokio::test]
async fn test_inner_terminator_is_refused() {
    let mock = MockPeripheral::feather();
    let feather = ready_feather(&mock, LinkConfig::default()).await;

    let result = feather.send("a~b").await;

    assert_eq!(result, Err(LinkError::TerminatorInMessage('~')));
    assert!(mock.issued_writes().is_empty());
}

#[tokio::test]
async fn test_send_before_setup_is_silent() {
    let mock = MockPeripheral::feather();
    let feather = feather_link::Feather::new(mock.clone(), LinkConfig::default()).unwrap();
    let (callback, mut rx) = completions(&mock);

    assert!(!feather.send_message("hello", callback));

    settle().await;
    assert!(rx.try_recv().is_err());
    assert!(mock.issued_writes().is_empty());
}

#[tokio::test]
async fn test_echo_round_trip() {
    let mock = MockPeripheral::feather();
    let feather = ready_feather(&mock, LinkConfig::default()).await;
    let mut messages = feather.events().channel(EventKind::Message);
    let original = "Round trip through twenty byte chunks, with ümlauts ✓";

    feather.send(original).await.unwrap();
    let framed = frame_message(original, '~').unwrap();
    let chunks = chunk_message(&framed, 20);
    let mut issued = mock.issued_writes();
    issued.sort();
    let mut expected: Vec<String> = chunks.iter().map(|c| c.to_string()).collect();
    expected.sort();
    assert_eq!(issued, expected);

    for chunk in chunks {
        feather.on_data(chunk.as_bytes());
    }

    assert_eq!(
        messages.try_recv().unwrap(),
        LinkEvent::Message(Ok(original.to_string()))
    );
    assert!(messages.try_recv().is_err());
    assert_eq!(feather.pending_input_len(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_write_in_flight_at_disconnect_still_completes() {
    let mock = MockPeripheral::new(Script {
        write_delays: [("hello~".to_string(), Duration::from_millis(50))]
            .into_iter()
            .collect(),
        ..Script::default()
    });
    let feather = ready_feather(&mock, LinkConfig::default()).await;
    let (callback, mut rx) = completions(&mock);

    assert!(feather.send_message("hello", callback));
    settle().await;
    assert!(mock.completed_writes().is_empty());

    feather.disconnect().await;
    assert!(!feather.is_connected());

    let (result, finished) = only_completion(&mut rx).await;
    assert_eq!(result, Ok(()));
    assert_eq!(finished, 1);
}
