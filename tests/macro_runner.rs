use std::io::Write;
use std::time::Duration;

use keithley2220_control::instrument::Keithley2220;
use keithley2220_control::script::{run_macro, run_script, LINE_DELAY, QUERY_SETTLE};
use keithley2220_control::shutdown;
use keithley2220_control::transport::{Call, MockTransport};
use tokio::time::Instant;

/// The paused clock may land a tick past each deadline.
fn assert_paced(start: Instant, expected: Duration) {
    let elapsed = start.elapsed();
    assert!(
        elapsed >= expected && elapsed < expected + Duration::from_millis(20),
        "elapsed {elapsed:?}, expected {expected:?}"
    );
}

#[tokio::test(start_paused = true)]
async fn trailing_comment_is_stripped() {
    let mock = MockTransport::new();
    let mut inst = Keithley2220::new(mock.clone());

    let sent = run_script(&mut inst, "VOLT 5 # set 5V\n").await.unwrap();

    assert_eq!(sent, 1);
    assert_eq!(mock.calls(), vec![Call::Write("VOLT 5".to_string())]);
}

#[tokio::test(start_paused = true)]
async fn comment_lines_touch_nothing_but_still_pace() {
    let mock = MockTransport::new();
    let mut inst = Keithley2220::new(mock.clone());
    let start = Instant::now();

    let sent = run_script(&mut inst, "# setup\n#VOLT 30\n").await.unwrap();

    assert_eq!(sent, 0);
    assert!(mock.calls().is_empty());
    assert_paced(start, LINE_DELAY * 2);
}

#[tokio::test(start_paused = true)]
async fn blank_lines_are_not_sent() {
    let mock = MockTransport::new();
    let mut inst = Keithley2220::new(mock.clone());

    run_script(&mut inst, "\n   \n  # only a comment\n").await.unwrap();

    assert!(mock.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn queries_settle_then_read() {
    let mock = MockTransport::new().with_reply("MEAS:VOLT:DC? ALL", "1.000,2.000");
    let mut inst = Keithley2220::new(mock.clone());
    let start = Instant::now();

    let sent = run_script(&mut inst, "INST:NSEL 1\nMEAS:VOLT:DC? ALL # both\n")
        .await
        .unwrap();

    assert_eq!(sent, 2);
    assert_eq!(
        mock.calls(),
        vec![
            Call::Write("INST:NSEL 1".to_string()),
            Call::Write("MEAS:VOLT:DC? ALL".to_string()),
            Call::Read,
        ]
    );
    assert_paced(start, LINE_DELAY * 2 + QUERY_SETTLE);
}

#[tokio::test(start_paused = true)]
async fn macro_file_is_read_from_disk() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "# ramp channel 1").unwrap();
    writeln!(file, "INST:NSEL 1").unwrap();
    writeln!(file, "VOLT 3.3  # logic rail").unwrap();

    let mock = MockTransport::new();
    let mut inst = Keithley2220::new(mock.clone());

    let sent = run_macro(&mut inst, file.path()).await.unwrap();

    assert_eq!(sent, 2);
    assert_eq!(mock.writes(), vec!["INST:NSEL 1", "VOLT 3.3"]);
}

#[tokio::test]
async fn missing_macro_file_is_an_error() {
    let mock = MockTransport::new();
    let mut inst = Keithley2220::new(mock.clone());

    let dir = tempfile::tempdir().unwrap();
    let result = run_macro(&mut inst, &dir.path().join("absent.scpi")).await;

    assert!(result.is_err());
    assert!(mock.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn interrupted_macro_still_returns_to_local_once() {
    let mock = MockTransport::new();
    let mut inst = Keithley2220::new(mock.clone());
    inst.enter_remote().await.unwrap();

    let script = "VOLT 1\nVOLT 2\nVOLT 3\nVOLT 4\nVOLT 5\n";
    let outcome = shutdown::or_interrupt(
        run_script(&mut inst, script),
        tokio::time::sleep(Duration::from_millis(250)),
    )
    .await
    .unwrap();
    inst.close().await.unwrap();

    assert_eq!(outcome, None);
    assert_eq!(
        mock.calls(),
        vec![
            Call::Write("SYSTEM:REMOTE".to_string()),
            Call::Write("VOLT 1".to_string()),
            Call::Write("VOLT 2".to_string()),
            Call::Write("SYSTem:LOCal".to_string()),
            Call::Close,
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn finished_macro_is_not_reported_as_interrupted() {
    let mock = MockTransport::new();
    let mut inst = Keithley2220::new(mock.clone());

    let outcome = shutdown::or_interrupt(
        run_script(&mut inst, "VOLT 1\n"),
        tokio::time::sleep(Duration::from_secs(10)),
    )
    .await
    .unwrap();

    assert_eq!(outcome, Some(1));
}
