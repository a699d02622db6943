//! End-to-end recording scenarios driven through the public API

mod test_helpers;

use std::time::{Duration, Instant};

use gesture_capture::{
    Error,
    collector::FrameRecord,
    export::DirectorySink,
    session::{Conclusion, SessionStatus},
    types::{Detection, Frame},
};
use test_helpers::{MemorySink, controller, pose_record};

const COUNTDOWN: Duration = Duration::from_secs(180);
const SETTLE: Duration = Duration::from_millis(500);

/// Two pose points for "smile" end up as header plus two rows
#[test]
fn test_expiry_exports_pose_rows() {
    let mut session = controller(&["smile", "wave"]);
    let mut sink = MemorySink::default();
    let t0 = Instant::now();

    session.start(t0).unwrap();
    assert!(session.collect(pose_record(&session, 1000)));

    assert!(session.poll(t0 + COUNTDOWN, &mut sink).is_none());
    assert!(session.is_settling());
    let outcome = session
        .poll(t0 + COUNTDOWN + SETTLE, &mut sink)
        .expect("settle delay elapsed")
        .unwrap();

    assert!(matches!(outcome, Conclusion::Exported(ref r) if r.frames == 1 && r.rows == 2));
    assert_eq!(sink.files.len(), 1);
    assert_eq!(sink.files[0].0, "gesture-abhinav_kartik-smile.csv");
    assert_eq!(
        sink.text(0).lines().collect::<Vec<_>>(),
        vec![
            "id,timestamp,gesture,type,index,x,y,z,visibility",
            "abhinav kartik,1000,smile,pose,0,0.1,0.2,0,0.9",
            "abhinav kartik,1000,smile,pose,1,0.3,0.4,0,0.8",
        ]
    );
    assert_eq!(session.status(), SessionStatus::Idle);
    assert_eq!(session.gesture(), "wave");
    assert_eq!(session.buffered_frames(), 0);
}

/// An empty buffer at timeout surfaces an error and stays on the same prompt
#[test]
fn test_empty_buffer_at_timeout() {
    let mut session = controller(&["smile", "wave"]);
    let mut sink = MemorySink::default();
    let t0 = Instant::now();

    session.start(t0).unwrap();
    session.poll(t0 + COUNTDOWN, &mut sink);
    let outcome = session.poll(t0 + COUNTDOWN + SETTLE, &mut sink).unwrap();

    assert!(matches!(outcome, Err(Error::EmptyCapture { ref gesture }) if gesture == "smile"));
    assert!(sink.files.is_empty());
    assert_eq!(session.status(), SessionStatus::Idle);
    assert_eq!(session.gesture_index(), 0);

    // The person can simply try again.
    session.start(t0 + COUNTDOWN * 2).unwrap();
    assert_eq!(session.remaining_secs(), 180);
}

/// Finishing the last prompt moves to done and blocks further starts
#[test]
fn test_last_gesture_completes_session() {
    let mut session = controller(&["smile", "wave"]);
    let mut sink = MemorySink::default();
    let mut now = Instant::now();

    for _ in 0..2 {
        session.start(now).unwrap();
        session.collect(pose_record(&session, 1000));
        session.poll(now + COUNTDOWN, &mut sink);
        session.poll(now + COUNTDOWN + SETTLE, &mut sink).unwrap().unwrap();
        now += COUNTDOWN * 2;
    }

    assert_eq!(session.status(), SessionStatus::Done);
    assert_eq!(sink.files.len(), 2);
    assert_eq!(sink.files[1].0, "gesture-abhinav_kartik-wave.csv");
    assert!(matches!(session.start(now), Err(Error::SessionComplete)));
    assert!(!session.collect(pose_record(&session, 2000)));
}

/// A second expiry right after the first never writes a second file
#[test]
fn test_double_expiry_exports_once() {
    let mut session = controller(&["smile", "wave"]);
    let mut sink = MemorySink::default();
    let t0 = Instant::now();

    session.start(t0).unwrap();
    session.collect(pose_record(&session, 1000));
    session.poll(t0 + COUNTDOWN, &mut sink);
    session.poll(t0 + COUNTDOWN + SETTLE, &mut sink).unwrap().unwrap();

    assert!(matches!(session.conclude(&mut sink), Ok(Conclusion::AlreadySaved)));
    assert!(session.poll(t0 + COUNTDOWN * 2, &mut sink).is_none());
    assert_eq!(sink.files.len(), 1);
}

/// Time spent paused does not count against the recording window
#[test]
fn test_pause_resume_keeps_remaining_time() {
    let mut session = controller(&["smile"]);
    let mut sink = MemorySink::default();
    let t0 = Instant::now();

    session.start(t0).unwrap();
    session.collect(pose_record(&session, 1));
    session.poll(t0 + Duration::from_secs(60), &mut sink);
    session.pause().unwrap();
    assert!(!session.collect(pose_record(&session, 2)));

    let resumed = t0 + Duration::from_secs(600);
    session.poll(resumed, &mut sink);
    assert_eq!(session.remaining_secs(), 120);
    session.resume(resumed).unwrap();

    session.poll(resumed + Duration::from_secs(120), &mut sink);
    let outcome = session
        .poll(resumed + Duration::from_secs(120) + SETTLE, &mut sink)
        .unwrap()
        .unwrap();
    assert!(matches!(outcome, Conclusion::Exported(ref r) if r.frames == 1));
    assert_eq!(session.status(), SessionStatus::Done);
}

/// Frames without landmarks are exported as a single fallback row
#[test]
fn test_fallback_rows_reach_csv() {
    let mut session = controller(&["smile"]);
    let mut sink = MemorySink::default();

    session.start(Instant::now()).unwrap();
    let empty = Detection::empty(Frame::blank(4, 4));
    let record = FrameRecord::from_detection(42, &empty).for_generation(session.generation());
    session.collect(record);
    session.stop(&mut sink).unwrap();

    let text = sink.text(0);
    assert_eq!(
        text.lines().nth(1),
        Some("abhinav kartik,42,smile,fallbackData,0,0.5,0.5,0,1")
    );
}

/// Exporting into a directory writes the file and never overwrites an earlier take
#[test]
fn test_directory_sink_keeps_earlier_takes() {
    let dir = tempfile::tempdir().unwrap();
    let mut sink = DirectorySink::new(dir.path().join("recordings"));

    for take in 0..2 {
        let mut session = controller(&["smile"]);
        session.start(Instant::now()).unwrap();
        session.collect(pose_record(&session, 1000 + take));
        session.stop(&mut sink).unwrap();
    }

    let first = dir.path().join("recordings/gesture-abhinav_kartik-smile.csv");
    let second = dir
        .path()
        .join("recordings/gesture-abhinav_kartik-smile (1).csv");
    assert!(std::fs::read_to_string(first).unwrap().contains(",1000,"));
    assert!(std::fs::read_to_string(second).unwrap().contains(",1001,"));
}

/// Path separators in a prompt never leave the output directory
#[test]
fn test_gesture_with_separator_exports_into_output_dir() {
    let dir = tempfile::tempdir().unwrap();
    let mut sink = DirectorySink::new(dir.path());
    let mut session = controller(&["wave left/right", "point\\here"]);

    for _ in 0..2 {
        session.start(Instant::now()).unwrap();
        session.collect(pose_record(&session, 1000));
        session.stop(&mut sink).unwrap();
    }

    assert!(dir.path().join("gesture-abhinav_kartik-wave_left_right.csv").is_file());
    assert!(dir.path().join("gesture-abhinav_kartik-point_here.csv").is_file());
    assert_eq!(session.status(), SessionStatus::Done);
}

/// A write failure leaves the recording paused so it can be saved once the disk is fixed
#[test]
fn test_failed_write_can_be_retried() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("recordings");
    std::fs::write(&out, b"not a directory").unwrap();
    let mut sink = DirectorySink::new(&out);
    let mut session = controller(&["smile", "wave"]);

    session.start(Instant::now()).unwrap();
    session.collect(pose_record(&session, 1000));
    assert!(matches!(session.stop(&mut sink), Err(Error::Io(_))));
    assert_eq!(session.status(), SessionStatus::Paused);
    assert_eq!(session.buffered_frames(), 1);

    std::fs::remove_file(&out).unwrap();
    let outcome = session.stop(&mut sink).unwrap();
    assert!(matches!(outcome, Conclusion::Exported(ref r) if r.frames == 1));
    assert!(out.join("gesture-abhinav_kartik-smile.csv").is_file());
    assert_eq!(session.gesture(), "wave");
}
