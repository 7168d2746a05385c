mod common;

use std::path::Path;

use axum::http::StatusCode;
use image::{Rgb, RgbImage};

use common::app::spawn_directory_app;
use common::http::{assert_json_error, get_json, post_json};
use mood_monitor::history::read_log;

fn write_frames(dir: &Path, count: usize) {
    std::fs::create_dir_all(dir).expect("frames dir");
    for i in 0..count {
        RgbImage::from_pixel(8, 6, Rgb([40 * i as u8, 90, 160]))
            .save(dir.join(format!("frame-{i:03}.png")))
            .expect("write frame");
    }
}

#[tokio::test]
async fn it_replays_frame_directory_through_session() {
    let app = spawn_directory_app("happy");
    write_frames(&app.frames_dir(), 3);

    let (status, body) = post_json(&app.app, "/start-webcam").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "started");

    let report = app.state.sessions().wait().await.expect("session report");
    assert_eq!(report.frames, 3);
    assert_eq!(report.no_face, 0);
    assert!(report.persisted);

    let (_, history) = get_json(&app.app, "/mood-history").await;
    assert_eq!(
        history["mood_history"],
        serde_json::json!(["happy", "happy", "happy"])
    );
    assert_eq!(
        history["summary"],
        "Stable mood detected! Your common mood: happy"
    );

    let (_, emotion) = get_json(&app.app, "/emotion").await;
    assert_eq!(emotion["current_emotion"], "happy");

    let logged = read_log(&app.log_path()).await.expect("mood log");
    assert_eq!(logged, vec!["happy", "happy", "happy"]);

    let (_, session) = get_json(&app.app, "/session").await;
    assert_eq!(session["last"]["end_reason"], "end_of_stream");
}

#[tokio::test]
async fn it_missing_frame_directory_is_device_unavailable() {
    let app = spawn_directory_app("happy");

    let (status, body) = post_json(&app.app, "/start-webcam").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_json_error(&body, "DEVICE_UNAVAILABLE");
    assert!(!app.log_path().exists());

    // 补上帧文件后可以重新启动
    write_frames(&app.frames_dir(), 1);
    let (status, _) = post_json(&app.app, "/start-webcam").await;
    assert_eq!(status, StatusCode::OK);
    let report = app.state.sessions().wait().await.expect("session report");
    assert_eq!(report.frames, 1);
}

#[tokio::test]
async fn it_unclassifiable_frames_record_sentinel() {
    // 空标签的 mock 分类器表示检测不到人脸
    let app = spawn_directory_app("");
    write_frames(&app.frames_dir(), 2);

    let (status, _) = post_json(&app.app, "/start-webcam").await;
    assert_eq!(status, StatusCode::OK);
    let report = app.state.sessions().wait().await.expect("session report");
    assert_eq!(report.no_face, 2);

    let (_, history) = get_json(&app.app, "/mood-history").await;
    assert_eq!(
        history["mood_history"],
        serde_json::json!(["No face detected", "No face detected"])
    );
    assert_eq!(history["summary"], "Mood analysis: No face detected");
}
