use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use tempfile::TempDir;

use mood_monitor::classifier::EmotionClassifier;
use mood_monitor::config::{CaptureConfig, ClassifierConfig, Config, DeviceConfig, DeviceSource};
use mood_monitor::device::CaptureDevice;
use mood_monitor::history::MoodHistory;
use mood_monitor::routes::build_router;
use mood_monitor::session::{SessionManager, SessionSettings};
use mood_monitor::state::AppState;

use super::fixtures::{Behavior, LabelCycle, StubCamera};

pub struct TestApp {
    pub app: Router,
    pub state: AppState,
    pub config: Config,
    pub camera: Arc<StubCamera>,
    _temp_dir: TempDir,
}

impl TestApp {
    pub fn log_path(&self) -> PathBuf {
        PathBuf::from(&self.config.mood_log_path)
    }
}

fn test_config(temp_dir: &TempDir) -> Config {
    // 直接构造 Config，避免 set_var 造成多线程测试环境变量竞态
    Config {
        host: "127.0.0.1".parse().expect("host"),
        port: 0,
        log_level: "warn".to_string(),
        enable_file_logs: false,
        log_dir: temp_dir.path().join("logs").display().to_string(),
        cors_origin: "*".to_string(),
        mood_log_path: temp_dir.path().join("mood_log.json").display().to_string(),
        capture: CaptureConfig {
            duration_secs: 10,
            device: DeviceConfig {
                source: DeviceSource::Directory,
                dir: temp_dir.path().join("frames").display().to_string(),
                ..DeviceConfig::default()
            },
            ..CaptureConfig::default()
        },
        classifier: ClassifierConfig::default(),
    }
}

pub fn spawn_with(behavior: Behavior, labels: &[&str]) -> TestApp {
    let temp_dir = tempfile::tempdir().expect("tempdir");
    let config = test_config(&temp_dir);

    let camera = StubCamera::new(behavior);
    let device: Arc<dyn CaptureDevice> = camera.clone();
    let classifier: Arc<dyn EmotionClassifier> = LabelCycle::new(labels);
    let sessions = Arc::new(SessionManager::new(
        device,
        classifier,
        Arc::new(MoodHistory::new()),
        SessionSettings::from_config(&config),
    ));
    let state = AppState::new(sessions, &config);
    let app = build_router(state.clone());

    TestApp {
        app,
        state,
        config,
        camera,
        _temp_dir: temp_dir,
    }
}

pub fn spawn_test_app() -> TestApp {
    spawn_with(Behavior::Frames(3), &["happy", "sad", "sad"])
}

/// 按配置装配真实后端：目录设备 + mock 分类器
pub struct ConfiguredApp {
    pub app: Router,
    pub state: AppState,
    pub config: Config,
    _temp_dir: TempDir,
}

impl ConfiguredApp {
    pub fn frames_dir(&self) -> PathBuf {
        PathBuf::from(&self.config.capture.device.dir)
    }

    pub fn log_path(&self) -> PathBuf {
        PathBuf::from(&self.config.mood_log_path)
    }
}

pub fn spawn_directory_app(mock_label: &str) -> ConfiguredApp {
    let temp_dir = tempfile::tempdir().expect("tempdir");
    let mut config = test_config(&temp_dir);
    config.classifier.mock_label = mock_label.to_string();

    let state = AppState::from_config(&config);
    let app = build_router(state.clone());

    ConfiguredApp {
        app,
        state,
        config,
        _temp_dir: temp_dir,
    }
}
