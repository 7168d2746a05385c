/// 尚未采集任何帧时的默认情绪
pub const DEFAULT_EMOTION: &str = "Neutral";

/// 分类器未检测到人脸（或分类失败）时写入历史的哨兵标签
pub const NO_FACE_DETECTED: &str = "No face detected";

/// 历史为空时的摘要文本
pub const NO_DATA_MESSAGE: &str = "No data yet.";

/// 高压力情绪集合
pub const STRESS_INDICATORS: &[&str] = &["angry", "fear", "sad"];

/// 平稳情绪集合
pub const CALM_INDICATORS: &[&str] = &["happy", "neutral"];

/// 默认单次采集时长（秒）
pub const DEFAULT_SESSION_SECS: u64 = 10;

/// 默认情绪日志文件
pub const DEFAULT_MOOD_LOG_PATH: &str = "mood_log.json";

/// 目录回放设备接受的图片扩展名
pub const FRAME_FILE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// 发送给分类服务的 JPEG 质量
pub const CLASSIFIER_JPEG_QUALITY: u8 = 85;
