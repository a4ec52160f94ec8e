use std::fmt;

/// 应用程序错误类型
#[derive(Debug)]
pub enum AppError {
    /// 配置/前置条件错误（致命，当前阶段不推进）
    Config(ConfigError),
    /// LMS API 调用错误
    Lms(LmsError),
    /// 评分引擎错误
    Grading(GradingError),
    /// 文件操作错误
    File(FileError),
    /// 匿名令牌解析错误
    Resolution(ResolutionError),
    /// 文本提取错误
    Extraction(ExtractionError),
    /// 其他错误（用于包装第三方库错误）
    Other(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(e) => write!(f, "配置错误: {}", e),
            AppError::Lms(e) => write!(f, "LMS错误: {}", e),
            AppError::Grading(e) => write!(f, "评分错误: {}", e),
            AppError::File(e) => write!(f, "文件错误: {}", e),
            AppError::Resolution(e) => write!(f, "解析错误: {}", e),
            AppError::Extraction(e) => write!(f, "提取错误: {}", e),
            AppError::Other(msg) => write!(f, "错误: {}", msg),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Config(e) => Some(e),
            AppError::Lms(e) => Some(e),
            AppError::Grading(e) => Some(e),
            AppError::File(e) => Some(e),
            AppError::Resolution(e) => Some(e),
            AppError::Extraction(e) => Some(e),
            AppError::Other(_) => None,
        }
    }
}

/// 配置/前置条件错误
#[derive(Debug)]
pub enum ConfigError {
    /// 缺少评分细则（本地没有，LMS 也没有）
    RubricMissing,
    /// 缺少凭证
    CredentialMissing { key: String },
    /// 阶段前置条件不满足
    StageNotReady { required: String, current: String },
    /// 环境变量解析失败
    EnvVarParseFailed {
        var_name: String,
        value: String,
        expected_type: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::RubricMissing => {
                write!(f, "未找到评分细则（本地文件和 LMS 均不可用）")
            }
            ConfigError::CredentialMissing { key } => {
                write!(f, "缺少凭证: {}", key)
            }
            ConfigError::StageNotReady { required, current } => {
                write!(
                    f,
                    "阶段前置条件不满足: 需要 {} 阶段，当前为 {}",
                    required, current
                )
            }
            ConfigError::EnvVarParseFailed {
                var_name,
                value,
                expected_type,
            } => {
                write!(
                    f,
                    "环境变量 {} 解析失败: 值 '{}' 无法转换为 {}",
                    var_name, value, expected_type
                )
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// LMS API 调用错误
#[derive(Debug)]
pub enum LmsError {
    /// 网络请求失败
    RequestFailed {
        endpoint: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// API 返回错误响应
    BadResponse {
        endpoint: String,
        status: Option<u16>,
        message: Option<String>,
    },
    /// 请求频率限制（应等待后重试同一请求，不计为失败）
    RateLimited {
        endpoint: String,
        retry_after: Option<u64>,
    },
    /// JSON 解析失败
    JsonParseFailed {
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl fmt::Display for LmsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LmsError::RequestFailed { endpoint, source } => {
                write!(f, "LMS请求失败 ({}): {}", endpoint, source)
            }
            LmsError::BadResponse {
                endpoint,
                status,
                message,
            } => {
                write!(
                    f,
                    "LMS返回错误响应 ({}): status={:?}, message={:?}",
                    endpoint, status, message
                )
            }
            LmsError::RateLimited {
                endpoint,
                retry_after,
            } => {
                write!(
                    f,
                    "LMS请求频率限制 ({}), 建议等待: {:?}秒",
                    endpoint, retry_after
                )
            }
            LmsError::JsonParseFailed { source } => {
                write!(f, "JSON解析失败: {}", source)
            }
        }
    }
}

impl std::error::Error for LmsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LmsError::RequestFailed { source, .. } | LmsError::JsonParseFailed { source } => {
                Some(source.as_ref() as &(dyn std::error::Error + 'static))
            }
            _ => None,
        }
    }
}

/// 评分引擎错误
#[derive(Debug)]
pub enum GradingError {
    /// API 调用失败
    ApiCallFailed {
        model: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 返回内容为空
    EmptyContent { model: String },
    /// 评分结果解析失败
    ResponseParseFailed {
        response: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl fmt::Display for GradingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GradingError::ApiCallFailed { model, source } => {
                write!(f, "评分 API 调用失败 (模型: {}): {}", model, source)
            }
            GradingError::EmptyContent { model } => {
                write!(f, "评分引擎返回内容为空 (模型: {})", model)
            }
            GradingError::ResponseParseFailed { response, source } => {
                write!(f, "无法解析评分结果 (响应: {}): {}", response, source)
            }
        }
    }
}

impl std::error::Error for GradingError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GradingError::ApiCallFailed { source, .. }
            | GradingError::ResponseParseFailed { source, .. } => {
                Some(source.as_ref() as &(dyn std::error::Error + 'static))
            }
            _ => None,
        }
    }
}

/// 文件操作错误
#[derive(Debug)]
pub enum FileError {
    /// 文件不存在
    NotFound { path: String },
    /// 读取文件失败
    ReadFailed {
        path: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 写入文件失败
    WriteFailed {
        path: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// TOML 解析失败
    TomlParseFailed {
        path: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl fmt::Display for FileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileError::NotFound { path } => write!(f, "文件不存在: {}", path),
            FileError::ReadFailed { path, source } => {
                write!(f, "读取文件失败 ({}): {}", path, source)
            }
            FileError::WriteFailed { path, source } => {
                write!(f, "写入文件失败 ({}): {}", path, source)
            }
            FileError::TomlParseFailed { path, source } => {
                write!(f, "TOML解析失败 ({}): {}", path, source)
            }
        }
    }
}

impl std::error::Error for FileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FileError::ReadFailed { source, .. }
            | FileError::WriteFailed { source, .. }
            | FileError::TomlParseFailed { source, .. } => {
                Some(source.as_ref() as &(dyn std::error::Error + 'static))
            }
            _ => None,
        }
    }
}

/// 匿名令牌解析错误
///
/// 令牌无法映射回真实身份时产生；调用方应降级为占位标签而不是丢弃该行。
#[derive(Debug)]
pub enum ResolutionError {
    /// 令牌不在当前映射中
    UnknownToken { anon_token: String },
}

impl fmt::Display for ResolutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolutionError::UnknownToken { anon_token } => {
                write!(f, "未知的匿名令牌: {}", anon_token)
            }
        }
    }
}

impl std::error::Error for ResolutionError {}

/// 文本提取错误
///
/// 文件内容不可读时产生；调用方应降级为空内容，仍然对该份提交发起评分。
#[derive(Debug)]
pub enum ExtractionError {
    /// 无法读取文件内容
    Unreadable {
        path: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 不支持的格式（按字节大小估算，内容按空处理）
    UnsupportedFormat { path: String },
}

impl fmt::Display for ExtractionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtractionError::Unreadable { path, source } => {
                write!(f, "无法读取文件内容 ({}): {}", path, source)
            }
            ExtractionError::UnsupportedFormat { path } => {
                write!(f, "不支持的文件格式: {}", path)
            }
        }
    }
}

impl std::error::Error for ExtractionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ExtractionError::Unreadable { source, .. } => {
                Some(source.as_ref() as &(dyn std::error::Error + 'static))
            }
            _ => None,
        }
    }
}

// ========== 从常见错误类型转换 ==========
// 注意：不需要手动实现 From<AppError> for anyhow::Error，
// 因为 anyhow 已经为所有实现了 std::error::Error 的类型提供了自动实现

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Lms(LmsError::JsonParseFailed {
            source: Box::new(err),
        })
    }
}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        AppError::File(FileError::TomlParseFailed {
            path: String::new(), // TOML错误通常不包含路径信息
            source: Box::new(err),
        })
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::File(FileError::ReadFailed {
            path: String::new(),
            source: Box::new(err),
        })
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        let endpoint = err
            .url()
            .map(|u| u.to_string())
            .unwrap_or_else(|| String::from("<unknown>"));
        AppError::Lms(LmsError::RequestFailed {
            endpoint,
            source: Box::new(err),
        })
    }
}

// ========== 便捷构造函数 ==========

impl AppError {
    /// 创建阶段前置条件错误
    pub fn stage_not_ready(required: impl Into<String>, current: impl Into<String>) -> Self {
        AppError::Config(ConfigError::StageNotReady {
            required: required.into(),
            current: current.into(),
        })
    }

    /// 创建 LMS 请求失败错误
    pub fn lms_request_failed(
        endpoint: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::Lms(LmsError::RequestFailed {
            endpoint: endpoint.into(),
            source: Box::new(source),
        })
    }

    /// 创建文件读取错误
    pub fn file_read_failed(
        path: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::File(FileError::ReadFailed {
            path: path.into(),
            source: Box::new(source),
        })
    }

    /// 创建评分 API 调用错误
    pub fn grading_api_failed(
        model: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::Grading(GradingError::ApiCallFailed {
            model: model.into(),
            source: Box::new(source),
        })
    }

    /// 创建未知令牌错误
    pub fn unknown_token(anon_token: impl Into<String>) -> Self {
        AppError::Resolution(ResolutionError::UnknownToken {
            anon_token: anon_token.into(),
        })
    }

    /// 是否为配置/前置条件错误
    pub fn is_config(&self) -> bool {
        matches!(self, AppError::Config(_))
    }

    /// 是否为频率限制错误
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, AppError::Lms(LmsError::RateLimited { .. }))
    }

    /// 频率限制建议的等待秒数（非频率限制错误返回 None）
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            AppError::Lms(LmsError::RateLimited { retry_after, .. }) => {
                Some(retry_after.unwrap_or(60))
            }
            _ => None,
        }
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;
