//! 凭证存取服务 - 业务能力层
//!
//! 流水线把凭证存储当黑盒消费：只依赖 get/set 两个窄接口。
//! 这里提供环境变量实现；加密保险箱等实现可以替换接入。

use crate::error::{AppError, AppResult, ConfigError};

/// 凭证存取能力
pub trait CredentialStore {
    /// 读取密钥，不存在时报缺少凭证错误
    fn get_secret(&self, key: &str) -> AppResult<String>;
    /// 写入密钥
    fn set_secret(&mut self, key: &str, value: &str) -> AppResult<()>;
}

/// 环境变量实现
#[derive(Debug, Default)]
pub struct EnvCredentialStore;

impl EnvCredentialStore {
    pub fn new() -> Self {
        Self
    }
}

impl CredentialStore for EnvCredentialStore {
    fn get_secret(&self, key: &str) -> AppResult<String> {
        std::env::var(key).map_err(|_| {
            AppError::Config(ConfigError::CredentialMissing {
                key: key.to_string(),
            })
        })
    }

    fn set_secret(&mut self, key: &str, value: &str) -> AppResult<()> {
        // 进程级设置，只影响当前运行
        std::env::set_var(key, value);
        Ok(())
    }
}
