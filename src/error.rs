use std::{io, path::PathBuf};

use thiserror::Error;

/// 指标配置错误，在构造 [`crate::Middleware`] 或加载配置文件时返回
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid namespace {0:?}")]
    InvalidNamespace(String),

    #[error("invalid label name {0:?}")]
    InvalidLabelName(String),

    #[error("label name {0:?} is reserved for request labels")]
    ReservedLabel(String),

    #[error("read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
}

/// handler 注册错误，属于编程错误，应在启动阶段暴露
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegisterError {
    #[error("invalid pattern {0:?}")]
    InvalidPattern(String),

    #[error("multiple registrations for {0}")]
    Duplicate(String),
}
