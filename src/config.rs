//! # 指标标签配置
//!
//! 构造 [`crate::Middleware`] 时确定，之后不可修改。既可以用 `with_*` 方法构建，
//! 也可以从 YAML 文件加载：
//!
//! ```yaml
//! method: true
//! code: true
//! namespace: myapp
//! const_labels:
//!   region: eu-west-1
//! ```

use std::{collections::BTreeMap, fs, path::Path};

use serde::Deserialize;

use crate::error::ConfigError;

/// 请求标签，常量标签不能与之重名
pub(crate) const REQUEST_LABELS: [&str; 3] = ["handler", "method", "code"];

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MetricsConfig {
    /// 是否添加 method 标签
    pub method: bool,
    /// 是否添加 code 标签，只作用于请求总数
    pub code: bool,
    /// 所有指标名的前缀
    pub namespace: Option<String>,
    /// 同一个完整指标名下的常量标签名必须一致
    pub const_labels: BTreeMap<String, String>,
}

impl MetricsConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_method(mut self) -> Self {
        self.method = true;
        self
    }

    pub fn with_code(mut self) -> Self {
        self.code = true;
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn with_const_labels<K, V>(mut self, labels: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.const_labels = labels.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        self
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(namespace) = &self.namespace {
            if !is_valid_name(namespace) {
                return Err(ConfigError::InvalidNamespace(namespace.clone()));
            }
        }
        for name in self.const_labels.keys() {
            if !is_valid_name(name) || name.starts_with("__") {
                return Err(ConfigError::InvalidLabelName(name.clone()));
            }
            if REQUEST_LABELS.contains(&name.as_str()) {
                return Err(ConfigError::ReservedLabel(name.clone()));
            }
        }
        Ok(())
    }
}

fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => chars.all(|c| c.is_ascii_alphanumeric() || c == '_'),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let config = MetricsConfig::new()
            .with_method()
            .with_code()
            .with_namespace("app")
            .with_const_labels([("foo", "bar")]);
        assert!(config.method && config.code);
        assert_eq!(config.namespace.as_deref(), Some("app"));
        assert_eq!(config.const_labels.get("foo").map(String::as_str), Some("bar"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_yaml() {
        let config = MetricsConfig::from_yaml("method: true\nnamespace: app\nconst_labels:\n  region: eu\n").unwrap();
        assert!(config.method);
        assert!(!config.code);
        assert_eq!(config.namespace.as_deref(), Some("app"));
        assert_eq!(config.const_labels.len(), 1);

        assert_eq!(MetricsConfig::from_yaml("{}").unwrap(), MetricsConfig::default());
    }

    #[test]
    fn test_from_yaml_rejects_unknown_fields() {
        assert!(matches!(MetricsConfig::from_yaml("methods: true"), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_validate() {
        let reserved = MetricsConfig::new().with_const_labels([("code", "x")]);
        assert!(matches!(reserved.validate(), Err(ConfigError::ReservedLabel(name)) if name == "code"));

        let invalid = MetricsConfig::new().with_const_labels([("1abc", "x")]);
        assert!(matches!(invalid.validate(), Err(ConfigError::InvalidLabelName(_))));

        let internal = MetricsConfig::new().with_const_labels([("__name__", "x")]);
        assert!(matches!(internal.validate(), Err(ConfigError::InvalidLabelName(_))));

        let namespace = MetricsConfig::new().with_namespace("my-app");
        assert!(matches!(namespace.validate(), Err(ConfigError::InvalidNamespace(_))));
    }

    #[test]
    fn test_read_missing_file() {
        let err = MetricsConfig::from_yaml_file("/nonexistent/httpprom.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
