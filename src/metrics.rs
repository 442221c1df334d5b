//! 按标签值区分的指标存储
//!
//! middleware 只依赖 [`CounterLike`] 和 [`GaugeLike`]，这里的 family 基于 `prometheus-client` 实现它们。

use std::{borrow::Cow, collections::BTreeMap, sync::Arc};

use prometheus_client::{
    metrics::{counter::Counter, family::Family, gauge::Gauge},
    registry::Registry,
};

/// 以标签值为 key 的 counter，标签值按标签名的顺序给出
pub trait CounterLike: Send + Sync {
    fn inc(&self, label_values: &[&str]);
}

/// 可增可减的计数，标签值按标签名的顺序给出
pub trait GaugeLike: Send + Sync {
    fn inc(&self, label_values: &[&str]);
    fn dec(&self, label_values: &[&str]);
}

type LabelSet = Vec<(String, String)>;

/// 指标名、help 和可变标签名
#[derive(Debug, Clone)]
pub struct MetricOpts {
    pub name: &'static str,
    pub help: &'static str,
    pub label_names: Vec<String>,
}

impl MetricOpts {
    pub fn new(name: &'static str, help: &'static str, label_names: &[&str]) -> Self {
        Self {
            name,
            help,
            label_names: label_names.iter().map(|name| name.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CounterFamily {
    opts: Arc<MetricOpts>,
    family: Family<LabelSet, Counter>,
}

impl CounterFamily {
    pub fn new(opts: MetricOpts) -> Self {
        Self {
            opts: Arc::new(opts),
            family: Family::default(),
        }
    }

    pub fn label_names(&self) -> &[String] {
        &self.opts.label_names
    }

    /// 当前值，series 不存在时返回 0，不会创建它
    pub fn get(&self, label_values: &[&str]) -> u64 {
        self.family
            .get(&label_set(&self.opts.label_names, label_values))
            .map(|counter| counter.get())
            .unwrap_or_default()
    }

    pub fn register(&self, registry: &mut Registry) {
        registry.register(self.opts.name, self.opts.help, self.family.clone());
    }
}

impl CounterLike for CounterFamily {
    fn inc(&self, label_values: &[&str]) {
        self.family.get_or_create(&label_set(&self.opts.label_names, label_values)).inc();
    }
}

#[derive(Debug, Clone)]
pub struct GaugeFamily {
    opts: Arc<MetricOpts>,
    family: Family<LabelSet, Gauge>,
}

impl GaugeFamily {
    pub fn new(opts: MetricOpts) -> Self {
        Self {
            opts: Arc::new(opts),
            family: Family::default(),
        }
    }

    pub fn label_names(&self) -> &[String] {
        &self.opts.label_names
    }

    /// 当前值，series 不存在时返回 0，不会创建它
    pub fn get(&self, label_values: &[&str]) -> i64 {
        self.family
            .get(&label_set(&self.opts.label_names, label_values))
            .map(|gauge| gauge.get())
            .unwrap_or_default()
    }

    pub fn register(&self, registry: &mut Registry) {
        registry.register(self.opts.name, self.opts.help, self.family.clone());
    }
}

impl GaugeLike for GaugeFamily {
    fn inc(&self, label_values: &[&str]) {
        self.family.get_or_create(&label_set(&self.opts.label_names, label_values)).inc();
    }

    fn dec(&self, label_values: &[&str]) {
        self.family.get_or_create(&label_set(&self.opts.label_names, label_values)).dec();
    }
}

fn label_set(names: &[String], values: &[&str]) -> LabelSet {
    debug_assert_eq!(names.len(), values.len(), "label cardinality mismatch for {names:?}");
    names
        .iter()
        .zip(values)
        .map(|(name, value)| (name.clone(), value.to_string()))
        .collect()
}

/// 返回带 namespace 前缀和常量标签的 sub registry
pub(crate) fn scoped<'r>(
    registry: &'r mut Registry, namespace: Option<&str>, const_labels: &BTreeMap<String, String>,
) -> &'r mut Registry {
    let mut scoped = registry;
    if let Some(namespace) = namespace {
        scoped = scoped.sub_registry_with_prefix(namespace);
    }
    for (name, value) in const_labels {
        scoped = scoped.sub_registry_with_label((Cow::Owned(name.clone()), Cow::Owned(value.clone())));
    }
    scoped
}
