//! # 请求指标 middleware
//!
//! 每个被包装的 handler 维护两个 series：
//!
//! - `http_server_requests_pending{handler[,method]}`：正在处理的请求
//! - `http_server_requests_total{handler[,method][,code]}`：正常返回的请求
//!
//! 带哪些可选标签在构造 middleware 时就决定了，每个 handler 拿到固定的打标签函数，
//! 处理请求时不再分支判断。

use std::sync::Arc;

use bytes::Bytes;
use http::Request;
use prometheus_client::registry::Registry;

use crate::{
    config::MetricsConfig,
    delegator::delegate,
    error::ConfigError,
    handler::Handler,
    labels::{coalesce, maybe},
    lookup::{lookup_code, lookup_method},
    metrics::{CounterFamily, CounterLike, GaugeFamily, GaugeLike, MetricOpts, scoped},
    writer::ResponseWriter,
};

const REQUESTS_NAME: &str = "http_server_requests";
const REQUESTS_HELP: &str = "Total number of HTTP server requests completed";
const PENDING_NAME: &str = "http_server_requests_pending";
const PENDING_HELP: &str = "Number of HTTP server requests currently pending";

type PendingFn = fn(&dyn GaugeLike, &str, &str);
type RequestsFn = fn(&dyn CounterLike, &str, &str, &str);

/// 包装 handler 并记录指标，clone 之后共享同一组指标
#[derive(Debug, Clone)]
pub struct Middleware {
    core: Arc<Core>,
}

#[derive(Debug)]
struct Core {
    requests: CounterFamily,
    pending: GaugeFamily,
    config: MetricsConfig,
}

impl Default for Middleware {
    fn default() -> Self {
        Self::new(MetricsConfig::default())
    }
}

impl Middleware {
    /// # Panics
    ///
    /// `config` 无法通过 [`MetricsConfig::validate`] 时 panic
    pub fn new(config: MetricsConfig) -> Self {
        match Self::try_new(config) {
            Ok(mw) => mw,
            Err(err) => panic!("httpprom: {err}"),
        }
    }

    pub fn try_new(config: MetricsConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let requests_labels = coalesce(vec!["handler", maybe("method", config.method), maybe("code", config.code)]);
        let pending_labels = coalesce(vec!["handler", maybe("method", config.method)]);
        log::debug!("request labels: {requests_labels:?}, pending labels: {pending_labels:?}");
        let requests = CounterFamily::new(MetricOpts::new(REQUESTS_NAME, REQUESTS_HELP, &requests_labels));
        let pending = GaugeFamily::new(MetricOpts::new(PENDING_NAME, PENDING_HELP, &pending_labels));
        Ok(Self {
            core: Arc::new(Core { requests, pending, config }),
        })
    }

    pub fn config(&self) -> &MetricsConfig {
        &self.core.config
    }

    pub fn requests(&self) -> &CounterFamily {
        &self.core.requests
    }

    pub fn pending(&self) -> &GaugeFamily {
        &self.core.pending
    }

    /// 注册两个指标 family，带上 namespace 和常量标签
    pub fn register(&self, registry: &mut Registry) {
        let config = &self.core.config;
        let registry = scoped(registry, config.namespace.as_deref(), &config.const_labels);
        self.core.requests.register(registry);
        self.core.pending.register(registry);
    }

    /// 包装 `handler`，series 的 handler 标签为 `name`
    pub fn handler(&self, name: impl Into<String>, handler: impl Handler) -> InstrumentedHandler {
        self.instrument(name.into(), Box::new(handler))
    }

    pub fn handler_fn<F>(&self, name: impl Into<String>, handler: F) -> InstrumentedHandler
    where
        F: Fn(&mut dyn ResponseWriter, &Request<Bytes>) + Send + Sync + 'static,
    {
        self.instrument(name.into(), Box::new(handler))
    }

    fn instrument(&self, name: String, handler: Box<dyn Handler>) -> InstrumentedHandler {
        let config = &self.core.config;
        InstrumentedHandler {
            name,
            handler,
            core: Arc::clone(&self.core),
            pending_inc: pending_inc_fn(config.method),
            pending_dec: pending_dec_fn(config.method),
            requests_inc: requests_inc_fn(config.method, config.code),
        }
    }
}

fn pending_inc_fn(method: bool) -> PendingFn {
    if method {
        (|gauge: &dyn GaugeLike, handler: &str, method: &str| gauge.inc(&[handler, method])) as PendingFn
    } else {
        (|gauge: &dyn GaugeLike, handler: &str, _method: &str| gauge.inc(&[handler])) as PendingFn
    }
}

fn pending_dec_fn(method: bool) -> PendingFn {
    if method {
        (|gauge: &dyn GaugeLike, handler: &str, method: &str| gauge.dec(&[handler, method])) as PendingFn
    } else {
        (|gauge: &dyn GaugeLike, handler: &str, _method: &str| gauge.dec(&[handler])) as PendingFn
    }
}

fn requests_inc_fn(method: bool, code: bool) -> RequestsFn {
    match (method, code) {
        (true, true) => {
            (|counter: &dyn CounterLike, handler: &str, method: &str, code: &str| counter.inc(&[handler, method, code]))
                as RequestsFn
        }
        (true, false) => {
            (|counter: &dyn CounterLike, handler: &str, method: &str, _code: &str| counter.inc(&[handler, method]))
                as RequestsFn
        }
        (false, true) => {
            (|counter: &dyn CounterLike, handler: &str, _method: &str, code: &str| counter.inc(&[handler, code]))
                as RequestsFn
        }
        (false, false) => {
            (|counter: &dyn CounterLike, handler: &str, _method: &str, _code: &str| counter.inc(&[handler]))
                as RequestsFn
        }
    }
}

/// 由 [`Middleware::handler`] 包装出的 handler
pub struct InstrumentedHandler {
    name: String,
    handler: Box<dyn Handler>,
    core: Arc<Core>,
    pending_inc: PendingFn,
    pending_dec: PendingFn,
    requests_inc: RequestsFn,
}

impl InstrumentedHandler {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for InstrumentedHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstrumentedHandler").field("name", &self.name).finish_non_exhaustive()
    }
}

impl Handler for InstrumentedHandler {
    fn serve_http(&self, w: &mut dyn ResponseWriter, req: &Request<Bytes>) {
        let method = lookup_method(req.method().as_str());
        (self.pending_inc)(&self.core.pending, &self.name, &method);
        let _pending = PendingGuard {
            gauge: &self.core.pending,
            dec: self.pending_dec,
            handler: &self.name,
            method: &method,
        };

        let mut d = delegate(w);
        self.handler.serve_http(d.as_writer(), req);

        let code = lookup_code(d.status());
        (self.requests_inc)(&self.core.requests, &self.name, &method, &code);
    }
}

/// 任何退出路径（包括 panic 展开）都会把 pending 减回去
struct PendingGuard<'a> {
    gauge: &'a dyn GaugeLike,
    dec: PendingFn,
    handler: &'a str,
    method: &'a str,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        (self.dec)(self.gauge, self.handler, self.method);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{recorder::ResponseRecorder, test_util::get, writer::Capabilities};
    use std::panic::{AssertUnwindSafe, catch_unwind};

    fn ok_handler(w: &mut dyn ResponseWriter, _req: &Request<Bytes>) {
        w.write(b"ok").unwrap();
    }

    #[test]
    fn test_counts_completed_requests() {
        let mw = Middleware::default();
        let h = mw.handler_fn("root", ok_handler);
        for _ in 0..3 {
            let mut rec = ResponseRecorder::new();
            h.serve_http(&mut rec, &get("/"));
            assert_eq!(rec.body_string(), "ok");
        }
        assert_eq!(mw.requests().get(&["root"]), 3);
        assert_eq!(mw.pending().get(&["root"]), 0);
    }

    #[test]
    fn test_label_shapes() {
        let cases = [
            (MetricsConfig::new(), vec!["handler"], vec!["root"]),
            (MetricsConfig::new().with_method(), vec!["handler", "method"], vec!["root", "post"]),
            (MetricsConfig::new().with_code(), vec!["handler", "code"], vec!["root", "201"]),
            (
                MetricsConfig::new().with_method().with_code(),
                vec!["handler", "method", "code"],
                vec!["root", "post", "201"],
            ),
        ];
        for (config, names, values) in cases {
            let mw = Middleware::new(config.clone());
            assert_eq!(mw.requests().label_names(), names.as_slice(), "{config:?}");
            let h = mw.handler_fn("root", |w, _| w.write_header(201));
            let req = Request::post("/").body(Bytes::new()).unwrap();
            h.serve_http(&mut ResponseRecorder::new(), &req);
            assert_eq!(mw.requests().get(&values), 1, "{config:?}");
            // pending 从不带 code 标签
            let pending_values: Vec<&str> = values.iter().copied().filter(|v| *v != "201").collect();
            assert_eq!(mw.pending().label_names().len(), pending_values.len());
            assert_eq!(mw.pending().get(&pending_values), 0);
        }
    }

    #[test]
    fn test_unknown_method_and_code() {
        let mw = Middleware::new(MetricsConfig::new().with_method().with_code());
        let h = mw.handler_fn("x", |w, _| w.write_header(999));
        let req = Request::builder().method("PURGE").uri("/").body(Bytes::new()).unwrap();
        h.serve_http(&mut ResponseRecorder::new(), &req);
        assert_eq!(mw.requests().get(&["x", "purge", "999"]), 1);
    }

    #[test]
    fn test_panic_releases_pending_without_completing() {
        let mw = Middleware::new(MetricsConfig::new().with_method());
        let h = mw.handler_fn("boom", |w, _| {
            w.write_header(500);
            panic!("handler failed");
        });
        let mut rec = ResponseRecorder::new();
        let result = catch_unwind(AssertUnwindSafe(|| h.serve_http(&mut rec, &get("/"))));
        assert!(result.is_err());
        assert_eq!(mw.pending().get(&["boom", "get"]), 0);
        assert_eq!(mw.requests().get(&["boom", "get"]), 0);
    }

    #[test]
    fn test_pending_visible_inside_handler() {
        let mw = Middleware::default();
        let pending = mw.pending().clone();
        let h = mw.handler_fn("inner", move |w, _| {
            let in_flight = pending.get(&["inner"]);
            w.write(in_flight.to_string().as_bytes()).unwrap();
        });
        let mut rec = ResponseRecorder::new();
        h.serve_http(&mut rec, &get("/"));
        assert_eq!(rec.body_string(), "1");
        assert_eq!(mw.pending().get(&["inner"]), 0);
    }

    #[test]
    fn test_handler_sees_writer_capabilities() {
        let mw = Middleware::default();
        let h = mw.handler_fn("caps", |w, _| {
            let caps = Capabilities::of(w);
            w.write(format!("{caps:?}").as_bytes()).unwrap();
            if let Some(flusher) = w.as_flusher() {
                flusher.flush().unwrap();
            }
        });
        let mut rec = ResponseRecorder::new();
        h.serve_http(&mut rec, &get("/"));
        assert_eq!(rec.body_string(), "Capabilities(flusher)");
        assert!(rec.flushed());
    }

    #[test]
    fn test_try_new_rejects_reserved_label() {
        let err = Middleware::try_new(MetricsConfig::new().with_const_labels([("handler", "x")])).unwrap_err();
        assert!(matches!(err, ConfigError::ReservedLabel(_)));
    }

    #[test]
    #[should_panic(expected = "httpprom: invalid namespace")]
    fn test_new_panics_on_invalid_config() {
        Middleware::new(MetricsConfig::new().with_namespace("bad name"));
    }

    #[test]
    fn test_exposition_help_text() {
        let mw = Middleware::default();
        let mut registry = Registry::default();
        mw.register(&mut registry);
        mw.handler_fn("root", ok_handler).serve_http(&mut ResponseRecorder::new(), &get("/"));

        let mut text = String::new();
        prometheus_client::encoding::text::encode(&mut text, &registry).unwrap();
        assert!(text.contains("# HELP http_server_requests Total number of HTTP server requests completed.\n"));
        assert!(text.contains("# HELP http_server_requests_pending Number of HTTP server requests currently pending.\n"));
        assert!(!text.contains(".."));
    }
}
