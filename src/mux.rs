//! # 带指标的请求多路复用器
//!
//! [`ServeMux`] 按 pattern 注册 handler，每个 handler 都会被 [`Middleware`] 包装，
//! 默认以注册时的 pattern 作为 handler 标签。
//!
//! # 匹配规则
//! - 以 `/` 结尾的 pattern 匹配整个子树，例如 `/images/` 匹配 `/images/a.png`；
//!   其余 pattern 只匹配完全相同的路径。
//! - 多个 pattern 都匹配时，最长的优先。
//! - 不以 `/` 开头的 pattern 带有主机名，例如 `example.com/`，只匹配该主机的请求，
//!   且优先于不带主机名的 pattern。
//! - 只注册了 `/tree/` 时，对 `/tree` 的请求会被重定向到 `/tree/`。
//!
//! # 示例
//!
//! ```
//! use httpprom::{HandlerOptions, MetricsConfig, ServeMux};
//!
//! let mut mux = ServeMux::new(MetricsConfig::new().with_method());
//! mux.handle_fn("/", |w, _req| {
//!     w.write(b"hello").unwrap();
//! }, HandlerOptions::new());
//! mux.handle_fn("/api/", |w, _req| {
//!     w.write_header(204);
//! }, HandlerOptions::new().with_name("api"));
//! ```

use std::collections::HashMap;

use bytes::Bytes;
use http::{HeaderValue, Request, header};
use prometheus_client::registry::Registry;

use crate::{
    config::MetricsConfig,
    error::RegisterError,
    handler::{Handler, HandlerOptions},
    middleware::{InstrumentedHandler, Middleware},
    service::MuxService,
    writer::ResponseWriter,
};

pub struct ServeMux {
    middleware: Middleware,
    routes: HashMap<String, InstrumentedHandler>,
    /// 子树 pattern，按长度从长到短
    subtrees: Vec<String>,
    hosts: bool,
}

impl Default for ServeMux {
    fn default() -> Self {
        Self::new(MetricsConfig::default())
    }
}

impl std::fmt::Debug for ServeMux {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut patterns: Vec<&String> = self.routes.keys().collect();
        patterns.sort();
        f.debug_struct("ServeMux")
            .field("middleware", &self.middleware)
            .field("patterns", &patterns)
            .finish()
    }
}

impl ServeMux {
    /// # Panics
    ///
    /// 配置不合法时 panic，见 [`MetricsConfig::validate`]
    pub fn new(config: MetricsConfig) -> Self {
        Self::with_middleware(Middleware::new(config))
    }

    /// 与其他 mux 或独立使用的 handler 共享同一组指标
    pub fn with_middleware(middleware: Middleware) -> Self {
        Self {
            middleware,
            routes: HashMap::new(),
            subtrees: Vec::new(),
            hosts: false,
        }
    }

    pub fn middleware(&self) -> &Middleware {
        &self.middleware
    }

    pub fn register(&self, registry: &mut Registry) {
        self.middleware.register(registry);
    }

    /// 注册 handler
    ///
    /// # Panics
    ///
    /// pattern 为空、不含 `/` 或已被注册时 panic
    pub fn handle(&mut self, pattern: &str, handler: impl Handler, options: HandlerOptions) -> &mut Self {
        if let Err(err) = self.try_handle(pattern, handler, options) {
            panic!("httpprom: {err}");
        }
        self
    }

    /// 注册闭包 handler
    ///
    /// # Panics
    ///
    /// 同 [`ServeMux::handle`]
    pub fn handle_fn<F>(&mut self, pattern: &str, handler: F, options: HandlerOptions) -> &mut Self
    where
        F: Fn(&mut dyn ResponseWriter, &Request<Bytes>) + Send + Sync + 'static,
    {
        if let Err(err) = self.insert(pattern, |mw, name| mw.handler_fn(name, handler), options) {
            panic!("httpprom: {err}");
        }
        self
    }

    pub fn try_handle(&mut self, pattern: &str, handler: impl Handler, options: HandlerOptions) -> Result<(), RegisterError> {
        self.insert(pattern, |mw, name| mw.handler(name, handler), options)
    }

    fn insert(
        &mut self, pattern: &str, instrument: impl FnOnce(&Middleware, String) -> InstrumentedHandler, options: HandlerOptions,
    ) -> Result<(), RegisterError> {
        if pattern.is_empty() || !pattern.contains('/') {
            return Err(RegisterError::InvalidPattern(pattern.to_string()));
        }
        if self.routes.contains_key(pattern) {
            return Err(RegisterError::Duplicate(pattern.to_string()));
        }
        let name = options.name.unwrap_or_else(|| pattern.to_string());
        log::debug!("register {pattern} as handler {name:?}");
        let handler = instrument(&self.middleware, name);
        self.routes.insert(pattern.to_string(), handler);
        if pattern.ends_with('/') {
            let at = self.subtrees.partition_point(|existing| existing.len() >= pattern.len());
            self.subtrees.insert(at, pattern.to_string());
        }
        if !pattern.starts_with('/') {
            self.hosts = true;
        }
        Ok(())
    }

    /// 转成 tower Service，供 axum / hyper 使用
    pub fn into_service(self) -> MuxService {
        MuxService::new(self)
    }

    fn lookup(&self, path: &str) -> Option<&InstrumentedHandler> {
        if let Some(handler) = self.routes.get(path) {
            return Some(handler);
        }
        self.subtrees
            .iter()
            .find(|pattern| path.starts_with(pattern.as_str()))
            .and_then(|pattern| self.routes.get(pattern))
    }

    fn find(&self, host: &str, path: &str) -> Option<&InstrumentedHandler> {
        if self.hosts {
            if let Some(handler) = self.lookup(&format!("{host}{path}")) {
                return Some(handler);
            }
        }
        self.lookup(path)
    }

    /// `path` 没有精确注册而 `path/` 是子树时，返回重定向目标
    fn redirect_target(&self, host: &str, path: &str) -> Option<String> {
        let candidates = [format!("{host}{path}"), path.to_string()];
        let registered = |p: &str| self.routes.contains_key(p);
        let keys = if self.hosts { &candidates[..] } else { &candidates[1..] };
        if path.is_empty() || path.ends_with('/') || keys.iter().any(|c| registered(c)) {
            return None;
        }
        keys.iter().any(|c| registered(&format!("{c}/"))).then(|| format!("{path}/"))
    }
}

impl Handler for ServeMux {
    fn serve_http(&self, w: &mut dyn ResponseWriter, req: &Request<Bytes>) {
        let host = request_host(req);
        let path = req.uri().path();
        if let Some(target) = self.redirect_target(host, path) {
            let location = match req.uri().query() {
                Some(query) => format!("{target}?{query}"),
                None => target,
            };
            redirect(w, &location);
            return;
        }
        match self.find(host, path) {
            Some(handler) => handler.serve_http(w, req),
            None => not_found(w),
        }
    }
}

fn request_host(req: &Request<Bytes>) -> &str {
    let host = req
        .uri()
        .host()
        .or_else(|| req.headers().get(header::HOST).and_then(|h| h.to_str().ok()))
        .unwrap_or_default();
    strip_port(host)
}

fn strip_port(host: &str) -> &str {
    // [::1]:8080
    if let Some(end) = host.rfind(']') {
        return &host[..=end];
    }
    match host.rsplit_once(':') {
        Some((name, port)) if port.bytes().all(|b| b.is_ascii_digit()) => name,
        _ => host,
    }
}

fn redirect(w: &mut dyn ResponseWriter, location: &str) {
    match HeaderValue::from_str(location) {
        Ok(value) => {
            w.header().insert(header::LOCATION, value);
            w.write_header(301);
        }
        Err(err) => {
            log::warn!("invalid redirect location {location:?}: {err}");
            not_found(w);
        }
    }
}

fn not_found(w: &mut dyn ResponseWriter) {
    let headers = w.header();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
    headers.insert(header::X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
    w.write_header(404);
    if let Err(err) = w.write(b"404 page not found\n") {
        log::debug!("write not found response: {err}");
    }
}
