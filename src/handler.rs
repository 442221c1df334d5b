use std::sync::Arc;

use bytes::Bytes;
use http::Request;

use crate::writer::ResponseWriter;

/// 同步处理一个请求，通过 `w` 写出响应
///
/// 闭包 `Fn(&mut dyn ResponseWriter, &Request<Bytes>)` 自动实现本 trait。
pub trait Handler: Send + Sync + 'static {
    fn serve_http(&self, w: &mut dyn ResponseWriter, req: &Request<Bytes>);
}

impl<F> Handler for F
where
    F: Fn(&mut dyn ResponseWriter, &Request<Bytes>) + Send + Sync + 'static,
{
    fn serve_http(&self, w: &mut dyn ResponseWriter, req: &Request<Bytes>) {
        self(w, req)
    }
}

impl Handler for Arc<dyn Handler> {
    fn serve_http(&self, w: &mut dyn ResponseWriter, req: &Request<Bytes>) {
        (**self).serve_http(w, req)
    }
}

/// 单个 handler 的注册选项
#[derive(Debug, Clone, Default)]
pub struct HandlerOptions {
    pub(crate) name: Option<String>,
}

impl HandlerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// 用 `name` 代替注册时的 pattern 作为 handler 标签
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}
