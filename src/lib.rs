//! # httpprom
//!
//! 为 HTTP handler 记录 prometheus 请求指标：
//!
//! - `http_server_requests_pending`：正在处理的请求数
//! - `http_server_requests_total`：已正常返回的请求数
//!
//! 标签固定包含 `handler`，可选 `method` 和 `code`，由 [`MetricsConfig`] 决定。
//!
//! handler 拿到的 writer 经过 [`delegate`] 包装，用于记录状态码和写出的字节数，
//! 同时保留原 writer 的可选能力（flush、close notify 等），见 [`writer`] 模块。
//!
//! ```no_run
//! use httpprom::{HandlerOptions, MetricsConfig, ServeMux, new_server};
//! use prometheus_client::registry::Registry;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//! let mut registry = Registry::default();
//! let mut mux = ServeMux::new(MetricsConfig::new().with_method().with_code());
//! mux.register(&mut registry);
//! mux.handle_fn("/", |w, _req| {
//!     w.write(b"hello").unwrap();
//! }, HandlerOptions::new());
//!
//! let (server, shutdown_tx) = new_server(8080, mux.into_service());
//! tokio::spawn(async move {
//!     let _ = httpprom::wait_signal().await;
//!     let _ = shutdown_tx.send(()).await;
//! });
//! server.run().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod delegator;
pub mod error;
pub mod handler;
pub mod labels;
#[cfg(feature = "use_tracing_subscriber")]
pub mod logging;
pub mod lookup;
pub mod metrics;
pub mod middleware;
pub mod mux;
pub mod recorder;
pub mod server;
pub mod service;
pub mod stream;
#[cfg(test)]
mod test_util;
pub mod writer;

pub type DynError = Box<dyn std::error::Error + Send + Sync>;

pub use config::MetricsConfig;
pub use delegator::{Delegator, delegate};
pub use error::{ConfigError, RegisterError};
pub use handler::{Handler, HandlerOptions};
pub use labels::{coalesce, maybe};
pub use lookup::{lookup_code, lookup_method};
pub use metrics::{CounterFamily, CounterLike, GaugeFamily, GaugeLike, MetricOpts};
pub use middleware::{InstrumentedHandler, Middleware};
pub use mux::ServeMux;
pub use recorder::ResponseRecorder;
pub use server::{Server, new_server, wait_signal};
pub use service::{DEFAULT_BODY_LIMIT, MuxService};
pub use stream::StreamingResponseWriter;
pub use writer::{
    Capabilities, CloseNotifier, Flusher, Hijacked, Hijacker, PushOptions, Pusher, RawConn, ReaderFrom, ResponseWriter,
};
