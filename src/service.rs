//! 把 [`ServeMux`] 包装成 tower [`Service`]
//!
//! 请求体先按上限缓冲，然后 mux 带着 [`StreamingResponseWriter`](crate::StreamingResponseWriter)
//! 在 tokio 的 blocking 线程池上运行。handler 提交状态码后立即返回响应，
//! handler 运行期间 body 持续输出。

use std::{
    convert::Infallible,
    sync::Arc,
    task::{Context, Poll},
};

use axum::{
    body::Body,
    response::{IntoResponse, Response},
};
use futures_util::future::BoxFuture;
use http::{Request, StatusCode};
use http_body_util::{BodyExt, LengthLimitError, Limited};
use tower_service::Service;

use crate::{handler::Handler, mux::ServeMux, stream::streaming};

/// 默认的请求体缓冲上限
pub const DEFAULT_BODY_LIMIT: usize = 2 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct MuxService {
    mux: Arc<ServeMux>,
    body_limit: usize,
}

impl MuxService {
    pub fn new(mux: ServeMux) -> Self {
        Self {
            mux: Arc::new(mux),
            body_limit: DEFAULT_BODY_LIMIT,
        }
    }

    /// 请求体超过上限时直接返回 413，不进入 handler
    pub fn with_body_limit(mut self, limit: usize) -> Self {
        self.body_limit = limit;
        self
    }

    pub fn mux(&self) -> &ServeMux {
        &self.mux
    }
}

impl Service<Request<Body>> for MuxService {
    type Response = Response;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Response, Infallible>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let mux = Arc::clone(&self.mux);
        let limit = self.body_limit;
        Box::pin(async move { Ok(dispatch(mux, req, limit).await) })
    }
}

async fn dispatch(mux: Arc<ServeMux>, req: Request<Body>, limit: usize) -> Response {
    let (parts, body) = req.into_parts();
    let body = match Limited::new(body, limit).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(err) if err.downcast_ref::<LengthLimitError>().is_some() => {
            log::warn!("{} {}: request body over {limit} bytes", parts.method, parts.uri);
            return (StatusCode::PAYLOAD_TOO_LARGE, "request body too large\n").into_response();
        }
        Err(err) => {
            log::warn!("{} {}: read request body: {err}", parts.method, parts.uri);
            return (StatusCode::BAD_REQUEST, "failed to read request body\n").into_response();
        }
    };
    let req = Request::from_parts(parts, body);

    let (writer, head, response_body) = streaming();
    let task = tokio::task::spawn_blocking(move || {
        let mut writer = writer;
        mux.serve_http(&mut writer, &req);
    });

    match head.await {
        Ok(head) => {
            tokio::spawn(async move {
                if let Err(err) = task.await {
                    log::error!("handler failed after the response head was sent: {err}");
                }
            });
            head.into_response(response_body)
        }
        Err(_) => {
            match task.await {
                Err(err) => log::error!("handler failed: {err}"),
                Ok(()) => log::error!("handler finished without a response head"),
            }
            (StatusCode::INTERNAL_SERVER_ERROR, "internal server error\n").into_response()
        }
    }
}
