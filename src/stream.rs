//! # 流式 ResponseWriter
//!
//! writer 和 handler 一起运行在 blocking 线程上，body 交给 transport。状态码和响应头
//! 提交时通过 oneshot 发出，响应体分块通过有界 mpsc 发出。transport 丢弃 body
//! （客户端断开或响应结束）时触发 close notify。

use std::{io, mem};

use axum::{body::Body, response::Response};
use bytes::{Bytes, BytesMut};
use http::{HeaderMap, StatusCode};
use tokio::sync::{mpsc, oneshot, watch};

use crate::writer::{CloseNotifier, Flusher, ReaderFrom, ResponseWriter};

const CHUNK_SIZE: usize = 32 * 1024;
const CHANNEL_CAPACITY: usize = 16;

/// 状态码和响应头，只发送一次
#[derive(Debug)]
pub(crate) struct Head {
    status: u16,
    headers: HeaderMap,
}

impl Head {
    pub(crate) fn into_response(self, body: Body) -> Response {
        let mut response = Response::new(body);
        *response.status_mut() = StatusCode::from_u16(self.status).unwrap_or_else(|_| {
            log::warn!("handler wrote invalid status {}", self.status);
            StatusCode::INTERNAL_SERVER_ERROR
        });
        *response.headers_mut() = self.headers;
        response
    }
}

/// 支持 flush、read_from 和 close notify
///
/// 必须在 blocking 线程上使用：发送会等待 transport 取走之前的分块。
pub struct StreamingResponseWriter {
    header: HeaderMap,
    head: Option<oneshot::Sender<Head>>,
    buf: BytesMut,
    chunks: mpsc::Sender<Bytes>,
    /// handler panic 时中止响应体，不占用分块通道的容量
    abort: Option<oneshot::Sender<io::Error>>,
    closed: watch::Receiver<bool>,
}

/// body 的生命周期决定 close notify 的时机
struct BodyState {
    chunks: mpsc::Receiver<Bytes>,
    abort: oneshot::Receiver<io::Error>,
    closed: watch::Sender<bool>,
    done: bool,
}

impl BodyState {
    /// 分块发完后，如果 writer 留下了中止错误，再以错误结束
    async fn next(&mut self) -> Option<io::Result<Bytes>> {
        if self.done {
            return None;
        }
        match self.chunks.recv().await {
            Some(chunk) => Some(Ok(chunk)),
            None => {
                self.done = true;
                self.abort.try_recv().ok().map(Err)
            }
        }
    }
}

impl Drop for BodyState {
    fn drop(&mut self) {
        self.closed.send_replace(true);
    }
}

pub(crate) fn streaming() -> (StreamingResponseWriter, oneshot::Receiver<Head>, Body) {
    let (head_tx, head_rx) = oneshot::channel();
    let (chunks_tx, chunks_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (abort_tx, abort_rx) = oneshot::channel();
    let (closed_tx, closed_rx) = watch::channel(false);
    let state = BodyState {
        chunks: chunks_rx,
        abort: abort_rx,
        closed: closed_tx,
        done: false,
    };
    let body = Body::from_stream(futures_util::stream::unfold(state, |mut state| async move {
        state.next().await.map(|item| (item, state))
    }));
    let writer = StreamingResponseWriter {
        header: HeaderMap::new(),
        head: Some(head_tx),
        buf: BytesMut::new(),
        chunks: chunks_tx,
        abort: Some(abort_tx),
        closed: closed_rx,
    };
    (writer, head_rx, body)
}

impl StreamingResponseWriter {
    fn commit(&mut self, status: u16) {
        if let Some(tx) = self.head.take() {
            let head = Head {
                status,
                headers: mem::take(&mut self.header),
            };
            if tx.send(head).is_err() {
                log::debug!("response dropped before head was sent");
            }
        }
    }

    fn send(&self, chunk: Bytes) -> io::Result<()> {
        self.chunks
            .blocking_send(chunk)
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "response body dropped"))
    }

    fn send_buffered(&mut self) -> io::Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let chunk = self.buf.split().freeze();
        self.send(chunk)
    }
}

impl ResponseWriter for StreamingResponseWriter {
    fn header(&mut self) -> &mut HeaderMap {
        &mut self.header
    }

    fn write_header(&mut self, code: u16) {
        if self.head.is_none() {
            log::debug!("superfluous write_header({code})");
            return;
        }
        if (100..200).contains(&code) && code != 101 {
            log::debug!("interim status {code} not forwarded");
            return;
        }
        self.commit(code);
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.commit(200);
        self.buf.extend_from_slice(buf);
        if self.buf.len() >= CHUNK_SIZE {
            self.send_buffered()?;
        }
        Ok(buf.len())
    }

    fn as_close_notifier(&mut self) -> Option<&mut dyn CloseNotifier> {
        Some(self)
    }

    fn as_flusher(&mut self) -> Option<&mut dyn Flusher> {
        Some(self)
    }

    fn as_reader_from(&mut self) -> Option<&mut dyn ReaderFrom> {
        Some(self)
    }
}

impl CloseNotifier for StreamingResponseWriter {
    fn close_notify(&mut self) -> watch::Receiver<bool> {
        self.closed.clone()
    }
}

impl Flusher for StreamingResponseWriter {
    fn flush(&mut self) -> io::Result<()> {
        self.commit(200);
        self.send_buffered()
    }
}

impl ReaderFrom for StreamingResponseWriter {
    fn read_from(&mut self, src: &mut dyn io::Read) -> io::Result<u64> {
        self.commit(200);
        self.send_buffered()?;
        let mut chunk = vec![0u8; CHUNK_SIZE];
        let mut total = 0u64;
        loop {
            let n = match src.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => n,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            };
            self.send(Bytes::copy_from_slice(&chunk[..n]))?;
            total += n as u64;
        }
        Ok(total)
    }
}

impl Drop for StreamingResponseWriter {
    fn drop(&mut self) {
        if std::thread::panicking() {
            // 未提交的 head 变成 500，已提交的则中止响应体
            if self.head.is_none() {
                if let Some(abort) = self.abort.take() {
                    let _ = abort.send(io::Error::other("handler panicked"));
                }
            }
            return;
        }
        self.commit(200);
        if let Err(err) = self.send_buffered() {
            log::debug!("finish response body: {err}");
        }
    }
}
