//! # 内存中的 ResponseWriter
//!
//! 记录 handler 写出的状态码、响应头和响应体，用于测试或在进程内调用 handler。
//! 支持 [`Flusher`]，其余可选能力均不支持。

use std::io;

use bytes::{Bytes, BytesMut};
use http::HeaderMap;

use crate::writer::{Flusher, ResponseWriter};

#[derive(Debug, Default)]
pub struct ResponseRecorder {
    code: Option<u16>,
    header: HeaderMap,
    /// `write_header` 或第一次写入时的响应头快照
    snapshot: Option<HeaderMap>,
    body: BytesMut,
    flushed: bool,
}

impl ResponseRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 已写出的状态码，未写出时为 200
    pub fn code(&self) -> u16 {
        self.code.unwrap_or(200)
    }

    pub fn wrote_header(&self) -> bool {
        self.code.is_some()
    }

    /// 写出时的响应头，之后的修改不计入
    pub fn headers(&self) -> &HeaderMap {
        self.snapshot.as_ref().unwrap_or(&self.header)
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn body_string(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn into_body(self) -> Bytes {
        self.body.freeze()
    }

    pub fn flushed(&self) -> bool {
        self.flushed
    }
}

impl ResponseWriter for ResponseRecorder {
    fn header(&mut self) -> &mut HeaderMap {
        &mut self.header
    }

    fn write_header(&mut self, code: u16) {
        if self.code.is_some() {
            log::debug!("superfluous write_header({code}), already wrote {}", self.code());
            return;
        }
        self.code = Some(code);
        self.snapshot = Some(self.header.clone());
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.code.is_none() {
            self.write_header(200);
        }
        self.body.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn as_flusher(&mut self) -> Option<&mut dyn Flusher> {
        Some(self)
    }
}

impl Flusher for ResponseRecorder {
    fn flush(&mut self) -> io::Result<()> {
        if self.code.is_none() {
            self.write_header(200);
        }
        self.flushed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::Capabilities;
    use http::HeaderValue;

    #[test]
    fn test_records_response() {
        let mut rec = ResponseRecorder::new();
        rec.header().insert("content-type", HeaderValue::from_static("text/plain"));
        rec.write(b"hello ").unwrap();
        rec.header().insert("x-late", HeaderValue::from_static("ignored"));
        rec.write(b"world").unwrap();
        assert_eq!(rec.code(), 200);
        assert_eq!(rec.body_string(), "hello world");
        assert_eq!(rec.headers().get("content-type").unwrap(), "text/plain");
        assert!(rec.headers().get("x-late").is_none());
    }

    #[test]
    fn test_first_write_header_wins() {
        let mut rec = ResponseRecorder::new();
        rec.write_header(418);
        rec.write_header(200);
        assert_eq!(rec.code(), 418);
    }

    #[test]
    fn test_flush_capability() {
        let mut rec = ResponseRecorder::new();
        assert_eq!(Capabilities::of(&mut rec), Capabilities::FLUSHER);
        rec.as_flusher().unwrap().flush().unwrap();
        assert!(rec.flushed());
        assert!(rec.wrote_header());
    }
}
