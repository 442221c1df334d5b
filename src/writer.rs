//! # 响应写入模型
//!
//! [`ResponseWriter`] 是 handler 写出响应的基础接口。除基础接口外，具体的 writer
//! 可以选择性地支持以下能力，每种能力对应一个 trait 和一个探测方法：
//!
//! | 能力 | trait | 探测方法 |
//! |------|-------|----------|
//! | 连接关闭通知 | [`CloseNotifier`] | [`ResponseWriter::as_close_notifier`] |
//! | 主动 flush | [`Flusher`] | [`ResponseWriter::as_flusher`] |
//! | 接管原始连接 | [`Hijacker`] | [`ResponseWriter::as_hijacker`] |
//! | 从 reader 批量拷贝 | [`ReaderFrom`] | [`ResponseWriter::as_reader_from`] |
//! | 服务端推送 | [`Pusher`] | [`ResponseWriter::as_pusher`] |
//!
//! 探测方法默认返回 `None`，只有真正支持该能力的 writer 才会覆盖它。

use std::{fmt, io, ops::BitOr};

use bytes::Bytes;
use http::{HeaderMap, Method};
use tokio::sync::watch;

/// 基础响应写入接口
pub trait ResponseWriter {
    /// 响应头，在 `write_header` 或第一次 `write` 之前修改才会生效
    fn header(&mut self) -> &mut HeaderMap;

    /// 写出状态码
    fn write_header(&mut self, code: u16);

    /// 写出响应体，返回实际写入的字节数
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;

    fn as_close_notifier(&mut self) -> Option<&mut dyn CloseNotifier> {
        None
    }

    fn as_flusher(&mut self) -> Option<&mut dyn Flusher> {
        None
    }

    fn as_hijacker(&mut self) -> Option<&mut dyn Hijacker> {
        None
    }

    fn as_reader_from(&mut self) -> Option<&mut dyn ReaderFrom> {
        None
    }

    fn as_pusher(&mut self) -> Option<&mut dyn Pusher> {
        None
    }
}

/// 客户端断开时收到通知
pub trait CloseNotifier {
    /// 返回的 receiver 在连接关闭后变为 `true`
    fn close_notify(&mut self) -> watch::Receiver<bool>;
}

pub trait Flusher {
    fn flush(&mut self) -> io::Result<()>;
}

/// 被接管的原始连接
pub trait RawConn: io::Read + io::Write + Send {}

impl<T: io::Read + io::Write + Send> RawConn for T {}

/// hijack 的结果：原始连接，以及已经读入缓冲但尚未被消费的字节
pub struct Hijacked {
    pub conn: Box<dyn RawConn>,
    pub buffered: Bytes,
}

impl fmt::Debug for Hijacked {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hijacked").field("buffered", &self.buffered.len()).finish_non_exhaustive()
    }
}

pub trait Hijacker {
    fn hijack(&mut self) -> io::Result<Hijacked>;
}

pub trait ReaderFrom {
    /// 把 `src` 读到 EOF 并写入响应体，返回拷贝的字节数
    fn read_from(&mut self, src: &mut dyn io::Read) -> io::Result<u64>;
}

/// 服务端推送的参数
#[derive(Debug, Clone, Default)]
pub struct PushOptions {
    /// 默认为 GET
    pub method: Option<Method>,
    pub header: HeaderMap,
}

pub trait Pusher {
    fn push(&mut self, target: &str, opts: Option<&PushOptions>) -> io::Result<()>;
}

/// 一个 writer 支持的可选能力集合
///
/// 位的分配是固定的，delegate 的分派表依赖于它。
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Capabilities(u8);

impl Capabilities {
    pub const NONE: Self = Self(0);
    pub const CLOSE_NOTIFIER: Self = Self(1 << 0);
    pub const FLUSHER: Self = Self(1 << 1);
    pub const HIJACKER: Self = Self(1 << 2);
    pub const READER_FROM: Self = Self(1 << 3);
    pub const PUSHER: Self = Self(1 << 4);
    pub const ALL: Self = Self(0b1_1111);

    const NAMES: [(Self, &'static str); 5] = [
        (Self::CLOSE_NOTIFIER, "close_notifier"),
        (Self::FLUSHER, "flusher"),
        (Self::HIJACKER, "hijacker"),
        (Self::READER_FROM, "reader_from"),
        (Self::PUSHER, "pusher"),
    ];

    /// 逐项检查 writer 支持的能力
    pub fn of(w: &mut dyn ResponseWriter) -> Self {
        let mut caps = Self::NONE;
        if w.as_close_notifier().is_some() {
            caps = caps | Self::CLOSE_NOTIFIER;
        }
        if w.as_flusher().is_some() {
            caps = caps | Self::FLUSHER;
        }
        if w.as_hijacker().is_some() {
            caps = caps | Self::HIJACKER;
        }
        if w.as_reader_from().is_some() {
            caps = caps | Self::READER_FROM;
        }
        if w.as_pusher().is_some() {
            caps = caps | Self::PUSHER;
        }
        caps
    }

    /// 超出范围的位会被丢弃
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits & Self::ALL.0)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for Capabilities {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("Capabilities(none)");
        }
        let names: Vec<&str> = Self::NAMES
            .iter()
            .filter(|(cap, _)| self.contains(*cap))
            .map(|(_, name)| *name)
            .collect();
        write!(f, "Capabilities({})", names.join(" | "))
    }
}

pub(crate) fn unsupported(capability: &str) -> io::Error {
    io::Error::new(io::ErrorKind::Unsupported, format!("response writer does not support {capability}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Plain(HeaderMap);

    impl ResponseWriter for Plain {
        fn header(&mut self) -> &mut HeaderMap {
            &mut self.0
        }

        fn write_header(&mut self, _code: u16) {}

        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            Ok(buf.len())
        }
    }

    #[test]
    fn test_plain_writer_capabilities() {
        let mut w = Plain(HeaderMap::new());
        assert_eq!(Capabilities::of(&mut w), Capabilities::NONE);
    }

    #[test]
    fn test_from_bits_masks_unknown() {
        assert_eq!(Capabilities::from_bits(0xff), Capabilities::ALL);
        assert_eq!(Capabilities::from_bits(0b10).bits(), 2);
    }

    #[test]
    fn test_debug_lists_names() {
        let caps = Capabilities::FLUSHER | Capabilities::PUSHER;
        assert_eq!(format!("{caps:?}"), "Capabilities(flusher | pusher)");
        assert_eq!(format!("{:?}", Capabilities::NONE), "Capabilities(none)");
    }
}
