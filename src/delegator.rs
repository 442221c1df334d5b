//! # ResponseWriter delegate
//!
//! 记录状态码和写出的字节数。delegate 对外暴露的可选能力必须和被包装的 writer
//! 完全一致：如果一个 wrapper 声称支持所有能力，下游检查 [`Flusher`] 时就会得到错误的结果。
//! 所以只检查一次 writer 的能力，再从表里挑出 32 个具体 wrapper 类型之一，
//! 每个类型只实现对应的能力子集。

use std::io;

use http::HeaderMap;
use tokio::sync::watch;

use crate::writer::{
    Capabilities, CloseNotifier, Flusher, Hijacked, Hijacker, PushOptions, Pusher, ReaderFrom, ResponseWriter,
    unsupported,
};

const DEFAULT_STATUS: u16 = 200;

/// 记住经过它的状态码和字节数的 [`ResponseWriter`]
pub trait Delegator: ResponseWriter {
    /// 第一次写入的最终状态码，没写过则为 200
    fn status(&self) -> u16;

    /// 写出的 body 字节总数，包含 read_from 拷贝的部分
    fn written(&self) -> u64;

    fn as_writer(&mut self) -> &mut dyn ResponseWriter;
}

/// 按 `w` 的能力挑选对应的 delegate 包装它
pub fn delegate<'a>(w: &'a mut dyn ResponseWriter) -> Box<dyn Delegator + 'a> {
    let caps = Capabilities::of(w);
    PICK_DELEGATOR[caps.bits() as usize](ResponseWriterDelegator::new(w))
}

struct ResponseWriterDelegator<'a> {
    inner: &'a mut dyn ResponseWriter,
    status: u16,
    wrote_header: bool,
    written: u64,
}

impl<'a> ResponseWriterDelegator<'a> {
    fn new(inner: &'a mut dyn ResponseWriter) -> Self {
        Self {
            inner,
            status: DEFAULT_STATUS,
            wrote_header: false,
            written: 0,
        }
    }

    fn forward_close_notify(&mut self) -> watch::Receiver<bool> {
        match self.inner.as_close_notifier() {
            Some(notifier) => notifier.close_notify(),
            // 不会触发
            None => watch::channel(false).1,
        }
    }

    fn forward_flush(&mut self) -> io::Result<()> {
        self.inner.as_flusher().ok_or_else(|| unsupported("flush"))?.flush()
    }

    fn forward_hijack(&mut self) -> io::Result<Hijacked> {
        self.inner.as_hijacker().ok_or_else(|| unsupported("hijack"))?.hijack()
    }

    fn forward_read_from(&mut self, src: &mut dyn io::Read) -> io::Result<u64> {
        self.wrote_header = true;
        let n = self
            .inner
            .as_reader_from()
            .ok_or_else(|| unsupported("read_from"))?
            .read_from(src)?;
        self.written += n;
        Ok(n)
    }

    fn forward_push(&mut self, target: &str, opts: Option<&PushOptions>) -> io::Result<()> {
        self.inner.as_pusher().ok_or_else(|| unsupported("push"))?.push(target, opts)
    }
}

impl ResponseWriter for ResponseWriterDelegator<'_> {
    fn header(&mut self) -> &mut HeaderMap {
        self.inner.header()
    }

    fn write_header(&mut self, code: u16) {
        // 101 以外的 1xx 是临时响应，最终状态码还没到
        let interim = (100..200).contains(&code) && code != 101;
        if !self.wrote_header && !interim {
            self.status = code;
            self.wrote_header = true;
        }
        self.inner.write_header(code);
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.wrote_header = true;
        let n = self.inner.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }
}

impl Delegator for ResponseWriterDelegator<'_> {
    fn status(&self) -> u16 {
        self.status
    }

    fn written(&self) -> u64 {
        self.written
    }

    fn as_writer(&mut self) -> &mut dyn ResponseWriter {
        self
    }
}

type PickFn = for<'a> fn(ResponseWriterDelegator<'a>) -> Box<dyn Delegator + 'a>;

fn pick_base<'a>(d: ResponseWriterDelegator<'a>) -> Box<dyn Delegator + 'a> {
    Box::new(d)
}

macro_rules! delegators {
    (@bit close_notifier) => { Capabilities::CLOSE_NOTIFIER.bits() as usize };
    (@bit flusher) => { Capabilities::FLUSHER.bits() as usize };
    (@bit hijacker) => { Capabilities::HIJACKER.bits() as usize };
    (@bit reader_from) => { Capabilities::READER_FROM.bits() as usize };
    (@bit pusher) => { Capabilities::PUSHER.bits() as usize };

    (@accessor close_notifier) => {
        fn as_close_notifier(&mut self) -> Option<&mut dyn CloseNotifier> {
            Some(self)
        }
    };
    (@accessor flusher) => {
        fn as_flusher(&mut self) -> Option<&mut dyn Flusher> {
            Some(self)
        }
    };
    (@accessor hijacker) => {
        fn as_hijacker(&mut self) -> Option<&mut dyn Hijacker> {
            Some(self)
        }
    };
    (@accessor reader_from) => {
        fn as_reader_from(&mut self) -> Option<&mut dyn ReaderFrom> {
            Some(self)
        }
    };
    (@accessor pusher) => {
        fn as_pusher(&mut self) -> Option<&mut dyn Pusher> {
            Some(self)
        }
    };

    (@forward $name:ident close_notifier) => {
        impl CloseNotifier for $name<'_> {
            fn close_notify(&mut self) -> watch::Receiver<bool> {
                self.0.forward_close_notify()
            }
        }
    };
    (@forward $name:ident flusher) => {
        impl Flusher for $name<'_> {
            fn flush(&mut self) -> io::Result<()> {
                self.0.forward_flush()
            }
        }
    };
    (@forward $name:ident hijacker) => {
        impl Hijacker for $name<'_> {
            fn hijack(&mut self) -> io::Result<Hijacked> {
                self.0.forward_hijack()
            }
        }
    };
    (@forward $name:ident reader_from) => {
        impl ReaderFrom for $name<'_> {
            fn read_from(&mut self, src: &mut dyn io::Read) -> io::Result<u64> {
                self.0.forward_read_from(src)
            }
        }
    };
    (@forward $name:ident pusher) => {
        impl Pusher for $name<'_> {
            fn push(&mut self, target: &str, opts: Option<&PushOptions>) -> io::Result<()> {
                self.0.forward_push(target, opts)
            }
        }
    };

    ($($name:ident => [$($cap:ident),+]),+ $(,)?) => {
        $(
            struct $name<'a>(ResponseWriterDelegator<'a>);

            impl ResponseWriter for $name<'_> {
                fn header(&mut self) -> &mut HeaderMap {
                    self.0.header()
                }

                fn write_header(&mut self, code: u16) {
                    self.0.write_header(code)
                }

                fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
                    self.0.write(buf)
                }

                $(delegators!(@accessor $cap);)+
            }

            impl Delegator for $name<'_> {
                fn status(&self) -> u16 {
                    self.0.status
                }

                fn written(&self) -> u64 {
                    self.0.written
                }

                fn as_writer(&mut self) -> &mut dyn ResponseWriter {
                    self
                }
            }

            $(delegators!(@forward $name $cap);)+
        )+

        static PICK_DELEGATOR: [PickFn; 32] = {
            let mut table = [pick_base as PickFn; 32];
            $(
                table[0 $(| delegators!(@bit $cap))+] = {
                    fn pick<'a>(d: ResponseWriterDelegator<'a>) -> Box<dyn Delegator + 'a> {
                        Box::new($name(d))
                    }
                    pick as PickFn
                };
            )+
            table
        };
    };
}

delegators! {
    CloseNotify => [close_notifier],
    Flush => [flusher],
    FlushCloseNotify => [flusher, close_notifier],
    Hijack => [hijacker],
    HijackCloseNotify => [hijacker, close_notifier],
    HijackFlush => [hijacker, flusher],
    HijackFlushCloseNotify => [hijacker, flusher, close_notifier],
    ReadFrom => [reader_from],
    ReadFromCloseNotify => [reader_from, close_notifier],
    ReadFromFlush => [reader_from, flusher],
    ReadFromFlushCloseNotify => [reader_from, flusher, close_notifier],
    ReadFromHijack => [reader_from, hijacker],
    ReadFromHijackCloseNotify => [reader_from, hijacker, close_notifier],
    ReadFromHijackFlush => [reader_from, hijacker, flusher],
    ReadFromHijackFlushCloseNotify => [reader_from, hijacker, flusher, close_notifier],
    Push => [pusher],
    PushCloseNotify => [pusher, close_notifier],
    PushFlush => [pusher, flusher],
    PushFlushCloseNotify => [pusher, flusher, close_notifier],
    PushHijack => [pusher, hijacker],
    PushHijackCloseNotify => [pusher, hijacker, close_notifier],
    PushHijackFlush => [pusher, hijacker, flusher],
    PushHijackFlushCloseNotify => [pusher, hijacker, flusher, close_notifier],
    PushReadFrom => [pusher, reader_from],
    PushReadFromCloseNotify => [pusher, reader_from, close_notifier],
    PushReadFromFlush => [pusher, reader_from, flusher],
    PushReadFromFlushCloseNotify => [pusher, reader_from, flusher, close_notifier],
    PushReadFromHijack => [pusher, reader_from, hijacker],
    PushReadFromHijackCloseNotify => [pusher, reader_from, hijacker, close_notifier],
    PushReadFromHijackFlush => [pusher, reader_from, hijacker, flusher],
    PushReadFromHijackFlushCloseNotify => [pusher, reader_from, hijacker, flusher, close_notifier],
}
