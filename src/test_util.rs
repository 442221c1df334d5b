use std::sync::{Arc, Condvar, Mutex};

use bytes::Bytes;
use http::Request;

pub(crate) fn get(path: &str) -> Request<Bytes> {
    Request::get(path).body(Bytes::new()).unwrap()
}

/// 在 open 之前挡住 handler，并记录有多少个在等待
#[derive(Default)]
pub(crate) struct Gate {
    state: Mutex<GateState>,
    cond: Condvar,
}

#[derive(Default)]
struct GateState {
    waiting: usize,
    open: bool,
}

impl Gate {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn wait(&self) {
        let mut state = self.state.lock().unwrap();
        state.waiting += 1;
        self.cond.notify_all();
        while !state.open {
            state = self.cond.wait(state).unwrap();
        }
    }

    pub(crate) fn wait_for_waiters(&self, n: usize) {
        let mut state = self.state.lock().unwrap();
        while state.waiting < n {
            state = self.cond.wait(state).unwrap();
        }
    }

    pub(crate) fn open(&self) {
        self.state.lock().unwrap().open = true;
        self.cond.notify_all();
    }
}
