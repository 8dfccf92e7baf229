//! Host-library transport running against the bench.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use libwrtd::{Error, Transport};
use wrtd_proto::swap_first_word;

use crate::bench::TestBench;
use crate::mq::SharedQueue;

/// Connects the host library to one slot pair of a bench node.
///
/// Models the hardware's byte-order flip on the first header word (an
/// involution, so host-codec swap + transport swap cancel out) and pumps
/// the bench one iteration per simulated millisecond while waiting, so
/// host timeouts map onto loop iterations deterministically.
pub struct SimTransport {
    bench: Rc<RefCell<TestBench>>,
    req: SharedQueue,
    rep: SharedQueue,
}

impl SimTransport {
    /// Transport for the input personality's control pair.
    #[must_use]
    pub fn tdc(bench: &Rc<RefCell<TestBench>>) -> Self {
        let (req, rep) = {
            let b = bench.borrow();
            (b.tdc_ctl_in.clone(), b.tdc_ctl_out.clone())
        };
        Self { bench: Rc::clone(bench), req, rep }
    }

    /// Transport for the output personality's control pair.
    #[must_use]
    pub fn fd(bench: &Rc<RefCell<TestBench>>) -> Self {
        let (req, rep) = {
            let b = bench.borrow();
            (b.fd_ctl_in.clone(), b.fd_ctl_out.clone())
        };
        Self { bench: Rc::clone(bench), req, rep }
    }

    /// Receive-only transport for the input personality's log stream.
    #[must_use]
    pub fn tdc_log(bench: &Rc<RefCell<TestBench>>) -> Self {
        let log = bench.borrow().tdc_log.clone();
        Self { bench: Rc::clone(bench), req: log.clone(), rep: log }
    }

    /// Receive-only transport for the output personality's log stream.
    #[must_use]
    pub fn fd_log(bench: &Rc<RefCell<TestBench>>) -> Self {
        let log = bench.borrow().fd_log.clone();
        Self { bench: Rc::clone(bench), req: log.clone(), rep: log }
    }

    fn try_pop(&self) -> Option<Vec<u32>> {
        let mut msg = self.rep.borrow_mut().pop_front()?;
        swap_first_word(&mut msg);
        Some(msg)
    }
}

impl Transport for SimTransport {
    fn send(&mut self, words: &[u32]) -> Result<(), Error> {
        let mut msg = words.to_vec();
        swap_first_word(&mut msg);
        self.req.borrow_mut().push_back(msg);
        Ok(())
    }

    fn recv(&mut self, timeout: Duration) -> Result<Option<Vec<u32>>, Error> {
        let steps = timeout.as_millis().max(1);
        for _ in 0..steps {
            if let Some(msg) = self.try_pop() {
                return Ok(Some(msg));
            }
            self.bench.borrow_mut().step();
        }
        Ok(self.try_pop())
    }
}
