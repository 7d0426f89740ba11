use std::sync::{Arc, Mutex, MutexGuard};

use url::Url;

use crate::transport::{
    CoapTransport, RequestId, TransportError, TransportEventSender, TransportFactory,
};

#[derive(Debug, Clone, PartialEq)]
pub enum MockRequest {
    Get(Url),
    Post(Url, Vec<u8>),
    Observe(Url),
    Unobserve(Url),
}

#[derive(Debug, Default)]
pub struct MockState {
    pub issued: Vec<(RequestId, MockRequest)>,
    pub released: Vec<RequestId>,
    pub refuse_next: bool,
    pub refuse_open: bool,
    pub opened: usize,
    pub closed: usize,
    next_id: u64,
}

impl MockState {
    pub fn last_issued(&self) -> Option<(RequestId, MockRequest)> {
        self.issued.last().cloned()
    }
}

/// Transport that records requests instead of sending them.  Completions are injected by the
/// test straight into the plugin.
#[derive(Debug, Clone, Default)]
pub struct MockFactory {
    state: Arc<Mutex<MockState>>,
}

impl MockFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }
}

impl TransportFactory for MockFactory {
    type Transport = MockTransport;

    fn open(&mut self, events: TransportEventSender) -> Result<MockTransport, TransportError> {
        let mut state = self.state();
        if state.refuse_open {
            return Err(TransportError::Unspecified("refused to open".to_string()));
        }
        state.opened += 1;
        Ok(MockTransport {
            state: self.state.clone(),
            _events: events,
        })
    }
}

pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
    _events: TransportEventSender,
}

impl MockTransport {
    fn submit(&mut self, request: MockRequest) -> Result<RequestId, TransportError> {
        let mut state = self.state.lock().unwrap();
        if state.refuse_next {
            state.refuse_next = false;
            return Err(TransportError::Unspecified("refused".to_string()));
        }
        state.next_id += 1;
        let id = RequestId::from_raw(state.next_id);
        state.issued.push((id, request));
        Ok(id)
    }
}

impl CoapTransport for MockTransport {
    fn get(&mut self, url: &Url) -> Result<RequestId, TransportError> {
        self.submit(MockRequest::Get(url.clone()))
    }

    fn post(&mut self, url: &Url, payload: Vec<u8>) -> Result<RequestId, TransportError> {
        self.submit(MockRequest::Post(url.clone(), payload))
    }

    fn enable_notifications(&mut self, url: &Url) -> Result<RequestId, TransportError> {
        self.submit(MockRequest::Observe(url.clone()))
    }

    fn disable_notifications(&mut self, url: &Url) -> Result<RequestId, TransportError> {
        self.submit(MockRequest::Unobserve(url.clone()))
    }

    fn release(&mut self, id: RequestId) {
        self.state.lock().unwrap().released.push(id);
    }
}

impl Drop for MockTransport {
    fn drop(&mut self) {
        if let Ok(mut state) = self.state.lock() {
            state.closed += 1;
        }
    }
}
