//! In-memory transport for tests.
//!
//! Devices, failures and notifications are scripted from the test; every
//! connection shares one state cell with the transport that created it.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use std::time::Duration;

use tokio::sync::mpsc;
use uuid::Uuid;

use super::{Connection, DeviceDescriptor, NotificationReceiver, Transport};
use crate::error::TransportError;

#[derive(Default)]
struct MockState {
    devices: Vec<DeviceDescriptor>,
    fail_discover: bool,
    fail_connect: HashSet<String>,
    fail_subscribe: HashSet<String>,
    senders: HashMap<String, mpsc::UnboundedSender<Vec<u8>>>,
    connected: Vec<String>,
    disconnected: Vec<String>,
}

#[derive(Clone, Default)]
pub struct MockTransport {
    state: Rc<RefCell<MockState>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transport whose discovery returns `(name, address)` pairs.
    pub fn with_devices(devices: &[(&str, &str)]) -> Self {
        let transport = Self::new();
        transport.state.borrow_mut().devices = devices
            .iter()
            .map(|(name, address)| DeviceDescriptor {
                name: Some(name.to_string()),
                address: address.to_string(),
            })
            .collect();
        transport
    }

    pub fn fail_discover(&self) {
        self.state.borrow_mut().fail_discover = true;
    }

    pub fn fail_connect(&self, address: &str) {
        self.state.borrow_mut().fail_connect.insert(address.to_string());
    }

    pub fn fail_subscribe(&self, address: &str) {
        self.state.borrow_mut().fail_subscribe.insert(address.to_string());
    }

    /// Deliver a notification to the subscriber of `address`.
    pub fn notify(&self, address: &str, payload: &[u8]) -> bool {
        match self.state.borrow().senders.get(address) {
            Some(tx) => tx.send(payload.to_vec()).is_ok(),
            None => false,
        }
    }

    /// Simulate the device going out of range.
    pub fn drop_link(&self, address: &str) {
        self.state.borrow_mut().senders.remove(address);
    }

    pub fn connected(&self) -> Vec<String> {
        self.state.borrow().connected.clone()
    }

    pub fn disconnected(&self) -> Vec<String> {
        self.state.borrow().disconnected.clone()
    }
}

impl Transport for MockTransport {
    type Connection = MockConnection;

    async fn discover(&self, _timeout: Duration) -> Result<Vec<DeviceDescriptor>, TransportError> {
        let state = self.state.borrow();
        if state.fail_discover {
            return Err(TransportError::Rejected("adapter unavailable".into()));
        }
        Ok(state.devices.clone())
    }

    async fn connect(&self, address: &str) -> Result<MockConnection, TransportError> {
        let mut state = self.state.borrow_mut();
        if state.fail_connect.contains(address) {
            return Err(TransportError::Rejected(format!("{address} refused")));
        }
        state.connected.push(address.to_string());
        Ok(MockConnection {
            address: address.to_string(),
            state: Rc::clone(&self.state),
        })
    }
}

pub struct MockConnection {
    address: String,
    state: Rc<RefCell<MockState>>,
}

impl Connection for MockConnection {
    fn address(&self) -> &str {
        &self.address
    }

    async fn subscribe(&mut self, characteristic: Uuid) -> Result<NotificationReceiver, TransportError> {
        let mut state = self.state.borrow_mut();
        if state.fail_subscribe.contains(&self.address) {
            return Err(TransportError::CharacteristicNotFound(characteristic));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        state.senders.insert(self.address.clone(), tx);
        Ok(rx)
    }

    async fn unsubscribe(&mut self, _characteristic: Uuid) -> Result<(), TransportError> {
        self.state.borrow_mut().senders.remove(&self.address);
        Ok(())
    }

    async fn disconnect(self) -> Result<(), TransportError> {
        let mut state = self.state.borrow_mut();
        state.senders.remove(&self.address);
        state.disconnected.push(self.address.clone());
        Ok(())
    }
}
