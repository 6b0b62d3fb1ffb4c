//! In-memory chain reader for unit tests.

use crate::error::ReadError;
use crate::probe::{CallParams, Probe};
use crate::reader::ChainReader;
use async_trait::async_trait;
use ethers::types::{Address, Bytes, U256};
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Clone, Debug)]
pub enum Reply {
    Address(Address),
    Raw(Vec<u8>),
    Revert(&'static str),
    Transport(&'static str),
}

/// Replies are looked up by exact call data first, then by selector. Unknown selectors
/// revert, like a contract without a fallback.
#[derive(Default)]
pub struct ScriptedReader {
    by_selector: HashMap<(Address, [u8; 4]), Reply>,
    by_call: HashMap<(Address, Vec<u8>), Reply>,
    code: HashMap<Address, Vec<u8>>,
    balances: HashMap<Address, U256>,
    transport_down: bool,
    calls: Mutex<Vec<[u8; 4]>>,
}

pub fn addr(last: u8) -> Address {
    let mut bytes = [0u8; 20];
    bytes[0] = 0x10;
    bytes[19] = last;
    Address::from(bytes)
}

impl ScriptedReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(mut self, contract: Address, probe: &Probe, reply: Reply) -> Self {
        self.by_selector.insert((contract, probe.selector()), reply);
        self
    }

    pub fn on_call(
        mut self,
        contract: Address,
        probe: &Probe,
        params: &CallParams,
        reply: Reply,
    ) -> Self {
        self.by_call
            .insert((contract, probe.encode_call(params).to_vec()), reply);
        self
    }

    pub fn with_code(mut self, address: Address) -> Self {
        self.code.insert(address, vec![0x60, 0x80, 0x60, 0x40]);
        self
    }

    pub fn with_balance(mut self, address: Address, wei: U256) -> Self {
        self.balances.insert(address, wei);
        self
    }

    pub fn transport_down(mut self) -> Self {
        self.transport_down = true;
        self
    }

    /// Selectors called so far, in order.
    pub fn calls(&self) -> Vec<[u8; 4]> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn check_transport(&self) -> Result<(), ReadError> {
        if self.transport_down {
            return Err(ReadError::Transport("connection refused".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ChainReader for ScriptedReader {
    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, ReadError> {
        let mut selector = [0u8; 4];
        selector.copy_from_slice(&data[..4]);
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(selector);
        }
        self.check_transport()?;

        let reply = self
            .by_call
            .get(&(to, data.to_vec()))
            .or_else(|| self.by_selector.get(&(to, selector)));

        match reply {
            Some(Reply::Address(a)) => {
                let mut word = vec![0u8; 12];
                word.extend_from_slice(a.as_bytes());
                Ok(Bytes::from(word))
            }
            Some(Reply::Raw(raw)) => Ok(Bytes::from(raw.clone())),
            Some(Reply::Revert(msg)) => Err(ReadError::Reverted(msg.to_string())),
            Some(Reply::Transport(msg)) => Err(ReadError::Transport(msg.to_string())),
            None => Err(ReadError::Reverted("execution reverted".to_string())),
        }
    }

    async fn code_at(&self, address: Address) -> Result<Bytes, ReadError> {
        self.check_transport()?;
        Ok(Bytes::from(self.code.get(&address).cloned().unwrap_or_default()))
    }

    async fn balance_of(&self, address: Address) -> Result<U256, ReadError> {
        self.check_transport()?;
        Ok(self.balances.get(&address).copied().unwrap_or_default())
    }
}
