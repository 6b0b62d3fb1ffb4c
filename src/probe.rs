//! Best-effort capability probing.
//!
//! A [`Prober`] tries a fixed, ordered list of read-only call shapes against a contract whose
//! exact interface is unknown and reports the first result that passes an acceptance
//! predicate. Reverts and undecodable returns fall through to the next candidate; a dead
//! transport aborts the whole run.

use crate::error::{ProbeError, ReadError, TransportError};
use crate::reader::ChainReader;
use ethers::abi::{Abi, ParamType, Token};
use ethers::types::{Address, Bytes, U256};
use std::fmt;
use std::sync::Arc;

/// How the `(owner, salt)` call parameters are laid out for a probe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ArgumentOrder {
    /// `(address owner, uint256 salt)`
    OwnerFirst,
    /// `(uint256 salt, address owner)`
    SaltFirst,
    /// `(address owner)`
    SingleArg,
    /// `()`
    NoArgs,
}

impl ArgumentOrder {
    pub fn param_types(self) -> Vec<ParamType> {
        match self {
            ArgumentOrder::OwnerFirst => vec![ParamType::Address, ParamType::Uint(256)],
            ArgumentOrder::SaltFirst => vec![ParamType::Uint(256), ParamType::Address],
            ArgumentOrder::SingleArg => vec![ParamType::Address],
            ArgumentOrder::NoArgs => vec![],
        }
    }

    fn tokens(self, params: &CallParams) -> Vec<Token> {
        let owner = Token::Address(params.owner);
        let salt = Token::Uint(params.salt);
        match self {
            ArgumentOrder::OwnerFirst => vec![owner, salt],
            ArgumentOrder::SaltFirst => vec![salt, owner],
            ArgumentOrder::SingleArg => vec![owner],
            ArgumentOrder::NoArgs => vec![],
        }
    }
}

/// Parameters shared by every probe of one run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CallParams {
    pub owner: Address,
    pub salt: U256,
}

/// One candidate call shape. Every probe returns a single `address`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Probe {
    method: &'static str,
    order: ArgumentOrder,
}

impl Probe {
    pub const fn new(method: &'static str, order: ArgumentOrder) -> Self {
        Self { method, order }
    }

    pub fn method(&self) -> &'static str {
        self.method
    }

    pub fn order(&self) -> ArgumentOrder {
        self.order
    }

    /// Canonical signature, e.g. `getAddress(address,uint256)`.
    pub fn signature(&self) -> String {
        let types: Vec<String> = self
            .order
            .param_types()
            .iter()
            .map(ToString::to_string)
            .collect();
        format!("{}({})", self.method, types.join(","))
    }

    pub fn selector(&self) -> [u8; 4] {
        ethers::utils::id(self.signature())
    }

    pub fn encode_call(&self, params: &CallParams) -> Bytes {
        let mut data = self.selector().to_vec();
        data.extend(ethers::abi::encode(&self.order.tokens(params)));
        Bytes::from(data)
    }

    /// Decode the first return word as an address. The word must be left-padded with zeros.
    pub fn decode_result(&self, returned: &[u8]) -> Result<Address, ProbeError> {
        if returned.len() < 32 {
            return Err(ProbeError::InterfaceMismatch(format!(
                "{} returned {} byte(s), expected a 32-byte address word",
                self.method,
                returned.len()
            )));
        }
        if returned[..12].iter().any(|b| *b != 0) {
            return Err(ProbeError::InterfaceMismatch(format!(
                "{} returned a word that is not a left-padded address",
                self.method
            )));
        }
        Ok(Address::from_slice(&returned[12..32]))
    }

    /// Whether a declared ABI has a function with this name and exactly these input types.
    pub fn is_applicable(&self, abi: &Abi) -> bool {
        let expected = self.order.param_types();
        abi.functions_by_name(self.method)
            .map(|functions| {
                functions
                    .iter()
                    .any(|f| f.inputs.iter().map(|p| &p.kind).eq(expected.iter()))
            })
            .unwrap_or(false)
    }
}

impl fmt::Display for Probe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.signature())
    }
}

/// Verdict of an acceptance predicate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Acceptance {
    Accept,
    Reject(String),
}

/// Default predicate: reject a result that echoes the probed contract's own address.
///
/// Several factories return their own address when called through a binding whose argument
/// encoding does not match theirs. `Address` equality is byte-wise, so hex case is irrelevant.
pub fn not_self_address(result: Address, contract: Address) -> Acceptance {
    if result == contract {
        Acceptance::Reject("returned the contract's own address".to_string())
    } else {
        Acceptance::Accept
    }
}

/// Accept any decodable address.
pub fn accept_any(_result: Address, _contract: Address) -> Acceptance {
    Acceptance::Accept
}

/// Record of a single attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProbeResult {
    pub probe: Probe,
    pub outcome: Result<Address, ProbeError>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AcceptedProbe {
    pub address: Address,
    pub probe: Probe,
}

/// Aggregate result of a probing run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub contract: Address,
    pub accepted: Option<AcceptedProbe>,
    pub attempts: Vec<ProbeResult>,
}

impl ProbeOutcome {
    pub fn is_accepted(&self) -> bool {
        self.accepted.is_some()
    }

    pub fn address(&self) -> Option<Address> {
        self.accepted.map(|a| a.address)
    }

    pub fn method_used(&self) -> Option<&'static str> {
        self.accepted.map(|a| a.probe.method())
    }

    /// True if at least one attempt was rejected by the acceptance predicate.
    pub fn saw_degenerate_result(&self) -> bool {
        self.attempts
            .iter()
            .any(|a| matches!(a.outcome, Err(ProbeError::DegenerateResult { .. })))
    }

    pub fn into_result(self) -> Result<AcceptedProbe, ProbeError> {
        self.accepted.ok_or(ProbeError::ExhaustedProbes {
            attempts: self.attempts.len(),
        })
    }
}

/// Runs candidate probes against a contract through a [`ChainReader`].
pub struct Prober<R: ?Sized> {
    reader: Arc<R>,
}

impl<R: ?Sized> Clone for Prober<R> {
    fn clone(&self) -> Self {
        Self {
            reader: self.reader.clone(),
        }
    }
}

impl<R: ChainReader + ?Sized> Prober<R> {
    pub fn new(reader: Arc<R>) -> Self {
        Self { reader }
    }

    pub fn reader(&self) -> &Arc<R> {
        &self.reader
    }

    /// Try `candidates` in order; the first result passing `accept` wins.
    ///
    /// Calls are issued one at a time. Dropping the returned future between attempts has no
    /// side effects.
    pub async fn probe<F>(
        &self,
        contract: Address,
        candidates: &[Probe],
        params: &CallParams,
        accept: F,
    ) -> Result<ProbeOutcome, TransportError>
    where
        F: Fn(Address, Address) -> Acceptance,
    {
        let mut attempts = Vec::with_capacity(candidates.len());

        for probe in candidates {
            tracing::debug!(contract = ?contract, method = probe.method(), order = ?probe.order(), "probing");

            let returned = match self.reader.call(contract, probe.encode_call(params)).await {
                Ok(bytes) => bytes,
                Err(ReadError::Reverted(reason)) => {
                    tracing::debug!(contract = ?contract, method = probe.method(), %reason, "probe reverted");
                    attempts.push(ProbeResult {
                        probe: *probe,
                        outcome: Err(ProbeError::InterfaceMismatch(reason)),
                    });
                    continue;
                }
                Err(ReadError::Transport(reason)) => {
                    tracing::warn!(contract = ?contract, method = probe.method(), %reason, "transport failure; aborting probe run");
                    return Err(TransportError {
                        contract,
                        method: probe.signature(),
                        reason,
                        attempts,
                    });
                }
            };

            let address = match probe.decode_result(returned.as_ref()) {
                Ok(address) => address,
                Err(err) => {
                    tracing::debug!(contract = ?contract, method = probe.method(), error = %err, "probe result undecodable");
                    attempts.push(ProbeResult {
                        probe: *probe,
                        outcome: Err(err),
                    });
                    continue;
                }
            };

            match accept(address, contract) {
                Acceptance::Accept => {
                    tracing::debug!(contract = ?contract, method = probe.method(), result = ?address, "probe accepted");
                    attempts.push(ProbeResult {
                        probe: *probe,
                        outcome: Ok(address),
                    });
                    return Ok(ProbeOutcome {
                        contract,
                        accepted: Some(AcceptedProbe {
                            address,
                            probe: *probe,
                        }),
                        attempts,
                    });
                }
                Acceptance::Reject(reason) => {
                    tracing::debug!(contract = ?contract, method = probe.method(), result = ?address, %reason, "probe result rejected");
                    attempts.push(ProbeResult {
                        probe: *probe,
                        outcome: Err(ProbeError::DegenerateResult { address, reason }),
                    });
                }
            }
        }

        Ok(ProbeOutcome {
            contract,
            accepted: None,
            attempts,
        })
    }
}
