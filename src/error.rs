use crate::probe::ProbeResult;
use ethers::types::Address;
use thiserror::Error;

/// Failure reported by a [`crate::reader::ChainReader`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReadError {
    /// The node executed the call and it reverted (unknown selector, failed require, ...).
    #[error("call reverted: {0}")]
    Reverted(String),

    /// The reader itself could not get an answer (HTTP, connection, rate limit, ...).
    #[error("transport failure: {0}")]
    Transport(String),
}

/// Per-attempt and aggregate probing errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProbeError {
    /// The call reverted or its return data could not be decoded as an address.
    #[error("interface mismatch: {0}")]
    InterfaceMismatch(String),

    /// The call succeeded but the acceptance predicate rejected its result.
    #[error("degenerate result {address:?}: {reason}")]
    DegenerateResult { address: Address, reason: String },

    /// No candidate probe produced an accepted result.
    #[error("no probe accepted after {attempts} attempt(s)")]
    ExhaustedProbes { attempts: usize },
}

impl ProbeError {
    /// Stable camelCase name used in JSON output.
    pub fn kind(&self) -> &'static str {
        match self {
            ProbeError::InterfaceMismatch(_) => "interfaceMismatch",
            ProbeError::DegenerateResult { .. } => "degenerateResult",
            ProbeError::ExhaustedProbes { .. } => "exhaustedProbes",
        }
    }
}

/// The chain reader became unavailable while probing `contract`.
///
/// Remaining probes are not attempted; `attempts` holds what was recorded before the failure.
#[derive(Debug, Clone, Error)]
#[error("transport failure while calling {method} on {contract:?}: {reason}")]
pub struct TransportError {
    pub contract: Address,
    pub method: String,
    pub reason: String,
    pub attempts: Vec<ProbeResult>,
}

impl TransportError {
    /// Transport failure outside of a probe list (e.g. `eth_getCode`).
    pub fn read(contract: Address, method: &str, err: ReadError) -> Self {
        let reason = match err {
            ReadError::Reverted(r) | ReadError::Transport(r) => r,
        };
        Self {
            contract,
            method: method.to_string(),
            reason,
            attempts: Vec::new(),
        }
    }
}
