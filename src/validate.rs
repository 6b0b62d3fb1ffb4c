use crate::error::{ProbeError, TransportError};
use crate::predict::prediction_probes;
use crate::probe::{
    accept_any, not_self_address, ArgumentOrder, CallParams, Probe, ProbeResult, Prober,
};
use crate::reader::ChainReader;
use crate::registry::{FactoryConfig, NetworkConfig};
use crate::salt::{Salt, SaltError};
use ethers::types::Address;
use std::fmt;
use std::sync::Arc;

pub const IMPLEMENTATION_PROBE: Probe = Probe::new("accountImplementation", ArgumentOrder::NoArgs);

const DEFAULT_TEST_OWNER: [u8; 20] = [
    0x12, 0x34, 0x56, 0x78, 0x90, 0x12, 0x34, 0x56, 0x78, 0x90, 0x12, 0x34, 0x56, 0x78, 0x90,
    0x12, 0x34, 0x56, 0x78, 0x90,
];

/// Owner and the two distinct salts used to exercise a factory.
#[derive(Debug, Clone)]
pub struct ValidationSettings {
    test_owner: Address,
    salts: [Salt; 2],
}

impl ValidationSettings {
    pub fn new(test_owner: Address, first: Salt, second: Salt) -> Result<Self, SaltError> {
        if first.value() == second.value() {
            return Err(SaltError::Indistinct(first.to_string()));
        }
        Ok(Self {
            test_owner,
            salts: [first, second],
        })
    }

    pub fn test_owner(&self) -> Address {
        self.test_owner
    }

    pub fn salts(&self) -> &[Salt; 2] {
        &self.salts
    }
}

impl Default for ValidationSettings {
    fn default() -> Self {
        Self {
            test_owner: Address::from(DEFAULT_TEST_OWNER),
            salts: [Salt::from(12345u64), Salt::from(67890u64)],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidReason {
    NoCode,
    NoImplementation { detail: String },
    NoPrediction { attempts: Vec<ProbeResult> },
    ConstantAddress { address: Address },
}

impl fmt::Display for InvalidReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvalidReason::NoCode => write!(f, "no contract at address"),
            InvalidReason::NoImplementation { detail } => {
                write!(f, "accountImplementation() failed: {detail}")
            }
            InvalidReason::NoPrediction { attempts } => {
                let echoed = attempts
                    .iter()
                    .any(|a| matches!(a.outcome, Err(ProbeError::DegenerateResult { .. })));
                if echoed {
                    write!(f, "factory returns its own address")
                } else if attempts.is_empty() {
                    write!(f, "no prediction method applies to the declared abi")
                } else {
                    write!(f, "address calculation failed ({} attempt(s))", attempts.len())
                }
            }
            InvalidReason::ConstantAddress { .. } => write!(f, "constant address"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Valid {
        implementation: Address,
        test_address: Address,
        method: &'static str,
    },
    Invalid(InvalidReason),
}

impl Verdict {
    pub fn is_valid(&self) -> bool {
        matches!(self, Verdict::Valid { .. })
    }
}

#[derive(Debug, Clone)]
pub struct FactoryVerdict {
    pub key: String,
    pub name: String,
    pub address: Address,
    pub verdict: Verdict,
}

/// Checks whether factories behave like working account factories. Never mutates the registry.
pub struct FactoryValidator<R: ?Sized> {
    prober: Prober<R>,
    settings: ValidationSettings,
}

impl<R: ChainReader + ?Sized> FactoryValidator<R> {
    pub fn new(reader: Arc<R>, settings: ValidationSettings) -> Self {
        Self {
            prober: Prober::new(reader),
            settings,
        }
    }

    pub async fn validate(&self, factory: &FactoryConfig) -> Result<Verdict, TransportError> {
        let address = factory.address;
        let code = self
            .prober
            .reader()
            .code_at(address)
            .await
            .map_err(|e| TransportError::read(address, "eth_getCode", e))?;
        if code.as_ref().is_empty() {
            return Ok(Verdict::Invalid(InvalidReason::NoCode));
        }

        let implementation = self
            .prober
            .probe(address, &[IMPLEMENTATION_PROBE], &CallParams::default(), accept_any)
            .await?;
        let implementation = match implementation.accepted {
            Some(accepted) => accepted.address,
            None => {
                // Single probe: its one attempt holds the reason.
                let detail = implementation
                    .attempts
                    .into_iter()
                    .find_map(|a| a.outcome.err().map(|e| e.to_string()))
                    .unwrap_or_else(|| "no result".to_string());
                return Ok(Verdict::Invalid(InvalidReason::NoImplementation { detail }));
            }
        };

        let [first_salt, second_salt] = &self.settings.salts;
        let probes = prediction_probes(factory.abi.as_ref());
        let first = self
            .prober
            .probe(address, &probes, &self.params(first_salt), not_self_address)
            .await?;
        let Some(first_accepted) = first.accepted else {
            return Ok(Verdict::Invalid(InvalidReason::NoPrediction {
                attempts: first.attempts,
            }));
        };

        // Second salt goes through the method that worked for the first one.
        let second = self
            .prober
            .probe(
                address,
                &[first_accepted.probe],
                &self.params(second_salt),
                not_self_address,
            )
            .await?;
        let Some(second_accepted) = second.accepted else {
            return Ok(Verdict::Invalid(InvalidReason::NoPrediction {
                attempts: second.attempts,
            }));
        };

        if second_accepted.address == first_accepted.address {
            return Ok(Verdict::Invalid(InvalidReason::ConstantAddress {
                address: first_accepted.address,
            }));
        }

        Ok(Verdict::Valid {
            implementation,
            test_address: first_accepted.address,
            method: first_accepted.probe.method(),
        })
    }

    /// Validate every factory of `network` in registry order.
    pub async fn validate_all(
        &self,
        network: &NetworkConfig,
    ) -> Result<Vec<FactoryVerdict>, TransportError> {
        self.validate_each(network.factories.iter()).await
    }

    pub async fn validate_each<'a, I>(&self, factories: I) -> Result<Vec<FactoryVerdict>, TransportError>
    where
        I: IntoIterator<Item = &'a FactoryConfig>,
    {
        let mut out = Vec::new();
        for factory in factories {
            let verdict = self.validate(factory).await?;
            match &verdict {
                Verdict::Valid { method, .. } => {
                    tracing::info!(factory = %factory.key, address = ?factory.address, method, "factory valid")
                }
                Verdict::Invalid(reason) => {
                    tracing::warn!(factory = %factory.key, address = ?factory.address, %reason, "factory invalid")
                }
            }
            out.push(FactoryVerdict {
                key: factory.key.clone(),
                name: factory.name.clone(),
                address: factory.address,
                verdict,
            });
        }
        Ok(out)
    }

    /// First valid factory of `network`, if any. The caller decides whether to adopt it.
    pub async fn find_working(
        &self,
        network: &NetworkConfig,
    ) -> Result<Option<FactoryVerdict>, TransportError> {
        let verdicts = self.validate_all(network).await?;
        Ok(verdicts.into_iter().find(|v| v.verdict.is_valid()))
    }

    fn params(&self, salt: &Salt) -> CallParams {
        CallParams {
            owner: self.settings.test_owner,
            salt: salt.value(),
        }
    }
}
