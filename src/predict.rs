use crate::error::{ReadError, TransportError};
use crate::probe::{not_self_address, ArgumentOrder, CallParams, Probe, ProbeOutcome, Prober};
use crate::reader::ChainReader;
use crate::registry::{FactoryConfig, NetworkConfig};
use crate::salt::Salt;
use ethers::abi::Abi;
use ethers::types::{Address, U256};
use futures::stream::{self, StreamExt};
use std::sync::Arc;

/// Known ways account factories expose counterfactual addresses, in the order they are tried.
pub const PREDICTION_PROBES: [Probe; 4] = [
    Probe::new("getCalculatedAddress", ArgumentOrder::OwnerFirst),
    Probe::new("getAddress", ArgumentOrder::OwnerFirst),
    Probe::new("getAddress", ArgumentOrder::SaltFirst),
    // Kernel-style factories call the salt an index.
    Probe::new("getAccountAddress", ArgumentOrder::OwnerFirst),
];

/// The prediction probes a factory's declared ABI supports; all of them if nothing is declared.
pub fn prediction_probes(declared: Option<&Abi>) -> Vec<Probe> {
    match declared {
        Some(abi) => PREDICTION_PROBES
            .iter()
            .copied()
            .filter(|p| p.is_applicable(abi))
            .collect(),
        None => PREDICTION_PROBES.to_vec(),
    }
}

/// `EntryPoint.balanceOf(address)`: the account's prefunded gas deposit.
const DEPOSIT_OF: Probe = Probe::new("balanceOf", ArgumentOrder::SingleArg);

/// Prediction plus on-chain state of the predicted account.
#[derive(Debug, Clone)]
pub struct AccountInfo {
    pub owner: Address,
    pub salt: Salt,
    pub outcome: ProbeOutcome,
    /// `None` unless a prediction was accepted.
    pub deployed: Option<bool>,
    pub balance: Option<U256>,
    /// EntryPoint deposit. `None` without a prediction, without an EntryPoint, or when the
    /// EntryPoint call reverts.
    pub deposit: Option<U256>,
}

pub struct AddressPredictor<R: ?Sized> {
    prober: Prober<R>,
    factory: Address,
    probes: Vec<Probe>,
    entry_point: Option<Address>,
}

impl<R: ChainReader + ?Sized> AddressPredictor<R> {
    pub fn new(reader: Arc<R>, factory: &FactoryConfig) -> Self {
        Self::with_probes(reader, factory.address, prediction_probes(factory.abi.as_ref()))
    }

    pub fn with_probes(reader: Arc<R>, factory: Address, probes: Vec<Probe>) -> Self {
        Self {
            prober: Prober::new(reader),
            factory,
            probes,
            entry_point: None,
        }
    }

    /// EntryPoint queried for the account's deposit in [`Self::account_info`].
    pub fn with_entry_point(mut self, entry_point: Address) -> Self {
        self.entry_point = Some(entry_point);
        self
    }

    pub fn factory(&self) -> Address {
        self.factory
    }

    pub fn probes(&self) -> &[Probe] {
        &self.probes
    }

    pub async fn predict(&self, owner: Address, salt: &Salt) -> Result<ProbeOutcome, TransportError> {
        let params = CallParams {
            owner,
            salt: salt.value(),
        };
        let outcome = self
            .prober
            .probe(self.factory, &self.probes, &params, not_self_address)
            .await?;

        match outcome.accepted {
            Some(accepted) => tracing::info!(
                factory = ?self.factory,
                owner = ?owner,
                salt = %salt,
                method = accepted.probe.method(),
                predicted = ?accepted.address,
                "address predicted"
            ),
            None => tracing::warn!(
                factory = ?self.factory,
                owner = ?owner,
                salt = %salt,
                attempts = outcome.attempts.len(),
                "no prediction method accepted"
            ),
        }

        Ok(outcome)
    }

    pub async fn account_info(&self, owner: Address, salt: &Salt) -> Result<AccountInfo, TransportError> {
        let outcome = self.predict(owner, salt).await?;

        let (deployed, balance, deposit) = match outcome.address() {
            Some(account) => {
                let reader = self.prober.reader();
                let code = reader
                    .code_at(account)
                    .await
                    .map_err(|e| TransportError::read(account, "eth_getCode", e))?;
                let balance = reader
                    .balance_of(account)
                    .await
                    .map_err(|e| TransportError::read(account, "eth_getBalance", e))?;
                let deposit = match self.entry_point {
                    Some(entry_point) => self.deposit_of(entry_point, account).await?,
                    None => None,
                };
                (Some(!code.as_ref().is_empty()), Some(balance), deposit)
            }
            None => (None, None, None),
        };

        Ok(AccountInfo {
            owner,
            salt: salt.clone(),
            outcome,
            deployed,
            balance,
            deposit,
        })
    }

    async fn deposit_of(
        &self,
        entry_point: Address,
        account: Address,
    ) -> Result<Option<U256>, TransportError> {
        let params = CallParams {
            owner: account,
            salt: U256::zero(),
        };
        let returned = match self
            .prober
            .reader()
            .call(entry_point, DEPOSIT_OF.encode_call(&params))
            .await
        {
            Ok(bytes) => bytes,
            Err(ReadError::Reverted(reason)) => {
                tracing::warn!(entry_point = ?entry_point, account = ?account, %reason, "entryPoint deposit lookup reverted");
                return Ok(None);
            }
            Err(e) => return Err(TransportError::read(entry_point, "balanceOf(address)", e)),
        };

        if returned.len() < 32 {
            tracing::warn!(entry_point = ?entry_point, len = returned.len(), "entryPoint deposit not a uint256 word");
            return Ok(None);
        }
        Ok(Some(U256::from_big_endian(&returned[..32])))
    }
}

/// One factory's prediction for a shared `(owner, salt)`.
#[derive(Debug, Clone)]
pub struct FactoryPrediction {
    pub key: String,
    pub name: String,
    pub factory: Address,
    pub outcome: Result<ProbeOutcome, TransportError>,
}

/// Predict the same `(owner, salt)` against every factory of `network`.
///
/// Factories are probed concurrently (at most `concurrency` at once); results keep registry
/// order. A transport failure is reported per factory.
pub async fn compare_factories<R: ChainReader + ?Sized>(
    reader: Arc<R>,
    network: &NetworkConfig,
    owner: Address,
    salt: &Salt,
    concurrency: usize,
) -> Vec<FactoryPrediction> {
    stream::iter(network.factories.iter())
        .map(|factory| {
            let predictor = AddressPredictor::new(reader.clone(), factory);
            async move {
                FactoryPrediction {
                    key: factory.key.clone(),
                    name: factory.name.clone(),
                    factory: factory.address,
                    outcome: predictor.predict(owner, salt).await,
                }
            }
        })
        .buffered(concurrency.max(1))
        .collect()
        .await
}
