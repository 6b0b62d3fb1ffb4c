use crate::error::ReadError;
use async_trait::async_trait;
use ethers::providers::{Middleware, MiddlewareError};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes, TransactionRequest, U256};
use std::sync::Arc;

/// Read-only view of the chain used by the prober and its callers.
#[async_trait]
pub trait ChainReader: Send + Sync {
    /// `eth_call` against `to` with raw call data.
    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, ReadError>;

    /// `eth_getCode`.
    async fn code_at(&self, address: Address) -> Result<Bytes, ReadError>;

    /// `eth_getBalance`.
    async fn balance_of(&self, address: Address) -> Result<U256, ReadError>;
}

/// [`ChainReader`] backed by an ethers middleware (normally `Provider<Http>`).
#[derive(Debug, Clone)]
pub struct EthersReader<M> {
    client: Arc<M>,
}

impl<M: Middleware + 'static> EthersReader<M> {
    pub fn new(client: Arc<M>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl<M: Middleware + 'static> ChainReader for EthersReader<M> {
    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, ReadError> {
        let tx: TypedTransaction = TransactionRequest::new().to(to).data(data).into();
        self.client.call(&tx, None).await.map_err(classify)
    }

    async fn code_at(&self, address: Address) -> Result<Bytes, ReadError> {
        self.client.get_code(address, None).await.map_err(classify)
    }

    async fn balance_of(&self, address: Address) -> Result<U256, ReadError> {
        self.client
            .get_balance(address, None)
            .await
            .map_err(classify)
    }
}

fn classify<E: MiddlewareError>(err: E) -> ReadError {
    match err.as_error_response() {
        Some(resp) if resp.code == 3 || is_revert_message(&resp.message) => {
            ReadError::Reverted(resp.message.clone())
        }
        _ => ReadError::Transport(err.to_string()),
    }
}

/// Whether a node or proxy error message describes an executed-and-reverted call.
pub fn is_revert_message(message: &str) -> bool {
    let m = message.to_ascii_lowercase();
    m.contains("revert") || m.contains("invalid opcode") || m.contains("call_exception")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::{not_self_address, ArgumentOrder, CallParams, Probe, Prober};
    use ethers::providers::{JsonRpcError, MockProvider, MockResponse, Provider};

    const GET_ADDRESS: Probe = Probe::new("getAddress", ArgumentOrder::OwnerFirst);
    const GET_CALCULATED: Probe = Probe::new("getCalculatedAddress", ArgumentOrder::OwnerFirst);

    /// Reader whose next request fails with the given JSON-RPC error.
    fn failing_reader(code: i64, message: &str) -> EthersReader<Provider<MockProvider>> {
        let (provider, mock) = Provider::mocked();
        mock.push_response(MockResponse::Error(JsonRpcError {
            code,
            message: message.to_string(),
            data: None,
        }));
        EthersReader::new(Arc::new(provider))
    }

    async fn call_error(code: i64, message: &str) -> ReadError {
        failing_reader(code, message)
            .call(Address::repeat_byte(0xfa), Bytes::from(vec![0x8c, 0xb8, 0x4e, 0x18]))
            .await
            .unwrap_err()
    }

    #[tokio::test]
    async fn code_3_is_a_revert() {
        assert!(matches!(
            call_error(3, "execution reverted: not a factory").await,
            ReadError::Reverted(_)
        ));
    }

    #[tokio::test]
    async fn server_error_with_revert_message_is_a_revert() {
        assert_eq!(
            call_error(-32000, "execution reverted").await,
            ReadError::Reverted("execution reverted".to_string())
        );
    }

    #[tokio::test]
    async fn rate_limit_is_a_transport_failure() {
        assert!(matches!(
            call_error(-32005, "rate limited").await,
            ReadError::Transport(_)
        ));
    }

    #[tokio::test]
    async fn node_revert_falls_through_to_next_candidate() {
        let prober = Prober::new(Arc::new(failing_reader(3, "execution reverted")));
        let outcome = prober
            .probe(
                Address::repeat_byte(0xfa),
                &[GET_ADDRESS],
                &CallParams::default(),
                not_self_address,
            )
            .await
            .unwrap();
        assert!(!outcome.is_accepted());
        assert_eq!(outcome.attempts.len(), 1);
    }

    #[tokio::test]
    async fn node_rate_limit_aborts_the_run() {
        let prober = Prober::new(Arc::new(failing_reader(-32005, "rate limited")));
        let err = prober
            .probe(
                Address::repeat_byte(0xfa),
                &[GET_ADDRESS, GET_CALCULATED],
                &CallParams::default(),
                not_self_address,
            )
            .await
            .unwrap_err();
        assert_eq!(err.method, "getAddress(address,uint256)");
        assert!(err.attempts.is_empty());
    }

    #[test]
    fn revert_messages_are_recognized() {
        assert!(is_revert_message("execution reverted"));
        assert!(is_revert_message("VM Exception while processing transaction: revert"));
        assert!(is_revert_message("invalid opcode: INVALID"));
        assert!(is_revert_message(
            "missing revert data (action=\"call\", code=CALL_EXCEPTION)"
        ));
    }

    #[test]
    fn transport_messages_are_not_reverts() {
        assert!(!is_revert_message("header not found"));
        assert!(!is_revert_message("Your app has exceeded its compute units per second capacity"));
        assert!(!is_revert_message("error sending request for url"));
    }
}
