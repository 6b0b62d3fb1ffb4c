use crate::encoding::{fmt_address, fmt_bytes, parse_bytes, parse_u256_quantity};
use crate::error::ReadError;
use crate::reader::{is_revert_message, ChainReader};
use async_trait::async_trait;
use ethers::types::{Address, Bytes, U256};
use serde_json::Value;

/// [`ChainReader`] that goes through the DApp backend's provider proxy
/// (`POST /api/network/provider`), so the RPC URL never leaves the server.
#[derive(Debug, Clone)]
pub struct ProxyReader {
    url: String,
    chain_id: u64,
    http: reqwest::Client,
}

impl ProxyReader {
    pub fn new(backend_url: &str, chain_id: u64) -> Self {
        Self {
            url: format!("{}/api/network/provider", backend_url.trim_end_matches('/')),
            chain_id,
            http: reqwest::Client::new(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value, ReadError> {
        let req = serde_json::json!({
            "method": method,
            "params": params,
            "chainId": self.chain_id,
        });

        let resp = self
            .http
            .post(&self.url)
            .json(&req)
            .send()
            .await
            .map_err(|e| ReadError::Transport(format!("POST {} failed: {e}", self.url)))?;

        let status = resp.status();
        let body: Value = resp
            .json()
            .await
            .map_err(|e| ReadError::Transport(format!("failed to decode JSON: {e}")))?;

        parse_proxy_response(status.as_u16(), body)
    }
}

#[async_trait]
impl ChainReader for ProxyReader {
    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, ReadError> {
        let tx = serde_json::json!({ "to": fmt_address(to), "data": fmt_bytes(&data) });
        let res = self.request("call", serde_json::json!([tx])).await?;
        parse_bytes_result(&res)
    }

    async fn code_at(&self, address: Address) -> Result<Bytes, ReadError> {
        let res = self
            .request("getCode", serde_json::json!([fmt_address(address)]))
            .await?;
        parse_bytes_result(&res)
    }

    async fn balance_of(&self, address: Address) -> Result<U256, ReadError> {
        let res = self
            .request("getBalance", serde_json::json!([fmt_address(address)]))
            .await?;
        parse_balance(&res)
    }
}

/// Split a proxy reply into a result, a revert, or a transport failure.
///
/// Success is `{ "result": ... }`. Failures carry `{ "error": "...", "message": "..." }`; only
/// messages describing a reverted call count as reverts.
fn parse_proxy_response(status: u16, body: Value) -> Result<Value, ReadError> {
    if (200..300).contains(&status) {
        return body
            .get("result")
            .cloned()
            .ok_or_else(|| ReadError::Transport(format!("missing result field: {body}")));
    }

    let message = body
        .get("message")
        .or_else(|| body.get("error"))
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();

    if is_revert_message(&message) {
        Err(ReadError::Reverted(message))
    } else {
        Err(ReadError::Transport(format!("HTTP {status}: {body}")))
    }
}

fn parse_bytes_result(res: &Value) -> Result<Bytes, ReadError> {
    let s = res
        .as_str()
        .ok_or_else(|| ReadError::Transport(format!("expected hex string result, got {res}")))?;
    parse_bytes(s).map_err(|e| ReadError::Transport(format!("invalid hex result: {e}")))
}

fn parse_balance(res: &Value) -> Result<U256, ReadError> {
    // The proxy may hand back a hex quantity, a decimal string, or a JSON number.
    let parsed = match res {
        Value::String(s) if s.starts_with("0x") => parse_u256_quantity(s).ok(),
        Value::String(s) => U256::from_dec_str(s).ok(),
        Value::Number(n) => n.as_u64().map(U256::from),
        _ => None,
    };
    parsed.ok_or_else(|| ReadError::Transport(format!("unexpected balance result: {res}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn success_returns_result_field() {
        let res = parse_proxy_response(200, json!({ "result": "0x1234" })).unwrap();
        assert_eq!(parse_bytes_result(&res).unwrap(), Bytes::from(vec![0x12, 0x34]));
    }

    #[test]
    fn success_without_result_is_transport_failure() {
        assert!(matches!(
            parse_proxy_response(200, json!({ "foo": 1 })),
            Err(ReadError::Transport(_))
        ));
    }

    #[test]
    fn revert_message_is_a_revert() {
        let body = json!({
            "error": "Internal server error",
            "message": "execution reverted (no data present; likely require(false) occurred)"
        });
        assert!(matches!(
            parse_proxy_response(500, body),
            Err(ReadError::Reverted(_))
        ));
    }

    #[test]
    fn other_failures_are_transport() {
        let body = json!({ "error": "RPC URL not configured" });
        assert!(matches!(
            parse_proxy_response(500, body),
            Err(ReadError::Transport(_))
        ));
        let body = json!({ "error": "Only Sepolia (11155111) is supported" });
        assert!(matches!(
            parse_proxy_response(400, body),
            Err(ReadError::Transport(_))
        ));
    }

    #[test]
    fn empty_code_decodes_to_empty_bytes() {
        assert!(parse_bytes_result(&json!("0x")).unwrap().as_ref().is_empty());
    }

    #[test]
    fn balance_accepts_hex_decimal_and_number() {
        assert_eq!(parse_balance(&json!("0x10")).unwrap(), U256::from(16u64));
        assert_eq!(parse_balance(&json!("1000000000000000000")).unwrap(), U256::exp10(18));
        assert_eq!(parse_balance(&json!(7)).unwrap(), U256::from(7u64));
        assert!(parse_balance(&json!({})).is_err());
    }

    #[test]
    fn url_is_built_from_backend_base() {
        let reader = ProxyReader::new("http://localhost:3001/", 11_155_111);
        assert_eq!(reader.url(), "http://localhost:3001/api/network/provider");
    }
}
