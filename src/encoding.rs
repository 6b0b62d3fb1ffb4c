use ethers::types::{Address, Bytes, U256};

/// Lowercase `0x` hex, as JSON-RPC expects.
pub fn fmt_address(addr: Address) -> String {
    format!("0x{}", hex::encode(addr.as_bytes()))
}

/// EIP-55 checksummed form, for display.
pub fn fmt_checksum(addr: Address) -> String {
    ethers::utils::to_checksum(&addr, None)
}

pub fn fmt_bytes(b: &Bytes) -> String {
    format!("0x{}", hex::encode(b.as_ref()))
}

pub fn parse_u256_quantity(s: &str) -> anyhow::Result<U256> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    if s.is_empty() {
        return Ok(U256::zero());
    }
    Ok(U256::from_str_radix(s, 16)?)
}

pub fn parse_bytes(s: &str) -> anyhow::Result<Bytes> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    Ok(Bytes::from(hex::decode(s)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantities() {
        assert_eq!(parse_u256_quantity("0x").unwrap(), U256::zero());
        assert_eq!(parse_u256_quantity("0xff").unwrap(), U256::from(255u64));
    }

    #[test]
    fn addresses_are_lowercase_or_checksummed() {
        let a: Address = "0x5FF137D4b0FDCD49DcA30c7CF57E578a026d2789".parse().unwrap();
        assert_eq!(fmt_address(a), "0x5ff137d4b0fdcd49dca30c7cf57e578a026d2789");
        assert_eq!(fmt_checksum(a), "0x5FF137D4b0FDCD49DcA30c7CF57E578a026d2789");
    }

    #[test]
    fn bytes_round_trip_through_hex() {
        let b = parse_bytes("0xdeadbeef").unwrap();
        assert_eq!(fmt_bytes(&b), "0xdeadbeef");
        assert!(parse_bytes("0xzz").is_err());
    }
}
