//! Human-readable and JSON renderings of probe, prediction and validation results.

use crate::encoding::fmt_checksum;
use crate::error::TransportError;
use crate::predict::{prediction_probes, AccountInfo, FactoryPrediction};
use crate::probe::{ArgumentOrder, ProbeOutcome, ProbeResult};
use crate::registry::NetworkConfig;
use crate::salt::Salt;
use crate::validate::{FactoryVerdict, InvalidReason, Verdict};
use ethers::types::Address;
use serde_json::{json, Value};

fn order_name(order: ArgumentOrder) -> &'static str {
    match order {
        ArgumentOrder::OwnerFirst => "ownerFirst",
        ArgumentOrder::SaltFirst => "saltFirst",
        ArgumentOrder::SingleArg => "singleArg",
        ArgumentOrder::NoArgs => "noArgs",
    }
}

pub fn attempts_to_json(attempts: &[ProbeResult]) -> Value {
    let items: Vec<Value> = attempts
        .iter()
        .map(|a| match &a.outcome {
            Ok(address) => json!({
                "method": a.probe.method(),
                "signature": a.probe.signature(),
                "argumentOrder": order_name(a.probe.order()),
                "address": fmt_checksum(*address),
                "error": Value::Null,
            }),
            Err(e) => json!({
                "method": a.probe.method(),
                "signature": a.probe.signature(),
                "argumentOrder": order_name(a.probe.order()),
                "address": Value::Null,
                "error": { "kind": e.kind(), "message": e.to_string() },
            }),
        })
        .collect();
    Value::Array(items)
}

pub fn outcome_to_json(outcome: &ProbeOutcome) -> Value {
    json!({
        "contract": fmt_checksum(outcome.contract),
        "accepted": outcome.is_accepted(),
        "address": outcome.address().map(fmt_checksum),
        "methodUsed": outcome.method_used(),
        "attempts": attempts_to_json(&outcome.attempts),
    })
}

pub fn transport_error_to_json(err: &TransportError) -> Value {
    json!({
        "contract": fmt_checksum(err.contract),
        "method": err.method,
        "reason": err.reason,
        "attempts": attempts_to_json(&err.attempts),
    })
}

pub fn account_info_to_json(info: &AccountInfo, explorer_url: Option<&str>) -> Value {
    json!({
        "owner": fmt_checksum(info.owner),
        "salt": info.salt.as_str(),
        "factory": fmt_checksum(info.outcome.contract),
        "predictedAddress": info.outcome.address().map(fmt_checksum),
        "methodUsed": info.outcome.method_used(),
        "isDeployed": info.deployed,
        "balanceWei": info.balance.map(|b| b.to_string()),
        "balanceEth": info.balance.map(ethers::utils::format_ether),
        "entryPointDepositWei": info.deposit.map(|d| d.to_string()),
        "entryPointDeposit": info.deposit.map(ethers::utils::format_ether),
        "explorerUrl": explorer_url,
        "attempts": attempts_to_json(&info.outcome.attempts),
    })
}

pub fn verdict_to_json(v: &FactoryVerdict) -> Value {
    let mut out = json!({
        "key": v.key,
        "name": v.name,
        "address": fmt_checksum(v.address),
        "valid": v.verdict.is_valid(),
    });
    match &v.verdict {
        Verdict::Valid {
            implementation,
            test_address,
            method,
        } => {
            out["implementation"] = json!(fmt_checksum(*implementation));
            out["testAddress"] = json!(fmt_checksum(*test_address));
            out["methodUsed"] = json!(method);
        }
        Verdict::Invalid(reason) => {
            out["reason"] = json!(reason.to_string());
            match reason {
                InvalidReason::NoPrediction { attempts } => {
                    out["attempts"] = attempts_to_json(attempts);
                }
                InvalidReason::ConstantAddress { address } => {
                    out["testAddress"] = json!(fmt_checksum(*address));
                }
                InvalidReason::NoCode | InvalidReason::NoImplementation { .. } => {}
            }
        }
    }
    out
}

pub fn comparison_to_json(owner: Address, salt: &Salt, results: &[FactoryPrediction]) -> Value {
    let factories: Vec<Value> = results
        .iter()
        .map(|r| {
            let mut entry = json!({
                "key": r.key,
                "name": r.name,
                "factory": fmt_checksum(r.factory),
            });
            match &r.outcome {
                Ok(outcome) => {
                    entry["predictedAddress"] = json!(outcome.address().map(fmt_checksum));
                    entry["methodUsed"] = json!(outcome.method_used());
                    entry["outcome"] = outcome_to_json(outcome);
                }
                Err(e) => {
                    entry["predictedAddress"] = Value::Null;
                    entry["transportError"] = transport_error_to_json(e);
                }
            }
            entry
        })
        .collect();

    json!({
        "owner": fmt_checksum(owner),
        "salt": salt.as_str(),
        "factories": factories,
    })
}

/// Registry view of one network, with the prediction probes each factory will be tried with.
pub fn network_to_json(network: &NetworkConfig, default_factory: &str) -> Value {
    let factories: Vec<Value> = network
        .factories
        .iter()
        .map(|f| {
            let probes: Vec<String> = prediction_probes(f.abi.as_ref())
                .iter()
                .map(|p| p.signature())
                .collect();
            json!({
                "key": f.key,
                "name": f.name,
                "address": fmt_checksum(f.address),
                "type": f.kind,
                "version": f.version,
                "description": f.description,
                "isDefault": f.key == default_factory,
                "predictionProbes": probes,
            })
        })
        .collect();

    json!({
        "chainId": network.chain_id,
        "name": network.name,
        "shortName": network.short_name,
        "blockExplorer": network.block_explorer,
        "entryPoint": fmt_checksum(network.entry_point),
        "isSupported": network.is_supported,
        "factories": factories,
    })
}

pub fn attempt_lines(attempts: &[ProbeResult]) -> Vec<String> {
    attempts
        .iter()
        .map(|a| match &a.outcome {
            Ok(address) => format!("  {:<40} -> {}", a.probe.signature(), fmt_checksum(*address)),
            Err(e) => format!("  {:<40} !! {}", a.probe.signature(), e),
        })
        .collect()
}

pub fn account_info_lines(info: &AccountInfo, explorer_url: Option<&str>) -> Vec<String> {
    let mut lines = vec![
        format!("factory:          {}", fmt_checksum(info.outcome.contract)),
        format!("owner:            {}", fmt_checksum(info.owner)),
        format!("salt:             {}", info.salt),
    ];
    match info.outcome.accepted {
        Some(accepted) => {
            lines.push(format!("predicted:        {}", fmt_checksum(accepted.address)));
            lines.push(format!("method:           {}", accepted.probe.signature()));
            if let Some(deployed) = info.deployed {
                lines.push(format!("isDeployed:       {}", deployed));
            }
            if let Some(balance) = info.balance {
                lines.push(format!(
                    "balance:          {} ETH",
                    ethers::utils::format_ether(balance)
                ));
            }
            if let Some(deposit) = info.deposit {
                lines.push(format!(
                    "deposit:          {} ETH (EntryPoint)",
                    ethers::utils::format_ether(deposit)
                ));
            }
            if let Some(url) = explorer_url {
                lines.push(format!("explorer:         {}", url));
            }
        }
        None => {
            lines.push("predicted:        none (no prediction method accepted)".to_string());
            lines.extend(attempt_lines(&info.outcome.attempts));
        }
    }
    lines
}

pub fn verdict_line(v: &FactoryVerdict) -> String {
    match &v.verdict {
        Verdict::Valid {
            implementation,
            method,
            ..
        } => format!(
            "[ok]      {:<14} {} via {} (implementation {})",
            v.key,
            fmt_checksum(v.address),
            method,
            fmt_checksum(*implementation)
        ),
        Verdict::Invalid(reason) => format!(
            "[invalid] {:<14} {} {}",
            v.key,
            fmt_checksum(v.address),
            reason
        ),
    }
}

pub fn comparison_lines(results: &[FactoryPrediction]) -> Vec<String> {
    results
        .iter()
        .map(|r| match &r.outcome {
            Ok(outcome) => match outcome.accepted {
                Some(a) => format!(
                    "{:<14} {} via {}",
                    r.key,
                    fmt_checksum(a.address),
                    a.probe.method()
                ),
                None => format!(
                    "{:<14} no prediction ({} attempt(s))",
                    r.key,
                    outcome.attempts.len()
                ),
            },
            Err(e) => format!("{:<14} transport error: {}", r.key, e.reason),
        })
        .collect()
}
