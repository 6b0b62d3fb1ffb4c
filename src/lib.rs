//! Best-effort probing of ERC-4337 account factories: counterfactual address prediction
//! across factories with differing interfaces, and validation of candidate factories.

pub mod encoding;
pub mod error;
pub mod predict;
pub mod probe;
pub mod proxy;
pub mod reader;
pub mod registry;
pub mod report;
pub mod salt;
pub mod validate;

#[cfg(test)]
mod testing;
