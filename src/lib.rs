//! Prorated subscription escrow on a UTxO ledger.
//!
//! A single script output holds the [`SubscriptionDatum`](sdk::SubscriptionDatum),
//! one marker NFT and the subscriber's AGENT deposit. Each spend carries an
//! [`Action`](sdk::Action); the [`Validator`](sdk::Validator) accepts or rejects
//! the transition and the [`Planner`](sdk::Planner) builds transitions it will
//! accept.
//!
//! ```text
//! chain query ──> decode ──> Planner::plan ──> assemble ──> submit
//!                                                  │
//!                                    Validator::validate_spend (on-chain)
//! ```

pub mod api;
pub mod config;
pub mod sdk;

use sdk::ledger::{Address, KeyHash, OutRef, TxId, TxInput, TxOutput, Value};

/// Deterministic key hash for tests and demos: every byte is `seed`.
pub fn mock_key_hash(seed: u8) -> KeyHash {
    KeyHash([seed; KeyHash::LEN])
}

/// Deterministic output reference for tests and demos.
pub fn mock_out_ref(seed: u8, index: u32) -> OutRef {
    OutRef {
        tx_id: TxId([seed; TxId::LEN]),
        index,
    }
}

/// A plain wallet UTxO owned by `owner`.
pub fn wallet_input(owner: KeyHash, out_ref: OutRef, lovelace: u64, agent: u64) -> TxInput {
    TxInput {
        out_ref,
        output: TxOutput {
            address: Address::Key(owner),
            value: Value {
                lovelace,
                marker: 0,
                agent,
            },
            datum: None,
        },
    }
}

pub fn print_header(title: &str) {
    println!("\n=== {} ===\n", title);
}

pub fn print_step(num: usize, description: &str) {
    println!("Step {}: {}", num, description);
}

pub fn print_result<E: std::fmt::Display>(label: &str, result: &Result<(), E>) {
    match result {
        Ok(()) => println!("  [{}] PASS", label),
        Err(e) => println!("  [{}] FAIL as expected: {}", label, e),
    }
}
