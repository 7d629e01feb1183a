pub mod action;
pub mod datum;
pub mod error;
pub mod ledger;
pub mod planner;
pub mod plutus;
pub mod proration;
pub mod validator;

pub use action::{Action, EscrowPhase};
pub use datum::{Installment, SubscriptionDatum};
pub use error::{ArithmeticOverflow, InvalidTransition, MalformedDatum, PlanningError, SpendError};
pub use ledger::{Address, EscrowUtxo, KeyHash, OutRef, ScriptHash, TxContext, TxInput, TxOutput, Value};
pub use planner::{Planner, TransactionPlan};
pub use plutus::PlutusData;
pub use validator::Validator;
