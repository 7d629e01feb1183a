use thiserror::Error;

use super::ledger::KeyHash;

/// Amount arithmetic left the representable `u64` range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("arithmetic overflow in amount computation")]
pub struct ArithmeticOverflow;

/// Structural shape of a PlutusData node, used in decode errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Constr,
    Int,
    Bytes,
    List,
    Map,
}

impl std::fmt::Display for Shape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Constr => "constr",
            Self::Int => "int",
            Self::Bytes => "bytes",
            Self::List => "list",
            Self::Map => "map",
        };
        f.write_str(name)
    }
}

/// Decode-time structural failure. Fatal: nothing is repaired.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedDatum {
    #[error("unsupported constructor {found} for {context} (expected {expected})")]
    UnsupportedConstructor {
        context: &'static str,
        expected: u64,
        found: u64,
    },

    #[error("missing field `{field}` at index {index}")]
    MissingField { field: &'static str, index: usize },

    #[error("{context} has {extra} unexpected trailing field(s)")]
    TrailingFields { context: &'static str, extra: usize },

    #[error("field `{field}`: expected {expected}, found {found}")]
    WrongShape {
        field: &'static str,
        expected: Shape,
        found: Shape,
    },

    #[error("field `{field}`: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("invalid PlutusData JSON: {0}")]
    Json(String),
}

/// Party whose signature an action requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Subscriber,
    Merchant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Subscriber => f.write_str("subscriber"),
            Self::Merchant => f.write_str("merchant"),
        }
    }
}

/// Why the off-chain planner refused to build a transaction.
///
/// Recoverable: the caller may pick another action, wait, or fund the
/// transaction differently.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanningError {
    #[error("subscription has expired")]
    SubscriptionExpired,

    #[error("subscription is still active")]
    SubscriptionActive,

    #[error("no installments to claim")]
    NoInstallmentsToClaim,

    #[error("unauthorized: action must be signed by the {required}")]
    Unauthorized { required: Role },

    #[error("escrow holds {available} AGENT but {needed} are owed")]
    InsufficientEscrowBalance { needed: u64, available: u64 },

    #[error("insufficient {asset} in funding inputs: need {needed}, have {available}")]
    InsufficientFunds {
        asset: &'static str,
        needed: u64,
        available: u64,
    },

    #[error(transparent)]
    ArithmeticOverflow(#[from] ArithmeticOverflow),
}

impl PlanningError {
    /// Stable machine-readable name of the variant.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SubscriptionExpired => "subscription_expired",
            Self::SubscriptionActive => "subscription_active",
            Self::NoInstallmentsToClaim => "no_installments_to_claim",
            Self::Unauthorized { .. } => "unauthorized",
            Self::InsufficientEscrowBalance { .. } => "insufficient_escrow_balance",
            Self::InsufficientFunds { .. } => "insufficient_funds",
            Self::ArithmeticOverflow(_) => "arithmetic_overflow",
        }
    }
}

/// Why the validator rejected a proposed transition.
///
/// The transaction has no effect. The caller must replan; resubmitting the
/// same transaction will fail the same way.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidTransition {
    #[error("spent escrow input {0} is not among the transaction inputs")]
    MissingOwnInput(String),

    #[error("spent input is not locked at the escrow script")]
    NotEscrowInput,

    #[error("transaction spends {0} escrow inputs, expected exactly 1")]
    MultipleEscrowInputs(usize),

    #[error("escrow input carries {0} marker units, expected exactly 1")]
    MissingMarker(u64),

    #[error("escrow input has no inline datum")]
    MissingDatum,

    #[error("validity interval has no upper bound")]
    UnboundedValidity,

    #[error("validity interval [{lower}, {upper}) is empty or wider than {max} ms")]
    InvalidValidityWindow { lower: u64, upper: u64, max: u64 },

    #[error("subscription has expired")]
    SubscriptionExpired,

    #[error("subscription is still active")]
    SubscriptionActive,

    #[error("no installments to claim")]
    NoInstallmentsToClaim,

    #[error("missing signature from the {0}")]
    Unauthorized(Role),

    #[error("AGENT not conserved: {inputs} in, {outputs} out")]
    FungibleNotConserved { inputs: u64, outputs: u64 },

    #[error("marker not conserved: {inputs} in, {minted} minted, {outputs} out")]
    MarkerNotConserved { inputs: u64, minted: i64, outputs: u64 },

    #[error("unexpected marker mint of {0}")]
    UnexpectedMint(i64),

    #[error("expected exactly one continuing escrow output, found {0}")]
    ContinuingOutputCount(usize),

    #[error("continuing output carries {0} marker units, expected exactly 1")]
    ContinuingMarker(u64),

    #[error("continuing output has no inline datum")]
    MissingSuccessorDatum,

    #[error("successor datum is malformed: {0}")]
    MalformedSuccessorDatum(MalformedDatum),

    #[error("successor datum does not match the expected transition")]
    SuccessorDatumMismatch,

    #[error("continuing output holds {actual} AGENT, expected {expected}")]
    ContinuingBalanceMismatch { expected: u64, actual: u64 },

    #[error("continuing output holds {actual} lovelace, less than the {required} spent")]
    LovelaceDrained { required: u64, actual: u64 },

    #[error("escrow holds {available} AGENT but {needed} are owed")]
    InsufficientEscrowBalance { needed: u64, available: u64 },

    #[error("{party} paid {paid} AGENT, required {required}")]
    Underpaid {
        party: KeyHash,
        required: u64,
        paid: u64,
    },

    #[error("terminal action left the marker at the escrow script")]
    MarkerRetained,

    #[error("marker was neither burned nor returned to the subscriber")]
    MarkerNotDisposed,

    #[error(transparent)]
    ArithmeticOverflow(#[from] ArithmeticOverflow),
}

impl InvalidTransition {
    /// Stable machine-readable name of the variant.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingOwnInput(_) => "missing_own_input",
            Self::NotEscrowInput => "not_escrow_input",
            Self::MultipleEscrowInputs(_) => "multiple_escrow_inputs",
            Self::MissingMarker(_) => "missing_marker",
            Self::MissingDatum => "missing_datum",
            Self::UnboundedValidity => "unbounded_validity",
            Self::InvalidValidityWindow { .. } => "invalid_validity_window",
            Self::SubscriptionExpired => "subscription_expired",
            Self::SubscriptionActive => "subscription_active",
            Self::NoInstallmentsToClaim => "no_installments_to_claim",
            Self::Unauthorized(_) => "unauthorized",
            Self::FungibleNotConserved { .. } => "fungible_not_conserved",
            Self::MarkerNotConserved { .. } => "marker_not_conserved",
            Self::UnexpectedMint(_) => "unexpected_mint",
            Self::ContinuingOutputCount(_) => "continuing_output_count",
            Self::ContinuingMarker(_) => "continuing_marker",
            Self::MissingSuccessorDatum => "missing_successor_datum",
            Self::MalformedSuccessorDatum(_) => "malformed_successor_datum",
            Self::SuccessorDatumMismatch => "successor_datum_mismatch",
            Self::ContinuingBalanceMismatch { .. } => "continuing_balance_mismatch",
            Self::LovelaceDrained { .. } => "lovelace_drained",
            Self::InsufficientEscrowBalance { .. } => "insufficient_escrow_balance",
            Self::Underpaid { .. } => "underpaid",
            Self::MarkerRetained => "marker_retained",
            Self::MarkerNotDisposed => "marker_not_disposed",
            Self::ArithmeticOverflow(_) => "arithmetic_overflow",
        }
    }
}

/// Failure of the raw on-chain entry point: either the inputs did not
/// decode or the decoded transition was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpendError {
    #[error("malformed datum: {0}")]
    Malformed(#[from] MalformedDatum),

    #[error("invalid transition: {0}")]
    Rejected(#[from] InvalidTransition),
}
