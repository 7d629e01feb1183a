//! On-chain acceptance rules for spending the escrow.
//!
//! A transition is accepted only if every check passes; the first failing
//! check is reported and nothing else is evaluated.

use tracing::{debug, warn};

use super::action::Action;
use super::datum::SubscriptionDatum;
use super::error::{ArithmeticOverflow, InvalidTransition, Role, SpendError};
use super::ledger::{Address, KeyHash, TxContext, TxOutput, total_value};
use super::plutus::PlutusData;
use super::proration::{cancellation, is_expired, payouts, split_fee, sum_installments};
use crate::config::ProtocolParams;

pub struct Validator {
    params: ProtocolParams,
}

impl Validator {
    pub fn new(params: ProtocolParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &ProtocolParams {
        &self.params
    }

    /// Entry point with the ledger's raw inputs: the redeemer as supplied and
    /// the datum inlined in the spent escrow output.
    pub fn validate_spend(&self, redeemer: &PlutusData, tx: &TxContext) -> Result<(), SpendError> {
        let own = tx
            .own_input()
            .ok_or_else(|| InvalidTransition::MissingOwnInput(tx.own_ref.to_string()))?;
        let raw = own
            .output
            .datum
            .as_ref()
            .ok_or(InvalidTransition::MissingDatum)?;
        let datum = SubscriptionDatum::decode(raw)?;
        let action = Action::decode(redeemer)?;
        self.validate(&datum, action, tx)?;
        Ok(())
    }

    pub fn validate(
        &self,
        datum: &SubscriptionDatum,
        action: Action,
        tx: &TxContext,
    ) -> Result<(), InvalidTransition> {
        let result = self.check(datum, action, tx);
        match &result {
            Ok(()) => debug!(%action, escrow = %tx.own_ref, "transition accepted"),
            Err(reason) => warn!(%action, escrow = %tx.own_ref, %reason, "transition rejected"),
        }
        result
    }

    fn check(
        &self,
        datum: &SubscriptionDatum,
        action: Action,
        tx: &TxContext,
    ) -> Result<(), InvalidTransition> {
        let own = self.escrow_input(tx)?;
        check_conservation(tx)?;
        match action {
            Action::Extend => self.check_extend(datum, own, tx),
            Action::MerchantWithdraw => self.check_merchant_withdraw(datum, own, tx),
            Action::Unsubscribe => self.check_unsubscribe(datum, own, tx),
            Action::SubscriberWithdraw => self.check_subscriber_withdraw(datum, own, tx),
        }
    }

    fn check_extend(
        &self,
        datum: &SubscriptionDatum,
        own: &TxOutput,
        tx: &TxContext,
    ) -> Result<(), InvalidTransition> {
        self.require_active(datum, tx)?;

        let expected = datum.extended(tx.validity.lower, self.params.period_ms)?;
        let agent = own
            .value
            .agent
            .checked_add(datum.service_fee)
            .ok_or(ArithmeticOverflow)?;
        self.check_continuing(own, tx, &expected, agent)
    }

    fn check_merchant_withdraw(
        &self,
        datum: &SubscriptionDatum,
        own: &TxOutput,
        tx: &TxContext,
    ) -> Result<(), InvalidTransition> {
        if datum.installments.is_empty() {
            return Err(InvalidTransition::NoInstallmentsToClaim);
        }
        require_signer(tx, &datum.merchant, Role::Merchant)?;

        let pending = sum_installments(&datum.installments)?;
        let remaining =
            own.value
                .agent
                .checked_sub(pending)
                .ok_or(InvalidTransition::InsufficientEscrowBalance {
                    needed: pending,
                    available: own.value.agent,
                })?;
        self.check_continuing(own, tx, &datum.cleared(), remaining)?;

        let split = split_fee(pending, datum.partner_percentage)?;
        check_payouts(tx, &payouts(datum, split))
    }

    fn check_unsubscribe(
        &self,
        datum: &SubscriptionDatum,
        own: &TxOutput,
        tx: &TxContext,
    ) -> Result<(), InvalidTransition> {
        self.require_active(datum, tx)?;
        require_signer(tx, &datum.subscriber, Role::Subscriber)?;

        let settled = cancellation(datum, tx.validity.lower, self.params.period_ms)?;
        let reserve = own.value.agent.checked_sub(settled.pending).ok_or(
            InvalidTransition::InsufficientEscrowBalance {
                needed: settled.pending,
                available: own.value.agent,
            },
        )?;
        let to_subscriber = reserve
            .checked_add(settled.refund)
            .ok_or(ArithmeticOverflow)?;
        self.check_disposal(datum, tx)?;

        let mut owed = payouts(datum, settled.fee);
        owed.push((datum.subscriber, to_subscriber));
        check_payouts(tx, &owed)
    }

    fn check_subscriber_withdraw(
        &self,
        datum: &SubscriptionDatum,
        own: &TxOutput,
        tx: &TxContext,
    ) -> Result<(), InvalidTransition> {
        if !is_expired(datum.subscription_end, tx.validity.lower) {
            return Err(InvalidTransition::SubscriptionActive);
        }
        require_signer(tx, &datum.subscriber, Role::Subscriber)?;
        self.check_disposal(datum, tx)?;
        check_payouts(tx, &[(datum.subscriber, own.value.agent)])
    }

    /// The spent escrow output: locked at our script, the only such input,
    /// holding exactly one marker.
    fn escrow_input<'a>(&self, tx: &'a TxContext) -> Result<&'a TxOutput, InvalidTransition> {
        let own = tx
            .own_input()
            .ok_or_else(|| InvalidTransition::MissingOwnInput(tx.own_ref.to_string()))?;
        let script = self.script_address();
        if own.output.address != script {
            return Err(InvalidTransition::NotEscrowInput);
        }
        let escrow_inputs = tx
            .inputs
            .iter()
            .filter(|i| i.output.address == script)
            .count();
        if escrow_inputs != 1 {
            return Err(InvalidTransition::MultipleEscrowInputs(escrow_inputs));
        }
        if own.output.value.marker != 1 {
            return Err(InvalidTransition::MissingMarker(own.output.value.marker));
        }
        Ok(&own.output)
    }

    /// A bounded validity interval that ends no later than the subscription.
    fn require_active(&self, datum: &SubscriptionDatum, tx: &TxContext) -> Result<(), InvalidTransition> {
        let lower = tx.validity.lower;
        let upper = tx.validity.upper.ok_or(InvalidTransition::UnboundedValidity)?;
        let max = self.params.validity_window_ms;
        if upper <= lower || upper - lower > max {
            return Err(InvalidTransition::InvalidValidityWindow { lower, upper, max });
        }
        // `upper` is exclusive, so every instant of the interval is before expiry.
        if upper > datum.subscription_end {
            return Err(InvalidTransition::SubscriptionExpired);
        }
        Ok(())
    }

    fn check_continuing(
        &self,
        own: &TxOutput,
        tx: &TxContext,
        expected: &SubscriptionDatum,
        expected_agent: u64,
    ) -> Result<(), InvalidTransition> {
        if tx.marker_mint != 0 {
            return Err(InvalidTransition::UnexpectedMint(tx.marker_mint));
        }
        let script = self.script_address();
        let continuing: Vec<&TxOutput> = tx.outputs.iter().filter(|o| o.address == script).collect();
        let [out] = continuing.as_slice() else {
            return Err(InvalidTransition::ContinuingOutputCount(continuing.len()));
        };
        if out.value.marker != 1 {
            return Err(InvalidTransition::ContinuingMarker(out.value.marker));
        }
        let raw = out
            .datum
            .as_ref()
            .ok_or(InvalidTransition::MissingSuccessorDatum)?;
        let successor =
            SubscriptionDatum::decode(raw).map_err(InvalidTransition::MalformedSuccessorDatum)?;
        if successor != *expected {
            return Err(InvalidTransition::SuccessorDatumMismatch);
        }
        if out.value.agent != expected_agent {
            return Err(InvalidTransition::ContinuingBalanceMismatch {
                expected: expected_agent,
                actual: out.value.agent,
            });
        }
        if out.value.lovelace < own.value.lovelace {
            return Err(InvalidTransition::LovelaceDrained {
                required: own.value.lovelace,
                actual: out.value.lovelace,
            });
        }
        Ok(())
    }

    /// Terminal actions: the marker leaves the script and is burned or handed
    /// to the subscriber.
    fn check_disposal(&self, datum: &SubscriptionDatum, tx: &TxContext) -> Result<(), InvalidTransition> {
        let script = self.script_address();
        if tx
            .outputs
            .iter()
            .any(|o| o.address == script && o.value.marker > 0)
        {
            return Err(InvalidTransition::MarkerRetained);
        }
        match tx.marker_mint {
            -1 => Ok(()),
            0 if tx.marker_paid_to(&datum.subscriber) >= 1 => Ok(()),
            0 => Err(InvalidTransition::MarkerNotDisposed),
            other => Err(InvalidTransition::UnexpectedMint(other)),
        }
    }

    fn script_address(&self) -> Address {
        Address::Script(self.params.script_hash)
    }
}

fn require_signer(tx: &TxContext, key: &KeyHash, role: Role) -> Result<(), InvalidTransition> {
    if tx.is_signed_by(key) {
        Ok(())
    } else {
        Err(InvalidTransition::Unauthorized(role))
    }
}

/// AGENT is never minted here and marker units only through `marker_mint`.
fn check_conservation(tx: &TxContext) -> Result<(), InvalidTransition> {
    let inputs = total_value(tx.inputs.iter().map(|i| &i.output.value))?;
    let outputs = total_value(tx.outputs.iter().map(|o| &o.value))?;
    if inputs.agent != outputs.agent {
        return Err(InvalidTransition::FungibleNotConserved {
            inputs: inputs.agent,
            outputs: outputs.agent,
        });
    }
    if i128::from(inputs.marker) + i128::from(tx.marker_mint) != i128::from(outputs.marker) {
        return Err(InvalidTransition::MarkerNotConserved {
            inputs: inputs.marker,
            minted: tx.marker_mint,
            outputs: outputs.marker,
        });
    }
    Ok(())
}

/// Every party must receive at least what it is owed; amounts owed to the
/// same key accumulate.
fn check_payouts(tx: &TxContext, owed: &[(KeyHash, u64)]) -> Result<(), InvalidTransition> {
    let mut totals: Vec<(KeyHash, u64)> = Vec::with_capacity(owed.len());
    for (key, amount) in owed {
        match totals.iter_mut().find(|(k, _)| k == key) {
            Some((_, total)) => *total = total.checked_add(*amount).ok_or(ArithmeticOverflow)?,
            None => totals.push((*key, *amount)),
        }
    }
    for (party, required) in totals {
        if required == 0 {
            continue;
        }
        let paid = tx.agent_paid_to(&party)?;
        if paid < required {
            return Err(InvalidTransition::Underpaid {
                party,
                required,
                paid,
            });
        }
    }
    Ok(())
}
