//! Subscription lifecycle
//!
//! Walks one escrow through its life entirely offline:
//! - subscriber extends twice
//! - merchant claims the pending installments, split with a partner
//! - subscriber extends again, then cancels halfway through the period
//!
//! Every step is planned, assembled from mock wallet inputs and checked by
//! the validator exactly as the on-chain script would. A second escrow is
//! left to expire and drained by the subscriber.

use prorated_sub_escrow::config::{MarkerDisposal, ProtocolParams};
use prorated_sub_escrow::sdk::ledger::{Address, ScriptHash, TxContext};
use prorated_sub_escrow::sdk::{
    Action, EscrowPhase, EscrowUtxo, KeyHash, PlanningError, Planner, SubscriptionDatum,
    TransactionPlan, Validator, Value,
};
use prorated_sub_escrow::*;

const DAY_MS: u64 = 24 * 60 * 60 * 1000;
const FEE: u64 = 10_000_000; // 10 AGENT
const START: u64 = 1_700_000_000_000;

/// Plan, fund, validate and apply one transition.
fn step(
    planner: &Planner,
    validator: &Validator,
    escrow: &EscrowUtxo,
    action: Action,
    signer: KeyHash,
    now: u64,
) -> Result<(TransactionPlan, TxContext), Box<dyn std::error::Error>> {
    let plan = planner.plan(escrow, action, signer, now)?;
    let funding = vec![wallet_input(
        signer,
        mock_out_ref(0xf0, 0),
        plan.wallet_contribution.lovelace + 5_000_000,
        plan.wallet_contribution.agent,
    )];
    let tx = plan.assemble(escrow, funding, Address::Key(signer))?;
    let verdict = validator.validate(&escrow.datum, action, &tx);
    print_result(&action.to_string(), &verdict);
    verdict?;
    for leg in plan.legs() {
        println!("    {:?} {:>12} -> {}", leg.asset, leg.amount, leg.destination);
    }
    Ok((plan, tx))
}

/// The escrow UTxO a plan's continuing output becomes once confirmed.
fn next_escrow(plan: &TransactionPlan, tx: &TxContext, seed: u8) -> Option<EscrowUtxo> {
    let successor = plan.successor.clone()?;
    let out = tx
        .outputs
        .iter()
        .find(|o| o.address == Address::Script(plan.script))?;
    Some(EscrowUtxo {
        out_ref: mock_out_ref(seed, 0),
        value: out.value,
        datum: successor,
    })
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    print_header("Prorated Subscription Escrow Lifecycle");

    let subscriber = mock_key_hash(0x11);
    let merchant = mock_key_hash(0x22);
    let partner = mock_key_hash(0x33);

    let params = ProtocolParams::new(ScriptHash([0x5c; ScriptHash::LEN]));
    let planner = Planner::new(params.clone());
    let validator = Validator::new(params.clone());

    // Step 1: initial escrow, as left by the subscribe transaction
    print_step(1, "Opening escrow with one period prepaid...");
    let datum = SubscriptionDatum {
        subscriber,
        merchant,
        partner: Some(partner),
        partner_percentage: 30,
        subscription_end: START + params.period_ms,
        service_fee: FEE,
        installments: vec![],
    };
    let mut escrow = EscrowUtxo {
        out_ref: mock_out_ref(0x01, 0),
        value: Value {
            lovelace: 4_000_000,
            marker: 1,
            agent: FEE,
        },
        datum,
    };
    println!("  Phase: {:?}", EscrowPhase::of(&escrow.datum, START));

    // Step 2: two extensions
    print_step(2, "Subscriber extends twice...");
    for (i, now) in [START + DAY_MS, START + 2 * DAY_MS].into_iter().enumerate() {
        let (plan, tx) = step(&planner, &validator, &escrow, Action::Extend, subscriber, now)?;
        escrow = next_escrow(&plan, &tx, 0x02 + i as u8).ok_or("extend left no escrow")?;
    }
    println!(
        "  Pending installments: {}, escrow AGENT: {}",
        escrow.datum.installments.len(),
        escrow.value.agent
    );

    // Step 3: merchant claims, partner takes 30%
    print_step(3, "Merchant claims pending installments...");
    let now = START + 3 * DAY_MS;
    let (plan, tx) = step(&planner, &validator, &escrow, Action::MerchantWithdraw, merchant, now)?;
    escrow = next_escrow(&plan, &tx, 0x04).ok_or("claim left no escrow")?;

    // Step 4: the subscriber cannot claim for the merchant
    print_step(4, "Rejected attempts...");
    let refused = planner.plan(&escrow, Action::MerchantWithdraw, subscriber, now);
    print_result("merchant_withdraw with nothing pending", &refused.map(|_| ()));
    let refused = planner.plan(&escrow, Action::SubscriberWithdraw, subscriber, now);
    assert!(matches!(refused, Err(PlanningError::SubscriptionActive)));
    print_result("subscriber_withdraw before expiry", &refused.map(|_| ()));

    // Step 5: one more period, then cancel halfway through
    print_step(5, "Subscriber extends once more, then unsubscribes...");
    let (plan, tx) = step(&planner, &validator, &escrow, Action::Extend, subscriber, now)?;
    escrow = next_escrow(&plan, &tx, 0x05).ok_or("extend left no escrow")?;
    let cancel_at = escrow.datum.subscription_end - params.period_ms / 2;
    step(&planner, &validator, &escrow, Action::Unsubscribe, subscriber, cancel_at)?;

    // Step 6: a second escrow left to expire, marker returned instead of burned
    print_step(6, "Expired escrow drained by the subscriber...");
    let returning = ProtocolParams {
        marker_disposal: MarkerDisposal::ReturnToSubscriber,
        ..params
    };
    let planner = Planner::new(returning.clone());
    let validator = Validator::new(returning);
    let expired = EscrowUtxo {
        out_ref: mock_out_ref(0x06, 1),
        value: Value {
            lovelace: 4_000_000,
            marker: 1,
            agent: FEE,
        },
        datum: SubscriptionDatum {
            subscriber,
            merchant,
            partner: None,
            partner_percentage: 0,
            subscription_end: START,
            service_fee: FEE,
            installments: vec![],
        },
    };
    let later = START + DAY_MS;
    println!("  Phase: {:?}", EscrowPhase::of(&expired.datum, later));
    let (_, tx) = step(
        &planner,
        &validator,
        &expired,
        Action::SubscriberWithdraw,
        subscriber,
        later,
    )?;
    println!(
        "  Marker returned to subscriber: {}, minted: {}",
        tx.marker_paid_to(&subscriber),
        tx.marker_mint
    );

    println!("\nLifecycle complete.");
    Ok(())
}
