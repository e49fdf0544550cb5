//! Integration Tests - End-to-end Settlement Flow
//!
//! Tests the interaction between usecases, ports, and adapters.
//! Uses mockall for venue mocking and tokio::test for async tests.

use std::sync::Arc;

use mockall::mock;
use mockall::predicate::*;
use tokio::sync::broadcast;

use yieldbet_engine::adapters::auth::CapabilityAuthorizer;
use yieldbet_engine::adapters::clock::ManualClock;
use yieldbet_engine::adapters::events::BroadcastEventSink;
use yieldbet_engine::adapters::venues::SimulatedVenue;
use yieldbet_engine::domain::auth::{AdminCap, LedgerId};
use yieldbet_engine::domain::error::LedgerError;
use yieldbet_engine::domain::events::LedgerEvent;
use yieldbet_engine::domain::fees::FeeSchedule;
use yieldbet_engine::domain::market::{AccountId, AssetKind, MarketState, Position};
use yieldbet_engine::domain::rebalance::RebalanceConfig;
use yieldbet_engine::domain::venue::{ProtocolId, RiskTier, SelectionPolicy};
use yieldbet_engine::ports::venue::{VenueError, YieldVenue};
use yieldbet_engine::usecases::{LedgerSettings, MarketLedger, ProtocolSelector, RebalancingAgent};

// ---- Mock Definitions ----

mock! {
    pub Venue {}

    #[async_trait::async_trait]
    impl yieldbet_engine::ports::venue::YieldVenue for Venue {
        fn protocol(&self) -> yieldbet_engine::domain::venue::ProtocolId;

        fn asset(&self) -> yieldbet_engine::domain::market::AssetKind;

        async fn deposit(
            &self,
            holder: &yieldbet_engine::domain::market::AccountId,
            amount: u64,
        ) -> Result<yieldbet_engine::ports::venue::DepositReceipt, yieldbet_engine::ports::venue::VenueError>;

        async fn withdraw(
            &self,
            holder: &yieldbet_engine::domain::market::AccountId,
            amount: u64,
        ) -> Result<u64, yieldbet_engine::ports::venue::VenueError>;

        async fn balance(
            &self,
            holder: &yieldbet_engine::domain::market::AccountId,
        ) -> Result<u64, yieldbet_engine::ports::venue::VenueError>;

        async fn current_apy(&self) -> Result<u64, yieldbet_engine::ports::venue::VenueError>;

        async fn total_value_locked(&self) -> Result<u64, yieldbet_engine::ports::venue::VenueError>;
    }
}

// ---- Helpers ----

type Ledger = MarketLedger<CapabilityAuthorizer, ManualClock, BroadcastEventSink>;

struct Harness {
    ledger: Ledger,
    cap: AdminCap,
    clock: Arc<ManualClock>,
    sink: Arc<BroadcastEventSink>,
    selector: Arc<ProtocolSelector>,
}

fn harness() -> Harness {
    let selector = Arc::new(ProtocolSelector::new(AssetKind::Usdc, SelectionPolicy::default()));
    let authorizer = Arc::new(CapabilityAuthorizer::new());
    let clock = Arc::new(ManualClock::new(1_000));
    let sink = Arc::new(BroadcastEventSink::new(256));
    let settings = LedgerSettings {
        asset: AssetKind::Usdc,
        escrow_prefix: "escrow".to_string(),
        fees: FeeSchedule::new(2_000, 100).unwrap(),
        fee_recipient: AccountId::from("treasury"),
    };
    let ledger = MarketLedger::new(
        LedgerId::new(),
        settings,
        selector.clone(),
        authorizer.clone(),
        clock.clone(),
        sink.clone(),
    )
    .unwrap();
    let cap = authorizer.issue(ledger.id(), AccountId::from("admin"));
    Harness {
        ledger,
        cap,
        clock,
        sink,
        selector,
    }
}

fn tier(t: u8) -> RiskTier {
    RiskTier::try_from(t).unwrap()
}

fn mock_venue(apy_bp: u64) -> MockVenue {
    let mut venue = MockVenue::new();
    venue.expect_protocol().return_const(ProtocolId::Navi);
    venue.expect_asset().return_const(AssetKind::Usdc);
    venue.expect_current_apy().returning(move || Ok(apy_bp));
    venue.expect_total_value_locked().returning(|| Ok(1_000_000));
    venue
}

fn drain(rx: &mut broadcast::Receiver<LedgerEvent>) -> Vec<&'static str> {
    let mut names = Vec::new();
    while let Ok(event) = rx.try_recv() {
        names.push(event.name());
    }
    names
}

// ---- Mocked Venue Tests ----

#[tokio::test]
async fn test_rejected_deposit_commits_nothing() {
    let h = harness();
    let mut venue = mock_venue(500);
    venue
        .expect_deposit()
        .with(always(), eq(990))
        .times(1)
        .returning(|_, _| {
            Err(VenueError::Rejected {
                protocol: ProtocolId::Navi,
                reason: "supply cap reached".to_string(),
            })
        });
    h.ledger
        .register_venue(&h.cap, Arc::new(venue), tier(2))
        .await
        .unwrap();

    let market_id = h.ledger.create_market(&h.cap, "Rain?", "", 3_600).await.unwrap();
    let mut rx = h.sink.subscribe();

    let result = h
        .ledger
        .place_bet(&AccountId::from("alice"), market_id, Position::Yes, 1_000)
        .await;

    assert!(matches!(result, Err(LedgerError::DepositFailed(_))));
    assert!(h.ledger.get_market_bets(market_id).await.unwrap().is_empty());
    assert!(h.ledger.get_user_bets(&AccountId::from("alice")).await.is_empty());
    assert_eq!(h.ledger.get_market(market_id).await.unwrap().total_bet(), 0);
    assert_eq!(h.ledger.fee_totals().await.transaction, 0);
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test]
async fn test_accepted_deposit_routes_net_stake() {
    let h = harness();
    let mut venue = mock_venue(500);
    // 1% transaction fee on 1_000 leaves 990 for the venue
    venue
        .expect_deposit()
        .with(always(), eq(990))
        .times(1)
        .returning(|_, amount| {
            Ok(yieldbet_engine::ports::venue::DepositReceipt {
                id: uuid::Uuid::new_v4(),
                protocol: ProtocolId::Navi,
                amount,
            })
        });
    h.ledger
        .register_venue(&h.cap, Arc::new(venue), tier(2))
        .await
        .unwrap();

    let market_id = h.ledger.create_market(&h.cap, "Rain?", "", 3_600).await.unwrap();
    let mut rx = h.sink.subscribe();
    let bet_id = h
        .ledger
        .place_bet(&AccountId::from("alice"), market_id, Position::Yes, 1_000)
        .await
        .unwrap();

    let bet = h.ledger.get_bet(market_id, bet_id).await.unwrap();
    assert_eq!(bet.amount, 1_000);
    assert_eq!(bet.net_amount, 990);
    assert_eq!(bet.transaction_fee_paid, 10);
    assert_eq!(drain(&mut rx), vec!["bet_placed", "yield_deposited"]);
}

#[tokio::test]
async fn test_unreadable_venue_blocks_betting() {
    let h = harness();
    let mut venue = MockVenue::new();
    venue.expect_protocol().return_const(ProtocolId::Suilend);
    venue.expect_asset().return_const(AssetKind::Usdc);
    venue.expect_current_apy().returning(|| {
        Err(VenueError::Unavailable {
            protocol: ProtocolId::Suilend,
            reason: "rpc timeout".to_string(),
        })
    });
    venue.expect_total_value_locked().returning(|| Ok(0));
    venue.expect_deposit().never();
    h.ledger
        .register_venue(&h.cap, Arc::new(venue), tier(4))
        .await
        .unwrap();

    let market_id = h.ledger.create_market(&h.cap, "Rain?", "", 3_600).await.unwrap();
    let result = h
        .ledger
        .place_bet(&AccountId::from("alice"), market_id, Position::No, 500)
        .await;
    assert!(matches!(result, Err(LedgerError::NoVenueAvailable)));
}

#[tokio::test]
async fn test_venue_for_other_asset_is_refused() {
    let h = harness();
    let mut venue = MockVenue::new();
    venue.expect_protocol().return_const(ProtocolId::Bucket);
    venue.expect_asset().return_const(AssetKind::Sui);

    let result = h.ledger.register_venue(&h.cap, Arc::new(venue), tier(1)).await;
    assert!(matches!(result, Err(LedgerError::AssetMismatch { .. })));
    assert!(h.selector.registered().await.is_empty());
}

// ---- End-to-end With Simulated Venues ----

#[tokio::test]
async fn test_full_lifecycle_with_rebalance_and_sweep() {
    let h = harness();
    let navi = Arc::new(SimulatedVenue::new(ProtocolId::Navi, AssetKind::Usdc, 500).with_base_tvl(10_000_000));
    let scallop =
        Arc::new(SimulatedVenue::new(ProtocolId::Scallop, AssetKind::Usdc, 400).with_base_tvl(10_000_000));
    h.ledger.register_venue(&h.cap, navi.clone(), tier(3)).await.unwrap();
    h.ledger.register_venue(&h.cap, scallop.clone(), tier(3)).await.unwrap();
    let mut rx = h.sink.subscribe();

    // ── Open and bet ──
    let market_id = h
        .ledger
        .create_market(&h.cap, "Will SUI close above $2?", "Settles on the daily close", 3_600)
        .await
        .unwrap();
    let alice = AccountId::from("alice");
    let bob = AccountId::from("bob");
    let alice_bet = h.ledger.place_bet(&alice, market_id, Position::Yes, 6_000).await.unwrap();
    let bob_bet = h.ledger.place_bet(&bob, market_id, Position::No, 4_000).await.unwrap();

    let escrow = AccountId::market_escrow("escrow", AssetKind::Usdc, market_id);
    assert_eq!(navi.balance(&escrow).await.unwrap(), 9_900);
    let odds = h.ledger.get_odds(market_id).await.unwrap();
    assert_eq!((odds.yes_pct, odds.no_pct), (60, 40));

    // ── Scallop overtakes Navi; the agent migrates the escrow ──
    scallop.set_apy(900).await;
    let agent = RebalancingAgent::new(
        h.selector.clone(),
        h.clock.clone(),
        h.sink.clone(),
        RebalanceConfig {
            enabled: true,
            threshold_bp: 100,
            min_rebalance_amount: 1_000,
            min_interval: 3_600,
        },
    );
    let report = agent.run_once().await.unwrap();
    assert_eq!(report.executed.len(), 1);
    assert_eq!(scallop.balance(&escrow).await.unwrap(), 9_900);
    assert_eq!(navi.balance(&escrow).await.unwrap(), 0);

    // ── Yield accrues, market closes ──
    scallop.credit_yield(&escrow, 1_000).await;
    assert!(matches!(
        h.ledger.claim_winnings(&alice, market_id, alice_bet).await,
        Err(LedgerError::MarketNotResolved(_))
    ));
    h.clock.advance(3_600);
    assert_eq!(h.ledger.market_state(market_id).await.unwrap(), MarketState::Closed);

    // ── Resolve: 1_000 raw yield, 200 protocol fee, 800 to bettors ──
    let resolution = h.ledger.resolve_market(&h.cap, market_id, Position::Yes).await.unwrap();
    assert_eq!(resolution.total_balance, 10_900);
    assert_eq!(resolution.raw_yield, 1_000);
    assert_eq!(resolution.protocol_fee, 200);
    assert_eq!(resolution.final_yield, 800);
    assert_eq!(resolution.distributed, 800);

    // ── Claims ──
    let alice_claim = h.ledger.claim_winnings(&alice, market_id, alice_bet).await.unwrap();
    assert_eq!(alice_claim.principal, 9_900);
    assert_eq!(alice_claim.yield_share, 480);
    assert_eq!(alice_claim.total, 10_380);

    let bob_claim = h.ledger.claim_winnings(&bob, market_id, bob_bet).await.unwrap();
    assert_eq!(bob_claim.principal, 0);
    assert_eq!(bob_claim.yield_share, 320);
    assert!(matches!(
        h.ledger.claim_winnings(&bob, market_id, bob_bet).await,
        Err(LedgerError::BetAlreadyClaimed { .. })
    ));

    // ── Fees: only the retained protocol fee remains in escrow ──
    assert_eq!(h.ledger.escrow_balance(market_id).await.unwrap(), 200);
    let sweep = h.ledger.sweep_fees(&h.cap).await.unwrap();
    assert_eq!(sweep.recipient, AccountId::from("treasury"));
    assert_eq!(sweep.protocol_fees, 200);
    assert_eq!(sweep.transaction_fees, 100);
    assert_eq!(h.ledger.escrow_balance(market_id).await.unwrap(), 0);

    assert_eq!(
        drain(&mut rx),
        vec![
            "market_created",
            "bet_placed",
            "yield_deposited",
            "bet_placed",
            "yield_deposited",
            "rebalanced",
            "market_resolved",
            "winnings_claimed",
            "winnings_claimed",
            "fees_swept",
        ]
    );
}

#[tokio::test]
async fn test_snapshot_restores_settled_books() {
    let h = harness();
    let navi = Arc::new(SimulatedVenue::new(ProtocolId::Navi, AssetKind::Usdc, 500));
    h.ledger.register_venue(&h.cap, navi.clone(), tier(3)).await.unwrap();

    let market_id = h.ledger.create_market(&h.cap, "Rain?", "", 60).await.unwrap();
    let carol = AccountId::from("carol");
    h.ledger.place_bet(&carol, market_id, Position::No, 2_000).await.unwrap();
    h.clock.advance(60);
    h.ledger.resolve_market(&h.cap, market_id, Position::No).await.unwrap();

    let snapshot = h.ledger.snapshot().await;
    let json = serde_json::to_string(&snapshot).unwrap();
    let snapshot = serde_json::from_str(&json).unwrap();

    let authorizer = Arc::new(CapabilityAuthorizer::new());
    let restored: Ledger = MarketLedger::restore(
        snapshot,
        h.selector.clone(),
        authorizer.clone(),
        h.clock.clone(),
        h.sink.clone(),
    )
    .unwrap();

    assert_eq!(restored.id(), h.ledger.id());
    assert_eq!(restored.market_count().await, 1);
    assert_eq!(restored.get_user_bets(&carol).await.len(), 1);
    assert_eq!(restored.market_state(market_id).await.unwrap(), MarketState::Resolved);

    // the old cap was issued by another authorizer
    assert!(matches!(restored.pause(&h.cap).await, Err(LedgerError::NotOwner)));
    let cap = authorizer.issue(restored.id(), AccountId::from("admin"));
    restored.pause(&cap).await.unwrap();
    assert!(restored.is_paused().await);
}

// ---- Concurrency ----

async fn resolved_two_sided_market() -> (Arc<Ledger>, Arc<SimulatedVenue>, u64, u64) {
    let h = harness();
    let navi = Arc::new(SimulatedVenue::new(ProtocolId::Navi, AssetKind::Usdc, 500));
    h.ledger.register_venue(&h.cap, navi.clone(), tier(3)).await.unwrap();

    let market_id = h.ledger.create_market(&h.cap, "Rain?", "", 60).await.unwrap();
    let alice_bet = h
        .ledger
        .place_bet(&AccountId::from("alice"), market_id, Position::Yes, 1_000)
        .await
        .unwrap();
    h.ledger
        .place_bet(&AccountId::from("bob"), market_id, Position::No, 1_000)
        .await
        .unwrap();
    let escrow = AccountId::market_escrow("escrow", AssetKind::Usdc, market_id);
    navi.credit_yield(&escrow, 1_000).await;
    h.clock.advance(60);
    h.ledger.resolve_market(&h.cap, market_id, Position::Yes).await.unwrap();

    (Arc::new(h.ledger), navi, market_id, alice_bet)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_claims_pay_exactly_once() {
    let (ledger, _navi, market_id, bet_id) = resolved_two_sided_market().await;
    // 2_980 escrowed: alice is owed 1_980 principal + 400 yield
    assert_eq!(ledger.escrow_balance(market_id).await.unwrap(), 2_980);

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let ledger = Arc::clone(&ledger);
            tokio::spawn(async move {
                ledger
                    .claim_winnings(&AccountId::from("alice"), market_id, bet_id)
                    .await
            })
        })
        .collect();

    let mut paid = Vec::new();
    let mut rejected = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(receipt) => paid.push(receipt),
            Err(LedgerError::BetAlreadyClaimed { .. }) => rejected += 1,
            Err(e) => panic!("unexpected claim error: {e}"),
        }
    }

    assert_eq!(paid.len(), 1);
    assert_eq!(rejected, 15);
    assert_eq!(paid[0].total, 2_380);
    assert_eq!(paid[0].withdrawal.total, 2_380);
    // bob's 400 yield share and the 200 protocol fee remain
    assert_eq!(ledger.escrow_balance(market_id).await.unwrap(), 600);
    assert!(ledger.get_bet(market_id, bet_id).await.unwrap().claimed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_claims_racing_resolution_see_a_complete_distribution() {
    let h = harness();
    let navi = Arc::new(SimulatedVenue::new(ProtocolId::Navi, AssetKind::Usdc, 500));
    h.ledger.register_venue(&h.cap, navi.clone(), tier(3)).await.unwrap();
    let market_id = h.ledger.create_market(&h.cap, "Rain?", "", 60).await.unwrap();
    let bet_id = h
        .ledger
        .place_bet(&AccountId::from("carol"), market_id, Position::No, 2_000)
        .await
        .unwrap();
    let escrow = AccountId::market_escrow("escrow", AssetKind::Usdc, market_id);
    navi.credit_yield(&escrow, 500).await;
    h.clock.advance(60);

    let ledger = Arc::new(h.ledger);
    let cap = h.cap;
    let claims: Vec<_> = (0..8)
        .map(|_| {
            let ledger = Arc::clone(&ledger);
            tokio::spawn(async move {
                ledger
                    .claim_winnings(&AccountId::from("carol"), market_id, bet_id)
                    .await
            })
        })
        .collect();
    let resolver = {
        let ledger = Arc::clone(&ledger);
        tokio::spawn(async move { ledger.resolve_market(&cap, market_id, Position::No).await })
    };

    resolver.await.unwrap().unwrap();
    let mut paid = Vec::new();
    for handle in claims {
        match handle.await.unwrap() {
            Ok(receipt) => paid.push(receipt),
            Err(LedgerError::MarketNotResolved(_) | LedgerError::BetAlreadyClaimed { .. }) => {}
            Err(e) => panic!("unexpected claim error: {e}"),
        }
    }
    assert!(paid.len() <= 1);
    if paid.is_empty() {
        paid.push(
            ledger
                .claim_winnings(&AccountId::from("carol"), market_id, bet_id)
                .await
                .unwrap(),
        );
    }

    // 1_980 net, 500 raw yield less the 20% fee
    assert_eq!(paid[0].total, 1_980 + 400);
    assert_eq!(ledger.escrow_balance(market_id).await.unwrap(), 100);
}
