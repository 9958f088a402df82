//! Fixtures shared by the service tests: an in-memory engine and a scripted
//! payment rail.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use checkout_core::loyalty::LoyaltyProgram;
use checkout_core::returns::ReturnPolicy;
use checkout_core::{Money, PaymentProvider, TaxRate};
use checkout_db::{Database, DbConfig, NewOrder, NewOrderItem};

use crate::checkout::CheckoutService;
use crate::error::ProviderResult;
use crate::gateway::{
    ChargeHandle, ChargeOutcome, ChargeRequest, CodGateway, GatewayRegistry, PaymentGateway,
    RefundReceipt,
};
use crate::notify::{ChannelNotifier, Notification, Notifier};
use crate::payment::PaymentService;
use crate::returns::ReturnService;

// =============================================================================
// Fake Gateway
// =============================================================================

struct Script {
    start: ProviderResult<ChargeHandle>,
    confirm: ProviderResult<ChargeOutcome>,
    refund: ProviderResult<RefundReceipt>,
    confirm_calls: usize,
    refunds: Vec<(String, i64)>,
}

/// A rail that answers from a script and counts what it was asked.
#[derive(Clone)]
pub struct FakeGateway {
    provider: PaymentProvider,
    webhook_secret: Option<String>,
    script: Arc<Mutex<Script>>,
}

impl FakeGateway {
    pub fn new(provider: PaymentProvider) -> Self {
        FakeGateway {
            provider,
            webhook_secret: None,
            script: Arc::new(Mutex::new(Script {
                start: Ok(ChargeHandle {
                    charge_id: "pi_fake".into(),
                    redirect_or_client_secret: "secret_pi_fake".into(),
                }),
                confirm: Ok(ChargeOutcome::Pending),
                refund: Ok(RefundReceipt {
                    refund_id: "re_fake".into(),
                }),
                confirm_calls: 0,
                refunds: Vec::new(),
            })),
        }
    }

    pub fn start_with(self, result: ProviderResult<ChargeHandle>) -> Self {
        self.script.lock().unwrap().start = result;
        self
    }

    pub fn confirm_with(self, result: ProviderResult<ChargeOutcome>) -> Self {
        self.script.lock().unwrap().confirm = result;
        self
    }

    pub fn refund_with(self, result: ProviderResult<RefundReceipt>) -> Self {
        self.script.lock().unwrap().refund = result;
        self
    }

    pub fn with_webhook_secret(mut self, secret: &str) -> Self {
        self.webhook_secret = Some(secret.to_string());
        self
    }

    pub fn confirm_calls(&self) -> usize {
        self.script.lock().unwrap().confirm_calls
    }

    /// `(transaction id, cents)` per refund call, in order.
    pub fn refunds(&self) -> Vec<(String, i64)> {
        self.script.lock().unwrap().refunds.clone()
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    fn provider(&self) -> PaymentProvider {
        self.provider
    }

    async fn start_charge(&self, _request: &ChargeRequest) -> ProviderResult<ChargeHandle> {
        self.script.lock().unwrap().start.clone()
    }

    async fn confirm_charge(&self, _charge_id: &str) -> ProviderResult<ChargeOutcome> {
        let mut script = self.script.lock().unwrap();
        script.confirm_calls += 1;
        script.confirm.clone()
    }

    async fn refund(
        &self,
        transaction_id: &str,
        amount: Money,
        _reason: &str,
    ) -> ProviderResult<RefundReceipt> {
        let mut script = self.script.lock().unwrap();
        script.refunds.push((transaction_id.to_string(), amount.cents()));
        script.refund.clone()
    }

    fn webhook_secret(&self) -> Option<&str> {
        self.webhook_secret.as_deref()
    }
}

// =============================================================================
// Engine
// =============================================================================

pub struct TestEngine {
    pub db: Database,
    pub payments: PaymentService,
    pub returns: ReturnService,
    pub checkout: CheckoutService,
    pub notifications: mpsc::Receiver<Notification>,
}

impl TestEngine {
    pub fn drain_notifications(&mut self) -> Vec<Notification> {
        let mut out = Vec::new();
        while let Ok(n) = self.notifications.try_recv() {
            out.push(n);
        }
        out
    }
}

/// Engine over a fresh in-memory database with COD plus `fakes` registered.
pub async fn engine(fakes: Vec<FakeGateway>) -> TestEngine {
    let db = Database::new(DbConfig::in_memory()).await.unwrap();
    engine_over(db, fakes)
}

/// Engine over a file-backed database whose pool can run requests in
/// parallel. Keep the `TempDir` alive for the test's duration.
pub async fn file_engine(fakes: Vec<FakeGateway>) -> (tempfile::TempDir, TestEngine) {
    let dir = tempfile::tempdir().unwrap();
    let config = DbConfig::new(dir.path().join("checkout.db")).max_connections(4);
    let db = Database::new(config).await.unwrap();
    (dir, engine_over(db, fakes))
}

fn engine_over(db: Database, fakes: Vec<FakeGateway>) -> TestEngine {
    let mut gateways = GatewayRegistry::new();
    gateways.register(Arc::new(CodGateway));
    for fake in fakes {
        gateways.register(Arc::new(fake));
    }

    let (notifier, notifications) = ChannelNotifier::new(64);
    let notifier: Arc<dyn Notifier> = Arc::new(notifier);

    let payments = PaymentService::new(db.clone(), gateways, notifier.clone(), LoyaltyProgram::default());
    let returns = ReturnService::new(db.clone(), payments.clone(), notifier.clone(), ReturnPolicy::default());
    let checkout = CheckoutService::new(db.clone(), notifier, TaxRate::default(), LoyaltyProgram::default());

    TestEngine {
        db,
        payments,
        returns,
        checkout,
        notifications,
    }
}

/// An unpaid order: one line per `(price, qty)`, no tax, nothing covered.
pub async fn pending_order_with(db: &Database, user_id: &str, lines: &[(i64, i64)]) -> String {
    let items: Vec<NewOrderItem> = lines
        .iter()
        .enumerate()
        .map(|(i, (price, qty))| NewOrderItem {
            product_id: format!("product-{}", i),
            name: format!("Item {}", i),
            quantity: *qty,
            unit_price: Money::from_cents(*price),
        })
        .collect();
    let total: Money = items
        .iter()
        .map(|i| i.unit_price.multiply_quantity(i.quantity))
        .sum();

    let order = db
        .orders()
        .place_order(NewOrder {
            user_id: user_id.to_string(),
            items,
            subtotal: total,
            discount: Money::zero(),
            tax: Money::zero(),
            grand_total: total,
            coupon: None,
            loyalty_points: 0,
            loyalty_discount: Money::zero(),
            gift_card_requested: Money::zero(),
            today: chrono::Utc::now().date_naive(),
        })
        .await
        .unwrap();
    order.id
}

pub async fn pending_order(db: &Database, user_id: &str, cents: i64) -> String {
    pending_order_with(db, user_id, &[(cents, 1)]).await
}

/// An order paid through `provider`. Online rails must be scripted to
/// confirm with `Succeeded`.
pub async fn paid_order(
    t: &TestEngine,
    user_id: &str,
    lines: &[(i64, i64)],
    provider: PaymentProvider,
) -> String {
    let order_id = pending_order_with(&t.db, user_id, lines).await;
    let started = t.payments.start(user_id, &order_id, provider).await.unwrap();
    assert!(started.ok);

    if provider.is_online() {
        let confirmed = t.payments.confirm(provider, "pi_fake").await.unwrap();
        assert!(confirmed.ok);
    } else {
        t.payments.reconcile_cod(&order_id).await.unwrap();
    }
    order_id
}
