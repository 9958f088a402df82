//! Cash on delivery: no provider, nothing to call.
//!
//! Payments start PENDING and are settled by manual reconciliation, so the
//! only operation that succeeds here is `start_charge`.

use async_trait::async_trait;

use checkout_core::{Money, PaymentProvider};

use super::{ChargeHandle, ChargeOutcome, ChargeRequest, PaymentGateway, RefundReceipt};
use crate::error::{ProviderError, ProviderResult};

#[derive(Debug, Clone, Copy, Default)]
pub struct CodGateway;

#[async_trait]
impl PaymentGateway for CodGateway {
    fn provider(&self) -> PaymentProvider {
        PaymentProvider::Cod
    }

    async fn start_charge(&self, request: &ChargeRequest) -> ProviderResult<ChargeHandle> {
        Ok(ChargeHandle {
            charge_id: format!("cod-{}", request.payment_id),
            redirect_or_client_secret: format!("/orders/{}", request.order_id),
        })
    }

    async fn confirm_charge(&self, _charge_id: &str) -> ProviderResult<ChargeOutcome> {
        Ok(ChargeOutcome::Pending)
    }

    async fn refund(&self, _transaction_id: &str, _amount: Money, _reason: &str) -> ProviderResult<RefundReceipt> {
        Err(ProviderError::Unsupported {
            provider: PaymentProvider::Cod,
            operation: "refund",
        })
    }
}
