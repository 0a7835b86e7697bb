use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::config::Config;
use crate::domain::{ChainDescriptor, TokenRegistry, TransactionStatus};
use crate::error::{ReportError, TransactionError};
use crate::infrastructure::event_bus::{BroadcastEventBus, EventBus};
use crate::service::{
    BalanceAggregator, ConnectionManager, ConversionPipeline, HttpRateSource, PaymentCodec,
    RateOracleClient, RateSource, Receipt, TransactionHandle, TransactionRecord,
    TransactionReporter, TransactionSubmitter, WalletProvider,
};

/// 钱包上下文
/// 每个组件一个实例，通过 Arc 注入依赖方（没有全局单例）
#[derive(Clone)]
pub struct WalletContext {
    pub config: Arc<Config>,
    pub registry: Arc<TokenRegistry>,
    pub chain: Arc<ChainDescriptor>,
    pub events: Arc<dyn EventBus>,
    pub connection: Arc<ConnectionManager>,
    pub balances: Arc<BalanceAggregator>,
    pub rates: Arc<RateOracleClient>,
    pub codec: Arc<PaymentCodec>,
    pub conversion: Arc<ConversionPipeline>,
    pub submitter: Arc<TransactionSubmitter>,
    pub reporter: Arc<TransactionReporter>,
}

/// 已提交的支付：链上句柄 + 上报记录 + 上报结果
pub struct SubmittedPayment {
    pub handle: TransactionHandle,
    pub record: TransactionRecord,
    pub report: Result<(), ReportError>,
}

impl WalletContext {
    /// 使用 HTTP 价格源创建上下文
    pub fn new(config: Arc<Config>, provider: Arc<dyn WalletProvider>) -> Self {
        let rate_source = Arc::new(HttpRateSource::new(config.rates.clone()));
        Self::with_rate_source(config, provider, rate_source)
    }

    pub fn with_rate_source(
        config: Arc<Config>,
        provider: Arc<dyn WalletProvider>,
        rate_source: Arc<dyn RateSource>,
    ) -> Self {
        let registry = Arc::new(TokenRegistry::builtin());
        let chain = Arc::new(ChainDescriptor::from_config(&config.wallet));
        let events: Arc<dyn EventBus> = Arc::new(BroadcastEventBus::new());

        let connection = Arc::new(ConnectionManager::new(
            provider,
            (*chain).clone(),
            events.clone(),
        ));

        let balances = Arc::new(BalanceAggregator::new(
            connection.clone(),
            registry.clone(),
            Duration::from_millis(config.balances.debounce_ms),
        ));

        let rates = Arc::new(RateOracleClient::new(
            rate_source,
            registry.clone(),
            config.rates.clone(),
            chain.chain_id,
        ));
        let codec = Arc::new(PaymentCodec::new(registry.clone(), chain.chain_id));
        let conversion = Arc::new(ConversionPipeline::new(rates.clone(), codec.clone()));

        let submitter = Arc::new(TransactionSubmitter::new(
            connection.clone(),
            registry.clone(),
            Duration::from_millis(config.wallet.confirmation_poll_ms),
        ));
        let reporter = Arc::new(TransactionReporter::new(&config.backend));

        tracing::info!(
            chain_id = chain.chain_id,
            tokens = registry.len(),
            "Wallet context initialized"
        );

        Self {
            config,
            registry,
            chain,
            events,
            connection,
            balances,
            rates,
            codec,
            conversion,
            submitter,
            reporter,
        }
    }

    /// 启动后台任务：Provider 事件泵 + 余额自动刷新
    pub fn start(&self) -> Vec<JoinHandle<()>> {
        // 先订阅会话事件，再开始处理 Provider 事件
        let refresher = self.balances.run_auto_refresh();
        let pump = self.connection.spawn_event_pump();
        vec![refresher, pump]
    }

    /// 提交支付并上报 pending 记录
    ///
    /// 上报失败不影响链上交易，结果放在 `SubmittedPayment::report` 中交给调用方。
    pub async fn submit_payment(
        &self,
        recipient: &str,
        amount: &str,
        symbol: &str,
        description: Option<String>,
    ) -> Result<SubmittedPayment, TransactionError> {
        let snapshot = self.balances.snapshot();
        self.submitter
            .validate_transfer(recipient, amount, symbol, snapshot.as_deref())?;

        let handle = self.submitter.transfer(recipient, amount, symbol).await?;
        let from = self
            .connection
            .session()
            .map(|s| s.address)
            .unwrap_or_default();

        let mut record = TransactionRecord::pending(
            handle.hash(),
            &from,
            recipient.trim(),
            symbol,
            amount.trim(),
            self.chain.chain_id,
        );
        if let Some(description) = description {
            record = record.with_description(description);
        }

        let report = self.reporter.report(&record).await;
        if let Err(e) = &report {
            tracing::warn!(error = %e, code = e.code(), "Failed to report submitted transaction");
        }

        Ok(SubmittedPayment {
            handle,
            record,
            report,
        })
    }

    /// 等待确认并上报最终状态
    ///
    /// 轮询本身失败时状态未知，不上报。
    pub async fn confirm_payment(
        &self,
        payment: &SubmittedPayment,
    ) -> (Result<Receipt, TransactionError>, Result<(), ReportError>) {
        let receipt = payment.handle.wait().await;
        let status = match &receipt {
            Ok(receipt) => receipt.status,
            Err(TransactionError::Reverted(_)) => TransactionStatus::Failed,
            Err(_) => return (receipt, Ok(())),
        };

        let report = self
            .reporter
            .update_status(payment.handle.hash(), status)
            .await;
        if let Err(e) = &report {
            tracing::warn!(error = %e, code = e.code(), "Failed to report transaction status");
        }

        // 余额已变化
        if receipt.is_ok() {
            self.balances.refresh().await;
        }

        (receipt, report)
    }
}
