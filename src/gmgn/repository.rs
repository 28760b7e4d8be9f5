use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use super::{Direction, GmgnEndpoint, Period, RepositoryError, Timeframe, WalletTag};
use crate::core::{ExecutionResult, RequestDescriptor};
use crate::fetcher::{FetchError, FetchResult, Fetcher};

/// Domain lookups against the GMGN quotation API.
///
/// Every call goes through the shared [`Fetcher`], so lookups made from
/// different repositories still share one identity and one rotation policy.
#[derive(Clone)]
pub struct GmgnRepository {
    fetcher: Arc<Fetcher>,
}

impl GmgnRepository {
    pub fn new(fetcher: Arc<Fetcher>) -> Self {
        Self { fetcher }
    }

    pub fn fetcher(&self) -> &Arc<Fetcher> {
        &self.fetcher
    }

    pub async fn trending_wallets(
        &self,
        timeframe: Timeframe,
        tag: WalletTag,
        direction: Direction,
    ) -> FetchResult<Value> {
        let descriptor = self
            .descriptor(GmgnEndpoint::TrendingWallets { timeframe })?
            .with_params([
                ("tag", tag.to_string()),
                ("orderby", format!("pnl_{timeframe}")),
                ("direction", direction.to_string()),
            ]);
        self.fetch(descriptor).await
    }

    pub async fn token_info(&self, contract_address: &str) -> FetchResult<Value> {
        let contract_address = checked_address("contract address", contract_address)?;
        let descriptor = self.descriptor(GmgnEndpoint::TokenInfo { contract_address })?;
        self.fetch(descriptor).await
    }

    pub async fn wallet_info(
        &self,
        wallet_address: &str,
        period: Period,
        timeout: Option<Duration>,
    ) -> FetchResult<Value> {
        let descriptor = self.wallet_descriptor(wallet_address, period, timeout)?;
        self.fetch(descriptor).await
    }

    /// Looks up several wallets in one concurrent batch. Slots line up with
    /// `wallet_addresses`; a failed lookup leaves `None` in its slot.
    pub async fn wallet_infos<S: AsRef<str>>(
        &self,
        wallet_addresses: &[S],
        period: Period,
        timeout: Option<Duration>,
    ) -> FetchResult<Vec<Option<Value>>> {
        let descriptors = wallet_addresses
            .iter()
            .map(|address| self.wallet_descriptor(address.as_ref(), period, timeout))
            .collect::<FetchResult<Vec<_>>>()?;

        let results = self.fetcher.run_batch(descriptors).await?;
        Ok(results
            .into_iter()
            .map(ExecutionResult::into_body)
            .collect())
    }

    fn wallet_descriptor(
        &self,
        wallet_address: &str,
        period: Period,
        timeout: Option<Duration>,
    ) -> FetchResult<RequestDescriptor> {
        let wallet_address = checked_address("wallet address", wallet_address)?;
        let mut descriptor = self
            .descriptor(GmgnEndpoint::WalletInfo { wallet_address })?
            .with_param("period", period.as_str());
        if let Some(timeout) = timeout {
            descriptor = descriptor.with_timeout(timeout);
        }
        Ok(descriptor)
    }

    fn descriptor(&self, endpoint: GmgnEndpoint) -> FetchResult<RequestDescriptor> {
        let url = endpoint.url(&self.fetcher.config().base_url)?;
        Ok(RequestDescriptor::new(url))
    }

    async fn fetch(&self, descriptor: RequestDescriptor) -> FetchResult<Value> {
        let result = self.fetcher.fetch(descriptor).await?;
        match result.failure {
            Some(failure) => Err(FetchError::Request(failure)),
            None => Ok(result.body),
        }
    }
}

fn checked_address(kind: &'static str, address: &str) -> Result<String, RepositoryError> {
    let address = address.trim();
    if address.is_empty() {
        return Err(RepositoryError::MissingAddress(kind));
    }
    if address
        .chars()
        .any(|c| matches!(c, '/' | '?' | '#') || c.is_whitespace())
    {
        return Err(RepositoryError::InvalidAddress {
            kind,
            value: address.to_string(),
        });
    }
    Ok(address.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::RequestFailure;
    use crate::core::test_support::{Reply, ScriptedTransport};
    use serde_json::json;

    const WALLET_PATH: &str = "/defi/quotation/v1/smartmoney/sol/walletNew";

    fn repository(transport: Arc<ScriptedTransport>) -> GmgnRepository {
        let fetcher = Fetcher::builder()
            .with_transport(transport)
            .disable_pacing()
            .with_backoff(Duration::ZERO, Duration::ZERO)
            .build()
            .unwrap();
        GmgnRepository::new(Arc::new(fetcher))
    }

    #[tokio::test(start_paused = true)]
    async fn trending_wallets_sends_ranking_params() {
        let transport = ScriptedTransport::new();
        transport.script(
            "/defi/quotation/v1/rank/sol/wallets/7d",
            [Reply::json(json!({"data": {"rank": []}}))],
        );
        let repo = repository(transport.clone());

        let body = repo
            .trending_wallets(Timeframe::SevenDays, WalletTag::SmartDegen, Direction::Desc)
            .await
            .unwrap();

        assert_eq!(body, json!({"data": {"rank": []}}));
        let params = transport.params("/defi/quotation/v1/rank/sol/wallets/7d");
        assert_eq!(params.len(), 1);
        assert_eq!(params[0]["tag"], "smart_degen");
        assert_eq!(params[0]["orderby"], "pnl_7d");
        assert_eq!(params[0]["direction"], "desc");
    }

    #[tokio::test(start_paused = true)]
    async fn wallet_descriptor_carries_period_and_timeout() {
        let repo = repository(ScriptedTransport::new());
        let descriptor = repo
            .wallet_descriptor("Wa11et", Period::ThirtyDays, Some(Duration::from_secs(4)))
            .unwrap();

        assert_eq!(
            descriptor.url.as_str(),
            "https://gmgn.ai/defi/quotation/v1/smartmoney/sol/walletNew/Wa11et"
        );
        assert_eq!(descriptor.params.get("period").map(String::as_str), Some("30d"));
        assert_eq!(descriptor.timeout_override, Some(Duration::from_secs(4)));
    }

    #[tokio::test(start_paused = true)]
    async fn empty_addresses_are_rejected_before_any_request() {
        let transport = ScriptedTransport::new();
        let repo = repository(transport.clone());

        let err = repo.token_info("  ").await.unwrap_err();
        assert!(matches!(
            err,
            FetchError::Repository(RepositoryError::MissingAddress("contract address"))
        ));
        let err = repo
            .wallet_info("a/b", Period::SevenDays, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            FetchError::Repository(RepositoryError::InvalidAddress { .. })
        ));
        assert_eq!(transport.total_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_lookup_surfaces_request_failure() {
        let transport = ScriptedTransport::new();
        transport.script("/defi/quotation/v1/tokens/sol/Missing", [Reply::status(404)]);
        let repo = repository(transport);

        let err = repo.token_info("Missing").await.unwrap_err();
        assert!(matches!(err, FetchError::Request(RequestFailure::Status(404))));
    }

    #[tokio::test(start_paused = true)]
    async fn wallet_infos_keeps_slot_per_address() {
        let transport = ScriptedTransport::new();
        transport.script(&format!("{WALLET_PATH}/one"), [Reply::json(json!({"w": 1}))]);
        transport.script(&format!("{WALLET_PATH}/two"), [Reply::status(500)]);
        transport.script(
            &format!("{WALLET_PATH}/three"),
            [Reply::status(429), Reply::json(json!({"w": 3}))],
        );
        let repo = repository(transport);

        let infos = repo
            .wallet_infos(&["one", "two", "three"], Period::SevenDays, None)
            .await
            .unwrap();

        assert_eq!(infos, vec![Some(json!({"w": 1})), None, Some(json!({"w": 3}))]);
        assert_eq!(repo.fetcher().pending(), 0);
    }
}
