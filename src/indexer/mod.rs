//! Market directory and trading activity backed by the GraphQL indexer
//!
//! The indexer only nominates candidates. Whatever it says, the engine re-reads
//! each market from the contract before acting. Activity and positions feed the
//! advisory heuristics and are never used to settle anything.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ethers::types::Address;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::str::FromStr;
use std::time::Duration;

use crate::chain::units::WEI_DECIMALS;
use crate::config::IndexerConfig;
use crate::types::{MarketActivity, Position};

const RESOLVABLE_MARKETS_QUERY: &str = r#"
query GetResolvableMarkets($currentTime: BigInt!, $limit: Int!) {
    Market(
        where: {
            status: {_eq: "Open"},
            resolutionTimestamp: {_lte: $currentTime}
        },
        limit: $limit
    ) {
        marketAddress
        collectionSlug
        targetPrice
        resolutionTimestamp
    }
}
"#;

const MARKET_ACTIVITY_QUERY: &str = r#"
query GetMarketActivity($id: String!) {
    Market(where: {id: {_eq: $id}}) {
        yesSharesTotal
        noSharesTotal
        totalVolume
        totalTrades
    }
}
"#;

const POSITIONS_QUERY: &str = r#"
query GetPositions($user: String!) {
    Position(where: {user_id: {_eq: $user}}) {
        market_id
        yesShares
        noShares
        totalInvested
        realizedPnL
    }
}
"#;

/// Lists markets that look due for resolution
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketDirectory: Send + Sync {
    async fn resolvable_markets(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Address>>;
}

/// Trading activity for the advisory agents
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ActivityFeed: Send + Sync {
    /// `None` when the indexer has not seen the market
    async fn market_activity(&self, market_id: Address) -> Result<Option<MarketActivity>>;

    async fn positions(&self, user: Address) -> Result<Vec<Position>>;
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct MarketsData {
    #[serde(rename = "Market", default)]
    markets: Vec<MarketRow>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MarketRow {
    market_address: String,
}

#[derive(Debug, Deserialize)]
struct ActivityData {
    #[serde(rename = "Market", default)]
    markets: Vec<ActivityRow>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ActivityRow {
    yes_shares_total: Value,
    no_shares_total: Value,
    total_volume: Value,
    total_trades: Value,
}

#[derive(Debug, Deserialize)]
struct PositionsData {
    #[serde(rename = "Position", default)]
    positions: Vec<PositionRow>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PositionRow {
    #[serde(rename = "market_id")]
    market_id: String,
    yes_shares: Value,
    no_shares: Value,
    total_invested: Value,
    #[serde(rename = "realizedPnL")]
    realized_pnl: Value,
}

/// BigInt columns arrive as strings or plain numbers depending on size
fn big_int(value: &Value, field: &str) -> Result<i128> {
    match value {
        Value::String(text) => text
            .parse::<i128>()
            .with_context(|| format!("{} is not an integer: {}", field, text)),
        Value::Number(n) => n
            .as_i64()
            .map(i128::from)
            .ok_or_else(|| anyhow!("{} is not an integer: {}", field, n)),
        Value::Null => Ok(0),
        other => bail!("{} has unexpected type: {}", field, other),
    }
}

/// Wei column to whole units
fn wei(value: &Value, field: &str) -> Result<Decimal> {
    let raw = big_int(value, field)?;
    Decimal::try_from_i128_with_scale(raw, WEI_DECIMALS)
        .map(|d| d.normalize())
        .with_context(|| format!("{} out of range: {}", field, raw))
}

fn decode<T: DeserializeOwned>(body: &str) -> Result<Option<T>> {
    let response: GraphQlResponse<T> =
        serde_json::from_str(body).context("Indexer returned invalid JSON")?;

    if let Some(first) = response.errors.first() {
        bail!("Indexer query failed: {}", first.message);
    }
    Ok(response.data)
}

pub struct IndexerClient {
    client: Client,
    graphql_url: String,
}

impl IndexerClient {
    pub fn new(config: &IndexerConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .context("Failed to build indexer HTTP client")?;
        Ok(Self {
            client,
            graphql_url: config.graphql_url.clone(),
        })
    }

    async fn query(&self, query: &str, variables: Value) -> Result<String> {
        let body = json!({
            "query": query,
            "variables": variables,
        });

        let response = self
            .client
            .post(&self.graphql_url)
            .json(&body)
            .send()
            .await
            .context("Indexer request failed")?;

        let status = response.status();
        let text = response.text().await.context("Failed to read indexer response")?;
        if !status.is_success() {
            bail!("Indexer returned {}: {}", status, text);
        }
        Ok(text)
    }
}

/// Pull market addresses out of a GraphQL response body; malformed rows are skipped
fn parse_markets(body: &str) -> Result<Vec<Address>> {
    let rows = decode::<MarketsData>(body)?
        .map(|d| d.markets)
        .unwrap_or_default();
    let mut markets = Vec::with_capacity(rows.len());
    for row in rows {
        match Address::from_str(&row.market_address) {
            Ok(address) => markets.push(address),
            Err(e) => tracing::warn!(
                market = %row.market_address,
                error = %e,
                "Skipping indexer row with bad address"
            ),
        }
    }
    Ok(markets)
}

fn parse_activity(body: &str) -> Result<Option<MarketActivity>> {
    let Some(row) = decode::<ActivityData>(body)?.and_then(|d| d.markets.into_iter().next())
    else {
        return Ok(None);
    };

    let trades = big_int(&row.total_trades, "totalTrades")?;
    Ok(Some(MarketActivity {
        yes_shares: wei(&row.yes_shares_total, "yesSharesTotal")?,
        no_shares: wei(&row.no_shares_total, "noSharesTotal")?,
        total_volume: wei(&row.total_volume, "totalVolume")?,
        total_trades: u64::try_from(trades)
            .with_context(|| format!("totalTrades out of range: {}", trades))?,
    }))
}

/// Positions in a GraphQL response body; a row that does not parse fails the lot
/// so the risk score never sees a partial portfolio
fn parse_positions(body: &str) -> Result<Vec<Position>> {
    let rows = decode::<PositionsData>(body)?
        .map(|d| d.positions)
        .unwrap_or_default();

    rows.iter()
        .map(|row| {
            Ok(Position {
                market_id: Address::from_str(&row.market_id)
                    .with_context(|| format!("Bad market id in position: {}", row.market_id))?,
                yes_shares: wei(&row.yes_shares, "yesShares")?,
                no_shares: wei(&row.no_shares, "noShares")?,
                total_invested: wei(&row.total_invested, "totalInvested")?,
                realized_pnl: wei(&row.realized_pnl, "realizedPnL")?,
            })
        })
        .collect()
}

#[async_trait]
impl MarketDirectory for IndexerClient {
    async fn resolvable_markets(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Address>> {
        let variables = json!({
            "currentTime": now.timestamp().to_string(),
            "limit": limit,
        });
        let text = self.query(RESOLVABLE_MARKETS_QUERY, variables).await?;

        let markets = parse_markets(&text)?;
        tracing::debug!(count = markets.len(), "Resolvable markets listed");
        Ok(markets)
    }
}

#[async_trait]
impl ActivityFeed for IndexerClient {
    async fn market_activity(&self, market_id: Address) -> Result<Option<MarketActivity>> {
        let variables = json!({ "id": format!("{:#x}", market_id) });
        let text = self.query(MARKET_ACTIVITY_QUERY, variables).await?;
        parse_activity(&text)
    }

    async fn positions(&self, user: Address) -> Result<Vec<Position>> {
        let variables = json!({ "user": format!("{:#x}", user) });
        let text = self.query(POSITIONS_QUERY, variables).await?;

        let positions = parse_positions(&text)?;
        tracing::debug!(
            user = %format!("{:#x}", user),
            count = positions.len(),
            "Positions listed"
        );
        Ok(positions)
    }
}
