//! Korea Investment & Securities (KIS) overseas-stock REST client.
//!
//! Implements `BrokerGateway` with blocking HTTP calls. Authentication is an
//! OAuth client-credentials token held by a `TokenSession`.

pub mod session;
pub mod wire;

use chrono::{Duration as ChronoDuration, NaiveDate, Utc};
use log::{debug, info, warn};
use reqwest::blocking::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use trading::{
    BalanceSnapshot, BrokerGateway, GatewayError, Holding, Instrument, OrderAck, OrderRequest,
    OrderSide, OrderType,
};

use session::{AccessToken, TokenSession};
use wire::{
    BalanceBody, DailyPriceBody, Envelope, OrderBody, PresentBalanceBody, QuoteBody,
    TokenResponse,
};

pub const REAL_BASE_URL: &str = "https://openapi.koreainvestment.com:9443";
pub const VIRTUAL_BASE_URL: &str = "https://openapivts.koreainvestment.com:29443";

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);
/// Daily-price pages fetched at most per history request.
const MAX_HISTORY_PAGES: usize = 5;

/// Connection settings of the KIS client.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KisConfig {
    pub app_key: String,
    pub app_secret: String,
    /// Account number, `CANO` (8 digits) optionally followed by the product
    /// code (2 digits). A dash between the two is accepted.
    pub account: String,
    pub base_url: String,
    /// Use the paper-trading transaction ids.
    pub virtual_trading: bool,
    pub token_file: Option<PathBuf>,
}

impl Default for KisConfig {
    fn default() -> Self {
        Self {
            app_key: String::new(),
            app_secret: String::new(),
            account: String::new(),
            base_url: REAL_BASE_URL.to_string(),
            virtual_trading: false,
            token_file: Some(PathBuf::from("kis_token.json")),
        }
    }
}

impl fmt::Debug for KisConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KisConfig")
            .field("app_key", &mask(&self.app_key))
            .field("app_secret", &"***")
            .field("account", &mask(&self.account))
            .field("base_url", &self.base_url)
            .field("virtual_trading", &self.virtual_trading)
            .field("token_file", &self.token_file)
            .finish()
    }
}

fn mask(value: &str) -> String {
    let visible: String = value.chars().take(4).collect();
    format!("{}***", visible)
}

impl KisConfig {
    /// Splits the account into `(CANO, ACNT_PRDT_CD)`. The product code
    /// defaults to "01" when only the 8-digit account is configured.
    pub fn account_parts(&self) -> (String, String) {
        let digits: String = self.account.chars().filter(|c| !c.is_whitespace() && *c != '-').collect();
        match (digits.get(..8), digits.get(8..10)) {
            (Some(cano), Some(product)) => (cano.to_string(), product.to_string()),
            _ => (digits, "01".to_string()),
        }
    }

    pub fn validate(&self) -> Result<(), GatewayError> {
        let missing: Vec<&str> = [
            ("app_key", &self.app_key),
            ("app_secret", &self.app_secret),
            ("account", &self.account),
            ("base_url", &self.base_url),
        ]
        .into_iter()
        .filter(|(_, v)| v.trim().is_empty())
        .map(|(k, _)| k)
        .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(GatewayError::BrokerUnavailable(format!(
                "KIS configuration incomplete: missing {}",
                missing.join(", ")
            )))
        }
    }
}

/// Transport-level failures, mapped to `GatewayError` per call site.
#[derive(Error, Debug)]
enum KisError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("API error: {0}")]
    Api(String),

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

impl KisError {
    fn into_gateway(self) -> GatewayError {
        match self {
            KisError::Gateway(e) => e,
            other => GatewayError::BrokerUnavailable(other.to_string()),
        }
    }

    fn into_quote(self, symbol: &str) -> GatewayError {
        match self {
            KisError::Gateway(e) => e,
            other => GatewayError::QuoteUnavailable {
                symbol: symbol.to_string(),
                reason: other.to_string(),
            },
        }
    }
}

/// Transaction ids, real / virtual.
struct TrIds {
    real: &'static str,
    virtual_: &'static str,
}

const TR_QUOTE: TrIds = TrIds { real: "HHDFS76200200", virtual_: "HHDFS76200200" };
const TR_DAILY: TrIds = TrIds { real: "HHDFS76240000", virtual_: "HHDFS76240000" };
const TR_BALANCE: TrIds = TrIds { real: "TTTS3012R", virtual_: "VTTS3012R" };
const TR_PRESENT_BALANCE: TrIds = TrIds { real: "CTRP6504R", virtual_: "VTRP6504R" };
const TR_BUY: TrIds = TrIds { real: "TTTT1002U", virtual_: "VTTT1002U" };
const TR_SELL: TrIds = TrIds { real: "TTTT1006U", virtual_: "VTTT1001U" };

pub struct KisClient {
    config: KisConfig,
    http: Client,
    session: TokenSession,
}

impl KisClient {
    /// Builds the client. No network call happens until the first request.
    pub fn new(config: KisConfig) -> Result<Self, GatewayError> {
        config.validate()?;
        let http = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| GatewayError::BrokerUnavailable(format!("HTTP client: {}", e)))?;
        info!(
            "Initializing KIS client (base url {}, virtual={})",
            config.base_url, config.virtual_trading
        );
        Ok(Self {
            session: TokenSession::new(config.token_file.clone()),
            config,
            http,
        })
    }

    pub fn config(&self) -> &KisConfig {
        &self.config
    }

    fn tr_id(&self, ids: &TrIds) -> &'static str {
        if self.config.virtual_trading {
            ids.virtual_
        } else {
            ids.real
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn request_token(&self) -> Result<AccessToken, GatewayError> {
        let url = self.url("/oauth2/tokenP");
        info!("POST {} (requesting OAuth token)", url);
        let body = json!({
            "grant_type": "client_credentials",
            "appkey": self.config.app_key,
            "appsecret": self.config.app_secret,
        });
        let fetch = || -> Result<TokenResponse, KisError> {
            let resp = self.http.post(&url).json(&body).send()?;
            let status = resp.status();
            let text = resp.text()?;
            if !status.is_success() {
                return Err(KisError::Status {
                    status: status.as_u16(),
                    body: text,
                });
            }
            Ok(serde_json::from_str(&text)?)
        };
        let token = fetch().map_err(|e| {
            GatewayError::BrokerUnavailable(format!("authentication failed: {}", e))
        })?;
        Ok(AccessToken::new(
            token.access_token,
            Utc::now() + ChronoDuration::seconds(token.expires_in),
        ))
    }

    fn bearer(&self) -> Result<String, GatewayError> {
        self.session.bearer(Utc::now(), || self.request_token())
    }

    fn send<T: DeserializeOwned>(
        &self,
        request: reqwest::blocking::RequestBuilder,
        tr_id: &str,
    ) -> Result<Envelope<T>, KisError> {
        let token = self.bearer()?;
        let resp = request
            .header("content-type", "application/json; charset=utf-8")
            .header("authorization", format!("Bearer {}", token))
            .header("appkey", &self.config.app_key)
            .header("appsecret", &self.config.app_secret)
            .header("tr_id", tr_id)
            .header("custtype", "P")
            .send()?;
        let status = resp.status();
        let text = resp.text()?;
        debug!("{} -> HTTP {}: {}", tr_id, status, text);
        if !status.is_success() {
            if status == reqwest::StatusCode::UNAUTHORIZED {
                self.session.invalidate();
            }
            return Err(KisError::Status {
                status: status.as_u16(),
                body: text,
            });
        }
        let envelope: Envelope<T> = serde_json::from_str(&text)?;
        if !envelope.is_success() {
            return Err(KisError::Api(envelope.failure()));
        }
        Ok(envelope)
    }

    fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        tr: &TrIds,
        query: &[(&str, String)],
    ) -> Result<Envelope<T>, KisError> {
        let url = self.url(path);
        debug!("GET {} {:?}", url, query);
        self.send(self.http.get(&url).query(query), self.tr_id(tr))
    }

    fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        tr: &TrIds,
        body: &serde_json::Value,
    ) -> Result<Envelope<T>, KisError> {
        let url = self.url(path);
        debug!("POST {} {}", url, body);
        self.send(self.http.post(&url).json(body), self.tr_id(tr))
    }

    /// One page of daily closes ending at `end` (today when `None`).
    fn daily_page(
        &self,
        instrument: &Instrument,
        end: Option<NaiveDate>,
    ) -> Result<Vec<(NaiveDate, f64)>, KisError> {
        let query = [
            ("AUTH", String::new()),
            ("EXCD", instrument.venue().quote_code().to_string()),
            ("SYMB", instrument.symbol().to_string()),
            ("GUBN", "0".to_string()),
            ("BYMD", end.map(|d| d.format("%Y%m%d").to_string()).unwrap_or_default()),
            ("MODP", "1".to_string()),
        ];
        let env: Envelope<DailyPriceBody> =
            self.get("/uapi/overseas-price/v1/quotations/dailyprice", &TR_DAILY, &query)?;

        let mut bars = Vec::with_capacity(env.body.output2.len());
        for bar in env.body.output2 {
            let (Ok(date), Some(close)) = (
                NaiveDate::parse_from_str(bar.xymd.trim(), "%Y%m%d"),
                wire::decimal(&bar.clos),
            ) else {
                debug!("Skipping malformed daily bar {:?}", bar);
                continue;
            };
            bars.push((date, close));
        }
        Ok(bars)
    }
}

impl BrokerGateway for KisClient {
    fn current_price(&self, instrument: &Instrument) -> Result<f64, GatewayError> {
        let symbol = instrument.symbol();
        let query = [
            ("AUTH", String::new()),
            ("EXCD", instrument.venue().quote_code().to_string()),
            ("SYMB", symbol.to_string()),
        ];
        let env: Envelope<QuoteBody> = self
            .get("/uapi/overseas-price/v1/quotations/price", &TR_QUOTE, &query)
            .map_err(|e| e.into_quote(symbol))?;

        match wire::decimal(&env.body.output.last).filter(|p| *p > 0.0) {
            Some(price) => {
                info!("{} = ${:.2} (base {})", instrument, price, env.body.output.base);
                Ok(price)
            }
            None => Err(GatewayError::QuoteUnavailable {
                symbol: symbol.to_string(),
                reason: format!("no last price in response ('{}')", env.body.output.last),
            }),
        }
    }

    fn daily_closes(
        &self,
        instrument: &Instrument,
        lookback: usize,
    ) -> Result<Vec<f64>, GatewayError> {
        let symbol = instrument.symbol();
        let mut bars: Vec<(NaiveDate, f64)> = Vec::with_capacity(lookback);
        let mut end = None;

        for _ in 0..MAX_HISTORY_PAGES {
            if bars.len() >= lookback {
                break;
            }
            let page = self
                .daily_page(instrument, end)
                .map_err(|e| e.into_quote(symbol))?;
            let before = bars.len();
            for (date, close) in page {
                // Pages overlap on their boundary day.
                if bars.last().map_or(true, |(last, _)| date < *last) {
                    bars.push((date, close));
                }
            }
            let Some((oldest, _)) = bars.last() else {
                break;
            };
            if bars.len() == before {
                break;
            }
            end = oldest.pred_opt();
        }

        bars.truncate(lookback);
        info!("{}: fetched {} daily closes", instrument, bars.len());
        if bars.is_empty() {
            return Err(GatewayError::InsufficientHistory {
                symbol: symbol.to_string(),
                got: 0,
                need: lookback,
            });
        }
        Ok(bars.into_iter().map(|(_, close)| close).collect())
    }

    fn balance(&self) -> Result<BalanceSnapshot, GatewayError> {
        let (cano, product) = self.config.account_parts();
        let query = [
            ("CANO", cano),
            ("ACNT_PRDT_CD", product),
            ("OVRS_EXCG_CD", "NASD".to_string()),
            ("TR_CRCY_CD", "USD".to_string()),
            ("CTX_AREA_FK200", String::new()),
            ("CTX_AREA_NK200", String::new()),
        ];
        let env: Envelope<BalanceBody> = self
            .get("/uapi/overseas-stock/v1/trading/inquire-balance", &TR_BALANCE, &query)
            .map_err(KisError::into_gateway)?;

        let mut holdings = Vec::with_capacity(env.body.output1.len());
        for row in env.body.output1 {
            let symbol = row.ovrs_pdno.trim().to_uppercase();
            let Some(qty) = wire::quantity(&row.ovrs_cblc_qty) else {
                warn!("Skipping balance row with unreadable quantity: {:?}", row);
                continue;
            };
            if symbol.is_empty() {
                continue;
            }
            let avg = wire::decimal(&row.pchs_avg_pric).unwrap_or(0.0);
            let now = wire::decimal(&row.now_pric2).unwrap_or(0.0);
            info!("  {}:{} qty={} avg={:.4} now={:.2}", row.ovrs_excg_cd, symbol, qty, avg, now);
            holdings.push(Holding::new(symbol, qty, avg, now));
        }
        info!("Balance: {} holdings", holdings.len());
        Ok(BalanceSnapshot::new(holdings))
    }

    fn buying_power(&self) -> Result<f64, GatewayError> {
        let (cano, product) = self.config.account_parts();
        let query = [
            ("CANO", cano),
            ("ACNT_PRDT_CD", product),
            ("WCRC_FRCR_DVSN_CD", "02".to_string()),
            ("NATN_CD", "840".to_string()),
            ("TR_MKET_CD", "00".to_string()),
            ("INQR_DVSN_CD", "00".to_string()),
        ];
        let env: Envelope<PresentBalanceBody> = self
            .get(
                "/uapi/overseas-stock/v1/trading/inquire-present-balance",
                &TR_PRESENT_BALANCE,
                &query,
            )
            .map_err(KisError::into_gateway)?;

        let cash = env
            .body
            .output2
            .first()
            .and_then(|o| wire::decimal(&o.ovrs_ord_psbl_amt))
            .ok_or_else(|| {
                GatewayError::BrokerUnavailable("present balance has no orderable amount".into())
            })?;
        info!("Available cash: ${:.2}", cash);
        Ok(cash)
    }

    fn place_order(&self, order: &OrderRequest) -> Result<OrderAck, GatewayError> {
        let symbol = order.symbol();
        let rejected = |reason: String| GatewayError::OrderRejected {
            symbol: symbol.to_string(),
            reason,
        };
        if order.order_type() != OrderType::Limit {
            return Err(rejected("only limit orders are supported for overseas stocks".into()));
        }

        let tr = match order.side() {
            OrderSide::Buy => &TR_BUY,
            OrderSide::Sell => &TR_SELL,
        };
        let (cano, product) = self.config.account_parts();
        let body = json!({
            "CANO": cano,
            "ACNT_PRDT_CD": product,
            "OVRS_EXCG_CD": order.instrument().venue().order_code(),
            "PDNO": symbol,
            "ORD_QTY": order.quantity().to_string(),
            "OVRS_ORD_UNPR": format!("{:.2}", order.price()),
            "ORD_SVR_DVSN_CD": "0",
            "ORD_DVSN": "00",
        });
        info!("Placing {} ({})", order, self.tr_id(tr));

        let env: Envelope<OrderBody> = self
            .post("/uapi/overseas-stock/v1/trading/order", tr, &body)
            .map_err(|e| match e {
                KisError::Gateway(e) => e,
                other => rejected(other.to_string()),
            })?;

        let (order_id, time) = env
            .body
            .output
            .map(|o| (o.order_no, o.order_time))
            .unwrap_or_default();
        info!("Order accepted: id={} time={} msg={}", order_id, time, env.msg1.trim());
        Ok(OrderAck::new(order_id).with_message(env.msg1.trim()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(account: &str) -> KisConfig {
        KisConfig {
            app_key: "PSabcdefgh".into(),
            app_secret: "secret".into(),
            account: account.into(),
            ..Default::default()
        }
    }

    #[test]
    fn account_splits_into_cano_and_product() {
        assert_eq!(
            config("1234567801").account_parts(),
            ("12345678".to_string(), "01".to_string())
        );
        assert_eq!(
            config("12345678-22").account_parts(),
            ("12345678".to_string(), "22".to_string())
        );
        assert_eq!(
            config("12345678").account_parts(),
            ("12345678".to_string(), "01".to_string())
        );
    }

    #[test]
    fn incomplete_config_is_rejected() {
        let err = KisConfig::default().validate().unwrap_err();
        assert!(err.to_string().contains("app_key"));
        assert!(config("12345678").validate().is_ok());
    }

    #[test]
    fn debug_output_masks_credentials() {
        let shown = format!("{:?}", config("1234567801"));
        assert!(!shown.contains("secret"));
        assert!(!shown.contains("PSabcdefgh"));
        assert!(shown.contains("PSab***"));
    }

    #[test]
    fn virtual_mode_switches_trading_ids() {
        let mut cfg = config("1234567801");
        cfg.virtual_trading = true;
        let client = KisClient::new(cfg).unwrap();
        assert_eq!(client.tr_id(&TR_BUY), "VTTT1002U");
        assert_eq!(client.tr_id(&TR_QUOTE), "HHDFS76200200");
    }
}
