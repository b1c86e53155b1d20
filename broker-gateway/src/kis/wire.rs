//! Response bodies of the KIS open API.
//!
//! Every response carries `rt_cd`/`msg1`; numbers come back as strings.

use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    #[serde(default)]
    pub rt_cd: String,
    #[serde(default)]
    pub msg_cd: String,
    #[serde(default)]
    pub msg1: String,
    #[serde(flatten)]
    pub body: T,
}

impl<T> Envelope<T> {
    /// "0" and "0000" both mean success.
    pub fn is_success(&self) -> bool {
        matches!(self.rt_cd.as_str(), "0" | "0000")
    }

    /// Error message for a failed call.
    pub fn failure(&self) -> String {
        if self.msg_cd.is_empty() {
            format!("rt_cd={} {}", self.rt_cd, self.msg1.trim())
        } else {
            format!("rt_cd={} [{}] {}", self.rt_cd, self.msg_cd, self.msg1.trim())
        }
    }
}

/// Some endpoints return `output2` as an object, others as a one-element list.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    pub fn first(&self) -> Option<&T> {
        match self {
            OneOrMany::One(v) => Some(v),
            OneOrMany::Many(v) => v.first(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: String,
    pub expires_in: i64,
}

#[derive(Debug, Deserialize)]
pub struct QuoteBody {
    pub output: QuoteOutput,
}

#[derive(Debug, Default, Deserialize)]
pub struct QuoteOutput {
    /// Last traded price.
    #[serde(default)]
    pub last: String,
    /// Previous close.
    #[serde(default)]
    pub base: String,
}

#[derive(Debug, Deserialize)]
pub struct DailyPriceBody {
    #[serde(default)]
    pub output2: Vec<DailyBar>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DailyBar {
    /// Trading date, `YYYYMMDD`.
    #[serde(default)]
    pub xymd: String,
    #[serde(default)]
    pub clos: String,
}

#[derive(Debug, Deserialize)]
pub struct BalanceBody {
    #[serde(default)]
    pub output1: Vec<BalanceRow>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BalanceRow {
    #[serde(default)]
    pub ovrs_excg_cd: String,
    #[serde(default)]
    pub ovrs_pdno: String,
    /// Holding quantity.
    #[serde(default)]
    pub ovrs_cblc_qty: String,
    /// Average purchase price.
    #[serde(default)]
    pub pchs_avg_pric: String,
    #[serde(default)]
    pub now_pric2: String,
}

#[derive(Debug, Deserialize)]
pub struct PresentBalanceBody {
    pub output2: OneOrMany<PresentBalanceOutput>,
}

#[derive(Debug, Deserialize)]
pub struct PresentBalanceOutput {
    /// Amount available for overseas orders (USD).
    #[serde(default)]
    pub ovrs_ord_psbl_amt: String,
    #[serde(default)]
    pub frcr_dnca_tot_amt: String,
}

#[derive(Debug, Deserialize)]
pub struct OrderBody {
    #[serde(default)]
    pub output: Option<OrderOutput>,
}

#[derive(Debug, Deserialize)]
pub struct OrderOutput {
    #[serde(rename = "ODNO", default)]
    pub order_no: String,
    #[serde(rename = "ORD_TMD", default)]
    pub order_time: String,
}

/// Parses a numeric field. Empty strings are `None`.
pub fn decimal(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    raw.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parses a share count; fractional strings such as "10.0000" are accepted.
pub fn quantity(raw: &str) -> Option<u64> {
    decimal(raw).filter(|v| *v >= 0.0).map(|v| v.floor() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quote_response_decodes() {
        let raw = r#"{"output":{"rsym":"DNASTQQQ","last":"53.2100","base":"52.10"},
                      "rt_cd":"0","msg_cd":"MCA00000","msg1":"OK"}"#;
        let env: Envelope<QuoteBody> = serde_json::from_str(raw).unwrap();
        assert!(env.is_success());
        assert_eq!(decimal(&env.body.output.last), Some(53.21));
    }

    #[test]
    fn api_failure_keeps_message() {
        let raw = r#"{"output":{},"rt_cd":"1","msg_cd":"EGW00123","msg1":"token expired "}"#;
        let env: Envelope<QuoteBody> = serde_json::from_str(raw).unwrap();
        assert!(!env.is_success());
        assert_eq!(env.failure(), "rt_cd=1 [EGW00123] token expired");
    }

    #[test]
    fn present_balance_accepts_object_or_list() {
        let one = r#"{"output2":{"ovrs_ord_psbl_amt":"1234.5"},"rt_cd":"0"}"#;
        let many = r#"{"output2":[{"ovrs_ord_psbl_amt":"99"}],"rt_cd":"0000"}"#;
        let one: Envelope<PresentBalanceBody> = serde_json::from_str(one).unwrap();
        let many: Envelope<PresentBalanceBody> = serde_json::from_str(many).unwrap();
        assert_eq!(one.body.output2.first().unwrap().ovrs_ord_psbl_amt, "1234.5");
        assert_eq!(many.body.output2.first().unwrap().ovrs_ord_psbl_amt, "99");
        assert!(many.is_success());
    }

    #[test]
    fn balance_rows_decode() {
        let raw = r#"{"output1":[{"ovrs_excg_cd":"NASD","ovrs_pdno":"TQQQ",
            "ovrs_cblc_qty":"15","pchs_avg_pric":"48.6667","now_pric2":"50.00000"}],
            "output2":{},"rt_cd":"0"}"#;
        let env: Envelope<BalanceBody> = serde_json::from_str(raw).unwrap();
        let row = &env.body.output1[0];
        assert_eq!(quantity(&row.ovrs_cblc_qty), Some(15));
        assert_eq!(decimal(&row.now_pric2), Some(50.0));
    }

    #[test]
    fn numeric_fields() {
        assert_eq!(decimal(" "), None);
        assert_eq!(decimal("abc"), None);
        assert_eq!(quantity("10.0000"), Some(10));
        assert_eq!(quantity("-3"), None);
    }
}
