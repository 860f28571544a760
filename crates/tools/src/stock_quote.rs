//! Stock quote tool — stub that returns mock price data.
//!
//! In production this would call a market-data API. The stub is
//! deterministic per ticker so the loop can be tested without network
//! access.

use async_trait::async_trait;

use midwire_core::error::ToolError;
use midwire_core::tool::{Tool, ToolResult};

pub struct StockQuoteTool;

#[async_trait]
impl Tool for StockQuoteTool {
    fn name(&self) -> &str {
        "get_stock_price"
    }

    fn description(&self) -> &str {
        "Look up the latest price for a stock ticker symbol. Returns price, currency, and daily change."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "symbol": {
                    "type": "string",
                    "description": "The ticker symbol, e.g. AAPL or MSFT"
                }
            },
            "required": ["symbol"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let symbol = arguments["symbol"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'symbol' argument".into()))?;

        let symbol = symbol.to_uppercase();
        if symbol.is_empty() || symbol.len() > 8 || !symbol.bytes().all(|b| b.is_ascii_alphabetic())
        {
            return Ok(ToolResult::error(
                String::new(),
                format!("'{symbol}' is not a valid ticker symbol"),
            ));
        }

        let quote = generate_mock_quote(&symbol);
        let output = serde_json::to_string_pretty(&quote).unwrap_or_default();

        Ok(ToolResult {
            call_id: String::new(),
            success: true,
            output,
            data: serde_json::to_value(&quote).ok(),
        })
    }
}

#[derive(serde::Serialize)]
struct StockQuote {
    symbol: String,
    price: f64,
    currency: String,
    change_pct: f64,
}

/// Deterministic mock quote based on symbol hash.
fn generate_mock_quote(symbol: &str) -> StockQuote {
    let hash: u32 = symbol
        .bytes()
        .fold(0u32, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u32));

    let price = 10.0 + ((hash % 99_000) as f64) / 100.0; // $10.00 – $1000.00
    let change_pct = (((hash / 7) % 1_000) as f64) / 100.0 - 5.0; // -5.00% – +5.00%

    StockQuote {
        symbol: symbol.to_string(),
        price: (price * 100.0).round() / 100.0,
        currency: "USD".into(),
        change_pct: (change_pct * 100.0).round() / 100.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn quote_returns_price() {
        let tool = StockQuoteTool;
        let result = tool
            .execute(serde_json::json!({"symbol": "aapl"}))
            .await
            .unwrap();

        assert!(result.success);
        assert!(result.output.contains("AAPL"));
        assert!(result.output.contains("price"));
    }

    #[tokio::test]
    async fn deterministic_per_symbol() {
        let tool = StockQuoteTool;
        let r1 = tool
            .execute(serde_json::json!({"symbol": "MSFT"}))
            .await
            .unwrap();
        let r2 = tool
            .execute(serde_json::json!({"symbol": "MSFT"}))
            .await
            .unwrap();
        assert_eq!(r1.output, r2.output);
    }

    #[tokio::test]
    async fn invalid_symbol_returns_error_result() {
        let tool = StockQuoteTool;
        let result = tool
            .execute(serde_json::json!({"symbol": "NOT-A-TICKER-123"}))
            .await
            .unwrap();
        assert!(!result.success);
    }

    #[tokio::test]
    async fn missing_symbol_returns_error() {
        let tool = StockQuoteTool;
        assert!(tool.execute(serde_json::json!({})).await.is_err());
    }
}
