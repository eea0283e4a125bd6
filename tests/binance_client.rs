//! HTTP-level tests for the Binance futures client
//!
//! A wiremock server stands in for `fapi.binance.com`; no real network
//! traffic is made.

mod common;

use common::binance_responses;
use futures_trailing_bot::config::types::ApiCredentials;
use futures_trailing_bot::gateway::build_params;
use futures_trailing_bot::{
    BinanceFuturesClient, BotError, ExchangeClient, OrderIntent, PositionMode, PositionSide,
    SymbolFilters,
};
use pretty_assertions::assert_eq;
use rust_decimal_macros::dec;
use wiremock::matchers::{header, header_exists, method, path, query_param};
use wiremock::{Match, Mock, MockServer, Request, ResponseTemplate};

/// Matches requests whose query string lacks the named parameter
struct MissingParam(&'static str);

impl Match for MissingParam {
    fn matches(&self, request: &Request) -> bool {
        !request.url.query_pairs().any(|(k, _)| k == self.0)
    }
}

/// Matches requests carrying a 64-char hex `signature`
struct HexSignature;

impl Match for HexSignature {
    fn matches(&self, request: &Request) -> bool {
        request
            .url
            .query_pairs()
            .any(|(k, v)| k == "signature" && v.len() == 64 && v.chars().all(|c| c.is_ascii_hexdigit()))
    }
}

fn client(server: &MockServer) -> BinanceFuturesClient {
    BinanceFuturesClient::new(&server.uri())
        .unwrap()
        .with_credentials(ApiCredentials::new("test-key".into(), "test-secret".into()))
}

#[tokio::test]
async fn test_get_price() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/fapi/v1/ticker/price"))
        .and(query_param("symbol", "BTCUSDT"))
        .respond_with(ResponseTemplate::new(200).set_body_string(binance_responses::TICKER))
        .mount(&server)
        .await;

    let price = client(&server).get_price("BTCUSDT").await.unwrap();
    assert_eq!(price, dec!(50123.4));
}

#[tokio::test]
async fn test_position_mode_is_signed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/fapi/v1/positionSide/dual"))
        .and(header("X-MBX-APIKEY", "test-key"))
        .and(query_param("recvWindow", "5000"))
        .and(HexSignature)
        .respond_with(ResponseTemplate::new(200).set_body_string(binance_responses::DUAL_SIDE_TRUE))
        .mount(&server)
        .await;

    let mode = client(&server).get_position_mode().await.unwrap();
    assert_eq!(mode, PositionMode::Hedge);
}

#[tokio::test]
async fn test_open_positions_skip_flat_entries() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/fapi/v2/positionRisk"))
        .and(header_exists("X-MBX-APIKEY"))
        .respond_with(ResponseTemplate::new(200).set_body_string(binance_responses::POSITION_RISK))
        .mount(&server)
        .await;

    let positions = client(&server).get_open_positions().await.unwrap();
    assert_eq!(positions.len(), 1);
    assert_eq!(positions[0].side, PositionSide::Long);
    assert_eq!(positions[0].quantity, dec!(0.01));
}

#[tokio::test]
async fn test_hedge_close_order_query() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/fapi/v1/order"))
        .and(query_param("symbol", "BTCUSDT"))
        .and(query_param("side", "SELL"))
        .and(query_param("type", "MARKET"))
        .and(query_param("quantity", "0.01"))
        .and(query_param("positionSide", "LONG"))
        .and(MissingParam("reduceOnly"))
        .respond_with(ResponseTemplate::new(200).set_body_string(binance_responses::ORDER_ACK))
        .expect(1)
        .mount(&server)
        .await;

    let intent = OrderIntent::ClosePosition {
        symbol: "BTCUSDT".into(),
        side: PositionSide::Long,
        quantity: dec!(0.01),
        position_quantity: dec!(0.01),
        reference_price: dec!(50100),
    };
    let params = build_params(&intent, PositionMode::Hedge, &SymbolFilters::default()).unwrap();
    let result = client(&server).place_order(&params).await.unwrap();

    assert_eq!(result.order_id, 22542179);
    assert_eq!(result.avg_price, dec!(50120.5));
}

#[tokio::test]
async fn test_one_way_stop_order_query() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/fapi/v1/order"))
        .and(query_param("side", "BUY"))
        .and(query_param("type", "STOP_MARKET"))
        .and(query_param("stopPrice", "51000"))
        .and(query_param("reduceOnly", "true"))
        .and(query_param("workingType", "MARK_PRICE"))
        .and(MissingParam("positionSide"))
        .respond_with(ResponseTemplate::new(200).set_body_string(binance_responses::ORDER_ACK))
        .expect(1)
        .mount(&server)
        .await;

    let intent = OrderIntent::AdjustStopLoss {
        symbol: "BTCUSDT".into(),
        side: PositionSide::Short,
        quantity: dec!(0.01),
        stop_price: dec!(51000),
    };
    let params = build_params(&intent, PositionMode::OneWay, &SymbolFilters::default()).unwrap();
    client(&server).place_order(&params).await.unwrap();
}

#[tokio::test]
async fn test_rejection_is_classified() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/fapi/v1/order"))
        .respond_with(ResponseTemplate::new(400).set_body_string(binance_responses::POSITION_SIDE_ERROR))
        .mount(&server)
        .await;

    let intent = OrderIntent::ClosePosition {
        symbol: "BTCUSDT".into(),
        side: PositionSide::Long,
        quantity: dec!(0.01),
        position_quantity: dec!(0.01),
        reference_price: dec!(50100),
    };
    let params = build_params(&intent, PositionMode::OneWay, &SymbolFilters::default()).unwrap();
    let err = client(&server).place_order(&params).await.unwrap_err();

    assert!(matches!(err, BotError::ExchangeRejection { code: -4061, .. }));
    assert!(err.is_retryable_rejection());
}

#[tokio::test]
async fn test_rate_limit_is_transient() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/fapi/v1/ticker/price"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "7"))
        .mount(&server)
        .await;

    let err = client(&server).get_price("BTCUSDT").await.unwrap_err();
    assert!(matches!(err, BotError::RateLimit { retry_after_seconds: Some(7), .. }));
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_balance_picks_quote_asset() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/fapi/v2/balance"))
        .respond_with(ResponseTemplate::new(200).set_body_string(binance_responses::BALANCE))
        .mount(&server)
        .await;

    let balance = client(&server).get_balance().await.unwrap();
    assert_eq!(balance, dec!(1100.50));
}
