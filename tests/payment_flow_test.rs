//! 收付款流程集成测试
//! 编解码往返、任意输入解码、汇率兜底下的收款请求

mod common;

use std::str::FromStr;
use std::sync::Arc;

use common::{test_config, tokens, MockWalletProvider, PSPAY_CONTRACT, RECIPIENT};
use ethers::types::U256;
use proptest::prelude::*;
use pspay::domain::{PaymentIntent, TokenRegistry};
use pspay::service::{PaymentCodec, QuoteSource};
use pspay::WalletContext;
use rust_decimal::Decimal;

fn context() -> WalletContext {
    WalletContext::new(Arc::new(test_config()), MockWalletProvider::new(56))
}

fn codec() -> PaymentCodec {
    PaymentCodec::new(Arc::new(TokenRegistry::builtin()), 56)
}

#[test]
fn test_encode_decode_round_trip_all_tokens() {
    let ctx = context();
    let amounts = [
        U256::one(),
        U256::exp10(18),
        U256::from(25u64) * U256::exp10(17),
        U256::from(123_456_789u64),
        U256::MAX,
    ];

    for symbol in ctx.registry.symbols() {
        for amount in amounts {
            let uri = ctx.codec.encode(RECIPIENT, &symbol, amount).unwrap();
            let intent = ctx.codec.decode(&uri);

            match &intent {
                PaymentIntent::Transfer {
                    chain_id,
                    recipient,
                    amount_smallest_unit,
                    ..
                } => {
                    assert_eq!(*chain_id, Some(56));
                    assert_eq!(recipient, RECIPIENT);
                    assert_eq!(*amount_smallest_unit, amount);
                }
                other => panic!("{} decoded as {:?}", uri, other),
            }
            assert_eq!(ctx.codec.resolve_token(&intent).unwrap().symbol, symbol);
        }
    }
}

/// 扫码内容：任意文本，外加接近合法格式的 URI、JSON 和地址
fn scanned_payload() -> impl Strategy<Value = String> {
    prop_oneof![
        any::<String>(),
        "(ethereum|ETHEREUM|Ethereum):(pay-)?(0x[0-9a-fA-F]{0,42})?(@[0-9a-z]{0,4})?(/[a-z]{0,10})?(\\?[a-z0-9=&.e+-]{0,60})?",
        "\\{.{0,40}\\}",
        "\\s{0,2}0x[0-9a-fA-F]{38,42}\\s{0,2}",
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(2000))]

    #[test]
    fn test_decode_arbitrary_input_never_panics(payload in scanned_payload()) {
        let intent = codec().decode(&payload);

        if let PaymentIntent::RawPayload { text } = &intent {
            prop_assert_eq!(text, &payload);
        }
    }

    #[test]
    fn test_encode_decode_round_trip_random_amounts(
        limbs in any::<[u64; 4]>(),
        symbol in prop::sample::select(TokenRegistry::builtin().symbols()),
    ) {
        let codec = codec();
        let amount = U256(limbs);

        let uri = codec.encode(RECIPIENT, &symbol, amount).unwrap();
        let intent = codec.decode(&uri);

        match &intent {
            PaymentIntent::Transfer { chain_id, recipient, amount_smallest_unit, .. } => {
                prop_assert_eq!(*chain_id, Some(56));
                prop_assert_eq!(recipient.as_str(), RECIPIENT);
                prop_assert_eq!(*amount_smallest_unit, amount);
            }
            other => prop_assert!(false, "{} decoded as {:?}", uri, other),
        }
        prop_assert_eq!(&codec.resolve_token(&intent).unwrap().symbol, &symbol);
    }
}

#[test]
fn test_pspay_scenario_uri() {
    let ctx = context();

    let uri = ctx
        .codec
        .encode_decimal(RECIPIENT, "PSPAY", Decimal::from_str("2.5").unwrap())
        .unwrap();

    assert_eq!(
        uri,
        "ethereum:0x275fE1709Dc07112BcAF56A3465ECE683c5Fb04c@56/transfer\
         ?address=0x1000000000000000000000000000000000000001&uint256=2500000000000000000"
    );

    let intent = ctx.codec.decode(&uri);
    assert_eq!(
        intent,
        PaymentIntent::Transfer {
            token_contract: "0x275fE1709Dc07112BcAF56A3465ECE683c5Fb04c".to_string(),
            chain_id: Some(56),
            recipient: RECIPIENT.to_string(),
            amount_smallest_unit: U256::from(2_500_000_000_000_000_000u64),
        }
    );
    assert_eq!(
        ctx.codec.resolve_token(&intent).unwrap().contract_address.to_lowercase(),
        PSPAY_CONTRACT
    );
}

#[test]
fn test_decode_payload_kinds() {
    let ctx = context();

    assert_eq!(ctx.codec.decode(RECIPIENT).kind(), "address_only");
    assert_eq!(
        ctx.codec.decode(r#"{"pix":"abc","valor":10}"#).kind(),
        "structured"
    );
    assert_eq!(ctx.codec.decode("hello").kind(), "raw_payload");
    assert_eq!(ctx.codec.decode("[1,2,3]").kind(), "raw_payload");
}

#[tokio::test]
async fn test_rates_fall_back_when_sources_fail() {
    let ctx = context();

    let value = ctx
        .conversion
        .token_to_fiat(1.0, "PSPAY", "BRL")
        .await
        .unwrap();

    assert!(value.usd.is_finite() && value.fiat.is_finite());
    assert!((value.usd - 0.1).abs() < 1e-12);
    assert!((value.fiat - 0.5).abs() < 1e-12);
    assert_eq!(value.token_price_source, QuoteSource::Fallback);
    assert_eq!(value.fiat_rate_source, QuoteSource::Fallback);
    assert!(!value.is_live());

    for symbol in ctx.registry.symbols() {
        let amount = ctx.conversion.fiat_to_token(10.0, &symbol).await.unwrap();
        assert!(amount.is_finite() && amount > 0.0);
    }

    let rates = ctx.conversion.refresh_rates().await.unwrap();
    assert!(!rates.fiat_per_usd.is_live());
    assert_eq!(rates.token_usd_price.len(), ctx.registry.len());
    assert_eq!(ctx.conversion.latest_rates().unwrap(), rates);
}

#[tokio::test]
async fn test_receive_request_with_fallback_rates() {
    let ctx = context();

    let request = ctx
        .conversion
        .build_receive_request(RECIPIENT, 10.0, "PSPAY")
        .await
        .unwrap();

    assert_eq!(request.fiat_code, "BRL");
    assert_eq!(request.amount_smallest_unit, tokens(20));
    assert!(request.uri.ends_with("uint256=20000000000000000000"));

    let request = ctx
        .conversion
        .build_receive_request(RECIPIENT, 10.0, "USDT")
        .await
        .unwrap();
    assert_eq!(request.amount_smallest_unit, tokens(2));
}

#[tokio::test]
async fn test_receive_request_errors() {
    let ctx = context();

    let err = ctx
        .conversion
        .build_receive_request(RECIPIENT, 10.0, "DOGE")
        .await
        .unwrap_err();
    assert_eq!(err.code(), "unsupported_token");

    let err = ctx
        .conversion
        .build_receive_request("not-an-address", 10.0, "PSPAY")
        .await
        .unwrap_err();
    assert_eq!(err.code(), "invalid_recipient");

    for amount in [0.0, -5.0, f64::NAN] {
        let err = ctx
            .conversion
            .build_receive_request(RECIPIENT, amount, "PSPAY")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "invalid_amount");
    }
}
