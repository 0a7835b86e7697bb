//! PSPAY 命令行入口
//! 不需要钱包的运维命令：编码/解码支付 URI、汇率换算、只读余额查询

use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use pspay::{
    config::Config, infrastructure::logging::init_logging, service::JsonRpcProvider,
    utils::units, WalletContext,
};
use rust_decimal::Decimal;

const USAGE: &str = "usage:
  pspay encode <recipient> <symbol> <amount>
  pspay decode <payload>
  pspay quote <fiat_amount> [symbol]
  pspay receive <recipient> <fiat_amount> [symbol]
  pspay balances <address>";

fn arg<'a>(args: &'a [String], index: usize, name: &str) -> Result<&'a str> {
    args.get(index)
        .map(String::as_str)
        .with_context(|| format!("missing argument <{}>\n{}", name, USAGE))
}

fn symbol_arg(args: &[String], index: usize) -> &str {
    args.get(index)
        .map(String::as_str)
        .unwrap_or(pspay::domain::DEFAULT_TOKEN_SYMBOL)
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let config_path = std::env::var("CONFIG_PATH").ok();
    let config = Config::from_env_and_file(config_path.as_deref())?;
    config.validate()?;

    let _log_guard = init_logging(&config.logging)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = arg(&args, 0, "command")?;

    let config = Arc::new(config);
    // 观察地址仅用于 balances 命令
    let watch_address = if command == "balances" {
        arg(&args, 1, "address")?.to_string()
    } else {
        String::new()
    };
    let provider = Arc::new(JsonRpcProvider::new(
        config.wallet.rpc_url.clone(),
        watch_address,
    ));
    let ctx = WalletContext::new(config.clone(), provider);

    match command {
        "encode" => {
            let recipient = arg(&args, 1, "recipient")?;
            let symbol = arg(&args, 2, "symbol")?;
            let amount = Decimal::from_str(arg(&args, 3, "amount")?)
                .context("amount must be a decimal number")?;
            let uri = ctx.codec.encode_decimal(recipient, symbol, amount)?;
            println!("{}", uri);
        }
        "decode" => {
            let intent = ctx.codec.decode(arg(&args, 1, "payload")?);
            if let Some(token) = ctx.codec.resolve_token(&intent) {
                tracing::info!(symbol = %token.symbol, "Resolved registered token");
            }
            println!("{}", serde_json::to_string_pretty(&intent)?);
        }
        "quote" => {
            let amount: f64 = arg(&args, 1, "fiat_amount")?
                .parse()
                .context("fiat_amount must be a number")?;
            let symbol = symbol_arg(&args, 2);
            let tokens = ctx.conversion.fiat_to_token(amount, symbol).await?;
            let rates = ctx.conversion.refresh_rates().await;
            println!(
                "{} {} = {:.4} {}",
                amount,
                ctx.rates.default_fiat_code(),
                tokens,
                symbol
            );
            if let Some(rates) = rates {
                println!("{}", serde_json::to_string_pretty(rates.as_ref())?);
            }
        }
        "receive" => {
            let recipient = arg(&args, 1, "recipient")?;
            let amount: f64 = arg(&args, 2, "fiat_amount")?
                .parse()
                .context("fiat_amount must be a number")?;
            let symbol = symbol_arg(&args, 3);
            let request = ctx
                .conversion
                .build_receive_request(recipient, amount, symbol)
                .await?;
            println!("{}", serde_json::to_string_pretty(&request)?);
        }
        "balances" => {
            ctx.connection.connect().await?;
            let snapshot = ctx
                .balances
                .refresh()
                .await
                .context("balance refresh skipped: node is not on the target chain")?;
            println!("{}", serde_json::to_string_pretty(snapshot.as_ref())?);

            let fiat_code = ctx.rates.default_fiat_code().to_string();
            for (symbol, balance) in snapshot.balances.iter().filter(|(_, b)| b.is_ok()) {
                let amount = units::to_f64_lossy(balance.raw_amount, balance.decimals);
                let value = ctx
                    .conversion
                    .token_to_fiat(amount, symbol, &fiat_code)
                    .await?;
                println!(
                    "{} {} = {:.2} {}{}",
                    balance.display_amount,
                    symbol,
                    value.fiat,
                    fiat_code,
                    if value.is_live() { "" } else { " (fallback rate)" }
                );
            }
            ctx.connection.disconnect().await;
        }
        other => {
            anyhow::bail!("unknown command: {}\n{}", other, USAGE);
        }
    }

    Ok(())
}
