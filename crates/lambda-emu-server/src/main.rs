use std::net::SocketAddr;
use std::sync::Arc;

use color_eyre::eyre::{self, WrapErr};
use lambda_emu_common::{handler_fn, json_handler};
use lambda_emu_host::FunctionRegistration;
use lambda_emu_server::{HostSettings, InvocationHost};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Deserialize)]
struct ReverseInput {
    #[serde(rename = "Data")]
    data: String,
}

#[derive(Serialize)]
struct ReverseOutput {
    #[serde(rename = "Reverse")]
    reverse: String,
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    dotenvy::dotenv().ok();
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let listen_addr: SocketAddr = std::env::var("LAMBDA_EMU_LISTEN")
        .unwrap_or_else(|_| "127.0.0.1:9001".to_string())
        .parse()
        .wrap_err("invalid LAMBDA_EMU_LISTEN address")?;
    let concurrency_limit: usize = std::env::var("LAMBDA_EMU_CONCURRENCY_LIMIT")
        .unwrap_or_else(|_| "1000".to_string())
        .parse()
        .wrap_err("invalid LAMBDA_EMU_CONCURRENCY_LIMIT")?;

    let settings = HostSettings::new()
        .with_listen_addr(listen_addr)
        .with_account_concurrency_limit(concurrency_limit)
        .add_function(FunctionRegistration::new(
            "echo",
            Arc::new(handler_fn(|payload, ctx| async move {
                ctx.log(format!("echoing {} bytes", payload.len()));
                Ok(payload)
            })),
        ))?
        .add_function(
            FunctionRegistration::new(
                "reverse",
                Arc::new(json_handler(|input: ReverseInput, _ctx| async move {
                    Ok(ReverseOutput {
                        reverse: input.data.chars().rev().collect(),
                    })
                })),
            )
            .with_handler_name("Reverse::Handler"),
        )?;

    let host = InvocationHost::start(settings).await?;
    info!(
        url = %host.service_url(),
        limit = concurrency_limit,
        "invocation host ready; hand this URL to collaborators as their forward target"
    );

    host.wait().await?;
    Ok(())
}
