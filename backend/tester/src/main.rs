use anyhow::{Context, bail};
use clap::Parser;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use uuid::Uuid;

/// Races one accept per token against the same request.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Request to accept
    #[arg(long)]
    request: Uuid,

    /// Session token of a donor or blood bank, repeat for each contender
    #[arg(long = "token", required = true)]
    tokens: Vec<String>,

    #[arg(long, default_value = "http://localhost:1111")]
    base_url: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let client = Client::new();
    let url = format!(
        "{}/api/v1/requests/{}/accept",
        args.base_url.trim_end_matches('/'),
        args.request
    );

    let handles: Vec<_> = args
        .tokens
        .into_iter()
        .enumerate()
        .map(|(contender, token)| {
            let client = client.clone();
            let url = url.clone();

            tokio::spawn(async move {
                let response = client.put(&url).bearer_auth(token).send().await?;
                let status = response.status();
                let body: Value = response.json().await.unwrap_or(Value::Null);

                anyhow::Ok((contender, status, body))
            })
        })
        .collect();

    let mut winners = 0;
    let mut conflicts = 0;

    for handle in handles {
        let (contender, status, body) = handle.await.context("Contender panicked")??;

        match status {
            StatusCode::OK => winners += 1,
            StatusCode::CONFLICT => conflicts += 1,
            _ => {}
        }

        let detail = body
            .get("error")
            .or_else(|| body.pointer("/data/status"))
            .cloned()
            .unwrap_or(Value::Null);
        println!("contender {contender}: {status} {detail}");
    }

    println!("{winners} assigned, {conflicts} conflicts");

    if winners > 1 {
        bail!("{winners} contenders were assigned the same request");
    }

    Ok(())
}
