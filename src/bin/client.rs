use cliquet_pricer::errors::{PricerError, PricerResult};
use cliquet_pricer::server::routes::PriceResponse;
use std::io::{BufRead, Write};

// Contract terms the desk quotes by default; only spot and vol are prompted.
const RATE: f64 = 0.03;
const MATURITY: f64 = 1.0;
const N_RESETS: u32 = 12;
const LOCAL_CAP: f64 = 5.0;
const GLOBAL_CAP: f64 = 30.0;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let base_url = std::env::var("PRICER_URL").unwrap_or_else(|_| "http://127.0.0.1:8000".to_string());

    println!("== Cliquet Option Pricing ==");

    let (s0, sigma) = match read_inputs() {
        Ok(v) => v,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    match fetch_price(&base_url, s0, sigma).await {
        Ok(quote) => print_quote(&quote),
        Err(e) => println!("Error contacting pricing API: {e}"),
    }
}

fn read_inputs() -> PricerResult<(f64, f64)> {
    let stdin = std::io::stdin();
    let mut lines = stdin.lock().lines();
    let s0 = prompt_f64(&mut lines, "Enter current price (S0): ")?;
    let sigma = prompt_f64(&mut lines, "Enter volatility (sigma): ")?;
    Ok((s0, sigma))
}

fn prompt_f64(lines: &mut impl Iterator<Item = std::io::Result<String>>, label: &str) -> PricerResult<f64> {
    print!("{label}");
    std::io::stdout().flush()?;
    let line = lines
        .next()
        .ok_or_else(|| PricerError::BadRequest("unexpected end of input".into()))??;
    line.trim()
        .parse::<f64>()
        .map_err(|e| PricerError::Parse(format!("'{}' is not a number: {e}", line.trim())))
}

async fn fetch_price(base_url: &str, s0: f64, sigma: f64) -> PricerResult<PriceResponse> {
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(120))
        .build()?;

    let params = [
        ("S0", s0.to_string()),
        ("r", RATE.to_string()),
        ("sigma", sigma.to_string()),
        ("T", MATURITY.to_string()),
        ("n_resets", N_RESETS.to_string()),
        ("local_cap", LOCAL_CAP.to_string()),
        ("global_cap", GLOBAL_CAP.to_string()),
    ];

    let url = format!("{}/price", base_url.trim_end_matches('/'));
    let resp = client.get(&url).query(&params).send().await?;

    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(PricerError::Network(format!("{status}: {body}")));
    }

    resp.json::<PriceResponse>()
        .await
        .map_err(|e| PricerError::Parse(format!("GET /price: {e}")))
}

fn print_quote(quote: &PriceResponse) {
    println!("\n== Option Price ==");
    println!("Estimated Price: ${:.4}", quote.estimated_price);
    if let Some(se) = quote.std_error {
        println!("Std Error: {se:.4}");
    }
    println!("Inputs Used:");
    let inputs = &quote.inputs_used;
    println!("  S0: {}", inputs.s0);
    println!("  r: {}", inputs.r);
    println!("  sigma: {}", inputs.sigma);
    println!("  T: {}", inputs.t);
    println!("  n_resets: {}", inputs.n_resets);
    println!("  n_paths: {}", inputs.n_paths);
    println!("  local_floor: {}", inputs.local_floor);
    println!("  local_cap: {}", fmt_cap(inputs.local_cap.value()));
    println!("  global_floor: {}", inputs.global_floor);
    println!("  global_cap: {}", fmt_cap(inputs.global_cap.value()));
}

fn fmt_cap(cap: Option<f64>) -> String {
    cap.map_or_else(|| "None".to_string(), |c| c.to_string())
}
