use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use clap::{Args, Parser, Subcommand};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::time::Instant;

const SAMPLE_IMAGE: &str = "https://images.pexels.com/photos/3408744/pexels-photo-3408744.jpeg";

#[derive(Parser)]
#[command(name = "glimpse", about = "Glimpse CLIP service client")]
struct Cli {
    /// Base URL of a running glimpsed
    #[arg(long, env = "CLIP_SERVICE_URL", default_value = "http://localhost:5000")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show daemon health and configuration
    Health,
    /// Encode text into an embedding
    EncodeText {
        text: String,
    },
    /// Encode an image into an embedding
    EncodeImage {
        #[command(flatten)]
        image: ImageArg,
        /// Also run human detection on the image
        #[arg(long)]
        detect_humans: bool,
    },
    /// Score an image against a text
    Similarity {
        #[command(flatten)]
        image: ImageArg,
        text: String,
    },
    /// Check whether an image contains people
    Detect {
        #[command(flatten)]
        image: ImageArg,
    },
    /// Run every endpoint against a sample image and summarize
    Smoke,
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct ImageArg {
    /// Remote image URL
    #[arg(long = "image-url")]
    image_url: Option<String>,
    /// Local image file, sent inline as base64
    #[arg(long = "file")]
    file: Option<PathBuf>,
}

impl ImageArg {
    fn to_json(&self) -> Result<Value> {
        match (&self.image_url, &self.file) {
            (Some(url), _) => Ok(json!({ "image_url": url })),
            (None, Some(path)) => {
                let bytes = std::fs::read(path)
                    .with_context(|| format!("reading {}", path.display()))?;
                Ok(json!({ "image_base64": STANDARD.encode(bytes) }))
            }
            (None, None) => bail!("either --image-url or --file is required"),
        }
    }
}

struct Client {
    http: reqwest::Client,
    base: String,
}

impl Client {
    fn new(base: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base: base.trim_end_matches('/').to_string(),
        }
    }

    async fn get(&self, path: &str) -> Result<Value> {
        let response = self.http.get(format!("{}{path}", self.base)).send().await?;
        Self::read(response).await
    }

    async fn post(&self, path: &str, body: Value) -> Result<Value> {
        let response = self
            .http
            .post(format!("{}{path}", self.base))
            .json(&body)
            .send()
            .await?;
        Self::read(response).await
    }

    async fn read(response: reqwest::Response) -> Result<Value> {
        let status = response.status();
        let text = response.text().await.context("reading response body")?;
        tracing::debug!(%status, bytes = text.len(), "response received");

        let body: Option<Value> = serde_json::from_str(&text).ok();
        if !status.is_success() {
            let msg = body
                .as_ref()
                .and_then(|b| b["error"].as_str())
                .unwrap_or(text.as_str());
            bail!("HTTP {status}: {msg}");
        }
        body.context("response body is not JSON")
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let client = Client::new(&cli.url);

    match cli.command {
        Commands::Health => print_json(&client.get("/health").await?),
        Commands::EncodeText { text } => {
            let body = client.post("/encode_text", json!({ "text": text })).await?;
            print_json(&summarize_embedding(body));
        }
        Commands::EncodeImage {
            image,
            detect_humans,
        } => {
            let mut request = image.to_json()?;
            request["detect_humans"] = json!(detect_humans);
            let body = client.post("/encode_image", request).await?;
            let has_human = body["has_human"].as_bool();
            print_json(&summarize_embedding(body));
            if let Some(has_human) = has_human {
                println!("Human detected: {}", if has_human { "yes" } else { "no" });
            }
        }
        Commands::Similarity { image, text } => {
            let mut request = image.to_json()?;
            request["text"] = json!(text);
            let body = client.post("/similarity", request).await?;
            print_json(&body);
        }
        Commands::Detect { image } => {
            let body = client.post("/detect_humans", image.to_json()?).await?;
            print_json(&body);
            let has_human = body["has_human"].as_bool().unwrap_or(false);
            println!("Human detected: {}", if has_human { "yes" } else { "no" });
        }
        Commands::Smoke => {
            if !smoke(&client).await {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

/// Hit every endpoint once; returns true when all succeed.
async fn smoke(client: &Client) -> bool {
    let start = Instant::now();

    let mut results = Vec::new();
    results.push(("Health check", client.get("/health").await));
    results.push((
        "Text embedding",
        client
            .post("/encode_text", json!({ "text": "a beautiful sunset over mountains" }))
            .await,
    ));
    results.push((
        "Image embedding",
        client.post("/encode_image", json!({ "image_url": SAMPLE_IMAGE })).await,
    ));
    results.push((
        "Human detection",
        client.post("/detect_humans", json!({ "image_url": SAMPLE_IMAGE })).await,
    ));
    results.push((
        "Similarity",
        client
            .post("/similarity", json!({ "image_url": SAMPLE_IMAGE, "text": "mountains with snow" }))
            .await,
    ));

    println!("{}", "=".repeat(60));
    let mut all_pass = true;
    for (name, result) in &results {
        match result {
            Ok(_) => println!("PASS - {name}"),
            Err(e) => {
                all_pass = false;
                println!("FAIL - {name}: {e}");
            }
        }
    }
    println!("{}", "=".repeat(60));
    println!("Total time: {:.2} seconds", start.elapsed().as_secs_f64());
    println!("Overall: {}", if all_pass { "all passed" } else { "some failed" });

    all_pass
}

/// Replace a long embedding array with its size and first few values.
fn summarize_embedding(mut body: Value) -> Value {
    if let Some(values) = body["embedding"].as_array() {
        let head: Vec<Value> = values.iter().take(5).cloned().collect();
        let summary = format!("[{} values, first 5: {}]", values.len(), Value::Array(head));
        body["embedding"] = Value::String(summary);
    }
    body
}

fn print_json(value: &Value) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{s}"),
        Err(_) => println!("{value}"),
    }
}
