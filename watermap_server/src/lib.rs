use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tokio::sync::Mutex;

use watermap::ingest::load_samples;
use watermap::pipeline::{LandPolicy, PipelineConfig, WaterMask, WatermapPipeline};

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub mask_path: PathBuf,
    pub input_path: PathBuf,
    /// Also persist each fresh export here when set.
    pub output_path: Option<PathBuf>,
    /// Cached output younger than this is served as is. Zero regenerates on every request.
    pub regen_interval: Duration,
    pub pipeline: PipelineConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            mask_path: PathBuf::from("data/water_mask.png"),
            input_path: PathBuf::from("data/samples.json"),
            output_path: None,
            regen_interval: Duration::ZERO,
            pipeline: PipelineConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Defaults overridden by any `WM_*` variables that are set. Values that do not
    /// parse are logged and leave the default in place.
    pub fn from_env() -> Self {
        Self::default().merge_env(|key| std::env::var(key).ok())
    }

    fn merge_env(mut self, var: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str| var(key).filter(|v| !v.is_empty());

        if let Some(bind) = var("WM_BIND") { self.bind_addr = bind; }
        if let Some(mask) = var("WM_MASK") { self.mask_path = PathBuf::from(mask); }
        if let Some(input) = var("WM_INPUT") { self.input_path = PathBuf::from(input); }
        if let Some(output) = var("WM_OUTPUT") { self.output_path = Some(PathBuf::from(output)); }
        if let Some(secs) = parse_var("WM_REGEN_SECS", var("WM_REGEN_SECS"), |s| s.parse::<u64>().ok()) {
            self.regen_interval = Duration::from_secs(secs);
        }
        if let Some(decay) = parse_var("WM_DECAY", var("WM_DECAY"), |s| s.parse::<f64>().ok()) {
            self.pipeline.decay = decay;
        }
        if let Some(min_weight) = parse_var("WM_MIN_WEIGHT", var("WM_MIN_WEIGHT"), |s| s.parse::<f64>().ok()) {
            self.pipeline.min_weight = min_weight;
        }
        if let Some(policy) = parse_var("WM_LAND_POLICY", var("WM_LAND_POLICY"), parse_land_policy) {
            self.pipeline.land_policy = policy;
        }
        self
    }
}

fn parse_var<T>(key: &str, raw: Option<String>, parse: impl Fn(&str) -> Option<T>) -> Option<T> {
    let raw = raw?;
    let parsed = parse(raw.trim());
    if parsed.is_none() {
        tracing::warn!("ignoring {key}={raw:?}: not a valid value, keeping the default");
    }
    parsed
}

fn parse_land_policy(raw: &str) -> Option<LandPolicy> {
    match raw.to_ascii_lowercase().replace('_', "-").as_str() {
        "block" => Some(LandPolicy::Block),
        "pass-through" | "passthrough" => Some(LandPolicy::PassThrough),
        _ => None,
    }
}

struct CachedExport {
    generated_at: Instant,
    body: Bytes,
}

fn is_stale(generated_at: Option<Instant>, now: Instant, interval: Duration) -> bool {
    match generated_at {
        None => true,
        Some(at) => interval.is_zero() || now.saturating_duration_since(at) >= interval,
    }
}

pub struct AppState {
    pipeline: WatermapPipeline,
    input_path: PathBuf,
    output_path: Option<PathBuf>,
    regen_interval: Duration,
    // Held across regeneration so concurrent requests never run twice.
    cache: Mutex<Option<CachedExport>>,
}

impl AppState {
    pub fn new(
        pipeline: WatermapPipeline,
        input_path: PathBuf,
        output_path: Option<PathBuf>,
        regen_interval: Duration,
    ) -> Self {
        Self { pipeline, input_path, output_path, regen_interval, cache: Mutex::new(None) }
    }

    /// Returns the cached export, regenerating it first if it is stale.
    /// Cached bodies are shared, not copied.
    pub async fn current_export(&self) -> anyhow::Result<Bytes> {
        let mut cache = self.cache.lock().await;
        let generated_at = cache.as_ref().map(|c| c.generated_at);
        if !is_stale(generated_at, Instant::now(), self.regen_interval) {
            if let Some(cached) = cache.as_ref() {
                return Ok(cached.body.clone());
            }
        }

        let pipeline = self.pipeline.clone();
        let input_path = self.input_path.clone();
        let output_path = self.output_path.clone();
        let body = tokio::task::spawn_blocking(move || -> anyhow::Result<String> {
            let samples = load_samples(&input_path)
                .with_context(|| format!("reading samples from {}", input_path.display()))?;
            let document = pipeline.run(&samples)?;
            if let Some(path) = output_path {
                document.write_to(&path)?;
            }
            Ok(document.to_json_pretty()?)
        })
        .await
        .context("aggregation task failed")??;

        let body = Bytes::from(body);
        *cache = Some(CachedExport { generated_at: Instant::now(), body: body.clone() });
        Ok(body)
    }

    #[cfg(test)]
    async fn generated_at(&self) -> Option<Instant> {
        self.cache.lock().await.as_ref().map(|c| c.generated_at)
    }
}

async fn pixels_handler(State(state): State<Arc<AppState>>) -> Response {
    match state.current_export().await {
        Ok(body) => ([(header::CONTENT_TYPE, "application/json")], body).into_response(),
        Err(e) => {
            tracing::error!("failed to produce pixels.json: {e:#}");
            (StatusCode::INTERNAL_SERVER_ERROR, "aggregation failed").into_response()
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/data/pixels.json", get(pixels_handler))
        .route("/healthz", get(|| async { "ok" }))
        .with_state(state)
}

/// Loads the mask and binds the listener before returning; either failing is fatal.
pub async fn start_server(cfg: ServerConfig) -> anyhow::Result<tokio::task::JoinHandle<()>> {
    let mask = WaterMask::load(&cfg.mask_path).context("water mask is required to serve runs")?;
    let pipeline = WatermapPipeline::new(Arc::new(mask), cfg.pipeline.clone())?;
    let state = Arc::new(AppState::new(
        pipeline,
        cfg.input_path.clone(),
        cfg.output_path.clone(),
        cfg.regen_interval,
    ));

    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr)
        .await
        .with_context(|| format!("binding {}", cfg.bind_addr))?;
    tracing::info!(
        "watermap server listening on http://{} (input={}, regen={}s)",
        cfg.bind_addr,
        cfg.input_path.display(),
        cfg.regen_interval.as_secs()
    );

    let app = router(state);
    let server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("server stopped: {e}");
        }
    });

    Ok(server)
}
