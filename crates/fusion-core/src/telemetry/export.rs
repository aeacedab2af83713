//! Telemetry export: HTTP push and CSV files.

use std::io::Write;
use std::path::Path;
use std::time::Duration;

use fusion_state::SessionRecord;
use tracing::{info, instrument};

use super::event::{EventKind, TelemetryEvent};
use crate::domain::{FusionError, FusionResult};

const USER_AGENT: &str = concat!("fusion-core/", env!("CARGO_PKG_VERSION"));

/// POSTs session records as JSON to a collector endpoint.
#[derive(Debug, Clone)]
pub struct HttpSessionExporter {
    endpoint: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl HttpSessionExporter {
    pub fn new(endpoint: impl Into<String>) -> FusionResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| FusionError::Export(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            endpoint: endpoint.into(),
            token: None,
            client,
        })
    }

    /// Send `Authorization: Bearer <token>` with every request.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    #[instrument(skip(self, record), fields(session_id = %record.session_id, endpoint = %self.endpoint))]
    pub async fn export(&self, record: &SessionRecord) -> FusionResult<()> {
        let mut request = self.client.post(&self.endpoint).json(record);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| FusionError::Export(format!("request to {} failed: {e}", self.endpoint)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FusionError::Export(format!(
                "{} responded {status}: {body}",
                self.endpoint
            )));
        }

        info!(events = record.events.len(), "telemetry session exported");
        Ok(())
    }
}

const CSV_HEADER: &str =
    "seq,timestamp,agent,input,output,fallback,confidence,execution_time_ms,success";

/// Write single-invocation events as CSV. Batch and evaluation events are
/// left out.
pub fn write_csv(events: &[TelemetryEvent], path: &Path) -> FusionResult<usize> {
    let mut out = std::io::BufWriter::new(std::fs::File::create(path)?);
    writeln!(out, "{CSV_HEADER}")?;

    let mut rows = 0;
    for event in events.iter().filter(|e| e.kind == EventKind::Single) {
        writeln!(
            out,
            "{},{},{},{},{},{},{},{},{}",
            event.seq,
            event.timestamp.to_rfc3339(),
            csv_field(&event.agent_name),
            csv_field(&event.input_excerpt),
            csv_field(&event.output_excerpt),
            csv_field(event.fallback_pattern.as_deref().unwrap_or("")),
            event.confidence.map(|c| c.to_string()).unwrap_or_default(),
            event.execution_time_ms,
            event.success,
        )?;
        rows += 1;
    }
    out.flush()?;
    Ok(rows)
}

/// Quote a field when it holds a delimiter, quote or line break.
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
