use crate::engine::{EngineError, EngineHandle};
use condogate_core::{Category, CoreError};
use serde::Serialize;
use zbus::{fdo, interface};

pub const BUS_NAME: &str = "org.condogate.Gate1";
pub const OBJECT_PATH: &str = "/org/condogate/Gate1";

const DEFAULT_LOG_LIMIT: u32 = 50;
const MAX_LOG_LIMIT: u32 = 1000;

/// D-Bus interface for the access decision daemon.
///
/// Bus name: org.condogate.Gate1
/// Object path: /org/condogate/Gate1
pub struct GateService {
    engine: EngineHandle,
}

impl GateService {
    pub fn new(engine: EngineHandle) -> Self {
        Self { engine }
    }
}

#[interface(name = "org.condogate.Gate1")]
impl GateService {
    /// Decide on a camera image. `category` optionally restricts the gallery;
    /// pass an empty string for no restriction. Returns the decision as JSON.
    async fn decide(&self, image: Vec<u8>, category: &str) -> fdo::Result<String> {
        tracing::info!(bytes = image.len(), category, "decide requested");
        let decision = self
            .engine
            .decide(image, Category::parse_hint(category))
            .await
            .map_err(to_fdo)?;
        to_json(&decision)
    }

    /// Decide on a vector posted by an attendance terminal.
    async fn decide_embedding(&self, values: Vec<f64>, category: &str) -> fdo::Result<String> {
        tracing::info!(len = values.len(), category, "decide_embedding requested");
        let decision = self
            .engine
            .decide_embedding(values, Category::parse_hint(category))
            .await
            .map_err(to_fdo)?;
        to_json(&decision)
    }

    /// Open the gate without recognition. `officer_id` of 0 means no officer
    /// is named; otherwise it must be an existing security officer.
    async fn manual_override(&self, officer_id: i64) -> fdo::Result<String> {
        tracing::warn!(officer_id, "manual override requested");
        let officer = (officer_id != 0).then_some(officer_id);
        let decision = self.engine.manual_override(officer).await.map_err(to_fdo)?;
        to_json(&decision)
    }

    /// Enroll a face image for an existing identity. Returns the embedding id.
    async fn enroll(&self, category: &str, reference_id: i64, image: Vec<u8>) -> fdo::Result<i64> {
        tracing::info!(category, reference_id, bytes = image.len(), "enroll requested");
        self.engine
            .enroll(Category::normalize(category), reference_id, image)
            .await
            .map_err(to_fdo)
    }

    /// Enroll an attendance vector for an existing identity.
    async fn enroll_embedding(&self, category: &str, reference_id: i64, values: Vec<f64>) -> fdo::Result<i64> {
        tracing::info!(category, reference_id, len = values.len(), "enroll_embedding requested");
        self.engine
            .enroll_embedding(Category::normalize(category), reference_id, values)
            .await
            .map_err(to_fdo)
    }

    async fn add_identity(&self, category: &str, full_name: &str) -> fdo::Result<i64> {
        tracing::info!(category, "add_identity requested");
        self.engine
            .add_identity(Category::normalize(category), full_name.to_string())
            .await
            .map_err(to_fdo)
    }

    /// Set a temporary staff work window. Dates are `YYYY-MM-DD`; empty clears a bound.
    async fn set_work_window(&self, temp_id: i64, start: &str, end: &str) -> fdo::Result<bool> {
        tracing::info!(temp_id, start, end, "set_work_window requested");
        self.engine
            .set_work_window(temp_id, start.to_string(), end.to_string())
            .await
            .map_err(to_fdo)
    }

    /// Remove an identity and its enrolled vectors. Returns how many vectors were removed.
    async fn delete_identity(&self, category: &str, reference_id: i64) -> fdo::Result<u32> {
        tracing::info!(category, reference_id, "delete_identity requested");
        let removed = self
            .engine
            .delete_identity(Category::normalize(category), reference_id)
            .await
            .map_err(to_fdo)?;
        Ok(removed as u32)
    }

    /// Most recent access events as a JSON array. 0 uses the default limit.
    async fn recent_logs(&self, limit: u32) -> fdo::Result<String> {
        let logs = self
            .engine
            .recent_logs(log_limit(limit))
            .await
            .map_err(to_fdo)?;
        to_json(&logs)
    }

    /// Access events of the current UTC day.
    async fn today_logs(&self, limit: u32) -> fdo::Result<String> {
        let logs = self
            .engine
            .today_logs(log_limit(limit))
            .await
            .map_err(to_fdo)?;
        to_json(&logs)
    }

    /// Granted/denied counts over the last `days` days.
    async fn stats(&self, days: u32) -> fdo::Result<String> {
        let stats = self.engine.stats(days.max(1)).await.map_err(to_fdo)?;
        to_json(&stats)
    }

    /// Return daemon status information.
    async fn status(&self) -> fdo::Result<String> {
        let status = self.engine.status().await.map_err(to_fdo)?;
        to_json(&status)
    }
}

fn log_limit(limit: u32) -> usize {
    let limit = match limit {
        0 => DEFAULT_LOG_LIMIT,
        n => n.min(MAX_LOG_LIMIT),
    };
    limit as usize
}

fn to_json<T: Serialize>(value: &T) -> fdo::Result<String> {
    serde_json::to_string(value).map_err(|e| fdo::Error::Failed(format!("encoding reply: {e}")))
}

fn to_fdo(err: EngineError) -> fdo::Error {
    if err.is_input_error() {
        tracing::info!(error = %err, "request rejected");
        return fdo::Error::InvalidArgs(err.to_string());
    }
    if matches!(err, EngineError::Core(CoreError::NoExtractor)) {
        return fdo::Error::NotSupported(err.to_string());
    }
    tracing::error!(error = %err, "request failed");
    fdo::Error::Failed(format!("system unavailable: {err}"))
}
