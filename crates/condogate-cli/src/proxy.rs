// `#[zbus::proxy]` generates both `GateProxy` (async) and `GateProxyBlocking`.
// The CLI runs on tokio and uses the async variant.
#[zbus::proxy(
    interface = "org.condogate.Gate1",
    default_service = "org.condogate.Gate1",
    default_path = "/org/condogate/Gate1"
)]
pub trait Gate {
    async fn decide(&self, image: &[u8], category: &str) -> zbus::Result<String>;

    async fn decide_embedding(&self, values: &[f64], category: &str) -> zbus::Result<String>;

    async fn manual_override(&self, officer_id: i64) -> zbus::Result<String>;

    async fn enroll(&self, category: &str, reference_id: i64, image: &[u8]) -> zbus::Result<i64>;

    async fn enroll_embedding(
        &self,
        category: &str,
        reference_id: i64,
        values: &[f64],
    ) -> zbus::Result<i64>;

    async fn add_identity(&self, category: &str, full_name: &str) -> zbus::Result<i64>;

    async fn set_work_window(&self, temp_id: i64, start: &str, end: &str) -> zbus::Result<bool>;

    async fn delete_identity(&self, category: &str, reference_id: i64) -> zbus::Result<u32>;

    async fn recent_logs(&self, limit: u32) -> zbus::Result<String>;

    async fn today_logs(&self, limit: u32) -> zbus::Result<String>;

    async fn stats(&self, days: u32) -> zbus::Result<String>;

    async fn status(&self) -> zbus::Result<String>;
}
