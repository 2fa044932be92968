use anyhow::Result;
use async_trait::async_trait;

/// Seam to the generative model that writes repairs.
///
/// One prompt in, raw completion text out. The synthesizer owns prompt
/// construction and output parsing; backends own transport, auth and
/// timeouts. A call error poisons the current attempt, so backends should
/// surface transport problems as `Err` rather than empty output.
#[async_trait]
pub trait FixModel: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}
