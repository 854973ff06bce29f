//! Sink used with `--list`, where the pipeline never forwards.

use async_trait::async_trait;

use owafetch_core::{MessageSink, OwaError, Result};

pub struct ListOnlySink;

#[async_trait]
impl MessageSink for ListOnlySink {
    async fn forward(&self, _sender: &str, _raw_message: &[u8]) -> Result<()> {
        Err(OwaError::Forward("forwarding is disabled in list mode".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn refuses_to_forward() {
        let err = ListOnlySink.forward("a@b.example", b"x").await.unwrap_err();
        assert!(matches!(err, OwaError::Forward(_)));
    }
}
