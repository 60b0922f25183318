/// Transport record handling
///
/// Each record body carries one batch message. Records are processed
/// concurrently and each gets its own response; a record only fails for
/// an undecodable body or a publish/cleanup error, never because single
/// images failed.

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::error;

use crate::error::PipelineError;
use crate::message::BatchMessage;
use crate::pipeline::Orchestrator;

/// Body of a failed record response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub error: String,
    pub details: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordResponse {
    pub status_code: u16,
    pub body: Value,
}

impl RecordResponse {
    fn processed() -> Self {
        Self {
            status_code: 200,
            body: json!({ "message": "Record processed successfully" }),
        }
    }

    fn failed(e: &PipelineError) -> Self {
        let payload = ErrorPayload {
            error: "Failed to process record".to_string(),
            details: e.to_string(),
        };
        Self {
            status_code: 500,
            body: serde_json::to_value(payload).unwrap_or(Value::Null),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status_code == 200
    }
}

async fn handle_record(orchestrator: &Orchestrator, body: &str) -> Result<(), PipelineError> {
    let message = BatchMessage::from_json(body)?;
    orchestrator.process(&message).await?;
    Ok(())
}

/// Process every record body and answer each one
pub async fn handle_records<S>(orchestrator: &Orchestrator, bodies: &[S]) -> Vec<RecordResponse>
where
    S: AsRef<str>,
{
    join_all(bodies.iter().map(|body| async move {
        match handle_record(orchestrator, body.as_ref()).await {
            Ok(()) => RecordResponse::processed(),
            Err(e) => {
                error!(error = %e, "Failed to process record");
                RecordResponse::failed(&e)
            }
        }
    }))
    .await
}
