use anyhow::{anyhow, Context, Result};
use parallel_run::core::init_tracing;
use parallel_run::{Batch, Completion, ParallelRunner, RunConfig, TaskFn};
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::info;

const SUBMISSION: &str = r#"{
    "first_name": "Ada",
    "last_name": "",
    "kind": "suggestion",
    "message": "This is madness!"
}"#;

#[derive(Debug, Clone, Deserialize)]
struct Submission {
    first_name: String,
    last_name: String,
    kind: String,
    message: String,
}

// Each check resolves after a short simulated round trip.
fn required(field: &'static str, value: String, delay_ms: u64) -> TaskFn<&'static str, String> {
    Box::new(move |signal: Completion<&'static str, String>| {
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            if value.trim().is_empty() {
                signal.fail(format!("{} is required", field));
            } else {
                signal.succeed(field);
            }
        });
    })
}

async fn check_kind(kind: String) -> Result<&'static str, String> {
    tokio::time::sleep(Duration::from_millis(3)).await;
    match kind.as_str() {
        "suggestion" | "problem" => Ok("kind"),
        other => Err(format!("unknown kind '{}'", other)),
    }
}

async fn check_length(message: String) -> Result<usize, String> {
    tokio::time::sleep(Duration::from_millis(1)).await;
    if message.len() > 500 {
        Err("message is too long".to_string())
    } else {
        Ok(message.len())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("info,parallel_run=debug");

    let submission: Submission =
        serde_json::from_str(SUBMISSION).context("Failed to parse submission")?;

    // Callback front end
    let (tx, rx) = oneshot::channel();
    Batch::new().label("required-fields").run(
        vec![
            required("first_name", submission.first_name.clone(), 8),
            required("last_name", submission.last_name.clone(), 2),
            required("message", submission.message.clone(), 5),
        ],
        move |outcome| {
            let _ = tx.send(outcome);
        },
    );
    match rx.await.context("Required-field batch was dropped")? {
        Ok(fields) => info!(?fields, "Required fields present"),
        Err(reason) => info!(%reason, "Submission rejected"),
    }

    // Async front end
    let config = RunConfig::builder()
        .label("content")
        .max_in_flight(2)
        .build()?;
    let runner = ParallelRunner::new(config)?;
    let lengths = runner
        .run(vec![
            check_length(submission.message.clone()),
            check_length(submission.first_name.clone()),
        ])
        .await
        .map_err(|e| anyhow!("{}", e))?;
    let kinds = runner
        .run([check_kind(submission.kind)])
        .await
        .map_err(|e| anyhow!("{}", e))?;
    info!(?lengths, ?kinds, "Content checks passed");

    Ok(())
}
