// Command handlers
// The only place where failures turn into data: every invocation yields a QueryResult

use futures::FutureExt;
use serde_json::Value;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant};
use tracing::{error, info};

use crate::auth::resolver::AuthHeaderResolver;
use crate::models::{ApiQueryCommand, DatabaseQueryCommand, QueryResult, QueryStatus};
use crate::pipeline::api::{ApiPipeline, ApiRun};
use crate::pipeline::database::{DatabasePipeline, DatabaseRun};
use crate::{QueryBridgeError, Result};

/// Run `invocation` under an optional deadline, turning a panic into an error
async fn guarded<F>(invocation: F, limit: Option<Duration>) -> Result<F::Output>
where
    F: Future,
{
    let invocation = AssertUnwindSafe(invocation).catch_unwind();

    let outcome = match limit {
        Some(limit) => tokio::time::timeout(limit, invocation).await.map_err(|_| {
            QueryBridgeError::Timeout(format!(
                "query did not finish within {:.1}s",
                limit.as_secs_f64()
            ))
        })?,
        None => invocation.await,
    };

    outcome.map_err(|panic| QueryBridgeError::Internal(panic_message(&*panic)))
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("pipeline panicked: {}", message)
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("pipeline panicked: {}", message)
    } else {
        "pipeline panicked".to_string()
    }
}

fn status_of(error: &Option<String>) -> QueryStatus {
    if error.is_some() {
        QueryStatus::Error
    } else {
        QueryStatus::Success
    }
}

/// Runs database commands through a [`DatabasePipeline`]
pub struct DatabaseQueryHandler {
    pipeline: DatabasePipeline,
}

impl DatabaseQueryHandler {
    pub fn new(pipeline: DatabasePipeline) -> Self {
        Self { pipeline }
    }

    pub async fn handle(&self, command: &DatabaseQueryCommand) -> QueryResult {
        let start = Instant::now();
        let invocation = self.pipeline.run(
            command.database_url(),
            command.user_query(),
            command.max_tables(),
        );

        match guarded(invocation, command.query_timeout()).await {
            Ok(run) => {
                let result = Self::to_result(run, start.elapsed());
                info!(status = %result.status, elapsed = result.execution_time, "database query handled");
                result
            }
            Err(e) => {
                error!(error = %e, "database query aborted");
                QueryResult::failure(e.to_string(), start.elapsed())
            }
        }
    }

    fn to_result(run: DatabaseRun, elapsed: Duration) -> QueryResult {
        let mut result = QueryResult::new(status_of(&run.error), run.final_response.unwrap_or_default())
            .with_analysis(run.analysis)
            .with_data(run.results)
            .with_execution_time(elapsed)
            .with_metadata("tables_analyzed", run.selected_tables)
            .with_metadata("step", run.step.as_str())
            .with_metadata(
                "schema_summary",
                run.schema_summary.map_or(Value::Null, Value::String),
            );

        if let Some(stage) = run.failed_stage {
            result = result.with_metadata("failed_stage", stage.as_str());
        }
        if let Some(error) = run.error {
            result = result.with_error(error);
        }
        result
    }
}

/// Resolves auth headers, then runs API commands through an [`ApiPipeline`]
pub struct ApiQueryHandler {
    pipeline: ApiPipeline,
    resolver: AuthHeaderResolver,
}

impl ApiQueryHandler {
    pub fn new(pipeline: ApiPipeline, resolver: AuthHeaderResolver) -> Self {
        Self { pipeline, resolver }
    }

    pub async fn handle(&self, command: &ApiQueryCommand) -> QueryResult {
        let start = Instant::now();
        let invocation = async {
            // Token exchange counts against the command's timeout too
            let headers = self
                .resolver
                .resolve_with_extra(command.auth(), command.extra_headers())
                .await?;
            Ok::<_, QueryBridgeError>(
                self.pipeline
                    .run(
                        command.swagger_url(),
                        command.user_query(),
                        &headers,
                        command.max_endpoints(),
                    )
                    .await,
            )
        };

        match guarded(invocation, command.timeout()).await.and_then(|run| run) {
            Ok(run) => {
                let result = Self::to_result(run, command, start.elapsed());
                info!(
                    status = %result.status,
                    elapsed = result.execution_time,
                    auth_type = %command.auth().auth_type(),
                    "api query handled"
                );
                result
            }
            Err(e) => {
                error!(error = %e, "api query aborted");
                QueryResult::failure(e.to_string(), start.elapsed())
                    .with_metadata("auth_type", command.auth().auth_type().as_str())
            }
        }
    }

    fn to_result(run: ApiRun, command: &ApiQueryCommand, elapsed: Duration) -> QueryResult {
        let endpoints_used = run.endpoints_used();
        let mut result = QueryResult::new(status_of(&run.error), run.final_response.unwrap_or_default())
            .with_analysis(run.analysis)
            .with_data(run.api_data)
            .with_execution_time(elapsed)
            .with_metadata("endpoints_discovered", run.endpoints_discovered)
            .with_metadata("endpoints_used", endpoints_used)
            .with_metadata("step", run.step.as_str())
            .with_metadata("auth_type", command.auth().auth_type().as_str());

        if let Some(stage) = run.failed_stage {
            result = result.with_metadata("failed_stage", stage.as_str());
        }
        if let Some(error) = run.error {
            result = result.with_error(error);
        }
        result
    }
}
