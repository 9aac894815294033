// Database query pipeline
// load schema → select tables → plan SQL → execute → analyze → finalize

use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{string_field, PipelineStep, StageFailure};
use crate::database::connection::DatabaseConnection;
use crate::database::schema::{DatabaseSchema, SchemaAnalyzer};
use crate::database::{ensure_read_only, DatabaseRepository, Row, DEFAULT_ROW_LIMIT};
use crate::llm::prompts::{database_analysis_messages, query_plan_messages, DataAnalyzer};
use crate::llm::{parse_json_reply, LanguageModel};
use crate::QueryBridgeError;

type StageResult<T> = std::result::Result<T, StageFailure>;

/// Schema fetched and summarised
#[derive(Debug, Clone)]
pub struct SchemaLoaded {
    pub schema: DatabaseSchema,
    pub summary: String,
}

#[derive(Debug, Clone)]
pub struct TablesSelected {
    pub summary: String,
    pub tables: Vec<String>,
}

/// One `{table, sql}` entry from the planner
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedQuery {
    pub table: String,
    pub sql: String,
}

#[derive(Debug, Clone)]
pub struct QueriesPlanned {
    pub tables: Vec<String>,
    pub queries: Vec<PlannedQuery>,
}

/// Outcome of a single planned statement
#[derive(Debug, Clone, PartialEq)]
pub struct QueryExecution {
    pub query: PlannedQuery,
    pub outcome: std::result::Result<Vec<Row>, String>,
}

impl QueryExecution {
    /// `{table, source, sql, data}` on success, `{table, source, sql, error}` on failure
    pub fn to_record(&self) -> Value {
        let mut record = json!({
            "table": self.query.table,
            "source": self.query.table,
            "sql": self.query.sql,
        });
        match &self.outcome {
            Ok(rows) => record["data"] = Value::Array(rows.iter().cloned().map(Value::Object).collect()),
            Err(error) => record["error"] = Value::String(error.clone()),
        }
        record
    }
}

#[derive(Debug, Clone)]
pub struct QueriesExecuted {
    pub tables: Vec<String>,
    pub executions: Vec<QueryExecution>,
}

#[derive(Debug, Clone)]
pub struct DatabaseAnalyzed {
    pub tables: Vec<String>,
    pub records: Vec<Value>,
    pub analysis: String,
}

/// Everything a finished run exposes, successful or not
#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseRun {
    /// Last stage that completed
    pub step: PipelineStep,
    pub failed_stage: Option<PipelineStep>,
    pub error: Option<String>,
    pub final_response: Option<String>,
    pub analysis: Option<String>,
    pub schema_summary: Option<String>,
    pub selected_tables: Vec<String>,
    pub results: Vec<Value>,
}

impl DatabaseRun {
    fn started() -> Self {
        Self {
            step: PipelineStep::Started,
            failed_stage: None,
            error: None,
            final_response: None,
            analysis: None,
            schema_summary: None,
            selected_tables: Vec::new(),
            results: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Tables whose lower-cased name occurs in the question; the first `max_tables` when none do
pub fn select_tables(available: &[String], user_query: &str, max_tables: usize) -> Vec<String> {
    let question = user_query.to_lowercase();
    let matched: Vec<String> = available
        .iter()
        .filter(|table| question.contains(&table.to_lowercase()))
        .cloned()
        .collect();

    let selected = if matched.is_empty() {
        available.to_vec()
    } else {
        matched
    };
    selected.into_iter().take(max_tables).collect()
}

/// Read the planner reply: `{"queries": [...]}` or a bare list
pub fn parse_query_plan(reply: &Value) -> std::result::Result<Vec<PlannedQuery>, QueryBridgeError> {
    let items = match reply {
        Value::Array(items) => items,
        Value::Object(map) => match map.get("queries") {
            Some(Value::Array(items)) => items,
            None => return Ok(Vec::new()),
            Some(_) => {
                return Err(QueryBridgeError::Planning(
                    "\"queries\" must be a list".to_string(),
                ))
            }
        },
        _ => {
            return Err(QueryBridgeError::Planning(format!(
                "unexpected query plan: {}",
                reply
            )))
        }
    };

    Ok(items
        .iter()
        .filter(|item| item.is_object())
        .map(|item| PlannedQuery {
            table: string_field(item, "table").unwrap_or_default().to_string(),
            sql: string_field(item, "sql").unwrap_or_default().to_string(),
        })
        .collect())
}

/// Natural-language questions over a relational database
pub struct DatabasePipeline {
    db: Arc<dyn DatabaseRepository>,
    llm: Arc<dyn LanguageModel>,
    row_limit: usize,
}

impl DatabasePipeline {
    pub fn new(db: Arc<dyn DatabaseRepository>, llm: Arc<dyn LanguageModel>) -> Self {
        Self {
            db,
            llm,
            row_limit: DEFAULT_ROW_LIMIT,
        }
    }

    pub fn with_row_limit(mut self, row_limit: usize) -> Self {
        self.row_limit = row_limit;
        self
    }

    /// Run every stage in order, stopping at the first failure
    pub async fn run(&self, database_url: &str, user_query: &str, max_tables: usize) -> DatabaseRun {
        let mut run = DatabaseRun::started();

        match self.drive(database_url, user_query, max_tables, &mut run).await {
            Ok(analyzed) => {
                run.analysis = Some(analyzed.analysis.clone());
                run.final_response = Some(analyzed.analysis);
                run.step = PipelineStep::Complete;
            }
            Err(failure) => {
                warn!(stage = %failure.stage, error = %failure.message, "database pipeline failed");
                run.final_response = None;
                run.failed_stage = Some(failure.stage);
                run.error = Some(failure.message);
            }
        }
        run
    }

    async fn drive(
        &self,
        database_url: &str,
        user_query: &str,
        max_tables: usize,
        run: &mut DatabaseRun,
    ) -> StageResult<DatabaseAnalyzed> {
        let loaded = self.load_schema(database_url).await?;
        run.schema_summary = Some(loaded.summary.clone());
        run.step = PipelineStep::SchemaLoaded;

        let selected = Self::select(loaded, user_query, max_tables);
        run.selected_tables = selected.tables.clone();
        run.step = PipelineStep::TablesSelected;

        let planned = self.plan(selected, user_query, max_tables).await?;
        run.step = PipelineStep::QueriesPlanned;

        let executed = self.execute(database_url, planned).await;
        run.results = executed.executions.iter().map(QueryExecution::to_record).collect();
        run.step = PipelineStep::QueriesExecuted;

        let analyzed = self.analyze(executed, user_query).await?;
        run.step = PipelineStep::AnalysisComplete;
        Ok(analyzed)
    }

    pub async fn load_schema(&self, database_url: &str) -> StageResult<SchemaLoaded> {
        let metadata = self
            .db
            .describe_schema(database_url)
            .await
            .map_err(|e| StageFailure::new(PipelineStep::SchemaLoaded, e.to_string()))?;

        let database_name = DatabaseConnection::from_url(database_url)
            .ok()
            .and_then(|connection| connection.database)
            .unwrap_or_else(|| "database".to_string());
        let schema = SchemaAnalyzer::build_schema(database_name, metadata);
        let summary = schema.summary();

        info!(tables = schema.tables.len(), "schema loaded");
        Ok(SchemaLoaded { schema, summary })
    }

    fn select(loaded: SchemaLoaded, user_query: &str, max_tables: usize) -> TablesSelected {
        let tables = select_tables(&loaded.schema.table_names(), user_query, max_tables);
        debug!(?tables, "tables selected");
        TablesSelected {
            summary: loaded.summary,
            tables,
        }
    }

    pub async fn plan(
        &self,
        selected: TablesSelected,
        user_query: &str,
        max_tables: usize,
    ) -> StageResult<QueriesPlanned> {
        let fail = |e: QueryBridgeError| StageFailure::new(PipelineStep::QueriesPlanned, e.to_string());

        if selected.tables.is_empty() {
            return Err(StageFailure::new(
                PipelineStep::QueriesPlanned,
                "No se encontraron tablas para consultar",
            ));
        }

        let messages = query_plan_messages(&selected.summary, &selected.tables, user_query);
        let reply = self
            .llm
            .complete(&messages)
            .await
            .map_err(|e| fail(e.into()))?;
        let plan = parse_json_reply(&reply).map_err(|e| fail(e.into()))?;

        let mut queries = parse_query_plan(&plan).map_err(fail)?;
        queries.truncate(max_tables);

        info!(queries = queries.len(), model = self.llm.model_name(), "queries planned");
        Ok(QueriesPlanned {
            tables: selected.tables,
            queries,
        })
    }

    /// Failures are recorded per statement; siblings still run
    pub async fn execute(&self, database_url: &str, planned: QueriesPlanned) -> QueriesExecuted {
        let mut executions = Vec::with_capacity(planned.queries.len());

        for query in planned.queries.into_iter().filter(|q| !q.sql.is_empty()) {
            let outcome = match ensure_read_only(&query.sql) {
                Err(e) => Err(e.to_string()),
                Ok(()) => self
                    .db
                    .fetch_rows(database_url, &query.sql, self.row_limit)
                    .await
                    .map_err(|e| e.to_string()),
            };

            match &outcome {
                Ok(rows) => debug!(table = %query.table, rows = rows.len(), "query executed"),
                Err(error) => warn!(table = %query.table, sql = %query.sql, %error, "query failed"),
            }
            executions.push(QueryExecution { query, outcome });
        }

        QueriesExecuted {
            tables: planned.tables,
            executions,
        }
    }

    pub async fn analyze(&self, executed: QueriesExecuted, user_query: &str) -> StageResult<DatabaseAnalyzed> {
        let records: Vec<Value> = executed.executions.iter().map(QueryExecution::to_record).collect();
        let prompt = DataAnalyzer::build_analysis_prompt(user_query, &records);

        let analysis = self
            .llm
            .complete(&database_analysis_messages(prompt))
            .await
            .map_err(|e| {
                StageFailure::new(
                    PipelineStep::AnalysisComplete,
                    QueryBridgeError::from(e).to_string(),
                )
            })?;

        Ok(DatabaseAnalyzed {
            tables: executed.tables,
            records,
            analysis,
        })
    }
}
