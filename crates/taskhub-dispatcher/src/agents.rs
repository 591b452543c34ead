//! Simulated agents for the demo binary.
//!
//! They sleep for a short random delay and return a canned JSON result.
//! Nothing here touches the filesystem or the system they claim to check.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use serde_json::{json, Value};
use taskhub_core::{Priority, WorkSpec, WorkerSpec};
use taskhub_dispatcher::{
    DispatchError, Dispatcher, ExecutionContext, ExecutionError, WorkExecutor,
};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentKind {
    DataProcessor,
    FileManager,
    Monitor,
}

impl AgentKind {
    pub const ALL: [AgentKind; 3] = [Self::DataProcessor, Self::FileManager, Self::Monitor];

    pub fn worker_id(&self) -> &'static str {
        match self {
            Self::DataProcessor => "data_processor",
            Self::FileManager => "file_manager",
            Self::Monitor => "monitor",
        }
    }

    pub fn capabilities(&self) -> [&'static str; 3] {
        match self {
            Self::DataProcessor => ["json_parsing", "data_transformation", "report_generation"],
            Self::FileManager => ["file_operations", "backup_creation", "cleanup_operations"],
            Self::Monitor => ["system_monitoring", "alert_generation", "health_checks"],
        }
    }

    pub fn spec(&self) -> WorkerSpec {
        WorkerSpec::named(self.worker_id()).with_capabilities(self.capabilities())
    }
}

pub struct DemoAgent {
    kind: AgentKind,
}

impl DemoAgent {
    pub fn new(kind: AgentKind) -> Self {
        Self { kind }
    }

    fn respond(&self, command: &str, ctx: &ExecutionContext) -> Result<Value, ExecutionError> {
        let mut rng = rand::thread_rng();
        let value = match self.kind {
            AgentKind::Monitor => json!({
                "command": command,
                "cpu_percent": rng.gen_range(5.0..85.0_f64).round(),
                "memory_percent": rng.gen_range(20.0..90.0_f64).round(),
                "healthy": true,
            }),
            AgentKind::FileManager => json!({
                "command": command,
                "source": ctx.params.get("source").cloned().unwrap_or(Value::Null),
                "files_processed": rng.gen_range(1..250),
            }),
            AgentKind::DataProcessor => json!({
                "command": command,
                "report_type": ctx.params.get("type").cloned().unwrap_or(Value::Null),
                "records": rng.gen_range(10..5000),
            }),
        };
        Ok(value)
    }
}

#[async_trait]
impl WorkExecutor for DemoAgent {
    async fn execute(&self, ctx: ExecutionContext) -> Result<Value, ExecutionError> {
        let command = ctx.command.clone().unwrap_or_default();
        if command.contains("fail") {
            return Err(ExecutionError::failed(format!(
                "{} refused command {command}",
                self.kind.worker_id()
            )));
        }

        let delay = Duration::from_millis(rand::thread_rng().gen_range(200..1200));
        tokio::select! {
            _ = tokio::time::sleep(delay) => self.respond(&command, &ctx),
            _ = ctx.cancel.cancelled() => Err(ExecutionError::Cancelled),
        }
    }
}

/// Register one worker per agent kind.
pub async fn register_all(dispatcher: &Dispatcher) -> Result<(), DispatchError> {
    for kind in AgentKind::ALL {
        dispatcher
            .register_worker(kind.spec(), Arc::new(DemoAgent::new(kind)))
            .await?;
    }
    Ok(())
}

/// Submit the three example work items, each targeted at its agent.
pub async fn seed_examples(dispatcher: &Dispatcher) -> Result<(), DispatchError> {
    let examples = [
        WorkSpec::new("System Health Check")
            .with_description("Check overall system health")
            .with_command("check_health")
            .with_priority(Priority::High)
            .with_target(AgentKind::Monitor.worker_id()),
        WorkSpec::new("Backup Logs")
            .with_description("Create backup of log files")
            .with_command("create_backup")
            .with_param("source", "./logs")
            .with_target(AgentKind::FileManager.worker_id()),
        WorkSpec::new("Process Reports")
            .with_description("Generate system report")
            .with_command("generate_report")
            .with_param("type", "comprehensive")
            .with_target(AgentKind::DataProcessor.worker_id()),
    ];

    for spec in examples {
        let id = dispatcher.submit_work(spec).await?;
        info!(work_id = %id, "Seeded example work");
    }
    Ok(())
}
