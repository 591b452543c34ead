//! Prometheus metrics collection and formatting.
//!
//! This module provides metrics in Prometheus text exposition format.

use std::fmt::Write;

use crate::dispatcher::Dispatcher;
use crate::status::DispatchStatus;

/// Collect all metrics from the dispatcher and format as Prometheus text.
pub async fn collect_metrics(dispatcher: &Dispatcher) -> String {
    let status = dispatcher.get_status().await;
    let mut output = String::new();

    collect_worker_metrics(&status, &mut output);
    collect_work_metrics(&status, &mut output);

    output
}

/// Collect worker gauges, in aggregate and per worker.
fn collect_worker_metrics(status: &DispatchStatus, output: &mut String) {
    let busy = status.busy_workers();
    let idle = status.workers.len() - busy;

    writeln!(
        output,
        "# HELP taskhub_workers_registered Number of registered workers by state"
    )
    .ok();
    writeln!(output, "# TYPE taskhub_workers_registered gauge").ok();
    writeln!(output, "taskhub_workers_registered{{state=\"idle\"}} {idle}").ok();
    writeln!(output, "taskhub_workers_registered{{state=\"busy\"}} {busy}").ok();

    writeln!(output).ok();
    writeln!(
        output,
        "# HELP taskhub_worker_busy Whether a worker currently holds work"
    )
    .ok();
    writeln!(output, "# TYPE taskhub_worker_busy gauge").ok();
    for worker in &status.workers {
        writeln!(
            output,
            "taskhub_worker_busy{{worker=\"{}\"}} {}",
            worker.id,
            u8::from(worker.busy)
        )
        .ok();
    }

    writeln!(output).ok();
    writeln!(
        output,
        "# HELP taskhub_worker_finished_total Work finished per worker"
    )
    .ok();
    writeln!(output, "# TYPE taskhub_worker_finished_total counter").ok();
    for worker in &status.workers {
        writeln!(
            output,
            "taskhub_worker_finished_total{{worker=\"{}\"}} {}",
            worker.id, worker.completed_count
        )
        .ok();
    }
}

/// Collect work counts by status plus the lifetime counters.
fn collect_work_metrics(status: &DispatchStatus, output: &mut String) {
    writeln!(output).ok();
    writeln!(
        output,
        "# HELP taskhub_work Number of work records by status"
    )
    .ok();
    writeln!(output, "# TYPE taskhub_work gauge").ok();
    writeln!(
        output,
        "taskhub_work{{status=\"pending\"}} {}",
        status.pending_count
    )
    .ok();
    writeln!(
        output,
        "taskhub_work{{status=\"running\"}} {}",
        status.running_count
    )
    .ok();
    writeln!(
        output,
        "taskhub_work{{status=\"completed\"}} {}",
        status.completed_count
    )
    .ok();
    writeln!(
        output,
        "taskhub_work{{status=\"failed\"}} {}",
        status.failed_count
    )
    .ok();

    writeln!(output).ok();
    writeln!(
        output,
        "# HELP taskhub_work_received_total Work submitted since the state file was created"
    )
    .ok();
    writeln!(output, "# TYPE taskhub_work_received_total counter").ok();
    writeln!(
        output,
        "taskhub_work_received_total {}",
        status.stats.total_received
    )
    .ok();
    writeln!(
        output,
        "# HELP taskhub_work_assigned_total Work handed to a worker"
    )
    .ok();
    writeln!(output, "# TYPE taskhub_work_assigned_total counter").ok();
    writeln!(
        output,
        "taskhub_work_assigned_total {}",
        status.stats.total_assigned
    )
    .ok();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DispatcherConfig;
    use crate::runtime::{from_fn, ExecutionContext};
    use taskhub_core::{WorkSpec, WorkerSpec};

    #[tokio::test]
    async fn test_collect_metrics_empty_state() {
        let dispatcher = Dispatcher::new(DispatcherConfig::default());
        let output = collect_metrics(&dispatcher).await;

        assert!(output.contains("taskhub_workers_registered{state=\"idle\"} 0"));
        assert!(output.contains("taskhub_work{status=\"pending\"} 0"));
        assert!(output.contains("taskhub_work_received_total 0"));
    }

    #[tokio::test]
    async fn test_collect_metrics_with_busy_worker() {
        let dispatcher = Dispatcher::new(DispatcherConfig::default());
        let exec = from_fn(|ctx: ExecutionContext| async move {
            ctx.cancel.cancelled().await;
            Ok(serde_json::Value::Null)
        });
        dispatcher
            .register_worker(WorkerSpec::named("monitor").with_capability("health_checks"), exec)
            .await
            .unwrap();
        dispatcher
            .submit_work(WorkSpec::new("System Health Check").with_command("check_health"))
            .await
            .unwrap();
        dispatcher
            .submit_work(WorkSpec::new("Nothing matches").with_command("zzz_qqq"))
            .await
            .unwrap();

        let output = collect_metrics(&dispatcher).await;
        assert!(output.contains("taskhub_worker_busy{worker=\"monitor\"} 1"));
        assert!(output.contains("taskhub_workers_registered{state=\"busy\"} 1"));
        assert!(output.contains("taskhub_work{status=\"running\"} 1"));
        assert!(output.contains("taskhub_work{status=\"pending\"} 1"));
        assert!(output.contains("taskhub_work_received_total 2"));
    }
}
