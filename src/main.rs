use resilience::{
    config::ResilienceConfig, error::RetryError, init_tracing, metrics::MetricsService,
    queue::TaskStatus, Resilience,
};
use std::env;
use std::process;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

const DEMO_JOBS: usize = 20;

#[tokio::main]
async fn main() {
    // Initialize tracing
    init_tracing();

    // Get config file path from command line or use default
    let config_path = env::args()
        .nth(1)
        .unwrap_or_else(|| "config/resilience.yaml".to_string());

    // Load configuration
    let config = match ResilienceConfig::from_file(&config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration from {}: {}", config_path, e);
            eprintln!("Usage: resilience [config_file]");
            process::exit(1);
        }
    };

    if let Err(e) = run(config).await {
        eprintln!("Resilience demo error: {:#}", e);
        process::exit(1);
    }
}

/// Push a batch of jobs through the queue, each calling a flaky dependency
async fn run(config: ResilienceConfig) -> anyhow::Result<()> {
    let metrics = MetricsService::new()?;
    let resilience = Resilience::new(config)?;

    // Every third call to the upstream fails
    let calls = Arc::new(AtomicU32::new(0));

    let mut task_ids = Vec::with_capacity(DEMO_JOBS);
    for job in 0..DEMO_JOBS {
        let executor = resilience.retry_executor(Some("upstream"));
        let calls = calls.clone();

        task_ids.push(resilience.queue().enqueue(async move {
            executor
                .execute(|| {
                    let calls = calls.clone();
                    async move {
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        let n = calls.fetch_add(1, Ordering::SeqCst);
                        if n % 3 == 2 {
                            Err(anyhow::anyhow!("upstream timed out on call {}", n))
                        } else {
                            Ok(serde_json::json!({ "job": job, "call": n }))
                        }
                    }
                })
                .await
                .map_err(|e| match e {
                    RetryError::CircuitOpen { breaker } => {
                        anyhow::anyhow!("dependency '{}' unavailable", breaker)
                    }
                    RetryError::Operation(e) => e,
                })
        }));
    }

    loop {
        let pending = task_ids
            .iter()
            .filter_map(|id| resilience.queue().get_status(id))
            .filter(|record| !record.status.is_terminal())
            .count();
        if pending == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    let failed = task_ids
        .iter()
        .filter_map(|id| resilience.queue().get_status(id))
        .filter(|record| record.status == TaskStatus::Failed)
        .count();
    info!(jobs = DEMO_JOBS, failed, "Demo batch finished");

    println!("{}", resilience.status().to_json_pretty()?);
    println!("{}", metrics.render());

    Ok(())
}
