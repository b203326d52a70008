//! Long-running foreman loop: pump and evoke until shutdown.

use std::sync::Arc;

use tokio::sync::broadcast;

use atelier_core::FsKnowledgeBase;

use crate::config::ForemanConfig;
use crate::error::{io_err, ForemanError};
use crate::foreman::{DrainSummary, EvokeOutcome, Foreman};
use crate::watch::StoreWatch;

pub const LOG_FORMAT_ENV: &str = "ATELIER_LOG_FORMAT";

/// Open the knowledge base under `config.home` and build a registered foreman.
pub fn open_foreman(config: &ForemanConfig) -> Result<Foreman, ForemanError> {
    let kb = FsKnowledgeBase::open_at(&config.home)?;
    Ok(registered(Arc::new(kb), config))
}

fn registered(kb: Arc<FsKnowledgeBase>, config: &ForemanConfig) -> Foreman {
    let mut foreman = Foreman::new(kb, config.executor());
    foreman.register();
    foreman
}

/// Start the foreman and block the current thread until ctrl-c or until every
/// notification source closes. Documents other processes write under
/// `config.home` meanwhile are picked up through a [`StoreWatch`].
pub fn start_blocking(config: ForemanConfig) -> Result<(), ForemanError> {
    init_tracing();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;

    runtime.block_on(async move {
        let kb = Arc::new(FsKnowledgeBase::open_at(&config.home)?);
        let watch = StoreWatch::start(kb.clone())?;
        let foreman = registered(kb, &config);
        let (shutdown_tx, shutdown_rx) = broadcast::channel::<()>(4);
        let watch_handle = tokio::spawn(watch.run(shutdown_tx.subscribe()));

        let signal_handle = {
            let shutdown = shutdown_tx.clone();
            let mut shutdown_rx = shutdown_tx.subscribe();
            tokio::spawn(async move {
                tokio::select! {
                    _ = shutdown_rx.recv() => {}
                    signal = tokio::signal::ctrl_c() => {
                        match signal {
                            Ok(()) => tracing::info!("received ctrl-c, shutting down foreman"),
                            Err(err) => tracing::error!(error = %err, "ctrl-c handler failed"),
                        }
                        let _ = shutdown.send(());
                    }
                }
            })
        };

        let result = run(foreman, shutdown_rx).await;
        let _ = shutdown_tx.send(());
        signal_handle.await.map_err(|err| ForemanError::Join {
            task: "signal_handler",
            message: err.to_string(),
        })?;
        watch_handle.await.map_err(|err| ForemanError::Join {
            task: "store_watch",
            message: err.to_string(),
        })??;
        result
    })
}

/// Open, register and drain once: plan everything currently known, execute
/// until nothing is ready, then return.
pub fn drain_blocking(config: ForemanConfig) -> Result<DrainSummary, ForemanError> {
    init_tracing();
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(async move {
        let mut foreman = open_foreman(&config)?;
        foreman.drain().await
    })
}

/// Alternate pump and evoke until `shutdown` fires or all sources close.
///
/// Announced notices are folded in before each evoke so the queue reflects
/// the latest catalog state. An evoke interrupted by shutdown returns its
/// lease and publishes nothing.
pub async fn run(
    mut foreman: Foreman,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<(), ForemanError> {
    loop {
        while foreman.try_pump()?.is_some() {}

        let outcome = tokio::select! {
            _ = shutdown.recv() => break,
            outcome = foreman.evoke() => outcome?,
        };

        match outcome {
            EvokeOutcome::Idle => {
                tokio::select! {
                    _ = shutdown.recv() => break,
                    notice = foreman.pump() => {
                        if notice?.is_none() {
                            tracing::info!("all notification sources closed");
                            break;
                        }
                    }
                }
            }
            EvokeOutcome::Released {
                commission,
                job,
                catalogs,
                unpublished,
            } => {
                tracing::info!(
                    commission = %commission,
                    job = %job,
                    released = catalogs.len(),
                    unpublished = unpublished.len(),
                    queued = foreman.queue().len(),
                    "plan released",
                );
            }
            EvokeOutcome::Failed {
                commission,
                job,
                error,
            } => {
                tracing::warn!(commission = %commission, job = %job, error = %error, "plan failed");
            }
        }
    }
    tracing::info!(queued = foreman.queue().len(), "foreman stopped");
    Ok(())
}

/// Install the global subscriber on stderr. `RUST_LOG` overrides the `info`
/// default; `ATELIER_LOG_FORMAT=json` switches to one JSON object per event.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var(LOG_FORMAT_ENV).is_ok_and(|format| format.eq_ignore_ascii_case("json"));
    let _ = if json {
        fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(false)
            .with_writer(std::io::stderr)
            .try_init()
    } else {
        fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .try_init()
    };
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use atelier_core::{
        Action, CatalogBook, CatalogId, Commission, CommissionId, Formula, Input, KnowledgeBase,
        MemoryKnowledgeBase, Output, Sku,
    };
    use tempfile::TempDir;

    use super::*;
    use crate::executor::DryRunExecutor;

    fn commission(id: &str, input: &str) -> Commission {
        let mut formula = Formula {
            action: Action {
                exec: vec!["build".into()],
                ..Action::default()
            },
            ..Formula::default()
        };
        formula.inputs.insert(CatalogId::from(input), Input::default());
        formula.outputs.insert(
            "x".into(),
            Output {
                path: "/out".into(),
                packing: "tar".into(),
                sku: None,
            },
        );
        Commission {
            id: CommissionId::from(id),
            formula,
        }
    }

    #[tokio::test]
    async fn run_processes_chain_then_stops_on_shutdown() {
        let kb = Arc::new(MemoryKnowledgeBase::new());
        kb.publish_commission(commission("B", "A")).expect("B");
        kb.publish_commission(commission("E", "B::x")).expect("E");
        kb.publish_catalog(CatalogBook::new("A").release("", Sku::new("tar", "a1")))
            .expect("A");

        let mut foreman = Foreman::new(kb.clone(), Arc::new(DryRunExecutor));
        foreman.register();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = tokio::spawn(run(foreman, shutdown_rx));

        let e_x = CatalogId::from("E::x");
        for _ in 0..200 {
            if kb.catalog(&e_x).is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(kb.catalog(&e_x).expect("E::x released").all().len(), 1);

        shutdown_tx.send(()).expect("shutdown");
        handle.await.expect("join").expect("run");
    }

    #[test]
    fn drain_blocking_runs_against_persistent_store() {
        let home = TempDir::new().expect("home");
        {
            let kb = FsKnowledgeBase::open_at(home.path()).expect("open");
            kb.publish_commission(commission("B", "A")).expect("B");
            kb.publish_catalog(CatalogBook::new("A").release("", Sku::new("tar", "a1")))
                .expect("A");
        }

        let config = ForemanConfig::at(home.path()).with_dry_run(true);
        let summary = drain_blocking(config).expect("drain");
        assert_eq!(summary.executed, 1);
        assert_eq!(summary.released, vec![CatalogId::from("B::x")]);

        let kb = FsKnowledgeBase::open_at(home.path()).expect("reopen");
        assert!(kb.catalog(&CatalogId::from("B::x")).is_some());
    }
}
