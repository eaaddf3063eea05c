//! Reload freshness: a term removed from the source stops matching within
//! one reload interval, without disturbing the running pipeline.

mod helpers;

use helpers::{test_config, wait_for};
use std::time::Duration;
use termwatch::app::App;
use termwatch::core::CertificateEvent;
use tokio::sync::{mpsc, watch};

fn event(domains: &[&str]) -> CertificateEvent {
    CertificateEvent::new(domains.iter().map(|d| d.to_string()).collect())
}

#[tokio::test]
async fn removed_term_stops_matching_after_reload() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path(), &["example", "beta"]);
    config.terms.reload_interval_seconds = 1;
    let terms_path = config.terms.file.clone();

    let (events_tx, events_rx) = async_channel::unbounded();
    let (reload_tx, mut reload_rx) = mpsc::channel(4);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let app = App::builder(config)
        .events_rx_for_test(events_rx)
        .term_reload_notifier(reload_tx)
        .build(shutdown_rx)
        .await
        .unwrap();
    let store = app.store();

    // The term matches while it is in the source.
    events_tx.send(event(&["first-example.com"])).await.unwrap();
    assert!(
        wait_for(
            || store.exists("first-example.com").unwrap_or(false),
            Duration::from_secs(5)
        )
        .await
    );

    // Remove "example" from the source and wait for a completed reload
    // that observed the change (the first tick may race the write).
    std::fs::write(&terms_path, "beta\n").unwrap();
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            reload_rx
                .recv()
                .await
                .expect("reload notifier should be open");
            if !app.terms().current().contains("example") {
                break;
            }
        }
    })
    .await
    .expect("reload should happen within the interval");

    // Events containing only the removed term no longer match; an event
    // for the surviving term does, which also proves the queue drained.
    events_tx.send(event(&["second-example.com"])).await.unwrap();
    events_tx.send(event(&["beta-site.com"])).await.unwrap();

    assert!(
        wait_for(
            || store.exists("beta-site.com").unwrap_or(false),
            Duration::from_secs(5)
        )
        .await
    );
    assert!(!store.exists("second-example.com").unwrap());

    shutdown_tx.send(true).unwrap();
    app.run().await.unwrap();
}
