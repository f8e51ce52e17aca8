//! Engine integration tests over a temp catalog and the recording RPM
//! double.

use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use urpm_engine::{Acquirer, CacheEvictor, ExecutionRequest, Executor, UndoDriver};
use urpm_net::{MirrorSelector, NetClient};
use urpm_resolver::{Transaction, TransactionItem};
use urpm_rpm::MockRpm;
use urpm_store::{Catalog, NewMedia};
use urpm_types::{HistoryAction, HistoryStatus, Nevra, PackageDirection};

struct Fixture {
    _dir: TempDir,
    catalog: Catalog,
    media_id: i64,
    cache_dir: PathBuf,
    lock_path: PathBuf,
    rpm: Arc<MockRpm>,
}

async fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let catalog = Catalog::open(&dir.path().join("packages.db")).await.unwrap();
    let media_id = catalog
        .add_media(&NewMedia {
            name: "Core Release".into(),
            short_id: "core_release".into(),
            update: false,
            priority: 50,
            relative_path: "media/core/release".into(),
            sync_files: true,
        })
        .await
        .unwrap();
    let cache_dir = dir.path().join("cache");
    let lock_path = dir.path().join("urpm.lock");
    Fixture {
        catalog,
        media_id,
        cache_dir,
        lock_path,
        rpm: Arc::new(MockRpm::new()),
        _dir: dir,
    }
}

fn executor(fx: &Fixture, tx: urpm_events::EventSender) -> Executor {
    let net = NetClient::with_defaults().unwrap();
    Executor {
        catalog: fx.catalog.clone(),
        rpm: Arc::clone(&fx.rpm) as Arc<dyn urpm_rpm::RpmTransaction>,
        acquirer: Acquirer {
            catalog: fx.catalog.clone(),
            net,
            selector: Arc::new(MirrorSelector::new()),
            cache_dir: fx.cache_dir.clone(),
            max_workers: 4,
            peer_timeout: Duration::from_secs(2),
            tx: tx.clone(),
            cancel: Arc::new(AtomicBool::new(false)),
        },
        lock_path: fx.lock_path.clone(),
        tx,
        cancel: Arc::new(AtomicBool::new(false)),
    }
}

async fn seed_cache(fx: &Fixture, nevra: &str) {
    let dir = fx.cache_dir.join("core_release");
    tokio::fs::create_dir_all(&dir).await.unwrap();
    tokio::fs::write(dir.join(format!("{nevra}.rpm")), b"fake rpm payload")
        .await
        .unwrap();
}

fn install_item(fx: &Fixture, nevra: &str) -> TransactionItem {
    TransactionItem {
        nevra: Nevra::parse(nevra),
        media_id: Some(fx.media_id),
        digest: None,
        file_size: None,
    }
}

#[tokio::test]
async fn execute_records_complete_history() {
    let fx = fixture().await;
    let (tx, mut rx) = urpm_events::channel();

    seed_cache(&fx, "vim-common-9.1-1.noarch").await;
    seed_cache(&fx, "vim-9.1-1.x86_64").await;

    let transaction = Transaction {
        to_install: vec![
            install_item(&fx, "vim-common-9.1-1.noarch"),
            install_item(&fx, "vim-9.1-1.x86_64"),
        ],
        ..Transaction::default()
    };

    let exec = executor(&fx, tx);
    let history_id = exec
        .execute(
            &transaction,
            &ExecutionRequest {
                action: HistoryAction::Install,
                command_line: "urpm install vim".into(),
                user: "root".into(),
                test_only: false,
            },
        )
        .await
        .unwrap();

    // Install elements handed off dependency-first
    let handed = fx.rpm.transactions();
    assert_eq!(handed.len(), 1);
    assert_eq!(handed[0].len(), 2);

    // History entry is terminal-complete with the NEVRA set that is now
    // in the RPM database
    let entry = fx.catalog.history_entry(history_id).await.unwrap();
    assert_eq!(entry.status, HistoryStatus::Complete);
    let added: Vec<&str> = entry
        .packages
        .iter()
        .filter(|p| p.direction == PackageDirection::Added)
        .map(|p| p.nevra.as_str())
        .collect();
    assert_eq!(added.len(), 2);
    let installed_now = fx.rpm.installed();
    for nevra in added {
        assert!(installed_now.iter().any(|n| n == nevra));
    }

    // Events flowed
    let mut saw_started = false;
    while let Ok(event) = rx.try_recv() {
        if matches!(event, urpm_events::Event::TransactionStarted { .. }) {
            saw_started = true;
        }
    }
    assert!(saw_started);
}

#[tokio::test]
async fn failed_handoff_marks_history_failed() {
    let fx = fixture().await;
    let (tx, _rx) = urpm_events::channel();
    seed_cache(&fx, "broken-1.0-1.x86_64").await;
    fx.rpm.fail_next();

    let transaction = Transaction {
        to_install: vec![install_item(&fx, "broken-1.0-1.x86_64")],
        ..Transaction::default()
    };

    let exec = executor(&fx, tx);
    let err = exec
        .execute(
            &transaction,
            &ExecutionRequest {
                action: HistoryAction::Install,
                command_line: "urpm install broken".into(),
                user: "root".into(),
                test_only: false,
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.exit_code(), 3);

    let entries = fx.catalog.history_list(10).await.unwrap();
    assert_eq!(entries[0].status, HistoryStatus::Failed);
    assert!(entries[0].error.as_deref().unwrap().contains("simulated"));
}

#[tokio::test]
async fn undo_inverts_an_install() {
    let fx = fixture().await;
    let (tx, _rx) = urpm_events::channel();

    seed_cache(&fx, "vim-common-9.1-1.noarch").await;
    seed_cache(&fx, "vim-9.1-1.x86_64").await;

    // vim depends on vim-common: recorded install order is
    // dependency-first
    let transaction = Transaction {
        to_install: vec![
            install_item(&fx, "vim-common-9.1-1.noarch"),
            install_item(&fx, "vim-9.1-1.x86_64"),
        ],
        ..Transaction::default()
    };

    let exec = executor(&fx, tx);
    let original_id = exec
        .execute(
            &transaction,
            &ExecutionRequest {
                action: HistoryAction::Install,
                command_line: "urpm install vim".into(),
                user: "root".into(),
                test_only: false,
            },
        )
        .await
        .unwrap();

    let driver = UndoDriver {
        catalog: &fx.catalog,
        executor: &exec,
        user: "root".into(),
    };
    let undo_id = driver.undo(original_id).await.unwrap();
    assert!(undo_id > original_id, "history ids stay monotone");

    // The undo entry erased both packages, dependents first
    let undo_entry = fx.catalog.history_entry(undo_id).await.unwrap();
    assert_eq!(undo_entry.action, HistoryAction::Undo);
    assert_eq!(undo_entry.status, HistoryStatus::Complete);

    let handed = fx.rpm.transactions();
    let last = handed.last().unwrap();
    assert_eq!(
        last[0],
        urpm_rpm::TransactionElement::Erase("vim-9.1-1.x86_64".into())
    );
    assert_eq!(
        last[1],
        urpm_rpm::TransactionElement::Erase("vim-common-9.1-1.noarch".into())
    );

    // The installed set is back to empty
    assert!(fx.rpm.installed().is_empty());

    // Original entry now reads rolled-back
    let original = fx.catalog.history_entry(original_id).await.unwrap();
    assert_eq!(original.status, HistoryStatus::RolledBack);
}

#[tokio::test]
async fn undo_of_removal_needs_the_catalog() {
    let fx = fixture().await;
    let (tx, _rx) = urpm_events::channel();

    // Record an erase entry by hand
    let id = fx
        .catalog
        .history_begin(HistoryAction::Erase, "urpm remove ghost", "root")
        .await
        .unwrap();
    fx.catalog
        .history_finish(
            id,
            HistoryStatus::Complete,
            &[urpm_types::HistoryPackage {
                nevra: "ghost-1.0-1.x86_64".into(),
                direction: PackageDirection::Removed,
            }],
            Some(0),
            None,
        )
        .await
        .unwrap();

    let exec = executor(&fx, tx);
    let driver = UndoDriver {
        catalog: &fx.catalog,
        executor: &exec,
        user: "root".into(),
    };

    // The NEVRA is in no media: nevra-unavailable
    let err = driver.undo(id).await.unwrap_err();
    assert!(err.to_string().contains("no longer available"));
}

#[tokio::test]
async fn eviction_prefers_stale_nevras_and_spares_holds() {
    let fx = fixture().await;
    let (tx, _rx) = urpm_events::channel();

    // Catalog currently carries only "fresh"
    let synthesis = b"@info@fresh-1.0-1.x86_64@0@100@G\n";
    fx.catalog
        .synthesis_import(fx.media_id)
        .run(synthesis)
        .await
        .unwrap();

    // Quota of 1 byte forces eviction
    fx.catalog
        .set_media_replication(
            "Core Release",
            urpm_types::ReplicationPolicy::OnDemand,
            1,
        )
        .await
        .unwrap();

    // Cache: a stale entry, a held stale entry, and the fresh one
    seed_cache(&fx, "stale-0.9-1.x86_64").await;
    seed_cache(&fx, "precious-0.1-1.x86_64").await;
    seed_cache(&fx, "fresh-1.0-1.x86_64").await;
    fx.catalog.hold("precious", None).await.unwrap();

    let evictor = CacheEvictor {
        catalog: fx.catalog.clone(),
        cache_dir: fx.cache_dir.clone(),
        tx,
    };
    let outcome = evictor.enforce_quotas(&[]).await.unwrap();
    assert!(outcome.files_removed >= 1);

    let dir = fx.cache_dir.join("core_release");
    // Stale and unheld: gone
    assert!(!dir.join("stale-0.9-1.x86_64.rpm").exists());
    // Held: never evicted
    assert!(dir.join("precious-0.1-1.x86_64.rpm").exists());
    // Fresh and not installed: phase 2 does not touch it
    assert!(dir.join("fresh-1.0-1.x86_64.rpm").exists());
}

#[tokio::test]
async fn dry_run_touches_nothing() {
    let fx = fixture().await;
    let (tx, _rx) = urpm_events::channel();
    seed_cache(&fx, "vim-9.1-1.x86_64").await;

    let transaction = Transaction {
        to_install: vec![install_item(&fx, "vim-9.1-1.x86_64")],
        ..Transaction::default()
    };

    let exec = executor(&fx, tx);
    exec.execute(
        &transaction,
        &ExecutionRequest {
            action: HistoryAction::Install,
            command_line: "urpm install --test vim".into(),
            user: "root".into(),
            test_only: true,
        },
    )
    .await
    .unwrap();

    assert!(fx.rpm.transactions().is_empty());
    assert!(fx.catalog.history_list(10).await.unwrap().is_empty());
}
