//! Integration tests for the catalog store

use tempfile::tempdir;
use urpm_store::{Catalog, NewMedia};
use urpm_types::{HistoryAction, HistoryPackage, HistoryStatus, PackageDirection};

async fn open_catalog() -> (tempfile::TempDir, Catalog) {
    let dir = tempdir().unwrap();
    let catalog = Catalog::open(&dir.path().join("packages.db")).await.unwrap();
    (dir, catalog)
}

async fn add_test_media(catalog: &Catalog, name: &str) -> i64 {
    catalog
        .add_media(&NewMedia {
            name: name.to_string(),
            short_id: name.to_lowercase().replace(' ', "_"),
            update: false,
            priority: 50,
            relative_path: format!("media/{name}"),
            sync_files: true,
        })
        .await
        .unwrap()
}

fn synthesis(entries: &[(&str, &[&str], &[&str])]) -> Vec<u8> {
    let mut out = String::new();
    for (nevra, provides, requires) in entries {
        if !provides.is_empty() {
            out.push_str("@provides");
            for p in *provides {
                out.push('@');
                out.push_str(p);
            }
            out.push('\n');
        }
        if !requires.is_empty() {
            out.push_str("@requires");
            for r in *requires {
                out.push('@');
                out.push_str(r);
            }
            out.push('\n');
        }
        out.push_str(&format!("@info@{nevra}@0@1000@Testing\n"));
    }
    out.into_bytes()
}

fn files_xml(entries: &[(&str, &[&str])]) -> Vec<u8> {
    let mut out = String::from("<media_files>\n");
    for (nevra, paths) in entries {
        out.push_str(&format!("<files fn=\"{nevra}\">"));
        out.push_str(&paths.join("\n"));
        out.push_str("</files>\n");
    }
    out.push_str("</media_files>");
    out.into_bytes()
}

#[tokio::test]
async fn media_lifecycle_cascades() {
    let (_dir, catalog) = open_catalog().await;
    let id = add_test_media(&catalog, "Core Release").await;

    let blob = synthesis(&[("a-1.0-1.noarch", &["cap_a"], &[])]);
    catalog.synthesis_import(id).run(&blob).await.unwrap();
    assert_eq!(catalog.nevras_for_media(id).await.unwrap().len(), 1);

    // Duplicate name rejected
    assert!(catalog
        .add_media(&NewMedia {
            name: "Core Release".into(),
            ..NewMedia::default()
        })
        .await
        .is_err());

    catalog.remove_media("Core Release").await.unwrap();
    assert!(catalog.media_by_name("Core Release").await.is_err());
    // Cascade removed package rows
    assert!(catalog.nevras_for_media(id).await.unwrap().is_empty());
}

#[tokio::test]
async fn synthesis_diff_import_is_minimal() {
    let (_dir, catalog) = open_catalog().await;
    let id = add_test_media(&catalog, "Core").await;

    let gen1 = synthesis(&[
        ("a-1.0-1.noarch", &["mta"], &[]),
        ("b-1.0-1.noarch", &[], &["mta"]),
    ]);
    let first = catalog.synthesis_import(id).run(&gen1).await.unwrap();
    assert!(first.bulk);
    assert_eq!(first.inserted, 2);

    // Unchanged blob: zero row changes
    let again = catalog.synthesis_import(id).run(&gen1).await.unwrap();
    assert_eq!(again.inserted, 0);
    assert_eq!(again.deleted, 0);

    // b leaves, c arrives, a untouched
    let gen2 = synthesis(&[
        ("a-1.0-1.noarch", &["mta"], &[]),
        ("c-2.0-1.noarch", &["mda"], &[]),
    ]);
    let second = catalog.synthesis_import(id).run(&gen2).await.unwrap();
    assert_eq!(second.deleted, 1);
    assert_eq!(second.inserted, 1);
    assert_eq!(second.unchanged, 1);

    let mut nevras = catalog.nevras_for_media(id).await.unwrap();
    nevras.sort();
    assert_eq!(nevras, vec!["a-1.0-1.noarch", "c-2.0-1.noarch"]);

    // Catalog set equals the @info set of the last ingested synthesis
    let state = catalog.media_sync_state(id).await.unwrap();
    assert_eq!(state.package_count, 2);
}

#[tokio::test]
async fn corrupt_synthesis_preserves_previous_state() {
    let (_dir, catalog) = open_catalog().await;
    let id = add_test_media(&catalog, "Core").await;

    let good = synthesis(&[("a-1.0-1.noarch", &[], &[])]);
    catalog.synthesis_import(id).run(&good).await.unwrap();
    let state_before = catalog.media_sync_state(id).await.unwrap();

    // zstd magic followed by garbage: decode fails mid-stream
    let corrupt = [0x28, 0xb5, 0x2f, 0xfd, 0xff, 0xff, 0xff, 0xff];
    assert!(catalog.synthesis_import(id).run(&corrupt).await.is_err());

    let state_after = catalog.media_sync_state(id).await.unwrap();
    assert_eq!(state_before.synthesis_md5, state_after.synthesis_md5);
    assert_eq!(catalog.nevras_for_media(id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn file_index_differential_import() {
    let (_dir, catalog) = open_catalog().await;
    let id = add_test_media(&catalog, "Core").await;

    let paths_a: Vec<String> = (0..500).map(|i| format!("/usr/share/a/file{i}")).collect();
    let paths_b: Vec<String> = (0..500).map(|i| format!("/usr/share/b/file{i}")).collect();
    let refs_a: Vec<&str> = paths_a.iter().map(String::as_str).collect();
    let refs_b: Vec<&str> = paths_b.iter().map(String::as_str).collect();

    let gen1 = files_xml(&[("a-1.0-1.noarch", &refs_a), ("b-1.0-1.noarch", &refs_b)]);
    let first = catalog.import_files_blob(id, &gen1).await.unwrap();
    assert!(first.bulk);
    assert_eq!(first.inserted, 1000);
    assert!(catalog.fts_consistent().await.unwrap());

    // Identical blob is a no-op at the row level
    let noop = catalog.import_files_blob(id, &gen1).await.unwrap();
    assert_eq!(noop.inserted + noop.deleted, 0);

    // b-1 drops out, c-1 (600 files) arrives, a-1 rows unchanged
    let paths_c: Vec<String> = (0..600).map(|i| format!("/opt/c/file{i}")).collect();
    let refs_c: Vec<&str> = paths_c.iter().map(String::as_str).collect();
    let gen2 = files_xml(&[("a-1.0-1.noarch", &refs_a), ("c-1.0-1.noarch", &refs_c)]);

    let second = catalog.import_files_blob(id, &gen2).await.unwrap();
    assert_eq!(second.deleted, 500);
    assert_eq!(second.inserted, 600);

    assert!(catalog
        .files_of_package("b-1.0-1.noarch")
        .await
        .unwrap()
        .is_empty());
    assert_eq!(
        catalog.files_of_package("a-1.0-1.noarch").await.unwrap().len(),
        500
    );
    assert_eq!(
        catalog.files_of_package("c-1.0-1.noarch").await.unwrap().len(),
        600
    );

    // FTS index reflects the same rows
    assert!(catalog.fts_consistent().await.unwrap());
    let hits = catalog.search_files("file59", 2000).await.unwrap();
    assert!(hits.iter().any(|h| h.nevra == "c-1.0-1.noarch"));
    assert!(!hits.iter().any(|h| h.nevra == "b-1.0-1.noarch"));
}

#[tokio::test]
async fn file_search_paths() {
    let (_dir, catalog) = open_catalog().await;
    let id = add_test_media(&catalog, "Core").await;
    let blob = files_xml(&[(
        "bash-5.2-3.x86_64",
        &["/bin/bash", "/usr/share/man/man1/bash.1.xz"],
    )]);
    catalog.import_files_blob(id, &blob).await.unwrap();

    assert_eq!(catalog.files_by_basename("bash").await.unwrap().len(), 1);
    assert_eq!(catalog.files_by_path("/bin/bash").await.unwrap().len(), 1);
    assert!(catalog.files_by_path("/bin/zsh").await.unwrap().is_empty());

    let hits = catalog.search_files("*bash*", 100).await.unwrap();
    assert_eq!(hits.len(), 2);
}

#[tokio::test]
async fn provides_lookup_feeds_resolver() {
    let (_dir, catalog) = open_catalog().await;
    let id = add_test_media(&catalog, "Core").await;
    let blob = synthesis(&[
        ("sendmail-1.0-1.x86_64", &["mta", "sendmail[== 1.0-1]"], &[]),
        ("postfix-3.0-1.x86_64", &["mta", "postfix[== 3.0-1]"], &[]),
        ("pkg-a-1.0-1.noarch", &[], &["mta"]),
    ]);
    catalog.synthesis_import(id).run(&blob).await.unwrap();

    let providers = catalog.packages_providing("mta").await.unwrap();
    assert_eq!(providers.len(), 2);

    let requirers = catalog
        .packages_by_dep("mta", urpm_types::DepKind::Requires)
        .await
        .unwrap();
    assert_eq!(requirers.len(), 1);
    assert_eq!(requirers[0].meta.nevra.name, "pkg-a");
}

#[tokio::test]
async fn history_entry_terminal_transition_is_single() {
    let (_dir, catalog) = open_catalog().await;

    let id = catalog
        .history_begin(HistoryAction::Install, "urpm install vim", "root")
        .await
        .unwrap();
    let id2 = catalog
        .history_begin(HistoryAction::Erase, "urpm remove nano", "root")
        .await
        .unwrap();
    assert!(id2 > id, "ids must be strictly increasing");

    let packages = vec![
        HistoryPackage {
            nevra: "vim-9.1-1.x86_64".into(),
            direction: PackageDirection::Added,
        },
        HistoryPackage {
            nevra: "vim-common-9.1-1.noarch".into(),
            direction: PackageDirection::Added,
        },
    ];
    catalog
        .history_finish(id, HistoryStatus::Complete, &packages, Some(0), None)
        .await
        .unwrap();

    // Second transition must fail
    assert!(catalog
        .history_finish(id, HistoryStatus::Failed, &[], Some(1), Some("boom"))
        .await
        .is_err());

    let entry = catalog.history_entry(id).await.unwrap();
    assert_eq!(entry.status, HistoryStatus::Complete);
    assert_eq!(entry.packages.len(), 2);
}

#[tokio::test]
async fn holds_and_blacklist_persist() {
    let (_dir, catalog) = open_catalog().await;

    catalog.hold("dhcp-client", Some("keep dhcpd")).await.unwrap();
    catalog.blacklist_add("telnet-server").await.unwrap();

    let holds = catalog.holds().await.unwrap();
    assert_eq!(holds[0].0, "dhcp-client");
    assert_eq!(holds[0].1.as_deref(), Some("keep dhcpd"));

    assert_eq!(catalog.blacklist().await.unwrap(), vec!["telnet-server"]);
    assert!(catalog.unhold("dhcp-client").await.unwrap());
    assert!(!catalog.unhold("dhcp-client").await.unwrap());
}

#[tokio::test]
async fn peer_rows_expire() {
    let (_dir, catalog) = open_catalog().await;

    let now = chrono::Utc::now().timestamp();
    let fresh = urpm_types::PeerInfo {
        host: "10.0.0.2".into(),
        port: 9876,
        machine_id: "fresh".into(),
        release: "10".into(),
        arch: "x86_64".into(),
        last_seen: now,
        blacklisted: false,
        development_mode: false,
        served_media: vec!["core_release".into()],
    };
    let stale = urpm_types::PeerInfo {
        machine_id: "stale".into(),
        last_seen: now - 3600,
        ..fresh.clone()
    };

    catalog.upsert_peer(&fresh).await.unwrap();
    catalog.upsert_peer(&stale).await.unwrap();

    assert_eq!(catalog.healthy_peers(180).await.unwrap().len(), 1);
    assert_eq!(catalog.expire_peers(180).await.unwrap(), 1);
    assert_eq!(catalog.list_peers().await.unwrap().len(), 1);
}
