//! Command handlers
//!
//! Each handler reads through the context's typed APIs and hands data
//! to the renderer. Transaction verbs share one resolve-confirm-execute
//! path.

use urpm_engine::{ExecutionRequest, UndoDriver};
use urpm_errors::{Error, Result, StateError};
use urpm_resolver::{Job, Outcome, Preference, Resolver, Transaction};
use urpm_store::CatalogPackage;
use urpm_types::{DepKind, HistoryAction, IpMode, Nevra};

use crate::cli::{CacheCommands, Commands, MediaCommands, PeerCommands, ServerCommands};
use crate::context::AppContext;
use crate::display::{human_size, Renderer};

/// Dispatch one parsed command
#[allow(clippy::too_many_lines)]
pub async fn dispatch(ctx: &AppContext, command: Commands) -> Result<()> {
    let render = Renderer { json: ctx.json };

    match command {
        Commands::Install { packages } => {
            let jobs: Vec<Job> = packages
                .into_iter()
                .map(|spec| Job::Install { spec })
                .collect();
            run_transaction(ctx, render, jobs, HistoryAction::Install).await
        }
        Commands::Remove { packages } => {
            let jobs: Vec<Job> = packages
                .into_iter()
                .map(|name| Job::Erase { name })
                .collect();
            run_transaction(ctx, render, jobs, HistoryAction::Erase).await
        }
        Commands::Upgrade { packages } => {
            let jobs: Vec<Job> = if packages.is_empty() {
                vec![Job::Upgrade { name: None }]
            } else {
                packages
                    .into_iter()
                    .map(|name| Job::Upgrade { name: Some(name) })
                    .collect()
            };
            run_transaction(ctx, render, jobs, HistoryAction::Upgrade).await
        }
        Commands::Autoremove => autoremove(ctx, render).await,
        Commands::Search { pattern } => {
            let packages = ctx.catalog.search_packages(&pattern).await?;
            render.packages(&packages);
            Ok(())
        }
        Commands::Show { package } => {
            let found = find_one(ctx, &package).await?;
            render.package_details(&found);
            Ok(())
        }
        Commands::List { pattern } => {
            let packages = ctx
                .catalog
                .search_packages(pattern.as_deref().unwrap_or(""))
                .await?;
            render.packages(&packages);
            Ok(())
        }
        Commands::Depends { package } => {
            let found = find_one(ctx, &package).await?;
            render.capabilities(&found.meta.requires);
            Ok(())
        }
        Commands::Rdepends { capability } => {
            let packages = ctx
                .catalog
                .packages_by_dep(&capability, DepKind::Requires)
                .await?;
            render.packages(&packages);
            Ok(())
        }
        Commands::Recommends { package } => {
            let found = find_one(ctx, &package).await?;
            render.capabilities(&found.meta.recommends);
            Ok(())
        }
        Commands::Suggests { package } => {
            let found = find_one(ctx, &package).await?;
            render.capabilities(&found.meta.suggests);
            Ok(())
        }
        Commands::Whatrecommends { capability } => {
            let packages = ctx
                .catalog
                .packages_by_dep(&capability, DepKind::Recommends)
                .await?;
            render.packages(&packages);
            Ok(())
        }
        Commands::Whatsuggests { capability } => {
            let packages = ctx
                .catalog
                .packages_by_dep(&capability, DepKind::Suggests)
                .await?;
            render.packages(&packages);
            Ok(())
        }
        Commands::Provides { package } => {
            let found = find_one(ctx, &package).await?;
            render.capabilities(&found.meta.provides);
            Ok(())
        }
        Commands::Whatprovides { capability } => {
            let packages = ctx.catalog.packages_providing(&capability).await?;
            render.packages(&packages);
            Ok(())
        }
        Commands::Find { pattern } => {
            let hits = ctx.catalog.search_files(&pattern, 500).await?;
            render.file_hits(&hits);
            Ok(())
        }
        Commands::Files { package } => {
            let nevra = resolve_nevra(ctx, &package).await?;
            let hits = ctx.catalog.files_of_package(&nevra).await?;
            render.file_hits(&hits);
            Ok(())
        }
        Commands::Why { package } => why(ctx, render, &package).await,
        Commands::Mark { how, package } => {
            let key = format!("mark.auto.{package}");
            if how == "auto" {
                ctx.catalog.set_setting(&key, "1").await?;
            } else {
                ctx.catalog.set_setting(&key, "0").await?;
            }
            render.message(&format!("{package} marked {how}"));
            Ok(())
        }
        Commands::Hold { package, reason } => {
            ctx.catalog.hold(&package, reason.as_deref()).await?;
            render.message(&format!("{package} held"));
            Ok(())
        }
        Commands::Unhold { package } => {
            if ctx.catalog.unhold(&package).await? {
                render.message(&format!("{package} released"));
            } else {
                render.message(&format!("{package} was not held"));
            }
            Ok(())
        }
        Commands::History { limit } => {
            let entries = ctx.catalog.history_list(limit).await?;
            render.history(&entries);
            Ok(())
        }
        Commands::Undo { id } => {
            let executor = ctx.engine.executor();
            let driver = UndoDriver {
                catalog: &ctx.catalog,
                executor: &executor,
                user: ctx.user(),
            };
            let undo_id = driver.undo(id).await?;
            render.message(&format!("entry {id} undone (history entry {undo_id})"));
            Ok(())
        }
        Commands::Rollback { n, to } => {
            let executor = ctx.engine.executor();
            let driver = UndoDriver {
                catalog: &ctx.catalog,
                executor: &executor,
                user: ctx.user(),
            };
            let undone = match to {
                Some(timestamp) => driver.rollback_to(timestamp).await?,
                None => driver.rollback(n.unwrap_or(1)).await?,
            };
            render.message(&format!("{} entries rolled back", undone.len()));
            Ok(())
        }
        Commands::Media(cmd) => media(ctx, render, cmd).await,
        Commands::Server(cmd) => server(ctx, render, cmd).await,
        Commands::Peer(cmd) => peer(ctx, render, cmd).await,
        Commands::Cache(cmd) => cache(ctx, render, cmd).await,
        Commands::Config => {
            render.message(&toml::to_string_pretty(&ctx.config).unwrap_or_default());
            Ok(())
        }
        Commands::Download { packages } => download(ctx, render, packages).await,
    }
}

/// Shared resolve-confirm-execute path for transaction verbs
async fn run_transaction(
    ctx: &AppContext,
    render: Renderer,
    jobs: Vec<Job>,
    action: HistoryAction,
) -> Result<()> {
    let transaction = resolve_with_choices(ctx, &jobs).await?;

    if transaction.is_empty() {
        for (name, reason) in &transaction.skipped {
            render.message(&format!("skipping {name}: {reason}"));
        }
        render.message("nothing to do");
        return Ok(());
    }

    render.transaction(&transaction);
    if !ctx.test && !ctx.confirm("Proceed?")? {
        render.message("aborted");
        return Ok(());
    }

    let executor = ctx.engine.executor();
    executor
        .execute(
            &transaction,
            &ExecutionRequest {
                action,
                command_line: ctx.command_line(),
                user: ctx.user(),
                test_only: ctx.test,
            },
        )
        .await?;

    render.message(if ctx.test { "dry-run ok" } else { "done" });
    Ok(())
}

/// Resolve, answering choice points interactively (or first-choice with
/// --auto). Each answer strictly shrinks the open-choice set, so the
/// loop terminates.
async fn resolve_with_choices(ctx: &AppContext, jobs: &[Job]) -> Result<Transaction> {
    let mut options = ctx.resolve_options().await?;

    loop {
        let pool = ctx.build_pool().await?;
        let resolver = Resolver::new(pool, options.clone());
        match resolver.resolve(jobs)? {
            Outcome::Transaction(tx) => return Ok(tx),
            Outcome::Choice(choice) => {
                let picked = if ctx.auto {
                    choice.candidates.first().cloned()
                } else {
                    prompt_choice(&choice)?
                };
                let Some(picked) = picked else {
                    return Err(urpm_errors::ResolverError::NoProvider {
                        capability: choice.capability,
                    }
                    .into());
                };
                let name = Nevra::parse(&picked).name;
                options.preferences.push(Preference::Favor(name));
            }
        }
    }
}

fn prompt_choice(choice: &urpm_resolver::ChoicePoint) -> Result<Option<String>> {
    println!("Several packages provide {}:", choice.capability);
    for (i, candidate) in choice.candidates.iter().enumerate() {
        println!("  {}) {candidate}", i + 1);
    }
    for reason in &choice.reasons {
        println!("  ({reason})");
    }
    print!("Choice [1]: ");
    use std::io::Write;
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    let picked = match line.trim() {
        "" => choice.candidates.first().cloned(),
        n => n
            .parse::<usize>()
            .ok()
            .and_then(|i| choice.candidates.get(i.saturating_sub(1)).cloned()),
    };
    Ok(picked)
}

/// Erase auto-marked installed packages nothing else requires, warning
/// on redlisted names.
async fn autoremove(ctx: &AppContext, render: Renderer) -> Result<()> {
    let installed =
        urpm_rpm::query_installed(ctx.config.general.root.as_deref()).await?;
    let redlist: std::collections::HashSet<String> =
        ctx.catalog.redlist().await?.into_iter().collect();

    let mut removable = Vec::new();
    for pkg in &installed {
        let marked_auto = ctx
            .catalog
            .setting(&format!("mark.auto.{}", pkg.nevra.name))
            .await?
            .as_deref()
            == Some("1");
        if !marked_auto {
            continue;
        }

        // Still required by someone else?
        let needed = installed.iter().any(|other| {
            other.nevra != pkg.nevra
                && other.requires.iter().any(|req| {
                    pkg.provides.iter().any(|have| req.satisfies(have))
                        || req.name == pkg.nevra.name
                })
        });
        if needed {
            continue;
        }

        if redlist.contains(&pkg.nevra.name) {
            render.message(&format!(
                "warning: {} is redlisted; not removing automatically",
                pkg.nevra.name
            ));
            continue;
        }
        removable.push(pkg.nevra.name.clone());
    }

    if removable.is_empty() {
        render.message("nothing to autoremove");
        return Ok(());
    }

    let jobs: Vec<Job> = removable
        .into_iter()
        .map(|name| Job::Erase { name })
        .collect();
    run_transaction(ctx, render, jobs, HistoryAction::Autoremove).await
}

/// Walk reverse requires from the installed set to explain why a
/// package is present.
async fn why(ctx: &AppContext, render: Renderer, package: &str) -> Result<()> {
    let installed =
        urpm_rpm::query_installed(ctx.config.general.root.as_deref()).await?;
    let Some(target) = installed.iter().find(|p| p.nevra.name == package) else {
        return Err(StateError::PackageNotFound {
            name: package.to_string(),
        }
        .into());
    };

    let dependents: Vec<&str> = installed
        .iter()
        .filter(|other| {
            other.nevra != target.nevra
                && other.requires.iter().any(|req| {
                    req.name == target.nevra.name
                        || target.provides.iter().any(|have| req.satisfies(have))
                })
        })
        .map(|p| p.nevra.name.as_str())
        .collect();

    if dependents.is_empty() {
        render.message(&format!("{package} is not required by any installed package"));
    } else {
        render.message(&format!("{package} is required by: {}", dependents.join(", ")));
    }
    Ok(())
}

async fn find_one(ctx: &AppContext, package: &str) -> Result<CatalogPackage> {
    let mut candidates = ctx.catalog.packages_by_name(package).await?;
    if candidates.is_empty() {
        // Maybe a full NEVRA was given
        return ctx.catalog.package_by_nevra(package).await;
    }
    Ok(candidates.remove(0))
}

async fn resolve_nevra(ctx: &AppContext, package: &str) -> Result<String> {
    Ok(find_one(ctx, package).await?.meta.nevra.to_string())
}

async fn media(ctx: &AppContext, render: Renderer, cmd: MediaCommands) -> Result<()> {
    match cmd {
        MediaCommands::List => {
            let media = ctx.catalog.list_media().await?;
            for m in media {
                let flag = if m.enabled { "" } else { " (disabled)" };
                render.message(&format!(
                    "{:<30} prio {:>3} {}{flag}",
                    m.name, m.priority, m.short_id
                ));
            }
            Ok(())
        }
        MediaCommands::Add {
            name,
            relative_path,
            update,
            priority,
        } => {
            let short_id = name.to_lowercase().replace([' ', '/'], "_");
            ctx.catalog
                .add_media(&urpm_store::NewMedia {
                    name: name.clone(),
                    short_id,
                    update,
                    priority,
                    relative_path,
                    sync_files: true,
                })
                .await?;
            render.message(&format!("media {name} added"));
            Ok(())
        }
        MediaCommands::Remove { name } => {
            ctx.catalog.remove_media(&name).await?;
            render.message(&format!("media {name} removed"));
            Ok(())
        }
        MediaCommands::Enable { name } => {
            ctx.catalog.set_media_enabled(&name, true).await?;
            Ok(())
        }
        MediaCommands::Disable { name } => {
            ctx.catalog.set_media_enabled(&name, false).await?;
            Ok(())
        }
        MediaCommands::Update { name } => {
            let sync = ctx.engine.media_sync();
            match name {
                Some(name) => {
                    sync.refresh(&name).await?;
                }
                None => {
                    sync.refresh_all().await?;
                }
            }
            Ok(())
        }
        MediaCommands::Import { path } => {
            let path = path.unwrap_or_else(|| urpm_config::paths::LEGACY_CFG.into());
            let contents = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| Error::io_with_path(&e, &path))?;
            let mut imported = 0;
            for legacy in urpm_config::parse_urpmi_cfg(&contents)? {
                if legacy.ignore {
                    continue;
                }
                let short_id = legacy.name.to_lowercase().replace([' ', '/'], "_");
                let added = ctx
                    .catalog
                    .add_media(&urpm_store::NewMedia {
                        name: legacy.name.clone(),
                        short_id,
                        update: legacy.update,
                        priority: 50,
                        relative_path: legacy.url,
                        sync_files: true,
                    })
                    .await;
                match added {
                    Ok(_) => imported += 1,
                    Err(Error::State(StateError::MediaExists { .. })) => {}
                    Err(e) => return Err(e),
                }
            }
            render.message(&format!("{imported} media imported from {}", path.display()));
            Ok(())
        }
        MediaCommands::Set {
            name,
            priority,
            quota_bytes,
        } => {
            if let Some(priority) = priority {
                ctx.catalog.set_media_priority(&name, priority).await?;
            }
            if let Some(quota) = quota_bytes {
                let m = ctx.catalog.media_by_name(&name).await?;
                ctx.catalog
                    .set_media_replication(&name, m.replication, quota)
                    .await?;
            }
            Ok(())
        }
        MediaCommands::Link { name, server } => {
            ctx.catalog.link_server(&name, &server).await?;
            Ok(())
        }
    }
}

async fn server(ctx: &AppContext, render: Renderer, cmd: ServerCommands) -> Result<()> {
    match cmd {
        ServerCommands::List => {
            for s in ctx.catalog.list_servers().await? {
                let flag = if s.enabled { "" } else { " (disabled)" };
                let tested = match s.last_test_ok {
                    Some(true) => " ok",
                    Some(false) => " FAILING",
                    None => "",
                };
                render.message(&format!(
                    "{:<20} prio {:>3} {}{flag}{tested}",
                    s.name, s.priority, s.base_url
                ));
            }
            Ok(())
        }
        ServerCommands::Add {
            name,
            base_url,
            priority,
        } => {
            ctx.catalog.add_server(&name, &base_url, priority).await?;
            render.message(&format!("server {name} added"));
            Ok(())
        }
        ServerCommands::Remove { name } => {
            // Disabled rather than deleted so media links survive a
            // transient removal; full destroy is a catalog-level tool
            ctx.catalog.set_server_enabled(&name, false).await?;
            render.message(&format!("server {name} disabled"));
            Ok(())
        }
        ServerCommands::Enable { name } => ctx.catalog.set_server_enabled(&name, true).await,
        ServerCommands::Disable { name } => {
            ctx.catalog.set_server_enabled(&name, false).await
        }
        ServerCommands::Test { name } => {
            let servers = ctx.catalog.list_servers().await?;
            let Some(server) = servers.into_iter().find(|s| s.name == name) else {
                return Err(StateError::ServerNotFound { name }.into());
            };
            let ok = ctx.engine.net.head(&server.base_url).await.is_ok();
            ctx.catalog.record_server_test(&server.name, ok).await?;
            render.message(if ok { "reachable" } else { "unreachable" });
            Ok(())
        }
        ServerCommands::Priority { name, priority } => {
            // Reuse the media priority plumbing shape
            let servers = ctx.catalog.list_servers().await?;
            if !servers.iter().any(|s| s.name == name) {
                return Err(StateError::ServerNotFound { name }.into());
            }
            ctx.catalog.set_server_priority(&name, priority).await
        }
        ServerCommands::IpMode { name, mode } => {
            let Some(mode) = IpMode::parse(&mode) else {
                return Err(urpm_errors::ConfigError::InvalidValue {
                    key: "ip-mode".into(),
                    value: mode,
                }
                .into());
            };
            ctx.catalog.set_server_ip_mode(&name, mode).await
        }
    }
}

async fn peer(ctx: &AppContext, render: Renderer, cmd: PeerCommands) -> Result<()> {
    match cmd {
        PeerCommands::List => {
            for p in ctx.catalog.list_peers().await? {
                let flags = if p.blacklisted { " (blacklisted)" } else { "" };
                render.message(&format!(
                    "{:<16}:{:<5} {} {} {}{flags}",
                    p.host, p.port, p.machine_id, p.release, p.arch
                ));
            }
            Ok(())
        }
        PeerCommands::Blacklist { machine_id } => {
            ctx.catalog.set_peer_blacklisted(&machine_id, true).await
        }
        PeerCommands::Unblacklist { machine_id } => {
            ctx.catalog.set_peer_blacklisted(&machine_id, false).await
        }
        PeerCommands::Clean => ctx.catalog.clear_peers().await,
    }
}

async fn cache(ctx: &AppContext, render: Renderer, cmd: CacheCommands) -> Result<()> {
    match cmd {
        CacheCommands::Info => {
            for m in ctx.catalog.list_media().await? {
                let dir = ctx.engine.cache_dir.join(&m.short_id);
                let mut used = 0u64;
                let mut count = 0usize;
                if let Ok(mut entries) = tokio::fs::read_dir(&dir).await {
                    while let Ok(Some(entry)) = entries.next_entry().await {
                        if let Ok(meta) = entry.metadata().await {
                            used += meta.len();
                            count += 1;
                        }
                    }
                }
                let quota = if m.quota_bytes > 0 {
                    human_size(u64::try_from(m.quota_bytes).unwrap_or(0))
                } else {
                    "unlimited".to_string()
                };
                render.message(&format!(
                    "{:<30} {count:>5} files  {:>10} / {quota}",
                    m.name,
                    human_size(used)
                ));
            }
            Ok(())
        }
        CacheCommands::Clean => {
            let installed =
                urpm_rpm::query_installed(ctx.config.general.root.as_deref())
                    .await
                    .unwrap_or_default()
                    .into_iter()
                    .map(|p| p.nevra.to_string())
                    .collect::<Vec<_>>();
            let outcome = ctx
                .engine
                .cache_evictor()
                .enforce_quotas(&installed)
                .await?;
            render.message(&format!(
                "{} files removed, {} freed",
                outcome.files_removed,
                human_size(outcome.bytes_freed)
            ));
            Ok(())
        }
        CacheCommands::Rebuild => {
            ctx.catalog.rebuild_fts().await?;
            render.message("file index rebuilt");
            Ok(())
        }
        CacheCommands::Stats => {
            let consistent = ctx.catalog.fts_consistent().await?;
            for m in ctx.catalog.list_media().await? {
                let rows = ctx.catalog.file_row_count(m.id).await?;
                render.message(&format!("{:<30} {rows} file rows", m.name));
            }
            render.message(&format!(
                "file index: {}",
                if consistent { "consistent" } else { "NEEDS REBUILD" }
            ));
            Ok(())
        }
    }
}

async fn download(ctx: &AppContext, render: Renderer, packages: Vec<String>) -> Result<()> {
    let media = ctx.catalog.list_media().await?;
    let mut wanted = Vec::new();

    for spec in &packages {
        let found = find_one(ctx, spec).await?;
        let Some(short_id) = media
            .iter()
            .find(|m| m.id == found.media_id)
            .map(|m| m.short_id.clone())
        else {
            continue;
        };
        wanted.push((
            urpm_resolver::TransactionItem {
                nevra: found.meta.nevra.clone(),
                media_id: Some(found.media_id),
                digest: found.meta.digest.clone(),
                file_size: found.meta.file_size,
            },
            short_id,
        ));
    }

    let acquired = ctx.engine.acquirer().acquire_all(&wanted).await?;
    for artifact in &acquired {
        render.message(&format!("{} -> {}", artifact.nevra, artifact.path.display()));
    }
    Ok(())
}
