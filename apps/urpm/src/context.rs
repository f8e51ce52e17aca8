//! Process context: configuration, catalog, engine
//!
//! Initialized once at startup and passed explicitly; nothing here is
//! an ambient global.

use std::sync::Arc;

use urpm_config::Config;
use urpm_engine::Engine;
use urpm_errors::{Error, Result};
use urpm_events::EventSender;
use urpm_resolver::{Pool, Preference, ResolveOptions};
use urpm_rpm::ProcessRpm;
use urpm_store::Catalog;

use crate::cli::GlobalArgs;

/// Everything a command handler needs
pub struct AppContext {
    pub config: Config,
    pub catalog: Catalog,
    pub engine: Arc<Engine>,
    pub auto: bool,
    pub test: bool,
    pub json: bool,
    pub quiet: bool,
    pub preferences: Vec<Preference>,
}

impl AppContext {
    /// Build the context from global flags.
    ///
    /// # Errors
    ///
    /// Returns an error when the config is invalid or the catalog
    /// cannot be opened.
    pub async fn build(global: &GlobalArgs, tx: EventSender) -> Result<Self> {
        let mut config = Config::load_default(global.dev).await?;
        if let Some(root) = &global.root {
            config.general.root = Some(root.clone());
        }

        let catalog = Catalog::open(&config.catalog_db()).await?;
        let rpm = Arc::new(ProcessRpm::new(config.general.root.clone()));
        let engine = Arc::new(Engine::new(catalog.clone(), rpm, config.clone(), tx)?);

        let preferences = global
            .prefer
            .as_deref()
            .map(Preference::parse_list)
            .unwrap_or_default();

        Ok(Self {
            config,
            catalog,
            engine,
            auto: global.auto,
            test: global.test,
            json: global.json,
            quiet: global.quiet,
            preferences,
        })
    }

    /// Resolver options for this invocation, holds and blacklist loaded
    /// from the catalog.
    ///
    /// # Errors
    ///
    /// Returns an error when the catalog cannot be read.
    pub async fn resolve_options(&self) -> Result<ResolveOptions> {
        let mut options = ResolveOptions::new();
        options.preferences.clone_from(&self.preferences);
        options.with_recommends = self.config.general.with_recommends;
        options.locale.clone_from(&self.config.general.locale);
        options.system_arch = std::env::consts::ARCH.to_string();

        for (name, reason) in self.catalog.holds().await? {
            options.held.insert(name, reason);
        }
        for name in self.catalog.blacklist().await? {
            options.blacklist.insert(name);
        }
        Ok(options)
    }

    /// Build the resolver pool: installed set union enabled catalog.
    ///
    /// # Errors
    ///
    /// Returns an error when the RPM query or catalog read fails.
    pub async fn build_pool(&self) -> Result<Pool> {
        let mut pool = Pool::new();

        let installed =
            urpm_rpm::query_installed(self.config.general.root.as_deref()).await?;
        for pkg in &installed {
            pool.add_installed(pkg);
        }

        let media = self.catalog.list_media().await?;
        for candidate in self.catalog.all_available().await? {
            let priority = media
                .iter()
                .find(|m| m.id == candidate.media_id)
                .map_or(0, |m| m.priority);
            pool.add_available(&candidate.meta, candidate.media_id, priority);
        }
        Ok(pool)
    }

    /// Current user name for history attribution
    #[must_use]
    pub fn user(&self) -> String {
        std::env::var("SUDO_USER")
            .or_else(|_| std::env::var("USER"))
            .unwrap_or_else(|_| "unknown".to_string())
    }

    /// The original command line for history attribution
    #[must_use]
    pub fn command_line(&self) -> String {
        std::env::args().collect::<Vec<_>>().join(" ")
    }

    /// Confirm a pending transaction with the user unless --auto
    pub fn confirm(&self, prompt: &str) -> Result<bool> {
        if self.auto {
            return Ok(true);
        }
        use std::io::Write;
        print!("{prompt} [y/N] ");
        std::io::stdout().flush().map_err(Error::from)?;
        let mut line = String::new();
        std::io::stdin().read_line(&mut line).map_err(Error::from)?;
        Ok(matches!(line.trim(), "y" | "Y" | "yes"))
    }
}
