//! Wires configuration into a running system: stores, memory, tools,
//! runtime, sub-agent spawner and channel router.

use std::sync::Arc;

use anyhow::{Context, bail};
use parley_agent::{
    AgentCache, AgentRuntime, ContextAssembler, ModelDefaults, SessionManager, SpawnManager, ToolLoopExecutor,
};
use parley_channels::{ChannelRouter, SlackAdapter, TeamsAdapter, WebhookAdapter, WebhookConfig, WidgetAdapter};
use parley_config::AppConfig;
use parley_core::event::EventBus;
use parley_core::{
    AgentDirectory, CapabilityProvider, CapabilityRegistry, Clock, ConversationStore, MemoryBackend, Provider,
    SystemClock,
};
use parley_memory::{InMemoryBackend, NoopMemory, SqliteBackend};
use parley_store::{InMemoryStore, SqliteStore};
use parley_tools::{
    BrowserTools, CronTools, FilesystemTools, InMemoryScheduleBook, MemoryTools, ScheduleBook, SpawnTool,
    ToolDispatcher,
};
use tracing::info;

/// Everything a command needs, fully wired.
pub struct App {
    pub config: AppConfig,
    pub conversations: Arc<dyn ConversationStore>,
    pub directory: Arc<dyn AgentDirectory>,
    pub memory: Arc<dyn MemoryBackend>,
    pub runtime: AgentRuntime,
    pub router: Arc<ChannelRouter>,
    pub widget: Arc<WidgetAdapter>,
    pub schedules: Arc<dyn ScheduleBook>,
    pub events: Arc<EventBus>,
}

/// Builder for [`App`]. Tests swap in a scripted provider and a manual clock.
pub struct Bootstrap {
    config: AppConfig,
    provider: Option<Arc<dyn Provider>>,
    clock: Arc<dyn Clock>,
    capabilities: CapabilityRegistry,
}

impl Bootstrap {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            provider: None,
            clock: Arc::new(SystemClock),
            capabilities: CapabilityRegistry::new(),
        }
    }

    pub fn with_provider(mut self, provider: Arc<dyn Provider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_capability(mut self, provider: Arc<dyn CapabilityProvider>) -> Self {
        self.capabilities.register(provider);
        self
    }

    pub async fn build(self) -> anyhow::Result<App> {
        let Bootstrap {
            config,
            provider,
            clock,
            capabilities,
        } = self;

        let provider: Arc<dyn Provider> = match provider {
            Some(provider) => provider,
            None => Arc::new(parley_providers::build_from_config(&config)),
        };

        let (conversations, directory, memory) = open_stores(&config).await?;
        seed(&config, directory.as_ref()).await?;

        let events = Arc::new(EventBus::default());
        let agents = Arc::new(AgentCache::new(
            directory.clone(),
            clock.clone(),
            config.context.agent_cache_ttl_secs,
        ));
        let sessions = Arc::new(
            SessionManager::new(
                conversations.clone(),
                provider.clone(),
                clock,
                events.clone(),
                &config.default_model,
            )
            .with_config(config.session.clone()),
        );
        let context = Arc::new(
            ContextAssembler::new(agents.clone(), conversations.clone())
                .with_memory(memory.clone())
                .with_config(config.context.clone()),
        );

        let schedules: Arc<dyn ScheduleBook> = Arc::new(InMemoryScheduleBook::new());
        let base_dispatcher = ToolDispatcher::new(Arc::new(capabilities))
            .with_memory(Arc::new(MemoryTools::new(memory.clone())))
            .with_cron(Arc::new(CronTools::new(schedules.clone())))
            .with_browser(Arc::new(BrowserTools::new()))
            .with_filesystem(Arc::new(FilesystemTools::new(config.workspace_dir())))
            .with_max_output_chars(config.tool_loop.max_output_chars);

        let executor = ToolLoopExecutor::new(provider, base_dispatcher.clone(), events.clone())
            .with_max_iterations(config.tool_loop.max_iterations);
        let defaults = ModelDefaults {
            model: config.default_model.clone(),
            temperature: config.default_temperature,
            max_tokens: Some(config.default_max_tokens),
        };

        // Sub-agents run on the base dispatcher, which has no spawn tool
        let sub_runtime = AgentRuntime::new(agents, sessions, context, executor.clone(), events.clone(), defaults);
        let spawner = Arc::new(SpawnManager::new(sub_runtime.clone(), config.spawn.clone()));
        let runtime = sub_runtime.with_executor(
            executor.with_dispatcher(base_dispatcher.with_spawn(Arc::new(SpawnTool::new(spawner)))),
        );

        let widget = Arc::new(WidgetAdapter::new());
        let router = Arc::new(ChannelRouter::new(directory.clone(), runtime.clone()));
        router.register_adapter(widget.clone());
        router.register_adapter(Arc::new(SlackAdapter::new()));
        router.register_adapter(Arc::new(TeamsAdapter::new()));
        router.register_adapter(Arc::new(WebhookAdapter::new(WebhookConfig::default())));
        let initialized = router.initialize().await?;

        info!(
            agents = config.agents.len(),
            channels = initialized,
            memory = %memory.name(),
            "Parley runtime ready"
        );

        Ok(App {
            config,
            conversations,
            directory,
            memory,
            runtime,
            router,
            widget,
            schedules,
            events,
        })
    }
}

type Stores = (Arc<dyn ConversationStore>, Arc<dyn AgentDirectory>, Arc<dyn MemoryBackend>);

async fn open_stores(config: &AppConfig) -> anyhow::Result<Stores> {
    if config.uses_in_memory_store() {
        let store = Arc::new(InMemoryStore::new());
        let memory: Arc<dyn MemoryBackend> = match config.memory.backend.as_str() {
            "none" => Arc::new(NoopMemory),
            "sqlite" | "in_memory" => Arc::new(InMemoryBackend::new()),
            other => bail!("unknown memory backend '{other}'"),
        };
        return Ok((store.clone(), store, memory));
    }

    let url = config.database_url();
    let store = Arc::new(
        SqliteStore::new(&url)
            .await
            .with_context(|| format!("opening conversation store at {url}"))?,
    );
    let memory: Arc<dyn MemoryBackend> = match config.memory.backend.as_str() {
        "sqlite" => Arc::new(
            SqliteBackend::from_pool(store.pool().clone())
                .await
                .context("opening memory store")?,
        ),
        "in_memory" => Arc::new(InMemoryBackend::new()),
        "none" => Arc::new(NoopMemory),
        other => bail!("unknown memory backend '{other}'"),
    };
    Ok((store.clone(), store, memory))
}

/// Upsert the agents and channels declared in the config file.
async fn seed(config: &AppConfig, directory: &dyn AgentDirectory) -> anyhow::Result<()> {
    for agent in &config.agents {
        directory
            .upsert_agent(agent)
            .await
            .with_context(|| format!("seeding agent '{}'", agent.id))?;
    }
    for channel in &config.channels {
        directory
            .upsert_channel_config(channel)
            .await
            .with_context(|| format!("seeding channel '{}'", channel.id))?;
    }
    Ok(())
}
