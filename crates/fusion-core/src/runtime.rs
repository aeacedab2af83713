//! Wiring from settings to ready-to-use executors.

use std::sync::Arc;

use fusion_state::{FsStateStore, SessionStore};
use tracing::info;

use crate::chain::ChainExecutor;
use crate::config::{FusionConfig, FusionSettings};
use crate::domain::FusionResult;
use crate::invocation::Invoker;
use crate::memory::AgentMemory;
use crate::parallel::ParallelOrchestrator;
use crate::routing::RiskAssessor;
use crate::telemetry::TelemetryLogger;

/// Everything a process needs to run chains and batches: configuration,
/// file-backed state, one telemetry session and both executors sharing a
/// single [`Invoker`].
pub struct FusionRuntime {
    settings: FusionSettings,
    config: FusionConfig,
    store: Arc<FsStateStore>,
    telemetry: Arc<TelemetryLogger>,
    memory: Arc<AgentMemory>,
    chains: ChainExecutor,
    parallel: ParallelOrchestrator,
}

impl FusionRuntime {
    /// Load configuration from `settings.config_dir` (broken documents fall
    /// back to defaults) and open state under `settings.state_dir`.
    pub async fn open(
        settings: FusionSettings,
        assessor: Arc<dyn RiskAssessor>,
    ) -> FusionResult<Self> {
        let config = FusionConfig::load_or_default(&settings.config_dir);
        Self::with_config(settings, config, assessor).await
    }

    pub async fn with_config(
        settings: FusionSettings,
        config: FusionConfig,
        assessor: Arc<dyn RiskAssessor>,
    ) -> FusionResult<Self> {
        let store = Arc::new(FsStateStore::new(&settings.state_dir)?);
        let memory = Arc::new(AgentMemory::open(store.clone(), settings.memory_capacity).await?);
        let telemetry = Arc::new(TelemetryLogger::with_generated_id());

        let invoker = Invoker::new(config.router(assessor), telemetry.clone(), memory.clone())
            .with_config(settings.invocation_config());
        let chains = ChainExecutor::new(config.chains.clone(), invoker.clone())
            .with_config(settings.chain_config());
        let parallel = ParallelOrchestrator::new(invoker).with_config(settings.parallel_config());

        info!(
            session_id = %telemetry.session_id(),
            state_dir = %settings.state_dir.display(),
            chains = config.chains.len(),
            "fusion runtime ready"
        );

        Ok(Self {
            settings,
            config,
            store,
            telemetry,
            memory,
            chains,
            parallel,
        })
    }

    pub fn settings(&self) -> &FusionSettings {
        &self.settings
    }

    pub fn config(&self) -> &FusionConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<FsStateStore> {
        &self.store
    }

    pub fn telemetry(&self) -> &Arc<TelemetryLogger> {
        &self.telemetry
    }

    pub fn memory(&self) -> &Arc<AgentMemory> {
        &self.memory
    }

    pub fn chains(&self) -> &ChainExecutor {
        &self.chains
    }

    pub fn parallel(&self) -> &ParallelOrchestrator {
        &self.parallel
    }

    /// Persist the current telemetry session under the state directory.
    pub async fn save_session(&self) -> FusionResult<()> {
        self.telemetry.save(self.store.as_ref()).await
    }

    pub async fn list_sessions(&self) -> FusionResult<Vec<String>> {
        Ok(self.store.list_sessions().await?)
    }

    pub async fn load_session(&self, session_id: &str) -> FusionResult<TelemetryLogger> {
        TelemetryLogger::load(self.store.as_ref(), session_id).await
    }
}

impl std::fmt::Debug for FusionRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FusionRuntime")
            .field("settings", &self.settings)
            .field("session_id", &self.telemetry.session_id())
            .finish_non_exhaustive()
    }
}
