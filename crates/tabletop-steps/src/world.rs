//! The step world, the shared environment, and the harness entry point.

use crate::driver::{ApiRequest, ApiResponse, HttpDriver};
use crate::mail::Outbox;
use async_trait::async_trait;
use cucumber::gherkin::Step;
use cucumber::World;
use mock_registry::{CallLog, MockRegistry, Scope, TestClock};
use parking_lot::Mutex;
use record_store::MemoryStore;
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::sync::{Arc, OnceLock};
use tabletop_core::{RecordStore, Schema, StepTable};
use tracing::info;

/// Everything the steps operate on. Built once per run by the factory
/// given to [`Harness::new`] and shared across scenarios, mirroring a
/// persistent database under a sequential BDD suite; scenario-local
/// state (request headers, responses, the outbox, the operation log)
/// is reset between scenarios.
#[derive(Clone)]
pub struct Environment {
    pub schema: Arc<Schema>,
    pub store: Arc<dyn RecordStore>,
    pub driver: Arc<dyn HttpDriver>,
    pub registry: Arc<MockRegistry>,
    pub outbox: Outbox,
    pub clock: TestClock,
    pub call_log: CallLog,
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("entities", &self.schema.entity_names().count())
            .field("registry", &self.registry)
            .field("outbox", &self.outbox)
            .finish()
    }
}

impl Environment {
    pub fn builder(schema: Schema) -> EnvironmentBuilder {
        EnvironmentBuilder {
            schema: Arc::new(schema),
            store: None,
            driver: None,
            registry: None,
        }
    }
}

pub struct EnvironmentBuilder {
    schema: Arc<Schema>,
    store: Option<Arc<dyn RecordStore>>,
    driver: Option<Arc<dyn HttpDriver>>,
    registry: Option<Arc<MockRegistry>>,
}

impl EnvironmentBuilder {
    pub fn store(mut self, store: Arc<dyn RecordStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn http_driver(mut self, driver: Arc<dyn HttpDriver>) -> Self {
        self.driver = Some(driver);
        self
    }

    pub fn mock_registry(mut self, registry: Arc<MockRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn build(self) -> Environment {
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryStore::new(self.schema.clone())));
        Environment {
            schema: self.schema,
            store,
            driver: self.driver.unwrap_or_else(|| Arc::new(NoDriver)),
            registry: self.registry.unwrap_or_default(),
            outbox: Outbox::new(),
            clock: TestClock::new(),
            call_log: CallLog::new(),
        }
    }
}

/// Placeholder driver for suites that never issue real requests; the
/// request steps still work against stubbed responses.
struct NoDriver;

#[async_trait]
impl HttpDriver for NoDriver {
    async fn send(&self, request: ApiRequest) -> anyhow::Result<ApiResponse> {
        anyhow::bail!(
            "no HTTP driver configured and no stubbed response queued for {} {}",
            request.method,
            request.url
        )
    }
}

/// Per-scenario HTTP conversation state.
#[derive(Debug, Default)]
pub(crate) struct HttpState {
    pub headers: BTreeMap<String, String>,
    pub response: Option<ApiResponse>,
    pub stubbed: VecDeque<ApiResponse>,
}

/// The cucumber world: the shared environment plus per-scenario state.
#[derive(World)]
#[world(init = Self::new)]
pub struct TabletopWorld {
    pub env: Environment,
    pub(crate) http: HttpState,
}

impl fmt::Debug for TabletopWorld {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TabletopWorld")
            .field("env", &self.env)
            .field("http", &self.http)
            .finish()
    }
}

static ENV_FACTORY: OnceLock<Box<dyn Fn() -> Environment + Send + Sync>> = OnceLock::new();
static SHARED_ENV: OnceLock<Environment> = OnceLock::new();
static CURRENT_FEATURE: Mutex<Option<String>> = Mutex::new(None);

impl TabletopWorld {
    fn new() -> Self {
        let env = SHARED_ENV
            .get_or_init(|| {
                let factory = ENV_FACTORY
                    .get()
                    .expect("Harness::new must be called before scenarios run");
                factory()
            })
            .clone();
        Self {
            env,
            http: HttpState::default(),
        }
    }

    /// The step's data table as a [`StepTable`].
    pub fn table_of(&self, step: &Step) -> StepTable {
        let table = step.table.as_ref().expect("step requires a data table");
        StepTable::from_rows(&table.rows).expect("step table rows share the heading set")
    }

    fn start_scenario(&mut self, feature: &str) {
        let mut current = CURRENT_FEATURE.lock();
        if current.as_deref() != Some(feature) {
            if current.is_some() {
                self.env.registry.end_scope(Scope::Feature);
            }
            *current = Some(feature.to_string());
        }
        drop(current);
        self.env.outbox.clear();
        self.env.store.clear_operations();
    }
}

/// Runs a feature directory against an environment factory, wiring
/// scenario and feature mock teardown around every scenario.
pub struct Harness {
    _private: (),
}

impl Harness {
    pub fn new(factory: impl Fn() -> Environment + Send + Sync + 'static) -> Self {
        let _ = ENV_FACTORY.set(Box::new(factory));
        Self { _private: () }
    }

    pub async fn run(self, features: &str) {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
        info!("running Tabletop suite from {features}");

        TabletopWorld::cucumber()
            .fail_on_skipped()
            .max_concurrent_scenarios(1)
            .before(|feature, _rule, _scenario, world| {
                Box::pin(async move {
                    world.start_scenario(&feature.name);
                })
            })
            .after(|_feature, _rule, _scenario, _finished, world| {
                Box::pin(async move {
                    if let Some(world) = world {
                        world.env.registry.end_scope(Scope::Scenario);
                    }
                })
            })
            .run(features)
            .await;

        if let Some(env) = SHARED_ENV.get() {
            env.registry.end_scope(Scope::Scenario);
            env.registry.end_scope(Scope::Feature);
        }
    }
}
