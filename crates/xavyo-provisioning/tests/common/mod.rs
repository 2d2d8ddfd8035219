//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing_subscriber::EnvFilter;
use xavyo_connector::error::{ConnectorError, ConnectorResult};
use xavyo_connector::ids::SystemId;
use xavyo_connector::operation::{AttributeSet, Uid};
use xavyo_connector::traits::{
    Connector, CreateOp, DeleteOp, ReadOp, SyncDelta, SyncOp, SyncPage, UpdateOp,
};
use xavyo_connector::types::OperationType;
use xavyo_provisioning::notify::{Notifier, NotifyResult};
use xavyo_provisioning::operation::{OperationPayload, ProvisioningOperation};
use xavyo_provisioning::store::memory::InMemoryStore;
use xavyo_provisioning::store::{ConfigStore, IdentityStore};
use xavyo_provisioning::transform::Transform;
use xavyo_provisioning::{
    Account, AttributeMapping, ConnectorRegistry, EngineConfig, IdentityEntity, MappingOperation,
    OperationExecutor, ProvisioningBreaker, ProvisioningQueue, ProvisioningService,
    SyncReconciler, SystemMapping,
};

pub const OBJECT_CLASS: &str = "__ACCOUNT__";
pub const ENTITY_TYPE: &str = "identity";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

// =============================================================================
// Manual Mock Connector
// =============================================================================

type SyncHook = Box<dyn Fn() + Send + Sync>;

/// In-memory target system with switchable failures.
pub struct MockConnector {
    objects: Mutex<BTreeMap<String, AttributeSet>>,
    feed: Mutex<Vec<SyncDelta>>,
    fail_create: AtomicBool,
    fail_update: AtomicBool,
    fail_delete: AtomicBool,
    fail_read: AtomicBool,
    delay_ms: AtomicU64,
    create_calls: AtomicUsize,
    update_calls: AtomicUsize,
    delete_calls: AtomicUsize,
    read_calls: AtomicUsize,
    sync_tokens: Mutex<Vec<Option<String>>>,
    on_sync: Mutex<Option<Arc<SyncHook>>>,
}

impl MockConnector {
    #[must_use]
    pub fn new() -> Self {
        Self {
            objects: Mutex::new(BTreeMap::new()),
            feed: Mutex::new(Vec::new()),
            fail_create: AtomicBool::new(false),
            fail_update: AtomicBool::new(false),
            fail_delete: AtomicBool::new(false),
            fail_read: AtomicBool::new(false),
            delay_ms: AtomicU64::new(0),
            create_calls: AtomicUsize::new(0),
            update_calls: AtomicUsize::new(0),
            delete_calls: AtomicUsize::new(0),
            read_calls: AtomicUsize::new(0),
            sync_tokens: Mutex::new(Vec::new()),
            on_sync: Mutex::new(None),
        }
    }

    pub fn set_fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_update(&self, fail: bool) {
        self.fail_update.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_delete(&self, fail: bool) {
        self.fail_delete.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_read(&self, fail: bool) {
        self.fail_read.store(fail, Ordering::SeqCst);
    }

    /// Delay every write and sync call.
    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms
            .store(u64::try_from(delay.as_millis()).unwrap(), Ordering::SeqCst);
    }

    pub fn put_object(&self, uid: &str, attributes: AttributeSet) {
        self.objects
            .lock()
            .unwrap()
            .insert(uid.to_string(), attributes);
    }

    pub fn object(&self, uid: &str) -> Option<AttributeSet> {
        self.objects.lock().unwrap().get(uid).cloned()
    }

    /// Append deltas to the change feed; tokens are feed positions.
    pub fn push_deltas(&self, deltas: Vec<SyncDelta>) {
        self.feed.lock().unwrap().extend(deltas);
    }

    /// Run a callback every time a page is requested.
    pub fn on_sync(&self, hook: impl Fn() + Send + Sync + 'static) {
        *self.on_sync.lock().unwrap() = Some(Arc::new(Box::new(hook)));
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn update_calls(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }

    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }

    pub fn read_calls(&self) -> usize {
        self.read_calls.load(Ordering::SeqCst)
    }

    pub fn write_calls(&self) -> usize {
        self.create_calls() + self.update_calls() + self.delete_calls()
    }

    pub fn sync_tokens(&self) -> Vec<Option<String>> {
        self.sync_tokens.lock().unwrap().clone()
    }

    async fn delay(&self) {
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
    }
}

impl Default for MockConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connector for MockConnector {
    fn display_name(&self) -> &str {
        "mock"
    }

    async fn test_connection(&self) -> ConnectorResult<()> {
        Ok(())
    }
}

#[async_trait]
impl ReadOp for MockConnector {
    async fn read(&self, _object_class: &str, uid: &Uid) -> ConnectorResult<Option<AttributeSet>> {
        self.read_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_read.load(Ordering::SeqCst) {
            return Err(ConnectorError::connection_failed("connection refused"));
        }
        Ok(self.object(uid.value()))
    }
}

#[async_trait]
impl CreateOp for MockConnector {
    async fn create(&self, _object_class: &str, attributes: AttributeSet) -> ConnectorResult<Uid> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        self.delay().await;
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(ConnectorError::connection_failed("connection refused"));
        }
        let uid = attributes.get_string("login").unwrap_or("generated").to_string();
        self.put_object(&uid, attributes);
        Ok(Uid::new(uid))
    }
}

#[async_trait]
impl UpdateOp for MockConnector {
    async fn update(
        &self,
        _object_class: &str,
        uid: &Uid,
        attributes: AttributeSet,
    ) -> ConnectorResult<Uid> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        self.delay().await;
        if self.fail_update.load(Ordering::SeqCst) {
            return Err(ConnectorError::connection_failed("connection refused"));
        }
        let mut objects = self.objects.lock().unwrap();
        let object = objects
            .get_mut(uid.value())
            .ok_or_else(|| ConnectorError::not_found(uid.value()))?;
        object.extend(attributes);
        Ok(uid.clone())
    }
}

#[async_trait]
impl DeleteOp for MockConnector {
    async fn delete(&self, _object_class: &str, uid: &Uid) -> ConnectorResult<()> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        self.delay().await;
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(ConnectorError::connection_failed("connection refused"));
        }
        self.objects
            .lock()
            .unwrap()
            .remove(uid.value())
            .map(|_| ())
            .ok_or_else(|| ConnectorError::not_found(uid.value()))
    }
}

#[async_trait]
impl SyncOp for MockConnector {
    async fn sync(
        &self,
        _object_class: &str,
        token: Option<&str>,
        page_size: usize,
    ) -> ConnectorResult<SyncPage> {
        self.sync_tokens
            .lock()
            .unwrap()
            .push(token.map(str::to_string));
        let hook = self.on_sync.lock().unwrap().clone();
        if let Some(hook) = hook {
            hook();
        }
        self.delay().await;

        let start = token.map_or(0, |t| t.parse::<usize>().unwrap());
        let feed = self.feed.lock().unwrap();
        let end = (start + page_size).min(feed.len());
        let deltas = feed[start.min(end)..end]
            .iter()
            .enumerate()
            .map(|(i, delta)| delta.clone().with_token((start + i + 1).to_string()))
            .collect();

        let mut page = SyncPage::with_deltas(deltas).with_token(end.to_string());
        if end < feed.len() {
            page = page.with_more();
        }
        Ok(page)
    }
}

// =============================================================================
// Recording Notifier
// =============================================================================

#[derive(Debug, Clone)]
pub struct SentNotification {
    pub template_id: String,
    pub recipients: Vec<String>,
    pub context: serde_json::Value,
}

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<SentNotification>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<SentNotification> {
        self.sent.lock().unwrap().clone()
    }

    pub fn templates(&self) -> Vec<String> {
        self.sent().into_iter().map(|n| n.template_id).collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(
        &self,
        template_id: &str,
        recipients: &[String],
        context: serde_json::Value,
    ) -> NotifyResult<()> {
        self.sent.lock().unwrap().push(SentNotification {
            template_id: template_id.to_string(),
            recipients: recipients.to_vec(),
            context,
        });
        Ok(())
    }
}

// =============================================================================
// Harness
// =============================================================================

pub struct Harness {
    pub system_id: SystemId,
    pub store: Arc<InMemoryStore>,
    pub connector: Arc<MockConnector>,
    pub notifier: Arc<RecordingNotifier>,
    pub breaker: Arc<ProvisioningBreaker>,
    pub queue: Arc<ProvisioningQueue>,
    pub provisioning: Arc<ProvisioningService>,
    pub reconciler: Arc<SyncReconciler>,
    pub sync_mapping: SystemMapping,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_config(EngineConfig {
            sync_page_size: 2,
            ..EngineConfig::default()
        })
        .await
    }

    pub async fn with_config(config: EngineConfig) -> Self {
        init_tracing();

        let system_id = SystemId::new();
        let store = Arc::new(InMemoryStore::new());
        let connector = Arc::new(MockConnector::new());
        let notifier = Arc::new(RecordingNotifier::default());

        let registry = Arc::new(ConnectorRegistry::new());
        registry.register(system_id, connector.clone()).await;

        let executor = OperationExecutor::new(registry, config.connector_timeout());
        let breaker = Arc::new(ProvisioningBreaker::new(store.clone(), notifier.clone()));
        let queue = Arc::new(ProvisioningQueue::new(
            store.clone(),
            store.clone(),
            executor,
            breaker.clone(),
        ));
        let provisioning = Arc::new(ProvisioningService::new(
            store.clone(),
            store.clone(),
            queue.clone(),
        ));
        let reconciler = Arc::new(SyncReconciler::new(
            store.clone(),
            store.clone(),
            store.clone(),
            provisioning.clone(),
            config.sync_page_size,
        ));

        let provisioning_mapping = SystemMapping::new(
            system_id,
            ENTITY_TYPE,
            OBJECT_CLASS,
            MappingOperation::Provisioning,
        )
        .with_attribute(AttributeMapping::new("login", "username").as_uid())
        .with_attribute(AttributeMapping::new("mail", "email"));
        store.save_system_mapping(&provisioning_mapping).await.unwrap();

        let sync_mapping = SystemMapping::new(
            system_id,
            ENTITY_TYPE,
            OBJECT_CLASS,
            MappingOperation::Synchronization,
        )
        .with_attribute(AttributeMapping::new("login", "username").as_uid())
        .with_attribute(
            AttributeMapping::new("mail", "email").with_from_resource(Transform::Lowercase),
        );
        store.save_system_mapping(&sync_mapping).await.unwrap();

        Self {
            system_id,
            store,
            connector,
            notifier,
            breaker,
            queue,
            provisioning,
            reconciler,
            sync_mapping,
        }
    }

    /// Save an active entity.
    pub async fn entity(&self, username: &str, email: &str) -> IdentityEntity {
        let entity = IdentityEntity::new(ENTITY_TYPE)
            .with_attribute("username", username)
            .with_attribute("email", email);
        self.store.save_entity(&entity).await.unwrap();
        entity
    }

    /// Save an account record and its remote object.
    pub async fn account(&self, uid: &str) -> Account {
        let account = Account::new(self.system_id, uid, ENTITY_TYPE);
        self.store.save_account(&account).await.unwrap();
        self.connector
            .put_object(uid, AttributeSet::new().with("login", uid));
        account
    }

    pub fn update(&self, uid: &str, mail: &str) -> ProvisioningOperation {
        ProvisioningOperation::new(
            OperationType::Update,
            self.system_id,
            ENTITY_TYPE,
            uid,
            OperationPayload::new(OBJECT_CLASS, AttributeSet::new().with("mail", mail)),
        )
    }

    pub fn delete(&self, uid: &str) -> ProvisioningOperation {
        ProvisioningOperation::new(
            OperationType::Delete,
            self.system_id,
            ENTITY_TYPE,
            uid,
            OperationPayload::new(OBJECT_CLASS, AttributeSet::new()),
        )
    }
}
