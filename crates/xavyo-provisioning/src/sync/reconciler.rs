//! Synchronization reconciler.
//!
//! Walks the change feed of a system and, item by item, classifies the
//! remote object against the identity model, picks the configured action
//! for the situation, applies it and logs the outcome. Only one run per
//! configuration may be active; a run is cancelled cooperatively between
//! items and only a run that completes advances the stored token.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, error, info, instrument, warn};

use xavyo_connector::ids::SystemId;
use xavyo_connector::traits::FullConnector;

use super::context::SynchronizationContext;
use super::error::{SyncError, SyncResult};
use super::log::{ItemOutcome, SyncActionLog, SyncItemLog, SyncLog};
use super::mapper::InboundMapper;
use super::types::{
    InactiveOwnerBehavior, SyncActionType, SyncConfigId, SyncLogId, SyncSituation,
    SynchronizationConfig,
};
use crate::identity::{Account, EntityAccountLink, IdentityEntity};
use crate::mapping::SystemMapping;
use crate::operation::{result_codes, OperationState, ProvisioningOperation};
use crate::provisioning::{Dispatch, ProvisioningError, ProvisioningService};
use crate::store::{ConfigStore, IdentityStore, SyncLogStore};

/// Result of one applied item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemReport {
    pub action: SyncActionType,
    pub outcome: ItemOutcome,
    pub message: Option<String>,
}

impl ItemReport {
    fn success(action: SyncActionType) -> Self {
        Self {
            action,
            outcome: ItemOutcome::Success,
            message: None,
        }
    }

    fn warning(action: SyncActionType, message: impl Into<String>) -> Self {
        Self {
            action,
            outcome: ItemOutcome::Warning,
            message: Some(message.into()),
        }
    }

    fn error(action: SyncActionType, message: impl Into<String>) -> Self {
        Self {
            action,
            outcome: ItemOutcome::Error,
            message: Some(message.into()),
        }
    }

    /// Item outcome of an operation run right away.
    fn from_operation(action: SyncActionType, operation: &ProvisioningOperation) -> Self {
        let detail = || {
            let result = operation.result.as_ref();
            match (result.map(|r| r.code.as_str()), result.and_then(|r| r.cause.as_deref())) {
                (Some(code), Some(cause)) => format!("{code}: {cause}"),
                (Some(code), None) => code.to_string(),
                _ => operation.state.to_string(),
            }
        };
        match operation.state {
            OperationState::Executed => Self::success(action),
            OperationState::Exception => Self::error(action, detail()),
            OperationState::NotExecuted | OperationState::Canceled => {
                Self::warning(action, detail())
            }
            OperationState::Created => Self::warning(
                action,
                format!("operation {} waits behind a blocked batch", operation.id),
            ),
        }
    }
}

/// One item of a dry run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedAction {
    pub uid: String,
    /// `None` for a delete of an unknown account.
    pub situation: Option<SyncSituation>,
    pub action: SyncActionType,
    /// Why the item could not be classified.
    pub error: Option<String>,
}

struct RunHandle {
    log_id: SyncLogId,
    cancel: Arc<AtomicBool>,
}

type RunRegistry = Mutex<HashMap<SyncConfigId, RunHandle>>;

/// Releases the registry entry of a run when dropped.
struct RunGuard<'a> {
    registry: &'a RunRegistry,
    config_id: SyncConfigId,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.config_id);
    }
}

/// Counts items per (action, outcome) and writes the item logs of a run.
struct ActionRecorder {
    log_id: SyncLogId,
    actions: HashMap<(SyncActionType, ItemOutcome), SyncActionLog>,
    contains_error: bool,
}

impl ActionRecorder {
    fn new(log_id: SyncLogId) -> Self {
        Self {
            log_id,
            actions: HashMap::new(),
            contains_error: false,
        }
    }
}

/// Where the items of a walk go.
enum Pass<'a> {
    Apply(&'a mut ActionRecorder),
    Plan(&'a mut Vec<PlannedAction>),
}

/// How a walk over the feed ended.
struct WalkEnd {
    token: Option<String>,
    cancelled: bool,
}

/// Reconciles remote objects of a system with the identity model.
pub struct SyncReconciler {
    configs: Arc<dyn ConfigStore>,
    identities: Arc<dyn IdentityStore>,
    logs: Arc<dyn SyncLogStore>,
    provisioning: Arc<ProvisioningService>,
    mapper: InboundMapper,
    page_size: usize,
    runs: RunRegistry,
}

impl SyncReconciler {
    pub fn new(
        configs: Arc<dyn ConfigStore>,
        identities: Arc<dyn IdentityStore>,
        logs: Arc<dyn SyncLogStore>,
        provisioning: Arc<ProvisioningService>,
        page_size: usize,
    ) -> Self {
        Self {
            configs,
            identities,
            logs,
            provisioning,
            mapper: InboundMapper::new(),
            page_size: page_size.max(1),
            runs: Mutex::new(HashMap::new()),
        }
    }

    /// Run a synchronization to completion or cancellation.
    ///
    /// Returns the closed run log. A fatal error closes the log with the
    /// error recorded and is returned as is.
    #[instrument(skip(self))]
    pub async fn run_sync(&self, config_id: SyncConfigId) -> SyncResult<SyncLog> {
        let (config, mapping) = self.load(config_id).await?;
        if !config.enabled {
            return Err(SyncError::Disabled { config_id });
        }
        let connector = self.connector(&mapping).await?;

        let mut log = SyncLog::start(config_id);
        let cancel = Arc::new(AtomicBool::new(false));
        let _guard = self.register(config_id, log.id, cancel.clone())?;
        self.logs.save_log(&log).await?;
        info!(log_id = %log.id, config = %config.name, "Synchronization started");

        let mut recorder = ActionRecorder::new(log.id);
        let walked = self
            .walk(
                &config,
                &mapping,
                connector.as_ref(),
                &cancel,
                Pass::Apply(&mut recorder),
            )
            .await;
        log.contains_error = recorder.contains_error;

        let end = match walked {
            Ok(end) => end,
            Err(e) => return Err(self.close_failed(&mut log, e).await),
        };

        if end.cancelled {
            log.cancelled = true;
            info!(log_id = %log.id, "Synchronization cancelled, token left unchanged");
        } else if config.token_attribute.is_some() {
            if let Some(token) = end.token {
                // Only the token; the configuration may have been edited meanwhile.
                if let Err(e) = self.configs.update_sync_token(config_id, &token).await {
                    return Err(self.close_failed(&mut log, e.into()).await);
                }
                log.token = Some(token);
            }
        }

        log.finish();
        if let Err(e) = self.logs.save_log(&log).await {
            return Err(self.close_failed(&mut log, e.into()).await);
        }
        info!(
            log_id = %log.id,
            contains_error = log.contains_error,
            cancelled = log.cancelled,
            "Synchronization finished"
        );
        Ok(log)
    }

    /// Ask the run writing `log_id` to stop after its current item.
    #[instrument(skip(self))]
    pub fn cancel_sync(&self, log_id: SyncLogId) -> SyncResult<()> {
        let runs = self.runs.lock().unwrap_or_else(PoisonError::into_inner);
        let handle = runs
            .values()
            .find(|h| h.log_id == log_id)
            .ok_or(SyncError::NotRunning { log_id })?;
        handle.cancel.store(true, Ordering::Relaxed);
        info!("Cancellation requested");
        Ok(())
    }

    /// Whether a run of the configuration is in progress.
    #[must_use]
    pub fn is_running(&self, config_id: SyncConfigId) -> bool {
        self.runs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&config_id)
    }

    /// Log of the run in progress for the configuration.
    #[must_use]
    pub fn running_log(&self, config_id: SyncConfigId) -> Option<SyncLogId> {
        self.runs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&config_id)
            .map(|h| h.log_id)
    }

    /// Classify the feed and resolve actions without applying anything.
    #[instrument(skip(self))]
    pub async fn dry_run(&self, config_id: SyncConfigId) -> SyncResult<Vec<PlannedAction>> {
        let (config, mapping) = self.load(config_id).await?;
        let connector = self.connector(&mapping).await?;
        let never = AtomicBool::new(false);

        let mut planned = Vec::new();
        self.walk(
            &config,
            &mapping,
            connector.as_ref(),
            &never,
            Pass::Plan(&mut planned),
        )
        .await?;
        Ok(planned)
    }

    pub async fn log(&self, log_id: SyncLogId) -> SyncResult<Option<SyncLog>> {
        Ok(self.logs.get_log(log_id).await?)
    }

    pub async fn logs(&self, config_id: SyncConfigId) -> SyncResult<Vec<SyncLog>> {
        Ok(self.logs.list_logs(config_id).await?)
    }

    pub async fn action_logs(&self, log_id: SyncLogId) -> SyncResult<Vec<SyncActionLog>> {
        Ok(self.logs.list_action_logs(log_id).await?)
    }

    pub async fn item_logs(&self, log_id: SyncLogId) -> SyncResult<Vec<SyncItemLog>> {
        Ok(self.logs.list_item_logs(log_id).await?)
    }

    /// Record the error on the log, close it as far as the store allows and
    /// hand the error back.
    async fn close_failed(&self, log: &mut SyncLog, error: SyncError) -> SyncError {
        error!(log_id = %log.id, error = %error, "Synchronization failed");
        log.fail(error.to_string());
        if let Err(save_err) = self.logs.save_log(log).await {
            error!(log_id = %log.id, error = %save_err, "Failed to close sync log");
        }
        error
    }

    async fn load(
        &self,
        config_id: SyncConfigId,
    ) -> SyncResult<(Arc<SynchronizationConfig>, Arc<SystemMapping>)> {
        let config = self
            .configs
            .get_sync_config(config_id)
            .await?
            .ok_or_else(|| SyncError::not_found("Synchronization config", config_id))?;
        if let Some((situation, action)) = config.invalid_action() {
            return Err(SyncError::InvalidAction { situation, action });
        }
        let mapping = self
            .configs
            .get_system_mapping(config.mapping_id)
            .await?
            .ok_or_else(|| SyncError::not_found("System mapping", config.mapping_id))?;
        Ok((Arc::new(config), Arc::new(mapping)))
    }

    async fn connector(&self, mapping: &SystemMapping) -> SyncResult<Arc<dyn FullConnector>> {
        self.provisioning
            .queue()
            .executor()
            .connector(mapping.system_id)
            .await
            .ok_or_else(|| {
                SyncError::configuration(format!(
                    "no connector registered for system {}",
                    mapping.system_id
                ))
            })
    }

    fn register(
        &self,
        config_id: SyncConfigId,
        log_id: SyncLogId,
        cancel: Arc<AtomicBool>,
    ) -> SyncResult<RunGuard<'_>> {
        let mut runs = self.runs.lock().unwrap_or_else(PoisonError::into_inner);
        if runs.contains_key(&config_id) {
            return Err(SyncError::AlreadyRunning { config_id });
        }
        runs.insert(config_id, RunHandle { log_id, cancel });
        Ok(RunGuard {
            registry: &self.runs,
            config_id,
        })
    }

    /// Page through the feed, then report unseen accounts on a full run.
    async fn walk(
        &self,
        config: &Arc<SynchronizationConfig>,
        mapping: &Arc<SystemMapping>,
        connector: &dyn FullConnector,
        cancel: &AtomicBool,
        mut pass: Pass<'_>,
    ) -> SyncResult<WalkEnd> {
        let executor = self.provisioning.queue().executor();
        let start = match config.token_attribute {
            Some(_) => config.last_token.clone(),
            None => None,
        };
        let full = start.is_none();
        let mut token = start;
        let mut seen = HashSet::new();

        debug!(full, token = ?token, "Walking change feed");
        loop {
            let page = executor
                .sync_page(connector, &mapping.object_class, token.as_deref(), self.page_size)
                .await?;

            for delta in page.deltas {
                if cancel.load(Ordering::Relaxed) {
                    return Ok(WalkEnd {
                        token,
                        cancelled: true,
                    });
                }
                seen.insert(delta.uid.value().to_string());
                let delta_token = delta.token.clone();
                let ctx = SynchronizationContext::from_delta(config.clone(), mapping.clone(), delta);
                self.visit(ctx, &mut pass).await?;
                if delta_token.is_some() {
                    token = delta_token;
                }
            }

            if page.next_token.is_some() {
                token = page.next_token;
            }
            if !page.has_more {
                break;
            }
        }

        if full {
            let accounts = self.identities.list_accounts(mapping.system_id).await?;
            for account in accounts {
                if account.wish
                    || account.entity_type != mapping.entity_type
                    || seen.contains(&account.uid)
                {
                    continue;
                }
                if cancel.load(Ordering::Relaxed) {
                    return Ok(WalkEnd {
                        token,
                        cancelled: true,
                    });
                }
                let ctx = SynchronizationContext::unseen(config.clone(), mapping.clone(), account);
                self.visit(ctx, &mut pass).await?;
            }
        }

        Ok(WalkEnd {
            token,
            cancelled: false,
        })
    }

    /// Classify one item and apply or plan its action.
    ///
    /// Only fatal errors are returned; the rest end up in the item log.
    async fn visit(&self, ctx: SynchronizationContext, pass: &mut Pass<'_>) -> SyncResult<()> {
        let uid = ctx.uid.clone();
        let display_name = ctx.display_name();

        let classified = match self.classify(ctx).await {
            Ok(classified) => classified,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!(uid = %uid, error = %e, "Item could not be classified");
                return match pass {
                    Pass::Plan(planned) => {
                        planned.push(PlannedAction {
                            uid,
                            situation: None,
                            action: SyncActionType::Ignore,
                            error: Some(e.to_string()),
                        });
                        Ok(())
                    }
                    Pass::Apply(recorder) => {
                        let report = ItemReport::error(SyncActionType::Ignore, e.to_string());
                        self.record(recorder, &uid, display_name, report).await
                    }
                };
            }
        };

        let Some(situation) = classified.situation else {
            return match pass {
                Pass::Plan(planned) => {
                    planned.push(PlannedAction {
                        uid,
                        situation: None,
                        action: SyncActionType::Ignore,
                        error: None,
                    });
                    Ok(())
                }
                Pass::Apply(recorder) => {
                    let report = ItemReport::warning(
                        SyncActionType::Ignore,
                        "delete of an unknown account, nothing applied",
                    );
                    self.record(recorder, &uid, display_name, report).await
                }
            };
        };

        let action = classified.config.action_for(situation);
        let ctx = classified.with_action(action);
        debug!(uid = %uid, situation = %situation, action = %action, "Item classified");

        match pass {
            Pass::Plan(planned) => {
                planned.push(PlannedAction {
                    uid,
                    situation: Some(situation),
                    action,
                    error: None,
                });
                Ok(())
            }
            Pass::Apply(recorder) => {
                let report = match self.apply(&ctx, action).await {
                    Ok(report) => report,
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) => {
                        warn!(uid = %uid, action = %action, error = %e, "Action failed");
                        ItemReport::error(action, e.to_string())
                    }
                };
                self.record(recorder, &uid, display_name, report).await
            }
        }
    }

    /// Attach the account, link and owner of the item and name its situation.
    async fn classify(&self, ctx: SynchronizationContext) -> SyncResult<SynchronizationContext> {
        let system_id = ctx.mapping.system_id;
        let account = match ctx.account.clone() {
            Some(account) => Some(account),
            None => self
                .identities
                .find_account(system_id, &ctx.uid)
                .await?
                .filter(|a| a.entity_type == ctx.mapping.entity_type),
        };
        let (link, entity) = match &account {
            Some(account) => self.owner(account).await?,
            None => (None, None),
        };
        let ctx = ctx.with_account(account.clone());

        let Some(remote) = ctx.remote.clone() else {
            return Ok(match account {
                Some(_) => ctx
                    .with_link(link)
                    .with_entity(entity)
                    .with_situation(SyncSituation::MissingAccount),
                None => ctx,
            });
        };

        let ctx = ctx.with_mapped(self.mapper.map(&ctx.mapping, &remote)?);
        if link.is_some() && entity.is_some() {
            return Ok(ctx
                .with_link(link)
                .with_entity(entity)
                .with_situation(SyncSituation::Linked));
        }

        let mut candidates = self.correlate(&ctx).await?;
        match candidates.len() {
            0 => Ok(ctx.with_situation(SyncSituation::MissingEntity)),
            1 => Ok(ctx
                .with_entity(candidates.pop())
                .with_situation(SyncSituation::Unlinked)),
            n => Err(SyncError::correlation(format!(
                "{n} entities match remote object '{}'",
                ctx.uid
            ))),
        }
    }

    async fn owner(
        &self,
        account: &Account,
    ) -> SyncResult<(Option<EntityAccountLink>, Option<IdentityEntity>)> {
        let Some(link) = self.identities.find_link_by_account(account.id).await? else {
            return Ok((None, None));
        };
        let entity = self.identities.get_entity(link.entity_id).await?;
        if entity.is_none() {
            warn!(link_id = %link.id, "Link points to a missing entity, treating account as unlinked");
            return Ok((None, None));
        }
        Ok((Some(link), entity))
    }

    async fn correlate(&self, ctx: &SynchronizationContext) -> SyncResult<Vec<IdentityEntity>> {
        let Some(property) = ctx.config.correlation_attribute.as_deref() else {
            return Ok(Vec::new());
        };
        let Some(value) = ctx.mapped.property(property).iter().find(|v| !v.is_blank()) else {
            debug!(uid = %ctx.uid, property, "No correlation value on remote object");
            return Ok(Vec::new());
        };
        Ok(self
            .identities
            .find_entities_by_attribute(&ctx.mapping.entity_type, property, value)
            .await?)
    }

    #[instrument(skip(self, ctx), fields(uid = %ctx.uid))]
    async fn apply(
        &self,
        ctx: &SynchronizationContext,
        action: SyncActionType,
    ) -> SyncResult<ItemReport> {
        let system_id = ctx.mapping.system_id;
        match action {
            SyncActionType::Ignore => Ok(ItemReport {
                action,
                outcome: ItemOutcome::Success,
                message: Some("ignored".to_string()),
            }),
            SyncActionType::UpdateEntity => {
                self.update_entity(ctx, action).await?;
                Ok(ItemReport::success(action))
            }
            SyncActionType::UpdateAccount => {
                let entity = ctx.entity.as_ref().ok_or(SyncError::missing(action, "an owner"))?;
                self.provision(action, entity, system_id).await
            }
            SyncActionType::Unlink | SyncActionType::UnlinkAndRemoveRole => {
                let link = ctx.link.as_ref().ok_or(SyncError::missing(action, "a link"))?;
                self.identities.delete_link(link.id).await?;
                if action == SyncActionType::UnlinkAndRemoveRole {
                    if let Some(assignment_id) = link.role_assignment_id {
                        self.identities.delete_role_assignment(assignment_id).await?;
                    }
                }
                info!(link_id = %link.id, "Account unlinked");
                Ok(ItemReport::success(action))
            }
            SyncActionType::Link | SyncActionType::LinkAndUpdateEntity => {
                self.link(ctx, action).await
            }
            SyncActionType::CreateEntity => {
                let mut entity = IdentityEntity::new(ctx.mapping.entity_type.clone());
                ctx.mapped.apply_to(&mut entity);
                self.identities.save_entity(&entity).await?;
                let account = self.ensure_account(ctx, false).await?;
                self.identities
                    .save_link(&EntityAccountLink::new(entity.id, account.id))
                    .await?;
                info!(entity_id = %entity.id, account_id = %account.id, "Entity created");
                Ok(ItemReport::success(action))
            }
            SyncActionType::DeleteAccount => {
                let account = self.ensure_account(ctx, false).await?;
                let operation = self
                    .provisioning
                    .deprovision_account(account.id, Dispatch::Immediate)
                    .await?;
                Ok(ItemReport::from_operation(action, &operation))
            }
            SyncActionType::DisableAccount => {
                let account = self.ensure_account(ctx, false).await?;
                let operation = self
                    .provisioning
                    .disable_account(account.id, Dispatch::Immediate)
                    .await?;
                Ok(ItemReport::from_operation(action, &operation))
            }
            SyncActionType::CreateAccount => {
                let entity = ctx.entity.as_ref().ok_or(SyncError::missing(action, "an owner"))?;
                self.provision(action, entity, system_id).await
            }
            SyncActionType::DeleteEntity => {
                let entity = ctx.entity.as_ref().ok_or(SyncError::missing(action, "an owner"))?;
                self.identities.delete_entity(entity.id).await?;
                if let Some(account) = &ctx.account {
                    self.identities.delete_account(account.id).await?;
                }
                info!(entity_id = %entity.id, "Entity deleted");
                Ok(ItemReport::success(action))
            }
        }
    }

    async fn provision(
        &self,
        action: SyncActionType,
        entity: &IdentityEntity,
        system_id: SystemId,
    ) -> SyncResult<ItemReport> {
        let operation = match self
            .provisioning
            .provision_account(entity.id, system_id, Dispatch::Immediate)
            .await
        {
            Ok(operation) => operation,
            Err(e @ ProvisioningError::BreakerOpen { .. }) => {
                return Ok(ItemReport::warning(
                    action,
                    format!("{}: {e}", result_codes::BREAKER_OPEN),
                ));
            }
            Err(e) => return Err(e.into()),
        };
        Ok(match operation {
            Some(operation) => ItemReport::from_operation(action, &operation),
            None => ItemReport {
                action,
                outcome: ItemOutcome::Success,
                message: Some("nothing to provision".to_string()),
            },
        })
    }

    async fn link(
        &self,
        ctx: &SynchronizationContext,
        action: SyncActionType,
    ) -> SyncResult<ItemReport> {
        let entity = ctx.entity.as_ref().ok_or(SyncError::missing(action, "a correlated entity"))?;

        let protect = if entity.is_active() {
            false
        } else {
            match ctx.config.inactive_owner_behavior {
                InactiveOwnerBehavior::DoNotLink => {
                    info!(entity_id = %entity.id, "Owner inactive, account not linked");
                    return Ok(ItemReport::warning(action, "owner is inactive, account not linked"));
                }
                InactiveOwnerBehavior::LinkProtected => true,
                InactiveOwnerBehavior::Link => false,
            }
        };

        let account = self.ensure_account(ctx, protect).await?;
        let link = EntityAccountLink::new(entity.id, account.id);
        self.identities.save_link(&link).await?;
        info!(entity_id = %entity.id, account_id = %account.id, protected = protect, "Account linked");

        if action == SyncActionType::LinkAndUpdateEntity {
            let linked = ctx.with_account(Some(account)).with_link(Some(link));
            self.update_entity(&linked, action).await?;
        }
        Ok(ItemReport::success(action))
    }

    async fn update_entity(
        &self,
        ctx: &SynchronizationContext,
        action: SyncActionType,
    ) -> SyncResult<()> {
        let mut entity = ctx.entity.clone().ok_or(SyncError::missing(action, "an owner"))?;
        ctx.mapped.apply_to(&mut entity);
        self.identities.save_entity(&entity).await?;
        debug!(entity_id = %entity.id, "Entity updated from remote object");
        Ok(())
    }

    /// The account record of the item, created when the system has none.
    async fn ensure_account(
        &self,
        ctx: &SynchronizationContext,
        protect: bool,
    ) -> SyncResult<Account> {
        let mut account = match ctx.account.clone() {
            Some(account) if account.in_protection || !protect => return Ok(account),
            Some(account) => account,
            None => Account::new(
                ctx.mapping.system_id,
                ctx.uid.clone(),
                ctx.mapping.entity_type.clone(),
            ),
        };
        account.in_protection = account.in_protection || protect;
        self.identities.save_account(&account).await?;
        Ok(account)
    }

    async fn record(
        &self,
        recorder: &mut ActionRecorder,
        uid: &str,
        display_name: Option<String>,
        report: ItemReport,
    ) -> SyncResult<()> {
        let log_id = recorder.log_id;
        let action_log = recorder
            .actions
            .entry((report.action, report.outcome))
            .or_insert_with(|| SyncActionLog::new(log_id, report.action, report.outcome));
        action_log.count += 1;
        self.logs.save_action_log(action_log).await?;

        let item = SyncItemLog::new(action_log.id, uid, report.outcome, report.message)
            .with_display_name(display_name);
        self.logs.append_item_log(log_id, &item).await?;

        if report.outcome == ItemOutcome::Error {
            recorder.contains_error = true;
        }
        Ok(())
    }
}

impl std::fmt::Debug for SyncReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncReconciler")
            .field("page_size", &self.page_size)
            .finish_non_exhaustive()
    }
}
