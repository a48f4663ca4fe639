//! Inbound event pipeline.
//!
//! Each update goes through one ordered decision chain:
//! 1. slash commands,
//! 2. admin forwarding (broadcast / send-to), for the admin only,
//! 3. period numbers.
//!
//! Callback queries are acknowledged and then mapped to mode selection, VIP
//! info or a WIN/LOSS result.
//!
//! A broadcast fans out on its own task, so other users are served while it
//! is delivering.

use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::admin::{parse_command, AdminMode, AdminSession, Command};
use crate::config::Config;
use crate::messages;
use crate::metrics::Metrics;
use crate::record::{Mode, Outcome, UserId};
use crate::session::{GrantOutcome, ModeOutcome, PeriodOutcome, ResultOutcome, SessionController};
use crate::store::UserStore;
use crate::telegram::{CallbackEvent, ChatId, Inbound, InboundMessage, OutboundMessage, Transport};

/// Handler result
pub type HandleResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

pub struct Router {
    config: Arc<Config>,
    sessions: SessionController,
    transport: Arc<dyn Transport>,
    metrics: Arc<Metrics>,
    broadcasts: Mutex<Vec<JoinHandle<()>>>,
}

impl Router {
    pub fn new(config: Arc<Config>, store: Arc<dyn UserStore>, transport: Arc<dyn Transport>) -> Self {
        let sessions = SessionController::new(store, config.ladder);
        Self {
            config,
            sessions,
            transport,
            metrics: Arc::new(Metrics::new()),
            broadcasts: Mutex::new(Vec::new()),
        }
    }

    pub fn sessions(&self) -> &SessionController {
        &self.sessions
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Wait for every broadcast started so far to finish delivering
    pub async fn finish_broadcasts(&self) {
        let pending = std::mem::take(&mut *self.broadcasts.lock().await);
        for task in pending {
            if let Err(e) = task.await {
                error!(error = %e, "broadcast task failed");
            }
        }
    }

    fn is_admin(&self, id: UserId) -> bool {
        self.config.admin.id != 0 && id == self.config.admin.id
    }

    /// Handle one inbound event. Failures are logged and the event is dropped.
    pub async fn handle(&self, inbound: Inbound) {
        let result = match inbound {
            Inbound::Message(msg) => self.handle_message(msg).await,
            Inbound::Callback(cb) => self.handle_callback(cb).await,
        };

        match result {
            Ok(()) => self.metrics.record_event(),
            Err(e) => {
                self.metrics.record_failure();
                error!(error = %e, "event dropped");
            }
        }
    }

    async fn reply(&self, chat_id: ChatId, message: OutboundMessage) -> HandleResult {
        self.transport.send_message(chat_id, &message).await?;
        Ok(())
    }

    async fn handle_message(&self, msg: InboundMessage) -> HandleResult {
        let Some(from) = msg.from else {
            return Ok(());
        };

        if let Some(cmd) = msg.payload.text().and_then(parse_command) {
            if !matches!(cmd, Command::Unknown(_)) {
                return self.handle_command(from, msg.chat_id, cmd).await;
            }
        }

        if self.is_admin(from) {
            match self.admin_mode(from).await? {
                AdminMode::Broadcast => return self.broadcast(from, &msg).await,
                AdminMode::SendTo(target) => return self.send_to(from, target, &msg).await,
                AdminMode::Idle => {}
            }
        }

        if let Some(text) = msg.payload.text() {
            return self.handle_period(from, msg.chat_id, text).await;
        }
        Ok(())
    }

    async fn handle_command(&self, from: UserId, chat_id: ChatId, cmd: Command) -> HandleResult {
        if cmd.is_admin_only() && !self.is_admin(from) {
            warn!(user_id = from, command = ?cmd, "admin command from non-admin");
            return match cmd {
                Command::CancelBroadcast | Command::CancelSend => Ok(()),
                _ => self.reply(chat_id, messages::not_admin()).await,
            };
        }

        match cmd {
            Command::Start => {
                self.sessions.ensure_user(from).await?;
                self.reply(chat_id, messages::welcome(&self.config)).await
            }
            Command::AddVip(target) => {
                let reply = match self.sessions.grant_vip(target).await? {
                    GrantOutcome::Granted => messages::vip_granted(target),
                    GrantOutcome::NotFound => messages::vip_unknown_user(target),
                };
                self.reply(chat_id, reply).await
            }
            Command::Broadcast => self.set_admin_mode(from, chat_id, AdminMode::Broadcast).await,
            Command::Send(target) => self.set_admin_mode(from, chat_id, AdminMode::SendTo(target)).await,
            Command::CancelBroadcast => {
                let mut mode = self.admin_mode(from).await?;
                if mode == AdminMode::Broadcast {
                    mode = AdminMode::Idle;
                    self.store_admin_mode(from, mode).await?;
                }
                self.reply(chat_id, messages::admin_mode(mode)).await
            }
            Command::CancelSend => {
                let mut mode = self.admin_mode(from).await?;
                if matches!(mode, AdminMode::SendTo(_)) {
                    mode = AdminMode::Idle;
                    self.store_admin_mode(from, mode).await?;
                }
                self.reply(chat_id, messages::admin_mode(mode)).await
            }
            Command::Unknown(text) => {
                debug!(user_id = from, text = %text, "unknown command ignored");
                Ok(())
            }
        }
    }

    async fn admin_mode(&self, admin_id: UserId) -> Result<AdminMode, crate::error::StoreError> {
        Ok(self
            .sessions
            .store()
            .admin_session(admin_id)
            .await?
            .map(|s| s.mode)
            .unwrap_or_default())
    }

    async fn store_admin_mode(&self, admin_id: UserId, mode: AdminMode) -> HandleResult {
        self.sessions
            .store()
            .put_admin_session(AdminSession::new(admin_id, mode))
            .await?;
        info!(admin_id, mode = ?mode, "admin mode changed");
        Ok(())
    }

    async fn set_admin_mode(&self, admin_id: UserId, chat_id: ChatId, mode: AdminMode) -> HandleResult {
        self.store_admin_mode(admin_id, mode).await?;
        self.reply(chat_id, messages::admin_mode(mode)).await
    }

    async fn broadcast(&self, admin_id: UserId, msg: &InboundMessage) -> HandleResult {
        let recipients: Vec<UserId> = self
            .sessions
            .store()
            .list_ids()
            .await?
            .into_iter()
            .filter(|id| *id != admin_id)
            .collect();
        info!(admin_id, recipients = recipients.len(), "broadcast started");

        let task = tokio::spawn(fan_out(
            self.transport.clone(),
            self.metrics.clone(),
            recipients,
            msg.clone(),
        ));
        let mut tasks = self.broadcasts.lock().await;
        tasks.retain(|t| !t.is_finished());
        tasks.push(task);
        Ok(())
    }

    async fn send_to(&self, admin_id: UserId, target: UserId, msg: &InboundMessage) -> HandleResult {
        let result = self.transport.forward(target, msg).await;
        self.metrics.record_forward(result.is_ok());
        if let Err(e) = result {
            warn!(admin_id, user_id = target, error = %e, "direct message failed");
        }
        Ok(())
    }

    async fn handle_period(&self, from: UserId, chat_id: ChatId, text: &str) -> HandleResult {
        match self.sessions.submit_period(from, text).await? {
            PeriodOutcome::Presented {
                next_period,
                prediction,
                level,
                bet,
            } => {
                self.metrics.record_prediction();
                self.reply(chat_id, messages::prediction(next_period, prediction, level, bet))
                    .await
            }
            PeriodOutcome::NotStarted => self.reply(chat_id, messages::start_first()).await,
            PeriodOutcome::ModeNotSelected => {
                self.reply(chat_id, messages::choose_mode_first()).await
            }
            PeriodOutcome::Ignored => Ok(()),
        }
    }

    async fn handle_callback(&self, cb: CallbackEvent) -> HandleResult {
        if let Err(e) = self.transport.answer_callback(&cb.id).await {
            warn!(callback_id = %cb.id, error = %e, "failed to answer callback");
        }

        let user = cb.from;
        // private chats share the user's id
        let chat_id = cb.chat_id.unwrap_or(user);

        match cb.data.as_deref() {
            Some(messages::CB_START_FREE) => self.select_mode(user, chat_id, Mode::Free).await,
            Some(messages::CB_START_VIP) => self.select_mode(user, chat_id, Mode::Vip).await,
            Some(messages::CB_BUY_VIP) => self.reply(chat_id, messages::buy_vip(&self.config)).await,
            Some(messages::CB_RESULT_WIN) => self.submit_result(user, chat_id, Outcome::Win).await,
            Some(messages::CB_RESULT_LOSS) => self.submit_result(user, chat_id, Outcome::Loss).await,
            other => {
                debug!(user_id = user, data = ?other, "unknown callback data");
                Ok(())
            }
        }
    }

    async fn select_mode(&self, user: UserId, chat_id: ChatId, mode: Mode) -> HandleResult {
        let reply = match self.sessions.select_mode(user, mode).await? {
            ModeOutcome::Started(mode) => messages::mode_started(mode),
            ModeOutcome::VipRequired => messages::vip_required(&self.config),
        };
        self.reply(chat_id, reply).await
    }

    async fn submit_result(&self, user: UserId, chat_id: ChatId, outcome: Outcome) -> HandleResult {
        match self.sessions.submit_result(user, outcome).await? {
            ResultOutcome::Applied(ladder) => {
                self.metrics.record_result();
                self.reply(chat_id, messages::ladder(ladder)).await
            }
            ResultOutcome::NotStarted | ResultOutcome::NotAwaitingResult => Ok(()),
        }
    }
}

/// Forward `msg` to every recipient in turn, then report back to the admin
async fn fan_out(
    transport: Arc<dyn Transport>,
    metrics: Arc<Metrics>,
    recipients: Vec<UserId>,
    msg: InboundMessage,
) {
    let mut delivered = 0;
    let mut failed = 0;

    for target in recipients {
        match transport.forward(target, &msg).await {
            Ok(()) => {
                delivered += 1;
                metrics.record_forward(true);
            }
            Err(e) => {
                failed += 1;
                metrics.record_forward(false);
                warn!(user_id = target, error = %e, "broadcast delivery failed");
            }
        }
    }

    info!(delivered, failed, "broadcast finished");
    let summary = messages::broadcast_done(delivered, failed);
    if let Err(e) = transport.send_message(msg.chat_id, &summary).await {
        warn!(chat_id = msg.chat_id, error = %e, "broadcast summary not delivered");
    }
}
