//! Event dispatch
//!
//! One [`App`] instance owns every piece of mutable state: the trigger
//! engine, the ledger, the scheduler and the runtime configuration. It is
//! driven by a single task that interleaves inbound chat events with the
//! scheduler tick, so none of the core state needs locking. Network calls
//! are the only suspension points.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, NaiveTime, Utc};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::commands::{self, AdminCommand, SchedulerAction};
use crate::config::BotConfig;
use crate::ledger::{
    OutputLocation, PredictionLedger, PredictionOrigin, PredictionRecord, PredictionStatus,
};
use crate::output;
use crate::parser;
use crate::rules::{Decision, TriggerEngine};
use crate::scheduler::Scheduler;
use crate::server::{SharedStatus, StatusSnapshot};
use crate::storage::{HistoryEntry, Storage};
use crate::telegram::{Gateway, IncomingMessage};
use crate::verify::{ConfirmationRule, Outcome, ThreeCardRule, VerificationEngine};

pub struct App<G: Gateway> {
    config: BotConfig,
    trigger: TriggerEngine,
    ledger: PredictionLedger,
    verifier: VerificationEngine,
    scheduler: Scheduler,
    gateway: G,
    storage: Storage,
    status: SharedStatus,
    started_at: DateTime<Utc>,
    archived_total: usize,
}

impl<G: Gateway> App<G> {
    pub fn new(mut config: BotConfig, gateway: G, storage: Storage, status: SharedStatus) -> Self {
        apply_stored_overrides(&mut config, &storage);
        Self::with_rule(config, gateway, storage, status, Box::new(ThreeCardRule))
    }

    /// Build with an explicit confirmation rule (the default is the
    /// three-card rule; property tests swap in their own).
    pub fn with_rule(
        config: BotConfig,
        gateway: G,
        storage: Storage,
        status: SharedStatus,
        rule: Box<dyn ConfirmationRule>,
    ) -> Self {
        let trigger = TriggerEngine::new(config.rules.watched_rank(), config.rules.cooldown_seconds);

        let mut scheduler = match storage.load_schedule() {
            Some(slots) => {
                info!(slots = slots.len(), "schedule loaded from storage");
                Scheduler::new(slots)
            }
            None => {
                let mut scheduler = Scheduler::new(Vec::new());
                scheduler.regenerate(&config.schedule);
                storage.save_schedule(scheduler.slots());
                scheduler
            }
        };

        let channels_ready =
            config.channels.stat_channel.is_some() && config.channels.display_channel.is_some();
        if config.schedule.auto_start && channels_ready {
            scheduler.start();
        } else if !channels_ready {
            warn!("channels not configured, scheduler idle until /set_stat and /set_display");
        }

        // Launched slots from a previous run keep verifying; their broadcast
        // locations are lost, so resolutions fall back to fresh messages.
        let now = Utc::now();
        let mut ledger = PredictionLedger::new();
        for game in scheduler.unreconciled_games() {
            let record = PredictionRecord::new(game, PredictionOrigin::Scheduled, now);
            if ledger.create(record).is_err() {
                debug!(game, "slot already tracked");
            }
        }

        let archived_total = storage.load_history().len();

        Self {
            config,
            trigger,
            ledger,
            verifier: VerificationEngine::new(rule),
            scheduler,
            gateway,
            storage,
            status,
            started_at: now,
            archived_total,
        }
    }

    /// Drive the bot until shutdown: chat events and scheduler ticks
    /// interleave on this single task.
    pub async fn run(mut self, mut rx: mpsc::Receiver<IncomingMessage>, running: Arc<AtomicBool>) {
        let mut tick = tokio::time::interval(Duration::from_secs(self.config.schedule.tick_seconds));
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        self.publish_status().await;
        info!("dispatch loop running");

        while running.load(Ordering::SeqCst) {
            tokio::select! {
                maybe = rx.recv() => match maybe {
                    Some(incoming) => self.on_message(incoming).await,
                    None => break,
                },
                _ = tick.tick() => self.on_tick().await,
            }
        }

        info!("dispatch loop stopped");
    }

    /// Route one inbound event. Edits re-enter the same path as new
    /// messages: the parsed content is what matters, not the event kind.
    pub async fn on_message(&mut self, incoming: IncomingMessage) {
        if incoming.is_private {
            if let Some(command) = commands::parse(&incoming.text) {
                self.handle_command(&incoming, command).await;
            }
            return;
        }

        match self.config.channels.stat_channel {
            Some(stat) if stat == incoming.channel_id => {
                debug!(
                    channel = incoming.channel_id,
                    is_edit = incoming.is_edit,
                    "processing result message"
                );
                self.process_stat_message(&incoming.text).await;
            }
            _ => debug!(channel = incoming.channel_id, "message from unwatched channel"),
        }
    }

    /// Parser → trigger rule → ledger → verification, in that order, for
    /// one piece of result text.
    pub async fn process_stat_message(&mut self, text: &str) {
        let Some(msg) = parser::parse(text) else {
            debug!("unparseable message skipped");
            return;
        };

        if msg.is_pending_edit {
            if self.trigger.buffer_pending_edit(msg.game_number) {
                debug!(game = msg.game_number, "result mid-edit, awaiting final version");
            }
            return;
        }
        if msg.is_final && self.trigger.finalize_pending_edit(msg.game_number) {
            debug!(game = msg.game_number, "buffered result finalized");
        }

        let now = Utc::now();
        if self.trigger_window_open(now) {
            match self.trigger.evaluate(&msg, now) {
                Decision::Fire { target } => {
                    self.fire_triggered(target, now).await;
                }
                Decision::Suppressed { target, remaining_secs } => {
                    info!(game = target, remaining_secs, "trigger suppressed by cooldown");
                }
                Decision::NoMatch => {}
            }
        }

        let outcomes = self.verifier.check(&msg, &mut self.ledger);
        for outcome in outcomes {
            self.report_outcome(outcome).await;
        }

        self.publish_status().await;
    }

    /// Scheduler heartbeat: at most one slot launches per tick, so a failed
    /// launch is naturally retried.
    pub async fn on_tick(&mut self) {
        if self.scheduler.is_running() {
            self.launch_due_slot(Local::now().time()).await;
        }
        self.publish_status().await;
    }

    fn trigger_window_open(&self, now: DateTime<Utc>) -> bool {
        let warmup = chrono::Duration::minutes(i64::from(self.config.rules.prediction_interval_minutes));
        now - self.started_at >= warmup
    }

    async fn fire_triggered(&mut self, target: u32, now: DateTime<Utc>) {
        if self.ledger.has_active(target) {
            warn!(game = target, "duplicate trigger dropped, earlier prediction stands");
            return;
        }

        let record = PredictionRecord::new(target, PredictionOrigin::Triggered, now);
        if let Err(e) = self.ledger.create(record) {
            warn!(game = target, error = %e, "could not create prediction");
            return;
        }
        // The fire succeeded: the cooldown clock advances even if the
        // broadcast below fails, because the record already exists.
        self.trigger.mark_fired(now);
        info!(game = target, "prediction fired");

        let text = output::prediction_text(target, PredictionStatus::Pending);
        if let Some(location) = self.broadcast(&text).await {
            self.ledger.record_location(target, location);
        }
    }

    async fn launch_due_slot(&mut self, now_time: NaiveTime) {
        let Some(slot) = self.scheduler.next_due(now_time) else {
            return;
        };
        let game = slot.game_number;

        if self.ledger.has_active(game) {
            debug!(game, "slot deferred, a prediction for this game is already active");
            return;
        }
        let Some(display) = self.config.channels.display_channel else {
            debug!("display channel not configured, slot launch deferred");
            return;
        };

        // Launch and the launched flag are one unit: the flag is only
        // written after the send succeeded.
        let text = output::prediction_text(game, PredictionStatus::Pending);
        match self.gateway.send(display, &text).await {
            Ok(message_id) => {
                let mut record = PredictionRecord::new(game, PredictionOrigin::Scheduled, Utc::now());
                record.output_locations.push(OutputLocation {
                    channel_id: display,
                    message_id,
                });
                if let Err(e) = self.ledger.create(record) {
                    warn!(game, error = %e, "scheduled prediction not tracked");
                }
                self.scheduler.mark_launched(game);
                self.storage.save_schedule(self.scheduler.slots());
                info!(game, "scheduled prediction launched");
            }
            Err(e) => {
                warn!(game, error = %e, "slot launch failed, retrying next tick");
            }
        }
    }

    /// Push a status transition out: edit the original broadcast (or fall
    /// back to a fresh message), reconcile the scheduler window, archive.
    async fn report_outcome(&mut self, outcome: Outcome) {
        let Some(record) = self.ledger.get(outcome.game_number).cloned() else {
            return;
        };
        let text = output::prediction_text(outcome.game_number, outcome.status);

        let mut edited = false;
        for location in &record.output_locations {
            match self
                .gateway
                .edit(location.channel_id, location.message_id, &text)
                .await
            {
                Ok(true) => edited = true,
                Ok(false) => warn!(game = outcome.game_number, "edit reported failure"),
                Err(e) => warn!(game = outcome.game_number, error = %e, "edit failed"),
            }
        }
        if !edited {
            warn!(game = outcome.game_number, "no edit went through, sending status as new message");
            self.broadcast(&text).await;
        }

        if record.origin == PredictionOrigin::Scheduled {
            let label = output::status_glyph(outcome.status);
            if self
                .scheduler
                .on_verified(outcome.game_number, label, &self.config.schedule)
            {
                self.storage.save_schedule(self.scheduler.slots());
            }
        }

        if let Some(terminal) = self.ledger.remove_terminal(outcome.game_number) {
            self.storage
                .append_history(HistoryEntry::from_record(&terminal, Utc::now()));
            self.archived_total += 1;
            info!(
                game = terminal.game_number,
                status = ?terminal.status,
                origin = ?terminal.origin,
                "prediction archived"
            );
        }
    }

    async fn broadcast(&self, text: &str) -> Option<OutputLocation> {
        let Some(display_channel) = self.config.channels.display_channel else {
            warn!("display channel not configured, broadcast skipped");
            return None;
        };
        match self.gateway.send(display_channel, text).await {
            Ok(message_id) => {
                info!(channel = display_channel, message_id, "broadcast: {}", text);
                Some(OutputLocation {
                    channel_id: display_channel,
                    message_id,
                })
            }
            Err(e) => {
                warn!(error = %e, "broadcast failed, prediction tracked without a message");
                None
            }
        }
    }

    // ========== ADMIN COMMANDS ==========

    async fn handle_command(&mut self, incoming: &IncomingMessage, command: AdminCommand) {
        let is_admin = incoming.sender_id == Some(self.config.telegram.admin_id)
            && self.config.telegram.admin_id != 0;

        if command == AdminCommand::Start {
            self.reply(incoming.channel_id, WELCOME_TEXT).await;
            return;
        }
        if !is_admin {
            debug!(sender = ?incoming.sender_id, "admin command from non-admin ignored");
            return;
        }

        match command {
            AdminCommand::Start => unreachable!("handled above"),
            AdminCommand::Status => {
                let text = self.status_text();
                self.reply(incoming.channel_id, &text).await;
            }
            AdminCommand::SetStat(id) => {
                self.config.channels.stat_channel = Some(id);
                self.storage.set_config("stat_channel", id);
                self.maybe_autostart_scheduler();
                self.reply(
                    incoming.channel_id,
                    &format!("Statistics channel configured: {}", id),
                )
                .await;
            }
            AdminCommand::SetDisplay(id) => {
                self.config.channels.display_channel = Some(id);
                self.storage.set_config("display_channel", id);
                self.maybe_autostart_scheduler();
                self.reply(
                    incoming.channel_id,
                    &format!("Display channel configured: {}", id),
                )
                .await;
            }
            AdminCommand::Cooldown(None) => {
                let text = format!(
                    "Usage: /cooldown <seconds> (0-1200)\nCurrent cooldown: {}s",
                    self.trigger.cooldown_seconds()
                );
                self.reply(incoming.channel_id, &text).await;
            }
            AdminCommand::Cooldown(Some(seconds)) => {
                if seconds > 1200 {
                    self.reply(incoming.channel_id, "Cooldown must be between 0 and 1200 seconds")
                        .await;
                    return;
                }
                self.config.rules.cooldown_seconds = seconds;
                self.trigger.set_cooldown_seconds(seconds);
                self.storage.set_config("cooldown_interval", seconds);
                self.reply(incoming.channel_id, &format!("Cooldown set to {}s", seconds))
                    .await;
            }
            AdminCommand::Interval(None) => {
                let text = format!(
                    "Usage: /intervalle <minutes> (1-60)\nCurrent interval: {}min",
                    self.config.rules.prediction_interval_minutes
                );
                self.reply(incoming.channel_id, &text).await;
            }
            AdminCommand::Interval(Some(minutes)) => {
                if !(1..=60).contains(&minutes) {
                    self.reply(incoming.channel_id, "Interval must be between 1 and 60 minutes")
                        .await;
                    return;
                }
                self.config.rules.prediction_interval_minutes = minutes;
                self.storage.set_config("prediction_interval", minutes);
                self.reply(incoming.channel_id, &format!("Interval set to {}min", minutes))
                    .await;
            }
            AdminCommand::Scheduler(action) => self.handle_scheduler_command(incoming, action).await,
            AdminCommand::Reset => {
                self.ledger.clear();
                self.storage.clear_history();
                self.archived_total = 0;
                self.reply(
                    incoming.channel_id,
                    "Data reset: pending predictions cleared, history emptied, configuration preserved",
                )
                .await;
                info!("data reset by admin");
            }
        }

        self.publish_status().await;
    }

    async fn handle_scheduler_command(&mut self, incoming: &IncomingMessage, action: SchedulerAction) {
        match action {
            SchedulerAction::Start => {
                let channels_ready = self.config.channels.stat_channel.is_some()
                    && self.config.channels.display_channel.is_some();
                let text = if !channels_ready {
                    "Configure channels first with /set_stat and /set_display".to_string()
                } else if self.scheduler.start() {
                    "Scheduler started".to_string()
                } else {
                    "Scheduler already running".to_string()
                };
                self.reply(incoming.channel_id, &text).await;
            }
            SchedulerAction::Stop => {
                let text = if self.scheduler.stop() {
                    "Scheduler stopped"
                } else {
                    "Scheduler is not running"
                };
                self.reply(incoming.channel_id, text).await;
            }
            SchedulerAction::Status => {
                let status = self.scheduler.status();
                let text = format!(
                    "Scheduler: {}\nSlots: {} total, {} launched, {} verified, {} pending\nNext launch: {}",
                    if self.scheduler.is_running() { "running" } else { "stopped" },
                    status.total,
                    status.launched,
                    status.verified,
                    status.pending,
                    status
                        .next_launch
                        .map(|t| t.format("%H:%M").to_string())
                        .unwrap_or_else(|| "none".to_string()),
                );
                self.reply(incoming.channel_id, &text).await;
            }
            SchedulerAction::Generate => {
                self.scheduler.regenerate(&self.config.schedule);
                self.storage.save_schedule(self.scheduler.slots());
                self.reply(incoming.channel_id, "Daily schedule regenerated").await;
            }
            SchedulerAction::Help => {
                self.reply(
                    incoming.channel_id,
                    "Usage: /scheduler start|stop|status|generate",
                )
                .await;
            }
        }
    }

    fn maybe_autostart_scheduler(&mut self) {
        if self.config.schedule.auto_start
            && self.config.channels.stat_channel.is_some()
            && self.config.channels.display_channel.is_some()
        {
            self.scheduler.start();
        }
    }

    fn status_text(&self) -> String {
        format!(
            "Bot status\n\
             Statistics channel: {}\n\
             Display channel: {}\n\
             Watched rank: {}\n\
             Cooldown: {}s\n\
             Prediction interval: {}min\n\
             Active predictions: {}\n\
             Archived predictions: {}\n\
             Pending edits buffered: {}\n\
             Scheduler: {}",
            fmt_channel(self.config.channels.stat_channel),
            fmt_channel(self.config.channels.display_channel),
            self.trigger.watched_rank().symbol(),
            self.trigger.cooldown_seconds(),
            self.config.rules.prediction_interval_minutes,
            self.ledger.active_count(),
            self.archived_total,
            self.trigger.pending_edit_count(),
            if self.scheduler.is_running() { "running" } else { "stopped" },
        )
    }

    async fn reply(&self, chat_id: i64, text: &str) {
        if let Err(e) = self.gateway.send(chat_id, text).await {
            warn!(chat_id, error = %e, "reply failed");
        }
    }

    async fn publish_status(&self) {
        let snapshot = StatusSnapshot {
            bot_online: true,
            stat_channel: self.config.channels.stat_channel,
            display_channel: self.config.channels.display_channel,
            predictions_active: self.ledger.active_count(),
            total_predictions: self.archived_total + self.ledger.len(),
            cooldown_interval: self.config.rules.cooldown_seconds,
            prediction_interval: self.config.rules.prediction_interval_minutes,
            scheduler_running: self.scheduler.is_running(),
        };
        *self.status.write().await = snapshot;
    }

    // Test-facing accessors: integration tests drive the dispatch path
    // directly instead of standing up the network stack.

    pub fn ledger(&self) -> &PredictionLedger {
        &self.ledger
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut Scheduler {
        &mut self.scheduler
    }

    pub async fn tick_at(&mut self, now_time: NaiveTime) {
        if self.scheduler.is_running() {
            self.launch_due_slot(now_time).await;
        }
        self.publish_status().await;
    }
}

fn fmt_channel(channel: Option<i64>) -> String {
    channel
        .map(|id| id.to_string())
        .unwrap_or_else(|| "not configured".to_string())
}

/// Persisted key/values are the bootstrap source of truth for channel ids
/// and intervals; the YAML config file only supplies defaults.
fn apply_stored_overrides(config: &mut BotConfig, storage: &Storage) {
    if let Some(id) = storage.get_config_parsed::<i64>("stat_channel") {
        config.channels.stat_channel = Some(id);
    }
    if let Some(id) = storage.get_config_parsed::<i64>("display_channel") {
        config.channels.display_channel = Some(id);
    }
    if let Some(seconds) = storage.get_config_parsed::<u32>("cooldown_interval") {
        config.rules.cooldown_seconds = seconds;
    }
    if let Some(minutes) = storage.get_config_parsed::<u32>("prediction_interval") {
        config.rules.prediction_interval_minutes = minutes;
    }
}

const WELCOME_TEXT: &str = "Card prediction bot\n\n\
    I watch a statistics channel for card results and broadcast predictions\n\
    with live status updates (⏳ → ✅/❌).\n\n\
    Setup:\n\
    1. Add me to your channels\n\
    2. /set_stat <id> - channel to watch\n\
    3. /set_display <id> - channel to broadcast to\n\n\
    Commands: /status, /cooldown, /intervalle, /scheduler, /reset";
