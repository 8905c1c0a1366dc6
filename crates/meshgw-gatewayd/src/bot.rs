//! The bot orchestrator (spec.md §2, §5): wires the RF correlator, the
//! message handler, the dispatcher, the transmission tracker, and the
//! persistence store onto the radio driver's event bus.
//!
//! One struct owns every subsystem behind `Arc`/lock-protected fields;
//! `run()` subscribes once to the driver's event bus and drains it
//! until shutdown, with outbound sends fanning channel-retry
//! echo-checks out into short-lived spawned tasks.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use chrono::Timelike;
use meshgw_net::contact::Contact;
use meshgw_net::event::{ChannelMsgRecv, ContactMsgRecv, NewContactEvent, RadioEvent};
use meshgw_net::transport::RadioDriver;

use crate::capture::CaptureTarget;
use crate::catalog::{AdvertObservation, Catalog};
use crate::commands::help::{general_help, targeted_help, CommandSummary};
use crate::commands::Command;
use crate::config::Config;
use crate::dispatch::{Dispatcher, GateOutcome, Matched};
use crate::message::{dm_path_label, elapsed_label, is_banned, split_channel_sender, MeshMessage, MessageHandler};
use crate::placeholders::{format_template, PlaceholderContext};
use crate::ratelimit::{AsyncFloor, Floor, PerUserLimiter};
use crate::rf_cache::{RfCache, RfEntry};
use crate::scheduler::{
    Feed, Service, ServiceSupervisor, ScheduledMessageTable, CACHE_SWEEP_INTERVAL, CHANNEL_OPS_POLL_INTERVAL,
    FEED_POLL_INTERVAL, SCHEDULED_MESSAGE_POLL_INTERVAL, SERVICE_HEALTH_POLL_INTERVAL,
};
use crate::store::Store;
use crate::topology::Topology;
use crate::tx_tracker::{ChannelRetryTracker, TxTracker};

fn now_unix() -> i64 {
    std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).map(|d| d.as_secs() as i64).unwrap_or(0)
}

/// Localized strings are a non-goal (spec.md §1); these are the
/// English fallbacks a missing translator degrades to (spec.md §7
/// "Translator missing").
fn translate(key: &str) -> String {
    match key {
        "sync_device_clock" => "Sync device clock".to_string(),
        other => other.to_string(),
    }
}

fn cooldown_reply(remaining_seconds: f64) -> String {
    format!("Please wait {:.0}s before trying that again.", remaining_seconds.ceil())
}

fn dm_only_reply() -> String {
    "That command only works in a direct message.".to_string()
}

fn access_denied_reply() -> String {
    "You don't have permission to run that command.".to_string()
}

fn no_internet_reply() -> String {
    "That command needs internet access, which isn't available right now.".to_string()
}

/// A stable identifier for one outbound send, independent of the RF
/// hash that later confirms it (spec.md §4.6 "Channel-message retry").
fn content_fingerprint(content: &str, timestamp: i64) -> String {
    blake3::hash(format!("{timestamp}:{content}").as_bytes()).to_hex().to_string()
}

/// Owns every runtime subsystem and drives the single main event loop
/// (spec.md §5 "Concurrency model").
pub struct Bot {
    config: Config,
    store: Arc<Store>,
    radio: Arc<dyn RadioDriver>,
    capture: Arc<dyn CaptureTarget>,
    rf_cache: Mutex<RfCache>,
    dispatcher: Dispatcher,
    message_handler: MessageHandler,
    tx_tracker: TxTracker,
    channel_retry: ChannelRetryTracker,
    send_limiter: Floor,
    bot_tx_limiter: AsyncFloor,
    per_user_limiter: PerUserLimiter,
    command_seq: AtomicU64,
    internet_reachable: AtomicBool,
    scheduled_messages: ScheduledMessageTable,
    service_supervisor: ServiceSupervisor,
    services: Mutex<Vec<Arc<dyn Service>>>,
    feeds: Mutex<Vec<Arc<dyn Feed>>>,
    last_advert_sent: Mutex<Option<Instant>>,
}

impl Bot {
    pub fn new(
        config: Config,
        store: Arc<Store>,
        radio: Arc<dyn RadioDriver>,
        capture: Arc<dyn CaptureTarget>,
        commands: Vec<Arc<dyn Command>>,
        connection_time: i64,
    ) -> Self {
        let keywords = config.keywords.clone();
        let dispatcher = Dispatcher::new(commands, keywords);
        let message_handler = MessageHandler::new(connection_time);
        let channel_retry = ChannelRetryTracker::new(
            Duration::from_secs_f64(config.bot.channel_retry_echo_window_seconds),
            config.bot.channel_retry_max_attempts,
        );
        let send_limiter = Floor::new(Duration::from_secs_f64(config.bot.rate_limit_seconds));
        let bot_tx_limiter = AsyncFloor::new(Duration::from_secs_f64(config.bot.bot_tx_rate_limit_seconds));
        let per_user_limiter = PerUserLimiter::new(Duration::from_secs_f64(config.bot.per_user_rate_limit_seconds));
        let scheduled_messages = ScheduledMessageTable::from_config(&config.scheduled_messages);
        Self {
            config,
            store,
            radio,
            capture,
            rf_cache: Mutex::new(RfCache::new()),
            dispatcher,
            message_handler,
            tx_tracker: TxTracker::new(),
            channel_retry,
            send_limiter,
            bot_tx_limiter,
            per_user_limiter,
            command_seq: AtomicU64::new(0),
            internet_reachable: AtomicBool::new(true),
            scheduled_messages,
            service_supervisor: ServiceSupervisor::new(),
            services: Mutex::new(Vec::new()),
            feeds: Mutex::new(Vec::new()),
            last_advert_sent: Mutex::new(None),
        }
    }

    pub fn set_internet_reachable(&self, reachable: bool) {
        self.internet_reachable.store(reachable, Ordering::SeqCst);
    }

    /// Register a service plugin for health-polled supervision (spec.md
    /// §4.9 "Service health"). Service plugin business logic itself is a
    /// named non-goal (spec.md §1); this only wires the health/restart
    /// loop around whatever the caller constructs.
    pub fn register_service(&self, service: Arc<dyn Service>) {
        self.services.lock().push(service);
    }

    /// Register a feed subscription polled at most once per
    /// [`FEED_POLL_INTERVAL`] (spec.md §4.9 "Feed polling"). Feed
    /// content itself is a named non-goal (spec.md §1).
    pub fn register_feed(&self, feed: Arc<dyn Feed>) {
        self.feeds.lock().push(feed);
    }

    fn next_command_id(&self) -> String {
        format!("cmd-{:x}", self.command_seq.fetch_add(1, Ordering::SeqCst))
    }

    fn resolve_channel_index(&self, channel: &str) -> Option<u8> {
        self.config
            .raw_sections
            .get("Channels_List")
            .and_then(|m| m.get(channel))
            .and_then(|v| v.trim().parse().ok())
    }

    /// The main run loop (spec.md §2, §5): subscribes once to the
    /// driver's event bus and processes events until `shutdown` fires.
    /// The scheduler/supervisor side of the daemon (cooldown queue,
    /// scheduled messages, interval adverts, service health, feed
    /// polling, channel-ops queue, cache sweeps) runs as sibling
    /// background tasks so none of them can stall inbound dispatch
    /// (spec.md §5 "the message never blocks indefinitely").
    pub async fn run(self: Arc<Self>, mut shutdown: tokio::sync::broadcast::Receiver<()>) {
        let mut events = self.radio.subscribe();
        let cooldown_worker = tokio::spawn(Arc::clone(&self).run_cooldown_queue_worker(shutdown.resubscribe()));
        let scheduler_worker = tokio::spawn(Arc::clone(&self).run_scheduler(shutdown.resubscribe()));

        loop {
            tokio::select! {
                event = events.recv() => {
                    match event {
                        Ok(event) => self.handle_event(event).await,
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    }
                }
                _ = shutdown.recv() => break,
            }
        }

        // Shutdown sequence (spec.md §5): stop the scheduler-side tasks
        // before the caller disconnects the radio and flushes the graph.
        cooldown_worker.abort();
        scheduler_worker.abort();
        let _ = cooldown_worker.await;
        let _ = scheduler_worker.await;
        let now = now_unix();
        if let Err(e) = Topology::new(&self.store).prune_stale(now) {
            tracing::warn!(error = %e, "mesh graph flush-on-shutdown prune failed");
        }
    }

    /// Polls the cooldown queue at 100 ms while entries are pending and
    /// 500 ms while idle (spec.md §4.4.2 "A background worker polls
    /// ready entries at 100 ms (active) / 500 ms (idle) granularity").
    async fn run_cooldown_queue_worker(self: Arc<Self>, mut shutdown: tokio::sync::broadcast::Receiver<()>) {
        loop {
            let delay =
                if self.dispatcher.queued_count() > 0 { Duration::from_millis(100) } else { Duration::from_millis(500) };
            tokio::select! {
                _ = tokio::time::sleep(delay) => self.drain_queued().await,
                _ = shutdown.recv() => break,
            }
        }
    }

    /// Drives every other timed subsystem named in spec.md §4.9 off one
    /// task: scheduled `[Scheduled_Messages]` sends, interval adverts,
    /// service-health-gated restarts, feed polling, the channel-ops
    /// queue, and the tx-tracker/mesh-graph cache sweep.
    async fn run_scheduler(self: Arc<Self>, mut shutdown: tokio::sync::broadcast::Receiver<()>) {
        let mut scheduled_tick = tokio::time::interval(SCHEDULED_MESSAGE_POLL_INTERVAL);
        let mut advert_tick = tokio::time::interval(Duration::from_secs(60));
        let mut service_tick = tokio::time::interval(SERVICE_HEALTH_POLL_INTERVAL);
        let mut feed_tick = tokio::time::interval(FEED_POLL_INTERVAL);
        let mut channel_ops_tick = tokio::time::interval(CHANNEL_OPS_POLL_INTERVAL);
        let mut sweep_tick = tokio::time::interval(CACHE_SWEEP_INTERVAL);

        loop {
            tokio::select! {
                _ = scheduled_tick.tick() => self.fire_scheduled_messages().await,
                _ = advert_tick.tick() => self.maybe_send_interval_advert().await,
                _ = service_tick.tick() => self.poll_service_health().await,
                _ = feed_tick.tick() => self.poll_feeds(),
                _ = channel_ops_tick.tick() => self.poll_channel_operations().await,
                _ = sweep_tick.tick() => self.sweep_caches(),
                _ = shutdown.recv() => break,
            }
        }
    }

    /// Fires any `[Scheduled_Messages]` entries due at the current
    /// wall-clock minute (spec.md §4.9 "Scheduled messages"), resolving
    /// the mesh-info placeholders against the live catalog.
    async fn fire_scheduled_messages(self: &Arc<Self>) {
        if self.scheduled_messages.is_empty() {
            return;
        }
        let local = chrono::Local::now();
        let due: Vec<(String, String)> = self
            .scheduled_messages
            .due_at(local.hour() as u8, local.minute() as u8)
            .into_iter()
            .map(|e| (e.channel.clone(), e.text.clone()))
            .collect();
        if due.is_empty() {
            return;
        }
        let counts = self.store.contact_counts(now_unix()).unwrap_or_default();
        let ctx = PlaceholderContext::for_scheduled(&counts);
        for (channel, text) in due {
            let rendered = format_template(&text, &ctx);
            let command_id = self.next_command_id();
            self.send_chan_msg_by_name(&channel, &rendered, &command_id).await;
        }
    }

    /// Sends a flood advert once `advert_interval_hours` has elapsed
    /// since the last one (spec.md §4.9 "Interval adverts"). A
    /// zero-or-negative interval disables this entirely.
    async fn maybe_send_interval_advert(self: &Arc<Self>) {
        if self.config.bot.advert_interval_hours <= 0.0 {
            return;
        }
        let interval = Duration::from_secs_f64(self.config.bot.advert_interval_hours * 3600.0);
        let now = Instant::now();
        {
            let mut last = self.last_advert_sent.lock();
            if last.is_some_and(|t| now.duration_since(t) < interval) {
                return;
            }
            *last = Some(now);
        }
        if let Err(e) = self.radio.send_advert(true).await {
            tracing::warn!(error = %e, "interval advert send failed");
        }
    }

    /// Polls registered service plugins' health and restarts any that
    /// are unhealthy and past their backoff window, concurrently so one
    /// slow restart never blocks another (spec.md §4.9 "Service
    /// health").
    async fn poll_service_health(self: &Arc<Self>) {
        let services = self.services.lock().clone();
        if services.is_empty() {
            return;
        }
        let due = self.service_supervisor.due_for_restart(&services, Instant::now());
        for service in due {
            tokio::spawn(async move {
                if let Err(e) = service.stop().await {
                    tracing::warn!(service = service.name(), error = %e, "service stop failed during restart");
                }
                if let Err(e) = service.start().await {
                    tracing::warn!(service = service.name(), error = %e, "service restart failed");
                }
            });
        }
    }

    /// Polls every registered feed at most once per [`FEED_POLL_INTERVAL`]
    /// (spec.md §4.9 "Feed polling"); each feed decides internally
    /// whether it is actually due.
    fn poll_feeds(self: &Arc<Self>) {
        let now = Instant::now();
        for feed in self.feeds.lock().iter() {
            feed.poll_if_due(now);
        }
    }

    /// Executes pending `channel_operations` rows against the device
    /// (spec.md §4.9 "Channel ops queue"). The radio driver interface
    /// (spec.md §1) names no channel add/remove command — only the
    /// message/advert/time/contact surface — so every entry is marked
    /// failed with that reason rather than silently left pending
    /// forever.
    async fn poll_channel_operations(self: &Arc<Self>) {
        let pending = match self.store.pending_channel_operations() {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(error = %e, "failed to read pending channel operations");
                return;
            }
        };
        for (id, op) in pending {
            let result = format!(
                "radio driver exposes no channel {} command (spec.md §1 non-goal surface)",
                op.kind
            );
            if let Err(e) = self.store.complete_channel_operation(id, false, &result) {
                tracing::warn!(error = %e, operation_id = id, "failed to record channel operation result");
            }
        }
    }

    /// The periodic cache sweep (spec.md §5 "Cache sweep period: 60s"):
    /// garbage-collects stale transmission records and prunes mesh-graph
    /// edges outside the topology recency window.
    fn sweep_caches(self: &Arc<Self>) {
        self.tx_tracker.gc(Instant::now());
        if let Err(e) = Topology::new(&self.store).prune_stale(now_unix()) {
            tracing::warn!(error = %e, "mesh graph prune sweep failed");
        }
    }

    async fn handle_event(self: &Arc<Self>, event: RadioEvent) {
        match event {
            RadioEvent::RxLogData(entry) => {
                let now = Instant::now();
                self.rf_cache.lock().insert(RfEntry::from_log(&entry, now), now);
            }
            RadioEvent::ContactMsgRecv(evt) => self.handle_contact_message(evt).await,
            RadioEvent::ChannelMsgRecv(evt) => self.handle_channel_message(evt).await,
            RadioEvent::NewContact(evt) => self.handle_new_contact(evt).await,
            RadioEvent::RawData { raw_hex } => self.handle_raw_data(&raw_hex).await,
        }
    }

    async fn handle_contact_message(self: &Arc<Self>, evt: ContactMsgRecv) {
        let now_u = now_unix();
        if self.message_handler.is_stale(evt.sender_timestamp, now_u) {
            return;
        }
        let _ = self.store.record_message_stat(&evt.sender_name, now_u, true, None);
        if is_banned(&evt.sender_name, &self.config.banned_users) {
            return;
        }
        if !self.config.bot.respond_to_dms {
            return;
        }

        let now = Instant::now();
        let pubkey_prefix = evt.sender_pubkey.as_ref().map(|pk| pk.prefix());
        let rf = self.rf_cache.lock().correlate(None, pubkey_prefix.as_deref(), now).cloned();
        let contact = evt.sender_pubkey.as_ref().and_then(|pk| self.radio.contacts().read().get(pk).cloned());
        let path = dm_path_label(contact.as_ref());
        let elapsed = elapsed_label(evt.sender_timestamp, now_u, translate);

        let msg = MeshMessage {
            content: evt.content.trim_end().to_string(),
            sender_id: evt.sender_name,
            sender_pubkey: evt.sender_pubkey,
            channel: None,
            is_dm: true,
            timestamp: evt.sender_timestamp,
            snr: rf.as_ref().map(|e| e.snr),
            rssi: rf.as_ref().map(|e| e.rssi),
            hops: None,
            path,
            elapsed,
        };
        self.dispatch_message(msg).await;
    }

    async fn handle_channel_message(self: &Arc<Self>, evt: ChannelMsgRecv) {
        let now_u = now_unix();
        if self.message_handler.is_stale(evt.sender_timestamp, now_u) {
            return;
        }
        let (sender, content) = split_channel_sender(&evt.content);
        let sender_id = sender.unwrap_or_else(|| "unknown".to_string());
        let _ = self.store.record_message_stat(&sender_id, now_u, false, Some(&evt.channel));
        if is_banned(&sender_id, &self.config.banned_users) {
            return;
        }

        let overrides: Vec<&str> =
            self.dispatcher.commands().iter().filter(|c| c.is_channel_allowed(&evt.channel)).map(|_| evt.channel.as_str()).collect();
        if !self.message_handler.channel_allowed(&evt.channel, &self.config.channels.monitor_channels, &overrides) {
            return;
        }

        let now = Instant::now();
        let packet_prefix: String = evt.raw_hex.chars().take(32).collect();
        let rf = self.rf_cache.lock().correlate(Some(&packet_prefix), None, now).cloned();
        if let Some(entry) = &rf {
            if let Some(hash) = &entry.packet_hash {
                self.tx_tracker.confirm(hash, now_u, entry.pubkey_prefix.as_deref(), now);
            }
        }
        let elapsed = elapsed_label(evt.sender_timestamp, now_u, translate);

        let msg = MeshMessage {
            content,
            sender_id: sender_id.clone(),
            sender_pubkey: None,
            channel: Some(evt.channel.clone()),
            is_dm: false,
            timestamp: evt.sender_timestamp,
            snr: rf.as_ref().map(|e| e.snr),
            rssi: rf.as_ref().map(|e| e.rssi),
            hops: None,
            path: String::new(),
            elapsed,
        };
        self.dispatch_message(msg).await;
    }

    async fn handle_new_contact(self: &Arc<Self>, evt: NewContactEvent) {
        let now_u = now_unix();
        let catalog = Catalog::new(&self.store);
        let _ = catalog.observe_advert(&AdvertObservation {
            public_key: &evt.public_key.0,
            name: &evt.name,
            kind: meshgw_core::AdvertKind::Chat,
            timestamp: now_u,
            latitude: None,
            longitude: None,
        });
        if catalog.should_auto_add_to_device(self.config.bot.auto_manage_contacts) {
            let contact = Contact { public_key: evt.public_key, name: evt.name, out_path: Vec::new(), out_path_len: 255 };
            let _ = self.radio.add_contact(contact).await;
        }
    }

    /// Decode an undecoded RF frame (spec.md §4.1) and feed adverts,
    /// flood-message paths, and TRACE routing paths into the catalog,
    /// topology learner, and transmission tracker (spec.md §4.7 names
    /// all three as mesh-graph edge inputs).
    async fn handle_raw_data(self: &Arc<Self>, raw_hex: &str) {
        let Some(packet) = meshgw_core::decode(raw_hex, None) else { return };
        let now_u = now_unix();
        let now = Instant::now();

        match packet.payload_type {
            meshgw_core::PayloadType::Advert => {
                if let Ok(advert) = meshgw_core::advert::parse(&packet.payload_bytes) {
                    // Catalog ingestion and topology learning happen for
                    // every advert heard; only upload is gated on
                    // signature validity (spec.md §3.3 "in-mesh ingestion
                    // records even unverifiable adverts but does not
                    // upload them").
                    let public_key_hex = hex::encode(advert.public_key);
                    let catalog = Catalog::new(&self.store);
                    let _ = catalog.observe_advert(&AdvertObservation {
                        public_key: &public_key_hex,
                        name: advert.name.as_deref().unwrap_or("unknown"),
                        kind: advert.kind,
                        timestamp: now_u,
                        latitude: advert.lat,
                        longitude: advert.lon,
                    });

                    if !packet.path.nodes.is_empty() {
                        let advertiser_prefix = public_key_hex[..2].to_string();
                        let topology = Topology::new(&self.store);
                        let full_path: Vec<String> =
                            std::iter::once(advertiser_prefix).chain(packet.path.nodes.iter().cloned()).collect();
                        let _ = topology.observe_path(&full_path, now_u);
                        let _ = topology.record_observed_path(Some(&public_key_hex), &packet.path.nodes, "advert", now_u);
                    }

                    if advert.signature_valid {
                        self.capture.send_mesh_node_update(
                            &serde_json::json!({"public_key": public_key_hex, "kind": format!("{:?}", advert.kind)}).to_string(),
                        );
                    } else {
                        tracing::warn!("ingesting advert with invalid signature (catalog only, not uploaded)");
                    }
                }
            }
            meshgw_core::PayloadType::TxtMsg | meshgw_core::PayloadType::GrpTxt | meshgw_core::PayloadType::GrpData => {
                // Only a flooded packet's path is a historical route
                // worth learning from; a direct packet's path is a
                // routing instruction, not an observation (spec.md §4.3
                // "Direct vs. flood semantics").
                if packet.path.kind == Some(meshgw_core::PathKind::HistoricalRoute) && packet.path.nodes.len() >= 2 {
                    let topology = Topology::new(&self.store);
                    let _ = topology.observe_path(&packet.path.nodes, now_u);
                    let _ = topology.record_observed_path(None, &packet.path.nodes, "message", now_u);
                }
            }
            meshgw_core::PayloadType::Trace => {
                if !packet.path_hashes.is_empty() {
                    let topology = Topology::new(&self.store);
                    let _ = topology.observe_path(&packet.path_hashes, now_u);
                    let _ = topology.record_observed_path(None, &packet.path_hashes, "trace", now_u);
                    self.capture.capture_packet_routing(&serde_json::json!({"path": packet.path_hashes}).to_string());
                }
                let hash = meshgw_core::decode::hash_for(packet.payload_type, raw_hex, None).to_hex();
                let last_hop = packet.path_hashes.last().cloned();
                self.tx_tracker.confirm(&hash, now_u, last_hop.as_deref(), now);
            }
            _ => {}
        }

        let packet_json =
            serde_json::json!({"route_type": format!("{:?}", packet.route_type), "payload_type": format!("{:?}", packet.payload_type)})
                .to_string();
        let hash = meshgw_core::decode::hash_for(packet.payload_type, raw_hex, None).to_hex();
        self.capture.capture_full_packet_data(&packet_json, raw_hex, &hash);
    }

    /// Resolve a normalized message against the dispatcher and act on
    /// whatever it matched (spec.md §4.4).
    async fn dispatch_message(self: &Arc<Self>, msg: MeshMessage) {
        let Some(matched) = self.dispatcher.match_message(&msg, &self.config.bot.command_prefix, &self.config.channels.channel_keywords)
        else {
            return;
        };
        let now = Instant::now();

        match matched {
            Matched::Help(target) => {
                let summaries = self.command_summaries();
                let popularity = self.store.command_popularity().unwrap_or_default();
                let text = match target {
                    None => general_help(&summaries, &popularity),
                    Some(name) => {
                        let commands = self.dispatcher.commands();
                        targeted_help(&summaries, &name, |n| commands.iter().find(|c| c.name() == n).map(|c| c.get_help_text()))
                    }
                };
                let command_id = self.next_command_id();
                self.capture.capture_command(&msg, "help", &text, true, &command_id);
                self.reply(&msg, &text, &command_id).await;
            }
            Matched::Keyword(template) => {
                let ctx = PlaceholderContext::for_message(&msg);
                let text = format_template(&template, &ctx);
                let command_id = self.next_command_id();
                self.capture.capture_command(&msg, "keyword", &text, true, &command_id);
                self.reply(&msg, &text, &command_id).await;
            }
            Matched::Plugin(cmd) => self.dispatch_plugin(cmd, msg, now).await,
        }
    }

    fn command_summaries(&self) -> Vec<CommandSummary> {
        self.dispatcher
            .commands()
            .iter()
            .map(|c| CommandSummary {
                name: c.name().to_string(),
                short_description: c.short_description().unwrap_or_else(|| c.description()).to_string(),
                category: c.category().to_string(),
                usage: c.usage().map(str::to_string),
            })
            .collect()
    }

    async fn dispatch_plugin(self: &Arc<Self>, cmd: Arc<dyn Command>, msg: MeshMessage, now: Instant) {
        let outcome =
            self.dispatcher.evaluate_gates(cmd.as_ref(), &msg, &self.config.admin_acl.admin_pubkeys, self.internet_reachable.load(Ordering::SeqCst), now);

        match outcome {
            GateOutcome::Proceed => {
                let success = cmd.execute(&msg).await;
                let user_id = if msg.is_dm { Some(msg.sender_id.as_str()) } else { None };
                cmd.cooldown().record(user_id, now);
                let _ = self.store.record_command_stat(cmd.name(), &msg.sender_id, now_unix(), msg.is_dm);
                let command_id = self.next_command_id();
                match cmd.get_response_format(&msg) {
                    Some(text) => {
                        self.capture.capture_command(&msg, cmd.name(), &text, success, &command_id);
                        self.reply(&msg, &text, &command_id).await;
                    }
                    None => self.capture.capture_command(&msg, cmd.name(), "", success, &command_id),
                }
            }
            GateOutcome::Queued => {
                let user_key =
                    if msg.is_dm { msg.sender_id.clone() } else { format!("chan:{}", msg.channel.clone().unwrap_or_default()) };
                self.dispatcher.try_enqueue(
                    cmd.name(),
                    &user_key,
                    msg,
                    now,
                    Duration::from_secs_f64(cmd.get_queue_threshold_seconds()),
                );
            }
            GateOutcome::CooldownReply { remaining_seconds } => {
                let text = cooldown_reply(remaining_seconds);
                let command_id = self.next_command_id();
                self.capture.capture_command(&msg, cmd.name(), &text, false, &command_id);
                self.reply(&msg, &text, &command_id).await;
            }
            GateOutcome::DmOnlyReply => {
                let command_id = self.next_command_id();
                self.reply(&msg, &dm_only_reply(), &command_id).await;
            }
            GateOutcome::AccessDenied => {
                let command_id = self.next_command_id();
                self.reply(&msg, &access_denied_reply(), &command_id).await;
            }
            GateOutcome::NoInternet => {
                let command_id = self.next_command_id();
                self.reply(&msg, &no_internet_reply(), &command_id).await;
            }
            GateOutcome::Ignored => {}
        }
    }

    /// Drain cooldown-queued entries whose deferral window has elapsed
    /// and re-run them bypassing further cooldown checks (spec.md
    /// §4.4.2). Intended to be polled by the scheduler loop.
    pub async fn drain_queued(self: &Arc<Self>) {
        for (command_name, msg) in self.dispatcher.drain_ready(Instant::now()) {
            let Some(cmd) = self.dispatcher.commands().iter().find(|c| c.name() == command_name).cloned() else { continue };
            let success = cmd.execute(&msg).await;
            let command_id = self.next_command_id();
            if let Some(text) = cmd.get_response_format(&msg) {
                self.capture.capture_command(&msg, cmd.name(), &text, success, &command_id);
                self.reply(&msg, &text, &command_id).await;
            }
        }
    }

    async fn reply(self: &Arc<Self>, msg: &MeshMessage, text: &str, command_id: &str) {
        if msg.is_dm {
            self.send_dm(&msg.sender_id, text, command_id).await;
        } else if let Some(channel) = msg.channel.clone() {
            self.send_chan_msg_by_name(&channel, text, command_id).await;
        }
    }

    async fn send_dm(self: &Arc<Self>, recipient_name: &str, content: &str, _command_id: &str) -> bool {
        let now = Instant::now();
        if !self.send_limiter.try_acquire(now) {
            tracing::debug!(recipient = recipient_name, "global send limiter rejected DM");
            return false;
        }
        if !self.per_user_limiter.try_acquire(recipient_name, now) {
            tracing::debug!(recipient = recipient_name, "per-user limiter rejected DM");
            return false;
        }
        self.bot_tx_limiter.wait_turn().await;
        if self.config.bot.tx_delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.config.bot.tx_delay_ms)).await;
        }

        let contact = self.radio.contacts().read().get_by_name(recipient_name).cloned();
        let Some(contact) = contact else {
            tracing::warn!(recipient = recipient_name, "cannot DM an unknown contact");
            return false;
        };

        match self
            .radio
            .send_msg_with_retry(
                &contact.public_key,
                content,
                self.config.bot.max_send_attempts,
                self.config.bot.max_flood_attempts,
                self.config.bot.flood_after_attempts,
            )
            .await
        {
            Ok(outcome) => {
                if outcome.success {
                    let fingerprint = content_fingerprint(content, now_unix());
                    self.tx_tracker.record_sent(fingerprint, None, content.to_string(), now_unix(), now);
                }
                outcome.success
            }
            Err(e) => {
                tracing::warn!(error = %e, recipient = recipient_name, "DM send failed");
                false
            }
        }
    }

    async fn send_chan_msg_by_name(self: &Arc<Self>, channel: &str, content: &str, _command_id: &str) -> bool {
        let Some(index) = self.resolve_channel_index(channel) else {
            tracing::warn!(channel, "unknown channel index, dropping send");
            return false;
        };
        let now = Instant::now();
        if !self.send_limiter.try_acquire(now) {
            return false;
        }
        self.bot_tx_limiter.wait_turn().await;
        if self.config.bot.tx_delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.config.bot.tx_delay_ms)).await;
        }

        let sent = self.radio.send_chan_msg(index, content).await.unwrap_or(false);
        if sent {
            let fingerprint = content_fingerprint(content, now_unix());
            self.tx_tracker.record_sent(fingerprint.clone(), Some(channel.to_string()), content.to_string(), now_unix(), now);
            if self.config.bot.channel_retry_enabled {
                self.channel_retry.record_send(fingerprint.clone(), now);
                let bot = Arc::clone(self);
                let channel = channel.to_string();
                let content = content.to_string();
                tokio::spawn(async move { bot.run_channel_echo_check(fingerprint, channel, content).await });
            }
        }
        sent
    }

    /// Background echo-check loop (spec.md §4.6 "Channel-message
    /// retry"): sleeps out the echo window, then resends if the
    /// message never echoed back over RF, until attempts are exhausted.
    async fn run_channel_echo_check(self: Arc<Self>, fingerprint: String, channel: String, content: String) {
        loop {
            tokio::time::sleep(Duration::from_secs_f64(self.config.bot.channel_retry_echo_window_seconds)).await;
            if self.tx_tracker.is_confirmed_by_fingerprint(&fingerprint) || self.tx_tracker.repeat_count_by_fingerprint(&fingerprint) >= 1
            {
                self.channel_retry.observe_echo(&fingerprint);
                return;
            }
            let due = self.channel_retry.due_for_retry(Instant::now());
            if !due.contains(&fingerprint) {
                return;
            }
            let Some(index) = self.resolve_channel_index(&channel) else { return };
            let _ = self.radio.send_chan_msg(index, &content).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::ping::PingCommand;
    use crate::config::{BotConfig, ChannelsConfig, Config};
    use meshgw_net::contact::{Contact, PublicKey};
    use meshgw_net::transport::fake::FakeRadio;

    fn base_config() -> Config {
        Config {
            path: "/dev/null".into(),
            connection: Default::default(),
            bot: BotConfig::default(),
            channels: ChannelsConfig::default(),
            admin_acl: Default::default(),
            banned_users: Vec::new(),
            localization: Default::default(),
            keywords: HashMap::new(),
            scheduled_messages: HashMap::new(),
            logging: Default::default(),
            plugin_overrides: HashMap::new(),
            companion_purge: Default::default(),
            raw_sections: HashMap::new(),
        }
    }

    fn bot_with(config: Config, radio: Arc<FakeRadio>) -> (Arc<Bot>, Arc<FakeRadio>) {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let capture = Arc::new(crate::capture::NullCaptureTarget);
        let commands: Vec<Arc<dyn Command>> = vec![Arc::new(PingCommand::new())];
        let bot = Arc::new(Bot::new(config, store, radio.clone(), capture, commands, 0));
        (bot, radio)
    }

    #[tokio::test]
    async fn ping_dm_replies_pong() {
        let radio = Arc::new(FakeRadio::new());
        let pk = PublicKey("aa".repeat(32));
        radio
            .add_contact(Contact { public_key: pk.clone(), name: "Alice".to_string(), out_path: Vec::new(), out_path_len: 0 })
            .await
            .unwrap();

        let (bot, radio) = bot_with(base_config(), radio);
        bot.handle_event(RadioEvent::ContactMsgRecv(ContactMsgRecv {
            sender_name: "Alice".to_string(),
            sender_pubkey: Some(pk),
            content: "!ping".to_string(),
            sender_timestamp: 1000,
            raw_hex: None,
        }))
        .await;

        let sent = radio.sent_dms.read();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1, "Pong!");
    }

    #[tokio::test]
    async fn prefixed_ping_in_monitored_channel_replies() {
        let mut config = base_config();
        config.bot.command_prefix = ".".to_string();
        config.channels.monitor_channels = vec!["general".to_string()];

        let radio = Arc::new(FakeRadio::new());
        let (bot, radio) = bot_with(config, radio);
        bot.handle_event(RadioEvent::ChannelMsgRecv(ChannelMsgRecv {
            channel: "general".to_string(),
            content: "Bob: .ping".to_string(),
            sender_timestamp: 1000,
            raw_hex: "deadbeef".to_string(),
            payload_hex: None,
        }))
        .await;

        let sent = radio.sent_channel.read();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1, "Pong!");
    }

    #[tokio::test]
    async fn unmonitored_channel_is_silently_ignored() {
        let mut config = base_config();
        config.bot.command_prefix = ".".to_string();
        config.channels.monitor_channels = vec!["other".to_string()];

        let radio = Arc::new(FakeRadio::new());
        let (bot, radio) = bot_with(config, radio);
        bot.handle_event(RadioEvent::ChannelMsgRecv(ChannelMsgRecv {
            channel: "general".to_string(),
            content: ".ping".to_string(),
            sender_timestamp: 1000,
            raw_hex: "deadbeef".to_string(),
            payload_hex: None,
        }))
        .await;

        assert!(radio.sent_channel.read().is_empty());
    }

    #[tokio::test]
    async fn banned_user_dm_never_reaches_dispatch() {
        let mut config = base_config();
        config.banned_users = vec!["Eve".to_string()];
        let radio = Arc::new(FakeRadio::new());
        let pk = PublicKey("bb".repeat(32));
        radio.add_contact(Contact { public_key: pk.clone(), name: "Eve".to_string(), out_path: Vec::new(), out_path_len: 0 }).await.unwrap();

        let (bot, radio) = bot_with(config, radio);
        bot.handle_event(RadioEvent::ContactMsgRecv(ContactMsgRecv {
            sender_name: "Eve".to_string(),
            sender_pubkey: Some(pk),
            content: "!ping".to_string(),
            sender_timestamp: 1000,
            raw_hex: None,
        }))
        .await;

        assert!(radio.sent_dms.read().is_empty());
    }

    #[tokio::test]
    async fn fire_scheduled_messages_sends_due_entry_to_its_channel() {
        // The table fires by the current wall-clock minute, so the
        // fixture's `HHMM` key is computed from `chrono::Local::now()`
        // rather than a fixed constant — the test still runs instantly
        // since `fire_scheduled_messages` is called directly, not via
        // the 20s-polling background task.
        let now = chrono::Local::now();
        let hhmm = format!("{:02}{:02}", now.hour(), now.minute());

        let mut config = base_config();
        config.scheduled_messages.insert(hhmm, "general:{total_contacts} nodes known".to_string());
        let mut channels_list = HashMap::new();
        channels_list.insert("general".to_string(), "3".to_string());
        config.raw_sections.insert("Channels_List".to_string(), channels_list);

        let radio = Arc::new(FakeRadio::new());
        let (bot, radio) = bot_with(config, radio);

        bot.fire_scheduled_messages().await;
        let sent = radio.sent_channel.read();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, 3);
        assert_eq!(sent[0].1, "0 nodes known");
    }

    #[tokio::test]
    async fn interval_advert_fires_once_then_waits_out_the_interval() {
        let mut config = base_config();
        config.bot.advert_interval_hours = 100.0;
        let radio = Arc::new(FakeRadio::new());
        let (bot, _radio) = bot_with(config, radio);

        bot.maybe_send_interval_advert().await;
        bot.maybe_send_interval_advert().await;
        // second call within the interval is a no-op; asserting via the
        // internal timestamp since FakeRadio::send_advert always succeeds
        // regardless of call count, so we check the gate directly.
        assert!(bot.last_advert_sent.lock().is_some());
    }

    #[tokio::test]
    async fn unsigned_advert_is_catalogued_and_learns_an_edge_but_is_not_uploaded() {
        let radio = Arc::new(FakeRadio::new());
        let (bot, _radio) = bot_with(base_config(), radio);

        // header(ver=0, type=ADVERT=4, route=FLOOD=1), path_len=1, path="aa",
        // payload = pubkey(32, all 0xbb) + timestamp(4, LE) + signature(64,
        // all zero - does not verify) + flags(1, REPEATER=2, no extra fields).
        let header_byte = (4u8 << 2) | 1u8;
        let pubkey_hex = "bb".repeat(32);
        let hex = format!("{header_byte:02x}01aa{pubkey_hex}00000000{}02", "00".repeat(64));

        bot.handle_event(RadioEvent::RawData { raw_hex: hex }).await;

        let row = bot.store.get_contact(&pubkey_hex).unwrap();
        assert_eq!(row.map(|r| r.role), Some("repeater".to_string()));
        // advertiser (prefix "bb") -> first hop ("aa") edge is learned
        // even though the signature never verified (spec.md §3.3 "in-mesh
        // ingestion records even unverifiable adverts but does not upload
        // them" — upload is the only thing signature validity gates).
        assert!(bot.store.get_edge("bb", "aa").unwrap().is_some());
    }

    #[tokio::test]
    async fn poll_channel_operations_marks_pending_rows_failed() {
        let radio = Arc::new(FakeRadio::new());
        let (bot, _radio) = bot_with(base_config(), radio);
        bot.store
            .enqueue_channel_operation(&crate::store::ChannelOperation {
                kind: "add".to_string(),
                channel_idx: None,
                channel_name: "new-channel".to_string(),
                channel_key_hex: None,
            })
            .unwrap();

        bot.poll_channel_operations().await;

        let pending = bot.store.pending_channel_operations().unwrap();
        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn poll_service_health_restarts_unhealthy_registered_service() {
        use crate::scheduler::Service;
        use std::sync::atomic::{AtomicBool, AtomicU32};

        struct FlakyService {
            healthy: AtomicBool,
            starts: AtomicU32,
        }

        #[async_trait::async_trait]
        impl Service for FlakyService {
            fn name(&self) -> &str {
                "flaky"
            }
            async fn start(&self) -> Result<(), anyhow::Error> {
                self.starts.fetch_add(1, Ordering::SeqCst);
                self.healthy.store(true, Ordering::SeqCst);
                Ok(())
            }
            async fn stop(&self) -> Result<(), anyhow::Error> {
                Ok(())
            }
            fn is_healthy(&self) -> bool {
                self.healthy.load(Ordering::SeqCst)
            }
        }

        let radio = Arc::new(FakeRadio::new());
        let (bot, _radio) = bot_with(base_config(), radio);
        let service = Arc::new(FlakyService { healthy: AtomicBool::new(false), starts: AtomicU32::new(0) });
        bot.register_service(service.clone());

        bot.poll_service_health().await;
        // restart is spawned onto its own task; give it a turn to run.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(service.healthy.load(Ordering::SeqCst));
        assert_eq!(service.starts.load(Ordering::SeqCst), 1);
    }
}
