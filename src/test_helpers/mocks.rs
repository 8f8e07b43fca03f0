use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;

use crate::database::MappingStore;
use crate::error::{MirrorError, Result};
use crate::fetch::FetchError;
use crate::models::{
    is_placeholder, ChannelMapping, NewChannelMapping, NewRoleMapping, RoleMapping,
};
use crate::platform::{
    ConnectedSession, EventTransport, MirrorGateway, MirrorRoom, NewMirrorRoom, SourceChannel,
    SourceMessage, SourcePlatform, SourceWorkspace, TransportEvent, TransportFactory,
};
use crate::services::{
    AutoRecoveryService, MessageProcessor, Notifier, NotifyReason, ProcessedMessageIndex,
};

/// In-memory mapping store with the same merge-upsert semantics as the
/// PostgreSQL backend
#[derive(Debug, Default)]
pub struct MemoryMappingStore {
    channels: Mutex<HashMap<(String, String), ChannelMapping>>,
    roles: Mutex<HashMap<(String, String), RoleMapping>>,
}

impl MemoryMappingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn channel_count(&self) -> usize {
        self.channels.lock().len()
    }

    pub fn seed_channel(&self, mapping: ChannelMapping) {
        self.channels.lock().insert(
            (mapping.source_id.clone(), mapping.source_workspace_id.clone()),
            mapping,
        );
    }
}

#[async_trait]
impl MappingStore for MemoryMappingStore {
    async fn find_channel(
        &self,
        source_id: &str,
        source_workspace_id: &str,
    ) -> Result<Option<ChannelMapping>> {
        Ok(self
            .channels
            .lock()
            .get(&(source_id.to_string(), source_workspace_id.to_string()))
            .cloned())
    }

    async fn channels_for_workspace(
        &self,
        source_workspace_id: &str,
    ) -> Result<Vec<ChannelMapping>> {
        Ok(self
            .channels
            .lock()
            .values()
            .filter(|m| m.source_workspace_id == source_workspace_id)
            .cloned()
            .collect())
    }

    async fn upsert_channel(&self, new: NewChannelMapping) -> Result<ChannelMapping> {
        let mut channels = self.channels.lock();
        let key = (new.source_id.clone(), new.source_workspace_id.clone());
        let mapping = match channels.get_mut(&key) {
            Some(existing) => {
                // A placeholder never overwrites a resolved id
                if !is_placeholder(&new.mirror_id) {
                    existing.mirror_id = new.mirror_id;
                }
                existing.name = new.name;
                existing.kind_code = new.kind_code;
                if new.category_id.is_some() {
                    existing.category_id = new.category_id;
                }
                existing.last_synced = Utc::now();
                existing.clone()
            }
            None => {
                let mapping = ChannelMapping {
                    mirror_id: new.mirror_id,
                    source_id: new.source_id,
                    source_workspace_id: new.source_workspace_id,
                    name: new.name,
                    kind_code: new.kind_code,
                    category_id: new.category_id,
                    blacklisted: false,
                    blacklist_reason: None,
                    last_synced: Utc::now(),
                };
                channels.insert(key, mapping.clone());
                mapping
            }
        };
        Ok(mapping)
    }

    async fn update_channel_name(
        &self,
        source_id: &str,
        source_workspace_id: &str,
        name: &str,
    ) -> Result<()> {
        let mut channels = self.channels.lock();
        if let Some(existing) =
            channels.get_mut(&(source_id.to_string(), source_workspace_id.to_string()))
        {
            existing.name = name.to_string();
            existing.last_synced = Utc::now();
        }
        Ok(())
    }

    async fn blacklist_channel(
        &self,
        source_id: &str,
        source_workspace_id: &str,
        name: &str,
        reason: &str,
    ) -> Result<ChannelMapping> {
        let mut channels = self.channels.lock();
        let key = (source_id.to_string(), source_workspace_id.to_string());
        let mapping = channels
            .entry(key)
            .or_insert_with(|| ChannelMapping {
                mirror_id: format!("pending_{source_id}"),
                source_id: source_id.to_string(),
                source_workspace_id: source_workspace_id.to_string(),
                name: name.to_string(),
                kind_code: 0,
                category_id: None,
                blacklisted: false,
                blacklist_reason: None,
                last_synced: Utc::now(),
            });
        mapping.name = name.to_string();
        mapping.blacklisted = true;
        mapping.blacklist_reason = Some(reason.to_string());
        mapping.last_synced = Utc::now();
        Ok(mapping.clone())
    }

    async fn find_role(
        &self,
        source_id: &str,
        source_workspace_id: &str,
    ) -> Result<Option<RoleMapping>> {
        Ok(self
            .roles
            .lock()
            .get(&(source_id.to_string(), source_workspace_id.to_string()))
            .cloned())
    }

    async fn find_role_by_name(
        &self,
        source_workspace_id: &str,
        name: &str,
    ) -> Result<Option<RoleMapping>> {
        Ok(self
            .roles
            .lock()
            .values()
            .find(|r| r.source_workspace_id == source_workspace_id && r.name == name)
            .cloned())
    }

    async fn upsert_role(&self, new: NewRoleMapping) -> Result<RoleMapping> {
        let mut roles = self.roles.lock();
        let key = (new.source_id.clone(), new.source_workspace_id.clone());
        let mapping = RoleMapping {
            mirror_id: new.mirror_id,
            source_id: new.source_id,
            source_workspace_id: new.source_workspace_id,
            name: new.name,
            synced: true,
            last_synced: Utc::now(),
        };
        roles.insert(key, mapping.clone());
        Ok(mapping)
    }
}

/// Scriptable source platform reader
#[derive(Debug, Default)]
pub struct MockSourcePlatform {
    channels: Mutex<HashMap<String, SourceChannel>>,
    errors: Mutex<HashMap<String, u16>>,
    messages: Mutex<HashMap<String, Vec<SourceMessage>>>,
    fetch_delay: Mutex<Option<Duration>>,
    pub fetch_calls: AtomicUsize,
}

impl MockSourcePlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_channel(&self, channel: SourceChannel) {
        self.channels.lock().insert(channel.id.clone(), channel);
    }

    /// Make metadata fetches for an entity fail with a fixed status
    pub fn fail_with(&self, channel_id: &str, code: u16) {
        self.errors.lock().insert(channel_id.to_string(), code);
    }

    pub fn set_messages(&self, channel_id: &str, messages: Vec<SourceMessage>) {
        self.messages.lock().insert(channel_id.to_string(), messages);
    }

    /// Slow down metadata fetches, letting tests overlap concurrent callers
    pub fn set_fetch_delay(&self, delay: Duration) {
        *self.fetch_delay.lock() = Some(delay);
    }

    pub fn rename_channel(&self, channel_id: &str, name: &str) {
        if let Some(channel) = self.channels.lock().get_mut(channel_id) {
            channel.name = name.to_string();
        }
    }
}

#[async_trait]
impl SourcePlatform for MockSourcePlatform {
    async fn fetch_channel(&self, channel_id: &str) -> std::result::Result<SourceChannel, FetchError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.fetch_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(code) = self.errors.lock().get(channel_id) {
            return Err(FetchError::Status {
                code: *code,
                entity_id: channel_id.to_string(),
            });
        }
        self.channels
            .lock()
            .get(channel_id)
            .cloned()
            .ok_or_else(|| FetchError::Status {
                code: 404,
                entity_id: channel_id.to_string(),
            })
    }

    async fn list_workspace_channels(
        &self,
        workspace_id: &str,
    ) -> std::result::Result<Vec<SourceChannel>, FetchError> {
        Ok(self
            .channels
            .lock()
            .values()
            .filter(|c| c.workspace_id == workspace_id)
            .cloned()
            .collect())
    }

    async fn recent_messages(
        &self,
        channel_id: &str,
        limit: usize,
    ) -> std::result::Result<Vec<SourceMessage>, FetchError> {
        let mut messages = self
            .messages
            .lock()
            .get(channel_id)
            .cloned()
            .unwrap_or_default();
        messages.truncate(limit);
        Ok(messages)
    }
}

/// Recording mirror gateway with generated room ids
#[derive(Debug)]
pub struct MockMirrorGateway {
    existing: Mutex<Vec<MirrorRoom>>,
    threads: Mutex<HashMap<String, Vec<MirrorRoom>>>,
    pub created: Mutex<Vec<(String, NewMirrorRoom)>>,
    pub renames: Mutex<Vec<(String, String)>>,
    next_id: AtomicUsize,
    forums_supported: AtomicBool,
    fail_creation: AtomicBool,
    create_delay: Mutex<Option<Duration>>,
}

impl Default for MockMirrorGateway {
    fn default() -> Self {
        Self {
            existing: Mutex::new(Vec::new()),
            threads: Mutex::new(HashMap::new()),
            created: Mutex::new(Vec::new()),
            renames: Mutex::new(Vec::new()),
            next_id: AtomicUsize::new(1),
            forums_supported: AtomicBool::new(true),
            fail_creation: AtomicBool::new(false),
            create_delay: Mutex::new(None),
        }
    }
}

impl MockMirrorGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_room(&self, room: MirrorRoom) {
        self.existing.lock().push(room);
    }

    pub fn seed_thread(&self, parent_id: &str, thread: MirrorRoom) {
        self.threads
            .lock()
            .entry(parent_id.to_string())
            .or_default()
            .push(thread);
    }

    pub fn set_forums_supported(&self, supported: bool) {
        self.forums_supported.store(supported, Ordering::SeqCst);
    }

    pub fn set_fail_creation(&self, fail: bool) {
        self.fail_creation.store(fail, Ordering::SeqCst);
    }

    pub fn set_create_delay(&self, delay: Duration) {
        *self.create_delay.lock() = Some(delay);
    }

    pub fn created_count(&self) -> usize {
        self.created.lock().len()
    }
}

#[async_trait]
impl MirrorGateway for MockMirrorGateway {
    async fn create_room(&self, workspace_id: &str, room: NewMirrorRoom) -> Result<MirrorRoom> {
        let delay = *self.create_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_creation.load(Ordering::SeqCst) {
            return Err(MirrorError::Replication(
                "mirror room creation refused".to_string(),
            ));
        }
        let id = format!("mirror-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        let created = MirrorRoom {
            id,
            name: room.name.clone(),
            kind: room.kind,
        };
        self.existing.lock().push(created.clone());
        if let Some(parent_id) = &room.parent_id {
            self.threads
                .lock()
                .entry(parent_id.clone())
                .or_default()
                .push(created.clone());
        }
        self.created
            .lock()
            .push((workspace_id.to_string(), room));
        Ok(created)
    }

    async fn rename_room(&self, _workspace_id: &str, room_id: &str, name: &str) -> Result<()> {
        self.renames
            .lock()
            .push((room_id.to_string(), name.to_string()));
        Ok(())
    }

    async fn rooms_named(&self, _workspace_id: &str, name: &str) -> Result<Vec<MirrorRoom>> {
        Ok(self
            .existing
            .lock()
            .iter()
            .filter(|room| room.name == name)
            .cloned()
            .collect())
    }

    async fn active_threads(
        &self,
        _workspace_id: &str,
        parent_id: &str,
    ) -> Result<Vec<MirrorRoom>> {
        Ok(self
            .threads
            .lock()
            .get(parent_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn supports_forums(&self, _workspace_id: &str) -> Result<bool> {
        Ok(self.forums_supported.load(Ordering::SeqCst))
    }
}

/// One captured notification
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationRecord {
    pub mirror_workspace_id: String,
    pub source_id: String,
    pub name: Option<String>,
    pub reason: NotifyReason,
}

/// Notifier that records instead of delivering
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    pub notifications: Mutex<Vec<NotificationRecord>>,
    counter: AtomicUsize,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.notifications.lock().len()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_error_notification(
        &self,
        mirror_workspace_id: &str,
        source_id: &str,
        name: Option<&str>,
        reason: NotifyReason,
    ) -> Option<String> {
        self.notifications.lock().push(NotificationRecord {
            mirror_workspace_id: mirror_workspace_id.to_string(),
            source_id: source_id.to_string(),
            name: name.map(str::to_string),
            reason,
        });
        Some(format!("note-{}", self.counter.fetch_add(1, Ordering::SeqCst)))
    }
}

/// Recovery service that records start requests
#[derive(Debug, Default)]
pub struct MockRecoveryService {
    recovering: AtomicBool,
    pub starts: Mutex<Vec<(String, String, String, Option<String>)>>,
}

impl MockRecoveryService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_recovering(&self, recovering: bool) {
        self.recovering.store(recovering, Ordering::SeqCst);
    }

    pub fn start_count(&self) -> usize {
        self.starts.lock().len()
    }
}

#[async_trait]
impl AutoRecoveryService for MockRecoveryService {
    async fn is_recovering(&self, _source_id: &str, _mirror_workspace_id: &str) -> bool {
        self.recovering.load(Ordering::SeqCst)
    }

    async fn start_recovery(
        &self,
        source_id: &str,
        source_workspace_id: &str,
        mirror_workspace_id: &str,
        notification_message_id: Option<String>,
    ) {
        self.starts.lock().push((
            source_id.to_string(),
            source_workspace_id.to_string(),
            mirror_workspace_id.to_string(),
            notification_message_id,
        ));
    }
}

/// Message processor that records ids in replay order and can be told to
/// fail specific ids
#[derive(Debug, Default)]
pub struct RecordingProcessor {
    pub processed: Mutex<Vec<String>>,
    fail_ids: Mutex<HashSet<String>>,
}

impl RecordingProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_on(&self, message_id: &str) {
        self.fail_ids.lock().insert(message_id.to_string());
    }

    pub fn processed_ids(&self) -> Vec<String> {
        self.processed.lock().clone()
    }
}

#[async_trait]
impl MessageProcessor for RecordingProcessor {
    async fn process_message(
        &self,
        message: &SourceMessage,
        _mirror_entity: &ChannelMapping,
        _source_workspace: &SourceWorkspace,
    ) -> Result<()> {
        if self.fail_ids.lock().contains(&message.id) {
            return Err(MirrorError::Replication(format!(
                "processing refused for {}",
                message.id
            )));
        }
        self.processed.lock().push(message.id.clone());
        Ok(())
    }
}

/// Static processed-message index
#[derive(Debug, Default)]
pub struct SetProcessedIndex {
    ids: Mutex<HashSet<String>>,
}

impl SetProcessedIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark(&self, message_id: &str) {
        self.ids.lock().insert(message_id.to_string());
    }
}

#[async_trait]
impl ProcessedMessageIndex for SetProcessedIndex {
    async fn is_processed(&self, message_id: &str) -> bool {
        self.ids.lock().contains(message_id)
    }
}

/// Transport replaying a scripted event sequence, then holding the
/// connection open until closed. Disruptions must be scripted explicitly.
struct ScriptedTransport {
    events: VecDeque<TransportEvent>,
    ready: Arc<AtomicBool>,
}

#[async_trait]
impl EventTransport for ScriptedTransport {
    async fn recv(&mut self) -> Option<TransportEvent> {
        if let Some(event) = self.events.pop_front() {
            return Some(event);
        }
        std::future::pending::<()>().await;
        unreachable!("pending future resolved")
    }

    async fn close(&mut self) {
        self.ready.store(false, Ordering::SeqCst);
    }
}

/// Factory handing out one scripted transport per connect call
#[derive(Debug, Default)]
pub struct ScriptedTransportFactory {
    scripts: Mutex<VecDeque<Vec<TransportEvent>>>,
    pub connects: AtomicUsize,
}

impl ScriptedTransportFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the event script for the next connection
    pub fn push_script(&self, events: Vec<TransportEvent>) {
        self.scripts.lock().push_back(events);
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransportFactory for ScriptedTransportFactory {
    async fn connect(&self, source_workspace_id: &str) -> Result<ConnectedSession> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let events = self.scripts.lock().pop_front().unwrap_or_default();
        let ready = Arc::new(AtomicBool::new(true));
        Ok(ConnectedSession {
            transport: Box::new(ScriptedTransport {
                events: events.into(),
                ready: Arc::clone(&ready),
            }),
            workspace: SourceWorkspace {
                id: source_workspace_id.to_string(),
                name: "scripted".to_string(),
            },
            ready,
        })
    }
}
