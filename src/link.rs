//! Connection state machine for the remote.
//!
//! [`Link`] owns the adapter, the device memory and every per-connection
//! binding. All inputs go through [`Link::handle`] and all timers through
//! [`Link::fire_due_timers`]; the caller must serialize those calls (the
//! session actor does). Each connection attempt bumps the epoch, and every
//! timer armed under an older epoch is ignored when it fires.

use tokio::time::Instant;

use crate::adapter::{
    AdapterEvent, BleAdapter, Characteristic, PeripheralId, PeripheralState, RadioState,
    RestoredPeripheral, WriteMode,
};
use crate::codec::{self, ControlMessage};
use crate::config::{Config, NOTIFY_CHARACTERISTIC_UUID, SERVICE_UUID, WRITE_CHARACTERISTIC_UUID};
use crate::error::LinkError;
use crate::identify::{IdentificationPolicy, PeripheralRef};
use crate::memory::DeviceMemory;
use crate::pipeline::{self, Flush, Offer, PendingSend, SendPipeline};
use crate::song::Song;
use crate::timer::{TimerKind, Timers};
use crate::watchdog::{self, Progress, Verdict};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkState {
    Idle,
    Scanning,
    Connecting,
    DiscoveringServices,
    DiscoveringCharacteristics,
    Ready,
    Disconnected,
    Failed,
    Restoring,
}

impl LinkState {
    pub fn label(self) -> &'static str {
        match self {
            LinkState::Idle => "Searching for JuiceBox Remote…",
            LinkState::Scanning => "Scanning for remote…",
            LinkState::Connecting => "Connecting…",
            LinkState::DiscoveringServices => "Discovering services…",
            LinkState::DiscoveringCharacteristics => "Discovering characteristics…",
            LinkState::Ready => "Connected",
            LinkState::Disconnected => "Disconnected",
            LinkState::Failed => "Tap Connect to retry",
            LinkState::Restoring => "Restoring connection…",
        }
    }

    pub fn is_busy(self) -> bool {
        matches!(
            self,
            LinkState::Connecting
                | LinkState::DiscoveringServices
                | LinkState::DiscoveringCharacteristics
                | LinkState::Restoring
        )
    }
}

/// Requests from the session facade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    StartScanning,
    ToggleConnection,
    Reconnect,
    Disconnect,
    Send { song: Song, force: bool },
    Shutdown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Adapter(AdapterEvent),
    Command(Command),
}

impl From<AdapterEvent> for Input {
    fn from(event: AdapterEvent) -> Self {
        Input::Adapter(event)
    }
}

impl From<Command> for Input {
    fn from(command: Command) -> Self {
        Input::Command(command)
    }
}

/// Observable snapshot of the link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub state: LinkState,
    /// Connection attempt counter; a new value with `is_connected` means a
    /// fresh connection.
    pub epoch: u64,
    pub radio: Option<RadioState>,
    pub is_connected: bool,
    pub is_busy: bool,
    pub can_send: bool,
    pub description: String,
    pub last_error: Option<String>,
    pub peripheral: Option<PeripheralId>,
}

pub struct Link<A: BleAdapter, M: DeviceMemory> {
    adapter: A,
    memory: M,
    config: Config,
    policy: IdentificationPolicy,
    pipeline: SendPipeline,
    timers: Timers,

    radio: Option<RadioState>,
    state: LinkState,
    epoch: u64,
    peripheral: Option<PeripheralRef>,
    write_char: Option<Characteristic>,
    notify_char: Option<Characteristic>,
    progress: Progress,
    stall_count: u32,
    persisted: bool,
    allow_reset: bool,

    scanning: bool,
    scan_filtered: bool,
    last_scan_start: Option<Instant>,
    scan_requested: bool,
    pending_connect: Option<PeripheralRef>,
    pending_service_discovery: bool,
    rescan: bool,

    last_error: Option<String>,
    shut_down: bool,
}

impl<A: BleAdapter, M: DeviceMemory> Link<A, M> {
    pub fn new(adapter: A, memory: M, config: Config) -> Self {
        Self {
            policy: IdentificationPolicy::new(&config),
            pipeline: SendPipeline::new(config.min_send_interval),
            timers: Timers::new(),
            adapter,
            memory,
            config,

            radio: None,
            state: LinkState::Idle,
            epoch: 0,
            peripheral: None,
            write_char: None,
            notify_char: None,
            progress: Progress::default(),
            stall_count: 0,
            persisted: false,
            allow_reset: false,

            scanning: false,
            scan_filtered: false,
            last_scan_start: None,
            scan_requested: false,
            pending_connect: None,
            pending_service_discovery: false,
            rescan: false,

            last_error: None,
            shut_down: false,
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn stall_count(&self) -> u32 {
        self.stall_count
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    pub fn adapter_mut(&mut self) -> &mut A {
        &mut self.adapter
    }

    pub fn memory(&self) -> &M {
        &self.memory
    }

    pub fn policy(&self) -> &IdentificationPolicy {
        &self.policy
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    pub fn is_connected(&self) -> bool {
        self.state == LinkState::Ready
    }

    pub fn can_send(&self) -> bool {
        self.is_connected() && self.write_char.is_some()
    }

    pub fn write_characteristic(&self) -> Option<Characteristic> {
        self.write_char
    }

    pub fn notify_characteristic(&self) -> Option<Characteristic> {
        self.notify_char
    }

    pub fn pending_send(&self) -> Option<&PendingSend> {
        self.pipeline.pending()
    }

    pub fn last_sent(&self) -> &Song {
        self.pipeline.last_sent()
    }

    pub fn is_timer_armed(&self, kind: TimerKind) -> bool {
        self.timers.is_armed(kind)
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.next_deadline()
    }

    pub fn description(&self) -> String {
        let text = match self.radio {
            Some(RadioState::PoweredOff) => "Turn on Bluetooth",
            Some(RadioState::Unauthorized) => "Bluetooth access denied",
            Some(RadioState::Unsupported) => "Bluetooth unsupported",
            Some(RadioState::Other) => "Bluetooth unavailable",
            Some(RadioState::PoweredOn) | None => self.state.label(),
        };
        text.to_owned()
    }

    pub fn status(&self) -> Status {
        Status {
            state: self.state,
            epoch: self.epoch,
            radio: self.radio,
            is_connected: self.is_connected(),
            is_busy: self.state.is_busy(),
            can_send: self.can_send(),
            description: self.description(),
            last_error: self.last_error.clone(),
            peripheral: self.current_id(),
        }
    }

    pub async fn handle(&mut self, input: Input) {
        if self.shut_down {
            debug!("link shut down, ignoring {input:?}");
            return;
        }
        match input {
            Input::Adapter(event) => self.on_adapter_event(event).await,
            Input::Command(command) => self.on_command(command).await,
        }
        self.settle().await;
    }

    /// Run every timer whose deadline has passed, earliest first.
    pub async fn fire_due_timers(&mut self) {
        while let Some((kind, epoch)) = self.timers.pop_due(Instant::now()) {
            if self.shut_down {
                return;
            }
            self.on_timer(kind, epoch).await;
            self.settle().await;
        }
    }

    async fn settle(&mut self) {
        while std::mem::take(&mut self.rescan) {
            self.start_scanning(false).await;
        }
    }

    async fn on_command(&mut self, command: Command) {
        match command {
            Command::StartScanning => self.start_scanning(true).await,
            Command::ToggleConnection => {
                if self.is_connected() {
                    self.disconnect().await;
                } else {
                    self.reconnect().await;
                }
            }
            Command::Reconnect => self.reconnect().await,
            Command::Disconnect => self.disconnect().await,
            Command::Send { song, force } => self.send(song, force),
            Command::Shutdown => self.shutdown().await,
        }
    }

    async fn on_adapter_event(&mut self, event: AdapterEvent) {
        match event {
            AdapterEvent::StateChanged(radio) => self.on_radio(radio).await,
            AdapterEvent::Discovered {
                peripheral,
                advertisement,
            } => {
                if !self.scanning || self.peripheral.is_some() {
                    trace!("ignoring discovery of {} outside a scan", peripheral.id);
                    return;
                }
                let known = self.memory.known_identity();
                let candidate = self
                    .policy
                    .identify(&peripheral, Some(&advertisement), known.as_ref());
                match candidate {
                    Some(candidate) => {
                        info!("discovered remote {} ({:?})", peripheral.id, candidate.matched);
                        self.begin_connect(candidate).await;
                    }
                    None => trace!("ignoring peripheral {}", peripheral.id),
                }
            }
            AdapterEvent::Connected(id) => {
                if !self.is_current(&id) {
                    debug!("ignoring connect of superseded peripheral {id}");
                    return;
                }
                info!("connected to {id}");
                self.progress = Progress::default();
                self.discover_services().await;
            }
            AdapterEvent::ConnectFailed { id, error } => {
                if !self.is_current(&id) {
                    debug!("ignoring connect failure of superseded peripheral {id}");
                    return;
                }
                self.fail(LinkError::ConnectFailed(error)).await;
            }
            AdapterEvent::Disconnected { id, error } => self.on_disconnected(&id, error).await,
            AdapterEvent::ServicesDiscovered {
                id,
                services,
                error,
            } => {
                if !self.is_current(&id) {
                    debug!("ignoring services of superseded peripheral {id}");
                    return;
                }
                if let Some(error) = error {
                    self.fail(LinkError::ServiceDiscovery(error)).await;
                    return;
                }
                self.on_services(&id, services).await;
            }
            AdapterEvent::CharacteristicsDiscovered {
                id,
                service,
                characteristics,
                error,
            } => {
                if !self.is_current(&id) {
                    debug!("ignoring characteristics of superseded peripheral {id}");
                    return;
                }
                if let Some(error) = error {
                    self.fail(LinkError::CharacteristicDiscovery(error)).await;
                    return;
                }
                self.on_characteristics(&id, service, characteristics).await;
            }
            AdapterEvent::ValueUpdated {
                id,
                characteristic,
                value,
                error,
            } => {
                if !self.is_current(&id) || characteristic != NOTIFY_CHARACTERISTIC_UUID {
                    return;
                }
                if let Some(error) = error {
                    debug!("notification error from {id}: {error}");
                    return;
                }
                self.on_control(&value);
            }
            AdapterEvent::RestoreState {
                peripherals,
                scan_services,
            } => self.on_restore(peripherals, scan_services).await,
        }
    }

    async fn on_radio(&mut self, radio: RadioState) {
        if self.radio == Some(radio) {
            return;
        }
        info!("bluetooth {radio}");
        self.radio = Some(radio);
        match radio {
            RadioState::PoweredOn => {
                self.last_error = None;
                if std::mem::take(&mut self.pending_service_discovery) {
                    self.discover_services().await;
                } else if let Some(candidate) = self.pending_connect.take() {
                    self.begin_connect(candidate).await;
                } else if self.peripheral.is_none() {
                    if self.scan_requested {
                        debug!("resuming deferred scan");
                    }
                    self.start_scanning(false).await;
                }
            }
            RadioState::Unsupported => {
                self.pause();
                self.scan_requested = false;
                self.pending_connect = None;
                self.last_error = Some(LinkError::Radio(radio).to_string());
            }
            RadioState::Unauthorized => {
                self.pause();
                self.last_error = Some(LinkError::Radio(radio).to_string());
            }
            RadioState::PoweredOff | RadioState::Other => self.pause(),
        }
    }

    /// Drop everything in flight and queue it for the next power-on.
    fn pause(&mut self) {
        self.timers.cancel(TimerKind::ScanFallback);
        self.scanning = false;
        if let Some(candidate) = self.peripheral.clone() {
            self.pending_connect = Some(candidate);
        }
        self.teardown();
        self.scan_requested = true;
        self.set_state(LinkState::Idle);
    }

    async fn on_disconnected(&mut self, id: &PeripheralId, error: Option<String>) {
        let current = self.is_current(id);
        if !current && !self.allow_reset {
            debug!("ignoring disconnect of superseded peripheral {id}");
            return;
        }
        self.allow_reset = false;
        info!("{id} disconnected");
        if let Some(error) = error {
            self.last_error = Some(LinkError::Disconnected(error).to_string());
        }
        if current {
            self.teardown();
            self.set_state(LinkState::Disconnected);
        }
        if !self.scanning {
            self.start_scanning(false).await;
        }
    }

    async fn on_services(&mut self, id: &PeripheralId, services: Vec<uuid::Uuid>) {
        self.progress.services_discovered = true;
        self.set_state(LinkState::DiscoveringCharacteristics);
        self.arm_watchdog();

        let result = if services.contains(&SERVICE_UUID) {
            let wanted = [WRITE_CHARACTERISTIC_UUID, NOTIFY_CHARACTERISTIC_UUID];
            self.adapter
                .discover_characteristics(id, SERVICE_UUID, Some(&wanted))
                .await
        } else {
            warn!(
                "{id} did not list the remote service, probing {} services",
                services.len()
            );
            let mut result = Ok(());
            for service in services {
                result = self.adapter.discover_characteristics(id, service, None).await;
                if result.is_err() {
                    break;
                }
            }
            result
        };
        if let Err(e) = result {
            self.fail(LinkError::CharacteristicDiscovery(e.to_string())).await;
        }
    }

    async fn on_characteristics(
        &mut self,
        id: &PeripheralId,
        service: uuid::Uuid,
        characteristics: Vec<uuid::Uuid>,
    ) {
        for uuid in characteristics {
            let characteristic = Characteristic { service, uuid };
            if uuid == WRITE_CHARACTERISTIC_UUID && self.write_char.is_none() {
                debug!("bound write characteristic on {id}");
                self.write_char = Some(characteristic);
                self.progress.characteristic_found = true;
            } else if uuid == NOTIFY_CHARACTERISTIC_UUID && self.notify_char.is_none() {
                debug!("bound notify characteristic on {id}");
                self.notify_char = Some(characteristic);
                self.progress.characteristic_found = true;
                if let Err(e) = self.adapter.set_notify(id, characteristic, true).await {
                    warn!("cannot enable notifications on {id}: {e}");
                }
            }
        }

        if self.write_char.is_some() && self.notify_char.is_some() {
            self.become_ready();
        } else {
            self.arm_watchdog();
        }
    }

    fn become_ready(&mut self) {
        self.timers.cancel(TimerKind::Watchdog);
        if self.state == LinkState::Ready {
            return;
        }
        self.set_state(LinkState::Ready);
        self.stall_count = 0;
        self.last_error = None;
        if !std::mem::replace(&mut self.persisted, true) {
            self.remember_identity();
        }
    }

    fn remember_identity(&mut self) {
        let Some(candidate) = self.peripheral.as_ref() else {
            return;
        };
        let known = self.memory.known_identity();
        if known.as_ref() == Some(candidate.id()) {
            return;
        }
        if !self.policy.should_persist(candidate, known.as_ref()) {
            debug!(
                "not remembering {} matched by {:?}",
                candidate.id(),
                candidate.matched
            );
            return;
        }
        info!("remembering remote {}", candidate.id());
        if let Err(e) = self.memory.set_known_identity(candidate.id()) {
            warn!("cannot remember remote: {e}");
        }
    }

    fn forget_identity(&mut self) {
        if self.memory.known_identity().is_none() {
            return;
        }
        warn!("forgetting remembered remote after {} stalls", self.stall_count);
        if let Err(e) = self.memory.clear_known_identity() {
            warn!("cannot forget remote: {e}");
        }
    }

    fn on_control(&mut self, value: &[u8]) {
        trace!("received {:?}", String::from_utf8_lossy(value));
        match codec::decode(value) {
            ControlMessage::Ack => trace!("remote acknowledged"),
            ControlMessage::RequestSong => {
                let song = self.pipeline.last_sent().clone();
                if song.is_empty() {
                    debug!("remote requested a song before any was sent");
                } else {
                    info!("remote requested the current song");
                    self.send(song, true);
                }
            }
            ControlMessage::Unknown(text) => debug!("ignoring message {text:?}"),
        }
    }

    async fn on_restore(&mut self, peripherals: Vec<RestoredPeripheral>, scan_services: Vec<uuid::Uuid>) {
        info!("restoring {} peripherals", peripherals.len());
        let known = self.memory.known_identity();
        let restored = peripherals.into_iter().find_map(|restored| {
            self.policy
                .identify(&restored.peripheral, None, known.as_ref())
                .map(|candidate| (candidate, restored.state))
        });

        let Some((candidate, state)) = restored else {
            if !scan_services.is_empty() {
                debug!("restored a scan for {scan_services:?}");
                self.scan_requested = true;
                if self.powered() {
                    self.start_scanning(false).await;
                }
            }
            return;
        };

        self.stop_scanning().await;
        self.set_state(LinkState::Restoring);
        match state {
            PeripheralState::Connected => {
                self.adopt(candidate);
                self.discover_services().await;
            }
            PeripheralState::Connecting => {
                self.adopt(candidate);
                self.set_state(LinkState::Connecting);
                self.arm_watchdog();
            }
            PeripheralState::Disconnected | PeripheralState::Disconnecting => {
                self.begin_connect(candidate).await;
            }
        }
    }

    async fn start_scanning(&mut self, coalesce: bool) {
        if self.radio == Some(RadioState::Unsupported) {
            debug!("bluetooth unsupported, not scanning");
            return;
        }
        if !self.powered() {
            debug!("radio not powered, deferring scan");
            self.scan_requested = true;
            return;
        }
        if self.peripheral.is_some() {
            debug!("connection attempt in flight, not scanning");
            return;
        }
        let now = Instant::now();
        if coalesce {
            if let Some(started) = self.last_scan_start {
                if now.saturating_duration_since(started) < self.config.scan_coalesce {
                    debug!("ignoring duplicate scan request");
                    return;
                }
            }
        }
        self.scan_requested = false;
        self.last_scan_start = Some(now);

        let known = self.memory.known_identity();
        match self.adapter.retrieve_connected(&[SERVICE_UUID]).await {
            Ok(peripherals) => {
                for peripheral in peripherals {
                    if let Some(candidate) = self.policy.identify(&peripheral, None, known.as_ref()) {
                        info!("remote {} already connected to the system", peripheral.id);
                        self.begin_connect(candidate).await;
                        return;
                    }
                }
            }
            Err(e) => warn!("cannot retrieve connected peripherals: {e}"),
        }

        // A remembered remote may not advertise the service.
        let filtered = known.is_none();
        if self.scanning {
            if let Err(e) = self.adapter.stop_scan().await {
                debug!("cannot stop scan: {e}");
            }
        }
        let filter = [SERVICE_UUID];
        if let Err(e) = self.adapter.scan(filtered.then_some(&filter[..])).await {
            warn!("cannot start scan: {e}");
        }
        info!(
            "scanning for remote ({})",
            if filtered { "service filter" } else { "unfiltered" }
        );
        self.scanning = true;
        self.scan_filtered = filtered;
        self.set_state(LinkState::Scanning);
        self.timers
            .arm(TimerKind::ScanFallback, self.config.scan_fallback, self.epoch);
    }

    async fn stop_scanning(&mut self) {
        self.timers.cancel(TimerKind::ScanFallback);
        let keep = self.current_id();
        self.policy.retain_only(keep.as_ref());
        if std::mem::take(&mut self.scanning) {
            if let Err(e) = self.adapter.stop_scan().await {
                debug!("cannot stop scan: {e}");
            }
        }
    }

    async fn widen_scan(&mut self) {
        if !self.scanning || !self.scan_filtered || self.peripheral.is_some() {
            return;
        }
        info!("no remote found by service, widening scan");
        if let Err(e) = self.adapter.stop_scan().await {
            debug!("cannot stop scan: {e}");
        }
        if let Err(e) = self.adapter.scan(None).await {
            warn!("cannot start scan: {e}");
        }
        self.scan_filtered = false;
    }

    /// Make `candidate` the current peripheral under a fresh epoch.
    fn adopt(&mut self, candidate: PeripheralRef) {
        self.epoch += 1;
        self.allow_reset = false;
        self.write_char = None;
        self.notify_char = None;
        self.progress = Progress::default();
        self.persisted = false;
        self.peripheral = Some(candidate);
    }

    async fn begin_connect(&mut self, candidate: PeripheralRef) {
        self.stop_scanning().await;
        if !self.powered() {
            info!("radio not powered, queueing connection to {}", candidate.id());
            self.pending_connect = Some(candidate);
            return;
        }
        let id = candidate.id().clone();
        self.adopt(candidate);
        info!("connecting to {id} (epoch {})", self.epoch);
        self.set_state(LinkState::Connecting);
        self.arm_watchdog();
        if let Err(e) = self.adapter.connect(&id).await {
            self.fail(LinkError::ConnectFailed(e.to_string())).await;
        }
    }

    async fn discover_services(&mut self) {
        let Some(id) = self.current_id() else {
            return;
        };
        if !self.powered() {
            debug!("radio not powered, deferring service discovery on {id}");
            self.pending_service_discovery = true;
            return;
        }
        self.set_state(LinkState::DiscoveringServices);
        self.arm_watchdog();
        if let Err(e) = self.adapter.discover_services(&id, Some(&[SERVICE_UUID])).await {
            self.fail(LinkError::ServiceDiscovery(e.to_string())).await;
        }
    }

    async fn reconnect(&mut self) {
        match self.peripheral.clone() {
            Some(_) if self.is_connected() => debug!("already connected"),
            Some(candidate) => {
                info!("retrying connection to {}", candidate.id());
                self.teardown();
                self.begin_connect(candidate).await;
            }
            None => self.start_scanning(true).await,
        }
    }

    async fn disconnect(&mut self) {
        info!("disconnecting on request");
        self.stop_scanning().await;
        self.cancel_current().await;
        self.set_state(LinkState::Disconnected);
        self.start_scanning(false).await;
    }

    async fn shutdown(&mut self) {
        info!("shutting down link");
        self.stop_scanning().await;
        self.cancel_current().await;
        self.timers.cancel_all();
        self.pending_connect = None;
        self.set_state(LinkState::Idle);
        self.shut_down = true;
    }

    /// Record a transport failure, abandon the attempt and rescan.
    async fn fail(&mut self, error: LinkError) {
        warn!("{error}");
        self.last_error = Some(error.to_string());
        self.cancel_current().await;
        self.set_state(LinkState::Failed);
        self.rescan = true;
    }

    async fn cancel_current(&mut self) {
        if let Some(id) = self.current_id() {
            self.allow_reset = true;
            if let Err(e) = self.adapter.cancel_connection(&id).await {
                debug!("cannot cancel connection to {id}: {e}");
            }
        }
        self.teardown();
    }

    fn teardown(&mut self) {
        self.peripheral = None;
        self.policy.retain_only(None);
        self.write_char = None;
        self.notify_char = None;
        self.progress = Progress::default();
        self.pending_service_discovery = false;
        self.pipeline.reset();
        self.timers.cancel(TimerKind::Watchdog);
        self.timers.cancel(TimerKind::SendDebounce);
        self.timers.cancel(TimerKind::SendThrottleRetry);
    }

    fn send(&mut self, song: Song, force: bool) {
        match self.pipeline.offer(song, force, self.can_send()) {
            Offer::Debounce => {
                self.timers.cancel(TimerKind::SendThrottleRetry);
                self.timers
                    .arm(TimerKind::SendDebounce, self.config.send_debounce, self.epoch);
            }
            Offer::NotReady => debug!("link not ready, dropping song"),
            Offer::Duplicate => trace!("suppressing duplicate song"),
            Offer::Empty => trace!("not sending empty song"),
        }
    }

    async fn flush(&mut self) {
        if !self.can_send() {
            self.pipeline.reset();
            return;
        }
        match self.pipeline.poll_flush(Instant::now()) {
            Flush::Idle => {}
            Flush::Wait(delay) => {
                trace!("throttling send for {delay:?}");
                self.timers
                    .arm(TimerKind::SendThrottleRetry, delay, self.epoch);
            }
            Flush::Write(pending) => self.write_song(pending).await,
        }
    }

    async fn write_song(&mut self, pending: PendingSend) {
        let (Some(id), Some(characteristic)) = (self.current_id(), self.write_char) else {
            return;
        };
        let payload = codec::encode(&pending.song);
        let max_len = self
            .adapter
            .max_write_length(&id, WriteMode::WithResponse)
            .filter(|len| *len > 0)
            .unwrap_or(self.config.fallback_write_length);
        debug!(
            "sending {} ({} bytes, force: {})",
            pending.song,
            payload.len(),
            pending.force
        );
        for chunk in pipeline::chunks(&payload, max_len) {
            let result = self
                .adapter
                .write(&id, characteristic, chunk, WriteMode::WithResponse)
                .await;
            if let Err(e) = result {
                self.fail(LinkError::Write(e.to_string())).await;
                return;
            }
        }
        self.pipeline.complete(pending.song);
    }

    async fn on_timer(&mut self, kind: TimerKind, epoch: u64) {
        if epoch != self.epoch {
            debug!("ignoring {kind:?} armed at epoch {epoch}");
            return;
        }
        match kind {
            TimerKind::ScanFallback => self.widen_scan().await,
            TimerKind::SendDebounce | TimerKind::SendThrottleRetry => self.flush().await,
            TimerKind::Watchdog => self.on_watchdog().await,
        }
    }

    async fn on_watchdog(&mut self) {
        let Some(id) = self.current_id() else {
            return;
        };
        let ready = self.write_char.is_some() && self.notify_char.is_some();
        let connected = self.adapter.peripheral_state(&id) == PeripheralState::Connected;
        let verdict = watchdog::assess(
            ready,
            &self.progress,
            connected,
            self.config.max_watchdog_extensions,
        );
        match verdict {
            Verdict::Stale => debug!("watchdog fired on a ready link"),
            Verdict::Extend => {
                self.stall_count += 1;
                self.progress.extensions += 1;
                info!("{id} is slow, waiting longer (stall {})", self.stall_count);
                self.arm_watchdog();
            }
            Verdict::Rediscover => {
                warn!("no progress from {id}, retrying service discovery");
                self.progress.rediscovery_attempted = true;
                self.discover_services().await;
            }
            Verdict::Escalate => {
                self.stall_count += 1;
                warn!("{id} stalled (stall {})", self.stall_count);
                if self.stall_count >= self.config.stall_threshold {
                    self.forget_identity();
                }
                self.fail(LinkError::Stalled).await;
            }
        }
    }

    fn arm_watchdog(&mut self) {
        self.timers
            .arm(TimerKind::Watchdog, self.config.watchdog_timeout, self.epoch);
    }

    fn set_state(&mut self, state: LinkState) {
        if self.state != state {
            debug!("{:?} -> {:?}", self.state, state);
            self.state = state;
        }
    }

    fn powered(&self) -> bool {
        self.radio == Some(RadioState::PoweredOn)
    }

    fn is_current(&self, id: &PeripheralId) -> bool {
        self.peripheral.as_ref().is_some_and(|c| c.id() == id)
    }

    fn current_id(&self) -> Option<PeripheralId> {
        self.peripheral.as_ref().map(|c| c.id().clone())
    }
}
