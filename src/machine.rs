// src/machine.rs - The execution loop: one actor owning queue, state, indicator and board
use serde::Serialize;
use std::collections::VecDeque;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{mpsc, oneshot};

use crate::FIRMWARE_VERSION;
use crate::command::{CommandError, CommandQueue, CommandToken, QueueError, StreamAssembler, tokenize};
use crate::config::Config;
use crate::dispatcher::{DispatchContext, Dispatcher, InputDrain, MachineState, Outcome};
use crate::hardware::{Board, HardwareError, StatusLight};
use crate::motion::SoftLimits;
use crate::persistence::{PersistedSettings, PersistenceError, SettingsStore};
use crate::status::{IndicatorState, StatusIndicator};

/// Sleep between ticks when there is nothing to do.
const IDLE_POLL: Duration = Duration::from_millis(1);

/// Depth of the request channel between transports and the machine.
pub const REQUEST_CHANNEL_DEPTH: usize = 64;

#[derive(Debug, Error)]
pub enum MachineError {
    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),
    #[error("Hardware error: {0}")]
    Hardware(#[from] HardwareError),
    #[error("Command error: {0}")]
    Command(#[from] CommandError),
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),
    #[error("No settings store configured")]
    NoStore,
    #[error("Load offset is not set")]
    LoadOffsetUnset,
    #[error("No saved buffer to replay")]
    NoSavedBuffer,
}

/// Requests sent by transports to the machine task.
#[derive(Debug)]
pub enum MachineRequest {
    /// Raw bytes from a line-oriented transport. A newline ends one input.
    Serial(Vec<u8>),
    /// A whole program buffer. Also becomes the saved buffer.
    Buffer {
        text: String,
        respond_to: oneshot::Sender<usize>,
    },
    /// One command typed by a client.
    Command {
        text: String,
        respond_to: oneshot::Sender<usize>,
    },
    /// Queue the saved buffer again.
    ReplaySaved {
        respond_to: oneshot::Sender<Result<usize, MachineError>>,
    },
    /// Queue `X<load_offset>`.
    LoadWire {
        respond_to: oneshot::Sender<Result<String, MachineError>>,
    },
    Save {
        respond_to: oneshot::Sender<Result<(), MachineError>>,
    },
    ReadSettings {
        respond_to: oneshot::Sender<Result<Option<String>, MachineError>>,
    },
    DeleteSettings {
        respond_to: oneshot::Sender<Result<bool, MachineError>>,
    },
    Status {
        respond_to: oneshot::Sender<MachineStatus>,
    },
}

impl MachineRequest {
    /// Requests that carry command text. These are dropped during a delay hold.
    fn carries_commands(&self) -> bool {
        matches!(
            self,
            MachineRequest::Serial(_) | MachineRequest::Buffer { .. } | MachineRequest::Command { .. }
        )
    }
}

/// Answer to a status query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MachineStatus {
    pub version: String,
    pub indicator: String,
    pub queue_len: usize,
    pub dispatched: u64,
    pub x_feedrate: u32,
    pub z_feedrate: u32,
    pub load_offset: i32,
    pub settle_delay_ms: u32,
    pub servo_settle_ms: u32,
    pub soft_limits: SoftLimits,
    pub saved_buffer: String,
}

/// Receiving end of the request channel plus control requests held back by a delay.
#[derive(Default)]
struct Inbox {
    rx: Option<mpsc::Receiver<MachineRequest>>,
    deferred: VecDeque<MachineRequest>,
    closed: bool,
}

impl Inbox {
    fn next(&mut self) -> Option<MachineRequest> {
        if let Some(request) = self.deferred.pop_front() {
            return Some(request);
        }
        let rx = self.rx.as_mut()?;
        match rx.try_recv() {
            Ok(request) => Some(request),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                self.closed = true;
                None
            }
        }
    }

    fn is_closed(&self) -> bool {
        self.rx.is_none() || self.closed
    }
}

impl InputDrain for Inbox {
    fn discard_pending(&mut self) -> usize {
        let Some(rx) = self.rx.as_mut() else {
            return 0;
        };
        let mut discarded = 0;
        while let Ok(request) = rx.try_recv() {
            if request.carries_commands() {
                tracing::debug!("Ignoring input during delay: {:?}", request);
                discarded += 1;
            } else {
                self.deferred.push_back(request);
            }
        }
        discarded
    }
}

pub struct Machine {
    state: MachineState,
    queue: CommandQueue,
    assembler: StreamAssembler,
    indicator: StatusIndicator,
    dispatcher: Dispatcher,
    board: Board,
    saved_buffer: String,
    store: Option<Box<dyn SettingsStore>>,
    inbox: Inbox,
}

impl Machine {
    pub fn new(config: &Config, board: Board, light: Box<dyn StatusLight>) -> Self {
        Self {
            state: MachineState::from_config(&config.machine),
            queue: CommandQueue::new(),
            assembler: StreamAssembler::new(config.machine.abort_code),
            indicator: StatusIndicator::new(light, &config.indicator),
            dispatcher: Dispatcher::new(config.machine.abort_code),
            board,
            saved_buffer: String::new(),
            store: None,
            inbox: Inbox::default(),
        }
    }

    pub fn with_store(mut self, store: Box<dyn SettingsStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_requests(mut self, rx: mpsc::Receiver<MachineRequest>) -> Self {
        self.inbox.rx = Some(rx);
        self
    }

    /// Bring the hardware to a known state and load stored settings.
    pub fn start(&mut self) {
        if let Err(e) = self.board.initialize() {
            tracing::error!("Hardware initialization failed: {}", e);
        }
        if let Err(e) = self.restore() {
            tracing::warn!("{}. Continuing with default values", e);
        }
        self.indicator.ready();
        tracing::info!("READY {}", FIRMWARE_VERSION);
    }

    /// Overlay stored settings onto the running state. On failure nothing changes.
    pub fn restore(&mut self) -> Result<(), MachineError> {
        let store = self.store.as_ref().ok_or(MachineError::NoStore)?;
        let settings = store.load()?;
        settings.apply_to(&mut self.state);
        if let Some(buffer) = settings.saved_buffer {
            tracing::info!("Loaded saved buffer: {}", buffer);
            self.saved_buffer = buffer;
        }
        Ok(())
    }

    pub fn save(&self) -> Result<(), MachineError> {
        let store = self.store.as_ref().ok_or(MachineError::NoStore)?;
        let settings = PersistedSettings::capture(&self.state, &self.saved_buffer);
        store.save(&settings).map_err(|e| {
            tracing::warn!("Failed to save values: {}", e);
            e.into()
        })
    }

    /// Run forever, or until every request sender is gone and the queue has drained.
    pub fn run(mut self) {
        loop {
            let dispatched = self.tick().is_some();
            if self.is_idle() && self.inbox.is_closed() {
                tracing::info!("All command sources closed, machine loop stopping");
                return;
            }
            // Nothing ran: idle, or waiting out a blink.
            if !dispatched {
                std::thread::sleep(IDLE_POLL);
            }
        }
    }

    /// One pass of the execution loop. Dispatches at most one command.
    pub fn tick(&mut self) -> Option<Result<Outcome, CommandError>> {
        while let Some(request) = self.inbox.next() {
            self.handle(request);
        }
        self.indicator.advance(self.board.clock.now());

        let mut result = None;
        if !self.indicator.is_blinking() && !self.queue.is_empty() {
            result = self.dispatch_next();
        }
        if self.queue.is_empty() && !self.indicator.is_blinking() {
            self.indicator.ensure_ready();
        }
        result
    }

    /// Whole-string ingestion. Returns how many tokens were queued.
    pub fn ingest(&mut self, text: &str) -> usize {
        self.enqueue(tokenize(text))
    }

    /// Streamed ingestion from a line-oriented transport.
    pub fn feed(&mut self, bytes: &[u8]) -> usize {
        let mut tokens = Vec::new();
        self.assembler.feed(bytes, &mut tokens);
        self.enqueue(tokens)
    }

    /// Queue `X<load_offset>`, the canned wire reload move.
    pub fn load_wire(&mut self) -> Result<String, MachineError> {
        let offset = self.state.globals.load_offset;
        if offset == 0 {
            return Err(MachineError::LoadOffsetUnset);
        }
        let command = format!("X{}", offset);
        self.ingest(&command);
        tracing::info!("LOAD WIRE queued: {}", command);
        Ok(command)
    }

    pub fn replay_saved(&mut self) -> Result<usize, MachineError> {
        if self.saved_buffer.trim().is_empty() {
            return Err(MachineError::NoSavedBuffer);
        }
        let buffer = self.saved_buffer.clone();
        Ok(self.ingest(&buffer))
    }

    pub fn status(&self) -> MachineStatus {
        MachineStatus {
            version: FIRMWARE_VERSION.to_string(),
            indicator: self.indicator.state().label().to_string(),
            queue_len: self.queue.len(),
            dispatched: self.dispatcher.dispatched(),
            x_feedrate: self.state.x.feedrate,
            z_feedrate: self.state.z.feedrate,
            load_offset: self.state.globals.load_offset,
            settle_delay_ms: self.state.globals.settle_delay_ms,
            servo_settle_ms: self.state.globals.servo_settle_ms,
            soft_limits: self.state.globals.soft_limits,
            saved_buffer: self.saved_buffer.clone(),
        }
    }

    pub fn state(&self) -> &MachineState {
        &self.state
    }

    pub fn queue(&self) -> &CommandQueue {
        &self.queue
    }

    pub fn indicator_state(&self) -> IndicatorState {
        self.indicator.state()
    }

    pub fn saved_buffer(&self) -> &str {
        &self.saved_buffer
    }

    fn is_idle(&self) -> bool {
        self.queue.is_empty()
            && self.indicator.state() == IndicatorState::Ready
            && self.inbox.deferred.is_empty()
    }

    /// Push tokens in order. An abort token is executed on the spot instead of queued,
    /// clearing everything pending ahead of it.
    fn enqueue(&mut self, tokens: Vec<CommandToken>) -> usize {
        let mut queued = 0;
        for token in tokens {
            if self.dispatcher.is_abort(&token) {
                let _ = self.dispatch(&token);
                continue;
            }
            if self.queue.is_empty() && !self.indicator.is_blinking() {
                self.indicator.start_blinking(self.board.clock.now());
            }
            self.queue.push(token);
            queued += 1;
        }
        queued
    }

    fn dispatch_next(&mut self) -> Option<Result<Outcome, CommandError>> {
        let token = match self.queue.pop_front() {
            Ok(token) => token,
            Err(e) => {
                tracing::error!("Dispatch with nothing queued: {}", e);
                return None;
            }
        };
        let result = self.dispatch(&token);
        tracing::debug!("COMMAND SENT");
        Some(result)
    }

    fn dispatch(&mut self, token: &CommandToken) -> Result<Outcome, CommandError> {
        let mut ctx = DispatchContext {
            state: &mut self.state,
            queue: &mut self.queue,
            indicator: &mut self.indicator,
            board: &mut self.board,
            input: &mut self.inbox,
        };
        self.dispatcher.dispatch(token, &mut ctx)
    }

    fn handle(&mut self, request: MachineRequest) {
        match request {
            MachineRequest::Serial(bytes) => {
                self.feed(&bytes);
            }
            MachineRequest::Buffer { text, respond_to } => {
                tracing::info!("Command buffer received: {}", text);
                self.saved_buffer = text;
                let buffer = self.saved_buffer.clone();
                let _ = respond_to.send(self.ingest(&buffer));
            }
            MachineRequest::Command { text, respond_to } => {
                tracing::info!("Command received: {}", text);
                let _ = respond_to.send(self.ingest(&text));
            }
            MachineRequest::ReplaySaved { respond_to } => {
                let _ = respond_to.send(self.replay_saved());
            }
            MachineRequest::LoadWire { respond_to } => {
                let _ = respond_to.send(self.load_wire());
            }
            MachineRequest::Save { respond_to } => {
                let _ = respond_to.send(self.save());
            }
            MachineRequest::ReadSettings { respond_to } => {
                let result = match &self.store {
                    Some(store) => store.raw().map_err(MachineError::from),
                    None => Err(MachineError::NoStore),
                };
                let _ = respond_to.send(result);
            }
            MachineRequest::DeleteSettings { respond_to } => {
                let result = match &self.store {
                    Some(store) => store.delete().map_err(MachineError::from),
                    None => Err(MachineError::NoStore),
                };
                let _ = respond_to.send(result);
            }
            MachineRequest::Status { respond_to } => {
                let _ = respond_to.send(self.status());
            }
        }
    }
}
