//! Rendezvous between the engine thread and client slots.
//!
//! The interpreter is cooperative: one engine thread runs every turn and calls
//! back through [`CommandExchange`] whenever it needs to tell or ask a client
//! something. Client requests (eval, assign, debug) are funnelled into the
//! same thread: while the engine waits for an answer it executes whatever
//! clients submitted, one request at a time.
//!
//! All queues live in a single coordinator thread (see `coordinator`), fed by
//! one event channel. Engine and client handles only post events and wait on
//! their own reply channel.

mod coordinator;
mod output;

use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU32, Ordering};
use std::sync::mpsc::{self as std_mpsc, RecvTimeoutError};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::{error, info, warn};

use crate::bridge::protocol::{
    Answer, ClientId, CommandBatch, CommandItem, RequestId, SlotId, Status,
};
use crate::config::SessionConfig;
use crate::error::ExchangeError;
use coordinator::{Coordinator, EngineWake, Event};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EngineState {
    NotStarted = 0,
    /// Engine is running interpreter code.
    Running = 1,
    /// Engine is blocked waiting for a client answer.
    Waiting = 2,
    Stopped = 3,
}

impl EngineState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::NotStarted,
            1 => Self::Running,
            2 => Self::Waiting,
            _ => Self::Stopped,
        }
    }
}

/// Auxiliary event source serviced while the engine waits for clients.
pub trait SessionPlugin: Send {
    fn name(&self) -> &str;

    /// Called every idle interval. An error removes the plugin.
    fn idle(&mut self) -> anyhow::Result<()>;
}

/// Runs a client request on the engine thread and returns it answered.
pub type Executor<'a> = dyn FnMut(CommandItem) -> CommandItem + 'a;

pub struct CommandExchange {
    events: mpsc::UnboundedSender<Event>,
    wakes: Mutex<std_mpsc::Receiver<EngineWake>>,
    state: Arc<AtomicU8>,
    interrupted: AtomicBool,
    next_request: AtomicU32,
    plugins: Mutex<Vec<Box<dyn SessionPlugin>>>,
    idle_interval: Duration,
}

impl std::fmt::Debug for CommandExchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandExchange")
            .field("state", &self.state())
            .field("idle_interval", &self.idle_interval)
            .finish_non_exhaustive()
    }
}

impl CommandExchange {
    /// Starts the coordinator thread.
    pub fn start(config: &SessionConfig) -> Result<Arc<Self>, ExchangeError> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (wakes_tx, wakes_rx) = std_mpsc::channel();
        let state = Arc::new(AtomicU8::new(EngineState::NotStarted as u8));

        let coordinator = Coordinator::new(config.stdout_buffer_size, wakes_tx, Arc::clone(&state));
        std::thread::Builder::new()
            .name("rj-exchange".into())
            .spawn(move || coordinator.run(events_rx))
            .map_err(|e| ExchangeError::Spawn {
                message: e.to_string(),
            })?;

        Ok(Arc::new(Self {
            events: events_tx,
            wakes: Mutex::new(wakes_rx),
            state,
            interrupted: AtomicBool::new(false),
            next_request: AtomicU32::new(1),
            plugins: Mutex::new(Vec::new()),
            idle_interval: config.idle_interval,
        }))
    }

    pub fn state(&self) -> EngineState {
        EngineState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn set_state(&self, state: EngineState) {
        let _ = self
            .state
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                (current != EngineState::Stopped as u8).then_some(state as u8)
            });
    }

    // ---- engine side ----

    /// Tells or asks a client something. Engine thread only.
    ///
    /// Without `wait` the item is queued and `None` returned. With `wait` the
    /// call blocks until the answer arrives, running client requests through
    /// `exec` in the meantime, and returns the answered item. If the session
    /// stops first, the item comes back answered with a Stopped status.
    pub fn submit_from_engine(
        &self,
        mut item: CommandItem,
        wait: bool,
        exec: &mut Executor<'_>,
    ) -> Option<CommandItem> {
        if self.state() == EngineState::NotStarted {
            self.set_state(EngineState::Running);
        }
        if !wait {
            if self.events.send(Event::EngineSubmit { item, wait }).is_err() {
                warn!("Command exchange stopped, dropping engine output");
            }
            return None;
        }

        let id = RequestId::new(self.next_request.fetch_add(1, Ordering::Relaxed));
        item.request_id = Some(id);
        let question = item.clone();
        if self.state() == EngineState::Stopped
            || self.events.send(Event::EngineSubmit { item, wait }).is_err()
        {
            return Some(question.answered(Answer::Status(Status::stopped())));
        }
        Some(self.wait_for_answer(question, exec))
    }

    fn wait_for_answer(&self, question: CommandItem, exec: &mut Executor<'_>) -> CommandItem {
        self.set_state(EngineState::Waiting);
        let answer = loop {
            let wake = {
                let wakes = self.wakes.lock().unwrap_or_else(PoisonError::into_inner);
                wakes.recv_timeout(self.idle_interval)
            };
            match wake {
                Ok(EngineWake::Answer(answer)) if answer.request_id == question.request_id => {
                    break answer;
                }
                Ok(EngineWake::Answer(answer)) => {
                    error!(
                        expected = ?question.request_id,
                        actual = ?answer.request_id,
                        "Answer does not match the innermost request"
                    );
                }
                Ok(EngineWake::Execute(request)) => {
                    self.set_state(EngineState::Running);
                    let reply = exec(request);
                    self.set_state(EngineState::Waiting);
                    if self.events.send(Event::EngineExecuted { item: reply }).is_err() {
                        warn!("Command exchange stopped, dropping reply");
                    }
                }
                Err(RecvTimeoutError::Timeout) => self.run_plugins(),
                Err(RecvTimeoutError::Disconnected) => {
                    break question.answered(Answer::Status(Status::stopped()));
                }
            }
        };
        self.set_state(EngineState::Running);
        answer
    }

    fn run_plugins(&self) {
        let mut plugins = self.plugins.lock().unwrap_or_else(PoisonError::into_inner);
        plugins.retain_mut(|plugin| match plugin.idle() {
            Ok(()) => true,
            Err(e) => {
                error!(plugin = plugin.name(), error = %e, "Plugin failed, removing it");
                false
            }
        });
    }

    pub fn add_plugin(&self, plugin: Box<dyn SessionPlugin>) {
        info!(plugin = plugin.name(), "Plugin added");
        self.plugins
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(plugin);
    }

    pub fn plugin_count(&self) -> usize {
        self.plugins
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Reports a busy/idle transition of the engine to the primary client.
    pub fn set_busy(&self, busy: bool) {
        let _ = self.events.send(Event::SetBusy(busy));
    }

    /// Whether an interrupt is pending. Checked at evaluation safe points.
    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    /// Clears the interrupt flag, returning whether it was set.
    pub fn clear_interrupt(&self) -> bool {
        self.interrupted.swap(false, Ordering::SeqCst)
    }

    // ---- client side ----

    /// Attaches a client to `slot`, replacing any previous one.
    pub async fn connect(&self, slot: SlotId) -> Result<ClientId, Status> {
        let (tx, rx) = oneshot::channel();
        self.events
            .send(Event::Connect { slot, reply: tx })
            .map_err(|_| Status::stopped())?;
        rx.await.map_err(|_| Status::stopped())
    }

    pub fn connect_blocking(&self, slot: SlotId) -> Result<ClientId, Status> {
        let (tx, rx) = oneshot::channel();
        self.events
            .send(Event::Connect { slot, reply: tx })
            .map_err(|_| Status::stopped())?;
        rx.blocking_recv().map_err(|_| Status::stopped())
    }

    /// Detaches `client`. Ignored when another client has attached since.
    pub fn disconnect(&self, slot: SlotId, client: ClientId) {
        let _ = self.events.send(Event::Disconnect { slot, client });
    }

    /// Submits client items, then waits until there is something to deliver to `slot`.
    pub async fn submit_from_client(
        &self,
        slot: SlotId,
        client: ClientId,
        items: Vec<CommandItem>,
    ) -> Result<CommandBatch, Status> {
        let rx = self.post_client_items(slot, client, items)?;
        rx.await.unwrap_or_else(|_| Err(Status::stopped()))
    }

    pub fn submit_from_client_blocking(
        &self,
        slot: SlotId,
        client: ClientId,
        items: Vec<CommandItem>,
    ) -> Result<CommandBatch, Status> {
        let rx = self.post_client_items(slot, client, items)?;
        rx.blocking_recv().unwrap_or_else(|_| Err(Status::stopped()))
    }

    fn post_client_items(
        &self,
        slot: SlotId,
        client: ClientId,
        items: Vec<CommandItem>,
    ) -> Result<oneshot::Receiver<Result<CommandBatch, Status>>, Status> {
        let (tx, rx) = oneshot::channel();
        self.events
            .send(Event::ClientSubmit {
                slot,
                client,
                items,
                reply: tx,
            })
            .map_err(|_| Status::stopped())?;
        Ok(rx)
    }

    /// Requests a cooperative interrupt of the running evaluation.
    pub fn interrupt(&self, slot: SlotId) {
        info!(%slot, "Interrupt requested");
        self.interrupted.store(true, Ordering::SeqCst);
    }

    /// Stops the session. Every waiter is released; later calls return Stopped.
    pub fn shutdown(&self) {
        if self.state() != EngineState::Stopped {
            info!("Shutting down command exchange");
            self.set_state(EngineState::Stopped);
        }
        let _ = self.events.send(Event::Shutdown);
    }
}

impl Drop for CommandExchange {
    fn drop(&mut self) {
        let _ = self.events.send(Event::Shutdown);
    }
}
