//! The coordinator thread: sole owner of all queues and per-slot state.
//!
//! Engine and client handles never touch this state directly. They post
//! [`Event`]s and wait on their own reply channel, so there is exactly one
//! place where ordering decisions are made.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::mpsc as std_mpsc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, trace, warn};

use super::EngineState;
use super::output::OutputBuffer;
use crate::bridge::protocol::{
    Answer, ClientId, CommandBatch, CommandItem, CommandKind, RequestId, SlotId, Status, codes,
};

pub(crate) type Waiter = oneshot::Sender<Result<CommandBatch, Status>>;

pub(crate) enum Event {
    EngineSubmit {
        item: CommandItem,
        wait: bool,
    },
    EngineExecuted {
        item: CommandItem,
    },
    SetBusy(bool),
    ClientSubmit {
        slot: SlotId,
        client: ClientId,
        items: Vec<CommandItem>,
        reply: Waiter,
    },
    Connect {
        slot: SlotId,
        reply: oneshot::Sender<ClientId>,
    },
    Disconnect {
        slot: SlotId,
        client: ClientId,
    },
    Shutdown,
}

/// Messages to the engine thread while it waits inside `submit_from_engine`.
pub(crate) enum EngineWake {
    Answer(CommandItem),
    Execute(CommandItem),
}

/// Engine question awaiting its answer.
struct Pending {
    question: CommandItem,
    retried: bool,
}

impl Pending {
    fn id(&self) -> Option<RequestId> {
        self.question.request_id
    }
}

#[derive(Default)]
struct SlotState {
    inbound: VecDeque<CommandItem>,
    outbound: VecDeque<CommandItem>,
    executing: bool,
    waiter: Option<Waiter>,
    client: Option<ClientId>,
    /// Busy flag as last delivered to the client.
    client_busy: Option<bool>,
}

pub(crate) struct Coordinator {
    slots: BTreeMap<SlotId, SlotState>,
    /// Engine questions, innermost last. Only the last one is being waited on.
    pending: Vec<Pending>,
    /// Answers that arrived for questions below the top of `pending`.
    stash: HashMap<RequestId, CommandItem>,
    /// Slots of client requests the engine is executing, innermost last.
    executing: Vec<SlotId>,
    stdout: OutputBuffer,
    busy: bool,
    retry_requested: bool,
    wakes: std_mpsc::Sender<EngineWake>,
    state: Arc<AtomicU8>,
}

impl Coordinator {
    pub(crate) fn new(
        stdout_capacity: usize,
        wakes: std_mpsc::Sender<EngineWake>,
        state: Arc<AtomicU8>,
    ) -> Self {
        Self {
            slots: BTreeMap::new(),
            pending: Vec::new(),
            stash: HashMap::new(),
            executing: Vec::new(),
            stdout: OutputBuffer::new(stdout_capacity),
            busy: false,
            retry_requested: false,
            wakes,
            state,
        }
    }

    pub(crate) fn run(mut self, mut events: mpsc::UnboundedReceiver<Event>) {
        'outer: while let Some(event) = events.blocking_recv() {
            if !self.handle(event) {
                break;
            }
            // drain everything already queued so one delivery carries it all
            while let Ok(event) = events.try_recv() {
                if !self.handle(event) {
                    break 'outer;
                }
            }
            self.pump();
        }
        self.stop();
    }

    /// Returns false on shutdown.
    fn handle(&mut self, event: Event) -> bool {
        match event {
            Event::EngineSubmit { item, wait } => self.engine_submit(item, wait),
            Event::EngineExecuted { item } => self.engine_executed(item),
            Event::SetBusy(busy) => {
                trace!(busy, "Engine busy state changed");
                self.busy = busy;
            }
            Event::ClientSubmit {
                slot,
                client,
                items,
                reply,
            } => self.client_submit(slot, client, items, reply),
            Event::Connect { slot, reply } => {
                let client = self.connect(slot);
                let _ = reply.send(client);
            }
            Event::Disconnect { slot, client } => self.disconnect(slot, client),
            Event::Shutdown => return false,
        }
        true
    }

    fn slot(&mut self, slot: SlotId) -> &mut SlotState {
        self.slots.entry(slot).or_default()
    }

    fn engine_submit(&mut self, item: CommandItem, wait: bool) {
        if !wait {
            if let (true, CommandKind::ConsoleWriteOut { text }) = (item.slot.is_primary(), &item.kind)
            {
                for chunk in self.stdout.push(text) {
                    self.push_outbound(SlotId::PRIMARY, write_out(chunk));
                }
            } else {
                self.enqueue(item);
            }
            return;
        }

        let slot = item.slot;
        self.pending.push(Pending {
            question: item.clone(),
            retried: false,
        });
        let attached = self.slot(slot).client.is_some();
        if !attached && (!slot.is_primary() || self.pending.len() > 1) {
            debug!(%slot, "No client attached, cancelling engine request");
            self.answer_top(item.answered(Answer::Status(Status::cancel(
                codes::DISCONNECTED,
                "no client attached",
            ))));
            return;
        }
        self.enqueue(item);
    }

    fn engine_executed(&mut self, item: CommandItem) {
        match self.executing.pop() {
            Some(slot) if slot == item.slot => {}
            other => error!(expected = ?other, actual = %item.slot, "Executed item does not match execution stack"),
        }
        self.slot(item.slot).executing = false;
        self.enqueue(item);
    }

    /// Queues an item for delivery, dropping it when nobody is attached to its slot.
    fn enqueue(&mut self, item: CommandItem) {
        if item.slot.is_primary() {
            if let Some(text) = self.stdout.take() {
                self.push_outbound(SlotId::PRIMARY, write_out(text));
            }
        }
        self.push_outbound(item.slot, item);
    }

    fn push_outbound(&mut self, slot: SlotId, item: CommandItem) {
        let state = self.slot(slot);
        if state.client.is_none() {
            trace!(%slot, kind = item.kind.name(), "No client attached, dropping item");
            return;
        }
        state.outbound.push_back(item);
    }

    fn client_submit(
        &mut self,
        slot: SlotId,
        client: ClientId,
        items: Vec<CommandItem>,
        reply: Waiter,
    ) {
        let state = self.slot(slot);
        if state.client != Some(client) {
            debug!(%slot, %client, "Submission from a client that is not attached");
            let _ = reply.send(Err(Status::disconnected()));
            return;
        }
        if let Some(previous) = state.waiter.replace(reply) {
            let _ = previous.send(Err(Status::cancel(
                codes::CANCELLED,
                "superseded by a newer call on the same slot",
            )));
        }

        if items.is_empty() {
            self.retry_requested |= slot.is_primary();
            return;
        }
        if slot.is_primary()
            && let Some(top) = self.pending.last_mut()
        {
            top.retried = false;
        }
        for mut item in items {
            item.slot = slot;
            if item.is_answered() {
                self.accept_answer(item);
            } else {
                self.slot(slot).inbound.push_back(item);
            }
        }
    }

    fn accept_answer(&mut self, item: CommandItem) {
        let Some(id) = item.request_id else {
            warn!(slot = %item.slot, kind = item.kind.name(), "Dropping answer without request id");
            return;
        };
        match self.pending.iter().position(|p| p.id() == Some(id)) {
            Some(i) if i + 1 == self.pending.len() => self.answer_top(item),
            Some(_) => {
                debug!(request_id = %id, "Answer for an outer request, holding it");
                self.stash.insert(id, item);
            }
            None => warn!(request_id = %id, "Dropping answer for unknown request"),
        }
    }

    /// Hands `answer` to the engine for the innermost pending question.
    fn answer_top(&mut self, answer: CommandItem) {
        let mut next = Some(answer);
        while let Some(answer) = next.take() {
            self.pending.pop();
            if self.wakes.send(EngineWake::Answer(answer)).is_err() {
                debug!("Engine is gone, answer dropped");
            }
            let Some(top) = self.pending.last() else {
                break;
            };
            let id = top.id();
            if let Some(stashed) = id.and_then(|id| self.stash.remove(&id)) {
                next = Some(stashed);
            } else if top.question.slot.is_primary()
                && self.pending.len() > 1
                && self.slot(SlotId::PRIMARY).client.is_none()
            {
                let question = self.pending.last().map(|p| p.question.clone());
                next = question.map(|q| {
                    q.answered(Answer::Status(Status::cancel(
                        codes::DISCONNECTED,
                        "client disconnected",
                    )))
                });
            }
        }
    }

    fn connect(&mut self, slot: SlotId) -> ClientId {
        let client = ClientId::new();
        let questions: Vec<CommandItem> = self
            .pending
            .iter()
            .filter(|p| p.question.slot == slot)
            .map(|p| p.question.clone())
            .collect();
        let state = self.slot(slot);
        if let Some(waiter) = state.waiter.take() {
            let _ = waiter.send(Err(Status::cancel(
                codes::DISCONNECTED,
                "another client attached to this slot",
            )));
        }
        state.client = Some(client);
        state.client_busy = None;
        for question in questions {
            let queued = state
                .outbound
                .iter()
                .any(|item| item.request_id == question.request_id);
            if !queued {
                state.outbound.push_back(question);
            }
        }
        info!(%slot, %client, "Client connected");
        client
    }

    fn disconnect(&mut self, slot: SlotId, client: ClientId) {
        let state = self.slot(slot);
        if state.client != Some(client) {
            debug!(%slot, %client, "Ignoring disconnect of a stale client");
            return;
        }
        state.client = None;
        state.client_busy = None;
        state.inbound.clear();
        state.outbound.clear();
        if let Some(waiter) = state.waiter.take() {
            let _ = waiter.send(Err(Status::cancel(codes::DISCONNECTED, "client disconnected")));
        }
        info!(%slot, %client, "Client disconnected");

        if slot.is_primary()
            && self.pending.len() > 1
            && let Some(top) = self.pending.last()
            && top.question.slot.is_primary()
        {
            let question = top.question.clone();
            self.answer_top(question.answered(Answer::Status(Status::cancel(
                codes::DISCONNECTED,
                "client disconnected",
            ))));
        }
    }

    /// Whether the engine sits in a wait with nothing of its own running.
    fn engine_waiting(&self) -> bool {
        self.pending.len() > self.executing.len()
    }

    fn pump(&mut self) {
        self.forward_execution();
        if std::mem::take(&mut self.retry_requested) {
            self.retry_unanswered();
        }
        let ready: Vec<SlotId> = self
            .slots
            .iter()
            .filter(|(slot, state)| state.waiter.is_some() && self.deliverable(**slot, state))
            .map(|(slot, _)| *slot)
            .collect();
        for slot in ready {
            self.deliver(slot);
        }
    }

    /// Hands the next client request to the engine if it is free to take one.
    fn forward_execution(&mut self) {
        if !self.engine_waiting() {
            return;
        }
        let next = self
            .slots
            .iter_mut()
            .find(|(_, state)| !state.executing && !state.inbound.is_empty())
            .and_then(|(slot, state)| {
                state.executing = true;
                state.inbound.pop_front().map(|item| (*slot, item))
            });
        if let Some((slot, item)) = next {
            trace!(%slot, kind = item.kind.name(), "Forwarding request to engine");
            self.executing.push(slot);
            if self.wakes.send(EngineWake::Execute(item)).is_err() {
                debug!("Engine is gone, request dropped");
            }
        }
    }

    fn deliverable(&self, slot: SlotId, state: &SlotState) -> bool {
        if !state.outbound.is_empty() {
            return true;
        }
        slot.is_primary() && (!self.stdout.is_empty() || state.client_busy != Some(self.busy))
    }

    /// Re-delivers the innermost primary question once; fails it on the next miss.
    fn retry_unanswered(&mut self) {
        if !self.engine_waiting() {
            return;
        }
        let primary_idle = self.slots.get(&SlotId::PRIMARY).is_some_and(|state| {
            state.waiter.is_some()
                && state.inbound.is_empty()
                && !state.executing
                && !self.deliverable(SlotId::PRIMARY, state)
        });
        if !primary_idle {
            return;
        }
        let Some(top) = self.pending.last_mut() else {
            return;
        };
        if !top.question.slot.is_primary() {
            return;
        }
        let request_id = top.id().map(|id| id.get());
        if !top.retried {
            top.retried = true;
            let question = top.question.clone();
            warn!(?request_id, kind = question.kind.name(), "Request unanswered, delivering again");
            self.slot(SlotId::PRIMARY).outbound.push_back(question);
        } else {
            let question = top.question.clone();
            error!(?request_id, kind = question.kind.name(), "Request still unanswered, failing it");
            self.answer_top(question.answered(Answer::Status(Status::error(
                codes::UNANSWERED,
                "request was not answered by the client",
            ))));
        }
    }

    fn deliver(&mut self, slot: SlotId) {
        if slot.is_primary()
            && let Some(text) = self.stdout.take()
        {
            self.push_outbound(slot, write_out(text));
        }
        let busy = self.busy;
        let state = self.slot(slot);
        let Some(waiter) = state.waiter.take() else {
            return;
        };
        let batch = CommandBatch {
            busy,
            items: state.outbound.drain(..).collect(),
        };
        trace!(%slot, items = batch.items.len(), busy, "Delivering batch");
        match waiter.send(Ok(batch)) {
            Ok(()) => state.client_busy = Some(busy),
            Err(Ok(batch)) => {
                // caller went away; keep the items for its next call
                for item in batch.items.into_iter().rev() {
                    state.outbound.push_front(item);
                }
            }
            Err(Err(_)) => {}
        }
    }

    fn stop(&mut self) {
        self.state.store(EngineState::Stopped as u8, Ordering::SeqCst);
        if let Some(text) = self.stdout.take() {
            self.push_outbound(SlotId::PRIMARY, write_out(text));
        }
        for (slot, state) in &mut self.slots {
            let Some(waiter) = state.waiter.take() else {
                continue;
            };
            let result = if state.outbound.is_empty() {
                Err(Status::stopped())
            } else {
                Ok(CommandBatch {
                    busy: self.busy,
                    items: state.outbound.drain(..).collect(),
                })
            };
            trace!(%slot, "Releasing waiter on shutdown");
            let _ = waiter.send(result);
        }
        info!(pending = self.pending.len(), "Command exchange stopped");
    }
}

fn write_out(text: String) -> CommandItem {
    CommandItem::new(SlotId::PRIMARY, CommandKind::ConsoleWriteOut { text })
}
