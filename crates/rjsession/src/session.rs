//! Engine side of a session: the REPL loop and request dispatch.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::bridge::protocol::{
    Answer, CommandItem, CommandKind, DataCmd, SlotId, Status, codes,
};
use crate::config::SessionConfig;
use crate::data::{Value, ValueCodec};
use crate::dbg::{DbgCommand, DebugController, TracepointEvent};
use crate::error::{EvalError, ExchangeError};
use crate::exchange::CommandExchange;
use crate::interpreter::{EvalContext, Handle, Interpreter};

/// Owns the interpreter and serves client requests on the engine thread.
///
/// One per process. All interpreter access happens through `&mut self`, so
/// the type system keeps evaluation on a single thread.
pub struct EngineSession<I: Interpreter> {
    exchange: Arc<CommandExchange>,
    interp: I,
    codec: ValueCodec,
    debug: DebugController,
    config: SessionConfig,
}

impl<I: Interpreter> EngineSession<I> {
    pub fn new(interp: I, config: SessionConfig) -> Result<Self, ExchangeError> {
        let exchange = CommandExchange::start(&config)?;
        info!(
            stdout_buffer_size = config.stdout_buffer_size,
            max_depth = config.limits.max_depth,
            "Engine session started"
        );
        Ok(Self {
            exchange,
            interp,
            codec: ValueCodec::new(config.limits),
            debug: DebugController::new(),
            config,
        })
    }

    pub fn exchange(&self) -> &Arc<CommandExchange> {
        &self.exchange
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn interpreter(&mut self) -> &mut I {
        &mut self.interp
    }

    pub fn debugger(&mut self) -> &mut DebugController {
        &mut self.debug
    }

    /// Asks the primary client for a line of console input.
    pub fn read_console(&mut self, prompt: &str, add_to_history: bool) -> Result<String, Status> {
        let item = CommandItem::new(
            SlotId::PRIMARY,
            CommandKind::ConsoleRead {
                prompt: prompt.to_string(),
                add_to_history,
            },
        );
        match self.ask(item) {
            Answer::Text(text) => Ok(text),
            Answer::Status(status) => Err(status),
            other => Err(unexpected_answer(&other)),
        }
    }

    pub fn write_out(&self, text: &str) {
        ExchangeContext::new(&self.exchange).write_out(text);
    }

    pub fn write_err(&self, text: &str) {
        ExchangeContext::new(&self.exchange).write_err(text);
    }

    pub fn message(&self, text: &str) {
        self.tell(CommandKind::ConsoleMessage {
            text: text.to_string(),
        });
    }

    /// Calls into the client UI. Without `wait` there is no answer.
    pub fn ext_ui(&mut self, name: &str, arg: Option<Value>, wait: bool) -> Option<Answer> {
        let kind = CommandKind::ExtUi {
            name: name.to_string(),
            arg,
            wait,
        };
        if !wait {
            self.tell(kind);
            return None;
        }
        Some(self.ask(CommandItem::new(SlotId::PRIMARY, kind)))
    }

    pub fn set_busy(&self, busy: bool) {
        self.exchange.set_busy(busy);
    }

    pub fn notify_tracepoint_event(&self, event: TracepointEvent) {
        self.tell(CommandKind::Debug(DbgCommand::NotifyTracepointEvent(event)));
    }

    /// Called by the interpreter adapter when execution reaches an installed tracepoint.
    ///
    /// Returns whether the engine should suspend; the client is notified when it does.
    pub fn tracepoint_hit(
        &mut self,
        file_path: &str,
        element_id: &str,
        id: i64,
        envir: Option<Handle>,
    ) -> bool {
        let mut ctx = ExchangeContext::new(&self.exchange);
        let event = self.debug.tracepoints_mut().check_hit(
            file_path,
            element_id,
            id,
            &mut self.interp,
            envir,
            &mut ctx,
        );
        match event {
            Some(event) => {
                debug!(file_path, id, "Tracepoint hit");
                self.notify_tracepoint_event(event);
                true
            }
            None => false,
        }
    }

    /// Reads and evaluates console input until the session stops.
    pub fn run_repl(&mut self, prompt: &str) {
        loop {
            self.set_busy(false);
            let line = match self.read_console(prompt, true) {
                Ok(line) => line,
                Err(status) if status.code == codes::STOPPED => break,
                Err(status) => {
                    debug!(%status, "Console read failed");
                    continue;
                }
            };
            self.set_busy(true);
            if let Err(e) = self.eval_console(&line) {
                self.write_err(&format!("Error: {e}\n"));
            }
        }
        info!("Console loop ended");
    }

    fn eval_console(&mut self, line: &str) -> Result<(), EvalError> {
        if line.trim().is_empty() {
            return Ok(());
        }
        self.exchange.clear_interrupt();
        let expr = self.interp.parse(line)?;
        let mut ctx = ExchangeContext::new(&self.exchange);
        let result = self.interp.eval(expr, None, &mut ctx);
        if matches!(result, Err(EvalError::Interrupted)) {
            self.exchange.clear_interrupt();
        }
        result.map(drop)
    }

    /// Serves one client request and returns it answered.
    pub fn dispatch(&mut self, item: CommandItem) -> CommandItem {
        let answer = match &item.kind {
            CommandKind::Data(cmd) => match self.data(cmd) {
                Ok(answer) => answer,
                Err(e) => {
                    debug!(slot = %item.slot, error = %e, "Data request failed");
                    Answer::Status(e.into())
                }
            },
            CommandKind::Debug(cmd) => match self.debug.handle(cmd, &mut self.interp) {
                Ok(Some(reply)) => Answer::Debug(reply),
                Ok(None) => Answer::Done,
                Err(e) => Answer::Status(e.into()),
            },
            other => {
                warn!(slot = %item.slot, kind = other.name(), "Unexpected request from client");
                Answer::Status(Status::error(
                    codes::NOT_SUPPORTED,
                    format!("{} is not a client request", other.name()),
                ))
            }
        };
        item.answered(answer)
    }

    fn data(&mut self, cmd: &DataCmd) -> Result<Answer, EvalError> {
        // an interrupt cancels only the evaluation it arrived during
        self.exchange.clear_interrupt();
        let answer = self.run_data(cmd);
        if matches!(answer, Err(EvalError::Interrupted)) {
            self.exchange.clear_interrupt();
        }
        answer
    }

    fn run_data(&mut self, cmd: &DataCmd) -> Result<Answer, EvalError> {
        let mut ctx = ExchangeContext::new(&self.exchange);
        let answer = match cmd {
            DataCmd::EvalVoid { expr } => {
                let parsed = self.interp.parse(expr)?;
                self.interp.eval(parsed, None, &mut ctx)?;
                Answer::Done
            }
            DataCmd::EvalData { expr } | DataCmd::EvalStruct { expr } => {
                let struct_only = matches!(cmd, DataCmd::EvalStruct { .. });
                let parsed = self.interp.parse(expr)?;
                let result = self.interp.eval(parsed, None, &mut ctx)?;
                Answer::Value(self.codec.from_external(&mut self.interp, result, struct_only)?)
            }
            DataCmd::ResolveData { handle } => Answer::Value(self.codec.from_external(
                &mut self.interp,
                Handle::new(*handle),
                false,
            )?),
            DataCmd::ResolveStruct { handle } => Answer::Value(self.codec.from_external(
                &mut self.interp,
                Handle::new(*handle),
                true,
            )?),
            DataCmd::AssignData { target, value } => {
                let handle = self.codec.to_external(&mut self.interp, value)?;
                self.interp.assign_by_expression(target, handle, &mut ctx)?;
                Answer::Done
            }
        };
        Ok(answer)
    }

    fn ask(&mut self, item: CommandItem) -> Answer {
        let exchange = Arc::clone(&self.exchange);
        let reply = exchange.submit_from_engine(item, true, &mut |request| self.dispatch(request));
        reply
            .and_then(|item| item.answer)
            .unwrap_or_else(|| Answer::Status(Status::stopped()))
    }

    fn tell(&self, kind: CommandKind) {
        self.exchange
            .submit_from_engine(CommandItem::new(SlotId::PRIMARY, kind), false, &mut |item| item);
    }

    pub fn shutdown(&self) {
        self.exchange.shutdown();
    }
}

fn unexpected_answer(answer: &Answer) -> Status {
    Status::error(codes::PROTOCOL, format!("unexpected answer: {answer:?}"))
}

/// Evaluation callbacks routed to the primary client.
struct ExchangeContext<'a> {
    exchange: &'a CommandExchange,
}

impl<'a> ExchangeContext<'a> {
    fn new(exchange: &'a CommandExchange) -> Self {
        Self { exchange }
    }

    fn send(&self, kind: CommandKind) {
        self.exchange
            .submit_from_engine(CommandItem::new(SlotId::PRIMARY, kind), false, &mut |item| item);
    }
}

impl EvalContext for ExchangeContext<'_> {
    fn write_out(&mut self, text: &str) {
        self.send(CommandKind::ConsoleWriteOut {
            text: text.to_string(),
        });
    }

    fn write_err(&mut self, text: &str) {
        self.send(CommandKind::ConsoleWriteErr {
            text: text.to_string(),
        });
    }

    fn is_interrupted(&self) -> bool {
        self.exchange.is_interrupted()
    }
}
