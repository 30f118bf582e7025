//! Text command router.
//!
//! Commands arrive as `ntrc!<name>[ args]`. The name is matched against a
//! fixed table by prefix and the remainder is handed to the handler. Results
//! are mapped onto debug-monitor style status codes.

use crate::control::Tracer;
use ntrc_common::consts::HANDLER_NAME;
use ntrc_common::tracer::error::TracerError;
use tracing::debug;

/// Command executed.
pub const STATUS_OK: u32 = 200;
/// Handler connected.
pub const STATUS_CONNECTED: u32 = 202;
/// Command failed.
pub const STATUS_FAILURE: u32 = 400;
/// No handler for the command.
pub const STATUS_UNKNOWN_COMMAND: u32 = 407;
/// Command not allowed in the current state.
pub const STATUS_ACCESS_DENIED: u32 = 414;

/// Status line returned for one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResponse {
    /// Status code.
    pub status: u32,
    /// Response text.
    pub message: String,
}

impl CommandResponse {
    fn ok(message: impl Into<String>) -> Self {
        Self {
            status: STATUS_OK,
            message: message.into(),
        }
    }

    /// Map an error onto its status code.
    pub fn from_error(err: &TracerError) -> Self {
        let status = match err {
            TracerError::AccessDenied { .. } => STATUS_ACCESS_DENIED,
            TracerError::UnknownCommand(_) => STATUS_UNKNOWN_COMMAND,
            TracerError::Fail(_) | TracerError::Config(_) => STATUS_FAILURE,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }

    /// True for 2xx codes.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

impl std::fmt::Display for CommandResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}- {}", self.status, self.message)
    }
}

type Handler = fn(&Tracer, &str) -> Result<CommandResponse, TracerError>;

const COMMAND_TABLE: &[(&str, Handler)] = &[
    ("hello", handle_hello),
    ("attach", handle_attach),
    ("detach", handle_detach),
    ("state", handle_state),
    ("wait_stable_pb", handle_wait_stable_pb),
    ("dma_addrs", handle_dma_addrs),
    ("release_stable_pb", handle_release_stable_pb),
];

/// Routes `ntrc!` commands to a tracer.
pub struct CommandProcessor<'a> {
    tracer: &'a Tracer,
}

impl<'a> CommandProcessor<'a> {
    /// Route commands to `tracer`.
    pub fn new(tracer: &'a Tracer) -> Self {
        Self { tracer }
    }

    /// Names of every registered command.
    pub fn commands() -> impl Iterator<Item = &'static str> {
        COMMAND_TABLE.iter().map(|(name, _)| *name)
    }

    /// Execute one command line.
    pub fn process(&self, line: &str) -> CommandResponse {
        let line = line.trim();
        debug!("Processing command '{line}'");
        match self.dispatch(line) {
            Ok(response) => response,
            Err(e) => CommandResponse::from_error(&e),
        }
    }

    fn dispatch(&self, line: &str) -> Result<CommandResponse, TracerError> {
        let subcommand = line
            .strip_prefix(HANDLER_NAME)
            .and_then(|rest| rest.strip_prefix('!'))
            .ok_or_else(|| TracerError::UnknownCommand(line.to_string()))?;

        for (name, handler) in COMMAND_TABLE {
            if let Some(args) = subcommand.strip_prefix(name) {
                return handler(self.tracer, args.trim());
            }
        }
        Err(TracerError::UnknownCommand(subcommand.to_string()))
    }
}

fn handle_hello(_: &Tracer, _: &str) -> Result<CommandResponse, TracerError> {
    Ok(CommandResponse {
        status: STATUS_CONNECTED,
        message: format!("{HANDLER_NAME} ready"),
    })
}

fn handle_attach(tracer: &Tracer, _: &str) -> Result<CommandResponse, TracerError> {
    tracer.create()?;
    Ok(CommandResponse::ok("attached"))
}

fn handle_detach(tracer: &Tracer, _: &str) -> Result<CommandResponse, TracerError> {
    tracer.destroy();
    Ok(CommandResponse::ok("detaching"))
}

fn handle_state(tracer: &Tracer, _: &str) -> Result<CommandResponse, TracerError> {
    Ok(CommandResponse::ok(format!(
        "state=0x{:08x}",
        tracer.state().as_dword()
    )))
}

fn handle_wait_stable_pb(tracer: &Tracer, _: &str) -> Result<CommandResponse, TracerError> {
    tracer.begin_wait_for_stable_push_buffer()?;
    Ok(CommandResponse::ok("waiting"))
}

fn handle_dma_addrs(tracer: &Tracer, _: &str) -> Result<CommandResponse, TracerError> {
    let message = match tracer.dma_addresses() {
        Some(addresses) => format!(
            "push=0x{:08x} pull=0x{:08x}",
            addresses.push, addresses.pull
        ),
        None => "invalid".to_string(),
    };
    Ok(CommandResponse::ok(message))
}

fn handle_release_stable_pb(tracer: &Tracer, _: &str) -> Result<CommandResponse, TracerError> {
    tracer.release_stable_push_buffer()?;
    Ok(CommandResponse::ok("released"))
}
