//! Authorization session state machine, free of I/O.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlowState {
    #[default]
    Idle,
    Listening,
    AwaitingCallback,
    Exchanging,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowEvent {
    Start,
    ListenerReady,
    BindFailed,
    CallbackReceived,
    CallbackRejected,
    TimedOut,
    ExchangeSucceeded,
    ExchangeFailed,
    TornDown,
}

impl FlowState {
    /// A local listener is (or is about to be) bound.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            FlowState::Listening | FlowState::AwaitingCallback | FlowState::Exchanging
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, FlowState::Completed | FlowState::Failed)
    }

    /// Next state for `event`, or `None` if the event is not valid here.
    pub fn on(self, event: FlowEvent) -> Option<FlowState> {
        use FlowEvent as E;
        use FlowState as S;

        match (self, event) {
            (S::Idle, E::Start) => Some(S::Listening),
            (S::Listening, E::ListenerReady) => Some(S::AwaitingCallback),
            (S::Listening, E::BindFailed) => Some(S::Failed),
            (S::AwaitingCallback, E::CallbackReceived) => Some(S::Exchanging),
            (S::AwaitingCallback, E::CallbackRejected) => Some(S::Failed),
            (S::Listening | S::AwaitingCallback, E::TimedOut) => Some(S::Failed),
            (S::Exchanging, E::ExchangeSucceeded) => Some(S::Completed),
            (S::Exchanging, E::ExchangeFailed) => Some(S::Failed),
            (_, E::TornDown) => Some(S::Idle),
            _ => None,
        }
    }
}

impl fmt::Display for FlowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FlowState::Idle => "idle",
            FlowState::Listening => "listening",
            FlowState::AwaitingCallback => "awaiting_callback",
            FlowState::Exchanging => "exchanging",
            FlowState::Completed => "completed",
            FlowState::Failed => "failed",
        };
        f.write_str(name)
    }
}
