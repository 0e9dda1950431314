//! Deep research sessions driven by an external research agent.
//!
//! A session moves through these pieces:
//! 1. **Invocation**: derive the agent configuration from user settings
//! 2. **Bridge**: run the async agent call from synchronous code
//! 3. **Controller**: decide transitions on each user action
//! 4. **History**: archive completed sessions
//!
//! The agent itself is reached through [`ResearchAgent`]; [`RemoteResearchAgent`]
//! talks to a deployed graph over HTTP and [`MockResearchAgent`] is scripted.

pub mod agent;
pub mod bridge;
pub mod controller;
pub mod history;
pub mod invocation;
pub mod remote;
pub mod session;

pub use agent::{AgentResponse, MockResearchAgent, RecordedCall, ResearchAgent};
pub use controller::{Action, Outcome, Rejection, ResearchController};
pub use history::{HistoryStore, SessionRecord};
pub use invocation::{InvocationConfig, Stage};
pub use remote::RemoteResearchAgent;
pub use session::{ControllerState, SessionPhase, SessionStore};
