//! Agent module — dialogue sessions, command parsing, and the main loop.

pub mod agent_loop;
pub mod session;
pub mod submission;

pub use agent_loop::{Agent, AgentDeps};
pub use session::{DialogueSession, SessionStatus, TurnReply};
pub use submission::{Submission, SubmissionParser};
