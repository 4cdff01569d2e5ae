//! # services
//!
//! Trust and vote-integrity logic of the board, written against the ports in
//! `domains` only.
//!
//! - [`gate`]: pass/fail wrapper over the remote reputation and CAPTCHA checks
//! - [`content`]: blacklist and anonymous-marker pre-filter
//! - [`ledger`]: per-identity trust state machine
//! - [`ticket`]: single-use viewing ticket
//! - [`thread`]: materialized-path tree and thread selection
//! - [`vote`]: atomic vote application
//! - [`board`]: the verify/post/vote operations

pub mod board;
pub mod content;
pub mod gate;
pub mod ledger;
pub mod thread;
pub mod ticket;
pub mod utils;
pub mod vote;

pub use board::{BoardService, PostRequest, VoteReceipt, VoteRequest};
pub use content::{ContentFilter, ScreenedPost};
pub use gate::ReputationGate;
pub use ledger::{IdentityLedger, LedgerPolicy};
pub use vote::VoteOutcome;
