//! Domain model (ids, message record, lifecycle, outcomes, stats).
//!
//! Architecture-agnostic: no store, clock or processor lives here, so every
//! state transition can be tested without I/O.

pub mod errors;
pub mod ids;
pub mod lifecycle;
pub mod message;
pub mod message_type;
pub mod outcome;
pub mod state;
pub mod stats;

pub use self::errors::DlqError;
pub use self::ids::{MessageId, OrganizationId, ParseIdError};
pub use self::lifecycle::{Eligibility, Event, TransitionError};
pub use self::message::{DlqMessage, EnqueueContext, ErrorInfo, RetryAttempt, RetryOverrides};
pub use self::message_type::{MessageType, UnknownMessageType};
pub use self::outcome::{BulkItem, BulkReport, ProcessOutcome, ProcessReason, ResolveResult};
pub use self::state::MessageStatus;
pub use self::stats::DlqStats;
