//! Status helper enums mapping to SMALLINT lookup values.
//!
//! Each enum variant's discriminant matches the seed data order
//! (1-based) in the corresponding `*_statuses` database table.

use coursecraft_core::content::{
    STEP_ANALYZE, STEP_APPROVAL, STEP_DRAFT, STEP_FORMAT, STEP_REFINE, STEP_REVIEW,
};

/// Status ID type matching SMALLINT/SMALLSERIAL in the database.
pub type StatusId = i16;

macro_rules! define_status_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $val:expr ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[repr(i16)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub enum $name {
            $( $(#[$vmeta])* $variant = $val ),+
        }

        impl $name {
            /// Return the database status ID.
            pub fn id(self) -> StatusId {
                self as StatusId
            }
        }

        impl From<$name> for StatusId {
            fn from(value: $name) -> Self {
                value as StatusId
            }
        }
    };
}

define_status_enum! {
    /// Content-generation job lifecycle status.
    JobStatus {
        Queued = 1,
        Processing = 2,
        Drafting = 3,
        Critiquing = 4,
        Refining = 5,
        Formatting = 6,
        WaitingApproval = 7,
        Completed = 8,
        Failed = 9,
    }
}

/// Terminal statuses: completed and failed. Only an explicit retry
/// leaves either of them.
pub const TERMINAL_STATUSES: [StatusId; 2] =
    [JobStatus::Completed as StatusId, JobStatus::Failed as StatusId];

impl JobStatus {
    /// Whether this status is terminal.
    pub fn is_terminal(self) -> bool {
        TERMINAL_STATUSES.contains(&self.id())
    }

    /// The queue status shown while a given pipeline step runs.
    ///
    /// Unrecognized step names fall back to the generic `Processing`
    /// status instead of failing.
    pub fn for_step(step: &str) -> JobStatus {
        match step {
            STEP_ANALYZE => JobStatus::Processing,
            STEP_DRAFT => JobStatus::Drafting,
            STEP_REVIEW => JobStatus::Critiquing,
            STEP_REFINE => JobStatus::Refining,
            STEP_FORMAT => JobStatus::Formatting,
            STEP_APPROVAL => JobStatus::WaitingApproval,
            _ => JobStatus::Processing,
        }
    }
}
