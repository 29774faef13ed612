//! Temporal assignment manager
//!
//! Maintains "at most one active membership per subject" over the two
//! junction tables:
//! - `ComponentPiece`: a piece installed in a component
//! - `ComponentAssignment`: a component mounted on a turbine
//!
//! A move closes the old row and opens the new one; rows are never deleted.

pub mod clock;
pub mod event;
pub mod link;
pub mod manager;

pub use clock::{Clock, ManualClock, SystemClock};
pub use event::{AssignmentEvent, ConsistencyIssue, Problem};
pub use link::{OwnerRef, TemporalLink};
pub use manager::{AssignmentManager, ComponentMounts, OnOccupied, PieceAssignments};
