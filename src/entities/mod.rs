// Entity Models - Cattle Match System
// Flat records with a stable string id, a creation timestamp and an owner.

pub mod demand;
pub mod listing;
pub mod notification;
pub mod proposal;
pub mod transaction;
pub mod user;
pub mod weight;

pub use demand::{DemandRequest, NewDemand, TargetRegion};
pub use listing::{Listing, ListingStatus, NewListing, WeightMode};
pub use notification::Notification;
pub use proposal::{NewProposal, Proposal, ProposalStatus};
pub use transaction::{Transaction, TransactionStatus};
pub use user::{NewUser, Role, User, UserPublic};
pub use weight::{NewWeightEntry, WeightEntry};
