// Cattle Match - Core Library
// Exposes all modules for use in the API server and tests

pub mod admin;
pub mod auth;
pub mod entities;
pub mod error;
pub mod lifecycle;
pub mod mailer;
pub mod matcher;
pub mod notify;
pub mod settlement;
pub mod store;
pub mod verification;
pub mod weighing;

// Re-export commonly used types
pub use entities::{
    DemandRequest, Listing, ListingStatus, NewDemand, NewListing, NewProposal, NewUser,
    NewWeightEntry, Notification, Proposal, ProposalStatus, Role, TargetRegion, Transaction,
    TransactionStatus, User, UserPublic, WeightEntry, WeightMode,
};
pub use error::{AppError, Result};
pub use lifecycle::{
    ConfirmOutcome, CreatedWithMatches, DepositReceipt, FinalizeRequest, ProposalView,
    SlaughterhouseWeight, SupplyDetail,
};
pub use mailer::{EmailConfig, LogMailer, MailSender};
pub use settlement::{
    SettlementAmounts, DEFAULT_YIELD_RATE, KG_PER_ARROBA, RESERVATION_DEPOSIT, YIELD_RATE_MAX,
    YIELD_RATE_MIN,
};
pub use store::setup_database;
pub use verification::CodeCache;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
