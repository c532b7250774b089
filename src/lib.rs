pub mod auth;
pub mod backend;
pub mod config;
pub mod db;
pub mod events;
pub mod pdf;
pub mod proposal;
pub mod session;

pub use auth::{StaticTokenProvider, TokenProvider};
pub use backend::BackendClient;
pub use config::Config;
pub use db::models::{Record, RecordPatch};
pub use db::RecordStore;
pub use pdf::PdfMaterializer;
pub use proposal::{Feasibility, ReadyProposal};
pub use session::ProposalSession;
