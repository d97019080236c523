//! stanks-core: the economy core of a multiplayer stock-market sandbox.
//!
//! Players trade a fixed universe of fictional stocks, run businesses and
//! borrow against them. A scheduled tick evolves prices and settles every
//! business once per interval. All state lives in one SQLite database.

pub mod business;
pub mod candidates;
pub mod config;
pub mod context;
pub mod delinquency_subsystem;
pub mod economy_subsystem;
pub mod engine;
pub mod error;
pub mod event;
pub mod interest_subsystem;
pub mod ledger;
pub mod loans;
pub mod market_subsystem;
pub mod money;
pub mod retry;
pub mod rng;
pub mod service;
pub mod social;
pub mod store;
pub mod subsystem;
pub mod trading;
pub mod types;

pub use error::{SimError, SimResult};
pub use service::GameService;
