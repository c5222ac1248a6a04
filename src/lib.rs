//! Tool-call gateway for text generation with a durable result ledger.
//!
//! Every generation, single or batched, is written to SQLite with its model
//! and parameters. Batched prompts share one batch id and keep their input
//! order through `prompt_index`.

pub mod inference;
pub mod repository;
pub mod router;
pub mod server;
pub mod services;
pub mod tools;
pub mod utils;

#[cfg(test)]
mod test_utils;
