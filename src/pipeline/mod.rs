//! The image acquisition pipeline.
//!
//! ```text
//!  request ──► Task pool ──► memory cache? ──hit──────────────┐
//!                               │miss                         ▼
//!                               ▼                      ┌─────────────┐
//!                        ┌──────────────┐  payload     │   decode    │
//!                        │   download   │ ───────────► │  scheduler  │
//!                        │  scheduler   │              └──────┬──────┘
//!                        └──────┬───────┘                     │ pixels
//!                               │ status events               ▼
//!                               └──────────────► consumer context ──► requester
//! ```
//!
//! Download workers are many (I/O bound); decode workers match the number of
//! cores. Each task moves by value from one stage to the next and ends up on
//! the consumer context, which creates the graphics resource, notifies the
//! requester and returns the task to the pool.

mod collaborators;
mod engine;
mod manager;
mod pool;
mod scheduler;
mod task;

pub use collaborators::{Requester, ResourceManager};
pub use manager::{Canceller, Manager};
pub use pool::{PoolStats, TaskPool};
pub use scheduler::{Job, Scheduler};
pub use task::{Task, TaskHandle};

#[cfg(test)]
mod tests;
