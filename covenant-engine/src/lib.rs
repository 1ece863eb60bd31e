//! Covenant Engine
//!
//! Executes contract functions inside a wasm sandbox:
//! - **ContractEngine**: orchestrates one execution, from specification
//!   lookup to the sealed envelope
//! - **Resolver**: matches function parameters to existing and proposed records
//! - **Validator**: checks recitals and facts against the specification
//! - **WorkerPool**: bounded concurrency for store traffic
//! - **EngineConfig**: pool size, cache capacity and archive options

pub mod config;
pub mod engine;
pub mod error;
pub mod pool;
pub mod record;
pub mod resolver;
pub mod validator;

pub use config::{EngineConfig, DEFAULT_WORKER_POOL_SIZE, WORKER_POOL_SIZE_ENV};
pub use engine::{ContractEngine, ContractEngineBuilder};
pub use error::{EngineError, InvocationError, ValidationError};
pub use pool::WorkerPool;
pub use record::{RecordInstance, RecordPool, RecordValue};
pub use resolver::{can_execute, resolve_parameters, Partition, PreparedFunction, Resolver};
pub use validator::validate_all;
