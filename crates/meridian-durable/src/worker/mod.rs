mod backpressure;
mod pool;

pub use backpressure::{Backpressure, BackpressureConfig, BackpressureTicket};
pub use pool::{WorkerPool, WorkerPoolConfig, WorkerPoolError};
