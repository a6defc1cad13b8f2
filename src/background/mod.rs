//! Background services: dropout watchdog and anomaly flusher
//!
//! Both finish their in-flight unit of work before returning. The watchdog
//! stops with the process-wide `CancellationToken`; the flusher has its own
//! token and is stopped after every producer, see [`FlusherHandle`].

pub mod flusher;
pub mod watchdog;

pub use flusher::{FlusherHandle, StoreFlusher};
pub use watchdog::DropoutWatchdog;
