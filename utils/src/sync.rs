//! Synchronization primitives shared by the workspace.

pub use parking_lot::Mutex;
pub use parking_lot::MutexGuard;
pub use parking_lot::Condvar;
pub use parking_lot::RwLock;
pub use parking_lot::RwLockReadGuard;
pub use parking_lot::RwLockWriteGuard;
