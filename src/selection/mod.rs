pub mod lock;
pub mod resolver;
pub mod snapshot;

pub use lock::{EventDisposition, KeyChord, LockEvent, LockEventKind, SelectionLock};
pub use resolver::{Anchor, AnchorSource, RectResolver};
pub use snapshot::{LiveSelection, PageContext, PageHost, SelectionSnapshot};
