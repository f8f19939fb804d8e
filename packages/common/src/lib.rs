pub mod content;
pub mod event;
pub mod intent;
pub mod storage;
pub mod turn;

pub use content::ContentKind;
pub use event::{ChangeEvent, ChangeKind, Resource};
pub use turn::TurnEvent;
