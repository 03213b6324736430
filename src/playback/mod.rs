pub mod device;
pub mod events;
pub mod session;

pub use device::{OutputDevice, PlaybackHandle, ProgressListener};
pub use events::{EventBus, SessionEvent};
pub use session::PlaybackSession;
