//! Per-presentation coordination: authoritative state, session registry,
//! command handling and fan-out to presenters and voters.

pub mod actor;
pub mod command;
pub mod directory;
pub mod fanout;
pub mod region;
pub mod registry;
pub mod session;
pub mod state;

pub use actor::{PresentationActor, Retired};
pub use directory::{PresentationDirectory, DEFAULT_SESSION_QUEUE_CAPACITY};
pub use fanout::Audience;
pub use region::RegionStore;
pub use registry::{Frame, SessionHandle, SessionRegistry};
pub use session::{Session, SessionPhase};
pub use state::StateStore;
