pub mod ocpp_frame;
pub mod shutdown;

pub use ocpp_frame::{CallErrorCode, FrameError, OcppFrame};
pub use shutdown::{ShutdownCoordinator, ShutdownSignal};
