pub mod action_dispatcher;
pub mod classifier;
pub mod control_loop;
pub mod frame_capturer;
pub mod reporter;
pub mod virtual_device;
pub mod window_locator;

pub use action_dispatcher::{ActionDispatcher, KeyState};
pub use classifier::{ClassificationResult, Classifier, ModelBackend, TractModel};
pub use control_loop::ControlLoop;
pub use frame_capturer::{CaptureFrame, FrameCapturer, ScreenSource, XcapScreen};
pub use reporter::{LogLine, Reporter, Status};
pub use virtual_device::{KeyInjector, VirtualDevice};
pub use window_locator::{WindowLocator, WindowSystem, XcapWindowSystem};
