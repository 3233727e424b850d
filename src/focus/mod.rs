pub mod monitor;
pub mod policy;

pub use monitor::{
    FocusEvent, FocusEventKind, FocusMonitor, FocusMonitorConfig, FocusSubscription,
    SubscriptionHandle,
};
pub use policy::{resolve, FocusAction, FocusSignal, SessionPhase};
