//! The herald service: scheduled email delivery and in-app notification
//! fan-out, wired together behind one control socket.

pub mod control_handler;
pub mod controller;

pub use control_handler::HeraldControlHandler;
pub use controller::{Herald, Services};
