pub mod launch;
pub mod message;
pub mod operation;
pub mod requirement;
pub mod status;
pub mod target;
pub mod worker;

pub use launch::*;
pub use message::*;
pub use operation::*;
pub use requirement::*;
pub use status::*;
pub use target::*;
pub use worker::*;
