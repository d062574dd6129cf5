//! Domain models shared by the supervisor services and the web layer

pub mod metrics;
pub mod process;
pub mod session;
pub mod stream_key;
pub mod stream_path;

pub use metrics::*;
pub use process::*;
pub use session::*;
pub use stream_key::*;
pub use stream_path::*;
