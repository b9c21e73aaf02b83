//! CLI commands implementation

pub mod doc;
pub mod enqueue;
pub mod guide;
pub mod init;
pub mod project;
pub mod status;
pub mod work;

pub use doc::*;
pub use enqueue::*;
pub use guide::*;
pub use init::*;
pub use project::*;
pub use status::*;
pub use work::*;
