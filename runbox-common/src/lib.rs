pub mod codec;
pub mod layout;
pub mod messages;
pub mod session;
pub mod shared;

pub use codec::*;
pub use layout::*;
pub use messages::*;
pub use session::*;
pub use shared::*;
