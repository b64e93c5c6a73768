pub mod broadcast;
pub mod diagnostics;
pub mod error;
pub mod health;
pub mod messages;
pub mod presence;
pub mod relay_error;

pub use broadcast::*;
pub use diagnostics::*;
pub use error::*;
pub use health::*;
pub use messages::*;
pub use presence::*;
pub use relay_error::*;
