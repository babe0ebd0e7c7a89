//! Domain facades registered with the [`DomainRegistry`](crate::registry::DomainRegistry).

pub mod code;
pub mod files;
pub mod hydration;
pub mod records;
pub mod search;

pub use code::CodeHandler;
pub use files::FilesHandler;
pub use hydration::HydrationHandler;
pub use records::RecordsHandler;
pub use search::SearchHandler;

use fg_domain::command::Command;
use fg_domain::error::Error;

/// A handler was given a command for a domain it does not serve.  Only a
/// miswired registry can cause this.
pub(crate) fn misrouted(handler: &str, command: &Command) -> Error {
    Error::internal(format!(
        "{handler} handler received a {} command",
        command.domain()
    ))
}
